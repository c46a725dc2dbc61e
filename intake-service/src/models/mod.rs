use serde::{Deserialize, Serialize};

/// Attachment content type used by Teams for uploaded files
pub const TEAMS_FILE_DOWNLOAD_INFO: &str = "application/vnd.microsoft.teams.file.download.info";

const IMAGE_FILE_TYPES: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// Inbound or outbound chat activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.activity_type.eq_ignore_ascii_case("message")
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }

    /// Text reply addressed back to the sender of `self`.
    pub fn reply_with_text(&self, text: impl Into<String>) -> Activity {
        Activity {
            activity_type: "message".to_string(),
            channel_id: self.channel_id.clone(),
            conversation: self.conversation.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            text: Some(text.into()),
            reply_to_id: self.id.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl Attachment {
    /// Teams file uploads carry the real URL inside `content.downloadUrl`.
    pub fn download_url(&self) -> Option<&str> {
        if self.content_type == TEAMS_FILE_DOWNLOAD_INFO {
            if let Some(url) = self.content_field("downloadUrl") {
                return Some(url);
            }
        }
        self.content_url.as_deref()
    }

    pub fn is_image(&self) -> bool {
        if self.content_type.starts_with("image/") {
            return true;
        }
        self.content_type == TEAMS_FILE_DOWNLOAD_INFO
            && self
                .content_field("fileType")
                .map(|t| IMAGE_FILE_TYPES.contains(&t.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
    }

    /// Declared image media type, if the channel provided one.
    pub fn image_media_type(&self) -> Option<&str> {
        self.content_type
            .starts_with("image/")
            .then_some(self.content_type.as_str())
    }

    fn content_field(&self, field: &str) -> Option<&str> {
        self.content.as_ref()?.get(field)?.as_str()
    }
}
