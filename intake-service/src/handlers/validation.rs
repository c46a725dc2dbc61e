// Attachment validation utilities

use reqwest::Url;

use crate::models::{Activity, Attachment};

/// First attachment that is an image and has somewhere to download it from
pub fn select_image_attachment(activity: &Activity) -> Option<&Attachment> {
    activity
        .attachments
        .iter()
        .find(|a| a.is_image() && a.download_url().is_some())
}

pub fn validate_attachment_size(size: usize, max_size: usize) -> Result<(), String> {
    if size == 0 {
        return Err("Attachment is empty".to_string());
    }
    if size > max_size {
        return Err(format!(
            "Attachment is {} bytes, maximum is {} MB",
            size,
            max_size / (1024 * 1024)
        ));
    }
    Ok(())
}

/// Absolute http(s) URL with a host
pub fn validate_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL format: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("Unsupported URL scheme: {}", parsed.scheme()));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("URL has no host".to_string());
    }
    Ok(())
}
