//! Fixed prompt used for the security determination

pub const SYSTEM_PROMPT: &str = "You are a security analyst. You review text that was \
extracted from images shared in chat and decide whether it exposes security-sensitive \
information. Answer only with the requested JSON object.";

const INSTRUCTIONS: &str = r#"Analyze the following text extracted from an image and determine whether it contains security-sensitive information, such as credentials, passwords, API keys or tokens, private keys, connection strings, internal hostnames or IP addresses, personal data, financial data, or confidentiality markings.

Respond with a single JSON object in this format:
{"sensitive": true or false, "riskLevel": "none" | "low" | "medium" | "high", "categories": ["..."], "findings": ["..."], "summary": "..."}"#;

const NO_TEXT_PLACEHOLDER: &str = "(no text was detected in the image)";

/// Build the user prompt for a block of recognized text.
pub fn build_prompt(ocr_text: &str) -> String {
    let text = if ocr_text.trim().is_empty() {
        NO_TEXT_PLACEHOLDER
    } else {
        ocr_text
    };

    format!("{}\n\nExtracted text:\n\"\"\"\n{}\n\"\"\"", INSTRUCTIONS, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_text() {
        let prompt = build_prompt("password: hunter2");
        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.ends_with("\"\"\"\npassword: hunter2\n\"\"\""));
    }

    #[test]
    fn test_blank_text_uses_placeholder() {
        let prompt = build_prompt("  \n ");
        assert!(prompt.contains(NO_TEXT_PLACEHOLDER));
    }
}
