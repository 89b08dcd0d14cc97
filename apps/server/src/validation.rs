use validator::ValidationError;

pub const MAX_MESSAGE_LEN: usize = 4000;
const MAX_TIME_SLOT_LEN: usize = 64;

pub fn validate_message_content(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(ValidationError::new("message_content_length"));
    }
    Ok(())
}

/// Slot labels are free text; only shape limits are enforced here.
pub fn validate_time_slot_label(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_TIME_SLOT_LEN {
        return Err(ValidationError::new("time_slot_length"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::new("time_slot_chars"));
    }
    Ok(())
}

/// Trimmed chat text, or `None` when it would be rejected.
pub fn normalize_chat_text(value: &str) -> Option<String> {
    validate_message_content(value)
        .ok()
        .map(|_| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_validation_rejects_empty_and_oversized() {
        assert!(validate_message_content("hello").is_ok());
        assert!(validate_message_content("   ").is_err());
        assert!(validate_message_content(&"x".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(validate_message_content(&"x".repeat(MAX_MESSAGE_LEN + 1)).is_err());
    }

    #[test]
    fn chat_text_is_trimmed() {
        assert_eq!(normalize_chat_text("  hi there \n").as_deref(), Some("hi there"));
        assert_eq!(normalize_chat_text("\t"), None);
    }

    #[test]
    fn time_slot_labels_allow_free_text() {
        assert!(validate_time_slot_label("10:00 AM - 10:30 AM").is_ok());
        assert!(validate_time_slot_label("after lunch").is_ok());
        assert!(validate_time_slot_label("").is_err());
        assert!(validate_time_slot_label("10:00\n11:00").is_err());
    }
}
