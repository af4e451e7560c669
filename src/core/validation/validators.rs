//! Reusable field validators
//!
//! Used as `custom` functions by the `validator` derive

use std::borrow::Cow;
use validator::ValidationError;

/// Validator: value must be in allowed list
pub fn one_of(value: &str, allowed: &[&str], message: &'static str) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(failure("one_of", message.to_string()))
    }
}

/// Validator: string must not be blank once trimmed
pub fn not_blank(value: &str, message: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(failure("not_blank", message.to_string()))
    } else {
        Ok(())
    }
}

/// Build a validator error with a readable message
pub fn failure(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}
