//! Field normalization and validation helpers
//!
//! Models derive [`validator::Validate`]; the helpers here cover what the
//! derive cannot express (membership checks, slugs, rounding) and convert
//! the crate's error report into a [`ValidationError`].

pub mod filters;
pub mod validators;

use crate::core::error::{FieldValidationError, ValidationError};
use validator::ValidationErrors;

impl From<ValidationErrors> for ValidationError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let failures = fields
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| FieldValidationError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for '{}'", field)),
                })
            })
            .collect();

        ValidationError::FieldErrors(failures)
    }
}
