//! Users and their credentials

use crate::core::auth::{PasswordHasher, Role};
use crate::core::error::{ApiResult, FieldValidationError, ValidationError};
use crate::core::filter::{Condition, Filter};
use crate::core::model::Model;
use crate::core::validation::filters::{lowercase, trim, trim_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

pub const COLLECTION: &str = "users";

pub const DEFAULT_PHOTO: &str = "default.jpg";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[validate(required(message = "Please tell us your name!"))]
    pub name: Option<String>,
    #[validate(
        required(message = "Please provide your email"),
        email(message = "Please provide a valid email")
    )]
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
    #[validate(
        required(message = "Please provide a password"),
        length(min = 8, message = "A password must have at least 8 characters")
    )]
    pub password: Option<String>,
    #[serde(skip_serializing)]
    #[validate(required(message = "Please confirm your password"))]
    pub password_confirm: Option<String>,
    pub password_changed_at: Option<String>,
    pub active: Option<bool>,
}

/// Partial user update (admin). Credentials are not updatable here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

/// New password plus its confirmation
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    #[validate(length(min = 8, message = "A password must have at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
}

/// Only active accounts are visible
pub fn active_filter() -> Filter {
    Filter::new().and("active", Condition::Ne(json!(false)))
}

impl Model for User {
    type Patch = UserPatch;

    const HIDDEN_FIELDS: &'static [&'static str] = &["password", "passwordChangedAt", "active"];
    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[&["email"]];

    fn normalize(&mut self) {
        trim_opt(&mut self.name);
        self.email = self.email.as_deref().map(|e| lowercase(&trim(e)));
    }

    fn normalize_patch(patch: &mut UserPatch) {
        trim_opt(&mut patch.name);
        patch.email = patch.email.as_deref().map(|e| lowercase(&trim(e)));
    }

    fn check(&self) -> Result<(), ValidationError> {
        let mut errors = match self.validate().map_err(ValidationError::from) {
            Ok(()) => Vec::new(),
            Err(ValidationError::FieldErrors(errors)) => errors,
            Err(other) => return Err(other),
        };
        if let (Some(password), Some(confirm)) = (&self.password, &self.password_confirm) {
            if password != confirm {
                errors.push(FieldValidationError {
                    field: "passwordConfirm".to_string(),
                    message: "Passwords are not the same!".to_string(),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::FieldErrors(errors))
        }
    }

    fn before_persist(&mut self) -> ApiResult<()> {
        if let Some(password) = &self.password {
            self.password = Some(PasswordHasher.hash(password)?);
        }
        self.password_confirm = None;
        self.photo.get_or_insert_with(|| DEFAULT_PHOTO.to_string());
        self.role.get_or_insert_with(Role::default);
        self.active.get_or_insert(true);
        Ok(())
    }

    fn default_filter() -> Filter {
        active_filter()
    }
}

/// Whether the stored password changed after a token issued at `iat` (seconds)
pub fn changed_password_after(user: &Value, iat: i64) -> bool {
    user.get("passwordChangedAt")
        .and_then(Value::as_str)
        .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
        .is_some_and(|at| at.with_timezone(&Utc).timestamp() > iat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> User {
        serde_json::from_value(json!({
            "name": " Jonas ",
            "email": " Jonas@Example.COM ",
            "password": "pass1234",
            "passwordConfirm": "pass1234"
        }))
        .unwrap()
    }

    #[test]
    fn test_signup_normalizes_and_validates() {
        let mut user = signup();
        user.normalize();
        assert_eq!(user.email.as_deref(), Some("jonas@example.com"));
        assert_eq!(user.name.as_deref(), Some("Jonas"));
        assert!(user.check().is_ok());
    }

    #[test]
    fn test_passwords_must_match() {
        let mut user = signup();
        user.password_confirm = Some("pass9999".into());
        let err = user.check().unwrap_err();
        assert!(err.to_string().contains("Passwords are not the same!"));
    }

    #[test]
    fn test_missing_confirmation_is_required_not_mismatch() {
        let mut user = signup();
        user.password_confirm = None;
        let message = user.check().unwrap_err().to_string();
        assert!(message.contains("Please confirm your password"));
        assert!(!message.contains("Passwords are not the same!"));
    }

    #[test]
    fn test_invalid_email_and_short_password() {
        let user: User = serde_json::from_value(json!({
            "name": "x",
            "email": "nope",
            "password": "short",
            "passwordConfirm": "short"
        }))
        .unwrap();
        let message = user.check().unwrap_err().to_string();
        assert!(message.contains("Please provide a valid email"));
        assert!(message.contains("A password must have at least 8 characters"));
    }

    #[test]
    fn test_before_persist_hashes_and_defaults() {
        let mut user = signup();
        user.before_persist().unwrap();
        let hash = user.password.clone().unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(PasswordHasher.verify("pass1234", &hash).unwrap());
        assert_eq!(user.role, Some(Role::User));
        assert_eq!(user.photo.as_deref(), Some(DEFAULT_PHOTO));
        assert_eq!(user.active, Some(true));

        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("passwordConfirm").is_none());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result: Result<User, _> = serde_json::from_value(json!({"role": "root"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_changed_password_after() {
        let user = json!({"passwordChangedAt": "2024-01-01T00:00:10.000Z"});
        let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:10Z")
            .unwrap()
            .timestamp();
        assert!(changed_password_after(&user, at - 60));
        assert!(!changed_password_after(&user, at));
        assert!(!changed_password_after(&json!({}), at));
    }
}
