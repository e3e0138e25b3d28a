//! Staff accounts: registration payloads and password hashing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;
use thiserror::Error;

use crate::models::validation::required;
use crate::models::ValidationError;

const MAX_NAME_LEN: usize = 100;
const MAX_ROLE_LEN: usize = 50;

/// Role listed by `GET /registration/`
pub const SALES_ROLE: &str = "Sales Person";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed")]
    MalformedHash,
}

/// Hash a password with argon2 and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check a password against a stored PHC hash string.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|_| PasswordError::MalformedHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Account form as posted to `/registration/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    pub name: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: Option<String>,
    /// Only used when changing a password
    #[serde(rename = "oldPassword", alias = "old_password")]
    pub old_password: Option<String>,
}

/// Validated account registration or password change
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub role: String,
    pub password: String,
}

impl NewUser {
    /// Name, role and a confirmed password are required.
    pub fn validate(input: &UserInput) -> Result<Self, ValidationError> {
        let name = required("name", input.name.as_deref(), MAX_NAME_LEN)?;
        let role = required("role", input.role.as_deref(), MAX_ROLE_LEN)?;
        let password = confirmed_password(input)?;
        Ok(Self { name, role, password })
    }
}

/// Validated password change request
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordChange {
    pub name: String,
    pub role: String,
    pub old_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn validate(input: &UserInput) -> Result<Self, ValidationError> {
        let name = required("name", input.name.as_deref(), MAX_NAME_LEN)?;
        let role = required("role", input.role.as_deref(), MAX_ROLE_LEN)?;
        let new_password = confirmed_password(input)?;
        let old_password = input
            .old_password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::Empty { field: "oldPassword" })?;
        Ok(Self {
            name,
            role,
            old_password,
            new_password,
        })
    }
}

fn confirmed_password(input: &UserInput) -> Result<String, ValidationError> {
    let password = input.password.clone().unwrap_or_default();
    if password.is_empty() {
        return Err(ValidationError::Empty { field: "password" });
    }
    if input.confirm_password.as_deref() != Some(password.as_str()) {
        return Err(ValidationError::rule("Passwords do not match"));
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(password: &str, confirm: &str) -> UserInput {
        UserInput {
            name: Some("asha".into()),
            role: Some(SALES_ROLE.into()),
            password: Some(password.into()),
            confirm_password: Some(confirm.into()),
            old_password: None,
        }
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_password("x", "plaintext"),
            Err(PasswordError::MalformedHash)
        ));
    }

    #[test]
    fn registration_requires_matching_passwords() {
        assert!(NewUser::validate(&input("abc", "abc")).is_ok());
        let err = NewUser::validate(&input("abc", "abd")).unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(matches!(
            NewUser::validate(&input("", "")),
            Err(ValidationError::Empty { field: "password" })
        ));
    }

    #[test]
    fn password_change_needs_old_password() {
        let mut i = input("new", "new");
        assert!(PasswordChange::validate(&i).is_err());
        i.old_password = Some("old".into());
        let change = PasswordChange::validate(&i).unwrap();
        assert_eq!(change.new_password, "new");
        assert_eq!(change.role, SALES_ROLE);
    }
}
