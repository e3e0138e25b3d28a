//! Validation error types

use std::fmt;

/// Validation error for request payloads and domain models
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Field is missing or blank when it is required
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// String doesn't match the required format
    InvalidFormat { field: &'static str, reason: String },

    /// Value parsed but is not one of the accepted values
    InvalidValue { field: &'static str, value: String },

    /// Number outside the accepted range
    OutOfRange { field: &'static str, min: i64, max: i64 },

    /// Free-form rule violation with a user-facing message
    Rule { message: String },
}

impl ValidationError {
    pub fn rule(message: impl Into<String>) -> Self {
        Self::Rule {
            message: message.into(),
        }
    }

    pub fn format(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} is required", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => write!(f, "{}: {}", field, reason),
            Self::InvalidValue { field, value } => {
                write!(f, "invalid {} value: '{}'", field, value)
            }
            Self::OutOfRange { field, min, max } => {
                write!(f, "{} must be between {} and {}", field, min, max)
            }
            Self::Rule { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Require a non-blank string no longer than `max` characters.
pub(crate) fn required(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<String, ValidationError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_owned())
}

/// Optional string: blank becomes `None`, overlong is an error.
pub(crate) fn optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        Some(v) => Ok(Some(v.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::TooLong {
            field: "employee_name",
            max: 100,
        };
        assert_eq!(
            err.to_string(),
            "employee_name exceeds maximum length of 100 characters"
        );
        assert_eq!(
            ValidationError::rule("Passwords do not match").to_string(),
            "Passwords do not match"
        );
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("name", Some("  Asha "), 10).unwrap(), "Asha");
        assert!(matches!(
            required("name", Some("   "), 10),
            Err(ValidationError::Empty { field: "name" })
        ));
        assert!(matches!(
            required("name", None, 10),
            Err(ValidationError::Empty { .. })
        ));
    }

    #[test]
    fn optional_blank_is_none() {
        assert_eq!(optional("email", Some(""), 10).unwrap(), None);
        assert_eq!(optional("email", None, 10).unwrap(), None);
        assert!(optional("email", Some("abcdefghijk"), 10).is_err());
    }
}
