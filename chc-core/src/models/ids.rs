//! Identifier newtypes validated at construction
//!
//! Barcodes, company ids and employee ids arrive as free text from the
//! front desk. They are trimmed and length-checked against the column sizes
//! of the relational schema.

use serde::{Deserialize, Serialize};

use super::ValidationError;

const MAX_BARCODE_LEN: usize = 50;
const MAX_COMPANY_ID_LEN: usize = 20;
const MAX_EMPLOYEE_ID_LEN: usize = 20;

/// Default company when none is configured
pub const DEFAULT_COMPANY_ID: &str = "CHC001";

/// Sample tube barcode
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Barcode(String);

impl Barcode {
    /// Create a barcode from user input.
    ///
    /// ```
    /// use chc_core::models::Barcode;
    ///
    /// assert!(Barcode::new(" 100245 ").is_ok());
    /// assert!(Barcode::new("").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "barcode" });
        }
        if s.len() > MAX_BARCODE_LEN {
            return Err(ValidationError::TooLong {
                field: "barcode",
                max: MAX_BARCODE_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Numeric value of an all-digit barcode.
    ///
    /// Stock ranges only cover numeric barcodes, so anything else
    /// (including values too large for i64) yields `None`.
    pub fn numeric(&self) -> Option<i64> {
        if is_all_digits(&self.0) {
            self.0.parse().ok()
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Barcode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// True for a non-empty string of ASCII digits.
pub fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Client company identifier (e.g. `CHC001`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

impl CompanyId {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "company_id" });
        }
        if s.len() > MAX_COMPANY_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "company_id",
                max: MAX_COMPANY_ID_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self(DEFAULT_COMPANY_ID.to_owned())
    }
}

/// Employee number as issued by the client company
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "employee_id" });
        }
        if s.len() > MAX_EMPLOYEE_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "employee_id",
                max: MAX_EMPLOYEE_ID_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barcode_trims() {
        assert_eq!(Barcode::new("  42 ").unwrap().as_str(), "42");
    }

    #[test]
    fn barcode_numeric() {
        assert_eq!(Barcode::new("000123").unwrap().numeric(), Some(123));
        assert_eq!(Barcode::new("12A3").unwrap().numeric(), None);
        assert_eq!(Barcode::new("99999999999999999999").unwrap().numeric(), None);
    }

    #[test]
    fn barcode_max_length() {
        assert!(Barcode::new(&"1".repeat(50)).is_ok());
        let err = Barcode::new(&"1".repeat(51)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 50, .. }));
    }

    #[test]
    fn company_default() {
        assert_eq!(CompanyId::default().as_str(), "CHC001");
        assert!(CompanyId::new(" ").is_err());
    }

    #[test]
    fn employee_id_limits() {
        assert!(EmployeeId::new("EMP-0001").is_ok());
        assert!(EmployeeId::new(&"E".repeat(21)).is_err());
    }
}
