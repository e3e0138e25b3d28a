//! Employee registration payload and validation

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{optional, required};
use super::{CompanyId, EmployeeId, ValidationError};

const MAX_NAME_LEN: usize = 100;
const MAX_GENDER_LEN: usize = 10;
const MAX_DEPARTMENT_LEN: usize = 200;
const MAX_CONTACT_LEN: usize = 200;
const MAX_AGE: i64 = 150;

/// Employee fields as posted by the registration desk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeInput {
    pub employee_name: Option<String>,
    pub employee_id: Option<String>,
    pub gender: Option<String>,
    /// Number or numeric string
    pub age: Option<Value>,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
}

/// Validated employee ready to insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEmployee {
    pub company_id: CompanyId,
    pub employee_name: String,
    pub employee_id: EmployeeId,
    pub gender: String,
    pub age: i32,
    pub company_name: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
}

impl NewEmployee {
    /// Validate registration input. Blank department and email are stored as null.
    pub fn validate(input: &EmployeeInput, default_company: &CompanyId) -> Result<Self, ValidationError> {
        let company_id = match input.company_id.as_deref().map(str::trim) {
            None | Some("") => default_company.clone(),
            Some(c) => CompanyId::new(c)?,
        };
        let employee_name = required("employee_name", input.employee_name.as_deref(), MAX_NAME_LEN)?;
        let employee_id = EmployeeId::new(input.employee_id.as_deref().unwrap_or_default())?;
        let gender = required("gender", input.gender.as_deref(), MAX_GENDER_LEN)?;
        let age = parse_age(input.age.as_ref())?;

        let email = optional("email", input.email.as_deref(), MAX_CONTACT_LEN)?;
        if let Some(email) = &email {
            if !looks_like_email(email) {
                return Err(ValidationError::format("email", "enter a valid email address"));
            }
        }

        Ok(Self {
            company_id,
            employee_name,
            employee_id,
            gender,
            age,
            company_name: optional("company_name", input.company_name.as_deref(), MAX_DEPARTMENT_LEN)?,
            department: optional("department", input.department.as_deref(), MAX_DEPARTMENT_LEN)?,
            email,
            mobile: optional("mobile", input.mobile.as_deref(), MAX_CONTACT_LEN)?,
        })
    }
}

fn parse_age(value: Option<&Value>) -> Result<i32, ValidationError> {
    let age = match value {
        None | Some(Value::Null) => return Err(ValidationError::Empty { field: "age" }),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ValidationError::Empty { field: "age" })
        }
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| ValidationError::format("age", "must be a whole number"))?;

    if !(0..=MAX_AGE).contains(&age) {
        return Err(ValidationError::OutOfRange {
            field: "age",
            min: 0,
            max: MAX_AGE,
        });
    }
    Ok(age as i32)
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Age bucket used by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeGroup {
    Under30,
    Thirties,
    Forties,
    Fifties,
    SixtyPlus,
}

impl AgeGroup {
    pub fn from_age(age: i32) -> Self {
        match age {
            i32::MIN..=29 => Self::Under30,
            30..=39 => Self::Thirties,
            40..=49 => Self::Forties,
            50..=59 => Self::Fifties,
            _ => Self::SixtyPlus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Under30 => "<30",
            Self::Thirties => "30-39",
            Self::Forties => "40-49",
            Self::Fifties => "50-59",
            Self::SixtyPlus => "60+",
        }
    }
}
