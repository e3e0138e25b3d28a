//! Billing payload validation and billed-test extraction

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::sample::TestId;
use super::validation::optional;
use super::{Barcode, CompanyId, EmployeeId, ValidationError};

const DEFAULT_PAYMENT_MODE: &str = "Credit";
const MAX_PAYMENT_MODE_LEN: usize = 50;

/// Billing fields posted together with the employee registration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingInput {
    pub barcode: Option<String>,
    #[serde(rename = "totalAmount")]
    pub total_amount: Option<Value>,
    #[serde(rename = "paymentMode")]
    pub payment_mode: Option<String>,
    pub testdetails: Option<Value>,
}

/// Validated billing ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewBilling {
    pub company_id: CompanyId,
    pub employee_id: EmployeeId,
    pub barcode: Barcode,
    /// Always a JSON array
    pub testdetails: Value,
    pub net_amount: Decimal,
    pub payment_mode: String,
}

impl NewBilling {
    pub fn validate(
        input: &BillingInput,
        employee_id: &EmployeeId,
        company_id: &CompanyId,
    ) -> Result<Self, ValidationError> {
        let barcode = Barcode::new(input.barcode.as_deref().unwrap_or_default())?;
        let net_amount = parse_amount("totalAmount", input.total_amount.as_ref())?;
        let payment_mode = optional("paymentMode", input.payment_mode.as_deref(), MAX_PAYMENT_MODE_LEN)?
            .unwrap_or_else(|| DEFAULT_PAYMENT_MODE.to_owned());

        let testdetails = match &input.testdetails {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(v @ Value::Array(_)) => v.clone(),
            Some(_) => {
                return Err(ValidationError::format(
                    "testdetails",
                    "must be a list of objects",
                ))
            }
        };

        Ok(Self {
            company_id: company_id.clone(),
            employee_id: employee_id.clone(),
            barcode,
            testdetails,
            net_amount,
            payment_mode,
        })
    }
}

/// Upper bound of a NUMERIC(10,2) column
fn max_amount() -> Decimal {
    Decimal::new(99_999_999_99, 2)
}

/// Parse a money amount given as a JSON number or numeric string.
///
/// Missing or null amounts are zero. Negative amounts and values that do
/// not fit NUMERIC(10,2) are rejected.
pub fn parse_amount(field: &'static str, value: Option<&Value>) -> Result<Decimal, ValidationError> {
    let amount = match value {
        None | Some(Value::Null) => return Ok(Decimal::ZERO),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Decimal::ZERO),
        Some(Value::String(s)) => Decimal::from_str(s.trim()),
        Some(_) => return Err(ValidationError::format(field, "must be a number")),
    }
    .map_err(|_| ValidationError::format(field, "must be a number"))?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::format(field, "must not be negative"));
    }
    let amount = amount.round_dp(2);
    if amount > max_amount() {
        return Err(ValidationError::format(field, "exceeds 99999999.99"));
    }
    Ok(amount)
}

/// Test ids billed on a billing record.
///
/// Billing test details have been stored as a list, a single object, and a
/// string holding either; all are accepted. Only objects with a non-null
/// `test_id` count.
pub fn billed_test_ids(testdetails: &Value) -> Vec<TestId> {
    match testdetails {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner @ (Value::Array(_) | Value::Object(_))) => billed_test_ids(&inner),
            _ => Vec::new(),
        },
        Value::Array(items) => items.iter().filter_map(test_id_of).collect(),
        Value::Object(_) => test_id_of(testdetails).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn test_id_of(item: &Value) -> Option<TestId> {
    item.as_object()
        .and_then(|o| o.get("test_id"))
        .and_then(TestId::from_value)
}
