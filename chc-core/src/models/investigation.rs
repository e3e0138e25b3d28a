//! Medical investigation fields: status, vitals, attachments

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ValidationError;

/// Review status of an investigation or ophthalmology record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ValidationError::InvalidValue {
                field: "status",
                value: s.to_owned(),
            }),
        }
    }
}

/// Vitals captured at the checkup (height, weight, bp, spo2, …)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vitals(pub Map<String, Value>);

impl Vitals {
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Object(m) => Self(m.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(m)) => Self(m),
                _ => Self::default(),
            },
            _ => Self::default(),
        }
    }

    fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn weight_kg(&self) -> Option<f64> {
        self.number("weight_kg")
    }

    pub fn height_cm(&self) -> Option<f64> {
        self.number("height_cm")
    }

    /// Body-mass index, when both height and weight are usable.
    pub fn bmi(&self) -> Option<f64> {
        let height_m = self.height_cm()? / 100.0;
        let weight = self.weight_kg()?;
        if height_m <= 0.0 || weight <= 0.0 || !height_m.is_finite() || !weight.is_finite() {
            return None;
        }
        Some(weight / (height_m * height_m))
    }
}

/// Parse a multipart text field that must hold a JSON object.
///
/// A missing or blank field is an empty object.
pub fn parse_json_object(field: &'static str, raw: Option<&str>) -> Result<Map<String, Value>, ValidationError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Map::new()),
        Some(r) => r,
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(m)) => Ok(m),
        Ok(_) => Err(ValidationError::rule(format!(
            "{} must be a valid JSON object",
            capitalize(field)
        ))),
        Err(e) => Err(ValidationError::rule(format!("Invalid JSON format: {}", e))),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uploaded report attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Xray,
    XrayFilm,
    Ecg,
    Pft,
    Audiometry,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 5] = [
        Self::Xray,
        Self::XrayFilm,
        Self::Ecg,
        Self::Pft,
        Self::Audiometry,
    ];

    /// Multipart field name the upload arrives under.
    pub fn form_field(&self) -> &'static str {
        match self {
            Self::Xray => "xray_file",
            Self::XrayFilm => "scan_file",
            Self::Ecg => "ecg_file",
            Self::Pft => "pft_file",
            Self::Audiometry => "audiometric_file",
        }
    }

    /// Investigation column holding the stored blob id.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Xray => "xray_file",
            Self::XrayFilm => "xrayfilm_file",
            Self::Ecg => "ecg_file",
            Self::Pft => "pft_file",
            Self::Audiometry => "audiometric_file",
        }
    }

    pub fn from_form_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.form_field() == name)
    }
}
