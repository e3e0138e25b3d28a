//! Batch numbers and specimen tallies

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::sample::SampleTest;
use super::ValidationError;

const MAX_BATCH_NUMBER_LEN: usize = 20;

/// Specimen type reported when neither the catalog nor the desk knows it
pub const UNKNOWN_SPECIMEN: &str = "Unknown";

static BATCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("invalid batch regex"));

/// Shipment batch number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchNumber(String);

impl BatchNumber {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "batch_number" });
        }
        if s.len() > MAX_BATCH_NUMBER_LEN {
            return Err(ValidationError::TooLong {
                field: "batch_number",
                max: MAX_BATCH_NUMBER_LEN,
            });
        }
        if !BATCH_RE.is_match(s) {
            return Err(ValidationError::format(
                "batch_number",
                "letters, digits, '-' and '_' only",
            ));
        }
        Ok(Self(s.to_owned()))
    }

    /// `BATCH-YYYYMMDD-NNN` for the `seq`-th batch of `day`; past 999 the
    /// counter grows a digit.
    ///
    /// ```
    /// use chc_core::models::BatchNumber;
    /// use chrono::NaiveDate;
    ///
    /// let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
    /// assert_eq!(BatchNumber::generate(day, 7).as_str(), "BATCH-20250314-007");
    /// ```
    pub fn generate(day: NaiveDate, seq: u32) -> Self {
        Self(format!("BATCH-{}-{:03}", day.format("%Y%m%d"), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Catalog lookup key for a test's specimen type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecimenKey {
    Shortcut(String),
    TestName(String),
}

impl SpecimenKey {
    /// Prefer the shortcut, fall back to the test name; both uppercased.
    pub fn for_test(test: &SampleTest) -> Option<Self> {
        let clean = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_uppercase())
        };
        test.shortcut
            .as_deref()
            .and_then(clean)
            .map(Self::Shortcut)
            .or_else(|| clean(&test.testname).map(Self::TestName))
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Shortcut(v) | Self::TestName(v) => v,
        }
    }
}

/// Pick the specimen type: catalog first, then what the desk recorded.
pub fn resolve_specimen(catalog: Option<&str>, test: &SampleTest) -> String {
    catalog
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| test.recorded_specimen())
        .unwrap_or(UNKNOWN_SPECIMEN)
        .to_owned()
}

/// One row of a batch's specimen summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecimenCount {
    pub specimen_type: String,
    pub count: u32,
}

/// Count of tests per specimen type, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecimenTally {
    counts: Vec<SpecimenCount>,
}

impl SpecimenTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, specimen_type: &str) {
        match self.counts.iter_mut().find(|c| c.specimen_type == specimen_type) {
            Some(c) => c.count += 1,
            None => self.counts.push(SpecimenCount {
                specimen_type: specimen_type.to_owned(),
                count: 1,
            }),
        }
    }

    pub fn into_counts(self) -> Vec<SpecimenCount> {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample::parse_stored_tests;
    use serde_json::json;

    fn test(v: serde_json::Value) -> SampleTest {
        parse_stored_tests(&json!([v])).remove(0)
    }

    #[test]
    fn batch_number_rules() {
        assert!(BatchNumber::new("B-001").is_ok());
        assert!(BatchNumber::new("").is_err());
        assert!(BatchNumber::new("has space").is_err());
        assert!(BatchNumber::new(&"B".repeat(21)).is_err());
    }

    #[test]
    fn generated_numbers_are_valid() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let generated = BatchNumber::generate(day, 12);
        assert_eq!(generated.as_str(), "BATCH-20251201-012");
        assert!(BatchNumber::new(generated.as_str()).is_ok());
    }

    #[test]
    fn generated_numbers_do_not_wrap() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let thousandth = BatchNumber::generate(day, 1000);
        assert_eq!(thousandth.as_str(), "BATCH-20251201-1000");
        assert_ne!(thousandth, BatchNumber::generate(day, 0));
        assert!(BatchNumber::new(BatchNumber::generate(day, 99_999).as_str()).is_ok());
    }

    #[test]
    fn specimen_key_prefers_shortcut() {
        let t = test(json!({"test_id": 1, "testname": "Complete Blood Count", "shortcut": "cbc"}));
        assert_eq!(SpecimenKey::for_test(&t), Some(SpecimenKey::Shortcut("CBC".into())));

        let t = test(json!({"test_id": 1, "test_name": "lipid profile"}));
        let key = SpecimenKey::for_test(&t).unwrap();
        assert_eq!(key, SpecimenKey::TestName("LIPID PROFILE".into()));
        assert_eq!(key.value(), "LIPID PROFILE");

        let t = test(json!({"test_id": 1}));
        assert_eq!(SpecimenKey::for_test(&t), None);
    }

    #[test]
    fn specimen_resolution_order() {
        let recorded = test(json!({"test_id": 1, "specimen_type": "Urine"}));
        let placeholder = test(json!({"test_id": 2}));
        assert_eq!(resolve_specimen(Some("Serum"), &recorded), "Serum");
        assert_eq!(resolve_specimen(None, &recorded), "Urine");
        assert_eq!(resolve_specimen(Some(" "), &placeholder), "Unknown");
    }

    #[test]
    fn tally_keeps_first_seen_order() {
        let mut tally = SpecimenTally::new();
        for s in ["Serum", "Urine", "Serum", "EDTA Blood", "Serum"] {
            tally.add(s);
        }
        let counts = tally.into_counts();
        assert_eq!(counts.iter().map(|c| c.count).sum::<u32>(), 5);
        assert_eq!(counts[0], SpecimenCount { specimen_type: "Serum".into(), count: 3 });
        assert_eq!(counts[2].specimen_type, "EDTA Blood");
    }
}
