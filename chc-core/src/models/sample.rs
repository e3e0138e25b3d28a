//! Sample lifecycle
//!
//! Every billed test on a barcode moves through
//! `Pending → Collected → Transferred → Batched → Received`.
//! The desk endpoints drive the first three states; `Batched` and
//! `Received` are only reached through batch creation and batch receipt.
//!
//! Test details are stored as a JSON list of [`SampleTest`]. Older rows may
//! hold the list as a JSON-encoded string; [`parse_stored_tests`] reads both.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::batch::BatchNumber;
use super::ValidationError;

/// Specimen type recorded when the desk does not supply one
pub const DEFAULT_SPECIMEN_TYPE: &str = "Standard";

/// Catalog test identifier
///
/// Arrives as an integer, a string, or an extended-JSON
/// `{"$numberLong": "…"}` object. Two ids match when their
/// [`key`](TestId::key) is equal, so `7` and `"7"` are the same test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum TestId {
    Num(i64),
    Text(String),
}

impl TestId {
    /// Read an id from JSON; null, blank and non-scalar values give `None`.
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => Some(n.as_i64().map(Self::Num).unwrap_or_else(|| Self::Text(n.to_string()))),
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| Self::Text(s.to_owned()))
            }
            Value::Object(o) => o
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.trim().parse().ok())
                .map(Self::Num),
            _ => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    pub fn matches(&self, other: &TestId) -> bool {
        self.key() == other.key()
    }
}

impl<'de> Deserialize<'de> for TestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Self::from_value(&v).ok_or_else(|| de::Error::custom("invalid test_id"))
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Per-test sample status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SampleStatus {
    Pending,
    Collected,
    Transferred,
    Batched,
    Received,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Collected => "Collected",
            Self::Transferred => "Transferred",
            Self::Batched => "Batched",
            Self::Received => "Received",
        }
    }

    /// Statuses the collection and transfer endpoints may set directly.
    pub fn is_desk_status(&self) -> bool {
        matches!(self, Self::Pending | Self::Collected | Self::Transferred)
    }

    /// A test may stay where it is or advance exactly one step.
    pub fn can_become(&self, next: SampleStatus) -> bool {
        let (from, to) = (*self as u8, next as u8);
        to == from || to == from + 1
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "collected" => Ok(Self::Collected),
            "transferred" => Ok(Self::Transferred),
            "batched" => Ok(Self::Batched),
            "received" => Ok(Self::Received),
            _ => Err(ValidationError::InvalidValue {
                field: "samplestatus",
                value: s.to_owned(),
            }),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error("test {test_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        test_id: String,
        from: SampleStatus,
        to: SampleStatus,
    },

    #[error("status {status} is set by batch operations")]
    ReservedStatus { status: SampleStatus },
}

/// One test on a sample, with who/when stamps per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTest {
    #[serde(default, alias = "test_name")]
    pub testname: String,
    pub test_id: TestId,
    #[serde(default = "pending")]
    pub samplestatus: SampleStatus,
    #[serde(default, deserialize_with = "lenient_time")]
    pub samplecollected_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub collected_by: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub sampletransferred_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transferred_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub received_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub received_by: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default = "default_specimen")]
    pub specimen_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default)]
    pub lastmodified_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub lastmodified_time: Option<DateTime<Utc>>,
}

fn pending() -> SampleStatus {
    SampleStatus::Pending
}

fn default_specimen() -> String {
    DEFAULT_SPECIMEN_TYPE.to_owned()
}

/// Accept RFC 3339 or naive ISO timestamps (read as UTC); anything else is `None`.
fn lenient_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let v = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::String(s)) = v else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&s) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    Ok(chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc()))
}

impl SampleTest {
    fn from_incoming(incoming: &IncomingTest, status: SampleStatus, actor: &str, now: DateTime<Utc>) -> Self {
        let collected = status == SampleStatus::Collected;
        Self {
            testname: incoming.testname.clone(),
            test_id: incoming.test_id.clone(),
            samplestatus: status,
            samplecollected_time: collected.then_some(now),
            collected_by: collected.then(|| actor.to_owned()),
            batch_number: None,
            sampletransferred_time: None,
            transferred_by: None,
            received_time: None,
            received_by: None,
            remarks: None,
            specimen_type: incoming
                .specimen_type
                .clone()
                .unwrap_or_else(default_specimen),
            shortcut: incoming.shortcut.clone(),
            lastmodified_by: Some(actor.to_owned()),
            lastmodified_time: Some(now),
        }
    }

    fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.lastmodified_by = Some(actor.to_owned());
        self.lastmodified_time = Some(now);
    }

    pub fn is_awaiting_batch(&self) -> bool {
        self.samplestatus == SampleStatus::Transferred && self.batch_number.as_deref().map_or(true, str::is_empty)
    }

    /// Specimen type recorded at the desk, ignoring the placeholder default.
    pub fn recorded_specimen(&self) -> Option<&str> {
        let s = self.specimen_type.trim();
        (!s.is_empty() && s != DEFAULT_SPECIMEN_TYPE).then_some(s)
    }
}

/// A test as sent by the collection or transfer desk
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingTest {
    pub test_id: TestId,
    pub testname: String,
    pub samplestatus: Option<SampleStatus>,
    pub specimen_type: Option<String>,
    pub shortcut: Option<String>,
}

/// Parse the `testdetails` list of a collection or transfer request.
///
/// Entries that are not objects or have no usable `test_id` are dropped.
/// An unknown `samplestatus` is an error rather than a silent skip.
pub fn parse_incoming_tests(value: &Value) -> Result<Vec<IncomingTest>, ValidationError> {
    let Value::Array(items) = value else {
        return Err(ValidationError::rule("testdetails must be a list of objects"));
    };

    let mut tests = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else { continue };
        let Some(test_id) = obj.get("test_id").and_then(TestId::from_value) else {
            continue;
        };
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let samplestatus = text("samplestatus").map(|s| s.parse()).transpose()?;

        tests.push(IncomingTest {
            test_id,
            testname: text("testname").or_else(|| text("test_name")).unwrap_or_default(),
            samplestatus,
            specimen_type: text("specimen_type"),
            shortcut: text("shortcut"),
        });
    }

    if tests.is_empty() {
        return Err(ValidationError::rule("No valid tests with test_id found"));
    }
    Ok(tests)
}

/// Read stored test details, tolerating string-encoded lists.
pub fn parse_stored_tests(value: &Value) -> Vec<SampleTest> {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner @ Value::Array(_)) => parse_stored_tests(&inner),
            _ => Vec::new(),
        },
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match serde_json::from_value::<SampleTest>(item.clone()) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed stored test entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Outcome of a collection update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionSummary {
    pub updated: usize,
    pub added: usize,
}

fn index_by_key(tests: &[SampleTest]) -> HashMap<String, usize> {
    tests
        .iter()
        .enumerate()
        .map(|(i, t)| (t.test_id.key(), i))
        .collect()
}

fn checked(current: SampleStatus, next: SampleStatus, test_id: &TestId) -> Result<(), LifecycleError> {
    if !next.is_desk_status() {
        return Err(LifecycleError::ReservedStatus { status: next });
    }
    if !current.can_become(next) {
        return Err(LifecycleError::InvalidTransition {
            test_id: test_id.key(),
            from: current,
            to: next,
        });
    }
    Ok(())
}

/// Apply a collection request. Status defaults to `Pending`.
///
/// Known tests are updated in place, unknown ones appended. Either every
/// change applies or, on a rejected transition, none does.
pub fn record_collection(
    tests: &mut Vec<SampleTest>,
    incoming: &[IncomingTest],
    actor: &str,
    now: DateTime<Utc>,
) -> Result<CollectionSummary, LifecycleError> {
    let mut work = tests.clone();
    let mut index = index_by_key(&work);
    let mut summary = CollectionSummary::default();

    for inc in incoming {
        let next = inc.samplestatus.unwrap_or(SampleStatus::Pending);
        let key = inc.test_id.key();
        match index.get(&key).copied() {
            Some(i) => {
                let test = &mut work[i];
                checked(test.samplestatus, next, &inc.test_id)?;
                if next == SampleStatus::Collected && test.samplestatus != SampleStatus::Collected {
                    test.collected_by = Some(actor.to_owned());
                    test.samplecollected_time = Some(now);
                }
                if test.recorded_specimen().is_none() {
                    if let Some(specimen) = &inc.specimen_type {
                        test.specimen_type = specimen.clone();
                    }
                }
                if test.testname.is_empty() {
                    test.testname = inc.testname.clone();
                }
                if test.shortcut.is_none() {
                    test.shortcut = inc.shortcut.clone();
                }
                test.samplestatus = next;
                test.touch(actor, now);
                summary.updated += 1;
            }
            None => {
                checked(SampleStatus::Pending, next, &inc.test_id)?;
                index.insert(key, work.len());
                work.push(SampleTest::from_incoming(inc, next, actor, now));
                summary.added += 1;
            }
        }
    }

    *tests = work;
    Ok(summary)
}

/// Apply a transfer request to known tests only. Status defaults to `Transferred`.
///
/// Returns the number of tests updated.
pub fn record_transfer(
    tests: &mut Vec<SampleTest>,
    incoming: &[IncomingTest],
    actor: &str,
    now: DateTime<Utc>,
) -> Result<usize, LifecycleError> {
    let mut work = tests.clone();
    let index = index_by_key(&work);
    let mut updated = 0;

    for inc in incoming {
        let Some(&i) = index.get(&inc.test_id.key()) else { continue };
        let next = inc.samplestatus.unwrap_or(SampleStatus::Transferred);
        let test = &mut work[i];
        checked(test.samplestatus, next, &inc.test_id)?;
        if next == SampleStatus::Transferred && test.samplestatus != SampleStatus::Transferred {
            test.transferred_by = Some(actor.to_owned());
            test.sampletransferred_time = Some(now);
        }
        test.samplestatus = next;
        test.touch(actor, now);
        updated += 1;
    }

    *tests = work;
    Ok(updated)
}

/// Tests that belong in `batch`: awaiting a batch, or already batched under it.
pub fn tests_for_batch<'a>(
    tests: &'a [SampleTest],
    batch: &'a BatchNumber,
) -> impl Iterator<Item = &'a SampleTest> + 'a {
    tests.iter().filter(move |t| {
        t.is_awaiting_batch()
            || (t.samplestatus == SampleStatus::Batched && t.batch_number.as_deref() == Some(batch.as_str()))
    })
}

/// Move every transferred, unbatched test into `batch`.
pub fn assign_batch(
    tests: &mut [SampleTest],
    batch: &BatchNumber,
    actor: &str,
    now: DateTime<Utc>,
) -> usize {
    let mut assigned = 0;
    for test in tests.iter_mut().filter(|t| t.is_awaiting_batch()) {
        test.samplestatus = SampleStatus::Batched;
        test.batch_number = Some(batch.as_str().to_owned());
        test.touch(actor, now);
        assigned += 1;
    }
    assigned
}

/// Mark the tests of `batch` as received at the lab.
pub fn mark_received(
    tests: &mut [SampleTest],
    batch: &BatchNumber,
    actor: &str,
    remarks: Option<&str>,
    now: DateTime<Utc>,
) -> usize {
    let mut received = 0;
    for test in tests.iter_mut().filter(|t| {
        t.samplestatus == SampleStatus::Batched && t.batch_number.as_deref() == Some(batch.as_str())
    }) {
        test.samplestatus = SampleStatus::Received;
        test.received_by = Some(actor.to_owned());
        test.received_time = Some(now);
        if let Some(remarks) = remarks {
            test.remarks = Some(remarks.to_owned());
        }
        test.touch(actor, now);
        received += 1;
    }
    received
}

/// True if some billed test has not been collected yet.
pub fn has_uncollected(billed: &[TestId], tests: &[SampleTest]) -> bool {
    let processed: HashSet<String> = tests
        .iter()
        .filter(|t| t.samplestatus >= SampleStatus::Collected)
        .map(|t| t.test_id.key())
        .collect();
    billed.iter().any(|id| !processed.contains(&id.key()))
}

/// True if some transferred test still needs a batch.
pub fn awaiting_batch(tests: &[SampleTest]) -> bool {
    tests.iter().any(SampleTest::is_awaiting_batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-14T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn incoming(id: i64, status: Option<SampleStatus>) -> IncomingTest {
        IncomingTest {
            test_id: TestId::Num(id),
            testname: format!("Test {}", id),
            samplestatus: status,
            specimen_type: None,
            shortcut: None,
        }
    }

    #[test]
    fn test_id_shapes() {
        assert_eq!(TestId::from_value(&json!(12)), Some(TestId::Num(12)));
        assert_eq!(TestId::from_value(&json!({"$numberLong": "99"})), Some(TestId::Num(99)));
        assert_eq!(TestId::from_value(&json!(" LFT ")), Some(TestId::Text("LFT".into())));
        assert_eq!(TestId::from_value(&json!("")), None);
        assert_eq!(TestId::from_value(&json!(null)), None);
        assert!(TestId::Num(7).matches(&TestId::Text("7".into())));
    }

    #[test]
    fn status_steps() {
        use SampleStatus::*;
        assert!(Pending.can_become(Pending));
        assert!(Pending.can_become(Collected));
        assert!(!Pending.can_become(Transferred));
        assert!(!Transferred.can_become(Collected));
        assert!(Batched.can_become(Received));
        assert_eq!("transferred".parse::<SampleStatus>().unwrap(), Transferred);
        assert!("Lost".parse::<SampleStatus>().is_err());
    }

    #[test]
    fn incoming_filters_entries_without_test_id() {
        let raw = json!([
            {"test_id": 1, "testname": "CBC", "samplestatus": "Collected"},
            {"testname": "no id"},
            "junk",
            {"test_id": null},
            {"test_id": "T9", "test_name": "Lipid", "specimen_type": "Serum"}
        ]);
        let parsed = parse_incoming_tests(&raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].samplestatus, Some(SampleStatus::Collected));
        assert_eq!(parsed[1].testname, "Lipid");
        assert_eq!(parsed[1].specimen_type.as_deref(), Some("Serum"));
    }

    #[test]
    fn incoming_errors() {
        let err = parse_incoming_tests(&json!([{"testname": "x"}])).unwrap_err();
        assert_eq!(err.to_string(), "No valid tests with test_id found");
        assert!(parse_incoming_tests(&json!({"test_id": 1})).is_err());
        assert!(parse_incoming_tests(&json!([{"test_id": 1, "samplestatus": "Lost"}])).is_err());
    }

    #[test]
    fn stored_tests_accept_string_encoding() {
        let list = json!([{"test_id": 1, "testname": "CBC", "samplestatus": "Transferred"}]);
        let encoded = Value::String(list.to_string());
        assert_eq!(parse_stored_tests(&list), parse_stored_tests(&encoded));
        assert_eq!(parse_stored_tests(&encoded)[0].specimen_type, "Standard");
        assert!(parse_stored_tests(&json!("garbage")).is_empty());
    }

    #[test]
    fn stored_tests_read_naive_timestamps() {
        let raw = json!([{"test_id": 1, "samplecollected_time": "2025-03-14T09:30:00.123456", "lastmodified_time": "bogus"}]);
        let t = &parse_stored_tests(&raw)[0];
        assert!(t.samplecollected_time.is_some());
        assert!(t.lastmodified_time.is_none());
    }

    #[test]
    fn collection_adds_and_stamps() {
        let mut tests = Vec::new();
        let summary = record_collection(
            &mut tests,
            &[incoming(1, Some(SampleStatus::Collected)), incoming(2, None)],
            "nurse.a",
            now(),
        )
        .unwrap();
        assert_eq!(summary, CollectionSummary { updated: 0, added: 2 });
        assert_eq!(tests[0].collected_by.as_deref(), Some("nurse.a"));
        assert_eq!(tests[0].samplecollected_time, Some(now()));
        assert_eq!(tests[1].samplestatus, SampleStatus::Pending);
        assert!(tests[1].collected_by.is_none());
    }

    #[test]
    fn collection_rejects_skips_atomically() {
        let mut tests = Vec::new();
        record_collection(&mut tests, &[incoming(1, None)], "a", now()).unwrap();
        let before = tests.clone();
        let err = record_collection(
            &mut tests,
            &[incoming(1, Some(SampleStatus::Collected)), incoming(2, Some(SampleStatus::Transferred))],
            "a",
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        assert_eq!(tests, before);
    }

    #[test]
    fn collection_cannot_set_batch_states() {
        let mut tests = Vec::new();
        let err = record_collection(&mut tests, &[incoming(1, Some(SampleStatus::Batched))], "a", now()).unwrap_err();
        assert_eq!(err, LifecycleError::ReservedStatus { status: SampleStatus::Batched });
    }

    #[test]
    fn transfer_updates_only_known_tests() {
        let mut tests = Vec::new();
        record_collection(&mut tests, &[incoming(1, Some(SampleStatus::Collected))], "a", now()).unwrap();
        let n = record_transfer(&mut tests, &[incoming(1, None), incoming(5, None)], "runner", now()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].samplestatus, SampleStatus::Transferred);
        assert_eq!(tests[0].transferred_by.as_deref(), Some("runner"));

        let none = record_transfer(&mut tests, &[incoming(9, None)], "runner", now()).unwrap();
        assert_eq!(none, 0);
    }

    #[test]
    fn batch_and_receipt() {
        let batch = BatchNumber::new("BATCH-1").unwrap();
        let mut tests = Vec::new();
        record_collection(
            &mut tests,
            &[incoming(1, Some(SampleStatus::Collected)), incoming(2, Some(SampleStatus::Collected))],
            "a",
            now(),
        )
        .unwrap();
        record_transfer(&mut tests, &[incoming(1, None)], "b", now()).unwrap();

        assert!(awaiting_batch(&tests));
        assert_eq!(tests_for_batch(&tests, &batch).count(), 1);
        assert_eq!(assign_batch(&mut tests, &batch, "c", now()), 1);
        assert!(!awaiting_batch(&tests));
        // Re-running the same batch still sees its own tests.
        assert_eq!(tests_for_batch(&tests, &batch).count(), 1);

        assert_eq!(mark_received(&mut tests, &batch, "lab", Some("ok"), now()), 1);
        assert_eq!(tests[0].samplestatus, SampleStatus::Received);
        assert_eq!(tests[0].remarks.as_deref(), Some("ok"));
        assert_eq!(tests[1].samplestatus, SampleStatus::Collected);
    }

    #[test]
    fn uncollected_detection() {
        let mut tests = Vec::new();
        record_collection(&mut tests, &[incoming(1, Some(SampleStatus::Collected)), incoming(2, None)], "a", now())
            .unwrap();
        assert!(has_uncollected(&[TestId::Num(1), TestId::Num(2)], &tests));
        assert!(!has_uncollected(&[TestId::Text("1".into())], &tests));
        assert!(has_uncollected(&[TestId::Num(3)], &[]));
    }
}
