/// End-to-end walk of one barcode through the sample lifecycle.
///
/// Mirrors what the HTTP handlers do: the billing decides which tests are
/// expected, the desk collects and transfers them, a batch picks up the
/// transferred ones and the lab receives the batch.
use chc_core::models::billing::billed_test_ids;
use chc_core::models::sample::{
    assign_batch, awaiting_batch, has_uncollected, mark_received, parse_incoming_tests,
    parse_stored_tests, record_collection, record_transfer, tests_for_batch,
};
use chc_core::models::{
    resolve_specimen, BatchNumber, LifecycleError, SampleStatus, SampleTest, SpecimenKey,
    SpecimenTally,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-02T04:15:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn status_of(tests: &[SampleTest], id: i64) -> SampleStatus {
    tests
        .iter()
        .find(|t| t.test_id.key() == id.to_string())
        .map(|t| t.samplestatus)
        .unwrap()
}

#[test]
fn full_lifecycle() {
    let billing = json!([
        {"test_id": 11, "testname": "CBC", "shortcut": "CBC"},
        {"test_id": 12, "testname": "Urine Routine"},
        {"test_id": {"$numberLong": "13"}, "testname": "Lipid Profile"}
    ]);
    let billed = billed_test_ids(&billing);
    assert_eq!(billed.len(), 3);

    let mut tests: Vec<SampleTest> = Vec::new();
    assert!(has_uncollected(&billed, &tests));

    // Collect two of three.
    let incoming = parse_incoming_tests(&json!([
        {"test_id": 11, "testname": "CBC", "samplestatus": "Collected", "shortcut": "CBC"},
        {"test_id": "12", "testname": "Urine Routine", "samplestatus": "Collected", "specimen_type": "Urine"}
    ]))
    .unwrap();
    let summary = record_collection(&mut tests, &incoming, "desk-1", t0()).unwrap();
    assert_eq!(summary.added, 2);
    assert!(has_uncollected(&billed, &tests));

    // Third one later, as a numberLong id.
    let incoming = parse_incoming_tests(&json!([
        {"test_id": 13, "testname": "Lipid Profile", "samplestatus": "Collected"}
    ]))
    .unwrap();
    record_collection(&mut tests, &incoming, "desk-1", t0() + Duration::minutes(5)).unwrap();
    assert!(!has_uncollected(&billed, &tests));
    assert!(tests.iter().all(|t| t.collected_by.as_deref() == Some("desk-1")));

    // Transfer only the first two.
    let incoming = parse_incoming_tests(&json!([{"test_id": 11}, {"test_id": 12}, {"test_id": 99}])).unwrap();
    let updated = record_transfer(&mut tests, &incoming, "runner", t0() + Duration::hours(1)).unwrap();
    assert_eq!(updated, 2);
    assert!(awaiting_batch(&tests));
    assert_eq!(status_of(&tests, 13), SampleStatus::Collected);

    // Tally and assign a batch.
    let batch = BatchNumber::new("B-0602-1").unwrap();
    let catalog = |key: &SpecimenKey| match key.value() {
        "CBC" => Some("EDTA Blood"),
        _ => None,
    };
    let mut tally = SpecimenTally::new();
    for t in tests_for_batch(&tests, &batch) {
        let from_catalog = SpecimenKey::for_test(t).and_then(|k| catalog(&k));
        tally.add(&resolve_specimen(from_catalog, t));
    }
    let counts = tally.into_counts();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0].specimen_type, "EDTA Blood");
    assert_eq!(counts[1].specimen_type, "Urine");

    let assigned = assign_batch(&mut tests, &batch, "runner", t0() + Duration::hours(2));
    assert_eq!(assigned, 2);
    assert!(!awaiting_batch(&tests));
    // Still counted for the same batch when it is posted again.
    assert_eq!(tests_for_batch(&tests, &batch).count(), 2);

    // Receive at the lab.
    let received = mark_received(&mut tests, &batch, "lab", Some("intact"), t0() + Duration::hours(5));
    assert_eq!(received, 2);
    assert_eq!(status_of(&tests, 11), SampleStatus::Received);
    assert_eq!(status_of(&tests, 13), SampleStatus::Collected);

    // Stored as a list and read back identically.
    let stored = serde_json::to_value(&tests).unwrap();
    assert!(stored.is_array());
    assert_eq!(parse_stored_tests(&stored), tests);
}

#[test]
fn desk_cannot_skip_or_rewind() {
    let mut tests = Vec::new();
    let collect = parse_incoming_tests(&json!([{"test_id": 1, "samplestatus": "Collected"}])).unwrap();
    record_collection(&mut tests, &collect, "desk", t0()).unwrap();

    let rewind = parse_incoming_tests(&json!([{"test_id": 1, "samplestatus": "Pending"}])).unwrap();
    let err = record_collection(&mut tests, &rewind, "desk", t0()).unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

    let reserved = parse_incoming_tests(&json!([{"test_id": 1, "samplestatus": "Batched"}])).unwrap();
    let err = record_transfer(&mut tests, &reserved, "desk", t0()).unwrap_err();
    assert_eq!(err, LifecycleError::ReservedStatus { status: SampleStatus::Batched });

    assert_eq!(status_of(&tests, 1), SampleStatus::Collected);
}

#[test]
fn legacy_string_encoded_details_are_readable() {
    let legacy = json!("[{\"testname\": \"CBC\", \"test_id\": 5, \"samplestatus\": \"Transferred\", \"sampletransferred_time\": \"2024-11-02T10:00:00\"}]");
    let tests = parse_stored_tests(&legacy);
    assert_eq!(tests.len(), 1);
    assert!(tests[0].is_awaiting_batch());
    assert!(tests[0].sampletransferred_time.is_some());
}
