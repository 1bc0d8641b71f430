use ontomap::classify::{
    assign_path, detect_boolean_set, detect_patterns, ClassificationPath, PatternKind,
};
use ontomap::profile::ColumnProfile;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_boolean_sets_all_canonical_pairs() {
    // The five canonical pairs, in any case, are boolean
    for pair in [
        ["0", "1"],
        ["true", "false"],
        ["yes", "no"],
        ["Y", "N"],
        ["T", "F"],
        ["TRUE", "FALSE"],
        ["Yes", "No"],
    ] {
        assert!(
            detect_boolean_set(&strings(&pair)).is_some(),
            "{:?} should be boolean",
            pair
        );
    }
}

#[test]
fn test_boolean_rejects_wider_sets() {
    assert!(detect_boolean_set(&strings(&["0", "1", "2"])).is_none());
    assert!(detect_boolean_set(&strings(&["a", "b", "c", "d"])).is_none());
    assert!(detect_boolean_set(&strings(&["on", "off"])).is_none());
}

#[test]
fn test_uuid_path_assignment() {
    let samples = strings(&[
        "550e8400-e29b-41d4-a716-446655440000",
        "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
        "6ba7b811-9dad-11d1-80b4-00c04fd430c8",
    ]);
    let patterns = detect_patterns(&samples);
    assert!(patterns.contains(&PatternKind::Uuid));

    let profile = ColumnProfile {
        row_count: 1000,
        distinct_count: 1000,
        sample_values: samples,
        ..Default::default()
    };
    assert_eq!(
        assign_path("varchar(36)", &profile, &patterns, false),
        ClassificationPath::Uuid
    );
}

#[test]
fn test_external_id_path_assignment() {
    let samples = strings(&["cus_9f3kQ21abc", "cus_8a1bC93def", "cus_7m2nD45ghi"]);
    let patterns = detect_patterns(&samples);

    let profile = ColumnProfile {
        row_count: 500,
        distinct_count: 500,
        sample_values: samples,
        ..Default::default()
    };
    assert_eq!(
        assign_path("varchar", &profile, &patterns, false),
        ClassificationPath::ExternalId
    );
}

#[test]
fn test_epoch_column_takes_timestamp_path() {
    let samples = strings(&["1700000001", "1700000002", "1700000003"]);
    let patterns = detect_patterns(&samples);
    assert!(patterns.contains(&PatternKind::EpochSeconds));

    let profile = ColumnProfile {
        row_count: 100,
        distinct_count: 100,
        sample_values: samples,
        ..Default::default()
    };
    assert_eq!(
        assign_path("bigint", &profile, &patterns, false),
        ClassificationPath::Timestamp
    );
}

#[test]
fn test_low_cardinality_text_is_enum() {
    let profile = ColumnProfile {
        row_count: 1250,
        distinct_count: 3,
        sample_values: strings(&["A", "P", "C"]),
        ..Default::default()
    };
    assert_eq!(
        assign_path("varchar(1)", &profile, &[], false),
        ClassificationPath::Enum
    );
}

#[test]
fn test_boolean_beats_enum() {
    // Two distinct canonical values: boolean even though the cardinality
    // also fits the enum path
    let samples = strings(&["yes", "no"]);
    let boolean = detect_boolean_set(&samples).is_some();
    let profile = ColumnProfile {
        row_count: 1000,
        distinct_count: 2,
        sample_values: samples,
        ..Default::default()
    };
    assert_eq!(
        assign_path("varchar", &profile, &[], boolean),
        ClassificationPath::Boolean
    );
}

#[test]
fn test_currency_code_detection() {
    let patterns = detect_patterns(&strings(&["USD", "EUR", "JPY", "GBP"]));
    assert!(patterns.contains(&PatternKind::CurrencyCode));

    // Arbitrary three-letter tokens are not currency codes
    let patterns = detect_patterns(&strings(&["FOO", "BAR", "BAZ"]));
    assert!(!patterns.contains(&PatternKind::CurrencyCode));
}
