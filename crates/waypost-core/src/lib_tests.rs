//! Tests for core domain identifier types.

use super::*;

// ============================================================================
// Test: EventId
// ============================================================================

#[test]
fn test_event_id_accepts_provider_formats() {
    assert!(EventId::new("evt_5f2a9c".to_string()).is_ok());
    assert!(EventId::new("56db1f4613012711002229f6".to_string()).is_ok());
    assert!(EventId::new("a".repeat(128)).is_ok());
}

#[test]
fn test_event_id_rejects_empty() {
    let result = EventId::new(String::new());
    assert!(matches!(result, Err(ValidationError::Required { .. })));
}

#[test]
fn test_event_id_rejects_too_long() {
    let result = EventId::new("a".repeat(129));
    assert!(matches!(result, Err(ValidationError::TooLong { .. })));
}

#[test]
fn test_event_id_rejects_whitespace() {
    let result = EventId::new("evt 123".to_string());
    assert!(matches!(
        result,
        Err(ValidationError::InvalidCharacters { .. })
    ));
}

// ============================================================================
// Test: GeofenceTag
// ============================================================================

#[test]
fn test_geofence_tag_accepts_valid_names() {
    assert!(GeofenceTag::new("store-front").is_ok());
    assert!(GeofenceTag::new("region_7").is_ok());
    assert!(GeofenceTag::new("a").is_ok());
}

#[test]
fn test_geofence_tag_rejects_invalid_names() {
    assert!(GeofenceTag::new("").is_err());
    assert!(GeofenceTag::new("-leading").is_err());
    assert!(GeofenceTag::new("trailing-").is_err());
    assert!(GeofenceTag::new("has space").is_err());
    assert!(GeofenceTag::new("x".repeat(65)).is_err());
}

#[test]
fn test_geofence_tag_from_str_round_trip() {
    let tag: GeofenceTag = "store-front".parse().unwrap();
    assert_eq!(tag.as_str(), "store-front");
    assert_eq!(tag.to_string(), "store-front");
}

// ============================================================================
// Test: GeofenceId
// ============================================================================

#[test]
fn test_geofence_id_display_parses_back() {
    let id = GeofenceId::new();
    let parsed: GeofenceId = id.to_string().parse().unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn test_geofence_id_rejects_garbage() {
    let result = "not-a-ulid!".parse::<GeofenceId>();
    assert!(matches!(result, Err(ParseError::InvalidFormat { .. })));
}

// ============================================================================
// Test: Timestamp
// ============================================================================

#[test]
fn test_timestamp_rfc3339_round_trip() {
    let ts = Timestamp::from_rfc3339("2025-06-01T12:30:00Z").unwrap();
    let round_tripped = Timestamp::from_rfc3339(&ts.to_rfc3339()).unwrap();
    assert_eq!(ts, round_tripped);
}

#[test]
fn test_timestamp_rejects_invalid_format() {
    assert!(Timestamp::from_rfc3339("June 1st 2025").is_err());
}

#[test]
fn test_timestamp_ordering() {
    let earlier = Timestamp::from_rfc3339("2025-06-01T00:00:00Z").unwrap();
    let later = earlier.add_seconds(30);
    assert!(later > earlier);
    assert_eq!(later.duration_since(earlier), Duration::from_secs(30));
}

#[test]
fn test_timestamp_recency_window() {
    let fresh = Timestamp::now();
    assert!(fresh.is_within(Duration::from_secs(60)));

    let stale = Timestamp::from_rfc3339("2020-01-01T00:00:00Z").unwrap();
    assert!(!stale.is_within(Duration::from_secs(60)));
}

// ============================================================================
// Test: Environment
// ============================================================================

#[test]
fn test_environment_parsing_accepts_aliases() {
    assert_eq!(
        "dev".parse::<Environment>().unwrap(),
        Environment::Development
    );
    assert_eq!(
        "production".parse::<Environment>().unwrap(),
        Environment::Production
    );
    assert!("quality".parse::<Environment>().is_err());
}

// ============================================================================
// Test: Error Classification
// ============================================================================

#[test]
fn test_error_transience_classification() {
    let transient = WaypostError::ExternalService {
        service: "provider".to_string(),
        message: "timeout".to_string(),
    };
    assert!(transient.is_transient());
    assert_eq!(transient.error_category(), ErrorCategory::Transient);

    let permanent = WaypostError::Validation(ValidationError::Required {
        field: "event_id".to_string(),
    });
    assert!(!permanent.is_transient());
    assert_eq!(permanent.error_category(), ErrorCategory::Permanent);

    let config = WaypostError::Configuration {
        message: "missing secret".to_string(),
    };
    assert_eq!(config.error_category(), ErrorCategory::Configuration);
}
