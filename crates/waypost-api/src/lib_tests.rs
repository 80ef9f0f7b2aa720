//! Tests for service configuration and webhook error responses.

use super::*;

fn config_with_secret() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.secret = Some("test_webhook_secret".to_string());
    config
}

// ============================================================================
// Test: Configuration Validation
// ============================================================================

#[test]
fn test_default_config_without_secret_is_rejected() {
    // Refusing to start unauthenticated is the safe failure mode
    let config = ServiceConfig::default();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_with_secret_validates() {
    assert!(config_with_secret().validate().is_ok());
}

#[test]
fn test_explicit_bypass_allows_missing_secret() {
    let mut config = ServiceConfig::default();
    config.webhook.allow_unverified = true;
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_workers_is_rejected() {
    let mut config = config_with_secret();
    config.queue.workers = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_max_attempts_is_rejected() {
    let mut config = config_with_secret();
    config.queue.max_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_port_is_rejected() {
    let mut config = config_with_secret();
    config.server.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_defaults_match_delivery_contract() {
    let config = ServiceConfig::default();

    assert_eq!(config.queue.lane, "geofence");
    assert_eq!(config.queue.max_attempts, 3);
    assert_eq!(config.queue.backoff_seconds, 30);
    assert_eq!(config.webhook.endpoint_path, "/webhook");
    assert!(!config.webhook.allow_unverified);
}

#[test]
fn test_config_deserializes_from_partial_yaml() {
    // Absent sections fall back to serde defaults
    let yaml = r#"
webhook:
  secret: "s3cret"
server:
  port: 9090
"#;
    let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
    assert_eq!(config.queue.workers, 4);
}

// ============================================================================
// Test: Error Response Mapping
// ============================================================================

#[test]
fn test_unauthorized_maps_to_401() {
    let response =
        WebhookHandlerError::Unauthorized(WebhookError::InvalidSignature).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_missing_signature_maps_to_401() {
    let response =
        WebhookHandlerError::Unauthorized(WebhookError::MissingSignature).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_malformed_json_maps_to_400() {
    let parse_error = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
    let response = WebhookHandlerError::MalformedJson(parse_error).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_invalid_headers_map_to_400() {
    let response = WebhookHandlerError::InvalidHeaders(ValidationError::InvalidFormat {
        field: "content_type".to_string(),
        message: "must be application/json".to_string(),
    })
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_queue_unavailable_maps_to_503() {
    let response =
        WebhookHandlerError::QueueUnavailable(QueueError::ShuttingDown).into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
