//! Tests for the HTTP-backed collaborator clients.

use super::*;
use waypost_core::webhook::GeofenceEventKind;
use waypost_core::{EventId, Timestamp};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_id(value: &str) -> ProviderUserId {
    ProviderUserId::new(value.to_string()).unwrap()
}

fn geofence_id(value: &str) -> ExternalGeofenceId {
    ExternalGeofenceId::new(value.to_string()).unwrap()
}

async fn directory_for(server: &MockServer) -> RestEntityDirectory {
    RestEntityDirectory::new(&server.uri(), None, Duration::from_secs(2)).unwrap()
}

// ============================================================================
// Test: Entity Directory
// ============================================================================

#[tokio::test]
async fn test_find_user_parses_handle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/by-provider-id/u_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "internal-77",
            "display_name": "Jamie",
        })))
        .mount(&server)
        .await;

    let user = directory_for(&server)
        .await
        .find_user(&user_id("u_1"))
        .await
        .unwrap();

    let user = user.unwrap();
    assert_eq!(user.id, "internal-77");
    assert_eq!(user.display_name.as_deref(), Some("Jamie"));
}

#[tokio::test]
async fn test_find_user_404_is_a_miss_not_an_error() {
    // An unknown mapping is a data outcome; retrying cannot fix it
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/by-provider-id/u_missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let user = directory_for(&server)
        .await
        .find_user(&user_id("u_missing"))
        .await
        .unwrap();

    assert!(user.is_none());
}

#[tokio::test]
async fn test_directory_5xx_is_a_transient_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/by-provider-id/u_1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = directory_for(&server)
        .await
        .find_user(&user_id("u_1"))
        .await
        .unwrap_err();

    assert!(matches!(error, CollaboratorError::Unavailable { .. }));
}

#[tokio::test]
async fn test_find_geofence_parses_handle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/geofences/by-external-id/store-17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "01J00000000000000000000000",
            "name": "Store 17",
        })))
        .mount(&server)
        .await;

    let geofence = directory_for(&server)
        .await
        .find_geofence(&geofence_id("store-17"))
        .await
        .unwrap();

    assert_eq!(geofence.unwrap().name, "Store 17");
}

#[tokio::test]
async fn test_stalled_directory_surfaces_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/by-provider-id/u_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(30))
                .set_body_json(serde_json::json!({"id": "internal-77"})),
        )
        .mount(&server)
        .await;

    let directory =
        RestEntityDirectory::new(&server.uri(), None, Duration::from_millis(100)).unwrap();
    let error = directory.find_user(&user_id("u_1")).await.unwrap_err();

    assert!(matches!(error, CollaboratorError::Timeout { .. }));
}

// ============================================================================
// Test: Notification Sender
// ============================================================================

#[tokio::test]
async fn test_deliver_posts_notification_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/notifications"))
        .and(body_partial_json(serde_json::json!({
            "user_id": "internal-77",
            "event_id": "evt_1",
            "kind": "enter",
            "geofence_name": "Store 17",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let sender =
        RestNotificationSender::new(&server.uri(), None, Duration::from_secs(2)).unwrap();

    let user = UserHandle {
        id: "internal-77".to_string(),
        display_name: None,
    };
    let geofence = GeofenceHandle {
        id: GeofenceId::new(),
        name: "Store 17".to_string(),
    };
    let event = CanonicalEvent {
        event_id: EventId::new("evt_1".to_string()).unwrap(),
        kind: GeofenceEventKind::Enter,
        user_id: ProviderUserId::new("u_1".to_string()).unwrap(),
        geofence_external_id: geofence_id("store-17"),
        occurred_at: Timestamp::now(),
        attributes: Default::default(),
    };

    let result = sender.deliver(&user, &geofence, &event).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_notifier_failure_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/notifications"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sender =
        RestNotificationSender::new(&server.uri(), None, Duration::from_secs(2)).unwrap();

    let user = UserHandle {
        id: "internal-77".to_string(),
        display_name: None,
    };
    let geofence = GeofenceHandle {
        id: GeofenceId::new(),
        name: "Store 17".to_string(),
    };
    let event = CanonicalEvent {
        event_id: EventId::new("evt_1".to_string()).unwrap(),
        kind: GeofenceEventKind::Enter,
        user_id: ProviderUserId::new("u_1".to_string()).unwrap(),
        geofence_external_id: geofence_id("store-17"),
        occurred_at: Timestamp::now(),
        attributes: Default::default(),
    };

    let error = sender.deliver(&user, &geofence, &event).await.unwrap_err();
    assert!(matches!(error, CollaboratorError::Unavailable { .. }));
}

// ============================================================================
// Test: Construction
// ============================================================================

#[test]
fn test_invalid_base_urls_are_rejected() {
    assert!(matches!(
        RestEntityDirectory::new("not a url", None, Duration::from_secs(1)),
        Err(CollaboratorConfigError::InvalidBaseUrl { .. })
    ));
    assert!(matches!(
        RestNotificationSender::new("not a url", None, Duration::from_secs(1)),
        Err(CollaboratorConfigError::InvalidBaseUrl { .. })
    ));
}
