//! HTTP-backed collaborator implementations for the service binary.
//!
//! The processor consumes collaborators through narrow traits; these
//! implementations bind them to the internal entity directory and the
//! notification delivery service over REST.
//!
//! Error mapping is what the retry machinery keys on: timeouts and
//! transport failures surface as [`CollaboratorError`] (transient, queue
//! retries), while a 404 lookup is a plain `None` (data error, never
//! retried).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use waypost_core::webhook::CanonicalEvent;
use waypost_core::{
    CollaboratorError, EntityDirectory, ExternalGeofenceId, GeofenceHandle, GeofenceId,
    NotificationSender, ProviderUserId, UserHandle,
};

/// Error constructing a collaborator client
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorConfigError {
    #[error("Invalid collaborator base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Could not build HTTP client: {message}")]
    ClientBuild { message: String },
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, CollaboratorConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CollaboratorConfigError::ClientBuild {
            message: e.to_string(),
        })
}

fn parse_base_url(base_url: &str) -> Result<Url, CollaboratorConfigError> {
    Url::parse(base_url).map_err(|e| CollaboratorConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        message: e.to_string(),
    })
}

fn transport_error(error: reqwest::Error) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::Timeout {
            message: error.to_string(),
        }
    } else {
        CollaboratorError::Unavailable {
            message: error.to_string(),
        }
    }
}

// ============================================================================
// RestEntityDirectory
// ============================================================================

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeofenceDto {
    id: String,
    name: String,
}

/// [`EntityDirectory`] over the internal entity directory service
pub struct RestEntityDirectory {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl RestEntityDirectory {
    /// Create a directory client for the given base URL.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorConfigError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_base_url(base_url)?,
            token,
        })
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollaboratorError> {
        self.base_url
            .join(path)
            .map_err(|e| CollaboratorError::Unavailable {
                message: format!("invalid endpoint '{}': {}", path, e),
            })
    }
}

#[async_trait]
impl EntityDirectory for RestEntityDirectory {
    async fn find_user(
        &self,
        user_id: &ProviderUserId,
    ) -> Result<Option<UserHandle>, CollaboratorError> {
        let url = self.endpoint(&format!("v1/users/by-provider-id/{}", user_id))?;
        let response = self.get(url).send().await.map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable {
                message: format!("directory returned {}", response.status()),
            });
        }

        let dto: UserDto = response.json().await.map_err(transport_error)?;
        Ok(Some(UserHandle {
            id: dto.id,
            display_name: dto.display_name,
        }))
    }

    async fn find_geofence(
        &self,
        external_id: &ExternalGeofenceId,
    ) -> Result<Option<GeofenceHandle>, CollaboratorError> {
        let url = self.endpoint(&format!("v1/geofences/by-external-id/{}", external_id))?;
        let response = self.get(url).send().await.map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable {
                message: format!("directory returned {}", response.status()),
            });
        }

        let dto: GeofenceDto = response.json().await.map_err(transport_error)?;
        let id = dto
            .id
            .parse::<GeofenceId>()
            .map_err(|e| CollaboratorError::Unavailable {
                message: format!("directory returned an unusable geofence id: {}", e),
            })?;

        Ok(Some(GeofenceHandle { id, name: dto.name }))
    }
}

// ============================================================================
// RestNotificationSender
// ============================================================================

#[derive(Debug, Serialize)]
struct NotificationRequest<'a> {
    user_id: &'a str,
    event_id: &'a str,
    kind: &'a str,
    geofence_name: &'a str,
    occurred_at: String,
}

/// [`NotificationSender`] over the notification delivery service
pub struct RestNotificationSender {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl RestNotificationSender {
    /// Create a sender client for the given base URL.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorConfigError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_base_url(base_url)?,
            token,
        })
    }
}

#[async_trait]
impl NotificationSender for RestNotificationSender {
    async fn deliver(
        &self,
        user: &UserHandle,
        geofence: &GeofenceHandle,
        event: &CanonicalEvent,
    ) -> Result<(), CollaboratorError> {
        let url = self
            .base_url
            .join("v1/notifications")
            .map_err(|e| CollaboratorError::Unavailable {
                message: format!("invalid endpoint: {}", e),
            })?;

        let body = NotificationRequest {
            user_id: &user.id,
            event_id: event.event_id.as_str(),
            kind: event.kind.as_str(),
            geofence_name: &geofence.name,
            occurred_at: event.occurred_at.to_rfc3339(),
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable {
                message: format!("notifier returned {}", response.status()),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "collaborators_tests.rs"]
mod tests;
