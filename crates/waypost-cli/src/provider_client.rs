//! HTTP client for the provider's geofence API.
//!
//! Implements [`GeofenceProviderClient`] over the provider's REST surface:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /v1/geofences` |
//! | create    | `POST /v1/geofences` |
//! | update    | `PUT /v1/geofences/{external_id}` |
//!
//! Every request carries a bounded timeout; a timed-out call surfaces as
//! [`ProviderApiError::Timeout`] and the reconciler records it as one
//! failed definition rather than aborting the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use waypost_core::{
    ExternalGeofenceId, GeofenceDefinition, GeofenceGeometry, GeofenceProviderClient,
    ProviderApiError, RemoteGeofence,
};

// ============================================================================
// Wire Types
// ============================================================================

/// Request body for create and update operations
#[derive(Debug, Serialize)]
struct GeofencePayload<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    tag: &'a str,
    enabled: bool,
    geometry: &'a GeofenceGeometry,
}

impl<'a> GeofencePayload<'a> {
    fn from_definition(definition: &'a GeofenceDefinition) -> Self {
        Self {
            name: &definition.name,
            description: definition.description.as_deref(),
            tag: definition.tag.as_str(),
            enabled: definition.enabled,
            geometry: &definition.geometry,
        }
    }
}

/// Provider representation of one geofence
#[derive(Debug, Deserialize)]
struct RemoteGeofenceDto {
    id: String,
    name: String,
}

impl RemoteGeofenceDto {
    fn into_remote(self) -> Result<RemoteGeofence, ProviderApiError> {
        let external_id =
            ExternalGeofenceId::new(self.id).map_err(|e| ProviderApiError::Rejected {
                message: format!("provider returned an unusable geofence id: {}", e),
            })?;
        Ok(RemoteGeofence {
            external_id,
            name: self.name,
        })
    }
}

// ============================================================================
// RestProviderClient
// ============================================================================

/// Error constructing a [`RestProviderClient`]
#[derive(Debug, thiserror::Error)]
pub enum ProviderClientConfigError {
    #[error("Invalid provider base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Could not build HTTP client: {message}")]
    ClientBuild { message: String },
}

/// [`GeofenceProviderClient`] over the provider's REST API
pub struct RestProviderClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RestProviderClient {
    /// Create a client for the given base URL and API key.
    ///
    /// `timeout` bounds every request end to end.
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderClientConfigError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ProviderClientConfigError::InvalidBaseUrl {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderClientConfigError::ClientBuild {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderApiError::Network {
                message: format!("invalid endpoint '{}': {}", path, e),
            })
    }

    /// Map a reqwest transport error to the provider error taxonomy
    fn transport_error(error: reqwest::Error) -> ProviderApiError {
        if error.is_timeout() {
            ProviderApiError::Timeout { seconds: 0 }
        } else {
            ProviderApiError::Network {
                message: error.to_string(),
            }
        }
    }

    /// Turn a non-success response into a typed rejection
    async fn rejection(response: reqwest::Response) -> ProviderApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body.chars().take(200).collect::<String>())
        };

        if status.is_client_error() {
            ProviderApiError::Rejected { message: detail }
        } else {
            ProviderApiError::Network { message: detail }
        }
    }
}

impl std::fmt::Debug for RestProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestProviderClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl GeofenceProviderClient for RestProviderClient {
    async fn list_remote(&self) -> Result<Vec<RemoteGeofence>, ProviderApiError> {
        let response = self
            .client
            .get(self.endpoint("v1/geofences")?)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let dtos: Vec<RemoteGeofenceDto> =
            response.json().await.map_err(Self::transport_error)?;

        dtos.into_iter().map(RemoteGeofenceDto::into_remote).collect()
    }

    async fn create_remote(
        &self,
        definition: &GeofenceDefinition,
    ) -> Result<ExternalGeofenceId, ProviderApiError> {
        let response = self
            .client
            .post(self.endpoint("v1/geofences")?)
            .header("Authorization", &self.api_key)
            .json(&GeofencePayload::from_definition(definition))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let dto: RemoteGeofenceDto = response.json().await.map_err(Self::transport_error)?;
        Ok(dto.into_remote()?.external_id)
    }

    async fn update_remote(
        &self,
        external_id: &ExternalGeofenceId,
        definition: &GeofenceDefinition,
    ) -> Result<(), ProviderApiError> {
        let response = self
            .client
            .put(self.endpoint(&format!("v1/geofences/{}", external_id))?)
            .header("Authorization", &self.api_key)
            .json(&GeofencePayload::from_definition(definition))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "provider_client_tests.rs"]
mod tests;
