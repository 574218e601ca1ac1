//! Synapse Admin API
//!
//! The room-deletion collaborator. [`RoomAdminApi`] is the seam the purge pipeline
//! talks through; [`SynapseAdminClient`] implements it over HTTP against the
//! `/_synapse/admin` endpoints. The access token is sent as a bearer header and never
//! appears in logs or error messages.

use crate::error::AdminApiError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PURGE_MESSAGE: &str = "This room is being cleaned, stand by...";

/// Body of `DELETE /_synapse/admin/v2/rooms/{room_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteRoomRequest {
    pub block: bool,
    pub force_purge: bool,
    pub purge: bool,
    pub message: String,
}

impl DeleteRoomRequest {
    /// Always force-purges; `ban` decides whether the room is blocked from re-joins.
    pub fn purge(ban: bool, message: impl Into<String>) -> Self {
        Self {
            block: ban,
            force_purge: true,
            purge: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteRoomResponse {
    delete_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteStatusResponse {
    #[serde(default)]
    results: Vec<ShardStatus>,
}

/// One backend worker's report on a room deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardStatus {
    #[serde(default)]
    pub delete_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub shutdown_room: ShutdownRoom,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShutdownRoom {
    #[serde(default)]
    pub kicked_users: Vec<String>,
    #[serde(default)]
    pub failed_to_kick_users: Vec<String>,
    #[serde(default)]
    pub local_aliases: Vec<String>,
    #[serde(default)]
    pub new_room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomDetails {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    canonical_alias: Option<String>,
}

/// Room-deletion API used by the purge pipeline
#[async_trait]
pub trait RoomAdminApi: Send + Sync {
    /// Ask the server to delete a room. Returns the server's delete id.
    ///
    /// Calling this for a room that is already being deleted is expected to be safe.
    async fn delete_room(
        &self,
        room_id: &str,
        request: &DeleteRoomRequest,
    ) -> Result<String, AdminApiError>;

    /// All shard reports for the room's delete.
    async fn delete_status(&self, room_id: &str) -> Result<Vec<ShardStatus>, AdminApiError>;

    /// Human-readable label: canonical alias, else name, else `None`.
    async fn room_name(&self, room_id: &str) -> Result<Option<String>, AdminApiError>;
}

/// HTTP client for the Synapse admin API
pub struct SynapseAdminClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl SynapseAdminClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, AdminApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdminApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AdminApiError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdminApiError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// `{base}/_synapse/admin/{version}/rooms/{room_id}[/{suffix}]` with the room id
    /// percent-encoded as a single path segment.
    fn room_url(&self, version: &str, room_id: &str, suffix: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["_synapse", "admin", version, "rooms", room_id]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        url
    }

    async fn error_for_status(
        operation: &'static str,
        room_id: &str,
        response: Response,
    ) -> AdminApiError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "read error".to_string());
        AdminApiError::Status {
            operation,
            room_id: room_id.to_string(),
            status,
            body,
        }
    }
}

fn request_error(operation: &'static str, room_id: &str, err: reqwest::Error) -> AdminApiError {
    let message = if err.is_timeout() {
        format!("request timeout: {}", err.without_url())
    } else if err.is_connect() {
        format!("connection error: {}", err.without_url())
    } else {
        err.without_url().to_string()
    };
    AdminApiError::Request {
        operation,
        room_id: room_id.to_string(),
        message,
    }
}

fn decode_error(operation: &'static str, room_id: &str, err: reqwest::Error) -> AdminApiError {
    AdminApiError::Decode {
        operation,
        room_id: room_id.to_string(),
        message: err.without_url().to_string(),
    }
}

#[async_trait]
impl RoomAdminApi for SynapseAdminClient {
    async fn delete_room(
        &self,
        room_id: &str,
        request: &DeleteRoomRequest,
    ) -> Result<String, AdminApiError> {
        const OP: &str = "delete room";
        let url = self.room_url("v2", room_id, None);
        debug!(room_id = %room_id, block = request.block, "submitting room delete");

        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(OP, room_id, e))?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(OP, room_id, response).await);
        }

        let body: DeleteRoomResponse = response
            .json()
            .await
            .map_err(|e| decode_error(OP, room_id, e))?;
        Ok(body.delete_id)
    }

    async fn delete_status(&self, room_id: &str) -> Result<Vec<ShardStatus>, AdminApiError> {
        const OP: &str = "delete status";
        let url = self.room_url("v2", room_id, Some("delete_status"));

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| request_error(OP, room_id, e))?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(OP, room_id, response).await);
        }

        let body: DeleteStatusResponse = response
            .json()
            .await
            .map_err(|e| decode_error(OP, room_id, e))?;
        Ok(body.results)
    }

    async fn room_name(&self, room_id: &str) -> Result<Option<String>, AdminApiError> {
        const OP: &str = "room details";
        let url = self.room_url("v1", room_id, None);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| request_error(OP, room_id, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if response.status() != StatusCode::OK {
            return Err(Self::error_for_status(OP, room_id, response).await);
        }

        let details: RoomDetails = response
            .json()
            .await
            .map_err(|e| decode_error(OP, room_id, e))?;
        let label = details
            .canonical_alias
            .filter(|alias| !alias.is_empty())
            .or(details.name.filter(|name| !name.is_empty()));
        Ok(label)
    }
}
