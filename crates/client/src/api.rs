//! Control-plane endpoints: thin request/response calls that authenticate
//! the operator or flip server-side monitoring state. They carry no
//! streaming logic; their results feed the session controller's driver
//! inputs.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ClientError;
use crate::gateway::Gateway;

pub const LOGIN_PATH: &str = "/login";
pub const VIDEO_FEED_PATH: &str = "/video_feed";
pub const CHECK_ALERTS_PATH: &str = "/check_alerts";
pub const START_MONITORING_PATH: &str = "/start_monitoring";
pub const STOP_MONITORING_PATH: &str = "/stop_monitoring";
pub const PAUSE_MONITORING_PATH: &str = "/pause_monitoring";
pub const RESUME_MONITORING_PATH: &str = "/resume_monitoring";
pub const SET_THRESHOLD_PATH: &str = "/set_threshold";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiFailure {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiFailure {
    fn message(self, fallback: &str) -> String {
        self.msg.or(self.error).unwrap_or_else(|| fallback.to_string())
    }
}

/// Status line returned by the monitoring control endpoints.
#[derive(Debug, Deserialize)]
pub struct StatusMessage {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdResponse {
    pub status: String,
    pub new_threshold: u8,
}

/// Typed wrappers over the control endpoints.
#[derive(Clone)]
pub struct ControlApi {
    gateway: Gateway,
}

impl ControlApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Authenticate and install the issued bearer token into the session
    /// context and the durable store.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let body = json!({ "username": username, "password": password });
        let response = self.gateway.post_json_public(LOGIN_PATH, &body).await?;

        if !response.status().is_success() {
            let failure = response
                .json::<ApiFailure>()
                .await
                .unwrap_or_default()
                .message("login failed");
            return Err(ClientError::api(failure));
        }

        let login = response.json::<LoginResponse>().await?;
        self.gateway.install_credential(&login.access_token).await?;
        info!("login succeeded, session token installed");
        Ok(())
    }

    /// Drop the session locally. The appliance keeps no server-side session
    /// state beyond token validity.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.gateway.discard_credential().await
    }

    pub async fn start_monitoring(&self) -> Result<StatusMessage, ClientError> {
        self.gateway.get_json(START_MONITORING_PATH).await
    }

    pub async fn stop_monitoring(&self) -> Result<StatusMessage, ClientError> {
        self.gateway.get_json(STOP_MONITORING_PATH).await
    }

    pub async fn pause_monitoring(&self) -> Result<StatusMessage, ClientError> {
        self.gateway.get_json(PAUSE_MONITORING_PATH).await
    }

    pub async fn resume_monitoring(&self) -> Result<StatusMessage, ClientError> {
        self.gateway.get_json(RESUME_MONITORING_PATH).await
    }

    /// Tune the server-side detection threshold (percent).
    pub async fn set_threshold(&self, threshold: u8) -> Result<ThresholdResponse, ClientError> {
        if threshold > 100 {
            return Err(ClientError::configuration(format!(
                "threshold must be within 0..=100, got {threshold}"
            )));
        }
        let body = json!({ "threshold": threshold });
        let response = self.gateway.post_json(SET_THRESHOLD_PATH, &body).await?;
        response.json().await.map_err(ClientError::from)
    }
}
