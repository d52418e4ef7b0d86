//! Client engine for a remote motion-detection appliance.
//!
//! The crate is organized around one [`Dashboard`] session that owns:
//!
//! - a [`SessionContext`] holding the bearer credential and expiry flag,
//! - a [`Gateway`] that attaches the credential to every request and treats
//!   HTTP 401 as the sole session-expiry signal,
//! - a [`FeedController`] binding the multipart video stream to the
//!   monitoring/credential/visibility driver state,
//! - an [`AlertPoller`] that folds `/check_alerts` batches into a capped,
//!   newest-first [`AlertLog`].
//!
//! Frame demultiplexing itself lives in the `mixed-replace` crate.

pub mod alerts;
pub mod api;
pub mod config;
pub mod credential;
pub mod dashboard;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod store;

pub use alerts::{AlertEvent, AlertLog, AlertPoller, AlertsResponse};
pub use api::{ControlApi, StatusMessage, ThresholdResponse};
pub use config::{ClientConfig, DEFAULT_ALERT_CAPACITY, DEFAULT_POLL_INTERVAL};
pub use credential::{Credential, SessionContext};
pub use dashboard::{Dashboard, DashboardChannels};
pub use error::ClientError;
pub use feed::{FeedController, FeedDriver, FeedPhase, MonitoringState};
pub use gateway::Gateway;
pub use store::{FileTokenStore, MemoryTokenStore, TOKEN_STORAGE_KEY, TokenStore};
