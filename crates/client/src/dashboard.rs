//! Top-level dashboard session.
//!
//! Owns the session context, the gateway, the feed controller and the alert
//! poller, and re-reconciles both whenever a driver input changes: the
//! monitoring state after a control call, the credential after login/logout
//! or a detected expiry, and the feed-visible flag.

use std::sync::Arc;

use mixed_replace::Frame;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::alerts::{AlertLog, AlertPoller};
use crate::api::ControlApi;
use crate::config::ClientConfig;
use crate::credential::{Credential, SessionContext};
use crate::error::ClientError;
use crate::feed::{FeedController, FeedDriver, FeedPhase, MonitoringState};
use crate::gateway::Gateway;
use crate::store::TokenStore;

/// Renderer-side handles produced when a dashboard is opened.
pub struct DashboardChannels {
    /// Live feed frames, in arrival order.
    pub frames: mpsc::Receiver<Frame>,
    /// Feed controller phase (idle / active / persistent error).
    pub feed_phase: watch::Receiver<FeedPhase>,
    /// Fires `true` when the session expires and login is required again.
    pub session_expired: watch::Receiver<bool>,
}

pub struct Dashboard {
    session: SessionContext,
    control: ControlApi,
    feed: FeedController,
    poller: AlertPoller,
    state: MonitoringState,
    feed_visible: bool,
}

impl Dashboard {
    /// Open a dashboard session. A token persisted from a previous run is
    /// picked up; its absence means the operator must log in first.
    pub async fn open(
        config: &ClientConfig,
        store: Arc<dyn TokenStore>,
        frame_buffer: usize,
    ) -> Result<(Self, DashboardChannels), ClientError> {
        let session = SessionContext::new();

        if let Some(token) = store.load().await? {
            debug!("restored persisted session token");
            session.install(Credential::new(token));
        }

        let gateway = Gateway::new(config, session.clone(), store)?;
        let control = ControlApi::new(gateway.clone());

        let (frames_tx, frames_rx) = mpsc::channel(frame_buffer.max(1));
        let (feed, feed_phase) = FeedController::new(gateway.clone(), frames_tx);
        let poller = AlertPoller::new(gateway, config.poll_interval, config.alert_capacity);

        let channels = DashboardChannels {
            frames: frames_rx,
            feed_phase,
            session_expired: session.subscribe_expiry(),
        };

        Ok((
            Self {
                session,
                control,
                feed,
                poller,
                state: MonitoringState::Stopped,
                feed_visible: false,
            },
            channels,
        ))
    }

    pub fn monitoring_state(&self) -> MonitoringState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn alerts(&self) -> Arc<RwLock<AlertLog>> {
        self.poller.log()
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        self.control.login(username, password).await?;
        self.reconcile().await;
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.state = MonitoringState::Stopped;
        self.reconcile().await;
        self.control.logout().await
    }

    pub async fn start_monitoring(&mut self) -> Result<(), ClientError> {
        self.transition(MonitoringState::Starting).await;
        match self.control.start_monitoring().await {
            Ok(status) => {
                info!(status = %status.status, "monitoring started");
                self.transition(MonitoringState::Monitoring).await;
                Ok(())
            }
            Err(err) => {
                self.transition(MonitoringState::Error).await;
                Err(err)
            }
        }
    }

    pub async fn stop_monitoring(&mut self) -> Result<(), ClientError> {
        match self.control.stop_monitoring().await {
            Ok(status) => {
                info!(status = %status.status, "monitoring stopped");
                self.transition(MonitoringState::Stopped).await;
                Ok(())
            }
            Err(err) => {
                self.transition(MonitoringState::Error).await;
                Err(err)
            }
        }
    }

    pub async fn pause_monitoring(&mut self) -> Result<(), ClientError> {
        let status = self.control.pause_monitoring().await?;
        info!(status = %status.status, "monitoring paused");
        self.transition(MonitoringState::Paused).await;
        Ok(())
    }

    pub async fn resume_monitoring(&mut self) -> Result<(), ClientError> {
        let status = self.control.resume_monitoring().await?;
        info!(status = %status.status, "monitoring resumed");
        self.transition(MonitoringState::Monitoring).await;
        Ok(())
    }

    pub async fn set_threshold(&mut self, threshold: u8) -> Result<u8, ClientError> {
        let response = self.control.set_threshold(threshold).await?;
        info!(threshold = response.new_threshold, "detection threshold updated");
        Ok(response.new_threshold)
    }

    /// Show or hide the live feed without touching monitoring itself.
    pub async fn set_feed_visible(&mut self, visible: bool) {
        if self.feed_visible != visible {
            self.feed_visible = visible;
            self.reconcile().await;
        }
    }

    /// Adopt a monitoring state change and reconcile stream and poller.
    pub async fn transition(&mut self, state: MonitoringState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "monitoring state changed");
            self.state = state;
        }
        self.reconcile().await;
    }

    /// The single reconciliation point: diff desired against actual for
    /// both the feed and the poll timer.
    pub async fn reconcile(&mut self) {
        let credential_present = self.session.is_authenticated();

        let driver = FeedDriver {
            state: self.state,
            credential_present,
            feed_visible: self.feed_visible,
        };
        self.feed.reconcile(driver).await;

        if self.state == MonitoringState::Monitoring && credential_present {
            self.poller.start();
        } else {
            self.poller.stop().await;
        }
    }

    /// Release everything: cancel the feed, stop the poll timer. Safe to
    /// call more than once.
    pub async fn shutdown(&mut self) {
        self.feed.shutdown().await;
        self.poller.stop().await;
        if self.session.is_expired() {
            warn!("session expired during shutdown; login required on next start");
        }
    }
}
