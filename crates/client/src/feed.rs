//! Streaming session controller.
//!
//! Owns the lifetime of the multipart video feed: it binds one stream
//! request to the external monitoring/credential/visibility driver state,
//! forwards demuxed frames to a renderer channel, and guarantees that the
//! in-flight read and the underlying response are released on every exit
//! path — normal completion, explicit stop, error, or teardown.

use futures::StreamExt;
use mixed_replace::{Frame, FrameDecoderStream, MultipartDemuxer, StreamError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::VIDEO_FEED_PATH;
use crate::error::ClientError;
use crate::gateway::Gateway;

/// External monitoring signal observed, not owned, by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringState {
    Stopped,
    Starting,
    Monitoring,
    Paused,
    Alert,
    Error,
}

impl MonitoringState {
    /// The feed keeps streaming while paused: pause suspends detection on
    /// the appliance, not the camera.
    pub fn wants_stream(self) -> bool {
        matches!(self, Self::Monitoring | Self::Paused)
    }
}

/// The driver inputs that decide whether a stream should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedDriver {
    pub state: MonitoringState,
    pub credential_present: bool,
    pub feed_visible: bool,
}

impl FeedDriver {
    pub fn wants_stream(&self) -> bool {
        self.state.wants_stream() && self.credential_present && self.feed_visible
    }
}

/// Observable controller phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    Active,
    /// Persistent inline error, shown until the operator restarts
    /// monitoring or the condition clears.
    Error(String),
}

struct ActiveFeed {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FeedController {
    gateway: Gateway,
    frames: mpsc::Sender<Frame>,
    phase_tx: watch::Sender<FeedPhase>,
    active: Option<ActiveFeed>,
}

impl FeedController {
    pub fn new(
        gateway: Gateway,
        frames: mpsc::Sender<Frame>,
    ) -> (Self, watch::Receiver<FeedPhase>) {
        let (phase_tx, phase_rx) = watch::channel(FeedPhase::Idle);
        (
            Self {
                gateway,
                frames,
                phase_tx,
                active: None,
            },
            phase_rx,
        )
    }

    pub fn phase(&self) -> FeedPhase {
        self.phase_tx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Diff desired against actual state and start or stop the stream
    /// accordingly. Invoked whenever any driver input changes.
    ///
    /// A session that ended on its own (server close, error) is not
    /// restarted here; only a fresh transition into a stream-wanting driver
    /// state starts a new one, after the previous session's cleanup has
    /// completed.
    pub async fn reconcile(&mut self, driver: FeedDriver) {
        let desired = driver.wants_stream();

        match (desired, self.active.is_some()) {
            (true, false) => self.start(),
            (false, true) => self.stop().await,
            _ => {}
        }
    }

    fn start(&mut self) {
        debug!("starting video feed session");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_feed(
            self.gateway.clone(),
            self.frames.clone(),
            self.phase_tx.clone(),
            cancel.clone(),
        ));
        self.active = Some(ActiveFeed { cancel, handle });
    }

    /// Cancel the in-flight read and release the response.
    ///
    /// Cleanup is a sequence of independent, individually-caught steps; a
    /// failure in one is logged and never blocks the others or a later
    /// state transition. A new session can only start after this returns.
    pub async fn stop(&mut self) {
        let Some(feed) = self.active.take() else {
            return;
        };

        feed.cancel.cancel();

        if let Err(err) = feed.handle.await {
            warn!(error = %err, "video feed task failed during teardown");
        }

        // An error phase set by the session stays visible; a clean stop
        // returns to idle.
        if *self.phase_tx.borrow() == FeedPhase::Active {
            let _ = self.phase_tx.send(FeedPhase::Idle);
        }
        debug!("video feed session stopped");
    }

    /// Component teardown: same guarantees as an explicit stop.
    pub async fn shutdown(&mut self) {
        self.stop().await;
    }
}

fn set_phase(phase_tx: &watch::Sender<FeedPhase>, phase: FeedPhase) {
    let _ = phase_tx.send(phase);
}

async fn run_feed(
    gateway: Gateway,
    frames: mpsc::Sender<Frame>,
    phase_tx: watch::Sender<FeedPhase>,
    cancel: CancellationToken,
) {
    let mut expiry = gateway.session().subscribe_expiry();

    // Opening the request is itself cancellable; a stop must never wait for
    // connection establishment.
    let response = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("video feed cancelled before the request completed");
            return;
        }
        response = gateway.get_stream(VIDEO_FEED_PATH) => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "video feed request failed");
            set_phase(&phase_tx, FeedPhase::Error(err.to_string()));
            return;
        }
    };

    // The boundary token comes from the declared content type; a missing or
    // wrong declaration fails the stream before any byte is read.
    let demuxer = match content_type_of(&response).and_then(|ct| {
        MultipartDemuxer::from_content_type(&ct).map_err(ClientError::from)
    }) {
        Ok(demuxer) => demuxer,
        Err(err) => {
            warn!(error = %err, "video feed content type rejected");
            set_phase(&phase_tx, FeedPhase::Error(err.to_string()));
            return;
        }
    };

    info!("video feed established");
    set_phase(&phase_tx, FeedPhase::Active);

    let transport = response
        .bytes_stream()
        .map(|item| item.map_err(|e| StreamError::transport(e.to_string())))
        .boxed();
    let mut stream = FrameDecoderStream::new(transport, demuxer);

    // Dropping `stream` on any path below closes the response and frees the
    // connection.
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("video feed cancelled");
                break;
            }
            // The feed must not outlive the credential it was opened with;
            // an expiry detected on any other request ends this session too.
            changed = expiry.changed() => {
                if changed.is_err() || *expiry.borrow_and_update() {
                    info!("session expired, ending video feed");
                    break;
                }
            }
            item = stream.next() => match item {
                Some(Ok(frame)) => {
                    if frame.is_empty() {
                        continue;
                    }
                    if frames.send(frame).await.is_err() {
                        debug!("frame renderer dropped, ending video feed");
                        break;
                    }
                }
                Some(Err(err)) => {
                    if err.is_malformed() {
                        warn!(error = %err, "video feed framing rejected");
                    } else {
                        warn!(error = %err, "video feed read failed");
                    }
                    set_phase(&phase_tx, FeedPhase::Error(err.to_string()));
                    return;
                }
                None => {
                    // No reconnect policy: a dropped connection ends the
                    // session and the operator must restart.
                    info!("video feed ended by the server");
                    set_phase(&phase_tx, FeedPhase::Error("video stream ended".to_string()));
                    return;
                }
            }
        }
    }

    set_phase(&phase_tx, FeedPhase::Idle);
}

fn content_type_of(response: &reqwest::Response) -> Result<String, ClientError> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::from(StreamError::InvalidContentType {
                content_type: "<missing>".to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_wants_stream_only_while_monitoring_or_paused() {
        let driver = |state, credential_present, feed_visible| FeedDriver {
            state,
            credential_present,
            feed_visible,
        };

        assert!(driver(MonitoringState::Monitoring, true, true).wants_stream());
        assert!(driver(MonitoringState::Paused, true, true).wants_stream());

        assert!(!driver(MonitoringState::Stopped, true, true).wants_stream());
        assert!(!driver(MonitoringState::Starting, true, true).wants_stream());
        assert!(!driver(MonitoringState::Error, true, true).wants_stream());
        assert!(!driver(MonitoringState::Monitoring, false, true).wants_stream());
        assert!(!driver(MonitoringState::Monitoring, true, false).wants_stream());
    }
}
