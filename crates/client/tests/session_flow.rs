//! End-to-end session tests against a scripted local HTTP server.
//!
//! The fixture accepts one connection per scripted response, records the
//! request head and closes the socket, so every client call arrives on a
//! fresh connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use vigia_client::api::START_MONITORING_PATH;
use vigia_client::{
    ClientConfig, ControlApi, Credential, FeedController, FeedDriver, FeedPhase, Gateway,
    MemoryTokenStore, MonitoringState, SessionContext, StatusMessage, TokenStore,
};

fn http_json(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

async fn read_request_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length: "))
                .or_else(|| {
                    head.lines()
                        .find_map(|line| line.strip_prefix("Content-Length: "))
                })
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let mut remaining = body_len.saturating_sub(buf.len() - (end + 4));
            while remaining > 0 {
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                remaining = remaining.saturating_sub(n);
            }
            return Some(head);
        }
    }
}

/// Serve each scripted response to one connection, in order, then stop.
async fn spawn_scripted_server(
    responses: Vec<String>,
) -> (SocketAddr, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_srv = Arc::clone(&seen);

    let handle = tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            if let Some(head) = read_request_head(&mut stream).await {
                seen_srv.lock().unwrap().push(head);
            }
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (addr, seen, handle)
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    let base = ClientConfig::parse_base_url(&format!("http://{addr}/")).unwrap();
    let mut config = ClientConfig::new(base);
    config.request_timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn http_401_expires_session_and_clears_persisted_token() {
    let responses = vec![
        http_json("401 UNAUTHORIZED", r#"{"msg":"Token has expired"}"#),
        http_json("200 OK", r#"{"status":"Monitoring started"}"#),
    ];
    let (addr, seen, server) = spawn_scripted_server(responses).await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    store.save("stale-token").await.unwrap();
    let session = SessionContext::with_credential(Credential::new("stale-token"));
    let gateway = Gateway::new(&config_for(addr), session.clone(), Arc::clone(&store)).unwrap();

    let err = gateway
        .get_json::<StatusMessage>(START_MONITORING_PATH)
        .await
        .unwrap_err();
    assert!(err.is_auth_expired());

    // Detection cleared both the in-memory credential and the durable copy.
    assert!(session.is_expired());
    assert!(!session.is_authenticated());
    assert_eq!(store.load().await.unwrap(), None);

    // The next call goes out without any Authorization header.
    let status = gateway
        .get_json::<StatusMessage>(START_MONITORING_PATH)
        .await
        .unwrap();
    assert_eq!(status.status, "Monitoring started");

    server.await.unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].to_ascii_lowercase().contains("authorization: bearer stale-token"));
    assert!(!seen[1].to_ascii_lowercase().contains("authorization"));
}

#[tokio::test]
async fn login_installs_and_persists_issued_token() {
    let responses = vec![http_json("200 OK", r#"{"access_token":"tok-abc"}"#)];
    let (addr, seen, server) = spawn_scripted_server(responses).await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let session = SessionContext::new();
    let gateway = Gateway::new(&config_for(addr), session.clone(), Arc::clone(&store)).unwrap();
    let api = ControlApi::new(gateway);

    api.login("admin", "secret").await.unwrap();

    assert!(session.is_authenticated());
    assert_eq!(session.credential().unwrap().token(), "tok-abc");
    assert_eq!(store.load().await.unwrap().as_deref(), Some("tok-abc"));

    server.await.unwrap();
    // Login itself is unauthenticated.
    assert!(!seen.lock().unwrap()[0].to_ascii_lowercase().contains("authorization"));
}

#[tokio::test]
async fn rejected_login_reports_server_message_without_expiring() {
    let responses = vec![http_json(
        "401 UNAUTHORIZED",
        r#"{"msg":"Bad username or password"}"#,
    )];
    let (addr, _seen, server) = spawn_scripted_server(responses).await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let session = SessionContext::new();
    let gateway = Gateway::new(&config_for(addr), session.clone(), store).unwrap();
    let api = ControlApi::new(gateway);

    let err = api.login("admin", "wrong").await.unwrap_err();
    assert!(err.to_string().contains("Bad username or password"));
    // A failed login is not an expired session.
    assert!(!session.is_expired());

    server.await.unwrap();
}

#[tokio::test]
async fn feed_stop_cancels_an_open_stream_promptly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let release = Arc::new(Notify::new());
    let release_srv = Arc::clone(&release);

    // One multipart frame, then the connection is held open until released.
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_head(&mut stream).await.unwrap();
        let head = "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n";
        let part = "\r\n--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEGDATA\r\n--frame\r\n";
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(part.as_bytes()).await.unwrap();
        release_srv.notified().await;
    });

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let session = SessionContext::with_credential(Credential::new("tok"));
    let gateway = Gateway::new(&config_for(addr), session, store).unwrap();

    let (frames_tx, mut frames_rx) = mpsc::channel(8);
    let (mut controller, mut phase) = FeedController::new(gateway, frames_tx);

    controller
        .reconcile(FeedDriver {
            state: MonitoringState::Monitoring,
            credential_present: true,
            feed_visible: true,
        })
        .await;
    assert!(controller.is_active());

    let frame = tokio::time::timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("frame within deadline")
        .expect("one decoded frame");
    assert_eq!(frame.payload.as_ref(), b"JPEGDATA");
    assert_eq!(*phase.borrow_and_update(), FeedPhase::Active);

    // Stop must not wait for the server to close its end.
    tokio::time::timeout(Duration::from_secs(2), controller.stop())
        .await
        .expect("stop completes promptly");
    assert!(!controller.is_active());
    assert_eq!(*phase.borrow_and_update(), FeedPhase::Idle);

    release.notify_one();
    server.await.unwrap();
}

#[tokio::test]
async fn open_feed_ends_when_the_session_expires() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let release = Arc::new(Notify::new());
    let release_srv = Arc::clone(&release);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_head(&mut stream).await.unwrap();
        let head = "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n";
        let part = "\r\n--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEGDATA\r\n--frame\r\n";
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(part.as_bytes()).await.unwrap();
        release_srv.notified().await;
    });

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let session = SessionContext::with_credential(Credential::new("tok"));
    let gateway = Gateway::new(&config_for(addr), session.clone(), store).unwrap();

    let (frames_tx, mut frames_rx) = mpsc::channel(8);
    let (mut controller, mut phase) = FeedController::new(gateway, frames_tx);
    controller
        .reconcile(FeedDriver {
            state: MonitoringState::Monitoring,
            credential_present: true,
            feed_visible: true,
        })
        .await;

    tokio::time::timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("frame within deadline")
        .expect("one decoded frame");
    assert_eq!(*phase.borrow_and_update(), FeedPhase::Active);

    // A 401 on any other request invalidates the session; the open stream
    // must not keep running on the dead credential.
    session.invalidate();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            phase.changed().await.unwrap();
            if *phase.borrow_and_update() == FeedPhase::Idle {
                break;
            }
        }
    })
    .await
    .expect("feed returns to idle after expiry");

    release.notify_one();
    controller.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn feed_visibility_toggle_drives_the_stream_lifecycle() {
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let session = SessionContext::with_credential(Credential::new("tok"));
    // Nothing listens here; the session is cancelled before connecting.
    let config = config_for("127.0.0.1:9".parse().unwrap());
    let gateway = Gateway::new(&config, session, store).unwrap();

    let (frames_tx, _frames_rx) = mpsc::channel(1);
    let (mut controller, _phase) = FeedController::new(gateway, frames_tx);

    let driver = |feed_visible| FeedDriver {
        state: MonitoringState::Monitoring,
        credential_present: true,
        feed_visible,
    };

    controller.reconcile(driver(false)).await;
    assert!(!controller.is_active());

    controller.reconcile(driver(true)).await;
    assert!(controller.is_active());

    controller.reconcile(driver(false)).await;
    assert!(!controller.is_active());
}
