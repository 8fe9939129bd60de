use super::*;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::{accept_async, accept_hdr_async};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

struct FakeTv {
    port: u16,
    uris: mpsc::UnboundedReceiver<String>,
    frames: mpsc::UnboundedReceiver<String>,
}

/// A WebSocket endpoint that greets every connection with `first_frame`,
/// then either hangs up or records the text frames it receives.
async fn fake_tv(first_frame: impl Into<String>, hang_up: bool) -> FakeTv {
    let first_frame: String = first_frame.into();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (uri_tx, uris) = mpsc::unbounded_channel();
    let (frame_tx, frames) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let uri_tx = uri_tx.clone();
            let frame_tx = frame_tx.clone();
            let first_frame = first_frame.clone();
            tokio::spawn(async move {
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok(resp)
                };
                // Plain HTTP requests (the status probe) fail the upgrade here.
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                ws.send(Message::Text(first_frame.into())).await.unwrap();
                if hang_up {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = frame_tx.send(text.to_string());
                    }
                }
            });
        }
    });

    FakeTv { port, uris, frames }
}

/// Accepts the WebSocket but never sends the pairing frame.
async fn silent_tv() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    port
}

/// Server side of TLS with a self-signed certificate, like the TV's.
fn self_signed_acceptor() -> TlsAcceptor {
    let cert = CertificateDer::from(include_bytes!("testdata/tv_cert.der").to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        include_bytes!("testdata/tv_key.der").to_vec(),
    ));
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert], key)
    .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// A `wss` endpoint: one connection, greeted with `first_frame`, text frames recorded.
async fn fake_tls_tv(first_frame: &str) -> (u16, mpsc::UnboundedReceiver<String>) {
    let first_frame = first_frame.to_string();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = self_signed_acceptor();
    let (frame_tx, frames) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let tls = acceptor.accept(stream).await.unwrap();
        let mut ws = accept_async(tls).await.unwrap();
        ws.send(Message::Text(first_frame.into())).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = frame_tx.send(text.to_string());
            }
        }
    });

    (port, frames)
}

/// Answers one HTTP request with `status` and a small JSON body.
async fn fake_status_endpoint(status: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = stream.read(&mut buf).await;
        let body = r#"{"id":"tv"}"#;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    });
    port
}

fn identity(port: u16) -> RemoteIdentity {
    RemoteIdentity::new("Test Remote", "127.0.0.1", "00:11:22:33:44:55")
        .unwrap()
        .with_port(port)
        .with_status_port(port)
}

/// A remote that believes the TV is on, without probing it.
fn remote_for(identity: RemoteIdentity) -> (TvRemote, mpsc::Receiver<RemoteEvent>) {
    let (tx, rx) = mpsc::channel(8);
    let remote = TvRemote::new(identity, tx);
    remote.set_state(ConnectionState::OnDisconnected);
    (remote, rx)
}

fn query_token(uri: &str) -> Option<String> {
    let url = url::Url::parse(&format!("ws://localhost{}", uri)).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn probe_reports_on_for_success() {
    let port = fake_status_endpoint("200 OK").await;
    let (tx, _rx) = mpsc::channel(1);
    let remote = TvRemote::new(identity(port), tx);

    assert_eq!(remote.connection_state(), ConnectionState::Unknown);
    assert!(remote.is_on(Duration::ZERO).await);
    assert_eq!(remote.connection_state(), ConnectionState::OnDisconnected);
}

#[tokio::test]
async fn probe_reports_off_for_error_status() {
    let port = fake_status_endpoint("500 Internal Server Error").await;
    let (tx, _rx) = mpsc::channel(1);
    let remote = TvRemote::new(identity(port), tx);

    assert!(!remote.is_on(Duration::ZERO).await);
    assert_eq!(remote.connection_state(), ConnectionState::Off);
}

#[tokio::test]
async fn probe_reports_off_when_nothing_listens() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let (tx, _rx) = mpsc::channel(1);
    let remote = TvRemote::new(identity(port), tx);

    assert!(!remote.is_on(Duration::ZERO).await);
    assert_eq!(remote.connection_state(), ConnectionState::Off);
}

#[tokio::test]
async fn connect_requires_the_tv_to_be_on() {
    let (tx, _rx) = mpsc::channel(1);
    let remote = TvRemote::new(identity(1), tx);
    assert_eq!(remote.connect().await, None);

    remote.set_state(ConnectionState::Off);
    assert_eq!(remote.connect().await, None);
    assert!(!remote.is_connected());
}

#[tokio::test]
async fn pairs_then_reuses_token_on_reconnect() {
    let mut tv = fake_tv(r#"{"event":"ms.channel.connect","data":{"token":"T1"}}"#, false).await;
    let (remote, _events) = remote_for(identity(tv.port));

    assert_eq!(remote.connect().await.as_deref(), Some("T1"));
    assert!(remote.is_connected());
    let uri = tv.uris.recv().await.unwrap();
    assert!(uri.starts_with("/api/v2/channels/samsung.remote.control?name="));
    assert_eq!(query_token(&uri), None);

    assert!(remote.press(Key::VolumeUp).await);
    let frame: Value = serde_json::from_str(&tv.frames.recv().await.unwrap()).unwrap();
    assert_eq!(frame["method"], "ms.remote.control");
    assert_eq!(frame["params"]["DataOfCmd"], "KEY_VOLUP");

    remote.close().await;
    assert!(!remote.is_connected());
    assert!(!remote.press(Key::VolumeUp).await);

    // Second session: the stored token goes in the URL and is reused.
    let mut tv = fake_tv(r#"{"event":"ms.channel.connect","data":{"id":"abc"}}"#, false).await;
    let (remote, _events) = remote_for(identity(tv.port).with_token(remote.token()));

    assert_eq!(remote.connect().await.as_deref(), Some("T1"));
    let uri = tv.uris.recv().await.unwrap();
    assert_eq!(query_token(&uri).as_deref(), Some("T1"));

    assert!(remote.press(Key::VolumeDown).await);
    let frame: Value = serde_json::from_str(&tv.frames.recv().await.unwrap()).unwrap();
    assert_eq!(frame["params"]["DataOfCmd"], "KEY_VOLDOWN");
    remote.close().await;
}

#[tokio::test]
async fn takes_token_from_paired_clients() {
    let name = identity(1).app_name_base64();
    let frame = format!(
        r#"{{"event":"ms.channel.connect","data":{{"clients":[{{"attributes":{{"name":"{}","token":"P7"}}}}]}}}}"#,
        name
    );

    let tv = fake_tv(frame, false).await;
    let (remote, _events) = remote_for(identity(tv.port));
    assert_eq!(remote.connect().await.as_deref(), Some("P7"));
    remote.close().await;
}

#[tokio::test]
async fn unpaired_connection_cannot_send() {
    let mut tv = fake_tv(r#"{"event":"ms.channel.unauthorized"}"#, false).await;
    let (remote, _events) = remote_for(identity(tv.port));

    assert_eq!(remote.connect().await, None);
    assert!(remote.is_connected());
    assert!(!remote.press(Key::VolumeUp).await);
    assert!(!remote.type_text("hello").await);
    assert!(tv.frames.try_recv().is_err());
    remote.close().await;
}

#[tokio::test]
async fn types_text_as_base64() {
    let mut tv = fake_tv(r#"{"event":"ms.channel.connect","data":{"token":"T2"}}"#, false).await;
    let (remote, _events) = remote_for(identity(tv.port));
    remote.connect().await;

    assert!(remote.type_text("hello").await);
    let frame: Value = serde_json::from_str(&tv.frames.recv().await.unwrap()).unwrap();
    assert_eq!(frame["params"]["Cmd"], "aGVsbG8=");
    assert_eq!(frame["params"]["TypeOfRemote"], "SendInputString");
    remote.close().await;
}

#[tokio::test]
async fn reports_disconnect_when_tv_hangs_up() {
    let tv = fake_tv(r#"{"event":"ms.channel.connect","data":{"token":"T3"}}"#, true).await;
    let (remote, mut events) = remote_for(identity(tv.port));

    assert_eq!(remote.connect().await.as_deref(), Some("T3"));
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(RemoteEvent::Disconnected));
    assert!(!remote.is_connected());
    assert_eq!(remote.connection_state(), ConnectionState::OnDisconnected);
    assert!(!remote.press(Key::Mute).await);
    remote.close().await;
}

#[tokio::test]
async fn connect_failure_keeps_stored_token() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let (remote, _events) = remote_for(identity(port).with_token(Some("OLD".to_string())));

    assert_eq!(remote.connect().await.as_deref(), Some("OLD"));
    assert!(!remote.is_connected());
}

#[tokio::test]
async fn close_is_idempotent() {
    let (remote, _events) = remote_for(identity(1));
    remote.close().await;
    remote.close().await;

    let tv = fake_tv(r#"{"event":"ms.channel.connect","data":{"token":"T4"}}"#, false).await;
    let (remote, mut events) = remote_for(identity(tv.port));
    remote.connect().await;
    remote.close().await;
    remote.close().await;
    assert!(!remote.is_connected());
    // A cancelled read loop does not report a disconnect.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn handshake_waits_thirty_seconds_by_default() {
    let (tx, _rx) = mpsc::channel(1);
    let remote = TvRemote::new(identity(1), tx);
    assert_eq!(remote.handshake_wait, HANDSHAKE_WAIT);
    assert_eq!(HANDSHAKE_WAIT, Duration::from_secs(30));
}

#[tokio::test]
async fn silent_tv_keeps_the_stored_token_after_the_handshake_band() {
    let port = silent_tv().await;
    let (remote, _events) = remote_for(identity(port).with_token(Some("OLD".to_string())));
    let remote = remote.with_handshake_wait(Duration::from_millis(300));

    let started = Instant::now();
    assert_eq!(remote.connect().await.as_deref(), Some("OLD"));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(remote.is_connected());
    assert_eq!(remote.connection_state(), ConnectionState::OnConnected);
    assert!(remote.press(Key::Mute).await);
    remote.close().await;
}

#[tokio::test]
async fn silent_tv_without_stored_token_connects_unpaired() {
    let port = silent_tv().await;
    let (remote, _events) = remote_for(identity(port));
    let remote = remote.with_handshake_wait(Duration::from_millis(300));

    assert_eq!(remote.connect().await, None);
    assert_eq!(remote.connection_state(), ConnectionState::OnConnected);
    assert!(!remote.press(Key::Mute).await);
    remote.close().await;
}

#[tokio::test]
async fn pairs_over_wss_with_a_self_signed_certificate() {
    let (port, mut frames) =
        fake_tls_tv(r#"{"event":"ms.channel.connect","data":{"token":"S1"}}"#).await;
    let identity = identity(port).with_status_port(1);
    assert_eq!(identity.scheme(), "wss");
    let (remote, _events) = remote_for(identity);

    assert_eq!(remote.connect().await.as_deref(), Some("S1"));
    assert!(remote.is_connected());

    assert!(remote.press(Key::VolumeDown).await);
    let frame: Value = serde_json::from_str(&frames.recv().await.unwrap()).unwrap();
    assert_eq!(frame["params"]["DataOfCmd"], "KEY_VOLDOWN");
    remote.close().await;
}

#[tokio::test]
async fn failed_probe_closes_an_open_channel() {
    let tv = fake_tv(r#"{"event":"ms.channel.connect","data":{"token":"T5"}}"#, false).await;
    let (remote, mut events) = remote_for(identity(tv.port));
    assert_eq!(remote.connect().await.as_deref(), Some("T5"));
    assert!(remote.is_connected());

    // The status URL hits the WebSocket endpoint, which rejects plain HTTP.
    assert!(!remote.is_on(Duration::ZERO).await);
    assert_eq!(remote.connection_state(), ConnectionState::Off);
    assert!(!remote.is_connected());
    assert!(remote.writer.lock().await.is_none());
    assert!(remote.reader.lock().await.is_none());
    assert!(!remote.press(Key::Mute).await);
    assert!(events.try_recv().is_err());
}
