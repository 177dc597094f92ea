//! Connection-failure classification for `SshTransport` against local
//! sockets. No SSH server is needed: each test sets up a port that
//! refuses or stalls.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use tokio::net::TcpListener;

use hostwatch_api::{Error, HostKeyPolicy, SshAuth, SshConfig, SshTransport, Transport};

// ── Helpers ─────────────────────────────────────────────────────────

fn transport_for(port: u16, connect_timeout: Duration) -> SshTransport {
    SshTransport::new(SshConfig {
        host: "127.0.0.1".into(),
        port,
        username: "tester".into(),
        auth: SshAuth::Password(SecretString::from("secret")),
        host_keys: HostKeyPolicy::AcceptAny,
        connect_timeout,
        mac_address: None,
    })
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn refused_port_is_a_connect_error() {
    let port = unused_port().await;
    let transport = transport_for(port, Duration::from_secs(2));

    let err = transport.probe().await.unwrap_err();
    assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
    assert!(!err.is_auth_error());
}

#[tokio::test]
async fn silent_server_times_out_as_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Accept and hold the socket without ever sending an SSH banner.
    let holder = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let transport = transport_for(port, Duration::from_millis(200));
    let err = transport
        .execute("uptime", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_offline(), "got {err:?}");

    holder.abort();
}

#[tokio::test]
async fn close_without_session_is_a_no_op() {
    let transport = transport_for(unused_port().await, Duration::from_secs(1));
    transport.close().await;
    assert_eq!(transport.target(), format!("tester@127.0.0.1:{}", transport.config().port));
}
