use crate::server::health::ping;

use std::net::TcpListener;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

fn server_port(server: &MockServer) -> u16 {
    server.address().port()
}

/// **VALUE**: Verifies a responding server is reported alive.
///
/// **WHY THIS MATTERS**: `health_check()` is how callers tell a hung server from a live one.
///
/// **BUG THIS CATCHES**: Would catch the ping using the wrong method or path.
#[tokio::test]
async fn given_server_answering_head_when_pinging_then_returns_true() {
    // GIVEN: A server answering HEAD /
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN: Pinging it
    let alive = ping("127.0.0.1", server_port(&server), PING_TIMEOUT).await;

    // THEN: It is alive
    assert!(alive);
}

/// **VALUE**: Verifies error statuses still count as alive.
///
/// **WHY THIS MATTERS**: The viewer serves static assets; a 404 on `/` still proves the
/// process is accepting connections.
///
/// **BUG THIS CATCHES**: Would catch a ping that demands a 2xx status.
#[tokio::test]
async fn given_server_answering_404_when_pinging_then_returns_true() {
    let server = MockServer::start().await;

    let alive = ping("127.0.0.1", server_port(&server), PING_TIMEOUT).await;

    assert!(alive, "Any HTTP response means the server is up");
}

/// **VALUE**: Verifies a closed port is reported dead without hanging.
///
/// **WHY THIS MATTERS**: Health checks run after crashes; they must fail fast.
///
/// **BUG THIS CATCHES**: Would catch connection errors being turned into panics.
#[tokio::test]
async fn given_nothing_listening_when_pinging_then_returns_false() {
    // GIVEN: A port that was free a moment ago
    let port = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    };

    // WHEN: Pinging it
    let alive = ping("127.0.0.1", port, PING_TIMEOUT).await;

    // THEN: Not alive
    assert!(!alive);
}
