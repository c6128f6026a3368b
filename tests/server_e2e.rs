//! End-to-end tests exercising the ident server over real TCP sockets.
//!
//! Every test binds an ephemeral port (port 0) so tests can run in
//! parallel and without the privilege needed for port 113.

use identd::IdentServer;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Instant};

/// Poll until the server publishes its bound address.
async fn wait_for_listening(server: &IdentServer) -> SocketAddr {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(addr) = server.local_addr() {
            return addr;
        }
        assert!(Instant::now() < deadline, "server did not start listening");
        sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the server has torn its listener down after a stop.
async fn wait_for_stopped(server: &IdentServer) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while server.local_addr().is_some() {
        assert!(Instant::now() < deadline, "accept loop did not exit");
        sleep(Duration::from_millis(25)).await;
    }
}

/// Connect, send `request`, and collect everything the server sends back
/// until it closes the connection.
async fn exchange(port: u16, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn e2e_well_formed_query_gets_identity_response() {
    let server = IdentServer::with_port("alice", 0).unwrap();
    server.start().unwrap();
    let addr = wait_for_listening(&server).await;

    let response = exchange(addr.port(), "6191, 23\r\n").await;
    assert_eq!(response, b"6191, 23 : USERID : UNIX : alice\r\n");

    server.shutdown();
}

#[tokio::test]
async fn e2e_empty_query_gets_no_response() {
    let server = IdentServer::with_port("alice", 0).unwrap();
    server.start().unwrap();
    let addr = wait_for_listening(&server).await;

    let response = exchange(addr.port(), "\r\n").await;
    assert!(response.is_empty());

    server.shutdown();
}

#[tokio::test]
async fn e2e_silent_client_times_out_and_server_keeps_serving() {
    let server = IdentServer::with_port("alice", 0).unwrap();
    server.set_timeout(Duration::from_millis(100));

    let kinds: Arc<Mutex<Vec<Option<ErrorKind>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    server.subscribe(move |event| {
        sink.lock().unwrap().push(event.cause().map(|e| e.kind()));
    });

    server.start().unwrap();
    let addr = wait_for_listening(&server).await;

    // Connect but never send anything; the server must give up on us.
    let mut stream = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
    let mut buf = Vec::new();
    let n = stream.read_to_end(&mut buf).await.unwrap();
    assert_eq!(n, 0, "no bytes expected on a timed-out connection");

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if kinds.lock().unwrap().contains(&Some(ErrorKind::TimedOut)) {
            break;
        }
        assert!(Instant::now() < deadline, "no timeout notification fired");
        sleep(Duration::from_millis(10)).await;
    }

    // Still running and still answering.
    assert!(server.is_running());
    let response = exchange(addr.port(), "113, 6191\r\n").await;
    assert_eq!(response, b"113, 6191 : USERID : UNIX : alice\r\n");

    server.shutdown();
}

#[tokio::test]
async fn e2e_concurrent_clients_get_their_own_responses() {
    let server = IdentServer::with_port("shared-id", 0).unwrap();
    server.start().unwrap();
    let addr = wait_for_listening(&server).await;

    let first = tokio::spawn(async move { exchange(addr.port(), "100, 200\r\n").await });
    let second = tokio::spawn(async move { exchange(addr.port(), "300, 400\r\n").await });

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(first, b"100, 200 : USERID : UNIX : shared-id\r\n");
    assert_eq!(second, b"300, 400 : USERID : UNIX : shared-id\r\n");

    server.shutdown();
}

#[tokio::test]
async fn e2e_bind_failure_is_reported_not_thrown() {
    // Occupy a port so the server's bind fails.
    let occupant = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let taken = occupant.local_addr().unwrap().port();

    let server = IdentServer::with_port("alice", taken).unwrap();
    let kinds: Arc<Mutex<Vec<Option<ErrorKind>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    server.subscribe(move |event| {
        sink.lock().unwrap().push(event.cause().map(|e| e.kind()));
    });

    // start() itself succeeds; the failure arrives asynchronously.
    server.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if kinds.lock().unwrap().contains(&Some(ErrorKind::AddrInUse)) {
            break;
        }
        assert!(Instant::now() < deadline, "no bind-failure notification fired");
        sleep(Duration::from_millis(10)).await;
    }

    assert!(!server.is_running());
    server.shutdown();
}

#[tokio::test]
async fn e2e_server_restarts_after_stop() {
    let server = IdentServer::with_port("alice", 0).unwrap();

    server.start().unwrap();
    let addr = wait_for_listening(&server).await;
    let response = exchange(addr.port(), "1, 2\r\n").await;
    assert_eq!(response, b"1, 2 : USERID : UNIX : alice\r\n");

    server.stop();
    assert!(!server.is_running());
    wait_for_stopped(&server).await;

    // Same instance, second run.
    server.start().unwrap();
    let addr = wait_for_listening(&server).await;
    let response = exchange(addr.port(), "3, 4\r\n").await;
    assert_eq!(response, b"3, 4 : USERID : UNIX : alice\r\n");

    server.shutdown();
}

#[tokio::test]
async fn e2e_query_whitespace_is_trimmed() {
    let server = IdentServer::with_port("alice", 0).unwrap();
    server.start().unwrap();
    let addr = wait_for_listening(&server).await;

    let response = exchange(addr.port(), "   6191, 23   \r\n").await;
    assert_eq!(response, b"6191, 23 : USERID : UNIX : alice\r\n");

    server.shutdown();
}
