//! End-to-end tests: a real TLS client against a served listener.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opwire_core::codec::{encode_request, decode_result};
use opwire_server::network::ShutdownController;
use opwire_server::{
    HandlerError, OperationRequest, OperationResult, OperationRouter, ServeError, Server,
    ServerConfig, TlsConfig,
};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn test_config() -> ServerConfig {
    ServerConfig::new(
        0,
        TlsConfig {
            cert_path: fixture("cert.pem"),
            key_path: fixture("key.pem"),
        },
    )
}

type ServeTask = JoinHandle<Result<(), ServeError>>;

/// Starts a server on an OS-assigned port with `setup` applied to the router.
async fn start_server(
    config: ServerConfig,
    setup: impl FnOnce(&OperationRouter),
) -> (u16, Arc<ShutdownController>, ServeTask) {
    let mut server = Server::new(config);
    setup(&server.router());
    let port = server.start().await.expect("server should bind");
    let controller = server.shutdown_controller();
    let task = tokio::spawn(server.serve());
    (port, controller, task)
}

fn register_login(router: &OperationRouter) {
    router.register("login", |req: Option<OperationRequest>| async move {
        let credentials = req.and_then(|r| r.content).filter(|c| !c.is_empty());
        Ok(match credentials {
            Some(_) => OperationResult::ok("Logged in!"),
            None => OperationResult::ko("Missing credentials"),
        })
    });
}

fn register_echo(router: &OperationRouter) {
    router.register("echo", |req: Option<OperationRequest>| async move {
        let content = req.and_then(|r| r.content).unwrap_or_default();
        Ok(OperationResult::ok(content))
    });
}

async fn connect(port: u16) -> TlsStream<TcpStream> {
    let mut roots = rustls::RootCertStore::empty();
    let cert_pem = std::fs::read(fixture("cert.pem")).expect("fixture cert");
    for cert in rustls_pemfile::certs(&mut cert_pem.as_slice()) {
        roots.add(cert.expect("parseable cert")).expect("valid root");
    }
    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));

    let tcp = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("TCP connect");
    connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .expect("TLS handshake")
}

async fn read_result(tls: &mut TlsStream<TcpStream>) -> OperationResult {
    let mut buf = Vec::new();
    tls.read_to_end(&mut buf).await.expect("read response");
    decode_result(&buf).expect("decodable response")
}

/// One full exchange on a fresh connection.
async fn send_request(port: u16, raw: &str) -> OperationResult {
    let mut tls = connect(port).await;
    tls.write_all(&encode_request(raw).unwrap()).await.unwrap();
    tls.flush().await.unwrap();
    read_result(&mut tls).await
}

#[tokio::test]
async fn login_with_credentials_succeeds() {
    let (port, controller, task) = start_server(test_config(), register_login).await;

    let result = send_request(port, "login|username:password").await;
    assert!(result.success);
    assert_eq!(result.content_str(), Some("Logged in!"));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn login_without_payload_round_trips_handler_ko() {
    let (port, controller, task) = start_server(test_config(), register_login).await;

    let result = send_request(port, "login").await;
    assert!(!result.success);
    assert_eq!(result.content_str(), Some("Missing credentials"));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_operation_returns_canonical_not_found() {
    let (port, controller, task) = start_server(test_config(), register_login).await;

    let result = send_request(port, "unknown").await;
    assert!(!result.success);
    assert_eq!(result.content_str(), Some("Operation 'unknown' not found."));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn empty_operation_name_misses_lookup() {
    let (port, controller, task) = start_server(test_config(), register_login).await;

    let result = send_request(port, "|payload").await;
    assert!(!result.success);
    assert_eq!(result.content_str(), Some("Operation '' not found."));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn payload_keeps_pipes_past_the_first_delimiter() {
    let (port, controller, task) = start_server(test_config(), register_echo).await;

    let result = send_request(port, "echo|a|b|c").await;
    assert!(result.success);
    assert_eq!(result.content_str(), Some("a|b|c"));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn handler_error_text_reaches_the_caller() {
    let (port, controller, task) = start_server(test_config(), |router| {
        router.register("fail", |_| async {
            Err::<OperationResult, _>(HandlerError::msg("backend unavailable"))
        });
    })
    .await;

    let result = send_request(port, "fail").await;
    assert!(!result.success);
    assert_eq!(result.content_str(), Some("backend unavailable"));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_request_is_rejected_with_limit_message() {
    let mut config = test_config();
    config.max_request_bytes = 64;
    let (port, controller, task) = start_server(config, register_echo).await;

    let big = format!("echo|{}", "x".repeat(300));
    let result = send_request(port, &big).await;
    assert!(!result.success);
    assert_eq!(
        result.content_str(),
        Some("Max request length (64) exceeded.")
    );

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_response_is_replaced_with_limit_message() {
    let mut config = test_config();
    config.max_response_bytes = 64;
    let (port, controller, task) = start_server(config, |router| {
        router.register("big", |_| async {
            Ok(OperationResult::ok("y".repeat(1000)))
        });
    })
    .await;

    let result = send_request(port, "big").await;
    assert!(!result.success);
    assert_eq!(
        result.content_str(),
        Some("Max response length (64) exceeded.")
    );

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn pure_handlers_are_idempotent_across_fresh_connections() {
    let (port, controller, task) = start_server(test_config(), register_login).await;

    let first = send_request(port, "login|u:p").await;
    let second = send_request(port, "login|u:p").await;
    assert_eq!(first, second);

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_clients_get_their_own_responses() {
    let (port, controller, task) = start_server(test_config(), register_echo).await;

    let mut clients = Vec::new();
    for i in 0..16 {
        clients.push(tokio::spawn(async move {
            let payload = format!("client-{i}");
            let result = send_request(port, &format!("echo|{payload}")).await;
            assert!(result.success);
            assert_eq!(result.content_str(), Some(payload.as_str()));
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn non_tls_client_is_closed_without_breaking_the_server() {
    let (port, controller, task) = start_server(test_config(), register_login).await;

    // Garbage bytes instead of a ClientHello: handshake fails, the
    // connection is closed with no response.
    let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    raw.write_all(b"this is not a TLS handshake").await.unwrap();
    let mut buf = Vec::new();
    let read = raw.read_to_end(&mut buf).await.unwrap_or(0);
    assert_eq!(read, 0);

    // The listener keeps serving other connections afterwards.
    let result = send_request(port, "login|u:p").await;
    assert_eq!(result.content_str(), Some("Logged in!"));

    controller.trigger_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_drains_in_flight_connections_then_refuses() {
    let completions = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&completions);

    let (port, controller, task) = start_server(test_config(), move |router| {
        router.register("slow", move |_req| {
            let log = Arc::clone(&handler_log);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                log.lock().push("handler-done");
                Ok(OperationResult::ok("done"))
            }
        });
    })
    .await;

    // M connections mid-flight when the shutdown signal fires.
    let mut clients = Vec::new();
    for _ in 0..4 {
        let mut tls = connect(port).await;
        tls.write_all(&encode_request("slow").unwrap()).await.unwrap();
        tls.flush().await.unwrap();
        clients.push(tls);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.trigger_shutdown();

    // Every in-flight exchange completes and responds.
    for mut tls in clients {
        let result = read_result(&mut tls).await;
        assert!(result.success);
        assert_eq!(result.content_str(), Some("done"));
    }

    task.await.unwrap().unwrap();
    assert_eq!(completions.lock().len(), 4);

    // serve() has returned: the listener is gone and no further
    // connection is accepted.
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}
