//! Demo server: registers the canonical `login` and `echo` operations and
//! serves until ctrl-c, then drains.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use opwire_server::{
    OperationRequest, OperationResult, Server, ServerConfig, TlsConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "demo-server", about = "OpWire demo server")]
struct Args {
    /// Port to listen on (0 = OS-assigned).
    #[arg(long, env = "OPWIRE_PORT", default_value_t = 7878)]
    port: u16,

    /// Path to the PEM-encoded TLS certificate chain.
    #[arg(long, env = "OPWIRE_CERT")]
    cert: PathBuf,

    /// Path to the PEM-encoded TLS private key.
    #[arg(long, env = "OPWIRE_KEY")]
    key: PathBuf,

    /// OS-level accept queue depth.
    #[arg(long, env = "OPWIRE_BACKLOG", default_value_t = 100)]
    backlog: u32,

    /// Maximum encoded request size in bytes.
    #[arg(long, env = "OPWIRE_MAX_REQUEST_BYTES", default_value_t = 1_048_576)]
    max_request_bytes: usize,

    /// Maximum encoded response size in bytes.
    #[arg(long, env = "OPWIRE_MAX_RESPONSE_BYTES", default_value_t = 1_048_576)]
    max_response_bytes: usize,

    /// Seconds to wait for in-flight connections on shutdown
    /// (absent = wait forever).
    #[arg(long, env = "OPWIRE_DRAIN_TIMEOUT_SECS")]
    drain_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::new(
        args.port,
        TlsConfig {
            cert_path: args.cert,
            key_path: args.key,
        },
    );
    config.backlog = args.backlog;
    config.max_request_bytes = args.max_request_bytes;
    config.max_response_bytes = args.max_response_bytes;
    config.drain_timeout = args.drain_timeout_secs.map(Duration::from_secs);

    let mut server = Server::new(config);
    register_operations(&server.router());

    let port = server.start().await?;
    info!(port, "demo server listening");

    let controller = server.shutdown_controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, draining");
            controller.trigger_shutdown();
        }
    });

    server.serve().await?;
    info!("server stopped");
    Ok(())
}

fn register_operations(router: &opwire_server::OperationRouter) {
    router.register("login", |req: Option<OperationRequest>| async move {
        let credentials = req.and_then(|r| r.content).filter(|c| !c.is_empty());
        Ok(match credentials {
            Some(_) => OperationResult::ok("Logged in!"),
            None => OperationResult::ko("Missing credentials"),
        })
    });

    router.register("echo", |req: Option<OperationRequest>| async move {
        Ok(match req.and_then(|r| r.content) {
            Some(content) => OperationResult::ok(content),
            None => OperationResult::ok_empty(),
        })
    });

    router.register("whoami", |req: Option<OperationRequest>| async move {
        let origin = req.map(|r| r.origin).unwrap_or_default();
        Ok(OperationResult::ok(rmpv::Value::Map(vec![(
            rmpv::Value::from("origin"),
            rmpv::Value::from(origin),
        )])))
    });
}
