//! TLS acceptor setup using rustls.
//!
//! The server terminates TLS itself: the certificate and private key are
//! loaded from PEM files named in [`TlsConfig`] and turned into a
//! `rustls::ServerConfig`. Client certificates are not requested.

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::ServerConfig;

use super::config::TlsConfig;

/// Errors from loading or assembling the TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TLS certificate chain: {0}")]
    ParseCerts(std::io::Error),
    #[error("failed to read TLS private key: {0}")]
    ParseKey(std::io::Error),
    #[error("no private key found in PEM data")]
    MissingKey,
    #[error("rustls rejected the server configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Builds a [`rustls::ServerConfig`] from PEM-encoded certificate chain and
/// private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if
/// rustls rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::ParseCerts)?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(TlsError::ParseKey)?
        .ok_or(TlsError::MissingKey)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

/// Loads a [`rustls::ServerConfig`] from the paths in `config`.
///
/// # Errors
///
/// Returns an error if either file cannot be read, or if the PEM contents
/// are rejected (see [`build_server_config`]).
pub fn load_server_config(config: &TlsConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_pem = std::fs::read(&config.cert_path).map_err(|source| TlsError::Read {
        path: config.cert_path.clone(),
        source,
    })?;
    let key_pem = std::fs::read(&config.key_path).map_err(|source| TlsError::Read {
        path: config.key_path.clone(),
        source,
    })?;
    build_server_config(&cert_pem, &key_pem)
}
