//! Quinn-based QUIC transport.
//!
//! Transport security is plumbing as far as the relay is concerned: this
//! module terminates TLS 1.3 (via rustls) and hands the runtime ordered,
//! bidirectional connections. Supports production certificates from PEM
//! files and a self-signed fallback for development.
//!
//! # Security
//!
//! ALPN is pinned to `sotto` so mismatched peers fail the handshake early.
//! Self-signed certificates are only suitable for local testing; production
//! deployments MUST use certificates from a trusted CA. Note that TLS
//! protects the channel, not the messages: envelope confidentiality comes
//! from the client-side passphrase-derived key, and the relay never sees
//! plaintext regardless of transport.

use std::{net::SocketAddr, sync::Arc};

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig};
use sotto_proto::ALPN_PROTOCOL;

use crate::error::ServerError;

/// QUIC transport using Quinn.
///
/// Provides a QUIC endpoint that accepts incoming connections, configured
/// with TLS 1.3 and ALPN protocol `sotto`.
pub struct QuicTransport {
    /// Quinn endpoint.
    endpoint: Endpoint,
}

impl QuicTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are both provided they are used for
    /// TLS; otherwise a self-signed certificate is generated for
    /// development.
    pub fn bind(
        address: &str,
        cert_path: Option<String>,
        key_path: Option<String>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(&cert, &key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Accept the next successfully established QUIC connection.
    ///
    /// Failed handshakes are logged and skipped. Returns `None` once the
    /// endpoint is closed, which is the server's shutdown signal.
    pub async fn accept(&self) -> Option<QuicConnection> {
        loop {
            let incoming = self.endpoint.accept().await?;

            match incoming.await {
                Ok(conn) => return Some(QuicConnection { connection: conn }),
                Err(e) => {
                    tracing::debug!("connection handshake failed: {e}");
                },
            }
        }
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// A QUIC connection wrapper.
///
/// Clones are cheap and share the same underlying connection, so the
/// runtime can hand the connection to multiple tasks.
#[derive(Clone)]
pub struct QuicConnection {
    connection: quinn::Connection,
}

impl QuicConnection {
    /// Accept the client's session stream.
    ///
    /// Each client opens exactly one bidirectional stream per connection
    /// and sends all of its events on it, which preserves inbound event
    /// order.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Open the unidirectional outbound stream.
    ///
    /// All server-to-client frames for a connection go through this single
    /// ordered stream; history snapshot first, live broadcasts after.
    pub async fn open_uni(&self) -> Result<SendStream, ServerError> {
        self.connection
            .open_uni()
            .await
            .map_err(|e| ServerError::Transport(format!("open_uni failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with an error code and reason.
    pub fn close(&self, error_code: quinn::VarInt, reason: &[u8]) {
        self.connection.close(error_code, reason);
    }
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;

    let key_pem = fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    build_server_config(certs, key)
}

/// Generate a self-signed certificate for development.
fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let cert_der = cert.cert.der().clone();
    let key_der = cert.key_pair.serialize_der();

    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(key_der);

    tracing::warn!("Using self-signed certificate - not for production use!");

    build_server_config(vec![cert_der], key.into())
}

/// Assemble the quinn server config from certificate chain and key.
fn build_server_config(
    cert_chain: Vec<rustls::pki_types::CertificateDer<'static>>,
    key: rustls::pki_types::PrivateKeyDer<'static>,
) -> Result<ServerConfig, ServerError> {
    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    ));

    Ok(server_config)
}
