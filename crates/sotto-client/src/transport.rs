//! QUIC transport for the client.
//!
//! Provides [`ConnectedClient`], which handles QUIC I/O for frame transport.
//! This is a thin layer that just moves frames over channels - protocol
//! logic stays in the Sans-IO [`crate::Session`].
//!
//! The client opens a single bidirectional stream and sends every outbound
//! frame on it in order; the server's frames arrive on the single
//! unidirectional stream it opens, history snapshot first.

use std::{net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use quinn::{ClientConfig, Endpoint, RecvStream};
use sotto_proto::{ALPN_PROTOCOL, Frame, FrameHeader};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Handle to a connected client with QUIC transport.
///
/// Frames are sent and received via the channels; an internal task handles
/// the QUIC I/O.
pub struct ConnectedClient {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the server.
    pub from_server: mpsc::Receiver<Frame>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Connect to a sotto relay via QUIC.
///
/// Returns a [`ConnectedClient`] with channels for frame transport.
pub async fn connect(server_addr: &str) -> Result<ConnectedClient, TransportError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address: {e}")))?;

    let client_config = insecure_client_config()?;
    let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint
        .connect(addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(32);

    let handle = tokio::spawn(run_connection(connection, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and QUIC.
async fn run_connection(
    connection: quinn::Connection,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    // Reader task: the server's single ordered outbound stream.
    let conn_recv = connection.clone();
    let recv_handle = tokio::spawn(async move {
        match conn_recv.accept_uni().await {
            Ok(recv) => {
                if let Err(e) = read_frames(recv, from_server).await {
                    tracing::debug!("inbound stream ended: {e}");
                }
            },
            Err(e) => {
                tracing::debug!("accept_uni failed: {e}");
            },
        }
    });

    // Main loop: send outgoing frames on the single session stream.
    let send_result: Result<(), TransportError> = async {
        let (mut send, _recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::Stream(format!("open_bi failed: {e}")))?;

        let mut buf = Vec::with_capacity(4096);
        while let Some(frame) = to_server.recv().await {
            buf.clear();
            frame
                .encode(&mut buf)
                .map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

            send.write_all(&buf)
                .await
                .map_err(|e| TransportError::Stream(format!("write failed: {e}")))?;
        }

        let _ = send.finish();
        Ok(())
    }
    .await;

    if let Err(e) = send_result {
        tracing::debug!("outbound stream ended: {e}");
    }

    recv_handle.abort();
}

/// Read frames from the server's outbound stream until it closes.
async fn read_frames(mut recv: RecvStream, tx: mpsc::Sender<Frame>) -> Result<(), TransportError> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        if recv.read_exact(&mut buf[..FrameHeader::SIZE]).await.is_err() {
            // Stream finished: server closed the connection.
            return Ok(());
        }

        let header = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
            .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?;
        let payload_size = header.payload_size() as usize;

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            recv.read_exact(&mut buf[FrameHeader::SIZE..])
                .await
                .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
        }

        let frame = Frame::decode(&buf)
            .map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))?;

        if tx.send(frame).await.is_err() {
            // Receiver dropped: the application is shutting down.
            return Ok(());
        }
    }
}

/// Create an insecure client config that accepts any certificate.
///
/// WARNING: Development only. Production should verify certificates.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    // Must match the server's ALPN protocol.
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransportError::Connection(format!("TLS config error: {e}")))?,
    ));

    Ok(config)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
