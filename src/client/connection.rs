//! Transport establishment for `Nntp::connect`
//!
//! This module handles address resolution, TCP socket tuning, connecting,
//! and the optional TLS handshake. The engine itself only sees the resulting
//! byte stream.

use super::BoxedTransport;
use crate::config::ServerConfig;
use crate::error::{NntpError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

/// Upper bound on the TCP connect, in seconds
const TCP_CONNECT_TIMEOUT_SECS: u64 = 120;

/// Upper bound on the TLS handshake, in seconds
const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 60;

/// Kernel receive buffer requested for the socket (1MB)
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// Kernel send buffer requested for the socket, enough for a deep pipeline (256KB)
const SEND_BUFFER_SIZE: usize = 256 * 1024;

/// Verifier installed for [`ServerConfig::allow_insecure_tls`]: every
/// certificate and signature passes
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        tokio_rustls::rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Open the transport described by `config`: TCP, then TLS when requested
pub(super) async fn open(config: &ServerConfig) -> Result<BoxedTransport> {
    let addr = resolve(&config.host, config.port).await?;
    let tcp = connect_tcp(addr).await?;
    if !config.tls {
        debug!("Connected to {} (plain)", addr);
        return Ok(Box::new(tcp));
    }
    let tls = handshake(config, tcp, Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS)).await?;
    debug!("Connected to {} (tls)", addr);
    Ok(Box::new(tls))
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{host}:{port}");
    let lookup = target.clone();
    tokio::task::spawn_blocking(move || lookup.to_socket_addrs())
        .await
        .map_err(|e| NntpError::permanent(format!("address resolution task failed: {e}")))?
        .map_err(|e| NntpError::temporary(format!("failed to resolve {target}: {e}")))?
        .next()
        .ok_or_else(|| NntpError::permanent(format!("no address resolved for {target}")))
}

/// Build a tuned socket
fn tuned_socket(addr: SocketAddr) -> Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Commands are small and latency bound
    socket.set_nodelay(true)?;

    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!(
            "Failed to set receive buffer size to {} bytes: {}",
            RECV_BUFFER_SIZE, e
        );
    }
    if let Err(e) = socket.set_send_buffer_size(SEND_BUFFER_SIZE) {
        warn!(
            "Failed to set send buffer size to {} bytes: {}",
            SEND_BUFFER_SIZE, e
        );
    }
    match (socket.recv_buffer_size(), socket.send_buffer_size()) {
        (Ok(recv), Ok(send)) => debug!("TCP buffers: receive {} bytes, send {} bytes", recv, send),
        (Err(e), _) | (_, Err(e)) => warn!("Failed to query socket buffer sizes: {}", e),
    }
    Ok(socket)
}

async fn connect_tcp(addr: SocketAddr) -> Result<TcpStream> {
    let socket = tuned_socket(addr)?;

    // socket2::Socket::connect() is blocking; connect before switching to non-blocking mode
    let stream = timeout(
        Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
        tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
            socket.connect(&addr.into())?;
            socket.set_nonblocking(true)?;
            Ok(socket.into())
        }),
    )
    .await
    .map_err(|_| NntpError::temporary(format!("connection to {addr} timed out")))?
    .map_err(|e| NntpError::permanent(format!("connect task failed: {e}")))??;

    Ok(TcpStream::from_std(stream)?)
}

fn tls_config(allow_insecure: bool) -> ClientConfig {
    use tokio_rustls::rustls::crypto::{CryptoProvider, ring};
    let _ = CryptoProvider::install_default(ring::default_provider());

    if allow_insecure {
        warn!("TLS certificate validation disabled - connection vulnerable to MITM attacks");
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth()
    } else {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    }
}

async fn handshake(
    config: &ServerConfig,
    tcp: TcpStream,
    limit: Duration,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = TlsConnector::from(Arc::new(tls_config(config.allow_insecure_tls)));
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| NntpError::invalid_data(format!("invalid server name {}: {e}", config.host)))?;

    timeout(limit, connector.connect(server_name, tcp))
        .await
        .map_err(|_| NntpError::temporary(format!("TLS handshake with {} timed out", config.host)))?
        .map_err(|e| NntpError::permanent(format!("TLS handshake failed: {e}")))
}
