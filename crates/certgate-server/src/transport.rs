//! Mutual-TLS transport
//!
//! The TLS layer asks every client for a certificate but admits connections
//! that present an untrusted one, or none at all. The gate decides what such
//! clients may do; the transport only reports what it saw.
//!
//! During the handshake a [`PermissiveClientVerifier`] accepts any client
//! certificate while still checking the handshake signature, so the client
//! has proven possession of the key. Once the handshake completes the chain
//! is verified against the configured roots and the verdict is attached to
//! every request on the connection as a [`PeerCertificate`] extension.

use axum::Router;
use certgate_core::PeerCertificate;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme,
};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, info, warn};

use crate::config::TlsPaths;

/// Errors raised while setting up or running the TLS listener
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Private key error: {0}")]
    PrivateKey(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

// =============================================================================
// Verifiers
// =============================================================================

/// Handshake-time verifier that accepts any client certificate
///
/// Signature checks are delegated to the wrapped webpki verifier.
#[derive(Debug)]
pub struct PermissiveClientVerifier {
    inner: Arc<dyn ClientCertVerifier>,
}

impl PermissiveClientVerifier {
    pub fn new(inner: Arc<dyn ClientCertVerifier>) -> Self {
        Self { inner }
    }
}

impl ClientCertVerifier for PermissiveClientVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Computes the chain-trust verdict for a connection's peer certificates
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    inner: Arc<dyn ClientCertVerifier>,
}

impl ChainVerifier {
    pub fn new(inner: Arc<dyn ClientCertVerifier>) -> Self {
        Self { inner }
    }

    pub fn verdict(&self, chain: Option<&[CertificateDer<'_>]>) -> PeerCertificate {
        let Some((end_entity, intermediates)) = chain.and_then(|c| c.split_first()) else {
            return PeerCertificate::absent();
        };

        let der = end_entity.as_ref().to_vec();
        match self
            .inner
            .verify_client_cert(end_entity, intermediates, UnixTime::now())
        {
            Ok(_) => PeerCertificate::trusted(der),
            Err(e) => PeerCertificate::untrusted(der, e.to_string()),
        }
    }
}

// =============================================================================
// TLS setup
// =============================================================================

/// Server-side TLS material
#[derive(Debug, Clone)]
pub struct TlsSetup {
    pub server_config: Arc<ServerConfig>,
    pub chain_verifier: ChainVerifier,
}

impl TlsSetup {
    /// Load PEM files and build the server configuration
    pub fn from_paths(paths: &TlsPaths) -> Result<Self, TransportError> {
        Self::from_pem(
            &read_file(&paths.cert)?,
            &read_file(&paths.key)?,
            &read_file(&paths.client_ca)?,
        )
    }

    pub fn from_pem(
        cert_pem: &[u8],
        key_pem: &[u8],
        ca_pem: &[u8],
    ) -> Result<Self, TransportError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let ca_certs = parse_certificates(ca_pem)?;
        if ca_certs.is_empty() {
            return Err(TransportError::Certificate("no CA certificates found".into()));
        }
        let mut roots = RootCertStore::empty();
        for cert in ca_certs {
            roots.add(cert).map_err(|e| {
                TransportError::Certificate(format!("failed to add CA certificate: {e}"))
            })?;
        }

        let server_certs = parse_certificates(cert_pem)?;
        if server_certs.is_empty() {
            return Err(TransportError::Certificate("no server certificates found".into()));
        }
        let server_key = parse_private_key(key_pem)?;

        let strict = client_verifier(roots, provider.clone())?;
        let server_config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::TlsConfig(format!("protocol versions: {e}")))?
            .with_client_cert_verifier(Arc::new(PermissiveClientVerifier::new(strict.clone())))
            .with_single_cert(server_certs, server_key)
            .map_err(|e| TransportError::TlsConfig(format!("server config error: {e}")))?;

        Ok(Self {
            server_config: Arc::new(server_config),
            chain_verifier: ChainVerifier::new(strict),
        })
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.server_config.clone())
    }
}

fn client_verifier(
    roots: RootCertStore,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<dyn ClientCertVerifier>, TransportError> {
    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
        .build()
        .map_err(|e| TransportError::TlsConfig(format!("client verifier error: {e}")))
}

fn read_file(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parse PEM-encoded certificates.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Certificate(format!("failed to parse certificates: {e}")))
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TransportError> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| TransportError::PrivateKey(format!("failed to parse private key: {e}")))
}

// =============================================================================
// Accept loop
// =============================================================================

/// Accept TLS connections forever, serving `app` on each.
pub async fn serve(listener: TcpListener, tls: TlsSetup, app: Router) {
    let acceptor = tls.acceptor();

    loop {
        let (tcp, remote) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let verifier = tls.chain_verifier.clone();
        let app = app.clone();

        tokio::spawn(async move {
            let stream = match acceptor.accept(tcp).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(remote = %remote, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let peer = verifier.verdict(stream.get_ref().1.peer_certificates());
            debug!(
                remote = %remote,
                presented = peer.der.is_some(),
                chain_trusted = peer.chain_trusted,
                chain_error = ?peer.chain_error,
                "Accepted TLS connection"
            );

            let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(peer.clone());
                app.clone().call(request)
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(remote = %remote, error = %e, "Connection closed with error");
            }
        });
    }
}

/// Bind the listener and serve until the process exits.
pub async fn run(addr: &str, tls: TlsSetup, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Certgate listening (mutual TLS)");
    serve(listener, tls, app).await;
    Ok(())
}
