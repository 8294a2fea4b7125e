//! TLS Configuration
//!
//! Builds rustls configs from PEM material on disk:
//! - mutually authenticated server and client configs for the control surface
//! - a client config for drain egress, trusting the system roots
//!
//! Every config is built with an explicit ring provider so no process-wide
//! default is installed.

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("invalid TLS configuration: {0}")]
    Config(String),
}

impl From<rustls::Error> for TlsError {
    fn from(e: rustls::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Certificate, key and CA bundle for one side of a mutual TLS link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl TlsFiles {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>, ca: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca: ca.into(),
        }
    }

    /// Server side: present our cert and require a client cert signed by `ca`.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let certs = load_certs(&self.cert)?;
        let key = load_private_key(&self.key)?;
        let roots = load_roots(&self.ca)?;

        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
            .build()
            .map_err(|e| TlsError::Config(e.to_string()))?;

        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?;

        Ok(Arc::new(config))
    }

    /// Client side: present our cert and verify the server against `ca`.
    pub fn client_config(&self, skip_verify: bool) -> Result<Arc<ClientConfig>, TlsError> {
        let certs = load_certs(&self.cert)?;
        let key = load_private_key(&self.key)?;
        let roots = load_roots(&self.ca)?;

        let config = client_builder(roots, skip_verify)?.with_client_auth_cert(certs, key)?;
        Ok(Arc::new(config))
    }
}

/// Client config for drain egress.
///
/// Trusts the platform roots plus an optional extra CA bundle.
pub fn egress_client_config(
    extra_ca: Option<&Path>,
    skip_verify: bool,
) -> Result<Arc<ClientConfig>, TlsError> {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::debug!("skipping unreadable system certificate: {}", e);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "loaded system root certificates");

    if let Some(path) = extra_ca {
        for cert in load_certs(path)? {
            roots.add(cert)?;
        }
    }

    let config = client_builder(roots, skip_verify)?.with_no_client_auth();
    Ok(Arc::new(config))
}

fn client_builder(
    roots: RootCertStore,
    skip_verify: bool,
) -> Result<rustls::ConfigBuilder<ClientConfig, rustls::client::WantsClientCert>, TlsError> {
    let builder = ClientConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;

    if skip_verify {
        tracing::warn!("TLS certificate verification disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoCertificateVerification::new(
                rustls::crypto::ring::default_provider(),
            ))));
    }

    if roots.is_empty() {
        return Err(TlsError::Config("no trusted root certificates".to_string()));
    }

    let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider())
        .build()
        .map_err(|e| TlsError::Config(e.to_string()))?;
    Ok(builder.with_webpki_verifier(verifier))
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> TlsError {
    TlsError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Load every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| read_error(path, e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| read_error(path, e))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| read_error(path, e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| read_error(path, e))?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

pub fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::DigitallySignedStruct;

    /// Accepts any server certificate. Signatures are still checked.
    #[derive(Debug)]
    pub struct NoCertificateVerification(rustls::crypto::CryptoProvider);

    impl NoCertificateVerification {
        pub fn new(provider: rustls::crypto::CryptoProvider) -> Self {
            Self(provider)
        }
    }

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestPki;
    use rustls::pki_types::ServerName;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::{TlsAcceptor, TlsConnector};

    #[test]
    fn test_load_certs_and_key() {
        let pki = TestPki::generate("adapter");

        assert_eq!(load_certs(&pki.server.cert).unwrap().len(), 1);
        assert!(load_private_key(&pki.server.key).is_ok());
        assert!(!load_roots(&pki.server.ca).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_certs(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
    }

    #[test]
    fn test_load_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(load_certs(&path), Err(TlsError::NoCertificates(_))));
        assert!(matches!(load_private_key(&path), Err(TlsError::NoPrivateKey(_))));
    }

    #[test]
    fn test_key_file_is_not_a_cert() {
        let pki = TestPki::generate("adapter");
        assert!(matches!(
            load_certs(&pki.server.key),
            Err(TlsError::NoCertificates(_))
        ));
    }

    #[test]
    fn test_build_configs() {
        let pki = TestPki::generate("adapter");

        assert!(pki.server.server_config().is_ok());
        assert!(pki.client.client_config(false).is_ok());
        assert!(pki.client.client_config(true).is_ok());
        assert!(egress_client_config(Some(&pki.server.ca), false).is_ok());
    }

    #[tokio::test]
    async fn test_mutual_tls_handshake() {
        let pki = TestPki::generate("adapter");
        let acceptor = TlsAcceptor::from(pki.server.server_config().unwrap());
        let connector = TlsConnector::from(pki.client.client_config(false).unwrap());

        let (client_io, server_io) = tokio::io::duplex(16 * 1024);

        let server = tokio::spawn(async move {
            let mut stream = acceptor.accept(server_io).await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let name = ServerName::try_from("adapter").unwrap();
        let mut stream = connector.connect(name, client_io).await.unwrap();
        stream.write_all(b"ping").await.unwrap();
        stream.flush().await.unwrap();

        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_server_rejects_client_without_cert() {
        let pki = TestPki::generate("adapter");
        let acceptor = TlsAcceptor::from(pki.server.server_config().unwrap());
        let connector = TlsConnector::from(egress_client_config(Some(&pki.server.ca), false).unwrap());

        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let server = tokio::spawn(async move { acceptor.accept(server_io).await.is_ok() });

        let name = ServerName::try_from("adapter").unwrap();
        // TLS 1.3 clients only learn of the rejection on first read
        if let Ok(mut stream) = connector.connect(name, client_io).await {
            let _ = stream.write_all(b"ping").await;
            let _ = stream.flush().await;
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf).await;
        }

        assert!(!server.await.unwrap());
    }
}
