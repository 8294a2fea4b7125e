//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use drain_router::infrastructure::tls::{load_certs, load_private_key, TlsFiles};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_rustls::TlsAcceptor;

/// CA plus server and client leaves, all valid for `localhost` and
/// `127.0.0.1` as well as the given name.
pub struct Pki {
    pub server: TlsFiles,
    pub client: TlsFiles,
    _dir: TempDir,
}

impl Pki {
    pub fn generate(name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "integration CA");
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();
        let ca_path = dir.path().join("ca.pem");
        std::fs::write(&ca_path, ca_cert.pem()).unwrap();

        let leaf = |label: &str| {
            let key = KeyPair::generate().unwrap();
            let mut params = CertificateParams::new(vec![
                name.to_string(),
                "localhost".to_string(),
                "127.0.0.1".to_string(),
            ])
            .unwrap();
            params.distinguished_name.push(DnType::CommonName, name);
            params.extended_key_usages = vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ];
            let cert = params.signed_by(&key, &ca_cert, &ca_key).unwrap();
            let cert_path = dir.path().join(format!("{}.crt", label));
            let key_path = dir.path().join(format!("{}.key", label));
            std::fs::write(&cert_path, cert.pem()).unwrap();
            std::fs::write(&key_path, key.serialize_pem()).unwrap();
            TlsFiles::new(cert_path, key_path, ca_path.clone())
        };

        let server = leaf("server");
        let client = leaf("client");
        Self {
            server,
            client,
            _dir: dir,
        }
    }

    /// Plain server-auth acceptor, as a syslog drain would run.
    pub fn drain_acceptor(&self) -> TlsAcceptor {
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            load_certs(&self.server.cert).unwrap(),
            load_private_key(&self.server.key).unwrap(),
        )
        .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }
}
