//! Shared fakes and fixtures for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use crate::domain::entities::{Binding, BindingSet, LogEnvelope, WriterState};
use crate::domain::errors::{AdapterError, FetchError, WriteError, WriterCreationError};
use crate::domain::ports::{AdapterClient, BindingReader, LogWriter, WriterFactory};
use crate::domain::value_objects::DrainUrl;
use crate::infrastructure::tls::TlsFiles;

pub fn binding(app: &str) -> Binding {
    Binding::new(
        app,
        format!("{}.host", app),
        format!("syslog-tls://{}.example.com:6514", app),
    )
}

pub fn set(apps: &[&str]) -> BindingSet {
    apps.iter().map(|a| binding(a)).collect()
}

// ===== TLS fixtures =====

/// A throwaway CA with one server leaf and one client leaf, written to a
/// temp directory as PEM.
pub struct TestPki {
    pub server: TlsFiles,
    pub client: TlsFiles,
    _dir: TempDir,
}

impl TestPki {
    /// `name` is added as a DNS SAN on both leaves, next to `localhost`
    /// and `127.0.0.1`.
    pub fn generate(name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "drain-router test CA");
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
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
}

// ===== Fake adapter =====

/// A mutating call as the adapter received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(Binding),
    Delete(Binding),
}

/// In-memory adapter with switchable failure modes.
pub struct FakeAdapter {
    addr: String,
    bindings: Mutex<HashSet<Binding>>,
    unreachable: AtomicBool,
    reject_creates: AtomicBool,
    log: Mutex<Vec<Call>>,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub lists: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            bindings: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
            reject_creates: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        })
    }

    pub fn with_bindings(addr: &str, bindings: &[Binding]) -> Arc<Self> {
        let adapter = Self::new(addr);
        adapter.bindings.lock().extend(bindings.iter().cloned());
        adapter
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    pub fn set_reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    pub fn holds(&self, binding: &Binding) -> bool {
        self.bindings.lock().contains(binding)
    }

    pub fn held(&self) -> BindingSet {
        self.bindings.lock().clone()
    }

    /// Every create and delete received, in order, including failed ones.
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    fn check_reachable(&self) -> Result<(), AdapterError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AdapterError::Transport {
                addr: self.addr.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AdapterClient for FakeAdapter {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn list(&self) -> Result<Vec<Binding>, AdapterError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let mut out: Vec<Binding> = self.bindings.lock().iter().cloned().collect();
        out.sort();
        Ok(out)
    }

    async fn create(&self, binding: &Binding) -> Result<(), AdapterError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(Call::Create(binding.clone()));
        self.check_reachable()?;
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(AdapterError::Rejected {
                addr: self.addr.clone(),
                reason: "invalid drain URL".to_string(),
            });
        }
        self.bindings.lock().insert(binding.clone());
        Ok(())
    }

    async fn delete(&self, binding: &Binding) -> Result<(), AdapterError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(Call::Delete(binding.clone()));
        self.check_reachable()?;
        self.bindings.lock().remove(binding);
        Ok(())
    }
}

// ===== Fake reader =====

/// Replays a queue of fetch results; repeats the last one once drained.
pub struct FakeReader {
    results: Mutex<VecDeque<Result<BindingSet, FetchError>>>,
    last: Mutex<Result<BindingSet, FetchError>>,
    last_count: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeReader {
    pub fn new(desired: BindingSet) -> Arc<Self> {
        Self::sequence(vec![Ok(desired)])
    }

    pub fn sequence(results: Vec<Result<BindingSet, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into_iter().collect()),
            last: Mutex::new(Ok(BindingSet::new())),
            last_count: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BindingReader for FakeReader {
    async fn fetch_all(&self) -> Result<BindingSet, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().pop_front();
        let result = match next {
            Some(r) => {
                *self.last.lock() = r.clone();
                r
            }
            None => self.last.lock().clone(),
        };
        if let Ok(set) = &result {
            self.last_count.store(set.len(), Ordering::SeqCst);
        }
        result
    }

    fn last_count(&self) -> usize {
        self.last_count.load(Ordering::SeqCst)
    }
}

// ===== Fake writers =====

/// Records frames instead of writing them anywhere.
#[derive(Default)]
pub struct RecordingWriter {
    pub written: Mutex<Vec<LogEnvelope>>,
    pub closes: AtomicUsize,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl LogWriter for RecordingWriter {
    async fn write(&self, envelope: &LogEnvelope) -> Result<(), WriteError> {
        if self.closes.load(Ordering::SeqCst) > 0 {
            return Err(WriteError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WriteError::Io {
                addr: "fake".to_string(),
                reason: "broken pipe".to_string(),
            });
        }
        self.written.lock().push(envelope.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn state(&self) -> WriterState {
        if self.closes.load(Ordering::SeqCst) > 0 {
            WriterState::Closed
        } else {
            WriterState::Open
        }
    }
}

/// Validates the drain URL like the real factory, then hands out
/// recording writers.
#[derive(Default)]
pub struct FakeWriterFactory {
    pub created: AtomicUsize,
    pub writers: Mutex<Vec<(Binding, Arc<RecordingWriter>)>>,
}

impl FakeWriterFactory {
    pub fn writer_for(&self, binding: &Binding) -> Option<Arc<RecordingWriter>> {
        self.writers
            .lock()
            .iter()
            .rev()
            .find(|(b, _)| b == binding)
            .map(|(_, w)| w.clone())
    }
}

impl WriterFactory for FakeWriterFactory {
    fn create(&self, binding: &Binding) -> Result<Arc<dyn LogWriter>, WriterCreationError> {
        DrainUrl::parse(&binding.drain)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        let writer = Arc::new(RecordingWriter::default());
        self.writers.lock().push((binding.clone(), writer.clone()));
        Ok(writer)
    }
}
