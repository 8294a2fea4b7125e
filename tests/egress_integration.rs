//! Adapter egress: a binding created over the control plane delivers
//! framed syslog to a TLS drain.

mod common;

use common::Pki;
use drain_router::adapters::inbound::dispatch;
use drain_router::adapters::outbound::{DashMapBindingStore, TlsWriterFactory};
use drain_router::domain::entities::WriterState;
use drain_router::domain::ports::LogSink;
use drain_router::infrastructure::tls::egress_client_config;
use drain_router::infrastructure::{ControlRequest, ControlResponse};
use drain_router::{Binding, LogEnvelope, MessageType};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

fn store(pki: &Pki) -> Arc<DashMapBindingStore> {
    let config = egress_client_config(Some(&pki.server.ca), false).unwrap();
    let factory = Arc::new(TlsWriterFactory::new(
        config,
        Duration::from_secs(2),
        Duration::from_secs(2),
    ));
    Arc::new(DashMapBindingStore::new(factory))
}

#[tokio::test]
async fn test_created_binding_delivers_frames() {
    let pki = Pki::generate("localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = pki.drain_acceptor();

    let drain = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut tls = acceptor.accept(tcp).await.unwrap();
        let mut received = Vec::new();
        tls.read_to_end(&mut received).await.unwrap();
        received
    });

    let store = store(&pki);
    let binding = Binding::new(
        "test-app-id",
        "test-hostname",
        format!("syslog-tls://localhost:{}", port),
    );
    let resp = dispatch(store.as_ref(), ControlRequest::CreateBinding(binding.clone())).await;
    assert_eq!(resp, ControlResponse::Ack);

    let out = LogEnvelope::new("test-app-id", "APP", "2", 12345678, MessageType::Out, "just a test");
    let err = LogEnvelope::new("test-app-id", "RTR", "0", 12345678, MessageType::Err, "oops");
    let other = LogEnvelope::new("other-app", "APP", "0", 1, MessageType::Out, "not ours");

    assert_eq!(store.dispatch(&out).await, 1);
    assert_eq!(store.dispatch(&err).await, 1);
    assert_eq!(store.dispatch(&other).await, 0);
    assert_eq!(store.states(), vec![(binding.clone(), WriterState::Open)]);

    // Deleting closes the writer, which ends the drain's stream
    let resp = dispatch(store.as_ref(), ControlRequest::DeleteBinding(binding)).await;
    assert_eq!(resp, ControlResponse::Ack);

    let received = tokio::time::timeout(Duration::from_secs(2), drain)
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8(received).unwrap();

    assert_eq!(
        text,
        "87 <14>1 1970-01-01T00:00:00.012345678Z test-hostname test-app-id [APP/2] - - just a test\n\
         80 <11>1 1970-01-01T00:00:00.012345678Z test-hostname test-app-id [RTR/0] - - oops\n"
    );
}

#[tokio::test]
async fn test_unreachable_drain_drops_frames_without_failing_others() {
    let pki = Pki::generate("localhost");
    let store = store(&pki);

    // Bound then dropped, so nothing listens here
    let dead_port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let dead = Binding::new("app", "host", format!("syslog-tls://localhost:{}", dead_port));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_port = listener.local_addr().unwrap().port();
    let live = Binding::new("app", "host", format!("syslog-tls://localhost:{}", live_port));
    let acceptor = pki.drain_acceptor();
    let drain = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut tls = acceptor.accept(tcp).await.unwrap();
        let mut buf = vec![0u8; 256];
        let n = tls.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    });

    dispatch(store.as_ref(), ControlRequest::CreateBinding(dead.clone())).await;
    dispatch(store.as_ref(), ControlRequest::CreateBinding(live)).await;

    let envelope = LogEnvelope::new("app", "APP", "0", 0, MessageType::Out, "hello");
    assert_eq!(store.dispatch(&envelope).await, 1);

    let received = tokio::time::timeout(Duration::from_secs(2), drain)
        .await
        .unwrap()
        .unwrap();
    assert!(String::from_utf8(received).unwrap().ends_with("[APP/0] - - hello\n"));

    let states = store.states();
    let dead_state = states.iter().find(|(b, _)| *b == dead).map(|(_, s)| *s);
    assert_eq!(dead_state, Some(WriterState::Errored));
    store.close_all().await;
}
