//! Two-phase readiness waiting for slow servers.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::notebook::Notebook;
use helpers::scripted_server::{Handshake, scripted_manager, server};
use polylsp::document::DocumentInfo;
use polylsp::extractor::defaults::default_registry;
use polylsp::{AdapterState, BridgeError, WidgetAdapter};
use tokio::time::Instant;

fn python_document() -> DocumentInfo {
    DocumentInfo {
        uri: "a.ipynb".to_string(),
        language: "python".to_string(),
        id_path: "python".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn server_ready_within_the_first_window_is_used_immediately() {
    let (manager, servers) = scripted_manager(&[("pylsp", server(&["python"], None))]);
    servers.set_handshake("pylsp", Handshake::After(Duration::from_secs(10)));
    let started = Instant::now();

    let connection = manager.connect(&python_document()).await.unwrap();

    assert!(connection.is_ready());
    assert!(started.elapsed() < Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn server_ready_in_the_second_window_is_still_used() {
    let (manager, servers) = scripted_manager(&[("pylsp", server(&["python"], None))]);
    servers.set_handshake("pylsp", Handshake::After(Duration::from_secs(40)));
    let started = Instant::now();

    let connection = manager.connect(&python_document()).await.unwrap();

    assert!(connection.is_ready());
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(40), "waited {waited:?}");
    assert!(waited < Duration::from_secs(42), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn server_never_ready_times_out_after_both_windows() {
    let (manager, servers) = scripted_manager(&[("pylsp", server(&["python"], None))]);
    servers.set_handshake("pylsp", Handshake::Never);
    let started = Instant::now();

    let result = manager.connect(&python_document()).await;

    assert!(matches!(result, Err(BridgeError::Timeout { .. })));
    assert!(started.elapsed() >= Duration::from_secs(30 + 5 * 60));
    assert!(manager.registry().is_empty());
    assert!(manager.registered_documents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timed_out_adapter_connects_on_the_next_update() {
    let (manager, servers) = scripted_manager(&[("pylsp", server(&["python"], None))]);
    servers.set_handshake("pylsp", Handshake::Never);
    let notebook = Notebook::new("a.ipynb", &[("cell-1", "x = 1")]);
    let adapter = WidgetAdapter::attach(notebook, Arc::clone(&manager), Arc::new(default_registry()));

    let mut adapter = adapter.lock().await;
    assert_eq!(adapter.update_documents().await, AdapterState::Connecting);
    assert_eq!(adapter.settled().await, AdapterState::VirtualDocumentBuilt);

    servers.set_handshake("pylsp", Handshake::After(Duration::ZERO));
    assert_eq!(adapter.update_documents().await, AdapterState::Connecting);
    assert_eq!(adapter.settled().await, AdapterState::Connected);
    assert_eq!(manager.transport().connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn disposing_the_manager_stops_waiting() {
    let (manager, servers) = scripted_manager(&[("pylsp", server(&["python"], None))]);
    servers.set_handshake("pylsp", Handshake::Never);
    let started = Instant::now();

    let pending = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.connect(&python_document()).await })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    manager.dispose().await;

    assert!(pending.await.unwrap().is_err());
    assert!(started.elapsed() < Duration::from_secs(30));
}
