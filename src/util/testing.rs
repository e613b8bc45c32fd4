//! Test support: one-time tracing setup and store fixtures.

use std::env;
use std::sync::{Arc, Once};

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::Settings;
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::traits::RealFileSystem;
use crate::infrastructure::MemoryStore;

static TEST_SETUP: Once = Once::new();

/// Install a global subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `debug` for this crate.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("salesnet=debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else if let Err(e) = subscriber.try_init() {
        eprintln!("Error: Failed to set up logging: {}", e);
    }
    debug!(rust_log = ?env::var("RUST_LOG").ok(), "test logging ready");
}

/// Container over an empty in-memory store, plus the store for inspection.
pub fn memory_container(settings: Settings) -> (ServiceContainer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let container = ServiceContainer::with_deps(settings, Arc::new(RealFileSystem), store.clone());
    (container, store)
}
