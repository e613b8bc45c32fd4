//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{NetworkService, ProductService};
use crate::config::Settings;
use crate::infrastructure::store::JsonFileStore;
use crate::infrastructure::traits::{FileSystem, NetworkStore, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Where the network lives
    pub store: Arc<dyn NetworkStore>,
}

impl ServiceContainer {
    /// Create a new service container backed by the configured data file.
    pub fn new(settings: Settings) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let store = Arc::new(JsonFileStore::new(fs.clone(), settings.data_file.clone()));
        Self::with_deps(settings, fs, store)
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        store: Arc<dyn NetworkStore>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            fs,
            store,
        }
    }

    pub fn network_service(&self) -> NetworkService {
        NetworkService::new(self.store.clone(), self.settings.hierarchy.level_policy)
    }

    pub fn product_service(&self) -> ProductService {
        ProductService::new(self.store.clone())
    }
}
