//! Application services

pub mod catalog;
pub mod network;

pub use catalog::{NewProduct, ProductPatch, ProductService};
pub use network::{
    ElementDraft, ElementFilter, ElementPatch, LevelReport, NetworkService, NewElement, ParentRef,
};

use std::io;

use serde::{Deserialize, Deserializer};
use tracing::trace;

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::{DomainError, Network};
use crate::infrastructure::traits::NetworkStore;

/// Load the current network, or an empty one if nothing is stored yet.
///
/// Unparseable store content is a corrupt network, not an I/O failure.
pub(crate) fn load_network(store: &dyn NetworkStore) -> ApplicationResult<Network> {
    let snapshot = match store.load() {
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(
                DomainError::CorruptNetwork(format!("{}: {e}", store.location())).into(),
            );
        }
        other => other.with_context("load network", store.location())?,
    };
    match snapshot {
        Some(snapshot) => Ok(Network::from_snapshot(snapshot)?),
        None => {
            trace!(location = %store.location(), "no stored network, starting empty");
            Ok(Network::new())
        }
    }
}

pub(crate) fn save_network(store: &dyn NetworkStore, network: &Network) -> ApplicationResult<()> {
    store
        .save(&network.to_snapshot())
        .with_context("save network", store.location())
}

/// Distinguishes an explicit `null` from an absent field in PATCH bodies.
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
