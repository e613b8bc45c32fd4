//! Network aggregate: element arena, product catalogue, id allocation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::NetworkArena;
use crate::domain::entities::{ElementId, NetworkElement, Product, ProductId};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::hierarchy::expected_level;

/// Persisted form of a [`Network`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSnapshot {
    pub next_element_id: u64,
    pub next_product_id: u64,
    pub elements: Vec<NetworkElement>,
    pub products: Vec<Product>,
}

/// An element whose stored level disagrees with its ancestor count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDrift {
    pub id: ElementId,
    pub stored: u32,
    pub expected: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Network {
    elements: NetworkArena,
    products: BTreeMap<ProductId, Product>,
    next_element_id: u64,
    next_product_id: u64,
}

impl Network {
    pub fn new() -> Self {
        Self {
            next_element_id: 1,
            next_product_id: 1,
            ..Default::default()
        }
    }

    /// Rebuild from a snapshot, rejecting broken forests and dangling refs.
    ///
    /// Stored levels are taken as-is; see [`Network::level_drift`].
    #[instrument(level = "debug", skip_all, fields(elements = snapshot.elements.len(), products = snapshot.products.len()))]
    pub fn from_snapshot(snapshot: NetworkSnapshot) -> DomainResult<Self> {
        let mut network = Self::new();

        for product in snapshot.products {
            if network.products.insert(product.id, product).is_some() {
                return Err(DomainError::CorruptNetwork(
                    "duplicate product id".to_string(),
                ));
            }
        }

        for element in snapshot.elements {
            if network.elements.contains(element.id) {
                return Err(DomainError::CorruptNetwork(format!(
                    "duplicate element id {}",
                    element.id
                )));
            }
            network.elements.insert(element);
        }

        for element in network.elements.iter() {
            if let Some(parent) = element.parent {
                if !network.elements.contains(parent) {
                    return Err(DomainError::CorruptNetwork(format!(
                        "element {} points to missing parent {parent}",
                        element.id
                    )));
                }
            }
            if let Some(missing) = element
                .products
                .iter()
                .find(|p| !network.products.contains_key(p))
            {
                return Err(DomainError::CorruptNetwork(format!(
                    "element {} references missing product {missing}",
                    element.id
                )));
            }
            // ancestor count fails on loops
            expected_level(&network.elements, element.id)?;
        }

        let max_element = network.elements.iter().map(|e| e.id.0).max().unwrap_or(0);
        let max_product = network.products.keys().map(|p| p.0).max().unwrap_or(0);
        network.next_element_id = snapshot.next_element_id.max(max_element + 1);
        network.next_product_id = snapshot.next_product_id.max(max_product + 1);

        debug!(next_element_id = network.next_element_id, "network loaded");
        Ok(network)
    }

    pub fn to_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            next_element_id: self.next_element_id,
            next_product_id: self.next_product_id,
            elements: self.elements.iter().cloned().collect(),
            products: self.products.values().cloned().collect(),
        }
    }

    pub fn elements(&self) -> &NetworkArena {
        &self.elements
    }

    pub(crate) fn elements_mut(&mut self) -> &mut NetworkArena {
        &mut self.elements
    }

    pub fn element(&self, id: ElementId) -> DomainResult<&NetworkElement> {
        self.elements.get(id).ok_or(DomainError::ElementNotFound(id))
    }

    pub fn allocate_element_id(&mut self) -> ElementId {
        let id = ElementId(self.next_element_id);
        self.next_element_id += 1;
        id
    }

    pub fn allocate_product_id(&mut self) -> ProductId {
        let id = ProductId(self.next_product_id);
        self.next_product_id += 1;
        id
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn product(&self, id: ProductId) -> DomainResult<&Product> {
        self.products.get(&id).ok_or(DomainError::ProductNotFound(id))
    }

    pub fn has_product(&self, id: ProductId) -> bool {
        self.products.contains_key(&id)
    }

    /// The product named `name`, compared case-sensitively.
    pub fn product_named(&self, name: &str) -> Option<&Product> {
        self.products.values().find(|p| p.name == name)
    }

    pub(crate) fn put_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    /// Drop a product from the catalogue and from every element's set.
    ///
    /// Returns the number of elements that referenced it.
    pub(crate) fn remove_product(&mut self, id: ProductId) -> DomainResult<(Product, usize)> {
        let product = self
            .products
            .remove(&id)
            .ok_or(DomainError::ProductNotFound(id))?;
        let holders: Vec<ElementId> = self
            .elements
            .iter()
            .filter(|e| e.products.contains(&id))
            .map(|e| e.id)
            .collect();
        for holder in &holders {
            if let Some(element) = self.elements.get_mut(*holder) {
                element.products.remove(&id);
            }
        }
        Ok((product, holders.len()))
    }

    /// Elements whose stored level differs from their ancestor count.
    pub fn level_drift(&self) -> DomainResult<Vec<LevelDrift>> {
        let mut drift = Vec::new();
        for element in self.elements.iter() {
            let expected = expected_level(&self.elements, element.id)?;
            if expected != element.network_lvl {
                drift.push(LevelDrift {
                    id: element.id,
                    stored: element.network_lvl,
                    expected,
                });
            }
        }
        Ok(drift)
    }

    /// Rewrite every level from the roots down. Returns how many changed.
    #[instrument(level = "debug", skip(self))]
    pub fn relevel_all(&mut self) -> DomainResult<usize> {
        let roots: Vec<ElementId> = self.elements.roots().map(|e| e.id).collect();
        let mut changed = 0;
        for root in roots {
            if let Some(element) = self.elements.get_mut(root) {
                if element.network_lvl != 0 {
                    warn!(id = %root, stored = element.network_lvl, "root with non-zero level");
                    element.network_lvl = 0;
                    changed += 1;
                }
            }
            changed += self.elements.relevel_subtree(root)?;
        }
        Ok(changed)
    }
}
