//! Network element service
//!
//! Record management for elements. Every write runs the hierarchy gate
//! before anything is saved.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use itertools::Itertools;
use serde::Deserialize;
use termtree::Tree;
use tracing::{debug, info, instrument};

use crate::application::services::{deserialize_some, load_network, save_network};
use crate::application::ApplicationResult;
use crate::domain::{
    validate_and_level, Contact, DomainError, DomainResult, ElementId, LevelDrift, LevelPolicy,
    Money, Network, NetworkElement, PendingLinks, ProductId,
};
use crate::infrastructure::traits::NetworkStore;

/// Fields for a new element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewElement {
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(default)]
    pub parent: Option<ElementId>,
    #[serde(default)]
    pub products: BTreeSet<ProductId>,
    /// Opening balance; zero when absent.
    #[serde(default)]
    pub debt_to_parent: Option<Money>,
    /// Accepted and ignored: the level is always derived.
    #[serde(default)]
    pub network_lvl: Option<u32>,
}

/// Partial update. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub building: Option<String>,
    /// `Some(None)` detaches the element and makes it a root.
    #[serde(deserialize_with = "deserialize_some")]
    pub parent: Option<Option<ElementId>>,
    pub products: Option<BTreeSet<ProductId>>,
    /// Read-only through updates; dropped.
    pub debt_to_parent: Option<Money>,
    /// Derived; dropped.
    pub network_lvl: Option<u32>,
}

impl ElementPatch {
    /// Names of read-only fields the caller tried to set.
    pub fn ignored_fields(&self) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if self.debt_to_parent.is_some() {
            ignored.push("debt_to_parent");
        }
        if self.network_lvl.is_some() {
            ignored.push("network_lvl");
        }
        ignored
    }

    fn apply_contact(&mut self, contact: &mut Contact) {
        let fields = [
            (&mut contact.name, self.name.take()),
            (&mut contact.email, self.email.take()),
            (&mut contact.country, self.country.take()),
            (&mut contact.city, self.city.take()),
            (&mut contact.street, self.street.take()),
            (&mut contact.building, self.building.take()),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

/// Parent of an imported element: committed id or key of another draft.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    Existing(ElementId),
    Draft(String),
}

/// One element of a batch import.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementDraft {
    /// Batch-local name other drafts use to point at this one.
    pub key: String,
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(default)]
    pub parent: Option<ParentRef>,
    #[serde(default)]
    pub products: BTreeSet<ProductId>,
    #[serde(default)]
    pub debt_to_parent: Option<Money>,
}

#[derive(Debug, Clone, Default)]
pub struct ElementFilter {
    /// Exact country match.
    pub country: Option<String>,
}

/// Result of a level audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelReport {
    pub checked: usize,
    pub drift: Vec<LevelDrift>,
    pub fixed: usize,
}

/// Service for network elements.
pub struct NetworkService {
    store: Arc<dyn NetworkStore>,
    policy: LevelPolicy,
}

impl NetworkService {
    pub fn new(store: Arc<dyn NetworkStore>, policy: LevelPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> LevelPolicy {
        self.policy
    }

    /// Create an element under `new.parent` (or as a root).
    #[instrument(level = "debug", skip_all, fields(name = %new.contact.name, parent = ?new.parent))]
    pub fn create_element(&self, new: NewElement) -> ApplicationResult<NetworkElement> {
        let mut network = load_network(self.store.as_ref())?;

        if new.network_lvl.is_some() {
            debug!("ignoring supplied network_lvl");
        }
        new.contact.validate()?;
        check_products(&network, &new.products)?;
        let debt = opening_debt(new.debt_to_parent)?;

        let id = network.allocate_element_id();
        let mut element = NetworkElement::new(id, new.contact, new.parent);
        element.products = new.products;
        element.debt_to_parent = debt;
        validate_and_level(network.elements(), &mut element)?;

        network.elements_mut().insert(element.clone());
        save_network(self.store.as_ref(), &network)?;
        info!(id = %element.id, level = element.network_lvl, "created network element");
        Ok(element)
    }

    /// Apply `patch` to element `id`. Always re-validates the parent link.
    ///
    /// `debt_to_parent` and `network_lvl` in the patch are dropped; the
    /// returned element carries the stored values.
    #[instrument(level = "debug", skip(self, patch))]
    pub fn update_element(
        &self,
        id: ElementId,
        mut patch: ElementPatch,
    ) -> ApplicationResult<NetworkElement> {
        let mut network = load_network(self.store.as_ref())?;
        let mut element = network.element(id)?.clone();
        let old_parent = element.parent;
        let old_level = element.network_lvl;

        let ignored = patch.ignored_fields();
        if !ignored.is_empty() {
            debug!(?ignored, "dropping read-only fields");
        }

        patch.apply_contact(&mut element.contact);
        element.contact.validate()?;
        if let Some(products) = patch.products.take() {
            check_products(&network, &products)?;
            element.products = products;
        }
        if let Some(parent) = patch.parent {
            element.parent = parent;
        }
        validate_and_level(network.elements(), &mut element)?;

        let moved = element.parent != old_parent || element.network_lvl != old_level;
        let arena = network.elements_mut();
        arena.reparent(id, element.parent);
        let slot = arena.get_mut(id).ok_or(DomainError::ElementNotFound(id))?;
        *slot = element.clone();

        if moved {
            match self.policy {
                LevelPolicy::Cascade => {
                    let changed = arena.relevel_subtree(id)?;
                    debug!(changed, "relevelled descendants");
                }
                LevelPolicy::Drift => {
                    debug!("descendant levels left as stored");
                }
            }
        }

        save_network(self.store.as_ref(), &network)?;
        info!(%id, level = element.network_lvl, "updated network element");
        Ok(element)
    }

    /// Delete `id` and everything below it. Returns the removed ids.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_element(&self, id: ElementId) -> ApplicationResult<Vec<ElementId>> {
        let mut network = load_network(self.store.as_ref())?;
        network.element(id)?;
        let removed: Vec<ElementId> = network
            .elements_mut()
            .remove_subtree(id)
            .into_iter()
            .map(|e| e.id)
            .collect();
        save_network(self.store.as_ref(), &network)?;
        info!(%id, count = removed.len(), "deleted network element with subtree");
        Ok(removed)
    }

    pub fn get_element(&self, id: ElementId) -> ApplicationResult<NetworkElement> {
        let network = load_network(self.store.as_ref())?;
        Ok(network.element(id)?.clone())
    }

    /// Elements ordered by city, then id.
    pub fn list_elements(&self, filter: &ElementFilter) -> ApplicationResult<Vec<NetworkElement>> {
        let network = load_network(self.store.as_ref())?;
        let elements = network
            .elements()
            .iter()
            .filter(|e| {
                filter
                    .country
                    .as_ref()
                    .map_or(true, |country| &e.contact.country == country)
            })
            .sorted_by(|a, b| {
                a.contact
                    .city
                    .cmp(&b.contact.city)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned()
            .collect();
        Ok(elements)
    }

    /// Reset `debt_to_parent` to zero for every listed element that exists.
    ///
    /// Administrative path; bypasses the read-only rule of updates.
    /// Returns the number of elements updated.
    #[instrument(level = "debug", skip(self))]
    pub fn bulk_clear_debt(&self, ids: &BTreeSet<ElementId>) -> ApplicationResult<usize> {
        let mut network = load_network(self.store.as_ref())?;
        let arena = network.elements_mut();
        let mut count = 0;
        for id in ids {
            match arena.get_mut(*id) {
                Some(element) => {
                    element.debt_to_parent = Money::ZERO;
                    count += 1;
                }
                None => debug!(%id, "skipping unknown element"),
            }
        }
        save_network(self.store.as_ref(), &network)?;
        info!(count, "cleared debt");
        Ok(count)
    }

    /// Create a batch of elements that may point at each other.
    ///
    /// Drafts can reference parents by id or by the key of another draft in
    /// the same batch, in any order. Either every draft is created or none.
    #[instrument(level = "debug", skip_all, fields(drafts = drafts.len()))]
    pub fn import_elements(
        &self,
        drafts: Vec<ElementDraft>,
    ) -> ApplicationResult<Vec<NetworkElement>> {
        let mut network = load_network(self.store.as_ref())?;

        let mut keys: BTreeMap<String, ElementId> = BTreeMap::new();
        for draft in &drafts {
            let id = network.allocate_element_id();
            if keys.insert(draft.key.clone(), id).is_some() {
                return Err(DomainError::DuplicateDraftKey(draft.key.clone()).into());
            }
        }

        let mut staged = Vec::with_capacity(drafts.len());
        for draft in drafts {
            draft.contact.validate()?;
            check_products(&network, &draft.products)?;
            let parent = match draft.parent {
                None => None,
                Some(ParentRef::Existing(id)) => Some(id),
                Some(ParentRef::Draft(key)) => {
                    Some(*keys.get(&key).ok_or(DomainError::DraftNotFound(key))?)
                }
            };
            let mut element = NetworkElement::new(keys[&draft.key], draft.contact, parent);
            element.products = draft.products;
            element.debt_to_parent = opening_debt(draft.debt_to_parent)?;
            staged.push(element);
        }

        {
            let mut overlay = PendingLinks::new(network.elements());
            for element in &staged {
                overlay.stage(element.id, element.parent);
            }
            for element in staged.iter_mut() {
                validate_and_level(&overlay, element)?;
            }
        }

        for element in &staged {
            network.elements_mut().insert(element.clone());
        }
        save_network(self.store.as_ref(), &network)?;
        info!(count = staged.len(), "imported network elements");
        Ok(staged)
    }

    /// One display tree per root element.
    pub fn tree(&self) -> ApplicationResult<Vec<Tree<String>>> {
        let network = load_network(self.store.as_ref())?;
        Ok(network.elements().to_trees())
    }

    /// Compare stored levels with ancestor counts; rewrite them if `fix`.
    #[instrument(level = "debug", skip(self))]
    pub fn check(&self, fix: bool) -> ApplicationResult<LevelReport> {
        let mut network = load_network(self.store.as_ref())?;
        let drift = network.level_drift()?;
        let mut report = LevelReport {
            checked: network.elements().len(),
            drift,
            fixed: 0,
        };
        if fix && !report.drift.is_empty() {
            report.fixed = network.relevel_all()?;
            save_network(self.store.as_ref(), &network)?;
            info!(fixed = report.fixed, "repaired network levels");
        }
        Ok(report)
    }
}

fn check_products(network: &Network, products: &BTreeSet<ProductId>) -> DomainResult<()> {
    match products.iter().find(|p| !network.has_product(**p)) {
        Some(missing) => Err(DomainError::ProductNotFound(*missing)),
        None => Ok(()),
    }
}

fn opening_debt(debt: Option<Money>) -> DomainResult<Money> {
    let debt = debt.unwrap_or_default();
    if debt.is_negative() {
        return Err(DomainError::invalid(
            "debt_to_parent",
            format!("must not be negative, got {debt}"),
        ));
    }
    Ok(debt)
}
