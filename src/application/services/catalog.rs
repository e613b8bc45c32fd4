//! Product catalogue service

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::application::services::{deserialize_some, load_network, save_network};
use crate::application::ApplicationResult;
use crate::domain::{DomainError, DomainResult, Network, Product, ProductId};
use crate::infrastructure::traits::NetworkStore;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
}

/// Partial update; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductPatch {
    pub name: Option<String>,
    #[serde(deserialize_with = "deserialize_some")]
    pub model: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some")]
    pub release_date: Option<Option<NaiveDate>>,
}

/// Service for the product catalogue.
pub struct ProductService {
    store: Arc<dyn NetworkStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self { store }
    }

    #[instrument(level = "debug", skip_all, fields(name = %new.name))]
    pub fn create_product(&self, new: NewProduct) -> ApplicationResult<Product> {
        let mut network = load_network(self.store.as_ref())?;
        let id = network.allocate_product_id();
        let product = Product {
            id,
            name: new.name,
            model: new.model,
            release_date: new.release_date,
        };
        check_product(&network, &product)?;

        network.put_product(product.clone());
        save_network(self.store.as_ref(), &network)?;
        info!(%id, "created product");
        Ok(product)
    }

    #[instrument(level = "debug", skip(self, patch))]
    pub fn update_product(&self, id: ProductId, patch: ProductPatch) -> ApplicationResult<Product> {
        let mut network = load_network(self.store.as_ref())?;
        let mut product = network.product(id)?.clone();
        if let Some(name) = patch.name {
            product.name = name;
        }
        if let Some(model) = patch.model {
            product.model = model;
        }
        if let Some(release_date) = patch.release_date {
            product.release_date = release_date;
        }
        check_product(&network, &product)?;

        network.put_product(product.clone());
        save_network(self.store.as_ref(), &network)?;
        info!(%id, "updated product");
        Ok(product)
    }

    /// Delete a product and detach it from every element.
    ///
    /// Returns how many elements carried it.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_product(&self, id: ProductId) -> ApplicationResult<usize> {
        let mut network = load_network(self.store.as_ref())?;
        let (product, detached) = network.remove_product(id)?;
        save_network(self.store.as_ref(), &network)?;
        info!(%id, name = %product.name, detached, "deleted product");
        Ok(detached)
    }

    pub fn get_product(&self, id: ProductId) -> ApplicationResult<Product> {
        let network = load_network(self.store.as_ref())?;
        Ok(network.product(id)?.clone())
    }

    pub fn list_products(&self) -> ApplicationResult<Vec<Product>> {
        let network = load_network(self.store.as_ref())?;
        Ok(network.products().cloned().collect())
    }
}

/// Name rules plus uniqueness against every other product.
fn check_product(network: &Network, product: &Product) -> DomainResult<()> {
    product.validate()?;
    match network.product_named(&product.name) {
        Some(other) if other.id != product.id => {
            Err(DomainError::DuplicateProduct(product.name.clone()))
        }
        _ => Ok(()),
    }
}
