//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::{ElementId, ProductId};

/// Rejected parent assignment: the element would become its own ancestor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("element {0} cannot be its own parent")]
    SelfReference(ElementId),

    #[error("cycle detected in hierarchy: element {element} is an ancestor of {parent}")]
    Detected {
        element: ElementId,
        parent: ElementId,
    },
}

/// Domain errors represent business logic violations.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("network element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("no element with key '{0}' in this import")]
    DraftNotFound(String),

    #[error("product name already taken: {0}")]
    DuplicateProduct(String),

    #[error("duplicate key in import: {0}")]
    DuplicateDraftKey(String),

    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    #[error("corrupt network data: {0}")]
    CorruptNetwork(String),
}

impl DomainError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// True for missing elements, products and draft keys.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound(_) | Self::ProductNotFound(_) | Self::DraftNotFound(_)
        )
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle(_))
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
