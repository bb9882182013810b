//! Service-level error taxonomy.
//!
//! Every storefront operation returns [`ShopError`]. Domain and storage errors
//! are folded into it here so handlers map one enum to responses.

use serde_json::json;
use thiserror::Error;

use storefront_core::{DomainError, ProductId, WarehouseId};
use storefront_inventory::StockShortfall;

use crate::store::StoreError;

pub type ShopResult<T> = Result<T, ShopError>;

#[derive(Debug, Error)]
pub enum ShopError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// The resource belongs to another user.
    #[error("{0}")]
    Ownership(String),

    #[error("{0}")]
    InsufficientStock(StockShortfall),

    /// No warehouse holds enough units to open a cart line.
    #[error("insufficient stock for \"{product_name}\" in all warehouses")]
    OutOfStock {
        product_id: ProductId,
        product_name: String,
        requested: i64,
    },

    #[error("\"{product_name}\" is already in your cart")]
    DuplicateItem {
        product_id: ProductId,
        product_name: String,
        warehouse_id: WarehouseId,
    },

    #[error("{0}")]
    InvalidQuantity(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} cannot move from {from} to {to}")]
    IllegalStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Lock contention or timeout. Safe to retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShopError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ShopError::Conflict(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ShopError::Validation(_) => "validation_error",
            ShopError::Ownership(_) => "ownership_error",
            ShopError::InsufficientStock(_) => "insufficient_stock",
            ShopError::OutOfStock { .. } => "out_of_stock",
            ShopError::DuplicateItem { .. } => "duplicate_item",
            ShopError::InvalidQuantity(_) => "invalid_quantity",
            ShopError::NotFound { .. } => "not_found",
            ShopError::IllegalStateTransition { .. } => "illegal_state_transition",
            ShopError::Conflict(_) => "conflict",
            ShopError::Forbidden(_) => "forbidden",
            ShopError::Internal(_) => "internal_error",
        }
    }

    /// Structured context a client can act on, when there is any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ShopError::InsufficientStock(s) => Some(json!({
                "product_id": s.product_id,
                "product_name": s.product_name,
                "warehouse_id": s.warehouse_id,
                "available": s.available,
                "requested": s.requested,
            })),
            ShopError::OutOfStock {
                product_id,
                product_name,
                requested,
            } => Some(json!({
                "product_id": product_id,
                "product_name": product_name,
                "requested": requested,
            })),
            ShopError::DuplicateItem {
                product_id,
                warehouse_id,
                ..
            } => Some(json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
            })),
            ShopError::IllegalStateTransition { entity, from, to } => Some(json!({
                "entity": entity,
                "from": from,
                "to": to,
            })),
            _ => None,
        }
    }
}

impl From<StoreError> for ShopError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::LockTimeout(msg) => ShopError::Conflict(msg),
            StoreError::Duplicate(msg) | StoreError::Invariant(msg) | StoreError::Backend(msg) => {
                ShopError::Internal(msg)
            }
        }
    }
}

impl From<DomainError> for ShopError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ShopError::Validation(msg),
            DomainError::InvariantViolation(msg) => ShopError::Internal(msg),
            DomainError::NotFound => ShopError::not_found("resource", "requested"),
            DomainError::Conflict(msg) => ShopError::Conflict(msg),
            DomainError::IllegalTransition { entity, from, to } => {
                ShopError::IllegalStateTransition { entity, from, to }
            }
            DomainError::Unauthorized => ShopError::Forbidden("unauthorized".to_string()),
        }
    }
}
