use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, Money, ProductId};

/// Catalog product.
///
/// The price here is the *current* list price. Carts snapshot it at add time,
/// so later changes never reach an existing cart line or order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
}

/// Partial edit of a product. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.price.is_none()
    }
}

impl Product {
    pub fn create(input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: ProductId::new(),
            name: checked_name(&input.name)?,
            description: clean_description(input.description),
            price: checked_price(input.price)?,
            created_at: now,
        })
    }

    /// Apply `update` all-or-nothing: on error `self` is untouched.
    ///
    /// Existing cart lines and orders keep the price they snapshotted.
    pub fn apply(&mut self, update: ProductUpdate) -> DomainResult<()> {
        if update.is_empty() {
            return Err(DomainError::validation("nothing to update"));
        }
        let name = update.name.as_deref().map(checked_name).transpose()?;
        let price = update.price.map(checked_price).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(price) = price {
            self.price = price;
        }
        if update.description.is_some() {
            self.description = clean_description(update.description);
        }
        Ok(())
    }
}

fn checked_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn checked_price(price: Money) -> DomainResult<Money> {
    if price == Money::ZERO {
        return Err(DomainError::validation("price must be greater than zero"));
    }
    Ok(price)
}

fn clean_description(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
