use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, WarehouseId};

/// A stock-holding location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    pub location: String,
}

impl Warehouse {
    pub fn create(input: NewWarehouse, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        let location = input.location.trim();
        if name.is_empty() || location.is_empty() {
            return Err(DomainError::validation("name and location are required"));
        }
        Ok(Self {
            id: WarehouseId::new(),
            name: name.to_string(),
            location: location.to_string(),
            created_at: now,
        })
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
