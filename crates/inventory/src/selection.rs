//! Warehouse auto-selection for add-to-cart.

use storefront_core::WarehouseId;

use crate::StockEntry;

/// Pick the warehouse that will fulfil `requested` units.
///
/// Only warehouses holding at least `requested` units qualify. The one with
/// the highest quantity wins; ties go to the smallest `WarehouseId`, which for
/// UUIDv7 ids is the oldest warehouse. Returns `None` when nothing qualifies.
pub fn select_warehouse<'a, I>(candidates: I, requested: i64) -> Option<WarehouseId>
where
    I: IntoIterator<Item = &'a StockEntry>,
{
    candidates
        .into_iter()
        .filter(|e| e.covers(requested))
        .max_by(|a, b| {
            a.quantity
                .cmp(&b.quantity)
                .then_with(|| b.warehouse_id.cmp(&a.warehouse_id))
        })
        .map(|e| e.warehouse_id)
}
