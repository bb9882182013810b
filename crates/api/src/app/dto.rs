use core::str::FromStr;

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Json, Query, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use storefront_core::{DomainError, Money, ProductId, WarehouseId};
use storefront_infra::services::StockInput;
use storefront_sales::PaymentStatus;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Minor units.
    pub price: Money,
    #[serde(default)]
    pub stock: Vec<StockInput>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// -------------------------
// Extractors
// -------------------------

/// JSON body whose rejections (malformed JSON, missing fields, wrong content
/// type) answer with the `validation_error` JSON shape instead of plain text.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            )),
        }
    }
}

/// Query string counterpart of [`JsonBody`].
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            )),
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

/// Parse a path segment into a typed id, or a 400 response.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
    })
}

pub fn parse_payment_status(raw: Option<&str>) -> Result<Option<PaymentStatus>, Response> {
    raw.map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<PaymentStatus>())
        .transpose()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::OrderId;

    #[test]
    fn malformed_ids_become_bad_requests() {
        let resp = parse_id::<OrderId>("not-a-uuid", "order").unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let id = OrderId::new();
        assert_eq!(parse_id::<OrderId>(&id.to_string(), "order").unwrap(), id);
    }

    #[test]
    fn payment_status_query_accepts_legacy_verified() {
        assert_eq!(parse_payment_status(Some("Verified")).unwrap(), Some(PaymentStatus::Completed));
        assert_eq!(parse_payment_status(None).unwrap(), None);
        assert!(parse_payment_status(Some("settled")).is_err());
    }
}
