use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use storefront_infra::{ShopError, ShopResult};

pub fn shop_error_to_response(err: ShopError) -> Response {
    let status = match &err {
        ShopError::Validation(_) | ShopError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        ShopError::Ownership(_) | ShopError::Forbidden(_) => StatusCode::FORBIDDEN,
        ShopError::NotFound { .. } => StatusCode::NOT_FOUND,
        ShopError::InsufficientStock(_)
        | ShopError::OutOfStock { .. }
        | ShopError::DuplicateItem { .. }
        | ShopError::IllegalStateTransition { .. }
        | ShopError::Conflict(_) => StatusCode::CONFLICT,
        ShopError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &err {
        ShopError::Internal(detail) => {
            tracing::error!(error = %detail, "internal error");
            "internal error".to_string()
        }
        other => other.to_string(),
    };

    let mut body = json!({
        "error": err.code(),
        "message": message,
    });
    if let Some(details) = err.details() {
        body["details"] = details;
    }
    if err.is_retryable() {
        body["retryable"] = json!(true);
    }

    (status, Json(body)).into_response()
}

/// `status` with the JSON body on success, the mapped error otherwise.
pub fn respond<T: Serialize>(status: StatusCode, result: ShopResult<T>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(e) => shop_error_to_response(e),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn conflicts_are_flagged_retryable() {
        let resp = shop_error_to_response(ShopError::Conflict("row busy".to_string()));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn business_conflicts_are_not_retryable() {
        let resp = shop_error_to_response(ShopError::IllegalStateTransition {
            entity: "payment",
            from: "failed".to_string(),
            to: "completed".to_string(),
        });
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert!(body.get("retryable").is_none());
    }

    #[tokio::test]
    async fn internal_errors_hide_their_detail() {
        let resp = shop_error_to_response(ShopError::Internal("pool exhausted".to_string()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["message"], "internal error");
    }

    #[test]
    fn ownership_maps_to_forbidden_and_missing_to_not_found() {
        let resp = shop_error_to_response(ShopError::Ownership("not yours".to_string()));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = shop_error_to_response(ShopError::not_found("order", "abc"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
