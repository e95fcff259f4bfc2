//! HTTP endpoints of the facilitator service.
//!
//! | Method | Path         | Body              | Answer                |
//! |--------|--------------|-------------------|-----------------------|
//! | `POST` | `/verify`    | `VerifyRequest`   | `VerifyResponse`      |
//! | `POST` | `/settle`    | `SettleRequest`   | `SettleResponse`      |
//! | `GET`  | `/supported` |                   | `SupportedResponse`   |
//! | `GET`  | `/health`    |                   | `{"status":"ok",...}` |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use h402::facilitator::Facilitator;
use h402::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

use crate::error::ServiceError;

/// `POST /verify`.
///
/// # Errors
///
/// Returns [`ServiceError`] for a malformed body or a failing backend.
pub async fn post_verify<F: Facilitator>(
    State(facilitator): State<Arc<F>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ServiceError> {
    let Json(request) = body?;
    Ok(Json(facilitator.verify(request).await?))
}

/// `POST /settle`.
///
/// # Errors
///
/// Returns [`ServiceError`] for a malformed body or a failing backend.
pub async fn post_settle<F: Facilitator>(
    State(facilitator): State<Arc<F>>,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> Result<Json<SettleResponse>, ServiceError> {
    let Json(request) = body?;
    Ok(Json(facilitator.settle(request).await?))
}

/// `GET /supported`.
///
/// # Errors
///
/// Returns [`ServiceError`] if the backend fails.
pub async fn get_supported<F: Facilitator>(
    State(facilitator): State<Arc<F>>,
) -> Result<Json<SupportedResponse>, ServiceError> {
    Ok(Json(facilitator.supported().await?))
}

/// `GET /health`.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the facilitator router around `facilitator`.
pub fn facilitator_router<F: Facilitator + 'static>(facilitator: Arc<F>) -> Router {
    Router::new()
        .route("/verify", post(post_verify::<F>))
        .route("/settle", post(post_settle::<F>))
        .route("/supported", get(get_supported::<F>))
        .route("/health", get(get_health))
        .with_state(facilitator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFacilitator;
    use crate::local::tests::verify_request;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    fn post_json(uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn settle_endpoint_is_idempotent() {
        let app = facilitator_router(Arc::new(LocalFacilitator::new(["hedera-testnet"])));
        let request = SettleRequest::from(verify_request("http-1", 1000));

        let first = app.clone().oneshot(post_json("/settle", &request)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first: SettleResponse = json(first).await;
        let second = app.oneshot(post_json("/settle", &request)).await.unwrap();
        let second: SettleResponse = json(second).await;

        assert!(first.is_success());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn verify_endpoint_reports_validity() {
        let app = facilitator_router(Arc::new(LocalFacilitator::new(["hedera-testnet"])));
        let response = app
            .oneshot(post_json("/verify", &verify_request("http-2", 1000)))
            .await
            .unwrap();
        let verdict: VerifyResponse = json(response).await;
        assert!(verdict.is_valid());
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let app = facilitator_router(Arc::new(LocalFacilitator::new(["hedera-testnet"])));
        let response = app
            .oneshot(post_json("/settle", &serde_json::json!({ "hello": "world" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_supported_answer() {
        let app = facilitator_router(Arc::new(LocalFacilitator::new(["hedera-testnet"])));
        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let supported = app
            .oneshot(Request::get("/supported").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let supported: SupportedResponse = json(supported).await;
        assert!(supported.supports("exact", "hedera-testnet"));
    }
}
