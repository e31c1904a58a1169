//! JSON query surface for dashboard and alerting consumers
//!
//! - `GET /health`
//! - `GET /symbols?recency_secs=N`
//! - `GET /query?symbol=..&resolution=..&indicator=..&from=..&to=..`
//! - `GET /metrics`
//!
//! Handlers only read published snapshots; dropping a request midway has
//! no effect on engine state.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use types::ids::Symbol;
use types::resolution::Resolution;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::metrics::PartitionStats;
use crate::query::{QueryResult, TimeRange};
use crate::SERVICE_VERSION;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn create_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/symbols", get(list_symbols))
        .route("/query", get(query))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Engine(err) => match err {
                EngineError::UnknownSymbol(_)
                | EngineError::UnknownIndicator(_)
                | EngineError::UnknownResolution(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                EngineError::ShutDown(_)
                | EngineError::Overflow { .. }
                | EngineError::DedupCapacity { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
                }
                EngineError::LateData { .. } | EngineError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        };

        let body = Json(json!({
            "error": code,
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": SERVICE_VERSION,
        "symbols": state.engine.symbols().len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SymbolsParams {
    pub recency_secs: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<Symbol>,
}

async fn list_symbols(
    State(state): State<AppState>,
    Query(params): Query<SymbolsParams>,
) -> Json<SymbolsResponse> {
    let symbols = match params.recency_secs {
        Some(secs) => state
            .engine
            .list_active_symbols(secs.saturating_mul(NANOS_PER_SECOND)),
        None => state.engine.symbols(),
    };
    Json(SymbolsResponse { symbols })
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub symbol: String,
    pub resolution: String,
    pub indicator: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub result: QueryResult,
    pub stats: PartitionStats,
}

async fn query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let symbol = Symbol::try_new(&params.symbol).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let resolution: Resolution = params
        .resolution
        .parse()
        .map_err(|e: types::errors::ValidationError| ApiError::BadRequest(e.to_string()))?;
    let range = TimeRange {
        from: params.from,
        to: params.to,
    };

    let (snapshot, result) =
        state
            .engine
            .query_snapshot(&symbol, resolution, params.indicator.as_deref(), range)?;
    Ok(Json(QueryResponse {
        result,
        stats: snapshot.stats,
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.engine.metrics().export())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, IndicatorParams};
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tower::ServiceExt;
    use types::trade::{Side, Tick};

    const S: i64 = NANOS_PER_SECOND;

    async fn engine_with_data() -> Arc<Engine> {
        let config = EngineConfig::default()
            .with_resolutions("1s", &["1m"])
            .with_indicators([("sma", IndicatorParams::of_kind("sma").with_period(2))]);
        let engine = Arc::new(Engine::new(config).unwrap());
        for (i, price) in [10, 12, 14].into_iter().enumerate() {
            let tick = Tick::new(
                Symbol::new("BTC-USD"),
                i as i64 * S,
                Decimal::from(price),
                Decimal::ONE,
                Side::BUY,
            );
            engine.submit(tick.into()).unwrap();
        }
        engine.sync(&Symbol::new("BTC-USD")).await.unwrap();
        engine
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router(engine_with_data().await);
        let (status, body) = get_json(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["symbols"], 1);
    }

    #[tokio::test]
    async fn test_query_bars() {
        let router = create_router(engine_with_data().await);
        let (status, body) = get_json(router, "/query?symbol=btc-usd&resolution=1s").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["series"]["kind"], "bars");
        let items = body["series"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["open"], "10");
        assert_eq!(body["freshness"], "current");
        assert_eq!(body["stats"]["ticks_accepted"], 3);
    }

    #[tokio::test]
    async fn test_query_indicator_with_range() {
        let router = create_router(engine_with_data().await);
        let uri = format!("/query?symbol=BTC-USD&resolution=1s&indicator=sma&from={S}");
        let (status, body) = get_json(router, &uri).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["series"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["value"]["type"], "scalar");
    }

    #[tokio::test]
    async fn test_undefined_is_explicit() {
        let router = create_router(engine_with_data().await);
        let (_, body) = get_json(router, "/query?symbol=BTC-USD&resolution=1s&indicator=sma&to=1").await;
        let items = body["series"]["items"].as_array().unwrap();
        assert_eq!(items[0]["value"]["type"], "undefined");
    }

    #[tokio::test]
    async fn test_query_errors() {
        let engine = engine_with_data().await;
        let (status, body) =
            get_json(create_router(engine.clone()), "/query?symbol=ETH-USD&resolution=1s").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");

        let (status, _) =
            get_json(create_router(engine.clone()), "/query?symbol=BTC-USD&resolution=7x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(
            create_router(engine),
            "/query?symbol=BTC-USD&resolution=1s&indicator=nope",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_symbols_by_recency() {
        let router = create_router(engine_with_data().await);
        let (status, body) = get_json(router, "/symbols?recency_secs=60").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbols"], serde_json::json!(["BTC-USD"]));
    }
}
