//! API route handlers

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::{AppContext, ForecastFailure, ForecastQuery, ForecastReply, HealthResponse};

/// Build the service router
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/forecast", get(forecast))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(ctx: AppContext, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(ctx.health())
}

/// CSV reading and inference run on the blocking pool
pub async fn forecast(
    State(ctx): State<AppContext>,
    Query(query): Query<ForecastQuery>,
) -> ForecastReply {
    run_blocking(move || ctx.forecast(&query)).await
}

async fn run_blocking<F>(job: F) -> ForecastReply
where
    F: FnOnce() -> ForecastReply + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Forecast task failed: {}", e);
            ForecastReply::Failed(ForecastFailure::PredictionFailed(format!(
                "forecast task failed: {}",
                e
            )))
        }
    }
}

impl ForecastFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            ForecastFailure::LocationNotSupported { .. } => StatusCode::BAD_REQUEST,
            ForecastFailure::HorizonNotSupported { .. } => StatusCode::BAD_REQUEST,
            ForecastFailure::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ForecastFailure::PredictionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ForecastReply {
    fn into_response(self) -> Response {
        match self {
            ForecastReply::Forecast(response) => Json(*response).into_response(),
            ForecastReply::Failed(failure) => {
                (failure.status(), Json(failure.payload())).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ServerConfig;
    use std::path::PathBuf;

    fn context() -> AppContext {
        AppContext::new(None, PathBuf::from("missing.csv"), ServerConfig::default())
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(body) = health(State(context())).await;
        assert!(!body.model_loaded);
    }

    #[tokio::test]
    async fn test_forecast_status_codes() {
        let query = ForecastQuery {
            lat: Some(0.0),
            lon: Some(0.0),
            hours: None,
        };
        let response = forecast(State(context()), Query(query)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = forecast(State(context()), Query(ForecastQuery::default()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_panicking_forecast_is_server_error() {
        let reply = run_blocking(|| -> ForecastReply { panic!("backend failure") }).await;
        let ForecastReply::Failed(failure) = &reply else {
            panic!("expected a failure");
        };
        assert_eq!(failure.payload().error, "Prediction failed");
        assert_eq!(reply.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_router_builds() {
        let _router = router(context());
    }
}
