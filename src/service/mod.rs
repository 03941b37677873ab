//! HTTP forecast service
//!
//! [`AppContext`] is built once at startup and handed to every request as
//! axum state. A model that fails to load leaves the service running with
//! `model_loaded: false`; every other failure is reported per request.

mod routes;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::data::units::celsius_to_fahrenheit;
use crate::data::ObservationTable;
use crate::error::{ForecastError, Result};
use crate::inference::Predictor;
use crate::utils::{Config, ServerConfig};

pub use routes::{router, serve};

const FORECAST_NOTE: &str =
    "Predictions come from a small model; confidence is a fixed placeholder, not a calibrated estimate";

/// Shared, read-only state of the service
#[derive(Clone)]
pub struct AppContext {
    predictor: Option<Arc<Predictor>>,
    table_path: PathBuf,
    server: ServerConfig,
}

impl AppContext {
    pub fn new(predictor: Option<Predictor>, table_path: PathBuf, server: ServerConfig) -> Self {
        Self {
            predictor: predictor.map(Arc::new),
            table_path,
            server,
        }
    }

    /// Build the context from configuration, degrading if the model is absent
    pub fn from_config(config: &Config) -> Self {
        let predictor = match Predictor::load(
            &config.paths.checkpoint,
            config.scaler_path(),
            &config.inference.backends,
        ) {
            Ok(predictor) => {
                info!("Weather predictor loaded");
                Some(predictor)
            }
            Err(e) => {
                warn!("Could not load predictor: {}", e);
                None
            }
        };
        Self::new(predictor, config.paths.table.clone(), config.server.clone())
    }

    pub fn model_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            model_loaded: self.model_loaded(),
        }
    }

    /// Answer a forecast query
    pub fn forecast(&self, query: &ForecastQuery) -> ForecastReply {
        let lat = query.lat.unwrap_or(self.server.default_lat);
        let lon = query.lon.unwrap_or(self.server.default_lon);

        if !self.server.supports(lat, lon) {
            return ForecastReply::Failed(ForecastFailure::LocationNotSupported {
                location: self.server.location_name.clone(),
                area: SupportedArea {
                    lat_range: self.server.lat_range,
                    lon_range: self.server.lon_range,
                },
            });
        }

        let Some(predictor) = self.predictor.as_deref() else {
            return ForecastReply::Failed(ForecastFailure::ModelNotLoaded);
        };

        if let Some(hours) = query.hours {
            if hours != predictor.forecast_hours() {
                return ForecastReply::Failed(ForecastFailure::HorizonNotSupported {
                    requested: hours,
                    available: predictor.forecast_hours(),
                });
            }
        }

        match self.run_forecast(predictor, lat, lon) {
            Ok(response) => ForecastReply::Forecast(Box::new(response)),
            Err(e) => {
                error!("Forecast failed: {}", e);
                ForecastReply::Failed(ForecastFailure::PredictionFailed(e.to_string()))
            }
        }
    }

    fn run_forecast(&self, predictor: &Predictor, lat: f64, lon: f64) -> Result<ForecastResponse> {
        let table = ObservationTable::from_csv(&self.table_path)?;
        let prepared = predictor.engineer()?.prepare(table)?;
        let result = predictor.predict_from_table(&prepared)?;

        let last = |name: &str| {
            prepared
                .column(name)
                .and_then(|col| col.iter().last().copied())
        };
        let current_celsius = last("temperature")
            .ok_or_else(|| ForecastError::data("table has no temperature column"))?;
        let current_time = prepared.timestamps().and_then(|ts| ts.last().copied());

        Ok(ForecastResponse {
            location: Location {
                name: self.server.location_name.clone(),
                lat,
                lon,
            },
            current: CurrentConditions {
                temperature: celsius_to_fahrenheit(current_celsius),
                humidity: last("humidity"),
                timestamp: current_time,
            },
            forecast: ForecastBlock {
                temperature: result.temperature_fahrenheit,
                temperature_celsius: result.temperature_celsius,
                forecast_hours: result.forecast_hours,
                timestamp: result.target_timestamp.or_else(|| {
                    current_time.map(|t| t + Duration::hours(i64::from(result.forecast_hours)))
                }),
            },
            confidence: result.confidence,
            note: FORECAST_NOTE.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Query string of `GET /forecast`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Must equal the model's lead time when given
    pub hours: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Last observed row, temperature in °F
#[derive(Debug, Clone, Serialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Forecast, temperature in °F
#[derive(Debug, Clone, Serialize)]
pub struct ForecastBlock {
    pub temperature: f64,
    pub temperature_celsius: f64,
    pub forecast_hours: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub location: Location,
    pub current: CurrentConditions,
    pub forecast: ForecastBlock,
    pub confidence: f64,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupportedArea {
    pub lat_range: [f64; 2],
    pub lon_range: [f64; 2],
}

/// Why a forecast could not be produced
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastFailure {
    LocationNotSupported { location: String, area: SupportedArea },
    ModelNotLoaded,
    HorizonNotSupported { requested: u32, available: u32 },
    PredictionFailed(String),
}

/// JSON body for a failed forecast
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_area: Option<SupportedArea>,
}

impl ForecastFailure {
    pub fn payload(&self) -> ErrorPayload {
        let (error, message, supported_area) = match self {
            ForecastFailure::LocationNotSupported { location, area } => (
                "Location not supported",
                format!("Currently only the {} area is supported", location),
                Some(*area),
            ),
            ForecastFailure::ModelNotLoaded => (
                "Model not loaded",
                "The weather prediction model is not available".to_string(),
                None,
            ),
            ForecastFailure::HorizonNotSupported {
                requested,
                available,
            } => (
                "Horizon not supported",
                format!(
                    "The model forecasts {} hours ahead, {} hours were requested",
                    available, requested
                ),
                None,
            ),
            ForecastFailure::PredictionFailed(message) => {
                ("Prediction failed", message.clone(), None)
            }
        };
        ErrorPayload {
            error: error.to_string(),
            message,
            supported_area,
        }
    }
}

/// Outcome of a forecast request
#[derive(Debug, Clone)]
pub enum ForecastReply {
    Forecast(Box<ForecastResponse>),
    Failed(ForecastFailure),
}
