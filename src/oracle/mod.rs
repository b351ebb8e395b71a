//! Isochrone Oracle
//!
//! The external routing service that turns a point and a distance budget into
//! an isochrone polygon with its area and resident population.

mod ors;

pub use ors::OpenRouteServiceFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DistanceBudget, Point};

/// A region returned by the oracle for one (point, budget) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneResult {
    /// Area in square meters, as reported by the oracle
    pub area_m2: f64,
    pub population: u64,
    /// GeoJSON handed to the overlay sink unchanged
    pub geometry: serde_json::Value,
}

impl IsochroneResult {
    pub fn area_km2(&self) -> f64 {
        self.area_m2 / 1e6
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// No response at all (connect error, timeout, truncated body)
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The oracle answered with a failure status
    #[error("oracle error (HTTP {status}): {message}")]
    OracleError { status: u16, message: String },
    /// The body did not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NetworkFailure(_) => FetchErrorKind::NetworkFailure,
            FetchError::OracleError { .. } => FetchErrorKind::OracleError,
            FetchError::MalformedResponse(_) => FetchErrorKind::MalformedResponse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NetworkFailure,
    OracleError,
    MalformedResponse,
}

/// Anything that can compute an isochrone for a point.
///
/// Implementations issue exactly one request per call and never retry.
#[async_trait]
pub trait IsochroneFetcher: Send + Sync {
    async fn fetch(&self, point: &Point, budget: DistanceBudget) -> Result<IsochroneResult, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_conversion() {
        let result = IsochroneResult {
            area_m2: 2_000_000.0,
            population: 1500,
            geometry: serde_json::Value::Null,
        };
        assert_eq!(result.area_km2(), 2.0);
    }

    #[test]
    fn test_error_kind_and_display() {
        let err = FetchError::OracleError { status: 403, message: "Quota exceeded".to_string() };
        assert_eq!(err.kind(), FetchErrorKind::OracleError);
        assert_eq!(err.to_string(), "oracle error (HTTP 403): Quota exceeded");
        assert_eq!(FetchError::NetworkFailure("timeout".into()).kind(), FetchErrorKind::NetworkFailure);
    }
}
