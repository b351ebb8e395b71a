//! Dashboard configuration
//!
//! Loaded from an optional YAML file, then overridden from the environment
//! (after `.env` has been read).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model::{DistanceRounding, ParameterBounds, Parameters};
use crate::overlay::{MarkerStyle, OverlayStyle};

pub const DEFAULT_CONFIG_PATH: &str = "isochrone.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub oracle: OracleConfig,
    pub engine: EngineConfig,
    pub parameters: ParameterConfig,
    pub style: StyleConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    /// Routing profile, e.g. `driving-car`
    pub profile: String,
    /// Sent verbatim in the `Authorization` header
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub smoothing: f64,
    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openrouteservice.org".to_string(),
            profile: "driving-car".to_string(),
            api_key: None,
            smoothing: 0.1,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet window that collapses bursts of input changes
    pub debounce_ms: u64,
    /// Cap on in-flight oracle requests. `None` means one per point, unbounded.
    pub max_concurrent_fetches: Option<usize>,
    pub distance_rounding: DistanceRounding,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_concurrent_fetches: None,
            distance_rounding: DistanceRounding::Truncate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    pub time: ParameterBounds,
    pub speed: ParameterBounds,
    pub default_time_min: u32,
    pub default_speed_kmh: u32,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            time: ParameterBounds::new(1, 60, 1),
            speed: ParameterBounds::new(10, 150, 5),
            default_time_min: 5,
            default_speed_kmh: 50,
        }
    }
}

impl ParameterConfig {
    pub fn initial(&self) -> Parameters {
        Parameters {
            time_min: self.default_time_min,
            speed_kmh: self.default_speed_kmh,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub overlay: OverlayStyle,
    pub marker: MarkerStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Export spans over OTLP in addition to console logging
    pub otlp_enabled: bool,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_enabled: false,
            service_name: "isochrone_dashboard".to_string(),
        }
    }
}

impl DashboardConfig {
    /// Read `.env`, the YAML file named by `ISOCHRONE_CONFIG` (if present) and
    /// the environment overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = std::env::var("ISOCHRONE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file. A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ORS_API_KEY") {
            self.oracle.api_key = Some(key);
        }
        if let Some(url) = lookup("ORS_BASE_URL") {
            self.oracle.base_url = url;
        }
        if let Some(profile) = lookup("ORS_PROFILE") {
            self.oracle.profile = profile;
        }
        if let Some(ms) = lookup("ISOCHRONE_DEBOUNCE_MS") {
            self.engine.debounce_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("ISOCHRONE_DEBOUNCE_MS is not a number: {}", ms))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.parameters;
        for (name, bounds, default) in [
            ("time", p.time, p.default_time_min),
            ("speed", p.speed, p.default_speed_kmh),
        ] {
            if bounds.min == 0 || bounds.min > bounds.max {
                bail!("Invalid {} bounds {}..={}", name, bounds.min, bounds.max);
            }
            if !bounds.contains(default) {
                bail!("Default {} {} is outside {}..={}", name, default, bounds.min, bounds.max);
            }
        }
        if self.engine.max_concurrent_fetches == Some(0) {
            bail!("max_concurrent_fetches must be at least 1");
        }
        if self.oracle.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DashboardConfig::default();
        config.validate().unwrap();
        assert_eq!(config.engine.debounce_ms, 500);
        assert_eq!(config.parameters.initial(), Parameters { time_min: 5, speed_kmh: 50 });
        assert!(config.oracle.api_key.is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DashboardConfig::from_file(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.oracle.profile, "driving-car");
    }

    #[test]
    fn test_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "engine:\n  debounce_ms: 250\n  distance_rounding: nearest\nparameters:\n  default_time_min: 10\nstyle:\n  overlay:\n    fill_opacity: 0.5\n"
        )
        .unwrap();

        let config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.debounce_ms, 250);
        assert_eq!(config.engine.distance_rounding, DistanceRounding::Nearest);
        assert_eq!(config.parameters.default_time_min, 10);
        assert_eq!(config.parameters.default_speed_kmh, 50);
        assert_eq!(config.style.overlay.fill_opacity, 0.5);
        assert_eq!(config.style.overlay.color, "#6366f1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ORS_API_KEY", "abc"),
            ("ORS_BASE_URL", "http://localhost:8080/ors"),
            ("ISOCHRONE_DEBOUNCE_MS", "100"),
        ]
        .into_iter()
        .collect();

        let mut config = DashboardConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.oracle.api_key.as_deref(), Some("abc"));
        assert_eq!(config.oracle.base_url, "http://localhost:8080/ors");
        assert_eq!(config.engine.debounce_ms, 100);

        let bad = |k: &str| (k == "ISOCHRONE_DEBOUNCE_MS").then(|| "soon".to_string());
        assert!(DashboardConfig::default().apply_overrides(bad).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_default() {
        let mut config = DashboardConfig::default();
        config.parameters.default_speed_kmh = 200;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.engine.max_concurrent_fetches = Some(0);
        assert!(config.validate().is_err());
    }
}
