use serde::{Deserialize, Serialize};

use crate::clustering::hdbscan::{ClusterSelectionMethod, DistanceMetric, HdbscanParams};
use crate::environment::{get_env_var_flag, get_env_var_parsed};
use crate::error::ConfigError;
use crate::location::LocationParams;

pub const MIN_CLUSTER_SIZE_ENV: &str = "CLUSTER_MIN_CLUSTER_SIZE";
pub const MIN_SAMPLES_ENV: &str = "CLUSTER_MIN_SAMPLES";
pub const SELECTION_METHOD_ENV: &str = "CLUSTER_SELECTION_METHOD";
pub const ALLOW_SINGLE_CLUSTER_ENV: &str = "CLUSTER_ALLOW_SINGLE_CLUSTER";
pub const WINDOW_DAYS_ENV: &str = "CLUSTER_WINDOW_DAYS";
pub const EMBEDDING_DIMENSION_ENV: &str = "CLUSTER_EMBEDDING_DIMENSION";
pub const LOCATION_MIN_CONFIDENCE_ENV: &str = "CLUSTER_LOCATION_MIN_CONFIDENCE";
pub const LOCATION_MAX_LOCATIONS_ENV: &str = "CLUSTER_LOCATION_MAX_LOCATIONS";
pub const LOCATION_MAX_REGIONS_ENV: &str = "CLUSTER_LOCATION_MAX_REGIONS";
pub const LOCATION_MAX_CITIES_ENV: &str = "CLUSTER_LOCATION_MAX_CITIES";
pub const TOP_ENTITIES_ENV: &str = "CLUSTER_TOP_ENTITIES";

pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 5;
pub const DEFAULT_WINDOW_DAYS: u32 = 1;
/// Longest accepted window, about a century
pub const MAX_WINDOW_DAYS: u32 = 36_500;
pub const DEFAULT_LOCATION_MIN_CONFIDENCE: f64 = 0.65;
pub const DEFAULT_LOCATION_MAX_LOCATIONS: usize = 10;
pub const DEFAULT_LOCATION_MAX_REGIONS: usize = 5;
pub const DEFAULT_LOCATION_MAX_CITIES: usize = 5;
pub const DEFAULT_TOP_ENTITIES: usize = 10;

/// Every knob of a clustering run.
///
/// `min_samples = None` means "same as `min_cluster_size`".
/// `embedding_dimension = None` means the dimension is inferred from the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub min_cluster_size: usize,
    pub min_samples: Option<usize>,
    pub metric: DistanceMetric,
    pub cluster_selection_method: ClusterSelectionMethod,
    pub allow_single_cluster: bool,
    pub time_window_days: u32,
    pub embedding_dimension: Option<usize>,
    pub location_min_confidence: f64,
    pub location_max_locations: usize,
    pub location_max_regions: usize,
    pub location_max_cities: usize,
    pub top_entities_limit: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            min_samples: None,
            metric: DistanceMetric::Cosine,
            cluster_selection_method: ClusterSelectionMethod::Eom,
            allow_single_cluster: false,
            time_window_days: DEFAULT_WINDOW_DAYS,
            embedding_dimension: None,
            location_min_confidence: DEFAULT_LOCATION_MIN_CONFIDENCE,
            location_max_locations: DEFAULT_LOCATION_MAX_LOCATIONS,
            location_max_regions: DEFAULT_LOCATION_MAX_REGIONS,
            location_max_cities: DEFAULT_LOCATION_MAX_CITIES,
            top_entities_limit: DEFAULT_TOP_ENTITIES,
        }
    }
}

impl ClusterConfig {
    /// Builds a configuration from the defaults overridden by `CLUSTER_*` environment variables.
    ///
    /// # Returns
    /// * `Ok(ClusterConfig)` - Not yet validated; call `validate()` before use
    /// * `Err(ConfigError)` - If a variable is set to an unparseable value
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = get_env_var_parsed(MIN_CLUSTER_SIZE_ENV)? {
            config.min_cluster_size = v;
        }
        if let Some(v) = get_env_var_parsed(MIN_SAMPLES_ENV)? {
            config.min_samples = Some(v);
        }
        if let Some(v) = get_env_var_parsed::<String>(SELECTION_METHOD_ENV)? {
            config.cluster_selection_method =
                v.parse().map_err(|_| ConfigError::InvalidEnvValue {
                    name: SELECTION_METHOD_ENV.to_string(),
                    value: v.clone(),
                })?;
        }
        if let Some(v) = get_env_var_flag(ALLOW_SINGLE_CLUSTER_ENV)? {
            config.allow_single_cluster = v;
        }
        if let Some(v) = get_env_var_parsed(WINDOW_DAYS_ENV)? {
            config.time_window_days = v;
        }
        if let Some(v) = get_env_var_parsed(EMBEDDING_DIMENSION_ENV)? {
            config.embedding_dimension = Some(v);
        }
        if let Some(v) = get_env_var_parsed(LOCATION_MIN_CONFIDENCE_ENV)? {
            config.location_min_confidence = v;
        }
        if let Some(v) = get_env_var_parsed(LOCATION_MAX_LOCATIONS_ENV)? {
            config.location_max_locations = v;
        }
        if let Some(v) = get_env_var_parsed(LOCATION_MAX_REGIONS_ENV)? {
            config.location_max_regions = v;
        }
        if let Some(v) = get_env_var_parsed(LOCATION_MAX_CITIES_ENV)? {
            config.location_max_cities = v;
        }
        if let Some(v) = get_env_var_parsed(TOP_ENTITIES_ENV)? {
            config.top_entities_limit = v;
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    #[must_use]
    pub fn with_min_samples(mut self, samples: usize) -> Self {
        self.min_samples = Some(samples);
        self
    }

    #[must_use]
    pub fn with_selection_method(mut self, method: ClusterSelectionMethod) -> Self {
        self.cluster_selection_method = method;
        self
    }

    #[must_use]
    pub fn with_allow_single_cluster(mut self, allow: bool) -> Self {
        self.allow_single_cluster = allow;
        self
    }

    #[must_use]
    pub fn with_time_window_days(mut self, days: u32) -> Self {
        self.time_window_days = days;
        self
    }

    #[must_use]
    pub fn with_top_entities_limit(mut self, limit: usize) -> Self {
        self.top_entities_limit = limit;
        self
    }

    /// The core-point threshold actually handed to the clusterer.
    pub fn effective_min_samples(&self) -> usize {
        self.min_samples.unwrap_or(self.min_cluster_size)
    }

    pub fn hdbscan_params(&self) -> HdbscanParams {
        HdbscanParams {
            min_cluster_size: self.min_cluster_size,
            min_samples: self.effective_min_samples(),
            metric: self.metric,
            cluster_selection_method: self.cluster_selection_method,
            allow_single_cluster: self.allow_single_cluster,
        }
    }

    pub fn location_params(&self) -> LocationParams {
        LocationParams {
            min_confidence: self.location_min_confidence,
            max_locations: self.location_max_locations,
            max_regions: self.location_max_regions,
            max_cities: self.location_max_cities,
        }
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hdbscan_params().validate()?;

        if self.time_window_days == 0 || self.time_window_days > MAX_WINDOW_DAYS {
            return Err(ConfigError::invalid_parameter(format!(
                "time_window_days must be within [1, {}], got {}",
                MAX_WINDOW_DAYS, self.time_window_days
            )));
        }

        if self.embedding_dimension == Some(0) {
            return Err(ConfigError::invalid_parameter(
                "embedding_dimension must be >= 1 when set",
            ));
        }

        if !self.location_min_confidence.is_finite()
            || !(0.0..=1.0).contains(&self.location_min_confidence)
        {
            return Err(ConfigError::invalid_parameter(format!(
                "location_min_confidence must be within [0, 1], got {}",
                self.location_min_confidence
            )));
        }

        if self.location_max_locations == 0 {
            return Err(ConfigError::invalid_parameter(
                "location_max_locations must be >= 1",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_documented_values() {
        let config = ClusterConfig::default();
        assert_eq!(config.min_cluster_size, 5);
        assert_eq!(config.effective_min_samples(), 5);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.location_min_confidence, 0.65);
        assert_eq!(config.location_max_locations, 10);
        assert_eq!(config.location_max_regions, 5);
        assert_eq!(config.location_max_cities, 5);
        assert_eq!(config.top_entities_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let too_small = ClusterConfig::default().with_min_cluster_size(1);
        let err = too_small.validate().unwrap_err().to_string();
        assert!(err.contains("min_cluster_size"));

        let no_samples = ClusterConfig::default().with_min_samples(0);
        assert!(no_samples.validate().is_err());

        let no_window = ClusterConfig::default().with_time_window_days(0);
        assert!(no_window.validate().is_err());

        let endless_window = ClusterConfig::default().with_time_window_days(u32::MAX);
        assert!(endless_window.validate().is_err());
        assert!(ClusterConfig::default()
            .with_time_window_days(MAX_WINDOW_DAYS)
            .validate()
            .is_ok());

        let bad_confidence = ClusterConfig {
            location_min_confidence: 1.5,
            ..ClusterConfig::default()
        };
        assert!(bad_confidence.validate().is_err());

        let nan_confidence = ClusterConfig {
            location_min_confidence: f64::NAN,
            ..ClusterConfig::default()
        };
        assert!(nan_confidence.validate().is_err());

        let zero_dimension = ClusterConfig {
            embedding_dimension: Some(0),
            ..ClusterConfig::default()
        };
        assert!(zero_dimension.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var(MIN_CLUSTER_SIZE_ENV, "3");
        std::env::set_var(SELECTION_METHOD_ENV, "leaf");
        std::env::set_var(LOCATION_MAX_CITIES_ENV, "2");

        let config = ClusterConfig::from_env().unwrap();
        assert_eq!(config.min_cluster_size, 3);
        assert_eq!(config.effective_min_samples(), 3);
        assert_eq!(config.cluster_selection_method, ClusterSelectionMethod::Leaf);
        assert_eq!(config.location_max_cities, 2);
        assert_eq!(config.location_max_regions, 5);

        std::env::remove_var(MIN_CLUSTER_SIZE_ENV);
        std::env::remove_var(SELECTION_METHOD_ENV);
        std::env::remove_var(LOCATION_MAX_CITIES_ENV);
    }
}
