use crate::cleaner::PriceRange;
use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_GROUP, DEFAULT_JOB_TYPE, DEFAULT_PROJECT, DEFAULT_STORE_ROOT,
    STORE_KEY_ENV,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Arguments of one cleaning run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepConfig {
    pub input_artifact: String,
    pub output_artifact: String,
    pub output_type: String,
    pub output_description: String,
    pub min_price: f64,
    pub max_price: f64,
}

impl StepConfig {
    pub fn new(
        input_artifact: impl Into<String>,
        output_artifact: impl Into<String>,
        output_type: impl Into<String>,
        output_description: impl Into<String>,
        min_price: f64,
        max_price: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            input_artifact: input_artifact.into(),
            output_artifact: output_artifact.into(),
            output_type: output_type.into(),
            output_description: output_description.into(),
            min_price,
            max_price,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("input_artifact", &self.input_artifact),
            ("output_artifact", &self.output_artifact),
            ("output_type", &self.output_type),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        for (field, value) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if value.is_nan() {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must be a number".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn price_range(&self) -> PriceRange {
        PriceRange::new(self.min_price, self.max_price)
    }
}

/// Where artifacts and run records are kept
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Fs {
        root: PathBuf,
    },
    Http {
        base_url: String,
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Fs {
            root: PathBuf::from(DEFAULT_STORE_ROOT),
        }
    }
}

/// Run tracking settings, read from an optional TOML file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub project: String,
    pub group: String,
    pub job_type: String,
    /// Enables JSON file logging into this directory
    pub log_dir: Option<PathBuf>,
    /// Downloads and the intermediate output file go here
    pub work_dir: PathBuf,
    pub store: StoreConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            group: DEFAULT_GROUP.to_string(),
            job_type: DEFAULT_JOB_TYPE.to_string(),
            log_dir: None,
            work_dir: PathBuf::from("."),
            store: StoreConfig::default(),
        }
    }
}

impl TrackingConfig {
    /// Load from `path`, or from the default file if it exists, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: TrackingConfig = toml::from_str(content)?;
        Ok(config)
    }
}

/// Bearer key for the HTTP store, taken from the environment only
pub fn store_key() -> Result<String, ConfigError> {
    std::env::var(STORE_KEY_ENV).map_err(|e| ConfigError::Invalid {
        field: STORE_KEY_ENV.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_config_rejects_nan_bounds() {
        let err = StepConfig::new("raw.csv:latest", "clean.csv", "clean_data", "d", f64::NAN, 350.0)
            .unwrap_err();
        assert!(err.to_string().contains("min_price"));
    }

    #[test]
    fn test_step_config_rejects_empty_artifact() {
        let err = StepConfig::new(" ", "clean.csv", "clean_data", "d", 10.0, 350.0).unwrap_err();
        assert!(err.to_string().contains("input_artifact"));
    }

    #[test]
    fn test_price_range_from_config() {
        let config =
            StepConfig::new("raw.csv:latest", "clean.csv", "clean_data", "d", 10.0, 350.0).unwrap();
        let range = config.price_range();
        assert!(range.contains(10.0));
        assert!(range.contains(350.0));
        assert!(!range.contains(350.01));
    }

    #[test]
    fn test_tracking_defaults() {
        let config = TrackingConfig::from_toml("").unwrap();
        assert_eq!(config.project, "nyc_airbnb");
        assert_eq!(config.job_type, "basic_cleaning");
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_tracking_http_store() {
        let config = TrackingConfig::from_toml(
            r#"
            project = "nyc_airbnb_dev"
            log_dir = "logs"

            [store]
            kind = "http"
            base_url = "https://store.example.com"
            bucket = "artifacts"
            "#,
        )
        .unwrap();

        assert_eq!(config.project, "nyc_airbnb_dev");
        assert_eq!(config.group, "basic_cleaning");
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(
            config.store,
            StoreConfig::Http {
                base_url: "https://store.example.com".to_string(),
                bucket: "artifacts".to_string(),
                prefix: None,
            }
        );
    }

    #[test]
    fn test_unknown_store_kind_rejected() {
        let err = TrackingConfig::from_toml("[store]\nkind = \"ftp\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
