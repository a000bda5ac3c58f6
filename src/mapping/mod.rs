//! Expression mapper boundary.
//!
//! A mapper turns one [`TimelineSample`] into raw [`ExpressionParameters`].
//! Implementations are picked once from configuration; the pipeline never
//! trusts their range compliance and validates every result.

mod remote;
mod rules;

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ExpressionError, Result};
use crate::types::{ExpressionParameters, TimelineSample};

pub use remote::HttpMapper;
pub use rules::RuleMapper;

pub trait ExpressionMapper: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Produce parameters for one sample. Must fail rather than invent defaults.
    fn map(&self, sample: &TimelineSample) -> Result<ExpressionParameters>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapperKind {
    #[default]
    Rules,
    Http,
}

/// Mapper selection and connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub kind: MapperKind,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            kind: MapperKind::Rules,
            endpoint: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl MapperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == MapperKind::Http {
            match self.endpoint.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(ExpressionError::Config(format!(
                        "mapper endpoint must be an http(s) URL, got '{url}'"
                    )))
                }
                None => {
                    return Err(ExpressionError::Config(
                        "http mapper requires an endpoint".to_string(),
                    ))
                }
            }
            if self.timeout_secs == 0 {
                return Err(ExpressionError::Config(
                    "mapper timeout must be at least one second".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Construct the configured mapper implementation.
pub fn build_mapper(config: &MapperConfig) -> Result<Box<dyn ExpressionMapper>> {
    config.validate()?;
    match config.kind {
        MapperKind::Rules => Ok(Box::new(RuleMapper::new())),
        MapperKind::Http => {
            let endpoint = config.endpoint.clone().unwrap_or_default();
            let mapper = HttpMapper::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Box::new(mapper))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_rule_mapper() {
        let mapper = build_mapper(&MapperConfig::default()).unwrap();
        assert_eq!(mapper.name(), "rules");
    }

    #[test]
    fn http_mapper_requires_endpoint() {
        let config = MapperConfig {
            kind: MapperKind::Http,
            ..MapperConfig::default()
        };
        assert!(matches!(
            build_mapper(&config),
            Err(ExpressionError::Config(_))
        ));
    }

    #[test]
    fn http_mapper_rejects_non_http_endpoint() {
        let config = MapperConfig {
            kind: MapperKind::Http,
            endpoint: Some("ftp://example.invalid".to_string()),
            ..MapperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mapper_kind_parses_from_json() {
        let config: MapperConfig =
            serde_json::from_str(r#"{"kind": "http", "endpoint": "http://localhost:9/map"}"#)
                .unwrap();
        assert_eq!(config.kind, MapperKind::Http);
        assert_eq!(config.timeout_secs, 30);
    }
}
