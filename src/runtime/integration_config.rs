//! Integration configuration loader.
//!
//! Loads the per-integration configuration blobs from `integrations.yaml` once
//! at startup. The registry is immutable afterwards and can be shared freely
//! between tasks.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{Result, ServerError};

/// Configuration for a single integration.
///
/// The blob is integration-specific and passed through to actions; the server
/// itself only reads `base_url` and `call_auth.mode` for the HTTP helper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationConfig {
    name: String,
    config: JsonValue,
}

impl IntegrationConfig {
    pub fn new(name: impl Into<String>, config: JsonValue) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.config.get(key)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.get("base_url").and_then(|v| v.as_str())
    }

    /// `call_auth.mode`, e.g. `AUTH_HEADER_TOKEN`.
    pub fn auth_mode(&self) -> Option<&str> {
        self.get("call_auth")
            .and_then(|auth| auth.get("mode"))
            .and_then(|v| v.as_str())
    }
}

/// Immutable lookup of integration name -> configuration.
#[derive(Debug, Clone, Default)]
pub struct IntegrationConfigRegistry {
    integrations: HashMap<String, IntegrationConfig>,
}

impl IntegrationConfigRegistry {
    /// Load integration configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ServerError::Config` if the file doesn't exist or has an
    /// invalid format. The server cannot serve requests without it.
    ///
    /// # Example
    /// ```ignore
    /// let integrations = IntegrationConfigRegistry::load_from_file("nango-integrations/integrations.yaml")?;
    /// let slack = integrations.get("slack")?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Failed to read integrations file {}: {}", path.display(), e))
        })?;

        let registry = Self::from_yaml_str(&contents)?;
        tracing::info!(
            "Loaded {} integration(s) from {}",
            registry.integrations.len(),
            path.display()
        );

        Ok(registry)
    }

    /// Parse integration configuration from YAML text.
    ///
    /// Two shapes are accepted under the `integrations` key:
    ///
    /// ```yaml
    /// integrations:
    ///   - slack:
    ///       base_url: https://slack.com/api/
    /// ```
    ///
    /// or a plain mapping of name -> config.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(contents)
            .map_err(|e| ServerError::Config(format!("Failed to parse YAML: {}", e)))?;

        let integrations_yaml = yaml
            .get("integrations")
            .ok_or_else(|| ServerError::Config("Config missing 'integrations' field".to_string()))?;

        let mut entries = Vec::new();
        match integrations_yaml {
            serde_yaml::Value::Sequence(list) => {
                for (index, item) in list.iter().enumerate() {
                    let mapping = item.as_mapping().filter(|m| m.len() == 1).ok_or_else(|| {
                        ServerError::Config(format!(
                            "Integration entry {} must be a single-key mapping of name to config",
                            index
                        ))
                    })?;
                    for (name, config) in mapping {
                        entries.push((name, config));
                    }
                }
            }
            serde_yaml::Value::Mapping(mapping) => entries.extend(mapping.iter()),
            serde_yaml::Value::Null => {}
            _ => {
                return Err(ServerError::Config(
                    "'integrations' must be a list or a mapping".to_string(),
                ))
            }
        }

        let mut configs = Vec::with_capacity(entries.len());
        for (name, config) in entries {
            let name = name.as_str().ok_or_else(|| {
                ServerError::Config(format!("Integration name must be a string, got {:?}", name))
            })?;
            let config: JsonValue = serde_yaml::from_value(config.clone()).map_err(|e| {
                ServerError::Config(format!("Failed to parse config for integration '{}': {}", name, e))
            })?;
            configs.push(IntegrationConfig::new(name, config));
        }

        Self::from_configs(configs)
    }

    /// Build a registry from already-parsed configurations.
    ///
    /// Duplicate names are rejected.
    pub fn from_configs(configs: impl IntoIterator<Item = IntegrationConfig>) -> Result<Self> {
        let mut integrations = HashMap::new();

        for config in configs {
            let name = config.name.clone();
            if integrations.insert(name.clone(), config).is_some() {
                return Err(ServerError::Config(format!(
                    "Integration '{}' is defined more than once",
                    name
                )));
            }
        }

        Ok(Self { integrations })
    }

    /// Get integration configuration by name.
    pub fn get(&self, name: &str) -> Result<&IntegrationConfig> {
        self.integrations
            .get(name)
            .ok_or_else(|| ServerError::IntegrationNotFound(name.to_string()))
    }

    pub fn has_integration(&self, name: &str) -> bool {
        self.integrations.contains_key(name)
    }

    pub fn integration_names(&self) -> Vec<&String> {
        self.integrations.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }
}
