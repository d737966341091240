//! Measurement and evaluation records exchanged with execution backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::{Configuration, ParamValue};

/// A single timing reported by a backend for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub configuration: Configuration,
    /// Measured execution time, lower is better.
    pub time: f64,
    /// Backend-specific extras (individual run times, counters, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Measurement {
    pub fn new(configuration: Configuration, time: f64) -> Self {
        Self {
            configuration,
            time,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of evaluating one configuration within a tuning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub configuration: Configuration,
    pub parameters: BTreeMap<String, ParamValue>,
    /// `None` when compilation or execution failed.
    pub time: Option<f64>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn measured(measurement: Measurement, names: &[String]) -> Self {
        Self {
            parameters: measurement.configuration.named(names),
            configuration: measurement.configuration,
            time: Some(measurement.time),
            metadata: measurement.metadata,
            evaluated_at: Utc::now(),
        }
    }

    pub fn failed(configuration: Configuration, names: &[String]) -> Self {
        Self {
            parameters: configuration.named(names),
            configuration,
            time: None,
            metadata: BTreeMap::new(),
            evaluated_at: Utc::now(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.time.is_none()
    }
}

/// Hardware/software descriptor reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub device_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Environment {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_result_carries_named_parameters() {
        let names = vec!["block_x".to_string(), "block_y".to_string()];
        let config = Configuration::new(vec![128.into(), 8.into()]);
        let measurement = Measurement::new(config.clone(), 1.25)
            .with_metadata("times", serde_json::json!([1.2, 1.3]));

        let result = EvaluationResult::measured(measurement, &names);
        assert_eq!(result.configuration, config);
        assert_eq!(result.time, Some(1.25));
        assert_eq!(result.parameters["block_y"], ParamValue::Int(8));
        assert!(result.metadata.contains_key("times"));
        assert!(!result.is_failure());
    }

    #[test]
    fn failed_result_has_no_time() {
        let names = vec!["tile".to_string()];
        let result = EvaluationResult::failed(Configuration::new(vec![16.into()]), &names);
        assert!(result.is_failure());
    }

    #[test]
    fn environment_round_trip() {
        let env = Environment::new("simulated")
            .with_property("max_threads", serde_json::json!(1024));
        let json = serde_json::to_string(&env).unwrap();
        let back: Environment = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }
}
