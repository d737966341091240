//! Tuning configuration and strategy option tables.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

use kt_types::{KtResult, OptionError, ParamValue};

use crate::space::{ParameterDomain, SpaceLimits};
use crate::strategies::StrategyKind;

/// Default value of a strategy option, as shown in option tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionDefault {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(&'static str),
    /// Computed at run time, e.g. from the search space size.
    Derived(&'static str),
}

impl fmt::Display for OptionDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Derived(v) => write!(f, "({v})"),
        }
    }
}

/// One documented strategy option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub default: OptionDefault,
}

impl OptionSpec {
    pub const fn new(name: &'static str, description: &'static str, default: OptionDefault) -> Self {
        Self {
            name,
            description,
            default,
        }
    }
}

/// Render an option table as markdown.
pub fn describe_options(strategy: &str, specs: &[OptionSpec]) -> String {
    let mut out = format!("Options for {strategy}:\n\n| option | description | default |\n|---|---|---|\n");
    for spec in specs {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            spec.name, spec.description, spec.default
        ));
    }
    out
}

/// Strategy option overrides keyed by option name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyOptions(BTreeMap<String, serde_json::Value>);

impl StrategyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Log every override that `specs` does not declare.
    pub fn warn_unknown(&self, strategy: &str, specs: &[OptionSpec]) {
        for name in self.0.keys() {
            if !specs.iter().any(|s| s.name == name.as_str()) {
                warn!("Ignoring unknown option '{}' for strategy {}", name, strategy);
            }
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64, OptionError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| wrong_type(name, "a number", v)),
        }
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize, OptionError> {
        Ok(self.usize_opt(name)?.unwrap_or(default))
    }

    pub fn usize_opt(&self, name: &str) -> Result<Option<usize>, OptionError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a non-negative integer", v)),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, OptionError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| wrong_type(name, "a boolean", v)),
        }
    }

    pub fn str_or(&self, name: &str, default: &str) -> Result<String, OptionError> {
        match self.get(name) {
            None => Ok(default.to_string()),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type(name, "a string", v)),
        }
    }
}

fn wrong_type(option: &str, expected: &str, found: &serde_json::Value) -> OptionError {
    OptionError::WrongType {
        option: option.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Everything needed to run one tuning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningOptions {
    /// Tunable parameters in declaration order.
    pub tune_params: Vec<ParameterDomain>,
    pub restrictions: Vec<String>,
    pub strategy: StrategyKind,
    pub strategy_options: StrategyOptions,
    pub verbose: bool,
    pub scaling: bool,
    /// Seed for reproducible runs; drawn from the thread RNG when absent.
    pub seed: Option<u64>,
    pub limits: SpaceLimits,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self {
            tune_params: Vec::new(),
            restrictions: Vec::new(),
            strategy: StrategyKind::GreedyIls,
            strategy_options: StrategyOptions::new(),
            verbose: false,
            scaling: false,
            seed: None,
            limits: SpaceLimits::default(),
        }
    }
}

impl TuningOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_param<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.tune_params.push(ParameterDomain::new(name, values));
        self
    }

    pub fn add_restriction(mut self, expr: impl Into<String>) -> Self {
        self.restrictions.push(expr.into());
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.strategy_options.insert(name, value);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_scaling(mut self, scaling: bool) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_limits(mut self, limits: SpaceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn from_json_str(json: &str) -> KtResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> KtResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Fresh RNG for one strategy run.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }
}
