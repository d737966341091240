//! Search space definitions: parameter domains, legality, sampling and
//! neighborhoods.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use kt_types::{Configuration, KtResult, OptionError, ParamValue, SpaceError};

use crate::restriction::{self, Restriction};

/// A single tunable parameter and its ordered candidate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDomain {
    /// Parameter name as used in restrictions (e.g. "block_size_x").
    pub name: String,
    /// Candidate values; order defines adjacency and snapping ties.
    pub values: Vec<ParamValue>,
}

impl ParameterDomain {
    pub fn new<V: Into<ParamValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of `value` in the domain.
    pub fn position(&self, value: &ParamValue) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    fn is_numeric(&self) -> bool {
        self.values.iter().all(ParamValue::is_numeric)
    }
}

/// How neighboring configurations are defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborMethod {
    /// Any other value of a single parameter.
    #[default]
    Hamming,
    /// The preceding or following value of a single parameter.
    Adjacent,
}

impl FromStr for NeighborMethod {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hamming" => Ok(Self::Hamming),
            "adjacent" => Ok(Self::Adjacent),
            _ => Err(OptionError::InvalidValue {
                option: "neighbor".to_string(),
                value: s.to_string(),
                message: "choose from Hamming or Adjacent".to_string(),
            }),
        }
    }
}

impl fmt::Display for NeighborMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hamming => f.write_str("Hamming"),
            Self::Adjacent => f.write_str("Adjacent"),
        }
    }
}

/// Thresholds controlling how the legal set is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpaceLimits {
    /// Largest cartesian product that is enumerated up front.
    pub enumeration_limit: u128,
    /// Largest restricted product that is counted by streaming.
    pub count_limit: u128,
    /// Rejection-sampling attempts per draw before falling back to streaming.
    pub rejection_attempts: usize,
}

impl Default for SpaceLimits {
    fn default() -> Self {
        Self {
            enumeration_limit: 1 << 20,
            count_limit: 1 << 26,
            rejection_attempts: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
enum LegalSet {
    /// Every legal configuration, in enumeration order.
    Enumerated(Vec<Configuration>),
    /// No restrictions: the full product is legal.
    Unrestricted,
    /// Restricted and too large to store; counted but not stored.
    Streamed,
}

/// Iterates index tuples of a cartesian product, last dimension fastest.
struct Odometer {
    radices: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl Odometer {
    fn new(radices: Vec<usize>) -> Self {
        let current = if radices.iter().all(|&r| r > 0) {
            Some(vec![0; radices.len()])
        } else {
            None
        };
        Self { radices, current }
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        let mut next = current.clone();
        for d in (0..next.len()).rev() {
            next[d] += 1;
            if next[d] < self.radices[d] {
                self.current = Some(next);
                break;
            }
            next[d] = 0;
        }
        Some(current)
    }
}

/// The set of legal configurations implied by domains and restrictions.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    domains: Vec<ParameterDomain>,
    names: Vec<String>,
    restrictions: Vec<Restriction>,
    numeric: Vec<bool>,
    product: u128,
    size: usize,
    legal: LegalSet,
    limits: SpaceLimits,
}

impl SearchSpace {
    /// Build a space with default [`SpaceLimits`].
    pub fn new(domains: Vec<ParameterDomain>, restrictions: &[String]) -> KtResult<Self> {
        Self::with_limits(domains, restrictions, SpaceLimits::default())
    }

    pub fn with_limits(
        domains: Vec<ParameterDomain>,
        restrictions: &[String],
        limits: SpaceLimits,
    ) -> KtResult<Self> {
        validate_domains(&domains)?;

        let names: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
        let restrictions = restriction::compile_all(restrictions, &names)?;
        let numeric = domains.iter().map(ParameterDomain::is_numeric).collect();

        let product = domains
            .iter()
            .try_fold(1u128, |acc, d| acc.checked_mul(d.len() as u128))
            .ok_or(SpaceError::TooLarge {
                product: u128::MAX,
                limit: usize::MAX as u128,
            })?;

        let mut space = Self {
            domains,
            names,
            restrictions,
            numeric,
            product,
            size: 0,
            legal: LegalSet::Unrestricted,
            limits,
        };

        if product <= limits.enumeration_limit {
            let configs: Vec<Configuration> = space
                .product_iter()
                .filter(|c| space.satisfies_restrictions(c))
                .collect();
            space.size = configs.len();
            space.legal = LegalSet::Enumerated(configs);
        } else if space.restrictions.is_empty() {
            space.size = usize::try_from(product).map_err(|_| SpaceError::TooLarge {
                product,
                limit: usize::MAX as u128,
            })?;
            space.legal = LegalSet::Unrestricted;
        } else if product <= limits.count_limit {
            space.size = space
                .product_iter()
                .filter(|c| space.satisfies_restrictions(c))
                .count();
            space.legal = LegalSet::Streamed;
        } else {
            return Err(SpaceError::TooLarge {
                product,
                limit: limits.count_limit,
            }
            .into());
        }

        if space.size == 0 {
            return Err(SpaceError::NoLegalConfigurations.into());
        }

        info!(
            "Built search space: {} legal of {} configurations over {} parameters",
            space.size,
            space.product,
            space.dimensions()
        );
        Ok(space)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn domains(&self) -> &[ParameterDomain] {
        &self.domains
    }

    pub fn domain(&self, index: usize) -> Option<&ParameterDomain> {
        self.domains.get(index)
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn limits(&self) -> SpaceLimits {
        self.limits
    }

    /// Number of tunable parameters.
    pub fn dimensions(&self) -> usize {
        self.domains.len()
    }

    /// Exact number of legal configurations.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the unrestricted cartesian product.
    pub fn product(&self) -> u128 {
        self.product
    }

    pub fn is_enumerated(&self) -> bool {
        matches!(self.legal, LegalSet::Enumerated(_))
    }

    /// All legal configurations in enumeration order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        match &self.legal {
            LegalSet::Enumerated(configs) => Box::new(configs.iter().cloned()),
            LegalSet::Unrestricted => Box::new(self.product_iter()),
            LegalSet::Streamed => Box::new(
                self.product_iter()
                    .filter(move |c| self.satisfies_restrictions(c)),
            ),
        }
    }

    /// Whether every value belongs to its domain and every restriction holds.
    pub fn is_legal(&self, config: &Configuration) -> bool {
        config.len() == self.dimensions()
            && config
                .values()
                .iter()
                .zip(&self.domains)
                .all(|(value, domain)| domain.position(value).is_some())
            && self.satisfies_restrictions(config)
    }

    fn satisfies_restrictions(&self, config: &Configuration) -> bool {
        restriction::check_restrictions(&self.restrictions, config.values())
    }

    fn product_iter(&self) -> impl Iterator<Item = Configuration> + '_ {
        Odometer::new(self.domains.iter().map(ParameterDomain::len).collect())
            .map(move |indices| self.from_indices(&indices))
    }

    fn from_indices(&self, indices: &[usize]) -> Configuration {
        Configuration::new(
            indices
                .iter()
                .zip(&self.domains)
                .map(|(&i, d)| d.values[i].clone())
                .collect(),
        )
    }

    fn random_product_member<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        Configuration::new(
            self.domains
                .iter()
                .map(|d| d.values[rng.random_range(0..d.len())].clone())
                .collect(),
        )
    }

    /// One uniformly drawn legal configuration.
    pub fn sample_one<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        match &self.legal {
            LegalSet::Enumerated(configs) => configs[rng.random_range(0..configs.len())].clone(),
            LegalSet::Unrestricted => self.random_product_member(rng),
            LegalSet::Streamed => {
                for _ in 0..self.limits.rejection_attempts {
                    let candidate = self.random_product_member(rng);
                    if self.satisfies_restrictions(&candidate) {
                        return candidate;
                    }
                }
                debug!(
                    "Rejection sampling gave up after {} attempts, streaming instead",
                    self.limits.rejection_attempts
                );
                let k = rng.random_range(0..self.size);
                self.iter()
                    .nth(k)
                    .unwrap_or_else(|| self.random_product_member(rng))
            }
        }
    }

    /// `min(n, size)` distinct legal configurations, drawn uniformly.
    pub fn random_sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Configuration> {
        let n = n.min(self.size);
        if let LegalSet::Enumerated(configs) = &self.legal {
            return index::sample(rng, configs.len(), n)
                .into_iter()
                .map(|i| configs[i].clone())
                .collect();
        }

        let mut seen = HashSet::with_capacity(n);
        let mut sample = Vec::with_capacity(n);
        while sample.len() < n {
            let candidate = self.sample_one(rng);
            if seen.insert(candidate.clone()) {
                sample.push(candidate);
            }
        }
        sample
    }

    /// Per-parameter `[min, max]` of numeric values, or of indices for
    /// non-numeric domains.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.domains
            .iter()
            .zip(&self.numeric)
            .map(|(domain, &numeric)| {
                if numeric {
                    domain
                        .values
                        .iter()
                        .filter_map(ParamValue::as_f64)
                        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                            (lo.min(v), hi.max(v))
                        })
                } else {
                    (0.0, (domain.len() - 1) as f64)
                }
            })
            .collect()
    }

    /// Map a point of the unit cube onto [`SearchSpace::bounds`].
    pub fn unscale(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(self.bounds())
            .map(|(u, (lo, hi))| lo + u * (hi - lo))
            .collect()
    }

    /// Snap a continuous point to the nearest domain value per parameter.
    ///
    /// Ties resolve to the lower domain index; non-numeric domains are
    /// snapped by index.
    pub fn snap(&self, point: &[f64]) -> Configuration {
        let values = self
            .domains
            .iter()
            .zip(&self.numeric)
            .enumerate()
            .map(|(i, (domain, &numeric))| {
                let x = point.get(i).copied().unwrap_or(f64::NAN);
                let idx = if numeric {
                    nearest_index(&domain.values, x)
                } else if x.is_finite() {
                    x.round().clamp(0.0, (domain.len() - 1) as f64) as usize
                } else {
                    0
                };
                domain.values[idx].clone()
            })
            .collect();
        Configuration::new(values)
    }

    /// Numeric coordinates of a configuration, the inverse of [`SearchSpace::snap`].
    pub fn to_point(&self, config: &Configuration) -> Vec<f64> {
        config
            .values()
            .iter()
            .zip(&self.domains)
            .zip(&self.numeric)
            .map(|((value, domain), &numeric)| {
                if numeric {
                    value.as_f64().unwrap_or(f64::NAN)
                } else {
                    domain.position(value).map_or(f64::NAN, |i| i as f64)
                }
            })
            .collect()
    }

    /// Legal configurations differing from `config` only at `index`.
    pub fn param_neighbors(
        &self,
        config: &Configuration,
        index: usize,
        method: NeighborMethod,
    ) -> Vec<Configuration> {
        let (Some(domain), Some(current)) = (self.domains.get(index), config.get(index)) else {
            return Vec::new();
        };

        let candidates: Vec<&ParamValue> = match method {
            NeighborMethod::Hamming => domain.values.iter().filter(|v| *v != current).collect(),
            NeighborMethod::Adjacent => match domain.position(current) {
                Some(pos) => [pos.checked_sub(1), Some(pos + 1)]
                    .into_iter()
                    .flatten()
                    .filter_map(|i| domain.values.get(i))
                    .collect(),
                None => Vec::new(),
            },
        };

        candidates
            .into_iter()
            .map(|value| config.with_value(index, value.clone()))
            .filter(|neighbor| self.is_legal(neighbor))
            .collect()
    }

    /// All legal single-parameter neighbors of `config`.
    pub fn neighbors(&self, config: &Configuration, method: NeighborMethod) -> Vec<Configuration> {
        (0..self.dimensions())
            .flat_map(|index| self.param_neighbors(config, index, method))
            .collect()
    }
}

/// Linear scan for the value closest to `x`; the first (lowest index) wins ties.
fn nearest_index(values: &[ParamValue], x: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, value) in values.iter().enumerate() {
        let distance = value.as_f64().map_or(f64::INFINITY, |v| (v - x).abs());
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

fn validate_domains(domains: &[ParameterDomain]) -> Result<(), SpaceError> {
    if domains.is_empty() {
        return Err(SpaceError::NoParameters);
    }
    let mut names = HashSet::new();
    for domain in domains {
        if !names.insert(domain.name.as_str()) {
            return Err(SpaceError::DuplicateParameter {
                name: domain.name.clone(),
            });
        }
        if domain.is_empty() {
            return Err(SpaceError::EmptyDomain {
                name: domain.name.clone(),
            });
        }
        let mut seen = HashSet::new();
        for value in &domain.values {
            if !seen.insert(value) {
                return Err(SpaceError::DuplicateValue {
                    name: domain.name.clone(),
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(())
}
