//! Typed feature identifiers and feature vectors

use crate::error::{FraudError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of anonymized `V1..V28` columns
pub const ANONYMIZED_COUNT: usize = 28;

/// Number of derived (named) features
pub const DERIVED_COUNT: usize = 10;

/// Total number of feature slots in a [`FeatureVector`]
pub const FEATURE_COUNT: usize = DERIVED_COUNT + ANONYMIZED_COUNT;

/// Identifier of a model input feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FeatureId {
    Amount,
    Hour,
    DayOfWeek,
    MerchantRisk,
    LocationRisk,
    AmountZScore,
    TimeRisk,
    DeviceRisk,
    Velocity,
    Frequency,
    /// Anonymized numeric column `V1..V28`, 1-based. Values outside
    /// `1..=28` have no slot: they are never stored and always read as unknown.
    /// Prefer [`FeatureId::anonymized`], which checks the range.
    Anonymized(u8),
}

impl FeatureId {
    /// The named, derived features in slot order
    pub const DERIVED: [FeatureId; DERIVED_COUNT] = [
        FeatureId::Amount,
        FeatureId::Hour,
        FeatureId::DayOfWeek,
        FeatureId::MerchantRisk,
        FeatureId::LocationRisk,
        FeatureId::AmountZScore,
        FeatureId::TimeRisk,
        FeatureId::DeviceRisk,
        FeatureId::Velocity,
        FeatureId::Frequency,
    ];

    /// `V{n}`, or `None` when `n` is outside `1..=28`
    pub fn anonymized(n: u8) -> Option<Self> {
        (1..=ANONYMIZED_COUNT as u8)
            .contains(&n)
            .then_some(FeatureId::Anonymized(n))
    }

    /// Slot index inside a feature vector; `FEATURE_COUNT` for an
    /// out-of-range anonymized column
    pub fn index(&self) -> usize {
        match self {
            FeatureId::Amount => 0,
            FeatureId::Hour => 1,
            FeatureId::DayOfWeek => 2,
            FeatureId::MerchantRisk => 3,
            FeatureId::LocationRisk => 4,
            FeatureId::AmountZScore => 5,
            FeatureId::TimeRisk => 6,
            FeatureId::DeviceRisk => 7,
            FeatureId::Velocity => 8,
            FeatureId::Frequency => 9,
            FeatureId::Anonymized(n) if (1..=ANONYMIZED_COUNT as u8).contains(n) => {
                DERIVED_COUNT + *n as usize - 1
            }
            FeatureId::Anonymized(_) => FEATURE_COUNT,
        }
    }

    /// Inverse of [`FeatureId::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        if index < DERIVED_COUNT {
            Some(Self::DERIVED[index])
        } else if index < FEATURE_COUNT {
            Some(FeatureId::Anonymized((index - DERIVED_COUNT + 1) as u8))
        } else {
            None
        }
    }

    /// All feature identifiers in slot order
    pub fn all() -> impl Iterator<Item = FeatureId> {
        (0..FEATURE_COUNT).filter_map(FeatureId::from_index)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureId::Amount => "amount",
            FeatureId::Hour => "hour",
            FeatureId::DayOfWeek => "day_of_week",
            FeatureId::MerchantRisk => "merchant_risk",
            FeatureId::LocationRisk => "location_risk",
            FeatureId::AmountZScore => "amount_zscore",
            FeatureId::TimeRisk => "time_risk",
            FeatureId::DeviceRisk => "device_risk",
            FeatureId::Velocity => "velocity",
            FeatureId::Frequency => "frequency",
            FeatureId::Anonymized(n) => return write!(f, "V{}", n),
        };
        f.write_str(name)
    }
}

impl FromStr for FeatureId {
    type Err = FraudError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix('V').or_else(|| s.strip_prefix('v')) {
            if let Some(id) = rest.parse::<u8>().ok().and_then(FeatureId::anonymized) {
                return Ok(id);
            }
        }
        FeatureId::DERIVED
            .iter()
            .copied()
            .find(|id| id.to_string() == s)
            .ok_or_else(|| FraudError::InvalidInput(format!("unknown feature '{}'", s)))
    }
}

impl From<FeatureId> for String {
    fn from(id: FeatureId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for FeatureId {
    type Error = FraudError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Fixed-arity feature vector.
///
/// Every slot is either a finite value or `None`, the explicit "unknown"
/// sentinel. Vectors are built once by the extractor and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<Option<f64>>,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureVector {
    /// Vector with every feature unknown
    pub fn new() -> Self {
        Self {
            values: vec![None; FEATURE_COUNT],
        }
    }

    /// Build from feature/value pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (FeatureId, f64)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |v, (id, value)| v.with(id, value))
    }

    /// Return a copy with one feature set. Non-finite values are stored as unknown.
    pub fn with(mut self, id: FeatureId, value: f64) -> Self {
        self.set(id, value);
        self
    }

    pub(crate) fn set(&mut self, id: FeatureId, value: f64) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = Some(value).filter(|v| v.is_finite());
        }
    }

    /// Value of a feature, `None` when unknown
    pub fn get(&self, id: FeatureId) -> Option<f64> {
        self.values.get(id.index()).copied().flatten()
    }

    /// Whether a feature is known
    pub fn contains(&self, id: FeatureId) -> bool {
        self.get(id).is_some()
    }

    /// Known features and their values
    pub fn present(&self) -> impl Iterator<Item = (FeatureId, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((FeatureId::from_index(i)?, (*v)?)))
    }

    /// Dense values for `features`, substituting `fallback[i]` for unknowns
    pub fn dense(&self, features: &[FeatureId], fallback: &[f64]) -> Vec<f64> {
        features
            .iter()
            .enumerate()
            .map(|(i, id)| {
                self.get(*id)
                    .unwrap_or_else(|| fallback.get(i).copied().unwrap_or(0.0))
            })
            .collect()
    }
}

/// Features known in every vector, in slot order
pub fn common_features(vectors: &[FeatureVector]) -> Vec<FeatureId> {
    if vectors.is_empty() {
        return Vec::new();
    }
    FeatureId::all()
        .filter(|id| vectors.iter().all(|v| v.contains(*id)))
        .collect()
}

/// Keep the `wanted` features that are known in every vector
pub fn select_features(vectors: &[FeatureVector], wanted: &[FeatureId]) -> Result<Vec<FeatureId>> {
    let common = common_features(vectors);
    let selected: Vec<FeatureId> = wanted
        .iter()
        .copied()
        .filter(|id| common.contains(id))
        .collect();
    if selected.is_empty() {
        return Err(FraudError::InvalidInput(format!(
            "none of the requested features {:?} is present in every training record",
            wanted.iter().map(|f| f.to_string()).collect::<Vec<_>>()
        )));
    }
    Ok(selected)
}

/// Dense `n_samples x features.len()` matrix.
///
/// Every vector must know every feature; use [`common_features`] or
/// [`select_features`] to choose the columns.
pub fn feature_matrix(vectors: &[FeatureVector], features: &[FeatureId]) -> Array2<f64> {
    Array2::from_shape_fn((vectors.len(), features.len()), |(i, j)| {
        vectors[i].get(features[j]).unwrap_or(0.0)
    })
}
