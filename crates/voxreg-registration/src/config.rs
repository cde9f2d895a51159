//! Registration configuration record and tolerant JSON ingestion.
//!
//! The configuration file is a flat JSON object of recognized keys;
//! unknown keys are ignored and malformed values fall back to their
//! defaults with a warning, so a partially wrong file still produces a
//! runnable configuration.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{RegistrationError, Result};
use crate::metric::NeighborhoodType;

/// Spatial transform model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransformType {
    /// 6-parameter rigid transform.
    Rigid,
    /// 12-parameter affine transform.
    Affine,
    /// Two-stage cascade: a rigid fit seeds an affine fit.
    RigidThenAffine,
}

impl TransformType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "rigid" => Some(Self::Rigid),
            "affine" => Some(Self::Affine),
            "rigidthenaffine" | "rigid+affine" | "rigidaffine" => Some(Self::RigidThenAffine),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rigid => "Rigid",
            Self::Affine => "Affine",
            Self::RigidThenAffine => "RigidThenAffine",
        }
    }
}

/// Similarity metric driving the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricType {
    /// Mattes mutual information (kept for file compatibility; not
    /// provided by this crate).
    MattesMutualInformation,
    /// MIND descriptor SSD.
    Mind,
}

impl MetricType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "mind" => Some(Self::Mind),
            "mattesmutualinformation" | "mattes" | "mutualinformation" | "mi" => {
                Some(Self::MattesMutualInformation)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MattesMutualInformation => "MattesMutualInformation",
            Self::Mind => "MIND",
        }
    }
}

/// Parameter optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OptimizerType {
    RegularStepGradientDescent,
    GaussNewton,
}

impl OptimizerType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "gaussnewton" | "gn" | "lm" | "levenbergmarquardt" => Some(Self::GaussNewton),
            "regularstepgradientdescent" | "gradientdescent" | "rsgd" | "gd" => {
                Some(Self::RegularStepGradientDescent)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RegularStepGradientDescent => "RegularStepGradientDescent",
            Self::GaussNewton => "GaussNewton",
        }
    }
}

/// Typed record of the registration pipeline choices and schedules.
///
/// Array-valued fields are per-pyramid-level, ordered coarse to fine.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub transform_type: TransformType,
    pub metric_type: MetricType,
    /// Explicit optimizer choice; `None` derives it from the metric
    /// (MIND → Gauss-Newton, Mattes → gradient descent).
    pub optimizer_type: Option<OptimizerType>,

    // Sampling.
    pub sampling_percentage: f64,
    pub use_stratified_sampling: bool,
    pub random_seed: u64,

    // MIND.
    pub mind_radius: usize,
    /// Informational; the descriptor pipeline normalizes by the local
    /// variance estimate rather than a constant sigma.
    pub mind_sigma: f64,
    pub mind_neighborhood: NeighborhoodType,

    // Per-level schedules.
    pub learning_rate: Vec<f64>,
    pub number_of_iterations: Vec<u32>,
    pub shrink_factors: Vec<usize>,
    pub smoothing_sigmas: Vec<f64>,

    // Optimizer knobs.
    pub minimum_step_length: f64,
    pub relaxation_factor: f64,
    pub gradient_magnitude_tolerance: f64,

    // Gauss-Newton knobs.
    pub use_line_search: bool,
    pub use_levenberg_marquardt: bool,
    pub damping_factor: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            transform_type: TransformType::Rigid,
            metric_type: MetricType::Mind,
            optimizer_type: None,
            sampling_percentage: 0.25,
            use_stratified_sampling: true,
            random_seed: 121212,
            mind_radius: 1,
            mind_sigma: 0.8,
            mind_neighborhood: NeighborhoodType::SixConnected,
            learning_rate: vec![2.0, 1.0, 0.5, 0.1, 0.05],
            number_of_iterations: vec![1000, 500, 250, 100, 0],
            shrink_factors: vec![12, 8, 4, 2, 1],
            smoothing_sigmas: vec![4.0, 3.0, 2.0, 1.0, 1.0],
            minimum_step_length: 1e-6,
            relaxation_factor: 0.5,
            gradient_magnitude_tolerance: 1e-6,
            use_line_search: true,
            use_levenberg_marquardt: true,
            damping_factor: 1e-3,
        }
    }
}

impl RegistrationConfig {
    /// The optimizer to run: the explicit choice when present, otherwise
    /// derived from the metric.
    pub fn effective_optimizer(&self) -> OptimizerType {
        self.optimizer_type.unwrap_or(match self.metric_type {
            MetricType::Mind => OptimizerType::GaussNewton,
            MetricType::MattesMutualInformation => OptimizerType::RegularStepGradientDescent,
        })
    }

    /// Number of pyramid levels implied by the shrink schedule.
    pub fn num_levels(&self) -> usize {
        self.shrink_factors.len()
    }

    /// Parse a configuration from a JSON document.
    ///
    /// Unknown keys are ignored; a malformed value warns and keeps that
    /// field's default. Only an unparseable document or a non-object root
    /// is an error.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| RegistrationError::invalid_configuration(format!("invalid JSON: {e}")))?;
        let object = document.as_object().ok_or_else(|| {
            RegistrationError::invalid_configuration("configuration root must be a JSON object")
        })?;

        let mut config = Self::default();

        for (key, value) in object {
            match key.as_str() {
                "transformType" => {
                    set_enum(key, value, TransformType::parse, &mut config.transform_type)
                }
                "metricType" => set_enum(key, value, MetricType::parse, &mut config.metric_type),
                "optimizerType" => match value.as_str().and_then(OptimizerType::parse) {
                    Some(parsed) => config.optimizer_type = Some(parsed),
                    None => warn!(key = key.as_str(), ?value, "unrecognized optimizer, keeping default"),
                },
                "samplingPercentage" => set_f64(key, value, &mut config.sampling_percentage),
                "useStratifiedSampling" => set_bool(key, value, &mut config.use_stratified_sampling),
                "randomSeed" => set_u64(key, value, &mut config.random_seed),
                "mindRadius" => set_usize(key, value, &mut config.mind_radius),
                "mindSigma" => set_f64(key, value, &mut config.mind_sigma),
                "mindNeighborhoodType" => match value.as_str() {
                    Some(name) => config.mind_neighborhood = NeighborhoodType::from_name(name),
                    None => warn_type(key, "string"),
                },
                "learningRate" => set_f64_array(key, value, &mut config.learning_rate),
                "numberOfIterations" => set_u32_array(key, value, &mut config.number_of_iterations),
                "shrinkFactors" => set_usize_array(key, value, &mut config.shrink_factors),
                "smoothingSigmas" => set_f64_array(key, value, &mut config.smoothing_sigmas),
                "minimumStepLength" => set_f64(key, value, &mut config.minimum_step_length),
                "relaxationFactor" => set_f64(key, value, &mut config.relaxation_factor),
                "gradientMagnitudeTolerance" => {
                    set_f64(key, value, &mut config.gradient_magnitude_tolerance)
                }
                "useLineSearch" => set_bool(key, value, &mut config.use_line_search),
                "useLevenbergMarquardt" => {
                    set_bool(key, value, &mut config.use_levenberg_marquardt)
                }
                "dampingFactor" => set_f64(key, value, &mut config.damping_factor),
                _ => {} // Unknown keys are ignored.
            }
        }

        Ok(config)
    }

    /// Serialize the configuration as a JSON document.
    pub fn to_json_string(&self) -> String {
        let document = json!({
            "transformType": self.transform_type.name(),
            "metricType": self.metric_type.name(),
            "optimizerType": self.effective_optimizer().name(),
            "samplingPercentage": self.sampling_percentage,
            "useStratifiedSampling": self.use_stratified_sampling,
            "randomSeed": self.random_seed,
            "mindRadius": self.mind_radius,
            "mindSigma": self.mind_sigma,
            "mindNeighborhoodType": self.mind_neighborhood.name(),
            "learningRate": self.learning_rate,
            "numberOfIterations": self.number_of_iterations,
            "shrinkFactors": self.shrink_factors,
            "smoothingSigmas": self.smoothing_sigmas,
            "minimumStepLength": self.minimum_step_length,
            "relaxationFactor": self.relaxation_factor,
            "gradientMagnitudeTolerance": self.gradient_magnitude_tolerance,
            "useLineSearch": self.use_line_search,
            "useLevenbergMarquardt": self.use_levenberg_marquardt,
            "dampingFactor": self.damping_factor,
        });
        serde_json::to_string_pretty(&document).expect("configuration serializes")
    }
}

fn warn_type(key: &str, expected: &str) {
    warn!(key, expected, "ignoring configuration value of wrong type");
}

fn set_enum<E>(key: &str, value: &Value, parse: fn(&str) -> Option<E>, slot: &mut E) {
    match value.as_str().and_then(parse) {
        Some(parsed) => *slot = parsed,
        None => warn!(key, ?value, "unrecognized enum value, keeping default"),
    }
}

fn set_f64(key: &str, value: &Value, slot: &mut f64) {
    match value.as_f64() {
        Some(number) => *slot = number,
        None => warn_type(key, "number"),
    }
}

fn set_u64(key: &str, value: &Value, slot: &mut u64) {
    match value.as_u64() {
        Some(number) => *slot = number,
        None => warn_type(key, "unsigned integer"),
    }
}

fn set_usize(key: &str, value: &Value, slot: &mut usize) {
    match value.as_u64() {
        Some(number) => *slot = number as usize,
        None => warn_type(key, "unsigned integer"),
    }
}

/// Permissive boolean: `true`/`false`, or the strings
/// `"true"`/`"false"`/`"1"`/`"0"`/`"yes"`/`"no"` case-insensitively.
fn set_bool(key: &str, value: &Value, slot: &mut bool) {
    let parsed = match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    };
    match parsed {
        Some(flag) => *slot = flag,
        None => warn_type(key, "boolean"),
    }
}

/// Scalar-or-array acceptance: a lone number becomes a length-1 schedule.
fn numbers_of(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Number(number) => number.as_f64().map(|n| vec![n]),
        Value::Array(items) => items.iter().map(Value::as_f64).collect(),
        _ => None,
    }
}

fn set_f64_array(key: &str, value: &Value, slot: &mut Vec<f64>) {
    match numbers_of(value) {
        Some(numbers) if !numbers.is_empty() => *slot = numbers,
        _ => warn_type(key, "number or array of numbers"),
    }
}

fn set_u32_array(key: &str, value: &Value, slot: &mut Vec<u32>) {
    match numbers_of(value) {
        Some(numbers) if !numbers.is_empty() => {
            *slot = numbers.iter().map(|&n| n.max(0.0) as u32).collect()
        }
        _ => warn_type(key, "number or array of numbers"),
    }
}

fn set_usize_array(key: &str, value: &Value, slot: &mut Vec<usize>) {
    match numbers_of(value) {
        Some(numbers) if !numbers.is_empty() => {
            *slot = numbers.iter().map(|&n| n.max(0.0) as usize).collect()
        }
        _ => warn_type(key, "number or array of numbers"),
    }
}
