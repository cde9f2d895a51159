//! Multi-resolution registration driver.
//!
//! Runs the configured metric/optimizer pair over a coarse-to-fine volume
//! pyramid; for the rigid-then-affine cascade the converged rigid fit
//! seeds the affine stage.

use tracing::info;

use voxreg_core::filter::MultiResolutionPyramid;
use voxreg_core::spatial::{Point3, Vector3};
use voxreg_core::transform::{AffineTransform, RigidTransform, SpatialTransform};
use voxreg_core::Volume;

use crate::config::{MetricType, OptimizerType, RegistrationConfig, TransformType};
use crate::error::{RegistrationError, Result};
use crate::metric::MindMetric;
use crate::optimizer::{
    GaussNewtonOptimizer, RegularStepGradientDescentOptimizer, StopCondition,
};

/// The transform produced by a registration run.
#[derive(Debug, Clone)]
pub enum FittedTransform {
    Rigid(RigidTransform),
    Affine(AffineTransform),
}

impl FittedTransform {
    /// The fitted parameter vector.
    pub fn parameters(&self) -> Vec<f64> {
        match self {
            Self::Rigid(transform) => transform.parameters(),
            Self::Affine(transform) => transform.parameters(),
        }
    }

    /// Map a fixed-space point through the fitted transform.
    pub fn transform_point(&self, point: &Point3) -> Point3 {
        match self {
            Self::Rigid(transform) => transform.transform_point(point),
            Self::Affine(transform) => transform.transform_point(point),
        }
    }
}

/// Outcome of [`register`].
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub transform: FittedTransform,
    /// Final cost at the finest optimized level.
    pub final_value: f64,
    /// Stop condition of the last optimizer run.
    pub stop_condition: StopCondition,
}

/// Register `moving` onto `fixed` according to `config`.
pub fn register(
    fixed: &Volume,
    moving: &Volume,
    config: &RegistrationConfig,
) -> Result<RegistrationResult> {
    if config.metric_type == MetricType::MattesMutualInformation {
        return Err(RegistrationError::invalid_configuration(
            "the Mattes mutual-information metric is not provided by this crate; use MIND",
        ));
    }
    if config.shrink_factors.is_empty() {
        return Err(RegistrationError::invalid_configuration(
            "at least one pyramid level is required",
        ));
    }

    let center = volume_center(fixed);

    match config.transform_type {
        TransformType::Rigid => {
            let (transform, final_value, stop_condition) =
                run_stage(fixed, moving, config, RigidTransform::identity(center))?;
            Ok(RegistrationResult {
                transform: FittedTransform::Rigid(transform),
                final_value,
                stop_condition,
            })
        }
        TransformType::Affine => {
            let (transform, final_value, stop_condition) =
                run_stage(fixed, moving, config, AffineTransform::identity(center))?;
            Ok(RegistrationResult {
                transform: FittedTransform::Affine(transform),
                final_value,
                stop_condition,
            })
        }
        TransformType::RigidThenAffine => {
            info!("cascade stage 1: rigid");
            let (rigid, _, _) =
                run_stage(fixed, moving, config, RigidTransform::identity(center))?;

            info!("cascade stage 2: affine seeded from rigid");
            let seeded = AffineTransform::from_rigid(&rigid);
            let (transform, final_value, stop_condition) =
                run_stage(fixed, moving, config, seeded)?;
            Ok(RegistrationResult {
                transform: FittedTransform::Affine(transform),
                final_value,
                stop_condition,
            })
        }
    }
}

/// Run one transform stage over the full pyramid schedule.
fn run_stage<T: SpatialTransform>(
    fixed: &Volume,
    moving: &Volume,
    config: &RegistrationConfig,
    transform: T,
) -> Result<(T, f64, StopCondition)> {
    let levels = config.num_levels();
    let sigmas: Vec<f64> = (0..levels)
        .map(|level| schedule(&config.smoothing_sigmas, level, 0.0))
        .collect();
    let fixed_pyramid = MultiResolutionPyramid::new(fixed, &config.shrink_factors, &sigmas);
    let moving_pyramid = MultiResolutionPyramid::new(moving, &config.shrink_factors, &sigmas);

    let mut metric = MindMetric::new(transform)
        .with_radius(config.mind_radius)
        .with_sigma(config.mind_sigma)
        .with_neighborhood(config.mind_neighborhood)
        .with_sampling_percentage(config.sampling_percentage)
        .with_stratified_sampling(config.use_stratified_sampling)
        .with_random_seed(config.random_seed);

    let mut final_value = 0.0;
    let mut stop_condition = StopCondition::MaximumIterations;

    for level in 0..levels {
        let iterations = schedule(&config.number_of_iterations, level, 100);
        let learning_rate = schedule(&config.learning_rate, level, 1.0);
        if iterations == 0 {
            info!(level, "skipping level with zero iteration budget");
            continue;
        }

        let fixed_level = fixed_pyramid.level(level);
        let moving_level = moving_pyramid.level(level);
        info!(
            level,
            fixed_size = ?fixed_level.size(),
            moving_size = ?moving_level.size(),
            iterations,
            learning_rate,
            "starting pyramid level"
        );

        metric.set_fixed_volume(fixed_level.clone());
        metric.set_moving_volume(moving_level.clone());
        metric.initialize()?;

        let outcome = match config.effective_optimizer() {
            OptimizerType::GaussNewton => GaussNewtonOptimizer::new()
                .with_learning_rate(learning_rate)
                .with_number_of_iterations(iterations)
                .with_minimum_step_length(config.minimum_step_length)
                .with_relaxation_factor(config.relaxation_factor)
                .with_gradient_magnitude_tolerance(config.gradient_magnitude_tolerance)
                .with_line_search(config.use_line_search)
                .with_levenberg_marquardt(config.use_levenberg_marquardt)
                .with_damping_factor(config.damping_factor)
                .optimize(&mut metric),
            OptimizerType::RegularStepGradientDescent => {
                RegularStepGradientDescentOptimizer::new()
                    .with_learning_rate(learning_rate)
                    .with_number_of_iterations(iterations)
                    .with_minimum_step_length(config.minimum_step_length)
                    .with_relaxation_factor(config.relaxation_factor)
                    .with_gradient_magnitude_tolerance(config.gradient_magnitude_tolerance)
                    .optimize(&mut metric)
            }
        };

        final_value = outcome.final_value;
        stop_condition = outcome.stop_condition;
        info!(
            level,
            cost = final_value,
            ?stop_condition,
            iterations = outcome.iterations,
            "finished pyramid level"
        );
    }

    Ok((metric.into_transform(), final_value, stop_condition))
}

/// Per-level schedule lookup; schedules shorter than the pyramid repeat
/// their last entry.
fn schedule<V: Copy>(values: &[V], level: usize, default: V) -> V {
    values
        .get(level)
        .or_else(|| values.last())
        .copied()
        .unwrap_or(default)
}

fn volume_center(volume: &Volume) -> Point3 {
    let size = volume.size();
    volume.continuous_index_to_physical(&Vector3::new(
        (size[0] - 1) as f64 / 2.0,
        (size[1] - 1) as f64 / 2.0,
        (size[2] - 1) as f64 / 2.0,
    ))
}
