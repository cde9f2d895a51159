//! MIND-SSD similarity metric.
//!
//! Owns the fixed/moving descriptor stacks, the moving-descriptor spatial
//! gradients, and the fixed-image sample set; exposes the cost value, its
//! gradient with respect to the transform parameters, and the
//! residuals-plus-Jacobian view consumed by the Gauss-Newton optimizer.
//!
//! Descriptor stacks are rebuilt only when the corresponding volume
//! identity changes (or after [`MindMetric::reset_cache`]), so parameter
//! iterations within one pyramid level never pay the descriptor cost.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, info};

use voxreg_core::filter::kernels;
use voxreg_core::interpolation::{Interpolator, LinearInterpolator};
use voxreg_core::spatial::Vector3;
use voxreg_core::transform::SpatialTransform;
use voxreg_core::Volume;

use crate::error::{RegistrationError, Result};
use crate::optimizer::{CostProblem, ResidualJacobian};

use super::descriptor::{mind_descriptors, NeighborhoodType};
use super::sampler::{MaskFn, SamplePoint, Sampler};

/// Sample counts above this evaluate with a parallel reduction.
const PARALLEL_THRESHOLD: usize = 1000;

/// MIND-SSD metric over a parametric spatial transform.
///
/// The metric owns its transform; optimizers drive it through the
/// [`CostProblem`] implementation and the converged transform is read back
/// with [`MindMetric::transform`] or [`MindMetric::into_transform`].
pub struct MindMetric<T: SpatialTransform> {
    transform: T,
    fixed: Option<Volume>,
    moving: Option<Volume>,
    mask: Option<Box<MaskFn>>,

    radius: usize,
    sigma: f64,
    neighborhood: NeighborhoodType,
    sampling_percentage: f64,
    use_stratified_sampling: bool,
    random_seed: u64,
    use_analytical_gradient: bool,
    finite_difference_step: f64,

    fixed_descriptors: Vec<Volume>,
    moving_descriptors: Vec<Volume>,
    moving_gradients: Vec<[Volume; 3]>,
    samples: Vec<SamplePoint>,
    interpolator: LinearInterpolator,

    cached_fixed_id: Option<u64>,
    cached_moving_id: Option<u64>,
    fixed_descriptors_valid: bool,
    moving_descriptors_valid: bool,

    num_valid_samples: u32,
    current_value: f64,
}

impl<T: SpatialTransform> MindMetric<T> {
    /// Create a metric around a transform, with the standard defaults
    /// (radius 1, 6-connected, 25% stratified sampling).
    pub fn new(transform: T) -> Self {
        Self {
            transform,
            fixed: None,
            moving: None,
            mask: None,
            radius: 1,
            sigma: 0.8,
            neighborhood: NeighborhoodType::SixConnected,
            sampling_percentage: 0.25,
            use_stratified_sampling: true,
            random_seed: 121212,
            use_analytical_gradient: true,
            finite_difference_step: 1e-4,
            fixed_descriptors: Vec::new(),
            moving_descriptors: Vec::new(),
            moving_gradients: Vec::new(),
            samples: Vec::new(),
            interpolator: LinearInterpolator::new(),
            cached_fixed_id: None,
            cached_moving_id: None,
            fixed_descriptors_valid: false,
            moving_descriptors_valid: false,
            num_valid_samples: 0,
            current_value: 0.0,
        }
    }

    /// Patch radius of the descriptor pipeline.
    pub fn with_radius(mut self, radius: usize) -> Self {
        self.radius = radius;
        self
    }

    /// Informational decay parameter carried through configuration; the
    /// pipeline normalizes by the local variance estimate instead.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_neighborhood(mut self, neighborhood: NeighborhoodType) -> Self {
        self.neighborhood = neighborhood;
        self
    }

    pub fn with_sampling_percentage(mut self, percentage: f64) -> Self {
        self.sampling_percentage = percentage;
        self
    }

    pub fn with_stratified_sampling(mut self, stratified: bool) -> Self {
        self.use_stratified_sampling = stratified;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Switch the gradient between the analytical chain rule and forward
    /// finite differences.
    pub fn with_analytical_gradient(mut self, analytical: bool) -> Self {
        self.use_analytical_gradient = analytical;
        self
    }

    /// Restrict sampling to points accepted by `mask`.
    pub fn set_mask(&mut self, mask: Option<Box<MaskFn>>) {
        self.mask = mask;
    }

    /// Replace the fixed volume; descriptors rebuild on the next
    /// [`MindMetric::initialize`] if the identity changed.
    pub fn set_fixed_volume(&mut self, volume: Volume) {
        if self.cached_fixed_id != Some(volume.id()) {
            self.fixed_descriptors_valid = false;
        }
        self.fixed = Some(volume);
    }

    /// Replace the moving volume; descriptors and gradients rebuild on the
    /// next [`MindMetric::initialize`] if the identity changed.
    pub fn set_moving_volume(&mut self, volume: Volume) {
        if self.cached_moving_id != Some(volume.id()) {
            self.moving_descriptors_valid = false;
        }
        self.moving = Some(volume);
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut T {
        &mut self.transform
    }

    pub fn into_transform(self) -> T {
        self.transform
    }

    /// Number of descriptor channels.
    pub fn channel_count(&self) -> usize {
        self.neighborhood.channel_count()
    }

    /// Valid-sample count of the most recent evaluation.
    pub fn num_valid_samples(&self) -> u32 {
        self.num_valid_samples
    }

    /// Cost of the most recent evaluation.
    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    /// Build descriptors, gradients and the sample set.
    ///
    /// Fails when the fixed or moving volume is unset. Rebuild work is
    /// skipped for any volume whose identity matches the cached one.
    pub fn initialize(&mut self) -> Result<()> {
        if self.fixed.is_none() || self.moving.is_none() {
            return Err(RegistrationError::metric(
                "fixed and moving volumes must be set before initialization",
            ));
        }

        info!(
            radius = self.radius,
            sigma = self.sigma,
            neighborhood = self.neighborhood.name(),
            "initializing MIND metric"
        );

        let fixed = self.fixed.as_ref().expect("checked above");
        if self.cached_fixed_id != Some(fixed.id()) || !self.fixed_descriptors_valid {
            debug!("computing MIND descriptors for fixed volume");
            self.fixed_descriptors = mind_descriptors(fixed, self.neighborhood, self.radius);
            self.cached_fixed_id = Some(fixed.id());
            self.fixed_descriptors_valid = true;
        } else {
            debug!("using cached MIND descriptors for fixed volume");
        }

        let moving = self.moving.as_ref().expect("checked above");
        if self.cached_moving_id != Some(moving.id()) || !self.moving_descriptors_valid {
            debug!("computing MIND descriptors and gradients for moving volume");
            self.moving_descriptors = mind_descriptors(moving, self.neighborhood, self.radius);
            self.moving_gradients = self
                .moving_descriptors
                .iter()
                .map(kernels::gradient)
                .collect();
            self.cached_moving_id = Some(moving.id());
            self.moving_descriptors_valid = true;
        } else {
            debug!("using cached MIND descriptors for moving volume");
        }

        self.draw_samples();
        info!(samples = self.samples.len(), "MIND metric initialized");
        Ok(())
    }

    /// Rebuild the moving descriptors and gradients and redraw samples.
    ///
    /// Used by multi-resolution drivers between levels.
    pub fn reinitialize_sampling(&mut self) -> Result<()> {
        if self.fixed.is_none() {
            return Err(RegistrationError::metric("fixed volume must be set"));
        }
        let moving = self
            .moving
            .as_ref()
            .ok_or_else(|| RegistrationError::metric("moving volume must be set"))?;
        self.moving_descriptors = mind_descriptors(moving, self.neighborhood, self.radius);
        self.moving_gradients = self
            .moving_descriptors
            .iter()
            .map(kernels::gradient)
            .collect();
        self.cached_moving_id = Some(moving.id());
        self.moving_descriptors_valid = true;
        self.draw_samples();
        Ok(())
    }

    /// Drop all cached descriptor state.
    ///
    /// The cross-stage barrier of cascaded registration: the next
    /// [`MindMetric::initialize`] recomputes everything.
    pub fn reset_cache(&mut self) {
        self.cached_fixed_id = None;
        self.cached_moving_id = None;
        self.fixed_descriptors_valid = false;
        self.moving_descriptors_valid = false;
        debug!("MIND cache reset");
    }

    fn draw_samples(&mut self) {
        let fixed = self.fixed.as_ref().expect("fixed volume set");
        let sampler = Sampler {
            sampling_percentage: self.sampling_percentage,
            stratified: self.use_stratified_sampling,
            seed: self.random_seed,
            padding: self.radius + 1,
        };
        self.samples = sampler.sample(fixed, &self.fixed_descriptors, self.mask.as_deref());
    }

    /// Metric value at the current transform parameters.
    ///
    /// The mean squared descriptor difference over fully valid samples;
    /// `0` when no sample maps inside the moving buffer.
    pub fn value(&mut self) -> f64 {
        let (value, valid) = self.compute_ssd();
        self.num_valid_samples = valid;
        self.current_value = value;
        value
    }

    fn compute_ssd(&self) -> (f64, u32) {
        if self.samples.is_empty() || self.moving_descriptors.is_empty() {
            return (0.0, 0);
        }

        let (total, valid) = if self.samples.len() > PARALLEL_THRESHOLD {
            self.samples
                .par_iter()
                .map(|sample| self.sample_ssd(sample))
                .fold(
                    || (0.0f64, 0u32),
                    |(sum, count), term| match term {
                        Some(ssd) => (sum + ssd, count + 1),
                        None => (sum, count),
                    },
                )
                .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
        } else {
            self.samples
                .iter()
                .map(|sample| self.sample_ssd(sample))
                .fold((0.0f64, 0u32), |(sum, count), term| match term {
                    Some(ssd) => (sum + ssd, count + 1),
                    None => (sum, count),
                })
        };

        if valid == 0 {
            (0.0, 0)
        } else {
            let channels = self.moving_descriptors.len();
            (total / (valid as usize * channels) as f64, valid)
        }
    }

    /// Per-sample squared descriptor difference, or `None` when the
    /// transformed point leaves the moving buffer for any channel.
    fn sample_ssd(&self, sample: &SamplePoint) -> Option<f64> {
        let transformed = self.transform.transform_point(&sample.fixed_point);
        let mut ssd = 0.0;
        for (channel, descriptor) in self.moving_descriptors.iter().enumerate() {
            if !self.interpolator.is_inside(descriptor, &transformed) {
                return None;
            }
            let moving_value = self.interpolator.evaluate(descriptor, &transformed);
            let diff = sample.fixed_descriptor[channel] as f64 - moving_value;
            ssd += diff * diff;
        }
        Some(ssd)
    }

    /// Gradient of the metric with respect to the transform parameters.
    pub fn gradient(&mut self, gradient: &mut Vec<f64>) {
        if self.use_analytical_gradient {
            self.analytical_gradient(gradient);
        } else {
            self.finite_difference_gradient(gradient);
        }
    }

    /// Chain-rule gradient: `−2·(fixed − moving)·⟨∇M, ∂T/∂q⟩` accumulated
    /// over valid samples and channels, normalized by `valid · C`.
    fn analytical_gradient(&mut self, gradient: &mut Vec<f64>) {
        let n = self.transform.parameter_count();
        gradient.clear();
        gradient.resize(n, 0.0);

        if self.samples.is_empty() || self.moving_descriptors.is_empty() {
            return;
        }

        let (accumulated, valid) = if self.samples.len() > PARALLEL_THRESHOLD {
            self.samples
                .par_iter()
                .fold(
                    || (vec![0.0f64; n], 0u32),
                    |(mut acc, count), sample| {
                        if self.accumulate_sample_gradient(sample, &mut acc) {
                            (acc, count + 1)
                        } else {
                            (acc, count)
                        }
                    },
                )
                .reduce(
                    || (vec![0.0f64; n], 0u32),
                    |(mut a, ca), (b, cb)| {
                        for (left, right) in a.iter_mut().zip(&b) {
                            *left += right;
                        }
                        (a, ca + cb)
                    },
                )
        } else {
            let mut acc = vec![0.0f64; n];
            let mut count = 0u32;
            for sample in &self.samples {
                if self.accumulate_sample_gradient(sample, &mut acc) {
                    count += 1;
                }
            }
            (acc, count)
        };

        self.num_valid_samples = valid;
        if valid > 0 {
            let normalization = 1.0 / (valid as usize * self.moving_descriptors.len()) as f64;
            for (out, term) in gradient.iter_mut().zip(&accumulated) {
                *out = term * normalization;
            }
        }
    }

    /// Add one sample's gradient contribution into `acc`.
    ///
    /// Returns `false` (leaving `acc` untouched) when the sample is
    /// invalid; validity covers every channel and gradient axis so the
    /// sample set matches the residual view exactly.
    fn accumulate_sample_gradient(&self, sample: &SamplePoint, acc: &mut [f64]) -> bool {
        let transformed = self.transform.transform_point(&sample.fixed_point);

        let mut transform_jacobian = Vec::new();
        self.transform
            .parameter_jacobian(&sample.fixed_point, &mut transform_jacobian);

        let mut contribution = vec![0.0f64; acc.len()];
        for (channel, descriptor) in self.moving_descriptors.iter().enumerate() {
            if !self.interpolator.is_inside(descriptor, &transformed) {
                return false;
            }
            let gradients = &self.moving_gradients[channel];
            for axis in gradients.iter() {
                if !self.interpolator.is_inside(axis, &transformed) {
                    return false;
                }
            }

            let moving_value = self.interpolator.evaluate(descriptor, &transformed);
            let diff = sample.fixed_descriptor[channel] as f64 - moving_value;
            let descriptor_gradient = Vector3::new(
                self.interpolator.evaluate(&gradients[0], &transformed),
                self.interpolator.evaluate(&gradients[1], &transformed),
                self.interpolator.evaluate(&gradients[2], &transformed),
            );

            for (term, rows) in contribution.iter_mut().zip(&transform_jacobian) {
                *term += -2.0 * diff * descriptor_gradient.dot(rows);
            }
        }

        for (left, right) in acc.iter_mut().zip(&contribution) {
            *left += right;
        }
        true
    }

    /// Forward finite-difference gradient with the configured step.
    fn finite_difference_gradient(&mut self, gradient: &mut Vec<f64>) {
        let n = self.transform.parameter_count();
        gradient.clear();
        gradient.resize(n, 0.0);

        let current_parameters = self.transform.parameters();
        let current_value = self.compute_ssd().0;
        let step = self.finite_difference_step;

        for p in 0..n {
            let mut perturbed = current_parameters.clone();
            perturbed[p] += step;
            self.transform.set_parameters(&perturbed);
            let perturbed_value = self.compute_ssd().0;
            gradient[p] = (perturbed_value - current_value) / step;
        }

        self.transform.set_parameters(&current_parameters);
    }

    /// Residual vector and Jacobian for the Gauss-Newton optimizer.
    ///
    /// Rows come in channel-major order per sample; a sample contributes
    /// either all `C` rows or none, so residuals and Jacobian stay aligned
    /// and the residual count is `C · num_valid_samples`.
    pub fn residuals_and_jacobian(&mut self) -> ResidualJacobian {
        let n = self.transform.parameter_count();
        let channels = self.moving_descriptors.len();

        let mut residuals = Vec::with_capacity(self.samples.len() * channels);
        let mut rows = Vec::with_capacity(self.samples.len() * channels * n);
        let mut transform_jacobian = Vec::new();
        let mut valid = 0u32;

        'samples: for sample in &self.samples {
            let transformed = self.transform.transform_point(&sample.fixed_point);

            for (channel, descriptor) in self.moving_descriptors.iter().enumerate() {
                if !self.interpolator.is_inside(descriptor, &transformed) {
                    continue 'samples;
                }
                for axis in self.moving_gradients[channel].iter() {
                    if !self.interpolator.is_inside(axis, &transformed) {
                        continue 'samples;
                    }
                }
            }

            self.transform
                .parameter_jacobian(&sample.fixed_point, &mut transform_jacobian);

            for (channel, descriptor) in self.moving_descriptors.iter().enumerate() {
                let moving_value = self.interpolator.evaluate(descriptor, &transformed);
                residuals.push(sample.fixed_descriptor[channel] as f64 - moving_value);

                let gradients = &self.moving_gradients[channel];
                let descriptor_gradient = Vector3::new(
                    self.interpolator.evaluate(&gradients[0], &transformed),
                    self.interpolator.evaluate(&gradients[1], &transformed),
                    self.interpolator.evaluate(&gradients[2], &transformed),
                );

                for parameter_row in &transform_jacobian {
                    rows.push(-descriptor_gradient.dot(parameter_row));
                }
            }
            valid += 1;
        }

        self.num_valid_samples = valid;
        debug!(
            residuals = residuals.len(),
            valid_samples = valid,
            "assembled least-squares terms"
        );

        let jacobian = DMatrix::from_row_slice(residuals.len(), n, &rows);
        ResidualJacobian {
            residuals: DVector::from_vec(residuals),
            jacobian,
        }
    }
}

impl<T: SpatialTransform> CostProblem for MindMetric<T> {
    fn parameter_count(&self) -> usize {
        self.transform.parameter_count()
    }

    fn parameters(&self) -> Vec<f64> {
        self.transform.parameters()
    }

    fn set_parameters(&mut self, parameters: &[f64]) {
        self.transform.set_parameters(parameters);
    }

    fn value(&mut self) -> f64 {
        MindMetric::value(self)
    }

    fn gradient(&mut self, gradient: &mut Vec<f64>) {
        MindMetric::gradient(self, gradient);
    }

    fn has_least_squares(&self) -> bool {
        true
    }

    fn least_squares_terms(&mut self) -> Option<ResidualJacobian> {
        Some(self.residuals_and_jacobian())
    }
}
