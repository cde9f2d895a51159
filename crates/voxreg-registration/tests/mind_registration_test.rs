use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use voxreg_core::filter::kernels;
use voxreg_core::spatial::Point3;
use voxreg_core::transform::{RigidTransform, SpatialTransform};
use voxreg_registration::metric::MindMetric;
use voxreg_registration::optimizer::{
    CostProblem, GaussNewtonOptimizer, RegularStepGradientDescentOptimizer, StopCondition,
};
use voxreg_registration::registration::FittedTransform;
use voxreg_registration::{register, RegistrationConfig, TransformType};
use voxreg_core::Volume;

/// Standard-normal noise via Box-Muller.
fn gaussian_noise_volume(size: usize, seed: u64) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut volume = Volume::zeros([size, size, size]);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let u1: f64 = rng.gen_range(1e-12..1.0);
                let u2: f64 = rng.gen();
                let value = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                volume.set([x, y, z], value as f32);
            }
        }
    }
    volume
}

/// Two Gaussian blobs; the off-center one breaks rotational symmetry.
fn blob_volume(size: usize) -> Volume {
    let mut volume = Volume::zeros([size, size, size]);
    let center = (size - 1) as f64 / 2.0;
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let main = blob_term([x, y, z], [center, center, center], 4.0, 1.0);
                let side = blob_term([x, y, z], [6.0, 8.0, 12.0], 2.5, 0.8);
                volume.set([x, y, z], (main + side) as f32);
            }
        }
    }
    volume
}

fn blob_term(index: [usize; 3], center: [f64; 3], sigma: f64, amplitude: f64) -> f64 {
    let dx = index[0] as f64 - center[0];
    let dy = index[1] as f64 - center[1];
    let dz = index[2] as f64 - center[2];
    amplitude * (-(dx * dx + dy * dy + dz * dz) / (2.0 * sigma * sigma)).exp()
}

fn single_level_config(iterations: u32) -> RegistrationConfig {
    let mut config = RegistrationConfig::default();
    config.shrink_factors = vec![1];
    config.smoothing_sigmas = vec![0.0];
    config.number_of_iterations = vec![iterations];
    config.learning_rate = vec![1.0];
    config.sampling_percentage = 0.1;
    config
}

#[test]
fn test_identity_registration_on_noise() {
    // Identical fixed and moving noise volumes with an identity start:
    // the first residual vector is exactly zero, so the run terminates
    // immediately with an (unchanged) identity transform.
    let fixed = gaussian_noise_volume(32, 1234);
    let moving = fixed.clone();
    let config = single_level_config(50);

    let result = register(&fixed, &moving, &config).unwrap();

    assert!(result.final_value < 1e-4, "final MSE {}", result.final_value);
    assert!(matches!(
        result.stop_condition,
        StopCondition::StepTooSmall | StopCondition::Converged
    ));
    for parameter in result.transform.parameters() {
        assert!(parameter.abs() < 1e-3, "parameter drift {parameter}");
    }
}

#[test]
fn test_rigid_translation_recovery() {
    // The moving volume holds the fixed content shifted by +2 voxels
    // along x, so the fitted transform must map fixed points forward by
    // two spacings: tx -> +2.
    let fixed = blob_volume(24);
    let moving = kernels::shift(&fixed, [2, 0, 0]);

    // Baseline cost at the identity, with the same sampling as the run.
    // 10% keeps the stratified stride at 2, so samples cover the whole
    // interior instead of being capped to the low-z slices.
    let center = Point3::new(11.5, 11.5, 11.5);
    let mut baseline = MindMetric::new(RigidTransform::identity(center))
        .with_sampling_percentage(0.1);
    baseline.set_fixed_volume(fixed.clone());
    baseline.set_moving_volume(moving.clone());
    baseline.initialize().unwrap();
    let initial_value = baseline.value();
    assert!(initial_value > 0.0);

    let mut config = RegistrationConfig::default();
    config.shrink_factors = vec![2, 1];
    config.smoothing_sigmas = vec![1.0, 0.0];
    config.number_of_iterations = vec![100, 50];
    config.learning_rate = vec![1.0, 1.0];
    config.sampling_percentage = 0.1;

    let result = register(&fixed, &moving, &config).unwrap();
    let parameters = result.transform.parameters();

    assert!(
        (parameters[3] - 2.0).abs() < 0.4,
        "tx {} should approach 2.0",
        parameters[3]
    );
    assert!(parameters[4].abs() < 0.3, "ty {}", parameters[4]);
    assert!(parameters[5].abs() < 0.3, "tz {}", parameters[5]);
    for rotation in &parameters[0..3] {
        assert!(rotation.abs() < 0.15, "rotation {rotation}");
    }
    assert!(
        result.final_value < initial_value / 5.0,
        "cost {} vs initial {}",
        result.final_value,
        initial_value
    );
}

#[test]
fn test_constant_volume_terminates_degenerately() {
    // Constant intensity: descriptors carry no signal, gradients vanish.
    let mut fixed = Volume::zeros([16, 16, 16]);
    fixed.data_mut().fill(1.0);
    let moving = fixed.clone();
    let center = Point3::new(7.5, 7.5, 7.5);

    // Gauss-Newton path: the zero system yields a zero update.
    let mut metric = MindMetric::new(RigidTransform::identity(center))
        .with_sampling_percentage(0.1);
    metric.set_fixed_volume(fixed.clone());
    metric.set_moving_volume(moving.clone());
    metric.initialize().unwrap();

    let outcome = GaussNewtonOptimizer::new()
        .with_number_of_iterations(20)
        .optimize(&mut metric);
    assert!(matches!(
        outcome.stop_condition,
        StopCondition::StepTooSmall | StopCondition::GradientTooSmall | StopCondition::SingularMatrix
    ));
    assert!(outcome.iterations <= 3);
    for parameter in metric.parameters() {
        assert!(parameter.is_finite());
    }

    // Gradient-descent path: the zero gradient trips the magnitude test.
    let mut metric = MindMetric::new(RigidTransform::identity(center))
        .with_sampling_percentage(0.1);
    metric.set_fixed_volume(fixed);
    metric.set_moving_volume(moving);
    metric.initialize().unwrap();

    let outcome = RegularStepGradientDescentOptimizer::new()
        .with_number_of_iterations(20)
        .optimize(&mut metric);
    assert_eq!(outcome.stop_condition, StopCondition::GradientTooSmall);
    assert!(outcome.iterations <= 2);
}

#[test]
fn test_cascade_produces_affine_result() {
    let fixed = blob_volume(16);
    let moving = fixed.clone();

    let mut config = single_level_config(20);
    config.transform_type = TransformType::RigidThenAffine;

    let result = register(&fixed, &moving, &config).unwrap();

    let FittedTransform::Affine(affine) = result.transform else {
        panic!("cascade must end on an affine transform");
    };
    let parameters = affine.parameters();
    // Identity inputs leave both stages at their identity seeds.
    for (i, parameter) in parameters.iter().enumerate() {
        let expected = if i == 0 || i == 4 || i == 8 { 1.0 } else { 0.0 };
        assert!(
            (parameter - expected).abs() < 1e-6,
            "parameter {i} = {parameter}"
        );
    }
    assert!(result.final_value < 1e-8);
}

#[test]
fn test_twenty_six_connected_pipeline() {
    let fixed = blob_volume(10);
    let moving = fixed.clone();

    let mut config = single_level_config(5);
    config.mind_neighborhood =
        voxreg_registration::metric::NeighborhoodType::TwentySixConnected;
    config.sampling_percentage = 0.2;

    let result = register(&fixed, &moving, &config).unwrap();
    assert!(result.final_value < 1e-6);
}

#[test]
fn test_registration_is_deterministic() {
    // Fixed seed, stratified sampling, sub-threshold sample count (serial
    // reduction): repeated runs are bit-identical.
    let fixed = blob_volume(16);
    let moving = kernels::shift(&fixed, [1, 0, 0]);

    let mut config = single_level_config(30);
    config.sampling_percentage = 0.05;

    let first = register(&fixed, &moving, &config).unwrap();
    let second = register(&fixed, &moving, &config).unwrap();

    assert_eq!(first.final_value, second.final_value);
    assert_eq!(first.transform.parameters(), second.transform.parameters());
}
