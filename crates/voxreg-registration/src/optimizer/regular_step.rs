//! Regular-step gradient descent optimizer.
//!
//! The classic registration workhorse: steps along the normalized, scaled
//! gradient with a step length that relaxes whenever the cost fails to
//! improve. Shares the problem trait and observer surface with the
//! Gauss-Newton optimizer so the two are interchangeable in drivers.

use tracing::info;

use super::trait_::{CostProblem, ObserverFn, OptimizerOutcome, StopCondition};

/// Regular-step gradient descent optimizer.
pub struct RegularStepGradientDescentOptimizer {
    learning_rate: f64,
    minimum_step_length: f64,
    number_of_iterations: u32,
    relaxation_factor: f64,
    gradient_magnitude_tolerance: f64,
    return_best_parameters: bool,
    scales: Vec<f64>,
    observer: Option<ObserverFn>,
    observer_interval: u32,
}

impl Default for RegularStepGradientDescentOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RegularStepGradientDescentOptimizer {
    pub fn new() -> Self {
        Self {
            learning_rate: 1.0,
            minimum_step_length: 1e-6,
            number_of_iterations: 100,
            relaxation_factor: 0.5,
            gradient_magnitude_tolerance: 1e-6,
            return_best_parameters: true,
            scales: Vec::new(),
            observer: None,
            observer_interval: 10,
        }
    }

    /// Initial step length.
    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_minimum_step_length(mut self, step: f64) -> Self {
        self.minimum_step_length = step;
        self
    }

    pub fn with_number_of_iterations(mut self, iterations: u32) -> Self {
        self.number_of_iterations = iterations;
        self
    }

    pub fn with_relaxation_factor(mut self, factor: f64) -> Self {
        self.relaxation_factor = factor;
        self
    }

    pub fn with_gradient_magnitude_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_magnitude_tolerance = tolerance;
        self
    }

    pub fn with_return_best_parameters(mut self, flag: bool) -> Self {
        self.return_best_parameters = flag;
        self
    }

    pub fn with_scales(mut self, scales: Vec<f64>) -> Self {
        self.scales = scales;
        self
    }

    pub fn set_observer(&mut self, observer: ObserverFn) {
        self.observer = Some(observer);
    }

    pub fn set_observer_interval(&mut self, interval: u32) {
        self.observer_interval = interval.max(1);
    }

    /// Run the optimization until a stop condition fires.
    pub fn optimize<P: CostProblem>(&mut self, problem: &mut P) -> OptimizerOutcome {
        let n = problem.parameter_count();
        let scales: Vec<f64> = (0..n).map(|i| self.scales.get(i).copied().unwrap_or(1.0)).collect();

        let mut current_value = problem.value();
        let mut best_value = current_value;
        let mut best_parameters = problem.parameters();
        let mut step_length = self.learning_rate;
        let mut stop = None;

        info!(
            parameters = n,
            initial_cost = current_value,
            "starting regular-step gradient descent"
        );

        let mut iteration = 0;
        let mut gradient = Vec::new();
        while iteration < self.number_of_iterations {
            if iteration % self.observer_interval == 0 {
                if let Some(observer) = self.observer.as_mut() {
                    observer(iteration, current_value, step_length);
                }
            }

            let previous_parameters = problem.parameters();
            problem.gradient(&mut gradient);

            let magnitude = gradient
                .iter()
                .zip(&scales)
                .map(|(g, s)| (g / s) * (g / s))
                .sum::<f64>()
                .sqrt();
            if magnitude < self.gradient_magnitude_tolerance {
                stop = Some(StopCondition::GradientTooSmall);
                iteration += 1;
                break;
            }

            let new_parameters: Vec<f64> = previous_parameters
                .iter()
                .enumerate()
                .map(|(i, q)| q - step_length * gradient[i] / (scales[i] * scales[i] * magnitude))
                .collect();
            problem.set_parameters(&new_parameters);
            let new_value = problem.value();

            if new_value < current_value {
                current_value = new_value;
                if new_value < best_value {
                    best_value = new_value;
                    best_parameters = new_parameters;
                }
            } else {
                problem.set_parameters(&previous_parameters);
                step_length *= self.relaxation_factor;
                if step_length < self.minimum_step_length {
                    stop = Some(StopCondition::StepTooSmall);
                    iteration += 1;
                    break;
                }
            }
            iteration += 1;
        }

        if self.return_best_parameters {
            problem.set_parameters(&best_parameters);
            current_value = best_value;
        }

        if let Some(observer) = self.observer.as_mut() {
            observer(iteration, current_value, step_length);
        }

        let stop_condition = stop.unwrap_or(StopCondition::MaximumIterations);
        info!(?stop_condition, final_cost = current_value, "gradient descent finished");

        OptimizerOutcome {
            stop_condition,
            final_value: current_value,
            iterations: iteration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Paraboloid {
        parameters: Vec<f64>,
    }

    impl CostProblem for Paraboloid {
        fn parameter_count(&self) -> usize {
            self.parameters.len()
        }

        fn parameters(&self) -> Vec<f64> {
            self.parameters.clone()
        }

        fn set_parameters(&mut self, parameters: &[f64]) {
            self.parameters = parameters.to_vec();
        }

        fn value(&mut self) -> f64 {
            self.parameters.iter().map(|q| q * q).sum()
        }

        fn gradient(&mut self, gradient: &mut Vec<f64>) {
            gradient.clear();
            gradient.extend(self.parameters.iter().map(|q| 2.0 * q));
        }
    }

    #[test]
    fn test_descent_reduces_cost() {
        let mut problem = Paraboloid {
            parameters: vec![4.0, -3.0],
        };
        let initial = problem.value();

        let mut optimizer = RegularStepGradientDescentOptimizer::new()
            .with_learning_rate(1.0)
            .with_number_of_iterations(200);
        let outcome = optimizer.optimize(&mut problem);

        assert!(outcome.final_value < initial / 100.0);
    }

    #[test]
    fn test_stops_on_small_gradient() {
        let mut problem = Paraboloid {
            parameters: vec![0.0, 0.0],
        };
        let mut optimizer = RegularStepGradientDescentOptimizer::new();
        let outcome = optimizer.optimize(&mut problem);

        assert_eq!(outcome.stop_condition, StopCondition::GradientTooSmall);
        assert_eq!(outcome.final_value, 0.0);
    }

    #[test]
    fn test_scales_slow_a_parameter() {
        let mut problem = Paraboloid {
            parameters: vec![2.0, 2.0],
        };
        let mut optimizer = RegularStepGradientDescentOptimizer::new()
            .with_learning_rate(0.5)
            .with_scales(vec![1.0, 100.0])
            .with_number_of_iterations(5)
            .with_return_best_parameters(false);
        optimizer.optimize(&mut problem);

        // The heavily scaled second parameter barely moves.
        assert!((problem.parameters[1] - 2.0).abs() < 0.1);
        assert!(problem.parameters[0] < 2.0);
    }
}
