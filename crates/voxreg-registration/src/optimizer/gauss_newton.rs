//! Gauss-Newton optimizer with Levenberg-Marquardt damping.
//!
//! Solves nonlinear least-squares registration problems by linearizing the
//! residual vector around the current parameters and solving the damped
//! normal equations `(J̃ᵀJ̃ + λ·diag) u = J̃ᵀf`; the applied update is
//! `q ← q − α·u`. Converges much faster than gradient descent on
//! sum-of-squared-differences costs, at a higher per-iteration price.
//!
//! When the problem offers no least-squares view the optimizer falls back
//! to scaled gradient descent with the same accept/reject bookkeeping.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use super::trait_::{CostProblem, ObserverFn, OptimizerOutcome, ResidualJacobian, StopCondition};

const ARMIJO_CONSTANT: f64 = 1e-4;
const DAMPING_FLOOR: f64 = 1e-10;
const DAMPING_CEILING: f64 = 1e6;

/// Gauss-Newton / Levenberg-Marquardt optimizer.
pub struct GaussNewtonOptimizer {
    learning_rate: f64,
    minimum_step_length: f64,
    number_of_iterations: u32,
    relaxation_factor: f64,
    gradient_magnitude_tolerance: f64,
    return_best_parameters: bool,
    scales: Vec<f64>,
    max_parameter_update: Vec<f64>,
    damping_factor: f64,
    use_levenberg_marquardt: bool,
    use_line_search: bool,
    line_search_max_iterations: u32,
    line_search_shrink_factor: f64,
    observer: Option<ObserverFn>,
    observer_interval: u32,
}

struct RunState {
    current_value: f64,
    current_step_length: f64,
    damping: f64,
    best_value: f64,
    best_parameters: Vec<f64>,
    stop: Option<StopCondition>,
}

impl Default for GaussNewtonOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussNewtonOptimizer {
    pub fn new() -> Self {
        Self {
            learning_rate: 1.0,
            minimum_step_length: 1e-6,
            number_of_iterations: 100,
            relaxation_factor: 0.5,
            gradient_magnitude_tolerance: 1e-8,
            return_best_parameters: true,
            scales: Vec::new(),
            max_parameter_update: Vec::new(),
            damping_factor: 1e-3,
            use_levenberg_marquardt: true,
            use_line_search: true,
            line_search_max_iterations: 10,
            line_search_shrink_factor: 0.5,
            observer: None,
            observer_interval: 10,
        }
    }

    /// Initial step length for the gradient-descent fallback.
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

    /// Relative-improvement tolerance of the convergence test (also the
    /// gradient tolerance of the fallback path).
    pub fn with_gradient_magnitude_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_magnitude_tolerance = tolerance;
        self
    }

    /// Push the best observed parameters back into the problem on exit.
    pub fn with_return_best_parameters(mut self, flag: bool) -> Self {
        self.return_best_parameters = flag;
        self
    }

    /// Per-parameter scales; larger scale means smaller steps along that
    /// parameter. Missing entries default to 1.
    pub fn with_scales(mut self, scales: Vec<f64>) -> Self {
        self.scales = scales;
        self
    }

    /// Absolute per-iteration clamp on each update component.
    pub fn with_max_parameter_update(mut self, max_update: Vec<f64>) -> Self {
        self.max_parameter_update = max_update;
        self
    }

    /// Initial Levenberg-Marquardt damping λ.
    pub fn with_damping_factor(mut self, lambda: f64) -> Self {
        self.damping_factor = lambda;
        self
    }

    pub fn with_levenberg_marquardt(mut self, enabled: bool) -> Self {
        self.use_levenberg_marquardt = enabled;
        self
    }

    pub fn with_line_search(mut self, enabled: bool) -> Self {
        self.use_line_search = enabled;
        self
    }

    pub fn with_line_search_shrink_factor(mut self, factor: f64) -> Self {
        self.line_search_shrink_factor = factor;
        self
    }

    pub fn set_observer(&mut self, observer: ObserverFn) {
        self.observer = Some(observer);
    }

    pub fn set_observer_interval(&mut self, interval: u32) {
        self.observer_interval = interval.max(1);
    }

    /// Run the optimization until a stop condition fires.
    ///
    /// Uses the Gauss-Newton path when the problem exposes a least-squares
    /// view, the scaled gradient-descent fallback otherwise.
    pub fn optimize<P: CostProblem>(&mut self, problem: &mut P) -> OptimizerOutcome {
        let n = problem.parameter_count();
        let scales = resolve(&self.scales, n, 1.0);
        let max_update = resolve(&self.max_parameter_update, n, f64::INFINITY);
        let use_gauss_newton = problem.has_least_squares();

        let initial_parameters = problem.parameters();
        let initial_value = problem.value();
        let mut state = RunState {
            current_value: initial_value,
            current_step_length: self.learning_rate,
            damping: self.damping_factor,
            best_value: initial_value,
            best_parameters: initial_parameters,
            stop: None,
        };

        info!(
            parameters = n,
            gauss_newton = use_gauss_newton,
            line_search = self.use_line_search,
            lm_damping = self.use_levenberg_marquardt,
            initial_cost = initial_value,
            "starting optimization"
        );

        let mut iteration = 0;
        while iteration < self.number_of_iterations {
            if iteration % self.observer_interval == 0 {
                if let Some(observer) = self.observer.as_mut() {
                    observer(iteration, state.current_value, state.current_step_length);
                }
            }

            if use_gauss_newton {
                self.advance_gauss_newton(problem, &mut state, &scales, &max_update);
            } else {
                self.advance_gradient_descent(problem, &mut state, &scales);
            }

            iteration += 1;
            if state.stop.is_some() {
                break;
            }
        }

        if self.return_best_parameters {
            problem.set_parameters(&state.best_parameters);
            state.current_value = state.best_value;
        }

        if let Some(observer) = self.observer.as_mut() {
            observer(iteration, state.current_value, state.current_step_length);
        }

        let stop_condition = state.stop.unwrap_or(StopCondition::MaximumIterations);
        info!(
            ?stop_condition,
            final_cost = state.current_value,
            iterations = iteration,
            "optimization finished"
        );

        OptimizerOutcome {
            stop_condition,
            final_value: state.current_value,
            iterations: iteration,
        }
    }

    fn advance_gauss_newton<P: CostProblem>(
        &self,
        problem: &mut P,
        state: &mut RunState,
        scales: &[f64],
        max_update: &[f64],
    ) {
        let n = scales.len();
        let previous_parameters = problem.parameters();
        let previous_value = state.current_value;

        let Some(ResidualJacobian {
            residuals,
            jacobian: mut scaled_jacobian,
        }) = problem.least_squares_terms()
        else {
            state.stop = Some(StopCondition::SingularMatrix);
            return;
        };

        if residuals.is_empty()
            || scaled_jacobian.ncols() != n
            || scaled_jacobian.nrows() != residuals.len()
        {
            debug!(
                residuals = residuals.len(),
                "empty or misshapen least-squares terms"
            );
            state.stop = Some(StopCondition::SingularMatrix);
            return;
        }

        // Column-wise parameter scaling: J̃[:, j] = J[:, j] / scales[j].
        for col in 0..n {
            if scales[col] != 1.0 {
                let mut column = scaled_jacobian.column_mut(col);
                column *= 1.0 / scales[col];
            }
        }

        let normal_matrix = scaled_jacobian.transpose() * &scaled_jacobian;
        let normal_rhs = scaled_jacobian.transpose() * &residuals;

        // u solves (J̃ᵀJ̃ + λ·diag) u = J̃ᵀf; the Gauss-Newton step is −u and
        // is applied below as q − α·u.
        let Some(solution) = self.solve_normal_equations(&normal_matrix, &normal_rhs, state.damping)
        else {
            state.stop = Some(StopCondition::SingularMatrix);
            return;
        };

        let mut update: Vec<f64> = (0..n).map(|i| solution[i] / scales[i]).collect();
        for (component, &cap) in update.iter_mut().zip(max_update) {
            if component.abs() > cap {
                *component = cap * component.signum();
            }
        }

        let magnitude = scaled_magnitude(&update, scales);
        if magnitude < self.minimum_step_length {
            state.stop = Some(StopCondition::StepTooSmall);
            return;
        }

        let alpha = if self.use_line_search {
            self.line_search(problem, &previous_parameters, &update, previous_value)
        } else {
            1.0
        };

        let new_parameters: Vec<f64> = previous_parameters
            .iter()
            .zip(&update)
            .map(|(q, u)| q - alpha * u)
            .collect();
        problem.set_parameters(&new_parameters);
        let new_value = problem.value();

        let accepted = new_value < previous_value;
        if accepted {
            state.current_value = new_value;
            state.current_step_length = alpha;
            if new_value < state.best_value {
                state.best_value = new_value;
                state.best_parameters = new_parameters;
            }
            if self.use_levenberg_marquardt {
                state.damping = (state.damping * 0.5).max(DAMPING_FLOOR);
            }
        } else {
            problem.set_parameters(&previous_parameters);
            state.current_value = previous_value;
            state.current_step_length *= self.relaxation_factor;
            if self.use_levenberg_marquardt {
                state.damping = (state.damping * 2.0).min(DAMPING_CEILING);
            }
            if state.current_step_length < self.minimum_step_length {
                state.stop = Some(StopCondition::StepTooSmall);
                return;
            }
        }

        let relative_improvement =
            (previous_value - state.current_value).abs() / (previous_value.abs() + 1e-10);
        if accepted && relative_improvement < self.gradient_magnitude_tolerance {
            state.stop = Some(StopCondition::Converged);
        }
    }

    fn advance_gradient_descent<P: CostProblem>(
        &self,
        problem: &mut P,
        state: &mut RunState,
        scales: &[f64],
    ) {
        let previous_parameters = problem.parameters();
        let previous_value = state.current_value;

        let mut gradient = Vec::new();
        problem.gradient(&mut gradient);

        let magnitude = scaled_magnitude(&gradient, scales);
        if magnitude < self.gradient_magnitude_tolerance {
            state.stop = Some(StopCondition::GradientTooSmall);
            return;
        }

        let new_parameters: Vec<f64> = previous_parameters
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let direction = gradient[i] / (scales[i] * scales[i] * magnitude);
                q - state.current_step_length * direction
            })
            .collect();
        problem.set_parameters(&new_parameters);
        let new_value = problem.value();

        if new_value < previous_value {
            state.current_value = new_value;
            if new_value < state.best_value {
                state.best_value = new_value;
                state.best_parameters = new_parameters;
            }
        } else {
            problem.set_parameters(&previous_parameters);
            state.current_value = previous_value;
            state.current_step_length *= self.relaxation_factor;
            if state.current_step_length < self.minimum_step_length {
                state.stop = Some(StopCondition::StepTooSmall);
            }
        }
    }

    /// Solve `(A + λ·diag(A + 1e-6)) u = b` by Cholesky factorization.
    ///
    /// Retries once with the flat additive damping `max(10λ, 1e-3)` when
    /// the damped matrix is not positive definite; a second failure or a
    /// non-finite solution reports as unsolvable.
    fn solve_normal_equations(
        &self,
        normal_matrix: &DMatrix<f64>,
        rhs: &DVector<f64>,
        damping: f64,
    ) -> Option<DVector<f64>> {
        let n = normal_matrix.nrows();

        let mut damped = normal_matrix.clone();
        if self.use_levenberg_marquardt {
            for i in 0..n {
                damped[(i, i)] += damping * (normal_matrix[(i, i)] + 1e-6);
            }
        }

        let solution = match damped.cholesky() {
            Some(factorization) => factorization.solve(rhs),
            None => {
                debug!("normal-equation factorization failed, retrying with boosted damping");
                let strong_damping = (damping * 10.0).max(1e-3);
                let mut retried = normal_matrix.clone();
                for i in 0..n {
                    retried[(i, i)] += strong_damping;
                }
                retried.cholesky()?.solve(rhs)
            }
        };

        if solution.iter().all(|v| v.is_finite()) {
            Some(solution)
        } else {
            debug!("normal-equation solution is not finite");
            None
        }
    }

    /// Backtracking Armijo search for a step factor along `−update`.
    ///
    /// Returns `0.1` outright when the motion direction is not a descent
    /// direction. The problem's parameters are restored before returning;
    /// the caller decides whether to take the step.
    fn line_search<P: CostProblem>(
        &self,
        problem: &mut P,
        current_parameters: &[f64],
        update: &[f64],
        initial_value: f64,
    ) -> f64 {
        let mut gradient = Vec::new();
        problem.gradient(&mut gradient);

        // Directional derivative along the applied motion −update.
        let directional: f64 = gradient
            .iter()
            .zip(update)
            .map(|(g, u)| -(g * u))
            .sum();
        if directional >= 0.0 {
            return 0.1;
        }

        let mut alpha = 1.0;
        for _ in 0..self.line_search_max_iterations {
            let trial: Vec<f64> = current_parameters
                .iter()
                .zip(update)
                .map(|(q, u)| q - alpha * u)
                .collect();
            problem.set_parameters(&trial);
            let value = problem.value();

            if value <= initial_value + ARMIJO_CONSTANT * alpha * directional {
                problem.set_parameters(current_parameters);
                return alpha;
            }
            alpha *= self.line_search_shrink_factor;
        }

        problem.set_parameters(current_parameters);
        alpha
    }
}

fn resolve(values: &[f64], n: usize, default: f64) -> Vec<f64> {
    (0..n).map(|i| values.get(i).copied().unwrap_or(default)).collect()
}

fn scaled_magnitude(values: &[f64], scales: &[f64]) -> f64 {
    values
        .iter()
        .zip(scales)
        .map(|(v, s)| (v / s) * (v / s))
        .sum::<f64>()
        .sqrt()
}
