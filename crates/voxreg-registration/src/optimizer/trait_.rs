//! Cost-problem trait shared by the optimizers.
//!
//! Instead of wiring separate cost/gradient/residual/Jacobian/parameter
//! callbacks into the optimizer, the problem bundles them into one
//! capability object. Metrics that can produce the least-squares view opt
//! into the Gauss-Newton path by implementing
//! [`CostProblem::least_squares_terms`]; everything else is driven by the
//! scaled gradient-descent path.

use nalgebra::{DMatrix, DVector};

/// Residuals and their Jacobian with respect to the parameters.
///
/// The Jacobian has one row per residual and one column per parameter;
/// rows are aligned with the residual vector.
pub struct ResidualJacobian {
    pub residuals: DVector<f64>,
    pub jacobian: DMatrix<f64>,
}

/// A differentiable cost over a parameter vector.
pub trait CostProblem {
    /// Dimension of the parameter vector.
    fn parameter_count(&self) -> usize;

    /// Current parameters.
    fn parameters(&self) -> Vec<f64>;

    /// Replace the parameters.
    fn set_parameters(&mut self, parameters: &[f64]);

    /// Cost at the current parameters.
    fn value(&mut self) -> f64;

    /// Gradient of the cost at the current parameters.
    ///
    /// Clears and fills `gradient` with [`CostProblem::parameter_count`]
    /// components.
    fn gradient(&mut self, gradient: &mut Vec<f64>);

    /// Whether [`CostProblem::least_squares_terms`] produces output.
    fn has_least_squares(&self) -> bool {
        false
    }

    /// The least-squares view of the cost, if the problem has one.
    fn least_squares_terms(&mut self) -> Option<ResidualJacobian> {
        None
    }
}

/// Why an optimization run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// The iteration budget was exhausted.
    MaximumIterations,
    /// The (scaled) update or step length fell below the minimum.
    StepTooSmall,
    /// The scaled gradient magnitude fell below tolerance.
    GradientTooSmall,
    /// The relative cost improvement fell below tolerance.
    Converged,
    /// The normal-equation system could not be solved.
    SingularMatrix,
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizerOutcome {
    pub stop_condition: StopCondition,
    /// Final cost (the best observed cost when best-tracking is enabled).
    pub final_value: f64,
    /// Number of iterations performed.
    pub iterations: u32,
}

/// Per-iteration observer: `(iteration, current_value, step_length)`.
///
/// Called once on entry, at most once per iteration, and once on exit.
pub type ObserverFn = Box<dyn FnMut(u32, f64, f64)>;
