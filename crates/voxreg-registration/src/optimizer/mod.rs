//! Optimizers for transform parameter estimation.

mod gauss_newton;
mod regular_step;
mod trait_;

pub use gauss_newton::GaussNewtonOptimizer;
pub use regular_step::RegularStepGradientDescentOptimizer;
pub use trait_::{CostProblem, ObserverFn, OptimizerOutcome, ResidualJacobian, StopCondition};
