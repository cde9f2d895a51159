//! MIND-based 3D volume registration.
//!
//! The crate pairs a modality-independent neighbourhood descriptor (MIND)
//! similarity metric with a Gauss-Newton / Levenberg-Marquardt optimizer,
//! plus a regular-step gradient descent alternative, a multi-resolution
//! driver and a tolerant JSON configuration layer.

pub mod config;
pub mod error;
pub mod metric;
pub mod optimizer;
pub mod registration;

pub use config::{MetricType, OptimizerType, RegistrationConfig, TransformType};
pub use error::{RegistrationError, Result};
pub use registration::{register, FittedTransform, RegistrationResult};
