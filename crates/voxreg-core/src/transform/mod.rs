//! Spatial transforms mapping fixed-space points into moving space.

mod affine;
mod rigid;
mod trait_;

pub use affine::AffineTransform;
pub use rigid::RigidTransform;
pub use trait_::SpatialTransform;
