pub mod filter;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;

pub use image::Volume;
pub use spatial::{Direction3, Index3, Point3, Spacing3, Vector3};
