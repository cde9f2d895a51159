//! Volume filters: elementwise kernels, smoothing, downsampling, pyramids.

mod downsample;
mod gaussian;
pub mod kernels;
mod pyramid;

pub use downsample::DownsampleFilter;
pub use gaussian::GaussianFilter;
pub use pyramid::MultiResolutionPyramid;
