//! Volume type with physical metadata.

mod volume;

pub use volume::Volume;
