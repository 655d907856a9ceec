//! Image-generation adapters.

pub mod pollinations;

pub use pollinations::PollinationsImageGenerator;
