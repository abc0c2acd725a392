//! Media preparation before upload.

pub mod optimizer;

pub use optimizer::ImageOptimizer;
