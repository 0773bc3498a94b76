pub mod compare;
pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod metrics;
pub mod pca;
pub mod pipeline;
pub mod plot;
pub mod signal;

pub use error::*;
pub use features::{FeatureConfig, FeatureTable, FeatureVector};
pub use metrics::window::{Downsample, Window, WindowLength};
pub use signal::*;
