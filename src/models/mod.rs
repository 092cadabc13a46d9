//! Data models

pub mod dataset;
pub mod analysis;
pub mod anomaly;

pub use dataset::*;
pub use analysis::*;
pub use anomaly::*;
