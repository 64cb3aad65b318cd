#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Time indexed pose buffer.
pub mod buffer;
pub use buffer::{BufferError, InterpolationSample, TransformInterpolationBuffer};

pub mod config;
pub use config::{load_parameters, OdometryParameters, OdometryToolsParameters};

mod error;
pub use error::{ConfigError, OdometryError};

/// The odometry engine.
pub mod odometry;
pub use odometry::{LidarOdometry, OdometryState, ScanDiagnostics};

/// Preprocessing and registration tool sets.
pub mod tools;
pub use tools::{OdometryTools, ToolSet};
