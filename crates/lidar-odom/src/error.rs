use lidar_odom_3d::{cropping::CroppingError, voxel_grid::VoxelGridError};
use lidar_odom_icp::IcpError;

use crate::buffer::BufferError;

/// Error types for loading the odometry configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read the configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document is malformed or misses a field.
    #[error("Failed to parse the configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required section is absent from the document.
    #[error("Missing configuration section: {0}")]
    MissingSection(String),
}

/// Error types for the odometry engine.
///
/// All of these are fatal: per-scan failures are reported through the return value of
/// [`crate::LidarOdometry::add_scan`] instead.
#[derive(Debug, thiserror::Error)]
pub enum OdometryError {
    /// Map initialization is enabled but no parameters were given for it.
    #[error("Map initialization is enabled but its parameters are missing")]
    MissingMapInitializingParameters,

    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The cropping volume could not be built.
    #[error(transparent)]
    Cropping(#[from] CroppingError),

    /// Voxelization failed.
    #[error(transparent)]
    VoxelGrid(#[from] VoxelGridError),

    /// The registration setup is invalid.
    #[error(transparent)]
    Registration(#[from] IcpError),

    /// The pose buffer rejected a sample.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}
