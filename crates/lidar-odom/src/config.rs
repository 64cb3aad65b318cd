//! Odometry parameters and their JSON loader.
//!
//! The document has a top level `odometry` section:
//!
//! ```json
//! {
//!   "odometry": {
//!     "is_map_initializing": false,
//!     "scan_to_scan": {
//!       "min_acceptable_fitness": 0.7,
//!       "scan_matching": {
//!         "icp_objective": "PointToPlane",
//!         "knn_normal_estimation": 10,
//!         "max_correspondence_dist": 1.0,
//!         "max_n_iter": 50
//!       },
//!       "scan_processing": {
//!         "voxel_size": 0.1,
//!         "downsampling_ratio": 1.0,
//!         "scan_cropping": {
//!           "cropper_type": "MaxRadius",
//!           "cropping_radius_max": 30.0,
//!           "cropping_radius_min": 0.0,
//!           "min_z": -3.0,
//!           "max_z": 3.0
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the top level section holding the odometry parameters.
pub const ODOMETRY_SECTION: &str = "odometry";

/// Cropping applied to raw scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCroppingParameters {
    /// One of `Passthrough`, `Cylinder`, `MaxRadius`, `MinRadius`, `MinMaxRadius`.
    pub cropper_type: String,
    /// Outer radius in meters.
    pub cropping_radius_max: f64,
    /// Inner radius in meters.
    pub cropping_radius_min: f64,
    /// Lower z bound of the cylinder.
    pub min_z: f64,
    /// Upper z bound of the cylinder.
    pub max_z: f64,
}

impl Default for ScanCroppingParameters {
    fn default() -> Self {
        Self {
            cropper_type: "MaxRadius".to_string(),
            cropping_radius_max: 30.0,
            cropping_radius_min: 0.0,
            min_z: -3.0,
            max_z: 3.0,
        }
    }
}

/// Preprocessing applied to cropped scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProcessingParameters {
    /// Voxel edge length in meters, non positive disables voxelization.
    pub voxel_size: f64,
    /// Probability of keeping each point, `1.0` disables downsampling.
    pub downsampling_ratio: f64,
    /// Cropping volume.
    pub scan_cropping: ScanCroppingParameters,
}

impl Default for ScanProcessingParameters {
    fn default() -> Self {
        Self {
            voxel_size: 0.1,
            downsampling_ratio: 1.0,
            scan_cropping: ScanCroppingParameters::default(),
        }
    }
}

/// Registration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMatchingParameters {
    /// `PointToPoint` or `PointToPlane`.
    pub icp_objective: String,
    /// Number of neighbors used to estimate normals.
    pub knn_normal_estimation: usize,
    /// Maximum distance between corresponding points.
    pub max_correspondence_dist: f64,
    /// Maximum number of ICP iterations.
    pub max_n_iter: usize,
}

impl Default for ScanMatchingParameters {
    fn default() -> Self {
        Self {
            icp_objective: "PointToPlane".to_string(),
            knn_normal_estimation: 10,
            max_correspondence_dist: 1.0,
            max_n_iter: 50,
        }
    }
}

/// Parameters of one odometry tool set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryToolsParameters {
    /// A registration is accepted when its fitness is strictly above this.
    pub min_acceptable_fitness: f64,
    /// Registration settings.
    pub scan_matching: ScanMatchingParameters,
    /// Preprocessing settings.
    pub scan_processing: ScanProcessingParameters,
}

impl Default for OdometryToolsParameters {
    fn default() -> Self {
        Self {
            min_acceptable_fitness: 0.7,
            scan_matching: ScanMatchingParameters::default(),
            scan_processing: ScanProcessingParameters::default(),
        }
    }
}

/// Parameters of the odometry engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OdometryParameters {
    /// Start with the map initializing tool set.
    pub is_map_initializing: bool,
    /// Maximum number of poses kept in the buffer, unbounded when absent.
    #[serde(default)]
    pub pose_buffer_size: Option<usize>,
    /// Tool set used once tracking.
    pub scan_to_scan: OdometryToolsParameters,
    /// Tool set used until the first accepted registration.
    #[serde(default)]
    pub map_initializing: Option<OdometryToolsParameters>,
}

impl OdometryParameters {
    /// Parse the parameters from a JSON document with an `odometry` section.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut document: serde_json::Value = serde_json::from_str(json)?;
        let section = document
            .get_mut(ODOMETRY_SECTION)
            .map(serde_json::Value::take)
            .ok_or_else(|| ConfigError::MissingSection(ODOMETRY_SECTION.to_string()))?;
        Ok(serde_json::from_value(section)?)
    }

    /// Serialize the parameters into a JSON document with an `odometry` section.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let mut document = serde_json::Map::new();
        document.insert(ODOMETRY_SECTION.to_string(), serde_json::to_value(self)?);
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

/// Load the odometry parameters from a JSON file.
///
/// Fails if the file is unreadable, the `odometry` section is absent or any required field
/// is missing.
pub fn load_parameters(path: impl AsRef<Path>) -> Result<OdometryParameters, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let params = OdometryParameters::from_json_str(&contents)?;
    log::info!("Loaded odometry parameters from {}", path.display());
    Ok(params)
}
