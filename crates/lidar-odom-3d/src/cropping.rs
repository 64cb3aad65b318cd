use std::str::FromStr;

use crate::pointcloud::PointCloud;

/// Error types for the cropping module.
#[derive(Debug, thiserror::Error)]
pub enum CroppingError {
    /// The cropping volume name is not one of the known volumes.
    #[error("Unknown cropping volume: {0}")]
    UnknownVolume(String),

    /// The volume parameters are inconsistent.
    #[error("Invalid cropping volume parameters: {0}")]
    InvalidParameters(String),
}

/// The kind of cropping volume, selected by name in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CroppingVolumeKind {
    /// Keep every point.
    Passthrough,
    /// Vertical cylinder around the sensor, bounded in z.
    Cylinder,
    /// Sphere of maximum radius around the sensor.
    MaxRadius,
    /// Everything outside a sphere of minimum radius.
    MinRadius,
    /// Spherical shell between a minimum and a maximum radius.
    MinMaxRadius,
}

impl FromStr for CroppingVolumeKind {
    type Err = CroppingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Passthrough" => Ok(Self::Passthrough),
            "Cylinder" => Ok(Self::Cylinder),
            "MaxRadius" => Ok(Self::MaxRadius),
            "MinRadius" => Ok(Self::MinRadius),
            "MinMaxRadius" => Ok(Self::MinMaxRadius),
            other => Err(CroppingError::UnknownVolume(other.to_string())),
        }
    }
}

/// A volume around the sensor origin used to crop scans.
///
/// Boundaries are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CroppingVolume {
    /// Keep every point.
    #[default]
    Passthrough,
    /// Keep points with planar distance `<= radius` and `min_z <= z <= max_z`.
    Cylinder {
        /// Radius of the cylinder in the xy plane.
        radius: f64,
        /// Lower z bound.
        min_z: f64,
        /// Upper z bound.
        max_z: f64,
    },
    /// Keep points with range `<= radius`.
    MaxRadius {
        /// Maximum range.
        radius: f64,
    },
    /// Keep points with range `>= radius`.
    MinRadius {
        /// Minimum range.
        radius: f64,
    },
    /// Keep points with `min_radius <= range <= max_radius`.
    MinMaxRadius {
        /// Minimum range.
        min_radius: f64,
        /// Maximum range.
        max_radius: f64,
    },
}

impl CroppingVolume {
    /// Build a cropping volume from its configuration name and bounds.
    ///
    /// Bounds the selected kind does not use are ignored.
    ///
    /// # Arguments
    ///
    /// * `name` - One of `Passthrough`, `Cylinder`, `MaxRadius`, `MinRadius`, `MinMaxRadius`.
    /// * `min_radius` - Minimum range, used by `MinRadius` and `MinMaxRadius`.
    /// * `max_radius` - Maximum range, used by `Cylinder`, `MaxRadius` and `MinMaxRadius`.
    /// * `min_z` - Lower z bound of the cylinder.
    /// * `max_z` - Upper z bound of the cylinder.
    pub fn from_name(
        name: &str,
        min_radius: f64,
        max_radius: f64,
        min_z: f64,
        max_z: f64,
    ) -> Result<Self, CroppingError> {
        let volume = match name.parse::<CroppingVolumeKind>()? {
            CroppingVolumeKind::Passthrough => Self::Passthrough,
            CroppingVolumeKind::Cylinder => Self::Cylinder {
                radius: max_radius,
                min_z,
                max_z,
            },
            CroppingVolumeKind::MaxRadius => Self::MaxRadius { radius: max_radius },
            CroppingVolumeKind::MinRadius => Self::MinRadius { radius: min_radius },
            CroppingVolumeKind::MinMaxRadius => Self::MinMaxRadius {
                min_radius,
                max_radius,
            },
        };
        volume.validate()?;
        Ok(volume)
    }

    fn validate(&self) -> Result<(), CroppingError> {
        match *self {
            Self::Cylinder { min_z, max_z, .. } if min_z > max_z => {
                Err(CroppingError::InvalidParameters(format!(
                    "cylinder min_z {min_z} is above max_z {max_z}"
                )))
            }
            Self::MinMaxRadius {
                min_radius,
                max_radius,
            } if min_radius > max_radius => Err(CroppingError::InvalidParameters(format!(
                "min radius {min_radius} is above max radius {max_radius}"
            ))),
            _ => Ok(()),
        }
    }

    /// Whether a point in the sensor frame lies inside the volume.
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        let [x, y, z] = *point;
        match *self {
            Self::Passthrough => true,
            Self::Cylinder {
                radius,
                min_z,
                max_z,
            } => (x * x + y * y) <= radius * radius && z >= min_z && z <= max_z,
            Self::MaxRadius { radius } => (x * x + y * y + z * z) <= radius * radius,
            Self::MinRadius { radius } => (x * x + y * y + z * z) >= radius * radius,
            Self::MinMaxRadius {
                min_radius,
                max_radius,
            } => {
                let sq = x * x + y * y + z * z;
                sq >= min_radius * min_radius && sq <= max_radius * max_radius
            }
        }
    }

    /// Crop a point cloud, keeping the points inside the volume in their original order.
    pub fn crop(&self, cloud: &PointCloud) -> PointCloud {
        match self {
            Self::Passthrough => cloud.clone(),
            _ => cloud.filter(|p| self.contains(p)),
        }
    }
}
