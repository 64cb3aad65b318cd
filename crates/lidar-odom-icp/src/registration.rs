use std::str::FromStr;

use lidar_odom_3d::{pointcloud::PointCloud, transforms::RigidTransform};

/// Error types for the registration module.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// The target point cloud has no points to match against.
    #[error("Target point cloud is empty")]
    EmptyTarget,

    /// Point to plane registration needs normals on the target.
    #[error("Point to plane registration requires target normals")]
    MissingTargetNormals,

    /// The objective name is not a known registration objective.
    #[error("Unknown icp objective: {0}")]
    UnknownObjective(String),
}

/// The error metric minimized by the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcpObjective {
    /// Minimize the distance between corresponding points.
    PointToPoint,
    /// Minimize the distance from source points to the tangent plane of their target match.
    PointToPlane,
}

impl IcpObjective {
    /// Whether the objective needs surface normals on the clouds.
    pub fn requires_normals(&self) -> bool {
        matches!(self, Self::PointToPlane)
    }
}

impl FromStr for IcpObjective {
    type Err = IcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PointToPoint" => Ok(Self::PointToPoint),
            "PointToPlane" => Ok(Self::PointToPlane),
            other => Err(IcpError::UnknownObjective(other.to_string())),
        }
    }
}

/// Structure to define the ICP convergence criteria.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcpConvergenceCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Stop when the fitness changes less than this between two iterations.
    pub relative_fitness: f64,
    /// Stop when the inlier RMSE changes less than this between two iterations.
    pub relative_rmse: f64,
}

impl Default for IcpConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            relative_fitness: 1e-6,
            relative_rmse: 1e-6,
        }
    }
}

/// Result of a registration.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationResult {
    /// Estimated transformation, `target_T_source`.
    pub transformation: RigidTransform,
    /// Fraction of source points with a correspondence within the max distance, in `[0, 1]`.
    pub fitness: f64,
    /// Root mean square distance of the inlier correspondences.
    pub inlier_rmse: f64,
    /// The total number of iterations performed.
    pub num_iterations: usize,
}

impl RegistrationResult {
    /// A result with no correspondences at the given transformation.
    pub fn unmatched(transformation: RigidTransform) -> Self {
        Self {
            transformation,
            fitness: 0.0,
            inlier_rmse: 0.0,
            num_iterations: 0,
        }
    }
}

/// A point cloud registration method.
pub trait Registration {
    /// Align `source` onto `target`.
    ///
    /// # Arguments
    ///
    /// * `target` - The reference point cloud.
    /// * `source` - The point cloud to align.
    /// * `max_correspondence_distance` - Pairs farther apart than this are not correspondences.
    /// * `initial_guess` - Initial estimate of `target_T_source`.
    /// * `objective` - The error metric to minimize.
    /// * `criteria` - Convergence criteria.
    fn register(
        &self,
        target: &PointCloud,
        source: &PointCloud,
        max_correspondence_distance: f64,
        initial_guess: &RigidTransform,
        objective: IcpObjective,
        criteria: &IcpConvergenceCriteria,
    ) -> Result<RegistrationResult, IcpError>;
}
