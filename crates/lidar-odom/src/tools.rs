use rand::Rng;

use lidar_odom_3d::{
    cropping::CroppingVolume, downsample::random_downsample, normals::estimate_normals,
    pointcloud::PointCloud, transforms::RigidTransform, voxel_grid::voxelize,
};
use lidar_odom_icp::{IcpConvergenceCriteria, IcpObjective};

use crate::config::OdometryToolsParameters;
use crate::error::OdometryError;

/// Selects which of the two tool sets of the engine is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSet {
    /// Used until the first accepted registration.
    MapInitializing,
    /// Used once tracking.
    SteadyState,
}

/// Preprocessing and registration settings of one odometry mode.
#[derive(Debug, Clone, PartialEq)]
pub struct OdometryTools {
    /// The parameters the tools were built from.
    pub params: OdometryToolsParameters,
    /// Volume applied to raw scans.
    pub cropper: CroppingVolume,
    /// Registration objective.
    pub objective: IcpObjective,
    /// Registration convergence criteria.
    pub criteria: IcpConvergenceCriteria,
    /// Initial guess handed to the registration.
    pub initial_guess: RigidTransform,
}

impl OdometryTools {
    /// Build the tools, validating the cropper and the objective names.
    pub fn from_parameters(params: &OdometryToolsParameters) -> Result<Self, OdometryError> {
        let cropping = &params.scan_processing.scan_cropping;
        let cropper = CroppingVolume::from_name(
            &cropping.cropper_type,
            cropping.cropping_radius_min,
            cropping.cropping_radius_max,
            cropping.min_z,
            cropping.max_z,
        )?;
        let objective = params.scan_matching.icp_objective.parse::<IcpObjective>()?;
        let criteria = IcpConvergenceCriteria {
            max_iterations: params.scan_matching.max_n_iter,
            ..Default::default()
        };

        Ok(Self {
            params: params.clone(),
            cropper,
            objective,
            criteria,
            initial_guess: RigidTransform::IDENTITY,
        })
    }

    /// Maximum distance between corresponding points.
    pub fn max_correspondence_distance(&self) -> f64 {
        self.params.scan_matching.max_correspondence_dist
    }

    /// A registration is accepted when its fitness is strictly above this.
    pub fn min_acceptable_fitness(&self) -> f64 {
        self.params.min_acceptable_fitness
    }

    /// Turn a raw scan into a cloud ready for registration.
    ///
    /// Crops, voxelizes and randomly downsamples the scan, then estimates normals when the
    /// objective needs them.
    pub fn preprocess<R: Rng + ?Sized>(
        &self,
        cloud: &PointCloud,
        rng: &mut R,
    ) -> Result<PointCloud, OdometryError> {
        let processing = &self.params.scan_processing;

        let cropped = self.cropper.crop(cloud);
        let voxelized = voxelize(&cropped, processing.voxel_size)?;
        let mut processed = random_downsample(&voxelized, processing.downsampling_ratio, rng);

        if self.objective.requires_normals() {
            estimate_normals(&mut processed, self.params.scan_matching.knn_normal_estimation);
        }

        log::trace!(
            "Preprocessed scan: {} raw, {} cropped, {} voxelized, {} kept",
            cloud.len(),
            cropped.len(),
            voxelized.len(),
            processed.len()
        );

        Ok(processed)
    }
}
