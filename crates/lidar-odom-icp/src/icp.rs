use glam::DVec3;

use crate::ops::{
    find_correspondences, fit_point_to_plane, fit_point_to_point, Correspondences, TargetTree,
};
use crate::registration::{
    IcpConvergenceCriteria, IcpError, IcpObjective, Registration, RegistrationResult,
};
use lidar_odom_3d::{pointcloud::PointCloud, transforms::RigidTransform};

/// Iterative Closest Point (ICP) registration.
///
/// Supports the point to point and the point to plane objectives. The target normals are
/// required for the latter.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterativeClosestPoint;

impl IterativeClosestPoint {
    /// Create a new ICP registration.
    pub fn new() -> Self {
        Self
    }
}

fn apply(points: &[[f64; 3]], transform: &RigidTransform) -> Vec<[f64; 3]> {
    points.iter().map(|p| transform.transform_point(p)).collect()
}

fn gather(points: &[[f64; 3]], indices: &[usize]) -> Vec<DVec3> {
    indices
        .iter()
        .map(|&i| DVec3::from_array(points[i]))
        .collect()
}

/// Compute the incremental transformation aligning the matched pairs.
fn fit_step(
    current_source: &[[f64; 3]],
    target: &PointCloud,
    correspondences: &Correspondences,
    objective: IcpObjective,
) -> Option<RigidTransform> {
    let src = gather(current_source, &correspondences.source);
    let dst = gather(target.points(), &correspondences.target);
    match objective {
        IcpObjective::PointToPoint => fit_point_to_point(&src, &dst),
        IcpObjective::PointToPlane => {
            let normals = gather(target.normals()?, &correspondences.target);
            fit_point_to_plane(&src, &dst, &normals)
        }
    }
}

impl Registration for IterativeClosestPoint {
    fn register(
        &self,
        target: &PointCloud,
        source: &PointCloud,
        max_correspondence_distance: f64,
        initial_guess: &RigidTransform,
        objective: IcpObjective,
        criteria: &IcpConvergenceCriteria,
    ) -> Result<RegistrationResult, IcpError> {
        if target.is_empty() {
            return Err(IcpError::EmptyTarget);
        }
        if objective.requires_normals() && !target.has_normals() {
            return Err(IcpError::MissingTargetNormals);
        }
        if source.is_empty() {
            return Ok(RegistrationResult::unmatched(*initial_guess));
        }

        // build kdtree for target points to speed up the nearest neighbor search
        let kdtree = TargetTree::new_from_slice(target.points());

        let mut result = RegistrationResult::unmatched(*initial_guess);
        let mut current_source = apply(source.points(), initial_guess);

        let mut correspondences =
            find_correspondences(&current_source, &kdtree, max_correspondence_distance);
        (result.fitness, result.inlier_rmse) = correspondences.evaluate(source.len());

        // main icp loop
        for i in 0..criteria.max_iterations {
            log::debug!("Iteration: {}", i);
            let now = std::time::Instant::now();

            let Some(delta) = fit_step(&current_source, target, &correspondences, objective)
            else {
                log::debug!(
                    "Not enough correspondences to fit: {}",
                    correspondences.len()
                );
                break;
            };

            // T_new = T_delta * T_old
            result.transformation = delta * result.transformation;
            current_source = apply(&current_source, &delta);

            let (prev_fitness, prev_rmse) = (result.fitness, result.inlier_rmse);
            correspondences =
                find_correspondences(&current_source, &kdtree, max_correspondence_distance);
            (result.fitness, result.inlier_rmse) = correspondences.evaluate(source.len());
            result.num_iterations += 1;

            log::debug!(
                "Num correspondences: {}, fitness: {}, rmse: {}, elapsed: {:?}",
                correspondences.len(),
                result.fitness,
                result.inlier_rmse,
                now.elapsed()
            );

            if (result.fitness - prev_fitness).abs() < criteria.relative_fitness
                && (result.inlier_rmse - prev_rmse).abs() < criteria.relative_rmse
            {
                log::debug!(
                    "ICP converged in {} iterations with error {}",
                    result.num_iterations,
                    result.inlier_rmse
                );
                break;
            }
        }

        Ok(result)
    }
}
