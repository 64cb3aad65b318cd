use rand::Rng;

use crate::pointcloud::PointCloud;

/// Randomly thin a point cloud.
///
/// Every point is kept independently with probability `ratio`, so the output size is only
/// `ratio * len` in expectation. A ratio of `1.0` or more returns the cloud unchanged and a
/// non-positive ratio returns an empty cloud.
///
/// # Arguments
///
/// * `cloud` - The input point cloud.
/// * `ratio` - Probability of keeping each point.
/// * `rng` - The random number generator.
///
/// Example:
///
/// ```
/// use lidar_odom_3d::downsample::random_downsample;
/// use lidar_odom_3d::pointcloud::PointCloud;
///
/// let cloud = PointCloud::from_points(vec![[0.0, 0.0, 0.0]; 100]);
/// let thinned = random_downsample(&cloud, 0.5, &mut rand::rng());
/// assert!(thinned.len() <= 100);
/// ```
pub fn random_downsample<R: Rng + ?Sized>(cloud: &PointCloud, ratio: f64, rng: &mut R) -> PointCloud {
    if ratio >= 1.0 {
        return cloud.clone();
    }
    if ratio <= 0.0 || ratio.is_nan() {
        return cloud.select_by_index(&[]);
    }

    let indices = (0..cloud.len())
        .filter(|_| rng.random_bool(ratio))
        .collect::<Vec<_>>();

    cloud.select_by_index(&indices)
}
