use std::num::NonZeroUsize;

use glam::{DMat3, DVec3};
use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::pointcloud::PointCloud;

/// Normal assigned to points whose neighborhood is too small to fit a plane.
const DEFAULT_NORMAL: [f64; 3] = [0.0, 0.0, 1.0];

/// Compute the unit eigenvector of the smallest eigenvalue of a symmetric 3x3 matrix.
fn smallest_eigenvector(covariance: &DMat3) -> Option<DVec3> {
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| covariance.col(j)[i]);
    let evd = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let u = evd.u();

    // pick the column with the smallest Rayleigh quotient
    (0..3)
        .map(|j| DVec3::new(u.read(0, j), u.read(1, j), u.read(2, j)))
        .filter(|v| v.length_squared() > 0.0 && v.is_finite())
        .map(|v| (v, v.dot(*covariance * v) / v.length_squared()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(v, _)| v.normalize())
}

/// Fit a plane normal to the points at `indices`.
fn fit_normal(points: &[[f64; 3]], indices: &[usize]) -> Option<DVec3> {
    if indices.len() < 3 {
        return None;
    }
    let n = indices.len() as f64;
    let centroid = indices
        .iter()
        .fold(DVec3::ZERO, |acc, &i| acc + DVec3::from_array(points[i]))
        / n;

    let mut covariance = DMat3::ZERO;
    for &i in indices {
        let d = DVec3::from_array(points[i]) - centroid;
        covariance += DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    }
    covariance *= 1.0 / n;

    smallest_eigenvector(&covariance)
}

/// Estimate per-point normals from the `knn` nearest neighbors of each point.
///
/// The normal is the direction of least variance of the neighborhood. Normals are oriented
/// towards the sensor origin and have unit length. Points with fewer than three neighbors get
/// `[0, 0, 1]`, as do all points when `knn` is zero.
///
/// # Arguments
///
/// * `cloud` - The point cloud, its normals are overwritten.
/// * `knn` - Number of neighbors, the query point included.
pub fn estimate_normals(cloud: &mut PointCloud, knn: usize) {
    let Some(knn) = NonZeroUsize::new(knn).filter(|_| !cloud.is_empty()) else {
        cloud.set_normals(vec![DEFAULT_NORMAL; cloud.len()]);
        return;
    };

    let normals = {
        let points = cloud.points();
        let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(points);
        points
            .iter()
            .map(|p| {
                let neighbors = kdtree
                    .nearest_n::<kiddo::SquaredEuclidean>(p, knn)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .collect::<Vec<_>>();
                match fit_normal(points, &neighbors) {
                    Some(normal) => {
                        // flip towards the sensor located at the origin
                        let to_sensor = -DVec3::from_array(*p);
                        if normal.dot(to_sensor) < 0.0 {
                            (-normal).to_array()
                        } else {
                            normal.to_array()
                        }
                    }
                    None => DEFAULT_NORMAL,
                }
            })
            .collect::<Vec<_>>()
    };

    cloud.set_normals(normals);
    cloud.normalize_normals();
}
