use faer::prelude::SpSolver;
use glam::{DQuat, DVec3};
use kiddo::immutable::float::kdtree::ImmutableKdTree;

use lidar_odom_3d::transforms::RigidTransform;

/// KD-tree type used to index the target points.
pub(crate) type TargetTree = ImmutableKdTree<f64, u32, 3, 32>;

/// Matched point pairs between the source and the target.
#[derive(Debug, Clone, Default)]
pub(crate) struct Correspondences {
    /// Index of the matched point in the source.
    pub source: Vec<usize>,
    /// Index of the matched point in the target.
    pub target: Vec<usize>,
    /// Squared distance between the matched points.
    pub sq_distances: Vec<f64>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Fitness and inlier RMSE for a source of `num_source` points.
    pub fn evaluate(&self, num_source: usize) -> (f64, f64) {
        if self.len() == 0 || num_source == 0 {
            return (0.0, 0.0);
        }
        let fitness = self.len() as f64 / num_source as f64;
        let rmse = (self.sq_distances.iter().sum::<f64>() / self.len() as f64).sqrt();
        (fitness, rmse)
    }
}

/// Find for each source point its nearest target point within `max_distance`.
pub(crate) fn find_correspondences(
    source: &[[f64; 3]],
    kdtree: &TargetTree,
    max_distance: f64,
) -> Correspondences {
    let max_sq_distance = max_distance * max_distance;
    let mut correspondences = Correspondences::default();

    for (i, p) in source.iter().enumerate() {
        let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(p);
        if nn.distance <= max_sq_distance {
            correspondences.source.push(i);
            correspondences.target.push(nn.item as usize);
            correspondences.sq_distances.push(nn.distance);
        }
    }

    correspondences
}

/// Compute the centroids of two sets of points.
///
/// # Arguments
///
/// * `points1` - A set of points.
/// * `points2` - Another set of points.
///
/// # Returns
///
/// The centroids of the two sets of points.
pub(crate) fn compute_centroids(points1: &[DVec3], points2: &[DVec3]) -> (DVec3, DVec3) {
    let centroid1 = points1.iter().fold(DVec3::ZERO, |acc, p| acc + *p) / points1.len() as f64;
    let centroid2 = points2.iter().fold(DVec3::ZERO, |acc, p| acc + *p) / points2.len() as f64;
    (centroid1, centroid2)
}

/// Compute the rigid transformation `dst_T_src` minimizing the point to point distance.
///
/// Uses the closed-form unit quaternion solution: the rotation is the eigenvector of the
/// largest eigenvalue of the symmetric 4x4 matrix built from the cross covariance.
///
/// Returns `None` with fewer than three pairs.
pub(crate) fn fit_point_to_point(
    points_in_src: &[DVec3],
    points_in_dst: &[DVec3],
) -> Option<RigidTransform> {
    assert_eq!(points_in_src.len(), points_in_dst.len());
    if points_in_src.len() < 3 {
        return None;
    }

    let (src_centroid, dst_centroid) = compute_centroids(points_in_src, points_in_dst);

    // cross covariance s[a][b] = sum (src_a - mean) * (dst_b - mean)
    let mut s = [[0.0f64; 3]; 3];
    for (p_src, p_dst) in points_in_src.iter().zip(points_in_dst.iter()) {
        let a = (*p_src - src_centroid).to_array();
        let b = (*p_dst - dst_centroid).to_array();
        for (row, a_i) in s.iter_mut().zip(a.iter()) {
            for (val, b_j) in row.iter_mut().zip(b.iter()) {
                *val += a_i * b_j;
            }
        }
    }

    let [[sxx, sxy, sxz], [syx, syy, syz], [szx, szy, szz]] = s;
    let n = [
        [sxx + syy + szz, syz - szy, szx - sxz, sxy - syx],
        [syz - szy, sxx - syy - szz, sxy + syx, szx + sxz],
        [szx - sxz, sxy + syx, -sxx + syy - szz, syz + szy],
        [sxy - syx, szx + sxz, syz + szy, -sxx - syy + szz],
    ];

    let mat = faer::Mat::<f64>::from_fn(4, 4, |i, j| n[i][j]);
    let evd = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let u = evd.u();

    // pick the eigenvector with the largest Rayleigh quotient
    let rayleigh = |v: &[f64; 4]| -> f64 {
        let mut num = 0.0;
        for i in 0..4 {
            for j in 0..4 {
                num += v[i] * n[i][j] * v[j];
            }
        }
        num / v.iter().map(|x| x * x).sum::<f64>()
    };
    let q = (0..4)
        .map(|j| [u.read(0, j), u.read(1, j), u.read(2, j), u.read(3, j)])
        .filter(|v| v.iter().all(|x| x.is_finite()) && v.iter().any(|x| *x != 0.0))
        .max_by(|a, b| rayleigh(a).total_cmp(&rayleigh(b)))?;

    let rotation = DQuat::from_xyzw(q[1], q[2], q[3], q[0]).normalize();
    let translation = dst_centroid - rotation * src_centroid;

    Some(RigidTransform::new(rotation, translation))
}

/// Compute the rigid transformation minimizing the point to plane distance.
///
/// One Gauss-Newton step of the linearized problem around the identity, solving the 6x6
/// normal equations for the rotation vector and the translation with a Cholesky factorization.
///
/// Returns `None` with fewer than six pairs or a singular system.
pub(crate) fn fit_point_to_plane(
    points_in_src: &[DVec3],
    points_in_dst: &[DVec3],
    normals_in_dst: &[DVec3],
) -> Option<RigidTransform> {
    assert_eq!(points_in_src.len(), points_in_dst.len());
    assert_eq!(points_in_dst.len(), normals_in_dst.len());
    if points_in_src.len() < 6 {
        return None;
    }

    // normal equations J^T J x = -J^T r
    let mut jtj = faer::Mat::<f64>::zeros(6, 6);
    let mut jtr = faer::Mat::<f64>::zeros(6, 1);

    for ((p, q), n) in points_in_src
        .iter()
        .zip(points_in_dst.iter())
        .zip(normals_in_dst.iter())
    {
        let r = (*p - *q).dot(*n);
        let c = p.cross(*n);
        let jac = [c.x, c.y, c.z, n.x, n.y, n.z];
        for i in 0..6 {
            for j in 0..6 {
                jtj.write(i, j, jtj.read(i, j) + jac[i] * jac[j]);
            }
            jtr.write(i, 0, jtr.read(i, 0) - jac[i] * r);
        }
    }

    let x = jtj.cholesky(faer::Side::Lower).ok()?.solve(jtr.as_ref());
    let x = (0..6).map(|i| x.read(i, 0)).collect::<Vec<_>>();
    if !x.iter().all(|v| v.is_finite()) {
        return None;
    }

    let rotation = DQuat::from_scaled_axis(DVec3::new(x[0], x[1], x[2]));
    Some(RigidTransform::new(rotation, DVec3::new(x[3], x[4], x[5])))
}
