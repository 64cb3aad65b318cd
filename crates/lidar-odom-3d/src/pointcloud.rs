use glam::DVec3;

use crate::transforms::RigidTransform;

/// A point cloud with points, colors, and normals.
///
/// Colors and normals are either absent or carry exactly one entry per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    ///
    /// PRECONDITION: colors and normals, when given, have the same length as points.
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        debug_assert!(colors.as_ref().map_or(true, |c| c.len() == points.len()));
        debug_assert!(normals.as_ref().map_or(true, |n| n.len() == points.len()));
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Create a point cloud holding only positions.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self::new(points, None, None)
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Whether every point carries a normal.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Replace the normals of the point cloud.
    ///
    /// PRECONDITION: `normals` has one entry per point.
    pub fn set_normals(&mut self, normals: Vec<[f64; 3]>) {
        assert_eq!(normals.len(), self.points.len());
        self.normals = Some(normals);
    }

    /// Scale every normal to unit length. Zero-length normals are left untouched.
    pub fn normalize_normals(&mut self) {
        if let Some(normals) = self.normals.as_mut() {
            for n in normals.iter_mut() {
                let v = DVec3::from_array(*n);
                let norm = v.length();
                if norm > 0.0 {
                    *n = (v / norm).to_array();
                }
            }
        }
    }

    /// Create a new point cloud with the points at `indices`, keeping their attributes.
    pub fn select_by_index(&self, indices: &[usize]) -> PointCloud {
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let colors = self
            .colors
            .as_ref()
            .map(|c| indices.iter().map(|&i| c[i]).collect());
        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&i| n[i]).collect());
        PointCloud::new(points, colors, normals)
    }

    /// Create a new point cloud with the points that satisfy `predicate`, preserving order.
    pub fn filter<F>(&self, predicate: F) -> PointCloud
    where
        F: Fn(&[f64; 3]) -> bool,
    {
        let indices = self
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| predicate(p))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        self.select_by_index(&indices)
    }

    /// Apply a rigid transform to points and normals.
    pub fn transformed(&self, transform: &RigidTransform) -> PointCloud {
        let points = self
            .points
            .iter()
            .map(|p| transform.transform_point(p))
            .collect();
        let normals = self
            .normals
            .as_ref()
            .map(|n| n.iter().map(|v| transform.rotate_vector(v)).collect());
        PointCloud::new(points, self.colors.clone(), normals)
    }

    /// Get the minimum bound of the point cloud. Returns zero if empty.
    pub fn min_bound(&self) -> DVec3 {
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .reduce(|a, b| a.min(b))
            .unwrap_or(DVec3::ZERO)
    }

    /// Get the maximum bound of the point cloud. Returns zero if empty.
    pub fn max_bound(&self) -> DVec3 {
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .reduce(|a, b| a.max(b))
            .unwrap_or(DVec3::ZERO)
    }
}

/// An axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// The minimum corner of the box.
    pub min: DVec3,
    /// The maximum corner of the box.
    pub max: DVec3,
}

impl BoundingBox {
    /// Create a new bounding box from its corners.
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create a box spanning `low..high` around `origin`.
    pub fn around_position(low: DVec3, high: DVec3, origin: DVec3) -> Self {
        Self::new(origin + low, origin + high)
    }

    /// The tight bounding box of a point cloud.
    pub fn from_cloud(cloud: &PointCloud) -> Self {
        Self::new(cloud.min_bound(), cloud.max_bound())
    }

    /// Whether the point lies inside the box, boundary included.
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        let p = DVec3::from_array(*point);
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![[255, 0, 0], [0, 255, 0]]),
            Some(vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        );

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);

        if let Some(colors) = pointcloud.colors() {
            assert_eq!(colors.len(), 2);
        }
        if let Some(normals) = pointcloud.normals() {
            assert_eq!(normals.len(), 2);
        }

        assert_eq!(pointcloud.points()[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_select_by_index_keeps_attributes() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            Some(vec![[1, 1, 1], [2, 2, 2], [3, 3, 3]]),
            Some(vec![[0.0, 0.0, 1.0]; 3]),
        );
        let selected = pointcloud.select_by_index(&[2, 0]);
        assert_eq!(selected.points(), &[[2.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(selected.colors(), Some(&[[3, 3, 3], [1, 1, 1]][..]));
        assert_eq!(selected.normals().map(|n| n.len()), Some(2));
    }

    #[test]
    fn test_bounds() {
        let pointcloud =
            PointCloud::from_points(vec![[0.0, -1.0, 2.0], [1.0, 3.0, -2.0], [0.5, 0.0, 0.0]]);
        assert_eq!(pointcloud.min_bound(), DVec3::new(0.0, -1.0, -2.0));
        assert_eq!(pointcloud.max_bound(), DVec3::new(1.0, 3.0, 2.0));
        assert_eq!(PointCloud::default().min_bound(), DVec3::ZERO);
    }

    #[test]
    fn test_normalize_normals() {
        let mut pointcloud = PointCloud::new(
            vec![[0.0; 3], [0.0; 3]],
            None,
            Some(vec![[0.0, 0.0, 2.0], [0.0, 0.0, 0.0]]),
        );
        pointcloud.normalize_normals();
        assert_eq!(
            pointcloud.normals(),
            Some(&[[0.0, 0.0, 1.0], [0.0, 0.0, 0.0]][..])
        );
    }

    #[test]
    fn test_bounding_box_contains() {
        let bbox = BoundingBox::around_position(
            DVec3::splat(-1.0),
            DVec3::splat(1.0),
            DVec3::new(10.0, 0.0, 0.0),
        );
        assert!(bbox.contains(&[10.0, 0.0, 0.0]));
        assert!(bbox.contains(&[11.0, 1.0, -1.0]));
        assert!(!bbox.contains(&[0.0, 0.0, 0.0]));
    }
}
