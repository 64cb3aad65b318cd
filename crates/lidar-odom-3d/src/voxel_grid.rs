use std::collections::HashMap;

use glam::{DVec3, IVec3};

use crate::pointcloud::{BoundingBox, PointCloud};

/// Error types for the voxel grid module.
#[derive(Debug, thiserror::Error)]
pub enum VoxelGridError {
    /// The voxel index range would overflow a 32-bit signed integer.
    #[error("Voxel size {voxel_size} is too small for a cloud extent of {extent}")]
    VoxelSizeTooSmall {
        /// The requested voxel size.
        voxel_size: f64,
        /// The largest side of the voxel bounds.
        extent: f64,
    },
}

/// Accumulated attributes of the points falling into one voxel.
#[derive(Debug, Clone, Default)]
struct AccumulatedPoint {
    num_points: usize,
    point: DVec3,
    normal: DVec3,
    color: DVec3,
}

impl AccumulatedPoint {
    fn add_point(&mut self, cloud: &PointCloud, index: usize) {
        self.point += DVec3::from_array(cloud.points()[index]);
        if let Some(normals) = cloud.normals() {
            let n = DVec3::from_array(normals[index]);
            if !n.is_nan() {
                self.normal += n;
            }
        }
        if let Some(colors) = cloud.colors() {
            let [r, g, b] = colors[index];
            self.color += DVec3::new(r as f64, g as f64, b as f64);
        }
        self.num_points += 1;
    }

    fn average_point(&self) -> [f64; 3] {
        (self.point / self.num_points as f64).to_array()
    }

    // left un-normalized, call `PointCloud::normalize_normals` afterwards if needed
    fn average_normal(&self) -> [f64; 3] {
        (self.normal / self.num_points as f64).to_array()
    }

    fn average_color(&self) -> [u8; 3] {
        let c = (self.color / self.num_points as f64).round();
        [c.x as u8, c.y as u8, c.z as u8]
    }
}

/// A 3D voxel grid for downsampling point clouds.
///
/// Voxel indices are computed relative to the bounds of the cloud expanded by half a voxel.
#[derive(Debug, Clone, Copy)]
pub struct VoxelGrid {
    /// The edge length of a voxel.
    voxel_size: f64,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified voxel size.
    ///
    /// A non-positive voxel size turns the grid into a no-op.
    pub fn new(voxel_size: f64) -> Self {
        Self { voxel_size }
    }

    /// Computes the voxel bounds of a point cloud.
    ///
    /// # Returns
    ///
    /// The minimum and maximum corner of the cloud bounds expanded by half a voxel.
    pub fn voxel_bounds(&self, cloud: &PointCloud) -> (DVec3, DVec3) {
        let half = DVec3::splat(self.voxel_size * 0.5);
        (cloud.min_bound() - half, cloud.max_bound() + half)
    }

    /// Computes the voxel index for a given point.
    pub fn voxel_index(&self, point: &[f64; 3], voxel_min_bound: DVec3) -> IVec3 {
        let ref_coord = (DVec3::from_array(*point) - voxel_min_bound) / self.voxel_size;
        ref_coord.floor().as_ivec3()
    }

    /// Replaces the points of each voxel by their centroid.
    ///
    /// Equivalent to [`VoxelGrid::downsample_within`] with the tight bounds of the cloud.
    pub fn downsample(&self, cloud: &PointCloud) -> Result<PointCloud, VoxelGridError> {
        self.downsample_within(cloud, &BoundingBox::from_cloud(cloud))
    }

    /// Replaces the points of each voxel inside `bbox` by their centroid.
    ///
    /// Points outside `bbox` are copied through unmodified and come first in the output.
    /// Normals are averaged without re-normalization and colors are averaged.
    ///
    /// # Arguments
    ///
    /// * `cloud` - The input point cloud.
    /// * `bbox` - Only points inside this box take part in the voxel accumulation.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelGridError::VoxelSizeTooSmall`] when the voxel index range would overflow.
    pub fn downsample_within(
        &self,
        cloud: &PointCloud,
        bbox: &BoundingBox,
    ) -> Result<PointCloud, VoxelGridError> {
        if self.voxel_size <= 0.0 || cloud.is_empty() {
            return Ok(cloud.clone());
        }

        let (voxel_min_bound, voxel_max_bound) = self.voxel_bounds(cloud);
        let extent = (voxel_max_bound - voxel_min_bound).max_element();
        if self.voxel_size * (i32::MAX as f64) < extent {
            return Err(VoxelGridError::VoxelSizeTooSmall {
                voxel_size: self.voxel_size,
                extent,
            });
        }

        let has_normals = cloud.has_normals();
        let has_colors = cloud.colors().is_some();

        let mut points = Vec::with_capacity(cloud.len());
        let mut normals = has_normals.then(|| Vec::with_capacity(cloud.len()));
        let mut colors = has_colors.then(|| Vec::with_capacity(cloud.len()));

        let mut voxels: HashMap<IVec3, AccumulatedPoint> = HashMap::with_capacity(cloud.len());
        for (i, point) in cloud.points().iter().enumerate() {
            if bbox.contains(point) {
                voxels
                    .entry(self.voxel_index(point, voxel_min_bound))
                    .or_default()
                    .add_point(cloud, i);
            } else {
                points.push(*point);
                if let (Some(out), Some(src)) = (normals.as_mut(), cloud.normals()) {
                    out.push(src[i]);
                }
                if let (Some(out), Some(src)) = (colors.as_mut(), cloud.colors()) {
                    out.push(src[i]);
                }
            }
        }

        for voxel in voxels.values() {
            points.push(voxel.average_point());
            if let Some(out) = normals.as_mut() {
                out.push(voxel.average_normal());
            }
            if let Some(out) = colors.as_mut() {
                out.push(voxel.average_color());
            }
        }

        log::trace!(
            "voxelized {} points into {} with voxel size {}",
            cloud.len(),
            points.len(),
            self.voxel_size
        );

        Ok(PointCloud::new(points, colors, normals))
    }
}

/// Voxelize a point cloud. A non-positive voxel size returns the cloud unchanged.
pub fn voxelize(cloud: &PointCloud, voxel_size: f64) -> Result<PointCloud, VoxelGridError> {
    VoxelGrid::new(voxel_size).downsample(cloud)
}

/// Voxelize only the part of the point cloud inside `bbox`.
pub fn voxelize_within(
    cloud: &PointCloud,
    voxel_size: f64,
    bbox: &BoundingBox,
) -> Result<PointCloud, VoxelGridError> {
    VoxelGrid::new(voxel_size).downsample_within(cloud, bbox)
}
