#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Cropping volumes applied to raw scans.
pub mod cropping;

/// Random downsampling of point clouds.
pub mod downsample;

/// Surface normal estimation.
pub mod normals;

/// Point cloud container and bounding boxes.
pub mod pointcloud;

/// 3D rigid transforms.
pub mod transforms;

/// Voxel grid downsampling.
pub mod voxel_grid;
