use std::time::{Duration, Instant};

use rand::{rngs::StdRng, SeedableRng};

use lidar_odom_3d::{pointcloud::PointCloud, transforms::RigidTransform};
use lidar_odom_icp::{IterativeClosestPoint, Registration, RegistrationResult};

use crate::buffer::{BufferError, TransformInterpolationBuffer};
use crate::config::OdometryParameters;
use crate::error::OdometryError;
use crate::tools::{OdometryTools, ToolSet};

/// Tracking state of the odometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdometryState {
    /// No reference cloud yet, the next scan initializes the odometry.
    Uninitialized,
    /// Scans are registered against the previous cloud.
    Tracking,
}

/// What happened to the last scan handed to [`LidarOdometry::add_scan`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDiagnostics {
    /// Timestamp of the scan.
    pub timestamp: f64,
    /// Whether the scan was accepted.
    pub accepted: bool,
    /// The tool set the scan was processed with.
    pub tool_set: ToolSet,
    /// Registration outcome, absent when no registration was attempted.
    pub registration: Option<RegistrationResult>,
    /// Number of points of the processed scan.
    pub scan_size: usize,
    /// Number of points of the reference cloud.
    pub reference_size: usize,
    /// Number of poses in the buffer after the scan.
    pub buffer_size: usize,
    /// Time spent processing the scan.
    pub elapsed: Duration,
}

/// Scan-to-scan lidar odometry.
///
/// Every scan is preprocessed and the previous processed scan is registered onto it. Accepted
/// registrations are chained into the cumulative `odom_T_sensor` pose which is stored,
/// stamped, in a [`TransformInterpolationBuffer`].
///
/// Example:
///
/// ```
/// use lidar_odom::{LidarOdometry, OdometryParameters};
/// use lidar_odom_3d::pointcloud::PointCloud;
///
/// let mut odometry = LidarOdometry::new(&OdometryParameters::default())?;
/// let scan = PointCloud::from_points(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
/// assert!(odometry.add_scan(&scan, 0.0)?);
/// assert!(odometry.has_processed_measurements());
/// # Ok::<(), lidar_odom::OdometryError>(())
/// ```
#[derive(Debug)]
pub struct LidarOdometry<R: Registration = IterativeClosestPoint> {
    steady_state: OdometryTools,
    map_initializing: Option<OdometryTools>,
    is_map_initializing: bool,
    previous_cloud: PointCloud,
    cumulative_pose: RigidTransform,
    last_accepted: Option<f64>,
    buffer: TransformInterpolationBuffer,
    registration: R,
    rng: StdRng,
    last_diagnostics: Option<ScanDiagnostics>,
}

impl LidarOdometry<IterativeClosestPoint> {
    /// Create the odometry with the ICP registration.
    ///
    /// # Errors
    ///
    /// Fails on an unknown cropper or objective name, or when map initialization is enabled
    /// without its parameters.
    pub fn new(params: &OdometryParameters) -> Result<Self, OdometryError> {
        if params.is_map_initializing && params.map_initializing.is_none() {
            return Err(OdometryError::MissingMapInitializingParameters);
        }

        let steady_state = OdometryTools::from_parameters(&params.scan_to_scan)?;
        let map_initializing = params
            .map_initializing
            .as_ref()
            .map(OdometryTools::from_parameters)
            .transpose()?;

        let buffer = match params.pose_buffer_size {
            Some(max_len) => TransformInterpolationBuffer::with_max_len(max_len),
            None => TransformInterpolationBuffer::new(),
        };

        Ok(Self {
            steady_state,
            map_initializing,
            is_map_initializing: params.is_map_initializing,
            previous_cloud: PointCloud::default(),
            cumulative_pose: RigidTransform::IDENTITY,
            last_accepted: None,
            buffer,
            registration: IterativeClosestPoint::new(),
            rng: StdRng::seed_from_u64(rand::random()),
            last_diagnostics: None,
        })
    }
}

impl<R: Registration> LidarOdometry<R> {
    /// Replace the registration method.
    pub fn with_registration<S: Registration>(self, registration: S) -> LidarOdometry<S> {
        LidarOdometry {
            steady_state: self.steady_state,
            map_initializing: self.map_initializing,
            is_map_initializing: self.is_map_initializing,
            previous_cloud: self.previous_cloud,
            cumulative_pose: self.cumulative_pose,
            last_accepted: self.last_accepted,
            buffer: self.buffer,
            registration,
            rng: self.rng,
            last_diagnostics: self.last_diagnostics,
        }
    }

    /// Use `rng` for the random downsampling.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Start the trajectory at `pose` instead of the identity.
    pub fn with_initial_pose(mut self, pose: RigidTransform) -> Self {
        self.cumulative_pose = pose;
        self
    }

    /// Seed the initial guess of the map initializing registration.
    ///
    /// Has no effect once the first registration was accepted.
    pub fn set_initial_transform(&mut self, transform: RigidTransform) {
        match self.map_initializing.as_mut() {
            Some(tools) => tools.initial_guess = transform,
            None => log::warn!("No map initializing tools, the initial transform is ignored"),
        }
    }

    /// Process a scan.
    ///
    /// Returns `Ok(true)` when the scan was accepted and `Ok(false)` when it was rejected. A
    /// rejected scan leaves the pose untouched but still becomes the reference for the next
    /// scan.
    ///
    /// # Arguments
    ///
    /// * `cloud` - The raw scan in the sensor frame.
    /// * `timestamp` - Time of the scan in seconds.
    ///
    /// # Errors
    ///
    /// Only configuration errors are returned, e.g. a voxel size too small for the scan.
    pub fn add_scan(&mut self, cloud: &PointCloud, timestamp: f64) -> Result<bool, OdometryError> {
        if !timestamp.is_finite() {
            log::warn!("Rejecting scan with non finite timestamp {timestamp}");
            return Ok(false);
        }
        if let Some(last) = self.last_accepted {
            if timestamp <= last {
                log::warn!(
                    "Rejecting out of order scan at t={timestamp}, last accepted t={last}"
                );
                return Ok(false);
            }
        }

        let now = Instant::now();
        let tool_set = self.active_tool_set();
        let tools = match (tool_set, self.map_initializing.as_ref()) {
            (ToolSet::MapInitializing, Some(tools)) => tools,
            _ => &self.steady_state,
        };

        let processed = tools.preprocess(cloud, &mut self.rng)?;
        let scan_size = processed.len();
        let reference_size = self.previous_cloud.len();

        if self.previous_cloud.is_empty() {
            if processed.is_empty() {
                log::warn!("First scan at t={timestamp} is empty after preprocessing");
            } else {
                log::info!(
                    "Odometry initialized at t={timestamp} with {} points",
                    processed.len()
                );
            }
            self.buffer.push(timestamp, self.cumulative_pose)?;
            self.previous_cloud = processed;
            self.last_accepted = Some(timestamp);
            self.record(ScanDiagnostics {
                timestamp,
                accepted: true,
                tool_set,
                registration: None,
                scan_size,
                reference_size,
                buffer_size: self.buffer.len(),
                elapsed: now.elapsed(),
            });
            return Ok(true);
        }

        if processed.is_empty() {
            self.record(ScanDiagnostics {
                timestamp,
                accepted: false,
                tool_set,
                registration: None,
                scan_size,
                reference_size,
                buffer_size: self.buffer.len(),
                elapsed: now.elapsed(),
            });
            return Ok(false);
        }

        // align the reference onto the new scan, the result is `current_T_previous`
        let result = match self.registration.register(
            &processed,
            &self.previous_cloud,
            tools.max_correspondence_distance(),
            &tools.initial_guess,
            tools.objective,
            &tools.criteria,
        ) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("Registration of scan at t={timestamp} failed: {err}");
                RegistrationResult::unmatched(tools.initial_guess)
            }
        };

        let accepted = result.fitness > tools.min_acceptable_fitness();
        if accepted {
            let pose = self.cumulative_pose * result.transformation.inverse();
            self.buffer.push(timestamp, pose)?;
            self.cumulative_pose = pose;
            self.last_accepted = Some(timestamp);
            if self.is_map_initializing {
                log::info!("Map initialization finished at t={timestamp}");
                self.is_map_initializing = false;
            }
        }
        self.previous_cloud = processed;

        self.record(ScanDiagnostics {
            timestamp,
            accepted,
            tool_set,
            registration: Some(result),
            scan_size,
            reference_size,
            buffer_size: self.buffer.len(),
            elapsed: now.elapsed(),
        });

        Ok(accepted)
    }

    fn record(&mut self, diagnostics: ScanDiagnostics) {
        let (fitness, rmse, transform) = match &diagnostics.registration {
            Some(r) => (r.fitness, r.inlier_rmse, r.transformation),
            None => (f64::NAN, f64::NAN, RigidTransform::IDENTITY),
        };
        if diagnostics.accepted {
            log::debug!(
                "Scan at t={} accepted ({:?}): fitness {}, rmse {}, scan {} pts, reference {} pts, buffer {}, elapsed {:?}, transform {}",
                diagnostics.timestamp,
                diagnostics.tool_set,
                fitness,
                rmse,
                diagnostics.scan_size,
                diagnostics.reference_size,
                diagnostics.buffer_size,
                diagnostics.elapsed,
                transform
            );
        } else {
            log::warn!(
                "Scan at t={} rejected ({:?}): fitness {}, rmse {}, scan {} pts, reference {} pts, elapsed {:?}, transform {}",
                diagnostics.timestamp,
                diagnostics.tool_set,
                fitness,
                rmse,
                diagnostics.scan_size,
                diagnostics.reference_size,
                diagnostics.elapsed,
                transform
            );
        }
        self.last_diagnostics = Some(diagnostics);
    }

    /// The tool set the next scan will be processed with.
    pub fn active_tool_set(&self) -> ToolSet {
        if self.is_map_initializing && self.map_initializing.is_some() {
            ToolSet::MapInitializing
        } else {
            ToolSet::SteadyState
        }
    }

    /// The tools of a tool set, the steady state ones if map initializing tools are absent.
    pub fn tools(&self, tool_set: ToolSet) -> &OdometryTools {
        match (tool_set, self.map_initializing.as_ref()) {
            (ToolSet::MapInitializing, Some(tools)) => tools,
            _ => &self.steady_state,
        }
    }

    /// The odometry pose at `timestamp`, interpolated from the buffered poses.
    pub fn odom_pose(&self, timestamp: f64) -> Result<RigidTransform, BufferError> {
        self.buffer.lookup(timestamp)
    }

    /// The reference cloud the next scan is registered against.
    pub fn preprocessed_cloud(&self) -> &PointCloud {
        &self.previous_cloud
    }

    /// Whether at least one pose was stored.
    pub fn has_processed_measurements(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// The stamped pose history.
    pub fn buffer(&self) -> &TransformInterpolationBuffer {
        &self.buffer
    }

    /// The pose after the last accepted scan.
    pub fn cumulative_pose(&self) -> RigidTransform {
        self.cumulative_pose
    }

    /// Timestamp of the last accepted scan.
    pub fn last_accepted_time(&self) -> Option<f64> {
        self.last_accepted
    }

    /// Whether the map initializing flag is still set.
    pub fn is_map_initializing(&self) -> bool {
        self.is_map_initializing
    }

    /// Whether a reference cloud is available.
    pub fn state(&self) -> OdometryState {
        if self.previous_cloud.is_empty() {
            OdometryState::Uninitialized
        } else {
            OdometryState::Tracking
        }
    }

    /// Diagnostics of the last processed scan.
    pub fn last_diagnostics(&self) -> Option<&ScanDiagnostics> {
        self.last_diagnostics.as_ref()
    }

    /// The registration method.
    pub fn registration(&self) -> &R {
        &self.registration
    }
}
