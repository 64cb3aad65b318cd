use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;

use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use lidar_odom::{
    config::ScanCroppingParameters, load_parameters, BufferError, ConfigError, LidarOdometry,
    OdometryError, OdometryParameters, OdometryToolsParameters, ToolSet,
};
use lidar_odom_3d::{cropping::CroppingError, pointcloud::PointCloud, transforms::RigidTransform};
use lidar_odom_icp::{
    IcpConvergenceCriteria, IcpError, IcpObjective, Registration, RegistrationResult,
};

/// Registration returning scripted fitness values and recording its inputs.
#[derive(Debug, Default)]
struct ScriptedRegistration {
    fitness: RefCell<VecDeque<f64>>,
    transformation: RigidTransform,
    guesses: RefCell<Vec<RigidTransform>>,
    source_sizes: RefCell<Vec<usize>>,
}

impl ScriptedRegistration {
    fn new(fitness: &[f64], transformation: RigidTransform) -> Self {
        Self {
            fitness: RefCell::new(fitness.iter().copied().collect()),
            transformation,
            ..Default::default()
        }
    }
}

impl Registration for ScriptedRegistration {
    fn register(
        &self,
        _target: &PointCloud,
        source: &PointCloud,
        _max_correspondence_distance: f64,
        initial_guess: &RigidTransform,
        _objective: IcpObjective,
        _criteria: &IcpConvergenceCriteria,
    ) -> Result<RegistrationResult, IcpError> {
        self.guesses.borrow_mut().push(*initial_guess);
        self.source_sizes.borrow_mut().push(source.len());
        Ok(RegistrationResult {
            transformation: self.transformation,
            fitness: self.fitness.borrow_mut().pop_front().unwrap_or(0.0),
            inlier_rmse: 0.01,
            num_iterations: 1,
        })
    }
}

fn tools_params(min_acceptable_fitness: f64) -> OdometryToolsParameters {
    let mut params = OdometryToolsParameters {
        min_acceptable_fitness,
        ..Default::default()
    };
    params.scan_matching.icp_objective = "PointToPoint".to_string();
    params.scan_processing.voxel_size = 0.0;
    params.scan_processing.scan_cropping = ScanCroppingParameters {
        cropper_type: "Passthrough".to_string(),
        ..Default::default()
    };
    params
}

fn params(min_acceptable_fitness: f64) -> OdometryParameters {
    OdometryParameters {
        scan_to_scan: tools_params(min_acceptable_fitness),
        ..Default::default()
    }
}

fn random_scan(rng: &mut StdRng, num_points: usize) -> PointCloud {
    let points = (0..num_points)
        .map(|_| {
            [
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
                rng.random_range(-1.0..1.0),
            ]
        })
        .collect();
    PointCloud::from_points(points)
}

fn motion() -> RigidTransform {
    RigidTransform::from_axis_angle(DVec3::Z, 0.1, DVec3::new(0.5, 0.1, 0.0))
}

#[test]
fn three_scan_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(7);
    let registration = ScriptedRegistration::new(&[0.9, 0.3], motion());
    let mut odom = LidarOdometry::new(&params(0.7))?.with_registration(registration);

    assert!(odom.add_scan(&random_scan(&mut rng, 100), 0.0)?);
    assert_eq!(odom.cumulative_pose(), RigidTransform::IDENTITY);

    assert!(odom.add_scan(&random_scan(&mut rng, 110), 1.0)?);
    let pose_at_1 = motion().inverse();
    assert!(odom.cumulative_pose().abs_diff_eq(&pose_at_1, 1e-12));

    assert!(!odom.add_scan(&random_scan(&mut rng, 120), 2.0)?);
    // the pose does not move but the reference follows the rejected scan
    assert!(odom.cumulative_pose().abs_diff_eq(&pose_at_1, 1e-12));
    assert_eq!(odom.preprocessed_cloud().len(), 120);
    assert_eq!(odom.last_accepted_time(), Some(1.0));

    assert_eq!(odom.buffer().len(), 2);
    let stamps = odom.buffer().iter().map(|s| s.timestamp).collect::<Vec<_>>();
    assert_eq!(stamps, vec![0.0, 1.0]);
    assert!(odom.has_processed_measurements());
    assert_eq!(odom.odom_pose(1.5)?, odom.odom_pose(1.0)?);
    assert!(odom.odom_pose(1.5)?.abs_diff_eq(&pose_at_1, 1e-12));

    let diagnostics = odom.last_diagnostics().ok_or("missing diagnostics")?;
    assert!(!diagnostics.accepted);
    assert_eq!(diagnostics.scan_size, 120);
    assert_eq!(diagnostics.reference_size, 110);
    assert_eq!(diagnostics.buffer_size, 2);
    assert_eq!(diagnostics.registration.map(|r| r.fitness), Some(0.3));

    // the registration aligns the reference onto the new scan
    assert_eq!(*odom.registration().source_sizes.borrow(), vec![100, 110]);
    Ok(())
}

#[test]
fn next_scan_registers_against_rejected_geometry() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(3);
    let registration = ScriptedRegistration::new(&[0.1, 0.9], motion());
    let mut odom = LidarOdometry::new(&params(0.7))?.with_registration(registration);

    assert!(odom.add_scan(&random_scan(&mut rng, 10), 0.0)?);
    assert!(!odom.add_scan(&random_scan(&mut rng, 20), 1.0)?);
    assert!(odom.add_scan(&random_scan(&mut rng, 30), 2.0)?);

    assert_eq!(*odom.registration().source_sizes.borrow(), vec![10, 20]);
    let stamps = odom.buffer().iter().map(|s| s.timestamp).collect::<Vec<_>>();
    assert_eq!(stamps, vec![0.0, 2.0]);
    Ok(())
}

#[test]
fn rejection_keeps_pose() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(11);
    let registration = ScriptedRegistration::new(&[0.9, 0.7, 0.0, 0.69], motion());
    let mut odom = LidarOdometry::new(&params(0.7))?.with_registration(registration);

    assert!(odom.add_scan(&random_scan(&mut rng, 50), 0.0)?);
    assert!(odom.add_scan(&random_scan(&mut rng, 50), 1.0)?);
    let pose = odom.cumulative_pose();

    // fitness equal to the threshold is a rejection
    for t in [2.0, 3.0, 4.0] {
        assert!(!odom.add_scan(&random_scan(&mut rng, 50), t)?);
        assert_eq!(odom.cumulative_pose(), pose);
    }
    assert_eq!(odom.buffer().len(), 2);
    Ok(())
}

#[test]
fn buffer_stays_strictly_increasing() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(5);
    let fitness = (0..50).map(|_| rng.random::<f64>()).collect::<Vec<_>>();
    let registration = ScriptedRegistration::new(&fitness, motion());
    let mut odom = LidarOdometry::new(&params(0.5))?.with_registration(registration);

    let mut t = 0.0f64;
    for _ in 0..50 {
        // a mix of increasing, repeated and stale timestamps
        t += rng.random_range(-0.5..1.0);
        odom.add_scan(&random_scan(&mut rng, 20), t)?;
    }

    let stamps = odom.buffer().iter().map(|s| s.timestamp).collect::<Vec<_>>();
    assert!(!stamps.is_empty());
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn map_initializing_is_one_way() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(1);
    let params = OdometryParameters {
        is_map_initializing: true,
        map_initializing: Some(tools_params(0.5)),
        ..params(0.8)
    };
    let registration = ScriptedRegistration::new(&[0.4, 0.6, 0.6, 0.9], motion());
    let mut odom = LidarOdometry::new(&params)?.with_registration(registration);

    let guess = RigidTransform::from_translation(DVec3::new(0.0, 0.0, 1.0));
    odom.set_initial_transform(guess);

    assert!(odom.add_scan(&random_scan(&mut rng, 10), 0.0)?);
    assert!(odom.is_map_initializing());

    // rejected in map initializing mode, the flag stays
    assert!(!odom.add_scan(&random_scan(&mut rng, 10), 1.0)?);
    assert!(odom.is_map_initializing());
    assert_eq!(odom.active_tool_set(), ToolSet::MapInitializing);

    // accepted with the looser threshold, the flag clears
    assert!(odom.add_scan(&random_scan(&mut rng, 10), 2.0)?);
    assert!(!odom.is_map_initializing());
    assert_eq!(odom.active_tool_set(), ToolSet::SteadyState);

    // the same fitness is now below the steady state threshold
    assert!(!odom.add_scan(&random_scan(&mut rng, 10), 3.0)?);
    assert!(!odom.is_map_initializing());
    assert!(odom.add_scan(&random_scan(&mut rng, 10), 4.0)?);
    assert!(!odom.is_map_initializing());

    // the seeded guess is only used while map initializing
    let guesses = odom.registration().guesses.borrow().clone();
    assert_eq!(
        guesses,
        vec![guess, guess, RigidTransform::IDENTITY, RigidTransform::IDENTITY]
    );
    Ok(())
}

#[test]
fn empty_buffer_lookup() -> Result<(), Box<dyn std::error::Error>> {
    let odom = LidarOdometry::new(&params(0.7))?;
    assert_eq!(odom.odom_pose(0.0), Err(BufferError::NotAvailable));
    assert!(!odom.has_processed_measurements());
    Ok(())
}

#[test]
fn bounded_pose_buffer() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(9);
    let params = OdometryParameters {
        pose_buffer_size: Some(3),
        ..params(0.5)
    };
    let registration = ScriptedRegistration::new(&[0.9; 10], motion());
    let mut odom = LidarOdometry::new(&params)?.with_registration(registration);

    for i in 0..6 {
        assert!(odom.add_scan(&random_scan(&mut rng, 10), i as f64)?);
    }
    assert_eq!(odom.buffer().len(), 3);
    assert_eq!(odom.buffer().earliest_time(), Some(3.0));
    Ok(())
}

/// Floor and three walls of a room, in the world frame.
fn room_grid() -> PointCloud {
    let mut world = Vec::new();
    for i in 0..40 {
        for j in 0..40 {
            let (a, b) = (i as f64 * 0.25 - 5.0, j as f64 * 0.25 - 5.0);
            world.push([a, b, -1.5]);
            world.push([a, -5.0, b * 0.4 + 0.5]);
            world.push([-5.0, a, b * 0.4 + 0.5]);
            world.push([a * 0.6 + 2.0, 4.0, b * 0.4 + 0.5]);
        }
    }
    PointCloud::from_points(world)
}

#[test]
fn icp_tracks_a_moving_sensor() -> Result<(), Box<dyn std::error::Error>> {
    let world = room_grid();

    let mut tools = tools_params(0.6);
    tools.scan_matching.max_correspondence_dist = 0.5;
    tools.scan_matching.max_n_iter = 60;
    let mut odom = LidarOdometry::new(&OdometryParameters {
        scan_to_scan: tools,
        ..Default::default()
    })?;

    let step = RigidTransform::from_axis_angle(DVec3::Z, 0.01, DVec3::new(0.03, 0.01, 0.0));
    let mut sensor_pose = RigidTransform::IDENTITY;
    for k in 0..5 {
        let scan = world.transformed(&sensor_pose.inverse());
        assert!(odom.add_scan(&scan, k as f64 * 0.1)?);
        sensor_pose = sensor_pose * step;
    }

    let last = odom.odom_pose(0.4)?;
    let expected = (0..4).fold(RigidTransform::IDENTITY, |acc, _| acc * step);
    assert!(
        last.abs_diff_eq(&expected, 1e-2),
        "estimated {last}, expected {expected}"
    );
    Ok(())
}

#[test]
fn point_to_plane_tracks_a_moving_sensor() -> Result<(), Box<dyn std::error::Error>> {
    let world = room_grid();

    // default objective and cropper, no voxelization so every scan point has its exact match
    let mut tools = OdometryToolsParameters {
        min_acceptable_fitness: 0.6,
        ..Default::default()
    };
    tools.scan_processing.voxel_size = 0.0;
    tools.scan_matching.max_correspondence_dist = 0.5;
    assert_eq!(tools.scan_matching.icp_objective, "PointToPlane");

    let mut odom = LidarOdometry::new(&OdometryParameters {
        scan_to_scan: tools,
        ..Default::default()
    })?;

    let step = RigidTransform::from_axis_angle(DVec3::Z, 0.01, DVec3::new(0.03, 0.01, 0.0));
    let mut sensor_pose = RigidTransform::IDENTITY;
    for k in 0..5 {
        let timestamp = k as f64 * 0.1;
        let scan = world.transformed(&sensor_pose.inverse());
        assert!(odom.add_scan(&scan, timestamp)?);

        // the incoming scan becomes the normal-carrying target of the next registration
        assert!(odom.preprocessed_cloud().has_normals());
        assert_eq!(odom.preprocessed_cloud().len(), world.len());

        let estimate = odom.odom_pose(timestamp)?;
        assert!(
            estimate.abs_diff_eq(&sensor_pose, 1e-4),
            "scan {k}: estimated {estimate}, expected {sensor_pose}"
        );
        sensor_pose = sensor_pose * step;
    }

    let diagnostics = odom.last_diagnostics().ok_or("missing diagnostics")?;
    assert_eq!(diagnostics.tool_set, ToolSet::SteadyState);
    let registration = diagnostics.registration.ok_or("missing registration")?;
    assert!(registration.fitness > 0.99);
    assert!(registration.inlier_rmse < 1e-4);
    Ok(())
}

#[test]
fn load_parameters_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let params = OdometryParameters {
        is_map_initializing: true,
        pose_buffer_size: Some(1000),
        scan_to_scan: tools_params(0.7),
        map_initializing: Some(tools_params(0.4)),
    };
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(params.to_json_string()?.as_bytes())?;

    let loaded = load_parameters(file.path())?;
    assert_eq!(loaded, params);

    let odom = LidarOdometry::new(&loaded)?;
    assert!(odom.is_map_initializing());
    assert_eq!(
        odom.tools(ToolSet::MapInitializing).min_acceptable_fitness(),
        0.4
    );
    Ok(())
}

#[test]
fn load_parameters_errors() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    assert!(matches!(
        load_parameters(dir.path().join("missing.json")),
        Err(ConfigError::Io(_))
    ));

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"odometry\": { \"is_map_initializing\": ")?;
    assert!(matches!(load_parameters(&path), Err(ConfigError::Parse(_))));
    Ok(())
}

#[test]
fn unknown_names_are_fatal() {
    let mut bad_cropper = params(0.7);
    bad_cropper.scan_to_scan.scan_processing.scan_cropping.cropper_type = "Sphere".to_string();
    assert!(matches!(
        LidarOdometry::new(&bad_cropper),
        Err(OdometryError::Cropping(CroppingError::UnknownVolume(name))) if name == "Sphere"
    ));

    let mut bad_objective = params(0.7);
    bad_objective.scan_to_scan.scan_matching.icp_objective = "Generalized".to_string();
    assert!(matches!(
        LidarOdometry::new(&bad_objective),
        Err(OdometryError::Registration(IcpError::UnknownObjective(_)))
    ));
}
