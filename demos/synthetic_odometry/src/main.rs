use argh::FromArgs;
use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;

use lidar_odom::{LidarOdometry, OdometryParameters, OdometryToolsParameters};
use lidar_odom_3d::{pointcloud::PointCloud, transforms::RigidTransform};

#[derive(FromArgs)]
/// Run the lidar odometry on a synthetic room scanned by a moving sensor
struct Args {
    /// path to a JSON odometry configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of scans to simulate
    #[argh(option, default = "20")]
    num_scans: usize,

    /// standard deviation of the range noise in meters
    #[argh(option, default = "0.0")]
    noise: f64,

    /// seed of the random number generators
    #[argh(option, default = "42")]
    seed: u64,
}

/// Random points on the floor, the ceiling and the four walls of a box shaped room.
fn box_room(rng: &mut StdRng, points_per_face: usize) -> PointCloud {
    let (hx, hy, hz) = (6.0, 4.0, 1.5);
    let mut points = Vec::with_capacity(6 * points_per_face);
    for _ in 0..points_per_face {
        let (x, y, z) = (
            rng.random_range(-hx..hx),
            rng.random_range(-hy..hy),
            rng.random_range(-hz..hz),
        );
        points.push([x, y, -hz]);
        points.push([x, y, hz]);
        points.push([x, -hy, z]);
        points.push([x, hy, z]);
        points.push([-hx, y, z]);
        points.push([hx, y, z]);
    }
    PointCloud::from_points(points)
}

/// The room as seen from `sensor_pose`, with noise along each ray.
fn simulate_scan(
    room: &PointCloud,
    sensor_pose: &RigidTransform,
    noise: f64,
    rng: &mut StdRng,
) -> PointCloud {
    let scan = room.transformed(&sensor_pose.inverse());
    if noise <= 0.0 {
        return scan;
    }
    let points = scan
        .points()
        .iter()
        .map(|p| {
            let ray = DVec3::from_array(*p);
            // sum of uniforms, close enough to a gaussian for a demo
            let n = (0..4).map(|_| rng.random_range(-1.0f64..1.0)).sum::<f64>() * noise * 0.866;
            (ray + ray.normalize_or_zero() * n).to_array()
        })
        .collect();
    PointCloud::from_points(points)
}

fn default_parameters() -> OdometryParameters {
    let mut tools = OdometryToolsParameters::default();
    tools.min_acceptable_fitness = 0.5;
    tools.scan_matching.max_correspondence_dist = 0.5;
    tools.scan_processing.scan_cropping.cropping_radius_max = 20.0;
    OdometryParameters {
        scan_to_scan: tools,
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let params = match &args.config {
        Some(path) => lidar_odom::load_parameters(path)?,
        None => default_parameters(),
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let room = box_room(&mut rng, 4000);
    println!("Room: #{} points", room.len());

    let mut odometry =
        LidarOdometry::new(&params)?.with_rng(StdRng::seed_from_u64(args.seed.wrapping_add(1)));

    let step = RigidTransform::from_axis_angle(DVec3::Z, 0.02, DVec3::new(0.1, 0.02, 0.0));
    let mut sensor_pose = RigidTransform::IDENTITY;
    let mut num_accepted = 0;

    for k in 0..args.num_scans {
        let timestamp = k as f64 * 0.1;
        let scan = simulate_scan(&room, &sensor_pose, args.noise, &mut rng);
        let accepted = odometry.add_scan(&scan, timestamp)?;
        if accepted {
            num_accepted += 1;
        }

        let estimate = odometry.odom_pose(timestamp)?;
        let error = estimate.inverse() * sensor_pose;
        println!(
            "t={timestamp:.1} accepted={accepted} translation error={:.4} m rotation error={:.4} deg",
            error.translation().length(),
            error.angle().to_degrees()
        );
        if let Some(diagnostics) = odometry.last_diagnostics() {
            log::info!(
                "scan {k}: {} points, reference {} points, elapsed {:?}",
                diagnostics.scan_size,
                diagnostics.reference_size,
                diagnostics.elapsed
            );
        }

        sensor_pose = sensor_pose * step;
    }

    println!(
        "Accepted {num_accepted}/{} scans, final pose:\n  estimated: {}\n  ground truth: {}",
        args.num_scans,
        odometry.cumulative_pose(),
        sensor_pose * step.inverse()
    );

    Ok(())
}
