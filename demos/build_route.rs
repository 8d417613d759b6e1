//! Build a route model from waypoints, generate checkpoints and export CSVs.
//!
//! Run with: cargo run --example build_route [output_dir]

use route_model::{CheckpointIndex, GpsPoint, RouteConfig, RouteModel};

fn main() -> route_model::Result<()> {
    // Waterloo test loop
    let waypoints = vec![
        GpsPoint::new(43.46786317655638, -80.56637564010215),
        GpsPoint::new(43.48175280991097, -80.52637854159468),
        GpsPoint::new(43.48536483714299, -80.5270651870626),
        GpsPoint::new(43.48511573875007, -80.52869597004897),
        GpsPoint::new(43.48536483714299, -80.52989759961787),
        GpsPoint::new(43.48604985242712, -80.5304984144023),
        GpsPoint::new(43.48816712335336, -80.5320433668198),
        GpsPoint::new(43.489910702452285, -80.53461828732458),
        GpsPoint::new(43.49196557034531, -80.53762236124682),
        GpsPoint::new(43.494347261633344, -80.5482439084337),
    ];

    let config = RouteConfig::with_interval(100.0);
    let route = RouteModel::new(&waypoints, config)?;

    println!("Route Model\n");
    println!("  waypoints:      {}", route.waypoints().len());
    println!("  dense points:   {}", route.len());
    println!("  interval bound: {}m", route.interval_upper_bound());
    println!("  total distance: {:.1}m", route.total_distance());
    let center = route.bounds().center();
    println!("  center:         ({:.5}, {:.5})\n", center.latitude, center.longitude);

    println!("Turns:");
    for (i, point) in route.points().iter().enumerate() {
        if let (Some(turn), Some(angle)) = (point.turn_type, point.turn_bearing) {
            println!(
                "  #{:<4} {:>7.0}m  {:<15} {:>7.2}°  heading {}",
                i,
                point.trip_distance_m,
                turn.to_string(),
                angle,
                point.travel_direction.as_deref().unwrap_or("-")
            );
        }
    }

    let checkpoints = CheckpointIndex::build(&route, 1000.0)?;
    println!("\nCheckpoints every {}m:", checkpoints.frequency());
    for (k, cp) in checkpoints.checkpoints().iter().enumerate() {
        println!(
            "  {:>2}: ({:.6}, {:.6}) at point {}",
            k, cp.latitude, cp.longitude, cp.route_model_index
        );
    }

    let out_dir = std::env::args().nth(1).unwrap_or_else(|| std::env::temp_dir().display().to_string());
    let out_dir = std::path::Path::new(&out_dir);
    let route_path = checkpoints.save_route_csv(&route, out_dir.join("route_model_db"))?;
    let checkpoint_path = checkpoints.save_csv(out_dir.join("checkpoint_model_db"))?;

    println!("\nWrote {}", route_path.display());
    println!("Wrote {}", checkpoint_path.display());
    Ok(())
}
