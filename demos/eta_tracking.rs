//! Track a simulated vehicle along a route and print checkpoint ETAs.
//!
//! Positions are written to a location file and read back through
//! `FileLocationSource`, the same way a telemetry process would feed them.
//!
//! Run with: cargo run --example eta_tracking

use route_model::{
    CheckpointIndex, EtaConfig, EtaEngine, EtaSession, FileLocationSource, GpsPoint, RouteConfig, RouteModel,
    TimeUnit,
};

fn main() -> route_model::Result<()> {
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

    let route = RouteModel::new(&waypoints, RouteConfig::with_interval(25.0))?;
    let checkpoints = CheckpointIndex::build(&route, 1000.0)?;
    let config = EtaConfig {
        speed_kmh: 60.0,
        unit: TimeUnit::Minutes,
    };
    let engine = EtaEngine::new(&route, &checkpoints, config)?;

    let location_file = std::env::temp_dir().join("current_location.txt");
    let source = FileLocationSource::new(&location_file);
    let mut session = EtaSession::new();

    println!("ETA tracking at {} km/h over {} checkpoints\n", config.speed_kmh, checkpoints.len());

    // No fix written yet: the refresh fails and the session keeps its state
    let _ = std::fs::remove_file(&location_file);
    if let Err(e) = session.refresh(&engine, &source) {
        println!("initial refresh failed: {}\n", e);
    }

    // Drive along the route, sampling every 40th point with a small offset
    for point in route.points().iter().step_by(40) {
        let fix = GpsPoint::new(point.latitude + 0.0001, point.longitude - 0.0001);
        std::fs::write(&location_file, format!("{}, {}\n", fix.latitude, fix.longitude))?;

        let report = session.refresh(&engine, &source)?;
        let etas: Vec<String> = report
            .etas
            .iter()
            .map(|eta| match *eta {
                e if e < 0.0 => "   -".to_string(),
                e => format!("{:4.1}", e),
            })
            .collect();

        println!(
            "{:>6.0}m  checkpoint {}  ({:>4.1}m off route)  [{}]",
            point.trip_distance_m,
            report.current_checkpoint,
            report.nearest.distance_m,
            etas.join(" ")
        );
    }

    let _ = std::fs::remove_file(&location_file);
    Ok(())
}
