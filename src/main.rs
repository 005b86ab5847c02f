// Example runner for the `dwell_vision` library: a short synthetic scene with one
// visitor who walks in and sits down, and one who passes through.

use dwell_vision::{MonitorConfig, Observation, OccupancyMonitor};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dwell_vision=info")),
        )
        .init();

    println!("Dwell Vision Engine - Example Runner");

    let mut monitor = match OccupancyMonitor::new(MonitorConfig::with_frame_size(320, 240)) {
        Ok(monitor) => monitor,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return;
        }
    };

    for step in 0..30u32 {
        let t = step as f64;
        let mut observations = Vec::new();

        // Visitor 1 walks for five seconds, then sits.
        let x = 20.0 + 20.0 * step.min(5) as f64;
        observations.push(Observation::with_box(1, x, 100.0, x + 40.0, 180.0));

        // Visitor 2 crosses the frame between t=10 and t=20.
        if (10..20).contains(&step) {
            let x = 300.0 - 25.0 * (step - 10) as f64;
            observations.push(Observation::with_box(2, x - 20.0, 40.0, x, 90.0));
        }

        let report = monitor.update(&observations, t);
        if !report.is_clean() {
            info!(issues = report.issues.len(), "tick had skipped observations");
        }
    }

    let snapshot = monitor.dashboard(30.0);
    println!(
        "occupancy: {} now, {} visitors total",
        snapshot.occupancy.current_occupancy, snapshot.occupancy.total_visitors
    );
    for record in monitor.dwell().history() {
        println!(
            "  id {:>3}: in view {:>5.1}s, still intervals {:?}",
            record.id, record.total_time, record.still_interval_history
        );
    }
}
