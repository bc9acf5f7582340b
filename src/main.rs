//! Kinetica demo runner

use kinetica::config::AppConfig;
use kinetica::demo;

fn main() {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.debug.log_level)).init();
    log::info!("Starting Kinetica");

    match demo::run(&config) {
        Ok(report) => {
            log::info!("lowest body at y = {:.3}", report.lowest_y);
            if let Some(distance) = report.ground_distance {
                log::info!("downward ray hit ground at distance {:.3}", distance);
            }
        }
        Err(e) => {
            log::error!("demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
