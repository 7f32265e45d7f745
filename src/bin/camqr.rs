use camqr::config::Config;
use camqr::handlers::PRESET_IMAGE;
use camqr::{Pipeline, QrEngine, ReplayCamera, server};
use log::{LevelFilter, error, info};
use std::process::ExitCode;
use std::sync::Arc;

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("camqr::session", LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let config = Config::default();

    // No sensor attached: the camera replays the reference frame.
    let camera = match ReplayCamera::from_container(PRESET_IMAGE, config.camera_slots) {
        Ok(camera) => camera,
        Err(err) => {
            error!("Camera init failed: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let engine = QrEngine::with_pixel_budget(config.pixel_budget);
    let pipeline = Arc::new(Pipeline::new(camera, engine).with_retry_policy(config.retry));

    info!("Starting QR capture service on {}", config.bind_addr);
    match server::run(&config, pipeline).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
