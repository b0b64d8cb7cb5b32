use cfcap::configuration::config::Config;
use cfcap::controller::lifecycle::Controller;
use log::{error, info};

#[tokio::main]
async fn main() {
    // Example how to log
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
 ██████╗███████╗ ██████╗ █████╗ ██████╗
██╔════╝██╔════╝██╔════╝██╔══██╗██╔══██╗
██║     █████╗  ██║     ███████║██████╔╝
██║     ██╔══╝  ██║     ██╔══██║██╔═══╝
╚██████╗██║     ╚██████╗██║  ██║██║
 ╚═════╝╚═╝      ╚═════╝╚═╝  ╚═╝╚═╝
========================================
 Dual-proxy session capture recorder
========================================
"
    );

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create the controller: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Capture ended with an error: {}", e);
        std::process::exit(1);
    }

    info!("Capture finalized, exiting");
    // Fail-fast stop: relay tasks still holding client connections die with
    // the process instead of being drained.
    std::process::exit(0);
}
