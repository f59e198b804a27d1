use clap::Parser;
use shuper::commands::create_command_registry;
use shuper::config::Config;
use shuper::display;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;

use crate::app::Application;
use crate::cli::Args;

#[tokio::main]
async fn main() {
    init_logging();

    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            display::display_error(&format!("Failed to load configuration: {}", e));
            std::process::exit(1);
        }
    };

    let command_dispatcher = create_command_registry();

    let mut app = match Application::new(args, config, command_dispatcher) {
        Ok(app) => app,
        Err(e) => {
            display::display_error(&e.to_string());
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        display::display_error(&e.to_string());
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,shuper=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
