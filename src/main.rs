//! embed-probe
//!
//! Opens an X11 window with a container widget, launches an emulator and
//! tries to get the emulator's window embedded in the container using one
//! of several methods. Meant for poking at windowing behaviour by hand.

mod app;
mod atoms;
mod cli;
mod config;
mod discovery;
mod embed;
mod launch;
mod reparent;
mod ui;
mod x11_async;
mod xembed;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Options;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("embed-probe");

    // Bad arguments never get as far as a window
    let options = match Options::parse(args.iter().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            println!("{}", cli::usage(program, &e));
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "embed_probe=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting embed-probe: widget={}, method={}", options.widget, options.method);

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {:#}", e);
        Config::default()
    });

    app::run(options, config).await
}
