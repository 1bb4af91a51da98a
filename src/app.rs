//! Probe event loop
//!
//! Shows the probe window, fires the one-shot launch timer, pumps X events
//! and tears everything down on close or on SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;

use crate::cli::Options;
use crate::config::Config;
use crate::discovery::{self, RetryPolicy};
use crate::embed::{EmbedHarness, EmbedState};
use crate::launch::CommandLauncher;
use crate::reparent::X11Reparenter;
use crate::ui::{ProbeWindow, UiAction};
use crate::x11_async::X11EventStream;

pub async fn run(options: Options, config: Config) -> Result<()> {
    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
    let conn = Arc::new(conn);
    let root = conn.setup().roots[screen_num].root;
    info!("Connected to X server, screen {}, root window 0x{:x}", screen_num, root);

    let mut probe = ProbeWindow::create(conn.clone(), screen_num, options, &config.container)
        .context("Failed to create probe window")?;
    probe.show()?;

    let events = X11EventStream::new(conn.clone())?;

    let finder = discovery::finder_for(config.discovery.backend, &config.emulator, conn.clone(), root);
    let mut harness = EmbedHarness::new(
        options.method,
        config.emulator.clone(),
        RetryPolicy::from(&config.discovery),
        Box::new(CommandLauncher::new()),
        finder,
        Box::new(X11Reparenter::new(conn.clone())),
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let launch_timer = tokio::time::sleep(config.launch.delay());
    tokio::pin!(launch_timer);
    let mut launched = false;

    info!("Entering event loop");
    'events: loop {
        tokio::select! {
            _ = &mut launch_timer, if !launched => {
                launched = true;
                let container = probe.container();
                // Discovery may sleep; the loop stalls until it is done
                tokio::task::block_in_place(|| harness.launch(container));
                debug!("Tracking emulator PID {:?}", harness.child());
                match harness.state() {
                    EmbedState::Embedded => match harness.embedded_window() {
                        Some(window) => info!("Emulator window 0x{:x} embedded", window),
                        None => info!("Emulator launched, embedding is up to it"),
                    },
                    other => warn!("Launch ended in state {:?}", other),
                }
            }
            batch = events.next_batch() => {
                for event in batch? {
                    if probe.handle_event(&event)? == UiAction::Close {
                        break 'events;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break 'events;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break 'events;
            }
        }
    }

    if let Some(pid) = harness.close() {
        debug!("Child {} cleaned up", pid);
    }
    if let Err(e) = probe.destroy() {
        debug!("Probe window already gone: {}", e);
    }
    Ok(())
}
