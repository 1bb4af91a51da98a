//! Emulator window discovery
//!
//! Only used by the reparent method. The default backend walks the X window
//! tree and compares `WM_CLASS`; the fallback runs `xwininfo -root -tree` and
//! filters its listing by a literal class marker.

use anyhow::{Context, Result};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use x11rb::properties::WmClass;
use x11rb::protocol::xproto::{ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use crate::config::{DiscoveryBackend, DiscoveryConfig, EmulatorConfig};

/// Source of candidate window ids, in discovery order
pub trait WindowFinder {
    fn find(&mut self) -> Result<Vec<Window>>;
}

/// Build the configured backend
pub fn finder_for(
    backend: DiscoveryBackend,
    emulator: &EmulatorConfig,
    conn: Arc<RustConnection>,
    root: Window,
) -> Box<dyn WindowFinder> {
    match backend {
        DiscoveryBackend::X11 => Box::new(X11ClassFinder::new(conn, root, &emulator.window_class)),
        DiscoveryBackend::Xwininfo => Box::new(XwininfoFinder::new(emulator.tree_marker())),
    }
}

/// Walks the whole window tree (depth first, like `xwininfo -tree`) and keeps
/// windows whose WM_CLASS instance and class both equal the wanted name.
pub struct X11ClassFinder {
    conn: Arc<RustConnection>,
    root: Window,
    class: Vec<u8>,
}

impl X11ClassFinder {
    pub fn new(conn: Arc<RustConnection>, root: Window, class: &str) -> Self {
        Self {
            conn,
            root,
            class: class.as_bytes().to_vec(),
        }
    }

    fn class_matches(&self, window: Window) -> Result<bool> {
        // Windows can disappear between query_tree and get_property
        let Ok(reply) = WmClass::get(self.conn.as_ref(), window)?.reply() else {
            return Ok(false);
        };
        Ok(reply.is_some_and(|wm_class| {
            wm_class.instance() == self.class.as_slice() && wm_class.class() == self.class.as_slice()
        }))
    }
}

impl WindowFinder for X11ClassFinder {
    fn find(&mut self) -> Result<Vec<Window>> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];

        while let Some(window) = stack.pop() {
            if window != self.root && self.class_matches(window)? {
                found.push(window);
            }
            let Ok(tree) = self.conn.query_tree(window)?.reply() else {
                continue;
            };
            // Reverse so children are visited in the order the server lists them
            stack.extend(tree.children.iter().rev());
        }

        Ok(found)
    }
}

/// Runs `xwininfo -root -tree` and parses matching lines
pub struct XwininfoFinder {
    marker: String,
}

impl XwininfoFinder {
    pub fn new(marker: String) -> Self {
        Self { marker }
    }
}

impl WindowFinder for XwininfoFinder {
    fn find(&mut self) -> Result<Vec<Window>> {
        let output = Command::new("xwininfo")
            .args(["-root", "-tree"])
            .output()
            .context("Failed to run xwininfo")?;

        if !output.status.success() {
            debug!("xwininfo exited with {}", output.status);
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tree_listing(&listing, &self.marker))
    }
}

/// Window ids from the lines of a tree listing that contain `marker`.
///
/// The id is the first token of the line, in hex with or without `0x`.
pub fn parse_tree_listing(listing: &str, marker: &str) -> Vec<Window> {
    listing
        .lines()
        .filter(|line| line.contains(marker))
        .filter_map(|line| {
            let token = line.split_whitespace().next()?;
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            match u32::from_str_radix(digits, 16) {
                Ok(id) => Some(id),
                Err(_) => {
                    debug!("Ignoring unparsable window id {:?}", token);
                    None
                }
            }
        })
        .collect()
}

/// Bounded retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl From<&DiscoveryConfig> for RetryPolicy {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            attempts: config.attempts,
            delay: config.retry_delay(),
        }
    }
}

/// Query `finder` until it reports a window or the budget runs out.
///
/// Every empty (or failed) lookup is followed by one `sleep(policy.delay)`.
/// With several matches the first one wins.
pub fn poll_for_window(
    finder: &mut dyn WindowFinder,
    policy: RetryPolicy,
    sleep: &mut dyn FnMut(Duration),
) -> Option<Window> {
    for attempt in 1..=policy.attempts {
        let windows = match finder.find() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Window lookup failed: {:#}", e);
                Vec::new()
            }
        };

        match windows.as_slice() {
            [] => {
                warn!(
                    "No emulator window found yet (attempt {}/{}), retrying...",
                    attempt, policy.attempts
                );
                sleep(policy.delay);
            }
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    warn!(
                        "Multiple emulator windows ({}), picking first one: 0x{:x}",
                        windows.len(),
                        first
                    );
                }
                return Some(*first);
            }
        }
    }

    error!("No windows with the emulator WM class found");
    None
}
