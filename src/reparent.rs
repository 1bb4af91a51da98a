//! Reparenting a foreign window into the container

use std::sync::Arc;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;
use x11rb::NONE;

use crate::embed::EmbedError;

/// Moves a window under another one
pub trait Reparent {
    fn reparent(&mut self, foreign: Window, container: Window) -> Result<(), EmbedError>;
}

/// Non-owning reference to a window of another client.
///
/// Dropping it never destroys or unmaps the window; only the id is held, and
/// it is not kept past the reparent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignWindow(Window);

impl ForeignWindow {
    pub fn new(id: Window) -> Option<Self> {
        (id != NONE).then_some(Self(id))
    }

    pub fn id(self) -> Window {
        self.0
    }
}

/// Both ends must be real windows before anything is sent to the server
pub fn check_targets(foreign: Window, container: Window) -> Result<(ForeignWindow, Window), EmbedError> {
    let foreign = ForeignWindow::new(foreign).ok_or(EmbedError::ForeignWindow(foreign))?;
    if container == NONE {
        return Err(EmbedError::NoContainer);
    }
    Ok((foreign, container))
}

/// `ReparentWindow` on the shared connection
pub struct X11Reparenter {
    conn: Arc<RustConnection>,
}

impl X11Reparenter {
    pub fn new(conn: Arc<RustConnection>) -> Self {
        Self { conn }
    }
}

impl Reparent for X11Reparenter {
    fn reparent(&mut self, foreign: Window, container: Window) -> Result<(), EmbedError> {
        let (foreign, container) = check_targets(foreign, container)?;
        let conn = self.conn.as_ref();

        // The foreign id has to name an existing window
        if conn.get_window_attributes(foreign.id())?.reply().is_err() {
            return Err(EmbedError::ForeignWindow(foreign.id()));
        }
        if conn.get_window_attributes(container)?.reply().is_err() {
            return Err(EmbedError::NoContainer);
        }

        info!("Found window ID: 0x{:x}, reparenting...", foreign.id());
        info!("...to container window ID: 0x{:x}", container);

        conn.reparent_window(foreign.id(), container, 0, 0)?.check()?;
        conn.flush()?;
        Ok(())
    }
}
