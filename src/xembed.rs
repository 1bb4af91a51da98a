//! Embedder side of the XEMBED protocol, used by the `socket` container
//!
//! The socket notices clients through SubstructureNotify on its own window:
//! a ReparentNotify with the socket as new parent adds a client, a reparent
//! elsewhere or a DestroyNotify drops it.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

use crate::atoms::Atoms;

pub const XEMBED_VERSION: u32 = 0;

pub const XEMBED_EMBEDDED_NOTIFY: u32 = 0;
pub const XEMBED_WINDOW_ACTIVATE: u32 = 1;
pub const XEMBED_WINDOW_DEACTIVATE: u32 = 2;
pub const XEMBED_REQUEST_FOCUS: u32 = 3;
pub const XEMBED_FOCUS_IN: u32 = 4;
pub const XEMBED_FOCUS_OUT: u32 = 5;

pub const XEMBED_FOCUS_CURRENT: u32 = 0;

/// `_XEMBED` client message for `client`
pub fn message(xembed: Atom, client: Window, opcode: u32, detail: u32, data1: u32, data2: u32) -> ClientMessageEvent {
    ClientMessageEvent::new(32, client, xembed, [CURRENT_TIME, opcode, detail, data1, data2])
}

/// Messages a freshly embedded client receives, in order: EMBEDDED_NOTIFY
/// carrying the socket and protocol version, WINDOW_ACTIVATE, FOCUS_IN
pub fn welcome_messages(xembed: Atom, socket: Window, client: Window) -> [ClientMessageEvent; 3] {
    [
        message(xembed, client, XEMBED_EMBEDDED_NOTIFY, 0, socket, XEMBED_VERSION),
        message(xembed, client, XEMBED_WINDOW_ACTIVATE, 0, 0, 0),
        message(xembed, client, XEMBED_FOCUS_IN, XEMBED_FOCUS_CURRENT, 0, 0),
    ]
}

/// What a structure event meant for the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientChange {
    Embedded(Window),
    Left(Window),
    Unchanged,
}

#[derive(Debug)]
pub struct XembedSocket {
    socket: Window,
    client: Option<Window>,
}

impl XembedSocket {
    pub fn new(socket: Window) -> Self {
        Self { socket, client: None }
    }

    pub fn client(&self) -> Option<Window> {
        self.client
    }

    /// Track a ReparentNotify seen on the socket
    pub fn reparented(&mut self, window: Window, parent: Window) -> ClientChange {
        if parent == self.socket {
            if let Some(old) = self.client.replace(window) {
                if old != window {
                    warn!("Socket already had client 0x{:x}, replacing with 0x{:x}", old, window);
                }
            }
            ClientChange::Embedded(window)
        } else if self.client == Some(window) {
            self.client = None;
            warn!("Client 0x{:x} was reparented away from the socket to 0x{:x}", window, parent);
            ClientChange::Left(window)
        } else {
            ClientChange::Unchanged
        }
    }

    /// Track a DestroyNotify seen on the socket
    pub fn destroyed(&mut self, window: Window) -> ClientChange {
        if self.client == Some(window) {
            self.client = None;
            info!("Embedded client 0x{:x} destroyed", window);
            ClientChange::Left(window)
        } else {
            ClientChange::Unchanged
        }
    }

    /// Finish embedding a new client: size and map it, then send the
    /// messages from [`welcome_messages`]
    pub fn welcome(
        &self,
        conn: &RustConnection,
        atoms: &Atoms,
        client: Window,
        width: u16,
        height: u16,
    ) -> Result<()> {
        info!("XEMBED client 0x{:x} joined socket 0x{:x}", client, self.socket);
        conn.configure_window(
            client,
            &ConfigureWindowAux::new()
                .x(0)
                .y(0)
                .width(u32::from(width))
                .height(u32::from(height)),
        )?;
        conn.map_window(client)?;
        for event in welcome_messages(atoms.xembed, self.socket, client) {
            debug!("XEMBED opcode {} -> 0x{:x}", event.data.as_data32()[1], client);
            conn.send_event(false, client, EventMask::NO_EVENT, event)?;
        }
        conn.flush()?;
        Ok(())
    }

    /// Top-level gained or lost focus
    pub fn set_active(&self, conn: &RustConnection, atoms: &Atoms, active: bool) -> Result<()> {
        let Some(client) = self.client else {
            return Ok(());
        };
        let opcode = if active { XEMBED_WINDOW_ACTIVATE } else { XEMBED_WINDOW_DEACTIVATE };
        self.send(conn, atoms, client, opcode, 0, 0, 0)?;
        if !active {
            self.send(conn, atoms, client, XEMBED_FOCUS_OUT, 0, 0, 0)?;
        }
        conn.flush()?;
        Ok(())
    }

    /// Hand keyboard focus to the client
    pub fn focus_client(&self, conn: &RustConnection, atoms: &Atoms) -> Result<()> {
        if let Some(client) = self.client {
            self.send(conn, atoms, client, XEMBED_FOCUS_IN, XEMBED_FOCUS_CURRENT, 0, 0)?;
            conn.flush()?;
        }
        Ok(())
    }

    /// Opcode of an `_XEMBED` message addressed to the socket
    pub fn request_opcode(&self, atoms: &Atoms, event: &ClientMessageEvent) -> Option<u32> {
        (event.type_ == atoms.xembed && event.window == self.socket && event.format == 32)
            .then(|| event.data.as_data32()[1])
    }

    #[allow(clippy::too_many_arguments)]
    fn send(
        &self,
        conn: &RustConnection,
        atoms: &Atoms,
        client: Window,
        opcode: u32,
        detail: u32,
        data1: u32,
        data2: u32,
    ) -> Result<()> {
        debug!("XEMBED opcode {} -> 0x{:x}", opcode, client);
        let event = message(atoms.xembed, client, opcode, detail, data1, data2);
        conn.send_event(false, client, EventMask::NO_EVENT, event)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOCKET: Window = 0x400010;
    const CLIENT: Window = 0x2a00003;

    #[test]
    fn test_reparent_into_socket_embeds() {
        let mut socket = XembedSocket::new(SOCKET);
        assert_eq!(socket.reparented(CLIENT, SOCKET), ClientChange::Embedded(CLIENT));
        assert_eq!(socket.client(), Some(CLIENT));
    }

    #[test]
    fn test_reparent_back_out_drops_client() {
        let mut socket = XembedSocket::new(SOCKET);
        socket.reparented(CLIENT, SOCKET);
        assert_eq!(socket.reparented(CLIENT, 0x1e1), ClientChange::Left(CLIENT));
        assert_eq!(socket.client(), None);
    }

    #[test]
    fn test_unrelated_window_is_ignored() {
        let mut socket = XembedSocket::new(SOCKET);
        socket.reparented(CLIENT, SOCKET);
        assert_eq!(socket.reparented(0x5000001, 0x1e1), ClientChange::Unchanged);
        assert_eq!(socket.destroyed(0x5000001), ClientChange::Unchanged);
        assert_eq!(socket.client(), Some(CLIENT));
    }

    #[test]
    fn test_destroy_drops_client() {
        let mut socket = XembedSocket::new(SOCKET);
        socket.reparented(CLIENT, SOCKET);
        assert_eq!(socket.destroyed(CLIENT), ClientChange::Left(CLIENT));
        assert_eq!(socket.client(), None);
    }

    #[test]
    fn test_embedded_notify_layout() {
        let event = message(77, CLIENT, XEMBED_EMBEDDED_NOTIFY, 0, SOCKET, XEMBED_VERSION);
        assert_eq!(event.format, 32);
        assert_eq!(event.window, CLIENT);
        assert_eq!(event.type_, 77);
        assert_eq!(event.data.as_data32(), [CURRENT_TIME, 0, 0, SOCKET, XEMBED_VERSION]);
    }

    #[test]
    fn test_welcome_notifies_activates_then_focuses() {
        let messages = welcome_messages(77, SOCKET, CLIENT);
        let data: Vec<[u32; 5]> = messages.iter().map(|m| m.data.as_data32()).collect();
        assert_eq!(
            data,
            vec![
                [CURRENT_TIME, XEMBED_EMBEDDED_NOTIFY, 0, SOCKET, XEMBED_VERSION],
                [CURRENT_TIME, XEMBED_WINDOW_ACTIVATE, 0, 0, 0],
                [CURRENT_TIME, XEMBED_FOCUS_IN, XEMBED_FOCUS_CURRENT, 0, 0],
            ]
        );
        assert!(messages.iter().all(|m| m.window == CLIENT && m.type_ == 77));
    }
}
