//! Interned atoms and top-level window properties

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::properties::WmHints;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

/// Holds all interned atoms the probe needs
#[derive(Debug)]
pub struct Atoms {
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub net_wm_name: Atom,
    pub net_wm_pid: Atom,
    pub utf8_string: Atom,
    pub xembed: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            wm_protocols: intern("WM_PROTOCOLS")?,
            wm_delete_window: intern("WM_DELETE_WINDOW")?,
            net_wm_name: intern("_NET_WM_NAME")?,
            net_wm_pid: intern("_NET_WM_PID")?,
            utf8_string: intern("UTF8_STRING")?,
            xembed: intern("_XEMBED")?,
        })
    }

    /// Title, class, pid, input hint and WM_DELETE_WINDOW for the top-level
    pub fn setup_toplevel<C: Connection>(&self, conn: &C, window: Window, title: &str) -> Result<()> {
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            self.net_wm_name,
            self.utf8_string,
            title.as_bytes(),
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            b"embed-probe\0embed-probe\0",
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self.net_wm_pid,
            AtomEnum::CARDINAL,
            &[std::process::id()],
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self.wm_protocols,
            AtomEnum::ATOM,
            &[self.wm_delete_window],
        )?;

        let mut hints = WmHints::new();
        hints.input = Some(true);
        hints.set(conn, window)?;

        Ok(())
    }

    /// Is this a WM_DELETE_WINDOW request?
    pub fn is_delete_request(&self, event: &ClientMessageEvent) -> bool {
        event.type_ == self.wm_protocols
            && event.format == 32
            && event.data.as_data32()[0] == self.wm_delete_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPLEVEL: Window = 0x1c00001;

    fn atoms() -> Atoms {
        Atoms {
            wm_protocols: 301,
            wm_delete_window: 302,
            net_wm_name: 303,
            net_wm_pid: 304,
            utf8_string: 305,
            xembed: 306,
        }
    }

    #[test]
    fn test_delete_window_is_delete_request() {
        let atoms = atoms();
        let event = ClientMessageEvent::new(
            32,
            TOPLEVEL,
            atoms.wm_protocols,
            [atoms.wm_delete_window, 0, 0, 0, 0],
        );
        assert!(atoms.is_delete_request(&event));
    }

    #[test]
    fn test_other_client_messages_are_not_delete_requests() {
        let atoms = atoms();
        let data = [atoms.wm_delete_window, 0, 0, 0, 0];

        let wrong_type = ClientMessageEvent::new(32, TOPLEVEL, atoms.xembed, data);
        assert!(!atoms.is_delete_request(&wrong_type));

        let wrong_format = ClientMessageEvent::new(8, TOPLEVEL, atoms.wm_protocols, data);
        assert!(!atoms.is_delete_request(&wrong_format));

        let wrong_protocol = ClientMessageEvent::new(
            32,
            TOPLEVEL,
            atoms.wm_protocols,
            [atoms.net_wm_pid, 0, 0, 0, 0],
        );
        assert!(!atoms.is_delete_request(&wrong_protocol));
    }
}
