//! Probe window
//!
//! A top-level window laid out as a vertical box: a "Test Button", the
//! container that hosts the emulator, a label and a spin control. Only the
//! container is focusable; the emulator gets no key events if anything else
//! competes for focus.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::atoms::Atoms;
use crate::cli::{Options, WidgetKind};
use crate::config::ContainerConfig;
use crate::xembed::{ClientChange, XembedSocket, XEMBED_REQUEST_FOCUS};

const BUTTON_HEIGHT: u16 = 28;
const LABEL_HEIGHT: u16 = 20;
const SPIN_HEIGHT: u16 = 28;
const SPACING: u16 = 4;

const WINDOW_BG: u32 = 0xeeeeee;
const BUTTON_BG: u32 = 0xd6d6d6;
const SPIN_BG: u32 = 0xffffff;
const CONTAINER_BG: u32 = 0x000000;
const TEXT_FG: u32 = 0x000000;

/// Positions of the stacked rows inside the top-level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    width: u16,
    height: u16,
    button_y: i16,
    container_y: i16,
    label_y: i16,
    spin_y: i16,
}

impl Layout {
    /// Fails if the container does not fit in X coordinates
    fn compute(size: &ContainerConfig) -> Result<Self> {
        let rows = [BUTTON_HEIGHT, size.height, LABEL_HEIGHT, SPIN_HEIGHT];
        let mut offsets = [0i16; 4];
        let mut y = SPACING;
        for (offset, row) in offsets.iter_mut().zip(rows) {
            *offset = i16::try_from(y).ok().context("Container too tall")?;
            y = y
                .checked_add(row)
                .and_then(|y| y.checked_add(SPACING))
                .context("Container too tall")?;
        }
        let width = size
            .width
            .checked_add(2 * SPACING)
            .context("Container too wide")?;

        Ok(Self {
            width,
            height: y,
            button_y: offsets[0],
            container_y: offsets[1],
            label_y: offsets[2],
            spin_y: offsets[3],
        })
    }
}

/// Every event class a widget can ask for
fn all_events() -> EventMask {
    EventMask::KEY_PRESS
        | EventMask::KEY_RELEASE
        | EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE
        | EventMask::ENTER_WINDOW
        | EventMask::LEAVE_WINDOW
        | EventMask::POINTER_MOTION
        | EventMask::EXPOSURE
        | EventMask::VISIBILITY_CHANGE
        | EventMask::STRUCTURE_NOTIFY
        | EventMask::FOCUS_CHANGE
        | EventMask::PROPERTY_CHANGE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Container(WidgetKind),
    Button,
    Label,
    Spin,
}

#[derive(Debug, Clone, Copy)]
pub struct Widget {
    pub window: Window,
    pub role: Role,
    pub focusable: bool,
}

/// Widgets of the probe window, top to bottom
#[derive(Debug, Default)]
pub struct WidgetSet {
    widgets: Vec<Widget>,
}

impl WidgetSet {
    pub fn push(&mut self, window: Window, role: Role) {
        let focusable = matches!(role, Role::Container(_));
        self.widgets.push(Widget { window, role, focusable });
    }

    pub fn get(&self, window: Window) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.window == window)
    }

    pub fn focusable(&self) -> impl Iterator<Item = &Widget> {
        self.widgets.iter().filter(|w| w.focusable)
    }

    /// Where a click on `window` should move keyboard focus, if anywhere.
    /// An embedded client takes the focus in place of its container.
    pub fn focus_target(&self, window: Window, client: Option<Window>) -> Option<Window> {
        let widget = self.get(window).filter(|w| w.focusable)?;
        Some(client.unwrap_or(widget.window))
    }
}

/// Integer spin control state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinValue {
    value: i32,
    min: i32,
    max: i32,
    step: i32,
    page: i32,
}

impl Default for SpinValue {
    fn default() -> Self {
        Self {
            value: 0,
            min: 0,
            max: 10,
            step: 1,
            page: 2,
        }
    }
}

impl SpinValue {
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Left click steps up, right click steps down, wheel pages.
    /// Returns whether the value changed.
    pub fn press(&mut self, button: u8) -> bool {
        let delta = match button {
            1 => self.step,
            3 => -self.step,
            4 => self.page,
            5 => -self.page,
            _ => return false,
        };
        let next = (self.value + delta).clamp(self.min, self.max);
        let changed = next != self.value;
        self.value = next;
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Continue,
    Close,
}

pub struct ProbeWindow {
    conn: Arc<RustConnection>,
    atoms: Atoms,
    toplevel: Window,
    container: Window,
    container_size: (u16, u16),
    widgets: WidgetSet,
    spin: SpinValue,
    gc: Gcontext,
    socket: Option<XembedSocket>,
    destroyed: bool,
}

impl ProbeWindow {
    /// Create (but do not map) the probe window
    pub fn create(
        conn: Arc<RustConnection>,
        screen_num: usize,
        options: Options,
        size: &ContainerConfig,
    ) -> Result<Self> {
        let atoms = Atoms::new(conn.as_ref()).context("Failed to intern atoms")?;
        let c = conn.as_ref();
        let screen = &c.setup().roots[screen_num];

        let width = size.width;
        let layout = Layout::compute(size)?;

        let toplevel = c.generate_id()?;
        c.create_window(
            screen.root_depth,
            toplevel,
            screen.root,
            0,
            0,
            layout.width,
            layout.height,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .background_pixel(WINDOW_BG)
                .event_mask(EventMask::STRUCTURE_NOTIFY | EventMask::FOCUS_CHANGE),
        )?;
        let title = format!("embed-probe: {} + {}", options.widget, options.method);
        atoms.setup_toplevel(c, toplevel, &title)?;

        let mut widgets = WidgetSet::default();
        let x = SPACING as i16;

        let button = child_window(c, screen, toplevel, x, layout.button_y, width, BUTTON_HEIGHT, Some(BUTTON_BG), button_events())?;
        widgets.push(button, Role::Button);

        let container = create_container(c, screen, toplevel, x, layout.container_y, size, options.widget)?;
        widgets.push(container, Role::Container(options.widget));

        let label = child_window(c, screen, toplevel, x, layout.label_y, width, LABEL_HEIGHT, Some(WINDOW_BG), EventMask::EXPOSURE)?;
        widgets.push(label, Role::Label);

        let spin = child_window(c, screen, toplevel, x, layout.spin_y, width, SPIN_HEIGHT, Some(SPIN_BG), button_events())?;
        widgets.push(spin, Role::Spin);
        debug!(
            "Focusable widgets: {:?}",
            widgets.focusable().map(|w| w.window).collect::<Vec<_>>()
        );

        let font = c.generate_id()?;
        c.open_font(font, b"fixed")?;
        let gc = c.generate_id()?;
        c.create_gc(gc, toplevel, &CreateGCAux::new().foreground(TEXT_FG).font(font))?;
        c.close_font(font)?;

        let socket = (options.widget == WidgetKind::Socket).then(|| XembedSocket::new(container));

        if let Some(quirk) = options.known_quirk() {
            info!("Known behaviour for {} + {}: {}", options.widget, options.method, quirk);
        }

        info!(
            "Created probe window 0x{:x} with {} container 0x{:x}",
            toplevel, options.widget, container
        );

        Ok(Self {
            conn,
            atoms,
            toplevel,
            container,
            container_size: (size.width, size.height),
            widgets,
            spin: SpinValue::default(),
            gc,
            socket,
            destroyed: false,
        })
    }

    pub fn container(&self) -> Window {
        self.container
    }

    pub fn show(&self) -> Result<()> {
        let c = self.conn.as_ref();
        c.map_subwindows(self.toplevel)?;
        c.map_window(self.toplevel)?;
        c.flush()?;
        Ok(())
    }

    /// Destroy the top-level unless the server already did
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let c = self.conn.as_ref();
        c.free_gc(self.gc)?;
        c.destroy_window(self.toplevel)?;
        c.flush()?;
        Ok(())
    }

    pub fn handle_event(&mut self, event: &Event) -> Result<UiAction> {
        match event {
            Event::Expose(e) if e.count == 0 => self.redraw(e.window)?,

            Event::ButtonPress(e) => self.button_press(e)?,

            Event::KeyPress(e) if e.event == self.container => {
                // Keys reaching us mean the embedded client isn't getting them
                debug!("Container got key {} (state {:?})", e.detail, e.state);
            }

            Event::FocusIn(e) if e.event == self.toplevel => {
                debug!("Probe window focused");
                if let Some(socket) = &self.socket {
                    socket.set_active(&self.conn, &self.atoms, true)?;
                }
            }

            Event::FocusOut(e) if e.event == self.toplevel => {
                debug!("Probe window lost focus");
                if let Some(socket) = &self.socket {
                    socket.set_active(&self.conn, &self.atoms, false)?;
                }
            }

            Event::ClientMessage(e) => {
                if e.window == self.toplevel && self.atoms.is_delete_request(e) {
                    info!("Close requested");
                    return Ok(UiAction::Close);
                }
                if let Some(socket) = &self.socket {
                    if socket.request_opcode(&self.atoms, e) == Some(XEMBED_REQUEST_FOCUS) {
                        debug!("XEMBED client requested focus");
                        self.focus(self.container, x11rb::CURRENT_TIME)?;
                    }
                }
            }

            Event::ReparentNotify(e) if e.event == self.container => {
                if let Some(socket) = self.socket.as_mut() {
                    if let ClientChange::Embedded(client) = socket.reparented(e.window, e.parent) {
                        let (width, height) = self.container_size;
                        socket.welcome(&self.conn, &self.atoms, client, width, height)?;
                    }
                } else if e.parent == self.container {
                    info!("Window 0x{:x} now lives in the container", e.window);
                } else {
                    info!("Window 0x{:x} left the container for 0x{:x}", e.window, e.parent);
                }
            }

            Event::DestroyNotify(e) if e.event == self.container => {
                if let Some(socket) = self.socket.as_mut() {
                    socket.destroyed(e.window);
                }
            }

            Event::DestroyNotify(e) if e.window == self.toplevel => {
                info!("Probe window destroyed");
                self.destroyed = true;
                return Ok(UiAction::Close);
            }

            Event::Error(e) => warn!("X11 error: {:?}", e),

            _ => {}
        }

        Ok(UiAction::Continue)
    }

    fn button_press(&mut self, e: &ButtonPressEvent) -> Result<()> {
        match self.widgets.get(e.event).map(|w| w.role) {
            Some(Role::Container(kind)) => debug!("Button {} in {} container", e.detail, kind),
            Some(Role::Button) if e.detail == 1 => info!("Test Button clicked"),
            Some(Role::Spin) => {
                if self.spin.press(e.detail) {
                    info!("Test SpinButton value: {}", self.spin.value());
                    self.conn.clear_area(true, e.event, 0, 0, 0, 0)?;
                }
            }
            _ => {}
        }

        self.focus(e.event, e.time)
    }

    /// Apply the focus policy for a click in `window`
    fn focus(&self, window: Window, time: Timestamp) -> Result<()> {
        let client = self.socket.as_ref().and_then(XembedSocket::client);
        let Some(target) = self.widgets.focus_target(window, client) else {
            return Ok(());
        };

        debug!("Focusing 0x{:x}", target);
        self.conn.set_input_focus(InputFocus::PARENT, target, time)?;
        if let Some(socket) = &self.socket {
            socket.focus_client(&self.conn, &self.atoms)?;
        }
        self.conn.flush()?;
        Ok(())
    }

    fn redraw(&self, window: Window) -> Result<()> {
        let text = match self.widgets.get(window).map(|w| w.role) {
            Some(Role::Button) => "Test Button".to_string(),
            Some(Role::Label) => "Test SpinButton:".to_string(),
            Some(Role::Spin) => format!("{}   [click +1 / right-click -1 / wheel +-2]", self.spin.value()),
            _ => return Ok(()),
        };

        self.conn.image_text8(window, self.gc, 8, 18, text.as_bytes())?;
        self.conn.flush()?;
        Ok(())
    }
}

fn button_events() -> EventMask {
    EventMask::EXPOSURE | EventMask::BUTTON_PRESS
}

#[allow(clippy::too_many_arguments)]
fn child_window(
    conn: &RustConnection,
    screen: &Screen,
    parent: Window,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
    background: Option<u32>,
    events: EventMask,
) -> Result<Window> {
    let window = conn.generate_id()?;
    let mut aux = CreateWindowAux::new().event_mask(events);
    if let Some(pixel) = background {
        aux = aux.background_pixel(pixel);
    }
    conn.create_window(
        screen.root_depth,
        window,
        parent,
        x,
        y,
        width,
        height,
        0,
        WindowClass::INPUT_OUTPUT,
        0,
        &aux,
    )?;
    Ok(window)
}

/// Every container selects all event classes plus SubstructureNotify, so
/// windows arriving in or leaving it are seen whatever the kind
fn container_events() -> EventMask {
    all_events() | EventMask::SUBSTRUCTURE_NOTIFY
}

/// A drawing area paints a black background, an event box has no background
/// of its own. A socket also runs XEMBED on the children it sees.
fn create_container(
    conn: &RustConnection,
    screen: &Screen,
    parent: Window,
    x: i16,
    y: i16,
    size: &ContainerConfig,
    kind: WidgetKind,
) -> Result<Window> {
    let background = match kind {
        WidgetKind::DrawingArea | WidgetKind::Socket => Some(CONTAINER_BG),
        WidgetKind::EventBox => None,
    };
    child_window(conn, screen, parent, x, y, size.width, size.height, background, container_events())
}
