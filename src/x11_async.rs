//! X11 Async Event Stream
//!
//! Non-blocking X11 event delivery for the tokio loop. A blocking task polls
//! the connection's file descriptor with mio and wakes the loop when it
//! becomes readable; events are then drained in batches.

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct X11EventStream {
    conn: Arc<RustConnection>,
    notify: Arc<Notify>,
    /// Dropping this stops the polling task
    _shutdown: oneshot::Receiver<()>,
}

impl X11EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let readable = notify.clone();
        let (alive, shutdown) = oneshot::channel::<()>();

        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        poll.registry()
            .register(
                &mut mio::unix::SourceFd(&fd),
                mio::Token(0),
                mio::Interest::READABLE,
            )
            .context("Failed to register X11 FD with mio")?;

        tokio::task::spawn_blocking(move || {
            let mut events = mio::Events::with_capacity(1);
            while !alive.is_closed() {
                if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                    tracing::warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }
                if events.iter().any(|event| event.token() == mio::Token(0)) {
                    readable.notify_one();
                }
            }
            tracing::debug!("X11 socket polling task stopped");
        });

        Ok(Self {
            conn,
            notify,
            _shutdown: shutdown,
        })
    }

    /// Flush pending requests, then return every queued event.
    ///
    /// Waits for the socket only when nothing is queued, so events buffered
    /// by earlier replies are never stranded.
    pub async fn next_batch(&self) -> Result<Vec<Event>> {
        loop {
            self.conn.flush()?;

            let mut batch = Vec::new();
            while let Some(event) = self.conn.poll_for_event()? {
                batch.push(event);
            }
            if !batch.is_empty() {
                return Ok(batch);
            }

            self.notify.notified().await;
        }
    }
}
