//! Embedding orchestration
//!
//! `Idle -> Launching -> {Embedded | Failed} -> Terminated`
//!
//! `Embedded` means the emulator was launched (and, for the reparent method,
//! its window was moved into the container). Whether the sdl/previous
//! methods really ended up inside the container is not checked.

use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::Window;
use x11rb::NONE;

use crate::cli::EmbedMethod;
use crate::config::EmulatorConfig;
use crate::discovery::{poll_for_window, RetryPolicy, WindowFinder};
use crate::launch::{LaunchSpec, ProcessControl};
use crate::reparent::Reparent;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("window (ID: 0x{0:x}) can't be used for reparenting")]
    ForeignWindow(Window),
    #[error("container window disappeared")]
    NoContainer,
    #[error("X11 request failed: {0}")]
    Reply(#[from] ReplyError),
    #[error("X11 connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedState {
    Idle,
    Launching,
    Embedded,
    Failed,
    Terminated,
}

/// Owns the child process for the lifetime of the probe window
pub struct EmbedHarness {
    method: EmbedMethod,
    emulator: EmulatorConfig,
    policy: RetryPolicy,
    state: EmbedState,
    /// Emulator PID; set by launch, cleared by teardown or failed discovery
    child: Option<u32>,
    embedded: Option<Window>,
    processes: Box<dyn ProcessControl>,
    finder: Box<dyn WindowFinder>,
    reparenter: Box<dyn Reparent>,
    sleep: Box<dyn FnMut(Duration)>,
}

impl EmbedHarness {
    pub fn new(
        method: EmbedMethod,
        emulator: EmulatorConfig,
        policy: RetryPolicy,
        processes: Box<dyn ProcessControl>,
        finder: Box<dyn WindowFinder>,
        reparenter: Box<dyn Reparent>,
    ) -> Self {
        Self {
            method,
            emulator,
            policy,
            state: EmbedState::Idle,
            child: None,
            embedded: None,
            processes,
            finder,
            reparenter,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep used between discovery attempts
    #[cfg(test)]
    pub fn with_sleep(mut self, sleep: impl FnMut(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn state(&self) -> EmbedState {
        self.state
    }

    pub fn child(&self) -> Option<u32> {
        self.child
    }

    /// Window moved into the container by the reparent method
    pub fn embedded_window(&self) -> Option<Window> {
        self.embedded
    }

    fn transition(&mut self, next: EmbedState) {
        info!("Embed state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Launch the emulator for `container`. Only acts from `Idle`.
    ///
    /// For the reparent method this blocks while polling for the window.
    pub fn launch(&mut self, container: Window) -> EmbedState {
        if self.state != EmbedState::Idle {
            warn!("Launch requested in state {:?}, ignoring", self.state);
            return self.state;
        }
        self.transition(EmbedState::Launching);

        if container == NONE {
            error!("Container has no window yet, not launching");
            self.transition(EmbedState::Failed);
            return self.state;
        }

        let spec = LaunchSpec::for_method(&self.emulator, self.method, container);
        let pid = match self.processes.spawn(&spec) {
            Ok(pid) => pid,
            Err(e) => {
                error!("Launching the emulator failed: {}", e);
                self.transition(EmbedState::Failed);
                return self.state;
            }
        };

        match self.method {
            EmbedMethod::Previous | EmbedMethod::Sdl => {
                self.child = Some(pid);
                self.transition(EmbedState::Embedded);
            }
            EmbedMethod::Reparent => self.discover_and_reparent(pid, container),
        }

        self.state
    }

    fn discover_and_reparent(&mut self, pid: u32, container: Window) {
        let Some(window) = poll_for_window(self.finder.as_mut(), self.policy, self.sleep.as_mut())
        else {
            if let Err(e) = self.processes.kill(pid) {
                error!("{:#}", e);
            } else {
                info!("killed process with PID {}", pid);
            }
            self.child = None;
            self.transition(EmbedState::Failed);
            return;
        };

        // The emulator runs either way; teardown has to kill it
        self.child = Some(pid);

        match self.reparenter.reparent(window, container) {
            Ok(()) => {
                self.embedded = Some(window);
                self.transition(EmbedState::Embedded);
            }
            Err(e) => {
                error!("Reparenting window 0x{:x} failed: {}", window, e);
                self.transition(EmbedState::Failed);
            }
        }
    }

    /// Window closed: kill the tracked child, if any. Returns the killed PID.
    pub fn close(&mut self) -> Option<u32> {
        let killed = self.child.take();
        if let Some(pid) = killed {
            match self.processes.kill(pid) {
                Ok(()) => info!("killed emulator PID {}", pid),
                Err(e) => warn!("{:#}", e),
            }
        }
        self.embedded = None;
        if self.state != EmbedState::Terminated {
            self.transition(EmbedState::Terminated);
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::{PARENT_WIN_ENV, SDL_WINDOWID_ENV};
    use anyhow::Result;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const CONTAINER: Window = 0x400007;
    const PID: u32 = 4242;

    #[derive(Default)]
    struct Log {
        spawned: Vec<LaunchSpec>,
        killed: Vec<u32>,
        lookups: u32,
        sleeps: Vec<Duration>,
        reparented: Vec<(Window, Window)>,
    }

    type Shared = Rc<RefCell<Log>>;

    struct FakeProcesses {
        log: Shared,
        fail: bool,
    }

    impl ProcessControl for FakeProcesses {
        fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32, EmbedError> {
            if self.fail {
                return Err(EmbedError::Spawn {
                    program: spec.program.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.log.borrow_mut().spawned.push(spec.clone());
            Ok(PID)
        }

        fn kill(&mut self, pid: u32) -> Result<()> {
            self.log.borrow_mut().killed.push(pid);
            Ok(())
        }
    }

    struct FakeFinder {
        log: Shared,
        replies: VecDeque<Vec<Window>>,
    }

    impl WindowFinder for FakeFinder {
        fn find(&mut self) -> Result<Vec<Window>> {
            self.log.borrow_mut().lookups += 1;
            Ok(self.replies.pop_front().unwrap_or_default())
        }
    }

    struct FakeReparenter {
        log: Shared,
    }

    impl Reparent for FakeReparenter {
        fn reparent(&mut self, foreign: Window, container: Window) -> Result<(), EmbedError> {
            crate::reparent::check_targets(foreign, container)?;
            self.log.borrow_mut().reparented.push((foreign, container));
            Ok(())
        }
    }

    fn harness(method: EmbedMethod, replies: Vec<Vec<Window>>) -> (EmbedHarness, Shared) {
        harness_with(method, replies, false)
    }

    fn harness_with(
        method: EmbedMethod,
        replies: Vec<Vec<Window>>,
        fail_spawn: bool,
    ) -> (EmbedHarness, Shared) {
        let log = Shared::default();
        let sleep_log = log.clone();
        let harness = EmbedHarness::new(
            method,
            EmulatorConfig::default(),
            RetryPolicy {
                attempts: 8,
                delay: Duration::from_secs(1),
            },
            Box::new(FakeProcesses {
                log: log.clone(),
                fail: fail_spawn,
            }),
            Box::new(FakeFinder {
                log: log.clone(),
                replies: replies.into(),
            }),
            Box::new(FakeReparenter { log: log.clone() }),
        )
        .with_sleep(move |d| sleep_log.borrow_mut().sleeps.push(d));
        (harness, log)
    }

    #[test]
    fn test_starts_idle_without_child() {
        let (harness, _) = harness(EmbedMethod::Sdl, Vec::new());
        assert_eq!(harness.state(), EmbedState::Idle);
        assert_eq!(harness.child(), None);
    }

    #[test]
    fn test_sdl_launch_embeds_immediately() {
        let (mut harness, log) = harness(EmbedMethod::Sdl, Vec::new());
        assert_eq!(harness.launch(CONTAINER), EmbedState::Embedded);
        assert_eq!(harness.child(), Some(PID));

        let log = log.borrow();
        assert_eq!(log.lookups, 0);
        let spec = &log.spawned[0];
        assert_eq!(spec.env_var(SDL_WINDOWID_ENV), Some("4194311"));
        assert_eq!(spec.env_var(PARENT_WIN_ENV), None);
    }

    #[test]
    fn test_previous_launch_passes_parent_win() {
        let (mut harness, log) = harness(EmbedMethod::Previous, Vec::new());
        assert_eq!(harness.launch(CONTAINER), EmbedState::Embedded);
        let log = log.borrow();
        assert_eq!(log.spawned[0].env_var(PARENT_WIN_ENV), Some("4194311"));
        assert_eq!(log.spawned[0].env_var(SDL_WINDOWID_ENV), None);
        assert!(log.reparented.is_empty());
    }

    #[test]
    fn test_reparent_retries_then_embeds() {
        let (mut harness, log) =
            harness(EmbedMethod::Reparent, vec![vec![], vec![], vec![], vec![0x2a00003]]);
        assert_eq!(harness.launch(CONTAINER), EmbedState::Embedded);
        assert_eq!(harness.child(), Some(PID));
        assert_eq!(harness.embedded_window(), Some(0x2a00003));

        let log = log.borrow();
        assert!(log.spawned[0].env.is_empty());
        assert_eq!(log.lookups, 4);
        assert_eq!(log.sleeps, vec![Duration::from_secs(1); 3]);
        assert_eq!(log.reparented, vec![(0x2a00003, CONTAINER)]);
        assert!(log.killed.is_empty());
    }

    #[test]
    fn test_reparent_gives_up_and_kills_child() {
        let (mut harness, log) = harness(EmbedMethod::Reparent, Vec::new());
        assert_eq!(harness.launch(CONTAINER), EmbedState::Failed);
        assert_eq!(harness.child(), None);

        let log = log.borrow();
        assert_eq!(log.lookups, 8);
        assert_eq!(log.killed, vec![PID]);
        assert!(log.reparented.is_empty());
    }

    #[test]
    fn test_reparent_uses_first_of_many() {
        let (mut harness, log) =
            harness(EmbedMethod::Reparent, vec![vec![0x3e00001, 0x2a00003]]);
        harness.launch(CONTAINER);
        assert_eq!(log.borrow().reparented, vec![(0x3e00001, CONTAINER)]);
    }

    #[test]
    fn test_close_kills_tracked_child_once() {
        let (mut harness, log) = harness(EmbedMethod::Previous, Vec::new());
        harness.launch(CONTAINER);

        assert_eq!(harness.close(), Some(PID));
        assert_eq!(harness.child(), None);
        assert_eq!(harness.state(), EmbedState::Terminated);

        assert_eq!(harness.close(), None);
        assert_eq!(log.borrow().killed, vec![PID]);
    }

    #[test]
    fn test_close_after_failed_discovery_sends_no_second_kill() {
        let (mut harness, log) = harness(EmbedMethod::Reparent, Vec::new());
        harness.launch(CONTAINER);
        assert_eq!(harness.close(), None);
        assert_eq!(log.borrow().killed, vec![PID]);
        assert_eq!(harness.state(), EmbedState::Terminated);
    }

    #[test]
    fn test_close_before_launch() {
        let (mut harness, log) = harness(EmbedMethod::Sdl, Vec::new());
        assert_eq!(harness.close(), None);
        assert!(log.borrow().killed.is_empty());
        assert_eq!(harness.state(), EmbedState::Terminated);
    }

    #[test]
    fn test_spawn_failure_tracks_nothing() {
        let (mut harness, log) = harness_with(EmbedMethod::Reparent, vec![vec![1]], true);
        assert_eq!(harness.launch(CONTAINER), EmbedState::Failed);
        assert_eq!(harness.child(), None);
        assert_eq!(log.borrow().lookups, 0);
    }

    #[test]
    fn test_null_foreign_window_keeps_child_tracked() {
        let (mut harness, log) = harness(EmbedMethod::Reparent, vec![vec![NONE]]);
        assert_eq!(harness.launch(CONTAINER), EmbedState::Failed);
        assert_eq!(harness.child(), Some(PID));
        assert!(log.borrow().reparented.is_empty());
        assert_eq!(harness.close(), Some(PID));
    }

    #[test]
    fn test_missing_container_does_not_spawn() {
        let (mut harness, log) = harness(EmbedMethod::Sdl, Vec::new());
        assert_eq!(harness.launch(NONE), EmbedState::Failed);
        assert!(log.borrow().spawned.is_empty());
    }

    #[test]
    fn test_launch_is_one_shot() {
        let (mut harness, log) = harness(EmbedMethod::Sdl, Vec::new());
        harness.launch(CONTAINER);
        assert_eq!(harness.launch(CONTAINER), EmbedState::Embedded);
        assert_eq!(log.borrow().spawned.len(), 1);
    }
}
