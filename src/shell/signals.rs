//! State shared with signal handlers.
//!
//! Handlers here touch nothing but atomics. The child-termination handler
//! reaps into a fixed-capacity [`TerminationLog`]; the stop handler bumps the
//! [`ModeSwitch`]. All output and all job-table updates happen later, in the
//! main loop.
//!
//! The interpreter is single-threaded, so a handler always runs to completion
//! before the interrupted main-loop code resumes. Each buffer therefore has a
//! single writer at any instant.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use failure::ResultExt;
use log::debug;
use nix::{
    errno::Errno,
    sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal},
    unistd::Pid,
};

use crate::errors::{ErrorKind, Result};

pub const TERMINATION_LOG_CAPACITY: usize = 64;

/// Reaped children waiting for the main loop.
pub static TERMINATIONS: TerminationLog = TerminationLog::new();

/// Foreground-only mode, toggled by `SIGTSTP`.
pub static MODE: ModeSwitch = ModeSwitch::new();

/// A child collected in signal context: its pid and raw `waitpid(2)` status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TerminationFact {
    pub pid: Pid,
    pub raw_status: i32,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicI32 = AtomicI32::new(0);

struct FactBuffer {
    len: AtomicUsize,
    saturated: AtomicBool,
    pids: [AtomicI32; TERMINATION_LOG_CAPACITY],
    statuses: [AtomicI32; TERMINATION_LOG_CAPACITY],
}

impl FactBuffer {
    const fn new() -> Self {
        Self {
            len: AtomicUsize::new(0),
            saturated: AtomicBool::new(false),
            pids: [EMPTY_SLOT; TERMINATION_LOG_CAPACITY],
            statuses: [EMPTY_SLOT; TERMINATION_LOG_CAPACITY],
        }
    }
}

/// Facts removed from a [`TerminationLog`] in one pass.
#[derive(Debug, Default, PartialEq)]
pub struct Drained {
    pub facts: Vec<TerminationFact>,
    /// The buffer filled up, so some children may still be waiting to be
    /// reaped.
    pub saturated: bool,
}

/// Double-buffered, append-only log of [`TerminationFact`]s.
///
/// The signal handler appends to the active buffer. The main loop flips the
/// active index and then owns the previous buffer until it has copied the
/// facts out and reset it.
pub struct TerminationLog {
    buffers: [FactBuffer; 2],
    active: AtomicUsize,
}

impl TerminationLog {
    pub const fn new() -> Self {
        Self {
            buffers: [FactBuffer::new(), FactBuffer::new()],
            active: AtomicUsize::new(0),
        }
    }

    /// Appends `fact`, returning `false` if the active buffer is full.
    ///
    /// Async-signal-safe: no allocation, no locks.
    pub fn push(&self, fact: TerminationFact) -> bool {
        let buffer = &self.buffers[self.active.load(Ordering::SeqCst)];
        let len = buffer.len.load(Ordering::SeqCst);
        if len >= TERMINATION_LOG_CAPACITY {
            buffer.saturated.store(true, Ordering::SeqCst);
            return false;
        }

        buffer.pids[len].store(fact.pid.as_raw(), Ordering::SeqCst);
        buffer.statuses[len].store(fact.raw_status, Ordering::SeqCst);
        // publish only once the slot is fully written
        buffer.len.store(len + 1, Ordering::SeqCst);
        true
    }

    fn has_room(&self) -> bool {
        let buffer = &self.buffers[self.active.load(Ordering::SeqCst)];
        if buffer.len.load(Ordering::SeqCst) < TERMINATION_LOG_CAPACITY {
            true
        } else {
            buffer.saturated.store(true, Ordering::SeqCst);
            false
        }
    }

    /// Reaps every terminated child without blocking, recording each one.
    ///
    /// Stops early, leaving children unreaped, once the buffer is full.
    /// Async-signal-safe.
    pub fn collect_reapable(&self) {
        while self.has_room() {
            let mut status: libc::c_int = 0;
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }

            self.push(TerminationFact {
                pid: Pid::from_raw(pid),
                raw_status: status,
            });
        }
    }

    /// Takes every fact recorded so far. Main loop only.
    pub fn take(&self) -> Drained {
        let previous = self.active.fetch_xor(1, Ordering::SeqCst);
        let buffer = &self.buffers[previous];
        let len = buffer.len.load(Ordering::SeqCst);
        let facts = (0..len)
            .map(|i| TerminationFact {
                pid: Pid::from_raw(buffer.pids[i].load(Ordering::SeqCst)),
                raw_status: buffer.statuses[i].load(Ordering::SeqCst),
            })
            .collect();
        buffer.len.store(0, Ordering::SeqCst);
        let saturated = buffer.saturated.swap(false, Ordering::SeqCst);

        Drained { facts, saturated }
    }
}

impl fmt::Debug for TerminationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.active.load(Ordering::SeqCst);
        write!(
            f,
            "TerminationLog {{ active: {}, pending: {} }}",
            active,
            self.buffers[active].len.load(Ordering::SeqCst)
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Normal,
    ForegroundOnly,
}

impl Mode {
    pub fn announcement(self) -> &'static str {
        match self {
            Mode::ForegroundOnly => "Entering foreground-only mode (& is now ignored)",
            Mode::Normal => "Exiting foreground-only mode",
        }
    }
}

/// Counts stop-signal deliveries; an odd count means foreground-only mode.
///
/// A single counter both flips the mode and records that an announcement is
/// owed, so the two can never disagree.
#[derive(Debug)]
pub struct ModeSwitch {
    toggles: AtomicUsize,
}

impl ModeSwitch {
    pub const fn new() -> Self {
        Self {
            toggles: AtomicUsize::new(0),
        }
    }

    /// Async-signal-safe.
    pub fn toggle(&self) {
        self.toggles.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_foreground_only(&self) -> bool {
        self.toggles.load(Ordering::SeqCst) % 2 == 1
    }

    /// Returns the modes entered since `announced` toggles, oldest first,
    /// and advances `announced`.
    pub fn take_changes(&self, announced: &mut usize) -> Vec<Mode> {
        let toggles = self.toggles.load(Ordering::SeqCst);
        let changes = (*announced..toggles)
            .map(|n| {
                if n % 2 == 0 {
                    Mode::ForegroundOnly
                } else {
                    Mode::Normal
                }
            })
            .collect();
        *announced = toggles;
        changes
    }
}

extern "C" fn handle_sigchld(_: libc::c_int) {
    let saved_errno = Errno::last_raw();
    TERMINATIONS.collect_reapable();
    Errno::set_raw(saved_errno);
}

extern "C" fn handle_sigtstp(_: libc::c_int) {
    MODE.toggle();
}

/// Installs the interpreter's dispositions: reap on `SIGCHLD`, toggle mode on
/// `SIGTSTP`, ignore `SIGINT`.
pub fn install_handlers() -> Result<()> {
    let sigchld_action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    let sigtstp_action = SigAction::new(
        SigHandler::Handler(handle_sigtstp),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

    // Both handlers only touch atomics and preserve errno.
    unsafe {
        signal::sigaction(Signal::SIGCHLD, &sigchld_action).context(ErrorKind::Nix)?;
        signal::sigaction(Signal::SIGTSTP, &sigtstp_action).context(ErrorKind::Nix)?;
        signal::sigaction(Signal::SIGINT, &ignore).context(ErrorKind::Nix)?;
    }

    debug!("installed SIGCHLD, SIGTSTP and SIGINT dispositions");
    Ok(())
}

/// Resets dispositions in a forked child before it replaces its image:
/// `SIGINT` default for foreground children and ignored for background ones,
/// `SIGTSTP` ignored, `SIGCHLD` default, and the signal mask restored to
/// `mask`.
pub fn reset_for_child(foreground: bool, mask: &SigSet) -> nix::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let sigint_action = if foreground { &default } else { &ignore };

    unsafe {
        signal::sigaction(Signal::SIGINT, sigint_action)?;
        signal::sigaction(Signal::SIGTSTP, &ignore)?;
        signal::sigaction(Signal::SIGCHLD, &default)?;
    }

    signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None)
}

/// RAII guard keeping `SIGCHLD` blocked, so the reaping handler cannot
/// collect a child the main loop is about to wait on.
pub struct ChildSignalBlock {
    previous: SigSet,
}

impl ChildSignalBlock {
    pub fn new() -> Result<Self> {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous))
            .context(ErrorKind::Nix)?;
        Ok(Self { previous })
    }

    /// The mask in effect before the guard was created.
    pub fn previous_mask(&self) -> &SigSet {
        &self.previous
    }
}

impl Drop for ChildSignalBlock {
    fn drop(&mut self) {
        let temp_result = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
        log_if_err!(temp_result, "failed to restore signal mask");
    }
}

impl fmt::Debug for ChildSignalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChildSignalBlock")
    }
}
