//! Process launcher: fork, set up the child's descriptors, replace its image.

use std::ffi::{CStr, CString};
use std::io::{self, Write};
use std::os::unix::io::RawFd;

use failure::{Fail, ResultExt};
use log::{debug, error, info, warn};
use nix::{
    errno::Errno,
    fcntl::{self, OFlag},
    sys::{signal::SigSet, stat::Mode},
    unistd::{self, ForkResult, Pid},
};

use crate::{
    core::{job::Termination, parser::ast},
    errors::{Error, ErrorKind, Result},
    shell::signals::{self, ChildSignalBlock},
};

const NULL_DEVICE: &str = "/dev/null";
const CHILD_FAILURE_STATUS: i32 = 1;

/// Outcome of a successful launch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Launch {
    /// The child ran to completion. `None` when its status was collected
    /// elsewhere before the wait could observe it.
    Foreground(Option<Termination>),
    /// The child is running; the caller owns tracking it.
    Background(Pid),
}

/// Everything the child needs, converted before `fork` so the child only
/// has to open, duplicate, and exec.
#[derive(Debug)]
struct ChildImage {
    program: CString,
    argv: Vec<CString>,
    stdin: Option<CString>,
    stdout: Option<CString>,
    background: bool,
}

impl ChildImage {
    fn new(command: &ast::Command, background: bool) -> Result<Self> {
        let to_cstring = |s: &str| -> Result<CString> {
            Ok(CString::new(s).context(ErrorKind::Launch(command.program.clone()))?)
        };

        let program = to_cstring(&command.program)?;
        let mut argv = vec![program.clone()];
        for arg in &command.args {
            argv.push(to_cstring(arg)?);
        }

        // background children never touch the terminal's descriptors
        let default_target = |explicit: &Option<String>| match explicit {
            Some(path) => to_cstring(path).map(Some),
            None if background => to_cstring(NULL_DEVICE).map(Some),
            None => Ok(None),
        };

        Ok(Self {
            program,
            argv,
            stdin: default_target(&command.input)?,
            stdout: default_target(&command.output)?,
            background,
        })
    }

    fn redirect(&self) -> std::result::Result<(), (String, Errno)> {
        if let Some(ref path) = self.stdin {
            redirect_fd(path, OFlag::O_RDONLY, libc::STDIN_FILENO)?;
        }
        if let Some(ref path) = self.stdout {
            redirect_fd(
                path,
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                libc::STDOUT_FILENO,
            )?;
        }

        Ok(())
    }
}

fn redirect_fd(
    path: &CStr,
    flags: OFlag,
    target: RawFd,
) -> std::result::Result<(), (String, Errno)> {
    let describe = |e: Errno| (path.to_string_lossy().into_owned(), e);
    let fd = fcntl::open(path, flags, Mode::from_bits_truncate(0o644)).map_err(describe)?;
    if fd != target {
        unistd::dup2(fd, target).map_err(describe)?;
        unistd::close(fd).map_err(describe)?;
    }

    Ok(())
}

/// Launches `command`. Foreground launches block until the child terminates;
/// background launches return its pid immediately.
///
/// `SIGCHLD` stays blocked from before the fork until the foreground wait is
/// over, so the reaping handler never races the wait below.
pub fn spawn_process(command: &ast::Command, background: bool) -> Result<Launch> {
    let image = ChildImage::new(command, background)?;

    // anything still buffered would otherwise be written by both processes
    let temp_result = io::stdout().flush();
    log_if_err!(temp_result, "failed to flush stdout before fork");

    let signal_block = ChildSignalBlock::new()?;
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => child_entry(&image, signal_block.previous_mask()),
        Ok(ForkResult::Parent { child }) => {
            info!(
                "spawned {} ({}) in the {}",
                child,
                command,
                if background { "background" } else { "foreground" }
            );
            if background {
                Ok(Launch::Background(child))
            } else {
                let termination = wait_for_foreground(child)?;
                drop(signal_block);
                Ok(Launch::Foreground(termination))
            }
        }
        Err(e) => Err(e.context(ErrorKind::Launch(command.program.clone())).into()),
    }
}

/// Runs in the forked child and never returns: either the program image
/// replaces this one or the child exits with a failure status.
fn child_entry(image: &ChildImage, mask: &SigSet) -> ! {
    if let Err(e) = signals::reset_for_child(!image.background, mask) {
        eprintln!("smallsh: unable to reset signal handling: {}", e.desc());
        exit_child();
    }

    if let Err((path, e)) = image.redirect() {
        eprintln!("smallsh: {}: {}", path, e.desc());
        exit_child();
    }

    let e = match unistd::execvp(&image.program, &image.argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    eprintln!(
        "smallsh: {}: {}",
        image.program.to_string_lossy(),
        e.desc()
    );
    exit_child()
}

fn exit_child() -> ! {
    // skip atexit handlers and stdio buffers inherited from the parent
    unsafe { libc::_exit(CHILD_FAILURE_STATUS) }
}

/// Blocks until `pid` terminates. An already-reaped child yields `Ok(None)`.
fn wait_for_foreground(pid: Pid) -> Result<Option<Termination>> {
    let termination = loop {
        let mut raw_status: libc::c_int = 0;
        // the raw call keeps every signal number decodable
        let rc = unsafe { libc::waitpid(pid.as_raw(), &mut raw_status, 0) };
        if rc < 0 {
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::ECHILD => {
                    warn!("foreground child {} was reaped before the wait", pid);
                    return Ok(None);
                }
                e => return Err(Error::from(e.context(ErrorKind::Nix))),
            }
        }

        match Termination::from_raw(raw_status) {
            Some(termination) => break termination,
            None => error!(
                "undecodable status {:#x} for foreground child {}",
                raw_status, pid
            ),
        }
    };

    if !termination.success() {
        ensure_reaped(pid);
    }

    debug!("foreground child {} finished: {}", pid, termination);
    Ok(Some(termination))
}

/// A second, non-blocking wait on a child that already reported failure;
/// `ECHILD` is the expected outcome.
fn ensure_reaped(pid: Pid) {
    let mut raw_status: libc::c_int = 0;
    let rc = unsafe { libc::waitpid(pid.as_raw(), &mut raw_status, libc::WNOHANG) };
    match rc {
        0 => warn!("child {} still present after its exit", pid),
        rc if rc > 0 => debug!("late status {:#x} for child {}", raw_status, pid),
        _ => match Errno::last() {
            Errno::ECHILD => debug!("child {} fully reaped", pid),
            e => warn!("re-wait for child {} failed: {}", pid, e),
        },
    }
}
