use std::fmt;

use nix::unistd::Pid;

/// How a child process ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

impl Termination {
    /// Decodes a raw `waitpid(2)` status word. Returns `None` for statuses
    /// that do not end the process (stops, continues).
    ///
    /// Every signal number is accepted, real-time ones included.
    pub fn from_raw(raw_status: i32) -> Option<Self> {
        if libc::WIFEXITED(raw_status) {
            Some(Termination::Exited(libc::WEXITSTATUS(raw_status)))
        } else if libc::WIFSIGNALED(raw_status) {
            Some(Termination::Signaled(libc::WTERMSIG(raw_status)))
        } else {
            None
        }
    }

    pub fn success(self) -> bool {
        self == Termination::Exited(0)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Termination::Exited(code) => write!(f, "exit value {}", code),
            Termination::Signaled(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Exited(i32),
    Signaled(i32),
}

impl JobState {
    pub fn termination(self) -> Option<Termination> {
        match self {
            JobState::Running => None,
            JobState::Exited(code) => Some(Termination::Exited(code)),
            JobState::Signaled(signal) => Some(Termination::Signaled(signal)),
        }
    }
}

impl From<Termination> for JobState {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Exited(code) => JobState::Exited(code),
            Termination::Signaled(signal) => JobState::Signaled(signal),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.termination() {
            Some(termination) => write!(f, "{}", termination),
            None => write!(f, "running"),
        }
    }
}

/// A background child and its last known state.
#[derive(Clone, Debug)]
pub struct Job {
    pid: Pid,
    input: String,
    state: JobState,
}

impl Job {
    pub fn new(pid: Pid, input: &str) -> Self {
        Self {
            pid,
            input: input.to_string(),
            state: JobState::Running,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn mark_terminated(&mut self, termination: Termination) {
        self.state = termination.into();
    }
}

impl fmt::Display for Job {
    /// The completion report shown to the user.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "background pid {} is done: {}", self.pid, self.state)
    }
}
