//! The JobControlShell runs one command per line in the foreground or the
//! background and keeps the background job table in sync with the children
//! reaped by the `SIGCHLD` handler.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process;

use atty::{self, Stream};
use failure::ResultExt;
use log::{debug, error, info};
use nix::unistd;

use super::{
    builtins,
    job_control::JobManager,
    signals::{self, MODE, TERMINATIONS},
    Shell, ShellConfig,
};
use crate::{
    core::{job::Termination, parser::Command, variable_expansion},
    editor::{Editor, LineSource, PlainReader, ScriptLines},
    errors::{ErrorKind, Result},
    execute_command::{spawn_process, Launch},
};

pub struct JobControlShell {
    job_manager: JobManager,
    /// Outcome of the last foreground command; builtins leave it alone.
    last_foreground: Option<Termination>,
    /// Mode toggles already announced to the user.
    announced_toggles: usize,
    /// Substituted for `$$`.
    pid: String,
    config: ShellConfig,
    is_interactive: bool,
}

impl JobControlShell {
    /// Installs the shell's signal handling and constructs a JobControlShell.
    pub fn new(config: ShellConfig) -> Result<Self> {
        signals::install_handlers()?;

        let shell = Self {
            job_manager: Default::default(),
            last_foreground: None,
            announced_toggles: 0,
            pid: unistd::getpid().to_string(),
            config,
            is_interactive: atty::is(Stream::Stdin),
        };

        info!("smallsh started up");
        Ok(shell)
    }

    fn announce_mode_changes(&mut self) {
        for mode in MODE.take_changes(&mut self.announced_toggles) {
            info!("switched to {:?} mode", mode);
            println!("{}", mode.announcement());
        }
    }

    /// Runs a single command line. Every failure is reported to the user
    /// here; nothing propagates back into the loop.
    fn execute_line(&mut self, line: &str) {
        if is_skippable(line) {
            return;
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("smallsh: {}", e);
                return;
            }
        };

        let inner = variable_expansion::expand_variables(&command.inner, &self.pid);
        if builtins::is_builtin(&inner.program) {
            let mut stdout = io::stdout();
            if let Err(e) = builtins::run(self, &inner.program, &inner.args, &mut stdout) {
                eprintln!("smallsh: {}", e);
            }
            return;
        }

        let background = inner.background && !MODE.is_foreground_only();
        if inner.background && !background {
            debug!("foreground-only mode, running in the foreground: {}", inner);
        }

        match spawn_process(&inner, background) {
            Ok(Launch::Background(pid)) => {
                self.job_manager.create_job(pid, &command.input);
                println!("background pid is {}", pid);
            }
            Ok(Launch::Foreground(termination)) => {
                if let Some(termination) = termination {
                    if let Termination::Signaled(_) = termination {
                        println!("{}", termination);
                    }
                    self.last_foreground = Some(termination);
                }
            }
            Err(e) => {
                error!("failed to launch {}: {}", inner.program, e);
                eprintln!("smallsh: {}", e);
                self.last_foreground = Some(Termination::Exited(1));
            }
        }
    }
}

impl Shell for JobControlShell {
    fn execute_command_string(&mut self, input: &str) -> Result<()> {
        self.execute_lines(&mut ScriptLines::new(input));
        Ok(())
    }

    fn execute_commands_from_file(&mut self, path: &Path) -> Result<()> {
        let mut f = File::open(path).context(ErrorKind::Io)?;
        let mut buffer = String::new();
        f.read_to_string(&mut buffer)
            .with_context(|_| ErrorKind::Io)?;

        self.execute_lines(&mut ScriptLines::new(buffer));
        Ok(())
    }

    fn execute_from_stdin(&mut self) {
        if self.config.enable_line_editor && self.is_interactive {
            let mut editor = Editor::with_capacity(self.config.command_history_capacity);
            self.execute_lines(&mut editor);
        } else {
            let stdin = io::stdin();
            let mut reader = PlainReader::new(stdin.lock());
            self.execute_lines(&mut reader);
        }
    }

    fn execute_lines(&mut self, source: &mut dyn LineSource) {
        loop {
            // Report background jobs that finished since the last prompt.
            self.job_manager
                .do_job_notification(&TERMINATIONS, &mut io::stdout());
            self.announce_mode_changes();

            let line = match source.read_line(self.config.prompt()) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("failed to read command line: {}", e);
                    eprintln!("smallsh: {}", e);
                    break;
                }
            };

            self.execute_line(&line);
        }
    }

    fn exit(&mut self, n: Option<i32>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        if self.job_manager.has_jobs() {
            debug!("terminating {:?}", self.job_manager);
            self.job_manager.terminate_all();
        }

        let code = wrap_exit_code(n.unwrap_or(0));
        info!("smallsh has shut down with status {}", code);
        process::exit(code);
    }

    fn last_foreground_result(&self) -> Option<Termination> {
        self.last_foreground
    }
}

impl fmt::Debug for JobControlShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pid: {}\tlast: {:?}", self.pid, self.last_foreground)?;
        write!(f, "{:?}", self.job_manager)
    }
}

pub fn create_shell(config: ShellConfig) -> Result<Box<dyn Shell>> {
    let shell = JobControlShell::new(config)?;
    Ok(Box::new(shell))
}

/// Blank lines and comments are not commands.
fn is_skippable(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

/// Maps any status onto 0..=255 the way the kernel truncates it.
fn wrap_exit_code(code: i32) -> i32 {
    code.rem_euclid(256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_skippable() {
        assert!(is_skippable(""));
        assert!(is_skippable("   \t"));
        assert!(is_skippable("# a comment"));
        assert!(is_skippable("#ls"));
        assert!(!is_skippable("ls # not a comment"));
        assert!(!is_skippable(" ls"));
    }

    #[test]
    fn test_wrap_exit_code() {
        assert_eq!(wrap_exit_code(0), 0);
        assert_eq!(wrap_exit_code(255), 255);
        assert_eq!(wrap_exit_code(256), 0);
        assert_eq!(wrap_exit_code(257), 1);
        assert_eq!(wrap_exit_code(-1), 255);
    }
}
