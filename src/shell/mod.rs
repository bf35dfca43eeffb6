use std::path::Path;

use crate::core::job::Termination;
use crate::editor::LineSource;
use crate::errors::Result;

pub use self::unix::create_shell;

pub mod builtins;
pub mod job_control;
pub mod signals;
pub mod unix;

/// Prompt shown before every command line.
pub const PROMPT: &str = ": ";

pub trait Shell {
    /// Runs every line of `input` as if it had been typed at the prompt.
    fn execute_command_string(&mut self, input: &str) -> Result<()>;
    fn execute_commands_from_file(&mut self, path: &Path) -> Result<()>;
    fn execute_from_stdin(&mut self);
    /// The interpreter loop: runs until `source` is exhausted or a builtin
    /// ends the process.
    fn execute_lines(&mut self, source: &mut dyn LineSource);
    fn exit(&mut self, n: Option<i32>) -> !;

    /// Outcome of the most recent foreground command, if any ran.
    fn last_foreground_result(&self) -> Option<Termination>;
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Read stdin through the line editor, with in-memory history.
    enable_line_editor: bool,

    /// Number of entries to keep in the editor's history
    command_history_capacity: usize,

    /// Determines if the `: ` prompt is printed before each line.
    display_prompt: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell reading from a terminal
    ///
    /// # Complete List
    /// - Lines are read with the line editor, history kept in memory only
    /// - The prompt is displayed
    /// - Some additional messages are displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_line_editor: true,
            command_history_capacity,
            display_prompt: true,
            display_messages: true,
        }
    }

    /// Creates a shell whose stdin is a pipe or a file: plain line reads,
    /// prompt still displayed.
    pub fn piped() -> Self {
        Self {
            display_prompt: true,
            ..Default::default()
        }
    }

    /// Creates a noninteractive shell for `-c` strings and script files: no
    /// prompt, no line editor, fewer messages.
    pub fn noninteractive() -> Self {
        Default::default()
    }

    pub fn prompt(&self) -> &'static str {
        if self.display_prompt {
            PROMPT
        } else {
            ""
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_line_editor: false,
            command_history_capacity: 0,
            display_prompt: false,
            display_messages: false,
        }
    }
}
