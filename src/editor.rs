//! Line sources: where the interpreter loop gets its next command line.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, Write};

use failure::{Fail, ResultExt};
use log::warn;
use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{ErrorKind, Result};

/// Supplies command lines, one at a time.
pub trait LineSource {
    /// Reads the next line, without its trailing newline. Returns `None` at
    /// end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> ::std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;
}

impl Highlighter for EditorHelper {}

impl Helper for EditorHelper {}

impl Validator for EditorHelper {}

/// Terminal line editor with in-memory history and filename completion.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Editor {
        let config = Config::builder()
            .max_history_size(history_capacity)
            .history_ignore_space(true)
            .auto_add_history(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config);
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Editor {
            internal,
            history_capacity,
        }
    }

    pub fn history_len(&self) -> usize {
        self.internal.history().len()
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            // ^C abandons the line being edited
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Utf8Error) => {
                warn!("discarding a line that is not valid UTF-8");
                eprintln!("smallsh: input is not valid UTF-8");
                Ok(Some(String::new()))
            }
            Err(e) => Err(e.context(ErrorKind::Readline).into()),
        }
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count: {}", self.history_len())?;
        write!(f, "capacity: {}", self.history_capacity)
    }
}

/// Reads lines from any buffered reader, echoing the prompt to stdout.
/// Used when stdin is not a terminal.
#[derive(Debug)]
pub struct PlainReader<R> {
    reader: R,
}

impl<R: BufRead> PlainReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Bytes that are not valid UTF-8 become U+FFFD rather than failing the
    /// read, so one bad line never ends the session.
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf).context(ErrorKind::Io)? == 0 {
            return Ok(None);
        }

        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl<R: BufRead> LineSource for PlainReader<R> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt).context(ErrorKind::Io)?;
        stdout.flush().context(ErrorKind::Io)?;
        self.next_line()
    }
}

/// Preloaded lines, e.g. from `-c` or a script file. Never prompts.
#[derive(Debug, Default)]
pub struct ScriptLines {
    lines: VecDeque<String>,
}

impl ScriptLines {
    pub fn new<T: AsRef<str>>(text: T) -> Self {
        Self {
            lines: text.as_ref().lines().map(str::to_string).collect(),
        }
    }
}

impl LineSource for ScriptLines {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}
