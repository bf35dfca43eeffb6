//! Error module. See the [failure](https://crates.io/crates/failure) crate for details.

use std::fmt;
use std::result;

use failure::{Backtrace, Context, Fail};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    pub(crate) fn empty_command() -> Error {
        Error::from(ErrorKind::EmptyCommand)
    }

    pub(crate) fn missing_redirect_target<T: AsRef<str>>(operator: T) -> Error {
        Error::from(ErrorKind::MissingRedirectTarget(operator.as_ref().to_string()))
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T) -> Error {
        Error::from(ErrorKind::BuiltinCommand(message.as_ref().to_string()))
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ctx.cause() {
            Some(cause) => write!(f, "{}: {}", self.ctx, cause),
            None => self.ctx.fmt(f),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The line held no tokens at all.
    EmptyCommand,
    /// A `<` or `>` was the last token on the line.
    MissingRedirectTarget(String),
    /// The program could not be started (fork failed or its arguments could
    /// not be handed to the OS).
    Launch(String),
    /// `cd` could not change into the named directory.
    DirectoryChange(String),
    /// A builtin failed for a reason of its own; the message is shown as is.
    BuiltinCommand(String),
    Io,
    Nix,
    Readline,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::EmptyCommand => write!(f, "syntax error: empty command"),
            ErrorKind::MissingRedirectTarget(ref operator) => {
                write!(f, "syntax error: expected a path after '{}'", operator)
            }
            ErrorKind::Launch(ref program) => write!(f, "{}: unable to launch", program),
            ErrorKind::DirectoryChange(ref path) => write!(f, "cd: {}", path),
            ErrorKind::BuiltinCommand(ref message) => write!(f, "{}", message),
            ErrorKind::Io => write!(f, "I/O error occurred"),
            ErrorKind::Nix => write!(f, "Nix error occurred"),
            ErrorKind::Readline => write!(f, "Readline error occurred"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}
