//! Smallsh - small shell
//!
//! An interactive command interpreter: one simple command per line, with
//! `<`/`>` redirection, `&` background launches, `$$` expansion, and the
//! `cd`, `status`, and `exit` builtins.
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces
)]

/// Logs the error held by `result`, if any, with a formatted message.
macro_rules! log_if_err {
    ($result:expr, $fmt:expr) => {
        if let Err(e) = $result {
            ::log::error!(concat!($fmt, ": {}"), e);
        }
    };
    ($result:expr, $fmt:expr, $($arg:tt)*) => {
        if let Err(e) = $result {
            ::log::error!(concat!($fmt, ": {}"), $($arg)*, e);
        }
    };
}

pub mod core;
pub mod editor;
pub mod errors;
pub mod execute_command;
pub mod shell;

pub use crate::shell::{create_shell, Shell, ShellConfig};
