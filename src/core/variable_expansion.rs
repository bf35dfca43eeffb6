use std::borrow::Cow;

use crate::core::parser::ast::Command;

const PID_VARIABLE: &str = "$$";

/// Replaces every `$$` in the program, arguments, and redirection targets
/// with `pid`.
pub fn expand_variables(command: &Command, pid: &str) -> Command {
    Command {
        program: expand_variables_word(&command.program, pid).into_owned(),
        args: command
            .args
            .iter()
            .map(|arg| expand_variables_word(arg, pid).into_owned())
            .collect(),
        input: command
            .input
            .as_ref()
            .map(|path| expand_variables_word(path, pid).into_owned()),
        output: command
            .output
            .as_ref()
            .map(|path| expand_variables_word(path, pid).into_owned()),
        background: command.background,
    }
}

/// Single left-to-right pass over non-overlapping `$$` pairs, so `$$$` keeps
/// its trailing `$` and `$$$$` yields the pid twice.
pub fn expand_variables_word<'a>(word: &'a str, pid: &str) -> Cow<'a, str> {
    if word.contains(PID_VARIABLE) {
        Cow::Owned(word.replace(PID_VARIABLE, pid))
    } else {
        Cow::Borrowed(word)
    }
}
