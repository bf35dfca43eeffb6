//! Smallsh Parser
//!
//! Lines follow a fixed positional grammar:
//!
//! ```text
//! <program> [arg]... [(< path | > path)]{0,2} [&]
//! ```
//!
//! After the arguments come at most three clause slots, each consuming one
//! token: the first two accept a redirection or the background marker, the
//! last accepts only the background marker. Tokens that fit no slot are
//! dropped.

use std::iter::Peekable;

use log::debug;

use self::ast::{CommandBuilder, CommandPart, RedirectInstruction};
use crate::errors::{Error, Result};

pub mod ast;

const BACKGROUND_TOKEN: &str = "&";
const REDIRECT_SLOTS: usize = 2;

#[derive(Debug)]
pub struct Command {
    pub input: String,
    pub inner: ast::Command,
}

impl Command {
    pub fn parse(input: &str) -> Result<Self> {
        let result = parse_tokens(input.split_whitespace()).map(|inner| Command {
            input: input.into(),
            inner,
        });
        debug!("parsed Command: {:?}", result);
        result
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum State {
    Arguments,
    /// Clause slot `n`; slots below `REDIRECT_SLOTS` also accept redirections.
    Clause(usize),
    Done,
}

fn is_operator(token: &str) -> bool {
    token == BACKGROUND_TOKEN || RedirectInstruction::from_token(token).is_some()
}

fn parse_tokens<'a, I>(tokens: I) -> Result<ast::Command>
where
    I: Iterator<Item = &'a str>,
{
    let mut tokens = tokens.peekable();
    let program = tokens.next().ok_or_else(Error::empty_command)?;
    let mut builder = CommandBuilder::new(program);

    let mut state = State::Arguments;
    while state != State::Done {
        state = match state {
            State::Arguments => match tokens.peek() {
                Some(token) if is_operator(token) => State::Clause(0),
                Some(_) => {
                    let word = tokens.next().map(str::to_string).unwrap_or_default();
                    builder = builder.update(CommandPart::Word(word));
                    State::Arguments
                }
                None => State::Done,
            },
            State::Clause(slot) => match tokens.next() {
                Some(token) => {
                    if let Some(part) = parse_clause(token, slot, &mut tokens)? {
                        builder = builder.update(part);
                    }
                    if slot < REDIRECT_SLOTS {
                        State::Clause(slot + 1)
                    } else {
                        State::Done
                    }
                }
                None => State::Done,
            },
            State::Done => State::Done,
        };
    }

    Ok(builder.build())
}

/// Interprets the token occupying clause `slot`, pulling the redirection
/// target from `tokens` when needed. Returns `None` for a token that does not
/// fit the slot.
fn parse_clause<'a, I>(
    token: &'a str,
    slot: usize,
    tokens: &mut Peekable<I>,
) -> Result<Option<CommandPart>>
where
    I: Iterator<Item = &'a str>,
{
    if token == BACKGROUND_TOKEN {
        return Ok(Some(CommandPart::Background));
    }

    match RedirectInstruction::from_token(token) {
        Some(instruction) if slot < REDIRECT_SLOTS => {
            let path = tokens
                .next()
                .ok_or_else(|| Error::missing_redirect_target(instruction.token()))?;
            Ok(Some(CommandPart::Redirect(instruction, path.to_string())))
        }
        _ => {
            debug!("dropping token '{}' in clause slot {}", token, slot);
            Ok(None)
        }
    }
}
