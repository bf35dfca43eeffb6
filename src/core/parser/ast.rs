use std::fmt;

/// One parsed input line: `<program> [arg]... [< path] [> path] [&]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub background: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RedirectInstruction {
    Input,
    Output,
}

impl RedirectInstruction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectInstruction::Input),
            ">" => Some(RedirectInstruction::Output),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            RedirectInstruction::Input => "<",
            RedirectInstruction::Output => ">",
        }
    }
}

#[derive(Debug)]
pub enum CommandPart {
    Word(String),
    Redirect(RedirectInstruction, String),
    Background,
}

#[derive(Debug, Default)]
pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    pub fn new<S: Into<String>>(program: S) -> CommandBuilder {
        CommandBuilder {
            command: Command {
                program: program.into(),
                ..Default::default()
            },
        }
    }

    pub fn update(mut self, command_part: CommandPart) -> CommandBuilder {
        match command_part {
            CommandPart::Word(w) => self.command.args.push(w),
            CommandPart::Redirect(RedirectInstruction::Input, path) => {
                self.command.input = Some(path)
            }
            CommandPart::Redirect(RedirectInstruction::Output, path) => {
                self.command.output = Some(path)
            }
            CommandPart::Background => self.command.background = true,
        };

        self
    }

    pub fn build(self) -> Command {
        self.command
    }
}

impl fmt::Display for Command {
    /// Re-serializes the command in the same grammar it was parsed from.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(ref input) = self.input {
            write!(f, " < {}", input)?;
        }
        if let Some(ref output) = self.output {
            write!(f, " > {}", output)?;
        }
        if self.background {
            write!(f, " &")?;
        }

        Ok(())
    }
}
