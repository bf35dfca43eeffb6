use super::{prelude::*, BuiltinCommand, STATUS_NAME};
use crate::core::job::Termination;

pub struct Status;

impl BuiltinCommand for Status {
    const NAME: &'static str = STATUS_NAME;

    fn run<T: AsRef<str>>(shell: &mut dyn Shell, _args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let last = shell
            .last_foreground_result()
            .unwrap_or(Termination::Exited(0));
        writeln!(stdout, "{}", last).context(ErrorKind::Io)?;
        stdout.flush().context(ErrorKind::Io)?;
        Ok(())
    }
}
