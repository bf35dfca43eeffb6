use super::{prelude::*, BuiltinCommand, EXIT_NAME};

const NUMERIC_ARGUMENT_REQUIRED: i32 = 2;

pub struct Exit;

impl BuiltinCommand for Exit {
    const NAME: &'static str = EXIT_NAME;

    /// `exit [n]`: terminates every background job, then the shell, with
    /// status `n` (0 if omitted).
    fn run<T: AsRef<str>>(shell: &mut dyn Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let status_code = args.first().map(|arg| {
            arg.as_ref().parse::<i32>().unwrap_or_else(|_| {
                eprintln!("smallsh: exit: {}: numeric argument required", arg.as_ref());
                NUMERIC_ARGUMENT_REQUIRED
            })
        });
        shell.exit(status_code);
    }
}
