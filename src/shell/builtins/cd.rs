use std::env;
use std::path::{Path, PathBuf};

use super::{prelude::*, BuiltinCommand, CD_NAME};

pub struct Cd;

impl BuiltinCommand for Cd {
    const NAME: &'static str = CD_NAME;

    /// `cd [dir]`: no argument means the home directory; a relative `dir` is
    /// joined to the current directory. Extra arguments are ignored.
    fn run<T: AsRef<str>>(_shell: &mut dyn Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let (dir, display) = match args.first() {
            Some(arg) => (resolve(arg.as_ref())?, arg.as_ref().to_string()),
            None => {
                let home = dirs::home_dir()
                    .ok_or_else(|| Error::builtin_command("cd: HOME not set"))?;
                let display = home.display().to_string();
                (home, display)
            }
        };

        env::set_current_dir(&dir).context(ErrorKind::DirectoryChange(display))?;
        Ok(())
    }
}

fn resolve(arg: &str) -> Result<PathBuf> {
    let path = Path::new(arg);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir().context(ErrorKind::Io)?.join(path))
    }
}
