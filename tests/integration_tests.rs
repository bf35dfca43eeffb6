//! Integration Tests

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus, Output};
use std::thread;
use std::time::Duration;

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};

use crate::workdir::WorkDir;


fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Pids announced by `background pid is <pid>` lines, in order.
fn background_pids(stdout: &str) -> Vec<i32> {
    const MARKER: &str = "background pid is ";
    stdout
        .match_indices(MARKER)
        .map(|(i, _)| {
            stdout[i + MARKER.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .expect("pid")
        })
        .collect()
}

/// A shell driven line by line, for tests that must synchronize with it.
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    transcript: String,
}

impl Session {
    fn start(dir: &WorkDir) -> Session {
        let mut child = dir.spawn();
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = BufReader::new(child.stdout.take().expect("child stdout"));
        Session {
            child,
            stdin,
            stdout,
            transcript: String::new(),
        }
    }

    fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    fn send(&mut self, line: &str) {
        writeln!(self.stdin, "{}", line).expect("write line");
        self.stdin.flush().expect("flush line");
    }

    fn signal(&self, sig: Signal) {
        signal::kill(self.pid(), sig).expect("signal smallsh");
    }

    /// Reads output until a line containing `needle` shows up.
    fn wait_for(&mut self, needle: &str) -> String {
        loop {
            let mut line = String::new();
            let n = self.stdout.read_line(&mut line).expect("read output");
            assert!(n > 0, "output ended before {:?}:\n{}", needle, self.transcript);
            self.transcript.push_str(&line);
            if line.contains(needle) {
                return line;
            }
        }
    }

    fn finish(self) -> (String, ExitStatus) {
        let Session {
            mut child,
            stdin,
            mut stdout,
            mut transcript,
        } = self;
        drop(stdin);
        stdout
            .read_to_string(&mut transcript)
            .expect("read output");
        let status = child.wait().expect("wait for smallsh");
        (transcript, status)
    }
}

/// Whether `pid` is gone or only a zombie, retrying for a while.
fn process_ended(pid: i32) -> bool {
    for _ in 0..40 {
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => return true,
            Ok(stat) => {
                let state = stat
                    .rsplit(')')
                    .next()
                    .and_then(|rest| rest.trim_start().chars().next());
                if state == Some('Z') {
                    return true;
                }
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    false
}

#[test]
fn test_echo_and_status() {
    let dir = WorkDir::new("echo_and_status");
    let output = dir.run_script("echo hello world\nstatus\nexit\n");

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("hello world\n"), "{}", stdout);
    assert!(stdout.contains("exit value 0\n"), "{}", stdout);
    assert!(stdout.starts_with(": "), "{}", stdout);
}

#[test]
fn test_status_defaults_to_success() {
    let dir = WorkDir::new("status_default");
    let output = dir.run_script("status\n");
    assert_eq!(stdout_of(&output), ": exit value 0\n: ");
}

#[test]
fn test_status_after_failure() {
    let dir = WorkDir::new("status_failure");
    let output = dir.run_script("false\nstatus\n");
    assert!(stdout_of(&output).contains("exit value 1\n"));
}

#[test]
fn test_builtins_keep_last_status() {
    let dir = WorkDir::new("builtins_keep_status");
    let output = dir.run_script("false\ncd /\nstatus\n");
    assert!(stdout_of(&output).contains("exit value 1\n"));
}

#[test]
fn test_unknown_command() {
    let dir = WorkDir::new("unknown_command");
    let output = dir.run_script("no_such_command_smallsh\nstatus\necho still here\n");

    let stdout = stdout_of(&output);
    assert!(stdout.contains("exit value 1\n"), "{}", stdout);
    assert!(stdout.contains("still here\n"), "{}", stdout);
    assert!(stderr_of(&output).contains("smallsh: no_such_command_smallsh: "));
}

#[test]
fn test_redirects() {
    let dir = WorkDir::new("redirects");
    let output = dir.run_script("echo one line > out.txt\nwc -l < out.txt\n");

    assert_eq!(dir.read("out.txt"), "one line\n");
    assert!(stdout_of(&output).contains(": 1\n"));
}

#[test]
fn test_redirects_in_either_order() {
    let dir = WorkDir::new("redirect_order");
    dir.create("in.txt", "b\na\n");
    dir.run_script("sort > first.txt < in.txt\nsort < in.txt > second.txt\n");

    assert_eq!(dir.read("first.txt"), "a\nb\n");
    assert_eq!(dir.read("second.txt"), "a\nb\n");
}

#[test]
fn test_missing_input_file() {
    let dir = WorkDir::new("missing_input");
    let output = dir.run_script("cat < missing.txt\nstatus\n");

    assert!(stdout_of(&output).contains("exit value 1\n"));
    assert!(stderr_of(&output).contains("smallsh: missing.txt: "));
}

#[test]
fn test_pid_expansion() {
    let dir = WorkDir::new("pid_expansion");
    let mut session = Session::start(&dir);
    let pid = session.pid();
    session.send("echo $$ x$$$");
    let line = session.wait_for("x");
    assert!(line.contains(&format!("{} x{}$", pid, pid)), "{}", line);
    session.finish();
}

#[test]
fn test_cd() {
    let dir = WorkDir::new("cd");
    let sub = fs::canonicalize(dir.create_dir("sub")).unwrap();
    let output = dir.run_script("cd sub\npwd\ncd\npwd\n");

    let home = fs::canonicalize(dir.path()).unwrap();
    let stdout = stdout_of(&output);
    assert!(stdout.contains(&format!(": {}\n", sub.display())), "{}", stdout);
    assert!(stdout.contains(&format!(": {}\n", home.display())), "{}", stdout);
}

#[test]
fn test_cd_failure() {
    let dir = WorkDir::new("cd_failure");
    let output = dir.run_script("cd nowhere\n");
    assert!(stderr_of(&output).contains("smallsh: cd: nowhere: "));
}

#[test]
fn test_comments_and_blank_lines() {
    let dir = WorkDir::new("comments");
    let output = dir.run_script("# echo hidden\n\n   \necho shown\n");

    let stdout = stdout_of(&output);
    assert!(!stdout.contains("hidden"), "{}", stdout);
    assert!(stdout.contains("shown\n"), "{}", stdout);
    assert!(stderr_of(&output).is_empty());
}

#[test]
fn test_syntax_error() {
    let dir = WorkDir::new("syntax_error");
    let output = dir.run_script("ls <\necho after\n");

    assert!(stderr_of(&output).contains("smallsh: syntax error: expected a path after '<'"));
    assert!(stdout_of(&output).contains("after\n"));
}

#[test]
fn test_background_job_report() {
    let dir = WorkDir::new("background_report");
    let output = dir.run_script("sleep 0 &\nsleep 1\necho next\n");

    let stdout = stdout_of(&output);
    let pids = background_pids(&stdout);
    assert_eq!(pids.len(), 1, "{}", stdout);
    let report = format!("background pid {} is done: exit value 0\n", pids[0]);
    assert_eq!(stdout.matches(&report).count(), 1, "{}", stdout);
}

#[test]
fn test_background_stdin_is_null_device() {
    let dir = WorkDir::new("background_null");
    // cat would block forever on an inherited pipe
    let output = dir.run_script("cat &\nsleep 1\n");

    let stdout = stdout_of(&output);
    let pids = background_pids(&stdout);
    assert_eq!(pids.len(), 1, "{}", stdout);
    assert!(stdout.contains(&format!("background pid {} is done: exit value 0", pids[0])));
}

#[test]
fn test_background_stdout_is_null_device() {
    let dir = WorkDir::new("background_stdout_null");
    let output = dir.run_script("echo leak &\nsleep 1\n");

    let stdout = stdout_of(&output);
    assert!(!stdout.contains("leak"), "{}", stdout);
    let pids = background_pids(&stdout);
    assert_eq!(pids.len(), 1, "{}", stdout);
    assert!(stdout.contains(&format!("background pid {} is done: exit value 0", pids[0])));
}

#[test]
fn test_background_output_redirect() {
    let dir = WorkDir::new("background_redirect");
    let output = dir.run_script("echo quiet > bg.txt &\nsleep 1\n");

    assert!(!stdout_of(&output).contains("quiet"));
    assert_eq!(dir.read("bg.txt"), "quiet\n");
}

#[test]
fn test_killed_background_job() {
    let dir = WorkDir::new("killed_background");
    let mut session = Session::start(&dir);
    session.send("sleep 30 &");
    let line = session.wait_for("background pid is");
    let pid = background_pids(&line)[0];

    signal::kill(Pid::from_raw(pid), Signal::SIGTERM).unwrap();
    session.send("sleep 0.5");
    session.send("echo done");
    session.wait_for("done");

    let (transcript, status) = session.finish();
    assert!(status.success());
    assert!(
        transcript.contains(&format!(
            "background pid {} is done: terminated by signal 15",
            pid
        )),
        "{}",
        transcript
    );
}

#[test]
fn test_foreground_child_killed_by_signal() {
    let dir = WorkDir::new("foreground_signal");
    dir.create("suicide.sh", "kill -TERM $$\n");
    let output = dir.run_script("sh suicide.sh\nstatus\n");

    let stdout = stdout_of(&output);
    assert_eq!(stdout.matches("terminated by signal 15\n").count(), 2, "{}", stdout);
}

#[test]
fn test_foreground_child_killed_by_realtime_signal() {
    let dir = WorkDir::new("foreground_rt_signal");
    dir.create("rt.sh", "kill -s RTMIN $$\n");
    let output = dir.run_script("sh rt.sh\nstatus\n");

    let report = format!("terminated by signal {}\n", libc::SIGRTMIN());
    let stdout = stdout_of(&output);
    assert_eq!(stdout.matches(&report).count(), 2, "{}", stdout);
    assert!(stderr_of(&output).is_empty(), "{}", stderr_of(&output));
}

#[test]
fn test_background_job_killed_by_realtime_signal() {
    let dir = WorkDir::new("background_rt_signal");
    dir.create("rt.sh", "kill -s RTMIN $$\n");
    let output = dir.run_script("sh rt.sh &\nsleep 1\n");

    let stdout = stdout_of(&output);
    let pids = background_pids(&stdout);
    assert_eq!(pids.len(), 1, "{}", stdout);
    let report = format!(
        "background pid {} is done: terminated by signal {}\n",
        pids[0],
        libc::SIGRTMIN()
    );
    assert_eq!(stdout.matches(&report).count(), 1, "{}", stdout);
}

#[test]
fn test_invalid_utf8_line_does_not_end_session() {
    let dir = WorkDir::new("invalid_utf8");
    let output = dir.run_script_bytes(b"echo \xff\necho after\n");

    assert!(output.status.success());
    assert!(stdout_of(&output).contains("after\n"), "{}", stdout_of(&output));
}

#[test]
fn test_foreground_only_mode() {
    let dir = WorkDir::new("foreground_only");
    let mut session = Session::start(&dir);
    session.send("echo ready");
    session.wait_for("ready");

    session.signal(Signal::SIGTSTP);
    session.send("sleep 0 &");
    session.send("echo marker1");
    session.wait_for("marker1");
    assert!(session
        .transcript
        .contains("Entering foreground-only mode (& is now ignored)\n"));
    assert!(!session.transcript.contains("background pid is"));

    session.signal(Signal::SIGTSTP);
    session.send("sleep 0 &");
    session.send("echo marker2");
    session.wait_for("marker2");

    let (transcript, _) = session.finish();
    assert_eq!(
        transcript
            .matches("Entering foreground-only mode (& is now ignored)\n")
            .count(),
        1
    );
    assert_eq!(transcript.matches("Exiting foreground-only mode\n").count(), 1);
    assert_eq!(background_pids(&transcript).len(), 1, "{}", transcript);
}

#[test]
fn test_shell_ignores_sigint() {
    let dir = WorkDir::new("sigint");
    let mut session = Session::start(&dir);
    session.send("echo ready");
    session.wait_for("ready");

    session.signal(Signal::SIGINT);
    session.send("echo alive");
    session.wait_for("alive");
    let (_, status) = session.finish();
    assert!(status.success());
}

#[test]
fn test_exit_terminates_background_jobs() {
    let dir = WorkDir::new("exit_jobs");
    let output = dir.run_script("sleep 30 &\nsleep 30 &\nexit\n");

    assert!(output.status.success());
    let pids = background_pids(&stdout_of(&output));
    assert_eq!(pids.len(), 2);
    for pid in pids {
        assert!(process_ended(pid), "background job {} survived exit", pid);
    }
}

#[test]
fn test_end_of_input_terminates_background_jobs() {
    let dir = WorkDir::new("eof_jobs");
    let output = dir.run_script("false\nsleep 30 &\n");

    assert_eq!(output.status.code(), Some(0));
    let pids = background_pids(&stdout_of(&output));
    assert_eq!(pids.len(), 1);
    assert!(process_ended(pids[0]));
}

#[test]
fn test_exit_status() {
    let dir = WorkDir::new("exit_status");
    assert_eq!(dir.run_script("exit 3\necho unreachable\n").status.code(), Some(3));
    assert_eq!(dir.run_script("exit 256\n").status.code(), Some(0));
    assert_eq!(dir.run_script("exit -1\n").status.code(), Some(255));

    let output = dir.run_script("exit abc\n");
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("exit: abc: numeric argument required"));
}

#[test]
fn test_command_string() {
    let dir = WorkDir::new("command_string");
    let output = dir.command(&["-c", "echo hi"]).output().unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "hi\n");
}

#[test]
fn test_script_file() {
    let dir = WorkDir::new("script_file");
    let script = dir.create("script.sh", "# setup\necho from script\nexit 4\n");
    let output = dir.command(&[script]).output().unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert_eq!(stdout_of(&output), "from script\n");
}

#[test]
fn test_version() {
    let dir = WorkDir::new("version");
    let output = dir.command(&["--version"]).output().unwrap();
    assert!(stdout_of(&output).starts_with("smallsh version "));
}
