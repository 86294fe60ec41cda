use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{HarnessError, HarnessResult};

const KILLED_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Exit status and captured streams of one finished external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[must_use]
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

#[must_use]
pub fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

pub fn run_command(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
) -> HarnessResult<ProcessOutput> {
    run_command_with_timeout(program, args, cwd, None)
}

/// Run `program` to completion, capturing stdout and stderr.
///
/// A non-zero exit becomes [`HarnessError::CommandFailed`] carrying the
/// captured stderr. With `timeout` set, the child is killed once the limit
/// elapses and [`HarnessError::CommandTimedOut`] is returned.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> HarnessResult<ProcessOutput> {
    if !command_exists(program) {
        return Err(HarnessError::CommandMissing {
            command: program.to_owned(),
        });
    }

    let rendered = render_command(program, args);
    tracing::debug!(command = %rendered, "spawning process");

    let mut command = Command::new(program);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let Some(limit) = timeout else {
        let output = command.output()?;
        return validate_command_output(&rendered, output);
    };

    let mut child = command.spawn()?;
    let started_at = Instant::now();

    let stdout_drain = child.stdout.take().map(drain_pipe);
    let stderr_drain = child.stderr.take().map(drain_pipe);

    loop {
        if let Some(status) = child.try_wait()? {
            // The child closed its end of both pipes; the drains finish at EOF.
            return validate_command_output(
                &rendered,
                Output {
                    status,
                    stdout: join_drain(stdout_drain),
                    stderr: join_drain(stderr_drain),
                },
            );
        }

        if started_at.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            // A grandchild may still hold the pipe open, so the wait is bounded.
            let stderr = join_drain_within(stderr_drain, KILLED_DRAIN_GRACE);
            let stderr = String::from_utf8_lossy(&stderr).into_owned();
            return Err(HarnessError::from_command_timeout(
                rendered,
                saturating_duration_ms(limit),
                stderr,
            ));
        }

        thread::sleep(Duration::from_millis(20));
    }
}

fn drain_pipe<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: std::io::Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(drain: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    drain
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn join_drain_within(drain: Option<JoinHandle<Vec<u8>>>, grace: Duration) -> Vec<u8> {
    let Some(handle) = drain else {
        return Vec::new();
    };
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Vec::new();
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().unwrap_or_default()
}

fn validate_command_output(rendered: &str, output: Output) -> HarnessResult<ProcessOutput> {
    let status = output.status.code().unwrap_or(-1);
    if output.status.success() {
        return Ok(ProcessOutput {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    Err(HarnessError::from_command_failure(rendered.to_owned(), status, stderr))
}

pub(crate) fn saturating_duration_ms(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::time::Duration;

    use super::*;

    fn fake_output(code: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn zero_exit_is_success() {
        let output = run_command("true", &[], None).expect("true should succeed");
        assert_eq!(output.status, 0);
    }

    #[test]
    fn stdout_is_captured_verbatim() {
        let output = run_command(
            "echo",
            &["container".to_owned(), "0123abcd".to_owned()],
            None,
        )
        .expect("echo should succeed");
        assert_eq!(output.stdout_text(), "container 0123abcd\n");
    }

    #[test]
    fn absent_binary_is_reported_before_spawning() {
        let err = run_command("runsql-no-such-java", &[], None)
            .expect_err("binary is not on PATH");
        assert!(
            matches!(err, HarnessError::CommandMissing { .. }),
            "expected CommandMissing, got: {err:?}"
        );
    }

    #[test]
    fn run_command_nonzero_exit_carries_stderr() {
        let err = run_command(
            "sh",
            &["-c".to_owned(), "echo 'bad sql' >&2; exit 3".to_owned()],
            None,
        )
        .expect_err("exit 3 should fail");
        match err {
            HarnessError::CommandFailed {
                status,
                stderr_suffix,
                ..
            } => {
                assert_eq!(status, 3);
                assert!(stderr_suffix.contains("bad sql"), "{stderr_suffix}");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn cwd_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = run_command("pwd", &[], Some(dir.path())).expect("pwd should succeed");
        let canonical = dir.path().canonicalize().expect("canonicalize");
        let stdout = output.stdout_text();
        assert!(
            stdout.contains(canonical.to_str().unwrap())
                || stdout.contains(dir.path().to_str().unwrap()),
            "expected cwd in stdout, got: {stdout}"
        );
    }

    #[test]
    fn fast_command_beats_its_timeout() {
        let output = run_command_with_timeout(
            "echo",
            &["fast".to_owned()],
            None,
            Some(Duration::from_secs(5)),
        )
        .expect("echo should finish within timeout");
        assert_eq!(output.stdout_text(), "fast\n");
    }

    #[test]
    fn hung_command_is_killed_at_its_timeout() {
        let err = run_command_with_timeout(
            "sleep",
            &["60".to_owned()],
            None,
            Some(Duration::from_millis(100)),
        )
        .expect_err("should time out");
        assert!(
            matches!(err, HarnessError::CommandTimedOut { timeout_ms: 100, .. }),
            "expected timeout, got: {err:?}"
        );
    }

    #[test]
    fn late_stderr_is_not_lost_when_a_timeout_is_set() {
        let script = "head -c 1048576 /dev/zero | tr '\\0' x >&2; exit 2".to_owned();
        let err = run_command_with_timeout(
            "sh",
            &["-c".to_owned(), script],
            None,
            Some(Duration::from_secs(30)),
        )
        .expect_err("exit 2 should fail");
        match err {
            HarnessError::CommandFailed {
                status,
                stderr_suffix,
                ..
            } => {
                assert_eq!(status, 2);
                let xs = stderr_suffix.bytes().filter(|b| *b == b'x').count();
                assert_eq!(xs, 1_048_576, "stderr truncated");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn large_stdout_is_fully_collected_under_timeout() {
        let output = run_command_with_timeout(
            "sh",
            &["-c".to_owned(), "head -c 2097152 /dev/zero".to_owned()],
            None,
            Some(Duration::from_secs(30)),
        )
        .expect("head should succeed");
        assert_eq!(output.stdout.len(), 2_097_152);
    }

    #[test]
    fn successful_output_keeps_status() {
        let output = validate_command_output("cmd", fake_output(0, "")).expect("ok");
        assert_eq!(output.status, 0);
    }

    #[test]
    fn failure_names_command_and_status() {
        let err = validate_command_output(
            "java -cp runsql.jar runsql.RunSqlMain",
            fake_output(42, "ORA-01017"),
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("42"), "{text}");
        assert!(text.contains("runsql.RunSqlMain"), "{text}");
        assert!(text.contains("ORA-01017"), "{text}");
    }

    #[test]
    fn signal_death_reports_status_minus_one() {
        let output = Output {
            status: ExitStatus::from_raw(9),
            stdout: Vec::new(),
            stderr: b"killed".to_vec(),
        };
        let err = validate_command_output("docker run", output).unwrap_err();
        assert!(
            matches!(err, HarnessError::CommandFailed { status: -1, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn render_command_joins_arguments() {
        assert_eq!(render_command("docker", &[]), "docker");
        assert_eq!(
            render_command("docker", &["kill".to_owned(), "runsql-oracle".to_owned()]),
            "docker kill runsql-oracle"
        );
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(
            saturating_duration_ms(Duration::from_secs(u64::MAX)),
            u64::MAX
        );
        assert_eq!(saturating_duration_ms(Duration::from_millis(1234)), 1234);
    }
}
