use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info_span, warn};
use wait_timeout::ChildExt;

use crate::error::ConversionError;
use crate::sanitize;

use super::{ToolInvocation, ToolOutcome, ToolPrograms, ToolReport, ToolRunner};

/// Upper bound on captured stdout/stderr kept for logging.
const MAX_CAPTURE_BYTES: u64 = 16 * 1024;

/// Runs tools as child processes with a hard execution timeout.
///
/// Output streams go to anonymous temp files rather than pipes so a chatty
/// tool can never block on a full pipe buffer while we wait for its exit.
/// On Unix each tool leads its own process group, and the whole group is
/// killed once the call ends, so helpers forked by wrapper scripts such as
/// `soffice` cannot outlive the timeout.
pub struct ProcessRunner {
    programs: ToolPrograms,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(programs: ToolPrograms, timeout: Duration) -> Self {
        Self { programs, timeout }
    }
}

impl ToolRunner for ProcessRunner {
    fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolReport, ConversionError> {
        let program = self.programs.program(invocation.tool);
        let _span = info_span!(
            "tool.invoke",
            tool = %invocation.tool,
            output = %sanitize::redact_path(&invocation.expected_output),
        )
        .entered();

        let stdout_sink = capture_file(invocation)?;
        let stderr_sink = capture_file(invocation)?;

        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(clone_sink(&stdout_sink, invocation)?))
            .stderr(Stdio::from(clone_sink(&stderr_sink, invocation)?));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| {
            ConversionError::tool(invocation.tool, format!("failed to start: {}", e.kind()))
        })?;

        let started = Instant::now();
        let waited = child.wait_timeout(self.timeout);
        // Descendants left behind by the tool go down with it.
        kill_process_group(&child);

        let outcome = match waited {
            Ok(Some(status)) => ToolOutcome::inspect(status.code(), &invocation.expected_output),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                ToolOutcome::TimedOut(self.timeout)
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConversionError::tool(
                    invocation.tool,
                    format!("failed to wait for process: {}", e.kind()),
                ));
            }
        };

        let stdout = read_capture(stdout_sink);
        let stderr = read_capture(stderr_sink);

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_len = stdout.len(),
            "Tool finished"
        );

        if !matches!(outcome, ToolOutcome::Produced { .. }) {
            warn!(outcome = ?outcome, stderr = %stderr.trim(), "Tool did not produce output");
        }

        Ok(ToolReport {
            tool: invocation.tool,
            outcome,
            stderr,
        })
    }
}

/// Sends SIGKILL to the process group led by `child`. Once the leader has
/// been reaped the group may already be empty, which is fine.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Ok(pgid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn capture_file(invocation: &ToolInvocation) -> Result<File, ConversionError> {
    tempfile::tempfile().map_err(|e| {
        ConversionError::tool(
            invocation.tool,
            format!("failed to create capture file: {}", e.kind()),
        )
    })
}

fn clone_sink(file: &File, invocation: &ToolInvocation) -> Result<File, ConversionError> {
    file.try_clone().map_err(|e| {
        ConversionError::tool(
            invocation.tool,
            format!("failed to clone capture file: {}", e.kind()),
        )
    })
}

fn read_capture(mut file: File) -> String {
    let mut bytes = Vec::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.take(MAX_CAPTURE_BYTES).read_to_end(&mut bytes);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::ToolId;
    use tempfile::TempDir;

    fn runner_with(program: &str, timeout: Duration) -> ProcessRunner {
        let programs = ToolPrograms {
            office: program.to_string(),
            pdf_renderer: program.to_string(),
            slides: program.to_string(),
        };
        ProcessRunner::new(programs, timeout)
    }

    #[test]
    fn test_produced_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let runner = runner_with("sh", Duration::from_secs(10));

        let inv = ToolInvocation::new(ToolId::Office, &out)
            .arg("-c")
            .arg("printf '%s' \"$1\" > \"$2\"")
            .arg("sh")
            .arg("hello")
            .arg(out.as_os_str());

        let report = runner.invoke(&inv).unwrap();
        assert_eq!(
            report.outcome,
            ToolOutcome::Produced {
                path: out.clone(),
                size: 5
            }
        );
    }

    #[test]
    fn test_nonzero_exit_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let runner = runner_with("sh", Duration::from_secs(10));

        let inv = ToolInvocation::new(ToolId::Office, &out)
            .arg("-c")
            .arg("echo boom >&2; exit 3");

        let report = runner.invoke(&inv).unwrap();
        assert_eq!(report.outcome, ToolOutcome::NonZeroExit(Some(3)));
        assert!(report.stderr.contains("boom"));
        assert!(report.into_output().is_err());
    }

    #[test]
    fn test_success_without_output_is_missing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let runner = runner_with("sh", Duration::from_secs(10));

        let inv = ToolInvocation::new(ToolId::PdfRenderer, &out)
            .arg("-c")
            .arg("exit 0");

        let report = runner.invoke(&inv).unwrap();
        assert_eq!(report.outcome, ToolOutcome::MissingOutput);
    }

    #[test]
    fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let runner = runner_with("sleep", Duration::from_millis(200));

        let inv = ToolInvocation::new(ToolId::Slides, &out).arg("30");

        let started = Instant::now();
        let report = runner.invoke(&inv).unwrap();
        assert_eq!(
            report.outcome,
            ToolOutcome::TimedOut(Duration::from_millis(200))
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    fn is_gone(pid: &str) -> bool {
        // A killed process reparented to init may linger briefly as a zombie.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_descendants() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let pid_file = dir.path().join("grandchild.pid");
        let runner = runner_with("sh", Duration::from_millis(300));

        // The shell forks a long-running helper and waits on it, the way
        // office wrapper scripts do.
        let inv = ToolInvocation::new(ToolId::Office, &out)
            .arg("-c")
            .arg("sleep 30 & echo $! > \"$1\"; wait")
            .arg("sh")
            .arg(pid_file.as_os_str());

        let report = runner.invoke(&inv).unwrap();
        assert_eq!(report.outcome, ToolOutcome::TimedOut(Duration::from_millis(300)));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_gone(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(is_gone(pid), "helper process {} survived the timeout", pid);
    }

    #[test]
    fn test_missing_program_is_external_tool_error() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let runner = runner_with("docshift-no-such-program", Duration::from_secs(1));

        let inv = ToolInvocation::new(ToolId::Office, &out);
        match runner.invoke(&inv) {
            Err(ConversionError::ExternalTool { tool, .. }) => assert_eq!(tool, ToolId::Office),
            other => panic!("Expected ExternalTool error, got {:?}", other),
        }
    }

    #[test]
    fn test_arguments_are_not_shell_interpreted() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let marker = dir.path().join("injected");
        let runner = runner_with("sh", Duration::from_secs(10));

        // $1 is passed through verbatim; the `; touch` never runs.
        let hostile = format!("x; touch {}", marker.display());
        let inv = ToolInvocation::new(ToolId::Office, &out)
            .arg("-c")
            .arg("printf '%s' \"$1\" > \"$2\"")
            .arg("sh")
            .arg(&hostile)
            .arg(out.as_os_str());

        runner.invoke(&inv).unwrap();
        assert!(!marker.exists());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), hostile);
    }
}
