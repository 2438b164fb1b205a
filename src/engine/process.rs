//! External process launching.
//!
//! stdout is streamed line by line to the event channel so the operator can
//! follow the solver; echoing stops at the MPI termination sentinel and the
//! remainder is drained unread so the child never writes into a closed pipe.
//! stderr is collected in full on a separate task and returned for inspection.
//! The exit code is recorded but never interpreted here.

use crate::error::PipelineError;
use crate::model::{ProcessResult, RunEvent};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Printed by the MPI launcher once the job is over; nothing after it is useful.
pub const MPI_TERMINATED_SENTINEL: &str = "MPI terminated with Status =";

/// Seam between the pipeline and the operating system.
pub trait ProcessLauncher {
    fn launch(
        &self,
        argv: &[String],
        cwd: &Path,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> impl Future<Output = Result<ProcessResult, PipelineError>>;
}

/// Launches real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    async fn launch(
        &self,
        argv: &[String],
        cwd: &Path,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> Result<ProcessResult, PipelineError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PipelineError::NotImplemented("launching an empty command".into()))?;

        debug!(program = %program, ?args, cwd = %cwd.display(), "spawning process");
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                while let Some(line) = read_line_lossy(&mut reader).await? {
                    lines.push(line);
                }
                Ok::<_, std::io::Error>(lines)
            })
        });

        let mut stdout_lines = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            while let Some(line) = read_line_lossy(&mut reader)
                .await
                .map_err(|e| PipelineError::io(format!("reading {program} stdout"), e))?
            {
                if line.contains(MPI_TERMINATED_SENTINEL) {
                    debug!(program = %program, "MPI termination sentinel seen");
                    break;
                }
                let _ = events.send(RunEvent::ProcessOutput { line: line.clone() });
                stdout_lines.push(line);
            }
            tokio::io::copy(&mut reader, &mut tokio::io::sink())
                .await
                .map_err(|e| PipelineError::io(format!("draining {program} stdout"), e))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PipelineError::io(format!("waiting for {program}"), e))?;

        let stderr_lines = match stderr_task {
            Some(task) => task
                .await
                .map_err(|e| PipelineError::io(format!("collecting {program} stderr"), std::io::Error::other(e)))?
                .map_err(|e| PipelineError::io(format!("reading {program} stderr"), e))?,
            None => Vec::new(),
        };

        debug!(
            program = %program,
            exit_code = ?status.code(),
            stderr_lines = stderr_lines.len(),
            "process exited"
        );
        Ok(ProcessResult {
            exit_code: status.code(),
            stdout: stdout_lines,
            stderr: stderr_lines,
        })
    }
}

/// Read one line without the trailing newline, replacing invalid UTF-8.
async fn read_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
