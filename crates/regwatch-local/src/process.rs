//! Amendment processing via a configured external command.
//!
//! The downstream ingestion tooling that splits an amendment into controls
//! lives outside this crate, so the processor is a bounded shellout: the
//! request goes to the child as JSON on stdin, the outcome comes back as
//! JSON on stdout. Timeouts and an output cap keep a misbehaving tool from
//! hanging or flooding the check.

use async_trait::async_trait;
use regwatch_core::{AmendmentProcessor, Error, ProcessRequest, ProcessingOutcome, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const MAX_STDOUT_BYTES: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct CommandProcessor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProcessor {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AmendmentProcessor for CommandProcessor {
    async fn process(&self, req: &ProcessRequest) -> Result<ProcessingOutcome> {
        let payload = serde_json::to_vec(req)
            .map_err(|e| Error::Processing(format!("encode request: {e}")))?;
        let program = self.program.clone();
        let args = self.args.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || run_bounded(&program, &args, &payload, timeout))
            .await
            .map_err(|e| Error::Processing(format!("processor task: {e}")))?
    }
}

fn run_bounded(
    program: &PathBuf,
    args: &[String],
    stdin_payload: &[u8],
    timeout: Duration,
) -> Result<ProcessingOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Processing("processor command not found".to_string())
            } else {
                Error::Processing(format!("spawn processor: {e}"))
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin
            .write_all(stdin_payload)
            .map_err(|e| Error::Processing(format!("write processor stdin: {e}")))?;
        // Closing stdin signals end-of-request.
    }

    // Drain stdout concurrently with the wait loop. An outcome larger than
    // the OS pipe buffer would otherwise stall the child on write until the
    // timeout kills it.
    let stdout = child.stdout.take();
    let drain = std::thread::spawn(move || {
        let mut out = Vec::new();
        if let Some(s) = stdout {
            use std::io::Read;
            let _ = s.take(MAX_STDOUT_BYTES as u64).read_to_end(&mut out);
        }
        out
    });

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| Error::Processing(format!("wait processor: {e}")))?
        {
            break status;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            let _ = drain.join();
            return Err(Error::Processing("processor timed out".to_string()));
        }
        std::thread::sleep(Duration::from_millis(25));
    };

    let out = drain
        .join()
        .map_err(|_| Error::Processing("read processor stdout".to_string()))?;

    if !status.success() {
        return Err(Error::Processing(format!(
            "processor exited with {}",
            status.code().map_or("signal".to_string(), |c| c.to_string())
        )));
    }

    serde_json::from_slice(&out)
        .map_err(|e| Error::Processing(format!("parse processor output: {e}")))
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn req() -> ProcessRequest {
        ProcessRequest {
            pdf_path: "/tmp/a.pdf".to_string(),
            framework_name: "SOC 2".to_string(),
            framework_id: 7,
            effective_date: "2025-01-01".to_string(),
            output_dir: "/tmp".to_string(),
        }
    }

    #[tokio::test]
    async fn parses_outcome_json_from_stdout() {
        let p = CommandProcessor::new(PathBuf::from("sh")).with_args(vec![
            "-c".to_string(),
            r#"cat > /dev/null; printf '{"success": true, "output_file": "/tmp/summary.json"}'"#
                .to_string(),
        ]);
        let out = p.process(&req()).await.unwrap();
        assert!(out.success);
        assert_eq!(out.output_file.as_deref(), Some("/tmp/summary.json"));
    }

    #[tokio::test]
    async fn child_receives_the_request_on_stdin() {
        // Echo a field from the request back through the outcome error slot.
        let p = CommandProcessor::new(PathBuf::from("sh")).with_args(vec![
            "-c".to_string(),
            r#"name=$(sed -n 's/.*"framework_name":"\([^"]*\)".*/\1/p'); printf '{"success": false, "error": "%s"}' "$name""#
                .to_string(),
        ]);
        let out = p.process(&req()).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("SOC 2"));
    }

    #[tokio::test]
    async fn outcome_larger_than_the_pipe_buffer_is_drained_not_killed() {
        // 200 KB of payload inside the outcome, well past the ~64 KiB OS
        // pipe buffer. The child must finish within a short timeout.
        let p = CommandProcessor::new(PathBuf::from("sh"))
            .with_args(vec![
                "-c".to_string(),
                r#"cat > /dev/null; printf '{"success": false, "error": "'; head -c 200000 /dev/zero | tr '\0' x; printf '"}'"#
                    .to_string(),
            ])
            .with_timeout(Duration::from_secs(5));
        let out = p.process(&req()).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.error.map(|e| e.len()), Some(200_000));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_processing_error() {
        let p = CommandProcessor::new(PathBuf::from("sh"))
            .with_args(vec!["-c".to_string(), "cat > /dev/null; exit 3".to_string()]);
        let err = p.process(&req()).await.unwrap_err();
        assert!(err.to_string().contains("3"));
    }

    #[tokio::test]
    async fn missing_command_is_a_processing_error() {
        let p = CommandProcessor::new(PathBuf::from("definitely-not-a-real-binary-4721"));
        let err = p.process(&req()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn hung_processor_is_killed_at_the_timeout() {
        let p = CommandProcessor::new(PathBuf::from("sh"))
            .with_args(vec!["-c".to_string(), "sleep 30".to_string()])
            .with_timeout(Duration::from_millis(200));
        let err = p.process(&req()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
