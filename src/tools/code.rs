//! Python code execution in a child process

use super::{InputSchema, Tool};
use crate::error::AdvisorError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

const MAX_OUTPUT: usize = 4000;

pub struct PythonReplTool {
    interpreter: String,
    timeout: Duration,
}

impl PythonReplTool {
    pub fn new(interpreter: String, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl Tool for PythonReplTool {
    fn name(&self) -> &'static str {
        "python_repl"
    }

    fn description(&self) -> &'static str {
        "Executes Python code and returns what it prints. \
         Use print(...) to see a value."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Text { required: true }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let code = strip_fences(input.as_text().unwrap_or_default());

        debug!(interpreter = %self.interpreter, bytes = code.len(), "Running code");

        let mut child = Command::new(&self.interpreter)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AdvisorError::Tool(format!("Failed to start {}: {}", self.interpreter, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
            stdin.flush().await?;
            drop(stdin);
        }

        let (stdout_pipe, stderr_pipe) = (child.stdout.take(), child.stderr.take());
        let run = async {
            // Each pipe is read only up to the cap and then closed, so a
            // flooding child gets EPIPE instead of filling memory.
            let (stdout, stderr) = tokio::join!(read_capped(stdout_pipe), read_capped(stderr_pipe));
            let (stdout, stderr) = (stdout?, stderr?);

            let flooded = stdout.len() > MAX_OUTPUT || stderr.len() > MAX_OUTPUT;
            if flooded {
                warn!("Code output exceeded {} bytes, stopping it", MAX_OUTPUT);
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Child already exited");
                }
            }

            let status = child.wait().await?;
            Ok::<_, AdvisorError>((status, stdout, stderr, flooded))
        };

        let (status, stdout, stderr, flooded) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                AdvisorError::Timeout(format!(
                    "code did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);

        let text = if flooded {
            format!("{}{}", stdout, stderr)
        } else if status.success() {
            if stdout.trim().is_empty() {
                "Code ran successfully with no output.".to_string()
            } else {
                stdout.trim_end().to_string()
            }
        } else {
            format!(
                "Exited with {}\n{}{}",
                status,
                stdout,
                stderr.trim_end()
            )
        };

        Ok(ToolOutput::text(truncate(text)))
    }
}

async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.take(MAX_OUTPUT as u64 + 1).read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Drop a surrounding markdown code fence, if any.
fn strip_fences(code: &str) -> &str {
    let code = code.trim();
    let Some(rest) = code.strip_prefix("```") else {
        return code;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Language tag on the opening fence line
    match rest.find('\n') {
        Some(i) if !rest[..i].trim().contains(' ') => rest[i + 1..].trim(),
        _ => rest.trim(),
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_OUTPUT {
        let mut cut = MAX_OUTPUT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("... [output truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    // `sh` reads its program from stdin just like `python3`, and is always there.
    fn shell(timeout_secs: u64) -> PythonReplTool {
        PythonReplTool::new("sh".to_string(), Duration::from_secs(timeout_secs))
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_fences("```\nprint(2)\n```"), "print(2)");
        assert_eq!(strip_fences("  print(3) "), "print(3)");
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let output = shell(5)
            .execute(&ToolInput::Text("echo 42".to_string()))
            .await
            .unwrap();
        assert_eq!(output.text, "42");
    }

    #[tokio::test]
    async fn test_reports_failure() {
        let output = shell(5)
            .execute(&ToolInput::Text("echo oops >&2; exit 3".to_string()))
            .await
            .unwrap();
        assert!(output.text.starts_with("Exited with"));
        assert!(output.text.contains('3'));
        assert!(output.text.contains("oops"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = shell(1)
            .execute(&ToolInput::Text("sleep 5".to_string()))
            .await;
        assert!(matches!(result, Err(AdvisorError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_output_flood_is_cut_short() {
        let output = shell(5)
            .execute(&ToolInput::Text(
                "while :; do echo xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; done".to_string(),
            ))
            .await
            .unwrap();
        assert!(output.text.ends_with("... [output truncated]"));
        assert!(output.text.len() <= MAX_OUTPUT + "... [output truncated]".len());
        assert!(output.text.starts_with("xxxx"));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let tool = PythonReplTool::new(
            "definitely-not-an-interpreter".to_string(),
            Duration::from_secs(1),
        );
        let result = tool.execute(&ToolInput::Text("1".to_string())).await;
        assert!(matches!(result, Err(AdvisorError::Tool(_))));
    }
}
