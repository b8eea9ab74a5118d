//! Process backend: one JSON request line on stdin, response on stdout.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tool_primitives::ResourceLimits;
use tracing::debug;

use crate::backend::{ProcessSpec, parse_response};
use crate::error::DispatchError;

/// Environment variable carrying the advisory memory ceiling.
pub const MAX_MEMORY_ENV: &str = "TOOL_MAX_MEMORY_MB";
/// Environment variable carrying the execution time limit.
pub const MAX_SECONDS_ENV: &str = "TOOL_MAX_EXECUTION_SECS";

const STDERR_TAIL: usize = 512;

async fn read_bounded<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, DispatchError>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buffer = Vec::new();
    let ceiling = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader.take(ceiling).read_to_end(&mut buffer).await?;
    if buffer.len() > limit {
        return Err(DispatchError::OutputTooLarge { limit });
    }
    Ok(buffer)
}

fn tail(text: &str, max: usize) -> &str {
    let text = text.trim();
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Runs the process once for `payload`.
///
/// The child is spawned with `kill_on_drop`, so dropping the returned future
/// (deadline, cancellation) terminates it.
pub(crate) async fn run(
    spec: &ProcessSpec,
    payload: &Value,
    limits: &ResourceLimits,
    max_output: usize,
) -> Result<Value, DispatchError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }
    if let Some(memory) = limits.max_memory_mb {
        command.env(MAX_MEMORY_ENV, memory.to_string());
    }
    if let Some(seconds) = limits.max_execution_secs {
        command.env(MAX_SECONDS_ENV, seconds.to_string());
    }

    let mut child = command.spawn().map_err(|source| DispatchError::Spawn {
        command: spec.program.clone(),
        source,
    })?;
    debug!(program = %spec.program, pid = child.id(), "tool process spawned");

    if let Some(mut stdin) = child.stdin.take() {
        let mut line = serde_json::to_vec(payload)
            .map_err(|err| DispatchError::Protocol(err.to_string()))?;
        line.push(b'\n');
        // A child that exits without reading its input is not an error here.
        if let Err(err) = stdin.write_all(&line).await {
            debug!(%err, "tool process closed stdin early");
        }
    }

    let (stdout, stderr) = tokio::try_join!(
        read_bounded(child.stdout.take(), max_output),
        read_bounded(child.stderr.take(), max_output),
    )?;
    let status = child.wait().await?;

    let stdout = String::from_utf8_lossy(&stdout);
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(DispatchError::Exit {
            status: status.to_string(),
            stderr: tail(&stderr, STDERR_TAIL).to_owned(),
        });
    }

    let last = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| DispatchError::Protocol("process produced no output".to_owned()))?;
    parse_response(last)
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn reads_envelope_from_last_line() {
        let spec = sh(r#"read line; echo "log line"; echo '{"success": true, "output": {"ok": 1}}'"#);
        let output = run(&spec, &json!({"input": {}}), &ResourceLimits::default(), 4096)
            .await
            .unwrap();
        assert_eq!(output, json!({"ok": 1}));
    }

    #[tokio::test]
    async fn echoes_request_line() {
        let spec = sh("read line; echo \"$line\"");
        let payload = json!({"capability": "get_current", "input": {"location": "Istanbul"}});
        let output = run(&spec, &payload, &ResourceLimits::default(), 4096).await.unwrap();
        assert_eq!(output, payload);
    }

    #[tokio::test]
    async fn exports_limits_and_env() {
        let mut spec = sh(r#"echo "{\"memory\": \"$TOOL_MAX_MEMORY_MB\", \"key\": \"$API_KEY\"}""#);
        spec.env.insert("API_KEY".into(), "secret".into());
        let limits = ResourceLimits {
            max_memory_mb: Some(128),
            ..ResourceLimits::default()
        };
        let output = run(&spec, &json!({}), &limits, 4096).await.unwrap();
        assert_eq!(output, json!({"memory": "128", "key": "secret"}));
    }

    #[tokio::test]
    async fn failures_surface() {
        let exit = run(&sh("echo boom >&2; exit 3"), &json!({}), &ResourceLimits::default(), 4096).await;
        assert!(matches!(exit, Err(DispatchError::Exit { stderr, .. }) if stderr == "boom"));

        let remote = run(
            &sh(r#"echo '{"success": false, "error": "no such city"}'"#),
            &json!({}),
            &ResourceLimits::default(),
            4096,
        )
        .await;
        assert!(matches!(remote, Err(DispatchError::Remote(_))));

        let silent = run(&sh("true"), &json!({}), &ResourceLimits::default(), 4096).await;
        assert!(matches!(silent, Err(DispatchError::Protocol(_))));

        let missing = run(
            &ProcessSpec {
                program: "/definitely/not/a/binary".into(),
                args: Vec::new(),
                working_dir: None,
                env: BTreeMap::new(),
            },
            &json!({}),
            &ResourceLimits::default(),
            4096,
        )
        .await;
        assert!(matches!(missing, Err(DispatchError::Spawn { .. })));
    }

    #[tokio::test]
    async fn output_is_bounded() {
        let spec = sh("head -c 10000 /dev/zero | tr '\\0' 'a'");
        let result = run(&spec, &json!({}), &ResourceLimits::default(), 1024).await;
        assert!(matches!(result, Err(DispatchError::OutputTooLarge { limit: 1024 })));
    }

    #[tokio::test]
    async fn dropping_the_future_stops_the_child() {
        let spec = sh("sleep 30; echo late");
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            run(&spec, &json!({}), &ResourceLimits::default(), 4096),
        )
        .await;
        assert!(result.is_err());
    }
}
