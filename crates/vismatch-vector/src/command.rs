//! Subprocess embedding provider.
//!
//! Runs an external model program once per image:
//!
//! ```text
//! <command> [script] --path <file>
//! <command> [script] --url <url>
//! ```
//!
//! The program must print either a JSON array of floats (the embedding) or a
//! JSON object `{"error": ..., "detail": ...}` on stdout. Anything else it
//! prints before the final JSON value (progress bars, warnings) is ignored.
//! Uploaded bytes are written to a temporary file that is removed when the
//! call finishes.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use vismatch_core::{Error, Result};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, QueryInput};

#[derive(Deserialize)]
struct ProviderFailure {
    error: String,
    #[serde(default)]
    detail: Option<String>,
}

/// Embedding provider that shells out to a model process.
#[derive(Debug, Clone)]
pub struct CommandEmbeddingProvider {
    program: String,
    script: Option<PathBuf>,
    dimension: usize,
}

impl CommandEmbeddingProvider {
    /// Create a provider running `program` directly.
    pub fn new(program: impl Into<String>, dimension: usize) -> Self {
        Self {
            program: program.into(),
            script: None,
            dimension,
        }
    }

    /// Pass `script` as the program's first argument.
    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Build from configuration.
    pub fn from_config(config: &EmbeddingConfig, dimension: usize) -> Self {
        let provider = Self::new(&config.command, dimension);
        match &config.script {
            Some(script) => provider.with_script(script),
            None => provider,
        }
    }

    async fn run(&self, args: Vec<OsString>) -> Result<String> {
        let mut cmd = tokio::process::Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            Error::embed_transient(format!("failed to start '{}': {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(Error::embed_transient(if stderr.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                stderr.to_string()
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl EmbeddingProvider for CommandEmbeddingProvider {
    async fn embed(&self, input: &QueryInput) -> Result<Vec<f32>> {
        let started = Instant::now();

        // Held until the process exits.
        let mut scratch = None;
        let args: Vec<OsString> = match input {
            QueryInput::FileBytes(bytes) => {
                let file = tempfile::NamedTempFile::new()?;
                tokio::fs::write(file.path(), bytes)
                    .await
                    .map_err(|e| Error::io_with_path(e, file.path()))?;
                let args = vec!["--path".into(), file.path().as_os_str().to_owned()];
                scratch = Some(file);
                args
            }
            QueryInput::FilePath(path) => vec!["--path".into(), path.as_os_str().to_owned()],
            QueryInput::ImageUrl(url) => vec!["--url".into(), url.into()],
        };

        let stdout = self.run(args).await;
        drop(scratch);
        let vector = parse_embed_output(&stdout?)?;

        if vector.len() != self.dimension {
            return Err(Error::dimension(self.dimension, vector.len()));
        }
        debug!(
            "Embedded {} input via '{}' in {:?}",
            input.kind(),
            self.program,
            started.elapsed()
        );
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Extract the embedding (or the reported failure) from provider stdout.
///
/// The last `[...]` span is tried as the vector first; if that does not
/// parse, the last `{...}` span is read as a failure report.
pub fn parse_embed_output(stdout: &str) -> Result<Vec<f32>> {
    if let Some(span) = last_span(stdout, '[', ']') {
        if let Ok(vector) = serde_json::from_str::<Vec<f32>>(span) {
            return Ok(vector);
        }
    }

    if let Some(span) = last_span(stdout, '{', '}') {
        if let Ok(failure) = serde_json::from_str::<ProviderFailure>(span) {
            return Err(Error::embed(match failure.detail {
                Some(detail) if !detail.is_empty() => format!("{}: {detail}", failure.error),
                _ => failure.error,
            }));
        }
    }

    Err(Error::embed_transient(format!(
        "no embedding found in provider output: {}",
        stdout.trim()
    )))
}

fn last_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.rfind(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| text[start..=end].trim())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // parse_embed_output tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_parse_plain_array() {
        let v = parse_embed_output("[0.25, -0.5, 1.0]\n").unwrap();
        assert_eq!(v, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_parse_ignores_leading_noise() {
        let v = parse_embed_output("Downloading weights [####]\n[1.0, 0.0]\n").unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
    }

    #[test]
    fn test_parse_error_object() {
        let err = parse_embed_output(
            r#"{"error": "image_load_failed", "detail": "cannot identify image file"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Embed { transient: false, .. }));
        assert!(err.to_string().contains("image_load_failed: cannot identify image file"));
    }

    #[test]
    fn test_parse_error_object_with_brackets_in_detail() {
        let err = parse_embed_output(
            r#"{"error": "image_load_failed", "detail": "[Errno 2] No such file"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[Errno 2]"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_error_without_detail() {
        let err = parse_embed_output(r#"{"error": "embed_failed"}"#).unwrap_err();
        assert!(err.to_string().ends_with("embed_failed"));
    }

    #[test]
    fn test_parse_no_json() {
        let err = parse_embed_output("Segmentation fault").unwrap_err();
        assert!(err.is_retryable());
    }

    // ------------------------------------------------------------------------
    // Subprocess tests
    // ------------------------------------------------------------------------

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("embed.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[cfg(unix)]
    const ROUTING_SCRIPT: &str = r#"
case "$1" in
  --url) echo '[0.0, 1.0, 0.0, 0.0]' ;;
  --path) [ -f "$2" ] || exit 3; echo 'warming up [ok]'; echo '[1.0, 0.0, 0.0, 0.0]' ;;
  *) exit 4 ;;
esac
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_url_input() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            CommandEmbeddingProvider::new("/bin/sh", 4).with_script(script(&dir, ROUTING_SCRIPT));
        let v = provider
            .embed(&QueryInput::ImageUrl("https://example.com/a.jpg".into()))
            .await
            .unwrap();
        assert_eq!(v, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_bytes_input_uses_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            CommandEmbeddingProvider::new("/bin/sh", 4).with_script(script(&dir, ROUTING_SCRIPT));
        let v = provider
            .embed(&QueryInput::FileBytes(b"\xff\xd8\xff".to_vec()))
            .await
            .unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_path_input() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("i2.jpg");
        std::fs::write(&image, b"jpeg").unwrap();
        let provider =
            CommandEmbeddingProvider::new("/bin/sh", 4).with_script(script(&dir, ROUTING_SCRIPT));
        let v = provider.embed(&QueryInput::FilePath(image)).await.unwrap();
        assert_eq!(v.len(), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_nonzero_exit_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CommandEmbeddingProvider::new("/bin/sh", 4)
            .with_script(script(&dir, "echo 'model crashed' >&2\nexit 2\n"));
        let err = provider
            .embed(&QueryInput::ImageUrl("u".into()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("model crashed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_reported_error_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CommandEmbeddingProvider::new("/bin/sh", 4).with_script(script(
            &dir,
            "echo '{\"error\": \"image_load_failed\", \"detail\": \"404\"}'\n",
        ));
        let err = provider
            .embed(&QueryInput::ImageUrl("u".into()))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CommandEmbeddingProvider::new("/bin/sh", 4)
            .with_script(script(&dir, "echo '[1.0, 0.0]'\n"));
        let err = provider
            .embed(&QueryInput::ImageUrl("u".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Dimension {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_command_missing_program() {
        let provider = CommandEmbeddingProvider::new("/nonexistent/vismatch-embed", 4);
        let err = provider
            .embed(&QueryInput::ImageUrl("u".into()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_config() {
        let config = EmbeddingConfig {
            command: "python3".into(),
            script: Some("/opt/embed.py".into()),
            ..Default::default()
        };
        let provider = CommandEmbeddingProvider::from_config(&config, 2048);
        assert_eq!(provider.name(), "python3");
        assert_eq!(provider.dimension(), 2048);
        assert_eq!(provider.script, Some(PathBuf::from("/opt/embed.py")));
    }
}
