//! Artifact generation seam
//!
//! Thumbnails, blurhashes and codec work live outside this crate. The
//! orchestrator hands every fetched object to an [`ArtifactGenerator`] and
//! stores whatever it returns verbatim in the manifest.
//!
//! A generator that a worker process can rebuild reports a
//! [`GeneratorSpec`]; cluster mode then runs it in the child next to the
//! rest of the derive step. Generators without one run in the parent and
//! their output is shipped to the child with the request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use core_async::process::{Command, Stdio};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SyncError};

/// What a generator produced for one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactOutput {
    /// Opaque name → value pairs (thumbnail key, blurhash, ...).
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    /// EXIF block read while decoding, as exiftool-style JSON.
    #[serde(default)]
    pub exif: Option<serde_json::Value>,
}

#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// Derive artifacts for `key` from its bytes.
    ///
    /// # Errors
    ///
    /// Report decode failures as [`SyncError::Artifact`](crate::SyncError::Artifact).
    /// A failure fails this object only; the run continues.
    async fn generate(&self, key: &str, data: &Bytes) -> Result<ArtifactOutput>;

    /// Form a worker process can rebuild this generator from.
    fn worker_spec(&self) -> Option<GeneratorSpec> {
        None
    }
}

/// Serializable description of a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratorSpec {
    Noop,
    Command(ArtifactCommand),
}

impl GeneratorSpec {
    pub fn build(&self) -> Arc<dyn ArtifactGenerator> {
        match self {
            GeneratorSpec::Noop => Arc::new(NoopArtifactGenerator),
            GeneratorSpec::Command(command) => {
                Arc::new(CommandArtifactGenerator::new(command.clone()))
            }
        }
    }
}

/// Generator that produces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArtifactGenerator;

#[async_trait]
impl ArtifactGenerator for NoopArtifactGenerator {
    async fn generate(&self, _key: &str, _data: &Bytes) -> Result<ArtifactOutput> {
        Ok(ArtifactOutput::default())
    }

    fn worker_spec(&self) -> Option<GeneratorSpec> {
        Some(GeneratorSpec::Noop)
    }
}

/// External program invoked as `program [args...] <key> <payload-path>`.
///
/// It must print one [`ArtifactOutput`] as JSON on stdout and exit 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ArtifactCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Runs an [`ArtifactCommand`] per object.
#[derive(Debug, Clone)]
pub struct CommandArtifactGenerator {
    command: ArtifactCommand,
}

impl CommandArtifactGenerator {
    pub fn new(command: ArtifactCommand) -> Self {
        Self { command }
    }

    /// Run the command against bytes already on disk.
    pub async fn generate_from_path(&self, key: &str, path: &Path) -> Result<ArtifactOutput> {
        let failed = |message: String| SyncError::Artifact {
            key: key.to_string(),
            message,
        };

        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(key)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                failed(format!(
                    "failed to start {}: {}",
                    self.command.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.command.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| failed(format!("unreadable generator output: {}", e)))
    }
}

#[async_trait]
impl ArtifactGenerator for CommandArtifactGenerator {
    async fn generate(&self, key: &str, data: &Bytes) -> Result<ArtifactOutput> {
        let payload = tempfile::NamedTempFile::new()?;
        core_async::fs::write(payload.path(), data).await?;
        self.generate_from_path(key, payload.path()).await
    }

    fn worker_spec(&self) -> Option<GeneratorSpec> {
        Some(GeneratorSpec::Command(self.command.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumbnail_command() -> ArtifactCommand {
        ArtifactCommand::new("sh")
            .arg("-c")
            .arg(r#"printf '{"artifacts":{"thumbnail":"thumbs/%s"},"exif":{"Keywords":"Harbor"}}' "$1""#)
            .arg("generate")
    }

    #[core_async::test]
    async fn test_command_generator_reads_json_from_stdout() {
        let generator = CommandArtifactGenerator::new(thumbnail_command());
        let output = generator
            .generate("2024/boat.jpg", &Bytes::from_static(b"jpeg"))
            .await
            .unwrap();

        assert_eq!(
            output.artifacts.get("thumbnail").map(String::as_str),
            Some("thumbs/2024/boat.jpg")
        );
        assert_eq!(output.exif, Some(serde_json::json!({"Keywords": "Harbor"})));
    }

    #[core_async::test]
    async fn test_command_generator_sees_payload_bytes() {
        let command = ArtifactCommand::new("sh")
            .arg("-c")
            .arg(r#"printf '{"artifacts":{"body":"%s"}}' "$(cat "$2")""#)
            .arg("generate");
        let output = CommandArtifactGenerator::new(command)
            .generate("a.jpg", &Bytes::from_static(b"pixels"))
            .await
            .unwrap();
        assert_eq!(output.artifacts.get("body").map(String::as_str), Some("pixels"));
    }

    #[core_async::test]
    async fn test_failing_command_is_an_artifact_error() {
        let command = ArtifactCommand::new("sh").arg("-c").arg("echo broken >&2; exit 3");
        let result = CommandArtifactGenerator::new(command)
            .generate("a.jpg", &Bytes::from_static(b"x"))
            .await;
        match result {
            Err(SyncError::Artifact { key, message }) => {
                assert_eq!(key, "a.jpg");
                assert!(message.contains("broken"));
            }
            other => panic!("expected an artifact error, got {:?}", other),
        }
    }

    #[core_async::test]
    async fn test_non_json_output_is_an_artifact_error() {
        let command = ArtifactCommand::new("sh").arg("-c").arg("echo hello");
        let result = CommandArtifactGenerator::new(command)
            .generate("a.jpg", &Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(SyncError::Artifact { .. })));
    }

    #[test]
    fn test_worker_spec_rebuilds_the_generator() {
        let spec = CommandArtifactGenerator::new(thumbnail_command())
            .worker_spec()
            .unwrap();
        let encoded = serde_json::to_value(&spec).unwrap();
        assert_eq!(encoded["kind"], "command");
        let decoded: GeneratorSpec = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.build().worker_spec(), Some(spec));
        assert_eq!(NoopArtifactGenerator.worker_spec(), Some(GeneratorSpec::Noop));
    }
}
