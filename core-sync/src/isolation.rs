//! # Process Isolation
//!
//! Cluster mode runs each unit's derive step in a `photo-sync-worker` child
//! process so a crashing codec takes down one unit, not the run.
//!
//! ## Protocol
//!
//! The parent downloads the object, writes the bytes to a temp file and
//! sends one [`WorkerRequest`] as JSON on the child's stdin. The child
//! answers with one [`WorkerResponse`] on stdout and exits. Logs go to
//! stderr.
//!
//! The request names the artifact generator by its [`GeneratorSpec`] so the
//! child runs the same one the parent was configured with. A generator
//! without a spec runs in the parent and its [`ArtifactOutput`] rides along
//! in the request instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::Clock;
use bytes::Bytes;
use core_async::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use core_async::process::{Command, Stdio};
use core_library::AssetManifest;
use core_metadata::{ExtractionOptions, MetadataExtractor};
use core_runtime::logging::TaggedLogger;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::artifacts::{
    ArtifactGenerator, ArtifactOutput, CommandArtifactGenerator, GeneratorSpec,
};
use crate::error::{Result, SyncError};
use crate::processor::manifest_from_output;

/// Binary name of the worker.
pub const WORKER_BINARY: &str = "photo-sync-worker";

/// Environment variable overriding the worker binary path.
pub const WORKER_BINARY_ENV: &str = "PHOTO_SYNC_WORKER_BIN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub key: String,
    /// Temp file holding the object bytes.
    pub payload_path: PathBuf,
    #[serde(default)]
    pub live_photo_key: Option<String>,
    #[serde(default)]
    pub options: ExtractionOptions,
    /// Generator the child rebuilds and runs. `None` runs nothing.
    #[serde(default)]
    pub generator: Option<GeneratorSpec>,
    /// Output the parent already generated; takes precedence over `generator`.
    #[serde(default)]
    pub artifacts: Option<ArtifactOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerResponse {
    Ok { manifest: AssetManifest },
    Error { message: String },
}

/// Worker side: read one request from `input`, answer on `output`.
///
/// A failed derive is reported in the response, not as an `Err`; `Err` means
/// the protocol itself broke.
pub async fn run_worker_stdio<R, W>(
    mut input: R,
    mut output: W,
    clock: Arc<dyn Clock>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    input.read_to_end(&mut raw).await?;
    let request: WorkerRequest = serde_json::from_slice(&raw)?;

    let response = match derive_from_request(&request, clock).await {
        Ok(manifest) => WorkerResponse::Ok { manifest },
        Err(e) => WorkerResponse::Error {
            message: e.to_string(),
        },
    };

    let encoded = serde_json::to_vec(&response)?;
    output.write_all(&encoded).await?;
    output.flush().await?;
    Ok(())
}

async fn derive_from_request(
    request: &WorkerRequest,
    clock: Arc<dyn Clock>,
) -> Result<AssetManifest> {
    let data = Bytes::from(core_async::fs::read(&request.payload_path).await?);
    let output = match (&request.artifacts, &request.generator) {
        (Some(output), _) => output.clone(),
        (None, Some(GeneratorSpec::Command(command))) => {
            CommandArtifactGenerator::new(command.clone())
                .generate_from_path(&request.key, &request.payload_path)
                .await?
        }
        (None, Some(spec)) => spec.build().generate(&request.key, &data).await?,
        (None, None) => ArtifactOutput::default(),
    };

    let extractor = MetadataExtractor::new(clock)
        .with_options(request.options)
        .with_logger(TaggedLogger::component("Worker"));
    manifest_from_output(
        &extractor,
        &request.key,
        &data,
        request.live_photo_key.clone(),
        output,
    )
}

/// Parent side: spawns one worker process per unit.
#[derive(Debug, Clone)]
pub struct ProcessIsolation {
    program: PathBuf,
}

impl ProcessIsolation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `$PHOTO_SYNC_WORKER_BIN`, else `photo-sync-worker` next to the
    /// current executable.
    pub fn locate() -> Result<Self> {
        if let Some(path) = std::env::var_os(WORKER_BINARY_ENV) {
            return Ok(Self::new(path));
        }
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| SyncError::Worker(format!("{} has no parent", exe.display())))?;
        Ok(Self::new(dir.join(WORKER_BINARY)))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Derive a manifest for `key` from `data` in a child process.
    ///
    /// The child is killed if this future is dropped, so wrapping the call
    /// in a timeout bounds the child's lifetime too.
    #[instrument(skip(self, data, options, artifacts, logger), fields(size = data.len()))]
    pub async fn run(
        &self,
        key: &str,
        data: &Bytes,
        live_photo_key: Option<String>,
        options: ExtractionOptions,
        artifacts: &dyn ArtifactGenerator,
        logger: &TaggedLogger,
    ) -> Result<AssetManifest> {
        let (generator, precomputed) = match artifacts.worker_spec() {
            Some(spec) => (Some(spec), None),
            None => (None, Some(artifacts.generate(key, data).await?)),
        };

        let payload = tempfile::NamedTempFile::new()?;
        core_async::fs::write(payload.path(), data).await?;

        let request = WorkerRequest {
            key: key.to_string(),
            payload_path: payload.path().to_path_buf(),
            live_photo_key,
            options,
            generator,
            artifacts: precomputed,
        };

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SyncError::Worker(format!(
                    "Failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SyncError::Worker("Worker stdin unavailable".to_string()))?;
        stdin.write_all(&serde_json::to_vec(&request)?).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.stderr.is_empty() {
            debug!(
                "Worker stderr for {}: {}",
                key,
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }
        if !output.status.success() {
            return Err(SyncError::Worker(format!(
                "Worker exited with {} for {}",
                output.status, key
            )));
        }

        match serde_json::from_slice::<WorkerResponse>(&output.stdout)? {
            WorkerResponse::Ok { manifest } => {
                logger.debug(format_args!("Worker derived {}", key));
                Ok(manifest)
            }
            WorkerResponse::Error { message } => Err(SyncError::Worker(message)),
        }
    }
}
