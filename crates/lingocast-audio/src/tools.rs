// SPDX-License-Identifier: GPL-3.0-or-later

//! External decoding tools.
//!
//! Every invocation runs with a deadline. On timeout the child process is
//! killed and the caller gets [`ToolError::TimedOut`] immediately.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lingocast_config::ToolConfig;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ToolError;
use crate::lock::KeyedMutex;

/// Written into a playlist directory once generation finished.
pub const PLAYLISTS_COMPLETE: &str = ".complete";

/// Run `program` with `args`, capturing output, bounded by `timeout`.
#[instrument(skip_all, fields(program = %program.display()))]
pub async fn run_tool(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<std::process::Output, ToolError> {
    let program_name = program.display().to_string();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ToolError::Unavailable {
                    program: program_name.clone(),
                    reason: source.to_string(),
                }
            }
            _ => ToolError::Io {
                program: program_name.clone(),
                source,
            },
        })?;

    // Dropping the pending future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Io {
            program: program_name.clone(),
            source,
        })?,
        Err(_) => {
            warn!(target: "audio", program = %program_name, seconds = timeout.as_secs(), "tool timed out");
            return Err(ToolError::TimedOut {
                program: program_name,
                seconds: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ToolError::Failed {
            program: program_name,
            status: output.status.to_string(),
            stderr,
        });
    }

    debug!(target: "audio", program = %program_name, "tool finished");
    Ok(output)
}

fn leading_args(tool: &ToolConfig) -> Vec<OsString> {
    tool.leading_args.iter().map(OsString::from).collect()
}

fn tool_timeout(tool: &ToolConfig) -> Duration {
    Duration::from_secs(tool.timeout_secs.max(1))
}

async fn non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

// ============================================================================
// Transcoder
// ============================================================================

/// Converts a raw stream or playlist descriptor into a playable file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// `<program> -o <output> <input>`.
#[derive(Debug, Clone)]
pub struct VgmstreamTranscoder {
    tool: ToolConfig,
}

impl VgmstreamTranscoder {
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl Transcoder for VgmstreamTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        let mut args = leading_args(&self.tool);
        args.push("-o".into());
        args.push(output.as_os_str().to_owned());
        args.push(input.as_os_str().to_owned());

        run_tool(&self.tool.program, &args, tool_timeout(&self.tool)).await?;

        if non_empty_file(output).await {
            Ok(())
        } else {
            Err(ToolError::MissingOutput {
                program: self.tool.program.display().to_string(),
                path: output.to_path_buf(),
            })
        }
    }
}

// ============================================================================
// Bank parser
// ============================================================================

/// Produces playlist descriptors (`.txtp`) for the contents of a bank.
#[async_trait]
pub trait BankParser: Send + Sync {
    /// Generate descriptors for `bank` under `out_dir`, reusing any already there.
    async fn playlists(&self, bank: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ToolError>;
}

/// `<program> <leading args> -g -go <dir> -gw <source_root> [-gl <lang>] <bank>`.
///
/// Runs for the same output directory are serialized. The tool writes into
/// a staging directory next to `out_dir`, which is renamed into place and
/// marked with [`PLAYLISTS_COMPLETE`] only after the tool succeeded; a
/// directory without the marker is regenerated.
#[derive(Debug, Clone)]
pub struct WwiserBankParser {
    tool: ToolConfig,
    source_root: Option<PathBuf>,
    language: Option<String>,
    running: Arc<KeyedMutex<PathBuf>>,
}

impl WwiserBankParser {
    pub fn new(tool: ToolConfig, source_root: Option<PathBuf>, language: Option<String>) -> Self {
        Self {
            tool,
            source_root,
            language: language.filter(|lang| !lang.trim().is_empty()),
            running: Arc::new(KeyedMutex::default()),
        }
    }

    fn io_error(&self, source: std::io::Error) -> ToolError {
        ToolError::Io {
            program: self.tool.program.display().to_string(),
            source,
        }
    }

    async fn generate(&self, bank: &Path, out_dir: &Path) -> Result<(), ToolError> {
        let name = out_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = out_dir.with_file_name(format!(".{name}.{}.partial", std::process::id()));
        remove_dir_if_present(&staging).await.map_err(|e| self.io_error(e))?;
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| self.io_error(e))?;

        let mut args = leading_args(&self.tool);
        args.push("-g".into());
        args.push("-go".into());
        args.push(staging.as_os_str().to_owned());
        if let Some(root) = &self.source_root {
            args.push("-gw".into());
            args.push(root.as_os_str().to_owned());
        }
        if let Some(language) = &self.language {
            args.push("-gl".into());
            args.push(language.into());
        }
        args.push(bank.as_os_str().to_owned());

        let ran = run_tool(&self.tool.program, &args, tool_timeout(&self.tool)).await;
        if let Err(error) = ran {
            discard_dir(&staging).await;
            return Err(error);
        }
        if list_playlists(&staging).await.is_empty() {
            discard_dir(&staging).await;
            return Err(ToolError::MissingOutput {
                program: self.tool.program.display().to_string(),
                path: out_dir.to_path_buf(),
            });
        }

        remove_dir_if_present(out_dir).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, out_dir)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::write(out_dir.join(PLAYLISTS_COMPLETE), b"")
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl BankParser for WwiserBankParser {
    #[instrument(skip_all, fields(bank = %bank.display()))]
    async fn playlists(&self, bank: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
        let _running = self.running.lock(out_dir.to_path_buf()).await;

        if is_complete(out_dir).await {
            let existing = list_playlists(out_dir).await;
            if !existing.is_empty() {
                debug!(target: "audio", count = existing.len(), "reusing playlists");
                return Ok(existing);
            }
        }

        self.generate(bank, out_dir).await?;
        let produced = list_playlists(out_dir).await;
        debug!(target: "audio", count = produced.len(), "playlists generated");
        Ok(produced)
    }
}

async fn is_complete(dir: &Path) -> bool {
    tokio::fs::try_exists(dir.join(PLAYLISTS_COMPLETE))
        .await
        .unwrap_or(false)
}

async fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn discard_dir(dir: &Path) {
    if let Err(error) = remove_dir_if_present(dir).await {
        warn!(target: "audio", path = %dir.display(), %error, "failed to remove staging directory");
    }
}

/// All `.txtp` files under `dir`, sorted by path.
pub async fn list_playlists(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(directory) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&directory).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => stack.push(path),
                Ok(_) => {
                    let is_playlist = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("txtp"));
                    if is_playlist {
                        found.push(path);
                    }
                }
                Err(_) => continue,
            }
        }
    }

    found.sort();
    found
}
