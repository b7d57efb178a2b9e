//! Per-job workspace staging
//!
//! Every job gets its own directory under the configured workspace root.
//! Uploaded bytes are written there under sanitized names, and the
//! directory is removed when the `Workspace` is dropped (unless the
//! service is configured to keep workspaces for debugging).

use axum::body::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Characters never allowed in a staged file name
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Directory holding copies of a multi-file role
pub const INPUT_DIR: &str = "input";

/// Directory the computation writes its artifact into; uploads never land here
pub const OUTPUT_DIR: &str = "output";

/// One uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name supplied by the client, untrusted
    pub original_name: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercase extension of the sanitized name, empty when absent
    pub fn extension(&self) -> String {
        extension_of(&sanitize_file_name(&self.original_name, 0))
    }
}

/// Ordered uploads of one request
#[derive(Debug, Clone, Default)]
pub struct UploadSet {
    pub uploads: Vec<Upload>,
}

impl UploadSet {
    pub fn new(uploads: Vec<Upload>) -> Self {
        Self { uploads }
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.uploads.iter().map(|u| u.original_name.clone()).collect()
    }
}

/// A file written into a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub original_name: String,
    pub sanitized_name: String,
    pub path: PathBuf,
    /// Lowercase, without the dot
    pub extension: String,
    /// Position in the request, used for positional fallback
    pub upload_index: usize,
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Isolated directory owned by exactly one job
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    files: Vec<StagedFile>,
    keep: bool,
}

impl Workspace {
    /// Create a fresh, empty directory `<label>-<millis>-<id>` under `root`
    pub async fn create(root: &Path, label: &str, keep: bool) -> Result<Self, WorkspaceError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: root.to_path_buf(),
                source,
            })?;

        let id = Uuid::new_v4().simple().to_string();
        let dir = root.join(format!(
            "{}-{}-{}",
            sanitize_file_name(label, 0),
            finproc_common::time::unix_millis(),
            &id[..8]
        ));

        // create_dir (not create_dir_all) so an existing directory is never shared
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: dir.clone(),
                source,
            })?;

        debug!("Created workspace {}", dir.display());
        Ok(Self {
            dir,
            files: Vec::new(),
            keep,
        })
    }

    /// Create a workspace and write every upload into it
    pub async fn stage(
        root: &Path,
        label: &str,
        uploads: &UploadSet,
        keep: bool,
    ) -> Result<Self, WorkspaceError> {
        let mut workspace = Self::create(root, label, keep).await?;
        for (index, upload) in uploads.uploads.iter().enumerate() {
            workspace.write_upload(index, upload).await?;
        }
        Ok(workspace)
    }

    /// Write one upload under its sanitized name
    ///
    /// A later upload with the same sanitized name replaces the earlier
    /// file on disk; both entries stay in `files()`.
    pub async fn write_upload(
        &mut self,
        index: usize,
        upload: &Upload,
    ) -> Result<StagedFile, WorkspaceError> {
        let sanitized_name = sanitize_file_name(&upload.original_name, index);
        let path = self.dir.join(&sanitized_name);

        if self.files.iter().any(|f| f.sanitized_name == sanitized_name) {
            warn!(
                "Upload {:?} collides with an earlier file named {}; overwriting",
                upload.original_name, sanitized_name
            );
        }

        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;

        let staged = StagedFile {
            original_name: upload.original_name.clone(),
            extension: extension_of(&sanitized_name),
            sanitized_name,
            path,
            upload_index: index,
        };
        self.files.push(staged.clone());
        Ok(staged)
    }

    /// Copy files into `input/` so a computation can take them as one directory
    pub async fn collect_into_input_dir(
        &self,
        files: &[&StagedFile],
    ) -> Result<PathBuf, WorkspaceError> {
        let input_dir = self.dir.join(INPUT_DIR);
        tokio::fs::create_dir_all(&input_dir)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: input_dir.clone(),
                source,
            })?;

        for file in files {
            let target = input_dir.join(&file.sanitized_name);
            tokio::fs::copy(&file.path, &target)
                .await
                .map_err(|source| WorkspaceError::Write {
                    path: target.clone(),
                    source,
                })?;
        }
        Ok(input_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Absolute path for a computation output, under `output/`
    ///
    /// Uploads are staged at the workspace top level, so an upload that
    /// happens to share the artifact's name cannot pose as the result.
    pub async fn output_path(&self, file_name: &str) -> Result<PathBuf, WorkspaceError> {
        let output_dir = self.dir.join(OUTPUT_DIR);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: output_dir.clone(),
                source,
            })?;
        Ok(output_dir.join(sanitize_file_name(file_name, 0)))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            debug!("Keeping workspace {}", self.dir.display());
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.dir.display(), e);
            }
        }
    }
}

/// Reduce an untrusted client file name to a single safe path component
///
/// Directory prefixes (either separator) are dropped, forbidden and control
/// characters become `_`, and names that end up empty or dot-only become
/// `file_<index>`. Applying it twice gives the same result.
pub fn sanitize_file_name(raw: &str, index: usize) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        format!("file_{}", index)
    } else {
        trimmed.to_string()
    }
}

/// Lowercase extension of a file name, empty when there is none
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}
