//! Per-project sandbox directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Directory names skipped when listing project files.
const IGNORED_DIRS: [&str; 2] = [".git", ".claude"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectFile {
    /// Path relative to the project directory, `/`-separated.
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ProjectWorkspaces {
    root: PathBuf,
}

impl ProjectWorkspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project_id: Uuid) -> PathBuf {
        self.root.join(project_id.to_string())
    }

    /// Return the project's directory, creating it if needed.
    pub async fn ensure(&self, project_id: Uuid) -> Result<PathBuf> {
        let dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create project directory {}", dir.display()))?;
        Ok(dir)
    }

    /// All regular files under the project directory, sorted by path.
    pub async fn list_files(&self, project_id: Uuid) -> Result<Vec<ProjectFile>> {
        let dir = self.ensure(project_id).await?;
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            walk(&dir, &dir, &mut files)?;
            files.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(files)
        })
        .await
        .context("file listing task panicked")?
    }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<ProjectFile>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if file_type.is_dir() {
            if !IGNORED_DIRS.contains(&name.as_str()) {
                walk(base, &path, out)?;
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let metadata = entry.metadata()?;
        let relative = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(ProjectFile {
            path: relative,
            name,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    Ok(())
}
