//! Gzipped tarball archiver for the crawler workspace.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use super::traits::{ArchiveOutcome, ArchiveRequest, BaseArchiver};

/// Directory the workspace is stored under inside the archive.
const WORKSPACE_PREFIX: &str = "backup";
const SNAPSHOT_PREFIX: &str = "snapshots";

#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzArchiver;

impl TarGzArchiver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BaseArchiver for TarGzArchiver {
    async fn archive(&self, request: &ArchiveRequest) -> Result<ArchiveOutcome> {
        let request = request.clone();
        // Compression is blocking file I/O proportional to the workspace size
        tokio::task::spawn_blocking(move || write_archive(&request)).await?
    }
}

fn write_archive(request: &ArchiveRequest) -> Result<ArchiveOutcome> {
    if !request.workspace.is_dir() {
        bail!(
            "workspace {} is not a directory",
            request.workspace.display()
        );
    }
    if let Some(parent) = request.dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = File::create(&request.dest)
        .with_context(|| format!("failed to create {}", request.dest.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(
        BufWriter::new(file),
        Compression::default(),
    ));

    let workspace_files = append_tree(&mut builder, &request.workspace, WORKSPACE_PREFIX)?;

    let snapshot_count = match &request.snapshots {
        Some(dir) if dir.is_dir() => append_tree(&mut builder, dir, SNAPSHOT_PREFIX)?,
        Some(dir) => {
            tracing::warn!(path = %dir.display(), "Snapshot directory missing, skipping");
            0
        }
        None => 0,
    };

    let mut writer = builder.into_inner()?.finish()?;
    writer.flush()?;

    tracing::info!(
        dest = %request.dest.display(),
        workspace_files,
        snapshot_count,
        "Archive written"
    );

    Ok(ArchiveOutcome {
        path: request.dest.clone(),
        snapshot_count,
    })
}

/// Add everything under `root` to the archive below `prefix`. Returns the
/// number of regular files added.
fn append_tree<W: Write>(builder: &mut tar::Builder<W>, root: &Path, prefix: &str) -> Result<usize> {
    let mut files = 0;
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root)?;
        let name = Path::new(prefix).join(relative);

        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), &name)
                .with_context(|| format!("failed to add {}", entry.path().display()))?;
            files += 1;
        }
    }
    Ok(files)
}
