//! Static asset packaging
//!
//! The frontend directory is packed into a gzip'd tar archive whose bytes only
//! depend on file paths and contents: entries are sorted, and timestamps and
//! ownership are zeroed. The archive hash is therefore a content hash, and the
//! bucket deployment changes exactly when the files do.

use crate::error::{CloudError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};

/// Upper bound before a warning is logged
const LARGE_ASSET_SIZE: usize = 100 * 1024 * 1024;

/// An asset archive written to the cloud assembly directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAsset {
    /// sha256 of the archive bytes (lowercase hex)
    pub hash: String,
    /// File name inside the assembly directory
    pub file_name: String,
    /// Object key in the asset bucket
    pub object_key: String,
    /// Directory the asset was packed from
    pub source: PathBuf,
    pub file_count: usize,
}

impl StagedAsset {
    pub fn path_in(&self, assembly_dir: &Path) -> PathBuf {
        assembly_dir.join(&self.file_name)
    }
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

/// Whether a relative path is excluded by any pattern
///
/// A pattern matches the full relative path, any parent directory of it, or
/// the bare file name.
pub fn is_excluded(relative: &str, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let options = match_options();
    let file_name = relative.rsplit('/').next().unwrap_or(relative);

    let mut candidates = vec![relative.to_string(), file_name.to_string()];
    let mut prefix = String::new();
    for component in relative.split('/') {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(component);
        candidates.push(prefix.clone());
    }

    patterns
        .iter()
        .any(|p| candidates.iter().any(|c| p.matches_with(c, options)))
}

/// Compile exclude patterns
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                CloudError::InvalidConfig(format!("invalid exclude pattern {:?}: {}", p, e))
            })
        })
        .collect()
}

/// Files under `dir` that are not excluded, as sorted `/`-separated relative paths
pub fn collect_files(dir: &Path, exclude: &[String]) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(CloudError::AssetNotFound(dir.to_path_buf()));
    }
    let patterns = compile_patterns(exclude)?;

    let walk = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob_with(&walk, match_options()).map_err(|e| CloudError::AssetError {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CloudError::AssetError {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if is_excluded(&relative, &patterns) {
            tracing::debug!(file = %relative, "Excluded from asset");
            continue;
        }
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

/// Pack the given files into a deterministic tar.gz
pub fn pack(dir: &Path, files: &[String]) -> Result<Vec<u8>> {
    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);

        for relative in files {
            let content = fs::read(dir.join(relative))?;

            let mut header = Header::new_gnu();
            header
                .set_path(relative)
                .map_err(|e| CloudError::AssetError {
                    path: dir.join(relative),
                    message: format!("failed to set archive path: {}", e),
                })?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            header.set_cksum();

            tar.append(&header, &content[..])?;
        }

        tar.into_inner()?.finish()?;
    }
    Ok(archive_data)
}

/// Pack `dir` and write the archive into `out_dir`
pub fn stage(dir: &Path, exclude: &[String], out_dir: &Path) -> Result<StagedAsset> {
    let files = collect_files(dir, exclude)?;
    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), "Asset directory has no files to upload");
    }

    let archive = pack(dir, &files)?;
    if archive.len() > LARGE_ASSET_SIZE {
        tracing::warn!(
            size_mb = archive.len() / 1024 / 1024,
            "Asset archive is large, consider adding exclude patterns"
        );
    }

    let hash = format!("{:x}", Sha256::digest(&archive));
    let asset = StagedAsset {
        file_name: format!("asset.{}.tar.gz", hash),
        object_key: format!("{}.tar.gz", hash),
        hash,
        source: dir.to_path_buf(),
        file_count: files.len(),
    };

    fs::create_dir_all(out_dir)?;
    fs::write(asset.path_in(out_dir), &archive)?;
    tracing::info!(
        hash = %asset.hash,
        files = asset.file_count,
        bytes = archive.len(),
        "Staged asset"
    );
    Ok(asset)
}

/// Extract an archive into `dest`, returning the relative paths written
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path).map_err(|e| CloudError::AssetError {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest)?;

    let mut written = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.to_string_lossy().replace('\\', "/");
        // unpack_in refuses paths that escape `dest`
        if entry.unpack_in(dest)? {
            written.push(relative);
        }
    }
    written.sort();
    Ok(written)
}
