use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::assets::relative_key;
use crate::core::downloader::temp_sibling;
use crate::core::error::{SyncError, SyncResult};
use crate::core::verify::Fingerprint;

/// Rewrites an archive so that a fixed set of logical paths carry local content.
///
/// Entries are matched by logical path, so patching an already patched
/// archive replaces the injected entries instead of duplicating them.
#[derive(Debug, Clone, Default)]
pub struct ArchivePatcher {
    /// entry name inside the archive → file to inject
    files: BTreeMap<String, PathBuf>,
}

impl ArchivePatcher {
    pub fn new(files: BTreeMap<String, PathBuf>) -> Self {
        Self { files }
    }

    /// Every file below `source_dir`, injected at `<prefix>/<relative path>`.
    /// A missing `source_dir` yields an empty patcher.
    pub async fn from_dir(source_dir: &Path, prefix: &str) -> SyncResult<Self> {
        let source_dir = source_dir.to_path_buf();
        let prefix = prefix.trim_matches('/').to_string();
        tokio::task::spawn_blocking(move || -> SyncResult<Self> {
            let mut files = BTreeMap::new();
            if source_dir.is_dir() {
                collect(&source_dir, &source_dir, &prefix, &mut files)?;
            }
            Ok(Self { files })
        })
        .await
        .map_err(|e| SyncError::Other(format!("Task join error: {e}")))?
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Patch `archive` in place and return its new fingerprint.
    ///
    /// The original is replaced only once the rewritten archive is complete;
    /// on failure the temporary file is removed and the original is untouched.
    #[instrument(skip(self))]
    pub async fn patch(&self, archive: &Path) -> SyncResult<Fingerprint> {
        info!(
            "Injecting {} files into {:?}",
            self.files.len(),
            archive.file_name().unwrap_or_default()
        );

        let target = archive.to_path_buf();
        let files = self.files.clone();
        tokio::task::spawn_blocking(move || rewrite(&target, &files))
            .await
            .map_err(|e| SyncError::ArchivePatchFailed {
                path: archive.to_path_buf(),
                reason: format!("Task join error: {e}"),
            })?
            .map_err(|e| SyncError::ArchivePatchFailed {
                path: archive.to_path_buf(),
                reason: e.to_string(),
            })?;

        let fingerprint = Fingerprint::of_file(archive).await?;
        info!("Patched {:?} ({})", archive, fingerprint);
        Ok(fingerprint)
    }
}

fn collect(
    base: &Path,
    dir: &Path,
    prefix: &str,
    out: &mut BTreeMap<String, PathBuf>,
) -> SyncResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))? {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect(base, &path, prefix, out)?;
        } else if path.is_file() {
            let relative = relative_key(base, &path);
            let name = if prefix.is_empty() {
                relative
            } else {
                format!("{prefix}/{relative}")
            };
            out.insert(name, path);
        }
    }
    Ok(())
}

/// Blocking rewrite: stream kept entries raw, append overrides, swap files.
fn rewrite(archive: &Path, files: &BTreeMap<String, PathBuf>) -> SyncResult<()> {
    // read every override first so a bad source aborts before any write
    let mut payloads = Vec::with_capacity(files.len());
    for (name, source) in files {
        let bytes = std::fs::read(source).map_err(|e| SyncError::io(source, e))?;
        payloads.push((name.as_str(), bytes));
    }

    let temp = temp_sibling(archive);
    let result = write_patched(archive, &temp, files, &payloads).and_then(|()| {
        std::fs::rename(&temp, archive).map_err(|e| SyncError::io(archive, e))
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

fn write_patched(
    archive: &Path,
    temp: &Path,
    files: &BTreeMap<String, PathBuf>,
    payloads: &[(&str, Vec<u8>)],
) -> SyncResult<()> {
    let source = File::open(archive).map_err(|e| SyncError::io(archive, e))?;
    let mut original = ZipArchive::new(source)?;

    let out = File::create(temp).map_err(|e| SyncError::io(temp, e))?;
    let mut writer = ZipWriter::new(out);

    let mut kept = 0usize;
    for index in 0..original.len() {
        let entry = original.by_index_raw(index)?;
        if files.contains_key(entry.name()) {
            debug!("Replacing {}", entry.name());
            continue;
        }
        writer.raw_copy_file(entry)?;
        kept += 1;
    }

    // fixed timestamp so injected entries do not change between runs
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    for (name, bytes) in payloads {
        writer.start_file(*name, options)?;
        writer.write_all(bytes).map_err(|e| SyncError::io(temp, e))?;
    }

    let out = writer.finish()?;
    out.sync_all().map_err(|e| SyncError::io(temp, e))?;
    debug!("Kept {} entries, injected {}", kept, payloads.len());
    Ok(())
}
