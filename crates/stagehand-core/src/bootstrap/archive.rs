//! Side archive of local source-tree subdirectories.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use git2::Repository;
use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};

/// A built archive and what gets stamped into the script header.
#[derive(Debug, Clone)]
pub struct SiteArchive {
    pub bytes: Vec<u8>,
    /// blake3 of `bytes`, hex encoded
    pub digest: String,
    /// HEAD commit of the repository holding the source tree
    pub revision: Option<String>,
}

/// Pack `include` (subdirectories of `source_root`) into a zip archive.
///
/// Entries are added in sorted order with a fixed timestamp, so identical trees
/// produce identical bytes.
pub fn build_archive(source_root: &Path, include: &[String]) -> Result<SiteArchive> {
    let options = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let mut include: Vec<&String> = include.iter().collect();
    include.sort();
    include.dedup();
    for dir in include {
        let path = source_root.join(dir);
        if !path.is_dir() {
            return Err(Error::MissingFile { path });
        }
        add_dir(&mut zip, &path, dir, options)?;
    }

    let bytes = zip.finish()?.into_inner();
    let digest = blake3::hash(&bytes).to_hex().to_string();
    Ok(SiteArchive {
        bytes,
        digest,
        revision: head_revision(source_root),
    })
}

fn add_dir(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    dir: &Path,
    base: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    zip.add_directory(format!("{}/", base), options)?;

    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = format!("{}/{}", base, entry.file_name().to_string_lossy());
        let ty = entry.file_type()?;
        if ty.is_dir() {
            add_dir(zip, &entry.path(), &name, options)?;
        } else if ty.is_file() {
            debug!(entry = name, "archiving");
            zip.start_file(name, options)?;
            zip.write_all(&fs::read(entry.path())?)?;
        } else {
            warn!(path = %entry.path().display(), "skipping non-regular file");
        }
    }
    Ok(())
}

fn head_revision(source_root: &Path) -> Option<String> {
    let repo = Repository::discover(source_root).ok()?;
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}
