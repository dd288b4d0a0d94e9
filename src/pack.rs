/*
 * Copyright 2022 Collabora, Ltd.
 *
 * SPDX-License-Identifier: MIT
 */
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Seek, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use log::{debug, trace, warn};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::{ConfigError, PackSpec};
use crate::FileEntry;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("unable to create archive {}: {1}", .0.to_string_lossy())]
    Create(PathBuf, std::io::Error),
    #[error("IO error while writing entry {0}: {1}")]
    ZipIO(String, std::io::Error),
    #[error("unable to write to archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid pack specification: {0}")]
    Config(#[from] ConfigError),
}

type PackResult<T> = Result<T, PackError>;

/// The outcome of a successful run
#[derive(Debug)]
pub struct PackReport {
    /// The archive that was written
    pub archive: PathBuf,
    /// Entry names, in the order they were written
    pub entries: Vec<String>,
    /// Everything that was skipped, and why
    pub warnings: Vec<String>,
}

impl PackReport {
    fn new(archive: PathBuf) -> Self {
        Self {
            archive,
            entries: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, msg: String) {
        warn!("{}", msg);
        self.warnings.push(msg);
    }
}

/// Shared state for a walk over one dependency
struct WalkContext<'a> {
    /// Entry names are relative to this
    base: &'a Path,
    /// Device and inode of the archive being written
    archive: (u64, u64),
}

/// The archive name of `location`: its path relative to `base`, with `/`
/// separators whatever the host uses. The flag is set when some of the name
/// was not valid UTF-8 and had to be replaced.
fn entry_name<P, B>(location: P, base: B) -> Option<(String, bool)>
where
    P: AsRef<Path>,
    B: AsRef<Path>,
{
    let relpath = pathdiff::diff_paths(location, base)?;
    let parts = relpath
        .components()
        .map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        None
    } else {
        let lossy = parts.iter().any(|p| matches!(p, Cow::Owned(_)));
        Some((parts.join("/"), lossy))
    }
}

fn process_dir(dir: &Path, ctx: &WalkContext, files: &mut Vec<FileEntry>, report: &mut PackReport) {
    trace!("processing dir {:?}", dir);
    let read_dir = match dir.read_dir() {
        Ok(read_dir) => read_dir,
        Err(e) => {
            report.warn(format!("{} could not be read: {}", dir.to_string_lossy(), e));
            return;
        }
    };

    let mut children = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(entry) => children.push(entry),
            Err(e) => report.warn(format!("{} could not be read: {}", dir.to_string_lossy(), e)),
        }
    }
    children.sort_by_key(|entry| entry.file_name());

    for entry in children {
        let path = entry.path();
        let kind = match entry.file_type() {
            Ok(kind) => kind,
            Err(e) => {
                report.warn(format!("{} could not be read: {}", path.to_string_lossy(), e));
                continue;
            }
        };

        // Links to files are stored as the file they point at; links to
        // directories are never descended into.
        let kind = if kind.is_symlink() {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    debug!("not following directory link {:?}", path);
                    continue;
                }
                Ok(meta) => meta.file_type(),
                Err(e) => {
                    report.warn(format!("{} could not be read: {}", path.to_string_lossy(), e));
                    continue;
                }
            }
        } else {
            kind
        };

        if kind.is_file() {
            match fs::metadata(&path) {
                Ok(meta) if (meta.dev(), meta.ino()) == ctx.archive => {
                    report.warn(format!(
                        "{} skipped: it is the archive being written",
                        path.to_string_lossy()
                    ));
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    report.warn(format!("{} could not be read: {}", path.to_string_lossy(), e));
                    continue;
                }
            }

            match entry_name(&path, ctx.base) {
                Some((name, lossy)) => {
                    if lossy {
                        report.warn(format!(
                            "{} stored as {}: name is not valid UTF-8",
                            path.to_string_lossy(),
                            name
                        ));
                    }
                    files.push(FileEntry {
                        location: path,
                        name,
                    });
                }
                None => report.warn(format!(
                    "{} skipped: not a valid path",
                    path.to_string_lossy()
                )),
            }
        } else if kind.is_dir() {
            process_dir(&path, ctx, files, report);
        } else {
            report.warn(format!(
                "{} skipped: only files and directories are supported",
                path.to_string_lossy()
            ));
        }
    }
}

fn insert_files<W>(
    zf: &mut ZipWriter<W>,
    files: &[FileEntry],
    seen: &mut BTreeMap<String, PathBuf>,
    report: &mut PackReport,
) -> PackResult<()>
where
    W: Write + Seek,
{
    for file in files {
        if let Some(location) = seen.get(&file.name) {
            if *location == file.location {
                debug!("skipping {}: already in the archive", file.name);
            } else {
                report.warn(format!(
                    "{} skipped: entry {} already holds {}",
                    file.location.to_string_lossy(),
                    file.name,
                    location.to_string_lossy()
                ));
            }
            continue;
        }

        // Open before starting the entry so an unreadable file never leaves
        // a partial entry behind
        let mut subfile = match File::open(&file.location) {
            Ok(f) => f,
            Err(e) => {
                report.warn(format!(
                    "{} could not be read: {}",
                    file.location.to_string_lossy(),
                    e
                ));
                continue;
            }
        };
        let meta = subfile
            .metadata()
            .map_err(|e| PackError::ZipIO(file.name.clone(), e))?;
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(meta.len() >= (1u64 << 32))
            .unix_permissions(meta.permissions().mode());

        trace!("insert file {}", file.name);
        zf.start_file(file.name.as_str(), options)?;
        std::io::copy(&mut subfile, zf).map_err(|e| PackError::ZipIO(file.name.clone(), e))?;

        seen.insert(file.name.clone(), file.location.clone());
        report.entries.push(file.name.clone());
    }
    Ok(())
}

/// Write every file found under each of the spec's dependencies into a
/// single deflated ZIP archive at `spec.output`.
///
/// Dependencies that are missing, and files that cannot be read, are skipped
/// and reported in [`PackReport::warnings`]. Only a failure of the archive
/// itself is an error.
pub fn pack(spec: &PackSpec) -> PackResult<PackReport> {
    spec.check()?;

    let f = File::create(&spec.output).map_err(|e| PackError::Create(spec.output.clone(), e))?;
    let meta = f
        .metadata()
        .map_err(|e| PackError::Create(spec.output.clone(), e))?;
    let ctx = WalkContext {
        base: &spec.base_dir,
        archive: (meta.dev(), meta.ino()),
    };
    let mut zf = ZipWriter::new(f);
    let mut report = PackReport::new(spec.output.clone());
    let mut seen = BTreeMap::new();

    for dep in &spec.dependencies {
        let dep_path = spec.base_dir.join(dep);
        if !dep_path.exists() {
            report.warn(format!("{} not found", dep_path.to_string_lossy()));
            continue;
        }
        if !dep_path.is_dir() {
            report.warn(format!("{} is not a directory", dep_path.to_string_lossy()));
            continue;
        }

        let mut files = Vec::new();
        process_dir(&dep_path, &ctx, &mut files, &mut report);
        insert_files(&mut zf, &files, &mut seen, &mut report)?;
    }

    zf.finish()?;

    Ok(report)
}
