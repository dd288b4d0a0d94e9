/*
 * Copyright 2022 Collabora, Ltd.
 *
 * SPDX-License-Identifier: MIT
 */
use std::path::PathBuf;

pub mod config;
pub mod pack;

/// A file waiting to be written to the archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// The location on disk of the file
    pub location: PathBuf,
    /// The file's entry name in the archive, relative to the base directory
    pub name: String,
}
