/*
 * Copyright 2022 Collabora, Ltd.
 *
 * SPDX-License-Identifier: MIT
 */
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use deps_pack::config::PackSpec;
use deps_pack::pack::pack;
use env_logger::Env;
use log::Level;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "deps-pack",
    long_about = "Bundle installed dependency directories into a single ZIP archive."
)]
struct Opt {
    #[structopt(
        long,
        short,
        parse(from_os_str),
        help = "YAML file with Dependencies, BaseDir and Output."
    )]
    config: Option<PathBuf>,
    #[structopt(
        long,
        short,
        parse(from_os_str),
        help = "Directory the dependencies are found in, and entry names are relative to."
    )]
    base_dir: Option<PathBuf>,
    #[structopt(long, short, parse(from_os_str), help = "The archive to write.")]
    output: Option<PathBuf>,
    #[structopt(
        name = "DEPENDENCY",
        help = "Dependency directories to pack, replacing the configured list."
    )]
    dependencies: Vec<String>,
}

impl Opt {
    fn into_spec(self) -> Result<PackSpec> {
        let mut spec = match self.config {
            Some(ref path) => PackSpec::load(path)?,
            None => PackSpec::default(),
        };
        if let Some(base_dir) = self.base_dir {
            spec.base_dir = base_dir;
        }
        if let Some(output) = self.output {
            spec.output = output;
        }
        if !self.dependencies.is_empty() {
            spec.dependencies = self.dependencies;
        }
        Ok(spec)
    }
}

/// Warnings are shown by default, as `Warning: ...` lines, at the moment they
/// are recorded.
fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format(|buf, record| match record.level() {
            Level::Warn => writeln!(buf, "Warning: {}", record.args()),
            level => writeln!(buf, "[{} {}] {}", level, record.target(), record.args()),
        })
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let spec = Opt::from_args().into_spec()?;
    let report = pack(&spec)?;
    println!("Created {}", report.archive.to_string_lossy());

    Ok(())
}
