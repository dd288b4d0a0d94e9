/*
 * Copyright 2022 Collabora, Ltd.
 *
 * SPDX-License-Identifier: MIT
 */
use std::fs::File;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DEPENDENCIES: &[&str] = &[
    "@grpc",
    "crypto-js",
    "google-protobuf",
    "module-alias",
    "winston",
    "uuid",
    "@inworld",
];
pub const DEFAULT_BASE_DIR: &str = "node_modules";
pub const DEFAULT_OUTPUT: &str = "deps.zip";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error opening spec: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("dependency names must not be empty")]
    EmptyName,
    #[error("dependency {0} must be a path relative to the base directory")]
    NotRelative(String),
    #[error("an output path is required")]
    EmptyOutput,
}

/// What to pack, where to find it and where to put the result.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields, default)]
pub struct PackSpec {
    pub dependencies: Vec<String>,
    pub base_dir: PathBuf,
    pub output: PathBuf,
}

impl Default for PackSpec {
    fn default() -> Self {
        PackSpec {
            dependencies: DEFAULT_DEPENDENCIES.iter().map(|d| d.to_string()).collect(),
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl PackSpec {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PackSpec, ConfigError> {
        let file = File::open(path.as_ref())?;
        Ok(serde_yaml::from_reader(file)?)
    }

    fn check_dependency(name: &str) -> Result<(), ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }

        // Every component must stay below the base directory
        let escapes = Path::new(name)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ConfigError::NotRelative(name.to_string()));
        }

        Ok(())
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        for name in &self.dependencies {
            PackSpec::check_dependency(name)?;
        }

        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutput);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use tempdir::TempDir;

    fn write_spec(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("pack.yaml");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults() {
        let spec = PackSpec::default();
        assert_eq!(spec.base_dir, PathBuf::from("node_modules"));
        assert_eq!(spec.output, PathBuf::from("deps.zip"));
        assert_eq!(spec.dependencies.len(), 7);
        assert_eq!(spec.dependencies[0], "@grpc");
        assert_eq!(spec.dependencies[6], "@inworld");
        spec.check().unwrap();
    }

    #[test]
    fn load_full() {
        let dir = TempDir::new("deps-pack-config").unwrap();
        let path = write_spec(
            &dir,
            concat!(
                "Dependencies:\n",
                "  - depA\n",
                "  - \"@scope/pkg\"\n",
                "BaseDir: vendor\n",
                "Output: out/bundle.zip\n",
            ),
        );

        let spec = PackSpec::load(path).unwrap();
        assert_eq!(spec.dependencies, vec!["depA", "@scope/pkg"]);
        assert_eq!(spec.base_dir, PathBuf::from("vendor"));
        assert_eq!(spec.output, PathBuf::from("out/bundle.zip"));
        spec.check().unwrap();
    }

    #[test]
    fn load_partial_uses_defaults() {
        let dir = TempDir::new("deps-pack-config").unwrap();
        let path = write_spec(&dir, "Output: snapshot.zip\n");

        let spec = PackSpec::load(path).unwrap();
        assert_eq!(spec.output, PathBuf::from("snapshot.zip"));
        assert_eq!(spec.base_dir, PathBuf::from(DEFAULT_BASE_DIR));
        assert_eq!(spec.dependencies, PackSpec::default().dependencies);
    }

    #[test]
    fn load_empty_dependency_list() {
        let dir = TempDir::new("deps-pack-config").unwrap();
        let path = write_spec(&dir, "Dependencies: []\n");

        let spec = PackSpec::load(path).unwrap();
        assert!(spec.dependencies.is_empty());
        spec.check().unwrap();
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let dir = TempDir::new("deps-pack-config").unwrap();
        let path = write_spec(&dir, "Dependencies: [depA]\nCompression: bzip2\n");

        assert!(matches!(PackSpec::load(path), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new("deps-pack-config").unwrap();
        let result = PackSpec::load(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn check_rejects_bad_names() {
        let mut spec = PackSpec::default();

        spec.dependencies = vec!["".to_string()];
        assert!(matches!(spec.check(), Err(ConfigError::EmptyName)));

        spec.dependencies = vec!["../outside".to_string()];
        assert!(matches!(spec.check(), Err(ConfigError::NotRelative(n)) if n == "../outside"));

        spec.dependencies = vec!["/etc".to_string()];
        assert!(matches!(spec.check(), Err(ConfigError::NotRelative(_))));

        spec.dependencies = vec!["@scope/pkg".to_string(), ".hidden".to_string()];
        spec.check().unwrap();
    }

    #[test]
    fn check_rejects_empty_output() {
        let spec = PackSpec {
            output: PathBuf::new(),
            ..PackSpec::default()
        };
        assert!(matches!(spec.check(), Err(ConfigError::EmptyOutput)));
    }
}
