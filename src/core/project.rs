//! Purpose: Locate and read project and profile files.
//! Exports: `PROJECT_FILE_NAME`, `PROFILES_FILE_NAME`, `PROFILE_TEMPLATE_FILE_NAME`, `Project`,
//! `find_project_root`, `read_yaml`, `read_project`, `read_profiles`, `write_profiles`.
//! Role: Shared file layer for `debug`, `init` and `selectors`.
//! Invariants: A missing `profiles.yml` reads as an empty profile map.
//! Invariants: YAML is always converted to `serde_json::Value` before use.
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

pub const PROJECT_FILE_NAME: &str = "sqlmill_project.yml";
pub const PROFILES_FILE_NAME: &str = "profiles.yml";
pub const PROFILE_TEMPLATE_FILE_NAME: &str = "profile_template.yml";

#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub root: PathBuf,
    pub name: String,
    pub profile: Option<String>,
    pub raw: Map<String, Value>,
}

pub fn project_file(root: &Path) -> PathBuf {
    root.join(PROJECT_FILE_NAME)
}

pub fn profiles_file(profiles_dir: &Path) -> PathBuf {
    profiles_dir.join(PROFILES_FILE_NAME)
}

/// Walk up from `start` to the first directory holding a project file.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| project_file(dir).is_file())
        .map(Path::to_path_buf)
}

pub fn read_yaml(path: &Path) -> Result<Value, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| Error::io("failed to read yaml file", path, err))?;
    parse_yaml(&text).map_err(|err| err.with_path(path))
}

pub fn parse_yaml(text: &str) -> Result<Value, Error> {
    serde_yaml::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Config)
            .with_message("invalid yaml")
            .with_source(err)
    })
}

pub fn read_project(root: &Path) -> Result<Project, Error> {
    let path = project_file(root);
    let raw = match read_yaml(&path)? {
        Value::Object(map) => map,
        _ => {
            return Err(Error::new(ErrorKind::Config)
                .with_message("project file must be a mapping")
                .with_path(&path));
        }
    };
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::new(ErrorKind::Config)
                .with_message("project file is missing 'name'")
                .with_path(&path)
        })?
        .to_string();
    let profile = raw
        .get("profile")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Project {
        root: root.to_path_buf(),
        name,
        profile,
        raw,
    })
}

pub fn read_profiles(profiles_dir: &Path) -> Result<Map<String, Value>, Error> {
    let path = profiles_file(profiles_dir);
    if !path.exists() {
        return Ok(Map::new());
    }
    match read_yaml(&path)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::new(ErrorKind::Config)
            .with_message("profiles file must be a mapping")
            .with_path(&path)),
    }
}

pub fn write_profiles(profiles_dir: &Path, profiles: &Map<String, Value>) -> Result<PathBuf, Error> {
    std::fs::create_dir_all(profiles_dir)
        .map_err(|err| Error::io("failed to create profiles dir", profiles_dir, err))?;
    let path = profiles_file(profiles_dir);
    let text = serde_yaml::to_string(profiles).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode profiles")
            .with_source(err)
    })?;
    std::fs::write(&path, text).map_err(|err| Error::io("failed to write profiles", &path, err))?;
    tracing::info!(path = %path.display(), "profiles written");
    Ok(path)
}
