//! Purpose: Resolve the project and profiles directories the CLI works against.
//! Exports: `default_profiles_dir`, `resolve_project_dir`.
//! Invariants: Default profiles directory remains `~/.sqlmill`.
//! Invariants: A relative `--project-dir` is taken relative to the current directory.

use std::path::{Path, PathBuf};

use sqlmill::api::{Error, ErrorKind};

pub(crate) fn default_profiles_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".sqlmill")
}

pub(crate) fn resolve_project_dir(flag: Option<&Path>) -> Result<PathBuf, Error> {
    let cwd = std::env::current_dir().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read current directory")
            .with_source(err)
    })?;
    Ok(match flag {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => cwd.join(dir),
        None => cwd,
    })
}

#[cfg(test)]
mod tests {
    use super::{default_profiles_dir, resolve_project_dir};
    use std::path::Path;

    #[test]
    fn profiles_dir_lives_under_home() {
        assert!(default_profiles_dir().ends_with(".sqlmill"));
    }

    #[test]
    fn project_dir_defaults_to_cwd_and_keeps_absolute_paths() {
        let cwd = std::env::current_dir().expect("cwd");
        assert_eq!(resolve_project_dir(None).expect("dir"), cwd);
        assert_eq!(resolve_project_dir(Some(Path::new("shop"))).expect("dir"), cwd.join("shop"));
        assert_eq!(
            resolve_project_dir(Some(Path::new("/srv/shop"))).expect("dir"),
            Path::new("/srv/shop")
        );
    }
}
