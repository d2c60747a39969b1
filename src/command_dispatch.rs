//! Purpose: Hold top-level CLI command dispatch for `sqlmill`.
//! Exports: `CommandContext`, `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and presentation.
//! Invariants: Commands return a payload plus a verdict; they never pick exit codes.
//! Invariants: Errors are returned, not printed, except where a command reports a failed verdict.

use super::*;

use std::path::Path;

use clap::CommandFactory;
use sqlmill::api::hub::HubClient;
use sqlmill::api::init::{self, InitOptions, LinePrompter};
use sqlmill::api::{
    CatalogArtifact, CommandResult, Manifest, ResourceType, RunExecutionResult, SchemaMode,
    SelectorConfig, get_config_for, load_artifact,
};
use sqlmill::core::project::{
    PROJECT_FILE_NAME, find_project_root, parse_yaml, profiles_file, read_profiles, read_project,
};
use sqlmill::core::semver::Version;

pub(super) struct CommandContext {
    pub(super) project_dir: PathBuf,
    pub(super) profiles_dir: PathBuf,
    pub(super) hub_url: String,
    pub(super) color_mode: ColorMode,
}

impl CommandContext {
    pub(super) fn from_cli(cli: &Cli, color_mode: ColorMode) -> Result<Self, Error> {
        let project_dir = project_paths::resolve_project_dir(cli.project_dir.as_deref())?;
        let profiles_dir = cli
            .profiles_dir
            .clone()
            .unwrap_or_else(project_paths::default_profiles_dir);
        Ok(Self {
            project_dir,
            profiles_dir,
            hub_url: cli.hub_url.clone(),
            color_mode,
        })
    }
}

pub(super) fn dispatch_command(
    command: Command,
    context: &CommandContext,
) -> Result<CommandResult, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "sqlmill", &mut io::stdout());
            Ok(CommandResult::ok(InvocationResult::Empty))
        }
        Command::Init(args) => {
            let options = InitOptions {
                project_name: args.project_name,
                profile: args.profile,
                skip_profile_setup: args.skip_profile_setup,
                project_dir: context.project_dir.clone(),
                profiles_dir: context.profiles_dir.clone(),
            };
            let stdin = io::stdin();
            let mut prompter = LinePrompter::new(stdin.lock(), io::stderr());
            let summary = init::run(&options, &mut prompter)?;
            if let Some(root) = summary.created_project {
                eprintln!("Your new project has been created at {}.", root.display());
            }
            Ok(CommandResult::ok(InvocationResult::Empty))
        }
        Command::Debug => {
            let checks = debug_checks(&context.project_dir, &context.profiles_dir);
            let passed = checks.iter().all(|check| check.ok);
            for check in &checks {
                let status = if check.ok { "OK" } else { "ERROR" };
                println!("  {}: [{status}] {}", check.name, check.detail);
            }
            if passed {
                println!("All checks passed!");
            }
            Ok(CommandResult::new(InvocationResult::Bool(passed), passed))
        }
        Command::Config {
            resource_type,
            base,
            set,
        } => {
            let resource_type: ResourceType = resource_type.parse()?;
            let raw = parse_assignments(&set)?;
            let schema = get_config_for(resource_type, base);
            let mode = if base {
                SchemaMode::Base
            } else {
                SchemaMode::Full
            };
            match schema.finalize(&raw, mode) {
                Ok(config) => {
                    emit_json(&json!({
                        "resource_type": resource_type.as_str(),
                        "schema": schema.name(),
                        "config": Value::Object(config),
                    }));
                    Ok(CommandResult::ok(InvocationResult::Empty))
                }
                Err(err) if err.kind() == ErrorKind::Config => {
                    emit_error(&err, context.color_mode);
                    Ok(CommandResult::new(InvocationResult::Empty, false))
                }
                Err(err) => Err(err),
            }
        }
        Command::Selectors => {
            let root = require_project_root(&context.project_dir)?;
            let config = SelectorConfig::from_project_root(&root)?;
            if let Some(default) = config.default_selector() {
                tracing::info!(selector = %default.name, "default selector");
            }
            Ok(CommandResult::ok(InvocationResult::Names(config.names())))
        }
        Command::Ls {
            manifest,
            resource_types,
        } => {
            let types = resource_types
                .iter()
                .map(|text| text.parse::<ResourceType>())
                .collect::<Result<Vec<_>, _>>()?;
            let manifest: Manifest = load_artifact(&manifest)?;
            Ok(CommandResult::ok(InvocationResult::Names(
                manifest.unique_ids(&types),
            )))
        }
        Command::Manifest { path } => {
            let manifest: Manifest = load_artifact(&path)?;
            for (resource_type, count) in manifest.counts_by_type() {
                tracing::debug!(%resource_type, count, "manifest nodes");
            }
            Ok(CommandResult::ok(InvocationResult::Manifest(manifest)))
        }
        Command::Catalog { path } => {
            let catalog: CatalogArtifact = load_artifact(&path)?;
            let success = !catalog.has_errors();
            Ok(CommandResult::new(
                InvocationResult::Catalog(catalog),
                success,
            ))
        }
        Command::Results { path } => {
            let run: RunExecutionResult = load_artifact(&path)?;
            let success = run.succeeded();
            Ok(CommandResult::new(InvocationResult::Run(run), success))
        }
        Command::Hub { command } => {
            let client = HubClient::new(context.hub_url.as_str())?;
            let names = match command {
                HubCommand::Index => client.index()?,
                HubCommand::Versions {
                    name,
                    no_version_check,
                    tool_version,
                } => {
                    let tool_version: Version = tool_version
                        .as_deref()
                        .unwrap_or(env!("CARGO_PKG_VERSION"))
                        .parse()?;
                    client.compatible_versions(&name, &tool_version, !no_version_check)?
                }
            };
            Ok(CommandResult::ok(InvocationResult::Names(names)))
        }
    }
}

fn require_project_root(project_dir: &Path) -> Result<PathBuf, Error> {
    find_project_root(project_dir).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("no {PROJECT_FILE_NAME} found"))
            .with_path(project_dir)
            .with_hint("Run inside a project, pass --project-dir, or create one with `sqlmill init`.")
    })
}

/// Parse `--set key=value` pairs; values are read as YAML scalars.
fn parse_assignments(pairs: &[String]) -> Result<Map<String, Value>, Error> {
    let mut raw = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid --set value '{pair}'"))
                .with_hint("Use KEY=VALUE, e.g. --set materialized=table."));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid --set value '{pair}'"))
                .with_hint("The key before '=' must not be empty."));
        }
        let value = if value.trim().is_empty() {
            Value::Null
        } else {
            parse_yaml(value).map_err(|err| err.with_kind(ErrorKind::Usage))?
        };
        raw.insert(key.to_string(), value);
    }
    Ok(raw)
}

struct DebugCheck {
    name: &'static str,
    ok: bool,
    detail: String,
}

fn debug_checks(project_dir: &Path, profiles_dir: &Path) -> Vec<DebugCheck> {
    let mut checks = Vec::new();
    let Some(root) = find_project_root(project_dir) else {
        checks.push(DebugCheck {
            name: PROJECT_FILE_NAME,
            ok: false,
            detail: format!("not found at or above {}", project_dir.display()),
        });
        return checks;
    };
    let project = match read_project(&root) {
        Ok(project) => {
            checks.push(DebugCheck {
                name: PROJECT_FILE_NAME,
                ok: true,
                detail: format!("found project '{}' at {}", project.name, root.display()),
            });
            project
        }
        Err(err) => {
            checks.push(DebugCheck {
                name: PROJECT_FILE_NAME,
                ok: false,
                detail: err.to_string(),
            });
            return checks;
        }
    };

    let profile_check = match (project.profile, read_profiles(profiles_dir)) {
        (None, _) => DebugCheck {
            name: "profile",
            ok: false,
            detail: format!("{PROJECT_FILE_NAME} does not name a profile"),
        },
        (Some(_), Err(err)) => DebugCheck {
            name: "profile",
            ok: false,
            detail: err.to_string(),
        },
        (Some(name), Ok(profiles)) if profiles.contains_key(&name) => DebugCheck {
            name: "profile",
            ok: true,
            detail: format!("'{name}' found in {}", profiles_file(profiles_dir).display()),
        },
        (Some(name), Ok(_)) => DebugCheck {
            name: "profile",
            ok: false,
            detail: format!(
                "'{name}' not found in {}",
                profiles_file(profiles_dir).display()
            ),
        },
    };
    checks.push(profile_check);
    checks
}

#[cfg(test)]
mod tests {
    use super::{debug_checks, parse_assignments};
    use serde_json::json;
    use sqlmill::api::ErrorKind;

    #[test]
    fn assignments_parse_yaml_scalars() {
        let raw = parse_assignments(&[
            "materialized=table".to_string(),
            "enabled=false".to_string(),
            "tags=[a, b]".to_string(),
            "where=".to_string(),
        ])
        .expect("assignments");
        assert_eq!(
            serde_json::Value::Object(raw),
            json!({"materialized": "table", "enabled": false, "tags": ["a", "b"], "where": null})
        );
    }

    #[test]
    fn assignments_without_equals_are_usage_errors() {
        let err = parse_assignments(&["materialized".to_string()]).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = parse_assignments(&["=x".to_string()]).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn debug_checks_need_project_and_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let profiles = dir.path().join("profiles");
        let checks = debug_checks(dir.path(), &profiles);
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].ok);

        std::fs::write(
            dir.path().join("sqlmill_project.yml"),
            "name: shop\nprofile: shop\n",
        )
        .expect("write");
        let checks = debug_checks(dir.path(), &profiles);
        assert!(checks[0].ok);
        assert!(!checks[1].ok);

        std::fs::create_dir_all(&profiles).expect("mkdir");
        std::fs::write(profiles.join("profiles.yml"), "shop:\n  target: dev\n").expect("write");
        let checks = debug_checks(dir.path(), &profiles);
        assert!(checks.iter().all(|check| check.ok));
    }
}
