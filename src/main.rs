//! Purpose: `sqlmill` CLI entry point.
//! Role: Binary crate root; parses args, runs one command, hands the invocation to `conclude`.
//! Invariants: The process exit code comes only from `core::exit::conclude`.
//! Invariants: Usage errors are printed here before they become a usage outcome.
//! Invariants: Non-interactive errors are emitted as JSON on stderr; payloads go to stdout.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod project_paths;

use sqlmill::api::hub::{DEFAULT_HUB_URL, HUB_URL_ENV};
use sqlmill::api::{Error, ErrorKind, Invocation, InvocationResult, Outcome, Presenter, conclude};

const LOG_ENV: &str = "SQLMILL_LOG";
const PROFILES_DIR_ENV: &str = "SQLMILL_PROFILES_DIR";

fn main() {
    let (invocation, color_mode) = run();
    let mut presenter = CliPresenter { color_mode };
    std::process::exit(conclude(invocation, &mut presenter));
}

fn run() -> (Invocation, ColorMode) {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => return (clap_invocation(&err), ColorMode::Auto),
    };
    init_tracing(cli.verbose);

    let color_mode = cli.color;
    let context = match command_dispatch::CommandContext::from_cli(&cli, color_mode) {
        Ok(context) => context,
        Err(err) => return (error_invocation(err, color_mode), color_mode),
    };
    let invocation = match command_dispatch::dispatch_command(cli.command, &context) {
        Ok(result) => result.into_invocation(),
        Err(err) => error_invocation(err, color_mode),
    };
    (invocation, color_mode)
}

fn error_invocation(err: Error, color_mode: ColorMode) -> Invocation {
    if err.kind() == ErrorKind::Usage {
        emit_error(&err, color_mode);
        return Err(Outcome::usage());
    }
    Err(Outcome::exception(err))
}

fn clap_invocation(err: &clap::Error) -> Invocation {
    match err.kind() {
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
            let _ = err.print();
            Ok(InvocationResult::Empty)
        }
        ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            let _ = err.print();
            Err(Outcome::usage())
        }
        _ => {
            let usage = Error::new(ErrorKind::Usage)
                .with_message(clap_error_summary(err))
                .with_hint(clap_error_hint(err));
            emit_error(&usage, ColorMode::Auto);
            Err(Outcome::usage())
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "sqlmill",
    version,
    about = "Project tooling for SQL transformation projects",
    help_template = r#"{about-with-newline}
USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    after_help = r#"EXAMPLES
  $ sqlmill init jaffle_shop
  $ sqlmill debug
  $ sqlmill config snapshot --set strategy=timestamp --set unique_key=id
  $ sqlmill results target/run_results.json

EXIT CODES
  0   success
  1   the command finished but reported failures
  2   the command aborted with an error
  64  invalid invocation"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Project directory (default: current directory)",
        value_hint = ValueHint::DirPath
    )]
    project_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = PROFILES_DIR_ENV,
        help = "Directory holding profiles.yml (default: ~/.sqlmill)",
        value_hint = ValueHint::DirPath
    )]
    profiles_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = HUB_URL_ENV,
        default_value = DEFAULT_HUB_URL,
        help = "Package hub base URL"
    )]
    hub_url: String,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,
    #[arg(short, long, global = true, help = "Log debug detail to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Create a starter project and set up its profile",
        after_help = r#"EXAMPLES
  $ sqlmill init jaffle_shop
  $ sqlmill init jaffle_shop --profile warehouse
  $ sqlmill init --skip-profile-setup"#
    )]
    Init(InitArgs),
    #[command(about = "Check that the project file and its profile are in place")]
    Debug,
    #[command(
        arg_required_else_help = true,
        about = "Resolve the config schema for a resource type and apply defaults",
        after_help = r#"EXAMPLES
  $ sqlmill config model
  $ sqlmill config test --set severity=warn
  $ sqlmill config snapshot --base"#
    )]
    Config {
        #[arg(value_name = "TYPE", help = "Resource type (model, seed, snapshot, test, ...)")]
        resource_type: String,
        #[arg(long, help = "Use the base table; required fields are not enforced")]
        base: bool,
        #[arg(long = "set", value_name = "KEY=VALUE", help = "Config value (YAML scalar)")]
        set: Vec<String>,
    },
    #[command(about = "List selectors defined in selectors.yml")]
    Selectors,
    #[command(about = "List node ids from a manifest")]
    Ls {
        #[arg(long, value_hint = ValueHint::FilePath, help = "Path to manifest.json")]
        manifest: PathBuf,
        #[arg(long = "resource-type", value_name = "TYPE", help = "Only list these types")]
        resource_types: Vec<String>,
    },
    #[command(about = "Load a manifest and print it")]
    Manifest {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    #[command(about = "Load a catalog; fails when it recorded errors")]
    Catalog {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    #[command(about = "Load run results; fails when any node errored or failed")]
    Results {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    #[command(arg_required_else_help = true, about = "Query the package hub")]
    Hub {
        #[command(subcommand)]
        command: HubCommand,
    },
    #[command(arg_required_else_help = true, about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum HubCommand {
    #[command(about = "List every package the hub publishes")]
    Index,
    #[command(about = "List published versions of a package")]
    Versions {
        #[arg(help = "Package name, e.g. dbt-labs/dbt_utils")]
        name: String,
        #[arg(long, help = "List every version, compatible or not")]
        no_version_check: bool,
        #[arg(
            long,
            value_name = "VERSION",
            help = "Tool version to check compatibility against"
        )]
        tool_version: Option<String>,
    },
}

#[derive(Args)]
struct InitArgs {
    #[arg(help = "Name of the new project")]
    project_name: Option<String>,
    #[arg(long, help = "Use an existing profile instead of creating one")]
    profile: Option<String>,
    #[arg(long, help = "Do not set up a profile")]
    skip_profile_setup: bool,
}

struct CliPresenter {
    color_mode: ColorMode,
}

impl Presenter for CliPresenter {
    fn present_success(&mut self, payload: &InvocationResult) {
        emit_payload(payload);
    }

    fn present_result(&mut self, payload: &InvocationResult) {
        emit_payload(payload);
        emit_failure(payload, self.color_mode);
    }

    fn present_exception(&mut self, err: &(dyn StdError + 'static)) {
        match err.downcast_ref::<Error>() {
            Some(err) => emit_error(err, self.color_mode),
            None => emit_error(
                &Error::new(ErrorKind::Internal).with_message(err.to_string()),
                self.color_mode,
            ),
        }
    }
}

fn emit_payload(payload: &InvocationResult) {
    match payload {
        InvocationResult::Names(names) => {
            for name in names {
                println!("{name}");
            }
        }
        InvocationResult::Manifest(_)
        | InvocationResult::Catalog(_)
        | InvocationResult::Run(_) => emit_json(&payload.to_json()),
        InvocationResult::Bool(_) | InvocationResult::Empty => {}
    }
}

fn emit_json(value: &Value) {
    let encoded = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!(
        "{}",
        encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    );
}

fn failure_lines(payload: &InvocationResult) -> Vec<String> {
    match payload {
        InvocationResult::Bool(_) => vec!["checks did not pass".to_string()],
        InvocationResult::Catalog(catalog) => catalog
            .errors
            .iter()
            .flatten()
            .map(|err| format!("catalog error: {err}"))
            .collect(),
        InvocationResult::Run(run) => {
            let failed: Vec<_> = run.failed().collect();
            let mut lines = vec![format!(
                "{} of {} results failed",
                failed.len(),
                run.results.len()
            )];
            for result in failed {
                let status = serde_json::to_value(result.status)
                    .ok()
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default();
                match &result.message {
                    Some(message) => {
                        lines.push(format!("{status} {}: {message}", result.unique_id))
                    }
                    None => lines.push(format!("{status} {}", result.unique_id)),
                }
            }
            lines
        }
        // Commands that fail with no payload have already reported why.
        InvocationResult::Empty => Vec::new(),
        other => vec![format!("command reported failure ({})", other.kind())],
    }
}

fn emit_failure(payload: &InvocationResult, color_mode: ColorMode) {
    let lines = failure_lines(payload);
    if lines.is_empty() {
        return;
    }
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("failed:", color_mode.use_color(is_tty), AnsiColor::Red);
        for line in &lines {
            eprintln!("{label} {line}");
        }
        return;
    }
    let value = json!({"failure": {"kind": payload.kind(), "details": lines}});
    eprintln!("{value}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Config => "invalid config".to_string(),
        ErrorKind::Selector => "invalid selector".to_string(),
        ErrorKind::Registry => "unexpected hub response".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `sqlmill --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|token| *token == "sqlmill") else {
        return "Try `sqlmill --help`.".to_string();
    };
    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !token.starts_with('-') && !token.starts_with('<') && !token.starts_with('[')
        })
        .copied()
        .collect();
    if parts.is_empty() {
        return "Try `sqlmill --help`.".to_string();
    }
    format!("Try `sqlmill {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{Cli, error_json, error_text, failure_lines};
    use clap::Parser;
    use serde_json::json;
    use sqlmill::api::{Error, ErrorKind, InvocationResult, RunExecutionResult};

    #[test]
    fn error_json_carries_kind_hint_path_and_causes() {
        let err = Error::new(ErrorKind::Selector)
            .with_message("two defaults")
            .with_hint("Keep one default selector.")
            .with_path("selectors.yml")
            .with_source(std::io::Error::other("inner"));
        assert_eq!(
            error_json(&err),
            json!({"error": {
                "kind": "Selector",
                "message": "two defaults",
                "hint": "Keep one default selector.",
                "path": "selectors.yml",
                "causes": ["inner"]
            }})
        );
    }

    #[test]
    fn error_text_without_color_has_plain_labels() {
        let err = Error::new(ErrorKind::Usage).with_hint("Try `sqlmill --help`.");
        assert_eq!(
            error_text(&err, false),
            "error: usage error\nhint: Try `sqlmill --help`."
        );
        assert!(error_text(&err, true).contains("\u{1b}[31merror:"));
    }

    #[test]
    fn failure_lines_describe_failed_runs() {
        let run: RunExecutionResult = serde_json::from_value(json!({
            "results": [
                {"unique_id": "model.a", "status": "success"},
                {"unique_id": "test.b", "status": "fail", "message": "3 rows"},
                {"unique_id": "model.c", "status": "runtime error"}
            ]
        }))
        .expect("run");
        assert_eq!(
            failure_lines(&InvocationResult::Run(run)),
            vec![
                "2 of 3 results failed".to_string(),
                "fail test.b: 3 rows".to_string(),
                "runtime error model.c".to_string(),
            ]
        );
    }

    #[test]
    fn empty_failures_add_no_summary() {
        assert!(failure_lines(&InvocationResult::Empty).is_empty());
        assert_eq!(
            failure_lines(&InvocationResult::Names(vec![])),
            vec!["command reported failure (names)".to_string()]
        );
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sqlmill",
            "config",
            "model",
            "--base",
            "--set",
            "materialized=table",
            "--project-dir",
            "/tmp/shop",
            "--hub-url",
            "http://127.0.0.1:9/",
        ])
        .expect("parse");
        assert_eq!(cli.project_dir.as_deref(), Some(std::path::Path::new("/tmp/shop")));
        assert_eq!(cli.hub_url, "http://127.0.0.1:9/");
    }
}
