//! Purpose: Scaffold a new project and set up its connection profile interactively.
//! Exports: `InitOptions`, `InitSummary`, `run`, `Prompter`, `Prompt`, `LinePrompter`,
//! `ScriptedPrompter`, `generate_target_from_input`, `is_valid_project_name`.
//! Role: Backs `sqlmill init`; all user interaction goes through a `Prompter`.
//! Invariants: An existing project directory is never overwritten.
//! Invariants: Writing a profile replaces only the profile with the same name.
//! Invariants: A project-level `profile_template.yml` wins over the built-in adapter templates.
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::core::error::{Error, ErrorKind};
use crate::core::project::{
    PROFILE_TEMPLATE_FILE_NAME, PROJECT_FILE_NAME, find_project_root, parse_yaml, profiles_file,
    read_profiles, read_project, read_yaml, write_profiles,
};

const GLOBAL_PROJECT_NAME: &str = "sqlmill";
const DEFAULT_TARGET: &str = "dev";

const POSTGRES_TEMPLATE: &str = r#"fixed:
  type: postgres
prompts:
  host:
    hint: 'hostname for the instance'
  port:
    default: 5432
    type: 'int'
  user:
    hint: 'dev username'
  _choose_authentication_type:
    password:
      pass:
        hint: 'dev password'
        hide_input: true
  dbname:
    hint: 'default database to build objects in'
  schema:
    hint: 'default schema to build objects in'
  threads:
    hint: '1 or more'
    type: 'int'
    default: 1
"#;

const DUCKDB_TEMPLATE: &str = r#"fixed:
  type: duckdb
prompts:
  path:
    hint: 'path to the database file'
    default: 'dev.duckdb'
  threads:
    hint: '1 or more'
    type: 'int'
    default: 1
"#;

/// Built-in adapters and their profile templates, in menu order.
pub const ADAPTERS: &[(&str, &str)] = &[("postgres", POSTGRES_TEMPLATE), ("duckdb", DUCKDB_TEMPLATE)];

const STARTER_PROJECT_FILE: &str = r#"# Name your project! Project names should contain only lowercase characters
# and underscores.
name: '{project_name}'
version: '1.0.0'

# This setting configures which "profile" sqlmill uses for this project.
profile: '{profile_name}'

model-paths: ["models"]
analysis-paths: ["analyses"]
test-paths: ["tests"]
seed-paths: ["seeds"]
macro-paths: ["macros"]
snapshot-paths: ["snapshots"]

clean-targets:
  - "target"
  - "sqlmill_packages"

models:
  {project_name}:
    example:
      +materialized: view
"#;

const STARTER_FILES: &[(&str, &str)] = &[
    (
        "models/example/my_first_model.sql",
        "{{ config(materialized='table') }}\n\nwith source_data as (\n    select 1 as id\n    union all\n    select null as id\n)\n\nselect *\nfrom source_data\n",
    ),
    (
        "models/example/my_second_model.sql",
        "select *\nfrom {{ ref('my_first_model') }}\nwhere id = 1\n",
    ),
    (
        "models/example/schema.yml",
        "version: 2\n\nmodels:\n  - name: my_first_model\n    description: \"A starter model\"\n    columns:\n      - name: id\n        description: \"The primary key for this table\"\n        data_tests:\n          - unique\n          - not_null\n\n  - name: my_second_model\n    description: \"A starter model\"\n    columns:\n      - name: id\n        description: \"The primary key for this table\"\n        data_tests:\n          - unique\n          - not_null\n",
    ),
    ("analyses/.gitkeep", ""),
    ("macros/.gitkeep", ""),
    ("seeds/.gitkeep", ""),
    ("snapshots/.gitkeep", ""),
    ("tests/.gitkeep", ""),
    (".gitignore", "\ntarget/\nsqlmill_packages/\nlogs/\n"),
    (
        "README.md",
        "Welcome to your new project!\n\n### Using the starter project\n\nTry running the following commands:\n- sqlmill debug\n- sqlmill selectors\n",
    ),
];

/// One question put to the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub default: Option<String>,
    pub hide_input: bool,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            default: None,
            hide_input: false,
        }
    }
}

pub trait Prompter {
    /// Ask and return the raw answer; an empty answer means "use the default".
    fn ask(&mut self, prompt: &Prompt) -> Result<String, Error>;

    fn confirm(&mut self, message: &str) -> Result<bool, Error>;

    fn say(&mut self, message: &str);
}

/// Line-oriented prompter over any reader/writer pair (stdin/stderr in the CLI).
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R, W> LinePrompter<R, W>
where
    R: BufRead,
    W: Write,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<String, Error> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read answer")
                .with_source(err)
        })?;
        if read == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("input ended before all questions were answered")
                .with_hint("Run `sqlmill init` in an interactive terminal."));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<R, W> Prompter for LinePrompter<R, W>
where
    R: BufRead,
    W: Write,
{
    fn ask(&mut self, prompt: &Prompt) -> Result<String, Error> {
        let suffix = match &prompt.default {
            Some(default) if !prompt.hide_input => format!(" [{default}]"),
            _ => String::new(),
        };
        let _ = write!(self.output, "{}{suffix}: ", prompt.text);
        let _ = self.output.flush();
        self.read_line()
    }

    fn confirm(&mut self, message: &str) -> Result<bool, Error> {
        let _ = write!(self.output, "{message} [y/N]: ");
        let _ = self.output.flush();
        Ok(parse_confirmation(&self.read_line()?))
    }

    fn say(&mut self, message: &str) {
        let _ = writeln!(self.output, "{message}");
    }
}

/// Prompter fed from a fixed list of answers; records every question it is asked.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
    pub said: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
            said: Vec::new(),
        }
    }

    fn next_answer(&mut self, question: &str) -> Result<String, Error> {
        self.asked.push(question.to_string());
        self.answers.pop_front().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!("no answer scripted for '{question}'"))
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, prompt: &Prompt) -> Result<String, Error> {
        self.next_answer(&prompt.text)
    }

    fn confirm(&mut self, message: &str) -> Result<bool, Error> {
        Ok(parse_confirmation(&self.next_answer(message)?))
    }

    fn say(&mut self, message: &str) {
        self.said.push(message.to_string());
    }
}

fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "true" | "1")
}

#[derive(Clone, Debug)]
pub struct InitOptions {
    pub project_name: Option<String>,
    pub profile: Option<String>,
    pub skip_profile_setup: bool,
    pub project_dir: PathBuf,
    pub profiles_dir: PathBuf,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InitSummary {
    pub created_project: Option<PathBuf>,
    pub profile_written: Option<String>,
}

fn project_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\d\W]\w*$").expect("project name pattern is valid"))
}

pub fn is_valid_project_name(name: &str) -> bool {
    project_name_regex().is_match(name)
}

pub fn internal_package_names() -> Vec<String> {
    let mut names = vec![GLOBAL_PROJECT_NAME.to_string()];
    names.extend(
        ADAPTERS
            .iter()
            .map(|(adapter, _)| format!("{GLOBAL_PROJECT_NAME}_{adapter}")),
    );
    names
}

pub fn run(options: &InitOptions, prompter: &mut dyn Prompter) -> Result<InitSummary, Error> {
    if !options.profiles_dir.exists() {
        std::fs::create_dir_all(&options.profiles_dir).map_err(|err| {
            Error::io("failed to create profiles dir", &options.profiles_dir, err)
        })?;
        tracing::info!(dir = %options.profiles_dir.display(), "created profiles directory");
    }

    let mut summary = InitSummary::default();
    if let Some(root) = find_project_root(&options.project_dir) {
        if options.profile.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("cannot init an existing project with --profile")
                .with_hint(format!("Edit {PROJECT_FILE_NAME} to change the profile instead.")));
        }
        if !options.skip_profile_setup {
            let project = read_project(&root)?;
            let profile_name = project.profile.ok_or_else(|| {
                Error::new(ErrorKind::Config)
                    .with_message("project file does not name a profile")
                    .with_path(root.join(PROJECT_FILE_NAME))
            })?;
            let root = root.as_path();
            if setup_profile(&profile_name, Some(root), &options.profiles_dir, prompter)? {
                summary.profile_written = Some(profile_name);
            }
        }
        return Ok(summary);
    }

    let project_name = valid_project_name(options.project_name.as_deref(), prompter)?;
    let project_root = options.project_dir.join(&project_name);
    if project_root.exists() {
        let message = format!("A project called {project_name} already exists here.");
        tracing::warn!("{message}");
        prompter.say(&message);
        return Ok(summary);
    }

    match &options.profile {
        Some(profile_name) => {
            if !read_profiles(&options.profiles_dir)?.contains_key(profile_name) {
                return Err(Error::new(ErrorKind::Config)
                    .with_message(format!("could not find profile named '{profile_name}'"))
                    .with_path(profiles_file(&options.profiles_dir)));
            }
            create_new_project(&project_root, &project_name, profile_name)?;
            summary.created_project = Some(project_root);
        }
        None => {
            create_new_project(&project_root, &project_name, &project_name)?;
            summary.created_project = Some(project_root.clone());
            if !options.skip_profile_setup {
                let root = Some(project_root.as_path());
                if setup_profile(&project_name, root, &options.profiles_dir, prompter)? {
                    summary.profile_written = Some(project_name);
                }
            }
        }
    }
    Ok(summary)
}

fn valid_project_name(initial: Option<&str>, prompter: &mut dyn Prompter) -> Result<String, Error> {
    let internal = internal_package_names();
    let mut name = initial.unwrap_or_default().to_string();
    while !is_valid_project_name(&name) || internal.contains(&name) {
        if !name.is_empty() {
            prompter.say(&format!("{name} is not a valid project name."));
        }
        name = prompter
            .ask(&Prompt::new("Enter a name for your project (letters, digits, underscore)"))?
            .trim()
            .to_string();
    }
    Ok(name)
}

fn create_new_project(root: &Path, project_name: &str, profile_name: &str) -> Result<(), Error> {
    let substitute = |text: &str| {
        text.replace("{project_name}", project_name)
            .replace("{profile_name}", profile_name)
    };
    write_file(&root.join(PROJECT_FILE_NAME), &substitute(STARTER_PROJECT_FILE))?;
    for (relative, contents) in STARTER_FILES {
        write_file(&root.join(relative), contents)?;
    }
    tracing::info!(project = project_name, root = %root.display(), "project created");
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| Error::io("failed to create directory", parent, err))?;
    }
    std::fs::write(path, contents).map_err(|err| Error::io("failed to write file", path, err))
}

/// Set up `profile_name`; returns whether a profile was written.
pub fn setup_profile(
    profile_name: &str,
    project_root: Option<&Path>,
    profiles_dir: &Path,
    prompter: &mut dyn Prompter,
) -> Result<bool, Error> {
    tracing::info!(profile = profile_name, "setting up profile");
    if read_profiles(profiles_dir)?.contains_key(profile_name) {
        let question = format!(
            "The profile {profile_name} already exists in {}. Continue and overwrite it?",
            profiles_file(profiles_dir).display()
        );
        if !prompter.confirm(&question)? {
            return Ok(false);
        }
    }

    if let Some(root) = project_root {
        let template_path = root.join(PROFILE_TEMPLATE_FILE_NAME);
        if template_path.exists() {
            let attempt = read_yaml(&template_path).and_then(|template| {
                create_profile_from_template(&template, profile_name, profiles_dir, prompter)
            });
            match attempt {
                Ok(()) => return Ok(true),
                Err(err) => {
                    tracing::warn!(error = %err, "invalid {PROFILE_TEMPLATE_FILE_NAME}, using adapter templates");
                    prompter.say(&format!(
                        "Invalid {PROFILE_TEMPLATE_FILE_NAME}, falling back to an adapter template."
                    ));
                }
            }
        }
    }

    let adapter = ask_for_adapter_choice(prompter)?;
    let template = ADAPTERS
        .iter()
        .find(|(name, _)| *name == adapter)
        .map(|(_, template)| *template)
        .ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message(format!("no template for adapter {adapter}"))
        })?;
    create_profile_from_template(&parse_yaml(template)?, profile_name, profiles_dir, prompter)?;
    Ok(true)
}

fn ask_for_adapter_choice(prompter: &mut dyn Prompter) -> Result<&'static str, Error> {
    let options: Vec<&str> = ADAPTERS.iter().map(|(name, _)| *name).collect();
    let text = format!(
        "Which database would you like to use?\n{}\n\nEnter a number",
        numbered(&options)
    );
    let index = ask_choice(prompter, &text, options.len())?;
    Ok(ADAPTERS[index].0)
}

fn create_profile_from_template(
    template: &Value,
    profile_name: &str,
    profiles_dir: &Path,
    prompter: &mut dyn Prompter,
) -> Result<(), Error> {
    let template = as_mapping(template, "profile template")?;
    let initial = match template.get("fixed") {
        None | Some(Value::Null) => Map::new(),
        Some(fixed) => as_mapping(fixed, "fixed")?.clone(),
    };
    let prompts = match template.get("prompts") {
        None | Some(Value::Null) => Map::new(),
        Some(prompts) => as_mapping(prompts, "prompts")?.clone(),
    };
    let mut target = generate_target_from_input(&prompts, initial, prompter)?;
    let target_name = match target.remove("target") {
        Some(Value::String(name)) => name,
        Some(other) => other.to_string(),
        None => DEFAULT_TARGET.to_string(),
    };

    let mut outputs = Map::new();
    outputs.insert(target_name.clone(), Value::Object(target));
    let mut profile = Map::new();
    profile.insert("outputs".to_string(), Value::Object(outputs));
    profile.insert("target".to_string(), Value::String(target_name));

    let mut profiles = read_profiles(profiles_dir)?;
    profiles.insert(profile_name.to_string(), Value::Object(profile));
    let path = write_profiles(profiles_dir, &profiles)?;
    prompter.say(&format!("Profile {profile_name} written to {}.", path.display()));
    Ok(())
}

/// Walk a template's prompts, asking the user for each value.
///
/// `_choose_<x>` keys present a numbered menu and recurse into the choice; `_fixed_<x>` keys
/// are copied silently; any other key is a prompt with optional `hint`, `default`, `type`
/// and `hide_input`.
pub fn generate_target_from_input(
    template: &Map<String, Value>,
    mut target: Map<String, Value>,
    prompter: &mut dyn Prompter,
) -> Result<Map<String, Value>, Error> {
    for (key, value) in template {
        if let Some(choice_type) = key.strip_prefix("_choose_") {
            let choices = as_mapping(value, key)?;
            let options: Vec<&str> = choices.keys().map(String::as_str).collect();
            let text = format!(
                "{}\nDesired {} option (enter a number)",
                numbered(&options),
                choice_type.replace('_', " ")
            );
            let index = ask_choice(prompter, &text, options.len())?;
            let chosen = as_mapping(&choices[options[index]], options[index])?;
            target = generate_target_from_input(chosen, target, prompter)?;
        } else if let Some(fixed_key) = key.strip_prefix("_fixed_") {
            target.insert(fixed_key.to_string(), value.clone());
        } else {
            let spec = match value {
                Value::Null => Map::new(),
                other => as_mapping(other, key)?.clone(),
            };
            let answer = ask_typed(prompter, key, &spec)?;
            target.insert(key.clone(), answer);
        }
    }
    Ok(target)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PromptType {
    String,
    Int,
    Float,
    Bool,
}

impl PromptType {
    fn from_spec(spec: &Map<String, Value>, key: &str) -> Result<Option<Self>, Error> {
        match spec.get("type").and_then(Value::as_str) {
            None => Ok(None),
            Some("string") => Ok(Some(PromptType::String)),
            Some("int") => Ok(Some(PromptType::Int)),
            Some("float") => Ok(Some(PromptType::Float)),
            Some("bool") => Ok(Some(PromptType::Bool)),
            Some(other) => Err(Error::new(ErrorKind::Config)
                .with_message(format!("unknown prompt type '{other}' for '{key}'"))
                .with_hint("Use string, int, float or bool.")),
        }
    }

    fn convert(self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            PromptType::String => Some(Value::String(raw.to_string())),
            PromptType::Int => raw.parse::<i64>().ok().map(Value::from),
            PromptType::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            PromptType::Bool => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" | "y" | "on" => Some(Value::Bool(true)),
                "0" | "false" | "f" | "no" | "n" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

fn ask_typed(prompter: &mut dyn Prompter, key: &str, spec: &Map<String, Value>) -> Result<Value, Error> {
    let kind = PromptType::from_spec(spec, key)?;
    let default = spec.get("default").filter(|value| !value.is_null()).cloned();
    let text = match spec.get("hint").and_then(Value::as_str) {
        Some(hint) => format!("{key} ({hint})"),
        None => key.to_string(),
    };
    let prompt = Prompt {
        text,
        default: default.as_ref().map(display_default),
        hide_input: spec.get("hide_input").and_then(Value::as_bool).unwrap_or(false),
    };
    loop {
        let answer = prompter.ask(&prompt)?;
        let raw = if answer.trim().is_empty() {
            match &prompt.default {
                Some(default) => default.clone(),
                None => continue,
            }
        } else {
            answer
        };
        match kind {
            None => return Ok(Value::String(raw)),
            Some(kind) => match kind.convert(&raw) {
                Some(value) => return Ok(value),
                None => prompter.say(&format!("Error: '{raw}' is not a valid {kind:?} value.")),
            },
        }
    }
}

fn ask_choice(prompter: &mut dyn Prompter, text: &str, count: usize) -> Result<usize, Error> {
    if count == 0 {
        return Err(Error::new(ErrorKind::Config).with_message("no options to choose from"));
    }
    let prompt = Prompt::new(text);
    loop {
        let answer = prompter.ask(&prompt)?;
        match answer.trim().parse::<usize>() {
            Ok(choice) if (1..=count).contains(&choice) => return Ok(choice - 1),
            _ => prompter.say(&format!("Error: enter a number between 1 and {count}.")),
        }
    }
}

fn numbered(options: &[&str]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(index, option)| format!("[{}] {option}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn display_default(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn as_mapping<'a>(value: &'a Value, label: &str) -> Result<&'a Map<String, Value>, Error> {
    value.as_object().ok_or_else(|| {
        Error::new(ErrorKind::Config).with_message(format!("'{label}' must be a mapping"))
    })
}
