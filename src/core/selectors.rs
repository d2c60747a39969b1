//! Purpose: Load and normalize named selector definitions from `selectors.yml`.
//! Exports: `SelectorConfig`, `Selector`, `SelectionSpec`, `SelectionCriteria`, `SELECTOR_FILE_NAME`.
//! Role: Turns YAML selector definitions into a typed selection tree.
//! Invariants: A missing selector file is an empty config, not an error.
//! Invariants: At most one selector may be marked `default: true`.
//! Invariants: `method: selector` may only reference selectors defined earlier in the file.
//! Notes: Selection trees are not evaluated here; graph traversal lives with the executor.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::core::render::{process_env, render_value};

pub const SELECTOR_FILE_NAME: &str = "selectors.yml";

const SELECTOR_DOCS_HINT: &str = "Valid root-level selector definitions: union, intersection, string, dictionary. No lists.";

const METHODS: &[&str] = &[
    "fqn",
    "tag",
    "group",
    "access",
    "source",
    "path",
    "file",
    "package",
    "config",
    "test_name",
    "test_type",
    "resource_type",
    "state",
    "exposure",
    "metric",
    "result",
    "source_status",
    "wildcard",
    "version",
    "semantic_model",
    "saved_query",
    "unit_test",
];

const INDIRECT_SELECTION_MODES: &[&str] = &["eager", "cautious", "buildable", "empty"];

const RAW_SELECTOR_PATTERN: &str = r"^(?P<childrens_parents>@)?(?P<parents>(?P<parents_depth>\d*)\+)?((?P<method>[\w.]+):)?(?P<value>.*?)(?P<children>\+(?P<children_depth>\d*))?$";

fn raw_selector_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RAW_SELECTOR_PATTERN).expect("selector pattern is valid"))
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SelectionCriteria {
    pub method: String,
    pub value: String,
    pub childrens_parents: bool,
    pub parents: bool,
    pub parents_depth: Option<u32>,
    pub children: bool,
    pub children_depth: Option<u32>,
    pub indirect_selection: Option<String>,
}

impl SelectionCriteria {
    /// Parse the CLI selection syntax: `[@][N+][method:]value[+N]`.
    pub fn from_single_spec(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        let caps = raw_selector_regex()
            .captures(trimmed)
            .ok_or_else(|| selector_error(format!("invalid selector spec '{raw}'")))?;
        let value = caps
            .name("value")
            .map(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        if value.is_empty() {
            return Err(selector_error(format!("selector spec '{raw}' has no value")));
        }
        let method = match caps.name("method") {
            Some(method) => method.as_str().to_string(),
            None => default_method(&value).to_string(),
        };
        let criteria = SelectionCriteria {
            method,
            value,
            childrens_parents: caps.name("childrens_parents").is_some(),
            parents: caps.name("parents").is_some(),
            parents_depth: parse_depth(caps.name("parents_depth").map(|m| m.as_str()), raw)?,
            children: caps.name("children").is_some(),
            children_depth: parse_depth(caps.name("children_depth").map(|m| m.as_str()), raw)?,
            indirect_selection: None,
        };
        criteria.validate()?;
        Ok(criteria)
    }

    fn from_dict(map: &Map<String, Value>) -> Result<Self, Error> {
        let method = map
            .get("method")
            .and_then(scalar_text)
            .ok_or_else(|| selector_error("selector definition is missing a 'method'"))?;
        let value = map
            .get("value")
            .and_then(scalar_text)
            .ok_or_else(|| selector_error(format!("selector method '{method}' is missing a 'value'")))?;
        let criteria = SelectionCriteria {
            method,
            value,
            childrens_parents: flag(map, "childrens_parents")?,
            parents: flag(map, "parents")?,
            parents_depth: depth(map, "parents_depth")?,
            children: flag(map, "children")?,
            children_depth: depth(map, "children_depth")?,
            indirect_selection: map.get("indirect_selection").and_then(scalar_text),
        };
        criteria.validate()?;
        Ok(criteria)
    }

    fn validate(&self) -> Result<(), Error> {
        let base_method = self.method.split('.').next().unwrap_or_default();
        if !METHODS.contains(&base_method) {
            return Err(selector_error(format!(
                "'{}' is not a valid selection method",
                self.method
            ))
            .with_hint(format!("Valid methods: {}.", METHODS.join(", "))));
        }
        if self.childrens_parents && self.parents {
            return Err(selector_error(format!(
                "invalid node spec '{self}': cannot combine '@' with parent selection"
            )));
        }
        if let Some(mode) = &self.indirect_selection {
            if !INDIRECT_SELECTION_MODES.contains(&mode.as_str()) {
                return Err(selector_error(format!(
                    "invalid indirect_selection '{mode}' (expected one of {})",
                    INDIRECT_SELECTION_MODES.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("method".to_string(), json!(self.method));
        out.insert("value".to_string(), json!(self.value));
        if self.childrens_parents {
            out.insert("childrens_parents".to_string(), json!(true));
        }
        if self.parents {
            out.insert("parents".to_string(), json!(true));
        }
        if let Some(depth) = self.parents_depth {
            out.insert("parents_depth".to_string(), json!(depth));
        }
        if self.children {
            out.insert("children".to_string(), json!(true));
        }
        if let Some(depth) = self.children_depth {
            out.insert("children_depth".to_string(), json!(depth));
        }
        if let Some(mode) = &self.indirect_selection {
            out.insert("indirect_selection".to_string(), json!(mode));
        }
        Value::Object(out)
    }
}

impl fmt::Display for SelectionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.childrens_parents {
            f.write_str("@")?;
        }
        if self.parents {
            if let Some(depth) = self.parents_depth {
                write!(f, "{depth}")?;
            }
            f.write_str("+")?;
        }
        write!(f, "{}:{}", self.method, self.value)?;
        if self.children {
            f.write_str("+")?;
            if let Some(depth) = self.children_depth {
                write!(f, "{depth}")?;
            }
        }
        Ok(())
    }
}

fn default_method(value: &str) -> &'static str {
    let lowered = value.to_ascii_lowercase();
    if value.contains('/') || value.contains('\\') {
        "path"
    } else if [".sql", ".py", ".csv"]
        .iter()
        .any(|suffix| lowered.ends_with(suffix))
    {
        "file"
    } else {
        "fqn"
    }
}

fn parse_depth(text: Option<&str>, raw: &str) -> Result<Option<u32>, Error> {
    match text {
        None | Some("") => Ok(None),
        Some(digits) => digits
            .parse::<u32>()
            .map(Some)
            .map_err(|_| selector_error(format!("invalid depth in selector spec '{raw}'"))),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(num) => Some(num.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> Result<bool, Error> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(selector_error(format!("'{key}' must be true or false, got {other}"))),
    }
}

fn depth(map: &Map<String, Value>, key: &str) -> Result<Option<u32>, Error> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(num)) => num
            .as_u64()
            .and_then(|depth| u32::try_from(depth).ok())
            .map(Some)
            .ok_or_else(|| selector_error(format!("'{key}' must be a non-negative integer"))),
        Some(other) => Err(selector_error(format!("'{key}' must be an integer, got {other}"))),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectionSpec {
    Criteria(SelectionCriteria),
    Union(Vec<SelectionSpec>),
    Intersection(Vec<SelectionSpec>),
    Difference {
        include: Box<SelectionSpec>,
        exclude: Box<SelectionSpec>,
    },
}

impl SelectionSpec {
    pub fn to_json(&self) -> Value {
        match self {
            SelectionSpec::Criteria(criteria) => criteria.to_json(),
            SelectionSpec::Union(parts) => {
                json!({"union": parts.iter().map(SelectionSpec::to_json).collect::<Vec<_>>()})
            }
            SelectionSpec::Intersection(parts) => json!({
                "intersection": parts.iter().map(SelectionSpec::to_json).collect::<Vec<_>>()
            }),
            SelectionSpec::Difference { include, exclude } => json!({
                "difference": [include.to_json(), exclude.to_json()]
            }),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Selector {
    pub name: String,
    pub description: Option<String>,
    pub default: bool,
    pub definition: SelectionSpec,
}

#[derive(Deserialize)]
struct SelectorFile {
    selectors: Vec<SelectorEntry>,
}

#[derive(Deserialize)]
struct SelectorEntry {
    name: String,
    definition: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<bool>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SelectorConfig {
    selectors: Vec<Selector>,
}

impl SelectorConfig {
    /// Parse already-rendered selector data (the YAML document as JSON).
    pub fn from_value(data: Value) -> Result<Self, Error> {
        let data = if data.is_null() {
            json!({"selectors": []})
        } else {
            data
        };
        let file: SelectorFile = serde_json::from_value(data).map_err(|err| {
            selector_error("could not parse selector file data")
                .with_hint(SELECTOR_DOCS_HINT)
                .with_source(err)
        })?;
        validate_single_default(&file.selectors)?;

        let mut known: BTreeMap<String, SelectionSpec> = BTreeMap::new();
        let mut selectors = Vec::with_capacity(file.selectors.len());
        for entry in file.selectors {
            if entry.definition.is_array() {
                return Err(selector_error(format!(
                    "selector '{}' has a list as its definition",
                    entry.name
                ))
                .with_hint(SELECTOR_DOCS_HINT));
            }
            let definition = parse_definition(&entry.definition, &known).map_err(|err| {
                let message = err.message().unwrap_or("invalid definition").to_string();
                err.with_message(format!("selector '{}': {message}", entry.name))
            })?;
            known.insert(entry.name.clone(), definition.clone());
            selectors.push(Selector {
                name: entry.name,
                description: entry.description,
                default: entry.default.unwrap_or(false),
                definition,
            });
        }
        tracing::debug!(count = selectors.len(), "parsed selectors");
        Ok(Self { selectors })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, Error> {
        let data: Value = serde_yaml::from_str(text).map_err(|err| {
            selector_error("could not read selector file")
                .with_hint("Check that selectors.yml is valid YAML.")
                .with_source(err)
        })?;
        let rendered = render_value(data, &process_env)?;
        Self::from_value(rendered)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let text = read_selector_file(path)?;
        if text.trim().is_empty() {
            return Err(selector_error("no data found in selector file").with_path(path));
        }
        Self::from_file_text(&text, path)
    }

    /// Load `selectors.yml` from a project root; absent or blank means no selectors.
    pub fn from_project_root(project_root: &Path) -> Result<Self, Error> {
        let path = selector_path(project_root);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no selector file");
            return Ok(Self::default());
        }
        let text = read_selector_file(&path)?;
        if text.trim().is_empty() {
            tracing::debug!(path = %path.display(), "blank selector file");
            return Ok(Self::default());
        }
        Self::from_file_text(&text, &path)
    }

    fn from_file_text(text: &str, path: &Path) -> Result<Self, Error> {
        Self::from_yaml_str(text).map_err(|err| match err.kind() {
            ErrorKind::Config => err.with_kind(ErrorKind::Selector).with_path(path),
            _ => err.with_path(path),
        })
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn names(&self) -> Vec<String> {
        self.selectors.iter().map(|s| s.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Selector> {
        self.selectors.iter().find(|s| s.name == name)
    }

    pub fn default_selector(&self) -> Option<&Selector> {
        self.selectors.iter().find(|s| s.default)
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

pub fn selector_path(project_root: &Path) -> PathBuf {
    project_root.join(SELECTOR_FILE_NAME)
}

fn read_selector_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| Error::io("failed to read selector file", path, err))
}

fn validate_single_default(entries: &[SelectorEntry]) -> Result<(), Error> {
    let mut defaults = entries.iter().filter(|entry| entry.default == Some(true));
    if let (Some(first), Some(second)) = (defaults.next(), defaults.next()) {
        return Err(selector_error(format!(
            "found multiple selectors with `default: true`: {} and {}",
            first.name, second.name
        )));
    }
    Ok(())
}

fn parse_definition(
    definition: &Value,
    known: &BTreeMap<String, SelectionSpec>,
) -> Result<SelectionSpec, Error> {
    match definition {
        Value::String(spec) => Ok(SelectionSpec::Criteria(SelectionCriteria::from_single_spec(
            spec,
        )?)),
        Value::Object(map) => {
            if let Some(items) = map.get("union") {
                return parse_set(items, known, SelectionSpec::Union, "union");
            }
            if let Some(items) = map.get("intersection") {
                return parse_set(items, known, SelectionSpec::Intersection, "intersection");
            }
            parse_dict(map, known)
        }
        other => Err(selector_error(format!(
            "unsupported selector definition {other}"
        ))
        .with_hint(SELECTOR_DOCS_HINT)),
    }
}

fn parse_dict(
    map: &Map<String, Value>,
    known: &BTreeMap<String, SelectionSpec>,
) -> Result<SelectionSpec, Error> {
    if map.contains_key("exclude") && map.len() == 1 {
        return Err(selector_error(
            "'exclude' is only valid inside a union or intersection",
        ));
    }

    if map.get("method").and_then(Value::as_str) == Some("selector") {
        let name = map
            .get("value")
            .and_then(scalar_text)
            .ok_or_else(|| selector_error("selector reference is missing a 'value'"))?;
        return known.get(&name).cloned().ok_or_else(|| {
            selector_error(format!("existing selector definition for {name} not found"))
        });
    }

    let include = if map.contains_key("method") {
        SelectionCriteria::from_dict(map)?
    } else {
        let mut entries = map.iter().filter(|(key, _)| key.as_str() != "exclude");
        let (method, value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(selector_error(
                    "selector mappings need a 'method' key or exactly one method: value pair",
                ));
            }
        };
        if method == "selector" {
            let mut reference = Map::new();
            reference.insert("method".to_string(), json!("selector"));
            reference.insert("value".to_string(), value.clone());
            return parse_dict(&reference, known);
        }
        let value = scalar_text(value).ok_or_else(|| {
            selector_error(format!("value for method '{method}' must be a scalar"))
        })?;
        let criteria = SelectionCriteria {
            method: method.clone(),
            value,
            ..SelectionCriteria::default()
        };
        criteria.validate()?;
        criteria
    };

    match map.get("exclude") {
        None => Ok(SelectionSpec::Criteria(include)),
        Some(excluded) => Ok(SelectionSpec::Difference {
            include: Box::new(SelectionSpec::Criteria(include)),
            exclude: Box::new(parse_excludes(excluded, known)?),
        }),
    }
}

fn parse_set(
    items: &Value,
    known: &BTreeMap<String, SelectionSpec>,
    combine: fn(Vec<SelectionSpec>) -> SelectionSpec,
    label: &str,
) -> Result<SelectionSpec, Error> {
    let Value::Array(items) = items else {
        return Err(selector_error(format!("'{label}' must be a list")));
    };
    let mut includes = Vec::new();
    let mut excludes = Vec::new();
    for item in items {
        match item {
            Value::Object(map) if map.len() == 1 && map.contains_key("exclude") => {
                excludes.push(parse_excludes(&map["exclude"], known)?);
            }
            other => includes.push(parse_definition(other, known)?),
        }
    }
    let combined = combine(includes);
    if excludes.is_empty() {
        return Ok(combined);
    }
    let exclude = if excludes.len() == 1 {
        excludes.remove(0)
    } else {
        SelectionSpec::Union(excludes)
    };
    Ok(SelectionSpec::Difference {
        include: Box::new(combined),
        exclude: Box::new(exclude),
    })
}

fn parse_excludes(
    excluded: &Value,
    known: &BTreeMap<String, SelectionSpec>,
) -> Result<SelectionSpec, Error> {
    match excluded {
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| parse_definition(item, known))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SelectionSpec::Union(parts))
        }
        other => parse_definition(other, known),
    }
}

fn selector_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Selector).with_message(message)
}
