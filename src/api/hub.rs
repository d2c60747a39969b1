//! Purpose: Blocking HTTP client for the package hub index and package metadata.
//! Exports: `HubClient`, `DEFAULT_HUB_URL`, `HUB_URL_ENV`, `default_hub_url`,
//! `validate_package_response`.
//! Role: Fetches `api/v1/<name>.json` and `api/v1/index.json`, checks their shape, memoises them.
//! Invariants: Package responses are objects with `name` and `versions`; index responses are lists.
//! Invariants: Transport failures, 5xx responses and malformed bodies are retried; 4xx are not.
//! Invariants: A package is fetched at most once per client unless the fetch failed.
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::semver::{Version, is_compatible_version};

pub const DEFAULT_HUB_URL: &str = "https://hub.getdbt.com/";
pub const HUB_URL_ENV: &str = "SQLMILL_PACKAGE_HUB_URL";

const DEFAULT_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PACKAGE_KEYS: [&str; 2] = ["name", "versions"];
const VERSION_KEYS: [&str; 3] = ["name", "packages", "downloads"];

type ApiResult<T> = Result<T, Error>;

/// Hub base URL from `SQLMILL_PACKAGE_HUB_URL`, else the public hub.
pub fn default_hub_url() -> String {
    resolve_hub_url(std::env::var(HUB_URL_ENV).ok())
}

fn resolve_hub_url(raw: Option<String>) -> String {
    raw.filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HUB_URL.to_string())
}

pub struct HubClient {
    base_url: Url,
    agent: ureq::Agent,
    attempts: u32,
    retry_delay: Duration,
    packages: Mutex<HashMap<String, Map<String, Value>>>,
    index: Mutex<Option<Vec<String>>>,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            base_url,
            agent,
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            packages: Mutex::new(HashMap::new()),
            index: Mutex::new(None),
        })
    }

    pub fn from_env() -> ApiResult<Self> {
        Self::new(default_hub_url())
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn package_url(&self, name: &str) -> ApiResult<Url> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("package name must not be empty")
                .with_hint("Use a hub name like `dbt-labs/dbt_utils`."));
        }
        self.join(&format!("api/v1/{name}.json"))
    }

    pub fn index_url(&self) -> ApiResult<Url> {
        self.join("api/v1/index.json")
    }

    /// Metadata for every published version of `name`, keyed by version string.
    pub fn package_versions(&self, name: &str) -> ApiResult<Map<String, Value>> {
        let response = self.package(name)?;
        match response.get("versions") {
            Some(Value::Object(versions)) => Ok(versions.clone()),
            _ => Err(Error::new(ErrorKind::Registry)
                .with_message(format!("package '{name}' has no versions object"))),
        }
    }

    pub fn package_version(&self, name: &str, version: &str) -> ApiResult<Value> {
        let mut versions = self.package_versions(name)?;
        versions.remove(version).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("package '{name}' has no version '{version}'"))
                .with_hint(format!("Run `sqlmill hub versions {name}` to list versions."))
        })
    }

    /// Versions of `name` usable with `tool_version`, oldest first.
    pub fn compatible_versions(
        &self,
        name: &str,
        tool_version: &Version,
        check_compatibility: bool,
    ) -> ApiResult<Vec<String>> {
        let versions = self.package_versions(name)?;
        let mut names = Vec::with_capacity(versions.len());
        for (version, info) in &versions {
            if !check_compatibility || is_compatible_version(info, tool_version)? {
                names.push(version.clone());
            }
        }
        sort_versions(&mut names);
        Ok(names)
    }

    /// Every package name the hub publishes.
    pub fn index(&self) -> ApiResult<Vec<String>> {
        let cached = self.index.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(names) = cached {
            return Ok(names);
        }
        let url = self.index_url()?;
        let names = self.with_retries(|| {
            let value = self.get_json(&url)?;
            parse_index(value)
        })?;
        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = Some(names.clone());
        Ok(names)
    }

    fn package(&self, name: &str) -> ApiResult<Map<String, Value>> {
        let cached = self
            .packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(response) = cached {
            tracing::debug!(package = name, "hub cache hit");
            return Ok(response);
        }
        // The cache lock is not held across the fetch.
        let url = self.package_url(name)?;
        let response = self.with_retries(|| {
            let value = self.get_json(&url)?;
            validate_package_response(value)
        })?;
        warn_package_redirect(name, &response);
        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), response.clone());
        Ok(response)
    }

    fn join(&self, path: &str) -> ApiResult<Url> {
        self.base_url.join(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid hub path '{path}'"))
                .with_source(err)
        })
    }

    fn get_json(&self, url: &Url) -> ApiResult<Value> {
        tracing::debug!(url = %url, "hub request");
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(status_error(code, url)),
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message(format!("failed to reach package hub at {url}"))
                    .with_hint("Check the network or set SQLMILL_PACKAGE_HUB_URL.")
                    .with_source(err));
            }
        };
        tracing::debug!(url = %url, status = response.status(), "hub response");
        read_json_response(response)
    }

    fn with_retries<T, F>(&self, mut f: F) -> ApiResult<T>
    where
        F: FnMut() -> ApiResult<T>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match f() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempts < self.attempts && is_retryable(&err) {
                        tracing::debug!(attempt = attempts, error = %err, "retrying hub request");
                        std::thread::sleep(self.retry_delay);
                        continue;
                    }
                    if attempts > 1 {
                        return Err(add_retry_hint(err, attempts));
                    }
                    return Err(err);
                }
            }
        }
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid hub url")
            .with_source(err)
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("hub url must use http or https"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn status_error(code: u16, url: &Url) -> Error {
    let kind = match code {
        404 => ErrorKind::NotFound,
        500..=599 => ErrorKind::Io,
        _ => ErrorKind::Internal,
    };
    Error::new(kind).with_message(format!("hub returned status {code} for {url}"))
}

fn read_json_response(response: ureq::Response) -> ApiResult<Value> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read hub response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Registry)
            .with_message("hub response is not valid json")
            .with_source(err)
    })
}

fn is_retryable(err: &Error) -> bool {
    matches!(err.kind(), ErrorKind::Io | ErrorKind::Registry)
}

fn add_retry_hint(err: Error, attempts: u32) -> Error {
    let info = format!("Gave up after {attempts} attempts.");
    if let Some(hint) = err.hint().map(|hint| hint.to_string()) {
        err.with_hint(format!("{hint} {info}"))
    } else {
        err.with_hint(info)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check a package response's shape and hand back its top-level object.
pub fn validate_package_response(value: Value) -> ApiResult<Map<String, Value>> {
    let response = match value {
        Value::Object(response) => response,
        other => {
            return Err(Error::new(ErrorKind::Registry).with_message(format!(
                "expected a package object but got {}",
                json_type_name(&other)
            )));
        }
    };

    let missing: Vec<&str> = PACKAGE_KEYS
        .into_iter()
        .filter(|key| !response.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(Error::new(ErrorKind::Registry).with_message(format!(
            "package response is missing keys: {}",
            missing.join(", ")
        )));
    }

    let Some(Value::Object(versions)) = response.get("versions") else {
        return Err(Error::new(ErrorKind::Registry).with_message("package versions must be an object"));
    };
    let missing: Vec<&str> = VERSION_KEYS
        .into_iter()
        .filter(|key| {
            !versions
                .values()
                .any(|info| info.as_object().is_some_and(|info| info.contains_key(*key)))
        })
        .collect();
    if !missing.is_empty() {
        return Err(Error::new(ErrorKind::Registry).with_message(format!(
            "package versions are missing keys: {}",
            missing.join(", ")
        )));
    }

    Ok(response)
}

fn parse_index(value: Value) -> ApiResult<Vec<String>> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(Error::new(ErrorKind::Registry).with_message(format!(
                "expected a package index list but got {}",
                json_type_name(&other)
            )));
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Ok(name),
            other => Err(Error::new(ErrorKind::Registry)
                .with_message(format!("unexpected index entry {other}"))),
        })
        .collect()
}

/// The `namespace/name` a package response redirects to, if it carries redirect keys.
pub fn package_redirect(response: &Map<String, Value>) -> Option<String> {
    if !response.contains_key("redirectnamespace") && !response.contains_key("redirectname") {
        return None;
    }
    let pick = |redirect: &str, current: &str| {
        response
            .get(redirect)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .or_else(|| response.get(current).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    };
    let namespace = pick("redirectnamespace", "namespace");
    let new_name = pick("redirectname", "name");
    Some(format!("{namespace}/{new_name}"))
}

fn warn_package_redirect(name: &str, response: &Map<String, Value>) {
    if let Some(target) = package_redirect(response) {
        tracing::warn!("package '{name}' has moved to '{target}'; update your packages file");
    }
}

fn sort_versions(names: &mut [String]) {
    names.sort_by(|left, right| {
        match (left.parse::<Version>(), right.parse::<Version>()) {
            (Ok(left), Ok(right)) => left.cmp(&right),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => left.cmp(right),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_HUB_URL, HubClient, normalize_base_url, package_redirect, parse_index,
        resolve_hub_url, sort_versions, validate_package_response,
    };
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn hub_url_falls_back_to_public_hub() {
        assert_eq!(resolve_hub_url(None), DEFAULT_HUB_URL);
        assert_eq!(resolve_hub_url(Some("  ".to_string())), DEFAULT_HUB_URL);
        assert_eq!(
            resolve_hub_url(Some("http://mirror.local/".to_string())),
            "http://mirror.local/"
        );
    }

    #[test]
    fn base_url_keeps_path_with_trailing_slash() {
        let url = normalize_base_url("https://mirror.local/hub".to_string()).expect("url");
        assert_eq!(url.as_str(), "https://mirror.local/hub/");
        assert!(normalize_base_url("ftp://mirror.local".to_string()).is_err());
    }

    #[test]
    fn package_urls_follow_api_layout() {
        let client = HubClient::new("https://hub.example.com").expect("client");
        assert_eq!(
            client.package_url("dbt-labs/dbt_utils").expect("url").as_str(),
            "https://hub.example.com/api/v1/dbt-labs/dbt_utils.json"
        );
        assert_eq!(
            client.index_url().expect("url").as_str(),
            "https://hub.example.com/api/v1/index.json"
        );
        let err = client.package_url(" ").expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn package_response_shape_is_checked() {
        let good = json!({
            "name": "dbt_utils",
            "versions": {
                "1.0.0": {"name": "dbt_utils", "packages": [], "downloads": {"tarball": "x"}}
            }
        });
        assert!(validate_package_response(good).is_ok());

        let err = validate_package_response(json!(["not", "an", "object"])).expect_err("list");
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert!(err.message().unwrap().contains("array"));

        let err = validate_package_response(json!({"name": "x"})).expect_err("no versions");
        assert!(err.message().unwrap().contains("versions"));

        let err = validate_package_response(json!({
            "name": "x",
            "versions": {"1.0.0": {"name": "x", "packages": []}}
        }))
        .expect_err("no downloads");
        assert!(err.message().unwrap().contains("downloads"));
    }

    #[test]
    fn index_must_be_a_list_of_names() {
        assert_eq!(
            parse_index(json!(["a/b", "c/d"])).expect("index"),
            vec!["a/b".to_string(), "c/d".to_string()]
        );
        assert_eq!(
            parse_index(json!({"a": 1})).expect_err("object").kind(),
            ErrorKind::Registry
        );
    }

    #[test]
    fn versions_sort_semantically() {
        let mut names = vec![
            "1.10.0".to_string(),
            "nightly".to_string(),
            "1.2.0".to_string(),
            "1.2.0-rc1".to_string(),
        ];
        sort_versions(&mut names);
        assert_eq!(names, vec!["1.2.0-rc1", "1.2.0", "1.10.0", "nightly"]);
    }

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn redirect_target_prefers_redirect_keys() {
        let both = object(json!({
            "name": "utils",
            "namespace": "acme",
            "redirectnamespace": "acme-labs",
            "redirectname": "sql_utils"
        }));
        assert_eq!(package_redirect(&both).as_deref(), Some("acme-labs/sql_utils"));

        let name_only = object(json!({
            "name": "utils",
            "namespace": "acme",
            "redirectname": "sql_utils"
        }));
        assert_eq!(package_redirect(&name_only).as_deref(), Some("acme/sql_utils"));

        let blank_namespace = object(json!({
            "name": "utils",
            "namespace": "acme",
            "redirectnamespace": "",
            "redirectname": null
        }));
        assert_eq!(package_redirect(&blank_namespace).as_deref(), Some("acme/utils"));

        let plain = object(json!({"name": "utils", "namespace": "acme"}));
        assert_eq!(package_redirect(&plain), None);
    }
}
