//! Purpose: Parse versions and version specifiers used by package compatibility checks.
//! Exports: `Version`, `VersionSpecifier`, `Matcher`, `is_compatible_version`.
//! Role: Decide whether a tool version satisfies a package's `require_dbt_version`.
//! Invariants: Missing minor/patch components read as 0.
//! Invariants: A pre-release sorts before the release with the same numbers.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(left), Some(right)) => compare_prerelease(left, right),
            })
    }
}

/// Dot-separated identifiers compared in order; digit runs compare numerically.
fn compare_prerelease(left: &str, right: &str) -> Ordering {
    let mut lefts = left.split('.');
    let mut rights = right.split('.');
    loop {
        match (lefts.next(), rights.next()) {
            (None, None) => return left.cmp(right),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match compare_identifier(l, r) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

fn compare_identifier(left: &str, right: &str) -> Ordering {
    let mut lefts = identifier_runs(left).into_iter();
    let mut rights = identifier_runs(right).into_iter();
    loop {
        let ordering = match (lefts.next(), rights.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let l_digits = l.starts_with(|c: char| c.is_ascii_digit());
                let r_digits = r.starts_with(|c: char| c.is_ascii_digit());
                match (l_digits, r_digits) {
                    (true, true) => compare_digits(l, r),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => l.cmp(r),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

// Arbitrary-length digit strings: fewer significant digits is smaller.
fn compare_digits(left: &str, right: &str) -> Ordering {
    let left = left.trim_start_matches('0');
    let right = right.trim_start_matches('0');
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

fn identifier_runs(identifier: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut previous: Option<bool> = None;
    for (index, ch) in identifier.char_indices() {
        let digit = ch.is_ascii_digit();
        if previous.is_some_and(|was_digit| was_digit != digit) {
            runs.push(&identifier[start..index]);
            start = index;
        }
        previous = Some(digit);
    }
    if start < identifier.len() {
        runs.push(&identifier[start..]);
    }
    runs
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim().trim_start_matches('v');
        let without_build = trimmed.split('+').next().unwrap_or_default();
        let (numbers, prerelease) = match without_build.split_once('-') {
            Some((numbers, pre)) if !pre.is_empty() => (numbers, Some(pre.to_string())),
            Some(_) => return Err(invalid_version(input)),
            None => (without_build, None),
        };
        let mut parts = numbers.split('.');
        let major = parse_component(parts.next(), input)?
            .ok_or_else(|| invalid_version(input))?;
        let minor = parse_component(parts.next(), input)?.unwrap_or(0);
        let patch = parse_component(parts.next(), input)?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(invalid_version(input));
        }
        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
        })
    }
}

fn parse_component(part: Option<&str>, input: &str) -> Result<Option<u64>, Error> {
    match part {
        None => Ok(None),
        Some(text) => text
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid_version(input)),
    }
}

fn invalid_version(input: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid version '{input}'"))
        .with_hint("Use MAJOR.MINOR.PATCH, optionally prefixed with a comparison like >=.")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Matcher {
    Exact,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Matcher {
    fn as_str(self) -> &'static str {
        match self {
            Matcher::Exact => "=",
            Matcher::Greater => ">",
            Matcher::GreaterOrEqual => ">=",
            Matcher::Less => "<",
            Matcher::LessOrEqual => "<=",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionSpecifier {
    pub matcher: Matcher,
    pub version: Version,
}

impl VersionSpecifier {
    pub fn matches(&self, candidate: &Version) -> bool {
        let ordering = candidate.cmp(&self.version);
        match self.matcher {
            Matcher::Exact => ordering == Ordering::Equal,
            Matcher::Greater => ordering == Ordering::Greater,
            Matcher::GreaterOrEqual => ordering != Ordering::Less,
            Matcher::Less => ordering == Ordering::Less,
            Matcher::LessOrEqual => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.matcher.as_str(), self.version)
    }
}

impl FromStr for VersionSpecifier {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (matcher, rest) = [
            (">=", Matcher::GreaterOrEqual),
            ("<=", Matcher::LessOrEqual),
            ("==", Matcher::Exact),
            (">", Matcher::Greater),
            ("<", Matcher::Less),
            ("=", Matcher::Exact),
        ]
        .into_iter()
        .find_map(|(prefix, matcher)| trimmed.strip_prefix(prefix).map(|rest| (matcher, rest)))
        .unwrap_or((Matcher::Exact, trimmed));
        Ok(VersionSpecifier {
            matcher,
            version: rest.parse()?,
        })
    }
}

/// Parse a `require_dbt_version` value: absent, one string, or a list of strings.
///
/// A single string may hold several comma-separated specifiers.
pub fn parse_requirements(value: Option<&Value>) -> Result<Vec<VersionSpecifier>, Error> {
    let raw: Vec<&str> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(text)) => vec![text.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(other) => {
            return Err(Error::new(ErrorKind::Registry)
                .with_message(format!("unsupported version requirement {other}")));
        }
    };
    raw.into_iter()
        .flat_map(|text| text.split(','))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.parse::<VersionSpecifier>())
        .collect()
}

/// A package spec is compatible when it has no requirement or `version` satisfies all of them.
pub fn is_compatible_version(package_spec: &Value, version: &Version) -> Result<bool, Error> {
    let specifiers = parse_requirements(package_spec.get("require_dbt_version"))?;
    Ok(specifiers.iter().all(|spec| spec.matches(version)))
}

#[cfg(test)]
mod tests {
    use super::{Matcher, Version, VersionSpecifier, is_compatible_version, parse_requirements};
    use serde_json::json;

    fn v(text: &str) -> Version {
        text.parse().expect("version")
    }

    #[test]
    fn versions_order_numerically_and_prerelease_first() {
        assert!(v("1.10.0") > v("1.9.3"));
        assert!(v("1.8.0-rc1") < v("1.8.0"));
        assert!(v("1.8.0-b1") < v("1.8.0-rc1"));
        assert_eq!(v("1"), v("1.0.0"));
        assert_eq!(v("v1.2.3+build.7").to_string(), "1.2.3");
    }

    #[test]
    fn prerelease_numbers_compare_numerically() {
        assert!(v("1.0.0-rc10") > v("1.0.0-rc2"));
        assert!(v("1.0.0-beta.11") > v("1.0.0-beta.2"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
        assert!(v("1.0.0-rc1") < v("1.0.0-rc1a"));
        assert!(v("1.0.0-rc01") != v("1.0.0-rc1"));
        assert_ne!(v("1.0.0-rc01").cmp(&v("1.0.0-rc1")), std::cmp::Ordering::Equal);
    }

    #[test]
    fn malformed_versions_are_rejected() {
        for bad in ["", "x.1", "1.2.3.4", "1.2-"] {
            assert!(bad.parse::<Version>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn specifiers_parse_matchers() {
        let spec: VersionSpecifier = ">=1.3.0".parse().expect("spec");
        assert_eq!(spec.matcher, Matcher::GreaterOrEqual);
        assert!(spec.matches(&v("1.3.0")));
        assert!(!spec.matches(&v("1.2.9")));

        let spec: VersionSpecifier = "1.5.0".parse().expect("spec");
        assert_eq!(spec.matcher, Matcher::Exact);
        assert_eq!(spec.to_string(), "=1.5.0");
    }

    #[test]
    fn missing_requirement_is_always_compatible() {
        assert!(is_compatible_version(&json!({}), &v("0.1.0")).expect("ok"));
        let empty = json!({"require_dbt_version": []});
        assert!(is_compatible_version(&empty, &v("9.0.0")).expect("ok"));
    }

    #[test]
    fn list_and_comma_requirements_must_all_match() {
        let spec = json!({"require_dbt_version": [">=1.3.0", "<2.0.0"]});
        assert!(is_compatible_version(&spec, &v("1.8.2")).expect("ok"));
        assert!(!is_compatible_version(&spec, &v("2.0.0")).expect("ok"));

        let spec = json!({"require_dbt_version": ">=1.0.0, <1.5.0"});
        assert!(!is_compatible_version(&spec, &v("1.6.0")).expect("ok"));
        assert_eq!(
            parse_requirements(spec.get("require_dbt_version"))
                .expect("specs")
                .len(),
            2
        );
    }

    #[test]
    fn non_string_requirement_is_a_registry_error() {
        let err = is_compatible_version(&json!({"require_dbt_version": 5}), &v("1.0.0"))
            .expect_err("number rejected");
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Registry);
    }
}
