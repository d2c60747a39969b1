//! Purpose: Field metadata items and the left-to-right fold that combines them.
//! Exports: `Metadata`, `MergeBehavior`, `ShowBehavior`, `CompareBehavior`, `metas`.
//! Role: Config schemas describe each field with merged metadata maps.
//! Invariants: Folding starts from an empty map; later items override earlier keys.
use serde_json::{Map, Value};

/// A metadata item contributes keys to a map built up by earlier items.
pub trait Metadata {
    fn meta(&self, existing: Map<String, Value>) -> Map<String, Value>;
}

impl Metadata for Map<String, Value> {
    fn meta(&self, mut existing: Map<String, Value>) -> Map<String, Value> {
        for (key, value) in self {
            existing.insert(key.clone(), value.clone());
        }
        existing
    }
}

pub fn metas(items: &[&dyn Metadata]) -> Map<String, Value> {
    items
        .iter()
        .fold(Map::new(), |existing, item| item.meta(existing))
}

/// How a layered config value combines with the value underneath it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MergeBehavior {
    Append,
    Update,
    #[default]
    Clobber,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ShowBehavior {
    #[default]
    Show,
    Hide,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompareBehavior {
    #[default]
    Include,
    Exclude,
}

impl MergeBehavior {
    pub const KEY: &'static str = "merge";

    pub fn as_str(self) -> &'static str {
        match self {
            MergeBehavior::Append => "append",
            MergeBehavior::Update => "update",
            MergeBehavior::Clobber => "clobber",
        }
    }

    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        match metadata.get(Self::KEY).and_then(Value::as_str) {
            Some("append") => MergeBehavior::Append,
            Some("update") => MergeBehavior::Update,
            _ => MergeBehavior::Clobber,
        }
    }
}

impl ShowBehavior {
    pub const KEY: &'static str = "show_hide";

    pub fn as_str(self) -> &'static str {
        match self {
            ShowBehavior::Show => "show",
            ShowBehavior::Hide => "hide",
        }
    }

    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        match metadata.get(Self::KEY).and_then(Value::as_str) {
            Some("hide") => ShowBehavior::Hide,
            _ => ShowBehavior::Show,
        }
    }
}

impl CompareBehavior {
    pub const KEY: &'static str = "compare";

    pub fn as_str(self) -> &'static str {
        match self {
            CompareBehavior::Include => "include",
            CompareBehavior::Exclude => "exclude",
        }
    }

    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        match metadata.get(Self::KEY).and_then(Value::as_str) {
            Some("exclude") => CompareBehavior::Exclude,
            _ => CompareBehavior::Include,
        }
    }
}

macro_rules! keyed_metadata {
    ($($ty:ty),+) => {
        $(
            impl Metadata for $ty {
                fn meta(&self, mut existing: Map<String, Value>) -> Map<String, Value> {
                    existing.insert(Self::KEY.to_string(), Value::from(self.as_str()));
                    existing
                }
            }
        )+
    };
}

keyed_metadata!(MergeBehavior, ShowBehavior, CompareBehavior);
