//! TMVA option strings (`"!H:!V:NTrees=1000:BoostType=Grad"`).

use mb_core::{Error, Result};
use serde::{Deserialize, Serialize, Serializer};

/// One item of a colon-separated TMVA option string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionItem {
    /// `Flag` (true) or `!Flag` (false).
    Flag { name: String, on: bool },
    /// `Key=Value`.
    Value { key: String, value: String },
}

impl OptionItem {
    /// Parse a single item.
    pub fn parse(item: &str) -> Result<Self> {
        let item = item.trim();
        if item.is_empty() {
            return Err(Error::Validation("empty TMVA option item".to_string()));
        }
        if item.contains(':') {
            return Err(Error::Validation(format!(
                "TMVA option item '{item}' must not contain ':'"
            )));
        }
        if let Some((key, value)) = item.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(Error::Validation(format!("malformed TMVA option '{item}'")));
            }
            return Ok(OptionItem::Value { key: key.to_string(), value: value.to_string() });
        }
        let (name, on) = match item.strip_prefix('!') {
            Some(rest) => (rest.trim(), false),
            None => (item, true),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Validation(format!("malformed TMVA flag '{item}'")));
        }
        Ok(OptionItem::Flag { name: name.to_string(), on })
    }

    /// Option key, case-insensitive in TMVA.
    pub fn key(&self) -> &str {
        match self {
            OptionItem::Flag { name, .. } => name,
            OptionItem::Value { key, .. } => key,
        }
    }
}

impl std::fmt::Display for OptionItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionItem::Flag { name, on: true } => f.write_str(name),
            OptionItem::Flag { name, on: false } => write!(f, "!{name}"),
            OptionItem::Value { key, value } => write!(f, "{key}={value}"),
        }
    }
}

/// Ordered TMVA option list. Order is preserved when rendering.
///
/// Deserializes from either a YAML/JSON list of items or an already
/// colon-joined string; serializes as the joined string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "OptionsRepr")]
pub struct TmvaOptions {
    items: Vec<OptionItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsRepr {
    List(Vec<String>),
    Joined(String),
}

impl TryFrom<OptionsRepr> for TmvaOptions {
    type Error = Error;

    fn try_from(repr: OptionsRepr) -> Result<Self> {
        match repr {
            OptionsRepr::List(items) => TmvaOptions::from_items(&items),
            OptionsRepr::Joined(s) => TmvaOptions::parse(&s),
        }
    }
}

impl Serialize for TmvaOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

impl TmvaOptions {
    /// Parse a colon-joined option string. An empty string is an empty list.
    pub fn parse(joined: &str) -> Result<Self> {
        if joined.trim().is_empty() {
            return Ok(Self::default());
        }
        let items: Vec<&str> = joined.split(':').collect();
        Self::from_items(&items)
    }

    /// Build from individual items, rejecting duplicate keys.
    pub fn from_items<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut out = Self::default();
        for item in items {
            out.push(OptionItem::parse(item.as_ref())?)?;
        }
        Ok(out)
    }

    /// Append an item; TMVA keys are case-insensitive so `ntrees` and
    /// `NTrees` collide.
    pub fn push(&mut self, item: OptionItem) -> Result<()> {
        if self.get(item.key()).is_some() {
            return Err(Error::Validation(format!("duplicate TMVA option '{}'", item.key())));
        }
        self.items.push(item);
        Ok(())
    }

    /// Look up an item by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&OptionItem> {
        self.items.iter().find(|i| i.key().eq_ignore_ascii_case(key))
    }

    /// Colon-joined form passed to TMVA.
    pub fn render(&self) -> String {
        self.items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(":")
    }
}
