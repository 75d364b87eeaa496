//! Placeholder resolution over template documents.
//!
//! A placeholder is one of three fixed markers (`%TASK_REV%`, `%RELEASE_TAG%`,
//! `%REPOSITORY%`) embedded anywhere inside a string value. Resolution walks the
//! whole JSON tree and substitutes markers in string values; object keys and
//! non-string scalars are never touched. Anything that merely looks like a
//! marker (`%FOO%`, `%task_rev%`) is left as-is.
//!
//! Resolution is all-or-nothing: if any known marker in the document has no
//! binding, nothing is substituted and every unbound marker is reported.

use crate::error::{BossError, Result};
use crate::template::Template;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Placeholder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placeholder {
    TaskRev,
    ReleaseTag,
    Repository,
}

impl Placeholder {
    pub const ALL: [Placeholder; 3] = [
        Placeholder::TaskRev,
        Placeholder::ReleaseTag,
        Placeholder::Repository,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::TaskRev => "TASK_REV",
            Placeholder::ReleaseTag => "RELEASE_TAG",
            Placeholder::Repository => "REPOSITORY",
        }
    }

    /// The literal text searched for in documents, e.g. `%TASK_REV%`.
    pub fn marker(self) -> &'static str {
        match self {
            Placeholder::TaskRev => "%TASK_REV%",
            Placeholder::ReleaseTag => "%RELEASE_TAG%",
            Placeholder::Repository => "%REPOSITORY%",
        }
    }
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.marker())
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Concrete values for placeholders, accumulated as pipeline steps complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bindings(BTreeMap<Placeholder, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.0.insert(placeholder, value.into());
    }

    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.bind(placeholder, value);
        self
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.0.get(&placeholder).map(String::as_str)
    }

    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.0.contains_key(&placeholder)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Placeholder, &str)> {
        self.0.iter().map(|(p, v)| (*p, v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// ResolvedDocument
// ---------------------------------------------------------------------------

/// A template with every placeholder substituted.
///
/// Only [`resolve`] constructs this type, so anything holding one is known to
/// be free of markers and safe to submit to the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedDocument(Value);

impl ResolvedDocument {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Every known placeholder referenced by a string value anywhere in `value`.
pub fn referenced(value: &Value) -> BTreeSet<Placeholder> {
    let mut found = BTreeSet::new();
    collect(value, &mut found);
    found
}

fn collect(value: &Value, found: &mut BTreeSet<Placeholder>) {
    match value {
        Value::String(s) => found.extend(markers_in(s)),
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect(v, found)),
        _ => {}
    }
}

fn markers_in(s: &str) -> impl Iterator<Item = Placeholder> + '_ {
    Placeholder::ALL.into_iter().filter(|p| s.contains(p.marker()))
}

/// Substitute `bindings` into `template`.
pub fn resolve(template: &Template, bindings: &Bindings) -> Result<ResolvedDocument> {
    resolve_value(&template.kind().to_string(), template.value(), bindings)
}

/// Substitute `bindings` into an arbitrary document; `label` names it in errors.
pub fn resolve_value(label: &str, value: &Value, bindings: &Bindings) -> Result<ResolvedDocument> {
    for (placeholder, bound) in bindings.iter() {
        if markers_in(bound).next().is_some() {
            return Err(BossError::InvalidBinding {
                token: placeholder.name().to_string(),
                value: bound.to_string(),
            });
        }
    }

    let unbound: Vec<String> = referenced(value)
        .into_iter()
        .filter(|p| !bindings.contains(*p))
        .map(|p| p.marker().to_string())
        .collect();
    if !unbound.is_empty() {
        return Err(BossError::UnboundPlaceholder {
            template: label.to_string(),
            tokens: unbound,
        });
    }

    let resolved = substitute(value, bindings);
    // Adjacent substitutions can still spell out a marker.
    let formed = referenced(&resolved);
    if !formed.is_empty() {
        let markers: Vec<&str> = formed.iter().map(|p| p.marker()).collect();
        return Err(BossError::TemplateInvalid {
            template: label.to_string(),
            reason: format!("substitution produced {}", markers.join(", ")),
        });
    }
    Ok(ResolvedDocument(resolved))
}

fn substitute(value: &Value, bindings: &Bindings) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, bindings)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, bindings)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, bindings)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Single left-to-right pass, so substituted text is never rescanned.
fn substitute_str(s: &str, bindings: &Bindings) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let hit = bindings
            .iter()
            .find(|(p, _)| tail.starts_with(p.marker()));
        match hit {
            Some((p, bound)) => {
                out.push_str(bound);
                rest = &tail[p.marker().len()..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
