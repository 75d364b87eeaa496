use crate::error::{BossError, Result};
use crate::resolve::{self, Placeholder};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Task,
    Service,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Task => f.write_str("task"),
            TemplateKind::Service => f.write_str("service"),
        }
    }
}

/// An operator-authored document that may still contain placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    kind: TemplateKind,
    source: PathBuf,
    value: Value,
}

impl Template {
    pub fn parse(kind: TemplateKind, source: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let source = source.into();
        let value: Value = serde_json::from_str(text).map_err(|e| BossError::TemplateInvalid {
            template: kind.to_string(),
            reason: format!("{}: {e}", source.display()),
        })?;
        if !value.is_object() {
            return Err(BossError::TemplateInvalid {
                template: kind.to_string(),
                reason: format!("{}: top level must be a JSON object", source.display()),
            });
        }
        Ok(Self {
            kind,
            source,
            value,
        })
    }

    pub fn load(kind: TemplateKind, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BossError::TemplateInvalid {
            template: kind.to_string(),
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::parse(kind, path, &text)
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn placeholders(&self) -> BTreeSet<Placeholder> {
        resolve::referenced(&self.value)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// The task family this template names.
    ///
    /// For a service template this is the part of `taskDefinition` (or of its
    /// ARN's resource name) before the revision separator, and only when that
    /// part is literal text.
    pub fn family(&self) -> Option<&str> {
        let raw = match self.kind {
            TemplateKind::Task => self.str_field("family")?,
            TemplateKind::Service => {
                let td = self.str_field("taskDefinition")?;
                // Full ARNs carry the family after the last '/'.
                let name = td.rsplit_once('/').map_or(td, |(_, name)| name);
                name.split_once(':').map_or(name, |(family, _)| family)
            }
        };
        let literal = !raw.is_empty() && resolve::referenced(&Value::from(raw)).is_empty();
        literal.then_some(raw)
    }

    /// Replace a top-level attribute, e.g. a `desiredCount` override.
    pub fn with_override(mut self, key: &str, value: Value) -> Self {
        if let Some(map) = self.value.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Structural checks that the platform would otherwise reject later.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            TemplateKind::Task => self.validate_task(),
            TemplateKind::Service => self.validate_service(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> BossError {
        BossError::TemplateInvalid {
            template: self.kind.to_string(),
            reason: format!("{}: {}", self.source.display(), reason.into()),
        }
    }

    fn validate_task(&self) -> Result<()> {
        match self.value.get("family") {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(_) => return Err(self.invalid("'family' must be a non-empty string")),
            None => return Err(self.invalid("missing 'family'")),
        }
        let containers = self
            .value
            .get("containerDefinitions")
            .and_then(Value::as_array)
            .ok_or_else(|| self.invalid("'containerDefinitions' must be an array"))?;
        if containers.is_empty() {
            return Err(self.invalid("'containerDefinitions' is empty"));
        }
        for (i, container) in containers.iter().enumerate() {
            if !container.is_object() {
                return Err(self.invalid(format!("containerDefinitions[{i}] is not an object")));
            }
            let Some(env) = container.get("environment") else {
                continue;
            };
            let entries = env.as_array().ok_or_else(|| {
                self.invalid(format!("containerDefinitions[{i}].environment must be an array"))
            })?;
            for (j, entry) in entries.iter().enumerate() {
                let ok = entry.get("name").is_some_and(Value::is_string)
                    && entry.get("value").is_some_and(Value::is_string);
                if !ok {
                    return Err(self.invalid(format!(
                        "containerDefinitions[{i}].environment[{j}] needs string 'name' and 'value'"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_service(&self) -> Result<()> {
        match self.value.get("taskDefinition") {
            Some(Value::String(s)) if !s.is_empty() => Ok(()),
            Some(_) => Err(self.invalid("'taskDefinition' must be a non-empty string")),
            None => Err(self.invalid("missing 'taskDefinition'")),
        }
    }
}
