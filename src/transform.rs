//! Declarative reshaping of JSON records.
//!
//! A [`TransformConfig`] lists fields to remove at the top level (`"root"`) or
//! inside a named nested field, and keys to relocate. Applying it never
//! mutates the caller's value: the input is deep-cloned and the reshaped copy
//! is returned together with a warning for every instruction that targeted a
//! key the data does not have. Under strict mode the first such miss aborts
//! the whole transform with [`ArchiveError::StrictTransform`].
use super::error::ArchiveError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Path sentinel addressing the top level of a record
pub const ROOT: &str = "root";

/// Fields removed from the object (or every element of the list) found at `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub path: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyMove {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    keys_to_remove: Vec<Removal>,
    #[serde(default)]
    keys_to_move: Vec<KeyMove>,
    #[serde(default)]
    strict_mode: Option<bool>,
}

impl TransformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds fields to remove at `path`. Repeated paths and fields are unioned.
    pub fn remove<I, S>(mut self, path: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.union_removal(path, &fields);
        self
    }

    pub fn relocate(mut self, from: &str, to: &str) -> Self {
        let mv = KeyMove {
            from: from.to_string(),
            to: to.to_string(),
        };
        if !self.keys_to_move.contains(&mv) {
            self.keys_to_move.push(mv);
        }
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = Some(strict);
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict_mode.unwrap_or(false)
    }

    pub fn removals(&self) -> &[Removal] {
        &self.keys_to_remove
    }

    pub fn moves(&self) -> &[KeyMove] {
        &self.keys_to_move
    }

    pub fn fields_at(&self, path: &str) -> Option<&[String]> {
        self.keys_to_remove
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.fields.as_slice())
    }

    /// Combines two configs without modifying either.
    ///
    /// Removal fields are unioned per path, relocations are de-duplicated by
    /// `from -> to` keeping the first occurrence, and `other`'s strict flag
    /// wins when it sets one.
    pub fn merge(&self, other: &TransformConfig) -> TransformConfig {
        let mut merged = self.clone();
        for removal in &other.keys_to_remove {
            merged.union_removal(&removal.path, &removal.fields);
        }
        for mv in &other.keys_to_move {
            if !merged.keys_to_move.contains(mv) {
                merged.keys_to_move.push(mv.clone());
            }
        }
        if other.strict_mode.is_some() {
            merged.strict_mode = other.strict_mode;
        }
        merged
    }

    pub fn merge_all<'a, I>(configs: I) -> TransformConfig
    where
        I: IntoIterator<Item = &'a TransformConfig>,
    {
        configs
            .into_iter()
            .fold(TransformConfig::default(), |acc, c| acc.merge(c))
    }

    fn union_removal(&mut self, path: &str, fields: &[String]) {
        let idx = match self.keys_to_remove.iter().position(|r| r.path == path) {
            Some(idx) => idx,
            None => {
                self.keys_to_remove.push(Removal {
                    path: path.to_string(),
                    fields: Vec::new(),
                });
                self.keys_to_remove.len() - 1
            }
        };
        let existing = &mut self.keys_to_remove[idx].fields;
        for field in fields {
            if !existing.contains(field) {
                existing.push(field.clone());
            }
        }
    }

    /// Reshapes a record, a list of records, or `null`.
    ///
    /// Lists are transformed element-wise in order. Scalars are not records
    /// and pass through untouched.
    pub fn transform(&self, data: &Value) -> Result<Transformed, ArchiveError> {
        let mut pass = Pass {
            strict: self.is_strict(),
            warnings: Vec::new(),
        };
        let value = pass.value(self, data)?;
        Ok(Transformed {
            value,
            warnings: pass.warnings,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub value: Value,
    pub warnings: Vec<TransformWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Delete,
    DeleteParent,
    Move,
    Splay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformWarning {
    pub key: String,
    pub operation: Operation,
}

impl fmt::Display for TransformWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            Operation::Delete => write!(
                f,
                "Attempted to delete key '{}', but it does not exist.",
                self.key
            ),
            Operation::DeleteParent => write!(
                f,
                "Attempted to delete parent object key '{}', but it does not exist.",
                self.key
            ),
            Operation::Move => write!(
                f,
                "Attempted to move key '{}', but it does not exist.",
                self.key
            ),
            Operation::Splay => write!(
                f,
                "Attempted to move key '{}' into root, but it is not an object.",
                self.key
            ),
        }
    }
}

struct Pass {
    strict: bool,
    warnings: Vec<TransformWarning>,
}

impl Pass {
    fn missing(&mut self, key: String, operation: Operation) -> Result<(), ArchiveError> {
        let warning = TransformWarning { key, operation };
        if self.strict {
            return Err(ArchiveError::StrictTransform(warning.to_string()));
        }
        self.warnings.push(warning);
        Ok(())
    }

    fn value(&mut self, config: &TransformConfig, data: &Value) -> Result<Value, ArchiveError> {
        match data {
            Value::Array(items) => items
                .iter()
                .map(|item| self.value(config, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(record) => {
                let mut record = record.clone();
                for removal in &config.keys_to_remove {
                    self.remove(&mut record, removal)?;
                }
                for mv in &config.keys_to_move {
                    self.relocate(&mut record, mv)?;
                }
                Ok(Value::Object(record))
            }
            other => Ok(other.clone()),
        }
    }

    fn remove(&mut self, record: &mut Map<String, Value>, removal: &Removal) -> Result<(), ArchiveError> {
        let path = removal.path.as_str();
        if path == ROOT {
            for field in &removal.fields {
                if record.remove(field).is_none() {
                    self.missing(field.clone(), Operation::Delete)?;
                }
            }
            return Ok(());
        }

        match record.get_mut(path) {
            None => self.missing(path.to_string(), Operation::DeleteParent)?,
            Some(Value::Array(items)) => {
                for (i, item) in items.iter_mut().enumerate() {
                    for field in &removal.fields {
                        let removed = item
                            .as_object_mut()
                            .and_then(|obj| obj.remove(field))
                            .is_some();
                        if !removed {
                            self.missing(format!("{path}[{i}].{field}"), Operation::Delete)?;
                        }
                    }
                }
            }
            Some(nested) => {
                for field in &removal.fields {
                    let removed = nested
                        .as_object_mut()
                        .and_then(|obj| obj.remove(field))
                        .is_some();
                    if !removed {
                        self.missing(format!("{path}.{field}"), Operation::Delete)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn relocate(&mut self, record: &mut Map<String, Value>, mv: &KeyMove) -> Result<(), ArchiveError> {
        let Some(value) = record.remove(&mv.from) else {
            return self.missing(mv.from.clone(), Operation::Move);
        };

        if mv.to != ROOT {
            record.insert(mv.to.clone(), value);
            return Ok(());
        }

        match value {
            Value::Object(fields) => {
                // shallow merge, relocated fields overwrite top-level ones
                record.extend(fields);
                Ok(())
            }
            other => {
                record.insert(mv.from.clone(), other);
                self.missing(mv.from.clone(), Operation::Splay)
            }
        }
    }
}
