// Property document resolver
// Loads the hierarchical property file and produces, per tree, the
// directory-path records ordered from most to least specific.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value;

use crate::error::{ServiceError, ServiceResult};
use crate::targets::TreeKind;

/// Attribute keys recognized anywhere in the property tree. Any other
/// mapping-valued key is a path segment to descend into.
const RECOGNIZED_KEYS: [&str; 6] = [
    "params",
    "origins",
    "destinations",
    "access",
    "validator",
    "block until complete",
];

/// The settings declared at one directory path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    pub origins: Option<Vec<String>>,
    pub destinations: Option<Vec<String>>,
    pub access: Option<Vec<String>>,
    pub validator: Option<String>,
    pub params: BTreeMap<String, String>,
    pub block_until_complete: Option<bool>,
}

/// Settings declared at one path of a property tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    /// Directory path relative to the tree root, forward-slash; the
    /// tree root itself is the empty string.
    pub path: String,
    pub settings: PropertySet,
}

impl PropertyRecord {
    /// Whether this record applies to `dir`: it is declared at `dir`
    /// itself or at a proper ancestor of it.
    pub fn applies_to(&self, dir: &str) -> bool {
        self.path.is_empty() || self.path == dir || dir.starts_with(&format!("{}/", self.path))
    }
}

/// The parsed property document: one record list per tree, ordered
/// from most specific (deepest path) to least specific (root last).
#[derive(Debug, Clone)]
pub struct PropertyDocument {
    dev: Vec<PropertyRecord>,
    production: Vec<PropertyRecord>,
}

impl PropertyDocument {
    pub fn from_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ServiceResult<Self> {
        let raw: Value = serde_yaml::from_str(content)?;
        let top = raw
            .as_mapping()
            .ok_or_else(|| ServiceError::Config("top level must be a mapping".to_string()))?;

        let dev = Self::resolve_tree(top.get("dev"), "dev")?;
        let production = Self::resolve_tree(top.get("production"), "production")?;

        Ok(Self { dev, production })
    }

    /// The ordered record list for one tree.
    pub fn records(&self, kind: TreeKind) -> &[PropertyRecord] {
        match kind {
            TreeKind::Dev => &self.dev,
            TreeKind::Production => &self.production,
        }
    }

    fn resolve_tree(tree: Option<&Value>, name: &str) -> ServiceResult<Vec<PropertyRecord>> {
        let tree = tree
            .ok_or_else(|| ServiceError::Config(format!("missing top-level '{}' tree", name)))?;
        let mapping = tree
            .as_mapping()
            .ok_or_else(|| ServiceError::Config(format!("'{}' tree must be a mapping", name)))?;

        let mut records: Vec<PropertyRecord> = Vec::new();
        walk(&mut records, "", mapping)?;

        // Most specific first: deepest path wins, root comes last. The
        // depth sort replaces the reverse-lexicographic ordering of
        // earlier incarnations, which could misorder siblings of
        // different depths.
        records.sort_by(|a, b| {
            let depth = |p: &str| if p.is_empty() { 0 } else { p.split('/').count() };
            depth(&b.path)
                .cmp(&depth(&a.path))
                .then_with(|| b.path.cmp(&a.path))
        });

        Ok(records)
    }
}

fn walk(
    records: &mut Vec<PropertyRecord>,
    path: &str,
    node: &serde_yaml::Mapping,
) -> ServiceResult<()> {
    for (key, value) in node {
        let key = key
            .as_str()
            .ok_or_else(|| ServiceError::Config(format!("non-string key under '{}'", path)))?;

        if RECOGNIZED_KEYS.contains(&key) {
            let record = record_at(records, path);
            apply_attribute(&mut record.settings, key, value, path)?;
        } else if let Some(child) = value.as_mapping() {
            let child_path = if path.is_empty() {
                key.to_string()
            } else {
                format!("{}/{}", path, key)
            };
            walk(records, &child_path, child)?;
        }
        // Unrecognized scalar or list keys carry no meaning and are
        // skipped.
    }
    Ok(())
}

fn record_at<'a>(records: &'a mut Vec<PropertyRecord>, path: &str) -> &'a mut PropertyRecord {
    if let Some(pos) = records.iter().position(|r| r.path == path) {
        return &mut records[pos];
    }
    records.push(PropertyRecord {
        path: path.to_string(),
        settings: PropertySet::default(),
    });
    records.last_mut().unwrap()
}

fn apply_attribute(
    settings: &mut PropertySet,
    key: &str,
    value: &Value,
    path: &str,
) -> ServiceResult<()> {
    match key {
        "origins" => settings.origins = Some(string_list(value, key, path)?),
        "destinations" => settings.destinations = Some(string_list(value, key, path)?),
        "access" => settings.access = Some(string_list(value, key, path)?),
        "validator" => {
            settings.validator = Some(scalar_string(value).ok_or_else(|| {
                ServiceError::Config(format!("'validator' at '{}' must be a string", path))
            })?)
        }
        "params" => {
            let mapping = value.as_mapping().ok_or_else(|| {
                ServiceError::Config(format!("'params' at '{}' must be a mapping", path))
            })?;
            for (name, param) in mapping {
                let name = name.as_str().ok_or_else(|| {
                    ServiceError::Config(format!("non-string param name at '{}'", path))
                })?;
                let param = scalar_string(param).ok_or_else(|| {
                    ServiceError::Config(format!("param '{}' at '{}' must be a scalar", name, path))
                })?;
                settings.params.insert(name.to_string(), param);
            }
        }
        "block until complete" => {
            settings.block_until_complete = Some(value.as_bool().ok_or_else(|| {
                ServiceError::Config(format!(
                    "'block until complete' at '{}' must be a boolean",
                    path
                ))
            })?)
        }
        _ => unreachable!("unrecognized attribute '{}'", key),
    }
    Ok(())
}

/// Coerce a scalar-or-list value into a list of strings, the shape
/// shared by `origins`, `destinations` and `access`.
pub(crate) fn string_list(value: &Value, key: &str, path: &str) -> ServiceResult<Vec<String>> {
    if let Some(single) = scalar_string(value) {
        return Ok(vec![single]);
    }
    if let Some(seq) = value.as_sequence() {
        return seq
            .iter()
            .map(|v| {
                scalar_string(v).ok_or_else(|| {
                    ServiceError::Config(format!(
                        "'{}' at '{}' must contain only scalars",
                        key, path
                    ))
                })
            })
            .collect();
    }
    Err(ServiceError::Config(format!(
        "'{}' at '{}' must be a scalar or a list",
        key, path
    )))
}

pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
dev:
  origins: "Origin Hub"
  destinations: ["Receiver A", "Receiver B"]
  Medication:
    params:
      T: "2024-01-01"
    Send:
      destinations: "Receiver C"
      block until complete: true
  _LoadResources:
    access: reader
    validator: "Validator Dev"
production:
  origins: "Origin Hub"
  destinations: "Receiver Prod"
"#;

    #[test]
    fn records_are_keyed_by_path() {
        let doc = PropertyDocument::from_str(DOC).unwrap();
        let records = doc.records(TreeKind::Dev);
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert!(paths.contains(&""));
        assert!(paths.contains(&"Medication"));
        assert!(paths.contains(&"Medication/Send"));
        assert!(paths.contains(&"_LoadResources"));
    }

    #[test]
    fn deeper_paths_sort_before_ancestors() {
        let doc = PropertyDocument::from_str(DOC).unwrap();
        let records = doc.records(TreeKind::Dev);
        let pos =
            |p: &str| records.iter().position(|r| r.path == p).unwrap();
        assert!(pos("Medication/Send") < pos("Medication"));
        assert!(pos("Medication") < pos(""));
        assert_eq!(records.last().unwrap().path, "");
    }

    #[test]
    fn scalars_are_promoted_to_lists() {
        let doc = PropertyDocument::from_str(DOC).unwrap();
        let root = doc
            .records(TreeKind::Dev)
            .iter()
            .find(|r| r.path.is_empty())
            .unwrap();
        assert_eq!(
            root.settings.origins,
            Some(vec!["Origin Hub".to_string()])
        );
        assert_eq!(
            root.settings.destinations,
            Some(vec!["Receiver A".to_string(), "Receiver B".to_string()])
        );
    }

    #[test]
    fn blocking_and_params_are_parsed() {
        let doc = PropertyDocument::from_str(DOC).unwrap();
        let send = doc
            .records(TreeKind::Dev)
            .iter()
            .find(|r| r.path == "Medication/Send")
            .unwrap();
        assert_eq!(send.settings.block_until_complete, Some(true));

        let medication = doc
            .records(TreeKind::Dev)
            .iter()
            .find(|r| r.path == "Medication")
            .unwrap();
        assert_eq!(
            medication.settings.params.get("T"),
            Some(&"2024-01-01".to_string())
        );
    }

    #[test]
    fn applies_to_matches_self_and_descendants_only() {
        let record = PropertyRecord {
            path: "Medication".to_string(),
            settings: PropertySet::default(),
        };
        assert!(record.applies_to("Medication"));
        assert!(record.applies_to("Medication/Send"));
        assert!(!record.applies_to("MedicationExtra"));
        assert!(!record.applies_to("Other"));

        let root = PropertyRecord {
            path: String::new(),
            settings: PropertySet::default(),
        };
        assert!(root.applies_to("Medication/Send"));
    }

    #[test]
    fn missing_tree_is_a_config_error() {
        let err = PropertyDocument::from_str("dev: {}").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(PropertyDocument::from_str("dev: [unclosed").is_err());
    }

    #[test]
    fn wrong_attribute_shape_is_a_config_error() {
        let err = PropertyDocument::from_str(
            "dev:\n  origins: {nested: true}\nproduction: {}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
