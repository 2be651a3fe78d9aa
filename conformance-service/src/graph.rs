// Target graph
// Named target declarations: a name maps to a single suite or to an
// ordered list of suites and other names. Resolves user input
// (ordinals, names) into a flat sequence of execution targets.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::catalog::TargetCatalog;
use crate::error::{ServiceError, ServiceResult};
use crate::properties::{scalar_string, string_list};
use crate::targets::{ExecutionTarget, TreeKind};

/// An atomic target declaration: a suite path plus optional overrides
/// that take precedence over property inheritance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDecl {
    pub path: String,
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub is_loadscript_folder: bool,
    pub block_until_complete: Option<bool>,
}

/// One element of a group declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupItem {
    /// Reference to another declared name.
    Name(String),
    /// An inline atomic declaration.
    Atomic(TargetDecl),
}

/// A named entry in the target graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEntry {
    /// Cosmetic header in the listing; never numbered, never runnable.
    Section,
    Atomic(TargetDecl),
    Group(Vec<GroupItem>),
}

/// Result of flattening a set of inputs: the runnable targets in
/// input order, plus one message per input or name that could not be
/// resolved (non-fatal, the rest of the batch continues).
#[derive(Debug, Default)]
pub struct UnwrapOutcome {
    pub targets: Vec<ExecutionTarget>,
    pub unresolved: Vec<String>,
}

/// The declared target names, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    entries: Vec<(String, TargetEntry)>,
}

impl TargetGraph {
    /// Read the `targets` section of the property document. A missing
    /// section yields an empty graph.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ServiceResult<Self> {
        let raw: Value = serde_yaml::from_str(content)?;
        let top = raw
            .as_mapping()
            .ok_or_else(|| ServiceError::Config("top level must be a mapping".to_string()))?;

        let section = match top.get("targets") {
            Some(section) => section,
            None => return Ok(Self::default()),
        };
        let mapping = section
            .as_mapping()
            .ok_or_else(|| ServiceError::Config("'targets' must be a mapping".to_string()))?;

        let mut entries = Vec::new();
        for (name, value) in mapping {
            let name = name
                .as_str()
                .ok_or_else(|| ServiceError::Config("non-string target name".to_string()))?
                .to_string();
            let entry = parse_entry(&name, value)?;
            entries.push((name, entry));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The numbered listing of declared targets. Group entries show
    /// their named members in parentheses; section headers appear as
    /// plain unnumbered lines.
    pub fn listing(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut ordinal = 0;
        for (name, entry) in &self.entries {
            match entry {
                TargetEntry::Section => lines.push(format!("--- {} ---", name)),
                TargetEntry::Atomic(_) => {
                    ordinal += 1;
                    lines.push(format!("{:2}.  {}", ordinal, name));
                }
                TargetEntry::Group(items) => {
                    ordinal += 1;
                    let members: Vec<&str> = items
                        .iter()
                        .filter_map(|item| match item {
                            GroupItem::Name(n) => Some(n.as_str()),
                            GroupItem::Atomic(_) => None,
                        })
                        .collect();
                    if members.is_empty() {
                        lines.push(format!("{:2}.  {}", ordinal, name));
                    } else {
                        lines.push(format!("{:2}.  {} ({})", ordinal, name, members.join(", ")));
                    }
                }
            }
        }
        lines
    }

    /// Translate a 1-based ordinal from the listing into the declared
    /// name at that position, skipping section headers.
    pub fn name_at(&self, ordinal: usize) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| !matches!(entry, TargetEntry::Section))
            .nth(ordinal.checked_sub(1)?)
            .map(|(name, _)| name.as_str())
    }

    /// Flatten the given inputs (ordinals, declared names, or raw
    /// suite paths) into execution targets, depth-first and
    /// left-to-right, without de-duplication. Ordinals index the
    /// declared listing, or the directory catalog when nothing is
    /// declared. Unknown names are reported and skipped; a name
    /// revisited on the expansion path is a cycle and fails the whole
    /// call.
    pub fn unwrap_targets(
        &self,
        inputs: &[String],
        catalog: &TargetCatalog,
        kind: TreeKind,
    ) -> ServiceResult<UnwrapOutcome> {
        let mut outcome = UnwrapOutcome::default();

        for input in inputs {
            let name = if let Ok(ordinal) = input.parse::<usize>() {
                if self.entries.is_empty() {
                    // Nothing declared: numbers address the directory
                    // catalog instead, the same listing the user was
                    // shown in that case.
                    match catalog.execution_target(input, kind) {
                        Ok(target) => outcome.targets.push(target),
                        Err(ServiceError::UnknownTarget(_)) => outcome
                            .unresolved
                            .push(format!("Unknown target number '{}'", input)),
                        Err(err) => outcome.unresolved.push(err.to_string()),
                    }
                    continue;
                }
                match self.name_at(ordinal) {
                    Some(name) => name.to_string(),
                    None => {
                        outcome
                            .unresolved
                            .push(format!("Unknown target number '{}'", input));
                        continue;
                    }
                }
            } else {
                input.clone()
            };

            if let Some(entry) = self.lookup(&name) {
                let mut stack = Vec::new();
                self.expand(&name, entry, &mut stack, catalog, kind, &mut outcome)?;
            } else if name.contains('/') {
                // Not a declared name but shaped like a suite path;
                // resolve it directly against the catalog.
                match catalog.execution_target(&name, kind) {
                    Ok(target) => outcome.targets.push(target),
                    Err(err) => outcome.unresolved.push(err.to_string()),
                }
            } else {
                outcome
                    .unresolved
                    .push(format!("Unknown target '{}'", name));
            }
        }

        Ok(outcome)
    }

    fn lookup(&self, name: &str) -> Option<&TargetEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| entry)
    }

    fn expand(
        &self,
        name: &str,
        entry: &TargetEntry,
        stack: &mut Vec<String>,
        catalog: &TargetCatalog,
        kind: TreeKind,
        outcome: &mut UnwrapOutcome,
    ) -> ServiceResult<()> {
        if stack.iter().any(|n| n == name) {
            return Err(ServiceError::Cycle(name.to_string()));
        }
        stack.push(name.to_string());

        match entry {
            TargetEntry::Section => {
                outcome
                    .unresolved
                    .push(format!("'{}' is a section header, not a target", name));
            }
            TargetEntry::Atomic(decl) => self.resolve_decl(decl, catalog, kind, outcome),
            TargetEntry::Group(items) => {
                for item in items {
                    match item {
                        GroupItem::Name(member) => match self.lookup(member) {
                            Some(entry) => {
                                self.expand(member, entry, stack, catalog, kind, outcome)?
                            }
                            None => outcome
                                .unresolved
                                .push(format!("Unknown target '{}'", member)),
                        },
                        GroupItem::Atomic(decl) => {
                            self.resolve_decl(decl, catalog, kind, outcome)
                        }
                    }
                }
            }
        }

        stack.pop();
        Ok(())
    }

    /// Build an execution target from a declaration: explicit values
    /// win, inheritance fills the rest. Resolution failures are
    /// reported but do not abort the batch.
    fn resolve_decl(
        &self,
        decl: &TargetDecl,
        catalog: &TargetCatalog,
        kind: TreeKind,
        outcome: &mut UnwrapOutcome,
    ) {
        let rel = match catalog.rel_path(&decl.path) {
            Ok(rel) => rel,
            Err(err) => {
                outcome.unresolved.push(err.to_string());
                return;
            }
        };

        let mut target = catalog.new_target(&rel, kind);
        if decl.is_loadscript_folder {
            target.set_loadscript_folder(true);
        }
        target.origins = decl.origins.clone();
        target.destinations = decl.destinations.clone();
        target.params = decl.params.clone();
        if decl.block_until_complete.is_some() {
            target.block_until_complete = decl.block_until_complete;
        }

        match catalog.fill_execution_target(&mut target, &rel, kind) {
            Ok(()) => outcome.targets.push(target),
            Err(err) => outcome.unresolved.push(err.to_string()),
        }
    }
}

fn parse_entry(name: &str, value: &Value) -> ServiceResult<TargetEntry> {
    match value {
        Value::Null => Ok(TargetEntry::Section),
        Value::Mapping(mapping) => Ok(TargetEntry::Atomic(parse_decl(name, mapping)?)),
        Value::Sequence(items) => {
            if items.is_empty() {
                return Err(ServiceError::Config(format!(
                    "target '{}' declares an empty list",
                    name
                )));
            }
            let items = items
                .iter()
                .map(|item| match item {
                    Value::String(member) => Ok(GroupItem::Name(member.clone())),
                    Value::Mapping(mapping) => parse_decl(name, mapping).map(GroupItem::Atomic),
                    _ => Err(ServiceError::Config(format!(
                        "target '{}' contains an element that is neither a name nor a declaration",
                        name
                    ))),
                })
                .collect::<ServiceResult<Vec<_>>>()?;
            Ok(TargetEntry::Group(items))
        }
        _ => Err(ServiceError::Config(format!(
            "target '{}' must be null, a declaration, or a list",
            name
        ))),
    }
}

fn parse_decl(name: &str, mapping: &serde_yaml::Mapping) -> ServiceResult<TargetDecl> {
    let mut decl = TargetDecl::default();

    for (key, value) in mapping {
        let key = key.as_str().ok_or_else(|| {
            ServiceError::Config(format!("non-string key in target '{}'", name))
        })?;
        match key {
            "path" => {
                decl.path = scalar_string(value).ok_or_else(|| {
                    ServiceError::Config(format!("'path' of target '{}' must be a string", name))
                })?
            }
            "origins" => decl.origins = string_list(value, key, name)?,
            "destinations" => decl.destinations = string_list(value, key, name)?,
            "params" => {
                let params = value.as_mapping().ok_or_else(|| {
                    ServiceError::Config(format!(
                        "'params' of target '{}' must be a mapping",
                        name
                    ))
                })?;
                for (param, param_value) in params {
                    let param = param.as_str().ok_or_else(|| {
                        ServiceError::Config(format!(
                            "non-string param name in target '{}'",
                            name
                        ))
                    })?;
                    let param_value = scalar_string(param_value).ok_or_else(|| {
                        ServiceError::Config(format!(
                            "param '{}' of target '{}' must be a scalar",
                            param, name
                        ))
                    })?;
                    decl.params.insert(param.to_string(), param_value);
                }
            }
            "load resources" => {
                decl.is_loadscript_folder = value.as_bool().ok_or_else(|| {
                    ServiceError::Config(format!(
                        "'load resources' of target '{}' must be a boolean",
                        name
                    ))
                })?
            }
            "block until complete" => {
                decl.block_until_complete = Some(value.as_bool().ok_or_else(|| {
                    ServiceError::Config(format!(
                        "'block until complete' of target '{}' must be a boolean",
                        name
                    ))
                })?)
            }
            other => {
                return Err(ServiceError::Config(format!(
                    "unknown key '{}' in target '{}'",
                    other, name
                )))
            }
        }
    }

    if decl.path.is_empty() {
        return Err(ServiceError::Config(format!(
            "target '{}' is missing its 'path'",
            name
        )));
    }
    Ok(decl)
}
