// Target catalog
// Enumerates the suite directory tree, assigns stable ordinals, and
// resolves directories into execution or upload targets by walking the
// property records from most to least specific.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ServiceError, ServiceResult};
use crate::properties::PropertyDocument;
use crate::targets::{
    default_date_t, ExecutionTarget, TreeKind, UploadTarget, LOADSCRIPT_FOLDER,
};

/// Directories named like this are listed but never descended into.
const REFERENCE_FOLDER: &str = "_reference";

/// The suite directory tree with its ordinal numbering and the
/// property document used for inheritance.
#[derive(Debug)]
pub struct TargetCatalog {
    dev_root: PathBuf,
    dirs: Vec<PathBuf>,
    document: PropertyDocument,
    date_t: String,
}

impl TargetCatalog {
    /// Scan the suite tree under `repo_root/dev` and build the
    /// 1-based ordinal index.
    pub fn new(repo_root: impl AsRef<Path>, document: PropertyDocument) -> ServiceResult<Self> {
        let dev_root = repo_root.as_ref().join("dev");
        let mut dirs = Vec::new();
        scan(&mut dirs, &dev_root)?;
        Ok(Self {
            dev_root,
            dirs,
            document,
            date_t: default_date_t(),
        })
    }

    /// Override the default value for the `T` template variable.
    pub fn with_date_t(mut self, date: impl Into<String>) -> Self {
        self.date_t = date.into();
        self
    }

    pub fn date_t(&self) -> &str {
        &self.date_t
    }

    /// The numbered directory listing. `_reference` folders can be
    /// hidden from the output but keep their ordinal, so numbering
    /// stays consistent across uses.
    pub fn listing(&self, exclude_reference: bool) -> Vec<String> {
        self.dirs
            .iter()
            .enumerate()
            .filter(|(_, dir)| {
                !(exclude_reference && dir.file_name().is_some_and(|n| n == REFERENCE_FOLDER))
            })
            .map(|(i, dir)| format!("{}. {}", i + 1, self.rel_of(dir)))
            .collect()
    }

    /// Translate an ordinal or a forward-slash path into the path of a
    /// suite directory relative to the tree root. Selectors that name
    /// no enumerated directory are rejected.
    pub fn rel_path(&self, selector: &str) -> ServiceResult<String> {
        if let Ok(ordinal) = selector.parse::<usize>() {
            let dir = ordinal
                .checked_sub(1)
                .and_then(|i| self.dirs.get(i))
                .ok_or_else(|| ServiceError::UnknownTarget(selector.to_string()))?;
            return Ok(self.rel_of(dir));
        }
        let rel = selector.trim_matches('/').to_string();
        // A path must match the enumeration; a typo is not the same
        // thing as a directory with incomplete properties.
        if !self.dirs.iter().any(|dir| self.rel_of(dir) == rel) {
            return Err(ServiceError::UnknownTarget(rel));
        }
        Ok(rel)
    }

    /// Resolve a directory into a fully specified execution target.
    pub fn execution_target(
        &self,
        selector: &str,
        kind: TreeKind,
    ) -> ServiceResult<ExecutionTarget> {
        let rel = self.rel_path(selector)?;
        let mut target = self.new_target(&rel, kind);
        self.fill_execution_target(&mut target, &rel, kind)?;
        Ok(target)
    }

    /// Create an unresolved target for a directory: display path and
    /// load-resources detection only. Callers seed explicit overrides
    /// on it before running property inheritance.
    pub fn new_target(&self, rel: &str, kind: TreeKind) -> ExecutionTarget {
        let mut target = ExecutionTarget::new(display_path(rel, kind));
        target.set_loadscript_folder(leaf_name(rel) == LOADSCRIPT_FOLDER);
        target
    }

    /// Apply property inheritance to a (possibly pre-seeded) execution
    /// target: walk the records from most to least specific, fill any
    /// attribute that is not yet set, and merge params so that the most
    /// specific declaration of a variable wins. Stops early once both
    /// origins and destinations are known.
    pub fn fill_execution_target(
        &self,
        target: &mut ExecutionTarget,
        dir_rel: &str,
        kind: TreeKind,
    ) -> ServiceResult<()> {
        for record in self.document.records(kind) {
            if !record.applies_to(dir_rel) {
                continue;
            }
            let settings = &record.settings;
            if !target.has_origins() {
                if let Some(origins) = &settings.origins {
                    target.origins = origins.clone();
                }
            }
            if !target.has_destinations() {
                if let Some(destinations) = &settings.destinations {
                    target.destinations = destinations.clone();
                }
            }
            if target.block_until_complete.is_none() {
                target.block_until_complete = settings.block_until_complete;
            }
            for (name, value) in &settings.params {
                target
                    .params
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            if target.has_origins() && target.has_destinations() {
                break;
            }
        }

        if !target.has_origins() {
            return Err(ServiceError::Resolution {
                attribute: "origin(s)",
                path: target.rel_path.clone(),
            });
        }
        if !target.has_destinations() {
            return Err(ServiceError::Resolution {
                attribute: "destination(s)",
                path: target.rel_path.clone(),
            });
        }

        // The date template variable is always available unless the
        // target defines it itself.
        target
            .params
            .entry("T".to_string())
            .or_insert_with(|| self.date_t.clone());

        Ok(())
    }

    /// Resolve a directory into a fully specified upload target.
    pub fn upload_target(&self, selector: &str, kind: TreeKind) -> ServiceResult<UploadTarget> {
        let rel = self.rel_path(selector)?;
        let mut target = UploadTarget::new(display_path(&rel, kind), kind);

        for record in self.document.records(kind) {
            if !record.applies_to(&rel) {
                continue;
            }
            let settings = &record.settings;
            if !target.has_access() {
                if let Some(access) = &settings.access {
                    target.access = access.clone();
                }
            }
            if !target.has_validator() {
                if let Some(validator) = &settings.validator {
                    target.validator = validator.clone();
                }
            }
            if target.has_access() && target.has_validator() {
                return Ok(target);
            }
        }

        if !target.has_access() {
            return Err(ServiceError::Resolution {
                attribute: "access rights",
                path: target.rel_path.clone(),
            });
        }
        Err(ServiceError::Resolution {
            attribute: "validator",
            path: target.rel_path.clone(),
        })
    }

    fn rel_of(&self, dir: &Path) -> String {
        let rel = dir.strip_prefix(&self.dev_root).unwrap_or(dir);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Pre-order scan of the suite tree. Hidden directories are excluded
/// from the numbering entirely; `_reference` folders are numbered but
/// not descended into.
fn scan(dirs: &mut Vec<PathBuf>, current: &Path) -> ServiceResult<()> {
    // Directory iteration order is platform-dependent; sort by name so
    // ordinals stay stable across runs and machines.
    let mut entries: Vec<PathBuf> = fs::read_dir(current)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    entries.sort();

    for dir in entries {
        let name = dir.file_name().map(|n| n.to_string_lossy().to_string());
        let name = match name {
            Some(name) => name,
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }
        if name == REFERENCE_FOLDER {
            dirs.push(dir);
        } else {
            dirs.push(dir.clone());
            scan(dirs, &dir)?;
        }
    }
    Ok(())
}

fn display_path(rel: &str, kind: TreeKind) -> String {
    match kind {
        TreeKind::Dev => format!("dev/{}", rel),
        TreeKind::Production => rel.to_string(),
    }
}

fn leaf_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}
