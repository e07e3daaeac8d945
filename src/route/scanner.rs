use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::error::{BindError, ScanError};
use crate::route::path::{param_segment, permission};

/// HTTP verbs a method file stem may name, matched case-insensitively.
pub const HTTP_VERBS: [&str; 9] = [
    "get", "post", "put", "delete", "patch", "head", "options", "trace", "connect",
];

/// Resolve a file stem to its canonical verb name.
pub fn verb_for(stem: &str) -> Option<&'static str> {
    HTTP_VERBS
        .iter()
        .find(|verb| verb.eq_ignore_ascii_case(stem))
        .copied()
}

/// Classification of one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceKind {
    /// Routable handler file: `put.toml` under `alpha/me/beta/me/gama/`
    /// becomes PUT `/alpha/:alpha/beta/:beta/gama` with permission
    /// `gama:put::owner`.
    Method {
        verb: &'static str,
        route: String,
        permission: String,
    },
    /// Domain entity declaration: `alpha-entity.toml` declares `alpha`.
    Entity { name: String },
    /// Anything else. Reported, never bound.
    Unhandled,
}

/// One classified file, emitted once per scan and consumed once by binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRecord {
    pub node_name: String,
    pub path: PathBuf,
    pub kind: ResourceKind,
    /// True when a marker directory is a proper ancestor of the file's
    /// containing directory. A file directly inside a marker directory is
    /// not itself owner-scoped.
    pub in_param_scope: bool,
}

/// Everything one scan produced. Errors are fatal to the branch they
/// occurred in; healthy sibling branches still contribute records.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<DiscoveryRecord>,
    pub errors: Vec<ScanError>,
}

/// Per-branch traversal state. Immutable; each descent builds a fresh one,
/// so sibling branches never observe each other's marker scope.
#[derive(Debug, Clone)]
struct TraversalContext {
    route: String,
    dir_name: String,
    node: String,
    in_scope: bool,
}

impl TraversalContext {
    fn root() -> Self {
        Self {
            route: String::new(),
            dir_name: String::new(),
            node: String::new(),
            in_scope: false,
        }
    }
}

/// Single-pass recursive directory walk producing DiscoveryRecords.
///
/// Entries are visited in lexical order for deterministic output; dot
/// directories are skipped; symlinks are not followed.
#[derive(Debug, Clone)]
pub struct ResourceScanner {
    marker: Regex,
    entity: Regex,
    entity_suffix: String,
    resource_ext: String,
    param_template: String,
}

impl ResourceScanner {
    pub fn new(config: &ScanConfig) -> Result<Self, BindError> {
        if !config.param_template.contains("{name}") {
            return Err(BindError::InvalidTemplate {
                template: config.param_template.clone(),
            });
        }
        let marker = Regex::new(&config.marker_pattern).map_err(|source| {
            BindError::InvalidPattern {
                pattern: config.marker_pattern.clone(),
                source,
            }
        })?;
        let entity = Regex::new(&config.entity_pattern).map_err(|source| {
            BindError::InvalidPattern {
                pattern: config.entity_pattern.clone(),
                source,
            }
        })?;
        Ok(Self {
            marker,
            entity,
            entity_suffix: config.entity_suffix.clone(),
            resource_ext: config.resource_ext.clone(),
            param_template: config.param_template.clone(),
        })
    }

    pub fn scan(&self, root: &Path) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        self.visit(root, &TraversalContext::root(), &mut outcome);
        for error in &outcome.errors {
            warn!(path = %error.path().display(), "scan error: {}", error);
        }
        outcome
    }

    fn visit(&self, dir: &Path, ctx: &TraversalContext, outcome: &mut ScanOutcome) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(source) => {
                outcome.errors.push(ScanError::Unreadable {
                    path: dir.to_path_buf(),
                    source,
                });
                return;
            }
        };

        let mut entries: Vec<fs::DirEntry> = match entries.collect::<Result<_, _>>() {
            Ok(entries) => entries,
            Err(source) => {
                outcome.errors.push(ScanError::Unreadable {
                    path: dir.to_path_buf(),
                    source,
                });
                return;
            }
        };
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(source) => {
                    outcome.errors.push(ScanError::Metadata { path, source });
                    continue;
                }
            };

            if file_type.is_dir() {
                if name.starts_with('.') {
                    continue;
                }
                match self.descend(ctx, &name, &path) {
                    Ok(child) => self.visit(&path, &child, outcome),
                    Err(error) => outcome.errors.push(error),
                }
            } else if file_type.is_file() {
                let record = self.classify(ctx, name, path);
                debug!(
                    node = %record.node_name,
                    kind = ?record.kind,
                    "discovered resource file"
                );
                outcome.records.push(record);
            }
        }
    }

    /// Build the traversal context for a child directory.
    fn descend(
        &self,
        ctx: &TraversalContext,
        name: &str,
        path: &Path,
    ) -> Result<TraversalContext, ScanError> {
        let in_scope = ctx.in_scope || self.marker.is_match(&ctx.dir_name);
        if self.marker.is_match(name) {
            if ctx.dir_name.is_empty() {
                return Err(ScanError::MarkerAtRoot {
                    path: path.to_path_buf(),
                });
            }
            if self.marker.is_match(&ctx.dir_name) {
                return Err(ScanError::NestedMarker {
                    path: path.to_path_buf(),
                });
            }
            // The marker segment becomes the parameter; its parent, already
            // in the accumulated route, stays literal.
            Ok(TraversalContext {
                route: format!(
                    "{}/{}",
                    ctx.route,
                    param_segment(&self.param_template, &ctx.dir_name)
                ),
                dir_name: name.to_string(),
                node: ctx.dir_name.clone(),
                in_scope,
            })
        } else {
            Ok(TraversalContext {
                route: format!("{}/{}", ctx.route, name),
                dir_name: name.to_string(),
                node: name.to_string(),
                in_scope,
            })
        }
    }

    fn classify(&self, ctx: &TraversalContext, name: String, path: PathBuf) -> DiscoveryRecord {
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = Path::new(&name)
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let kind = match verb_for(&stem) {
            Some(verb) if ext == self.resource_ext => {
                let route = if ctx.route.is_empty() {
                    "/".to_string()
                } else {
                    ctx.route.clone()
                };
                ResourceKind::Method {
                    verb,
                    route,
                    permission: permission(&ctx.node, verb, ctx.in_scope),
                }
            }
            _ if self.entity.is_match(&name) => {
                let suffix = format!("{}.{}", self.entity_suffix, ext);
                let entity_name = name.strip_suffix(&suffix).unwrap_or(&stem).to_string();
                ResourceKind::Entity { name: entity_name }
            }
            _ => ResourceKind::Unhandled,
        };

        DiscoveryRecord {
            node_name: name,
            path,
            kind,
            in_param_scope: ctx.in_scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_stems_match_case_insensitively() {
        assert_eq!(verb_for("get"), Some("get"));
        assert_eq!(verb_for("DELETE"), Some("delete"));
        assert_eq!(verb_for("Put"), Some("put"));
        assert_eq!(verb_for("gets"), None);
        assert_eq!(verb_for(""), None);
    }

    #[test]
    fn test_descend_parameterizes_marker_directories() {
        let scanner = ResourceScanner::new(&ScanConfig::default()).unwrap();
        let root = TraversalContext::root();
        let alpha = scanner.descend(&root, "alpha", Path::new("/r/alpha")).unwrap();
        assert_eq!(alpha.route, "/alpha");
        assert!(!alpha.in_scope);

        let marker = scanner.descend(&alpha, "me", Path::new("/r/alpha/me")).unwrap();
        assert_eq!(marker.route, "/alpha/:alpha");
        assert_eq!(marker.node, "alpha");
        // Files directly inside the marker are not owner-scoped.
        assert!(!marker.in_scope);

        let sample = scanner
            .descend(&marker, "sample", Path::new("/r/alpha/me/sample"))
            .unwrap();
        assert_eq!(sample.route, "/alpha/:alpha/sample");
        assert_eq!(sample.node, "sample");
        assert!(sample.in_scope);
    }

    #[test]
    fn test_descend_rejects_misplaced_markers() {
        let scanner = ResourceScanner::new(&ScanConfig::default()).unwrap();
        let root = TraversalContext::root();
        assert!(matches!(
            scanner.descend(&root, "me", Path::new("/r/me")),
            Err(ScanError::MarkerAtRoot { .. })
        ));

        let alpha = scanner.descend(&root, "alpha", Path::new("/r/alpha")).unwrap();
        let marker = scanner.descend(&alpha, "me", Path::new("/r/alpha/me")).unwrap();
        assert!(matches!(
            scanner.descend(&marker, "me", Path::new("/r/alpha/me/me")),
            Err(ScanError::NestedMarker { .. })
        ));
    }

    #[test]
    fn test_classify_methods_entities_and_leftovers() {
        let scanner = ResourceScanner::new(&ScanConfig::default()).unwrap();
        let ctx = TraversalContext {
            route: "/alpha/:alpha/sample".to_string(),
            dir_name: "sample".to_string(),
            node: "sample".to_string(),
            in_scope: true,
        };

        let record = scanner.classify(&ctx, "get.toml".to_string(), PathBuf::from("get.toml"));
        assert_eq!(
            record.kind,
            ResourceKind::Method {
                verb: "get",
                route: "/alpha/:alpha/sample".to_string(),
                permission: "sample:get::owner".to_string(),
            }
        );
        assert!(record.in_param_scope);

        let record = scanner.classify(
            &ctx,
            "alpha-entity.toml".to_string(),
            PathBuf::from("alpha-entity.toml"),
        );
        assert_eq!(
            record.kind,
            ResourceKind::Entity {
                name: "alpha".to_string()
            }
        );

        let record = scanner.classify(&ctx, "readme.md".to_string(), PathBuf::from("readme.md"));
        assert_eq!(record.kind, ResourceKind::Unhandled);

        // Verb stem with the wrong extension is not a method file.
        let record = scanner.classify(&ctx, "get.md".to_string(), PathBuf::from("get.md"));
        assert_eq!(record.kind, ResourceKind::Unhandled);
    }

    #[test]
    fn test_classify_method_at_scan_root() {
        let scanner = ResourceScanner::new(&ScanConfig::default()).unwrap();
        let record = scanner.classify(
            &TraversalContext::root(),
            "get.toml".to_string(),
            PathBuf::from("get.toml"),
        );
        match record.kind {
            ResourceKind::Method { route, .. } => assert_eq!(route, "/"),
            other => panic!("expected method, got {:?}", other),
        }
    }

    #[test]
    fn test_compound_entity_names_keep_inner_dashes() {
        let scanner = ResourceScanner::new(&ScanConfig::default()).unwrap();
        let record = scanner.classify(
            &TraversalContext::root(),
            "alpha-beta-entity.toml".to_string(),
            PathBuf::from("alpha-beta-entity.toml"),
        );
        assert_eq!(
            record.kind,
            ResourceKind::Entity {
                name: "alpha-beta".to_string()
            }
        );
    }
}
