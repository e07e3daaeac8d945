use std::path::{Component, Path};

use regex::Regex;

use crate::config::MapperConfig;
use crate::error::{BindError, ScanError};

/// Expand the parameter template for a marker whose parent directory is
/// `parent`: template `:{name}` gives `:alpha`, `:{name}Id` gives `:alphaId`.
pub fn param_segment(template: &str, parent: &str) -> String {
    template.replace("{name}", parent)
}

/// Render the permission template for a resource node and verb. Owner-scoped
/// templates carry a trailing `::owner` placeholder that authorization
/// resolves to the requesting principal's subject.
pub fn permission(node: &str, verb: &str, owner_scoped: bool) -> String {
    let base = format!("{}:{}", node, verb.to_lowercase());
    if owner_scoped {
        format!("{}::owner", base)
    } else {
        base
    }
}

/// Result of mapping one resource file path to its route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRoute {
    pub route: String,
    pub permission_node: String,
    pub owner_scoped: bool,
}

impl MappedRoute {
    pub fn permission_for(&self, verb: &str) -> String {
        permission(&self.permission_node, verb, self.owner_scoped)
    }
}

/// Flat path-to-route mapping for sentinel-named resource files, the
/// counterpart to the tree scanner for pre-globbed file lists.
///
/// `<dir>/trellis.toml` maps to the directory's own route;
/// `<dir>/zeta.trellis.toml` maps to `<dir route>/zeta`. Marker directories
/// substitute as in the scanner: the marker segment becomes a parameter
/// named after its literal parent, which stays in the route.
#[derive(Debug, Clone)]
pub struct Mapper {
    marker: Regex,
    param_template: String,
    sentinel: String,
}

impl Mapper {
    pub fn new(config: &MapperConfig) -> Result<Self, BindError> {
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
        Ok(Self {
            marker,
            param_template: config.param_template.clone(),
            sentinel: config.sentinel.clone(),
        })
    }

    pub fn param_segment(&self, parent: &str) -> String {
        param_segment(&self.param_template, parent)
    }

    /// Map `path` (under `base`) to a route and permission template.
    ///
    /// Each marker segment resolves against the original segment preceding
    /// it, never against substituted text, so nested markers each resolve
    /// exactly once. A marker with no literal parent is a configuration
    /// error, not a malformed route.
    pub fn map_route(&self, path: &Path, base: &Path) -> Result<MappedRoute, ScanError> {
        let rel = path.strip_prefix(base).unwrap_or(path);
        let mut segments: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let file_name = segments.pop().unwrap_or_default();
        let dotted = format!(".{}", self.sentinel);
        let leaf: Option<String> = if file_name == self.sentinel {
            None
        } else if let Some(stem) = file_name.strip_suffix(&dotted) {
            Some(stem.to_string())
        } else {
            Some(
                Path::new(&file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or(file_name.clone()),
            )
        };

        let mut parts: Vec<String> = Vec::with_capacity(segments.len() + 1);
        for (i, seg) in segments.iter().enumerate() {
            if self.marker.is_match(seg) {
                if i == 0 {
                    return Err(ScanError::MarkerAtRoot {
                        path: path.to_path_buf(),
                    });
                }
                if self.marker.is_match(&segments[i - 1]) {
                    return Err(ScanError::NestedMarker {
                        path: path.to_path_buf(),
                    });
                }
                parts.push(self.param_segment(&segments[i - 1]));
            } else {
                parts.push(seg.clone());
            }
        }

        let (permission_node, owner_scoped) = match &leaf {
            Some(stem) => (stem.clone(), segments.iter().any(|s| self.marker.is_match(s))),
            None if segments.is_empty() => (String::new(), false),
            None => {
                let last = segments.len() - 1;
                let node = if self.marker.is_match(&segments[last]) {
                    segments[last - 1].clone()
                } else {
                    segments[last].clone()
                };
                let owner = segments[..last].iter().any(|s| self.marker.is_match(s));
                (node, owner)
            }
        };

        if let Some(stem) = leaf {
            parts.push(stem);
        }
        let route = if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        };

        Ok(MappedRoute {
            route,
            permission_node,
            owner_scoped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> Mapper {
        Mapper::new(&MapperConfig::default()).unwrap()
    }

    #[test]
    fn test_directory_sentinel_maps_to_directory_route() {
        let mapped = mapper()
            .map_route(
                Path::new("/srv/resource/alpha/me/beta/me/gama/trellis.toml"),
                Path::new("/srv/resource"),
            )
            .unwrap();
        assert_eq!(mapped.route, "/alpha/:alphaId/beta/:betaId/gama");
        assert_eq!(mapped.permission_for("put"), "gama:put::owner");
    }

    #[test]
    fn test_dotted_sentinel_maps_to_leaf_route() {
        let mapped = mapper()
            .map_route(
                Path::new("/srv/resource/beta/me/zeta.trellis.toml"),
                Path::new("/srv/resource"),
            )
            .unwrap();
        assert_eq!(mapped.route, "/beta/:betaId/zeta");
        assert_eq!(mapped.permission_for("get"), "zeta:get::owner");
    }

    #[test]
    fn test_route_without_markers_has_no_owner_scope() {
        let mapped = mapper()
            .map_route(
                Path::new("/srv/resource/delta/trellis.toml"),
                Path::new("/srv/resource"),
            )
            .unwrap();
        assert_eq!(mapped.route, "/delta");
        assert_eq!(mapped.permission_for("get"), "delta:get");
        assert!(!mapped.owner_scoped);
    }

    #[test]
    fn test_sentinel_at_root_maps_to_root_route() {
        let mapped = mapper()
            .map_route(Path::new("/srv/resource/trellis.toml"), Path::new("/srv/resource"))
            .unwrap();
        assert_eq!(mapped.route, "/");
        assert_eq!(mapped.permission_node, "");
    }

    #[test]
    fn test_marker_at_root_is_an_error() {
        let err = mapper()
            .map_route(
                Path::new("/srv/resource/me/get.trellis.toml"),
                Path::new("/srv/resource"),
            )
            .unwrap_err();
        assert!(matches!(err, ScanError::MarkerAtRoot { .. }));
    }

    #[test]
    fn test_marker_under_marker_is_an_error() {
        let err = mapper()
            .map_route(
                Path::new("/srv/resource/alpha/me/me/trellis.toml"),
                Path::new("/srv/resource"),
            )
            .unwrap_err();
        assert!(matches!(err, ScanError::NestedMarker { .. }));
    }

    #[test]
    fn test_each_marker_substitutes_exactly_once() {
        // Alternating literal/marker nesting at increasing depths; every
        // parameter appears exactly once and stays owner-scoped.
        for depth in 1..=6 {
            let mut raw = String::from("/srv/resource");
            for i in 0..depth {
                raw.push_str(&format!("/p{}/me", i));
            }
            raw.push_str("/leaf.trellis.toml");
            let mapped = mapper()
                .map_route(Path::new(&raw), Path::new("/srv/resource"))
                .unwrap();
            for i in 0..depth {
                let param = format!(":p{}Id", i);
                assert_eq!(
                    mapped.route.matches(&param).count(),
                    1,
                    "route {} should contain {} exactly once",
                    mapped.route,
                    param
                );
            }
            assert!(mapped.permission_for("get").ends_with("::owner"));
        }
    }

    #[test]
    fn test_custom_param_template() {
        let config = MapperConfig {
            param_template: "{{name}}".to_string(),
            ..MapperConfig::default()
        };
        let mapped = Mapper::new(&config)
            .unwrap()
            .map_route(
                Path::new("/srv/resource/alpha/me/trellis.toml"),
                Path::new("/srv/resource"),
            )
            .unwrap();
        assert_eq!(mapped.route, "/alpha/{alpha}");
    }

    #[test]
    fn test_template_without_placeholder_is_rejected() {
        let config = MapperConfig {
            param_template: ":id".to_string(),
            ..MapperConfig::default()
        };
        assert!(matches!(
            Mapper::new(&config),
            Err(BindError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_permission_rendering() {
        assert_eq!(permission("gama", "PUT", true), "gama:put::owner");
        assert_eq!(permission("alpha", "post", false), "alpha:post");
    }
}
