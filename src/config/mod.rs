use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::BindError;

/// Top-level configuration. Built once at startup and passed explicitly
/// through the service context; there is no process-wide singleton.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub map: MapperConfig,
    pub security: SecurityConfig,
    pub lifecycle: LifecycleConfig,
}

/// Naming conventions honored by the tree scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory name that turns its parent into a route parameter.
    pub marker_pattern: String,
    /// File-name pattern declaring a domain entity.
    pub entity_pattern: String,
    /// Suffix stripped from an entity file stem to get the entity name.
    pub entity_suffix: String,
    /// Extension of resource files; anything else is reported unhandled.
    pub resource_ext: String,
    /// Route parameter template; `{name}` expands to the parent directory name.
    pub param_template: String,
}

/// Conventions for flat path-to-route mapping of sentinel files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    pub marker_pattern: String,
    /// Parameter template for mapped routes; `{name}` expands to the
    /// literal segment preceding the marker.
    pub param_template: String,
    /// `<dir>/trellis.toml` maps to the directory route; `<dir>/zeta.trellis.toml`
    /// maps to `<dir route>/zeta`.
    pub sentinel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Inverts claim evaluation: a matched claim DENIES instead of permits.
    pub allow_by_default: bool,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Upper bound for a single stage handler; none means unbounded.
    pub stage_timeout_ms: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            marker_pattern: "^me$".to_string(),
            entity_pattern: r"^([\w]+-)+entity\.toml$".to_string(),
            entity_suffix: "-entity".to_string(),
            resource_ext: "toml".to_string(),
            param_template: ":{name}".to_string(),
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            marker_pattern: "^me$".to_string(),
            param_template: ":{name}Id".to_string(),
            sentinel: "trellis.toml".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_by_default: false,
            jwt_secret: "dev-secret-change-me".to_string(),
            jwt_expiry_hours: 24,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Scan overrides
        if let Ok(v) = env::var("TRELLIS_MARKER_PATTERN") {
            self.scan.marker_pattern = v.clone();
            self.map.marker_pattern = v;
        }
        if let Ok(v) = env::var("TRELLIS_ENTITY_PATTERN") {
            self.scan.entity_pattern = v;
        }
        if let Ok(v) = env::var("TRELLIS_ENTITY_SUFFIX") {
            self.scan.entity_suffix = v;
        }
        if let Ok(v) = env::var("TRELLIS_RESOURCE_EXT") {
            self.scan.resource_ext = v;
        }
        if let Ok(v) = env::var("TRELLIS_PARAM_TEMPLATE") {
            self.scan.param_template = v;
        }

        // Mapper overrides
        if let Ok(v) = env::var("TRELLIS_SENTINEL") {
            self.map.sentinel = v;
        }
        if let Ok(v) = env::var("TRELLIS_SENTINEL_PARAM_TEMPLATE") {
            self.map.param_template = v;
        }

        // Security overrides
        if let Ok(v) = env::var("TRELLIS_ALLOW_BY_DEFAULT") {
            self.security.allow_by_default = v.parse().unwrap_or(self.security.allow_by_default);
        }
        if let Ok(v) = env::var("TRELLIS_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("TRELLIS_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // Lifecycle overrides
        if let Ok(v) = env::var("TRELLIS_STAGE_TIMEOUT_MS") {
            self.lifecycle.stage_timeout_ms = v.parse().ok();
        }

        self
    }

    /// Reject templates and patterns that cannot produce routes. Runs
    /// before any scan or bind work, so a bad convention set fails
    /// assembly rather than the first request.
    pub fn validate(&self) -> Result<(), BindError> {
        for template in [&self.scan.param_template, &self.map.param_template] {
            if !template.contains("{name}") {
                return Err(BindError::InvalidTemplate {
                    template: template.clone(),
                });
            }
        }
        for pattern in [
            &self.scan.marker_pattern,
            &self.scan.entity_pattern,
            &self.map.marker_pattern,
        ] {
            regex::Regex::new(pattern).map_err(|source| BindError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl LifecycleConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }
}
