use std::fmt;

use serde::{Deserialize, Serialize};

/// Colon-delimited permission template attached to a bound method, e.g.
/// `gama:put::owner`. A trailing `:owner` token is a placeholder resolved
/// against the requesting principal's subject before claim matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission(String);

impl Permission {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner_scoped(&self) -> bool {
        self.0.ends_with(":owner")
    }

    /// Substitute the trailing owner placeholder with the requester's
    /// subject: `profile:get::owner` resolved for `456` is `profile:get:456`.
    pub fn resolve(&self, owner: &str) -> String {
        match self.0.strip_suffix(":owner") {
            Some(prefix) => format!("{}{}", prefix, owner),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Permission {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for Permission {
    fn from(template: String) -> Self {
        Self(template)
    }
}
