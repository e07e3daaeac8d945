use serde::{Deserialize, Serialize};

const WILDCARD: &str = "*";

/// One wildcard claim, parsed from strings like `*:*:456` or
/// `profile:get,put`. Colon-delimited parts, comma-delimited subparts,
/// matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    parts: Vec<Vec<String>>,
}

impl Claim {
    pub fn parse(raw: &str) -> Self {
        let parts = raw
            .split(':')
            .map(|part| {
                part.split(',')
                    .map(|sub| sub.trim().to_lowercase())
                    .collect()
            })
            .collect();
        Self { parts }
    }

    /// Whether this claim covers `permission` (a fully resolved permission
    /// string). A claim with fewer parts than the permission implies the
    /// remainder; a claim with more parts only matches when every extra
    /// part is a wildcard.
    pub fn permits(&self, permission: &str) -> bool {
        let required: Vec<Vec<String>> = Claim::parse(permission).parts;

        for (i, required_part) in required.iter().enumerate() {
            let claim_part = match self.parts.get(i) {
                Some(part) => part,
                None => return true,
            };
            if claim_part.iter().any(|sub| sub == WILDCARD) {
                continue;
            }
            if !required_part.iter().all(|sub| claim_part.contains(sub)) {
                return false;
            }
        }

        self.parts[required.len()..]
            .iter()
            .all(|part| part.iter().any(|sub| sub == WILDCARD))
    }
}

/// Authenticated requester: an opaque subject identifier plus the claim
/// strings granted to it. Arrives already authenticated; this crate only
/// ever evaluates claims, it never verifies identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub claims: Vec<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, claims: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            claims,
        }
    }

    /// First-match-wins across the claim list; no partial-match aggregation.
    pub fn permits(&self, permission: &str) -> bool {
        self.claims
            .iter()
            .any(|claim| Claim::parse(claim).permits(permission))
    }
}

/// Apply the global evaluation mode: normally a matched claim permits, but
/// under `allow_by_default` the claim list is a deny list and a match
/// refuses access.
pub fn is_authorized(claim_permitted: bool, allow_by_default: bool) -> bool {
    if allow_by_default {
        !claim_permitted
    } else {
        claim_permitted
    }
}
