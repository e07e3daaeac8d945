use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stages with fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Stage {
    RequestReceived = 0, // request-scoped setup, bookkeeping
    Validate = 1,        // input checks
    Authorize = 2,       // claim evaluation; a default handler is installed when absent
    BeforeRespond = 3,   // preparation that precedes the response
    Respond = 4,         // writes the response
    AfterRespond = 5,    // post-response work; runs only when Respond ran
}

impl Stage {
    /// Every stage, in the order the chain drives them. Authorize always
    /// precedes Respond; AfterRespond is always last.
    pub const ORDER: [Stage; 6] = [
        Stage::RequestReceived,
        Stage::Validate,
        Stage::Authorize,
        Stage::BeforeRespond,
        Stage::Respond,
        Stage::AfterRespond,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::RequestReceived => "receive",
            Stage::Validate => "validate",
            Stage::Authorize => "authorize",
            Stage::BeforeRespond => "before",
            Stage::Respond => "respond",
            Stage::AfterRespond => "after",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
