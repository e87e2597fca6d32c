//! Ledger entity identifiers.
//!
//! Identities are opaque `shard.realm.num` strings. Equality is string
//! equality. Two reserved forms exist for negative scenarios: the empty string
//! (structurally invalid, rejected before business validation) and a
//! syntactically valid id that never exists on a test network.

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Structurally invalid identity.
pub const EMPTY_ID: &str = "";

/// Well-formed account id that is never allocated on a test network.
pub const NONEXISTENT_ACCOUNT_ID: &str = "123.456.789";

/// Well-formed token id that is never allocated on a test network.
pub const NONEXISTENT_TOKEN_ID: &str = "123.456.789";

fn entity_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"^(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)$")
            .expect("constant entity id pattern")
    })
}

/// Whether `id` has the `shard.realm.num` shape.
pub fn is_entity_id(id: &str) -> bool {
    entity_id_pattern().is_match(id)
}

/// Entity number (last component) of a well-formed id.
pub fn entity_num(id: &str) -> Option<u64> {
    if !is_entity_id(id) {
        return None;
    }
    id.rsplit('.').next()?.parse().ok()
}

/// Build an id in shard 0, realm 0.
pub fn entity_id(num: u64) -> String {
    format!("0.0.{}", num)
}

/// A single non-fungible item: token plus serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NftId {
    /// Token the item belongs to
    pub token_id: String,
    /// Serial number within the token
    pub serial: u64,
}

impl NftId {
    /// Create a new NFT id.
    pub fn new(token_id: impl Into<String>, serial: u64) -> Self {
        Self {
            token_id: token_id.into(),
            serial,
        }
    }
}

impl fmt::Display for NftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.token_id, self.serial)
    }
}
