//! Utility functions for identifiers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique surrogate id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// A uuid7 rendered in its canonical form. Lexicographic order follows creation order.
pub fn new_ordered_id() -> String {
    uuid7().to_string()
}

/// Secondary-index key `scope 0x00 id`. Prefix scans over `scope` stay exact
/// since the separator cannot extend another scope.
pub fn scoped_key(scope: &str, id: &str) -> Vec<u8> {
    let mut key = scope_prefix(scope);
    key.extend_from_slice(id.as_bytes());
    key
}

pub fn scope_prefix(scope: &str) -> Vec<u8> {
    let mut key = scope.as_bytes().to_vec();
    key.push(0);
    key
}
