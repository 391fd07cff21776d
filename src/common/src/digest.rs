// Copyright 2023 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Canonical JSON serialization and digesting: keys
//! sorted lexicographically at every object level, no insignificant
//! whitespace, UTF-8. Used by the registry loader, the plan linker, and the
//! plan store so that two independent producers of the same logical JSON
//! value always agree on its digest.

use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

/// Serializes `value` into its canonical byte form: object keys sorted
/// lexicographically (recursively), arrays left in their given order, no
/// extra whitespace.
pub fn to_canonical_bytes(value: &serde_json::Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut Vec<u8>) {
    match value {
        serde_json::Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&serde_json::Value::String((*key).clone()), out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
        serde_json::Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        other => {
            // Scalars serialize identically regardless of key order; `serde_json`
            // never inserts insignificant whitespace in its compact writer.
            out.extend_from_slice(other.to_string().as_bytes());
        }
    }
}

/// `sha256` of the canonical serialization, hex-encoded.
pub fn canonical_digest(value: &serde_json::Value) -> EngineResult<String> {
    let bytes = to_canonical_bytes(value);
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex_encode(&hasher.finalize()))
}

/// Digest of a serializable Rust value, going through `serde_json::Value`
/// first so map key ordering is normalized before hashing.
pub fn canonical_digest_of<T: serde::Serialize>(value: &T) -> EngineResult<String> {
    let json = serde_json::to_value(value)
        .map_err(|e| EngineError::validation(format!("failed to serialize for digest: {e}")))?;
    canonical_digest(&json)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0xf) as usize] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_digest() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let b = json!({"a": 2, "c": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(canonical_digest(&a).unwrap(), canonical_digest(&b).unwrap());
    }

    #[test]
    fn array_order_does_affect_digest() {
        let a = json!({"xs": [1, 2, 3]});
        let b = json!({"xs": [3, 2, 1]});
        assert_ne!(canonical_digest(&a).unwrap(), canonical_digest(&b).unwrap());
    }

    #[test]
    fn digest_is_deterministic_across_calls() {
        let v = json!({"plan_name": "p", "nodes": [1, 2, 3]});
        assert_eq!(canonical_digest(&v).unwrap(), canonical_digest(&v).unwrap());
    }
}
