// src/core/dynamic_config/schema.rs

//! Schema versioning for dynamic config modules.
//!
//! The version is a hash over the module's field structure, derived from the
//! canonical JSON form of the default value (field names, nesting, and default
//! values all contribute). Adding, removing, renaming or re-defaulting a field
//! changes the hash, which triggers re-validation of stored rows on startup.

use crate::core::errors::McAdminError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A typed, hot-reloadable configuration module.
pub trait ConfigModule:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// Stable key of this module in the `dynamic_config` table.
    const MODULE_NAME: &'static str;

    /// Semantic validation beyond what serde enforces structurally.
    fn validate(&self) -> Result<(), McAdminError> {
        Ok(())
    }

    /// Hash of the current schema, 16 hex chars.
    fn schema_version() -> String {
        let default = Self::default();
        let value = serde_json::to_value(&default).unwrap_or(Value::Null);
        hash_value_schema(&value)
    }
}

/// Hashes a JSON value into a 16-hex-char schema version. Also used by the
/// cron registry to version job parameter schemas.
pub fn hash_value_schema(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..8])
}

/// Serializes a JSON value with object keys sorted, so the hash does not
/// depend on serialization order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format!("{key:?}:"));
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Clone)]
    struct Sample {
        alpha: u32,
        beta: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                alpha: 3,
                beta: "x".into(),
            }
        }
    }

    impl ConfigModule for Sample {
        const MODULE_NAME: &'static str = "sample";
    }

    #[derive(Serialize, Deserialize, Clone, Default)]
    struct Other {
        alpha: u32,
    }

    impl ConfigModule for Other {
        const MODULE_NAME: &'static str = "other";
    }

    #[test]
    fn version_is_stable_and_distinguishes_schemas() {
        assert_eq!(Sample::schema_version(), Sample::schema_version());
        assert_ne!(Sample::schema_version(), Other::schema_version());
        assert_eq!(Sample::schema_version().len(), 16);
    }
}
