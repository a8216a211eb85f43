//! Shared Serde helpers
//!
//! Default value functions plus a lenient identifier deserializer for request
//! bodies from loosely typed API clients: `null` or `""` become None, and
//! `"dev-42"` or `42` become Some("dev-42") / Some("42").

use serde::{Deserialize, Deserializer};

/// Default value: false
pub fn bool_false() -> bool {
    false
}

/// Optional identifier given either as a JSON string or a number
///
/// Numbers are kept as their decimal text; blank strings become None.
pub fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(i64),
    }

    match Option::<StringOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrInt::String(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOrInt::String(s)) => Ok(Some(s.trim().to_string())),
        Some(StringOrInt::Int(i)) => Ok(Some(i.to_string())),
    }
}
