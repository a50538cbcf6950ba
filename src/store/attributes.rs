//! Attribute JSON decoder.
//!
//! The store hydrates an entry's attribute rows in a single query by
//! aggregating them into a JSON array of `{"name": ..., "value": ...}`
//! objects (via SQLite's `json_group_array`/`json_object`). This module
//! collapses that array into a name → ordered-values map with lower-cased
//! names, as the one place that shape is interpreted.

use crate::errors::{HeraclesError, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct AttributeRow {
    name: String,
    value: String,
}

/// Decodes a `json_group_array(json_object('name', ..., 'value', ...))`
/// aggregate into a lower-cased-name → ordered-values map. A `NULL` or
/// empty aggregate (produced by left-joining an entry with no attribute
/// rows) decodes to an empty map.
pub fn decode(json: Option<&str>) -> Result<HashMap<String, Vec<String>>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    let json = match json {
        None => return Ok(map),
        Some(j) if j.is_empty() || j == "[null]" => return Ok(map),
        Some(j) => j,
    };

    let rows: Vec<AttributeRow> =
        serde_json::from_str(json).map_err(|e| HeraclesError::Storage(e.to_string()))?;

    for row in rows {
        map.entry(row.name.to_lowercase()).or_default().push(row.value);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_multi_valued_attribute() {
        let json = r#"[{"name":"objectClass","value":"inetOrgPerson"},{"name":"mail","value":"a@b.com"},{"name":"mail","value":"c@d.com"}]"#;
        let decoded = decode(Some(json)).unwrap();
        assert_eq!(decoded.get("objectclass").unwrap(), &vec!["inetOrgPerson".to_string()]);
        assert_eq!(
            decoded.get("mail").unwrap(),
            &vec!["a@b.com".to_string(), "c@d.com".to_string()]
        );
    }

    #[test]
    fn null_aggregate_decodes_empty() {
        assert!(decode(None).unwrap().is_empty());
        assert!(decode(Some("[null]")).unwrap().is_empty());
    }
}
