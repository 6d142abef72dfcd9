// src/models/user.rs
//! Registered user records and the meta-file document shapes they arrive in.
//!
//! Meta files have been written by several generations of tooling: a JSON
//! array of users, a single user object, or a `{ "selectedUser": {...} }`
//! wrapper. [`MetaDocument`] accepts all of them and yields one canonical
//! `Vec<UserRecord>`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Organization recorded when a user carries none.
pub const DEFAULT_ORG: &str = "UPES";

/// Context URI recorded when a user carries none.
pub const DEFAULT_CONTEXT: &str =
    "https://myupes-beta.upes.ac.in/connectportal/user/student/collaboration/studentprofile";

/// A registered student identity.
///
/// Unknown fields are kept in `extra` so that rewriting a meta file never
/// drops data written by other tools.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub name: String,

    /// SAP id, the external identifier students verify with.
    #[serde(default, deserialize_with = "string_or_number")]
    pub sap: String,

    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_hex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_base64: Option<String>,

    // Legacy secret field names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_secret_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_secret: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, sap: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sap: sap.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// First stored secret, checked in the order
    /// `secretKeyHex`, `secretKey`, `kmsSecretKey`, `privateSecret`.
    pub fn stored_secret(&self) -> Option<&str> {
        [
            &self.secret_key_hex,
            &self.secret_key,
            &self.kms_secret_key,
            &self.private_secret,
        ]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .find(|s| !s.trim().is_empty())
    }

    /// Identifier used when building a credential subject: `id`, else
    /// `email`, else `sap`.
    pub fn subject_handle(&self) -> &str {
        non_empty(self.id.as_deref())
            .or_else(|| non_empty(Some(&self.email)))
            .unwrap_or(&self.sap)
    }

    pub fn org_or_default(&self) -> &str {
        non_empty(self.org.as_deref()).unwrap_or(DEFAULT_ORG)
    }

    pub fn context_or_default(&self) -> &str {
        non_empty(self.context.as_deref()).unwrap_or(DEFAULT_CONTEXT)
    }

    /// Name shown when listing users interactively.
    pub fn display_name(&self) -> &str {
        non_empty(Some(&self.name))
            .or_else(|| non_empty(self.id.as_deref()))
            .unwrap_or("unnamed")
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Every shape a meta file is accepted in.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum MetaDocument {
    Collection(Vec<Value>),
    Wrapped {
        #[serde(rename = "selectedUser")]
        selected_user: Value,
    },
    Single(Map<String, Value>),
}

impl MetaDocument {
    /// Flattens the document into canonical records, skipping entries that
    /// are not recognizable users.
    pub fn into_records(self) -> Vec<UserRecord> {
        match self {
            MetaDocument::Collection(items) => items.iter().filter_map(user_from_value).collect(),
            MetaDocument::Wrapped { selected_user } => {
                user_from_value(&selected_user).into_iter().collect()
            }
            MetaDocument::Single(map) => user_from_value(&Value::Object(map)).into_iter().collect(),
        }
    }
}

/// Parses one user object, unwrapping `selectedUser` when present.
///
/// A user needs a `name` and at least one of `id`, `email` or `sap`.
pub fn user_from_value(value: &Value) -> Option<UserRecord> {
    let obj = value.as_object()?;
    if let Some(inner) = obj.get("selectedUser").filter(|v| v.is_object()) {
        return user_from_value(inner);
    }
    if !obj.contains_key("name") || !["id", "email", "sap"].iter().any(|k| obj.contains_key(*k)) {
        log::debug!("skipping meta entry without name and id/email/sap");
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            log::debug!("skipping malformed meta entry: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<UserRecord> {
        serde_json::from_value::<MetaDocument>(value)
            .map(MetaDocument::into_records)
            .unwrap_or_default()
    }

    #[test]
    fn test_array_document() {
        let users = records(json!([
            {"name": "A", "sap": "1", "email": "a@x.com"},
            {"name": "B", "sap": "2", "email": "b@x.com"}
        ]));
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "B");
    }

    #[test]
    fn test_single_object_document() {
        let users = records(json!({"name": "A", "sap": "1", "email": "a@x.com"}));
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].sap, "1");
    }

    #[test]
    fn test_selected_user_wrapper() {
        let users = records(json!({"selectedUser": {"id": "u-7", "name": "C"}}));
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id.as_deref(), Some("u-7"));
        assert_eq!(users[0].subject_handle(), "u-7");
    }

    #[test]
    fn test_unrecognized_entries_are_skipped() {
        let users = records(json!([{"foo": 1}, {"name": "only-name"}, {"name": "D", "email": "d@x"}]));
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "D");
        assert!(records(json!("just a string")).is_empty());
    }

    #[test]
    fn test_numeric_sap_and_unknown_fields_survive() {
        let users = records(json!([{"name": "E", "sap": 500012, "email": "e@x", "batch": 2024}]));
        assert_eq!(users[0].sap, "500012");
        let back = serde_json::to_value(&users[0]).unwrap();
        assert_eq!(back["batch"], json!(2024));
        assert_eq!(back["sap"], json!("500012"));
    }

    #[test]
    fn test_stored_secret_precedence() {
        let mut user = UserRecord::new("A", "1", "a@x");
        assert_eq!(user.stored_secret(), None);
        user.private_secret = Some("p".into());
        user.secret_key = Some("  ".into());
        assert_eq!(user.stored_secret(), Some("p"));
        user.secret_key_hex = Some("abcd".into());
        assert_eq!(user.stored_secret(), Some("abcd"));
    }

    #[test]
    fn test_defaults() {
        let user = UserRecord::new("A", "1", "a@x");
        assert_eq!(user.org_or_default(), DEFAULT_ORG);
        assert_eq!(user.context_or_default(), DEFAULT_CONTEXT);
        assert_eq!(user.subject_handle(), "a@x");
    }
}
