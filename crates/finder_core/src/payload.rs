//! Parsing of admin user payloads.
//!
//! Accepted user object:
//!
//! ```json
//! { "id": "u-1", "email": "a@b.c", "name": "Ann", "role": "admin", "createdAt": "2024-05-01T10:00:00Z" }
//! ```
//!
//! `name`, `role` (default `user`) and `createdAt` are optional. The only
//! fallback is the `{ "user": { ... } }` envelope. Lists are either a bare
//! array or `{ "users": [ ... ] }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::UserProfile;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Invalid user payload: {0}")]
    InvalidUser(#[source] serde_json::Error),
    #[error("Invalid user at index {index}: {source}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Expected a list of users")]
    NotAList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

pub fn parse_admin_user(value: &Value) -> Result<AdminUser, PayloadError> {
    match AdminUser::deserialize(value) {
        Ok(user) => Ok(user),
        Err(direct) => match value.get("user") {
            Some(inner) => AdminUser::deserialize(inner).map_err(PayloadError::InvalidUser),
            None => Err(PayloadError::InvalidUser(direct)),
        },
    }
}

pub fn parse_admin_users(value: &Value) -> Result<Vec<AdminUser>, PayloadError> {
    let entries = value
        .as_array()
        .or_else(|| value.get("users").and_then(Value::as_array))
        .ok_or(PayloadError::NotAList)?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            AdminUser::deserialize(entry)
                .map_err(|source| PayloadError::InvalidEntry { index, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use serde_json::json;

    #[test]
    fn test_parse_plain_user() {
        let user = parse_admin_user(&json!({
            "id": "u-1",
            "email": "ann@example.com",
            "name": "Ann",
            "role": "admin",
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(user.profile.role, Role::Admin);
        assert!(user.created_at.is_some());
    }

    #[test]
    fn test_parse_enveloped_user_with_defaults() {
        let user = parse_admin_user(&json!({"user": {"id": "u-2", "email": "bob@example.com"}})).unwrap();
        assert_eq!(user.profile.id, "u-2");
        assert_eq!(user.profile.role, Role::User);
        assert_eq!(user.profile.name, "");
        assert!(user.created_at.is_none());
    }

    #[test]
    fn test_parse_rejects_other_spellings() {
        let result = parse_admin_user(&json!({"_id": "u-3", "mail": "c@example.com"}));
        assert!(matches!(result, Err(PayloadError::InvalidUser(_))));

        let result = parse_admin_user(&json!({"user": {"id": "u-3"}}));
        assert!(matches!(result, Err(PayloadError::InvalidUser(_))));
    }

    #[test]
    fn test_parse_user_lists() {
        let bare = json!([{"id": "u-1", "email": "a@example.com"}]);
        assert_eq!(parse_admin_users(&bare).unwrap().len(), 1);

        let wrapped = json!({"users": [
            {"id": "u-1", "email": "a@example.com"},
            {"id": "u-2", "email": "b@example.com", "role": "admin"}
        ]});
        assert_eq!(parse_admin_users(&wrapped).unwrap()[1].profile.role, Role::Admin);

        let broken = json!({"users": [{"id": "u-1", "email": "a@example.com"}, {"id": 7}]});
        assert!(matches!(
            parse_admin_users(&broken),
            Err(PayloadError::InvalidEntry { index: 1, .. })
        ));

        assert!(matches!(
            parse_admin_users(&json!({"data": []})),
            Err(PayloadError::NotAList)
        ));
    }
}
