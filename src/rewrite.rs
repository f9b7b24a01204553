//! Field rewriters: one per way a key can be embedded in a column value.
//!
//! A rewriter returns `Some(new_value)` only when it actually changed
//! something. A value that does not carry the key in the expected shape is
//! left alone, which is also how malformed encodings are handled.

use crate::core::{Row, Value};

pub trait FieldRewriter {
    fn rewrite(&self, value: &str, old_key: &str, new_key: &str) -> Option<String>;
}

/// Whole-value equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchRewriter;

impl FieldRewriter for ExactMatchRewriter {
    fn rewrite(&self, value: &str, old_key: &str, new_key: &str) -> Option<String> {
        (value == old_key).then(|| new_key.to_string())
    }
}

/// The key as a double-quoted token inside a serialized parameter blob,
/// e.g. `["alice","file.txt"]`. Only the quoted form is replaced, every
/// occurrence of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodedSubstringRewriter;

impl EncodedSubstringRewriter {
    pub fn token(key: &str) -> String {
        format!("\"{}\"", key)
    }
}

impl FieldRewriter for EncodedSubstringRewriter {
    fn rewrite(&self, value: &str, old_key: &str, new_key: &str) -> Option<String> {
        let old_token = Self::token(old_key);
        if !value.contains(&old_token) {
            return None;
        }
        Some(value.replace(&old_token, &Self::token(new_key)))
    }
}

/// The key as the leading segment of a slash-delimited path: `/alice/files/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSegmentRewriter;

impl FieldRewriter for PathSegmentRewriter {
    fn rewrite(&self, value: &str, old_key: &str, new_key: &str) -> Option<String> {
        let prefix = format!("/{}/", old_key);
        value
            .strip_prefix(&prefix)
            .map(|rest| format!("/{}/{}", new_key, rest))
    }
}

/// Several exact-match roles on one row (owner, initiator, recipient...).
/// Each column is judged on its own; columns that never held the key keep
/// their value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiRoleRewriter;

impl MultiRoleRewriter {
    /// Returns the `(column, new value)` pairs that changed.
    pub fn rewrite_row(
        &self,
        row: &Row,
        columns: &[&str],
        old_key: &str,
        new_key: &str,
    ) -> Vec<(String, Value)> {
        columns
            .iter()
            .filter_map(|column| {
                let current = row.get(*column)?.as_str()?;
                ExactMatchRewriter
                    .rewrite(current, old_key, new_key)
                    .map(|v| (column.to_string(), Value::Text(v)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row;

    #[test]
    fn test_exact_match() {
        assert_eq!(ExactMatchRewriter.rewrite("alice", "alice", "u-1"), Some("u-1".into()));
        assert_eq!(ExactMatchRewriter.rewrite("alice2", "alice", "u-1"), None);
        assert_eq!(ExactMatchRewriter.rewrite("Alice", "alice", "u-1"), None);
    }

    #[test]
    fn test_encoded_replaces_all_quoted_occurrences() {
        let blob = r#"{"actor":"alice","target":"alice","path":"/alice/x"}"#;
        let out = EncodedSubstringRewriter.rewrite(blob, "alice", "u-1").unwrap();
        assert_eq!(out, r#"{"actor":"u-1","target":"u-1","path":"/alice/x"}"#);
    }

    #[test]
    fn test_encoded_respects_quote_boundaries() {
        let blob = r#"["notOldKey123","OldKey123x"]"#;
        assert_eq!(EncodedSubstringRewriter.rewrite(blob, "OldKey123", "u-1"), None);
        // unquoted occurrence is not the encoded form
        assert_eq!(EncodedSubstringRewriter.rewrite("alice shared", "alice", "u-1"), None);
    }

    #[test]
    fn test_path_prefix_only() {
        assert_eq!(
            PathSegmentRewriter.rewrite("/alice/files/Photos/", "alice", "u-1"),
            Some("/u-1/files/Photos/".into())
        );
        assert_eq!(PathSegmentRewriter.rewrite("/alice/", "alice", "u-1"), Some("/u-1/".into()));
        assert_eq!(PathSegmentRewriter.rewrite("/other/alice/sub", "alice", "u-1"), None);
        assert_eq!(PathSegmentRewriter.rewrite("/alice2/files/", "alice", "u-1"), None);
        assert_eq!(PathSegmentRewriter.rewrite("/alice", "alice", "u-1"), None);
        assert_eq!(PathSegmentRewriter.rewrite("alice/files/", "alice", "u-1"), None);
    }

    #[test]
    fn test_multi_role_keeps_other_roles() {
        let share = row([
            ("share_with", Value::from("alice")),
            ("uid_owner", Value::from("bob")),
            ("uid_initiator", Value::from("alice")),
        ]);
        let changes = MultiRoleRewriter.rewrite_row(
            &share,
            &["share_with", "uid_owner", "uid_initiator"],
            "alice",
            "u-1",
        );
        assert_eq!(
            changes,
            vec![
                ("share_with".to_string(), Value::from("u-1")),
                ("uid_initiator".to_string(), Value::from("u-1")),
            ]
        );
    }

    #[test]
    fn test_multi_role_ignores_nulls() {
        let r = row([("share_with", Value::Null), ("uid_owner", Value::from("alice"))]);
        let changes = MultiRoleRewriter.rewrite_row(&r, &["share_with", "uid_owner"], "alice", "u-1");
        assert_eq!(changes.len(), 1);
    }
}
