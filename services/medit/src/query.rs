//! Range query parameters and result trimming.

use serde_json::Value;

/// Fields never truncated by `max_len`
pub const PROTECTED_FIELDS: [&str; 4] = ["id", "type", "at", "date"];

/// A time-window query over one context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeQuery {
    /// Inclusive lower bound, epoch seconds
    pub begin_at: i64,
    /// Inclusive upper bound, epoch seconds
    pub end_at: i64,
    /// Return whole documents instead of `{id, at}`
    pub detail: bool,
    /// Leading matches to discard
    pub skip: usize,
    /// Cap on returned rows
    pub max: Option<usize>,
    /// Cap on the length of unprotected string fields
    pub max_len: Option<usize>,
}

impl RangeQuery {
    /// Build a query from raw request values, where a negative `max`, `skip`
    /// or `max_len` switches that option off
    pub fn from_raw(
        begin_at: i64,
        end_at: i64,
        detail: bool,
        max: i64,
        skip: i64,
        max_len: i64,
    ) -> Self {
        Self {
            begin_at,
            end_at,
            detail,
            skip: non_negative(skip).unwrap_or(0),
            max: non_negative(max),
            max_len: non_negative(max_len),
        }
    }
}

fn non_negative(value: i64) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Apply `max` to the row list, then `max_len` to every row
pub fn trim(mut rows: Vec<Value>, max: Option<usize>, max_len: Option<usize>) -> Vec<Value> {
    if let Some(max) = max {
        rows.truncate(max);
    }

    if let Some(max_len) = max_len {
        for row in &mut rows {
            trim_row(row, max_len);
        }
    }

    rows
}

/// Truncate the unprotected string fields of an object row
fn trim_row(row: &mut Value, max_len: usize) {
    let Value::Object(fields) = row else {
        return;
    };

    for (name, value) in fields.iter_mut() {
        if PROTECTED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        if let Value::String(text) = value {
            if let Some((cut, _)) = text.char_indices().nth(max_len) {
                text.truncate(cut);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_negative_disables() {
        let query = RangeQuery::from_raw(1, 2, true, -1, -5, -1);
        assert_eq!(query.skip, 0);
        assert_eq!(query.max, None);
        assert_eq!(query.max_len, None);

        let query = RangeQuery::from_raw(1, 2, false, 3, 2, 0);
        assert_eq!(query.skip, 2);
        assert_eq!(query.max, Some(3));
        assert_eq!(query.max_len, Some(0));
    }

    #[test]
    fn test_trim_protects_id_and_type() {
        let rows = vec![json!({"id": "abc123", "type": "note", "note": "hello world"})];

        let trimmed = trim(rows, None, Some(3));

        assert_eq!(
            trimmed,
            vec![json!({"id": "abc123", "type": "note", "note": "hel"})]
        );
    }

    #[test]
    fn test_trim_leaves_non_strings() {
        let rows = vec![json!({
            "body": "abcdef",
            "at": 1700000000,
            "date": "2023-11-14 22:13:20",
            "stars": 12345,
            "pinned": true,
            "tags": ["long-tag"]
        })];

        let trimmed = trim(rows, None, Some(2));

        assert_eq!(
            trimmed[0],
            json!({
                "body": "ab",
                "at": 1700000000,
                "date": "2023-11-14 22:13:20",
                "stars": 12345,
                "pinned": true,
                "tags": ["long-tag"]
            })
        );
    }

    #[test]
    fn test_trim_counts_characters() {
        let trimmed = trim(vec![json!({"body": "日本語テキスト"})], None, Some(3));
        assert_eq!(trimmed[0]["body"], json!("日本語"));
    }

    #[test]
    fn test_trim_short_strings_untouched() {
        let trimmed = trim(vec![json!({"body": "hi"})], None, Some(3));
        assert_eq!(trimmed[0]["body"], json!("hi"));
    }

    #[test]
    fn test_max_truncates_rows() {
        let rows: Vec<Value> = (0..5).map(|i| json!({"id": i.to_string()})).collect();

        assert_eq!(trim(rows.clone(), Some(2), None).len(), 2);
        assert_eq!(trim(rows.clone(), Some(0), None).len(), 0);
        assert_eq!(trim(rows.clone(), Some(10), None).len(), 5);
        assert_eq!(trim(rows, None, None).len(), 5);
    }

    #[test]
    fn test_field_order_preserved() {
        let trimmed = trim(
            vec![json!({"zeta": "zzzz", "alpha": "aaaa", "id": "x"})],
            None,
            Some(1),
        );
        let keys: Vec<&String> = trimmed[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "id"]);
    }
}
