use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names owned by the server; clients cannot set them
pub const SERVER_FIELDS: [&str; 5] = ["id", "at", "date", "ctxt", "svcver"];

/// A post as submitted by a client, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Post text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Headline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    /// Client-defined post type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Any other fields the client sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Submission {
    /// Create a submission holding only a body
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }
}

/// A stored medit: the submission plus the server-assigned fields
///
/// The server fields are not optional, so a `Medit` can only come out of the
/// enhancer or be read back from the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medit {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Unique identifier, also the blob key
    pub id: String,
    /// Creation time, UTC epoch seconds
    pub at: i64,
    /// `at` formatted with the configured date format
    pub date: String,
    /// Context tag
    pub ctxt: String,
    /// Version of the service that stored the medit
    pub svcver: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Medit {
    /// The projection kept in the metadata store
    pub fn metadata(&self) -> MeditMetadata {
        MeditMetadata {
            id: self.id.clone(),
            ctxt: self.ctxt.clone(),
            at: self.at,
        }
    }

    /// The `{id, at}` acknowledgement shape
    pub fn terse(&self) -> Terse {
        Terse {
            id: self.id.clone(),
            at: self.at,
        }
    }
}

/// Indexed fields of a medit, as held by the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeditMetadata {
    pub id: String,
    pub ctxt: String,
    pub at: i64,
}

impl MeditMetadata {
    pub fn terse(&self) -> Terse {
        Terse {
            id: self.id.clone(),
            at: self.at,
        }
    }
}

/// Minimal `{"id": ..., "at": ...}` projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terse {
    pub id: String,
    pub at: i64,
}

impl From<Terse> for Value {
    fn from(terse: Terse) -> Self {
        serde_json::json!({ "id": terse.id, "at": terse.at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_medit() -> Medit {
        Medit {
            body: "hello".to_string(),
            head: Some("greeting".to_string()),
            by: None,
            kind: Some("note".to_string()),
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            at: 1_700_000_000,
            date: "2023-11-14 22:13:20".to_string(),
            ctxt: "medit".to_string(),
            svcver: "0.1.0".to_string(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_submission_keeps_unknown_fields() {
        let submission: Submission = serde_json::from_value(json!({
            "body": "hi",
            "type": "note",
            "mood": "sunny",
            "stars": 4
        }))
        .unwrap();

        assert_eq!(submission.body.as_deref(), Some("hi"));
        assert_eq!(submission.kind.as_deref(), Some("note"));
        assert_eq!(submission.extra.get("mood"), Some(&json!("sunny")));
        assert_eq!(submission.extra.get("stars"), Some(&json!(4)));
    }

    #[test]
    fn test_submission_without_body() {
        let submission: Submission = serde_json::from_value(json!({"head": "x"})).unwrap();
        assert!(submission.body.is_none());
        assert_eq!(serde_json::to_value(&submission).unwrap(), json!({"head": "x"}));
    }

    #[test]
    fn test_medit_serializes_type_and_skips_missing() {
        let value = serde_json::to_value(sample_medit()).unwrap();
        assert_eq!(value["type"], json!("note"));
        assert!(value.get("kind").is_none());
        assert!(value.get("by").is_none());
        assert_eq!(value["at"], json!(1_700_000_000));
    }

    #[test]
    fn test_terse_shape() {
        let terse = sample_medit().terse();
        assert_eq!(
            serde_json::to_string(&terse).unwrap(),
            r#"{"id":"550e8400-e29b-41d4-a716-446655440000","at":1700000000}"#
        );
    }

    #[test]
    fn test_metadata_projection() {
        let meta = sample_medit().metadata();
        assert_eq!(meta.ctxt, "medit");
        assert_eq!(meta.at, 1_700_000_000);
        assert_eq!(meta.terse(), sample_medit().terse());
    }

    #[test]
    fn test_terse_into_value() {
        let value: Value = sample_medit().terse().into();
        assert_eq!(
            value,
            json!({"id": "550e8400-e29b-41d4-a716-446655440000", "at": 1_700_000_000})
        );
    }
}
