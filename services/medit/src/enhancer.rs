use crate::post::{Medit, Submission, SERVER_FIELDS};
use chrono::{DateTime, Utc};
use tracing::trace;
use uuid::Uuid;

/// Stamps the server-assigned fields onto validated submissions
#[derive(Debug, Clone)]
pub struct Enhancer {
    ctxt: String,
    date_format: String,
    version: String,
}

impl Enhancer {
    pub fn new(
        ctxt: impl Into<String>,
        date_format: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            ctxt: ctxt.into(),
            date_format: date_format.into(),
            version: version.into(),
        }
    }

    pub fn ctxt(&self) -> &str {
        &self.ctxt
    }

    /// Turn a submission into a medit created now
    pub fn enhance(&self, id: Uuid, submission: Submission) -> Medit {
        self.enhance_at(id, submission, Utc::now())
    }

    /// Turn a submission into a medit created at `now`
    ///
    /// Any server-owned names the client sent among its extra fields are
    /// dropped. The caller must have validated the submission; a missing body
    /// becomes an empty one.
    pub fn enhance_at(&self, id: Uuid, submission: Submission, now: DateTime<Utc>) -> Medit {
        let Submission {
            body,
            head,
            by,
            kind,
            mut extra,
        } = submission;

        for field in SERVER_FIELDS {
            if extra.remove(field).is_some() {
                trace!(field, "dropping client-supplied server field");
            }
        }

        Medit {
            body: body.unwrap_or_default(),
            head,
            by,
            kind,
            id: id.to_string(),
            at: now.timestamp(),
            date: now.format(&self.date_format).to_string(),
            ctxt: self.ctxt.clone(),
            svcver: self.version.clone(),
            extra,
        }
    }
}
