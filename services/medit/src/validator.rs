use crate::config::LimitsConfig;
use crate::post::Submission;
use serde::Serialize;
use serde_json::ser::Formatter;
use std::fmt;
use std::io;

/// A reason a submission was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Problem {
    #[serde(rename = "bodyless!")]
    Bodyless,
    #[serde(rename = "big body")]
    BigBody,
    #[serde(rename = "big head")]
    BigHead,
    #[serde(rename = "big by")]
    BigBy,
    #[serde(rename = "big type")]
    BigType,
    #[serde(rename = "big post")]
    BigPost,
}

impl Problem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Problem::Bodyless => "bodyless!",
            Problem::BigBody => "big body",
            Problem::BigHead => "big head",
            Problem::BigBy => "big by",
            Problem::BigType => "big type",
            Problem::BigPost => "big post",
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks submissions against the configured length limits
///
/// Every check runs; the returned problems are in check order.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Returns the problems with `submission`; empty means it may be stored
    pub fn validate(&self, submission: &Submission) -> Vec<Problem> {
        let mut problems = Vec::new();

        match submission.body.as_deref() {
            None | Some("") => problems.push(Problem::Bodyless),
            Some(body) if char_len(body) > self.limits.max_body => {
                problems.push(Problem::BigBody)
            }
            Some(_) => {}
        }

        if exceeds(&submission.head, self.limits.max_head) {
            problems.push(Problem::BigHead);
        }
        if exceeds(&submission.by, self.limits.max_by) {
            problems.push(Problem::BigBy);
        }
        if exceeds(&submission.kind, self.limits.max_type) {
            problems.push(Problem::BigType);
        }

        // A submission that cannot be serialized cannot be stored either
        let too_big = measured_post(submission)
            .map(|json| json.len() > self.limits.max_post)
            .unwrap_or(true);
        if too_big {
            problems.push(Problem::BigPost);
        }

        problems
    }
}

fn exceeds(field: &Option<String>, max: usize) -> bool {
    field.as_deref().map(char_len).unwrap_or(0) > max
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The submission as spaced, ASCII-only JSON, the form `max_post` limits
fn measured_post(submission: &Submission) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    submission.serialize(&mut serializer)?;
    Ok(out)
}

/// `", "` and `": "` separators, everything outside printable ASCII as
/// `\uXXXX` UTF-16 escapes
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
