use serde_json::Value;

use super::{expect_kind, RecordExtractor};
use crate::error::ExtractionError;
use crate::fetch::{ContentKind, RawDocument};
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    List,
    Object,
}

/// Array of JSON objects (optionally behind a JSON pointer) read as records,
/// field names taken from object keys.
#[derive(Debug, Clone)]
pub struct JsonListExtractor {
    pointer: String,
    shape: Shape,
}

impl JsonListExtractor {
    /// Array at the document root.
    pub fn root() -> Self {
        Self::at("")
    }

    /// Array at `pointer`, e.g. `/data/list`.
    pub fn at(pointer: impl Into<String>) -> Self {
        JsonListExtractor {
            pointer: pointer.into(),
            shape: Shape::List,
        }
    }

    /// A single object at the root, read as a one-record list.
    pub fn single_object() -> Self {
        JsonListExtractor {
            pointer: String::new(),
            shape: Shape::Object,
        }
    }

    fn path(&self) -> &str {
        if self.pointer.is_empty() {
            "/"
        } else {
            &self.pointer
        }
    }

    pub fn records_from_value(&self, value: &Value) -> Result<Vec<Record>, ExtractionError> {
        let target = value
            .pointer(&self.pointer)
            .ok_or_else(|| ExtractionError::MarkerMissing {
                marker: self.path().to_string(),
            })?;

        match (self.shape, target) {
            (Shape::List, Value::Array(items)) => items
                .iter()
                .map(|item| self.object_to_record(item))
                .collect(),
            (Shape::Object, obj @ Value::Object(_)) => Ok(vec![self.object_to_record(obj)?]),
            (Shape::List, _) => Err(ExtractionError::UnexpectedShape {
                path: self.path().to_string(),
                expected: "an array of objects",
            }),
            (Shape::Object, _) => Err(ExtractionError::UnexpectedShape {
                path: self.path().to_string(),
                expected: "an object",
            }),
        }
    }

    fn object_to_record(&self, item: &Value) -> Result<Record, ExtractionError> {
        let Value::Object(map) = item else {
            return Err(ExtractionError::UnexpectedShape {
                path: self.path().to_string(),
                expected: "an array of objects",
            });
        };
        Ok(map.iter().map(|(k, v)| (k.clone(), flatten(v))).collect())
    }
}

/// Scalar as text; null as empty; a list of scalars joined by ", "; anything
/// deeper as compact JSON.
pub fn flatten(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => {
            items.iter().map(flatten).collect::<Vec<_>>().join(", ")
        }
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

impl RecordExtractor for JsonListExtractor {
    fn kind(&self) -> ContentKind {
        ContentKind::Json
    }

    fn extract(&self, doc: &RawDocument) -> Result<Vec<Record>, ExtractionError> {
        expect_kind(doc, ContentKind::Json)?;
        let value: Value = serde_json::from_slice(&doc.body)?;
        self.records_from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(s: &str) -> RawDocument {
        RawDocument::new(ContentKind::Json, s)
    }

    #[test]
    fn reads_nested_list() {
        let doc = json(
            r#"{"data":{"list":[
                {"point":"L01P1056","name":"C006","location":["Haus C - Untergeschoss"]},
                {"point":"L02P0042","name":"T 101","location":"Haus T"}
            ]}}"#,
        );
        let records = JsonListExtractor::at("/data/list").extract(&doc).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("point"), Some("L01P1056"));
        assert_eq!(records[0].get("location"), Some("Haus C - Untergeschoss"));
        assert_eq!(records[1].get("name"), Some("T 101"));
    }

    #[test]
    fn stringifies_scalars() {
        let doc = json(r#"[{"age":42,"distance":1.25,"ok":true,"note":null,"extra":{"a":1}}]"#);
        let records = JsonListExtractor::root().extract(&doc).unwrap();
        let r = &records[0];
        assert_eq!(r.get("age"), Some("42"));
        assert_eq!(r.get("distance"), Some("1.25"));
        assert_eq!(r.get("ok"), Some("true"));
        assert_eq!(r.get("note"), Some(""));
        assert_eq!(r.get("extra"), Some(r#"{"a":1}"#));
    }

    #[test]
    fn single_object_is_one_record() {
        let doc = json(r#"{"distance":238.4,"duration":151}"#);
        let records = JsonListExtractor::single_object().extract(&doc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("duration"), Some("151"));
    }

    #[test]
    fn empty_array_is_no_records() {
        let records = JsonListExtractor::root().extract(&json("[]")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn missing_pointer_and_bad_shapes() {
        let err = JsonListExtractor::at("/data/list")
            .extract(&json(r#"{"data":{}}"#))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MarkerMissing { .. }));

        let err = JsonListExtractor::root().extract(&json("[1,2]")).unwrap_err();
        assert!(matches!(err, ExtractionError::UnexpectedShape { .. }));

        let err = JsonListExtractor::root().extract(&json("{oops")).unwrap_err();
        assert!(matches!(err, ExtractionError::Json(_)));
    }
}
