use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// One evidence sentence or several; LLMs emit both shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Evidence {
    One(String),
    Many(Vec<String>),
}

impl Evidence {
    /// Trimmed, non-empty sentences in the order given.
    pub fn sentences(&self) -> Vec<&str> {
        let all: Vec<&str> = match self {
            Evidence::One(s) => vec![s.as_str()],
            Evidence::Many(list) => list.iter().map(String::as_str).collect(),
        };
        all.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleRecord {
    pub subject: String,
    pub relation: String,
    pub object: String,
    pub evidence: Evidence,
    pub chunk_id: usize,
}

/// Result slot for one chunk. Errors stay eligible for resubmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success {
        chunk_id: usize,
        records: Vec<TripleRecord>,
    },
    Error {
        chunk_id: usize,
        message: String,
    },
}

impl ExtractionOutcome {
    pub fn chunk_id(&self) -> usize {
        match self {
            ExtractionOutcome::Success { chunk_id, .. } | ExtractionOutcome::Error { chunk_id, .. } => *chunk_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExtractionOutcome::Error { .. })
    }

    pub fn records(&self) -> &[TripleRecord] {
        match self {
            ExtractionOutcome::Success { records, .. } => records,
            ExtractionOutcome::Error { .. } => &[],
        }
    }
}

/// Index-addressed result collection, one slot per chunk.
pub type TripleCollection = Vec<Option<ExtractionOutcome>>;

/// Every record from successful slots, in chunk order.
pub fn successful_records(collection: &[Option<ExtractionOutcome>]) -> impl Iterator<Item = &TripleRecord> {
    collection
        .iter()
        .flatten()
        .flat_map(|outcome| outcome.records().iter())
}

#[derive(Deserialize)]
struct RawTriple {
    subject: String,
    relation: String,
    object: String,
    sentence: Option<Evidence>,
    evidence: Option<Evidence>,
}

impl RawTriple {
    /// Validated record; `sentence` wins when both evidence fields are set.
    fn into_record(self, chunk_id: usize) -> Result<TripleRecord, &'static str> {
        let subject = self.subject.trim().to_string();
        let relation = self.relation.trim().to_string();
        let object = self.object.trim().to_string();
        if subject.is_empty() || relation.is_empty() || object.is_empty() {
            return Err("empty subject, relation or object");
        }

        let Some(evidence) = self.sentence.or(self.evidence) else {
            return Err("no sentence or evidence field");
        };
        let mut sentences: Vec<String> = evidence.sentences().into_iter().map(String::from).collect();
        let evidence = match sentences.len() {
            0 => return Err("evidence has no non-empty sentence"),
            1 => Evidence::One(sentences.remove(0)),
            _ => Evidence::Many(sentences),
        };

        Ok(TripleRecord {
            subject,
            relation,
            object,
            evidence,
            chunk_id,
        })
    }
}

/// Record list inside a wrapper object: `triples`, `relations`, or the sole
/// array-valued field of an object that is not itself a record.
fn unwrap_record_list(mut map: serde_json::Map<String, Value>) -> Vec<Value> {
    for key in ["triples", "relations"] {
        if let Some(Value::Array(items)) = map.remove(key) {
            return items;
        }
    }

    if !map.contains_key("subject") {
        let mut arrays = map.iter().filter(|(_, v)| v.is_array()).map(|(k, _)| k.clone());
        if let (Some(key), None) = (arrays.next(), arrays.next()) {
            if let Some(Value::Array(items)) = map.remove(&key) {
                return items;
            }
        }
    }

    vec![Value::Object(map)]
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("static regex")
    })
}

fn strip_code_fence(raw: &str) -> &str {
    match code_fence().captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Turn a raw LLM response into records tagged with `chunk_id`.
pub fn parse_response(chunk_id: usize, raw: &str) -> ExtractionOutcome {
    let error = |message: String| ExtractionOutcome::Error { chunk_id, message };

    let value: Value = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(v) => v,
        Err(e) => return error(format!("response is not valid JSON: {}", e)),
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => unwrap_record_list(map),
        other => return error(format!("unexpected response shape: {}", type_name(&other))),
    };

    let total = items.len();
    let mut records = Vec::with_capacity(total);
    for (position, item) in items.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawTriple>(item)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_record(chunk_id).map_err(String::from));
        match parsed {
            Ok(record) => records.push(record),
            Err(reason) => tracing::debug!(chunk = chunk_id, position, %reason, "Dropped extraction record"),
        }
    }

    if records.is_empty() && total > 0 {
        return error(format!("none of {} records had subject, relation, object and evidence", total));
    }

    ExtractionOutcome::Success { chunk_id, records }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_of_triples() {
        let raw = r#"[
            {"subject": "Marie Curie", "relation": "born in", "object": "Warsaw", "sentence": "Marie Curie was born in Warsaw."},
            {"subject": "Marie Curie", "relation": "won", "object": "Nobel Prize", "sentence": ["She won the Nobel Prize.", "  "]}
        ]"#;

        let outcome = parse_response(3, raw);
        let records = outcome.records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].chunk_id, 3);
        assert_eq!(records[1].evidence.sentences(), vec!["She won the Nobel Prize."]);
    }

    #[test]
    fn parses_single_object_and_nested_list() {
        let single = r#"{"subject": "A", "relation": "r", "object": "B", "evidence": "A r B."}"#;
        assert_eq!(parse_response(0, single).records().len(), 1);

        let nested = r#"{"triples": [{"subject": "A", "relation": "r", "object": "B", "sentence": "A r B."}]}"#;
        assert_eq!(parse_response(0, nested).records().len(), 1);
    }

    #[test]
    fn sole_array_under_any_key_is_the_record_list() {
        for key in ["results", "data", "facts"] {
            let raw = format!(
                r#"{{"{}": [{{"subject": "A", "relation": "r", "object": "B", "sentence": "A r B."}}], "note": "ok"}}"#,
                key
            );
            let outcome = parse_response(0, &raw);
            assert!(!outcome.is_error(), "wrapper key {}", key);
            assert_eq!(outcome.records().len(), 1);
        }
    }

    #[test]
    fn single_record_with_sentence_list_is_not_unwrapped() {
        let raw = r#"{"subject": "A", "relation": "r", "object": "B", "sentence": ["A r B.", "B is r of A."]}"#;
        let records = parse_response(0, raw).records().to_vec();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evidence.sentences(), vec!["A r B.", "B is r of A."]);
    }

    #[test]
    fn sentence_field_wins_over_evidence() {
        let raw = r#"[{"subject": "A", "relation": "r", "object": "B", "sentence": "From sentence.", "evidence": "From evidence."}]"#;
        let records = parse_response(0, raw).records().to_vec();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evidence, Evidence::One("From sentence.".into()));
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n[{\"subject\": \"A\", \"relation\": \"r\", \"object\": \"B\", \"sentence\": \"A r B.\"}]\n```";
        assert_eq!(parse_response(1, raw).records().len(), 1);
    }

    #[test]
    fn malformed_response_is_error() {
        assert!(parse_response(2, "not json").is_error());
        assert!(parse_response(2, "42").is_error());
        assert!(parse_response(2, r#"[{"subject": "A"}]"#).is_error());
    }

    #[test]
    fn empty_list_is_success() {
        let outcome = parse_response(4, "[]");
        assert!(!outcome.is_error());
        assert!(outcome.records().is_empty());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = ExtractionOutcome::Error { chunk_id: 7, message: "timeout".into() };
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(serde_json::from_value::<ExtractionOutcome>(json).unwrap(), outcome);
    }
}
