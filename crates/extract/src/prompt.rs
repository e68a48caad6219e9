use serde::{Deserialize, Serialize};

pub const EXTRACTION_SYSTEM: &str = "You are an expert in information extraction.";

pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract factual relations from the following document as knowledge-graph triples.

INSTRUCTIONS:
1. Identify the entities (people, organizations, places, works, events, concepts) the document talks about
2. For every fact linking two entities, output one triple
3. Copy the supporting sentence from the document verbatim, without rewording
4. Output ONLY valid JSON, nothing else

SCHEMA:
{
  "triples": [
    {"subject": "EntityName", "relation": "relation phrase", "object": "EntityName", "sentence": "verbatim sentence from the document"}
  ]
}

RULES:
- Use the entity names exactly as written in the document
- Relations should be short verb phrases: "born in", "directed", "member of", etc.
- If several sentences support the same triple, "sentence" may be a list of sentences
- Output ONLY the JSON object with the "triples" list, no markdown, no explanations
- If the document states no facts, output {"triples": []}

DOCUMENT:
{{document}}

JSON OUTPUT:"#;

/// An opaque prompt string with `{{name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn extraction() -> Self {
        Self::new(DEFAULT_EXTRACTION_PROMPT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Placeholders are filled in the order given; values are inserted
    /// verbatim and never rescanned for placeholders.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();

        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            let name = &rest[open + 2..open + 2 + close];
            out.push_str(&rest[..open]);
            match vars.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&rest[open..open + 4 + close]),
            }
            rest = &rest[open + 4 + close..];
        }
        out.push_str(rest);
        out
    }

    /// Names of placeholders the template must contain.
    pub fn ensure_placeholders(&self, names: &[&str]) -> anyhow::Result<()> {
        for name in names {
            if !self.0.contains(&format!("{{{{{}}}}}", name)) {
                anyhow::bail!("Prompt template is missing the {{{{{}}}}} placeholder", name);
            }
        }
        Ok(())
    }
}

pub fn build_extraction_prompt(template: &PromptTemplate, chunk_text: &str) -> String {
    template.render(&[("document", chunk_text.trim())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_named_placeholders() {
        let template = PromptTemplate::new("Info: {{context}}\nQ: {{question}}");
        let out = template.render(&[("question", "Who?"), ("context", "facts")]);

        assert_eq!(out, "Info: facts\nQ: Who?");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let template = PromptTemplate::new("{{document}} end");
        let out = template.render(&[("document", "has {{document}} inside")]);

        assert_eq!(out, "has {{document}} inside end");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let template = PromptTemplate::new("{{a}} and {{b}}");
        assert_eq!(template.render(&[("a", "x")]), "x and {{b}}");
    }

    #[test]
    fn default_template_has_document_slot() {
        assert!(PromptTemplate::extraction().ensure_placeholders(&["document"]).is_ok());
        assert!(PromptTemplate::new("nothing").ensure_placeholders(&["document"]).is_err());
        assert!(build_extraction_prompt(&PromptTemplate::extraction(), "  text  ").contains("DOCUMENT:\ntext\n"));
    }

    #[test]
    fn default_template_asks_for_wrapped_triples() {
        // JSON-object response modes cannot return a top-level array
        assert!(DEFAULT_EXTRACTION_PROMPT.contains(r#""triples": ["#));
        assert!(!DEFAULT_EXTRACTION_PROMPT.contains("JSON array"));
    }
}
