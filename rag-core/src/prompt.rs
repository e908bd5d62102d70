//! Prompt templates with `{context}` and `{query}` placeholders.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The template used when configuration does not override `prompt_template`.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Context:\n{context}\n\nQuestion:\n{query}\n\nAnswer:";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Context,
    Query,
}

/// A parsed prompt template.
///
/// Supported placeholders are `{context}` and `{query}`; `{{` and `}}` produce
/// literal braces. Any other placeholder is rejected at parse time, so
/// rendering cannot fail.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::PromptTemplate;
///
/// let template = PromptTemplate::parse("Use {context} to answer {query}")?;
/// assert_eq!(template.render("facts", "why?"), "Use facts to answer why?");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] for unknown placeholders or unbalanced braces.
    pub fn parse(template: impl Into<String>) -> Result<Self> {
        let source = template.into();
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        name.push(next);
                    }
                    if !closed {
                        return Err(RagError::Config(format!(
                            "prompt template has an unclosed placeholder '{{{name}'"
                        )));
                    }
                    let placeholder = match name.as_str() {
                        "context" => Segment::Context,
                        "query" => Segment::Query,
                        other => {
                            return Err(RagError::Config(format!(
                                "prompt template has unknown placeholder '{{{other}}}'"
                            )));
                        }
                    };
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(placeholder);
                }
                '}' => {
                    return Err(RagError::Config(
                        "prompt template has a single '}' outside a placeholder".to_string(),
                    ));
                }
                other => text.push(other),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { source, segments })
    }

    /// Fill the placeholders. Substituted values are never re-scanned.
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut prompt = String::with_capacity(self.source.len() + context.len() + query.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => prompt.push_str(text),
                Segment::Context => prompt.push_str(context),
                Segment::Query => prompt.push_str(query),
            }
        }
        prompt
    }

    /// The original template text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_PROMPT_TEMPLATE.to_string(),
            segments: vec![
                Segment::Text("Context:\n".to_string()),
                Segment::Context,
                Segment::Text("\n\nQuestion:\n".to_string()),
                Segment::Query,
                Segment::Text("\n\nAnswer:".to_string()),
            ],
        }
    }
}

impl TryFrom<String> for PromptTemplate {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<PromptTemplate> for String {
    fn from(template: PromptTemplate) -> Self {
        template.source
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_parsed_default() {
        assert_eq!(PromptTemplate::default(), PromptTemplate::parse(DEFAULT_PROMPT_TEMPLATE).unwrap());
    }

    #[test]
    fn renders_default_template() {
        let prompt = PromptTemplate::default().render("fact one\nfact two", "What is X?");
        assert_eq!(prompt, "Context:\nfact one\nfact two\n\nQuestion:\nWhat is X?\n\nAnswer:");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let template = PromptTemplate::parse("{context}|{query}").unwrap();
        assert_eq!(template.render("{query}", "q"), "{query}|q");
    }

    #[test]
    fn escaped_braces_are_literal() {
        let template = PromptTemplate::parse("{{json}} {query}").unwrap();
        assert_eq!(template.render("", "q"), "{json} q");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = PromptTemplate::parse("Hello {name}").unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert!(PromptTemplate::parse("{context").is_err());
        assert!(PromptTemplate::parse("oops }").is_err());
    }
}
