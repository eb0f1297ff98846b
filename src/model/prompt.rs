//! Prompt formatting and output parsing around a model call.

use serde_json::Value;

use crate::schema::{ChatMessage, ChatMessages, Generation};
use crate::{ChainValues, Error, Result};

/// A formatted prompt, ready for either kind of model.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptValue {
    Text(String),
    Chat(ChatMessages),
}

impl PromptValue {
    /// The prompt as completion text. Chat prompts are rendered as a transcript.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Chat(messages) => messages.to_string(),
        }
    }

    /// The prompt as chat messages. Text becomes a single human message.
    #[must_use]
    pub fn messages(&self) -> ChatMessages {
        match self {
            Self::Text(text) => ChatMessages(vec![ChatMessage::human(text.clone())]),
            Self::Chat(messages) => messages.clone(),
        }
    }
}

/// Turns chain values into a [`PromptValue`].
pub trait Prompt: Send + Sync {
    /// Keys the prompt reads.
    fn input_variables(&self) -> Vec<String>;

    fn format_prompt(&self, values: &ChainValues) -> Result<PromptValue>;
}

/// A text template with `{name}` placeholders.
///
/// `{{` and `}}` produce literal braces.
///
/// # Example
///
/// ```rust
/// use llm_chains::model::{Prompt, PromptTemplate};
/// use llm_chains::ChainValues;
///
/// let prompt = PromptTemplate::new("Translate {text} into {language}.").unwrap();
/// assert_eq!(prompt.input_variables(), vec!["text", "language"]);
///
/// let value = prompt
///     .format_prompt(&ChainValues::from([("text", "hello"), ("language", "French")]))
///     .unwrap();
/// assert_eq!(value.text(), "Translate hello into French.");
/// ```
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    parts: Vec<Part>,
    variables: Vec<String>,
}

#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Variable(String),
}

impl PromptTemplate {
    /// Parse `template`, failing on an unbalanced or empty placeholder.
    pub fn new(template: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut variables: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(Error::Message(format!(
                                    "unclosed placeholder in template: {template}"
                                )))
                            }
                        }
                    }
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        return Err(Error::Message("empty placeholder in template".into()));
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    if !variables.contains(&name) {
                        variables.push(name.clone());
                    }
                    parts.push(Part::Variable(name));
                }
                '}' => {
                    return Err(Error::Message(format!(
                        "unmatched '}}' in template: {template}"
                    )))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self { parts, variables })
    }

    /// Render with `values`; every placeholder must be present.
    pub fn format(&self, values: &ChainValues) -> Result<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Variable(name) => out.push_str(&values.get_string(name)?),
            }
        }
        Ok(out)
    }
}

impl Prompt for PromptTemplate {
    fn input_variables(&self) -> Vec<String> {
        self.variables.clone()
    }

    fn format_prompt(&self, values: &ChainValues) -> Result<PromptValue> {
        self.format(values).map(PromptValue::Text)
    }
}

/// Turns model output into a chain value.
pub trait OutputParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Value>;

    fn parse_result(&self, generation: &Generation) -> Result<Value> {
        self.parse(&generation.text)
    }

    fn parser_type(&self) -> &str;
}

/// Returns the generated text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpParser;

impl OutputParser for NoOpParser {
    fn parse(&self, text: &str) -> Result<Value> {
        Ok(Value::String(text.to_string()))
    }

    fn parser_type(&self) -> &str {
        "no-op"
    }
}

/// Splits `"foo, bar, baz"` into a list of trimmed strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommaSeparatedListParser;

impl OutputParser for CommaSeparatedListParser {
    fn parse(&self, text: &str) -> Result<Value> {
        let input = text.trim();
        if input.is_empty() {
            return Err(Error::Parse("no value to parse".into()));
        }
        Ok(Value::Array(
            input
                .split(',')
                .map(|v| Value::String(v.trim().to_string()))
                .collect(),
        ))
    }

    fn parser_type(&self) -> &str {
        "comma_separated_list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_escapes_and_repeats() {
        let prompt = PromptTemplate::new("{{{name}}} is {name}").unwrap();
        assert_eq!(prompt.input_variables(), vec!["name"]);
        assert_eq!(
            prompt.format(&ChainValues::from([("name", "x")])).unwrap(),
            "{x} is x"
        );
    }

    #[test]
    fn test_template_rejects_malformed() {
        assert!(PromptTemplate::new("{open").is_err());
        assert!(PromptTemplate::new("close}").is_err());
        assert!(PromptTemplate::new("{ }").is_err());
    }

    #[test]
    fn test_template_missing_value() {
        let prompt = PromptTemplate::new("Hi {name}").unwrap();
        let err = prompt.format(&ChainValues::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInputValues(_)));
    }

    #[test]
    fn test_prompt_value_conversions() {
        let text = PromptValue::Text("hi".into());
        assert_eq!(text.messages(), ChatMessages(vec![ChatMessage::human("hi")]));

        let chat = PromptValue::Chat(ChatMessages(vec![
            ChatMessage::system("be nice"),
            ChatMessage::human("hi"),
        ]));
        assert_eq!(chat.text(), "System: be nice\nHuman: hi");
    }

    #[test]
    fn test_comma_separated_list() {
        let parsed = CommaSeparatedListParser.parse(" red, green ,blue ").unwrap();
        assert_eq!(parsed, json!(["red", "green", "blue"]));
        assert!(matches!(
            CommaSeparatedListParser.parse("   "),
            Err(Error::Parse(_))
        ));
    }
}
