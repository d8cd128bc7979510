//! Reusable prompt templates for R2R queries and document analysis.

use crate::error::{Result, ServerError};
use rmcp::model::{GetPromptResult, Prompt, PromptArgument};
use serde_json::{Map, Value, json};

pub const RAG_QUERY_PROMPT: &str = "rag_query_prompt";
pub const DOCUMENT_ANALYSIS_PROMPT: &str = "document_analysis_prompt";

#[must_use]
pub fn prompts() -> Vec<Prompt> {
    vec![
        Prompt::new(
            RAG_QUERY_PROMPT,
            Some("Generate a well-structured RAG query for R2R"),
            Some(vec![
                argument("question", "The question to answer", true),
                argument("context", "Optional additional context", false),
            ]),
        ),
        Prompt::new(
            DOCUMENT_ANALYSIS_PROMPT,
            Some("Generate a prompt for analyzing R2R document content"),
            Some(vec![
                argument("document_id", "The R2R document UUID", true),
                argument(
                    "analysis_type",
                    "summary, entities, topics or sentiment (default summary)",
                    false,
                ),
            ]),
        ),
    ]
}

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(required),
    }
}

/// Render a prompt as a single user message.
///
/// # Errors
///
/// [`ServerError::InvalidArguments`] for unknown prompts or a missing required argument.
pub fn get_prompt(name: &str, arguments: Option<&Map<String, Value>>) -> Result<GetPromptResult> {
    let empty = Map::new();
    let args = arguments.unwrap_or(&empty);
    let (description, text) = match name {
        RAG_QUERY_PROMPT => (
            "RAG query for the R2R knowledge base",
            rag_query_text(required(args, "question")?, optional(args, "context")),
        ),
        DOCUMENT_ANALYSIS_PROMPT => (
            "Analysis instructions for an R2R document",
            document_analysis_text(
                required(args, "document_id")?,
                optional(args, "analysis_type").unwrap_or("summary"),
            ),
        ),
        _ => return Err(ServerError::InvalidArguments(format!("Unknown prompt: {name}"))),
    };

    Ok(serde_json::from_value(json!({
        "description": description,
        "messages": [{ "role": "user", "content": { "type": "text", "text": text } }]
    }))?)
}

fn required<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    optional(args, key).ok_or_else(|| {
        ServerError::InvalidArguments(format!("Missing required argument: {key}"))
    })
}

fn optional<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[must_use]
pub fn rag_query_text(question: &str, context: Option<&str>) -> String {
    let mut text = format!(
        "Please answer the following question using the R2R knowledge base:\n\nQuestion: {question}\n"
    );
    if let Some(context) = context {
        text.push_str(&format!("\nAdditional Context: {context}\n"));
    }
    text.push_str(
        "\nPlease provide:\n\
         1. A clear, concise answer based on the retrieved documents\n\
         2. Citations to specific sources when possible\n\
         3. Confidence level in your answer (high/medium/low)\n",
    );
    text
}

#[must_use]
pub fn document_analysis_text(document_id: &str, analysis_type: &str) -> String {
    match analysis_type {
        "summary" => format!(
            "Analyze the document {document_id} and provide:\n\
             1. A concise summary (2-3 sentences)\n\
             2. Key topics and themes\n\
             3. Document type and structure\n"
        ),
        "entities" => format!(
            "Extract structured information from document {document_id}:\n\
             1. Named entities (people, organizations, locations)\n\
             2. Key concepts and terminology\n\
             3. Dates and numerical data\n"
        ),
        "topics" => format!(
            "Identify the main topics in document {document_id}:\n\
             1. Primary subject areas\n\
             2. Related themes and concepts\n\
             3. Suggested tags for categorization\n"
        ),
        "sentiment" => format!(
            "Analyze the sentiment and tone of document {document_id}:\n\
             1. Overall sentiment (positive/neutral/negative)\n\
             2. Emotional tone and writing style\n\
             3. Intended audience and purpose\n"
        ),
        other => format!("Analyze document {document_id} (type: {other})"),
    }
}
