//! Prompt templates for SQL + insight generation

/// Marker that precedes the SQL in a generated response
pub const SQL_MARKER: &str = "SQL:";

/// Marker that precedes the insight in a generated response
pub const INSIGHT_MARKER: &str = "Insight:";

/// Build the generation prompt around the retrieved dashboard context.
///
/// `context_text` is embedded verbatim. The optional analyst question is
/// appended after the context.
pub fn build_insight_prompt(context_text: &str, question: Option<&str>) -> String {
    let question_block = match question.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => format!("\nAnalyst question:\n{}\n", q),
        None => String::new(),
    };

    format!(
        r#"You are a SQL expert and data analyst.
Based on the following dashboard metadata, generate:
1. Exactly one read-only SQL query (SELECT or WITH) that answers a key metric. It must end with a LIMIT clause.
2. One short natural-language insight about what the query shows.
Only produce syntactically correct SQL and a short insight.
Join hints in the context are inferred from shared column names; they are candidates, not verified foreign keys.

Context:
{context}
{question}
Response format:
{sql_marker}
<your SQL here>

{insight_marker}
<short insight here>
"#,
        context = context_text,
        question = question_block,
        sql_marker = SQL_MARKER,
        insight_marker = INSIGHT_MARKER,
    )
}
