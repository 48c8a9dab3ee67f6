//! Web search tool — DuckDuckGo instant answers.

use async_trait::async_trait;
use lalabot_core::error::ToolError;
use lalabot_core::tool::{Injection, Tool, ToolInput};
use serde_json::Value;

const API_URL: &str = "https://api.duckduckgo.com/";
const MAX_RESULTS: usize = 3;
const NO_RESULTS: &str = "抱歉，網路上找不到相關資訊。";

pub struct WebSearchTool;

/// (title, summary) pairs from an instant-answer response, best first.
fn collect_results(body: &Value) -> Vec<(String, String)> {
    let mut results = Vec::new();

    let abstract_text = body["AbstractText"].as_str().unwrap_or_default();
    if !abstract_text.is_empty() {
        let heading = body["Heading"].as_str().unwrap_or_default();
        results.push((heading.to_string(), abstract_text.to_string()));
    }

    let mut stack: Vec<&Value> = body["RelatedTopics"]
        .as_array()
        .map(|topics| topics.iter().rev().collect())
        .unwrap_or_default();

    // Topics may be grouped under {"Name": ..., "Topics": [...]}
    while let Some(topic) = stack.pop() {
        if let Some(nested) = topic["Topics"].as_array() {
            stack.extend(nested.iter().rev());
            continue;
        }
        let Some(text) = topic["Text"].as_str().filter(|t| !t.is_empty()) else {
            continue;
        };
        let title = topic["FirstURL"]
            .as_str()
            .and_then(|url| url.rsplit('/').next())
            .map(|slug| slug.replace('_', " "))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| text.chars().take(30).collect());
        results.push((title, text.to_string()));
    }

    results.truncate(MAX_RESULTS);
    results
}

fn format_results(body: &Value) -> String {
    let results = collect_results(body);
    if results.is_empty() {
        return NO_RESULTS.into();
    }
    results
        .iter()
        .map(|(title, summary)| format!("標題: {title}\n摘要: {summary}\n---"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web and return the top three results with titles and summaries."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    fn is_async(&self) -> bool {
        true
    }

    fn injections(&self) -> &[Injection] {
        &[Injection::HttpClient]
    }

    async fn execute(&self, input: ToolInput<'_>) -> Result<Value, ToolError> {
        let query = input.require_str(self.name(), "query")?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "search_web".into(),
            reason,
        };

        let response = input
            .http(self.name())?
            .get(API_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("search returned {}", response.status())));
        }

        let body: Value = response.json().await.map_err(|e| failed(e.to_string()))?;
        Ok(Value::String(format_results(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn abstract_comes_first() {
        let body = json!({
            "Heading": "Rust (programming language)",
            "AbstractText": "Rust is a general-purpose programming language.",
            "RelatedTopics": [
                {"Text": "Cargo - the Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo_(software)"}
            ]
        });
        let out = format_results(&body);
        assert!(out.starts_with("標題: Rust (programming language)\n摘要: Rust is"));
        assert!(out.contains("標題: Cargo (software)"));
    }

    #[test]
    fn nested_topics_are_flattened_and_capped() {
        let body = json!({
            "AbstractText": "",
            "RelatedTopics": [
                {"Text": "one", "FirstURL": "https://duckduckgo.com/One"},
                {"Name": "Group", "Topics": [
                    {"Text": "two", "FirstURL": "https://duckduckgo.com/Two"},
                    {"Text": "three", "FirstURL": "https://duckduckgo.com/Three"}
                ]},
                {"Text": "four", "FirstURL": "https://duckduckgo.com/Four"}
            ]
        });
        let results = collect_results(&body);
        let titles: Vec<&str> = results.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn empty_response_says_so() {
        assert_eq!(format_results(&json!({})), NO_RESULTS);
    }

    #[tokio::test]
    async fn missing_query_is_rejected() {
        let err = WebSearchTool
            .execute(ToolInput::new(serde_json::Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
