//! News tool — headlines from NewsAPI, deduplicated per user.
//!
//! Every URL handed to the model is remembered in the user's
//! `seen_news_urls`, so asking again returns only articles not yet shown.

use std::collections::BTreeSet;

use async_trait::async_trait;
use lalabot_core::error::ToolError;
use lalabot_core::tool::{Injection, Tool, ToolInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

const API_URL: &str = "https://newsapi.org/v2/everything";
const PAGE_SIZE: &str = "10";
const FALLBACK_QUERY: &str = "新聞";

/// The slice of an article the model gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

/// Keep articles whose URL has not been seen, recording the new URLs.
/// Articles without a URL are dropped.
pub fn select_unseen(articles: Vec<Article>, seen: &mut BTreeSet<String>) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| match a.url.as_deref() {
            Some(url) if !url.is_empty() => seen.insert(url.to_string()),
            _ => false,
        })
        .collect()
}

/// Fold the optional category into the search terms.
fn build_query(query: Option<&str>, category: Option<&str>) -> String {
    let parts: Vec<&str> = [query, category]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        FALLBACK_QUERY.into()
    } else {
        parts.join(" ")
    }
}

pub struct NewsHeadlinesTool {
    api_key: Option<String>,
    language: String,
}

impl NewsHeadlinesTool {
    pub fn new(api_key: Option<String>, language: impl Into<String>) -> Self {
        Self {
            api_key,
            language: language.into(),
        }
    }

    async fn fetch(
        &self,
        http: &reqwest::Client,
        api_key: &str,
        query: &str,
    ) -> Result<NewsResponse, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "get_news_headlines".into(),
            reason,
        };

        let response = http
            .get(API_URL)
            .header("X-Api-Key", api_key)
            .header("User-Agent", "lalabot")
            .query(&[
                ("q", query),
                ("language", self.language.as_str()),
                ("sortBy", "relevancy"),
                ("pageSize", PAGE_SIZE),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        response.json().await.map_err(|e| failed(e.to_string()))
    }
}

#[async_trait]
impl Tool for NewsHeadlinesTool {
    fn name(&self) -> &str {
        "get_news_headlines"
    }

    fn description(&self) -> &str {
        "Find recent news articles about a topic. Articles already shown are skipped."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to search for"
                },
                "category": {
                    "type": "string",
                    "description": "Optional topic such as business, sports or technology"
                }
            }
        })
    }

    fn injections(&self) -> &[Injection] {
        &[Injection::HttpClient, Injection::UserState]
    }

    async fn execute(&self, mut input: ToolInput<'_>) -> Result<Value, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(Value::String("抱歉，新聞功能未設定 API Key。".into()));
        };
        let query = build_query(input.str_arg("query"), input.str_arg("category"));
        let http = input.http(self.name())?.clone();

        let response = self.fetch(&http, api_key, &query).await?;
        if response.status != "ok" {
            let message = response.message.unwrap_or_else(|| "未知錯誤".into());
            error!(query = %query, message = %message, "News API error");
            return Ok(Value::String(format!("抱歉，查詢新聞時發生錯誤: {message}")));
        }
        if response.articles.is_empty() {
            return Ok(Value::String(format!("找不到關於「{query}」的新聞。")));
        }

        let state = input.state(self.name())?;
        let total = response.articles.len();
        let fresh = select_unseen(response.articles, &mut state.seen_news_urls);
        debug!(query = %query, total, fresh = fresh.len(), "News articles deduplicated");

        if fresh.is_empty() {
            return Ok(Value::String("抱歉，目前沒有更多關於這個主題的新聞了耶～".into()));
        }
        serde_json::to_value(fresh).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lalabot_core::state::ConversationState;

    fn article(url: &str) -> Article {
        Article {
            title: Some(format!("title of {url}")),
            description: None,
            url: Some(url.into()),
        }
    }

    #[test]
    fn second_call_is_disjoint_from_first() {
        let mut seen = BTreeSet::new();
        let first = select_unseen(vec![article("a"), article("b"), article("c")], &mut seen);
        let second = select_unseen(vec![article("b"), article("c"), article("d")], &mut seen);

        assert_eq!(first.len(), 3);
        assert_eq!(second, vec![article("d")]);
        for a in &second {
            assert!(!first.contains(a));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn duplicates_within_one_batch_are_collapsed() {
        let mut seen = BTreeSet::new();
        let fresh = select_unseen(vec![article("a"), article("a")], &mut seen);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn articles_without_url_are_dropped() {
        let mut seen = BTreeSet::new();
        let no_url = Article {
            title: Some("orphan".into()),
            description: None,
            url: None,
        };
        assert!(select_unseen(vec![no_url], &mut seen).is_empty());
        assert!(seen.is_empty());
    }

    #[test]
    fn category_is_folded_into_query() {
        assert_eq!(build_query(Some("台積電"), Some("business")), "台積電 business");
        assert_eq!(build_query(None, Some("sports")), "sports");
        assert_eq!(build_query(Some("  "), None), FALLBACK_QUERY);
    }

    #[test]
    fn error_response_parses() {
        let resp: NewsResponse = serde_json::from_str(
            r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#,
        )
        .unwrap();
        assert_eq!(resp.status, "error");
        assert!(resp.articles.is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_explained_without_touching_state() {
        let tool = NewsHeadlinesTool::new(None, "zh");
        let mut state = ConversationState::default();
        let mut input = ToolInput::new(serde_json::Map::new());
        input.state = Some(&mut state);
        let out = tool.execute(input).await.unwrap();
        assert_eq!(out, Value::String("抱歉，新聞功能未設定 API Key。".into()));
        assert!(state.seen_news_urls.is_empty());
    }
}
