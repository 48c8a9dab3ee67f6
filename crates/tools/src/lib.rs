//! Built-in tool plugins for lalabot.
//!
//! Tools give the model live data: the clock, the weather, web search,
//! news headlines, a per-user todo list, and music suggestions.

pub mod music;
pub mod news;
pub mod time;
pub mod todo;
pub mod weather;
pub mod web_search;

use lalabot_config::ToolsConfig;
use lalabot_core::error::ToolError;
use lalabot_core::tool::{ToolContext, ToolRegistry};

/// Create the registry with every built-in tool.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(time::CurrentTimeTool::new(config.utc_offset_hours)))?;
    registry.register(Box::new(weather::CurrentWeatherTool::new(
        config.weather_api_key.clone(),
    )))?;
    registry.register(Box::new(web_search::WebSearchTool))?;
    registry.register(Box::new(news::NewsHeadlinesTool::new(
        config.news_api_key.clone(),
        &config.news_language,
    )))?;
    registry.register(Box::new(todo::AddTodoTool))?;
    registry.register(Box::new(todo::ListTodosTool))?;
    registry.register(Box::new(music::RecommendMusicTool))?;
    Ok(registry)
}

/// The context every dispatch shares: the HTTP client and argument defaults.
pub fn default_context(config: &ToolsConfig, http: reqwest::Client) -> ToolContext {
    ToolContext::new(http).with_default("city", config.default_city.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_tools() {
        let registry = default_registry(&ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "add_todo",
                "get_current_time",
                "get_current_weather",
                "get_news_headlines",
                "list_todos",
                "recommend_music",
                "search_web",
            ]
        );
    }

    #[test]
    fn async_flags_match_plugins() {
        let registry = default_registry(&ToolsConfig::default()).unwrap();
        let async_tools: Vec<&str> = registry
            .names()
            .into_iter()
            .filter(|n| registry.get(n).is_some_and(|t| t.is_async()))
            .collect();
        assert_eq!(async_tools, vec!["get_current_weather", "search_web"]);
    }

    #[test]
    fn context_carries_default_city() {
        let config = ToolsConfig::default();
        let ctx = default_context(&config, reqwest::Client::new());
        assert_eq!(ctx.defaults["city"], serde_json::json!("Taipei"));
    }
}
