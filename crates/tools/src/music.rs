//! Music tool — a genre suggestion for the user's mood.

use async_trait::async_trait;
use lalabot_core::error::ToolError;
use lalabot_core::tool::{Tool, ToolInput};
use serde_json::Value;

const SAD: &[&str] = &["傷心", "難過", "失落"];
const HAPPY: &[&str] = &["開心", "興奮", "有活力"];

pub fn recommend(mood: &str) -> &'static str {
    let mood = mood.trim();
    if SAD.contains(&mood) {
        "推薦音樂類型：溫柔的鋼琴曲或 Lo-Fi 音樂。"
    } else if HAPPY.contains(&mood) {
        "推薦音樂類型：節奏感強的 Funk 或電子舞曲。"
    } else {
        "推薦音樂類型：輕柔的爵士樂或 Bossa Nova。"
    }
}

pub struct RecommendMusicTool;

#[async_trait]
impl Tool for RecommendMusicTool {
    fn name(&self) -> &str {
        "recommend_music"
    }

    fn description(&self) -> &str {
        "Suggest a music genre that fits the user's mood."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "mood": { "type": "string", "description": "How the user feels" }
            }
        })
    }

    async fn execute(&self, input: ToolInput<'_>) -> Result<Value, ToolError> {
        let mood = input.str_arg("mood").unwrap_or_default();
        Ok(Value::String(recommend(mood).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moods_map_to_genres() {
        assert!(recommend("難過").contains("Lo-Fi"));
        assert!(recommend(" 開心 ").contains("Funk"));
        assert!(recommend("無聊").contains("Bossa Nova"));
        assert!(recommend("").contains("Bossa Nova"));
    }
}
