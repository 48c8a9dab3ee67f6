//! Fixed texts the conversation loop puts in front of the model or the user.

use lalabot_core::tool::{ToolCall, ToolResult};
use serde_json::Value;

/// Stored and shown instead of an empty answer.
pub const EMPTY_REPLY_FALLBACK: &str = "（我好像有點不知道該說什麼了...）";

/// User turn sent to the vision model with a photo.
pub const PHOTO_PROMPT: &str = "（專注地看著你分享的照片）哇，這張照片……";

/// User turn sent to the vision model with a sticker.
pub const STICKER_PROMPT: &str = "（看到你傳來的貼圖，溫柔地微笑著）這張貼圖真有趣，它讓我想到了……";

/// History entries standing in for an image the user sent.
pub const SENT_PHOTO: &str = "(sent a photo)";
pub const SENT_STICKER: &str = "(sent a sticker)";

pub const ANIMATED_STICKER_REFUSAL: &str = "抱歉，我不支援動態或影片貼圖喔～";
pub const IMAGE_TOO_LARGE: &str = "⚠️ 檔案過大";
pub const IMAGE_FAILED: &str = "⚠️ 處理圖片時發生錯誤。";

const NEWS_TOOL: &str = "get_news_headlines";

/// The assistant turn echoing a call, as the model would have written it.
pub fn serialized_call(call: &ToolCall) -> String {
    serde_json::to_string(call).unwrap_or_else(|_| call.tool_name.clone())
}

/// The tool turn telling the model how to use one result.
pub fn grounding_instruction(result: &ToolResult) -> String {
    let payload = result.result_text();
    if result.tool_call.tool_name == NEWS_TOOL && matches!(result.result, Value::Array(_)) {
        return format!(
            "以下是剛取得的新聞資料（JSON 格式）：\n{payload}\n\n\
             請從中挑選最值得一提的 2 到 3 則，依重要性排序。\
             每則用一兩句話說明重點，並在結尾附上該則的來源網址。\
             只能使用上面資料裡的新聞，不要自行補充或編造。"
        );
    }
    format!(
        "工具 {name} 回傳了以下資料：\n{payload}\n\n\
         請嚴格根據這些資料回答使用者剛才的問題，不要加入資料中沒有的資訊。\
         如果資料顯示查詢失敗，請直接告訴使用者。",
        name = result.tool_call.tool_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialized_call_keeps_non_ascii() {
        let call = ToolCall::new("get_current_weather").with_arg("city", "台北");
        assert_eq!(
            serialized_call(&call),
            r#"{"tool_name":"get_current_weather","arguments":{"city":"台北"}}"#
        );
    }

    #[test]
    fn news_results_use_the_news_template() {
        let result = ToolResult {
            tool_call: ToolCall::new("get_news_headlines"),
            result: json!([{"title": "颱風來襲", "description": "…", "url": "https://news.example/1"}]),
        };
        let text = grounding_instruction(&result);
        assert!(text.contains("2 到 3 則"));
        assert!(text.contains("https://news.example/1"));
    }

    #[test]
    fn news_explanations_use_the_generic_template() {
        let result = ToolResult {
            tool_call: ToolCall::new("get_news_headlines"),
            result: json!("（新聞功能未設定 API Key）"),
        };
        let text = grounding_instruction(&result);
        assert!(text.contains("嚴格根據"));
        assert!(text.contains("（新聞功能未設定 API Key）"));
    }

    #[test]
    fn generic_template_embeds_the_payload_verbatim() {
        let result = ToolResult {
            tool_call: ToolCall::new("get_current_time"),
            result: json!("2026年10月15日 Thursday 09:30"),
        };
        let text = grounding_instruction(&result);
        assert!(text.contains("get_current_time"));
        assert!(text.contains("2026年10月15日 Thursday 09:30"));
    }
}
