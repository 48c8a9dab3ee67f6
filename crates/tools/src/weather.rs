//! Weather tool — current conditions from OpenWeatherMap.
//!
//! City names the model writes in Chinese are mapped to the English names
//! the API understands. API-level failures (unknown city, bad key) come
//! back as explanatory text so the model can relay them.

use async_trait::async_trait;
use lalabot_core::error::ToolError;
use lalabot_core::tool::{Injection, Tool, ToolInput};
use serde_json::Value;
use tracing::error;

const API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const CITY_ALIASES: &[(&str, &str)] = &[
    ("台北", "Taipei"),
    ("桃園", "Taoyuan"),
    ("台中", "Taichung"),
    ("台南", "Tainan"),
    ("高雄", "Kaohsiung"),
    ("洛杉磯", "Los Angeles"),
    ("東京", "Tokyo"),
];

/// The English name for a known alias, otherwise the input unchanged.
pub fn resolve_city(city: &str) -> &str {
    CITY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == city)
        .map(|(_, english)| *english)
        .unwrap_or(city)
}

pub struct CurrentWeatherTool {
    api_key: Option<String>,
}

impl CurrentWeatherTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

/// Turn an API response into the sentence handed to the model.
fn describe(city: &str, status: u16, body: &Value) -> String {
    if status == 200 {
        let description = body["weather"][0]["description"].as_str().unwrap_or("未知");
        let temp = &body["main"]["temp"];
        format!("地點：{city}, 天氣：{description}, 氣溫：{temp}°C")
    } else {
        let message = body["message"].as_str().unwrap_or("未知錯誤");
        format!("（無法取得 {city} 的天氣資訊：{message}）")
    }
}

#[async_trait]
impl Tool for CurrentWeatherTool {
    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city. Defaults to the configured home city."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name, in Chinese or English"
                }
            }
        })
    }

    fn is_async(&self) -> bool {
        true
    }

    fn injections(&self) -> &[Injection] {
        &[Injection::HttpClient, Injection::Default("city")]
    }

    async fn execute(&self, input: ToolInput<'_>) -> Result<Value, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(Value::String("（天氣功能未設定 API Key）".into()));
        };
        let city = input.require_str(self.name(), "city")?;
        let city_en = resolve_city(city);

        let response = input
            .http(self.name())?
            .get(API_URL)
            .query(&[
                ("q", city_en),
                ("appid", api_key),
                ("units", "metric"),
                ("lang", "zh_tw"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("unreadable response: {e}"),
        })?;

        if status != 200 {
            error!(status, city = %city_en, body = %body, "Weather API error");
        }
        Ok(Value::String(describe(city, status, &body)))
    }
}
