//! Clock tool — the current local date and time.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use lalabot_core::error::ToolError;
use lalabot_core::tool::{Tool, ToolInput};
use serde_json::Value;

const FORMAT: &str = "%Y年%m月%d日 %A %H:%M";

pub struct CurrentTimeTool {
    offset: FixedOffset,
}

impl CurrentTimeTool {
    /// Offsets outside the valid range fall back to UTC.
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    fn format(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset).format(FORMAT).to_string()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date, weekday and time."
    }

    async fn execute(&self, _input: ToolInput<'_>) -> Result<Value, ToolError> {
        Ok(Value::String(self.format(Utc::now())))
    }
}
