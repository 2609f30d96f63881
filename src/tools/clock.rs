//! Current local time

use super::{InputSchema, Tool};
use crate::error::AdvisorError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ClockTool;

#[async_trait::async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &'static str {
        "check_system_time"
    }

    fn description(&self) -> &'static str {
        "Returns the current date and time. Optionally takes a strftime format, \
         defaults to %Y-%m-%d %H:%M:%S."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Text { required: false }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let pattern = input
            .as_text()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_TIME_FORMAT);

        let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
        if items.iter().any(|i| matches!(i, Item::Error)) {
            return Err(AdvisorError::InvalidToolInput(format!(
                "Invalid time format: {:?}",
                pattern
            )));
        }

        let now = Local::now();
        Ok(ToolOutput::text(
            now.format_with_items(items.into_iter()).to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[tokio::test]
    async fn test_default_format() {
        let output = ClockTool
            .execute(&ToolInput::Text(String::new()))
            .await
            .unwrap();
        assert!(NaiveDateTime::parse_from_str(&output.text, DEFAULT_TIME_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn test_custom_format() {
        let output = ClockTool
            .execute(&ToolInput::Text("%Y".to_string()))
            .await
            .unwrap();
        assert_eq!(output.text.len(), 4);
    }

    #[tokio::test]
    async fn test_bad_format_is_rejected() {
        let result = ClockTool.execute(&ToolInput::Text("%Q%".to_string())).await;
        assert!(matches!(result, Err(AdvisorError::InvalidToolInput(_))));
    }
}
