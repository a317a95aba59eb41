//! Clock tool — current date and time. Input is ignored.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use stratagem_core::tool::{Tool, ToolContext, ToolKind, ToolOutput};

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Clock
    }

    fn description(&self) -> &str {
        "Get the current date, time and day of the week. Input is ignored."
    }

    async fn execute(&self, _input: &str, _ctx: &ToolContext) -> ToolOutput {
        let now = Utc::now();
        ToolOutput::text(render(now, now.with_timezone(&Local)))
    }
}

fn render(utc: DateTime<Utc>, local: DateTime<Local>) -> String {
    format!(
        "Current UTC time: {}\nDay of week: {}\nLocal time: {}",
        utc.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        utc.format("%A"),
        local.format("%A, %B %-d, %Y, %-I:%M:%S %p"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn render_layout() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 13, 5, 9).unwrap();
        let text = render(utc, utc.with_timezone(&Local));
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Current UTC time: 2024-03-01T13:05:09.000Z"));
        assert_eq!(lines.next(), Some("Day of week: Friday"));
        assert!(lines.next().unwrap().starts_with("Local time: "));
    }

    #[tokio::test]
    async fn input_is_ignored() {
        let out = ClockTool
            .execute("what time is it in Tokyo?", &ToolContext::default())
            .await;
        assert!(out.text.starts_with("Current UTC time: "));
        assert!(!out.is_error());
    }
}
