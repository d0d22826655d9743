//! Local clock tool.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::Local;
use schemars::JsonSchema;
use serde::Deserialize;

use super::{parse_args, schema_of, Tool, ToolError};

const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %A";

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CurrentTimeArgs {
    /// strftime-style format, e.g. "%H:%M". Defaults to date, time and weekday.
    #[serde(default)]
    pub format: Option<String>,
}

/// Returns the current local date and time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date, time and weekday."
    }

    fn parameters(&self) -> serde_json::Value {
        schema_of::<CurrentTimeArgs>()
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let args: CurrentTimeArgs = if args.is_null() {
            CurrentTimeArgs::default()
        } else {
            parse_args(args)?
        };
        let format = args.format.as_deref().unwrap_or(DEFAULT_FORMAT);

        // chrono reports bad specifiers through fmt::Error
        let mut out = String::new();
        write!(out, "{}", Local::now().format(format))
            .map_err(|_| ToolError::InvalidArguments(format!("bad time format `{format}`")))?;
        Ok(out)
    }
}
