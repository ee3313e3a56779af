//! The built-in `change_mode` tool.

use std::sync::Weak;

use async_trait::async_trait;

use super::controller::{ModeController, ModeTransition};
use super::Mode;
use crate::error::ChatError;
use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolParameters};

pub const CHANGE_MODE_TOOL_NAME: &str = "change_mode";

/// Lets the model move the conversation to another mode.
///
/// The optional `pendingPrompt` is queued and sent as a user message with
/// the next request, formatted for the new mode.
pub struct ChangeModeTool {
    controller: Weak<ModeController>,
    parameters: ToolParameters,
}

impl ChangeModeTool {
    pub(crate) fn new(controller: Weak<ModeController>) -> Self {
        Self {
            controller,
            parameters: ToolParameters::object()
                .string_enum(
                    "mode",
                    "The mode to change to",
                    &["script", "flow", "navigator"],
                    true,
                )
                .string(
                    "pendingPrompt",
                    "The prompt to send to the new mode to fulfill the user request",
                    false,
                )
                .build(),
        }
    }
}

#[async_trait]
impl Tool for ChangeModeTool {
    fn name(&self) -> &str {
        CHANGE_MODE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Change the AI mode to the one specified. Script mode is used to create scripts, and \
         flow mode is used to create flows. Navigator mode is used to navigate the application \
         and help the user find what they are looking for."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<String, ChatError> {
        let requested = args.get_str("mode")?;
        let target: Mode = requested
            .parse()
            .ok()
            .filter(|mode: &Mode| mode.offers_mode_switch())
            .ok_or_else(|| ChatError::InvalidArgument(format!("unknown mode '{requested}'")))?;
        let pending = args.get_str_opt("pendingPrompt").map(str::to_string);

        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| ChatError::InvalidState("mode controller dropped".into()))?;

        ctx.set_status(&format!("Switching to {target} mode..."));
        let transition = controller.switch_mode(target, pending);
        if transition.mode() == Mode::Navigator {
            controller.ensure_catalog().await;
        }

        match transition {
            ModeTransition::Switched(mode) => {
                ctx.set_status(&format!("Switched to {mode} mode"));
                Ok(format!("Mode changed to {mode}"))
            }
            ModeTransition::FellBack { requested, mode }
            | ModeTransition::Ignored { requested, mode } => {
                ctx.set_status(&format!("{requested} mode unavailable, staying in {mode} mode"));
                Ok(format!(
                    "Mode {requested} is not available. Current mode is {mode}"
                ))
            }
        }
    }
}
