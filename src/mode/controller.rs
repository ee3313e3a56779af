//! The mode state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strum::IntoEnumIterator;
use tokio::sync::OnceCell;

use super::change_mode::ChangeModeTool;
use super::prompts::{ASK_SYSTEM_PROMPT, MODE_SWITCH_GUIDANCE, NAVIGATOR_SYSTEM_PROMPT};
use super::{format_user_message, Mode, ModeProfile, StaticProfile, ToolCatalog};
use crate::agent_loop::{ChatEvent, ChatEventSink, TurnContext};
use crate::error::ChatError;
use crate::tools::Tool;
use crate::types::{ContextElement, Message};

/// Result of a mode switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    /// The requested mode is now active.
    Switched(Mode),
    /// The requested mode was unavailable; the only available mode is active instead.
    FellBack { requested: Mode, mode: Mode },
    /// The requested mode was unavailable and no single fallback exists.
    Ignored { requested: Mode, mode: Mode },
}

impl ModeTransition {
    /// The mode active after the request.
    pub fn mode(self) -> Mode {
        match self {
            ModeTransition::Switched(mode)
            | ModeTransition::FellBack { mode, .. }
            | ModeTransition::Ignored { mode, .. } => mode,
        }
    }
}

struct ModeState {
    mode: Mode,
    pending: Option<String>,
    profiles: HashMap<Mode, Arc<dyn ModeProfile>>,
}

/// Owns the active mode, the pending instruction and the per-mode profiles.
///
/// Shared between the session and the `change_mode` tool; the tool loop
/// reads it through [`TurnContext`] on every iteration.
pub struct ModeController {
    state: Mutex<ModeState>,
    catalog: Option<Arc<dyn ToolCatalog>>,
    catalog_tools: OnceCell<Vec<Arc<dyn Tool>>>,
    change_mode: Arc<dyn Tool>,
    event_sink: Mutex<Option<ChatEventSink>>,
}

impl ModeController {
    /// Controller starting in Navigator mode with the built-in Navigator and
    /// Ask profiles and no dynamic catalogue.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub fn with_catalog(catalog: Arc<dyn ToolCatalog>) -> Arc<Self> {
        Self::build(Some(catalog))
    }

    fn build(catalog: Option<Arc<dyn ToolCatalog>>) -> Arc<Self> {
        let mut profiles: HashMap<Mode, Arc<dyn ModeProfile>> = HashMap::new();
        profiles.insert(
            Mode::Navigator,
            Arc::new(StaticProfile::new(NAVIGATOR_SYSTEM_PROMPT)),
        );
        profiles.insert(Mode::Ask, Arc::new(StaticProfile::new(ASK_SYSTEM_PROMPT)));

        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(ModeState {
                mode: Mode::default(),
                pending: None,
                profiles,
            }),
            catalog,
            catalog_tools: OnceCell::new(),
            change_mode: Arc::new(ChangeModeTool::new(weak.clone())),
            event_sink: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ModeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_event_sink(&self, sink: Option<ChatEventSink>) {
        *self
            .event_sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = sink;
    }

    fn emit_mode_changed(&self, mode: Mode) {
        let sink = self
            .event_sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink(ChatEvent::ModeChanged { mode });
        }
    }

    /// Make `mode` available with `profile`, replacing any previous profile.
    pub fn attach(&self, mode: Mode, profile: Arc<dyn ModeProfile>) {
        self.lock().profiles.insert(mode, profile);
        tracing::debug!(%mode, "mode profile attached");
    }

    /// Make `mode` unavailable. If it was active, the single remaining
    /// available mode (if exactly one) takes over.
    pub fn detach(&self, mode: Mode) -> Option<Arc<dyn ModeProfile>> {
        let (removed, fallback) = {
            let mut state = self.lock();
            let removed = state.profiles.remove(&mode);
            let fallback = if state.mode == mode {
                single_allowed(&state)
            } else {
                None
            };
            if let Some(next) = fallback {
                state.mode = next;
                state.pending = None;
            }
            (removed, fallback)
        };
        tracing::debug!(%mode, "mode profile detached");
        if let Some(next) = fallback {
            self.emit_mode_changed(next);
        }
        removed
    }

    pub fn is_allowed(&self, mode: Mode) -> bool {
        self.lock().profiles.contains_key(&mode)
    }

    pub fn allowed_modes(&self) -> Vec<Mode> {
        let state = self.lock();
        Mode::iter()
            .filter(|mode| state.profiles.contains_key(mode))
            .collect()
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn pending_instruction(&self) -> Option<String> {
        self.lock().pending.clone()
    }

    /// Request a switch to `mode`, queueing `pending` for the next request.
    ///
    /// An unavailable target falls back to the single available mode when
    /// exactly one exists; otherwise nothing changes.
    pub fn switch_mode(&self, mode: Mode, pending: Option<String>) -> ModeTransition {
        let (transition, changed) = {
            let mut state = self.lock();
            let previous = state.mode;
            let transition = if state.profiles.contains_key(&mode) {
                state.mode = mode;
                state.pending = pending.filter(|text| !text.trim().is_empty());
                ModeTransition::Switched(mode)
            } else if let Some(fallback) = single_allowed(&state) {
                state.mode = fallback;
                state.pending = None;
                ModeTransition::FellBack {
                    requested: mode,
                    mode: fallback,
                }
            } else {
                ModeTransition::Ignored {
                    requested: mode,
                    mode: previous,
                }
            };
            (transition, state.mode != previous)
        };

        match transition {
            ModeTransition::Switched(_) => tracing::debug!(%mode, "mode switched"),
            _ => tracing::warn!(requested = %mode, active = %transition.mode(), "requested mode unavailable"),
        }
        if changed {
            self.emit_mode_changed(transition.mode());
        }
        transition
    }

    /// Enter `mode` or fail; used for caller-requested modes.
    pub fn enter(&self, mode: Mode) -> Result<(), ChatError> {
        if !self.is_allowed(mode) {
            return Err(ChatError::Validation(format!(
                "{mode} mode is not available"
            )));
        }
        self.switch_mode(mode, None);
        Ok(())
    }

    /// Load the Navigator catalogue once. Failures are logged, leave the
    /// catalogue empty, and are retried on the next call.
    pub async fn ensure_catalog(&self) -> usize {
        let Some(catalog) = &self.catalog else {
            return 0;
        };
        match self.catalog_tools.get_or_try_init(|| catalog.load()).await {
            Ok(tools) => tools.len(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load navigator tool catalogue");
                0
            }
        }
    }

    /// Format instructions the way the active mode expects.
    pub fn user_message(&self, instructions: &str, context: &[ContextElement]) -> Message {
        self.user_message_for(self.mode(), instructions, context)
    }

    /// Format instructions the way `mode` expects, whether or not it is active.
    pub fn user_message_for(
        &self,
        mode: Mode,
        instructions: &str,
        context: &[ContextElement],
    ) -> Message {
        let profile = self.lock().profiles.get(&mode).cloned();
        match profile {
            Some(profile) => profile.user_message(instructions, context),
            None => Message::user(format_user_message(instructions, context)),
        }
    }

    fn active_profile(&self) -> Option<Arc<dyn ModeProfile>> {
        let state = self.lock();
        state.profiles.get(&state.mode).cloned()
    }
}

fn single_allowed(state: &ModeState) -> Option<Mode> {
    let mut allowed = Mode::iter().filter(|mode| state.profiles.contains_key(mode));
    match (allowed.next(), allowed.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

impl TurnContext for ModeController {
    fn mode(&self) -> Mode {
        ModeController::mode(self)
    }

    fn system_prompt(&self) -> String {
        let mode = ModeController::mode(self);
        let prompt = self
            .active_profile()
            .map(|profile| profile.system_prompt())
            .unwrap_or_default();
        if mode.has_switch_guidance() {
            format!("{MODE_SWITCH_GUIDANCE}{prompt}")
        } else {
            prompt
        }
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let mode = ModeController::mode(self);
        let mut tools = Vec::new();
        if mode.offers_mode_switch() {
            tools.push(self.change_mode.clone());
        }
        if let Some(profile) = self.active_profile() {
            tools.extend(profile.tools());
        }
        if mode == Mode::Navigator {
            if let Some(catalog) = self.catalog_tools.get() {
                tools.extend(catalog.iter().cloned());
            }
        }
        tools
    }

    fn take_pending_message(&self) -> Option<Message> {
        let pending = self.lock().pending.take()?;
        Some(self.user_message(&pending, &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::CHANGE_MODE_TOOL_NAME;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(tools: &[Arc<dyn Tool>]) -> Vec<String> {
        tools.iter().map(|t| t.name().to_string()).collect()
    }

    #[test]
    fn starts_in_navigator_with_change_mode_tool() {
        let controller = ModeController::new();
        assert_eq!(controller.mode(), Mode::Navigator);
        assert_eq!(names(&controller.tools()), vec![CHANGE_MODE_TOOL_NAME]);
        assert_eq!(controller.allowed_modes(), vec![Mode::Navigator, Mode::Ask]);
    }

    #[test]
    fn ask_mode_has_no_change_mode_tool() {
        let controller = ModeController::new();
        assert_eq!(controller.switch_mode(Mode::Ask, None), ModeTransition::Switched(Mode::Ask));
        assert!(controller.tools().is_empty());
        assert_eq!(controller.system_prompt(), ASK_SYSTEM_PROMPT);
    }

    #[test]
    fn script_prompt_is_prefixed_with_guidance() {
        let controller = ModeController::new();
        controller.attach(Mode::Script, Arc::new(StaticProfile::new("write scripts")));
        controller.switch_mode(Mode::Script, Some("make it".into()));

        assert_eq!(
            controller.system_prompt(),
            format!("{MODE_SWITCH_GUIDANCE}write scripts")
        );
        assert_eq!(controller.take_pending_message(), Some(Message::user("make it")));
        assert_eq!(controller.take_pending_message(), None);
    }

    #[test]
    fn unavailable_mode_is_ignored_when_several_remain() {
        let controller = ModeController::new();
        let transition = controller.switch_mode(Mode::Flow, Some("x".into()));
        assert_eq!(
            transition,
            ModeTransition::Ignored {
                requested: Mode::Flow,
                mode: Mode::Navigator
            }
        );
        assert_eq!(controller.pending_instruction(), None);
    }

    #[test]
    fn unavailable_mode_falls_back_to_single_allowed() {
        let controller = ModeController::new();
        controller.detach(Mode::Ask);
        let transition = controller.switch_mode(Mode::Script, None);
        assert_eq!(
            transition,
            ModeTransition::FellBack {
                requested: Mode::Script,
                mode: Mode::Navigator
            }
        );
        assert_eq!(controller.mode(), Mode::Navigator);
    }

    #[test]
    fn detaching_active_mode_falls_back() {
        let controller = ModeController::new();
        controller.attach(Mode::Flow, Arc::new(StaticProfile::new("flows")));
        controller.switch_mode(Mode::Flow, None);
        controller.detach(Mode::Ask);
        controller.detach(Mode::Flow);
        assert_eq!(controller.mode(), Mode::Navigator);
    }

    #[test]
    fn enter_rejects_unavailable_mode() {
        let controller = ModeController::new();
        let err = controller.enter(Mode::Script).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn mode_changes_are_emitted() {
        let controller = ModeController::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        controller.set_event_sink(Some(Arc::new(move |event: ChatEvent| {
            sink_seen.lock().unwrap().push(event);
        })));
        controller.switch_mode(Mode::Ask, None);
        controller.switch_mode(Mode::Ask, None);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChatEvent::ModeChanged { mode: Mode::Ask }]
        );
    }

    struct CountingCatalog {
        loads: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ToolCatalog for CountingCatalog {
        async fn load(&self) -> Result<Vec<Arc<dyn Tool>>, ChatError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(ChatError::Transport("catalogue offline".into()));
            }
            let tool: Arc<dyn Tool> = Arc::new(crate::tools::ChatTool::new(
                "list_items",
                "List items",
                crate::tools::ToolParameters::empty(),
                |_args, _ctx| async move { Ok("[]".to_string()) },
            ));
            Ok(vec![tool])
        }
    }

    #[tokio::test]
    async fn catalogue_is_loaded_once_and_cached() {
        let catalog = Arc::new(CountingCatalog {
            loads: AtomicUsize::new(0),
            fail_first: false,
        });
        let controller = ModeController::with_catalog(catalog.clone());
        assert_eq!(controller.ensure_catalog().await, 1);
        assert_eq!(controller.ensure_catalog().await, 1);
        assert_eq!(catalog.loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            names(&controller.tools()),
            vec![CHANGE_MODE_TOOL_NAME, "list_items"]
        );

        controller.switch_mode(Mode::Ask, None);
        assert!(controller.tools().is_empty());
    }

    #[tokio::test]
    async fn failed_catalogue_is_empty_and_retried() {
        let catalog = Arc::new(CountingCatalog {
            loads: AtomicUsize::new(0),
            fail_first: true,
        });
        let controller = ModeController::with_catalog(catalog.clone());
        assert_eq!(controller.ensure_catalog().await, 0);
        assert_eq!(names(&controller.tools()), vec![CHANGE_MODE_TOOL_NAME]);
        assert_eq!(controller.ensure_catalog().await, 1);
        assert_eq!(catalog.loads.load(Ordering::SeqCst), 2);
    }
}
