//! Chat sessions: the conversation store, retry/restart and cancellation.

pub mod history;
pub mod inline;
mod recorder;
pub mod state;

pub use history::{ChatSummary, FileHistoryStore, HistoryStore, InMemoryHistoryStore, SavedChat};
pub use inline::{code_piece, extract_new_code, LineRange};
pub use state::ConversationState;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent_loop::{ChatEvent, ChatEventSink, ToolLoop};
use crate::config::ChatConfig;
use crate::context::trim_history;
use crate::error::ChatError;
use crate::mode::{Mode, ModeController, ModeTransition};
use crate::provider::CompletionService;
use crate::types::{ContextElement, DisplayMessage, Message};
use recorder::TurnRecorder;

/// User-facing notifications (toasts).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, is_error: bool);
}

/// Routes notifications to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, message: &str, is_error: bool) {
        if is_error {
            tracing::error!(notification = message);
        } else {
            tracing::info!(notification = message);
        }
    }
}

/// Supplies the context elements currently selected by the user.
pub trait ContextProvider: Send + Sync {
    fn selected_context(&self) -> Vec<ContextElement>;
}

/// Per-send options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    /// Enter this mode before the turn; fails if it is unavailable.
    pub mode: Option<Mode>,
    /// Use these context elements instead of the provider's selection.
    pub context: Option<Vec<ContextElement>>,
}

impl SendOptions {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_context(mut self, context: Vec<ContextElement>) -> Self {
        self.context = Some(context);
        self
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    /// The turn failed; the user turn is flagged and a notification was sent.
    Failed { message: String },
}

/// Cancels the in-flight turn of a session. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancelHandle {
    fn lock(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh token for a new turn; fails while another turn is running.
    fn begin(&self) -> Result<CancellationToken, ChatError> {
        let mut active = self.lock();
        if active.is_some() {
            return Err(ChatError::InvalidState(
                "a request is already in progress".into(),
            ));
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(token)
    }

    fn finish(&self) {
        self.lock().take();
    }

    /// Signal the running turn. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }
}

/// Releases the cancel slot and clears the loading flag, however the turn ends.
struct TurnGuard<'a> {
    session: &'a ChatSession,
    loading: bool,
}

impl<'a> TurnGuard<'a> {
    fn new(session: &'a ChatSession, loading: bool) -> Self {
        if loading {
            session.set_loading(true);
        }
        Self { session, loading }
    }

    fn start_loading(&mut self) {
        if !self.loading {
            self.loading = true;
            self.session.set_loading(true);
        }
    }
}

fn check_instructions(text: &str) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::Validation("Instructions are required".into()));
    }
    Ok(())
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session.cancel.finish();
        if self.loading {
            self.session.set_loading(false);
        }
    }
}

/// One conversation: both logs, the mode controller, and the collaborators
/// a turn needs.
///
/// All methods take `&self`; share the session behind an `Arc` to cancel
/// from another task.
///
/// # Example
///
/// ```ignore
/// let session = ChatSession::new(service, ChatConfig::default());
/// session.send("List my scripts", SendOptions::default()).await?;
/// for entry in session.display() {
///     println!("{}: {}", entry.role, entry.content);
/// }
/// ```
pub struct ChatSession {
    service: Arc<dyn CompletionService>,
    modes: Arc<ModeController>,
    config: ChatConfig,
    state: Arc<Mutex<ConversationState>>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn NotificationSink>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    event_sink: Option<ChatEventSink>,
    cancel: CancelHandle,
    loading_tx: watch::Sender<bool>,
}

impl ChatSession {
    /// Session with tracing notifications. Chats are saved under
    /// `config.history_dir` when it is set and kept in memory otherwise.
    pub fn new(service: Arc<dyn CompletionService>, config: ChatConfig) -> Self {
        let (loading_tx, _) = watch::channel(false);
        let history: Arc<dyn HistoryStore> = match &config.history_dir {
            Some(dir) => Arc::new(FileHistoryStore::new(dir.clone())),
            None => Arc::new(InMemoryHistoryStore::new()),
        };
        Self {
            service,
            modes: ModeController::new(),
            config,
            state: Arc::new(Mutex::new(ConversationState::new())),
            history,
            notifier: Arc::new(TracingNotifier),
            context_provider: None,
            event_sink: None,
            cancel: CancelHandle::default(),
            loading_tx,
        }
    }

    pub fn with_modes(mut self, modes: Arc<ModeController>) -> Self {
        if self.event_sink.is_some() {
            modes.set_event_sink(self.event_sink.clone());
        }
        self.modes = modes;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn with_event_sink(mut self, sink: ChatEventSink) -> Self {
        self.modes.set_event_sink(Some(sink.clone()));
        self.event_sink = Some(sink);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(sink) = &self.event_sink {
            sink(event);
        }
    }

    fn set_loading(&self, loading: bool) {
        self.loading_tx.send_replace(loading);
        self.emit(ChatEvent::Loading { loading });
    }

    fn selected_context(&self) -> Vec<ContextElement> {
        self.context_provider
            .as_ref()
            .map(|provider| provider.selected_context())
            .unwrap_or_default()
    }

    fn notify(&self, message: &str, is_error: bool) {
        self.notifier.notify(message, is_error);
        self.emit(ChatEvent::Notification {
            message: message.to_string(),
            is_error,
        });
    }

    fn persist(&self) -> Result<(), ChatError> {
        let snapshot = {
            let state = self.lock_state();
            if state.display.is_empty() {
                return Ok(());
            }
            state.snapshot()
        };
        self.history.save(&snapshot)
    }

    // -- Read access --

    pub fn display(&self) -> Vec<DisplayMessage> {
        self.lock_state().display.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock_state().messages.clone()
    }

    pub fn chat_id(&self) -> Uuid {
        self.lock_state().chat_id
    }

    pub fn is_loading(&self) -> bool {
        *self.loading_tx.borrow()
    }

    /// Subscribe to loading-flag changes.
    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.loading_tx.subscribe()
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn modes(&self) -> &Arc<ModeController> {
        &self.modes
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    // -- Operations --

    /// Send `text` as a new user turn and run it to completion.
    ///
    /// Rejects empty text, an unavailable requested mode, and a send while
    /// another turn is running. Failures of the turn itself are reported
    /// through the flagged user turn, a notification and
    /// [`TurnOutcome::Failed`].
    pub async fn send(
        &self,
        text: impl Into<String>,
        options: SendOptions,
    ) -> Result<TurnOutcome, ChatError> {
        let text = text.into();
        check_instructions(&text)?;
        let cancel = self.cancel.begin()?;
        let _guard = TurnGuard::new(self, true);
        self.start_turn(&text, options, &cancel).await
    }

    async fn start_turn(
        &self,
        text: &str,
        options: SendOptions,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        if let Some(mode) = options.mode {
            self.modes.enter(mode)?;
        }
        let context = options
            .context
            .unwrap_or_else(|| self.selected_context());
        Ok(self.run_turn(text, context, cancel).await)
    }

    async fn run_turn(
        &self,
        text: &str,
        context: Vec<ContextElement>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mode = self.modes.mode();
        let turn_id = Uuid::new_v4();
        tracing::info!(%turn_id, %mode, chat_id = %self.chat_id(), "turn started");

        let user_message = self.modes.user_message(text, &context);
        let reply_context: Vec<ContextElement> = if mode == Mode::Script {
            context
                .iter()
                .filter(|element| element.kind() == Some("code"))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let mut working = {
            let mut state = self.lock_state();
            state.begin_turn(text, context, user_message);
            state.messages.clone()
        };

        if let Err(err) = self.persist() {
            return self.fail_turn(turn_id, err);
        }

        let report = trim_history(&mut working, &self.config.budget(), self.config.max_evictions);
        if report.steps > 0 {
            tracing::debug!(%turn_id, removed = report.removed, still_over = report.still_over_limit, "trimmed request history");
        }

        if mode == Mode::Navigator {
            self.modes.ensure_catalog().await;
        }

        let recorder = Arc::new(TurnRecorder::new(
            self.state.clone(),
            reply_context,
            self.event_sink.clone(),
        ));
        let result = ToolLoop::new(self.service.as_ref(), self.modes.as_ref())
            .with_observer(recorder)
            .with_max_iterations(self.config.max_iterations)
            .with_turn_id(turn_id)
            .run(working, cancel)
            .await;

        match result {
            Ok(outcome) => {
                let cancelled = outcome.is_cancelled();
                self.lock_state().fold(outcome.messages);
                if let Err(err) = self.persist() {
                    return self.fail_turn(turn_id, err);
                }
                tracing::info!(%turn_id, iterations = outcome.iterations, cancelled, "turn finished");
                if cancelled {
                    TurnOutcome::Cancelled
                } else {
                    TurnOutcome::Completed
                }
            }
            Err(err) => self.fail_turn(turn_id, err),
        }
    }

    fn fail_turn(&self, turn_id: Uuid, err: ChatError) -> TurnOutcome {
        tracing::warn!(%turn_id, error = %err, category = ?err.category(), "turn failed");
        if err.is_turn_fatal() {
            self.lock_state().flag_last_user_error();
        }
        let message = format!("Failed to send request: {err}");
        self.notify(&message, true);
        TurnOutcome::Failed { message }
    }

    /// Abort the running turn, if any.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Truncate both logs to just before the user turn at `display_index` and
    /// send `new_text`, or the original text when `None`.
    ///
    /// The entry and the text are checked before anything is truncated, and
    /// the turn slot is held from the rewind to the resend.
    pub async fn restart(
        &self,
        display_index: usize,
        new_text: Option<String>,
    ) -> Result<TurnOutcome, ChatError> {
        let cancel = self.cancel.begin()?;
        let mut guard = TurnGuard::new(self, false);

        let edited = new_text.is_some();
        let text = match new_text {
            Some(text) => text,
            None => self.lock_state().user_turn(display_index)?.content.clone(),
        };
        check_instructions(&text)?;
        let turn = self.lock_state().rewind_to(display_index)?;
        tracing::debug!(display_index, edited, "restarting from user turn");

        guard.start_loading();
        self.start_turn(&text, SendOptions::default().with_context(turn.context), &cancel)
            .await
    }

    /// Re-send the user turn at `display_index` with its original text.
    ///
    /// The re-sent turn starts without the error flag.
    pub async fn retry(&self, display_index: usize) -> Result<TurnOutcome, ChatError> {
        self.restart(display_index, None).await
    }

    /// Switch modes on behalf of the user, queueing `pending` for the next request.
    pub fn switch_mode(&self, mode: Mode, pending: Option<String>) -> ModeTransition {
        self.modes.switch_mode(mode, pending)
    }

    /// Save the chat, then start a fresh one.
    pub fn clear_and_save(&self) -> Result<(), ChatError> {
        self.persist()?;
        self.lock_state().reset();
        Ok(())
    }

    /// Replace both logs with a saved chat. Returns `false` if `id` is unknown.
    pub fn load_past_chat(&self, id: Uuid) -> Result<bool, ChatError> {
        match self.history.load(id)? {
            Some(chat) => {
                *self.lock_state() = ConversationState::from(chat);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Saved chats, most recent first.
    pub fn past_chats(&self) -> Result<Vec<history::ChatSummary>, ChatError> {
        self.history.list()
    }
}
