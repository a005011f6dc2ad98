use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use pith_config::{ContextConfig, TurnConfig};
use pith_model::{CompletionRequest, Message, Model, ResponseEvent};
use pith_store::{MessageRole, NewMessage, SessionSummary, Store};
use pith_tools::{ToolCall, ToolRegistry};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::bus::{EventBus, Subscription};
use crate::compaction::{self, CompactionError};
use crate::context::ContextAssembler;
use crate::event::{TurnEvent, TurnStatus};

/// Tool deadline used when a [`pith_tools::Tool`] does not override
/// [`pith_tools::Tool::deadline`].
const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(30);

/// How much of a tool's rendered output is kept in the `*_preview` fields
/// of streamed events.
const PREVIEW_CHARS: usize = 200;

/// Holds the tool call currently awaiting execution, if any, so a turn's
/// outer deadline can backfill a synthetic result for it on timeout.
type InFlightTool = Arc<Mutex<Option<ToolCall>>>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("a turn is already in progress for this session")]
    Busy,
    #[error("store error: {0}")]
    Store(#[from] pith_store::StoreError),
}

/// Owns the Store, Model, Tool Registry, and Event Bus and drives turns
/// against them. One `Runtime` per process.
pub struct Runtime {
    store: Arc<Store>,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn Model>,
    bus: Arc<EventBus>,
    workspace_path: PathBuf,
    context_config: ContextConfig,
    turn_config: TurnConfig,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Runtime {
    pub fn new(
        store: Arc<Store>,
        tools: Arc<ToolRegistry>,
        model: Arc<dyn Model>,
        bus: Arc<EventBus>,
        workspace_path: PathBuf,
        context_config: ContextConfig,
        turn_config: TurnConfig,
    ) -> Self {
        Self {
            store,
            tools,
            model,
            bus,
            workspace_path,
            context_config,
            turn_config,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh session with no prior messages.
    pub async fn new_session(&self) -> Result<String, RuntimeError> {
        let session = self.store.create_session(None).await?;
        Ok(session.id)
    }

    /// Runs compaction for `session_id` outside of a turn, e.g. for the
    /// `/compact` slash command or an operator-triggered maintenance call.
    pub async fn compact_session(&self, session_id: &str) -> Result<SessionSummary, CompactionError> {
        compaction::compact_session(&self.store, self.model.as_ref(), session_id).await
    }

    /// Subscribes to `session_id`'s event stream without submitting a
    /// turn — the SSE API and channels use this to observe turns started
    /// through some other caller.
    pub async fn subscribe(&self, session_id: &str) -> Subscription {
        self.bus.subscribe(session_id).await
    }

    /// The Store backing this runtime, for read-mostly queries (status,
    /// session existence checks) that don't belong on `Runtime` itself.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The Tool Registry backing this runtime, for status/introspection
    /// endpoints.
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Submits a turn. Returns a live event subscription immediately; the
    /// turn itself runs on a background task so multiple subscribers (an
    /// SSE client, a channel) can observe the same turn.
    ///
    /// Per-session submissions are serialised: a session with a turn
    /// already in flight rejects the new one with [`RuntimeError::Busy`]
    /// rather than queuing it.
    pub async fn submit_turn(
        self: &Arc<Self>,
        session_id: &str,
        user_text: &str,
        deadline: Option<Duration>,
    ) -> Result<Subscription, RuntimeError> {
        let lock = self.lock_for(session_id).await;
        let guard = lock.try_lock_owned().map_err(|_| RuntimeError::Busy)?;

        let subscription = self.bus.subscribe(session_id).await;
        let runtime = self.clone();
        let session_id = session_id.to_string();
        let user_text = user_text.to_string();
        let deadline = deadline.unwrap_or(Duration::from_secs(runtime.turn_config.deadline_seconds));

        tokio::spawn(async move {
            let _guard = guard;
            runtime.run_turn(&session_id, &user_text, deadline).await;
        });

        Ok(subscription)
    }

    async fn run_turn(self: Arc<Self>, session_id: &str, user_text: &str, deadline: Duration) {
        if let Ok(true) = compaction::needs_compaction(&self.store, session_id).await {
            match self.compact_session(session_id).await {
                Ok(summary) => {
                    tracing::info!(session_id, to_msg_id = summary.to_msg_id, "compacted session before turn");
                }
                Err(CompactionError::NothingToCompact) => {}
                Err(err) => warn!(session_id, %err, "proactive compaction failed"),
            }
        }

        if let Some(outcome) = self.handle_slash_command(session_id, user_text).await {
            self.bus.publish(session_id, &outcome.turn_id, TurnEvent::TurnStarted {
                session_id: session_id.to_string(),
                message_id_to_be: outcome.turn_id.clone(),
            }).await;
            self.bus.publish(session_id, &outcome.turn_id, TurnEvent::AssistantMessage { id: -1, text: outcome.text }).await;
            self.bus.publish(session_id, &outcome.turn_id, TurnEvent::TurnFinished { status: outcome.status }).await;
            return;
        }

        let turn_id = Uuid::new_v4().to_string();
        self.bus
            .publish(session_id, &turn_id, TurnEvent::TurnStarted {
                session_id: session_id.to_string(),
                message_id_to_be: turn_id.clone(),
            })
            .await;

        let in_flight: InFlightTool = Arc::new(Mutex::new(None));
        let body = self.run_turn_body(session_id, &turn_id, user_text, in_flight.clone());
        match tokio::time::timeout(deadline, body).await {
            Ok(()) => {}
            Err(_elapsed) => {
                // The dropped `body` future may have left a `tool_request`
                // message with no matching `tool_result` (invariant 2, §3):
                // the deadline can elapse while a tool execution is
                // in-flight. `in_flight` is set just before that await and
                // cleared right after, so whatever is left here, if
                // anything, is exactly that orphan.
                if let Some(call) = in_flight.lock().await.take() {
                    let _ = self
                        .store
                        .append_message(NewMessage {
                            session_id: session_id.to_string(),
                            role: MessageRole::ToolResult,
                            text: String::new(),
                            tool_name: Some(call.name.clone()),
                            tool_args: None,
                            tool_result: Some(serde_json::json!({
                                "content": "turn deadline exceeded while this tool was executing",
                                "is_error": true,
                            })),
                            token_estimate: 8,
                        })
                        .await;
                    self.bus
                        .publish(session_id, &turn_id, TurnEvent::ToolCallFinished {
                            call_id: call.id,
                            name: call.name,
                            ok: false,
                            duration_ms: 0,
                            result_preview: preview("turn deadline exceeded"),
                        })
                        .await;
                }

                let _ = self
                    .store
                    .append_message(NewMessage {
                        session_id: session_id.to_string(),
                        role: MessageRole::SystemInjected,
                        text: "turn cancelled: exceeded its deadline".to_string(),
                        tool_name: None,
                        tool_args: None,
                        tool_result: None,
                        token_estimate: 8,
                    })
                    .await;
                self.bus.publish(session_id, &turn_id, TurnEvent::TurnFinished { status: TurnStatus::Timeout }).await;
            }
        }
    }

    async fn handle_slash_command(&self, session_id: &str, user_text: &str) -> Option<SlashOutcome> {
        let turn_id = Uuid::new_v4().to_string();
        match user_text.trim() {
            "/new" => {
                let new_id = match self.new_session().await {
                    Ok(id) => id,
                    Err(err) => return Some(SlashOutcome { turn_id, text: format!("failed to create session: {err}"), status: TurnStatus::Error { kind: "storage".into(), detail: err.to_string() } }),
                };
                Some(SlashOutcome { turn_id, text: format!("started new session {new_id}"), status: TurnStatus::Ok })
            }
            "/compact" => match self.compact_session(session_id).await {
                Ok(summary) => Some(SlashOutcome {
                    turn_id,
                    text: format!("compacted messages {}-{}: {}", summary.from_msg_id, summary.to_msg_id, summary.summary_text),
                    status: TurnStatus::Ok,
                }),
                Err(CompactionError::NothingToCompact) => Some(SlashOutcome { turn_id, text: "nothing to compact".into(), status: TurnStatus::Ok }),
                Err(err) => Some(SlashOutcome { turn_id, text: format!("compaction failed: {err}"), status: TurnStatus::Error { kind: "compaction".into(), detail: err.to_string() } }),
            },
            "/info" => Some(SlashOutcome { turn_id, text: self.render_status(session_id).await, status: TurnStatus::Ok }),
            _ => None,
        }
    }

    async fn render_status(&self, session_id: &str) -> String {
        let bootstrap = self.store.bootstrap_complete().await.unwrap_or(false);
        let agent = self.store.get_agent_profile().await.unwrap_or_default();
        let message_count = self.store.list_messages(session_id, None, None).await.map(|m| m.len()).unwrap_or(0);
        format!(
            "session={session_id} bootstrap_complete={bootstrap} agent_name={:?} messages={message_count} model={}",
            agent.name,
            self.model.name(),
        )
    }

    /// The bounded model↔tool dispatch loop for a single turn. Emits all
    /// streaming and terminal events itself; never returns an error so the
    /// spawned task never has anything to propagate.
    ///
    /// `in_flight` is set to the currently-executing tool call for the
    /// duration of its `execute` await and cleared once an outcome (success,
    /// error, or per-tool timeout) has been obtained; the caller wrapping
    /// this whole body in an outer deadline uses it to detect and backfill
    /// an orphaned `tool_request` if the deadline elapses mid-execution.
    async fn run_turn_body(&self, session_id: &str, turn_id: &str, user_text: &str, in_flight: InFlightTool) {
        let user_msg = self
            .store
            .append_message(NewMessage {
                session_id: session_id.to_string(),
                role: MessageRole::User,
                text: user_text.to_string(),
                tool_name: None,
                tool_args: None,
                tool_result: None,
                token_estimate: (user_text.len() / 4).max(1) as i64,
            })
            .await;
        if let Err(err) = user_msg {
            self.finish_with_error(session_id, turn_id, "storage", &err.to_string()).await;
            return;
        }

        let assembler = ContextAssembler::new(self.store.clone());
        let assembled = match assembler.assemble(session_id, user_text, &self.workspace_path, &self.context_config).await {
            Ok(a) => a,
            Err(err) => {
                self.finish_with_error(session_id, turn_id, "context_overflow", &err.to_string()).await;
                return;
            }
        };

        let mut messages = assembled.messages;
        let system_prompt = assembled.system_prompt;
        let mut set_profile_succeeded = false;
        let mut tool_round = 0u32;

        loop {
            let request = CompletionRequest {
                system_prompt: system_prompt.clone(),
                messages: messages.clone(),
                tools: self.tools.schemas(),
            };

            let mut stream = match self.model.complete(request).await {
                Ok(s) => s,
                Err(err) => {
                    self.finish_with_error(session_id, turn_id, "model", &err.to_string()).await;
                    return;
                }
            };

            let mut text = String::new();
            let mut tool_calls = Vec::new();
            let mut stream_error = None;
            while let Some(event) = stream.next().await {
                match event {
                    Ok(ResponseEvent::TextDelta { text: delta }) => {
                        self.bus.publish(session_id, turn_id, TurnEvent::AssistantDelta { text: delta.clone() }).await;
                        text.push_str(&delta);
                    }
                    Ok(ResponseEvent::ToolCall(call)) => tool_calls.push(call),
                    Ok(ResponseEvent::Done) => break,
                    Ok(ResponseEvent::Error { message }) => {
                        stream_error = Some(message);
                        break;
                    }
                    Err(err) => {
                        stream_error = Some(err.to_string());
                        break;
                    }
                }
            }

            if let Some(detail) = stream_error {
                self.finish_with_error(session_id, turn_id, "model", &detail).await;
                return;
            }

            if tool_calls.is_empty() {
                self.finish_ok(session_id, turn_id, &text).await;
                if set_profile_succeeded {
                    self.check_bootstrap_completion(session_id).await;
                }
                return;
            }

            tool_round += 1;
            if tool_round > self.turn_config.max_tool_iterations {
                self.finish_cap(session_id, turn_id).await;
                if set_profile_succeeded {
                    self.check_bootstrap_completion(session_id).await;
                }
                return;
            }

            if !text.is_empty() {
                messages.push(Message::assistant(text.clone()));
            }

            for request in tool_calls {
                let call = ToolCall { id: request.id.clone(), name: request.name.clone(), args: request.args.clone() };

                let _ = self
                    .store
                    .append_message(NewMessage {
                        session_id: session_id.to_string(),
                        role: MessageRole::ToolRequest,
                        text: String::new(),
                        tool_name: Some(call.name.clone()),
                        tool_args: Some(call.args.clone()),
                        tool_result: None,
                        token_estimate: (call.args.to_string().len() / 4).max(1) as i64,
                    })
                    .await;

                self.bus
                    .publish(session_id, turn_id, TurnEvent::ToolCallStarted {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        args_preview: preview(&call.args.to_string()),
                    })
                    .await;

                let started = Instant::now();
                let tool = self.tools.get(&call.name);
                let deadline = tool.as_ref().and_then(|t| t.deadline()).unwrap_or(DEFAULT_TOOL_DEADLINE);
                *in_flight.lock().await = Some(call.clone());
                let output = match tokio::time::timeout(deadline, self.tools.execute(call.clone())).await {
                    Ok(output) => output,
                    Err(_elapsed) => pith_tools::ToolOutput::err(&call.id, format!("tool '{}' timed out after {:?}", call.name, deadline)),
                };
                *in_flight.lock().await = None;

                if call.name == "set_profile" && !output.is_error {
                    set_profile_succeeded = true;
                }

                let duration_ms = started.elapsed().as_millis() as u64;

                let result_value = serde_json::json!({"content": output.content, "is_error": output.is_error});
                let _ = self
                    .store
                    .append_message(NewMessage {
                        session_id: session_id.to_string(),
                        role: MessageRole::ToolResult,
                        text: String::new(),
                        tool_name: Some(call.name.clone()),
                        tool_args: None,
                        tool_result: Some(result_value),
                        token_estimate: (output.content.len() / 4).max(1) as i64,
                    })
                    .await;

                self.bus
                    .publish(session_id, turn_id, TurnEvent::ToolCallFinished {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        ok: !output.is_error,
                        duration_ms,
                        result_preview: preview(&output.content),
                    })
                    .await;

                messages.push(Message::system(format!("[tool_request {}] {}", call.name, call.args)));
                messages.push(Message::system(format!("[tool_result {}] {}", call.name, output.content)));
            }
        }
    }

    async fn finish_ok(&self, session_id: &str, turn_id: &str, text: &str) {
        let persisted = self
            .store
            .append_message(NewMessage {
                session_id: session_id.to_string(),
                role: MessageRole::Assistant,
                text: text.to_string(),
                tool_name: None,
                tool_args: None,
                tool_result: None,
                token_estimate: (text.len() / 4).max(1) as i64,
            })
            .await;
        let id = persisted.map(|m| m.id).unwrap_or(-1);
        self.bus.publish(session_id, turn_id, TurnEvent::AssistantMessage { id, text: text.to_string() }).await;
        self.bus.publish(session_id, turn_id, TurnEvent::TurnFinished { status: TurnStatus::Ok }).await;
    }

    async fn finish_cap(&self, session_id: &str, turn_id: &str) {
        let text = format!("reached the tool-call limit ({} calls) for this turn", self.turn_config.max_tool_iterations);
        let _ = self
            .store
            .append_message(NewMessage {
                session_id: session_id.to_string(),
                role: MessageRole::Assistant,
                text: text.clone(),
                tool_name: None,
                tool_args: None,
                tool_result: None,
                token_estimate: (text.len() / 4).max(1) as i64,
            })
            .await;
        self.bus.publish(session_id, turn_id, TurnEvent::AssistantMessage { id: -1, text }).await;
        self.bus.publish(session_id, turn_id, TurnEvent::TurnFinished { status: TurnStatus::ToolLoopCap }).await;
    }

    async fn finish_with_error(&self, session_id: &str, turn_id: &str, kind: &str, detail: &str) {
        let text = format!("turn failed ({kind}): {detail}");
        let _ = self
            .store
            .append_message(NewMessage {
                session_id: session_id.to_string(),
                role: MessageRole::SystemInjected,
                text: text.clone(),
                tool_name: None,
                tool_args: None,
                tool_result: None,
                token_estimate: (text.len() / 4).max(1) as i64,
            })
            .await;
        self.bus
            .publish(session_id, turn_id, TurnEvent::TurnFinished { status: TurnStatus::Error { kind: kind.to_string(), detail: detail.to_string() } })
            .await;
    }

    async fn check_bootstrap_completion(&self, session_id: &str) {
        let already = self.store.bootstrap_complete().await.unwrap_or(true);
        if already {
            return;
        }
        let agent = match self.store.get_agent_profile().await {
            Ok(a) => a,
            Err(_) => return,
        };
        let user = match self.store.get_user_profile().await {
            Ok(u) => u,
            Err(_) => return,
        };
        if agent.required_fields_complete() && user.required_fields_complete() {
            if self.store.set_bootstrap_complete(true).await.is_ok() {
                self.bus.publish(session_id, "", TurnEvent::AppStateChanged { key: "bootstrap_complete".to_string() }).await;
            }
        }
    }
}

struct SlashOutcome {
    turn_id: String,
    text: String,
    status: TurnStatus,
}

fn preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_CHARS {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(PREVIEW_CHARS).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use pith_model::mock::ScriptedMockModel;
    use pith_tools::builtin::memory_save::MemorySaveTool;
    use tempfile::tempdir;

    use super::*;

    fn test_runtime(model: ScriptedMockModel) -> (Arc<Runtime>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut registry = ToolRegistry::new();
        registry.register_builtin(MemorySaveTool::new(store.clone()));
        let tools = Arc::new(registry);
        let bus = Arc::new(EventBus::new());
        let workspace = tempdir().unwrap().into_path();
        let runtime = Arc::new(Runtime::new(
            store.clone(),
            tools,
            Arc::new(model),
            bus,
            workspace,
            ContextConfig::default(),
            TurnConfig { max_tool_iterations: 3, deadline_seconds: 30 },
        ));
        (runtime, store)
    }

    #[tokio::test]
    async fn plain_turn_persists_assistant_message_and_emits_terminal_event() {
        let model = ScriptedMockModel::new(vec![vec![
            ResponseEvent::TextDelta { text: "hi there".into() },
            ResponseEvent::Done,
        ]]);
        let (runtime, store) = test_runtime(model);
        let session_id = runtime.new_session().await.unwrap();

        let mut sub = runtime.submit_turn(&session_id, "hello", None).await.unwrap();

        let mut saw_terminal = false;
        while let Some(envelope) = sub.next().await {
            if matches!(envelope.event, TurnEvent::TurnFinished { status: TurnStatus::Ok }) {
                saw_terminal = true;
                break;
            }
        }
        assert!(saw_terminal);

        let messages = store.list_messages(&session_id, None, None).await.unwrap();
        assert!(messages.iter().any(|m| m.role == MessageRole::User && m.text == "hello"));
        assert!(messages.iter().any(|m| m.role == MessageRole::Assistant && m.text == "hi there"));
    }

    #[tokio::test]
    async fn concurrent_submission_is_rejected_as_busy() {
        let model = ScriptedMockModel::new(vec![vec![ResponseEvent::Done]]);
        let (runtime, _store) = test_runtime(model);
        let session_id = runtime.new_session().await.unwrap();

        let lock = runtime.lock_for(&session_id).await;
        let _held = lock.try_lock_owned().unwrap();

        let result = runtime.submit_turn(&session_id, "hello", None).await;
        assert!(matches!(result, Err(RuntimeError::Busy)));
    }

    #[tokio::test]
    async fn tool_loop_cap_triggers_after_max_iterations() {
        let scripts = (0..5)
            .map(|_| vec![ResponseEvent::ToolCall(pith_model::ToolCallRequest {
                id: "1".into(),
                name: "memory_save".into(),
                args: serde_json::json!({"text": "x", "kind": "episodic"}),
            })])
            .collect();
        let model = ScriptedMockModel::new(scripts);
        let (runtime, _store) = test_runtime(model);
        let session_id = runtime.new_session().await.unwrap();

        let mut sub = runtime.submit_turn(&session_id, "keep calling tools", None).await.unwrap();
        let mut status = None;
        while let Some(envelope) = sub.next().await {
            if let TurnEvent::TurnFinished { status: s } = envelope.event {
                status = Some(s);
                break;
            }
        }
        assert!(matches!(status, Some(TurnStatus::ToolLoopCap)));
    }

    #[tokio::test]
    async fn slash_new_allocates_a_fresh_session() {
        let model = ScriptedMockModel::new(vec![]);
        let (runtime, store) = test_runtime(model);
        let session_id = runtime.new_session().await.unwrap();

        let mut sub = runtime.submit_turn(&session_id, "/new", None).await.unwrap();
        let mut saw_ok = false;
        while let Some(envelope) = sub.next().await {
            if matches!(envelope.event, TurnEvent::TurnFinished { status: TurnStatus::Ok }) {
                saw_ok = true;
                break;
            }
        }
        assert!(saw_ok);
        // the slash command itself is not persisted as a conversation message
        let messages = store.list_messages(&session_id, None, None).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn slash_info_reports_status_without_calling_the_model() {
        let model = ScriptedMockModel::new(vec![]);
        let (runtime, _store) = test_runtime(model);
        let session_id = runtime.new_session().await.unwrap();

        let mut sub = runtime.submit_turn(&session_id, "/info", None).await.unwrap();
        let mut saw_assistant = false;
        while let Some(envelope) = sub.next().await {
            if let TurnEvent::AssistantMessage { text, .. } = &envelope.event {
                assert!(text.contains(&session_id));
                saw_assistant = true;
            }
            if matches!(envelope.event, TurnEvent::TurnFinished { .. }) {
                break;
            }
        }
        assert!(saw_assistant);
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl pith_tools::Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps longer than the turn deadline"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn deadline(&self) -> Option<Duration> {
            Some(Duration::from_secs(5))
        }
        async fn execute(&self, call: &ToolCall) -> pith_tools::ToolOutput {
            tokio::time::sleep(Duration::from_secs(2)).await;
            pith_tools::ToolOutput::ok(&call.id, "done")
        }
    }

    #[tokio::test]
    async fn turn_deadline_mid_tool_call_backfills_a_synthetic_tool_result() {
        let model = ScriptedMockModel::new(vec![vec![ResponseEvent::ToolCall(pith_model::ToolCallRequest {
            id: "1".into(),
            name: "slow".into(),
            args: serde_json::json!({}),
        })]]);
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut registry = ToolRegistry::new();
        registry.register_builtin(SlowTool);
        let tools = Arc::new(registry);
        let bus = Arc::new(EventBus::new());
        let workspace = tempdir().unwrap().into_path();
        let runtime = Arc::new(Runtime::new(
            store.clone(),
            tools,
            Arc::new(model),
            bus,
            workspace,
            ContextConfig::default(),
            TurnConfig { max_tool_iterations: 3, deadline_seconds: 30 },
        ));
        let session_id = runtime.new_session().await.unwrap();

        let mut sub = runtime
            .submit_turn(&session_id, "run the slow tool", Some(Duration::from_millis(200)))
            .await
            .unwrap();

        let mut saw_tool_finished = false;
        let mut status = None;
        while let Some(envelope) = sub.next().await {
            match envelope.event {
                TurnEvent::ToolCallFinished { ref name, ok, .. } if name == "slow" => {
                    assert!(!ok);
                    saw_tool_finished = true;
                }
                TurnEvent::TurnFinished { status: s } => {
                    status = Some(s);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_tool_finished, "expected a synthetic tool_call_finished(slow, ok=false)");
        assert!(matches!(status, Some(TurnStatus::Timeout)));

        let messages = store.list_messages(&session_id, None, None).await.unwrap();
        let request = messages.iter().find(|m| m.role == MessageRole::ToolRequest && m.tool_name.as_deref() == Some("slow"));
        assert!(request.is_some(), "tool_request for 'slow' should have been persisted");
        let result = messages.iter().find(|m| m.role == MessageRole::ToolResult && m.tool_name.as_deref() == Some("slow"));
        let result = result.expect("orphaned tool_request should have a backfilled tool_result");
        assert_eq!(result.tool_result.as_ref().unwrap()["is_error"], true);
    }
}
