use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use pith_config::ContextConfig;
use pith_model::Message;
use pith_store::{MessageRole, Store};
use thiserror::Error;

use crate::prompts;

/// Lower bound the Context Assembler will not shrink the recent window
/// below while still trying to fit the budget (step 5's shrink order).
const MIN_WINDOW_MESSAGES: usize = 4;

const PERSONA_FILE: &str = "SOUL.md";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("store error: {0}")]
    Store(#[from] pith_store::StoreError),
    #[error("assembled context exceeds the configured token budget even at minimum size")]
    Overflow,
}

/// Output of [`ContextAssembler::assemble`]: a system prompt plus an
/// ordered list of context frames, ready to hand to the Model alongside
/// tool schemas from the registry.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

impl AssembledContext {
    fn approx_tokens(&self) -> usize {
        self.system_prompt.len() / 4 + self.messages.iter().map(|m| m.approx_tokens()).sum::<usize>()
    }
}

/// Builds per-turn prompt inputs from the Store, the persona file, and
/// retrieved memory, per the six-step algorithm.
pub struct ContextAssembler {
    store: Arc<Store>,
}

impl ContextAssembler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn assemble(
        &self,
        session_id: &str,
        user_text: &str,
        workspace_path: &Path,
        config: &ContextConfig,
    ) -> Result<AssembledContext, ContextError> {
        let bootstrap_complete = self.store.bootstrap_complete().await?;
        let agent = self.store.get_agent_profile().await?;
        let user = self.store.get_user_profile().await?;
        let system_prompt = prompts::select_system_prompt(bootstrap_complete, &agent, &user).to_string();

        let mut frames = Vec::new();

        if let Some(persona) = read_persona(workspace_path) {
            frames.push(Message::system(format!("Persona:\n{persona}")));
        }
        frames.push(Message::system(prompts::render_profile_summary(&agent, &user)));

        let summaries = self.store.list_summaries(session_id).await?;

        let mut window = config.window_messages.max(MIN_WINDOW_MESSAGES);
        let mut k = config.memory_top_k;
        loop {
            let mut candidate = frames.clone();
            candidate.extend(self.memory_frames(user_text, k).await?);
            candidate.extend(self.window_frames(session_id, window, &summaries).await?);
            candidate.push(Message::user(user_text));

            let assembled = AssembledContext { system_prompt: system_prompt.clone(), messages: candidate };
            let tokens = assembled.approx_tokens();
            let at_minimum = window <= MIN_WINDOW_MESSAGES && k == 0;

            if tokens <= config.max_prompt_tokens || at_minimum {
                if tokens > config.max_prompt_tokens && at_minimum {
                    return Err(ContextError::Overflow);
                }
                return Ok(assembled);
            }

            if window > MIN_WINDOW_MESSAGES {
                window = (window / 2).max(MIN_WINDOW_MESSAGES);
            } else if k > 0 {
                k -= 1;
            }
        }
    }

    async fn memory_frames(&self, user_text: &str, k: usize) -> Result<Vec<Message>, ContextError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = self.store.search_memory(user_text, k).await?;
        let mut seen = HashSet::new();
        let mut frames = Vec::new();
        for hit in hits {
            if seen.insert(hit.entry.id) {
                let source = hit.entry.source.clone().unwrap_or_else(|| "unknown".to_string());
                frames.push(Message::system(format!(
                    "Memory #{} [{}] (source: {}): {}",
                    hit.entry.id,
                    hit.entry.kind.as_str(),
                    source,
                    hit.entry.text
                )));
            }
        }
        Ok(frames)
    }

    async fn window_frames(
        &self,
        session_id: &str,
        window: usize,
        summaries: &[pith_store::SessionSummary],
    ) -> Result<Vec<Message>, ContextError> {
        let recent = self.store.list_messages(session_id, None, Some(window as i64)).await?;
        let earliest_id = recent.first().map(|m| m.id).unwrap_or(i64::MAX);

        let mut frames: Vec<Message> = summaries
            .iter()
            .filter(|s| s.to_msg_id < earliest_id)
            .map(|s| Message::system(format!("Prior session summary (messages {}-{}): {}", s.from_msg_id, s.to_msg_id, s.summary_text)))
            .collect();

        frames.extend(recent.iter().map(render_history_message));
        Ok(frames)
    }
}

pub(crate) fn render_history_message(msg: &pith_store::Message) -> Message {
    match msg.role {
        MessageRole::User => Message::user(msg.text.as_str()),
        MessageRole::Assistant => Message::assistant(msg.text.as_str()),
        MessageRole::ToolRequest => Message::system(format!(
            "[tool_request {}] {}",
            msg.tool_name.clone().unwrap_or_default(),
            msg.tool_args.clone().map(|v| v.to_string()).unwrap_or_default()
        )),
        MessageRole::ToolResult => Message::system(format!(
            "[tool_result {}] {}",
            msg.tool_name.clone().unwrap_or_default(),
            msg.tool_result.clone().map(|v| v.to_string()).unwrap_or_default()
        )),
        MessageRole::SystemInjected => Message::system(msg.text.as_str()),
    }
}

fn read_persona(workspace_path: &Path) -> Option<String> {
    std::fs::read_to_string(workspace_path.join(PERSONA_FILE)).ok()
}
