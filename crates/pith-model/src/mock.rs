use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::ResponseStream, CompletionRequest, Model, ResponseEvent, Role};

/// Deterministic mock model for tests. Echoes the last user message back as
/// the assistant response.
#[derive(Default)]
pub struct MockModel;

#[async_trait]
impl Model for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.text.clone())
            .unwrap_or_else(|| "[no input]".to_string());

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta { text: format!("MOCK: {reply}") }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock model. Each call to `complete` pops the next
/// response script from the front of the queue, letting tests specify
/// exact event sequences — including tool calls — without network access.
pub struct ScriptedMockModel {
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    name: String,
    /// The last `CompletionRequest` seen by this model, for test assertions.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedMockModel {
    /// Build a model from a list of response scripts. The outer `Vec` is
    /// the ordered list of calls; the inner `Vec` is the sequence of
    /// [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            name: "scripted-mock".into(),
            last_request: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl Model for ScriptedMockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        *self.last_request.lock().unwrap() = Some(req);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop()
            .map(|mut s| {
                s.reverse();
                s
            })
            .unwrap_or_else(|| vec![ResponseEvent::Done]);
        let events: Vec<anyhow::Result<ResponseEvent>> =
            script.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(events)))
    }
}
