//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::openai::{ChatClient, ChatCompletion, ChatError, ChatRequest};

/// Replays canned replies in order and records every request it receives
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    fallback: Option<String>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<&str, ChatError>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with the same text
    pub fn always(content: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(content.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ChatRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

pub fn transport_error() -> ChatError {
    ChatError::Transport("connection reset by peer".to_string())
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn model(&self) -> &str {
        "test-model"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone().map(Ok))
            .unwrap_or_else(|| Err(ChatError::Transport("script exhausted".to_string())))?;

        let id = format!("chatcmpl-test-{}", index);
        Ok(ChatCompletion {
            raw: serde_json::json!({
                "id": id,
                "choices": [{"message": {"role": "assistant", "content": reply}}]
            }),
            id,
            content: reply,
        })
    }
}
