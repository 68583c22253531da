//! In-process fakes for the classifier, responder and chat transport.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

use crate::classifier::Classifier;
use crate::error::{HatewatchError, Result};
use crate::executor::ActionExecutor;
use crate::models::{Classification, IncomingMessage};
use crate::responder::{Prompt, Responder};

pub const TEST_GUILD: u64 = 500;
pub const TEST_CHANNEL: u64 = 600;

/// A guild message from `user_id`.
pub fn message_from(user_id: u64, name: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        guild_id: Some(GuildId::new(TEST_GUILD)),
        channel_id: ChannelId::new(TEST_CHANNEL),
        message_id: MessageId::new(1000 + user_id),
        author_id: UserId::new(user_id),
        author_name: name.to_string(),
        content: content.to_string(),
        received_at: Utc::now(),
    }
}

/// Replies with the user prompt it was given.
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        Ok(prompt.user_prompt.clone())
    }
}

/// Always fails.
pub struct FailingResponder;

#[async_trait]
impl Responder for FailingResponder {
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        Err(HatewatchError::Generation("service unavailable".to_string()))
    }
}

/// Labels a fixed set of texts as hate, records every text it sees.
#[derive(Default)]
pub struct ScriptedClassifier {
    hateful: HashSet<String>,
    broken: bool,
    unscored: bool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn with_hateful(texts: &[&str]) -> Self {
        Self {
            hateful: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Reports labels without a confidence score.
    pub fn unscored(mut self) -> Self {
        self.unscored = true;
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        self.seen.lock().unwrap().push(text.to_string());
        if self.broken {
            return Err(HatewatchError::Classifier("model offline".to_string()));
        }
        let score = if self.unscored { None } else { Some(0.95) };
        if self.hateful.contains(text) {
            Ok(Classification::hate(score))
        } else {
            Ok(Classification::not_hate(score))
        }
    }
}

/// Transport call observed by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    Send(String),
    Delete,
    Remove(u64),
}

/// Records calls in order; individual operations can be made to fail.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
    fail_send: AtomicBool,
    fail_delete: AtomicBool,
    fail_remove: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_send(self) -> Self {
        self.fail_send.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_delete(self) -> Self {
        self.fail_delete.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_remove(self) -> Self {
        self.set_remove_failing(true);
        self
    }

    pub fn set_remove_failing(&self, failing: bool) {
        self.fail_remove.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: ExecutorCall, fail: &AtomicBool) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if fail.load(Ordering::SeqCst) {
            Err(HatewatchError::InternalState("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn send_text(&self, _channel_id: ChannelId, content: &str) -> Result<()> {
        self.record(ExecutorCall::Send(content.to_string()), &self.fail_send)
    }

    async fn delete_message(&self, _channel_id: ChannelId, _message_id: MessageId) -> Result<()> {
        self.record(ExecutorCall::Delete, &self.fail_delete)
    }

    async fn remove_user(&self, _guild_id: GuildId, user_id: UserId) -> Result<()> {
        self.record(ExecutorCall::Remove(user_id.get()), &self.fail_remove)
    }
}
