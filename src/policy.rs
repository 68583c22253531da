//! Escalating moderation policy.
//!
//! Turns a classified message into an ordered plan of chat actions. The only
//! state is the sender's offense count:
//!
//! ```text
//!   count k ──hate──▶ count k+1        reply + ✨ + delete (+ notice)
//!                      k+1 == 3         + final warning
//!                      k+1 == 4         + remove user ──ok──▶ count 0
//!                                                     └─err─▶ count stays 4
//! ```
//!
//! A failed removal leaves the user at 4. Later offenses count 5, 6, ...
//! and never match a threshold again, so removal is not retried.

use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::UserId;

use crate::models::{Classification, IncomingMessage};
use crate::responder::{reply_or_fallback, Prompt, PromptTemplate, Responder};
use crate::tracker::OffenseTracker;

/// Offense count at which the author is warned about removal.
pub const FINAL_WARNING_AT: u32 = 3;

/// Offense count at which the author is removed.
pub const REMOVAL_AT: u32 = 4;

/// Acknowledgment posted after every admonishing reply.
pub const ACK_MARK: &str = "✨";

/// Warning posted when the final-warning threshold is reached.
pub const FINAL_WARNING_TEXT: &str =
    "‼️ You will be banned for sending hate speech if it happens again. 😡";

/// A chat-side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    SendText(String),
    /// Delete the message being moderated.
    DeleteMessage,
    /// Ban then immediately unban (a kick).
    RemoveUser(UserId),
}

/// Work that depends on the outcome of the action it is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Post this text.
    Announce(String),
    /// Reset the author's offense count.
    ResetOffenses,
    /// Post `"{prefix} Error: {reason}"`.
    ReportFailure(String),
}

/// An action plus what to do after it succeeds or fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub action: ModerationAction,
    pub on_success: Vec<FollowUp>,
    pub on_failure: Vec<FollowUp>,
}

impl PlannedAction {
    pub fn new(action: ModerationAction) -> Self {
        Self {
            action,
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    pub fn send(text: impl Into<String>) -> Self {
        Self::new(ModerationAction::SendText(text.into()))
    }

    pub fn on_success(mut self, follow_up: FollowUp) -> Self {
        self.on_success.push(follow_up);
        self
    }

    pub fn on_failure(mut self, follow_up: FollowUp) -> Self {
        self.on_failure.push(follow_up);
        self
    }
}

/// Extra step triggered by a specific offense count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    None,
    FinalWarning,
    Removal,
}

impl Escalation {
    /// Thresholds match exactly; counts past removal escalate no further.
    ///
    /// ```
    /// use hatewatch::policy::Escalation;
    ///
    /// assert_eq!(Escalation::for_count(2), Escalation::None);
    /// assert_eq!(Escalation::for_count(3), Escalation::FinalWarning);
    /// assert_eq!(Escalation::for_count(4), Escalation::Removal);
    /// assert_eq!(Escalation::for_count(5), Escalation::None);
    /// ```
    pub fn for_count(count: u32) -> Self {
        match count {
            FINAL_WARNING_AT => Self::FinalWarning,
            REMOVAL_AT => Self::Removal,
            _ => Self::None,
        }
    }
}

/// What the policy decided for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub plan: Vec<PlannedAction>,
    /// Post-increment count for hate messages, `None` otherwise.
    pub offense_count: Option<u32>,
    /// Whether the reply is fallback text from a failed generation.
    pub generation_failed: bool,
}

impl Decision {
    fn nothing() -> Self {
        Self {
            plan: Vec::new(),
            offense_count: None,
            generation_failed: false,
        }
    }

    pub fn actions(&self) -> impl Iterator<Item = &ModerationAction> {
        self.plan.iter().map(|p| &p.action)
    }
}

/// Decides the response to each classified message.
pub struct ModerationPolicy {
    tracker: Arc<OffenseTracker>,
    responder: Arc<dyn Responder>,
    generation_timeout: Duration,
}

impl ModerationPolicy {
    pub fn new(
        tracker: Arc<OffenseTracker>,
        responder: Arc<dyn Responder>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            responder,
            generation_timeout,
        }
    }

    /// Decide what to do about `message`.
    ///
    /// Hate messages increment the author's count before anything else is
    /// decided. Callers must hold the author's [`OffenseTracker::lock_user`]
    /// guard until the plan has been executed.
    pub async fn decide(
        &self,
        message: &IncomingMessage,
        classification: &Classification,
    ) -> Decision {
        if classification.is_hate() {
            self.decide_hate(message).await
        } else {
            self.decide_clean(message).await
        }
    }

    async fn decide_clean(&self, message: &IncomingMessage) -> Decision {
        let addressed = message.addressed();
        if !addressed.to_bot {
            return Decision::nothing();
        }

        let prompt = Prompt::new(PromptTemplate::Conversation, addressed.text);
        let reply =
            reply_or_fallback(self.responder.as_ref(), &prompt, self.generation_timeout).await;
        let generation_failed = reply.is_fallback();

        Decision {
            plan: vec![PlannedAction::send(reply.into_string())],
            offense_count: None,
            generation_failed,
        }
    }

    async fn decide_hate(&self, message: &IncomingMessage) -> Decision {
        let count = self.tracker.increment(message.author_id);

        tracing::info!(
            user_id = %message.author_id,
            user_name = %message.author_name,
            offense_count = count,
            "Hate message counted"
        );

        let prompt = Prompt::new(PromptTemplate::Admonish, &message.content);
        let reply =
            reply_or_fallback(self.responder.as_ref(), &prompt, self.generation_timeout).await;
        let generation_failed = reply.is_fallback();

        let mut plan = vec![
            PlannedAction::send(reply.into_string()),
            PlannedAction::send(ACK_MARK),
        ];

        match Escalation::for_count(count) {
            Escalation::FinalWarning => plan.push(PlannedAction::send(FINAL_WARNING_TEXT)),
            Escalation::Removal => plan.push(
                PlannedAction::new(ModerationAction::RemoveUser(message.author_id))
                    .on_success(FollowUp::Announce(format!(
                        "User {} has been kicked from the group.",
                        message.author_name
                    )))
                    .on_success(FollowUp::ResetOffenses)
                    .on_failure(FollowUp::ReportFailure(format!(
                        "Failed to kick user {}.",
                        message.author_id
                    ))),
            ),
            Escalation::None if count > REMOVAL_AT => {
                tracing::warn!(
                    user_id = %message.author_id,
                    offense_count = count,
                    "Offense count is past the removal threshold after a failed removal; no further escalation"
                );
            }
            Escalation::None => {}
        }

        plan.push(
            PlannedAction::new(ModerationAction::DeleteMessage).on_success(FollowUp::Announce(
                format!(
                    "{}, your message was deleted due to prohibited content.",
                    message.author_name
                ),
            )),
        );

        Decision {
            plan,
            offense_count: Some(count),
            generation_failed,
        }
    }
}
