//! Ordered execution of moderation plans.
//!
//! Actions run one at a time in plan order. Each action's follow-ups run
//! before the next action starts. A failed action never stops the rest of
//! the plan.

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

use crate::error::{HatewatchError, Result};
use crate::models::{hash_content, IncomingMessage};
use crate::policy::{FollowUp, ModerationAction, PlannedAction};
use crate::tracker::OffenseTracker;

/// Chat transport operations needed by the moderation core.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn send_text(&self, channel_id: ChannelId, content: &str) -> Result<()>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;

    /// Ban then immediately unban.
    async fn remove_user(&self, guild_id: GuildId, user_id: UserId) -> Result<()>;
}

/// How an attempted action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    Failed(String),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One attempted action, in the order it was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedAction {
    pub action: ModerationAction,
    pub outcome: ActionOutcome,
}

/// Everything that happened while executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: Vec<ExecutedAction>,
    /// Whether the author's offense count was reset.
    pub offenses_reset: bool,
}

impl ExecutionReport {
    /// Actions attempted, follow-up announcements included.
    pub fn actions(&self) -> Vec<ModerationAction> {
        self.executed.iter().map(|e| e.action.clone()).collect()
    }

    /// Outcome of the first attempted action matching `predicate`.
    pub fn outcome_of(
        &self,
        predicate: impl Fn(&ModerationAction) -> bool,
    ) -> Option<&ActionOutcome> {
        self.executed
            .iter()
            .find(|e| predicate(&e.action))
            .map(|e| &e.outcome)
    }
}

/// Run `plan` against `message` in order.
pub async fn execute_plan(
    executor: &dyn ActionExecutor,
    tracker: &OffenseTracker,
    message: &IncomingMessage,
    plan: Vec<PlannedAction>,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for planned in plan {
        let outcome = run_action(executor, message, &planned.action).await;
        let succeeded = outcome.is_success();
        let failure_reason = match &outcome {
            ActionOutcome::Failed(reason) => Some(reason.clone()),
            ActionOutcome::Succeeded => None,
        };

        report.executed.push(ExecutedAction {
            action: planned.action,
            outcome,
        });

        let follow_ups = if succeeded {
            planned.on_success
        } else {
            planned.on_failure
        };

        for follow_up in follow_ups {
            match follow_up {
                FollowUp::Announce(text) => {
                    announce(executor, message, text, &mut report).await;
                }
                FollowUp::ReportFailure(prefix) => {
                    let reason = failure_reason.as_deref().unwrap_or("unknown error");
                    let text = format!("{} Error: {}", prefix, reason);
                    announce(executor, message, text, &mut report).await;
                }
                FollowUp::ResetOffenses => {
                    tracker.reset(message.author_id);
                    report.offenses_reset = true;
                    tracing::info!(user_id = %message.author_id, "Offense count reset");
                }
            }
        }
    }

    report
}

async fn announce(
    executor: &dyn ActionExecutor,
    message: &IncomingMessage,
    text: String,
    report: &mut ExecutionReport,
) {
    let action = ModerationAction::SendText(text);
    let outcome = run_action(executor, message, &action).await;
    report.executed.push(ExecutedAction { action, outcome });
}

async fn run_action(
    executor: &dyn ActionExecutor,
    message: &IncomingMessage,
    action: &ModerationAction,
) -> ActionOutcome {
    let (operation, result) = match action {
        ModerationAction::SendText(text) => (
            "send_text",
            executor.send_text(message.channel_id, text).await,
        ),
        ModerationAction::DeleteMessage => {
            let result = executor
                .delete_message(message.channel_id, message.message_id)
                .await;
            if result.is_ok() {
                tracing::info!(
                    message_id = %message.message_id,
                    user_name = %message.author_name,
                    content_hash = %hash_content(&message.content),
                    "Deleted hate message"
                );
            }
            ("delete_message", result)
        }
        ModerationAction::RemoveUser(user_id) => {
            let result = match message.guild_id {
                Some(guild_id) => executor.remove_user(guild_id, *user_id).await,
                None => Err(HatewatchError::InternalState(
                    "cannot remove a user outside a guild".to_string(),
                )),
            };
            if result.is_ok() {
                tracing::info!(user_id = %user_id, "User removed from guild");
            }
            ("remove_user", result)
        }
    };

    match result {
        Ok(()) => ActionOutcome::Succeeded,
        Err(e) => {
            e.log_with_context(&message.error_context(operation));
            ActionOutcome::Failed(e.to_string())
        }
    }
}
