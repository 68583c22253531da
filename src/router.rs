//! Message routing.
//!
//! Commands are answered directly. Everything else is classified, run
//! through the moderation policy and executed, one user at a time.

use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{classify_or_fail_open, Classifier};
use crate::commands::Command;
use crate::error::Result;
use crate::executor::{execute_plan, ActionExecutor, ExecutionReport};
use crate::metrics::ModerationMetrics;
use crate::models::{hash_content, Classification, IncomingMessage};
use crate::policy::ModerationPolicy;
use crate::tracker::OffenseTracker;

/// What the router did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A known command was answered.
    Command(Command),
    /// The message went through moderation.
    Moderated {
        classification: Classification,
        offense_count: Option<u32>,
        report: ExecutionReport,
    },
}

/// Routes inbound messages to commands or the moderation pipeline.
pub struct MessageRouter {
    classifier: Arc<dyn Classifier>,
    policy: ModerationPolicy,
    executor: Arc<dyn ActionExecutor>,
    tracker: Arc<OffenseTracker>,
    metrics: Arc<ModerationMetrics>,
    classifier_timeout: Duration,
}

impl MessageRouter {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        policy: ModerationPolicy,
        executor: Arc<dyn ActionExecutor>,
        tracker: Arc<OffenseTracker>,
        metrics: Arc<ModerationMetrics>,
        classifier_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            policy,
            executor,
            tracker,
            metrics,
            classifier_timeout,
        }
    }

    /// Route one message to completion.
    pub async fn route(&self, message: &IncomingMessage) -> Result<RouteOutcome> {
        let Some(command) = Command::parse_text(&message.content) else {
            return Ok(self.moderate(message).await);
        };

        self.metrics.record_command();
        let reply = command.reply(message.author_id, &message.author_name, &self.tracker);
        self.executor.send_text(message.channel_id, &reply).await?;
        tracing::debug!(command = command.name(), user_id = %message.author_id, "Command handled");
        Ok(RouteOutcome::Command(command))
    }

    /// Classify, decide and execute while holding the author's guard.
    async fn moderate(&self, message: &IncomingMessage) -> RouteOutcome {
        let _guard = self.tracker.lock_user(message.author_id).await;
        tracing::debug!(
            message_id = %message.message_id,
            queued_ms = message.age().as_millis() as u64,
            "Moderating message"
        );

        self.metrics.record_message();

        let addressed = message.addressed();
        let outcome =
            classify_or_fail_open(self.classifier.as_ref(), addressed.text, self.classifier_timeout)
                .await;
        if outcome.is_failed_open() {
            self.metrics.record_classifier_failure();
        }
        let classification = outcome.into_classification();
        if classification.is_hate() {
            self.metrics.record_hate();
            tracing::info!(
                message_id = %message.message_id,
                user_id = %message.author_id,
                content_hash = %hash_content(&message.content),
                score = ?classification.score,
                "Hate speech detected"
            );
        }

        let decision = self.policy.decide(message, &classification).await;
        if decision.generation_failed {
            self.metrics.record_generation_failure();
        }

        let report = execute_plan(
            self.executor.as_ref(),
            &self.tracker,
            message,
            decision.plan,
        )
        .await;
        self.metrics.record_execution(&report);

        RouteOutcome::Moderated {
            classification,
            offense_count: decision.offense_count,
            report,
        }
    }

    /// Route and log any error instead of returning it.
    pub async fn handle(&self, message: &IncomingMessage) {
        if let Err(e) = self.route(message).await {
            e.log_with_context(&message.error_context("route_message"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serenity::model::id::UserId;

    use crate::commands::{Command, HELP_TEXT};
    use crate::executor::ExecutionReport;
    use crate::metrics::ModerationMetrics;
    use crate::policy::{ModerationAction, ModerationPolicy, ACK_MARK, FINAL_WARNING_TEXT};
    use crate::router::{MessageRouter, RouteOutcome};
    use crate::test_support::{
        message_from, EchoResponder, ExecutorCall, RecordingExecutor, ScriptedClassifier,
    };
    use crate::tracker::OffenseTracker;

    const HATEFUL: &str = "I hate you people";

    struct Harness {
        router: MessageRouter,
        classifier: Arc<ScriptedClassifier>,
        executor: Arc<RecordingExecutor>,
        tracker: Arc<OffenseTracker>,
        metrics: Arc<ModerationMetrics>,
    }

    fn harness_with(classifier: ScriptedClassifier, executor: RecordingExecutor) -> Harness {
        let classifier = Arc::new(classifier);
        let executor = Arc::new(executor);
        let tracker = Arc::new(OffenseTracker::new());
        let metrics = Arc::new(ModerationMetrics::new());
        let policy = ModerationPolicy::new(
            tracker.clone(),
            Arc::new(EchoResponder),
            Duration::from_secs(1),
        );
        let router = MessageRouter::new(
            classifier.clone(),
            policy,
            executor.clone(),
            tracker.clone(),
            metrics.clone(),
            Duration::from_secs(1),
        );
        Harness {
            router,
            classifier,
            executor,
            tracker,
            metrics,
        }
    }

    fn harness() -> Harness {
        harness_with(
            ScriptedClassifier::with_hateful(&[HATEFUL]),
            RecordingExecutor::new(),
        )
    }

    fn report_of(outcome: RouteOutcome) -> ExecutionReport {
        match outcome {
            RouteOutcome::Moderated { report, .. } => report,
            other => panic!("expected moderation, got {:?}", other),
        }
    }

    fn admonish(text: &str) -> String {
        format!(
            "Someone said this in a groupchat: {}. Please answer creatively and remind them that hate speech will not be tolerated.",
            text
        )
    }

    #[tokio::test]
    async fn first_hate_message_yields_reply_ack_delete_notice() {
        let h = harness();

        let outcome = h
            .router
            .route(&message_from(1, "alice", HATEFUL))
            .await
            .unwrap();

        let report = report_of(outcome);
        assert_eq!(
            report.actions(),
            vec![
                ModerationAction::SendText(admonish(HATEFUL)),
                ModerationAction::SendText(ACK_MARK.to_string()),
                ModerationAction::DeleteMessage,
                ModerationAction::SendText(
                    "alice, your message was deleted due to prohibited content.".to_string()
                ),
            ]
        );
        assert_eq!(h.tracker.get(UserId::new(1)), 1);
    }

    #[tokio::test]
    async fn four_hate_messages_escalate_to_removal_and_reset() {
        let h = harness();
        let message = message_from(1, "alice", HATEFUL);

        let mut reports = Vec::new();
        for _ in 0..4 {
            reports.push(report_of(h.router.route(&message).await.unwrap()));
        }

        for report in &reports[..2] {
            assert_eq!(report.executed.len(), 4);
            assert!(!report.actions().contains(&ModerationAction::SendText(
                FINAL_WARNING_TEXT.to_string()
            )));
        }
        assert_eq!(
            reports[2].actions()[2],
            ModerationAction::SendText(FINAL_WARNING_TEXT.to_string())
        );
        assert_eq!(
            &reports[3].actions()[2..4],
            &[
                ModerationAction::RemoveUser(UserId::new(1)),
                ModerationAction::SendText("User alice has been kicked from the group.".to_string()),
            ]
        );
        assert!(reports[3].offenses_reset);
        assert_eq!(h.tracker.get(UserId::new(1)), 0);
        assert_eq!(h.metrics.snapshot().removals, 1);
    }

    #[tokio::test]
    async fn failed_removal_sticks_at_four_then_five_without_threshold() {
        let h = harness_with(
            ScriptedClassifier::with_hateful(&[HATEFUL]),
            RecordingExecutor::new().failing_remove(),
        );
        let message = message_from(1, "alice", HATEFUL);

        for _ in 0..4 {
            h.router.route(&message).await.unwrap();
        }
        assert_eq!(h.tracker.get(UserId::new(1)), 4);
        assert!(h.executor.calls().iter().any(|c| matches!(
            c,
            ExecutorCall::Send(text) if text.starts_with("Failed to kick user 1. Error: ")
        )));

        h.executor.clear();
        h.executor.set_remove_failing(false);
        let outcome = h.router.route(&message).await.unwrap();

        match outcome {
            RouteOutcome::Moderated { offense_count, report, .. } => {
                assert_eq!(offense_count, Some(5));
                assert!(!report
                    .actions()
                    .iter()
                    .any(|a| matches!(a, ModerationAction::RemoveUser(_))));
                assert_eq!(report.executed.len(), 4);
            }
            other => panic!("expected moderation, got {:?}", other),
        }
        assert_eq!(h.metrics.snapshot().removal_failures, 1);
    }

    #[tokio::test]
    async fn addressed_message_is_stripped_before_classification_and_reply() {
        let h = harness();

        let outcome = h
            .router
            .route(&message_from(2, "bob", "bot hello"))
            .await
            .unwrap();

        assert_eq!(h.classifier.seen(), vec!["hello".to_string()]);
        assert_eq!(
            report_of(outcome).actions(),
            vec![ModerationAction::SendText("hello".to_string())]
        );
    }

    #[tokio::test]
    async fn plain_clean_message_triggers_nothing() {
        let h = harness();

        let outcome = h
            .router
            .route(&message_from(2, "bob", "hello"))
            .await
            .unwrap();

        assert!(report_of(outcome).executed.is_empty());
        assert!(h.executor.calls().is_empty());
        assert_eq!(h.tracker.tracked_users(), 0);
    }

    #[tokio::test]
    async fn addressed_hate_is_classified_without_prefix() {
        let h = harness();

        h.router
            .route(&message_from(3, "carol", &format!("bot {}", HATEFUL)))
            .await
            .unwrap();

        assert_eq!(h.classifier.seen(), vec![HATEFUL.to_string()]);
        assert_eq!(h.tracker.get(UserId::new(3)), 1);
    }

    #[tokio::test]
    async fn classifier_outage_fails_open() {
        let h = harness_with(ScriptedClassifier::broken(), RecordingExecutor::new());

        let outcome = h
            .router
            .route(&message_from(4, "dave", HATEFUL))
            .await
            .unwrap();

        assert!(report_of(outcome).executed.is_empty());
        assert_eq!(h.tracker.get(UserId::new(4)), 0);
        assert_eq!(h.metrics.snapshot().classifier_failures, 1);
    }

    #[tokio::test]
    async fn unscored_clean_result_is_not_a_classifier_failure() {
        let h = harness_with(
            ScriptedClassifier::with_hateful(&[HATEFUL]).unscored(),
            RecordingExecutor::new(),
        );

        h.router
            .route(&message_from(4, "dave", "hello"))
            .await
            .unwrap();

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.messages_processed, 1);
        assert_eq!(snapshot.classifier_failures, 0);
    }

    #[tokio::test]
    async fn commands_bypass_moderation() {
        let h = harness();
        h.tracker.increment(UserId::new(5));

        let outcome = h
            .router
            .route(&message_from(5, "erin", "/hatecount"))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::Command(Command::HateCount));
        assert!(h.classifier.seen().is_empty());
        assert_eq!(
            h.executor.calls(),
            vec![ExecutorCall::Send(
                "erin, you have sent 1 hate messages.".to_string()
            )]
        );
        assert_eq!(h.tracker.get(UserId::new(5)), 1);
    }

    #[tokio::test]
    async fn help_is_answered_without_classification() {
        let h = harness();

        let help = h
            .router
            .route(&message_from(6, "finn", "/help"))
            .await
            .unwrap();

        assert_eq!(help, RouteOutcome::Command(Command::Help));
        assert_eq!(
            h.executor.calls(),
            vec![ExecutorCall::Send(HELP_TEXT.to_string())]
        );
        assert!(h.classifier.seen().is_empty());
        assert_eq!(h.metrics.snapshot().commands_handled, 1);
    }

    #[tokio::test]
    async fn slash_prefixed_text_is_still_moderated() {
        let disguised = [
            "/ I hate you people",
            "/",
            "/!!! I hate you people",
            "/ünïcode hate",
            "/hate everyone",
            "/help I hate you people",
        ];
        let h = harness_with(
            ScriptedClassifier::with_hateful(&disguised),
            RecordingExecutor::new(),
        );

        for (i, text) in disguised.iter().enumerate() {
            let outcome = h
                .router
                .route(&message_from(20 + i as u64, "hal", text))
                .await
                .unwrap();

            match outcome {
                RouteOutcome::Moderated { classification, offense_count, .. } => {
                    assert!(classification.is_hate(), "{:?} was not classified", text);
                    assert_eq!(offense_count, Some(1));
                }
                other => panic!("{:?} bypassed moderation: {:?}", text, other),
            }
        }

        let seen: Vec<String> = disguised.iter().map(|t| t.to_string()).collect();
        assert_eq!(h.classifier.seen(), seen);
        assert_eq!(h.tracker.tracked_users(), disguised.len());
        assert_eq!(h.metrics.snapshot().commands_handled, 0);
    }

    #[tokio::test]
    async fn concurrent_hate_from_one_user_is_serialized() {
        let h = Arc::new(harness());
        let message = message_from(7, "gus", HATEFUL);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let h = h.clone();
                let message = message.clone();
                tokio::spawn(async move { h.router.route(&message).await.unwrap() })
            })
            .collect();

        let mut counts = Vec::new();
        for task in tasks {
            if let RouteOutcome::Moderated { offense_count, .. } = task.await.unwrap() {
                counts.push(offense_count.unwrap());
            }
        }
        counts.sort_unstable();

        assert_eq!(counts, vec![1, 2, 3, 4]);
        assert_eq!(h.tracker.get(UserId::new(7)), 0);
        let removals = h
            .executor
            .calls()
            .into_iter()
            .filter(|c| *c == ExecutorCall::Remove(7))
            .count();
        assert_eq!(removals, 1);
    }
}
