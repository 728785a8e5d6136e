//! Round-robin session: participants take turns until a stop condition fires.
//!
//! The session is a small state machine. It starts `Running { turn: 0 }`
//! and moves to `Stopped` either when a message mentions the stop phrase or
//! when the turn ceiling is reached. The phrase check runs after every
//! emitted message, so a match cuts the turn short.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::agent::AgentMessage;
use crate::llm::LlmError;

/// Source name of the task message that opens a session.
pub const USER_SOURCE: &str = "user";

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("Session has no participants")]
    NoParticipants,

    #[error("Participant {name} failed: {source}")]
    Participant {
        name: String,
        #[source]
        source: LlmError,
    },
}

/// Something that can take a turn in a session.
#[async_trait]
pub trait Participant: Send {
    fn name(&self) -> &str;

    /// Handle messages the participant has not seen yet and produce this
    /// turn's output, in order.
    async fn on_messages(&mut self, new_messages: &[AgentMessage]) -> Result<Vec<AgentMessage>, LlmError>;
}

/// Stops a session when a message contains the given text.
#[derive(Debug, Clone)]
pub struct TextMentionTermination {
    text: String,
}

impl TextMentionTermination {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Checks the rendered text of any message, tool call events included.
    pub fn matches(&self, message: &AgentMessage) -> bool {
        message.to_text().contains(&self.text)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// A message contained the stop phrase
    TextMention { text: String },
    /// The turn ceiling was reached
    MaxTurns { turns: usize },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextMention { text } => write!(f, "Text '{}' mentioned", text),
            Self::MaxTurns { turns } => write!(f, "Maximum number of turns {} reached", turns),
        }
    }
}

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Running { turn: usize },
    Stopped(StopReason),
}

/// Everything a session emitted, plus why it stopped.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub messages: Vec<AgentMessage>,
    pub stop_reason: StopReason,
}

/// Turn-taking loop over a fixed participant list.
pub struct RoundRobinSession {
    participants: Vec<Box<dyn Participant>>,
    max_turns: usize,
    termination: TextMentionTermination,
}

impl RoundRobinSession {
    /// `max_turns` below one is raised to one.
    pub fn new(
        participants: Vec<Box<dyn Participant>>,
        max_turns: usize,
        termination: TextMentionTermination,
    ) -> Self {
        Self {
            participants,
            max_turns: max_turns.max(1),
            termination,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Run a task to completion.
    pub async fn run(&mut self, task: &str) -> Result<TaskResult, TeamError> {
        self.run_stream(task, |_| {}).await
    }

    /// Run a task, handing each message to `on_message` as it is emitted.
    pub async fn run_stream<F>(&mut self, task: &str, mut on_message: F) -> Result<TaskResult, TeamError>
    where
        F: FnMut(&AgentMessage) + Send,
    {
        if self.participants.is_empty() {
            return Err(TeamError::NoParticipants);
        }

        let mut messages: Vec<AgentMessage> = Vec::new();
        // Index into `messages` up to which each participant is caught up.
        let mut seen = vec![0usize; self.participants.len()];

        let opening = AgentMessage::text(USER_SOURCE, task);
        on_message(&opening);
        let mut state = if self.termination.matches(&opening) {
            SessionState::Stopped(self.text_mention())
        } else {
            SessionState::Running { turn: 0 }
        };
        messages.push(opening);

        let stop_reason = loop {
            let turn = match state {
                SessionState::Stopped(reason) => break reason,
                SessionState::Running { turn } => turn,
            };
            let index = turn % self.participants.len();
            let participant = &mut self.participants[index];
            let name = participant.name().to_string();

            // Own output is already in the participant's context.
            let unseen: Vec<AgentMessage> = messages[seen[index]..]
                .iter()
                .filter(|m| m.source != name)
                .cloned()
                .collect();

            tracing::debug!(turn = turn + 1, participant = %name, "Starting turn");
            let produced = participant
                .on_messages(&unseen)
                .await
                .map_err(|source| TeamError::Participant {
                    name: name.clone(),
                    source,
                })?;

            let mut stopped = None;
            for message in produced {
                on_message(&message);
                let hit = self.termination.matches(&message);
                messages.push(message);
                if hit {
                    stopped = Some(self.text_mention());
                    break;
                }
            }
            seen[index] = messages.len();

            state = match stopped {
                Some(reason) => SessionState::Stopped(reason),
                None if turn + 1 >= self.max_turns => SessionState::Stopped(StopReason::MaxTurns {
                    turns: self.max_turns,
                }),
                None => SessionState::Running { turn: turn + 1 },
            };
        };
        tracing::debug!(%stop_reason, messages = messages.len(), "Session stopped");

        Ok(TaskResult {
            messages,
            stop_reason,
        })
    }

    fn text_mention(&self) -> StopReason {
        StopReason::TextMention {
            text: self.termination.text().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MessageKind, ToolCallResult};
    use crate::llm::ToolCall;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Emits scripted turns and records what it was shown.
    struct Scripted {
        name: &'static str,
        turns: VecDeque<Vec<AgentMessage>>,
        received: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Scripted {
        fn replying(name: &'static str, turns: Vec<Vec<&str>>) -> Self {
            Self {
                name,
                turns: turns
                    .into_iter()
                    .map(|t| t.into_iter().map(|m| AgentMessage::text(name, m)).collect())
                    .collect(),
                received: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Participant for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_messages(&mut self, new_messages: &[AgentMessage]) -> Result<Vec<AgentMessage>, LlmError> {
            self.received
                .lock()
                .unwrap()
                .push(new_messages.iter().map(|m| m.to_text()).collect());
            Ok(self
                .turns
                .pop_front()
                .unwrap_or_else(|| vec![AgentMessage::text(self.name, "still thinking")]))
        }
    }

    struct Failing;

    #[async_trait]
    impl Participant for Failing {
        fn name(&self) -> &str {
            "notion_agent"
        }

        async fn on_messages(&mut self, _new: &[AgentMessage]) -> Result<Vec<AgentMessage>, LlmError> {
            Err(LlmError::InvalidResponse("missing choices[0]".to_string()))
        }
    }

    fn texts(result: &TaskResult) -> Vec<String> {
        result.messages.iter().map(|m| m.to_text()).collect()
    }

    fn session(participant: impl Participant + 'static, max_turns: usize) -> RoundRobinSession {
        RoundRobinSession::new(
            vec![Box::new(participant)],
            max_turns,
            TextMentionTermination::new("TERMINATE"),
        )
    }

    #[tokio::test]
    async fn stops_at_max_turns_without_stop_phrase() {
        let mut session = session(Scripted::replying("notion_agent", vec![]), 5);

        let result = session.run("list pages").await.expect("run");
        assert_eq!(result.stop_reason, StopReason::MaxTurns { turns: 5 });
        // task + one message per turn
        assert_eq!(result.messages.len(), 6);
    }

    #[tokio::test]
    async fn stops_as_soon_as_phrase_appears() {
        let agent = Scripted::replying(
            "notion_agent",
            vec![vec!["a"], vec!["b"], vec!["TERMINATE"], vec!["never"]],
        );
        let mut session = session(agent, 10);

        let result = session.run("task").await.expect("run");
        assert_eq!(texts(&result), vec!["task", "a", "b", "TERMINATE"]);
        assert_eq!(
            result.stop_reason,
            StopReason::TextMention {
                text: "TERMINATE".to_string()
            }
        );
    }

    #[tokio::test]
    async fn match_mid_turn_drops_the_rest_of_the_turn() {
        let agent = Scripted::replying(
            "notion_agent",
            vec![vec!["Done. TERMINATE", "trailing chatter"]],
        );
        let mut session = session(agent, 5);

        let result = session.run("task").await.expect("run");
        assert_eq!(texts(&result), vec!["task", "Done. TERMINATE"]);
    }

    #[tokio::test]
    async fn tool_call_arguments_trigger_termination() {
        let mut agent = Scripted::replying("notion_agent", vec![]);
        agent.turns.push_back(vec![
            AgentMessage::new(
                "notion_agent",
                MessageKind::ToolCallRequest {
                    calls: vec![ToolCall::new("c1", "notion-search", r#"{"query":"TERMINATE"}"#)],
                },
            ),
            AgentMessage::text("notion_agent", "Found nothing"),
        ]);
        let mut session = session(agent, 2);

        let result = session.run("task").await.expect("run");
        assert_eq!(
            result.stop_reason,
            StopReason::TextMention {
                text: "TERMINATE".to_string()
            }
        );
        // the text after the request is dropped
        assert_eq!(result.messages.len(), 2);
    }

    #[tokio::test]
    async fn tool_results_quoting_the_phrase_stop_the_session() {
        let execution = || {
            vec![AgentMessage::new(
                "notion_agent",
                MessageKind::ToolCallExecution {
                    results: vec![ToolCallResult {
                        call_id: "c1".to_string(),
                        name: "notion-fetch".to_string(),
                        content: "TERMINATE".to_string(),
                        is_error: false,
                    }],
                },
            )]
        };
        let mut agent = Scripted::replying("notion_agent", vec![]);
        for _ in 0..5 {
            agent.turns.push_back(execution());
        }
        let mut session = session(agent, 5);

        let result = session.run("task").await.expect("run");
        assert_eq!(
            result.stop_reason,
            StopReason::TextMention {
                text: "TERMINATE".to_string()
            }
        );
        assert_eq!(result.messages.len(), 2);
    }

    #[tokio::test]
    async fn phrase_in_task_stops_before_any_turn() {
        let agent = Scripted::replying("notion_agent", vec![vec!["should not run"]]);
        let received = Arc::clone(&agent.received);
        let mut session = session(agent, 5);

        let result = session.run("say TERMINATE").await.expect("run");
        assert_eq!(texts(&result), vec!["say TERMINATE"]);
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_participant_sees_task_once() {
        let agent = Scripted::replying("notion_agent", vec![vec!["one"], vec!["two"]]);
        let received = Arc::clone(&agent.received);
        let mut session = session(agent, 2);

        session.run("task").await.expect("run");
        let received = received.lock().unwrap().clone();
        assert_eq!(received, vec![vec!["task".to_string()], Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn participants_alternate_and_see_each_other() {
        let first = Scripted::replying("writer", vec![vec!["draft"], vec!["final"]]);
        let second = Scripted::replying("critic", vec![vec!["revise"]]);
        let critic_saw = Arc::clone(&second.received);
        let mut session = RoundRobinSession::new(
            vec![Box::new(first), Box::new(second)],
            3,
            TextMentionTermination::new("TERMINATE"),
        );

        let result = session.run("task").await.expect("run");
        assert_eq!(texts(&result), vec!["task", "draft", "revise", "final"]);
        assert_eq!(
            critic_saw.lock().unwrap()[0],
            vec!["task".to_string(), "draft".to_string()]
        );
    }

    #[tokio::test]
    async fn stream_callback_sees_every_message_in_order() {
        let agent = Scripted::replying("notion_agent", vec![vec!["a"], vec!["TERMINATE"]]);
        let mut session = session(agent, 5);

        let mut streamed = Vec::new();
        let result = session
            .run_stream("task", |m| streamed.push(m.to_text()))
            .await
            .expect("run");
        assert_eq!(streamed, texts(&result));
    }

    #[tokio::test]
    async fn participant_error_aborts_the_session() {
        let mut session = session(Failing, 5);
        let err = session.run("task").await.unwrap_err();
        assert!(matches!(err, TeamError::Participant { ref name, .. } if name == "notion_agent"));
    }

    #[tokio::test]
    async fn empty_session_is_rejected() {
        let mut session = RoundRobinSession::new(Vec::new(), 3, TextMentionTermination::new("TERMINATE"));
        assert!(matches!(session.run("task").await, Err(TeamError::NoParticipants)));
    }

    #[test]
    fn zero_max_turns_is_clamped() {
        let session = session(Failing, 0);
        assert_eq!(session.max_turns(), 1);
    }
}
