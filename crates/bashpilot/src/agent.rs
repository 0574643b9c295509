use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::conversation::ConversationStore;
use crate::errors::{AgentError, AgentResult};
use crate::models::decision::Decision;
use crate::models::message::{Message, CHANNEL_COMMENTARY, CHANNEL_FINAL};
use crate::models::response::ModelResponse;
use crate::models::role::Role;
use crate::models::tool::Tool;
use crate::parser::ResponseParser;
use crate::prompt_template::{developer_prompt, system_prompt};
use crate::providers::base::Provider;
use crate::runner::{CommandResult, CommandRunner, DEFAULT_TIMEOUT};

pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_IDENTITY: &str = "You are a helpful bash assistant that can execute commands.";
pub const DEFAULT_INSTRUCTIONS: &str = "When users ask you to perform file/system operations:
1. Call execute_bash with the appropriate command
2. Wait for results
3. Provide a friendly summary

Always call the tool - don't just suggest commands.";
pub const DEFAULT_REASONING_EFFORT: &str = "medium";

pub const ABORT_CANCELLED: &str = "cancelled";
pub const ABORT_MAX_ITERATIONS: &str = "max iterations reached";
pub const ABORT_UNPARSEABLE: &str = "unparseable response";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub command_timeout: Duration,
    pub identity: String,
    pub instructions: String,
    pub reasoning_effort: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            command_timeout: DEFAULT_TIMEOUT,
            identity: DEFAULT_IDENTITY.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            reasoning_effort: DEFAULT_REASONING_EFFORT.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

/// Where a task stands. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum AgentState {
    Running { iteration: usize },
    Done(String),
    Aborted(String),
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentState::Running { .. })
    }
}

/// Progress notifications for whoever is watching a run
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    IterationStarted { iteration: usize, max_iterations: usize },
    Reasoning(String),
    CommandStarted { command: String },
    CommandFinished { command: String, result: CommandResult },
    FinalAnswer(String),
    Aborted(String),
}

/// How a task ended, with the full conversation that led there
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub state: AgentState,
    /// Model calls made
    pub iterations: usize,
    pub conversation: ConversationStore,
}

impl TaskOutcome {
    pub fn answer(&self) -> Option<&str> {
        match &self.state {
            AgentState::Done(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&str> {
        match &self.state {
            AgentState::Aborted(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Agent drives a model through a task, running the shell commands it asks for
pub struct Agent {
    provider: Box<dyn Provider>,
    runner: CommandRunner,
    parser: ResponseParser,
    tools: Vec<Tool>,
    config: AgentConfig,
    events: Option<UnboundedSender<AgentEvent>>,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>, runner: CommandRunner, config: AgentConfig) -> Self {
        Self {
            provider,
            runner,
            parser: ResponseParser::default(),
            tools: vec![Tool::execute_bash()],
            config,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish progress events on this channel
    pub fn with_events(mut self, events: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Abort runs between iterations once this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one task to completion. Every failure ends up as an `Aborted` state.
    pub async fn run(&self, task: &str) -> TaskOutcome {
        let task_id = Uuid::new_v4();
        let span = tracing::info_span!("task", %task_id);
        self.run_task(task).instrument(span).await
    }

    async fn run_task(&self, task: &str) -> TaskOutcome {
        tracing::info!(task, max_iterations = self.config.max_iterations, "starting task");

        let mut conversation = match self.seed(task) {
            Ok(conversation) => conversation,
            Err(err) => return self.finish(AgentState::Aborted(err.to_string()), 0, ConversationStore::new()),
        };

        let mut state = AgentState::Running { iteration: 1 };
        let mut calls = 0;
        while let AgentState::Running { iteration } = state {
            if self.cancel.is_cancelled() {
                state = AgentState::Aborted(ABORT_CANCELLED.to_string());
                break;
            }
            if iteration > self.config.max_iterations {
                state = AgentState::Aborted(ABORT_MAX_ITERATIONS.to_string());
                break;
            }
            calls = iteration;
            state = self.step(iteration, &mut conversation).await;
        }

        self.finish(state, calls, conversation)
    }

    fn seed(&self, task: &str) -> AgentResult<ConversationStore> {
        let today = chrono::Utc::now().date_naive();
        let system = system_prompt(&self.config.identity, today, &self.config.reasoning_effort)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        let developer = developer_prompt(&self.config.instructions, &self.tools)
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        Ok(ConversationStore::seeded(vec![
            Message::system().with_text(system),
            Message::developer().with_text(developer),
            Message::user().with_text(task),
        ]))
    }

    /// One model call and whatever it asks for
    async fn step(&self, iteration: usize, conversation: &mut ConversationStore) -> AgentState {
        self.emit(AgentEvent::IterationStarted {
            iteration,
            max_iterations: self.config.max_iterations,
        });

        let response = match self.call_model(conversation).await {
            Ok(response) => response,
            Err(err) => return AgentState::Aborted(err.to_string()),
        };
        if !response.reasoning_text().trim().is_empty() {
            self.emit(AgentEvent::Reasoning(response.reasoning_text().to_string()));
        }

        match self.parser.parse(&response) {
            Decision::RunCommand { command } => {
                let bash = &self.tools[0];
                conversation.push(
                    Message::assistant()
                        .with_channel(CHANNEL_COMMENTARY)
                        .with_recipient(bash.recipient())
                        .with_content_type("json")
                        .with_json(json!({ "command": command })),
                );

                self.emit(AgentEvent::CommandStarted {
                    command: command.clone(),
                });
                let result = match self.execute(&command).await {
                    Ok(result) => result,
                    Err(err) => return AgentState::Aborted(err.to_string()),
                };

                conversation.push(
                    Message::tool(bash.recipient())
                        .with_recipient(Role::Assistant.to_string())
                        .with_channel(CHANNEL_COMMENTARY)
                        .with_text(result.to_tool_text(&command)),
                );
                self.emit(AgentEvent::CommandFinished { command, result });

                AgentState::Running {
                    iteration: iteration + 1,
                }
            }
            Decision::FinalAnswer { text } => {
                conversation.push(
                    Message::assistant()
                        .with_channel(CHANNEL_FINAL)
                        .with_text(text.clone()),
                );
                AgentState::Done(text)
            }
            Decision::Unparseable => {
                tracing::warn!(
                    iteration,
                    content = response.content_text(),
                    "model response could not be interpreted"
                );
                AgentState::Aborted(ABORT_UNPARSEABLE.to_string())
            }
        }
    }

    async fn call_model(&self, conversation: &ConversationStore) -> AgentResult<ModelResponse> {
        let (response, usage) = self
            .provider
            .complete(conversation.messages(), &self.tools)
            .await
            .map_err(|e| AgentError::ModelError(e.to_string()))?;
        tracing::debug!(?usage, finish_reason = ?response.finish_reason, "model responded");
        Ok(response)
    }

    async fn execute(&self, command: &str) -> AgentResult<CommandResult> {
        let result = self.runner.run(command, self.config.command_timeout).await?;
        Ok(result)
    }

    fn finish(
        &self,
        state: AgentState,
        iterations: usize,
        conversation: ConversationStore,
    ) -> TaskOutcome {
        match &state {
            AgentState::Done(answer) => {
                tracing::info!(iterations, answer_len = answer.len(), "task done");
                self.emit(AgentEvent::FinalAnswer(answer.clone()));
            }
            AgentState::Aborted(reason) => {
                tracing::warn!(iterations, reason, "task aborted");
                self.emit(AgentEvent::Aborted(reason.clone()));
            }
            AgentState::Running { .. } => {}
        }
        TaskOutcome {
            state,
            iterations,
            conversation,
        }
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                tracing::debug!("event receiver dropped");
            }
        }
    }
}
