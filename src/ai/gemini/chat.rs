//! Multi-turn chat on top of [`Gemini`].
//!
//! A chat is either idle (history ends with a model turn, or is empty) or
//! awaiting a response (history ends with the user turn just sent). `ask`
//! moves idle to awaiting by appending the user message, and back to idle by
//! either appending the model's reply or removing that user message again.
//! An `ask` made while another is awaiting a response is rejected outright.

use super::types::{
    answer_pair_to_messages, GenerateContentRequest, GenerateContentResponse, Message, Role,
};
use super::{AskResponse, Gemini};
use crate::ai::Command;
use crate::models::{AskOptions, ChatConfig};
use crate::{Error, Result};
use parking_lot::Mutex;

pub struct Chat<'g> {
    gemini: &'g Gemini,
    config: ChatConfig,
    history: Mutex<Vec<Message>>,
}

impl<'g> Chat<'g> {
    pub fn new(gemini: &'g Gemini, config: ChatConfig) -> Self {
        let history = config
            .messages
            .iter()
            .flat_map(answer_pair_to_messages)
            .collect();

        Self {
            gemini,
            config,
            history: Mutex::new(history),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Copy of the conversation so far, including an unanswered user turn.
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }

    pub fn is_awaiting_response(&self) -> bool {
        ends_with_user_turn(&self.history.lock())
    }

    pub async fn ask(&self, text: &str, options: AskOptions<'_>) -> Result<AskResponse> {
        let pending = PendingTurn::begin(&self.history, Message::user(text))?;

        if !options.attachments.is_empty() {
            tracing::warn!(
                "Ignoring {} attachment(s): Gemini chats only accept text, sending the message without them",
                options.attachments.len()
            );
        }
        if !options.messages.is_empty() {
            tracing::warn!("Ignoring prior messages passed to a chat turn; seed them through ChatConfig");
        }

        let generation_config = options.generation_config(self.config.generation_config());
        let output = options.output;
        let model = options
            .model
            .unwrap_or_else(|| self.config.model.clone());

        let contents = self.history();
        let request = GenerateContentRequest {
            contents: &contents,
            generation_config,
        };

        let response = match options.on_chunk {
            None => {
                let response: GenerateContentResponse = self
                    .gemini
                    .query_json(&model, Command::GenerateContent, &request)
                    .await?;
                response.ensure_not_blocked()?;
                response
            }
            Some(on_chunk) => {
                self.gemini
                    .stream_response(&model, &request, output, on_chunk)
                    .await?
            }
        };

        let reply = response.reply()?;
        let result = Gemini::format_response(output, response)?;
        pending.commit(reply);

        Ok(result)
    }
}

fn ends_with_user_turn(history: &[Message]) -> bool {
    history.last().map(|m| m.role) == Some(Role::User)
}

/// A user message appended ahead of its answer. Unless committed, dropping it
/// truncates the history back to where it was before the message.
struct PendingTurn<'h> {
    history: &'h Mutex<Vec<Message>>,
    index: usize,
    committed: bool,
}

impl<'h> PendingTurn<'h> {
    fn begin(history: &'h Mutex<Vec<Message>>, message: Message) -> Result<Self> {
        let mut messages = history.lock();
        if ends_with_user_turn(&messages) {
            return Err(Error::TurnViolation);
        }

        let index = messages.len();
        messages.push(message);

        Ok(Self {
            history,
            index,
            committed: false,
        })
    }

    fn commit(mut self, reply: Message) {
        self.history.lock().push(reply);
        self.committed = true;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("Rolling back unanswered chat turn");
            self.history.lock().truncate(self.index);
        }
    }
}
