//! Routing of inbound events to named command handlers.
//!
//! Command implementations live outside this crate; they register here by
//! name and receive `!command args` text messages. Non-message events pass
//! through so handlers for group and status updates can hook in later.

use std::collections::HashMap;

use thiserror::Error;

use crate::events::{BotEvent, MessageEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("command `{name}` failed: {message}")]
    Handler { name: String, message: String },
}

/// Consumer of decoded inbound events; the lifecycle driver hands every
/// non-connection event to exactly one sink.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &BotEvent) -> Result<(), DispatchError>;
}

/// A parsed command invocation handed to a handler.
pub struct CommandInvocation<'a> {
    /// Command name without the prefix.
    pub name: &'a str,
    /// Remainder of the message text, trimmed.
    pub args: &'a str,
    /// The message that triggered the command.
    pub message: &'a MessageEvent,
}

type CommandHandler = Box<dyn Fn(&CommandInvocation<'_>) -> Result<(), String> + Send + Sync>;

/// Registry mapping command names to handlers.
pub struct CommandDispatcher {
    prefix: char,
    handlers: HashMap<String, CommandHandler>,
}

impl CommandDispatcher {
    /// Create an empty dispatcher with the default `!` prefix.
    pub fn new() -> Self {
        Self {
            prefix: '!',
            handlers: HashMap::new(),
        }
    }

    /// Override the command prefix.
    pub fn with_prefix(mut self, prefix: char) -> Self {
        self.prefix = prefix;
        self
    }

    /// Register a handler under a command name.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&CommandInvocation<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    /// Split `!name args` into (name, args), or `None` for plain text.
    pub fn parse<'a>(&self, text: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = text.strip_prefix(self.prefix)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().filter(|name| !name.is_empty())?;
        let args = parts.next().unwrap_or("").trim();
        Some((name, args))
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for CommandDispatcher {
    fn handle(&self, event: &BotEvent) -> Result<(), DispatchError> {
        let BotEvent::Message(message) = event else {
            return Ok(());
        };
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let Some((name, args)) = self.parse(text) else {
            return Ok(());
        };
        let Some(handler) = self.handlers.get(name) else {
            return Err(DispatchError::UnknownCommand(name.to_string()));
        };
        handler(&CommandInvocation {
            name,
            args,
            message,
        })
        .map_err(|message| DispatchError::Handler {
            name: name.to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GroupUpdateEvent;
    use std::sync::{Arc, Mutex};

    fn message(text: &str) -> BotEvent {
        BotEvent::Message(MessageEvent {
            id: "m1".into(),
            chat: "123@s.whatsapp.net".into(),
            sender: "123@s.whatsapp.net".into(),
            push_name: Some("Test".into()),
            text: Some(text.into()),
            timestamp: 0,
        })
    }

    #[test]
    fn routes_command_with_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = CommandDispatcher::new();
        let sink = Arc::clone(&seen);
        dispatcher.register("tts", move |invocation| {
            sink.lock().unwrap().push(invocation.args.to_string());
            Ok(())
        });

        dispatcher.handle(&message("!tts hello world")).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["hello world"]);
    }

    #[test]
    fn plain_text_is_ignored() {
        let dispatcher = CommandDispatcher::new();
        dispatcher.handle(&message("just chatting")).unwrap();
    }

    #[test]
    fn unknown_command_is_reported() {
        let dispatcher = CommandDispatcher::new();
        let result = dispatcher.handle(&message("!nope"));
        assert!(matches!(result, Err(DispatchError::UnknownCommand(name)) if name == "nope"));
    }

    #[test]
    fn handler_error_carries_command_name() {
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.register("owner", |_| Err("no vcard".to_string()));
        let result = dispatcher.handle(&message("!owner"));
        assert!(matches!(
            result,
            Err(DispatchError::Handler { name, .. }) if name == "owner"
        ));
    }

    #[test]
    fn non_message_events_pass_through() {
        let dispatcher = CommandDispatcher::new();
        let event = BotEvent::GroupUpdate(GroupUpdateEvent {
            group: "g1@g.us".into(),
            participants: vec!["123@s.whatsapp.net".into()],
            action: "add".into(),
        });
        dispatcher.handle(&event).unwrap();
    }

    #[test]
    fn custom_prefix() {
        let mut dispatcher = CommandDispatcher::new().with_prefix('.');
        dispatcher.register("ping", |_| Ok(()));
        dispatcher.handle(&message(".ping")).unwrap();
        assert!(dispatcher.parse("!ping").is_none());
    }
}
