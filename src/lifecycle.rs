//! Connection lifecycle: the reconnect state machine and its async driver.
//!
//! [`LifecycleController`] is a pure transition function over
//! `(state, event)`; it owns the reconnect counter and the in-flight latch
//! as fields so the invariants are testable without a socket.
//! [`BotRuntime`] interprets the resulting actions against a real
//! [`Connector`], the snapshot store and the command dispatcher.

use std::{fs, io, sync::Arc, time::Duration};

use serde_json::json;
use thiserror::Error;

use crate::auth::{self, AuthEnvironment, AuthError, AuthFlowSelector, AuthMethod, Prompt};
use crate::client::{ClientError, Connector, MessagingClient};
use crate::config::BotConfig;
use crate::dispatcher::EventSink;
use crate::events::{BotEvent, ClientEvent, ConnectionUpdate, DisconnectReason};
use crate::store::SnapshotStore;

/// Lifecycle states of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Connecting,
    Open,
    ClosedRetrying,
    ClosedTerminal,
}

/// Connection-state transitions fed into the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Opened,
    Closed { status: Option<u16> },
}

/// Side effects requested by a transition, interpreted by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Emit the best-effort self-addressed "online" notification.
    NotifyOnline,
    /// Delete the session directory so the next start re-runs first-run auth.
    PurgeCredentials,
    /// Wait out the backoff delay, then reconnect.
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Stop retrying and end the process.
    Halt,
}

/// Owns the reconnect counter and the in-flight latch.
///
/// At most one reconnect may be scheduled at a time, no matter how many
/// close events arrive in a burst; the counter never exceeds the
/// configured maximum before a halt is requested.
#[derive(Debug)]
pub struct LifecycleController {
    state: LifecycleState,
    attempts: u32,
    max_attempts: u32,
    reconnect_delay: Duration,
    retry_in_flight: bool,
}

impl LifecycleController {
    pub fn new(max_attempts: u32, reconnect_delay: Duration) -> Self {
        Self {
            state: LifecycleState::Connecting,
            attempts: 0,
            max_attempts,
            reconnect_delay,
            retry_in_flight: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Reconnect attempts consumed since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The single transition function: `(state, event)` to next state plus
    /// side effects.
    pub fn handle(&mut self, event: LifecycleEvent) -> Vec<Action> {
        match event {
            LifecycleEvent::Opened => {
                self.state = LifecycleState::Open;
                self.attempts = 0;
                self.retry_in_flight = false;
                vec![Action::NotifyOnline]
            }
            LifecycleEvent::Closed { status } => {
                let mut actions = Vec::new();
                if DisconnectReason::from_status(status).requires_relink() {
                    actions.push(Action::PurgeCredentials);
                }
                if self.attempts >= self.max_attempts {
                    self.state = LifecycleState::ClosedTerminal;
                    actions.push(Action::Halt);
                } else if !self.retry_in_flight {
                    self.retry_in_flight = true;
                    self.attempts += 1;
                    self.state = LifecycleState::ClosedRetrying;
                    actions.push(Action::ScheduleReconnect {
                        attempt: self.attempts,
                        delay: self.reconnect_delay,
                    });
                }
                actions
            }
        }
    }

    /// Clear the latch once the backoff delay has elapsed, just before the
    /// driver reconnects.
    pub fn retry_cleared(&mut self) {
        self.retry_in_flight = false;
        self.state = LifecycleState::Connecting;
    }
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("fatal connect error: {0}")]
    Connect(#[from] ClientError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("pairing code request failed: {0}")]
    PairingRequest(ClientError),
}

/// Why the runtime stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Interrupt signal; graceful shutdown.
    Interrupted,
    /// The reconnect bound was hit; the operator must restart.
    RetriesExhausted,
}

/// How QR updates are displayed during first-run auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QrDisplay {
    Render,
    Raw,
}

/// Async driver around the controller: builds connection handles, runs the
/// first-run auth flow, mirrors inbound events into the snapshot cache and
/// forwards them to the event sink.
pub struct BotRuntime<C> {
    config: BotConfig,
    connector: C,
    store: Arc<SnapshotStore>,
    sink: Arc<dyn EventSink>,
    controller: LifecycleController,
    auth_env: AuthEnvironment,
}

impl<C: Connector> BotRuntime<C> {
    pub fn new(
        config: BotConfig,
        connector: C,
        store: Arc<SnapshotStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let controller =
            LifecycleController::new(config.max_reconnect_attempts, config.reconnect_delay);
        let auth_env = AuthEnvironment::detect(config.phone_number.clone());
        Self {
            config,
            connector,
            store,
            sink,
            controller,
            auth_env,
        }
    }

    /// Override the detected auth environment.
    pub fn with_auth_env(mut self, env: AuthEnvironment) -> Self {
        self.auth_env = env;
        self
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Run until retries are exhausted. Fails only if the very first
    /// connect errors before any handle is produced, or if first-run auth
    /// fails in a way the operator cannot recover without restarting.
    pub async fn run(&mut self, prompt: &mut dyn Prompt) -> Result<ExitReason, BotError> {
        match self.connector.fetch_latest_version().await {
            Ok(version) => log::info!("using protocol version {version}"),
            Err(err) => log::warn!("could not fetch latest protocol version: {err}"),
        }

        let mut connected_once = false;
        loop {
            let mut handle = match self.connector.connect(&self.config).await {
                Ok(handle) => handle,
                Err(err) if !connected_once => return Err(BotError::Connect(err)),
                Err(err) => {
                    log::warn!("reconnect attempt failed: {err}");
                    match self.on_close(None).await {
                        Some(reason) => return Ok(reason),
                        None => continue,
                    }
                }
            };
            connected_once = true;

            let qr_mode = if handle.is_registered() {
                None
            } else {
                self.first_run_auth(handle.as_mut(), prompt).await?
            };

            loop {
                let Some(event) = handle.next_event().await else {
                    // Stream ended without an explicit close; same recovery path.
                    match self.on_close(None).await {
                        Some(reason) => return Ok(reason),
                        None => break,
                    }
                };
                match event {
                    ClientEvent::Connection(ConnectionUpdate::Qr(payload)) => {
                        self.display_qr(&payload, qr_mode);
                    }
                    ClientEvent::Connection(ConnectionUpdate::Open) => {
                        self.on_open(handle.as_mut()).await;
                    }
                    ClientEvent::Connection(ConnectionUpdate::Close { status }) => {
                        match self.on_close(status).await {
                            Some(reason) => return Ok(reason),
                            None => break,
                        }
                    }
                    ClientEvent::Bot(event) => self.on_bot_event(event),
                }
            }
        }
    }

    /// Run the auth flow selection for an unregistered handle and, for the
    /// pairing branch, request and display the code.
    async fn first_run_auth(
        &self,
        handle: &mut dyn MessagingClient,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<QrDisplay>, BotError> {
        let selector = AuthFlowSelector::new(self.auth_env.clone());
        match selector.select(prompt)? {
            AuthMethod::RenderQr => Ok(Some(QrDisplay::Render)),
            AuthMethod::LogQr => {
                log::info!("no phone number configured; QR payload will be logged as text");
                Ok(Some(QrDisplay::Raw))
            }
            AuthMethod::PairingCode { phone } => {
                log::info!("requesting pairing code for {phone}");
                match handle.request_pairing_code(&phone).await {
                    Ok(code) => {
                        println!("Pairing code: {}", auth::format_pairing_code(&code));
                        println!("{}", auth::pairing_instructions());
                        Ok(None)
                    }
                    Err(err) if self.auth_env.interactive => {
                        // Operator can rerun the process to retry.
                        log::error!("failed to request pairing code: {err}");
                        Ok(None)
                    }
                    Err(err) => Err(BotError::PairingRequest(err)),
                }
            }
        }
    }

    fn display_qr(&self, payload: &str, mode: Option<QrDisplay>) {
        match mode {
            Some(QrDisplay::Render) => match auth::render_qr(payload) {
                Ok(image) => {
                    println!("Scan this QR with WhatsApp:");
                    println!("{image}");
                }
                Err(err) => log::error!("could not render QR code: {err}"),
            },
            Some(QrDisplay::Raw) => println!("QR (string): {payload}"),
            None => {}
        }
    }

    async fn on_open(&mut self, handle: &mut dyn MessagingClient) {
        log::info!("MazariBot connected");
        for action in self.controller.handle(LifecycleEvent::Opened) {
            if action == Action::NotifyOnline {
                // Best-effort side channel; its failure never reaches the
                // state machine.
                if let Err(err) = handle.send_self_note("MazariBot is online").await {
                    log::warn!("online notification failed: {err}");
                }
            }
        }
    }

    /// Interpret a close. Returns `Some` when the process should end.
    async fn on_close(&mut self, status: Option<u16>) -> Option<ExitReason> {
        let reason = DisconnectReason::from_status(status);
        log::warn!("connection closed: {reason}");

        for action in self.controller.handle(LifecycleEvent::Closed { status }) {
            match action {
                Action::PurgeCredentials => self.purge_credentials(),
                Action::Halt => {
                    log::error!(
                        "giving up after {} reconnect attempts; restart the process to try again",
                        self.controller.max_attempts()
                    );
                    return Some(ExitReason::RetriesExhausted);
                }
                Action::ScheduleReconnect { attempt, delay } => {
                    log::info!(
                        "reconnecting in {}s (attempt {attempt}/{})",
                        delay.as_secs(),
                        self.controller.max_attempts()
                    );
                    tokio::time::sleep(delay).await;
                    self.controller.retry_cleared();
                }
                Action::NotifyOnline => {}
            }
        }
        None
    }

    fn purge_credentials(&self) {
        match fs::remove_dir_all(&self.config.session_dir) {
            Ok(()) => log::warn!("session removed; next start will require re-linking"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::error!("failed to remove session directory: {err}"),
        }
    }

    /// Mirror an inbound event into the snapshot cache, then dispatch it.
    fn on_bot_event(&self, event: BotEvent) {
        match &event {
            BotEvent::Message(message) => {
                match serde_json::to_value(message) {
                    Ok(record) => self.store.record_message(&message.id, record),
                    Err(err) => log::warn!("failed to serialize message record: {err}"),
                }
                self.store.upsert_chat(
                    &message.chat,
                    json!({ "id": message.chat, "conversationTimestamp": message.timestamp }),
                );
                self.store.upsert_contact(
                    &message.sender,
                    json!({ "id": message.sender, "notify": message.push_name }),
                );
            }
            BotEvent::GroupUpdate(update) => match serde_json::to_value(update) {
                Ok(record) => self.store.upsert_chat(&update.group, record),
                Err(err) => log::warn!("failed to serialize group record: {err}"),
            },
            BotEvent::StatusUpdate(_) => {}
        }
        // Handler-scoped errors are logged, never escalated.
        if let Err(err) = self.sink.handle(&event) {
            log::warn!("event handler error: {err}");
        }
    }
}
