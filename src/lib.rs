//! MazariBot: WhatsApp bot orchestration core.
//!
//! The protocol work itself (session crypto, socket framing, message
//! encoding) lives behind an external messaging backend; this crate owns
//! everything around it: the connection lifecycle with bounded reconnects,
//! the first-run authentication flow (QR vs. pairing code), a periodic
//! JSON snapshot of the chat cache, and the pairing relay HTTP server.
//!
//! ## Modules
//!
//! - `lifecycle` - connection state machine and the async driver
//! - `auth` - first-run auth flow selection (QR or pairing code)
//! - `store` - snapshot cache flushed to disk on a timer
//! - `pairing` / `relay` - pairing-code registry and its HTTP surface
//! - `dispatcher` - routing of inbound events to command handlers
//! - `client` - seam for the external protocol backend
//! - `config` - environment-driven configuration
//! - `events` - events surfaced by the messaging backend

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod lifecycle;
pub mod pairing;
pub mod relay;
pub mod store;

pub use auth::{AuthEnvironment, AuthError, AuthFlowSelector, AuthMethod, Prompt, StdinPrompt};
pub use client::{ClientError, Connector, MessagingClient, ProtocolVersion, StubConnector};
pub use config::{BotConfig, RelayConfig};
pub use dispatcher::{CommandDispatcher, DispatchError, EventSink};
pub use events::{
    BotEvent, ClientEvent, ConnectionUpdate, DisconnectReason, GroupUpdateEvent, MessageEvent,
    StatusUpdateEvent,
};
pub use lifecycle::{
    Action, BotError, BotRuntime, ExitReason, LifecycleController, LifecycleEvent, LifecycleState,
};
pub use pairing::{PairingError, PairingRecord, PairingRegistry, PairingStatus};
pub use store::{Snapshot, SnapshotStore};
