//! # ussd-core
//!
//! Client side of a USSD-over-TCP gateway link.
//!
//! This crate contains:
//! - **Framing**: `SessionKey`, `FrameHeader`, `Frame` and `UssdCodec` for the
//!   19-byte header + XML body wire format
//! - **Messages**: logon, enquire-link and dialog request/response documents
//! - **Network**: `Connection`, the deadline-bounded `FrameReader` and the
//!   single-writer `ConnectionGuard`
//! - **Session**: logon handshake and `KeepaliveScheduler`
//! - **Dispatch**: the inbound read loop and the per-event `Responder`
//! - **Collaborators**: HTTP menu resolver and fire-and-forget metrics
//! - **Client**: `UssdClient`, one logon-to-teardown run of the link
//! - **Error**: `UssdError`, a typed, `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod metrics;
pub mod network;
pub mod resolver;
pub mod session;
pub mod state;
pub mod task;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientOptions, UssdClient};
pub use codec::UssdCodec;
pub use dispatch::{DialogOutcome, DispatchTiming, Dispatcher, Responder};
pub use error::{FramingError, UssdError, ValidationError};
pub use frame::Frame;
pub use header::{FrameHeader, HEADER_SIZE, KEY_SIZE, LengthMode, MAX_DECLARED_LENGTH, SessionKey};
pub use message::{EnquireLink, InboundMessage, LogonRequest, MsgType, UssdRequest, UssdResponse};
pub use metrics::{MetricEvent, MetricsReporter, MetricsSettings};
pub use network::{Connection, ConnectionGuard, ConnectionInfo, FrameReader, FrameSender};
pub use resolver::{HttpMenuResolver, MenuQuery, MenuReply, MenuResolver, MenuSettings};
pub use session::{Credentials, KeepaliveScheduler, RequestId};
pub use state::ConnectionPhase;
pub use task::DialogPool;
