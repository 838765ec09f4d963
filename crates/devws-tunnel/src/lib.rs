//! Duplex tunnel protocol between local orchestration and the remote agent.
//!
//! Provides:
//! - Wire envelopes (length-prefixed JSON, versioned)
//! - The tunnel server loop driving an up session to its terminal result
//! - A backpressure-aware forwarder bridging sync log calls to a remote sink

pub mod credentials;
pub mod envelope;
pub mod forwarder;
pub mod framing;
pub mod server;

pub use credentials::{CredentialBroker, RefuseAllCredentials};
pub use envelope::{AgentMessage, CredentialScope, HostMessage, PROTOCOL_VERSION};
pub use forwarder::{LogSink, RemoteLogForwarder};
pub use framing::ProtocolError;
pub use server::{TunnelError, UpServerConfig, run_up_server};
