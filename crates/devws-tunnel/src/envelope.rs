//! Wire envelopes carried over the tunnel transport.
//!
//! Every frame is a JSON object with a `v` protocol version and a `kind`
//! tag. Unknown versions are rejected, unknown kinds fail decoding; both
//! abort the session rather than being skipped.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use devws_core::{LogMessage, SessionResult};

use crate::framing::ProtocolError;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// What a credential request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    Git,
    Docker,
}

/// Envelope sent by the remote agent to the local tunnel server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Progress output, forwarded to the active logger immediately.
    Log { message: LogMessage },
    /// Credential passthrough request, answered only when the session was
    /// started with the matching inject flag.
    CredentialRequest {
        id: u64,
        scope: CredentialScope,
        payload: Value,
    },
    /// Terminal message of a successful session. Exactly one per session;
    /// nothing follows it.
    Result { result: SessionResult },
}

/// Envelope sent by the local tunnel server back to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    CredentialResponse { id: u64, payload: Value },
    CredentialDenied { id: u64, reason: String },
}

#[derive(Serialize, Deserialize)]
struct Versioned<T> {
    v: u8,
    #[serde(flatten)]
    msg: T,
}

/// Encode a message into a frame payload.
///
/// # Errors
/// Returns an error if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&Versioned {
        v: PROTOCOL_VERSION,
        msg,
    })
    .map_err(ProtocolError::Decode)
}

/// Decode a frame payload, checking the protocol version.
///
/// # Errors
/// Returns `UnsupportedVersion` for a version mismatch and `Decode` for
/// malformed payloads.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    let versioned: Versioned<T> = serde_json::from_slice(payload)?;
    if versioned.v != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(versioned.v));
    }
    Ok(versioned.msg)
}
