//! Line-delimited JSON protocol spoken by the simulator server.
//!
//! Every request and response is one JSON object on its own line:
//!
//! ```text
//! -> {"method":"init","n_players":2}
//! <- {"kind":"empty"}
//! -> {"method":"inject","player_id":0,"internal_msg_type":3,"value":""}
//! <- {"kind":"output","session_id":1,"player_id":0,"message_type":0,"value":"7b22..."}
//! <- {"kind":"done","session_id":1,"player_id":0,"emitted":1}
//! ```

use crate::controller::{InitError, InjectError, InjectReport};
use dposim_env::{EventOutcome, PlayerId, ProtocolOutput};
use serde::{Deserialize, Serialize};

/// Service name reported by `describe`.
pub const SERVICE_NAME: &str = "dposim.Simulator";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Adds `n_players` players to the simulation
    Init { n_players: u32 },

    /// Injects one hex-encoded message into a player
    Inject {
        player_id: u32,
        internal_msg_type: u32,
        value: String,
    },

    /// Lists the service's methods
    Describe,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownPlayer,
    PayloadDecode,
    PlayerBusy,
    EngineStopped,
    InitFailed,
    BadRequest,
}

/// One engine output, tagged with where it came from and who it is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFrame {
    pub session_id: u64,
    pub player_id: u32,
    pub message_type: u32,
    /// Hex-encoded message body
    pub value: String,
}

impl OutputFrame {
    /// Decodes the frame back into an output that can be injected elsewhere.
    pub fn to_output(&self) -> Result<ProtocolOutput, hex::FromHexError> {
        Ok(ProtocolOutput::new(self.message_type, hex::decode(&self.value)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// Init succeeded
    Empty,

    Output(OutputFrame),

    /// The injected event was completed
    Done {
        session_id: u64,
        player_id: u32,
        emitted: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ignored: Option<String>,
    },

    Error {
        code: ErrorCode,
        message: String,
    },

    Service(ServiceDescriptor),
}

impl Response {
    pub fn output(session_id: u64, player_id: PlayerId, output: ProtocolOutput) -> Self {
        Response::Output(OutputFrame {
            session_id,
            player_id: player_id.0,
            message_type: output.message_type,
            value: hex::encode(output.value),
        })
    }

    pub fn done(report: &InjectReport) -> Self {
        let (emitted, ignored) = match &report.outcome {
            EventOutcome::Processed { emitted } => (*emitted, None),
            EventOutcome::Ignored { reason } => (0, Some(reason.clone())),
            EventOutcome::Abandoned => (0, Some("abandoned".to_string())),
        };
        Response::Done {
            session_id: report.session_id,
            player_id: report.player_id.0,
            emitted,
            ignored,
        }
    }

    pub fn error(code: ErrorCode, message: impl std::fmt::Display) -> Self {
        Response::Error {
            code,
            message: message.to_string(),
        }
    }

    pub fn init_failed(error: &InitError) -> Self {
        Self::error(ErrorCode::InitFailed, error)
    }

    pub fn inject_failed(error: &InjectError) -> Self {
        let code = match error {
            InjectError::UnknownPlayer { .. } => ErrorCode::UnknownPlayer,
            InjectError::PayloadDecode(_) => ErrorCode::PayloadDecode,
            InjectError::PlayerBusy(_) => ErrorCode::PlayerBusy,
            InjectError::EngineStopped(_) => ErrorCode::EngineStopped,
        };
        Self::error(code, error)
    }

    /// Renders the response as one protocol line (without the newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<String>,
    /// Whether the method answers with a stream of frames
    pub streaming: bool,
}

/// Introspection answer for `describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub version: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn current() -> Self {
        let method = |name: &str, params: &[&str], streaming| MethodDescriptor {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            streaming,
        };
        Self {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            methods: vec![
                method("init", &["n_players"], false),
                method("inject", &["player_id", "internal_msg_type", "value"], true),
                method("describe", &[], false),
            ],
        }
    }
}
