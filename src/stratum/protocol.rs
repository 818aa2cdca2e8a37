//! Stratum protocol message definitions
//!
//! Outbound requests always carry `id: 0`; pools answer in order, so replies
//! are matched by position in the session rather than by id.

use crate::error::{Error, Result};
use crate::stratum::job::Job;
use crate::stratum::nonce::{Extranonce1, Nonce2, NonceSize};
use crate::types::Target;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier sent with every request
pub const REQUEST_ID: u64 = 0;

/// Stratum protocol methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StratumMethod {
    /// Client subscribes to mining notifications
    Subscribe,
    /// Client authorizes with credentials
    Authorize,
    /// Server notifies client of new work
    Notify,
    /// Client submits a share
    Submit,
    /// Server sets the share target
    SetTarget,
    /// Unknown method
    Unknown(String),
}

impl StratumMethod {
    /// Parse method from string
    pub fn parse_method(s: &str) -> Self {
        match s {
            "mining.subscribe" => Self::Subscribe,
            "mining.authorize" => Self::Authorize,
            "mining.notify" => Self::Notify,
            "mining.submit" => Self::Submit,
            "mining.set_target" => Self::SetTarget,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Subscribe => "mining.subscribe",
            Self::Authorize => "mining.authorize",
            Self::Notify => "mining.notify",
            Self::Submit => "mining.submit",
            Self::SetTarget => "mining.set_target",
            Self::Unknown(s) => s,
        }
    }
}

/// Stratum request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumRequest {
    /// Request ID
    pub id: u64,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Vec<Value>,
}

impl StratumRequest {
    /// Create a new request
    pub fn new(method: StratumMethod, params: Vec<Value>) -> Self {
        Self {
            id: REQUEST_ID,
            method: method.as_str().to_string(),
            params,
        }
    }

    /// `mining.subscribe` with the client identifier and no session to resume
    pub fn subscribe(client_id: &str) -> Self {
        Self::new(
            StratumMethod::Subscribe,
            vec![Value::String(client_id.to_string()), Value::Null],
        )
    }

    /// `mining.authorize` with worker credentials
    pub fn authorize(username: &str, password: &str) -> Self {
        Self::new(
            StratumMethod::Authorize,
            vec![
                Value::String(username.to_string()),
                Value::String(password.to_string()),
            ],
        )
    }

    /// `mining.submit` for a nonce2 that met the target
    pub fn submit(username: &str, job_id: &str, nonce2: &Nonce2) -> Self {
        Self::new(
            StratumMethod::Submit,
            vec![
                Value::String(username.to_string()),
                Value::String(job_id.to_string()),
                Value::String(nonce2.to_hex()),
            ],
        )
    }

    /// Serialize as one wire line, newline included
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Any message received from the pool
///
/// Notifications carry `method` and `params`; responses carry `result` and
/// `error`. Absent and `null` fields both decode to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolMessage {
    /// Request ID, if any
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name for notifications
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters for notifications
    #[serde(default)]
    pub params: Option<Value>,
    /// Result for responses
    #[serde(default)]
    pub result: Option<Value>,
    /// Error for responses
    #[serde(default)]
    pub error: Option<Value>,
}

impl PoolMessage {
    /// Parse a single wire line
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Human readable reason from the `error` field, if one is set
    pub fn error_reason(&self) -> Option<String> {
        self.error.as_ref().map(error_reason)
    }

    fn params_array(&self) -> &[Value] {
        match &self.params {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }
}

/// Extract the message from a stratum error value.
///
/// Pools send `[code, message, traceback]`; some send `{code, message}`.
pub fn error_reason(error: &Value) -> String {
    match error {
        Value::Array(items) => match items.get(1) {
            Some(Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        Value::String(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Connection parameters assigned by the pool in the subscribe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Opaque subscription identifier
    pub subscription_id: String,
    /// Pool-controlled nonce prefix
    pub nonce1: Extranonce1,
    /// Width of the miner-controlled nonce suffix
    pub nonce2_size: NonceSize,
}

impl Subscription {
    /// Interpret the reply to `mining.subscribe`.
    ///
    /// Expects `result: [subscriptionId, nonce1Hex, nonce2Size]`.
    pub fn from_response(message: &PoolMessage) -> Result<Self> {
        if let Some(reason) = message.error_reason() {
            return Err(Error::handshake(format!("subscribe rejected: {}", reason)));
        }

        let result = match &message.result {
            Some(Value::Array(items)) if items.len() >= 3 => items,
            other => {
                return Err(Error::handshake(format!(
                    "unexpected subscribe result: {}",
                    other.as_ref().map(Value::to_string).unwrap_or_else(|| "null".into())
                )))
            }
        };

        let subscription_id = match &result[0] {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };

        let nonce1 = result[1]
            .as_str()
            .ok_or_else(|| Error::handshake(format!("nonce1 is not a string: {}", result[1])))
            .and_then(|hex| {
                Extranonce1::from_hex(hex).map_err(|e| Error::handshake(e.to_string()))
            })?;

        let nonce2_size = result[2]
            .as_u64()
            .and_then(|size| u8::try_from(size).ok())
            .ok_or_else(|| Error::handshake(format!("invalid nonce2 size: {}", result[2])))
            .and_then(|size| NonceSize::new(size).map_err(|e| Error::handshake(e.to_string())))?;

        nonce1
            .check_fits(nonce2_size)
            .map_err(|e| Error::handshake(e.to_string()))?;

        Ok(Self {
            subscription_id,
            nonce1,
            nonce2_size,
        })
    }
}

/// Check the reply to `mining.authorize`
pub fn check_authorize_response(message: &PoolMessage) -> Result<()> {
    match message.error_reason() {
        Some(reason) => Err(Error::handshake(format!("authorize rejected: {}", reason))),
        None => Ok(()),
    }
}

/// Outcome of a share submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Pool accepted the share
    Accepted,
    /// Pool rejected the share with a reason
    Rejected(String),
}

/// A message received after the handshake, classified for dispatch
#[derive(Debug)]
pub enum PoolEvent {
    /// New share target; `None` when the pool sent no parameters
    SetTarget(Option<Target>),
    /// New job to mine
    Notify(Job),
    /// Reply to an earlier `mining.submit`
    SubmitResult(SubmitOutcome),
    /// Notification this client does not handle
    Unknown(String),
}

impl PoolEvent {
    /// Classify a post-handshake message.
    ///
    /// Errors are scoped to this one message; the session carries on.
    pub fn from_message(message: &PoolMessage) -> Result<Self> {
        let Some(method) = message.method.as_deref() else {
            return Ok(PoolEvent::SubmitResult(Self::submit_outcome(message)));
        };

        match StratumMethod::parse_method(method) {
            StratumMethod::SetTarget => {
                let params = message.params_array();
                let Some(first) = params.first() else {
                    return Ok(PoolEvent::SetTarget(None));
                };
                let hex = first.as_str().ok_or_else(|| {
                    Error::stratum(format!("set_target parameter is not a string: {}", first))
                })?;
                Ok(PoolEvent::SetTarget(Some(Target::from_hex(hex)?)))
            }
            StratumMethod::Notify => {
                let params = message.params_array();
                if params.len() < 2 {
                    return Err(Error::stratum(format!(
                        "notify needs at least 2 params, got {}",
                        params.len()
                    )));
                }
                let job_id = match &params[0] {
                    Value::String(id) => id.clone(),
                    other => return Err(Error::stratum(format!("invalid job id: {}", other))),
                };
                let pow_hash = params[1].as_str().ok_or_else(|| {
                    Error::stratum(format!("powHash is not a string: {}", params[1]))
                })?;
                Ok(PoolEvent::Notify(Job::new(job_id, pow_hash)?))
            }
            other => Ok(PoolEvent::Unknown(other.as_str().to_string())),
        }
    }

    fn submit_outcome(message: &PoolMessage) -> SubmitOutcome {
        match message.result {
            Some(Value::Bool(true)) => SubmitOutcome::Accepted,
            _ => SubmitOutcome::Rejected(
                message
                    .error_reason()
                    .unwrap_or_else(|| "unknown reason".to_string()),
            ),
        }
    }
}
