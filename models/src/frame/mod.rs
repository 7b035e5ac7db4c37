//! Wire frames sent from a view session to the viewer.
//!
//! Every display operation becomes a JSON header frame, optionally followed by a
//! binary frame holding the array bytes. The binary frame repeats the session
//! token and the operation key in front of the data so the viewer can match it
//! to its header even when several sessions share one connection.

pub mod builder;

use crate::{ArrayPayload, DType, ModelError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One logical unit on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Sent as a UTF-8 text message.
    Header(HeaderFrame),
    /// Sent as a binary message: token bytes, key bytes, array bytes.
    Payload(Vec<u8>),
}

impl Frame {
    pub fn is_header(&self) -> bool {
        matches!(self, Frame::Header(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderFrame {
    #[serde(rename = "hash")]
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default)]
    pub config: Map<String, Value>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
}

impl HeaderFrame {
    #[track_caller]
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Concatenate token, optional key, and the raw array buffer.
pub fn payload_bytes(token: &str, key: Option<&str>, array: &ArrayPayload) -> Vec<u8> {
    let key = key.unwrap_or_default();
    let mut bytes = Vec::with_capacity(token.len() + key.len() + array.as_bytes().len());
    bytes.extend_from_slice(token.as_bytes());
    bytes.extend_from_slice(key.as_bytes());
    bytes.extend_from_slice(array.as_bytes());
    bytes
}
