use crate::frame::{Frame, HeaderFrame, payload_bytes};
use crate::{ArrayPayload, ModelError};

use serde_json::{Map, Value};

/// Builder for the frames of one display operation.
///
/// Produces the header frame, followed by the binary payload frame when an
/// array is attached. Arrays are validated before anything is encoded.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    token: Option<String>,
    key: Option<String>,
    config: Map<String, Value>,
    metadata: Map<String, Value>,
    array: Option<ArrayPayload>,
}

impl FrameBuilder {
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_array(mut self, array: Option<ArrayPayload>) -> Self {
        self.array = array;
        self
    }

    /// Build the ordered frames with validation.
    #[track_caller]
    pub fn build(self) -> Result<Vec<Frame>, ModelError> {
        let token = self
            .token
            .ok_or_else(|| ModelError::validation("Session token is required"))?;

        if token.is_empty() {
            return Err(ModelError::validation("Session token cannot be empty"));
        }

        if let Some(key) = &self.key
            && key.is_empty()
        {
            return Err(ModelError::validation("Operation key cannot be empty"));
        }

        if let Some(array) = &self.array {
            array.validate()?;
        }

        let header = HeaderFrame {
            token: token.clone(),
            key: self.key.clone(),
            config: self.config,
            metadata: self.metadata,
            shape: self.array.as_ref().map(|a| a.shape().to_vec()),
            dtype: self.array.as_ref().map(|a| a.dtype()),
        };

        let mut frames = vec![Frame::Header(header)];

        if let Some(array) = &self.array {
            frames.push(Frame::Payload(payload_bytes(
                &token,
                self.key.as_deref(),
                array,
            )));
        }

        Ok(frames)
    }
}
