use crate::protocol::error::{LodestarError, Result};
use crate::protocol::{coerce_arguments, CallId, RpcRequest, RpcResponse};

/// Maximum payload size accepted in a single frame (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Size of the big-endian length prefix in front of every payload
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Which message a frame is expected to carry.
///
/// The payload is self-describing, so one decoder handles both kinds once
/// told what to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

/// A message as it travels between client and service instance.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl WireMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::Request(_) => MessageKind::Request,
            WireMessage::Response(_) => MessageKind::Response,
        }
    }

    pub fn call_id(&self) -> CallId {
        match self {
            WireMessage::Request(request) => request.call_id,
            WireMessage::Response(response) => response.call_id,
        }
    }
}

impl From<RpcRequest> for WireMessage {
    fn from(request: RpcRequest) -> Self {
        WireMessage::Request(request)
    }
}

impl From<RpcResponse> for WireMessage {
    fn from(response: RpcResponse) -> Self {
        WireMessage::Response(response)
    }
}

/// Codec for encoding/decoding RPC messages
///
/// Currently only JSON is supported, but the enum allows for future
/// extensibility (e.g., MessagePack, CBOR, etc.).
///
/// # Example
///
/// ```
/// use lodestar_common::transport::{Codec, MessageKind, WireMessage};
/// use lodestar_common::protocol::{RpcRequest, TypeDescriptor};
/// use serde_json::json;
///
/// let codec = Codec::new();
/// let request = RpcRequest::new("Echo", "echo", vec![TypeDescriptor::String], vec![json!("hi")]);
///
/// let frame = codec.encode(&WireMessage::Request(request.clone())).unwrap();
/// let decoded = codec.decode(&frame, MessageKind::Request).unwrap();
/// assert_eq!(decoded, WireMessage::Request(request));
/// ```
pub enum Codec {
    /// JSON codec (currently the only supported format)
    Json(JsonCodec),
}

impl Codec {
    /// Create a new codec (JSON is the only supported format)
    pub fn new() -> Self {
        Codec::Json(JsonCodec)
    }

    /// Encode a message into a complete length-prefixed frame
    pub fn encode(&self, message: &WireMessage) -> Result<Vec<u8>> {
        match self {
            Codec::Json(_) => JsonCodec::encode(message),
        }
    }

    /// Decode a complete length-prefixed frame
    ///
    /// # Arguments
    ///
    /// * `frame` - Length prefix followed by the payload
    /// * `expected` - Which message kind the frame must contain
    pub fn decode(&self, frame: &[u8], expected: MessageKind) -> Result<WireMessage> {
        match self {
            Codec::Json(_) => JsonCodec::decode(frame, expected),
        }
    }
}

/// JSON codec for encoding/decoding RPC messages
///
/// Frames are `[4-byte length as u32 big-endian] + [JSON payload]`. The
/// payload keeps field names so it stays self-describing. Decoding a request
/// also coerces every argument to the type its `parameter_signature` names.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a message into a frame.
    ///
    /// # Arguments
    ///
    /// * `message` - The request or response to encode
    ///
    /// # Returns
    ///
    /// Length prefix followed by the JSON payload
    pub fn encode(message: &WireMessage) -> Result<Vec<u8>> {
        let payload = match message {
            WireMessage::Request(request) => Self::encode_request(request)?,
            WireMessage::Response(response) => Self::encode_response(response)?,
        };
        Self::frame(&payload)
    }

    /// Decode a frame into a message of the expected kind.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the frame is truncated, has trailing bytes,
    /// exceeds the size limit or the payload is not a valid message.
    pub fn decode(frame: &[u8], expected: MessageKind) -> Result<WireMessage> {
        let payload = Self::unframe(frame)?;
        Self::decode_payload(payload, expected)
    }

    /// Decode an already unframed payload.
    pub fn decode_payload(payload: &[u8], expected: MessageKind) -> Result<WireMessage> {
        match expected {
            MessageKind::Request => Self::decode_request(payload).map(WireMessage::Request),
            MessageKind::Response => Self::decode_response(payload).map(WireMessage::Response),
        }
    }

    /// Prepend the length prefix to a payload.
    pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(LodestarError::Serialization(format!(
                "Message too large: {} bytes (max {} bytes)",
                payload.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    /// Strip and check the length prefix of a complete frame.
    pub fn unframe(frame: &[u8]) -> Result<&[u8]> {
        if frame.len() < LENGTH_PREFIX_SIZE {
            return Err(LodestarError::Serialization(format!(
                "Frame too short: {} bytes",
                frame.len()
            )));
        }

        let (prefix, payload) = frame.split_at(LENGTH_PREFIX_SIZE);
        let len = Self::payload_len([prefix[0], prefix[1], prefix[2], prefix[3]])?;

        if payload.len() != len {
            return Err(LodestarError::Serialization(format!(
                "Frame declares {} payload bytes but carries {}",
                len,
                payload.len()
            )));
        }

        Ok(payload)
    }

    /// Interpret a length prefix, enforcing the size limit.
    pub fn payload_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize> {
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(LodestarError::Serialization(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }
        Ok(len)
    }

    /// Encode a request payload (no length prefix)
    pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    /// Decode a request payload and coerce its arguments
    ///
    /// # Arguments
    ///
    /// * `data` - The JSON-encoded request
    ///
    /// # Returns
    ///
    /// The decoded request, with every argument converted to the type named
    /// by its `parameter_signature` entry
    pub fn decode_request(data: &[u8]) -> Result<RpcRequest> {
        let mut request: RpcRequest = serde_json::from_slice(data)?;
        let arguments = std::mem::take(&mut request.arguments);
        request.arguments = coerce_arguments(&request.parameter_signature, arguments)?;
        Ok(request)
    }

    /// Encode a response payload (no length prefix)
    pub fn encode_response(response: &RpcResponse) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    /// Decode a response payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the payload parses but carries both or
    /// neither of `result` and `error`.
    pub fn decode_response(data: &[u8]) -> Result<RpcResponse> {
        let response: RpcResponse = serde_json::from_slice(data)?;
        response.validate()?;
        Ok(response)
    }

    /// Best-effort recovery of the call id from a payload that failed to
    /// decode, so the peer can still be told which call was rejected.
    pub fn peek_call_id(data: &[u8]) -> Option<CallId> {
        let value: serde_json::Value = serde_json::from_slice(data).ok()?;
        value.get("call_id")?.as_str()?.parse().ok()
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}
