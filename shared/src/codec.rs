//! Frame layout: `[u32 LE body length][u8 tag][JSON object]`.

use crate::{Broadcast, Login, LoginFailed, LoginSuccess, Message};
use serde::de::IgnoredAny;
use thiserror::Error;

pub const HEADER_LEN: usize = 4;
pub const CODE_LEN: usize = 1;

/// Largest body a peer may announce. Anything bigger cannot be trusted to be
/// a real frame, so the stream is given up on.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageCode {
    ConnectionClosed = 0,
    Login = 1,
    LoginSuccess = 2,
    LoginFailed = 3,
    Broadcast = 4,
}

impl TryFrom<u8> for MessageCode {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageCode::ConnectionClosed),
            1 => Ok(MessageCode::Login),
            2 => Ok(MessageCode::LoginSuccess),
            3 => Ok(MessageCode::LoginFailed),
            4 => Ok(MessageCode::Broadcast),
            other => Err(CodecError::UnknownCode(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown message code {0}")]
    UnknownCode(u8),

    #[error("frame body is empty")]
    EmptyBody,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("invalid message payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of trying to pull one frame off the front of a receive buffer.
#[derive(Debug)]
pub enum Decoded {
    /// Not enough bytes yet; keep the buffer and read more.
    Incomplete,
    Complete { message: Message, consumed: usize },
    /// The frame was delimited correctly but its body is garbage. Skip
    /// `consumed` bytes and carry on with the next frame.
    Malformed { consumed: usize, error: CodecError },
    /// The header itself cannot be trusted; the stream is out of sync.
    Unrecoverable(CodecError),
}

pub fn encode_body(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut body = vec![message.code() as u8];
    match message {
        Message::ConnectionClosed => body.extend_from_slice(b"{}"),
        Message::Login(login) => serde_json::to_writer(&mut body, login)?,
        Message::LoginSuccess(success) => serde_json::to_writer(&mut body, success)?,
        Message::LoginFailed(failed) => serde_json::to_writer(&mut body, failed)?,
        Message::Broadcast(broadcast) => serde_json::to_writer(&mut body, broadcast)?,
    }
    Ok(body)
}

pub fn decode_body(body: &[u8]) -> Result<Message, CodecError> {
    let (&code, payload) = body.split_first().ok_or(CodecError::EmptyBody)?;
    let message = match MessageCode::try_from(code)? {
        MessageCode::ConnectionClosed => {
            serde_json::from_slice::<IgnoredAny>(payload)?;
            Message::ConnectionClosed
        }
        MessageCode::Login => Message::Login(serde_json::from_slice::<Login>(payload)?),
        MessageCode::LoginSuccess => {
            Message::LoginSuccess(serde_json::from_slice::<LoginSuccess>(payload)?)
        }
        MessageCode::LoginFailed => {
            Message::LoginFailed(serde_json::from_slice::<LoginFailed>(payload)?)
        }
        MessageCode::Broadcast => {
            Message::Broadcast(serde_json::from_slice::<Broadcast>(payload)?)
        }
    };
    Ok(message)
}

pub fn encode_frame(message: &Message) -> Result<Vec<u8>, CodecError> {
    let body = encode_body(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend(body);
    Ok(frame)
}

/// Reads the body length announced by a frame header.
pub fn body_len(header: [u8; HEADER_LEN]) -> Result<usize, CodecError> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(len)
}

pub fn decode_frame(buffer: &[u8]) -> Decoded {
    let Some(header) = buffer.get(..HEADER_LEN) else {
        return Decoded::Incomplete;
    };
    let header: [u8; HEADER_LEN] = [header[0], header[1], header[2], header[3]];

    let len = match body_len(header) {
        Ok(len) => len,
        Err(error) => return Decoded::Unrecoverable(error),
    };

    let Some(body) = buffer.get(HEADER_LEN..HEADER_LEN + len) else {
        return Decoded::Incomplete;
    };

    let consumed = HEADER_LEN + len;
    match decode_body(body) {
        Ok(message) => Decoded::Complete { message, consumed },
        Err(error) => Decoded::Malformed { consumed, error },
    }
}
