//! Wire framing for event fan-out.
//!
//! Observers and the bus receive events as opaque frames, never as live
//! objects, so each consumer decodes independently. Layout (little-endian):
//!
//! ```text
//! [u8 kind][u16 type-code len][u16 id len][u16 base len][i32 body len]
//! [type-code bytes][id bytes][base bytes][body bytes]
//! ```
//!
//! `base` is [`EventBase`] (version then timestamp, two `i64`s). The body is
//! the serde JSON of the domain event.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::event::{DomainEvent, EventBase, FullyEvent, StateKey};

/// Fixed header size: kind + three u16 lengths + one i32 length.
pub const HEADER_LEN: usize = 1 + 2 + 2 + 2 + 4;

/// Errors raised while framing or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown frame kind: {0}")]
    UnknownKind(u8),

    #[error("Field too long for frame: {field} is {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid state id: {0}")]
    InvalidStateId(String),

    #[error("Invalid event base")]
    InvalidBase,

    #[error("Type code mismatch: frame={frame}, body={body}")]
    TypeCodeMismatch { frame: String, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// First byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Opaque non-event message.
    Common = 0,
    /// Framed domain event.
    Event = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Common),
            1 => Ok(Self::Event),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

/// Serialized parts of one event, ready to append or frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBytes {
    pub type_code: String,
    pub state_id: String,
    pub base: EventBase,
    pub body: Bytes,
}

impl EventBytes {
    /// Serialize a fully-qualified event.
    pub fn from_event<K: StateKey, E: DomainEvent>(
        event: &FullyEvent<K, E>,
    ) -> Result<Self, CodecError> {
        let body = serde_json::to_vec(&event.event)?;
        Ok(Self {
            type_code: event.event.type_code().to_string(),
            state_id: event.state_id.to_string(),
            base: event.base,
            body: Bytes::from(body),
        })
    }

    /// Decode back into a typed event.
    pub fn to_event<K: StateKey, E: DomainEvent>(&self) -> Result<FullyEvent<K, E>, CodecError> {
        let state_id = self
            .state_id
            .parse::<K>()
            .map_err(|_| CodecError::InvalidStateId(self.state_id.clone()))?;
        let event: E = serde_json::from_slice(&self.body)?;
        if event.type_code() != self.type_code {
            return Err(CodecError::TypeCodeMismatch {
                frame: self.type_code.clone(),
                body: event.type_code().to_string(),
            });
        }
        Ok(FullyEvent::new(state_id, event, self.base))
    }

    /// Encode as an event frame.
    pub fn to_frame(&self) -> Result<Bytes, CodecError> {
        let type_code = self.type_code.as_bytes();
        let id = self.state_id.as_bytes();
        let base = self.base.to_bytes();

        let type_len = field_len_u16("type_code", type_code.len())?;
        let id_len = field_len_u16("state_id", id.len())?;
        let body_len = i32::try_from(self.body.len()).map_err(|_| CodecError::FieldTooLong {
            field: "body",
            len: self.body.len(),
        })?;

        let mut buf = BytesMut::with_capacity(
            HEADER_LEN + type_code.len() + id.len() + base.len() + self.body.len(),
        );
        buf.put_u8(FrameKind::Event as u8);
        buf.put_u16_le(type_len);
        buf.put_u16_le(id_len);
        buf.put_u16_le(base.len() as u16);
        buf.put_i32_le(body_len);
        buf.put_slice(type_code);
        buf.put_slice(id);
        buf.put_slice(&base);
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Decode an event frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, CodecError> {
        ensure_len(frame, HEADER_LEN)?;
        let mut header = &frame[..HEADER_LEN];
        let kind = FrameKind::try_from(header.get_u8())?;
        if kind != FrameKind::Event {
            return Err(CodecError::UnknownKind(kind as u8));
        }
        let type_len = header.get_u16_le() as usize;
        let id_len = header.get_u16_le() as usize;
        let base_len = header.get_u16_le() as usize;
        let body_len = header.get_i32_le();
        let body_len = usize::try_from(body_len).map_err(|_| CodecError::Truncated {
            needed: HEADER_LEN,
            available: frame.len(),
        })?;

        ensure_len(frame, HEADER_LEN + type_len + id_len + base_len + body_len)?;
        let mut rest = &frame[HEADER_LEN..];
        let type_code = take_str(&mut rest, type_len, "type_code")?;
        let state_id = take_str(&mut rest, id_len, "state_id")?;
        let base = EventBase::from_bytes(&rest[..base_len]).ok_or(CodecError::InvalidBase)?;
        rest.advance(base_len);
        let body = Bytes::copy_from_slice(&rest[..body_len]);

        Ok(Self {
            type_code,
            state_id,
            base,
            body,
        })
    }
}

fn field_len_u16(field: &'static str, len: usize) -> Result<u16, CodecError> {
    u16::try_from(len).map_err(|_| CodecError::FieldTooLong { field, len })
}

fn ensure_len(frame: &[u8], needed: usize) -> Result<(), CodecError> {
    if frame.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: frame.len(),
        });
    }
    Ok(())
}

fn take_str(buf: &mut &[u8], len: usize, field: &'static str) -> Result<String, CodecError> {
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|_| CodecError::InvalidUtf8(field))?
        .to_string();
    buf.advance(len);
    Ok(value)
}

#[cfg(test)]
mod tests;
