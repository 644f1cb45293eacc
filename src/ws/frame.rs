//! WebSocket frame codec (RFC 6455 Section 5.2-5.3).
//!
//! - [`encode`]: build a single FIN frame, masked when sent by a client
//! - [`read_frame`]: parse one frame from an async byte stream
//! - [`apply_mask`]: symmetric XOR masking
//!
//! Extensions are not supported: any RSV bit on an inbound frame is an error.

use crate::base::neterror::NetError;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default cap on a single inbound payload. Full-page screenshots arrive as
/// one base64 text frame, so this is generous.
pub const DEFAULT_MAX_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Upper bound on the buffer reserved before any payload byte is read.
const INITIAL_PAYLOAD_CAPACITY: u64 = 64 * 1024;

/// Status code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Control frames may not carry more than this (RFC 6455 Section 5.5).
const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// A decoded frame. `payload` is always unmasked; `masked` records whether
/// the peer applied a mask on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: OpCode,
    pub fin: bool,
    pub masked: bool,
    pub payload: Bytes,
}

/// XOR `payload` in place with the repeating 4-byte key.
///
/// Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Encode a complete (FIN) frame. With `mask` set, a fresh random key is
/// generated for this frame.
pub fn encode(opcode: OpCode, payload: &[u8], mask: bool) -> Bytes {
    encode_fragment(opcode, payload, true, mask)
}

/// Encode a frame with an explicit FIN bit.
pub fn encode_fragment(opcode: OpCode, payload: &[u8], fin: bool, mask: bool) -> Bytes {
    let key = if mask { Some(rand::random::<[u8; 4]>()) } else { None };
    encode_with_key(opcode, payload, fin, key)
}

pub(crate) fn encode_with_key(
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    key: Option<[u8; 4]>,
) -> Bytes {
    let len = payload.len();
    let mut buf = BytesMut::with_capacity(len + 14);

    let fin_bit = if fin { 0x80 } else { 0x00 };
    buf.put_u8(fin_bit | opcode.as_u8());

    let mask_bit = if key.is_some() { 0x80 } else { 0x00 };
    if len <= 125 {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(len as u64);
    }

    match key {
        Some(key) => {
            buf.put_slice(&key);
            let start = buf.len();
            buf.put_slice(payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.put_slice(payload),
    }

    buf.freeze()
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends before a whole frame could be
/// read, which callers treat as "connection closed".
pub async fn read_frame<R>(reader: &mut R, max_payload: u64) -> Result<Option<Frame>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    if !read_exact_or_eof(reader, &mut header).await? {
        return Ok(None);
    }

    let fin = header[0] & 0x80 != 0;
    if header[0] & 0x70 != 0 {
        return Err(NetError::WsProtocolError(
            "non-zero RSV bits without negotiated extensions".into(),
        ));
    }
    let opcode = OpCode::from_u8(header[0] & 0x0F).ok_or_else(|| {
        NetError::WsProtocolError(format!("unknown opcode 0x{:X}", header[0] & 0x0F))
    })?;

    let masked = header[1] & 0x80 != 0;
    let payload_len = match header[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            if !read_exact_or_eof(reader, &mut ext).await? {
                return Ok(None);
            }
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            if !read_exact_or_eof(reader, &mut ext).await? {
                return Ok(None);
            }
            let len = u64::from_be_bytes(ext);
            if len >> 63 != 0 {
                return Err(NetError::WsProtocolError(
                    "most significant bit of 64-bit length must be 0".into(),
                ));
            }
            len
        }
        n => n as u64,
    };

    if opcode.is_control() {
        if !fin {
            return Err(NetError::WsProtocolError(
                "fragmented control frame".into(),
            ));
        }
        if payload_len > MAX_CONTROL_PAYLOAD {
            return Err(NetError::WsProtocolError(format!(
                "control frame payload of {} bytes",
                payload_len
            )));
        }
    }
    if payload_len > max_payload {
        return Err(NetError::MsgTooBig(payload_len));
    }

    let key = if masked {
        let mut key = [0u8; 4];
        if !read_exact_or_eof(reader, &mut key).await? {
            return Ok(None);
        }
        Some(key)
    } else {
        None
    };

    // Grow with the bytes that arrive rather than trusting the header.
    let mut payload = Vec::with_capacity(payload_len.min(INITIAL_PAYLOAD_CAPACITY) as usize);
    let read = (&mut *reader)
        .take(payload_len)
        .read_to_end(&mut payload)
        .await
        .map_err(|e| NetError::WsProtocolError(format!("read frame: {}", e)))?;
    if (read as u64) < payload_len {
        return Ok(None);
    }
    if let Some(key) = key {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        opcode,
        fin,
        masked,
        payload: Bytes::from(payload),
    }))
}

/// `read_exact` that reports a short read as `false` instead of an error.
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, NetError>
where
    R: AsyncRead + Unpin,
{
    if buf.is_empty() {
        return Ok(true);
    }
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(NetError::WsProtocolError(format!("read frame: {}", e))),
    }
}
