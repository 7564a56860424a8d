//! RFC 6455 frame codec.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! ```
//!
//! Client frames arrive masked and are unmasked in place; server frames
//! are written unmasked, header and payload in one contiguous write.
//! Fragmentation is not supported: the contract is single-frame
//! messages, and FIN=0 is rejected.

use crate::{errors::Error, http::body::TailReader, server::stream::StreamWriter};

pub(crate) const OP_TEXT: u8 = 0x1;
pub(crate) const OP_PONG: u8 = 0xA;

const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;

const FIN: u8 = 0x80;
const MASK: u8 = 0x80;

/// One decoded frame, reduced to what the session loop dispatches on.
#[derive(Debug)]
pub(crate) enum Frame {
    Data(Vec<u8>),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub(crate) async fn read_frame(reader: &mut TailReader, max_payload: usize) -> Result<Frame, Error> {
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await?;

    if head[0] & FIN == 0 {
        return Err(Error::UnsupportedFrame);
    }
    let opcode = head[0] & 0x0F;
    let masked = head[1] & MASK != 0;

    let mut payload_len = u64::from(head[1] & 0x7F);
    if payload_len == 126 {
        let mut extended = [0u8; 2];
        reader.read_exact(&mut extended).await?;
        payload_len = u64::from(u16::from_be_bytes(extended));
    } else if payload_len == 127 {
        let mut extended = [0u8; 8];
        reader.read_exact(&mut extended).await?;
        payload_len = u64::from_be_bytes(extended);
    }

    if payload_len > max_payload as u64 {
        return Err(Error::BodyTooLarge);
    }

    let mut mask_key = [0u8; 4];
    if masked {
        reader.read_exact(&mut mask_key).await?;
    }

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;

    if masked {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask_key[i % 4];
        }
    }

    match opcode {
        OP_TEXT | OP_BINARY => Ok(Frame::Data(payload)),
        OP_CLOSE => Ok(Frame::Close),
        OP_PING => Ok(Frame::Ping(payload)),
        OP_PONG => Ok(Frame::Pong),
        _ => Err(Error::UnsupportedFrame),
    }
}

/// Writes one unmasked server frame with the tiered length encoding.
pub(crate) async fn write_frame(
    writer: &mut StreamWriter,
    opcode: u8,
    payload: &[u8],
) -> Result<(), Error> {
    let mut frame = Vec::with_capacity(10 + payload.len());
    frame.push(FIN | opcode);

    match payload.len() {
        len @ 0..=125 => frame.push(len as u8),
        len @ 126..=65535 => {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }

    frame.extend_from_slice(payload);
    writer.write_all(&frame).await
}
