use crate::event::EventDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;
use thiserror::Error;
use tracing::debug;

pub const HOST_TO_STATE_CAP: usize = 65_536;
pub const STATE_TO_HOST_CAP: usize = 1_048_576;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("payload exceeds u32")]
    PayloadExceedsU32,
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProtocolError {
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Envelopes written by the host to the state owner.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t")]
pub enum HostEnvelope {
    #[serde(rename = "ready")]
    Ready { sid: String, capabilities: Value },
    #[serde(rename = "events")]
    Events {
        sid: String,
        id: u64,
        events: Vec<EventDescriptor>,
    },
}

/// Envelopes read from the state owner.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t")]
pub enum StateEnvelope {
    #[serde(rename = "render")]
    Render { sid: String, rev: u64, vm: Value },

    #[serde(rename = "error")]
    Error {
        sid: String,
        #[serde(default)]
        rev: Option<u64>,
        code: String,
        message: String,
    },
}

pub fn ready_envelope(sid: String) -> HostEnvelope {
    HostEnvelope::Ready {
        sid,
        capabilities: serde_json::json!({
            "batched_events": true,
            "transport": "stdio-packet-4"
        }),
    }
}

pub fn events_envelope(sid: String, id: u64, events: Vec<EventDescriptor>) -> HostEnvelope {
    HostEnvelope::Events { sid, id, events }
}

pub fn writer_loop(rx: Receiver<HostEnvelope>, mut writer: impl Write) -> Result<(), ProtocolError> {
    for envelope in rx {
        let payload = encode_host_envelope(&envelope)?;
        write_frame(&mut writer, &payload, HOST_TO_STATE_CAP)?;
        writer.flush()?;

        if let HostEnvelope::Events { id, events, .. } = &envelope {
            debug!(batch = id, events = events.len(), "event batch written");
        }
    }

    Ok(())
}

/// Reads state envelopes until EOF. A frame that is oversized or does not
/// decode is passed to `on_rejected` and skipped; only I/O failures end the
/// loop with an error.
pub fn reader_loop<F, R>(
    mut reader: impl Read,
    mut on_envelope: F,
    mut on_rejected: R,
) -> Result<(), ProtocolError>
where
    F: FnMut(StateEnvelope),
    R: FnMut(ProtocolError),
{
    loop {
        let payload = match read_frame(&mut reader, STATE_TO_HOST_CAP) {
            Ok(payload) => payload,
            Err(err) if err.is_eof() => return Ok(()),
            Err(ProtocolError::FrameTooLarge { len, max }) => {
                if !skip_payload(&mut reader, len)? {
                    return Ok(());
                }
                on_rejected(ProtocolError::FrameTooLarge { len, max });
                continue;
            }
            Err(err) => return Err(err),
        };

        match decode_state_envelope(&payload) {
            Ok(envelope) => on_envelope(envelope),
            Err(err) => on_rejected(err),
        }
    }
}

// Returns `false` when the stream ends before the whole payload was skipped.
fn skip_payload(reader: &mut impl Read, len: usize) -> Result<bool, ProtocolError> {
    let len = len as u64;
    let skipped = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    Ok(skipped == len)
}

fn encode_host_envelope(envelope: &HostEnvelope) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(envelope)?)
}

fn decode_state_envelope(payload: &[u8]) -> Result<StateEnvelope, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

fn read_frame(reader: &mut impl Read, max_payload: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_payload,
        });
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

fn write_frame(
    writer: &mut impl Write,
    payload: &[u8],
    max_payload: usize,
) -> Result<(), ProtocolError> {
    if payload.len() > max_payload {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: max_payload,
        });
    }

    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::PayloadExceedsU32)?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}
