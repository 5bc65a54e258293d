//! Length-prefixed record framing for the BLE UI link.
//!
//! A message larger than one GATT write/indication is split into records
//! of at most `record_size` bytes:
//!
//! ```text
//!  record 0:  [len_lo][len_hi][data ...............]   (≤ record_size)
//!  record 1:  [data ...................................]   (≤ record_size)
//!  ...
//! ```
//!
//! `len` is the total message length (little-endian u16), excluding the
//! two prefix bytes.

use log::warn;

use crate::error::SendError;

/// Bytes used by the length prefix.
pub const LEN_BYTES: usize = 2;

/// Split `msg` into records and hand each one to `send`, in order.
///
/// Stops at the first failing record.
pub fn send_records<F>(msg: &[u8], record_size: usize, mut send: F) -> Result<(), SendError>
where
    F: FnMut(&[u8]) -> Result<(), SendError>,
{
    if record_size <= LEN_BYTES {
        return Err(SendError::TooLarge);
    }
    let Ok(total) = u16::try_from(msg.len()) else {
        return Err(SendError::TooLarge);
    };

    let first_len = msg.len().min(record_size - LEN_BYTES);
    let mut first = Vec::with_capacity(LEN_BYTES + first_len);
    first.extend_from_slice(&total.to_le_bytes());
    first.extend_from_slice(&msg[..first_len]);
    send(&first)?;

    for chunk in msg[first_len..].chunks(record_size) {
        send(chunk)?;
    }
    Ok(())
}

/// Number of records [`send_records`] produces for a message of `len` bytes.
pub fn record_count(len: usize, record_size: usize) -> usize {
    (len + LEN_BYTES).div_ceil(record_size)
}

/// Reassembles records written by the peer into whole messages.
#[derive(Debug, Default)]
pub struct RecordAssembler {
    expected: Option<usize>,
    buf: Vec<u8>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record.  Returns the message once all of it arrived.
    pub fn push(&mut self, record: &[u8]) -> Option<Vec<u8>> {
        match self.expected {
            None => {
                if record.len() < LEN_BYTES {
                    warn!("BLE record too short for a length prefix ({} bytes)", record.len());
                    return None;
                }
                let total = usize::from(u16::from_le_bytes([record[0], record[1]]));
                let data = &record[LEN_BYTES..];
                self.buf = Vec::with_capacity(total);
                self.buf.extend_from_slice(&data[..data.len().min(total)]);
                self.expected = Some(total);
            }
            Some(total) => {
                if self.buf.len() + record.len() > total {
                    warn!("BLE record overruns declared length {}, ignored", total);
                    return None;
                }
                self.buf.extend_from_slice(record);
            }
        }
        self.take_if_complete()
    }

    /// `true` while a partial message is buffered.
    pub fn in_progress(&self) -> bool {
        self.expected.is_some()
    }

    /// Drop any partial message (peer disconnected).
    pub fn clear(&mut self) {
        self.expected = None;
        self.buf = Vec::new();
    }

    fn take_if_complete(&mut self) -> Option<Vec<u8>> {
        match self.expected {
            Some(total) if self.buf.len() == total => {
                self.expected = None;
                Some(core::mem::take(&mut self.buf))
            }
            _ => None,
        }
    }
}
