//! TFRecord framing.
//!
//! Each record on disk is laid out as
//!
//! ```text
//! u64 length (little endian)
//! u32 masked crc32c(length bytes)
//! [u8; length] payload
//! u32 masked crc32c(payload)
//! ```
//!
//! which is the container TensorFlow's `TFRecordWriter` produces and what
//! downstream Waymo tooling reads.

use std::io::{self, Read, Write};

use thiserror::Error;

const MASK_DELTA: u32 = 0xa282_ead8;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("record truncated after {read} of {expected} bytes")]
    Truncated { read: usize, expected: usize },
    #[error("length checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    LengthChecksum { stored: u32, computed: u32 },
    #[error("payload checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    DataChecksum { stored: u32, computed: u32 },
    #[error("record length {0} does not fit in memory on this platform")]
    Oversized(u64),
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Rotate-and-offset mask applied to every stored CRC.
pub fn masked_crc(bytes: &[u8]) -> u32 {
    let crc = crc32c::crc32c(bytes);
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Appends framed records to any writer.
pub struct RecordWriter<W: Write> {
    inner: W,
    records: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    pub fn write_record(&mut self, payload: &[u8]) -> Result<(), RecordError> {
        let len = (payload.len() as u64).to_le_bytes();
        self.inner.write_all(&len)?;
        self.inner.write_all(&masked_crc(&len).to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&masked_crc(payload).to_le_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Encode a prost message and write it as one record.
    pub fn write_message<M: prost::Message>(&mut self, message: &M) -> Result<(), RecordError> {
        self.write_record(&message.encode_to_vec())
    }

    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, RecordError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Iterates framed records from any reader. A clean end of input between
/// records ends iteration; a partial record is reported as `Truncated`.
pub struct RecordReader<R: Read> {
    inner: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    /// Read the next raw payload, `Ok(None)` at end of input.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>, RecordError> {
        let mut len_bytes = [0u8; 8];
        let got = read_full(&mut self.inner, &mut len_bytes)?;
        if got == 0 {
            return Ok(None);
        }
        if got < len_bytes.len() {
            return Err(RecordError::Truncated {
                read: got,
                expected: len_bytes.len(),
            });
        }
        let mut crc_bytes = [0u8; 4];
        self.read_exact_or_truncated(&mut crc_bytes)?;
        check(
            u32::from_le_bytes(crc_bytes),
            masked_crc(&len_bytes),
            |stored, computed| RecordError::LengthChecksum { stored, computed },
        )?;

        let len = u64::from_le_bytes(len_bytes);
        let len = usize::try_from(len).map_err(|_| RecordError::Oversized(len))?;
        let mut payload = vec![0u8; len];
        self.read_exact_or_truncated(&mut payload)?;
        self.read_exact_or_truncated(&mut crc_bytes)?;
        check(
            u32::from_le_bytes(crc_bytes),
            masked_crc(&payload),
            |stored, computed| RecordError::DataChecksum { stored, computed },
        )?;
        Ok(Some(payload))
    }

    /// Read and decode the next record as `M`.
    pub fn read_message<M: prost::Message + Default>(&mut self) -> Result<Option<M>, RecordError> {
        match self.read_record()? {
            Some(bytes) => Ok(Some(M::decode(bytes.as_slice())?)),
            None => Ok(None),
        }
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8]) -> Result<(), RecordError> {
        let got = read_full(&mut self.inner, buf)?;
        if got < buf.len() {
            return Err(RecordError::Truncated {
                read: got,
                expected: buf.len(),
            });
        }
        Ok(())
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn check(
    stored: u32,
    computed: u32,
    err: impl FnOnce(u32, u32) -> RecordError,
) -> Result<(), RecordError> {
    if stored == computed {
        Ok(())
    } else {
        Err(err(stored, computed))
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
