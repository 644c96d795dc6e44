//! Streaming read buffer
//!
//! Turns the scan script's bulk reads into a pull-based byte stream. Each
//! pull hands out at most as many bytes as the destination holds; whatever a
//! bulk read staged beyond that stays in the working buffer and is served by
//! later pulls without touching the device again.

use crate::error::{Phase, Result};
use crate::interpreter::{Interpreter, Outcome};
use crate::usb::Transport;
use protocol::TransferRecord;
use tracing::{trace, warn};

/// Resumable read position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCursor {
    /// Bytes staged but not yet delivered
    pub available: usize,
    /// Read position of the staged bytes within the working buffer
    pub offset: usize,
    /// Index of the next record to execute in the scan script
    pub position: usize,
}

/// Result of one pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// This many bytes were copied into the destination
    Delivered(usize),
    /// The scan script has no more records and nothing is staged
    Exhausted,
}

#[derive(Debug, Default)]
pub struct StreamBuffer {
    cursor: StreamCursor,
    invert: bool,
}

impl StreamBuffer {
    pub fn new(invert: bool) -> Self {
        Self {
            cursor: StreamCursor::default(),
            invert,
        }
    }

    /// Rewind to the start of a new scan
    pub fn reset(&mut self, invert: bool) {
        self.cursor = StreamCursor::default();
        self.invert = invert;
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    /// Deliver the next bytes of the stream into `dest`
    ///
    /// Staged bytes are served first. With nothing staged, records of
    /// `script` run from the cursor position until a bulk read stages data or
    /// the script runs out. An empty `dest` delivers nothing and leaves the
    /// cursor untouched.
    ///
    /// Any failed record ends the stream with an error; the cursor has
    /// already moved past it.
    pub fn pull<T: Transport>(
        &mut self,
        interpreter: &mut Interpreter<T>,
        script: &[TransferRecord],
        dest: &mut [u8],
    ) -> Result<Advance> {
        if dest.is_empty() {
            return Ok(Advance::Delivered(0));
        }

        loop {
            if self.cursor.available > 0 {
                let n = self.cursor.available.min(dest.len());
                let out = &mut dest[..n];
                out.copy_from_slice(interpreter.staged(self.cursor.offset, n));
                if self.invert {
                    for byte in out.iter_mut() {
                        *byte = !*byte;
                    }
                }

                self.cursor.offset += n;
                self.cursor.available -= n;
                trace!("Delivered {} bytes, {} still staged", n, self.cursor.available);
                return Ok(Advance::Delivered(n));
            }

            let index = self.cursor.position;
            let Some(record) = script.get(index) else {
                return Ok(Advance::Exhausted);
            };
            self.cursor.position += 1;

            match interpreter.execute(record) {
                Outcome::Failed(failure) => {
                    return Err(failure.into_error(Phase::Scan, index, record.kind()));
                }
                outcome => {
                    if let Outcome::Partial {
                        transferred,
                        expected,
                    } = &outcome
                    {
                        warn!(
                            "scan record {} ({}): short transfer, {} of {} bytes",
                            index,
                            record.kind(),
                            transferred,
                            expected
                        );
                    }

                    if let TransferRecord::BulkRead { .. } = record {
                        self.cursor.available = outcome.transferred();
                        self.cursor.offset = 0;
                    }
                }
            }
        }
    }
}
