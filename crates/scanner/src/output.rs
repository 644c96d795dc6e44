//! Binary PNM output
//!
//! Color frames are written as PPM (`P6`), monochrome frames as PBM (`P4`).
//! Both formats take the streamed bytes unchanged: the scanner delivers
//! packed RGB rows in color mode, and in monochrome mode it delivers packed
//! 1-bit rows, MSB first, where a set bit is black.

use crate::session::{ReadStatus, ScanSession};
use crate::usb::Transport;
use anyhow::{Context, Result};
use protocol::{FrameShape, ScanMode};
use std::io::{self, Write};
use tracing::{debug, error, warn};

pub struct PnmWriter<W: Write> {
    inner: W,
    shape: FrameShape,
    written: u64,
}

impl<W: Write> PnmWriter<W> {
    /// Write the header for `shape` and return a writer for the pixel data
    pub fn new(mut inner: W, shape: FrameShape) -> io::Result<Self> {
        inner.write_all(Self::header(&shape).as_bytes())?;
        Ok(Self {
            inner,
            shape,
            written: 0,
        })
    }

    /// PNM header for a frame
    pub fn header(shape: &FrameShape) -> String {
        if shape.pixel_depth == 1 {
            format!("P4\n{} {}\n", shape.pixels_per_row, shape.row_count)
        } else {
            format!(
                "P6\n{} {}\n{}\n",
                shape.pixels_per_row,
                shape.row_count,
                (1u32 << shape.pixel_depth) - 1
            )
        }
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Pixel bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer
    ///
    /// A frame shorter or longer than the shape promises is kept as written.
    pub fn finish(mut self) -> io::Result<W> {
        let expected = self.shape.frame_bytes();
        if self.written != expected {
            warn!(
                "Frame has {} bytes, expected {} ({} rows of {})",
                self.written, expected, self.shape.row_count, self.shape.bytes_per_row
            );
        } else {
            debug!("Wrote complete frame ({} bytes)", self.written);
        }

        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Scan one frame in `mode` and write it to `sink` as PNM
///
/// Pulls `chunk_size` bytes at a time. A failed pull or a failed write
/// cancels the session before the error is returned. Returns the number of
/// pixel bytes written.
pub fn write_frame<T: Transport, W: Write>(
    session: &mut ScanSession<T>,
    mode: ScanMode,
    chunk_size: usize,
    sink: W,
) -> Result<u64> {
    let shape = session.start(mode).context("Failed to start scan")?;
    let mut writer = match PnmWriter::new(sink, shape) {
        Ok(writer) => writer,
        Err(e) => {
            error!("Output write failed, cancelling scan: {}", e);
            cancel_quietly(session);
            return Err(e).context("Failed to write image header");
        }
    };
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let status = match session.pull(&mut chunk) {
            Ok(status) => status,
            Err(e) => {
                cancel_quietly(session);
                return Err(e).context("Scan failed");
            }
        };

        match status {
            ReadStatus::Data(n) => {
                if let Err(e) = writer.write_chunk(&chunk[..n]) {
                    error!("Output write failed, cancelling scan: {}", e);
                    cancel_quietly(session);
                    return Err(e).context("Failed to write image data");
                }
            }
            ReadStatus::EndOfStream => break,
        }
    }

    let written = writer.written();
    writer.finish().context("Failed to flush image data")?;
    Ok(written)
}

fn cancel_quietly<T: Transport>(session: &mut ScanSession<T>) {
    if let Err(e) = session.cancel() {
        warn!("Cancel failed: {}", e);
    }
}
