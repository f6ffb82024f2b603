//! Sources the binary can play besides the built-in tone.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use slotsink_audio::AudioSource;
use tracing::{debug, info, warn};

/// Headerless PCM already in the sink's sample format.
pub struct RawPcmSource {
    reader: BufReader<File>,
    finished: Arc<AtomicBool>,
    bytes_read: u64,
}

impl RawPcmSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        info!("Playing raw PCM from {}", path.display());
        Ok(Self {
            reader: BufReader::new(file),
            finished: Arc::new(AtomicBool::new(false)),
            bytes_read: 0,
        })
    }

    /// Set once the file has been read to the end.
    pub fn finished(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl AudioSource for RawPcmSource {
    fn pull(&mut self, n_bytes: usize) -> Option<Bytes> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        let mut buf = BytesMut::zeroed(n_bytes);
        let filled = match self.read_up_to(&mut buf) {
            Ok(filled) => filled,
            Err(e) => {
                warn!("Read failed, treating as end of data: {e}");
                0
            }
        };
        self.bytes_read += filled as u64;

        if filled < n_bytes {
            debug!("End of input after {} bytes", self.bytes_read);
            self.finished.store(true, Ordering::Relaxed);
        }
        if filled == 0 {
            return None;
        }
        buf.truncate(filled);
        Some(buf.freeze())
    }

    fn process_rewind(&mut self) {
        // Already-read data cannot be returned to the file; nothing is buffered.
        debug!("Rewind at byte {}", self.bytes_read);
    }
}
