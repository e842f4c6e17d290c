use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use flvaac::process::session::{AbortHook, ByteSource};
use flvaac::utils::errors::StreamError;
use indicatif::ProgressBar;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
    len: Option<u64>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let (reader, len): (Box<dyn Read>, _) = if is_pipe {
            (Box::new(io::stdin().lock()), None)
        } else {
            let file = File::open(input_path)?;
            let len = file.metadata().ok().map(|m| m.len());
            (Box::new(BufReader::new(file)), len)
        };

        Ok(Self {
            reader,
            is_pipe,
            len,
        })
    }

    /// Read a chunk of data into the provided buffer
    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.reader.read(buffer) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Total input size, when reading from a regular file.
    pub fn file_size(&self) -> Option<u64> {
        self.len
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.read_chunk(&mut buffer)?;
            if bytes_read == 0 {
                break; // EOF
            }

            if !callback(&buffer[..bytes_read])? {
                break; // Callback requested stop
            }
        }

        Ok(())
    }

    /// Wraps the reader as a session byte source yielding `chunk_size` reads.
    pub fn into_source(self, chunk_size: usize, pb: Option<ProgressBar>) -> ChunkSource {
        ChunkSource {
            reader: self,
            buffer: vec![0u8; chunk_size.max(1)],
            pb,
            aborted: Arc::default(),
        }
    }
}

/// Blocking reads cannot be interrupted, so an abort takes effect on the
/// next read.
pub struct ChunkSource {
    reader: InputReader,
    buffer: Vec<u8>,
    pb: Option<ProgressBar>,
    aborted: Arc<AtomicBool>,
}

impl ByteSource for ChunkSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(StreamError::Aborted("input read cancelled".into()));
        }

        let bytes_read = self.reader.read_chunk(&mut self.buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        if let Some(pb) = &self.pb {
            pb.inc(bytes_read as u64);
        }
        Ok(Some(self.buffer[..bytes_read].to_vec()))
    }

    fn abort_hook(&self) -> Option<AbortHook> {
        let aborted = self.aborted.clone();
        Some(Box::new(move || aborted.store(true, Ordering::Release)))
    }
}
