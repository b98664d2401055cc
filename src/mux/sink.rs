use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// Errors raised by sample sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("read of {size} bytes at offset {offset} exceeds the {written} bytes written")]
    ReadOutOfBounds {
        offset: u64,
        size: u64,
        written: u64,
    },
    #[error("byte range at offset {offset} with size {size} overflows")]
    RangeOverflow { offset: u64, size: u64 },
}

/// Where written sample payload bytes physically live.
///
/// Writes are append-only; reads are random-access over the bytes already
/// written and must not disturb the write position.
pub trait SampleSink {
    /// Appends the whole buffer at the current write position.
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Reads `size` bytes starting at `offset`. A `size` of 0 reads to the
    /// end of the written data. Ranges past the written data are rejected.
    fn read(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, SinkError>;

    /// Total number of bytes written so far.
    fn bytes_written(&self) -> u64;
}

/// Validates a read range against the written total and resolves the
/// effective size (a zero `size` means "to the end").
fn checked_read_range(offset: u64, size: u64, written: u64) -> Result<u64, SinkError> {
    if size == 0 {
        if offset > written {
            return Err(SinkError::ReadOutOfBounds {
                offset,
                size,
                written,
            });
        }
        return Ok(written - offset);
    }
    let end = offset
        .checked_add(size)
        .ok_or(SinkError::RangeOverflow { offset, size })?;
    if end > written {
        return Err(SinkError::ReadOutOfBounds {
            offset,
            size,
            written,
        });
    }
    Ok(size)
}

/// A growable in-memory sample sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    data: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl SampleSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, SinkError> {
        let size = checked_read_range(offset, size, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data[start..start + size as usize].to_vec())
    }

    fn bytes_written(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A file-backed sample sink. The file handle must be readable as well as
/// writable so that already-written bytes can be re-read.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    written: u64,
}

impl FileSink {
    /// Creates (or truncates) a file at `path` opened read+write.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, written: 0 })
    }

    /// Wraps an empty file handle opened read+write, positioned at the start.
    pub fn from_file(file: File) -> Self {
        Self { file, written: 0 }
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

impl SampleSink for FileSink {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn read(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, SinkError> {
        let size = checked_read_range(offset, size, self.written)?;

        // jump to the requested range, then restore the write position
        self.file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; size as usize];
        let result = self.file.read_exact(&mut data);
        self.file.seek(SeekFrom::Start(self.written))?;
        result?;

        Ok(data)
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_sink<S: SampleSink>(mut sink: S) {
        sink.write(b"hello ").unwrap();
        sink.write(b"world").unwrap();
        assert_eq!(sink.bytes_written(), 11);

        assert_eq!(sink.read(0, 5).unwrap(), b"hello");
        assert_eq!(sink.read(6, 5).unwrap(), b"world");
        // size 0 reads to the end of the written data
        assert_eq!(sink.read(6, 0).unwrap(), b"world");
        assert_eq!(sink.read(11, 0).unwrap(), b"");

        // reads must not disturb the write position
        sink.write(b"!").unwrap();
        assert_eq!(sink.read(0, 0).unwrap(), b"hello world!");

        assert!(matches!(
            sink.read(6, 7),
            Err(SinkError::ReadOutOfBounds { .. })
        ));
        assert!(matches!(
            sink.read(13, 0),
            Err(SinkError::ReadOutOfBounds { .. })
        ));
        assert!(matches!(
            sink.read(u64::MAX, 2),
            Err(SinkError::RangeOverflow { .. })
        ));
    }

    #[test]
    fn test_memory_sink() {
        exercise_sink(MemorySink::new());
    }

    #[test]
    fn test_file_sink() {
        let file = tempfile::tempfile().unwrap();
        exercise_sink(FileSink::from_file(file));
    }

    #[test]
    fn test_file_sink_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::create(dir.path().join("payload.bin")).unwrap();
        sink.write(b"abc").unwrap();
        assert_eq!(sink.read(1, 2).unwrap(), b"bc");
        assert_eq!(sink.bytes_written(), 3);
    }
}
