//! Byte-addressable mutable storage backing every other component.

use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ByteSourceError {
    #[error("offset {offset} is out of range for a file of length {len}")]
    OutOfRange { offset: u64, len: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract byte-addressable mutable store over the target file.
///
/// Out-of-range reads return zero and record no error; out-of-range writes
/// fail with [`ByteSourceError::OutOfRange`]. Writes are observable to
/// subsequent reads on the same instance. Reads are safe to issue from any
/// thread; writes must be serialized by the caller.
pub trait ByteSource {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_u8(&self, offset: u64) -> u8;

    /// Fills `buf` from `offset`. Bytes past the end of the file read as
    /// zero, matching `read_u8`'s out-of-range policy.
    fn read_into(&self, offset: u64, buf: &mut [u8]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_u8(offset + i as u64);
        }
    }

    fn write_u8(&mut self, offset: u64, value: u8) -> Result<(), ByteSourceError>;

    fn flush(&mut self) -> Result<(), ByteSourceError>;
}

/// A [`ByteSource`] backed by a memory-mapped file, so read/write cost is
/// independent of file size.
pub struct MmapByteSource {
    mmap: MmapMut,
}

impl MmapByteSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ByteSourceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(MmapByteSource { mmap })
    }

    /// Build a source over an in-memory buffer copied to a temp file. Useful
    /// for tests and for hosts that want to operate on a scratch copy.
    pub fn from_bytes_in(dir: &Path, bytes: &[u8]) -> Result<(Self, std::path::PathBuf), ByteSourceError> {
        let path = dir.join("binrecon-bytesource.bin");
        std::fs::write(&path, bytes)?;
        let source = Self::open(&path)?;
        Ok((source, path))
    }
}

impl ByteSource for MmapByteSource {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_u8(&self, offset: u64) -> u8 {
        if offset >= self.len() {
            return 0;
        }
        self.mmap[offset as usize]
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) {
        let len = self.len();
        for (i, slot) in buf.iter_mut().enumerate() {
            let off = offset + i as u64;
            *slot = if off < len { self.mmap[off as usize] } else { 0 };
        }
    }

    fn write_u8(&mut self, offset: u64, value: u8) -> Result<(), ByteSourceError> {
        let len = self.len();
        if offset >= len {
            return Err(ByteSourceError::OutOfRange { offset, len });
        }
        self.mmap[offset as usize] = value;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ByteSourceError> {
        self.mmap.flush()?;
        Ok(())
    }
}

/// A simple `Vec<u8>`-backed source, for small inputs or tests where a
/// memory map is unnecessary overhead.
pub struct BufferByteSource {
    buf: Vec<u8>,
}

impl BufferByteSource {
    pub fn new(buf: Vec<u8>) -> Self {
        BufferByteSource { buf }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl ByteSource for BufferByteSource {
    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn read_u8(&self, offset: u64) -> u8 {
        self.buf.get(offset as usize).copied().unwrap_or(0)
    }

    fn write_u8(&mut self, offset: u64, value: u8) -> Result<(), ByteSourceError> {
        let len = self.len();
        match self.buf.get_mut(offset as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ByteSourceError::OutOfRange { offset, len }),
        }
    }

    fn flush(&mut self) -> Result<(), ByteSourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_write_then_read_is_observable() {
        let mut source = BufferByteSource::new(vec![0u8; 8]);
        source.write_u8(3, 0xAB).unwrap();
        assert_eq!(source.read_u8(3), 0xAB);
    }

    #[test]
    fn out_of_range_read_is_zero_out_of_range_write_errors() {
        let mut source = BufferByteSource::new(vec![1u8; 4]);
        assert_eq!(source.read_u8(100), 0);
        assert!(matches!(
            source.write_u8(100, 1),
            Err(ByteSourceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn mmap_source_roundtrips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut source, path) = MmapByteSource::from_bytes_in(dir.path(), &[0u8; 16]).unwrap();
        source.write_u8(5, 0x42).unwrap();
        source.flush().unwrap();
        assert_eq!(source.read_u8(5), 0x42);

        let reopened = MmapByteSource::open(&path).unwrap();
        assert_eq!(reopened.read_u8(5), 0x42);
    }
}
