/*!
 * Append-Only Command Buffer
 *
 * The single output buffer the whole run writes into. Growth is geometric
 * while the buffer is small and switches to fixed linear increments past a
 * threshold, which bounds worst-case over-allocation on very large logs
 * while keeping appends amortized O(1) below it.
 */

use crate::error::{Error, Result};

/// Initial allocation size.
pub const INITIAL_ALLOC: usize = 32 * 1024;

/// Above this size, growth adds a fixed increment instead of doubling.
pub const MAX_PREALLOC: usize = 1024 * 1024;

/// Append-only byte buffer holding RESP-encoded commands.
///
/// Tracks how many commands have been written so the driver can report
/// compaction statistics without re-parsing its own output.
#[derive(Debug)]
pub struct CmdBuffer {
    buf: Vec<u8>,
    cmd_count: u64,
}

impl CmdBuffer {
    /// Create a buffer with the standard initial capacity.
    pub fn new() -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(INITIAL_ALLOC)?;
        Ok(Self { buf, cmd_count: 0 })
    }

    /// Append raw bytes, growing the buffer if needed.
    ///
    /// Never reorders or shrinks; on growth failure the buffer is left
    /// untouched and `Error::OutOfMemory` is returned.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.buf.len() + data.len() > self.buf.capacity() {
            self.grow(data.len())?;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn grow(&mut self, addlen: usize) -> Result<()> {
        let target = growth_target(self.buf.len(), addlen)?;
        self.buf.try_reserve_exact(target - self.buf.len())?;
        Ok(())
    }

    /// Pre-reserve room for `additional` bytes beyond the current length.
    ///
    /// Used before finalization, when the tables know how much string data
    /// they are about to emit.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.buf.try_reserve(additional)?;
        Ok(())
    }

    /// Count `n` more commands as present in the buffer.
    #[inline]
    pub fn add_commands(&mut self, n: u64) {
        self.cmd_count += n;
    }

    /// Number of commands written so far.
    #[inline]
    pub fn commands(&self) -> u64 {
        self.cmd_count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Drop all content and reset the command count. Capacity is kept.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.cmd_count = 0;
    }

    /// Consume the buffer, yielding the raw bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Capacity to grow to when `addlen` more bytes must fit after `len`.
///
/// Below [`MAX_PREALLOC`] the requested size is doubled; at or above it a
/// fixed [`MAX_PREALLOC`] increment is added instead.
fn growth_target(len: usize, addlen: usize) -> Result<usize> {
    let required = len.checked_add(addlen).ok_or(Error::OutOfMemory)?;
    if required < MAX_PREALLOC {
        Ok(required * 2)
    } else {
        required.checked_add(MAX_PREALLOC).ok_or(Error::OutOfMemory)
    }
}
