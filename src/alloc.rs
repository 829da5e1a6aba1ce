//! Aligned tensor buffers
//!
//! NCHWc tensors are consumed with SIMD-width loads, so their backing
//! buffers are aligned to the widest vector register the engine targets
//! (64 bytes, one AVX-512 register / one cache line). Allocation failure is
//! surfaced as [`Error::OutOfMemory`] at allocation time; it can never occur
//! inside a dispatch, which performs no heap allocation.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::platform::block_size;

/// Alignment of NCHWc tensor buffers in bytes.
pub const BUFFER_ALIGNMENT: usize = 64;

/// Number of elements a blocked tensor with the given channel count and
/// per-channel spatial size occupies.
///
/// Blocked tensors round the channel count up to the next multiple of the
/// platform block size; the padding channels exist in memory and are
/// written with zeros by the reorder that produces the blocked layout.
pub fn nchwc_buffer_len(batch: usize, channels: usize, spatial_size: usize) -> usize {
    let bs = block_size();
    batch * channels.div_ceil(bs) * bs * spatial_size
}

/// An owning, zero-initialized f32 buffer aligned for NCHWc kernels.
pub struct AlignedBuffer {
    ptr: NonNull<f32>,
    len: usize,
}

impl AlignedBuffer {
    /// Allocate a zero-initialized buffer of `len` elements.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }

        let size = len * std::mem::size_of::<f32>();
        let layout = Layout::from_size_align(size, BUFFER_ALIGNMENT)
            .map_err(|_| Error::invalid_argument("len", format!("invalid buffer size {size}")))?;

        let ptr = unsafe { alloc_zeroed(layout) };
        match NonNull::new(ptr as *mut f32) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(Error::OutOfMemory { size }),
        }
    }

    /// Allocate a buffer holding a copy of `values`.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        let mut buffer = Self::zeroed(values.len())?;
        buffer.copy_from_slice(values);
        Ok(buffer)
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for AlignedBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.len != 0 {
            let size = self.len * std::mem::size_of::<f32>();
            let layout = Layout::from_size_align(size, BUFFER_ALIGNMENT)
                .expect("layout was validated at allocation time");
            unsafe {
                dealloc(self.ptr.as_ptr() as *mut u8, layout);
            }
        }
    }
}

// The buffer uniquely owns its allocation.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_alignment() {
        let buffer = AlignedBuffer::zeroed(1024).unwrap();
        assert_eq!(buffer.len(), 1024);
        assert_eq!(buffer.as_ptr() as usize % BUFFER_ALIGNMENT, 0);
        assert!(buffer.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = AlignedBuffer::zeroed(0).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_from_slice() {
        let buffer = AlignedBuffer::from_slice(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(&buffer[..], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_nchwc_buffer_len_rounds_channels() {
        let bs = block_size();
        // One channel rounds up to a full block.
        assert_eq!(nchwc_buffer_len(1, 1, 10), bs * 10);
        // Exact multiples are unchanged.
        assert_eq!(nchwc_buffer_len(2, 2 * bs, 5), 2 * 2 * bs * 5);
    }
}
