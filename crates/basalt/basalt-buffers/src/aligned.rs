use crate::AtomicBuffer;

/// Owned heap memory with 8-byte alignment, for command encoding scratch and
/// tests. Capacity is rounded up to the next multiple of 8.
pub struct AlignedBuffer {
    words: Box<[u64]>,
}

impl AlignedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let words = capacity.div_ceil(8);
        Self {
            words: vec![0u64; words].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    /// A view over the whole allocation. Valid for as long as `self` lives.
    pub fn buffer(&mut self) -> AtomicBuffer {
        // SAFETY: the boxed slice is 8-byte aligned, lives as long as self,
        // and the view covers exactly the allocation.
        unsafe { AtomicBuffer::wrap(self.words.as_mut_ptr() as *mut u8, self.words.len() * 8) }
    }
}
