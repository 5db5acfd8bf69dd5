//! Size class declarations.

/// One size class of a [`PoolAllocator`](super::PoolAllocator): a slab of
/// `block_count` equal blocks of `block_size` bytes.
///
/// Classes are searched in declaration order by `allocate`, so callers
/// normally list them in ascending block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClass {
    /// Bytes per block. Must be at least the size of a pointer so the
    /// intrusive free link fits; it is rounded up to pointer alignment.
    pub block_size: usize,
    /// Number of blocks in the class's slab. Must be non-zero.
    pub block_count: usize,
}

impl PoolClass {
    /// Declares a size class.
    pub const fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
        }
    }
}

impl From<(usize, usize)> for PoolClass {
    fn from((block_size, block_count): (usize, usize)) -> Self {
        Self::new(block_size, block_count)
    }
}
