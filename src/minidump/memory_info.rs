//! Iterator over the variable-stride entries of a memory info list.

use super::format::MemoryInfo;
use object::pod;
use std::iter::FusedIterator;
use std::mem::size_of;

/// Lazy iterator over [`MemoryInfo`] entries.
///
/// The iterator is just `(remaining bytes, stride)`, so cloning it restarts
/// iteration from the current position. Each entry may be wider than
/// [`MemoryInfo`]; only the known prefix is decoded. A stride narrower than
/// [`MemoryInfo`] yields nothing.
#[derive(Debug, Clone)]
pub struct MemoryInfoIter<'data> {
    data: &'data [u8],
    stride: usize,
}

impl<'data> MemoryInfoIter<'data> {
    pub fn new(data: &'data [u8], stride: usize) -> Self {
        Self { data, stride }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl<'data> Iterator for MemoryInfoIter<'data> {
    type Item = &'data MemoryInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stride < size_of::<MemoryInfo>() || self.data.len() < self.stride {
            return None;
        }
        let (entry, _) = pod::from_bytes::<MemoryInfo>(self.data).ok()?;
        self.data = &self.data[self.stride..];
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.stride < size_of::<MemoryInfo>() {
            0
        } else {
            self.data.len() / self.stride
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MemoryInfoIter<'_> {}

impl FusedIterator for MemoryInfoIter<'_> {}
