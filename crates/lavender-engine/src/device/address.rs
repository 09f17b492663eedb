use std::collections::BTreeMap;

use super::backend::{BufferId, GpuAddress};

/// First address handed out. Zero stays invalid.
const ADDRESS_BASE: u64 = 0x1_0000_0000;

/// Buffer starts are page aligned and separated by one unmapped page.
const PAGE_SIZE: u64 = 64 * 1024;

#[derive(Debug, Copy, Clone)]
struct Range {
    buffer: BufferId,
    length: u64,
}

/// Emulated buffer virtual address space.
///
/// Hands out non-overlapping address ranges and resolves an address back to
/// `(buffer, offset)`. Ranges are never reused, so a stale address always
/// fails to resolve rather than aliasing a newer buffer.
#[derive(Debug)]
pub(crate) struct AddressSpace {
    next: u64,
    ranges: BTreeMap<u64, Range>,
}

impl AddressSpace {
    pub(crate) fn new() -> Self {
        Self {
            next: ADDRESS_BASE,
            ranges: BTreeMap::new(),
        }
    }

    pub(crate) fn reserve(&mut self, buffer: BufferId, length: u64) -> GpuAddress {
        let base = self.next;
        let span = length.max(1).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        self.next = base + span + PAGE_SIZE;
        self.ranges.insert(base, Range { buffer, length });
        GpuAddress(base)
    }

    pub(crate) fn release(&mut self, base: GpuAddress) {
        self.ranges.remove(&base.0);
    }

    /// Returns the buffer containing `address` and the offset into it,
    /// provided `len` bytes fit before the end of the range.
    pub(crate) fn resolve_span(&self, address: GpuAddress, len: u64) -> Option<(BufferId, u64)> {
        let (&base, range) = self.ranges.range(..=address.0).next_back()?;
        let offset = address.0 - base;
        (offset + len <= range.length && (len > 0 || offset < range.length))
            .then_some((range.buffer, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_do_not_overlap() {
        let mut space = AddressSpace::new();
        let a = space.reserve(BufferId(0), 100_000);
        let b = space.reserve(BufferId(1), 16);
        assert!(b.0 >= a.0 + 100_000);
        assert_eq!(a.0 % PAGE_SIZE, 0);
        assert_eq!(b.0 % PAGE_SIZE, 0);
    }

    #[test]
    fn resolves_interior_offsets() {
        let mut space = AddressSpace::new();
        let a = space.reserve(BufferId(7), 1024);
        assert_eq!(space.resolve_span(a.offset(512), 1), Some((BufferId(7), 512)));
        assert_eq!(space.resolve_span(a.offset(1024), 1), None);
        assert_eq!(space.resolve_span(GpuAddress(0), 1), None);
    }

    #[test]
    fn released_range_no_longer_resolves() {
        let mut space = AddressSpace::new();
        let a = space.reserve(BufferId(1), 64);
        space.release(a);
        assert_eq!(space.resolve_span(a, 1), None);
        let b = space.reserve(BufferId(2), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn span_must_fit() {
        let mut space = AddressSpace::new();
        let a = space.reserve(BufferId(3), 256);
        assert_eq!(space.resolve_span(a.offset(192), 64), Some((BufferId(3), 192)));
        assert_eq!(space.resolve_span(a.offset(200), 64), None);
    }
}
