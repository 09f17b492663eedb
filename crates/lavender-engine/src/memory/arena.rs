use std::marker::PhantomData;

use bytemuck::Pod;

use super::{align_up, ArenaError};
use crate::device::{
    AllocationId, BufferAllocation, BufferDesc, BufferUsage, GpuAddress, GpuDevice, StorageMode,
};

/// Buffer writes must start and end on this boundary.
const COPY_ALIGNMENT: u64 = 4;

/// Creation parameters for an [`AlignedArena`].
#[derive(Debug, Clone)]
pub struct ArenaDesc<'a> {
    pub label: &'a str,
    pub count: usize,
    /// Element start alignment in bytes. Must be a power of two.
    pub alignment: u64,
    pub storage: StorageMode,
    /// Raw stride before alignment. Defaults to `size_of::<T>()`.
    pub stride: Option<u64>,
    /// Bytes reserved in front of element 0.
    pub base_offset: u64,
}

impl<'a> ArenaDesc<'a> {
    pub fn new(label: &'a str, count: usize) -> Self {
        Self {
            label,
            count,
            alignment: 256,
            storage: StorageMode::Shared,
            stride: None,
            base_offset: 0,
        }
    }

    pub fn alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }
}

/// Fixed-capacity GPU buffer sliced into `count` equally strided elements.
///
/// CPU writes land in a shadow copy and reach the device on
/// [`flush`](Self::flush). The shadow grows only as far as the highest
/// element written, so large arenas cost CPU memory in proportion to use.
#[derive(Debug)]
pub struct AlignedArena<T: Pod> {
    allocation: BufferAllocation,
    count: usize,
    alignment: u64,
    stride: u64,
    base_offset: u64,
    shadow: Option<Vec<u8>>,
    dirty: Option<(u64, u64)>,
    _marker: PhantomData<T>,
}

impl<T: Pod> AlignedArena<T> {
    /// Shared-storage arena of `count` elements aligned to `alignment`.
    pub fn create(
        device: &dyn GpuDevice,
        label: &str,
        count: usize,
        alignment: u64,
    ) -> Result<Self, ArenaError> {
        Self::with_desc(device, &ArenaDesc::new(label, count).alignment(alignment))
    }

    pub fn with_desc(device: &dyn GpuDevice, desc: &ArenaDesc<'_>) -> Result<Self, ArenaError> {
        let size = size_of::<T>();
        let raw = desc.stride.unwrap_or(size as u64);
        if raw < size as u64 {
            return Err(ArenaError::InvalidStride { stride: raw, size });
        }
        let stride = aligned_stride(raw, desc.alignment)?;

        let body = align_up(stride * desc.count.max(1) as u64, desc.alignment);
        let total = align_up(body + desc.base_offset, COPY_ALIGNMENT);

        let allocation = device.create_buffer(&BufferDesc {
            label: desc.label,
            size: total,
            usage: BufferUsage::Uniform,
            storage: desc.storage,
        })?;

        log::debug!(
            "arena '{}': {} x {} bytes (stride {}), {} bytes total",
            desc.label,
            desc.count,
            size,
            stride,
            total
        );

        Ok(Self {
            allocation,
            count: desc.count,
            alignment: desc.alignment,
            stride,
            base_offset: desc.base_offset,
            shadow: (desc.storage == StorageMode::Shared).then(Vec::new),
            dirty: None,
            _marker: PhantomData,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn allocation(&self) -> &BufferAllocation {
        &self.allocation
    }

    pub fn allocation_id(&self) -> AllocationId {
        self.allocation.allocation_id()
    }

    pub fn byte_length(&self) -> u64 {
        self.allocation.length
    }

    pub fn byte_offset(&self, index: usize) -> Result<u64, ArenaError> {
        if index >= self.count {
            return Err(ArenaError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(self.base_offset + index as u64 * self.stride)
    }

    pub fn gpu_address(&self, index: usize) -> Result<GpuAddress, ArenaError> {
        Ok(self.allocation.gpu_address.offset(self.byte_offset(index)?))
    }

    pub fn write(&mut self, index: usize, value: &T) -> Result<(), ArenaError> {
        let offset = self.byte_offset(index)?;
        self.write_bytes(offset, bytemuck::bytes_of(value))
    }

    /// Reads back the CPU copy. Elements never written read as zeroed.
    pub fn read(&self, index: usize) -> Result<T, ArenaError> {
        let offset = self.byte_offset(index)? as usize;
        let shadow = self.shadow.as_ref().ok_or(ArenaError::AccessDenied)?;
        let size = size_of::<T>();
        if offset + size <= shadow.len() {
            return Ok(bytemuck::pod_read_unaligned(&shadow[offset..offset + size]));
        }
        let mut bytes = vec![0u8; size];
        if offset < shadow.len() {
            let n = shadow.len() - offset;
            bytes[..n].copy_from_slice(&shadow[offset..]);
        }
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Uploads every byte written since the last flush.
    pub fn flush(&mut self, device: &dyn GpuDevice) -> Result<(), ArenaError> {
        let Some((lo, hi)) = self.dirty.take() else {
            return Ok(());
        };
        let Some(shadow) = self.shadow.as_mut() else {
            return Ok(());
        };
        let lo = lo / COPY_ALIGNMENT * COPY_ALIGNMENT;
        let hi = align_up(hi, COPY_ALIGNMENT).min(self.allocation.length);
        if shadow.len() < hi as usize {
            shadow.resize(hi as usize, 0);
        }
        device.write_buffer(self.allocation.id, lo, &shadow[lo as usize..hi as usize])?;
        Ok(())
    }

    pub fn release(self, device: &dyn GpuDevice) {
        device.release_buffer(self.allocation.id);
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<(), ArenaError> {
        let shadow = self.shadow.as_mut().ok_or(ArenaError::AccessDenied)?;
        let start = offset as usize;
        let end = start + bytes.len();
        if shadow.len() < end {
            shadow.resize(end, 0);
        }
        shadow[start..end].copy_from_slice(bytes);

        let end = end as u64;
        self.dirty = Some(match self.dirty {
            Some((lo, hi)) => (lo.min(offset), hi.max(end)),
            None => (offset, end),
        });
        Ok(())
    }
}

/// Stride of an element of `raw` bytes under `alignment`.
pub fn aligned_stride(raw: u64, alignment: u64) -> Result<u64, ArenaError> {
    if !alignment.is_power_of_two() {
        return Err(ArenaError::InvalidAlignment(alignment));
    }
    Ok(align_up(raw.max(1), alignment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    #[repr(C)]
    #[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pair {
        a: u32,
        b: f32,
    }

    #[repr(C)]
    #[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Wide {
        head: [f32; 64],
        tail: [f32; 16],
    }

    // ── stride ────────────────────────────────────────────────────────────

    #[test]
    fn stride_is_aligned_and_covers_element() {
        for alignment in [1u64, 2, 4, 16, 64, 256, 4096] {
            for size in [1u64, 3, 8, 48, 64, 104, 320, 1000] {
                let stride = aligned_stride(size, alignment).unwrap();
                assert_eq!(stride % alignment, 0, "size {size} align {alignment}");
                assert!(stride >= size);
                assert!(stride < size + alignment);
            }
        }
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let dev = HeadlessDevice::new();
        let err = AlignedArena::<Pair>::create(&dev, "bad", 4, 24).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidAlignment(24)));
    }

    #[test]
    fn rejects_stride_smaller_than_element() {
        let dev = HeadlessDevice::new();
        let desc = ArenaDesc {
            stride: Some(4),
            ..ArenaDesc::new("narrow", 4)
        };
        let err = AlignedArena::<Pair>::with_desc(&dev, &desc).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidStride { stride: 4, size: 8 }));
    }

    #[test]
    fn large_elements_span_several_alignment_units() {
        let dev = HeadlessDevice::new();
        let arena = AlignedArena::<Wide>::create(&dev, "wide", 3, 256).unwrap();
        assert_eq!(arena.stride(), 512);
        assert_eq!(arena.byte_length(), 1536);
    }

    // ── offsets & addresses ───────────────────────────────────────────────

    #[test]
    fn byte_offset_at_count_is_out_of_range() {
        let dev = HeadlessDevice::new();
        let arena = AlignedArena::<Pair>::create(&dev, "pairs", 8, 256).unwrap();
        assert_eq!(arena.byte_offset(7).unwrap(), 7 * 256);
        assert!(matches!(
            arena.byte_offset(8),
            Err(ArenaError::IndexOutOfRange { index: 8, count: 8 })
        ));
    }

    #[test]
    fn base_offset_shifts_every_element() {
        let dev = HeadlessDevice::new();
        let desc = ArenaDesc {
            base_offset: 64,
            ..ArenaDesc::new("shifted", 2).alignment(16)
        };
        let arena = AlignedArena::<Pair>::with_desc(&dev, &desc).unwrap();
        assert_eq!(arena.byte_offset(0).unwrap(), 64);
        assert_eq!(arena.byte_offset(1).unwrap(), 80);
        assert!(arena.byte_length() >= 64 + 32);
    }

    #[test]
    fn addresses_increase_with_index() {
        let dev = HeadlessDevice::new();
        let arena = AlignedArena::<Pair>::create(&dev, "pairs", 16, 256).unwrap();
        let base = arena.allocation().gpu_address;
        assert_eq!(arena.gpu_address(0).unwrap(), base);
        for i in 1..16 {
            let prev = arena.gpu_address(i - 1).unwrap();
            let cur = arena.gpu_address(i).unwrap();
            assert_eq!(cur.0 - prev.0, 256);
        }
    }

    // ── access ────────────────────────────────────────────────────────────

    #[test]
    fn write_then_read() {
        let dev = HeadlessDevice::new();
        let mut arena = AlignedArena::<Pair>::create(&dev, "pairs", 4, 256).unwrap();
        arena.write(2, &Pair { a: 9, b: 1.5 }).unwrap();
        assert_eq!(arena.read(2).unwrap(), Pair { a: 9, b: 1.5 });
        assert_eq!(arena.read(3).unwrap(), Pair { a: 0, b: 0.0 });
    }

    #[test]
    fn failed_writes_report_and_leave_arena_clean() {
        let dev = HeadlessDevice::new();
        let mut arena = AlignedArena::<Pair>::create(&dev, "pairs", 4, 256).unwrap();
        let err = arena.write(4, &Pair { a: 1, b: 1.0 }).unwrap_err();
        assert!(matches!(err, ArenaError::IndexOutOfRange { index: 4, count: 4 }));
        assert!(!arena.is_dirty());
        assert!(matches!(arena.read(4), Err(ArenaError::IndexOutOfRange { .. })));
    }

    #[test]
    fn private_storage_denies_cpu_access() {
        let dev = HeadlessDevice::new();
        let desc = ArenaDesc::new("gpu-only", 4).storage(StorageMode::Private);
        let mut arena = AlignedArena::<Pair>::with_desc(&dev, &desc).unwrap();
        assert!(matches!(arena.write(0, &Pair { a: 1, b: 1.0 }), Err(ArenaError::AccessDenied)));
        assert!(matches!(arena.read(0), Err(ArenaError::AccessDenied)));
        assert!(!arena.is_dirty());
        assert!(arena.gpu_address(0).is_ok());
    }

    // ── flush ─────────────────────────────────────────────────────────────

    #[test]
    fn flush_uploads_dirty_bytes_once() {
        let dev = HeadlessDevice::new();
        let mut arena = AlignedArena::<Pair>::create(&dev, "pairs", 4, 256).unwrap();
        arena.write(3, &Pair { a: 7, b: 2.0 }).unwrap();
        arena.flush(&dev).unwrap();
        assert!(!arena.is_dirty());

        let bytes = dev.read_address(arena.gpu_address(3).unwrap(), 8).unwrap();
        let back: Pair = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(back, Pair { a: 7, b: 2.0 });
    }

    #[test]
    fn flush_without_writes_is_a_no_op() {
        let dev = HeadlessDevice::new();
        let mut arena = AlignedArena::<Pair>::create(&dev, "pairs", 4, 256).unwrap();
        let id = arena.allocation().id;
        dev.release_buffer(id);
        // Nothing dirty, so the dead buffer is never touched.
        arena.flush(&dev).unwrap();
    }
}
