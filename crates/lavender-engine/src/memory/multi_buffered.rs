use bytemuck::Pod;

use super::{AlignedArena, ArenaError};
use crate::device::{AllocationId, GpuAddress, GpuDevice};

/// How much of a [`MultiBufferedArena`] slot a single frame owns.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DynamicScope {
    /// One set of `element_count` elements per frame.
    PerFrame,
    /// One set of `element_count` elements per draw, up to `max_draws_per_frame`.
    PerInstance { max_draws_per_frame: usize },
}

impl DynamicScope {
    fn instances(self) -> usize {
        match self {
            DynamicScope::PerFrame => 1,
            DynamicScope::PerInstance { max_draws_per_frame } => max_draws_per_frame,
        }
    }
}

/// Location of one instance block inside a [`MultiBufferedArena`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Slice {
    pub frame_index: usize,
    pub instance_index: usize,
}

impl Slice {
    pub fn frame(frame_index: usize) -> Self {
        Self {
            frame_index,
            instance_index: 0,
        }
    }

    pub fn instance(frame_index: usize, instance_index: usize) -> Self {
        Self {
            frame_index,
            instance_index,
        }
    }
}

/// One [`AlignedArena`] per frame in flight.
///
/// Frame slot `f` is only ever written while recording a frame whose number
/// is `f` modulo the slot count, so as long as the fence wait precedes the
/// write the GPU never reads a slot the CPU is filling.
#[derive(Debug)]
pub struct MultiBufferedArena<T: Pod> {
    label: String,
    scope: DynamicScope,
    element_count: usize,
    alignment: u64,
    slots: Vec<AlignedArena<T>>,
    instance_capacity: Vec<usize>,
}

impl<T: Pod> MultiBufferedArena<T> {
    pub fn create(
        device: &dyn GpuDevice,
        label: &str,
        frames_in_flight: usize,
        scope: DynamicScope,
        element_count: usize,
        alignment: u64,
    ) -> Result<Self, ArenaError> {
        if frames_in_flight == 0 {
            return Err(ArenaError::NoFrames);
        }
        let instances = scope.instances();
        let slots = (0..frames_in_flight)
            .map(|f| {
                AlignedArena::create(
                    device,
                    &format!("{label}[{f}]"),
                    element_count * instances,
                    alignment,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            label: label.to_string(),
            scope,
            element_count,
            alignment,
            slots,
            instance_capacity: vec![instances; frames_in_flight],
        })
    }

    pub fn frames(&self) -> usize {
        self.slots.len()
    }

    pub fn scope(&self) -> DynamicScope {
        self.scope
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Instance blocks available in `frame_index`'s slot.
    pub fn instance_capacity(&self, frame_index: usize) -> Result<usize, ArenaError> {
        self.check_frame(frame_index)?;
        Ok(self.instance_capacity[frame_index])
    }

    pub fn arena(&self, frame_index: usize) -> Result<&AlignedArena<T>, ArenaError> {
        self.check_frame(frame_index)?;
        Ok(&self.slots[frame_index])
    }

    pub fn address_at(&self, slice: Slice, offset_index: usize) -> Result<GpuAddress, ArenaError> {
        let index = self.flat_index(slice, offset_index)?;
        self.slots[slice.frame_index].gpu_address(index)
    }

    pub fn write_at(&mut self, slice: Slice, offset_index: usize, value: &T) -> Result<(), ArenaError> {
        let index = self.flat_index(slice, offset_index)?;
        self.slots[slice.frame_index].write(index, value)
    }

    pub fn read_at(&self, slice: Slice, offset_index: usize) -> Result<T, ArenaError> {
        let index = self.flat_index(slice, offset_index)?;
        self.slots[slice.frame_index].read(index)
    }

    /// Uploads the pending writes of one frame slot.
    pub fn flush(&mut self, device: &dyn GpuDevice, frame_index: usize) -> Result<(), ArenaError> {
        self.check_frame(frame_index)?;
        self.slots[frame_index].flush(device)
    }

    /// Backing buffers of every slot.
    pub fn allocations(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.slots.iter().map(AlignedArena::allocation_id)
    }

    /// Reallocates `frame_index`'s slot to hold at least `min_instances`
    /// instance blocks, doubling the current capacity when that is larger.
    ///
    /// Other slots are left alone. Returns the retired arena so the caller can
    /// release it once no in-flight frame references it, or `None` when the
    /// slot was already large enough.
    pub fn grow_instances(
        &mut self,
        device: &dyn GpuDevice,
        frame_index: usize,
        min_instances: usize,
    ) -> Result<Option<AlignedArena<T>>, ArenaError> {
        self.check_frame(frame_index)?;
        let current = self.instance_capacity[frame_index];
        if min_instances <= current {
            return Ok(None);
        }
        if self.scope == DynamicScope::PerFrame {
            return Err(ArenaError::InstanceIndexOutOfRange {
                instance_index: min_instances - 1,
                capacity: current,
            });
        }

        let capacity = (current * 2).max(min_instances);
        let grown = AlignedArena::create(
            device,
            &format!("{}[{frame_index}]", self.label),
            self.element_count * capacity,
            self.alignment,
        )?;
        log::info!(
            "arena '{}' slot {}: {} -> {} instances",
            self.label,
            frame_index,
            current,
            capacity
        );

        self.instance_capacity[frame_index] = capacity;
        Ok(Some(std::mem::replace(&mut self.slots[frame_index], grown)))
    }

    fn check_frame(&self, frame_index: usize) -> Result<(), ArenaError> {
        if frame_index >= self.slots.len() {
            return Err(ArenaError::FrameIndexOutOfRange {
                frame_index,
                frames: self.slots.len(),
            });
        }
        Ok(())
    }

    fn flat_index(&self, slice: Slice, offset_index: usize) -> Result<usize, ArenaError> {
        self.check_frame(slice.frame_index)?;
        let capacity = self.instance_capacity[slice.frame_index];
        if slice.instance_index >= capacity {
            return Err(ArenaError::InstanceIndexOutOfRange {
                instance_index: slice.instance_index,
                capacity,
            });
        }
        if offset_index >= self.element_count {
            return Err(ArenaError::IndexOutOfRange {
                index: offset_index,
                count: self.element_count,
            });
        }
        Ok(slice.instance_index * self.element_count + offset_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    #[repr(C)]
    #[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Model {
        m: [f32; 16],
    }

    fn model(v: f32) -> Model {
        Model { m: [v; 16] }
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn per_frame_scope_has_one_block_per_slot() {
        let dev = HeadlessDevice::new();
        let arena =
            MultiBufferedArena::<Model>::create(&dev, "frame", 3, DynamicScope::PerFrame, 2, 256).unwrap();
        assert_eq!(arena.frames(), 3);
        assert_eq!(arena.instance_capacity(0).unwrap(), 1);
        assert_eq!(arena.arena(2).unwrap().count(), 2);
    }

    #[test]
    fn addresses_increase_with_offset_index() {
        let dev = HeadlessDevice::new();
        let scope = DynamicScope::PerInstance { max_draws_per_frame: 8 };
        let arena = MultiBufferedArena::<Model>::create(&dev, "inst", 3, scope, 4, 256).unwrap();
        for f in 0..3 {
            for i in 0..8 {
                let slice = Slice::instance(f, i);
                for o in 1..4 {
                    let prev = arena.address_at(slice, o - 1).unwrap();
                    let cur = arena.address_at(slice, o).unwrap();
                    assert!(cur > prev);
                }
            }
        }
    }

    #[test]
    fn frame_slots_never_overlap() {
        let dev = HeadlessDevice::new();
        let scope = DynamicScope::PerInstance { max_draws_per_frame: 16 };
        let arena = MultiBufferedArena::<Model>::create(&dev, "inst", 3, scope, 2, 256).unwrap();
        let ranges: Vec<(u64, u64)> = (0..3)
            .map(|f| {
                let a = arena.arena(f).unwrap().allocation();
                (a.gpu_address.0, a.gpu_address.0 + a.length)
            })
            .collect();
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(a.1 <= b.0 || b.1 <= a.0, "{a:?} overlaps {b:?}");
            }
        }
        let last = arena.address_at(Slice::instance(0, 15), 1).unwrap();
        let first_next = arena.address_at(Slice::instance(1, 0), 0).unwrap();
        assert!(last.0 + 64 <= first_next.0);
    }

    // ── access ────────────────────────────────────────────────────────────

    #[test]
    fn distinct_frames_do_not_alias_at_same_instance() {
        let dev = HeadlessDevice::new();
        let scope = DynamicScope::PerInstance { max_draws_per_frame: 128_000 };
        let mut arena = MultiBufferedArena::<Model>::create(&dev, "inst", 3, scope, 1, 256).unwrap();

        arena.write_at(Slice::instance(1, 500), 0, &model(3.0)).unwrap();
        arena.write_at(Slice::instance(0, 500), 0, &model(7.0)).unwrap();

        assert_eq!(arena.read_at(Slice::instance(1, 500), 0).unwrap(), model(3.0));
        assert_eq!(arena.read_at(Slice::instance(0, 500), 0).unwrap(), model(7.0));
        assert_ne!(
            arena.address_at(Slice::instance(1, 500), 0).unwrap(),
            arena.address_at(Slice::instance(0, 500), 0).unwrap()
        );

        arena.flush(&dev, 1).unwrap();
        let bytes = dev
            .read_address(arena.address_at(Slice::instance(1, 500), 0).unwrap(), 64)
            .unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<Model>(&bytes), model(3.0));
    }

    #[test]
    fn slice_writes_stay_in_their_slot() {
        let dev = HeadlessDevice::new();
        let mut arena =
            MultiBufferedArena::<Model>::create(&dev, "frame", 2, DynamicScope::PerFrame, 1, 256).unwrap();
        arena.write_at(Slice::frame(1), 0, &model(5.0)).unwrap();
        assert_eq!(arena.read_at(Slice::frame(1), 0).unwrap().m[0], 5.0);
        assert_eq!(arena.read_at(Slice::frame(0), 0).unwrap().m[0], 0.0);
    }

    // ── validation ────────────────────────────────────────────────────────

    #[test]
    fn out_of_range_slices_are_rejected() {
        let dev = HeadlessDevice::new();
        let scope = DynamicScope::PerInstance { max_draws_per_frame: 4 };
        let arena = MultiBufferedArena::<Model>::create(&dev, "inst", 3, scope, 2, 256).unwrap();

        assert!(matches!(
            arena.address_at(Slice::instance(3, 0), 0),
            Err(ArenaError::FrameIndexOutOfRange { frame_index: 3, frames: 3 })
        ));
        assert!(matches!(
            arena.address_at(Slice::instance(0, 4), 0),
            Err(ArenaError::InstanceIndexOutOfRange { instance_index: 4, capacity: 4 })
        ));
        assert!(matches!(
            arena.address_at(Slice::instance(0, 0), 2),
            Err(ArenaError::IndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn zero_frames_is_rejected() {
        let dev = HeadlessDevice::new();
        let err = MultiBufferedArena::<Model>::create(&dev, "none", 0, DynamicScope::PerFrame, 1, 256)
            .unwrap_err();
        assert!(matches!(err, ArenaError::NoFrames));
    }

    // ── growth ────────────────────────────────────────────────────────────

    #[test]
    fn growth_replaces_only_the_requested_slot() {
        let dev = HeadlessDevice::new();
        let scope = DynamicScope::PerInstance { max_draws_per_frame: 4 };
        let mut arena = MultiBufferedArena::<Model>::create(&dev, "inst", 3, scope, 1, 256).unwrap();
        let before: Vec<_> = arena.allocations().collect();

        let retired = arena.grow_instances(&dev, 1, 5).unwrap().unwrap();
        assert_eq!(retired.allocation_id(), before[1]);
        assert_eq!(arena.instance_capacity(1).unwrap(), 8);
        assert_eq!(arena.instance_capacity(0).unwrap(), 4);

        let after: Vec<_> = arena.allocations().collect();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_ne!(after[1], before[1]);

        arena.write_at(Slice::instance(1, 7), 0, &model(1.0)).unwrap();
        assert!(arena.grow_instances(&dev, 1, 8).unwrap().is_none());
        retired.release(&dev);
    }

    #[test]
    fn per_frame_scope_cannot_grow() {
        let dev = HeadlessDevice::new();
        let mut arena =
            MultiBufferedArena::<Model>::create(&dev, "frame", 3, DynamicScope::PerFrame, 1, 256).unwrap();
        assert!(arena.grow_instances(&dev, 0, 1).unwrap().is_none());
        assert!(arena.grow_instances(&dev, 0, 2).is_err());
    }
}
