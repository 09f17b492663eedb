//! In-memory device for tests and windowless runs.
//!
//! Buffers are byte vectors grown on first write, addresses come from the same
//! [`AddressSpace`] the wgpu context uses, and "GPU completion" is either
//! immediate or driven by hand through [`HeadlessDevice::complete_next`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::address::AddressSpace;
use super::backend::{
    AllocationId, BufferAllocation, BufferDesc, BufferId, FrameBackend, GpuAddress, GpuDevice,
    StorageMode, TextureDesc, TextureHandle, TextureId,
};
use super::error::DeviceError;
use super::event::SharedEvent;
use crate::render::{Command, CommandSequence};

/// When queued event signals fire.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Completion {
    /// Work retires as soon as it is signalled.
    Immediate,
    /// Work retires only through `complete_next` / `complete_all`.
    Manual,
}

/// Drawable handed out by [`HeadlessDevice`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeadlessDrawable {
    pub serial: u64,
}

/// A command sequence as the device received it.
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub frame_number: u64,
    pub frame_index: usize,
    pub drawable: HeadlessDrawable,
    pub commands: Vec<Command>,
}

#[derive(Debug)]
struct HeadlessBuffer {
    allocation: BufferAllocation,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct HeadlessState {
    next_buffer: u32,
    next_texture: u32,
    space: AddressSpace,
    buffers: HashMap<BufferId, HeadlessBuffer>,
    /// Handle plus whether it samples as sRGB.
    textures: HashMap<TextureId, (TextureHandle, bool)>,
    resident: HashSet<AllocationId>,
    residency_commits: usize,
    pending: VecDeque<(Arc<SharedEvent>, u64)>,
    submissions: Vec<SubmittedFrame>,
    drawable_available: bool,
    next_drawable: u64,
    allocated: u64,
    memory_budget: Option<u64>,
}

/// Clones are handles onto the same device, so one thread can drive
/// completion while another renders.
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    completion: Completion,
    line_fill: bool,
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_completion(Completion::Immediate)
    }

    pub fn with_completion(completion: Completion) -> Self {
        Self {
            completion,
            line_fill: true,
            state: Arc::new(Mutex::new(HeadlessState {
                next_buffer: 0,
                next_texture: 0,
                space: AddressSpace::new(),
                buffers: HashMap::new(),
                textures: HashMap::new(),
                resident: HashSet::new(),
                residency_commits: 0,
                pending: VecDeque::new(),
                submissions: Vec::new(),
                drawable_available: true,
                next_drawable: 0,
                allocated: 0,
                memory_budget: None,
            })),
        }
    }

    /// Caps total buffer bytes; allocations past the cap fail.
    pub fn with_memory_budget(self, bytes: u64) -> Self {
        self.lock().memory_budget = Some(bytes);
        self
    }

    /// Turns the line fill capability off or on.
    pub fn with_line_fill(mut self, supported: bool) -> Self {
        self.line_fill = supported;
        self
    }

    pub fn set_drawable_available(&self, available: bool) {
        self.lock().drawable_available = available;
    }

    pub fn submissions(&self) -> Vec<SubmittedFrame> {
        self.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    pub fn pending_signals(&self) -> usize {
        self.lock().pending.len()
    }

    /// Retires the oldest outstanding signal. Returns the value it carried.
    pub fn complete_next(&self) -> Option<u64> {
        let next = self.lock().pending.pop_front();
        next.map(|(event, value)| {
            event.signal(value);
            value
        })
    }

    pub fn complete_all(&self) {
        while self.complete_next().is_some() {}
    }

    pub fn is_resident(&self, id: AllocationId) -> bool {
        self.lock().resident.contains(&id)
    }

    pub fn resident_count(&self) -> usize {
        self.lock().resident.len()
    }

    pub fn residency_commits(&self) -> usize {
        self.lock().residency_commits
    }

    pub fn texture_count(&self) -> usize {
        self.lock().textures.len()
    }

    /// `Some(true)` for a texture created as sRGB colour data.
    pub fn texture_is_srgb(&self, id: TextureId) -> Option<bool> {
        self.lock().textures.get(&id).map(|(_, srgb)| *srgb)
    }

    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Reads back what the GPU would see. Bytes never written read as zero.
    pub fn read_buffer(&self, buffer: BufferId, offset: u64, len: usize) -> Option<Vec<u8>> {
        let state = self.lock();
        let buf = state.buffers.get(&buffer)?;
        let end = offset as usize + len;
        if end as u64 > buf.allocation.length {
            return None;
        }
        let mut out = vec![0u8; len];
        let stored_end = end.min(buf.bytes.len());
        if (offset as usize) < stored_end {
            let n = stored_end - offset as usize;
            out[..n].copy_from_slice(&buf.bytes[offset as usize..stored_end]);
        }
        Some(out)
    }

    /// Reads back through an address, as a shader would.
    pub fn read_address(&self, address: GpuAddress, len: usize) -> Option<Vec<u8>> {
        let (buffer, offset) = self.lock().space.resolve_span(address, len as u64)?;
        self.read_buffer(buffer, offset, len)
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HeadlessState {
    fn check_buffer_address(&self, address: GpuAddress, len: u64) -> Result<(), DeviceError> {
        let (buffer, _) = self
            .space
            .resolve_span(address, len)
            .ok_or(DeviceError::UnmappedAddress(address))?;
        let id = AllocationId::Buffer(buffer);
        if self.resident.contains(&id) {
            Ok(())
        } else {
            Err(DeviceError::NotResident(id))
        }
    }

    fn validate(&self, commands: &[Command]) -> Result<(), DeviceError> {
        for cmd in commands {
            match cmd {
                Command::SetVertexAddress { address, .. }
                | Command::SetFragmentAddress { address, .. } => {
                    self.check_buffer_address(*address, 1)?;
                }
                Command::SetFragmentTexture { texture, .. } => {
                    let id = AllocationId::Texture(*texture);
                    if !self.resident.contains(&id) {
                        return Err(DeviceError::NotResident(id));
                    }
                }
                Command::DrawIndexed {
                    index_count,
                    index_format,
                    index_buffer,
                    index_buffer_length,
                    ..
                } => {
                    if u64::from(*index_count) * index_format.size() > *index_buffer_length {
                        return Err(DeviceError::InvalidCommands("index count exceeds index buffer"));
                    }
                    self.check_buffer_address(*index_buffer, *index_buffer_length)?;
                }
                Command::SetRenderPipelineState
                | Command::SetDepthStencilState
                | Command::SetArgumentTable(_)
                | Command::SetTriangleFillMode(_) => {}
            }
        }
        Ok(())
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferAllocation, DeviceError> {
        let mut state = self.lock();
        let length = desc.size.max(1);
        if let Some(budget) = state.memory_budget {
            if state.allocated + length > budget {
                return Err(DeviceError::AllocationFailed {
                    label: desc.label.to_string(),
                    size: length,
                });
            }
        }

        let id = BufferId(state.next_buffer);
        state.next_buffer += 1;
        let gpu_address = state.space.reserve(id, length);
        let allocation = BufferAllocation {
            id,
            gpu_address,
            length,
            storage: desc.storage,
        };
        state.allocated += length;
        state.buffers.insert(
            id,
            HeadlessBuffer {
                allocation,
                bytes: Vec::new(),
            },
        );
        log::trace!("headless: buffer '{}' {:?} ({} bytes)", desc.label, id, length);
        Ok(allocation)
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let buf = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        if buf.allocation.storage == StorageMode::Private {
            return Err(DeviceError::PrivateStorage(buffer));
        }
        let end = offset + bytes.len() as u64;
        if end > buf.allocation.length {
            return Err(DeviceError::WriteOutOfBounds {
                buffer,
                offset,
                len: bytes.len(),
                length: buf.allocation.length,
            });
        }
        let end = end as usize;
        if buf.bytes.len() < end {
            buf.bytes.resize(end, 0);
        }
        buf.bytes[offset as usize..end].copy_from_slice(bytes);
        Ok(())
    }

    fn release_buffer(&self, buffer: BufferId) {
        let mut state = self.lock();
        if let Some(buf) = state.buffers.remove(&buffer) {
            state.space.release(buf.allocation.gpu_address);
            state.allocated -= buf.allocation.length;
            state.resident.remove(&AllocationId::Buffer(buffer));
        }
    }

    fn create_texture(&self, desc: &TextureDesc<'_>, rgba8: &[u8]) -> Result<TextureHandle, DeviceError> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if rgba8.len() != expected {
            return Err(DeviceError::TextureSize {
                expected,
                actual: rgba8.len(),
            });
        }
        let mut state = self.lock();
        let id = TextureId(state.next_texture);
        state.next_texture += 1;
        let handle = TextureHandle {
            id,
            width: desc.width,
            height: desc.height,
        };
        state.textures.insert(id, (handle, desc.srgb));
        Ok(handle)
    }

    fn make_resident(&self, allocations: &[AllocationId]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        for id in allocations {
            let known = match id {
                AllocationId::Buffer(b) => state.buffers.contains_key(b),
                AllocationId::Texture(t) => state.textures.contains_key(t),
            };
            if !known {
                return Err(DeviceError::UnknownAllocation(*id));
            }
        }
        state.resident = allocations.iter().copied().collect();
        state.residency_commits += 1;
        Ok(())
    }

    fn signal_event(&self, event: &Arc<SharedEvent>, value: u64) {
        match self.completion {
            Completion::Immediate => event.signal(value),
            Completion::Manual => self.lock().pending.push_back((Arc::clone(event), value)),
        }
    }

    fn poll(&self) {}

    fn supports_line_fill(&self) -> bool {
        self.line_fill
    }
}

impl FrameBackend for HeadlessDevice {
    type Drawable = HeadlessDrawable;

    fn acquire_drawable(&mut self) -> Result<Option<HeadlessDrawable>, DeviceError> {
        let mut state = self.lock();
        if !state.drawable_available {
            return Ok(None);
        }
        let serial = state.next_drawable;
        state.next_drawable += 1;
        Ok(Some(HeadlessDrawable { serial }))
    }

    fn submit(&mut self, commands: &CommandSequence, drawable: HeadlessDrawable) -> Result<(), DeviceError> {
        if commands.is_open() {
            return Err(DeviceError::InvalidCommands("command sequence was not ended"));
        }
        let mut state = self.lock();
        state.validate(commands.commands())?;
        state.submissions.push(SubmittedFrame {
            frame_number: commands.frame_number,
            frame_index: commands.frame_index,
            drawable,
            commands: commands.commands().to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BufferUsage;

    fn uniform(size: u64) -> BufferDesc<'static> {
        BufferDesc {
            label: "test",
            size,
            usage: BufferUsage::Uniform,
            storage: StorageMode::Shared,
        }
    }

    #[test]
    fn writes_are_readable_through_addresses() {
        let dev = HeadlessDevice::new();
        let buf = dev.create_buffer(&uniform(512)).unwrap();
        dev.write_buffer(buf.id, 256, &[1, 2, 3, 4]).unwrap();
        assert_eq!(dev.read_address(buf.gpu_address.offset(256), 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(dev.read_buffer(buf.id, 0, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn write_past_end_fails() {
        let dev = HeadlessDevice::new();
        let buf = dev.create_buffer(&uniform(16)).unwrap();
        let err = dev.write_buffer(buf.id, 12, &[0; 8]).unwrap_err();
        assert!(matches!(err, DeviceError::WriteOutOfBounds { .. }));
    }

    #[test]
    fn private_buffers_refuse_cpu_writes() {
        let dev = HeadlessDevice::new();
        let buf = dev
            .create_buffer(&BufferDesc {
                storage: StorageMode::Private,
                ..uniform(64)
            })
            .unwrap();
        assert!(matches!(
            dev.write_buffer(buf.id, 0, &[0; 4]),
            Err(DeviceError::PrivateStorage(_))
        ));
    }

    #[test]
    fn budget_limits_allocation() {
        let dev = HeadlessDevice::new().with_memory_budget(1024);
        dev.create_buffer(&uniform(1000)).unwrap();
        assert!(matches!(
            dev.create_buffer(&uniform(100)),
            Err(DeviceError::AllocationFailed { .. })
        ));
    }

    #[test]
    fn make_resident_rejects_unknown_allocations() {
        let dev = HeadlessDevice::new();
        let buf = dev.create_buffer(&uniform(64)).unwrap();
        dev.release_buffer(buf.id);
        assert!(matches!(
            dev.make_resident(&[buf.allocation_id()]),
            Err(DeviceError::UnknownAllocation(_))
        ));
    }

    #[test]
    fn manual_completion_defers_signals() {
        let dev = HeadlessDevice::with_completion(Completion::Manual);
        let ev = Arc::new(SharedEvent::new(0));
        dev.signal_event(&ev, 1);
        dev.signal_event(&ev, 2);
        assert_eq!(ev.signaled_value(), 0);
        assert_eq!(dev.complete_next(), Some(1));
        assert_eq!(ev.signaled_value(), 1);
        dev.complete_all();
        assert_eq!(ev.signaled_value(), 2);
        assert_eq!(dev.pending_signals(), 0);
    }

    #[test]
    fn submit_faults_on_non_resident_buffer() {
        let mut dev = HeadlessDevice::new();
        let buf = dev.create_buffer(&uniform(256)).unwrap();

        let mut alloc = crate::render::CommandAllocator::new();
        let seq = alloc.begin(1, 1);
        seq.push(Command::SetVertexAddress {
            bind_point: crate::render::VertexBindPoint::FrameConstants,
            address: buf.gpu_address,
        });
        seq.end();

        let drawable = dev.acquire_drawable().unwrap().unwrap();
        let err = dev.submit(alloc.sequence(), drawable).unwrap_err();
        assert!(matches!(err, DeviceError::NotResident(_)));

        dev.make_resident(&[buf.allocation_id()]).unwrap();
        let drawable = dev.acquire_drawable().unwrap().unwrap();
        dev.submit(alloc.sequence(), drawable).unwrap();
        assert_eq!(dev.submission_count(), 1);
    }

    #[test]
    fn no_drawable_when_unavailable() {
        let mut dev = HeadlessDevice::new();
        dev.set_drawable_available(false);
        assert!(dev.acquire_drawable().unwrap().is_none());
    }
}
