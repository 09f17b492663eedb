//! Recorded GPU command sequences.
//!
//! The frame pipeline records a flat list of [`Command`]s per frame; a backend
//! translates it into native encoder calls on submission.

use crate::device::{GpuAddress, TextureId};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Vertex-stage argument table slots.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexBindPoint {
    /// Mesh vertex stream `n`.
    VertexBuffer(u8),
    FrameConstants,
    InstanceConstants,
}

/// Fragment-stage argument table slots.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FragmentBindPoint {
    Material,
}

/// Texture slots of a material, in shader argument order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MaterialTexture {
    BaseColor,
    Roughness,
    Metalness,
    Normal,
    Occlusion,
    Opacity,
    Emissive,
}

impl MaterialTexture {
    pub const ALL: [MaterialTexture; 7] = [
        MaterialTexture::BaseColor,
        MaterialTexture::Roughness,
        MaterialTexture::Metalness,
        MaterialTexture::Normal,
        MaterialTexture::Occlusion,
        MaterialTexture::Opacity,
        MaterialTexture::Emissive,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FillMode {
    Fill,
    Lines,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PrimitiveType {
    Triangle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetRenderPipelineState,
    SetDepthStencilState,
    SetArgumentTable(ShaderStage),
    SetTriangleFillMode(FillMode),
    SetVertexAddress {
        bind_point: VertexBindPoint,
        address: GpuAddress,
    },
    SetFragmentAddress {
        bind_point: FragmentBindPoint,
        address: GpuAddress,
    },
    SetFragmentTexture {
        slot: MaterialTexture,
        texture: TextureId,
    },
    DrawIndexed {
        primitive: PrimitiveType,
        index_count: u32,
        index_format: IndexFormat,
        index_buffer: GpuAddress,
        index_buffer_length: u64,
    },
}

/// One frame's worth of recorded commands.
#[derive(Debug, Default, Clone)]
pub struct CommandSequence {
    pub frame_number: u64,
    pub frame_index: usize,
    commands: Vec<Command>,
    open: bool,
}

impl CommandSequence {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn push(&mut self, command: Command) {
        debug_assert!(self.open, "recording into a closed command sequence");
        self.commands.push(command);
    }

    pub fn end(&mut self) {
        self.open = false;
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. }))
            .count()
    }
}

/// Per frame-slot command storage, reset before each reuse.
#[derive(Debug, Default)]
pub struct CommandAllocator {
    sequence: CommandSequence,
}

impl CommandAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards previous contents while keeping capacity.
    pub fn reset(&mut self) {
        self.sequence.commands.clear();
        self.sequence.open = false;
    }

    pub fn begin(&mut self, frame_number: u64, frame_index: usize) -> &mut CommandSequence {
        self.sequence.frame_number = frame_number;
        self.sequence.frame_index = frame_index;
        self.sequence.open = true;
        &mut self.sequence
    }

    pub fn sequence(&self) -> &CommandSequence {
        &self.sequence
    }
}
