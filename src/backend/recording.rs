//! Headless frame capture
//!
//! [`RecordingEncoder`] implements [`FrameEncoder`] without a device and keeps
//! an ordered log of everything the scheduler recorded. Handles for textures,
//! pipelines and bind groups are minted by the encoder itself so drawables can
//! be built against it.

use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::graph::{LoadOp, PassId, RenderPassDescriptor};

use super::{
    BindGroupId, BufferId, ComputeDispatch, ComputePipelineId, DrawCommand, DrawPass, FrameEncoder,
    PipelineId, RecordedBundle, TextureId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    BeginPass {
        label: String,
        pass: PassId,
        load_ops: SmallVec<[LoadOp; 1]>,
        depth_load_op: Option<LoadOp>,
    },
    Command(DrawCommand),
    ExecuteBundle {
        label: String,
        commands: Vec<DrawCommand>,
        members: usize,
    },
    EndPass,
    Copy {
        source: TextureId,
        destination: TextureId,
    },
    Dispatch {
        label: String,
        workgroups: [u32; 3],
    },
    CreateBuffer {
        buffer: BufferId,
        label: String,
        size: u64,
    },
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        size: usize,
    },
    DestroyBuffer(BufferId),
    PushDebugGroup(String),
    PopDebugGroup,
}

#[derive(Debug, Default)]
pub struct RecordingEncoder {
    events: Vec<FrameEvent>,
    swap_chain: Option<TextureId>,
    textures: SlotMap<TextureId, String>,
    buffers: SlotMap<BufferId, u64>,
    pipelines: SlotMap<PipelineId, String>,
    compute_pipelines: SlotMap<ComputePipelineId, String>,
    bind_groups: SlotMap<BindGroupId, String>,
}

impl RecordingEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder with a swap-chain texture bound.
    #[must_use]
    pub fn with_swap_chain() -> Self {
        let mut encoder = Self::new();
        let swap_chain = encoder.create_texture("Swap chain");
        encoder.swap_chain = Some(swap_chain);
        encoder
    }

    /// `None` simulates a frame without a surface texture.
    pub fn set_swap_chain(&mut self, texture: Option<TextureId>) {
        self.swap_chain = texture;
    }

    // ========================================================================
    // Handle factories
    // ========================================================================

    pub fn create_texture(&mut self, label: &str) -> TextureId {
        self.textures.insert(label.to_owned())
    }

    pub fn create_pipeline(&mut self, label: &str) -> PipelineId {
        self.pipelines.insert(label.to_owned())
    }

    pub fn create_compute_pipeline(&mut self, label: &str) -> ComputePipelineId {
        self.compute_pipelines.insert(label.to_owned())
    }

    pub fn create_bind_group(&mut self, label: &str) -> BindGroupId {
        self.bind_groups.insert(label.to_owned())
    }

    #[must_use]
    pub fn texture_label(&self, texture: TextureId) -> Option<&str> {
        self.textures.get(texture).map(String::as_str)
    }

    /// Size of a live buffer.
    #[must_use]
    pub fn buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.buffers.get(buffer).copied()
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn events(&self) -> &[FrameEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Drains the log, typically once per frame.
    pub fn take_events(&mut self) -> Vec<FrameEvent> {
        std::mem::take(&mut self.events)
    }

    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.count(|e| matches!(e, FrameEvent::BeginPass { .. }))
    }

    #[must_use]
    pub fn end_count(&self) -> usize {
        self.count(|e| matches!(e, FrameEvent::EndPass))
    }

    /// Labels of the passes begun, in order.
    #[must_use]
    pub fn pass_labels(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::BeginPass { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Debug group labels in order. The scheduler opens one per entry, named
    /// after the entry.
    #[must_use]
    pub fn debug_groups(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::PushDebugGroup(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Draw calls recorded directly plus those inside replayed bundles.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.draw_commands().filter(|c| c.is_draw()).count()
    }

    /// Pipelines bound, in order, including inside replayed bundles.
    #[must_use]
    pub fn pipeline_sequence(&self) -> Vec<PipelineId> {
        self.draw_commands()
            .filter_map(|c| match c {
                DrawCommand::SetPipeline(pipeline) => Some(*pipeline),
                _ => None,
            })
            .collect()
    }

    /// Replayed bundles as `(label, member count)`.
    #[must_use]
    pub fn bundle_replays(&self) -> Vec<(&str, usize)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::ExecuteBundle { label, members, .. } => Some((label.as_str(), *members)),
                _ => None,
            })
            .collect()
    }

    fn draw_commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.events.iter().flat_map(|e| match e {
            FrameEvent::Command(command) => std::slice::from_ref(command),
            FrameEvent::ExecuteBundle { commands, .. } => commands.as_slice(),
            _ => &[],
        })
    }

    fn count(&self, predicate: impl Fn(&FrameEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

/// Open pass of a [`RecordingEncoder`]; logs `EndPass` when dropped.
struct RecordingPass<'a> {
    events: &'a mut Vec<FrameEvent>,
}

impl DrawPass for RecordingPass<'_> {
    fn record(&mut self, command: &DrawCommand) {
        self.events.push(FrameEvent::Command(command.clone()));
    }

    fn execute_bundle(&mut self, bundle: &RecordedBundle) {
        self.events.push(FrameEvent::ExecuteBundle {
            label: bundle.label().to_owned(),
            commands: bundle.commands().to_vec(),
            members: bundle.member_count(),
        });
    }
}

impl Drop for RecordingPass<'_> {
    fn drop(&mut self) {
        self.events.push(FrameEvent::EndPass);
    }
}

impl FrameEncoder for RecordingEncoder {
    fn swap_chain_texture(&self) -> Option<TextureId> {
        self.swap_chain
    }

    fn begin_render_pass<'a>(&'a mut self, descriptor: &RenderPassDescriptor) -> Box<dyn DrawPass + 'a> {
        self.events.push(FrameEvent::BeginPass {
            label: descriptor.label().to_owned(),
            pass: descriptor.id(),
            load_ops: descriptor.color_targets().iter().map(|c| c.load_op).collect(),
            depth_load_op: descriptor.depth_load_op(),
        });
        Box::new(RecordingPass {
            events: &mut self.events,
        })
    }

    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId) {
        self.events.push(FrameEvent::Copy {
            source,
            destination,
        });
    }

    fn dispatch(&mut self, label: &str, dispatch: &ComputeDispatch) {
        self.events.push(FrameEvent::Dispatch {
            label: label.to_owned(),
            workgroups: dispatch.workgroups,
        });
    }

    fn create_buffer(&mut self, label: &str, size: u64) -> BufferId {
        let buffer = self.buffers.insert(size);
        self.events.push(FrameEvent::CreateBuffer {
            buffer,
            label: label.to_owned(),
            size,
        });
        buffer
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.events.push(FrameEvent::WriteBuffer {
            buffer,
            offset,
            size: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer);
        self.events.push(FrameEvent::DestroyBuffer(buffer));
    }

    fn push_debug_group(&mut self, label: &str) {
        self.events.push(FrameEvent::PushDebugGroup(label.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        self.events.push(FrameEvent::PopDebugGroup);
    }
}
