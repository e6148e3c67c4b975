//! 带状态追踪的渲染通道
//!
//! [`TrackedRenderPass`] replays [`DrawCommand`]s into a `wgpu::RenderPass`
//! and drops state changes that would re-bind what is already bound. Bundle
//! sequences go through the same path, so consecutive members sharing a
//! pipeline bind it once.

use smallvec::SmallVec;

use super::{
    BindGroupId, BufferId, DrawCommand, DrawPass, GpuResources, PipelineId, RecordedBundle,
};

const TRACKED_GROUPS: usize = 4;
const TRACKED_VERTEX_BUFFERS: usize = 8;

/// What is bound at one bind group slot.
#[derive(Debug, Clone, PartialEq)]
enum BoundGroup {
    Group {
        id: BindGroupId,
        offsets: SmallVec<[u32; 2]>,
    },
    // 实例变换缓冲区的 BindGroup 按缓冲区记录
    Instances(BufferId),
}

pub struct TrackedRenderPass<'a> {
    pass: wgpu::RenderPass<'a>,
    resources: &'a GpuResources,

    pipeline: Option<PipelineId>,
    bind_groups: [Option<BoundGroup>; TRACKED_GROUPS],
    vertex_buffers: [Option<BufferId>; TRACKED_VERTEX_BUFFERS],
    index_buffer: Option<(BufferId, wgpu::IndexFormat)>,

    skipped: u32,
}

impl<'a> TrackedRenderPass<'a> {
    #[must_use]
    pub fn new(pass: wgpu::RenderPass<'a>, resources: &'a GpuResources) -> Self {
        Self {
            pass,
            resources,
            pipeline: None,
            bind_groups: Default::default(),
            vertex_buffers: [None; TRACKED_VERTEX_BUFFERS],
            index_buffer: None,
            skipped: 0,
        }
    }

    /// State changes dropped so far because they were already in effect.
    #[inline]
    #[must_use]
    pub fn skipped_state_changes(&self) -> u32 {
        self.skipped
    }

    pub fn set_pipeline(&mut self, id: PipelineId) {
        if self.pipeline == Some(id) {
            self.skipped += 1;
            return;
        }
        let Some(pipeline) = self.resources.pipeline(id) else {
            log::warn!("Render pipeline {id:?} is not resident");
            return;
        };
        self.pass.set_pipeline(pipeline);
        self.pipeline = Some(id);
    }

    pub fn set_bind_group(&mut self, index: u32, id: BindGroupId, offsets: &[u32]) {
        let Some(group) = self.resources.bind_group(id) else {
            log::warn!("Bind group {id:?} is not resident");
            return;
        };
        let state = BoundGroup::Group {
            id,
            offsets: SmallVec::from_slice(offsets),
        };
        if self.is_bound(index, &state) {
            self.skipped += 1;
            return;
        }
        self.pass.set_bind_group(index, group, offsets);
        self.remember(index, state);
    }

    /// Binds the shared transform buffer of a render bundle.
    pub fn set_instance_buffer(&mut self, index: u32, buffer: BufferId) {
        let Some(group) = self.resources.instance_bind_group(buffer) else {
            log::warn!("Transform buffer {buffer:?} has no bind group");
            return;
        };
        let state = BoundGroup::Instances(buffer);
        if self.is_bound(index, &state) {
            self.skipped += 1;
            return;
        }
        self.pass.set_bind_group(index, group, &[]);
        self.remember(index, state);
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, id: BufferId) {
        let Some(buffer) = self.resources.buffer(id) else {
            log::warn!("Vertex buffer {id:?} is not resident");
            return;
        };
        let index = slot as usize;
        if self.vertex_buffers.get(index) == Some(&Some(id)) {
            self.skipped += 1;
            return;
        }
        self.pass.set_vertex_buffer(slot, buffer.slice(..));
        if let Some(current) = self.vertex_buffers.get_mut(index) {
            *current = Some(id);
        }
    }

    pub fn set_index_buffer(&mut self, id: BufferId, format: wgpu::IndexFormat) {
        if self.index_buffer == Some((id, format)) {
            self.skipped += 1;
            return;
        }
        let Some(buffer) = self.resources.buffer(id) else {
            log::warn!("Index buffer {id:?} is not resident");
            return;
        };
        self.pass.set_index_buffer(buffer.slice(..), format);
        self.index_buffer = Some((id, format));
    }

    fn is_bound(&self, index: u32, state: &BoundGroup) -> bool {
        self.bind_groups
            .get(index as usize)
            .is_some_and(|bound| bound.as_ref() == Some(state))
    }

    fn remember(&mut self, index: u32, state: BoundGroup) {
        // 超出追踪范围的槽位每次都重新设置
        if let Some(slot) = self.bind_groups.get_mut(index as usize) {
            *slot = Some(state);
        }
    }
}

impl DrawPass for TrackedRenderPass<'_> {
    fn record(&mut self, command: &DrawCommand) {
        match command {
            DrawCommand::SetPipeline(id) => self.set_pipeline(*id),
            DrawCommand::SetBindGroup {
                index,
                bind_group,
                offsets,
            } => self.set_bind_group(*index, *bind_group, offsets),
            DrawCommand::SetInstanceBinding { index, binding } => {
                self.set_instance_buffer(*index, binding.buffer);
            }
            DrawCommand::SetVertexBuffer { slot, buffer } => self.set_vertex_buffer(*slot, *buffer),
            DrawCommand::SetIndexBuffer { buffer, format } => self.set_index_buffer(*buffer, *format),
            DrawCommand::Draw {
                vertices,
                instances,
            } => self.pass.draw(vertices.clone(), instances.clone()),
            DrawCommand::DrawIndexed {
                indices,
                base_vertex,
                instances,
            } => self
                .pass
                .draw_indexed(indices.clone(), *base_vertex, instances.clone()),
        }
    }

    fn execute_bundle(&mut self, bundle: &RecordedBundle) {
        for command in bundle.commands() {
            self.record(command);
        }
    }
}

impl Drop for TrackedRenderPass<'_> {
    fn drop(&mut self) {
        if self.skipped > 0 {
            log::trace!("Render pass: {} redundant state changes skipped", self.skipped);
        }
    }
}
