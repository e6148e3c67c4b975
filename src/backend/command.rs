//! Draw command vocabulary
//!
//! Renderables express their draw calls as [`DrawCommand`]s against backend
//! handles. The same vocabulary is used for immediate recording into a pass and
//! for the replayable sequences stored by render bundles.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use smallvec::SmallVec;

use super::{BindGroupId, BufferId, ComputePipelineId, DrawPass, PipelineId};

/// Where a bundle member finds its model matrix inside the bundle's shared
/// per-instance transform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceBinding {
    /// Shared transform buffer of the owning bundle.
    pub buffer: BufferId,
    /// Element index of this member inside the buffer.
    pub index: u32,
}

/// GPU layout of one element of a bundle's shared transform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model_matrix: Mat4,
}

impl InstanceData {
    /// Size in bytes of one element.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

impl Default for InstanceData {
    fn default() -> Self {
        Self {
            model_matrix: Mat4::IDENTITY,
        }
    }
}

/// A single state change or draw call inside a render pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    SetPipeline(PipelineId),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupId,
        offsets: SmallVec<[u32; 2]>,
    },
    /// Binds the shared transform buffer of a render bundle; `binding.index`
    /// is forwarded to the shader as the first instance.
    SetInstanceBinding {
        index: u32,
        binding: InstanceBinding,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferId,
    },
    SetIndexBuffer {
        buffer: BufferId,
        format: wgpu::IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

impl DrawCommand {
    /// Returns `true` for commands that emit primitives.
    #[inline]
    #[must_use]
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. })
    }
}

/// Index buffer part of a [`DrawRecipe`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedDraw {
    pub buffer: BufferId,
    pub format: wgpu::IndexFormat,
    pub count: u32,
}

/// Everything needed to draw one object once its GPU resources exist.
///
/// A renderable without a recipe is not ready: its pipeline is still
/// compiling or its buffers are still uploading.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecipe {
    pub pipeline: PipelineId,
    pub bind_groups: SmallVec<[(u32, BindGroupId); 4]>,
    pub vertex_buffers: SmallVec<[BufferId; 4]>,
    pub index: Option<IndexedDraw>,
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
    /// Bind group slot used for a bundle's shared transform buffer.
    pub instance_group: u32,
}

impl DrawRecipe {
    /// Non-indexed draw of `vertex_count` vertices.
    #[must_use]
    pub fn new(pipeline: PipelineId, vertex_count: u32) -> Self {
        Self {
            pipeline,
            bind_groups: SmallVec::new(),
            vertex_buffers: SmallVec::new(),
            index: None,
            vertices: 0..vertex_count,
            instances: 0..1,
            instance_group: 2,
        }
    }

    /// The three-vertex triangle covering the viewport.
    #[must_use]
    pub fn fullscreen(pipeline: PipelineId) -> Self {
        Self::new(pipeline, 3)
    }

    #[must_use]
    pub fn with_bind_group(mut self, index: u32, bind_group: BindGroupId) -> Self {
        self.bind_groups.push((index, bind_group));
        self
    }

    #[must_use]
    pub fn with_vertex_buffer(mut self, buffer: BufferId) -> Self {
        self.vertex_buffers.push(buffer);
        self
    }

    #[must_use]
    pub fn with_index_buffer(mut self, buffer: BufferId, format: wgpu::IndexFormat, count: u32) -> Self {
        self.index = Some(IndexedDraw {
            buffer,
            format,
            count,
        });
        self
    }

    /// Records the full command sequence for this recipe.
    pub fn encode(&self, pass: &mut dyn DrawPass, instance: Option<InstanceBinding>) {
        pass.record(&DrawCommand::SetPipeline(self.pipeline));

        for &(index, bind_group) in &self.bind_groups {
            pass.record(&DrawCommand::SetBindGroup {
                index,
                bind_group,
                offsets: SmallVec::new(),
            });
        }

        let instances = if let Some(binding) = instance {
            pass.record(&DrawCommand::SetInstanceBinding {
                index: self.instance_group,
                binding,
            });
            // The instance index selects this member's model matrix.
            binding.index..binding.index + 1
        } else {
            self.instances.clone()
        };

        for (slot, &buffer) in self.vertex_buffers.iter().enumerate() {
            pass.record(&DrawCommand::SetVertexBuffer {
                slot: slot as u32,
                buffer,
            });
        }

        if let Some(index) = self.index {
            pass.record(&DrawCommand::SetIndexBuffer {
                buffer: index.buffer,
                format: index.format,
            });
            pass.record(&DrawCommand::DrawIndexed {
                indices: 0..index.count,
                base_vertex: 0,
                instances,
            });
        } else {
            pass.record(&DrawCommand::Draw {
                vertices: self.vertices.clone(),
                instances,
            });
        }
    }
}

/// A replayable command sequence produced by a render bundle's encode step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedBundle {
    label: String,
    commands: Vec<DrawCommand>,
    member_count: usize,
}

impl RecordedBundle {
    #[must_use]
    pub fn new(label: impl Into<String>, commands: Vec<DrawCommand>, member_count: usize) -> Self {
        Self {
            label: label.into(),
            commands,
            member_count,
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of bundle members whose draws were recorded.
    #[inline]
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.member_count
    }

    /// Number of draw calls in the sequence.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }
}

/// [`DrawPass`] that appends into a [`RecordedBundle`] instead of a GPU pass.
#[derive(Debug, Default)]
pub(crate) struct BundleRecorder {
    commands: Vec<DrawCommand>,
}

impl BundleRecorder {
    pub(crate) fn finish(self, label: &str, member_count: usize) -> RecordedBundle {
        RecordedBundle::new(label, self.commands, member_count)
    }
}

impl DrawPass for BundleRecorder {
    fn record(&mut self, command: &DrawCommand) {
        self.commands.push(command.clone());
    }

    fn execute_bundle(&mut self, bundle: &RecordedBundle) {
        self.commands.extend_from_slice(bundle.commands());
    }
}

/// One compute dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeDispatch {
    pub pipeline: ComputePipelineId,
    pub bind_groups: SmallVec<[(u32, BindGroupId); 4]>,
    pub workgroups: [u32; 3],
}

impl ComputeDispatch {
    #[must_use]
    pub fn new(pipeline: ComputePipelineId, workgroups: [u32; 3]) -> Self {
        Self {
            pipeline,
            bind_groups: SmallVec::new(),
            workgroups,
        }
    }

    #[must_use]
    pub fn with_bind_group(mut self, index: u32, bind_group: BindGroupId) -> Self {
        self.bind_groups.push((index, bind_group));
        self
    }
}
