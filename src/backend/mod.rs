//! GPU command backends
//!
//! The scheduler never owns a device. Each frame it is handed one open
//! [`FrameEncoder`] and records into it:
//!
//! ```text
//! Scene::render ─┬─ FrameEncoder::dispatch            (compute passes)
//!                ├─ FrameEncoder::copy_texture_to_texture (copy-back hooks)
//!                └─ FrameEncoder::begin_render_pass ─→ DrawPass::record / execute_bundle
//! ```
//!
//! Two implementations ship with the crate:
//! - [`WgpuFrameEncoder`]: records into a `wgpu::CommandEncoder`
//! - [`RecordingEncoder`]: headless capture of every event, used for frame
//!   inspection and tests

pub mod command;
pub mod recording;
pub mod tracked;
pub mod gpu;

pub use command::{
    ComputeDispatch, DrawCommand, DrawRecipe, IndexedDraw, InstanceBinding, InstanceData,
    RecordedBundle,
};
pub use recording::{FrameEvent, RecordingEncoder};
pub use tracked::TrackedRenderPass;
pub use gpu::{GpuResources, SwapChainViews, WgpuFrameEncoder};

use crate::graph::RenderPassDescriptor;

slotmap::new_key_type! {
    /// Handle to a texture owned by the backend.
    pub struct TextureId;
    /// Handle to a buffer owned by the backend.
    pub struct BufferId;
    /// Handle to a render pipeline owned by the backend.
    pub struct PipelineId;
    /// Handle to a compute pipeline owned by the backend.
    pub struct ComputePipelineId;
    /// Handle to a bind group owned by the backend.
    pub struct BindGroupId;
}

/// An open render pass.
///
/// The pass ends when the value is dropped, mirroring `wgpu::RenderPass`.
pub trait DrawPass {
    /// Records a single command into the pass.
    fn record(&mut self, command: &DrawCommand);

    /// Replays a pre-recorded command sequence.
    fn execute_bundle(&mut self, bundle: &RecordedBundle);
}

/// The single command encoder the scheduler records one frame into.
///
/// The caller creates, finishes and submits the underlying encoder; the
/// scheduler only appends to it.
pub trait FrameEncoder {
    /// Texture currently bound as the swap chain, if any.
    fn swap_chain_texture(&self) -> Option<TextureId>;

    /// Begins a render pass with the load operations already resolved on
    /// `descriptor`.
    fn begin_render_pass<'a>(
        &'a mut self,
        descriptor: &RenderPassDescriptor,
    ) -> Box<dyn DrawPass + 'a>;

    /// Copies the full extent shared by both textures.
    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId);

    /// Encodes one compute dispatch in its own compute pass.
    fn dispatch(&mut self, label: &str, dispatch: &ComputeDispatch);

    /// Allocates a storage buffer that can be written with [`write_buffer`](Self::write_buffer).
    fn create_buffer(&mut self, label: &str, size: u64) -> BufferId;

    /// Schedules a write into `buffer` at `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Releases a buffer created through [`create_buffer`](Self::create_buffer).
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn push_debug_group(&mut self, _label: &str) {}

    fn pop_debug_group(&mut self) {}
}
