//! wgpu backend
//!
//! [`GpuResources`] owns the wgpu objects behind the backend handles.
//! [`WgpuFrameEncoder`] borrows them together with the caller's command
//! encoder for the duration of one frame.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::graph::{AttachmentView, LoadOp, RenderPassDescriptor};

use super::{
    BindGroupId, BufferId, ComputeDispatch, ComputePipelineId, DrawCommand, DrawPass, FrameEncoder,
    PipelineId, RecordedBundle, TextureId, TrackedRenderPass,
};

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Backing storage for every handle the scheduler records against.
#[derive(Default)]
pub struct GpuResources {
    textures: SlotMap<TextureId, GpuTexture>,
    buffers: SlotMap<BufferId, wgpu::Buffer>,
    pipelines: SlotMap<PipelineId, wgpu::RenderPipeline>,
    compute_pipelines: SlotMap<ComputePipelineId, wgpu::ComputePipeline>,
    bind_groups: SlotMap<BindGroupId, wgpu::BindGroup>,

    /// Layout used to expose a bundle's transform buffer to shaders.
    instance_layout: Option<wgpu::BindGroupLayout>,
    instance_bind_groups: FxHashMap<BufferId, wgpu::BindGroup>,
}

impl GpuResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind group layout with a single read-only storage buffer at binding 0.
    /// Transform buffers created afterwards get a bind group of this layout.
    pub fn set_instance_layout(&mut self, layout: wgpu::BindGroupLayout) {
        self.instance_layout = Some(layout);
    }

    pub fn insert_texture(&mut self, texture: wgpu::Texture) -> TextureId {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(GpuTexture { texture, view })
    }

    /// Swaps the texture behind an existing handle, e.g. the surface texture
    /// acquired for a new frame. Returns `false` for an unknown handle.
    pub fn replace_texture(&mut self, id: TextureId, texture: wgpu::Texture) -> bool {
        let Some(slot) = self.textures.get_mut(id) else {
            return false;
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        *slot = GpuTexture { texture, view };
        true
    }

    pub fn remove_texture(&mut self, id: TextureId) -> Option<GpuTexture> {
        self.textures.remove(id)
    }

    pub fn insert_buffer(&mut self, buffer: wgpu::Buffer) -> BufferId {
        self.buffers.insert(buffer)
    }

    pub fn insert_pipeline(&mut self, pipeline: wgpu::RenderPipeline) -> PipelineId {
        self.pipelines.insert(pipeline)
    }

    pub fn insert_compute_pipeline(&mut self, pipeline: wgpu::ComputePipeline) -> ComputePipelineId {
        self.compute_pipelines.insert(pipeline)
    }

    pub fn insert_bind_group(&mut self, bind_group: wgpu::BindGroup) -> BindGroupId {
        self.bind_groups.insert(bind_group)
    }

    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(id)
    }

    #[must_use]
    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(id)
    }

    #[must_use]
    pub fn pipeline(&self, id: PipelineId) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(id)
    }

    #[must_use]
    pub fn bind_group(&self, id: BindGroupId) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(id)
    }

    /// Bind group exposing a transform buffer through the instance layout.
    #[must_use]
    pub fn instance_bind_group(&self, buffer: BufferId) -> Option<&wgpu::BindGroup> {
        self.instance_bind_groups.get(&buffer)
    }

    /// Drops every wgpu object after the device was lost. Handles held by
    /// the scene become dangling and resolve to nothing until re-inserted.
    pub fn clear(&mut self) {
        self.textures.clear();
        self.buffers.clear();
        self.pipelines.clear();
        self.compute_pipelines.clear();
        self.bind_groups.clear();
        self.instance_bind_groups.clear();
    }
}

/// Swap-chain attachments of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainViews {
    pub texture: TextureId,
    /// Multi-sampled color target resolved into `texture`.
    pub msaa: Option<TextureId>,
    pub depth: Option<TextureId>,
}

/// [`FrameEncoder`] over a `wgpu::CommandEncoder`.
pub struct WgpuFrameEncoder<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    resources: &'a mut GpuResources,
    swap_chain: Option<SwapChainViews>,
}

impl<'a> WgpuFrameEncoder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
        resources: &'a mut GpuResources,
    ) -> Self {
        Self {
            device,
            queue,
            encoder,
            resources,
            swap_chain: None,
        }
    }

    #[must_use]
    pub fn with_swap_chain(mut self, views: SwapChainViews) -> Self {
        self.swap_chain = Some(views);
        self
    }

    /// Color view to render into and the view to resolve into, if any.
    fn color_views(
        resources: &GpuResources,
        swap_chain: Option<SwapChainViews>,
        view: AttachmentView,
        sample_count: u32,
    ) -> Option<(&wgpu::TextureView, Option<&wgpu::TextureView>)> {
        match view {
            AttachmentView::SwapChain => {
                let views = swap_chain?;
                let resolved = &resources.textures.get(views.texture)?.view;
                match views.msaa {
                    Some(msaa) if sample_count > 1 => {
                        Some((&resources.textures.get(msaa)?.view, Some(resolved)))
                    }
                    _ => Some((resolved, None)),
                }
            }
            AttachmentView::SwapChainDepth => None,
            AttachmentView::Texture(id) => Some((&resources.textures.get(id)?.view, None)),
        }
    }

    fn depth_view(
        resources: &GpuResources,
        swap_chain: Option<SwapChainViews>,
        view: AttachmentView,
    ) -> Option<&wgpu::TextureView> {
        let id = match view {
            AttachmentView::SwapChainDepth => swap_chain?.depth?,
            AttachmentView::Texture(id) => id,
            AttachmentView::SwapChain => return None,
        };
        Some(&resources.textures.get(id)?.view)
    }
}

/// Stand-in for a pass whose attachments could not be resolved.
struct SkippedPass;

impl DrawPass for SkippedPass {
    fn record(&mut self, _command: &DrawCommand) {}

    fn execute_bundle(&mut self, _bundle: &RecordedBundle) {}
}

fn wgpu_load<T>(load_op: LoadOp, clear_value: T) -> wgpu::LoadOp<T> {
    match load_op {
        LoadOp::Clear => wgpu::LoadOp::Clear(clear_value),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

fn copy_info(texture: &wgpu::Texture) -> wgpu::TexelCopyTextureInfo<'_> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

impl FrameEncoder for WgpuFrameEncoder<'_> {
    fn swap_chain_texture(&self) -> Option<TextureId> {
        self.swap_chain.map(|views| views.texture)
    }

    fn begin_render_pass<'a>(&'a mut self, descriptor: &RenderPassDescriptor) -> Box<dyn DrawPass + 'a> {
        let resources: &'a GpuResources = &*self.resources;
        let sample_count = descriptor.sample_count();

        let mut color_attachments = Vec::with_capacity(descriptor.color_targets().len());
        for target in descriptor.color_targets() {
            let Some((view, resolve_target)) =
                Self::color_views(resources, self.swap_chain, target.view, sample_count)
            else {
                log::error!(
                    "Pass `{}`: color attachment {:?} is not resident, pass skipped",
                    descriptor.label(),
                    target.view
                );
                return Box::new(SkippedPass);
            };
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu_load(target.load_op, target.clear_value),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            }));
        }

        let depth_stencil_attachment = match descriptor.depth_target() {
            Some(depth) => {
                let Some(view) = Self::depth_view(resources, self.swap_chain, depth.view) else {
                    log::error!(
                        "Pass `{}`: depth attachment {:?} is not resident, pass skipped",
                        descriptor.label(),
                        depth.view
                    );
                    return Box::new(SkippedPass);
                };
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu_load(depth.load_op, depth.clear_value),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                })
            }
            None => None,
        };

        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(descriptor.label()),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        Box::new(TrackedRenderPass::new(pass, resources))
    }

    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId) {
        let (Some(src), Some(dst)) = (
            self.resources.textures.get(source),
            self.resources.textures.get(destination),
        ) else {
            log::error!("Texture copy {source:?} -> {destination:?}: texture is not resident");
            return;
        };

        let extent = wgpu::Extent3d {
            width: src.texture.width().min(dst.texture.width()),
            height: src.texture.height().min(dst.texture.height()),
            depth_or_array_layers: 1,
        };
        self.encoder
            .copy_texture_to_texture(copy_info(&src.texture), copy_info(&dst.texture), extent);
    }

    fn dispatch(&mut self, label: &str, dispatch: &ComputeDispatch) {
        let Some(pipeline) = self.resources.compute_pipelines.get(dispatch.pipeline) else {
            log::error!("Compute pass `{label}`: pipeline is not resident");
            return;
        };

        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        for &(index, bind_group) in &dispatch.bind_groups {
            match self.resources.bind_groups.get(bind_group) {
                Some(group) => pass.set_bind_group(index, group, &[]),
                None => {
                    log::error!("Compute pass `{label}`: bind group {bind_group:?} is not resident");
                    return;
                }
            }
        }
        let [x, y, z] = dispatch.workgroups;
        pass.dispatch_workgroups(x, y, z);
    }

    fn create_buffer(&mut self, label: &str, size: u64) -> BufferId {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.resources.instance_layout.as_ref().map(|layout| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        });

        let id = self.resources.buffers.insert(buffer);
        if let Some(bind_group) = bind_group {
            self.resources.instance_bind_groups.insert(id, bind_group);
        }
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.resources.buffers.get(buffer) {
            Some(b) => self.queue.write_buffer(b, offset, data),
            None => log::warn!("Write into buffer {buffer:?} dropped: buffer is not resident"),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.resources.instance_bind_groups.remove(&buffer);
        if let Some(b) = self.resources.buffers.remove(buffer) {
            b.destroy();
        }
    }

    fn push_debug_group(&mut self, label: &str) {
        self.encoder.push_debug_group(label);
    }

    fn pop_debug_group(&mut self) {
        self.encoder.pop_debug_group();
    }
}
