//! Scene orchestrator
//!
//! The [`Scene`] owns every renderable, bundle, render target and pass entry,
//! decides where each drawable is bucketed, and records one frame at a time
//! into the [`FrameEncoder`](crate::backend::FrameEncoder) it is handed.
//!
//! # Frame order
//!
//! ```text
//! render()
//!   ├─ apply deferred commands
//!   ├─ update pass (TRS → model → model-view → frustum), transparent re-sort
//!   ├─ bundle prepare (shared transform buffers)
//!   ├─ compute passes        sorted by (render_order, creation_index)
//!   └─ PingPong → RenderTarget → PrePass → Screen → PostProPass
//!        each non-empty entry: before hook → pass → after hook
//! ```

mod bundles;
mod deferred;
mod frame;
mod registry;

pub use deferred::{DeferredQueue, SceneCommand};

use std::any::Any;

use glam::Mat4;
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};

use crate::backend::{BindGroupId, BufferId};
use crate::graph::{
    AttachmentView, BucketKey, BundleId, ComputeId, ComputeWork, DrawableId, EntryId, PassCategory,
    PassId, RenderBundle, RenderPassDescriptor, RenderPassEntry, RenderTarget, RenderTargetId,
    SortKey,
};
use crate::renderable::{CameraView, CreationCounter, Renderable, RenderableId};
use crate::settings::SchedulerSettings;

/// Where a renderable currently lives. A renderable has exactly one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A bucket of a stack entry.
    Stack { entry: EntryId, bucket: BucketKey },
    /// Member of a render bundle; the bundle holds the stack slot.
    Bundle(BundleId),
    /// The single element of its own entry.
    Element(EntryId),
}

pub struct Scene {
    settings: SchedulerSettings,
    counter: CreationCounter,

    renderables: SlotMap<RenderableId, Box<dyn Renderable>>,
    placements: SecondaryMap<RenderableId, Placement>,

    bundles: SlotMap<BundleId, RenderBundle>,
    bundle_placements: SecondaryMap<BundleId, Placement>,

    entries: SlotMap<EntryId, RenderPassEntry>,
    categories: [Vec<EntryId>; 5],
    default_entry: EntryId,
    post_processing: RenderPassDescriptor,

    targets: SlotMap<RenderTargetId, RenderTarget>,
    target_entries: SecondaryMap<RenderTargetId, EntryId>,
    target_by_pass: FxHashMap<PassId, RenderTargetId>,
    transmission_target: Option<RenderTargetId>,

    compute: SlotMap<ComputeId, Box<dyn ComputeWork>>,

    camera: CameraView,
    sorted_camera_version: Option<u64>,
    camera_bind_group: Option<(u32, BindGroupId)>,

    deferred: DeferredQueue,
    pending_releases: Vec<BufferId>,
    frame_index: u64,
}

impl Scene {
    #[must_use]
    pub fn new(settings: SchedulerSettings) -> Self {
        let mut entries = SlotMap::with_key();
        let default_entry = entries.insert(RenderPassEntry::with_stack(
            "Default screen",
            PassCategory::Screen,
            screen_descriptor(&settings, "Default screen"),
        ));

        let mut categories: [Vec<EntryId>; 5] = Default::default();
        categories[PassCategory::Screen.index()].push(default_entry);

        let post_processing = RenderPassDescriptor::new("Post processing", 1).with_color_target(
            AttachmentView::SwapChain,
            settings.surface_format,
            settings.clear_color,
        );

        Self {
            settings,
            counter: CreationCounter::new(),
            renderables: SlotMap::with_key(),
            placements: SecondaryMap::new(),
            bundles: SlotMap::with_key(),
            bundle_placements: SecondaryMap::new(),
            entries,
            categories,
            default_entry,
            post_processing,
            targets: SlotMap::with_key(),
            target_entries: SecondaryMap::new(),
            target_by_pass: FxHashMap::default(),
            transmission_target: None,
            compute: SlotMap::with_key(),
            camera: CameraView::default(),
            sorted_camera_version: None,
            camera_bind_group: None,
            deferred: DeferredQueue::default(),
            pending_releases: Vec::new(),
            frame_index: 0,
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Creation index source for everything added to this scene.
    #[inline]
    #[must_use]
    pub fn counter(&self) -> &CreationCounter {
        &self.counter
    }

    /// Number of frames rendered so far.
    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    #[must_use]
    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    /// Commands queued here are applied at the start of the next frame.
    #[inline]
    pub fn deferred_mut(&mut self) -> &mut DeferredQueue {
        &mut self.deferred
    }

    #[must_use]
    pub fn renderable(&self, id: RenderableId) -> Option<&dyn Renderable> {
        self.renderables.get(id).map(|r| &**r)
    }

    pub fn renderable_mut(&mut self, id: RenderableId) -> Option<&mut (dyn Renderable + 'static)> {
        self.renderables.get_mut(id).map(|r| &mut **r)
    }

    /// Typed access to a renderable.
    #[must_use]
    pub fn get<T: Renderable>(&self, id: RenderableId) -> Option<&T> {
        let renderable: &(dyn Renderable + 'static) = &**self.renderables.get(id)?;
        (renderable as &dyn Any).downcast_ref::<T>()
    }

    pub fn get_mut<T: Renderable>(&mut self, id: RenderableId) -> Option<&mut T> {
        let renderable: &mut (dyn Renderable + 'static) = &mut **self.renderables.get_mut(id)?;
        (renderable as &mut dyn Any).downcast_mut::<T>()
    }

    #[must_use]
    pub fn contains(&self, id: RenderableId) -> bool {
        self.renderables.contains_key(id)
    }

    pub fn renderable_ids(&self) -> impl Iterator<Item = RenderableId> + '_ {
        self.renderables.keys()
    }

    #[must_use]
    pub fn placement(&self, id: RenderableId) -> Option<Placement> {
        self.placements.get(id).copied()
    }

    #[must_use]
    pub fn bundle_placement(&self, id: BundleId) -> Option<Placement> {
        self.bundle_placements.get(id).copied()
    }

    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&RenderPassEntry> {
        self.entries.get(id)
    }

    /// Entries of `category` in registration order.
    #[must_use]
    pub fn category_entries(&self, category: PassCategory) -> &[EntryId] {
        &self.categories[category.index()]
    }

    #[inline]
    #[must_use]
    pub fn default_entry(&self) -> EntryId {
        self.default_entry
    }

    #[must_use]
    pub fn bundle(&self, id: BundleId) -> Option<&RenderBundle> {
        self.bundles.get(id)
    }

    #[must_use]
    pub fn render_target(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.targets.get(id)
    }

    #[must_use]
    pub fn render_target_entry(&self, id: RenderTargetId) -> Option<EntryId> {
        self.target_entries.get(id).copied()
    }

    // ========================================================================
    // Camera
    // ========================================================================

    /// Transparent projected buckets are re-sorted at the next frame.
    pub fn set_camera_view(&mut self, view_matrix: Mat4) {
        self.camera.set_view_matrix(view_matrix);
    }

    /// Bind group set on every pass right before its projected buckets.
    pub fn set_camera_bind_group(&mut self, binding: Option<(u32, BindGroupId)>) {
        self.camera_bind_group = binding;
    }

    // ========================================================================
    // Compute
    // ========================================================================

    pub fn add_compute_pass(&mut self, work: impl ComputeWork + 'static) -> ComputeId {
        self.compute.insert(Box::new(work))
    }

    pub fn remove_compute_pass(&mut self, id: ComputeId) -> Option<Box<dyn ComputeWork>> {
        self.compute.remove(id)
    }

    // ========================================================================
    // Device loss
    // ========================================================================

    /// Drops every GPU handle held by the scene graph. Nothing renders until
    /// the owners of the resources make renderables ready again; bundles
    /// re-warm through their normal path.
    pub fn lose_device(&mut self) {
        log::warn!("Device lost: dropping GPU state of the render graph");

        for renderable in self.renderables.values_mut() {
            renderable.on_device_lost();
        }
        for bundle in self.bundles.values_mut() {
            bundle.lose_device();
        }
        for work in self.compute.values_mut() {
            work.on_device_lost();
        }
        self.pending_releases.clear();
    }
}

/// Descriptor of a screen entry: swap chain color, optional depth, the
/// scene's sample count.
fn screen_descriptor(settings: &SchedulerSettings, label: &str) -> RenderPassDescriptor {
    let descriptor = RenderPassDescriptor::new(label, settings.sample_count).with_color_target(
        AttachmentView::SwapChain,
        settings.surface_format,
        settings.clear_color,
    );
    match settings.depth_format {
        Some(format) => {
            descriptor.with_depth_target(AttachmentView::SwapChainDepth, format, settings.clear_depth)
        }
        None => descriptor,
    }
}

/// Sort inputs of a stack slot. Bundles sort as one unit: their own render
/// order and creation index, depth of the sphere enclosing their members.
fn sort_key(
    renderables: &SlotMap<RenderableId, Box<dyn Renderable>>,
    bundles: &SlotMap<BundleId, RenderBundle>,
    camera: &CameraView,
    id: DrawableId,
) -> SortKey {
    match id {
        DrawableId::Renderable(id) => {
            let Some(renderable) = renderables.get(id) else {
                return SortKey::new(0, u64::MAX);
            };
            let core = renderable.core();
            let key = SortKey::new(core.render_order(), core.creation_index());
            match renderable.as_projected() {
                Some(projected) if core.uses_projection() => key.with_depth(projected.view_depth(camera)),
                _ => key,
            }
        }
        DrawableId::Bundle(id) => {
            let Some(bundle) = bundles.get(id) else {
                return SortKey::new(0, u64::MAX);
            };
            let core = bundle.core();
            let key = SortKey::new(core.render_order(), core.creation_index());
            match bundle.world_bounds(renderables) {
                Some(bounds) if core.uses_projection() => key.with_depth(camera.sphere_depth(&bounds)),
                _ => key,
            }
        }
    }
}

/// Sort inputs of a bundle member.
fn member_key(renderables: &SlotMap<RenderableId, Box<dyn Renderable>>, id: RenderableId) -> SortKey {
    renderables.get(id).map_or(SortKey::new(0, u64::MAX), |r| {
        SortKey::new(r.core().render_order(), r.core().creation_index())
    })
}
