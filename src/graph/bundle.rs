//! Render bundles (static batch cache)
//!
//! A [`RenderBundle`] owns a subset of renderables and occupies a single stack
//! slot on their behalf. Once every member is ready the bundle records their
//! draw calls once and replays that sequence every frame afterwards.
//!
//! ```text
//!            add / remove / grow            first render()
//!   Empty ───────────────────────→ Invalid ───────────────→ Warming
//!     ↑                              ↑  ↑                      │ all members ready
//!     └──────── last member removed ─┘  └── add / remove / grow ┤ → encode
//!                                                             Ready
//! ```
//!
//! The only state a ready bundle still updates per frame is its shared
//! per-instance transform buffer, for members whose model matrix changed.
//!
//! Hidden and culled members are left out of the recording. When the set of
//! drawable members differs from the recorded one, the bundle records again.

use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::backend::command::BundleRecorder;
use crate::backend::{BufferId, FrameEncoder, InstanceBinding, InstanceData, RecordedBundle};
use crate::graph::entry::EntryId;
use crate::graph::pass::{PassLayout, RenderPassDescriptor};
use crate::graph::stack::{SortKey, compare_opaque};
use crate::graph::target::RenderTargetId;
use crate::renderable::{
    BoundingSphere, CreationCounter, DrawContext, Renderable, RenderableCore, RenderableId,
};

slotmap::new_key_type! {
    /// Handle to a render bundle owned by a scene.
    pub struct BundleId;
}

/// Lifecycle of a render bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleState {
    /// No members.
    Empty,
    /// Membership or capacity changed since the last encode.
    Invalid,
    /// Members render individually until all of them are ready.
    Warming,
    /// The recorded sequence is replayed.
    Ready,
}

/// Construction parameters of a render bundle.
#[derive(Debug, Clone)]
pub struct RenderBundleOptions {
    pub label: String,
    /// Initial member capacity; the scene's default when `None`.
    pub capacity: Option<usize>,
    /// Attachment formats and sample count the bundle records for. Must equal
    /// the owning entry's descriptor. `None` adopts the owning entry's layout.
    pub layout: Option<PassLayout>,
    pub transparent: bool,
    pub uses_projection: bool,
    pub render_order: i32,
    pub output_target: Option<RenderTargetId>,
    pub custom_entry: Option<EntryId>,
    /// Share one per-instance transform buffer between the members.
    pub use_transform_buffer: bool,
}

impl RenderBundleOptions {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            capacity: None,
            layout: None,
            transparent: false,
            uses_projection: true,
            render_order: 0,
            output_target: None,
            custom_entry: None,
            use_transform_buffer: true,
        }
    }

    /// Declares the layout of `descriptor`.
    #[must_use]
    pub fn matching(mut self, descriptor: &RenderPassDescriptor) -> Self {
        self.layout = Some(descriptor.layout());
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: PassLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    #[must_use]
    pub fn projected(mut self, uses_projection: bool) -> Self {
        self.uses_projection = uses_projection;
        self
    }

    #[must_use]
    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.render_order = render_order;
        self
    }

    #[must_use]
    pub fn with_output_target(mut self, target: RenderTargetId) -> Self {
        self.output_target = Some(target);
        self
    }

    #[must_use]
    pub fn with_custom_entry(mut self, entry: EntryId) -> Self {
        self.custom_entry = Some(entry);
        self
    }

    #[must_use]
    pub fn with_transform_buffer(mut self, use_transform_buffer: bool) -> Self {
        self.use_transform_buffer = use_transform_buffer;
        self
    }
}

/// Rounds a member capacity up so the shared transform buffer size is a
/// multiple of `alignment` bytes.
#[must_use]
pub fn aligned_capacity(requested: usize, alignment: u64) -> usize {
    let alignment = alignment.max(1);
    let bytes = requested.max(1) as u64 * InstanceData::SIZE;
    let aligned = bytes.div_ceil(alignment) * alignment;
    (aligned / InstanceData::SIZE) as usize
}

/// Shared per-instance transform buffer.
#[derive(Debug, Clone, Default)]
struct InstanceTransforms {
    buffer: Option<BufferId>,
    /// Buffers replaced by a reallocation, destroyed at the next prepare.
    retired: Vec<BufferId>,
    needs_rebind: bool,
    needs_full_upload: bool,
}

#[derive(Debug, Clone)]
pub struct RenderBundle {
    core: RenderableCore,
    layout: PassLayout,
    members: Vec<RenderableId>,
    state: BundleState,
    recorded: Option<RecordedBundle>,
    /// Members drawn by `recorded`, in recording order.
    recorded_members: Vec<RenderableId>,
    capacity: usize,
    alignment: u64,
    transforms: Option<InstanceTransforms>,
}

impl RenderBundle {
    pub(crate) fn new(
        counter: &CreationCounter,
        options: &RenderBundleOptions,
        layout: PassLayout,
        default_capacity: usize,
        alignment: u64,
    ) -> Self {
        let mut core = RenderableCore::new(counter, options.label.clone())
            .with_render_order(options.render_order)
            .with_projection(options.uses_projection)
            .with_transparency(options.transparent);
        if let Some(target) = options.output_target {
            core = core.with_output_target(target);
        }
        if let Some(entry) = options.custom_entry {
            core = core.with_custom_entry(entry);
        }

        Self {
            core,
            layout,
            members: Vec::new(),
            state: BundleState::Empty,
            recorded: None,
            recorded_members: Vec::new(),
            capacity: aligned_capacity(options.capacity.unwrap_or(default_capacity), alignment),
            alignment,
            transforms: options
                .use_transform_buffer
                .then(InstanceTransforms::default),
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn core(&self) -> &RenderableCore {
        &self.core
    }

    #[inline]
    pub(crate) fn core_mut(&mut self) -> &mut RenderableCore {
        &mut self.core
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        self.core.label()
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> BundleState {
        self.state
    }

    /// A ready bundle always has at least one member, all of them ready.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == BundleState::Ready
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in recording order.
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[RenderableId] {
        &self.members
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: RenderableId) -> bool {
        self.members.contains(&id)
    }

    /// Effective member capacity of the shared transform buffer.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> &PassLayout {
        &self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: PassLayout) {
        self.layout = layout;
    }

    #[inline]
    #[must_use]
    pub fn recorded(&self) -> Option<&RecordedBundle> {
        self.recorded.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn transform_buffer(&self) -> Option<BufferId> {
        self.transforms.as_ref().and_then(|t| t.buffer)
    }

    /// World bounds enclosing every projected member.
    #[must_use]
    pub fn world_bounds(
        &self,
        renderables: &SlotMap<RenderableId, Box<dyn Renderable>>,
    ) -> Option<BoundingSphere> {
        BoundingSphere::enclosing(
            self.members
                .iter()
                .filter_map(|id| renderables.get(*id))
                .filter_map(|r| r.as_projected())
                .map(|p| p.world_bounds()),
        )
    }

    // ========================================================================
    // Membership & capacity
    // ========================================================================

    pub(crate) fn insert_member(&mut self, id: RenderableId, sort_key: impl Fn(RenderableId) -> SortKey) {
        if self.contains(id) {
            return;
        }
        self.warn_if_ready("adding a member");

        self.members.push(id);
        self.sort_members(sort_key);
        if self.members.len() > self.capacity {
            self.grow(self.members.len());
        }
        self.invalidate();
    }

    pub(crate) fn remove_member(&mut self, id: RenderableId) -> bool {
        let Some(position) = self.members.iter().position(|m| *m == id) else {
            return false;
        };
        self.warn_if_ready("removing a member");

        // Removal keeps the remaining order.
        self.members.remove(position);
        self.invalidate();
        true
    }

    /// Re-sorts after a member's render order changed.
    pub(crate) fn resort_members(&mut self, sort_key: impl Fn(RenderableId) -> SortKey) {
        let before = self.members.clone();
        self.sort_members(sort_key);
        if before != self.members {
            self.invalidate();
        }
    }

    /// Grows the shared transform buffer to hold at least `capacity` members.
    /// Capacity never shrinks.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            log::debug!(
                "Render bundle `{}`: capacity {} requested, keeping {}",
                self.label(),
                capacity,
                self.capacity
            );
            return;
        }
        self.warn_if_ready("growing its capacity");
        self.grow(capacity);
        self.invalidate();
    }

    pub(crate) fn take_members(&mut self) -> Vec<RenderableId> {
        let members = std::mem::take(&mut self.members);
        self.invalidate();
        members
    }

    /// A member was shown or hidden.
    pub(crate) fn member_visibility_changed(&mut self) {
        if self.state == BundleState::Empty {
            return;
        }
        self.warn_if_ready("changing a member's visibility");
        self.invalidate();
    }

    /// Every buffer the bundle still owns, for release.
    pub(crate) fn take_buffers(&mut self) -> Vec<BufferId> {
        let Some(transforms) = &mut self.transforms else {
            return Vec::new();
        };
        let mut buffers = std::mem::take(&mut transforms.retired);
        buffers.extend(transforms.buffer.take());
        buffers
    }

    fn sort_members(&mut self, sort_key: impl Fn(RenderableId) -> SortKey) {
        let mut keyed: Vec<(SortKey, RenderableId)> =
            self.members.iter().map(|&id| (sort_key(id), id)).collect();
        keyed.sort_unstable_by(|a, b| compare_opaque(&a.0, &b.0));
        self.members = keyed.into_iter().map(|(_, id)| id).collect();
    }

    fn grow(&mut self, capacity: usize) {
        let capacity = aligned_capacity(capacity, self.alignment);
        log::debug!(
            "Render bundle `{}`: capacity {} -> {}",
            self.label(),
            self.capacity,
            capacity
        );
        self.capacity = capacity;

        if let Some(transforms) = &mut self.transforms {
            transforms.retired.extend(transforms.buffer.take());
        }
    }

    fn invalidate(&mut self) {
        self.recorded = None;
        self.recorded_members.clear();
        self.state = if self.members.is_empty() {
            BundleState::Empty
        } else {
            BundleState::Invalid
        };
        // Slots follow member order, so every member needs a new binding.
        if let Some(transforms) = &mut self.transforms {
            transforms.needs_rebind = true;
            transforms.needs_full_upload = true;
        }
    }

    fn warn_if_ready(&self, action: &str) {
        if self.state == BundleState::Ready {
            log::warn!(
                "Render bundle `{}` is ready; {} discards its recorded commands",
                self.label(),
                action
            );
        }
    }

    // ========================================================================
    // Per-frame
    // ========================================================================

    /// Allocates the shared transform buffer, rebinds members and uploads
    /// transforms. Runs before any pass of the frame is open.
    pub(crate) fn prepare(
        &mut self,
        encoder: &mut dyn FrameEncoder,
        renderables: &mut SlotMap<RenderableId, Box<dyn Renderable>>,
        model_changed: &FxHashSet<RenderableId>,
    ) {
        let Some(transforms) = &mut self.transforms else {
            return;
        };

        for buffer in transforms.retired.drain(..) {
            encoder.destroy_buffer(buffer);
        }

        if self.members.is_empty() {
            return;
        }

        let buffer = if let Some(buffer) = transforms.buffer {
            buffer
        } else {
            let size = self.capacity as u64 * InstanceData::SIZE;
            let buffer = encoder.create_buffer(self.core.label(), size);
            transforms.buffer = Some(buffer);
            transforms.needs_rebind = true;
            transforms.needs_full_upload = true;
            buffer
        };

        if transforms.needs_rebind {
            for (slot, id) in self.members.iter().enumerate() {
                if let Some(member) = renderables.get_mut(*id).and_then(|r| r.as_bundleable_mut()) {
                    member.bind_instance(Some(InstanceBinding {
                        buffer,
                        index: slot as u32,
                    }));
                }
            }
            transforms.needs_rebind = false;
        }

        let instance = |id: &RenderableId| {
            renderables
                .get(*id)
                .and_then(|r| r.as_bundleable())
                .map(|b| b.instance_data())
                .unwrap_or_default()
        };

        if transforms.needs_full_upload {
            let data: Vec<InstanceData> = self.members.iter().map(&instance).collect();
            encoder.write_buffer(buffer, 0, bytemuck::cast_slice(&data));
            transforms.needs_full_upload = false;
        } else {
            for (slot, id) in self.members.iter().enumerate() {
                if model_changed.contains(id) {
                    let data = instance(id);
                    encoder.write_buffer(
                        buffer,
                        slot as u64 * InstanceData::SIZE,
                        bytemuck::bytes_of(&data),
                    );
                }
            }
        }
    }

    /// Replays the recorded sequence, or warms members and encodes once all of
    /// them are ready.
    pub(crate) fn render(
        &mut self,
        ctx: &mut DrawContext<'_>,
        renderables: &mut SlotMap<RenderableId, Box<dyn Renderable>>,
    ) {
        if !self.core.visible() {
            return;
        }

        match self.state {
            BundleState::Empty => return,
            BundleState::Ready if self.drawn_members_changed(renderables) => {
                log::debug!("Render bundle `{}`: drawn members changed, recording again", self.label());
                self.invalidate();
            }
            BundleState::Ready => {
                if let Some(recorded) = &self.recorded {
                    ctx.pass.execute_bundle(recorded);
                }
                return;
            }
            BundleState::Invalid | BundleState::Warming => {}
        }

        self.state = BundleState::Warming;

        let mut ready = 0;
        for id in &self.members {
            if let Some(member) = renderables.get_mut(*id) {
                member.render(ctx);
                if member.is_ready() {
                    ready += 1;
                }
            }
        }

        if ready == self.members.len() {
            self.encode(ctx, renderables);
        } else {
            log::trace!(
                "Render bundle `{}` warming: {}/{} members ready",
                self.label(),
                ready,
                self.members.len()
            );
        }
    }

    fn encode(
        &mut self,
        ctx: &mut DrawContext<'_>,
        renderables: &mut SlotMap<RenderableId, Box<dyn Renderable>>,
    ) {
        let frame_index = ctx.frame_index();
        let mut recorder = BundleRecorder::default();
        {
            let mut bundle_ctx = DrawContext::for_bundle(&mut recorder, &mut *ctx.deferred, frame_index);
            self.recorded_members.clear();
            for id in &self.members {
                if let Some(member) = renderables.get_mut(*id)
                    && is_drawn(&**member)
                {
                    member.render(&mut bundle_ctx);
                    self.recorded_members.push(*id);
                }
            }
        }

        let recorded = recorder.finish(self.core.label(), self.recorded_members.len());
        log::debug!(
            "Render bundle `{}` encoded: {} members, {} draws",
            self.label(),
            recorded.member_count(),
            recorded.draw_count()
        );
        self.recorded = Some(recorded);
        self.state = BundleState::Ready;
    }

    fn drawn_members_changed(&self, renderables: &SlotMap<RenderableId, Box<dyn Renderable>>) -> bool {
        let drawn = self
            .members
            .iter()
            .filter(|id| renderables.get(**id).is_some_and(|r| is_drawn(&**r)));
        !drawn.eq(self.recorded_members.iter())
    }

    /// Drops the recorded sequence and the buffer handle without destroying
    /// it; the device that owned both is gone.
    pub(crate) fn lose_device(&mut self) {
        if let Some(transforms) = &mut self.transforms {
            transforms.buffer = None;
            transforms.retired.clear();
        }
        self.invalidate();
    }
}

/// Visible and not frustum culled.
fn is_drawn(renderable: &dyn Renderable) -> bool {
    renderable.core().visible() && !renderable.as_cullable().is_some_and(|c| c.is_culled())
}
