//! Per-frame execution
//!
//! Everything here runs inside [`Scene::render`], sequentially, against the
//! single encoder handed in by the caller.

use rustc_hash::FxHashSet;

use crate::backend::{DrawCommand, FrameEncoder};
use crate::graph::{
    AttachmentView, BucketKey, ComputeId, CopyBack, DrawableId, EntryContent, EntryId, LoadOp,
    LoadPolicy, PassCategory, RenderPassDescriptor, RenderPassEntry, RenderTarget,
};
use crate::renderable::{DrawContext, MatrixChanges, RenderableId};

use super::{Placement, Scene, sort_key};

/// Attachments already written this frame. The first write clears.
#[derive(Debug, Default)]
struct WrittenAttachments {
    views: FxHashSet<AttachmentView>,
}

impl WrittenAttachments {
    fn resolve(&mut self, descriptor: &mut RenderPassDescriptor, policy: LoadPolicy) {
        let always_clear = policy == LoadPolicy::AlwaysClear;

        for target in descriptor.color_targets_mut() {
            let first_write = self.views.insert(target.view);
            target.load_op = if first_write || always_clear {
                LoadOp::Clear
            } else {
                LoadOp::Load
            };
        }
        if let Some(depth) = descriptor.depth_target_mut() {
            let first_write = self.views.insert(depth.view);
            depth.load_op = if first_write || always_clear {
                LoadOp::Clear
            } else {
                LoadOp::Load
            };
        }
    }
}

impl Scene {
    /// Records one frame into `encoder`.
    ///
    /// The caller owns the encoder and submits it afterwards. Renderables
    /// that are not ready draw nothing; a frame always runs to completion.
    pub fn render(&mut self, encoder: &mut dyn FrameEncoder) {
        self.frame_index += 1;

        self.apply_deferred();
        for buffer in self.pending_releases.drain(..) {
            encoder.destroy_buffer(buffer);
        }

        let model_changed = self.update_matrices();
        for bundle in self.bundles.values_mut() {
            bundle.prepare(encoder, &mut self.renderables, &model_changed);
        }

        self.run_compute(encoder);

        let mut written = WrittenAttachments::default();
        for category in PassCategory::ALL {
            for entry in self.ordered_entries(category) {
                self.run_entry(entry, encoder, &mut written);
            }
        }
    }

    // ========================================================================
    // Update pass
    // ========================================================================

    /// TRS → model → model-view → frustum for every projected renderable,
    /// then re-sorts the transparent projected buckets that depend on what
    /// moved. Returns the renderables whose model matrix changed.
    fn update_matrices(&mut self) -> FxHashSet<RenderableId> {
        let mut model_changed = FxHashSet::default();

        for (id, renderable) in &mut self.renderables {
            let Some(projected) = renderable.as_projected_mut() else {
                continue;
            };
            let changes = projected.transform_mut().update(&self.camera);

            if changes.contains(MatrixChanges::MODEL) {
                model_changed.insert(id);
            }
            if changes.contains(MatrixChanges::FRUSTUM)
                && let Some(cullable) = renderable.as_cullable_mut()
            {
                cullable.invalidate_intersection();
            }
        }

        let camera_moved = self.sorted_camera_version != Some(self.camera.version());
        self.sorted_camera_version = Some(self.camera.version());

        let depth_sorted = BucketKey::new(true, true);
        let mut dirty: FxHashSet<EntryId> = FxHashSet::default();
        if camera_moved {
            dirty.extend(self.entries.keys());
        } else {
            for id in &model_changed {
                let placement = match self.placements.get(*id) {
                    Some(Placement::Bundle(bundle)) => self.bundle_placements.get(*bundle),
                    other => other,
                };
                if let Some(Placement::Stack { entry, bucket }) = placement
                    && *bucket == depth_sorted
                {
                    dirty.insert(*entry);
                }
            }
        }

        for entry in dirty {
            if let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut) {
                stack.sort_bucket(depth_sorted, |d| {
                    sort_key(&self.renderables, &self.bundles, &self.camera, d)
                });
            }
        }

        model_changed
    }

    // ========================================================================
    // Compute
    // ========================================================================

    fn run_compute(&mut self, encoder: &mut dyn FrameEncoder) {
        let mut order: Vec<(i32, u64, ComputeId)> = self
            .compute
            .iter()
            .map(|(id, work)| (work.render_order(), work.creation_index(), id))
            .collect();
        order.sort_unstable();

        for (_, _, id) in order {
            let Some(work) = self.compute.get_mut(id) else {
                continue;
            };
            if !work.is_ready() {
                log::trace!("Compute pass `{}` not ready, skipped", work.label());
                continue;
            }
            work.encode(encoder);
        }
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Entries of `category` in execution order.
    fn ordered_entries(&self, category: PassCategory) -> Vec<EntryId> {
        let mut entries = self.categories[category.index()].clone();

        let element_key = |id: &EntryId| {
            self.entries
                .get(*id)
                .and_then(RenderPassEntry::element)
                .and_then(|element| self.renderables.get(element))
                .map_or((0, u64::MAX), |r| (r.core().render_order(), r.core().creation_index()))
        };

        match category {
            PassCategory::RenderTarget | PassCategory::Screen => {}
            PassCategory::PingPong | PassCategory::PrePass => {
                entries.sort_by_cached_key(element_key);
            }
            PassCategory::PostProPass => {
                // Passes writing into a target run before passes writing to the screen.
                entries.sort_by_cached_key(|id| {
                    let to_screen = self
                        .entries
                        .get(*id)
                        .is_none_or(|e| e.output_target().is_none());
                    (to_screen, element_key(id))
                });
            }
        }
        entries
    }

    /// A stack entry has content when it holds a visible drawable (a bundle
    /// counts when one of its members is visible); a single-element entry
    /// when its element is visible.
    fn has_content(&self, entry: &RenderPassEntry) -> bool {
        match &entry.content {
            EntryContent::Element(id) => self.renderables.get(*id).is_some_and(|r| r.core().visible()),
            EntryContent::Stack(stack) => stack.iter().any(|(_, drawable)| match drawable {
                DrawableId::Renderable(id) => {
                    self.renderables.get(id).is_some_and(|r| r.core().visible())
                }
                DrawableId::Bundle(id) => self
                    .bundles
                    .get(id)
                    .is_some_and(|b| {
                        b.core().visible()
                            && b.members()
                                .iter()
                                .any(|m| self.renderables.get(*m).is_some_and(|r| r.core().visible()))
                    }),
            }),
        }
    }

    fn run_entry(&mut self, id: EntryId, encoder: &mut dyn FrameEncoder, written: &mut WrittenAttachments) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        if !self.has_content(entry) {
            log::trace!("Entry `{}` has nothing to draw, skipped", entry.label());
            return;
        }
        let on_before = entry.on_before;
        let on_after = entry.on_after;

        if let Some(hook) = on_before {
            self.copy_back(hook, encoder);
        }

        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        written.resolve(&mut entry.descriptor, entry.load_policy);

        encoder.push_debug_group(entry.label());
        {
            let mut pass = encoder.begin_render_pass(&entry.descriptor);
            let mut ctx = DrawContext::new(pass.as_mut(), &mut self.deferred, self.frame_index);

            match &entry.content {
                EntryContent::Element(element) => {
                    if let Some(renderable) = self.renderables.get_mut(*element) {
                        renderable.render(&mut ctx);
                    }
                }
                EntryContent::Stack(stack) => {
                    let mut camera_bound = false;
                    for (bucket, drawable) in stack.iter() {
                        if bucket.projected && !camera_bound {
                            if let Some((index, bind_group)) = self.camera_bind_group {
                                ctx.pass.record(&DrawCommand::SetBindGroup {
                                    index,
                                    bind_group,
                                    offsets: smallvec::SmallVec::new(),
                                });
                            }
                            camera_bound = true;
                        }

                        match drawable {
                            DrawableId::Renderable(rid) => {
                                if let Some(renderable) = self.renderables.get_mut(rid) {
                                    renderable.render(&mut ctx);
                                }
                            }
                            DrawableId::Bundle(bid) => {
                                if let Some(bundle) = self.bundles.get_mut(bid) {
                                    bundle.render(&mut ctx, &mut self.renderables);
                                }
                            }
                        }
                    }
                }
            }
        }
        encoder.pop_debug_group();

        if let Some(hook) = on_after {
            self.copy_back(hook, encoder);
        }
    }

    fn copy_back(&self, hook: CopyBack, encoder: &mut dyn FrameEncoder) {
        let resolved = hook.resolve(encoder.swap_chain_texture(), |target| {
            self.targets.get(target).map(RenderTarget::texture)
        });
        match resolved {
            Some((source, destination)) => encoder.copy_texture_to_texture(source, destination),
            None => log::trace!("Copy hook skipped: {hook:?} has a missing side"),
        }
    }
}
