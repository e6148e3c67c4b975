//! Render bundle management
//!
//! A bundle's layout is checked against the entry it resolves to when it is
//! created; a mismatch fails creation. Members leave the ordinary stacks while
//! they belong to a bundle and go back to them when they leave it.

use crate::errors::{Result, SchedulerError};
use crate::graph::{
    BucketKey, BundleId, DrawableId, EntryId, PassLayout, RenderBundle, RenderBundleOptions,
    RenderPassEntry,
};
use crate::renderable::RenderableId;

use super::{Placement, Scene, member_key, sort_key};

impl Scene {
    /// Creates an empty bundle in the stack its options route to.
    pub fn create_render_bundle(&mut self, options: RenderBundleOptions) -> Result<BundleId> {
        let candidate = RenderBundle::new(
            &self.counter,
            &options,
            PassLayout::default(),
            self.settings.default_bundle_capacity,
            self.settings.instance_alignment,
        );
        let entry_id = self.resolve_entry(candidate.core());
        let entry = self
            .entries
            .get(entry_id)
            .ok_or(SchedulerError::EntryNotFound(entry_id))?;

        let pass_layout = entry.descriptor().layout();
        if let Some(declared) = &options.layout
            && let Some(detail) = declared.mismatch(&pass_layout)
        {
            return Err(SchedulerError::BundleDescriptorMismatch {
                bundle: options.label,
                pass: entry.label().to_owned(),
                detail,
            });
        }

        let mut bundle = candidate;
        bundle.set_layout(pass_layout);
        let id = self.bundles.insert(bundle);
        self.place_bundle(id, None);

        log::debug!("Render bundle `{}` created", options.label);
        Ok(id)
    }

    /// Moves a drawable out of its stack into `bundle`.
    pub fn add_to_bundle(&mut self, bundle: BundleId, id: RenderableId) -> Result<()> {
        if !self.bundles.contains_key(bundle) {
            return Err(SchedulerError::BundleNotFound(bundle));
        }
        let renderable = self
            .renderables
            .get(id)
            .ok_or(SchedulerError::RenderableNotFound(id))?;
        let label = renderable.core().label().to_owned();
        let Some(bundleable) = renderable.as_bundleable() else {
            return Err(SchedulerError::NotBundleable(label));
        };

        match self.placements.get(id).copied() {
            Some(Placement::Bundle(current)) if current == bundle => return Ok(()),
            Some(Placement::Bundle(current)) => {
                return Err(SchedulerError::AlreadyBundled { label, bundle: current });
            }
            Some(Placement::Element(_)) => return Err(SchedulerError::NotBundleable(label)),
            Some(Placement::Stack { .. }) | None => {}
        }
        if let Some(current) = bundleable.render_bundle()
            && current != bundle
            && self.bundles.contains_key(current)
        {
            return Err(SchedulerError::AlreadyBundled { label, bundle: current });
        }

        self.unplace(id);
        self.join_bundle(id, bundle);
        Ok(())
    }

    /// Takes a drawable out of `bundle` and puts it back into its stack.
    pub fn remove_from_bundle(&mut self, bundle: BundleId, id: RenderableId) -> Result<()> {
        if !self.bundles.contains_key(bundle) {
            return Err(SchedulerError::BundleNotFound(bundle));
        }
        let renderable = self
            .renderables
            .get(id)
            .ok_or(SchedulerError::RenderableNotFound(id))?;
        if self.placements.get(id).copied() != Some(Placement::Bundle(bundle)) {
            return Err(SchedulerError::NotBundleMember {
                label: renderable.core().label().to_owned(),
                bundle,
            });
        }

        let previous = self.bundle_entry(bundle);
        self.unplace(id);
        self.leave_bundle(id);
        self.place(id, previous);
        Ok(())
    }

    /// Grows the shared transform buffer of `bundle`; capacity never shrinks.
    pub fn set_bundle_capacity(&mut self, bundle: BundleId, capacity: usize) -> Result<()> {
        self.bundles
            .get_mut(bundle)
            .ok_or(SchedulerError::BundleNotFound(bundle))?
            .set_capacity(capacity);
        Ok(())
    }

    pub fn set_bundle_visible(&mut self, bundle: BundleId, visible: bool) -> Result<()> {
        self.bundles
            .get_mut(bundle)
            .ok_or(SchedulerError::BundleNotFound(bundle))?
            .core_mut()
            .set_visible(visible);
        Ok(())
    }

    /// Changes a bundle's render order; the bundle sorts as one unit.
    pub fn set_bundle_render_order(&mut self, bundle: BundleId, render_order: i32) -> Result<()> {
        self.bundles
            .get_mut(bundle)
            .ok_or(SchedulerError::BundleNotFound(bundle))?
            .core_mut()
            .set_render_order(render_order);

        if let Some(Placement::Stack { entry, bucket }) = self.bundle_placements.get(bundle).copied()
            && let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut)
        {
            stack.sort_bucket(bucket, |d| sort_key(&self.renderables, &self.bundles, &self.camera, d));
        }
        Ok(())
    }

    /// Returns every member to the ordinary stacks, then releases the bundle.
    pub fn destroy_render_bundle(&mut self, bundle: BundleId) -> Result<()> {
        let members = self
            .bundles
            .get_mut(bundle)
            .ok_or(SchedulerError::BundleNotFound(bundle))?
            .take_members();

        let previous = self.bundle_entry(bundle);
        for id in members {
            self.placements.remove(id);
            self.leave_bundle(id);
            self.place(id, previous);
        }

        self.unplace_bundle(bundle);
        if let Some(mut removed) = self.bundles.remove(bundle) {
            self.pending_releases.extend(removed.take_buffers());
            log::debug!("Render bundle `{}` destroyed", removed.label());
        }
        Ok(())
    }

    pub(super) fn join_bundle(&mut self, id: RenderableId, bundle: BundleId) {
        if let Some(b) = self.renderables.get_mut(id).and_then(|r| r.as_bundleable_mut()) {
            b.set_render_bundle(Some(bundle));
        }
        if let Some(b) = self.bundles.get_mut(bundle) {
            b.insert_member(id, |r| member_key(&self.renderables, r));
            self.placements.insert(id, Placement::Bundle(bundle));
        }
    }

    fn leave_bundle(&mut self, id: RenderableId) {
        if let Some(b) = self.renderables.get_mut(id).and_then(|r| r.as_bundleable_mut()) {
            b.set_render_bundle(None);
            b.bind_instance(None);
        }
    }

    /// Entry whose stack holds `bundle`.
    fn bundle_entry(&self, bundle: BundleId) -> Option<EntryId> {
        match self.bundle_placements.get(bundle)? {
            Placement::Stack { entry, .. } => Some(*entry),
            _ => None,
        }
    }

    pub(super) fn place_bundle(&mut self, bundle: BundleId, previous: Option<EntryId>) {
        let Some(b) = self.bundles.get(bundle) else {
            return;
        };
        let core = b.core();
        let entry = self.resolve_placement(core, previous);
        let bucket = BucketKey::new(core.uses_projection(), core.is_transparent());

        if let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut) {
            stack.insert(bucket, DrawableId::Bundle(bundle), |d| {
                sort_key(&self.renderables, &self.bundles, &self.camera, d)
            });
            self.bundle_placements.insert(bundle, Placement::Stack { entry, bucket });
        }
    }

    pub(super) fn unplace_bundle(&mut self, bundle: BundleId) {
        if let Some(Placement::Stack { entry, .. }) = self.bundle_placements.remove(bundle)
            && let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut)
        {
            stack.remove(DrawableId::Bundle(bundle), |d| {
                sort_key(&self.renderables, &self.bundles, &self.camera, d)
            });
        }
    }
}
