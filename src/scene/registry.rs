//! Entry registry and routing
//!
//! Routing precedence for stack drawables:
//! 1. the drawable's custom pass entry
//! 2. the transmission target, for transmissive drawables
//! 3. the drawable's output target
//! 4. the default screen entry
//!
//! A reference that no longer resolves falls through to the next rule.

use crate::errors::{Result, SchedulerError};
use crate::graph::{
    BucketKey, CopyBack, DrawableId, EntryId, LoadPolicy, PassCategory, PassId, RenderPassEntry,
    RenderTarget, RenderTargetId, TextureSource,
};
use crate::renderable::{FeedbackPlane, FullscreenPass, Renderable, RenderableCore, RenderableId};

use super::{Placement, Scene, member_key, screen_descriptor, sort_key};

impl Scene {
    // ========================================================================
    // Screen entries
    // ========================================================================

    /// Adds a screen entry drawing into the swap chain. A negative `order`
    /// puts it before every existing screen entry, otherwise after them.
    pub fn create_screen_pass_entry(&mut self, label: &str, order: i32) -> EntryId {
        let entry = self.entries.insert(RenderPassEntry::with_stack(
            label,
            PassCategory::Screen,
            screen_descriptor(&self.settings, label),
        ));

        let screen = &mut self.categories[PassCategory::Screen.index()];
        if order < 0 {
            screen.insert(0, entry);
        } else {
            screen.push(entry);
        }

        log::debug!("Screen pass entry `{label}` created");
        entry
    }

    /// Removes a screen entry; its drawables are routed again.
    pub fn remove_screen_pass_entry(&mut self, entry: EntryId) -> Result<()> {
        if entry == self.default_entry {
            return Err(SchedulerError::DefaultEntryRemoval);
        }
        match self.entries.get(entry) {
            Some(e) if e.category() == PassCategory::Screen => {}
            _ => return Err(SchedulerError::EntryNotFound(entry)),
        }

        self.remove_entry(entry);
        Ok(())
    }

    /// Entry drawing with the descriptor identified by `pass`. Render target
    /// entries win over single-element entries sharing the same pass.
    #[must_use]
    pub fn entry_for_pass(&self, pass: PassId) -> Option<EntryId> {
        if let Some(target) = self.target_by_pass.get(&pass) {
            return self.target_entries.get(*target).copied();
        }
        PassCategory::ALL
            .into_iter()
            .flat_map(|category| self.categories[category.index()].iter().copied())
            .find(|id| self.entries.get(*id).is_some_and(|e| e.descriptor().id() == pass))
    }

    // ========================================================================
    // Render targets
    // ========================================================================

    /// Registers `target` with its own render target entry. Registering a
    /// target whose pass is already known returns the existing handle.
    pub fn add_render_target(&mut self, target: RenderTarget) -> RenderTargetId {
        if let Some(existing) = self.target_by_pass.get(&target.pass_id()) {
            return *existing;
        }

        let pass_id = target.pass_id();
        let mut entry = RenderPassEntry::with_stack(
            target.label().to_owned(),
            PassCategory::RenderTarget,
            target.pass().clone(),
        );
        let id = self.targets.insert(target);
        entry.output_target = Some(id);

        let entry = self.entries.insert(entry);
        self.categories[PassCategory::RenderTarget.index()].push(entry);
        self.target_entries.insert(id, entry);
        self.target_by_pass.insert(pass_id, id);

        // Drawables created against this target before it was registered.
        self.refresh_routing();
        id
    }

    /// Unregisters a target. Drawables of its entry are routed again and
    /// copy hooks reading from it become no-ops.
    pub fn remove_render_target(&mut self, id: RenderTargetId) -> Result<RenderTarget> {
        let target = self
            .targets
            .remove(id)
            .ok_or(SchedulerError::RenderTargetNotFound(id))?;
        self.target_by_pass.remove(&target.pass_id());
        if self.transmission_target == Some(id) {
            self.transmission_target = None;
        }

        if let Some(entry) = self.target_entries.remove(id) {
            self.remove_entry(entry);
        }
        self.refresh_routing();
        Ok(target)
    }

    /// Routes transmissive drawables to `target`'s entry.
    pub fn set_transmission_target(&mut self, target: Option<RenderTargetId>) {
        if let Some(t) = target
            && !self.targets.contains_key(t)
        {
            log::warn!("Transmission target {t:?} is not registered; ignoring");
            return;
        }
        self.transmission_target = target;
        self.refresh_routing();
    }

    // ========================================================================
    // Stack drawables
    // ========================================================================

    /// Adds a drawable to the stack its routing resolves to, or to its render
    /// bundle if it references one.
    pub fn add_mesh(&mut self, renderable: impl Renderable) -> RenderableId {
        self.add_renderable(Box::new(renderable))
    }

    pub fn add_renderable(&mut self, renderable: Box<dyn Renderable>) -> RenderableId {
        let bundle = renderable.as_bundleable().and_then(|b| b.render_bundle());
        let id = self.renderables.insert(renderable);

        if let Some(bundle) = bundle {
            if self.bundles.contains_key(bundle) {
                self.join_bundle(id, bundle);
                return id;
            }
            log::warn!("Render bundle {bundle:?} is not registered; adding to its stack instead");
            if let Some(b) = self.renderables[id].as_bundleable_mut() {
                b.set_render_bundle(None);
            }
        }

        self.place(id, None);
        id
    }

    /// Removes a drawable from its bucket or bundle and hands it back.
    pub fn remove_mesh(&mut self, id: RenderableId) -> Option<Box<dyn Renderable>> {
        match self.placements.get(id).copied() {
            Some(Placement::Element(entry)) => {
                self.placements.remove(id);
                self.remove_entry(entry);
            }
            Some(_) => {
                self.unplace(id);
            }
            None => {}
        }
        self.renderables.remove(id)
    }

    /// Shows or hides a drawable. A bundle holding it records again.
    pub fn set_visible(&mut self, id: RenderableId, visible: bool) -> Result<()> {
        let renderable = self
            .renderables
            .get_mut(id)
            .ok_or(SchedulerError::RenderableNotFound(id))?;
        if renderable.core().visible() == visible {
            return Ok(());
        }
        renderable.core_mut().set_visible(visible);

        if let Some(Placement::Bundle(bundle)) = self.placements.get(id).copied()
            && let Some(bundle) = self.bundles.get_mut(bundle)
        {
            bundle.member_visibility_changed();
        }
        Ok(())
    }

    /// Changes the render order and re-sorts whatever holds the drawable.
    pub fn set_render_order(&mut self, id: RenderableId, render_order: i32) -> Result<()> {
        let renderable = self
            .renderables
            .get_mut(id)
            .ok_or(SchedulerError::RenderableNotFound(id))?;
        if renderable.core().render_order() == render_order {
            return Ok(());
        }
        renderable.core_mut().set_render_order(render_order);

        match self.placements.get(id).copied() {
            Some(Placement::Stack { entry, bucket }) => {
                if let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut) {
                    stack.sort_bucket(bucket, |d| {
                        sort_key(&self.renderables, &self.bundles, &self.camera, d)
                    });
                }
            }
            Some(Placement::Bundle(bundle)) => {
                if let Some(bundle) = self.bundles.get_mut(bundle) {
                    bundle.resort_members(|r| member_key(&self.renderables, r));
                }
            }
            // Single-element entries are ordered when the frame runs.
            Some(Placement::Element(_)) | None => {}
        }
        Ok(())
    }

    /// Moves the drawable between the opaque and transparent buckets.
    pub fn set_transparent(&mut self, id: RenderableId, transparent: bool) -> Result<()> {
        self.reconfigure(id, |core| core.set_transparent(transparent))
    }

    /// Routes the drawable into `target`'s entry. An unregistered target is
    /// rejected with a warning and nothing changes.
    pub fn set_output_target(&mut self, id: RenderableId, target: Option<RenderTargetId>) -> Result<()> {
        if let Some(t) = target
            && !self.targets.contains_key(t)
        {
            log::warn!("{t:?} is not a registered render target; output target unchanged");
            return Ok(());
        }
        self.reconfigure(id, |core| core.set_output_target(target))
    }

    pub fn set_custom_entry(&mut self, id: RenderableId, entry: Option<EntryId>) -> Result<()> {
        if let Some(e) = entry
            && !self.entries.get(e).is_some_and(|e| e.stack().is_some())
        {
            log::warn!("{e:?} is not a stack entry; custom entry unchanged");
            return Ok(());
        }
        self.reconfigure(id, |core| core.set_custom_entry(entry))
    }

    fn reconfigure(&mut self, id: RenderableId, apply: impl FnOnce(&mut RenderableCore)) -> Result<()> {
        let renderable = self
            .renderables
            .get_mut(id)
            .ok_or(SchedulerError::RenderableNotFound(id))?;

        if let Some(Placement::Element(_)) = self.placements.get(id) {
            log::warn!(
                "`{}` owns its pass entry; its placement is fixed at registration",
                renderable.core().label()
            );
            return Ok(());
        }

        apply(renderable.core_mut());

        // Bundle members follow their bundle's placement.
        if let Some(Placement::Stack { entry, .. }) = self.placements.get(id).copied() {
            self.unplace(id);
            self.place(id, Some(entry));
        }
        Ok(())
    }

    // ========================================================================
    // Single-element entries
    // ========================================================================

    /// Registers a full-screen pass in its own pre-pass or post-processing
    /// entry.
    pub fn add_shader_pass(&mut self, pass: FullscreenPass) -> RenderableId {
        let category = if pass.is_pre_pass() {
            PassCategory::PrePass
        } else {
            PassCategory::PostProPass
        };
        let label = pass.core().label().to_owned();

        let output = pass.core().output_target();
        let output = match output {
            Some(target) if self.targets.contains_key(target) => Some(target),
            Some(target) => {
                log::warn!("Shader pass `{label}`: {target:?} is not registered; drawing to the screen");
                None
            }
            None => None,
        };

        let descriptor = match output {
            Some(target) => self.targets[target].pass().clone(),
            None => self.post_processing.duplicate(label.clone()),
        };

        let render_texture = pass.render_texture();
        let needs_swap_chain_copy = pass.input_target().is_none() && output.is_none();
        let copy_output = pass.copies_output_to_render_texture();

        let id = self.renderables.insert(Box::new(pass));
        let mut entry = RenderPassEntry::with_element(label, category, descriptor, id);
        entry.output_target = output;

        // The pass samples the swap chain: snapshot it, then draw over it.
        if needs_swap_chain_copy {
            entry.on_before = Some(CopyBack::new(TextureSource::SwapChain, render_texture));
            entry.load_policy = LoadPolicy::AlwaysClear;
        }
        if copy_output {
            let source = match output {
                Some(target) => TextureSource::Target(target),
                None => TextureSource::SwapChain,
            };
            entry.on_after = Some(CopyBack::new(source, render_texture));
        }

        self.insert_element_entry(id, category, entry);
        id
    }

    pub fn remove_shader_pass(&mut self, id: RenderableId) -> Option<Box<dyn Renderable>> {
        self.remove_mesh(id)
    }

    /// Registers a feedback plane drawing into its render target, then
    /// copying the result into its input texture.
    pub fn add_ping_pong_plane(&mut self, plane: FeedbackPlane) -> Result<RenderableId> {
        let target = plane.target();
        let descriptor = self
            .targets
            .get(target)
            .ok_or(SchedulerError::RenderTargetNotFound(target))?
            .pass()
            .clone();

        let label = plane.core().label().to_owned();
        let input = plane.input_texture();
        let id = self.renderables.insert(Box::new(plane));

        let mut entry = RenderPassEntry::with_element(label, PassCategory::PingPong, descriptor, id);
        entry.output_target = Some(target);
        entry.on_after = Some(CopyBack::new(TextureSource::Target(target), input));

        self.insert_element_entry(id, PassCategory::PingPong, entry);
        Ok(id)
    }

    pub fn remove_ping_pong_plane(&mut self, id: RenderableId) -> Option<Box<dyn Renderable>> {
        self.remove_mesh(id)
    }

    fn insert_element_entry(&mut self, id: RenderableId, category: PassCategory, entry: RenderPassEntry) {
        log::debug!("{} entry `{}` created", category.name(), entry.label());
        let entry = self.entries.insert(entry);
        self.categories[category.index()].push(entry);
        self.placements.insert(id, Placement::Element(entry));
    }

    // ========================================================================
    // Placement
    // ========================================================================

    pub(super) fn resolve_entry(&self, core: &RenderableCore) -> EntryId {
        self.route(core).0
    }

    /// Resolved entry, and the first dangling reference routing skipped.
    fn route(&self, core: &RenderableCore) -> (EntryId, Option<&'static str>) {
        let mut dangling = None;

        if let Some(entry) = core.custom_entry() {
            if self.entries.get(entry).is_some_and(|e| e.stack().is_some()) {
                return (entry, None);
            }
            dangling = Some("custom pass entry");
        }

        if core.is_transmissive()
            && let Some(entry) = self
                .transmission_target
                .and_then(|t| self.target_entries.get(t).copied())
        {
            return (entry, dangling);
        }

        if let Some(target) = core.output_target() {
            if let Some(entry) = self.target_entries.get(target) {
                return (*entry, dangling);
            }
            dangling = dangling.or(Some("output target"));
        }

        (self.default_entry, dangling)
    }

    /// Resolves the entry of a drawable being (re)placed. Falling back past a
    /// dangling reference warns only when the drawable actually moves.
    pub(super) fn resolve_placement(&self, core: &RenderableCore, previous: Option<EntryId>) -> EntryId {
        let (entry, dangling) = self.route(core);
        if let Some(what) = dangling
            && previous != Some(entry)
            && cfg!(debug_assertions)
        {
            let fallback = self.entries.get(entry).map_or("?", RenderPassEntry::label);
            log::warn!(
                "`{}`: {} is not registered; routed to `{}`",
                core.label(),
                what,
                fallback
            );
        }
        entry
    }

    /// Inserts a stack drawable into its resolved bucket. `previous` is the
    /// entry it was taken out of, if any.
    pub(super) fn place(&mut self, id: RenderableId, previous: Option<EntryId>) {
        let Some(renderable) = self.renderables.get(id) else {
            return;
        };
        let core = renderable.core();
        let entry = self.resolve_placement(core, previous);
        let bucket = BucketKey::new(core.uses_projection(), core.is_transparent());

        if let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut) {
            stack.insert(bucket, DrawableId::Renderable(id), |d| {
                sort_key(&self.renderables, &self.bundles, &self.camera, d)
            });
            self.placements.insert(id, Placement::Stack { entry, bucket });
        }
    }

    /// Takes a stack drawable or bundle member out of its slot.
    pub(super) fn unplace(&mut self, id: RenderableId) -> Option<Placement> {
        let placement = self.placements.remove(id)?;
        match placement {
            Placement::Stack { entry, .. } => {
                if let Some(stack) = self.entries.get_mut(entry).and_then(RenderPassEntry::stack_mut) {
                    stack.remove(DrawableId::Renderable(id), |d| {
                        sort_key(&self.renderables, &self.bundles, &self.camera, d)
                    });
                }
            }
            Placement::Bundle(bundle) => {
                if let Some(bundle) = self.bundles.get_mut(bundle) {
                    bundle.remove_member(id);
                }
            }
            Placement::Element(_) => {}
        }
        Some(placement)
    }

    /// Removes an entry; stack content is routed again.
    pub(super) fn remove_entry(&mut self, entry: EntryId) {
        let Some(removed) = self.entries.remove(entry) else {
            return;
        };
        self.categories[removed.category().index()].retain(|e| *e != entry);
        log::debug!("{} entry `{}` removed", removed.category().name(), removed.label());

        if let Some(mut stack) = removed.stack().cloned() {
            for drawable in stack.drain() {
                match drawable {
                    DrawableId::Renderable(id) => {
                        self.placements.remove(id);
                        self.place(id, Some(entry));
                    }
                    DrawableId::Bundle(id) => {
                        self.bundle_placements.remove(id);
                        self.place_bundle(id, Some(entry));
                    }
                }
            }
        }
    }

    /// Re-places every stack drawable whose routing changed.
    pub(super) fn refresh_routing(&mut self) {
        let stale: Vec<(RenderableId, EntryId)> = self
            .placements
            .iter()
            .filter_map(|(id, placement)| match placement {
                Placement::Stack { entry, .. } => {
                    let core = self.renderables.get(id)?.core();
                    (self.resolve_entry(core) != *entry).then_some((id, *entry))
                }
                _ => None,
            })
            .collect();
        for (id, previous) in stale {
            self.unplace(id);
            self.place(id, Some(previous));
        }

        let stale_bundles: Vec<_> = self
            .bundle_placements
            .iter()
            .filter_map(|(id, placement)| match placement {
                Placement::Stack { entry, .. } => {
                    let core = self.bundles.get(id)?.core();
                    (self.resolve_entry(core) != *entry).then_some((id, *entry))
                }
                _ => None,
            })
            .collect();
        for (id, previous) in stale_bundles {
            self.unplace_bundle(id);
            self.place_bundle(id, Some(previous));
        }
    }
}
