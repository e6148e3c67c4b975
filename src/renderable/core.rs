use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::graph::{EntryId, RenderTargetId};

/// Source of creation indices.
///
/// One counter is shared by everything drawn by a scene; indices are handed
/// out once, in construction order, and never reused.
#[derive(Debug, Default)]
pub struct CreationCounter {
    next: AtomicU64,
}

impl CreationCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_index(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Index the next call to [`next_index`](Self::next_index) returns.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Identity and ordering attributes shared by every drawable.
///
/// Attributes that decide where a drawable is bucketed (render order,
/// projection, transparency, routing) are set through the builder methods
/// before registration, or through the [`Scene`](crate::Scene) afterwards so
/// the affected buckets are re-sorted.
#[derive(Debug, Clone)]
pub struct RenderableCore {
    uuid: Uuid,
    label: String,
    creation_index: u64,
    render_order: i32,
    visible: bool,
    uses_projection: bool,
    transparent: bool,
    transmissive: bool,
    output_target: Option<RenderTargetId>,
    custom_entry: Option<EntryId>,
}

impl RenderableCore {
    #[must_use]
    pub fn new(counter: &CreationCounter, label: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            label: label.into(),
            creation_index: counter.next_index(),
            render_order: 0,
            visible: true,
            uses_projection: false,
            transparent: false,
            transmissive: false,
            output_target: None,
            custom_entry: None,
        }
    }

    // ========================================================================
    // Builders
    // ========================================================================

    #[must_use]
    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.render_order = render_order;
        self
    }

    #[must_use]
    pub fn with_projection(mut self, uses_projection: bool) -> Self {
        self.uses_projection = uses_projection;
        self
    }

    #[must_use]
    pub fn with_transparency(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Transmissive drawables are routed to the scene's transmission target
    /// when one is set.
    #[must_use]
    pub fn with_transmission(mut self, transmissive: bool) -> Self {
        self.transmissive = transmissive;
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

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn creation_index(&self) -> u64 {
        self.creation_index
    }

    #[inline]
    #[must_use]
    pub fn render_order(&self) -> i32 {
        self.render_order
    }

    #[inline]
    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    #[inline]
    #[must_use]
    pub fn uses_projection(&self) -> bool {
        self.uses_projection
    }

    #[inline]
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    #[inline]
    #[must_use]
    pub fn is_transmissive(&self) -> bool {
        self.transmissive
    }

    #[inline]
    #[must_use]
    pub fn output_target(&self) -> Option<RenderTargetId> {
        self.output_target
    }

    #[inline]
    #[must_use]
    pub fn custom_entry(&self) -> Option<EntryId> {
        self.custom_entry
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Visibility never changes bucket placement.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_render_order(&mut self, render_order: i32) {
        self.render_order = render_order;
    }

    pub(crate) fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
    }

    pub(crate) fn set_output_target(&mut self, target: Option<RenderTargetId>) {
        self.output_target = target;
    }

    pub(crate) fn set_custom_entry(&mut self, entry: Option<EntryId>) {
        self.custom_entry = entry;
    }
}
