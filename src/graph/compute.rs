//! Compute passes
//!
//! Compute work always runs before the first render pass of a frame, sorted
//! by `(render_order, creation_index)`. Work that is not ready yet is skipped.

use crate::backend::{ComputeDispatch, FrameEncoder};
use crate::renderable::CreationCounter;

slotmap::new_key_type! {
    /// Handle to compute work registered with a scene.
    pub struct ComputeId;
}

/// Anything the scene dispatches before its render passes.
pub trait ComputeWork {
    fn label(&self) -> &str;

    fn render_order(&self) -> i32;

    fn creation_index(&self) -> u64;

    fn is_ready(&self) -> bool;

    /// Encodes this frame's dispatches.
    fn encode(&mut self, encoder: &mut dyn FrameEncoder);

    fn on_device_lost(&mut self) {}
}

/// A single dispatch with a fixed workgroup count.
#[derive(Debug, Clone)]
pub struct ComputePass {
    label: String,
    render_order: i32,
    creation_index: u64,
    dispatch: Option<ComputeDispatch>,
}

impl ComputePass {
    #[must_use]
    pub fn new(counter: &CreationCounter, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            render_order: 0,
            creation_index: counter.next_index(),
            dispatch: None,
        }
    }

    #[must_use]
    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.render_order = render_order;
        self
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: ComputeDispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// `None` while the compute pipeline is not created.
    pub fn set_dispatch(&mut self, dispatch: Option<ComputeDispatch>) {
        self.dispatch = dispatch;
    }

    #[inline]
    #[must_use]
    pub fn dispatch(&self) -> Option<&ComputeDispatch> {
        self.dispatch.as_ref()
    }
}

impl ComputeWork for ComputePass {
    fn label(&self) -> &str {
        &self.label
    }

    fn render_order(&self) -> i32 {
        self.render_order
    }

    fn creation_index(&self) -> u64 {
        self.creation_index
    }

    fn is_ready(&self) -> bool {
        self.dispatch.is_some()
    }

    fn encode(&mut self, encoder: &mut dyn FrameEncoder) {
        if let Some(dispatch) = &self.dispatch {
            encoder.dispatch(&self.label, dispatch);
        }
    }

    fn on_device_lost(&mut self) {
        self.dispatch = None;
    }
}
