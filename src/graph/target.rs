//! Offscreen render targets
//!
//! A [`RenderTarget`] owns exactly one render pass and one output texture.
//! The scheduler only needs the pass identity (to key its entry) and the
//! texture handle (for copy-back hooks).

use crate::backend::TextureId;
use crate::graph::pass::{AttachmentView, PassId, RenderPassDescriptor};

slotmap::new_key_type! {
    /// Handle to a render target registered with a scene.
    pub struct RenderTargetId;
}

#[derive(Debug, Clone)]
pub struct RenderTarget {
    pass: RenderPassDescriptor,
    texture: TextureId,
}

impl RenderTarget {
    /// Single-sampled color target without depth.
    #[must_use]
    pub fn new(label: impl Into<String>, texture: TextureId, format: wgpu::TextureFormat) -> Self {
        let pass = RenderPassDescriptor::new(label, 1).with_color_target(
            AttachmentView::Texture(texture),
            format,
            wgpu::Color::TRANSPARENT,
        );
        Self { pass, texture }
    }

    /// Builds a target around an existing descriptor. `texture` must be the
    /// texture the pass resolves its color output into.
    #[must_use]
    pub fn from_descriptor(pass: RenderPassDescriptor, texture: TextureId) -> Self {
        Self { pass, texture }
    }

    #[must_use]
    pub fn with_depth(mut self, texture: TextureId, format: wgpu::TextureFormat) -> Self {
        self.pass = self
            .pass
            .with_depth_target(AttachmentView::Texture(texture), format, 1.0);
        self
    }

    #[inline]
    #[must_use]
    pub fn pass(&self) -> &RenderPassDescriptor {
        &self.pass
    }

    #[inline]
    #[must_use]
    pub fn pass_id(&self) -> PassId {
        self.pass.id()
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        self.pass.label()
    }
}
