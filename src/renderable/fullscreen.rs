use crate::backend::{DrawRecipe, TextureId};
use crate::graph::RenderTargetId;

use super::{CreationCounter, DrawContext, Renderable, RenderableCore};

/// A full-screen triangle drawn in its own pass entry.
///
/// Post-processing passes (the default) run after the screen entries;
/// pre-passes run before them. A pass that samples neither an input target
/// nor writes into an output target reads the swap chain through
/// `render_texture`, which the scene fills with a copy before the pass runs.
#[derive(Debug, Clone)]
pub struct FullscreenPass {
    core: RenderableCore,
    draw: Option<DrawRecipe>,
    pre_pass: bool,
    input_target: Option<RenderTargetId>,
    render_texture: Option<TextureId>,
    copy_output_to_render_texture: bool,
}

impl FullscreenPass {
    #[must_use]
    pub fn new(counter: &CreationCounter, label: impl Into<String>) -> Self {
        Self {
            core: RenderableCore::new(counter, label),
            draw: None,
            pre_pass: false,
            input_target: None,
            render_texture: None,
            copy_output_to_render_texture: false,
        }
    }

    #[must_use]
    pub fn pre_pass(mut self) -> Self {
        self.pre_pass = true;
        self
    }

    #[must_use]
    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.core = self.core.with_render_order(render_order);
        self
    }

    /// Samples `target`'s output instead of the swap chain.
    #[must_use]
    pub fn with_input_target(mut self, target: RenderTargetId) -> Self {
        self.input_target = Some(target);
        self
    }

    #[must_use]
    pub fn with_output_target(mut self, target: RenderTargetId) -> Self {
        self.core = self.core.with_output_target(target);
        self
    }

    #[must_use]
    pub fn with_render_texture(mut self, texture: TextureId) -> Self {
        self.render_texture = Some(texture);
        self
    }

    /// After drawing, copy the swap chain back into `render_texture` so
    /// later passes can sample this pass's result.
    #[must_use]
    pub fn copy_output_to_render_texture(mut self) -> Self {
        self.copy_output_to_render_texture = true;
        self
    }

    #[must_use]
    pub fn with_draw(mut self, draw: DrawRecipe) -> Self {
        self.draw = Some(draw);
        self
    }

    pub fn set_draw(&mut self, draw: Option<DrawRecipe>) {
        self.draw = draw;
    }

    #[inline]
    #[must_use]
    pub fn is_pre_pass(&self) -> bool {
        self.pre_pass
    }

    #[inline]
    #[must_use]
    pub fn input_target(&self) -> Option<RenderTargetId> {
        self.input_target
    }

    #[inline]
    #[must_use]
    pub fn render_texture(&self) -> Option<TextureId> {
        self.render_texture
    }

    #[inline]
    #[must_use]
    pub fn copies_output_to_render_texture(&self) -> bool {
        self.copy_output_to_render_texture
    }
}

impl Renderable for FullscreenPass {
    fn core(&self) -> &RenderableCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RenderableCore {
        &mut self.core
    }

    fn is_ready(&self) -> bool {
        self.draw.is_some()
    }

    fn render(&mut self, ctx: &mut DrawContext<'_>) {
        if !self.core.visible() {
            return;
        }
        if let Some(draw) = &self.draw {
            draw.encode(ctx.pass, None);
        }
    }

    fn on_device_lost(&mut self) {
        self.draw = None;
    }
}
