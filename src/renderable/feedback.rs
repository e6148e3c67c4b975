use crate::backend::{DrawRecipe, TextureId};
use crate::graph::RenderTargetId;

use super::{CreationCounter, DrawContext, Renderable, RenderableCore};

/// Ping-pong plane: draws into its own render target, then the target is
/// copied into `input_texture` so the next frame can sample this frame's
/// result.
#[derive(Debug, Clone)]
pub struct FeedbackPlane {
    core: RenderableCore,
    target: RenderTargetId,
    draw: Option<DrawRecipe>,
    input_texture: Option<TextureId>,
}

impl FeedbackPlane {
    #[must_use]
    pub fn new(counter: &CreationCounter, label: impl Into<String>, target: RenderTargetId) -> Self {
        Self {
            core: RenderableCore::new(counter, label).with_output_target(target),
            target,
            draw: None,
            input_texture: None,
        }
    }

    #[must_use]
    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.core = self.core.with_render_order(render_order);
        self
    }

    #[must_use]
    pub fn with_input_texture(mut self, texture: TextureId) -> Self {
        self.input_texture = Some(texture);
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

    /// Render target the plane draws into.
    #[inline]
    #[must_use]
    pub fn target(&self) -> RenderTargetId {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn input_texture(&self) -> Option<TextureId> {
        self.input_texture
    }
}

impl Renderable for FeedbackPlane {
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
