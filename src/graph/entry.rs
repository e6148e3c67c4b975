//! Render pass entries
//!
//! A [`RenderPassEntry`] pairs one output pass with what gets drawn into it:
//! either a single renderable (full-screen passes, ping-pong planes) or a
//! bucketed [`Stack`]. Entries are grouped by [`PassCategory`], and the
//! categories execute in a fixed order every frame.

use crate::backend::TextureId;
use crate::graph::pass::RenderPassDescriptor;
use crate::graph::stack::Stack;
use crate::graph::target::RenderTargetId;
use crate::renderable::RenderableId;

slotmap::new_key_type! {
    /// Handle to a pass entry registered with a scene.
    pub struct EntryId;
}

/// Entry category, in execution order.
///
/// | Category | Content |
/// |----------|---------|
/// | `PingPong` | feedback planes drawing into their own target |
/// | `RenderTarget` | stacks drawn into offscreen targets |
/// | `PrePass` | full-screen passes drawn before the scene |
/// | `Screen` | stacks drawn into the swap chain |
/// | `PostProPass` | full-screen post-processing passes |
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum PassCategory {
    PingPong = 0,
    RenderTarget = 1,
    PrePass = 2,
    Screen = 3,
    PostProPass = 4,
}

impl PassCategory {
    /// All categories in execution order.
    pub const ALL: [PassCategory; 5] = [
        Self::PingPong,
        Self::RenderTarget,
        Self::PrePass,
        Self::Screen,
        Self::PostProPass,
    ];

    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PingPong => "PingPong",
            Self::RenderTarget => "RenderTarget",
            Self::PrePass => "PrePass",
            Self::Screen => "Screen",
            Self::PostProPass => "PostProPass",
        }
    }
}

/// How an entry's attachments are loaded at pass begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Clear an attachment on its first write this frame, load it afterwards.
    #[default]
    FirstWriteClears,
    /// Always clear. Used by passes that snapshot the swap chain before drawing.
    AlwaysClear,
}

/// Source side of a copy-back hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSource {
    SwapChain,
    Texture(TextureId),
    /// Output texture of a render target, looked up when the hook fires.
    Target(RenderTargetId),
}

/// A texture copy executed right before or right after an entry's pass.
///
/// Either side may be missing when the hook fires (no swap chain this frame,
/// render target removed, input texture not created yet); the hook is then a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyBack {
    pub source: TextureSource,
    pub destination: Option<TextureId>,
}

impl CopyBack {
    #[must_use]
    pub fn new(source: TextureSource, destination: Option<TextureId>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Resolves both sides to concrete textures.
    pub fn resolve(
        &self,
        swap_chain: Option<TextureId>,
        target_texture: impl Fn(RenderTargetId) -> Option<TextureId>,
    ) -> Option<(TextureId, TextureId)> {
        let source = match self.source {
            TextureSource::SwapChain => swap_chain?,
            TextureSource::Texture(texture) => texture,
            TextureSource::Target(target) => target_texture(target)?,
        };
        let destination = self.destination?;
        (source != destination).then_some((source, destination))
    }
}

#[derive(Debug, Clone)]
pub enum EntryContent {
    Element(RenderableId),
    Stack(Stack),
}

#[derive(Debug, Clone)]
pub struct RenderPassEntry {
    pub(crate) label: String,
    pub(crate) category: PassCategory,
    pub(crate) descriptor: RenderPassDescriptor,
    pub(crate) content: EntryContent,
    pub(crate) load_policy: LoadPolicy,
    pub(crate) on_before: Option<CopyBack>,
    pub(crate) on_after: Option<CopyBack>,
    /// Render target this entry draws into, if any.
    pub(crate) output_target: Option<RenderTargetId>,
}

impl RenderPassEntry {
    pub(crate) fn with_stack(
        label: impl Into<String>,
        category: PassCategory,
        descriptor: RenderPassDescriptor,
    ) -> Self {
        Self {
            label: label.into(),
            category,
            descriptor,
            content: EntryContent::Stack(Stack::new()),
            load_policy: LoadPolicy::FirstWriteClears,
            on_before: None,
            on_after: None,
            output_target: None,
        }
    }

    pub(crate) fn with_element(
        label: impl Into<String>,
        category: PassCategory,
        descriptor: RenderPassDescriptor,
        element: RenderableId,
    ) -> Self {
        Self {
            content: EntryContent::Element(element),
            ..Self::with_stack(label, category, descriptor)
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn category(&self) -> PassCategory {
        self.category
    }

    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &RenderPassDescriptor {
        &self.descriptor
    }

    #[inline]
    #[must_use]
    pub fn element(&self) -> Option<RenderableId> {
        match &self.content {
            EntryContent::Element(id) => Some(*id),
            EntryContent::Stack(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn stack(&self) -> Option<&Stack> {
        match &self.content {
            EntryContent::Stack(stack) => Some(stack),
            EntryContent::Element(_) => None,
        }
    }

    #[inline]
    pub(crate) fn stack_mut(&mut self) -> Option<&mut Stack> {
        match &mut self.content {
            EntryContent::Stack(stack) => Some(stack),
            EntryContent::Element(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn load_policy(&self) -> LoadPolicy {
        self.load_policy
    }

    #[inline]
    #[must_use]
    pub fn on_before_render_pass(&self) -> Option<&CopyBack> {
        self.on_before.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn on_after_render_pass(&self) -> Option<&CopyBack> {
        self.on_after.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn output_target(&self) -> Option<RenderTargetId> {
        self.output_target
    }
}
