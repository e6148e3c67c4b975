//! Render pass descriptors
//!
//! A [`RenderPassDescriptor`] names the attachments a pass draws into and how
//! each one is loaded. The scheduler flips the load operations every frame:
//! the first pass writing an attachment clears it, later passes load it so
//! earlier draws survive.

use smallvec::SmallVec;
use uuid::Uuid;

use crate::backend::TextureId;

/// Identity of a render pass descriptor.
///
/// Entries and render targets are keyed by this identity, never by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(Uuid);

impl PassId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

/// A texture a pass attachment resolves to at encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentView {
    /// The current swap-chain texture.
    SwapChain,
    /// The depth texture paired with the swap chain.
    SwapChainDepth,
    /// A texture owned by a render target.
    Texture(TextureId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorTarget {
    pub view: AttachmentView,
    pub format: wgpu::TextureFormat,
    pub load_op: LoadOp,
    pub clear_value: wgpu::Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthTarget {
    pub view: AttachmentView,
    pub format: wgpu::TextureFormat,
    pub load_op: LoadOp,
    pub clear_value: f32,
}

/// Attachment formats and sample count of a pass, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassLayout {
    pub color_formats: SmallVec<[wgpu::TextureFormat; 2]>,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

impl PassLayout {
    /// Describes the first attribute that differs from `other`, if any.
    #[must_use]
    pub fn mismatch(&self, other: &PassLayout) -> Option<String> {
        if self.color_formats != other.color_formats {
            return Some(format!(
                "color formats {:?} != {:?}",
                self.color_formats.as_slice(),
                other.color_formats.as_slice()
            ));
        }
        if self.depth_format != other.depth_format {
            return Some(format!(
                "depth format {:?} != {:?}",
                self.depth_format, other.depth_format
            ));
        }
        if self.sample_count != other.sample_count {
            return Some(format!(
                "sample count {} != {}",
                self.sample_count, other.sample_count
            ));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    id: PassId,
    label: String,
    color_targets: SmallVec<[ColorTarget; 1]>,
    depth_target: Option<DepthTarget>,
    sample_count: u32,
}

impl RenderPassDescriptor {
    #[must_use]
    pub fn new(label: impl Into<String>, sample_count: u32) -> Self {
        Self {
            id: PassId::new(),
            label: label.into(),
            color_targets: SmallVec::new(),
            depth_target: None,
            sample_count: sample_count.max(1),
        }
    }

    #[must_use]
    pub fn with_color_target(
        mut self,
        view: AttachmentView,
        format: wgpu::TextureFormat,
        clear_value: wgpu::Color,
    ) -> Self {
        self.color_targets.push(ColorTarget {
            view,
            format,
            load_op: LoadOp::Clear,
            clear_value,
        });
        self
    }

    #[must_use]
    pub fn with_depth_target(
        mut self,
        view: AttachmentView,
        format: wgpu::TextureFormat,
        clear_value: f32,
    ) -> Self {
        self.depth_target = Some(DepthTarget {
            view,
            format,
            load_op: LoadOp::Clear,
            clear_value,
        });
        self
    }

    /// Copy of this descriptor under a new identity.
    #[must_use]
    pub fn duplicate(&self, label: impl Into<String>) -> Self {
        Self {
            id: PassId::new(),
            label: label.into(),
            ..self.clone()
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> PassId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn color_targets(&self) -> &[ColorTarget] {
        &self.color_targets
    }

    #[inline]
    pub(crate) fn color_targets_mut(&mut self) -> &mut [ColorTarget] {
        &mut self.color_targets
    }

    #[inline]
    #[must_use]
    pub fn depth_target(&self) -> Option<&DepthTarget> {
        self.depth_target.as_ref()
    }

    #[inline]
    pub(crate) fn depth_target_mut(&mut self) -> Option<&mut DepthTarget> {
        self.depth_target.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    #[must_use]
    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_target.as_ref().map(|d| d.format)
    }

    pub fn color_formats(&self) -> impl Iterator<Item = wgpu::TextureFormat> + '_ {
        self.color_targets.iter().map(|c| c.format)
    }

    #[must_use]
    pub fn layout(&self) -> PassLayout {
        PassLayout {
            color_formats: self.color_formats().collect(),
            depth_format: self.depth_format(),
            sample_count: self.sample_count,
        }
    }

    /// Load operation of the first color attachment.
    #[must_use]
    pub fn load_op(&self) -> Option<LoadOp> {
        self.color_targets.first().map(|c| c.load_op)
    }

    #[must_use]
    pub fn depth_load_op(&self) -> Option<LoadOp> {
        self.depth_target.as_ref().map(|d| d.load_op)
    }

    /// Sets the load operation of every color attachment.
    pub fn set_load_op(&mut self, load_op: LoadOp) {
        for target in &mut self.color_targets {
            target.load_op = load_op;
        }
    }

    pub fn set_depth_load_op(&mut self, load_op: LoadOp) {
        if let Some(depth) = &mut self.depth_target {
            depth.load_op = load_op;
        }
    }

    /// Returns `true` if any attachment of this pass is `view`.
    #[must_use]
    pub fn targets(&self, view: AttachmentView) -> bool {
        self.color_targets.iter().any(|c| c.view == view)
            || self.depth_target.as_ref().is_some_and(|d| d.view == view)
    }
}
