//! Scheduler Settings
//!
//! [`SchedulerSettings`] describes the swap chain the scheduler draws into and
//! a few tuning knobs for render bundles. The default screen entry and the
//! post-processing pass descriptor are both derived from these values.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pass_graph::{Scene, SchedulerSettings};
//!
//! let settings = SchedulerSettings {
//!     surface_format: wgpu::TextureFormat::Rgba8UnormSrgb,
//!     sample_count: 4,
//!     ..Default::default()
//! };
//!
//! let scene = Scene::new(settings);
//! ```

/// Swap-chain description and bundle tuning shared by a [`Scene`](crate::Scene).
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Color format of the swap-chain texture.
    pub surface_format: wgpu::TextureFormat,

    /// Depth attachment format used by the screen entries, `None` to draw
    /// without depth.
    pub depth_format: Option<wgpu::TextureFormat>,

    /// MSAA sample count of the screen entries. Common values: 1 (off), 4.
    pub sample_count: u32,

    /// Color written by the first pass that clears the swap chain each frame.
    pub clear_color: wgpu::Color,

    /// Depth written by the first pass that clears a depth attachment.
    pub clear_depth: f32,

    /// Byte alignment the GPU requires between dynamic offsets into the shared
    /// per-instance transform buffer of a render bundle.
    ///
    /// Matches wgpu's default `min_storage_buffer_offset_alignment`.
    pub instance_alignment: u64,

    /// Initial member capacity of render bundles created without an explicit
    /// capacity.
    pub default_bundle_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            surface_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            depth_format: Some(wgpu::TextureFormat::Depth24Plus),
            sample_count: 1,
            clear_color: wgpu::Color::BLACK,
            clear_depth: 1.0,
            instance_alignment: 256,
            default_bundle_capacity: 16,
        }
    }
}

impl SchedulerSettings {
    /// Returns `true` when the screen entries render into a multi-sampled
    /// attachment.
    #[inline]
    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }
}
