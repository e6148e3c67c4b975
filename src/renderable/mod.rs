//! Renderable contract
//!
//! Every drawable the scheduler orders satisfies [`Renderable`]. Optional
//! capabilities are separate traits a type opts into by composition:
//!
//! | Capability | Trait | Used for |
//! |------------|-------|----------|
//! | Camera projection | [`Projected`] | transform update pass, transparent distance sort |
//! | Frustum culling | [`FrustumCullable`] | skipping draws inside `render()` |
//! | Static batching | [`Bundleable`] | render bundle membership |
//!
//! The stock drawables are [`Mesh`] (all three capabilities),
//! [`FullscreenPass`] and [`FeedbackPlane`] (none).

pub mod bounds;
pub mod core;
pub mod feedback;
pub mod fullscreen;
pub mod mesh;
pub mod transform;

pub use bounds::BoundingSphere;
pub use self::core::{CreationCounter, RenderableCore};
pub use feedback::FeedbackPlane;
pub use fullscreen::FullscreenPass;
pub use mesh::Mesh;
pub use transform::{CameraView, MatrixChanges, Transform};

use std::any::Any;

use crate::backend::{DrawPass, InstanceBinding, InstanceData};
use crate::graph::BundleId;
use crate::scene::DeferredQueue;

slotmap::new_key_type! {
    /// Handle to a renderable owned by a scene.
    pub struct RenderableId;
}

/// Everything a renderable may touch while drawing.
///
/// Structural scene changes requested while drawing go through
/// [`deferred`](Self::deferred) and are applied at the start of the next frame.
pub struct DrawContext<'a> {
    pub pass: &'a mut dyn DrawPass,
    pub deferred: &'a mut DeferredQueue,
    frame_index: u64,
    recording_bundle: bool,
}

impl<'a> DrawContext<'a> {
    pub fn new(pass: &'a mut dyn DrawPass, deferred: &'a mut DeferredQueue, frame_index: u64) -> Self {
        Self {
            pass,
            deferred,
            frame_index,
            recording_bundle: false,
        }
    }

    pub(crate) fn for_bundle(
        pass: &'a mut dyn DrawPass,
        deferred: &'a mut DeferredQueue,
        frame_index: u64,
    ) -> Self {
        Self {
            recording_bundle: true,
            ..Self::new(pass, deferred, frame_index)
        }
    }

    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// `true` while a render bundle records its members. The bundle has
    /// already left out hidden and culled members, so members record
    /// unconditionally then.
    #[inline]
    #[must_use]
    pub fn is_recording_bundle(&self) -> bool {
        self.recording_bundle
    }
}

pub trait Renderable: Any {
    fn core(&self) -> &RenderableCore;

    fn core_mut(&mut self) -> &mut RenderableCore;

    /// `false` while GPU resources (pipeline, buffers) are not materialized.
    /// A not-ready renderable draws nothing; this is a normal steady state.
    fn is_ready(&self) -> bool;

    /// Records this renderable's draw calls. Visibility and culling are
    /// checked here, so skipped objects keep their bucket slot.
    fn render(&mut self, ctx: &mut DrawContext<'_>);

    /// The device was lost; drop every GPU handle and report not ready until
    /// resources are recreated.
    fn on_device_lost(&mut self) {}

    fn as_projected(&self) -> Option<&dyn Projected> {
        None
    }

    fn as_projected_mut(&mut self) -> Option<&mut dyn Projected> {
        None
    }

    fn as_cullable(&self) -> Option<&dyn FrustumCullable> {
        None
    }

    fn as_cullable_mut(&mut self) -> Option<&mut dyn FrustumCullable> {
        None
    }

    fn as_bundleable(&self) -> Option<&dyn Bundleable> {
        None
    }

    fn as_bundleable_mut(&mut self) -> Option<&mut dyn Bundleable> {
        None
    }
}

/// Drawables positioned by a transform and seen through the scene camera.
pub trait Projected {
    fn transform(&self) -> &Transform;

    fn transform_mut(&mut self) -> &mut Transform;

    /// Bounding sphere in local space.
    fn local_bounds(&self) -> BoundingSphere;

    /// Bounding sphere in world space, radius scaled by the largest axis scale.
    fn world_bounds(&self) -> BoundingSphere {
        self.local_bounds().transformed(self.transform())
    }

    /// View-space distance to the nearest point of the world bounds.
    fn view_depth(&self, camera: &CameraView) -> f32 {
        camera.sphere_depth(&self.world_bounds())
    }
}

/// Visibility-region test results maintained outside the scheduler.
pub trait FrustumCullable {
    fn wants_culling(&self) -> bool;

    fn is_intersecting(&self) -> bool;

    /// Stores a fresh intersection result and clears the stale flag.
    fn set_intersecting(&mut self, intersecting: bool);

    /// Called by the update pass when the model or view matrix changed. The
    /// last result keeps gating draws until the culler tests again.
    fn invalidate_intersection(&mut self);

    /// `true` when the last transform update invalidated the intersection
    /// result and the external culler should test again.
    fn needs_cull_test(&self) -> bool;

    fn is_culled(&self) -> bool {
        self.wants_culling() && !self.is_intersecting()
    }
}

/// Drawables that can be batched into a render bundle.
pub trait Bundleable {
    fn render_bundle(&self) -> Option<BundleId>;

    fn set_render_bundle(&mut self, bundle: Option<BundleId>);

    /// Slot in the bundle's shared transform buffer, `None` to draw with the
    /// drawable's own transform binding.
    fn bind_instance(&mut self, binding: Option<InstanceBinding>);

    fn instance_binding(&self) -> Option<InstanceBinding>;

    fn instance_data(&self) -> InstanceData;
}
