use crate::backend::{DrawRecipe, InstanceBinding, InstanceData};
use crate::graph::{BundleId, EntryId, RenderTargetId};

use super::{
    BoundingSphere, Bundleable, CreationCounter, DrawContext, FrustumCullable, Projected,
    Renderable, RenderableCore, Transform,
};

/// A drawable with a transform, seen through the scene camera.
///
/// A mesh is ready once it has a [`DrawRecipe`]; whoever owns its GPU
/// resources installs the recipe with [`set_draw`](Self::set_draw) when the
/// pipeline and buffers exist and clears it when they go away.
#[derive(Debug, Clone)]
pub struct Mesh {
    core: RenderableCore,
    pub transform: Transform,
    bounds: BoundingSphere,
    draw: Option<DrawRecipe>,

    // frustum gate
    frustum_culled: bool,
    intersecting: bool,
    cull_stale: bool,

    bundle: Option<BundleId>,
    instance: Option<InstanceBinding>,
}

impl Mesh {
    #[must_use]
    pub fn new(counter: &CreationCounter, label: impl Into<String>) -> Self {
        Self {
            core: RenderableCore::new(counter, label).with_projection(true),
            transform: Transform::new(),
            bounds: BoundingSphere::new(glam::Vec3::ZERO, 1.0),
            draw: None,
            frustum_culled: true,
            intersecting: true,
            cull_stale: true,
            bundle: None,
            instance: None,
        }
    }

    // ========================================================================
    // Builders
    // ========================================================================

    #[must_use]
    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.core = self.core.with_render_order(render_order);
        self
    }

    #[must_use]
    pub fn transparent(mut self, transparent: bool) -> Self {
        self.core = self.core.with_transparency(transparent);
        self
    }

    #[must_use]
    pub fn transmissive(mut self, transmissive: bool) -> Self {
        self.core = self.core.with_transmission(transmissive);
        self
    }

    /// Meshes use the camera by default; unprojected meshes are drawn in
    /// clip space before every projected bucket.
    #[must_use]
    pub fn projected(mut self, uses_projection: bool) -> Self {
        self.core = self.core.with_projection(uses_projection);
        self
    }

    #[must_use]
    pub fn with_output_target(mut self, target: RenderTargetId) -> Self {
        self.core = self.core.with_output_target(target);
        self
    }

    #[must_use]
    pub fn with_custom_entry(mut self, entry: EntryId) -> Self {
        self.core = self.core.with_custom_entry(entry);
        self
    }

    /// Joins `bundle` when the mesh is added to the scene.
    #[must_use]
    pub fn with_render_bundle(mut self, bundle: BundleId) -> Self {
        self.bundle = Some(bundle);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: BoundingSphere) -> Self {
        self.bounds = bounds;
        self
    }

    #[must_use]
    pub fn with_frustum_culling(mut self, frustum_culled: bool) -> Self {
        self.frustum_culled = frustum_culled;
        self
    }

    #[must_use]
    pub fn with_draw(mut self, draw: DrawRecipe) -> Self {
        self.draw = Some(draw);
        self
    }

    // ========================================================================
    // GPU resources
    // ========================================================================

    pub fn set_draw(&mut self, draw: Option<DrawRecipe>) {
        self.draw = draw;
    }

    #[inline]
    #[must_use]
    pub fn draw(&self) -> Option<&DrawRecipe> {
        self.draw.as_ref()
    }

    pub fn set_frustum_culling(&mut self, frustum_culled: bool) {
        self.frustum_culled = frustum_culled;
    }
}

impl Renderable for Mesh {
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
        if !ctx.is_recording_bundle() && (!self.core.visible() || self.is_culled()) {
            log::trace!("Mesh `{}` skipped (hidden or culled)", self.core.label());
            return;
        }

        let Some(draw) = &self.draw else {
            return;
        };
        draw.encode(ctx.pass, self.instance);
    }

    fn on_device_lost(&mut self) {
        self.draw = None;
        self.instance = None;
    }

    fn as_projected(&self) -> Option<&dyn Projected> {
        Some(self)
    }

    fn as_projected_mut(&mut self) -> Option<&mut dyn Projected> {
        Some(self)
    }

    fn as_cullable(&self) -> Option<&dyn FrustumCullable> {
        Some(self)
    }

    fn as_cullable_mut(&mut self) -> Option<&mut dyn FrustumCullable> {
        Some(self)
    }

    fn as_bundleable(&self) -> Option<&dyn Bundleable> {
        Some(self)
    }

    fn as_bundleable_mut(&mut self) -> Option<&mut dyn Bundleable> {
        Some(self)
    }
}

impl Projected for Mesh {
    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    fn local_bounds(&self) -> BoundingSphere {
        self.bounds
    }
}

impl FrustumCullable for Mesh {
    fn wants_culling(&self) -> bool {
        self.frustum_culled
    }

    fn is_intersecting(&self) -> bool {
        self.intersecting
    }

    fn set_intersecting(&mut self, intersecting: bool) {
        self.intersecting = intersecting;
        self.cull_stale = false;
    }

    fn invalidate_intersection(&mut self) {
        self.cull_stale = true;
    }

    fn needs_cull_test(&self) -> bool {
        self.frustum_culled && self.cull_stale
    }
}

impl Bundleable for Mesh {
    fn render_bundle(&self) -> Option<BundleId> {
        self.bundle
    }

    fn set_render_bundle(&mut self, bundle: Option<BundleId>) {
        self.bundle = bundle;
        if bundle.is_none() {
            self.instance = None;
        }
    }

    fn bind_instance(&mut self, binding: Option<InstanceBinding>) {
        self.instance = binding;
    }

    fn instance_binding(&self) -> Option<InstanceBinding> {
        self.instance
    }

    fn instance_data(&self) -> InstanceData {
        InstanceData {
            model_matrix: self.transform.world_matrix_as_mat4(),
        }
    }
}
