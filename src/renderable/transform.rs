use bitflags::bitflags;
use glam::{Affine3A, EulerRot, Mat4, Quat, Vec3};

use super::BoundingSphere;

bitflags! {
    /// Which derived matrices an update pass recomputed.
    ///
    /// Flags follow the dependency order TRS → model → model-view → frustum:
    /// a set flag implies every later stage was refreshed as well.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MatrixChanges: u8 {
        /// Position, rotation or scale changed; the model matrix was rebuilt.
        const MODEL = 1 << 0;
        /// The model-view matrix was rebuilt (model or camera changed).
        const VIEW = 1 << 1;
        /// The previous frustum intersection result no longer applies.
        const FRUSTUM = 1 << 2;
    }
}

/// Scene camera as seen by the scheduler: a view matrix and a version bumped
/// on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    view_matrix: Mat4,
    version: u64,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            view_matrix: Mat4::IDENTITY,
            version: 0,
        }
    }
}

impl CameraView {
    #[must_use]
    pub fn new(view_matrix: Mat4) -> Self {
        Self {
            view_matrix,
            version: 0,
        }
    }

    /// Camera placed by a world matrix; the view matrix is its inverse.
    #[must_use]
    pub fn from_world(world: Affine3A) -> Self {
        Self::new(Mat4::from(world.inverse()))
    }

    /// Returns `true` if the matrix actually changed.
    pub fn set_view_matrix(&mut self, view_matrix: Mat4) -> bool {
        if self.view_matrix == view_matrix {
            return false;
        }
        self.view_matrix = view_matrix;
        self.version = self.version.wrapping_add(1);
        true
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Distance along the viewing direction (-Z in view space).
    #[must_use]
    pub fn view_depth(&self, world_point: Vec3) -> f32 {
        -self.view_matrix.transform_point3(world_point).z
    }

    /// View depth of the sphere point nearest to the camera.
    #[must_use]
    pub fn sphere_depth(&self, sphere: &BoundingSphere) -> f32 {
        self.view_depth(sphere.center) - sphere.radius
    }
}

/// Transform 组件
///
/// 封装位置、旋转、缩放（TRS）以及矩阵缓存和脏检查逻辑。
/// 每帧由场景的更新阶段调用一次 [`update`](Self::update)，
/// 按 TRS → 模型矩阵 → 模型视图矩阵 → 视锥 的顺序传播变化。
#[derive(Debug, Clone)]
pub struct Transform {
    // === Public 属性 ===
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    // === 矩阵缓存 ===
    world_matrix: Affine3A,
    model_view_matrix: Mat4,

    // === 脏检查状态 (Private) ===
    last_position: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,
    camera_version: Option<u64>,
    model_version: u64,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            world_matrix: Affine3A::IDENTITY,
            model_view_matrix: Mat4::IDENTITY,

            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,
            camera_version: None,
            model_version: 0,
        }
    }

    #[must_use]
    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    // ========================================================================
    // 核心逻辑：按依赖顺序更新 (Shadow State Check)
    // ========================================================================

    /// Runs the dependency-ordered update against `camera`.
    pub fn update(&mut self, camera: &CameraView) -> MatrixChanges {
        let mut changes = MatrixChanges::empty();

        // 1. TRS → 模型矩阵
        if self.update_model_matrix() {
            changes |= MatrixChanges::MODEL;
        }

        // 2. 模型矩阵 / 相机 → 模型视图矩阵
        if changes.contains(MatrixChanges::MODEL) || self.camera_version != Some(camera.version()) {
            self.model_view_matrix = *camera.view_matrix() * Mat4::from(self.world_matrix);
            self.camera_version = Some(camera.version());
            changes |= MatrixChanges::VIEW;
        }

        // 3. 视锥测试结果失效
        if !changes.is_empty() {
            changes |= MatrixChanges::FRUSTUM;
        }

        changes
    }

    fn update_model_matrix(&mut self) -> bool {
        let changed = self.position != self.last_position
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
            || self.force_update;

        if changed {
            self.world_matrix =
                Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);

            self.last_position = self.position;
            self.last_rotation = self.rotation;
            self.last_scale = self.scale;
            self.force_update = false;
            self.model_version = self.model_version.wrapping_add(1);
        }

        changed
    }

    // ========================================================================
    // Getters & Helpers
    // ========================================================================

    /// Helper：设置欧拉角旋转
    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    /// 世界矩阵，截至上一次 [`update`](Self::update)
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    #[must_use]
    pub fn model_view_matrix(&self) -> &Mat4 {
        &self.model_view_matrix
    }

    /// Bumped every time the model matrix is rebuilt.
    #[inline]
    #[must_use]
    pub fn model_version(&self) -> u64 {
        self.model_version
    }

    /// Largest scale factor along any world axis.
    #[must_use]
    pub fn max_axis_scale(&self) -> f32 {
        let m = &self.world_matrix.matrix3;
        m.x_axis.length().max(m.y_axis.length()).max(m.z_axis.length())
    }

    /// 直接设置矩阵，反向分解出 position/rotation/scale
    ///
    /// 注意：如果矩阵包含切变，分解过程会丢失切变信息
    pub fn apply_matrix(&mut self, mat: Mat4) {
        let (scale, rotation, translation) = mat.to_scale_rotation_translation();
        self.scale = scale;
        self.rotation = rotation;
        self.position = translation;
        self.mark_dirty();
    }

    /// 手动标记脏（例如用于强制刷新）
    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
