//! Frame Execution Tests
//!
//! Tests for:
//! - Category execution order and post-processing ordering
//! - Empty / hidden entry skipping
//! - Load-op toggling across passes sharing an attachment
//! - Copy-back hooks, including missing sources
//! - Compute passes running before any render pass
//! - Bucket draw order and back-to-front transparent sorting
//! - Device loss and recovery
//! - Deferred scene commands

use glam::{Mat4, Vec3};

use pass_graph::backend::{
    ComputeDispatch, DrawCommand, DrawRecipe, FrameEvent, PipelineId, RecordingEncoder,
};
use pass_graph::graph::{BucketKey, DrawableId, LoadOp};
use pass_graph::renderable::{DrawContext, FrustumCullable, RenderableCore};
use pass_graph::{
    ComputePass, FeedbackPlane, FrameEncoder, FullscreenPass, Mesh, PassCategory, Renderable,
    RenderableId, RenderTarget, Scene, SchedulerSettings, Transform,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup() -> (Scene, RecordingEncoder) {
    init_logger();
    (
        Scene::new(SchedulerSettings::default()),
        RecordingEncoder::with_swap_chain(),
    )
}

fn ready_mesh(scene: &Scene, encoder: &mut RecordingEncoder, label: &str) -> Mesh {
    let pipeline = encoder.create_pipeline(label);
    Mesh::new(scene.counter(), label).with_draw(DrawRecipe::new(pipeline, 36))
}

fn begin_load_ops(encoder: &RecordingEncoder) -> Vec<(Option<LoadOp>, Option<LoadOp>)> {
    encoder
        .events()
        .iter()
        .filter_map(|e| match e {
            FrameEvent::BeginPass {
                load_ops,
                depth_load_op,
                ..
            } => Some((load_ops.first().copied(), *depth_load_op)),
            _ => None,
        })
        .collect()
}

fn position_of(encoder: &RecordingEncoder, predicate: impl Fn(&FrameEvent) -> bool) -> Option<usize> {
    encoder.events().iter().position(predicate)
}

// ============================================================================
// Entry skipping
// ============================================================================

#[test]
fn empty_scene_records_nothing() {
    let (mut scene, mut encoder) = setup();
    scene.render(&mut encoder);
    assert_eq!(encoder.begin_count(), 0);
    assert_eq!(scene.frame_index(), 1);
}

#[test]
fn visibility_gates_the_screen_pass() {
    let (mut scene, mut encoder) = setup();
    let mesh = ready_mesh(&scene, &mut encoder, "cube");
    let id = scene.add_mesh(mesh);

    scene.set_visible(id, false).unwrap();
    scene.render(&mut encoder);
    assert_eq!(encoder.begin_count(), 0);

    encoder.clear();
    scene.set_visible(id, true).unwrap();
    scene.render(&mut encoder);
    assert_eq!(encoder.begin_count(), 1);
    assert_eq!(encoder.end_count(), 1);
    assert_eq!(encoder.draw_count(), 1);
}

#[test]
fn not_ready_meshes_keep_the_pass_but_draw_nothing() {
    let (mut scene, mut encoder) = setup();
    let mesh = Mesh::new(scene.counter(), "streaming");
    scene.add_mesh(mesh);

    scene.render(&mut encoder);

    assert_eq!(encoder.begin_count(), 1);
    assert_eq!(encoder.draw_count(), 0);
}

#[test]
fn culled_meshes_are_skipped_inside_the_pass() {
    let (mut scene, mut encoder) = setup();
    let mesh = ready_mesh(&scene, &mut encoder, "far");
    let id = scene.add_mesh(mesh);

    scene.get_mut::<Mesh>(id).unwrap().set_intersecting(false);
    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 0);

    encoder.clear();
    scene.get_mut::<Mesh>(id).unwrap().set_frustum_culling(false);
    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 1);
}

// ============================================================================
// Execution order
// ============================================================================

#[test]
fn categories_run_in_fixed_order() {
    let (mut scene, mut encoder) = setup();
    let pipeline = encoder.create_pipeline("fullscreen");

    let feedback_texture = encoder.create_texture("feedback");
    let feedback = scene.add_render_target(RenderTarget::new(
        "Feedback target",
        feedback_texture,
        wgpu::TextureFormat::Rgba8Unorm,
    ));
    let offscreen_texture = encoder.create_texture("offscreen");
    let offscreen = scene.add_render_target(RenderTarget::new(
        "Offscreen",
        offscreen_texture,
        wgpu::TextureFormat::Rgba8Unorm,
    ));

    // Registered in reverse execution order on purpose.
    let post = FullscreenPass::new(scene.counter(), "Tone map")
        .with_input_target(offscreen)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(post);

    let screen = ready_mesh(&scene, &mut encoder, "screen mesh");
    scene.add_mesh(screen);

    let pre = FullscreenPass::new(scene.counter(), "Sky")
        .pre_pass()
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(pre);

    let offscreen_mesh = ready_mesh(&scene, &mut encoder, "offscreen mesh").with_output_target(offscreen);
    scene.add_mesh(offscreen_mesh);

    let plane = FeedbackPlane::new(scene.counter(), "Trail", feedback)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_ping_pong_plane(plane).unwrap();

    scene.render(&mut encoder);

    assert_eq!(
        encoder.debug_groups(),
        ["Trail", "Offscreen", "Sky", "Default screen", "Tone map"]
    );
    assert_eq!(encoder.begin_count(), encoder.end_count());
}

#[test]
fn post_passes_into_targets_run_before_screen_passes() {
    let (mut scene, mut encoder) = setup();
    let pipeline = encoder.create_pipeline("fullscreen");
    let texture = encoder.create_texture("bloom");
    let bloom = scene.add_render_target(RenderTarget::new(
        "Bloom",
        texture,
        wgpu::TextureFormat::Rgba16Float,
    ));

    let to_screen = FullscreenPass::new(scene.counter(), "Composite")
        .with_input_target(bloom)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(to_screen);

    let to_target = FullscreenPass::new(scene.counter(), "Bright pass")
        .with_render_order(10)
        .with_output_target(bloom)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(to_target);

    scene.render(&mut encoder);

    assert_eq!(encoder.debug_groups(), ["Bright pass", "Composite"]);
}

#[test]
fn single_element_entries_sort_by_render_order() {
    let (mut scene, mut encoder) = setup();
    let pipeline = encoder.create_pipeline("fullscreen");
    let texture = encoder.create_texture("input");

    for (label, order) in [("C", 2), ("A", -1), ("B", 0)] {
        let pass = FullscreenPass::new(scene.counter(), label)
            .with_render_order(order)
            .with_render_texture(texture)
            .with_draw(DrawRecipe::fullscreen(pipeline));
        scene.add_shader_pass(pass);
    }

    scene.render(&mut encoder);

    assert_eq!(encoder.debug_groups(), ["A", "B", "C"]);
}

// ============================================================================
// Load operations
// ============================================================================

#[test]
fn first_write_clears_later_writes_load() {
    let (mut scene, mut encoder) = setup();
    let overlay = scene.create_screen_pass_entry("Overlay", 0);

    let base = ready_mesh(&scene, &mut encoder, "base");
    scene.add_mesh(base);
    let top = ready_mesh(&scene, &mut encoder, "top").with_custom_entry(overlay);
    scene.add_mesh(top);

    scene.render(&mut encoder);
    assert_eq!(
        begin_load_ops(&encoder),
        [
            (Some(LoadOp::Clear), Some(LoadOp::Clear)),
            (Some(LoadOp::Load), Some(LoadOp::Load)),
        ]
    );

    // Every frame starts from a clean slate.
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(begin_load_ops(&encoder)[0], (Some(LoadOp::Clear), Some(LoadOp::Clear)));
}

#[test]
fn skipped_entry_does_not_consume_the_clear() {
    let (mut scene, mut encoder) = setup();
    let overlay = scene.create_screen_pass_entry("Overlay", 0);

    let hidden = ready_mesh(&scene, &mut encoder, "hidden");
    let hidden = scene.add_mesh(hidden);
    scene.set_visible(hidden, false).unwrap();

    let top = ready_mesh(&scene, &mut encoder, "top").with_custom_entry(overlay);
    scene.add_mesh(top);

    scene.render(&mut encoder);

    assert_eq!(encoder.debug_groups(), ["Overlay"]);
    assert_eq!(begin_load_ops(&encoder), [(Some(LoadOp::Clear), Some(LoadOp::Clear))]);
}

#[test]
fn snapshot_pass_always_clears() {
    let (mut scene, mut encoder) = setup();
    let snapshot = encoder.create_texture("snapshot");
    let pipeline = encoder.create_pipeline("fullscreen");

    let mesh = ready_mesh(&scene, &mut encoder, "cube");
    scene.add_mesh(mesh);
    let pass = FullscreenPass::new(scene.counter(), "Vignette")
        .with_render_texture(snapshot)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(pass);

    scene.render(&mut encoder);

    let ops = begin_load_ops(&encoder);
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[1], (Some(LoadOp::Clear), None));
}

// ============================================================================
// Copy-back hooks
// ============================================================================

#[test]
fn snapshot_copy_runs_before_its_pass() {
    let (mut scene, mut encoder) = setup();
    let swap_chain = encoder.swap_chain_texture().unwrap();
    let snapshot = encoder.create_texture("snapshot");
    let pipeline = encoder.create_pipeline("fullscreen");

    let pass = FullscreenPass::new(scene.counter(), "Vignette")
        .with_render_texture(snapshot)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(pass);

    scene.render(&mut encoder);

    let copy = position_of(&encoder, |e| {
        *e == FrameEvent::Copy {
            source: swap_chain,
            destination: snapshot,
        }
    })
    .expect("swap chain snapshot");
    let begin = position_of(&encoder, |e| matches!(e, FrameEvent::BeginPass { .. })).unwrap();
    assert!(copy < begin);
}

#[test]
fn hook_without_swap_chain_is_a_no_op() {
    let (mut scene, mut encoder) = setup();
    encoder.set_swap_chain(None);
    let snapshot = encoder.create_texture("snapshot");
    let pipeline = encoder.create_pipeline("fullscreen");

    let pass = FullscreenPass::new(scene.counter(), "Vignette")
        .with_render_texture(snapshot)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(pass);

    scene.render(&mut encoder);

    assert!(position_of(&encoder, |e| matches!(e, FrameEvent::Copy { .. })).is_none());
    assert_eq!(encoder.begin_count(), 1);
}

#[test]
fn ping_pong_copies_after_its_pass() {
    let (mut scene, mut encoder) = setup();
    let pipeline = encoder.create_pipeline("fullscreen");
    let output = encoder.create_texture("output");
    let input = encoder.create_texture("input");
    let target = scene.add_render_target(RenderTarget::new(
        "Feedback",
        output,
        wgpu::TextureFormat::Rgba8Unorm,
    ));

    let plane = FeedbackPlane::new(scene.counter(), "Trail", target)
        .with_input_texture(input)
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_ping_pong_plane(plane).unwrap();

    scene.render(&mut encoder);

    let end = position_of(&encoder, |e| matches!(e, FrameEvent::EndPass)).unwrap();
    let copy = position_of(&encoder, |e| {
        *e == FrameEvent::Copy {
            source: output,
            destination: input,
        }
    })
    .unwrap();
    assert!(end < copy);
}

#[test]
fn hook_reading_a_removed_target_is_a_no_op() {
    let (mut scene, mut encoder) = setup();
    let pipeline = encoder.create_pipeline("fullscreen");
    let output = encoder.create_texture("output");
    let history = encoder.create_texture("history");
    let target = scene.add_render_target(RenderTarget::new(
        "Blur",
        output,
        wgpu::TextureFormat::Rgba8Unorm,
    ));

    let pass = FullscreenPass::new(scene.counter(), "Blur pass")
        .with_output_target(target)
        .with_render_texture(history)
        .copy_output_to_render_texture()
        .with_draw(DrawRecipe::fullscreen(pipeline));
    scene.add_shader_pass(pass);
    scene.remove_render_target(target).unwrap();

    scene.render(&mut encoder);

    assert_eq!(encoder.begin_count(), 1);
    assert!(position_of(&encoder, |e| matches!(e, FrameEvent::Copy { .. })).is_none());
}

// ============================================================================
// Compute
// ============================================================================

#[test]
fn compute_runs_before_any_render_pass() {
    let (mut scene, mut encoder) = setup();
    let mesh = ready_mesh(&scene, &mut encoder, "cube");
    scene.add_mesh(mesh);

    let late = encoder.create_compute_pipeline("late");
    let early = encoder.create_compute_pipeline("early");
    let pending = ComputePass::new(scene.counter(), "pending");
    scene.add_compute_pass(pending);
    let a = ComputePass::new(scene.counter(), "late")
        .with_render_order(1)
        .with_dispatch(ComputeDispatch::new(late, [8, 1, 1]));
    scene.add_compute_pass(a);
    let b = ComputePass::new(scene.counter(), "early")
        .with_dispatch(ComputeDispatch::new(early, [4, 4, 1]));
    scene.add_compute_pass(b);

    scene.render(&mut encoder);

    let dispatches: Vec<&str> = encoder
        .events()
        .iter()
        .filter_map(|e| match e {
            FrameEvent::Dispatch { label, .. } => Some(label.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(dispatches, ["early", "late"]);

    let last_dispatch = encoder
        .events()
        .iter()
        .rposition(|e| matches!(e, FrameEvent::Dispatch { .. }))
        .unwrap();
    let first_begin = position_of(&encoder, |e| matches!(e, FrameEvent::BeginPass { .. })).unwrap();
    assert!(last_dispatch < first_begin);
}

// ============================================================================
// Draw order
// ============================================================================

#[test]
fn transparent_meshes_draw_back_to_front() {
    let (mut scene, mut encoder) = setup();
    let near = ready_mesh(&scene, &mut encoder, "B")
        .transparent(true)
        .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -2.0)));
    let far = ready_mesh(&scene, &mut encoder, "A")
        .transparent(true)
        .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -10.0)));
    let near_pipeline = near.draw().unwrap().pipeline;
    let far_pipeline = far.draw().unwrap().pipeline;
    let b = scene.add_mesh(near);
    let a = scene.add_mesh(far);

    scene.render(&mut encoder);

    let stack = scene.entry(scene.default_entry()).unwrap().stack().unwrap();
    assert_eq!(
        stack.bucket(BucketKey::new(true, true)),
        &[DrawableId::Renderable(a), DrawableId::Renderable(b)]
    );
    assert_eq!(encoder.pipeline_sequence(), [far_pipeline, near_pipeline]);

    // Move A in front of B.
    encoder.clear();
    scene.get_mut::<Mesh>(a).unwrap().transform.position = Vec3::new(0.0, 0.0, -1.0);
    scene.render(&mut encoder);
    assert_eq!(encoder.pipeline_sequence(), [near_pipeline, far_pipeline]);
}

#[test]
fn camera_moves_resort_transparent_buckets() {
    let (mut scene, mut encoder) = setup();
    let left = ready_mesh(&scene, &mut encoder, "left")
        .transparent(true)
        .with_transform(Transform::from_translation(Vec3::new(-5.0, 0.0, -5.0)));
    let right = ready_mesh(&scene, &mut encoder, "right")
        .transparent(true)
        .with_transform(Transform::from_translation(Vec3::new(5.0, 0.0, -6.0)));
    let l = scene.add_mesh(left);
    let r = scene.add_mesh(right);

    scene.render(&mut encoder);
    let bucket = |scene: &Scene| {
        scene
            .entry(scene.default_entry())
            .unwrap()
            .stack()
            .unwrap()
            .bucket(BucketKey::new(true, true))
            .to_vec()
    };
    assert_eq!(bucket(&scene), [DrawableId::Renderable(r), DrawableId::Renderable(l)]);

    // Looking down -X puts `left` in front of the camera and `right` behind it.
    scene.set_camera_view(Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_X, Vec3::Y));
    scene.render(&mut encoder);
    assert_eq!(bucket(&scene), [DrawableId::Renderable(l), DrawableId::Renderable(r)]);
}

#[test]
fn render_order_dominates_creation_order() {
    let (mut scene, mut encoder) = setup();
    let first = ready_mesh(&scene, &mut encoder, "first").with_render_order(5);
    let second = ready_mesh(&scene, &mut encoder, "second");
    let first_pipeline = first.draw().unwrap().pipeline;
    let second_pipeline = second.draw().unwrap().pipeline;
    let first = scene.add_mesh(first);
    scene.add_mesh(second);

    scene.render(&mut encoder);
    assert_eq!(encoder.pipeline_sequence(), [second_pipeline, first_pipeline]);

    encoder.clear();
    scene.set_render_order(first, -1).unwrap();
    scene.render(&mut encoder);
    assert_eq!(encoder.pipeline_sequence(), [first_pipeline, second_pipeline]);
}

#[test]
fn camera_bind_group_precedes_projected_buckets() {
    let (mut scene, mut encoder) = setup();
    let camera = encoder.create_bind_group("camera");
    scene.set_camera_bind_group(Some((0, camera)));

    let hud = ready_mesh(&scene, &mut encoder, "hud").projected(false);
    let hud_pipeline = hud.draw().unwrap().pipeline;
    scene.add_mesh(hud);
    let world = ready_mesh(&scene, &mut encoder, "world");
    scene.add_mesh(world);

    scene.render(&mut encoder);

    let commands: Vec<&DrawCommand> = encoder
        .events()
        .iter()
        .filter_map(|e| match e {
            FrameEvent::Command(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(commands[0], &DrawCommand::SetPipeline(hud_pipeline));
    let bind = commands
        .iter()
        .position(|c| matches!(c, DrawCommand::SetBindGroup { bind_group, .. } if *bind_group == camera))
        .unwrap();
    let hud_draw = commands.iter().position(|c| c.is_draw()).unwrap();
    assert!(hud_draw < bind);
    assert_eq!(
        commands.iter().filter(|c| matches!(c, DrawCommand::SetBindGroup { .. })).count(),
        1
    );
}

// ============================================================================
// Device loss
// ============================================================================

#[test]
fn device_loss_suspends_drawing_until_resources_return() {
    let (mut scene, mut encoder) = setup();
    let mesh = ready_mesh(&scene, &mut encoder, "cube");
    let recipe = mesh.draw().unwrap().clone();
    let id = scene.add_mesh(mesh);
    let compute_pipeline = encoder.create_compute_pipeline("sim");
    let sim = ComputePass::new(scene.counter(), "sim")
        .with_dispatch(ComputeDispatch::new(compute_pipeline, [1, 1, 1]));
    let sim = scene.add_compute_pass(sim);

    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 1);

    scene.lose_device();
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 0);
    assert!(position_of(&encoder, |e| matches!(e, FrameEvent::Dispatch { .. })).is_none());

    scene.get_mut::<Mesh>(id).unwrap().set_draw(Some(recipe));
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 1);

    assert!(scene.remove_compute_pass(sim).is_some());
}

// ============================================================================
// Deferred commands
// ============================================================================

/// Hides another renderable the first time it draws.
struct Switch {
    core: RenderableCore,
    victim: Option<RenderableId>,
    pipeline: PipelineId,
}

impl Renderable for Switch {
    fn core(&self) -> &RenderableCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RenderableCore {
        &mut self.core
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn render(&mut self, ctx: &mut DrawContext<'_>) {
        DrawRecipe::new(self.pipeline, 3).encode(ctx.pass, None);
        if let Some(victim) = self.victim.take() {
            ctx.deferred.set_visible(victim, false);
        }
    }
}

#[test]
fn deferred_commands_apply_at_next_frame() {
    let (mut scene, mut encoder) = setup();
    let pipeline = encoder.create_pipeline("switch");

    let victim = ready_mesh(&scene, &mut encoder, "victim").with_render_order(1);
    let victim = scene.add_mesh(victim);
    let switch = Switch {
        core: RenderableCore::new(scene.counter(), "switch").with_projection(false),
        victim: Some(victim),
        pipeline,
    };
    scene.add_mesh(switch);

    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 2);
    assert_eq!(scene.deferred_mut().len(), 1);

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 1);
    assert!(scene.deferred_mut().is_empty());
}

#[test]
fn queued_meshes_join_at_frame_start() {
    let (mut scene, mut encoder) = setup();
    let mesh = ready_mesh(&scene, &mut encoder, "late");
    scene.deferred_mut().add_mesh(mesh);
    assert_eq!(scene.renderable_ids().count(), 0);

    scene.render(&mut encoder);

    assert_eq!(scene.renderable_ids().count(), 1);
    assert_eq!(encoder.draw_count(), 1);
    assert_eq!(scene.category_entries(PassCategory::Screen).len(), 1);
}
