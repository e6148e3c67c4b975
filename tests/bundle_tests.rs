//! Render Bundle Tests
//!
//! Tests for:
//! - Empty → Invalid → Warming → Ready lifecycle
//! - Membership changes after a bundle became ready
//! - Hidden and culled members left out of the recording
//! - Transform buffer growth and partial uploads
//! - Descriptor validation against the owning pass
//! - Membership errors and bundle destruction

use glam::Vec3;

use pass_graph::backend::{DrawRecipe, FrameEvent, InstanceData, RecordingEncoder};
use pass_graph::graph::{DrawableId, PassLayout};
use pass_graph::renderable::FrustumCullable;
use pass_graph::scene::Placement;
use pass_graph::{
    BundleId, BundleState, FullscreenPass, Mesh, RenderBundleOptions, Renderable, RenderableId,
    Scene, SchedulerError, SchedulerSettings,
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

fn bundle_with(scene: &mut Scene, encoder: &mut RecordingEncoder, count: usize) -> (BundleId, Vec<RenderableId>) {
    let bundle = scene
        .create_render_bundle(RenderBundleOptions::new("Static props").with_capacity(4))
        .unwrap();
    let members = (0..count)
        .map(|i| {
            let mesh = ready_mesh(scene, encoder, &format!("prop {i}")).with_render_bundle(bundle);
            scene.add_mesh(mesh)
        })
        .collect();
    (bundle, members)
}

fn buffer_events(encoder: &RecordingEncoder) -> Vec<&FrameEvent> {
    encoder
        .events()
        .iter()
        .filter(|e| {
            matches!(
                e,
                FrameEvent::CreateBuffer { .. } | FrameEvent::WriteBuffer { .. } | FrameEvent::DestroyBuffer(_)
            )
        })
        .collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn empty_bundle_draws_nothing() {
    let (mut scene, mut encoder) = setup();
    let bundle = scene
        .create_render_bundle(RenderBundleOptions::new("Empty"))
        .unwrap();

    scene.render(&mut encoder);

    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Empty);
    assert_eq!(encoder.begin_count(), 0);
    assert!(buffer_events(&encoder).is_empty());
}

#[test]
fn ready_members_are_encoded_then_replayed() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 4);
    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Invalid);
    for id in &members {
        assert_eq!(scene.placement(*id), Some(Placement::Bundle(bundle)));
    }

    // First frame: members draw one by one, then the bundle is encoded.
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());
    assert_eq!(encoder.draw_count(), 4);
    assert!(encoder.bundle_replays().is_empty());

    // Later frames replay the recorded sequence.
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 4)]);
    assert_eq!(encoder.draw_count(), 4);
}

#[test]
fn bundle_warms_until_every_member_is_ready() {
    let (mut scene, mut encoder) = setup();
    let (bundle, _) = bundle_with(&mut scene, &mut encoder, 3);
    let pending = Mesh::new(scene.counter(), "streaming").with_render_bundle(bundle);
    let pending = scene.add_mesh(pending);

    scene.render(&mut encoder);
    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Warming);
    assert_eq!(encoder.draw_count(), 3);
    assert!(scene.bundle(bundle).unwrap().recorded().is_none());

    let pipeline = encoder.create_pipeline("streamed");
    scene
        .get_mut::<Mesh>(pending)
        .unwrap()
        .set_draw(Some(DrawRecipe::new(pipeline, 36)));

    encoder.clear();
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());
    assert_eq!(encoder.draw_count(), 4);
}

#[test]
fn removing_a_member_invalidates_until_next_frame() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 4);
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());

    scene.remove_mesh(members[1]).unwrap();
    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Invalid);
    assert_eq!(scene.bundle(bundle).unwrap().members().len(), 3);

    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 3)]);
}

#[test]
fn hidden_bundle_skips_its_pass() {
    let (mut scene, mut encoder) = setup();
    let (bundle, _) = bundle_with(&mut scene, &mut encoder, 2);

    scene.set_bundle_visible(bundle, false).unwrap();
    scene.render(&mut encoder);

    assert_eq!(encoder.begin_count(), 0);
    assert_ne!(scene.bundle(bundle).unwrap().state(), BundleState::Ready);
}

// ============================================================================
// Member visibility
// ============================================================================

#[test]
fn hiding_a_member_records_the_bundle_again() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 2);
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());

    scene.set_visible(members[0], false).unwrap();
    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Invalid);

    encoder.clear();
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());
    assert_eq!(encoder.draw_count(), 1);

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 1)]);
    assert_eq!(encoder.draw_count(), 1);

    // Showing it again brings it back into the recording.
    scene.set_visible(members[0], true).unwrap();
    scene.render(&mut encoder);
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 2)]);
    assert_eq!(encoder.draw_count(), 2);
}

#[test]
fn setting_the_same_visibility_keeps_the_recording() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 2);
    scene.render(&mut encoder);

    scene.set_visible(members[0], true).unwrap();
    assert!(scene.bundle(bundle).unwrap().is_ready());
}

#[test]
fn hidden_members_are_left_out_of_the_first_recording() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 3);
    scene.set_visible(members[1], false).unwrap();

    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 2);
    assert_eq!(scene.bundle(bundle).unwrap().recorded().unwrap().member_count(), 2);

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 2)]);
    assert_eq!(encoder.draw_count(), 2);
}

#[test]
fn bundle_of_hidden_members_skips_its_pass() {
    let (mut scene, mut encoder) = setup();
    let (_, members) = bundle_with(&mut scene, &mut encoder, 2);
    scene.render(&mut encoder);
    assert_eq!(encoder.begin_count(), 1);

    for id in &members {
        scene.set_visible(*id, false).unwrap();
    }
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.begin_count(), 0);
    assert_eq!(encoder.draw_count(), 0);
}

#[test]
fn direct_member_changes_record_the_bundle_again() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 2);
    scene.render(&mut encoder);
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 2)]);

    // Culled through the renderable itself: the scene is not told.
    scene.get_mut::<Mesh>(members[1]).unwrap().set_intersecting(false);
    encoder.clear();
    scene.render(&mut encoder);
    assert!(encoder.bundle_replays().is_empty());
    assert_eq!(encoder.draw_count(), 1);

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 1)]);

    scene.get_mut::<Mesh>(members[0]).unwrap().core_mut().set_visible(false);
    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.draw_count(), 0);
    assert_eq!(scene.bundle(bundle).unwrap().recorded().unwrap().member_count(), 0);
}

#[test]
fn device_loss_rewarms_bundles() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 2);
    let recipes: Vec<DrawRecipe> = members
        .iter()
        .map(|id| scene.get::<Mesh>(*id).unwrap().draw().unwrap().clone())
        .collect();
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());

    scene.lose_device();
    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Invalid);
    assert!(scene.bundle(bundle).unwrap().transform_buffer().is_none());

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(scene.bundle(bundle).unwrap().state(), BundleState::Warming);
    assert_eq!(encoder.draw_count(), 0);

    for (id, recipe) in members.iter().zip(recipes) {
        scene.get_mut::<Mesh>(*id).unwrap().set_draw(Some(recipe));
    }
    scene.render(&mut encoder);
    assert!(scene.bundle(bundle).unwrap().is_ready());
    assert!(scene.bundle(bundle).unwrap().transform_buffer().is_some());
}

// ============================================================================
// Transform buffer
// ============================================================================

#[test]
fn growth_reallocates_and_replays_every_member() {
    let (mut scene, mut encoder) = setup();
    let (bundle, _) = bundle_with(&mut scene, &mut encoder, 4);
    assert_eq!(scene.bundle(bundle).unwrap().capacity(), 4);

    scene.render(&mut encoder);
    let first = scene.bundle(bundle).unwrap().transform_buffer().unwrap();
    assert_eq!(encoder.buffer_size(first), Some(4 * InstanceData::SIZE));

    let fifth = ready_mesh(&scene, &mut encoder, "prop 4").with_render_bundle(bundle);
    scene.add_mesh(fifth);
    assert_eq!(scene.bundle(bundle).unwrap().capacity(), 8);

    encoder.clear();
    scene.render(&mut encoder);
    let second = scene.bundle(bundle).unwrap().transform_buffer().unwrap();
    assert_ne!(first, second);
    assert!(encoder.events().contains(&FrameEvent::DestroyBuffer(first)));
    assert_eq!(encoder.buffer_size(second), Some(8 * InstanceData::SIZE));
    assert_eq!(encoder.live_buffers(), 1);
    assert!(scene.bundle(bundle).unwrap().is_ready());

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(encoder.bundle_replays(), [("Static props", 5)]);
}

#[test]
fn capacity_only_grows() {
    let (mut scene, mut encoder) = setup();
    let (bundle, _) = bundle_with(&mut scene, &mut encoder, 1);

    scene.set_bundle_capacity(bundle, 2).unwrap();
    assert_eq!(scene.bundle(bundle).unwrap().capacity(), 4);

    scene.set_bundle_capacity(bundle, 6).unwrap();
    assert_eq!(scene.bundle(bundle).unwrap().capacity(), 8);
}

#[test]
fn moving_a_member_uploads_only_its_slot() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 3);
    scene.render(&mut encoder);
    let buffer = scene.bundle(bundle).unwrap().transform_buffer().unwrap();

    // A frame without changes uploads nothing.
    encoder.clear();
    scene.render(&mut encoder);
    assert!(buffer_events(&encoder).is_empty());

    let slot = scene
        .bundle(bundle)
        .unwrap()
        .members()
        .iter()
        .position(|id| *id == members[2])
        .unwrap() as u64;
    scene.get_mut::<Mesh>(members[2]).unwrap().transform.position = Vec3::new(1.0, 2.0, 3.0);

    encoder.clear();
    scene.render(&mut encoder);
    assert_eq!(
        buffer_events(&encoder),
        [&FrameEvent::WriteBuffer {
            buffer,
            offset: slot * InstanceData::SIZE,
            size: InstanceData::SIZE as usize,
        }]
    );
    assert!(scene.bundle(bundle).unwrap().is_ready());
}

// ============================================================================
// Validation & membership
// ============================================================================

#[test]
fn descriptor_mismatch_fails_creation() {
    let (mut scene, _) = setup();
    let screen = scene
        .entry(scene.default_entry())
        .unwrap()
        .descriptor()
        .clone();

    let matching = scene.create_render_bundle(RenderBundleOptions::new("Matching").matching(&screen));
    assert!(matching.is_ok());

    let mut layout: PassLayout = screen.layout();
    layout.sample_count = 4;
    let err = scene
        .create_render_bundle(RenderBundleOptions::new("MSAA").with_layout(layout))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::BundleDescriptorMismatch { ref bundle, .. } if bundle == "MSAA"));
}

#[test]
fn membership_errors() {
    let (mut scene, mut encoder) = setup();
    let (first, members) = bundle_with(&mut scene, &mut encoder, 1);
    let second = scene
        .create_render_bundle(RenderBundleOptions::new("Second"))
        .unwrap();

    // Joining the current bundle again is a no-op.
    assert_eq!(scene.add_to_bundle(first, members[0]), Ok(()));
    assert!(matches!(
        scene.add_to_bundle(second, members[0]),
        Err(SchedulerError::AlreadyBundled { bundle, .. }) if bundle == first
    ));

    let pass = FullscreenPass::new(scene.counter(), "Grain");
    let pass = scene.add_shader_pass(pass);
    assert!(matches!(
        scene.add_to_bundle(first, pass),
        Err(SchedulerError::NotBundleable(_))
    ));

    scene.destroy_render_bundle(second).unwrap();
    assert_eq!(
        scene.add_to_bundle(second, members[0]),
        Err(SchedulerError::BundleNotFound(second))
    );
}

#[test]
fn members_move_between_stack_and_bundle() {
    let (mut scene, mut encoder) = setup();
    let bundle = scene
        .create_render_bundle(RenderBundleOptions::new("Props"))
        .unwrap();
    let mesh = ready_mesh(&scene, &mut encoder, "crate");
    let id = scene.add_mesh(mesh);
    let stack = |scene: &Scene| {
        scene
            .entry(scene.default_entry())
            .unwrap()
            .stack()
            .unwrap()
            .clone()
    };
    assert!(stack(&scene).contains(DrawableId::Renderable(id)));

    scene.add_to_bundle(bundle, id).unwrap();
    assert!(!stack(&scene).contains(DrawableId::Renderable(id)));
    assert!(stack(&scene).contains(DrawableId::Bundle(bundle)));
    assert!(scene.bundle(bundle).unwrap().contains(id));

    scene.remove_from_bundle(bundle, id).unwrap();
    assert!(stack(&scene).contains(DrawableId::Renderable(id)));
    assert!(scene.bundle(bundle).unwrap().is_empty());
    assert_eq!(
        scene.remove_from_bundle(bundle, id),
        Err(SchedulerError::NotBundleMember {
            label: "crate".to_owned(),
            bundle,
        })
    );

    scene.remove_mesh(id).unwrap();
    assert_eq!(
        scene.remove_from_bundle(bundle, id),
        Err(SchedulerError::RenderableNotFound(id))
    );
}

#[test]
fn destroying_a_bundle_returns_members_and_releases_buffers() {
    let (mut scene, mut encoder) = setup();
    let (bundle, members) = bundle_with(&mut scene, &mut encoder, 2);
    scene.render(&mut encoder);
    let buffer = scene.bundle(bundle).unwrap().transform_buffer().unwrap();

    scene.destroy_render_bundle(bundle).unwrap();
    assert!(scene.bundle(bundle).is_none());
    for id in &members {
        assert!(matches!(scene.placement(*id), Some(Placement::Stack { .. })));
    }

    encoder.clear();
    scene.render(&mut encoder);
    assert!(encoder.events().contains(&FrameEvent::DestroyBuffer(buffer)));
    assert!(encoder.bundle_replays().is_empty());
    assert_eq!(encoder.draw_count(), 2);
}

#[test]
fn unregistered_bundle_reference_falls_back_to_the_stack() {
    let (mut scene, mut encoder) = setup();
    let gone = scene
        .create_render_bundle(RenderBundleOptions::new("Gone"))
        .unwrap();
    scene.destroy_render_bundle(gone).unwrap();

    let mesh = ready_mesh(&scene, &mut encoder, "orphan").with_render_bundle(gone);
    let id = scene.add_mesh(mesh);

    assert!(matches!(scene.placement(id), Some(Placement::Stack { .. })));
}
