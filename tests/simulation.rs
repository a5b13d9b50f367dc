//! Headless simulation scenarios driving the registry and physics world
//! through the same step/sync/prune sequence the app runs per frame.

use cgmath::{InnerSpace, One, Quaternion, Vector2, Vector3, Zero};
use flingbox::entity::PRUNE_FLOOR_Y;
use flingbox::physics::GROUND_HALF_THICKNESS;
use flingbox::{EntityRegistry, ModelId, PhysicsWorld};

const STEP: f32 = 1.0 / 60.0;

fn advance(physics: &mut PhysicsWorld, registry: &mut EntityRegistry, steps: usize) {
    for _ in 0..steps {
        physics.step(STEP);
        physics.sync_transforms(registry);
        registry.prune(physics);
    }
}

#[test]
fn dropped_ball_settles_on_the_ground_surface() {
    let mut physics = PhysicsWorld::new();
    let mut registry = EntityRegistry::new();
    registry.spawn_ground(
        &mut physics,
        ModelId(0),
        Vector3::zero(),
        Vector2::new(20.0, 20.0),
        Quaternion::one(),
    );
    let radius = 1.0;
    let ball = registry.spawn_ball(
        &mut physics,
        ModelId(0),
        Vector3::new(0.0, 10.0, 0.0),
        Vector3::zero(),
        radius,
    );

    advance(&mut physics, &mut registry, 1200);

    let record = registry.get(ball).expect("ball should survive");
    // The ground collider is sunk by its half thickness, so its surface sits
    // at y = 0 and the ball comes to rest one radius above it.
    assert!(
        (record.position.y - radius).abs() < 0.5,
        "ball rests at y = {}, expected about {}",
        record.position.y,
        radius
    );
    assert!(record.velocity.magnitude() < 1.0);
}

#[test]
fn ground_collider_top_matches_spawn_height() {
    let mut physics = PhysicsWorld::new();
    let mut registry = EntityRegistry::new();
    let ground = registry.spawn_ground(
        &mut physics,
        ModelId(0),
        Vector3::zero(),
        Vector2::new(20.0, 20.0),
        Quaternion::one(),
    );
    let record = registry.get(ground).unwrap();
    let binding = record.binding.as_ref().unwrap();
    let (position, _) = physics.body_pose(binding).unwrap();
    assert!((position.y + GROUND_HALF_THICKNESS).abs() < 1e-5);
}

#[test]
fn ground_record_keeps_its_spawn_pose_after_sync() {
    let mut physics = PhysicsWorld::new();
    let mut registry = EntityRegistry::new();
    let ground = registry.spawn_ground(
        &mut physics,
        ModelId(0),
        Vector3::zero(),
        Vector2::new(20.0, 20.0),
        Quaternion::one(),
    );

    advance(&mut physics, &mut registry, 60);

    // The collider is sunk below the surface, but the rendered plane must
    // stay where it was spawned.
    let record = registry.get(ground).unwrap();
    assert_eq!(record.position, Vector3::zero());
    assert_eq!(record.rotation, Quaternion::one());
}

#[test]
fn synced_pose_matches_the_solver_exactly() {
    let mut physics = PhysicsWorld::new();
    let mut registry = EntityRegistry::new();
    let cube = registry.spawn_cube(
        &mut physics,
        ModelId(0),
        Vector3::new(2.0, 8.0, -3.0),
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(5.0, 0.0, 0.0),
        Quaternion::one(),
    );

    for _ in 0..30 {
        physics.step(STEP);
    }
    physics.sync_transforms(&mut registry);

    let record = registry.get(cube).unwrap();
    let binding = record.binding.as_ref().unwrap();
    let (position, rotation) = physics.body_pose(binding).unwrap();
    assert_eq!(record.position, position);
    assert_eq!(record.rotation, rotation);
}

#[test]
fn entities_falling_off_the_world_get_pruned() {
    let mut physics = PhysicsWorld::new();
    let mut registry = EntityRegistry::new();
    // No ground below this one; it free-falls past the kill floor.
    let ball = registry.spawn_ball(
        &mut physics,
        ModelId(0),
        Vector3::new(100.0, 0.0, 0.0),
        Vector3::zero(),
        1.0,
    );
    registry.select(ball);

    advance(&mut physics, &mut registry, 600);

    assert!(registry.get(ball).is_none());
    assert_eq!(physics.body_count(), 0);
    assert_eq!(registry.selected(), None);

    // The world keeps stepping fine after the removal.
    advance(&mut physics, &mut registry, 60);
}

#[test]
fn mixed_spawns_share_one_monotonic_id_space() {
    let mut physics = PhysicsWorld::new();
    let mut registry = EntityRegistry::new();
    let a = registry.spawn_ground(
        &mut physics,
        ModelId(0),
        Vector3::zero(),
        Vector2::new(20.0, 20.0),
        Quaternion::one(),
    );
    let b = registry.spawn_ball(
        &mut physics,
        ModelId(0),
        Vector3::new(0.0, 5.0, 0.0),
        Vector3::zero(),
        1.0,
    );
    let c = registry.spawn_cube(
        &mut physics,
        ModelId(0),
        Vector3::new(3.0, 5.0, 0.0),
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::zero(),
        Quaternion::one(),
    );
    assert!(a.0 < b.0 && b.0 < c.0);
    assert_eq!(physics.body_count(), 3);
}

#[test]
fn kill_floor_sits_well_below_the_playfield() {
    // Sanity on the constant itself; entities resting on the ground never
    // come near it.
    assert!(PRUNE_FLOOR_Y < -50.0);
}
