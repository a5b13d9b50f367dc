//! Rigid-body simulation and the entity/physics binding boundary.
//!
//! [`PhysicsWorld`] wraps the rapier solver state. Entities never touch
//! rapier handles directly; they hold a [`RigidBodyBinding`] created by one of
//! the shape factories here, and once per frame [`PhysicsWorld::sync_transforms`]
//! copies the solved poses back into the records. All math crossing the
//! boundary is converted between cgmath (render side) and nalgebra (solver
//! side) in this module only.

use anyhow::{Context, Result, ensure};
use rapier3d::na;
use rapier3d::prelude::*;

use crate::entity::EntityRegistry;

/// World gravity, deliberately stronger than earth gravity so flung objects
/// feel weighty at sandbox scale.
pub const GRAVITY: Vector<f32> = Vector::new(0.0, -100.0, 0.0);

/// Upper bound for a single solver step. A frame hitch must not feed a huge
/// timestep into the solver.
pub const MAX_STEP_DT: f32 = 1.0 / 30.0;

// Per-kind contact tuning. Spheres use a bouncy, high-friction preset so they
// roll and rebound; boxes land dead.
pub const BOX_RESTITUTION: f32 = 0.30;
pub const BOX_FRICTION: f32 = 2.0;
pub const SPHERE_DENSITY: f32 = 5.0;
pub const SPHERE_RESTITUTION: f32 = 0.80;
pub const SPHERE_FRICTION: f32 = 12.0;
pub const HULL_RESTITUTION: f32 = 0.80;
pub const HULL_FRICTION: f32 = 0.9;

/// The ground is a thin box, not an infinite plane. Its collider is sunk so
/// the top face sits exactly at the entity's y coordinate.
pub const GROUND_HALF_THICKNESS: f32 = 0.5;

/// Collision shape recorded on a binding.
#[derive(Clone, Debug)]
pub enum ShapeDesc {
    Box { half_extents: cgmath::Vector3<f32> },
    Sphere { radius: f32 },
    ConvexHull { points: Vec<f32> },
    Plane { dimensions: cgmath::Vector2<f32> },
}

/// Ownership link between an entity and its rapier body.
///
/// A binding only ever comes out of a [`PhysicsWorld`] factory, so an entity
/// cannot be added to the world twice. The handles are generational arena
/// indices; once removed they never resolve again.
#[derive(Clone, Debug)]
pub struct RigidBodyBinding {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub shape: ShapeDesc,
    pub mass: f32,
    pub is_static: bool,
}

pub struct PhysicsWorld {
    pub gravity: Vector<f32>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }
}

/// Limit a frame delta before it reaches the solver.
pub fn clamped_dt(dt: f32) -> f32 {
    dt.clamp(0.0, MAX_STEP_DT)
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the simulation by one clamped timestep.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = clamped_dt(dt);
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contains(&self, binding: &RigidBodyBinding) -> bool {
        self.bodies.contains(binding.body)
    }

    /// World-space pose of a bound body, if it is still alive.
    pub fn body_pose(
        &self,
        binding: &RigidBodyBinding,
    ) -> Option<(cgmath::Vector3<f32>, cgmath::Quaternion<f32>)> {
        let body = self.bodies.get(binding.body)?;
        Some((
            vector_to_cgmath(*body.translation()),
            quat_to_cgmath(body.rotation()),
        ))
    }

    /// Insert a box body. Static boxes are massless; dynamic ones weigh their
    /// full-extent volume.
    pub fn add_box(
        &mut self,
        position: cgmath::Vector3<f32>,
        half_extents: cgmath::Vector3<f32>,
        velocity: cgmath::Vector3<f32>,
        rotation: cgmath::Quaternion<f32>,
        is_static: bool,
    ) -> RigidBodyBinding {
        let mass = if is_static {
            0.0
        } else {
            (2.0 * half_extents.x) * (2.0 * half_extents.y) * (2.0 * half_extents.z)
        };
        let builder = if is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
                .linvel(vector_to_na(velocity))
                .ccd_enabled(true)
        };
        let body = builder
            .translation(vector_to_na(position))
            .rotation(quat_to_scaled_axis(rotation))
            .build();
        let body = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .restitution(BOX_RESTITUTION)
            .friction(BOX_FRICTION)
            .mass(mass)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        RigidBodyBinding {
            body,
            collider,
            shape: ShapeDesc::Box { half_extents },
            mass,
            is_static,
        }
    }

    /// Insert a dynamic sphere. Mass follows the fixed density over the real
    /// sphere volume.
    pub fn add_sphere(
        &mut self,
        position: cgmath::Vector3<f32>,
        radius: f32,
        velocity: cgmath::Vector3<f32>,
    ) -> RigidBodyBinding {
        let mass = SPHERE_DENSITY * (4.0 / 3.0) * std::f32::consts::PI * radius.powi(3);
        let body = RigidBodyBuilder::dynamic()
            .translation(vector_to_na(position))
            .linvel(vector_to_na(velocity))
            .ccd_enabled(true)
            .build();
        let body = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(radius)
            .restitution(SPHERE_RESTITUTION)
            .friction(SPHERE_FRICTION)
            .mass(mass)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        RigidBodyBinding {
            body,
            collider,
            shape: ShapeDesc::Sphere { radius },
            mass,
            is_static: false,
        }
    }

    /// Insert a dynamic convex hull built from a flat xyz point list (a
    /// model's raw vertex positions). Mass is derived from the point cloud's
    /// bounding box volume. Fails on a degenerate cloud.
    pub fn add_convex_hull(
        &mut self,
        position: cgmath::Vector3<f32>,
        points: &[f32],
        velocity: cgmath::Vector3<f32>,
    ) -> Result<RigidBodyBinding> {
        ensure!(
            points.len() >= 12 && points.len() % 3 == 0,
            "convex hull needs at least four xyz points, got {} floats",
            points.len()
        );
        let mut min = Vector::repeat(f32::MAX);
        let mut max = Vector::repeat(f32::MIN);
        let cloud: Vec<Point<f32>> = points
            .chunks_exact(3)
            .map(|p| {
                let point = Point::new(p[0], p[1], p[2]);
                min = min.inf(&point.coords);
                max = max.sup(&point.coords);
                point
            })
            .collect();
        let extents = max - min;
        let mass = extents.x * extents.y * extents.z;
        let shape =
            SharedShape::convex_hull(&cloud).context("degenerate point cloud for convex hull")?;

        let body = RigidBodyBuilder::dynamic()
            .translation(vector_to_na(position))
            .linvel(vector_to_na(velocity))
            .ccd_enabled(true)
            .build();
        let body = self.bodies.insert(body);
        let collider = ColliderBuilder::new(shape)
            .restitution(HULL_RESTITUTION)
            .friction(HULL_FRICTION)
            .mass(mass)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        Ok(RigidBodyBinding {
            body,
            collider,
            shape: ShapeDesc::ConvexHull {
                points: points.to_vec(),
            },
            mass,
            is_static: false,
        })
    }

    /// Insert the static ground slab. The collider is sunk by its half
    /// thickness so the walkable surface sits at `position.y`.
    pub fn add_ground_plane(
        &mut self,
        position: cgmath::Vector3<f32>,
        dimensions: cgmath::Vector2<f32>,
        rotation: cgmath::Quaternion<f32>,
    ) -> RigidBodyBinding {
        let body = RigidBodyBuilder::fixed()
            .translation(Vector::new(
                position.x,
                position.y - GROUND_HALF_THICKNESS,
                position.z,
            ))
            .rotation(quat_to_scaled_axis(rotation))
            .build();
        let body = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(dimensions.x, GROUND_HALF_THICKNESS, dimensions.y)
            .restitution(BOX_RESTITUTION)
            .friction(BOX_FRICTION)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        RigidBodyBinding {
            body,
            collider,
            shape: ShapeDesc::Plane { dimensions },
            mass: 0.0,
            is_static: true,
        }
    }

    /// Remove a body and its attached collider. Safe to call again on the
    /// same binding; dead handles simply no longer resolve.
    pub fn remove_binding(&mut self, binding: &RigidBodyBinding) {
        self.bodies.remove(
            binding.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Copy solved poses back into the bound entity records. The only path by
    /// which physics state reaches the render side.
    ///
    /// Static bodies are skipped: they never move, and their collider may sit
    /// offset from the record's pose (the ground slab is sunk by its half
    /// thickness), so copying the body translation back would shift the
    /// rendered geometry off the collision surface.
    pub fn sync_transforms(&self, registry: &mut EntityRegistry) {
        for record in registry.entities_mut() {
            let Some(binding) = record.binding.as_ref() else {
                continue;
            };
            if binding.is_static {
                continue;
            }
            let Some(body) = self.bodies.get(binding.body) else {
                continue;
            };
            record.position = vector_to_cgmath(*body.translation());
            record.rotation = quat_to_cgmath(body.rotation());
            record.velocity = vector_to_cgmath(*body.linvel());
        }
    }
}

fn vector_to_na(v: cgmath::Vector3<f32>) -> Vector<f32> {
    Vector::new(v.x, v.y, v.z)
}

fn vector_to_cgmath(v: Vector<f32>) -> cgmath::Vector3<f32> {
    cgmath::Vector3::new(v.x, v.y, v.z)
}

fn quat_to_scaled_axis(q: cgmath::Quaternion<f32>) -> Vector<f32> {
    na::UnitQuaternion::from_quaternion(na::Quaternion::new(q.s, q.v.x, q.v.y, q.v.z)).scaled_axis()
}

fn quat_to_cgmath(q: &na::UnitQuaternion<f32>) -> cgmath::Quaternion<f32> {
    cgmath::Quaternion::new(q.w, q.i, q.j, q.k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{One, Quaternion, Vector2, Vector3, Zero};

    fn origin() -> Vector3<f32> {
        Vector3::zero()
    }

    #[test]
    fn frame_delta_is_clamped() {
        assert_eq!(clamped_dt(10.0), MAX_STEP_DT);
        assert_eq!(clamped_dt(-1.0), 0.0);
        assert_eq!(clamped_dt(0.001), 0.001);
    }

    #[test]
    fn static_box_is_massless() {
        let mut world = PhysicsWorld::new();
        let binding = world.add_box(
            origin(),
            Vector3::new(2.0, 3.0, 4.0),
            Vector3::zero(),
            Quaternion::one(),
            true,
        );
        assert_eq!(binding.mass, 0.0);
        assert!(binding.is_static);
    }

    #[test]
    fn dynamic_box_mass_is_extents_volume() {
        let mut world = PhysicsWorld::new();
        let binding = world.add_box(
            origin(),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::zero(),
            Quaternion::one(),
            false,
        );
        assert_eq!(binding.mass, 2.0 * 4.0 * 6.0);
    }

    #[test]
    fn sphere_mass_follows_density_over_volume() {
        let mut world = PhysicsWorld::new();
        let radius = 1.5_f32;
        let binding = world.add_sphere(origin(), radius, Vector3::zero());
        let expected = SPHERE_DENSITY * (4.0 / 3.0) * std::f32::consts::PI * radius.powi(3);
        assert!((binding.mass - expected).abs() < 1e-3);
    }

    #[test]
    fn convex_hull_mass_is_bounding_box_volume() {
        let mut world = PhysicsWorld::new();
        #[rustfmt::skip]
        let cube = [
            -1.0, -1.0, -1.0,  1.0, -1.0, -1.0,
             1.0,  1.0, -1.0, -1.0,  1.0, -1.0,
            -1.0, -1.0,  1.0,  1.0, -1.0,  1.0,
             1.0,  1.0,  1.0, -1.0,  1.0,  1.0,
        ];
        let binding = world
            .add_convex_hull(origin(), &cube, Vector3::zero())
            .unwrap();
        assert!((binding.mass - 8.0).abs() < 1e-5);
    }

    #[test]
    fn convex_hull_rejects_degenerate_cloud() {
        let mut world = PhysicsWorld::new();
        assert!(
            world
                .add_convex_hull(origin(), &[0.0, 0.0, 0.0], Vector3::zero())
                .is_err()
        );
    }

    #[test]
    fn remove_binding_is_idempotent() {
        let mut world = PhysicsWorld::new();
        let binding = world.add_sphere(origin(), 1.0, Vector3::zero());
        assert_eq!(world.body_count(), 1);
        world.remove_binding(&binding);
        world.remove_binding(&binding);
        assert_eq!(world.body_count(), 0);
        assert!(!world.contains(&binding));
        assert!(world.body_pose(&binding).is_none());
    }

    #[test]
    fn gravity_pulls_a_free_sphere_down() {
        let mut world = PhysicsWorld::new();
        let binding = world.add_sphere(Vector3::new(0.0, 10.0, 0.0), 1.0, Vector3::zero());
        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        let (position, _) = world.body_pose(&binding).unwrap();
        assert!(position.y < 10.0);
    }

    #[test]
    fn ground_surface_sits_at_entity_height() {
        let mut world = PhysicsWorld::new();
        let binding = world.add_ground_plane(origin(), Vector2::new(20.0, 20.0), Quaternion::one());
        let (position, _) = world.body_pose(&binding).unwrap();
        assert!((position.y - (-GROUND_HALF_THICKNESS)).abs() < 1e-6);
    }
}
