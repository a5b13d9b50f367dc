//! flingbox
//!
//! An interactive rigid-body sandbox: fly a camera over a ground plane and
//! fling balls, cubes, and donuts into the scene; bodies collide, settle,
//! and can be selected by GPU picking.
//!
//! High-level modules
//! - `app`: event loop, input, and the per-frame step/sync/prune/render order
//! - `camera`: fly camera, controller, and view/projection uniforms
//! - `context`: central GPU and window context owning device/queue/pipelines
//! - `data_structures`: meshes, materials, instances, textures
//! - `entity`: entity records and the registry coordinating physics and picking
//! - `light`: orbiting sun and its shadow projection
//! - `physics`: the rapier world behind the rigid-body bindings
//! - `pipelines`: the fixed pipeline set (pick, shadow, shaded, sky, blit)
//! - `render`: frame rendering over the pass sequence
//! - `resources`: procedural primitive models and materials
//! - `targets`: offscreen scene/picking/shadow render targets
//!

pub mod app;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod entity;
pub mod light;
pub mod physics;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod targets;

// Re-exports commonly used types for convenience in downstream code.
pub use entity::{EntityId, EntityKind, EntityRecord, EntityRegistry, ModelId};
pub use physics::{PhysicsWorld, RigidBodyBinding};
pub use targets::PixelInfo;
