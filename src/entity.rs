//! Entity records and the registry coordinating models, physics, and picking.

use anyhow::{Context, Result};
use cgmath::{Matrix4, One, Quaternion, Vector2, Vector3, Zero};

use crate::data_structures::model::Model;
use crate::physics::{PhysicsWorld, RigidBodyBinding};
use crate::targets::{DRAW_ID_HIT, DRAW_ID_SELECTED, PixelInfo};

/// Entities falling below this height are removed from the world.
pub const PRUNE_FLOOR_Y: f32 = -100.0;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Index into the registry's model table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ModelId(pub usize);

/// What an entity is, with the shape parameters that drive both its collider
/// and its render scale.
#[derive(Clone, Copy, Debug)]
pub enum EntityKind {
    Ball { radius: f32 },
    Cube { half_extents: Vector3<f32> },
    Donut { radius: f32 },
    Ground { dimensions: Vector2<f32> },
}

impl EntityKind {
    pub fn is_movable(&self) -> bool {
        !matches!(self, EntityKind::Ground { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Ball { .. } => "ball",
            EntityKind::Cube { .. } => "cube",
            EntityKind::Donut { .. } => "donut",
            EntityKind::Ground { .. } => "ground",
        }
    }

    /// Render scale applied to the kind's unit model.
    fn scale(&self) -> Vector3<f32> {
        match self {
            EntityKind::Ball { radius } => Vector3::new(*radius, *radius, *radius),
            EntityKind::Cube { half_extents } => *half_extents,
            EntityKind::Donut { radius } => Vector3::new(*radius, *radius, *radius),
            EntityKind::Ground { dimensions } => Vector3::new(dimensions.x, 1.0, dimensions.y),
        }
    }
}

pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub model: ModelId,
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub velocity: Vector3<f32>,
    pub selected: bool,
    pub binding: Option<RigidBodyBinding>,
}

impl EntityRecord {
    pub fn model_matrix(&self) -> Matrix4<f32> {
        let scale = self.kind.scale();
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
    }
}

/// Owner of all entity records and their shared models.
///
/// Spawning allocates the record and inserts the rapier body in the same
/// call, so a record with a binding is always backed by a live body until it
/// is pruned or the registry is torn down.
pub struct EntityRegistry {
    entities: Vec<EntityRecord>,
    models: Vec<Model>,
    selected: Option<EntityId>,
    next_id: u32,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            models: Vec::new(),
            selected: None,
            next_id: 0,
        }
    }

    /// Register a model for the registry's lifetime.
    pub fn create_model(&mut self, model: Model) -> ModelId {
        self.models.push(model);
        ModelId(self.models.len() - 1)
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub(crate) fn entities_mut(&mut self) -> &mut [EntityRecord] {
        &mut self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.iter().find(|record| record.id == id)
    }

    pub fn selected(&self) -> Option<EntityId> {
        self.selected
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, record: EntityRecord) -> EntityId {
        let id = record.id;
        log::debug!("spawned {} {}", record.kind.name(), id);
        self.entities.push(record);
        id
    }

    pub fn spawn_ball(
        &mut self,
        physics: &mut PhysicsWorld,
        model: ModelId,
        position: Vector3<f32>,
        velocity: Vector3<f32>,
        radius: f32,
    ) -> EntityId {
        let id = self.alloc_id();
        let binding = physics.add_sphere(position, radius, velocity);
        self.push(EntityRecord {
            id,
            kind: EntityKind::Ball { radius },
            model,
            position,
            rotation: Quaternion::one(),
            velocity,
            selected: false,
            binding: Some(binding),
        })
    }

    pub fn spawn_cube(
        &mut self,
        physics: &mut PhysicsWorld,
        model: ModelId,
        position: Vector3<f32>,
        half_extents: Vector3<f32>,
        velocity: Vector3<f32>,
        rotation: Quaternion<f32>,
    ) -> EntityId {
        let id = self.alloc_id();
        let binding = physics.add_box(position, half_extents, velocity, rotation, false);
        self.push(EntityRecord {
            id,
            kind: EntityKind::Cube { half_extents },
            model,
            position,
            rotation,
            velocity,
            selected: false,
            binding: Some(binding),
        })
    }

    /// Spawn a donut whose collider is a convex hull of its model's vertex
    /// positions, scaled to the requested radius.
    pub fn spawn_donut(
        &mut self,
        physics: &mut PhysicsWorld,
        model: ModelId,
        position: Vector3<f32>,
        velocity: Vector3<f32>,
        radius: f32,
    ) -> Result<EntityId> {
        let points: Vec<f32> = self
            .model(model)
            .context("donut model is not registered")?
            .raw_positions()
            .iter()
            .map(|p| p * radius)
            .collect();
        let id = self.alloc_id();
        let binding = physics.add_convex_hull(position, &points, velocity)?;
        Ok(self.push(EntityRecord {
            id,
            kind: EntityKind::Donut { radius },
            model,
            position,
            rotation: Quaternion::one(),
            velocity,
            selected: false,
            binding: Some(binding),
        }))
    }

    pub fn spawn_ground(
        &mut self,
        physics: &mut PhysicsWorld,
        model: ModelId,
        position: Vector3<f32>,
        dimensions: Vector2<f32>,
        rotation: Quaternion<f32>,
    ) -> EntityId {
        let id = self.alloc_id();
        let binding = physics.add_ground_plane(position, dimensions, rotation);
        self.push(EntityRecord {
            id,
            kind: EntityKind::Ground { dimensions },
            model,
            position,
            rotation,
            velocity: Vector3::zero(),
            selected: false,
            binding: Some(binding),
        })
    }

    /// Remove everything that fell below the kill floor, bodies included.
    /// Returns how many entities were dropped.
    pub fn prune(&mut self, physics: &mut PhysicsWorld) -> usize {
        let mut selected = self.selected;
        let mut removed = 0;
        self.entities.retain(|record| {
            if record.position.y >= PRUNE_FLOOR_Y {
                return true;
            }
            if let Some(binding) = record.binding.as_ref() {
                physics.remove_binding(binding);
            }
            if selected == Some(record.id) {
                selected = None;
            }
            log::info!("pruned {} {} below the world", record.kind.name(), record.id);
            removed += 1;
            false
        });
        self.selected = selected;
        removed
    }

    /// Mark one entity as selected, clearing any previous selection. Returns
    /// false if the id does not name a live entity.
    pub fn select(&mut self, id: EntityId) -> bool {
        let mut found = false;
        for record in &mut self.entities {
            record.selected = record.id == id;
            found |= record.selected;
        }
        if found {
            self.selected = Some(id);
        } else {
            self.selected = None;
        }
        found
    }

    pub fn deselect(&mut self) {
        for record in &mut self.entities {
            record.selected = false;
        }
        self.selected = None;
    }

    /// Interpret a picking readback and toggle the selection accordingly.
    pub fn apply_pick(&mut self, info: PixelInfo) {
        let draw_id = info.draw_id.round();
        if draw_id == DRAW_ID_HIT {
            let id = EntityId(info.object_id.round() as u32);
            if self.select(id) {
                let kind = self.get(id).map(|r| r.kind.name()).unwrap_or("entity");
                log::info!("selected {} {}", kind, id);
            } else {
                log::warn!("pick hit reported unknown entity {}", id);
            }
        } else if draw_id == DRAW_ID_SELECTED {
            log::info!("entity is already selected");
        } else {
            self.deselect();
        }
    }

    /// Drop every entity and release its body. Models stay registered.
    pub fn release_all(&mut self, physics: &mut PhysicsWorld) {
        for record in self.entities.drain(..) {
            if let Some(binding) = record.binding.as_ref() {
                physics.remove_binding(binding);
            }
        }
        self.selected = None;
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_cubes(count: usize) -> (PhysicsWorld, EntityRegistry, Vec<EntityId>) {
        let mut physics = PhysicsWorld::new();
        let mut registry = EntityRegistry::new();
        let ids = (0..count)
            .map(|i| {
                registry.spawn_cube(
                    &mut physics,
                    ModelId(0),
                    Vector3::new(0.0, 10.0 + i as f32 * 3.0, 0.0),
                    Vector3::new(1.0, 1.0, 1.0),
                    Vector3::zero(),
                    Quaternion::one(),
                )
            })
            .collect();
        (physics, registry, ids)
    }

    #[test]
    fn entity_ids_strictly_increase() {
        let (physics, registry, ids) = world_with_cubes(3);
        assert!(ids.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(physics.body_count(), 3);
        for id in ids {
            assert!(registry.get(id).unwrap().binding.is_some());
        }
    }

    #[test]
    fn at_most_one_entity_is_selected() {
        let (_, mut registry, ids) = world_with_cubes(3);
        assert!(registry.select(ids[0]));
        assert!(registry.select(ids[2]));
        let flagged: Vec<_> = registry.entities().iter().filter(|r| r.selected).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, ids[2]);
        assert_eq!(registry.selected(), Some(ids[2]));

        registry.deselect();
        assert_eq!(registry.selected(), None);
        assert!(registry.entities().iter().all(|r| !r.selected));
    }

    #[test]
    fn selecting_unknown_id_clears_selection() {
        let (_, mut registry, ids) = world_with_cubes(1);
        registry.select(ids[0]);
        assert!(!registry.select(EntityId(999)));
        assert_eq!(registry.selected(), None);
    }

    #[test]
    fn apply_pick_follows_the_protocol() {
        let (_, mut registry, ids) = world_with_cubes(2);

        registry.apply_pick(PixelInfo {
            object_id: ids[1].0 as f32,
            draw_id: DRAW_ID_HIT,
            prim_id: 0.0,
        });
        assert_eq!(registry.selected(), Some(ids[1]));

        // Hitting the already-selected entity keeps the selection.
        registry.apply_pick(PixelInfo {
            object_id: ids[1].0 as f32,
            draw_id: DRAW_ID_SELECTED,
            prim_id: 0.0,
        });
        assert_eq!(registry.selected(), Some(ids[1]));

        // Background readback (cleared to zero) deselects.
        registry.apply_pick(PixelInfo {
            object_id: 0.0,
            draw_id: 0.0,
            prim_id: 0.0,
        });
        assert_eq!(registry.selected(), None);
    }

    #[test]
    fn prune_is_idempotent_without_a_step() {
        let (mut physics, mut registry, ids) = world_with_cubes(2);
        registry.entities_mut()[0].position.y = PRUNE_FLOOR_Y - 1.0;
        registry.select(ids[0]);

        assert_eq!(registry.prune(&mut physics), 1);
        assert_eq!(registry.entities().len(), 1);
        assert_eq!(physics.body_count(), 1);
        assert_eq!(registry.selected(), None);

        assert_eq!(registry.prune(&mut physics), 0);
        assert_eq!(registry.entities().len(), 1);
    }

    #[test]
    fn release_all_empties_world_and_registry() {
        let (mut physics, mut registry, _) = world_with_cubes(3);
        registry.release_all(&mut physics);
        assert!(registry.entities().is_empty());
        assert_eq!(physics.body_count(), 0);
    }
}
