//! Procedural models and materials for the sandbox.
//!
//! The sandbox ships no asset files; every model is generated here as unit
//! geometry (radius or half-extent 1) and scaled per entity at draw time.
//! Materials are small CPU-generated images uploaded through the `image`
//! crate.

use anyhow::Result;
use image::{Rgba, RgbaImage};
use wgpu::util::DeviceExt;

use crate::data_structures::{
    model::{Material, Mesh, Model, ModelVertex, diffuse_layout},
    texture::Texture,
};

const SPHERE_STACKS: u32 = 16;
const SPHERE_SLICES: u32 = 32;
const TORUS_SEGMENTS: u32 = 32;
const TORUS_SIDES: u32 = 16;
/// Tube radius of the unit torus (ring radius is 1).
const TORUS_TUBE_RADIUS: f32 = 0.4;

struct MeshData {
    vertices: Vec<ModelVertex>,
    indices: Vec<u32>,
}

fn upload_mesh(device: &wgpu::Device, name: &str, data: MeshData) -> Mesh {
    let positions = data
        .vertices
        .iter()
        .flat_map(|v| v.position)
        .collect::<Vec<f32>>();
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{name} Vertex Buffer")),
        contents: bytemuck::cast_slice(&data.vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{name} Index Buffer")),
        contents: bytemuck::cast_slice(&data.indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    Mesh {
        name: name.to_string(),
        vertex_buffer,
        index_buffer,
        num_elements: data.indices.len() as u32,
        material: 0,
        positions,
    }
}

/// Flat quad spanning x/z in [-1, 1] with its normal up. Texture coordinates
/// repeat so the checkerboard tiles once the plane is scaled up.
fn plane() -> MeshData {
    let uv = 8.0;
    let vertices = vec![
        ModelVertex {
            position: [-1.0, 0.0, -1.0],
            tex_coords: [0.0, 0.0],
            normal: [0.0, 1.0, 0.0],
        },
        ModelVertex {
            position: [1.0, 0.0, -1.0],
            tex_coords: [uv, 0.0],
            normal: [0.0, 1.0, 0.0],
        },
        ModelVertex {
            position: [1.0, 0.0, 1.0],
            tex_coords: [uv, uv],
            normal: [0.0, 1.0, 0.0],
        },
        ModelVertex {
            position: [-1.0, 0.0, 1.0],
            tex_coords: [0.0, uv],
            normal: [0.0, 1.0, 0.0],
        },
    ];
    let indices = vec![0, 2, 1, 0, 3, 2];
    MeshData { vertices, indices }
}

/// Axis-aligned cube with half-extent 1, four vertices per face.
fn cube() -> MeshData {
    use cgmath::Vector3;
    // (normal, tangent, bitangent) with tangent x bitangent = normal, so the
    // shared winding below comes out counter-clockwise from outside.
    let faces: [(Vector3<f32>, Vector3<f32>, Vector3<f32>); 6] = [
        (Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()),
        (-Vector3::unit_x(), Vector3::unit_z(), Vector3::unit_y()),
        (Vector3::unit_y(), Vector3::unit_z(), Vector3::unit_x()),
        (-Vector3::unit_y(), Vector3::unit_x(), Vector3::unit_z()),
        (Vector3::unit_z(), Vector3::unit_x(), Vector3::unit_y()),
        (-Vector3::unit_z(), Vector3::unit_y(), Vector3::unit_x()),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent, bitangent) in faces {
        let base = vertices.len() as u32;
        for (s, t) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let corner = normal + tangent * s + bitangent * t;
            vertices.push(ModelVertex {
                position: corner.into(),
                tex_coords: [(s + 1.0) / 2.0, (t + 1.0) / 2.0],
                normal: normal.into(),
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData { vertices, indices }
}

/// UV sphere of radius 1.
fn uv_sphere(stacks: u32, slices: u32) -> MeshData {
    use std::f32::consts::PI;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for i in 0..=stacks {
        let phi = PI * i as f32 / stacks as f32;
        let (sin_phi, cos_phi) = phi.sin_cos();
        for j in 0..=slices {
            let theta = 2.0 * PI * j as f32 / slices as f32;
            let (sin_theta, cos_theta) = theta.sin_cos();
            let normal = [sin_phi * cos_theta, cos_phi, sin_phi * sin_theta];
            vertices.push(ModelVertex {
                position: normal,
                tex_coords: [j as f32 / slices as f32, i as f32 / stacks as f32],
                normal,
            });
        }
    }
    for i in 0..stacks {
        for j in 0..slices {
            let a = i * (slices + 1) + j;
            let b = a + slices + 1;
            indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }
    MeshData { vertices, indices }
}

/// Torus with ring radius 1.
fn torus(segments: u32, sides: u32, tube_radius: f32) -> MeshData {
    use std::f32::consts::PI;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for i in 0..=segments {
        let u = 2.0 * PI * i as f32 / segments as f32;
        let (sin_u, cos_u) = u.sin_cos();
        for j in 0..=sides {
            let v = 2.0 * PI * j as f32 / sides as f32;
            let (sin_v, cos_v) = v.sin_cos();
            let normal = [cos_v * cos_u, sin_v, cos_v * sin_u];
            vertices.push(ModelVertex {
                position: [
                    (1.0 + tube_radius * cos_v) * cos_u,
                    tube_radius * sin_v,
                    (1.0 + tube_radius * cos_v) * sin_u,
                ],
                tex_coords: [i as f32 / segments as f32, j as f32 / sides as f32],
                normal,
            });
        }
    }
    for i in 0..segments {
        for j in 0..sides {
            let a = i * (sides + 1) + j;
            let b = a + sides + 1;
            indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }
    MeshData { vertices, indices }
}

fn checkerboard_image(light: [u8; 4], dark: [u8; 4]) -> RgbaImage {
    let size = 256;
    let cell = size / 8;
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba(light)
        } else {
            Rgba(dark)
        }
    })
}

fn solid_image(color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(4, 4, Rgba(color))
}

fn model_from(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    name: &str,
    data: MeshData,
    img: RgbaImage,
) -> Result<Model> {
    let diffuse = Texture::from_image(device, queue, &img.into(), Some(name))?;
    let material = Material::new(device, name, diffuse, &diffuse_layout(device));
    let mesh = upload_mesh(device, name, data);
    Ok(Model {
        meshes: vec![mesh],
        materials: vec![material],
    })
}

pub fn ground_model(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Model> {
    model_from(
        device,
        queue,
        "ground",
        plane(),
        checkerboard_image([110, 140, 90, 255], [70, 95, 60, 255]),
    )
}

pub fn cube_model(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Model> {
    model_from(
        device,
        queue,
        "cube",
        cube(),
        checkerboard_image([200, 120, 60, 255], [150, 85, 40, 255]),
    )
}

pub fn ball_model(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Model> {
    model_from(
        device,
        queue,
        "ball",
        uv_sphere(SPHERE_STACKS, SPHERE_SLICES),
        solid_image([70, 110, 200, 255]),
    )
}

pub fn donut_model(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Model> {
    model_from(
        device,
        queue,
        "donut",
        torus(TORUS_SEGMENTS, TORUS_SIDES, TORUS_TUBE_RADIUS),
        solid_image([220, 170, 200, 255]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unit_geometry(data: &MeshData, max_radius: f32) {
        assert!(!data.vertices.is_empty());
        assert_eq!(data.indices.len() % 3, 0);
        let count = data.vertices.len() as u32;
        assert!(data.indices.iter().all(|&i| i < count));
        for v in &data.vertices {
            let r = (v.position[0].powi(2) + v.position[1].powi(2) + v.position[2].powi(2)).sqrt();
            assert!(r <= max_radius + 1e-4);
        }
    }

    #[test]
    fn primitives_stay_within_unit_bounds() {
        assert_unit_geometry(&plane(), 2.0_f32.sqrt());
        assert_unit_geometry(&cube(), 3.0_f32.sqrt());
        assert_unit_geometry(&uv_sphere(SPHERE_STACKS, SPHERE_SLICES), 1.0);
        assert_unit_geometry(
            &torus(TORUS_SEGMENTS, TORUS_SIDES, TORUS_TUBE_RADIUS),
            1.0 + TORUS_TUBE_RADIUS,
        );
    }

    #[test]
    fn sphere_normals_match_positions() {
        let sphere = uv_sphere(8, 8);
        for v in &sphere.vertices {
            assert_eq!(v.position, v.normal);
        }
    }

    #[test]
    fn torus_has_enough_points_for_a_hull() {
        let torus = torus(TORUS_SEGMENTS, TORUS_SIDES, TORUS_TUBE_RADIUS);
        assert!(torus.vertices.len() >= 4);
    }
}
