#![allow(dead_code, clippy::unwrap_used)]

use sheetfold::mesh::Mesh;

/// Installs a WARN-level subscriber once; `RUST_LOG` overrides it.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

/// Flat `width` × `height` rectangle in the XY plane split into
/// `nx` × `ny` quads.
pub fn rectangle_mesh(width: f64, height: f64, nx: usize, ny: usize) -> Mesh {
    let mut vertices = Vec::new();
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push([
                width * i as f64 / nx as f64,
                height * j as f64 / ny as f64,
                0.0,
            ]);
        }
    }
    let idx = |i: usize, j: usize| j * (nx + 1) + i;
    let mut faces = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            faces.push(vec![idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }
    Mesh::from_arrays(&vertices, &faces).unwrap()
}

/// Open strip of a cylinder around the z axis, normals pointing outward.
pub fn cylinder_strip(radius: f64, sweep: f64, segments: usize, height: f64) -> Mesh {
    let mut vertices = Vec::new();
    for z in [0.0, height] {
        for i in 0..=segments {
            let t = sweep * i as f64 / segments as f64;
            vertices.push([radius * t.cos(), radius * t.sin(), z]);
        }
    }
    let top = segments + 1;
    let faces: Vec<Vec<usize>> = (0..segments)
        .map(|i| vec![i, i + 1, top + i + 1, top + i])
        .collect();
    Mesh::from_arrays(&vertices, &faces).unwrap()
}

/// Sum of the chord lengths of a cylinder strip's cross-section.
pub fn strip_width(radius: f64, sweep: f64, segments: usize) -> f64 {
    let step = sweep / segments as f64;
    segments as f64 * 2.0 * radius * (step / 2.0).sin()
}
