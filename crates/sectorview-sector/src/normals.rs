use glam::Vec3;

/// Smooth per-vertex normals from indexed triangles.
///
/// Face normals are accumulated unnormalised, so larger faces weigh more,
/// then each vertex sum is normalised. Triangles referencing missing
/// vertices are skipped; vertices touched by no triangle get a zero normal.
pub fn compute_vertex_normals(indices: &[u32], vertices: &[f32]) -> Vec<f32> {
    let vertex_count = vertices.len() / 3;
    let positions: &[[f32; 3]] = bytemuck::cast_slice(&vertices[..vertex_count * 3]);
    let mut accumulated = vec![Vec3::ZERO; vertex_count];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        if a >= vertex_count || b >= vertex_count || c >= vertex_count {
            continue;
        }
        let pa = Vec3::from_array(positions[a]);
        let pb = Vec3::from_array(positions[b]);
        let pc = Vec3::from_array(positions[c]);
        let face = (pb - pa).cross(pc - pa);
        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[c] += face;
    }

    accumulated
        .into_iter()
        .flat_map(|n| n.normalize_or_zero().to_array())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_quad_faces_up() {
        // Two CCW triangles in the XY plane.
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let indices = [0, 1, 2, 0, 2, 3];
        let normals = compute_vertex_normals(&indices, &vertices);
        assert_eq!(normals.len(), 12);
        for n in normals.chunks_exact(3) {
            assert_eq!(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_shared_edge_is_averaged() {
        // Two faces folded 90 degrees along the x axis.
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let indices = [0, 1, 2, 0, 3, 1];
        let normals = compute_vertex_normals(&indices, &vertices);
        let shared = Vec3::new(normals[0], normals[1], normals[2]);
        assert!((shared.length() - 1.0).abs() < 1e-6);
        assert!(shared.y > 0.0 && (shared.y - shared.z).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_triangle_skipped() {
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let normals = compute_vertex_normals(&[0, 1, 7], &vertices);
        assert!(normals.iter().all(|&v| v == 0.0));
    }
}
