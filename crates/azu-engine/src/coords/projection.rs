/// Column-major 4x4 matrix, laid out exactly as the vertex shader's `mat4x4<f32>`.
pub type Mat4 = [[f32; 4]; 4];

/// Orthographic projection from logical pixels (top-left origin, +Y down) to
/// Vulkan clip space (+Y down, depth 0).
///
/// Degenerate sizes are clamped to one pixel so the matrix stays finite while a
/// window is being minimized.
pub fn ortho(width: f32, height: f32) -> Mat4 {
    let w = width.max(1.0);
    let h = height.max(1.0);

    [
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, 2.0 / h, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-1.0, -1.0, 0.0, 1.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &Mat4, x: f32, y: f32) -> (f32, f32) {
        (
            m[0][0] * x + m[1][0] * y + m[3][0],
            m[0][1] * x + m[1][1] * y + m[3][1],
        )
    }

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-5 && (a.1 - b.1).abs() < 1e-5
    }

    #[test]
    fn maps_window_corners_to_clip_corners() {
        let m = ortho(800.0, 600.0);
        assert!(close(apply(&m, 0.0, 0.0), (-1.0, -1.0)));
        assert!(close(apply(&m, 800.0, 600.0), (1.0, 1.0)));
        assert!(close(apply(&m, 400.0, 300.0), (0.0, 0.0)));
    }

    #[test]
    fn zero_size_stays_finite() {
        let m = ortho(0.0, 0.0);
        assert!(m.iter().flatten().all(|v| v.is_finite()));
    }
}
