// THEORY:
// The `homography` module is the numerical heart of the projection warp. Given the
// four corners of an axis-aligned source rectangle and the four corners of a
// destination quad on screen, it solves the 3x3 projective transform that carries
// one onto the other exactly.
//
// With exactly four correspondences the homography (fixed at h22 = 1) has eight
// unknowns and each correspondence supplies two equations, so the solve is a plain
// 8x8 linear system rather than a least-squares fit. The result is a true
// perspective warp: straight lines stay straight but spacing foreshortens, which
// is what a tilted projection surface needs and what a bilinear quad blend cannot
// reproduce.
//
// Quads are handled in ring order: top-left, top-right, bottom-right, bottom-left.
// In screen coordinates (y pointing down) a well-formed quad walks clockwise on
// screen, which is a positive signed area under the shoelace formula. Crossed,
// collinear, concave and mirrored quads are all rejected before solving, so the
// solve never has to cope with a singular system in practice; it still checks.

use nalgebra::{Matrix3, Matrix4, Point2, SMatrix, SVector, Vector3};
use thiserror::Error;

/// Smallest edge cross product (in squared pixels) a quad corner may have before
/// the quad counts as degenerate.
pub const MIN_CORNER_CROSS: f64 = 1e-6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HomographyError {
    #[error("quad has a non-finite coordinate")]
    NonFinite,
    #[error("quad is degenerate (collinear, crossed or concave) at corner {0}")]
    Degenerate(usize),
    #[error("homography system is singular")]
    Singular,
}

/// Signed area of a quad given in ring order, positive for a clockwise-on-screen walk.
pub fn signed_area(quad: &[Point2<f64>; 4]) -> f64 {
    let mut twice_area = 0.0;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        twice_area += a.x * b.y - b.x * a.y;
    }
    twice_area * 0.5
}

/// Checks that a ring-ordered quad is finite, strictly convex and positively oriented.
pub fn validate_quad(quad: &[Point2<f64>; 4]) -> Result<(), HomographyError> {
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(HomographyError::NonFinite);
    }
    for i in 0..4 {
        let prev = quad[(i + 3) % 4];
        let here = quad[i];
        let next = quad[(i + 1) % 4];
        let incoming = here - prev;
        let outgoing = next - here;
        let cross = incoming.x * outgoing.y - incoming.y * outgoing.x;
        if cross <= MIN_CORNER_CROSS {
            return Err(HomographyError::Degenerate(i));
        }
    }
    Ok(())
}

/// Solves H such that `project(H, src[i]) == dst[i]` for all four ring-ordered corners.
pub fn quad_to_quad(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<Matrix3<f64>, HomographyError> {
    validate_quad(src)?;
    validate_quad(dst)?;

    // Rows 2i and 2i+1 encode u = (h0 x + h1 y + h2) / (h6 x + h7 y + 1) and the
    // matching v equation, multiplied through by the denominator.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);

        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -x * u;
        a[(r, 7)] = -y * u;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -x * v;
        a[(r + 1, 7)] = -y * v;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b).ok_or(HomographyError::Singular)?;
    let m = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    if m.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::Singular);
    }
    Ok(m)
}

/// Projects a point through a homography. `None` when the point maps to infinity.
pub fn project(h: &Matrix3<f64>, p: Point2<f64>) -> Option<Point2<f64>> {
    let q = h * Vector3::new(p.x, p.y, 1.0);
    if q.z.abs() < 1e-12 {
        return None;
    }
    Some(Point2::new(q.x / q.z, q.y / q.z))
}

/// Embeds a 2D homography into the 4x4 matrix a 3D pipeline applies to
/// `(x, y, z, 1)`: z passes through untouched and the perspective row keeps the
/// projective divide. nalgebra stores it column-major, so `as_slice()` is the
/// layout a GL-style `multMatrix` expects.
pub fn to_gl_matrix(h: &Matrix3<f64>) -> Matrix4<f64> {
    Matrix4::new(
        h[(0, 0)], h[(0, 1)], 0.0, h[(0, 2)],
        h[(1, 0)], h[(1, 1)], 0.0, h[(1, 2)],
        0.0, 0.0, 1.0, 0.0,
        h[(2, 0)], h[(2, 1)], 0.0, h[(2, 2)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn square(size: f64) -> [Point2<f64>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ]
    }

    #[test]
    fn square_onto_itself_is_identity() {
        let h = quad_to_quad(&square(100.0), &square(100.0)).unwrap();
        assert_relative_eq!(h, Matrix3::identity(), epsilon = 1e-9);
        let centre = project(&h, Point2::new(50.0, 50.0)).unwrap();
        assert_relative_eq!(centre.x, 50.0, epsilon = 1e-9);
        assert_relative_eq!(centre.y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn trapezoid_corners_map_exactly() {
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(274.0, 0.0),
            Point2::new(274.0, 152.0),
            Point2::new(0.0, 152.0),
        ];
        let dst = [
            Point2::new(420.0, 200.0),
            Point2::new(860.0, 215.0),
            Point2::new(1010.0, 620.0),
            Point2::new(300.0, 590.0),
        ];
        let h = quad_to_quad(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = project(&h, *s).unwrap();
            assert_relative_eq!(p.x, d.x, epsilon = 1e-6);
            assert_relative_eq!(p.y, d.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn trapezoid_warp_is_projective_not_bilinear() {
        // Narrow (far) top edge: the source centre lands on the diagonals'
        // intersection, well above the bilinear midpoint at y = 50.
        let src = square(100.0);
        let dst = [
            Point2::new(40.0, 0.0),
            Point2::new(60.0, 0.0),
            Point2::new(100.0, 100.0),
            Point2::new(0.0, 100.0),
        ];
        let h = quad_to_quad(&src, &dst).unwrap();
        let centre = project(&h, Point2::new(50.0, 50.0)).unwrap();
        assert_relative_eq!(centre.x, 50.0, epsilon = 1e-9);
        assert_relative_eq!(centre.y, 100.0 / 6.0, epsilon = 1e-9);
    }

    #[test]
    fn collinear_corners_are_rejected() {
        let mut dst = square(100.0);
        dst[1] = Point2::new(0.0, 50.0);
        dst[2] = Point2::new(0.0, 100.0);
        assert!(matches!(quad_to_quad(&square(100.0), &dst), Err(HomographyError::Degenerate(_))));
    }

    #[test]
    fn crossed_quad_is_rejected() {
        let mut dst = square(100.0);
        dst.swap(2, 3);
        assert!(validate_quad(&dst).is_err());
    }

    #[test]
    fn mirrored_quad_has_negative_area_and_is_rejected() {
        let mut dst = square(100.0);
        dst.swap(1, 3);
        assert!(signed_area(&dst) < 0.0);
        assert!(validate_quad(&dst).is_err());
    }

    #[test]
    fn non_finite_corner_is_rejected() {
        let mut dst = square(100.0);
        dst[0] = Point2::new(f64::NAN, 0.0);
        assert_eq!(validate_quad(&dst), Err(HomographyError::NonFinite));
    }

    #[test]
    fn gl_matrix_agrees_with_2d_projection() {
        let dst = [
            Point2::new(10.0, 20.0),
            Point2::new(120.0, 5.0),
            Point2::new(130.0, 140.0),
            Point2::new(0.0, 110.0),
        ];
        let h = quad_to_quad(&square(100.0), &dst).unwrap();
        let gl = to_gl_matrix(&h);
        let p = gl * Vector4::new(30.0, 70.0, 0.0, 1.0);
        let expected = project(&h, Point2::new(30.0, 70.0)).unwrap();
        assert_relative_eq!(p.x / p.w, expected.x, epsilon = 1e-9);
        assert_relative_eq!(p.y / p.w, expected.y, epsilon = 1e-9);
    }
}
