//! Planar homography between the image plane and the ground plane.

use lanewatch_models::Point;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::error::{AnalysisError, AnalysisResult};

/// Smallest homogeneous scale accepted when projecting a point.
const MIN_W: f64 = 1e-12;

/// A 3x3 projective transform, normalized so that `h[2][2] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Transform that leaves every point unchanged.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Wrap an existing matrix.
    pub fn from_matrix(matrix: Matrix3<f64>) -> AnalysisResult<Self> {
        if !matrix.iter().all(|v| v.is_finite()) || matrix.determinant().abs() < f64::EPSILON {
            return Err(AnalysisError::SingularHomography(
                "matrix is not invertible".to_string(),
            ));
        }
        Ok(Self { matrix })
    }

    /// Solve the perspective transform mapping the four `src` corners onto
    /// the four `dst` corners.
    ///
    /// Fails when three or more of the points are collinear.
    pub fn from_quad(src: [Point; 4], dst: [Point; 4]) -> AnalysisResult<Self> {
        if has_collinear_triple(&src) || has_collinear_triple(&dst) {
            return Err(AnalysisError::SingularHomography(
                "three quad corners are collinear".to_string(),
            ));
        }

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
            let r = 2 * i;
            a.row_mut(r).copy_from_slice(&[s.x, s.y, 1.0, 0.0, 0.0, 0.0, -d.x * s.x, -d.x * s.y]);
            a.row_mut(r + 1).copy_from_slice(&[0.0, 0.0, 0.0, s.x, s.y, 1.0, -d.y * s.x, -d.y * s.y]);
            b[r] = d.x;
            b[r + 1] = d.y;
        }

        let h = a.lu().solve(&b).ok_or_else(|| {
            AnalysisError::SingularHomography("source or destination quad is degenerate".to_string())
        })?;

        let matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        Self::from_matrix(matrix)
    }

    /// Project a point through the transform.
    ///
    /// Returns `None` for points on the horizon line or non-finite results.
    pub fn project(&self, point: &Point) -> Option<Point> {
        let v = self.matrix * Vector3::new(point.x, point.y, 1.0);
        if v.z.abs() < MIN_W {
            return None;
        }

        let projected = Point::new(v.x / v.z, v.y / v.z);
        projected.is_finite().then_some(projected)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }
}

fn has_collinear_triple(quad: &[Point; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];

    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (quad[i], quad[j], quad[k]);
        let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        cross.abs() < 1e-9
    })
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}
