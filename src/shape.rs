//! Solid shapes attached to logical volumes.
//!
//! Only what the mapping consumers need is provided here: a name, an
//! axis-aligned bounding box in the volume's own frame, and an inside test
//! used by reverse position queries.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_bounds_are_centred() {
        let shape = Shape::Box {
            x: 2.0,
            y: 4.0,
            z: 6.0,
        };
        let bb = shape.bounding_box();
        assert_eq!(bb.min, Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(bb.max, Point3::new(1.0, 2.0, 3.0));
        assert!(shape.contains(&Point3::new(0.9, -1.9, 2.9)));
        assert!(!shape.contains(&Point3::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn tube_excludes_its_bore() {
        let tube = Shape::Tube {
            inner_radius: 1.0,
            outer_radius: 2.0,
            z: 4.0,
        };
        assert!(!tube.contains(&Point3::origin()));
        assert!(tube.contains(&Point3::new(1.5, 0.0, 1.0)));
        assert!(!tube.contains(&Point3::new(1.5, 0.0, 2.5)));
        assert_eq!(tube.bounding_box().max, Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn aabb_overlap() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0));
        let c = Aabb::new(Point3::new(1.5, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }
}

/// A solid, centred on the origin of its logical volume. Dimensions are full
/// lengths along z and radii in the transverse plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Box {
        x: f64,
        y: f64,
        z: f64,
    },
    Cylinder {
        radius: f64,
        z: f64,
    },
    Tube {
        inner_radius: f64,
        outer_radius: f64,
        z: f64,
    },
    Sphere {
        radius: f64,
    },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Box { .. } => "box",
            Shape::Cylinder { .. } => "cylinder",
            Shape::Tube { .. } => "tube",
            Shape::Sphere { .. } => "sphere",
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        let (hx, hy, hz) = match *self {
            Shape::Box { x, y, z } => (x / 2.0, y / 2.0, z / 2.0),
            Shape::Cylinder { radius, z } => (radius, radius, z / 2.0),
            Shape::Tube {
                outer_radius, z, ..
            } => (outer_radius, outer_radius, z / 2.0),
            Shape::Sphere { radius } => (radius, radius, radius),
        };
        Aabb::new(Point3::new(-hx, -hy, -hz), Point3::new(hx, hy, hz))
    }

    /// Inside test for a point expressed in the shape's own frame; the
    /// surface counts as inside.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let rho = (p.x * p.x + p.y * p.y).sqrt();
        match *self {
            Shape::Box { .. } => self.bounding_box().contains(p),
            Shape::Cylinder { radius, z } => rho <= radius && p.z.abs() <= z / 2.0,
            Shape::Tube {
                inner_radius,
                outer_radius,
                z,
            } => rho >= inner_radius && rho <= outer_radius && p.z.abs() <= z / 2.0,
            Shape::Sphere { radius } => p.coords.norm() <= radius,
        }
    }
}
