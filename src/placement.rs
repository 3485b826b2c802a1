//! Rigid placements and their composition.
//!
//! A [`Placement`] positions a child frame inside a mother frame: a point
//! `p` expressed in the child frame sits at `R * p + t` in the mother frame.
//! Composition is pure and never mutates its operands.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};

/// Tolerance used when checking that a rotation matrix is orthonormal.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;
/// Below this value of `sin(theta)` the ZYZ decomposition is degenerate.
const GIMBAL_EPSILON: f64 = 1e-12;


/// Principal axis used by single-axis rotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Unit<Vector3<f64>> {
        match self {
            Axis::X => Vector3::x_axis(),
            Axis::Y => Vector3::y_axis(),
            Axis::Z => Vector3::z_axis(),
        }
    }
}

/// A rigid transform: a translation and an orthonormal rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "PlacementRecord", from = "PlacementRecord")]
pub struct Placement {
    translation: Vector3<f64>,
    rotation: Rotation3<f64>,
}

impl Placement {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Rotation3::identity(),
        }
    }

    pub fn new(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(translation, Rotation3::identity())
    }

    /// Builds a placement from ZYZ Euler angles in radians:
    /// `R = Rz(phi) * Ry(theta) * Rz(delta)`.
    pub fn from_zyz(translation: Vector3<f64>, phi: f64, theta: f64, delta: f64) -> Self {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), phi)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), theta)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), delta);
        Self::new(translation, rotation)
    }

    /// Builds a placement rotated by `angle` radians around a principal axis.
    pub fn from_axis_angle(translation: Vector3<f64>, axis: Axis, angle: f64) -> Self {
        Self::new(translation, Rotation3::from_axis_angle(&axis.unit(), angle))
    }

    /// Builds a placement from a raw 3x3 matrix, which must be a proper
    /// rotation within [`ORTHONORMAL_TOLERANCE`].
    pub fn from_matrix(translation: Vector3<f64>, matrix: Matrix3<f64>) -> Result<Self> {
        let drift = (matrix.transpose() * matrix - Matrix3::identity()).norm();
        if drift > ORTHONORMAL_TOLERANCE {
            return Err(GeomError::InvalidPlacement(format!(
                "rotation matrix is not orthonormal (drift {:e})",
                drift
            )));
        }
        if matrix.determinant() < 0.0 {
            return Err(GeomError::InvalidPlacement(
                "rotation matrix is a reflection".to_string(),
            ));
        }
        let mut rotation = Rotation3::from_matrix_unchecked(matrix);
        rotation.renormalize();
        Ok(Self::new(translation, rotation))
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    /// True when the rotation is orthonormal within [`ORTHONORMAL_TOLERANCE`].
    pub fn is_orthonormal(&self) -> bool {
        let m = self.rotation.matrix();
        (m.transpose() * m - Matrix3::identity()).norm() <= ORTHONORMAL_TOLERANCE
    }

    /// Expresses a child placement, given in this frame, in the mother frame.
    ///
    /// `t = R * t_child + t`, `R = R * R_child`.
    pub fn child_to_mother(&self, child: &Placement) -> Placement {
        Placement {
            translation: self.rotation * child.translation + self.translation,
            rotation: self.rotation * child.rotation,
        }
    }

    /// Expresses a placement given in the mother frame in this (child) frame.
    pub fn mother_to_child(&self, mother: &Placement) -> Placement {
        self.relocate(mother)
    }

    /// Expresses another placement, known in the same reference frame as
    /// `self`, relative to `self`.
    pub fn relocate(&self, other: &Placement) -> Placement {
        let inverse = self.rotation.inverse();
        Placement {
            translation: inverse * (other.translation - self.translation),
            rotation: inverse * other.rotation,
        }
    }

    pub fn inverse(&self) -> Placement {
        let inverse = self.rotation.inverse();
        Placement {
            translation: -(inverse * self.translation),
            rotation: inverse,
        }
    }

    pub fn child_to_mother_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.rotation * local + self.translation
    }

    pub fn mother_to_child_point(&self, world: &Point3<f64>) -> Point3<f64> {
        self.rotation.inverse() * (world - self.translation)
    }

    pub fn child_to_mother_direction(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    pub fn mother_to_child_direction(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Decomposes the rotation into ZYZ Euler angles `(phi, theta, delta)` in
    /// radians, with `theta` in `[0, pi]`. In the degenerate case the whole
    /// angle is carried by `phi`.
    pub fn zyz_angles(&self) -> (f64, f64, f64) {
        let m = self.rotation.matrix();
        let theta = m[(2, 2)].clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        if sin_theta.abs() > GIMBAL_EPSILON {
            let phi = m[(1, 2)].atan2(m[(0, 2)]);
            let delta = m[(2, 1)].atan2(-m[(2, 0)]);
            (phi, theta, delta)
        } else if m[(2, 2)] > 0.0 {
            (m[(1, 0)].atan2(m[(0, 0)]), 0.0, 0.0)
        } else {
            ((-m[(1, 0)]).atan2(-m[(0, 0)]), PI, 0.0)
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (phi, theta, delta) = self.zyz_angles();
        write!(
            f,
            "{} {} {} @ {} {} {} (deg)",
            self.translation.x,
            self.translation.y,
            self.translation.z,
            phi.to_degrees(),
            theta.to_degrees(),
            delta.to_degrees()
        )
    }
}

/// Orientation part of a serialized placement. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Identity,
    Zyz {
        phi: f64,
        theta: f64,
        delta: f64,
    },
    Axis {
        axis: Axis,
        angle: f64,
    },
}

/// Serialized form of a [`Placement`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default)]
    pub rotation: Orientation,
}

impl From<Placement> for PlacementRecord {
    fn from(p: Placement) -> Self {
        let (phi, theta, delta) = p.zyz_angles();
        Self {
            translation: [p.translation.x, p.translation.y, p.translation.z],
            rotation: Orientation::Zyz {
                phi: phi.to_degrees(),
                theta: theta.to_degrees(),
                delta: delta.to_degrees(),
            },
        }
    }
}

impl From<PlacementRecord> for Placement {
    fn from(record: PlacementRecord) -> Self {
        let translation = Vector3::from(record.translation);
        match record.rotation {
            Orientation::Identity => Placement::from_translation(translation),
            Orientation::Zyz { phi, theta, delta } => Placement::from_zyz(
                translation,
                phi.to_radians(),
                theta.to_radians(),
                delta.to_radians(),
            ),
            Orientation::Axis { axis, angle } => {
                Placement::from_axis_angle(translation, axis, angle.to_radians())
            }
        }
    }
}
