//! Array placements.
//!
//! A physical volume is placed through an [`ArrayPlacement`], which expands
//! to one or more item placements in the mother frame. Each item also maps to
//! an index vector used to fill the sub-addresses of its geometry ID.

use itertools::Itertools;
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::geom_id::GeomId;
use crate::placement::{Axis, Placement};

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn single_has_one_item() {
        let p = ArrayPlacement::single(Placement::from_translation(Vector3::new(1.0, 0.0, 0.0)));
        assert_eq!(p.number_of_items(), 1);
        assert_eq!(p.index_map(0).unwrap(), vec![0]);
        assert!(p.placement(1).is_err());
    }

    #[test]
    fn linear_steps_from_basic() {
        let p = ArrayPlacement::linear(
            Placement::from_translation(Vector3::new(1.0, 0.0, 0.0)),
            Vector3::new(1.0, 0.0, 0.0),
            3,
        )
        .unwrap();
        let xs: Vec<f64> = p
            .placements()
            .map(|item| item.unwrap().translation().x)
            .collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        assert_eq!(p.index_map(2).unwrap(), vec![2]);
        assert!(ArrayPlacement::linear(Placement::identity(), Vector3::x(), 0).is_err());
    }

    #[test]
    fn grid_is_row_major_with_column_row_index() {
        let p = ArrayPlacement::grid(Placement::identity(), GridPlane::XZ, 2.0, 3.0, 3, 2, false)
            .unwrap();
        assert_eq!(p.number_of_items(), 6);
        assert_eq!(p.index_map(4).unwrap(), vec![1, 1]);
        let t = p.placement(5).unwrap().translation();
        assert!((t - Vector3::new(4.0, 0.0, 3.0)).norm() < TOL);
        assert!(matches!(
            p.placement(6),
            Err(GeomError::InvalidItem { item: 6, count: 6 })
        ));
    }

    #[test]
    fn centred_grid_is_symmetric() {
        let p = ArrayPlacement::grid(Placement::identity(), GridPlane::XY, 1.0, 1.0, 3, 3, true)
            .unwrap();
        let sum: Vector3<f64> = p.placements().map(|item| item.unwrap().translation()).sum();
        assert!(sum.norm() < TOL);
        assert!(p.placement(4).unwrap().translation().norm() < TOL);
    }

    #[test]
    fn circular_items_lie_on_circle() {
        let p = ArrayPlacement::circular(
            Vector3::new(0.0, 0.0, 5.0),
            2.0,
            0.0,
            std::f64::consts::FRAC_PI_2,
            4,
            Axis::Z,
            true,
        )
        .unwrap();
        let second = p.placement(1).unwrap();
        assert!((second.translation() - Vector3::new(0.0, 2.0, 5.0)).norm() < TOL);
        let x = second.child_to_mother_direction(&Vector3::x());
        assert!((x - Vector3::y()).norm() < TOL);
        assert_eq!(p.index_map(3).unwrap(), vec![3]);
    }

    #[test]
    fn circular_angles_are_written_in_degrees() {
        let p: ArrayPlacement = toml::from_str(
            r#"
            kind = "circular"
            center = [0.0, 0.0, 0.0]
            radius = 1.0
            step_angle = 90.0
            count = 4
            axis = "z"
            "#,
        )
        .unwrap();
        let t = p.placement(1).unwrap().translation();
        assert!((t - Vector3::new(0.0, 1.0, 0.0)).norm() < TOL);

        let text = toml::to_string(&p).unwrap();
        let back: ArrayPlacement = toml::from_str(&text).unwrap();
        let value: toml::Value = toml::from_str(&text).unwrap();
        assert!((value["step_angle"].as_float().unwrap() - 90.0).abs() < TOL);
        assert!((back.placement(3).unwrap().translation() - Vector3::new(0.0, -1.0, 0.0)).norm() < TOL);
    }

    #[test]
    fn index_beyond_address_range_is_an_error() {
        let count = GeomId::ANY_ADDRESS as usize + 1;
        let p = ArrayPlacement::linear(Placement::identity(), Vector3::x(), count).unwrap();
        assert_eq!(
            p.index_map(count - 2).unwrap(),
            vec![GeomId::ANY_ADDRESS - 1]
        );
        assert!(matches!(
            p.index_map(count - 1),
            Err(GeomError::InvalidPlacement(_))
        ));
    }
}

/// Plane spanned by the columns and rows of a grid placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GridPlane {
    XY,
    XZ,
    YZ,
}

impl GridPlane {
    fn axes(self) -> (Vector3<f64>, Vector3<f64>) {
        match self {
            GridPlane::XY => (Vector3::x(), Vector3::y()),
            GridPlane::XZ => (Vector3::x(), Vector3::z()),
            GridPlane::YZ => (Vector3::y(), Vector3::z()),
        }
    }
}

/// A placement that may expand to several items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrayPlacement {
    /// One item at the given placement.
    Single { placement: Placement },
    /// `count` items, item `i` translated by `i * step` from `basic`.
    Linear {
        basic: Placement,
        step: [f64; 3],
        count: usize,
    },
    /// `columns * rows` items in a plane, item `i` at column `i % columns`
    /// and row `i / columns`.
    Grid {
        basic: Placement,
        plane: GridPlane,
        column_step: f64,
        row_step: f64,
        columns: usize,
        rows: usize,
        #[serde(default)]
        centered: bool,
    },
    /// `count` items on a circle around `axis`. Angles are held in radians
    /// and written in degrees, like placement orientations.
    Circular {
        center: [f64; 3],
        radius: f64,
        #[serde(default, with = "degrees")]
        start_angle: f64,
        #[serde(with = "degrees")]
        step_angle: f64,
        count: usize,
        axis: Axis,
        #[serde(default)]
        follow_rotation: bool,
    },
}

impl ArrayPlacement {
    pub fn single(placement: Placement) -> Self {
        ArrayPlacement::Single { placement }
    }

    pub fn linear(basic: Placement, step: Vector3<f64>, count: usize) -> Result<Self> {
        let p = ArrayPlacement::Linear {
            basic,
            step: step.into(),
            count,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn grid(
        basic: Placement,
        plane: GridPlane,
        column_step: f64,
        row_step: f64,
        columns: usize,
        rows: usize,
        centered: bool,
    ) -> Result<Self> {
        let p = ArrayPlacement::Grid {
            basic,
            plane,
            column_step,
            row_step,
            columns,
            rows,
            centered,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn circular(
        center: Vector3<f64>,
        radius: f64,
        start_angle: f64,
        step_angle: f64,
        count: usize,
        axis: Axis,
        follow_rotation: bool,
    ) -> Result<Self> {
        let p = ArrayPlacement::Circular {
            center: center.into(),
            radius,
            start_angle,
            step_angle,
            count,
            axis,
            follow_rotation,
        };
        p.validate()?;
        Ok(p)
    }

    /// Checks the parameters: at least one item, finite non-negative sizes.
    pub fn validate(&self) -> Result<()> {
        if self.number_of_items() == 0 {
            return Err(GeomError::InvalidPlacement(
                "an array placement needs at least one item".to_string(),
            ));
        }
        match self {
            ArrayPlacement::Single { placement } => check_rotation(placement),
            ArrayPlacement::Linear { basic, step, .. } => {
                if step.iter().any(|s| !s.is_finite()) {
                    return Err(GeomError::InvalidPlacement(format!(
                        "non finite replica step {:?}",
                        step
                    )));
                }
                check_rotation(basic)
            }
            ArrayPlacement::Grid {
                basic,
                column_step,
                row_step,
                ..
            } => {
                if !column_step.is_finite() || !row_step.is_finite() {
                    return Err(GeomError::InvalidPlacement(
                        "non finite grid step".to_string(),
                    ));
                }
                check_rotation(basic)
            }
            ArrayPlacement::Circular { radius, .. } => {
                if !radius.is_finite() || *radius < 0.0 {
                    return Err(GeomError::InvalidPlacement(format!(
                        "invalid circular radius {}",
                        radius
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn number_of_items(&self) -> usize {
        match self {
            ArrayPlacement::Single { .. } => 1,
            ArrayPlacement::Linear { count, .. } => *count,
            ArrayPlacement::Grid { columns, rows, .. } => columns * rows,
            ArrayPlacement::Circular { count, .. } => *count,
        }
    }

    pub fn is_replica(&self) -> bool {
        !matches!(self, ArrayPlacement::Single { .. })
    }

    fn check_item(&self, item: usize) -> Result<()> {
        let count = self.number_of_items();
        if item >= count {
            return Err(GeomError::InvalidItem { item, count });
        }
        Ok(())
    }

    /// Placement of item `item` in the mother frame.
    pub fn placement(&self, item: usize) -> Result<Placement> {
        self.check_item(item)?;
        let placement = match self {
            ArrayPlacement::Single { placement } => *placement,
            ArrayPlacement::Linear { basic, step, .. } => {
                let offset = Vector3::from(*step) * item as f64;
                Placement::new(basic.translation() + offset, *basic.rotation())
            }
            ArrayPlacement::Grid {
                basic,
                plane,
                column_step,
                row_step,
                columns,
                rows,
                centered,
            } => {
                let (u, v) = plane.axes();
                let (column, row) = (item % columns, item / columns);
                let mut a = column as f64 * column_step;
                let mut b = row as f64 * row_step;
                if *centered {
                    a -= (*columns - 1) as f64 * column_step / 2.0;
                    b -= (*rows - 1) as f64 * row_step / 2.0;
                }
                Placement::new(basic.translation() + u * a + v * b, *basic.rotation())
            }
            ArrayPlacement::Circular {
                center,
                radius,
                start_angle,
                step_angle,
                axis,
                follow_rotation,
                ..
            } => {
                let angle = start_angle + item as f64 * step_angle;
                let (u, v) = match axis {
                    Axis::X => (Vector3::y(), Vector3::z()),
                    Axis::Y => (Vector3::z(), Vector3::x()),
                    Axis::Z => (Vector3::x(), Vector3::y()),
                };
                let position =
                    Vector3::from(*center) + (u * angle.cos() + v * angle.sin()) * *radius;
                let rotation = if *follow_rotation {
                    Rotation3::from_axis_angle(&axis.unit(), angle)
                } else {
                    Rotation3::identity()
                };
                Placement::new(position, rotation)
            }
        };
        Ok(placement)
    }

    /// Index vector of item `item`: `[i]` for one-dimensional arrays,
    /// `[column, row]` for grids.
    pub fn index_map(&self, item: usize) -> Result<Vec<u32>> {
        self.check_item(item)?;
        let index = match self {
            ArrayPlacement::Grid { columns, .. } => {
                vec![to_address(item % columns)?, to_address(item / columns)?]
            }
            _ => vec![to_address(item)?],
        };
        Ok(index)
    }

    /// Iterates over every item placement in order.
    pub fn placements(&self) -> impl Iterator<Item = Result<Placement>> + '_ {
        (0..self.number_of_items()).map(move |item| self.placement(item))
    }

    /// Short description used in diagnostics, e.g. `grid[3x2]`.
    pub fn describe(&self) -> String {
        match self {
            ArrayPlacement::Single { .. } => "single".to_string(),
            ArrayPlacement::Linear { count, step, .. } => {
                format!("linear[{}] step ({})", count, step.iter().join(", "))
            }
            ArrayPlacement::Grid {
                columns,
                rows,
                plane,
                ..
            } => format!("grid[{}x{}] {:?}", columns, rows, plane),
            ArrayPlacement::Circular { count, axis, .. } => {
                format!("circular[{}] around {:?}", count, axis)
            }
        }
    }
}

impl From<Placement> for ArrayPlacement {
    fn from(placement: Placement) -> Self {
        ArrayPlacement::single(placement)
    }
}

fn check_rotation(placement: &Placement) -> Result<()> {
    if placement.is_orthonormal() {
        Ok(())
    } else {
        Err(GeomError::InvalidPlacement(format!(
            "rotation of {} is not orthonormal",
            placement
        )))
    }
}

mod degrees {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(radians: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(radians.to_degrees())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer).map(f64::to_radians)
    }
}

/// Item indices must stay below the wildcard and invalid sentinels.
fn to_address(index: usize) -> Result<u32> {
    u32::try_from(index)
        .ok()
        .filter(|address| *address < GeomId::ANY_ADDRESS)
        .ok_or_else(|| {
            GeomError::InvalidPlacement(format!(
                "item index {} does not fit in a geometry ID address",
                index
            ))
        })
}
