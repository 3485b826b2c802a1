//! The geometry info dictionary produced by a mapping build.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::sync::Arc;

use nalgebra::Point3;

use crate::error::{GeomError, Result};
use crate::geom_id::GeomId;
use crate::placement::Placement;
use crate::volume::LogicalVolume;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use nalgebra::Vector3;

    fn cube(name: &str) -> Arc<LogicalVolume> {
        LogicalVolume::new(
            name,
            Shape::Box {
                x: 1.0,
                y: 1.0,
                z: 1.0,
            },
        )
        .into_shared()
    }

    fn info(gid: GeomId, x: f64, logical: &Arc<LogicalVolume>) -> GeomInfo {
        GeomInfo::new(
            gid,
            Placement::from_translation(Vector3::new(x, 0.0, 0.0)),
            Arc::clone(logical),
        )
    }

    #[test]
    fn insert_or_fail() {
        let lv = cube("cube.log");
        let mut map = GeomMap::new();
        map.insert(info(GeomId::new(1, &[0]), 0.0, &lv)).unwrap();
        let err = map.insert(info(GeomId::new(1, &[0]), 5.0, &lv)).unwrap_err();
        assert!(matches!(err, GeomError::DuplicateGid { .. }));
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup(&GeomId::new(1, &[0])).unwrap().world_placement().translation().x, 0.0);

        let old = map.replace(info(GeomId::new(1, &[0]), 5.0, &lv));
        assert!(old.is_some());
        assert_eq!(map.get(&GeomId::new(1, &[0])).unwrap().world_placement().translation().x, 5.0);
    }

    #[test]
    fn queries() {
        let lv = cube("cube.log");
        let mut map = GeomMap::new();
        for i in 0..3 {
            map.insert(info(GeomId::new(2, &[1, i]), i as f64 * 2.0, &lv)).unwrap();
        }
        map.insert(info(GeomId::new(3, &[0]), 10.0, &lv)).unwrap();

        assert_eq!(map.infos_with_type(2).count(), 3);
        assert!(matches!(
            map.lookup(&GeomId::new(9, &[0])),
            Err(GeomError::NotFound { .. })
        ));

        let mut pattern = GeomId::new(2, &[1, 0]);
        pattern.set_any(1);
        assert_eq!(map.matching(&pattern).count(), 3);

        let hits = map.locate(&Point3::new(2.2, 0.1, 0.0), None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].gid(), &GeomId::new(2, &[1, 1]));
        assert!(map.locate(&Point3::new(10.0, 0.0, 0.0), Some(2)).is_empty());
        assert_eq!(map.locate(&Point3::new(10.0, 0.0, 0.0), Some(3)).len(), 1);
    }

    #[test]
    fn merge_rejects_overlap() {
        let lv = cube("cube.log");
        let mut a = GeomMap::new();
        a.insert(info(GeomId::new(1, &[0]), 0.0, &lv)).unwrap();
        let mut b = GeomMap::new();
        b.insert(info(GeomId::new(1, &[1]), 1.0, &lv)).unwrap();
        a.merge(b.clone()).unwrap();
        assert_eq!(a.len(), 2);
        assert!(a.merge(b).is_err());
    }
}

/// One dictionary entry: an identifier, the world placement of the volume it
/// identifies and that volume's logical definition.
#[derive(Debug, Clone)]
pub struct GeomInfo {
    gid: GeomId,
    world_placement: Placement,
    logical: Arc<LogicalVolume>,
}

impl GeomInfo {
    pub fn new(gid: GeomId, world_placement: Placement, logical: Arc<LogicalVolume>) -> Self {
        Self {
            gid,
            world_placement,
            logical,
        }
    }

    pub fn gid(&self) -> &GeomId {
        &self.gid
    }

    pub fn world_placement(&self) -> &Placement {
        &self.world_placement
    }

    pub fn logical(&self) -> &Arc<LogicalVolume> {
        &self.logical
    }

    /// True when the world point lies inside this entry's shape.
    pub fn contains(&self, world: &Point3<f64>) -> bool {
        let local = self.world_placement.mother_to_child_point(world);
        self.logical.shape().contains(&local)
    }
}

/// Entries are equal when they refer to the same logical volume instance.
impl PartialEq for GeomInfo {
    fn eq(&self, other: &Self) -> bool {
        self.gid == other.gid
            && self.world_placement == other.world_placement
            && Arc::ptr_eq(&self.logical, &other.logical)
    }
}

impl fmt::Display for GeomInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' @ {}",
            self.gid,
            self.logical.name(),
            self.world_placement
        )
    }
}

/// Dictionary of [`GeomInfo`] keyed and ordered by identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomMap {
    entries: BTreeMap<GeomId, GeomInfo>,
}

impl GeomMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, failing when its identifier is already mapped.
    pub fn insert(&mut self, info: GeomInfo) -> Result<()> {
        match self.entries.entry(info.gid.clone()) {
            btree_map::Entry::Occupied(existing) => Err(GeomError::DuplicateGid {
                gid: info.gid,
                existing: existing.get().logical.name().to_string(),
                rejected: info.logical.name().to_string(),
            }),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(info);
                Ok(())
            }
        }
    }

    /// Inserts an entry, returning the one it replaces.
    pub fn replace(&mut self, info: GeomInfo) -> Option<GeomInfo> {
        self.entries.insert(info.gid.clone(), info)
    }

    /// Moves every entry of `other` into `self` with [`GeomMap::insert`].
    pub fn merge(&mut self, other: GeomMap) -> Result<()> {
        for (_, info) in other.entries {
            self.insert(info)?;
        }
        Ok(())
    }

    pub fn lookup(&self, gid: &GeomId) -> Result<&GeomInfo> {
        self.entries
            .get(gid)
            .ok_or_else(|| GeomError::not_found("geometry ID", gid.to_string()))
    }

    pub fn get(&self, gid: &GeomId) -> Option<&GeomInfo> {
        self.entries.get(gid)
    }

    pub fn contains(&self, gid: &GeomId) -> bool {
        self.entries.contains_key(gid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &GeomInfo> {
        self.entries.values()
    }

    pub fn gids(&self) -> impl Iterator<Item = &GeomId> {
        self.entries.keys()
    }

    /// Entries of one category type.
    pub fn infos_with_type(&self, type_id: u32) -> impl Iterator<Item = &GeomInfo> {
        let from = GeomId::new(type_id, &[]);
        self.entries
            .range(from..)
            .take_while(move |(gid, _)| gid.type_id() == type_id)
            .map(|(_, info)| info)
    }

    /// Entries whose identifier matches a wildcard pattern.
    pub fn matching<'a>(&'a self, pattern: &'a GeomId) -> impl Iterator<Item = &'a GeomInfo> + 'a {
        self.infos_with_type(pattern.type_id())
            .filter(move |info| pattern.matches(&info.gid))
    }

    /// Entries whose shape contains a world point, optionally restricted to
    /// one category type.
    pub fn locate(&self, world: &Point3<f64>, type_id: Option<u32>) -> Vec<&GeomInfo> {
        let candidates: Box<dyn Iterator<Item = &GeomInfo> + '_> = match type_id {
            Some(t) => Box::new(self.infos_with_type(t)),
            None => Box::new(self.iter()),
        };
        candidates.filter(|info| info.contains(world)).collect()
    }
}

impl<'a> IntoIterator for &'a GeomMap {
    type Item = (&'a GeomId, &'a GeomInfo);
    type IntoIter = btree_map::Iter<'a, GeomId, GeomInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for GeomMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Geometry map")?;
        write!(f, "`-- Entries: [{}]", self.entries.len())?;
        let last = self.entries.len().saturating_sub(1);
        for (i, info) in self.entries.values().enumerate() {
            let tag = if i == last { "`--" } else { "|--" };
            write!(f, "\n    {} {}", tag, info)?;
        }
        Ok(())
    }
}
