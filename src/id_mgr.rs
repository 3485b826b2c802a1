//! Category schema and geometry ID composition.
//!
//! Each category has a unique name, a unique type and an ordered list of
//! address labels. A category may be declared from scratch, by inheriting
//! another category's addresses, or by extending another category with extra
//! addresses. Inheriting and extending both record the parent as an ancestor;
//! a daughter whose category has the mother's category among its ancestors
//! imports the mother's addresses when its ID is composed.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::geom_id::GeomId;
use crate::id_rule::IdInfo;

/// Name of the category every mapping is rooted at.
pub const WORLD_CATEGORY: &str = "world";

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        [[category]]
        name = "world"
        type = 0
        addresses = ["world"]

        [[category]]
        name = "module"
        type = 100
        addresses = ["module"]

        [[category]]
        name = "column"
        type = 110
        extends = "module"
        by = ["column"]

        [[category]]
        name = "frame"
        type = 120
        inherits = "module"

        [[category]]
        name = "cell"
        type = 130
        extends = "column"
        by = ["row", "side"]
    "#;

    fn manager() -> IdManager {
        IdManager::from_toml_str(SCHEMA).unwrap()
    }

    #[test]
    fn loads_inherits_and_extends() {
        let mgr = manager();
        assert_eq!(mgr.len(), 5);
        let cell = mgr.category_info("cell").unwrap();
        assert_eq!(cell.addresses(), ["module", "column", "row", "side"]);
        assert_eq!(cell.ancestors(), ["module", "column"]);
        assert_eq!(cell.extends(), Some("column"));
        assert_eq!(cell.by(), ["row", "side"]);

        let frame = mgr.category_info_by_type(120).unwrap();
        assert_eq!(frame.addresses(), ["module"]);
        assert!(frame.has_ancestor("module"));
        assert_eq!(mgr.category_type("column").unwrap(), 110);
    }

    #[test]
    fn rejects_inconsistent_schemas() {
        let mut mgr = manager();
        let dup_name = CategoryDecl::with_addresses("module", 999, &["x"]);
        assert!(matches!(mgr.add_category(dup_name), Err(GeomError::Schema(_))));
        let dup_type = CategoryDecl::with_addresses("other", 100, &["x"]);
        assert!(matches!(mgr.add_category(dup_type), Err(GeomError::Schema(_))));
        let unknown_parent = CategoryDecl {
            extends: Some("missing".to_string()),
            by: vec!["x".to_string()],
            ..CategoryDecl::with_addresses("other", 5, &[])
        };
        assert!(mgr.add_category(unknown_parent).is_err());
        let no_address = CategoryDecl::with_addresses("empty", 6, &[]);
        assert!(mgr.add_category(no_address).is_err());
        let repeated = CategoryDecl::with_addresses("rep", 7, &["a", "a"]);
        assert!(mgr.add_category(repeated).is_err());
    }

    #[test]
    fn create_and_validate() {
        let mgr = manager();
        let mut gid = mgr.create_id("column").unwrap();
        assert_eq!(gid.to_string(), "[110:?.?]");
        assert!(!mgr.validate_id(&gid));
        gid.set(0, 1);
        gid.set(1, 2);
        assert!(mgr.validate_id(&gid));
        assert!(!mgr.validate_id(&GeomId::new(110, &[1])));
        assert!(!mgr.validate_id(&GeomId::new(42, &[1])));
        assert!(matches!(mgr.create_id("nothing"), Err(GeomError::NotFound { .. })));
    }

    #[test]
    fn compose_from_index_vector() {
        let mgr = manager();
        let world = GeomId::new(0, &[0]);
        let module = mgr.compute_id_from_info(&world, "module", &[3]).unwrap();
        assert_eq!(module, GeomId::new(100, &[3]));
        assert!(mgr.validate_id(&module));

        let column = mgr.compute_id_from_info(&module, "column", &[5]).unwrap();
        assert_eq!(column, GeomId::new(110, &[3, 5]));

        let cell = mgr.compute_id_from_info(&column, "cell", &[1, 0]).unwrap();
        assert_eq!(cell, GeomId::new(130, &[3, 5, 1, 0]));

        // not an ancestor: the index vector must cover every address
        let err = mgr.compute_id_from_info(&world, "column", &[5]).unwrap_err();
        assert!(matches!(err, GeomError::SchemaMismatch { .. }));
        assert!(mgr.compute_id_from_info(&world, "column", &[4, 5]).is_ok());
    }

    #[test]
    fn compose_from_rules() {
        let mgr = manager();
        let module = GeomId::new(100, &[3]);
        let info: IdInfo = "[cell:column+1, row-4, side=1]".parse().unwrap();
        let cell = mgr.compute_id_from_rule(&module, &info, &[2, 1, 0]).unwrap();
        assert_eq!(cell, GeomId::new(130, &[3, 3, 3, 1]));

        let frame: IdInfo = "[frame]".parse().unwrap();
        let id = mgr.compute_id_from_rule(&module, &frame, &[0]).unwrap();
        assert_eq!(id, GeomId::new(120, &[3]));

        let bare_cell: IdInfo = "[cell]".parse().unwrap();
        let id = mgr.compute_id_from_rule(&module, &bare_cell, &[0]).unwrap();
        assert!(!mgr.validate_id(&id));

        let wrong_label: IdInfo = "[cell:row+0, column+0, side=0]".parse().unwrap();
        assert!(mgr.compute_id_from_rule(&module, &wrong_label, &[0]).is_err());
        let too_few: IdInfo = "[cell:column+0]".parse().unwrap();
        assert!(mgr.compute_id_from_rule(&module, &too_few, &[0]).is_err());

        let positional: IdInfo = "column".parse().unwrap();
        assert_eq!(
            mgr.compute_id_from_rule(&module, &positional, &[7]).unwrap(),
            GeomId::new(110, &[3, 7])
        );
    }

    #[test]
    fn address_access_and_inheritance() {
        let mgr = manager();
        let mut cell = GeomId::new(130, &[3, 5, 1, 0]);
        assert!(mgr.has_address(&cell, "row").unwrap());
        assert!(!mgr.has_address(&cell, "world").unwrap());
        assert_eq!(mgr.get_address(&cell, "column").unwrap(), 5);
        mgr.set_address(&mut cell, "side", 1).unwrap();
        assert_eq!(cell.get(3), Some(1));
        assert!(mgr.get_address(&cell, "bogus").is_err());

        assert_eq!(mgr.category_of(&cell).unwrap(), "cell");
        assert!(mgr.is_category(&cell, "cell").unwrap());
        assert!(mgr.inherits(&cell, "module").unwrap());
        assert!(!mgr.inherits(&cell, "world").unwrap());

        let module = mgr.extract(&cell, "module").unwrap();
        assert_eq!(module, GeomId::new(100, &[3]));
        assert!(mgr.check_inheritance(&module, &cell).unwrap());
        let world = mgr.extract(&cell, "world").unwrap();
        assert!(!world.is_valid());

        assert_eq!(
            mgr.to_human_readable(&cell),
            "category='cell': module=3 column=5 row=1 side=1"
        );
        assert_eq!(
            mgr.to_human_readable(&GeomId::make(77, 1)),
            "category='?': address[0]=?"
        );
    }
}

/// One category as written in a schema file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_id: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by: Vec<String>,
}

impl CategoryDecl {
    pub fn with_addresses(name: &str, type_id: u32, addresses: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            type_id,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// A schema file: an ordered list of `[[category]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDecl {
    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryDecl>,
}

/// A registered category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInfo {
    name: String,
    type_id: u32,
    addresses: Vec<String>,
    ancestors: Vec<String>,
    inherits: Option<String>,
    extends: Option<String>,
    by: Vec<String>,
}

impl CategoryInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn depth(&self) -> usize {
        self.addresses.len()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn address_index(&self, label: &str) -> Option<usize> {
        self.addresses.iter().position(|a| a == label)
    }

    pub fn has_address(&self, label: &str) -> bool {
        self.address_index(label).is_some()
    }

    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    pub fn has_ancestor(&self, category: &str) -> bool {
        self.ancestors.iter().any(|a| a == category)
    }

    pub fn inherits(&self) -> Option<&str> {
        self.inherits.as_deref()
    }

    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    pub fn by(&self) -> &[String] {
        &self.by
    }

    /// A fresh identifier of this category, every address unset.
    pub fn create(&self) -> GeomId {
        GeomId::make(self.type_id, self.depth())
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        writeln!(f, "{}|-- Type      : {}", indent, self.type_id)?;
        if let Some(inherits) = &self.inherits {
            writeln!(f, "{}|-- Inherits  : '{}'", indent, inherits)?;
        }
        if !self.ancestors.is_empty() {
            writeln!(
                f,
                "{}|-- Ancestors : {}",
                indent,
                self.ancestors.iter().map(|a| format!("'{}'", a)).join(" ")
            )?;
        }
        if let Some(extends) = &self.extends {
            writeln!(
                f,
                "{}|-- Extends   : '{}' by {}",
                indent,
                extends,
                self.by.iter().map(|a| format!("'{}'", a)).join(" ")
            )?;
        }
        writeln!(
            f,
            "{}`-- Addresses : {}",
            indent,
            self.addresses.iter().map(|a| format!("'{}'", a)).join(" ")
        )
    }
}

/// Owner of the category schema.
#[derive(Debug, Clone, Default)]
pub struct IdManager {
    categories: BTreeMap<String, CategoryInfo>,
    names_by_type: BTreeMap<u32, String>,
}

impl IdManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from declarations, in declaration order.
    pub fn from_decl(decl: &SchemaDecl) -> Result<Self> {
        let mut mgr = Self::new();
        for category in &decl.categories {
            mgr.add_category(category.clone())?;
        }
        Ok(mgr)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let decl: SchemaDecl =
            toml::from_str(text).map_err(|e| GeomError::Schema(format!("invalid schema: {}", e)))?;
        Self::from_decl(&decl)
    }

    /// Registers a category. A parent named by `inherits` or `extends` must
    /// already be registered.
    pub fn add_category(&mut self, decl: CategoryDecl) -> Result<()> {
        let CategoryDecl {
            name,
            type_id,
            addresses,
            inherits,
            extends,
            by,
        } = decl;

        if name.trim().is_empty() {
            return Err(GeomError::Schema("empty category name".to_string()));
        }
        if self.categories.contains_key(&name) {
            return Err(GeomError::Schema(format!("category '{}' already exists", name)));
        }
        if type_id == GeomId::INVALID_TYPE {
            return Err(GeomError::Schema(format!(
                "invalid type for category '{}'",
                name
            )));
        }
        if let Some(other) = self.names_by_type.get(&type_id) {
            return Err(GeomError::Schema(format!(
                "type {} of category '{}' is already used by '{}'",
                type_id, name, other
            )));
        }

        let forms = [!addresses.is_empty(), inherits.is_some(), extends.is_some()];
        if forms.iter().filter(|&&f| f).count() != 1 {
            return Err(GeomError::Schema(format!(
                "category '{}' needs exactly one of 'addresses', 'inherits' or 'extends'",
                name
            )));
        }

        let mut info = CategoryInfo {
            name: name.clone(),
            type_id,
            addresses,
            ancestors: Vec::new(),
            inherits: None,
            extends: None,
            by: Vec::new(),
        };

        if let Some(parent) = inherits {
            let parent_info = self.category_info(&parent)?;
            info.addresses = parent_info.addresses.clone();
            info.ancestors = parent_info.ancestors.clone();
            push_unique(&mut info.ancestors, &parent);
            info.inherits = Some(parent);
        } else if let Some(parent) = extends {
            if by.is_empty() {
                return Err(GeomError::Schema(format!(
                    "category '{}' extends '{}' but has no 'by' addresses",
                    name, parent
                )));
            }
            let parent_info = self.category_info(&parent)?;
            info.addresses = parent_info.addresses.clone();
            info.ancestors = parent_info.ancestors.clone();
            info.addresses.extend(by.iter().cloned());
            push_unique(&mut info.ancestors, &parent);
            info.extends = Some(parent);
            info.by = by;
        }

        if info.addresses.is_empty() {
            return Err(GeomError::Schema(format!(
                "category '{}' has no address",
                name
            )));
        }
        if let Some(label) = info.addresses.iter().duplicates().next() {
            return Err(GeomError::Schema(format!(
                "address '{}' appears twice in category '{}'",
                label, name
            )));
        }

        debug!(
            "registered category '{}' (type {}, addresses [{}])",
            name,
            type_id,
            info.addresses.iter().join(", ")
        );
        self.names_by_type.insert(type_id, name.clone());
        self.categories.insert(name, info);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Registered categories in name order.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryInfo> {
        self.categories.values()
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn has_category_type(&self, type_id: u32) -> bool {
        self.names_by_type.contains_key(&type_id)
    }

    pub fn category_info(&self, name: &str) -> Result<&CategoryInfo> {
        self.categories
            .get(name)
            .ok_or_else(|| GeomError::not_found("category", name))
    }

    pub fn category_info_by_type(&self, type_id: u32) -> Result<&CategoryInfo> {
        self.names_by_type
            .get(&type_id)
            .and_then(|name| self.categories.get(name))
            .ok_or_else(|| GeomError::not_found("category type", type_id.to_string()))
    }

    pub fn category_type(&self, name: &str) -> Result<u32> {
        self.category_info(name).map(CategoryInfo::type_id)
    }

    /// Name of the category of `gid`.
    pub fn category_of(&self, gid: &GeomId) -> Result<&str> {
        self.category_info_by_type(gid.type_id())
            .map(CategoryInfo::name)
    }

    pub fn is_category(&self, gid: &GeomId, name: &str) -> Result<bool> {
        Ok(self.category_of(gid)? == name)
    }

    /// True when the category of `gid` has `name` among its ancestors.
    pub fn inherits(&self, gid: &GeomId, name: &str) -> Result<bool> {
        Ok(self
            .category_info_by_type(gid.type_id())?
            .has_ancestor(name))
    }

    /// True when the category of `child` has the category of `mother` among
    /// its ancestors.
    pub fn check_inheritance(&self, mother: &GeomId, child: &GeomId) -> Result<bool> {
        let child_info = self.category_info_by_type(child.type_id())?;
        let mother_info = self.category_info_by_type(mother.type_id())?;
        Ok(child_info.has_ancestor(mother_info.name()))
    }

    /// The identifier of category `mother_category` that `child` descends
    /// from. Its addresses stay unset when the child's category does not
    /// descend from `mother_category`.
    pub fn extract(&self, child: &GeomId, mother_category: &str) -> Result<GeomId> {
        let mut mother = self.create_id(mother_category)?;
        if self.check_inheritance(&mother, child)? {
            child.extract_to(&mut mother)?;
        }
        Ok(mother)
    }

    fn address_slot(&self, gid: &GeomId, label: &str) -> Result<usize> {
        let info = self.category_info_by_type(gid.type_id())?;
        info.address_index(label)
            .ok_or_else(|| GeomError::mismatch(info.name(), format!("no address '{}'", label)))
    }

    pub fn has_address(&self, gid: &GeomId, label: &str) -> Result<bool> {
        Ok(self
            .category_info_by_type(gid.type_id())?
            .has_address(label))
    }

    pub fn get_address(&self, gid: &GeomId, label: &str) -> Result<u32> {
        let slot = self.address_slot(gid, label)?;
        Ok(gid.get(slot).unwrap_or(GeomId::INVALID_ADDRESS))
    }

    pub fn set_address(&self, gid: &mut GeomId, label: &str, value: u32) -> Result<()> {
        let slot = self.address_slot(gid, label)?;
        gid.set(slot, value);
        Ok(())
    }

    /// A fresh identifier of the named category, every address unset.
    pub fn create_id(&self, category: &str) -> Result<GeomId> {
        self.category_info(category).map(CategoryInfo::create)
    }

    /// True when `gid` belongs to a registered category, has its depth and
    /// every address is set.
    pub fn validate_id(&self, gid: &GeomId) -> bool {
        match self.category_info_by_type(gid.type_id()) {
            Ok(info) => gid.depth() == info.depth() && gid.is_valid(),
            Err(_) => false,
        }
    }

    /// Creates an identifier of `category` and imports the mother's addresses
    /// when the mother's category is one of its ancestors. Returns the ID and
    /// the number of addresses already set.
    fn seed_from_mother(&self, mother: &GeomId, info: &CategoryInfo) -> Result<(GeomId, usize)> {
        let mut gid = info.create();
        if !mother.is_valid() {
            return Ok((gid, 0));
        }
        let mother_info = self.category_info_by_type(mother.type_id())?;
        if !info.has_ancestor(mother_info.name()) {
            return Ok((gid, 0));
        }
        gid.inherits_from(mother)?;
        trace!(
            "{} imports {} from mother category '{}'",
            info.name(),
            mother,
            mother_info.name()
        );
        Ok((gid, mother.depth()))
    }

    /// Composes a daughter ID: imports the mother's addresses when allowed,
    /// then fills the remaining addresses from `indices` in order.
    pub fn compute_id_from_info(
        &self,
        mother: &GeomId,
        category: &str,
        indices: &[u32],
    ) -> Result<GeomId> {
        let info = self.category_info(category)?;
        let (mut gid, imported) = self.seed_from_mother(mother, info)?;
        let remaining = info.depth() - imported;
        if indices.len() != remaining {
            return Err(GeomError::mismatch(
                category,
                format!(
                    "{} index value(s) [{}] for {} remaining address(es) with mother {}",
                    indices.len(),
                    indices.iter().join(", "),
                    remaining,
                    mother
                ),
            ));
        }
        for (i, &index) in indices.iter().enumerate() {
            gid.set(imported + i, index);
        }
        Ok(gid)
    }

    /// Composes a daughter ID from a directive. A bare directive behaves like
    /// [`IdManager::compute_id_from_info`]; a bracketed one applies its rules
    /// to the remaining addresses, the `i`-th rule reading `indices[i]`.
    pub fn compute_id_from_rule(
        &self,
        mother: &GeomId,
        id_info: &IdInfo,
        indices: &[u32],
    ) -> Result<GeomId> {
        let Some(rules) = id_info.rules() else {
            return self.compute_id_from_info(mother, id_info.category(), indices);
        };
        let info = self.category_info(id_info.category())?;
        let (mut gid, imported) = self.seed_from_mother(mother, info)?;
        if rules.is_empty() {
            return Ok(gid);
        }
        let remaining = info.depth() - imported;
        if rules.len() != remaining {
            return Err(GeomError::mismatch(
                info.name(),
                format!(
                    "{} address rule(s) in '{}' for {} remaining address(es) with mother {}",
                    rules.len(),
                    id_info,
                    remaining,
                    mother
                ),
            ));
        }
        for (i, rule) in rules.iter().enumerate() {
            let expected = &info.addresses[imported + i];
            if rule.label() != expected {
                return Err(GeomError::mismatch(
                    info.name(),
                    format!(
                        "address rule '{}' found where '{}' is expected",
                        rule, expected
                    ),
                ));
            }
            gid.set(imported + i, rule.apply(indices.get(i).copied())?);
        }
        Ok(gid)
    }

    /// `category='name': label=value ...`, with `?` for unknown parts.
    pub fn to_human_readable(&self, gid: &GeomId) -> String {
        let info = self.category_info_by_type(gid.type_id()).ok();
        let fields = gid
            .addresses()
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                let label = info
                    .and_then(|c| c.addresses.get(i).cloned())
                    .unwrap_or_else(|| format!("address[{}]", i));
                let value = match a {
                    GeomId::INVALID_ADDRESS => "?".to_string(),
                    GeomId::ANY_ADDRESS => "*".to_string(),
                    a => a.to_string(),
                };
                format!("{}={}", label, value)
            })
            .join(" ");
        format!(
            "category='{}': {}",
            info.map_or("?", CategoryInfo::name),
            fields
        )
    }
}

impl fmt::Display for IdManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID manager")?;
        if self.categories.is_empty() {
            return writeln!(f, "`-- Categories: <empty>");
        }
        writeln!(f, "`-- Categories: [{}]", self.categories.len())?;
        let last = self.categories.len() - 1;
        for (i, info) in self.categories.values().enumerate() {
            let (tag, indent) = if i == last {
                ("`--", "        ")
            } else {
                ("|--", "    |   ")
            };
            writeln!(f, "    {} Category '{}'", tag, info.name)?;
            info.write_tree(f, indent)?;
        }
        Ok(())
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|a| a == item) {
        list.push(item.to_string());
    }
}
