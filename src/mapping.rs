//! Mapping builder.
//!
//! Walks the volume tree of a locked [`ModelFactory`] from a top model,
//! composing world placements and geometry IDs on the way down, and collects
//! one [`GeomInfo`] per identified volume in a [`GeomMap`].
//!
//! The walk uses an explicit worklist instead of recursion. A daughter item is
//! identified when its mother declares a `mapping.daughter_id.<label>`
//! directive for it; otherwise the mother's ID is handed down unchanged so
//! deeper volumes are still placed.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::geom_id::GeomId;
use crate::geom_map::{GeomInfo, GeomMap};
use crate::id_mgr::{IdManager, WORLD_CATEGORY};
use crate::id_rule::IdInfo;
use crate::model::ModelFactory;
use crate::placement::Placement;
use crate::volume::LogicalVolume;

pub const DEFAULT_MAX_DEPTH: usize = 1000;


/// What to do when a minted ID is already in the dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Abort the build with [`GeomError::DuplicateGid`].
    #[default]
    Strict,
    /// Replace the existing entry and log a warning.
    Overwrite,
}

/// Restriction on the categories that get dictionary entries. Filtered
/// items still hand their ID down to their daughters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Vec<String>),
    Excluded(Vec<String>),
}

impl CategoryFilter {
    pub fn accepts(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(list) => list.iter().any(|c| c == category),
            CategoryFilter::Excluded(list) => !list.iter().any(|c| c == category),
        }
    }
}

/// Options of a mapping build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Deepest volume level whose daughters are still mapped, the top volume
    /// being level 0. `max_depth = N` maps N + 1 daughter levels; 0 removes
    /// the limit.
    pub max_depth: usize,
    /// Insert the world entry in the dictionary.
    pub world_mapping: bool,
    pub only_categories: Vec<String>,
    pub excluded_categories: Vec<String>,
    pub duplicates: DuplicatePolicy,
    /// Placement of the top volume in the world frame.
    pub world_placement: Placement,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            world_mapping: true,
            only_categories: Vec::new(),
            excluded_categories: Vec::new(),
            duplicates: DuplicatePolicy::Strict,
            world_placement: Placement::identity(),
        }
    }
}

impl MappingConfig {
    pub fn category_filter(&self) -> Result<CategoryFilter> {
        match (
            self.only_categories.is_empty(),
            self.excluded_categories.is_empty(),
        ) {
            (true, true) => Ok(CategoryFilter::All),
            (false, true) => Ok(CategoryFilter::Only(self.only_categories.clone())),
            (true, false) => Ok(CategoryFilter::Excluded(self.excluded_categories.clone())),
            (false, false) => Err(GeomError::Schema(
                "'only_categories' and 'excluded_categories' cannot both be set".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.category_filter().map(|_| ())
    }
}

/// A branch the depth guard stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub logical: String,
    pub gid: GeomId,
    pub depth: usize,
}

/// Diagnostics collected during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Physical volume items walked through.
    pub visited: usize,
    /// Dictionary entries created, world included.
    pub minted: usize,
    /// Items that handed down their mother's ID.
    pub propagated: usize,
    /// Items identified but left out by the category filter.
    pub filtered: usize,
    /// Entries replaced under [`DuplicatePolicy::Overwrite`].
    pub overwritten: usize,
    pub max_depth_reached: usize,
    pub truncated: Vec<Truncation>,
}

impl BuildReport {
    fn absorb(&mut self, other: BuildReport) {
        self.visited += other.visited;
        self.minted += other.minted;
        self.propagated += other.propagated;
        self.filtered += other.filtered;
        self.overwritten += other.overwritten;
        self.max_depth_reached = self.max_depth_reached.max(other.max_depth_reached);
        self.truncated.extend(other.truncated);
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build report")?;
        writeln!(f, "|-- Visited items    : {}", self.visited)?;
        writeln!(f, "|-- Minted entries   : {}", self.minted)?;
        writeln!(f, "|-- Propagated IDs   : {}", self.propagated)?;
        writeln!(f, "|-- Filtered entries : {}", self.filtered)?;
        writeln!(f, "|-- Overwritten      : {}", self.overwritten)?;
        writeln!(f, "|-- Deepest level    : {}", self.max_depth_reached)?;
        write!(f, "`-- Truncated        : {}", self.truncated.len())?;
        for t in &self.truncated {
            write!(f, "\n    - '{}' {} at depth {}", t.logical, t.gid, t.depth)?;
        }
        Ok(())
    }
}

/// One pending node of the walk.
#[derive(Debug, Clone)]
struct Frame<'a> {
    logical: &'a Arc<LogicalVolume>,
    placement: Placement,
    gid: GeomId,
    depth: usize,
}

/// Replaces the entry with the same ID, warning when one existed.
fn overwrite(map: &mut GeomMap, info: GeomInfo) -> bool {
    let gid = info.gid().clone();
    let name = info.logical().name().to_string();
    match map.replace(info) {
        Some(old) => {
            warn!(
                "overwriting {} ('{}') with '{}'",
                gid,
                old.logical().name(),
                name
            );
            true
        }
        None => false,
    }
}

/// State private to one build, or to one branch of a parallel build.
struct TraversalContext<'m, 'a> {
    mapping: &'m Mapping<'a>,
    filter: &'m CategoryFilter,
    stack: Vec<Frame<'a>>,
    map: GeomMap,
    report: BuildReport,
}

impl<'m, 'a> TraversalContext<'m, 'a> {
    fn new(mapping: &'m Mapping<'a>, filter: &'m CategoryFilter) -> Self {
        Self {
            mapping,
            filter,
            stack: Vec::new(),
            map: GeomMap::new(),
            report: BuildReport::default(),
        }
    }

    fn record(&mut self, info: GeomInfo) -> Result<()> {
        debug!("mapping {}", info);
        match self.mapping.config.duplicates {
            DuplicatePolicy::Strict => self.map.insert(info)?,
            DuplicatePolicy::Overwrite => {
                if overwrite(&mut self.map, info) {
                    self.report.overwritten += 1;
                    return Ok(());
                }
            }
        }
        self.report.minted += 1;
        Ok(())
    }

    /// Processes the daughters of one frame, pushing their own frames.
    fn expand(&mut self, frame: Frame<'a>) -> Result<()> {
        let logical = frame.logical;
        self.report.max_depth_reached = self.report.max_depth_reached.max(frame.depth);
        if logical.is_leaf() {
            return Ok(());
        }
        let limit = self.mapping.config.max_depth;
        if limit > 0 && frame.depth > limit {
            warn!(
                "maximum depth {} exceeded in '{}' ({}); daughters are not mapped",
                limit,
                logical.name(),
                frame.gid
            );
            self.report.truncated.push(Truncation {
                logical: logical.name().to_string(),
                gid: frame.gid,
                depth: frame.depth,
            });
            return Ok(());
        }

        let id_mgr = self.mapping.id_mgr;
        let mut children = Vec::new();
        for (name, physical) in logical.physicals() {
            let label = physical.label()?;
            let directive = if logical.parameters().has_daughter_id(label) {
                let text = logical.parameters().fetch_daughter_id(label)?;
                Some(text.parse::<IdInfo>()?)
            } else {
                None
            };
            trace!(
                "{:indent$}'{}' in '{}': {} item(s), directive {:?}",
                "",
                name,
                logical.name(),
                physical.number_of_items(),
                directive.as_ref().map(ToString::to_string),
                indent = frame.depth * 2
            );

            for item in 0..physical.number_of_items() {
                let local = physical.placement().placement(item)?;
                let world = frame.placement.child_to_mother(&local);
                let mut propagated = frame.gid.clone();
                self.report.visited += 1;

                if let Some(directive) = &directive {
                    let indices = physical.placement().index_map(item)?;
                    let gid = id_mgr.compute_id_from_rule(&frame.gid, directive, &indices)?;
                    if id_mgr.validate_id(&gid) {
                        if self.filter.accepts(id_mgr.category_of(&gid)?) {
                            self.record(GeomInfo::new(
                                gid.clone(),
                                world,
                                Arc::clone(physical.logical()),
                            ))?;
                        } else {
                            self.report.filtered += 1;
                        }
                        propagated = gid;
                    } else {
                        debug!(
                            "'{}' item {} has incomplete ID {}; keeping {}",
                            name, item, gid, frame.gid
                        );
                        self.report.propagated += 1;
                    }
                } else {
                    self.report.propagated += 1;
                }

                children.push(Frame {
                    logical: physical.logical(),
                    placement: world,
                    gid: propagated,
                    depth: frame.depth + 1,
                });
            }
        }
        // reversed so the first daughter is walked first
        self.stack.extend(children.into_iter().rev());
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        while let Some(frame) = self.stack.pop() {
            self.expand(frame)?;
        }
        Ok(())
    }
}

/// Builds geometry maps from a schema and a locked model factory.
#[derive(Debug, Clone)]
pub struct Mapping<'a> {
    id_mgr: &'a IdManager,
    factory: &'a ModelFactory,
    config: MappingConfig,
}

impl<'a> Mapping<'a> {
    pub fn new(id_mgr: &'a IdManager, factory: &'a ModelFactory, config: MappingConfig) -> Self {
        Self {
            id_mgr,
            factory,
            config,
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn id_mgr(&self) -> &IdManager {
        self.id_mgr
    }

    /// The world ID: the `world` category with every address at 0.
    pub fn world_id(&self) -> Result<GeomId> {
        let info = self.id_mgr.category_info(WORLD_CATEGORY).map_err(|_| {
            GeomError::Schema(format!("no '{}' category in the schema", WORLD_CATEGORY))
        })?;
        Ok(GeomId::new(info.type_id(), &vec![0; info.depth()]))
    }

    /// Checks the preconditions and returns the context seeded with the top
    /// frame, the world entry already recorded.
    fn seed<'m>(
        &'m self,
        top_model: &str,
        filter: &'m CategoryFilter,
    ) -> Result<TraversalContext<'m, 'a>> {
        if !self.factory.is_locked() {
            return Err(GeomError::NotLocked);
        }
        let top = self.factory.logical(top_model)?;
        let world_gid = self.world_id()?;
        info!(
            "building geometry map from model '{}' (logical '{}', world ID {})",
            top_model,
            top.name(),
            world_gid
        );

        let mut ctx = TraversalContext::new(self, filter);
        let placement = self.config.world_placement;
        if self.config.world_mapping && filter.accepts(WORLD_CATEGORY) {
            ctx.record(GeomInfo::new(world_gid.clone(), placement, Arc::clone(top)))?;
        }
        ctx.stack.push(Frame {
            logical: top,
            placement,
            gid: world_gid,
            depth: 0,
        });
        Ok(ctx)
    }

    /// Builds the dictionary from the model named `top_model`.
    pub fn build(&self, top_model: &str) -> Result<GeomMap> {
        self.build_with_report(top_model).map(|(map, _)| map)
    }

    pub fn build_with_report(&self, top_model: &str) -> Result<(GeomMap, BuildReport)> {
        let filter = self.config.category_filter()?;
        let mut ctx = self.seed(top_model, &filter)?;
        ctx.run()?;
        info!(
            "geometry map built: {} entries, {} items visited",
            ctx.map.len(),
            ctx.report.visited
        );
        Ok((ctx.map, ctx.report))
    }

    /// Same result as [`Mapping::build`], with the subtree of every top level
    /// daughter item walked on the rayon pool.
    pub fn build_parallel(&self, top_model: &str) -> Result<GeomMap> {
        self.build_parallel_with_report(top_model).map(|(map, _)| map)
    }

    pub fn build_parallel_with_report(&self, top_model: &str) -> Result<(GeomMap, BuildReport)> {
        let filter = self.config.category_filter()?;
        let mut ctx = self.seed(top_model, &filter)?;
        if let Some(top) = ctx.stack.pop() {
            ctx.expand(top)?;
        }
        let branches: Vec<Frame<'a>> = ctx.stack.drain(..).rev().collect();
        debug!("walking {} top level branches in parallel", branches.len());

        let results = branches
            .into_par_iter()
            .map(|frame| -> Result<(GeomMap, BuildReport)> {
                let mut branch = TraversalContext::new(self, &filter);
                branch.stack.push(frame);
                branch.run()?;
                Ok((branch.map, branch.report))
            })
            .collect::<Result<Vec<_>>>()?;

        let TraversalContext {
            mut map,
            mut report,
            ..
        } = ctx;
        for (branch_map, branch_report) in results {
            report.absorb(branch_report);
            match self.config.duplicates {
                DuplicatePolicy::Strict => map.merge(branch_map)?,
                DuplicatePolicy::Overwrite => {
                    // branches are merged in walk order, so the last writer
                    // matches the sequential build
                    for info in branch_map.iter() {
                        if overwrite(&mut map, info.clone()) {
                            report.minted -= 1;
                            report.overwritten += 1;
                        }
                    }
                }
            }
        }
        info!(
            "geometry map built in parallel: {} entries, {} items visited",
            map.len(),
            report.visited
        );
        Ok((map, report))
    }
}
