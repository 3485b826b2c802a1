use std::{fs::File, io::BufWriter};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::geom_map::{GeomInfo, GeomMap};
use crate::geom_id::GeomId;
use crate::settings::OutputFormat;


/// Exported form of one map entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryRecord {
    pub gid: GeomId,
    pub logical: String,
    pub material: Option<String>,
    pub shape: String,
    pub translation: [f64; 3],
    pub rotation_zyz_deg: [f64; 3],
}

impl From<&GeomInfo> for EntryRecord {
    fn from(info: &GeomInfo) -> Self {
        let placement = info.world_placement();
        let t = placement.translation();
        let (phi, theta, delta) = placement.zyz_angles();
        Self {
            gid: info.gid().clone(),
            logical: info.logical().name().to_string(),
            material: info.logical().material().map(str::to_string),
            shape: info.logical().shape().name().to_string(),
            translation: [t.x, t.y, t.z],
            rotation_zyz_deg: [phi.to_degrees(), theta.to_degrees(), delta.to_degrees()],
        }
    }
}

/// One line per entry: GID, logical, material, shape, translation, ZYZ angles.
pub fn write_text<W: Write>(map: &GeomMap, writer: &mut W) -> Result<()> {
    for record in map.iter().map(EntryRecord::from) {
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            record.gid,
            record.logical,
            record.material.as_deref().unwrap_or("-"),
            record.shape,
            record.translation.iter().join(" "),
            record.rotation_zyz_deg.iter().join(" ")
        )?;
    }
    Ok(())
}

pub fn write_json<W: Write>(map: &GeomMap, writer: &mut W) -> Result<()> {
    let records: Vec<EntryRecord> = map.iter().map(EntryRecord::from).collect();
    serde_json::to_writer_pretty(&mut *writer, &records)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes the map to `path`, or to standard output when `path` is `None`.
pub fn writeup(map: &GeomMap, format: OutputFormat, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {:?}", path))?;
            let mut writer = BufWriter::new(file);
            write_format(map, format, &mut writer)?;
            writer.flush()?;
            log::info!("wrote {} entries to {:?}", map.len(), path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_format(map, format, &mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn write_format<W: Write>(map: &GeomMap, format: OutputFormat, writer: &mut W) -> Result<()> {
    match format {
        OutputFormat::Text => write_text(map, writer),
        OutputFormat::Json => write_json(map, writer),
    }
}
