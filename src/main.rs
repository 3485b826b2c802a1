use anyhow::{Context, Result};
use geomap::mapping::Mapping;
use geomap::output;
use geomap::settings;
use geomap::setup::Setup;

fn main() -> Result<()> {
    let settings = settings::load_config()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .init();
    log::debug!("{}", settings);

    let setup = Setup::load(settings.setup_path()?)?;
    let mapping = Mapping::new(&setup.id_mgr, &setup.factory, settings.mapping.clone());
    let (map, report) = if settings.parallel {
        mapping.build_parallel_with_report(&settings.top_model)
    } else {
        mapping.build_with_report(&settings.top_model)
    }
    .with_context(|| format!("failed to map model '{}'", settings.top_model))?;
    log::info!("{}", report);

    output::writeup(&map, settings.format, settings.output.as_deref())?;
    Ok(())
}
