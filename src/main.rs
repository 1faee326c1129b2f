use std::io;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sailing_venue_loader::config::{cli, LoaderConfig};
use sailing_venue_loader::loader::{load_drafts, load_inputs, read_input};
use sailing_venue_loader::{build_db, Loader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = LoaderConfig::from_matches(&matches)?;

    let db = Arc::new(build_db(&config.db_uri, config.fresh).await?);
    let mut loader = Loader::new(db, &config);

    let failed_inputs = if config.inputs.is_empty() {
        let drafts = read_input(None, config.format)?;
        load_drafts(&mut loader, "stdin", drafts).await?;
        0
    } else {
        load_inputs(&mut loader, &config.inputs, config.format).await?
    };

    let report = loader.finish().await?;

    for rejection in &report.rejected {
        eprintln!("rejected {}: {}", rejection.id.as_deref().unwrap_or("<no id>"), rejection.error);
    }

    if failed_inputs > 0 {
        anyhow::bail!("{failed_inputs} input(s) could not be read");
    }

    Ok(())
}
