//! Validates drafts and feeds the valid ones to the batch writer.
//!
//! Rejections are per record: a malformed venue is reported with its id and
//! the rest of the input is still applied. Store failures abort the load.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::{error, info, warn};

use crate::batch_insert::BatchInsert;
use crate::config::LoaderConfig;
use crate::entities::venue::TABLE_NAME;
use crate::error::LoadError;
use crate::migrator::Migrator;
use crate::source::{read_drafts, Format, SourceError};
use crate::venue::{VenueDraft, VenueError};

/// Connects and brings the schema up to date. `fresh` drops and recreates it.
pub async fn build_db(db_uri: &str, fresh: bool) -> Result<DatabaseConnection, LoadError> {
    let db = Database::connect(db_uri).await?;

    if fresh {
        Migrator::refresh(&db).await?;
    } else {
        Migrator::up(&db, None).await?;
    }

    let schema_manager = sea_orm_migration::SchemaManager::new(&db);
    if !schema_manager.has_table(TABLE_NAME).await? {
        return Err(LoadError::MissingTable(TABLE_NAME));
    }

    Ok(db)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub id: Option<String>,
    pub error: VenueError,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Valid records handed to the store, duplicates included.
    pub accepted: u64,
    /// Rows written after folding duplicate ids inside a batch.
    pub written: u64,
    pub rejected: Vec<Rejection>,
}

pub struct Loader {
    batcher: BatchInsert,
    report: LoadReport,
    progress: ProgressBar,
}

impl Loader {
    pub fn new(db: Arc<DatabaseConnection>, config: &LoaderConfig) -> Loader {
        Loader {
            batcher: BatchInsert::new(db, config.batch_size, config.workers, config.max_retries),
            report: LoadReport::default(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn set_progress(&mut self, progress: ProgressBar) {
        self.progress = progress;
    }

    pub async fn apply(&mut self, draft: VenueDraft) -> Result<(), LoadError> {
        self.progress.inc(1);

        match draft.validate() {
            Ok(venue) => {
                self.batcher.insert(venue).await?;
                self.report.accepted += 1;
            }
            Err(error) => {
                warn!(id = error.id().unwrap_or("<no id>"), %error, "rejected venue");
                self.report.rejected.push(Rejection {
                    id: error.id().map(str::to_string),
                    error,
                });
            }
        }

        Ok(())
    }

    pub async fn apply_all<I>(&mut self, drafts: I) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = VenueDraft>,
    {
        for draft in drafts {
            self.apply(draft).await?;
        }

        Ok(())
    }

    /// Writes everything still buffered and waits for the writers.
    pub async fn finish(mut self) -> Result<LoadReport, LoadError> {
        self.report.written = self.batcher.join().await?;

        info!(
            accepted = self.report.accepted,
            written = self.report.written,
            rejected = self.report.rejected.len(),
            "load finished"
        );

        Ok(self.report)
    }
}

/// Reads one input (stdin when `path` is `None`) into drafts.
pub fn read_input(path: Option<&Path>, format: Format) -> Result<Vec<VenueDraft>, SourceError> {
    let format = format.resolve(path)?;

    match path {
        Some(path) => read_drafts(File::open(path)?, format),
        None => read_drafts(io::stdin().lock(), format),
    }
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(label.to_string());
    pb
}

/// Applies one input's drafts behind a progress bar.
pub async fn load_drafts(loader: &mut Loader, label: &str, drafts: Vec<VenueDraft>) -> Result<(), LoadError> {
    info!(input = %label, records = drafts.len(), "parsed input");

    let pb = progress_bar(drafts.len() as u64, label);
    loader.set_progress(pb.clone());
    loader.apply_all(drafts).await?;
    pb.finish_and_clear();

    Ok(())
}

/// Loads every input in order. An input that cannot be opened or parsed is
/// logged and skipped; store errors abort. Returns the number of skipped
/// inputs.
pub async fn load_inputs(loader: &mut Loader, inputs: &[PathBuf], format: Format) -> Result<usize, LoadError> {
    let mut failed = 0;

    for path in inputs {
        let label = path.display().to_string();

        match read_input(Some(path), format) {
            Ok(drafts) => load_drafts(loader, &label, drafts).await?,
            Err(e) => {
                error!(input = %label, error = %e, "skipping unreadable input");
                failed += 1;
            }
        }
    }

    Ok(failed)
}
