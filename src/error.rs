use sea_orm::DbErr;
use thiserror::Error;

/// Failures that stop a load. Rejected records are not errors; they are
/// collected in the [`LoadReport`](crate::loader::LoadReport).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("writer task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("writer task stopped before the load finished")]
    WriterGone,
    #[error("table `{0}` missing after migration")]
    MissingTable(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
}
