use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entities::venue;
use crate::error::LoadError;
use crate::venue::Venue;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Rows waiting for one writer. Records sharing an id are folded the way
/// sequential upserts would leave them: first-seen fields, last-seen
/// coordinates.
#[derive(Debug, Default)]
pub struct Pending {
    rows: Vec<Venue>,
    index: HashMap<String, usize>,
}

impl Pending {
    pub fn push(&mut self, venue: Venue) {
        match self.index.get(&venue.id) {
            Some(&at) => {
                let row = &mut self.rows[at];
                row.coordinates_lat = venue.coordinates_lat;
                row.coordinates_lng = venue.coordinates_lng;
            }
            None => {
                self.index.insert(venue.id.clone(), self.rows.len());
                self.rows.push(venue);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn take(&mut self) -> Vec<Venue> {
        self.index.clear();
        std::mem::take(&mut self.rows)
    }
}

/// `ON CONFLICT (id) DO UPDATE SET coordinates_lat = excluded.coordinates_lat,
/// coordinates_lng = excluded.coordinates_lng`
pub fn upsert_coordinates() -> OnConflict {
    OnConflict::column(venue::Column::Id)
        .update_columns([venue::Column::CoordinatesLat, venue::Column::CoordinatesLng])
        .to_owned()
}

fn is_transient(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

fn shard_for(id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Fans venues out to a fixed pool of writer tasks. A venue id always maps to
/// the same writer, so upserts for one id are applied in submission order.
pub struct BatchInsert {
    pending: Vec<Pending>,
    pub batch_size: usize,
    handles: Vec<Option<JoinHandle<Result<u64, DbErr>>>>,
    dispatchers: Vec<mpsc::Sender<Vec<Venue>>>,
}

impl BatchInsert
{
    pub fn new(db: Arc<DatabaseConnection>, batch_size: usize, pool_size: usize, max_retries: u32) -> BatchInsert {
        let mut dispatchers = vec![];
        let mut handles = vec![];

        while handles.len() < pool_size {
            let (tx, rx) = mpsc::channel(8);

            dispatchers.push(tx);
            handles.push(Some(Self::dispatch(db.clone(), rx, max_retries)));
        }

        BatchInsert {
            pending: (0..pool_size).map(|_| Pending::default()).collect(),
            batch_size,
            handles,
            dispatchers,
        }
    }

    fn dispatch(db: Arc<DatabaseConnection>, mut rx: mpsc::Receiver<Vec<Venue>>, max_retries: u32) -> JoinHandle<Result<u64, DbErr>> {
        tokio::spawn(async move {
            let mut written = 0;

            while let Some(batch) = rx.recv().await {
                written += write_batch(db.as_ref(), batch, max_retries).await?;
            }

            Ok(written)
        })
    }

    pub async fn insert(&mut self, value: Venue) -> Result<(), LoadError> {
        let shard = shard_for(&value.id, self.pending.len());
        self.pending[shard].push(value);

        if self.pending[shard].len() >= self.batch_size {
            self.send(shard).await?;
        }

        Ok(())
    }

    async fn send(&mut self, shard: usize) -> Result<usize, LoadError> {
        let batch = self.pending[shard].take();
        let count = batch.len();

        if self.dispatchers[shard].send(batch).await.is_err() {
            // The writer only hangs up after a failed write; surface that error.
            return Err(match self.handles[shard].take() {
                Some(handle) => match handle.await? {
                    Err(e) => LoadError::Db(e),
                    Ok(_) => LoadError::WriterGone,
                },
                None => LoadError::WriterGone,
            });
        }

        Ok(count)
    }

    /// Hands every buffered row to its writer. Returns the number of rows sent.
    pub async fn flush(&mut self) -> Result<usize, LoadError> {
        let mut count = 0;

        for shard in 0..self.pending.len() {
            if !self.pending[shard].is_empty() {
                count += self.send(shard).await?;
            }
        }

        Ok(count)
    }

    /// Flushes, closes the writers and waits for them. Returns the number of
    /// rows written, or the first writer error.
    pub async fn join(mut self) -> Result<u64, LoadError> {
        self.flush().await?;
        self.dispatchers.clear();

        let mut written = 0;
        for result in join_all(self.handles.drain(..).flatten()).await {
            written += result??;
        }

        Ok(written)
    }
}

/// 100 ms, 200 ms, 400 ms, ... capped at 2^10 times the base.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.min(10))
}

/// Runs `op` until it succeeds, fails with a non-transient error, or has been
/// retried `max_retries` times. Returns the last error.
async fn with_retry<T, F, Fut>(max_retries: u32, base: Duration, mut op: F) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < max_retries => {
                let delay = backoff_delay(base, attempt);
                warn!(error = %e, attempt = attempt + 1, ?delay, "transient write failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn write_batch(db: &DatabaseConnection, batch: Vec<Venue>, max_retries: u32) -> Result<u64, DbErr> {
    if batch.is_empty() {
        return Ok(0);
    }

    with_retry(max_retries, RETRY_BASE_DELAY, || {
        let rows = batch.iter().cloned().map(venue::ActiveModel::from);
        venue::Entity::insert_many(rows)
            .on_conflict(upsert_coordinates())
            .exec_without_returning(db)
    })
    .await?;

    debug!(rows = batch.len(), "batch written");
    Ok(batch.len() as u64)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use sea_orm::{ConnAcquireErr, RuntimeErr};

    use super::*;
    use crate::venue::OsmType;

    fn conn_err() -> DbErr {
        DbErr::Conn(RuntimeErr::Internal("connection reset".into()))
    }

    fn venue(id: &str, name: &str, lat: f64, lng: f64) -> Venue {
        Venue {
            id: id.to_string(),
            name: name.to_string(),
            coordinates_lat: lat,
            coordinates_lng: lng,
            country: "Unknown".to_string(),
            region: "Unknown".to_string(),
            venue_type: "regional".to_string(),
            time_zone: "UTC".to_string(),
            data_quality: "osm".to_string(),
            osm_id: id.rsplit('-').next().unwrap().to_string(),
            osm_type: OsmType::Node,
            data_source: "osm".to_string(),
            verified: false,
        }
    }

    #[test]
    fn folds_duplicate_ids_like_sequential_upserts() {
        let mut pending = Pending::default();
        pending.push(venue("osm-node-1", "Marina Tarará", 23.177492, -82.2121141));
        pending.push(venue("osm-node-2", "Other", 1.0, 1.0));
        pending.push(venue("osm-node-1", "Renamed", 23.2, -82.3));

        assert_eq!(pending.len(), 2);
        let rows = pending.take();
        assert_eq!(rows[0].name, "Marina Tarará");
        assert_eq!((rows[0].coordinates_lat, rows[0].coordinates_lng), (23.2, -82.3));
        assert_eq!(rows[1].name, "Other");
        assert!(pending.is_empty());

        pending.push(venue("osm-node-1", "Again", 0.0, 0.0));
        assert_eq!(pending.take()[0].name, "Again");
    }

    #[test]
    fn shards_are_stable() {
        for shards in 1..8 {
            let shard = shard_for("osm-way-1359451849", shards);
            assert!(shard < shards);
            assert_eq!(shard, shard_for("osm-way-1359451849", shards));
        }
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(is_transient(&conn_err()));
        assert!(is_transient(&DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)));
        assert!(!is_transient(&DbErr::Exec(RuntimeErr::Internal("constraint failed".into()))));
        assert!(!is_transient(&DbErr::Query(RuntimeErr::Internal("syntax error".into()))));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let delays: Vec<_> = (0..4).map(|attempt| backoff_delay(RETRY_BASE_DELAY, attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
        assert_eq!(backoff_delay(RETRY_BASE_DELAY, 30), backoff_delay(RETRY_BASE_DELAY, 10));
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbErr> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(conn_err()) }
        })
        .await;

        assert!(matches!(result, Err(DbErr::Conn(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbErr> = with_retry(5, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::Exec(RuntimeErr::Internal("constraint failed".into()))) }
        })
        .await;

        assert!(matches!(result, Err(DbErr::Exec(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
