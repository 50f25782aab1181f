// SQLite counter data store - submit target and latest-point source
use crate::application::ports::{LatestPointQuerier, Submitter};
use crate::domain::point::{StoredPoint, SubmissionRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

const SCHEMA: &str = "
create table if not exists counter_data (
    counter_id text not null,
    direction_id text not null,
    time integer not null,
    resolution integer not null,
    value numeric not null,
    primary key (counter_id, direction_id, time)
);
create view if not exists latest_counter_data as
    with latest_times as (
        select counter_id, direction_id, max(time) as time from counter_data group by 1, 2
    )
    select counter_data.* from counter_data, latest_times
    where counter_data.counter_id = latest_times.counter_id
      and counter_data.direction_id = latest_times.direction_id
      and counter_data.time = latest_times.time;
";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("creating counter_data schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .context("database task panicked")?
    }
}

#[async_trait]
impl Submitter for SqliteStore {
    async fn submit(&self, req: &SubmissionRequest) -> Result<()> {
        let req = req.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "replace into counter_data (counter_id, direction_id, time, resolution, value) \
                     values (?1, ?2, ?3, ?4, ?5)",
                )?;
                for pt in &req.points {
                    stmt.execute(params![
                        req.id,
                        req.direction_id,
                        pt.time,
                        u8::from(pt.resolution),
                        pt.value
                    ])
                    .with_context(|| {
                        format!(
                            "adding counter {:?} direction {:?} pt {:?}",
                            req.id, req.direction_id, pt
                        )
                    })?;
                }
            }
            tx.commit()?;

            if let Some((min, max, sum)) = req.summary() {
                tracing::info!(
                    "{} {} added {} points for range {} {} with sum {}",
                    req.id,
                    req.direction_id,
                    req.points.len(),
                    min,
                    max,
                    sum
                );
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LatestPointQuerier for SqliteStore {
    async fn latest_point(&self, counter_id: &str, direction_id: &str) -> Result<Option<StoredPoint>> {
        let (counter_id, direction_id) = (counter_id.to_string(), direction_id.to_string());
        let row: Option<(i64, f64)> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "select time, value from latest_counter_data \
                     where counter_id = ?1 and direction_id = ?2",
                    params![counter_id, direction_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("querying latest counter data")
            })
            .await?;

        row.map(|(time, value)| {
            let time = DateTime::from_timestamp(time, 0)
                .with_context(|| format!("stored time {} out of range", time))?;
            Ok(StoredPoint { time, value })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::point::{Point, Resolution};

    fn pt(time: i64, value: f64) -> Point {
        Point { time, resolution: Resolution::Hour, value }
    }

    #[tokio::test]
    async fn test_latest_point_after_submit() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.latest_point("test-1", "nb").await.unwrap(), None);

        store
            .submit(&SubmissionRequest::new("test-1", "nb", vec![pt(3600, 5.0), pt(7200, 6.0)]))
            .await
            .unwrap();
        store
            .submit(&SubmissionRequest::new("test-1", "sb", vec![pt(10800, 1.0)]))
            .await
            .unwrap();

        let latest = store.latest_point("test-1", "nb").await.unwrap().unwrap();
        assert_eq!(latest.time.timestamp(), 7200);
        assert_eq!(latest.value, 6.0);
    }

    #[tokio::test]
    async fn test_resubmit_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .submit(&SubmissionRequest::new("c", "d", vec![pt(3600, 5.0)]))
            .await
            .unwrap();
        store
            .submit(&SubmissionRequest::new("c", "d", vec![pt(3600, 9.0)]))
            .await
            .unwrap();

        let count: i64 = store
            .with_conn(|conn| Ok(conn.query_row("select count(*) from counter_data", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.latest_point("c", "d").await.unwrap().unwrap().value, 9.0);
    }

    #[tokio::test]
    async fn test_ids_are_bound_not_interpolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .submit(&SubmissionRequest::new("c", "d", vec![pt(3600, 5.0)]))
            .await
            .unwrap();

        let latest = store.latest_point("x' or '1'='1", "d").await.unwrap();
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn test_empty_submit_is_noop() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.submit(&SubmissionRequest::new("c", "d", vec![])).await.unwrap();
        assert_eq!(store.latest_point("c", "d").await.unwrap(), None);
    }
}
