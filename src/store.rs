#![forbid(unsafe_code)]

//! Persistence for collected content. Backed by libsql so the same code runs
//! against a local SQLite file or a remote libsql server.
//!
//! The collector only ever inserts. The viewer reads rows and flips the
//! `consumed` flag; nothing else mutates existing rows.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoreLocation;

/// A normalized item ready to be inserted. `url` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub title: String,
    pub url: String,
    pub source_type: String,
    pub source_name: String,
    pub description: String,
    pub thumbnail: String,
    pub published_at: DateTime<Utc>,
    pub estimated_duration: Option<i64>,
}

/// A row of the `content` table as exposed to the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct ContentRecord {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub source_type: Option<String>,
    pub source_name: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: Option<DateTime<Utc>>,
    pub consumed: bool,
    pub score: i64,
    pub estimated_duration: Option<i64>,
}

/// Aggregate view of the table, as shown next to the viewer's list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    pub total: u64,
    pub consumed: u64,
    pub unconsumed: u64,
    pub total_duration_seconds: i64,
}

/// Result of a single insert attempt. A duplicate URL is an expected outcome,
/// not an error; real failures come back as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumedFilter {
    #[default]
    All,
    Consumed,
    Unconsumed,
}

impl ConsumedFilter {
    fn where_clause(self) -> &'static str {
        match self {
            ConsumedFilter::All => "",
            ConsumedFilter::Consumed => "WHERE consumed = 1",
            ConsumedFilter::Unconsumed => "WHERE consumed = 0",
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, title, url, source_type, source_name, description, thumbnail,
           published_at, collected_at, consumed, score, estimated_duration
    FROM content
"#;

/// `journal_mode` answers with the resulting mode, so it has to go through
/// `query`; `execute` rejects statements that return rows.
async fn configure_connection(conn: &Connection) -> Result<()> {
    let mut rows = conn
        .query("PRAGMA journal_mode=WAL", params![])
        .await
        .context("enabling WAL journal")?;
    while rows.next().await?.is_some() {}
    conn.execute("PRAGMA synchronous=NORMAL", params![])
        .await
        .context("setting synchronous=NORMAL")?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            url TEXT UNIQUE NOT NULL,
            source_type TEXT,
            source_name TEXT,
            description TEXT,
            thumbnail TEXT,
            published_at TEXT,
            collected_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            consumed INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            estimated_duration INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_content_consumed ON content(consumed);
        CREATE INDEX IF NOT EXISTS idx_content_source_type ON content(source_type);
        CREATE INDEX IF NOT EXISTS idx_content_published_at ON content(published_at DESC);
        "#,
    )
    .await?;
    Ok(())
}

/// Shared handle to the `content` table. Cloning is cheap and every clone
/// talks to the same database.
#[derive(Clone)]
pub struct ContentStore {
    conn: Connection,
}

impl ContentStore {
    pub async fn open(location: &StoreLocation) -> Result<Self> {
        match location {
            StoreLocation::Local(path) => Self::open_local(path).await,
            StoreLocation::Remote { url, auth_token } => {
                Self::open_remote(url, auth_token).await
            }
        }
    }

    /// Opens (and if necessary creates) the SQLite file and ensures the
    /// `content` table and its indexes exist.
    pub async fn open_local(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening content DB {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn)
            .await
            .context("creating content schema")?;
        debug!(path = %path.display(), "opened local content store");
        Ok(Self { conn })
    }

    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .with_context(|| format!("connecting to content DB {url}"))?;
        let conn = db.connect()?;
        ensure_schema(&conn)
            .await
            .context("creating content schema")?;
        debug!(url, "opened remote content store");
        Ok(Self { conn })
    }

    /// Inserts `item` unless a row with the same URL already exists.
    ///
    /// The conflict is resolved by the `url` unique constraint inside a single
    /// statement, so a duplicate never leaves partial state behind and every
    /// other failure surfaces as an error.
    pub async fn insert_content(&self, item: &NewContent) -> Result<InsertOutcome> {
        let published_at = item.published_at.to_rfc3339();
        let affected = self
            .conn
            .execute(
                r#"
                INSERT INTO content (
                    title, url, source_type, source_name, description,
                    thumbnail, published_at, estimated_duration
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(url) DO NOTHING
                "#,
                params![
                    item.title.as_str(),
                    item.url.as_str(),
                    item.source_type.as_str(),
                    item.source_name.as_str(),
                    item.description.as_str(),
                    item.thumbnail.as_str(),
                    published_at,
                    item.estimated_duration,
                ],
            )
            .await
            .with_context(|| format!("inserting {}", item.url))?;

        if affected == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Newest first, matching what the viewer shows.
    pub async fn list_content(&self, filter: ConsumedFilter) -> Result<Vec<ContentRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS} {} ORDER BY published_at DESC, id DESC",
            filter.where_clause()
        );
        let mut rows = self.conn.query(&sql, params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_content(&row)?);
        }
        Ok(records)
    }

    pub async fn get_content(&self, id: i64) -> Result<Option<ContentRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_content(&row)?)),
            None => Ok(None),
        }
    }

    /// Sets the consumed flag for one row. Returns `false` when no row has
    /// that id.
    pub async fn set_consumed(&self, id: i64, consumed: bool) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE content SET consumed = ?1 WHERE id = ?2",
                params![consumed as i64, id],
            )
            .await
            .with_context(|| format!("updating consumed flag of content {id}"))?;
        Ok(affected > 0)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.stats().await?.total)
    }

    /// Totals over the whole table in a single aggregate query. Rows without
    /// a known duration do not contribute to `total_duration_seconds`.
    pub async fn stats(&self) -> Result<ContentStats> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(consumed), 0),
                       COALESCE(SUM(estimated_duration), 0)
                FROM content
                "#,
                params![],
            )
            .await
            .context("computing content stats")?;
        let row = rows.next().await?.context("missing stats row")?;
        let total = row.get::<i64>(0)?.max(0) as u64;
        let consumed = row.get::<i64>(1)?.max(0) as u64;
        Ok(ContentStats {
            total,
            consumed,
            unconsumed: total.saturating_sub(consumed),
            total_duration_seconds: row.get(2)?,
        })
    }

    #[cfg(test)]
    pub(crate) async fn execute_for_tests(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).await?;
        Ok(())
    }
}

/// Column order must match `SELECT_COLUMNS`.
fn row_to_content(row: &Row) -> Result<ContentRecord> {
    let published_at: Option<String> = row.get(7)?;
    let collected_at: Option<String> = row.get(8)?;
    Ok(ContentRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        source_type: row.get(3)?,
        source_name: row.get(4)?,
        description: row.get(5)?,
        thumbnail: row.get(6)?,
        published_at: parse_timestamp(published_at.as_deref())?,
        collected_at: parse_timestamp(collected_at.as_deref())?,
        consumed: row.get::<i64>(9).map(|value| value != 0)?,
        score: row.get(10)?,
        estimated_duration: row.get(11)?,
    })
}

/// Accepts RFC 3339 as written by the collector and SQLite's own
/// `YYYY-MM-DD HH:MM:SS` for rows provisioned elsewhere.
fn parse_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("parsing stored timestamp {value:?}"))?;
    Ok(Some(naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_content(video_id: &str) -> NewContent {
        NewContent {
            title: format!("Video {video_id}"),
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            source_type: "youtube".into(),
            source_name: "Test Channel".into(),
            description: "desc".into(),
            thumbnail: "https://i.ytimg.com/vi/x/hqdefault.jpg".into(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            estimated_duration: Some(150),
        }
    }

    async fn create_store() -> Result<(tempfile::TempDir, ContentStore, PathBuf)> {
        let dir = tempdir()?;
        let path = dir.path().join("data/content.db");
        let store = ContentStore::open_local(&path).await?;
        Ok((dir, store, path))
    }

    #[tokio::test]
    async fn opens_store_and_creates_schema() -> Result<()> {
        let (_temp, _store, path) = create_store().await?;
        assert!(path.exists(), "database file should be created");

        // Reopening must be harmless.
        let store = ContentStore::open_local(&path).await?;
        let mut rows = store.conn.query("PRAGMA journal_mode", params![]).await?;
        let journal: String = rows.next().await?.context("missing journal_mode row")?.get(0)?;
        assert_eq!(journal.to_lowercase(), "wal");
        let mut rows = store.conn.query("PRAGMA synchronous", params![]).await?;
        let synchronous: i64 = rows.next().await?.context("missing synchronous row")?.get(0)?;
        assert_eq!(synchronous, 1, "synchronous should be NORMAL");

        for index in [
            "idx_content_consumed",
            "idx_content_source_type",
            "idx_content_published_at",
        ] {
            let mut rows = store
                .conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type='index' AND name=?1",
                    params![index],
                )
                .await?;
            let exists: Option<String> = rows
                .next()
                .await?
                .map(|row| row.get::<String>(0))
                .transpose()?;
            assert_eq!(exists.as_deref(), Some(index));
        }
        Ok(())
    }

    #[tokio::test]
    async fn insert_then_duplicate_keeps_one_row() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let item = sample_content("abc");

        assert_eq!(store.insert_content(&item).await?, InsertOutcome::Inserted);
        assert_eq!(store.count().await?, 1);

        let mut again = item.clone();
        again.title = "Retitled".into();
        assert_eq!(store.insert_content(&again).await?, InsertOutcome::Duplicate);
        assert_eq!(store.count().await?, 1);

        let stored = store.list_content(ConsumedFilter::All).await?;
        assert_eq!(stored[0].title, "Video abc", "duplicates never update rows");
        Ok(())
    }

    #[tokio::test]
    async fn inserted_rows_get_store_defaults() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let mut item = sample_content("defaults");
        item.estimated_duration = None;
        store.insert_content(&item).await?;

        let record = store
            .list_content(ConsumedFilter::All)
            .await?
            .pop()
            .expect("row stored");
        assert!(!record.consumed);
        assert_eq!(record.score, 0);
        assert_eq!(record.estimated_duration, None);
        assert_eq!(record.source_type.as_deref(), Some("youtube"));
        assert_eq!(record.published_at, Some(item.published_at));
        assert!(record.collected_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn genuine_failures_are_not_reported_as_duplicates() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store.execute_for_tests("DROP TABLE content").await?;
        assert!(store.insert_content(&sample_content("gone")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn list_content_filters_and_sorts() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;

        let mut old = sample_content("old");
        old.published_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut new = sample_content("new");
        new.published_at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        store.insert_content(&old).await?;
        store.insert_content(&new).await?;

        let all = store.list_content(ConsumedFilter::All).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].url, new.url);
        assert_eq!(all[1].url, old.url);

        assert!(store.set_consumed(all[1].id, true).await?);

        let consumed = store.list_content(ConsumedFilter::Consumed).await?;
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].url, old.url);

        let unconsumed = store.list_content(ConsumedFilter::Unconsumed).await?;
        assert_eq!(unconsumed.len(), 1);
        assert_eq!(unconsumed[0].url, new.url);
        Ok(())
    }

    #[tokio::test]
    async fn set_consumed_round_trip_and_unknown_id() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store.insert_content(&sample_content("flag")).await?;
        let id = store.list_content(ConsumedFilter::All).await?[0].id;

        assert!(store.set_consumed(id, true).await?);
        assert!(store.get_content(id).await?.expect("row").consumed);
        assert!(store.set_consumed(id, false).await?);
        assert!(!store.get_content(id).await?.expect("row").consumed);

        assert!(!store.set_consumed(id + 100, true).await?);
        assert!(store.get_content(id + 100).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stats_aggregate_counts_and_known_durations() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        assert_eq!(store.stats().await?, ContentStats::default());

        let mut unknown = sample_content("unknown");
        unknown.estimated_duration = None;
        let mut long = sample_content("long");
        long.estimated_duration = Some(3600);
        store.insert_content(&sample_content("short")).await?;
        store.insert_content(&unknown).await?;
        store.insert_content(&long).await?;

        let id = store
            .list_content(ConsumedFilter::All)
            .await?
            .into_iter()
            .find(|record| record.url == long.url)
            .expect("long row")
            .id;
        store.set_consumed(id, true).await?;

        assert_eq!(
            store.stats().await?,
            ContentStats {
                total: 3,
                consumed: 1,
                unconsumed: 2,
                total_duration_seconds: 3750,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_timestamp_accepts_both_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            parse_timestamp(Some("2024-03-04T05:06:07Z")).unwrap(),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(Some("2024-03-04 05:06:07")).unwrap(),
            Some(expected)
        );
        assert_eq!(parse_timestamp(None).unwrap(), None);
        assert_eq!(parse_timestamp(Some(" ")).unwrap(), None);
        assert!(parse_timestamp(Some("yesterday")).is_err());
    }
}
