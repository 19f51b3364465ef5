use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaChange {
    pub keys: Vec<String>,
}

/// Flat string key/value storage shared by every context of an install.
///
/// Every successful `set` or `remove` notifies all subscribers, the writer
/// included.
pub trait StorageArea: Send + Sync {
    fn get_all(&self) -> Result<BTreeMap<String, String>>;
    fn set(&self, items: BTreeMap<String, String>) -> Result<()>;
    fn remove(&self, keys: &[String]) -> Result<()>;
    fn subscribe(&self) -> Receiver<AreaChange>;

    fn poll_changes(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Subscribers {
    senders: Mutex<Vec<Sender<AreaChange>>>,
}

impl Subscribers {
    fn subscribe(&self) -> Receiver<AreaChange> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    fn notify(&self, change: AreaChange) {
        self.senders
            .lock()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }
}

#[derive(Debug)]
pub struct MemoryArea {
    items: Mutex<BTreeMap<String, String>>,
    subscribers: Subscribers,
    available: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            subscribers: Subscribers::default(),
            available: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("storage: area unavailable");
        }
        Ok(())
    }
}

impl Default for MemoryArea {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageArea for MemoryArea {
    fn get_all(&self) -> Result<BTreeMap<String, String>> {
        self.ensure_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().clone())
    }

    fn set(&self, items: BTreeMap<String, String>) -> Result<()> {
        self.ensure_available()?;
        let keys = items.keys().cloned().collect();
        self.items.lock().extend(items);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.subscribers.notify(AreaChange { keys });
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        self.ensure_available()?;
        {
            let mut items = self.items.lock();
            for key in keys {
                items.remove(key);
            }
        }
        self.subscribers.notify(AreaChange {
            keys: keys.to_vec(),
        });
        Ok(())
    }

    fn subscribe(&self) -> Receiver<AreaChange> {
        self.subscribers.subscribe()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct SqliteArea {
    conn: Arc<Mutex<Connection>>,
    subscribers: Subscribers,
    data_version: Mutex<i64>,
}

impl SqliteArea {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;
        let version = data_version(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: Subscribers::default(),
            data_version: Mutex::new(version),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }
}

impl StorageArea for SqliteArea {
    fn get_all(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM items")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .context("storage: read items")?;
        Ok(rows)
    }

    fn set(&self, items: BTreeMap<String, String>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = items.keys().cloned().collect();
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    r#"
INSERT INTO items (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
                )?;
                let now = unix_now();
                for (key, value) in &items {
                    stmt.execute(params![key, value, now])?;
                }
            }
            tx.commit().context("storage: commit items")?;
        }
        self.subscribers.notify(AreaChange { keys });
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let placeholders = keys
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(",");
        {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare(&format!("DELETE FROM items WHERE key IN ({})", placeholders))?;
            stmt.execute(rusqlite::params_from_iter(keys.iter()))
                .context("storage: delete items")?;
        }
        self.subscribers.notify(AreaChange {
            keys: keys.to_vec(),
        });
        Ok(())
    }

    fn subscribe(&self) -> Receiver<AreaChange> {
        self.subscribers.subscribe()
    }

    fn poll_changes(&self) -> Result<()> {
        let current = data_version(&self.conn.lock())?;
        let changed = {
            let mut seen = self.data_version.lock();
            let changed = *seen != current;
            *seen = current;
            changed
        };
        if changed {
            log::debug!("storage: database changed by another connection");
            self.subscribers.notify(AreaChange { keys: Vec::new() });
        }
        Ok(())
    }
}

fn data_version(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
        .context("storage: read data version")
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let migrations = migrations();
    for (idx, sql) in migrations.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, unix_now()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS items (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("readmark").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn items(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn memory_area_notifies_every_subscriber() {
        let area = MemoryArea::new();
        let first = area.subscribe();
        let second = area.subscribe();

        area.set(items(&[("p_1", "a")])).unwrap();
        area.remove(&["p_1".to_string()]).unwrap();

        for rx in [first, second] {
            let changes: Vec<_> = rx.try_iter().collect();
            assert_eq!(changes.len(), 2);
            assert_eq!(changes[0].keys, vec!["p_1".to_string()]);
            assert_eq!(changes[1].keys, vec!["p_1".to_string()]);
        }
        assert_eq!(area.write_count(), 1);
        assert!(area.get("p_1").is_none());
    }

    #[test]
    fn memory_area_can_fail() {
        let area = MemoryArea::default();
        area.set_available(false);
        assert!(area.get_all().is_err());
        assert!(area.set(items(&[("prefs", "{}")])).is_err());
        assert_eq!(area.write_count(), 0);
    }

    #[test]
    fn sqlite_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let area = SqliteArea::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());

        area.set(items(&[("p_1", "one"), ("p_2", "two")])).unwrap();
        area.set(items(&[("p_1", "uno")])).unwrap();
        area.remove(&["p_2".to_string()]).unwrap();
        assert_eq!(area.get_all().unwrap(), items(&[("p_1", "uno")]));
        area.close().unwrap();
    }

    #[test]
    fn sqlite_detects_other_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let ours = SqliteArea::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        let theirs = SqliteArea::open(Options { path: Some(path) }).unwrap();
        let rx = ours.subscribe();

        ours.poll_changes().unwrap();
        assert!(rx.try_recv().is_err());

        theirs.set(items(&[("p_9", "9")])).unwrap();
        ours.poll_changes().unwrap();
        let change = rx.try_recv().unwrap();
        assert!(change.keys.is_empty());
        assert_eq!(ours.get_all().unwrap().get("p_9").map(String::as_str), Some("9"));
    }
}
