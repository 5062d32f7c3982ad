use crate::error::{MonitorError, Result};
use crate::models::config::{MonitorConfig, RetentionPolicy};
use crate::models::history::{Delta, HistorySeries};
use crate::models::metric::MetricKey;
use crate::models::snapshot::{ElementCounts, MetricsSnapshot};
use crate::models::tool::ToolKind;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const DB_SCHEMA_VERSION: i64 = 3;

const COUNT_COLUMNS: [&str; 6] = [
    "total_functions",
    "total_classes",
    "total_lines",
    "total_code_lines",
    "style_issues",
    "doc_issues",
];

pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 3 {
        apply_migration_3(conn)?;
        version = 3;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("history schema version {version} is newer than this build ({DB_SCHEMA_VERSION})");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    let metric_columns: String = MetricKey::ALL
        .iter()
        .map(|key| format!("{} REAL,\n", key.name()))
        .collect();
    let count_columns: String = COUNT_COLUMNS
        .iter()
        .map(|name| format!("{name} INTEGER,\n"))
        .collect();

    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_dir TEXT NOT NULL,
            captured_at_ms INTEGER NOT NULL,
            {metric_columns}{count_columns}failed_tools TEXT NOT NULL DEFAULT '[]',
            skipped_tools TEXT NOT NULL DEFAULT '[]',
            raw_data TEXT NOT NULL DEFAULT '{{}}'
        );
        "
    ))
}

fn apply_migration_2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_source_time ON snapshots(source_dir, captured_at_ms);",
    )
}

// Series are read back in insertion order.
fn apply_migration_3(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_source_id ON snapshots(source_dir, id);",
    )
}

/// Append-only snapshot series of one source directory. Every operation
/// opens its own connection, so readers never share state with the writer.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    db_path: PathBuf,
    source_dir: String,
}

impl HistoryStore {
    pub fn open(db_path: impl Into<PathBuf>, source_dir: impl Into<String>) -> Result<Self> {
        let store = Self {
            db_path: db_path.into(),
            source_dir: source_dir.into(),
        };
        if let Some(parent) = store.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::io(e, parent))?;
        }
        store.connection()?;
        Ok(store)
    }

    pub fn for_config(config: &MonitorConfig) -> Result<Self> {
        Self::open(&config.history_path, config.source_dir_label())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        initialize_schema(&conn)?;
        Ok(conn)
    }

    pub fn persist(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let conn = self.connection()?;
        let raw_data = serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string());

        let metric_names: Vec<&str> = MetricKey::ALL.iter().map(|key| key.name()).collect();
        let columns = [
            vec!["source_dir", "captured_at_ms"],
            metric_names,
            COUNT_COLUMNS.to_vec(),
            vec!["failed_tools", "skipped_tools", "raw_data"],
        ]
        .concat();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let mut values: Vec<rusqlite::types::Value> = vec![
            snapshot.source_dir.clone().into(),
            snapshot.captured_at_ms.into(),
        ];
        values.extend(MetricKey::ALL.iter().map(|key| optional_real(snapshot.value(*key))));
        values.extend(count_values(&snapshot.counts).into_iter().map(optional_integer));
        values.push(tool_set_json(&snapshot.failed_tools).into());
        values.push(tool_set_json(&snapshot.skipped_tools).into());
        values.push(raw_data.into());

        conn.execute(
            &format!(
                "INSERT INTO snapshots ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ),
            rusqlite::params_from_iter(values),
        )?;
        Ok(())
    }

    /// Last `n` snapshots of this directory, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<MetricsSnapshot>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM snapshots
             WHERE source_dir = ?1
             ORDER BY id DESC
             LIMIT ?2",
            select_columns()
        ))?;
        let mut snapshots = stmt
            .query_map(params![self.source_dir, n as i64], row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        snapshots.reverse();
        Ok(snapshots)
    }

    pub fn series(&self, n: usize) -> Result<HistorySeries> {
        Ok(HistorySeries::new(self.recent(n)?))
    }

    /// Last `window` values of one metric, oldest first. Unmeasured cycles
    /// stay in the sequence as `None`.
    pub fn trend(&self, metric: MetricKey, window: usize) -> Result<Vec<Option<f64>>> {
        let mut values = self.latest_values(metric, window)?;
        values.reverse();
        Ok(values)
    }

    pub fn delta(&self, metric: MetricKey) -> Result<Delta> {
        let values = self.latest_values(metric, 2)?;
        Ok(match values.as_slice() {
            [Some(current), Some(previous)] => Delta::Change(current - previous),
            [_, _] => Delta::Unavailable,
            _ => Delta::NoPriorData,
        })
    }

    // Newest first.
    fn latest_values(&self, metric: MetricKey, limit: usize) -> Result<Vec<Option<f64>>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM snapshots
             WHERE source_dir = ?1
             ORDER BY id DESC
             LIMIT ?2",
            metric.name()
        ))?;
        let values = stmt
            .query_map(params![self.source_dir, limit as i64], |row| row.get::<_, Option<f64>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    /// Drops snapshots older than the age limit, then everything beyond the
    /// newest `max_snapshots`. Returns the number of rows removed.
    pub fn prune(&self, policy: RetentionPolicy) -> Result<usize> {
        let conn = self.connection()?;
        let cutoff = chrono::Utc::now().timestamp_millis()
            - i64::from(policy.max_age_days) * 24 * 60 * 60 * 1000;

        let tx = conn.unchecked_transaction()?;
        let mut removed = tx.execute(
            "DELETE FROM snapshots WHERE source_dir = ?1 AND captured_at_ms < ?2",
            params![self.source_dir, cutoff],
        )?;
        removed += tx.execute(
            "DELETE FROM snapshots
             WHERE source_dir = ?1
               AND id NOT IN (
                   SELECT id FROM snapshots
                   WHERE source_dir = ?1
                   ORDER BY id DESC
                   LIMIT ?2
               )",
            params![self.source_dir, policy.max_snapshots as i64],
        )?;
        tx.commit()?;

        if removed > 0 {
            log::debug!("pruned {removed} snapshots of {}", self.source_dir);
        }
        Ok(removed)
    }
}

fn select_columns() -> String {
    let mut columns = vec!["captured_at_ms", "source_dir"];
    columns.extend(MetricKey::ALL.iter().map(|key| key.name()));
    columns.extend(COUNT_COLUMNS);
    columns.extend(["failed_tools", "skipped_tools"]);
    columns.join(", ")
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<MetricsSnapshot> {
    let mut snapshot = MetricsSnapshot::empty(row.get::<_, String>(1)?, row.get(0)?);
    let mut index = 2;
    for key in MetricKey::ALL {
        *snapshot.slot_mut(key) = row.get(index)?;
        index += 1;
    }

    let mut counts: [Option<u64>; 6] = [None; 6];
    for slot in counts.iter_mut() {
        *slot = row.get::<_, Option<i64>>(index)?.map(|v| v.max(0) as u64);
        index += 1;
    }
    let [total_functions, total_classes, total_lines, total_code_lines, style_issues, doc_issues] =
        counts;
    snapshot.counts = ElementCounts {
        total_functions,
        total_classes,
        total_lines,
        total_code_lines,
        style_issues,
        doc_issues,
    };

    snapshot.failed_tools = parse_tool_set(&row.get::<_, String>(index)?);
    snapshot.skipped_tools = parse_tool_set(&row.get::<_, String>(index + 1)?);
    Ok(snapshot)
}

fn count_values(counts: &ElementCounts) -> [Option<u64>; 6] {
    [
        counts.total_functions,
        counts.total_classes,
        counts.total_lines,
        counts.total_code_lines,
        counts.style_issues,
        counts.doc_issues,
    ]
}

fn optional_real(value: Option<f64>) -> rusqlite::types::Value {
    match value {
        Some(v) if v.is_finite() => rusqlite::types::Value::Real(v),
        _ => rusqlite::types::Value::Null,
    }
}

fn optional_integer(value: Option<u64>) -> rusqlite::types::Value {
    match value {
        Some(v) => rusqlite::types::Value::Integer(i64::try_from(v).unwrap_or(i64::MAX)),
        None => rusqlite::types::Value::Null,
    }
}

fn tool_set_json(tools: &BTreeSet<ToolKind>) -> String {
    serde_json::to_string(tools).unwrap_or_else(|_| "[]".to_string())
}

fn parse_tool_set(json: &str) -> BTreeSet<ToolKind> {
    serde_json::from_str(json).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(tmp: &tempfile::TempDir, source: &str) -> HistoryStore {
        HistoryStore::open(tmp.path().join(".viberdash/history.db"), source).unwrap()
    }

    fn snapshot(ms: i64, coverage: Option<f64>) -> MetricsSnapshot {
        let mut s = MetricsSnapshot::empty("src", ms);
        s.test_coverage = coverage;
        s
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[test]
    fn open_creates_database_and_sets_schema_version() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp, "src");
        assert!(store.db_path().exists());

        let conn = Connection::open(store.db_path()).unwrap();
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, DB_SCHEMA_VERSION);
    }

    #[test]
    fn persist_then_recent_round_trips_every_field() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp, "src");

        let mut original = snapshot(now_ms(), None);
        original.avg_complexity = Some(3.25);
        original.code_duplication = Some(0.0);
        original.counts.total_functions = Some(12);
        original.failed_tools.insert(ToolKind::Coverage);
        original.skipped_tools.insert(ToolKind::Duplication);
        store.persist(&original).unwrap();

        let loaded = store.recent(10).unwrap();
        assert_eq!(loaded, vec![original]);
        assert_eq!(loaded[0].test_coverage, None);
        assert_eq!(loaded[0].code_duplication, Some(0.0));
    }

    #[test]
    fn delta_and_trend_on_consecutive_snapshots() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp, "src");
        let base = now_ms();

        store.persist(&snapshot(base, Some(70.0))).unwrap();
        assert_eq!(store.delta(MetricKey::TestCoverage).unwrap(), Delta::NoPriorData);

        store.persist(&snapshot(base + 1_000, Some(75.0))).unwrap();
        assert_eq!(store.delta(MetricKey::TestCoverage).unwrap(), Delta::Change(5.0));
        assert_eq!(
            store.trend(MetricKey::TestCoverage, 2).unwrap(),
            vec![Some(70.0), Some(75.0)]
        );
    }

    #[test]
    fn insertion_order_wins_over_capture_time() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp, "src");
        let base = now_ms();

        store.persist(&snapshot(base + 2_000, Some(70.0))).unwrap();
        store.persist(&snapshot(base + 1_000, Some(75.0))).unwrap();

        assert_eq!(store.delta(MetricKey::TestCoverage).unwrap(), Delta::Change(5.0));
        assert_eq!(
            store.trend(MetricKey::TestCoverage, 2).unwrap(),
            vec![Some(70.0), Some(75.0)]
        );
        let recent = store.recent(1).unwrap();
        assert_eq!(recent[0].test_coverage, Some(75.0));
    }

    #[test]
    fn unavailable_values_never_produce_a_numeric_delta() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp, "src");
        let base = now_ms();
        store.persist(&snapshot(base, Some(70.0))).unwrap();
        store.persist(&snapshot(base + 1, None)).unwrap();

        assert_eq!(store.delta(MetricKey::TestCoverage).unwrap(), Delta::Unavailable);
        assert_eq!(store.trend(MetricKey::TestCoverage, 5).unwrap(), vec![Some(70.0), None]);
    }

    #[test]
    fn series_are_kept_per_source_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let first = store(&tmp, "src");
        let second = store(&tmp, "lib");
        first.persist(&snapshot(now_ms(), Some(50.0))).unwrap();

        assert_eq!(first.recent(5).unwrap().len(), 1);
        assert!(second.recent(5).unwrap().is_empty());
        assert_eq!(second.delta(MetricKey::TestCoverage).unwrap(), Delta::NoPriorData);
    }

    #[test]
    fn prune_applies_count_and_age_limits() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp, "src");
        let base = now_ms();
        let forty_days_ms = 40 * 24 * 60 * 60 * 1000;

        store.persist(&snapshot(base - forty_days_ms, Some(1.0))).unwrap();
        for i in 0..5 {
            store.persist(&snapshot(base + i, Some(i as f64))).unwrap();
        }

        let removed = store
            .prune(RetentionPolicy { max_snapshots: 3, max_age_days: 30 })
            .unwrap();
        assert_eq!(removed, 3);
        let remaining = store.recent(10).unwrap();
        let values: Vec<Option<f64>> = remaining.iter().map(|s| s.test_coverage).collect();
        assert_eq!(values, vec![Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn unwritable_location_is_a_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let result = HistoryStore::open(blocker.join("history.db"), "src");
        assert!(result.is_err());
    }
}
