use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::batch::RunContext;
use crate::parser::record::NOT_FOUND;
use crate::parser::{ExtractedRecord, RecordBatch};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            run_id     TEXT PRIMARY KEY,
            profile    TEXT NOT NULL,
            operator   TEXT NOT NULL,
            documents  INTEGER NOT NULL,
            degraded   INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS records (
            id           INTEGER PRIMARY KEY,
            run_id       TEXT NOT NULL REFERENCES runs(run_id),
            position     INTEGER NOT NULL,
            arquivo      TEXT NOT NULL,
            processed_at TEXT,
            entries      TEXT NOT NULL,
            erro         TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_records_run_pos ON records(run_id, position);
        ",
    )?;
    Ok(())
}

// ── Runs ──

pub fn save_run(
    conn: &Connection,
    ctx: &RunContext,
    profile: &str,
    batch: &RecordBatch,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO runs (run_id, profile, operator, documents, degraded)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            ctx.run_id,
            profile,
            ctx.operator,
            batch.len() as i64,
            batch.degraded_count() as i64,
        ],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO records (run_id, position, arquivo, processed_at, entries, erro)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (i, r) in batch.records().iter().enumerate() {
            let entries = serde_json::to_string(&r.entries())?;
            let (processed_at, erro) = match r {
                ExtractedRecord::Extracted { processed_at, .. } => {
                    (Some(processed_at.as_str()), None)
                }
                ExtractedRecord::Degraded { error, .. } => (None, Some(error.as_str())),
            };
            stmt.execute(rusqlite::params![
                ctx.run_id,
                i as i64,
                r.source(),
                processed_at,
                entries,
                erro,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub struct RunRow {
    pub run_id: String,
    pub profile: String,
    pub operator: String,
    pub documents: usize,
    pub degraded: usize,
    pub created_at: String,
}

pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, profile, operator, documents, degraded, created_at
         FROM runs ORDER BY created_at DESC, run_id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                run_id: row.get(0)?,
                profile: row.get(1)?,
                operator: row.get(2)?,
                documents: row.get(3)?,
                degraded: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Records ──

pub struct StoredRecord {
    pub run_id: String,
    pub position: usize,
    pub entries: Vec<(String, String)>,
}

impl StoredRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub fn fetch_records(
    conn: &Connection,
    run_id: Option<&str>,
    limit: usize,
) -> Result<Vec<StoredRecord>> {
    let sql = format!(
        "SELECT run_id, position, entries FROM records{}
         ORDER BY id DESC LIMIT {}",
        if run_id.is_some() { " WHERE run_id = ?1" } else { "" },
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = match run_id {
        Some(id) => stmt.query_map([id], raw_record)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], raw_record)?.collect::<Result<Vec<_>, _>>()?,
    };

    let mut rows = Vec::with_capacity(raw.len());
    for (run_id, position, json) in raw.into_iter().rev() {
        let entries: Vec<(String, String)> = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt entries for {} #{}", run_id, position))?;
        rows.push(StoredRecord {
            run_id,
            position,
            entries,
        });
    }
    Ok(rows)
}

fn raw_record(row: &rusqlite::Row) -> rusqlite::Result<(String, usize, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub documents: usize,
    pub degraded: usize,
    /// Per field, how many stored records hold the not-found value.
    pub not_found: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let documents: usize = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
    let degraded: usize = conn.query_row(
        "SELECT COUNT(*) FROM records WHERE erro IS NOT NULL",
        [],
        |r| r.get(0),
    )?;

    let mut not_found: Vec<(String, usize)> = Vec::new();
    let mut stmt = conn.prepare("SELECT entries FROM records WHERE erro IS NULL ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let json: String = row.get(0)?;
        let entries: Vec<(String, String)> = serde_json::from_str(&json)?;
        for (key, value) in entries {
            let idx = match not_found.iter().position(|(k, _)| *k == key) {
                Some(i) => i,
                None => {
                    not_found.push((key, 0));
                    not_found.len() - 1
                }
            };
            if value == NOT_FOUND {
                not_found[idx].1 += 1;
            }
        }
    }
    not_found.retain(|(_, n)| *n > 0);

    Ok(Stats {
        runs,
        documents,
        degraded,
        not_found,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Engine, Profile};

    fn setup() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("extrator.sqlite")).unwrap();
        init_schema(&conn).unwrap();
        (dir, conn)
    }

    fn sample_batch(engine: &Engine) -> RecordBatch {
        RecordBatch::from_records(
            engine.rules(),
            vec![
                engine.extract("Nome: Ana\nCPF: 111.222.333-44", "a.pdf"),
                ExtractedRecord::degraded("b.pdf", "document has no pages"),
                engine.extract("Nome: Bruno", "c.pdf"),
            ],
        )
    }

    #[test]
    fn save_and_fetch_run() {
        let (_dir, conn) = setup();
        let engine = Engine::with_profile(Profile::Minimal).unwrap();
        let ctx = RunContext::new("operador");
        save_run(&conn, &ctx, "minimal", &sample_batch(&engine)).unwrap();

        let runs = fetch_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].documents, 3);
        assert_eq!(runs[0].degraded, 1);
        assert_eq!(runs[0].operator, "operador");
        assert_eq!(runs[0].profile, "minimal");

        let records = fetch_records(&conn, Some(&ctx.run_id), 10).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].position, 0);
        assert_eq!(records[0].get("Arquivo"), Some("a.pdf"));
        assert_eq!(records[0].get("CPF"), Some("111.222.333-44"));
        assert_eq!(records[1].get("Erro"), Some("document has no pages"));
        assert_eq!(records[1].entries.len(), 2);
        assert_eq!(records[2].get("CPF"), Some(NOT_FOUND));
    }

    #[test]
    fn back_to_back_runs_stay_separate() {
        let (_dir, conn) = setup();
        let engine = Engine::with_profile(Profile::Minimal).unwrap();
        let first = RunContext::new("op-a");
        let second = RunContext::new("op-b");
        assert_ne!(first.run_id, second.run_id);

        save_run(&conn, &first, "minimal", &sample_batch(&engine)).unwrap();
        let single = RecordBatch::from_records(
            engine.rules(),
            vec![engine.extract("Nome: Bia", "d.pdf")],
        );
        save_run(&conn, &second, "minimal", &single).unwrap();

        assert_eq!(fetch_runs(&conn, 10).unwrap().len(), 2);
        let names = |id: &str| -> Vec<String> {
            fetch_records(&conn, Some(id), 10)
                .unwrap()
                .iter()
                .filter_map(|r| r.get("Arquivo").map(str::to_string))
                .collect()
        };
        assert_eq!(names(&first.run_id), vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(names(&second.run_id), vec!["d.pdf"]);
    }

    #[test]
    fn duplicate_run_id_is_rejected() {
        let (_dir, conn) = setup();
        let engine = Engine::with_profile(Profile::Minimal).unwrap();
        let ctx = RunContext::new("op");
        save_run(&conn, &ctx, "minimal", &sample_batch(&engine)).unwrap();
        assert!(save_run(&conn, &ctx, "minimal", &sample_batch(&engine)).is_err());
        assert_eq!(fetch_records(&conn, Some(&ctx.run_id), 10).unwrap().len(), 3);
    }

    #[test]
    fn fetch_records_limit_keeps_latest() {
        let (_dir, conn) = setup();
        let engine = Engine::with_profile(Profile::Minimal).unwrap();
        save_run(&conn, &RunContext::new("op"), "minimal", &sample_batch(&engine)).unwrap();

        let records = fetch_records(&conn, None, 2).unwrap();
        let names: Vec<&str> = records.iter().filter_map(|r| r.get("Arquivo")).collect();
        assert_eq!(names, vec!["b.pdf", "c.pdf"]);
    }

    #[test]
    fn stats_count_missing_fields() {
        let (_dir, conn) = setup();
        let engine = Engine::with_profile(Profile::Minimal).unwrap();
        save_run(&conn, &RunContext::new("op"), "minimal", &sample_batch(&engine)).unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.runs, 1);
        assert_eq!(s.documents, 3);
        assert_eq!(s.degraded, 1);
        let missing: Vec<(&str, usize)> =
            s.not_found.iter().map(|(k, n)| (k.as_str(), *n)).collect();
        assert_eq!(missing, vec![("Unidade", 2), ("CPF", 1), ("Valor Total", 2)]);
    }

    #[test]
    fn connect_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("extrator.sqlite");
        let conn = connect(&path).unwrap();
        init_schema(&conn).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn schema_is_idempotent() {
        let (_dir, conn) = setup();
        init_schema(&conn).unwrap();
    }
}
