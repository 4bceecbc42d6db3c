//! Conan's SQLite package index (`<home>/p/cache.sqlite3`).
//!
//! A cache created on Windows stores folder paths with backslashes. Conan
//! joins them verbatim, so they must be rewritten before a POSIX host uses
//! the cache.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// Tables holding a `path` column.
const PATH_TABLES: [&str; 2] = ["packages", "recipes"];

/// Location of the index inside a Conan home.
pub fn index_path(conan_home: &Path) -> PathBuf {
    conan_home.join("p").join("cache.sqlite3")
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Replace `\` with `/` in every stored path.
///
/// Returns the number of rows changed. Other columns are untouched.
pub fn fix_windows_paths(conan_home: &Path) -> Result<usize> {
    let db_path = index_path(conan_home);
    if !db_path.is_file() {
        anyhow::bail!("Conan package index not found: {}", db_path.display());
    }

    tracing::info!("fixing Windows paths in {}", db_path.display());

    let mut conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let tx = conn.transaction()?;

    let mut changed = 0;
    for table in PATH_TABLES {
        if !table_exists(&tx, table)? {
            tracing::debug!("index has no `{}` table", table);
            continue;
        }
        let sql = format!(
            "UPDATE {table} SET path = REPLACE(path, '\\', '/') WHERE path LIKE '%\\%'"
        );
        changed += tx
            .execute(&sql, [])
            .with_context(|| format!("failed to rewrite paths in `{}`", table))?;
    }

    tx.commit()?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_index(home: &Path) -> Connection {
        std::fs::create_dir_all(home.join("p")).unwrap();
        let conn = Connection::open(index_path(home)).unwrap();
        conn.execute_batch(
            "CREATE TABLE recipes (reference TEXT, rrev TEXT, path TEXT, timestamp REAL);
             CREATE TABLE packages (reference TEXT, rrev TEXT, pkgid TEXT, path TEXT, build_id TEXT);
             INSERT INTO recipes VALUES ('zlib/1.3', 'r1', 'b\\zlib1d2c3\\e', 1.5);
             INSERT INTO packages VALUES ('zlib/1.3', 'r1', 'p1', 'b\\zlib4e5f6\\p', 'a\\b');
             INSERT INTO packages VALUES ('expat/2.5.0', 'r2', 'p2', 'b/expat/p', NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_fix_windows_paths_rewrites_only_paths() {
        let tmp = TempDir::new().unwrap();
        drop(create_index(tmp.path()));

        let changed = fix_windows_paths(tmp.path()).unwrap();
        assert_eq!(changed, 2);

        let conn = Connection::open(index_path(tmp.path())).unwrap();
        let rows: Vec<(String, String, Option<String>)> = conn
            .prepare("SELECT pkgid, path, build_id FROM packages ORDER BY pkgid")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                ("p1".to_string(), "b/zlib4e5f6/p".to_string(), Some("a\\b".to_string())),
                ("p2".to_string(), "b/expat/p".to_string(), None),
            ]
        );

        let (path, timestamp): (String, f64) = conn
            .query_row("SELECT path, timestamp FROM recipes", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(path, "b/zlib1d2c3/e");
        assert_eq!(timestamp, 1.5);

        assert_eq!(fix_windows_paths(tmp.path()).unwrap(), 0);
    }

    #[test]
    fn test_fix_windows_paths_without_recipes_table() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("p")).unwrap();
        let conn = Connection::open(index_path(tmp.path())).unwrap();
        conn.execute_batch(
            "CREATE TABLE packages (path TEXT); INSERT INTO packages VALUES ('a\\b');",
        )
        .unwrap();
        drop(conn);

        assert_eq!(fix_windows_paths(tmp.path()).unwrap(), 1);
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(fix_windows_paths(tmp.path()).is_err());
    }
}
