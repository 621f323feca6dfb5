//! One-time schema translation between database files.
//!
//! Offline and non-interactive: every record of an old database is copied
//! into a freshly created one, passed through a per-row translation. This
//! is the only supported form of schema change; the record store itself
//! never migrates tables in place.

use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use crate::catalog::FileRecord;
use crate::error::{Error, Result};
use crate::store::Table;

/// Copy every record from `old_db` into `new_db`, applying `translate` to
/// each row. `new_db` must not already exist.
pub fn map_data<F>(old_db: &Path, new_db: &Path, translate: F) -> Result<usize>
where
    F: Fn(FileRecord) -> FileRecord,
{
    if !old_db.exists() {
        return Err(Error::validation(format!(
            "source database does not exist: {}",
            old_db.display()
        )));
    }
    if new_db.exists() {
        return Err(Error::validation(format!(
            "target database already exists: {}",
            new_db.display()
        )));
    }

    let old_conn = Connection::open(old_db)?;
    let old_table: Table<FileRecord> = Table::create(&old_conn)?;
    let rows = old_table.get(&old_conn, &[], &[])?;

    let new_conn = Connection::open(new_db)?;
    let new_table: Table<FileRecord> = Table::create(&new_conn)?;

    new_conn.execute_batch("BEGIN")?;
    let mut copied = 0;
    for row in rows {
        let row = translate(row);
        new_table.insert(&new_conn, &row.to_values())?;
        copied += 1;
    }
    new_conn.execute_batch("COMMIT")?;

    info!(copied, "schema translation finished");
    Ok(copied)
}

/// Normalize a thumbnail stored as a full path down to its bare filename.
/// Records without a thumbnail pass through unchanged.
pub fn normalize_thumbnail(mut record: FileRecord) -> FileRecord {
    if let Some(thumbnail) = record.thumbnail.take() {
        let bare = Path::new(&thumbnail)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        record.thumbnail = bare.or(Some(thumbnail));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, NoThumbnailer, StubExtractor};
    use crate::catalog::Store;
    use crate::store::Direction;
    use tempfile::tempdir;

    fn seeded_store(root: &Path) -> Store {
        let config = test_config(root);
        config.ensure_dirs().unwrap();
        let store = Store::with_collaborators(
            config,
            Box::new(StubExtractor::default()),
            Box::new(NoThumbnailer),
        )
        .unwrap();
        let path = root.join("uploads/a.jpg");
        std::fs::write(&path, b"content").unwrap();
        store.process(&path).unwrap();
        store
    }

    #[test]
    fn copies_rows_into_fresh_database() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let old_db = store.config().db_path.clone();
        drop(store);

        let new_db = dir.path().join("new.sqlite3");
        let copied = map_data(&old_db, &new_db, |row| row).unwrap();
        assert_eq!(copied, 1);

        let mut config = test_config(dir.path());
        config.db_path = new_db;
        let reopened = Store::with_collaborators(
            config,
            Box::new(StubExtractor::default()),
            Box::new(NoThumbnailer),
        )
        .unwrap();
        let records = reopened.get_all(None, Direction::Descending).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fname, "a.jpg");
    }

    #[test]
    fn refuses_existing_target() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let old_db = store.config().db_path.clone();
        drop(store);

        let new_db = dir.path().join("new.sqlite3");
        std::fs::write(&new_db, b"").unwrap();
        let err = map_data(&old_db, &new_db, |row| row).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn thumbnail_paths_are_normalized_to_filenames() {
        let ts = chrono::NaiveDate::from_ymd_opt(2023, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let record = crate::catalog::FileRecord {
            fname: "a.jpg".to_string(),
            hash_sha256: "0".to_string(),
            time_db_added: ts,
            time_db_updated: ts,
            deleted: false,
            desc: String::new(),
            exif: serde_json::json!({}),
            mime_type: "image/jpeg".to_string(),
            file_ts: ts,
            thumbnail: Some("./thumbnails/a.jpg.png".to_string()),
            tags: Vec::new(),
        };
        let translated = normalize_thumbnail(record);
        assert_eq!(translated.thumbnail.as_deref(), Some("a.jpg.png"));

        let none = normalize_thumbnail(crate::catalog::FileRecord {
            thumbnail: None,
            ..translated
        });
        assert_eq!(none.thumbnail, None);
    }
}
