//! The catalog: single source of truth for what the archive knows about
//! every tracked filename.
//!
//! Reconciliation compares what the filesystem says against what the catalog
//! says, one file at a time, and applies the minimal necessary mutation
//! (add, update, soft-delete). Records are never physically removed.

pub mod extract;
pub mod hashing;
pub mod record;
pub mod thumbs;
pub mod timestamps;

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{Direction, Table, Value};

pub use extract::{ExiftoolExtractor, MetadataExtractor};
pub use record::FileRecord;
pub use thumbs::{ExternalThumbnailer, Thumbnailer};

pub struct Store {
    conn: Connection,
    table: Table<FileRecord>,
    batch_depth: Cell<u32>,
    extractor: Box<dyn MetadataExtractor>,
    thumbnailer: Box<dyn Thumbnailer>,
    config: Config,
}

impl Store {
    /// Open with the production collaborators: exiftool for metadata,
    /// convert/ffmpeg/ffprobe for thumbnails.
    pub fn open(config: Config) -> Result<Self> {
        let thumbnailer =
            ExternalThumbnailer::new(config.thumbnail_dir.clone(), config.thumbnail_size);
        Self::with_collaborators(config, Box::new(ExiftoolExtractor), Box::new(thumbnailer))
    }

    /// Open with injected collaborators.
    pub fn with_collaborators(
        config: Config,
        extractor: Box<dyn MetadataExtractor>,
        thumbnailer: Box<dyn Thumbnailer>,
    ) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.db_path)?;
        let table = Table::create(&conn)?;
        Ok(Self {
            conn,
            table,
            batch_depth: Cell::new(0),
            extractor,
            thumbnailer,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Batch scope
    // ========================================================================

    /// Enter a deferred-commit scope. Scopes nest: only the outermost exit
    /// commits, so multi-file passes land as one durability unit while inner
    /// code may open scopes of its own.
    pub fn batch(&self) -> Result<BatchScope<'_>> {
        let depth = self.batch_depth.get();
        if depth == 0 {
            self.conn.execute_batch("BEGIN")?;
        }
        self.batch_depth.set(depth + 1);
        debug!(depth = depth + 1, "entered batch scope");
        Ok(BatchScope { store: self })
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile one file's catalog record with its current on-disk state.
    ///
    /// Metadata extraction failure is not an error here: it signals that the
    /// file is gone or unreadable and drives the soft-delete transition.
    pub fn process(&self, path: &Path) -> Result<()> {
        let fname = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::validation(format!("path has no filename: {}", path.display()))
            })?;

        let exif = self.extractor.extract(path);
        if exif.is_none() {
            debug!(fname = %fname, "no extractable metadata");
        }

        let existing = self.get_by_filename(&fname)?;

        match (existing, exif) {
            (None, Some(exif)) => self.add(path, &fname, exif),
            (Some(existing), None) => self.soft_delete(&existing),
            (None, None) => Ok(()),
            (Some(existing), Some(exif)) => {
                if self.same_content(path, &existing, &exif)? {
                    Ok(())
                } else {
                    self.update(path, &fname, exif)
                }
            }
        }
    }

    /// Content is unchanged iff the stored size and modify time match the
    /// fresh metadata and the stored hash matches a freshly computed one.
    /// The hash is always recomputed; size and mtime alone are not trusted.
    fn same_content(&self, path: &Path, existing: &FileRecord, exif: &JsonValue) -> Result<bool> {
        if existing.deleted {
            // a deleted record is inert; a reappearing file always refreshes it
            return Ok(false);
        }
        if existing.exif.get("FileSize") != exif.get("FileSize") {
            return Ok(false);
        }
        if existing.exif.get("FileModifyDate") != exif.get("FileModifyDate") {
            return Ok(false);
        }
        Ok(existing.hash_sha256 == hashing::hash_sha256(path)?)
    }

    fn add(&self, path: &Path, fname: &str, exif: JsonValue) -> Result<()> {
        info!(fname, "found new file");
        let ts = now();
        let file_ts = timestamps::derive_file_ts(&exif)?;
        let hash = hashing::hash_sha256(path)?;
        let mime_type = mime_type_of(&exif);
        let thumbnail = self.thumbnailer.generate(path, fname, &mime_type);

        self.table.insert(
            &self.conn,
            &[
                ("fname", Value::Text(fname.to_string())),
                ("hash_sha256", Value::Text(hash)),
                ("time_db_added", Value::Timestamp(ts)),
                ("time_db_updated", Value::Timestamp(ts)),
                ("deleted", Value::Boolean(false)),
                ("desc", Value::Text(String::new())),
                ("exif", Value::Json(exif)),
                ("mime_type", Value::Text(mime_type)),
                ("file_ts", Value::Timestamp(file_ts)),
                ("thumbnail", opt_text(thumbnail)),
                ("tags", Value::Json(JsonValue::Array(Vec::new()))),
            ],
        )?;
        Ok(())
    }

    fn update(&self, path: &Path, fname: &str, exif: JsonValue) -> Result<()> {
        info!(fname, "content changed, refreshing record");
        let file_ts = timestamps::derive_file_ts(&exif)?;
        let hash = hashing::hash_sha256(path)?;
        let mime_type = mime_type_of(&exif);
        let thumbnail = self.thumbnailer.generate(path, fname, &mime_type);

        // tags deliberately survive content changes: they are scoped to the
        // filename, not to the content
        self.table.update(
            &self.conn,
            &[
                ("hash_sha256", Value::Text(hash)),
                ("time_db_updated", Value::Timestamp(now())),
                ("deleted", Value::Boolean(false)),
                ("exif", Value::Json(exif)),
                ("mime_type", Value::Text(mime_type)),
                ("file_ts", Value::Timestamp(file_ts)),
                ("thumbnail", opt_text(thumbnail)),
            ],
            &[("fname", Value::Text(fname.to_string()))],
        )?;
        Ok(())
    }

    /// Mark a record deleted without touching anything else. No-op when the
    /// record is already deleted.
    pub fn soft_delete(&self, existing: &FileRecord) -> Result<()> {
        if existing.deleted {
            return Ok(());
        }
        info!(fname = %existing.fname, "file gone, soft-deleting record");
        self.table.update(
            &self.conn,
            &[
                ("deleted", Value::Boolean(true)),
                ("time_db_updated", Value::Timestamp(now())),
            ],
            &[("fname", Value::Text(existing.fname.clone()))],
        )?;
        Ok(())
    }

    // ========================================================================
    // Tag mutation
    // ========================================================================

    /// Apply `(existing − remove) ∪ add` to every named file's tag set.
    ///
    /// Validation failures and unknown filenames leave the catalog
    /// untouched. Files sharing an identical existing tag set are grouped so
    /// the new set is computed and encoded once per distinct state.
    pub fn update_tags(
        &self,
        fnames: &[String],
        add_tags: &[String],
        remove_tags: &[String],
    ) -> Result<String> {
        let fnames: BTreeSet<String> = fnames.iter().cloned().collect();
        let add_tags: BTreeSet<String> = add_tags.iter().cloned().collect();
        let remove_tags: BTreeSet<String> = remove_tags.iter().cloned().collect();

        if fnames.is_empty() {
            return Err(Error::validation("no files specified"));
        }
        if add_tags.is_empty() && remove_tags.is_empty() {
            return Err(Error::validation("no tag changes requested"));
        }
        for tag in add_tags.iter().chain(remove_tags.iter()) {
            if tag.chars().count() < 3 {
                return Err(Error::validation(format!("tag too short: {tag:?}")));
            }
        }

        let groups = self.files_grouped_by_tag_set(Some(&fnames))?;

        let _batch = self.batch()?;
        for (tags, group_fnames) in groups {
            let current: BTreeSet<String> = tags.into_iter().collect();
            let mut new_tags: BTreeSet<String> =
                current.difference(&remove_tags).cloned().collect();
            new_tags.extend(add_tags.iter().cloned());

            let encoded = Value::Json(JsonValue::Array(
                new_tags.iter().cloned().map(JsonValue::String).collect(),
            ));
            for fname in group_fnames {
                self.table.update(
                    &self.conn,
                    &[("tags", encoded.clone())],
                    &[("fname", Value::Text(fname))],
                )?;
            }
        }

        Ok(format!(
            "{} files: added {} tags, removed {} tags",
            fnames.len(),
            add_tags.len(),
            remove_tags.len()
        ))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All records, optionally filtered by deleted-state, ordered by file
    /// time. `Direction::Descending` puts the most recent first.
    pub fn get_all(&self, deleted: Option<bool>, direction: Direction) -> Result<Vec<FileRecord>> {
        let mut where_ = Vec::new();
        if let Some(deleted) = deleted {
            where_.push(("deleted", Value::Boolean(deleted)));
        }
        self.table
            .get(&self.conn, &where_, &[("file_ts", direction)])
    }

    pub fn get_by_filename(&self, fname: &str) -> Result<Option<FileRecord>> {
        let mut rows = self.table.get(
            &self.conn,
            &[("fname", Value::Text(fname.to_string()))],
            &[],
        )?;
        Ok(rows.pop())
    }

    /// Sorted union of every record's tags.
    pub fn get_all_tags(&self) -> Result<Vec<String>> {
        let records = self.table.get(&self.conn, &[], &[])?;
        let mut tags = BTreeSet::new();
        for record in records {
            tags.extend(record.tags);
        }
        Ok(tags.into_iter().collect())
    }

    /// Group filenames by their current (sorted) tag set. With `fnames`
    /// given, only those files are grouped and every one of them must have a
    /// record.
    pub fn files_grouped_by_tag_set(
        &self,
        fnames: Option<&BTreeSet<String>>,
    ) -> Result<BTreeMap<Vec<String>, Vec<String>>> {
        let records = self.table.get(&self.conn, &[], &[])?;

        if let Some(fnames) = fnames {
            let known: BTreeSet<&str> = records.iter().map(|r| r.fname.as_str()).collect();
            if let Some(missing) = fnames.iter().find(|f| !known.contains(f.as_str())) {
                return Err(Error::not_found(format!("no record for {missing:?}")));
            }
        }

        let mut groups: BTreeMap<Vec<String>, Vec<String>> = BTreeMap::new();
        for record in records {
            if fnames.map_or(true, |wanted| wanted.contains(&record.fname)) {
                let mut key = record.tags;
                key.sort();
                groups.entry(key).or_default().push(record.fname);
            }
        }
        Ok(groups)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Regenerate thumbnails for the named files, or for every non-deleted
    /// record when `fnames` is empty. A replaced thumbnail whose name
    /// changed is removed from disk.
    pub fn update_thumbnails(&self, fnames: &[String]) -> Result<()> {
        let records = if fnames.is_empty() {
            self.get_all(Some(false), Direction::Descending)?
        } else {
            let mut records = Vec::new();
            for fname in fnames {
                records.push(
                    self.get_by_filename(fname)?
                        .ok_or_else(|| Error::not_found(format!("no record for {fname:?}")))?,
                );
            }
            records
        };

        let _batch = self.batch()?;
        for record in records {
            let path = self.config.upload_path(&record.fname);
            let thumbnail = self
                .thumbnailer
                .generate(&path, &record.fname, &record.mime_type);

            if let Some(old) = &record.thumbnail {
                if thumbnail.as_deref() != Some(old.as_str()) {
                    let old_path = self.config.thumbnail_path(old);
                    if let Err(err) = std::fs::remove_file(&old_path) {
                        warn!(path = %old_path.display(), %err, "failed to remove stale thumbnail");
                    }
                }
            }

            self.table.update(
                &self.conn,
                &[("thumbnail", opt_text(thumbnail))],
                &[("fname", Value::Text(record.fname.clone()))],
            )?;
        }
        Ok(())
    }

    /// Total size of the upload directory, formatted like `du -sh`.
    pub fn upload_dir_disk_usage(&self) -> Result<String> {
        let mut total: u64 = 0;
        for entry in WalkDir::new(&self.config.upload_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(format_size(total))
    }
}

/// Guard for one level of batch nesting. Dropping the outermost guard
/// commits; inner guards only decrement the counter.
pub struct BatchScope<'a> {
    store: &'a Store,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        let depth = self.store.batch_depth.get() - 1;
        self.store.batch_depth.set(depth);
        if depth == 0 {
            if let Err(err) = self.store.conn.execute_batch("COMMIT") {
                warn!(%err, "commit at batch exit failed");
            } else {
                debug!("batch committed");
            }
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn mime_type_of(exif: &JsonValue) -> String {
    exif.get("MIMEType")
        .and_then(|v| v.as_str())
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn opt_text(value: Option<String>) -> Value {
    match value {
        Some(text) => Value::Text(text),
        None => Value::Null,
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
