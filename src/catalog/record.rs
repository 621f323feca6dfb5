use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::store::{Field, FieldKind, TableRecord, Value, TIMESTAMP_FORMAT};

/// One catalog row: the last-known state of one tracked filename, including
/// soft-deleted ones.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub fname: String,
    pub hash_sha256: String,
    pub time_db_added: NaiveDateTime,
    pub time_db_updated: NaiveDateTime,
    pub deleted: bool,
    pub desc: String,
    /// Raw extracted metadata, persisted as JSON text.
    pub exif: JsonValue,
    pub mime_type: String,
    /// Canonical file time, derived from the metadata timestamp chain.
    pub file_ts: NaiveDateTime,
    pub thumbnail: Option<String>,
    /// Stored as a sorted JSON list; order carries no meaning.
    pub tags: Vec<String>,
}

impl TableRecord for FileRecord {
    const TABLE: &'static str = "metadata";

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::with_qualifier("fname", FieldKind::Text, "unique"),
            Field::new("hash_sha256", FieldKind::Text),
            Field::new("time_db_added", FieldKind::Timestamp),
            Field::new("time_db_updated", FieldKind::Timestamp),
            Field::new("deleted", FieldKind::Boolean),
            Field::new("desc", FieldKind::Text),
            Field::new("exif", FieldKind::Json),
            Field::new("mime_type", FieldKind::Text),
            Field::new("file_ts", FieldKind::Timestamp),
            Field::new("thumbnail", FieldKind::Text),
            Field::new("tags", FieldKind::Json),
        ];
        FIELDS
    }

    fn from_row(values: Vec<Value>) -> Result<Self> {
        let [fname, hash_sha256, time_db_added, time_db_updated, deleted, desc, exif, mime_type, file_ts, thumbnail, tags] =
            <[Value; 11]>::try_from(values)
                .map_err(|v| Error::schema(format!("expected 11 columns, got {}", v.len())))?;

        Ok(FileRecord {
            fname: fname.into_text()?,
            hash_sha256: hash_sha256.into_text()?,
            time_db_added: time_db_added.into_timestamp()?,
            time_db_updated: time_db_updated.into_timestamp()?,
            deleted: deleted.into_boolean()?,
            desc: desc.into_text()?,
            exif: exif.into_json()?,
            mime_type: mime_type.into_text()?,
            file_ts: file_ts.into_timestamp()?,
            thumbnail: thumbnail.into_opt_text()?,
            tags: tags_from_json(tags.into_json()?)?,
        })
    }
}

impl FileRecord {
    /// Field/value pairs for re-inserting this record as-is.
    pub fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("fname", Value::Text(self.fname.clone())),
            ("hash_sha256", Value::Text(self.hash_sha256.clone())),
            ("time_db_added", Value::Timestamp(self.time_db_added)),
            ("time_db_updated", Value::Timestamp(self.time_db_updated)),
            ("deleted", Value::Boolean(self.deleted)),
            ("desc", Value::Text(self.desc.clone())),
            ("exif", Value::Json(self.exif.clone())),
            ("mime_type", Value::Text(self.mime_type.clone())),
            ("file_ts", Value::Timestamp(self.file_ts)),
            (
                "thumbnail",
                match &self.thumbnail {
                    Some(name) => Value::Text(name.clone()),
                    None => Value::Null,
                },
            ),
            ("tags", Value::Json(tags_to_json(&self.tags))),
        ]
    }

    /// The canonical file-time string, as used for search matching.
    pub fn file_ts_str(&self) -> String {
        self.file_ts.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Stored file size in bytes, from the extracted metadata.
    pub fn exif_file_size(&self) -> Option<i64> {
        match self.exif.get("FileSize") {
            Some(JsonValue::Number(n)) => n.as_i64(),
            Some(JsonValue::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

fn tags_from_json(value: JsonValue) -> Result<Vec<String>> {
    match value {
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::String(s) => Ok(s),
                other => Err(Error::schema(format!("non-string tag: {other}"))),
            })
            .collect(),
        other => Err(Error::schema(format!("tags are not a list: {other}"))),
    }
}

pub(crate) fn tags_to_json(tags: &[String]) -> JsonValue {
    let mut sorted: Vec<String> = tags.to_vec();
    sorted.sort();
    JsonValue::Array(sorted.into_iter().map(JsonValue::String).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, mo: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn record() -> FileRecord {
        FileRecord {
            fname: "a.jpg".to_string(),
            hash_sha256: "deadbeef".to_string(),
            time_db_added: ts(2023, 5, 1),
            time_db_updated: ts(2023, 5, 1),
            deleted: false,
            desc: String::new(),
            exif: serde_json::json!({"FileSize": 100, "MIMEType": "image/jpeg"}),
            mime_type: "image/jpeg".to_string(),
            file_ts: ts(2023, 5, 1),
            thumbnail: Some("a.jpg.png".to_string()),
            tags: vec!["holiday".to_string(), "beach".to_string()],
        }
    }

    #[test]
    fn file_ts_string_has_no_fraction_for_whole_seconds() {
        assert_eq!(record().file_ts_str(), "2023-05-01 10:00:00");
    }

    #[test]
    fn exif_file_size_reads_numbers_and_strings() {
        let mut r = record();
        assert_eq!(r.exif_file_size(), Some(100));
        r.exif = serde_json::json!({"FileSize": "2048"});
        assert_eq!(r.exif_file_size(), Some(2048));
        r.exif = serde_json::json!({});
        assert_eq!(r.exif_file_size(), None);
    }

    #[test]
    fn tags_serialize_sorted() {
        let json = tags_to_json(&["zebra".to_string(), "alpha".to_string()]);
        assert_eq!(json, serde_json::json!(["alpha", "zebra"]));
    }

    #[test]
    fn to_values_roundtrips_through_from_row() {
        let original = record();
        let values: Vec<Value> = original.to_values().into_iter().map(|(_, v)| v).collect();
        let rebuilt = FileRecord::from_row(values).unwrap();
        assert_eq!(rebuilt.fname, original.fname);
        assert_eq!(rebuilt.thumbnail, original.thumbnail);
        // to_values sorts tags on the way out
        assert_eq!(rebuilt.tags, vec!["beach".to_string(), "holiday".to_string()]);
    }
}
