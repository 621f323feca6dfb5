//! Search: compiles a query string into independent predicates and
//! evaluates their conjunction against catalog rows.

use crate::catalog::FileRecord;
use crate::error::{Error, Result};

/// One compiled, independently evaluable unit of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// `tagged` / `!tagged`: the row has at least one tag (or none).
    Tagged { negated: bool },
    /// Substring over the row's file-time string and every tag.
    Substring { token: String, negated: bool },
}

impl Predicate {
    fn compile(token: &str) -> Result<Self> {
        if token.eq_ignore_ascii_case("tagged") {
            return Ok(Predicate::Tagged { negated: false });
        }
        if token.eq_ignore_ascii_case("!tagged") {
            return Ok(Predicate::Tagged { negated: true });
        }

        let (negated, token) = match token.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if token.chars().count() < 3 {
            return Err(Error::validation(format!("search token too short: {token:?}")));
        }
        Ok(Predicate::Substring {
            token: token.to_string(),
            negated,
        })
    }

    fn matches(&self, record: &FileRecord) -> bool {
        match self {
            Predicate::Tagged { negated } => record.tags.is_empty() == *negated,
            Predicate::Substring { token, negated } => {
                // a negated token must be absent from every target field
                let found = record.file_ts_str().contains(token.as_str())
                    || record.tags.iter().any(|tag| tag.contains(token.as_str()));
                found != *negated
            }
        }
    }
}

/// A compiled query. An empty query matches everything.
#[derive(Debug, Clone, Default)]
pub struct Query {
    predicates: Vec<Predicate>,
}

impl Query {
    /// Compile a whitespace-separated query string. Any substring token
    /// shorter than three characters (after stripping the `!` prefix) fails
    /// the whole query, before any row is evaluated.
    pub fn parse(input: &str) -> Result<Self> {
        let predicates = input
            .split_whitespace()
            .map(Predicate::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { predicates })
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// A row matches iff every predicate matches.
    pub fn matches(&self, record: &FileRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    /// Keep only matching records, preserving order.
    pub fn filter(&self, records: Vec<FileRecord>) -> Vec<FileRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(file_ts: &str, tags: &[&str]) -> FileRecord {
        let file_ts = chrono::NaiveDateTime::parse_from_str(file_ts, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|_| {
                NaiveDate::from_ymd_opt(2020, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            });
        FileRecord {
            fname: "a.jpg".to_string(),
            hash_sha256: "0".to_string(),
            time_db_added: file_ts,
            time_db_updated: file_ts,
            deleted: false,
            desc: String::new(),
            exif: serde_json::json!({}),
            mime_type: "image/jpeg".to_string(),
            file_ts,
            thumbnail: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        let query = Query::parse("   ").unwrap();
        assert!(query.is_empty());
        assert!(query.matches(&record("2023-05-01 10:00:00", &[])));
    }

    #[test]
    fn substring_matches_file_time_and_tags() {
        let query = Query::parse("2023").unwrap();
        assert!(query.matches(&record("2023-05-01 10:00:00", &[])));
        assert!(!query.matches(&record("2019-05-01 10:00:00", &[])));

        let query = Query::parse("beach").unwrap();
        assert!(query.matches(&record("2019-05-01 10:00:00", &["beach"])));
        assert!(!query.matches(&record("2019-05-01 10:00:00", &["city"])));
    }

    #[test]
    fn conjunction_requires_every_token() {
        let query = Query::parse("2023 tagged").unwrap();
        assert!(query.matches(&record("2023-05-01 10:00:00", &["beach"])));
        assert!(!query.matches(&record("2023-05-01 10:00:00", &[])));
        assert!(!query.matches(&record("2019-05-01 10:00:00", &["beach"])));
    }

    #[test]
    fn tagged_and_its_negation() {
        let tagged = Query::parse("tagged").unwrap();
        let untagged = Query::parse("!tagged").unwrap();
        let with_tags = record("2023-05-01 10:00:00", &["beach"]);
        let without = record("2023-05-01 10:00:00", &[]);

        assert!(tagged.matches(&with_tags));
        assert!(!tagged.matches(&without));
        assert!(untagged.matches(&without));
        assert!(!untagged.matches(&with_tags));

        // case-insensitive keyword
        assert!(Query::parse("Tagged").unwrap().matches(&with_tags));
    }

    #[test]
    fn negated_substring_must_be_absent_everywhere() {
        let query = Query::parse("!xyz").unwrap();
        assert!(query.matches(&record("2023-05-01 10:00:00", &["beach"])));
        assert!(!query.matches(&record("2023-05-01 10:00:00", &["xyzzy"])));

        // present in the file-time string counts too
        let query = Query::parse("!2023").unwrap();
        assert!(!query.matches(&record("2023-05-01 10:00:00", &[])));
        assert!(query.matches(&record("2019-05-01 10:00:00", &[])));
    }

    #[test]
    fn short_tokens_fail_compilation() {
        assert!(matches!(Query::parse("ab"), Err(Error::Validation(_))));
        assert!(matches!(Query::parse("!ab"), Err(Error::Validation(_))));
        assert!(matches!(Query::parse("2023 ab"), Err(Error::Validation(_))));
        assert!(Query::parse("abc").is_ok());
    }

    #[test]
    fn filter_preserves_order() {
        let query = Query::parse("tagged").unwrap();
        let records = vec![
            record("2023-05-01 10:00:00", &["one"]),
            record("2022-05-01 10:00:00", &[]),
            record("2021-05-01 10:00:00", &["two"]),
        ];
        let kept = query.filter(records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].tags, vec!["one".to_string()]);
        assert_eq!(kept[1].tags, vec!["two".to_string()]);
    }
}
