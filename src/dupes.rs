//! Duplicate reconciliation: find catalog rows that are very likely the
//! same content under different filenames, and drive an explicit,
//! human-confirmed deletion workflow.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::catalog::{hashing, FileRecord, Store};
use crate::error::Result;
use crate::store::Direction;

/// Content-identity key: stored file size and content hash.
pub type GroupKey = (i64, String);

#[derive(Debug)]
pub struct DuplicateGroup {
    pub key: GroupKey,
    /// In catalog display order: the first record is the retained baseline.
    pub records: Vec<FileRecord>,
}

/// How a resolution run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

/// Operator interaction for the destructive workflow.
pub trait Prompt {
    /// Ask until one of `options` is entered; returns the chosen option.
    fn ask(&mut self, message: &str, options: &[char]) -> Result<char>;

    /// Print a line to the operator.
    fn say(&mut self, message: &str);
}

/// Interactive prompt on stdin/stdout.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, message: &str, options: &[char]) -> Result<char> {
        let stdin = io::stdin();
        loop {
            print!("{message}");
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed").into());
            }
            if let Some(choice) = line.trim().chars().next() {
                if options.contains(&choice) {
                    return Ok(choice);
                }
            }
        }
    }

    fn say(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Group non-deleted records by `(FileSize, hash_sha256)`, preserving the
/// catalog's display order (most recent file time first) so the retained
/// first element of each group is the newest copy. Singleton groups are
/// dropped.
pub fn find_duplicate_groups(store: &Store) -> Result<Vec<DuplicateGroup>> {
    let records = store.get_all(Some(false), Direction::Descending)?;

    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for record in records {
        let Some(size) = record.exif_file_size() else {
            warn!(fname = %record.fname, "record has no stored FileSize, skipping");
            continue;
        };
        let key = (size, record.hash_sha256.clone());
        match index.get(&key) {
            Some(&at) => groups[at].records.push(record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(DuplicateGroup {
                    key,
                    records: vec![record],
                });
            }
        }
    }

    groups.retain(|group| group.records.len() > 1);
    Ok(groups)
}

/// Run the interactive resolution workflow over every candidate group.
///
/// Aborting stops immediately; effects already applied stay applied, nothing
/// rolls back.
pub fn resolve_duplicates(store: &Store, prompt: &mut dyn Prompt) -> Result<Outcome> {
    for group in find_duplicate_groups(store)? {
        if resolve_group(store, prompt, &group)? == Outcome::Aborted {
            return Ok(Outcome::Aborted);
        }
    }
    Ok(Outcome::Completed)
}

fn resolve_group(store: &Store, prompt: &mut dyn Prompt, group: &DuplicateGroup) -> Result<Outcome> {
    prompt.say("");
    prompt.say("-----------------------");
    for record in &group.records {
        prompt.say(&record.fname);
    }
    prompt.say("");

    let config = store.config();
    let first = &group.records[0];
    let first_path = config.upload_path(&first.fname);

    let mut all_identical = true;
    for other in &group.records[1..] {
        if !hashing::files_identical(&first_path, &config.upload_path(&other.fname))? {
            all_identical = false;
            break;
        }
    }

    if !all_identical {
        // hash collision or stale metadata: nothing safe to do automatically
        prompt.say("Files share a size and hash but are not byte-identical.");
        return match prompt.ask("(k)eep all  (q)uit? ", &['k', 'q'])? {
            'q' => Ok(Outcome::Aborted),
            _ => Ok(Outcome::Completed),
        };
    }

    match prompt.ask(
        "Duplicates detected. (d)elete all but first  (k)eep all  (q)uit? ",
        &['d', 'k', 'q'],
    )? {
        'q' => return Ok(Outcome::Aborted),
        'k' => return Ok(Outcome::Completed),
        _ => {}
    }

    for other in &group.records[1..] {
        remove_best_effort(&config.upload_path(&other.fname), prompt);
        if let Some(thumbnail) = &other.thumbnail {
            remove_best_effort(&config.thumbnail_path(thumbnail), prompt);
        }
        store.soft_delete(other)?;
        info!(fname = %other.fname, kept = %first.fname, "duplicate deleted");
    }
    Ok(Outcome::Completed)
}

/// A failed removal is reported but never blocks the soft-delete.
fn remove_best_effort(path: &Path, prompt: &mut dyn Prompt) {
    if let Err(err) = std::fs::remove_file(path) {
        prompt.say(&format!("Failed to remove {}: {err}", path.display()));
        warn!(path = %path.display(), %err, "failed to remove file");
    }
}
