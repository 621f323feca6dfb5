use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use shoebox::catalog::Store;
use shoebox::config::Config;
use shoebox::dupes::{self, StdinPrompt};
use shoebox::migrate;

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    duplicate_check: bool,
    update_thumbnails: bool,
    map_data: Option<PathBuf>,
    disk_usage: bool,
    paths: Vec<PathBuf>,
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args::default();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("shoebox {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < argv.len() {
                    args.config_path = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--duplicate-check" | "-d" => args.duplicate_check = true,
            "--update-thumbnails" | "-t" => args.update_thumbnails = true,
            "--disk-usage" => args.disk_usage = true,
            "--map-data" => {
                if i + 1 < argv.len() {
                    args.map_data = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --map-data requires a path argument");
                    std::process::exit(1);
                }
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                print_help();
                std::process::exit(1);
            }
            other => args.paths.push(PathBuf::from(other)),
        }
        i += 1;
    }

    args
}

fn print_help() {
    println!(
        r#"shoebox - personal media archive catalog

USAGE:
    shoebox [OPTIONS] [PATHS...]

With PATHS and no action flag, reconciles each file's catalog record with
its on-disk state as one batch.

OPTIONS:
    --duplicate-check, -d     Interactively resolve content-identical duplicates
    --update-thumbnails, -t   Regenerate thumbnails for PATHS (or all files)
    --map-data NEW_DB         Copy all records into a fresh database file
    --disk-usage              Print the upload directory's total size
    --config, -c PATH         Path to config file
    --version, -V             Show version
    --help, -h                Show this help message

ENVIRONMENT:
    SHOEBOX_LOG               Log level (trace, debug, info, warn, error)
"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    shoebox::logging::init(None)?;
    let config = Config::load(args.config_path.as_deref())?;
    config.ensure_dirs()?;

    if let Some(new_db) = &args.map_data {
        if !args.paths.is_empty() {
            bail!("--map-data does not take file paths");
        }
        let copied = migrate::map_data(&config.db_path, new_db, migrate::normalize_thumbnail)
            .context("schema translation failed")?;
        println!("Copied {copied} rows");
        return Ok(());
    }

    let store = Store::open(config)?;

    if args.duplicate_check {
        if !args.paths.is_empty() {
            bail!("--duplicate-check does not take file paths");
        }
        if dupes::resolve_duplicates(&store, &mut StdinPrompt)? == dupes::Outcome::Aborted {
            println!("Aborted");
        }
        return Ok(());
    }

    if args.update_thumbnails {
        let fnames: Vec<String> = args
            .paths
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        store.update_thumbnails(&fnames)?;
        return Ok(());
    }

    if args.disk_usage {
        println!("{}", store.upload_dir_disk_usage()?);
        return Ok(());
    }

    if args.paths.is_empty() {
        print_help();
        return Ok(());
    }

    let batch = store.batch()?;
    for path in &args.paths {
        // a bad timestamp is fatal for that one file only; keep going
        if let Err(err) = store.process(path) {
            eprintln!("{}: {err}", path.display());
        }
    }
    drop(batch);

    Ok(())
}
