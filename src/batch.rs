//! Run one isolated engine per input file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{info, warn};

use crate::ast::Document;
use crate::config::{BatchConfig, EngineConfig};
use crate::normalize::normalize_facts;
use crate::parser::{parse_file, LoadError};
use crate::reasoner::{solve, Outcome};
use crate::resolve::KnowledgeBase;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot list {}: {source}", .dir.display())]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A solved input: what was read, what the engine saw, what it concluded.
#[derive(Debug, Clone)]
pub struct Run {
    pub document: Document,
    pub kb: KnowledgeBase,
    pub outcome: Outcome,
}

impl Run {
    pub fn from_document(document: Document, config: &EngineConfig) -> Self {
        let document = normalize_facts(&document);
        let kb = KnowledgeBase::from_document(&document);
        let outcome = solve(&kb, config);
        Run { document, kb, outcome }
    }
}

pub fn run_file(path: &Path, config: &EngineConfig) -> Result<Run, LoadError> {
    let document = parse_file(path)?;
    Ok(Run::from_document(document, config))
}

#[derive(Debug)]
pub struct FileRun {
    pub path: PathBuf,
    pub result: Result<Run, LoadError>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub started: DateTime<Local>,
    pub config: BatchConfig,
    pub runs: Vec<FileRun>,
}

impl BatchReport {
    pub fn derived(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| matches!(&r.result, Ok(run) if run.outcome.derived))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|r| r.result.is_err()).count()
    }
}

/// Regular files in `dir` whose names start with `prefix`, sorted by name.
pub fn discover(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, BatchError> {
    let read_dir = |source| BatchError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    };

    let mut found = vec![];
    for entry in fs::read_dir(dir).map_err(read_dir)? {
        let entry = entry.map_err(read_dir)?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && entry.file_name().to_string_lossy().starts_with(prefix) {
            found.push(entry.path());
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Solve every matching file. A file that fails to load is recorded and the
/// batch moves on.
pub fn run_batch(config: &BatchConfig) -> Result<BatchReport, BatchError> {
    let started = Local::now();
    let paths = discover(&config.dir, &config.prefix)?;
    info!(
        dir = %config.dir.display(),
        prefix = %config.prefix,
        files = paths.len(),
        "starting batch"
    );

    let runs = paths
        .into_iter()
        .map(|path| {
            info!(file = %path.display(), "work with");
            let result = run_file(&path, &config.engine);
            if let Err(e) = &result {
                warn!(error = %e, "skipping input");
            }
            FileRun { path, result }
        })
        .collect();

    Ok(BatchReport {
        started,
        config: config.clone(),
        runs,
    })
}
