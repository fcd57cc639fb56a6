use std::fs;
use std::path::{Path, PathBuf};

use pest::Parser as PestParser; // <- trait (gives LineParser::parse)
use thiserror::Error;
use tracing::debug;

use crate::ast::*;

pub const RULES_MARKER: &str = "1) Rules";
pub const FACTS_MARKER: &str = "2) Facts";
pub const TARGET_MARKER: &str = "3) Target";

mod grammar {
    use pest_derive::Parser; // <- derive macro (generates Rule enum + impl)

    #[derive(Parser)]
    #[grammar = "chainlite.pest"]
    pub struct LineParser;
}

use grammar::{LineParser, Rule};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("input is empty")]
    Empty,
    #[error("missing rules section (`1) Rules`)")]
    MissingRules,
    #[error("missing facts section (`2) Facts`)")]
    MissingFacts,
    #[error("missing target section (`3) Target`)")]
    MissingTarget,
    #[error("sections must appear in order: rules, facts, target")]
    SectionOrder,
    #[error("line {line}: malformed rule line `{text}`: expected a destination and at least one source")]
    MalformedRule { line: usize, text: String },
    #[error("line {line}: malformed target `{text}`: expected a single proposition")]
    MalformedTarget { line: usize, text: String },
    #[error("line {line}: {source}")]
    Pest {
        line: usize,
        #[source]
        source: Box<pest::error::Error<Rule>>,
    },
}

/// Failure to turn a file on disk into a [`Document`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

pub fn parse_file(path: &Path) -> Result<Document, LoadError> {
    let input = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&input).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse the three-section rule format.
///
/// Each section starts at the first line beginning with its marker. Rule
/// lines run up to the facts marker; the facts and the target are each read
/// from the single line following their marker.
pub fn parse_document(input: &str) -> Result<Document, ParseError> {
    let lines: Vec<&str> = input.lines().collect();
    if lines.iter().all(|l| l.trim().is_empty()) {
        return Err(ParseError::Empty);
    }

    let rules_at = find_marker(&lines, RULES_MARKER).ok_or(ParseError::MissingRules)?;
    let facts_at = find_marker(&lines, FACTS_MARKER).ok_or(ParseError::MissingFacts)?;
    let target_at = find_marker(&lines, TARGET_MARKER).ok_or(ParseError::MissingTarget)?;
    if !(rules_at < facts_at && facts_at < target_at) {
        return Err(ParseError::SectionOrder);
    }

    let rules = build_rules(&lines, rules_at + 1, facts_at)?;
    let facts = build_facts(&lines, facts_at, target_at)?;
    let target = build_target(&lines, target_at)?;

    debug!(rules = rules.len(), facts = facts.len(), %target, "parsed document");
    Ok(Document { rules, facts, target })
}

fn find_marker(lines: &[&str], marker: &str) -> Option<usize> {
    lines.iter().position(|l| l.starts_with(marker))
}

fn build_rules(lines: &[&str], from: usize, to: usize) -> Result<Vec<RuleDecl>, ParseError> {
    let mut rules = vec![];

    for (idx, text) in lines.iter().enumerate().take(to).skip(from) {
        let line = idx + 1;
        let symbols = symbols(text, line)?;
        match symbols.as_slice() {
            [] => continue,
            [_] => {
                return Err(ParseError::MalformedRule {
                    line,
                    text: text.trim().to_string(),
                })
            }
            [destination, sources @ ..] => {
                rules.push(RuleDecl::new(rules.len(), destination, sources, line));
            }
        }
    }

    Ok(rules)
}

fn build_facts(lines: &[&str], facts_at: usize, target_at: usize) -> Result<Vec<String>, ParseError> {
    let at = facts_at + 1;
    // "2) Facts" immediately followed by "3) Target": no facts given.
    if at == target_at {
        return Ok(vec![]);
    }
    let text = lines.get(at).ok_or(ParseError::MissingFacts)?;
    Ok(symbols(text, at + 1)?.into_iter().map(str::to_string).collect())
}

fn build_target(lines: &[&str], target_at: usize) -> Result<String, ParseError> {
    let at = target_at + 1;
    let text = lines.get(at).ok_or(ParseError::MissingTarget)?;
    match symbols(text, at + 1)?.as_slice() {
        [] => Err(ParseError::MissingTarget),
        [target] => Ok(target.to_string()),
        _ => Err(ParseError::MalformedTarget {
            line: at + 1,
            text: text.trim().to_string(),
        }),
    }
}

/// Whitespace-separated symbols of one line, with `//` comments dropped.
fn symbols(text: &str, line: usize) -> Result<Vec<&str>, ParseError> {
    let pairs = LineParser::parse(Rule::line, text).map_err(|e| ParseError::Pest {
        line,
        source: Box::new(e),
    })?;

    Ok(pairs
        .flatten()
        .filter(|p| p.as_rule() == Rule::symbol)
        .map(|p| p.as_str())
        .collect())
}
