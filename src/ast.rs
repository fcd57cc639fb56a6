use std::fmt;

/// A parsed input file, before proposition interning.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub rules: Vec<RuleDecl>,
    pub facts: Vec<String>,
    pub target: String,
}

/// One rule line: `DEST SRC1 SRC2 ...` means `SRC1 SRC2 ... -> DEST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecl {
    /// Sequential name, `R1`, `R2`, ... in declaration order.
    pub name: String,
    pub sources: Vec<String>,
    pub destination: String,
    /// 1-based line number in the source file.
    pub line: usize,
}

impl RuleDecl {
    pub fn new(index: usize, destination: &str, sources: &[&str], line: usize) -> Self {
        RuleDecl {
            name: format!("R{}", index + 1),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            destination: destination.to_string(),
            line,
        }
    }
}

impl fmt::Display for RuleDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.name, self.sources.join(", "), self.destination)
    }
}

impl Document {
    /// Build a document directly from `(sources, destination)` pairs.
    /// Names are assigned exactly as the parser would.
    pub fn from_parts(rules: &[(&[&str], &str)], facts: &[&str], target: &str) -> Self {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, (sources, dest))| RuleDecl::new(i, dest, sources, 0))
            .collect();
        Document {
            rules,
            facts: facts.iter().map(|s| s.to_string()).collect(),
            target: target.to_string(),
        }
    }
}
