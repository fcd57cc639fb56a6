use std::collections::HashSet;

use tracing::warn;

use crate::ast::*;

/// Collapse repeated initial facts, keeping the first occurrence of each.
///
/// Call this **after** parsing and before building a knowledge base, so the
/// given-fact prefix that engines report is exactly what the file meant.
pub fn normalize_facts(doc: &Document) -> Document {
    let mut seen = HashSet::with_capacity(doc.facts.len());
    let mut facts = Vec::with_capacity(doc.facts.len());

    for fact in &doc.facts {
        if seen.insert(fact.as_str()) {
            facts.push(fact.clone());
        } else {
            warn!(%fact, "duplicate initial fact ignored");
        }
    }

    Document {
        rules: doc.rules.clone(),
        facts,
        target: doc.target.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_occurrence_order() {
        let doc = Document::from_parts(&[(&["A"], "B")], &["C", "A", "C", "B", "A"], "B");
        let norm = normalize_facts(&doc);
        assert_eq!(norm.facts, vec!["C", "A", "B"]);
        assert_eq!(norm.rules, doc.rules);
        assert_eq!(norm.target, "B");
    }
}
