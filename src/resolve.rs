use std::collections::HashMap;
use std::fmt;

use crate::ast::*;

/// Interned proposition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropId(pub(crate) u32);

impl PropId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a rule in declaration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bidirectional map between proposition names and [`PropId`]s.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    names: Vec<String>,
    lookup: HashMap<String, PropId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create.
    pub fn intern(&mut self, name: &str) -> PropId {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = PropId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<PropId> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, id: PropId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub sources: Vec<PropId>,
    pub destination: PropId,
}

/// Resolved engine input: rules, given facts and target over one symbol table.
///
/// Immutable once built; engines keep their own flags and derived facts.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub symbols: SymbolTable,
    pub rules: Vec<Rule>,
    pub facts: Vec<PropId>,
    pub target: PropId,
}

impl KnowledgeBase {
    /// Intern every name in `doc`. Duplicate facts should already have been
    /// collapsed by [`crate::normalize_facts`]; any left over are kept once.
    pub fn from_document(doc: &Document) -> Self {
        let mut symbols = SymbolTable::new();

        let rules = doc
            .rules
            .iter()
            .map(|r| Rule {
                name: r.name.clone(),
                sources: r.sources.iter().map(|s| symbols.intern(s)).collect(),
                destination: symbols.intern(&r.destination),
            })
            .collect();

        let mut facts: Vec<PropId> = Vec::with_capacity(doc.facts.len());
        for f in &doc.facts {
            let id = symbols.intern(f);
            if !facts.contains(&id) {
                facts.push(id);
            }
        }

        let target = symbols.intern(&doc.target);

        KnowledgeBase { symbols, rules, facts, target }
    }

    /// Same rules and target, different given facts.
    pub fn with_facts(&self, facts: &[PropId]) -> Self {
        let mut unique: Vec<PropId> = Vec::with_capacity(facts.len());
        for &f in facts {
            if !unique.contains(&f) {
                unique.push(f);
            }
        }
        KnowledgeBase {
            symbols: self.symbols.clone(),
            rules: self.rules.clone(),
            facts: unique,
            target: self.target,
        }
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        (0..self.rules.len()).map(|i| RuleId(i as u32))
    }

    pub fn name(&self, id: PropId) -> &str {
        self.symbols.name(id)
    }

    pub fn names(&self, ids: &[PropId]) -> Vec<&str> {
        ids.iter().map(|&id| self.name(id)).collect()
    }

    pub fn rule_names(&self, ids: &[RuleId]) -> Vec<&str> {
        ids.iter().map(|&id| self.rule(id).name.as_str()).collect()
    }

    /// `R2: A, B -> C`
    pub fn display_rule(&self, id: RuleId) -> RuleDisplay<'_> {
        RuleDisplay { kb: self, id }
    }
}

pub struct RuleDisplay<'a> {
    kb: &'a KnowledgeBase,
    id: RuleId,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = self.kb.rule(self.id);
        write!(
            f,
            "{}: {} -> {}",
            rule.name,
            self.kb.names(&rule.sources).join(", "),
            self.kb.name(rule.destination)
        )
    }
}
