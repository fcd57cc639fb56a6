use std::collections::HashMap;

use crate::resolve::{KnowledgeBase, PropId, Rule, RuleId};

/// Ordered known propositions: the given prefix, then derived facts in the
/// order they were proved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactSet {
    facts: Vec<PropId>,
    known: Vec<bool>,
    initial: usize,
}

impl FactSet {
    pub fn new(kb: &KnowledgeBase) -> Self {
        let mut known = vec![false; kb.symbols.len()];
        for f in &kb.facts {
            known[f.index()] = true;
        }
        FactSet {
            facts: kb.facts.clone(),
            known,
            initial: kb.facts.len(),
        }
    }

    pub fn contains(&self, p: PropId) -> bool {
        self.known.get(p.index()).copied().unwrap_or(false)
    }

    /// True when `p` was given, not derived.
    pub fn is_initial(&self, p: PropId) -> bool {
        self.initial().contains(&p)
    }

    pub fn push(&mut self, p: PropId) {
        debug_assert!(!self.contains(p), "fact derived twice");
        if p.index() >= self.known.len() {
            self.known.resize(p.index() + 1, false);
        }
        self.known[p.index()] = true;
        self.facts.push(p);
    }

    /// Drop derived facts back to `len` entries. The given prefix is never
    /// touched.
    pub fn truncate(&mut self, len: usize) {
        let len = len.max(self.initial).min(self.facts.len());
        for p in self.facts.drain(len..) {
            self.known[p.index()] = false;
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn as_slice(&self) -> &[PropId] {
        &self.facts
    }

    pub fn initial(&self) -> &[PropId] {
        &self.facts[..self.initial]
    }

    pub fn derived(&self) -> &[PropId] {
        &self.facts[self.initial..]
    }
}

/// Why a forward scan passed over a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyApplied,
    DestinationKnown,
    MissingSources(Vec<PropId>),
}

/// Declaration-ordered rules with a destination index.
#[derive(Debug)]
pub struct RuleStore<'a> {
    rules: &'a [Rule],
    by_destination: HashMap<PropId, Vec<RuleId>>,
}

impl<'a> RuleStore<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        let mut by_destination: HashMap<PropId, Vec<RuleId>> = HashMap::new();
        for id in kb.rule_ids() {
            by_destination
                .entry(kb.rule(id).destination)
                .or_default()
                .push(id);
        }
        RuleStore { rules: &kb.rules, by_destination }
    }

    pub fn rule(&self, id: RuleId) -> &'a Rule {
        &self.rules[id.index()]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules producing `goal` that are not marked in `in_use`, in declaration
    /// order.
    pub fn candidates(&self, goal: PropId, in_use: &[bool]) -> Vec<RuleId> {
        self.by_destination
            .get(&goal)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| !in_use[id.index()])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First rule, in declaration order, that is not applied, whose
    /// destination is unknown and whose sources are all facts. Every rule
    /// passed over is reported to `on_skip`.
    pub fn first_applicable(
        &self,
        facts: &FactSet,
        applied: &[bool],
        mut on_skip: impl FnMut(RuleId, SkipReason),
    ) -> Option<RuleId> {
        for (i, rule) in self.rules.iter().enumerate() {
            let id = RuleId(i as u32);

            if applied[i] {
                on_skip(id, SkipReason::AlreadyApplied);
                continue;
            }
            if facts.contains(rule.destination) {
                on_skip(id, SkipReason::DestinationKnown);
                continue;
            }
            let missing: Vec<PropId> = rule
                .sources
                .iter()
                .copied()
                .filter(|s| !facts.contains(*s))
                .collect();
            if !missing.is_empty() {
                on_skip(id, SkipReason::MissingSources(missing));
                continue;
            }

            return Some(id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Document;

    fn kb() -> KnowledgeBase {
        let doc = Document::from_parts(
            &[(&["X"], "Z"), (&["Y"], "Z"), (&["A", "B"], "C")],
            &["Y", "A"],
            "Z",
        );
        KnowledgeBase::from_document(&doc)
    }

    #[test]
    fn fact_set_truncate_keeps_given_prefix() {
        let kb = kb();
        let z = kb.symbols.get("Z").unwrap();
        let c = kb.symbols.get("C").unwrap();
        let y = kb.symbols.get("Y").unwrap();

        let mut facts = FactSet::new(&kb);
        assert!(facts.contains(y));
        assert!(facts.is_initial(y));
        facts.push(z);
        facts.push(c);
        assert_eq!(facts.derived(), &[z, c]);
        assert!(!facts.is_initial(z));

        facts.truncate(10);
        assert_eq!(facts.len(), 4);

        facts.truncate(3);
        assert!(facts.contains(z));
        assert!(!facts.contains(c));

        facts.truncate(0);
        assert_eq!(facts.len(), 2);
        assert!(facts.contains(y));
        assert!(!facts.contains(z));
    }

    #[test]
    fn candidates_respect_order_and_in_use() {
        let kb = kb();
        let store = RuleStore::new(&kb);
        let z = kb.symbols.get("Z").unwrap();
        let a = kb.symbols.get("A").unwrap();

        assert_eq!(store.candidates(z, &[false; 3]), vec![RuleId(0), RuleId(1)]);
        assert_eq!(store.candidates(z, &[true, false, false]), vec![RuleId(1)]);
        assert!(store.candidates(a, &[false; 3]).is_empty());
    }

    #[test]
    fn first_applicable_reports_skips() {
        let kb = kb();
        let store = RuleStore::new(&kb);
        let facts = FactSet::new(&kb);
        let x = kb.symbols.get("X").unwrap();

        let mut skipped = vec![];
        let found = store.first_applicable(&facts, &[false; 3], |id, why| skipped.push((id, why)));
        assert_eq!(found, Some(RuleId(1)));
        assert_eq!(skipped, vec![(RuleId(0), SkipReason::MissingSources(vec![x]))]);

        let mut skipped = vec![];
        let found = store.first_applicable(&facts, &[false, true, false], |id, why| skipped.push((id, why)));
        assert_eq!(found, None);
        assert_eq!(skipped.len(), 3);
        assert_eq!(skipped[1], (RuleId(1), SkipReason::AlreadyApplied));
    }
}
