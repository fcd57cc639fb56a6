use thiserror::Error;
use tracing::{debug, info, trace};

use crate::config::{EngineConfig, Strategy};
use crate::resolve::{KnowledgeBase, PropId, RuleId};
use crate::store::{FactSet, RuleStore, SkipReason};

/// Result of one engine run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub derived: bool,
    /// Applied rules, in application order.
    pub trace: Vec<RuleId>,
    pub facts: FactSet,
    pub log: Log,
}

/// Step-by-step record of a run, detailed enough to rebuild a readable trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Log {
    Forward {
        state: ForwardState,
        events: Vec<ForwardEvent>,
    },
    Backward(Vec<BackwardEvent>),
}

impl Outcome {
    pub fn strategy(&self) -> Strategy {
        match self.log {
            Log::Forward { .. } => Strategy::Forward,
            Log::Backward(_) => Strategy::Backward,
        }
    }
}

/// Run the engine selected by `config`.
pub fn solve(kb: &KnowledgeBase, config: &EngineConfig) -> Outcome {
    match config.strategy {
        Strategy::Forward => forward_chain(kb),
        Strategy::Backward => backward_chain(kb),
    }
}

//
// ------------------------- Forward chaining -------------------------
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Running,
    TargetReached,
    NoRuleApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardEvent {
    Skipped {
        iteration: usize,
        rule: RuleId,
        reason: SkipReason,
    },
    Applied {
        iteration: usize,
        rule: RuleId,
        /// Fact count right after the application.
        facts: usize,
    },
}

/// Fire the first applicable rule in declaration order, restart the scan,
/// and stop once the target is a fact or a full scan fires nothing. Each
/// rule fires at most once.
pub fn forward_chain(kb: &KnowledgeBase) -> Outcome {
    let store = RuleStore::new(kb);
    let mut facts = FactSet::new(kb);
    let mut applied = vec![false; store.len()];
    let mut trace = vec![];
    let mut events = vec![];

    let mut state = ForwardState::Running;
    if facts.contains(kb.target) {
        debug!(goal = kb.name(kb.target), "target is a given fact");
        state = ForwardState::TargetReached;
    }

    let mut iteration = 0;
    while state == ForwardState::Running {
        iteration += 1;

        let found = store.first_applicable(&facts, &applied, |rule, reason| {
            trace!(iteration, rule = %kb.rule(rule).name, ?reason, "skip");
            events.push(ForwardEvent::Skipped { iteration, rule, reason });
        });

        let Some(rule) = found else {
            state = ForwardState::NoRuleApplicable;
            break;
        };

        let destination = store.rule(rule).destination;
        facts.push(destination);
        applied[rule.index()] = true;
        trace.push(rule);
        events.push(ForwardEvent::Applied {
            iteration,
            rule,
            facts: facts.len(),
        });
        debug!(iteration, rule = %kb.rule(rule).name, fact = kb.name(destination), "applied");

        if facts.contains(kb.target) {
            state = ForwardState::TargetReached;
        }
    }

    let derived = state == ForwardState::TargetReached;
    info!(
        derived,
        applied = trace.len(),
        path = ?kb.rule_names(&trace),
        "forward chaining finished"
    );

    Outcome {
        derived,
        trace,
        facts,
        log: Log::Forward { state, events },
    }
}

//
// ------------------------- Backward chaining -------------------------
// The search keeps its own stack of open goals instead of recursing, so
// proof depth is bounded by memory rather than the thread stack. In-use
// marks live in a bitmap indexed by rule, owned by the search and rolled
// back with facts and trace when a candidate fails.
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackwardEvent {
    /// Goal is among the given facts.
    FactGiven { depth: usize, goal: PropId },
    /// Goal was derived earlier in this run.
    FactDerived { depth: usize, goal: PropId },
    NoRuleFound { depth: usize, goal: PropId },
    /// Goal already appears among its own ancestors.
    Loop { depth: usize, goal: PropId },
    RuleFound { depth: usize, goal: PropId, rule: RuleId },
    /// Every source of `rule` was proved; `derived` is the derived part of
    /// the fact set afterwards.
    Derived {
        depth: usize,
        goal: PropId,
        rule: RuleId,
        derived: Vec<PropId>,
    },
    /// A source of `rule` failed; state is back to before the attempt.
    Backtrack { depth: usize, goal: PropId, rule: RuleId },
    NoMoreRules { depth: usize, goal: PropId },
}

impl BackwardEvent {
    pub fn depth(&self) -> usize {
        match *self {
            BackwardEvent::FactGiven { depth, .. }
            | BackwardEvent::FactDerived { depth, .. }
            | BackwardEvent::NoRuleFound { depth, .. }
            | BackwardEvent::Loop { depth, .. }
            | BackwardEvent::RuleFound { depth, .. }
            | BackwardEvent::Derived { depth, .. }
            | BackwardEvent::Backtrack { depth, .. }
            | BackwardEvent::NoMoreRules { depth, .. } => depth,
        }
    }
}

/// Goal-directed proof of the target. A target that is already a fact is a
/// trivial success with an empty trace.
pub fn backward_chain(kb: &KnowledgeBase) -> Outcome {
    let mut search = Search::new(kb);

    let derived = if search.facts.contains(kb.target) {
        debug!(goal = kb.name(kb.target), "target is a given fact");
        true
    } else {
        search.run(kb.target)
    };

    info!(
        derived,
        applied = search.trace.len(),
        path = ?kb.rule_names(&search.trace),
        "backward chaining finished"
    );

    Outcome {
        derived,
        trace: search.trace,
        facts: search.facts,
        log: Log::Backward(search.events),
    }
}

/// Lengths to roll back to when a candidate rule fails.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    facts: usize,
    trace: usize,
    marks: usize,
}

/// A goal with at least one candidate rule, waiting on the sources of the
/// candidate under test.
#[derive(Debug)]
struct Frame {
    goal: PropId,
    depth: usize,
    candidates: Vec<RuleId>,
    /// Index into `candidates` of the rule under test.
    next: usize,
    /// Sources of that rule proved so far.
    proved: usize,
    cp: Checkpoint,
}

impl Frame {
    fn rule(&self) -> RuleId {
        self.candidates[self.next]
    }
}

struct Search<'a> {
    kb: &'a KnowledgeBase,
    store: RuleStore<'a>,
    facts: FactSet,
    trace: Vec<RuleId>,
    in_use: Vec<bool>,
    /// Rules marked in-use, in marking order.
    marks: Vec<RuleId>,
    /// Open goals, root first. Their goals are exactly the ancestors of
    /// whatever is being proved next.
    frames: Vec<Frame>,
    on_path: Vec<bool>,
    events: Vec<BackwardEvent>,
}

impl<'a> Search<'a> {
    fn new(kb: &'a KnowledgeBase) -> Self {
        let store = RuleStore::new(kb);
        let in_use = vec![false; store.len()];
        Search {
            kb,
            store,
            facts: FactSet::new(kb),
            trace: vec![],
            in_use,
            marks: vec![],
            frames: vec![],
            on_path: vec![false; kb.symbols.len()],
            events: vec![],
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            facts: self.facts.len(),
            trace: self.trace.len(),
            marks: self.marks.len(),
        }
    }

    fn rollback(&mut self, cp: Checkpoint) {
        self.facts.truncate(cp.facts);
        self.trace.truncate(cp.trace);
        for rule in self.marks.drain(cp.marks..) {
            self.in_use[rule.index()] = false;
        }
    }

    fn mark(&mut self, rule: RuleId) {
        self.in_use[rule.index()] = true;
        self.marks.push(rule);
    }

    fn emit(&mut self, event: BackwardEvent) {
        trace!(?event, "backward step");
        self.events.push(event);
    }

    /// Prove `target`. Each turn of the loop either hands the answer of the
    /// last settled goal to the frame above it, or asks for the next source
    /// of the top frame's current rule.
    fn run(&mut self, target: PropId) -> bool {
        let kb = self.kb;
        let mut answer = self.open(target, 0);

        loop {
            let Some(frame) = self.frames.last_mut() else {
                return answer == Some(true);
            };
            match answer.take() {
                Some(true) => frame.proved += 1,
                Some(false) => {
                    answer = self.backtrack();
                    continue;
                }
                None => {}
            }

            let frame = &self.frames[self.frames.len() - 1];
            match kb.rule(frame.rule()).sources.get(frame.proved) {
                Some(&source) => {
                    let depth = frame.depth + 1;
                    answer = self.open(source, depth);
                }
                None => {
                    self.close();
                    answer = Some(true);
                }
            }
        }
    }

    /// Settle `goal` on the spot when it is a fact, has no candidate rule or
    /// closes a loop. Otherwise push a frame for it and start its first
    /// candidate.
    fn open(&mut self, goal: PropId, depth: usize) -> Option<bool> {
        if self.facts.contains(goal) {
            if self.facts.is_initial(goal) {
                self.emit(BackwardEvent::FactGiven { depth, goal });
            } else {
                self.emit(BackwardEvent::FactDerived { depth, goal });
            }
            return Some(true);
        }

        let candidates = self.store.candidates(goal, &self.in_use);
        if candidates.is_empty() {
            self.emit(BackwardEvent::NoRuleFound { depth, goal });
            return Some(false);
        }

        // Every candidate concludes `goal`, so one ancestor check covers them all.
        if self.on_path[goal.index()] {
            self.emit(BackwardEvent::Loop { depth, goal });
            return Some(false);
        }

        self.on_path[goal.index()] = true;
        let cp = self.checkpoint();
        self.frames.push(Frame {
            goal,
            depth,
            candidates,
            next: 0,
            proved: 0,
            cp,
        });
        self.start_candidate();
        None
    }

    /// Mark the top frame's current rule and remember where to roll back to.
    fn start_candidate(&mut self) {
        let cp = self.checkpoint();
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        frame.cp = cp;
        frame.proved = 0;
        let (depth, goal, rule) = (frame.depth, frame.goal, frame.rule());

        self.emit(BackwardEvent::RuleFound { depth, goal, rule });
        self.mark(rule);
    }

    /// The top frame's current rule failed. Undo it and move on to the next
    /// candidate, or fail the goal when none is left.
    fn backtrack(&mut self) -> Option<bool> {
        let frame = self.frames.last_mut()?;
        let (depth, goal, rule, cp) = (frame.depth, frame.goal, frame.rule(), frame.cp);
        frame.next += 1;
        let exhausted = frame.next == frame.candidates.len();

        self.rollback(cp);
        debug!(rule = %self.kb.rule(rule).name, goal = self.kb.name(goal), "backtrack");
        self.emit(BackwardEvent::Backtrack { depth, goal, rule });

        if !exhausted {
            self.start_candidate();
            return None;
        }

        self.emit(BackwardEvent::NoMoreRules { depth, goal });
        self.frames.pop();
        self.on_path[goal.index()] = false;
        Some(false)
    }

    /// Every source of the top frame's rule holds: derive its goal.
    fn close(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let (depth, goal, rule) = (frame.depth, frame.goal, frame.rule());
        self.on_path[goal.index()] = false;

        self.facts.push(goal);
        self.trace.push(rule);
        let derived = self.facts.derived().to_vec();
        self.emit(BackwardEvent::Derived { depth, goal, rule, derived });
    }
}

//
// ------------------------- Replay -------------------------
//

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("rule index {0} is out of range")]
    UnknownRule(usize),
    #[error("{rule} fired before its source {source_name} was known")]
    SourceUnknown { rule: String, source_name: String },
    #[error("{rule} re-derived the known fact {fact}")]
    AlreadyKnown { rule: String, fact: String },
}

/// Apply `trace` to the given facts in order, checking that every rule's
/// sources are known when it fires. Returns the resulting fact list.
pub fn replay(kb: &KnowledgeBase, trace: &[RuleId]) -> Result<Vec<PropId>, ReplayError> {
    let mut facts = FactSet::new(kb);

    for &id in trace {
        let rule = kb
            .rules
            .get(id.index())
            .ok_or(ReplayError::UnknownRule(id.index()))?;

        if let Some(&missing) = rule.sources.iter().find(|s| !facts.contains(**s)) {
            return Err(ReplayError::SourceUnknown {
                rule: rule.name.clone(),
                source_name: kb.name(missing).to_string(),
            });
        }
        if facts.contains(rule.destination) {
            return Err(ReplayError::AlreadyKnown {
                rule: rule.name.clone(),
                fact: kb.name(rule.destination).to_string(),
            });
        }
        facts.push(rule.destination);
    }

    Ok(facts.as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Document;

    fn kb(rules: &[(&[&str], &str)], facts: &[&str], target: &str) -> KnowledgeBase {
        KnowledgeBase::from_document(&Document::from_parts(rules, facts, target))
    }

    fn names(kb: &KnowledgeBase, outcome: &Outcome) -> Vec<String> {
        kb.rule_names(&outcome.trace).into_iter().map(String::from).collect()
    }

    fn fact_names(kb: &KnowledgeBase, outcome: &Outcome) -> Vec<String> {
        kb.names(outcome.facts.as_slice()).into_iter().map(String::from).collect()
    }

    #[test]
    fn forward_applies_in_declaration_order() {
        let kb = kb(&[(&["C"], "D"), (&["A", "B"], "C")], &["A", "B"], "D");
        let out = forward_chain(&kb);

        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R2", "R1"]);
        assert_eq!(fact_names(&kb, &out), vec!["A", "B", "C", "D"]);
        match &out.log {
            Log::Forward { state, events } => {
                assert_eq!(*state, ForwardState::TargetReached);
                let applied: Vec<usize> = events
                    .iter()
                    .filter_map(|e| match e {
                        ForwardEvent::Applied { iteration, .. } => Some(*iteration),
                        _ => None,
                    })
                    .collect();
                assert_eq!(applied, vec![1, 2]);
            }
            other => panic!("unexpected log {other:?}"),
        }
    }

    #[test]
    fn forward_breaks_ties_by_declaration_order() {
        let kb = kb(&[(&["A"], "X"), (&["A"], "Y"), (&["X"], "T"), (&["Y"], "T")], &["A"], "T");
        let out = forward_chain(&kb);
        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R1", "R2", "R3"]);
    }

    #[test]
    fn forward_stops_when_nothing_fires() {
        let kb = kb(&[(&["A", "B"], "C"), (&["A"], "E")], &["A"], "C");
        let out = forward_chain(&kb);
        assert!(!out.derived);
        assert_eq!(names(&kb, &out), vec!["R2"]);
        assert!(matches!(
            out.log,
            Log::Forward { state: ForwardState::NoRuleApplicable, .. }
        ));
    }

    #[test]
    fn forward_skips_rules_with_known_destination() {
        let kb = kb(&[(&["A"], "B"), (&["A"], "C")], &["A", "B"], "C");
        let out = forward_chain(&kb);
        assert_eq!(names(&kb, &out), vec!["R2"]);
        let Log::Forward { events, .. } = &out.log else {
            panic!("expected forward log");
        };
        assert_eq!(
            events[0],
            ForwardEvent::Skipped {
                iteration: 1,
                rule: RuleId(0),
                reason: SkipReason::DestinationKnown
            }
        );
    }

    #[test]
    fn both_engines_succeed_trivially_on_given_target() {
        let kb = kb(&[(&["A"], "B")], &["A", "B"], "B");
        for out in [forward_chain(&kb), backward_chain(&kb)] {
            assert!(out.derived);
            assert!(out.trace.is_empty());
            assert!(out.facts.derived().is_empty());
        }
        let Log::Backward(events) = backward_chain(&kb).log else {
            panic!("expected backward log");
        };
        assert!(events.is_empty());
    }

    #[test]
    fn backward_fails_on_missing_source() {
        let kb = kb(&[(&["A", "B"], "C")], &["A"], "C");
        let out = backward_chain(&kb);
        assert!(!out.derived);
        assert!(out.trace.is_empty());
        assert_eq!(fact_names(&kb, &out), vec!["A"]);
    }

    #[test]
    fn backward_backtracks_to_next_candidate() {
        let kb = kb(&[(&["X"], "Z"), (&["Y"], "Z")], &["Y"], "Z");
        let out = backward_chain(&kb);
        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R2"]);
        assert_eq!(fact_names(&kb, &out), vec!["Y", "Z"]);

        let Log::Backward(events) = &out.log else {
            panic!("expected backward log");
        };
        let z = kb.symbols.get("Z").unwrap();
        assert!(events.contains(&BackwardEvent::Backtrack {
            depth: 0,
            goal: z,
            rule: RuleId(0)
        }));
    }

    #[test]
    fn failed_candidate_leaves_no_partial_facts() {
        // R1 derives Q on the way and then dies on M; R2 succeeds without Q.
        let kb = kb(
            &[(&["Q", "M"], "Z"), (&["P"], "Q"), (&["P"], "Z")],
            &["P"],
            "Z",
        );
        let out = backward_chain(&kb);
        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R3"]);
        assert_eq!(fact_names(&kb, &out), vec!["P", "Z"]);
    }

    #[test]
    fn backward_detects_cycles() {
        let kb = kb(&[(&["A"], "B"), (&["B"], "A")], &[], "A");
        let out = backward_chain(&kb);
        assert!(!out.derived);
        assert!(out.trace.is_empty());
    }

    #[test]
    fn loop_through_alternative_rule() {
        // Proving A via R1 needs B; R2 would need A again while R4 is still
        // available for it.
        let kb = kb(
            &[(&["B"], "A"), (&["A"], "B"), (&["C"], "B"), (&["D"], "A")],
            &["C"],
            "A",
        );
        let out = backward_chain(&kb);
        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R3", "R1"]);

        let Log::Backward(events) = &out.log else {
            panic!("expected backward log");
        };
        let a = kb.symbols.get("A").unwrap();
        assert!(events.contains(&BackwardEvent::Loop { depth: 2, goal: a }));
    }

    #[test]
    fn derived_fact_is_reused() {
        let kb = kb(&[(&["A"], "B"), (&["B", "B"], "C")], &["A"], "C");
        let out = backward_chain(&kb);
        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R1", "R2"]);

        let Log::Backward(events) = &out.log else {
            panic!("expected backward log");
        };
        let b = kb.symbols.get("B").unwrap();
        assert!(events.contains(&BackwardEvent::FactDerived { depth: 1, goal: b }));
    }

    #[test]
    fn failed_candidate_releases_nested_rules() {
        // R1 marks R3 while proving Q, then dies on M. R2 needs R3 again.
        let kb = kb(
            &[(&["Q", "M"], "Z"), (&["Q"], "Z"), (&["P"], "Q")],
            &["P"],
            "Z",
        );
        let out = backward_chain(&kb);
        assert!(out.derived);
        assert_eq!(names(&kb, &out), vec!["R3", "R2"]);
        assert_eq!(fact_names(&kb, &out), vec!["P", "Q", "Z"]);
    }

    fn chain(len: usize) -> KnowledgeBase {
        let props: Vec<String> = (0..=len).map(|i| format!("P{i}")).collect();
        let sources: Vec<[&str; 1]> = props.iter().map(|p| [p.as_str()]).collect();
        let rules: Vec<(&[&str], &str)> = sources
            .iter()
            .zip(&props[1..])
            .map(|(s, d)| (&s[..], d.as_str()))
            .collect();
        kb(&rules, &["P0"], &props[len])
    }

    #[test]
    fn long_chain_is_proved_without_recursion() {
        let kb = chain(5000);
        let out = backward_chain(&kb);
        assert!(out.derived);
        assert_eq!(out.trace.len(), 5000);
        assert_eq!(out.trace.first(), Some(&RuleId(0)));
        assert_eq!(out.trace.last(), Some(&RuleId(4999)));
        assert_eq!(replay(&kb, &out.trace).unwrap(), out.facts.as_slice());

        let Log::Backward(events) = &out.log else {
            panic!("expected backward log");
        };
        let p0 = kb.symbols.get("P0").unwrap();
        assert!(events.contains(&BackwardEvent::FactGiven { depth: 5000, goal: p0 }));
    }

    #[test]
    fn engines_agree_on_a_deep_chain() {
        let kb = chain(300);
        let fwd = forward_chain(&kb);
        let bwd = backward_chain(&kb);
        assert!(fwd.derived && bwd.derived);
        assert_eq!(fwd.trace, bwd.trace);
    }

    #[test]
    fn replay_reproduces_final_facts() {
        let kb = kb(&[(&["C"], "D"), (&["A", "B"], "C")], &["A", "B"], "D");
        let out = forward_chain(&kb);
        assert_eq!(replay(&kb, &out.trace).unwrap(), out.facts.as_slice());

        assert_eq!(
            replay(&kb, &[RuleId(0)]),
            Err(ReplayError::SourceUnknown {
                rule: "R1".into(),
                source_name: "C".into()
            })
        );
        assert_eq!(replay(&kb, &[RuleId(9)]), Err(ReplayError::UnknownRule(9)));
    }

    #[test]
    fn solve_dispatches_on_strategy() {
        let kb = kb(&[(&["A"], "B")], &["A"], "B");
        assert_eq!(solve(&kb, &EngineConfig::forward()).strategy(), Strategy::Forward);
        assert_eq!(solve(&kb, &EngineConfig::backward()).strategy(), Strategy::Backward);
    }
}
