//! Human-readable and JSON renderings of an engine run.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::config::Strategy;
use crate::reasoner::{replay, BackwardEvent, ForwardEvent, ForwardState, Log, Outcome};
use crate::resolve::{KnowledgeBase, PropId, RuleId};
use crate::store::SkipReason;

/// Full three-part report: data, execution steps, results.
pub fn render_text(kb: &KnowledgeBase, outcome: &Outcome) -> String {
    let mut out = String::new();

    out.push_str("PART 1. Data\n");
    out.push_str("  1) Rules\n");
    for id in kb.rule_ids() {
        let _ = writeln!(out, "     {}", kb.display_rule(id));
    }
    out.push_str("  2) Facts\n");
    let _ = writeln!(out, "     {}", kb.names(&kb.facts).join(", "));
    out.push_str("  3) Target\n");
    let _ = writeln!(out, "     {}", kb.name(kb.target));
    out.push('\n');

    if !given_target(kb) {
        out.push_str("PART 2. Execution\n");
        for line in execution_lines(kb, outcome) {
            let _ = writeln!(out, "  {line}");
        }
        out.push('\n');
    }

    out.push_str("PART 3. Results\n");
    for line in result_lines(kb, outcome) {
        let _ = writeln!(out, "  {line}");
    }
    out
}

fn given_target(kb: &KnowledgeBase) -> bool {
    kb.facts.contains(&kb.target)
}

/// Summary lines for PART 3.
pub fn result_lines(kb: &KnowledgeBase, outcome: &Outcome) -> Vec<String> {
    let target = kb.name(kb.target);
    if given_target(kb) {
        return vec![format!(
            "Target {target} is among the given facts ({}). Path is empty.",
            kb.names(&kb.facts).join(", ")
        )];
    }
    if outcome.derived {
        vec![
            format!("1) Target {target} derived."),
            format!("2) Path: {}.", kb.rule_names(&outcome.trace).join(", ")),
        ]
    } else {
        vec![format!("1) Target {target} not derived.")]
    }
}

/// One line per engine decision, in the order they were taken.
pub fn execution_lines(kb: &KnowledgeBase, outcome: &Outcome) -> Vec<String> {
    match &outcome.log {
        Log::Forward { state, events } => forward_lines(kb, *state, events),
        Log::Backward(events) => backward_lines(kb, events),
    }
}

fn forward_lines(kb: &KnowledgeBase, state: ForwardState, events: &[ForwardEvent]) -> Vec<String> {
    let mut lines = vec![];
    let mut current = 0;
    // Forward facts only grow, so every intermediate set is a prefix of the
    // final replay.
    let all = replay(kb, &applied_rules(events)).unwrap_or_default();

    for e in events {
        let iteration = match e {
            ForwardEvent::Skipped { iteration, .. } | ForwardEvent::Applied { iteration, .. } => {
                *iteration
            }
        };
        if iteration != current {
            current = iteration;
            lines.push(format!("ITERATION {iteration}"));
        }

        match e {
            ForwardEvent::Skipped { rule, reason, .. } => {
                let why = match reason {
                    SkipReason::AlreadyApplied => "already applied".to_string(),
                    SkipReason::DestinationKnown => format!(
                        "{} is already a fact",
                        kb.name(kb.rule(*rule).destination)
                    ),
                    SkipReason::MissingSources(missing) => {
                        format!("missing {}", kb.names(missing).join(", "))
                    }
                };
                lines.push(format!("  {} skipped, {why}.", kb.display_rule(*rule)));
            }
            ForwardEvent::Applied { rule, facts, .. } => {
                let upto = (*facts).min(all.len());
                lines.push(format!(
                    "  {} applied. Facts {}.",
                    kb.display_rule(*rule),
                    fact_summary(kb, &all[..upto])
                ));
            }
        }
    }

    if state == ForwardState::NoRuleApplicable {
        lines.push("No applicable rule left.".to_string());
    }
    lines
}

fn applied_rules(events: &[ForwardEvent]) -> Vec<RuleId> {
    events
        .iter()
        .filter_map(|e| match e {
            ForwardEvent::Applied { rule, .. } => Some(*rule),
            ForwardEvent::Skipped { .. } => None,
        })
        .collect()
}

fn backward_lines(kb: &KnowledgeBase, events: &[BackwardEvent]) -> Vec<String> {
    let mut lines = Vec::with_capacity(events.len());
    let mut derived: Vec<PropId> = vec![];
    // Derived facts as they were when each pending rule attempt started.
    let mut saved: Vec<Vec<PropId>> = vec![];

    for (n, e) in events.iter().enumerate() {
        let prefix = format!("{:>3}) {}", n + 1, "-".repeat(e.depth()));
        let body = match e {
            BackwardEvent::FactGiven { goal, .. } => format!(
                "Target {}. Fact is given. Facts {}. Success.",
                kb.name(*goal),
                facts_with(kb, &derived)
            ),
            BackwardEvent::FactDerived { goal, .. } => format!(
                "Target {}. Fact was derived earlier. Facts {}. Success.",
                kb.name(*goal),
                facts_with(kb, &derived)
            ),
            BackwardEvent::NoRuleFound { goal, .. } => {
                format!("Target {}. No deriving rule. FAIL.", kb.name(*goal))
            }
            BackwardEvent::Loop { goal, .. } => {
                format!("Target {}. Loop. FAIL.", kb.name(*goal))
            }
            BackwardEvent::RuleFound { goal, rule, .. } => {
                saved.push(derived.clone());
                format!(
                    "Target {}. Found rule {}. New targets {}.",
                    kb.name(*goal),
                    kb.display_rule(*rule),
                    kb.names(&kb.rule(*rule).sources).join(", ")
                )
            }
            BackwardEvent::Derived { goal, derived: now, .. } => {
                saved.pop();
                derived = now.clone();
                format!(
                    "Target {}. Fact now derived. Facts {}. Success.",
                    kb.name(*goal),
                    facts_with(kb, &derived)
                )
            }
            BackwardEvent::Backtrack { goal, rule, .. } => {
                derived = saved.pop().unwrap_or_default();
                format!(
                    "Target {}. Rule {} failed, backtracking.",
                    kb.name(*goal),
                    kb.rule(*rule).name
                )
            }
            BackwardEvent::NoMoreRules { goal, .. } => {
                format!("Target {}. No more rules. FAIL.", kb.name(*goal))
            }
        };
        lines.push(format!("{prefix}{body}"));
    }
    lines
}

/// `A, B` or `A, B and C, D` (given, then derived).
fn facts_with(kb: &KnowledgeBase, derived: &[PropId]) -> String {
    let given = kb.names(&kb.facts).join(", ");
    if derived.is_empty() {
        given
    } else {
        format!("{given} and {}", kb.names(derived).join(", "))
    }
}

fn fact_summary(kb: &KnowledgeBase, facts: &[PropId]) -> String {
    let split = kb.facts.len().min(facts.len());
    facts_with(kb, &facts[split..])
}

//
// ------------------------- JSON -------------------------
//

#[derive(Debug, Serialize)]
pub struct JsonRule<'a> {
    pub name: &'a str,
    pub sources: Vec<&'a str>,
    pub destination: &'a str,
}

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub strategy: Strategy,
    pub rules: Vec<JsonRule<'a>>,
    pub facts: Vec<&'a str>,
    pub target: &'a str,
    pub derived: bool,
    pub path: Vec<&'a str>,
    pub final_facts: Vec<&'a str>,
    pub steps: Vec<String>,
}

impl<'a> JsonReport<'a> {
    pub fn new(kb: &'a KnowledgeBase, outcome: &'a Outcome, file: Option<&Path>) -> Self {
        JsonReport {
            file: file.map(|p| p.display().to_string()),
            strategy: outcome.strategy(),
            rules: kb
                .rules
                .iter()
                .map(|r| JsonRule {
                    name: &r.name,
                    sources: kb.names(&r.sources),
                    destination: kb.name(r.destination),
                })
                .collect(),
            facts: kb.names(&kb.facts),
            target: kb.name(kb.target),
            derived: outcome.derived,
            path: kb.rule_names(&outcome.trace),
            final_facts: kb.names(outcome.facts.as_slice()),
            steps: execution_lines(kb, outcome),
        }
    }
}

pub fn render_json(
    kb: &KnowledgeBase,
    outcome: &Outcome,
    file: Option<&Path>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport::new(kb, outcome, file))
}

/// Several runs as one JSON array, in the order given.
pub fn render_json_runs<'a>(
    runs: impl IntoIterator<Item = (&'a KnowledgeBase, &'a Outcome, Option<&'a Path>)>,
) -> serde_json::Result<String> {
    let reports: Vec<JsonReport<'a>> = runs
        .into_iter()
        .map(|(kb, outcome, file)| JsonReport::new(kb, outcome, file))
        .collect();
    serde_json::to_string_pretty(&reports)
}
