use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::ast::NodeId;
use crate::error::Span;
use crate::template::Template;

/// What happened to a branch during a transform.
///
/// Ordered so that merging runs keeps the strongest outcome.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchState {
    /// The condition was evaluated and did not hold.
    Failed,
    /// The branch body was entered.
    Passed,
}

/// Branch outcomes keyed by the id of the branch body.
///
/// Branches that were never reached have no entry.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Coverage {
    states: BTreeMap<NodeId, BranchState>,
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, branch: NodeId, state: BranchState) {
        let entry = self.states.entry(branch).or_insert(state);
        *entry = (*entry).max(state);
    }

    pub fn state(&self, branch: NodeId) -> Option<BranchState> {
        self.states.get(&branch).copied()
    }

    pub fn passed(&self, branch: NodeId) -> bool {
        self.state(branch) == Some(BranchState::Passed)
    }

    /// Folds another run of the same template into this one.
    pub fn merge(&mut self, other: &Self) {
        for (branch, state) in &other.states {
            self.record(*branch, *state);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, BranchState)> + '_ {
        self.states.iter().map(|(id, state)| (*id, *state))
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BranchKind {
    If,
    ElseIf,
    Else,
}

impl std::fmt::Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::If => "IF",
            Self::ElseIf => "ELIF",
            Self::Else => "ELSE",
        })
    }
}

/// A branch of a conditional, as listed by [`Template::branches`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchInfo {
    /// The branch body; the key used in [`Coverage`].
    pub id: NodeId,
    pub kind: BranchKind,
    /// `None` for `ELSE`.
    pub expression: Option<String>,
    pub span: Span,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchCoverage {
    pub branch: BranchInfo,
    pub state: Option<BranchState>,
}

/// Every branch of a template next to what happened to it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageReport {
    pub branches: Vec<BranchCoverage>,
}

impl CoverageReport {
    pub fn new(branches: Vec<BranchInfo>, coverage: &Coverage) -> Self {
        Self {
            branches: branches
                .into_iter()
                .map(|branch| BranchCoverage {
                    state: coverage.state(branch.id),
                    branch,
                })
                .collect(),
        }
    }

    pub fn total(&self) -> usize {
        self.branches.len()
    }

    pub fn covered(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| b.state == Some(BranchState::Passed))
            .count()
    }

    /// Branches that were never entered.
    pub fn uncovered(&self) -> impl Iterator<Item = &BranchInfo> {
        self.branches
            .iter()
            .filter(|b| b.state != Some(BranchState::Passed))
            .map(|b| &b.branch)
    }

    /// Share of branches entered at least once; `1.0` for templates without
    /// conditionals.
    #[allow(
        clippy::cast_precision_loss,
        reason = "branch counts are far below f64 precision"
    )]
    pub fn ratio(&self) -> f64 {
        if self.branches.is_empty() {
            1.0
        } else {
            self.covered() as f64 / self.total() as f64
        }
    }
}

impl std::fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "branches covered: {}/{}", self.covered(), self.total())?;
        for entry in &self.branches {
            let marker = match entry.state {
                Some(BranchState::Passed) => "passed",
                Some(BranchState::Failed) => "failed",
                None => "not reached",
            };
            write!(f, "  {}: {}", entry.branch.span, entry.branch.kind)?;
            if let Some(expression) = &entry.branch.expression {
                write!(f, " {expression}")?;
            }
            writeln!(f, " [{marker}]")?;
        }
        Ok(())
    }
}

/// Receives the coverage of every successful transform.
///
/// Handlers are test tooling; they never influence the produced statement.
pub trait CoverageHandler: Send + Sync {
    fn handle(&self, template: &Template, coverage: &Coverage);
}

#[derive(Debug)]
struct Collected {
    branches: Vec<BranchInfo>,
    coverage: Coverage,
}

/// A [`CoverageHandler`] that accumulates coverage per template.
///
/// Templates are keyed by name, or by their source text when unnamed.
#[derive(Debug, Default)]
pub struct CoverageCollector {
    entries: Mutex<BTreeMap<String, Collected>>,
}

impl CoverageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report<K: AsRef<str>>(&self, key: K) -> Option<CoverageReport> {
        self.entries
            .lock()
            .get(key.as_ref())
            .map(|collected| CoverageReport::new(collected.branches.clone(), &collected.coverage))
    }

    pub fn reports(&self) -> Vec<(String, CoverageReport)> {
        self.entries
            .lock()
            .iter()
            .map(|(key, collected)| {
                (
                    key.clone(),
                    CoverageReport::new(collected.branches.clone(), &collected.coverage),
                )
            })
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl CoverageHandler for CoverageCollector {
    fn handle(&self, template: &Template, coverage: &Coverage) {
        let key = template.name().unwrap_or(template.source()).to_owned();
        let mut entries = self.entries.lock();
        entries
            .entry(key)
            .or_insert_with(|| Collected {
                branches: template.branches(),
                coverage: Coverage::new(),
            })
            .coverage
            .merge(coverage);
    }
}
