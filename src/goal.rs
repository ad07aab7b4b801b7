use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Position;

/// One hypothesis group in a goal's context: several names may share a
/// single type, as in `n, m : nat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub names: Vec<String>,
    pub ty: String,
}

/// A single goal: hypotheses above the line, the conclusion below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub ty: String,

    #[serde(default)]
    pub hyps: Vec<Hypothesis>,
}

impl Goal {
    pub fn new<T: Into<String>>(ty: T) -> Goal {
        Goal {
            ty: ty.into(),
            hyps: Vec::new(),
        }
    }

    pub fn with_hyps<T: Into<String>>(ty: T, hyps: Vec<Hypothesis>) -> Goal {
        Goal {
            ty: ty.into(),
            hyps,
        }
    }
}

/// The prover's full goal state at one point: the focused goals, the
/// unfocused ones stacked by focus level, and the shelved and given-up
/// goals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalConfig {
    pub goals: Vec<Goal>,

    /// Each level holds the goals before and after the focused span.
    pub stack: Vec<(Vec<Goal>, Vec<Goal>)>,

    #[serde(default)]
    pub shelf: Vec<Goal>,

    #[serde(default)]
    pub given_up: Vec<Goal>,
}

impl GoalConfig {
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
            && self.stack.is_empty()
            && self.shelf.is_empty()
            && self.given_up.is_empty()
    }
}

/// The goal state observed for one document version at one position.
/// Snapshots compare by value, which is what rollback verification
/// relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalSnapshot {
    /// The document version whose round trip produced this snapshot.
    pub version: i32,

    /// The position the goals were requested at: the start of the step's
    /// sentence, so the state is the one before the step runs.
    pub position: Position,

    /// Informational messages the prover attached.
    pub messages: Vec<String>,

    pub goals: GoalConfig,
}

impl GoalSnapshot {
    pub fn new(version: i32, position: Position, goals: GoalConfig) -> GoalSnapshot {
        GoalSnapshot {
            version,
            position,
            messages: Vec::new(),
            goals,
        }
    }
}
