use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{Range, Url};

use crate::goal::GoalSnapshot;
use crate::syntax::sentence;
use crate::syntax::step_kind::StepKind;
use crate::term::Term;

/// One syntactic unit of the script, plus everything the engine knows
/// about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Raw text, leading whitespace and comments included. Concatenating
    /// every step's text plus the document tail reproduces the file.
    pub text: String,

    /// The span of the sentence proper, leading trivia excluded.
    pub range: Range,

    pub kind: StepKind,

    /// The goal state right before this step, from the round trip that
    /// last touched it. Steps ahead of an edit keep their snapshot.
    pub goals: GoalSnapshot,

    /// The declared terms this step's text references, in declaration
    /// order.
    pub context: Vec<Term>,
}

/// The live, ordered model of one script file.
///
/// The version counts submissions to the prover and strictly increases,
/// including across the compensating re-submission of a rollback.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    uri: Url,
    steps: Vec<Step>,
    tail: String,
    version: i32,
}

impl Document {
    pub fn parse(path: PathBuf, uri: Url, text: &str, version: i32) -> Document {
        let (steps, tail) = parse_steps(text);
        Document {
            path,
            uri,
            steps,
            tail,
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Advances to the next submission version and returns it.
    pub fn bump_version(&mut self) -> i32 {
        self.version += 1;
        self.version
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn tail(&self) -> &str {
        &self.tail
    }

    /// The full document text, rebuilt from the steps.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for step in &self.steps {
            text.push_str(&step.text);
        }
        text.push_str(&self.tail);
        text
    }

    pub(crate) fn set_step_goals(&mut self, index: usize, goals: GoalSnapshot) {
        if let Some(step) = self.steps.get_mut(index) {
            step.goals = goals;
        }
    }

    pub(crate) fn set_step_context(&mut self, index: usize, context: Vec<Term>) {
        if let Some(step) = self.steps.get_mut(index) {
            step.context = context;
        }
    }

    /// Swaps in a fully prepared replacement, after the prover accepted
    /// the corresponding text.
    pub(crate) fn replace(&mut self, steps: Vec<Step>, tail: String) {
        self.steps = steps;
        self.tail = tail;
    }
}

/// Parses text into steps with classified kinds and empty snapshots.
pub(crate) fn parse_steps(text: &str) -> (Vec<Step>, String) {
    let (sentences, tail) = sentence::split(text);
    let steps = sentences
        .into_iter()
        .map(|sentence| Step {
            kind: StepKind::classify(&sentence.text),
            text: sentence.text,
            range: sentence.range,
            goals: GoalSnapshot::default(),
            context: Vec::new(),
        })
        .collect();
    (steps, tail)
}
