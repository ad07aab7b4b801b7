use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Url};
use tracing::{debug, trace};

use crate::client::ProverClient;
use crate::context::FileContext;
use crate::document::{parse_steps, Document, Step};
use crate::error::{Error, Result};
use crate::goal::GoalSnapshot;
use crate::proof::{self, Outline, ProofTerm};
use crate::syntax::step_kind::StepKind;
use crate::term::Term;

/// One operation of a `change_steps` batch. Indices resolve against the
/// document as already modified by the preceding operations of the same
/// batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    /// Insert a new step after the given index, or before the first step
    /// when `after` is `None`. The text carries its own leading
    /// whitespace.
    Add {
        after: Option<usize>,
        text: String,
    },
    Delete {
        index: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ProofFileConfig {
    /// How long to wait for the prover's answer to one submission.
    pub timeout: Duration,
}

impl Default for ProofFileConfig {
    fn default() -> Self {
        ProofFileConfig {
            timeout: Duration::from_secs(30),
        }
    }
}

/// The live, editable model of one proof script, synchronized with the
/// prover.
///
/// All mutating operations take `&mut self`; one edit is in flight at a
/// time by ownership alone. A rejected edit leaves every observable
/// value, including the on-disk file, exactly as before the call.
pub struct ProofFile {
    client: Arc<dyn ProverClient>,
    document: Document,
    outline: Outline,
    context: FileContext,
    diagnostics: Vec<Diagnostic>,
    valid: bool,
    steps_taken: usize,
    timeout: Duration,
}

impl ProofFile {
    /// Opens the file on the prover, runs the whole document, and builds
    /// the initial model. A document that is invalid at baseline still
    /// opens, but refuses every subsequent edit.
    pub async fn open(
        client: Arc<dyn ProverClient>,
        path: impl AsRef<Path>,
        config: ProofFileConfig,
    ) -> Result<ProofFile> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)?;
        let uri = Url::from_file_path(&path)
            .map_err(|_| Error::client(format!("not a file path: {}", path.display())))?;

        let version = client.open(uri.clone(), text.clone()).await?;
        let timeout = config.timeout;
        let diagnostics =
            await_diagnostics(client.as_ref(), &uri, version, timeout).await?;
        let valid = !has_errors(&diagnostics);

        let mut document = Document::parse(path, uri, &text, version);
        if valid {
            for i in 0..document.step_count() {
                let position = document.step(i).unwrap().range.start;
                let goals =
                    await_goals(client.as_ref(), document.uri(), version, position, timeout)
                        .await?;
                document.set_step_goals(i, goals);
            }
        }

        let steps_taken = document.step_count();
        let (outline, context, step_contexts) =
            derive_with_locate(client.as_ref(), document.steps(), steps_taken).await?;
        for (i, terms) in step_contexts.into_iter().enumerate() {
            document.set_step_context(i, terms);
        }
        Ok(ProofFile {
            client,
            document,
            outline,
            context,
            diagnostics,
            valid,
            steps_taken,
            timeout,
        })
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    pub fn text(&self) -> String {
        self.document.text()
    }

    pub fn steps(&self) -> &[Step] {
        self.document.steps()
    }

    pub fn step_count(&self) -> usize {
        self.document.step_count()
    }

    /// Finished proofs, ordered by the position of their statement.
    pub fn proofs(&self) -> &[ProofTerm] {
        &self.outline.proofs
    }

    /// Proofs whose closing step has not been run, same order.
    pub fn open_proofs(&self) -> &[ProofTerm] {
        &self.outline.open_proofs
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// The resolver over the whole document, for notation lookup and the
    /// live section-local terms.
    pub fn context(&self) -> &FileContext {
        &self.context
    }

    /// Inserts one step after `after`, or at the start for `None`.
    pub async fn add_step(&mut self, after: Option<usize>, text: &str) -> Result<()> {
        self.apply(vec![ChangeOp::Add {
            after,
            text: text.to_string(),
        }])
        .await
    }

    /// Removes the step at `index`.
    pub async fn delete_step(&mut self, index: usize) -> Result<()> {
        self.apply(vec![ChangeOp::Delete { index }]).await
    }

    /// Applies the whole batch as one transaction: one submission, one
    /// version, committed or rolled back as a unit.
    pub async fn change_steps(&mut self, ops: Vec<ChangeOp>) -> Result<()> {
        self.apply(ops).await
    }

    /// Moves the execution cursor by `delta` steps without touching the
    /// text. Crossing a terminator forward closes its unit; crossing it
    /// backward reopens it. Rewinding past the opening statement of the
    /// outermost still-open proof is refused with the cursor unchanged.
    pub fn exec(&mut self, delta: i32) -> Result<()> {
        let target = self.steps_taken as i64 + delta as i64;
        let target = target.clamp(0, self.document.step_count() as i64) as usize;
        if target < self.steps_taken {
            if let Some(entered) = self
                .outline
                .open_proofs
                .iter()
                .filter(|p| p.statement < self.steps_taken)
                .map(|p| p.statement)
                .min()
            {
                if target <= entered {
                    return Err(Error::unsupported(format!(
                        "cannot rewind the cursor past the proof entered at step {}",
                        entered
                    )));
                }
            }
        }
        self.steps_taken = target;
        let derivation = proof::derive(self.document.steps(), self.steps_taken);
        self.outline = derivation.outline;
        Ok(())
    }

    /// Closes the document on the prover.
    pub async fn close(&mut self) -> Result<()> {
        self.client.close(self.document.uri().clone()).await
    }

    // The shared algorithm behind add, delete and batch edits. Builds a
    // candidate text without touching the live model, submits it, and
    // commits only when the prover reports no error for the new version.
    async fn apply(&mut self, ops: Vec<ChangeOp>) -> Result<()> {
        if !self.valid {
            return Err(Error::InvalidFile);
        }
        if ops.is_empty() {
            return Ok(());
        }

        let mut texts: Vec<String> = self
            .document
            .steps()
            .iter()
            .map(|s| s.text.clone())
            .collect();
        let mut first_affected = texts.len();
        // Final positions of steps this batch inserted, for blaming a
        // rejection on the right operation kind.
        let mut added: Vec<usize> = Vec::new();
        let mut deleted_any = false;

        for op in &ops {
            match op {
                ChangeOp::Add { after, text } => {
                    let at = match after {
                        Some(i) => {
                            if *i >= texts.len() {
                                return Err(Error::unsupported(format!(
                                    "step index {} is out of range",
                                    i
                                )));
                            }
                            i + 1
                        }
                        None => 0,
                    };
                    texts.insert(at, text.clone());
                    for a in added.iter_mut() {
                        if *a >= at {
                            *a += 1;
                        }
                    }
                    added.push(at);
                    first_affected = first_affected.min(at);
                }
                ChangeOp::Delete { index } => {
                    if *index >= texts.len() {
                        return Err(Error::unsupported(format!(
                            "step index {} is out of range",
                            index
                        )));
                    }
                    self.check_delete(&texts, *index)?;
                    texts.remove(*index);
                    added.retain(|a| a != index);
                    for a in added.iter_mut() {
                        if *a > *index {
                            *a -= 1;
                        }
                    }
                    deleted_any = true;
                    first_affected = first_affected.min(*index);
                }
            }
        }

        let mut candidate = String::new();
        for text in &texts {
            candidate.push_str(text);
        }
        candidate.push_str(self.document.tail());

        let version = self.document.bump_version();
        let uri = self.document.uri().clone();
        debug!(version, ops = ops.len(), "submitting edit");
        if let Err(e) = self
            .client
            .change(uri.clone(), version, candidate.clone())
            .await
        {
            return Err(self.rollback(e).await);
        }

        let diagnostics =
            match await_diagnostics(self.client.as_ref(), &uri, version, self.timeout).await {
                Ok(diagnostics) => diagnostics,
                Err(e) => return Err(self.rollback(e).await),
            };
        if has_errors(&diagnostics) {
            let (new_steps, _) = parse_steps(&candidate);
            let invalid_add = first_error_in_added(&diagnostics, &new_steps, &added)
                || !deleted_any;
            let error = if invalid_add {
                Error::InvalidAdd(diagnostics)
            } else {
                Error::InvalidDelete(diagnostics)
            };
            return Err(self.rollback(error).await);
        }

        // Re-segment the accepted text so every range is recomputed
        // locally; earlier steps keep their snapshots and version tags.
        let (mut new_steps, new_tail) = parse_steps(&candidate);
        for (i, step) in new_steps.iter_mut().enumerate() {
            if i < first_affected {
                step.goals = self.document.step(i).unwrap().goals.clone();
            } else {
                let goals = match await_goals(
                    self.client.as_ref(),
                    &uri,
                    version,
                    step.range.start,
                    self.timeout,
                )
                .await
                {
                    Ok(goals) => goals,
                    Err(e) => return Err(self.rollback(e).await),
                };
                step.goals = goals;
            }
        }

        // Stage the derivation and the disk write on the candidate, so a
        // failure in either still leaves the live model untouched and
        // rolls the prover back like any other rejection.
        let (outline, context, step_contexts) =
            match derive_with_locate(self.client.as_ref(), &new_steps, new_steps.len()).await {
                Ok(derived) => derived,
                Err(e) => return Err(self.rollback(e).await),
            };
        for (step, terms) in new_steps.iter_mut().zip(step_contexts) {
            step.context = terms;
        }
        if let Err(e) = std::fs::write(self.document.path(), &candidate) {
            return Err(self.rollback(e.into()).await);
        }

        self.document.replace(new_steps, new_tail);
        self.diagnostics = diagnostics;
        self.steps_taken = self.document.step_count();
        self.outline = outline;
        self.context = context;
        debug!(version, steps = self.document.step_count(), "edit committed");
        Ok(())
    }

    // Deleting the opening statement of a unit that still has body steps
    // would splice the body across a proof boundary.
    fn check_delete(&self, texts: &[String], index: usize) -> Result<()> {
        let steps: Vec<Step> = texts
            .iter()
            .map(|text| Step {
                kind: StepKind::classify(text),
                text: text.clone(),
                range: Default::default(),
                goals: GoalSnapshot::default(),
                context: Vec::new(),
            })
            .collect();
        let derivation = proof::derive(&steps, steps.len());
        for proof in derivation
            .outline
            .proofs
            .iter()
            .chain(&derivation.outline.open_proofs)
        {
            if proof.statement == index && !proof.body.is_empty() {
                return Err(Error::unsupported(format!(
                    "cannot delete the statement at step {} while its proof has {} steps",
                    index,
                    proof.body.len()
                )));
            }
        }
        Ok(())
    }

    // The compensating transaction: put the prover back on the live text
    // with a fresh version, then report the original error. A failure
    // here means the model and the prover no longer agree, which is
    // fatal.
    async fn rollback(&mut self, error: Error) -> Error {
        let version = self.document.bump_version();
        let uri = self.document.uri().clone();
        debug!(version, kind = error.error_type(), "rolling back edit");
        if let Err(e) = self
            .client
            .change(uri.clone(), version, self.document.text())
            .await
        {
            return Error::desync(format!("rollback submission failed: {}", e));
        }
        match await_diagnostics(self.client.as_ref(), &uri, version, self.timeout).await {
            Ok(diagnostics) if !has_errors(&diagnostics) => error,
            Ok(_) => Error::desync("the prover rejected the restored text".to_string()),
            Err(e) => Error::desync(format!("no answer for the restored text: {}", e)),
        }
    }

}

// Derives the outline and every step's context, consulting the prover's
// locate for notations the local resolver cannot see. Pure over its
// inputs: callers commit the result only once everything has succeeded.
async fn derive_with_locate(
    client: &dyn ProverClient,
    steps: &[Step],
    steps_taken: usize,
) -> Result<(Outline, FileContext, Vec<Vec<Term>>)> {
    let derivation = proof::derive(steps, steps_taken);
    let mut step_contexts = Vec::with_capacity(derivation.step_contexts.len());
    for (i, mut terms) in derivation.step_contexts.into_iter().enumerate() {
        for pattern in &derivation.unresolved[i] {
            trace!(pattern, step = i, "locate fallback");
            if let Some(term) = client.locate(pattern.clone(), String::new()).await? {
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }
        step_contexts.push(terms);
    }
    Ok((derivation.outline, derivation.context, step_contexts))
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.severity == Some(DiagnosticSeverity::ERROR))
}

// Whether the earliest error diagnostic falls inside a step this batch
// added, as opposed to fallout from a deletion.
fn first_error_in_added(diagnostics: &[Diagnostic], steps: &[Step], added: &[usize]) -> bool {
    let Some(first) = diagnostics
        .iter()
        .filter(|d| d.severity == Some(DiagnosticSeverity::ERROR))
        .min_by_key(|d| (d.range.start.line, d.range.start.character))
    else {
        return false;
    };
    added.iter().any(|&i| {
        steps.get(i).is_some_and(|step| {
            step.range.start.line <= first.range.start.line
                && first.range.start.line <= step.range.end.line
        })
    })
}

// Waits for the diagnostics of exactly this version, bounded by the
// configured timeout.
async fn await_diagnostics(
    client: &dyn ProverClient,
    uri: &Url,
    version: i32,
    timeout: Duration,
) -> Result<Vec<Diagnostic>> {
    match tokio::time::timeout(timeout, client.diagnostics_for(uri.clone(), version)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

// Polls the goal state until the prover has caught up with the requested
// version. Snapshots tagged with an older version are stale and
// discarded rather than resurrected. Each query is bounded by whatever
// remains of the configured window.
async fn await_goals(
    client: &dyn ProverClient,
    uri: &Url,
    version: i32,
    position: Position,
    timeout: Duration,
) -> Result<GoalSnapshot> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let query = client.goals_at(uri.clone(), version, position);
        let snapshot = match tokio::time::timeout(remaining, query).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout(timeout)),
        };
        if snapshot.version >= version {
            return Ok(snapshot);
        }
        trace!(
            got = snapshot.version,
            wanted = version,
            "discarding stale goal snapshot"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
