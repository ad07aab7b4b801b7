use tracing::trace;

use crate::context::FileContext;
use crate::document::{Document, Step};
use crate::syntax::step_kind::StepKind;
use crate::term::{Term, TermKind};

/// A provable statement with the steps of its proof.
///
/// `statement` and `body` are indices into the document's step sequence,
/// not copies; resolve them against the live document. The terminator
/// step belongs to `body` once the proof is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofTerm {
    pub term: Term,

    /// Index of the opening statement step.
    pub statement: usize,

    /// Indices of the body steps, in document order.
    pub body: Vec<usize>,

    /// The terms visible to the opening statement. An obligation inherits
    /// the context of its owning `Program` command instead.
    pub context: Vec<Term>,

    /// For obligations, the `Program` command that spawned them.
    pub program: Option<Term>,

    closed: bool,
}

impl ProofTerm {
    /// The opening statement, as a single trimmed line.
    pub fn text(&self) -> &str {
        &self.term.text
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The body steps, resolved against the document.
    pub fn steps<'a>(&self, document: &'a Document) -> Vec<&'a Step> {
        self.body
            .iter()
            .filter_map(|&i| document.step(i))
            .collect()
    }
}

/// The proof structure of the document: finished proofs and the ones
/// still missing their closing step, each ordered by the document
/// position of their opening statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outline {
    pub proofs: Vec<ProofTerm>,
    pub open_proofs: Vec<ProofTerm>,
}

/// Everything one walk over the steps produces: the outline, the final
/// resolver state, and per-step reference data.
#[derive(Debug)]
pub struct Derivation {
    pub outline: Outline,
    pub context: FileContext,

    /// The terms each step references, by step index.
    pub step_contexts: Vec<Vec<Term>>,

    /// Notation patterns each step uses that no local declaration
    /// matched, by step index.
    pub unresolved: Vec<Vec<String>>,
}

struct OpenUnit {
    proof: ProofTerm,

    // Declared inside a `Module Type`: kept on the stack for nesting but
    // left out of the outline.
    excluded: bool,
}

/// Derives the proof outline from the classified steps.
///
/// Only the first `steps_taken` steps count as run: a terminator at or
/// past the cursor leaves its unit open, and steps past the cursor
/// belong to no body. Scope tracking and reference resolution still walk
/// the whole document, so every step keeps a context.
pub fn derive(steps: &[Step], steps_taken: usize) -> Derivation {
    let mut context = FileContext::new();
    let mut stack: Vec<OpenUnit> = Vec::new();
    let mut finished: Vec<OpenUnit> = Vec::new();
    let mut step_contexts = Vec::with_capacity(steps.len());
    let mut unresolved = Vec::with_capacity(steps.len());

    for (i, step) in steps.iter().enumerate() {
        let resolution = context.resolve(&step.text);
        let executed = i < steps_taken;

        match &step.kind {
            StepKind::Opener { kind, .. } => {
                if executed {
                    let term = Term::new(&step.text, *kind, context.module_path());
                    stack.push(OpenUnit {
                        proof: ProofTerm {
                            term,
                            statement: i,
                            body: Vec::new(),
                            context: resolution.terms.clone(),
                            program: None,
                            closed: false,
                        },
                        excluded: context.in_module_type(),
                    });
                }
            }
            StepKind::Obligation { of } => {
                if executed {
                    let (program, inherited) = match context.program(of.as_deref()) {
                        Some((term, refs)) => (Some(term.clone()), refs.clone()),
                        None => (None, resolution.terms.clone()),
                    };
                    let term = Term::new(&step.text, TermKind::Obligation, context.module_path());
                    stack.push(OpenUnit {
                        proof: ProofTerm {
                            term,
                            statement: i,
                            body: Vec::new(),
                            context: inherited,
                            program,
                            closed: false,
                        },
                        excluded: context.in_module_type(),
                    });
                }
            }
            StepKind::Terminator(_) => {
                if executed {
                    if let Some(mut unit) = stack.pop() {
                        unit.proof.body.push(i);
                        unit.proof.closed = true;
                        finished.push(unit);
                    }
                }
            }
            _ => {
                if executed {
                    if let Some(unit) = stack.last_mut() {
                        unit.proof.body.push(i);
                    }
                }
            }
        }

        context.advance(&step.kind, &step.text, &resolution.terms);
        step_contexts.push(resolution.terms);
        unresolved.push(resolution.unresolved);
    }

    finished.extend(stack);

    let mut proofs = Vec::new();
    let mut open_proofs = Vec::new();
    for unit in finished {
        if unit.excluded {
            continue;
        }
        if unit.proof.closed {
            proofs.push(unit.proof);
        } else {
            open_proofs.push(unit.proof);
        }
    }
    proofs.sort_by_key(|p| p.statement);
    open_proofs.sort_by_key(|p| p.statement);
    trace!(
        proofs = proofs.len(),
        open_proofs = open_proofs.len(),
        steps_taken,
        "derived outline"
    );

    Derivation {
        outline: Outline {
            proofs,
            open_proofs,
        },
        context,
        step_contexts,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_steps;

    fn outline_of(text: &str) -> Outline {
        let (steps, _) = parse_steps(text);
        let taken = steps.len();
        derive(&steps, taken).outline
    }

    #[test]
    fn test_single_closed_proof() {
        let outline = outline_of("Theorem t: P.\nProof.\nintros.\nQed.\n");
        assert_eq!(outline.proofs.len(), 1);
        assert_eq!(outline.open_proofs.len(), 0);
        assert_eq!(outline.proofs[0].statement, 0);
        assert_eq!(outline.proofs[0].body, vec![1, 2, 3]);
    }

    #[test]
    fn test_unterminated_proof_stays_open() {
        let outline = outline_of("Theorem t: P.\nProof.\nintros.\n");
        assert_eq!(outline.proofs.len(), 0);
        assert_eq!(outline.open_proofs.len(), 1);
        assert_eq!(outline.open_proofs[0].body, vec![1, 2]);
    }

    #[test]
    fn test_cursor_before_terminator_reopens() {
        let (steps, _) = parse_steps("Theorem t: P.\nProof.\nintros.\nQed.\n");
        let outline = derive(&steps, 3).outline;
        assert_eq!(outline.proofs.len(), 0);
        assert_eq!(outline.open_proofs.len(), 1);
        assert_eq!(outline.open_proofs[0].body, vec![1, 2]);
    }

    #[test]
    fn test_nested_proofs() {
        let text =
            "Theorem outer: P.\nProof.\nTheorem inner: Q.\nProof.\nauto.\nQed.\nauto.\nQed.\n";
        let outline = outline_of(text);
        assert_eq!(outline.proofs.len(), 2);
        // Position order, not closing order.
        assert_eq!(outline.proofs[0].statement, 0);
        assert_eq!(outline.proofs[1].statement, 2);
        // The inner unit's statement and body belong to the inner unit only.
        assert_eq!(outline.proofs[0].body, vec![1, 6, 7]);
        assert_eq!(outline.proofs[1].body, vec![3, 4, 5]);
    }

    #[test]
    fn test_module_type_proofs_excluded() {
        let text = "Module Type Spec.\nLemma inside: P.\nProof.\nAdmitted.\nEnd Spec.\n\
                    Lemma outside: P.\nProof.\nAdmitted.\n";
        let outline = outline_of(text);
        assert_eq!(outline.proofs.len(), 1);
        assert_eq!(outline.proofs[0].text(), "Lemma outside: P.");
    }

    #[test]
    fn test_obligations_link_to_program() {
        let text = "Program Definition id1 (n : nat) : { x : nat | x = n } := n.\n\
                    Next Obligation.\ndummy.\nQed.\n\
                    Obligation 1 of id1.\ndummy.\nQed.\n";
        let outline = outline_of(text);
        assert_eq!(outline.proofs.len(), 2);
        for proof in &outline.proofs {
            assert_eq!(proof.term.kind, TermKind::Obligation);
            let program = proof.program.as_ref().unwrap();
            assert_eq!(program.name(), Some("id1".to_string()));
        }
        assert_eq!(outline.proofs[0].text(), "Next Obligation.");
        assert_eq!(outline.proofs[1].text(), "Obligation 1 of id1.");
    }

    #[test]
    fn test_obligation_inherits_program_context() {
        let text = "Notation pred := Nat.pred (only parsing).\n\
                    Program Definition id (n : nat) : nat := pred n.\n\
                    Next Obligation.\nQed.\n";
        let outline = outline_of(text);
        assert_eq!(outline.proofs.len(), 1);
        let context = &outline.proofs[0].context;
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].text, "Notation pred := Nat.pred (only parsing).");
    }

    #[test]
    fn test_theorem_family_kinds() {
        let text = "Remark r: P.\nAdmitted.\nFact f: P.\nAdmitted.\nCorollary c: P.\nAdmitted.\n\
                    Proposition p: P.\nAdmitted.\nProperty pr: P.\nAdmitted.\n\
                    Theorem t: P.\nAdmitted.\nLemma l: P.\nAdmitted.\n";
        let outline = outline_of(text);
        let kinds: Vec<TermKind> = outline.proofs.iter().map(|p| p.term.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TermKind::Remark,
                TermKind::Fact,
                TermKind::Corollary,
                TermKind::Proposition,
                TermKind::Property,
                TermKind::Theorem,
                TermKind::Lemma,
            ]
        );
    }

    #[test]
    fn test_goal_and_definition_open_units() {
        let text = "Goal forall P: Prop, P -> P.\nAdmitted.\n\
                    Definition ignored : forall P: Prop, P -> P.\nAdmitted.\n\
                    Definition given : nat := 3.\n";
        let outline = outline_of(text);
        assert_eq!(outline.proofs.len(), 2);
        assert_eq!(outline.proofs[0].term.kind, TermKind::Other);
        assert_eq!(outline.proofs[1].term.kind, TermKind::Definition);
    }

    #[test]
    fn test_section_let_proof_and_locals_dropped() {
        let text = "Section S1.\nLet ignored : nat.\nAdmitted.\nEnd S1.\n";
        let (steps, _) = parse_steps(text);
        let taken = steps.len();
        let derivation = derive(&steps, taken);
        assert_eq!(derivation.outline.proofs.len(), 1);
        assert_eq!(derivation.outline.proofs[0].text(), "Let ignored : nat.");
        assert!(derivation.context.local_terms().is_empty());
    }

    #[test]
    fn test_statement_context_captured_at_open() {
        let text = "Notation plus := Nat.add (only parsing).\n\
                    Theorem t: plus 0 0 = 0.\nAdmitted.\n";
        let outline = outline_of(text);
        assert_eq!(outline.proofs.len(), 1);
        assert_eq!(outline.proofs[0].context.len(), 1);
        assert_eq!(
            outline.proofs[0].context[0].text,
            "Notation plus := Nat.add (only parsing)."
        );
    }
}
