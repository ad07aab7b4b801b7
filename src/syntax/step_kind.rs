use crate::term::TermKind;

/// How a proof for the innermost open unit was ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Qed,
    Defined,
    Admitted,
    Abort,
}

/// The syntactic classification of one script sentence, computed once when
/// the sentence enters the document and dispatched on everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Introduces a provable statement whose proof follows in later steps.
    /// `local` marks section-local declarations (`Let`).
    Opener {
        kind: TermKind,
        name: Option<String>,
        local: bool,
    },

    /// Declares and completes a term in a single sentence.
    Definer {
        kind: TermKind,
        name: Option<String>,
        local: bool,
    },

    /// A `Program` command; the prover spawns obligations for its holes.
    Program { kind: TermKind, name: Option<String> },

    /// Opens the proof of one obligation of an earlier `Program` command.
    /// `of` names the program explicitly, otherwise the most recent one
    /// is meant.
    Obligation { of: Option<String> },

    /// Closes the innermost open proof.
    Terminator(Terminator),

    /// `Module M.` or `Module Type M.`; terms declared inside a module
    /// type are specifications rather than usable proofs.
    ModuleStart { name: String, is_type: bool },

    /// `Section S.`; `Let`-style declarations inside it are dropped when
    /// the section ends.
    SectionStart { name: String },

    /// `End M.`, closing the innermost module, module type or section.
    ScopeEnd { name: String },

    /// `Require` / `Import` / `Export`. When `opens` is set, the named
    /// modules' terms become visible without qualification.
    Import { modules: Vec<String>, opens: bool },

    /// Tactics, queries, bullets, focus braces, `Proof.` and its variants.
    Plain,
}

const MODIFIERS: &[&str] = &[
    "Local",
    "Global",
    "Polymorphic",
    "Monomorphic",
    "Cumulative",
    "NonCumulative",
    "Private",
];

pub(crate) fn is_modifier(word: &str) -> bool {
    MODIFIERS.contains(&word)
}

impl StepKind {
    pub fn classify(text: &str) -> StepKind {
        let mut rest = strip_attributes(text.trim_start());
        let mut head = match next_word(rest) {
            Some((word, tail)) => {
                rest = tail;
                word
            }
            None => return StepKind::Plain,
        };
        while MODIFIERS.contains(&head) {
            match next_word(rest) {
                Some((word, tail)) => {
                    head = word;
                    rest = tail;
                }
                None => return StepKind::Plain,
            }
        }
        match head {
            "Theorem" => opener(TermKind::Theorem, rest),
            "Lemma" => opener(TermKind::Lemma, rest),
            "Remark" => opener(TermKind::Remark, rest),
            "Fact" => opener(TermKind::Fact, rest),
            "Corollary" => opener(TermKind::Corollary, rest),
            "Proposition" => opener(TermKind::Proposition, rest),
            "Property" => opener(TermKind::Property, rest),
            "Example" => opener(TermKind::Definition, rest),
            "Goal" => StepKind::Opener {
                kind: TermKind::Other,
                name: None,
                local: false,
            },
            "Definition" => definition(TermKind::Definition, rest, false),
            "Let" => definition(TermKind::Definition, rest, true),
            "Instance" => instance(rest),
            "Fixpoint" => definer(TermKind::Fixpoint, name_of(rest), false),
            "CoFixpoint" => definer(TermKind::Cofixpoint, name_of(rest), false),
            "Inductive" => definer(TermKind::Inductive, name_of(rest), false),
            "CoInductive" => definer(TermKind::Coinductive, name_of(rest), false),
            "Record" | "Structure" => definer(TermKind::Record, name_of(rest), false),
            "Class" => definer(TermKind::Class, name_of(rest), false),
            "Variant" => definer(TermKind::Variant, name_of(rest), false),
            "Scheme" => definer(TermKind::Scheme, name_of(rest), false),
            "Ltac" => definer(TermKind::Tactic, name_of(rest), false),
            "Notation" => notation(rest),
            "Infix" => definer(TermKind::Notation, None, false),
            "Tactic" => match next_word(rest) {
                Some(("Notation", _)) => definer(TermKind::Tactic, None, false),
                _ => StepKind::Plain,
            },
            "Axiom" | "Axioms" | "Parameter" | "Parameters" | "Conjecture" => {
                definer(TermKind::Definition, name_of(rest), false)
            }
            "Variable" | "Variables" | "Hypothesis" | "Hypotheses" | "Context" => {
                definer(TermKind::Definition, name_of(rest), true)
            }
            "Program" => program(rest),
            "Obligation" => obligation(rest, false),
            "Next" => match next_word(rest) {
                Some(("Obligation", tail)) => obligation(tail, true),
                _ => StepKind::Plain,
            },
            "Qed" => StepKind::Terminator(Terminator::Qed),
            "Defined" => StepKind::Terminator(Terminator::Defined),
            "Admitted" => StepKind::Terminator(Terminator::Admitted),
            "Abort" => StepKind::Terminator(Terminator::Abort),
            "Module" => module(rest),
            "Section" => StepKind::SectionStart {
                name: name_of(rest).unwrap_or_default(),
            },
            "End" => StepKind::ScopeEnd {
                name: name_of(rest).unwrap_or_default(),
            },
            "Require" => imports(rest, false),
            "Import" | "Export" => imports(rest, true),
            _ => StepKind::Plain,
        }
    }

    /// Whether this step begins a provable unit.
    pub fn is_opener(&self) -> bool {
        matches!(self, StepKind::Opener { .. } | StepKind::Obligation { .. })
    }
}

fn opener(kind: TermKind, rest: &str) -> StepKind {
    StepKind::Opener {
        kind,
        name: name_of(rest),
        local: false,
    }
}

fn definer(kind: TermKind, name: Option<String>, local: bool) -> StepKind {
    StepKind::Definer { kind, name, local }
}

/// `Definition`-family sentences open a proof exactly when no body is
/// supplied inline.
fn definition(kind: TermKind, rest: &str, local: bool) -> StepKind {
    if has_assign(rest) {
        definer(kind, name_of(rest), local)
    } else {
        StepKind::Opener {
            kind,
            name: name_of(rest),
            local,
        }
    }
}

/// An instance with a record body may leave holes for the prover, so it
/// opens a unit just like an instance with no body at all.
fn instance(rest: &str) -> StepKind {
    match assign_rest(rest) {
        Some(body) if !body.trim_start().starts_with('{') => {
            definer(TermKind::Instance, name_of(rest), false)
        }
        _ => StepKind::Opener {
            kind: TermKind::Instance,
            name: name_of(rest),
            local: false,
        },
    }
}

fn notation(rest: &str) -> StepKind {
    // A quoted pattern has no identifier name; an abbreviation like
    // `Notation plus := Nat.add` does.
    if rest.trim_start().starts_with('"') {
        definer(TermKind::Notation, None, false)
    } else {
        definer(TermKind::Notation, name_of(rest), false)
    }
}

fn program(rest: &str) -> StepKind {
    let (sub, tail) = match next_word(rest) {
        Some(pair) => pair,
        None => return StepKind::Plain,
    };
    let kind = match sub {
        "Definition" => TermKind::Definition,
        "Fixpoint" => TermKind::Fixpoint,
        "CoFixpoint" => TermKind::Cofixpoint,
        "Lemma" => TermKind::Lemma,
        "Theorem" => TermKind::Theorem,
        "Instance" => TermKind::Instance,
        _ => return StepKind::Plain,
    };
    StepKind::Program {
        kind,
        name: name_of(tail),
    }
}

fn obligation(rest: &str, next_form: bool) -> StepKind {
    let mut rest = rest;
    if !next_form {
        match next_word(rest) {
            // `Obligation Tactic := ...` configures obligations rather
            // than opening one.
            Some(("Tactic", _)) => return StepKind::Plain,
            Some((word, tail)) if word.chars().all(|c| c.is_ascii_digit()) => rest = tail,
            _ => {}
        }
    }
    let of = match next_word(rest) {
        Some(("of", tail)) => next_word(tail).map(|(word, _)| word.to_string()),
        _ => None,
    };
    StepKind::Obligation { of }
}

fn module(rest: &str) -> StepKind {
    // `Module M := N.` is an alias, not a scope.
    if has_assign(rest) {
        return StepKind::Plain;
    }
    let mut rest = rest;
    if let Some((word, tail)) = next_word(rest) {
        if word == "Import" || word == "Export" {
            rest = tail;
        }
    }
    if let Some(("Type", tail)) = next_word(rest) {
        return StepKind::ModuleStart {
            name: name_of(tail).unwrap_or_default(),
            is_type: true,
        };
    }
    StepKind::ModuleStart {
        name: name_of(rest).unwrap_or_default(),
        is_type: false,
    }
}

fn imports(rest: &str, mut opens: bool) -> StepKind {
    let mut rest = rest;
    if let Some((word, tail)) = next_word(rest) {
        if word == "Import" || word == "Export" {
            opens = true;
            rest = tail;
        }
    }
    let mut modules = Vec::new();
    while let Some((name, tail)) = next_qualified(rest) {
        modules.push(name);
        rest = tail;
    }
    StepKind::Import { modules, opens }
}

fn name_of(rest: &str) -> Option<String> {
    next_word(rest).map(|(word, _)| word.to_string())
}

pub(crate) fn strip_attributes(text: &str) -> &str {
    let mut rest = text;
    while rest.starts_with("#[") {
        match rest.find(']') {
            Some(i) => rest = rest[i + 1..].trim_start(),
            None => break,
        }
    }
    rest
}

/// The next identifier or number token, skipping leading whitespace only.
pub(crate) fn next_word(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start();
    let mut end = 0;
    for (i, c) in rest.char_indices() {
        if c.is_alphanumeric() || c == '_' || (i > 0 && c == '\'') {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    if end == 0 {
        None
    } else {
        Some((&rest[..end], &rest[end..]))
    }
}

/// Like `next_word`, but glues qualified names (`Coq.Lists.List`) into one
/// token. A dot followed by anything but an identifier character ends the
/// name.
fn next_qualified(text: &str) -> Option<(String, &str)> {
    let (first, mut rest) = next_word(text)?;
    let mut name = first.to_string();
    loop {
        let Some(tail) = rest.strip_prefix('.') else {
            break;
        };
        match tail.chars().next() {
            Some(c) if c.is_alphanumeric() || c == '_' => {
                let Some((word, tail_rest)) = next_word(tail) else {
                    break;
                };
                name.push('.');
                name.push_str(word);
                rest = tail_rest;
            }
            _ => break,
        }
    }
    Some((name, rest))
}

fn has_assign(text: &str) -> bool {
    assign_rest(text).is_some()
}

/// Everything after the first `:=` that sits outside strings and comments.
fn assign_rest(text: &str) -> Option<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;
    let mut comment_depth = 0u32;
    let mut in_string = false;
    while i < chars.len() {
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|&(_, c)| c);
        if in_string {
            if c == '"' && next == Some('"') {
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
        } else if comment_depth > 0 {
            if c == '(' && next == Some('*') {
                comment_depth += 1;
                i += 2;
            } else if c == '*' && next == Some(')') {
                comment_depth -= 1;
                i += 2;
            } else if c == '"' {
                in_string = true;
                i += 1;
            } else {
                i += 1;
            }
        } else if c == '"' {
            in_string = true;
            i += 1;
        } else if c == '(' && next == Some('*') {
            comment_depth = 1;
            i += 2;
        } else if c == ':' && next == Some('=') {
            let offset = chars.get(i + 2).map_or(text.len(), |&(offset, _)| offset);
            return Some(&text[offset..]);
        } else {
            i += 1;
        }
    }
    None
}
