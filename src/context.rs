use regex::Regex;

use crate::error::{Error, Result};
use crate::syntax::step_kind::StepKind;
use crate::term::{Term, TermKind};

/// What `FileContext::resolve` found in one sentence: the declared terms
/// it references, plus the notation tokens that matched nothing local.
/// The unmatched ones are candidates for the prover's `locate` query.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub terms: Vec<Term>,
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    ModuleType,
    Section,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    name: String,
}

#[derive(Debug, Clone)]
struct Entry {
    term: Term,

    // The section nesting depth this entry is local to. `None` for
    // declarations that survive their section.
    section_depth: Option<usize>,

    in_module_type: bool,
}

/// The ordered set of terms declared at the current point of a walk over
/// the document, with the module/section scope stack that governs their
/// visibility.
///
/// Rebuilt from scratch on every committed edit; there is no ambient
/// state to patch up.
#[derive(Debug, Default)]
pub struct FileContext {
    entries: Vec<Entry>,
    scopes: Vec<Scope>,

    // Module paths whose terms `Import` made referable without
    // qualification.
    opened: Vec<String>,

    // Each `Program` command, with the context its own statement resolved
    // to. Obligations inherit that context rather than their local one.
    programs: Vec<(Term, Vec<Term>)>,
}

impl FileContext {
    pub fn new() -> FileContext {
        FileContext::default()
    }

    /// Every term declared so far, in declaration order. Duplicate names
    /// are all retained.
    pub fn terms(&self) -> Vec<&Term> {
        self.entries.iter().map(|e| &e.term).collect()
    }

    /// Section-local terms whose declaring section is still open. Empty
    /// once every section in the document has ended, since `ScopeEnd`
    /// drops them.
    pub fn local_terms(&self) -> Vec<&Term> {
        self.entries
            .iter()
            .filter(|e| e.section_depth.is_some())
            .map(|e| &e.term)
            .collect()
    }

    /// Whether the walk is currently inside a `Module Type`. Proof units
    /// declared there are specifications, not usable proofs.
    pub fn in_module_type(&self) -> bool {
        self.scopes.iter().any(|s| s.kind == ScopeKind::ModuleType)
    }

    /// The enclosing module names, outermost first. Sections contribute
    /// nothing.
    pub fn module_path(&self) -> Vec<String> {
        self.scopes
            .iter()
            .filter(|s| s.kind != ScopeKind::Section)
            .map(|s| s.name.clone())
            .collect()
    }

    fn section_depth(&self) -> usize {
        self.scopes
            .iter()
            .filter(|s| s.kind == ScopeKind::Section)
            .count()
    }

    /// The `Program` command an obligation belongs to: the named one when
    /// the obligation says `of id`, otherwise the most recent.
    pub fn program(&self, of: Option<&str>) -> Option<&(Term, Vec<Term>)> {
        match of {
            Some(name) => self
                .programs
                .iter()
                .rev()
                .find(|(term, _)| term.name().as_deref() == Some(name)),
            None => self.programs.last(),
        }
    }

    /// Finds the declaring term of a concrete-syntax notation pattern,
    /// like `"_ ++ _"` or `"exists _ .. _ , _"`, where `_` marks the
    /// holes. An empty scope matches any declaration; a named one must
    /// match the scope suffix of the declaration. Later declarations are
    /// preferred.
    pub fn get_notation(&self, pattern: &str, scope: &str) -> Result<&Term> {
        let wanted: Vec<&str> = pattern.split_whitespace().collect();
        for entry in self.entries.iter().rev() {
            if entry.term.kind != TermKind::Notation || !self.is_visible(entry) {
                continue;
            }
            if !scope.is_empty() && entry.term.notation_scope().as_deref() != Some(scope) {
                continue;
            }
            let Some(declared) = entry.term.notation_pattern() else {
                continue;
            };
            // An abbreviation's pattern is just its name.
            if entry.term.name().as_deref() == Some(declared.as_str()) {
                if wanted == [declared.as_str()] {
                    return Ok(&entry.term);
                }
                continue;
            }
            if normalize_pattern(&declared) == wanted {
                return Ok(&entry.term);
            }
        }
        Err(Error::notation_not_found(pattern, scope))
    }

    /// The terms the given sentence references, in declaration order,
    /// deduplicated. Identifiers resolve to the latest declaration of
    /// their name; notation tokens resolve to every declared notation
    /// whose pattern uses them. Primitive syntax with no declaring term
    /// resolves to nothing.
    pub fn resolve(&self, text: &str) -> Resolution {
        let tokens = tokenize(text);
        let mut hits: Vec<usize> = Vec::new();
        let mut unresolved = Vec::new();

        for token in &tokens {
            if token
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
            {
                if let Some(i) = self.resolve_name(token) {
                    hits.push(i);
                }
            } else if !is_punctuation(token) {
                let mut matched = false;
                for (i, entry) in self.entries.iter().enumerate() {
                    if entry.term.kind == TermKind::Notation
                        && self.is_visible(entry)
                        && notation_keys(&entry.term).iter().any(|k| k == token)
                    {
                        hits.push(i);
                        matched = true;
                    }
                }
                if !matched {
                    unresolved.push(format!("_ {} _", token));
                }
            }
        }

        // Word-pattern notations like `exists _ .. _ , _` key on an
        // identifier rather than an operator.
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.term.kind == TermKind::Notation
                && self.is_visible(entry)
                && notation_keys(&entry.term)
                    .iter()
                    .any(|k| k.chars().next().is_some_and(|c| c.is_alphabetic()))
                && notation_keys(&entry.term)
                    .iter()
                    .any(|k| tokens.iter().any(|t| t == k))
            {
                hits.push(i);
            }
        }

        hits.sort_unstable();
        hits.dedup();
        let mut terms = Vec::new();
        for i in hits {
            let term = self.entries[i].term.clone();
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        unresolved.sort();
        unresolved.dedup();
        Resolution { terms, unresolved }
    }

    /// Feeds one classified step through the scope stack and records
    /// whatever it declares. `refs` is the step's own resolution, taken
    /// before this call; `Program` commands keep it for their obligations.
    pub fn advance(&mut self, kind: &StepKind, text: &str, refs: &[Term]) {
        match kind {
            StepKind::ModuleStart { name, is_type } => {
                self.scopes.push(Scope {
                    kind: if *is_type {
                        ScopeKind::ModuleType
                    } else {
                        ScopeKind::Module
                    },
                    name: name.clone(),
                });
            }
            StepKind::SectionStart { name } => {
                self.scopes.push(Scope {
                    kind: ScopeKind::Section,
                    name: name.clone(),
                });
            }
            StepKind::ScopeEnd { .. } => {
                if let Some(scope) = self.scopes.pop() {
                    if scope.kind == ScopeKind::Section {
                        let closed = self.section_depth() + 1;
                        self.entries
                            .retain(|e| e.section_depth.map_or(true, |d| d < closed));
                    }
                }
            }
            StepKind::Import { modules, opens } => {
                if *opens {
                    self.opened.extend(modules.iter().cloned());
                }
            }
            StepKind::Opener { kind, name, local } => {
                // Anonymous goals declare nothing referable.
                if name.is_some() {
                    self.declare(text, *kind, *local);
                }
            }
            StepKind::Definer { kind, name: _, local } => {
                self.declare(text, *kind, *local);
                if has_where_notation(text) {
                    self.declare(text, TermKind::Notation, *local);
                }
            }
            StepKind::Program { kind, name: _ } => {
                let term = self.declare(text, *kind, false);
                self.programs.push((term, refs.to_vec()));
            }
            StepKind::Obligation { .. }
            | StepKind::Terminator(_)
            | StepKind::Plain => {}
        }
    }

    fn declare(&mut self, text: &str, kind: TermKind, local: bool) -> Term {
        let term = Term::new(text, kind, self.module_path());
        self.entries.push(Entry {
            term: term.clone(),
            section_depth: if local {
                Some(self.section_depth())
            } else {
                None
            },
            in_module_type: self.in_module_type(),
        });
        term
    }

    // Latest declaration of the name wins. A qualified reference prefers
    // an entry whose module path matches the qualifier, falling back to a
    // bare name match when nothing path-qualified is declared locally.
    fn resolve_name(&self, token: &str) -> Option<usize> {
        let (qualifier, name) = match token.rfind('.') {
            Some(dot) => (Some(&token[..dot]), &token[dot + 1..]),
            None => (None, &token[..]),
        };
        if let Some(qualifier) = qualifier {
            let path: Vec<&str> = qualifier.split('.').collect();
            for (i, entry) in self.entries.iter().enumerate().rev() {
                if entry.term.kind == TermKind::Notation
                    && entry.term.notation_pattern().as_deref() != Some(name)
                {
                    continue;
                }
                if entry.term.name().as_deref() == Some(name)
                    && entry.term.module_path.len() >= path.len()
                    && entry.term.module_path[entry.term.module_path.len() - path.len()..]
                        .iter()
                        .zip(&path)
                        .all(|(a, b)| a == b)
                {
                    return Some(i);
                }
            }
        }
        self.entries.iter().enumerate().rev().find_map(|(i, entry)| {
            if entry.term.name().as_deref() != Some(name) || !self.is_visible(entry) {
                return None;
            }
            // A notation answers to a name only as an abbreviation; the
            // notation twin of a `where` clause answers to its pattern.
            if entry.term.kind == TermKind::Notation
                && entry.term.notation_pattern().as_deref() != Some(name)
            {
                return None;
            }
            Some(i)
        })
    }

    // Unqualified visibility: top-level terms always, module terms when
    // the walk is inside that module or the module was imported.
    fn is_visible(&self, entry: &Entry) -> bool {
        if entry.term.module_path.is_empty() {
            return true;
        }
        let current = self.module_path();
        if current.len() >= entry.term.module_path.len()
            && current[..entry.term.module_path.len()] == entry.term.module_path[..]
        {
            return true;
        }
        let joined = entry.term.module_path.join(".");
        self.opened
            .iter()
            .any(|o| *o == joined || o.ends_with(&format!(".{}", joined)))
    }
}

/// Identifier tokens (qualified names glued together) and operator runs,
/// with comments and string literals blanked out first.
fn tokenize(text: &str) -> Vec<String> {
    let re = Regex::new(r"[A-Za-z_][A-Za-z0-9_']*(?:\.[A-Za-z_][A-Za-z0-9_']*)*|[^\sA-Za-z0-9_()]+")
        .unwrap();
    re.find_iter(&blank_opaque(text))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replaces comments and string literals with spaces so the tokenizer
/// never picks references out of them.
fn blank_opaque(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut comment_depth = 0u32;
    let mut in_string = false;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if in_string {
            if c == '"' && next == Some('"') {
                out.push_str("  ");
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            out.push(' ');
            i += 1;
        } else if comment_depth > 0 {
            if c == '(' && next == Some('*') {
                comment_depth += 1;
                out.push_str("  ");
                i += 2;
            } else if c == '*' && next == Some(')') {
                comment_depth -= 1;
                out.push_str("  ");
                i += 2;
            } else {
                out.push(' ');
                i += 1;
            }
        } else if c == '"' {
            in_string = true;
            out.push(' ');
            i += 1;
        } else if c == '(' && next == Some('*') {
            comment_depth = 1;
            out.push_str("  ");
            i += 2;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

const PUNCTUATION: &[&str] = &[
    ".", ",", ":", ";", ":=", "=>", "|", "%", "?", "!", "@", "..",
];

fn is_punctuation(token: &str) -> bool {
    PUNCTUATION.contains(&token)
}

/// The hole-marked form of a declared pattern: quoted tokens are
/// literals, bare identifiers are binders and become `_`.
fn normalize_pattern(pattern: &str) -> Vec<&str> {
    pattern
        .split_whitespace()
        .map(|token| {
            if let Some(stripped) = token
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
            {
                stripped
            } else if token == ".." {
                ".."
            } else if token
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '\'')
            {
                "_"
            } else {
                token
            }
        })
        .collect()
}

/// The tokens that make a notation recognizable in running text: every
/// literal of its pattern that is not a hole or plain punctuation.
fn notation_keys(term: &Term) -> Vec<String> {
    let Some(pattern) = term.notation_pattern() else {
        return Vec::new();
    };
    // Abbreviations key on their name.
    if term.name().as_deref() == Some(pattern.as_str()) {
        return vec![pattern];
    }
    normalize_pattern(&pattern)
        .into_iter()
        .filter(|t| *t != "_" && !is_punctuation(t) && *t != "(" && *t != ")")
        .map(|t| t.to_string())
        .collect()
}

fn has_where_notation(text: &str) -> bool {
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    normalized.contains(" where \"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_normalization() {
        assert_eq!(
            normalize_pattern("'exists' x .. y , p"),
            vec!["exists", "_", "..", "_", ",", "_"]
        );
        assert_eq!(normalize_pattern("x ++ y"), vec!["_", "++", "_"]);
        assert_eq!(
            normalize_pattern("[ x ; y ; .. ; z ]"),
            vec!["[", "_", ";", "_", ";", "..", ";", "_", "]"]
        );
    }

    #[test]
    fn test_tokenize_skips_strings_and_comments() {
        assert_eq!(
            tokenize("Print Nat.add. (* plus. *)"),
            vec!["Print", "Nat.add", "."]
        );
        assert_eq!(
            tokenize("Notation \"x ++ y\" := (app x y)."),
            vec!["Notation", ":=", "app", "x", "y", "."]
        );
    }
}
