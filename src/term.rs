use serde::{Deserialize, Serialize};

use crate::syntax::step_kind::StepKind;

/// What kind of named object a declaration introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermKind {
    Theorem,
    Lemma,
    Definition,
    Notation,
    Inductive,
    Coinductive,
    Record,
    Class,
    Instance,
    Fixpoint,
    Cofixpoint,
    Scheme,
    Variant,
    Fact,
    Remark,
    Corollary,
    Proposition,
    Property,
    Obligation,
    Tactic,
    Other,
}

/// A named object declared by the script, as the context resolver sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    /// The declaring sentence, collapsed to a single line.
    pub text: String,

    pub kind: TermKind,

    /// Names of the modules enclosing the declaration, outermost first.
    /// Sections do not contribute segments.
    pub module_path: Vec<String>,
}

impl Term {
    pub fn new(text: &str, kind: TermKind, module_path: Vec<String>) -> Term {
        Term {
            text: normalize(text),
            kind,
            module_path,
        }
    }

    /// The declared identifier, if the declaration has one. Anonymous
    /// goals and quoted notations do not.
    pub fn name(&self) -> Option<String> {
        match StepKind::classify(&self.text) {
            StepKind::Opener { name, .. }
            | StepKind::Definer { name, .. }
            | StepKind::Program { name, .. } => name,
            _ => None,
        }
    }

    /// The concrete-syntax pattern of a notation declaration, with infix
    /// operators expanded to their two-argument form. Abbreviations
    /// (`Notation plus := Nat.add`) answer with their name.
    pub fn notation_pattern(&self) -> Option<String> {
        if self.kind != TermKind::Notation {
            return None;
        }
        match declaring_head(&self.text) {
            Some(("Notation", rest)) => match first_quoted(rest) {
                Some(pattern) => Some(pattern.to_string()),
                None => self.name(),
            },
            Some(("Infix", rest)) => {
                first_quoted(rest).map(|operator| format!("_ {} _", operator))
            }
            _ => {
                // A notation introduced by a `where` clause on a fixpoint
                // or inductive declaration.
                let where_at = self.text.find(" where \"")?;
                first_quoted(&self.text[where_at..]).map(|pattern| pattern.to_string())
            }
        }
    }

    /// The interpretation scope a notation is attached to, like
    /// `type_scope`, when the declaration names one.
    pub fn notation_scope(&self) -> Option<String> {
        if self.kind != TermKind::Notation {
            return None;
        }
        let text = self.text.trim_end().strip_suffix('.')?.trim_end();
        let colon = text.rfind(':')?;
        let candidate = text[colon + 1..].trim();
        if !candidate.is_empty() && candidate.chars().all(|c| c.is_alphanumeric() || c == '_') {
            Some(candidate.to_string())
        } else {
            None
        }
    }
}

/// The keyword that introduces the declaration, attributes and
/// `Local`/`Global`-style modifiers skipped.
fn declaring_head(text: &str) -> Option<(&str, &str)> {
    let mut rest = crate::syntax::step_kind::strip_attributes(text.trim_start());
    loop {
        let (word, tail) = crate::syntax::step_kind::next_word(rest)?;
        if crate::syntax::step_kind::is_modifier(word) {
            rest = tail;
        } else {
            return Some((word, tail));
        }
    }
}

fn first_quoted(text: &str) -> Option<&str> {
    let start = text.find('"')?;
    let rest = &text[start + 1..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let term = Term::new(
            "Fixpoint add n m :=\n  match n with\n  | 0 => m\n  end.",
            TermKind::Fixpoint,
            vec![],
        );
        assert_eq!(term.text, "Fixpoint add n m := match n with | 0 => m end.");
        assert_eq!(term.name(), Some("add".to_string()));
    }

    #[test]
    fn test_notation_pattern_and_scope() {
        let term = Term::new(
            "Notation \"x ++ y\" := (app x y) : list_scope.",
            TermKind::Notation,
            vec![],
        );
        assert_eq!(term.notation_pattern(), Some("x ++ y".to_string()));
        assert_eq!(term.notation_scope(), Some("list_scope".to_string()));
    }

    #[test]
    fn test_infix_pattern() {
        let term = Term::new(
            "Infix \"<?\" := Nat.ltb (at level 70) : nat_scope.",
            TermKind::Notation,
            vec![],
        );
        assert_eq!(term.notation_pattern(), Some("_ <? _".to_string()));
    }

    #[test]
    fn test_abbreviation_pattern_is_name() {
        let term = Term::new(
            "Notation minus := Nat.sub (only parsing).",
            TermKind::Notation,
            vec![],
        );
        assert_eq!(term.notation_pattern(), Some("minus".to_string()));
        assert_eq!(term.notation_scope(), None);
    }

    #[test]
    fn test_where_clause_pattern() {
        let term = Term::new(
            "Fixpoint mul n m := 0 where \"n * m\" := (mul n m) : nat_scope.",
            TermKind::Notation,
            vec![],
        );
        assert_eq!(term.notation_pattern(), Some("n * m".to_string()));
        assert_eq!(term.notation_scope(), Some("nat_scope".to_string()));
    }
}
