//! Runtime token-pattern engine.
//!
//! Patterns are space-separated words compared against a run of tokens.
//! Word forms: a literal lexeme, an alternation `a|b|c` (a trailing `|`
//! makes the whole word optional), a character class `[abc]` matching one
//! of the listed single-character tokens, a negation `!!x` matching any
//! token except `x`, and the meta-tokens `%var%`, `%type%`, `%num%`,
//! `%char%`, `%any%`, `%op%`, `%cop%`, `%oror%`, `%or%`.
//!
//! Static patterns are compiled once per distinct string and memoized in a
//! thread-local table; dynamically built patterns go through
//! [`Pattern::compile`] or the literal-only [`TokenList::simple_match_str`].

use super::{TokenId, TokenList};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokSpec {
    Lit(String),
    Var,
    Type,
    Num,
    CharLit,
    Any,
    Op,
    Cop,
    OrOr,
}

#[derive(Debug, Clone)]
enum MatchOp {
    One(TokSpec),
    Alt { specs: Vec<TokSpec>, optional: bool },
    CharClass(Vec<char>),
    Not(String),
}

/// A compiled pattern, ready to run against any position in a list.
#[derive(Debug, Clone)]
pub struct Pattern {
    ops: Vec<MatchOp>,
}

fn parse_spec(word: &str) -> TokSpec {
    match word {
        "%var%" => TokSpec::Var,
        "%type%" => TokSpec::Type,
        "%num%" => TokSpec::Num,
        "%char%" => TokSpec::CharLit,
        "%any%" => TokSpec::Any,
        "%op%" => TokSpec::Op,
        "%cop%" => TokSpec::Cop,
        "%oror%" => TokSpec::OrOr,
        "%or%" => TokSpec::Lit("|".to_string()),
        _ => TokSpec::Lit(word.to_string()),
    }
}

fn compile_word(word: &str) -> MatchOp {
    if let Some(rest) = word.strip_prefix("!!") {
        return MatchOp::Not(rest.to_string());
    }
    if word.len() > 2 && word.starts_with('[') && word.ends_with(']') {
        return MatchOp::CharClass(word[1..word.len() - 1].chars().collect());
    }
    // "|", "||" and "|=" are lexemes, not alternation separators
    if word.len() > 1 && word.contains('|') && !matches!(word, "||" | "|=") {
        let optional = word.ends_with('|');
        let specs = word
            .split('|')
            .filter(|seg| !seg.is_empty())
            .map(parse_spec)
            .collect();
        return MatchOp::Alt { specs, optional };
    }
    MatchOp::One(parse_spec(word))
}

impl Pattern {
    pub fn compile(pattern: &str) -> Self {
        Self {
            ops: pattern.split_whitespace().map(compile_word).collect(),
        }
    }
}

fn with_compiled<R>(pattern: &'static str, f: impl FnOnce(&Pattern) -> R) -> R {
    thread_local! {
        static CACHE: RefCell<FxHashMap<&'static str, Rc<Pattern>>> =
            RefCell::new(FxHashMap::default());
    }
    let compiled = CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(pattern)
            .or_insert_with(|| Rc::new(Pattern::compile(pattern)))
            .clone()
    });
    f(&compiled)
}

impl TokenList {
    fn spec_matches(&self, tok: TokenId, spec: &TokSpec) -> bool {
        match spec {
            TokSpec::Lit(text) => self.text(tok) == text,
            TokSpec::Var => self.is_name(tok),
            TokSpec::Type => self.is_name(tok) && self.text(tok) != "delete",
            TokSpec::Num => self.is_number(tok),
            TokSpec::CharLit => self.is_char_lit(tok),
            TokSpec::Any => true,
            TokSpec::Op => self.is_op(tok),
            TokSpec::Cop => self.is_comparison_op(tok),
            TokSpec::OrOr => self.text(tok) == "||",
        }
    }

    /// Run a compiled pattern starting at `tok`. A `None` start only
    /// matches the empty pattern (or leading negations, vacuously).
    pub fn matches_compiled(&self, tok: Option<TokenId>, pattern: &Pattern) -> bool {
        let mut cur = tok;
        for op in &pattern.ops {
            match op {
                MatchOp::Not(text) => {
                    if let Some(t) = cur {
                        if self.text(t) == text {
                            return false;
                        }
                        cur = self.next(t);
                    }
                }
                MatchOp::CharClass(chars) => {
                    let Some(t) = cur else { return false };
                    let text = self.text(t);
                    let mut it = text.chars();
                    match (it.next(), it.next()) {
                        (Some(c), None) if chars.contains(&c) => {}
                        _ => return false,
                    }
                    cur = self.next(t);
                }
                MatchOp::One(spec) => {
                    let Some(t) = cur else { return false };
                    if !self.spec_matches(t, spec) {
                        return false;
                    }
                    cur = self.next(t);
                }
                MatchOp::Alt { specs, optional } => match cur {
                    None => {
                        if !optional {
                            return false;
                        }
                    }
                    Some(t) => {
                        if specs.iter().any(|s| self.spec_matches(t, s)) {
                            cur = self.next(t);
                        } else if !optional {
                            return false;
                        }
                    }
                },
            }
        }
        true
    }

    /// Match a static pattern at `tok`, compiling it at most once.
    pub fn matches(&self, tok: Option<TokenId>, pattern: &'static str) -> bool {
        with_compiled(pattern, |p| self.matches_compiled(tok, p))
    }

    /// Literal-only comparison of consecutive lexemes.
    pub fn simple_match_str(&self, tok: Option<TokenId>, pattern: &str) -> bool {
        let mut cur = tok;
        for word in pattern.split_whitespace() {
            match cur {
                Some(t) if self.text(t) == word => cur = self.next(t),
                _ => return false,
            }
        }
        true
    }

    pub fn simple_match(&self, tok: Option<TokenId>, pattern: &'static str) -> bool {
        self.simple_match_str(tok, pattern)
    }

    /// First position at or after `from` where the pattern matches.
    pub fn find_pattern(&self, from: TokenId, pattern: &Pattern) -> Option<TokenId> {
        let mut cur = Some(from);
        while let Some(tok) = cur {
            if self.matches_compiled(Some(tok), pattern) {
                return Some(tok);
            }
            cur = self.next(tok);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(code: &str) -> TokenList {
        let mut list = TokenList::new();
        for word in code.split_whitespace() {
            list.push_text(word, 1, 0);
        }
        list
    }

    fn first(list: &TokenList) -> Option<TokenId> {
        list.front()
    }

    #[test]
    fn test_literals() {
        let list = list_of("template < >");
        assert!(list.matches(first(&list), "template < >"));
        assert!(list.simple_match(first(&list), "template <"));
        assert!(!list.matches(first(&list), "template < > x"));
    }

    #[test]
    fn test_meta_tokens() {
        let list = list_of("foo 42 'c' + ==");
        let foo = first(&list);
        assert!(list.matches(foo, "%var% %num% %char% %op% %cop%"));
        assert!(list.matches(foo, "%type% %any% %any% %any% %op%"));
        assert!(!list.matches(foo, "%num%"));
    }

    #[test]
    fn test_type_excludes_delete() {
        let list = list_of("delete p");
        assert!(list.matches(first(&list), "%var%"));
        assert!(!list.matches(first(&list), "%type%"));
    }

    #[test]
    fn test_alternation() {
        let list = list_of("struct Foo {");
        assert!(list.matches(first(&list), "class|struct %var% {|:"));
        let list = list_of("class Foo :");
        assert!(list.matches(first(&list), "class|struct %var% {|:"));
        let list = list_of("union Foo {");
        assert!(!list.matches(first(&list), "class|struct %var% {|:"));
    }

    #[test]
    fn test_optional_alternation() {
        let with_star = list_of("> int * f (");
        assert!(with_star.matches(first(&with_star), "> %type% *|&| %type% ("));
        let without = list_of("> int f (");
        assert!(without.matches(first(&without), "> %type% *|&| %type% ("));
    }

    #[test]
    fn test_optional_at_end_of_stream() {
        let list = list_of("x");
        assert!(list.matches(first(&list), "%var% *|&|"));
    }

    #[test]
    fn test_char_class() {
        let list = list_of(", x");
        assert!(list.matches(first(&list), "[,:] %var%"));
        let list = list_of("; x");
        assert!(!list.matches(first(&list), "[,:] %var%"));
        let list = list_of("| 0");
        assert!(list.matches(first(&list), "[+-|] 0"));
    }

    #[test]
    fn test_negation() {
        let list = list_of("Foo <");
        assert!(!list.matches(first(&list), "Foo !!<"));
        let list = list_of("Foo (");
        assert!(list.matches(first(&list), "Foo !!<"));
        // vacuous at end of stream
        let list = list_of("Foo");
        assert!(list.matches(first(&list), "Foo !!<"));
    }

    #[test]
    fn test_oror_and_or() {
        let list = list_of("|| x");
        assert!(list.matches(first(&list), "%oror% %var%"));
        let list = list_of("| x");
        assert!(list.matches(first(&list), "%or% %var%"));
        assert!(!list.matches(first(&list), "%oror% %var%"));
    }

    #[test]
    fn test_meta_inside_alternation() {
        let list = list_of(">> 1");
        assert!(list.matches(first(&list), ">>|<<|&|^|%or% %num%"));
        let list = list_of("^ 1");
        assert!(list.matches(first(&list), ">>|<<|&|^|%or% %num%"));
    }

    #[test]
    fn test_match_at_none() {
        let list = list_of("x");
        assert!(!list.matches(None, "%var%"));
    }

    #[test]
    fn test_find_pattern() {
        let list = list_of("a b f < int > (");
        let pat = Pattern::compile("f < int > (");
        let found = list.find_pattern(first(&list).unwrap(), &pat).unwrap();
        assert_eq!(list.text(found), "f");
    }
}
