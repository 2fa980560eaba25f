pub mod token;

use crate::errors::{LexError, LexErrorKind, Span};
use crate::tokens::{TokenId, TokenList};
use logos::Logos;
use token::RawToken;

/// Tokenizer for preprocessed C++ source.
///
/// Wraps the logos raw scanner and assembles the doubly-linked
/// [`TokenList`] the simplification core operates on: comments and blank
/// lines are dropped, `(`/`[`/`{` get mutual links, and sign/width
/// qualifier runs (`unsigned long long` etc) are merged onto a single type
/// token carrying the qualifier flags.
pub struct Tokenizer<'src> {
    source: &'src str,
    file_index: u32,
}

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str, file_index: u32) -> Self {
        Self { source, file_index }
    }

    pub fn tokenize(self) -> (TokenList, Vec<LexError>) {
        let mut list = TokenList::new();
        let mut errors = Vec::new();
        let mut brackets: Vec<(TokenId, Span)> = Vec::new();
        let mut line: u32 = 1;

        let mut lexer = RawToken::lexer(self.source);
        while let Some(result) = lexer.next() {
            let span = Span::new(lexer.span().start, lexer.span().end);
            let raw = match result {
                Ok(raw) => raw,
                Err(()) => {
                    let c = lexer.slice().chars().next().unwrap_or('\0');
                    errors.push(LexError {
                        kind: LexErrorKind::InvalidCharacter(c),
                        span,
                    });
                    continue;
                }
            };
            if raw.is_trivia() {
                line += lexer.slice().matches('\n').count() as u32;
                continue;
            }

            let id = list.push_text(lexer.slice(), line, self.file_index);
            match raw {
                RawToken::LParen | RawToken::LBracket | RawToken::LBrace => {
                    brackets.push((id, span));
                }
                RawToken::RParen | RawToken::RBracket | RawToken::RBrace => {
                    let expected = match raw {
                        RawToken::RParen => "(",
                        RawToken::RBracket => "[",
                        _ => "{",
                    };
                    match brackets.pop() {
                        Some((open, _)) if list.text(open) == expected => {
                            list.create_mutual_links(open, id);
                        }
                        Some((open, open_span)) => {
                            errors.push(LexError {
                                kind: LexErrorKind::UnclosedBracket(
                                    list.text(open).to_string(),
                                ),
                                span: open_span,
                            });
                        }
                        None => {
                            errors.push(LexError {
                                kind: LexErrorKind::UnmatchedClosingBracket(
                                    list.text(id).to_string(),
                                ),
                                span,
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        for (open, span) in brackets {
            errors.push(LexError {
                kind: LexErrorKind::UnclosedBracket(list.text(open).to_string()),
                span,
            });
        }

        merge_type_qualifiers(&mut list);
        (list, errors)
    }
}

/// Convenience wrapper for the common single-file case.
pub fn tokenize(source: &str) -> (TokenList, Vec<LexError>) {
    Tokenizer::new(source, 0).tokenize()
}

/// Fold `unsigned`/`signed` onto the following standard type token and
/// merge `long long` runs, so a type reads as one token whose flags carry
/// the qualifiers. A bare qualifier becomes `int` with the flag set.
fn merge_type_qualifiers(list: &mut TokenList) {
    let mut cur = list.front();
    while let Some(tok) = cur {
        if list.matches(Some(tok), "unsigned|signed") {
            let signed = list.text(tok) == "signed";
            let target = list.next(tok);
            if let Some(next) = target {
                if list.is_standard_type(next) {
                    let flags = list.token(next);
                    let is_long = flags.is_long;
                    list.set_flags(next, !signed, signed, is_long);
                    list.delete_this(tok);
                    continue;
                }
            }
            list.set_text(tok, "int");
            list.set_flags(tok, !signed, signed, false);
        } else if list.text(tok) == "long" && list.str_at(tok, 1) == "long" {
            let flags = list.token(tok);
            let (is_unsigned, is_signed) = (flags.is_unsigned, flags.is_signed);
            list.set_flags(tok, is_unsigned, is_signed, true);
            list.delete_next(tok, 1);
            if list.str_at(tok, 1) == "int" {
                list.delete_next(tok, 1);
            }
            continue;
        }
        cur = list.next(tok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> TokenList {
        let (list, errors) = tokenize(source);
        assert!(errors.is_empty(), "lex errors: {errors:?}");
        list
    }

    #[test]
    fn test_basic_tokens() {
        let list = lex("int main ( ) { return 0 ; }");
        assert_eq!(list.to_string(), "int main ( ) { return 0 ; }");
    }

    #[test]
    fn test_multichar_operators() {
        let list = lex("a<<=b; c>>2; x::y->z; p&&q||r;");
        assert_eq!(
            list.to_string(),
            "a <<= b ; c >> 2 ; x :: y -> z ; p && q || r ;"
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let list = lex("int a; // trailing\n/* block\ncomment */ int b;");
        assert_eq!(list.to_string(), "int a ; int b ;");
        let b = list.back().unwrap();
        assert_eq!(list.token(list.at(b, -2).unwrap()).line, 3);
    }

    #[test]
    fn test_bracket_links() {
        let list = lex("f(g[0], {1});");
        let open = list.at(list.front().unwrap(), 1).unwrap();
        let close = list.link(open).unwrap();
        assert_eq!(list.text(close), ")");
    }

    #[test]
    fn test_unbalanced_brackets_reported() {
        let (_, errors) = tokenize("f(;");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].kind, LexErrorKind::UnclosedBracket(_)));
        let (_, errors) = tokenize("f);");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            LexErrorKind::UnmatchedClosingBracket(_)
        ));
    }

    #[test]
    fn test_qualifier_merge() {
        let list = lex("unsigned int a; signed char b; unsigned c;");
        assert_eq!(list.to_string(), "int a ; char b ; int c ;");
        let int_tok = list.front().unwrap();
        assert!(list.token(int_tok).is_unsigned);
        let char_tok = list.at(int_tok, 3).unwrap();
        assert!(list.token(char_tok).is_signed);
        let bare = list.at(int_tok, 6).unwrap();
        assert!(list.token(bare).is_unsigned);
    }

    #[test]
    fn test_long_long_merge() {
        let list = lex("unsigned long long int x;");
        assert_eq!(list.to_string(), "long x ;");
        let long_tok = list.front().unwrap();
        let token = list.token(long_tok);
        assert!(token.is_unsigned);
        assert!(token.is_long);
    }

    #[test]
    fn test_literals() {
        let list = lex("x = 0x1F + 'a' + \"s\" + 1.5;");
        assert_eq!(list.to_string(), "x = 0x1F + 'a' + \"s\" + 1.5 ;");
    }

    #[test]
    fn test_shift_stays_one_token() {
        let list = lex("A<B<int>> x;");
        assert_eq!(list.to_string(), "A < B < int >> x ;");
    }
}
