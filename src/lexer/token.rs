use logos::Logos;

/// Raw tokens produced by the logos scanner over preprocessed C++ source.
/// Comments and stray preprocessor lines are recognized so the driver can
/// drop them; everything else is carried into the token list verbatim.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
pub enum RawToken {
    #[token("\n")]
    Newline,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/")]
    BlockComment,

    // Preprocessed input should not contain these, but tolerate them.
    #[regex(r"#[^\n]*")]
    PreprocessorLine,

    // ── Literals ─────────────────────────────────────────────
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*")]
    HexLiteral,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fFlL]?")]
    FloatLiteral,

    #[regex(r"[0-9]+[uUlL]*")]
    IntLiteral,

    #[regex(r"'(\\.|[^\\'\n])+'")]
    CharLiteral,

    #[regex(r#""(\\.|[^"\\\n])*""#)]
    StringLiteral,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    // ── Multi-char operators (longest match first) ───────────
    #[token("<<=")]
    LtLtEq,
    #[token(">>=")]
    GtGtEq,
    #[token("...")]
    Ellipsis,
    #[token("->*")]
    ArrowStar,
    #[token("::")]
    ColonColon,
    #[token("->")]
    Arrow,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    LtLt,
    #[token(">>")]
    GtGt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,

    // ── Single-char operators & delimiters ───────────────────
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token(".")]
    Dot,
}

impl RawToken {
    /// Tokens the driver drops instead of appending to the list.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            RawToken::Newline
                | RawToken::LineComment
                | RawToken::BlockComment
                | RawToken::PreprocessorLine
        )
    }
}
