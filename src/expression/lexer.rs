//! Lexical analysis for debugger expressions
//!
//! The scanner is a small state machine with four states:
//!
//! - **Default**: classify the next character, or emit it as a raw token
//!   when it fits no other class (the parser rejects those).
//! - **Space**: skip whitespace.
//! - **Identifier**: collect an optional base prefix (`$`, `#`, `\`)
//!   followed by `[0-9a-zA-Z._]`, then resolve the word.
//! - **Operator**: emit a single operator character, or one of the two
//!   character operators `>= <= != == || && << >>`.
//!
//! Identifiers are resolved as soon as they are scanned, in a fixed order:
//! label, CPU register or flag, cartridge state, TIA state, function name,
//! and finally a number in the context's default base. A word that is none of
//! these becomes [`Token::Invalid`], so a malformed literal never reads as 0.
//!
//! ```
//! use vcs_debug::expression::{
//!     tokenize, AccessorTable, Base, FunctionTable, ParseContext, SymbolTable, Token,
//! };
//!
//! let symbols = SymbolTable::with_vcs_equates();
//! let accessors = AccessorTable::new();
//! let functions = FunctionTable::new();
//! let ctx = ParseContext {
//!     symbols: &symbols,
//!     accessors: &accessors,
//!     functions: &functions,
//!     base: Base::Hex,
//! };
//!
//! let tokens = tokenize("*SWCHA>=#10", &ctx);
//! assert_eq!(tokens[0], Token::Op('*'));
//! assert_eq!(tokens[1], Token::Label { name: "SWCHA".into(), address: 0x280 });
//! assert_eq!(tokens[2], Token::GreaterEq);
//! assert_eq!(tokens[3], Token::Number(10));
//!
//! assert_eq!(tokenize("$g1", &ctx), vec![Token::Invalid("$g1".into())]);
//! ```

use std::fmt;

use super::{Accessor, Base, ParseContext};

/// A lexical token with its identifier already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(i32),
    Label { name: String, address: u16 },
    Register(Accessor),
    ChipState(Accessor),
    Function(String),
    /// A word that is neither a known name nor a valid number
    Invalid(String),
    /// Single-character operator, or any other stray character
    Op(char),
    LessEq,
    GreaterEq,
    NotEqual,
    Equal,
    LogAnd,
    LogOr,
    ShiftLeft,
    ShiftRight,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Label { name, .. } | Token::Function(name) | Token::Invalid(name) => {
                write!(f, "{}", name)
            }
            Token::Register(acc) | Token::ChipState(acc) => write!(f, "{}", acc.name()),
            Token::Op(c) => write!(f, "{}", c),
            Token::LessEq => write!(f, "<="),
            Token::GreaterEq => write!(f, ">="),
            Token::NotEqual => write!(f, "!="),
            Token::Equal => write!(f, "=="),
            Token::LogAnd => write!(f, "&&"),
            Token::LogOr => write!(f, "||"),
            Token::ShiftLeft => write!(f, "<<"),
            Token::ShiftRight => write!(f, ">>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    Space,
    Identifier,
    Operator,
}

fn is_base_prefix(c: char) -> bool {
    matches!(c, '$' | '#' | '\\')
}

fn is_identifier(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_'
}

fn is_operator(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '<' | '>' | '|' | '&' | '^' | '!' | '~' | '(' | ')' | '=' | '%' | '['
            | ']'
    )
}

/// Parse a literal with an optional base prefix.
///
/// Returns `None` for an empty digit string, a digit outside the radix, or a
/// value that does not fit in a positive `i32`.
pub fn parse_number(text: &str, default_base: Base) -> Option<i32> {
    let mut chars = text.chars();
    let (radix, digits) = match chars.next() {
        Some('$') => (16, chars.as_str()),
        Some('#') => (10, chars.as_str()),
        Some('\\') => (2, chars.as_str()),
        _ => (default_base.radix(), text),
    };
    if digits.is_empty() {
        return None;
    }

    let mut value: i32 = 0;
    for ch in digits.chars() {
        let digit = ch.to_digit(radix)?;
        value = value.checked_mul(radix as i32)?.checked_add(digit as i32)?;
    }
    Some(value)
}

/// Streaming expression lexer.
pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    state: State,
    ctx: ParseContext<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str, ctx: &ParseContext<'a>) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            state: State::Default,
            ctx: *ctx,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn scan_identifier(&mut self) -> Token {
        let mut word = String::new();
        if let Some(c) = self.peek().filter(|&c| is_base_prefix(c)) {
            word.push(c);
            self.pos += 1;
        }
        while let Some(c) = self.peek().filter(|&c| is_identifier(c)) {
            word.push(c);
            self.pos += 1;
        }
        self.state = State::Default;
        self.resolve(word)
    }

    fn resolve(&self, word: String) -> Token {
        if let Some(address) = self.ctx.symbols.address(&word) {
            return Token::Label {
                name: word,
                address,
            };
        }
        if let Some(acc) = self.ctx.accessors.lookup(&word) {
            return if acc.is_cpu() {
                Token::Register(acc)
            } else {
                Token::ChipState(acc)
            };
        }
        if self.ctx.functions.contains(&word) {
            return Token::Function(word);
        }
        match parse_number(&word, self.ctx.base) {
            Some(value) => Token::Number(value),
            None => Token::Invalid(word),
        }
    }

    fn scan_operator(&mut self, op: char) -> Token {
        let Some(next) = self.peek() else {
            return Token::Op(op);
        };
        if next.is_whitespace() {
            self.state = State::Space;
            return Token::Op(op);
        }
        if is_identifier(next) || is_base_prefix(next) {
            self.state = State::Identifier;
            return Token::Op(op);
        }

        self.state = State::Default;
        let pair = match (op, next) {
            ('>', '=') => Token::GreaterEq,
            ('<', '=') => Token::LessEq,
            ('!', '=') => Token::NotEqual,
            ('=', '=') => Token::Equal,
            ('|', '|') => Token::LogOr,
            ('&', '&') => Token::LogAnd,
            ('<', '<') => Token::ShiftLeft,
            ('>', '>') => Token::ShiftRight,
            _ => return Token::Op(op),
        };
        self.pos += 1;
        pair
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let c = self.peek()?;
            match self.state {
                State::Default => {
                    if c.is_whitespace() {
                        self.state = State::Space;
                    } else if is_identifier(c) || is_base_prefix(c) {
                        self.state = State::Identifier;
                    } else if is_operator(c) {
                        self.state = State::Operator;
                    } else {
                        self.pos += 1;
                        return Some(Token::Op(c));
                    }
                }
                State::Space => {
                    if c.is_whitespace() {
                        self.pos += 1;
                    } else {
                        self.state = State::Default;
                    }
                }
                State::Identifier => return Some(self.scan_identifier()),
                State::Operator => {
                    self.bump()?;
                    return Some(self.scan_operator(c));
                }
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenize a whole expression.
pub fn tokenize(source: &str, ctx: &ParseContext<'_>) -> Vec<Token> {
    Lexer::new(source, ctx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{AccessorTable, Expression, FunctionTable, SymbolTable};

    struct Tables {
        symbols: SymbolTable,
        accessors: AccessorTable,
        functions: FunctionTable,
    }

    impl Tables {
        fn new() -> Self {
            let mut functions = FunctionTable::new();
            functions
                .add("lives", "*$80", Expression::Constant(0), false)
                .unwrap();
            Self {
                symbols: SymbolTable::with_vcs_equates(),
                accessors: AccessorTable::new(),
                functions,
            }
        }

        fn lex(&self, text: &str, base: Base) -> Vec<Token> {
            let ctx = ParseContext {
                symbols: &self.symbols,
                accessors: &self.accessors,
                functions: &self.functions,
                base,
            };
            tokenize(text, &ctx)
        }
    }

    #[test]
    fn test_number_prefixes() {
        let t = Tables::new();
        assert_eq!(t.lex("$1A", Base::Decimal), vec![Token::Number(26)]);
        assert_eq!(t.lex("#26", Base::Hex), vec![Token::Number(26)]);
        assert_eq!(t.lex("\\11010", Base::Hex), vec![Token::Number(26)]);
        assert_eq!(t.lex("1A", Base::Hex), vec![Token::Number(26)]);
        assert_eq!(t.lex("26", Base::Decimal), vec![Token::Number(26)]);
    }

    #[test]
    fn test_malformed_numbers_are_invalid() {
        let t = Tables::new();
        assert_eq!(t.lex("$g1", Base::Hex), vec![Token::Invalid("$g1".into())]);
        assert_eq!(t.lex("#1f", Base::Hex), vec![Token::Invalid("#1f".into())]);
        assert_eq!(t.lex("\\102", Base::Hex), vec![Token::Invalid("\\102".into())]);
        assert_eq!(t.lex("$", Base::Hex), vec![Token::Invalid("$".into())]);
        assert_eq!(
            t.lex("$FFFFFFFF", Base::Hex),
            vec![Token::Invalid("$FFFFFFFF".into())]
        );
    }

    #[test]
    fn test_resolution_order() {
        let t = Tables::new();
        // Register beats hex digit
        assert!(matches!(t.lex("a", Base::Hex)[0], Token::Register(_)));
        assert_eq!(t.lex("$a", Base::Hex), vec![Token::Number(10)]);
        assert!(matches!(t.lex("_SCAN", Base::Hex)[0], Token::ChipState(_)));
        assert!(matches!(t.lex("_bank", Base::Hex)[0], Token::ChipState(_)));
        assert_eq!(t.lex("lives", Base::Hex), vec![Token::Function("lives".into())]);
        assert_eq!(
            t.lex("swchb", Base::Hex),
            vec![Token::Label {
                name: "swchb".into(),
                address: 0x282
            }]
        );
    }

    #[test]
    fn test_two_char_operators() {
        let t = Tables::new();
        assert_eq!(
            t.lex("(1)<=(2)", Base::Hex),
            vec![
                Token::Op('('),
                Token::Number(1),
                Token::Op(')'),
                Token::LessEq,
                Token::Op('('),
                Token::Number(2),
                Token::Op(')'),
            ]
        );
        assert_eq!(t.lex("1>>2", Base::Hex)[1], Token::ShiftRight);
        assert_eq!(t.lex("1&&2", Base::Hex)[1], Token::LogAnd);
        assert_eq!(t.lex("1 != 2", Base::Hex)[1], Token::NotEqual);
        assert_eq!(t.lex("1==2", Base::Hex)[1], Token::Equal);
    }

    #[test]
    fn test_operator_before_identifier_stays_single() {
        let t = Tables::new();
        assert_eq!(t.lex("!=1", Base::Hex), vec![Token::NotEqual, Token::Number(1)]);
        assert_eq!(t.lex("<$80", Base::Hex), vec![Token::Op('<'), Token::Number(0x80)]);
        assert_eq!(
            t.lex("((1", Base::Hex),
            vec![Token::Op('('), Token::Op('('), Token::Number(1)]
        );
    }

    #[test]
    fn test_stray_characters_pass_through() {
        let t = Tables::new();
        assert_eq!(t.lex("@$80", Base::Hex), vec![Token::Op('@'), Token::Number(0x80)]);
        assert_eq!(t.lex("1 ? 2", Base::Hex)[1], Token::Op('?'));
    }

    #[test]
    fn test_whitespace_only() {
        let t = Tables::new();
        assert!(t.lex("   ", Base::Hex).is_empty());
        assert!(t.lex("", Base::Hex).is_empty());
    }
}
