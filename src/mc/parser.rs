//! Textual expression parser.
//!
//! Accepts the syntax produced by the `Display` impl of
//! [`Expr`](super::expr::Expr): decimal and
//! `0x` hexadecimal literals, symbol names, the C unary and binary operators
//! with C precedence (`>>` is arithmetic, `>>>` logical), parentheses and
//! target operators written as `name(arg, ...)`.

use super::context::McContext;
use super::expr::{BinaryOp, ExprRef, Symbol, TargetKind, UnaryOp};
use crate::core::error::{ParseError, ParseResult};

impl<'arena> McContext<'arena> {
    /// Parse `text` into an expression owned by this context. Symbols are
    /// created on first mention.
    pub fn parse_expr(&self, text: &str) -> ParseResult<ExprRef<'arena>> {
        let mut parser = Parser::new(self, text);
        let expr = parser.parse_expr()?;
        parser.expect_eof()?;
        Ok(expr)
    }

    /// Parse a `name = expr` definition and bind `name` to the expression.
    pub fn parse_definition(&self, text: &str) -> ParseResult<&'arena Symbol<'arena>> {
        let mut parser = Parser::new(self, text);
        let name = parser.read_identifier()?;
        parser.skip_whitespace();
        let rest = &parser.text[parser.pos..];
        if !rest.starts_with('=') || rest.starts_with("==") {
            return Err(parser.error("Expected '=' after symbol name"));
        }
        parser.pos += 1;
        let value = parser.parse_expr()?;
        parser.expect_eof()?;
        Ok(self.define(name, value))
    }
}

/// Binding strength of a binary operator; higher binds tighter.
fn precedence(op: BinaryOp) -> u8 {
    use BinaryOp::*;
    match op {
        LOr => 1,
        LAnd => 2,
        Or => 3,
        Xor => 4,
        And => 5,
        EQ | NE => 6,
        LT | LTE | GT | GTE => 7,
        Shl | AShr | LShr => 8,
        Add | Sub => 9,
        Mul | Div | Mod => 10,
    }
}

/// Parentheses, unary operators and operator calls may nest this deep.
const MAX_NESTING_DEPTH: u32 = 256;

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '.'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '$')
}

struct Parser<'ctx, 'arena, 'text> {
    ctx: &'ctx McContext<'arena>,
    text: &'text str,
    pos: usize,
    depth: u32,
}

impl<'ctx, 'arena, 'text> Parser<'ctx, 'arena, 'text> {
    fn new(ctx: &'ctx McContext<'arena>, text: &'text str) -> Self {
        Self {
            ctx,
            text,
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.pos, message)
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> ParseResult<()> {
        if !self.try_read(ch) {
            return Err(match self.current_char() {
                Some(found) => self.error(format!("Expected '{ch}' but found '{found}'")),
                None => self.error(format!("Expected '{ch}' but found end of input")),
            });
        }
        Ok(())
    }

    fn expect_eof(&mut self) -> ParseResult<()> {
        self.skip_whitespace();
        match self.current_char() {
            Some(found) => Err(self.error(format!("Unexpected '{found}' after expression"))),
            None => Ok(()),
        }
    }

    fn read_identifier(&mut self) -> ParseResult<&'text str> {
        self.skip_whitespace();
        let start = self.pos;
        match self.current_char() {
            Some(ch) if is_identifier_start(ch) => self.advance(),
            Some(ch) => return Err(self.error(format!("Expected identifier but found '{ch}'"))),
            None => return Err(self.error("Expected identifier but found end of input")),
        }
        while self.current_char().is_some_and(is_identifier_char) {
            self.advance();
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> ParseResult<i64> {
        self.skip_whitespace();
        let start = self.pos;
        let rest = &self.text[start..];

        let (digits_start, radix) = if rest.starts_with("0x") || rest.starts_with("0X") {
            (start + 2, 16)
        } else {
            (start, 10)
        };
        self.pos = digits_start;
        while self.current_char().is_some_and(|ch| ch.is_digit(radix)) {
            self.advance();
        }
        if self.pos == digits_start {
            return Err(ParseError::new(start, "Expected number"));
        }

        // Literals cover the full 64-bit pattern; values past i64::MAX wrap.
        u64::from_str_radix(&self.text[digits_start..self.pos], radix)
            .map(|value| value as i64)
            .map_err(|e| ParseError::new(start, format!("Failed to parse number: {e}")))
    }

    /// The binary operator at the current position and its length, longest
    /// match first.
    fn peek_binary_op(&self) -> Option<(BinaryOp, usize)> {
        use BinaryOp::*;
        const OPERATORS: &[(&str, BinaryOp)] = &[
            (">>>", LShr),
            ("<<", Shl),
            (">>", AShr),
            ("<=", LTE),
            (">=", GTE),
            ("==", EQ),
            ("!=", NE),
            ("&&", LAnd),
            ("||", LOr),
            ("<", LT),
            (">", GT),
            ("&", And),
            ("|", Or),
            ("^", Xor),
            ("+", Add),
            ("-", Sub),
            ("*", Mul),
            ("/", Div),
            ("%", Mod),
        ];
        let rest = &self.text[self.pos..];
        OPERATORS
            .iter()
            .find(|(spelling, _)| rest.starts_with(spelling))
            .map(|&(spelling, op)| (op, spelling.len()))
    }

    /// Run `parse` one nesting level down.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "Expression nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_expr(&mut self) -> ParseResult<ExprRef<'arena>> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> ParseResult<ExprRef<'arena>> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let Some((op, len)) = self.peek_binary_op() else {
                break;
            };
            let op_precedence = precedence(op);
            if op_precedence < min_precedence {
                break;
            }
            self.pos += len;
            let rhs = self.parse_binary(op_precedence + 1)?;
            lhs = self.ctx.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<ExprRef<'arena>> {
        self.skip_whitespace();
        let op = match self.current_char() {
            Some('-') => UnaryOp::Minus,
            Some('+') => UnaryOp::Plus,
            Some('~') => UnaryOp::Not,
            Some('!') => UnaryOp::LNot,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(self.ctx.unary(op, operand))
    }

    fn parse_primary(&mut self) -> ParseResult<ExprRef<'arena>> {
        self.skip_whitespace();
        match self.current_char() {
            Some('(') => {
                self.advance();
                let expr = self.nested(Self::parse_expr)?;
                self.expect(')')?;
                Ok(expr)
            }
            Some(ch) if ch.is_ascii_digit() => {
                let value = self.read_number()?;
                Ok(self.ctx.constant(value))
            }
            Some(ch) if is_identifier_start(ch) => {
                let start = self.pos;
                let name = self.read_identifier()?;
                if self.try_read('(') {
                    let kind = TargetKind::from_name(name)
                        .ok_or_else(|| ParseError::new(start, format!("Unknown operator '{name}'")))?;
                    self.parse_target(kind, start)
                } else {
                    Ok(self.ctx.symbol_ref(name))
                }
            }
            Some(ch) => Err(self.error(format!("Unexpected '{ch}'"))),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn parse_target(&mut self, kind: TargetKind, start: usize) -> ParseResult<ExprRef<'arena>> {
        let mut args = Vec::new();
        if !self.try_read(')') {
            loop {
                args.push(self.nested(Self::parse_expr)?);
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }

        if !kind.accepts_arg_count(args.len()) {
            let expected = match kind.arity() {
                Some(arity) => arity.to_string(),
                None => "at least 1".to_string(),
            };
            return Err(ParseError::new(
                start,
                format!("{} expects {expected} arguments, got {}", kind.name(), args.len()),
            ));
        }
        Ok(self.ctx.target(kind, &args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mc::expr::Expr;
    use bumpalo::Bump;

    fn eval(text: &str) -> Option<i64> {
        let arena = Bump::new();
        let ctx = McContext::new(&arena);
        let expr = ctx.parse_expr(text).unwrap();
        ctx.evaluate_as_absolute(expr)
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Some(7));
        assert_eq!(eval("(1 + 2) * 3"), Some(9));
        assert_eq!(eval("10 - 4 - 3"), Some(3));
        assert_eq!(eval("1 << 4 + 1"), Some(32));
        assert_eq!(eval("6 & 3 | 8"), Some(10));
        assert_eq!(eval("1 | 2 == 2"), Some(1));
        assert_eq!(eval("0 || 3 && 4"), Some(1));
        assert_eq!(eval("-8 >> 1"), Some(-4));
        assert_eq!(eval("-8 >>> 60"), Some(15));
        assert_eq!(eval("~0x0f & 0xff"), Some(0xf0));
        assert_eq!(eval("!0 + !5"), Some(1));
        assert_eq!(eval("7 % 4 >= 3"), Some(1));
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(eval("alignto(13, 8)"), Some(16));
        assert_eq!(eval("or(1, 2, 4)"), Some(7));
        assert_eq!(eval("max(3, -5, 10)"), Some(10));
        assert_eq!(eval("totalnumvgprs(0, 24)"), Some(24));
    }

    #[test]
    fn test_parse_symbols() {
        let arena = Bump::new();
        let ctx = McContext::new(&arena);
        let expr = ctx.parse_expr("kernel.num_vgpr + .Ltmp$1").unwrap();
        assert!(matches!(*expr, Expr::Binary { op: BinaryOp::Add, .. }));
        assert_eq!(ctx.evaluate_as_absolute(expr), None);

        ctx.parse_definition("kernel.num_vgpr = 30").unwrap();
        let symbol = ctx.parse_definition(".Ltmp$1 = 2").unwrap();
        assert_eq!(symbol.name(), ".Ltmp$1");
        assert_eq!(ctx.evaluate_as_absolute(expr), Some(32));
        assert!(symbol.is_used());
    }

    #[test]
    fn test_print_round_trip() {
        let arena = Bump::new();
        let ctx = McContext::new(&arena);
        for text in ["(a+1)*b", "max(a, b<<2, 7)", "~(a^b)", "x-(y>>>3)"] {
            let expr = ctx.parse_expr(text).unwrap();
            assert_eq!(expr.to_string(), text);
            assert_eq!(ctx.parse_expr(&expr.to_string()).unwrap(), expr);
        }
    }

    #[test]
    fn test_parse_errors() {
        let arena = Bump::new();
        let ctx = McContext::new(&arena);

        let err = ctx.parse_expr("alignto(1, 2, 3)").unwrap_err();
        assert_eq!(err.pos, 0);
        assert!(err.message.contains("expects 2 arguments"));

        assert!(ctx.parse_expr("or()").is_err());
        assert!(ctx.parse_expr("frob(1)").is_err());
        assert_eq!(ctx.parse_expr("1 +").unwrap_err().pos, 3);
        assert_eq!(ctx.parse_expr("(1 + 2").unwrap_err().pos, 6);
        assert_eq!(ctx.parse_expr("1 2").unwrap_err().pos, 2);
        assert!(ctx.parse_expr("0x").is_err());
        assert!(ctx.parse_expr("0x1_0000_0000_0000_0000").is_err());
        assert!(ctx.parse_definition("a == 1").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let arena = Bump::new();
        let ctx = McContext::new(&arena);

        let parens = format!("{}1{}", "(".repeat(1_000_000), ")".repeat(1_000_000));
        let err = ctx.parse_expr(&parens).unwrap_err();
        assert_eq!(err.pos, MAX_NESTING_DEPTH as usize + 1);
        assert!(err.message.contains("nested deeper"));

        let negations = format!("{}1", "-".repeat(1_000_000));
        assert!(ctx.parse_expr(&negations).is_err());
        let calls = format!("{}1{}", "max(".repeat(1_000), ")".repeat(1_000));
        assert!(ctx.parse_expr(&calls).is_err());

        let shallow = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert!(ctx.parse_expr(&shallow).is_ok());
        let shallow = format!("{}2", "-".repeat(100));
        assert_eq!(eval(&shallow), Some(2));
    }
}
