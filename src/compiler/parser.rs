//! Recursive-descent parser.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons, `+ -`,
//! `* / // %`, unary minus, postfix (call, index, attribute).
//!
//! Nesting is capped at `MAX_NESTING`: every bracketed expression, block,
//! prefix operator and link of a binary chain counts one level.

use super::ast::*;
use super::lexer::{tokenize, Tok, Token};
use super::CompileError;

pub const MAX_NESTING: usize = 64;

pub fn parse(src: &str) -> Result<Module, CompileError> {
    let tokens = tokenize(src)?;
    Parser { tokens, pos: 0, depth: 0 }.module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> Tok {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, msg: impl Into<String>) -> PResult<T> {
        Err(CompileError::Syntax { line: self.line(), msg: msg.into() })
    }

    fn descend(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return self.error(format!("nesting deeper than {} levels", MAX_NESTING));
        }
        Ok(())
    }

    fn expect(&mut self, tok: Tok, what: &str) -> PResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            self.error(format!("expected {}, found {:?}", what, self.peek()))
        }
    }

    fn ident(&mut self, what: &str) -> PResult<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => self.error(format!("expected {}, found {:?}", what, other)),
        }
    }

    fn module(mut self) -> PResult<Module> {
        let mut items = Vec::new();
        while *self.peek() != Tok::Eof {
            items.push(self.item()?);
        }
        Ok(Module { items })
    }

    fn item(&mut self) -> PResult<Item> {
        let line = self.line();
        match self.peek() {
            Tok::Import => {
                self.advance();
                let name = self.ident("contract name")?;
                self.expect(Tok::Semi, "';'")?;
                Ok(Item::Import { name, line })
            }
            Tok::Var => {
                self.advance();
                let name = self.ident("variable name")?;
                self.expect(Tok::Semi, "';'")?;
                Ok(Item::Var { name, line })
            }
            Tok::Hash => {
                self.advance();
                let name = self.ident("hash name")?;
                let default = if self.eat(&Tok::Assign) { Some(self.expr()?) } else { None };
                self.expect(Tok::Semi, "';'")?;
                Ok(Item::Hash { name, default, line })
            }
            Tok::Foreign => {
                self.advance();
                let kind = match self.advance() {
                    Tok::Var => ForeignKind::Var,
                    Tok::Hash => ForeignKind::Hash,
                    other => return self.error(format!("expected 'var' or 'hash' after 'foreign', found {:?}", other)),
                };
                let name = self.ident("binding name")?;
                self.expect(Tok::Assign, "'='")?;
                let contract = self.ident("contract name")?;
                self.expect(Tok::Dot, "'.'")?;
                let variable = self.ident("variable name")?;
                self.expect(Tok::Semi, "';'")?;
                Ok(Item::Foreign { kind, name, contract, variable, line })
            }
            Tok::Export | Tok::Construct | Tok::Fn => {
                let kind = match self.advance() {
                    Tok::Export => FnKind::Export,
                    Tok::Construct => FnKind::Construct,
                    _ => FnKind::Private,
                };
                if kind != FnKind::Private {
                    self.expect(Tok::Fn, "'fn'")?;
                }
                self.function(kind, line)
            }
            other => self.error(format!("expected a declaration, found {:?}", other)),
        }
    }

    fn function(&mut self, kind: FnKind, line: usize) -> PResult<Item> {
        let name = self.ident("function name")?;
        self.expect(Tok::LParen, "'('")?;
        let mut params = Vec::new();
        while *self.peek() != Tok::RParen {
            let pname = self.ident("parameter name")?;
            let default = if self.eat(&Tok::Assign) { Some(self.expr()?) } else { None };
            params.push(Param { name: pname, default });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "')'")?;
        let body = self.block()?;
        Ok(Item::Function(FnDecl { name, kind, params, body, line }))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mark = self.depth;
        self.descend()?;
        self.expect(Tok::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while *self.peek() != Tok::RBrace {
            if *self.peek() == Tok::Eof {
                return self.error("unexpected end of input inside block");
            }
            stmts.push(self.stmt()?);
        }
        self.expect(Tok::RBrace, "'}'")?;
        self.depth = mark;
        Ok(stmts)
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Let => {
                self.advance();
                let name = self.ident("local name")?;
                self.expect(Tok::Assign, "'='")?;
                let value = self.expr()?;
                self.expect(Tok::Semi, "';'")?;
                StmtKind::Let { name, value }
            }
            Tok::If => {
                self.advance();
                return self.if_stmt(line);
            }
            Tok::While => {
                self.advance();
                let cond = self.expr()?;
                let body = self.block()?;
                StmtKind::While { cond, body }
            }
            Tok::Return => {
                self.advance();
                let value = if *self.peek() == Tok::Semi { None } else { Some(self.expr()?) };
                self.expect(Tok::Semi, "';'")?;
                StmtKind::Return(value)
            }
            Tok::Assert => {
                self.advance();
                let cond = self.expr()?;
                let msg = if self.eat(&Tok::Comma) { Some(self.expr()?) } else { None };
                self.expect(Tok::Semi, "';'")?;
                StmtKind::Assert { cond, msg }
            }
            _ => {
                let target = self.expr()?;
                let kind = if self.eat(&Tok::Assign) {
                    let value = self.expr()?;
                    match target {
                        Expr::Name(name) => StmtKind::Assign { name, value },
                        Expr::Index { target, keys } => match *target {
                            Expr::Name(name) => StmtKind::IndexAssign { target: name, keys, value },
                            _ => return self.error("only named collections can be assigned into"),
                        },
                        _ => return self.error("invalid assignment target"),
                    }
                } else {
                    StmtKind::Expr(target)
                };
                self.expect(Tok::Semi, "';'")?;
                kind
            }
        };
        Ok(Stmt { kind, line })
    }

    fn if_stmt(&mut self, line: usize) -> PResult<Stmt> {
        let mark = self.depth;
        self.descend()?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat(&Tok::Else) {
            if *self.peek() == Tok::If {
                let nested_line = self.line();
                self.advance();
                vec![self.if_stmt(nested_line)?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        self.depth = mark;
        Ok(Stmt { kind: StmtKind::If { cond, then, otherwise }, line })
    }

    pub fn expr(&mut self) -> PResult<Expr> {
        let mark = self.depth;
        self.descend()?;
        let e = self.or_expr()?;
        self.depth = mark;
        Ok(e)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mark = self.depth;
        let mut lhs = self.and_expr()?;
        while self.eat(&Tok::Or) {
            self.descend()?;
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mark = self.depth;
        let mut lhs = self.not_expr()?;
        while self.eat(&Tok::And) {
            self.descend()?;
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if self.eat(&Tok::Not) {
            let mark = self.depth;
            self.descend()?;
            let inner = self.not_expr()?;
            self.depth = mark;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Tok::Eq => BinOp::Eq,
            Tok::Ne => BinOp::Ne,
            Tok::Lt => BinOp::Lt,
            Tok::Le => BinOp::Le,
            Tok::Gt => BinOp::Gt,
            Tok::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mark = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => {
                    self.depth = mark;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.descend()?;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mark = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::SlashSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => {
                    self.depth = mark;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.descend()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.eat(&Tok::Minus) {
            let mark = self.depth;
            self.descend()?;
            let inner = self.unary()?;
            self.depth = mark;
            // fold negative numeric literals so they stay literals
            return Ok(match inner {
                Expr::Lit(Literal::Int(i)) => Expr::Lit(Literal::Int(-i)),
                Expr::Lit(Literal::Decimal(d)) => Expr::Lit(Literal::Decimal(format!("-{}", d))),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                match self.peek() {
                    Tok::LParen => {
                        let (args, kwargs) = self.call_args()?;
                        Expr::Call { name, args, kwargs }
                    }
                    Tok::Dot => {
                        self.advance();
                        let member = self.ident("member name")?;
                        if *self.peek() == Tok::LParen {
                            let (args, kwargs) = self.call_args()?;
                            Expr::Method { object: name, method: member, args, kwargs }
                        } else {
                            Expr::Attr { object: name, field: member }
                        }
                    }
                    _ => Expr::Name(name),
                }
            }
            _ => self.primary()?,
        };
        let mark = self.depth;
        while *self.peek() == Tok::LBracket {
            self.advance();
            self.descend()?;
            let mut keys = vec![self.expr()?];
            while self.eat(&Tok::Comma) {
                keys.push(self.expr()?);
            }
            self.expect(Tok::RBracket, "']'")?;
            expr = Expr::Index { target: Box::new(expr), keys };
        }
        self.depth = mark;
        Ok(expr)
    }

    fn call_args(&mut self) -> PResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        self.expect(Tok::LParen, "'('")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while *self.peek() != Tok::RParen {
            if let (Tok::Ident(name), Tok::Assign) = (self.peek().clone(), self.peek_at(1).clone()) {
                self.advance();
                self.advance();
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return self.error("positional argument follows keyword argument");
                }
                args.push(self.expr()?);
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "')'")?;
        Ok((args, kwargs))
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Lit(Literal::Int(i))),
            Tok::Decimal(d) => Ok(Expr::Lit(Literal::Decimal(d))),
            Tok::Str(s) => Ok(Expr::Lit(Literal::Str(s))),
            Tok::True => Ok(Expr::Lit(Literal::Bool(true))),
            Tok::False => Ok(Expr::Lit(Literal::Bool(false))),
            Tok::Null => Ok(Expr::Lit(Literal::Null)),
            Tok::LParen => {
                let e = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                while *self.peek() != Tok::RBracket {
                    items.push(self.expr()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Tok::LBrace => {
                let mut entries = Vec::new();
                while *self.peek() != Tok::RBrace {
                    let k = self.expr()?;
                    self.expect(Tok::Colon, "':'")?;
                    let v = self.expr()?;
                    entries.push((k, v));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBrace, "'}'")?;
                Ok(Expr::Map(entries))
            }
            other => {
                // step back so the reported line is the offending token's
                self.pos = self.pos.saturating_sub(1);
                self.error(format!("unexpected token {:?}", other))
            }
        }
    }
}
