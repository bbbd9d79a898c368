use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lex::{tokenize, Keyword as Kw, LexError, Pos, Punctuator as P, Token, TokenKind as K};
use thiserror::Error;

use crate::ast::*;
use crate::loader::{LoadError, SourceLoader};

pub const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("parse error at {pos}: expected {expected}, found {found}")]
    Expected {
        expected: String,
        found: String,
        pos: Pos,
    },
    #[error("parse error at {pos}: include depth exceeds {limit}")]
    IncludeDepth { limit: usize, pos: Pos },
    #[error("parse error at {pos}: cannot include \"{path}\": {source}")]
    IncludeIo {
        path: String,
        pos: Pos,
        #[source]
        source: LoadError,
    },
    #[error("parse error at {pos}: #include must precede the first declaration")]
    BadIncludePosition { pos: Pos },
    #[error("program defines no 'int main()' function")]
    MissingMain,
    #[error(transparent)]
    Lex(#[from] LexError),
}

/// Include bookkeeping shared across the parser and every nested parser it
/// spawns for included files.
struct IncludeState<'l> {
    loader: &'l dyn SourceLoader,
    seen: HashSet<PathBuf>,
    depth: usize,
}

pub struct Parser {
    toks: Vec<Token>,
    pos: usize,
    base_dir: PathBuf,
}

impl Parser {
    fn new(toks: Vec<Token>, base_dir: PathBuf) -> Self {
        Self {
            toks,
            pos: 0,
            base_dir,
        }
    }

    // The token stream always ends with Eof, which is never consumed, so
    // `peek` cannot run off the end.
    fn peek(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn here(&self) -> Pos {
        self.peek().pos
    }

    fn err_expected(&self, expected: impl Into<String>) -> ParseError {
        ParseError::Expected {
            expected: expected.into(),
            found: self.peek().kind.describe(),
            pos: self.here(),
        }
    }

    fn at_punct(&self, p: P) -> bool {
        matches!(self.peek().kind, K::Punct(q) if q == p)
    }

    fn consume_punct(&mut self, p: P) -> bool {
        if self.at_punct(p) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, p: P) -> Result<(), ParseError> {
        if self.at_punct(p) {
            self.pos += 1;
            return Ok(());
        }
        Err(self.err_expected(format!("'{}'", p.spelling())))
    }

    fn consume_keyword(&mut self, kw: Kw) -> bool {
        if matches!(self.peek().kind, K::Keyword(k) if k == kw) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_ident(&mut self) -> Result<(String, Pos), ParseError> {
        if let K::Ident(name) = &self.peek().kind {
            let name = name.clone();
            let pos = self.here();
            self.pos += 1;
            return Ok((name, pos));
        }
        Err(self.err_expected("an identifier"))
    }

    fn peek_keyword(&self) -> Option<Kw> {
        match self.peek().kind {
            K::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    /// Any type name, as allowed for function return types and parameters.
    fn peek_is_type_name(&self) -> bool {
        matches!(
            self.peek_keyword(),
            Some(Kw::Int | Kw::Float | Kw::Char | Kw::String | Kw::Void)
        )
    }

    /// A type that can declare a variable (`void` cannot).
    fn peek_is_decl_type(&self) -> bool {
        matches!(
            self.peek_keyword(),
            Some(Kw::Int | Kw::Float | Kw::Char | Kw::String)
        )
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let ty = match self.peek_keyword() {
            Some(Kw::Int) => Type::Int,
            Some(Kw::Float) => Type::Float,
            Some(Kw::Char) => Type::Char,
            Some(Kw::String) => Type::String,
            Some(Kw::Void) => Type::Void,
            _ => return Err(self.err_expected("a type name")),
        };
        self.pos += 1;
        Ok(ty)
    }

    // ---- include resolution -------------------------------------------

    /// Consume the leading run of `#include` directives, returning every
    /// function declaration collected from the included files.
    fn parse_includes(&mut self, st: &mut IncludeState<'_>) -> Result<Vec<Function>, ParseError> {
        let mut funcs = Vec::new();
        loop {
            let (path, pos) = match &self.peek().kind {
                K::Include(path) => (path.clone(), self.here()),
                _ => break,
            };
            self.pos += 1;
            // A trailing `;` after the directive is accepted and ignored.
            self.consume_punct(P::Semicolon);

            if st.depth >= MAX_INCLUDE_DEPTH {
                return Err(ParseError::IncludeDepth {
                    limit: MAX_INCLUDE_DEPTH,
                    pos,
                });
            }
            let (canonical, text) =
                st.loader
                    .read(&path, &self.base_dir)
                    .map_err(|source| ParseError::IncludeIo {
                        path: path.clone(),
                        pos,
                        source,
                    })?;
            // Re-including a file (directly or through a cycle) is a no-op.
            if !st.seen.insert(canonical.clone()) {
                continue;
            }

            let sub_dir = canonical
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.base_dir.clone());
            let mut sub = Parser::new(tokenize(&text)?, sub_dir);
            st.depth += 1;
            let nested = sub.parse_includes(st);
            st.depth -= 1;
            funcs.extend(nested?);
            funcs.extend(sub.parse_included_functions()?);
        }
        Ok(funcs)
    }

    /// Top level of an included file: function declarations only. A `main`
    /// defined there is parsed and dropped; anything after the last function
    /// declaration is ignored.
    fn parse_included_functions(&mut self) -> Result<Vec<Function>, ParseError> {
        let mut funcs = Vec::new();
        while self.peek_is_type_name() {
            let f = self.parse_function()?;
            if f.name != "main" {
                funcs.push(f);
            }
        }
        Ok(funcs)
    }

    // ---- declarations --------------------------------------------------

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        let pos = self.here();
        let ret_type = self.parse_type()?;
        let (name, _) = self.expect_ident()?;
        self.expect_punct(P::LParen)?;
        let mut params = Vec::new();
        if !self.consume_punct(P::RParen) {
            loop {
                params.push(self.parse_param()?);
                if self.consume_punct(P::Comma) {
                    continue;
                }
                self.expect_punct(P::RParen)?;
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Function {
            ret_type,
            name,
            params,
            body,
            pos,
        })
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let ty = self.parse_type()?;
        let (name, pos) = self.expect_ident()?;
        let is_array = if self.consume_punct(P::LBracket) {
            self.expect_punct(P::RBracket)?;
            true
        } else {
            false
        };
        Ok(Param {
            ty,
            name,
            is_array,
            pos,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect_punct(P::LBrace)?;
        let mut stmts = Vec::new();
        while !self.consume_punct(P::RBrace) {
            self.parse_statement_into(&mut stmts)?;
        }
        Ok(Block { stmts })
    }

    /// One grammar statement; declarations may expand to several AST
    /// statements, so the output goes into `out`.
    fn parse_statement_into(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        if self.peek_is_decl_type() {
            return self.parse_declarations_into(out);
        }
        match self.peek_keyword() {
            Some(Kw::If) => {
                out.push(self.parse_if()?);
                return Ok(());
            }
            Some(Kw::While) => {
                out.push(self.parse_while()?);
                return Ok(());
            }
            Some(Kw::For) => {
                out.push(self.parse_for()?);
                return Ok(());
            }
            Some(Kw::Return) => {
                out.push(self.parse_return()?);
                return Ok(());
            }
            _ => {}
        }
        if matches!(self.peek().kind, K::Ident(_)) {
            let stmt = if self.next_is_lparen() {
                let pos = self.here();
                let (name, args) = self.parse_call_tail()?;
                self.expect_punct(P::Semicolon)?;
                Stmt::new(StmtKind::Call { name, args }, pos)
            } else {
                let stmt = self.parse_assign_core()?;
                self.expect_punct(P::Semicolon)?;
                stmt
            };
            out.push(stmt);
            return Ok(());
        }
        Err(self.err_expected("a statement"))
    }

    fn next_is_lparen(&self) -> bool {
        matches!(
            self.toks.get(self.pos + 1).map(|t| &t.kind),
            Some(K::Punct(P::LParen))
        )
    }

    /// `type declarator (',' declarator)* ';'` where each declarator is a
    /// scalar with optional initializer or a fixed-size array.
    fn parse_declarations_into(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        let ty = self.parse_type()?;
        loop {
            let (name, pos) = self.expect_ident()?;
            if self.consume_punct(P::LBracket) {
                let size = match self.peek().kind {
                    K::IntConst(n) => {
                        self.pos += 1;
                        n as usize
                    }
                    _ => return Err(self.err_expected("an integer array size")),
                };
                self.expect_punct(P::RBracket)?;
                out.push(Stmt::new(StmtKind::ArrayDecl { ty, name, size }, pos));
            } else {
                let init = if self.consume_punct(P::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                out.push(Stmt::new(StmtKind::VarDecl { ty, name, init }, pos));
            }
            if self.consume_punct(P::Comma) {
                continue;
            }
            break;
        }
        self.expect_punct(P::Semicolon)?;
        Ok(())
    }

    fn parse_lvalue(&mut self) -> Result<(LValue, Pos), ParseError> {
        let (name, pos) = self.expect_ident()?;
        if self.consume_punct(P::LBracket) {
            let index = self.parse_expr()?;
            self.expect_punct(P::RBracket)?;
            return Ok((LValue::Index { name, index }, pos));
        }
        Ok((LValue::Var { name }, pos))
    }

    /// `lvalue '=' expr`, shared by assignment statements and for-loop
    /// init/post clauses (which take no trailing semicolon).
    fn parse_assign_core(&mut self) -> Result<Stmt, ParseError> {
        let (target, pos) = self.parse_lvalue()?;
        self.expect_punct(P::Assign)?;
        let value = self.parse_expr()?;
        Ok(Stmt::new(StmtKind::Assign { target, value }, pos))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        self.consume_keyword(Kw::If);
        self.expect_punct(P::LParen)?;
        let cond = self.parse_expr()?;
        self.expect_punct(P::RParen)?;
        let then_block = self.parse_block()?;
        let else_block = if self.consume_keyword(Kw::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_block,
                else_block,
            },
            pos,
        ))
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        self.consume_keyword(Kw::While);
        self.expect_punct(P::LParen)?;
        let cond = self.parse_expr()?;
        self.expect_punct(P::RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While { cond, body }, pos))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        self.consume_keyword(Kw::For);
        self.expect_punct(P::LParen)?;

        let init = if self.at_punct(P::Semicolon) {
            None
        } else if self.peek_is_decl_type() {
            // Single declarator; the variable lands in the enclosing
            // function scope, not a loop scope.
            let ty = self.parse_type()?;
            let (name, dpos) = self.expect_ident()?;
            let init = if self.consume_punct(P::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            Some(Box::new(Stmt::new(StmtKind::VarDecl { ty, name, init }, dpos)))
        } else {
            Some(Box::new(self.parse_assign_core()?))
        };
        self.expect_punct(P::Semicolon)?;

        let cond = if self.at_punct(P::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(P::Semicolon)?;

        let mut post = Vec::new();
        if !self.at_punct(P::RParen) {
            loop {
                post.push(self.parse_assign_core()?);
                if self.consume_punct(P::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect_punct(P::RParen)?;

        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                cond,
                post,
                body,
            },
            pos,
        ))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        self.consume_keyword(Kw::Return);
        let value = if self.at_punct(P::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(P::Semicolon)?;
        Ok(Stmt::new(StmtKind::Return(value), pos))
    }

    /// `ID '(' arg_list? ')'` with the identifier still unconsumed.
    fn parse_call_tail(&mut self) -> Result<(String, Vec<Expr>), ParseError> {
        let (name, _) = self.expect_ident()?;
        self.expect_punct(P::LParen)?;
        let mut args = Vec::new();
        if !self.consume_punct(P::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.consume_punct(P::Comma) {
                    continue;
                }
                self.expect_punct(P::RParen)?;
                break;
            }
        }
        Ok((name, args))
    }

    // ---- expressions ---------------------------------------------------
    //
    // Precedence is the call chain, lowest first; every binary level is a
    // left-associative loop.

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_logic_or()
    }

    fn parse_logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_logic_and()?;
        while self.consume_punct(P::OrOr) {
            let rhs = self.parse_logic_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.consume_punct(P::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.consume_punct(P::Eq) {
                BinaryOp::Eq
            } else if self.consume_punct(P::Ne) {
                BinaryOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.consume_punct(P::Lt) {
                BinaryOp::Lt
            } else if self.consume_punct(P::Le) {
                BinaryOp::Le
            } else if self.consume_punct(P::Gt) {
                BinaryOp::Gt
            } else if self.consume_punct(P::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.consume_punct(P::Plus) {
                BinaryOp::Add
            } else if self.consume_punct(P::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.consume_punct(P::Star) {
                BinaryOp::Mul
            } else if self.consume_punct(P::Slash) {
                BinaryOp::Div
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        let op = if self.consume_punct(P::Plus) {
            Some(UnaryOp::Plus)
        } else if self.consume_punct(P::Minus) {
            Some(UnaryOp::Minus)
        } else {
            None
        };
        let operand = self.parse_primary()?;
        Ok(match op {
            Some(op) => Expr::new(
                ExprKind::Unary {
                    op,
                    expr: Box::new(operand),
                },
                pos,
            ),
            None => operand,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        match &self.peek().kind {
            K::IntConst(v) => {
                let v = *v;
                self.pos += 1;
                Ok(Expr::new(ExprKind::IntLit(v), pos))
            }
            K::FloatConst(v) => {
                let v = *v;
                self.pos += 1;
                Ok(Expr::new(ExprKind::FloatLit(v), pos))
            }
            K::CharConst(c) => {
                let c = *c;
                self.pos += 1;
                Ok(Expr::new(ExprKind::CharLit(c), pos))
            }
            K::StringConst(s) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Expr::new(ExprKind::StringLit(s), pos))
            }
            K::Ident(_) => {
                if self.next_is_lparen() {
                    let (name, args) = self.parse_call_tail()?;
                    return Ok(Expr::new(ExprKind::Call { name, args }, pos));
                }
                let (name, _) = self.expect_ident()?;
                if self.consume_punct(P::LBracket) {
                    let index = self.parse_expr()?;
                    self.expect_punct(P::RBracket)?;
                    return Ok(Expr::new(
                        ExprKind::Index {
                            name,
                            index: Box::new(index),
                        },
                        pos,
                    ));
                }
                Ok(Expr::new(ExprKind::Var(name), pos))
            }
            K::Punct(P::LParen) => {
                self.pos += 1;
                let e = self.parse_expr()?;
                self.expect_punct(P::RParen)?;
                Ok(e)
            }
            _ => Err(self.err_expected("an expression")),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let pos = lhs.pos;
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        pos,
    )
}

/// Parse a whole program: leading includes, top-level function declarations,
/// then `main` extraction. `origin` is the canonical path of `src` itself and
/// seeds the include-dedup set so mutual includes terminate; the directory
/// part of `origin` is the base for resolving include paths.
pub fn parse_program(
    src: &str,
    origin: &Path,
    loader: &dyn SourceLoader,
) -> Result<Program, ParseError> {
    let base_dir = origin
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut st = IncludeState {
        loader,
        seen: HashSet::from([origin.to_path_buf()]),
        depth: 0,
    };
    let mut p = Parser::new(tokenize(src)?, base_dir);

    let mut functions = p.parse_includes(&mut st)?;
    loop {
        if matches!(p.peek().kind, K::Eof) {
            break;
        }
        if matches!(p.peek().kind, K::Include(_)) {
            return Err(ParseError::BadIncludePosition { pos: p.here() });
        }
        if !p.peek_is_type_name() {
            return Err(p.err_expected("a function declaration"));
        }
        functions.push(p.parse_function()?);
    }

    let main_at = functions
        .iter()
        .position(|f| f.name == "main" && f.ret_type == Type::Int && f.params.is_empty())
        .ok_or(ParseError::MissingMain)?;
    let main = functions.remove(main_at);
    Ok(Program { functions, main })
}
