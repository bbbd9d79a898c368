//! Semantic analysis: one pass over the AST with scoped symbol tables.
//!
//! The analyzer resolves every name, rejects duplicate declarations within a
//! scope, checks call arity, and applies the single static type rule of the
//! language: a float expression cannot initialize or be assigned to an `int`
//! target. Symbols are compile-time metadata only; the interpreter never
//! consults them.

use std::collections::HashMap;
use std::fmt::Write as _;

use lex::Pos;
use parse::{Block, Expr, ExprKind, Function, LValue, Param, Program, Stmt, StmtKind, Type};
use thiserror::Error;
use trace::Trace;

#[derive(Debug, Error)]
pub enum SemError {
    #[error("semantic error at {pos}: identifier '{name}' not found")]
    IdNotFound { name: String, pos: Pos },
    #[error("semantic error at {pos}: duplicate identifier '{name}'")]
    DuplicateId { name: String, pos: Pos },
    #[error("semantic error at {pos}: '{name}' expects {expected} argument(s), got {got}")]
    ArgCountMismatch {
        name: String,
        expected: usize,
        got: usize,
        pos: Pos,
    },
    #[error("semantic error at {pos}: cannot assign a float expression to int '{name}'")]
    TypeNarrowing { name: String, pos: Pos },
    #[error("semantic error at {pos}: '{name}' is not an array")]
    NotAnArray { name: String, pos: Pos },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Var {
        name: String,
        ty: Type,
        is_array: bool,
        /// Declared length; `None` for array parameters, whose length is the
        /// caller's.
        array_size: Option<usize>,
    },
    Func {
        name: String,
        ret_type: Type,
        params: Vec<Param>,
    },
}

impl Symbol {
    fn describe(&self) -> String {
        match self {
            Symbol::Var {
                ty,
                is_array,
                array_size,
                ..
            } => match (is_array, array_size) {
                (false, _) => ty.name().to_string(),
                (true, Some(n)) => format!("{}[{n}]", ty.name()),
                (true, None) => format!("{}[]", ty.name()),
            },
            Symbol::Func {
                ret_type, params, ..
            } => {
                let args: Vec<&str> = params.iter().map(|p| p.ty.name()).collect();
                format!("fn({}) -> {}", args.join(", "), ret_type.name())
            }
        }
    }
}

/// One lexical scope: a name→symbol map plus identity for trace output.
pub struct Scope {
    name: String,
    level: usize,
    symbols: HashMap<String, Symbol>,
}

impl Scope {
    fn new(name: impl Into<String>, level: usize) -> Self {
        Self {
            name: name.into(),
            level,
            symbols: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }
}

struct Analyzer<'t> {
    scopes: Vec<Scope>,
    trace: &'t mut Trace,
}

impl Analyzer<'_> {
    fn push_scope(&mut self, name: &str) {
        let level = self.scopes.len() + 1;
        self.scopes.push(Scope::new(name, level));
    }

    /// Pops the current scope, reporting it on the scope trace channel.
    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        if self.trace.scope_enabled() {
            let enclosing = self.scopes.last().map(|s| s.name.as_str()).unwrap_or("none");
            let mut record = format!("SCOPE {} (level {})\n", scope.name, scope.level);
            let mut names: Vec<&String> = scope.symbols.keys().collect();
            names.sort();
            for n in names {
                let _ = writeln!(record, "  {n}: {}", scope.symbols[n].describe());
            }
            let _ = write!(record, "  enclosing: {enclosing}");
            self.trace.scope(&record);
        }
    }

    fn insert(&mut self, symbol: Symbol, pos: Pos) -> Result<(), SemError> {
        let name = match &symbol {
            Symbol::Var { name, .. } | Symbol::Func { name, .. } => name.clone(),
        };
        // Uniqueness is per scope; shadowing an outer scope is fine.
        let scope = self.scopes.last_mut().unwrap();
        if scope.symbols.contains_key(&name) {
            return Err(SemError::DuplicateId { name, pos });
        }
        scope.symbols.insert(name, symbol);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.symbols.get(name))
    }

    fn check_program(&mut self, program: &Program) -> Result<(), SemError> {
        self.push_scope("global");
        for f in program.functions.iter().chain([&program.main]) {
            self.insert(
                Symbol::Func {
                    name: f.name.clone(),
                    ret_type: f.ret_type,
                    params: f.params.clone(),
                },
                f.pos,
            )?;
        }
        for f in &program.functions {
            self.check_function(f)?;
        }
        self.check_function(&program.main)?;
        self.pop_scope();
        Ok(())
    }

    fn check_function(&mut self, f: &Function) -> Result<(), SemError> {
        self.push_scope(&f.name);
        for p in &f.params {
            self.insert(
                Symbol::Var {
                    name: p.name.clone(),
                    ty: p.ty,
                    is_array: p.is_array,
                    array_size: None,
                },
                p.pos,
            )?;
        }
        let result = self.check_block(&f.body);
        self.pop_scope();
        result
    }

    fn check_block(&mut self, block: &Block) -> Result<(), SemError> {
        for stmt in &block.stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), SemError> {
        match &stmt.kind {
            StmtKind::VarDecl { ty, name, init } => {
                self.insert(
                    Symbol::Var {
                        name: name.clone(),
                        ty: *ty,
                        is_array: false,
                        array_size: None,
                    },
                    stmt.pos,
                )?;
                if let Some(init) = init {
                    self.check_expr(init)?;
                    if *ty == Type::Int && self.expr_type(init) == Type::Float {
                        return Err(SemError::TypeNarrowing {
                            name: name.clone(),
                            pos: stmt.pos,
                        });
                    }
                }
                Ok(())
            }
            StmtKind::ArrayDecl { ty, name, size } => self.insert(
                Symbol::Var {
                    name: name.clone(),
                    ty: *ty,
                    is_array: true,
                    array_size: Some(*size),
                },
                stmt.pos,
            ),
            StmtKind::Assign { target, value } => {
                self.check_expr(value)?;
                let name = target.name().to_string();
                let Some(symbol) = self.lookup(&name) else {
                    return Err(SemError::IdNotFound {
                        name,
                        pos: stmt.pos,
                    });
                };
                let target_ty = match symbol {
                    Symbol::Var { ty, is_array, .. } => {
                        if matches!(target, LValue::Index { .. }) && !*is_array {
                            return Err(SemError::NotAnArray {
                                name,
                                pos: stmt.pos,
                            });
                        }
                        *ty
                    }
                    Symbol::Func { .. } => {
                        return Err(SemError::IdNotFound {
                            name,
                            pos: stmt.pos,
                        });
                    }
                };
                if let LValue::Index { index, .. } = target {
                    self.check_expr(index)?;
                }
                if target_ty == Type::Int && self.expr_type(value) == Type::Float {
                    return Err(SemError::TypeNarrowing {
                        name,
                        pos: stmt.pos,
                    });
                }
                Ok(())
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_expr(cond)?;
                self.check_block(then_block)?;
                if let Some(else_block) = else_block {
                    self.check_block(else_block)?;
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond)?;
                self.check_block(body)
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.check_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.check_expr(cond)?;
                }
                for p in post {
                    self.check_stmt(p)?;
                }
                self.check_block(body)
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.check_expr(value)?;
                }
                Ok(())
            }
            StmtKind::Call { name, args } => self.check_call(name, args, stmt.pos),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<(), SemError> {
        match &expr.kind {
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::StringLit(_) => Ok(()),
            ExprKind::Var(name) => match self.lookup(name) {
                Some(_) => Ok(()),
                None => Err(SemError::IdNotFound {
                    name: name.clone(),
                    pos: expr.pos,
                }),
            },
            ExprKind::Index { name, index } => {
                match self.lookup(name) {
                    Some(Symbol::Var { is_array: true, .. }) => {}
                    Some(_) => {
                        return Err(SemError::NotAnArray {
                            name: name.clone(),
                            pos: expr.pos,
                        });
                    }
                    None => {
                        return Err(SemError::IdNotFound {
                            name: name.clone(),
                            pos: expr.pos,
                        });
                    }
                }
                self.check_expr(index)
            }
            ExprKind::Call { name, args } => self.check_call(name, args, expr.pos),
            ExprKind::Unary { expr, .. } => self.check_expr(expr),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
        }
    }

    fn check_call(&mut self, name: &str, args: &[Expr], pos: Pos) -> Result<(), SemError> {
        // `print` is the built-in output routine: any arity, no symbol.
        if name != "print" {
            match self.lookup(name) {
                Some(Symbol::Func { params, .. }) => {
                    if params.len() != args.len() {
                        return Err(SemError::ArgCountMismatch {
                            name: name.to_string(),
                            expected: params.len(),
                            got: args.len(),
                            pos,
                        });
                    }
                }
                _ => {
                    return Err(SemError::IdNotFound {
                        name: name.to_string(),
                        pos,
                    });
                }
            }
        }
        for a in args {
            self.check_expr(a)?;
        }
        Ok(())
    }

    /// Static expression type; only consumed by the narrowing check, so the
    /// interesting answer is "is this float". Unresolvable names were already
    /// rejected by `check_expr` on the same walk.
    fn expr_type(&self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::FloatLit(_) => Type::Float,
            ExprKind::CharLit(_) => Type::Char,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::Var(name) | ExprKind::Index { name, .. } => match self.lookup(name) {
                Some(Symbol::Var { ty, .. }) => *ty,
                _ => Type::Int,
            },
            ExprKind::Call { name, .. } => {
                if name == "print" {
                    return Type::Void;
                }
                match self.lookup(name) {
                    Some(Symbol::Func { ret_type, .. }) => *ret_type,
                    _ => Type::Int,
                }
            }
            ExprKind::Unary { expr, .. } => self.expr_type(expr),
            ExprKind::Binary { op, lhs, rhs } => {
                use parse::BinaryOp::*;
                match op {
                    Div => Type::Float,
                    Add | Sub | Mul => {
                        if self.expr_type(lhs) == Type::Float
                            || self.expr_type(rhs) == Type::Float
                        {
                            Type::Float
                        } else {
                            Type::Int
                        }
                    }
                    Lt | Le | Gt | Ge | Eq | Ne | And | Or => Type::Int,
                }
            }
        }
    }
}

/// Analyze a parsed program. Scope contents are reported on the `scope`
/// trace channel as each scope is left.
pub fn analyze(program: &Program, trace: &mut Trace) -> Result<(), SemError> {
    let mut analyzer = Analyzer {
        scopes: Vec::new(),
        trace,
    };
    analyzer.check_program(program)
}
