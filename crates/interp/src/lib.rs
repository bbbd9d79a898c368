//! Tree-walking interpreter for the validated AST.
//!
//! Execution state is a stack of activation records; the bottom frame holds
//! the program's function declarations and nothing else. `return` travels as
//! a [`Flow`] signal distinct from the error channel and is absorbed at the
//! call boundary.

mod stack;
mod value;

pub use stack::{ActivationRecord, CallStack};
pub use value::Value;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use lex::Pos;
use parse::{BinaryOp, Block, Expr, ExprKind, LValue, Program, Stmt, StmtKind, Type, UnaryOp};
use thiserror::Error;
use trace::Trace;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime error at {pos}: index {index} out of bounds for array '{name}' of length {len}")]
    IndexOutOfBounds {
        name: String,
        index: i64,
        len: usize,
        pos: Pos,
    },
    #[error("runtime error at {pos}: division by zero")]
    DivisionByZero { pos: Pos },
    #[error("runtime error at {pos}: {details}")]
    TypeError { details: String, pos: Pos },
    #[error("runtime error at {pos}: call to undefined function '{name}'")]
    UndefinedFunction { name: String, pos: Pos },
    #[error("runtime error at {pos}: variable '{name}' has no value in the current frame")]
    UndefinedVariable { name: String, pos: Pos },
    /// A return signal escaping every call frame would mean the interpreter
    /// lost a call boundary; `Flow` is consumed in `call_function`, so this
    /// cannot happen on healthy paths.
    #[error("runtime error at {pos}: return signal escaped every call frame")]
    StrayReturn { pos: Pos },
}

/// Statement outcome: fall through, or unwind to the enclosing call.
enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<'a> {
    stack: CallStack,
    trace: &'a mut Trace,
    out: &'a mut dyn Write,
}

/// Execute a program: push the program frame, register every function
/// declaration in it, then invoke `main` as a zero-argument call. `main`'s
/// return value is discarded.
pub fn run(
    program: &Program,
    trace: &mut Trace,
    out: &mut dyn Write,
) -> Result<(), RuntimeError> {
    let mut interp = Interpreter {
        stack: CallStack::new(),
        trace,
        out,
    };
    interp.run_program(program)
}

impl Interpreter<'_> {
    fn run_program(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let mut global = ActivationRecord::new("global", 1);
        for f in program.functions.iter().chain([&program.main]) {
            global.declare_func(Rc::new(f.clone()));
        }
        self.stack.push(global);
        self.trace_stack("ENTER PROGRAM");

        let _ = self.call_function("main", &[], program.main.pos)?;

        self.trace_stack("LEAVE PROGRAM");
        self.stack.pop();
        Ok(())
    }

    // The program frame is pushed before anything executes, so a frame is
    // always present.
    fn frame(&self) -> &ActivationRecord {
        self.stack.peek().unwrap()
    }

    fn frame_mut(&mut self) -> &mut ActivationRecord {
        self.stack.peek_mut().unwrap()
    }

    fn trace_stack(&mut self, banner: &str) {
        if self.trace.stack_enabled() {
            self.trace.stack(banner);
            let snap = self.stack.snapshot();
            self.trace.stack(&snap);
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        args: &[Expr],
        pos: Pos,
    ) -> Result<Value, RuntimeError> {
        // The built-in output routine: one line per argument.
        if name == "print" {
            for a in args {
                let v = self.eval_expr(a)?;
                writeln!(self.out, "{v}").ok();
            }
            return Ok(Value::Unit);
        }

        let func = self
            .stack
            .global()
            .and_then(|g| g.func(name))
            .ok_or_else(|| RuntimeError::UndefinedFunction {
                name: name.to_string(),
                pos,
            })?;

        // Arguments evaluate left to right in the caller's frame.
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.eval_expr(a)?);
        }

        let mut ar = ActivationRecord::new(func.name.clone(), self.frame().nesting_level() + 1);
        for (param, v) in func.params.iter().zip(values) {
            // Scalars bind by value, arrays by handle (Value::clone aliases).
            let v = if param.ty == Type::Float {
                widen_to_float(v)
            } else {
                v
            };
            ar.set(param.name.clone(), v);
        }

        self.stack.push(ar);
        self.trace_stack(&format!("ENTER FUNCTION {name}"));

        let flow = self.exec_block(&func.body)?;

        self.trace_stack(&format!("LEAVE FUNCTION {name}"));
        self.stack.pop();

        Ok(match flow {
            Flow::Return(v) => v,
            Flow::Normal => Value::Unit,
        })
    }

    fn exec_block(&mut self, block: &Block) -> Result<Flow, RuntimeError> {
        for stmt in &block.stmts {
            if let Flow::Return(v) = self.exec_stmt(stmt)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        if self.trace.debug_enabled() {
            self.trace
                .debug(&format!("visit {} at {}", stmt_node_name(&stmt.kind), stmt.pos));
        }
        match &stmt.kind {
            StmtKind::VarDecl { ty, name, init } => {
                let value = match init {
                    Some(e) => {
                        let v = self.eval_expr(e)?;
                        if *ty == Type::Float {
                            widen_to_float(v)
                        } else {
                            v
                        }
                    }
                    None => Value::default_for(*ty),
                };
                self.frame_mut().set(name.clone(), value);
                Ok(Flow::Normal)
            }
            StmtKind::ArrayDecl { ty, name, size } => {
                self.frame_mut().set(name.clone(), Value::new_array(*ty, *size));
                Ok(Flow::Normal)
            }
            StmtKind::Assign { target, value } => {
                self.exec_assign(target, value, stmt.pos)?;
                Ok(Flow::Normal)
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval_expr(cond)?.is_truthy() {
                    self.exec_block(then_block)
                } else if let Some(else_block) = else_block {
                    self.exec_block(else_block)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval_expr(cond)?.is_truthy() {
                    if let Flow::Return(v) = self.exec_block(body)? {
                        return Ok(Flow::Return(v));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.exec_stmt(init)?;
                }
                loop {
                    let go = match cond {
                        Some(c) => self.eval_expr(c)?.is_truthy(),
                        None => true,
                    };
                    if !go {
                        break;
                    }
                    if let Flow::Return(v) = self.exec_block(body)? {
                        return Ok(Flow::Return(v));
                    }
                    for p in post {
                        self.exec_stmt(p)?;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(v))
            }
            StmtKind::Call { name, args } => {
                self.call_function(name, args, stmt.pos)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_assign(
        &mut self,
        target: &LValue,
        value: &Expr,
        pos: Pos,
    ) -> Result<(), RuntimeError> {
        let v = self.eval_expr(value)?;
        match target {
            LValue::Var { name } => {
                // A float slot widens an incoming int; narrowing was
                // rejected statically.
                let v = match self.frame().get(name) {
                    Some(Value::Float(_)) => widen_to_float(v),
                    Some(_) => v,
                    None => {
                        return Err(RuntimeError::UndefinedVariable {
                            name: name.clone(),
                            pos,
                        });
                    }
                };
                self.frame_mut().set(name.clone(), v);
            }
            LValue::Index { name, index } => {
                let i = self.eval_index(index)?;
                let elems = self.array_handle(name, pos)?;
                let mut elems = elems.borrow_mut();
                let i = check_bounds(name, i, elems.len(), pos)?;
                elems[i] = if matches!(elems[i], Value::Float(_)) {
                    widen_to_float(v)
                } else {
                    v
                };
            }
        }
        Ok(())
    }

    fn eval_expr(&mut self, e: &Expr) -> Result<Value, RuntimeError> {
        if self.trace.debug_enabled() {
            self.trace
                .debug(&format!("visit {} at {}", expr_node_name(&e.kind), e.pos));
        }
        match &e.kind {
            ExprKind::IntLit(n) => Ok(Value::Int(*n)),
            ExprKind::FloatLit(x) => Ok(Value::Float(*x)),
            ExprKind::CharLit(c) => Ok(Value::Char(*c)),
            ExprKind::StringLit(s) => Ok(Value::Str(s.clone())),
            ExprKind::Var(name) => {
                self.frame()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedVariable {
                        name: name.clone(),
                        pos: e.pos,
                    })
            }
            ExprKind::Index { name, index } => {
                let elems = self.array_handle(name, e.pos)?;
                let i = self.eval_index(index)?;
                let elems = elems.borrow();
                let i = check_bounds(name, i, elems.len(), e.pos)?;
                Ok(elems[i].clone())
            }
            ExprKind::Call { name, args } => self.call_function(name, args, e.pos),
            ExprKind::Unary { op, expr } => {
                let v = self.eval_expr(expr)?;
                match op {
                    UnaryOp::Plus => Ok(v),
                    UnaryOp::Minus => match v {
                        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                        Value::Float(x) => Ok(Value::Float(-x)),
                        other => Err(RuntimeError::TypeError {
                            details: format!("cannot negate a {}", other.type_name()),
                            pos: e.pos,
                        }),
                    },
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                apply_binary(*op, l, r, e.pos)
            }
        }
    }

    fn eval_index(&mut self, index: &Expr) -> Result<i64, RuntimeError> {
        match self.eval_expr(index)? {
            Value::Int(n) => Ok(n),
            Value::Float(x) => Ok(x as i64),
            other => Err(RuntimeError::TypeError {
                details: format!("array index must be numeric, got {}", other.type_name()),
                pos: index.pos,
            }),
        }
    }

    fn array_handle(
        &self,
        name: &str,
        pos: Pos,
    ) -> Result<Rc<RefCell<Vec<Value>>>, RuntimeError> {
        match self.frame().get(name) {
            Some(Value::Array(elems)) => Ok(elems.clone()),
            Some(other) => Err(RuntimeError::TypeError {
                details: format!("'{}' is a {}, not an array", name, other.type_name()),
                pos,
            }),
            None => Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
                pos,
            }),
        }
    }
}

fn widen_to_float(v: Value) -> Value {
    match v {
        Value::Int(n) => Value::Float(n as f64),
        other => other,
    }
}

fn check_bounds(name: &str, index: i64, len: usize, pos: Pos) -> Result<usize, RuntimeError> {
    if index < 0 || index as usize >= len {
        return Err(RuntimeError::IndexOutOfBounds {
            name: name.to_string(),
            index,
            len,
            pos,
        });
    }
    Ok(index as usize)
}

fn apply_binary(op: BinaryOp, l: Value, r: Value, pos: Pos) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    match op {
        Add => {
            if let (Value::Str(a), Value::Str(b)) = (&l, &r) {
                return Ok(Value::Str(format!("{a}{b}")));
            }
            arith(op, l, r, pos)
        }
        Sub | Mul => arith(op, l, r, pos),
        Div => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(type_mismatch(op, &l, &r, pos));
            };
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero { pos });
            }
            Ok(Value::Float(a / b))
        }
        Lt | Le | Gt | Ge | Eq | Ne => compare(op, l, r, pos),
        And => Ok(Value::Int((l.is_truthy() && r.is_truthy()) as i64)),
        Or => Ok(Value::Int((l.is_truthy() || r.is_truthy()) as i64)),
    }
}

/// `+ - *` over numerics: int if both operands are int, else float.
fn arith(op: BinaryOp, l: Value, r: Value, pos: Pos) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        let v = match op {
            Add => a.wrapping_add(*b),
            Sub => a.wrapping_sub(*b),
            Mul => a.wrapping_mul(*b),
            _ => return Err(type_mismatch(op, &l, &r, pos)),
        };
        return Ok(Value::Int(v));
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(type_mismatch(op, &l, &r, pos));
    };
    let v = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        _ => return Err(type_mismatch(op, &l, &r, pos)),
    };
    Ok(Value::Float(v))
}

/// Relational and equality comparison: numerics by value, strings and chars
/// lexicographically (a char compares as its one-character string). The
/// result is integer 0 or 1.
fn compare(op: BinaryOp, l: Value, r: Value, pos: Pos) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering;
    let ord = match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
        (Value::Char(a), Value::Str(b)) => Some(a.to_string().cmp(b)),
        (Value::Str(a), Value::Char(b)) => Some(a.cmp(&b.to_string())),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let Some(ord) = ord else {
        return Err(type_mismatch(op, &l, &r, pos));
    };
    use BinaryOp::*;
    let truth = match op {
        Lt => ord == Ordering::Less,
        Le => ord != Ordering::Greater,
        Gt => ord == Ordering::Greater,
        Ge => ord != Ordering::Less,
        Eq => ord == Ordering::Equal,
        Ne => ord != Ordering::Equal,
        _ => return Err(type_mismatch(op, &l, &r, pos)),
    };
    Ok(Value::Int(truth as i64))
}

fn type_mismatch(op: BinaryOp, l: &Value, r: &Value, pos: Pos) -> RuntimeError {
    RuntimeError::TypeError {
        details: format!(
            "cannot apply '{}' to {} and {}",
            op_spelling(op),
            l.type_name(),
            r.type_name()
        ),
        pos,
    }
}

fn op_spelling(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        Eq => "==",
        Ne => "!=",
        And => "&&",
        Or => "||",
    }
}

fn stmt_node_name(kind: &StmtKind) -> &'static str {
    match kind {
        StmtKind::VarDecl { .. } => "VarDecl",
        StmtKind::ArrayDecl { .. } => "ArrayDecl",
        StmtKind::Assign { .. } => "Assign",
        StmtKind::If { .. } => "If",
        StmtKind::While { .. } => "While",
        StmtKind::For { .. } => "For",
        StmtKind::Return(_) => "Return",
        StmtKind::Call { .. } => "Call",
    }
}

fn expr_node_name(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::IntLit(_) => "IntLit",
        ExprKind::FloatLit(_) => "FloatLit",
        ExprKind::CharLit(_) => "CharLit",
        ExprKind::StringLit(_) => "StringLit",
        ExprKind::Var(_) => "VarRef",
        ExprKind::Index { .. } => "Index",
        ExprKind::Call { .. } => "Call",
        ExprKind::Unary { .. } => "UnaryOp",
        ExprKind::Binary { .. } => "BinOp",
    }
}
