use std::path::{Path, PathBuf};

use parse::{
    parse_program, BinaryOp, ExprKind, LValue, LoadError, ParseError, Program, SourceLoader,
    StmtKind, Type, UnaryOp,
};

struct NoIncludes;

impl SourceLoader for NoIncludes {
    fn read(&self, path: &str, _base_dir: &Path) -> Result<(PathBuf, String), LoadError> {
        Err(LoadError::NotFound {
            path: path.to_string(),
        })
    }
}

fn parse(src: &str) -> Result<Program, ParseError> {
    parse_program(src, Path::new("test.clike"), &NoIncludes)
}

fn main_stmts(src: &str) -> Vec<StmtKind> {
    parse(src)
        .unwrap()
        .main
        .body
        .stmts
        .into_iter()
        .map(|s| s.kind)
        .collect()
}

#[test]
fn multi_declarator_statement_flattens() {
    let stmts = main_stmts("int main() { int a = 1, b, c[4]; }");
    assert_eq!(stmts.len(), 3);
    assert!(matches!(
        &stmts[0],
        StmtKind::VarDecl { ty: Type::Int, name, init: Some(_) } if name == "a"
    ));
    assert!(matches!(
        &stmts[1],
        StmtKind::VarDecl { ty: Type::Int, name, init: None } if name == "b"
    ));
    assert!(matches!(
        &stmts[2],
        StmtKind::ArrayDecl { ty: Type::Int, name, size: 4 } if name == "c"
    ));
}

#[test]
fn assignment_targets() {
    let stmts = main_stmts("int main() { int a[2]; int x; x = 1; a[0] = x; }");
    assert!(matches!(
        &stmts[2],
        StmtKind::Assign { target: LValue::Var { name }, .. } if name == "x"
    ));
    assert!(matches!(
        &stmts[3],
        StmtKind::Assign { target: LValue::Index { name, .. }, .. } if name == "a"
    ));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let stmts = main_stmts("int main() { int x = 1 + 2 * 3; }");
    let StmtKind::VarDecl { init: Some(e), .. } = &stmts[0] else {
        panic!("expected declaration");
    };
    let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = &e.kind else {
        panic!("expected addition at the top: {e:?}");
    };
    assert!(matches!(
        rhs.kind,
        ExprKind::Binary { op: BinaryOp::Mul, .. }
    ));
}

#[test]
fn binary_operators_are_left_associative() {
    let stmts = main_stmts("int main() { int x = 10 - 4 - 3; }");
    let StmtKind::VarDecl { init: Some(e), .. } = &stmts[0] else {
        panic!("expected declaration");
    };
    // (10 - 4) - 3
    let ExprKind::Binary { op: BinaryOp::Sub, lhs, rhs } = &e.kind else {
        panic!("expected subtraction at the top");
    };
    assert!(matches!(
        lhs.kind,
        ExprKind::Binary { op: BinaryOp::Sub, .. }
    ));
    assert!(matches!(rhs.kind, ExprKind::IntLit(3)));
}

#[test]
fn comparison_binds_tighter_than_logic() {
    let stmts = main_stmts("int main() { int x = 1 < 2 && 3 < 4 || 0; }");
    let StmtKind::VarDecl { init: Some(e), .. } = &stmts[0] else {
        panic!("expected declaration");
    };
    let ExprKind::Binary { op: BinaryOp::Or, lhs, .. } = &e.kind else {
        panic!("expected || at the top");
    };
    let ExprKind::Binary { op: BinaryOp::And, lhs, rhs } = &lhs.kind else {
        panic!("expected && under ||");
    };
    assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
}

#[test]
fn parenthesized_expression_overrides_precedence() {
    let stmts = main_stmts("int main() { int x = (1 + 2) * 3; }");
    let StmtKind::VarDecl { init: Some(e), .. } = &stmts[0] else {
        panic!("expected declaration");
    };
    let ExprKind::Binary { op: BinaryOp::Mul, lhs, .. } = &e.kind else {
        panic!("expected multiplication at the top");
    };
    assert!(matches!(
        lhs.kind,
        ExprKind::Binary { op: BinaryOp::Add, .. }
    ));
}

#[test]
fn unary_minus_is_a_node_not_a_literal() {
    let stmts = main_stmts("int main() { int x = -5; }");
    let StmtKind::VarDecl { init: Some(e), .. } = &stmts[0] else {
        panic!("expected declaration");
    };
    let ExprKind::Unary { op: UnaryOp::Minus, expr } = &e.kind else {
        panic!("expected unary minus");
    };
    assert!(matches!(expr.kind, ExprKind::IntLit(5)));
}

#[test]
fn calls_nest_in_expressions() {
    let stmts = main_stmts("int main() { int x = f(g(1), 2); }");
    let StmtKind::VarDecl { init: Some(e), .. } = &stmts[0] else {
        panic!("expected declaration");
    };
    let ExprKind::Call { name, args } = &e.kind else {
        panic!("expected call");
    };
    assert_eq!(name, "f");
    assert_eq!(args.len(), 2);
    assert!(matches!(&args[0].kind, ExprKind::Call { name, .. } if name == "g"));
}

#[test]
fn function_parameters_may_be_arrays() {
    let prog = parse("int sum(int xs[], int n) { return 0; } int main() {}").unwrap();
    let f = &prog.functions[0];
    assert_eq!(f.params.len(), 2);
    assert!(f.params[0].is_array);
    assert_eq!(f.params[0].name, "xs");
    assert!(!f.params[1].is_array);
}

#[test]
fn ast_positions_point_at_first_tokens() {
    let prog = parse("int main() {\n  int x = 1;\n  x = 2;\n}").unwrap();
    let stmts = &prog.main.body.stmts;
    assert_eq!((stmts[0].pos.line, stmts[0].pos.column), (2, 7)); // x of decl
    assert_eq!((stmts[1].pos.line, stmts[1].pos.column), (3, 3)); // x of assign
}
