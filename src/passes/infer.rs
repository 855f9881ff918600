//! Type determination.
//!
//! Bottom-up walk assigning every expression node its type from the operator
//! and operand types. A failed lookup poisons the node with the error type
//! and reports once; error-typed operands are silently absorbed so a broken
//! leaf produces exactly one diagnostic. No casts are inserted here — that
//! is the desugaring pass's job.

use crate::ast::{Arena, BinOp, ExprKind, NodeId, NodeKind, StmtKind, UnOp};
use crate::diag::{DiagCode, Logger};
use crate::passes::{walk, Visitor};
use crate::types::{result_type, unary_result_type, ScriptType};

pub fn run(arena: &mut Arena, logger: &mut Logger, root: NodeId) {
    log::debug!("type determination");
    walk(&mut Infer, arena, logger, root);
}

struct Infer;

impl Visitor for Infer {
    fn leave(&mut self, arena: &mut Arena, logger: &mut Logger, id: NodeId) {
        match arena.get(id).kind.clone() {
            NodeKind::Expr(e) => type_expr(arena, logger, id, e),
            NodeKind::Stmt(StmtKind::Decl) | NodeKind::GlobalVariable => {
                check_initializer(arena, logger, id);
            }
            NodeKind::Stmt(StmtKind::Return) => check_return(arena, logger, id),
            NodeKind::Stmt(StmtKind::If)
            | NodeKind::Stmt(StmtKind::While) => check_condition(arena, logger, id, 0),
            NodeKind::Stmt(StmtKind::DoWhile) => check_condition(arena, logger, id, 1),
            NodeKind::Stmt(StmtKind::For) => {
                // the condition slot may be a null node (infinite loop)
                let cond = arena.child(id, 1);
                if !matches!(arena.get(cond).kind, NodeKind::Null) {
                    check_condition(arena, logger, id, 1);
                }
            }
            NodeKind::GlobalFunction => check_all_paths_return(arena, logger, id),
            _ => {}
        }
    }
}

fn type_expr(arena: &mut Arena, logger: &mut Logger, id: NodeId, kind: ExprKind) {
    let ty = match kind {
        ExprKind::Constant => arena
            .get(id)
            .constant()
            .map(|v| v.type_of())
            .unwrap_or(ScriptType::Error),

        ExprKind::Paren => arena.get(arena.child(id, 0)).ty,

        ExprKind::LValue => lvalue_type(arena, logger, id),

        ExprKind::Binary(op) => binary_type(arena, logger, id, op),

        ExprKind::Unary(op) => {
            let operand = arena.child(id, 0);
            let oty = arena.get(operand).ty;
            if oty == ScriptType::Error {
                ScriptType::Error
            } else if matches!(
                op,
                UnOp::PreIncr | UnOp::PreDecr | UnOp::PostIncr | UnOp::PostDecr
            ) && !matches!(arena.get(operand).kind, NodeKind::Expr(ExprKind::LValue))
            {
                let loc = arena.get(id).loc;
                logger.error(
                    DiagCode::InvalidOperator,
                    loc,
                    format!("`{}` needs a variable to modify", op.token()),
                );
                ScriptType::Error
            } else {
                match unary_result_type(op, oty) {
                    Some(t) => t,
                    None => {
                        let loc = arena.get(id).loc;
                        logger.error(
                            DiagCode::InvalidOperator,
                            loc,
                            format!("`{}` cannot be applied to `{oty}`", op.token()),
                        );
                        ScriptType::Error
                    }
                }
            }
        }

        ExprKind::Typecast(target) => {
            let child_ty = arena.get(arena.child(id, 0)).ty;
            if child_ty == ScriptType::Error {
                ScriptType::Error
            } else if !child_ty.can_cast(target) {
                let loc = arena.get(id).loc;
                logger.error(
                    DiagCode::TypeMismatch,
                    loc,
                    format!("cannot cast `{child_ty}` to `{target}`"),
                );
                ScriptType::Error
            } else {
                target
            }
        }

        ExprKind::VectorLit => coordinate_type(arena, logger, id, ScriptType::Vector),
        ExprKind::RotationLit => coordinate_type(arena, logger, id, ScriptType::Rotation),

        ExprKind::ListLit => {
            let mut ty = ScriptType::List;
            for i in 0..arena.child_count(id) {
                let cty = arena.get(arena.child(id, i)).ty;
                if cty == ScriptType::Error {
                    ty = ScriptType::Error;
                    break;
                }
                if cty == ScriptType::List || cty == ScriptType::Null {
                    let loc = arena.get(arena.child(id, i)).loc;
                    logger.error(
                        DiagCode::TypeMismatch,
                        loc,
                        if cty == ScriptType::List {
                            "lists cannot contain other lists".to_string()
                        } else {
                            "list element has no value".to_string()
                        },
                    );
                    ty = ScriptType::Error;
                    break;
                }
            }
            ty
        }

        ExprKind::Call => call_type(arena, logger, id),
    };
    arena.get_mut(id).ty = ty;
}

fn lvalue_type(arena: &mut Arena, logger: &mut Logger, id: NodeId) -> ScriptType {
    let Some(sid) = arena.ident_symbol(id, 0) else {
        // already reported as undefined during resolution
        return ScriptType::Error;
    };
    let base = arena.symbol(sid).ty;
    let member = arena.child(id, 1);
    let member_name = arena.get(member).ident().map(|i| i.name.clone());
    let Some(member_name) = member_name else {
        return base;
    };
    let ok = match base {
        ScriptType::Vector => matches!(member_name.as_str(), "x" | "y" | "z"),
        ScriptType::Rotation => matches!(member_name.as_str(), "x" | "y" | "z" | "s"),
        ScriptType::Error => return ScriptType::Error,
        _ => false,
    };
    if ok {
        ScriptType::Float
    } else {
        let loc = arena.get(id).loc;
        logger.error(
            DiagCode::InvalidMember,
            loc,
            format!("`{base}` has no member `{member_name}`"),
        );
        ScriptType::Error
    }
}

fn binary_type(arena: &mut Arena, logger: &mut Logger, id: NodeId, op: BinOp) -> ScriptType {
    let lhs = arena.get(arena.child(id, 0)).ty;
    let rhs = arena.get(arena.child(id, 1)).ty;
    if lhs == ScriptType::Error || rhs == ScriptType::Error {
        return ScriptType::Error;
    }

    if op == BinOp::Assign {
        if !rhs.can_coerce(lhs) {
            let loc = arena.get(id).loc;
            logger.error(
                DiagCode::TypeMismatch,
                loc,
                format!("cannot assign `{rhs}` to `{lhs}`"),
            );
            return ScriptType::Error;
        }
        return lhs;
    }

    if op.is_compound() {
        let result = result_type(op.decoupled(), lhs, rhs);
        return match result {
            Some(t) if t.can_coerce(lhs) => lhs,
            // `int *= float` truncates in place; the VM has a dedicated
            // opcode, so the pairing stays legal without a float result
            Some(ScriptType::Float)
                if op == BinOp::MulAssign && lhs == ScriptType::Integer =>
            {
                lhs
            }
            _ => {
                let loc = arena.get(id).loc;
                logger.error(
                    DiagCode::InvalidOperator,
                    loc,
                    format!("`{}` cannot combine `{lhs}` and `{rhs}`", op.token()),
                );
                ScriptType::Error
            }
        };
    }

    match result_type(op, lhs, rhs) {
        Some(t) => t,
        None => {
            let loc = arena.get(id).loc;
            logger.error(
                DiagCode::InvalidOperator,
                loc,
                format!("`{}` cannot be applied to `{lhs}` and `{rhs}`", op.token()),
            );
            ScriptType::Error
        }
    }
}

fn call_type(arena: &mut Arena, logger: &mut Logger, id: NodeId) -> ScriptType {
    let Some(sid) = arena.ident_symbol(id, 0) else {
        return ScriptType::Error;
    };
    let (ret, params, name) = {
        let sym = arena.symbol(sid);
        (
            sym.ty,
            sym.params.clone().unwrap_or_default(),
            sym.name.clone(),
        )
    };
    let argc = arena.child_count(id) - 1;
    if argc > params.len() {
        let loc = arena.get(id).loc;
        logger.error(
            DiagCode::TooManyArguments,
            loc,
            format!("`{name}` takes {} arguments, {argc} given", params.len()),
        );
        return ScriptType::Error;
    }
    if argc < params.len() {
        let loc = arena.get(id).loc;
        logger.error(
            DiagCode::TooFewArguments,
            loc,
            format!("`{name}` takes {} arguments, {argc} given", params.len()),
        );
        return ScriptType::Error;
    }
    for (i, param) in params.iter().enumerate() {
        let arg = arena.child(id, i + 1);
        let aty = arena.get(arg).ty;
        if aty == ScriptType::Error {
            return ScriptType::Error;
        }
        if !aty.can_coerce(param.ty) {
            let loc = arena.get(arg).loc;
            logger.error(
                DiagCode::WrongTypeArgument,
                loc,
                format!(
                    "argument {} of `{name}` is `{aty}`, expected `{}` ({})",
                    i + 1,
                    param.ty,
                    param.name
                ),
            );
            return ScriptType::Error;
        }
    }
    ret
}

fn coordinate_type(
    arena: &mut Arena,
    logger: &mut Logger,
    id: NodeId,
    result: ScriptType,
) -> ScriptType {
    for i in 0..arena.child_count(id) {
        let cty = arena.get(arena.child(id, i)).ty;
        if cty == ScriptType::Error {
            return ScriptType::Error;
        }
        if !cty.can_coerce(ScriptType::Float) {
            let loc = arena.get(arena.child(id, i)).loc;
            logger.error(
                DiagCode::TypeMismatch,
                loc,
                format!("`{result}` component must be numeric, got `{cty}`"),
            );
            return ScriptType::Error;
        }
    }
    result
}

fn check_initializer(arena: &mut Arena, logger: &mut Logger, id: NodeId) {
    let init = arena.child(id, 1);
    if matches!(arena.get(init).kind, NodeKind::Null) {
        return;
    }
    let declared = arena.get(arena.child(id, 0)).ty;
    let got = arena.get(init).ty;
    if got == ScriptType::Error || declared == ScriptType::Error {
        return;
    }
    if !got.can_coerce(declared) {
        let loc = arena.get(id).loc;
        logger.error(
            DiagCode::TypeMismatch,
            loc,
            format!("cannot initialize `{declared}` with `{got}`"),
        );
    }
}

fn check_condition(arena: &mut Arena, logger: &mut Logger, id: NodeId, slot: usize) {
    let cond = arena.child(id, slot);
    let ty = arena.get(cond).ty;
    // any valued type is truth-testable; void calls are not
    if ty == ScriptType::Null && !matches!(arena.get(cond).kind, NodeKind::Null) {
        let loc = arena.get(cond).loc;
        logger.error(DiagCode::TypeMismatch, loc, "condition has no value");
    }
}

fn check_return(arena: &mut Arena, logger: &mut Logger, id: NodeId) {
    let value = arena.child(id, 0);
    let has_value = !matches!(arena.get(value).kind, NodeKind::Null);

    // find the enclosing function; a handler body has none
    let mut cursor = arena.parent(id);
    let mut ret_ty = None;
    while let Some(node) = cursor {
        match arena.get(node).kind {
            NodeKind::GlobalFunction => {
                ret_ty = Some(arena.get(arena.child(node, 0)).ty);
                break;
            }
            NodeKind::EventHandler => break,
            _ => {}
        }
        cursor = arena.parent(node);
    }

    let loc = arena.get(id).loc;
    match ret_ty {
        None => {
            if has_value {
                logger.error(
                    DiagCode::ReturnValueMismatch,
                    loc,
                    "event handlers cannot return a value",
                );
            }
        }
        Some(ScriptType::Null) => {
            if has_value {
                logger.error(
                    DiagCode::ReturnValueMismatch,
                    loc,
                    "this function does not return a value",
                );
            }
        }
        Some(want) => {
            if !has_value {
                logger.error(
                    DiagCode::ReturnValueMismatch,
                    loc,
                    format!("this function must return `{want}`"),
                );
            } else {
                let got = arena.get(value).ty;
                if got != ScriptType::Error && !got.can_coerce(want) {
                    logger.error(
                        DiagCode::ReturnValueMismatch,
                        loc,
                        format!("cannot return `{got}` from a `{want}` function"),
                    );
                }
            }
        }
    }
}

/// Every path through a typed function must reach a `return`. An `if` needs
/// both branches to return; a constant-true condition does not rescue a
/// missing else. Loops are not assumed to run.
fn returns_on_all_paths(arena: &Arena, id: NodeId) -> bool {
    match arena.get(id).kind {
        NodeKind::Stmt(StmtKind::Return) => true,
        NodeKind::Stmt(StmtKind::If) => {
            let then_ret = returns_on_all_paths(arena, arena.child(id, 1));
            let else_node = arena.child(id, 2);
            let else_ret = !matches!(arena.get(else_node).kind, NodeKind::Null)
                && returns_on_all_paths(arena, else_node);
            then_ret && else_ret
        }
        NodeKind::Stmt(StmtKind::Compound) => (0..arena.child_count(id))
            .any(|i| returns_on_all_paths(arena, arena.child(id, i))),
        _ => false,
    }
}

fn check_all_paths_return(arena: &mut Arena, logger: &mut Logger, id: NodeId) {
    let ident = arena.child(id, 0);
    let ret_ty = arena.get(ident).ty;
    if ret_ty == ScriptType::Null || ret_ty == ScriptType::Error {
        return;
    }
    let body = arena.child(id, 2);
    if !returns_on_all_paths(arena, body) {
        let loc = arena.get(ident).loc;
        let name = arena
            .get(ident)
            .ident()
            .map(|i| i.name.clone())
            .unwrap_or_default();
        logger.error(
            DiagCode::NotAllPathsReturn,
            loc,
            format!("not all paths through `{name}` return a value"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::passes::resolve;

    fn infer_src(src: &str) -> (Arena, Logger, NodeId) {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        resolve::run(&mut arena, &mut logger, root, false);
        run(&mut arena, &mut logger, root);
        (arena, logger, root)
    }

    /// Type of the initializer of the first local in the first handler body.
    fn first_local_init_ty(arena: &Arena, root: NodeId) -> ScriptType {
        let state = arena.child(root, arena.child_count(root) - 1);
        let handler = arena.child(state, 1);
        let body = arena.child(handler, 2);
        let decl = arena.child(body, 0);
        arena.get(arena.child(decl, 1)).ty
    }

    #[test]
    fn int_plus_int_is_int() {
        let (arena, logger, root) =
            infer_src("default { state_entry() { integer x = 1 + 2; } }");
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(first_local_init_ty(&arena, root), ScriptType::Integer);
    }

    #[test]
    fn int_times_float_is_float() {
        let (arena, logger, root) =
            infer_src("default { state_entry() { float x = 2 * 1.5; } }");
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(first_local_init_ty(&arena, root), ScriptType::Float);
    }

    #[test]
    fn string_key_coercion_accepted() {
        let (_, logger, _) = infer_src(
            "string s = \"x\";\ndefault { state_entry() { key k = s; } }",
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn float_to_int_initializer_rejected() {
        let (_, logger, _) =
            infer_src("default { state_entry() { integer x = 1.5; } }");
        assert!(logger.has_code(DiagCode::TypeMismatch));
    }

    #[test]
    fn bad_operator_reports_once_then_poisons() {
        let (_, logger, _) = infer_src(
            "default { state_entry() { integer x = (\"a\" - \"b\") + 1; } }",
        );
        // the `-` fails; the `+` and the initializer absorb the poison
        assert_eq!(logger.errors(), 1, "{}", logger.report());
        assert!(logger.has_code(DiagCode::InvalidOperator));
    }

    #[test]
    fn vector_member_is_float() {
        let (arena, logger, root) = infer_src(
            "vector v = <1,2,3>;\ndefault { state_entry() { float x = v.x; } }",
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(first_local_init_ty(&arena, root), ScriptType::Float);
    }

    #[test]
    fn bogus_member_is_an_error() {
        let (_, logger, _) = infer_src(
            "vector v = <1,2,3>;\ndefault { state_entry() { float x = v.w; } }",
        );
        assert!(logger.has_code(DiagCode::InvalidMember));
    }

    #[test]
    fn call_arity_and_argument_types() {
        let (_, logger, _) =
            infer_src("default { state_entry() { sleep(1.0, 2.0); } }");
        assert!(logger.has_code(DiagCode::TooManyArguments));

        let (_, logger, _) =
            infer_src("default { state_entry() { sleep(\"long\"); } }");
        assert!(logger.has_code(DiagCode::WrongTypeArgument));

        let (_, logger, _) = infer_src("default { state_entry() { sleep(1); } }");
        assert_eq!(logger.errors(), 0, "int argument coerces to float param");
    }

    #[test]
    fn user_function_calls_check_against_declaration() {
        let (_, logger, _) = infer_src(
            "float half(float x) { return x / 2.0; }\n\
             default { state_entry() { float y = half(3); } }",
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn missing_return_on_some_path() {
        let (_, logger, _) = infer_src(
            "integer f(integer x) { if (x) return 1; }\n\
             default { state_entry() { f(0); } }",
        );
        assert!(logger.has_code(DiagCode::NotAllPathsReturn));
    }

    #[test]
    fn both_branches_returning_satisfies_the_analysis() {
        let (_, logger, _) = infer_src(
            "integer f(integer x) { if (x) return 1; else return 0; }\n\
             default { state_entry() { f(0); } }",
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn constant_true_condition_does_not_rescue_missing_else() {
        let (_, logger, _) = infer_src(
            "integer f() { if (1) return 1; }\n\
             default { state_entry() { f(); } }",
        );
        assert!(logger.has_code(DiagCode::NotAllPathsReturn));
    }

    #[test]
    fn return_type_checks() {
        let (_, logger, _) = infer_src(
            "integer f() { return \"no\"; }\ndefault { state_entry() { f(); } }",
        );
        assert!(logger.has_code(DiagCode::ReturnValueMismatch));

        let (_, logger, _) = infer_src(
            "f() { return 1; }\ndefault { state_entry() { f(); } }",
        );
        assert!(logger.has_code(DiagCode::ReturnValueMismatch));

        let (_, logger, _) = infer_src(
            "default { state_entry() { return; } }",
        );
        assert_eq!(logger.errors(), 0, "bare return is fine in a handler");
    }

    #[test]
    fn list_in_list_is_rejected() {
        let (_, logger, _) = infer_src(
            "default { state_entry() { list l = [1, [2]]; } }",
        );
        assert!(logger.has_code(DiagCode::TypeMismatch));
    }

    #[test]
    fn every_expression_gets_a_type() {
        let (arena, _, root) = infer_src(
            "integer g = 2 + 3;\n\
             default { state_entry() { float x = g * 2; say(0, (string)x); } }",
        );
        // walk the whole tree: no expression may be left untyped (void
        // calls legitimately carry the void type)
        fn check(arena: &Arena, id: NodeId) {
            if matches!(arena.get(id).kind, NodeKind::Expr(_))
                && !matches!(arena.get(id).kind, NodeKind::Expr(ExprKind::Call))
            {
                assert_ne!(arena.get(id).ty, ScriptType::Null, "untyped expression");
            }
            for i in 0..arena.child_count(id) {
                check(arena, arena.child(id, i));
            }
        }
        check(&arena, root);
    }

    #[test]
    fn int_times_equals_float_is_legal() {
        let (_, logger, _) = infer_src(
            "default { state_entry() { integer a = 2; a *= 1.5; } }",
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn int_plus_equals_float_is_not() {
        let (_, logger, _) = infer_src(
            "default { state_entry() { integer a = 2; a += 1.5; } }",
        );
        assert!(logger.has_code(DiagCode::InvalidOperator));
    }
}
