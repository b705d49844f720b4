//! Restricted constant evaluator.
//!
//! Evaluates the literal forms permitted in module configuration and
//! call arguments: string/number/boolean literals, unary negation,
//! array literals of literals, nested object literals, and template
//! literals with no interpolations. `AKM.CAPS.<NAME>` members resolve
//! to their capability bit so that bitwise-OR expressions in the
//! `capabilities` field fold to a mask. Identifiers that cannot be
//! resolved evaluate to the [`Const::Ref`] sentinel.

use super::ast::{BinaryOp, Expr, MemberProp, UnaryOp};
use crate::caps;

/// Result of restricted constant evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Array(Vec<Const>),
    Object(Vec<(String, Const)>),
    /// Unresolvable identifier sentinel.
    Ref(String),
}

impl Const {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Const::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Const::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// 32-bit unsigned view of a numeric constant (JS `>>> 0` rules).
    pub fn as_u32(&self) -> Option<u32> {
        self.as_num().map(to_u32)
    }
}

/// Truncate a double to u32 with two's-complement wrapping.
pub fn to_u32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    (n as i64) as u32
}

/// Evaluate an expression under the restricted rules. `None` means the
/// expression is not a recognized constant form.
pub fn eval_const(expr: &Expr) -> Option<Const> {
    match expr {
        Expr::Str { value, .. } => Some(Const::Str(value.clone())),
        Expr::Num { value, .. } => Some(Const::Num(*value)),
        Expr::Bool { value, .. } => Some(Const::Bool(*value)),
        Expr::Null { .. } => Some(Const::Null),
        Expr::Ident { name, .. } => Some(Const::Ref(name.clone())),
        Expr::Unary { op: UnaryOp::Neg, expr, .. } => match eval_const(expr)? {
            Const::Num(n) => Some(Const::Num(-n)),
            _ => None,
        },
        Expr::Template { quasis, exprs, .. } if exprs.is_empty() => {
            Some(Const::Str(quasis.concat()))
        }
        Expr::Array { elems, .. } => {
            let elems = elems.iter().map(eval_const).collect::<Option<Vec<_>>>()?;
            Some(Const::Array(elems))
        }
        Expr::Object { props, .. } => {
            let props = props
                .iter()
                .map(|(k, v)| Some((k.clone(), eval_const(v)?)))
                .collect::<Option<Vec<_>>>()?;
            Some(Const::Object(props))
        }
        Expr::Member { .. } => eval_caps_member(expr).map(|bit| Const::Num(f64::from(bit))),
        Expr::Binary { op: BinaryOp::BitOr, left, right, .. } => {
            let l = eval_const(left)?.as_u32()?;
            let r = eval_const(right)?.as_u32()?;
            Some(Const::Num(f64::from(l | r)))
        }
        _ => None,
    }
}

/// Resolve `AKM.CAPS.<NAME>` to its capability bit.
fn eval_caps_member(expr: &Expr) -> Option<u32> {
    let Expr::Member { object, prop: MemberProp::Dot(name), .. } = expr else {
        return None;
    };
    let Expr::Member { object: root, prop: MemberProp::Dot(caps_prop), .. } = object.as_ref()
    else {
        return None;
    };
    if root.as_ident() != Some("AKM") || caps_prop != "CAPS" {
        return None;
    }
    caps::cap_by_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser;
    use crate::frontend::ast::Stmt;

    fn eval_src(src: &str) -> Option<Const> {
        let file = parser::parse_source(&format!("let probe = {src};")).unwrap();
        let Stmt::VarDecl { decls, .. } = &file.body[0] else {
            panic!();
        };
        eval_const(decls[0].init.as_ref().unwrap())
    }

    #[test]
    fn test_eval_literals() {
        assert_eq!(eval_src("42"), Some(Const::Num(42.0)));
        assert_eq!(eval_src("-42"), Some(Const::Num(-42.0)));
        assert_eq!(eval_src(r#""hi""#), Some(Const::Str("hi".into())));
        assert_eq!(eval_src("true"), Some(Const::Bool(true)));
        assert_eq!(eval_src("null"), Some(Const::Null));
    }

    #[test]
    fn test_eval_template_without_interpolation() {
        assert_eq!(eval_src("`a b`"), Some(Const::Str("a b".into())));
        assert_eq!(eval_src("`a${1}b`"), None);
    }

    #[test]
    fn test_eval_collections() {
        assert_eq!(
            eval_src(r#"["a", 1]"#),
            Some(Const::Array(vec![Const::Str("a".into()), Const::Num(1.0)]))
        );
        assert_eq!(
            eval_src(r#"{ k: "v" }"#),
            Some(Const::Object(vec![("k".into(), Const::Str("v".into()))]))
        );
    }

    #[test]
    fn test_eval_ident_is_ref_sentinel() {
        assert_eq!(eval_src("someVar"), Some(Const::Ref("someVar".into())));
    }

    #[test]
    fn test_eval_caps_or_chain() {
        let got = eval_src("AKM.CAPS.FS | AKM.CAPS.NETWORK | AKM.CAPS.LOG").unwrap();
        assert_eq!(
            got.as_u32(),
            Some(crate::caps::cap::FS | crate::caps::cap::NETWORK | crate::caps::cap::LOG)
        );
    }

    #[test]
    fn test_eval_unknown_cap_name_fails() {
        assert_eq!(eval_src("AKM.CAPS.NOPE"), None);
    }

    #[test]
    fn test_eval_rejects_calls() {
        assert_eq!(eval_src("f()"), None);
    }
}
