//! Lowering from the extracted module description to IR.
//!
//! A single pre-order walk per function body. Three statement shapes
//! emit IR — host-API calls, plain calls, and returns — plus variable
//! declarations, which allocate local slots. All other statement kinds
//! (branches, loops, blocks) are traversed so the recognized shapes
//! inside them still lower, but the control flow itself emits nothing;
//! this is a documented restriction of the minimal lowering. Plain
//! call arguments are likewise not evaluated, a known simplification.

use tracing::debug;

use super::{Imm, Instr, IrFunction, IrModule, Opcode};
use crate::caps::API_REGISTER_COMMAND;
use crate::frontend::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::frontend::extract::{CommandDef, Extraction};
use crate::frontend::eval::{eval_const, Const};
use crate::frontend::extract::akm_method;

/// Lower every extracted function and inject the command-registration
/// prologue into `init`.
pub fn lower(extraction: &Extraction) -> IrModule {
    let mut lowerer = Lowerer {
        strings: Vec::new(),
    };
    let mut functions = Vec::new();
    for def in &extraction.functions {
        let mut f = IrFunction::new(def.name.clone(), def.func.params.clone());
        lowerer.lower_stmts(&mut f, &def.func.body);
        if f.is_init {
            lowerer.inject_registrations(&mut f, &extraction.commands);
        }
        if f.instrs.last().map(|i| i.op) != Some(Opcode::Ret) {
            f.instrs.push(Instr::new(Opcode::Ret));
        }
        debug!(function = %f.name, instrs = f.instrs.len(), "lowered");
        functions.push(f);
    }
    IrModule {
        functions,
        strings: lowerer.strings,
    }
}

struct Lowerer {
    strings: Vec<String>,
}

impl Lowerer {
    /// Record a string use. Uses are appended as encountered; the
    /// optimizer's dedup pass uniquifies the table.
    fn intern(&mut self, s: &str) -> String {
        self.strings.push(s.to_string());
        s.to_string()
    }

    fn lower_stmts(&mut self, f: &mut IrFunction, stmts: &[Stmt]) {
        for stmt in stmts {
            self.lower_stmt(f, stmt);
        }
    }

    fn lower_stmt(&mut self, f: &mut IrFunction, stmt: &Stmt) {
        match stmt {
            Stmt::Expr { expr, .. } => self.lower_expr_stmt(f, expr),
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.lower_value_expr(f, value);
                }
                f.instrs.push(Instr::new(Opcode::Ret));
            }
            Stmt::VarDecl { decls, .. } => {
                for d in decls {
                    f.locals.push(d.name.clone());
                    if let Some(init) = &d.init {
                        let value = self.literal_imm(init);
                        f.instrs.push(Instr::store_local(d.name.clone(), value));
                    }
                }
            }
            Stmt::If { then, other, .. } => {
                self.lower_stmts(f, then);
                if let Some(other) = other {
                    self.lower_stmts(f, other);
                }
            }
            Stmt::While { body, .. } => self.lower_stmts(f, body),
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    self.lower_stmt(f, init);
                }
                self.lower_stmts(f, body);
            }
            Stmt::Block { body, .. } => self.lower_stmts(f, body),
            Stmt::FuncDecl { .. }
            | Stmt::ExportNamed { .. }
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Empty { .. } => {}
        }
    }

    fn lower_expr_stmt(&mut self, f: &mut IrFunction, expr: &Expr) {
        let Expr::Call { callee, args, .. } = expr else {
            return;
        };
        if let Some(method) = akm_method(callee) {
            // `module` and `command` are declarations, not calls to
            // lower; registration IR is synthesized into `init`.
            if method == "module" || method == "command" {
                return;
            }
            self.lower_api_args(f, args);
            f.instrs.push(Instr::call_api(method, args.len() as u8));
        } else if let Some(name) = callee.as_ident() {
            f.instrs.push(Instr::call(name, args.len() as u8));
        }
    }

    fn lower_api_args(&mut self, f: &mut IrFunction, args: &[Expr]) {
        for arg in args {
            if let Some(name) = arg.as_ident() {
                f.instrs.push(Instr::load_local(name));
                continue;
            }
            match eval_const(arg) {
                Some(Const::Str(s)) => {
                    let s = self.intern(&s);
                    f.instrs.push(Instr::push_str(s));
                }
                Some(Const::Num(n)) => f.instrs.push(Instr::push_int(n as i64)),
                _ => f.instrs.push(Instr::push_int(0)),
            }
        }
    }

    /// Lower a value-producing expression for `return`. Literals fold
    /// through the restricted evaluator; arithmetic over lowerable
    /// operands compiles post-order into stack operations; anything
    /// else degrades to `push 0`.
    fn lower_value_expr(&mut self, f: &mut IrFunction, expr: &Expr) {
        if let Some(name) = expr.as_ident() {
            f.instrs.push(Instr::load_local(name));
            return;
        }
        match eval_const(expr) {
            Some(Const::Num(n)) => {
                f.instrs.push(Instr::push_int(n as i64));
                return;
            }
            Some(Const::Str(s)) => {
                let s = self.intern(&s);
                f.instrs.push(Instr::push_imm(Imm::Str(s)));
                return;
            }
            Some(Const::Bool(b)) => {
                f.instrs.push(Instr::push_int(i64::from(b)));
                return;
            }
            _ => {}
        }
        match expr {
            Expr::Binary { op, left, right, .. } => match binop_opcode(*op) {
                Some(opcode) => {
                    self.lower_value_expr(f, left);
                    self.lower_value_expr(f, right);
                    f.instrs.push(Instr::new(opcode));
                }
                None => f.instrs.push(Instr::push_int(0)),
            },
            Expr::Unary { op: UnaryOp::Neg, expr, .. } => {
                self.lower_value_expr(f, expr);
                f.instrs.push(Instr::new(Opcode::Neg));
            }
            Expr::Unary { op: UnaryOp::Not, expr, .. } => {
                self.lower_value_expr(f, expr);
                f.instrs.push(Instr::new(Opcode::Not));
            }
            _ => f.instrs.push(Instr::push_int(0)),
        }
    }

    /// Literal initializer for a local slot; failures store zero.
    fn literal_imm(&mut self, expr: &Expr) -> Imm {
        match eval_const(expr) {
            Some(Const::Num(n)) => Imm::Int(n as i64),
            Some(Const::Str(s)) => Imm::Str(self.intern(&s)),
            Some(Const::Bool(b)) => Imm::Int(i64::from(b)),
            _ => Imm::Int(0),
        }
    }

    /// Splice one registration block per command immediately before
    /// the first `ret` of `init` (or at the end when there is none).
    /// The `push 0` is a placeholder for the handler offset, resolved
    /// by the code generator into the command stub.
    fn inject_registrations(&mut self, f: &mut IrFunction, commands: &[CommandDef]) {
        if commands.is_empty() {
            return;
        }
        let mut block = Vec::new();
        for cmd in commands {
            for text in [&cmd.name, &cmd.syntax, &cmd.description, &cmd.category] {
                let s = self.intern(text);
                block.push(Instr::push_str(s));
            }
            block.push(Instr::push_int(0));
            block.push(Instr::call_api(API_REGISTER_COMMAND, 5));
            block.push(Instr::new(Opcode::Pop));
        }
        let at = f
            .instrs
            .iter()
            .position(|i| i.op == Opcode::Ret)
            .unwrap_or(f.instrs.len());
        f.instrs.splice(at..at, block);
    }
}

fn binop_opcode(op: BinaryOp) -> Option<Opcode> {
    Some(match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::BitAnd => Opcode::And,
        BinaryOp::BitOr => Opcode::Or,
        BinaryOp::BitXor => Opcode::Xor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr | BinaryOp::UShr => Opcode::Shr,
        _ => return None,
    })
}
