//! Extraction of the module description from a parsed source file.
//!
//! Four projections are pulled out of the AST: the `AKM.module`
//! configuration object, top-level function definitions, `AKM.command`
//! registrations, and every host-API call site. Extraction itself
//! never fails; structural problems (no module declaration, missing
//! name) are detected by the pipeline driver, and everything
//! recoverable is reported as a warning.

use std::collections::HashSet;

use tracing::debug;

use super::ast::{Declarator, Expr, FuncLit, MemberProp, SourceFile, Span, Stmt};
use super::eval::{eval_const, Const};
use super::Warning;
use crate::format;

/// Module descriptor, created here and mutated once by the capability
/// inference stage.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub license: String,
    pub capabilities: u32,
    pub dependencies: Vec<String>,
    pub security_level: u8,
}

impl Default for ModuleInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "1.0.0".to_string(),
            author: String::new(),
            description: String::new(),
            license: String::new(),
            capabilities: 0,
            dependencies: Vec::new(),
            security_level: 0,
        }
    }
}

/// A top-level function definition.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub func: FuncLit,
    pub exported: bool,
    pub span: Span,
}

/// A shell-command registration.
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub name: String,
    pub syntax: String,
    pub description: String,
    pub category: String,
    /// Handler function name; `None` when the handler argument was not
    /// an identifier naming an extracted function.
    pub handler: Option<String>,
    pub span: Span,
}

/// One `AKM.<method>(...)` call site.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: String,
    pub argc: usize,
    pub span: Span,
}

/// All projections extracted from one source file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub module: Option<ModuleInfo>,
    pub functions: Vec<FunctionDef>,
    pub commands: Vec<CommandDef>,
    pub api_calls: Vec<ApiCall>,
    pub warnings: Vec<Warning>,
}

impl Extraction {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

pub fn extract(file: &SourceFile) -> Extraction {
    let mut ex = Extractor::default();
    ex.collect_functions(&file.body);
    for stmt in &file.body {
        ex.walk_stmt(stmt);
    }
    ex.finish()
}

#[derive(Default)]
struct Extractor {
    out: Extraction,
    exported_names: HashSet<String>,
    raw_handlers: Vec<Option<(String, Span)>>,
}

impl Extractor {
    fn warn(&mut self, span: Span, message: impl Into<String>) {
        self.out.warnings.push(Warning {
            message: message.into(),
            span: Some(span),
        });
    }

    /// Pass 1: top-level function definitions. Three shapes are
    /// recognized: declarations, exported declarations, and single-name
    /// bindings initialized with a function or arrow expression. IIFEs,
    /// reassignments, and object methods are ignored.
    fn collect_functions(&mut self, body: &[Stmt]) {
        for stmt in body {
            match stmt {
                Stmt::FuncDecl { name, func, exported, span } => {
                    self.out.functions.push(FunctionDef {
                        name: name.clone(),
                        func: func.clone(),
                        exported: *exported,
                        span: *span,
                    });
                }
                Stmt::VarDecl { decls, span, .. } => {
                    for Declarator { name, init } in decls {
                        if let Some(Expr::Func { func, .. }) = init {
                            self.out.functions.push(FunctionDef {
                                name: name.clone(),
                                func: func.clone(),
                                exported: false,
                                span: *span,
                            });
                        }
                    }
                }
                Stmt::ExportNamed { names, .. } => {
                    self.exported_names.extend(names.iter().cloned());
                }
                _ => {}
            }
        }
    }

    // Pass 2: full pre-order walk recording AKM.* call sites.

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr { expr, .. } => self.walk_expr(expr),
            Stmt::VarDecl { decls, .. } => {
                for d in decls {
                    if let Some(init) = &d.init {
                        self.walk_expr(init);
                    }
                }
            }
            Stmt::FuncDecl { func, .. } => self.walk_stmts(&func.body),
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.walk_expr(v);
                }
            }
            Stmt::If { cond, then, other, .. } => {
                self.walk_expr(cond);
                self.walk_stmts(then);
                if let Some(other) = other {
                    self.walk_stmts(other);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.walk_expr(cond);
                self.walk_stmts(body);
            }
            Stmt::For { init, cond, update, body, .. } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond);
                }
                if let Some(update) = update {
                    self.walk_expr(update);
                }
                self.walk_stmts(body);
            }
            Stmt::Block { body, .. } => self.walk_stmts(body),
            Stmt::ExportNamed { .. }
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Empty { .. } => {}
        }
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        if let Expr::Call { callee, args, span } = expr {
            if let Some(method) = akm_method(callee) {
                self.record_akm_call(&method, args, *span);
            }
        }
        match expr {
            Expr::Template { exprs, .. } => {
                for e in exprs {
                    self.walk_expr(e);
                }
            }
            Expr::Array { elems, .. } => {
                for e in elems {
                    self.walk_expr(e);
                }
            }
            Expr::Object { props, .. } => {
                for (_, v) in props {
                    self.walk_expr(v);
                }
            }
            Expr::Unary { expr, .. } => self.walk_expr(expr),
            Expr::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::Cond { cond, then, other, .. } => {
                self.walk_expr(cond);
                self.walk_expr(then);
                self.walk_expr(other);
            }
            Expr::Assign { target, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            Expr::Member { object, prop, .. } => {
                self.walk_expr(object);
                if let MemberProp::Index(index) = prop {
                    self.walk_expr(index);
                }
            }
            Expr::Call { callee, args, .. } => {
                self.walk_expr(callee);
                for a in args {
                    self.walk_expr(a);
                }
            }
            Expr::Func { func, .. } => self.walk_stmts(&func.body),
            _ => {}
        }
    }

    fn record_akm_call(&mut self, method: &str, args: &[Expr], span: Span) {
        match method {
            "module" => self.record_module(args, span),
            "command" => self.record_command(args, span),
            _ => self.out.api_calls.push(ApiCall {
                method: method.to_string(),
                argc: args.len(),
                span,
            }),
        }
    }

    fn record_module(&mut self, args: &[Expr], span: Span) {
        if self.out.module.is_some() {
            self.warn(span, "duplicate AKM.module declaration ignored");
            return;
        }
        let Some(Const::Object(props)) = args.first().and_then(eval_const) else {
            self.warn(span, "AKM.module expects a constant object literal");
            self.out.module = Some(ModuleInfo::default());
            return;
        };
        let mut info = ModuleInfo::default();
        for (key, value) in props {
            match key.as_str() {
                "name" => match value.as_str() {
                    Some(s) => info.name = s.to_string(),
                    None => self.warn(span, "module name must be a string literal"),
                },
                "version" => match value.as_str() {
                    Some(s) => info.version = s.to_string(),
                    None => self.warn(span, "module version must be a string literal"),
                },
                "author" => match value.as_str() {
                    Some(s) => info.author = s.to_string(),
                    None => self.warn(span, "module author must be a string literal"),
                },
                "description" => {
                    if let Some(s) = value.as_str() {
                        info.description = s.to_string();
                    }
                }
                "license" => {
                    if let Some(s) = value.as_str() {
                        info.license = s.to_string();
                    }
                }
                "capabilities" => match value.as_u32() {
                    Some(mask) => info.capabilities = mask,
                    None => self.warn(
                        span,
                        "capabilities must be a number or AKM.CAPS bitwise-OR expression",
                    ),
                },
                "dependencies" => match value {
                    Const::Array(elems) => {
                        for dep in &elems {
                            match dep.as_str() {
                                Some(s) if info.dependencies.len() < format::DEP_MAX => {
                                    info.dependencies.push(s.to_string());
                                }
                                Some(s) => self.warn(
                                    span,
                                    format!(
                                        "dependency {s:?} dropped: at most {} allowed",
                                        format::DEP_MAX
                                    ),
                                ),
                                None => self.warn(span, "dependencies must be string literals"),
                            }
                        }
                    }
                    _ => self.warn(span, "dependencies must be an array of strings"),
                },
                "security_level" => match value.as_num() {
                    Some(n) if (0.0..=2.0).contains(&n) => info.security_level = n as u8,
                    Some(n) => {
                        self.warn(span, format!("security_level {n} out of range, clamped"));
                        info.security_level = if n < 0.0 { 0 } else { 2 };
                    }
                    None => self.warn(span, "security_level must be a number"),
                },
                other => self.warn(span, format!("unknown module config key: {other}")),
            }
        }
        self.out.module = Some(info);
    }

    fn record_command(&mut self, args: &[Expr], span: Span) {
        let mut cmd = CommandDef {
            name: String::new(),
            syntax: String::new(),
            description: String::new(),
            category: String::new(),
            handler: None,
            span,
        };
        match args.first().and_then(eval_const) {
            Some(Const::Object(props)) => {
                for (key, value) in props {
                    let Some(s) = value.as_str() else { continue };
                    match key.as_str() {
                        "name" => cmd.name = s.to_string(),
                        "syntax" => cmd.syntax = s.to_string(),
                        "description" => cmd.description = s.to_string(),
                        "category" => cmd.category = s.to_string(),
                        _ => {}
                    }
                }
            }
            _ => self.warn(span, "AKM.command expects a constant object literal"),
        }
        if cmd.name.is_empty() {
            self.warn(span, "command registration without a name");
        }
        // Handler validity is checked once all functions are known.
        let raw = match args.get(1) {
            Some(Expr::Ident { name, span }) => Some((name.clone(), *span)),
            _ => {
                self.warn(span, "command handler must be a named function");
                None
            }
        };
        self.raw_handlers.push(raw);
        self.out.commands.push(cmd);
    }

    fn finish(mut self) -> Extraction {
        for f in &mut self.out.functions {
            if self.exported_names.contains(&f.name) {
                f.exported = true;
            }
        }
        let names: HashSet<&str> = self.out.functions.iter().map(|f| f.name.as_str()).collect();
        for (cmd, raw) in self.out.commands.iter_mut().zip(&self.raw_handlers) {
            match raw {
                Some((name, _)) if names.contains(name.as_str()) => {
                    cmd.handler = Some(name.clone());
                }
                Some((name, span)) => {
                    cmd.handler = Some(name.clone());
                    self.out.warnings.push(Warning {
                        message: format!("command handler `{name}` is not a known function"),
                        span: Some(*span),
                    });
                }
                None => {}
            }
        }
        debug!(
            functions = self.out.functions.len(),
            commands = self.out.commands.len(),
            api_calls = self.out.api_calls.len(),
            "extraction complete"
        );
        self.out
    }
}

/// The method name if `callee` is a member access on the global `AKM`
/// sentinel.
pub fn akm_method(callee: &Expr) -> Option<String> {
    let Expr::Member { object, prop: MemberProp::Dot(name), .. } = callee else {
        return None;
    };
    if object.as_ident() != Some("AKM") {
        return None;
    }
    Some(name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::cap;
    use crate::frontend::parser::parse_source;

    fn extract_src(src: &str) -> Extraction {
        extract(&parse_source(src).unwrap())
    }

    #[test]
    fn test_extract_module_config() {
        let ex = extract_src(
            r#"AKM.module({
                name: "net-tools",
                version: "2.1.0",
                author: "kestrel",
                capabilities: AKM.CAPS.NETWORK | AKM.CAPS.LOG,
                dependencies: ["vfs", "netstack"],
                security_level: 1,
            });"#,
        );
        let info = ex.module.unwrap();
        assert_eq!(info.name, "net-tools");
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.capabilities, cap::NETWORK | cap::LOG);
        assert_eq!(info.dependencies, vec!["vfs", "netstack"]);
        assert_eq!(info.security_level, 1);
        assert!(ex.warnings.is_empty());
    }

    #[test]
    fn test_extract_defaults() {
        let ex = extract_src(r#"AKM.module({ name: "m" });"#);
        let info = ex.module.unwrap();
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.capabilities, 0);
    }

    #[test]
    fn test_extract_function_shapes() {
        let ex = extract_src(
            r#"
            function init() {}
            export function helper() {}
            const exit = function () {};
            let handler = () => {};
            (function ignored() {})();
            "#,
        );
        let names: Vec<&str> = ex.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["init", "helper", "exit", "handler"]);
        assert!(ex.function("helper").unwrap().exported);
    }

    #[test]
    fn test_export_named_marks_functions() {
        let ex = extract_src("function init() {}\nexport { init };");
        assert!(ex.function("init").unwrap().exported);
    }

    #[test]
    fn test_extract_command() {
        let ex = extract_src(
            r#"
            function doHi(args) {}
            AKM.command({ name: "hi", syntax: "hi", description: "greet", category: "misc" }, doHi);
            "#,
        );
        assert_eq!(ex.commands.len(), 1);
        let cmd = &ex.commands[0];
        assert_eq!(cmd.name, "hi");
        assert_eq!(cmd.handler.as_deref(), Some("doHi"));
    }

    #[test]
    fn test_command_with_bad_handler_warns() {
        let ex = extract_src(r#"AKM.command({ name: "x" }, function () {});"#);
        assert!(ex.commands[0].handler.is_none());
        assert!(!ex.warnings.is_empty());
    }

    #[test]
    fn test_api_calls_recorded_everywhere() {
        let ex = extract_src(
            r#"
            function init() {
                AKM.info("up");
                if (1) { AKM.open("/etc/motd", 0); }
            }
            "#,
        );
        let methods: Vec<&str> = ex.api_calls.iter().map(|c| c.method.as_str()).collect();
        assert_eq!(methods, vec!["info", "open"]);
        assert_eq!(ex.api_calls[1].argc, 2);
    }

    #[test]
    fn test_module_and_command_not_api_calls() {
        let ex = extract_src(r#"AKM.module({ name: "m" }); AKM.command({ name: "c" }, h);"#);
        assert!(ex.api_calls.is_empty());
    }

    #[test]
    fn test_duplicate_module_warns() {
        let ex = extract_src(r#"AKM.module({ name: "a" }); AKM.module({ name: "b" });"#);
        assert_eq!(ex.module.unwrap().name, "a");
        assert!(ex.warnings.iter().any(|w| w.message.contains("duplicate")));
    }

    #[test]
    fn test_dependency_limit() {
        let ex = extract_src(r#"AKM.module({ name: "m", dependencies: ["a","b","c","d","e"] });"#);
        assert_eq!(ex.module.unwrap().dependencies.len(), 4);
        assert!(ex.warnings.iter().any(|w| w.message.contains("at most")));
    }
}
