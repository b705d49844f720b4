//! Compilation pipeline driver.
//!
//! Sequences the stages: parse → extract → lower → capability
//! inference → optimize (opt-in) → codegen → binary write. Errors are
//! aggregated per stage and returned as a list; a non-empty list
//! aborts before emission. Warnings accumulate across stages and never
//! abort.

use thiserror::Error;
use tracing::debug;

use crate::caps::{self, cap};
use crate::codegen::{self, CodegenError};
use crate::format;
use crate::frontend::extract::{Extraction, ModuleInfo};
use crate::frontend::{self, ParseError, Warning};
use crate::ir::{lower, IrModule};
use crate::opt::{self, OptStats};
use crate::writer;

/// Errors that abort compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{file}:{error}")]
    Parse { file: String, error: ParseError },

    #[error("missing AKM.module declaration")]
    MissingModuleDecl,

    #[error("module name is missing or empty")]
    MissingModuleName,

    #[error("required function `{0}` is not defined")]
    MissingFunction(&'static str),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

/// Result type for pipeline operations: errors come back as a list.
pub type CompileResult<T> = Result<T, Vec<CompileError>>;

/// Configuration for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Input file name used in diagnostics.
    pub file: String,
    /// Run the optimizer passes.
    pub optimize: bool,
    /// Set the DEBUG header flag.
    pub debug: bool,
    /// Extra capability bits OR'd into the declared mask.
    pub extra_caps: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            file: "<input>".to_string(),
            optimize: false,
            debug: false,
            extra_caps: 0,
        }
    }
}

/// Per-compilation statistics, reported under verbose output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileStats {
    pub functions: usize,
    pub commands: usize,
    pub instructions_before: usize,
    pub instructions_after: usize,
    pub code_size: usize,
    pub data_size: usize,
    pub total_size: usize,
    pub capabilities: u32,
    pub opt: Option<OptStats>,
}

/// A successful compilation.
#[derive(Debug)]
pub struct CompileOutput {
    pub artifact: Vec<u8>,
    pub module: ModuleInfo,
    pub ir: IrModule,
    pub warnings: Vec<Warning>,
    pub stats: CompileStats,
}

/// Compile one module source to an AKM v2 artifact.
pub fn compile(source: &str, config: &CompilerConfig) -> CompileResult<CompileOutput> {
    // Phase 1: parse.
    let file = frontend::parse_source(source).map_err(|error| {
        vec![CompileError::Parse {
            file: config.file.clone(),
            error,
        }]
    })?;

    // Phase 2: extract and check structure.
    let extraction = frontend::extract(&file);
    let mut errors = Vec::new();
    match &extraction.module {
        None => errors.push(CompileError::MissingModuleDecl),
        Some(info) if info.name.is_empty() => errors.push(CompileError::MissingModuleName),
        Some(_) => {}
    }
    for required in ["init", "exit"] {
        if extraction.function(required).is_none() {
            errors.push(CompileError::MissingFunction(required));
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    let mut warnings = extraction.warnings.clone();
    let mut info = extraction.module.clone().unwrap_or_default();

    // Phase 3: lower to IR.
    let mut ir = lower::lower(&extraction);
    let instructions_before = ir.instruction_count();

    // Phase 4: capability inference; the descriptor's one mutation.
    let (mask, cap_warnings) = infer_capabilities(&info, &extraction, config.extra_caps);
    info.capabilities = mask;
    warnings.extend(cap_warnings);

    // Phase 5: optimize (opt-in).
    let opt_stats = if config.optimize {
        Some(opt::optimize(&mut ir))
    } else {
        None
    };

    // Phase 6: generate code and data.
    let image = codegen::generate(&ir, &extraction.commands)
        .map_err(|e| vec![CompileError::Codegen(e)])?;
    warnings.extend(image.warnings.clone());

    // Phase 7: assemble the artifact.
    let flags = if config.debug { format::flag::DEBUG } else { 0 };
    let artifact = writer::write_artifact(&info, &image, flags);

    let stats = CompileStats {
        functions: ir.functions.len(),
        commands: extraction.commands.len(),
        instructions_before,
        instructions_after: ir.instruction_count(),
        code_size: image.code.len(),
        data_size: image.data.len(),
        total_size: artifact.len(),
        capabilities: info.capabilities,
        opt: opt_stats,
    };
    debug!(?stats, module = %info.name, "compilation succeeded");

    Ok(CompileOutput {
        artifact,
        module: info,
        ir,
        warnings,
        stats,
    })
}

/// Union the declared capabilities with everything the module's
/// behavior implies: `COMMAND` when commands are registered, the
/// declared bit of every known API method used, and `LOG`
/// unconditionally (every module is assumed to use the log facility).
fn infer_capabilities(
    info: &ModuleInfo,
    extraction: &Extraction,
    extra: u32,
) -> (u32, Vec<Warning>) {
    let mut mask = info.capabilities | extra;
    let mut warnings = Vec::new();
    if !extraction.commands.is_empty() {
        mask |= cap::COMMAND;
    }
    for call in &extraction.api_calls {
        match caps::api_lookup(&call.method) {
            Some((_, entry)) => {
                mask |= entry.cap;
                if usize::from(entry.argc) != call.argc {
                    warnings.push(Warning {
                        message: format!(
                            "AKM.{} expects {} argument(s), got {}",
                            call.method, entry.argc, call.argc
                        ),
                        span: Some(call.span),
                    });
                }
            }
            None => warnings.push(Warning {
                message: format!("unknown API method: AKM.{}", call.method),
                span: Some(call.span),
            }),
        }
    }
    mask |= cap::LOG;
    (mask, warnings)
}
