//! akmc - CLI entry point.
//!
//! Compiles a module script to an AKM v2 artifact, or inspects an
//! existing artifact with `--info`. Exits 0 on success and 1 on any
//! parse, structural, or I/O error.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use akmc::caps;
use akmc::compiler::{compile, CompileOutput, CompilerConfig};
use akmc::inspect;

#[derive(Parser)]
#[command(name = "akmc")]
#[command(version)]
#[command(about = "AKM v2 module compiler", long_about = None)]
struct Cli {
    /// Input module source (or an artifact with --info)
    input: PathBuf,

    /// Output artifact path (default: input with .akm extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print per-stage statistics
    #[arg(short, long)]
    verbose: bool,

    /// Set the DEBUG header flag
    #[arg(short, long)]
    debug: bool,

    /// Run the optimizer passes
    #[arg(short = 'O', long)]
    optimize: bool,

    /// Extra capabilities: hex mask or comma-separated names
    #[arg(short = 'c', long = "caps", value_name = "HEX|NAME[,NAME...]")]
    caps: Option<String>,

    /// Compile without writing the artifact
    #[arg(long)]
    dry_run: bool,

    /// Print the final IR as a listing plus JSON
    #[arg(long)]
    emit_ir: bool,

    /// Inspect an existing artifact instead of compiling
    #[arg(short = 'i', long)]
    info: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "akmc=debug" } else { "akmc=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.info {
        inspect_artifact(&cli.input)
    } else {
        compile_module(&cli)
    }
}

fn inspect_artifact(path: &Path) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = inspect::report(&bytes)?;
    print!("{text}");
    Ok(())
}

fn compile_module(cli: &Cli) -> Result<()> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let extra_caps = match &cli.caps {
        Some(spec) => caps::parse_cap_spec(spec)?,
        None => 0,
    };
    let config = CompilerConfig {
        file: cli.input.display().to_string(),
        optimize: cli.optimize,
        debug: cli.debug,
        extra_caps,
    };

    let output = match compile(&source, &config) {
        Ok(output) => output,
        Err(errors) => {
            for e in &errors {
                eprintln!("error: {e}");
            }
            bail!("compilation failed with {} error(s)", errors.len());
        }
    };

    for w in &output.warnings {
        eprintln!("{}: warning: {}", config.file, w);
    }

    if cli.emit_ir {
        emit_ir(&output)?;
    }

    if cli.verbose {
        print_stats(&output);
    }

    if cli.dry_run {
        println!("dry run: {} bytes not written", output.artifact.len());
        return Ok(());
    }

    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input));
    fs::write(&out_path, &output.artifact)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    println!(
        "wrote {} ({} bytes)",
        out_path.display(),
        output.artifact.len()
    );
    Ok(())
}

fn emit_ir(output: &CompileOutput) -> Result<()> {
    for f in &output.ir.functions {
        print!("{}", f.listing());
    }
    let json = serde_json::to_string_pretty(&output.ir).context("failed to serialize IR")?;
    println!("{json}");
    Ok(())
}

fn print_stats(output: &CompileOutput) {
    let stats = &output.stats;
    println!("module:        {} v{}", output.module.name, output.module.version);
    println!(
        "capabilities:  0x{:08X} [{}]",
        stats.capabilities,
        caps::cap_names(stats.capabilities).join(", ")
    );
    println!("functions:     {}", stats.functions);
    println!("commands:      {}", stats.commands);
    match stats.opt {
        Some(opt) => println!(
            "instructions:  {} -> {} (dce {}, folded {}, peephole {}, strings deduped {})",
            stats.instructions_before,
            stats.instructions_after,
            opt.dead_removed,
            opt.folded,
            opt.peephole_removed,
            opt.strings_deduped
        ),
        None => println!("instructions:  {}", stats.instructions_after),
    }
    println!("code size:     {}", stats.code_size);
    println!("data size:     {}", stats.data_size);
    println!("total size:    {}", stats.total_size);
}

/// Derive the default artifact path: strip `.akm.js` or `.js`, append
/// `.akm`.
fn default_output(input: &Path) -> PathBuf {
    let s = input.to_string_lossy();
    let base = s
        .strip_suffix(".akm.js")
        .or_else(|| s.strip_suffix(".js"))
        .unwrap_or(&s);
    PathBuf::from(format!("{base}.akm"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_strips_akm_js() {
        assert_eq!(
            default_output(Path::new("mods/hello.akm.js")),
            PathBuf::from("mods/hello.akm")
        );
    }

    #[test]
    fn test_default_output_strips_js() {
        assert_eq!(
            default_output(Path::new("hello.js")),
            PathBuf::from("hello.akm")
        );
    }

    #[test]
    fn test_default_output_other_extension() {
        assert_eq!(
            default_output(Path::new("hello.mod")),
            PathBuf::from("hello.mod.akm")
        );
    }
}
