//! akmc - compiler for AKM v2 sandboxed kernel modules.
//!
//! Compiles module scripts written in a restricted scripting dialect
//! into the AKM v2 binary container the Kestrel kernel loads: a 512-byte
//! fixed header, stack-machine bytecode, a data section (string table
//! and command stubs), a symbol table, and a string table, sealed with
//! two rolling checksums.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌───────────┐
//! │ frontend │──▶│ IR lower  │──▶│ caps    │──▶│ optimizer │
//! │ lex/parse│   │ + init    │   │ infer   │   │ (opt-in)  │
//! │ /extract │   │ prologue  │   └─────────┘   └─────┬─────┘
//! └──────────┘   └───────────┘                       │
//!                                                    ▼
//!                ┌───────────┐   ┌─────────┐   ┌──────────┐
//!                │ inspector │◀──│ writer  │◀──│ codegen  │
//!                └───────────┘   └─────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use akmc::compiler::{compile, CompilerConfig};
//!
//! let source = r#"
//!     AKM.module({ name: "hello" });
//!     function init() { AKM.info("hello loaded"); return 0; }
//!     function exit() {}
//!     export { init, exit };
//! "#;
//!
//! let out = compile(source, &CompilerConfig::default()).unwrap();
//! assert_eq!(&out.artifact[0..4], b"AKM2");
//! ```

#![warn(clippy::all)]

pub mod caps;
pub mod codegen;
pub mod compiler;
pub mod format;
pub mod frontend;
pub mod inspect;
pub mod ir;
pub mod opt;
pub mod writer;

// Re-export commonly used types
pub use compiler::{compile, CompileError, CompileOutput, CompileResult, CompilerConfig};
pub use frontend::{ModuleInfo, ParseError, Warning};
pub use inspect::{parse_header, report, HeaderInfo, InspectError};
pub use ir::{Imm, Instr, IrFunction, IrModule, Opcode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
