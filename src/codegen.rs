//! Code generation: IR to bytecode.
//!
//! Emits each function into a growing byte buffer, registering the
//! function name as a label at its entry offset. Control-flow and call
//! operands that reference a label not yet defined get a 32-bit
//! placeholder and a recorded fixup; fixups are patched once all
//! functions are emitted. The string table and the command stubs for
//! the data section are also built here, from the final IR string
//! list. All multi-byte operands are little-endian.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::caps;
use crate::frontend::extract::CommandDef;
use crate::frontend::Warning;
use crate::ir::{Imm, Instr, IrFunction, IrModule, Opcode};

#[derive(Debug, Error)]
pub enum CodegenError {
    /// A fixup whose label never resolved. Leaving zeroes would hand
    /// the loader an invalid address, so this aborts emission.
    #[error("unresolved label references: {0:?}")]
    UnresolvedLabels(Vec<String>),
}

/// One string-table entry: content, offset within the concatenated
/// table, and length including the NUL terminator.
#[derive(Debug, Clone)]
pub struct StringEntry {
    pub text: String,
    pub offset: u32,
    pub len: u32,
}

/// Everything the binary writer needs: code and data bytes, the
/// function offset map, and the string table.
#[derive(Debug, Clone)]
pub struct CodeImage {
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    /// Function entry offsets in emission order.
    pub function_offsets: Vec<(String, u32)>,
    pub string_entries: Vec<StringEntry>,
    pub warnings: Vec<Warning>,
}

impl CodeImage {
    pub fn function_offset(&self, name: &str) -> Option<u32> {
        self.function_offsets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, off)| *off)
    }

    /// Concatenated NUL-terminated string blob in table order.
    pub fn string_blob(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for entry in &self.string_entries {
            blob.extend_from_slice(entry.text.as_bytes());
            blob.push(0);
        }
        blob
    }
}

/// Lower a module's IR to bytes and build its data section.
pub fn generate(module: &IrModule, commands: &[CommandDef]) -> Result<CodeImage, CodegenError> {
    let mut gen = Generator::new(&module.strings);
    for f in &module.functions {
        gen.emit_function(f);
    }
    gen.resolve_fixups()?;
    let data = gen.build_data(commands);
    debug!(
        code = gen.code.len(),
        data = data.len(),
        strings = gen.entries.len(),
        "code generation complete"
    );
    Ok(CodeImage {
        code: gen.code,
        data,
        function_offsets: gen.function_offsets,
        string_entries: gen.entries,
        warnings: gen.warnings,
    })
}

struct Generator {
    code: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<(usize, String)>,
    function_offsets: Vec<(String, u32)>,
    entries: Vec<StringEntry>,
    /// Content and positional lookups into the string table; offsets
    /// are stable because they are computed from the final list.
    string_offsets: HashMap<String, u32>,
    warnings: Vec<Warning>,
}

impl Generator {
    fn new(strings: &[String]) -> Self {
        let mut entries = Vec::with_capacity(strings.len());
        let mut string_offsets = HashMap::new();
        let mut offset = 0u32;
        for s in strings {
            let len = s.len() as u32 + 1;
            entries.push(StringEntry {
                text: s.clone(),
                offset,
                len,
            });
            string_offsets.entry(s.clone()).or_insert(offset);
            offset += len;
        }
        Self {
            code: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            function_offsets: Vec::new(),
            entries,
            string_offsets,
            warnings: Vec::new(),
        }
    }

    fn string_offset(&self, text: &str) -> u32 {
        self.string_offsets.get(text).copied().unwrap_or(0)
    }

    fn emit_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_function(&mut self, f: &IrFunction) {
        let entry = self.code.len() as u32;
        self.function_offsets.push((f.name.clone(), entry));
        self.labels.insert(f.name.clone(), entry);

        // Prologue hook, then zero-initialize every local slot.
        self.code.push(Opcode::Nop as u8);
        for _ in &f.locals {
            self.code.push(Opcode::Push as u8);
            self.emit_u32(0);
        }
        for ins in &f.instrs {
            self.emit_instr(f, ins);
        }
    }

    fn emit_instr(&mut self, f: &IrFunction, ins: &Instr) {
        match ins.op {
            Opcode::Push => {
                self.code.push(Opcode::Push as u8);
                let imm = self.imm_operand(ins);
                self.emit_u32(imm);
            }
            Opcode::PushStr => {
                self.code.push(Opcode::PushStr as u8);
                let off = match &ins.value {
                    Some(Imm::Str(s)) => self.string_offset(s),
                    _ => 0,
                };
                self.emit_u32(off);
            }
            Opcode::PushArg => {
                self.code.push(Opcode::PushArg as u8);
                let idx = ins.int_value().unwrap_or(0) as u8;
                self.code.push(idx);
            }
            Opcode::StoreLocal => {
                // Lowered as `push <value>; store.local <slot>` so the
                // local is initialized from the immediate.
                self.code.push(Opcode::Push as u8);
                let imm = self.imm_operand(ins);
                self.emit_u32(imm);
                let slot = self.local_slot(f, ins);
                self.code.push(Opcode::StoreLocal as u8);
                self.code.push(slot);
            }
            Opcode::LoadLocal => {
                let slot = self.local_slot(f, ins);
                self.code.push(Opcode::LoadLocal as u8);
                self.code.push(slot);
            }
            Opcode::Call => {
                self.code.push(Opcode::Call as u8);
                if let Some(func) = &ins.func {
                    self.fixups.push((self.code.len(), func.clone()));
                }
                self.emit_u32(0);
                self.code.push(ins.argc.unwrap_or(0));
            }
            Opcode::CallApi => {
                self.code.push(Opcode::CallApi as u8);
                let idx = ins
                    .method
                    .as_deref()
                    .map(caps::api_index)
                    .unwrap_or(caps::API_UNKNOWN);
                self.code.push(idx);
                self.code.push(ins.argc.unwrap_or(0));
            }
            Opcode::Jmp | Opcode::Jz | Opcode::Jnz => {
                self.code.push(ins.op as u8);
                if let Some(label) = &ins.label {
                    self.fixups.push((self.code.len(), label.clone()));
                    self.emit_u32(0);
                } else {
                    self.emit_u32(ins.addr.unwrap_or(0));
                }
            }
            _ => self.code.push(ins.op as u8),
        }
    }

    fn imm_operand(&self, ins: &Instr) -> u32 {
        match &ins.value {
            Some(Imm::Int(v)) => *v as u32,
            Some(Imm::Str(s)) => self.string_offset(s),
            None => 0,
        }
    }

    fn local_slot(&mut self, f: &IrFunction, ins: &Instr) -> u8 {
        let name = ins.name.as_deref().unwrap_or("");
        match f.local_index(name) {
            Some(idx) => idx,
            None => {
                self.warnings.push(Warning {
                    message: format!("unknown local `{name}` in {}, using slot 0", f.name),
                    span: None,
                });
                0
            }
        }
    }

    fn resolve_fixups(&mut self) -> Result<(), CodegenError> {
        let fixups = std::mem::take(&mut self.fixups);
        let mut unresolved: Vec<String> = Vec::new();
        for (at, label) in fixups {
            match self.labels.get(&label) {
                Some(addr) => {
                    self.code[at..at + 4].copy_from_slice(&addr.to_le_bytes());
                }
                None if !unresolved.contains(&label) => unresolved.push(label),
                None => {}
            }
        }
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(CodegenError::UnresolvedLabels(unresolved))
        }
    }

    /// Data section: the string blob followed by one 20-byte stub per
    /// command (four string offsets, then the handler's code offset).
    fn build_data(&mut self, commands: &[CommandDef]) -> Vec<u8> {
        let mut data = Vec::new();
        for entry in &self.entries {
            data.extend_from_slice(entry.text.as_bytes());
            data.push(0);
        }
        for cmd in commands {
            for text in [&cmd.name, &cmd.syntax, &cmd.description, &cmd.category] {
                data.extend_from_slice(&self.string_offset(text).to_le_bytes());
            }
            let handler = cmd
                .handler
                .as_deref()
                .and_then(|h| self.labels.get(h).copied())
                .unwrap_or(0);
            data.extend_from_slice(&handler.to_le_bytes());
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Span;
    use crate::ir::IrFunction;

    fn module(functions: Vec<IrFunction>, strings: Vec<&str>) -> IrModule {
        IrModule {
            functions,
            strings: strings.into_iter().map(String::from).collect(),
        }
    }

    fn simple_func(name: &str, instrs: Vec<Instr>) -> IrFunction {
        IrFunction {
            instrs,
            ..IrFunction::new(name, vec![])
        }
    }

    #[test]
    fn test_emit_minimal_function() {
        let m = module(
            vec![simple_func(
                "init",
                vec![Instr::push_int(0), Instr::new(Opcode::Ret)],
            )],
            vec![],
        );
        let image = generate(&m, &[]).unwrap();
        assert_eq!(
            image.code,
            vec![
                Opcode::Nop as u8,
                Opcode::Push as u8,
                0,
                0,
                0,
                0,
                Opcode::Ret as u8,
            ]
        );
        assert_eq!(image.function_offset("init"), Some(0));
    }

    #[test]
    fn test_locals_zero_initialized() {
        let mut f = simple_func("init", vec![Instr::new(Opcode::Ret)]);
        f.locals = vec!["a".into(), "b".into()];
        let image = generate(&module(vec![f], vec![]), &[]).unwrap();
        // nop + two 5-byte push-zeroes + ret
        assert_eq!(image.code.len(), 1 + 10 + 1);
        assert_eq!(image.code[1], Opcode::Push as u8);
        assert_eq!(image.code[6], Opcode::Push as u8);
    }

    #[test]
    fn test_call_fixup_patched() {
        let m = module(
            vec![
                simple_func("init", vec![Instr::call("helper", 2), Instr::new(Opcode::Ret)]),
                simple_func("helper", vec![Instr::new(Opcode::Ret)]),
            ],
            vec![],
        );
        let image = generate(&m, &[]).unwrap();
        // init: nop, call(1 + 4 + 1), ret -> helper starts at 8.
        let helper_off = image.function_offset("helper").unwrap();
        assert_eq!(helper_off, 8);
        let patched = u32::from_le_bytes(image.code[2..6].try_into().unwrap());
        assert_eq!(patched, helper_off);
        assert_eq!(image.code[6], 2); // argc
    }

    #[test]
    fn test_unresolved_fixup_is_error() {
        let m = module(
            vec![simple_func(
                "init",
                vec![Instr::call("ghost", 0), Instr::new(Opcode::Ret)],
            )],
            vec![],
        );
        let err = generate(&m, &[]).unwrap_err();
        let CodegenError::UnresolvedLabels(labels) = err;
        assert_eq!(labels, vec!["ghost"]);
    }

    #[test]
    fn test_string_offsets_and_push_str() {
        let m = module(
            vec![simple_func(
                "init",
                vec![
                    Instr::push_str("ab"),
                    Instr::push_str("c"),
                    Instr::new(Opcode::Ret),
                ],
            )],
            vec!["ab", "c"],
        );
        let image = generate(&m, &[]).unwrap();
        // "ab\0" at 0, "c\0" at 3.
        assert_eq!(image.string_entries[0].offset, 0);
        assert_eq!(image.string_entries[0].len, 3);
        assert_eq!(image.string_entries[1].offset, 3);
        let off0 = u32::from_le_bytes(image.code[2..6].try_into().unwrap());
        let off1 = u32::from_le_bytes(image.code[7..11].try_into().unwrap());
        assert_eq!((off0, off1), (0, 3));
        assert_eq!(image.string_blob(), b"ab\0c\0");
    }

    #[test]
    fn test_store_local_expansion() {
        let mut f = simple_func(
            "init",
            vec![
                Instr::store_local("x", Imm::Int(7)),
                Instr::new(Opcode::Ret),
            ],
        );
        f.locals = vec!["x".into()];
        let image = generate(&module(vec![f], vec![]), &[]).unwrap();
        // nop, push 0 (zero-init), push 7, store.local 0, ret
        let expected = vec![
            Opcode::Nop as u8,
            Opcode::Push as u8,
            0,
            0,
            0,
            0,
            Opcode::Push as u8,
            7,
            0,
            0,
            0,
            Opcode::StoreLocal as u8,
            0,
            Opcode::Ret as u8,
        ];
        assert_eq!(image.code, expected);
    }

    #[test]
    fn test_call_api_encoding() {
        let m = module(
            vec![simple_func(
                "init",
                vec![
                    Instr::call_api("info", 1),
                    Instr::call_api("noSuchMethod", 2),
                    Instr::new(Opcode::Ret),
                ],
            )],
            vec![],
        );
        let image = generate(&m, &[]).unwrap();
        let info_idx = caps::api_index("info");
        assert_eq!(
            &image.code[1..7],
            &[
                Opcode::CallApi as u8,
                info_idx,
                1,
                Opcode::CallApi as u8,
                caps::API_UNKNOWN,
                2,
            ]
        );
    }

    #[test]
    fn test_command_stub_layout() {
        let m = module(
            vec![
                simple_func("init", vec![Instr::new(Opcode::Ret)]),
                simple_func("doHi", vec![Instr::new(Opcode::Ret)]),
            ],
            vec!["hi", "hi [name]", "greet", "misc"],
        );
        let cmd = CommandDef {
            name: "hi".into(),
            syntax: "hi [name]".into(),
            description: "greet".into(),
            category: "misc".into(),
            handler: Some("doHi".into()),
            span: Span::default(),
        };
        let image = generate(&m, &[cmd]).unwrap();
        let blob = image.string_blob();
        let stub = &image.data[blob.len()..];
        assert_eq!(stub.len(), 20);
        let words: Vec<u32> = stub
            .chunks(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(words[0], 0); // "hi"
        assert_eq!(words[1], 3); // "hi [name]"
        assert_eq!(words[4], image.function_offset("doHi").unwrap());
    }

    #[test]
    fn test_unknown_local_warns_and_uses_slot_zero() {
        let m = module(
            vec![simple_func(
                "init",
                vec![Instr::load_local("phantom"), Instr::new(Opcode::Ret)],
            )],
            vec![],
        );
        let image = generate(&m, &[]).unwrap();
        assert_eq!(image.code[2], 0);
        assert_eq!(image.warnings.len(), 1);
    }
}
