//! Intermediate representation.
//!
//! A flat, tagged instruction list over the stack machine's closed
//! opcode set. Branch targets are carried exclusively as symbolic
//! labels through the IR; byte addresses exist only after the code
//! generator resolves fixups (numeric `addr` operands appear in the IR
//! only when a caller already knows an absolute target). String
//! immediates are carried by content; table offsets are assigned at
//! emission time.

pub mod lower;

use serde::Serialize;
use std::fmt;

/// Opcode numbering for the stack VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Opcode {
    /// No operation; one is emitted at every function entry.
    Nop = 0x00,
    /// Halt execution.
    Halt = 0x01,
    /// Push a 32-bit immediate (or a string-table offset).
    Push = 0x02,
    /// Push a string-table offset.
    PushStr = 0x03,
    /// Push an argument by index.
    PushArg = 0x04,
    /// Discard the top of stack.
    Pop = 0x05,
    /// Duplicate the top of stack.
    Dup = 0x06,
    /// Push a local by slot index.
    LoadLocal = 0x07,
    /// Pop the top of stack into a local slot.
    StoreLocal = 0x08,
    // Arithmetic
    Add = 0x09,
    Sub = 0x0A,
    Mul = 0x0B,
    /// Floor division.
    Div = 0x0C,
    /// Floor modulus.
    Mod = 0x0D,
    Neg = 0x0E,
    // Bitwise (32-bit two's complement)
    And = 0x0F,
    Or = 0x10,
    Xor = 0x11,
    Not = 0x12,
    Shl = 0x13,
    /// Logical (zero-fill) shift right.
    Shr = 0x14,
    // Control flow
    Jmp = 0x15,
    Jz = 0x16,
    Jnz = 0x17,
    /// Call a module function through a fixup on its name.
    Call = 0x18,
    /// Call a host-API method by table index.
    CallApi = 0x19,
    Ret = 0x1A,
}

impl Opcode {
    /// Convert from u8, returning None for invalid opcodes.
    pub fn from_u8(val: u8) -> Option<Self> {
        if val <= 0x1A {
            Some(unsafe { std::mem::transmute::<u8, Opcode>(val) })
        } else {
            None
        }
    }

    /// Get the mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Halt => "halt",
            Opcode::Push => "push",
            Opcode::PushStr => "push.str",
            Opcode::PushArg => "push.arg",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::LoadLocal => "load.local",
            Opcode::StoreLocal => "store.local",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Neg => "neg",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Call => "call",
            Opcode::CallApi => "call.api",
            Opcode::Ret => "ret",
        }
    }

    /// Binary arithmetic/bitwise opcodes eligible for constant folding.
    pub fn is_foldable_binop(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::Shr
        )
    }
}

/// An immediate operand: a number or a string identified by content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Imm {
    Int(i64),
    Str(String),
}

/// One IR instruction: an opcode plus the optional fields the opcode
/// uses. Unused fields stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instr {
    pub op: Opcode,
    /// Immediate for `Push`/`PushStr`/`PushArg`/`StoreLocal`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Imm>,
    /// Local name for `LoadLocal`/`StoreLocal`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Symbolic branch target for `Jmp`/`Jz`/`Jnz`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Absolute branch target, when already known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<u32>,
    /// Callee name for `Call`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    /// Host-API method for `CallApi`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Argument count for `Call`/`CallApi`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argc: Option<u8>,
}

impl Instr {
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            value: None,
            name: None,
            label: None,
            addr: None,
            func: None,
            method: None,
            argc: None,
        }
    }

    pub fn push_int(value: i64) -> Self {
        Self {
            value: Some(Imm::Int(value)),
            ..Self::new(Opcode::Push)
        }
    }

    pub fn push_imm(value: Imm) -> Self {
        Self {
            value: Some(value),
            ..Self::new(Opcode::Push)
        }
    }

    pub fn push_str(text: impl Into<String>) -> Self {
        Self {
            value: Some(Imm::Str(text.into())),
            ..Self::new(Opcode::PushStr)
        }
    }

    pub fn load_local(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(Opcode::LoadLocal)
        }
    }

    pub fn store_local(name: impl Into<String>, value: Imm) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value),
            ..Self::new(Opcode::StoreLocal)
        }
    }

    pub fn call(func: impl Into<String>, argc: u8) -> Self {
        Self {
            func: Some(func.into()),
            argc: Some(argc),
            ..Self::new(Opcode::Call)
        }
    }

    pub fn call_api(method: impl Into<String>, argc: u8) -> Self {
        Self {
            method: Some(method.into()),
            argc: Some(argc),
            ..Self::new(Opcode::CallApi)
        }
    }

    /// Integer immediate, when present.
    pub fn int_value(&self) -> Option<i64> {
        match &self.value {
            Some(Imm::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op.mnemonic())?;
        match &self.value {
            Some(Imm::Int(v)) => write!(f, " {v}")?,
            Some(Imm::Str(s)) => write!(f, " {s:?}")?,
            None => {}
        }
        if let Some(name) = &self.name {
            write!(f, " %{name}")?;
        }
        if let Some(label) = &self.label {
            write!(f, " @{label}")?;
        } else if let Some(addr) = self.addr {
            write!(f, " 0x{addr:08x}")?;
        }
        if let Some(func) = &self.func {
            write!(f, " {func}")?;
        }
        if let Some(method) = &self.method {
            write!(f, " {method}")?;
        }
        if let Some(argc) = self.argc {
            write!(f, ", {argc}")?;
        }
        Ok(())
    }
}

/// A lowered function.
#[derive(Debug, Clone, Serialize)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<String>,
    /// Local names in insertion order. The same name declared twice
    /// keeps both slots; references bind to the latest index.
    pub locals: Vec<String>,
    pub instrs: Vec<Instr>,
    pub is_init: bool,
    pub is_exit: bool,
}

impl IrFunction {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        let name = name.into();
        let is_init = name == "init";
        let is_exit = name == "exit";
        Self {
            name,
            params,
            locals: Vec::new(),
            instrs: Vec::new(),
            is_init,
            is_exit,
        }
    }

    /// Slot index of a local; the latest declaration wins.
    pub fn local_index(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .rposition(|l| l == name)
            .map(|i| i as u8)
    }

    /// Render an assembler-style listing of this function.
    pub fn listing(&self) -> String {
        let mut out = format!("{}:\n", self.name);
        for ins in &self.instrs {
            out.push_str(&format!("    {ins}\n"));
        }
        out
    }
}

/// A lowered module: functions in extraction order plus the string
/// table populated during lowering. Strings are recorded per use; the
/// optimizer's dedup pass uniquifies the list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub strings: Vec<String>,
}

impl IrModule {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.instrs.len()).sum()
    }
}
