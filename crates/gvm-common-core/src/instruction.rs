//! Instruction format and opcodes.

use std::fmt;

/// Number of instructions following `GOROUTINE` that form the spawned call
/// sequence (`CALL`, `SYS_CALL done`). The new thread starts on the first of
/// them; the spawning thread resumes after the last.
pub const GO_CALL_SEQUENCE: usize = 2;

/// Label stored in the `__label` slot of a special frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameLabel {
    Call,
    For,
}

impl FrameLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameLabel::Call => "CALL",
            FrameLabel::For => "FOR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CALL" => Some(FrameLabel::Call),
            "FOR" => Some(FrameLabel::For),
            _ => None,
        }
    }
}

impl fmt::Display for FrameLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal operand of `LDC`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constant {
    Nil,
    Bool(bool),
    Int(i64),
    String(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => f.write_str("nil"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// Declared type of a variable, as far as the VM cares: it only needs the
/// zero value. Every reference-like type (pointers, funcs, chans) is nil.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    String,
    /// Pointer, function or channel type; keeps the source spelling.
    Ref(String),
}

impl ValueType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(ValueType::Bool),
            "int" => Some(ValueType::Int),
            "string" => Some(ValueType::String),
            _ if name.starts_with('*') || name.starts_with("func") || name.starts_with("chan") => {
                Some(ValueType::Ref(name.to_string()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::String => f.write_str("string"),
            ValueType::Ref(name) => f.write_str(name),
        }
    }
}

/// Operators of the `ALU` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    // Logic
    Not,
    And,
    Or,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Pointers
    AddrOf,
    Deref,
}

impl AluOp {
    const ALL: [AluOp; 17] = [
        AluOp::Add,
        AluOp::Sub,
        AluOp::Mul,
        AluOp::Div,
        AluOp::Mod,
        AluOp::Neg,
        AluOp::Not,
        AluOp::And,
        AluOp::Or,
        AluOp::Eq,
        AluOp::Ne,
        AluOp::Lt,
        AluOp::Le,
        AluOp::Gt,
        AluOp::Ge,
        AluOp::AddrOf,
        AluOp::Deref,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Sub => "SUB",
            AluOp::Mul => "MUL",
            AluOp::Div => "DIV",
            AluOp::Mod => "MOD",
            AluOp::Neg => "NEG",
            AluOp::Not => "NOT",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Eq => "EQ",
            AluOp::Ne => "NE",
            AluOp::Lt => "LT",
            AluOp::Le => "LE",
            AluOp::Gt => "GT",
            AluOp::Ge => "GE",
            AluOp::AddrOf => "ADDR",
            AluOp::Deref => "DEREF",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Number of operands popped from the operand stack.
    pub fn arity(&self) -> usize {
        match self {
            AluOp::Neg | AluOp::Not | AluOp::AddrOf | AluOp::Deref => 1,
            _ => 2,
        }
    }
}

/// Operations reached through `SYS_CALL`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SysCall {
    /// Push the zero value of a type.
    Make(ValueType),
    /// Push a pointer to a fresh zero-valued cell.
    New(ValueType),
    /// Push a closure over the current scope entering at the given pc.
    MakeLambda(usize),
    /// Pop and print this many values.
    Print(usize),
    /// Print the current operand stack.
    PrintOs,
    /// Print every live heap record.
    PrintHeap,
    Breakpoint,
    /// Give up the rest of the time slice.
    Yield,
    Done,
}

impl SysCall {
    pub fn name(&self) -> &'static str {
        match self {
            SysCall::Make(_) => "make",
            SysCall::New(_) => "new",
            SysCall::MakeLambda(_) => "makeLambda",
            SysCall::Print(_) => "print",
            SysCall::PrintOs => "printOS",
            SysCall::PrintHeap => "printHeap",
            SysCall::Breakpoint => "breakpoint",
            SysCall::Yield => "yield",
            SysCall::Done => "done",
        }
    }
}

/// How `EXIT_SCOPE` leaves the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeExit {
    /// Drop the innermost (ordinary) frame.
    Frame,
    /// Unwind to the nearest special frame with this label and resume its
    /// continuation (`return` for CALL, loop exit / `break` for FOR).
    Unwind(FrameLabel),
    /// Unwind to the nearest FOR frame, keep it, and jump to the given pc.
    Continue(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Ldc,
    Decl,
    Pop,
    Jof,
    Goto,
    EnterScope,
    ExitScope,
    Ld,
    Assign,
    Call,
    Alu,
    TestAndSet,
    Goroutine,
    SysCall,
    Reset,
    Clear,
}

impl Opcode {
    const ALL: [Opcode; 17] = [
        Opcode::Nop,
        Opcode::Ldc,
        Opcode::Decl,
        Opcode::Pop,
        Opcode::Jof,
        Opcode::Goto,
        Opcode::EnterScope,
        Opcode::ExitScope,
        Opcode::Ld,
        Opcode::Assign,
        Opcode::Call,
        Opcode::Alu,
        Opcode::TestAndSet,
        Opcode::Goroutine,
        Opcode::SysCall,
        Opcode::Reset,
        Opcode::Clear,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Ldc => "LDC",
            Opcode::Decl => "DECL",
            Opcode::Pop => "POP",
            Opcode::Jof => "JOF",
            Opcode::Goto => "GOTO",
            Opcode::EnterScope => "ENTER_SCOPE",
            Opcode::ExitScope => "EXIT_SCOPE",
            Opcode::Ld => "LD",
            Opcode::Assign => "ASSIGN",
            Opcode::Call => "CALL",
            Opcode::Alu => "ALU",
            Opcode::TestAndSet => "TEST_AND_SET",
            Opcode::Goroutine => "GOROUTINE",
            Opcode::SysCall => "SYS_CALL",
            Opcode::Reset => "RESET",
            Opcode::Clear => "CLEAR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One VM instruction. Jump targets are absolute indices into the
/// instruction array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Ldc(Constant),
    Decl { sym: String, ty: ValueType },
    Pop,
    Jof(usize),
    Goto(usize),
    /// Push a frame declaring `decls`; with `for_exit` the frame is a FOR
    /// special frame whose continuation resumes at that pc.
    EnterScope { decls: Vec<String>, for_exit: Option<usize> },
    ExitScope(ScopeExit),
    Ld(String),
    Assign,
    Call,
    Alu(AluOp),
    TestAndSet,
    Goroutine(usize),
    SysCall(SysCall),
    Reset,
    Clear,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Ldc(_) => Opcode::Ldc,
            Instruction::Decl { .. } => Opcode::Decl,
            Instruction::Pop => Opcode::Pop,
            Instruction::Jof(_) => Opcode::Jof,
            Instruction::Goto(_) => Opcode::Goto,
            Instruction::EnterScope { .. } => Opcode::EnterScope,
            Instruction::ExitScope(_) => Opcode::ExitScope,
            Instruction::Ld(_) => Opcode::Ld,
            Instruction::Assign => Opcode::Assign,
            Instruction::Call => Opcode::Call,
            Instruction::Alu(_) => Opcode::Alu,
            Instruction::TestAndSet => Opcode::TestAndSet,
            Instruction::Goroutine(_) => Opcode::Goroutine,
            Instruction::SysCall(_) => Opcode::SysCall,
            Instruction::Reset => Opcode::Reset,
            Instruction::Clear => Opcode::Clear,
        }
    }

    /// Jump target encoded in the instruction, if any.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Instruction::Jof(pc) | Instruction::Goto(pc) => Some(*pc),
            Instruction::EnterScope { for_exit, .. } => *for_exit,
            Instruction::ExitScope(ScopeExit::Continue(pc)) => Some(*pc),
            Instruction::SysCall(SysCall::MakeLambda(pc)) => Some(*pc),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode().name();
        match self {
            Instruction::Ldc(c) => write!(f, "{} {}", op, c),
            Instruction::Decl { sym, ty } => write!(f, "{} {} {}", op, sym, ty),
            Instruction::Jof(pc) | Instruction::Goto(pc) => write!(f, "{} {}", op, pc),
            Instruction::EnterScope { decls, for_exit } => {
                write!(f, "{} [{}]", op, decls.join(", "))?;
                if let Some(exit) = for_exit {
                    write!(f, " FOR {}", exit)?;
                }
                Ok(())
            }
            Instruction::ExitScope(exit) => match exit {
                ScopeExit::Frame => f.write_str(op),
                ScopeExit::Unwind(label) => write!(f, "{} {}", op, label),
                ScopeExit::Continue(pc) => write!(f, "{} CONTINUE {}", op, pc),
            },
            Instruction::Ld(sym) => write!(f, "{} {}", op, sym),
            Instruction::Alu(alu) => write!(f, "{} {}", op, alu.name()),
            Instruction::Goroutine(argc) => write!(f, "{} {}", op, argc),
            Instruction::SysCall(call) => {
                write!(f, "{} {}", op, call.name())?;
                match call {
                    SysCall::Make(ty) | SysCall::New(ty) => write!(f, " {}", ty),
                    SysCall::MakeLambda(pc) => write!(f, " {}", pc),
                    SysCall::Print(argc) => write!(f, " {}", argc),
                    _ => Ok(()),
                }
            }
            _ => f.write_str(op),
        }
    }
}
