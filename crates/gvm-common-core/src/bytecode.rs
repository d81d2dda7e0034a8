//! Compiled file container, listing and assembler.
//!
//! A `CompiledFile` is what the external compiler hands to the VM: a flat,
//! zero-indexed instruction array plus symbolic label tables. The assembler
//! accepts the same one-instruction-per-line text that `Instruction`'s
//! `Display` produces, with two conveniences:
//!
//! ```text
//! ; comment lines start with a semicolon
//! loop:                ; defines label `loop` at the next instruction
//!     LD i
//!     JOF @done        ; any jump operand may name a label
//!     GOTO @loop
//! done:
//!     SYS_CALL done
//! ```

use indexmap::IndexMap;
use thiserror::Error;

use crate::instruction::{AluOp, Constant, FrameLabel, Instruction, Opcode, ScopeExit, SysCall, ValueType};

/// Label name -> instruction index, in definition order.
pub type LabelMap = IndexMap<String, usize>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("line {line}: unknown opcode `{name}`")]
    UnknownOpcode { line: usize, name: String },
    #[error("line {line}: unknown sys call `{name}`")]
    UnknownSysCall { line: usize, name: String },
    #[error("line {line}: unknown ALU operator `{name}`")]
    UnknownAluOp { line: usize, name: String },
    #[error("line {line}: unknown type `{name}`")]
    UnknownType { line: usize, name: String },
    #[error("line {line}: malformed operand: {msg}")]
    BadOperand { line: usize, msg: String },
    #[error("line {line}: undefined label `{name}`")]
    UndefinedLabel { line: usize, name: String },
    #[error("line {line}: duplicate label `{name}`")]
    DuplicateLabel { line: usize, name: String },
    #[error("line {line}: jump target {target} is past the end of the file")]
    TargetOutOfRange { line: usize, target: usize },
}

/// Output of the external compiler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledFile {
    pub instructions: Vec<Instruction>,
    /// Function and block labels.
    pub label_map: LabelMap,
    /// Targets of source-level `goto` statements.
    pub goto_label_map: LabelMap,
}

impl CompiledFile {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            label_map: LabelMap::new(),
            goto_label_map: LabelMap::new(),
        }
    }

    #[inline]
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Resolve a label from either table.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.label_map
            .get(name)
            .or_else(|| self.goto_label_map.get(name))
            .copied()
    }

    /// Numbered listing, labels on their own lines.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (pc, inst) in self.instructions.iter().enumerate() {
            for (name, _) in self.label_map.iter().filter(|(_, at)| **at == pc) {
                out.push_str(&format!("{}:\n", name));
            }
            out.push_str(&format!("{:>5}  {}\n", pc, inst));
        }
        out
    }

    /// Assemble a text listing.
    pub fn parse(source: &str) -> Result<Self, BytecodeError> {
        let mut label_map = LabelMap::new();
        let mut lines: Vec<(usize, &str)> = Vec::new();

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let text = strip_comment(raw.trim());
            if text.is_empty() {
                continue;
            }
            if let Some(name) = text.strip_suffix(':') {
                if !is_identifier(name) {
                    return Err(BytecodeError::BadOperand {
                        line,
                        msg: format!("invalid label name `{}`", name),
                    });
                }
                if label_map.insert(name.to_string(), lines.len()).is_some() {
                    return Err(BytecodeError::DuplicateLabel { line, name: name.to_string() });
                }
                continue;
            }
            lines.push((line, text));
        }

        let instructions = lines
            .iter()
            .map(|&(line, text)| LineParser { line, labels: &label_map }.instruction(text))
            .collect::<Result<Vec<_>, _>>()?;

        // A target equal to the length is the end of the file.
        let end = instructions.len();
        for (&(line, _), inst) in lines.iter().zip(&instructions) {
            if let Some(target) = inst.jump_target().filter(|&t| t > end) {
                return Err(BytecodeError::TargetOutOfRange { line, target });
            }
        }

        Ok(Self {
            instructions,
            label_map,
            goto_label_map: LabelMap::new(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Drop a trailing `; comment` that is not inside a string literal.
fn strip_comment(text: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => return text[..i].trim_end(),
            _ => {}
        }
    }
    text
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim()),
        None => (text, ""),
    }
}

struct LineParser<'a> {
    line: usize,
    labels: &'a LabelMap,
}

impl LineParser<'_> {
    fn instruction(&self, text: &str) -> Result<Instruction, BytecodeError> {
        let (name, rest) = split_word(text);
        let op = Opcode::from_name(name).ok_or_else(|| BytecodeError::UnknownOpcode {
            line: self.line,
            name: name.to_string(),
        })?;

        let inst = match op {
            Opcode::Ldc => Instruction::Ldc(self.constant(rest)?),
            Opcode::Decl => {
                let (sym, ty) = split_word(rest);
                Instruction::Decl {
                    sym: self.symbol(sym)?,
                    ty: self.value_type(ty)?,
                }
            }
            Opcode::Jof => Instruction::Jof(self.target(rest)?),
            Opcode::Goto => Instruction::Goto(self.target(rest)?),
            Opcode::EnterScope => self.enter_scope(rest)?,
            Opcode::ExitScope => Instruction::ExitScope(self.scope_exit(rest)?),
            Opcode::Ld => Instruction::Ld(self.symbol(rest)?),
            Opcode::Alu => Instruction::Alu(AluOp::from_name(rest).ok_or_else(|| {
                BytecodeError::UnknownAluOp { line: self.line, name: rest.to_string() }
            })?),
            Opcode::Goroutine => Instruction::Goroutine(self.count(rest)?),
            Opcode::SysCall => Instruction::SysCall(self.sys_call(rest)?),
            Opcode::Nop | Opcode::Pop | Opcode::Assign | Opcode::Call | Opcode::TestAndSet
            | Opcode::Reset | Opcode::Clear => {
                self.no_operand(rest)?;
                match op {
                    Opcode::Nop => Instruction::Nop,
                    Opcode::Pop => Instruction::Pop,
                    Opcode::Assign => Instruction::Assign,
                    Opcode::Call => Instruction::Call,
                    Opcode::TestAndSet => Instruction::TestAndSet,
                    Opcode::Reset => Instruction::Reset,
                    _ => Instruction::Clear,
                }
            }
        };
        Ok(inst)
    }

    fn bad(&self, msg: impl Into<String>) -> BytecodeError {
        BytecodeError::BadOperand { line: self.line, msg: msg.into() }
    }

    fn no_operand(&self, rest: &str) -> Result<(), BytecodeError> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(self.bad(format!("unexpected operand `{}`", rest)))
        }
    }

    fn symbol(&self, text: &str) -> Result<String, BytecodeError> {
        if text.is_empty() || text.contains(char::is_whitespace) {
            return Err(self.bad(format!("expected a symbol, got `{}`", text)));
        }
        Ok(text.to_string())
    }

    fn count(&self, text: &str) -> Result<usize, BytecodeError> {
        text.parse::<usize>()
            .map_err(|_| self.bad(format!("expected a count, got `{}`", text)))
    }

    fn target(&self, text: &str) -> Result<usize, BytecodeError> {
        if let Some(name) = text.strip_prefix('@') {
            return self.labels.get(name).copied().ok_or_else(|| BytecodeError::UndefinedLabel {
                line: self.line,
                name: name.to_string(),
            });
        }
        text.parse::<usize>()
            .map_err(|_| self.bad(format!("expected a jump target, got `{}`", text)))
    }

    fn value_type(&self, text: &str) -> Result<ValueType, BytecodeError> {
        ValueType::from_name(text).ok_or_else(|| BytecodeError::UnknownType {
            line: self.line,
            name: text.to_string(),
        })
    }

    fn constant(&self, text: &str) -> Result<Constant, BytecodeError> {
        match text {
            "nil" => return Ok(Constant::Nil),
            "true" => return Ok(Constant::Bool(true)),
            "false" => return Ok(Constant::Bool(false)),
            _ => {}
        }
        if let Some(body) = text.strip_prefix('"') {
            return self.string_literal(body).map(Constant::String);
        }
        text.parse::<i64>()
            .map(Constant::Int)
            .map_err(|_| self.bad(format!("expected a literal, got `{}`", text)))
    }

    /// `body` is everything after the opening quote.
    fn string_literal(&self, body: &str) -> Result<String, BytecodeError> {
        let mut out = String::new();
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    if chars.as_str().is_empty() {
                        return Ok(out);
                    }
                    return Err(self.bad("trailing characters after string literal"));
                }
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    other => return Err(self.bad(format!("invalid escape `\\{}`", other.unwrap_or(' ')))),
                },
                c => out.push(c),
            }
        }
        Err(self.bad("unterminated string literal"))
    }

    fn enter_scope(&self, text: &str) -> Result<Instruction, BytecodeError> {
        let inner = text
            .strip_prefix('[')
            .ok_or_else(|| self.bad("expected `[` before declarations"))?;
        let close = inner.find(']').ok_or_else(|| self.bad("missing `]`"))?;
        let decls = inner[..close]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| self.symbol(s))
            .collect::<Result<Vec<_>, _>>()?;

        let tail = inner[close + 1..].trim();
        let for_exit = if tail.is_empty() {
            None
        } else {
            let (kw, target) = split_word(tail);
            if kw != FrameLabel::For.as_str() {
                return Err(self.bad(format!("expected `FOR`, got `{}`", kw)));
            }
            Some(self.target(target)?)
        };
        Ok(Instruction::EnterScope { decls, for_exit })
    }

    fn scope_exit(&self, text: &str) -> Result<ScopeExit, BytecodeError> {
        let (kw, operand) = split_word(text);
        match kw {
            "" => Ok(ScopeExit::Frame),
            "CONTINUE" => Ok(ScopeExit::Continue(self.target(operand)?)),
            _ => {
                self.no_operand(operand)?;
                FrameLabel::from_name(kw)
                    .map(ScopeExit::Unwind)
                    .ok_or_else(|| self.bad(format!("unknown frame label `{}`", kw)))
            }
        }
    }

    fn sys_call(&self, text: &str) -> Result<SysCall, BytecodeError> {
        let (name, operand) = split_word(text);
        let call = match name {
            "make" => SysCall::Make(self.value_type(operand)?),
            "new" => SysCall::New(self.value_type(operand)?),
            "makeLambda" => SysCall::MakeLambda(self.target(operand)?),
            "print" if operand.is_empty() => SysCall::Print(1),
            "print" => SysCall::Print(self.count(operand)?),
            "printOS" | "printHeap" | "breakpoint" | "yield" | "done" => {
                self.no_operand(operand)?;
                match name {
                    "printOS" => SysCall::PrintOs,
                    "printHeap" => SysCall::PrintHeap,
                    "breakpoint" => SysCall::Breakpoint,
                    "yield" => SysCall::Yield,
                    _ => SysCall::Done,
                }
            }
            _ => {
                return Err(BytecodeError::UnknownSysCall {
                    line: self.line,
                    name: name.to_string(),
                })
            }
        };
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_with_labels() {
        let file = CompiledFile::parse(
            r#"
            ; counts down from 3
            ENTER_SCOPE [i]
            LDC 3
            LD i
            ASSIGN
            loop:
            LD i
            JOF @end
            GOTO @loop
            end:
            SYS_CALL done
            "#,
        )
        .unwrap();

        assert_eq!(file.len(), 8);
        assert_eq!(file.label("loop"), Some(4));
        assert_eq!(file.label("end"), Some(7));
        assert_eq!(file.instructions[5], Instruction::Jof(7));
        assert_eq!(file.instructions[6], Instruction::Goto(4));
        assert_eq!(file.instructions[7], Instruction::SysCall(SysCall::Done));
    }

    #[test]
    fn test_parse_operands() {
        let file = CompiledFile::parse(
            r#"
            LDC "hello; world"   ; trailing comment
            LDC -42
            LDC nil
            DECL p *int
            DECL c chan int
            ENTER_SCOPE [] FOR 12
            EXIT_SCOPE CONTINUE 3
            EXIT_SCOPE FOR
            ALU DEREF
            SYS_CALL new int
            SYS_CALL makeLambda 5
            SYS_CALL print
            "#,
        )
        .unwrap();

        assert_eq!(
            file.instructions,
            vec![
                Instruction::Ldc(Constant::String("hello; world".into())),
                Instruction::Ldc(Constant::Int(-42)),
                Instruction::Ldc(Constant::Nil),
                Instruction::Decl { sym: "p".into(), ty: ValueType::Ref("*int".into()) },
                Instruction::Decl { sym: "c".into(), ty: ValueType::Ref("chan int".into()) },
                Instruction::EnterScope { decls: vec![], for_exit: Some(12) },
                Instruction::ExitScope(ScopeExit::Continue(3)),
                Instruction::ExitScope(ScopeExit::Unwind(FrameLabel::For)),
                Instruction::Alu(AluOp::Deref),
                Instruction::SysCall(SysCall::New(ValueType::Int)),
                Instruction::SysCall(SysCall::MakeLambda(5)),
                Instruction::SysCall(SysCall::Print(1)),
            ]
        );
    }

    #[test]
    fn test_display_reparses() {
        let original = vec![
            Instruction::Ldc(Constant::String("tab\there \"q\"".into())),
            Instruction::EnterScope { decls: vec!["a".into(), "b".into()], for_exit: None },
            Instruction::ExitScope(ScopeExit::Frame),
            Instruction::Goroutine(2),
            Instruction::SysCall(SysCall::Make(ValueType::String)),
            Instruction::TestAndSet,
        ];
        let text: String = original.iter().map(|i| format!("{}\n", i)).collect();
        assert_eq!(CompiledFile::parse(&text).unwrap().instructions, original);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            CompiledFile::parse("NOP\nJUMP 3"),
            Err(BytecodeError::UnknownOpcode { line: 2, name: "JUMP".into() })
        );
        assert_eq!(
            CompiledFile::parse("SYS_CALL fork"),
            Err(BytecodeError::UnknownSysCall { line: 1, name: "fork".into() })
        );
        assert_eq!(
            CompiledFile::parse("GOTO @nowhere"),
            Err(BytecodeError::UndefinedLabel { line: 1, name: "nowhere".into() })
        );
        assert_eq!(
            CompiledFile::parse("a:\nNOP\na:\nNOP"),
            Err(BytecodeError::DuplicateLabel { line: 3, name: "a".into() })
        );
        assert!(matches!(CompiledFile::parse("POP 1"), Err(BytecodeError::BadOperand { line: 1, .. })));
        assert!(matches!(CompiledFile::parse("LDC \"open"), Err(BytecodeError::BadOperand { .. })));
        assert!(matches!(CompiledFile::parse("DECL x float64"), Err(BytecodeError::UnknownType { .. })));
    }

    #[test]
    fn test_label_with_trailing_comment() {
        let file = CompiledFile::parse(
            r#"
            ; comment lines start with a semicolon
            loop:                ; defines label `loop` at the next instruction
                LD i
                JOF @done        ; any jump operand may name a label
                GOTO @loop
            done:
                SYS_CALL done
            "#,
        )
        .unwrap();

        assert_eq!(file.label("loop"), Some(0));
        assert_eq!(file.label("done"), Some(3));
        assert_eq!(
            file.instructions,
            vec![
                Instruction::Ld("i".into()),
                Instruction::Jof(3),
                Instruction::Goto(0),
                Instruction::SysCall(SysCall::Done),
            ]
        );
    }

    #[test]
    fn test_target_out_of_range() {
        assert!(CompiledFile::parse("NOP\nGOTO 2").is_ok());
        assert_eq!(
            CompiledFile::parse("NOP\nJOF 3"),
            Err(BytecodeError::TargetOutOfRange { line: 2, target: 3 })
        );
        assert_eq!(
            CompiledFile::parse("; lambda\nSYS_CALL makeLambda 9\nNOP"),
            Err(BytecodeError::TargetOutOfRange { line: 2, target: 9 })
        );
    }

    #[test]
    fn test_listing() {
        let file = CompiledFile::parse("start:\nLDC 1\nPOP").unwrap();
        assert_eq!(file.listing(), "start:\n    0  LDC 1\n    1  POP\n");
    }
}
