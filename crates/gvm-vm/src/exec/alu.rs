//! ALU instructions: arithmetic, logic, comparison, ADDR and DEREF.
//!
//! Binary operators pop the left operand first, then the right.

use std::cmp::Ordering;

use gvm_common_core::AluOp;
use gvm_runtime::{Addr, HeapValue, Memory, RuntimeError, NULL_ADDR};

use crate::fiber::Fiber;
use crate::vm::VmError;

pub fn exec_alu(fiber: &mut Fiber, mem: &mut Memory, op: AluOp) -> Result<(), VmError> {
    let result = match op {
        AluOp::AddrOf => {
            let target = fiber.pop(mem)?;
            mem.alloc(&HeapValue::pointer(target))?
        }
        AluOp::Deref => {
            let ptr = fiber.pop(mem)?;
            deref(mem, ptr)?
        }
        _ if op.arity() == 1 => {
            let operand = fiber.pop(mem)?;
            let value = unary(op, mem.load(operand)?)?;
            mem.alloc(&value)?
        }
        _ => {
            let left = fiber.pop(mem)?;
            let right = fiber.pop(mem)?;
            let value = binary(op, mem.load(left)?, mem.load(right)?)?;
            mem.alloc(&value)?
        }
    };
    fiber.push(mem, result)
}

/// Target of the pointer cell at `ptr`.
pub(crate) fn deref(mem: &Memory, ptr: Addr) -> Result<Addr, VmError> {
    let (target, _) = mem.get_pair(ptr)?;
    if target == NULL_ADDR {
        return Err(RuntimeError::NilDereference.into());
    }
    Ok(target)
}

fn unsupported(op: AluOp, operands: &[&HeapValue]) -> VmError {
    let kinds: Vec<&str> = operands.iter().map(|v| v.kind().name()).collect();
    VmError::UnsupportedOperand {
        op: op.name(),
        kinds: kinds.join(", "),
    }
}

fn unary(op: AluOp, v: HeapValue) -> Result<HeapValue, VmError> {
    match (op, &v) {
        (AluOp::Neg, HeapValue::Int(i)) => Ok(HeapValue::Int(-i)),
        (AluOp::Not, HeapValue::Bool(b)) => Ok(HeapValue::Bool(!b)),
        _ => Err(unsupported(op, &[&v])),
    }
}

fn binary(op: AluOp, l: HeapValue, r: HeapValue) -> Result<HeapValue, VmError> {
    use HeapValue::{Bool, Int};

    let value = match (op, &l, &r) {
        (AluOp::Add, Int(a), Int(b)) => Int(a + b),
        (AluOp::Add, HeapValue::String(a), HeapValue::String(b)) => HeapValue::String(format!("{}{}", a, b)),
        (AluOp::Sub, Int(a), Int(b)) => Int(a - b),
        (AluOp::Mul, Int(a), Int(b)) => Int(a * b),
        (AluOp::Div | AluOp::Mod, Int(_), Int(0)) => return Err(VmError::DivisionByZero),
        (AluOp::Div, Int(a), Int(b)) => Int(a / b),
        (AluOp::Mod, Int(a), Int(b)) => Int(a % b),
        (AluOp::And, Bool(a), Bool(b)) => Bool(*a && *b),
        (AluOp::Or, Bool(a), Bool(b)) => Bool(*a || *b),
        (AluOp::Eq | AluOp::Ne, _, _) if l.kind() == r.kind() => Bool((l == r) == (op == AluOp::Eq)),
        (AluOp::Lt | AluOp::Le | AluOp::Gt | AluOp::Ge, _, _) => {
            let ord = match (&l, &r) {
                (Int(a), Int(b)) => a.cmp(b),
                (HeapValue::String(a), HeapValue::String(b)) => a.cmp(b),
                _ => return Err(unsupported(op, &[&l, &r])),
            };
            Bool(compare(op, ord))
        }
        _ => return Err(unsupported(op, &[&l, &r])),
    };
    Ok(value)
}

fn compare(op: AluOp, ord: Ordering) -> bool {
    match op {
        AluOp::Lt => ord == Ordering::Less,
        AluOp::Le => ord != Ordering::Greater,
        AluOp::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::MAIN_FIBER;
    use gvm_runtime::MAX_INT;
    use pretty_assertions::assert_eq;

    /// Push `right` then `left` and apply `op`.
    fn run(op: AluOp, left: HeapValue, right: Option<HeapValue>) -> Result<HeapValue, VmError> {
        let mut mem = Memory::new(256, None).unwrap();
        let mut fiber = Fiber::new(MAIN_FIBER, 0, NULL_ADDR, NULL_ADDR);
        if let Some(right) = right {
            let r = mem.alloc(&right).unwrap();
            fiber.push(&mut mem, r).unwrap();
        }
        let l = mem.alloc(&left).unwrap();
        fiber.push(&mut mem, l).unwrap();
        exec_alu(&mut fiber, &mut mem, op)?;
        let top = fiber.pop(&mem).unwrap();
        Ok(mem.load(top).unwrap())
    }

    fn int(op: AluOp, a: i64, b: i64) -> Result<HeapValue, VmError> {
        run(op, HeapValue::Int(a), Some(HeapValue::Int(b)))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(int(AluOp::Add, 1, 6), Ok(HeapValue::Int(7)));
        assert_eq!(int(AluOp::Sub, 1, 6), Ok(HeapValue::Int(-5)));
        assert_eq!(int(AluOp::Mul, -3, 6), Ok(HeapValue::Int(-18)));
        assert_eq!(int(AluOp::Div, -7, 2), Ok(HeapValue::Int(-3)));
        assert_eq!(int(AluOp::Mod, -7, 2), Ok(HeapValue::Int(-1)));
        assert_eq!(run(AluOp::Neg, HeapValue::Int(4), None), Ok(HeapValue::Int(-4)));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(int(AluOp::Div, 1, 0), Err(VmError::DivisionByZero));
        assert_eq!(int(AluOp::Mod, 1, 0), Err(VmError::DivisionByZero));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            int(AluOp::Add, MAX_INT, 1),
            Err(VmError::Runtime(RuntimeError::IntOutOfRange(MAX_INT + 1)))
        );
    }

    #[test]
    fn test_strings() {
        let s = |v: &str| HeapValue::String(v.to_string());
        assert_eq!(run(AluOp::Add, s("foo"), Some(s("barbaz"))), Ok(s("foobarbaz")));
        assert_eq!(run(AluOp::Lt, s("abc"), Some(s("abd"))), Ok(HeapValue::Bool(true)));
        assert_eq!(run(AluOp::Eq, s("x"), Some(s("x"))), Ok(HeapValue::Bool(true)));
    }

    #[test]
    fn test_logic_and_compare() {
        let b = HeapValue::Bool;
        assert_eq!(run(AluOp::And, b(true), Some(b(false))), Ok(b(false)));
        assert_eq!(run(AluOp::Or, b(true), Some(b(false))), Ok(b(true)));
        assert_eq!(run(AluOp::Not, b(true), None), Ok(b(false)));
        assert_eq!(int(AluOp::Lt, 1, 2), Ok(b(true)));
        assert_eq!(int(AluOp::Le, 2, 2), Ok(b(true)));
        assert_eq!(int(AluOp::Gt, 1, 2), Ok(b(false)));
        assert_eq!(int(AluOp::Ge, 2, 2), Ok(b(true)));
        assert_eq!(int(AluOp::Ne, 2, 2), Ok(b(false)));
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(
            run(AluOp::Add, HeapValue::Int(1), Some(HeapValue::Bool(true))),
            Err(VmError::UnsupportedOperand { op: "ADD", kinds: "int, bool".into() })
        );
        assert!(matches!(
            run(AluOp::Eq, HeapValue::Int(1), Some(HeapValue::String("1".into()))),
            Err(VmError::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn test_addr_and_deref() {
        let mut mem = Memory::new(64, None).unwrap();
        let mut fiber = Fiber::new(MAIN_FIBER, 0, NULL_ADDR, NULL_ADDR);
        let x = mem.alloc(&HeapValue::Int(3)).unwrap();
        fiber.push(&mut mem, x).unwrap();
        exec_alu(&mut fiber, &mut mem, AluOp::AddrOf).unwrap();
        exec_alu(&mut fiber, &mut mem, AluOp::Deref).unwrap();
        assert_eq!(fiber.pop(&mem).unwrap(), x);

        let nil = mem.alloc(&HeapValue::NIL).unwrap();
        fiber.push(&mut mem, nil).unwrap();
        assert_eq!(
            exec_alu(&mut fiber, &mut mem, AluOp::Deref),
            Err(VmError::Runtime(RuntimeError::NilDereference))
        );
    }
}
