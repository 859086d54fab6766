//! Value-level arithmetic, comparison, and concatenation semantics

use crate::bytecode::Opcode;
use crate::error::Fault;
use crate::object::HeapObject;
use crate::value::{LuaStr, Numeric, Value};

use std::cmp::Ordering;

/// Apply a binary arithmetic opcode to two operands.
///
/// Integer pairs stay integral with two's-complement wraparound, except
/// `DIV` and `POW` which always produce floats. Mixed operands coerce to
/// float; numeric-parseable strings coerce first.
pub(crate) fn binary_arith(op: Opcode, lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    use Opcode::*;

    match op {
        BAND | BOR | BXOR | SHL | SHR => {
            let a = int_operand(lhs)?;
            let b = int_operand(rhs)?;

            let out = match op {
                BAND => a & b,
                BOR => a | b,
                BXOR => a ^ b,
                SHL => shift_left(a, b),
                _ => shift_left(a, b.wrapping_neg()),
            };

            Ok(Value::Integer(out))
        }

        DIV | POW => {
            let a = float_operand(lhs)?;
            let b = float_operand(rhs)?;

            let out = if matches!(op, DIV) { a / b } else { a.powf(b) };

            Ok(Value::Number(out))
        }

        _ => match (numeric_operand(lhs)?, numeric_operand(rhs)?) {
            (Numeric::Int(a), Numeric::Int(b)) => int_arith(op, a, b),
            (a, b) => {
                let (a, b) = (widen(a), widen(b));

                Ok(Value::Number(float_arith(op, a, b)))
            }
        },
    }
}

/// Apply a unary arithmetic opcode.
pub(crate) fn unary_arith(op: Opcode, operand: &Value) -> Result<Value, Fault> {
    match op {
        Opcode::UNM => match numeric_operand(operand)? {
            Numeric::Int(i) => Ok(Value::Integer(i.wrapping_neg())),
            Numeric::Float(f) => Ok(Value::Number(-f)),
        },
        _ => int_operand(operand).map(|i| Value::Integer(!i)),
    }
}

fn int_arith(op: Opcode, a: i64, b: i64) -> Result<Value, Fault> {
    let out = match op {
        Opcode::ADD => a.wrapping_add(b),
        Opcode::SUB => a.wrapping_sub(b),
        Opcode::MUL => a.wrapping_mul(b),
        Opcode::MOD => {
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }

            let r = a.wrapping_rem(b);

            if r != 0 && (r ^ b) < 0 {
                r + b
            } else {
                r
            }
        }
        _ => {
            // IDIV: floored quotient
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }

            let q = a.wrapping_div(b);

            if (a ^ b) < 0 && q.wrapping_mul(b) != a {
                q - 1
            } else {
                q
            }
        }
    };

    Ok(Value::Integer(out))
}

fn float_arith(op: Opcode, a: f64, b: f64) -> f64 {
    match op {
        Opcode::ADD => a + b,
        Opcode::SUB => a - b,
        Opcode::MUL => a * b,
        Opcode::MOD => {
            let r = a % b;

            if r != 0.0 && r * b < 0.0 {
                r + b
            } else {
                r
            }
        }
        _ => (a / b).floor(),
    }
}

/// Shift left by `by` bits; negative counts shift right. Shifts past the
/// word width produce zero, and right shifts are logical.
fn shift_left(value: i64, by: i64) -> i64 {
    if by < 0 {
        if by <= -64 {
            0
        } else {
            ((value as u64) >> -by) as i64
        }
    } else if by >= 64 {
        0
    } else {
        value.wrapping_shl(by as u32)
    }
}

fn widen(n: Numeric) -> f64 {
    match n {
        Numeric::Int(i) => i as f64,
        Numeric::Float(f) => f,
    }
}

fn numeric_operand(value: &Value) -> Result<Numeric, Fault> {
    value
        .to_numeric()
        .ok_or(Fault::ArithOnNonNumber(value.tag()))
}

fn float_operand(value: &Value) -> Result<f64, Fault> {
    value.to_float().ok_or(Fault::ArithOnNonNumber(value.tag()))
}

fn int_operand(value: &Value) -> Result<i64, Fault> {
    value
        .to_integer()
        .ok_or(Fault::ArithOnNonNumber(value.tag()))
}

/// Strict order: numbers against numbers (NaN is unordered), strings
/// byte-lexicographically. Everything else is incomparable.
pub(crate) fn less_than(lhs: &Value, rhs: &Value) -> Result<bool, Fault> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a < b),
        (Value::Number(a), Value::Number(b)) => Ok(a < b),
        (Value::Integer(a), Value::Number(b)) => {
            Ok(int_cmp_float(*a, *b) == Some(Ordering::Less))
        }
        (Value::Number(a), Value::Integer(b)) => {
            Ok(int_cmp_float(*b, *a) == Some(Ordering::Greater))
        }
        (Value::String(a), Value::String(b)) => Ok(a.as_bytes() < b.as_bytes()),
        _ => Err(Fault::OrderOnIncomparable(lhs.tag(), rhs.tag())),
    }
}

/// Strict-or-equal order with the same domain as [`less_than`].
pub(crate) fn less_equal(lhs: &Value, rhs: &Value) -> Result<bool, Fault> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a <= b),
        (Value::Number(a), Value::Number(b)) => Ok(a <= b),
        (Value::Integer(a), Value::Number(b)) => Ok(matches!(
            int_cmp_float(*a, *b),
            Some(Ordering::Less | Ordering::Equal)
        )),
        (Value::Number(a), Value::Integer(b)) => Ok(matches!(
            int_cmp_float(*b, *a),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        (Value::String(a), Value::String(b)) => Ok(a.as_bytes() <= b.as_bytes()),
        _ => Err(Fault::OrderOnIncomparable(lhs.tag(), rhs.tag())),
    }
}

/// Exact order of an integer against a float. Widening the integer to a
/// float rounds above 2^53 and flips comparisons near the type boundaries,
/// so floats outside the integer range are classified directly and the rest
/// compare through their exact floor. NaN is unordered.
fn int_cmp_float(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }

    if f >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }

    if f < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }

    let floor = f.floor();

    match i.cmp(&(floor as i64)) {
        // i == floor(f) but f still carries a fraction, so i < f.
        Ordering::Equal if f != floor => Some(Ordering::Less),
        order => Some(order),
    }
}

/// Concatenate a register range, coercing numbers to their rendered form.
pub(crate) fn concat(values: &[Value]) -> Result<Value, Fault> {
    let mut bytes = Vec::new();

    for value in values {
        let part: LuaStr = value
            .to_lua_string()
            .ok_or(Fault::ConcatOnNonStringable(value.tag()))?;

        bytes.extend_from_slice(part.as_bytes());
    }

    Ok(Value::String(bytes.into()))
}

/// Length of a string (bytes) or table (border).
pub(crate) fn length_of(value: &Value) -> Result<Value, Fault> {
    match value {
        Value::String(s) => Ok(Value::Integer(s.len() as i64)),
        Value::Object(handle) => match &*handle.borrow() {
            HeapObject::Table(table) => Ok(Value::Integer(table.border())),
            _ => Err(Fault::LengthOnUnsupported(value.tag())),
        },
        _ => Err(Fault::LengthOnUnsupported(value.tag())),
    }
}
