//! Numeric instructions (`0x45..=0xBF`): comparisons, integer and float
//! arithmetic, and conversions. Every one of them pops its operands above
//! the current frame floor and pushes a single result.

use crate::error::Trap;
use crate::model::Value;
use crate::vm::stack::ValueStack;

macro_rules! int_ops {
    ($name:ident, $t:ty, $u:ty) => {
        pub(crate) mod $name {
            use crate::error::Trap;

            /// eq ne lt_s lt_u gt_s gt_u le_s le_u ge_s ge_u
            pub(crate) fn compare(idx: u8, a: $t, b: $t) -> bool {
                let (ua, ub) = (a as $u, b as $u);
                match idx {
                    0 => a == b,
                    1 => a != b,
                    2 => a < b,
                    3 => ua < ub,
                    4 => a > b,
                    5 => ua > ub,
                    6 => a <= b,
                    7 => ua <= ub,
                    8 => a >= b,
                    _ => ua >= ub,
                }
            }

            /// clz ctz popcnt
            pub(crate) fn unary(idx: u8, a: $t) -> $t {
                match idx {
                    0 => a.leading_zeros() as $t,
                    1 => a.trailing_zeros() as $t,
                    _ => a.count_ones() as $t,
                }
            }

            /// add sub mul div_s div_u rem_s rem_u and or xor shl shr_s shr_u rotl rotr
            pub(crate) fn binary(idx: u8, a: $t, b: $t) -> Result<$t, Trap> {
                let (ua, ub) = (a as $u, b as $u);
                if (3..=6).contains(&idx) && b == 0 {
                    return Err(Trap::DivideByZero);
                }
                Ok(match idx {
                    0 => a.wrapping_add(b),
                    1 => a.wrapping_sub(b),
                    2 => a.wrapping_mul(b),
                    3 => a.checked_div(b).ok_or(Trap::IntegerOverflow)?,
                    4 => (ua / ub) as $t,
                    5 => a.wrapping_rem(b),
                    6 => (ua % ub) as $t,
                    7 => a & b,
                    8 => a | b,
                    9 => a ^ b,
                    10 => a.wrapping_shl(b as u32),
                    11 => a.wrapping_shr(b as u32),
                    12 => ua.wrapping_shr(b as u32) as $t,
                    13 => a.rotate_left(b as u32),
                    _ => a.rotate_right(b as u32),
                })
            }
        }
    };
}

macro_rules! float_ops {
    ($name:ident, $f:ty, $bits:ty) => {
        pub(crate) mod $name {
            const SIGN: $bits = 1 << (<$bits>::BITS - 1);

            /// eq ne lt gt le ge
            pub(crate) fn compare(idx: u8, a: $f, b: $f) -> bool {
                match idx {
                    0 => a == b,
                    1 => a != b,
                    2 => a < b,
                    3 => a > b,
                    4 => a <= b,
                    _ => a >= b,
                }
            }

            /// abs neg ceil floor trunc nearest sqrt
            pub(crate) fn unary(idx: u8, a: $f) -> $f {
                match idx {
                    0 => <$f>::from_bits(a.to_bits() & !SIGN),
                    1 => <$f>::from_bits(a.to_bits() ^ SIGN),
                    2 => a.ceil(),
                    3 => a.floor(),
                    4 => a.trunc(),
                    5 => a.round_ties_even(),
                    _ => a.sqrt(),
                }
            }

            /// add sub mul div min max copysign
            pub(crate) fn binary(idx: u8, a: $f, b: $f) -> $f {
                match idx {
                    0 => a + b,
                    1 => a - b,
                    2 => a * b,
                    3 => a / b,
                    4 | 5 if a.is_nan() || b.is_nan() => a + b,
                    // min(-0, +0) is -0 and max(-0, +0) is +0.
                    4 if a == b => <$f>::from_bits(a.to_bits() | b.to_bits()),
                    5 if a == b => <$f>::from_bits(a.to_bits() & b.to_bits()),
                    4 => a.min(b),
                    5 => a.max(b),
                    _ => a.copysign(b),
                }
            }
        }
    };
}

int_ops!(i32_ops, i32, u32);
int_ops!(i64_ops, i64, u64);
float_ops!(f32_ops, f32, u32);
float_ops!(f64_ops, f64, u64);

/// Truncate toward zero, trapping if the result is NaN or falls outside
/// the open interval `(lo, hi)`.
fn trunc_checked(x: f64, lo: f64, hi: f64) -> Result<f64, Trap> {
    let t = x.trunc();
    if x.is_nan() || t <= lo || t >= hi {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t)
}

const I32_LO: f64 = -2147483649.0;
const I32_HI: f64 = 2147483648.0;
const U32_HI: f64 = 4294967296.0;
const I64_HI: f64 = 9223372036854775808.0;
const U64_HI: f64 = 18446744073709551616.0;

fn i64_in_range(x: f64, signed: bool) -> Result<i64, Trap> {
    if signed {
        // -2^63 is exactly representable, so compare inclusively there.
        let t = x.trunc();
        if x.is_nan() || t < -I64_HI || t >= I64_HI {
            return Err(Trap::IntegerOverflow);
        }
        Ok(t as i64)
    } else {
        Ok(trunc_checked(x, -1.0, U64_HI)? as u64 as i64)
    }
}

#[inline]
fn push_bool(s: &mut ValueStack, b: bool) {
    s.push(Value::I32(b as i32));
}

/// Execute numeric opcode `op`.
pub(crate) fn execute(op: u8, s: &mut ValueStack, floor: usize) -> Result<(), Trap> {
    let f = floor;
    match op {
        0x45 => {
            let a = s.pop_i32(f)?;
            push_bool(s, a == 0);
        }
        0x46..=0x4F => {
            let b = s.pop_i32(f)?;
            let a = s.pop_i32(f)?;
            push_bool(s, i32_ops::compare(op - 0x46, a, b));
        }
        0x50 => {
            let a = s.pop_i64(f)?;
            push_bool(s, a == 0);
        }
        0x51..=0x5A => {
            let b = s.pop_i64(f)?;
            let a = s.pop_i64(f)?;
            push_bool(s, i64_ops::compare(op - 0x51, a, b));
        }
        0x5B..=0x60 => {
            let b = s.pop_f32(f)?;
            let a = s.pop_f32(f)?;
            push_bool(s, f32_ops::compare(op - 0x5B, a, b));
        }
        0x61..=0x66 => {
            let b = s.pop_f64(f)?;
            let a = s.pop_f64(f)?;
            push_bool(s, f64_ops::compare(op - 0x61, a, b));
        }
        0x67..=0x69 => {
            let a = s.pop_i32(f)?;
            s.push(Value::I32(i32_ops::unary(op - 0x67, a)));
        }
        0x6A..=0x78 => {
            let b = s.pop_i32(f)?;
            let a = s.pop_i32(f)?;
            s.push(Value::I32(i32_ops::binary(op - 0x6A, a, b)?));
        }
        0x79..=0x7B => {
            let a = s.pop_i64(f)?;
            s.push(Value::I64(i64_ops::unary(op - 0x79, a)));
        }
        0x7C..=0x8A => {
            let b = s.pop_i64(f)?;
            let a = s.pop_i64(f)?;
            s.push(Value::I64(i64_ops::binary(op - 0x7C, a, b)?));
        }
        0x8B..=0x91 => {
            let a = s.pop_f32(f)?;
            s.push(Value::from_f32(f32_ops::unary(op - 0x8B, a)));
        }
        0x92..=0x98 => {
            let b = s.pop_f32(f)?;
            let a = s.pop_f32(f)?;
            s.push(Value::from_f32(f32_ops::binary(op - 0x92, a, b)));
        }
        0x99..=0x9F => {
            let a = s.pop_f64(f)?;
            s.push(Value::from_f64(f64_ops::unary(op - 0x99, a)));
        }
        0xA0..=0xA6 => {
            let b = s.pop_f64(f)?;
            let a = s.pop_f64(f)?;
            s.push(Value::from_f64(f64_ops::binary(op - 0xA0, a, b)));
        }
        0xA7 => {
            let a = s.pop_i64(f)?;
            s.push(Value::I32(a as i32));
        }
        0xA8..=0xAB => {
            let x = if op < 0xAA {
                f64::from(s.pop_f32(f)?)
            } else {
                s.pop_f64(f)?
            };
            let v = if op % 2 == 0 {
                trunc_checked(x, I32_LO, I32_HI)? as i32
            } else {
                trunc_checked(x, -1.0, U32_HI)? as u32 as i32
            };
            s.push(Value::I32(v));
        }
        0xAC => {
            let a = s.pop_i32(f)?;
            s.push(Value::I64(i64::from(a)));
        }
        0xAD => {
            let a = s.pop_i32(f)?;
            s.push(Value::I64(i64::from(a as u32)));
        }
        0xAE..=0xB1 => {
            let x = if op < 0xB0 {
                f64::from(s.pop_f32(f)?)
            } else {
                s.pop_f64(f)?
            };
            s.push(Value::I64(i64_in_range(x, op % 2 == 0)?));
        }
        0xB2..=0xB5 => {
            let v = match op {
                0xB2 => s.pop_i32(f)? as f32,
                0xB3 => s.pop_i32(f)? as u32 as f32,
                0xB4 => s.pop_i64(f)? as f32,
                _ => s.pop_i64(f)? as u64 as f32,
            };
            s.push(Value::from_f32(v));
        }
        0xB6 => {
            let a = s.pop_f64(f)?;
            s.push(Value::from_f32(a as f32));
        }
        0xB7..=0xBA => {
            let v = match op {
                0xB7 => f64::from(s.pop_i32(f)?),
                0xB8 => f64::from(s.pop_i32(f)? as u32),
                0xB9 => s.pop_i64(f)? as f64,
                _ => s.pop_i64(f)? as u64 as f64,
            };
            s.push(Value::from_f64(v));
        }
        0xBB => {
            let a = s.pop_f32(f)?;
            s.push(Value::from_f64(f64::from(a)));
        }
        0xBC => {
            let a = s.pop_f32(f)?;
            s.push(Value::I32(a.to_bits() as i32));
        }
        0xBD => {
            let a = s.pop_f64(f)?;
            s.push(Value::I64(a.to_bits() as i64));
        }
        0xBE => {
            let a = s.pop_i32(f)?;
            s.push(Value::F32(a as u32));
        }
        0xBF => {
            let a = s.pop_i64(f)?;
            s.push(Value::F64(a as u64));
        }
        other => return Err(Trap::IllegalOpcode(other)),
    }
    Ok(())
}
