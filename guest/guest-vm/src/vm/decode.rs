//! One-pass decoder turning a function body into a flat instruction list
//! whose structured-control instructions already know where they end.

use crate::binary::{self, cursor::Cursor, leb128};
use crate::error::CompileError;
use crate::model::{FuncIdx, TypeIdx, ValType};
use crate::vm::instructions::op;

/// A decoded instruction. Jump targets are indices into the owning body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block { arity: u8, end: u32 },
    Loop,
    If { arity: u8, else_at: Option<u32>, end: u32 },
    Else { end: u32 },
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    Call(FuncIdx),
    CallIndirect(TypeIdx),
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load { op: u8, offset: u32 },
    Store { op: u8, offset: u32 },
    MemorySize,
    MemoryGrow,
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    /// Any opcode in `0x45..=0xBF`; none take immediates.
    Numeric(u8),
    /// An opcode this engine does not implement. Traps when executed.
    Illegal(u8),
}

struct Decoder<'a> {
    func: FuncIdx,
    cur: Cursor<'a>,
    at: usize,
}

impl<'a> Decoder<'a> {
    fn fail(&self, msg: &'static str) -> CompileError {
        CompileError::Decode {
            func: self.func,
            offset: self.at,
            msg,
        }
    }

    fn imm<T>(&self, r: binary::Result<T>) -> Result<T, CompileError> {
        r.map_err(|_| self.fail("truncated or malformed immediate"))
    }

    fn u32(&mut self) -> Result<u32, CompileError> {
        let r = leb128::read_uleb_u32(&mut self.cur);
        self.imm(r)
    }

    fn byte(&mut self) -> Result<u8, CompileError> {
        let r = self.cur.read_u8();
        self.imm(r)
    }

    fn block_arity(&mut self) -> Result<u8, CompileError> {
        match self.byte()? {
            op::BLOCK_EMPTY => Ok(0),
            b if ValType::from_code(b).is_some() => Ok(1),
            _ => Err(self.fail("unsupported block type")),
        }
    }

    fn reserved_zero(&mut self) -> Result<(), CompileError> {
        match self.byte()? {
            0 => Ok(()),
            _ => Err(self.fail("reserved byte must be zero")),
        }
    }

    fn memarg(&mut self) -> Result<u32, CompileError> {
        let _align = self.u32()?;
        self.u32()
    }

    fn next(&mut self) -> Result<Instr, CompileError> {
        self.at = self.cur.offset();
        let opcode = self.byte()?;
        Ok(match opcode {
            op::UNREACHABLE => Instr::Unreachable,
            op::NOP => Instr::Nop,
            op::BLOCK => Instr::Block {
                arity: self.block_arity()?,
                end: 0,
            },
            op::LOOP => {
                self.block_arity()?;
                Instr::Loop
            }
            op::IF => Instr::If {
                arity: self.block_arity()?,
                else_at: None,
                end: 0,
            },
            op::ELSE => Instr::Else { end: 0 },
            op::END => Instr::End,
            op::BR => Instr::Br(self.u32()?),
            op::BR_IF => Instr::BrIf(self.u32()?),
            op::BR_TABLE => {
                let r = binary::reader::read_vec(&mut self.cur, leb128::read_uleb_u32);
                let targets = self.imm(r)?.into_boxed_slice();
                Instr::BrTable {
                    targets,
                    default: self.u32()?,
                }
            }
            op::RETURN => Instr::Return,
            op::CALL => Instr::Call(self.u32()?),
            op::CALL_INDIRECT => {
                let ty = self.u32()?;
                self.reserved_zero()?;
                Instr::CallIndirect(ty)
            }
            op::DROP => Instr::Drop,
            op::SELECT => Instr::Select,
            op::LOCAL_GET => Instr::LocalGet(self.u32()?),
            op::LOCAL_SET => Instr::LocalSet(self.u32()?),
            op::LOCAL_TEE => Instr::LocalTee(self.u32()?),
            op::GLOBAL_GET => Instr::GlobalGet(self.u32()?),
            op::GLOBAL_SET => Instr::GlobalSet(self.u32()?),
            op::I32_LOAD..=op::I64_LOAD32_U => Instr::Load {
                op: opcode,
                offset: self.memarg()?,
            },
            op::I32_STORE..=op::I64_STORE32 => Instr::Store {
                op: opcode,
                offset: self.memarg()?,
            },
            op::MEMORY_SIZE => {
                self.reserved_zero()?;
                Instr::MemorySize
            }
            op::MEMORY_GROW => {
                self.reserved_zero()?;
                Instr::MemoryGrow
            }
            op::I32_CONST => {
                let r = leb128::read_sleb_i32(&mut self.cur);
                Instr::I32Const(self.imm(r)?)
            }
            op::I64_CONST => {
                let r = leb128::read_sleb_i64(&mut self.cur);
                Instr::I64Const(self.imm(r)?)
            }
            op::F32_CONST => {
                let r = self.cur.read_array::<4>();
                Instr::F32Const(u32::from_le_bytes(self.imm(r)?))
            }
            op::F64_CONST => {
                let r = self.cur.read_array::<8>();
                Instr::F64Const(u64::from_le_bytes(self.imm(r)?))
            }
            op::NUMERIC_FIRST..=op::NUMERIC_LAST => Instr::Numeric(opcode),
            other => Instr::Illegal(other),
        })
    }
}

/// Decode `code` (which must end with the function's final `end`).
///
/// Unknown opcodes become [`Instr::Illegal`] and are assumed to carry no
/// immediates; decoding continues after them.
pub fn decode_body(func: FuncIdx, code: &[u8]) -> Result<Vec<Instr>, CompileError> {
    let mut d = Decoder {
        func,
        cur: Cursor::new(code),
        at: 0,
    };
    let mut out: Vec<Instr> = Vec::with_capacity(code.len());
    // Indices of Block/Loop/If instructions still waiting for their End.
    let mut open: Vec<usize> = Vec::new();

    loop {
        let instr = d.next()?;
        let here = out.len() as u32;
        match instr {
            Instr::Block { .. } | Instr::Loop | Instr::If { .. } => open.push(out.len()),
            Instr::Else { .. } => match open.last().map(|&i| &mut out[i]) {
                Some(Instr::If { else_at, .. }) if else_at.is_none() => *else_at = Some(here),
                _ => return Err(d.fail("else without matching if")),
            },
            Instr::End => match open.pop() {
                Some(start) => {
                    let mut else_slot = None;
                    match &mut out[start] {
                        Instr::Block { end, .. } => *end = here,
                        Instr::If { end, else_at, .. } => {
                            *end = here;
                            else_slot = *else_at;
                        }
                        _ => {}
                    }
                    if let Some(Instr::Else { end }) =
                        else_slot.and_then(|i| out.get_mut(i as usize))
                    {
                        *end = here;
                    }
                }
                None => {
                    out.push(Instr::End);
                    break;
                }
            },
            _ => {}
        }
        out.push(instr);
    }

    if !d.cur.is_eof() {
        d.at = d.cur.offset();
        return Err(d.fail("bytes after the final end"));
    }
    Ok(out)
}
