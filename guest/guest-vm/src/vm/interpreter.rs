//! Interpreter loop over decoded instructions.
//!
//! Guest frames live in a heap-allocated frame stack, so guest recursion
//! never recurses natively. Operands share the caller's [`ValueStack`]; a
//! call starts at the stack's current height (the floor) and nothing below
//! the floor is ever popped or overwritten.

use std::sync::Arc;

use crate::compile::CompiledModule;
use crate::error::Trap;
use crate::host::HostFunc;
use crate::meter::Checkpoint;
use crate::model::{FuncIdx, FuncType, ValType, Value};
use crate::runtime::instance::InstanceState;
use crate::runtime::LinearMemory;
use crate::vm::decode::Instr;
use crate::vm::instructions::op;
use crate::vm::numeric;
use crate::vm::pricing::Pricing;
use crate::vm::stack::ValueStack;

/// Hard cap on live guest frames, independent of any checkpoint.
pub const MAX_FRAMES: usize = 100_000;

/// Hard cap on locals (parameters included) held by all live frames.
pub const MAX_LIVE_LOCALS: usize = 1 << 20;

#[derive(Debug, Clone, Copy)]
struct Label {
    /// Values carried by a branch to this label.
    arity: usize,
    height: usize,
    /// Instruction index a branch continues at.
    cont: usize,
}

#[derive(Debug)]
struct Frame {
    func: FuncIdx,
    pc: usize,
    locals: Vec<Value>,
    labels: Vec<Label>,
    base: usize,
    result: Option<ValType>,
}

pub(crate) struct Machine<'a> {
    module: &'a CompiledModule,
    host: &'a [Arc<HostFunc>],
    state: &'a mut InstanceState,
    stack: &'a mut ValueStack,
    meter: &'a mut dyn Checkpoint,
    pricing: &'a Pricing,
    frames: Vec<Frame>,
    live_locals: usize,
    floor: usize,
}

impl<'a> Machine<'a> {
    pub(crate) fn new(
        module: &'a CompiledModule,
        host: &'a [Arc<HostFunc>],
        state: &'a mut InstanceState,
        stack: &'a mut ValueStack,
        meter: &'a mut dyn Checkpoint,
        pricing: &'a Pricing,
    ) -> Self {
        let floor = stack.len();
        Self {
            module,
            host,
            state,
            stack,
            meter,
            pricing,
            frames: Vec::new(),
            live_locals: 0,
            floor,
        }
    }

    /// Run `func` with `args` to completion. On every outcome the operand
    /// stack is left at the height it had on entry, and `leave_frame` has
    /// been called once per frame entered.
    pub(crate) fn invoke(mut self, func: FuncIdx, args: &[Value]) -> Result<Option<Value>, Trap> {
        let outcome = self.run(func, args);
        for _ in self.frames.drain(..) {
            self.meter.leave_frame();
        }
        self.stack.truncate(self.floor);
        outcome
    }

    fn run(&mut self, func: FuncIdx, args: &[Value]) -> Result<Option<Value>, Trap> {
        let module = self.module;
        let ty = module
            .func_type(func)
            .ok_or(Trap::Malformed("function index out of range"))?;
        let arg_types = args.iter().map(Value::ty);
        if args.len() != ty.params.len() || !arg_types.eq(ty.params.iter().copied()) {
            return Err(Trap::TypeMismatch("argument types"));
        }
        for &a in args {
            self.stack.push(a);
        }

        self.call(func)?;
        while let Some(frame) = self.frames.last_mut() {
            let code = module
                .body(frame.func)
                .ok_or(Trap::Malformed("frame without a body"))?;
            let instr = code
                .code
                .get(frame.pc)
                .ok_or(Trap::Malformed("fell off the end of a body"))?;
            frame.pc += 1;
            self.meter.charge(self.pricing.cost(instr))?;
            self.step(instr)?;
        }

        match ty.results.first() {
            Some(&expected) => {
                let v = self.stack.pop_above(self.floor)?;
                if v.ty() != expected {
                    return Err(Trap::TypeMismatch("result type"));
                }
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    fn frame(&mut self) -> Result<&mut Frame, Trap> {
        self.frames
            .last_mut()
            .ok_or(Trap::Malformed("no active frame"))
    }

    fn operand_floor(&self) -> usize {
        self.frames.last().map_or(self.floor, |f| f.base)
    }

    fn memory(&mut self) -> Result<&mut LinearMemory, Trap> {
        self.state
            .memory
            .as_mut()
            .ok_or(Trap::Malformed("module has no memory"))
    }

    fn push_label(&mut self, arity: usize, cont: usize) -> Result<(), Trap> {
        let height = self.stack.len();
        self.frame()?.labels.push(Label {
            arity,
            height,
            cont,
        });
        Ok(())
    }

    /// Pop `ty.params` off the stack, checking their types.
    fn pop_args(&mut self, ty: &FuncType) -> Result<Vec<Value>, Trap> {
        let n = ty.params.len();
        let floor = self.operand_floor();
        let len = self.stack.len();
        if len < floor + n {
            return Err(Trap::Malformed("operand stack underflow"));
        }
        let args = self.stack.as_slice()[len - n..].to_vec();
        if !args.iter().map(Value::ty).eq(ty.params.iter().copied()) {
            return Err(Trap::TypeMismatch("call arguments"));
        }
        self.stack.truncate(len - n);
        Ok(args)
    }

    fn call(&mut self, func: FuncIdx) -> Result<(), Trap> {
        let module = self.module;
        let ty = module
            .func_type(func)
            .ok_or(Trap::Malformed("call target out of range"))?;

        if func < module.imported_funcs() {
            let hosts = self.host;
            let host = hosts
                .get(func as usize)
                .ok_or(Trap::Malformed("unresolved host function"))?;
            let args = self.pop_args(ty)?;
            let ret = (**host)(&args)?;
            if ret.map(|v| v.ty()) != ty.results.first().copied() {
                return Err(Trap::TypeMismatch("host function result"));
            }
            if let Some(v) = ret {
                self.stack.push(v);
            }
            return Ok(());
        }

        let body = module
            .body(func)
            .ok_or(Trap::Malformed("call target has no body"))?;
        let mut locals = self.pop_args(ty)?;
        let size = locals.len() + body.locals.len();
        if self.frames.len() >= MAX_FRAMES || self.live_locals + size > MAX_LIVE_LOCALS {
            return Err(Trap::StackExhausted);
        }
        // zero-filling declared locals is paid for before the frame opens
        if !body.locals.is_empty() {
            let cost = self.pricing.local.saturating_mul(body.locals.len() as u64);
            self.meter.charge(cost)?;
        }
        self.meter.enter_frame()?;
        locals.extend(body.locals.iter().map(|t| t.zero()));
        self.live_locals += size;
        self.frames.push(Frame {
            func,
            pc: 0,
            locals,
            labels: Vec::new(),
            base: self.stack.len(),
            result: ty.results.first().copied(),
        });
        Ok(())
    }

    fn return_from_frame(&mut self) -> Result<(), Trap> {
        let frame = self
            .frames
            .pop()
            .ok_or(Trap::Malformed("return without a frame"))?;
        self.meter.leave_frame();
        self.live_locals = self.live_locals.saturating_sub(frame.locals.len());
        let ret = match frame.result {
            Some(expected) => {
                let v = self.stack.pop_above(frame.base)?;
                if v.ty() != expected {
                    return Err(Trap::TypeMismatch("function result"));
                }
                Some(v)
            }
            None => None,
        };
        self.stack.truncate(frame.base);
        if let Some(v) = ret {
            self.stack.push(v);
        }
        Ok(())
    }

    fn branch(&mut self, depth: u32) -> Result<(), Trap> {
        let depth = depth as usize;
        let frame = self
            .frames
            .last_mut()
            .ok_or(Trap::Malformed("branch without a frame"))?;
        if depth == frame.labels.len() {
            return self.return_from_frame();
        }
        let target = frame
            .labels
            .len()
            .checked_sub(depth + 1)
            .ok_or(Trap::Malformed("branch depth out of range"))?;
        let label = frame.labels[target];
        let carried = match label.arity {
            0 => None,
            _ => Some(self.stack.pop_above(label.height)?),
        };
        self.stack.truncate(label.height);
        if let Some(v) = carried {
            self.stack.push(v);
        }
        frame.labels.truncate(target);
        frame.pc = label.cont;
        Ok(())
    }

    fn effective_address(&mut self, offset: u32) -> Result<u64, Trap> {
        let floor = self.operand_floor();
        let base = self.stack.pop_i32(floor)? as u32;
        Ok(u64::from(base) + u64::from(offset))
    }

    fn step(&mut self, instr: &Instr) -> Result<(), Trap> {
        let floor = self.operand_floor();
        match *instr {
            Instr::Unreachable => return Err(Trap::Unreachable),
            Instr::Illegal(code) => return Err(Trap::IllegalOpcode(code)),
            Instr::Nop => {}
            Instr::Block { arity, end } => self.push_label(arity as usize, end as usize + 1)?,
            Instr::Loop => {
                let start = self.frame()?.pc - 1;
                self.push_label(0, start)?;
            }
            Instr::If {
                arity,
                else_at,
                end,
            } => {
                let cond = self.stack.pop_i32(floor)?;
                if cond != 0 {
                    self.push_label(arity as usize, end as usize + 1)?;
                } else if let Some(at) = else_at {
                    self.push_label(arity as usize, end as usize + 1)?;
                    self.frame()?.pc = at as usize + 1;
                } else {
                    self.frame()?.pc = end as usize + 1;
                }
            }
            // The then-arm finished: continue at the End, which pops the label.
            Instr::Else { end } => self.frame()?.pc = end as usize,
            Instr::End => {
                if self.frame()?.labels.pop().is_none() {
                    self.return_from_frame()?;
                }
            }
            Instr::Br(depth) => self.branch(depth)?,
            Instr::BrIf(depth) => {
                if self.stack.pop_i32(floor)? != 0 {
                    self.branch(depth)?;
                }
            }
            Instr::BrTable {
                ref targets,
                default,
            } => {
                let i = self.stack.pop_i32(floor)? as u32;
                let depth = targets.get(i as usize).copied().unwrap_or(default);
                self.branch(depth)?;
            }
            Instr::Return => self.return_from_frame()?,
            Instr::Call(func) => self.call(func)?,
            Instr::CallIndirect(ty) => {
                let slot = self.stack.pop_i32(floor)? as u32;
                let table = self
                    .state
                    .table
                    .as_ref()
                    .ok_or(Trap::UndefinedElement(slot))?;
                let func = table.get(slot)?;
                let module = self.module;
                let expected = module.module().types.get(ty as usize);
                if expected.is_none() || expected != module.func_type(func) {
                    return Err(Trap::IndirectCallTypeMismatch);
                }
                self.call(func)?;
            }
            Instr::Drop => {
                self.stack.pop_above(floor)?;
            }
            Instr::Select => {
                let cond = self.stack.pop_i32(floor)?;
                let b = self.stack.pop_above(floor)?;
                let a = self.stack.pop_above(floor)?;
                if a.ty() != b.ty() {
                    return Err(Trap::TypeMismatch("select operands"));
                }
                self.stack.push(if cond != 0 { a } else { b });
            }
            Instr::LocalGet(i) => {
                let v = *self
                    .frame()?
                    .locals
                    .get(i as usize)
                    .ok_or(Trap::Malformed("local index out of range"))?;
                self.stack.push(v);
            }
            Instr::LocalSet(i) | Instr::LocalTee(i) => {
                let v = self.stack.pop_above(floor)?;
                let slot = self
                    .frame()?
                    .locals
                    .get_mut(i as usize)
                    .ok_or(Trap::Malformed("local index out of range"))?;
                if slot.ty() != v.ty() {
                    return Err(Trap::TypeMismatch("local.set operand"));
                }
                *slot = v;
                if matches!(instr, Instr::LocalTee(_)) {
                    self.stack.push(v);
                }
            }
            Instr::GlobalGet(i) => {
                let v = self
                    .state
                    .globals
                    .get(i as usize)
                    .ok_or(Trap::Malformed("global index out of range"))?
                    .get();
                self.stack.push(v);
            }
            Instr::GlobalSet(i) => {
                let v = self.stack.pop_above(floor)?;
                self.state
                    .globals
                    .get_mut(i as usize)
                    .ok_or(Trap::Malformed("global index out of range"))?
                    .set(v)?;
            }
            Instr::Load { op, offset } => {
                let addr = self.effective_address(offset)?;
                let v = load(self.memory()?, op, addr)?;
                self.stack.push(v);
            }
            Instr::Store { op, offset } => {
                let v = self.stack.pop_above(floor)?;
                let addr = self.effective_address(offset)?;
                store(self.memory()?, op, addr, v)?;
            }
            Instr::MemorySize => {
                let pages = self.memory()?.pages();
                self.stack.push(Value::I32(pages as i32));
            }
            Instr::MemoryGrow => {
                let delta = self.stack.pop_i32(floor)? as u32;
                let prev = self.memory()?.grow(delta);
                self.stack
                    .push(Value::I32(prev.map_or(-1, |p| p as i32)));
            }
            Instr::I32Const(v) => self.stack.push(Value::I32(v)),
            Instr::I64Const(v) => self.stack.push(Value::I64(v)),
            Instr::F32Const(b) => self.stack.push(Value::F32(b)),
            Instr::F64Const(b) => self.stack.push(Value::F64(b)),
            Instr::Numeric(code) => numeric::execute(code, self.stack, floor)?,
        }
        Ok(())
    }
}

fn load(mem: &LinearMemory, code: u8, addr: u64) -> Result<Value, Trap> {
    Ok(match code {
        op::I32_LOAD => Value::I32(i32::from_le_bytes(mem.read_array(addr)?)),
        op::I64_LOAD => Value::I64(i64::from_le_bytes(mem.read_array(addr)?)),
        op::F32_LOAD => Value::F32(u32::from_le_bytes(mem.read_array(addr)?)),
        op::F64_LOAD => Value::F64(u64::from_le_bytes(mem.read_array(addr)?)),
        op::I32_LOAD8_S => Value::I32(i32::from(i8::from_le_bytes(mem.read_array(addr)?))),
        op::I32_LOAD8_U => Value::I32(i32::from(u8::from_le_bytes(mem.read_array(addr)?))),
        op::I32_LOAD16_S => Value::I32(i32::from(i16::from_le_bytes(mem.read_array(addr)?))),
        op::I32_LOAD16_U => Value::I32(i32::from(u16::from_le_bytes(mem.read_array(addr)?))),
        op::I64_LOAD8_S => Value::I64(i64::from(i8::from_le_bytes(mem.read_array(addr)?))),
        op::I64_LOAD8_U => Value::I64(i64::from(u8::from_le_bytes(mem.read_array(addr)?))),
        op::I64_LOAD16_S => Value::I64(i64::from(i16::from_le_bytes(mem.read_array(addr)?))),
        op::I64_LOAD16_U => Value::I64(i64::from(u16::from_le_bytes(mem.read_array(addr)?))),
        op::I64_LOAD32_S => Value::I64(i64::from(i32::from_le_bytes(mem.read_array(addr)?))),
        op::I64_LOAD32_U => Value::I64(i64::from(u32::from_le_bytes(mem.read_array(addr)?))),
        other => return Err(Trap::IllegalOpcode(other)),
    })
}

fn store(mem: &mut LinearMemory, code: u8, addr: u64, v: Value) -> Result<(), Trap> {
    match (code, v) {
        (op::I32_STORE, Value::I32(x)) => mem.write(addr, &x.to_le_bytes()),
        (op::I64_STORE, Value::I64(x)) => mem.write(addr, &x.to_le_bytes()),
        (op::F32_STORE, Value::F32(b)) => mem.write(addr, &b.to_le_bytes()),
        (op::F64_STORE, Value::F64(b)) => mem.write(addr, &b.to_le_bytes()),
        (op::I32_STORE8, Value::I32(x)) => mem.write(addr, &(x as u8).to_le_bytes()),
        (op::I32_STORE16, Value::I32(x)) => mem.write(addr, &(x as u16).to_le_bytes()),
        (op::I64_STORE8, Value::I64(x)) => mem.write(addr, &(x as u8).to_le_bytes()),
        (op::I64_STORE16, Value::I64(x)) => mem.write(addr, &(x as u16).to_le_bytes()),
        (op::I64_STORE32, Value::I64(x)) => mem.write(addr, &(x as u32).to_le_bytes()),
        (op::I32_STORE..=op::I64_STORE32, _) => Err(Trap::TypeMismatch("store operand")),
        (other, _) => Err(Trap::IllegalOpcode(other)),
    }
}
