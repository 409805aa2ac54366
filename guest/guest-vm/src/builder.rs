//! Programmatic assembler for guest binaries.
//!
//! Produces the same binary format [`crate::parse`] reads. Function indices
//! handed out by [`ModuleBuilder::func`] count imports first, so declare all
//! imports before the first function.

use crate::binary::leb128::{write_sleb_i32, write_sleb_i64, write_uleb_u32};
use crate::model::{ConstExpr, FuncIdx, FuncType, GlobalIdx, GlobalType, Limits, TypeIdx, ValType};
use crate::vm::instructions::op;

/// Instruction sequence of one function body. The final `end` is added by
/// [`ModuleBuilder::func`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    code: Vec<u8>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.code.push(opcode);
        self
    }

    fn op_u32(mut self, opcode: u8, imm: u32) -> Self {
        self.code.push(opcode);
        write_uleb_u32(&mut self.code, imm);
        self
    }

    fn block_type(mut self, opcode: u8, result: Option<ValType>) -> Self {
        self.code.push(opcode);
        self.code.push(result.map_or(op::BLOCK_EMPTY, ValType::code));
        self
    }

    fn memarg(mut self, opcode: u8, offset: u32) -> Self {
        self.code.push(opcode);
        write_uleb_u32(&mut self.code, 0);
        write_uleb_u32(&mut self.code, offset);
        self
    }

    pub fn i32_const(mut self, v: i32) -> Self {
        self.code.push(op::I32_CONST);
        write_sleb_i32(&mut self.code, v);
        self
    }

    pub fn i64_const(mut self, v: i64) -> Self {
        self.code.push(op::I64_CONST);
        write_sleb_i64(&mut self.code, v);
        self
    }

    pub fn f32_const(mut self, v: f32) -> Self {
        self.code.push(op::F32_CONST);
        self.code.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }

    pub fn f64_const(mut self, v: f64) -> Self {
        self.code.push(op::F64_CONST);
        self.code.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }

    pub fn local_get(self, i: u32) -> Self {
        self.op_u32(op::LOCAL_GET, i)
    }

    pub fn local_set(self, i: u32) -> Self {
        self.op_u32(op::LOCAL_SET, i)
    }

    pub fn local_tee(self, i: u32) -> Self {
        self.op_u32(op::LOCAL_TEE, i)
    }

    pub fn global_get(self, i: GlobalIdx) -> Self {
        self.op_u32(op::GLOBAL_GET, i)
    }

    pub fn global_set(self, i: GlobalIdx) -> Self {
        self.op_u32(op::GLOBAL_SET, i)
    }

    pub fn i32_load(self, offset: u32) -> Self {
        self.memarg(op::I32_LOAD, offset)
    }

    pub fn i32_store(self, offset: u32) -> Self {
        self.memarg(op::I32_STORE, offset)
    }

    pub fn i64_load(self, offset: u32) -> Self {
        self.memarg(op::I64_LOAD, offset)
    }

    pub fn i64_store(self, offset: u32) -> Self {
        self.memarg(op::I64_STORE, offset)
    }

    /// Any load or store opcode with a zero alignment hint.
    pub fn mem(self, opcode: u8, offset: u32) -> Self {
        self.memarg(opcode, offset)
    }

    pub fn memory_size(mut self) -> Self {
        self.code.extend_from_slice(&[op::MEMORY_SIZE, 0]);
        self
    }

    pub fn memory_grow(mut self) -> Self {
        self.code.extend_from_slice(&[op::MEMORY_GROW, 0]);
        self
    }

    pub fn call(self, f: FuncIdx) -> Self {
        self.op_u32(op::CALL, f)
    }

    pub fn call_indirect(mut self, ty: TypeIdx) -> Self {
        self = self.op_u32(op::CALL_INDIRECT, ty);
        self.code.push(0);
        self
    }

    pub fn block(self) -> Self {
        self.block_type(op::BLOCK, None)
    }

    pub fn block_result(self, ty: ValType) -> Self {
        self.block_type(op::BLOCK, Some(ty))
    }

    pub fn loop_(self) -> Self {
        self.block_type(op::LOOP, None)
    }

    pub fn if_(self) -> Self {
        self.block_type(op::IF, None)
    }

    pub fn if_result(self, ty: ValType) -> Self {
        self.block_type(op::IF, Some(ty))
    }

    pub fn else_(self) -> Self {
        self.op(op::ELSE)
    }

    pub fn end(self) -> Self {
        self.op(op::END)
    }

    pub fn br(self, depth: u32) -> Self {
        self.op_u32(op::BR, depth)
    }

    pub fn br_if(self, depth: u32) -> Self {
        self.op_u32(op::BR_IF, depth)
    }

    pub fn br_table(mut self, targets: &[u32], default: u32) -> Self {
        self.code.push(op::BR_TABLE);
        write_uleb_u32(&mut self.code, targets.len() as u32);
        for &t in targets {
            write_uleb_u32(&mut self.code, t);
        }
        write_uleb_u32(&mut self.code, default);
        self
    }

    pub fn ret(self) -> Self {
        self.op(op::RETURN)
    }

    pub fn unreachable(self) -> Self {
        self.op(op::UNREACHABLE)
    }

    pub fn nop(self) -> Self {
        self.op(op::NOP)
    }

    pub fn drop_(self) -> Self {
        self.op(op::DROP)
    }

    pub fn select(self) -> Self {
        self.op(op::SELECT)
    }
}

#[derive(Debug, Clone)]
struct FuncDef {
    ty: TypeIdx,
    locals: Vec<ValType>,
    code: Vec<u8>,
}

/// Builder for a complete module binary.
#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    types: Vec<FuncType>,
    imports: Vec<(String, String, TypeIdx)>,
    funcs: Vec<FuncDef>,
    table: Option<Limits>,
    memory: Option<Limits>,
    globals: Vec<(GlobalType, ConstExpr)>,
    exports: Vec<(String, u8, u32)>,
    start: Option<FuncIdx>,
    elements: Vec<(u32, Vec<FuncIdx>)>,
    data: Vec<(u32, Vec<u8>)>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `ty`, adding it if unseen.
    pub fn type_index(&mut self, ty: &FuncType) -> TypeIdx {
        match self.types.iter().position(|t| t == ty) {
            Some(i) => i as TypeIdx,
            None => {
                self.types.push(ty.clone());
                (self.types.len() - 1) as TypeIdx
            }
        }
    }

    pub fn import_func(&mut self, module: &str, name: &str, ty: &FuncType) -> FuncIdx {
        let ty = self.type_index(ty);
        self.imports.push((module.to_owned(), name.to_owned(), ty));
        (self.imports.len() - 1) as FuncIdx
    }

    pub fn func(&mut self, ty: &FuncType, locals: &[ValType], body: Body) -> FuncIdx {
        let ty = self.type_index(ty);
        let mut code = body.code;
        code.push(op::END);
        self.funcs.push(FuncDef {
            ty,
            locals: locals.to_vec(),
            code,
        });
        (self.imports.len() + self.funcs.len() - 1) as FuncIdx
    }

    pub fn memory(&mut self, min: u32, max: Option<u32>) -> &mut Self {
        self.memory = Some(Limits::new(min, max));
        self
    }

    pub fn table(&mut self, min: u32, max: Option<u32>) -> &mut Self {
        self.table = Some(Limits::new(min, max));
        self
    }

    pub fn global(&mut self, ty: GlobalType, init: ConstExpr) -> GlobalIdx {
        self.globals.push((ty, init));
        (self.globals.len() - 1) as GlobalIdx
    }

    pub fn export_func(&mut self, name: &str, f: FuncIdx) -> &mut Self {
        self.exports.push((name.to_owned(), 0x00, f));
        self
    }

    pub fn export_memory(&mut self, name: &str) -> &mut Self {
        self.exports.push((name.to_owned(), 0x02, 0));
        self
    }

    pub fn start(&mut self, f: FuncIdx) -> &mut Self {
        self.start = Some(f);
        self
    }

    pub fn elements(&mut self, offset: u32, funcs: &[FuncIdx]) -> &mut Self {
        self.elements.push((offset, funcs.to_vec()));
        self
    }

    pub fn data(&mut self, offset: u32, bytes: &[u8]) -> &mut Self {
        self.data.push((offset, bytes.to_vec()));
        self
    }

    /// Encode the module.
    pub fn build(&self) -> Vec<u8> {
        let mut out = b"\0asm".to_vec();
        out.extend_from_slice(&1u32.to_le_bytes());

        section(&mut out, 1, self.types.len(), |s| {
            for ty in &self.types {
                s.push(0x60);
                val_types(s, &ty.params);
                val_types(s, &ty.results);
            }
        });
        section(&mut out, 2, self.imports.len(), |s| {
            for (module, name, ty) in &self.imports {
                write_name(s, module);
                write_name(s, name);
                s.push(0x00);
                write_uleb_u32(s, *ty);
            }
        });
        section(&mut out, 3, self.funcs.len(), |s| {
            for f in &self.funcs {
                write_uleb_u32(s, f.ty);
            }
        });
        section(&mut out, 4, usize::from(self.table.is_some()), |s| {
            if let Some(limits) = &self.table {
                s.push(0x70);
                write_limits(s, limits);
            }
        });
        section(&mut out, 5, usize::from(self.memory.is_some()), |s| {
            if let Some(limits) = &self.memory {
                write_limits(s, limits);
            }
        });
        section(&mut out, 6, self.globals.len(), |s| {
            for (ty, init) in &self.globals {
                s.push(ty.val_type.code());
                s.push(u8::from(ty.mutable));
                write_const_expr(s, *init);
            }
        });
        section(&mut out, 7, self.exports.len(), |s| {
            for (name, kind, index) in &self.exports {
                write_name(s, name);
                s.push(*kind);
                write_uleb_u32(s, *index);
            }
        });
        if let Some(start) = self.start {
            let mut payload = Vec::new();
            write_uleb_u32(&mut payload, start);
            raw_section(&mut out, 8, &payload);
        }
        section(&mut out, 9, self.elements.len(), |s| {
            for (offset, funcs) in &self.elements {
                write_uleb_u32(s, 0);
                write_const_expr(s, ConstExpr::I32(*offset as i32));
                write_uleb_u32(s, funcs.len() as u32);
                for &f in funcs {
                    write_uleb_u32(s, f);
                }
            }
        });
        section(&mut out, 10, self.funcs.len(), |s| {
            for f in &self.funcs {
                let mut body = Vec::new();
                write_uleb_u32(&mut body, f.locals.len() as u32);
                for t in &f.locals {
                    write_uleb_u32(&mut body, 1);
                    body.push(t.code());
                }
                body.extend_from_slice(&f.code);
                write_uleb_u32(s, body.len() as u32);
                s.extend_from_slice(&body);
            }
        });
        section(&mut out, 11, self.data.len(), |s| {
            for (offset, bytes) in &self.data {
                write_uleb_u32(s, 0);
                write_const_expr(s, ConstExpr::I32(*offset as i32));
                write_uleb_u32(s, bytes.len() as u32);
                s.extend_from_slice(bytes);
            }
        });
        out
    }
}

/// Emit a vector section with `count` items; omitted when empty.
fn section(out: &mut Vec<u8>, id: u8, count: usize, items: impl FnOnce(&mut Vec<u8>)) {
    if count == 0 {
        return;
    }
    let mut payload = Vec::new();
    write_uleb_u32(&mut payload, count as u32);
    items(&mut payload);
    raw_section(out, id, &payload);
}

fn raw_section(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    write_uleb_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    write_uleb_u32(out, name.len() as u32);
    out.extend_from_slice(name.as_bytes());
}

fn val_types(out: &mut Vec<u8>, types: &[ValType]) {
    write_uleb_u32(out, types.len() as u32);
    out.extend(types.iter().map(|t| t.code()));
}

fn write_limits(out: &mut Vec<u8>, limits: &Limits) {
    match limits.max {
        None => {
            out.push(0x00);
            write_uleb_u32(out, limits.min);
        }
        Some(max) => {
            out.push(0x01);
            write_uleb_u32(out, limits.min);
            write_uleb_u32(out, max);
        }
    }
}

fn write_const_expr(out: &mut Vec<u8>, expr: ConstExpr) {
    match expr {
        ConstExpr::I32(v) => {
            out.push(op::I32_CONST);
            write_sleb_i32(out, v);
        }
        ConstExpr::I64(v) => {
            out.push(op::I64_CONST);
            write_sleb_i64(out, v);
        }
        ConstExpr::F32(b) => {
            out.push(op::F32_CONST);
            out.extend_from_slice(&b.to_le_bytes());
        }
        ConstExpr::F64(b) => {
            out.push(op::F64_CONST);
            out.extend_from_slice(&b.to_le_bytes());
        }
        ConstExpr::GlobalGet(i) => {
            out.push(op::GLOBAL_GET);
            write_uleb_u32(out, i);
        }
    }
    out.push(op::END);
}
