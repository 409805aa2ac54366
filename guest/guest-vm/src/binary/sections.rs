//! Section-level decoding of a complete guest module.

use super::{
    cursor::Cursor,
    leb128,
    reader::{read_len_prefixed_bytes, read_name, read_vec},
    BinaryReadError, Result,
};
use crate::model::{
    CodeBody, ConstExpr, DataSegment, ElementSegment, Export, ExportDesc, FuncType, Global,
    GlobalType, Import, ImportDesc, Limits, LocalDecl, MemoryType, Module, TableType, ValType,
};

const MAGIC: [u8; 4] = *b"\0asm";
const VERSION: u32 = 1;
const FUNCREF: u8 = 0x70;
const FUNC_FORM: u8 = 0x60;

/// Standard section identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        use SectionId::*;
        Some(match b {
            0 => Custom,
            1 => Type,
            2 => Import,
            3 => Function,
            4 => Table,
            5 => Memory,
            6 => Global,
            7 => Export,
            8 => Start,
            9 => Element,
            10 => Code,
            11 => Data,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let at = cur.offset();
    let id = SectionId::from_byte(cur.read_u8()?).ok_or(BinaryReadError::Malformed {
        offset: at,
        msg: "unknown section id",
    })?;
    let payload_len = leb128::read_uleb_u32(cur)?;
    Ok(SectionHeader {
        id,
        payload_len,
        payload_offset: cur.offset(),
    })
}

fn malformed<T>(cur: &Cursor, msg: &'static str) -> Result<T> {
    Err(BinaryReadError::Malformed {
        offset: cur.offset(),
        msg,
    })
}

fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    let b = cur.read_u8()?;
    match ValType::from_code(b) {
        Some(t) => Ok(t),
        None => malformed(cur, "invalid value type"),
    }
}

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            Ok(Limits::new(min, Some(max)))
        }
        _ => malformed(cur, "invalid limits flag"),
    }
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    if cur.read_u8()? != FUNC_FORM {
        return malformed(cur, "expected function type");
    }
    let params = read_vec(cur, read_val_type)?;
    let results = read_vec(cur, read_val_type)?;
    Ok(FuncType { params, results })
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    if cur.read_u8()? != FUNCREF {
        return malformed(cur, "only funcref tables are supported");
    }
    Ok(TableType {
        limits: read_limits(cur)?,
    })
}

fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_val_type(cur)?;
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => return malformed(cur, "invalid global mutability"),
    };
    Ok(GlobalType { val_type, mutable })
}

/// Read a constant expression: one constant instruction followed by `end`.
fn read_const_expr(cur: &mut Cursor) -> Result<ConstExpr> {
    let expr = match cur.read_u8()? {
        0x41 => ConstExpr::I32(leb128::read_sleb_i32(cur)?),
        0x42 => ConstExpr::I64(leb128::read_sleb_i64(cur)?),
        0x43 => ConstExpr::F32(u32::from_le_bytes(cur.read_array()?)),
        0x44 => ConstExpr::F64(u64::from_le_bytes(cur.read_array()?)),
        0x23 => ConstExpr::GlobalGet(leb128::read_uleb_u32(cur)?),
        _ => return malformed(cur, "unsupported constant expression"),
    };
    if cur.read_u8()? != 0x0B {
        return malformed(cur, "constant expression missing end");
    }
    Ok(expr)
}

fn read_import(cur: &mut Cursor) -> Result<Import> {
    let module = read_name(cur)?;
    let name = read_name(cur)?;
    let desc = match cur.read_u8()? {
        0x00 => ImportDesc::Func(leb128::read_uleb_u32(cur)?),
        0x01 => ImportDesc::Table(read_table_type(cur)?),
        0x02 => ImportDesc::Memory(MemoryType {
            limits: read_limits(cur)?,
        }),
        0x03 => ImportDesc::Global(read_global_type(cur)?),
        _ => return malformed(cur, "invalid import kind"),
    };
    Ok(Import { module, name, desc })
}

fn read_export(cur: &mut Cursor) -> Result<Export> {
    let name = read_name(cur)?;
    let kind = cur.read_u8()?;
    let index = leb128::read_uleb_u32(cur)?;
    let desc = match kind {
        0x00 => ExportDesc::Func(index),
        0x01 => ExportDesc::Table(index),
        0x02 => ExportDesc::Memory(index),
        0x03 => ExportDesc::Global(index),
        _ => return malformed(cur, "invalid export kind"),
    };
    Ok(Export { name, desc })
}

fn read_element(cur: &mut Cursor) -> Result<ElementSegment> {
    let table = leb128::read_uleb_u32(cur)?;
    if table != 0 {
        return malformed(cur, "only active segments for table 0 are supported");
    }
    let offset = read_const_expr(cur)?;
    let init = read_vec(cur, leb128::read_uleb_u32)?;
    Ok(ElementSegment {
        table,
        offset,
        init,
    })
}

fn read_data(cur: &mut Cursor) -> Result<DataSegment> {
    let memory = leb128::read_uleb_u32(cur)?;
    if memory != 0 {
        return malformed(cur, "only active segments for memory 0 are supported");
    }
    let offset = read_const_expr(cur)?;
    let init = read_len_prefixed_bytes(cur)?.to_vec();
    Ok(DataSegment {
        memory,
        offset,
        init,
    })
}

fn read_code(cur: &mut Cursor) -> Result<CodeBody> {
    let size = leb128::read_uleb_u32(cur)? as usize;
    let mut body = Cursor::new(cur.read_bytes(size)?);
    let locals = read_vec(&mut body, |c| {
        let count = leb128::read_uleb_u32(c)?;
        let val_type = read_val_type(c)?;
        Ok(LocalDecl { count, val_type })
    })?;
    let declared: u64 = locals.iter().map(|d| u64::from(d.count)).sum();
    if declared > u64::from(u32::MAX) {
        return malformed(&body, "too many locals");
    }
    let code = body.read_bytes(body.remaining())?.to_vec();
    if code.last() != Some(&0x0B) {
        return malformed(&body, "function body must end with end");
    }
    Ok(CodeBody { locals, body: code })
}

/// Parse a complete module.
pub fn parse_module(bytes: &[u8]) -> Result<Module> {
    let mut cur = Cursor::new(bytes);
    if cur.read_array::<4>()? != MAGIC {
        return Err(BinaryReadError::Malformed {
            offset: 0,
            msg: "bad magic number",
        });
    }
    if cur.read_u32_le()? != VERSION {
        return Err(BinaryReadError::Malformed {
            offset: 4,
            msg: "unsupported binary version",
        });
    }

    let mut module = Module::default();
    let mut last: Option<SectionId> = None;

    while !cur.is_eof() {
        let header = read_section_header(&mut cur)?;
        let mut payload = Cursor::new(cur.read_bytes(header.payload_len as usize)?);

        if header.id == SectionId::Custom {
            read_name(&mut payload)?;
            continue;
        }
        if last.is_some_and(|prev| header.id <= prev) {
            return Err(BinaryReadError::Malformed {
                offset: header.payload_offset,
                msg: "section out of order or duplicated",
            });
        }
        last = Some(header.id);

        let p = &mut payload;
        match header.id {
            SectionId::Type => module.types = read_vec(p, read_func_type)?,
            SectionId::Import => module.imports = read_vec(p, read_import)?,
            SectionId::Function => module.funcs = read_vec(p, leb128::read_uleb_u32)?,
            SectionId::Table => module.tables = read_vec(p, read_table_type)?,
            SectionId::Memory => {
                module.memories = read_vec(p, |c| {
                    Ok(MemoryType {
                        limits: read_limits(c)?,
                    })
                })?;
                if module.memories.len() > 1 {
                    return malformed(p, "multiple memories");
                }
            }
            SectionId::Global => {
                module.globals = read_vec(p, |c| {
                    let ty = read_global_type(c)?;
                    let init = read_const_expr(c)?;
                    Ok(Global { ty, init })
                })?
            }
            SectionId::Export => module.exports = read_vec(p, read_export)?,
            SectionId::Start => module.start = Some(leb128::read_uleb_u32(p)?),
            SectionId::Element => module.elements = read_vec(p, read_element)?,
            SectionId::Code => module.codes = read_vec(p, read_code)?,
            SectionId::Data => module.data = read_vec(p, read_data)?,
            SectionId::Custom => {}
        }

        if !payload.is_eof() {
            return malformed(&payload, "section payload not fully consumed");
        }
    }

    if module.funcs.len() != module.codes.len() {
        return Err(BinaryReadError::Malformed {
            offset: bytes.len(),
            msg: "function and code section counts differ",
        });
    }
    Ok(module)
}
