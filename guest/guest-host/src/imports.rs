//! Host functions every guest program may import.

use guest_vm::model::{FuncType, ValType};
use guest_vm::{Imports, Trap, Value};

pub const HOST_MODULE: &str = "host";

/// `host.abort(code: i32)`: ends the current call with
/// [`crate::GuestFault::Abort`] carrying `code`.
pub fn host_imports() -> Imports {
    let mut imports = Imports::new();
    imports.define(
        HOST_MODULE,
        "abort",
        FuncType::new(&[ValType::I32], &[]),
        |args| match args {
            [Value::I32(code)] => Err(Trap::Abort(*code)),
            _ => Err(Trap::TypeMismatch("host.abort expects one i32")),
        },
    );
    imports
}
