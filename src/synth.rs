//! Synthesis of the collector's static registration method.
//!
//! The generated body is straight-line code with no branches and no locals,
//! so no stack map frames are needed:
//!
//! ```text
//! new           Impl
//! dup
//! invokespecial Impl.<init>()V
//! invokevirtual Impl.register()V
//! ...
//! return
//! ```

use serde::Serialize;

use crate::classfile::{
    ACC_PUBLIC, ACC_STATIC, ClassFile, ClassFileError, CodeAttribute, MAX_CODE_LENGTH,
};
use crate::config::RegisterMethod;

const NEW: u8 = 0xbb;
const DUP: u8 = 0x59;
const INVOKESPECIAL: u8 = 0xb7;
const INVOKEVIRTUAL: u8 = 0xb6;
const RETURN: u8 = 0xb1;

const CONSTRUCTOR: &str = "<init>";
const NO_ARG_VOID: &str = "()V";

/// Bytes emitted per implementer: new(3) dup(1) invokespecial(3) invokevirtual(3).
const BYTES_PER_IMPLEMENTER: usize = 10;

/// Replaces `method` on `class` with a body that constructs every
/// implementer and calls its registration entry point, in slice order.
/// Returns how many pre-existing methods were removed.
pub fn synthesize(
    class: &mut ClassFile,
    method: &RegisterMethod,
    implementers: &[String],
) -> Result<usize, ClassFileError> {
    let code_len = implementers.len() * BYTES_PER_IMPLEMENTER + 1;
    if code_len > MAX_CODE_LENGTH {
        return Err(ClassFileError::CodeTooLarge(code_len));
    }

    let removed = class.remove_methods(&method.name, &method.descriptor);

    let mut code = Vec::with_capacity(code_len);
    for name in implementers {
        let pool = &mut class.constant_pool;
        let class_index = pool.intern_class(name)?;
        let init = pool.intern_method_ref(name, CONSTRUCTOR, NO_ARG_VOID)?;
        let entry = pool.intern_method_ref(name, &method.name, &method.descriptor)?;

        code.push(NEW);
        code.extend_from_slice(&class_index.to_be_bytes());
        code.push(DUP);
        code.push(INVOKESPECIAL);
        code.extend_from_slice(&init.to_be_bytes());
        code.push(INVOKEVIRTUAL);
        code.extend_from_slice(&entry.to_be_bytes());
    }
    code.push(RETURN);

    let body = CodeAttribute {
        max_stack: if implementers.is_empty() { 0 } else { 2 },
        max_locals: 0,
        code,
    };
    class.add_method(
        ACC_PUBLIC | ACC_STATIC,
        &method.name,
        &method.descriptor,
        Some(&body),
    )?;
    Ok(removed)
}

/// Parses `bytes`, rewrites the registration method and serializes again.
pub fn rewrite_collector(
    bytes: &[u8],
    method: &RegisterMethod,
    implementers: &[String],
) -> Result<Vec<u8>, ClassFileError> {
    let mut class = ClassFile::parse(bytes)?;
    synthesize(&mut class, method, implementers)?;
    Ok(class.to_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    New {
        class: String,
    },
    Dup,
    InvokeSpecial {
        owner: String,
        name: String,
        descriptor: String,
    },
    InvokeVirtual {
        owner: String,
        name: String,
        descriptor: String,
    },
    Return,
    /// Anything outside the synthesized vocabulary; decoding stops here.
    Other {
        opcode: u8,
        offset: usize,
    },
}

/// Decodes a registration body back into instructions.
pub fn decode_body(class: &ClassFile, code: &[u8]) -> Result<Vec<Instruction>, ClassFileError> {
    let pool = &class.constant_pool;
    let operand = |offset: usize| -> Result<u16, ClassFileError> {
        match code.get(offset + 1..offset + 3) {
            Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
            None => Err(ClassFileError::Truncated {
                offset: offset + 1,
                wanted: 2,
            }),
        }
    };

    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        match op {
            NEW => {
                let class = pool.class_name(operand(pc)?)?.into_owned();
                out.push(Instruction::New { class });
                pc += 3;
            }
            DUP => {
                out.push(Instruction::Dup);
                pc += 1;
            }
            INVOKESPECIAL | INVOKEVIRTUAL => {
                let (owner, name, descriptor) = pool.method_ref(operand(pc)?)?;
                let (owner, name, descriptor) =
                    (owner.into_owned(), name.into_owned(), descriptor.into_owned());
                out.push(if op == INVOKESPECIAL {
                    Instruction::InvokeSpecial {
                        owner,
                        name,
                        descriptor,
                    }
                } else {
                    Instruction::InvokeVirtual {
                        owner,
                        name,
                        descriptor,
                    }
                });
                pc += 3;
            }
            RETURN => {
                out.push(Instruction::Return);
                pc += 1;
            }
            opcode => {
                out.push(Instruction::Other { opcode, offset: pc });
                break;
            }
        }
    }
    Ok(out)
}
