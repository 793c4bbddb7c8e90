//! Structural reader and writer for JVM class files.
//!
//! Only the parts the weaver looks at are decoded: the constant pool, the
//! class header, the member tables and class-level annotation descriptors.
//! Attribute bodies stay raw, so a parsed class that is not modified
//! serializes back to exactly the bytes it was read from.

use std::borrow::Cow;
use thiserror::Error;

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;

pub const CODE_ATTRIBUTE: &str = "Code";
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";

const MAX_POOL_ENTRIES: usize = u16::MAX as usize;
pub const MAX_CODE_LENGTH: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("not a class file (magic 0x{0:08x})")]
    BadMagic(u32),
    #[error("class data truncated at offset {offset} (needed {wanted} more bytes)")]
    Truncated { offset: usize, wanted: usize },
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: usize },
    #[error("constant pool index {index} is not a {expected} entry")]
    BadConstant { index: u16, expected: &'static str },
    #[error("constant pool index {index} holds malformed modified UTF-8")]
    BadUtf8 { index: u16 },
    #[error("wide constant at index {index} has no room for its second slot")]
    WideConstantOverflow { index: usize },
    #[error("{0} trailing bytes after class data")]
    TrailingBytes(usize),
    #[error("unknown annotation element tag {0:#04x}")]
    UnknownElementTag(u8),
    #[error("constant pool is full")]
    ConstantPoolFull,
    #[error("method code is too large ({0} bytes)")]
    CodeTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Slot 0 and the shadow slot following a `Long` or `Double`.
    Unusable,
}

impl Constant {
    fn tag(&self) -> Option<u8> {
        Some(match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::Fieldref(..) => 9,
            Constant::Methodref(..) => 10,
            Constant::InterfaceMethodref(..) => 11,
            Constant::NameAndType(..) => 12,
            Constant::MethodHandle(..) => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic(..) => 17,
            Constant::InvokeDynamic(..) => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
            Constant::Unusable => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }
}

impl ConstantPool {
    /// Value of the `constant_pool_count` header field.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(usize::from(index))
    }

    pub fn utf8(&self, index: u16) -> Result<Cow<'_, str>> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => {
                decode_modified_utf8(bytes).ok_or(ClassFileError::BadUtf8 { index })
            }
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<Cow<'_, str>> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolves a `Methodref` into (owner, name, descriptor).
    pub fn method_ref(&self, index: u16) -> Result<(Cow<'_, str>, Cow<'_, str>, Cow<'_, str>)> {
        let Some(Constant::Methodref(owner, nat)) = self.get(index) else {
            return Err(ClassFileError::BadConstant {
                index,
                expected: "Methodref",
            });
        };
        let Some(Constant::NameAndType(name, descriptor)) = self.get(*nat) else {
            return Err(ClassFileError::BadConstant {
                index: *nat,
                expected: "NameAndType",
            });
        };
        Ok((
            self.class_name(*owner)?,
            self.utf8(*name)?,
            self.utf8(*descriptor)?,
        ))
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        let bytes = encode_modified_utf8(value);
        if let Some(index) = self.position(|c| matches!(c, Constant::Utf8(b) if *b == *bytes)) {
            return Ok(index);
        }
        self.push(Constant::Utf8(bytes.into_owned()))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType(name, descriptor))
    }

    pub fn intern_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let owner = self.intern_class(owner)?;
        let nat = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::Methodref(owner, nat))
    }

    fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.position(|c| *c == constant) {
            return Ok(index);
        }
        self.push(constant)
    }

    fn position(&self, pred: impl Fn(&Constant) -> bool) -> Option<u16> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, c)| pred(c))
            .map(|(i, _)| i as u16)
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        if self.entries.len() >= MAX_POOL_ENTRIES {
            return Err(ClassFileError::ConstantPoolFull);
        }
        let index = self.entries.len() as u16;
        self.entries.push(constant);
        Ok(index)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let count = usize::from(r.u16()?);
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);
        while entries.len() < count {
            let index = entries.len();
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = usize::from(r.u16()?);
                    Constant::Utf8(r.take(len)?.to_vec())
                }
                3 => Constant::Integer(r.u32()?),
                4 => Constant::Float(r.u32()?),
                5 => Constant::Long(r.u64()?),
                6 => Constant::Double(r.u64()?),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::Fieldref(r.u16()?, r.u16()?),
                10 => Constant::Methodref(r.u16()?, r.u16()?),
                11 => Constant::InterfaceMethodref(r.u16()?, r.u16()?),
                12 => Constant::NameAndType(r.u16()?, r.u16()?),
                15 => Constant::MethodHandle(r.u8()?, r.u16()?),
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic(r.u16()?, r.u16()?),
                18 => Constant::InvokeDynamic(r.u16()?, r.u16()?),
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                tag => return Err(ClassFileError::UnknownConstantTag { tag, index }),
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            if wide && index + 1 >= count {
                return Err(ClassFileError::WideConstantOverflow { index });
            }
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }
        Ok(Self { entries })
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.count());
        for constant in &self.entries {
            let Some(tag) = constant.tag() else {
                continue;
            };
            out.push(tag);
            match constant {
                Constant::Utf8(bytes) => {
                    put_u16(out, bytes.len() as u16);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) | Constant::Float(v) => put_u32(out, *v),
                Constant::Long(v) | Constant::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
                Constant::Class(a)
                | Constant::String(a)
                | Constant::MethodType(a)
                | Constant::Module(a)
                | Constant::Package(a) => put_u16(out, *a),
                Constant::Fieldref(a, b)
                | Constant::Methodref(a, b)
                | Constant::InterfaceMethodref(a, b)
                | Constant::NameAndType(a, b)
                | Constant::Dynamic(a, b)
                | Constant::InvokeDynamic(a, b) => {
                    put_u16(out, *a);
                    put_u16(out, *b);
                }
                Constant::MethodHandle(kind, a) => {
                    out.push(*kind);
                    put_u16(out, *a);
                }
                Constant::Unusable => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// A field or method table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Member {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<Cow<'a, str>> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<Cow<'a, str>> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is(&self, pool: &ConstantPool, name: &str, descriptor: &str) -> bool {
        matches!(
            (self.name(pool), self.descriptor(pool)),
            (Ok(n), Ok(d)) if n == name && d == descriptor
        )
    }

    pub fn code(&self, pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        for attr in &self.attributes {
            if pool.utf8(attr.name_index)? == CODE_ATTRIBUTE {
                return CodeAttribute::decode(&attr.info).map(Some);
            }
        }
        Ok(None)
    }
}

/// Body of a `Code` attribute. Exception handlers and nested attributes are
/// not modelled; `encode` always writes them empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
}

impl CodeAttribute {
    pub fn decode(info: &[u8]) -> Result<Self> {
        let mut r = Reader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let len = r.u32()? as usize;
        let code = r.take(len)?.to_vec();
        Ok(Self {
            max_stack,
            max_locals,
            code,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.code.len() > MAX_CODE_LENGTH {
            return Err(ClassFileError::CodeTooLarge(self.code.len()));
        }
        let mut out = Vec::with_capacity(12 + self.code.len());
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        put_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// An empty class with the given internal names, targeting Java 8.
    pub fn new(name: &str, super_name: &str) -> Result<Self> {
        let mut constant_pool = ConstantPool::default();
        let this_class = constant_pool.intern_class(name)?;
        let super_class = constant_pool.intern_class(super_name)?;
        Ok(Self {
            minor_version: 0,
            major_version: 52,
            constant_pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::read(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let interfaces = (0..interface_count)
            .map(|_| r.u16())
            .collect::<Result<Vec<_>>>()?;
        let fields = read_members(&mut r)?;
        let methods = read_members(&mut r)?;
        let attributes = read_attributes(&mut r)?;
        if r.remaining() > 0 {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.name()?;
        Ok(class)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024);
        put_u32(&mut out, MAGIC);
        put_u16(&mut out, self.minor_version);
        put_u16(&mut out, self.major_version);
        self.constant_pool.write(&mut out);
        put_u16(&mut out, self.access_flags);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, self.interfaces.len() as u16);
        for iface in &self.interfaces {
            put_u16(&mut out, *iface);
        }
        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        out
    }

    /// Internal (slash separated) name of this class.
    pub fn name(&self) -> Result<Cow<'_, str>> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<Cow<'_, str>>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<Cow<'_, str>>> {
        self.interfaces
            .iter()
            .map(|i| self.constant_pool.class_name(*i))
            .collect()
    }

    /// Type descriptors of class-level annotations, visible ones first.
    pub fn annotation_descriptors(&self) -> Result<Vec<String>> {
        let mut descriptors = Vec::new();
        for wanted in [RUNTIME_VISIBLE_ANNOTATIONS, RUNTIME_INVISIBLE_ANNOTATIONS] {
            for attr in &self.attributes {
                if self.constant_pool.utf8(attr.name_index)? != wanted {
                    continue;
                }
                for type_index in read_annotation_types(&attr.info)? {
                    descriptors.push(self.constant_pool.utf8(type_index)?.into_owned());
                }
            }
        }
        Ok(descriptors)
    }

    pub fn add_interface(&mut self, internal_name: &str) -> Result<()> {
        let index = self.constant_pool.intern_class(internal_name)?;
        if !self.interfaces.contains(&index) {
            self.interfaces.push(index);
        }
        Ok(())
    }

    /// Adds a marker annotation (no element values) to the class.
    pub fn add_annotation(&mut self, descriptor: &str, visible: bool) -> Result<()> {
        let attr_name = if visible {
            RUNTIME_VISIBLE_ANNOTATIONS
        } else {
            RUNTIME_INVISIBLE_ANNOTATIONS
        };
        let name_index = self.constant_pool.intern_utf8(attr_name)?;
        let type_index = self.constant_pool.intern_utf8(descriptor)?;

        let mut annotation = Vec::with_capacity(4);
        put_u16(&mut annotation, type_index);
        put_u16(&mut annotation, 0);

        match self.attributes.iter_mut().find(|a| a.name_index == name_index) {
            Some(existing) if existing.info.len() >= 2 => {
                let count = u16::from_be_bytes([existing.info[0], existing.info[1]]);
                existing.info[..2].copy_from_slice(&(count + 1).to_be_bytes());
                existing.info.extend_from_slice(&annotation);
            }
            _ => {
                let mut info = Vec::with_capacity(6);
                put_u16(&mut info, 1);
                info.extend_from_slice(&annotation);
                self.attributes.push(Attribute { name_index, info });
            }
        }
        Ok(())
    }

    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<&CodeAttribute>,
    ) -> Result<()> {
        let name_index = self.constant_pool.intern_utf8(name)?;
        let descriptor_index = self.constant_pool.intern_utf8(descriptor)?;
        let mut attributes = Vec::new();
        if let Some(code) = code {
            let code_name = self.constant_pool.intern_utf8(CODE_ATTRIBUTE)?;
            attributes.push(Attribute {
                name_index: code_name,
                info: code.encode()?,
            });
        }
        self.methods.push(Member {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    /// Drops every method matching `name` + `descriptor`, returning how many.
    pub fn remove_methods(&mut self, name: &str, descriptor: &str) -> usize {
        let before = self.methods.len();
        let pool = &self.constant_pool;
        self.methods.retain(|m| !m.is(pool, name, descriptor));
        before - self.methods.len()
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Member> {
        self.methods
            .iter()
            .find(|m| m.is(&self.constant_pool, name, descriptor))
    }
}

fn read_members(r: &mut Reader<'_>) -> Result<Vec<Member>> {
    let count = r.u16()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        members.push(Member {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: read_attributes(r)?,
        });
    }
    Ok(members)
}

fn read_attributes(r: &mut Reader<'_>) -> Result<Vec<Attribute>> {
    let count = r.u16()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        attributes.push(Attribute {
            name_index,
            info: r.take(len)?.to_vec(),
        });
    }
    Ok(attributes)
}

fn write_members(out: &mut Vec<u8>, members: &[Member]) {
    put_u16(out, members.len() as u16);
    for m in members {
        put_u16(out, m.access_flags);
        put_u16(out, m.name_index);
        put_u16(out, m.descriptor_index);
        write_attributes(out, &m.attributes);
    }
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) {
    put_u16(out, attributes.len() as u16);
    for a in attributes {
        put_u16(out, a.name_index);
        put_u32(out, a.info.len() as u32);
        out.extend_from_slice(&a.info);
    }
}

fn read_annotation_types(info: &[u8]) -> Result<Vec<u16>> {
    let mut r = Reader::new(info);
    let count = r.u16()?;
    let mut types = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        types.push(read_annotation(&mut r)?);
    }
    Ok(types)
}

fn read_annotation(r: &mut Reader<'_>) -> Result<u16> {
    let type_index = r.u16()?;
    let pairs = r.u16()?;
    for _ in 0..pairs {
        r.u16()?;
        skip_element_value(r)?;
    }
    Ok(type_index)
}

fn skip_element_value(r: &mut Reader<'_>) -> Result<()> {
    match r.u8()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            r.u16()?;
        }
        b'e' => {
            r.u16()?;
            r.u16()?;
        }
        b'@' => {
            read_annotation(r)?;
        }
        b'[' => {
            let count = r.u16()?;
            for _ in 0..count {
                skip_element_value(r)?;
            }
        }
        tag => return Err(ClassFileError::UnknownElementTag(tag)),
    }
    Ok(())
}

/// Decodes the JVM's modified UTF-8: NUL is `C0 80` and supplementary
/// characters are stored as two 3-byte surrogates. Returns `None` on
/// malformed input, including unpaired surrogates.
fn decode_modified_utf8(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if !bytes.iter().any(|&b| b == 0 || b >= 0xf0)
        && let Ok(s) = std::str::from_utf8(bytes)
    {
        return Some(Cow::Borrowed(s));
    }

    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let (unit, len) = decode_unit(&bytes[i..])?;
        i += len;
        if (0xd800..0xdc00).contains(&unit) {
            let (low, len) = decode_unit(&bytes[i..])?;
            if !(0xdc00..0xe000).contains(&low) {
                return None;
            }
            i += len;
            let c = 0x10000 + ((u32::from(unit) - 0xd800) << 10) + (u32::from(low) - 0xdc00);
            out.push(char::from_u32(c)?);
        } else {
            out.push(char::from_u32(u32::from(unit))?);
        }
    }
    Some(Cow::Owned(out))
}

/// One UTF-16 code unit and the number of bytes it took.
fn decode_unit(bytes: &[u8]) -> Option<(u16, usize)> {
    let cont = |b: u8| (b & 0xc0 == 0x80).then_some(u16::from(b & 0x3f));
    match *bytes.first()? {
        b @ 0x01..=0x7f => Some((u16::from(b), 1)),
        b @ 0xc0..=0xdf => {
            let unit = (u16::from(b & 0x1f) << 6) | cont(*bytes.get(1)?)?;
            Some((unit, 2))
        }
        b @ 0xe0..=0xef => {
            let unit = (u16::from(b & 0x0f) << 12)
                | (cont(*bytes.get(1)?)? << 6)
                | cont(*bytes.get(2)?)?;
            Some((unit, 3))
        }
        _ => None,
    }
}

fn encode_modified_utf8(value: &str) -> Cow<'_, [u8]> {
    if !value.chars().any(|c| c == '\0' || u32::from(c) > 0xffff) {
        return Cow::Borrowed(value.as_bytes());
    }

    let mut out = Vec::with_capacity(value.len() + 4);
    let mut units = [0u16; 2];
    for c in value.chars() {
        if c == '\0' {
            out.extend_from_slice(&[0xc0, 0x80]);
            continue;
        }
        for unit in c.encode_utf16(&mut units).iter() {
            match *unit {
                u @ 0x01..=0x7f => out.push(u as u8),
                u @ 0x80..=0x7ff => {
                    out.push(0xc0 | (u >> 6) as u8);
                    out.push(0x80 | (u & 0x3f) as u8);
                }
                u => {
                    out.push(0xe0 | (u >> 12) as u8);
                    out.push(0x80 | ((u >> 6) & 0x3f) as u8);
                    out.push(0x80 | (u & 0x3f) as u8);
                }
            }
        }
    }
    Cow::Owned(out)
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ClassFileError::Truncated {
                offset: self.pos,
                wanted: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let hi = u64::from(self.u32()?);
        let lo = u64::from(self.u32()?);
        Ok(hi << 32 | lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_class() -> ClassFile {
        let mut class = ClassFile::new("com/example/Sample", "java/lang/Object").unwrap();
        class.add_interface("java/io/Serializable").unwrap();
        class.add_annotation("Lcom/example/Marker;", false).unwrap();
        class
            .add_method(
                ACC_PUBLIC,
                "<init>",
                "()V",
                Some(&CodeAttribute {
                    max_stack: 1,
                    max_locals: 1,
                    code: vec![0x2a, 0xb1],
                }),
            )
            .unwrap();
        class
    }

    #[test]
    fn parse_reads_back_header_interfaces_and_annotations() {
        let bytes = sample_class().to_bytes();
        let class = ClassFile::parse(&bytes).unwrap();

        assert_eq!(class.name().unwrap(), "com/example/Sample");
        assert_eq!(class.super_name().unwrap().as_deref(), Some("java/lang/Object"));
        assert_eq!(class.interface_names().unwrap(), vec!["java/io/Serializable"]);
        assert_eq!(
            class.annotation_descriptors().unwrap(),
            vec!["Lcom/example/Marker;".to_string()]
        );
        let init = class.find_method("<init>", "()V").unwrap();
        let code = init.code(&class.constant_pool).unwrap().unwrap();
        assert_eq!(code.code, vec![0x2a, 0xb1]);
    }

    #[test]
    fn unmodified_class_serializes_to_identical_bytes() {
        let bytes = sample_class().to_bytes();
        let reparsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(reparsed.to_bytes(), bytes);
    }

    #[test]
    fn wide_constants_occupy_two_slots() {
        let mut class = sample_class();
        class.constant_pool.push(Constant::Long(7)).unwrap();
        class.constant_pool.push(Constant::Unusable).unwrap();
        let after = class.constant_pool.intern_utf8("tail").unwrap();

        let reparsed = ClassFile::parse(&class.to_bytes()).unwrap();
        assert_eq!(reparsed.constant_pool.utf8(after).unwrap(), "tail");
        assert_eq!(reparsed.constant_pool.get(after - 2), Some(&Constant::Long(7)));
    }

    #[test]
    fn annotations_with_element_values_are_skipped_correctly() {
        let mut class = ClassFile::new("a/B", "java/lang/Object").unwrap();
        let attr = class
            .constant_pool
            .intern_utf8(RUNTIME_VISIBLE_ANNOTATIONS)
            .unwrap();
        let first = class.constant_pool.intern_utf8("La/First;").unwrap();
        let key = class.constant_pool.intern_utf8("value").unwrap();
        let second = class.constant_pool.intern_utf8("La/Second;").unwrap();

        let mut info = Vec::new();
        put_u16(&mut info, 2);
        put_u16(&mut info, first);
        put_u16(&mut info, 1);
        put_u16(&mut info, key);
        info.push(b'[');
        put_u16(&mut info, 2);
        info.push(b'e');
        put_u16(&mut info, key);
        put_u16(&mut info, key);
        info.push(b'@');
        put_u16(&mut info, first);
        put_u16(&mut info, 0);
        put_u16(&mut info, second);
        put_u16(&mut info, 0);
        class.attributes.push(Attribute {
            name_index: attr,
            info,
        });

        let parsed = ClassFile::parse(&class.to_bytes()).unwrap();
        assert_eq!(
            parsed.annotation_descriptors().unwrap(),
            vec!["La/First;".to_string(), "La/Second;".to_string()]
        );
    }

    #[test]
    fn parse_rejects_garbage_and_truncation() {
        assert!(matches!(
            ClassFile::parse(b"dummy"),
            Err(ClassFileError::BadMagic(_))
        ));

        let bytes = sample_class().to_bytes();
        let err = ClassFile::parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassFileError::Truncated { .. }));
    }

    #[test]
    fn intern_reuses_existing_entries() {
        let mut pool = ConstantPool::default();
        let a = pool.intern_method_ref("a/B", "register", "()V").unwrap();
        let count = pool.count();
        let b = pool.intern_method_ref("a/B", "register", "()V").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), count);

        let (owner, name, desc) = pool.method_ref(a).unwrap();
        assert_eq!((&*owner, &*name, &*desc), ("a/B", "register", "()V"));
    }

    /// `a/X` + U+1F600 as a surrogate pair + a NUL, in modified UTF-8.
    const SUPPLEMENTARY_NAME: &[u8] = b"a/X\xed\xa0\xbd\xed\xb8\x80\xc0\x80Reg";

    #[test]
    fn modified_utf8_names_decode_and_intern_to_the_same_bytes() {
        let mut pool = ConstantPool::default();
        let raw = pool.push(Constant::Utf8(SUPPLEMENTARY_NAME.to_vec())).unwrap();
        let class = pool.push(Constant::Class(raw)).unwrap();

        let name = pool.class_name(class).unwrap().into_owned();
        assert_eq!(name, "a/X\u{1F600}\0Reg");

        let count = pool.count();
        assert_eq!(pool.intern_class(&name).unwrap(), class);
        assert_eq!(pool.count(), count);

        let mut fresh = ConstantPool::default();
        let index = fresh.intern_utf8(&name).unwrap();
        assert_eq!(
            fresh.get(index),
            Some(&Constant::Utf8(SUPPLEMENTARY_NAME.to_vec()))
        );
        assert_eq!(fresh.intern_utf8("plain/Name").unwrap(), index + 1);
        assert_eq!(fresh.get(index + 1), Some(&Constant::Utf8(b"plain/Name".to_vec())));
    }

    #[test]
    fn malformed_modified_utf8_is_rejected() {
        let mut pool = ConstantPool::default();
        let lone = pool.push(Constant::Utf8(b"a/\xed\xa0\xbdB".to_vec())).unwrap();
        let raw_nul = pool.push(Constant::Utf8(b"a/\0B".to_vec())).unwrap();
        let four_byte = pool
            .push(Constant::Utf8("a/\u{1F600}".as_bytes().to_vec()))
            .unwrap();

        for index in [lone, raw_nul, four_byte] {
            assert!(matches!(
                pool.utf8(index),
                Err(ClassFileError::BadUtf8 { index: i }) if i == index
            ));
        }
    }

    #[test]
    fn wide_constant_in_last_slot_is_rejected() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, MAGIC);
        put_u16(&mut bytes, 0);
        put_u16(&mut bytes, 52);
        put_u16(&mut bytes, 2);
        bytes.push(5);
        bytes.extend_from_slice(&7u64.to_be_bytes());
        bytes.extend_from_slice(&[0; 10]);

        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFileError::WideConstantOverflow { index: 1 })
        ));
    }

    #[test]
    fn remove_methods_matches_name_and_descriptor_exactly() {
        let mut class = sample_class();
        class.add_method(ACC_PUBLIC, "register", "()V", None).unwrap();
        class
            .add_method(ACC_PUBLIC, "register", "(I)V", None)
            .unwrap();

        assert_eq!(class.remove_methods("register", "()V"), 1);
        assert!(class.find_method("register", "()V").is_none());
        assert!(class.find_method("register", "(I)V").is_some());
    }
}
