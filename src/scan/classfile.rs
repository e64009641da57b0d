//! Constant-pool reader for compiled class files.
//!
//! [`ConstantPoolReader`] is the bundled [`ClassFormatReader`]. It walks the
//! whole class file (constant pool, fields, methods, attributes) so that a
//! truncated member fails here instead of yielding a partial reference set.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::traits::{ClassFormatReader, ClassSymbols, ConstantValue, DeclaredField};

const MAGIC: u32 = 0xCAFEBABE;

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("malformed descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("class file declares an empty class name")]
    EmptyName,
    #[error("unknown annotation element tag {tag:#04x}")]
    UnsupportedElementValue { tag: u8 },
}

/// Symbols read from one class file.
#[derive(Debug, Clone)]
pub struct ParsedClass {
    pub qualified_name: String,
    pub fields: Vec<DeclaredField>,
    pub references: BTreeSet<String>,
}

impl ClassSymbols for ParsedClass {
    fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    fn declared_field(&self, name: &str) -> Option<&DeclaredField> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn referenced_symbols(&self) -> &BTreeSet<String> {
        &self.references
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantPoolReader;

impl ClassFormatReader for ConstantPoolReader {
    type Class = ParsedClass;

    fn read_class(&self, bytes: &[u8]) -> Result<ParsedClass, ClassParseError> {
        parse_class(bytes)
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<ParsedClass, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let mut references = BTreeSet::new();

    // Interface names are class constants, collected with the pool.
    for _ in 0..reader.read_u2()? {
        pool.class_name(reader.read_u2()?)?;
    }

    let fields_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        let _access_flags = reader.read_u2()?;
        let name = pool.utf8(reader.read_u2()?)?.to_string();
        let descriptor = pool.utf8(reader.read_u2()?)?.to_string();
        collect_descriptor_classes(&descriptor, &mut references)?;
        let constant_value = read_attributes(&mut reader, &pool, &mut references)?;

        fields.push(DeclaredField {
            name,
            descriptor,
            constant_value,
        });
    }

    let methods_count = reader.read_u2()?;
    for _ in 0..methods_count {
        let _access_flags = reader.read_u2()?;
        let _name_index = reader.read_u2()?;
        let descriptor = pool.utf8(reader.read_u2()?)?;
        collect_descriptor_classes(descriptor, &mut references)?;
        read_attributes(&mut reader, &pool, &mut references)?;
    }

    read_attributes(&mut reader, &pool, &mut references)?;

    pool.collect_references(&mut references)?;

    let qualified_name = to_dotted(pool.class_name(this_class)?);
    if qualified_name.is_empty() {
        return Err(ClassParseError::EmptyName);
    }

    // java/lang/Object is the only class without a superclass.
    if super_class != 0 {
        pool.class_name(super_class)?;
    }

    Ok(ParsedClass {
        qualified_name,
        fields,
        references,
    })
}

fn to_dotted(internal: &str) -> String {
    internal.replace('/', ".")
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    NameAndType { descriptor_index: u16 },
    MethodType { descriptor_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    // Modified UTF-8 only differs from UTF-8 for NUL and
                    // supplementary characters, neither of which appear in
                    // binary class names.
                    Constant::Utf8(String::from_utf8_lossy(bytes).into_owned())
                }
                3 => Constant::Integer(reader.read_u4()? as i32),
                4 => Constant::Float(f32::from_bits(reader.read_u4()?)),
                5 | 6 => {
                    let high = reader.read_u4()? as u64;
                    let low = reader.read_u4()? as u64;
                    let bits = (high << 32) | low;
                    entries.push(if tag == 5 {
                        Constant::Long(bits as i64)
                    } else {
                        Constant::Double(f64::from_bits(bits))
                    });
                    // Eight-byte constants occupy two pool slots.
                    entries.push(Constant::Unusable);
                    index += 2;
                    continue;
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9 | 10 | 11 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                12 => {
                    let _name_index = reader.read_u2()?;
                    Constant::NameAndType {
                        descriptor_index: reader.read_u2()?,
                    }
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                19 | 20 => {
                    reader.read_u2()?;
                    Constant::Other
                }
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn constant_value(&self, index: u16) -> Result<ConstantValue, ClassParseError> {
        match self.get(index)? {
            Constant::Integer(value) => Ok(ConstantValue::Int(*value)),
            Constant::Long(value) => Ok(ConstantValue::Long(*value)),
            Constant::Float(value) => Ok(ConstantValue::Float(*value)),
            Constant::Double(value) => Ok(ConstantValue::Double(*value)),
            Constant::String { string_index } => {
                Ok(ConstantValue::String(self.utf8(*string_index)?.to_string()))
            }
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    /// Adds every class named by a `Class`, `NameAndType` or `MethodType`
    /// entry.
    fn collect_references(&self, out: &mut BTreeSet<String>) -> Result<(), ClassParseError> {
        for entry in &self.entries {
            match entry {
                Constant::Class { name_index } => {
                    let name = self.utf8(*name_index)?;
                    if name.starts_with('[') {
                        collect_descriptor_classes(name, out)?;
                    } else {
                        out.insert(to_dotted(name));
                    }
                }
                Constant::NameAndType { descriptor_index }
                | Constant::MethodType { descriptor_index } => {
                    collect_descriptor_classes(self.utf8(*descriptor_index)?, out)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Collects the class names of every `L...;` type in a field or method
/// descriptor. Primitive and array markers contribute nothing on their own.
fn collect_descriptor_classes(
    descriptor: &str,
    out: &mut BTreeSet<String>,
) -> Result<(), ClassParseError> {
    let bytes = descriptor.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'L' => {
                let start = pos + 1;
                let end = bytes[start..]
                    .iter()
                    .position(|&b| b == b';')
                    .map(|offset| start + offset)
                    .ok_or_else(|| ClassParseError::InvalidDescriptor(descriptor.to_string()))?;
                if end == start {
                    return Err(ClassParseError::InvalidDescriptor(descriptor.to_string()));
                }
                out.insert(to_dotted(&descriptor[start..end]));
                pos = end + 1;
            }
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' | b'[' | b'(' | b')' => {
                pos += 1;
            }
            _ => return Err(ClassParseError::InvalidDescriptor(descriptor.to_string())),
        }
    }
    Ok(())
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassParseError> {
        if self.read_u4()? != MAGIC {
            return Err(ClassParseError::InvalidMagic);
        }
        Ok(())
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ClassParseError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }
}

/// Walks one attribute table, collecting the classes its `Signature` and
/// annotation attributes name. Returns the `ConstantValue`, if any.
fn read_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    out: &mut BTreeSet<String>,
) -> Result<Option<ConstantValue>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut constant_value = None;
    for _ in 0..count {
        let name = pool.utf8(reader.read_u2()?)?;
        let length = reader.read_u4()? as usize;
        let mut body = ClassReader::new(reader.read_slice(length)?);

        match name {
            "ConstantValue" if length == 2 => {
                constant_value = Some(pool.constant_value(body.read_u2()?)?);
            }
            "Signature" => collect_signature_classes(pool.utf8(body.read_u2()?)?, out)?,
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                for _ in 0..body.read_u2()? {
                    read_annotation(&mut body, pool, out)?;
                }
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                for _ in 0..body.read_u1()? {
                    for _ in 0..body.read_u2()? {
                        read_annotation(&mut body, pool, out)?;
                    }
                }
            }
            "AnnotationDefault" => read_element_value(&mut body, pool, out)?,
            _ => {}
        }
    }
    Ok(constant_value)
}

fn read_annotation(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    out: &mut BTreeSet<String>,
) -> Result<(), ClassParseError> {
    collect_descriptor_classes(pool.utf8(reader.read_u2()?)?, out)?;
    for _ in 0..reader.read_u2()? {
        reader.read_u2()?; // element_name_index
        read_element_value(reader, pool, out)?;
    }
    Ok(())
}

fn read_element_value(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    out: &mut BTreeSet<String>,
) -> Result<(), ClassParseError> {
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => reader.skip(2),
        b'e' => {
            collect_descriptor_classes(pool.utf8(reader.read_u2()?)?, out)?;
            reader.skip(2)
        }
        b'c' => collect_descriptor_classes(pool.utf8(reader.read_u2()?)?, out),
        b'@' => read_annotation(reader, pool, out),
        b'[' => {
            for _ in 0..reader.read_u2()? {
                read_element_value(reader, pool, out)?;
            }
            Ok(())
        }
        tag => Err(ClassParseError::UnsupportedElementValue { tag }),
    }
}

/// Collects the classes named by a generic class, method or field signature.
///
/// Nested classes (`Lp/Outer<TT;>.Inner;`) yield both `p.Outer` and
/// `p.Outer$Inner`. Type variables contribute nothing.
fn collect_signature_classes(
    signature: &str,
    out: &mut BTreeSet<String>,
) -> Result<(), ClassParseError> {
    let mut parser = SignatureParser { signature, pos: 0 };
    parser.formal_type_parameters(out)?;
    while let Some(byte) = parser.peek() {
        match byte {
            b'(' | b')' | b'^' | b'V' => parser.pos += 1,
            _ => parser.type_signature(out)?,
        }
    }
    Ok(())
}

struct SignatureParser<'s> {
    signature: &'s str,
    pos: usize,
}

impl<'s> SignatureParser<'s> {
    fn peek(&self) -> Option<u8> {
        self.signature.as_bytes().get(self.pos).copied()
    }

    fn expect_peek(&self) -> Result<u8, ClassParseError> {
        self.peek().ok_or_else(|| self.invalid())
    }

    fn invalid(&self) -> ClassParseError {
        ClassParseError::InvalidDescriptor(self.signature.to_string())
    }

    /// Consumes an identifier up to (not including) any byte in `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Result<&'s str, ClassParseError> {
        let start = self.pos;
        while !stops.contains(&self.expect_peek()?) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.invalid());
        }
        Ok(&self.signature[start..self.pos])
    }

    fn formal_type_parameters(
        &mut self,
        out: &mut BTreeSet<String>,
    ) -> Result<(), ClassParseError> {
        if self.peek() != Some(b'<') {
            return Ok(());
        }
        self.pos += 1;
        while self.expect_peek()? != b'>' {
            self.identifier(b":")?;
            while self.peek() == Some(b':') {
                self.pos += 1;
                // The class bound may be empty (`T::Ljava/lang/Runnable;`).
                if matches!(self.expect_peek()?, b'L' | b'T' | b'[') {
                    self.type_signature(out)?;
                }
            }
        }
        self.pos += 1;
        Ok(())
    }

    fn type_signature(&mut self, out: &mut BTreeSet<String>) -> Result<(), ClassParseError> {
        match self.expect_peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                self.pos += 1;
                Ok(())
            }
            b'[' => {
                self.pos += 1;
                self.type_signature(out)
            }
            b'T' => {
                self.pos += 1;
                self.identifier(b";")?;
                self.pos += 1;
                Ok(())
            }
            b'L' => self.class_type_signature(out),
            _ => Err(self.invalid()),
        }
    }

    fn class_type_signature(&mut self, out: &mut BTreeSet<String>) -> Result<(), ClassParseError> {
        self.pos += 1;
        let mut name = to_dotted(self.identifier(b"<.;")?);
        out.insert(name.clone());
        loop {
            match self.expect_peek()? {
                b'<' => self.type_arguments(out)?,
                b'.' => {
                    self.pos += 1;
                    name = format!("{name}${}", self.identifier(b"<.;")?);
                    out.insert(name.clone());
                }
                b';' => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => return Err(self.invalid()),
            }
        }
    }

    fn type_arguments(&mut self, out: &mut BTreeSet<String>) -> Result<(), ClassParseError> {
        self.pos += 1;
        while self.expect_peek()? != b'>' {
            match self.expect_peek()? {
                b'*' => self.pos += 1,
                b'+' | b'-' => {
                    self.pos += 1;
                    self.type_signature(out)?;
                }
                _ => self.type_signature(out)?,
            }
        }
        self.pos += 1;
        Ok(())
    }
}
