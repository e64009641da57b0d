//! Builders for class files and jars used across the unit tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::CompressionMethod;

/// Assembles a minimal, valid class file constant by constant.
pub(crate) struct ClassFileBuilder {
    pool: Vec<u8>,
    next_index: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<u8>,
    fields_count: u16,
    methods: Vec<u8>,
    methods_count: u16,
    attributes: Vec<u8>,
    attributes_count: u16,
}

impl ClassFileBuilder {
    /// Starts a class named `internal_name` (slash form) extending `Object`.
    pub(crate) fn new(internal_name: &str) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            next_index: 1,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            fields_count: 0,
            methods: Vec::new(),
            methods_count: 0,
            attributes: Vec::new(),
            attributes_count: 0,
        };
        builder.this_class = builder.class(internal_name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    fn push(&mut self, entry: &[u8], slots: u16) -> u16 {
        let index = self.next_index;
        self.pool.extend_from_slice(entry);
        self.next_index += slots;
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        self.push(&entry, 1)
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name.to_be_bytes());
        self.push(&entry, 1)
    }

    /// Adds a bare `CONSTANT_Class` entry, as an instruction operand would.
    pub(crate) fn reference(mut self, internal_name: &str) -> Self {
        self.class(internal_name);
        self
    }

    pub(crate) fn interface(mut self, internal_name: &str) -> Self {
        let index = self.class(internal_name);
        self.interfaces.push(index);
        self
    }

    pub(crate) fn method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);

        let mut nat = vec![12];
        nat.extend_from_slice(&name.to_be_bytes());
        nat.extend_from_slice(&descriptor.to_be_bytes());
        let nat = self.push(&nat, 1);

        let mut entry = vec![10];
        entry.extend_from_slice(&class.to_be_bytes());
        entry.extend_from_slice(&nat.to_be_bytes());
        self.push(&entry, 1);
        self
    }

    fn add_field(&mut self, name: &str, descriptor: &str, constant: Option<u16>) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let attribute_name = constant.map(|_| self.utf8("ConstantValue"));

        // private static final
        self.fields.extend_from_slice(&0x001Au16.to_be_bytes());
        self.fields.extend_from_slice(&name.to_be_bytes());
        self.fields.extend_from_slice(&descriptor.to_be_bytes());
        match (constant, attribute_name) {
            (Some(constant), Some(attribute_name)) => {
                self.fields.extend_from_slice(&1u16.to_be_bytes());
                self.fields.extend_from_slice(&attribute_name.to_be_bytes());
                self.fields.extend_from_slice(&2u32.to_be_bytes());
                self.fields.extend_from_slice(&constant.to_be_bytes());
            }
            _ => self.fields.extend_from_slice(&0u16.to_be_bytes()),
        }
        self.fields_count += 1;
    }

    pub(crate) fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.add_field(name, descriptor, None);
        self
    }

    pub(crate) fn long_field(mut self, name: &str, value: i64) -> Self {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        let constant = self.push(&entry, 2);
        self.add_field(name, "J", Some(constant));
        self
    }

    pub(crate) fn int_field(mut self, name: &str, value: i32) -> Self {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        let constant = self.push(&entry, 1);
        self.add_field(name, "I", Some(constant));
        self
    }

    pub(crate) fn string_field(mut self, name: &str, value: &str) -> Self {
        let text = self.utf8(value);
        let mut entry = vec![8];
        entry.extend_from_slice(&text.to_be_bytes());
        let constant = self.push(&entry, 1);
        self.add_field(name, "Ljava/lang/String;", Some(constant));
        self
    }

    /// Encodes `name_index`, `length` and `body` as one attribute.
    fn attribute(&mut self, name: &str, body: &[u8]) -> Vec<u8> {
        let name = self.utf8(name);
        let mut out = name.to_be_bytes().to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    /// One annotation of type `descriptor`, optionally with a `value`
    /// element holding the class literal `class_value`.
    fn annotation_body(&mut self, descriptor: &str, class_value: Option<&str>) -> Vec<u8> {
        let mut out = self.utf8(descriptor).to_be_bytes().to_vec();
        match class_value {
            Some(class_value) => {
                let element = self.utf8("value");
                let class_value = self.utf8(class_value);
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&element.to_be_bytes());
                out.push(b'c');
                out.extend_from_slice(&class_value.to_be_bytes());
            }
            None => out.extend_from_slice(&0u16.to_be_bytes()),
        }
        out
    }

    /// Adds a class-level `Signature` attribute.
    pub(crate) fn signature(mut self, signature: &str) -> Self {
        let index = self.utf8(signature);
        let attribute = self.attribute("Signature", &index.to_be_bytes());
        self.attributes.extend_from_slice(&attribute);
        self.attributes_count += 1;
        self
    }

    /// Adds a class-level `RuntimeVisibleAnnotations` attribute.
    pub(crate) fn annotation(mut self, descriptor: &str, class_value: Option<&str>) -> Self {
        let mut body = 1u16.to_be_bytes().to_vec();
        let annotation = self.annotation_body(descriptor, class_value);
        body.extend_from_slice(&annotation);
        let attribute = self.attribute("RuntimeVisibleAnnotations", &body);
        self.attributes.extend_from_slice(&attribute);
        self.attributes_count += 1;
        self
    }

    /// Adds a method, optionally with a generic `signature` and an
    /// invisible annotation on its first parameter.
    pub(crate) fn method(
        mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        parameter_annotation: Option<&str>,
    ) -> Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);

        let mut attributes = Vec::new();
        if let Some(signature) = signature {
            let index = self.utf8(signature);
            attributes.push(self.attribute("Signature", &index.to_be_bytes()));
        }
        if let Some(annotation) = parameter_annotation {
            let mut body = vec![1];
            body.extend_from_slice(&1u16.to_be_bytes());
            let annotation = self.annotation_body(annotation, None);
            body.extend_from_slice(&annotation);
            attributes.push(self.attribute("RuntimeInvisibleParameterAnnotations", &body));
        }

        self.methods.extend_from_slice(&0x0001u16.to_be_bytes()); // public
        self.methods.extend_from_slice(&name.to_be_bytes());
        self.methods.extend_from_slice(&descriptor.to_be_bytes());
        self.methods.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            self.methods.extend_from_slice(&attribute);
        }
        self.methods_count += 1;
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        out.extend_from_slice(&self.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool);
        out.extend_from_slice(&0x0021u16.to_be_bytes()); // public super
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        out.extend_from_slice(&self.fields_count.to_be_bytes());
        out.extend_from_slice(&self.fields);
        out.extend_from_slice(&self.methods_count.to_be_bytes());
        out.extend_from_slice(&self.methods);
        out.extend_from_slice(&self.attributes_count.to_be_bytes());
        out.extend_from_slice(&self.attributes);
        out
    }
}

/// Writes a zip at `dir/name` holding `entries` in the given order.
pub(crate) fn write_jar(dir: &Path, name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    write_jar_with(dir, name, entries, CompressionMethod::Deflated)
}

/// Like [`write_jar`], but members are stored uncompressed so their bytes
/// can be located and damaged in place.
pub(crate) fn write_stored_jar(dir: &Path, name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    write_jar_with(dir, name, entries, CompressionMethod::Stored)
}

fn write_jar_with(
    dir: &Path,
    name: &str,
    entries: &[(&str, Vec<u8>)],
    method: CompressionMethod,
) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(method);
    for (entry_name, bytes) in entries {
        if entry_name.ends_with('/') {
            writer
                .add_directory(entry_name.trim_end_matches('/'), options)
                .unwrap();
            continue;
        }
        writer.start_file(*entry_name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// Flips the last byte of `member_bytes` inside a stored jar, breaking that
/// member's checksum only.
pub(crate) fn corrupt_stored_member(path: &Path, member_bytes: &[u8]) {
    let mut data = std::fs::read(path).unwrap();
    let start = data
        .windows(member_bytes.len())
        .position(|window| window == member_bytes)
        .unwrap();
    data[start + member_bytes.len() - 1] ^= 0xFF;
    std::fs::write(path, data).unwrap();
}

/// Rewrites the central directory so `member` claims a local header far
/// past the end of the file, as in a truncated download.
pub(crate) fn point_member_past_end(path: &Path, member: &str) {
    const CENTRAL_HEADER: &[u8] = b"PK\x01\x02";
    let mut data = std::fs::read(path).unwrap();
    let mut pos = 0;
    loop {
        let offset = data[pos..]
            .windows(4)
            .position(|window| window == CENTRAL_HEADER)
            .unwrap();
        pos += offset;
        let name_len = u16::from_le_bytes([data[pos + 28], data[pos + 29]]) as usize;
        if &data[pos + 46..pos + 46 + name_len] == member.as_bytes() {
            data[pos + 42..pos + 46].copy_from_slice(&0x7FFF_0000u32.to_le_bytes());
            break;
        }
        pos += 4;
    }
    std::fs::write(path, data).unwrap();
}
