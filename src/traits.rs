use std::collections::{BTreeMap, BTreeSet};

use crate::model::Archive;
use crate::scan::classfile::ClassParseError;

/// Compile-time constant attached to a field through `ConstantValue`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// A field declared directly by a class (inherited fields are not visible).
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredField {
    pub name: String,
    pub descriptor: String,
    pub constant_value: Option<ConstantValue>,
}

/// Read-only view of one parsed class.
pub trait ClassSymbols {
    /// Dotted fully-qualified name, e.g. `com.acme.Widget`.
    fn qualified_name(&self) -> &str;

    fn declared_field(&self, name: &str) -> Option<&DeclaredField>;

    /// Every class the class file refers to, in dotted form.
    fn referenced_symbols(&self) -> &BTreeSet<String>;
}

/// Parses compiled class bytes into a [`ClassSymbols`] view.
///
/// Implementations must be `Send + Sync` so one reader can serve scans
/// running on several blocking threads.
pub trait ClassFormatReader: Send + Sync {
    type Class: ClassSymbols;

    fn read_class(&self, bytes: &[u8]) -> Result<Self::Class, ClassParseError>;
}

/// Archives already scanned in the current run.
///
/// Only answers whether *some* known archive provides a symbol; which one
/// does is deliberately not exposed.
pub trait KnownArchives: Send + Sync {
    fn provides_symbol(&self, symbol: &str) -> bool;
}

impl KnownArchives for [Archive] {
    fn provides_symbol(&self, symbol: &str) -> bool {
        self.iter().any(|archive| archive.does_provide(symbol))
    }
}

impl KnownArchives for Vec<Archive> {
    fn provides_symbol(&self, symbol: &str) -> bool {
        self.as_slice().provides_symbol(symbol)
    }
}

impl KnownArchives for BTreeMap<String, Archive> {
    fn provides_symbol(&self, symbol: &str) -> bool {
        self.values().any(|archive| archive.does_provide(symbol))
    }
}
