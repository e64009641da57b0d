//! Turns one class member into a [`SymbolRecord`].

use thiserror::Error;

use crate::model::SymbolRecord;
use crate::scan::classfile::ClassParseError;
use crate::scan::container::ContainerError;
use crate::traits::{ClassFormatReader, ClassSymbols, ConstantValue};

pub const SERIAL_VERSION_FIELD: &str = "serialVersionUID";

/// A member that contributed nothing to the scan.
#[derive(Debug, Error)]
pub enum MemberError {
    #[error("cannot parse class '{member}': {source}")]
    Class {
        member: String,
        #[source]
        source: ClassParseError,
    },

    #[error(transparent)]
    Container(ContainerError),
}

pub fn extract_symbols<R>(
    reader: &R,
    member: &str,
    bytes: &[u8],
) -> Result<SymbolRecord, MemberError>
where
    R: ClassFormatReader,
{
    let class = reader
        .read_class(bytes)
        .map_err(|source| MemberError::Class {
            member: member.to_string(),
            source,
        })?;

    if class.qualified_name().is_empty() {
        return Err(MemberError::Class {
            member: member.to_string(),
            source: ClassParseError::EmptyName,
        });
    }

    Ok(SymbolRecord {
        qualified_name: class.qualified_name().to_string(),
        serial_marker: serial_marker(&class),
        references: class.referenced_symbols().clone(),
    })
}

/// `serialVersionUID` if the class declares it with an integral constant.
/// An `int` constant is widened.
fn serial_marker(class: &impl ClassSymbols) -> Option<i64> {
    match &class.declared_field(SERIAL_VERSION_FIELD)?.constant_value {
        Some(ConstantValue::Long(value)) => Some(*value),
        Some(ConstantValue::Int(value)) => Some(i64::from(*value)),
        _ => None,
    }
}
