use std::fmt;
use std::rc::Rc;

use sqlparser::ast::DataType;

#[derive(Debug)]
pub struct Column {
    pub name: Rc<str>,
    pub type_affinity: TypeAffinity,
}

/// SQLite's five type affinities, reduced from the declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeAffinity {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
}

impl From<&DataType> for TypeAffinity {
    fn from(data_type: &DataType) -> TypeAffinity {
        match data_type {
            DataType::TinyInt(_)
            | DataType::SmallInt(_)
            | DataType::MediumInt(_)
            | DataType::Int(_)
            | DataType::Integer(_)
            | DataType::BigInt(_)
            | DataType::UnsignedTinyInt(_)
            | DataType::UnsignedSmallInt(_)
            | DataType::UnsignedMediumInt(_)
            | DataType::UnsignedInt(_)
            | DataType::UnsignedInteger(_)
            | DataType::UnsignedBigInt(_) => TypeAffinity::Integer,
            DataType::Char(_)
            | DataType::CharVarying(_)
            | DataType::Character(_)
            | DataType::CharacterVarying(_)
            | DataType::Varchar(_)
            | DataType::Nvarchar(_)
            | DataType::Text
            | DataType::String
            | DataType::Clob(_) => TypeAffinity::Text,
            DataType::Binary(_) | DataType::Varbinary(_) | DataType::Blob(_) | DataType::Bytea => {
                TypeAffinity::Blob
            }
            DataType::Real | DataType::Float(_) | DataType::Double | DataType::DoublePrecision => {
                TypeAffinity::Real
            }
            _ => TypeAffinity::Numeric,
        }
    }
}

impl fmt::Display for TypeAffinity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TypeAffinity::Integer => "integer",
            TypeAffinity::Real => "real",
            TypeAffinity::Text => "text",
            TypeAffinity::Blob => "blob",
            TypeAffinity::Numeric => "numeric",
        };
        write!(f, "{name}")
    }
}
