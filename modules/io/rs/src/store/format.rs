use std::collections::BTreeMap;

use bitcode::{Decode, Encode};
use derive_more::From;
use eyre::{bail, Result};

pub const MAGIC: &[u8; 8] = b"RPSTORE\0";
pub const TRAILER_MAGIC: &[u8; 8] = b"RPSTEND\0";
pub const VERSION: u32 = 1;

pub const HEADER_SIZE: u64 = 12;
pub const TRAILER_SIZE: u64 = 24;

/// Links are followed at most this many times while resolving a single path.
pub const MAX_LINK_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum DType {
    U64,
    I64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode, From)]
pub enum Attr {
    Int(i64),
    UInt(u64),
    Str(String),
}

impl From<bool> for Attr {
    fn from(value: bool) -> Self {
        Attr::UInt(value as u64)
    }
}

impl From<&str> for Attr {
    fn from(value: &str) -> Self {
        Attr::Str(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Node {
    Group {
        attrs: BTreeMap<String, Attr>,
    },
    Dataset {
        dtype: DType,
        shape: Vec<u64>,
        offset: u64,
        length: u64,
        compressed: bool,
    },
    SoftLink {
        target: String,
    },
}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Group { .. } => Kind::Group,
            Node::Dataset { .. } => Kind::Dataset,
            Node::SoftLink { .. } => Kind::SoftLink,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Group,
    Dataset,
    SoftLink,
}

/// Dataset payload.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, From)]
pub enum Values {
    U64(Vec<u64>),
    I64(Vec<i64>),
}

impl Values {
    pub fn dtype(&self) -> DType {
        match self {
            Values::U64(_) => DType::U64,
            Values::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::U64(x) => x.len(),
            Values::I64(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset read back from the container: row-major values with their shape.
/// Scalars have an empty shape and a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    pub shape: Vec<usize>,
    pub values: Values,
}

impl Array {
    pub fn as_u64(&self) -> Result<&[u64]> {
        match &self.values {
            Values::U64(x) => Ok(x),
            Values::I64(_) => bail!("Expected an u64 dataset, got i64"),
        }
    }

    pub fn as_i64(&self) -> Result<&[i64]> {
        match &self.values {
            Values::I64(x) => Ok(x),
            Values::U64(_) => bail!("Expected an i64 dataset, got u64"),
        }
    }

    pub fn scalar_u64(&self) -> Result<u64> {
        match (self.shape.is_empty(), self.as_u64()?) {
            (true, [value]) => Ok(*value),
            _ => bail!("Expected a scalar, got shape {:?}", self.shape),
        }
    }

    pub fn scalar_i64(&self) -> Result<i64> {
        match (self.shape.is_empty(), self.as_i64()?) {
            (true, [value]) => Ok(*value),
            _ => bail!("Expected a scalar, got shape {:?}", self.shape),
        }
    }
}

pub fn elements(shape: &[u64]) -> Option<u64> {
    shape.iter().try_fold(1u64, |acc, x| acc.checked_mul(*x))
}
