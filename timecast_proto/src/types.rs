//! Typed argument definitions.

use alloc::{borrow::Cow, boxed::Box, vec::Vec};
use core::{fmt, str};
use serde::{Deserialize, Serialize};

/// Supported argument types.
///
/// All numeric types are transported in their native width, vectors are
/// homogeneous.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ArgType {
    Int32,
    Int64,
    Float,
    Double,
    Time,
    Bool,
    String,
    Symbol,
    Int32Vec,
    Int64Vec,
    FloatVec,
    DoubleVec,
}

impl ArgType {
    /// Returns the typestring code of this type.
    #[inline(always)]
    pub const fn code(self) -> &'static str {
        use ArgType::*;
        match self {
            Int32 => "i",
            Int64 => "h",
            Float => "f",
            Double => "d",
            Time => "t",
            Bool => "B",
            String => "s",
            Symbol => "S",
            Int32Vec => "vi",
            Int64Vec => "vh",
            FloatVec => "vf",
            DoubleVec => "vd",
        }
    }

    /// Returns whether an argument of type `actual` can be delivered to a method
    /// expecting `expected`.
    ///
    /// Types are compatible when they are equal. Doubles and times share the
    /// same representation and are interchangeable.
    #[inline(always)]
    pub fn accepts(expected: Self, actual: Self) -> bool {
        use ArgType::*;
        expected == actual || matches!((expected, actual), (Double, Time) | (Time, Double))
    }

    #[inline(always)]
    const fn from_scalar_code(c: char) -> Option<Self> {
        use ArgType::*;
        Some(match c {
            'i' => Int32,
            'h' => Int64,
            'f' => Float,
            'd' => Double,
            't' => Time,
            'B' => Bool,
            's' => String,
            'S' => Symbol,
            _ => return None,
        })
    }

    #[inline(always)]
    const fn from_element_code(c: char) -> Option<Self> {
        use ArgType::*;
        Some(match c {
            'i' => Int32Vec,
            'h' => Int64Vec,
            'f' => FloatVec,
            'd' => DoubleVec,
            _ => return None,
        })
    }
}

impl fmt::Display for ArgType {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when parsing an invalid [`TypeString`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum TypeStringError {
    /// The character at `position` is not a type code.
    UnknownType { position: usize, code: char },
    /// The vector marker at `position` is not followed by an element type.
    MissingElementType { position: usize },
    /// The vector element type at `position` is not numeric.
    InvalidElementType { position: usize, code: char },
}

impl fmt::Display for TypeStringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType { position, code } => {
                write!(f, "unknown type code '{code}' at position {position}")
            }
            Self::MissingElementType { position } => {
                write!(f, "vector marker at position {position} has no element type")
            }
            Self::InvalidElementType { position, code } => {
                write!(f, "invalid vector element type '{code}' at position {position}")
            }
        }
    }
}

impl core::error::Error for TypeStringError {}

/// A parsed typestring: the ordered argument types accepted by a method.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct TypeString(Box<[ArgType]>);

impl TypeString {
    /// Parses a typestring such as `"hvf"`.
    ///
    /// The empty string is valid, and describes a method without arguments.
    pub fn parse(s: &str) -> Result<Self, TypeStringError> {
        let mut types = Vec::with_capacity(s.len());
        let mut chars = s.char_indices();

        while let Some((position, code)) = chars.next() {
            let ty = if code == 'v' {
                let (_, element) = chars
                    .next()
                    .ok_or(TypeStringError::MissingElementType { position })?;

                ArgType::from_element_code(element).ok_or(TypeStringError::InvalidElementType {
                    position: position + 1,
                    code: element,
                })?
            } else {
                ArgType::from_scalar_code(code)
                    .ok_or(TypeStringError::UnknownType { position, code })?
            };

            types.push(ty);
        }

        Ok(Self(types.into_boxed_slice()))
    }

    /// Builds the typestring describing the given arguments.
    pub fn of(args: &[Arg<'_>]) -> Self {
        Self(args.iter().map(Arg::arg_type).collect())
    }

    #[inline(always)]
    pub fn types(&self) -> &[ArgType] {
        &self.0
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns whether `args` can be delivered to a method declaring this
    /// typestring: same arity, and pairwise [compatible](ArgType::accepts) types.
    pub fn matches(&self, args: &[Arg<'_>]) -> bool {
        self.0.len() == args.len()
            && self
                .0
                .iter()
                .zip(args)
                .all(|(&expected, arg)| ArgType::accepts(expected, arg.arg_type()))
    }
}

impl str::FromStr for TypeString {
    type Err = TypeStringError;

    #[inline(always)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|ty| f.write_str(ty.code()))
    }
}

/// A single typed message argument.
///
/// Strings and vectors are borrowed when possible, so that building a message
/// from existing buffers does not copy them.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Arg<'a> {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Time(f64),
    Bool(bool),
    String(#[serde(borrow)] Cow<'a, str>),
    Symbol(#[serde(borrow)] Cow<'a, str>),
    Int32Vec(Cow<'a, [i32]>),
    Int64Vec(Cow<'a, [i64]>),
    FloatVec(Cow<'a, [f32]>),
    DoubleVec(Cow<'a, [f64]>),
}

impl<'a> Arg<'a> {
    /// Returns the type of this argument.
    #[inline(always)]
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::Int32(_) => ArgType::Int32,
            Self::Int64(_) => ArgType::Int64,
            Self::Float(_) => ArgType::Float,
            Self::Double(_) => ArgType::Double,
            Self::Time(_) => ArgType::Time,
            Self::Bool(_) => ArgType::Bool,
            Self::String(_) => ArgType::String,
            Self::Symbol(_) => ArgType::Symbol,
            Self::Int32Vec(_) => ArgType::Int32Vec,
            Self::Int64Vec(_) => ArgType::Int64Vec,
            Self::FloatVec(_) => ArgType::FloatVec,
            Self::DoubleVec(_) => ArgType::DoubleVec,
        }
    }

    #[inline(always)]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int64(v) => Some(v),
            Self::Int32(v) => Some(v.into()),
            _ => None,
        }
    }

    /// Returns the value of a double or time argument.
    #[inline(always)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Double(v) | Self::Time(v) => Some(v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self {
            Self::FloatVec(v) => Some(v.as_ref()),
            _ => None,
        }
    }

    /// Detaches this argument from any borrowed buffer.
    pub fn into_owned(self) -> Arg<'static> {
        match self {
            Self::Int32(v) => Arg::Int32(v),
            Self::Int64(v) => Arg::Int64(v),
            Self::Float(v) => Arg::Float(v),
            Self::Double(v) => Arg::Double(v),
            Self::Time(v) => Arg::Time(v),
            Self::Bool(v) => Arg::Bool(v),
            Self::String(s) => Arg::String(Cow::Owned(s.into_owned())),
            Self::Symbol(s) => Arg::Symbol(Cow::Owned(s.into_owned())),
            Self::Int32Vec(v) => Arg::Int32Vec(Cow::Owned(v.into_owned())),
            Self::Int64Vec(v) => Arg::Int64Vec(Cow::Owned(v.into_owned())),
            Self::FloatVec(v) => Arg::FloatVec(Cow::Owned(v.into_owned())),
            Self::DoubleVec(v) => Arg::DoubleVec(Cow::Owned(v.into_owned())),
        }
    }
}
