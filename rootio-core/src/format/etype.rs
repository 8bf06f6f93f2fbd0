//! Streamer element type codes
//!
//! Every member of a stored class is tagged with an integer code. Scalars use
//! `0..20`, fixed arrays add [`code::OFFSET_L`], counted pointer arrays add
//! [`code::OFFSET_P`], and object-like members use the `61..` range.

/// Raw wire codes
pub mod code {
    pub const BASE: i32 = 0;
    pub const CHAR: i32 = 1;
    pub const SHORT: i32 = 2;
    pub const INT: i32 = 3;
    pub const LONG: i32 = 4;
    pub const FLOAT: i32 = 5;
    pub const COUNTER: i32 = 6;
    pub const CHAR_STAR: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const DOUBLE32: i32 = 9;
    pub const LEGACY_CHAR: i32 = 10;
    pub const UCHAR: i32 = 11;
    pub const USHORT: i32 = 12;
    pub const UINT: i32 = 13;
    pub const ULONG: i32 = 14;
    pub const BITS: i32 = 15;
    pub const LONG64: i32 = 16;
    pub const ULONG64: i32 = 17;
    pub const BOOL: i32 = 18;
    pub const FLOAT16: i32 = 19;
    pub const OFFSET_L: i32 = 20;
    pub const OFFSET_P: i32 = 40;
    pub const OBJECT: i32 = 61;
    pub const ANY: i32 = 62;
    pub const OBJECTP: i32 = 63;
    pub const OBJECT_P: i32 = 64;
    pub const TSTRING: i32 = 65;
    pub const TOBJECT: i32 = 66;
    pub const TNAMED: i32 = 67;
    pub const ANYP: i32 = 68;
    pub const ANY_P: i32 = 69;
    pub const ANY_PNOVT: i32 = 70;
    pub const STLP: i32 = 71;
    pub const STL: i32 = 300;
    pub const STL_STRING: i32 = 365;
    pub const STREAMER: i32 = 500;
    pub const STREAM_LOOP: i32 = 501;
    pub const ARTIFICIAL: i32 = 1000;
}

/// Scalar kinds a basic element or leaf can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scalar {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// 32-bit float on the wire, optionally range-packed
    Double32,
    /// Truncated-mantissa float on the wire
    Float16,
}

impl Scalar {
    /// Map a scalar wire code (`0..20`) to its kind
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            code::CHAR | code::LEGACY_CHAR => Scalar::I8,
            code::SHORT => Scalar::I16,
            code::INT | code::COUNTER => Scalar::I32,
            code::LONG | code::LONG64 => Scalar::I64,
            code::FLOAT => Scalar::F32,
            code::DOUBLE => Scalar::F64,
            code::DOUBLE32 => Scalar::Double32,
            code::UCHAR => Scalar::U8,
            code::USHORT => Scalar::U16,
            code::UINT | code::BITS => Scalar::U32,
            code::ULONG | code::ULONG64 => Scalar::U64,
            code::BOOL => Scalar::Bool,
            code::FLOAT16 => Scalar::Float16,
            _ => return None,
        })
    }

    /// Canonical wire code
    pub const fn code(self) -> i32 {
        match self {
            Scalar::Bool => code::BOOL,
            Scalar::I8 => code::CHAR,
            Scalar::U8 => code::UCHAR,
            Scalar::I16 => code::SHORT,
            Scalar::U16 => code::USHORT,
            Scalar::I32 => code::INT,
            Scalar::U32 => code::UINT,
            Scalar::I64 => code::LONG64,
            Scalar::U64 => code::ULONG64,
            Scalar::F32 => code::FLOAT,
            Scalar::F64 => code::DOUBLE,
            Scalar::Double32 => code::DOUBLE32,
            Scalar::Float16 => code::FLOAT16,
        }
    }

    /// In-memory size in bytes
    pub const fn size(self) -> usize {
        match self {
            Scalar::Bool | Scalar::I8 | Scalar::U8 => 1,
            Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 | Scalar::Float16 => 4,
            Scalar::I64 | Scalar::U64 | Scalar::F64 | Scalar::Double32 => 8,
        }
    }

    /// Size on the wire when no range packing is in effect
    pub const fn wire_size(self) -> usize {
        match self {
            Scalar::Double32 => 4,
            Scalar::Float16 => 3,
            other => other.size(),
        }
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(self, Scalar::U8 | Scalar::U16 | Scalar::U32 | Scalar::U64)
    }

    /// Whether values are whole numbers usable as element counts
    pub const fn is_integer(self) -> bool {
        !matches!(self, Scalar::Bool | Scalar::F32 | Scalar::F64 | Scalar::Double32 | Scalar::Float16)
    }

    /// Resolve a C++ or ROOT typedef name
    pub fn from_type_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_end_matches('*').trim();
        Some(match name {
            "bool" | "Bool_t" => Scalar::Bool,
            "char" | "Char_t" | "signed char" | "Int8_t" | "int8_t" => Scalar::I8,
            "unsigned char" | "UChar_t" | "UInt8_t" | "uint8_t" | "Byte_t" => Scalar::U8,
            "short" | "Short_t" | "Short16_t" | "Int16_t" | "int16_t" => Scalar::I16,
            "unsigned short" | "UShort_t" | "UShort16_t" | "UInt16_t" | "uint16_t" => Scalar::U16,
            "int" | "Int_t" | "Int32_t" | "int32_t" => Scalar::I32,
            "unsigned int" | "unsigned" | "UInt_t" | "UInt32_t" | "uint32_t" => Scalar::U32,
            "long" | "Long_t" | "Long64_t" | "long long" | "Int64_t" | "int64_t" => Scalar::I64,
            "unsigned long" | "ULong_t" | "ULong64_t" | "unsigned long long" | "UInt64_t"
            | "uint64_t" | "size_t" => Scalar::U64,
            "float" | "Float_t" | "Real_t" => Scalar::F32,
            "double" | "Double_t" => Scalar::F64,
            "Double32_t" => Scalar::Double32,
            "Float16_t" => Scalar::Float16,
            _ => return None,
        })
    }

    /// ROOT typedef name used in generated descriptors
    pub const fn type_name(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::I8 => "char",
            Scalar::U8 => "unsigned char",
            Scalar::I16 => "short",
            Scalar::U16 => "unsigned short",
            Scalar::I32 => "int",
            Scalar::U32 => "unsigned int",
            Scalar::I64 => "Long64_t",
            Scalar::U64 => "ULong64_t",
            Scalar::F32 => "float",
            Scalar::F64 => "double",
            Scalar::Double32 => "Double32_t",
            Scalar::Float16 => "Float16_t",
        }
    }

    /// Decode the type letter of a leaf title (`x/F`)
    pub const fn from_leaf_letter(letter: u8) -> Option<Self> {
        Some(match letter {
            b'O' => Scalar::Bool,
            b'B' => Scalar::I8,
            b'b' => Scalar::U8,
            b'S' => Scalar::I16,
            b's' => Scalar::U16,
            b'I' => Scalar::I32,
            b'i' => Scalar::U32,
            b'L' => Scalar::I64,
            b'l' => Scalar::U64,
            b'F' => Scalar::F32,
            b'D' => Scalar::F64,
            b'd' => Scalar::Double32,
            b'f' => Scalar::Float16,
            _ => return None,
        })
    }

    pub const fn leaf_letter(self) -> u8 {
        match self {
            Scalar::Bool => b'O',
            Scalar::I8 => b'B',
            Scalar::U8 => b'b',
            Scalar::I16 => b'S',
            Scalar::U16 => b's',
            Scalar::I32 => b'I',
            Scalar::U32 => b'i',
            Scalar::I64 => b'L',
            Scalar::U64 => b'l',
            Scalar::F32 => b'F',
            Scalar::F64 => b'D',
            Scalar::Double32 => b'd',
            Scalar::Float16 => b'f',
        }
    }

    /// Leaf class storing this scalar; signedness lives in the leaf's flag
    pub const fn leaf_class(self) -> &'static str {
        match self {
            Scalar::Bool => "TLeafO",
            Scalar::I8 | Scalar::U8 => "TLeafB",
            Scalar::I16 | Scalar::U16 => "TLeafS",
            Scalar::I32 | Scalar::U32 => "TLeafI",
            Scalar::I64 | Scalar::U64 => "TLeafL",
            Scalar::F32 => "TLeafF",
            Scalar::F64 => "TLeafD",
            Scalar::Double32 => "TLeafD32",
            Scalar::Float16 => "TLeafF16",
        }
    }

    /// Inverse of [`Scalar::leaf_class`] given the leaf's unsigned flag
    pub fn from_leaf_class(class: &str, unsigned: bool) -> Option<Self> {
        Some(match (class, unsigned) {
            ("TLeafO", _) => Scalar::Bool,
            ("TLeafB", false) => Scalar::I8,
            ("TLeafB", true) => Scalar::U8,
            ("TLeafS", false) => Scalar::I16,
            ("TLeafS", true) => Scalar::U16,
            ("TLeafI", false) => Scalar::I32,
            ("TLeafI", true) => Scalar::U32,
            ("TLeafL", false) => Scalar::I64,
            ("TLeafL", true) => Scalar::U64,
            ("TLeafF", _) => Scalar::F32,
            ("TLeafD", _) => Scalar::F64,
            ("TLeafD32", _) => Scalar::Double32,
            ("TLeafF16", _) => Scalar::Float16,
            _ => return None,
        })
    }
}

/// Split an element code into its array modifier and scalar part
///
/// Returns `(modifier, base)` where modifier is `0`, [`code::OFFSET_L`] or
/// [`code::OFFSET_P`].
pub const fn split_code(etype: i32) -> (i32, i32) {
    if etype > code::OFFSET_P && etype < code::OFFSET_P + code::OFFSET_L {
        (code::OFFSET_P, etype - code::OFFSET_P)
    } else if etype > code::OFFSET_L && etype < code::OFFSET_P {
        (code::OFFSET_L, etype - code::OFFSET_L)
    } else {
        (0, etype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for s in [
            Scalar::Bool,
            Scalar::I8,
            Scalar::U8,
            Scalar::I16,
            Scalar::U16,
            Scalar::I32,
            Scalar::U32,
            Scalar::I64,
            Scalar::U64,
            Scalar::F32,
            Scalar::F64,
        ] {
            assert_eq!(Scalar::from_code(s.code()), Some(s));
            assert_eq!(Scalar::from_leaf_letter(s.leaf_letter()), Some(s));
            assert_eq!(Scalar::from_leaf_class(s.leaf_class(), s.is_unsigned()), Some(s));
        }
    }

    #[test]
    fn test_split_code() {
        assert_eq!(split_code(code::INT), (0, code::INT));
        assert_eq!(split_code(code::OFFSET_L + code::DOUBLE), (code::OFFSET_L, code::DOUBLE));
        assert_eq!(split_code(code::OFFSET_P + code::FLOAT), (code::OFFSET_P, code::FLOAT));
        assert_eq!(split_code(code::OBJECT), (0, code::OBJECT));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Scalar::from_type_name("Int_t"), Some(Scalar::I32));
        assert_eq!(Scalar::from_type_name("unsigned long long"), Some(Scalar::U64));
        assert_eq!(Scalar::from_type_name("double*"), Some(Scalar::F64));
        assert_eq!(Scalar::from_type_name("TString"), None);
    }
}
