//! Leaves: typed views into the bytes of one branch entry

use rootio_core::format::etype::code;
use rootio_core::{split_code, LeafSpec, Scalar};

use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rdict::{ScalarCodec, Value};
use crate::rtypes::Named;
use crate::{Error, Result};

/// A decoded leaf: a scalar, an array of scalars or a string
pub type LeafValue = Value;

const TLEAF_VERSION: i16 = 2;
const LEAF_VERSION: i16 = 1;

/// Class-specific trailer of a leaf
#[derive(Debug, Clone, PartialEq)]
pub enum LeafExtra {
    /// `fMinimum`/`fMaximum` of the basic leaf classes
    Range { minimum: Value, maximum: Value },
    /// `TLeafElement`: member serial number and element type code
    Element { id: i32, etype: i32 },
}

/// `TLeaf` family
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub class: String,
    pub named: Named,
    /// Fixed number of values per entry, before applying the count
    pub len: i32,
    /// Size in bytes of one value
    pub len_type: i32,
    /// Byte offset of the leaf inside an entry of its branch
    pub offset: i32,
    pub is_range: bool,
    pub is_unsigned: bool,
    /// Leaf holding the per-entry count of counted arrays
    pub count: Option<Box<Leaf>>,
    pub extra: LeafExtra,
}

impl Leaf {
    /// Leaf for a declaration such as `px/D`, `v[3]/I` or `hits[n]/F`
    pub(crate) fn from_spec(spec: &LeafSpec<'_>, count: Option<&Leaf>) -> Result<Self> {
        let len = i32::try_from(spec.fixed_len)
            .map_err(|_| Error::InvalidArgument(format!("leaf {:?} too long", spec.name)))?;
        let codec = ScalarCodec::plain(spec.scalar);
        let title = match spec.count {
            Some(n) if spec.fixed_len > 1 => format!("{}[{n}][{}]", spec.name, spec.fixed_len),
            Some(n) => format!("{}[{n}]", spec.name),
            None if spec.fixed_len > 1 => format!("{}[{}]", spec.name, spec.fixed_len),
            None => spec.name.to_owned(),
        };
        Ok(Self {
            class: spec.scalar.leaf_class().to_owned(),
            named: Named::new(spec.name, title),
            len,
            len_type: spec.scalar.size() as i32,
            offset: 0,
            is_range: false,
            is_unsigned: spec.scalar.is_unsigned(),
            count: count.map(|c| Box::new(c.clone())),
            extra: LeafExtra::Range {
                minimum: codec.zero(),
                maximum: codec.zero(),
            },
        })
    }

    /// `TLeafC` holding one string per entry
    pub(crate) fn string(name: &str) -> Self {
        Self {
            class: "TLeafC".to_owned(),
            named: Named::new(name, name),
            len: 1,
            len_type: 1,
            offset: 0,
            is_range: false,
            is_unsigned: false,
            count: None,
            extra: LeafExtra::Range {
                minimum: Value::I32(0),
                maximum: Value::I32(0),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.named.name
    }

    pub fn title(&self) -> &str {
        &self.named.title
    }

    /// Name of the leaf counting this one, for counted arrays
    pub fn count_name(&self) -> Option<&str> {
        self.count.as_deref().map(Leaf::name)
    }

    pub fn is_string(&self) -> bool {
        self.class == "TLeafC"
            || matches!(self.extra, LeafExtra::Element { etype, .. } if etype == code::CHAR_STAR)
    }

    /// Scalar kind of the values, `None` for strings and unsupported element types
    pub fn scalar(&self) -> Option<Scalar> {
        match self.extra {
            LeafExtra::Element { etype, .. } => Scalar::from_code(split_code(etype).1),
            LeafExtra::Range { .. } => Scalar::from_leaf_class(&self.class, self.is_unsigned),
        }
    }

    /// Largest count seen, recorded on count leaves
    pub fn maximum(&self) -> Option<i64> {
        match &self.extra {
            LeafExtra::Range { maximum, .. } => maximum.as_i64(),
            LeafExtra::Element { .. } => None,
        }
    }

    pub(crate) fn set_maximum(&mut self, value: i64) {
        if let LeafExtra::Range { maximum, .. } = &mut self.extra {
            *maximum = match maximum {
                Value::I8(_) => Value::I8(value as i8),
                Value::U8(_) => Value::U8(value as u8),
                Value::I16(_) => Value::I16(value as i16),
                Value::U16(_) => Value::U16(value as u16),
                Value::U32(_) => Value::U32(value as u32),
                Value::I64(_) => Value::I64(value),
                Value::U64(_) => Value::U64(value as u64),
                _ => Value::I32(value as i32),
            };
        }
    }

    /// Number of values in the current entry given the count leaf's value
    pub fn effective_len(&self, count: Option<i64>) -> usize {
        let len = self.len.max(1) as usize;
        match count {
            None => len,
            Some(n) => {
                let cap = self.count.as_deref().and_then(Leaf::maximum).filter(|m| *m > 0);
                let n = cap.map_or(n, |m| n.min(m)).max(0) as usize;
                len * n
            }
        }
    }

    /// Decode this leaf's values at the cursor
    pub fn read_value(&self, r: &mut RBuffer<'_>, count: Option<i64>) -> Result<LeafValue> {
        if self.is_string() {
            return r.read_string().map(Value::String);
        }
        let scalar = self.scalar().ok_or_else(|| {
            Error::UnsupportedEncoding(format!("leaf {:?} of class {}", self.name(), self.class))
        })?;
        let codec = ScalarCodec::plain(scalar);
        if count.is_none() && self.len <= 1 {
            return codec.read(r);
        }
        let n = self.effective_len(count);
        if n.saturating_mul(codec.wire_size()) > r.len() {
            let pos = r.pos();
            return r.fail(Error::corrupt(
                self.name(),
                format!("{n} values at {pos} overrun the basket"),
            ));
        }
        (0..n).map(|_| codec.read(r)).collect::<Result<_>>().map(Value::Array)
    }

    /// Encode one entry's values, as produced by [`Leaf::read_value`]
    pub(crate) fn write_value(&self, w: &mut WBuffer, value: &LeafValue) -> Result<()> {
        if self.is_string() {
            let s = value
                .as_str()
                .ok_or_else(|| Error::mismatch("string", value.kind()))?;
            w.write_string(s);
            return Ok(());
        }
        let scalar = self.scalar().ok_or_else(|| {
            Error::UnsupportedEncoding(format!("leaf {:?} of class {}", self.name(), self.class))
        })?;
        let codec = ScalarCodec::plain(scalar);
        match value {
            Value::Array(items) => items.iter().try_for_each(|v| codec.write(v, w)),
            scalar => codec.write(scalar, w),
        }
    }

    pub(crate) fn unmarshal_class(class: &str, r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version(class)?;
        let base = r.read_version("TLeaf")?;
        let named = Named::unmarshal(r)?;
        let len = r.read_i32()?;
        let len_type = r.read_i32()?;
        let offset = r.read_i32()?;
        let is_range = r.read_bool()?;
        let is_unsigned = r.read_bool()?;
        let count = match r.read_object_any()? {
            Some(obj) => Some(Box::new(Leaf::try_from(obj)?)),
            None => None,
        };
        r.check_byte_count(&base, "TLeaf")?;

        let extra = match class {
            "TLeafElement" => LeafExtra::Element {
                id: r.read_i32()?,
                etype: r.read_i32()?,
            },
            "TLeafC" => LeafExtra::Range {
                minimum: Value::I32(r.read_i32()?),
                maximum: Value::I32(r.read_i32()?),
            },
            _ => {
                let scalar = Scalar::from_leaf_class(class, is_unsigned)
                    .ok_or_else(|| Error::UnsupportedEncoding(format!("leaf class {class}")))?;
                let codec = ScalarCodec::plain(scalar);
                LeafExtra::Range {
                    minimum: codec.read(r)?,
                    maximum: codec.read(r)?,
                }
            }
        };
        r.check_byte_count(&v, class)?;
        Ok(Self {
            class: class.to_owned(),
            named,
            len,
            len_type,
            offset,
            is_range,
            is_unsigned,
            count,
            extra,
        })
    }
}

impl rootio_core::Object for Leaf {
    fn class(&self) -> &str {
        &self.class
    }
}

impl Marshal for Leaf {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(LEAF_VERSION);
        let base = w.write_version(TLEAF_VERSION);
        self.named.marshal(w)?;
        w.write_i32(self.len);
        w.write_i32(self.len_type);
        w.write_i32(self.offset);
        w.write_bool(self.is_range);
        w.write_bool(self.is_unsigned);
        w.write_object_any(self.count.as_deref().map(|c| c as &dyn Marshal))?;
        w.set_byte_count(base, "TLeaf")?;

        match &self.extra {
            LeafExtra::Element { id, etype } => {
                w.write_i32(*id);
                w.write_i32(*etype);
            }
            LeafExtra::Range { minimum, maximum } if self.class == "TLeafC" => {
                w.write_i32(minimum.as_i64().unwrap_or(0) as i32);
                w.write_i32(maximum.as_i64().unwrap_or(0) as i32);
            }
            LeafExtra::Range { minimum, maximum } => {
                let scalar = self.scalar().ok_or_else(|| {
                    Error::UnsupportedEncoding(format!("leaf class {}", self.class))
                })?;
                let codec = ScalarCodec::plain(scalar);
                codec.write(minimum, w)?;
                codec.write(maximum, w)?;
            }
        }
        w.set_byte_count(start, &self.class)
    }

    /// Leaves are shared between their branch and the tree's leaf list
    fn identity(&self) -> Option<String> {
        Some(format!("leaf:{}:{}", self.named.name, self.named.title))
    }
}
