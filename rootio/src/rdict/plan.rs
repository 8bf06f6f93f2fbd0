//! Compiled decode and encode plans
//!
//! Schemas are compiled in two stages. Every element is first classified on
//! its own into a [`FieldKind`]. A [`Plan`] then binds each field to a
//! destination slot and resolves array counts to earlier sibling slots, so
//! decoding a record is a flat walk over the plan's ops.

use std::sync::Arc;

use hashbrown::HashMap;
use rootio_core::format::constants::stl;
use rootio_core::format::etype::code;
use rootio_core::validation::check_count;
use rootio_core::{CxxTemplate, Scalar};

use super::catalog::StreamerCatalog;
use super::element::{ElementKind, StreamerElement};
use super::info::StreamerInfo;
use super::value::{Record, Value};
use crate::error::ResultExt;
use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rtypes::{Named, Object, ObjectHeader};
use crate::{Error, Result};

/// Version bit set on containers streamed member by member
pub(crate) const MEMBER_WISE: i16 = 0x4000;

/// Version written in the header of STL containers
const CONTAINER_VERSION: i16 = 9;

/// Wire form of one scalar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarCodec {
    pub scalar: Scalar,
    /// `(xmin, xmax, factor)` of range-packed floats
    pub range: Option<(f64, f64, f64)>,
    /// Mantissa bits of unpacked `Float16_t`
    pub nbits: u32,
}

impl ScalarCodec {
    pub const fn plain(scalar: Scalar) -> Self {
        Self {
            scalar,
            range: None,
            nbits: 12,
        }
    }

    fn for_element(scalar: Scalar, elem: &StreamerElement) -> Self {
        let mut codec = Self::plain(scalar);
        if let Some((xmin, xmax, factor)) = elem.range {
            if factor != 0.0 {
                codec.range = Some((xmin, xmax, factor));
            } else if scalar == Scalar::Float16 && (2.0..=22.0).contains(&xmin) {
                // truncation without a range keeps the bit count in xmin
                codec.nbits = xmin as u32;
            }
        }
        codec
    }

    /// Bytes one value takes on the wire
    pub fn wire_size(&self) -> usize {
        match (self.scalar, self.range) {
            (Scalar::Double32 | Scalar::Float16, Some(_)) => 4,
            (scalar, _) => scalar.wire_size(),
        }
    }

    pub fn zero(&self) -> Value {
        match self.scalar {
            Scalar::Bool => Value::Bool(false),
            Scalar::I8 => Value::I8(0),
            Scalar::U8 => Value::U8(0),
            Scalar::I16 => Value::I16(0),
            Scalar::U16 => Value::U16(0),
            Scalar::I32 => Value::I32(0),
            Scalar::U32 => Value::U32(0),
            Scalar::I64 => Value::I64(0),
            Scalar::U64 => Value::U64(0),
            Scalar::F32 | Scalar::Float16 => Value::F32(0.0),
            Scalar::F64 | Scalar::Double32 => Value::F64(0.0),
        }
    }

    pub fn read(&self, r: &mut RBuffer<'_>) -> Result<Value> {
        Ok(match self.scalar {
            Scalar::Bool => Value::Bool(r.read_bool()?),
            Scalar::I8 => Value::I8(r.read_i8()?),
            Scalar::U8 => Value::U8(r.read_u8()?),
            Scalar::I16 => Value::I16(r.read_i16()?),
            Scalar::U16 => Value::U16(r.read_u16()?),
            Scalar::I32 => Value::I32(r.read_i32()?),
            Scalar::U32 => Value::U32(r.read_u32()?),
            Scalar::I64 => Value::I64(r.read_i64()?),
            Scalar::U64 => Value::U64(r.read_u64()?),
            Scalar::F32 => Value::F32(r.read_f32()?),
            Scalar::F64 => Value::F64(r.read_f64()?),
            Scalar::Double32 => Value::F64(r.read_double32(self.range)?),
            Scalar::Float16 => Value::F32(match self.range {
                Some((xmin, _, factor)) => (xmin + f64::from(r.read_u32()?) / factor) as f32,
                None => r.read_float16(self.nbits)?,
            }),
        })
    }

    /// Encode `v`, converting between numeric kinds
    pub fn write(&self, v: &Value, w: &mut WBuffer) -> Result<()> {
        match self.scalar {
            Scalar::Bool => w.write_bool(int(v)? != 0),
            Scalar::I8 => w.write_i8(int(v)? as i8),
            Scalar::U8 => w.write_u8(int(v)? as u8),
            Scalar::I16 => w.write_i16(int(v)? as i16),
            Scalar::U16 => w.write_u16(int(v)? as u16),
            Scalar::I32 => w.write_i32(int(v)? as i32),
            Scalar::U32 => w.write_u32(int(v)? as u32),
            Scalar::I64 => w.write_i64(int(v)?),
            Scalar::U64 => w.write_u64(match v {
                Value::U64(x) => *x,
                other => int(other)? as u64,
            }),
            Scalar::F32 => w.write_f32(float(v)? as f32),
            Scalar::F64 => w.write_f64(float(v)?),
            Scalar::Double32 => w.write_double32(float(v)?, self.range),
            Scalar::Float16 => match self.range {
                Some((xmin, xmax, factor)) => {
                    let x = float(v)?.clamp(xmin, xmax);
                    w.write_u32(((x - xmin) * factor + 0.5) as u32);
                }
                None => w.write_float16(float(v)? as f32, self.nbits),
            },
        }
        Ok(())
    }
}

fn int(v: &Value) -> Result<i64> {
    v.as_i64().ok_or_else(|| Error::mismatch("integer", v.kind()))
}

fn float(v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| Error::mismatch("number", v.kind()))
}

/// Length read from the wire, bounded by the bytes left
fn checked_len(r: &mut RBuffer<'_>, n: i64, min_size: usize, what: &str) -> Result<usize> {
    match check_count(n, min_size, r.len()) {
        Ok(n) => Ok(n),
        Err(err) => {
            let pos = r.pos();
            r.fail(Error::corrupt(what, format!("length {n} at {pos}: {err}")))
        }
    }
}

fn wire_len(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::InvalidArgument(format!("{n} items do not fit a length")))
}

fn boxed(obj: Object) -> Value {
    Value::Object(Some(Box::new(obj)))
}

/// Wire form of one value
#[derive(Debug, Clone, PartialEq)]
pub enum Codec {
    Scalar(ScalarCodec),
    TString,
    /// `std::string`; members carry a container header, elements do not
    StdString { header: bool },
    TObject,
    TNamed,
    /// Embedded instance of a class, inside its own record envelope
    Record(String),
    /// Polymorphic pointer written as an object reference
    Pointer,
    Sequence { header: bool, elem: Box<Codec> },
    Map { header: bool, key: Box<Codec>, value: Box<Codec> },
    Unsupported(String),
}

impl Codec {
    /// Codec of a container element or embedded member named by its C++ type
    pub fn for_type(type_name: &str) -> Codec {
        let name = type_name.trim();
        if let Ok(template) = CxxTemplate::parse(name) {
            return Codec::container(&template, false);
        }
        if name.ends_with('*') {
            return Codec::Pointer;
        }
        match name.strip_prefix("std::").unwrap_or(name) {
            "string" => Codec::StdString { header: false },
            "TString" => Codec::TString,
            "TObject" => Codec::TObject,
            "TNamed" => Codec::TNamed,
            other => match Scalar::from_type_name(other) {
                Some(scalar) => Codec::Scalar(ScalarCodec::plain(scalar)),
                None => Codec::Record(name.to_owned()),
            },
        }
    }

    /// Codec of an STL container; `header` is set for members and top-level
    /// objects, cleared for containers nested in other containers
    pub fn container(template: &CxxTemplate<'_>, header: bool) -> Codec {
        match (template.stl_kind(), template.args.as_slice()) {
            (
                Some(stl::VECTOR | stl::LIST | stl::DEQUE | stl::SET | stl::MULTISET),
                [elem, ..],
            ) => Codec::Sequence {
                header,
                elem: Box::new(Codec::for_type(elem)),
            },
            (Some(stl::MAP | stl::MULTIMAP), [key, value, ..]) => Codec::Map {
                header,
                key: Box::new(Codec::for_type(key)),
                value: Box::new(Codec::for_type(value)),
            },
            _ => Codec::Unsupported(format!("container {}", template.name)),
        }
    }

    /// Element type code used when describing a container of this codec
    pub(crate) fn content_type(&self) -> i32 {
        match self {
            Codec::Scalar(c) => c.scalar.code(),
            Codec::StdString { .. } => code::STL_STRING,
            Codec::TString => code::TSTRING,
            Codec::Pointer => code::OBJECTP,
            _ => code::OBJECT,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Codec::Scalar(_) => "number",
            Codec::TString | Codec::StdString { .. } => "string",
            Codec::TObject | Codec::TNamed | Codec::Record(_) => "record",
            Codec::Pointer => "object",
            Codec::Sequence { .. } => "array",
            Codec::Map { .. } => "map",
            Codec::Unsupported(_) => "supported layout",
        }
    }

    fn min_size(&self) -> usize {
        match self {
            Codec::Scalar(c) => c.wire_size(),
            Codec::TObject => 10,
            Codec::Record(_) | Codec::TNamed => 6,
            Codec::Pointer | Codec::Sequence { .. } | Codec::Map { .. } => 4,
            _ => 1,
        }
    }

    /// Map key and value sections get their own header unless they hold
    /// plain numbers
    fn section_header(&self) -> bool {
        !matches!(self, Codec::Scalar(_) | Codec::TString)
    }

    pub fn zero(&self) -> Value {
        match self {
            Codec::Scalar(c) => c.zero(),
            Codec::TString | Codec::StdString { .. } => Value::String(String::new()),
            Codec::TObject => boxed(Object::Object(ObjectHeader::default())),
            Codec::TNamed => boxed(Object::Named(Named::default())),
            Codec::Sequence { .. } => Value::Array(Vec::new()),
            Codec::Map { .. } => Value::Map(Vec::new()),
            Codec::Record(_) | Codec::Pointer | Codec::Unsupported(_) => Value::Object(None),
        }
    }

    /// Classes this codec refers to
    fn classes<'s>(&'s self, out: &mut Vec<&'s str>) {
        match self {
            Codec::TObject => out.push("TObject"),
            Codec::TNamed => out.push("TNamed"),
            Codec::Record(class) => out.push(class),
            Codec::Sequence { elem, .. } => elem.classes(out),
            Codec::Map { key, value, .. } => {
                key.classes(out);
                value.classes(out);
            }
            _ => {}
        }
    }

    pub fn read(&self, catalog: &StreamerCatalog, r: &mut RBuffer<'_>) -> Result<Value> {
        match self {
            Codec::Scalar(c) => c.read(r),
            Codec::TString => Ok(Value::String(r.read_string()?)),
            Codec::StdString { header: false } => Ok(Value::String(r.read_string()?)),
            Codec::StdString { header: true } => {
                let v = r.read_version("string")?;
                let s = r.read_string()?;
                r.check_byte_count(&v, "string")?;
                Ok(Value::String(s))
            }
            Codec::TObject => Ok(boxed(Object::Object(ObjectHeader::unmarshal(r)?))),
            Codec::TNamed => Ok(boxed(Object::Named(Named::unmarshal(r)?))),
            Codec::Record(class) => catalog.read_embedded(class, r),
            Codec::Pointer => Ok(Value::Object(r.read_object_any()?.map(Box::new))),
            Codec::Sequence { header, elem } => {
                let v = if *header {
                    let v = r.read_version("STL container")?;
                    if v.version & MEMBER_WISE != 0 {
                        return r.fail(Error::UnsupportedEncoding(
                            "member-wise streamed sequence".into(),
                        ));
                    }
                    Some(v)
                } else {
                    None
                };
                let n = r.read_i32()?;
                let n = checked_len(r, n.into(), elem.min_size(), "STL container")?;
                let items = (0..n)
                    .map(|_| elem.read(catalog, r))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(v) = v {
                    r.check_byte_count(&v, "STL container")?;
                }
                Ok(Value::Array(items))
            }
            Codec::Map { header, key, value } => {
                let v = if *header {
                    let v = r.read_version("STL map")?;
                    if v.version & MEMBER_WISE != 0 {
                        let class_version = r.read_i16()?;
                        if class_version <= 0 {
                            r.read_u32()?;
                        }
                    }
                    Some(v)
                } else {
                    None
                };
                let n = r.read_i32()?;
                let n = checked_len(r, n.into(), key.min_size() + value.min_size(), "STL map")?;
                let keys = read_section(key, n, catalog, r)?;
                let values = read_section(value, n, catalog, r)?;
                if let Some(v) = v {
                    r.check_byte_count(&v, "STL map")?;
                }
                Ok(Value::Map(keys.into_iter().zip(values).collect()))
            }
            Codec::Unsupported(what) => r.fail(Error::UnsupportedEncoding(what.clone())),
        }
    }

    pub fn write(&self, v: &Value, w: &mut WBuffer) -> Result<()> {
        match (self, v) {
            (Codec::Scalar(c), v) => c.write(v, w),
            (Codec::TString | Codec::StdString { header: false }, Value::String(s)) => {
                w.write_string(s);
                Ok(())
            }
            (Codec::StdString { header: true }, Value::String(s)) => {
                let start = w.write_version(CONTAINER_VERSION);
                w.write_string(s);
                w.set_byte_count(start, "string")
            }
            (Codec::TObject | Codec::TNamed | Codec::Record(_), Value::Object(Some(obj))) => {
                obj.marshal(w)
            }
            (Codec::Record(class), Value::Record(rec)) => {
                if rec.class != *class {
                    return Err(Error::mismatch(class.as_str(), rec.class.as_str()));
                }
                rec.marshal(w)
            }
            (Codec::TObject | Codec::TNamed | Codec::Record(_), Value::Object(None)) => Err(
                Error::InvalidArgument("embedded object is unset".into()),
            ),
            (Codec::Pointer, Value::Object(obj)) => {
                w.write_object_any(obj.as_deref().map(|o| o as &dyn Marshal))
            }
            (Codec::Sequence { header, elem }, Value::Array(items)) => {
                let start = header.then(|| w.write_version(CONTAINER_VERSION));
                w.write_i32(wire_len(items.len())?);
                for item in items {
                    elem.write(item, w)?;
                }
                match start {
                    Some(start) => w.set_byte_count(start, "STL container"),
                    None => Ok(()),
                }
            }
            (Codec::Map { header, key, value }, Value::Map(pairs)) => {
                let start = header.then(|| w.write_version(CONTAINER_VERSION));
                w.write_i32(wire_len(pairs.len())?);
                write_section(key, pairs.iter().map(|(k, _)| k), w)?;
                write_section(value, pairs.iter().map(|(_, v)| v), w)?;
                match start {
                    Some(start) => w.set_byte_count(start, "STL map"),
                    None => Ok(()),
                }
            }
            (Codec::Unsupported(what), _) => Err(Error::UnsupportedEncoding(what.clone())),
            (codec, v) => Err(Error::mismatch(codec.describe(), v.kind())),
        }
    }
}

fn read_section(
    codec: &Codec,
    n: usize,
    catalog: &StreamerCatalog,
    r: &mut RBuffer<'_>,
) -> Result<Vec<Value>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let v = if codec.section_header() {
        Some(r.read_version("STL map section")?)
    } else {
        None
    };
    let items = (0..n)
        .map(|_| codec.read(catalog, r))
        .collect::<Result<Vec<_>>>()?;
    if let Some(v) = v {
        r.check_byte_count(&v, "STL map section")?;
    }
    Ok(items)
}

fn write_section<'v>(
    codec: &Codec,
    items: impl ExactSizeIterator<Item = &'v Value>,
    w: &mut WBuffer,
) -> Result<()> {
    if items.len() == 0 {
        return Ok(());
    }
    let start = codec.section_header().then(|| w.write_version(CONTAINER_VERSION));
    for item in items {
        codec.write(item, w)?;
    }
    match start {
        Some(start) => w.set_byte_count(start, "STL map section"),
        None => Ok(()),
    }
}

/// What one element stores, classified from the element alone
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    One(Codec),
    Fixed { codec: Codec, len: usize },
    /// Variable-length scalar array sized by the member `count`
    Counted { codec: ScalarCodec, count: String },
    /// Variable-length array of records sized by the member `count`
    Loop { class: String, count: String },
}

impl FieldKind {
    pub fn classify(elem: &StreamerElement) -> FieldKind {
        match &elem.kind {
            ElementKind::Base { .. } => FieldKind::One(match elem.name.as_str() {
                "TObject" => Codec::TObject,
                "TNamed" => Codec::TNamed,
                class => Codec::Record(class.to_owned()),
            }),
            ElementKind::BasicType => fixed_or_one(basic_codec(elem), elem),
            ElementKind::BasicPointer(count) => match basic_codec(elem) {
                Codec::Scalar(codec) => FieldKind::Counted {
                    codec,
                    count: count.name.clone(),
                },
                _ => FieldKind::One(Codec::Unsupported(format!(
                    "counted array of {}",
                    elem.type_name
                ))),
            },
            ElementKind::Loop(count) => FieldKind::Loop {
                class: elem.type_name.trim_end_matches('*').trim().to_owned(),
                count: count.name.clone(),
            },
            ElementKind::Object | ElementKind::ObjectAny => {
                fixed_or_one(Codec::for_type(&elem.type_name), elem)
            }
            ElementKind::ObjectPointer | ElementKind::ObjectAnyPointer => {
                fixed_or_one(Codec::Pointer, elem)
            }
            ElementKind::String => fixed_or_one(Codec::TString, elem),
            ElementKind::Stl { .. } => FieldKind::One(match CxxTemplate::parse(&elem.type_name) {
                Ok(template) => Codec::container(&template, true),
                Err(_) => Codec::Unsupported(format!("STL member of type {:?}", elem.type_name)),
            }),
            ElementKind::StlString { .. } => FieldKind::One(Codec::StdString { header: true }),
            ElementKind::Artificial => {
                FieldKind::One(Codec::Unsupported("artificial element".into()))
            }
        }
    }
}

fn basic_codec(elem: &StreamerElement) -> Codec {
    let (_, base) = elem.split_type();
    if base == code::CHAR_STAR {
        return Codec::TString;
    }
    if base == code::COUNTER && elem.size == 8 {
        return Codec::Scalar(ScalarCodec::plain(Scalar::I64));
    }
    match Scalar::from_code(base) {
        Some(scalar) => Codec::Scalar(ScalarCodec::for_element(scalar, elem)),
        None => Codec::Unsupported(format!("element type code {}", elem.etype)),
    }
}

fn fixed_or_one(codec: Codec, elem: &StreamerElement) -> FieldKind {
    if elem.array_len > 0 {
        FieldKind::Fixed {
            codec,
            len: elem.array_len as usize,
        }
    } else {
        FieldKind::One(codec)
    }
}

/// Where a variable-length array takes its length from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    /// An earlier field of the same record
    Slot(usize),
    /// Supplied by the caller, e.g. from the count leaf of a branch
    External,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    One(Codec),
    Fixed(Codec, usize),
    Counted(ScalarCodec, CountSource),
    Loop(Codec, CountSource),
}

/// One compiled step: decode a value into `slot`
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub slot: usize,
    action: Action,
}

/// Compiled layout of one (class, version)
#[derive(Debug, Clone)]
pub struct Plan {
    pub class: String,
    pub version: i16,
    pub checksum: u32,
    /// Containers stored as objects have no record envelope of their own
    envelope: bool,
    fields: Vec<String>,
    index: HashMap<String, usize>,
    ops: Vec<Op>,
    info: Arc<StreamerInfo>,
}

impl Plan {
    /// Compile `info`; `renames` maps source member names to field names
    pub fn compile(info: Arc<StreamerInfo>, renames: &HashMap<String, String>) -> Self {
        let source: HashMap<String, usize> = info
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let resolve = |slot: usize, count: &str| match source.get(count) {
            Some(&i) if i < slot => CountSource::Slot(i),
            _ => CountSource::External,
        };

        let ops = info
            .elements
            .iter()
            .enumerate()
            .map(|(slot, elem)| {
                let action = match FieldKind::classify(elem) {
                    FieldKind::One(codec) => Action::One(codec),
                    FieldKind::Fixed { codec, len } => Action::Fixed(codec, len),
                    FieldKind::Counted { codec, count } => {
                        Action::Counted(codec, resolve(slot, &count))
                    }
                    FieldKind::Loop { class, count } => {
                        Action::Loop(Codec::Record(class), resolve(slot, &count))
                    }
                };
                Op { slot, action }
            })
            .collect();

        let fields: Vec<String> = info
            .elements
            .iter()
            .map(|e| renames.get(&e.name).unwrap_or(&e.name).clone())
            .collect();
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Self {
            class: info.name.clone(),
            version: info.class_version as i16,
            checksum: info.checksum,
            envelope: true,
            fields,
            index,
            ops,
            info,
        }
    }

    /// Plan of an STL container stored directly as an object
    pub(crate) fn container(info: Arc<StreamerInfo>, codec: Codec) -> Self {
        let name = info
            .elements
            .first()
            .map_or_else(|| "This".to_owned(), |e| e.name.clone());
        Self {
            class: info.name.clone(),
            version: info.class_version as i16,
            checksum: info.checksum,
            envelope: false,
            index: HashMap::from_iter([(name.clone(), 0)]),
            fields: vec![name],
            ops: vec![Op {
                slot: 0,
                action: Action::One(codec),
            }],
            info,
        }
    }

    /// Slot of the field named `name`
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Descriptor the plan was compiled from
    pub fn info(&self) -> &StreamerInfo {
        &self.info
    }

    pub fn default_values(&self) -> Vec<Value> {
        self.ops
            .iter()
            .map(|op| match &op.action {
                Action::One(codec) => codec.zero(),
                Action::Fixed(codec, n) => Value::Array(vec![codec.zero(); *n]),
                Action::Counted(..) | Action::Loop(..) => Value::Array(Vec::new()),
            })
            .collect()
    }

    /// Classes referenced by bases and embedded members
    pub fn dependencies(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for op in &self.ops {
            match &op.action {
                Action::One(codec) | Action::Fixed(codec, _) | Action::Loop(codec, _) => {
                    codec.classes(&mut out)
                }
                Action::Counted(..) => {}
            }
        }
        out.dedup();
        out
    }

    /// Decode one record at the cursor
    ///
    /// `external` sizes variable-length arrays whose count is not a member of
    /// the record.
    pub fn decode(
        self: &Arc<Self>,
        catalog: &StreamerCatalog,
        r: &mut RBuffer<'_>,
        external: Option<usize>,
    ) -> Result<Record> {
        let envelope = if self.envelope {
            Some(r.read_version(&self.class)?)
        } else {
            None
        };

        let mut fields = vec![Value::Object(None); self.ops.len()];
        for op in &self.ops {
            let value = self
                .decode_op(op, &fields, catalog, r, external)
                .context(|| format!("{}::{}", self.class, self.fields[op.slot]))?;
            fields[op.slot] = value;
        }

        if let Some(v) = envelope {
            r.check_byte_count(&v, &self.class)?;
        }
        Ok(Record {
            class: self.class.clone(),
            version: self.version,
            fields,
            plan: Arc::clone(self),
        })
    }

    /// Decode the single member in `slot` at the cursor, as stored by a
    /// branch holding one member of a split object
    ///
    /// Counts of variable-length arrays live in another branch and come
    /// from `external`.
    pub fn decode_field(
        &self,
        slot: usize,
        catalog: &StreamerCatalog,
        r: &mut RBuffer<'_>,
        external: Option<usize>,
    ) -> Result<Value> {
        let op = self.ops.get(slot).ok_or_else(|| {
            Error::corrupt(
                self.class.as_str(),
                format!("member {slot} of a class with {} members", self.ops.len()),
            )
        })?;
        let action = match &op.action {
            Action::Counted(codec, _) => Action::Counted(*codec, CountSource::External),
            Action::Loop(codec, _) => Action::Loop(codec.clone(), CountSource::External),
            other => other.clone(),
        };
        let op = Op { slot, action };
        self.decode_op(&op, &[], catalog, r, external)
            .context(|| format!("{}::{}", self.class, self.fields[slot]))
    }

    fn decode_op(
        &self,
        op: &Op,
        fields: &[Value],
        catalog: &StreamerCatalog,
        r: &mut RBuffer<'_>,
        external: Option<usize>,
    ) -> Result<Value> {
        match &op.action {
            Action::One(codec) => codec.read(catalog, r),
            Action::Fixed(codec, n) => (0..*n)
                .map(|_| codec.read(catalog, r))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Action::Counted(codec, count) => {
                let n = self.count(*count, fields, external)?;
                if r.read_u8()? == 0 {
                    return Ok(Value::Array(Vec::new()));
                }
                let n = checked_len(r, n, codec.wire_size(), &self.class)?;
                (0..n)
                    .map(|_| codec.read(r))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            Action::Loop(codec, count) => {
                let n = self.count(*count, fields, external)?;
                if r.read_u8()? == 0 {
                    return Ok(Value::Array(Vec::new()));
                }
                let n = checked_len(r, n, codec.min_size(), &self.class)?;
                (0..n)
                    .map(|_| codec.read(catalog, r))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }

    fn count(&self, source: CountSource, fields: &[Value], external: Option<usize>) -> Result<i64> {
        match source {
            CountSource::Slot(i) => {
                let v = &fields[i];
                v.as_i64().ok_or_else(|| Error::mismatch("integer count", v.kind()))
            }
            CountSource::External => external.map(|n| n as i64).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{}: array count is not a member and none was supplied",
                    self.class
                ))
            }),
        }
    }

    /// Encode `fields` as one record of this plan's class
    pub fn encode(&self, fields: &[Value], w: &mut WBuffer) -> Result<()> {
        if fields.len() != self.ops.len() {
            return Err(Error::InvalidArgument(format!(
                "{} has {} members, got {} values",
                self.class,
                self.ops.len(),
                fields.len()
            )));
        }
        let start = self.envelope.then(|| w.write_version(self.version));
        for op in &self.ops {
            self.encode_op(op, fields, w)
                .context(|| format!("{}::{}", self.class, self.fields[op.slot]))?;
        }
        match start {
            Some(start) => w.set_byte_count(start, &self.class),
            None => Ok(()),
        }
    }

    fn encode_op(&self, op: &Op, fields: &[Value], w: &mut WBuffer) -> Result<()> {
        let value = &fields[op.slot];
        match (&op.action, value) {
            (Action::One(codec), v) => codec.write(v, w),
            (Action::Fixed(codec, n), Value::Array(items)) => {
                if items.len() != *n {
                    return Err(Error::InvalidArgument(format!(
                        "fixed array of {n} items holds {}",
                        items.len()
                    )));
                }
                items.iter().try_for_each(|v| codec.write(v, w))
            }
            (Action::Counted(codec, count), Value::Array(items)) => {
                self.check_len(*count, fields, items.len())?;
                w.write_u8(1);
                items.iter().try_for_each(|v| codec.write(v, w))
            }
            (Action::Loop(codec, count), Value::Array(items)) => {
                self.check_len(*count, fields, items.len())?;
                w.write_u8(1);
                items.iter().try_for_each(|v| codec.write(v, w))
            }
            (_, v) => Err(Error::mismatch("array", v.kind())),
        }
    }

    fn check_len(&self, source: CountSource, fields: &[Value], len: usize) -> Result<()> {
        if let CountSource::Slot(i) = source {
            let want = self.count(source, fields, None)?;
            if want != len as i64 {
                return Err(Error::InvalidArgument(format!(
                    "array holds {len} items but {} says {want}",
                    self.fields[i]
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(info: StreamerInfo) -> Arc<Plan> {
        Arc::new(Plan::compile(Arc::new(info), &HashMap::new()))
    }

    fn hit() -> StreamerInfo {
        StreamerInfo::new(
            "Hit",
            3,
            vec![
                StreamerElement::basic("n", Scalar::I32),
                StreamerElement::counted("e", Scalar::F32, "n", "Hit"),
                StreamerElement::fixed_array("pos", Scalar::F64, 3),
                StreamerElement::string("label"),
            ],
        )
    }

    #[test]
    fn test_classify() {
        let info = hit();
        assert_eq!(
            FieldKind::classify(&info.elements[0]),
            FieldKind::One(Codec::Scalar(ScalarCodec::plain(Scalar::I32)))
        );
        assert_eq!(
            FieldKind::classify(&info.elements[1]),
            FieldKind::Counted {
                codec: ScalarCodec::plain(Scalar::F32),
                count: "n".into()
            }
        );
        assert!(matches!(
            FieldKind::classify(&info.elements[2]),
            FieldKind::Fixed { len: 3, .. }
        ));
        let stl = StreamerElement::stl("m", "map<int,vector<string> >", stl::MAP, code::OBJECT);
        assert_eq!(
            FieldKind::classify(&stl),
            FieldKind::One(Codec::Map {
                header: true,
                key: Box::new(Codec::Scalar(ScalarCodec::plain(Scalar::I32))),
                value: Box::new(Codec::Sequence {
                    header: false,
                    elem: Box::new(Codec::StdString { header: false })
                }),
            })
        );
    }

    #[test]
    fn test_counts_bind_to_earlier_slots() {
        let plan = compile(hit());
        assert_eq!(plan.ops()[1].action, Action::Counted(ScalarCodec::plain(Scalar::F32), CountSource::Slot(0)));

        let orphan = StreamerInfo::new(
            "Orphan",
            1,
            vec![StreamerElement::counted("x", Scalar::I16, "nx", "Orphan")],
        );
        let plan = compile(orphan);
        assert!(matches!(plan.ops()[0].action, Action::Counted(_, CountSource::External)));
    }

    #[test]
    fn test_record_roundtrip() {
        let catalog = StreamerCatalog::new();
        let plan = compile(hit());
        let mut rec = Record::new(Arc::clone(&plan));
        rec.set("n", Value::I32(2)).unwrap();
        rec.set("e", Value::Array(vec![Value::F32(1.5), Value::F32(2.5)])).unwrap();
        rec.set("label", Value::String("calo".into())).unwrap();

        let mut w = WBuffer::new(0);
        rec.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        let back = plan.decode(&catalog, &mut r, None).unwrap();
        assert!(r.is_empty());
        assert_eq!(back, rec);
        assert_eq!(back.get("pos"), Some(&Value::Array(vec![Value::F64(0.0); 3])));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let plan = compile(hit());
        let mut rec = Record::new(plan);
        rec.set("n", Value::I32(3)).unwrap();
        rec.set("e", Value::Array(vec![Value::F32(1.0)])).unwrap();
        let err = rec.marshal(&mut WBuffer::new(0)).unwrap_err();
        assert!(err.to_string().contains("says 3"), "{err}");
    }

    #[test]
    fn test_external_count() {
        let catalog = StreamerCatalog::new();
        let info = StreamerInfo::new(
            "Pulse",
            1,
            vec![StreamerElement::counted("adc", Scalar::U16, "nadc", "Pulse")],
        );
        let plan = compile(info);
        let mut w = WBuffer::new(0);
        let start = w.write_version(1);
        w.write_u8(1);
        w.write_fast_array(&[7u16, 8, 9]);
        w.set_byte_count(start, "Pulse").unwrap();
        let bytes = w.into_bytes();

        let rec = plan.decode(&catalog, &mut RBuffer::new(&bytes, 0), Some(3)).unwrap();
        assert_eq!(
            rec.get("adc"),
            Some(&Value::Array(vec![Value::U16(7), Value::U16(8), Value::U16(9)]))
        );
        let err = plan.decode(&catalog, &mut RBuffer::new(&bytes, 0), None).unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidArgument(_)));
    }

    #[test]
    fn test_split_member_takes_count_from_caller() {
        let catalog = StreamerCatalog::new();
        let plan = compile(hit());
        let mut w = WBuffer::new(0);
        w.write_u8(1);
        w.write_fast_array(&[1.5f32, 2.5]);
        let bytes = w.into_bytes();

        let e = plan.decode_field(1, &catalog, &mut RBuffer::new(&bytes, 0), Some(2)).unwrap();
        assert_eq!(e, Value::Array(vec![Value::F32(1.5), Value::F32(2.5)]));
        let err = plan.decode_field(1, &catalog, &mut RBuffer::new(&bytes, 0), None).unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidArgument(_)));
        assert!(plan.decode_field(9, &catalog, &mut RBuffer::new(&bytes, 0), None).is_err());
    }

    #[test]
    fn test_renamed_fields() {
        let renames = HashMap::from_iter([("label".to_owned(), "name".to_owned())]);
        let plan = Plan::compile(Arc::new(hit()), &renames);
        assert_eq!(plan.slot("name"), Some(3));
        assert_eq!(plan.slot("label"), None);
    }

    #[test]
    fn test_packed_float16() {
        let mut elem = StreamerElement::basic("t", Scalar::Float16);
        elem.range = Some((0.0, 10.0, 100.0));
        let FieldKind::One(Codec::Scalar(codec)) = FieldKind::classify(&elem) else {
            panic!("not a scalar");
        };
        let mut w = WBuffer::new(0);
        codec.write(&Value::F32(2.5), &mut w).unwrap();
        assert_eq!(w.len(), 4);
        let bytes = w.into_bytes();
        let back = codec.read(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back, Value::F32(2.5));
    }
}
