//! Streamer elements: one described member of a stored class

use rootio_core::format::constants::stl;
use rootio_core::format::etype::code;
use rootio_core::{split_code, Scalar};

use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rtypes::Named;
use crate::{Error, Result};

/// Count member referenced by counted arrays and loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRef {
    pub version: i32,
    pub name: String,
    pub class: String,
}

/// Element class and its extra fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Base { version: i32 },
    BasicType,
    BasicPointer(CountRef),
    Loop(CountRef),
    Object,
    ObjectPointer,
    ObjectAny,
    ObjectAnyPointer,
    String,
    Stl { stl_type: i32, content_type: i32 },
    StlString { stl_type: i32, content_type: i32 },
    Artificial,
}

impl ElementKind {
    pub fn class(&self) -> &'static str {
        match self {
            ElementKind::Base { .. } => "TStreamerBase",
            ElementKind::BasicType => "TStreamerBasicType",
            ElementKind::BasicPointer(_) => "TStreamerBasicPointer",
            ElementKind::Loop(_) => "TStreamerLoop",
            ElementKind::Object => "TStreamerObject",
            ElementKind::ObjectPointer => "TStreamerObjectPointer",
            ElementKind::ObjectAny => "TStreamerObjectAny",
            ElementKind::ObjectAnyPointer => "TStreamerObjectAnyPointer",
            ElementKind::String => "TStreamerString",
            ElementKind::Stl { .. } => "TStreamerSTL",
            ElementKind::StlString { .. } => "TStreamerSTLstring",
            ElementKind::Artificial => "TStreamerArtificial",
        }
    }

    /// Record version written for the outer envelope
    const fn version(&self) -> i16 {
        match self {
            ElementKind::Base { .. } | ElementKind::Stl { .. } => 3,
            ElementKind::Artificial => 0,
            _ => 2,
        }
    }
}

/// One member of a [`StreamerInfo`](super::StreamerInfo)
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerElement {
    pub kind: ElementKind,
    pub name: String,
    pub title: String,
    /// Wire type code, see [`rootio_core::format::etype::code`]
    pub etype: i32,
    pub size: i32,
    pub array_len: i32,
    pub array_dim: i32,
    pub max_index: [i32; 5],
    pub type_name: String,
    /// `(xmin, xmax, factor)` for range-packed floats
    pub range: Option<(f64, f64, f64)>,
}

/// Version of the shared `TStreamerElement` body
const ELEMENT_VERSION: i16 = 4;

impl StreamerElement {
    fn new(kind: ElementKind, name: &str, etype: i32, size: i32, type_name: &str) -> Self {
        Self {
            kind,
            name: name.to_owned(),
            title: String::new(),
            etype,
            size,
            array_len: 0,
            array_dim: 0,
            max_index: [0; 5],
            type_name: type_name.to_owned(),
            range: None,
        }
    }

    /// Scalar member
    pub fn basic(name: &str, scalar: Scalar) -> Self {
        Self::new(
            ElementKind::BasicType,
            name,
            scalar.code(),
            scalar.size() as i32,
            scalar.type_name(),
        )
    }

    /// Fixed-size array member
    pub fn fixed_array(name: &str, scalar: Scalar, len: usize) -> Self {
        let mut e = Self::new(
            ElementKind::BasicType,
            name,
            code::OFFSET_L + scalar.code(),
            (scalar.size() * len) as i32,
            scalar.type_name(),
        );
        e.array_len = len as i32;
        e.array_dim = 1;
        e.max_index[0] = len as i32;
        e
    }

    /// Variable-length array counted by the member `count`
    pub fn counted(name: &str, scalar: Scalar, count: &str, class: &str) -> Self {
        let mut e = Self::new(
            ElementKind::BasicPointer(CountRef {
                version: 1,
                name: count.to_owned(),
                class: class.to_owned(),
            }),
            name,
            code::OFFSET_P + scalar.code(),
            scalar.size() as i32,
            &format!("{}*", scalar.type_name()),
        );
        e.title = format!("[{count}]");
        e
    }

    /// Base class
    pub fn base(class: &str, version: i32) -> Self {
        let etype = match class {
            "TObject" => code::TOBJECT,
            "TNamed" => code::TNAMED,
            _ => code::BASE,
        };
        Self::new(ElementKind::Base { version }, class, etype, 0, "BASE")
    }

    /// `TString` member
    pub fn string(name: &str) -> Self {
        Self::new(ElementKind::String, name, code::TSTRING, 24, "TString")
    }

    /// Embedded object of a class with its own streamer
    pub fn object(name: &str, class: &str) -> Self {
        let etype = match class {
            "TObject" => code::TOBJECT,
            "TNamed" => code::TNAMED,
            _ => code::ANY,
        };
        Self::new(ElementKind::ObjectAny, name, etype, 0, class)
    }

    /// Owning pointer to a polymorphic object
    pub fn object_pointer(name: &str, class: &str) -> Self {
        Self::new(
            ElementKind::ObjectPointer,
            name,
            code::OBJECTP,
            8,
            &format!("{class}*"),
        )
    }

    /// STL container member such as `vector<float>`
    pub fn stl(name: &str, type_name: &str, stl_type: i32, content_type: i32) -> Self {
        Self::new(
            ElementKind::Stl { stl_type, content_type },
            name,
            code::STREAMER,
            24,
            type_name,
        )
    }

    /// `std::string` member
    pub fn std_string(name: &str) -> Self {
        Self::new(
            ElementKind::StlString {
                stl_type: 365,
                content_type: code::STL_STRING,
            },
            name,
            code::STREAMER,
            32,
            "string",
        )
    }

    pub fn class(&self) -> &'static str {
        self.kind.class()
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, ElementKind::Base { .. })
    }

    /// Array modifier and scalar part of the type code
    pub fn split_type(&self) -> (i32, i32) {
        split_code(self.etype)
    }

    /// Decode an element whose concrete class is `class`
    pub fn unmarshal_class(class: &str, r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version(class)?;
        if class == "TStreamerSTLstring" {
            // the STL part carries its own envelope
            let inner = r.read_version("TStreamerSTL")?;
            let mut elem = read_element_body(r)?;
            let (stl_type, content_type) = read_stl(r, &elem.type_name)?;
            r.check_byte_count(&inner, "TStreamerSTL")?;
            r.check_byte_count(&v, class)?;
            elem.kind = ElementKind::StlString { stl_type, content_type };
            return Ok(elem);
        }

        let mut elem = read_element_body(r)?;
        elem.kind = match class {
            "TStreamerBase" => ElementKind::Base {
                version: if v.version > 2 { r.read_i32()? } else { 0 },
            },
            "TStreamerBasicType" => {
                elem.fix_basic_size();
                ElementKind::BasicType
            }
            "TStreamerBasicPointer" => ElementKind::BasicPointer(read_count(r)?),
            "TStreamerLoop" => ElementKind::Loop(read_count(r)?),
            "TStreamerObject" => ElementKind::Object,
            "TStreamerObjectPointer" => ElementKind::ObjectPointer,
            "TStreamerObjectAny" => ElementKind::ObjectAny,
            "TStreamerObjectAnyPointer" => ElementKind::ObjectAnyPointer,
            "TStreamerString" => ElementKind::String,
            "TStreamerSTL" => {
                let (stl_type, content_type) = read_stl(r, &elem.type_name)?;
                ElementKind::Stl { stl_type, content_type }
            }
            "TStreamerArtificial" => ElementKind::Artificial,
            other => return r.fail(Error::UnknownClass(other.to_owned())),
        };
        r.check_byte_count(&v, class)?;
        Ok(elem)
    }

    /// Sizes of scalar members follow from the type code
    fn fix_basic_size(&mut self) {
        let (_, base) = split_code(self.etype);
        if let Some(scalar) = Scalar::from_code(base) {
            self.size = scalar.size() as i32;
            if self.array_len > 0 {
                self.size *= self.array_len;
            }
        }
    }

    fn write_body(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(if self.range.is_some() { 3 } else { ELEMENT_VERSION });
        Named::new(self.name.clone(), self.title.clone()).marshal(w)?;
        w.write_i32(self.etype);
        w.write_i32(self.size);
        w.write_i32(self.array_len);
        w.write_i32(self.array_dim);
        w.write_fast_array(&self.max_index);
        w.write_string(&self.type_name);
        if let Some((xmin, xmax, factor)) = self.range {
            w.write_f64(xmin);
            w.write_f64(xmax);
            w.write_f64(factor);
        }
        w.set_byte_count(start, "TStreamerElement")
    }
}

fn read_element_body(r: &mut RBuffer<'_>) -> Result<StreamerElement> {
    let v = r.read_version("TStreamerElement")?;
    let named = Named::unmarshal(r)?;
    let mut etype = r.read_i32()?;
    let size = r.read_i32()?;
    let array_len = r.read_i32()?;
    let array_dim = r.read_i32()?;
    let mut max_index = [0i32; 5];
    if v.version == 1 {
        let dims = r.read_static_array::<i32>()?;
        for (slot, d) in max_index.iter_mut().zip(dims) {
            *slot = d;
        }
    } else {
        let dims = r.read_fast_array::<i32>(5)?;
        max_index.copy_from_slice(&dims);
    }
    let type_name = r.read_string()?;
    if etype == code::UCHAR && (type_name == "Bool_t" || type_name == "bool") {
        etype = code::BOOL;
    }
    let range = if v.version == 3 {
        Some((r.read_f64()?, r.read_f64()?, r.read_f64()?))
    } else {
        None
    };
    r.check_byte_count(&v, "TStreamerElement")?;
    Ok(StreamerElement {
        kind: ElementKind::Artificial,
        name: named.name,
        title: named.title,
        etype,
        size,
        array_len,
        array_dim,
        max_index,
        type_name,
        range,
    })
}

fn read_count(r: &mut RBuffer<'_>) -> Result<CountRef> {
    Ok(CountRef {
        version: r.read_i32()?,
        name: r.read_string()?,
        class: r.read_string()?,
    })
}

fn read_stl(r: &mut RBuffer<'_>, type_name: &str) -> Result<(i32, i32)> {
    let mut stl_type = r.read_i32()?;
    let content_type = r.read_i32()?;
    // old writers confused set and multimap
    if stl_type == stl::MULTIMAP || stl_type == stl::SET {
        let t = type_name.trim_start_matches("std::");
        if t.starts_with("set") {
            stl_type = stl::SET;
        } else if t.starts_with("multimap") {
            stl_type = stl::MULTIMAP;
        }
    }
    Ok((stl_type, content_type))
}

impl rootio_core::Object for StreamerElement {
    fn class(&self) -> &str {
        self.kind.class()
    }
}

impl rootio_core::Named for StreamerElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Marshal for StreamerElement {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let class = self.kind.class();
        let start = w.write_version(self.kind.version());
        match &self.kind {
            ElementKind::StlString { stl_type, content_type } => {
                let inner = w.write_version(3);
                self.write_body(w)?;
                w.write_i32(*stl_type);
                w.write_i32(*content_type);
                w.set_byte_count(inner, "TStreamerSTL")?;
            }
            kind => {
                self.write_body(w)?;
                match kind {
                    ElementKind::Base { version } => w.write_i32(*version),
                    ElementKind::BasicPointer(c) | ElementKind::Loop(c) => {
                        w.write_i32(c.version);
                        w.write_string(&c.name);
                        w.write_string(&c.class);
                    }
                    ElementKind::Stl { stl_type, content_type } => {
                        w.write_i32(*stl_type);
                        w.write_i32(*content_type);
                    }
                    _ => {}
                }
            }
        }
        w.set_byte_count(start, class)
    }
}
