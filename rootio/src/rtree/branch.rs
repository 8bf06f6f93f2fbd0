//! Branches: one column of a tree and the table of its baskets

use std::sync::Arc;

use super::basket::{Basket, LoadedBasket};
use super::leaf::{Leaf, LeafValue};
use super::{read_obj_array, write_obj_array, IoFeatures};
use crate::error::ResultExt;
use crate::rbytes::{Context, Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rdict::{is_container, Plan, StreamerCatalog, Value};
use crate::riofs::File;
use crate::rtypes::{AttFill, Named, Object};
use crate::{Error, Result};

/// Basket currently decoded for a branch
///
/// Ignored by equality: two branches with the same metadata are equal
/// whatever they happen to have loaded.
#[derive(Debug, Clone, Default)]
pub(crate) struct BasketCache {
    loaded: Option<LoadedBasket>,
    entry: i64,
}

impl PartialEq for BasketCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// Schema driving the decoding of a `TBranchElement`
///
/// Resolved against the file's catalog before the first entry is read.
/// Ignored by equality, like [`BasketCache`].
#[derive(Debug, Clone, Default)]
pub(crate) enum ElementStreamer {
    /// Plain branch: leaves decode themselves
    #[default]
    Leaves,
    Pending {
        class: String,
        version: i16,
        checksum: u32,
        id: i32,
    },
    /// Whole object when `slot` is `None`, one member otherwise
    Ready { plan: Arc<Plan>, slot: Option<usize> },
}

impl PartialEq for ElementStreamer {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl ElementStreamer {
    fn pending(elem: &BranchElement) -> Self {
        ElementStreamer::Pending {
            class: elem.class_name.clone(),
            version: elem.class_version,
            checksum: elem.checksum,
            id: elem.id,
        }
    }

    /// Find the descriptor of the branch's class: the exact version, else
    /// one with the same checksum, else the latest
    fn resolve(catalog: &StreamerCatalog, class: &str, version: i16, checksum: u32, id: i32) -> Result<Self> {
        let info = match catalog.get(class, i32::from(version)) {
            Some(info) if checksum != 0 && info.checksum != checksum => {
                return Err(Error::SchemaConflict {
                    class: class.to_owned(),
                    version: i32::from(version),
                    existing: info.checksum,
                    incoming: checksum,
                });
            }
            Some(info) => Some(info),
            None => catalog
                .by_checksum(class, checksum)
                .or_else(|| catalog.latest(class)),
        };
        if info.is_none() && !is_container(class) {
            return Err(Error::UnknownClass(class.to_owned()));
        }
        if let Some(info) = info.filter(|i| i.class_version != i32::from(version)) {
            tracing::debug!(class, stored = version, using = info.class_version, "no exact schema for branch");
        }
        let plan = catalog
            .plan(class, info.map(|i| i.class_version))
            .ok_or_else(|| Error::UnknownClass(class.to_owned()))?;
        let slot = match usize::try_from(id) {
            Err(_) => None,
            Ok(slot) if slot < plan.ops().len() => Some(slot),
            Ok(slot) => {
                return Err(Error::corrupt(
                    "TBranchElement",
                    format!("member {slot} of {class} with {} members", plan.ops().len()),
                ));
            }
        };
        Ok(ElementStreamer::Ready { plan, slot })
    }
}

/// `TBranch`
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub named: Named,
    pub fill: AttFill,
    pub compress: i32,
    pub basket_size: i32,
    /// Initial length of the entry offset table; 0 for fixed-size entries
    pub entry_offset_len: i32,
    /// Number of baskets written to their own record
    pub write_basket: i32,
    pub entry_number: i64,
    pub io_features: IoFeatures,
    pub offset: i32,
    pub max_baskets: i32,
    pub split_level: i32,
    pub entries: i64,
    pub first_entry: i64,
    pub tot_bytes: i64,
    pub zip_bytes: i64,
    pub branches: Vec<AnyBranch>,
    pub leaves: Vec<Leaf>,
    /// Baskets kept in the branch record; the slot after the last written
    /// basket may hold entries never flushed to their own record
    pub baskets: Vec<Option<Basket>>,
    /// Record size of each written basket
    pub basket_bytes: Vec<i32>,
    /// First entry of each basket, plus one trailing slot
    pub basket_entry: Vec<i64>,
    /// Address of each written basket
    pub basket_seek: Vec<i64>,
    pub file_name: String,
    pub(crate) cache: BasketCache,
    pub(crate) streamer: ElementStreamer,
}

impl Branch {
    pub const VERSION: i16 = 13;

    pub(crate) fn new(name: &str, title: &str, leaf: Leaf, compress: i32, basket_size: i32) -> Self {
        Self {
            named: Named::new(name, title),
            fill: AttFill::default(),
            compress,
            basket_size,
            entry_offset_len: 0,
            write_basket: 0,
            entry_number: 0,
            io_features: IoFeatures::default(),
            offset: 0,
            max_baskets: 10,
            split_level: 0,
            entries: 0,
            first_entry: 0,
            tot_bytes: 0,
            zip_bytes: 0,
            branches: Vec::new(),
            leaves: vec![leaf],
            baskets: Vec::new(),
            basket_bytes: Vec::new(),
            basket_entry: vec![0],
            basket_seek: Vec::new(),
            file_name: String::new(),
            cache: BasketCache::default(),
            streamer: ElementStreamer::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.named.name
    }

    pub fn title(&self) -> &str {
        &self.named.title
    }

    pub fn entries(&self) -> i64 {
        self.entries
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn branches(&self) -> &[AnyBranch] {
        &self.branches
    }

    /// Index of the basket holding `entry`; the last index names the
    /// in-record basket, if any
    fn find_basket(&self, entry: i64) -> Option<usize> {
        self.basket_entry
            .partition_point(|&first| first <= entry)
            .checked_sub(1)
    }

    fn basket_range(&self, ib: usize) -> (i64, i64) {
        let first = self.basket_entry[ib];
        let end = self.basket_entry.get(ib + 1).copied().unwrap_or(self.entries);
        (first, end)
    }

    /// Bind the schema of an element branch from the file's catalog
    ///
    /// Fails with [`Error::UnknownClass`] when the class has no descriptor and
    /// [`Error::SchemaConflict`] when its checksum disagrees with the stored one.
    pub(crate) fn resolve_streamer(&mut self, catalog: &StreamerCatalog) -> Result<()> {
        if let ElementStreamer::Pending { class, version, checksum, id } = &self.streamer {
            let ready = ElementStreamer::resolve(catalog, class, *version, *checksum, *id)
                .context(|| format!("branch {:?}", self.named.name))?;
            self.streamer = ready;
        }
        Ok(())
    }

    /// Make `entry` the current entry, reading and inflating its basket if
    /// the cached one does not cover it
    pub fn load_entry(&mut self, file: &File, entry: i64) -> Result<()> {
        self.resolve_streamer(&file.io.streamers)?;
        if entry < 0 || entry >= self.entries {
            return Err(Error::InvalidArgument(format!(
                "entry {entry} outside branch {:?} of {} entries",
                self.named.name, self.entries
            )));
        }
        if self.cache.loaded.as_ref().is_some_and(|b| b.contains(entry)) {
            self.cache.entry = entry;
            return Ok(());
        }
        let loaded = self
            .load_basket(file, entry)
            .context(|| format!("branch {:?}", self.named.name))?;
        self.cache = BasketCache {
            loaded: Some(loaded),
            entry,
        };
        Ok(())
    }

    fn load_basket(&self, file: &File, entry: i64) -> Result<LoadedBasket> {
        let ib = self
            .find_basket(entry)
            .ok_or_else(|| Error::corrupt("TBranch", format!("no basket holds entry {entry}")))?;
        let range = self.basket_range(ib);
        let _span = tracing::debug_span!("load_basket", branch = %self.named.name, basket = ib).entered();

        if ib < self.basket_seek.len() {
            let (seek, nbytes) = (self.basket_seek[ib], self.basket_bytes[ib]);
            let raw = file.io.storage.read_at(seek, i64::from(nbytes))?;
            let header = Basket::unmarshal(&mut RBuffer::new(&raw, seek as u64))?;
            header.key.check_record()?;
            if i64::from(header.nev_buf) != range.1 - range.0 {
                return Err(Error::corrupt(
                    "TBasket",
                    format!(
                        "basket {ib} holds {} entries, branch expects {}",
                        header.nev_buf,
                        range.1 - range.0
                    ),
                ));
            }
            tracing::trace!(seek, nbytes, first = range.0, end = range.1, "read basket");
            return LoadedBasket::from_record(header, &raw, ib, range, self.entry_offset_len);
        }

        let header = self
            .baskets
            .get(ib)
            .cloned()
            .flatten()
            .ok_or_else(|| Error::corrupt("TBranch", format!("basket {ib} is neither written nor held")))?;
        LoadedBasket::from_inline(header, ib, range)
    }

    /// Entry made current by the last [`load_entry`](Self::load_entry)
    pub fn current_entry(&self) -> Option<i64> {
        self.cache.loaded.as_ref().map(|_| self.cache.entry)
    }

    /// Decode leaf `leaf` of the current entry
    ///
    /// `count` is the value of the leaf's count leaf for counted arrays.
    /// Element branches decode through the schema of their class.
    pub fn leaf_value(&self, file: &File, leaf: usize, count: Option<i64>) -> Result<LeafValue> {
        self.read_current(file.io.context(), leaf, count)
    }

    fn read_current(&self, ctx: Context<'_>, leaf: usize, count: Option<i64>) -> Result<LeafValue> {
        let basket = self.cache.loaded.as_ref().ok_or_else(|| {
            Error::InvalidArgument(format!("branch {:?} has no entry loaded", self.named.name))
        })?;
        let leaf = self.leaves.get(leaf).ok_or_else(|| {
            Error::InvalidArgument(format!("branch {:?} has no leaf {leaf}", self.named.name))
        })?;
        let pos = basket.entry_pos(self.cache.entry, leaf.offset)?;
        let mut r = RBuffer::with_context(&basket.data, basket.keylen, ctx);
        r.set_pos(pos)?;
        let value = match &self.streamer {
            ElementStreamer::Leaves => leaf.read_value(&mut r, count),
            ElementStreamer::Ready { plan, slot } => {
                let external = count
                    .map(|n| {
                        usize::try_from(n)
                            .map_err(|_| Error::corrupt(leaf.name(), format!("negative count {n}")))
                    })
                    .transpose()?;
                let catalog = ctx.streamers.unwrap_or_else(|| StreamerCatalog::builtin());
                match slot {
                    Some(slot) => plan.decode_field(*slot, catalog, &mut r, external),
                    None => plan.decode(catalog, &mut r, external).map(Value::Record),
                }
            }
            ElementStreamer::Pending { class, .. } => Err(Error::InvalidArgument(format!(
                "schema of {class} not bound for branch {:?}",
                self.named.name
            ))),
        };
        value.context(|| format!("branch {:?}, entry {}", self.named.name, self.cache.entry))
    }

    /// Drop the cached basket
    pub(crate) fn release(&mut self) {
        self.cache = BasketCache::default();
        for sub in &mut self.branches {
            sub.base_mut().release();
        }
    }

    fn unmarshal_body(r: &mut RBuffer<'_>, version: i16) -> Result<Self> {
        let named = Named::unmarshal(r)?;
        let fill = AttFill::unmarshal(r)?;
        let compress = r.read_i32()?;
        let basket_size = r.read_i32()?;
        let entry_offset_len = r.read_i32()?;
        let write_basket = r.read_i32()?;
        let entry_number = r.read_i64()?;
        let io_features = if version >= 13 {
            IoFeatures::unmarshal(r)?
        } else {
            IoFeatures::default()
        };
        let offset = r.read_i32()?;
        let max_baskets = r.read_i32()?;
        let mut split_level = r.read_i32()?;
        let entries = r.read_i64()?;
        let first_entry = if version >= 11 { r.read_i64()? } else { 0 };
        let tot_bytes = r.read_i64()?;
        let zip_bytes = r.read_i64()?;

        let branches = read_obj_array::<AnyBranch>(r)?;
        let leaves = read_obj_array::<Leaf>(r)?;
        let baskets = crate::rtypes::ObjArray::unmarshal(r)?
            .slots
            .into_iter()
            .map(|slot| slot.map(Basket::try_from).transpose())
            .collect::<Result<Vec<_>>>()?;

        if write_basket < 0 || max_baskets < write_basket + 1 {
            return r.fail(Error::corrupt(
                "TBranch",
                format!("{write_basket} written baskets for a table of {max_baskets}"),
            ));
        }
        let (max, written) = (max_baskets as usize, write_basket as usize);
        r.read_i8()?;
        let mut basket_bytes = r.read_fast_array::<i32>(max)?;
        basket_bytes.truncate(written);
        r.read_i8()?;
        let mut basket_entry = r.read_fast_array::<i64>(max)?;
        basket_entry.truncate(written + 1);
        r.read_i8()?;
        let mut basket_seek = r.read_fast_array::<i64>(max)?;
        basket_seek.truncate(written);
        let file_name = r.read_string()?;

        if split_level == 0 && !branches.is_empty() {
            split_level = 1;
        }
        Ok(Self {
            named,
            fill,
            compress,
            basket_size,
            entry_offset_len,
            write_basket,
            entry_number,
            io_features,
            offset,
            max_baskets,
            split_level,
            entries,
            first_entry,
            tot_bytes,
            zip_bytes,
            branches,
            leaves,
            baskets,
            basket_bytes,
            basket_entry,
            basket_seek,
            file_name,
            cache: BasketCache::default(),
            streamer: ElementStreamer::default(),
        })
    }

    fn marshal_body(&self, w: &mut WBuffer) -> Result<()> {
        self.named.marshal(w)?;
        self.fill.marshal(w)?;
        w.write_i32(self.compress);
        w.write_i32(self.basket_size);
        w.write_i32(self.entry_offset_len);
        w.write_i32(self.write_basket);
        w.write_i64(self.entry_number);
        self.io_features.marshal(w)?;
        w.write_i32(self.offset);
        w.write_i32(self.max_baskets);
        w.write_i32(self.split_level);
        w.write_i64(self.entries);
        w.write_i64(self.first_entry);
        w.write_i64(self.tot_bytes);
        w.write_i64(self.zip_bytes);

        let branches: Vec<&dyn Marshal> = self.branches.iter().map(|b| b as &dyn Marshal).collect();
        write_obj_array(w, &branches)?;
        let leaves: Vec<&dyn Marshal> = self.leaves.iter().map(|l| l as &dyn Marshal).collect();
        write_obj_array(w, &leaves)?;
        let baskets: Vec<&dyn Marshal> = self
            .baskets
            .iter()
            .flatten()
            .map(|b| b as &dyn Marshal)
            .collect();
        write_obj_array(w, &baskets)?;

        let max = self.max_baskets.max(0) as usize;
        if self.basket_entry.len() > max {
            return Err(Error::InvalidArgument(format!(
                "branch {:?}: {} basket entries for a table of {max}",
                self.named.name,
                self.basket_entry.len()
            )));
        }
        w.write_i8(1);
        write_padded(w, &self.basket_bytes, max);
        w.write_i8(1);
        write_padded(w, &self.basket_entry, max);
        w.write_i8(1);
        write_padded(w, &self.basket_seek, max);
        w.write_string(&self.file_name);
        Ok(())
    }
}

fn write_padded<T: crate::rbytes::Primitive>(w: &mut WBuffer, values: &[T], len: usize) {
    w.write_fast_array(values);
    for _ in values.len()..len {
        w.write(T::default());
    }
}

impl rootio_core::Object for Branch {
    fn class(&self) -> &str {
        "TBranch"
    }
}

impl Unmarshal for Branch {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TBranch")?;
        if v.version < 10 {
            return r.fail(Error::UnsupportedEncoding(format!("TBranch version {}", v.version)));
        }
        let branch = Self::unmarshal_body(r, v.version)?;
        r.check_byte_count(&v, "TBranch")?;
        Ok(branch)
    }
}

impl Marshal for Branch {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        self.marshal_body(w)?;
        w.set_byte_count(start, "TBranch")
    }
}

/// `TBranchElement`: a branch of an object member, split or streamed whole
#[derive(Debug, Clone, PartialEq)]
pub struct BranchElement {
    pub branch: Branch,
    /// Class of the object this branch stores
    pub class_name: String,
    pub parent: String,
    pub clones: String,
    pub checksum: u32,
    pub class_version: i16,
    /// Serial number of the member in the class descriptor, -1 for the whole object
    pub id: i32,
    pub btype: i32,
    pub stream_type: i32,
    pub maximum: i32,
    pub count: Option<Box<BranchElement>>,
    pub count2: Option<Box<BranchElement>>,
}

impl BranchElement {
    pub const VERSION: i16 = 10;

    /// Element branch storing member `id` of `class`, or whole objects when
    /// `id` is -1, with the entries of `branch`
    pub fn new(mut branch: Branch, class: &str, class_version: i16, checksum: u32, id: i32) -> Self {
        branch.streamer = ElementStreamer::Pending {
            class: class.to_owned(),
            version: class_version,
            checksum,
            id,
        };
        Self {
            branch,
            class_name: class.to_owned(),
            parent: class.to_owned(),
            clones: String::new(),
            checksum,
            class_version,
            id,
            btype: 0,
            stream_type: -1,
            maximum: 0,
            count: None,
            count2: None,
        }
    }

    pub fn name(&self) -> &str {
        self.branch.name()
    }
}

fn read_count(r: &mut RBuffer<'_>) -> Result<Option<Box<BranchElement>>> {
    match r.read_object_any()? {
        None => Ok(None),
        Some(obj) => BranchElement::try_from(obj).map(|b| Some(Box::new(b))),
    }
}

impl rootio_core::Object for BranchElement {
    fn class(&self) -> &str {
        "TBranchElement"
    }
}

impl Unmarshal for BranchElement {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TBranchElement")?;
        if v.version < 9 {
            return r.fail(Error::UnsupportedEncoding(format!(
                "TBranchElement version {}",
                v.version
            )));
        }
        let branch = Branch::unmarshal(r)?;
        let class_name = r.read_string()?;
        let parent = r.read_string()?;
        let clones = r.read_string()?;
        let checksum = r.read_u32()?;
        let class_version = if v.version >= 10 {
            r.read_i16()?
        } else {
            r.read_i32()? as i16
        };
        let id = r.read_i32()?;
        let btype = r.read_i32()?;
        let stream_type = r.read_i32()?;
        let maximum = r.read_i32()?;
        let count = read_count(r)?;
        let count2 = read_count(r)?;
        r.check_byte_count(&v, "TBranchElement")?;
        let mut elem = Self {
            branch,
            class_name,
            parent,
            clones,
            checksum,
            class_version,
            id,
            btype,
            stream_type,
            maximum,
            count,
            count2,
        };
        elem.branch.streamer = ElementStreamer::pending(&elem);
        Ok(elem)
    }
}

impl Marshal for BranchElement {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        self.branch.marshal(w)?;
        w.write_string(&self.class_name);
        w.write_string(&self.parent);
        w.write_string(&self.clones);
        w.write_u32(self.checksum);
        w.write_i16(self.class_version);
        w.write_i32(self.id);
        w.write_i32(self.btype);
        w.write_i32(self.stream_type);
        w.write_i32(self.maximum);
        w.write_object_any(self.count.as_deref().map(|b| b as &dyn Marshal))?;
        w.write_object_any(self.count2.as_deref().map(|b| b as &dyn Marshal))?;
        w.set_byte_count(start, "TBranchElement")
    }
}

/// Either branch class, as found in branch arrays
#[derive(Debug, Clone, PartialEq)]
pub enum AnyBranch {
    Plain(Branch),
    Element(BranchElement),
}

impl AnyBranch {
    /// The `TBranch` part
    pub fn base(&self) -> &Branch {
        match self {
            AnyBranch::Plain(b) => b,
            AnyBranch::Element(b) => &b.branch,
        }
    }

    pub fn base_mut(&mut self) -> &mut Branch {
        match self {
            AnyBranch::Plain(b) => b,
            AnyBranch::Element(b) => &mut b.branch,
        }
    }

    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn as_element(&self) -> Option<&BranchElement> {
        match self {
            AnyBranch::Element(b) => Some(b),
            AnyBranch::Plain(_) => None,
        }
    }
}

impl From<Branch> for AnyBranch {
    fn from(b: Branch) -> Self {
        AnyBranch::Plain(b)
    }
}

impl From<BranchElement> for AnyBranch {
    fn from(b: BranchElement) -> Self {
        AnyBranch::Element(b)
    }
}

impl TryFrom<Object> for AnyBranch {
    type Error = Error;

    fn try_from(obj: Object) -> Result<Self> {
        match obj {
            Object::Branch(b) => Ok(AnyBranch::Plain(*b)),
            Object::BranchElement(b) => Ok(AnyBranch::Element(*b)),
            other => Err(Error::mismatch("TBranch", other.class())),
        }
    }
}

impl rootio_core::Object for AnyBranch {
    fn class(&self) -> &str {
        match self {
            AnyBranch::Plain(b) => rootio_core::Object::class(b),
            AnyBranch::Element(b) => rootio_core::Object::class(b),
        }
    }
}

impl Marshal for AnyBranch {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        match self {
            AnyBranch::Plain(b) => b.marshal(w),
            AnyBranch::Element(b) => b.marshal(w),
        }
    }
}
