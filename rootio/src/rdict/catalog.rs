//! Registry of class schemas and their compiled plans

use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;

use super::bootstrap;
use super::info::StreamerInfo;
use super::plan::{Plan, MEMBER_WISE};
use super::stl::{container_plan, is_container};
use super::value::{Record, Value};
use crate::rbytes::RBuffer;
use crate::rtypes::{List, Object, Opaque};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    info: Arc<StreamerInfo>,
    plan: Arc<Plan>,
}

/// Schemas keyed by (class, version), each compiled once on registration
///
/// Registering the same (class, version, checksum) twice is a no-op; the same
/// (class, version) with another checksum is a [`Error::SchemaConflict`].
#[derive(Debug, Clone, Default)]
pub struct StreamerCatalog {
    classes: HashMap<String, Vec<Entry>>,
    order: Vec<(String, i32)>,
    renames: HashMap<String, HashMap<String, String>>,
}

impl StreamerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors of the classes this crate writes itself
    pub fn builtin() -> &'static StreamerCatalog {
        static BUILTIN_CATALOG: OnceLock<StreamerCatalog> = OnceLock::new();
        BUILTIN_CATALOG.get_or_init(|| {
            let mut catalog = StreamerCatalog::new();
            for info in bootstrap::infos() {
                catalog.insert(info);
            }
            catalog
        })
    }

    /// Catalog read from a file's `StreamerInfo` list
    ///
    /// Entries other than descriptors, such as schema rules, are skipped.
    pub fn from_list(list: &List) -> Result<Self> {
        let mut catalog = Self::new();
        for item in list.iter() {
            match item {
                Object::StreamerInfo(info) => {
                    catalog.add((**info).clone())?;
                }
                other => tracing::trace!(class = other.class(), "skipping catalog entry"),
            }
        }
        Ok(catalog)
    }

    /// Descriptors in registration order, as stored in a file
    pub fn to_list(&self) -> List {
        List::new(self.infos().cloned().map(Object::from).collect())
    }

    /// Register a descriptor and compile its plan
    ///
    /// Returns whether the descriptor was new.
    pub fn add(&mut self, info: StreamerInfo) -> Result<bool> {
        if let Some(existing) = self.get(&info.name, info.class_version) {
            if existing.checksum == info.checksum {
                return Ok(false);
            }
            tracing::warn!(
                class = %info.name,
                version = info.class_version,
                existing = existing.checksum,
                incoming = info.checksum,
                "schema conflict"
            );
            return Err(Error::SchemaConflict {
                class: info.name,
                version: info.class_version,
                existing: existing.checksum,
                incoming: info.checksum,
            });
        }
        tracing::debug!(class = %info.name, version = info.class_version, "registered streamer info");
        self.insert(info);
        Ok(true)
    }

    fn insert(&mut self, info: StreamerInfo) {
        let info = Arc::new(info);
        let plan = self.compile(&info);
        self.order.push((info.name.clone(), info.class_version));
        let entries = self.classes.entry(info.name.clone()).or_default();
        let at = entries.partition_point(|e| e.info.class_version < info.class_version);
        entries.insert(at, Entry { info, plan });
    }

    fn compile(&self, info: &Arc<StreamerInfo>) -> Arc<Plan> {
        static NO_RENAMES: OnceLock<HashMap<String, String>> = OnceLock::new();
        let renames = self
            .renames
            .get(&info.name)
            .unwrap_or_else(|| NO_RENAMES.get_or_init(HashMap::new));
        Arc::new(Plan::compile(Arc::clone(info), renames))
    }

    /// Decode member `from` of `class` into the field `to`
    ///
    /// Plans already compiled for the class are rebuilt.
    pub fn rename(&mut self, class: &str, from: &str, to: &str) {
        self.renames
            .entry(class.to_owned())
            .or_default()
            .insert(from.to_owned(), to.to_owned());
        let infos: Vec<_> = self
            .classes
            .get(class)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.info)).collect())
            .unwrap_or_default();
        let plans: Vec<_> = infos.iter().map(|info| self.compile(info)).collect();
        if let Some(entries) = self.classes.get_mut(class) {
            for (entry, plan) in entries.iter_mut().zip(plans) {
                entry.plan = plan;
            }
        }
    }

    /// Add `class` and every class it depends on from `source`
    ///
    /// Classes already present are left alone.
    pub fn import(&mut self, class: &str, source: &StreamerCatalog) -> Result<()> {
        let mut pending = vec![class.to_owned()];
        while let Some(class) = pending.pop() {
            if self.classes.contains_key(&class) {
                continue;
            }
            let Some(entry) = source.classes.get(&class).and_then(|e| e.last()) else {
                continue;
            };
            pending.extend(entry.plan.dependencies().into_iter().map(str::to_owned));
            self.add((*entry.info).clone())?;
        }
        Ok(())
    }

    /// Descriptor of an exact (class, version)
    pub fn get(&self, class: &str, version: i32) -> Option<&StreamerInfo> {
        self.entry(class, version).map(|e| &*e.info)
    }

    /// Highest registered version of `class`
    pub fn latest(&self, class: &str) -> Option<&StreamerInfo> {
        self.classes.get(class)?.last().map(|e| &*e.info)
    }

    /// Any registered version of `class` with the given checksum
    pub fn by_checksum(&self, class: &str, checksum: u32) -> Option<&StreamerInfo> {
        self.classes
            .get(class)?
            .iter()
            .find(|e| e.info.checksum == checksum)
            .map(|e| &*e.info)
    }

    fn entry(&self, class: &str, version: i32) -> Option<&Entry> {
        self.classes
            .get(class)?
            .iter()
            .find(|e| e.info.class_version == version)
    }

    /// Plan for `class`: the exact version when given and known, else the
    /// latest one, else a synthesized container layout
    pub fn plan(&self, class: &str, version: Option<i32>) -> Option<Arc<Plan>> {
        if let Some(entries) = self.classes.get(class) {
            let exact = version.and_then(|v| entries.iter().find(|e| e.info.class_version == v));
            return exact.or(entries.last()).map(|e| Arc::clone(&e.plan));
        }
        container_plan(class).map(Arc::new)
    }

    /// Whether `class` can be decoded from this catalog
    pub fn knows(&self, class: &str) -> bool {
        self.classes.contains_key(class) || is_container(class)
    }

    /// Decode a record of `class` at the cursor
    pub fn decode(&self, class: &str, r: &mut RBuffer<'_>, external: Option<usize>) -> Result<Record> {
        let version = if self.classes.contains_key(class) {
            let start = r.pos();
            let v = r.read_version(class)?;
            r.set_pos(start)?;
            Some(i32::from(v.version & !MEMBER_WISE))
        } else {
            None
        };
        let Some(plan) = self.plan(class, version) else {
            return r.fail(Error::UnknownClass(class.to_owned()));
        };
        if let Some(v) = version {
            if i32::from(plan.version) != v {
                tracing::debug!(class, stored = v, using = plan.version, "no exact schema version");
            }
        }
        plan.decode(self, r, external)
    }

    /// Decode an embedded value of `class`, preferring built-in types, then
    /// schemas, then keeping the enveloped bytes
    pub(crate) fn read_embedded(&self, class: &str, r: &mut RBuffer<'_>) -> Result<Value> {
        if r.context().registry.contains(class) {
            return r.read_class(class).map(|obj| Value::Object(Some(Box::new(obj))));
        }
        if self.knows(class) {
            return self.decode(class, r, None).map(Value::Record);
        }

        let start = r.pos();
        let v = r.read_version(class)?;
        r.set_pos(start)?;
        let bytes = r.read_bytes((v.end() - start) as usize)?.to_vec();
        tracing::debug!(class, len = bytes.len(), "no schema for embedded class, kept opaque");
        Ok(Value::Object(Some(Box::new(Object::Opaque(Opaque {
            class: class.to_owned(),
            bytes,
        })))))
    }

    /// Descriptors in registration order
    pub fn infos(&self) -> impl Iterator<Item = &StreamerInfo> {
        self.order.iter().filter_map(|(class, version)| self.get(class, *version))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbytes::{Context, Marshal, WBuffer};
    use crate::rdict::StreamerElement;
    use crate::rtypes::ClassRegistry;
    use rootio_core::format::constants::stl;
    use rootio_core::format::etype::code;
    use rootio_core::Scalar;

    fn track(version: i32) -> StreamerInfo {
        StreamerInfo::new(
            "Track",
            version,
            vec![
                StreamerElement::basic("px", Scalar::F32),
                StreamerElement::basic("py", Scalar::F32),
            ],
        )
    }

    fn event() -> StreamerInfo {
        StreamerInfo::new(
            "Event",
            4,
            vec![
                StreamerElement::base("TObject", 1),
                StreamerElement::basic("run", Scalar::U32),
                StreamerElement::object("lead", "Track"),
                StreamerElement::stl("tracks", "vector<Track>", stl::VECTOR, code::OBJECT),
                StreamerElement::stl("tags", "map<int,string>", stl::MAP, code::STL_STRING),
                StreamerElement::std_string("comment"),
                StreamerElement::object_pointer("next", "TNamed"),
            ],
        )
    }

    fn catalog() -> StreamerCatalog {
        let mut catalog = StreamerCatalog::new();
        catalog.add(track(2)).unwrap();
        catalog.add(event()).unwrap();
        catalog
    }

    fn track_record(catalog: &StreamerCatalog, px: f32) -> Value {
        let mut rec = Record::new(catalog.plan("Track", None).unwrap());
        rec.set("px", Value::F32(px)).unwrap();
        rec.set("py", Value::F32(-px)).unwrap();
        Value::Record(rec)
    }

    #[test]
    fn test_identical_registration_is_noop() {
        let mut catalog = catalog();
        assert!(!catalog.add(track(2)).unwrap());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_schema_conflict() {
        let mut catalog = catalog();
        let mut other = track(2);
        other.elements.push(StreamerElement::basic("pz", Scalar::F32));
        other.checksum = other.compute_checksum();
        let err = catalog.add(other).unwrap_err();
        assert!(matches!(err, Error::SchemaConflict { ref class, version: 2, .. } if class == "Track"));
    }

    #[test]
    fn test_latest_and_exact() {
        let mut catalog = catalog();
        catalog.add(track(5)).unwrap();
        catalog.add(track(3)).unwrap();
        assert_eq!(catalog.latest("Track").unwrap().class_version, 5);
        assert_eq!(catalog.get("Track", 3).unwrap().class_version, 3);
        assert_eq!(catalog.plan("Track", Some(2)).unwrap().version, 2);
        assert_eq!(catalog.plan("Track", Some(9)).unwrap().version, 5);
        assert!(catalog.plan("Missing", None).is_none());
        assert!(catalog.plan("vector<Track>", None).is_some());
    }

    #[test]
    fn test_nested_record_roundtrip() {
        let catalog = catalog();
        let mut rec = Record::new(catalog.plan("Event", None).unwrap());
        rec.set("run", Value::U32(7)).unwrap();
        rec.set("lead", track_record(&catalog, 1.0)).unwrap();
        rec.set(
            "tracks",
            Value::Array(vec![track_record(&catalog, 2.0), track_record(&catalog, 3.0)]),
        )
        .unwrap();
        rec.set(
            "tags",
            Value::Map(vec![(Value::I32(1), Value::String("muon".into()))]),
        )
        .unwrap();
        rec.set("comment", Value::String("ok".into())).unwrap();
        rec.set(
            "next",
            Value::Object(Some(Box::new(Object::Named(crate::rtypes::Named::new("n", "t"))))),
        )
        .unwrap();

        let mut w = WBuffer::new(0);
        rec.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();

        let ctx = Context {
            registry: ClassRegistry::builtin(),
            streamers: Some(&catalog),
        };
        let mut r = RBuffer::with_context(&bytes, 0, ctx);
        let back = catalog.decode("Event", &mut r, None).unwrap();
        assert!(r.is_empty());
        assert_eq!(back, rec);
        let tracks = back.get("tracks").and_then(Value::as_slice).unwrap();
        assert_eq!(tracks[1].as_record().unwrap().get("px"), Some(&Value::F32(3.0)));
    }

    #[test]
    fn test_unknown_embedded_class_kept_opaque() {
        let mut catalog = StreamerCatalog::new();
        catalog
            .add(StreamerInfo::new(
                "Holder",
                1,
                vec![
                    StreamerElement::object("blob", "Mystery"),
                    StreamerElement::basic("after", Scalar::I16),
                ],
            ))
            .unwrap();

        let mut w = WBuffer::new(0);
        let outer = w.write_version(1);
        let inner = w.write_version(3);
        w.write_u32(0xdead_beef);
        w.set_byte_count(inner, "Mystery").unwrap();
        w.write_i16(-4);
        w.set_byte_count(outer, "Holder").unwrap();
        let bytes = w.into_bytes();

        let rec = catalog.decode("Holder", &mut RBuffer::new(&bytes, 0), None).unwrap();
        assert_eq!(rec.get("after"), Some(&Value::I16(-4)));
        let Some(Value::Object(Some(blob))) = rec.get("blob") else {
            panic!("blob not decoded");
        };
        assert!(matches!(&**blob, Object::Opaque(o) if o.class == "Mystery" && o.bytes.len() == 10));
    }

    #[test]
    fn test_rename_recompiles() {
        let mut catalog = catalog();
        catalog.rename("Track", "px", "momentum_x");
        let plan = catalog.plan("Track", None).unwrap();
        assert_eq!(plan.slot("momentum_x"), Some(0));
    }

    #[test]
    fn test_import_pulls_dependencies() {
        let source = catalog();
        let mut target = StreamerCatalog::new();
        target.import("Event", &source).unwrap();
        assert!(target.latest("Event").is_some());
        assert!(target.latest("Track").is_some());
    }

    #[test]
    fn test_list_roundtrip() {
        let catalog = catalog();
        let list = catalog.to_list();
        assert_eq!(list.len(), 2);
        let back = StreamerCatalog::from_list(&list).unwrap();
        assert_eq!(
            back.infos().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            ["Track", "Event"]
        );
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = StreamerCatalog::builtin();
        for class in ["TObject", "TNamed", "TObjString", "TList", "TTree", "TBranch", "TLeafI", "TKey"] {
            assert!(catalog.latest(class).is_some(), "{class}");
        }
    }
}
