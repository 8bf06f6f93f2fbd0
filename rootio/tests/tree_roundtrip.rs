use std::path::Path;

use rootio::rtree::BranchElement;
use rootio::{
    Algorithm, Datime, Error, File, FileConfig, LeafValue, ScanEntry, Scanner, Settings, TreeConfig,
};

const ENTRIES: i64 = 100;

fn write_events(path: &Path, config: TreeConfig) {
    let stamp = Datime::from_unix(1_700_000_000).pack();
    let mut file = File::create_with(path, FileConfig::default().with_datime(stamp)).unwrap();
    let mut w = file.tree_writer("events", config.with_title("test events")).unwrap();
    w.branch("i/I").unwrap();
    w.branch("px/D").unwrap();
    w.branch("n/I").unwrap();
    w.branch("hits[n]/F").unwrap();
    w.branch("pos[3]/S").unwrap();
    w.string_branch("label").unwrap();

    for i in 0..ENTRIES {
        let values = [
            LeafValue::I32(i as i32),
            LeafValue::F64(i as f64 * 1.5),
            LeafValue::I32((i % 4) as i32),
            LeafValue::Array(hits(i).into_iter().map(LeafValue::F32).collect()),
            LeafValue::Array((0..3).map(|k| LeafValue::I16((i * 3 + k) as i16)).collect()),
            LeafValue::String(format!("evt{i}")),
        ];
        w.fill(&values).unwrap();
    }
    assert_eq!(w.close().unwrap(), 1);
    drop(w);
    file.close().unwrap();
}

fn hits(i: i64) -> Vec<f32> {
    (0..i % 4).map(|k| i as f32 + k as f32 * 0.25).collect()
}

fn branch_index(tree: &rootio::Tree, name: &str) -> usize {
    tree.branches().iter().position(|b| b.name() == name).unwrap()
}

#[test]
fn test_tree_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    write_events(&path, TreeConfig::default().with_basket_entries(40));

    let file = File::open(&path).unwrap();
    assert_eq!(file.key("events").unwrap().class(), "TTree");
    for class in ["TTree", "TBranch", "TLeafI", "TLeafD", "TLeafF", "TLeafS", "TLeafC", "TBasket"] {
        assert!(file.streamer_info(class).is_some(), "{class}");
    }

    let tree = file.tree("events").unwrap();
    assert_eq!(tree.entries(), ENTRIES);
    assert_eq!(tree.title(), "test events");
    assert_eq!(tree.branches().len(), 6);
    for b in tree.branches() {
        let b = b.base();
        assert_eq!(b.entries, ENTRIES, "{}", b.name());
        assert_eq!(b.basket_entry, vec![0, 40, 80, 100], "{}", b.name());
        assert_eq!(b.basket_seek.len(), 3);
        assert!(b.basket_seek.iter().all(|&s| s > 0));
    }

    let hits = tree.leaf("hits").unwrap();
    assert_eq!(hits.count_name(), Some("n"));
    assert_eq!(tree.leaf("n").unwrap().maximum(), Some(3));
    assert!(matches!(tree.branch("missing"), Err(Error::BranchNotFound(_))));
}

#[test]
fn test_sequential_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    write_events(&path, TreeConfig::default().with_basket_entries(40));

    let file = File::open(&path).unwrap();
    let tree = file.tree("events").unwrap();
    let mut sc = Scanner::new(&file, tree).unwrap();
    let mut seen = 0;
    while sc.next() {
        sc.scan().unwrap();
        let i = sc.entry();
        assert_eq!(i, seen);
        assert_eq!(sc.value("i"), Some(&LeafValue::I32(i as i32)));
        assert_eq!(sc.value("px"), Some(&LeafValue::F64(i as f64 * 1.5)));
        let got: Vec<f32> = sc.value("hits").cloned().unwrap().try_into().unwrap();
        assert_eq!(got, hits(i));
        let pos: Vec<i16> = sc.value("pos").cloned().unwrap().try_into().unwrap();
        assert_eq!(pos, vec![(i * 3) as i16, (i * 3 + 1) as i16, (i * 3 + 2) as i16]);
        assert_eq!(sc.value("label"), Some(&LeafValue::String(format!("evt{i}"))));
        seen += 1;
    }
    assert_eq!(seen, ENTRIES);
    assert!(sc.err().is_none());
    sc.close();
    assert!(matches!(sc.scan(), Err(Error::Closed)));
}

#[test]
fn test_random_access_across_baskets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    write_events(&path, TreeConfig::default().with_basket_entries(40));

    let file = File::open(&path).unwrap();
    let mut tree = file.tree("events").unwrap();
    let at = branch_index(&tree, "px");
    let px = tree.branches[at].base_mut();
    for entry in [50, 49, 99, 0, 40, 39] {
        px.load_entry(&file, entry).unwrap();
        assert_eq!(px.current_entry(), Some(entry));
        assert_eq!(px.leaf_value(&file, 0, None).unwrap(), LeafValue::F64(entry as f64 * 1.5));
    }
    assert!(px.load_entry(&file, ENTRIES).is_err());

    let at = branch_index(&tree, "label");
    let label = tree.branches[at].base_mut();
    label.load_entry(&file, 50).unwrap();
    assert_eq!(label.leaf_value(&file, 0, None).unwrap().as_str(), Some("evt50"));
    label.load_entry(&file, 49).unwrap();
    assert_eq!(label.leaf_value(&file, 0, None).unwrap().as_str(), Some("evt49"));
}

#[test]
fn test_seek_and_selected_vars() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    write_events(&path, TreeConfig::default().with_basket_entries(40));

    let file = File::open(&path).unwrap();
    let tree = file.tree("events").unwrap();
    // `n` is bound implicitly as the count of `hits`
    let mut sc = Scanner::with_vars(&file, tree, &["hits", "px"]).unwrap();
    assert!(matches!(sc.scan(), Err(Error::InvalidArgument(_))));

    for entry in [50, 49, 7] {
        sc.seek_entry(entry).unwrap();
        assert!(sc.next());
        sc.scan().unwrap();
        assert_eq!(sc.entry(), entry);
        let values = sc.values();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], LeafValue::F64(entry as f64 * 1.5));
        assert_eq!(sc.value("n"), Some(&LeafValue::I32((entry % 4) as i32)));
    }
    assert!(sc.seek_entry(ENTRIES).is_err());
    sc.seek_entry(ENTRIES - 1).unwrap();
    assert!(sc.next());
    assert!(!sc.next());
}

#[derive(Debug, PartialEq)]
struct Event {
    i: i32,
    hits: Vec<f32>,
    label: String,
}

impl ScanEntry for Event {
    fn branches() -> &'static [&'static str] {
        &["i", "hits", "label"]
    }

    fn from_values(values: Vec<LeafValue>) -> rootio::Result<Self> {
        let mut it = values.into_iter();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::InvalidArgument("short entry".into()))
        };
        Ok(Event {
            i: next()?.try_into()?,
            hits: next()?.try_into()?,
            label: next()?.try_into()?,
        })
    }
}

#[test]
fn test_scan_into_struct() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    write_events(&path, TreeConfig::default().with_basket_entries(40));

    let file = File::open(&path).unwrap();
    let tree = file.tree("events").unwrap();
    let mut sc = Scanner::with_entry::<Event>(&file, tree).unwrap();
    let mut events = Vec::new();
    while sc.next() {
        events.push(sc.scan_into::<Event>().unwrap());
    }
    assert_eq!(events.len(), ENTRIES as usize);
    assert_eq!(
        events[6],
        Event {
            i: 6,
            hits: hits(6),
            label: "evt6".into()
        }
    );
}

#[test]
fn test_compressed_baskets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("packed.root");
    let config = TreeConfig::default()
        .with_basket_entries(500)
        .with_settings(Settings::new(Algorithm::Zlib, 6));
    {
        let mut file = File::create(&path).unwrap();
        let mut w = file.tree_writer("t", config).unwrap();
        w.branch("x/D").unwrap();
        for i in 0..1000 {
            w.fill(&[LeafValue::F64((i % 10) as f64)]).unwrap();
        }
        w.close().unwrap();
        drop(w);
        file.close().unwrap();
    }

    let file = File::open(&path).unwrap();
    let tree = file.tree("t").unwrap();
    let x = tree.branch("x").unwrap().base();
    assert_eq!(x.basket_seek.len(), 2);
    // 500 doubles plus the basket key, stored in far fewer bytes
    assert!(x.basket_bytes.iter().all(|&n| n < 2000), "{:?}", x.basket_bytes);

    let mut sc = Scanner::with_vars(&file, tree, &["x"]).unwrap();
    let mut sum = 0.0;
    while sc.next() {
        sc.scan().unwrap();
        sum += sc.values()[0].as_f64().unwrap();
    }
    assert_eq!(sum, 4500.0);
}

#[test]
fn test_corrupted_basket_stops_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    write_events(&path, TreeConfig::default().with_basket_entries(40));

    let seek = {
        let file = File::open(&path).unwrap();
        let tree = file.tree("events").unwrap();
        tree.branch("px").unwrap().base().basket_seek[1]
    };
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[seek as usize..seek as usize + 4].copy_from_slice(&(-16i32).to_be_bytes());

    let file = File::from_bytes(bytes).unwrap();
    let tree = file.tree("events").unwrap();
    let mut sc = Scanner::with_vars(&file, tree, &["px"]).unwrap();
    let mut ok = 0;
    while sc.next() {
        if sc.scan().is_err() {
            break;
        }
        ok += 1;
    }
    assert_eq!(ok, 40);
    let err = sc.err().unwrap();
    assert!(err.is_corruption(), "{err}");
    assert!(err.to_string().contains("px"), "{err}");
    assert!(!sc.next());
}

#[test]
fn test_element_branch_uses_file_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("colors.root");
    {
        let mut file = File::create(&path).unwrap();
        let mut w = file.tree_writer("t", TreeConfig::default()).unwrap();
        w.branch("c/S").unwrap();
        for i in 0..10 {
            w.fill(&[LeafValue::I16(i)]).unwrap();
        }
        w.close().unwrap();
        drop(w);
        file.close().unwrap();
    }

    let file = File::open(&path).unwrap();
    // written along with the tree, as a base class of TTree
    let info = file.streamer_info("TAttLine").unwrap();
    let (version, checksum) = (info.class_version as i16, info.checksum);
    let as_element = |class: &str, version: i16, checksum: u32| {
        let mut tree = file.tree("t").unwrap();
        let base = tree.branches[0].base().clone();
        tree.branches[0] = BranchElement::new(base, class, version, checksum, 0).into();
        tree
    };

    let mut sc = Scanner::with_vars(&file, as_element("TAttLine", version, checksum), &["c"]).unwrap();
    let mut seen = 0;
    while sc.next() {
        sc.scan().unwrap();
        assert_eq!(sc.values()[0], LeafValue::I16(seen));
        seen += 1;
    }
    assert_eq!(seen, 10);

    let err = Scanner::with_vars(&file, as_element("Ghost", 7, 0xdead_beef), &["c"]).unwrap_err();
    assert!(matches!(err.root_cause(), Error::UnknownClass(c) if c == "Ghost"), "{err}");

    let err = Scanner::with_vars(&file, as_element("TAttLine", version, checksum ^ 1), &["c"]).unwrap_err();
    assert!(matches!(err.root_cause(), Error::SchemaConflict { .. }), "{err}");

    // direct reads bind the schema too
    let mut tree = as_element("Ghost", 7, 0xdead_beef);
    let err = tree.branches[0].base_mut().load_entry(&file, 0).unwrap_err();
    assert!(matches!(err.root_cause(), Error::UnknownClass(_)), "{err}");
}
