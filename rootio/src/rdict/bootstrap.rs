//! Descriptors of the core classes
//!
//! Written into files next to the classes this crate stores, and used to
//! decode them when a file carries no catalog of its own.

use rootio_core::format::constants::stl;
use rootio_core::format::etype::code;
use rootio_core::Scalar::{self, Bool, Double32, Float16, F32, F64, I16, I32, I64, I8, U32, U8};

use super::element::StreamerElement as E;
use super::info::StreamerInfo;

fn leaf(class: &str, scalar: Scalar) -> StreamerInfo {
    StreamerInfo::new(
        class,
        1,
        vec![
            E::base("TLeaf", 2),
            E::basic("fMinimum", scalar),
            E::basic("fMaximum", scalar),
        ],
    )
}

/// Every bootstrap descriptor, bases before the classes deriving from them
pub fn infos() -> Vec<StreamerInfo> {
    let mut out = vec![
        StreamerInfo::new(
            "TObject",
            1,
            vec![E::basic("fUniqueID", U32), E::basic("fBits", U32)],
        ),
        StreamerInfo::new(
            "TNamed",
            1,
            vec![E::base("TObject", 1), E::string("fName"), E::string("fTitle")],
        ),
        StreamerInfo::new(
            "TObjString",
            1,
            vec![E::base("TObject", 1), E::string("fString")],
        ),
        StreamerInfo::new(
            "TCollection",
            3,
            vec![E::base("TObject", 1), E::string("fName"), E::basic("fSize", I32)],
        ),
        StreamerInfo::new("TSeqCollection", 0, vec![E::base("TCollection", 3)]),
        StreamerInfo::new("TList", 5, vec![E::base("TSeqCollection", 0)]),
        StreamerInfo::new(
            "TObjArray",
            3,
            vec![
                E::base("TSeqCollection", 0),
                E::basic("fLowerBound", I32),
                E::basic("fLast", I32),
            ],
        ),
        StreamerInfo::new("TArray", 1, vec![E::basic("fN", I32)]),
        StreamerInfo::new(
            "TArrayI",
            1,
            vec![E::base("TArray", 1), E::counted("fArray", I32, "fN", "TArray")],
        ),
        StreamerInfo::new(
            "TArrayD",
            1,
            vec![E::base("TArray", 1), E::counted("fArray", F64, "fN", "TArray")],
        ),
        StreamerInfo::new("TDatime", 1, vec![E::basic("fDatime", U32)]),
        StreamerInfo::new(
            "TKey",
            4,
            vec![
                E::base("TNamed", 1),
                E::basic("fVersion", I32),
                E::basic("fNbytes", I32),
                E::basic("fObjlen", I32),
                E::object("fDatime", "TDatime"),
                E::basic("fKeylen", I16),
                E::basic("fCycle", I16),
                E::basic("fSeekKey", I64),
                E::basic("fSeekPdir", I64),
                E::string("fClassName"),
            ],
        ),
        StreamerInfo::new(
            "TDirectory",
            5,
            vec![
                E::base("TNamed", 1),
                E::object_pointer("fMother", "TObject"),
                E::object_pointer("fList", "TList"),
            ],
        ),
        StreamerInfo::new(
            "TAttLine",
            2,
            vec![
                E::basic("fLineColor", I16),
                E::basic("fLineStyle", I16),
                E::basic("fLineWidth", I16),
            ],
        ),
        StreamerInfo::new(
            "TAttFill",
            2,
            vec![E::basic("fFillColor", I16), E::basic("fFillStyle", I16)],
        ),
        StreamerInfo::new(
            "TAttMarker",
            2,
            vec![
                E::basic("fMarkerColor", I16),
                E::basic("fMarkerStyle", I16),
                E::basic("fMarkerSize", F32),
            ],
        ),
        StreamerInfo::new("ROOT::TIOFeatures", 1, vec![E::basic("fIOBits", U8)]),
        StreamerInfo::new(
            "TTree",
            20,
            vec![
                E::base("TNamed", 1),
                E::base("TAttLine", 2),
                E::base("TAttFill", 2),
                E::base("TAttMarker", 2),
                E::basic("fEntries", I64),
                E::basic("fTotBytes", I64),
                E::basic("fZipBytes", I64),
                E::basic("fSavedBytes", I64),
                E::basic("fFlushedBytes", I64),
                E::basic("fWeight", F64),
                E::basic("fTimerInterval", I32),
                E::basic("fScanField", I32),
                E::basic("fUpdate", I32),
                E::basic("fDefaultEntryOffsetLen", I32),
                E::basic("fNClusterRange", I32),
                E::basic("fMaxEntries", I64),
                E::basic("fMaxEntryLoop", I64),
                E::basic("fMaxVirtualSize", I64),
                E::basic("fAutoSave", I64),
                E::basic("fAutoFlush", I64),
                E::basic("fEstimate", I64),
                E::counted("fClusterRangeEnd", I64, "fNClusterRange", "TTree"),
                E::counted("fClusterSize", I64, "fNClusterRange", "TTree"),
                E::object("fIOFeatures", "ROOT::TIOFeatures"),
                E::object("fBranches", "TObjArray"),
                E::object("fLeaves", "TObjArray"),
                E::object_pointer("fAliases", "TList"),
                E::object_pointer("fIndexValues", "TArrayD"),
                E::object_pointer("fIndex", "TArrayI"),
                E::object_pointer("fTreeIndex", "TVirtualIndex"),
                E::object_pointer("fFriends", "TList"),
                E::object_pointer("fUserInfo", "TList"),
                E::object_pointer("fBranchRef", "TBranchRef"),
            ],
        ),
        StreamerInfo::new(
            "TBranch",
            13,
            vec![
                E::base("TNamed", 1),
                E::base("TAttFill", 2),
                E::basic("fCompress", I32),
                E::basic("fBasketSize", I32),
                E::basic("fEntryOffsetLen", I32),
                E::basic("fWriteBasket", I32),
                E::basic("fEntryNumber", I64),
                E::object("fIOFeatures", "ROOT::TIOFeatures"),
                E::basic("fOffset", I32),
                E::basic("fMaxBaskets", I32),
                E::basic("fSplitLevel", I32),
                E::basic("fEntries", I64),
                E::basic("fFirstEntry", I64),
                E::basic("fTotBytes", I64),
                E::basic("fZipBytes", I64),
                E::object("fBranches", "TObjArray"),
                E::object("fLeaves", "TObjArray"),
                E::object("fBaskets", "TObjArray"),
                E::counted("fBasketBytes", I32, "fMaxBaskets", "TBranch"),
                E::counted("fBasketEntry", I64, "fMaxBaskets", "TBranch"),
                E::counted("fBasketSeek", I64, "fMaxBaskets", "TBranch"),
                E::string("fFileName"),
            ],
        ),
        StreamerInfo::new(
            "TBranchElement",
            10,
            vec![
                E::base("TBranch", 13),
                E::string("fClassName"),
                E::string("fParentName"),
                E::string("fClonesName"),
                E::basic("fCheckSum", U32),
                E::basic("fClassVersion", I16),
                E::basic("fID", I32),
                E::basic("fType", I32),
                E::basic("fStreamerType", I32),
                E::basic("fMaximum", I32),
                E::object_pointer("fBranchCount", "TBranchElement"),
                E::object_pointer("fBranchCount2", "TBranchElement"),
            ],
        ),
        StreamerInfo::new(
            "TLeaf",
            2,
            vec![
                E::base("TNamed", 1),
                E::basic("fLen", I32),
                E::basic("fLenType", I32),
                E::basic("fOffset", I32),
                E::basic("fIsRange", Bool),
                E::basic("fIsUnsigned", Bool),
                E::object_pointer("fLeafCount", "TLeaf"),
            ],
        ),
        leaf("TLeafO", Bool),
        leaf("TLeafB", I8),
        leaf("TLeafS", I16),
        leaf("TLeafI", I32),
        leaf("TLeafL", I64),
        leaf("TLeafF", F32),
        leaf("TLeafD", F64),
        leaf("TLeafD32", Double32),
        leaf("TLeafF16", Float16),
        leaf("TLeafC", I32),
        StreamerInfo::new(
            "TLeafElement",
            1,
            vec![E::base("TLeaf", 2), E::basic("fID", I32), E::basic("fType", I32)],
        ),
        StreamerInfo::new(
            "TBasket",
            3,
            vec![
                E::base("TKey", 4),
                E::basic("fBufferSize", I32),
                E::basic("fNevBufSize", I32),
                E::basic("fNevBuf", I32),
                E::basic("fLast", I32),
            ],
        ),
    ];

    // collections of strings show up in user data often enough to ship
    out.push(StreamerInfo::new(
        "vector<string>",
        6,
        vec![E::stl("This", "vector<string>", stl::VECTOR, code::STL_STRING)],
    ));
    out
}
