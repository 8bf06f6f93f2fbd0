//! File and tree settings
//!
//! Both configs are plain builders: start from `Default` and chain `with_*`
//! calls. With the `serde` feature they also load from JSON.

use rootio_core::{Algorithm, Settings};

/// How a member of a stored class is renamed while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rename {
    pub class: String,
    pub from: String,
    pub to: String,
}

/// Configuration for opening and creating files
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FileConfig {
    /// Compression of keys written to the file
    pub settings: Settings,
    /// Map read-only files into memory instead of reading through a handle
    pub mmap: bool,
    /// Fixed packed date stamp for every record written, for reproducible output
    pub datime: Option<u32>,
    /// Member renames applied to every schema of the named class
    pub renames: Vec<Rename>,
    /// Title of the root directory of created files
    pub title: String,
}

impl FileConfig {
    /// Set the compression of written keys
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Shorthand for [`FileConfig::with_settings`]
    pub fn with_compression(self, algorithm: Algorithm, level: u8) -> Self {
        self.with_settings(Settings::new(algorithm, level))
    }

    pub fn with_mmap(mut self, mmap: bool) -> Self {
        self.mmap = mmap;
        self
    }

    /// Stamp every written record with `datime` instead of the current time
    pub fn with_datime(mut self, datime: u32) -> Self {
        self.datime = Some(datime);
        self
    }

    /// Decode member `from` of `class` into the field `to`
    pub fn with_rename(mut self, class: &str, from: &str, to: &str) -> Self {
        self.renames.push(Rename {
            class: class.to_owned(),
            from: from.to_owned(),
            to: to.to_owned(),
        });
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Parse a config from JSON; missing fields keep their defaults
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|err| crate::Error::InvalidArgument(format!("file config: {err}")))
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            mmap: true,
            datime: None,
            renames: Vec::new(),
            title: String::new(),
        }
    }
}

/// Configuration for trees written with a [`TreeWriter`](crate::rtree::TreeWriter)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TreeConfig {
    /// Entries per basket before it is flushed
    pub basket_entries: usize,
    /// Bytes per basket before it is flushed, whichever limit comes first
    pub basket_size: usize,
    /// Initial capacity of the entry offset table of variable-size branches
    pub entry_offset_len: i32,
    /// Compression of baskets; falls back to the file settings
    pub settings: Option<Settings>,
    pub title: String,
}

impl TreeConfig {
    pub fn with_basket_entries(mut self, entries: usize) -> Self {
        self.basket_entries = entries.max(1);
        self
    }

    pub fn with_basket_size(mut self, bytes: usize) -> Self {
        self.basket_size = bytes.max(1);
        self
    }

    pub fn with_entry_offset_len(mut self, len: i32) -> Self {
        self.entry_offset_len = len;
        self
    }

    /// Compress baskets with `settings` instead of the file settings
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|err| crate::Error::InvalidArgument(format!("tree config: {err}")))
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            basket_entries: 1000,
            basket_size: 32_000,
            entry_offset_len: 10,
            settings: None,
            title: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let cfg = FileConfig::default()
            .with_compression(Algorithm::Lz4, 4)
            .with_datime(0x1234)
            .with_rename("Event", "fPx", "px");
        assert_eq!(cfg.settings.code(), 404);
        assert_eq!(cfg.datime, Some(0x1234));
        assert_eq!(cfg.renames[0].to, "px");
        assert!(cfg.mmap);

        let tree = TreeConfig::default().with_basket_entries(0);
        assert_eq!(tree.basket_entries, 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let cfg = FileConfig::from_json(r#"{"mmap": false, "datime": 7}"#).unwrap();
        assert!(!cfg.mmap);
        assert_eq!(cfg.datime, Some(7));
        assert_eq!(cfg.settings, Settings::default());

        let tree = TreeConfig::from_json(r#"{"basket_entries": 40}"#).unwrap();
        assert_eq!(tree.basket_entries, 40);
        assert_eq!(tree.basket_size, 32_000);

        assert!(FileConfig::from_json("[1]").is_err());
    }
}
