//! C++ template expression parsing
//!
//! Container classes are named by their template text, e.g.
//! `vector<pair<int,float> >`. The streamer system needs the container kind
//! and its top-level arguments to synthesize schemas for them.

use alloc::vec::Vec;

use crate::format::constants::stl;
use crate::FormatError;

/// Template name and its top-level arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxTemplate<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> CxxTemplate<'a> {
    /// Parse `name<arg, arg<...>, ...>`
    pub fn parse(text: &'a str) -> Result<Self, FormatError> {
        let text = text.trim();
        let open = text.find('<').ok_or(FormatError::InvalidTemplate)?;
        if !text.ends_with('>') {
            return Err(FormatError::InvalidTemplate);
        }
        let name = text[..open].trim();
        if name.is_empty() {
            return Err(FormatError::InvalidTemplate);
        }

        let inner = &text[open + 1..text.len() - 1];
        let mut args = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        for (i, b) in inner.bytes().enumerate() {
            match b {
                b'<' => depth += 1,
                b'>' => depth = depth.checked_sub(1).ok_or(FormatError::InvalidTemplate)?,
                b',' if depth == 0 => {
                    args.push(non_empty(&inner[start..i])?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(FormatError::InvalidTemplate);
        }
        args.push(non_empty(&inner[start..])?);

        Ok(Self { name, args })
    }

    /// Template name without a leading `std::`
    pub fn short_name(&self) -> &'a str {
        self.name.strip_prefix("std::").unwrap_or(self.name)
    }

    /// STL container kind, if the template is one
    pub fn stl_kind(&self) -> Option<i32> {
        Some(match self.short_name() {
            "vector" => stl::VECTOR,
            "list" => stl::LIST,
            "deque" => stl::DEQUE,
            "map" | "unordered_map" => stl::MAP,
            "multimap" | "unordered_multimap" => stl::MULTIMAP,
            "set" | "unordered_set" => stl::SET,
            "multiset" | "unordered_multiset" => stl::MULTISET,
            "bitset" => stl::BITSET,
            _ => return None,
        })
    }

    /// Element type of a sequence container, skipping allocator arguments
    pub fn element(&self) -> Option<&'a str> {
        match self.stl_kind()? {
            stl::VECTOR | stl::LIST | stl::DEQUE | stl::SET | stl::MULTISET => {
                self.args.first().copied()
            }
            _ => None,
        }
    }
}

fn non_empty(s: &str) -> Result<&str, FormatError> {
    let s = s.trim();
    if s.is_empty() {
        Err(FormatError::InvalidTemplate)
    } else {
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_parse_simple() {
        let t = CxxTemplate::parse("vector<int>").unwrap();
        assert_eq!(t, CxxTemplate { name: "vector", args: vec!["int"] });
        assert_eq!(t.element(), Some("int"));
        assert_eq!(t.stl_kind(), Some(stl::VECTOR));
    }

    #[test]
    fn test_parse_nested() {
        let t = CxxTemplate::parse("std::map<std::string, vector<pair<int,float> > >").unwrap();
        assert_eq!(t.short_name(), "map");
        assert_eq!(t.args, vec!["std::string", "vector<pair<int,float> >"]);
        assert_eq!(t.element(), None);
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(CxxTemplate::parse("vector"), Err(FormatError::InvalidTemplate));
        assert_eq!(CxxTemplate::parse("vector<int"), Err(FormatError::InvalidTemplate));
        assert_eq!(CxxTemplate::parse("vector<>"), Err(FormatError::InvalidTemplate));
        assert_eq!(CxxTemplate::parse("<int>"), Err(FormatError::InvalidTemplate));
        assert_eq!(CxxTemplate::parse("map<a,>"), Err(FormatError::InvalidTemplate));
    }
}
