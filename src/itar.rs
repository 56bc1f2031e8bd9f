// src/itar.rs -- the ITAR bundle index
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

//! The plain-text table mapping support-file names to byte ranges inside
//! the monolithic bundle blob. Built once per bundle identity and then
//! read-only for the life of the process.

use std::collections::HashMap;

/// One file inside the bundle: where its bytes start and how many there are.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub offset: u64,
    pub length: u32,
}

/// Names the index carries for bookkeeping rather than for files.
const RESERVED_NAMES: &[&str] = &["SVNREV", "GITHASH"];

#[derive(Debug, Default)]
pub struct BundleIndex {
    entries: HashMap<String, IndexEntry>,
}

impl BundleIndex {
    pub fn new() -> BundleIndex {
        Default::default()
    }

    /// Parse index text of the form `<name> <offset> <length>`, one entry
    /// per line. Lines are whitespace-trimmed; empties, the reserved
    /// bookkeeping names, and lines whose numeric fields fail to parse are
    /// all skipped. Loading is idempotent: the map is cleared first.
    pub fn load_from_text(&mut self, text: &str) {
        self.entries.clear();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let name = match fields.next() {
                Some(n) => n,
                None => continue,
            };

            if RESERVED_NAMES.contains(&name) {
                continue;
            }

            let offset = match fields.next().and_then(|f| f.parse::<u64>().ok()) {
                Some(o) => o,
                None => continue,
            };

            let length = match fields.next().and_then(|f| f.parse::<u32>().ok()) {
                Some(l) => l,
                None => continue,
            };

            self.entries
                .insert(name.to_owned(), IndexEntry { offset, length });
        }
    }

    /// Look up an entry by name. One prefix rule applies: when a `fonts/`
    /// name is absent, the bare name is retried, because the engine asks
    /// for fonts under a directory the index does not use.
    pub fn get(&self, name: &str) -> Option<IndexEntry> {
        if let Some(e) = self.entries.get(name) {
            return Some(*e);
        }

        if let Some(bare) = name.strip_prefix("fonts/") {
            return self.entries.get(bare).copied();
        }

        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, IndexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Render the index back into its wire form. Line order is not
    /// significant; a parse of the output yields an equal map.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (name, entry) in &self.entries {
            out.push_str(name);
            out.push(' ');
            out.push_str(&entry.offset.to_string());
            out.push(' ');
            out.push_str(&entry.length.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
latex.ltx 0 131072
article.cls 131072 20480
SVNREV 151752 16
GITHASH 151768 40
lmroman10-regular.otf 151808 111612
  spaced.sty   263420   12
broken-line 9q 10
other-broken 10
";

    #[test]
    fn parses_and_skips() {
        let mut idx = BundleIndex::new();
        idx.load_from_text(SAMPLE);

        assert_eq!(idx.len(), 4);
        assert_eq!(
            idx.get("latex.ltx"),
            Some(IndexEntry {
                offset: 0,
                length: 131072
            })
        );
        assert_eq!(
            idx.get("spaced.sty"),
            Some(IndexEntry {
                offset: 263420,
                length: 12
            })
        );
        assert!(idx.get("SVNREV").is_none());
        assert!(idx.get("GITHASH").is_none());
        assert!(idx.get("broken-line").is_none());
        assert!(idx.get("other-broken").is_none());
    }

    #[test]
    fn load_is_idempotent() {
        let mut idx = BundleIndex::new();
        idx.load_from_text("a.tex 0 1\nb.tex 1 1\n");
        idx.load_from_text("c.tex 0 5\n");

        assert_eq!(idx.len(), 1);
        assert!(idx.get("a.tex").is_none());
        assert!(idx.contains("c.tex"));
    }

    #[test]
    fn fonts_prefix_falls_back_to_bare_name() {
        let mut idx = BundleIndex::new();
        idx.load_from_text("lmroman10-regular.otf 100 200\nfonts/pinned.otf 300 400\n");

        // absent under fonts/, present bare: fall back
        assert_eq!(
            idx.get("fonts/lmroman10-regular.otf"),
            idx.get("lmroman10-regular.otf")
        );
        // present under fonts/: no stripping
        assert_eq!(
            idx.get("fonts/pinned.otf"),
            Some(IndexEntry {
                offset: 300,
                length: 400
            })
        );
        // bare absent everywhere
        assert!(idx.get("fonts/nope.otf").is_none());
    }

    #[test]
    fn serialize_round_trips() {
        let mut idx = BundleIndex::new();
        idx.load_from_text(SAMPLE);

        let mut reparsed = BundleIndex::new();
        reparsed.load_from_text(&idx.serialize());

        assert_eq!(reparsed.len(), idx.len());
        for (name, entry) in idx.iter() {
            assert_eq!(reparsed.get(name), Some(entry));
        }
    }

    #[test]
    fn empty_index() {
        let mut idx = BundleIndex::new();
        idx.load_from_text("");
        assert!(idx.is_empty());
        assert_eq!(idx.len(), 0);
    }
}
