// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Name-matcher set: the consolidated blocklist and allowlist.
//!
//! Two structures, built fresh on every reload and swapped atomically so
//! readers never observe a half-built snapshot:
//!  * a label trie for exact and `*.`-wildcard-suffix matches, walked
//!    right-to-left (root label first);
//!  * a linear regex list evaluated on trie miss.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegexKind {
    Allow,
    Block,
}

pub struct RegexFilter {
    pub pattern: Regex,
    pub kind: RegexKind,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    /// This node corresponds to a concrete label boundary that is itself a
    /// terminal block/allow entry (an exact domain).
    terminal: bool,
    /// A `*.` wildcard was inserted one level below this node: anything
    /// under here (any number of extra labels) matches.
    wildcard_terminal: bool,
}

impl TrieNode {
    fn insert(&mut self, labels: &[&str]) {
        match labels.split_first() {
            None => self.terminal = true,
            Some((&"*", rest)) if rest.is_empty() => self.wildcard_terminal = true,
            Some((head, rest)) => self.children.entry(head.to_string()).or_default().insert(rest),
        }
    }

    /// `labels` are already right-to-left (root label first). Returns true
    /// if any prefix of the walk lands on a terminal or wildcard node.
    fn matches(&self, labels: &[&str]) -> bool {
        if self.wildcard_terminal && !labels.is_empty() {
            return true;
        }
        match labels.split_first() {
            None => self.terminal,
            Some((head, rest)) => match self.children.get(*head) {
                Some(child) => child.matches(rest),
                None => false,
            },
        }
    }
}

#[derive(Default)]
struct Trie {
    root: TrieNode,
}

impl Trie {
    /// Inserts an entry, which is either an exact domain (`ads.example.com`)
    /// or a leading-wildcard pattern (`*.ads.example.com`).
    fn insert(&mut self, pattern: &str) {
        let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
        let labels: Vec<&str> = pattern.split('.').rev().collect();
        self.root.insert(&labels);
    }

    fn matches(&self, qname: &str) -> bool {
        let qname = qname.trim_end_matches('.').to_ascii_lowercase();
        if qname.is_empty() {
            return false;
        }
        let labels: Vec<&str> = qname.split('.').rev().collect();
        self.root.matches(&labels)
    }
}

/// A single, consistent point-in-time view: built once at load/reload time,
/// then only ever read. Reloads construct a brand-new snapshot and swap the
/// pointer atomically; no in-place mutation.
struct Snapshot {
    allow_trie: Trie,
    block_trie: Trie,
    regex_filters: Vec<RegexFilter>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            allow_trie: Trie::default(),
            block_trie: Trie::default(),
            regex_filters: Vec::new(),
        }
    }
}

/// The result of consulting the global matcher for a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchVerdict {
    Allowed,
    Blocked(&'static str),
    Miss,
}

pub struct BlocklistEngine {
    snapshot: ArcSwap<Snapshot>,
}

impl BlocklistEngine {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Rebuilds the matcher from source data and atomically swaps it in.
    /// Grounded in the "Blocklist matcher: immutable snapshot pointer;
    /// reloads build a new snapshot and atomically swap" concurrency rule.
    pub fn reload(
        &self,
        allow_patterns: impl IntoIterator<Item = String>,
        block_patterns: impl IntoIterator<Item = String>,
        regex_filters: Vec<RegexFilter>,
    ) {
        let mut allow_trie = Trie::default();
        for p in allow_patterns {
            allow_trie.insert(&p);
        }
        let mut block_trie = Trie::default();
        for p in block_patterns {
            block_trie.insert(&p);
        }
        self.snapshot.store(Arc::new(Snapshot {
            allow_trie,
            block_trie,
            regex_filters,
        }));
    }

    /// Global allowlist / blocklist / regex precedence (allow wins; regex
    /// evaluated only after trie miss; allow filters take precedence over
    /// block filters within the regex list too).
    pub fn lookup(&self, qname: &str) -> MatchVerdict {
        let snap = self.snapshot.load();
        if snap.allow_trie.matches(qname) {
            return MatchVerdict::Allowed;
        }
        if snap.block_trie.matches(qname) {
            return MatchVerdict::Blocked("blocklist");
        }
        let mut block_hit = false;
        for filter in &snap.regex_filters {
            if filter.pattern.is_match(qname) {
                match filter.kind {
                    RegexKind::Allow => return MatchVerdict::Allowed,
                    RegexKind::Block => block_hit = true,
                }
            }
        }
        if block_hit {
            MatchVerdict::Blocked("regex")
        } else {
            MatchVerdict::Miss
        }
    }
}

impl Default for BlocklistEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(allow: &[&str], block: &[&str]) -> BlocklistEngine {
        let e = BlocklistEngine::new();
        e.reload(
            allow.iter().map(|s| s.to_string()),
            block.iter().map(|s| s.to_string()),
            Vec::new(),
        );
        e
    }

    #[test]
    fn exact_block_match() {
        let e = engine_with(&[], &["ads.example.com"]);
        assert_eq!(e.lookup("ads.example.com"), MatchVerdict::Blocked("blocklist"));
        assert_eq!(e.lookup("example.com"), MatchVerdict::Miss);
    }

    #[test]
    fn wildcard_suffix_match() {
        let e = engine_with(&[], &["*.ads.example.com"]);
        assert_eq!(e.lookup("tracker.ads.example.com"), MatchVerdict::Blocked("blocklist"));
        assert_eq!(e.lookup("ads.example.com"), MatchVerdict::Miss);
    }

    #[test]
    fn allow_overrides_block() {
        let e = engine_with(&["ads.example.com"], &["ads.example.com"]);
        assert_eq!(e.lookup("ads.example.com"), MatchVerdict::Allowed);
    }

    #[test]
    fn reload_swaps_atomically() {
        let e = engine_with(&[], &["old.example.com"]);
        assert_eq!(e.lookup("old.example.com"), MatchVerdict::Blocked("blocklist"));
        e.reload(Vec::new(), vec!["new.example.com".to_string()], Vec::new());
        assert_eq!(e.lookup("old.example.com"), MatchVerdict::Miss);
        assert_eq!(e.lookup("new.example.com"), MatchVerdict::Blocked("blocklist"));
    }

    #[test]
    fn regex_allow_beats_regex_block() {
        let e = BlocklistEngine::new();
        e.reload(
            Vec::new(),
            Vec::new(),
            vec![
                RegexFilter { pattern: Regex::new(r"^ads\.").unwrap(), kind: RegexKind::Block },
                RegexFilter { pattern: Regex::new(r"\.example\.com$").unwrap(), kind: RegexKind::Allow },
            ],
        );
        assert_eq!(e.lookup("ads.example.com"), MatchVerdict::Allowed);
    }
}
