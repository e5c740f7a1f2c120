// WHY: speaker names are harvested per chapter and folded into one book roster in
// document order; after every merge each alias string belongs to exactly one entry

use anyhow::Result;
use regex_automata::meta::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

use super::capabilities::{call_capability, NlpCapabilities};
use super::fuzzy::similarity_ratio;
use super::titles::{strip_leading_title, NameLexicon};
use crate::config::RosterConfig;

/// Capitalized name token; letters, apostrophes and hyphens
const NAME_TOKEN: &str = r"\p{Lu}[\p{L}'\u{2019}\-]*";
const MAX_ALIAS_TOKENS: usize = 4;

const ANGLE_ADDRESS_WEIGHT: u32 = 3;
const VOCATIVE_WEIGHT: u32 = 1;
const TITLED_WEIGHT: u32 = 1;
const ENTITY_WEIGHT: u32 = 1;

/// One character: canonical name plus every surface form that refers to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub canonical: String,
    pub aliases: BTreeSet<String>,
}

impl RosterEntry {
    pub fn new(canonical: impl Into<String>, aliases: impl IntoIterator<Item = String>) -> Self {
        let canonical = canonical.into();
        let mut aliases: BTreeSet<String> = aliases.into_iter().collect();
        aliases.insert(canonical.clone());
        Self { canonical, aliases }
    }
}

/// Ordered `canonical -> aliases` map; order is first appearance in the book
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter()
    }

    pub fn get(&self, canonical: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.canonical == canonical)
    }

    /// Canonical names in roster order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.canonical.clone()).collect()
    }

    /// Append an entry, or extend the aliases of an existing one with the same canonical
    pub fn insert(&mut self, canonical: &str, aliases: impl IntoIterator<Item = String>) {
        match self.entries.iter_mut().find(|e| e.canonical == canonical) {
            Some(entry) => entry.aliases.extend(aliases),
            None => self.entries.push(RosterEntry::new(canonical, aliases)),
        }
        self.enforce_partition();
    }

    /// Resolve a mention: exact canonical, then case-insensitive alias, then the same
    /// lookups with a leading title removed
    pub fn canonicalize(&self, name: &str) -> Option<&str> {
        let cleaned = clean_mention(name);
        if cleaned.is_empty() {
            return None;
        }
        self.lookup(&cleaned).or_else(|| {
            let stripped = strip_leading_title(&cleaned);
            (stripped != cleaned).then(|| self.lookup(stripped)).flatten()
        })
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        if let Some(entry) = self.entries.iter().find(|e| e.canonical == name) {
            return Some(&entry.canonical);
        }
        let lowered = name.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.aliases.iter().any(|a| a.to_lowercase() == lowered))
            .map(|e| e.canonical.as_str())
    }

    /// Canonicals are reserved to their own entry; any other alias stays with the
    /// first entry that lists it
    fn enforce_partition(&mut self) {
        let reserved: HashSet<String> = self.entries.iter().map(|e| e.canonical.clone()).collect();
        let mut claimed: HashSet<String> = HashSet::new();
        for entry in &mut self.entries {
            let canonical = entry.canonical.clone();
            entry
                .aliases
                .retain(|alias| *alias == canonical || (!reserved.contains(alias) && claimed.insert(alias.clone())));
            entry.aliases.insert(canonical);
        }
    }
}

impl Serialize for Roster {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.canonical, &entry.aliases)?;
        }
        map.end()
    }
}

struct RosterVisitor;

impl<'de> Visitor<'de> for RosterVisitor {
    type Value = Roster;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of canonical names to alias lists")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Roster, A::Error> {
        let mut roster = Roster::new();
        while let Some((canonical, aliases)) = access.next_entry::<String, Vec<String>>()? {
            roster.entries.push(RosterEntry::new(canonical, aliases));
        }
        roster.enforce_partition();
        Ok(roster)
    }
}

impl<'de> Deserialize<'de> for Roster {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Roster, D::Error> {
        deserializer.deserialize_map(RosterVisitor)
    }
}

struct HarvestPatterns {
    angle_address: Regex,
    vocative: Regex,
    titled: Regex,
}

impl HarvestPatterns {
    fn compile() -> Result<Self> {
        let name = format!(r"{NAME_TOKEN}(?:[ \t]+{NAME_TOKEN}){{0,3}}");
        let short_name = format!(r"{NAME_TOKEN}(?:[ \t]+{NAME_TOKEN})?");
        let titles = ["Mr.", "Mrs.", "Ms.", "Dr.", "Capt.", "Prof.", "Lord", "Lady", "Sir"]
            .iter()
            .map(|t| t.replace('.', r"\."))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            angle_address: Regex::new(&format!(r"<\s*(?i:user|player|host|name)\s*:\s*({name})\s*>"))?,
            vocative: Regex::new(&format!(
                r#",[ \t]*({short_name})[ \t]*[!?.,]+["\u{{201D}}\u{{2019}}']"#
            ))?,
            titled: Regex::new(&format!(r"\b((?:{titles})[ \t]+{short_name})"))?,
        })
    }
}

/// Mention candidates grouped under one final token
#[derive(Debug, Default)]
struct NameGroup {
    members: BTreeSet<String>,
    surfaces: BTreeSet<String>,
    weight: u32,
}

/// Harvests chapter rosters and folds them into the book roster
pub struct RosterBuilder {
    config: RosterConfig,
    lexicon: NameLexicon,
    patterns: HarvestPatterns,
}

impl RosterBuilder {
    pub fn new(config: RosterConfig) -> Result<Self> {
        Ok(Self {
            config,
            lexicon: NameLexicon::new(),
            patterns: HarvestPatterns::compile()?,
        })
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    pub fn build_chapter_roster(&self, text: &str, capabilities: &dyn NlpCapabilities) -> Roster {
        let weights = self.harvest(text, capabilities);

        let mut groups: BTreeMap<String, NameGroup> = BTreeMap::new();
        for (surface, weight) in weights {
            if weight < self.config.min_weight {
                continue;
            }
            let stripped = strip_leading_title(&surface).to_string();
            let Some(last) = stripped.split_whitespace().last().map(str::to_string) else {
                continue;
            };
            let group = groups.entry(last).or_default();
            group.weight += weight;
            if stripped != surface {
                group.surfaces.insert(surface);
            }
            group.members.insert(stripped);
        }

        let groups = self.fuzzy_merge(groups.into_values().collect());

        let mut scored: Vec<(u32, RosterEntry)> = groups
            .into_iter()
            .filter_map(|group| {
                let canonical = pick_canonical(group.members.iter())?.to_string();
                let mut aliases: BTreeSet<String> = group.members.iter().cloned().collect();
                aliases.extend(group.surfaces.iter().cloned());
                for member in &group.members {
                    aliases.extend(self.expand_alias(member));
                }
                Some((group.weight, RosterEntry::new(canonical, aliases)))
            })
            .collect();
        scored.sort_by(|(wa, a), (wb, b)| wb.cmp(wa).then_with(|| a.canonical.cmp(&b.canonical)));

        let mut roster = Roster {
            entries: scored.into_iter().map(|(_, entry)| entry).collect(),
        };
        roster.enforce_partition();

        debug!(entries = roster.len(), "Built chapter roster");
        roster
    }

    /// Fold one chapter roster into the book roster, entry by entry in chapter order
    pub fn merge_book_roster(&self, mut book: Roster, chapter: &Roster) -> Roster {
        for incoming in chapter.entries() {
            let target = book
                .entries
                .iter()
                .position(|e| e.canonical == incoming.canonical)
                .or_else(|| {
                    book.entries.iter().position(|e| {
                        e.aliases.contains(&incoming.canonical) || incoming.aliases.contains(&e.canonical)
                    })
                })
                .or_else(|| {
                    self.config
                        .fuzzy_merge
                        .then(|| {
                            book.entries.iter().position(|e| {
                                similarity_ratio(&e.canonical, &incoming.canonical) >= self.config.fuzzy_threshold
                            })
                        })
                        .flatten()
                });

            match target {
                Some(index) => book.entries[index].aliases.extend(incoming.aliases.iter().cloned()),
                None => book.entries.push(incoming.clone()),
            }
            book.enforce_partition();
        }
        book
    }

    /// Cleaned surface forms with summed harvest weights
    fn harvest(&self, text: &str, capabilities: &dyn NlpCapabilities) -> BTreeMap<String, u32> {
        let mut weights: BTreeMap<String, u32> = BTreeMap::new();
        let sources = [
            (&self.patterns.angle_address, ANGLE_ADDRESS_WEIGHT),
            (&self.patterns.vocative, VOCATIVE_WEIGHT),
            (&self.patterns.titled, TITLED_WEIGHT),
        ];

        for (pattern, weight) in sources {
            for caps in pattern.captures_iter(text) {
                if let Some(group) = caps.get_group(1) {
                    self.add_candidate(&mut weights, &text[group.range()], weight);
                }
            }
        }

        if self.config.use_ner {
            if let Some(entities) = call_capability("find_entities", || capabilities.find_entities(text)) {
                for entity in entities {
                    self.add_candidate(&mut weights, &entity.text, ENTITY_WEIGHT);
                }
            }
        }
        weights
    }

    fn add_candidate(&self, weights: &mut BTreeMap<String, u32>, raw: &str, weight: u32) {
        if let Some(alias) = self.clean_alias(raw) {
            *weights.entry(alias).or_insert(0) += weight;
        }
    }

    /// Trim punctuation, collapse whitespace and reject things that are not names
    fn clean_alias(&self, raw: &str) -> Option<String> {
        let cleaned = clean_mention(raw);
        if cleaned.is_empty()
            || cleaned.chars().count() > self.config.max_alias_len
            || cleaned.split_whitespace().count() > MAX_ALIAS_TOKENS
        {
            return None;
        }
        self.lexicon
            .is_plausible_name(strip_leading_title(&cleaned))
            .then_some(cleaned)
    }

    /// First and last token of a two- or three-token alias
    fn expand_alias(&self, alias: &str) -> Vec<String> {
        let tokens: Vec<&str> = alias.split_whitespace().collect();
        if !(2..=3).contains(&tokens.len()) {
            return Vec::new();
        }
        [tokens[0], tokens[tokens.len() - 1]]
            .into_iter()
            .filter(|t| t.chars().count() <= self.config.max_alias_len && !self.lexicon.is_non_name(t))
            .map(str::to_string)
            .collect()
    }

    /// Union-find over group canonicals; pairs at or above the threshold share a root
    fn fuzzy_merge(&self, groups: Vec<NameGroup>) -> Vec<NameGroup> {
        let canonicals: Vec<String> = groups
            .iter()
            .map(|g| pick_canonical(g.members.iter()).unwrap_or_default().to_string())
            .collect();
        let mut parent: Vec<usize> = (0..groups.len()).collect();

        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if similarity_ratio(&canonicals[i], &canonicals[j]) >= self.config.fuzzy_threshold {
                    let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
                    if ri != rj {
                        parent[rj] = ri;
                    }
                }
            }
        }

        let mut merged: BTreeMap<usize, NameGroup> = BTreeMap::new();
        for (i, group) in groups.into_iter().enumerate() {
            let root = find_root(&mut parent, i);
            let target = merged.entry(root).or_default();
            target.weight += group.weight;
            target.members.extend(group.members);
            target.surfaces.extend(group.surfaces);
        }
        merged.into_values().collect()
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Longest candidate; ties go to the lexicographically last
fn pick_canonical<'a>(candidates: impl Iterator<Item = &'a String>) -> Option<&'a str> {
    candidates
        .max_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)))
        .map(String::as_str)
}

fn clean_mention(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '.')
        .trim_end_matches('.')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
