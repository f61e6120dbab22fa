//! Item -- the set of currently-asserted facts for one identity.

use std::collections::BTreeSet;
use std::fmt;

use crate::fact::Fact;

/// An immutable group of facts at a point in time.
///
/// Invariants (enforced by the write path, relied on by accessors): at most
/// one primary ref, at most one content fact. Tag facts are implied by any
/// prop or value fact of the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    facts: BTreeSet<Fact>,
}

impl Item {
    pub fn new(facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            facts: facts.into_iter().collect(),
        }
    }

    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// The primary ref fact, if the item has been persisted.
    pub fn ref_fact(&self) -> Option<&Fact> {
        self.facts.iter().find(|f| f.is_primary_ref())
    }

    /// The ref value (`3dd` in `@3dd`).
    pub fn ref_value(&self) -> Option<&str> {
        self.ref_fact().map(|f| f.value.as_str())
    }

    /// The content fact, if any.
    pub fn content(&self) -> Option<&Fact> {
        self.facts.iter().find(|f| f.is_content())
    }

    /// The content text, or `""` when the item has none.
    pub fn content_text(&self) -> &str {
        self.content().map(|f| f.value.as_str()).unwrap_or("")
    }

    /// All non-system tags, including those implied by prop facts.
    pub fn tags(&self) -> BTreeSet<Fact> {
        self.facts
            .iter()
            .filter(|f| !f.has_sys_tag())
            .map(|f| Fact::tag(f.tag.clone()))
            .collect()
    }

    /// All visible prop facts (flags and values), hidden system facts
    /// excluded.
    pub fn props(&self) -> Vec<&Fact> {
        self.facts
            .iter()
            .filter(|f| f.is_prop() && !f.is_hidden_sys())
            .collect()
    }

    /// The flag shapes of every visible prop, optionally narrowed to a tag.
    pub fn flags(&self, for_tag: Option<&str>) -> BTreeSet<Fact> {
        self.props()
            .into_iter()
            .filter(|f| for_tag.is_none_or(|t| f.tag == t))
            .map(|f| Fact::flag(f.tag.clone(), f.prop.clone()))
            .collect()
    }

    /// All facts except hidden system bookkeeping.
    pub fn visible_facts(&self) -> Vec<&Fact> {
        self.facts.iter().filter(|f| !f.is_hidden_sys()).collect()
    }

    /// The facts a user asserted: everything except the primary ref, the
    /// creation timestamp, and tag markers already implied by a prop fact.
    pub fn user_facts(&self) -> BTreeSet<Fact> {
        let implied: BTreeSet<Fact> = self
            .facts
            .iter()
            .filter(|f| f.is_prop() && !f.is_hidden_sys())
            .map(|f| Fact::tag(f.tag.clone()))
            .collect();
        self.facts
            .iter()
            .filter(|f| !f.is_primary_ref() && !f.is_created() && !implied.contains(f))
            .cloned()
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.facts.iter().any(|f| f.tag == tag)
    }

    pub fn has_flag(&self, tag: &str, prop: &str) -> bool {
        self.facts.iter().any(|f| f.tag == tag && f.prop == prop)
    }

    /// The value of `(tag, prop)`, if present with a value.
    pub fn value_of(&self, tag: &str, prop: &str) -> Option<&str> {
        self.facts
            .iter()
            .find(|f| f.tag == tag && f.prop == prop && f.has_value())
            .map(|f| f.value.as_str())
    }

    /// The creation timestamp value, if recorded.
    pub fn created_time(&self) -> Option<&str> {
        self.value_of(crate::fact::TAG_DB, "created")
    }

    /// `true` for changeset-items.
    pub fn is_tx(&self) -> bool {
        self.has_tag(crate::fact::TAG_TX)
    }

    pub fn is_archived(&self) -> bool {
        self.has_flag(crate::fact::TAG_DB, "archived")
    }

    /// A copy with extra facts asserted.
    pub fn with_facts(&self, add: impl IntoIterator<Item = Fact>) -> Self {
        let mut facts = self.facts.clone();
        facts.extend(add);
        Self { facts }
    }

    /// A copy with the given facts removed.
    pub fn without_facts<'a>(&self, remove: impl IntoIterator<Item = &'a Fact>) -> Self {
        let mut facts = self.facts.clone();
        for f in remove {
            facts.remove(f);
        }
        Self { facts }
    }
}

impl fmt::Display for Item {
    /// `@ref content #tags #props`, in that order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(r) = self.ref_fact() {
            parts.push(r.to_string());
        }
        let content = self.content_text();
        if !content.is_empty() {
            parts.push(content.to_owned());
        }
        parts.extend(self.tags().iter().map(|t| t.to_string()));
        parts.extend(self.props().iter().map(|p| p.to_string()));
        write!(f, "{}", parts.join(" "))
    }
}

impl FromIterator<Fact> for Item {
    fn from_iter<T: IntoIterator<Item = Fact>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a Item {
    type Item = &'a Fact;
    type IntoIter = std::collections::btree_set::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.facts.iter()
    }
}
