//! Fact -- the atomic unit of the database.
//!
//! A fact is an immutable `(tag, prop, value)` triple asserted about an
//! item, plus an optional marker naming the changeset that asserted it.
//! Semantic kinds (tag, flag, value, ref, content) are derived from the
//! shape of the triple rather than encoded as separate types.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System tag carrying per-item metadata (`id`, `content`, `created`,
/// `archived`).
pub const TAG_DB: &str = "_db";

/// System tag carrying per-changeset metadata on changeset-items.
pub const TAG_TX: &str = "_tx";

/// System tag marking an item as a replication source. The item's content
/// is the origin store uuid to pull from.
pub const TAG_INGEST: &str = "_ingest";

/// An immutable `(tag, prop, value)` triple.
///
/// Equality, ordering, and hashing use only the triple; the `tx` marker is
/// bookkeeping attached when a fact is read back out of a store.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prop: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Ref of the changeset-item that asserted this fact, when known.
    #[serde(skip)]
    pub tx: Option<String>,
}

impl Fact {
    /// A bare class marker: `(t, "", "")`, rendered `#t`.
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            prop: String::new(),
            value: String::new(),
            tx: None,
        }
    }

    /// A boolean property: `(t, p, "")`, rendered `#t/p`.
    pub fn flag(tag: impl Into<String>, prop: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            prop: prop.into(),
            value: String::new(),
            tx: None,
        }
    }

    /// A textual property value: `(t, p, v)`, rendered `#t/p=v`.
    pub fn value(
        tag: impl Into<String>,
        prop: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            prop: prop.into(),
            value: value.into(),
            tx: None,
        }
    }

    /// A ref under an arbitrary tag: `(t, "id", r)`.
    pub fn tag_ref(tag: impl Into<String>, r: impl Into<String>) -> Self {
        Self::value(tag, "id", r)
    }

    /// The item's primary ref: `(_db, "id", r)`, rendered `@r`.
    pub fn primary_ref(r: impl Into<String>) -> Self {
        Self::tag_ref(TAG_DB, r)
    }

    /// The item's free-text content: `(_db, "content", v)`.
    ///
    /// An empty string degrades to the flag form, matching the grammar's
    /// empty-content case.
    pub fn content(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::flag(TAG_DB, "content")
        } else {
            Self::value(TAG_DB, "content", value)
        }
    }

    /// The item's creation timestamp: `(_db, "created", ts)`.
    pub fn created(ts: &DateTime<Utc>) -> Self {
        Self::value(TAG_DB, "created", ts.to_rfc3339())
    }

    /// The soft-delete marker: `(_db, "archived", "")`.
    pub fn archived() -> Self {
        Self::flag(TAG_DB, "archived")
    }

    /// Attaches the changeset-item ref that asserted this fact.
    pub fn with_tx(mut self, tx: impl Into<String>) -> Self {
        self.tx = Some(tx.into());
        self
    }

    /// The triple without the tx marker.
    pub fn as_tuple(&self) -> (&str, &str, &str) {
        (&self.tag, &self.prop, &self.value)
    }

    // -- Shape predicates ----------------------------------------------------

    pub fn has_prop(&self) -> bool {
        !self.prop.is_empty()
    }

    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    /// `(t, "", "")` -- a bare class marker.
    pub fn is_tag(&self) -> bool {
        self.prop.is_empty() && self.value.is_empty()
    }

    /// Any fact with a prop set (flag or value).
    pub fn is_prop(&self) -> bool {
        self.has_prop()
    }

    /// A prop without a value.
    pub fn is_flag(&self) -> bool {
        self.has_prop() && !self.has_value()
    }

    /// Any `id` prop, under any tag.
    pub fn is_ref(&self) -> bool {
        self.prop == "id"
    }

    /// The `(_db, id, r)` primary ref.
    pub fn is_primary_ref(&self) -> bool {
        self.is_ref() && self.has_sys_tag()
    }

    pub fn is_content(&self) -> bool {
        self.has_sys_tag() && self.prop == "content"
    }

    pub fn is_created(&self) -> bool {
        self.has_sys_tag() && self.prop == "created"
    }

    pub fn is_archived_flag(&self) -> bool {
        self.has_sys_tag() && self.prop == "archived"
    }

    /// Tags beginning with `_` are system tags, hidden from user-visible
    /// listings unless explicitly requested.
    pub fn has_sys_tag(&self) -> bool {
        self.tag.starts_with('_')
    }

    /// System bookkeeping that never shows in an item's visible fact list:
    /// the implied sys tag itself, the primary ref, and the content carrier.
    pub fn is_hidden_sys(&self) -> bool {
        self.has_sys_tag() && (self.is_tag() || self.is_ref() || self.prop == "content")
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.as_tuple() == other.as_tuple()
    }
}

impl Hash for Fact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_tuple().hash(state);
    }
}

impl Ord for Fact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_tuple().cmp(&other.as_tuple())
    }
}

impl PartialOrd for Fact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fact {
    /// Renders the fact in query-language syntax, such that parsing the
    /// rendering yields the fact back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tag() {
            write!(f, "#{}", self.tag)
        } else if self.is_content() {
            write!(f, "{}", self.value)
        } else if self.is_primary_ref() {
            write!(f, "@{}", self.value)
        } else if !self.has_value() {
            write!(f, "#{}/{}", self.tag, self.prop)
        } else {
            write!(f, "#{}/{}={}", self.tag, self.prop, value_wrap(&self.value))
        }
    }
}

/// Wraps a value in `[[[ ... ]]]` when it would not survive as a bareword
/// in the query grammar (whitespace, digits, punctuation).
pub fn value_wrap(value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else if value.chars().all(|c| c.is_alphabetic()) {
        value.to_owned()
    } else {
        format!("[[[ {value} ]]]")
    }
}
