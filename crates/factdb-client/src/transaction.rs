//! The transaction orchestrator: query text -> changeset -> applied items.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use factdb_core::{Change, ChangeSet, Fact, Item};
use factdb_query::{ParsedQuery, parse};
use factdb_replicate::Replicator;
use factdb_storage::Store;

use crate::{ClientError, Result};

/// One unit of work against the store.
///
/// Mutations accumulate in a lazily-created changeset; `commit` records and
/// applies it as a whole and appends the produced items to the response.
/// Reads populate the response directly. A transaction that never commits
/// has no effect.
pub struct Transaction {
    store: Arc<dyn Store>,
    replicator: Option<Arc<Replicator>>,
    auto_push: bool,
    client: String,
    changeset: Option<ChangeSet>,
    response: Vec<Item>,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        replicator: Option<Arc<Replicator>>,
        auto_push: bool,
        client: String,
    ) -> Self {
        Self {
            store,
            replicator,
            auto_push,
            client,
            changeset: None,
            response: Vec::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Parses and dispatches a query, returning the accumulated response.
    pub fn q(&mut self, query: &str) -> Result<Vec<Item>> {
        self.q_with_replacements(query, &[])
    }

    /// As [`q`](Transaction::q), but first rewrites any `@key` ref whose
    /// key appears in `replacements` to the mapped ref. Used by callers
    /// that expose positional shortcuts over the last result list.
    pub fn q_with_replacements(
        &mut self,
        query: &str,
        replacements: &[(String, String)],
    ) -> Result<Vec<Item>> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        let mut parsed = parse(query)?;
        if !replacements.is_empty() {
            rewrite_refs(&mut parsed, replacements);
        }
        self.q_parsed(query, parsed)
    }

    /// Dispatches an already-parsed query. `query` is the original text,
    /// kept on the changeset for audit.
    pub fn q_parsed(&mut self, query: &str, parsed: ParsedQuery) -> Result<Vec<Item>> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        debug!(?parsed, "query ast");

        match parsed {
            ParsedQuery::Create(facts) => {
                self.create_item(query, facts)?;
                self.commit()?;
            }
            ParsedQuery::Set(facts) => {
                let (r, rest) = split_ref(facts)?;
                self.set_facts(query, &r, rest)?;
                self.commit()?;
            }
            ParsedQuery::Del(facts) => {
                let (r, rest) = split_ref(facts)?;
                self.revoke_facts(query, &r, rest)?;
                self.commit()?;
            }
            ParsedQuery::Archive(facts) => {
                let (r, _) = split_ref(facts)?;
                self.set_facts(query, &r, vec![Fact::archived()])?;
                self.commit()?;
            }
            ParsedQuery::Get(r) => {
                self.get_item(&r)?;
            }
            ParsedQuery::List(facts) => {
                self.get_items(&facts)?;
            }
            ParsedQuery::History(r) => {
                self.get_history(r.as_ref())?;
            }
            ParsedQuery::Hints(prefix) => {
                self.get_hints(&prefix)?;
            }
            ParsedQuery::Changesets => {
                self.get_changesets()?;
            }
            ParsedQuery::Replicate => {
                let replicator = self
                    .replicator
                    .as_ref()
                    .ok_or(ClientError::ReplicationUnavailable)?;
                replicator.run()?;
            }
        }

        Ok(self.response.clone())
    }

    // -- Mutations -----------------------------------------------------------

    /// Stages a create. A `(_db, created, now)` fact is added when absent;
    /// tags implied by the props are filled in.
    pub fn create_item(&mut self, query: &str, facts: Vec<Fact>) -> Result<()> {
        if facts.is_empty() {
            return Err(ClientError::MissingData);
        }
        let mut facts = with_implied_tags(facts);
        if !facts.iter().any(Fact::is_created) {
            facts.insert(Fact::created(&Utc::now()));
        }
        self.ensure_changeset(query)
            .changes
            .push(Change::assert(Uuid::new_v4(), facts));
        Ok(())
    }

    /// Stages new facts for the item behind `r`.
    pub fn set_facts(&mut self, query: &str, r: &Fact, facts: Vec<Fact>) -> Result<()> {
        if facts.is_empty() {
            return Err(ClientError::MissingData);
        }
        let uuid = self.resolve_ref(r)?;
        let facts = with_implied_tags(facts);
        self.ensure_changeset(query)
            .changes
            .push(Change::assert(uuid, facts));
        Ok(())
    }

    /// Stages revocations for the item behind `r`. Revoking a prop leaves
    /// its tag marker alone.
    pub fn revoke_facts(&mut self, query: &str, r: &Fact, facts: Vec<Fact>) -> Result<()> {
        if facts.is_empty() {
            return Err(ClientError::MissingData);
        }
        let uuid = self.resolve_ref(r)?;
        self.ensure_changeset(query)
            .changes
            .push(Change::revoke(uuid, facts));
        Ok(())
    }

    /// Records and applies the staged changeset, if any, and closes the
    /// transaction. The items produced by the apply step (the
    /// changeset-item plus one item per change) join the response.
    pub fn commit(&mut self) -> Result<()> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        if let Some(cs) = self.changeset.take() {
            if !cs.is_empty() {
                self.store.record_changeset(&cs)?;
                let produced = self.store.apply_changeset(&cs.uuid)?;
                self.response.extend(produced);

                // Cooperative push; a transport failure leaves the
                // changeset unreplicated for the next tick.
                if self.auto_push {
                    if let Some(replicator) = &self.replicator {
                        if let Err(e) = replicator.push() {
                            warn!(error = %e, "replication push failed, will retry");
                        }
                    }
                }
            }
        }
        self.closed = true;
        Ok(())
    }

    // -- Reads ---------------------------------------------------------------

    pub fn get_item(&mut self, r: &Fact) -> Result<Item> {
        let item = self
            .store
            .get_item(r)?
            .ok_or_else(|| ClientError::UnknownRef(r.value.clone()))?;
        self.response.push(item.clone());
        Ok(item)
    }

    pub fn get_items(&mut self, search: &[Fact]) -> Result<()> {
        let items = self.store.get_items(search)?;
        self.response.extend(items);
        Ok(())
    }

    pub fn get_history(&mut self, r: Option<&Fact>) -> Result<()> {
        let items = self.store.get_history(r)?;
        self.response.extend(items);
        Ok(())
    }

    pub fn get_hints(&mut self, prefix: &str) -> Result<()> {
        let items = self.store.get_hints(prefix)?;
        self.response.extend(items);
        Ok(())
    }

    pub fn get_changesets(&mut self) -> Result<()> {
        let items = self.store.get_changesets()?;
        self.response.extend(items);
        Ok(())
    }

    // -- Internals -----------------------------------------------------------

    fn ensure_changeset(&mut self, query: &str) -> &mut ChangeSet {
        self.changeset.get_or_insert_with(|| {
            ChangeSet::new(self.client.clone(), self.store.uuid(), query)
        })
    }

    fn resolve_ref(&self, r: &Fact) -> Result<Uuid> {
        self.store
            .ref_to_uuid(r)?
            .ok_or_else(|| ClientError::UnknownRef(r.value.clone()))
    }
}

/// Splits a match list into its leading ref and the remainder.
fn split_ref(mut facts: Vec<Fact>) -> Result<(Fact, Vec<Fact>)> {
    if facts.is_empty() {
        return Err(ClientError::MissingData);
    }
    if !facts[0].is_primary_ref() {
        return Err(ClientError::ExpectedRef(facts[0].to_string()));
    }
    let rest = facts.split_off(1);
    let r = facts.remove(0);
    Ok((r, rest))
}

/// A prop without its tag is invalid input; insertion fills the tag marker
/// in. System tags carry their own bookkeeping and are left alone.
fn with_implied_tags(facts: Vec<Fact>) -> BTreeSet<Fact> {
    let mut out: BTreeSet<Fact> = BTreeSet::new();
    for fact in facts {
        if fact.is_prop() && !fact.has_sys_tag() {
            out.insert(Fact::tag(fact.tag.clone()));
        }
        out.insert(fact);
    }
    out
}

/// Rewrites `@key` refs per the replacements table.
fn rewrite_refs(parsed: &mut ParsedQuery, replacements: &[(String, String)]) {
    let rewrite = |facts: &mut Vec<Fact>| {
        for fact in facts {
            if fact.is_primary_ref() {
                if let Some((_, to)) = replacements.iter().find(|(k, _)| *k == fact.value) {
                    fact.value = to.clone();
                }
            }
        }
    };
    match parsed {
        ParsedQuery::Create(facts)
        | ParsedQuery::Set(facts)
        | ParsedQuery::Del(facts)
        | ParsedQuery::Archive(facts)
        | ParsedQuery::List(facts) => rewrite(facts),
        ParsedQuery::Get(r) => {
            if let Some((_, to)) = replacements.iter().find(|(k, _)| *k == r.value) {
                r.value = to.clone();
            }
        }
        ParsedQuery::History(Some(r)) => {
            if let Some((_, to)) = replacements.iter().find(|(k, _)| *k == r.value) {
                r.value = to.clone();
            }
        }
        ParsedQuery::History(None)
        | ParsedQuery::Hints(_)
        | ParsedQuery::Changesets
        | ParsedQuery::Replicate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use factdb_storage::SqliteStore;
    use pretty_assertions::assert_eq;

    fn client() -> Client {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory(None).unwrap());
        Client::new(store, "test:user").unwrap()
    }

    /// The created item from a write response (the changeset-item leads).
    fn created(resp: &[Item]) -> &Item {
        resp.iter().find(|i| !i.is_tx()).expect("created item")
    }

    #[test]
    fn create_and_get_round_trip() {
        let c = client();
        let resp = c.query("CREATE go to supermarket #todo #todo/completed").unwrap();
        assert!(resp[0].is_tx());
        let item = created(&resp);
        assert_eq!(item.content_text(), "go to supermarket");
        assert!(item.has_tag("todo"));
        assert!(item.has_flag("todo", "completed"));

        let r = item.ref_value().unwrap();
        let fetched = c.query(&format!("@{r}")).unwrap();
        assert_eq!(&fetched[0], item);
    }

    #[test]
    fn list_matches_in_creation_order() {
        let c = client();
        c.query("CREATE do dishes #todo #chores").unwrap();
        c.query("CREATE groceries #chores").unwrap();

        let chores = c.query("#chores").unwrap();
        assert_eq!(chores.len(), 2);
        assert_eq!(chores[0].content_text(), "do dishes");
        assert_eq!(chores[1].content_text(), "groceries");

        let todo = c.query("#todo").unwrap();
        assert_eq!(todo.len(), 1);
        assert_eq!(todo[0].content_text(), "do dishes");
    }

    #[test]
    fn set_and_del_facts() {
        let c = client();
        let resp = c.query("CREATE stuff #chores").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();

        c.query(&format!("@{r} SET #todo/immediately")).unwrap();
        c.query(&format!("@{r} SET #todo/nottomorrow")).unwrap();
        let resp = c.query(&format!("@{r} DEL #todo/nottomorrow")).unwrap();

        let item = created(&resp);
        assert!(item.has_tag("chores"));
        assert!(item.has_tag("todo"));
        assert!(item.has_flag("todo", "immediately"));
        assert!(!item.has_flag("todo", "nottomorrow"));
    }

    #[test]
    fn set_is_idempotent() {
        let c = client();
        let resp = c.query("CREATE do dishes #todo").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();

        let first = c.query(&format!("@{r} SET #new")).unwrap();
        let second = c.query(&format!("@{r} SET #new")).unwrap();
        assert_eq!(created(&first), created(&second));
    }

    #[test]
    fn del_is_idempotent_and_reversible() {
        let c = client();
        let resp = c.query("CREATE stuff #todo/x").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();

        let once = c.query(&format!("@{r} DEL #todo/x")).unwrap();
        let twice = c.query(&format!("@{r} DEL #todo/x")).unwrap();
        assert_eq!(created(&once), created(&twice));
        assert!(!created(&twice).has_flag("todo", "x"));

        let back = c.query(&format!("@{r} SET #todo/x")).unwrap();
        assert!(created(&back).has_flag("todo", "x"));
    }

    #[test]
    fn archive_hides_item_but_keeps_ref() {
        let c = client();
        let resp = c.query("CREATE do dishes #todo #chores").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();

        c.query(&format!("@{r} SET #_db/archived")).unwrap();

        assert!(c.query("#chores").unwrap().is_empty());
        assert!(c.query("#todo").unwrap().is_empty());
        let item = c.query(&format!("@{r}")).unwrap();
        assert!(item[0].is_archived());
    }

    #[test]
    fn archive_keyword() {
        let c = client();
        let resp = c.query("CREATE old stuff #keep").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();
        c.query(&format!("@{r} ARCHIVE")).unwrap();
        assert!(c.query("#keep").unwrap().is_empty());
    }

    #[test]
    fn set_replaces_value() {
        let c = client();
        let resp = c.query("CREATE reading list #book/state=open").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();
        let resp = c.query(&format!("@{r} SET #book/state=done")).unwrap();
        assert_eq!(created(&resp).value_of("book", "state"), Some("done"));
    }

    #[test]
    fn set_content() {
        let c = client();
        let resp = c.query("CREATE placeholder #todo").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();
        let resp = c
            .query(&format!("@{r} SET book appointment at physio"))
            .unwrap();
        assert_eq!(created(&resp).content_text(), "book appointment at physio");
    }

    #[test]
    fn unknown_ref_rejected_without_state_change() {
        let c = client();
        let err = c.query("@abc123 SET #todo").unwrap_err();
        assert!(matches!(err, ClientError::UnknownRef(r) if r == "abc123"));
        assert!(c.query("CHANGESETS").unwrap().is_empty());
    }

    #[test]
    fn set_requires_ref_first() {
        let c = client();
        c.query("CREATE a thing #todo").unwrap();
        let err = c.query("#todo SET #done/yes").unwrap_err();
        assert!(matches!(err, ClientError::ExpectedRef(_)));
    }

    #[test]
    fn transaction_closes_after_commit() {
        let c = client();
        let mut tx = c.new_transaction();
        tx.q("CREATE one thing #todo").unwrap();
        assert!(tx.is_closed());
        let err = tx.q("CREATE another #todo").unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }

    #[test]
    fn uncommitted_transaction_has_no_effect() {
        let c = client();
        let mut tx = c.new_transaction();
        tx.create_item("CREATE x", vec![Fact::content("x")]).unwrap();
        drop(tx);
        assert!(c.query("CHANGESETS").unwrap().is_empty());
    }

    #[test]
    fn history_and_changesets_dispatch() {
        let c = client();
        let resp = c.query("CREATE stuff #todo").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();

        let history = c.query(&format!("@{r} HISTORY")).unwrap();
        assert!(!history.is_empty());
        assert!(history.iter().any(|i| i.content_text().contains("#todo")));

        let all = c.query("HISTORY").unwrap();
        assert!(!all.is_empty());

        let changesets = c.query("CHANGESETS").unwrap();
        assert_eq!(changesets.len(), 1);
        assert_eq!(
            changesets[0].value_of("_tx", "query"),
            Some("CREATE stuff #todo")
        );
    }

    #[test]
    fn hints_dispatch_preserves_trailing_slash() {
        let c = client();
        c.query("CREATE do dishes #todo #chores #chores/done #todo/waiting")
            .unwrap();
        c.query("CREATE groceries #do #tomorrow #todo").unwrap();

        let props = c.query("HINTS #todo/").unwrap();
        assert_eq!(props.len(), 1);
        assert!(props[0].has_flag("todo", "waiting"));
        assert_eq!(props[0].value_of("_db", "count"), Some("1"));

        let tags = c.query("HINTS #to").unwrap();
        let names: Vec<_> = tags
            .iter()
            .map(|i| i.facts().find(|f| f.is_tag()).unwrap().tag.clone())
            .collect();
        assert_eq!(names, vec!["todo", "tomorrow"]);
    }

    #[test]
    fn replicate_without_replicator_errors() {
        let c = client();
        let err = c.query("REPLICATE").unwrap_err();
        assert!(matches!(err, ClientError::ReplicationUnavailable));
    }

    #[test]
    fn parse_error_starts_no_transaction() {
        let c = client();
        assert!(c.query("CREATE [[[ oops").is_err());
        assert!(c.query("CHANGESETS").unwrap().is_empty());
    }

    #[test]
    fn replacements_rewrite_refs() {
        let c = client();
        let resp = c.query("CREATE shortcut target #todo").unwrap();
        let r = created(&resp).ref_value().unwrap().to_owned();

        let mut tx = c.new_transaction();
        let fetched = tx
            .q_with_replacements("@1", &[("1".to_owned(), r.clone())])
            .unwrap();
        assert_eq!(fetched[0].ref_value(), Some(r.as_str()));
    }

    #[test]
    fn quoted_create_keeps_hashes() {
        let c = client();
        let resp = c
            .query("CREATE [[[ multi-line\ncontent with #hashes allowed ]]] #help")
            .unwrap();
        let item = created(&resp);
        assert_eq!(item.content_text(), "multi-line\ncontent with #hashes allowed");
        assert!(item.has_tag("help"));
    }

    #[test]
    fn content_search_via_query() {
        let c = client();
        c.query("CREATE Go To Supermarket #todo").unwrap();
        let hits = c.query("go to super").unwrap();
        assert_eq!(hits.len(), 1);
    }
}
