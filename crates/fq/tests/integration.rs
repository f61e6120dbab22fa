//! End-to-end CLI integration tests for the `fq` binary.
//!
//! Each test creates its own temporary directory, initialises a store, and
//! exercises the `fq` binary as a subprocess via `assert_cmd`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a `Command` targeting the cargo-built `fq` binary.
fn fq(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fq").unwrap();
    cmd.current_dir(tmp.path());
    // Keep discovery inside the sandbox, whatever the host filesystem has.
    cmd.env("FACTDB_DIR", tmp.path().join(".factdb"));
    cmd.env("FACTDB_USER", "tester");
    cmd
}

/// Initialise a store in a fresh temp directory and return the handle plus
/// the store uuid.
fn init_store(extra_args: &[&str]) -> (TempDir, String) {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join(".factdb")).unwrap();
    let mut args = vec!["init", "--json"];
    args.extend_from_slice(extra_args);
    let output = fq(&tmp).args(&args).output().unwrap();
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let uuid = json["store"].as_str().unwrap().to_owned();
    (tmp, uuid)
}

/// Run a query and return the parsed `--json` response array.
fn query_json(tmp: &TempDir, query: &str) -> Vec<serde_json::Value> {
    let output = fq(tmp).args(["q", "--json", query]).output().unwrap();
    assert!(
        output.status.success(),
        "query {query:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json.as_array().expect("array response").clone()
}

/// The created (non-changeset) item from a write response.
fn created(resp: &[serde_json::Value]) -> &serde_json::Value {
    resp.iter()
        .find(|item| {
            !item["facts"]
                .as_array()
                .unwrap()
                .iter()
                .any(|f| f["tag"] == "_tx")
        })
        .expect("created item in response")
}

fn item_ref(item: &serde_json::Value) -> String {
    item["ref"].as_str().unwrap().to_owned()
}

// ---------------------------------------------------------------------------
// Flow 1: create, get, list
// ---------------------------------------------------------------------------

#[test]
fn flow1_create_get_list() {
    let (tmp, _) = init_store(&[]);

    let resp = query_json(&tmp, "CREATE go to supermarket #todo #todo/completed");
    assert_eq!(resp.len(), 2, "changeset-item plus created item");
    let item = created(&resp);
    assert_eq!(item["content"], "go to supermarket");
    let r = item_ref(item);

    // Fetch by ref.
    let fetched = query_json(&tmp, &format!("@{r}"));
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0]["content"], "go to supermarket");

    // Plain-text output renders the ref and tags.
    fq(&tmp)
        .arg("q")
        .arg(format!("@{r}"))
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("@{r}")))
        .stdout(predicate::str::contains("#todo/completed"));

    // Search by tag, then by content substring.
    query_json(&tmp, "CREATE do dishes #chores");
    let todos = query_json(&tmp, "#todo");
    assert_eq!(todos.len(), 1);
    let hits = query_json(&tmp, "SUPERMARKET");
    assert_eq!(hits.len(), 1);
}

// ---------------------------------------------------------------------------
// Flow 2: set, del, archive
// ---------------------------------------------------------------------------

#[test]
fn flow2_set_del_archive() {
    let (tmp, _) = init_store(&[]);

    let resp = query_json(&tmp, "CREATE stuff #chores");
    let r = item_ref(created(&resp));

    query_json(&tmp, &format!("@{r} SET #todo/immediately"));
    query_json(&tmp, &format!("@{r} SET #todo/nottomorrow"));
    let resp = query_json(&tmp, &format!("@{r} DEL #todo/nottomorrow"));
    let item = created(&resp);
    let facts = item["facts"].as_array().unwrap();
    let has = |tag: &str, prop: &str| {
        facts
            .iter()
            .any(|f| f["tag"] == tag && f["prop"] == prop)
    };
    assert!(has("chores", ""));
    assert!(has("todo", ""));
    assert!(has("todo", "immediately"));
    assert!(!has("todo", "nottomorrow"));

    // Archive hides from searches but the ref still resolves.
    query_json(&tmp, &format!("@{r} ARCHIVE"));
    assert!(query_json(&tmp, "#chores").is_empty());
    let fetched = query_json(&tmp, &format!("@{r}"));
    assert_eq!(fetched.len(), 1);
}

// ---------------------------------------------------------------------------
// Flow 3: hints, history, changesets
// ---------------------------------------------------------------------------

#[test]
fn flow3_hints_history_changesets() {
    let (tmp, _) = init_store(&[]);

    query_json(&tmp, "CREATE do dishes #todo #chores #chores/done #todo/waiting");
    query_json(&tmp, "CREATE groceries #do #tomorrow #todo");

    let props = query_json(&tmp, "HINTS #todo/");
    assert_eq!(props.len(), 1);
    assert!(
        props[0]["facts"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f["tag"] == "todo" && f["prop"] == "waiting")
    );

    let tags = query_json(&tmp, "HINTS #to");
    assert_eq!(tags.len(), 2);

    fq(&tmp)
        .args(["q", "HISTORY"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added"));

    let changesets = query_json(&tmp, "CHANGESETS");
    assert_eq!(changesets.len(), 2);
}

// ---------------------------------------------------------------------------
// Flow 4: replication between two stores
// ---------------------------------------------------------------------------

#[test]
fn flow4_replication() {
    let shared = TempDir::new().unwrap();
    let log = shared.path().join("log.db");
    let log_arg = log.to_str().unwrap();

    let (store_a, uuid_a) = init_store(&["--replication-log", log_arg]);
    let (store_b, _) = init_store(&["--replication-log", log_arg]);

    query_json(&store_a, "CREATE do dishes #todo #chores");
    query_json(&store_a, "CREATE groceries #chores");

    // Push from A (commit already pushed; replicate is idempotent).
    fq(&store_a).args(["replicate"]).assert().success();

    // Subscribe B to A and pull.
    query_json(&store_b, &format!("CREATE [[[ {uuid_a} ]]] #_ingest"));
    fq(&store_b).args(["replicate"]).assert().success();

    let chores = query_json(&store_b, "#chores");
    assert_eq!(chores.len(), 2);
    assert_eq!(chores[0]["content"], "do dishes");
    assert_eq!(chores[1]["content"], "groceries");

    // Re-running ingestion applies nothing new.
    fq(&store_b)
        .args(["replicate", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pulled\":0"));
    assert_eq!(query_json(&store_b, "#chores").len(), 2);
}

// ---------------------------------------------------------------------------
// Flow 5: doctor and error handling
// ---------------------------------------------------------------------------

#[test]
fn flow5_doctor_healthy() {
    let (tmp, _) = init_store(&[]);
    query_json(&tmp, "CREATE something #todo");
    fq(&tmp)
        .args(["doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy"));
}

#[test]
fn flow5_parse_error_exits_nonzero() {
    let (tmp, _) = init_store(&[]);
    fq(&tmp)
        .args(["q", "CREATE [[[ never closed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unclosed"));
}

#[test]
fn flow5_unknown_ref_exits_nonzero() {
    let (tmp, _) = init_store(&[]);
    fq(&tmp)
        .args(["q", "@abc123 SET #todo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn flow5_missing_store_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("fq").unwrap();
    cmd.current_dir(tmp.path());
    // No .factdb anywhere under the temp root and no override.
    cmd.env("FACTDB_DIR", tmp.path().join("nonexistent"));
    cmd.args(["q", "#todo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(".factdb"));
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

#[test]
fn version_prints() {
    let (tmp, _) = init_store(&[]);
    fq(&tmp)
        .args(["version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fq "));
}
