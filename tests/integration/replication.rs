//! Replicated state convergence tests.
//!
//! Property tests check that merge is commutative, associative and
//! idempotent for arbitrary concurrent writes; example tests cover the
//! tie-break rules and snapshot exchange.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use taskweave::state::{FieldEntry, ReplicaId, ReplicatedStateStore, StateSnapshot};

/// `(project, field, value, second)` written by one replica.
type Write = (usize, usize, i64, i64);

const REPLICAS: &[&str] = &["r-a", "r-b", "r-c"];
const PROJECTS: &[&str] = &["alpha", "beta"];
const FIELDS: &[&str] = &["title", "abstract", "status"];

fn at(second: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap()
}

fn replica(id: &str, writes: &[Write]) -> ReplicatedStateStore {
    let mut store = ReplicatedStateStore::new(ReplicaId::new(id));
    for &(project, field, value, second) in writes {
        store.update_at(PROJECTS[project], FIELDS[field], json!(value), at(second));
    }
    store
}

fn merged(base: &ReplicatedStateStore, others: &[&StateSnapshot]) -> StateSnapshot {
    let mut store = base.clone();
    for snapshot in others {
        store.merge(snapshot);
    }
    store.snapshot()
}

fn writes() -> impl Strategy<Value = Vec<Write>> {
    // Few distinct seconds so timestamp ties are common.
    prop::collection::vec((0..2usize, 0..3usize, -5..5i64, 0..4i64), 0..12)
}

/// One step of an interleaved history across `REPLICAS`.
#[derive(Debug, Clone)]
enum Step {
    Write {
        replica: usize,
        project: usize,
        field: usize,
        value: i64,
        second: i64,
    },
    Sync {
        from: usize,
        to: usize,
    },
}

fn history() -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        (0..3usize, 0..2usize, 0..3usize, -5..5i64, 0..4i64).prop_map(
            |(replica, project, field, value, second)| Step::Write {
                replica,
                project,
                field,
                value,
                second,
            }
        ),
        (0..3usize, 0..3usize).prop_map(|(from, to)| Step::Sync { from, to }),
    ];
    prop::collection::vec(step, 0..32)
}

/// Entries a replica has observed, keyed by `(project, field)` indices.
type Seen = Vec<(usize, usize, FieldEntry)>;

fn latest<'a>(seen: &'a Seen, project: usize, field: usize) -> Option<&'a FieldEntry> {
    seen.iter()
        .filter(|(p, f, _)| *p == project && *f == field)
        .map(|(_, _, entry)| entry)
        .max_by(|left, right| left.precedence(right))
}

proptest! {
    /// Each replica holds exactly the greatest entry it has observed for
    /// every field, however writes and merges interleave.
    #[test]
    fn interleaved_writes_and_merges_hold_latest_seen(steps in history()) {
        let mut stores: Vec<ReplicatedStateStore> = REPLICAS
            .iter()
            .map(|id| ReplicatedStateStore::new(ReplicaId::new(*id)))
            .collect();
        let mut seen: Vec<Seen> = vec![Vec::new(); REPLICAS.len()];

        for step in &steps {
            match *step {
                Step::Write { replica, project, field, value, second } => {
                    let store = &mut stores[replica];
                    store.update_at(PROJECTS[project], FIELDS[field], json!(value), at(second));
                    let written = store.entry(PROJECTS[project], FIELDS[field]).cloned();
                    prop_assert!(written.is_some());
                    if let Some(entry) = written {
                        seen[replica].push((project, field, entry));
                    }
                }
                Step::Sync { from, to } => {
                    let snapshot = stores[from].snapshot();
                    stores[to].merge(&snapshot);
                    let observed = seen[from].clone();
                    seen[to].extend(observed);
                }
            }
        }

        for (store, observed) in stores.iter().zip(&seen) {
            for project in 0..PROJECTS.len() {
                for field in 0..FIELDS.len() {
                    prop_assert_eq!(
                        store.entry(PROJECTS[project], FIELDS[field]),
                        latest(observed, project, field)
                    );
                }
            }
        }

        // A replica that merges everything another has seen ends up equal to it.
        let all: Vec<StateSnapshot> = stores.iter().map(ReplicatedStateStore::snapshot).collect();
        for store in &mut stores {
            for snapshot in &all {
                store.merge(snapshot);
            }
        }
        prop_assert_eq!(stores[0].snapshot(), stores[1].snapshot());
        prop_assert_eq!(stores[1].snapshot(), stores[2].snapshot());
    }


    #[test]
    fn merge_is_commutative(a in writes(), b in writes()) {
        let left = replica("r-a", &a);
        let right = replica("r-b", &b);
        prop_assert_eq!(
            merged(&left, &[&right.snapshot()]),
            merged(&right, &[&left.snapshot()])
        );
    }

    #[test]
    fn merge_is_associative(a in writes(), b in writes(), c in writes()) {
        let ra = replica("r-a", &a);
        let rb = replica("r-b", &b);
        let rc = replica("r-c", &c);

        let ab = merged(&ra, &[&rb.snapshot()]);
        let left = merged(&ReplicatedStateStore::from_snapshot(ReplicaId::new("x"), ab), &[&rc.snapshot()]);

        let bc = merged(&rb, &[&rc.snapshot()]);
        let right = merged(&ra, &[&bc]);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent(a in writes(), b in writes()) {
        let left = replica("r-a", &a);
        let right = replica("r-b", &b).snapshot();

        let once = merged(&left, &[&right]);
        let twice = merged(&left, &[&right, &right]);
        prop_assert_eq!(&once, &twice);

        let mut store = ReplicatedStateStore::from_snapshot(ReplicaId::new("r-a"), once.clone());
        prop_assert_eq!(store.merge(&once), 0);
    }

    #[test]
    fn merge_keeps_the_latest_write(a in writes(), b in writes()) {
        let left = replica("r-a", &a);
        let right = replica("r-b", &b);
        let result = merged(&left, &[&right.snapshot()]);

        for (project, state) in &result {
            for (field, entry) in &state.fields {
                for source in [&left, &right] {
                    if let Some(other) = source.entry(project, field) {
                        prop_assert!(entry.timestamp >= other.timestamp);
                    }
                }
            }
        }
    }
}

#[test]
fn test_write_after_merge_with_lagging_clock() {
    let mut a = ReplicatedStateStore::new(ReplicaId::new("a"));
    let mut b = ReplicatedStateStore::new(ReplicaId::new("b"));
    b.update_at("paper", "title", json!("from b"), at(100));

    a.merge(&b.snapshot());
    a.update_at("paper", "title", json!("from a"), at(90));
    b.merge(&a.snapshot());

    assert_eq!(a.get("paper", "title"), Some(&json!("from a")));
    assert_eq!(a.snapshot(), b.snapshot());
}

#[test]
fn test_three_replicas_converge() {
    let mut a = ReplicatedStateStore::new(ReplicaId::new("a"));
    let mut b = ReplicatedStateStore::new(ReplicaId::new("b"));
    let mut c = ReplicatedStateStore::new(ReplicaId::new("c"));

    a.update_at("paper", "title", json!("Tides"), at(1));
    b.update_at("paper", "title", json!("Tidal forces"), at(2));
    c.update_at("paper", "abstract", json!("We study tides."), at(1));
    c.update_at("paper", "title", json!("Moon"), at(2));

    let (sa, sb, sc) = (a.snapshot(), b.snapshot(), c.snapshot());
    for store in [&mut a, &mut b, &mut c] {
        store.merge(&sa);
        store.merge(&sb);
        store.merge(&sc);
    }

    assert_eq!(a.snapshot(), b.snapshot());
    assert_eq!(b.snapshot(), c.snapshot());

    // Same second for b and c: the greater replica id wins.
    let project = a.get_project("paper");
    assert_eq!(project["title"], json!("Moon"));
    assert_eq!(project["abstract"], json!("We study tides."));
}

#[test]
fn test_snapshot_survives_json_exchange() {
    let mut a = ReplicatedStateStore::new(ReplicaId::new("a"));
    a.update("notes", "draft", json!({"sections": 3}));

    let wire = serde_json::to_string(&a.snapshot()).unwrap();
    let received: StateSnapshot = serde_json::from_str(&wire).unwrap();

    let mut b = ReplicatedStateStore::new(ReplicaId::new("b"));
    assert_eq!(b.merge(&received), 1);
    assert_eq!(b.get("notes", "draft"), Some(&json!({"sections": 3})));
    assert_eq!(b.snapshot(), a.snapshot());
}

#[test]
fn test_unknown_project_is_empty() {
    let store = ReplicatedStateStore::new(ReplicaId::new("a"));
    assert!(store.get_project("nope").is_empty());
    assert_eq!(store.get("nope", "field"), None::<&Value>);
}
