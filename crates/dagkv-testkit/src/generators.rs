//! Proptest generators for property-based testing.

use proptest::prelude::*;

use dagkv_core::{Cid, Operation, Value};

use crate::fixtures::Dag;

/// Generate a random Cid.
pub fn cid() -> impl Strategy<Value = Cid> {
    any::<[u8; 32]>().prop_map(Cid::from_bytes)
}

/// Generate a key from a small alphabet, so that keys collide often.
pub fn key() -> impl Strategy<Value = String> {
    "[a-f]{1,3}".prop_map(String::from)
}

/// Generate a key with a path-like shape.
pub fn path_key() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z0-9]{1,8}){0,3}".prop_map(String::from)
}

/// Generate a block value without links.
pub fn value() -> impl Strategy<Value = Value> {
    let scalar = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[ -~]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];
    scalar.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Generate an operation over [`key`].
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => (key(), cid()).prop_map(|(k, v)| Operation::set(k, v)),
        1 => key().prop_map(Operation::delete),
    ]
}

/// Generate a DAG shape for [`Dag::from_shape`]: entry `i` lists the
/// earlier blocks block `i` links to.
pub fn dag_shape(max_blocks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(
        prop::collection::vec(any::<prop::sample::Index>(), 0..4),
        1..=max_blocks.max(1),
    )
    .prop_map(|picks| {
        picks
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if i == 0 {
                    Vec::new()
                } else {
                    row.iter().map(|p| p.index(i)).collect()
                }
            })
            .collect()
    })
}

/// Generate a synthetic DAG.
pub fn dag(max_blocks: usize) -> impl Strategy<Value = Dag> {
    dag_shape(max_blocks).prop_map(|shape| Dag::from_shape(&shape))
}

/// One staged write: `Some(n)` sets, `None` deletes.
pub type Edit = (String, Option<i64>);

/// Parameters for building a log.
#[derive(Debug, Clone)]
pub struct LogParams {
    /// The writes of each commit, in order.
    pub commits: Vec<Vec<Edit>>,
}

impl LogParams {
    /// The value each key ends up with; deleted keys are absent.
    pub fn expected(&self) -> std::collections::BTreeMap<String, i64> {
        let mut state = std::collections::BTreeMap::new();
        for (key, value) in self.commits.iter().flatten() {
            match value {
                Some(n) => state.insert(key.clone(), *n),
                None => state.remove(key),
            };
        }
        state
    }
}

impl Arbitrary for LogParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let edit = (key(), prop::option::weighted(0.8, -1000i64..1000));
        prop::collection::vec(prop::collection::vec(edit, 1..8), 1..5)
            .prop_map(|commits| LogParams { commits })
            .boxed()
    }
}
