#![cfg(test)]

// Property tests for ChainTable kept inside the crate so they can reach the
// crate-private cursor primitives (`head`/`step`).

use crate::chain_table::{ChainTable, Handle};
use crate::error::InsertError;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// hashes, pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    InsertWith(usize, i32),
    Remove(usize),
    RemoveHandle(usize),
    Find(usize),
    Contains(u32),
    Mutate(usize, i32),
    Iterate,
    Walk,
}

fn arb_ops(pool_len: usize) -> impl Strategy<Value = Vec<OpI>> {
    let idx = 0..pool_len;
    let op = prop_oneof![
        (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
        (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::InsertWith(i, v)),
        idx.clone().prop_map(OpI::Remove),
        idx.clone().prop_map(OpI::RemoveHandle),
        idx.clone().prop_map(OpI::Find),
        (0u32..64).prop_map(OpI::Contains),
        (idx, any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
        Just(OpI::Iterate),
        Just(OpI::Walk),
    ];
    proptest::collection::vec(op, 1..60)
}

fn arb_scenario() -> impl Strategy<Value = (usize, Vec<u32>, Vec<OpI>)> {
    (1usize..=8, proptest::collection::vec(0u32..64, 1..=8)).prop_flat_map(|(buckets, pool)| {
        let n = pool.len();
        (Just(buckets), Just(pool), arb_ops(n))
    })
}

// Model entry: value plus insertion sequence number, which fixes chain order.
type Model = BTreeMap<u32, (i32, u64)>;

fn expected_order(model: &Model, buckets: usize) -> Vec<(u32, i32)> {
    let mut v: Vec<_> = model.iter().map(|(&h, &(val, seq))| (h, val, seq)).collect();
    v.sort_by_key(|&(h, _, seq)| (h as usize % buckets, seq));
    v.into_iter().map(|(h, val, _)| (h, val)).collect()
}

// State-machine equivalence against a BTreeMap model.
// Invariants exercised across random operation sequences:
// - Duplicate hashes are rejected; on success a unique Handle is returned.
// - `find`/`contains`/`get` parity with the model.
// - `remove`/`remove_handle` return the stored value and invalidate the handle.
// - `iter` and a `head`/`step` walk both yield bucket-then-insertion order.
// - Chain lengths match the model's per-bucket counts.
// - Stale handles never resolve; `len`/`is_empty` parity after each op.
fn run_scenario(buckets: usize, pool: &[u32], ops: Vec<OpI>) -> Result<(), TestCaseError> {
    let mut sut: ChainTable<i32> = ChainTable::with_buckets(buckets);
    let mut model: Model = BTreeMap::new();
    let mut live: HashMap<u32, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();
    let mut seq = 0u64;

    let default_calls = Rc::new(Cell::new(0));
    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let h = pool[i];
                let already = model.contains_key(&h);
                match sut.insert(h, v) {
                    Ok(handle) => {
                        prop_assert!(!already, "insert must fail on duplicate");
                        prop_assert!(live.insert(h, handle).is_none());
                        model.insert(h, (v, seq));
                        seq += 1;
                    }
                    Err(InsertError::AlreadyExists { hash }) => {
                        prop_assert!(already, "duplicate error only when hash exists");
                        prop_assert_eq!(hash, h);
                    }
                }
            }
            OpI::InsertWith(i, v) => {
                let h = pool[i];
                let already = model.contains_key(&h);
                let counter = default_calls.clone();
                let before = counter.get();
                match sut.insert_with(h, move || {
                    counter.set(counter.get() + 1);
                    v
                }) {
                    Ok(handle) => {
                        prop_assert!(!already);
                        prop_assert_eq!(default_calls.get(), before + 1);
                        prop_assert!(live.insert(h, handle).is_none());
                        model.insert(h, (v, seq));
                        seq += 1;
                    }
                    Err(InsertError::AlreadyExists { .. }) => {
                        prop_assert!(already);
                        prop_assert_eq!(
                            default_calls.get(),
                            before,
                            "default must not run on duplicate"
                        );
                    }
                }
            }
            OpI::Remove(i) => {
                let h = pool[i];
                let got = sut.remove(h);
                prop_assert_eq!(got, model.remove(&h).map(|(v, _)| v));
                if let Some(handle) = live.remove(&h) {
                    stale.push(handle);
                }
            }
            OpI::RemoveHandle(i) => {
                let h = pool[i];
                if let Some(handle) = live.remove(&h) {
                    let (hh, vv) = sut.remove_handle(handle).expect("live handle removes");
                    prop_assert_eq!(hh, h);
                    let (mv, _) = model.remove(&h).expect("present in model");
                    prop_assert_eq!(vv, mv);
                    stale.push(handle);
                } else {
                    prop_assert!(sut.find(h).is_none());
                }
            }
            OpI::Find(i) => {
                let h = pool[i];
                let found = sut.find(h);
                prop_assert_eq!(found, live.get(&h).copied());
                prop_assert_eq!(sut.get(h).copied(), model.get(&h).map(|&(v, _)| v));
            }
            OpI::Contains(h) => {
                prop_assert_eq!(sut.contains(h), model.contains_key(&h));
            }
            OpI::Mutate(i, d) => {
                let h = pool[i];
                if let Some(&handle) = live.get(&h) {
                    match handle.value_mut(&mut sut) {
                        Some(vr) => *vr = vr.saturating_add(d),
                        None => prop_assert!(false, "live handle should resolve"),
                    }
                    if let Some((mv, _)) = model.get_mut(&h) {
                        *mv = mv.saturating_add(d);
                    }
                }
            }
            OpI::Iterate => {
                let got: Vec<_> = sut.iter().map(|(h, &v)| (h, v)).collect();
                prop_assert_eq!(got, expected_order(&model, buckets));
            }
            OpI::Walk => {
                let mut got = Vec::new();
                for bucket in 0..sut.bucket_count() {
                    let mut cur = sut.head(bucket);
                    while let Some(handle) = cur {
                        let (v, next) = sut.step(handle).expect("chain handles are live");
                        got.push((handle.item_hash(&sut).expect("live"), *v));
                        cur = next;
                    }
                }
                prop_assert_eq!(got, expected_order(&model, buckets));
            }
        }

        // Post-conditions after each op
        for &h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
        for bucket in 0..buckets {
            let expect = model.keys().filter(|&&h| h as usize % buckets == bucket).count();
            prop_assert_eq!(sut.chain_len(bucket), expect);
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((buckets, pool, ops) in arb_scenario()) {
        run_scenario(buckets, &pool, ops)?;
    }
}

// Property: Same state-machine invariants with a single bucket, so every
// item collides and lives on one chain. Stresses unlinking at every
// position of a long chain.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_single_chain(
        (pool, ops) in proptest::collection::vec(0u32..64, 1..=8)
            .prop_flat_map(|pool| { let n = pool.len(); (Just(pool), arb_ops(n)) })
    ) {
        run_scenario(1, &pool, ops)?;
    }
}
