use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, Rng, SeedableRng};
use zcash_primitives::{block::BlockHash, consensus::BlockHeight, transaction::TxId};

use super::*;
use crate::{
    memory::MemoryCoinsView,
    mocks::{
        coin_record, commitment, random_block_hash, random_nullifier, random_txid, CountingView,
        FailingView,
    },
    transaction::{SpendDescription, TransactionBuilder, TxOut},
    view::EmptyCoinsView,
};

fn sapling_spend_tx(nullifiers: &[Nullifier]) -> Transaction {
    nullifiers
        .iter()
        .fold(TransactionBuilder::new(), |builder, nullifier| {
            builder.shielded_spend(SpendDescription {
                anchor: SaplingTree::empty_root(),
                nullifier: *nullifier,
            })
        })
        .build()
        .unwrap()
}

fn sprout_tree_with(seeds: &[u8]) -> SproutTree {
    let mut tree = SproutTree::empty();
    for seed in seeds {
        tree.append(commitment(*seed)).unwrap();
    }
    tree
}

fn sapling_tree_with(seeds: &[u8]) -> SaplingTree {
    let mut tree = SaplingTree::empty();
    for seed in seeds {
        tree.append(commitment(*seed)).unwrap();
    }
    tree
}

fn dirty(coins: CoinRecord, fresh: bool) -> CoinsCacheEntry {
    CoinsCacheEntry {
        coins,
        dirty: true,
        fresh,
    }
}

#[test]
fn modified_coins_read_back() {
    let mut cache = CoinsViewCache::new(EmptyCoinsView);
    let txid = random_txid();
    assert!(!cache.have_coins(&txid));
    {
        let mut coins = cache.modify_coins(&txid);
        coins.outputs = vec![Some(TxOut::new(50, vec![0x51]))];
        coins.height = BlockHeight::from_u32(7);
    }
    let expected = CoinRecord {
        outputs: vec![Some(TxOut::new(50, vec![0x51]))],
        height: BlockHeight::from_u32(7),
        ..Default::default()
    };
    assert_eq!(cache.get_coins(&txid), Some(expected));
    assert!(cache.have_coins(&txid));
}

#[test]
fn spending_last_output_releases_memory() {
    let mut cache = CoinsViewCache::new(EmptyCoinsView);
    let baseline = cache.dynamic_memory_usage();
    let txid = random_txid();
    cache.modify_coins(&txid).outputs = vec![Some(TxOut::new(50, vec![0x51]))];
    let with_coins = cache.dynamic_memory_usage();
    assert!(with_coins > baseline);

    assert!(cache.modify_coins(&txid).spend(0));
    assert!(!cache.have_coins(&txid));
    assert_eq!(cache.get_cache_size(), 0);
    assert_eq!(cache.cached_coins_usage(), 0);
    assert!(cache.dynamic_memory_usage() < with_coins);
}

#[test]
fn spent_nullifier_is_answered_from_cache() {
    let nullifier = random_nullifier();
    let mut counting = CountingView::new(MemoryCoinsView::new());
    let mut cache = CoinsViewCache::new(&mut counting);

    assert!(!cache.get_nullifier(&nullifier, ShieldedType::Sapling));
    assert_eq!(cache.base_mut().reads.nullifiers, 1);

    cache.set_nullifiers(&sapling_spend_tx(&[nullifier]), true);
    assert!(cache.get_nullifier(&nullifier, ShieldedType::Sapling));
    assert!(!cache.get_nullifier(&nullifier, ShieldedType::Sprout));
    assert_eq!(cache.base_mut().reads.nullifiers, 2);

    assert!(cache.get_nullifier(&nullifier, ShieldedType::Sapling));
    assert_eq!(cache.base_mut().reads.nullifiers, 2);
}

#[test]
fn push_anchor_of_current_root_is_a_no_op() {
    let mut store = MemoryCoinsView::new();
    let mut cache = CoinsViewCache::new(&mut store);
    let best = cache.get_best_anchor(ShieldedType::Sprout);
    assert_eq!(best, Some(SproutTree::empty_root()));

    cache.push_anchor(&SproutTree::empty());
    assert_eq!(cache.get_best_anchor(ShieldedType::Sprout), best);
    assert!(cache.delta().sprout_anchors.is_empty());
    assert_eq!(cache.cached_coins_usage(), 0);

    let tree = sprout_tree_with(&[1, 2]);
    cache.push_anchor(&tree);
    assert_eq!(cache.get_best_anchor(ShieldedType::Sprout), Some(tree.root()));
    assert_eq!(cache.delta().sprout_anchors.len(), 1);
    let entry = &cache.delta().sprout_anchors[&tree.root()];
    assert!(entry.entered);
    assert!(entry.dirty);
    assert_eq!(entry.tree, tree);
    assert!(cache.delta().sapling_anchors.is_empty());

    // pushing the same tree again changes nothing
    let usage = cache.cached_coins_usage();
    cache.push_anchor(&tree);
    assert_eq!(cache.delta().sprout_anchors.len(), 1);
    assert_eq!(cache.cached_coins_usage(), usage);
}

#[test]
fn set_nullifiers_is_idempotent() {
    let tx = sapling_spend_tx(&[random_nullifier(), random_nullifier()]);

    let mut once = CoinsViewCache::new(EmptyCoinsView);
    once.set_nullifiers(&tx, true);
    let mut twice = CoinsViewCache::new(EmptyCoinsView);
    twice.set_nullifiers(&tx, true);
    twice.set_nullifiers(&tx, true);

    assert_eq!(once.delta().sapling_nullifiers, twice.delta().sapling_nullifiers);
    for spend in tx.shielded_spends() {
        assert!(twice.get_nullifier(&spend.nullifier, ShieldedType::Sapling));
    }
}

#[derive(Debug, PartialEq)]
struct Observed {
    coins: Vec<(bool, Option<CoinRecord>)>,
    nullifiers: Vec<bool>,
    sapling_anchors: Vec<Option<SaplingTree>>,
    best_block: Option<BlockHash>,
    best_anchors: (Option<Anchor>, Option<Anchor>),
}

fn observe(
    view: &mut impl CoinsView,
    txids: &[TxId],
    nullifiers: &[Nullifier],
    roots: &[Anchor],
) -> Observed {
    Observed {
        coins: txids
            .iter()
            .map(|txid| {
                let coins = view.get_coins(txid).filter(|coins| !coins.is_pruned());
                (view.have_coins(txid), coins)
            })
            .collect(),
        nullifiers: nullifiers
            .iter()
            .map(|nf| view.get_nullifier(nf, ShieldedType::Sapling))
            .collect(),
        sapling_anchors: roots
            .iter()
            .map(|root| view.get_sapling_anchor_at(root))
            .collect(),
        best_block: view.get_best_block(),
        best_anchors: (
            view.get_best_anchor(ShieldedType::Sprout),
            view.get_best_anchor(ShieldedType::Sapling),
        ),
    }
}

#[test]
fn flushed_child_reads_the_same_through_parent() {
    let (a, b, c, unknown) = (random_txid(), random_txid(), random_txid(), random_txid());
    let (spent, untouched) = (random_nullifier(), random_nullifier());
    let tree = sapling_tree_with(&[3]);
    let txids = [a, b, c, unknown];
    let nullifiers = [spent, untouched];
    let roots = [tree.root(), SaplingTree::empty_root()];

    let mut store = MemoryCoinsView::new();
    store.insert_coins(a, coin_record(&[5, 6], 1));
    store.insert_coins(b, coin_record(&[7], 1));
    let mut parent = CoinsViewCache::new(&mut store);

    let before = {
        let mut child = CoinsViewCache::new(&mut parent);
        assert!(child.modify_coins(&a).spend(0));
        assert!(child.modify_coins(&b).spend(0));
        *child.modify_new_coins(&c) = coin_record(&[8, 9], 2);
        child.set_nullifiers(&sapling_spend_tx(&[spent]), true);
        child.push_anchor(&tree);
        child.set_best_block(random_block_hash());

        let before = observe(&mut child, &txids, &nullifiers, &roots);
        child.flush().unwrap();
        assert!(child.delta().is_empty());
        before
    };
    assert_eq!(observe(&mut parent, &txids, &nullifiers, &roots), before);

    parent.flush().unwrap();
    let store = parent.into_base();
    assert_eq!(observe(store, &txids, &nullifiers, &roots), before);
    assert_eq!(store.coins_count(), 2);
}

#[test]
fn failed_flush_keeps_everything_staged() {
    let mut failing = FailingView::new(MemoryCoinsView::new());
    let mut cache = CoinsViewCache::new(&mut failing);
    let txid = random_txid();
    let nullifier = random_nullifier();
    *cache.modify_new_coins(&txid) = coin_record(&[1, 2], 3);
    cache.set_nullifiers(&sapling_spend_tx(&[nullifier]), true);
    let usage = cache.cached_coins_usage();

    assert!(matches!(cache.flush(), Err(ViewError::WriteRejected(_))));
    assert_eq!(cache.get_cache_size(), 1);
    assert_eq!(cache.cached_coins_usage(), usage);
    assert!(cache.delta().coins[&txid].dirty);
    assert!(cache.have_coins(&txid));
    assert!(cache.get_nullifier(&nullifier, ShieldedType::Sapling));

    // a retry succeeds once the store is back
    cache.base_mut().failing = false;
    cache.flush().unwrap();
    assert_eq!(cache.get_cache_size(), 0);
    assert_eq!(cache.cached_coins_usage(), 0);
    assert!(cache.delta().is_empty());
    assert!(cache.have_coins(&txid));
    assert!(cache.get_nullifier(&nullifier, ShieldedType::Sapling));
}

#[test]
fn flush_into_empty_view_is_rejected() {
    let mut cache = CoinsViewCache::new(EmptyCoinsView);
    cache.modify_coins(&random_txid()).outputs = vec![Some(TxOut::new(1, vec![0x51]))];
    assert!(matches!(cache.flush(), Err(ViewError::Unsupported)));
    assert_eq!(cache.get_cache_size(), 1);
}

#[test]
fn have_coins_checks_for_an_empty_output_list() {
    let txid = random_txid();
    let mut store = MemoryCoinsView::new();
    store.insert_coins(
        txid,
        CoinRecord {
            outputs: vec![None, None],
            ..coin_record(&[], 1)
        },
    );
    let mut cache = CoinsViewCache::new(&mut store);
    assert!(cache.have_coins(&txid));
    assert!(cache.access_coins(&txid).unwrap().is_pruned());
    // the entry was pulled as pruned, so it is FRESH here
    assert!(cache.delta().coins[&txid].fresh);
}

#[test]
fn best_block_is_memoized() {
    let hash = random_block_hash();
    let mut store = MemoryCoinsView::new();
    let mut writer = CoinsViewCache::new(&mut store);
    writer.set_best_block(hash);
    writer.flush().unwrap();
    assert_eq!(writer.get_best_block(), Some(hash));
    drop(writer);

    let mut counting = CountingView::new(store);
    let mut cache = CoinsViewCache::new(&mut counting);
    assert_eq!(cache.get_best_block(), Some(hash));
    assert_eq!(cache.get_best_block(), Some(hash));
    assert_eq!(cache.base_mut().reads.best, 1);

    // a child that never learned the best block does not clear it
    let mut child = CoinsViewCache::new(&mut cache);
    child.modify_coins(&random_txid()).outputs = vec![Some(TxOut::new(1, vec![0x51]))];
    child.flush().unwrap();
    drop(child);
    assert_eq!(cache.get_best_block(), Some(hash));
}

#[test]
fn batch_write_merges_coin_entries() {
    let (created, erased, tombstoned, overwritten, ignored) = (
        random_txid(),
        random_txid(),
        random_txid(),
        random_txid(),
        random_txid(),
    );
    let mut store = MemoryCoinsView::new();
    store.insert_coins(tombstoned, coin_record(&[1], 1));
    store.insert_coins(overwritten, coin_record(&[2], 1));
    let mut cache = CoinsViewCache::new(&mut store);
    *cache.modify_new_coins(&erased) = coin_record(&[3], 2);
    assert!(cache.have_coins(&tombstoned));
    assert!(cache.have_coins(&overwritten));

    let mut delta = CoinsDelta::default();
    delta.coins.insert(created, dirty(coin_record(&[4], 2), true));
    delta.coins.insert(erased, dirty(CoinRecord::default(), false));
    delta.coins.insert(tombstoned, dirty(CoinRecord::default(), false));
    delta
        .coins
        .insert(overwritten, dirty(coin_record(&[2, 5], 1), false));
    delta
        .coins
        .insert(ignored, CoinsCacheEntry::new(coin_record(&[6], 1)));
    cache.batch_write(&mut delta).unwrap();
    assert!(delta.coins.is_empty());

    let coins = &cache.delta().coins;
    assert_eq!(coins[&created], dirty(coin_record(&[4], 2), true));
    assert!(!coins.contains_key(&erased));
    assert!(coins[&tombstoned].dirty);
    assert!(!coins[&tombstoned].fresh);
    assert!(coins[&tombstoned].coins.is_pruned());
    assert_eq!(coins[&overwritten], dirty(coin_record(&[2, 5], 1), false));
    assert!(!coins.contains_key(&ignored));

    let expected_usage: usize = coins.values().map(|entry| entry.coins.dynamic_usage()).sum();
    assert_eq!(cache.cached_coins_usage(), expected_usage);
}

#[test]
fn batch_write_updates_anchors_and_nullifiers_only_on_change() {
    let tree = sprout_tree_with(&[9]);
    let nullifier = random_nullifier();
    let mut cache = CoinsViewCache::new(MemoryCoinsView::new());
    cache.push_anchor(&tree);
    assert!(!cache.get_nullifier(&nullifier, ShieldedType::Sprout));

    let mut delta = CoinsDelta::default();
    delta.sprout_anchors.insert(
        tree.root(),
        AnchorsCacheEntry {
            entered: true,
            tree: tree.clone(),
            dirty: true,
        },
    );
    delta.sprout_nullifiers.insert(
        nullifier,
        NullifiersCacheEntry {
            entered: false,
            dirty: true,
        },
    );
    cache.batch_write(&mut delta).unwrap();
    // same `entered` as ours, so the clean nullifier stays clean
    assert!(!cache.delta().sprout_nullifiers[&nullifier].dirty);

    delta.sprout_anchors.insert(
        tree.root(),
        AnchorsCacheEntry {
            entered: false,
            tree: tree.clone(),
            dirty: true,
        },
    );
    delta.sprout_nullifiers.insert(
        nullifier,
        NullifiersCacheEntry {
            entered: true,
            dirty: true,
        },
    );
    cache.batch_write(&mut delta).unwrap();
    assert!(!cache.delta().sprout_anchors[&tree.root()].entered);
    assert_eq!(cache.get_anchor_at::<SproutTree>(&tree.root()), None);
    let entry = cache.delta().sprout_nullifiers[&nullifier];
    assert!(entry.entered);
    assert!(entry.dirty);
}

#[test]
fn pop_anchor_reverts_to_previous_root() {
    let mut store = MemoryCoinsView::new();
    let tree = sprout_tree_with(&[1]);
    {
        let mut cache = CoinsViewCache::new(&mut store);
        cache.push_anchor(&tree);
        cache.flush().unwrap();
    }
    assert_eq!(store.get_sprout_anchor_at(&tree.root()), Some(tree.clone()));

    let mut cache = CoinsViewCache::new(&mut store);
    cache.pop_anchor(&SproutTree::empty_root(), ShieldedType::Sprout);
    assert_eq!(
        cache.get_best_anchor(ShieldedType::Sprout),
        Some(SproutTree::empty_root())
    );
    let entry = &cache.delta().sprout_anchors[&tree.root()];
    assert!(!entry.entered);
    assert!(entry.dirty);
    assert_eq!(cache.get_sprout_anchor_at(&tree.root()), None);

    // popping to the current root does nothing
    cache.pop_anchor(&SproutTree::empty_root(), ShieldedType::Sprout);
    cache.flush().unwrap();
    drop(cache);
    assert_eq!(store.get_sprout_anchor_at(&tree.root()), None);
    assert_eq!(
        store.get_best_anchor(ShieldedType::Sprout),
        Some(SproutTree::empty_root())
    );
}

#[test]
#[should_panic]
fn pop_anchor_without_a_reachable_best_anchor_panics() {
    let mut cache = CoinsViewCache::new(EmptyCoinsView);
    cache.pop_anchor(&SaplingTree::empty_root(), ShieldedType::Sapling);
}

#[test]
fn anchor_trees_count_toward_usage() {
    let mut cache = CoinsViewCache::new(MemoryCoinsView::new());
    let tree = sapling_tree_with(&[1, 2, 3]);
    cache.push_anchor(&tree);
    assert_eq!(cache.cached_coins_usage(), tree.dynamic_usage());
    assert!(cache.dynamic_memory_usage() >= tree.dynamic_usage());
}

/// Mirror of the logical state: live records and spent sapling nullifiers.
#[derive(Debug, Clone, Default)]
struct Model {
    coins: HashMap<TxId, CoinRecord>,
    nullifiers: HashSet<Nullifier>,
}

fn assert_matches_model(
    view: &mut impl CoinsView,
    model: &Model,
    known: &[TxId],
    nullifiers: &[Nullifier],
) {
    for txid in known {
        let expected = model.coins.get(txid);
        assert_eq!(view.have_coins(txid), expected.is_some(), "{txid}");
        if let Some(expected) = expected {
            assert_eq!(view.get_coins(txid).as_ref(), Some(expected), "{txid}");
        }
    }
    for nullifier in nullifiers {
        assert_eq!(
            view.get_nullifier(nullifier, ShieldedType::Sapling),
            model.nullifiers.contains(nullifier),
            "{nullifier}"
        );
    }
}

#[test]
fn random_layered_operations_match_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let nullifiers: Vec<Nullifier> = (0..8)
        .map(|_| Nullifier::from_bytes(rng.gen()))
        .collect();
    let mut known: Vec<TxId> = Vec::new();
    let mut committed = Model::default();

    let mut store = MemoryCoinsView::new();
    let mut parent = CoinsViewCache::new(&mut store);

    for epoch in 0..40u32 {
        let mut working = committed.clone();
        {
            let mut child = CoinsViewCache::new(&mut parent);
            for _ in 0..25 {
                match rng.gen_range(0..4) {
                    0 => {
                        let txid = TxId::from_bytes(rng.gen());
                        let values: Vec<i64> =
                            (0..rng.gen_range(1..5)).map(|_| rng.gen_range(1..1000)).collect();
                        let record = coin_record(&values, epoch + 1);
                        *child.modify_new_coins(&txid) = record.clone();
                        known.push(txid);
                        working.coins.insert(txid, record);
                    }
                    1 | 2 if !known.is_empty() => {
                        let txid = known[rng.gen_range(0..known.len())];
                        let Some(expected) = working.coins.get_mut(&txid) else {
                            continue;
                        };
                        let pos = rng.gen_range(0..expected.outputs.len() as u32);
                        let available = expected.is_available(pos);
                        assert_eq!(child.modify_coins(&txid).spend(pos), available);
                        expected.spend(pos);
                        if expected.is_pruned() {
                            working.coins.remove(&txid);
                        }
                    }
                    _ => {
                        let nullifier = nullifiers[rng.gen_range(0..nullifiers.len())];
                        let spent = rng.gen_bool(0.5);
                        child.set_nullifiers(&sapling_spend_tx(&[nullifier]), spent);
                        if spent {
                            working.nullifiers.insert(nullifier);
                        } else {
                            working.nullifiers.remove(&nullifier);
                        }
                    }
                }
                assert_matches_model(&mut child, &working, &known, &nullifiers);
            }
            if rng.gen_bool(0.8) {
                child.flush().unwrap();
                committed = working;
            }
        }
        assert_matches_model(&mut parent, &committed, &known, &nullifiers);
        if rng.gen_bool(0.3) {
            parent.flush().unwrap();
        }
    }

    parent.flush().unwrap();
    drop(parent);
    assert_eq!(store.coins_count(), committed.coins.len());
    assert_matches_model(&mut store, &committed, &known, &nullifiers);
}
