#[cfg(test)]
mod tests {
    use crate::*;
    use proptest::prelude::*;

    // --- RandomSource Tests ---

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = RandomSource::new(42);
        let mut b = RandomSource::new(42);
        for n in 1..200 {
            assert_eq!(a.next_int(n), b.next_int(n));
            assert_eq!(a.next_double().to_bits(), b.next_double().to_bits());
        }
        assert_eq!(a.calls(), b.calls());
    }

    #[test]
    fn test_reset_replays_stream() {
        let mut rng = RandomSource::new(7);
        let first: Vec<usize> = (0..50).map(|_| rng.next_int(1000)).collect();
        rng.reset(7);
        let second: Vec<usize> = (0..50).map(|_| rng.next_int(1000)).collect();
        assert_eq!(first, second);
        assert_eq!(rng.calls(), 50);
    }

    #[test]
    fn test_verbose_does_not_change_stream() {
        let mut quiet = RandomSource::new(3);
        let mut loud = RandomSource::new(3);
        loud.set_verbose(true);
        for _ in 0..100 {
            assert_eq!(quiet.next_int(17), loud.next_int(17));
            assert_eq!(quiet.weighted_coin_flip(0.3), loud.weighted_coin_flip(0.3));
        }
    }

    #[test]
    fn test_next_double_in_unit_interval() {
        let mut rng = RandomSource::default();
        for _ in 0..10_000 {
            let d = rng.next_double();
            assert!((0.0..1.0).contains(&d));
        }
    }

    #[test]
    fn test_coin_flip_always_draws() {
        let mut rng = RandomSource::new(1);
        assert!(!rng.weighted_coin_flip(0.0));
        assert!(rng.weighted_coin_flip(1.0));
        assert_eq!(rng.calls(), 2);
    }

    // --- SharedList Tests ---

    #[derive(Debug, Clone)]
    enum ListOp {
        Singleton(u32),
        Extend(usize, u32),
        Concat(Vec<usize>),
        FromVec(Vec<u32>),
    }

    fn list_op() -> impl Strategy<Value = ListOp> {
        prop_oneof![
            any::<u32>().prop_map(ListOp::Singleton),
            (any::<usize>(), any::<u32>()).prop_map(|(i, x)| ListOp::Extend(i, x)),
            prop::collection::vec(any::<usize>(), 0..4).prop_map(ListOp::Concat),
            prop::collection::vec(any::<u32>(), 0..5).prop_map(ListOp::FromVec),
        ]
    }

    fn assert_matches_reference(list: &SharedList<u32>, reference: &[u32]) {
        assert_eq!(list.len(), reference.len());
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), reference);
        for (i, expected) in reference.iter().enumerate() {
            assert_eq!(list.get(i), Some(expected));
            let (frag, pos) = list.sublist_containing(i).unwrap();
            assert_eq!(frag.get(pos), Some(expected));
        }
        assert_eq!(list.get(reference.len()), None);
        assert_eq!(list.last(), reference.last());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn shared_list_behaves_like_flat_vec(ops in prop::collection::vec(list_op(), 1..40)) {
            let mut built: Vec<(SharedList<u32>, Vec<u32>)> = vec![(SharedList::empty(), Vec::new())];
            for op in ops {
                let next = match op {
                    ListOp::Singleton(x) => (SharedList::singleton(x), vec![x]),
                    ListOp::Extend(i, x) => {
                        let (list, reference) = &built[i % built.len()];
                        let mut r = reference.clone();
                        r.push(x);
                        (list.extend_by_one(x), r)
                    }
                    ListOp::Concat(picks) => {
                        let mut lists = Vec::new();
                        let mut r = Vec::new();
                        for i in picks {
                            let (list, reference) = &built[i % built.len()];
                            lists.push(list.clone());
                            r.extend_from_slice(reference);
                        }
                        (SharedList::concat(lists), r)
                    }
                    ListOp::FromVec(v) => (SharedList::from_vec(v.clone()), v),
                };
                assert_matches_reference(&next.0, &next.1);
                built.push(next);
            }
            // Earlier lists are unaffected by later constructions.
            for (list, reference) in &built {
                assert_matches_reference(list, reference);
            }
        }
    }

    #[test]
    fn test_shared_vec_view_is_stable_under_appends() {
        let mut owner = std::sync::Arc::new(vec![1, 2, 3]);
        let view = SharedList::from_shared_vec(owner.clone());
        std::sync::Arc::make_mut(&mut owner).push(4);
        assert_eq!(view.to_vec(), vec![1, 2, 3]);
        assert_eq!(owner.len(), 4);
    }

    // --- Checkpoint Tests ---

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn undo_restores_state_at_mark(
            before in prop::collection::vec((0u8..4, 0u8..4, any::<bool>()), 0..20),
            after in prop::collection::vec((0u8..4, 0u8..4, any::<bool>()), 0..20),
        ) {
            let mut m: CheckpointMultiMap<u8, u8> = CheckpointMultiMap::new();
            let apply = |m: &mut CheckpointMultiMap<u8, u8>, (k, v, add): (u8, u8, bool)| {
                if add {
                    let _ = m.add(k, v);
                } else {
                    let _ = m.remove(&k, &v);
                }
            };
            for op in before {
                apply(&mut m, op);
            }
            let snapshot: Vec<(u8, u8)> = m.entries().map(|(k, v)| (*k, *v)).collect();
            m.mark();
            for op in after {
                apply(&mut m, op);
            }
            m.undo_to_last_mark().unwrap();
            let restored: Vec<(u8, u8)> = m.entries().map(|(k, v)| (*k, *v)).collect();
            prop_assert_eq!(snapshot, restored);
            prop_assert_eq!(m.num_marks(), 0);
        }
    }

    #[test]
    fn test_set_undo_round_trip() {
        let mut s: CheckpointSet<u64> = CheckpointSet::new();
        s.add(1).unwrap();
        s.mark();
        s.add(2).unwrap();
        s.remove(&1).unwrap();
        assert!(s.contains(&2) && !s.contains(&1));
        s.undo_to_last_mark().unwrap();
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    // --- Weighted Sampler Tests ---

    /// Pearson chi-squared statistic of observed counts against weights.
    fn chi_squared(counts: &[u64], weights: &[f64]) -> f64 {
        let n: u64 = counts.iter().sum();
        let total: f64 = weights.iter().sum();
        counts
            .iter()
            .zip(weights)
            .map(|(&c, &w)| {
                let expected = n as f64 * w / total;
                let diff = c as f64 - expected;
                diff * diff / expected
            })
            .sum()
    }

    // 99.9% quantile of chi-squared with 4 degrees of freedom.
    const CHI2_CRITICAL_DF4: f64 = 18.467;

    fn draw_counts<S: WeightedSampler<usize>>(sampler: &S, n: usize, draws: usize, seed: u64) -> Vec<u64> {
        let mut rng = RandomSource::new(seed);
        let mut counts = vec![0u64; n];
        for _ in 0..draws {
            let i = *sampler.random_element(&mut rng).unwrap();
            counts[i] += 1;
        }
        counts
    }

    fn converges<S: WeightedSampler<usize> + Default>() {
        let weights = [1.0, 2.0, 3.0, 4.0, 10.0];
        let mut sampler = S::default();
        for (i, &w) in weights.iter().enumerate() {
            sampler.add(i, w).unwrap();
        }
        assert!((sampler.total_weight() - 20.0).abs() < 1e-9);
        let counts = draw_counts(&sampler, weights.len(), 50_000, 11);
        let stat = chi_squared(&counts, &weights);
        assert!(stat < CHI2_CRITICAL_DF4, "chi2 = {stat}, counts = {counts:?}");
    }

    #[test]
    fn test_list_sampler_converges() {
        converges::<WeightedList<usize>>();
    }

    #[test]
    fn test_tree_sampler_converges() {
        converges::<WeightedTree<usize>>();
    }

    fn update_shifts<S: WeightedSampler<usize> + Default>() {
        let mut sampler = S::default();
        for i in 0..8 {
            sampler.add(i, 1.0).unwrap();
        }
        sampler.update(&0, 30.0).unwrap();
        assert_eq!(sampler.weight(&0), Some(30.0));
        assert!((sampler.total_weight() - 37.0).abs() < 1e-9);
        let counts = draw_counts(&sampler, 8, 10_000, 5);
        // Expected share 30/37.
        assert!(counts[0] > 7_500, "counts = {counts:?}");
    }

    #[test]
    fn test_list_update_shifts_frequencies() {
        update_shifts::<WeightedList<usize>>();
    }

    #[test]
    fn test_tree_update_shifts_frequencies() {
        update_shifts::<WeightedTree<usize>>();
    }

    fn rejects_bad_input<S: WeightedSampler<usize> + Default>() {
        let mut sampler = S::default();
        let mut rng = RandomSource::new(0);
        assert!(sampler.random_element(&mut rng).is_none());
        assert_eq!(rng.calls(), 0);
        assert!(matches!(sampler.add(0, 0.0), Err(SamplerError::InvalidWeight(_))));
        assert!(matches!(sampler.add(0, -1.0), Err(SamplerError::InvalidWeight(_))));
        assert!(matches!(sampler.add(0, f64::NAN), Err(SamplerError::InvalidWeight(_))));
        sampler.add(0, 1.0).unwrap();
        assert!(matches!(sampler.add(0, 2.0), Err(SamplerError::DuplicateElement(_))));
        assert!(matches!(sampler.update(&9, 2.0), Err(SamplerError::UnknownElement(_))));
        assert_eq!(sampler.len(), 1);
    }

    #[test]
    fn test_list_rejects_bad_input() {
        rejects_bad_input::<WeightedList<usize>>();
    }

    #[test]
    fn test_tree_rejects_bad_input() {
        rejects_bad_input::<WeightedTree<usize>>();
    }

    #[test]
    fn test_tree_totals_match_list_under_updates() {
        let mut list = WeightedList::new();
        let mut tree = WeightedTree::new();
        let mut rng = RandomSource::new(99);
        for i in 0..37usize {
            let w = 0.5 + rng.next_double() * 4.0;
            list.add(i, w).unwrap();
            tree.add(i, w).unwrap();
        }
        for _ in 0..100 {
            let i = rng.next_int(37);
            let w = 0.1 + rng.next_double();
            list.update(&i, w).unwrap();
            tree.update(&i, w).unwrap();
        }
        assert!((list.total_weight() - tree.total_weight()).abs() < 1e-9);
    }
}
