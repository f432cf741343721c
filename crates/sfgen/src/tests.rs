#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use seqforge_util::RandomSource;

    use crate::demo::{counter_catalog, counter_type, mixed_catalog, stack_catalog};
    use crate::*;

    fn counter_ops(catalog: &Catalog) -> (OpRef, OpRef, OpRef) {
        (
            catalog.get("Counter.new").unwrap(),
            catalog.get("Counter.increment").unwrap(),
            catalog.get("Counter.value").unwrap(),
        )
    }

    // --- Sequence Tests ---

    #[test]
    fn test_counter_sequence_renders_as_code() {
        let catalog = counter_catalog().unwrap();
        let (new, inc, val) = counter_ops(&catalog);
        let seq = Sequence::empty()
            .extend(new, &[])
            .unwrap()
            .extend(inc, &[0])
            .unwrap()
            .extend(val, &[0])
            .unwrap();
        assert_eq!(
            seq.to_code(),
            "Counter v0 = Counter();\nv0.increment();\nint v2 = v0.value();"
        );
        assert_eq!(seq.method_calls(), 3);
        assert_eq!(seq.last_statement_positions(), vec![0, 2]);
    }

    #[test]
    fn test_fingerprint_independent_of_construction() {
        let catalog = counter_catalog().unwrap();
        let (new, inc, _) = counter_ops(&catalog);
        let c = Sequence::empty().extend(new, &[]).unwrap();
        let lit = Sequence::literal(Literal::Int(10));

        // Concatenate then extend, versus rebuild from the flat list.
        let joined = Sequence::concat(&[lit.clone(), c.clone()]).extend(inc, &[1]).unwrap();
        let flat = Sequence::from_statements(seqforge_util::SharedList::from_vec(joined.statements().to_vec()));
        assert_eq!(joined.fingerprint(), flat.fingerprint());
        assert_eq!(joined, flat);

        let ab = Sequence::concat(&[lit.clone(), c.clone()]);
        let ba = Sequence::concat(&[c, lit]);
        assert_ne!(ab.fingerprint(), ba.fingerprint());
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_extend_rejects_bad_inputs() {
        let catalog = counter_catalog().unwrap();
        let (new, inc, _) = counter_ops(&catalog);
        let c = Sequence::empty().extend(new, &[]).unwrap();
        assert!(matches!(c.extend(Arc::clone(&inc), &[]), Err(EngineError::Arity { .. })));
        assert!(matches!(c.extend(inc, &[1]), Err(EngineError::InvalidSequence(_))));
    }

    #[test]
    fn test_record_round_trip_through_catalog() {
        let catalog = stack_catalog().unwrap();
        let new = catalog.get("BoundedStack.new").unwrap();
        let push = catalog.get("BoundedStack.push").unwrap();
        let seq = Sequence::concat(&[
            Sequence::empty().extend(new, &[]).unwrap(),
            Sequence::literal(Literal::Int(-1)),
        ])
        .extend(push, &[0, 1])
        .unwrap();
        let json = serde_json::to_string(&seq.to_record()).unwrap();
        let record: SequenceRecord = serde_json::from_str(&json).unwrap();
        let back = Sequence::from_record(&record, &catalog).unwrap();
        assert_eq!(back, seq);
        assert_eq!(back.to_code(), "BoundedStack v0 = BoundedStack();\nint v1 = -1;\nv0.push(v1);");

        let unknown = counter_catalog().unwrap();
        assert!(matches!(
            Sequence::from_record(&record, &unknown),
            Err(EngineError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_produced_types_skip_primitives_and_nulls() {
        let catalog = counter_catalog().unwrap();
        let (new, _, val) = counter_ops(&catalog);
        let seq = Sequence::empty().extend(new, &[]).unwrap().extend(val, &[0]).unwrap();
        let types: Vec<TypeDesc> = seq.produced_types().into_iter().collect();
        assert_eq!(types, vec![counter_type()]);
        assert!(Sequence::null_of(&counter_type()).produced_types().is_empty());
    }

    // --- Pool Tests ---

    fn counters(n: usize) -> Vec<Sequence> {
        let catalog = counter_catalog().unwrap();
        let (new, inc, _) = counter_ops(&catalog);
        let mut seq = Sequence::empty().extend(new, &[]).unwrap();
        let mut out = vec![seq.clone()];
        while out.len() < n {
            seq = seq.extend(Arc::clone(&inc), &[0]).unwrap();
            out.push(seq.clone());
        }
        out
    }

    #[test]
    fn test_pool_resets_at_threshold() {
        let mut pool = ComponentPool::new(Arc::new(ExactTypes), 5, false).unwrap();
        let seeds = pool.seed_count();
        for (i, seq) in counters(6).into_iter().enumerate() {
            pool.add(seq).unwrap();
            assert_eq!(pool.size(), if i < 5 { i + 1 } else { 1 });
        }
        assert_eq!(pool.resets(), 1);
        assert_eq!(pool.seed_count(), seeds);
        assert_eq!(pool.lookup(&counter_type(), MatchMode::Exact).len(), 1);
        assert_eq!(pool.lookup(&TypeDesc::int(), MatchMode::Exact).len(), 5);
    }

    #[test]
    fn test_lookup_sees_later_additions_and_shares_views() {
        let mut pool = ComponentPool::new(Arc::new(ExactTypes), usize::MAX, false).unwrap();
        let seqs = counters(3);
        pool.add(seqs[0].clone()).unwrap();
        let before = pool.lookup(&counter_type(), MatchMode::Exact);
        pool.add(seqs[1].clone()).unwrap();
        pool.add(seqs[2].clone()).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(pool.lookup(&counter_type(), MatchMode::Exact).len(), 3);
    }

    #[test]
    fn test_assignable_lookup_uses_oracle() {
        let mut table = SubtypeTable::new();
        table.declare("Counter", "Object");
        let mut pool = ComponentPool::new(Arc::new(table), usize::MAX, false).unwrap();
        for seq in counters(2) {
            pool.add(seq).unwrap();
        }
        let object = TypeDesc::reference("Object");
        assert_eq!(pool.lookup(&object, MatchMode::Exact).len(), 0);
        assert_eq!(pool.lookup(&object, MatchMode::Assignable).len(), 2);
    }

    #[test]
    fn test_favor_shorter_prefers_short_and_fresh() {
        let mut pool = ComponentPool::new(Arc::new(ExactTypes), usize::MAX, true).unwrap();
        let seqs = counters(10);
        for seq in &seqs {
            pool.add(seq.clone()).unwrap();
        }
        let mut rng = RandomSource::new(4);
        let mut shortest = 0;
        for _ in 0..2_000 {
            let picked = pool.select(&counter_type(), MatchMode::Exact, &mut rng).unwrap().unwrap();
            if picked.len() == 1 {
                shortest += 1;
            }
        }
        // Usage damping keeps every component in play.
        assert!(shortest > 0 && shortest < 2_000);
        assert!(pool.select(&TypeDesc::reference("Nope"), MatchMode::Exact, &mut rng).unwrap().is_none());
    }

    // --- Engine Step Tests ---

    #[test]
    fn test_first_constructor_step_is_accepted_once() {
        let catalog = Catalog::new(vec![Operation::constructor(
            &counter_type(),
            vec![],
            |_: &[Value]| -> Result<Value, ApplyError> { Ok(Value::object("Counter", 0i64)) },
        )])
        .unwrap();
        let sink = MemorySink::new();
        let mut engine = GenerationEngine::new(catalog, GenConfig::default())
            .unwrap()
            .with_sink(Box::new(sink.clone()));
        assert_eq!(engine.step().unwrap(), StepResult::Executed(Classification::Regression));
        assert_eq!(engine.stop_reason(), Some(StopReason::NoOperations));
        assert_eq!(sink.codes(), vec!["Counter v0 = Counter();".to_string()]);
        assert_eq!(engine.pool().size(), 1);
    }

    #[test]
    fn test_receiver_without_component_is_skipped() {
        let catalog = Catalog::new(vec![Operation::method(
            &counter_type(),
            "value",
            vec![],
            TypeDesc::int(),
            |_: &[Value]| -> Result<Value, ApplyError> { Ok(Value::Int(0)) },
        )])
        .unwrap();
        let mut engine = GenerationEngine::new(catalog, GenConfig::default()).unwrap();
        assert_eq!(engine.step().unwrap(), StepResult::Skipped);
        let report = engine.report(StopReason::InputLimit, std::time::Duration::ZERO);
        assert_eq!(report.discarded.input_selection_failure, 1);
        assert_eq!(report.generated, 0);
    }

    // --- Input Selection Tests ---

    fn holder_type() -> TypeDesc {
        TypeDesc::reference("Holder")
    }

    fn holder_seed() -> Sequence {
        let new = Arc::new(Operation::constructor(
            &holder_type(),
            vec![],
            |_: &[Value]| -> Result<Value, ApplyError> { Ok(Value::object("Holder", ())) },
        ));
        Sequence::empty().extend(new, &[]).unwrap()
    }

    fn counter_seed() -> Sequence {
        let new = counter_catalog().unwrap().get("Counter.new").unwrap();
        Sequence::empty().extend(new, &[]).unwrap()
    }

    /// `Holder.take(Counter)` and nothing that makes a Counter.
    fn take_engine(config: GenConfig, seeds: Vec<Sequence>) -> (GenerationEngine, MemorySink) {
        let catalog = Catalog::new(vec![Operation::method(
            &holder_type(),
            "take",
            vec![counter_type()],
            TypeDesc::void(),
            |_: &[Value]| -> Result<Value, ApplyError> { Ok(Value::Unit) },
        )])
        .unwrap();
        let sink = MemorySink::new();
        let engine = GenerationEngine::new(catalog, config)
            .unwrap()
            .with_sink(Box::new(sink.clone()))
            .with_seeds(seeds)
            .unwrap();
        (engine, sink)
    }

    #[test]
    fn test_forbid_null_abandons_unsatisfiable_input() {
        let config = GenConfig {
            forbid_null: true,
            ..GenConfig::default()
        };
        let (mut engine, sink) = take_engine(config, vec![holder_seed()]);
        assert_eq!(engine.step().unwrap(), StepResult::Skipped);
        let report = engine.report(StopReason::InputLimit, std::time::Duration::ZERO);
        assert_eq!(report.discarded.input_selection_failure, 1);
        assert_eq!(report.generated, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_missing_component_falls_back_to_null() {
        let config = GenConfig {
            null_ratio: 0.0,
            ..GenConfig::default()
        };
        let (mut engine, sink) = take_engine(config, vec![holder_seed()]);
        assert_eq!(engine.step().unwrap(), StepResult::Executed(Classification::Regression));
        assert_eq!(
            sink.codes(),
            vec!["Holder v0 = Holder();\nCounter v1 = null;\nv0.take(v1);".to_string()]
        );
    }

    #[test]
    fn test_null_ratio_one_always_passes_null() {
        let config = GenConfig {
            null_ratio: 1.0,
            ..GenConfig::default()
        };
        let (mut engine, sink) = take_engine(config, vec![holder_seed(), counter_seed()]);
        assert_eq!(engine.step().unwrap(), StepResult::Executed(Classification::Regression));
        assert!(sink.codes()[0].contains("Counter v1 = null;"), "{:?}", sink.codes());
    }

    #[test]
    fn test_alias_ratio_one_reuses_receiver_variable() {
        let absorb = mixed_catalog().unwrap().get("Counter.absorb").unwrap();
        let catalog = Catalog::new(vec![Operation::clone(&absorb)]).unwrap();
        let config = GenConfig {
            alias_ratio: 1.0,
            null_ratio: 0.0,
            ..GenConfig::default()
        };
        let sink = MemorySink::new();
        let mut engine = GenerationEngine::new(catalog, config)
            .unwrap()
            .with_sink(Box::new(sink.clone()))
            .with_seeds(vec![counter_seed()])
            .unwrap();
        assert_eq!(engine.step().unwrap(), StepResult::Executed(Classification::Regression));
        assert_eq!(sink.codes(), vec!["Counter v0 = Counter();\nv0.absorb(v0);".to_string()]);
    }

    #[test]
    fn test_runtime_null_position_is_not_offered_as_variable() {
        let holder = holder_type();
        let empty = Arc::new(Operation::method(
            &holder,
            "empty",
            vec![],
            holder.clone(),
            |_: &[Value]| -> Result<Value, ApplyError> { Ok(Value::Null) },
        ));
        let seq = holder_seed().extend(empty, &[0]).unwrap().with_inactive([1]);
        assert!(seq.is_active(0) && !seq.is_active(1));
        assert_eq!(seq.produced_types().into_iter().collect::<Vec<_>>(), vec![holder]);

        // Flags survive the record round trip.
        let record = seq.to_record();
        assert_eq!(record.inactive, vec![1]);
        let json = serde_json::to_string(&record).unwrap();
        let back: SequenceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.inactive, vec![1]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GenConfig {
            alias_ratio: -0.1,
            ..GenConfig::default()
        };
        assert!(matches!(
            GenerationEngine::new(Catalog::default(), config),
            Err(EngineError::Config(_))
        ));
    }
}
