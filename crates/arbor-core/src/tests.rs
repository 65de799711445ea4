#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::schemas::{self, array, derived, extend, map, object, scalar, set, synced};
    use crate::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn sum_tree(sched: &ManualScheduler) -> Root {
        create_root(
            object()
                .member("a", scalar(3))
                .member("b", scalar(4))
                .member("sum", sum()),
            sched.clone(),
        )
    }

    fn sum() -> schemas::Derived {
        derived(|v| {
            let a = v.number_field("a").unwrap_or(0.0);
            let b = v.number_field("b").unwrap_or(0.0);
            Ok(Value::from(a + b))
        })
    }

    type Seen = Rc<RefCell<Vec<(Value, Option<Value>)>>>;

    fn record(entry: &Entry) -> (Seen, Dispose) {
        let seen: Seen = Rc::default();
        let sink = seen.clone();
        let sub = entry
            .subscribe(move |v, prev, _| sink.borrow_mut().push((v.clone(), prev.cloned())))
            .unwrap();
        (seen, sub)
    }

    /// Recomputes forever: every compute schedules another one.
    struct Restless {
        hits: Rc<Cell<u32>>,
    }

    impl Schema for Restless {
        fn kind(&self) -> Kind {
            Kind::Narrowing
        }

        fn name(&self) -> &'static str {
            "restless"
        }

        fn compute(&self, entry: &Entry, _current: Option<&Value>) -> Result<Outcome> {
            self.hits.set(self.hits.get() + 1);
            entry.invalidate()?;
            Ok(Outcome::Value(Value::from(self.hits.get())))
        }

        fn change(&self, _: &Entry, _: Value, _: Option<&Value>) -> Result<Outcome> {
            Ok(Outcome::Keep)
        }
    }

    struct SelfReading;

    impl Schema for SelfReading {
        fn kind(&self) -> Kind {
            Kind::Narrowing
        }

        fn name(&self) -> &'static str {
            "self-reading"
        }

        fn compute(&self, entry: &Entry, _current: Option<&Value>) -> Result<Outcome> {
            Ok(Outcome::Value(entry.get()?))
        }

        fn change(&self, _: &Entry, _: Value, _: Option<&Value>) -> Result<Outcome> {
            Ok(Outcome::Keep)
        }
    }

    /// Never produces a value of its own.
    struct Idle;

    impl Schema for Idle {
        fn kind(&self) -> Kind {
            Kind::Narrowing
        }

        fn name(&self) -> &'static str {
            "idle"
        }

        fn compute(&self, _: &Entry, _current: Option<&Value>) -> Result<Outcome> {
            Ok(Outcome::Keep)
        }

        fn change(&self, _: &Entry, _: Value, _: Option<&Value>) -> Result<Outcome> {
            Ok(Outcome::Keep)
        }
    }

    #[test]
    fn test_scalar_notifies_once() {
        init_logs();
        let sched = ManualScheduler::new();
        let root = create_root(scalar(0), sched.clone());
        assert_eq!(root.get().unwrap(), Value::from(0));
        let (seen, _sub) = record(&root);

        root.set(5).unwrap();
        // Nothing runs before the drain.
        assert!(seen.borrow().is_empty());
        sched.run_until_idle().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Value::from(5), Some(Value::from(0)))]
        );

        root.set(5).unwrap();
        assert_eq!(sched.pending(), 0);
        sched.run_until_idle().unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_repeated_nan_write_is_silent() {
        let sched = ManualScheduler::new();
        let root = create_root(scalar(0.0), sched.clone());
        root.get().unwrap();
        let (seen, _sub) = record(&root);

        root.set(f64::NAN).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(seen.borrow().len(), 1);

        root.set(f64::NAN).unwrap();
        assert_eq!(sched.pending(), 0);
        sched.run_until_idle().unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_scalar_round_trip_within_batch_is_silent() {
        let sched = ManualScheduler::new();
        let root = create_root(scalar("idle"), sched.clone());
        root.get().unwrap();
        let (seen, _sub) = record(&root);

        root.set("busy").unwrap();
        root.set("idle").unwrap();
        sched.run_until_idle().unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_scalar_rejects_other_types() {
        let sched = ManualScheduler::new();
        let root = create_root(object().member("n", scalar(1)), sched.clone());
        let n = root.member("n").unwrap();
        let err = n.set("one").unwrap_err();
        assert_eq!(
            err,
            ArborError::TypeMismatch {
                path: "n".into(),
                expected: "number",
                found: "text"
            }
        );
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_scalar_transform_and_comparator() {
        let sched = ManualScheduler::new();
        let root = create_root(
            scalar("")
                .with_transform(|v| Ok(Value::text(v.as_text().unwrap_or("").trim())))
                .with_eq(|a, b| {
                    a.as_text().map(str::to_lowercase) == b.as_text().map(str::to_lowercase)
                }),
            sched.clone(),
        );
        root.set("  Hello ").unwrap();
        assert_eq!(root.get().unwrap(), Value::from("Hello"));
        root.set("HELLO").unwrap();
        assert_eq!(root.get().unwrap(), Value::from("Hello"));
    }

    #[test]
    fn test_scalar_validation_refuses_writes() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object().member(
                "age",
                scalar(0).with_validate(|v| match v.as_number() {
                    Some(n) if n < 0.0 => Err(format!("{n} is negative")),
                    _ => Ok(()),
                }),
            ),
            sched.clone(),
        );
        let age = root.member("age").unwrap();
        assert_eq!(
            age.set(-3).unwrap_err(),
            ArborError::Rejected {
                path: "age".into(),
                reason: "-3 is negative".into()
            }
        );
        assert_eq!(sched.pending(), 0);
        age.set(30).unwrap();
        assert_eq!(age.get().unwrap(), Value::from(30));
    }

    #[test]
    fn test_widening_partial_set_rebuilds_from_children() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object()
                .member("a", scalar(1))
                .member("b", scalar(2))
                .member("inner", object().member("d", scalar("x"))),
            sched.clone(),
        );
        assert_eq!(root.get().unwrap().number_field("a"), Some(1.0));

        root.set(Value::object([("a", 10)])).unwrap();
        let expected = Value::object([
            ("a", Value::from(10)),
            ("b", Value::from(2)),
            ("inner", Value::object([("d", "x")])),
        ]);
        assert_eq!(root.get().unwrap(), expected);

        root.set(Value::object([("inner", Value::object([("d", "y")]))]))
            .unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(
            root.get().unwrap().field("inner"),
            Some(Value::object([("d", "y")]))
        );
        assert_eq!(root.get().unwrap().number_field("a"), Some(10.0));
    }

    #[test]
    fn test_object_rejects_unknown_fields_before_writing() {
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        let err = root
            .set(Value::object([("a", Value::from(9)), ("zzz", Value::from(1))]))
            .unwrap_err();
        assert_eq!(
            err,
            ArborError::InvalidMember {
                path: "$".into(),
                key: "zzz".into()
            }
        );
        assert_eq!(root.member("a").unwrap().get().unwrap(), Value::from(3));
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_derived_sum_follows_parent() {
        init_logs();
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        let a = root.member("a").unwrap();
        let b = root.member("b").unwrap();
        let sum = root.member("sum").unwrap();

        assert_eq!(sum.get().unwrap(), Value::from(7));

        a.set(5).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(sum.get().unwrap(), Value::from(9));

        b.set(2).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(sum.get().unwrap(), Value::from(7));

        sum.set(10).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(sum.get().unwrap(), Value::from(7));
    }

    #[test]
    fn test_derived_get_pulls_pending_recompute() {
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        let sum = root.member("sum").unwrap();
        assert_eq!(sum.get().unwrap(), Value::from(7));

        root.member("a").unwrap().set(10).unwrap();
        // Fresh before the drain.
        assert_eq!(sum.get().unwrap(), Value::from(14));
        root.member("b").unwrap().set(0).unwrap();
        assert_eq!(sum.get().unwrap(), Value::from(10));
        sched.run_until_idle().unwrap();

        let (seen, _sub) = record(&sum);
        root.member("b").unwrap().set(1).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Value::from(11), Some(Value::from(10)))]
        );
    }

    #[test]
    fn test_listeners_never_see_stale_derived_values() {
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        let a = root.member("a").unwrap();
        let sum = root.member("sum").unwrap();
        sum.get().unwrap();

        let observed = Rc::new(RefCell::new(Vec::new()));
        let sink = observed.clone();
        let _sub = a
            .subscribe(move |_, _, entry| {
                let sum = entry
                    .parent()
                    .unwrap()
                    .unwrap()
                    .member("sum")
                    .unwrap()
                    .get()
                    .unwrap();
                sink.borrow_mut().push(sum);
            })
            .unwrap();

        a.set(5).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(*observed.borrow(), vec![Value::from(9)]);
    }

    #[test]
    fn test_derived_write_through() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object().member("celsius", scalar(0.0)).member(
                "fahrenheit",
                derived(|v| {
                    let c = v.number_field("celsius").unwrap_or(0.0);
                    Ok(Value::from(c * 9.0 / 5.0 + 32.0))
                })
                .with_write(|f| {
                    let f = f.as_number().unwrap_or(32.0);
                    Ok(Value::object([("celsius", (f - 32.0) * 5.0 / 9.0)]))
                }),
            ),
            sched.clone(),
        );
        let fahrenheit = root.member("fahrenheit").unwrap();
        assert_eq!(fahrenheit.get().unwrap(), Value::from(32));

        fahrenheit.set(212).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(fahrenheit.get().unwrap(), Value::from(212));
        assert_eq!(
            root.member("celsius").unwrap().get().unwrap(),
            Value::from(100)
        );
    }

    #[test]
    fn test_derived_members_chain() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object().member("n", scalar(2)).member(
                "double",
                derived(|v| Ok(Value::from(v.number_field("n").unwrap_or(0.0) * 2.0)))
                    .with_member(
                        "plus_one",
                        derived(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) + 1.0))),
                    ),
            ),
            sched.clone(),
        );
        let plus_one = root
            .member("double")
            .unwrap()
            .member("plus_one")
            .unwrap();
        assert_eq!(plus_one.get().unwrap(), Value::from(5));

        let (seen, _sub) = record(&plus_one);
        root.member("n").unwrap().set(10).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Value::from(21), Some(Value::from(5)))]
        );
    }

    #[test]
    fn test_aggregate_excludes_derived_by_default() {
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        let value = root.get().unwrap();
        assert_eq!(value.field("sum"), None);
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn test_aggregate_including_derived_tracks_them() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object()
                .member("a", scalar(3))
                .member("b", scalar(4))
                .member("sum", sum())
                .including_derived(),
            sched.clone(),
        );
        assert_eq!(root.get().unwrap().number_field("sum"), Some(7.0));

        let (seen, _sub) = record(&root);
        root.member("a").unwrap().set(5).unwrap();
        sched.run_until_idle().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.number_field("sum"), Some(9.0));
        assert_eq!(
            seen[0].1.as_ref().and_then(|v| v.number_field("sum")),
            Some(7.0)
        );
    }

    #[test]
    fn test_gc_replaces_identity() {
        init_logs();
        let sched = ManualScheduler::new();
        let root = create_root(map(scalar(0)), sched.clone());
        let x = root.member("x").unwrap();
        assert_eq!(root.member("x").unwrap(), x);

        x.set(5).unwrap();
        sched.run_until_idle().unwrap();
        assert!(x.is_alive());

        x.unset().unwrap();
        sched.run_until_idle().unwrap();
        assert!(!x.is_alive());
        assert_eq!(x.get().unwrap_err(), ArborError::Destroyed);
        assert_eq!(x.set(1).unwrap_err(), ArborError::Destroyed);
        assert!(x.downgrade().upgrade().is_err());

        let again = root.member("x").unwrap();
        assert_ne!(again, x);
        assert_eq!(again.get().unwrap(), Value::from(0));
        assert_eq!(root.stats().destroyed, 1);
    }

    #[test]
    fn test_fixed_members_survive_gc() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object()
                .member("a", scalar(1))
                .member("inner", object().member("b", scalar("x"))),
            sched.clone(),
        );
        let a = root.member("a").unwrap();
        let b = root.member("inner").unwrap().member("b").unwrap();
        root.set(Value::object([
            ("a", Value::from(2)),
            ("inner", Value::object([("b", "y")])),
        ]))
        .unwrap();
        sched.run_until_idle().unwrap();
        assert!(root.has_value().unwrap());

        root.unset().unwrap();
        sched.run_until_idle().unwrap();
        assert!(!root.has_value().unwrap());
        assert_eq!(root.member("a").unwrap(), a);
        assert_eq!(b.get().unwrap(), Value::from("x"));
        assert_eq!(root.get().unwrap().number_field("a"), Some(1.0));
    }

    #[test]
    fn test_unsubscribe_lets_entry_be_collected() {
        let sched = ManualScheduler::new();
        let root = create_root(map(scalar(0)), sched.clone());
        let x = root.member("x").unwrap();
        let (_seen, sub) = record(&x);
        assert_eq!(x.listener_count().unwrap(), 1);

        sched.run_until_idle().unwrap();
        assert!(x.is_alive());

        sub.run();
        sub.run();
        assert!(sub.is_spent());
        sched.run_until_idle().unwrap();
        assert!(!x.is_alive());
    }

    #[test]
    fn test_circular_value_is_rejected_up_front() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object()
                .member("name", scalar(""))
                .member("children", scalar(Value::Null)),
            sched.clone(),
        );
        let node = Value::object([("name", "root")]);
        let children = Value::empty_list();
        node.insert("children", children.clone()).unwrap();
        children.push(node.clone()).unwrap();

        let err = root.set(node).unwrap_err();
        assert_eq!(
            err,
            ArborError::CircularReference {
                path: "children[0]".into()
            }
        );
        assert_eq!(sched.pending(), 0);
        assert_eq!(
            root.member("name").unwrap().get().unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_stored_values_are_detached() {
        let sched = ManualScheduler::new();
        let root = create_root(scalar(Value::Null), sched.clone());
        let list = Value::list([1, 2]);
        root.set(list.clone()).unwrap();
        list.push(3).unwrap();
        assert_eq!(root.get().unwrap().len(), 2);

        let read = root.get().unwrap();
        read.push(4).unwrap();
        assert_eq!(root.get().unwrap().len(), 2);
    }

    #[test]
    fn test_runaway_recompute_is_stopped() {
        init_logs();
        let sched = ManualScheduler::new();
        let hits = Rc::new(Cell::new(0));
        let root = create_root(Restless { hits: hits.clone() }, sched.clone());
        assert_eq!(root.get().unwrap(), Value::from(1));

        let err = sched.run_until_idle().unwrap_err();
        assert_eq!(err, ArborError::PossibleInfiniteLoop { iterations: 3 });
        assert_eq!(root.stats().drains, 3);
        assert_eq!(hits.get(), 4);
        assert_eq!(root.manager().state(), ManagerState::Idle);
        assert_eq!(root.manager().pending(), (0, 0, 0));
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_runaway_limit_is_configurable() {
        let sched = ManualScheduler::new();
        let hits = Rc::new(Cell::new(0));
        let root = create_root_with(
            Restless { hits: hits.clone() },
            sched.clone(),
            EngineConfig::default().with_max_iterations(1),
        );
        root.get().unwrap();
        assert_eq!(
            sched.run_until_idle().unwrap_err(),
            ArborError::PossibleInfiniteLoop { iterations: 1 }
        );
        assert_eq!(root.stats().drains, 1);
        assert_eq!(root.config().max_iterations, 1);
    }

    #[test]
    fn test_listener_panic_is_contained() {
        init_logs();
        let sched = ManualScheduler::new();
        let root = create_root(scalar(0), sched.clone());
        let _bad = root
            .subscribe(|_, _, _| panic!("listener exploded"))
            .unwrap();
        let (seen, _good) = record(&root);

        root.set(1).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(seen.borrow().len(), 1);
        let stats = root.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.notified, 1);
    }

    #[test]
    fn test_failed_recompute_spares_its_siblings() {
        init_logs();
        let sched = ManualScheduler::new();
        let root = create_root(
            object()
                .member("a", scalar(1))
                .member(
                    "broken",
                    derived(|v| match v.number_field("a") {
                        Some(a) if a > 1.0 => Err(ArborError::Rejected {
                            path: "broken".into(),
                            reason: "too large".into(),
                        }),
                        _ => Ok(Value::from(0)),
                    }),
                )
                .member(
                    "tenfold",
                    derived(|v| Ok(Value::from(v.number_field("a").unwrap_or(0.0) * 10.0))),
                ),
            sched.clone(),
        );
        let broken = root.member("broken").unwrap();
        let tenfold = root.member("tenfold").unwrap();
        assert_eq!(broken.get().unwrap(), Value::from(0));
        assert_eq!(tenfold.get().unwrap(), Value::from(10));
        let (_broken_seen, _broken_sub) = record(&broken);
        let (seen, _sub) = record(&tenfold);

        root.member("a").unwrap().set(2).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Value::from(20), Some(Value::from(10)))]
        );
        assert_eq!(root.stats().failures, 1);
        assert_eq!(root.manager().state(), ManagerState::Idle);
    }

    #[test]
    fn test_compute_must_produce_a_first_value() {
        let sched = ManualScheduler::new();
        let root = create_root(object().member("idle", Idle), sched.clone());
        let idle = root.member("idle").unwrap();
        assert_eq!(
            idle.get().unwrap_err(),
            ArborError::KeepWithoutValue {
                path: "idle".into()
            }
        );

        // Observed but never computed: the recompute phase reports it.
        let (seen, _sub) = record(&idle);
        idle.invalidate().unwrap();
        sched.run_until_idle().unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(root.stats().failures, 1);
    }

    #[test]
    fn test_recursive_compute_is_reported() {
        let sched = ManualScheduler::new();
        let root = create_root(SelfReading, sched.clone());
        let err = root.get().unwrap_err();
        assert_eq!(err, ArborError::RecursiveCompute { path: "$".into() });
        // The guard is released after the failure.
        assert_eq!(root.get().unwrap_err(), err);
    }

    #[test]
    fn test_invalid_members() {
        let sched = ManualScheduler::new();
        let root = create_root(object().member("n", scalar(0)), sched.clone());
        assert_eq!(
            root.member("missing").unwrap_err(),
            ArborError::InvalidMember {
                path: "$".into(),
                key: "missing".into()
            }
        );
        let n = root.member("n").unwrap();
        assert_eq!(
            n.member(0).unwrap_err(),
            ArborError::InvalidMember {
                path: "n".into(),
                key: "0".into()
            }
        );
    }

    #[test]
    fn test_defaults() {
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        assert_eq!(
            root.member("sum").unwrap().default_value().unwrap_err(),
            ArborError::NotImplemented("compute_default")
        );
        assert_eq!(
            root.default_value().unwrap(),
            Value::object([("a", 3), ("b", 4)])
        );
        assert_eq!(root.kind().unwrap(), Kind::Widening);
        assert_eq!(root.member("sum").unwrap().kind().unwrap(), Kind::Narrowing);
    }

    #[test]
    fn test_array_mutations() {
        let sched = ManualScheduler::new();
        let root = create_root(array(scalar(0)), sched.clone());
        assert_eq!(root.mutate("push", &[Value::from(1)]).unwrap(), Value::from(1));
        assert_eq!(root.mutate("push", &[Value::from(2)]).unwrap(), Value::from(2));
        assert_eq!(root.get().unwrap(), Value::list([1, 2]));

        assert_eq!(root.mutate("pop", &[]).unwrap(), Value::from(2));
        assert_eq!(root.get().unwrap(), Value::list([1]));
        sched.run_until_idle().unwrap();
        assert_eq!(root.children().unwrap().len(), 2);

        root.set(Value::list([7, 8, 9])).unwrap();
        assert_eq!(root.member("length").unwrap().get().unwrap(), Value::from(3));
        root.set(Value::list([5])).unwrap();
        assert_eq!(root.get().unwrap(), Value::list([5]));

        root.mutate("clear", &[]).unwrap();
        assert_eq!(root.get().unwrap(), Value::empty_list());
        assert_eq!(root.mutate("pop", &[]).unwrap(), Value::Null);
        assert_eq!(
            root.mutate("push", &[]).unwrap_err(),
            ArborError::MissingArgument {
                mutation: "push",
                index: 0
            }
        );
        assert!(!root.mutations().unwrap().contains("splice"));
    }

    #[test]
    fn test_array_length_must_be_a_whole_count() {
        let sched = ManualScheduler::new();
        let root = create_root(array(scalar(0)), sched.clone());
        root.set(Value::list([1, 2])).unwrap();
        let length = root.member("length").unwrap();

        for bad in [Value::from(1e20), Value::from(2.5), Value::from(-1)] {
            assert!(matches!(
                length.set(bad).unwrap_err(),
                ArborError::Rejected { ref path, .. } if path == "length"
            ));
        }
        assert_eq!(length.get().unwrap(), Value::from(2));
        assert_eq!(root.get().unwrap(), Value::list([1, 2]));
    }

    #[test]
    fn test_read_only_map_slot_is_collected() {
        let sched = ManualScheduler::new();
        let root = create_root(map(scalar(0)), sched.clone());
        let absent = root.member("absent").unwrap();
        assert_eq!(absent.get().unwrap(), Value::from(0));
        assert_eq!(root.mutate("has", &["absent".into()]).unwrap(), Value::Bool(false));

        sched.run_until_idle().unwrap();
        assert!(!absent.is_alive());
        assert!(root.children().unwrap().is_empty());
        assert_eq!(root.stats().destroyed, 1);
    }

    #[test]
    fn test_map_mutations() {
        let sched = ManualScheduler::new();
        let root = create_root(map(scalar(0)), sched.clone());
        root.set(Value::object([("x", 1), ("y", 2)])).unwrap();
        assert_eq!(root.get().unwrap(), Value::object([("x", 1), ("y", 2)]));

        assert_eq!(root.mutate("has", &["x".into()]).unwrap(), Value::Bool(true));
        assert_eq!(root.mutate("delete", &["x".into()]).unwrap(), Value::Bool(true));
        assert_eq!(root.mutate("delete", &["x".into()]).unwrap(), Value::Bool(false));
        assert_eq!(root.mutate("has", &["z".into()]).unwrap(), Value::Bool(false));
        assert_eq!(root.get().unwrap(), Value::object([("y", 2)]));
        assert_eq!(root.mutate("keys", &[]).unwrap(), Value::list(["y"]));

        root.mutate("clear", &[]).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(root.get().unwrap(), Value::empty_object());
        assert!(root.children().unwrap().is_empty());

        assert!(matches!(
            root.set(3).unwrap_err(),
            ArborError::TypeMismatch { expected: "object", .. }
        ));
    }

    #[test]
    fn test_set_mutations() {
        let sched = ManualScheduler::new();
        let root = create_root(set(), sched.clone());
        root.set(Value::list(["a", "b"])).unwrap();
        assert_eq!(root.get().unwrap(), Value::list(["a", "b"]));

        assert_eq!(root.mutate("add", &["c".into()]).unwrap(), Value::Bool(true));
        assert_eq!(root.mutate("add", &["a".into()]).unwrap(), Value::Bool(false));
        assert_eq!(root.mutate("delete", &["b".into()]).unwrap(), Value::Bool(true));
        assert_eq!(root.get().unwrap(), Value::list(["a", "c"]));

        root.mutate("add", &[Value::from(1)]).unwrap();
        assert_eq!(root.mutate("has", &["1".into()]).unwrap(), Value::Bool(true));
        assert!(matches!(
            root.mutate("add", &[Value::Bool(true)]).unwrap_err(),
            ArborError::TypeMismatch { .. }
        ));

        root.mutate("clear", &[]).unwrap();
        sched.run_until_idle().unwrap();
        assert_eq!(root.get().unwrap(), Value::empty_list());
    }

    #[test]
    fn test_extended_schema() {
        let sched = ManualScheduler::new();
        let counter = extend(object().member("count", scalar(0)))
            .named("counter")
            .member(
                "label",
                derived(|v| Ok(Value::from(format!("#{}", v.field("count").unwrap_or_default())))),
            )
            .mutation("increment", |entry, _| {
                let count = entry.member("count")?;
                let next = count.get()?.as_number().unwrap_or(0.0) + 1.0;
                count.set(next)?;
                Ok(Value::from(next))
            });
        let root = create_root(counter, sched.clone());

        root.mutate("increment", &[]).unwrap();
        assert_eq!(root.mutate("increment", &[]).unwrap(), Value::from(2));
        sched.run_until_idle().unwrap();
        assert_eq!(root.get().unwrap(), Value::object([("count", 2)]));
        assert_eq!(
            root.member("label").unwrap().get().unwrap(),
            Value::from("#2")
        );
        assert_eq!(root.schema().unwrap().name(), "counter");
        assert_eq!(
            root.mutate("decrement", &[]).unwrap_err(),
            ArborError::UnknownMutation("decrement".into())
        );
    }

    #[test]
    fn test_synced_source() {
        let sched = ManualScheduler::new();
        let store = Rc::new(RefCell::new(Value::from(1)));
        let root = create_root(
            synced(
                {
                    let store = store.clone();
                    move || Ok(store.borrow().clone())
                },
                {
                    let store = store.clone();
                    move |v| {
                        *store.borrow_mut() = v;
                        Ok(())
                    }
                },
            ),
            sched.clone(),
        );
        assert_eq!(root.get().unwrap(), Value::from(1));
        let (seen, _sub) = record(&root);

        root.set(5).unwrap();
        assert_eq!(*store.borrow(), Value::from(5));
        sched.run_until_idle().unwrap();

        *store.borrow_mut() = Value::from(7);
        root.invalidate().unwrap();
        sched.run_until_idle().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (Value::from(5), Some(Value::from(1))),
                (Value::from(7), Some(Value::from(5))),
            ]
        );
    }

    #[test]
    fn test_destroyed_root() {
        let sched = ManualScheduler::new();
        let root = sum_tree(&sched);
        let a = root.member("a").unwrap();
        a.set(1).unwrap();
        assert_eq!(sched.pending(), 1);

        root.destroy();
        assert!(root.is_destroyed());
        assert_eq!(sched.pending(), 0);
        assert_eq!(a.get().unwrap_err(), ArborError::Destroyed);
        assert_eq!(a.set(2).unwrap_err(), ArborError::Destroyed);
        assert_eq!(root.member("b").unwrap_err(), ArborError::Destroyed);
        assert_eq!(a.path_string(), "<destroyed>");
    }

    #[test]
    fn test_introspection() {
        let sched = ManualScheduler::new();
        let root = create_root(
            object().member("todos", array(object().member("done", scalar(false)))),
            sched.clone(),
        );
        let done = root
            .member("todos")
            .unwrap()
            .member(2)
            .unwrap()
            .member("done")
            .unwrap();
        assert_eq!(done.path_string(), "todos[2].done");
        assert_eq!(done.key().unwrap(), Some(Key::from("done")));
        assert_eq!(done.peek().unwrap(), None);
        assert_eq!(done.get().unwrap(), Value::Bool(false));
        assert_eq!(done.peek().unwrap(), Some(Value::Bool(false)));
        assert_eq!(format!("{done:?}"), "Entry(todos[2].done)");
        assert_eq!(root.parent().unwrap(), None);
        assert!(root.is_empty().unwrap());
    }
}
