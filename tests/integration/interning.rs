use crate::*;

/// A specification repeated across many items crosses the wire as one entry
/// and resolves to one shared instance.
#[test]
fn repeated_specs_resolve_to_one_instance() {
    init_tracing();
    let directory = JobDirectory::new();

    // Twenty PV items against the same position all read the same market
    // value specification.
    let mut items = vec![market_item("Pos~1", 100.0, ExecutionLogMode::None)];
    for _ in 0..20 {
        items.push(pv_item("Pos~1", 0.97, ExecutionLogMode::None));
    }
    let sent = job(1, items);
    let received = transmit_job(&sent, &directory);

    let first = &received.items[1].inputs[0];
    for item in &received.items[2..] {
        assert!(Arc::ptr_eq(first, &item.inputs[0]));
    }
    for window in received.items.windows(2) {
        assert!(Arc::ptr_eq(&window[0].target, &window[1].target));
    }
    // One market spec, one pv spec, however many items referenced them.
    assert_eq!(directory.values.len(), 2);
    assert_eq!(directory.targets.len(), 1);
}

/// Interning the same specification twice hands back the same identifier,
/// and the canonical instance in the directory is what resolve returns.
#[test]
fn intern_is_stable_across_repeats() {
    let directory = JobDirectory::new();
    let spec = market_spec("Pos~7");
    let id = directory.values.intern_arc(&spec);
    assert_eq!(directory.values.intern(&spec), id);
    assert_eq!(directory.values.lookup(&spec), Some(id));
    let canonical = directory.values.resolve(id).unwrap();
    assert!(Arc::ptr_eq(&canonical, &spec));
}

/// Missing-input specifications in the result travel as identifiers and come
/// back as the canonical instances, symmetric with job transmission.
#[test]
fn result_specs_take_the_same_path() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    // The PV item's input is never computed: the result carries it back as a
    // missing input.
    let sent = job(2, vec![pv_item("Pos~2", 0.99, ExecutionLogMode::None)]);
    let returned = round_trip(&node, &sent, &directory).unwrap();

    assert_eq!(returned.items.len(), 1);
    let missing = &returned.items[0].missing_inputs;
    assert_eq!(missing.len(), 1);
    assert_eq!(*missing[0], *market_spec("Pos~2"));
    // Reference-equal to the instance the job round trip produced.
    let canonical = directory
        .values
        .resolve(directory.values.lookup(&missing[0]).unwrap())
        .unwrap();
    assert!(Arc::ptr_eq(&missing[0], &canonical));
}

/// A directory that never issued an identifier must refuse it: stale maps
/// abort the job instead of fabricating specifications.
#[test]
fn stale_directory_is_a_protocol_error() {
    let coordinator_side = JobDirectory::new();
    let node_side = JobDirectory::new();

    let sent = job(3, vec![market_item("Pos~3", 101.5, ExecutionLogMode::None)]);
    let wire = job_to_wire(&sent, &coordinator_side);
    let err = job_from_wire(wire, &node_side).unwrap_err();
    assert!(matches!(
        err,
        quantgrid_core::wire::WireError::UnknownTargetIdentifier(_)
            | quantgrid_core::wire::WireError::UnknownValueIdentifier(_)
    ));
}
