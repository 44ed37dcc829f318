use apcf::counter::{CounterTable, INVALID_COUNTER};
use apcf::{Action, BdAddr, ConditionType};

fn addr(last: u8) -> BdAddr {
    BdAddr([last, 1, 2, 3, 4, 5])
}

#[test]
fn allocate_up_to_capacity() {
    let mut table = CounterTable::new(2);
    assert_eq!(table.capacity(), 2);

    assert_eq!(table.allocate(addr(1)), Some(1));
    assert_eq!(table.allocate(addr(2)), Some(2));
    assert_eq!(table.allocate(addr(3)), None);
    // already bound
    assert_eq!(table.allocate(addr(1)), Some(1));
    assert_eq!(table.in_use(), 2);
}

#[test]
fn empty_table_counts_nothing() {
    let mut table = CounterTable::new(0);
    assert_eq!(table.capacity(), 0);
    assert_eq!(table.find(None), None);
    assert_eq!(table.claim_generic(), None);
    assert_eq!(
        table.update(Action::Add, ConditionType::LocalName, None, 3),
        INVALID_COUNTER
    );
}

#[test]
fn zero_available_changes_nothing() {
    let mut table = CounterTable::new(4);
    assert_eq!(table.update(Action::Add, ConditionType::LocalName, None, 0), 0);
    assert_eq!(table.counter(None, ConditionType::LocalName), Some(0));

    assert_eq!(table.update(Action::Add, ConditionType::LocalName, None, 1), 1);
    assert_eq!(table.update(Action::Delete, ConditionType::LocalName, None, 0), 1);
    assert_eq!(table.update(Action::Delete, ConditionType::LocalName, None, 1), 0);
    // never below zero
    assert_eq!(table.update(Action::Delete, ConditionType::LocalName, None, 1), 0);
}

#[test]
fn per_device_conditions_allocate_a_slot() {
    let mut table = CounterTable::new(4);
    let a = addr(1);

    assert_eq!(table.update(Action::Add, ConditionType::ServiceUuid, Some(&a), 2), 1);
    assert_eq!(table.find(Some(&a)), Some(1));
    assert_eq!(table.counter(Some(&a), ConditionType::ServiceUuid), Some(1));
    assert_eq!(table.counter(None, ConditionType::ServiceUuid), Some(0));

    // a delete for an unknown device does not allocate
    let b = addr(2);
    assert_eq!(
        table.update(Action::Delete, ConditionType::ServiceUuid, Some(&b), 1),
        INVALID_COUNTER
    );
    assert_eq!(table.find(Some(&b)), None);
}

#[test]
fn always_generic_conditions_ignore_the_target() {
    let mut table = CounterTable::new(4);
    let a = addr(1);

    for condition in [
        ConditionType::Address,
        ConditionType::ManufacturerData,
        ConditionType::LocalName,
        ConditionType::ServiceDataPattern,
    ] {
        assert_eq!(table.update(Action::Add, condition, Some(&a), 1), 1);
        assert_eq!(table.counter(None, condition), Some(1));
    }
    assert_eq!(table.find(Some(&a)), None);
}

#[test]
fn generic_and_address_release_are_independent() {
    let mut table = CounterTable::new(4);
    let a = addr(1);
    table.update(Action::Add, ConditionType::ServiceUuid, Some(&a), 1);
    table.update(Action::Add, ConditionType::ServiceUuid, None, 1);

    assert!(table.deallocate(None, ConditionType::All));
    assert_eq!(table.counter(None, ConditionType::ServiceUuid), Some(0));
    assert_eq!(table.counter(Some(&a), ConditionType::ServiceUuid), Some(1));

    table.update(Action::Add, ConditionType::ServiceUuid, None, 1);
    assert!(table.deallocate(None, ConditionType::ServiceUuid));
    assert_eq!(table.find(Some(&a)), None);
    assert_eq!(table.counter(None, ConditionType::ServiceUuid), Some(1));
}

#[test]
fn address_delete_releases_the_device_slot() {
    let mut table = CounterTable::new(4);
    let a = addr(1);
    table.update(Action::Add, ConditionType::SolicitedUuid, Some(&a), 1);
    table.update(Action::Add, ConditionType::Address, None, 1);

    assert_eq!(
        table.update(Action::Delete, ConditionType::Address, Some(&a), 1),
        INVALID_COUNTER
    );
    assert_eq!(table.find(Some(&a)), None);
    assert_eq!(table.counter(None, ConditionType::Address), Some(1));
}

#[test]
fn clear_all_resets_generic_slot() {
    let mut table = CounterTable::new(4);
    table.claim_generic();
    table.update(Action::Add, ConditionType::LocalName, None, 1);

    table.update(Action::Clear, ConditionType::All, None, 1);
    let generic = table.slot(0).unwrap();
    assert!(!generic.in_use);
    assert_eq!(generic.counter(ConditionType::LocalName), Some(0));
}

#[test]
fn release_all() {
    let mut table = CounterTable::new(2);
    table.claim_generic();
    table.allocate(addr(1));
    table.allocate(addr(2));
    table.release_all();
    assert_eq!(table.in_use(), 0);
    assert!(!table.slot(0).unwrap().in_use);
}

#[test]
fn delete_gives_back_a_counted_condition() {
    let mut table = CounterTable::new(4);
    let a = addr(1);
    assert_eq!(table.update(Action::Add, ConditionType::ServiceUuid, Some(&a), 3), 1);
    assert_eq!(table.update(Action::Add, ConditionType::ServiceUuid, Some(&a), 2), 2);
    assert_eq!(table.update(Action::Clear, ConditionType::ServiceUuid, Some(&a), 3), 1);
    assert_eq!(table.counter(Some(&a), ConditionType::ServiceUuid), Some(1));
    // the slot stays bound while other conditions remain
    assert_eq!(table.find(Some(&a)), Some(1));
}
