//! Tests for NetworkService
//!
//! Every write goes through the hierarchy gate:
//! - a parent may never be the element itself or one of its descendants
//! - `network_lvl` is derived from the parent and never taken from input
//! - `debt_to_parent` is read-only through updates
//! - a rejected write leaves the stored network untouched

use std::collections::BTreeSet;
use std::sync::Arc;

use rstest::{fixture, rstest};

use salesnet::application::services::{
    ElementDraft, ElementFilter, ElementPatch, NetworkService, NewElement, NewProduct, ParentRef,
    ProductService,
};
use salesnet::application::ApplicationError;
use salesnet::domain::{
    Contact, CycleError, DomainError, ElementId, LevelPolicy, Money, NetworkElement, NetworkSnapshot,
    ProductId,
};
use salesnet::infrastructure::traits::NetworkStore;
use salesnet::infrastructure::MemoryStore;
use salesnet::util::testing;

fn contact(n: u64, country: &str, city: &str) -> Contact {
    Contact {
        name: format!("element {n}"),
        email: format!("mail{n}@mail.com"),
        country: country.to_string(),
        city: city.to_string(),
        street: "Volodarskogo".to_string(),
        building: n.to_string(),
    }
}

fn new_element(n: u64, parent: Option<ElementId>) -> NewElement {
    NewElement {
        contact: contact(n, "Russia", "Moscow"),
        parent,
        ..Default::default()
    }
}

fn service_with(policy: LevelPolicy) -> (NetworkService, Arc<MemoryStore>) {
    testing::init_test_setup();
    let store = Arc::new(MemoryStore::new());
    (NetworkService::new(store.clone(), policy), store)
}

fn snapshot(store: &MemoryStore) -> Option<NetworkSnapshot> {
    store.load().unwrap()
}

fn domain_err(err: ApplicationError) -> DomainError {
    match err {
        ApplicationError::Domain(e) => e,
        other => panic!("expected domain error, got {other:?}"),
    }
}

/// Chain #1 -> #2 -> #3 -> #4 plus a second root #5.
struct Network {
    service: NetworkService,
    store: Arc<MemoryStore>,
    chain: Vec<ElementId>,
    other_root: ElementId,
}

fn build_network(policy: LevelPolicy) -> Network {
    let (service, store) = service_with(policy);
    let mut chain = Vec::new();
    let mut parent = None;
    for n in 1..=4 {
        let element = service.create_element(new_element(n, parent)).unwrap();
        parent = Some(element.id);
        chain.push(element.id);
    }
    let other_root = service.create_element(new_element(5, None)).unwrap().id;
    Network {
        service,
        store,
        chain,
        other_root,
    }
}

#[fixture]
fn network() -> Network {
    build_network(LevelPolicy::Cascade)
}

// ============================================================
// create_element() tests
// ============================================================

#[test]
fn given_empty_store_when_creating_root_then_level_zero_and_no_debt() {
    let (service, store) = service_with(LevelPolicy::Cascade);

    let root = service.create_element(new_element(1, None)).unwrap();

    assert_eq!(root.id, ElementId(1));
    assert_eq!(root.network_lvl, 0);
    assert!(root.debt_to_parent.is_zero());
    assert!(root.is_root());
    assert_eq!(snapshot(&store).unwrap().elements.len(), 1);
}

#[rstest]
fn given_chain_when_created_then_each_level_is_parent_plus_one(network: Network) {
    for (depth, id) in network.chain.iter().enumerate() {
        let element = network.service.get_element(*id).unwrap();
        assert_eq!(element.network_lvl, depth as u32);
    }
}

#[test]
fn given_supplied_level_when_creating_then_level_is_derived() {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    let root = service.create_element(new_element(1, None)).unwrap();

    let child = service
        .create_element(NewElement {
            network_lvl: Some(42),
            ..new_element(2, Some(root.id))
        })
        .unwrap();

    assert_eq!(child.network_lvl, 1);
}

#[test]
fn given_opening_debt_when_creating_then_stored_with_cents() {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    let root = service.create_element(new_element(1, None)).unwrap();

    let child = service
        .create_element(NewElement {
            debt_to_parent: Some("150.1".parse().unwrap()),
            ..new_element(2, Some(root.id))
        })
        .unwrap();

    assert_eq!(child.debt_to_parent, Money::from_cents(15010));
    assert_eq!(child.debt_to_parent.to_string(), "150.10");
}

#[test]
fn given_negative_debt_when_creating_then_rejected_and_nothing_saved() {
    let (service, store) = service_with(LevelPolicy::Cascade);

    let err = service
        .create_element(NewElement {
            debt_to_parent: Some(Money::from_units(-1)),
            ..new_element(1, None)
        })
        .unwrap_err();

    assert!(matches!(
        domain_err(err),
        DomainError::InvalidField {
            field: "debt_to_parent",
            ..
        }
    ));
    assert!(snapshot(&store).is_none());
}

#[test]
fn given_unknown_parent_when_creating_then_not_found_and_nothing_saved() {
    let (service, store) = service_with(LevelPolicy::Cascade);

    let err = service
        .create_element(new_element(1, Some(ElementId(99))))
        .unwrap_err();

    assert_eq!(domain_err(err), DomainError::ElementNotFound(ElementId(99)));
    assert!(snapshot(&store).is_none());
}

#[rstest]
#[case("", "mail@mail.com", "name")]
#[case("element", "not-an-email", "email")]
fn given_invalid_contact_when_creating_then_field_rejected(
    #[case] name: &str,
    #[case] email: &str,
    #[case] expected_field: &str,
) {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    let mut new = new_element(1, None);
    new.contact.name = name.to_string();
    new.contact.email = email.to_string();

    let err = service.create_element(new).unwrap_err();

    match domain_err(err) {
        DomainError::InvalidField { field, .. } => assert_eq!(field, expected_field),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn given_unknown_product_when_creating_then_product_not_found() {
    let (service, _store) = service_with(LevelPolicy::Cascade);

    let err = service
        .create_element(NewElement {
            products: BTreeSet::from([ProductId(7)]),
            ..new_element(1, None)
        })
        .unwrap_err();

    assert_eq!(domain_err(err), DomainError::ProductNotFound(ProductId(7)));
}

#[test]
fn given_catalogue_product_when_creating_then_element_carries_it() {
    let (service, store) = service_with(LevelPolicy::Cascade);
    let products = ProductService::new(store.clone());
    let product = products
        .create_product(NewProduct {
            name: "product 1".into(),
            ..Default::default()
        })
        .unwrap();

    let element = service
        .create_element(NewElement {
            products: BTreeSet::from([product.id]),
            ..new_element(1, None)
        })
        .unwrap();

    assert!(element.products.contains(&product.id));
}

// ============================================================
// update_element() tests: cycles
// ============================================================

#[rstest]
fn given_element_when_setting_itself_as_parent_then_self_reference(network: Network) {
    let root = network.chain[0];
    let before = snapshot(&network.store);

    let err = network
        .service
        .update_element(
            root,
            ElementPatch {
                parent: Some(Some(root)),
                ..Default::default()
            },
        )
        .unwrap_err();

    assert_eq!(
        domain_err(err),
        DomainError::Cycle(CycleError::SelfReference(root))
    );
    assert_eq!(snapshot(&network.store), before);
}

#[rstest]
#[case(1)]
#[case(3)]
fn given_root_when_moving_under_descendant_then_cycle_and_store_unchanged(
    network: Network,
    #[case] descendant_index: usize,
) {
    let root = network.chain[0];
    let descendant = network.chain[descendant_index];
    let before = snapshot(&network.store);

    let err = network
        .service
        .update_element(
            root,
            ElementPatch {
                parent: Some(Some(descendant)),
                ..Default::default()
            },
        )
        .unwrap_err();

    let err = domain_err(err);
    assert!(err.is_cycle());
    assert!(err.to_string().contains("cycle detected"));
    assert_eq!(snapshot(&network.store), before);
}

// ============================================================
// update_element() tests: read-only fields and levels
// ============================================================

#[test]
fn given_debt_in_patch_when_updating_then_debt_unchanged() {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    let root = service.create_element(new_element(1, None)).unwrap();
    let child = service
        .create_element(NewElement {
            debt_to_parent: Some(Money::from_units(100)),
            ..new_element(2, Some(root.id))
        })
        .unwrap();

    let updated = service
        .update_element(
            child.id,
            ElementPatch {
                city: Some("Kazan".into()),
                debt_to_parent: Some(Money::from_units(123)),
                network_lvl: Some(9),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.contact.city, "Kazan");
    assert_eq!(updated.debt_to_parent.to_string(), "100.00");
    assert_eq!(updated.network_lvl, 1);
    assert_eq!(service.get_element(child.id).unwrap(), updated);
}

#[rstest]
fn given_unchanged_parent_when_updating_twice_then_level_stable(network: Network) {
    let id = network.chain[3];
    let patch = ElementPatch {
        parent: Some(Some(network.chain[2])),
        ..Default::default()
    };

    let first = network.service.update_element(id, patch.clone()).unwrap();
    let second = network.service.update_element(id, patch).unwrap();

    assert_eq!(first.network_lvl, 3);
    assert_eq!(second.network_lvl, 3);
}

#[rstest]
fn given_child_when_detaching_then_becomes_root(network: Network) {
    let id = network.chain[1];

    let updated = network
        .service
        .update_element(
            id,
            ElementPatch {
                parent: Some(None),
                ..Default::default()
            },
        )
        .unwrap();

    assert!(updated.is_root());
    assert_eq!(updated.network_lvl, 0);
    assert_eq!(network.service.get_element(network.chain[3]).unwrap().network_lvl, 2);
}

#[rstest]
fn given_cascade_policy_when_moving_subtree_then_descendants_relevelled(network: Network) {
    // #3 (lvl 2) moves under the second root: #3 -> lvl 1, #4 -> lvl 2
    let moved = network
        .service
        .update_element(
            network.chain[2],
            ElementPatch {
                parent: Some(Some(network.other_root)),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(moved.network_lvl, 1);
    assert_eq!(network.service.get_element(network.chain[3]).unwrap().network_lvl, 2);
    assert!(network.service.check(false).unwrap().drift.is_empty());
}

#[test]
fn given_drift_policy_when_moving_subtree_then_check_reports_and_fixes() {
    let network = build_network(LevelPolicy::Drift);
    network
        .service
        .update_element(
            network.chain[2],
            ElementPatch {
                parent: Some(Some(network.other_root)),
                ..Default::default()
            },
        )
        .unwrap();
    let stale = network.chain[3];
    assert_eq!(network.service.get_element(stale).unwrap().network_lvl, 3);

    let report = network.service.check(false).unwrap();
    assert_eq!(report.checked, 5);
    assert_eq!(report.drift.len(), 1);
    assert_eq!(report.drift[0].id, stale);
    assert_eq!(report.drift[0].stored, 3);
    assert_eq!(report.drift[0].expected, 2);
    assert_eq!(report.fixed, 0);

    let report = network.service.check(true).unwrap();
    assert_eq!(report.fixed, 1);
    assert_eq!(network.service.get_element(stale).unwrap().network_lvl, 2);
    assert!(network.service.check(false).unwrap().drift.is_empty());
}

#[test]
fn given_missing_element_when_updating_then_not_found() {
    let (service, _store) = service_with(LevelPolicy::Cascade);

    let err = service
        .update_element(ElementId(3), ElementPatch::default())
        .unwrap_err();

    assert!(domain_err(err).is_not_found());
}

// ============================================================
// delete / get / list
// ============================================================

#[rstest]
fn given_middle_element_when_deleting_then_subtree_removed(network: Network) {
    let removed = network.service.delete_element(network.chain[1]).unwrap();

    assert_eq!(removed.len(), 3);
    assert_eq!(*removed.last().unwrap(), network.chain[1]);
    let remaining: Vec<ElementId> = network
        .service
        .list_elements(&ElementFilter::default())
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(remaining, vec![network.chain[0], network.other_root]);
}

#[rstest]
fn given_missing_element_when_getting_then_not_found(network: Network) {
    let err = network.service.get_element(ElementId(404)).unwrap_err();
    assert_eq!(domain_err(err), DomainError::ElementNotFound(ElementId(404)));
}

#[test]
fn given_elements_in_cities_when_listing_then_ordered_by_city_and_filtered() {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    for (n, country, city) in [
        (1, "Russia", "Moscow"),
        (2, "Belarus", "Minsk"),
        (3, "Russia", "Kazan"),
        (4, "Russia", "Moscow"),
    ] {
        service
            .create_element(NewElement {
                contact: contact(n, country, city),
                ..Default::default()
            })
            .unwrap();
    }

    let all: Vec<u64> = service
        .list_elements(&ElementFilter::default())
        .unwrap()
        .iter()
        .map(|e| e.id.0)
        .collect();
    assert_eq!(all, vec![3, 2, 1, 4]);

    let russia: Vec<u64> = service
        .list_elements(&ElementFilter {
            country: Some("Russia".into()),
        })
        .unwrap()
        .iter()
        .map(|e| e.id.0)
        .collect();
    assert_eq!(russia, vec![3, 1, 4]);
}

// ============================================================
// bulk_clear_debt() tests
// ============================================================

#[test]
fn given_debts_when_clearing_subset_then_only_listed_reset() {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    let root = service.create_element(new_element(1, None)).unwrap();
    let mut children = Vec::new();
    for n in 2..=4 {
        let child = service
            .create_element(NewElement {
                debt_to_parent: Some(Money::from_units(100)),
                ..new_element(n, Some(root.id))
            })
            .unwrap();
        children.push(child.id);
    }

    let ids = BTreeSet::from([children[0], children[1], ElementId(99)]);
    let cleared = service.bulk_clear_debt(&ids).unwrap();

    assert_eq!(cleared, 2);
    assert!(service.get_element(children[0]).unwrap().debt_to_parent.is_zero());
    assert!(service.get_element(children[1]).unwrap().debt_to_parent.is_zero());
    assert_eq!(
        service.get_element(children[2]).unwrap().debt_to_parent,
        Money::from_units(100)
    );
}

#[test]
fn given_no_ids_when_clearing_then_nothing_changes() {
    let (service, _store) = service_with(LevelPolicy::Cascade);
    assert_eq!(service.bulk_clear_debt(&BTreeSet::new()).unwrap(), 0);
}

// ============================================================
// import_elements() tests
// ============================================================

fn draft(key: &str, n: u64, parent: Option<ParentRef>) -> ElementDraft {
    ElementDraft {
        key: key.to_string(),
        contact: contact(n, "Russia", "Moscow"),
        parent,
        products: BTreeSet::new(),
        debt_to_parent: None,
    }
}

#[rstest]
fn given_forward_references_when_importing_then_levels_follow_chain(network: Network) {
    let leaf_parent = network.chain[3];
    let drafts = vec![
        draft("shop", 10, Some(ParentRef::Draft("dist".into()))),
        draft("dist", 11, Some(ParentRef::Existing(leaf_parent))),
        draft("factory", 12, None),
    ];

    let created = network.service.import_elements(drafts).unwrap();

    let names: Vec<&str> = created.iter().map(|e| e.name()).collect();
    assert_eq!(names, ["element 10", "element 11", "element 12"]);
    let level = |name: &str| {
        created
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.network_lvl)
            .unwrap()
    };
    assert_eq!(level("element 11"), 4);
    assert_eq!(level("element 10"), 5);
    assert_eq!(level("element 12"), 0);
    assert!(network.service.check(false).unwrap().drift.is_empty());
}

#[rstest]
fn given_cycle_between_drafts_when_importing_then_nothing_created(network: Network) {
    let before = snapshot(&network.store);
    let drafts = vec![
        draft("a", 10, Some(ParentRef::Draft("b".into()))),
        draft("b", 11, Some(ParentRef::Draft("a".into()))),
    ];

    let err = network.service.import_elements(drafts).unwrap_err();

    assert!(domain_err(err).is_cycle());
    assert_eq!(snapshot(&network.store), before);
}

#[rstest]
#[case(vec![draft("a", 10, None), draft("a", 11, None)], DomainError::DuplicateDraftKey("a".into()))]
#[case(vec![draft("a", 10, Some(ParentRef::Draft("zz".into())))], DomainError::DraftNotFound("zz".into()))]
#[case(vec![draft("a", 10, Some(ParentRef::Existing(ElementId(99))))], DomainError::ElementNotFound(ElementId(99)))]
fn given_bad_batch_when_importing_then_rejected(
    #[case] drafts: Vec<ElementDraft>,
    #[case] expected: DomainError,
) {
    let (service, store) = service_with(LevelPolicy::Cascade);

    let err = service.import_elements(drafts).unwrap_err();

    assert_eq!(domain_err(err), expected);
    assert!(snapshot(&store).is_none());
}

// ============================================================
// tree()
// ============================================================

#[rstest]
fn given_two_roots_when_rendering_tree_then_one_tree_per_root(network: Network) {
    let trees = network.service.tree().unwrap();

    assert_eq!(trees.len(), 2);
    let rendered = trees[0].to_string();
    assert!(rendered.contains("#4 element 4 [lvl 3, debt 0.00]"));
}

// ============================================================
// check() on stored data
// ============================================================

#[test]
fn given_stored_stale_levels_when_checking_then_drift_reported() {
    testing::init_test_setup();
    let mut root = NetworkElement::new(ElementId(1), contact(1, "Russia", "Moscow"), None);
    root.network_lvl = 0;
    let mut child = NetworkElement::new(ElementId(2), contact(2, "Russia", "Moscow"), Some(root.id));
    child.network_lvl = 4;
    let store = Arc::new(MemoryStore::with_snapshot(NetworkSnapshot {
        next_element_id: 3,
        elements: vec![root, child],
        ..Default::default()
    }));
    let service = NetworkService::new(store, LevelPolicy::Cascade);

    let report = service.check(false).unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.drift.len(), 1);
    assert_eq!(report.drift[0].expected, 1);
    assert_eq!(service.policy(), LevelPolicy::Cascade);
}

#[test]
fn given_stored_parent_at_max_level_when_creating_child_then_corrupt_and_store_unchanged() {
    testing::init_test_setup();
    let mut root = NetworkElement::new(ElementId(1), contact(1, "Russia", "Moscow"), None);
    root.network_lvl = u32::MAX;
    let store = Arc::new(MemoryStore::with_snapshot(NetworkSnapshot {
        next_element_id: 2,
        elements: vec![root],
        ..Default::default()
    }));
    let before = snapshot(&store);
    let service = NetworkService::new(store.clone(), LevelPolicy::Cascade);

    let err = service
        .create_element(new_element(2, Some(ElementId(1))))
        .unwrap_err();

    assert!(matches!(domain_err(err), DomainError::CorruptNetwork(_)));
    assert_eq!(snapshot(&store), before);
}
