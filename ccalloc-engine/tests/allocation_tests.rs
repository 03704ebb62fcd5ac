//! End-to-end allocation tests.

use ccalloc_core::{
    AllocatedCosts, AllocationConfig, AllocationDeclaration, AllocationType, CloudCostItem,
    CloudCostRecord, CostAmounts, InstanceId, ProductCostKind, ProductKey, TagSelector, TagSet,
};
use ccalloc_engine::{AllocationError, CostAllocator, CostItemStore};
use proptest::prelude::*;

const TOLERANCE: f64 = 1e-9;

fn id(service: &str) -> InstanceId {
    InstanceId::service_default(service)
}

fn cloud(service: &str, amortized: f64) -> CloudCostItem {
    CloudCostItem::new("2024-01-31", id(service), CostAmounts::new(amortized, amortized))
        .with_currency("EUR")
}

fn tagged(service: &str, amortized: f64, tags: &[(&str, &str)]) -> CloudCostItem {
    cloud(service, amortized).with_tags(tags.iter().copied().collect::<TagSet>())
}

fn key(provider: &str, consumer: &str, key: f64) -> AllocationDeclaration {
    AllocationDeclaration::new(id(provider), id(consumer), key)
}

fn allocate(
    config: &AllocationConfig,
    items: Vec<CloudCostItem>,
    declarations: Vec<AllocationDeclaration>,
) -> Result<AllocatedCosts, AllocationError> {
    CostAllocator::new(config).allocate_store(CostItemStore::with_cloud_items(items), declarations)
}

fn total_of(ledger: &AllocatedCosts, service: &str) -> f64 {
    ledger
        .instance(&id(service))
        .map_or(0.0, |summary| summary.total.amortized)
}

fn cycle_config(precedence: &[&str]) -> AllocationConfig {
    let mut config = AllocationConfig::default();
    config.cycles.service_precedence = precedence.iter().map(ToString::to_string).collect();
    config.normalized()
}

#[test]
fn test_proportional_shares() {
    let config = AllocationConfig::default();
    let ledger = allocate(
        &config,
        vec![cloud("p", 100.0)],
        vec![key("p", "a", 2.0), key("p", "b", 3.0), key("p", "c", 5.0)],
    )
    .unwrap();

    let shares: Vec<f64> = ledger.allocation_items.iter().map(|i| i.cost.amortized).collect();
    for (share, expected) in shares.iter().zip([20.0, 30.0, 50.0]) {
        assert!((share - expected).abs() < TOLERANCE, "{share} != {expected}");
    }
    assert_eq!(ledger.currency, "EUR");
    assert!(ledger.allocation_items.iter().all(|i| i.currency == "EUR"));
}

#[test]
fn test_cycle_broken_by_precedence() {
    let config = cycle_config(&["c", "m"]);
    let ledger = allocate(
        &config,
        vec![cloud("c", 10.0), cloud("m", 20.0)],
        vec![key("c", "m", 1.0), key("m", "c", 1.0)],
    )
    .unwrap();

    assert_eq!(ledger.totals.cycle_breaks, 1);
    assert_eq!(ledger.allocated_between(&id("m"), &id("c")), CostAmounts::ZERO);
    assert_eq!(ledger.allocation_items.len(), 1);
    assert!((total_of(&ledger, "m") - 30.0).abs() < TOLERANCE);
    assert!((total_of(&ledger, "c") - 10.0).abs() < TOLERANCE);
}

#[test]
fn test_cycle_through_unlisted_service() {
    let config = cycle_config(&["a", "b"]);
    let ledger = allocate(
        &config,
        vec![cloud("a", 10.0), cloud("b", 20.0), cloud("c", 30.0)],
        vec![key("a", "b", 1.0), key("b", "c", 1.0), key("c", "a", 1.0)],
    )
    .unwrap();

    assert_eq!(ledger.totals.cycle_breaks, 1);
    assert_eq!(ledger.allocated_between(&id("c"), &id("a")), CostAmounts::ZERO);
    assert!((total_of(&ledger, "b") - 30.0).abs() < TOLERANCE);
    assert!((total_of(&ledger, "c") - 60.0).abs() < TOLERANCE);
}

#[test]
fn test_cycle_without_precedence_fails() {
    let config = AllocationConfig::default();
    let err = allocate(
        &config,
        vec![cloud("c", 10.0)],
        vec![key("c", "m", 1.0), key("m", "c", 1.0)],
    )
    .unwrap_err();
    assert!(matches!(err, AllocationError::AmbiguousCycle { .. }));
}

#[test]
fn test_cost_type_two_passes() {
    let config = AllocationConfig::default();
    let ledger = allocate(
        &config,
        vec![cloud("p", 100.0), cloud("a", 30.0), cloud("b", 60.0), cloud("q", 10.0)],
        vec![
            key("p", "a", 0.0).with_type(AllocationType::Cost),
            key("p", "b", 0.0).with_type(AllocationType::Cost),
            // a reaches 40 before Cost edges are considered
            key("q", "a", 1.0),
        ],
    )
    .unwrap();

    let from_p_to_a = ledger.allocated_between(&id("p"), &id("a")).amortized;
    let from_p_to_b = ledger.allocated_between(&id("p"), &id("b")).amortized;
    assert!((from_p_to_a - 40.0).abs() < TOLERANCE);
    assert!((from_p_to_b - 60.0).abs() < TOLERANCE);

    let keys: Vec<f64> = ledger.allocation_items.iter().map(|i| i.key).collect();
    assert_eq!(keys, vec![40.0, 60.0, 1.0]);
}

#[test]
fn test_no_double_counting() {
    let config = AllocationConfig::default();
    let ledger = allocate(
        &config,
        vec![cloud("p", 100.0), cloud("s", 50.0)],
        vec![key("p", "s", 1.0), key("s", "s", 1.0).with_product("x")],
    )
    .unwrap();

    let totals = ledger.product_totals();
    assert_eq!(totals.len(), 1);
    let x = totals[&ProductKey::new("x", None)];
    assert!((x.amortized - 150.0).abs() < TOLERANCE);
    assert!(ledger.product_items.iter().all(|item| item.provider == id("s")));
    assert!(ledger.residuals.is_empty());
    assert!(ledger.is_balanced(TOLERANCE));
}

#[test]
fn test_cloud_tag_selector_allocates_whole_instance() {
    let config = AllocationConfig::default();
    let template = AllocationDeclaration::new(id("network"), id("network"), 0.0)
        .with_type(AllocationType::CloudTagSelector)
        .with_cloud_tag_selector(TagSelector::parse("uses_network == 'yes'").unwrap());
    let ledger = allocate(
        &config,
        vec![
            // network owns three items, only two of them tagged
            tagged("network", 10.0, &[("uses_network", "yes")]),
            tagged("network", 20.0, &[("uses_network", "yes")]),
            tagged("network", 30.0, &[]),
            tagged("web", 30.0, &[("uses_network", "yes")]),
            tagged("db", 10.0, &[("uses_network", "yes")]),
            tagged("db", 5.0, &[]),
        ],
        vec![template],
    )
    .unwrap();

    assert_eq!(ledger.allocation_items.len(), 2);
    let to_web = ledger.allocated_between(&id("network"), &id("web")).amortized;
    let to_db = ledger.allocated_between(&id("network"), &id("db")).amortized;
    assert!((to_web - 45.0).abs() < TOLERANCE);
    assert!((to_db - 15.0).abs() < TOLERANCE);

    let network = ledger.instance(&id("network")).unwrap();
    assert!(network.residual.is_negligible(TOLERANCE));
    assert!(ledger
        .allocation_items
        .iter()
        .all(|item| item.type_label() == "CloudTagSelector"));
}

#[test]
fn test_consumer_tags_keep_dimensions_apart() {
    let mut config = AllocationConfig::default();
    config.general.dimensions = vec!["Environment".to_string()];
    config.tag_keys.consumer_service = vec!["consumer_service".to_string()];
    config
        .tag_keys
        .consumer_dimensions
        .insert("Environment".to_string(), vec!["consumer_env".to_string()]);
    let config = config.normalized();

    let ledger = allocate(
        &config,
        vec![
            tagged("storage", 10.0, &[("consumer_service", "web"), ("consumer_env", "prod")]),
            tagged("storage", 90.0, &[("consumer_service", "web"), ("consumer_env", "dev")]),
        ],
        Vec::new(),
    )
    .unwrap();

    let by_environment: Vec<(String, f64)> = ledger
        .allocation_items
        .iter()
        .map(|item| {
            let environment = item.dimensions.get("Environment").cloned().unwrap_or_default();
            (environment, item.cost.amortized)
        })
        .collect();
    assert_eq!(by_environment.len(), 2);
    assert_eq!(by_environment[0].0, "prod");
    assert!((by_environment[0].1 - 10.0).abs() < TOLERANCE);
    assert_eq!(by_environment[1].0, "dev");
    assert!((by_environment[1].1 - 90.0).abs() < TOLERANCE);
    assert!((total_of(&ledger, "web") - 100.0).abs() < TOLERANCE);
}

#[test]
fn test_default_product_collects_residuals() {
    let mut config = AllocationConfig::default();
    config.general.default_product = Some("Platform".to_string());
    let config = config.normalized();

    let ledger = allocate(
        &config,
        vec![cloud("p", 100.0), cloud("s", 50.0), cloud("idle", 5.0)],
        vec![key("p", "s", 1.0), key("s", "s", 3.0).with_product("x"), key("p", "t", 1.0)],
    )
    .unwrap();

    let residual: Vec<_> = ledger
        .product_items
        .iter()
        .filter(|item| item.kind == ProductCostKind::Residual)
        .collect();
    assert_eq!(residual.len(), 2);
    assert!(residual.iter().all(|item| item.product.product == "platform"));
    assert!(ledger.residuals.is_empty());
    assert!(ledger.is_balanced(1e-6));
}

#[test]
fn test_unresolved_records_go_to_unknown() {
    let mut config = AllocationConfig::default();
    config.tag_keys.service = vec!["service".to_string()];
    let records = vec![
        CloudCostRecord {
            date: "2024-01-31".to_string(),
            amortized_cost: 4.0,
            on_demand_cost: 4.0,
            currency: "EUR".to_string(),
            tags: [("service", "web")].into_iter().collect(),
            ..Default::default()
        },
        CloudCostRecord {
            date: "2024-01-31".to_string(),
            amortized_cost: 6.0,
            on_demand_cost: 6.0,
            currency: "EUR".to_string(),
            ..Default::default()
        },
    ];
    let ledger = CostAllocator::new(&config).allocate(records, Vec::new()).unwrap();
    assert_eq!(ledger.totals.unresolved_items, 1);
    assert!((total_of(&ledger, "unknown") - 6.0).abs() < TOLERANCE);
    assert!(ledger.is_balanced(TOLERANCE));
}

#[test]
fn test_idempotent_runs() {
    let config = cycle_config(&["c", "m"]);
    let items = vec![
        tagged("c", 10.0, &[("env", "prod")]),
        tagged("m", 20.0, &[("env", "dev")]),
        cloud("p", 70.0),
    ];
    let declarations = vec![
        key("c", "m", 1.0),
        key("m", "c", 1.0),
        key("p", "c", 2.0).with_product("x"),
        key("p", "m", 1.0).with_type(AllocationType::Cost),
        key("m", "m", 1.0).with_product("y"),
    ];

    let first = allocate(&config, items.clone(), declarations.clone()).unwrap();
    let second = allocate(&config, items, declarations).unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Conservation
// ============================================================================

/// A random DAG: instance costs and forward edges `(from, to, weight, product)`.
fn dag_strategy() -> impl Strategy<Value = (Vec<f64>, Vec<(usize, usize, f64, bool)>)> {
    (2usize..8).prop_flat_map(|count| {
        let costs = prop::collection::vec(0.0f64..1000.0, count);
        let edges = prop::collection::vec(
            (0..count, 0..count, 0.1f64..10.0, any::<bool>()),
            0..count * 3,
        );
        (costs, edges)
    })
}

proptest! {
    #[test]
    fn test_conservation_over_random_dags((costs, raw_edges) in dag_strategy()) {
        let config = AllocationConfig::default();
        let name = |i: usize| format!("s{i}");

        let items: Vec<CloudCostItem> = costs
            .iter()
            .enumerate()
            .map(|(i, &cost)| cloud(&name(i), cost))
            .collect();

        let mut declarations = Vec::new();
        let mut has_outgoing = vec![false; costs.len()];
        for (a, b, weight, product) in raw_edges {
            if a == b {
                continue;
            }
            let (from, to) = (a.min(b), a.max(b));
            let mut declaration = key(&name(from), &name(to), weight);
            if product {
                declaration = declaration.with_product(&format!("p{to}"));
            }
            declarations.push(declaration);
            has_outgoing[from] = true;
        }
        // leaves consume on behalf of their own product
        for (i, outgoing) in has_outgoing.iter().enumerate() {
            if !outgoing {
                declarations.push(key(&name(i), &name(i), 1.0).with_product(&format!("leaf{i}")));
            }
        }

        let ledger = allocate(&config, items, declarations).unwrap();
        let cloud_total: f64 = costs.iter().sum();
        let product_total: f64 = ledger.product_items.iter().map(|i| i.cost.amortized).sum();
        let tolerance = 1e-9 * cloud_total.max(1.0);

        prop_assert!((cloud_total - product_total).abs() <= tolerance * 100.0);
        prop_assert!(ledger.is_balanced(tolerance * 100.0));
        prop_assert!(ledger.residuals.is_empty());
    }
}
