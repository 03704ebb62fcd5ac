//! Declaration expansion.
//!
//! Turns declarations read from allocation key sources into the final
//! declaration list the graph is built from:
//!
//! 1. `CloudTagSelector` declarations are replaced by one declaration per
//!    consumer instance owning matching cloud items.
//! 2. Consumer and product tags found on cost items produce synthetic
//!    declarations.

use ccalloc_core::{
    AllocationConfig, AllocationDeclaration, AllocationType, DeclarationOrigin, InstanceId,
    TagSelector, TagSet,
};
use tracing::{debug, info, warn};

use crate::store::CostItemStore;

/// Expands `CloudTagSelector` declarations and appends consumer tag declarations.
///
/// Insertion order is preserved: declarations keep their position, expanded
/// ones replace their template in place, and consumer tag declarations come
/// last.
pub fn expand_declarations(
    declarations: Vec<AllocationDeclaration>,
    store: &CostItemStore,
    config: &AllocationConfig,
) -> Vec<AllocationDeclaration> {
    info!(count = declarations.len(), "Processing cloud tag selectors");
    let mut expanded = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        if declaration.allocation_type == AllocationType::CloudTagSelector {
            expanded.extend(expand_cloud_tag_selector(&declaration, store));
        } else {
            expanded.push(declaration);
        }
    }

    info!("Creating consumer cost items from tags");
    let synthetic = consumer_tag_declarations(store, &expanded, config);
    debug!(count = synthetic.len(), "Consumer tag declarations created");
    expanded.extend(synthetic);
    expanded
}

// ============================================================================
// Cloud Tag Selector
// ============================================================================

/// Expands one `CloudTagSelector` declaration.
///
/// Scans cloud items matching the cloud tag selector and owned by a service
/// other than the provider's, then emits one declaration per owning
/// instance, keyed by the sum of the matched amortized costs. The whole
/// share of a consumer instance flows through its single edge.
pub fn expand_cloud_tag_selector(
    template: &AllocationDeclaration,
    store: &CostItemStore,
) -> Vec<AllocationDeclaration> {
    let Some(selector) = template.cloud_tag_selector.as_ref() else {
        warn!(
            provider = %template.provider,
            "CloudTagSelector declaration without a cloud tag selector, ignored"
        );
        return Vec::new();
    };

    let mut keys: Vec<(InstanceId, f64, String)> = Vec::new();
    for instance in store.instances() {
        if instance.service == template.provider.service {
            continue;
        }
        let mut matched = store.matching_cloud_items(instance, selector).peekable();
        let Some(date) = matched.peek().map(|item| item.date.clone()) else {
            continue;
        };
        let key = matched.map(|item| item.cost.amortized).sum();
        keys.push((instance.clone(), key, date));
    }

    if keys.is_empty() {
        warn!(
            provider = %template.provider,
            selector = %selector,
            "Cloud tag selector matches no cloud cost item"
        );
    }

    keys.into_iter()
        .map(|(consumer, key, date)| {
            let mut declaration = template.clone();
            declaration.consumer = consumer;
            declaration.key = key;
            declaration.origin = DeclarationOrigin::CloudTagSelector;
            if declaration.date.is_empty() {
                declaration.date = date;
            }
            declaration
        })
        .collect()
}

// ============================================================================
// Consumer Tags
// ============================================================================

/// A cost item seen by the consumer tag scan.
struct TaggedItem<'a> {
    date: &'a str,
    owner: &'a InstanceId,
    tags: &'a TagSet,
    currency: &'a str,
}

/// Builds declarations from consumer service and product tags.
///
/// Cloud items are scanned first, then declarations (whose owner is their
/// consumer). Every tagged item yields its own declaration.
pub fn consumer_tag_declarations(
    store: &CostItemStore,
    declarations: &[AllocationDeclaration],
    config: &AllocationConfig,
) -> Vec<AllocationDeclaration> {
    let keys = &config.tag_keys;
    if keys.consumer_service.is_empty() && keys.product.is_empty() {
        return Vec::new();
    }

    let cloud = store.all_cloud_items().iter().map(|item| TaggedItem {
        date: &item.date,
        owner: &item.instance,
        tags: &item.tags,
        currency: &item.currency,
    });
    let declared = declarations.iter().map(|d| TaggedItem {
        date: &d.date,
        owner: &d.consumer,
        tags: &d.tags,
        currency: &d.currency,
    });

    cloud
        .chain(declared)
        .filter_map(|item| consumer_tag_declaration(&item, config))
        .collect()
}

fn consumer_tag_declaration(
    item: &TaggedItem<'_>,
    config: &AllocationConfig,
) -> Option<AllocationDeclaration> {
    let keys = &config.tag_keys;

    let consumer_service = item
        .tags
        .resolve(&keys.consumer_service)
        .filter(|(_, value)| !value.is_empty() && !config.is_ignored_consumer_service(value));
    let consumer_instance = item
        .tags
        .resolve(&keys.consumer_instance)
        .filter(|(_, value)| !value.is_empty());
    let product = item
        .tags
        .resolve(&keys.product)
        .filter(|(_, value)| !value.is_empty());

    if consumer_service.is_none() && product.is_none() {
        return None;
    }

    let mut pairs = Vec::new();
    let consumer = match consumer_service {
        Some((service_key, service)) => {
            pairs.push((service_key, service));
            let instance = match consumer_instance {
                Some((instance_key, instance)) => {
                    pairs.push((instance_key, instance));
                    instance
                }
                None => "",
            };
            InstanceId::new(service, instance)
        }
        // Product only: self consumption materializes final consumption
        None => item.owner.clone(),
    };
    if let Some(pair) = product {
        pairs.push(pair);
    }
    // consumer dimension tags keep items of different dimensions in separate groups
    for dimension in &config.general.dimensions {
        if let Some(pair) = keys
            .consumer_dimensions
            .get(dimension)
            .and_then(|candidates| item.tags.resolve(candidates))
        {
            pairs.push(pair);
        }
    }

    let mut declaration = AllocationDeclaration::new(item.owner.clone(), consumer, 1.0)
        .with_provider_tag_selector(TagSelector::all_equal(&pairs))
        .with_product(product.map_or("", |(_, value)| value));
    declaration.date = item.date.to_string();
    declaration.currency = item.currency.to_string();
    declaration.dimensions = config.resolve_consumer_dimensions(item.tags);
    declaration.origin = DeclarationOrigin::ConsumerTag;
    Some(declaration)
}
