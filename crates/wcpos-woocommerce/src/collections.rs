use wcpos_query::{CollectionConfig, QueryConfig};

/// Local collection settings for the store resources the POS syncs.
pub fn default_collections() -> Vec<(&'static str, CollectionConfig)> {
    vec![
        (
            "products",
            CollectionConfig::new("id").searchable(["name", "sku", "barcode"]),
        ),
        (
            "customers",
            CollectionConfig::new("id").searchable(["first_name", "last_name", "email", "username"]),
        ),
        (
            "orders",
            CollectionConfig::new("id").searchable(["number", "status"]),
        ),
    ]
}

/// Query config with the default WooCommerce collections registered.
pub fn default_query_config() -> QueryConfig {
    default_collections()
        .into_iter()
        .fold(QueryConfig::default(), |config, (name, collection)| {
            config.with_collection(name, collection)
        })
}
