//! Demonstrates the identity cache lifecycle
//!
//! This example shows how to:
//! - Populate a cache lazily from a backing store
//! - Keep a secondary view in sync with the identifier view
//! - Report creates and deletes from the persistence layer
//!
//! Run with `RUST_LOG=ouroboros_identity=debug` to see every fan-out.

use ouroboros_identity::{IdentityCache, IdentityCacheConfig, MemoryStore, Record};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone)]
struct Attribute {
    id: Option<u64>,
    name: String,
    backend_type: String,
}

impl Record for Attribute {
    type Id = u64;
    const ENTITY_TYPE: &'static str = "Attribute";

    fn id(&self) -> Option<u64> {
        self.id
    }
}

fn attribute(id: u64, name: &str, backend_type: &str) -> Attribute {
    Attribute {
        id: Some(id),
        name: name.to_string(),
        backend_type: backend_type.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ouroboros_identity=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(MemoryStore::with_rows(vec![
        attribute(1, "color", "string"),
        attribute(2, "weight", "float"),
    ]));

    let config = IdentityCacheConfig::from_env()?;
    let mut cache: IdentityCache<Attribute, _> =
        IdentityCache::with_config(Arc::clone(&store), config)?;
    cache.register_keyed_view("by_name", |a: &Attribute| Some(a.name.clone()))?;

    // 1. Lazy population
    println!("1. Loading all attributes...");
    for record in cache.all().await? {
        let attr = record.read();
        println!("   {:?} {} ({})", attr.id, attr.name, attr.backend_type);
    }
    println!("   store loads so far: {}\n", store.load_calls());

    // 2. Local create
    println!("2. Creating attribute 'size'...");
    let size = attribute(3, "size", "integer");
    store.insert(size.clone());
    cache.notify_created(size)?;
    println!("   all() now holds {} records", cache.all().await?.len());
    println!("   store loads so far: {}\n", store.load_calls());

    // 3. Secondary view lookup
    println!("3. Looking up by name...");
    let weight = cache.find_by("by_name", "weight").await?;
    println!("   weight -> id {:?}\n", weight.id());

    // 4. Delete
    println!("4. Deleting attribute 'weight'...");
    if let Some(id) = weight.id() {
        store.remove(&id);
    }
    cache.notify_deleted(&weight)?;
    match cache.find(&2).await {
        Ok(_) => println!("   unexpectedly still cached"),
        Err(e) => println!("   find(2): {}", e),
    }

    let names: Vec<String> = cache
        .all()
        .await?
        .iter()
        .map(|r| r.read().name.clone())
        .collect();
    println!("   remaining: {:?}\n", names);

    println!("{}", cache.stats());
    for event in cache.recent_events() {
        println!("   {} {} -> {:?}", event.kind, event.identifier, event.views);
    }

    Ok(())
}
