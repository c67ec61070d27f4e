//! Process-wide schema cache keyed by type identity.
//!
//! Entries live for the process lifetime; there is no teardown. First-build
//! races are resolved by building outside the lock and letting the first
//! insert win, so two racing builders hand out the same instance.

use super::{Described, Schema};
use crate::error::SchemaError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type Registry = Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub(crate) fn schema_of<T: Described>() -> Result<Arc<Schema<T>>, SchemaError> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let key = TypeId::of::<T>();

    let cached = registry
        .lock()
        .expect("schema registry poisoned")
        .get(&key)
        .cloned();
    if let Some(entry) = cached
        && let Ok(schema) = entry.downcast::<Schema<T>>()
    {
        return Ok(schema);
    }

    // Build outside the lock: `describe` is user code and may look up other
    // schemas. A failed build is not cached, so the error reproduces on the
    // next call.
    let built = Arc::new(Schema::<T>::build()?);

    let mut guard = registry.lock().expect("schema registry poisoned");
    let entry = guard
        .entry(key)
        .or_insert_with(|| built.clone() as Arc<dyn Any + Send + Sync>)
        .clone();
    drop(guard);

    // The entry is keyed by `TypeId`, so the downcast cannot fail; the
    // freshly built schema covers the impossible branch.
    Ok(entry.downcast::<Schema<T>>().unwrap_or(built))
}

#[cfg(test)]
mod tests {
    use crate::schema::{Described, Schema, SchemaBuilder};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Cached {
        name: String,
    }

    impl Described for Cached {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.scalar("name", |c: &Self| &c.name, |c: &mut Self| &mut c.name);
        }
    }

    #[test]
    fn repeated_lookups_share_one_instance() {
        let first = Schema::<Cached>::of().unwrap();
        let second = Schema::<Cached>::of().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn schemas_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        // The cache stores schemas as `Arc<dyn Any + Send + Sync>`, so the
        // boxed bindings inside must carry those bounds themselves.
        assert_send_sync::<Schema<Cached>>();
    }

    #[test]
    fn concurrent_first_build_is_safe() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| Schema::<Cached>::of().map(|s| Arc::as_ptr(&s) as usize)))
            .collect();
        let mut seen = std::collections::BTreeSet::new();
        for handle in handles {
            seen.insert(handle.join().unwrap().unwrap());
        }
        assert_eq!(seen.len(), 1);
    }
}
