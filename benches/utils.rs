use rand::{Rng, SeedableRng, rngs::StdRng};
use sqlate::{Context, Value};
use std::collections::BTreeMap;

/// Generate n random contexts to use in the benchmark
pub fn generate_random_contexts(n: usize) -> Vec<Context> {
    let mut rng = StdRng::seed_from_u64(42); // Fixed seed for reproducibility
    let mut contexts = Vec::with_capacity(n);

    for _ in 0..n {
        let mut user = BTreeMap::new();
        user.insert("name".to_owned(), Value::from(random_string(&mut rng, 5, 10)));
        if rng.random_bool(0.8) {
            user.insert("age".to_owned(), Value::from(rng.random_range(10_i64..80)));
        }
        user.insert("active".to_owned(), Value::from(rng.random_bool(0.7)));

        let items_count = rng.random_range(0..10);
        let items: Vec<Value> = (0..items_count)
            .map(|_| Value::from(rng.random_range(10_i64..1000)))
            .collect();

        let mut context = Context::new();
        context
            .insert("user", user)
            .insert("items", items)
            .insert("order", "e.name DESC")
            .insert("show_details", rng.random_bool(0.8))
            .insert("has_access", rng.random_bool(0.6));
        contexts.push(context);
    }

    contexts
}

/// Generate a random string with length between min and max
fn random_string(rng: &mut StdRng, min_len: usize, max_len: usize) -> String {
    let charset = "abcdefghijklmnopqrstuvwxyz";
    let len = rng.random_range(min_len..=max_len);

    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset.chars().nth(idx).unwrap()
        })
        .collect()
}
