//! Demo data generation.
//!
//! Creates a sample "Conference Feedback" form and fills it with random
//! responses so the dashboard has something to show.

use crate::error::AppError;
use crate::models::{new_id, Field, FieldKind, Form, Response};
use crate::store::Store;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Default number of responses generated for the demo form.
pub const DEFAULT_SEED_RESPONSES: usize = 100;

const NAMES: &[&str] = &["Alex", "Jordan", "Taylor", "Morgan", "Sam", "Chris", "Pat", "Jamie"];

// Blank entries make roughly half the feedback answers empty
const FEEDBACK: &[&str] = &[
    "Great conference!",
    "Looking forward to next year",
    "The speakers were excellent",
    "Learned a lot",
    "",
    "",
    "",
    "",
];

/// Chance that each improvement area is picked.
const SUBSET_PROBABILITY: f64 = 0.3;

/// Build the demo form definition.
pub fn demo_form() -> Form {
    let field = |kind: FieldKind, label: &str, required: bool| Field {
        id: new_id(),
        kind,
        label: label.to_string(),
        options: Vec::new(),
        required,
        max: None,
    };

    Form {
        id: new_id(),
        title: "Conference Feedback".to_string(),
        created_at: Utc::now(),
        fields: vec![
            field(FieldKind::Text, "Full Name", true),
            Field {
                max: Some(5),
                ..field(
                    FieldKind::Rating,
                    "How satisfied were you with the conference?",
                    true,
                )
            },
            Field {
                options: to_strings(&["Technical", "Business", "Design", "Marketing"]),
                ..field(
                    FieldKind::SingleChoice,
                    "Which track did you find most valuable?",
                    true,
                )
            },
            Field {
                options: to_strings(&["Content", "Scheduling", "Venue", "Food", "Networking"]),
                ..field(FieldKind::MultiChoice, "What areas could we improve?", false)
            },
            field(FieldKind::Text, "Additional feedback", false),
        ],
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Pick each item with a fixed probability, never returning an empty set
/// for a non-empty input.
pub fn random_subset<R: Rng + ?Sized>(rng: &mut R, items: &[String]) -> Vec<String> {
    let mut picked: Vec<String> = items
        .iter()
        .filter(|_| rng.gen_bool(SUBSET_PROBABILITY))
        .cloned()
        .collect();

    if picked.is_empty() {
        if let Some(item) = items.choose(rng) {
            picked.push(item.clone());
        }
    }
    picked
}

/// Generate a random, valid answer for a field.
fn random_answer<R: Rng + ?Sized>(rng: &mut R, field: &Field) -> Value {
    match field.kind {
        FieldKind::Text if field.required => {
            let first = NAMES.choose(rng).copied().unwrap_or("Alex");
            let last = NAMES.choose(rng).copied().unwrap_or("Jordan");
            json!(format!("{} {}", first, last))
        }
        FieldKind::Text => json!(FEEDBACK.choose(rng).copied().unwrap_or("")),
        FieldKind::Rating => json!(rng.gen_range(1..=field.rating_scale())),
        FieldKind::SingleChoice => json!(field.options.choose(rng)),
        FieldKind::MultiChoice => json!(random_subset(rng, &field.options)),
    }
}

/// Create the demo form and `responses` random responses in `store`.
pub fn seed_demo(store: &dyn Store, responses: usize) -> Result<Form, AppError> {
    let form = store.create_form(demo_form())?;
    let mut rng = rand::thread_rng();

    let batch: Vec<Response> = (0..responses)
        .map(|_| {
            let answers: BTreeMap<String, Value> = form
                .fields
                .iter()
                .map(|field| (field.id.clone(), random_answer(&mut rng, field)))
                .collect();

            let mut response = Response::new(&form.id, answers);
            response.created_at = Utc::now() - Duration::hours(rng.gen_range(0..7 * 24));
            response
        })
        .collect();
    store.insert_responses(batch)?;

    info!(form_id = %form.id, responses, "Seeded demo form");
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;
    use crate::store::MemoryStore;
    use crate::validation::validate_answers;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_subset_never_empty() {
        let mut rng = StdRng::seed_from_u64(7);
        let items = to_strings(&["a", "b", "c"]);

        for _ in 0..200 {
            let subset = random_subset(&mut rng, &items);
            assert!(!subset.is_empty());
            assert!(subset.iter().all(|s| items.contains(s)));
        }
        assert!(random_subset(&mut rng, &[]).is_empty());
    }

    #[test]
    fn test_random_answers_pass_validation() {
        let mut rng = StdRng::seed_from_u64(42);
        let form = demo_form();

        for _ in 0..50 {
            let body: serde_json::Map<String, Value> = form
                .fields
                .iter()
                .map(|f| (f.id.clone(), random_answer(&mut rng, f)))
                .collect();
            assert!(validate_answers(&form.fields, &Value::Object(body)).is_ok());
        }
    }

    #[test]
    fn test_seed_demo_populates_store() {
        let store = MemoryStore::in_memory();
        let form = seed_demo(&store, 25).unwrap();

        assert_eq!(form.fields.len(), 5);
        assert_eq!(store.find_responses(&form.id).unwrap().len(), 25);

        let snapshot = analysis::compute(&form, &store.find_responses(&form.id).unwrap());
        let rating_id = &form.fields[1].id;
        let dist_total: f64 = (1..=5)
            .filter_map(|n| snapshot.stat(rating_id, &format!("dist_{}", n)))
            .sum();
        assert_eq!(dist_total, 25.0);
        assert_eq!(snapshot.stat(&form.fields[0].id, "responses"), Some(25.0));
    }
}
