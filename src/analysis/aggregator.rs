//! Response aggregation and statistics.
//!
//! This module turns a form and its full response set into an analytics
//! [`Snapshot`]. The computation is a pure function: the same form and
//! the same set of responses always yield the same numbers, whatever
//! order the responses arrive in.

use crate::models::{
    Answer, Field, FieldKind, FieldStats, Form, Response, Snapshot, MAX_RATING_SCALE,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Key under which free-text fields count their answers.
pub const TEXT_RESPONSES_KEY: &str = "responses";

/// Key holding the average of a rating field.
pub const RATING_AVG_KEY: &str = "avg";

/// Prefix of the per-value rating distribution keys.
pub const RATING_DIST_PREFIX: &str = "dist_";

/// Running totals for one field during the scan.
#[derive(Debug)]
enum Tally {
    /// Option counts for single- and multi-choice fields.
    Options(FieldStats),
    /// Number of responses that answered a free-text field.
    Text(u64),
    /// Rating accumulator; `dist[n - 1]` counts answers in bucket `n`.
    Rating { sum: f64, count: u64, dist: Vec<u64> },
}

impl Tally {
    /// Initial tally, with every key that must appear even at zero.
    fn for_field(field: &Field) -> Self {
        match field.kind {
            FieldKind::SingleChoice | FieldKind::MultiChoice => Tally::Options(
                field
                    .options
                    .iter()
                    .map(|option| (option.clone(), 0.0))
                    .collect(),
            ),
            FieldKind::Text => Tally::Text(0),
            FieldKind::Rating => Tally::Rating {
                sum: 0.0,
                count: 0,
                dist: vec![0; rating_buckets(field) as usize],
            },
        }
    }

    /// Fold one answer into the tally. Unusable values are skipped.
    fn record(&mut self, field: &Field, value: &serde_json::Value) {
        match self {
            Tally::Text(count) => *count += 1,
            Tally::Options(counts) => match Answer::decode(field.kind, value) {
                Some(Answer::Choice(option)) => bump(counts, &option),
                Some(Answer::Choices(options)) => {
                    for option in &options {
                        bump(counts, option);
                    }
                }
                _ => {}
            },
            Tally::Rating { sum, count, dist } => {
                if let Some(Answer::Rating(rating)) = Answer::decode(field.kind, value) {
                    if let Some(bucket) = rating_bucket(rating, dist.len()) {
                        *sum += rating;
                        *count += 1;
                        dist[bucket - 1] += 1;
                    }
                }
            }
        }
    }

    /// Convert the tally into the published statistics map.
    fn finish(self) -> FieldStats {
        match self {
            Tally::Options(counts) => counts,
            Tally::Text(count) => {
                let mut stats = FieldStats::new();
                stats.insert(TEXT_RESPONSES_KEY.to_string(), count as f64);
                stats
            }
            Tally::Rating { sum, count, dist } => {
                let mut stats = FieldStats::new();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                stats.insert(RATING_AVG_KEY.to_string(), avg);
                for (i, n) in dist.into_iter().enumerate() {
                    stats.insert(format!("{}{}", RATING_DIST_PREFIX, i + 1), n as f64);
                }
                stats
            }
        }
    }
}

/// Increment a declared option. Undeclared options are ignored.
fn bump(counts: &mut FieldStats, option: &str) {
    if let Some(count) = counts.get_mut(option) {
        *count += 1.0;
    }
}

/// Number of distribution buckets for a rating field.
///
/// At least two, and never more than [`MAX_RATING_SCALE`] even for stored
/// forms that predate the limit.
pub fn rating_buckets(field: &Field) -> u32 {
    field.rating_scale().clamp(2, MAX_RATING_SCALE)
}

/// Map a rating onto its 1-based bucket.
///
/// Integer and floating-point encodings of the same value share a bucket;
/// fractional values truncate toward zero.
fn rating_bucket(rating: f64, buckets: usize) -> Option<usize> {
    if !rating.is_finite() {
        return None;
    }
    let bucket = rating.trunc();
    if bucket >= 1.0 && bucket <= buckets as f64 {
        Some(bucket as usize)
    } else {
        None
    }
}

/// Compute analytics for a form, stamped with the current time.
pub fn compute(form: &Form, responses: &[Response]) -> Snapshot {
    compute_at(form, responses, Utc::now())
}

/// Compute analytics for a form with an explicit timestamp.
pub fn compute_at(form: &Form, responses: &[Response], at: DateTime<Utc>) -> Snapshot {
    let mut tallies: Vec<(&Field, Tally)> = form
        .fields
        .iter()
        .map(|field| (field, Tally::for_field(field)))
        .collect();

    for response in responses {
        for (field, tally) in tallies.iter_mut() {
            if let Some(value) = response.answer(&field.id) {
                tally.record(field, value);
            }
        }
    }

    let by_field: BTreeMap<String, FieldStats> = tallies
        .into_iter()
        .map(|(field, tally)| (field.id.clone(), tally.finish()))
        .collect();

    Snapshot {
        form_id: form.id.clone(),
        by_field,
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn field(id: &str, kind: FieldKind, options: &[&str], max: Option<u32>) -> Field {
        Field {
            id: id.to_string(),
            kind,
            label: id.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            required: false,
            max,
        }
    }

    fn create_test_form() -> Form {
        Form {
            id: "form-1".to_string(),
            title: "Conference Feedback".to_string(),
            fields: vec![
                field("name", FieldKind::Text, &[], None),
                field("rating", FieldKind::Rating, &[], Some(5)),
                field(
                    "track",
                    FieldKind::SingleChoice,
                    &["Technical", "Business", "Design"],
                    None,
                ),
                field(
                    "improve",
                    FieldKind::MultiChoice,
                    &["Content", "Scheduling", "Venue", "Food", "Networking"],
                    None,
                ),
            ],
            created_at: Utc::now(),
        }
    }

    fn response(answers: Value) -> Response {
        let answers = answers
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Response::new("form-1", answers)
    }

    #[test]
    fn test_zero_responses_initializes_all_keys() {
        let form = create_test_form();
        let snapshot = compute(&form, &[]);

        assert_eq!(snapshot.form_id, "form-1");
        assert_eq!(snapshot.by_field.len(), 4);
        assert_eq!(snapshot.stat("name", "responses"), Some(0.0));
        assert_eq!(snapshot.stat("rating", "avg"), Some(0.0));
        for n in 1..=5 {
            assert_eq!(snapshot.stat("rating", &format!("dist_{}", n)), Some(0.0));
        }
        for option in ["Technical", "Business", "Design"] {
            assert_eq!(snapshot.stat("track", option), Some(0.0));
        }
        assert_eq!(snapshot.field("improve").map(|s| s.len()), Some(5));
        assert!(snapshot.field("improve").unwrap().values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_multi_choice_counts_selected_options() {
        let form = create_test_form();
        let responses = vec![response(json!({"improve": ["Content", "Food"]}))];

        let snapshot = compute(&form, &responses);
        let improve = snapshot.field("improve").unwrap();

        assert_eq!(improve["Content"], 1.0);
        assert_eq!(improve["Food"], 1.0);
        assert_eq!(improve["Scheduling"], 0.0);
        assert_eq!(improve["Venue"], 0.0);
        assert_eq!(improve["Networking"], 0.0);
    }

    #[test]
    fn test_undeclared_option_is_ignored() {
        let form = create_test_form();
        let responses = vec![
            response(json!({"improve": ["Content", "Parking"]})),
            response(json!({"track": "Cooking"})),
        ];

        let snapshot = compute(&form, &responses);

        assert_eq!(snapshot.field("improve").unwrap().len(), 5);
        assert_eq!(snapshot.stat("improve", "Content"), Some(1.0));
        assert_eq!(snapshot.stat("improve", "Parking"), None);
        assert_eq!(snapshot.stat("track", "Cooking"), None);
        assert!(snapshot.field("track").unwrap().values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rating_average_and_distribution() {
        let form = create_test_form();
        let responses: Vec<Response> = [1, 1, 3, 5]
            .iter()
            .map(|r| response(json!({"rating": r})))
            .collect();

        let snapshot = compute(&form, &responses);

        assert_eq!(snapshot.stat("rating", "avg"), Some(2.5));
        assert_eq!(snapshot.stat("rating", "dist_1"), Some(2.0));
        assert_eq!(snapshot.stat("rating", "dist_2"), Some(0.0));
        assert_eq!(snapshot.stat("rating", "dist_3"), Some(1.0));
        assert_eq!(snapshot.stat("rating", "dist_4"), Some(0.0));
        assert_eq!(snapshot.stat("rating", "dist_5"), Some(1.0));
    }

    #[test]
    fn test_rating_numeric_encodings_share_bucket() {
        let form = create_test_form();
        let responses = vec![
            response(json!({"rating": 4})),
            response(json!({"rating": 4.0})),
        ];

        let snapshot = compute(&form, &responses);

        assert_eq!(snapshot.stat("rating", "dist_4"), Some(2.0));
        assert_eq!(snapshot.stat("rating", "avg"), Some(4.0));
    }

    #[test]
    fn test_rating_skips_malformed_values() {
        let form = create_test_form();
        let responses = vec![
            response(json!({"rating": 2})),
            response(json!({"rating": "5"})),
            response(json!({"rating": 0})),
            response(json!({"rating": 9})),
            response(json!({"rating": [3]})),
        ];

        let snapshot = compute(&form, &responses);

        assert_eq!(snapshot.stat("rating", "avg"), Some(2.0));
        assert_eq!(snapshot.stat("rating", "dist_2"), Some(1.0));
        assert_eq!(snapshot.stat("rating", "dist_9"), None);
        assert_eq!(snapshot.field("rating").unwrap().len(), 6);
    }

    #[test]
    fn test_rating_with_scale_one_has_two_buckets() {
        let mut form = create_test_form();
        form.fields[1].max = Some(1);

        let snapshot = compute(&form, &[]);

        assert_eq!(snapshot.stat("rating", "dist_1"), Some(0.0));
        assert_eq!(snapshot.stat("rating", "dist_2"), Some(0.0));
        assert_eq!(snapshot.stat("rating", "dist_3"), None);
    }

    #[test]
    fn test_oversized_stored_scale_is_capped() {
        let mut form = create_test_form();
        form.fields[1].max = Some(4_000_000_000);
        let responses = vec![
            response(json!({"rating": 100})),
            response(json!({"rating": 3_999_999_999u64})),
        ];

        let snapshot = compute(&form, &responses);
        let rating = snapshot.field("rating").unwrap();

        // avg plus one key per bucket
        assert_eq!(rating.len(), MAX_RATING_SCALE as usize + 1);
        assert_eq!(snapshot.stat("rating", "dist_100"), Some(1.0));
        assert_eq!(snapshot.stat("rating", "dist_101"), None);
        assert_eq!(snapshot.stat("rating", "avg"), Some(100.0));
    }

    #[test]
    fn test_text_counts_any_supplied_value() {
        let form = create_test_form();
        let responses = vec![
            response(json!({"name": "Alex"})),
            response(json!({"name": ""})),
            response(json!({"name": null})),
            response(json!({"rating": 3})),
        ];

        let snapshot = compute(&form, &responses);

        assert_eq!(snapshot.stat("name", "responses"), Some(2.0));
    }

    #[test]
    fn test_unknown_answer_keys_do_not_appear() {
        let form = create_test_form();
        let responses = vec![response(json!({"ghost": "boo", "name": "Sam"}))];

        let snapshot = compute(&form, &responses);

        assert!(snapshot.field("ghost").is_none());
        assert!(snapshot
            .by_field
            .keys()
            .all(|id| form.fields.iter().any(|f| &f.id == id)));
    }

    #[test]
    fn test_compute_is_order_independent() {
        let form = create_test_form();
        let mut responses = vec![
            response(json!({"name": "A", "rating": 5, "track": "Design", "improve": ["Food"]})),
            response(json!({"rating": 2, "track": "Technical"})),
            response(json!({"name": "B", "rating": 3, "improve": ["Venue", "Content"]})),
            response(json!({"rating": 1, "track": "Design", "improve": []})),
        ];

        let at = Utc::now();
        let forward = compute_at(&form, &responses, at);
        responses.reverse();
        let reversed = compute_at(&form, &responses, at);
        responses.swap(0, 2);
        let shuffled = compute_at(&form, &responses, at);

        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
    }
}
