//! Live analytics hub.
//!
//! Connects the store, the aggregator and the broker: a recorded response
//! triggers a fresh snapshot for its form which is broadcast to everyone
//! watching that form, and a new watcher gets an initial snapshot before
//! waiting for broadcasts.

use crate::analysis;
use crate::broker::{Broker, Payload, Subscription};
use crate::error::AppError;
use crate::models::{Form, Response, Snapshot};
use crate::store::Store;
use crate::validation;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open stream of snapshots for one form.
#[derive(Debug)]
pub struct Watch {
    /// Serialized snapshot computed when the watch was opened.
    pub initial: Payload,
    /// Registration receiving later broadcasts; dropping it unsubscribes.
    pub subscription: Subscription,
}

/// Entry point for computing, publishing and watching form analytics.
#[derive(Clone)]
pub struct LiveAnalytics {
    store: Arc<dyn Store>,
    broker: Broker,
}

impl LiveAnalytics {
    /// Create a hub over a store and a broker.
    pub fn new(store: Arc<dyn Store>, broker: Broker) -> Self {
        Self { store, broker }
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The broker snapshots are published through.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Compute the current snapshot for a form from storage.
    pub fn snapshot(&self, form_id: &str) -> Result<Snapshot, AppError> {
        let form = self.store.find_form(form_id)?;
        self.snapshot_of(&form)
    }

    fn snapshot_of(&self, form: &Form) -> Result<Snapshot, AppError> {
        let responses = self.store.find_responses(&form.id)?;
        Ok(analysis::compute(form, &responses))
    }

    /// Validate and record a response, then publish the updated snapshot.
    ///
    /// The snapshot is recomputed from the full, freshly read response set.
    pub fn submit(&self, form_id: &str, body: &Value) -> Result<Response, AppError> {
        let form = self.store.find_form(form_id)?;
        let answers = validation::validate_answers(&form.fields, body)?;
        let response = self.store.insert_response(Response::new(&form.id, answers))?;

        info!(form_id = %form.id, response_id = %response.id, "Response recorded");

        // The response is stored; failing to re-read only costs this broadcast.
        match self.store.find_responses(&form.id) {
            Ok(responses) => self.publish(&form, &responses),
            Err(e) => warn!(form_id = %form.id, "Skipping broadcast, could not read responses: {}", e),
        }

        Ok(response)
    }

    /// Compute the snapshot for `form` and broadcast it to its watchers.
    pub fn publish(&self, form: &Form, responses: &[Response]) {
        if self.broker.subscriber_count(&form.id) == 0 {
            debug!(form_id = %form.id, "No watchers, skipping broadcast");
            return;
        }

        let snapshot = analysis::compute(form, responses);
        match serde_json::to_string(&snapshot) {
            Ok(json) => self.broker.broadcast(&form.id, json),
            Err(e) => warn!(form_id = %form.id, "Failed to serialize snapshot: {}", e),
        }
    }

    /// Start watching a form.
    ///
    /// Subscribes before computing the initial snapshot so a response
    /// recorded in between is never lost to both.
    pub fn watch(&self, form_id: &str) -> Result<Watch, AppError> {
        let form = self.store.find_form(form_id)?;
        let subscription = self.broker.subscribe(&form.id);
        let snapshot = self.snapshot_of(&form)?;
        let initial = Payload::from(serde_json::to_string(&snapshot)?);

        debug!(form_id = %subscription.topic(), subscriber = %subscription.id(), "Watch opened");

        Ok(Watch {
            initial,
            subscription,
        })
    }
}
