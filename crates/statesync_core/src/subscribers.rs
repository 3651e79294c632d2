use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::{CurrentStateRecord, ScopeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub type Subscriber = Box<dyn FnMut(&CurrentStateRecord, &mut Deferred) + Send>;

/// Mutation requested from inside a subscriber callback.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredMutation {
    pub scope: ScopeKey,
    pub key: String,
    pub value: Value,
}

/// Queue handed to subscribers. Mutations pushed here run after the current
/// fan-out has finished, in the order they were requested.
#[derive(Debug, Default)]
pub struct Deferred {
    queue: VecDeque<DeferredMutation>,
}

impl Deferred {
    pub fn set_fragment(&mut self, scope: &ScopeKey, key: impl Into<String>, value: Value) {
        self.queue.push_back(DeferredMutation {
            scope: scope.clone(),
            key: key.into(),
            value,
        });
    }

    pub fn pop(&mut self) -> Option<DeferredMutation> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Per-scope publish/subscribe registry. Fan-out is synchronous and follows
/// subscription order.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    by_scope: HashMap<ScopeKey, Vec<(SubscriptionId, Subscriber)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, scope: &ScopeKey, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&CurrentStateRecord, &mut Deferred) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let subscriber: Subscriber = Box::new(subscriber);
        self.by_scope
            .entry(scope.clone())
            .or_default()
            .push((id, subscriber));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.by_scope.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|(existing, _)| *existing != id);
            removed |= subscribers.len() != before;
            !subscribers.is_empty()
        });
        removed
    }

    pub fn subscriber_count(&self, scope: &ScopeKey) -> usize {
        self.by_scope.get(scope).map_or(0, Vec::len)
    }

    pub fn notify(&mut self, record: &CurrentStateRecord, deferred: &mut Deferred) {
        if let Some(subscribers) = self.by_scope.get_mut(&record.scope) {
            for (_, subscriber) in subscribers.iter_mut() {
                subscriber(record, deferred);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateData;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn record(scope: &ScopeKey) -> CurrentStateRecord {
        CurrentStateRecord::new(scope.clone(), StateData::new())
    }

    #[test]
    fn fan_out_follows_subscription_order_and_scope() {
        let table = ScopeKey::table("orders");
        let page = ScopeKey::page("orders");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        for label in ["first", "second"] {
            let seen = seen.clone();
            registry.subscribe(&table, move |_, _| seen.lock().unwrap().push(label));
        }
        let other = seen.clone();
        registry.subscribe(&page, move |_, _| other.lock().unwrap().push("page"));

        let mut deferred = Deferred::default();
        registry.notify(&record(&table), &mut deferred);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let scope = ScopeKey::global("prefs");
        let count = Arc::new(Mutex::new(0));
        let mut registry = SubscriberRegistry::new();
        let counter = count.clone();
        let id = registry.subscribe(&scope, move |_, _| *counter.lock().unwrap() += 1);

        let mut deferred = Deferred::default();
        registry.notify(&record(&scope), &mut deferred);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify(&record(&scope), &mut deferred);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(registry.subscriber_count(&scope), 0);
    }

    #[test]
    fn callbacks_queue_mutations_instead_of_applying_them() {
        let scope = ScopeKey::table("orders");
        let mut registry = SubscriberRegistry::new();
        registry.subscribe(&scope, |record, deferred| {
            deferred.set_fragment(&record.scope, "page", json!(1))
        });
        let mut deferred = Deferred::default();
        registry.notify(&record(&scope), &mut deferred);
        let queued = deferred.pop().unwrap();
        assert_eq!(queued.key, "page");
        assert!(deferred.is_empty());
    }
}
