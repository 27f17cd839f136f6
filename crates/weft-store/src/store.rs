use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use tracing::{debug, warn};

use weft_core::errors::TransportError;
use weft_core::flight::{Flight, FlightMap};
use weft_core::ids::IriId;
use weft_core::node::Node;
use weft_core::session::{PushTransport, SearchKind, Session};
use weft_jsonld::loader::DocumentLoader;
use weft_jsonld::Processor;

use crate::channels::{Channel, CollectionListener, ListenToken, ListenerId, RECONNECT_DELAY};
use crate::error::StoreError;
use crate::registry::{ChangeHandler, HandlerId, RegistrationToken};

/// Well-known ActivityStreams context URL, always the first entry of the
/// fixed compaction context.
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Identifier of the synthetic entry narrating the store's loading state.
pub fn store_state_id() -> IriId {
    IriId::internal("store-state")
}

/// Store construction settings.
#[derive(Default)]
pub struct StoreConfig {
    /// Deployment-specific render context appended to the compaction context
    /// after the ActivityStreams vocabulary.
    pub render_context: Option<String>,
    /// Entries placed in the cache before first use.
    pub preload: HashMap<IriId, Node>,
}

#[derive(Default)]
struct State {
    cache: HashMap<IriId, Node>,
    handlers: HashMap<IriId, Vec<(HandlerId, ChangeHandler)>>,
    channels: HashMap<IriId, Channel>,
}

/// Client-side entity store over a federated object graph.
///
/// One store owns the fetch pipeline (raw document, flatten, expand, compact
/// against a fixed context), a cache keyed by identifier with
/// congruence-diffed change notification, coalescing of concurrent fetches,
/// and push-channel subscriptions per collection.
pub struct EntityStore {
    weak: Weak<EntityStore>,
    session: Arc<dyn Session>,
    transport: Arc<dyn PushTransport>,
    processor: Processor,
    context: Json,
    state: Mutex<State>,
    inflight: FlightMap<IriId, Result<Node, StoreError>>,
}

/// Context resolution goes through the session so it rides the same
/// authentication as object fetches.
struct SessionLoader {
    session: Arc<dyn Session>,
}

#[async_trait]
impl DocumentLoader for SessionLoader {
    async fn load(&self, url: &str) -> Result<Json, TransportError> {
        self.session.fetch_document(url).await
    }
}

impl EntityStore {
    pub fn new(
        session: Arc<dyn Session>,
        transport: Arc<dyn PushTransport>,
        config: StoreConfig,
    ) -> Arc<Self> {
        let loader = Arc::new(SessionLoader { session: session.clone() });
        let context = match &config.render_context {
            Some(render) => json!([ACTIVITYSTREAMS_CONTEXT, render]),
            None => json!([ACTIVITYSTREAMS_CONTEXT]),
        };

        let store = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            session,
            transport,
            processor: Processor::new(loader),
            context,
            state: Mutex::new(State::default()),
            inflight: FlightMap::new(),
        });

        for (id, node) in config.preload {
            store.add_to_cache(&id, node);
        }
        store.update_status();
        store
    }

    /// The document cache behind the pipeline, for seeding well-known
    /// context documents.
    pub fn documents(&self) -> &weft_jsonld::DocumentCache {
        self.processor.documents()
    }

    /// Current cache entry for `id`, if any. Never fetches.
    pub fn cached(&self, id: &IriId) -> Option<Node> {
        self.state.lock().cache.get(id).cloned()
    }

    /// Resolve an identifier to its node, fetching if needed.
    ///
    /// With `use_cache` a cached entry short-circuits. Either way a fetch
    /// already in flight for `id` is shared rather than duplicated; followers
    /// get a clone of the settled result, or `FetchAborted` if the driving
    /// call went away without settling.
    pub async fn get(&self, id: &IriId, use_cache: bool) -> Result<Node, StoreError> {
        if use_cache {
            if let Some(node) = self.state.lock().cache.get(id).cloned() {
                return Ok(node);
            }
        }

        match self.inflight.begin(id.clone()) {
            Flight::Leader(guard) => {
                self.update_status();
                let result = self.process_get(id, None).await;
                guard.settle(&result);
                self.update_status();
                result
            }
            Flight::Follower(rx) => rx.await.unwrap_or(Err(StoreError::FetchAborted)),
        }
    }

    /// Run one document through the pipeline and fold every member into the
    /// cache. `inline` skips the fetch, as push dispatch does.
    async fn process_get(&self, id: &IriId, inline: Option<Json>) -> Result<Node, StoreError> {
        let doc = match inline {
            Some(doc) => doc,
            None => self.session.fetch_object(id).await?,
        };

        let expanded = self.processor.expand(&doc).await?;
        let nodes = self.processor.compact(&expanded, &self.context).await?;

        for node in nodes {
            match node.id.clone() {
                Some(node_id) => self.add_to_cache(&node_id, node),
                None => debug!(requested = %id, "dropping graph member without identifier"),
            }
        }

        // the document may answer under its own identifier instead of the
        // requested one
        let doc_id = doc_identifier(&doc);
        let state = self.state.lock();
        if let Some(node) = state.cache.get(id) {
            return Ok(node.clone());
        }
        if let Some(node) = doc_id.and_then(|fallback| state.cache.get(&fallback)) {
            return Ok(node.clone());
        }
        Err(StoreError::MissingObject { id: id.to_string() })
    }

    /// Insert under `id`, suppressing congruent rewrites. Change handlers for
    /// `id` run synchronously after the swap, outside the lock.
    fn add_to_cache(&self, id: &IriId, node: Node) {
        let (prev, handlers) = {
            let mut state = self.state.lock();
            let prev = state.cache.get(id).cloned();
            if let Some(prev) = &prev {
                if prev.congruent(&node) {
                    return;
                }
            }
            state.cache.insert(id.clone(), node.clone());
            let handlers: Vec<ChangeHandler> = state
                .handlers
                .get(id)
                .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default();
            (prev, handlers)
        };

        for handler in handlers {
            handler(prev.as_ref(), &node);
        }
    }

    /// Refresh the synthetic status entry from the in-flight and cache
    /// counts. Goes through the normal diff path, so watchers of the status
    /// identifier see every transition.
    fn update_status(&self) {
        let flights = self.inflight.keys();
        let status = match flights.len() {
            0 => format!("Loaded {} items in cache", self.state.lock().cache.len()),
            1 => format!("Loading {}...", flights[0]),
            n => format!("Loading {n} items..."),
        };

        let id = store_state_id();
        let mut node = Node::new(id.clone());
        node.set("status", status);
        self.add_to_cache(&id, node);
    }

    /// Attach change handlers. Each pair maps an identifier to a handler
    /// invoked on every non-congruent rewrite of that entry. Passing an
    /// existing token merges the new registrations into it.
    pub fn register(
        &self,
        handlers: Vec<(IriId, ChangeHandler)>,
        existing: Option<RegistrationToken>,
    ) -> RegistrationToken {
        let mut token = existing.unwrap_or_default();
        let mut state = self.state.lock();
        for (id, handler) in handlers {
            let handler_id = HandlerId::new();
            state
                .handlers
                .entry(id.clone())
                .or_default()
                .push((handler_id.clone(), handler));
            token.entries.push((id, handler_id));
        }
        token
    }

    /// Detach every handler the token tracks. Draining makes a second pass
    /// over the same token a no-op.
    pub fn deregister(&self, token: &mut RegistrationToken) {
        let mut state = self.state.lock();
        for (id, handler_id) in token.entries.drain(..) {
            if let Some(entries) = state.handlers.get_mut(&id) {
                entries.retain(|(hid, _)| *hid != handler_id);
                if entries.is_empty() {
                    state.handlers.remove(&id);
                }
            }
        }
    }

    /// Subscribe to a collection's push channel. The first listener opens
    /// the channel; later listeners share it.
    pub fn listen(&self, collection: &IriId, listener: CollectionListener) -> ListenToken {
        let id = ListenerId::new();
        let mut state = self.state.lock();
        let channel = state.channels.entry(collection.clone()).or_insert_with(|| {
            let url = self.session.push_url(collection);
            debug!(collection = %collection, "opening push channel");
            let task = tokio::spawn(run_channel(self.weak.clone(), collection.clone(), url));
            Channel { listeners: Vec::new(), task }
        });
        channel.listeners.push((id.clone(), listener));
        ListenToken { collection: collection.clone(), id }
    }

    /// Remove one listener. The channel closes when the last one leaves;
    /// a dispatch already running for the current message still completes.
    pub fn unlisten(&self, token: ListenToken) {
        let mut state = self.state.lock();
        let Some(channel) = state.channels.get_mut(&token.collection) else {
            return;
        };
        channel.listeners.retain(|(id, _)| *id != token.id);
        if channel.listeners.is_empty() {
            if let Some(channel) = state.channels.remove(&token.collection) {
                channel.task.abort();
                debug!(collection = %token.collection, "closed push channel");
            }
        }
    }

    /// Server-side search. Identified results are parsed and written
    /// straight into the cache without the diff/notify pass, mirroring how
    /// the search surface has always behaved.
    pub async fn search(&self, kind: SearchKind, query: &str) -> Result<Vec<Node>, StoreError> {
        let results = self.session.search(kind, query).await?;
        let nodes: Vec<Node> = results.iter().filter_map(Node::from_json).collect();

        {
            let mut state = self.state.lock();
            for node in &nodes {
                if let Some(id) = node.id.clone() {
                    state.cache.insert(id, node.clone());
                }
            }
        }
        Ok(nodes)
    }

    /// Place a node under the reserved synthetic namespace and return its
    /// qualified identifier.
    pub fn internal(&self, name: &str, mut node: Node) -> IriId {
        let id = IriId::internal(name);
        node.id = Some(id.clone());
        self.add_to_cache(&id, node);
        id
    }

    /// Drop every cache entry, then refetch each identifier that still has a
    /// registered change handler, excluding the reserved namespace.
    /// Refetches run as background tasks through the normal coalescing path.
    pub fn clear(&self) {
        let watched: Vec<IriId> = {
            let mut state = self.state.lock();
            state.cache.clear();
            state
                .handlers
                .keys()
                .filter(|id| !id.is_internal())
                .cloned()
                .collect()
        };

        if let Some(store) = self.weak.upgrade() {
            for id in watched {
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(error) = store.get(&id, false).await {
                        warn!(id = %id, error = %error, "refetch after clear failed");
                    }
                });
            }
        }
        self.update_status();
    }

    /// Process one pushed document and notify the collection's listeners
    /// with the resolved identifier.
    async fn dispatch(&self, collection: &IriId, doc: Json) {
        let Some(id) = doc_identifier(&doc) else {
            debug!(collection = %collection, "dropping pushed payload without identifier");
            return;
        };

        match self.process_get(&id, Some(doc)).await {
            Ok(node) => {
                self.update_status();
                let resolved = node.id.clone().unwrap_or(id);
                let listeners: Vec<CollectionListener> = {
                    let state = self.state.lock();
                    state
                        .channels
                        .get(collection)
                        .map(|channel| {
                            channel.listeners.iter().map(|(_, l)| l.clone()).collect()
                        })
                        .unwrap_or_default()
                };
                for listener in listeners {
                    listener(&resolved);
                }
            }
            Err(error) => {
                self.update_status();
                warn!(collection = %collection, error = %error, "failed to process pushed document");
            }
        }
    }
}

fn doc_identifier(doc: &Json) -> Option<IriId> {
    let id = doc.get("id").or_else(|| doc.get("@id"))?.as_str()?;
    Some(IriId::new(id))
}

/// Drive one push channel: open the stream, dispatch each document, and
/// reopen after the stream ends or the open fails. Holds the store weakly so
/// an abandoned store shuts its channels down. Each document dispatches on a
/// task of its own, so tearing the channel down aborts only this loop and
/// never the message currently being processed.
async fn run_channel(store: Weak<EntityStore>, collection: IriId, url: String) {
    loop {
        let Some(strong) = store.upgrade() else { return };
        let transport = strong.transport.clone();
        drop(strong);

        match transport.open(&url).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    let Some(strong) = store.upgrade() else { return };
                    match item {
                        Ok(doc) => {
                            // an abort lands here, between messages; the
                            // detached dispatch task runs to completion
                            let delivery = tokio::spawn({
                                let collection = collection.clone();
                                async move { strong.dispatch(&collection, doc).await }
                            });
                            let _ = delivery.await;
                        }
                        Err(error) => {
                            warn!(collection = %collection, error = %error, "push channel error");
                        }
                    }
                }
                debug!(collection = %collection, "push channel ended, reconnecting");
            }
            Err(error) => {
                warn!(collection = %collection, error = %error, "push channel open failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use weft_client::mock::{MockPush, MockSession};
    use weft_core::node::Value;

    const AS: &str = ACTIVITYSTREAMS_CONTEXT;

    fn as_context_doc() -> Json {
        json!({"@context": {
            "as": "https://www.w3.org/ns/activitystreams#",
            "id": "@id",
            "type": "@type",
            "name": {"@id": "as:name"},
            "summary": {"@id": "as:summary"},
            "mention": {"@id": "as:mention", "@type": "@id"}
        }})
    }

    fn note(id: &str, name: &str) -> Json {
        json!({"@context": AS, "id": id, "type": "Note", "name": name})
    }

    struct Fixture {
        session: Arc<MockSession>,
        push: Arc<MockPush>,
        store: Arc<EntityStore>,
    }

    fn fixture() -> Fixture {
        fixture_with(StoreConfig::default())
    }

    fn fixture_with(config: StoreConfig) -> Fixture {
        let session = Arc::new(MockSession::new());
        session.insert_document(AS, as_context_doc());
        let push = Arc::new(MockPush::new());
        let store = EntityStore::new(session.clone(), push.clone(), config);
        Fixture { session, push, store }
    }

    fn counting_handler(counter: &Arc<AtomicUsize>) -> ChangeHandler {
        let counter = counter.clone();
        Arc::new(move |_: Option<&Node>, _: &Node| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Park behind any background dispatch; paused-clock runtimes advance
    /// once every task is idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn fetch_promotes_embedded_objects_into_the_cache() {
        let f = fixture();
        f.session.insert_object(
            "https://ex/1",
            json!({
                "@context": AS,
                "id": "https://ex/1",
                "name": "outer",
                "mention": {"id": "https://ex/2", "name": "x"}
            }),
        );

        let node = f.store.get(&IriId::new("https://ex/1"), true).await.unwrap();
        assert_eq!(node.get("mention"), &[Value::Ref(IriId::new("https://ex/2"))]);

        let embedded = f.store.cached(&IriId::new("https://ex/2")).unwrap();
        assert_eq!(embedded.get("name"), &[Value::from("x")]);
        assert_eq!(f.session.fetch_count(), 1);
    }

    #[tokio::test]
    async fn cache_hits_do_not_refetch() {
        let f = fixture();
        f.session.insert_object("https://ex/1", note("https://ex/1", "a"));
        let id = IriId::new("https://ex/1");

        f.store.get(&id, true).await.unwrap();
        f.store.get(&id, true).await.unwrap();
        assert_eq!(f.session.fetch_count(), 1);

        f.store.get(&id, false).await.unwrap();
        assert_eq!(f.session.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_gets_share_one_fetch() {
        let f = fixture();
        f.session.delay_object(
            "https://ex/1",
            Duration::from_millis(50),
            note("https://ex/1", "slow"),
        );
        let id = IriId::new("https://ex/1");

        let a = {
            let store = f.store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.get(&id, true).await })
        };
        let b = {
            let store = f.store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.get(&id, true).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(a.congruent(&b));
        assert_eq!(f.session.fetch_count(), 1);
    }

    #[tokio::test]
    async fn congruent_refetches_stay_silent() {
        let f = fixture();
        let id = IriId::new("https://ex/1");
        f.session.insert_object("https://ex/1", note("https://ex/1", "_:b0"));

        let notified = Arc::new(AtomicUsize::new(0));
        let mut token = f
            .store
            .register(vec![(id.clone(), counting_handler(&notified))], None);

        f.store.get(&id, true).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // same shape, different blank label: congruent, no notification
        f.session.insert_object("https://ex/1", note("https://ex/1", "_:b1"));
        f.store.get(&id, false).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // a real change notifies
        f.session.insert_object("https://ex/1", note("https://ex/1", "renamed"));
        f.store.get(&id, false).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 2);

        f.store.deregister(&mut token);
    }

    #[tokio::test]
    async fn handlers_see_previous_and_new_values() {
        let f = fixture();
        let id = IriId::new("https://ex/1");
        f.session.insert_object("https://ex/1", note("https://ex/1", "first"));

        let seen: Arc<Mutex<Vec<(Option<String>, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let handler: ChangeHandler = Arc::new(move |prev: Option<&Node>, new: &Node| {
            log.lock().push((
                prev.map(|p| p.take_str("name", "").to_owned()),
                new.take_str("name", "").to_owned(),
            ));
        });
        let _token = f.store.register(vec![(id.clone(), handler)], None);

        f.store.get(&id, true).await.unwrap();
        f.session.insert_object("https://ex/1", note("https://ex/1", "second"));
        f.store.get(&id, false).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], (None, "first".to_owned()));
        assert_eq!(seen[1], (Some("first".to_owned()), "second".to_owned()));
    }

    #[tokio::test]
    async fn handlers_on_one_entry_run_in_registration_order() {
        let f = fixture();
        let id = IriId::new("https://ex/1");
        f.session.insert_object("https://ex/1", note("https://ex/1", "a"));

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let order = order.clone();
            Arc::new(move |_: Option<&Node>, _: &Node| order.lock().push("first")) as ChangeHandler
        };
        let second = {
            let order = order.clone();
            Arc::new(move |_: Option<&Node>, _: &Node| order.lock().push("second")) as ChangeHandler
        };
        let token = f.store.register(vec![(id.clone(), first)], None);
        let _token = f.store.register(vec![(id.clone(), second)], Some(token));

        f.store.get(&id, true).await.unwrap();
        assert_eq!(order.lock().as_slice(), &["first", "second"]);

        f.session.insert_object("https://ex/1", note("https://ex/1", "b"));
        f.store.get(&id, false).await.unwrap();
        assert_eq!(
            order.lock().as_slice(),
            &["first", "second", "first", "second"]
        );
    }

    #[tokio::test]
    async fn deregistered_handlers_fall_silent() {
        let f = fixture();
        let id = IriId::new("https://ex/1");
        f.session.insert_object("https://ex/1", note("https://ex/1", "a"));

        let notified = Arc::new(AtomicUsize::new(0));
        let mut token = f
            .store
            .register(vec![(id.clone(), counting_handler(&notified))], None);

        f.store.get(&id, true).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        f.store.deregister(&mut token);
        assert!(token.is_empty());

        f.session.insert_object("https://ex/1", note("https://ex/1", "b"));
        f.store.get(&id, false).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // a drained token deregisters to nothing
        f.store.deregister(&mut token);
    }

    #[tokio::test]
    async fn register_merges_into_an_existing_token() {
        let f = fixture();
        let notified = Arc::new(AtomicUsize::new(0));

        let token = f.store.register(
            vec![(IriId::new("https://ex/1"), counting_handler(&notified))],
            None,
        );
        let mut token = f.store.register(
            vec![(IriId::new("https://ex/2"), counting_handler(&notified))],
            Some(token),
        );
        assert_eq!(token.len(), 2);

        f.session.insert_object("https://ex/1", note("https://ex/1", "a"));
        f.session.insert_object("https://ex/2", note("https://ex/2", "b"));
        f.store.get(&IriId::new("https://ex/1"), true).await.unwrap();
        f.store.get(&IriId::new("https://ex/2"), true).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 2);

        f.store.deregister(&mut token);
        assert!(token.is_empty());
    }

    #[tokio::test]
    async fn fetch_errors_propagate_and_release_the_flight() {
        let f = fixture();
        let id = IriId::new("https://ex/1");
        f.session
            .fail_object("https://ex/1", TransportError::from_status(500, "https://ex/1"));

        let err = f.store.get(&id, true).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));

        f.session.insert_object("https://ex/1", note("https://ex/1", "recovered"));
        let node = f.store.get(&id, true).await.unwrap();
        assert_eq!(node.take_str("name", ""), "recovered");
        assert_eq!(f.session.fetch_count(), 2);
    }

    #[tokio::test]
    async fn documents_without_a_usable_object_are_missing() {
        let f = fixture();
        f.session
            .insert_object("https://ex/1", json!({"@context": AS, "name": "anonymous"}));

        let err = f.store.get(&IriId::new("https://ex/1"), true).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingObject { .. }));
    }

    #[tokio::test]
    async fn a_document_answering_under_another_id_still_resolves() {
        let f = fixture();
        f.session
            .insert_object("https://ex/alias", note("https://ex/canonical", "c"));

        let node = f.store.get(&IriId::new("https://ex/alias"), true).await.unwrap();
        assert_eq!(node.id.as_ref().unwrap().as_str(), "https://ex/canonical");
    }

    #[tokio::test(start_paused = true)]
    async fn the_status_entry_narrates_loading() {
        let f = fixture();
        let statuses: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log = statuses.clone();
        let _token = f.store.register(
            vec![(
                store_state_id(),
                Arc::new(move |_: Option<&Node>, new: &Node| {
                    log.lock().push(new.take_str("status", "").to_owned());
                }) as ChangeHandler,
            )],
            None,
        );

        f.session.delay_object(
            "https://ex/1",
            Duration::from_millis(50),
            note("https://ex/1", "a"),
        );
        let store = f.store.clone();
        let task = tokio::spawn(async move { store.get(&IriId::new("https://ex/1"), true).await });
        task.await.unwrap().unwrap();

        let statuses = statuses.lock();
        assert!(
            statuses.contains(&"Loading https://ex/1...".to_owned()),
            "got: {statuses:?}"
        );
        assert_eq!(statuses.last().unwrap(), "Loaded 2 items in cache");
    }

    #[tokio::test(start_paused = true)]
    async fn the_status_entry_counts_parallel_loads() {
        let f = fixture();
        f.session
            .delay_object("https://ex/a", Duration::from_millis(50), note("https://ex/a", "a"));
        f.session
            .delay_object("https://ex/b", Duration::from_millis(50), note("https://ex/b", "b"));

        let statuses: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log = statuses.clone();
        let _token = f.store.register(
            vec![(
                store_state_id(),
                Arc::new(move |_: Option<&Node>, new: &Node| {
                    log.lock().push(new.take_str("status", "").to_owned());
                }) as ChangeHandler,
            )],
            None,
        );

        let ta = {
            let store = f.store.clone();
            tokio::spawn(async move { store.get(&IriId::new("https://ex/a"), true).await })
        };
        tokio::task::yield_now().await;
        let tb = {
            let store = f.store.clone();
            tokio::spawn(async move { store.get(&IriId::new("https://ex/b"), true).await })
        };

        ta.await.unwrap().unwrap();
        tb.await.unwrap().unwrap();

        let statuses = statuses.lock();
        assert!(
            statuses.contains(&"Loading 2 items...".to_owned()),
            "got: {statuses:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn listener_lifecycle_opens_and_closes_the_channel() {
        let f = fixture();
        let coll = IriId::new("https://ex/coll");

        let hits_a = Arc::new(AtomicUsize::new(0));
        let hits_b = Arc::new(AtomicUsize::new(0));
        let (ca, cb) = (hits_a.clone(), hits_b.clone());

        let ta = f.store.listen(
            &coll,
            Arc::new(move |_: &IriId| {
                ca.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let tb = f.store.listen(
            &coll,
            Arc::new(move |_: &IriId| {
                cb.fetch_add(1, Ordering::SeqCst);
            }),
        );
        settle().await;
        assert!(f.push.is_open("https://ex/coll"));
        assert_eq!(f.push.open_count(), 1);

        assert!(f.push.emit("https://ex/coll", note("https://ex/3", "pushed")));
        settle().await;
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);

        f.store.unlisten(ta);
        assert!(f.push.emit("https://ex/coll", note("https://ex/3", "pushed again")));
        settle().await;
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 2);
        assert!(f.push.is_open("https://ex/coll"));

        f.store.unlisten(tb);
        settle().await;
        assert!(!f.push.is_open("https://ex/coll"));
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_documents_land_in_cache_and_notify() {
        let f = fixture();
        let coll = IriId::new("https://ex/coll");

        let seen: Arc<Mutex<Vec<IriId>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _token = f.store.listen(
            &coll,
            Arc::new(move |id: &IriId| {
                log.lock().push(id.clone());
            }),
        );
        settle().await;

        assert!(f.push.emit("https://ex/coll", note("https://ex/3", "pushed")));
        settle().await;

        assert_eq!(seen.lock().as_slice(), &[IriId::new("https://ex/3")]);
        let node = f.store.cached(&IriId::new("https://ex/3")).unwrap();
        assert_eq!(node.take_str("name", ""), "pushed");
        // inline processing never fetched the object
        assert_eq!(f.session.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_channel_lets_the_current_dispatch_finish() {
        let f = fixture();
        // the context load stalls the dispatch mid-pipeline
        f.session.delay_document(AS, Duration::from_millis(50), as_context_doc());
        let coll = IriId::new("https://ex/coll");

        let notified = Arc::new(AtomicUsize::new(0));
        let _token = f.store.register(
            vec![(IriId::new("https://ex/9"), counting_handler(&notified))],
            None,
        );

        let heard = Arc::new(AtomicUsize::new(0));
        let log = heard.clone();
        let watch = f.store.listen(
            &coll,
            Arc::new(move |_: &IriId| {
                log.fetch_add(1, Ordering::SeqCst);
            }),
        );
        settle().await;

        assert!(f.push.emit("https://ex/coll", note("https://ex/9", "pushed")));
        // let the dispatch suspend on the context load before closing
        tokio::time::sleep(Duration::from_millis(5)).await;
        f.store.unlisten(watch);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let node = f.store.cached(&IriId::new("https://ex/9")).unwrap();
        assert_eq!(node.take_str("name", ""), "pushed");
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        // the channel closed before the dispatch settled, so its listener
        // never hears the late arrival
        assert_eq!(heard.load(Ordering::SeqCst), 0);
        assert!(!f.push.is_open("https://ex/coll"));
    }

    #[tokio::test(start_paused = true)]
    async fn push_channels_reconnect_after_the_stream_ends() {
        let f = fixture();
        let coll = IriId::new("https://ex/coll");
        let _token = f.store.listen(&coll, Arc::new(|_: &IriId| {}));
        settle().await;
        assert_eq!(f.push.open_count(), 1);

        f.push.close("https://ex/coll");
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(f.push.open_count(), 2);
        assert!(f.push.is_open("https://ex/coll"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_channel_opens_retry() {
        let f = fixture();
        f.push.fail_next_opens(1);
        let _token = f.store.listen(&IriId::new("https://ex/coll"), Arc::new(|_: &IriId| {}));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(f.push.open_count(), 1);
        assert!(f.push.is_open("https://ex/coll"));
    }

    #[tokio::test(start_paused = true)]
    async fn push_channels_carry_the_session_token() {
        let session = Arc::new(MockSession::with_token("s3cret"));
        session.insert_document(AS, as_context_doc());
        let push = Arc::new(MockPush::new());
        let store = EntityStore::new(session.clone(), push.clone(), StoreConfig::default());

        let _token = store.listen(&IriId::new("https://ex/coll"), Arc::new(|_: &IriId| {}));
        settle().await;
        assert!(push.is_open("https://ex/coll?authorization=s3cret"));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_empties_and_refetches_watched_entries() {
        let f = fixture();
        let id = IriId::new("https://ex/1");
        f.session.insert_object("https://ex/1", note("https://ex/1", "v1"));
        f.store.get(&id, true).await.unwrap();
        assert_eq!(f.session.fetch_count(), 1);

        let notified = Arc::new(AtomicUsize::new(0));
        let _token = f
            .store
            .register(vec![(id.clone(), counting_handler(&notified))], None);
        // internal entries are watched but never refetched
        let _status_token = f.store.register(
            vec![(store_state_id(), Arc::new(|_: Option<&Node>, _: &Node| {}) as ChangeHandler)],
            None,
        );

        f.store.clear();
        assert!(f.store.cached(&id).is_none());
        settle().await;

        assert_eq!(f.session.fetch_count(), 2);
        let node = f.store.cached(&id).unwrap();
        assert_eq!(node.take_str("name", ""), "v1");
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn search_results_enter_the_cache_silently() {
        let f = fixture();
        f.session.set_search_results(vec![
            json!({"id": "https://ex/s1", "name": ["found"]}),
            json!({"name": "anonymous"}),
        ]);

        let notified = Arc::new(AtomicUsize::new(0));
        let _token = f.store.register(
            vec![(IriId::new("https://ex/s1"), counting_handler(&notified))],
            None,
        );

        let results = f.store.search(SearchKind::Actor, "fou").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(f.store.cached(&IriId::new("https://ex/s1")).is_some());
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn internal_entries_live_under_the_reserved_namespace() {
        let f = fixture();
        let mut profile = Node::anonymous();
        profile.set("name", "me");

        let id = f.store.internal("profile", profile);
        assert_eq!(id.as_str(), "weft:profile");

        let cached = f.store.cached(&id).unwrap();
        assert_eq!(cached.take_str("name", ""), "me");
        assert_eq!(cached.id.as_ref().unwrap(), &id);
    }

    #[tokio::test]
    async fn preloaded_entries_are_served_from_cache() {
        let mut config = StoreConfig::default();
        let mut node = Node::new("https://ex/pre");
        node.set("name", "warm");
        config.preload.insert(IriId::new("https://ex/pre"), node);

        let f = fixture_with(config);
        let got = f.store.get(&IriId::new("https://ex/pre"), true).await.unwrap();
        assert_eq!(got.take_str("name", ""), "warm");
        assert_eq!(f.session.fetch_count(), 0);
    }
}
