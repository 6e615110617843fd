use std::sync::Arc;

use hospreg_core::{
    ApiClient, ClientEvent, EnvironmentResolver, MemoryStore, ServerSettings, SessionStore,
};
use tokio::sync::broadcast::Receiver;

pub struct Harness {
    pub client: ApiClient,
    pub store: Arc<MemoryStore>,
    pub events: Receiver<ClientEvent>,
}

pub fn harness_with(settings: ServerSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let environment = Arc::new(EnvironmentResolver::new(settings, store.clone()));
    let session = Arc::new(SessionStore::new(store.clone()));
    let client = ApiClient::new(environment, session).expect("client builds");
    let events = client.subscribe();
    Harness {
        client,
        store,
        events,
    }
}

pub fn harness(base_url: &str) -> Harness {
    harness_with(ServerSettings {
        mock_base_url: base_url.to_string(),
        prod_base_url: base_url.to_string(),
        ..ServerSettings::default()
    })
}

/// Everything published so far.
pub fn drain(events: &mut Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
