use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::storage::{KeyValueStore, StorageKey};

/// "Who am I" endpoints tried in order when no account is known or the
/// account lookup fails.
pub const FALLBACK_IDENTITY_PATHS: [&str; 2] = ["/api/patients/me", "/user/info"];

/// Remote identity resolution used by [`SessionStore::ensure_patient_id`].
pub trait IdentityLookup {
    /// Resolve the patient id bound to a login account.
    fn lookup_patient_id(
        &self,
        account: &str,
    ) -> impl Future<Output = Result<Option<String>, ApiError>> + Send;

    /// Fetch the unwrapped body of a "current identity" endpoint.
    fn current_identity(&self, path: &str)
    -> impl Future<Output = Result<Value, ApiError>> + Send;
}

/// Snapshot of the signed-in user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_info: Map<String, Value>,
    pub patient_id: Option<String>,
    pub account: Option<String>,
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        !self.token.is_empty() && self.patient_id.is_some()
    }
}

/// Holds the token and profile, mirrored into a [`KeyValueStore`].
/// Persistence is best-effort: failures are logged and memory stays authoritative.
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    state: RwLock<Session>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("logged_in", &self.is_logged_in())
            .field("patient_id", &self.patient_id())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: RwLock::new(Session::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persisted(&self, key: StorageKey) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to read persisted session entry");
                None
            }
        }
    }

    fn persist(&self, key: StorageKey, value: Option<&str>) {
        let result = match value {
            Some(value) => self.store.set(key, value),
            None => self.store.remove(key),
        };
        if let Err(err) = result {
            warn!(key = %key, error = %err, "Failed to persist session entry");
        }
    }

    /// Restore the session from persisted storage. Never fails.
    pub fn hydrate(&self) {
        let token = self.persisted(StorageKey::Token).unwrap_or_default();
        let profile = self
            .persisted(StorageKey::User)
            .and_then(|raw| parse_profile(&raw))
            .or_else(|| {
                self.persisted(StorageKey::UserInfo)
                    .and_then(|raw| parse_profile(&raw))
            })
            .map(normalize_profile);
        let account = self
            .persisted(StorageKey::Account)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        let mut state = self.write();
        state.token = token.trim().to_string();
        state.patient_id = profile.as_ref().and_then(extract_patient_id);
        state.user_info = profile.unwrap_or_default();
        state.account = account;
        debug!(
            has_token = !state.token.is_empty(),
            patient_id = ?state.patient_id,
            "Session hydrated"
        );
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        let state = self.read();
        (!state.token.is_empty()).then(|| state.token.clone())
    }

    pub fn user(&self) -> Option<Map<String, Value>> {
        let state = self.read();
        (!state.user_info.is_empty()).then(|| state.user_info.clone())
    }

    pub fn patient_id(&self) -> Option<String> {
        self.read().patient_id.clone()
    }

    pub fn account(&self) -> Option<String> {
        self.read().account.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_logged_in()
    }

    /// Replace the token; an empty token clears it.
    pub fn set_token(&self, token: &str) {
        let token = token.trim();
        self.write().token = token.to_string();
        self.persist(StorageKey::Token, (!token.is_empty()).then_some(token));
    }

    /// Drop only the token, keeping the profile (used on HTTP 401).
    pub fn invalidate_token(&self) {
        self.set_token("");
    }

    pub fn set_account(&self, account: &str) {
        let account = account.trim();
        self.write().account = (!account.is_empty()).then(|| account.to_string());
        self.persist(StorageKey::Account, (!account.is_empty()).then_some(account));
    }

    /// Store a profile, normalizing its patient id. Accepts an object or a
    /// JSON string holding one; `null` clears the profile. Anything else is ignored.
    pub fn set_user(&self, profile: Value) {
        let profile = match profile {
            Value::Object(map) => map,
            Value::String(raw) => match parse_profile(&raw) {
                Some(map) => map,
                None => {
                    debug!("Ignoring non-JSON profile string");
                    return;
                }
            },
            Value::Null => {
                self.clear_profile();
                return;
            }
            _ => {
                debug!("Ignoring non-object profile");
                return;
            }
        };

        let profile = normalize_profile(profile);
        let patient_id = extract_patient_id(&profile);
        let account = profile
            .get("account")
            .and_then(Value::as_str)
            .map(str::to_string);

        let serialized = Value::Object(profile.clone()).to_string();
        {
            let mut state = self.write();
            state.user_info = profile;
            state.patient_id = patient_id;
        }
        self.persist(StorageKey::User, Some(&serialized));
        self.persist(StorageKey::UserInfo, Some(&serialized));
        if let Some(account) = account {
            self.set_account(&account);
        }
    }

    /// Merge fields into the current profile rather than replacing it.
    pub fn merge_user(&self, fields: Map<String, Value>) {
        let mut merged = self.read().user_info.clone();
        merged.extend(fields);
        self.set_user(Value::Object(merged));
    }

    fn remember_patient_id(&self, patient_id: &str) {
        let mut fields = Map::new();
        fields.insert(
            "patientId".to_string(),
            Value::String(patient_id.to_string()),
        );
        self.merge_user(fields);
    }

    fn clear_profile(&self) {
        {
            let mut state = self.write();
            state.user_info = Map::new();
            state.patient_id = None;
        }
        self.persist(StorageKey::User, None);
        self.persist(StorageKey::UserInfo, None);
    }

    /// Return the cached patient id, or resolve it remotely. Never fails;
    /// every lookup error reads as "not found".
    pub async fn ensure_patient_id(&self, lookup: &impl IdentityLookup) -> Option<String> {
        if let Some(patient_id) = self.patient_id() {
            return Some(patient_id);
        }

        if let Some(account) = self.account() {
            match lookup.lookup_patient_id(&account).await {
                Ok(Some(patient_id)) => {
                    info!(patient_id = %patient_id, "Resolved patient id from account");
                    self.remember_patient_id(&patient_id);
                    return Some(patient_id);
                }
                Ok(None) => debug!(account = %account, "Account lookup returned no patient id"),
                Err(err) => debug!(account = %account, error = %err, "Account lookup failed"),
            }
        }

        for path in FALLBACK_IDENTITY_PATHS {
            match lookup.current_identity(path).await {
                Ok(body) => {
                    let found = match &body {
                        Value::Object(map) => extract_patient_id(map),
                        other => id_from_value(other),
                    };
                    if let Some(patient_id) = found {
                        info!(patient_id = %patient_id, path, "Resolved patient id from identity endpoint");
                        self.remember_patient_id(&patient_id);
                        return Some(patient_id);
                    }
                    debug!(path, "Identity endpoint carried no patient id");
                }
                Err(err) => debug!(path, error = %err, "Identity endpoint failed"),
            }
        }

        None
    }

    /// Clear the session in memory and every persisted identity key.
    pub fn logout(&self) {
        *self.write() = Session::default();
        for key in [
            StorageKey::Token,
            StorageKey::User,
            StorageKey::UserInfo,
            StorageKey::Account,
        ] {
            self.persist(key, None);
        }
        info!("Session cleared");
    }
}

/// Parse a persisted profile; strings that do not look like JSON objects or
/// arrays, or fail to parse, read as absent.
fn parse_profile(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn normalize_profile(mut profile: Map<String, Value>) -> Map<String, Value> {
    let has_patient_id = profile
        .get("patientId")
        .and_then(id_from_value)
        .is_some();
    if !has_patient_id {
        if let Some(patient_id) = extract_patient_id(&profile) {
            profile.insert("patientId".to_string(), Value::String(patient_id));
        }
    }
    profile
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn first_id(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(id_from_value))
}

/// Patient id of a profile, in priority order:
/// `patientId|id|userId`, `patient.{patientId|id}`, `user.{patientId|id}`,
/// then the first present of `profile`/`account`/`data` and its
/// `patientId|id|userId`.
pub fn extract_patient_id(profile: &Map<String, Value>) -> Option<String> {
    if let Some(id) = first_id(profile, &["patientId", "id", "userId"]) {
        return Some(id);
    }
    for nested in ["patient", "user"] {
        if let Some(id) = profile
            .get(nested)
            .and_then(Value::as_object)
            .and_then(|inner| first_id(inner, &["patientId", "id"]))
        {
            return Some(id);
        }
    }
    let holder = ["profile", "account", "data"]
        .iter()
        .find_map(|key| profile.get(*key).filter(|value| !value.is_null()))?;
    holder
        .as_object()
        .and_then(|inner| first_id(inner, &["patientId", "id", "userId"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    struct CountingLookup {
        account_calls: AtomicUsize,
        identity_calls: AtomicUsize,
        account_result: Option<String>,
        identity_body: Value,
    }

    impl CountingLookup {
        fn new(account_result: Option<&str>, identity_body: Value) -> Self {
            Self {
                account_calls: AtomicUsize::new(0),
                identity_calls: AtomicUsize::new(0),
                account_result: account_result.map(str::to_string),
                identity_body,
            }
        }
    }

    impl IdentityLookup for CountingLookup {
        async fn lookup_patient_id(&self, _account: &str) -> Result<Option<String>, ApiError> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.account_result.clone())
        }

        async fn current_identity(&self, _path: &str) -> Result<Value, ApiError> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            if self.identity_body.is_null() {
                Err(ApiError::validation("no identity"))
            } else {
                Ok(self.identity_body.clone())
            }
        }
    }

    #[test]
    fn extract_priority_order() {
        assert_eq!(
            extract_patient_id(&object(json!({"id": "P1", "userId": "U1"}))).as_deref(),
            Some("P1")
        );
        assert_eq!(
            extract_patient_id(&object(json!({"patient": {"id": 42}}))).as_deref(),
            Some("42")
        );
        assert_eq!(
            extract_patient_id(&object(json!({"user": {"patientId": "P2"}, "data": {"id": "D"}})))
                .as_deref(),
            Some("P2")
        );
        assert_eq!(
            extract_patient_id(&object(json!({"profile": {"userId": "U9"}}))).as_deref(),
            Some("U9")
        );
        assert_eq!(
            extract_patient_id(&object(json!({"account": "testuser", "data": {"id": "X"}}))),
            None
        );
        assert_eq!(extract_patient_id(&object(json!({"name": "张三"}))), None);
    }

    #[test]
    fn set_user_writes_back_patient_id() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionStore::new(store.clone());
        session.set_user(json!({"id": "P1"}));

        let user = session.user().expect("user");
        assert_eq!(user.get("patientId"), Some(&json!("P1")));
        assert_eq!(session.patient_id().as_deref(), Some("P1"));

        let persisted = store.get(StorageKey::User).unwrap().expect("persisted user");
        assert!(persisted.contains("\"patientId\":\"P1\""));
        assert_eq!(store.get(StorageKey::UserInfo).unwrap(), Some(persisted));
    }

    #[test]
    fn set_user_accepts_json_string_and_records_account() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionStore::new(store.clone());
        session.set_user(json!(r#"{"account":"testuser","patient":{"patientId":"PAT0001"}}"#));
        assert_eq!(session.patient_id().as_deref(), Some("PAT0001"));
        assert_eq!(session.account().as_deref(), Some("testuser"));
        assert_eq!(
            store.get(StorageKey::Account).unwrap().as_deref(),
            Some("testuser")
        );
    }

    #[test]
    fn set_user_ignores_plain_strings() {
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        session.set_user(json!({"id": "P1"}));
        session.set_user(json!("not json"));
        assert_eq!(session.patient_id().as_deref(), Some("P1"));
    }

    #[test]
    fn logged_in_requires_token_and_patient_id() {
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        assert!(!session.is_logged_in());
        session.set_token("tok");
        assert!(!session.is_logged_in());
        session.set_user(json!({"patientId": "P1"}));
        assert!(session.is_logged_in());
        session.invalidate_token();
        assert!(!session.is_logged_in());
        assert_eq!(session.patient_id().as_deref(), Some("P1"));
    }

    #[test]
    fn hydrate_restores_and_tolerates_malformed_entries() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKey::Token, "tok").unwrap();
        store.set(StorageKey::User, "garbage").unwrap();
        store
            .set(StorageKey::UserInfo, r#"{"userId": 17, "name": "李四"}"#)
            .unwrap();
        store.set(StorageKey::Account, "testuser").unwrap();

        let session = SessionStore::new(store);
        session.hydrate();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.token, "tok");
        assert_eq!(snapshot.patient_id.as_deref(), Some("17"));
        assert_eq!(snapshot.user_info.get("patientId"), Some(&json!("17")));
        assert_eq!(snapshot.account.as_deref(), Some("testuser"));
        assert!(snapshot.is_logged_in());
    }

    #[test]
    fn hydrate_with_broken_json_leaves_empty_profile() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKey::User, "{not valid").unwrap();
        let session = SessionStore::new(store);
        session.hydrate();
        assert_eq!(session.user(), None);
        assert_eq!(session.patient_id(), None);
    }

    #[test]
    fn logout_clears_memory_and_storage() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionStore::new(store.clone());
        session.set_token("tok");
        session.set_account("testuser");
        session.set_user(json!({"patientId": "P1"}));
        store.set(StorageKey::ServerMode, "prod").unwrap();

        session.logout();
        assert_eq!(session.snapshot(), Session::default());
        for key in [
            StorageKey::Token,
            StorageKey::User,
            StorageKey::UserInfo,
            StorageKey::Account,
        ] {
            assert_eq!(store.get(key).unwrap(), None, "{key} should be removed");
        }
        assert_eq!(
            store.get(StorageKey::ServerMode).unwrap().as_deref(),
            Some("prod")
        );
    }

    #[tokio::test]
    async fn ensure_patient_id_caches_account_lookup() {
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        session.set_account("testuser");
        session.set_user(json!({"name": "张三"}));
        let lookup = CountingLookup::new(Some("PAT0001"), Value::Null);

        assert_eq!(
            session.ensure_patient_id(&lookup).await.as_deref(),
            Some("PAT0001")
        );
        assert_eq!(
            session.ensure_patient_id(&lookup).await.as_deref(),
            Some("PAT0001")
        );
        assert_eq!(lookup.account_calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.identity_calls.load(Ordering::SeqCst), 0);

        let user = session.user().expect("merged profile");
        assert_eq!(user.get("name"), Some(&json!("张三")));
        assert_eq!(user.get("patientId"), Some(&json!("PAT0001")));
    }

    #[tokio::test]
    async fn ensure_patient_id_uses_identity_endpoints_without_account() {
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        let lookup = CountingLookup::new(None, json!({"account": "testuser", "id": "PAT0001"}));
        assert_eq!(
            session.ensure_patient_id(&lookup).await.as_deref(),
            Some("PAT0001")
        );
        assert_eq!(lookup.account_calls.load(Ordering::SeqCst), 0);
        assert_eq!(lookup.identity_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ensure_patient_id_returns_none_when_everything_fails() {
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        session.set_account("ghost");
        let lookup = CountingLookup::new(None, Value::Null);
        assert_eq!(session.ensure_patient_id(&lookup).await, None);
        assert_eq!(lookup.account_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            lookup.identity_calls.load(Ordering::SeqCst),
            FALLBACK_IDENTITY_PATHS.len()
        );
    }
}
