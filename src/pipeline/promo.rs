use crate::api::BoothApi;
use crate::poller::Debouncer;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Person a promotion code can be linked to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "fullname", alias = "full_name")]
    pub name: String,
    #[serde(default, alias = "phone_number")]
    pub phone: String,
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Default)]
struct SearchState {
    query: String,
    results: Vec<Recipient>,
    last_error: Option<String>,
}

/// Search-as-you-type lookup of recipients by phone number.
///
/// Only the last keystroke inside the debounce window hits the backend, and a
/// response for an older query is dropped.
pub struct RecipientSearch {
    api: BoothApi,
    debouncer: Debouncer,
    generation: Arc<AtomicU64>,
    state: Arc<Mutex<SearchState>>,
    /// Generation of the last query whose results are in
    settled: Arc<watch::Sender<u64>>,
}

impl RecipientSearch {
    pub fn new(api: BoothApi, window: Duration) -> Self {
        Self {
            api,
            debouncer: Debouncer::new(window),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(SearchState::default())),
            settled: Arc::new(watch::channel(0).0),
        }
    }

    pub fn input(&self, phone: &str) {
        let query = normalize_phone(phone);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = self.state.lock();
            state.query = query.clone();
            if query.is_empty() {
                state.results.clear();
                state.last_error = None;
            }
        }

        if query.is_empty() {
            self.debouncer.cancel();
            self.settled.send_replace(generation);
            return;
        }

        let api = self.api.clone();
        let current = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let settled = Arc::clone(&self.settled);

        self.debouncer.call(move |token| async move {
            debug!("Searching recipients for '{}'", query);
            let outcome = api.search_person_by_phone(&query, &token).await;

            if current.load(Ordering::SeqCst) != generation {
                return;
            }

            {
                let mut state = state.lock();
                match outcome {
                    Ok(results) => {
                        state.results = results;
                        state.last_error = None;
                    }
                    Err(e) if e.is_cancelled() => return,
                    Err(e) => {
                        warn!("Recipient search failed: {}", e);
                        state.results.clear();
                        state.last_error = Some(e.user_message());
                    }
                }
            }
            settled.send_replace(generation);
        });
    }

    /// Results of the latest query, once its debounced request has answered
    pub async fn settled(&self) -> Vec<Recipient> {
        let generation = self.generation.load(Ordering::SeqCst);
        let mut settled = self.settled.subscribe();
        if let Err(e) = settled.wait_for(|done| *done >= generation).await {
            debug!("Recipient search closed: {}", e);
        }
        self.results()
    }

    pub fn query(&self) -> String {
        self.state.lock().query.clone()
    }

    pub fn results(&self) -> Vec<Recipient> {
        self.state.lock().results.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}

/// Pick the recipient for `query`: an exact phone match, else the only hit
pub fn best_match(query: &str, results: &[Recipient]) -> Option<Recipient> {
    let query = normalize_phone(query);
    if let Some(exact) = results.iter().find(|r| normalize_phone(&r.phone) == query) {
        return Some(exact.clone());
    }
    match results {
        [only] => Some(only.clone()),
        _ => None,
    }
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace()).collect()
}
