//! Controlled clients (open windows).

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// A client (controlled page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create a new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// All known clients.
    pub fn match_all(&self) -> Vec<&Client> {
        self.clients.values().collect()
    }

    /// Open a new window at the given (already resolved) URL.
    ///
    /// New windows are controlled immediately, matching the behavior
    /// after a `claim`.
    pub fn open_window(&mut self, url: Url) -> Client {
        let id = next_client_id();
        let client = Client {
            id: id.clone(),
            url,
            focused: true,
            controlled: true,
        };
        self.clients.insert(id, client.clone());
        client
    }

    /// Take control of all open clients, not just future ones.
    pub fn claim(&mut self) {
        for client in self.clients.values_mut() {
            client.controlled = true;
        }
    }

    /// Add a pre-existing client (uncontrolled until a claim).
    pub fn add(&mut self, url: Url) -> Client {
        let id = next_client_id();
        let client = Client {
            id: id.clone(),
            url,
            focused: false,
            controlled: false,
        };
        self.clients.insert(id, client.clone());
        client
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_open_window() {
        let mut clients = Clients::new();
        let client = clients.open_window(url("https://example.com/inbox/"));

        assert!(client.focused);
        assert!(client.controlled);
        assert!(clients.get(&client.id).is_some());
    }

    #[test]
    fn test_claim_controls_existing_clients() {
        let mut clients = Clients::new();
        let a = clients.add(url("https://example.com/"));
        let b = clients.add(url("https://example.com/about/"));
        assert!(!clients.get(&a.id).unwrap().controlled);

        clients.claim();
        assert!(clients.get(&a.id).unwrap().controlled);
        assert!(clients.get(&b.id).unwrap().controlled);
    }

    #[test]
    fn test_remove() {
        let mut clients = Clients::new();
        let client = clients.add(url("https://example.com/"));
        assert_eq!(clients.len(), 1);

        assert!(clients.remove(&client.id).is_some());
        assert!(clients.is_empty());
    }
}
