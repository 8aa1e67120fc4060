//! The per-TLD cache of root server replies.
//!
//! What a root server says about a name depends only on the top-level
//! domain the name lives in: it either refers the resolver to the servers
//! of that TLD or it doesn’t know the TLD at all. The resolver can
//! therefore remember the reply of each root server per TLD and reuse it
//! for every other name under the same TLD.
//!
//! The cache is keyed by the TLD label, as produced by [`cache_key`], and
//! the address of the root server. Each key holds the first [`Reply`] that
//! was ever stored for it, including failed exchanges, and keeps it for the
//! lifetime of the cache. There is no expiry and no eviction.
//!
//! The cache is shared between concurrently running resolutions. Each key
//! is backed by a [`OnceCell`], so [`DomainCache::get_or_fetch`] runs at
//! most one fetch per key even if several tasks ask for the same key at
//! the same time. The others wait for that fetch and receive its outcome.

use crate::response::Reply;
use domain::base::name::Name;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::OnceCell;

//------------ cache_key -----------------------------------------------------

/// Returns the cache key for a name.
///
/// This is the label right before the root label, i.e., the top-level
/// domain. For the root name itself, the key is the textual name.
pub fn cache_key<Octs: AsRef<[u8]>>(name: &Name<Octs>) -> String {
    let count = name.label_count();
    if count < 2 {
        return name.to_string();
    }
    match name.iter().nth(count - 2) {
        Some(label) => label.to_string(),
        None => name.to_string(),
    }
}

//------------ DomainCache ---------------------------------------------------

/// The key of a cache entry.
type Key = (String, IpAddr);

/// Root server replies per top-level domain.
#[derive(Debug, Default)]
pub struct DomainCache {
    /// The entries.
    ///
    /// The mutex is only ever held for looking up or inserting a cell,
    /// never while a fetch is running.
    entries: Mutex<HashMap<Key, Arc<OnceCell<Reply>>>>,
}

impl DomainCache {
    /// Creates a new, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reply stored for `tld` and `server`, if any.
    pub fn get(&self, tld: &str, server: IpAddr) -> Option<Reply> {
        self.entries
            .lock()
            .get(&(String::from(tld), server))
            .and_then(|cell| cell.get().cloned())
    }

    /// Stores the reply for `tld` and `server`.
    ///
    /// If a reply has already been stored for the key, it is kept and
    /// `reply` is dropped. Returns whether `reply` was stored.
    pub fn put(&self, tld: &str, server: IpAddr, reply: Reply) -> bool {
        self.cell(tld, server).set(reply).is_ok()
    }

    /// Returns the stored reply or fetches and stores a new one.
    ///
    /// The future returned by `fetch` is only awaited if nothing has been
    /// stored for the key yet and no other task is currently fetching it.
    /// If such a fetch is in flight, waits for its outcome instead.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        tld: &str,
        server: IpAddr,
        fetch: F,
    ) -> Reply
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Reply>,
    {
        let cell = self.cell(tld, server);
        cell.get_or_init(fetch).await.clone()
    }

    /// Returns the number of keys with a stored reply.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Returns whether no reply has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cell for a key, creating it if necessary.
    fn cell(&self, tld: &str, server: IpAddr) -> Arc<OnceCell<Reply>> {
        self.entries
            .lock()
            .entry((String::from(tld), server))
            .or_default()
            .clone()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::{Entry, Response};
    use crate::transport::Error;
    use rstest::rstest;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ROOT: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4));

    fn referral() -> Reply {
        Reply::Message(Response::new(
            Vec::new(),
            vec![Entry::a(
                Name::vec_from_str("a.gtld-servers.net").unwrap(),
                Ipv4Addr::new(192, 5, 6, 30),
            )],
        ))
    }

    #[rstest]
    #[case("www.example.com", "com")]
    #[case("example.org.", "org")]
    #[case("com", "com")]
    #[case("a.b.c.d.NET", "NET")]
    #[case(".", ".")]
    fn key_is_tld_label(#[case] name: &str, #[case] key: &str) {
        let name = Name::vec_from_str(name).unwrap();
        assert_eq!(cache_key(&name), key);
    }

    #[test]
    fn first_put_wins() {
        let cache = DomainCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("com", ROOT).is_none());

        assert!(cache.put("com", ROOT, Reply::Failed(Error::Timeout)));
        assert!(!cache.put("com", ROOT, referral()));
        assert!(cache.get("com", ROOT).unwrap().is_failed());
        assert!(cache.get("org", ROOT).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn fetch_runs_once_per_key() {
        let cache = DomainCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            referral()
        };

        let (one, two) = tokio::join!(
            cache.get_or_fetch("com", ROOT, fetch),
            cache.get_or_fetch("com", ROOT, fetch),
        );
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(one.response(), two.response());

        cache.get_or_fetch("net", ROOT, fetch).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }
}
