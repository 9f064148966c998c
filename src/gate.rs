//! Decides whether a signed-in identity may see and edit the ledger.
//!
//! The allow-list is fetched at most once per process. Concurrent first lookups share a single
//! in-flight fetch. Every failure denies: an empty list, an unknown email and a failed fetch. A
//! failed fetch is not cached, so the next check tries again.

use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// A source of allowed email addresses.
#[async_trait]
pub trait AllowList: Debug + Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Checks identities against a lazily fetched allow-list.
#[derive(Debug)]
pub struct AccessGate {
    source: Arc<dyn AllowList>,
    cache: OnceCell<Vec<String>>,
}

impl AccessGate {
    pub fn new(source: Arc<dyn AllowList>) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    /// Returns the allow-list, fetching it on first use.
    pub async fn allowed(&self) -> Result<&[String]> {
        let list = self
            .cache
            .get_or_try_init(|| async {
                debug!("Fetching the allow-list");
                self.source.fetch().await
            })
            .await?;
        Ok(list.as_slice())
    }

    /// True when `email` is on the allow-list, compared exactly. Fails closed.
    pub async fn is_authorized(&self, email: &str) -> bool {
        if email.is_empty() {
            return false;
        }
        match self.allowed().await {
            Ok(list) => list.iter().any(|a| a == email),
            Err(e) => {
                warn!("Unable to fetch the allow-list, denying access: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts fetches and fails the first `failures` of them.
    #[derive(Debug, Default)]
    struct CountingList {
        emails: Vec<String>,
        failures: usize,
        fetches: AtomicUsize,
    }

    impl CountingList {
        fn new(emails: &[&str]) -> Self {
            Self {
                emails: emails.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AllowList for CountingList {
        async fn fetch(&self) -> Result<Vec<String>> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.failures {
                return Err(Error::msg(ErrorType::StoreUnavailable, "offline"));
            }
            Ok(self.emails.clone())
        }
    }

    #[tokio::test]
    async fn test_member_is_authorized() {
        let gate = AccessGate::new(Arc::new(CountingList::new(&["admin@example.com"])));
        assert!(gate.is_authorized("admin@example.com").await);
    }

    #[tokio::test]
    async fn test_membership_is_exact() {
        let gate = AccessGate::new(Arc::new(CountingList::new(&["admin@example.com"])));
        assert!(!gate.is_authorized("Admin@Example.com").await);
        assert!(!gate.is_authorized(" admin@example.com").await);
    }

    #[tokio::test]
    async fn test_non_member_is_denied() {
        let gate = AccessGate::new(Arc::new(CountingList::new(&["admin@example.com"])));
        assert!(!gate.is_authorized("someone@example.com").await);
        assert!(!gate.is_authorized("").await);
    }

    #[tokio::test]
    async fn test_empty_list_denies_everyone() {
        let gate = AccessGate::new(Arc::new(CountingList::new(&[])));
        assert!(!gate.is_authorized("admin@example.com").await);
    }

    #[tokio::test]
    async fn test_fetched_once() {
        let source = Arc::new(CountingList::new(&["a@example.com"]));
        let gate = AccessGate::new(source.clone());
        assert!(gate.is_authorized("a@example.com").await);
        assert!(!gate.is_authorized("b@example.com").await);
        assert!(gate.is_authorized("a@example.com").await);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_checks_share_one_fetch() {
        let source = Arc::new(CountingList::new(&["a@example.com"]));
        let gate = AccessGate::new(source.clone());
        let (a, b, c, d) = tokio::join!(
            gate.is_authorized("a@example.com"),
            gate.is_authorized("a@example.com"),
            gate.is_authorized("b@example.com"),
            gate.is_authorized("a@example.com"),
        );
        assert!(a && b && !c && d);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_denies_and_is_retried() {
        let source = Arc::new(CountingList {
            failures: 1,
            ..CountingList::new(&["a@example.com"])
        });
        let gate = AccessGate::new(source.clone());
        assert!(!gate.is_authorized("a@example.com").await);
        assert!(gate.is_authorized("a@example.com").await);
        assert_eq!(source.fetches(), 2);
    }
}
