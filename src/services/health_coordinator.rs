use crate::error::CoordinationError;
use crate::models::payment::ProcessorKind;
use crate::services::coordination::CoordinationStore;
use crate::services::payment_processor_client::ProcessorGateway;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Decides whether a processor may be called, issuing at most one real
/// `service-health` probe per processor per window across all instances that
/// share the coordination store.
///
/// A marker only records that *someone* probed; a negative probe result is
/// not shared, so holders of a live marker are treated as eligible.
///
/// The store can be attached after construction; until then every check is
/// throttled locally.
pub struct HealthCoordinator {
    store: RwLock<Option<Arc<dyn CoordinationStore>>>,
    last_checked: Mutex<HashMap<ProcessorKind, Instant>>,
    window: Duration,
    probe_timeout: Duration,
    store_timeout: Duration,
}

enum Claim {
    Acquired,
    HeldElsewhere,
    Unavailable,
}

impl HealthCoordinator {
    pub fn new(
        store: Option<Arc<dyn CoordinationStore>>,
        window: Duration,
        probe_timeout: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store: RwLock::new(store),
            last_checked: Mutex::new(HashMap::new()),
            window,
            probe_timeout,
            store_timeout,
        }
    }

    pub fn attach_store(&self, store: Arc<dyn CoordinationStore>) {
        *self.store.write() = Some(store);
    }

    pub fn has_store(&self) -> bool {
        self.store.read().is_some()
    }

    /// Keeps calling `connect` every `retry_every` until it yields a store,
    /// then attaches it.
    pub async fn attach_store_when_ready<F, Fut>(&self, mut connect: F, retry_every: Duration)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Arc<dyn CoordinationStore>, CoordinationError>>,
    {
        loop {
            match connect().await {
                Ok(store) => {
                    self.attach_store(store);
                    info!("Coordination store attached, health checks shared across instances");
                    return;
                }
                Err(e) => {
                    debug!("Coordination store still unavailable: {}", e);
                    tokio::time::sleep(retry_every).await;
                }
            }
        }
    }

    pub async fn is_eligible(&self, gateway: &dyn ProcessorGateway) -> bool {
        let kind = gateway.kind();

        match self.claim_marker(kind).await {
            Claim::Acquired => {
                self.last_checked.lock().insert(kind, Instant::now());
                self.probe(gateway).await
            }
            Claim::HeldElsewhere => true,
            Claim::Unavailable => {
                if self.claim_local(kind) {
                    self.probe(gateway).await
                } else {
                    true
                }
            }
        }
    }

    async fn claim_marker(&self, kind: ProcessorKind) -> Claim {
        // clone fora do lock; o guard não atravessa o await
        let Some(store) = self.store.read().clone() else {
            return Claim::Unavailable;
        };
        let key = format!("healthcheck:{}", kind);

        let attempt = store.set_if_absent_with_expiry(&key, "1", self.window);
        let outcome = tokio::time::timeout(self.store_timeout, attempt)
            .await
            .unwrap_or(Err(CoordinationError::Timeout));

        match outcome {
            Ok(true) => Claim::Acquired,
            Ok(false) => Claim::HeldElsewhere,
            Err(e) => {
                warn!("Coordination store unavailable, throttling {} health checks locally: {}", kind, e);
                Claim::Unavailable
            }
        }
    }

    // Check-and-set sob o mesmo lock para que só uma task vença a janela.
    fn claim_local(&self, kind: ProcessorKind) -> bool {
        let now = Instant::now();
        let mut last_checked = self.last_checked.lock();
        match last_checked.get(&kind) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                last_checked.insert(kind, now);
                true
            }
        }
    }

    async fn probe(&self, gateway: &dyn ProcessorGateway) -> bool {
        let kind = gateway.kind();
        match tokio::time::timeout(self.probe_timeout, gateway.service_health()).await {
            Ok(Ok(health)) => {
                debug!(
                    "{} processor health: failing={} min_response_time={}ms",
                    kind, health.failing, health.min_response_time
                );
                !health.failing
            }
            Ok(Err(e)) => {
                warn!("{} processor health check failed: {}", kind, e);
                false
            }
            Err(_) => {
                warn!("{} processor health check timed out", kind);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::models::payment::{HealthCheckResponse, ProcessorPayload};
    use crate::services::coordination::{InMemoryCoordinationStore, Result as StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_secs(5);

    struct ProbeCounter {
        kind: ProcessorKind,
        failing: AtomicBool,
        delay: Duration,
        probes: AtomicUsize,
    }

    impl ProbeCounter {
        fn new(kind: ProcessorKind) -> Self {
            Self {
                kind,
                failing: AtomicBool::new(false),
                delay: Duration::ZERO,
                probes: AtomicUsize::new(0),
            }
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessorGateway for ProbeCounter {
        fn kind(&self) -> ProcessorKind {
            self.kind
        }

        async fn submit(&self, _payload: &ProcessorPayload) -> Result<(), UpstreamError> {
            Ok(())
        }

        async fn service_health(&self) -> Result<HealthCheckResponse, UpstreamError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(HealthCheckResponse {
                failing: self.failing.load(Ordering::SeqCst),
                min_response_time: 0,
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CoordinationStore for BrokenStore {
        async fn set_if_absent_with_expiry(&self, _: &str, _: &str, _: Duration) -> StoreResult<bool> {
            Err(CoordinationError::Timeout)
        }
        async fn get(&self, _: &str) -> StoreResult<Option<String>> {
            Err(CoordinationError::Timeout)
        }
        async fn exists(&self, _: &str) -> StoreResult<bool> {
            Err(CoordinationError::Timeout)
        }
        async fn set(&self, _: &str, _: &str) -> StoreResult<()> {
            Err(CoordinationError::Timeout)
        }
    }

    struct HangingStore;

    #[async_trait]
    impl CoordinationStore for HangingStore {
        async fn set_if_absent_with_expiry(&self, _: &str, _: &str, _: Duration) -> StoreResult<bool> {
            std::future::pending().await
        }
        async fn get(&self, _: &str) -> StoreResult<Option<String>> {
            std::future::pending().await
        }
        async fn exists(&self, _: &str) -> StoreResult<bool> {
            std::future::pending().await
        }
        async fn set(&self, _: &str, _: &str) -> StoreResult<()> {
            std::future::pending().await
        }
    }

    // Errors until `recovered` is set, then behaves like the in-memory store.
    struct FlakyStore {
        recovered: AtomicBool,
        inner: InMemoryCoordinationStore,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                recovered: AtomicBool::new(false),
                inner: InMemoryCoordinationStore::new(),
            }
        }

        fn check(&self) -> StoreResult<()> {
            if self.recovered.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(CoordinationError::Timeout)
            }
        }
    }

    #[async_trait]
    impl CoordinationStore for FlakyStore {
        async fn set_if_absent_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
            self.check()?;
            self.inner.set_if_absent_with_expiry(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }
        async fn exists(&self, key: &str) -> StoreResult<bool> {
            self.check()?;
            self.inner.exists(key).await
        }
        async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.set(key, value).await
        }
    }

    fn coordinator(store: Option<Arc<dyn CoordinationStore>>) -> HealthCoordinator {
        HealthCoordinator::new(store, WINDOW, Duration::from_secs(1), Duration::from_millis(200))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_instances_share_one_probe_per_window() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let gateway = Arc::new(ProbeCounter::new(ProcessorKind::Default));
        let instances: Vec<_> = (0..8).map(|_| Arc::new(coordinator(Some(store.clone())))).collect();

        let checks = instances.iter().map(|instance| {
            let instance = instance.clone();
            let gateway = gateway.clone();
            tokio::spawn(async move { instance.is_eligible(gateway.as_ref()).await })
        });
        let results = futures::future::join_all(checks).await;

        assert_eq!(results.len(), 8);
        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(gateway.probes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_again_after_window() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let gateway = ProbeCounter::new(ProcessorKind::Fallback);
        let coordinator = coordinator(Some(store));

        assert!(coordinator.is_eligible(&gateway).await);
        assert!(coordinator.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 1);

        tokio::time::advance(WINDOW).await;

        assert!(coordinator.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_probe_marks_ineligible_but_marker_holders_stay_eligible() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let gateway = ProbeCounter::new(ProcessorKind::Default);
        gateway.failing.store(true, Ordering::SeqCst);

        let prober = coordinator(Some(store.clone()));
        let other = coordinator(Some(store));

        assert!(!prober.is_eligible(&gateway).await);
        assert!(other.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_is_ineligible() {
        let mut gateway = ProbeCounter::new(ProcessorKind::Default);
        gateway.delay = Duration::from_secs(2);
        let coordinator = coordinator(Some(Arc::new(InMemoryCoordinationStore::new())));

        assert!(!coordinator.is_eligible(&gateway).await);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_store_degrades_to_local_throttle() {
        let gateway = Arc::new(ProbeCounter::new(ProcessorKind::Default));
        let coordinator = Arc::new(coordinator(Some(Arc::new(BrokenStore))));

        let checks = (0..6).map(|_| {
            let coordinator = coordinator.clone();
            let gateway = gateway.clone();
            tokio::spawn(async move { coordinator.is_eligible(gateway.as_ref()).await })
        });
        let results = futures::future::join_all(checks).await;

        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(gateway.probes(), 1);

        tokio::time::advance(WINDOW).await;
        assert!(coordinator.is_eligible(gateway.as_ref()).await);
        assert_eq!(gateway.probes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_store_times_out_into_local_mode() {
        let gateway = ProbeCounter::new(ProcessorKind::Fallback);
        let coordinator = coordinator(Some(Arc::new(HangingStore)));

        assert!(coordinator.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_store_uses_local_window_per_processor() {
        let default = ProbeCounter::new(ProcessorKind::Default);
        let fallback = ProbeCounter::new(ProcessorKind::Fallback);
        let coordinator = coordinator(None);

        assert!(coordinator.is_eligible(&default).await);
        assert!(coordinator.is_eligible(&fallback).await);
        assert!(coordinator.is_eligible(&default).await);

        assert_eq!(default.probes(), 1);
        assert_eq!(fallback.probes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_attached_later_is_shared_across_instances() {
        let gateway = ProbeCounter::new(ProcessorKind::Default);
        let first = coordinator(None);
        let second = coordinator(None);

        assert!(first.is_eligible(&gateway).await);
        assert!(second.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 2);

        tokio::time::advance(WINDOW).await;
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        first.attach_store(store.clone());
        second.attach_store(store);

        assert!(first.is_eligible(&gateway).await);
        assert!(second.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_retrying_until_store_connects() {
        let coordinator = Arc::new(coordinator(None));
        let attempts = Arc::new(AtomicUsize::new(0));

        let connecting = tokio::spawn({
            let coordinator = coordinator.clone();
            let attempts = attempts.clone();
            async move {
                let connect = move || {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err(CoordinationError::Timeout)
                        } else {
                            Ok(Arc::new(InMemoryCoordinationStore::new()) as Arc<dyn CoordinationStore>)
                        }
                    }
                };
                coordinator.attach_store_when_ready(connect, Duration::from_secs(2)).await
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!coordinator.has_store());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!coordinator.has_store());

        connecting.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(coordinator.has_store());
    }

    #[tokio::test(start_paused = true)]
    async fn store_recovering_after_outage_resumes_shared_markers() {
        let gateway = ProbeCounter::new(ProcessorKind::Fallback);
        let store = Arc::new(FlakyStore::new());
        let first = coordinator(Some(store.clone()));
        let second = coordinator(Some(store.clone()));

        // fora do ar: cada instância limita sozinha
        assert!(first.is_eligible(&gateway).await);
        assert!(second.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 2);

        tokio::time::advance(WINDOW).await;
        store.recovered.store(true, Ordering::SeqCst);

        assert!(first.is_eligible(&gateway).await);
        assert!(second.is_eligible(&gateway).await);
        assert_eq!(gateway.probes(), 3);
    }
}
