//! Lifecycle tracking for live browser automation resources.
//!
//! The manager depends only on a minimal capability interface — close,
//! closed-query, close-notification — never on a concrete automation
//! library. Removal from the tracking maps is driven by each handle's own
//! close notification, so tracking stays consistent no matter which call
//! site closed the handle, and pruning is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use harvester_core::{HarvesterError, HarvesterResult, ResourceLimits};

/// Invoked by a handle when it closes or disconnects.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Capability interface for a browser, page, or context handle.
#[async_trait]
pub trait ManagedHandle: Send + Sync {
    async fn close(&self) -> HarvesterResult<()>;
    fn is_closed(&self) -> bool;
    /// Register a callback fired once when the handle closes, from any
    /// cause: an explicit `close`, a crash, or a remote disconnect.
    fn on_close(&self, callback: CloseCallback);
}

struct Tracked {
    handle: Arc<dyn ManagedHandle>,
    #[allow(dead_code)]
    created_at: Instant,
    last_activity: Instant,
    /// For pages: the context that owns them.
    context_id: Option<Uuid>,
}

type TrackingMap = Arc<RwLock<HashMap<Uuid, Tracked>>>;

/// Live snapshot of tracked resources; recomputed on demand.
#[derive(Debug, Clone)]
pub struct ResourceMetrics {
    pub memory_usage_mb: usize,
    pub browser_count: usize,
    pub page_count: usize,
    pub context_count: usize,
    pub uptime: Duration,
    pub gc_count: u64,
    pub last_gc: Option<DateTime<Utc>>,
}

/// Which ceilings are currently breached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitCheck {
    pub memory_exceeded: bool,
    pub pages_exceeded: bool,
    pub contexts_exceeded: bool,
    pub browsers_exceeded: bool,
}

impl LimitCheck {
    pub fn any(&self) -> bool {
        self.memory_exceeded || self.pages_exceeded || self.contexts_exceeded || self.browsers_exceeded
    }
}

/// Composable cleanup request.
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub close_idle_pages: bool,
    pub close_idle_contexts: bool,
    pub force_gc: bool,
    pub restart_browser: bool,
    pub idle_timeout: Duration,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            close_idle_pages: true,
            close_idle_contexts: true,
            force_gc: false,
            restart_browser: false,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl CleanupOptions {
    /// Close everything immediately, as used by `destroy`.
    pub fn drain() -> Self {
        Self {
            close_idle_pages: true,
            close_idle_contexts: true,
            force_gc: false,
            restart_browser: true,
            idle_timeout: Duration::ZERO,
        }
    }
}

/// Tracks and bounds live browser resources, reclaiming idle ones.
pub struct ResourceManager {
    limits: ResourceLimits,
    browsers: TrackingMap,
    pages: TrackingMap,
    contexts: TrackingMap,
    started_at: Instant,
    gc_count: AtomicU64,
    last_gc: RwLock<Option<DateTime<Utc>>>,
    destroyed: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceManager {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            browsers: Arc::new(RwLock::new(HashMap::new())),
            pages: Arc::new(RwLock::new(HashMap::new())),
            contexts: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
            gc_count: AtomicU64::new(0),
            last_gc: RwLock::new(None),
            destroyed: AtomicBool::new(false),
            maintenance: Mutex::new(None),
        }
    }

    pub fn track_browser(&self, handle: Arc<dyn ManagedHandle>) -> HarvesterResult<Uuid> {
        self.track(&self.browsers, handle, None)
    }

    pub fn track_context(&self, handle: Arc<dyn ManagedHandle>) -> HarvesterResult<Uuid> {
        self.track(&self.contexts, handle, None)
    }

    /// Track a page, optionally under the context that owns it. A context
    /// with open pages is protected from idle cleanup.
    pub fn track_page(
        &self,
        handle: Arc<dyn ManagedHandle>,
        context_id: Option<Uuid>,
    ) -> HarvesterResult<Uuid> {
        self.track(&self.pages, handle, context_id)
    }

    fn track(
        &self,
        map: &TrackingMap,
        handle: Arc<dyn ManagedHandle>,
        context_id: Option<Uuid>,
    ) -> HarvesterResult<Uuid> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(HarvesterError::ResourceExhausted(
                "resource manager is destroyed".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Instant::now();

        if let Ok(mut map) = map.write() {
            map.insert(
                id,
                Tracked {
                    handle: Arc::clone(&handle),
                    created_at: now,
                    last_activity: now,
                    context_id,
                },
            );
        }

        // the handle's own close event removes the entry; implementations
        // fire the callback immediately when the handle is already closed,
        // which is why registration comes after the insert
        let weak: Weak<RwLock<HashMap<Uuid, Tracked>>> = Arc::downgrade(map);
        handle.on_close(Box::new(move || {
            if let Some(map) = weak.upgrade() {
                if let Ok(mut map) = map.write() {
                    map.remove(&id);
                }
            }
        }));
        Ok(id)
    }

    /// Refresh a resource's activity stamp; called from request/response/
    /// load event plumbing.
    pub fn record_activity(&self, id: Uuid) {
        for map in [&self.pages, &self.contexts, &self.browsers] {
            if let Ok(mut map) = map.write() {
                if let Some(tracked) = map.get_mut(&id) {
                    tracked.last_activity = Instant::now();
                    return;
                }
            }
        }
    }

    pub fn get_metrics(&self) -> ResourceMetrics {
        ResourceMetrics {
            memory_usage_mb: current_memory_mb(),
            browser_count: self.browsers.read().map(|m| m.len()).unwrap_or(0),
            page_count: self.pages.read().map(|m| m.len()).unwrap_or(0),
            context_count: self.contexts.read().map(|m| m.len()).unwrap_or(0),
            uptime: self.started_at.elapsed(),
            gc_count: self.gc_count.load(Ordering::SeqCst),
            last_gc: self.last_gc.read().ok().and_then(|g| *g),
        }
    }

    pub fn check_limits(&self) -> LimitCheck {
        let metrics = self.get_metrics();
        LimitCheck {
            memory_exceeded: metrics.memory_usage_mb > self.limits.max_memory_mb,
            pages_exceeded: metrics.page_count > self.limits.max_pages,
            contexts_exceeded: metrics.context_count > self.limits.max_contexts,
            browsers_exceeded: metrics.browser_count > self.limits.max_browsers,
        }
    }

    /// A cleanup pass is due when any ceiling is breached or memory has
    /// crossed the soft GC threshold.
    pub fn should_trigger_cleanup(&self) -> bool {
        self.check_limits().any() || current_memory_mb() > self.limits.gc_threshold_mb
    }

    /// Run the requested cleanup steps; returns how many resources were
    /// closed.
    pub async fn cleanup(&self, options: CleanupOptions) -> HarvesterResult<usize> {
        let mut cleaned = 0usize;

        if options.close_idle_pages {
            cleaned += self
                .close_idle(&self.pages, options.idle_timeout, None)
                .await;
        }

        if options.close_idle_contexts {
            // a context is reclaimable only when no tracked page uses it
            let busy: Vec<Uuid> = self
                .pages
                .read()
                .map(|pages| pages.values().filter_map(|p| p.context_id).collect())
                .unwrap_or_default();
            cleaned += self
                .close_idle(&self.contexts, options.idle_timeout, Some(&busy))
                .await;
        }

        if options.restart_browser {
            cleaned += self.close_idle(&self.browsers, Duration::ZERO, None).await;
        }

        if options.force_gc {
            // no collector is exposed by this runtime; record the attempt
            // so the metric surface stays live
            warn!("force_gc requested but no garbage collector is exposed");
            self.gc_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last_gc) = self.last_gc.write() {
                *last_gc = Some(Utc::now());
            }
        }

        self.prune_closed();

        if cleaned > 0 {
            info!(cleaned, "resource cleanup pass finished");
        }
        Ok(cleaned)
    }

    async fn close_idle(
        &self,
        map: &TrackingMap,
        idle_timeout: Duration,
        protected: Option<&[Uuid]>,
    ) -> usize {
        let now = Instant::now();
        let victims: Vec<(Uuid, Arc<dyn ManagedHandle>)> = map
            .read()
            .map(|map| {
                map.iter()
                    .filter(|(id, tracked)| {
                        if let Some(protected) = protected {
                            if protected.contains(id) {
                                return false;
                            }
                        }
                        now.duration_since(tracked.last_activity) >= idle_timeout
                    })
                    .map(|(id, tracked)| (*id, Arc::clone(&tracked.handle)))
                    .collect()
            })
            .unwrap_or_default();

        let mut closed = 0usize;
        for (id, handle) in victims {
            if handle.is_closed() {
                continue;
            }
            match handle.close().await {
                Ok(()) => {
                    debug!(%id, "idle resource closed");
                    closed += 1;
                }
                Err(e) => warn!(%id, "failed to close idle resource: {e}"),
            }
        }
        closed
    }

    /// Drop entries whose handle reports closed. The close notification
    /// normally removes them already; this keeps the maps consistent even
    /// for handles that never fire it.
    fn prune_closed(&self) {
        for map in [&self.browsers, &self.pages, &self.contexts] {
            if let Ok(mut map) = map.write() {
                map.retain(|_, tracked| !tracked.handle.is_closed());
            }
        }
    }

    /// Start the periodic maintenance task: every `cleanup_interval_ms` it
    /// runs a cleanup pass if `should_trigger_cleanup` says one is due.
    pub async fn start_maintenance(self: &Arc<Self>) {
        let mut maintenance = self.maintenance.lock().await;
        if maintenance.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.limits.cleanup_interval();
        let idle_timeout = self.limits.idle_timeout();

        *maintenance = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if manager.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                if manager.should_trigger_cleanup() {
                    let options = CleanupOptions {
                        idle_timeout,
                        ..CleanupOptions::default()
                    };
                    if let Err(e) = manager.cleanup(options).await {
                        warn!("periodic resource cleanup failed: {e}");
                    }
                }
            }
        }));
        info!("resource maintenance started");
    }

    /// Tear everything down: stop the timer, close every tracked handle,
    /// clear the maps, and reject further tracking. Idempotent.
    pub async fn destroy(&self) -> HarvesterResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.maintenance.lock().await.take() {
            handle.abort();
        }

        self.cleanup(CleanupOptions::drain()).await?;

        for map in [&self.browsers, &self.pages, &self.contexts] {
            if let Ok(mut map) = map.write() {
                map.clear();
            }
        }
        info!("resource manager destroyed");
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Resident set size from /proc on Linux; zero elsewhere.
fn current_memory_mb() -> usize {
    #[cfg(target_os = "linux")]
    {
        read_vm_rss_mb().unwrap_or(0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[cfg(target_os = "linux")]
fn read_vm_rss_mb() -> Option<usize> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: usize = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}
