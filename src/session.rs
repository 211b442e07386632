// One page visit = one LessonSession. Player callbacks, poll ticks, badge
// timers and lifecycle notices all land in a single ordered event queue, so
// every state change happens on one task and the handlers stay idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, sleep};
use uuid::Uuid;

use crate::completion::CompletionWatcher;
use crate::config::Config;
use crate::navigation::{NavigationMemory, ReferrerPolicy};
use crate::page::{PageSurface, SlotId};
use crate::player::{PlayerEvent, PlayerRegistry};
use crate::progress::ProgressLedger;
use crate::store::LayeredStore;
use crate::telemetry::{ProgressPing, TelemetryClient};
use crate::unlock::UnlockController;

const VISITOR_NAMESPACE: &str = "visitor";
const VISITOR_KEY: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Page went to the background; mobile browsers may evict storage here.
    Hidden,
    /// Page is being torn down.
    Unload,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Player(PlayerEvent),
    Lifecycle(LifecycleEvent),
    DismissBadge { slot: SlotId },
    Shutdown,
}

/// Inputs read off the page URL and document at load time.
#[derive(Debug, Clone, Default)]
pub struct SessionParams {
    pub page_url: String,
    pub referrer: Option<String>,
    pub user_id: String,
    pub contact_id: String,
    pub webinar: Option<String>,
}

/// Validated visitor credentials plus the persisted per-device key.
#[derive(Debug, Clone)]
pub struct VisitorIdentity {
    pub user_id: String,
    pub contact_id: String,
    pub visitor_key: Uuid,
}

impl VisitorIdentity {
    /// Both ids must be non-empty numeric strings; anything else disables
    /// gating and telemetry for the visit (the page still renders).
    fn resolve(store: &Arc<LayeredStore>, params: &SessionParams) -> Option<Self> {
        if !is_numeric_id(&params.user_id) || !is_numeric_id(&params.contact_id) {
            tracing::warn!("missing or invalid userId/contactId; gating and telemetry disabled");
            return None;
        }
        let ns = store.namespace(VISITOR_NAMESPACE);
        let visitor_key = ns
            .get(VISITOR_KEY)
            .and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .unwrap_or_else(|| {
                let key = Uuid::new_v4();
                ns.set(VISITOR_KEY, json!(key.to_string()));
                key
            });
        Some(VisitorIdentity {
            user_id: params.user_id.clone(),
            contact_id: params.contact_id.clone(),
            visitor_key,
        })
    }
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Cheap handle the host uses to feed events into a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn player_event(&self, event: PlayerEvent) {
        let _ = self.tx.send(SessionEvent::Player(event)).await;
    }

    pub async fn lifecycle(&self, event: LifecycleEvent) {
        let _ = self.tx.send(SessionEvent::Lifecycle(event)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionEvent::Shutdown).await;
    }
}

pub struct LessonSession {
    store: Arc<LayeredStore>,
    page: Box<dyn PageSurface>,
    registry: Arc<Mutex<PlayerRegistry>>,
    ledger: ProgressLedger,
    controller: Option<UnlockController>,
    completion: CompletionWatcher,
    navigation: NavigationMemory,
    telemetry: Option<Arc<TelemetryClient>>,
    identity: Option<VisitorIdentity>,
    params: SessionParams,
    rescan_interval: Duration,
    track_interval: Duration,
    badge_dismiss: Duration,
    events: Option<mpsc::Receiver<SessionEvent>>,
    tx: mpsc::Sender<SessionEvent>,
    playing: HashSet<String>,
    last_sent: HashMap<String, u8>,
    sent_final: HashSet<String>,
}

impl LessonSession {
    pub fn new(
        config: &Config,
        store: Arc<LayeredStore>,
        page: Box<dyn PageSurface>,
        registry: Arc<Mutex<PlayerRegistry>>,
        telemetry: Option<Arc<TelemetryClient>>,
        params: SessionParams,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(64);
        let identity = VisitorIdentity::resolve(&store, &params);
        let ledger = ProgressLedger::new(&store, config.unlock_threshold);
        let controller = identity
            .as_ref()
            .map(|_| UnlockController::new(ledger.clone()));
        let telemetry = if identity.is_some() { telemetry } else { None };
        let completion = CompletionWatcher::new(&store, config.unlock_threshold);
        let navigation = NavigationMemory::new(&store, ReferrerPolicy::from_config(config));

        let session = LessonSession {
            store,
            page,
            registry,
            ledger,
            controller,
            completion,
            navigation,
            telemetry,
            identity,
            params,
            rescan_interval: Duration::from_millis(config.rescan_interval_ms),
            track_interval: Duration::from_millis(config.track_interval_ms),
            badge_dismiss: Duration::from_millis(config.badge_dismiss_ms),
            events: Some(rx),
            tx: tx.clone(),
            playing: HashSet::new(),
            last_sent: HashMap::new(),
            sent_final: HashSet::new(),
        };
        (session, SessionHandle { tx })
    }

    /// Drive the session until shutdown or unload, then flush the store.
    pub async fn run(mut self) {
        let Some(mut events) = self.events.take() else {
            return;
        };
        tracing::info!(
            page_url = %self.params.page_url,
            gating = self.controller.is_some(),
            "lesson session starting"
        );

        let referrer = self.params.referrer.clone();
        let page_url = self.params.page_url.clone();
        self.navigation
            .install_back_button(&page_url, referrer.as_deref(), self.page.as_mut());
        self.run_rescan();

        let mut rescan = interval(self.rescan_interval);
        rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut track = interval(self.track_interval);
        track.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(event) => {
                        if !self.handle(event) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = rescan.tick() => self.run_rescan(),
                _ = track.tick() => self.run_track_tick(),
            }
        }

        self.store.flush_all();
        tracing::info!("lesson session ended");
    }

    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Player(event) => self.handle_player(event),
            SessionEvent::Lifecycle(LifecycleEvent::Hidden) => {
                // Catch updates a passed probe no longer guarantees.
                self.store.flush_all();
            }
            SessionEvent::Lifecycle(LifecycleEvent::Unload) => {
                self.store.flush_all();
                return false;
            }
            SessionEvent::DismissBadge { slot } => self.page.dismiss_badge(slot),
            SessionEvent::Shutdown => return false,
        }
        true
    }

    fn handle_player(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Play { resource_id } => {
                self.playing.insert(resource_id.clone());
                let percent = self.ledger.percent(&resource_id);
                self.send_telemetry(&resource_id, percent);
                self.last_sent.insert(resource_id, percent);
            }
            PlayerEvent::Pause { resource_id } => {
                self.playing.remove(&resource_id);
            }
            PlayerEvent::ProgressChanged {
                resource_id,
                fraction,
            } => {
                let newly = match self.controller.as_mut() {
                    Some(controller) => {
                        controller.ingest_progress(&resource_id, fraction, self.page.as_mut())
                    }
                    None => {
                        // Progress still feeds completion and persistence.
                        self.ledger.record_fraction(&resource_id, fraction);
                        Vec::new()
                    }
                };
                self.schedule_badges(newly);
                let percent = self.ledger.percent(&resource_id);
                self.completion
                    .observe_progress(&resource_id, percent, self.page.as_mut());
            }
            PlayerEvent::Ended { resource_id } => {
                self.playing.remove(&resource_id);
                let newly = match self.controller.as_mut() {
                    Some(controller) => controller.ingest_ended(&resource_id, self.page.as_mut()),
                    None => {
                        self.ledger.record_percent(&resource_id, 100);
                        Vec::new()
                    }
                };
                self.schedule_badges(newly);
                self.completion.observe_end(&resource_id, self.page.as_mut());
                if self.sent_final.insert(resource_id.clone()) {
                    self.send_telemetry(&resource_id, 100);
                }
            }
        }
    }

    fn run_rescan(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            let newly = controller.rescan(self.page.as_mut());
            self.schedule_badges(newly);
        }
        let registry = Arc::clone(&self.registry);
        let registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        self.completion.ensure_armed(&registry, self.page.as_mut());
    }

    /// Periodic tracking: one ping per playing video whose floored percent
    /// rose since the last send.
    fn run_track_tick(&mut self) {
        if self.telemetry.is_none() {
            return;
        }
        let playing: Vec<String> = self.playing.iter().cloned().collect();
        for resource_id in playing {
            let percent = self.ledger.percent(&resource_id);
            let last = self.last_sent.get(&resource_id).copied().unwrap_or(0);
            if percent > last {
                self.send_telemetry(&resource_id, percent);
                self.last_sent.insert(resource_id, percent);
            }
        }
    }

    fn send_telemetry(&self, resource_id: &str, percent: u8) {
        let (Some(telemetry), Some(identity)) =
            (self.telemetry.as_ref(), self.identity.as_ref())
        else {
            return;
        };
        let descriptor = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.find(resource_id).cloned()
        };
        let Some(descriptor) = descriptor else {
            tracing::debug!(resource_id, "no media descriptor registered; skipping ping");
            return;
        };
        let ping = ProgressPing::new(
            resource_id,
            identity.contact_id.clone(),
            identity.user_id.clone(),
            percent,
            descriptor.media_hash,
            descriptor.duration_seconds,
            identity.visitor_key,
            self.params.webinar.clone().unwrap_or_default(),
        );
        telemetry.send_progress(ping);
    }

    fn schedule_badges(&self, slots: Vec<SlotId>) {
        for slot in slots {
            let tx = self.tx.clone();
            let delay = self.badge_dismiss;
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = tx.send(SessionEvent::DismissBadge { slot }).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::page::VirtualPage;
    use crate::player::MediaDescriptor;
    use crate::store::{LayerKind, LayeredStore, MemoryBackend, StorageBackend};

    use super::*;

    fn test_config() -> Config {
        Config {
            rescan_interval_ms: 20,
            track_interval_ms: 50,
            badge_dismiss_ms: 30,
            ..Config::default()
        }
    }

    fn session_store() -> (Arc<LayeredStore>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new(LayerKind::Session));
        let store = Arc::new(LayeredStore::new(vec![
            backend.clone() as Arc<dyn StorageBackend>
        ]));
        (store, backend)
    }

    fn registry_for(ids: &[(&str, SlotId)]) -> Arc<Mutex<PlayerRegistry>> {
        let mut registry = PlayerRegistry::new();
        for (id, slot) in ids {
            registry.register(MediaDescriptor {
                resource_id: id.to_string(),
                media_hash: format!("hash-{id}"),
                duration_seconds: 300.0,
                slot: *slot,
            });
        }
        Arc::new(Mutex::new(registry))
    }

    fn params() -> SessionParams {
        SessionParams {
            page_url: "https://pages.example.com/lesson-2".into(),
            referrer: None,
            user_id: "31".into(),
            contact_id: "557".into(),
            webinar: None,
        }
    }

    #[tokio::test]
    async fn walkthrough_unlocks_badges_and_persists() {
        let (store, backend) = session_store();
        let page = VirtualPage::new();
        let a = page.add_video(Some("1"), false);
        let b = page.add_video(Some("2"), false);
        let registry = registry_for(&[("1", a), ("2", b)]);

        let (session, handle) = LessonSession::new(
            &test_config(),
            store,
            Box::new(page.clone()),
            registry,
            None,
            params(),
        );
        let task = tokio::spawn(session.run());

        handle
            .player_event(PlayerEvent::Play {
                resource_id: "1".into(),
            })
            .await;
        handle
            .player_event(PlayerEvent::ProgressChanged {
                resource_id: "1".into(),
                fraction: 0.95,
            })
            .await;

        // Give the loop time to unlock and the badge timer to fire.
        sleep(Duration::from_millis(150)).await;
        {
            let surface = page.clone();
            assert!(!surface.is_locked(a));
            assert!(!surface.is_locked(b));
            assert!(surface.is_marked_unlocked(b));
            assert!(!page.has_badge(b));
        }

        handle.shutdown().await;
        task.await.unwrap();

        // Progress reached the backing layer.
        assert_eq!(
            backend.get("video_progress", "1").unwrap(),
            Some(json!(95))
        );
    }

    #[tokio::test]
    async fn invalid_identity_disables_gating() {
        let (store, _) = session_store();
        let page = VirtualPage::new();
        page.add_video(Some("1"), false);
        let locked_candidate = page.add_video(Some("2"), false);
        let registry = registry_for(&[]);

        let bad_params = SessionParams {
            user_id: "not-a-number".into(),
            ..params()
        };
        let (session, handle) = LessonSession::new(
            &test_config(),
            store,
            Box::new(page.clone()),
            registry,
            None,
            bad_params,
        );
        let task = tokio::spawn(session.run());

        sleep(Duration::from_millis(60)).await;
        assert!(!page.clone().is_locked(locked_candidate));

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn hidden_lifecycle_flushes_the_store() {
        let (store, backend) = session_store();
        let page = VirtualPage::new();
        let a = page.add_video(Some("1"), false);
        let registry = registry_for(&[("1", a)]);

        let (session, handle) = LessonSession::new(
            &test_config(),
            store,
            Box::new(page.clone()),
            registry,
            None,
            params(),
        );
        let task = tokio::spawn(session.run());

        handle
            .player_event(PlayerEvent::ProgressChanged {
                resource_id: "1".into(),
                fraction: 0.4,
            })
            .await;
        sleep(Duration::from_millis(40)).await;

        // Simulate backgrounding eviction, then page-hide.
        backend.remove("video_progress", "1").unwrap();
        handle.lifecycle(LifecycleEvent::Hidden).await;
        sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.get("video_progress", "1").unwrap(), Some(json!(40)));

        handle.lifecycle(LifecycleEvent::Unload).await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn completion_reveals_cta_through_the_session() {
        let (store, _) = session_store();
        let page = VirtualPage::new();
        let a = page.add_video(Some("1"), false);
        page.add_cta_button();
        let registry = registry_for(&[("1", a)]);

        let (session, handle) = LessonSession::new(
            &test_config(),
            store,
            Box::new(page.clone()),
            registry,
            None,
            params(),
        );
        let task = tokio::spawn(session.run());

        // Let a rescan arm the watcher before the video ends.
        sleep(Duration::from_millis(40)).await;
        handle
            .player_event(PlayerEvent::Ended {
                resource_id: "1".into(),
            })
            .await;
        sleep(Duration::from_millis(40)).await;
        assert!(page.cta_visible());

        handle.shutdown().await;
        task.await.unwrap();
    }
}
