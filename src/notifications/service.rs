use super::dnd::DndStore;
use super::history::HistoryStore;
use super::image::ImageCache;
use super::model::{CloseReason, Notification, NotifyRequest, Urgency};
use crate::clienv;
use crate::error::{Error, Result};
use crate::eww::WidgetSink;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const ACTIVE_VARIABLE: &str = "NOTIFICATION";
pub const HISTORY_VARIABLE: &str = "NOTIFICATION_HISTORY";

/// Emits the protocol's signals on the connection that owns the bus name.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn action_invoked(&self, id: u32, action_key: &str) -> Result<()>;

    async fn notification_closed(&self, id: u32, reason: CloseReason) -> Result<()>;
}

pub struct ServicePaths {
    pub history: PathBuf,
    pub dnd: PathBuf,
    pub image_cache: PathBuf,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            history: clienv::history_path(),
            dnd: clienv::dnd_path(),
            image_cache: clienv::image_cache_dir(),
        }
    }
}

struct ActiveEntry {
    notification: Notification,
    generation: u64,
    expiry: Option<JoinHandle<()>>,
}

impl ActiveEntry {
    fn cancel_expiry(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct ActiveTable {
    entries: HashMap<u32, ActiveEntry>,
    generation: u64,
}

impl ActiveTable {
    fn remove(&mut self, id: u32) -> Option<ActiveEntry> {
        let mut entry = self.entries.remove(&id)?;
        entry.cancel_expiry();
        Some(entry)
    }

    /// Active notifications, highest ID first.
    fn snapshot(&self) -> Vec<Notification> {
        let mut snapshot: Vec<Notification> = self
            .entries
            .values()
            .map(|e| e.notification.clone())
            .collect();
        snapshot.sort_by(|a, b| b.id.cmp(&a.id));
        snapshot
    }
}

/// The in-process notification server state.
///
/// Constructed once per daemon; the bus interface, the control socket and
/// the expiry timers all share it through an `Arc`.
pub struct NotificationService {
    active: Mutex<ActiveTable>,
    next_id: AtomicU32,
    history: HistoryStore,
    dnd: DndStore,
    images: ImageCache,
    sink: Arc<dyn WidgetSink>,
    signals: OnceLock<Arc<dyn SignalSink>>,
    exec_hook: Vec<String>,
}

impl NotificationService {
    pub fn new(paths: ServicePaths, sink: Arc<dyn WidgetSink>, exec_hook: Vec<String>) -> Self {
        Self {
            active: Mutex::new(ActiveTable::default()),
            next_id: AtomicU32::new(seed_id()),
            history: HistoryStore::new(paths.history),
            dnd: DndStore::new(paths.dnd),
            images: ImageCache::new(paths.image_cache),
            sink,
            signals: OnceLock::new(),
            exec_hook,
        }
    }

    /// Installs the signal emitter once the bus name is owned.
    pub fn attach_signals(&self, signals: Arc<dyn SignalSink>) {
        if self.signals.set(signals).is_err() {
            warn!("Signal emitter already attached");
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    fn table(&self) -> std::sync::MutexGuard<'_, ActiveTable> {
        self.active.lock().expect("active notification lock poisoned")
    }

    pub fn active_ids(&self) -> Vec<u32> {
        self.table().snapshot().iter().map(|n| n.id).collect()
    }

    pub fn active_snapshot(&self) -> Vec<Notification> {
        self.table().snapshot()
    }

    /// Handles a `Notify` call and returns the notification's ID.
    pub async fn notify(self: &Arc<Self>, request: NotifyRequest) -> u32 {
        let id = if request.replaces_id != 0 {
            request.replaces_id
        } else {
            self.fresh_id()
        };

        let urgency = Urgency::from_hints(&request.hints);
        let app_icon = match self.images.resolve(id, &request.hints) {
            Ok(Some(icon)) => icon,
            Ok(None) => request.app_icon,
            Err(e) => {
                warn!(id, "Falling back to app icon: {}", e);
                request.app_icon
            }
        };
        let expire_timeout = urgency.resolve_timeout(request.expire_timeout);

        let notification = Notification {
            id,
            app_name: request.app_name,
            replaces_id: request.replaces_id,
            app_icon,
            summary: request.summary,
            body: request.body,
            actions: request.actions,
            hints: request.hints,
            expire_timeout,
            timestamp: chrono::Utc::now().timestamp(),
        };

        let snapshot = {
            let mut table = self.table();
            table.generation += 1;
            let generation = table.generation;
            let expiry = (expire_timeout > 0).then(|| {
                self.schedule_auto_clear(id, generation, Duration::from_millis(expire_timeout as u64))
            });
            let replaced = table.entries.insert(
                id,
                ActiveEntry {
                    notification: notification.clone(),
                    generation,
                    expiry,
                },
            );
            if let Some(mut old) = replaced {
                debug!(id, "Replacing active notification");
                old.cancel_expiry();
            }
            table.snapshot()
        };

        info!(id, app = %notification.app_name, ?urgency, expire_timeout, "Notification received");

        if let Err(e) = self.history.append(&notification) {
            warn!(id, "History write error: {}", e);
        }

        self.push_history().await;
        if self.dnd.get() {
            debug!(id, "Do-not-disturb on, not pushing to UI");
        } else {
            self.push_active(&snapshot).await;
        }

        if !self.exec_hook.is_empty() {
            let hook = self.exec_hook.clone();
            let notification = notification.clone();
            tokio::spawn(async move { run_exec_hook(&hook, &notification).await });
        }

        id
    }

    /// Removes `id` from view and from history. History failures are
    /// logged; the close itself always succeeds.
    pub async fn close_by_id(&self, id: u32) {
        let snapshot = {
            let mut table = self.table();
            table.remove(id);
            table.snapshot()
        };
        self.push_active(&snapshot).await;

        if let Err(e) = self.history.remove(id) {
            warn!(id, "History rewrite error: {}", e);
        }
        self.push_history().await;
    }

    /// Removes `id` from view; history keeps it. Returns whether it was active.
    pub async fn close_view_only(&self, id: u32) -> bool {
        let (removed, snapshot) = {
            let mut table = self.table();
            let removed = table.remove(id).is_some();
            (removed, table.snapshot())
        };
        self.push_active(&snapshot).await;
        removed
    }

    /// `CloseNotification` from a client.
    pub async fn close_by_call(&self, id: u32) {
        let snapshot = {
            let mut table = self.table();
            table.remove(id);
            table.snapshot()
        };
        self.push_active(&snapshot).await;
        self.emit_closed(id, CloseReason::ClosedByCall).await;
    }

    /// Emits `ActionInvoked`, then dismisses the notification from view.
    pub async fn invoke_action(&self, id: u32, action_key: &str) -> Result<()> {
        let signals = self.signals.get().ok_or(Error::NoBusConnection)?;
        info!(id, action_key, "Invoking action");

        signals.action_invoked(id, action_key).await?;
        self.close_view_only(id).await;
        if let Err(e) = signals.notification_closed(id, CloseReason::Dismissed).await {
            warn!(id, "Failed to emit NotificationClosed: {}", e);
        }
        Ok(())
    }

    pub fn dnd(&self) -> bool {
        self.dnd.get()
    }

    pub fn set_dnd(&self, on: bool) -> Result<()> {
        self.dnd.set(on)
    }

    pub fn toggle_dnd(&self) -> Result<bool> {
        self.dnd.toggle()
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.history.clear()?;
        self.sink.update(HISTORY_VARIABLE, &Value::Array(Vec::new())).await;
        Ok(())
    }

    pub fn history_count(&self) -> usize {
        self.history.count()
    }

    /// Pushes the stored history, e.g. right after startup.
    pub async fn push_history(&self) {
        let history = self.history.load();
        match serde_json::to_value(&history) {
            Ok(value) => self.sink.update(HISTORY_VARIABLE, &value).await,
            Err(e) => warn!("Failed to serialize history: {}", e),
        }
    }

    async fn push_active(&self, snapshot: &[Notification]) {
        match serde_json::to_value(snapshot) {
            Ok(value) => self.sink.update(ACTIVE_VARIABLE, &value).await,
            Err(e) => warn!("Failed to serialize active notifications: {}", e),
        }
    }

    async fn emit_closed(&self, id: u32, reason: CloseReason) {
        let Some(signals) = self.signals.get() else {
            debug!(id, ?reason, "No bus connection, NotificationClosed not emitted");
            return;
        };
        if let Err(e) = signals.notification_closed(id, reason).await {
            warn!(id, "Failed to emit NotificationClosed: {}", e);
        }
    }

    /// Next time-seeded ID that is neither 0 nor currently active.
    fn fresh_id(&self) -> u32 {
        let table = self.table();
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 && !table.entries.contains_key(&id) {
                return id;
            }
        }
    }

    fn schedule_auto_clear(
        self: &Arc<Self>,
        id: u32,
        generation: u64,
        delay: Duration,
    ) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(service) = service.upgrade() {
                service.expire(id, generation).await;
            }
        })
    }

    async fn expire(&self, id: u32, generation: u64) {
        let snapshot = {
            let mut table = self.table();
            match table.entries.get(&id) {
                Some(entry) if entry.generation == generation => {}
                _ => return,
            }
            // The running timer is this task; dropping its handle is enough.
            if let Some(entry) = table.entries.remove(&id) {
                drop(entry.expiry);
            }
            table.snapshot()
        };

        debug!(id, "Notification expired");
        if !self.dnd.get() {
            self.push_active(&snapshot).await;
        }
        self.emit_closed(id, CloseReason::Expired).await;
    }
}

fn seed_id() -> u32 {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    (nanos & 0x7fff_ffff) as u32
}

async fn run_exec_hook(hook: &[String], notification: &Notification) {
    let Some((program, args)) = hook.split_first() else {
        return;
    };
    let payload = match serde_json::to_string(notification) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize notification for exec hook: {}", e);
            return;
        }
    };

    match Command::new(program)
        .args(args)
        .env("NOTIFICATION", payload)
        .status()
        .await
    {
        Ok(status) if status.success() => debug!(program = %program, "Exec hook finished"),
        Ok(status) => warn!(program = %program, code = ?status.code(), "Exec hook failed"),
        Err(e) => warn!(program = %program, "Exec hook error: {}", e),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSignals;
    use super::*;
    use crate::eww::testing::RecordingSink;
    use crate::notifications::model::{HintValue, Hints, ImageData};

    struct Fixture {
        _dir: tempfile::TempDir,
        sink: Arc<RecordingSink>,
        signals: Arc<RecordingSignals>,
        service: Arc<NotificationService>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = ServicePaths {
            history: dir.path().join("history.jsonl"),
            dnd: dir.path().join("dnd"),
            image_cache: dir.path().join("images"),
        };
        let sink = Arc::new(RecordingSink::default());
        let signals = Arc::new(RecordingSignals::default());
        let service = Arc::new(NotificationService::new(paths, sink.clone(), Vec::new()));
        service.attach_signals(signals.clone());
        Fixture {
            _dir: dir,
            sink,
            signals,
            service,
        }
    }

    fn request(summary: &str, urgency: i64, timeout: i32) -> NotifyRequest {
        let mut hints = Hints::new();
        hints.insert("urgency".into(), HintValue::Int(urgency));
        NotifyRequest {
            app_name: "mail-client".into(),
            summary: summary.into(),
            body: "You have 3 unread".into(),
            hints,
            expire_timeout: timeout,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn normal_notification_expires_after_ten_seconds() {
        let f = fixture();
        let id = f.service.notify(request("New mail", 1, -1)).await;
        assert_ne!(id, 0);
        assert_eq!(f.service.active_ids(), vec![id]);

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(f.service.active_ids(), vec![id]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.signals.closed(), vec![(id, CloseReason::Expired)]);
    }

    #[tokio::test(start_paused = true)]
    async fn low_urgency_expires_after_five_seconds() {
        let f = fixture();
        let id = f.service.notify(request("Low", 0, -1)).await;
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.signals.closed(), vec![(id, CloseReason::Expired)]);
    }

    #[tokio::test(start_paused = true)]
    async fn critical_notification_never_expires() {
        let f = fixture();
        let id = f.service.notify(request("Battery 3%", 2, -1)).await;
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(f.service.active_ids(), vec![id]);
        assert_eq!(f.service.active_snapshot()[0].expire_timeout, 0);
        assert!(f.signals.closed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_reuses_id_and_resets_timer() {
        let f = fixture();
        let id = f.service.notify(request("First", 0, -1)).await;

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        let mut replacement = request("Second", 1, -1);
        replacement.replaces_id = id;
        assert_eq!(f.service.notify(replacement).await, id);
        assert_eq!(f.service.active_ids(), vec![id]);

        // The first timer would have fired at 5s.
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        let active = f.service.active_snapshot();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].summary, "Second");

        tokio::time::sleep(Duration::from_millis(7_100)).await;
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.signals.closed(), vec![(id, CloseReason::Expired)]);
    }

    #[tokio::test]
    async fn ids_are_unique_and_nonzero() {
        let f = fixture();
        let mut ids = Vec::new();
        for i in 0..20 {
            ids.push(f.service.notify(request(&format!("n{i}"), 2, -1)).await);
        }
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
        assert!(ids.iter().all(|id| *id != 0));
        assert_eq!(f.service.active_ids().len(), 20);
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_id_descending() {
        let f = fixture();
        for i in 0..3 {
            f.service.notify(request(&format!("n{i}"), 2, -1)).await;
        }
        let pushed = f.sink.last(ACTIVE_VARIABLE).unwrap();
        let ids: Vec<u64> = pushed
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_u64().unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn dnd_records_history_but_skips_ui() {
        let f = fixture();
        f.service.set_dnd(true).unwrap();

        let id = f.service.notify(request("Quiet", 1, -1)).await;
        assert_ne!(id, 0);
        assert_eq!(f.service.history_count(), 1);
        assert!(f.sink.updates_for(ACTIVE_VARIABLE).is_empty());
        let history = f.sink.updates_for(HISTORY_VARIABLE);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].as_array().unwrap().len(), 1);
        assert_eq!(f.service.active_ids(), vec![id]);

        f.service.set_dnd(false).unwrap();
        f.service.notify(request("Loud", 1, -1)).await;
        assert_eq!(f.sink.updates_for(ACTIVE_VARIABLE).len(), 1);
    }

    #[tokio::test]
    async fn close_view_only_keeps_history() {
        let f = fixture();
        let id = f.service.notify(request("Keep me", 2, -1)).await;
        assert!(f.service.close_view_only(id).await);
        assert!(!f.service.close_view_only(id).await);
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.service.history_count(), 1);
    }

    #[tokio::test]
    async fn close_by_id_removes_from_history() {
        let f = fixture();
        let gone = f.service.notify(request("Gone", 2, -1)).await;
        let kept = f.service.notify(request("Kept", 2, -1)).await;

        f.service.close_by_id(gone).await;
        f.service.close_by_id(gone).await;

        assert_eq!(f.service.active_ids(), vec![kept]);
        let history = f.service.history().load();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, kept);
        assert_eq!(
            f.sink.last(HISTORY_VARIABLE).unwrap().as_array().unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn close_by_id_survives_unwritable_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("history.jsonl");
        std::fs::create_dir_all(&history).unwrap();
        let paths = ServicePaths {
            history,
            dnd: dir.path().join("dnd"),
            image_cache: dir.path().join("images"),
        };
        let sink = Arc::new(RecordingSink::default());
        let service = Arc::new(NotificationService::new(paths, sink.clone(), Vec::new()));

        let id = service.notify(request("Stuck", 1, -1)).await;
        assert_eq!(service.active_ids(), vec![id]);
        let pushes = sink.updates_for(HISTORY_VARIABLE).len();

        service.close_by_id(id).await;

        assert!(service.active_ids().is_empty());
        assert_eq!(sink.last(ACTIVE_VARIABLE).unwrap(), Value::Array(Vec::new()));
        assert_eq!(sink.updates_for(HISTORY_VARIABLE).len(), pushes + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dnd_notification_expires_without_ui_push() {
        let f = fixture();
        f.service.set_dnd(true).unwrap();

        let id = f.service.notify(request("Quiet", 0, -1)).await;
        assert_eq!(f.service.active_ids(), vec![id]);

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.signals.closed(), vec![(id, CloseReason::Expired)]);
        assert!(f.sink.updates_for(ACTIVE_VARIABLE).is_empty());
    }

    #[tokio::test]
    async fn close_by_call_emits_reason_three() {
        let f = fixture();
        let id = f.service.notify(request("Bye", 2, -1)).await;
        f.service.close_by_call(id).await;
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.signals.closed(), vec![(id, CloseReason::ClosedByCall)]);
    }

    #[tokio::test]
    async fn invoke_action_emits_then_dismisses() {
        let f = fixture();
        let id = f.service.notify(request("Reply?", 2, -1)).await;
        f.service.invoke_action(id, "reply").await.unwrap();

        assert_eq!(f.signals.invoked(), vec![(id, "reply".to_string())]);
        assert_eq!(f.signals.closed(), vec![(id, CloseReason::Dismissed)]);
        assert!(f.service.active_ids().is_empty());
        assert_eq!(f.service.history_count(), 1);
    }

    #[tokio::test]
    async fn invoke_action_without_bus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ServicePaths {
            history: dir.path().join("history.jsonl"),
            dnd: dir.path().join("dnd"),
            image_cache: dir.path().join("images"),
        };
        let service = Arc::new(NotificationService::new(
            paths,
            Arc::new(RecordingSink::default()),
            Vec::new(),
        ));
        let err = service.invoke_action(1, "default").await.unwrap_err();
        assert!(matches!(err, Error::NoBusConnection));
    }

    #[tokio::test]
    async fn clear_history_pushes_empty_list() {
        let f = fixture();
        for i in 0..3 {
            f.service.notify(request(&format!("n{i}"), 2, -1)).await;
        }
        assert_eq!(f.service.history_count(), 3);

        f.service.clear_history().await.unwrap();
        assert_eq!(f.service.history_count(), 0);
        assert_eq!(f.sink.last(HISTORY_VARIABLE).unwrap(), Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn malformed_image_hint_falls_back_to_icon() {
        let f = fixture();
        let mut req = request("Broken image", 2, -1);
        req.app_icon = "mail-unread".into();
        req.hints.insert(
            "image-data".into(),
            HintValue::Image(ImageData {
                width: 4,
                height: 4,
                rowstride: 12,
                has_alpha: false,
                bits_per_sample: 8,
                channels: 3,
                data: vec![0; 5],
            }),
        );

        let id = f.service.notify(req).await;
        assert_ne!(id, 0);
        assert_eq!(f.service.active_snapshot()[0].app_icon, "mail-unread");
    }
}
