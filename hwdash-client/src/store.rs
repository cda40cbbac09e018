use hwdash_proto::HardwareSnapshot;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::config::LastUpdateMode;

/// Error string shown when a refresh produced no snapshot.
pub const NO_DATA_MESSAGE: &str = "No data available";

/// Where the latest snapshot comes from.
///
/// Implementations report legitimately missing data as `Ok(None)`; an `Err`
/// is the escape hatch for sources that can fail unexpectedly. The seam also
/// lets tests substitute a scripted source.
#[allow(async_fn_in_trait)]
pub trait SnapshotSource {
    async fn latest(&self) -> anyhow::Result<Option<HardwareSnapshot>>;
}

/// Observable dashboard state.
///
/// After a completed refresh either `snapshot` reflects it or `error` does;
/// a failed refresh keeps the previous snapshot around so the UI can render
/// stale data next to the error instead of going blank.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub snapshot: Option<HardwareSnapshot>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_update: Option<OffsetDateTime>,
}

/// Mediates between a consumer and a [`SnapshotSource`].
///
/// State transitions are published through a watch channel, so a UI can
/// re-render on each one, including the in-flight loading state. `refresh`
/// is the only mutator; overlapping calls are not serialized here (last
/// write wins), callers drive one refresh at a time.
pub struct MetricsStore<S> {
    source: S,
    last_update_mode: LastUpdateMode,
    state: watch::Sender<StoreState>,
}

impl<S: SnapshotSource> MetricsStore<S> {
    pub fn new(source: S, last_update_mode: LastUpdateMode) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            source,
            last_update_mode,
            state,
        }
    }

    /// Current state, cloned out of the channel.
    pub fn state(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Change notifications for reactive consumers.
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    /// Run one fetch cycle and fold the outcome into the state.
    ///
    /// The loading flag is raised before the first suspension point, and a
    /// drop guard lowers it again on every exit path, even if this future
    /// is dropped mid-flight.
    pub async fn refresh(&self) {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
        let _loading = LoadingGuard(&self.state);

        match self.source.latest().await {
            Ok(Some(snapshot)) => {
                let last_update = self.last_update(&snapshot);
                self.state.send_modify(|state| {
                    state.snapshot = Some(snapshot);
                    state.error = None;
                    state.last_update = Some(last_update);
                });
            }
            Ok(None) => self.state.send_modify(|state| {
                state.error = Some(NO_DATA_MESSAGE.to_owned());
            }),
            Err(e) => self.state.send_modify(|state| {
                state.error = Some(e.to_string());
            }),
        }
    }

    fn last_update(&self, snapshot: &HardwareSnapshot) -> OffsetDateTime {
        match self.last_update_mode {
            // an out-of-range producer timestamp falls back to the refresh time
            LastUpdateMode::SnapshotTimestamp => {
                OffsetDateTime::from_unix_timestamp(snapshot.timestamp)
                    .unwrap_or_else(|_| OffsetDateTime::now_utc())
            }
            LastUpdateMode::WallClock => OffsetDateTime::now_utc(),
        }
    }
}

/// Clears the loading flag when dropped.
struct LoadingGuard<'a>(&'a watch::Sender<StoreState>);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|state| state.is_loading = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tokio::sync::oneshot;

    fn snapshot(pc_name: &str, timestamp: i64) -> HardwareSnapshot {
        HardwareSnapshot {
            cpu_temp_tctl: 55.0,
            cpu_temp_ccd1: 50.0,
            cpu_power: 45.2,
            gpu_temp: 60.0,
            gpu_power: 120.0,
            pc_name: pc_name.to_owned(),
            timestamp,
        }
    }

    struct FixedSource(Option<HardwareSnapshot>);

    impl SnapshotSource for FixedSource {
        async fn latest(&self) -> anyhow::Result<Option<HardwareSnapshot>> {
            Ok(self.0.clone())
        }
    }

    /// Replays a list of outcomes, one per `latest` call.
    struct ScriptedSource(RefCell<Vec<anyhow::Result<Option<HardwareSnapshot>>>>);

    impl SnapshotSource for ScriptedSource {
        async fn latest(&self) -> anyhow::Result<Option<HardwareSnapshot>> {
            self.0.borrow_mut().remove(0)
        }
    }

    #[tokio::test]
    async fn successful_refresh_publishes_the_snapshot() {
        let snap = snapshot("rig1", 1_700_000_000);
        let store = MetricsStore::new(
            FixedSource(Some(snap.clone())),
            LastUpdateMode::SnapshotTimestamp,
        );

        store.refresh().await;

        let state = store.state();
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(state.snapshot, Some(snap));
        assert_eq!(
            state.last_update,
            Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap())
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_stale_snapshot() {
        let snap = snapshot("rig1", 1_700_000_000);
        let store = MetricsStore::new(
            ScriptedSource(RefCell::new(vec![Ok(Some(snap.clone())), Ok(None)])),
            LastUpdateMode::SnapshotTimestamp,
        );

        store.refresh().await;
        let after_success = store.state();

        store.refresh().await;
        let after_failure = store.state();

        assert!(!after_failure.is_loading);
        assert_eq!(after_failure.error.as_deref(), Some(NO_DATA_MESSAGE));
        assert_eq!(after_failure.snapshot, Some(snap));
        assert_eq!(after_failure.last_update, after_success.last_update);
    }

    #[tokio::test]
    async fn refresh_after_a_failure_clears_the_error() {
        let snap = snapshot("rig1", 1_700_000_000);
        let store = MetricsStore::new(
            ScriptedSource(RefCell::new(vec![Ok(None), Ok(Some(snap.clone()))])),
            LastUpdateMode::SnapshotTimestamp,
        );

        store.refresh().await;
        assert_eq!(store.state().error.as_deref(), Some(NO_DATA_MESSAGE));

        store.refresh().await;
        let state = store.state();
        assert_eq!(state.error, None);
        assert_eq!(state.snapshot, Some(snap));
    }

    #[tokio::test]
    async fn source_failure_surfaces_its_description() {
        let store = MetricsStore::new(
            ScriptedSource(RefCell::new(vec![Err(anyhow::anyhow!(
                "connection reset by peer"
            ))])),
            LastUpdateMode::SnapshotTimestamp,
        );

        store.refresh().await;

        let state = store.state();
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("connection reset by peer"));
        assert_eq!(state.snapshot, None);
    }

    #[tokio::test]
    async fn wall_clock_mode_ignores_the_embedded_timestamp() {
        let before = OffsetDateTime::now_utc();
        let store = MetricsStore::new(
            FixedSource(Some(snapshot("rig1", 1_700_000_000))),
            LastUpdateMode::WallClock,
        );

        store.refresh().await;

        let last_update = store.state().last_update.unwrap();
        assert!(last_update >= before);
    }

    /// Blocks until released, so the in-flight state can be observed.
    struct BlockedSource(RefCell<Option<oneshot::Receiver<()>>>);

    impl SnapshotSource for BlockedSource {
        async fn latest(&self) -> anyhow::Result<Option<HardwareSnapshot>> {
            let rx = self.0.borrow_mut().take().expect("single use");
            rx.await.ok();
            Ok(None)
        }
    }

    #[tokio::test]
    async fn loading_flag_is_raised_before_the_fetch_completes() {
        let (release, released) = oneshot::channel();
        let store = MetricsStore::new(
            BlockedSource(RefCell::new(Some(released))),
            LastUpdateMode::SnapshotTimestamp,
        );
        let mut updates = store.subscribe();

        let observer = async {
            updates.changed().await.unwrap();
            let in_flight = updates.borrow_and_update().clone();
            release.send(()).unwrap();
            in_flight
        };

        let ((), in_flight) = tokio::join!(store.refresh(), observer);

        assert!(in_flight.is_loading);
        assert_eq!(in_flight.error, None);
        assert!(!store.state().is_loading);
    }
}
