use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::{self, FutureExt};
use serde::Serialize;
use shoelink_frame::ChannelName;
use shoelink_transport::{ErrorKind, Transport};
use tracing::{debug, info, warn};

use crate::command::{Command, Mode};
use crate::config::ChannelConfig;
use crate::error::{PeerError, Result};
use crate::events::{EventBus, MessageStream};
use crate::manager::{ChannelManager, ChannelStatus, OpFuture};

/// Per-channel outcomes of a group operation, ordered by channel name.
#[derive(Debug, Default)]
pub struct GroupReport {
    outcomes: Vec<(ChannelName, Result<()>)>,
}

impl GroupReport {
    async fn collect(ops: Vec<(ChannelName, OpFuture)>) -> Self {
        let (names, futures): (Vec<_>, Vec<_>) = ops.into_iter().unzip();
        let results = future::join_all(futures).await;
        Self {
            outcomes: names.into_iter().zip(results).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelName, &Result<()>)> {
        self.outcomes.iter().map(|(name, result)| (name, result))
    }

    pub fn get(&self, channel: &str) -> Option<&Result<()>> {
        self.outcomes
            .iter()
            .find(|(name, _)| name.as_str() == channel)
            .map(|(_, result)| result)
    }

    pub fn succeeded(&self) -> Vec<&ChannelName> {
        self.iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn failed(&self) -> Vec<(&ChannelName, &PeerError)> {
        self.iter()
            .filter_map(|(name, result)| result.as_ref().err().map(|err| (name, err)))
            .collect()
    }

    /// True for an empty report.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, result)| result.is_ok())
    }

    /// False for an empty report.
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|(_, result)| result.is_ok())
    }

    /// Serializable summary: channel name to `ok` or error kind and message.
    pub fn summary(&self) -> Vec<ChannelOutcome> {
        self.iter()
            .map(|(name, result)| ChannelOutcome {
                channel: name.clone(),
                ok: result.is_ok(),
                kind: result.as_ref().err().map(PeerError::kind),
                error: result.as_ref().err().map(ToString::to_string),
            })
            .collect()
    }

    fn require_all(self, operation: &'static str) -> std::result::Result<Self, GroupError> {
        if self.all_succeeded() {
            Ok(self)
        } else {
            Err(GroupError {
                operation,
                report: self,
            })
        }
    }

    fn require_any(self, operation: &'static str) -> std::result::Result<Self, GroupError> {
        if self.any_succeeded() {
            Ok(self)
        } else {
            Err(GroupError {
                operation,
                report: self,
            })
        }
    }
}

/// One row of [`GroupReport::summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: ChannelName,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A group operation missed its success policy.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed on {} of {} channels", .report.failed().len(), .report.len())]
pub struct GroupError {
    pub operation: &'static str,
    pub report: GroupReport,
}

impl GroupError {
    /// Kind of the first failure, or `NotConnected` when no channel exists.
    pub fn kind(&self) -> ErrorKind {
        self.report
            .failed()
            .first()
            .map_or(ErrorKind::NotConnected, |(_, err)| err.kind())
    }
}

pub type GroupResult = std::result::Result<GroupReport, GroupError>;

/// Named channels sharing one event bus.
///
/// Channels are independent: one channel's failure never changes another's
/// state. Group operations fan out concurrently, each channel still
/// serializing its own work.
pub struct Coordinator {
    channels: RwLock<BTreeMap<ChannelName, Arc<ChannelManager>>>,
    bus: EventBus,
    config: ChannelConfig,
    default_transport: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("channels", &self.channel_names())
            .field("config", &self.config)
            .finish()
    }
}

impl Coordinator {
    /// An empty coordinator; channels use `config` unless given their own.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            channels: RwLock::new(BTreeMap::new()),
            bus: EventBus::new(),
            config,
            default_transport: None,
        }
    }

    /// One device on the `default` channel.
    pub fn single(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let coordinator = Self::new(config);
        coordinator.add_channel(ChannelName::single(), transport);
        coordinator
    }

    /// A left and a right device.
    pub fn dual(
        left: Arc<dyn Transport>,
        right: Arc<dyn Transport>,
        config: ChannelConfig,
    ) -> Self {
        let coordinator = Self::new(config);
        coordinator.add_channel(ChannelName::left(), left);
        coordinator.add_channel(ChannelName::right(), right);
        coordinator
    }

    /// Transport used to create channels on first `connect` to an unknown name.
    pub fn with_default_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.default_transport = Some(transport);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ChannelName, Arc<ChannelManager>>> {
        self.channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ChannelName, Arc<ChannelManager>>> {
        self.channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a channel with the coordinator's default config.
    ///
    /// An existing channel of the same name is kept and returned.
    pub fn add_channel(
        &self,
        name: impl Into<ChannelName>,
        transport: Arc<dyn Transport>,
    ) -> Arc<ChannelManager> {
        self.add_channel_with_config(name, transport, self.config.clone())
    }

    pub fn add_channel_with_config(
        &self,
        name: impl Into<ChannelName>,
        transport: Arc<dyn Transport>,
        config: ChannelConfig,
    ) -> Arc<ChannelManager> {
        let name = name.into();
        let mut channels = self.write();
        if let Some(existing) = channels.get(&name) {
            warn!(channel = %name, "channel already registered; keeping existing");
            return Arc::clone(existing);
        }
        debug!(channel = %name, transport = %transport.describe(), "adding channel");
        let manager = Arc::new(ChannelManager::new(
            name.clone(),
            transport,
            config,
            self.bus.clone(),
        ));
        channels.insert(name, Arc::clone(&manager));
        manager
    }

    pub fn channel(&self, name: &str) -> Option<Arc<ChannelManager>> {
        self.read().get(name).cloned()
    }

    pub fn channel_names(&self) -> Vec<ChannelName> {
        self.read().keys().cloned().collect()
    }

    fn managers(&self) -> Vec<Arc<ChannelManager>> {
        self.read().values().cloned().collect()
    }

    fn resolve(&self, name: &str) -> Result<Arc<ChannelManager>> {
        self.channel(name)
            .ok_or_else(|| PeerError::UnknownChannel(name.to_string()))
    }

    fn with_channel(&self, name: &str, op: impl FnOnce(&ChannelManager) -> OpFuture) -> OpFuture {
        match self.resolve(name) {
            Ok(manager) => op(&manager),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    /// The shared event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Decoded messages from every channel.
    pub fn messages(&self) -> MessageStream {
        self.bus.messages(None)
    }

    /// Connect one channel, creating it from the default transport when the
    /// name is new.
    pub fn connect(&self, name: &str) -> OpFuture {
        if self.channel(name).is_none() {
            if let Some(transport) = &self.default_transport {
                self.add_channel(name, Arc::clone(transport));
            }
        }
        self.with_channel(name, ChannelManager::connect)
    }

    pub fn disconnect(&self, name: &str) -> OpFuture {
        self.with_channel(name, ChannelManager::disconnect)
    }

    pub fn send(&self, name: &str, command: &str) -> OpFuture {
        self.with_channel(name, |manager| manager.send(command))
    }

    pub fn send_command(&self, name: &str, command: &Command) -> OpFuture {
        self.with_channel(name, |manager| manager.send_command(command))
    }

    pub fn set_mode(&self, name: &str, mode: Mode) -> OpFuture {
        self.with_channel(name, |manager| manager.set_mode(mode))
    }

    pub fn set_keymap(&self, name: &str, index: u32, key_code: u32) -> OpFuture {
        self.with_channel(name, |manager| manager.set_keymap(index, key_code))
    }

    /// Connect every channel concurrently. Succeeds only if all do; a
    /// coordinator without channels succeeds trivially.
    pub fn connect_all(&self) -> impl Future<Output = GroupResult> + Send + 'static {
        let ops = self.fan_out(|manager| manager.connect());
        async move {
            let report = GroupReport::collect(ops).await;
            log_report("connect_all", &report);
            report.require_all("connect_all")
        }
    }

    /// Disconnect every channel concurrently. Succeeds only if all do.
    pub fn disconnect_all(&self) -> impl Future<Output = GroupResult> + Send + 'static {
        let ops = self.fan_out(|manager| manager.disconnect());
        async move {
            let report = GroupReport::collect(ops).await;
            log_report("disconnect_all", &report);
            report.require_all("disconnect_all")
        }
    }

    /// Switch mode on every channel; succeeds if at least one channel took
    /// the command. Disconnected channels fail fast with `NotConnected` and
    /// an `error` event of their own.
    pub fn set_mode_all(&self, mode: Mode) -> impl Future<Output = GroupResult> + Send + 'static {
        let ops = self.fan_out(|manager| manager.set_mode(mode));
        async move {
            let report = GroupReport::collect(ops).await;
            log_report("set_mode_all", &report);
            report.require_any("set_mode_all")
        }
    }

    /// Send a command to every channel; succeeds if at least one accepted it.
    pub fn send_all(&self, command: &str) -> impl Future<Output = GroupResult> + Send + 'static {
        let ops = self.fan_out(|manager| manager.send(command));
        async move {
            let report = GroupReport::collect(ops).await;
            log_report("send_all", &report);
            report.require_any("send_all")
        }
    }

    /// [`Coordinator::send_all`] for a structured command.
    pub fn send_command_all(
        &self,
        command: &Command,
    ) -> impl Future<Output = GroupResult> + Send + 'static {
        self.send_all(&command.to_wire())
    }

    fn fan_out(&self, op: impl Fn(&ChannelManager) -> OpFuture) -> Vec<(ChannelName, OpFuture)> {
        self.managers()
            .iter()
            .map(|manager| (manager.name().clone(), op(manager)))
            .collect()
    }

    pub fn status(&self) -> BTreeMap<ChannelName, ChannelStatus> {
        self.read()
            .iter()
            .map(|(name, manager)| (name.clone(), manager.status()))
            .collect()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.channel(name).is_some_and(|m| m.is_connected())
    }

    pub fn is_any_connected(&self) -> bool {
        self.managers().iter().any(|m| m.is_connected())
    }
}

fn log_report(operation: &str, report: &GroupReport) {
    let failed = report.failed();
    if failed.is_empty() {
        info!(operation, channels = report.len(), "group operation complete");
    } else {
        for (channel, err) in failed {
            warn!(operation, channel = %channel, error = %err, "group operation failed on channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use shoelink_transport::{MemoryTransport, ScriptedFailure};

    use crate::events::{Event, EventKind, EventPayload};

    fn dual() -> (Coordinator, MemoryTransport, MemoryTransport) {
        let left = MemoryTransport::new("Neely-L");
        let right = MemoryTransport::new("Neely-R");
        let coordinator = Coordinator::dual(
            Arc::new(left.clone()),
            Arc::new(right.clone()),
            ChannelConfig::default(),
        );
        (coordinator, left, right)
    }

    #[tokio::test]
    async fn dual_channels_are_independent() {
        let (coordinator, left, right) = dual();
        right.device().fail_next_open(ScriptedFailure::NotAvailable);

        coordinator.connect("left").await.unwrap();
        let err = coordinator.connect("right").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotAvailable);
        assert!(coordinator.is_connected("left"));
        assert!(!coordinator.is_connected("right"));
        assert!(coordinator.is_any_connected());

        coordinator.send("left", "mode:midi").await.unwrap();
        assert_eq!(left.device().written_text(), vec!["mode:midi"]);
        assert!(right.device().written().is_empty());
    }

    #[tokio::test]
    async fn connect_all_requires_every_channel() {
        let (coordinator, _left, right) = dual();
        right.device().fail_next_open(ScriptedFailure::Link);

        let err = coordinator.connect_all().await.unwrap_err();

        assert_eq!(err.operation, "connect_all");
        assert_eq!(err.kind(), ErrorKind::LinkError);
        assert!(err.report.get("left").unwrap().is_ok());
        assert!(err.report.get("right").unwrap().is_err());
        assert!(coordinator.is_connected("left"));
    }

    #[tokio::test]
    async fn set_mode_all_needs_one_success() {
        let (coordinator, left, right) = dual();
        coordinator.connect("left").await.unwrap();

        let report = coordinator.set_mode_all(Mode::Hid).await.unwrap();

        assert_eq!(report.succeeded(), vec![&ChannelName::left()]);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(left.device().written_text(), vec!["mode:hid"]);
        assert!(right.device().written().is_empty());
    }

    #[tokio::test]
    async fn set_mode_all_reports_each_disconnected_channel() {
        let (coordinator, _left, _right) = dual();
        let failed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failed);
        coordinator.events().subscribe(EventKind::Error, move |event: &Event| {
            sink.lock().unwrap().push(event.channel.clone());
            Ok(())
        });
        coordinator.connect("left").await.unwrap();

        coordinator.set_mode_all(Mode::Midi).await.unwrap();

        assert_eq!(*failed.lock().unwrap(), vec![ChannelName::right()]);
    }

    #[tokio::test]
    async fn set_mode_all_fails_when_nothing_connected() {
        let (coordinator, _left, _right) = dual();
        let err = coordinator.set_mode_all(Mode::Midi).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(err.report.len(), 2);
    }

    #[tokio::test]
    async fn empty_coordinator_policies() {
        let coordinator = Coordinator::new(ChannelConfig::default());

        assert!(coordinator.connect_all().await.unwrap().is_empty());
        assert!(coordinator.disconnect_all().await.is_ok());
        assert!(coordinator.set_mode_all(Mode::Hid).await.is_err());
    }

    #[tokio::test]
    async fn unknown_channel_is_rejected() {
        let (coordinator, _left, _right) = dual();
        let err = coordinator.send("middle", "x").await.unwrap_err();
        assert!(matches!(err, PeerError::UnknownChannel(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn connect_creates_channel_from_default_transport() {
        let transport = MemoryTransport::new("Neely-L");
        let coordinator = Coordinator::new(ChannelConfig::default())
            .with_default_transport(Arc::new(transport.clone()));

        coordinator.connect("left").await.unwrap();

        assert_eq!(coordinator.channel_names(), vec![ChannelName::left()]);
        assert_eq!(transport.device().open_count(), 1);
    }

    #[tokio::test]
    async fn events_carry_channel_names() {
        let (coordinator, left, right) = dual();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let seen = Arc::clone(&seen);
            coordinator.events().subscribe(kind, move |event: &Event| {
                seen.lock()
                    .unwrap()
                    .push((event.channel.to_string(), event.kind()));
                Ok(())
            });
        }

        coordinator.connect_all().await.unwrap();
        let mut messages = coordinator.messages();
        left.device().push(b"toe\n");
        assert_eq!(messages.recv().await.unwrap().channel(), &ChannelName::left());
        right.device().push(b"heel\n");
        assert_eq!(messages.recv().await.unwrap().channel(), &ChannelName::right());
        coordinator.disconnect_all().await.unwrap();

        let seen = seen.lock().unwrap();
        let count = |channel: &str, kind: EventKind| {
            seen.iter()
                .filter(|(c, k)| c == channel && *k == kind)
                .count()
        };
        for channel in ["left", "right"] {
            assert_eq!(count(channel, EventKind::Connected), 1);
            assert_eq!(count(channel, EventKind::Data), 1);
            assert_eq!(count(channel, EventKind::Disconnected), 1);
            assert_eq!(count(channel, EventKind::Error), 0);
        }
    }

    #[tokio::test]
    async fn error_events_name_the_failing_channel() {
        let (coordinator, _left, right) = dual();
        right.device().fail_next_open(ScriptedFailure::UserCancelled);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        coordinator
            .events()
            .subscribe(EventKind::Error, move |event: &Event| {
                if let EventPayload::Error { kind, .. } = &event.payload {
                    sink.lock().unwrap().push((event.channel.clone(), *kind));
                }
                Ok(())
            });

        let _ = coordinator.connect_all().await;

        assert_eq!(
            *errors.lock().unwrap(),
            vec![(ChannelName::right(), ErrorKind::UserCancelled)]
        );
    }

    #[tokio::test]
    async fn send_all_reaches_connected_channels() {
        let (coordinator, left, right) = dual();
        coordinator.connect_all().await.unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        coordinator
            .events()
            .subscribe(EventKind::Error, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let report = coordinator.send_all("calibrate").await.unwrap();

        assert!(report.all_succeeded());
        assert_eq!(left.device().written_text(), vec!["calibrate"]);
        assert_eq!(right.device().written_text(), vec!["calibrate"]);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn keymap_broadcast() {
        let (coordinator, left, right) = dual();
        coordinator.connect_all().await.unwrap();

        coordinator
            .send_command_all(&Command::set_keymap(1, 4))
            .await
            .unwrap();

        assert_eq!(left.device().written_text(), vec!["setKeymap:1:4"]);
        assert_eq!(right.device().written_text(), vec!["setKeymap:1:4"]);
    }

    #[tokio::test]
    async fn status_is_keyed_by_channel() {
        let (coordinator, _left, _right) = dual();
        coordinator.connect("right").await.unwrap();

        let status = coordinator.status();
        let names: Vec<&str> = status.keys().map(ChannelName::as_str).collect();
        assert_eq!(names, vec!["left", "right"]);
        assert!(!status["left"].is_connected());
        assert!(status["right"].is_connected());
    }

    #[tokio::test]
    async fn report_summary_serializes() {
        let (coordinator, _left, _right) = dual();
        let err = coordinator.set_mode_all(Mode::Hid).await.unwrap_err();
        let json = serde_json::to_value(err.report.summary()).unwrap();
        assert_eq!(json[0]["channel"], "left");
        assert_eq!(json[0]["ok"], false);
        assert_eq!(json[0]["kind"], "not_connected");
    }
}
