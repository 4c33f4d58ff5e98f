//! Control-system bridge
//!
//! Keeps a session with the robot's control system alive and mirrors what
//! it hears into [`SharedSignals`]: a free-text annotation for the status
//! page, and frames from whichever image topic the control system names.
//! In the other direction it publishes the filtered battery percentage.
//!
//! The bridge is optional. When no backend is available it keeps retrying
//! in the background and the display runs as if it were absent.

use std::io;
use std::net::IpAddr;
use std::thread::{self, JoinHandle};

use image::RgbImage;
use riberry_core::config::BridgeConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::network::NetworkProbe;
use crate::shutdown::ShutdownToken;
use crate::signals::SharedSignals;
use crate::tasks::telemetry::TelemetryReader;

/// Callback for text messages
pub type TextHandler = Box<dyn FnMut(String) + Send>;

/// Callback for decoded image messages
pub type ImageHandler = Box<dyn FnMut(RgbImage) + Send>;

/// Handle to an active subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(pub u64);

/// Control-system session failure
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No backend, or the control system refused the connection
    #[error("control system unavailable: {0}")]
    Unavailable(String),
    /// The host never got a routable address
    #[error("no route to {host} after {attempts} attempts")]
    NoRoute { host: String, attempts: u16 },
    /// The connection dropped mid-session
    #[error("connection to the control system lost")]
    Disconnected,
}

/// Pub/sub and parameter access on the control system
pub trait ControlClient {
    /// Register this host under `host` and open a session
    fn connect(&mut self, host: IpAddr) -> Result<(), BridgeError>;

    /// Deliver every text message on `topic` to `handler`
    fn subscribe_text(&mut self, topic: &str, handler: TextHandler)
        -> Result<Subscription, BridgeError>;

    /// Deliver every image on `topic` to `handler`
    fn subscribe_images(
        &mut self,
        topic: &str,
        handler: ImageHandler,
    ) -> Result<Subscription, BridgeError>;

    /// Stop a subscription; unknown handles are ignored
    fn unsubscribe(&mut self, subscription: Subscription);

    /// Read a string parameter; `None` when unset
    fn get_param(&mut self, name: &str) -> Result<Option<String>, BridgeError>;

    /// Publish a battery percentage on `topic`
    fn publish_battery(&mut self, topic: &str, percentage: f32) -> Result<(), BridgeError>;

    /// Whether the control system asked this node to exit
    fn is_shutdown(&self) -> bool;
}

/// Client used when no control-system backend is compiled in
///
/// Every connection attempt fails, so the bridge idles in its retry loop.
#[derive(Debug, Default)]
pub struct DisconnectedClient;

impl ControlClient for DisconnectedClient {
    fn connect(&mut self, _host: IpAddr) -> Result<(), BridgeError> {
        Err(BridgeError::Unavailable("no control-system backend".into()))
    }

    fn subscribe_text(
        &mut self,
        _topic: &str,
        _handler: TextHandler,
    ) -> Result<Subscription, BridgeError> {
        Err(BridgeError::Disconnected)
    }

    fn subscribe_images(
        &mut self,
        _topic: &str,
        _handler: ImageHandler,
    ) -> Result<Subscription, BridgeError> {
        Err(BridgeError::Disconnected)
    }

    fn unsubscribe(&mut self, _subscription: Subscription) {}

    fn get_param(&mut self, _name: &str) -> Result<Option<String>, BridgeError> {
        Err(BridgeError::Disconnected)
    }

    fn publish_battery(&mut self, _topic: &str, _percentage: f32) -> Result<(), BridgeError> {
        Err(BridgeError::Disconnected)
    }

    fn is_shutdown(&self) -> bool {
        false
    }
}

/// What the bridge reads and writes besides the client
pub struct BridgeContext<N> {
    pub network: N,
    pub signals: SharedSignals,
    pub telemetry: Option<TelemetryReader>,
    pub config: BridgeConfig,
}

/// How a session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Local shutdown was requested
    Cancelled,
    /// The control system told this node to exit
    RemoteShutdown,
}

/// Run the bridge on its own thread
///
/// The thread is not joined at exit; it may be blocked inside the client.
pub fn spawn<C, N>(
    mut client: C,
    context: BridgeContext<N>,
    shutdown: ShutdownToken,
) -> io::Result<JoinHandle<()>>
where
    C: ControlClient + Send + 'static,
    N: NetworkProbe + Send + 'static,
{
    thread::Builder::new()
        .name("bridge".into())
        .spawn(move || run(&mut client, &context, &shutdown))
}

/// Reconnect loop; returns on shutdown from either side
pub fn run<C: ControlClient, N: NetworkProbe>(
    client: &mut C,
    context: &BridgeContext<N>,
    shutdown: &ShutdownToken,
) {
    info!("bridge started");
    let mut failures = 0u32;
    while !shutdown.is_cancelled() {
        let result = run_session(client, context, shutdown);
        context.signals.disconnect();
        context.signals.end_frame_source();

        match result {
            Ok(SessionEnd::Cancelled) => break,
            Ok(SessionEnd::RemoteShutdown) => {
                info!("control system requested shutdown, bridge stopped");
                return;
            }
            Err(err) => {
                failures += 1;
                // Only the first of a run of failures is worth a warning
                if failures == 1 {
                    warn!(error = %err, "bridge session failed, retrying");
                } else {
                    debug!(error = %err, failures, "bridge session failed, retrying");
                }
            }
        }
        if shutdown.sleep_ms(context.config.reconnect_backoff_ms) {
            break;
        }
    }
    info!("bridge stopped");
}

fn run_session<C: ControlClient, N: NetworkProbe>(
    client: &mut C,
    context: &BridgeContext<N>,
    shutdown: &ShutdownToken,
) -> Result<SessionEnd, BridgeError> {
    let Some(host) = wait_for_route(context, shutdown)? else {
        return Ok(SessionEnd::Cancelled);
    };

    client.connect(host)?;
    info!(%host, "connected to control system");

    let mut live = Vec::new();
    let result = serve(client, context, shutdown, &mut live);
    // Handlers must not outlive the session, however it ended
    for subscription in live {
        client.unsubscribe(subscription);
    }
    result
}

/// Subscribe and poll until the session ends
///
/// Every subscription still open is left in `live` for the caller.
fn serve<C: ControlClient, N: NetworkProbe>(
    client: &mut C,
    context: &BridgeContext<N>,
    shutdown: &ShutdownToken,
    live: &mut Vec<Subscription>,
) -> Result<SessionEnd, BridgeError> {
    let config = &context.config;
    let signals = context.signals.clone();
    live.push(client.subscribe_text(
        &config.annotation_topic,
        Box::new(move |text| signals.set_annotation(text)),
    )?);
    context.signals.set_reachable(true);

    let mut image_topic: Option<String> = None;
    let mut image_subscription: Option<Subscription> = None;
    loop {
        if client.is_shutdown() {
            return Ok(SessionEnd::RemoteShutdown);
        }
        if shutdown.is_cancelled() {
            return Ok(SessionEnd::Cancelled);
        }

        if let Some(percentage) = context
            .telemetry
            .as_ref()
            .and_then(TelemetryReader::sampled_percentage)
        {
            client.publish_battery(&config.battery_topic, percentage)?;
        }

        let topic = client.get_param(&config.image_topic_param)?;
        if topic != image_topic {
            context.signals.end_frame_source();
            if let Some(subscription) = image_subscription.take() {
                live.retain(|open| *open != subscription);
                client.unsubscribe(subscription);
            }
            if let Some(name) = topic.as_deref().filter(|name| !name.is_empty()) {
                info!(topic = name, "mirroring image topic");
                let signals = context.signals.clone();
                let subscription =
                    client.subscribe_images(name, Box::new(move |frame| signals.push_frame(frame)))?;
                live.push(subscription);
                image_subscription = Some(subscription);
                context.signals.begin_frame_source();
            }
            image_topic = topic;
        }

        if shutdown.sleep_ms(config.poll_interval_ms) {
            return Ok(SessionEnd::Cancelled);
        }
    }
}

/// Look up the routable host address, retrying while the network comes up
///
/// `Ok(None)` means shutdown interrupted the wait.
fn wait_for_route<N: NetworkProbe>(
    context: &BridgeContext<N>,
    shutdown: &ShutdownToken,
) -> Result<Option<IpAddr>, BridgeError> {
    let config = &context.config;
    for _ in 0..config.route_attempts {
        if let Some(address) = context.network.route_address(&config.route_probe_host) {
            debug!(%address, "routable host address");
            return Ok(Some(address));
        }
        if shutdown.sleep_ms(config.route_retry_ms) {
            return Ok(None);
        }
    }
    Err(BridgeError::NoRoute {
        host: config.route_probe_host.to_string(),
        attempts: config.route_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::telemetry::TelemetryHandle;
    use riberry_core::config::BatteryConfig;
    use riberry_core::traits::{BatterySensor, SensorError};
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    /// What the fake control system does on each parameter poll
    #[derive(Debug, Clone)]
    enum Tick {
        Param(Option<&'static str>),
        Annotate(&'static str),
        Frame,
        Drop,
        Shutdown,
    }

    #[derive(Default)]
    struct FakeClient {
        ticks: VecDeque<Tick>,
        connects: Vec<IpAddr>,
        refuse_connects: usize,
        text: Option<(u64, TextHandler)>,
        images: Vec<(u64, String, ImageHandler)>,
        unsubscribed: Vec<u64>,
        published: Vec<(String, f32)>,
        next_id: u64,
        shutdown: bool,
        param: Option<&'static str>,
        /// Reachable and frame-ready, seen at the start of each poll
        observed: Vec<(bool, bool)>,
        /// Annotation pending at the end of each poll
        annotations: Vec<Option<String>>,
        signals: Option<SharedSignals>,
    }

    impl ControlClient for FakeClient {
        fn connect(&mut self, host: IpAddr) -> Result<(), BridgeError> {
            self.connects.push(host);
            if self.refuse_connects > 0 {
                self.refuse_connects -= 1;
                return Err(BridgeError::Unavailable("refused".into()));
            }
            Ok(())
        }

        fn subscribe_text(
            &mut self,
            _topic: &str,
            handler: TextHandler,
        ) -> Result<Subscription, BridgeError> {
            self.next_id += 1;
            self.text = Some((self.next_id, handler));
            Ok(Subscription(self.next_id))
        }

        fn subscribe_images(
            &mut self,
            topic: &str,
            handler: ImageHandler,
        ) -> Result<Subscription, BridgeError> {
            self.next_id += 1;
            self.images.push((self.next_id, topic.to_string(), handler));
            Ok(Subscription(self.next_id))
        }

        fn unsubscribe(&mut self, subscription: Subscription) {
            self.unsubscribed.push(subscription.0);
            self.images.retain(|(id, _, _)| *id != subscription.0);
            if self.text.as_ref().is_some_and(|(id, _)| *id == subscription.0) {
                self.text = None;
            }
        }

        fn get_param(&mut self, _name: &str) -> Result<Option<String>, BridgeError> {
            if let Some(signals) = &self.signals {
                self.observed
                    .push((signals.is_reachable(), signals.frame().is_some()));
            }
            loop {
                match self.ticks.pop_front() {
                    Some(Tick::Param(value)) => {
                        self.param = value;
                        break;
                    }
                    Some(Tick::Annotate(text)) => {
                        if let Some((_, handler)) = self.text.as_mut() {
                            handler(text.to_string());
                        }
                    }
                    Some(Tick::Frame) => {
                        for (_, _, handler) in self.images.iter_mut() {
                            handler(RgbImage::new(2, 2));
                        }
                    }
                    Some(Tick::Drop) => return Err(BridgeError::Disconnected),
                    Some(Tick::Shutdown) | None => {
                        self.shutdown = true;
                        break;
                    }
                }
            }
            if let Some(signals) = &self.signals {
                self.annotations.push(signals.take_annotation());
            }
            Ok(self.param.map(str::to_string))
        }

        fn publish_battery(&mut self, topic: &str, percentage: f32) -> Result<(), BridgeError> {
            self.published.push((topic.to_string(), percentage));
            Ok(())
        }

        fn is_shutdown(&self) -> bool {
            self.shutdown
        }
    }

    struct RoutedNetwork {
        lookups: Arc<AtomicUsize>,
        route_after: usize,
    }

    impl NetworkProbe for RoutedNetwork {
        fn address(&self) -> Option<IpAddr> {
            Some(HOST)
        }

        fn hostname(&self) -> String {
            "riberry".into()
        }

        fn hardware_address(&self) -> String {
            "000000000000".into()
        }

        fn endpoint(&self) -> Option<String> {
            None
        }

        fn route_address(&self, _host: &str) -> Option<IpAddr> {
            let n = self.lookups.fetch_add(1, Ordering::SeqCst);
            (n >= self.route_after).then_some(HOST)
        }
    }

    fn context(route_after: usize) -> BridgeContext<RoutedNetwork> {
        BridgeContext {
            network: RoutedNetwork {
                lookups: Arc::new(AtomicUsize::new(0)),
                route_after,
            },
            signals: SharedSignals::new(),
            telemetry: None,
            config: BridgeConfig {
                reconnect_backoff_ms: 1,
                poll_interval_ms: 1,
                route_retry_ms: 1,
                route_attempts: 5,
                ..BridgeConfig::default()
            },
        }
    }

    fn client(context: &BridgeContext<RoutedNetwork>, ticks: &[Tick]) -> FakeClient {
        FakeClient {
            ticks: ticks.iter().cloned().collect(),
            signals: Some(context.signals.clone()),
            ..FakeClient::default()
        }
    }

    #[test]
    fn test_session_marks_reachable_and_ends_on_remote_shutdown() {
        let context = context(2);
        let mut client = client(&context, &[Tick::Param(None), Tick::Shutdown]);

        run(&mut client, &context, &ShutdownToken::new());

        assert_eq!(client.connects, vec![HOST]);
        assert_eq!(context.network.lookups.load(Ordering::SeqCst), 3);
        assert_eq!(client.observed[0], (true, false));
        assert!(!context.signals.is_reachable());
    }

    #[test]
    fn test_annotation_shown_while_connected_and_cleared_after() {
        let context = context(0);
        let mut client = client(
            &context,
            &[Tick::Param(None), Tick::Annotate("docked"), Tick::Param(None)],
        );

        run(&mut client, &context, &ShutdownToken::new());

        assert_eq!(client.annotations, vec![None, Some("docked".to_string()), None]);
        context.signals.set_reachable(true);
        assert_eq!(context.signals.take_annotation(), None);
    }

    #[test]
    fn test_topic_change_swaps_subscription_and_clears_frame() {
        let context = context(0);
        let mut client = client(
            &context,
            &[
                Tick::Param(Some("/camera/a")),
                Tick::Frame,
                Tick::Param(Some("/camera/a")),
                Tick::Param(Some("/camera/b")),
                Tick::Param(Some("/camera/b")),
                Tick::Param(Some("")),
                Tick::Param(None),
            ],
        );

        run(&mut client, &context, &ShutdownToken::new());

        // Poll 1 subscribes a; the frame arrives during poll 2; poll 3
        // switches to b and drops a's frame
        assert_eq!(
            client.observed[..4],
            [(true, false), (true, false), (true, true), (true, false)]
        );
        // The text subscription goes last, when the session ends
        assert_eq!(client.unsubscribed, vec![2, 3, 1]);
        assert!(client.images.is_empty());
        assert!(client.text.is_none());
        assert!(context.signals.frame().is_none());
    }

    #[test]
    fn test_dropped_session_retries_with_backoff() {
        let context = context(0);
        let mut client = client(&context, &[Tick::Param(None), Tick::Drop, Tick::Param(None)]);
        client.refuse_connects = 1;

        run(&mut client, &context, &ShutdownToken::new());

        // Refused, dropped, then ended by the exhausted script
        assert_eq!(client.connects.len(), 3);
        assert!(!context.signals.is_reachable());
    }

    #[test]
    fn test_dropped_session_releases_subscriptions() {
        let context = context(0);
        let mut client = client(
            &context,
            &[Tick::Param(Some("/camera/a")), Tick::Drop, Tick::Param(None)],
        );

        run(&mut client, &context, &ShutdownToken::new());

        // Session 1 opened text 1 and image 2 before the drop; session 2
        // opened text 3 and ended on the exhausted script
        assert_eq!(client.connects.len(), 2);
        assert_eq!(client.unsubscribed, vec![1, 2, 3]);
        assert!(client.images.is_empty());
        assert!(client.text.is_none());
        assert!(context.signals.frame().is_none());
    }

    fn with_battery<S>(sensor: S) -> (BridgeContext<RoutedNetwork>, TelemetryHandle)
    where
        S: BatterySensor + Send + 'static,
    {
        let mut context = context(0);
        let config = BatteryConfig {
            sample_period_ms: 1,
            ..BatteryConfig::default()
        };
        let handle = TelemetryHandle::spawn(sensor, &config).unwrap();
        context.telemetry = Some(handle.reader());
        (context, handle)
    }

    #[test]
    fn test_battery_not_published_before_first_sample() {
        let (context, handle) = with_battery(Empty);
        let mut client = client(&context, &[Tick::Param(None), Tick::Param(None)]);

        run(&mut client, &context, &ShutdownToken::new());
        handle.stop();
        handle.join();

        assert!(client.published.is_empty());
    }

    #[test]
    fn test_battery_published_each_poll_once_sampled() {
        let (context, handle) = with_battery(Steady(64));
        let reader = handle.reader();
        while reader.sampled_percentage().is_none() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let mut client = client(&context, &[Tick::Param(None), Tick::Param(None)]);

        run(&mut client, &context, &ShutdownToken::new());
        handle.stop();
        handle.join();

        assert_eq!(client.published.len(), 3);
        assert!(client
            .published
            .iter()
            .all(|(topic, percentage)| topic == "/pisugar_battery"
                && *percentage > 0.0
                && *percentage <= 64.0));
    }

    /// Sensor that always reads the same level
    struct Steady(u8);

    impl BatterySensor for Steady {
        fn read_percentage(&mut self) -> Result<u8, SensorError> {
            Ok(self.0)
        }

        fn read_charging(&mut self) -> Result<bool, SensorError> {
            Ok(false)
        }
    }

    /// Sensor that never answers
    struct Empty;

    impl BatterySensor for Empty {
        fn read_percentage(&mut self) -> Result<u8, SensorError> {
            Err(SensorError::Bus)
        }

        fn read_charging(&mut self) -> Result<bool, SensorError> {
            Err(SensorError::Bus)
        }
    }

    #[test]
    fn test_no_route_gives_up_and_retries() {
        let context = context(usize::MAX);
        let mut client = client(&context, &[]);
        let shutdown = ShutdownToken::new();

        std::thread::scope(|scope| {
            scope.spawn(|| run(&mut client, &context, &shutdown));
            while context.network.lookups.load(Ordering::SeqCst) < 12 {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            shutdown.cancel();
        });

        assert!(client.connects.is_empty());
    }

    #[test]
    fn test_disconnected_client_never_connects() {
        let mut client = DisconnectedClient;
        assert!(matches!(
            client.connect(HOST),
            Err(BridgeError::Unavailable(_))
        ));
        assert!(!client.is_shutdown());
    }
}
