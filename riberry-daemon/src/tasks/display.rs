//! Display scheduler loop
//!
//! Each iteration looks at the external signals and the host network once,
//! picks a [`Phase`], and runs that phase's plan step by step. Nothing in
//! here aborts the loop: pages that fail are logged and the next iteration
//! tries again. A streamed frame that fails is dropped and the loop backs
//! off for one page pause, since the streaming plan has no pause of its
//! own. Only shutdown ends the loop, checked at the top of every iteration
//! and during every pause.

use std::io;
use std::net::IpAddr;
use std::ops::ControlFlow;
use std::thread::{self, JoinHandle};

use embedded_hal::delay::DelayNs;
use riberry_core::config::DaemonConfig;
use riberry_core::scheduler::{plan, Phase, Step};
use riberry_display::{
    DisplaySession, FrameSink, ImageEncoder, ProvisioningTarget, SessionError, StatusReport,
};
use riberry_protocol::MAX_PAYLOAD_SIZE;
use tracing::{debug, info, trace, warn};

use crate::network::NetworkProbe;
use crate::shutdown::ShutdownToken;
use crate::signals::SharedSignals;
use crate::tasks::telemetry::TelemetryReader;

/// Everything the loop reads besides the display itself
pub struct DisplayContext<N> {
    pub network: N,
    pub signals: SharedSignals,
    /// `None` on boards without a battery
    pub telemetry: Option<TelemetryReader>,
    /// Board-specific hotspot name prefix
    pub ssid_prefix: &'static str,
    pub config: DaemonConfig,
}

impl<N: NetworkProbe> DisplayContext<N> {
    fn status_text(&self, address: Option<IpAddr>) -> String {
        let hostname = self.network.hostname();
        let endpoint = self.network.endpoint();
        let annotation = self.signals.take_annotation();
        let mut report = StatusReport {
            hostname: &hostname,
            address,
            endpoint_label: &self.config.display.endpoint_label,
            endpoint: endpoint.as_deref(),
            battery: self.telemetry.as_ref().map(TelemetryReader::snapshot),
            low_percentage: self.config.battery.low_percentage,
            annotation: annotation.as_deref(),
        };
        let text = report.compose();
        match report.annotation {
            Some(extra) if text.len() > MAX_PAYLOAD_SIZE => {
                warn!(len = extra.len(), "annotation does not fit on the status page, dropped");
                report.annotation = None;
                report.compose()
            }
            _ => text,
        }
    }
}

/// Run the loop on its own thread until `shutdown` is cancelled
pub fn spawn<T, D, E, N>(
    session: DisplaySession<T, D, E>,
    context: DisplayContext<N>,
    shutdown: ShutdownToken,
) -> io::Result<JoinHandle<()>>
where
    T: FrameSink + Send + 'static,
    D: DelayNs + Send + 'static,
    E: ImageEncoder + Send + 'static,
    N: NetworkProbe + Send + 'static,
{
    thread::Builder::new()
        .name("display".into())
        .spawn(move || run(session, &context, &shutdown))
}

/// Drive the display until `shutdown` is cancelled
pub fn run<T, D, E, N>(
    mut session: DisplaySession<T, D, E>,
    context: &DisplayContext<N>,
    shutdown: &ShutdownToken,
) where
    T: FrameSink,
    D: DelayNs,
    E: ImageEncoder,
    N: NetworkProbe,
{
    info!(address = session.address(), "display loop started");
    while !shutdown.is_cancelled() {
        if run_iteration(&mut session, context, shutdown).is_break() {
            break;
        }
    }
    info!("display loop stopped");
}

/// One pass: select a phase and run its plan
///
/// Breaks when a pause was interrupted by shutdown.
pub fn run_iteration<T, D, E, N>(
    session: &mut DisplaySession<T, D, E>,
    context: &DisplayContext<N>,
    shutdown: &ShutdownToken,
) -> ControlFlow<()>
where
    T: FrameSink,
    D: DelayNs,
    E: ImageEncoder,
    N: NetworkProbe,
{
    let frame = context.signals.frame();
    let address = context.network.address();
    let phase = Phase::select(frame.is_some(), address.is_some());
    trace!(?phase, ?address, "scheduler iteration");

    for step in plan(phase, &context.config.scheduler) {
        let result = match step {
            Step::ShowImage => match &frame {
                Some(frame) => session.show_image(frame).map(|_| ()),
                None => Ok(()),
            },
            Step::ShowWifiCode => {
                let mac = context.network.hardware_address();
                session
                    .show_provisioning(ProvisioningTarget::WifiJoin {
                        ssid_prefix: context.ssid_prefix,
                        mac: &mac,
                    })
                    .map(|_| ())
            }
            Step::ShowStatus => {
                let text = context.status_text(address);
                session.show_status(&text).map(|_| ())
            }
            Step::ShowOnboardingUrl => match context.network.address() {
                Some(address) => session
                    .show_provisioning(ProvisioningTarget::Onboarding {
                        address,
                        port: context.config.display.onboarding_port,
                        path: &context.config.display.onboarding_path,
                    })
                    .map(|_| ()),
                None => {
                    info!("network address lost, onboarding code skipped");
                    Ok(())
                }
            },
            Step::Wait { ms } => {
                if shutdown.sleep_ms(ms) {
                    debug!("pause interrupted by shutdown");
                    return ControlFlow::Break(());
                }
                Ok(())
            }
        };
        if let Err(err) = result {
            report(step, &err);
            if let (Step::ShowImage, Some(frame)) = (step, &frame) {
                // The same frame would fail again; wait for the next one
                context.signals.discard_frame(frame);
                if shutdown.sleep_ms(context.config.scheduler.phase_pause_ms) {
                    return ControlFlow::Break(());
                }
            }
        }
    }
    ControlFlow::Continue(())
}

fn report(step: Step, err: &SessionError) {
    warn!(?step, error = %err, "page not shown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::telemetry::TelemetryHandle;
    use image::RgbImage;
    use riberry_core::config::BatteryConfig;
    use riberry_display::{EncodeError, SendOutcome};
    use riberry_protocol::{Frame, MessageKind};
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Sink that keeps every frame's payload
    #[derive(Clone, Default)]
    struct RecordingSink {
        payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.payloads.lock().unwrap())
        }
    }

    impl FrameSink for RecordingSink {
        fn send(&mut self, _address: u8, frame: &[u8]) -> SendOutcome {
            let payload = Frame::decode(frame).unwrap().payload.to_vec();
            self.payloads.lock().unwrap().push(payload);
            SendOutcome::Sent
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    struct FixedEncoder;

    impl ImageEncoder for FixedEncoder {
        fn encode(&self, _image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
            Ok(vec![0xAB; 120])
        }
    }

    /// Encoder that rejects every frame and counts attempts
    #[derive(Clone, Default)]
    struct RejectingEncoder {
        attempts: Arc<Mutex<usize>>,
    }

    impl ImageEncoder for RejectingEncoder {
        fn encode(&self, _image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
            *self.attempts.lock().unwrap() += 1;
            Err(EncodeError::Empty)
        }
    }

    /// Network whose address follows a script; the last entry sticks
    struct ScriptedNetwork {
        addresses: Mutex<VecDeque<Option<IpAddr>>>,
    }

    impl ScriptedNetwork {
        fn new(addresses: &[Option<IpAddr>]) -> Self {
            Self {
                addresses: Mutex::new(addresses.iter().copied().collect()),
            }
        }
    }

    impl NetworkProbe for ScriptedNetwork {
        fn address(&self) -> Option<IpAddr> {
            let mut addresses = self.addresses.lock().unwrap();
            if addresses.len() > 1 {
                addresses.pop_front().flatten()
            } else {
                addresses.front().copied().flatten()
            }
        }

        fn hostname(&self) -> String {
            "riberry".into()
        }

        fn hardware_address(&self) -> String {
            "dca632012345".into()
        }

        fn endpoint(&self) -> Option<String> {
            Some("10.0.0.1".into())
        }

        fn route_address(&self, _host: &str) -> Option<IpAddr> {
            None
        }
    }

    type TestSession = DisplaySession<RecordingSink, NoDelay, FixedEncoder>;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    fn fixture(addresses: &[Option<IpAddr>]) -> (TestSession, RecordingSink, DisplayContext<ScriptedNetwork>) {
        let sink = RecordingSink::default();
        let session = DisplaySession::new(sink.clone(), NoDelay, FixedEncoder, 0x42);
        let mut config = DaemonConfig::default();
        config.scheduler.phase_pause_ms = 0;
        let context = DisplayContext {
            network: ScriptedNetwork::new(addresses),
            signals: SharedSignals::new(),
            telemetry: None,
            ssid_prefix: "raspi",
            config,
        };
        (session, sink, context)
    }

    fn text(payload: &[u8]) -> &str {
        std::str::from_utf8(payload).unwrap()
    }

    #[test]
    fn test_offline_shows_only_wifi_code() {
        let (mut session, sink, context) = fixture(&[None]);
        let shutdown = ShutdownToken::new();

        for _ in 0..3 {
            assert!(run_iteration(&mut session, &context, &shutdown).is_continue());
        }

        let payloads = sink.take();
        assert_eq!(payloads.len(), 3);
        for payload in &payloads {
            assert_eq!(MessageKind::classify(payload), MessageKind::Provisioning);
            assert_eq!(text(&payload[2..]), "WIFI:S:raspi-dca632012345;T:nopass;;");
        }
    }

    #[test]
    fn test_online_alternates_status_and_url() {
        let (mut session, sink, context) = fixture(&[Some(HOST)]);
        let shutdown = ShutdownToken::new();

        run_iteration(&mut session, &context, &shutdown);
        run_iteration(&mut session, &context, &shutdown);

        let payloads = sink.take();
        assert_eq!(payloads.len(), 4);
        for pair in payloads.chunks(2) {
            assert_eq!(MessageKind::classify(&pair[0]), MessageKind::Status);
            assert!(text(&pair[0]).starts_with("riberry:\n\x1b[33m10.0.0.7\x1b[39m\n"));
            assert!(text(&pair[0]).contains("ROS_MASTER:\n\x1b[31m10.0.0.1\x1b[39m\n"));
            assert_eq!(MessageKind::classify(&pair[1]), MessageKind::Provisioning);
            assert_eq!(text(&pair[1][2..]), "http://10.0.0.7:8085/riberry_startup/");
        }
    }

    #[test]
    fn test_lost_address_skips_url() {
        let (mut session, sink, context) = fixture(&[Some(HOST), None]);
        run_iteration(&mut session, &context, &ShutdownToken::new());

        let payloads = sink.take();
        assert_eq!(payloads.len(), 1);
        assert_eq!(MessageKind::classify(&payloads[0]), MessageKind::Status);
    }

    #[test]
    fn test_active_frame_source_streams_next_iteration() {
        let (mut session, sink, context) = fixture(&[None]);
        let shutdown = ShutdownToken::new();

        run_iteration(&mut session, &context, &shutdown);
        assert_eq!(MessageKind::classify(&sink.take()[0]), MessageKind::Provisioning);

        context.signals.begin_frame_source();
        context.signals.push_frame(RgbImage::new(4, 4));
        run_iteration(&mut session, &context, &shutdown);

        let payloads = sink.take();
        assert_eq!(payloads[0], vec![0xFF, 0xD8, 0xEA, 0x00, 120]);
        assert_eq!(payloads.len(), 1 + 3);
        assert!(payloads
            .iter()
            .all(|p| MessageKind::classify(p) == MessageKind::Image));
    }

    #[test]
    fn test_annotation_shown_once() {
        let (mut session, sink, context) = fixture(&[Some(HOST)]);
        let shutdown = ShutdownToken::new();
        context.signals.set_reachable(true);
        context.signals.set_annotation("docked".into());

        run_iteration(&mut session, &context, &shutdown);
        run_iteration(&mut session, &context, &shutdown);

        let payloads = sink.take();
        assert!(text(&payloads[0]).ends_with("\ndocked\n"));
        assert!(!text(&payloads[2]).contains("docked"));
    }

    #[test]
    fn test_oversized_annotation_dropped_page_still_shown() {
        let (mut session, sink, context) = fixture(&[Some(HOST)]);
        let shutdown = ShutdownToken::new();
        context.signals.set_reachable(true);
        context.signals.set_annotation("x".repeat(300));

        run_iteration(&mut session, &context, &shutdown);
        run_iteration(&mut session, &context, &shutdown);

        let payloads = sink.take();
        assert_eq!(payloads.len(), 4);
        for pair in payloads.chunks(2) {
            assert_eq!(MessageKind::classify(&pair[0]), MessageKind::Status);
            assert!(text(&pair[0]).starts_with("riberry:\n"));
            assert!(!text(&pair[0]).contains("xxx"));
        }
    }

    #[test]
    fn test_failed_frame_dropped_and_loop_backs_off() {
        let (_, sink, mut context) = fixture(&[None]);
        context.config.scheduler.phase_pause_ms = 20;
        let encoder = RejectingEncoder::default();
        let mut session = DisplaySession::new(sink.clone(), NoDelay, encoder.clone(), 0x42);
        let shutdown = ShutdownToken::new();
        context.signals.begin_frame_source();
        context.signals.push_frame(RgbImage::new(0, 0));

        let started = Instant::now();
        assert!(run_iteration(&mut session, &context, &shutdown).is_continue());
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(*encoder.attempts.lock().unwrap(), 1);
        assert!(sink.take().is_empty());
        assert!(context.signals.frame().is_none());

        // Source still active but without a frame: regular pages resume
        run_iteration(&mut session, &context, &shutdown);
        assert_eq!(*encoder.attempts.lock().unwrap(), 1);
        let payloads = sink.take();
        assert_eq!(payloads.len(), 1);
        assert_eq!(MessageKind::classify(&payloads[0]), MessageKind::Provisioning);
    }

    #[test]
    fn test_shutdown_interrupts_failed_frame_backoff() {
        let (_, sink, mut context) = fixture(&[None]);
        context.config.scheduler.phase_pause_ms = 60_000;
        let mut session =
            DisplaySession::new(sink.clone(), NoDelay, RejectingEncoder::default(), 0x42);
        context.signals.begin_frame_source();
        context.signals.push_frame(RgbImage::new(0, 0));
        let shutdown = ShutdownToken::new();
        shutdown.cancel();

        assert!(run_iteration(&mut session, &context, &shutdown).is_break());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_battery_line_from_telemetry() {
        let (mut session, sink, mut context) = fixture(&[Some(HOST)]);
        struct Full;
        impl riberry_core::traits::BatterySensor for Full {
            fn read_percentage(&mut self) -> Result<u8, riberry_core::traits::SensorError> {
                Ok(100)
            }
            fn read_charging(&mut self) -> Result<bool, riberry_core::traits::SensorError> {
                Ok(true)
            }
        }
        let config = BatteryConfig {
            sample_period_ms: 1,
            ..BatteryConfig::default()
        };
        let telemetry = TelemetryHandle::spawn(Full, &config).unwrap();
        context.telemetry = Some(telemetry.reader());
        while telemetry.reader().filtered_percentage() < 99.5 {
            std::thread::sleep(Duration::from_millis(1));
        }
        telemetry.stop();
        telemetry.join();

        run_iteration(&mut session, &context, &ShutdownToken::new());
        let payloads = sink.take();
        assert!(text(&payloads[0]).contains("Bat: \x1b[32m99%\x1b[39m+\n")
            || text(&payloads[0]).contains("Bat: \x1b[32m100%\x1b[39m+\n"));
    }

    #[test]
    fn test_shutdown_interrupts_pause() {
        let (session, sink, mut context) = fixture(&[Some(HOST)]);
        context.config.scheduler.phase_pause_ms = 60_000;
        let shutdown = ShutdownToken::new();

        let handle = spawn(session, context, shutdown.clone()).unwrap();
        while sink.payloads.lock().unwrap().is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        shutdown.cancel();
        handle.join().unwrap();

        let payloads = sink.take();
        assert_eq!(payloads.len(), 1);
        assert_eq!(MessageKind::classify(&payloads[0]), MessageKind::Status);
    }

    #[test]
    fn test_cancelled_before_start_sends_nothing() {
        let (session, sink, context) = fixture(&[Some(HOST)]);
        let shutdown = ShutdownToken::new();
        shutdown.cancel();

        run(session, &context, &shutdown);
        assert!(sink.take().is_empty());
    }
}
