//! A sampler whose decision function is controlled by a remote endpoint.
//!
//! The remote service speaks the Jaeger strategies protocol: a request
//! carrying a service name is answered with either a probabilistic or a
//! rate limiting strategy. Transport is abstracted behind
//! [`StrategyClient`] so the SDK stays free of HTTP machinery.
use crate::global;
use crate::sdk::trace::{Sampler, ShouldSample};
use crate::trace::{Link, SamplingResult, SpanKind, TraceId, TraceResult};
use crate::{Context, KeyValue};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::thread;
use std::time::Duration;

/// The probability the sampler starts out with, until the first strategy
/// response arrives.
const INITIAL_SAMPLING_RATE: f64 = 0.001;

/// Ceiling for the failure backoff between strategy fetches.
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(60 * 5);

/// The default interval between strategy fetches.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// The type of strategy a remote endpoint configured.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub enum StrategyType {
    /// Sample a fixed fraction of traces.
    #[serde(rename = "PROBABILISTIC")]
    Probabilistic,
    /// Admit a bounded number of traces per second.
    #[serde(rename = "RATE_LIMITING")]
    RateLimiting,
}

/// The probabilistic strategy payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilisticSamplingStrategy {
    /// The fraction of traces to sample, in `[0.0, 1.0]`.
    pub sampling_rate: f64,
}

/// The rate limiting strategy payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitingSamplingStrategy {
    /// The number of traces to admit per second.
    pub max_traces_per_second: i32,
}

/// A remote strategy response. The two strategy payloads are mutually
/// exclusive; `strategy_type` names the populated one.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingStrategyResponse {
    /// Which strategy the endpoint selected.
    pub strategy_type: StrategyType,
    /// Present when `strategy_type` is [`StrategyType::Probabilistic`].
    #[serde(default)]
    pub probabilistic_sampling: Option<ProbabilisticSamplingStrategy>,
    /// Present when `strategy_type` is [`StrategyType::RateLimiting`].
    #[serde(default)]
    pub rate_limiting_sampling: Option<RateLimitingSamplingStrategy>,
}

/// Transport used to fetch sampling strategies for a service.
///
/// Implementations typically issue an HTTP or gRPC request carrying the
/// service name and decode the JSON response into a
/// [`SamplingStrategyResponse`].
pub trait StrategyClient: Send + Sync + fmt::Debug {
    /// Fetch the current strategy for `service_name`.
    fn fetch(&self, service_name: &str) -> TraceResult<SamplingStrategyResponse>;
}

/// Builder for [`RemoteSampler`].
#[derive(Debug)]
pub struct RemoteSamplerBuilder {
    client: Box<dyn StrategyClient>,
    service_name: String,
    poll_interval: Duration,
}

impl RemoteSamplerBuilder {
    /// Change how often the SDK fetches the sampling strategy from the
    /// remote endpoint.
    ///
    /// Defaults to one minute. Fetch failures back off exponentially from
    /// this interval, up to five minutes.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Build the sampler and start its poller thread.
    pub fn build(self) -> Sampler {
        Sampler::Remote(RemoteSampler::new(
            self.client,
            self.service_name,
            self.poll_interval,
        ))
    }
}

struct RemoteSamplerInner {
    client: Box<dyn StrategyClient>,
    service_name: String,
    delegate: RwLock<Arc<Sampler>>,
    shutdown: Sender<()>,
}

impl Drop for RemoteSamplerInner {
    fn drop(&mut self) {
        // Wake the poller so it can observe that the sampler is gone.
        let _ = self.shutdown.try_send(());
    }
}

/// A sampler that asynchronously refreshes its delegate from a remote
/// strategy endpoint.
///
/// Until the first response arrives the delegate is
/// `TraceIdRatioBased(0.001)`. Strategy updates swap the delegate
/// atomically; a failed fetch keeps the current delegate, reports the error,
/// and retries with exponential backoff capped at five minutes.
#[derive(Clone)]
pub struct RemoteSampler {
    inner: Arc<RemoteSamplerInner>,
}

impl fmt::Debug for RemoteSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSampler")
            .field("service_name", &self.inner.service_name)
            .field("delegate", &self.delegate())
            .finish()
    }
}

impl RemoteSampler {
    /// Create a builder for a remote sampler polling strategies for
    /// `service_name` through `client`.
    pub fn builder<C, S>(client: C, service_name: S) -> RemoteSamplerBuilder
    where
        C: StrategyClient + 'static,
        S: Into<String>,
    {
        RemoteSamplerBuilder {
            client: Box::new(client),
            service_name: service_name.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    fn new(client: Box<dyn StrategyClient>, service_name: String, poll_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let inner = Arc::new(RemoteSamplerInner {
            client,
            service_name,
            delegate: RwLock::new(Arc::new(Sampler::TraceIdRatioBased(INITIAL_SAMPLING_RATE))),
            shutdown: shutdown_tx,
        });

        let weak = Arc::downgrade(&inner);
        let _ = thread::Builder::new()
            .name("teletrace-remote-sampler".to_string())
            .spawn(move || poll_loop(weak, shutdown_rx, poll_interval));

        RemoteSampler { inner }
    }

    /// The currently active delegate.
    fn delegate(&self) -> Arc<Sampler> {
        self.inner
            .delegate
            .read()
            .map(|delegate| delegate.clone())
            .unwrap_or_else(|_| Arc::new(Sampler::TraceIdRatioBased(INITIAL_SAMPLING_RATE)))
    }

    pub(crate) fn apply_strategy(&self, strategy: SamplingStrategyResponse) {
        apply_strategy(&self.inner, strategy)
    }
}

fn apply_strategy(inner: &RemoteSamplerInner, strategy: SamplingStrategyResponse) {
    let new_delegate = match strategy.strategy_type {
        StrategyType::Probabilistic => strategy
            .probabilistic_sampling
            .map(|probabilistic| Sampler::TraceIdRatioBased(probabilistic.sampling_rate)),
        StrategyType::RateLimiting => strategy.rate_limiting_sampling.map(|rate_limiting| {
            Sampler::rate_limiting(rate_limiting.max_traces_per_second as f64)
        }),
    };

    match new_delegate {
        Some(sampler) => {
            if let Ok(mut delegate) = inner.delegate.write() {
                *delegate = Arc::new(sampler);
            }
        }
        None => global::handle_error(crate::trace::TraceError::from(
            "remote sampling strategy response is missing its strategy payload",
        )),
    }
}

fn poll_loop(
    weak: Weak<RemoteSamplerInner>,
    shutdown_rx: crossbeam_channel::Receiver<()>,
    poll_interval: Duration,
) {
    let mut wait = poll_interval;
    loop {
        match shutdown_rx.recv_timeout(wait) {
            // Either an explicit wake-up from the final drop or a closed
            // channel: stop polling.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };

        match inner.client.fetch(&inner.service_name) {
            Ok(strategy) => {
                apply_strategy(&inner, strategy);
                wait = poll_interval;
            }
            Err(err) => {
                global::handle_error(err);
                wait = (wait * 2).min(MAX_RETRY_INTERVAL);
            }
        }
    }
}

impl ShouldSample for RemoteSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        self.delegate()
            .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }

    fn description(&self) -> String {
        format!("RemoteSampler{{{}}}", self.delegate().description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SamplingDecision, TraceError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StaticClient {
        response: &'static str,
        fetches: Arc<AtomicUsize>,
    }

    impl StrategyClient for StaticClient {
        fn fetch(&self, _service_name: &str) -> TraceResult<SamplingStrategyResponse> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            serde_json::from_str(self.response)
                .map_err(|err| TraceError::Other(Box::new(err)))
        }
    }

    fn remote_sampler(response: &'static str) -> (RemoteSampler, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let sampler = match RemoteSampler::builder(
            StaticClient {
                response,
                fetches: fetches.clone(),
            },
            "test-service",
        )
        .with_poll_interval(Duration::from_secs(3600))
        .build()
        {
            Sampler::Remote(remote) => remote,
            _ => unreachable!("builder always returns a remote sampler"),
        };
        (sampler, fetches)
    }

    #[test]
    fn initial_delegate_is_low_probability() {
        let (sampler, _) = remote_sampler("{}");
        assert_eq!(
            sampler.description(),
            format!(
                "RemoteSampler{{{}}}",
                Sampler::TraceIdRatioBased(INITIAL_SAMPLING_RATE).description()
            )
        );
    }

    #[test]
    fn probabilistic_strategy_swaps_delegate() {
        let (sampler, _) = remote_sampler("{}");
        let response: SamplingStrategyResponse = serde_json::from_str(
            r#"{
                "strategyType": "PROBABILISTIC",
                "probabilisticSampling": {"samplingRate": 1.0}
            }"#,
        )
        .unwrap();

        sampler.apply_strategy(response);

        let decision = sampler
            .should_sample(
                None,
                TraceId::from(7u128),
                "op",
                &SpanKind::Internal,
                &[],
                &[],
            )
            .decision;
        assert_eq!(decision, SamplingDecision::RecordAndSample);
    }

    #[test]
    fn rate_limiting_strategy_swaps_delegate() {
        let (sampler, _) = remote_sampler("{}");
        let response: SamplingStrategyResponse = serde_json::from_str(
            r#"{
                "strategyType": "RATE_LIMITING",
                "rateLimitingSampling": {"maxTracesPerSecond": 100}
            }"#,
        )
        .unwrap();

        sampler.apply_strategy(response);
        assert_eq!(sampler.description(), "RemoteSampler{RateLimitingSampler{100}}");
    }

    #[test]
    fn malformed_strategy_keeps_current_delegate() {
        let (sampler, _) = remote_sampler("{}");
        let before = sampler.description();

        let response: SamplingStrategyResponse = serde_json::from_str(
            r#"{"strategyType": "PROBABILISTIC"}"#,
        )
        .unwrap();
        sampler.apply_strategy(response);

        assert_eq!(sampler.description(), before);
    }
}
