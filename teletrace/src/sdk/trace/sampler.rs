//! Start-time sampling decisions.
use crate::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
};
use crate::{Context, KeyValue};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[cfg(feature = "remote-sampler")]
mod remote;

#[cfg(feature = "remote-sampler")]
pub use remote::{
    RemoteSampler, RemoteSamplerBuilder, SamplingStrategyResponse, StrategyClient, StrategyType,
};

/// The `ShouldSample` interface allows implementations to provide samplers
/// which will return a sampling [`SamplingResult`] based on information that
/// is typically available just before the [`Span`] was created.
///
/// Sampling results have two independent effects:
///
/// * [`Span::is_recording()`]. If the decision is not [`SamplingDecision::Drop`]
///   the span records tracing data locally; otherwise all span operations
///   become no-ops.
/// * The `sampled` flag in [`SpanContext::trace_flags()`]. Only
///   [`SamplingDecision::RecordAndSample`] sets it, and only spans carrying
///   it reach exporters. The flag propagates to child spans per the [W3C
///   specification](https://w3c.github.io/trace-context/).
///
/// [`SpanContext::trace_flags()`]: crate::trace::SpanContext::trace_flags
/// [`Span`]: crate::trace::Span
/// [`Span::is_recording()`]: crate::trace::Span::is_recording
pub trait ShouldSample: CloneShouldSample + Send + Sync + std::fmt::Debug {
    /// Returns the [`SamplingDecision`] for a [`Span`] to be created, along
    /// with extra attributes to attach and the trace state the new span
    /// context should carry.
    ///
    /// [`Span`]: crate::trace::Span
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;

    /// A human-readable description of this sampler, including enough of its
    /// configuration to reproduce the decision function.
    fn description(&self) -> String {
        "CustomSampler".to_string()
    }
}

/// This trait should not be used directly; users should use
/// [`ShouldSample`].
pub trait CloneShouldSample {
    /// Box-clone this sampler.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in sampling policies.
///
/// These allow for simple decisions. For more complex scenarios consider
/// implementing your own sampler using the [`ShouldSample`] trait.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,

    /// Never sample the trace.
    AlwaysOff,

    /// Respects the parent span's sampling decision, delegating to an inner
    /// sampler only for root spans.
    ParentBased(Box<dyn ShouldSample>),

    /// Sample a given fraction of traces, deterministically per trace id:
    /// two spans of the same trace always get the same decision. Fractions
    /// >= 1 always sample and fractions < 0 are treated as zero.
    TraceIdRatioBased(f64),

    /// Admit at most a fixed number of sampled traces per second, enforced
    /// by a shared leaky bucket.
    RateLimiting(RateLimitingSampler),

    /// A sampler whose decision function is periodically replaced by a
    /// remote strategy endpoint.
    #[cfg(feature = "remote-sampler")]
    #[cfg_attr(docsrs, doc(cfg(feature = "remote-sampler")))]
    Remote(RemoteSampler),
}

impl Sampler {
    /// Create a rate limiting sampler admitting `max_traces_per_second`.
    pub fn rate_limiting(max_traces_per_second: f64) -> Self {
        Sampler::RateLimiting(RateLimitingSampler::new(max_traces_per_second))
    }
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let decision = match self {
            // Always sample the trace
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            // Never sample the trace
            Sampler::AlwaysOff => SamplingDecision::Drop,
            // The parent decision if the parent context is valid; otherwise
            // the decision of `delegate_sampler` for the new root
            Sampler::ParentBased(delegate_sampler) => parent_context
                .filter(|cx| cx.has_active_span() && cx.span().span_context().is_valid())
                .map_or_else(
                    || {
                        delegate_sampler
                            .should_sample(
                                parent_context,
                                trace_id,
                                name,
                                span_kind,
                                attributes,
                                links,
                            )
                            .decision
                    },
                    |cx| {
                        let span = cx.span();
                        if span.span_context().is_sampled() {
                            SamplingDecision::RecordAndSample
                        } else {
                            SamplingDecision::Drop
                        }
                    },
                ),
            // Probabilistically sample the trace.
            Sampler::TraceIdRatioBased(prob) => sample_based_on_probability(prob, trace_id),
            Sampler::RateLimiting(rate_limiting) => rate_limiting.decide(),
            #[cfg(feature = "remote-sampler")]
            Sampler::Remote(remote_sampler) => {
                remote_sampler
                    .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
                    .decision
            }
        };

        SamplingResult {
            decision,
            // No extra attributes ever set by the built-in samplers.
            attributes: Vec::new(),
            // The built-in samplers do not modify the trace state.
            trace_state: match parent_context {
                Some(ctx) => ctx.span().span_context().trace_state().clone(),
                None => TraceState::default(),
            },
        }
    }

    fn description(&self) -> String {
        match self {
            Sampler::AlwaysOn => "AlwaysOnSampler".to_string(),
            Sampler::AlwaysOff => "AlwaysOffSampler".to_string(),
            Sampler::ParentBased(delegate) => {
                format!("ParentBased{{{}}}", delegate.description())
            }
            Sampler::TraceIdRatioBased(prob) => format!(
                "TraceIdRatioBased{{{},idUpperBound={}}}",
                prob,
                probability_upper_bound(prob)
            ),
            Sampler::RateLimiting(rate_limiting) => format!(
                "RateLimitingSampler{{{}}}",
                rate_limiting.max_traces_per_second
            ),
            #[cfg(feature = "remote-sampler")]
            Sampler::Remote(remote_sampler) => remote_sampler.description(),
        }
    }
}

fn probability_upper_bound(prob: &f64) -> u64 {
    (prob.max(0.0).min(1.0) * (1u64 << 63) as f64) as u64
}

pub(crate) fn sample_based_on_probability(prob: &f64, trace_id: TraceId) -> SamplingDecision {
    if *prob >= 1.0 {
        SamplingDecision::RecordAndSample
    } else {
        let prob_upper_bound = probability_upper_bound(prob);
        // The lower 64 bits of the trace id act as the per-trace random
        // source, so the decision is a pure function of (prob, trace_id).
        let bytes = trace_id.to_bytes();
        let (_, low) = bytes.split_at(8);
        let trace_id_low = u64::from_be_bytes(low.try_into().unwrap());
        let rnd_from_trace_id = trace_id_low >> 1;

        if rnd_from_trace_id < prob_upper_bound {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        }
    }
}

/// A thread-safe leaky bucket admitting a bounded number of sampled traces
/// per second.
#[derive(Clone, Debug)]
pub struct RateLimitingSampler {
    max_traces_per_second: f64,
    bucket: Arc<Mutex<LeakyBucket>>,
}

impl RateLimitingSampler {
    /// Create a new rate limiting sampler.
    ///
    /// Clones share the same bucket, so cloning a sampler (e.g. into
    /// multiple tracer configurations) does not multiply the admitted rate.
    pub fn new(max_traces_per_second: f64) -> Self {
        RateLimitingSampler {
            max_traces_per_second,
            bucket: Arc::new(Mutex::new(LeakyBucket::new(max_traces_per_second))),
        }
    }

    fn decide(&self) -> SamplingDecision {
        let admitted = self
            .bucket
            .lock()
            .map(|mut bucket| bucket.try_spend(1.0))
            .unwrap_or(false);
        if admitted {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        }
    }
}

#[derive(Debug)]
pub(crate) struct LeakyBucket {
    credits_per_second: f64,
    max_balance: f64,
    balance: f64,
    last_tick: Instant,
}

impl LeakyBucket {
    pub(crate) fn new(credits_per_second: f64) -> Self {
        let credits_per_second = credits_per_second.max(0.0);
        LeakyBucket {
            credits_per_second,
            // Allow at least one span through so a rate below 1/s still
            // samples occasionally rather than never.
            max_balance: credits_per_second.max(1.0),
            balance: credits_per_second.max(1.0),
            last_tick: Instant::now(),
        }
    }

    pub(crate) fn try_spend(&mut self, cost: f64) -> bool {
        if self.credits_per_second == 0.0 {
            return false;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        self.balance = (self.balance + elapsed * self.credits_per_second).min(self.max_balance);

        if self.balance >= cost {
            self.balance -= cost;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trace::TestSpan;
    use crate::trace::{SpanContext, SpanId, TraceFlags};
    use rand::Rng;

    #[rustfmt::skip]
    fn sampler_data() -> Vec<(&'static str, Sampler, f64, bool, bool)> {
        vec![
            // Span w/o a parent
            ("never_sample", Sampler::AlwaysOff, 0.0, false, false),
            ("always_sample", Sampler::AlwaysOn, 1.0, false, false),
            ("ratio_-1", Sampler::TraceIdRatioBased(-1.0), 0.0, false, false),
            ("ratio_.25", Sampler::TraceIdRatioBased(0.25), 0.25, false, false),
            ("ratio_.50", Sampler::TraceIdRatioBased(0.50), 0.5, false, false),
            ("ratio_.75", Sampler::TraceIdRatioBased(0.75), 0.75, false, false),
            ("ratio_2.0", Sampler::TraceIdRatioBased(2.0), 1.0, false, false),

            // Spans w/o a parent delegate
            ("delegate_to_always_on", Sampler::ParentBased(Box::new(Sampler::AlwaysOn)), 1.0, false, false),
            ("delegate_to_always_off", Sampler::ParentBased(Box::new(Sampler::AlwaysOff)), 0.0, false, false),
            ("delegate_to_ratio_.25", Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(0.25))), 0.25, false, false),

            // Spans with a parent that is *not* sampled act like spans w/o a parent
            ("unsampled_parent_with_ratio_.25", Sampler::TraceIdRatioBased(0.25), 0.25, true, false),
            ("unsampled_parent_or_else_with_always_on", Sampler::ParentBased(Box::new(Sampler::AlwaysOn)), 0.0, true, false),
            ("unsampled_parent_or_else_with_always_off", Sampler::ParentBased(Box::new(Sampler::AlwaysOff)), 0.0, true, false),

            // A ratio sampler with a sampled parent ignores the parent
            ("sampled_parent_with_ratio_.25", Sampler::TraceIdRatioBased(0.25), 0.25, true, true),

            // Spans with a sampled parent, will always sample, regardless of the delegate sampler
            ("sampled_parent_or_else_with_always_on", Sampler::ParentBased(Box::new(Sampler::AlwaysOn)), 1.0, true, true),
            ("sampled_parent_or_else_with_always_off", Sampler::ParentBased(Box::new(Sampler::AlwaysOff)), 1.0, true, true),

            // Spans with a sampled parent, but using the NeverSample Sampler, aren't sampled
            ("sampled_parent_span_with_never_sample", Sampler::AlwaysOff, 0.0, true, true),
        ]
    }

    #[test]
    fn sampling() {
        let total = 10_000;
        let mut rng = rand::thread_rng();
        for (name, sampler, expectation, parent, sample_parent) in sampler_data() {
            let mut sampled = 0;
            for _ in 0..total {
                let parent_context = if parent {
                    let trace_flags = if sample_parent {
                        TraceFlags::SAMPLED
                    } else {
                        TraceFlags::default()
                    };
                    let span_context = SpanContext::new(
                        TraceId::from(1u128),
                        SpanId::from(1u64),
                        trace_flags,
                        false,
                        TraceState::default(),
                    );

                    Some(Context::current_with_span(TestSpan(span_context)))
                } else {
                    None
                };

                let trace_id = TraceId::from(rng.gen::<u128>());
                if sampler
                    .should_sample(
                        parent_context.as_ref(),
                        trace_id,
                        name,
                        &SpanKind::Internal,
                        &[],
                        &[],
                    )
                    .decision
                    == SamplingDecision::RecordAndSample
                {
                    sampled += 1;
                }
            }
            let mut tolerance = 0.0;
            let got = sampled as f64 / total as f64;

            if expectation > 0.0 && expectation < 1.0 {
                // See https://en.wikipedia.org/wiki/Binomial_proportion_confidence_interval
                let z = 4.75342; // This should succeed 99.9999% of the time
                tolerance = z * (got * (1.0 - got) / total as f64).sqrt();
            }

            let diff = (got - expectation).abs();
            assert!(
                diff <= tolerance,
                "{} got {:?} (diff: {}), expected {} (w/tolerance: {})",
                name,
                got,
                diff,
                expectation,
                tolerance
            );
        }
    }

    #[test]
    fn probability_sampling_is_deterministic_per_trace_id() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let trace_id = TraceId::from(rng.gen::<u128>());
            let first = sampler
                .should_sample(None, trace_id, "op", &SpanKind::Internal, &[], &[])
                .decision;
            let second = sampler
                .should_sample(None, trace_id, "op", &SpanKind::Internal, &[], &[])
                .decision;
            assert_eq!(first, second);
        }
    }

    #[test]
    fn description_is_reproducible() {
        assert_eq!(Sampler::AlwaysOn.description(), "AlwaysOnSampler");
        assert_eq!(
            Sampler::TraceIdRatioBased(0.5).description(),
            format!("TraceIdRatioBased{{0.5,idUpperBound={}}}", 1u64 << 62)
        );
        assert_eq!(
            Sampler::ParentBased(Box::new(Sampler::AlwaysOff)).description(),
            "ParentBased{AlwaysOffSampler}"
        );
    }

    #[test]
    fn rate_limiting_caps_admissions() {
        let sampler = Sampler::rate_limiting(2.0);
        let mut admitted = 0;
        for _ in 0..100 {
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
            if decision == SamplingDecision::RecordAndSample {
                admitted += 1;
            }
        }
        // The bucket starts with at most `max_traces_per_second` credits and
        // the loop completes long before a full second of refill.
        assert!(admitted >= 1 && admitted <= 3, "admitted {}", admitted);
    }

    #[test]
    fn rate_limiting_clones_share_a_bucket() {
        let sampler = Sampler::rate_limiting(1.0);
        let clone = sampler.clone();

        let first = sampler.should_sample(
            None,
            TraceId::from(1u128),
            "op",
            &SpanKind::Internal,
            &[],
            &[],
        );
        let second = clone.should_sample(
            None,
            TraceId::from(2u128),
            "op",
            &SpanKind::Internal,
            &[],
            &[],
        );

        assert_eq!(first.decision, SamplingDecision::RecordAndSample);
        assert_eq!(second.decision, SamplingDecision::Drop);
    }

    #[test]
    fn parent_sampler() {
        // name, delegate, context(with or without parent), expected decision
        let test_cases = vec![
            (
                "should use delegate sampler",
                Sampler::AlwaysOn,
                Context::new(),
                SamplingDecision::RecordAndSample,
            ),
            (
                "should use parent result, unsampled",
                Sampler::AlwaysOn,
                Context::current_with_span(TestSpan(SpanContext::new(
                    TraceId::from(1u128),
                    SpanId::from(1u64),
                    TraceFlags::default(),
                    false,
                    TraceState::default(),
                ))),
                SamplingDecision::Drop,
            ),
            (
                "should use parent result, sampled",
                Sampler::AlwaysOff,
                Context::current_with_span(TestSpan(SpanContext::new(
                    TraceId::from(1u128),
                    SpanId::from(1u64),
                    TraceFlags::SAMPLED,
                    false,
                    TraceState::default(),
                ))),
                SamplingDecision::RecordAndSample,
            ),
        ];

        for (name, delegate, parent_cx, expected) in test_cases {
            let sampler = Sampler::ParentBased(Box::new(delegate));
            let result = sampler.should_sample(
                Some(&parent_cx),
                TraceId::from(1u128),
                name,
                &SpanKind::Internal,
                &[],
                &[],
            );

            assert_eq!(result.decision, expected);
        }
    }
}
