//! SDK trace configuration.
//!
//! Configuration represents the tracing configuration of one provider:
//! sampler, id generation, and span limits. Defaults may be overridden per
//! knob from the environment; explicit setters always win over the
//! environment.
use crate::sdk::trace::{IdGenerator, RandomIdGenerator, Sampler, ShouldSample, SpanLimits};
use std::env;
use std::str::FromStr;

const TELETRACE_SPAN_ATTRIBUTE_COUNT_LIMIT: &str = "TELETRACE_SPAN_ATTRIBUTE_COUNT_LIMIT";
const TELETRACE_SPAN_EVENT_COUNT_LIMIT: &str = "TELETRACE_SPAN_EVENT_COUNT_LIMIT";
const TELETRACE_SPAN_LINK_COUNT_LIMIT: &str = "TELETRACE_SPAN_LINK_COUNT_LIMIT";
const TELETRACE_TRACES_SAMPLER: &str = "TELETRACE_TRACES_SAMPLER";
const TELETRACE_TRACES_SAMPLER_ARG: &str = "TELETRACE_TRACES_SAMPLER_ARG";

/// Tracer configuration
#[derive(Debug)]
pub struct Config {
    /// The sampler that the sdk should use
    pub sampler: Box<dyn ShouldSample>,

    /// The id generator that the sdk should use
    pub id_generator: Box<dyn IdGenerator>,

    /// Span limits
    pub span_limits: SpanLimits,
}

impl Config {
    /// Specify the sampler to be used.
    pub fn with_sampler<T: ShouldSample + 'static>(mut self, sampler: T) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Specify the id generator to be used.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Specify the number of events to be recorded per span.
    pub fn with_max_events_per_span(mut self, max_events: u32) -> Self {
        self.span_limits.max_events_per_span = max_events;
        self
    }

    /// Specify the number of attributes to be recorded per span.
    pub fn with_max_attributes_per_span(mut self, max_attributes: u32) -> Self {
        self.span_limits.max_attributes_per_span = max_attributes;
        self
    }

    /// Specify the number of links to be recorded per span.
    pub fn with_max_links_per_span(mut self, max_links: u32) -> Self {
        self.span_limits.max_links_per_span = max_links;
        self
    }

    /// Specify all limits via a [`SpanLimits`].
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.span_limits = span_limits;
        self
    }
}

impl Default for Config {
    /// Create default sdk configuration, applying environment overrides.
    fn default() -> Self {
        let mut config = Config {
            sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
            id_generator: Box::<RandomIdGenerator>::default(),
            span_limits: SpanLimits::default(),
        };

        if let Some(max_attributes_per_span) = env::var(TELETRACE_SPAN_ATTRIBUTE_COUNT_LIMIT)
            .ok()
            .and_then(|count_limit| u32::from_str(&count_limit).ok())
        {
            config.span_limits.max_attributes_per_span = max_attributes_per_span;
        }

        if let Some(max_events_per_span) = env::var(TELETRACE_SPAN_EVENT_COUNT_LIMIT)
            .ok()
            .and_then(|max_events| u32::from_str(&max_events).ok())
        {
            config.span_limits.max_events_per_span = max_events_per_span;
        }

        if let Some(max_links_per_span) = env::var(TELETRACE_SPAN_LINK_COUNT_LIMIT)
            .ok()
            .and_then(|max_links| u32::from_str(&max_links).ok())
        {
            config.span_limits.max_links_per_span = max_links_per_span;
        }

        let sampler_arg = env::var(TELETRACE_TRACES_SAMPLER_ARG).ok();
        if let Ok(sampler) = env::var(TELETRACE_TRACES_SAMPLER) {
            config.sampler = sampler_from_env(sampler.as_str(), sampler_arg.as_deref());
        }

        config
    }
}

fn sampler_from_env(sampler: &str, sampler_arg: Option<&str>) -> Box<dyn ShouldSample> {
    let ratio = |arg: Option<&str>| {
        arg.and_then(|r| r.parse::<f64>().ok()).unwrap_or_else(|| {
            log::warn!(
                "{} is not a valid sampling ratio, using 1.0",
                TELETRACE_TRACES_SAMPLER_ARG
            );
            1.0
        })
    };

    match sampler {
        "always_on" => Box::new(Sampler::AlwaysOn),
        "always_off" => Box::new(Sampler::AlwaysOff),
        "traceidratio" => Box::new(Sampler::TraceIdRatioBased(ratio(sampler_arg))),
        "parentbased_always_on" => Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
        "parentbased_always_off" => Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOff))),
        "parentbased_traceidratio" => Box::new(Sampler::ParentBased(Box::new(
            Sampler::TraceIdRatioBased(ratio(sampler_arg)),
        ))),
        unknown => {
            log::warn!(
                "unrecognized sampler {:?} in {}, using parentbased_always_on",
                unknown,
                TELETRACE_TRACES_SAMPLER
            );
            Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        }
    }
}
