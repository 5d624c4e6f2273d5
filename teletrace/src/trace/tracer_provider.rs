use crate::trace::Tracer;
use std::borrow::Cow;

/// Types that can create instances of [`Tracer`].
pub trait TracerProvider {
    /// The [`Tracer`] type that this provider will return.
    type Tracer: Tracer;

    /// Returns a new tracer with the given instrumentation name.
    ///
    /// The name should be the name of the library providing instrumentation,
    /// e.g. the crate name.
    fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Self::Tracer {
        self.versioned_tracer(name, None::<&'static str>)
    }

    /// Returns a new versioned tracer with the given instrumentation name.
    fn versioned_tracer(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: Option<impl Into<Cow<'static, str>>>,
    ) -> Self::Tracer;
}
