#[cfg(feature = "trace")]
use crate::trace::context::SynchronizedSpan;
use futures_core::stream::Stream;
use futures_sink::Sink;
use pin_project_lite::pin_project;
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use thiserror::Error;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
    static ATTACH_DEPTH: Cell<u64> = const { Cell::new(0) };
}

/// Errors raised by context stack management.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ContextError {
    /// A [`ContextGuard`] was dropped on this thread while a more recently
    /// attached context was still active. Releases must mirror attaches in
    /// LIFO order; the out-of-order release is skipped to keep the stack
    /// consistent.
    #[error("context guard dropped out of order, release skipped")]
    OutOfOrderRelease,
}

/// An execution-scoped collection of values.
///
/// A [`Context`] is a propagation mechanism which carries execution-scoped
/// values across API boundaries and between logically associated execution
/// units. Cross-cutting concerns access their data in-process using the same
/// shared context object.
///
/// [`Context`]s are immutable, and their write operations result in the
/// creation of a new context containing the original values and the new
/// specified values.
///
/// ## Context state
///
/// Concerns can create and retrieve their local state in the current
/// execution state represented by a context through the [`get`] and
/// [`with_value`] methods. It is recommended to use application-specific
/// types when storing new context values to avoid unintentionally
/// overwriting existing state.
///
/// ## Managing the current context
///
/// Contexts can be associated with the caller's current execution unit on a
/// given thread via the [`attach`] method, and previous contexts can be
/// restored by dropping the returned [`ContextGuard`]. Attach/release pairs
/// are strictly LIFO per thread; a guard dropped while a more recently
/// attached context is active is a programmer error that is reported through
/// the global error handler rather than silently accepted.
///
/// Nothing is implicitly shared across threads. To carry the current context
/// into a task that runs elsewhere, capture it explicitly with [`wrap`] (for
/// callbacks) or [`FutureExt::with_context`] (for futures, streams, and
/// sinks).
///
/// [`get`]: Context::get()
/// [`with_value`]: Context::with_value()
/// [`attach`]: Context::attach()
/// [`wrap`]: Context::wrap()
///
/// # Examples
///
/// ```
/// use teletrace::Context;
///
/// // Application-specific `a` and `b` values
/// #[derive(Debug, PartialEq)]
/// struct ValueA(&'static str);
/// #[derive(Debug, PartialEq)]
/// struct ValueB(u64);
///
/// let _outer_guard = Context::new().with_value(ValueA("a")).attach();
///
/// // Only value a has been set
/// let current = Context::current();
/// assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(current.get::<ValueB>(), None);
///
/// {
///     let _inner_guard = Context::current_with_value(ValueB(42)).attach();
///     // Both values are set in inner context
///     let current = Context::current();
///     assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
///     assert_eq!(current.get::<ValueB>(), Some(&ValueB(42)));
/// }
///
/// // Resets to only the `a` value when inner guard is dropped
/// let current = Context::current();
/// assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(current.get::<ValueB>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    #[cfg(feature = "trace")]
    pub(crate) span: Option<Arc<SynchronizedSpan>>,
    entries: HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>,
}

impl Context {
    /// Creates an empty `Context`.
    ///
    /// The context is initially created with a capacity of 0, so it will not
    /// allocate. Use [`with_value`] to create a new context that has entries.
    ///
    /// [`with_value`]: Context::with_value()
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context returning its value.
    ///
    /// This can be used to read from the current context without the
    /// overhead of cloning it and dropping the clone.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current thread's context with the given value.
    ///
    /// This is a more efficient form of `Context::current().with_value(value)`
    /// as it avoids the intermediate context clone.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        let mut new_context = Context::current();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));

        new_context
    }

    /// Returns a reference to the entry for the corresponding value type.
    ///
    /// # Examples
    ///
    /// ```
    /// use teletrace::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct ValueA(&'static str);
    /// #[derive(Debug, PartialEq)]
    /// struct MyUser();
    ///
    /// let cx = Context::new().with_value(ValueA("a"));
    ///
    /// // Values can be queried by type
    /// assert_eq!(cx.get::<ValueA>(), Some(&ValueA("a")));
    ///
    /// // And return none if not yet set
    /// assert_eq!(cx.get::<MyUser>(), None);
    /// ```
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast_ref())
    }

    /// Returns a copy of the context with the new value included.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_context = self.clone();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));

        new_context
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] will reset the current context
    /// to the previous value. Guards must be dropped on the thread that
    /// attached them, in the reverse order of attachment; release after the
    /// first is a no-op.
    ///
    /// # Examples
    ///
    /// ```
    /// use teletrace::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct ValueA(&'static str);
    ///
    /// let my_cx = Context::new().with_value(ValueA("a"));
    ///
    /// // Set the current thread context
    /// let cx_guard = my_cx.attach();
    /// assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA("a")));
    ///
    /// // Drop the guard to restore the previous context
    /// drop(cx_guard);
    /// assert_eq!(Context::current().get::<ValueA>(), None);
    /// ```
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();
        let depth = ATTACH_DEPTH
            .try_with(|depth| {
                let new = depth.get() + 1;
                depth.set(new);
                new
            })
            .unwrap_or(0);

        ContextGuard {
            previous_cx,
            depth,
            _marker: PhantomData,
        }
    }

    /// Wraps a callback so that it runs with this context as the current one.
    ///
    /// The context is captured now and attached around the invocation on
    /// whichever thread eventually runs the callback; that thread's previous
    /// context is restored afterwards. This is the explicit hand-off
    /// mechanism for crossing executor boundaries.
    ///
    /// # Examples
    ///
    /// ```
    /// use teletrace::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct ValueA(&'static str);
    ///
    /// let task = Context::new().with_value(ValueA("a")).wrap(|| {
    ///     assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA("a")));
    /// });
    ///
    /// let handle = std::thread::spawn(task);
    /// handle.join().unwrap();
    /// ```
    pub fn wrap<T, F>(self, f: F) -> impl FnOnce() -> T
    where
        F: FnOnce() -> T,
    {
        move || {
            let _guard = self.attach();
            f()
        }
    }

    #[cfg(feature = "trace")]
    pub(crate) fn current_with_synchronized_span(value: SynchronizedSpan) -> Self {
        Context {
            span: Some(Arc::new(value)),
            entries: Context::map_current(|cx| cx.entries.clone()),
        }
    }

    #[cfg(feature = "trace")]
    pub(crate) fn with_synchronized_span(&self, value: SynchronizedSpan) -> Self {
        Context {
            span: Some(Arc::new(value)),
            entries: self.entries.clone(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    depth: u64,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let current_depth = match ATTACH_DEPTH.try_with(Cell::get) {
            Ok(depth) => depth,
            // The thread is tearing down, there is no stack left to repair.
            Err(_) => return,
        };
        if current_depth != self.depth {
            // A more recently attached context is still active on this
            // thread. Restoring now would corrupt the stack, so the release
            // is skipped and reported.
            crate::global::handle_error(ContextError::OutOfOrderRelease);
            return;
        }

        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
        let _ = ATTACH_DEPTH.try_with(|depth| depth.set(self.depth - 1));
    }
}

pin_project! {
    /// A future, stream, or sink that has an associated context.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: Sized> FutureExt for T {}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

impl<I, T: Sink<I>> Sink<I> for WithContext<T> {
    type Error = T::Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_ready(this.inner, task_cx)
    }

    fn start_send(self: Pin<&mut Self>, item: I) -> Result<(), Self::Error> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::start_send(this.inner, item)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_flush(this.inner, task_cx)
    }

    fn poll_close(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_close(this.inner, task_cx)
    }
}

/// Extension trait allowing futures, streams, and sinks to carry a context.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type, returning a
    /// `WithContext` wrapper.
    ///
    /// When the wrapped type is a future, stream, or sink, the attached
    /// context will be set as current while it is being polled.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this type, returning a
    /// `WithContext` wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher holds the u64
/// of the TypeId, and then returns it, instead of doing any bit fiddling.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ValueA(&'static str);
    #[derive(Debug, PartialEq)]
    struct ValueB(u64);

    #[test]
    fn nested_contexts() {
        let _outer_guard = Context::new().with_value(ValueA("a")).attach();

        // Only value `a` is set
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);

        {
            let _inner_guard = Context::current_with_value(ValueB(42)).attach();
            // Both values are set in inner context
            let current = Context::current();
            assert_eq!(current.get(), Some(&ValueA("a")));
            assert_eq!(current.get(), Some(&ValueB(42)));
        }

        // Resets to only value `a` when inner guard is dropped
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);
    }

    #[test]
    fn attach_is_thread_scoped() {
        let _guard = Context::new().with_value(ValueA("a")).attach();

        let handle = std::thread::spawn(|| {
            // Other threads never observe this thread's attachment.
            assert_eq!(Context::current().get::<ValueA>(), None);
        });
        handle.join().unwrap();

        assert_eq!(Context::current().get(), Some(&ValueA("a")));
    }

    #[test]
    fn wrap_hands_off_context() {
        let task = Context::new().with_value(ValueB(7)).wrap(|| {
            assert_eq!(Context::current().get(), Some(&ValueB(7)));
        });

        let handle = std::thread::spawn(move || {
            task();
            // The worker's own context is restored once the callback exits.
            assert_eq!(Context::current().get::<ValueB>(), None);
        });
        handle.join().unwrap();
    }

    #[test]
    fn out_of_order_release_is_skipped() {
        std::thread::spawn(|| {
            let outer = Context::new().with_value(ValueA("outer")).attach();
            let inner = Context::current_with_value(ValueB(1)).attach();

            // Dropping the outer guard first must not disturb the stack.
            drop(outer);
            assert_eq!(Context::current().get(), Some(&ValueB(1)));

            drop(inner);
            assert_eq!(Context::current().get(), Some(&ValueA("outer")));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn reattaching_current_context_is_reentrant() {
        let cx = Context::new().with_value(ValueA("a"));
        let _outer = cx.clone().attach();
        {
            let _inner = cx.attach();
            assert_eq!(Context::current().get(), Some(&ValueA("a")));
        }
        assert_eq!(Context::current().get(), Some(&ValueA("a")));
    }
}
