//! Notification ports and handler dispatch.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::BTreeMap,
    error::Error,
    ffi::c_void,
    fmt, io,
    mem::ManuallyDrop,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
    thread,
};

use crate::{
    DeviceIterator, IoReturn, PathIterator, SystemRegistry,
    event::{Binding, EventKind, Flavor},
    filter::MatchFilter,
    registry::{MainPort, RawObject, Registry},
};

type RawHandler<R> = Box<dyn FnMut(&mut DeviceIterator<'_, R>)>;
type PathHandler<R> = Box<dyn FnMut(&mut PathIterator<'_, R>)>;

enum Handler<R: Registry> {
    Raw(RawHandler<R>),
    Path(PathHandler<R>),
}

/// The set of handlers to subscribe with [`NotificationPort::add_matching_notifications`].
///
/// Every [`EventKind`] has two optional slots: a *raw* handler that receives a
/// [`DeviceIterator`], and a *path* handler that receives a [`PathIterator`]. Only the slots that
/// are filled result in a subscription. Filling both slots of one kind is an error, reported by
/// [`NotificationPort::add_matching_notifications`].
///
/// Handlers are invoked on the thread that runs the event loop, one at a time. Devices a handler
/// leaves in its iterator are released after it returns.
///
/// # Examples
///
/// ```
/// use iokit_notify::Handlers;
///
/// let handlers: Handlers = Handlers::new()
///     .on_path_match(|paths| {
///         for path in paths {
///             println!("{path} matched");
///         }
///     })
///     .on_path_terminate(|paths| {
///         for path in paths {
///             println!("{path} terminated");
///         }
///     });
/// assert_eq!(handlers.bindings().count(), 2);
/// ```
pub struct Handlers<R: Registry = SystemRegistry> {
    raw: [Option<RawHandler<R>>; 5],
    path: [Option<PathHandler<R>>; 5],
}

impl<R: Registry> Default for Handlers<R> {
    fn default() -> Self {
        Self {
            raw: [const { None }; 5],
            path: [const { None }; 5],
        }
    }
}

impl<R: Registry> fmt::Debug for Handlers<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bindings()).finish()
    }
}

impl<R: Registry> Handlers<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the raw handler for `kind`, replacing any previous one.
    pub fn on(
        mut self,
        kind: EventKind,
        f: impl FnMut(&mut DeviceIterator<'_, R>) + 'static,
    ) -> Self {
        self.raw[kind.index()] = Some(Box::new(f));
        self
    }

    /// Sets the path handler for `kind`, replacing any previous one.
    pub fn on_path(
        mut self,
        kind: EventKind,
        f: impl FnMut(&mut PathIterator<'_, R>) + 'static,
    ) -> Self {
        self.path[kind.index()] = Some(Box::new(f));
        self
    }

    pub fn on_publish(self, f: impl FnMut(&mut DeviceIterator<'_, R>) + 'static) -> Self {
        self.on(EventKind::Publish, f)
    }

    pub fn on_first_publish(self, f: impl FnMut(&mut DeviceIterator<'_, R>) + 'static) -> Self {
        self.on(EventKind::FirstPublish, f)
    }

    pub fn on_match(self, f: impl FnMut(&mut DeviceIterator<'_, R>) + 'static) -> Self {
        self.on(EventKind::Matched, f)
    }

    pub fn on_first_match(self, f: impl FnMut(&mut DeviceIterator<'_, R>) + 'static) -> Self {
        self.on(EventKind::FirstMatch, f)
    }

    pub fn on_terminate(self, f: impl FnMut(&mut DeviceIterator<'_, R>) + 'static) -> Self {
        self.on(EventKind::Terminated, f)
    }

    pub fn on_path_publish(self, f: impl FnMut(&mut PathIterator<'_, R>) + 'static) -> Self {
        self.on_path(EventKind::Publish, f)
    }

    pub fn on_path_first_publish(self, f: impl FnMut(&mut PathIterator<'_, R>) + 'static) -> Self {
        self.on_path(EventKind::FirstPublish, f)
    }

    pub fn on_path_match(self, f: impl FnMut(&mut PathIterator<'_, R>) + 'static) -> Self {
        self.on_path(EventKind::Matched, f)
    }

    pub fn on_path_first_match(self, f: impl FnMut(&mut PathIterator<'_, R>) + 'static) -> Self {
        self.on_path(EventKind::FirstMatch, f)
    }

    pub fn on_path_terminate(self, f: impl FnMut(&mut PathIterator<'_, R>) + 'static) -> Self {
        self.on_path(EventKind::Terminated, f)
    }

    /// Returns the bindings that have a handler, in subscription order.
    pub fn bindings(&self) -> impl Iterator<Item = Binding> + '_ {
        Binding::ALL.into_iter().filter(|b| match b.flavor {
            Flavor::Raw => self.raw[b.kind.index()].is_some(),
            Flavor::Path => self.path[b.kind.index()].is_some(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bindings().next().is_none()
    }

    fn check_conflicts(&self) -> Result<(), RegistrationError> {
        for kind in EventKind::ALL {
            if self.raw[kind.index()].is_some() && self.path[kind.index()].is_some() {
                return Err(RegistrationError::ConflictingHandlers(kind));
            }
        }
        Ok(())
    }

    /// Splits the handlers into their bindings, in subscription order.
    fn into_slots(self) -> Vec<(Binding, Handler<R>)> {
        let raw = EventKind::ALL
            .into_iter()
            .zip(self.raw)
            .filter_map(|(kind, h)| {
                Some((Binding::new(kind, Flavor::Raw), Handler::Raw(h?)))
            });
        let path = EventKind::ALL
            .into_iter()
            .zip(self.path)
            .filter_map(|(kind, h)| {
                Some((Binding::new(kind, Flavor::Path), Handler::Path(h?)))
            });
        raw.chain(path).collect()
    }
}

/// Error returned by [`NotificationPort::add_matching_notifications`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// Both the raw and the path handler were set for the same [`EventKind`].
    ///
    /// Nothing was subscribed.
    ConflictingHandlers(EventKind),
    /// The registry refused the subscription for `binding`.
    ///
    /// Subscriptions made earlier in the same call remain active until the port is dropped.
    Subscription { binding: Binding, status: IoReturn },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictingHandlers(kind) => write!(
                f,
                "both a raw and a path handler were provided for {kind} notifications"
            ),
            Self::Subscription { binding, status } => {
                write!(f, "failed to subscribe `{binding}`: {status}")
            }
        }
    }
}

impl Error for RegistrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConflictingHandlers(_) => None,
            Self::Subscription { status, .. } => Some(status),
        }
    }
}

impl From<RegistrationError> for io::Error {
    fn from(err: RegistrationError) -> Self {
        let kind = match err {
            RegistrationError::ConflictingHandlers(_) => io::ErrorKind::InvalidInput,
            RegistrationError::Subscription { status, .. } => io::Error::from(status).kind(),
        };
        io::Error::new(kind, err)
    }
}

/// Per-subscription dispatch state. Its address is the callback context.
///
/// The port holds one strong reference for as long as the subscription exists. Every delivery
/// takes another one, so a handler that drops the port doesn't free the slot it runs from.
struct Slot<R: Registry> {
    registry: Rc<R>,
    binding: Binding,
    handler: RefCell<Handler<R>>,
    /// Set when the port cancels the subscription.
    closed: Cell<bool>,
}

impl<R: Registry> Slot<R> {
    /// Runs the handler on the services pending on `cursor`, then releases whatever it left.
    ///
    /// Returns the payload if the handler panicked. The cursor is drained either way.
    fn deliver(&self, cursor: RawObject) -> thread::Result<()> {
        let registry = &*self.registry;
        let res = match &mut *self.handler.borrow_mut() {
            Handler::Raw(f) => {
                let mut devices = DeviceIterator::borrowed(registry, cursor);
                panic::catch_unwind(AssertUnwindSafe(|| f(&mut devices)))
            }
            Handler::Path(f) => {
                let mut paths = PathIterator::new(DeviceIterator::borrowed(registry, cursor));
                panic::catch_unwind(AssertUnwindSafe(|| f(&mut paths)))
            }
        };

        if self.closed.get() {
            // The handler dropped the port; the cursor is gone.
            log::debug!("`{}` was cancelled from within its handler", self.binding);
            return res;
        }
        let left = DeviceIterator::borrowed(registry, cursor).drain();
        if left != 0 {
            log::trace!("`{}` left {left} device(s) unconsumed", self.binding);
        }
        res
    }
}

struct Subscription<R: Registry> {
    cursor: RawObject,
    slot: Rc<Slot<R>>,
}

/// The callback registered for every subscription.
///
/// Raw and path delivery are told apart by the slot's handler.
unsafe extern "C" fn deliver_notification<R: Registry>(refcon: *mut c_void, iterator: RawObject) {
    let ptr = refcon.cast_const().cast::<Slot<R>>();
    // Safety: `refcon` is `Rc::as_ptr` of a slot the port keeps alive until the subscription's
    // cursor is released. The registry doesn't invoke the callback after that.
    let slot = unsafe {
        Rc::increment_strong_count(ptr);
        Rc::from_raw(ptr)
    };
    if let Err(payload) = slot.deliver(iterator) {
        log::error!(
            "handler `{}` panicked: {}",
            slot.binding,
            panic_message(&*payload)
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// A channel for device notifications (`IONotificationPort`).
///
/// Subscriptions are added with [`NotificationPort::add_matching_notifications`] and stay active
/// until the port is dropped. Notifications are delivered through the port's
/// [`run_loop_source`], which has to be added to an event loop; handlers run from within that
/// loop.
///
/// Dropping the port cancels all subscriptions and destroys the channel. Notifications that were
/// not yet delivered are discarded.
///
/// [`run_loop_source`]: NotificationPort::run_loop_source
pub struct NotificationPort<R: Registry = SystemRegistry> {
    registry: Rc<R>,
    main_port: MainPort,
    channel: ManuallyDrop<R::Channel>,
    subscriptions: Vec<Subscription<R>>,
}

impl<R: Registry> fmt::Debug for NotificationPort<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationPort")
            .field("main_port", &self.main_port)
            .field("bindings", &self.bindings().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl NotificationPort {
    /// Creates a notification port on the default main port.
    ///
    /// # Errors
    ///
    /// This will fail with [`io::ErrorKind::Unsupported`] on platforms without an I/O Kit
    /// registry. Callers should degrade gracefully and go without device notifications.
    pub fn new() -> io::Result<Self> {
        Self::with_main_port(MainPort::DEFAULT)
    }

    /// Creates a notification port on a specific main port.
    pub fn with_main_port(main_port: MainPort) -> io::Result<Self> {
        Self::with_registry(SystemRegistry::default(), main_port)
    }
}

impl<R: Registry> NotificationPort<R> {
    /// Creates a notification port backed by `registry`.
    pub fn with_registry(registry: R, main_port: MainPort) -> io::Result<Self> {
        let channel = registry.create_channel(main_port)?;
        Ok(Self {
            registry: Rc::new(registry),
            main_port,
            channel: ManuallyDrop::new(channel),
            subscriptions: Vec::new(),
        })
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Subscribes every handler in `handlers` to notifications about services matching `filter`.
    ///
    /// One subscription is made per handler, in [`Binding::ALL`] order. Right after its
    /// subscription is made, each handler is invoked once with the services that already match;
    /// this also arms the subscription.
    ///
    /// Returns the cursor of every new subscription, keyed by binding. The port keeps ownership
    /// of the cursors.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ConflictingHandlers`] without subscribing anything if
    /// `handlers` has both forms of a handler for one [`EventKind`].
    ///
    /// Returns [`RegistrationError::Subscription`] if the registry refuses a subscription. The
    /// subscriptions made before the failing one are *not* undone; they stay active (and are
    /// listed by [`NotificationPort::bindings`]) until the port is dropped.
    pub fn add_matching_notifications(
        &mut self,
        filter: &MatchFilter,
        handlers: Handlers<R>,
    ) -> Result<BTreeMap<Binding, RawObject>, RegistrationError> {
        handlers.check_conflicts()?;

        let mut cursors = BTreeMap::new();
        for (binding, handler) in handlers.into_slots() {
            let slot = Rc::new(Slot {
                registry: self.registry.clone(),
                binding,
                handler: RefCell::new(handler),
                closed: Cell::new(false),
            });

            // Safety: the port keeps `slot` alive until the cursor is released (in `Drop`).
            let res = unsafe {
                self.registry.add_matching_notification(
                    &self.channel,
                    binding.kind,
                    filter,
                    deliver_notification::<R>,
                    Rc::as_ptr(&slot).cast_mut().cast(),
                )
            };
            let cursor = match res {
                Ok(cursor) => cursor,
                Err(status) => {
                    log::debug!(
                        "subscribing `{binding}` failed with {status:?}; keeping {} earlier \
                         subscription(s) from this call",
                        cursors.len(),
                    );
                    return Err(RegistrationError::Subscription { binding, status });
                }
            };
            log::debug!("subscribed `{binding}` to {filter:?} as {cursor:?}");
            self.subscriptions.push(Subscription {
                cursor,
                slot: slot.clone(),
            });

            // Deliver the services that already match. The subscription is not armed until its
            // cursor has been drained once.
            if let Err(payload) = slot.deliver(cursor) {
                panic::resume_unwind(payload);
            }

            cursors.insert(binding, cursor);
        }
        Ok(cursors)
    }

    /// Returns the bindings of all active subscriptions, in the order they were made.
    pub fn bindings(&self) -> impl Iterator<Item = Binding> + '_ {
        self.subscriptions.iter().map(|sub| sub.slot.binding)
    }

    /// Returns the source an event loop has to wait on to deliver this port's notifications.
    ///
    /// All calls return the same source.
    pub fn run_loop_source(&self) -> R::WaitSource {
        self.registry.wait_source(&self.channel)
    }

    /// Returns an iterator over the services currently matching `filter`.
    ///
    /// Unlike notification handlers' iterators, the returned iterator owns its cursor.
    pub fn matching_services(&self, filter: &MatchFilter) -> io::Result<DeviceIterator<'_, R>> {
        let cursor = self.registry.matching_services(self.main_port, filter)?;
        Ok(DeviceIterator::owned(&*self.registry, cursor))
    }
}

impl<R: Registry> Drop for NotificationPort<R> {
    fn drop(&mut self) {
        for sub in &self.subscriptions {
            sub.slot.closed.set(true);
            self.registry.release(sub.cursor);
        }
        // Safety: the channel is not touched again.
        let channel = unsafe { ManuallyDrop::take(&mut self.channel) };
        self.registry.destroy_channel(channel);

        // A slot whose handler is running right now is freed once the handler returns.
        self.subscriptions.clear();
    }
}
