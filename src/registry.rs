//! The interface to the device registry.
//!
//! [`Registry`] is everything this crate needs from the operating system: notification channels,
//! matching subscriptions, object iteration and property lookup. [`SystemRegistry`] implements it
//! on top of I/O Kit on macOS. On other platforms it exists too, but every attempt to create a
//! channel or look up services fails with [`io::ErrorKind::Unsupported`], so callers can degrade
//! gracefully.

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::{Channel, RunLoopSource, SystemRegistry, run_current_run_loop};

mod fallback;
#[cfg(not(target_os = "macos"))]
pub use fallback::{SystemRegistry, Unsupported};

use std::{
    ffi::{c_uint, c_void},
    fmt, io,
};

use crate::{EventKind, IoReturn, SearchOptions, filter::MatchFilter, filter::Value};

/// A raw registry object handle (`io_object_t`).
///
/// Depending on where it came from, this is either a device (a registry entry) or an iteration
/// cursor over devices. This type does not manage the object's reference count; the owning
/// wrappers ([`Service`][crate::Service], [`DeviceIterator`][crate::DeviceIterator],
/// [`NotificationPort`][crate::NotificationPort]) do.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RawObject(c_uint);

impl RawObject {
    /// The null object (`IO_OBJECT_NULL`). Never refers to a valid object.
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: c_uint) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> c_uint {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawObject({:#x})", self.0)
    }
}

/// The port through which the registry is reached (`mach_port_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MainPort(c_uint);

impl MainPort {
    /// The default main port (`kIOMainPortDefault`).
    pub const DEFAULT: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: c_uint) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> c_uint {
        self.0
    }
}

impl Default for MainPort {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Signature of the function a [`Registry`] invokes when a subscription fires
/// (`IOServiceMatchingCallback`).
///
/// `refcon` is the context pointer passed to [`Registry::add_matching_notification`], `iterator`
/// is the subscription's cursor. The callee borrows the cursor; it must not release it.
pub type NotificationCallback = unsafe extern "C" fn(refcon: *mut c_void, iterator: RawObject);

/// Access to a device registry.
///
/// # Safety
///
/// Implementations must only ever invoke a [`NotificationCallback`] with the exact `context`
/// pointer it was registered with, on the thread that pumps the channel's wait source, never
/// concurrently with another callback for the same channel, and never after the subscription
/// cursor was released or the channel was destroyed.
pub unsafe trait Registry: 'static {
    /// A notification channel (`IONotificationPortRef`).
    type Channel;

    /// The object an event loop waits on to learn that a channel has pending deliveries.
    ///
    /// Equal values refer to the same source.
    type WaitSource: Clone + PartialEq + fmt::Debug;

    /// Creates a notification channel.
    fn create_channel(&self, main_port: MainPort) -> io::Result<Self::Channel>;

    /// Destroys a notification channel. Undelivered notifications are discarded.
    fn destroy_channel(&self, channel: Self::Channel);

    /// Returns the wait source of `channel`. Repeated calls return the same source.
    fn wait_source(&self, channel: &Self::Channel) -> Self::WaitSource;

    /// Subscribes to `kind` events for services matching `filter`.
    ///
    /// Returns the subscription's cursor, which stays valid until it is [released]. Releasing it
    /// cancels the subscription.
    ///
    /// # Safety
    ///
    /// `context` must remain valid for `callback` until the returned cursor is released or
    /// `channel` is destroyed, whichever comes first.
    ///
    /// [released]: Registry::release
    unsafe fn add_matching_notification(
        &self,
        channel: &Self::Channel,
        kind: EventKind,
        filter: &MatchFilter,
        callback: NotificationCallback,
        context: *mut c_void,
    ) -> Result<RawObject, IoReturn>;

    /// Returns a cursor over the services currently matching `filter`.
    ///
    /// The caller owns the returned cursor.
    fn matching_services(
        &self,
        main_port: MainPort,
        filter: &MatchFilter,
    ) -> Result<RawObject, IoReturn>;

    /// Advances `iterator`, returning an owned reference to the next object, or [`None`] once
    /// the cursor has no more objects.
    fn iterator_next(&self, iterator: RawObject) -> Option<RawObject>;

    /// Releases one reference to `object`.
    fn release(&self, object: RawObject);

    /// Looks up the property `key` of `entry` in `plane`.
    ///
    /// Returns [`None`] if the property is absent, is not a string or integer, or `entry` is
    /// invalid.
    fn search_property(
        &self,
        entry: RawObject,
        plane: &str,
        key: &str,
        options: SearchOptions,
    ) -> Option<Value>;
}
