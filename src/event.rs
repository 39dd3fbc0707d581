//! Notification kinds and handler bindings.

use std::{error::Error, fmt, io, str::FromStr};

/// The lifecycle events a matching notification can be requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// A matching service was registered (`IOServicePublish`).
    Publish,
    /// Like [`EventKind::Publish`], but delivered for at most one registration of each service
    /// (`IOServiceFirstPublish`).
    FirstPublish,
    /// A matching service was matched by a driver (`IOServiceMatched`).
    Matched,
    /// Like [`EventKind::Matched`], but delivered once per service (`IOServiceFirstMatch`).
    FirstMatch,
    /// A matching service is being terminated (`IOServiceTerminate`).
    Terminated,
}

impl EventKind {
    /// All event kinds, in the order subscriptions are issued.
    pub const ALL: [EventKind; 5] = [
        EventKind::Publish,
        EventKind::FirstPublish,
        EventKind::Matched,
        EventKind::FirstMatch,
        EventKind::Terminated,
    ];

    /// Returns the notification type string understood by the registry.
    pub const fn notification_type(self) -> &'static str {
        match self {
            EventKind::Publish => "IOServicePublish",
            EventKind::FirstPublish => "IOServiceFirstPublish",
            EventKind::Matched => "IOServiceMatched",
            EventKind::FirstMatch => "IOServiceFirstMatch",
            EventKind::Terminated => "IOServiceTerminate",
        }
    }

    pub fn from_notification_type(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.notification_type() == name)
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notification_type())
    }
}

/// Error returned by [`FromStr`] implementations when the name is not recognized.
#[derive(Debug, PartialEq, Eq)]
pub struct UnknownName {
    _p: (),
}

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown notification or handler name")
    }
}
impl Error for UnknownName {}
impl From<UnknownName> for io::Error {
    fn from(value: UnknownName) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}

impl FromStr for EventKind {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_notification_type(s).ok_or(UnknownName { _p: () })
    }
}

/// The shape in which a handler receives the devices of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flavor {
    /// The handler receives a [`DeviceIterator`][crate::DeviceIterator].
    Raw,
    /// The handler receives a [`PathIterator`][crate::PathIterator].
    Path,
}

/// A handler slot: one [`EventKind`] in one [`Flavor`].
///
/// Each binding has a conventional name (`on_match`, `on_path_terminate`, ...) that is used as
/// the key of the subscription map returned by
/// [`NotificationPort::add_matching_notifications`][crate::NotificationPort::add_matching_notifications].
///
/// Bindings are ordered like [`Binding::ALL`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binding {
    pub flavor: Flavor,
    pub kind: EventKind,
}

impl Binding {
    /// All bindings, in the order subscriptions are issued: raw handlers first, then path
    /// handlers, each in [`EventKind::ALL`] order.
    pub const ALL: [Binding; 10] = [
        Binding::new(EventKind::Publish, Flavor::Raw),
        Binding::new(EventKind::FirstPublish, Flavor::Raw),
        Binding::new(EventKind::Matched, Flavor::Raw),
        Binding::new(EventKind::FirstMatch, Flavor::Raw),
        Binding::new(EventKind::Terminated, Flavor::Raw),
        Binding::new(EventKind::Publish, Flavor::Path),
        Binding::new(EventKind::FirstPublish, Flavor::Path),
        Binding::new(EventKind::Matched, Flavor::Path),
        Binding::new(EventKind::FirstMatch, Flavor::Path),
        Binding::new(EventKind::Terminated, Flavor::Path),
    ];

    #[inline]
    pub const fn new(kind: EventKind, flavor: Flavor) -> Self {
        Self { kind, flavor }
    }

    /// Returns the conventional handler name of this binding.
    pub const fn name(self) -> &'static str {
        match (self.flavor, self.kind) {
            (Flavor::Raw, EventKind::Publish) => "on_publish",
            (Flavor::Raw, EventKind::FirstPublish) => "on_first_publish",
            (Flavor::Raw, EventKind::Matched) => "on_match",
            (Flavor::Raw, EventKind::FirstMatch) => "on_first_match",
            (Flavor::Raw, EventKind::Terminated) => "on_terminate",
            (Flavor::Path, EventKind::Publish) => "on_path_publish",
            (Flavor::Path, EventKind::FirstPublish) => "on_path_first_publish",
            (Flavor::Path, EventKind::Matched) => "on_path_match",
            (Flavor::Path, EventKind::FirstMatch) => "on_path_first_match",
            (Flavor::Path, EventKind::Terminated) => "on_path_terminate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Binding {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or(UnknownName { _p: () })
    }
}
