//! Devices and device iterators.
//!
//! A [`DeviceIterator`] walks a registry cursor and yields [`Service`]s, each of which owns one
//! reference to a device object in the registry. A [`PathIterator`] sits on top and resolves every
//! service to its callout device path (like `/dev/cu.usbserial-1410`), skipping services that
//! don't have one.

use std::{fmt, iter::FusedIterator, mem, ops::BitOr};

use crate::{
    SystemRegistry,
    filter::Value,
    registry::{RawObject, Registry},
};

/// The registry plane in which device paths are looked up.
pub const SERVICE_PLANE: &str = "IOService";
/// Property holding the path of a device's callout (`/dev/cu.*`) node.
pub const CALLOUT_DEVICE_KEY: &str = "IOCalloutDevice";
/// Property holding a device's BSD name (like `disk2` or `en0`).
pub const BSD_NAME_KEY: &str = "BSD Name";

/// Options controlling a property search (`IOOptionBits`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SearchOptions(u32);

impl SearchOptions {
    /// Only look at the entry itself.
    pub const NONE: Self = Self(0);
    /// Also search the entry's children, recursively (`kIORegistryIterateRecursively`).
    pub const RECURSIVE: Self = Self(0x1);
    /// Search towards the root instead of towards the leaves (`kIORegistryIterateParents`).
    pub const PARENTS: Self = Self(0x2);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SearchOptions {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for SearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        if self.contains(Self::RECURSIVE) {
            list.entry(&format_args!("RECURSIVE"));
        }
        if self.contains(Self::PARENTS) {
            list.entry(&format_args!("PARENTS"));
        }
        let unknown = self.0 & !(Self::RECURSIVE.0 | Self::PARENTS.0);
        if unknown != 0 {
            list.entry(&format_args!("{unknown:#x}"));
        }
        list.finish()
    }
}

/// A device object in the registry.
///
/// Owns one reference to the object, which is released when the [`Service`] is dropped.
pub struct Service<'r, R: Registry = SystemRegistry> {
    registry: &'r R,
    raw: RawObject,
}

impl<R: Registry> fmt::Debug for Service<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Service").field(&self.raw).finish()
    }
}

impl<'r, R: Registry> Service<'r, R> {
    /// Takes ownership of one reference to `raw`.
    pub(crate) fn from_owned(registry: &'r R, raw: RawObject) -> Self {
        Self { registry, raw }
    }

    #[inline]
    pub fn raw(&self) -> RawObject {
        self.raw
    }

    /// Returns the underlying object without releasing it.
    ///
    /// The caller becomes responsible for releasing the reference.
    pub fn into_raw(self) -> RawObject {
        let raw = self.raw;
        mem::forget(self);
        raw
    }

    /// Looks up a property of this service (or, depending on `options`, of its children or
    /// parents).
    pub fn search_property(&self, plane: &str, key: &str, options: SearchOptions) -> Option<Value> {
        self.registry.search_property(self.raw, plane, key, options)
    }

    /// Returns the path of the callout device node belonging to this service.
    ///
    /// See [`resolve_path`].
    pub fn path(&self) -> Option<String> {
        resolve_path(self)
    }
}

impl<R: Registry> Drop for Service<'_, R> {
    fn drop(&mut self) {
        self.registry.release(self.raw);
    }
}

/// Resolves a service to the path of its callout device node.
///
/// Searches the [`SERVICE_PLANE`] for the [`CALLOUT_DEVICE_KEY`] property, starting at `service`
/// and recursing into its children. For a USB serial adapter, the property lives on a
/// `IOSerialBSDClient` several levels below the USB device.
///
/// Returns [`None`] if no such property exists or if it isn't a string.
pub fn resolve_path<R: Registry>(service: &Service<'_, R>) -> Option<String> {
    service
        .search_property(SERVICE_PLANE, CALLOUT_DEVICE_KEY, SearchOptions::RECURSIVE)?
        .into_string()
}

/// A forward-only, single-pass iterator over the devices behind a registry cursor.
///
/// Once [`Iterator::next`] has returned [`None`], it will keep doing so without consulting the
/// registry again.
///
/// Iterators returned by [`NotificationPort::matching_services`] own their cursor and release it
/// when dropped. Iterators handed to notification handlers borrow the subscription's cursor,
/// which stays alive as long as the [`NotificationPort`] does.
///
/// [`NotificationPort`]: crate::NotificationPort
/// [`NotificationPort::matching_services`]: crate::NotificationPort::matching_services
pub struct DeviceIterator<'r, R: Registry = SystemRegistry> {
    registry: &'r R,
    cursor: RawObject,
    owned: bool,
    exhausted: bool,
}

impl<R: Registry> fmt::Debug for DeviceIterator<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIterator")
            .field("cursor", &self.cursor)
            .field("owned", &self.owned)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl<'r, R: Registry> DeviceIterator<'r, R> {
    /// Wraps a cursor this iterator takes ownership of.
    pub(crate) fn owned(registry: &'r R, cursor: RawObject) -> Self {
        Self {
            registry,
            cursor,
            owned: true,
            exhausted: false,
        }
    }

    /// Wraps a cursor that is owned elsewhere (a subscription's cursor).
    pub(crate) fn borrowed(registry: &'r R, cursor: RawObject) -> Self {
        Self {
            registry,
            cursor,
            owned: false,
            exhausted: false,
        }
    }

    /// Returns the registry cursor this iterator advances.
    #[inline]
    pub fn cursor(&self) -> RawObject {
        self.cursor
    }

    /// Returns `true` if the iterator has signaled exhaustion.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Turns this iterator into one over device paths.
    pub fn into_paths(self) -> PathIterator<'r, R> {
        PathIterator::new(self)
    }

    /// Releases the cursor now instead of when the iterator is dropped.
    pub fn release(self) {
        drop(self);
    }

    /// Consumes and releases all remaining devices, returning how many there were.
    pub(crate) fn drain(&mut self) -> usize {
        self.by_ref().count()
    }
}

impl<'r, R: Registry> Iterator for DeviceIterator<'r, R> {
    type Item = Service<'r, R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.registry.iterator_next(self.cursor) {
            Some(raw) => {
                log::trace!("{:?} yielded {raw:?}", self.cursor);
                Some(Service::from_owned(self.registry, raw))
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

impl<R: Registry> FusedIterator for DeviceIterator<'_, R> {}

impl<R: Registry> Drop for DeviceIterator<'_, R> {
    fn drop(&mut self) {
        if self.owned {
            log::trace!("releasing cursor {:?}", self.cursor);
            self.registry.release(self.cursor);
        }
    }
}

/// An iterator over the device paths of a [`DeviceIterator`]'s services.
///
/// Services are resolved lazily, as the iterator is advanced, using [`resolve_path`]. Services
/// without a path are skipped. The iterator is exhausted exactly when the underlying
/// [`DeviceIterator`] is.
pub struct PathIterator<'r, R: Registry = SystemRegistry> {
    devices: DeviceIterator<'r, R>,
}

impl<R: Registry> fmt::Debug for PathIterator<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathIterator")
            .field("devices", &self.devices)
            .finish()
    }
}

impl<'r, R: Registry> PathIterator<'r, R> {
    pub fn new(devices: DeviceIterator<'r, R>) -> Self {
        Self { devices }
    }

    pub fn into_inner(self) -> DeviceIterator<'r, R> {
        self.devices
    }

    pub(crate) fn devices_mut(&mut self) -> &mut DeviceIterator<'r, R> {
        &mut self.devices
    }
}

impl<R: Registry> Iterator for PathIterator<'_, R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let service = self.devices.next()?;
            match service.path() {
                Some(path) => return Some(path),
                None => log::trace!("skipping {:?}: no {CALLOUT_DEVICE_KEY}", service.raw()),
            }
        }
    }
}

impl<R: Registry> FusedIterator for PathIterator<'_, R> {}
