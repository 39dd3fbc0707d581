use std::{
    ffi::{CStr, CString, c_char, c_void},
    io,
    ptr::NonNull,
};

use core_foundation_sys::{
    base::{Boolean, CFGetTypeID, CFIndex, CFRelease, CFTypeRef, kCFAllocatorDefault},
    dictionary::{
        CFDictionaryCreateMutable, CFDictionarySetValue, CFMutableDictionaryRef,
        kCFTypeDictionaryKeyCallBacks, kCFTypeDictionaryValueCallBacks,
    },
    number::{CFNumberCreate, CFNumberGetTypeID, CFNumberGetValue, CFNumberRef, kCFNumberSInt64Type},
    runloop::{
        CFRunLoopAddSource, CFRunLoopGetCurrent, CFRunLoopRun, CFRunLoopSourceRef,
        kCFRunLoopDefaultMode,
    },
    string::{
        CFStringCreateWithBytes, CFStringGetCString, CFStringGetLength,
        CFStringGetMaximumSizeForEncoding, CFStringGetTypeID, CFStringRef, kCFStringEncodingUTF8,
    },
};

use super::{MainPort, NotificationCallback, RawObject, Registry};
use crate::{
    EventKind, IoReturn, SearchOptions,
    filter::{MatchFilter, Value},
    raw::iokit::{
        IOIteratorNext, IONotificationPort, IONotificationPortCreate, IONotificationPortDestroy,
        IONotificationPortGetRunLoopSource, IOObjectRelease, IORegistryEntrySearchCFProperty,
        IOServiceAddMatchingNotification, IOServiceGetMatchingServices,
    },
};

/// The I/O Kit registry of the running system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRegistry {
    _p: (),
}

/// An `IONotificationPortRef`.
#[derive(Debug)]
pub struct Channel(NonNull<IONotificationPort>);

/// A `CFRunLoopSourceRef` that signals pending notifications.
///
/// The source is owned by its [`NotificationPort`][crate::NotificationPort] and is only valid
/// while the port is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLoopSource(CFRunLoopSourceRef);

impl RunLoopSource {
    #[inline]
    pub fn as_raw(&self) -> CFRunLoopSourceRef {
        self.0
    }

    /// Adds the source to the current thread's run loop in the default mode.
    ///
    /// Adding a source that is already present has no effect.
    pub fn add_to_current_run_loop(&self) {
        unsafe { CFRunLoopAddSource(CFRunLoopGetCurrent(), self.0, kCFRunLoopDefaultMode) }
    }
}

/// Runs the current thread's run loop. Notifications are dispatched from within this call.
pub fn run_current_run_loop() {
    unsafe { CFRunLoopRun() }
}

const fn notification_type(kind: EventKind) -> &'static CStr {
    match kind {
        EventKind::Publish => c"IOServicePublish",
        EventKind::FirstPublish => c"IOServiceFirstPublish",
        EventKind::Matched => c"IOServiceMatched",
        EventKind::FirstMatch => c"IOServiceFirstMatch",
        EventKind::Terminated => c"IOServiceTerminate",
    }
}

/// An owned CoreFoundation object.
struct CfOwned(CFTypeRef);

impl CfOwned {
    fn new(obj: CFTypeRef) -> Option<Self> {
        if obj.is_null() { None } else { Some(Self(obj)) }
    }

    fn into_raw(self) -> CFTypeRef {
        let obj = self.0;
        std::mem::forget(self);
        obj
    }
}

impl Drop for CfOwned {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0) }
    }
}

fn cf_string(s: &str) -> Option<CfOwned> {
    let obj = unsafe {
        CFStringCreateWithBytes(
            kCFAllocatorDefault,
            s.as_ptr(),
            s.len() as CFIndex,
            kCFStringEncodingUTF8,
            false as Boolean,
        )
    };
    CfOwned::new(obj.cast())
}

fn cf_value(value: &Value) -> Option<CfOwned> {
    match value {
        Value::String(s) => cf_string(s),
        Value::Integer(i) => {
            let obj = unsafe {
                CFNumberCreate(
                    kCFAllocatorDefault,
                    kCFNumberSInt64Type,
                    (i as *const i64).cast(),
                )
            };
            CfOwned::new(obj.cast())
        }
    }
}

/// Converts a filter into a matching dictionary.
fn matching_dictionary(filter: &MatchFilter) -> Result<CfOwned, IoReturn> {
    let dict: CFMutableDictionaryRef = unsafe {
        CFDictionaryCreateMutable(
            kCFAllocatorDefault,
            0,
            &kCFTypeDictionaryKeyCallBacks,
            &kCFTypeDictionaryValueCallBacks,
        )
    };
    let dict = CfOwned::new(dict.cast_const().cast()).ok_or(IoReturn::NO_MEMORY)?;
    for (key, value) in filter.iter() {
        let key = cf_string(key).ok_or(IoReturn::BAD_ARGUMENT)?;
        let value = cf_value(value).ok_or(IoReturn::BAD_ARGUMENT)?;
        // The dictionary retains both; our references are dropped afterwards.
        unsafe { CFDictionarySetValue(dict.0.cast_mut().cast(), key.0, value.0) };
    }
    Ok(dict)
}

fn string_from_cf(s: CFStringRef) -> Option<String> {
    unsafe {
        let len = CFStringGetLength(s);
        let cap = CFStringGetMaximumSizeForEncoding(len, kCFStringEncodingUTF8) + 1;
        let mut buf = vec![0u8; usize::try_from(cap).ok()?];
        CFStringGetCString(
            s,
            buf.as_mut_ptr().cast::<c_char>(),
            cap,
            kCFStringEncodingUTF8,
        );
        let out = CStr::from_bytes_until_nul(&buf).ok()?.to_str().ok()?;
        // A failed conversion leaves the buffer zeroed.
        if out.is_empty() && len > 0 {
            return None;
        }
        Some(out.to_owned())
    }
}

fn value_from_cf(obj: &CfOwned) -> Option<Value> {
    unsafe {
        let ty = CFGetTypeID(obj.0);
        if ty == CFStringGetTypeID() {
            string_from_cf(obj.0.cast()).map(Value::String)
        } else if ty == CFNumberGetTypeID() {
            // Lossy conversions (from floating-point numbers) still store a value.
            let mut out = 0i64;
            CFNumberGetValue(
                obj.0 as CFNumberRef,
                kCFNumberSInt64Type,
                (&raw mut out).cast::<c_void>(),
            );
            Some(Value::Integer(out))
        } else {
            log::trace!("ignoring property of unsupported CF type {ty}");
            None
        }
    }
}

unsafe impl Registry for SystemRegistry {
    type Channel = Channel;
    type WaitSource = RunLoopSource;

    fn create_channel(&self, main_port: MainPort) -> io::Result<Self::Channel> {
        let port = unsafe { IONotificationPortCreate(main_port.raw()) };
        match NonNull::new(port) {
            Some(port) => {
                log::debug!("created notification port {port:p}");
                Ok(Channel(port))
            }
            None => Err(io::Error::other("IONotificationPortCreate failed")),
        }
    }

    fn destroy_channel(&self, channel: Self::Channel) {
        log::debug!("destroying notification port {:p}", channel.0);
        unsafe { IONotificationPortDestroy(channel.0.as_ptr()) }
    }

    fn wait_source(&self, channel: &Self::Channel) -> Self::WaitSource {
        // The source is owned by the notification port ("get" rule), and is the same object on
        // every call.
        let source = unsafe { IONotificationPortGetRunLoopSource(channel.0.as_ptr()) };
        RunLoopSource(source)
    }

    unsafe fn add_matching_notification(
        &self,
        channel: &Self::Channel,
        kind: EventKind,
        filter: &MatchFilter,
        callback: NotificationCallback,
        context: *mut c_void,
    ) -> Result<RawObject, IoReturn> {
        let matching = matching_dictionary(filter)?;
        let mut iterator = RawObject::NULL;
        let ret = unsafe {
            IOServiceAddMatchingNotification(
                channel.0.as_ptr(),
                notification_type(kind).as_ptr(),
                matching.into_raw().cast(),
                callback,
                context,
                &mut iterator,
            )
        };
        IoReturn::from_raw(ret).check()?;
        Ok(iterator)
    }

    fn matching_services(
        &self,
        main_port: MainPort,
        filter: &MatchFilter,
    ) -> Result<RawObject, IoReturn> {
        let matching = matching_dictionary(filter)?;
        let mut iterator = RawObject::NULL;
        let ret = unsafe {
            IOServiceGetMatchingServices(main_port.raw(), matching.into_raw().cast(), &mut iterator)
        };
        IoReturn::from_raw(ret).check()?;
        Ok(iterator)
    }

    fn iterator_next(&self, iterator: RawObject) -> Option<RawObject> {
        let obj = unsafe { IOIteratorNext(iterator) };
        if obj.is_null() { None } else { Some(obj) }
    }

    fn release(&self, object: RawObject) {
        let ret = IoReturn::from_raw(unsafe { IOObjectRelease(object) });
        if let Err(e) = ret.check() {
            log::error!("failed to release {object:?}: {e}");
        }
    }

    fn search_property(
        &self,
        entry: RawObject,
        plane: &str,
        key: &str,
        options: SearchOptions,
    ) -> Option<Value> {
        let plane = CString::new(plane).ok()?;
        let key = cf_string(key)?;
        let prop = unsafe {
            IORegistryEntrySearchCFProperty(
                entry,
                plane.as_ptr(),
                key.0.cast(),
                kCFAllocatorDefault,
                options.raw(),
            )
        };
        value_from_cf(&CfOwned::new(prop)?)
    }
}

// `RawObject` is passed to and from I/O Kit in place of `io_object_t`.
const _: () = assert!(size_of::<RawObject>() == size_of::<libc::mach_port_t>());
