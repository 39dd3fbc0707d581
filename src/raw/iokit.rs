//! `IOKit/IOKitLib.h`

#![allow(non_camel_case_types, non_upper_case_globals)]

use std::ffi::{c_char, c_int, c_uint, c_void};

use core_foundation_sys::{
    base::{CFAllocatorRef, CFTypeRef},
    dictionary::CFDictionaryRef,
    runloop::CFRunLoopSourceRef,
    string::CFStringRef,
};
use libc::mach_port_t;

use crate::registry::{NotificationCallback, RawObject};

pub type kern_return_t = c_int;
pub type IOOptionBits = c_uint;

/// `io_object_t`, `io_iterator_t` and `io_registry_entry_t` are all `mach_port_t`s.
pub type io_object_t = RawObject;

#[repr(C)]
pub struct IONotificationPort {
    _p: [u8; 0],
}
pub type IONotificationPortRef = *mut IONotificationPort;

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    pub fn IONotificationPortCreate(main_port: mach_port_t) -> IONotificationPortRef;
    pub fn IONotificationPortDestroy(notify: IONotificationPortRef);
    pub fn IONotificationPortGetRunLoopSource(notify: IONotificationPortRef) -> CFRunLoopSourceRef;

    /// Consumes one reference of `matching`.
    pub fn IOServiceAddMatchingNotification(
        notify_port: IONotificationPortRef,
        notification_type: *const c_char,
        matching: CFDictionaryRef,
        callback: NotificationCallback,
        refcon: *mut c_void,
        notification: *mut io_object_t,
    ) -> kern_return_t;

    /// Consumes one reference of `matching`.
    pub fn IOServiceGetMatchingServices(
        main_port: mach_port_t,
        matching: CFDictionaryRef,
        existing: *mut io_object_t,
    ) -> kern_return_t;

    pub fn IOIteratorNext(iterator: io_object_t) -> io_object_t;
    pub fn IOObjectRelease(object: io_object_t) -> kern_return_t;

    /// Follows the "create" rule: the caller owns the returned object.
    pub fn IORegistryEntrySearchCFProperty(
        entry: io_object_t,
        plane: *const c_char,
        key: CFStringRef,
        allocator: CFAllocatorRef,
        options: IOOptionBits,
    ) -> CFTypeRef;
}
