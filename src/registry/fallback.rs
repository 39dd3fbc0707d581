use std::{ffi::c_void, io};

use super::{MainPort, NotificationCallback, RawObject, Registry};
use crate::{EventKind, IoReturn, SearchOptions, filter::MatchFilter, filter::Value};

/// Stand-in for a channel or wait source on platforms without a device registry.
///
/// This type cannot be constructed.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsupported {}

/// The platform's device registry.
///
/// This platform has none: creating a channel fails with [`io::ErrorKind::Unsupported`], and so
/// does looking up matching services.
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRegistry {
    _p: (),
}

unsafe impl Registry for SystemRegistry {
    type Channel = Unsupported;
    type WaitSource = Unsupported;

    fn create_channel(&self, _main_port: MainPort) -> io::Result<Self::Channel> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn destroy_channel(&self, channel: Self::Channel) {
        match channel {}
    }

    fn wait_source(&self, channel: &Self::Channel) -> Self::WaitSource {
        match *channel {}
    }

    unsafe fn add_matching_notification(
        &self,
        channel: &Self::Channel,
        _kind: EventKind,
        _filter: &MatchFilter,
        _callback: NotificationCallback,
        _context: *mut c_void,
    ) -> Result<RawObject, IoReturn> {
        match *channel {}
    }

    fn matching_services(
        &self,
        _main_port: MainPort,
        _filter: &MatchFilter,
    ) -> Result<RawObject, IoReturn> {
        Err(IoReturn::UNSUPPORTED)
    }

    // No cursor or service can be obtained on this platform, so these only ever see foreign
    // handles.

    fn iterator_next(&self, _iterator: RawObject) -> Option<RawObject> {
        None
    }

    fn release(&self, _object: RawObject) {}

    fn search_property(
        &self,
        _entry: RawObject,
        _plane: &str,
        _key: &str,
        _options: SearchOptions,
    ) -> Option<Value> {
        None
    }
}
