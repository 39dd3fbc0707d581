//! An in-memory [`Registry`] for tests.
//!
//! [`FakeRegistry`] hands out cursors and service objects, counts releases, and queues
//! notifications until a [`FakeLoop`] pumps them. Deliveries go through the real notification
//! callbacks, with the context pointer they were registered with.

use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    ffi::c_void,
    io,
    rc::Rc,
};

use crate::{
    EventKind, IoReturn, SearchOptions,
    device::{CALLOUT_DEVICE_KEY, SERVICE_PLANE},
    filter::{MatchFilter, Value},
    registry::{MainPort, NotificationCallback, RawObject, Registry},
};

/// A device as the fake registry knows it: a bag of properties.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    properties: BTreeMap<String, Value>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device with a callout device path.
    pub fn with_path(path: &str) -> Self {
        Self::new().with_property(CALLOUT_DEVICE_KEY, path)
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }
}

#[derive(Debug)]
pub struct FakeChannel(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeSource {
    channel: u32,
}

struct Subscription {
    channel: u32,
    kind: EventKind,
    filter: MatchFilter,
    callback: NotificationCallback,
    context: *mut c_void,
}

#[derive(Default)]
struct Cursor {
    queue: VecDeque<FakeDevice>,
    subscription: Option<Subscription>,
}

enum Object {
    Cursor(Cursor),
    Service(FakeDevice),
}

#[derive(Default)]
struct State {
    next_object: u32,
    next_channel: u32,
    objects: BTreeMap<RawObject, Object>,
    releases: BTreeMap<RawObject, usize>,
    channels: Vec<u32>,
    /// Undelivered notifications, oldest first.
    events: VecDeque<(u32, RawObject)>,
    present: Vec<FakeDevice>,
    fail: Option<(usize, IoReturn)>,
    subscribe_calls: usize,
    next_calls: usize,
    searches: Vec<(String, String, SearchOptions)>,
}

impl State {
    fn insert(&mut self, object: Object) -> RawObject {
        self.next_object += 1;
        let raw = RawObject::from_raw(0x1000 + self.next_object);
        self.objects.insert(raw, object);
        raw
    }

    fn cursor_mut(&mut self, cursor: RawObject) -> &mut Cursor {
        match self.objects.get_mut(&cursor) {
            Some(Object::Cursor(c)) => c,
            _ => panic!("{cursor:?} is not a live cursor"),
        }
    }

    fn subscriptions(&self) -> impl Iterator<Item = (RawObject, &Subscription)> {
        self.objects.iter().filter_map(|(raw, obj)| match obj {
            Object::Cursor(Cursor {
                subscription: Some(sub),
                ..
            }) => Some((*raw, sub)),
            _ => None,
        })
    }
}

/// A shared handle to an in-memory registry.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Rc<RefCell<State>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the devices that exist already. They seed every new `matching_services` cursor, and
    /// every new subscription cursor except for termination.
    pub fn set_present(&self, devices: impl IntoIterator<Item = FakeDevice>) {
        self.state.borrow_mut().present = devices.into_iter().collect();
    }

    /// Makes the `nth` (1-based) call to `add_matching_notification` fail with `status`.
    pub fn fail_subscription(&self, nth: usize, status: IoReturn) {
        self.state.borrow_mut().fail = Some((nth, status));
    }

    /// Creates a standalone cursor over `devices`.
    pub fn enumerate(&self, devices: impl IntoIterator<Item = FakeDevice>) -> RawObject {
        self.state.borrow_mut().insert(Object::Cursor(Cursor {
            queue: devices.into_iter().collect(),
            subscription: None,
        }))
    }

    /// Appends devices to a cursor without notifying anyone.
    pub fn push(&self, cursor: RawObject, devices: impl IntoIterator<Item = FakeDevice>) {
        self.state.borrow_mut().cursor_mut(cursor).queue.extend(devices);
    }

    /// Appends devices to a subscription's cursor and queues a notification for it.
    pub fn post(&self, cursor: RawObject, devices: impl IntoIterator<Item = FakeDevice>) {
        let mut state = self.state.borrow_mut();
        let c = state.cursor_mut(cursor);
        c.queue.extend(devices);
        let channel = match &c.subscription {
            Some(sub) => sub.channel,
            None => panic!("{cursor:?} is not a subscription"),
        };
        state.events.push_back((channel, cursor));
    }

    /// Takes the oldest notification queued on one of `sources`' channels and delivers it,
    /// unless its subscription was cancelled. Returns [`None`] if nothing was queued.
    fn dispatch_one(&self, sources: &[FakeSource]) -> Option<bool> {
        let (callback, context, cursor) = {
            let mut state = self.state.borrow_mut();
            let pos = state
                .events
                .iter()
                .position(|(ch, _)| sources.iter().any(|s| s.channel == *ch))?;
            let (_, cursor) = state.events.remove(pos)?;
            match state.objects.get(&cursor) {
                Some(Object::Cursor(Cursor {
                    subscription: Some(sub),
                    ..
                })) => (sub.callback, sub.context, cursor),
                // Cancelled in the meantime.
                _ => return Some(false),
            }
        };
        unsafe { callback(context, cursor) };
        Some(true)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.borrow().subscribe_calls
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.borrow().subscriptions().count()
    }

    /// Returns the cursor of the first live subscription for `kind`.
    pub fn subscription_cursor(&self, kind: EventKind) -> Option<RawObject> {
        let state = self.state.borrow();
        state
            .subscriptions()
            .find(|(_, sub)| sub.kind == kind)
            .map(|(raw, _)| raw)
    }

    pub fn subscription_kind(&self, cursor: RawObject) -> Option<EventKind> {
        let state = self.state.borrow();
        state
            .subscriptions()
            .find(|(raw, _)| *raw == cursor)
            .map(|(_, sub)| sub.kind)
    }

    pub fn subscription_filter(&self, cursor: RawObject) -> Option<MatchFilter> {
        let state = self.state.borrow();
        state
            .subscriptions()
            .find(|(raw, _)| *raw == cursor)
            .map(|(_, sub)| sub.filter.clone())
    }

    /// Number of devices waiting on a cursor.
    pub fn pending_devices(&self, cursor: RawObject) -> usize {
        self.state.borrow_mut().cursor_mut(cursor).queue.len()
    }

    pub fn next_calls(&self) -> usize {
        self.state.borrow().next_calls
    }

    pub fn searches(&self) -> Vec<(String, String, SearchOptions)> {
        self.state.borrow().searches.clone()
    }

    pub fn release_count(&self, object: RawObject) -> usize {
        self.state.borrow().releases.get(&object).copied().unwrap_or(0)
    }

    pub fn is_released(&self, object: RawObject) -> bool {
        self.release_count(object) != 0
    }

    /// Number of cursors and services that have not been released.
    pub fn live_objects(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn live_services(&self) -> usize {
        let state = self.state.borrow();
        state
            .objects
            .values()
            .filter(|obj| matches!(obj, Object::Service(_)))
            .count()
    }

    pub fn live_channels(&self) -> usize {
        self.state.borrow().channels.len()
    }
}

unsafe impl Registry for FakeRegistry {
    type Channel = FakeChannel;
    type WaitSource = FakeSource;

    fn create_channel(&self, _main_port: MainPort) -> io::Result<FakeChannel> {
        let mut state = self.state.borrow_mut();
        state.next_channel += 1;
        let id = state.next_channel;
        state.channels.push(id);
        Ok(FakeChannel(id))
    }

    fn destroy_channel(&self, channel: FakeChannel) {
        let mut state = self.state.borrow_mut();
        let before = state.channels.len();
        state.channels.retain(|ch| *ch != channel.0);
        assert_eq!(
            state.channels.len() + 1,
            before,
            "{channel:?} destroyed twice"
        );
        state.events.retain(|(ch, _)| *ch != channel.0);
    }

    fn wait_source(&self, channel: &FakeChannel) -> FakeSource {
        FakeSource { channel: channel.0 }
    }

    unsafe fn add_matching_notification(
        &self,
        channel: &FakeChannel,
        kind: EventKind,
        filter: &MatchFilter,
        callback: NotificationCallback,
        context: *mut c_void,
    ) -> Result<RawObject, IoReturn> {
        let mut state = self.state.borrow_mut();
        state.subscribe_calls += 1;
        if let Some((nth, status)) = state.fail {
            if nth == state.subscribe_calls {
                return Err(status);
            }
        }
        let queue = match kind {
            EventKind::Terminated => VecDeque::new(),
            _ => state.present.iter().cloned().collect(),
        };
        Ok(state.insert(Object::Cursor(Cursor {
            queue,
            subscription: Some(Subscription {
                channel: channel.0,
                kind,
                filter: filter.clone(),
                callback,
                context,
            }),
        })))
    }

    fn matching_services(
        &self,
        _main_port: MainPort,
        _filter: &MatchFilter,
    ) -> Result<RawObject, IoReturn> {
        let present = self.state.borrow().present.clone();
        Ok(self.enumerate(present))
    }

    fn iterator_next(&self, iterator: RawObject) -> Option<RawObject> {
        let mut state = self.state.borrow_mut();
        state.next_calls += 1;
        let device = state.cursor_mut(iterator).queue.pop_front()?;
        Some(state.insert(Object::Service(device)))
    }

    fn release(&self, object: RawObject) {
        let mut state = self.state.borrow_mut();
        *state.releases.entry(object).or_default() += 1;
        if state.objects.remove(&object).is_none() {
            panic!("{object:?} released but not alive");
        }
    }

    fn search_property(
        &self,
        entry: RawObject,
        plane: &str,
        key: &str,
        options: SearchOptions,
    ) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        state
            .searches
            .push((plane.to_owned(), key.to_owned(), options));
        if plane != SERVICE_PLANE {
            return None;
        }
        match state.objects.get(&entry)? {
            Object::Service(dev) => dev.properties.get(key).cloned(),
            Object::Cursor(_) => None,
        }
    }
}

/// A single-threaded event loop over [`FakeSource`]s.
pub struct FakeLoop {
    registry: FakeRegistry,
    sources: RefCell<Vec<FakeSource>>,
}

impl FakeLoop {
    pub fn new(registry: &FakeRegistry) -> Self {
        Self {
            registry: registry.clone(),
            sources: RefCell::new(Vec::new()),
        }
    }

    /// Adds a source. Adding the same source again has no effect.
    pub fn add_source(&self, source: &FakeSource) {
        let mut sources = self.sources.borrow_mut();
        if !sources.contains(source) {
            sources.push(*source);
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    /// Delivers queued notifications until none are left for this loop's sources, and returns
    /// how many were delivered.
    pub fn pump(&self) -> usize {
        let sources = self.sources.borrow().clone();
        let mut delivered = 0;
        while let Some(ok) = self.registry.dispatch_one(&sources) {
            delivered += usize::from(ok);
        }
        delivered
    }
}
