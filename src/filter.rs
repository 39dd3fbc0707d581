//! Matching filters.
//!
//! A [`MatchFilter`] describes a class of devices in the I/O Registry. It always carries a
//! provider class (the [`PROVIDER_CLASS_KEY`] entry), and may be narrowed further by adding more
//! properties, such as [`USB_VENDOR_ID_KEY`] and [`USB_PRODUCT_ID_KEY`].
//!
//! Filters are plain data. Keys and values are not validated here: the registry decides whether
//! a filter makes sense when it is used for a subscription, and reports an
//! [`IoReturn`][crate::IoReturn] otherwise.

use std::{collections::BTreeMap, fmt};

/// Filter key naming the provider class of matching services.
pub const PROVIDER_CLASS_KEY: &str = "IOProviderClass";
/// Filter key for the USB vendor ID.
pub const USB_VENDOR_ID_KEY: &str = "idVendor";
/// Filter key for the USB product ID.
pub const USB_PRODUCT_ID_KEY: &str = "idProduct";

/// Provider class of USB devices.
pub const USB_DEVICE_CLASS: &str = "IOUSBDevice";
/// Provider class of USB interfaces.
pub const USB_INTERFACE_CLASS: &str = "IOUSBInterface";

/// A scalar filter or property value.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    String(String),
    Integer(i64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::String(_) => None,
            Value::Integer(i) => Some(*i),
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::String(s) => Some(s),
            Value::Integer(_) => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => fmt::Debug::fmt(s, f),
            Value::Integer(i) => write!(f, "{i:#x}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

macro_rules! value_from_int {
    ( $($t:ty),* ) => {
        $(
            impl From<$t> for Value {
                #[inline]
                fn from(i: $t) -> Self {
                    Value::Integer(i.into())
                }
            }
        )*
    };
}

value_from_int!(u8, u16, u32, i8, i16, i32, i64);

/// Describes a class of devices to match against.
///
/// A filter always contains a [`PROVIDER_CLASS_KEY`] entry. Entries are kept in key order and
/// each key appears at most once; [`MatchFilter::set`] overwrites existing entries.
///
/// # Examples
///
/// ```
/// use iokit_notify::filter::MatchFilter;
///
/// let filter = MatchFilter::usb_device()
///     .vendor_id(0x0451)
///     .product_id(0xf432);
/// assert_eq!(filter.provider_class(), Some("IOUSBDevice"));
/// assert_eq!(filter.get("idVendor").and_then(|v| v.as_integer()), Some(0x0451));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct MatchFilter {
    entries: BTreeMap<String, Value>,
}

impl MatchFilter {
    /// Creates a filter matching all services of the given provider class.
    pub fn new(provider_class: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            PROVIDER_CLASS_KEY.to_owned(),
            Value::String(provider_class.into()),
        );
        Self { entries }
    }

    /// Creates a filter matching all USB devices.
    pub fn usb_device() -> Self {
        Self::new(USB_DEVICE_CLASS)
    }

    /// Creates a filter matching all USB interfaces.
    pub fn usb_interface() -> Self {
        Self::new(USB_INTERFACE_CLASS)
    }

    /// Inserts or overwrites an entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Builder-style variant of [`MatchFilter::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Restricts the filter to devices with the given USB vendor ID.
    pub fn vendor_id(self, vendor: u16) -> Self {
        self.with(USB_VENDOR_ID_KEY, vendor)
    }

    /// Restricts the filter to devices with the given USB product ID.
    pub fn product_id(self, product: u16) -> Self {
        self.with(USB_PRODUCT_ID_KEY, product)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the provider class, if it is a string.
    pub fn provider_class(&self) -> Option<&str> {
        self.get(PROVIDER_CLASS_KEY).and_then(Value::as_str)
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; a filter contains at least the provider class.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(feature = "serde")]
    pub(crate) fn from_entries(entries: BTreeMap<String, Value>) -> Option<Self> {
        if entries.contains_key(PROVIDER_CLASS_KEY) {
            Some(Self { entries })
        } else {
            None
        }
    }
}

impl fmt::Debug for MatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
