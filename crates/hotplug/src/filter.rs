//! Registration filters and the builder used to register them

use crate::backend::HotplugBackend;
use crate::error::{Error, Result};
use crate::registry::HotplugRegistry;
use crate::types::{AttachedDevice, EventMask, HotplugHandle};
use std::fmt;
use std::str::FromStr;

/// Raw wildcard sentinel
///
/// Lies outside both the 16-bit id range and the 8-bit class range, so no
/// numeric id can be mistaken for "any".
pub const MATCH_ANY: u32 = 0xFFFF_FFFF;

const MAX_ID: u32 = 0xFFFF;
const MAX_CLASS: u32 = 0xFF;

/// One filter field: either a wildcard or an exact value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchValue {
    #[default]
    Any,
    Exact(u32),
}

impl MatchValue {
    /// Decode a raw value, mapping [`MATCH_ANY`] to [`MatchValue::Any`]
    pub fn from_raw(raw: u32) -> Self {
        if raw == MATCH_ANY {
            MatchValue::Any
        } else {
            MatchValue::Exact(raw)
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            MatchValue::Any => MATCH_ANY,
            MatchValue::Exact(value) => value,
        }
    }

    /// Whether a descriptor field passes this filter field
    pub fn accepts(self, value: u32) -> bool {
        match self {
            MatchValue::Any => true,
            MatchValue::Exact(expected) => expected == value,
        }
    }

    fn check_range(self, max: u32, field: &str) -> Result<()> {
        match self {
            MatchValue::Exact(value) if value > max => Err(Error::InvalidParameter(format!(
                "{} {:#x} out of range (max {:#x})",
                field, value, max
            ))),
            _ => Ok(()),
        }
    }
}

impl From<u16> for MatchValue {
    fn from(value: u16) -> Self {
        MatchValue::Exact(u32::from(value))
    }
}

impl From<u8> for MatchValue {
    fn from(value: u8) -> Self {
        MatchValue::Exact(u32::from(value))
    }
}

impl fmt::Display for MatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchValue::Any => write!(f, "*"),
            MatchValue::Exact(value) => write!(f, "{:#06x}", value),
        }
    }
}

/// Parses `*` or a hex value with a `0x` prefix (e.g. `0x046d`)
impl FromStr for MatchValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "*" {
            return Ok(MatchValue::Any);
        }

        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| {
                Error::InvalidParameter(format!("'{}' must be '*' or start with '0x'", s))
            })?;

        if hex.is_empty() || hex.len() > 8 {
            return Err(Error::InvalidParameter(format!(
                "'{}' must have 1-8 hex digits",
                s
            )));
        }

        u32::from_str_radix(hex, 16)
            .map(MatchValue::Exact)
            .map_err(|_| Error::InvalidParameter(format!("'{}' is not a valid hex number", s)))
    }
}

/// Matching criteria of one registration
///
/// Immutable once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Filter {
    pub vendor_id: MatchValue,
    pub product_id: MatchValue,
    pub class_code: MatchValue,
    pub events: EventMask,
    /// Replay currently present devices as arrivals during `register`
    pub enumerate: bool,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            vendor_id: MatchValue::Any,
            product_id: MatchValue::Any,
            class_code: MatchValue::Any,
            events: EventMask::BOTH,
            enumerate: false,
        }
    }
}

impl Filter {
    /// Reject out-of-range ids and an empty event mask
    pub fn validate(&self) -> Result<()> {
        self.vendor_id.check_range(MAX_ID, "vendor_id")?;
        self.product_id.check_range(MAX_ID, "product_id")?;
        self.class_code.check_range(MAX_CLASS, "class_code")?;

        if self.events.is_empty() {
            return Err(Error::InvalidParameter("event mask is empty".to_string()));
        }

        Ok(())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.vendor_id, self.product_id, self.class_code
        )
    }
}

/// What the registry should do after an arrival callback returns
///
/// Returning [`CallbackAction::Deregister`] is an explicit request to drop the
/// registration: the entry is marked for deletion, the device is not recorded
/// as attached, and no further callbacks reach the entry once the flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackAction {
    #[default]
    Continue,
    Deregister,
}

/// Arrival callback
pub type ArrivedFn<B> = Box<
    dyn FnMut(&HotplugRegistry<B>, &<B as HotplugBackend>::Device) -> CallbackAction + Send,
>;

/// Removal callback
///
/// Receives the id and descriptor recorded at arrival, not a device handle.
pub type LeftFn<B> = Box<dyn FnMut(&HotplugRegistry<B>, &AttachedDevice) + Send>;

/// The two callback entry points of a registration
pub struct Callbacks<B: HotplugBackend> {
    pub(crate) on_arrived: Option<ArrivedFn<B>>,
    pub(crate) on_left: Option<LeftFn<B>>,
}

impl<B: HotplugBackend> Callbacks<B> {
    pub fn new(on_arrived: Option<ArrivedFn<B>>, on_left: Option<LeftFn<B>>) -> Self {
        Self {
            on_arrived,
            on_left,
        }
    }

    /// Mask of the events that have a callback attached
    pub fn provided(&self) -> EventMask {
        let mut mask = EventMask::empty();
        if self.on_arrived.is_some() {
            mask = mask | EventMask::ARRIVED;
        }
        if self.on_left.is_some() {
            mask = mask | EventMask::LEFT;
        }
        mask
    }

    /// Every event in `events` needs its callback
    pub(crate) fn validate(&self, events: EventMask) -> Result<()> {
        if events.contains(EventMask::ARRIVED) && self.on_arrived.is_none() {
            return Err(Error::InvalidParameter(
                "ARRIVED requested without an arrival callback".to_string(),
            ));
        }
        if events.contains(EventMask::LEFT) && self.on_left.is_none() {
            return Err(Error::InvalidParameter(
                "LEFT requested without a removal callback".to_string(),
            ));
        }
        Ok(())
    }
}

impl<B: HotplugBackend> fmt::Debug for Callbacks<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_arrived", &self.on_arrived.is_some())
            .field("on_left", &self.on_left.is_some())
            .finish()
    }
}

/// Builds and registers a hotplug filter
///
/// # Example
/// ```
/// use hotplug::test_utils::{MockBackend, mock_device};
/// use hotplug::{CallbackAction, HotplugBuilder, HotplugRegistry};
///
/// let backend = MockBackend::new();
/// backend.plug(mock_device(1, 0x1234, 0x0001, 0x00));
/// let registry = HotplugRegistry::new(backend);
///
/// let handle = HotplugBuilder::<MockBackend>::new()
///     .vendor_id(0x1234u16)
///     .enumerate(true)
///     .on_arrived(|_registry, device| {
///         println!("arrived: {:?}", device);
///         CallbackAction::Continue
///     })
///     .register(&registry)
///     .unwrap();
///
/// assert_eq!(registry.attached_devices(handle).unwrap().len(), 1);
/// ```
pub struct HotplugBuilder<B: HotplugBackend> {
    vendor_id: MatchValue,
    product_id: MatchValue,
    class_code: MatchValue,
    events: Option<EventMask>,
    enumerate: bool,
    on_arrived: Option<ArrivedFn<B>>,
    on_left: Option<LeftFn<B>>,
}

impl<B: HotplugBackend> Default for HotplugBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: HotplugBackend> HotplugBuilder<B> {
    pub fn new() -> Self {
        Self {
            vendor_id: MatchValue::Any,
            product_id: MatchValue::Any,
            class_code: MatchValue::Any,
            events: None,
            enumerate: false,
            on_arrived: None,
            on_left: None,
        }
    }

    pub fn vendor_id(mut self, vendor_id: impl Into<MatchValue>) -> Self {
        self.vendor_id = vendor_id.into();
        self
    }

    pub fn product_id(mut self, product_id: impl Into<MatchValue>) -> Self {
        self.product_id = product_id.into();
        self
    }

    pub fn class_code(mut self, class_code: impl Into<MatchValue>) -> Self {
        self.class_code = class_code.into();
        self
    }

    /// Events to deliver; defaults to those with a callback attached
    pub fn events(mut self, events: EventMask) -> Self {
        self.events = Some(events);
        self
    }

    pub fn enumerate(mut self, enumerate: bool) -> Self {
        self.enumerate = enumerate;
        self
    }

    pub fn on_arrived<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&HotplugRegistry<B>, &B::Device) -> CallbackAction + Send + 'static,
    {
        self.on_arrived = Some(Box::new(callback));
        self
    }

    pub fn on_left<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&HotplugRegistry<B>, &AttachedDevice) + Send + 'static,
    {
        self.on_left = Some(Box::new(callback));
        self
    }

    /// Split into the immutable filter and its callbacks
    pub fn build(self) -> (Filter, Callbacks<B>) {
        let callbacks = Callbacks::new(self.on_arrived, self.on_left);
        let filter = Filter {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            class_code: self.class_code,
            events: self.events.unwrap_or_else(|| callbacks.provided()),
            enumerate: self.enumerate,
        };
        (filter, callbacks)
    }

    pub fn register(self, registry: &HotplugRegistry<B>) -> Result<HotplugHandle> {
        let (filter, callbacks) = self.build();
        registry.register(filter, callbacks)
    }
}
