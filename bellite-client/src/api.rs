//! Bellite host methods
//!
//! [`RpcSession`] is the raw capability: send a call and get a promise, send
//! a notification, feed an inbound frame. [`BelliteApi`] layers the host's
//! methods on top of any session, so the parameter shapes live in one place:
//!
//! | method        | params                                   |
//! |---------------|------------------------------------------|
//! | `auth`        | `[token]`                                |
//! | `version`     | none                                     |
//! | `ping`        | none                                     |
//! | `respondsTo`  | `[selfId, cmd]`                          |
//! | `perform`     | `[selfId, cmd, args]`                    |
//! | `bindEvent`   | `[selfId, evtType, res, ctx]`            |
//! | `unbindEvent` | `[selfId, evtType]`                      |

use bellite_core::{Error, Promise, Result};
use serde_json::{json, Map, Value};

/// Raw JSON-RPC session operations
pub trait RpcSession {
    /// Send a call; the promise settles with the reply
    fn invoke(&self, method: &str, params: Option<Value>) -> Promise<Value>;

    /// Send a notification; returns whether the transport took the frame
    fn notify(&self, method: &str, params: Option<Value>) -> bool;

    /// Route one complete inbound frame
    fn dispatch(&self, frame: &[u8]);
}

/// Arguments of a `perform` call
///
/// Either positional or keyword arguments may be given, not both:
///
/// - keywords are sent as one object
/// - a single positional array or object is sent as-is
/// - other positional arguments are sent as an array
/// - no arguments at all are sent as `null`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformArgs {
    positional: Vec<Value>,
    keywords: Map<String, Value>,
}

impl PerformArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: args.into_iter().collect(),
            keywords: Map::new(),
        }
    }

    pub fn keywords(keywords: Map<String, Value>) -> Self {
        Self {
            positional: Vec::new(),
            keywords,
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Add a keyword argument
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// The value sent in the third slot of `perform`
    pub fn into_params(self) -> Result<Value> {
        if !self.positional.is_empty() && !self.keywords.is_empty() {
            return Err(Error::InvalidArguments(
                "cannot specify both positional and keyword arguments".into(),
            ));
        }
        if !self.keywords.is_empty() {
            return Ok(Value::Object(self.keywords));
        }

        let mut positional = self.positional;
        match positional.len() {
            0 => Ok(Value::Null),
            1 if positional[0].is_array() || positional[0].is_object() => Ok(positional.remove(0)),
            _ => Ok(Value::Array(positional)),
        }
    }
}

/// A single value is one positional argument
impl From<Value> for PerformArgs {
    fn from(value: Value) -> Self {
        Self::positional([value])
    }
}

/// Parameters of a `bindEvent` call
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    pub self_id: i64,
    pub evt_type: String,
    pub res: i64,
    pub ctx: Value,
}

impl EventBinding {
    /// Binding for one event type with the remaining defaults
    pub fn new(evt_type: impl Into<String>) -> Self {
        Self {
            evt_type: evt_type.into(),
            ..Default::default()
        }
    }

    pub fn self_id(mut self, self_id: i64) -> Self {
        self.self_id = self_id;
        self
    }

    pub fn res(mut self, res: i64) -> Self {
        self.res = res;
        self
    }

    pub fn ctx(mut self, ctx: Value) -> Self {
        self.ctx = ctx;
        self
    }
}

/// Every event type, no resource, no context
impl Default for EventBinding {
    fn default() -> Self {
        Self {
            self_id: 0,
            evt_type: "*".to_string(),
            res: -1,
            ctx: Value::Null,
        }
    }
}

/// Methods understood by a Bellite host
pub trait BelliteApi: RpcSession {
    fn auth(&self, token: &str) -> Promise<Value> {
        self.invoke("auth", Some(json!([token])))
    }

    fn version(&self) -> Promise<Value> {
        self.invoke("version", None)
    }

    fn ping(&self) -> Promise<Value> {
        self.invoke("ping", None)
    }

    fn responds_to(&self, self_id: i64, cmd: &str) -> Promise<Value> {
        self.invoke("respondsTo", Some(json!([self_id, cmd])))
    }

    /// Run `cmd` on the host object `self_id`
    ///
    /// Fails with [`Error::InvalidArguments`] before anything is sent when
    /// both positional and keyword arguments are given.
    fn perform(&self, self_id: i64, cmd: &str, args: PerformArgs) -> Result<Promise<Value>> {
        let params = args.into_params()?;
        Ok(self.invoke("perform", Some(json!([self_id, cmd, params]))))
    }

    fn bind_event(&self, binding: EventBinding) -> Promise<Value> {
        self.invoke(
            "bindEvent",
            Some(json!([binding.self_id, binding.evt_type, binding.res, binding.ctx])),
        )
    }

    /// `evt_type` of `None` is sent as `null`
    fn unbind_event(&self, self_id: i64, evt_type: Option<&str>) -> Promise<Value> {
        self.invoke("unbindEvent", Some(json!([self_id, evt_type])))
    }
}

impl<S: RpcSession + ?Sized> BelliteApi for S {}
