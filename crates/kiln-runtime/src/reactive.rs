//! Reactive Members
//!
//! Every host keeps its member values outside the component instance so
//! props can be written before the instance exists. Writes go through one
//! setter: unchanged values are dropped, watchers run around the store and
//! a live instance gets a coalesced update.

use std::collections::BTreeMap;
use std::rc::Rc;

use kiln_dom::NodeId;
use serde_json::{Number, Value};

use crate::error::RuntimeError;
use crate::metadata::{ComponentMeta, MemberKind, PropType};
use crate::platform::Platform;

/// Largest integer that round-trips through f64
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Watcher called with `(new, old)`
pub type Watcher = Rc<dyn Fn(&Value, &Value)>;

/// When a watcher runs relative to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WatchPhase {
    WillChange,
    DidChange,
}

/// Member values and watchers of one host
#[derive(Default)]
pub(crate) struct ValueStore {
    values: BTreeMap<String, Value>,
    watchers: BTreeMap<(String, WatchPhase), Vec<Watcher>>,
}

impl ValueStore {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, value: Value) -> Option<Value> {
        self.values.insert(name.to_string(), value)
    }

    pub fn watchers(&self, name: &str, phase: WatchPhase) -> Vec<Watcher> {
        self.watchers.get(&(name.to_string(), phase)).cloned().unwrap_or_default()
    }

    pub fn watch(&mut self, name: &str, phase: WatchPhase, watcher: Watcher) {
        self.watchers.entry((name.to_string(), phase)).or_default().push(watcher);
    }
}

/// Coerce an attribute value to a prop value of the declared type
pub fn parse_prop_value(prop_type: PropType, value: Option<&str>) -> Value {
    match prop_type {
        PropType::Boolean => Value::Bool(!matches!(value, None | Some("false"))),
        PropType::Number => value
            .and_then(leading_number)
            .map_or(Value::Null, number_value),
        PropType::String | PropType::Any | PropType::Unknown => {
            value.map_or(Value::Null, |v| Value::String(v.to_string()))
        }
    }
}

/// Longest numeric prefix of `text`, so `"12px"` reads as 12
fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        has_digits |= frac_end > end + 1;
        end = frac_end;
    }
    if !has_digits {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    text[..end].parse().ok()
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Attribute text for a reflected value, `None` removes the attribute
fn reflected_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl Platform {
    pub(crate) fn value(&self, elm: NodeId, member: &str) -> Option<Value> {
        self.hosts.borrow().get(&elm)?.values.get(member).cloned()
    }

    /// The reactive setter shared by host-side and instance-side writes
    pub(crate) fn set_value(&self, elm: NodeId, member: &str, value: Value) {
        let (old, will, did) = {
            let hosts = self.hosts.borrow();
            let Some(host) = hosts.get(&elm) else {
                return;
            };
            let old = host.values.get(member).cloned().unwrap_or(Value::Null);
            if old == value {
                return;
            }
            (
                old,
                host.values.watchers(member, WatchPhase::WillChange),
                host.values.watchers(member, WatchPhase::DidChange),
            )
        };

        for watcher in &will {
            watcher(&value, &old);
        }
        let should_update = {
            let mut hosts = self.hosts.borrow_mut();
            let Some(host) = hosts.get_mut(&elm) else {
                return;
            };
            host.values.insert(member, value.clone());
            host.instance.is_some() && !host.rendering
        };
        for watcher in &did {
            watcher(&value, &old);
        }

        tracing::trace!(?elm, member, %value, "member changed");
        if should_update {
            self.queue_update(elm);
        }
    }

    /// Instance-side write: plain props are read-only
    pub(crate) fn set_from_instance(&self, elm: NodeId, member: &str, value: Value) -> Result<(), RuntimeError> {
        let meta = self.host_meta(elm).ok_or(RuntimeError::NotAHost(elm))?;
        let kind = member_kind(&meta, member)?;
        match kind {
            MemberKind::PropMutable | MemberKind::State => {
                self.set_value(elm, member, value);
                Ok(())
            }
            _ => {
                tracing::warn!(tag = %meta.tag, member, "component tried to write a read-only member");
                Err(RuntimeError::ReadOnlyMember { tag: meta.tag.clone(), member: member.to_string() })
            }
        }
    }

    /// Read a public member of a host
    pub fn get_prop(&self, elm: NodeId, member: &str) -> Result<Value, RuntimeError> {
        let meta = self.host_meta(elm).ok_or(RuntimeError::NotAHost(elm))?;
        match member_kind(&meta, member)? {
            MemberKind::State | MemberKind::Method => Err(unknown_member(&meta, member)),
            _ => Ok(self.value(elm, member).unwrap_or(Value::Null)),
        }
    }

    /// Host-side write of a public prop. Works before the element is
    /// connected or its instance exists.
    pub fn set_prop(&self, elm: NodeId, member: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        let meta = self.ensure_host(elm)?;
        match member_kind(&meta, member)? {
            MemberKind::Prop | MemberKind::PropMutable => {
                self.set_value(elm, member, value.into());
                Ok(())
            }
            MemberKind::State | MemberKind::Method => Err(unknown_member(&meta, member)),
            _ => Err(RuntimeError::ReadOnlyMember { tag: meta.tag.clone(), member: member.to_string() }),
        }
    }

    pub(crate) fn watch(&self, elm: NodeId, member: &str, phase: WatchPhase, watcher: Watcher) {
        if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
            host.values.watch(member, phase, watcher);
        }
    }

    /// Initial member values, taken when the instance is created
    pub(crate) fn init_members(&self, elm: NodeId, meta: &ComponentMeta) {
        for member in &meta.members {
            let initial = match member.kind {
                MemberKind::Prop | MemberKind::PropMutable => {
                    if self.hosts.borrow().get(&elm).is_some_and(|h| h.values.contains(&member.name)) {
                        continue;
                    }
                    let Some(attr) = member.attr_name.as_deref() else {
                        continue;
                    };
                    let text = self.doc.borrow().get_attribute(elm, attr).map(str::to_string);
                    match text {
                        Some(text) => parse_prop_value(member.prop_type, Some(&text)),
                        None => continue,
                    }
                }
                MemberKind::PropContext => {
                    let key = member.controller_id.as_deref().unwrap_or(&member.name);
                    self.context_value(key).unwrap_or(Value::Null)
                }
                MemberKind::PropConnect => {
                    let Some(controller) = member.controller_id.as_deref() else {
                        continue;
                    };
                    self.preload_tag(controller);
                    Value::String(controller.to_string())
                }
                MemberKind::Element => Value::from(elm.index()),
                MemberKind::State | MemberKind::Method => continue,
            };
            if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
                host.values.insert(&member.name, initial);
            }
        }
    }

    /// Mirror reflected props to attributes, touching only differences
    pub(crate) fn reflect_attributes(&self, elm: NodeId, meta: &ComponentMeta) {
        for member in meta.members.iter().filter(|m| m.reflect) {
            let Some(attr) = member.attr_name.as_deref() else {
                continue;
            };
            let wanted = self.value(elm, &member.name).as_ref().and_then(reflected_text);
            let mut doc = self.doc.borrow_mut();
            if doc.get_attribute(elm, attr) == wanted.as_deref() {
                continue;
            }
            match wanted {
                Some(text) => doc.set_attribute(elm, attr, &text),
                None => doc.remove_attribute(elm, attr),
            }
        }
    }
}

fn member_kind(meta: &ComponentMeta, member: &str) -> Result<MemberKind, RuntimeError> {
    meta.member(member).map(|m| m.kind).ok_or_else(|| unknown_member(meta, member))
}

fn unknown_member(meta: &ComponentMeta, member: &str) -> RuntimeError {
    RuntimeError::UnknownMember { tag: meta.tag.clone(), member: member.to_string() }
}
