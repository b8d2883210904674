//! Component Metadata
//!
//! Decodes the compact registration tuple produced by the build tooling:
//!
//! ```text
//! [tagName, moduleId, {mode: styleId}, [member...], [listener...], slotFlag, loadPriority]
//! member   = [name, memberKind, propType?, controllerId?, reflect?]
//! listener = [eventName, methodName, disabled?, passive?, capture?]
//! ```
//!
//! Trailing elements may be omitted and falsy values mean "default".

use std::collections::BTreeMap;

use kiln_dom::CustomElementRegistry;
use serde::Serialize;
use serde_json::Value;

use crate::scheduler::Priority;

/// Metadata decode error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("component metadata must be an array")]
    NotAnArray,

    #[error("component metadata has no tag name")]
    MissingTag,

    #[error("'{0}' is not a valid custom element name")]
    InvalidTag(String),

    #[error("<{tag}> has no module id")]
    MissingModule { tag: String },

    #[error("<{tag}> member #{index} is malformed")]
    MalformedMember { tag: String, index: usize },

    #[error("<{tag}> member '{member}' has unknown kind {kind}")]
    UnknownMemberKind { tag: String, member: String, kind: u64 },

    #[error("<{tag}> listener #{index} is malformed")]
    MalformedListener { tag: String, index: usize },
}

/// Member kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemberKind {
    /// Public prop, read-only on the instance
    Prop,
    /// Public prop the instance may write
    PropMutable,
    /// Value injected from the platform context
    PropContext,
    /// Controller tag whose module is preloaded
    PropConnect,
    /// Internal reactive state
    State,
    /// Public method
    Method,
    /// Reference to the host element
    Element,
}

impl MemberKind {
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            1 => MemberKind::Prop,
            2 => MemberKind::PropMutable,
            3 => MemberKind::PropContext,
            4 => MemberKind::PropConnect,
            5 => MemberKind::State,
            6 => MemberKind::Method,
            7 => MemberKind::Element,
            _ => return None,
        })
    }
}

/// Declared prop type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum PropType {
    #[default]
    Unknown,
    Any,
    String,
    Boolean,
    Number,
}

impl PropType {
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => PropType::Any,
            2 => PropType::String,
            3 => PropType::Boolean,
            4 => PropType::Number,
            _ => PropType::Unknown,
        }
    }
}

/// Slot usage of a component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SlotMode {
    #[default]
    None,
    Default,
    Named,
}

impl SlotMode {
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => SlotMode::Default,
            2 => SlotMode::Named,
            _ => SlotMode::None,
        }
    }
}

/// One declared member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberMeta {
    pub name: String,
    pub kind: MemberKind,
    pub prop_type: PropType,
    /// Observed attribute, for props with a known type
    pub attr_name: Option<String>,
    pub controller_id: Option<String>,
    pub reflect: bool,
}

/// One declarative listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerMeta {
    /// `[target:]event[.key]`
    pub event_name: String,
    pub method: String,
    pub disabled: bool,
    pub passive: bool,
    pub capture: bool,
}

/// Decoded metadata of one tag, shared by all its instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentMeta {
    pub tag: String,
    pub module_id: String,
    /// Style id by mode
    pub styles: BTreeMap<String, String>,
    pub members: Vec<MemberMeta>,
    pub listeners: Vec<ListenerMeta>,
    pub slot: SlotMode,
    pub priority: Priority,
}

impl ComponentMeta {
    pub fn decode(value: &Value) -> Result<Self, MetadataError> {
        let tuple = value.as_array().ok_or(MetadataError::NotAnArray)?;
        let tag = text(tuple, 0).ok_or(MetadataError::MissingTag)?.to_ascii_lowercase();
        if !CustomElementRegistry::is_valid_name(&tag) {
            return Err(MetadataError::InvalidTag(tag));
        }
        let module_id = text(tuple, 1).ok_or_else(|| MetadataError::MissingModule { tag: tag.clone() })?;

        let styles = field(tuple, 2)
            .and_then(Value::as_object)
            .map(|modes| {
                modes
                    .iter()
                    .filter_map(|(mode, id)| id.as_str().map(|id| (mode.clone(), id.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let mut members = Vec::new();
        for (index, member) in list(tuple, 3).iter().enumerate() {
            members.push(decode_member(&tag, index, member)?);
        }

        let mut listeners = Vec::new();
        for (index, listener) in list(tuple, 4).iter().enumerate() {
            let malformed = || MetadataError::MalformedListener { tag: tag.clone(), index };
            let parts = listener.as_array().ok_or_else(malformed)?;
            listeners.push(ListenerMeta {
                event_name: text(parts, 0).ok_or_else(malformed)?,
                method: text(parts, 1).ok_or_else(malformed)?,
                disabled: flag(parts, 2),
                passive: flag(parts, 3),
                capture: flag(parts, 4),
            });
        }

        Ok(Self {
            slot: SlotMode::from_code(code(tuple, 5)),
            priority: Priority::from_code(code(tuple, 6)),
            tag,
            module_id,
            styles,
            members,
            listeners,
        })
    }

    pub fn member(&self, name: &str) -> Option<&MemberMeta> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Member observing `attr`, matched case-insensitively
    pub fn member_for_attribute(&self, attr: &str) -> Option<&MemberMeta> {
        self.members
            .iter()
            .find(|m| m.attr_name.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(attr)))
    }

    pub fn observed_attributes(&self) -> Vec<String> {
        self.members.iter().filter_map(|m| m.attr_name.clone()).collect()
    }

    /// Style id for `mode`, falling back to the default mode `$`
    pub fn style_for_mode(&self, mode: Option<&str>) -> Option<&str> {
        mode.and_then(|m| self.styles.get(m))
            .or_else(|| self.styles.get("$"))
            .map(String::as_str)
    }
}

fn decode_member(tag: &str, index: usize, member: &Value) -> Result<MemberMeta, MetadataError> {
    let parts = member.as_array().ok_or_else(|| MetadataError::MalformedMember { tag: tag.to_string(), index })?;
    let name = text(parts, 0).ok_or_else(|| MetadataError::MalformedMember { tag: tag.to_string(), index })?;
    let kind_code = code(parts, 1);
    let kind = MemberKind::from_code(kind_code).ok_or_else(|| MetadataError::UnknownMemberKind {
        tag: tag.to_string(),
        member: name.clone(),
        kind: kind_code,
    })?;
    let prop_type = PropType::from_code(code(parts, 2));
    let attr_name = (matches!(kind, MemberKind::Prop | MemberKind::PropMutable) && prop_type != PropType::Unknown)
        .then(|| dash_case(&name));

    Ok(MemberMeta {
        reflect: flag(parts, 4) && attr_name.is_some(),
        controller_id: text(parts, 3),
        name,
        kind,
        prop_type,
        attr_name,
    })
}

/// `firstName` -> `first-name`
pub fn dash_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn field(tuple: &[Value], idx: usize) -> Option<&Value> {
    tuple.get(idx).filter(|v| truthy(v))
}

fn text(tuple: &[Value], idx: usize) -> Option<String> {
    field(tuple, idx).and_then(Value::as_str).map(str::to_string)
}

fn code(tuple: &[Value], idx: usize) -> u64 {
    field(tuple, idx)
        .and_then(|v| v.as_u64().or_else(|| v.as_bool().map(u64::from)))
        .unwrap_or(0)
}

fn flag(tuple: &[Value], idx: usize) -> bool {
    field(tuple, idx).is_some()
}

fn list(tuple: &[Value], idx: usize) -> &[Value] {
    field(tuple, idx).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}
