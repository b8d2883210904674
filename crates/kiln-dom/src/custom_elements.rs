//! Custom Elements
//!
//! Custom element registry and the lifecycle reactions queued by the
//! document when defined elements are connected, disconnected or have an
//! observed attribute changed.

use std::collections::HashMap;

use crate::{DomError, NodeId};

/// Custom elements registry
#[derive(Debug, Default)]
pub struct CustomElementRegistry {
    definitions: HashMap<String, CustomElementDefinition>,
}

/// Custom element definition
#[derive(Debug, Clone)]
pub struct CustomElementDefinition {
    pub name: String,
    /// Lowercased attribute names that queue `AttributeChanged`
    pub observed_attributes: Vec<String>,
}

/// Lifecycle reaction queued by the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Connected(NodeId),
    Disconnected(NodeId),
    AttributeChanged {
        element: NodeId,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

impl CustomElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a custom element
    pub fn define(&mut self, name: &str, observed_attributes: &[String]) -> Result<(), DomError> {
        if !Self::is_valid_name(name) {
            return Err(DomError::InvalidCustomElementName(name.to_string()));
        }
        if self.definitions.contains_key(name) {
            return Err(DomError::AlreadyDefined(name.to_string()));
        }

        let definition = CustomElementDefinition {
            name: name.to_string(),
            observed_attributes: observed_attributes.iter().map(|a| a.to_ascii_lowercase()).collect(),
        };
        tracing::debug!(name, "custom element defined");
        self.definitions.insert(name.to_string(), definition);
        Ok(())
    }

    /// Get element definition
    pub fn get(&self, name: &str) -> Option<&CustomElementDefinition> {
        self.definitions.get(name)
    }

    /// Check if element is defined
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Whether `attr` is observed for elements named `name`
    pub fn observes(&self, name: &str, attr: &str) -> bool {
        self.definitions
            .get(name)
            .is_some_and(|d| d.observed_attributes.iter().any(|a| a.eq_ignore_ascii_case(attr)))
    }

    /// Validate custom element name
    pub fn is_valid_name(name: &str) -> bool {
        // Must contain hyphen
        if !name.contains('-') {
            return false;
        }

        // Must start with lowercase letter
        if !name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
            return false;
        }

        if name.chars().any(|c| c.is_ascii_uppercase()) {
            return false;
        }

        let reserved = ["annotation-xml", "color-profile", "font-face",
                       "font-face-src", "font-face-uri", "font-face-format",
                       "font-face-name", "missing-glyph"];
        !reserved.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(CustomElementRegistry::is_valid_name("my-element"));
        assert!(CustomElementRegistry::is_valid_name("app-header"));
        assert!(!CustomElementRegistry::is_valid_name("myelement")); // no hyphen
        assert!(!CustomElementRegistry::is_valid_name("My-Element")); // uppercase
        assert!(!CustomElementRegistry::is_valid_name("font-face"));
    }

    #[test]
    fn test_define() {
        let mut registry = CustomElementRegistry::new();

        assert!(registry.define("my-element", &["First-Name".to_string()]).is_ok());
        assert!(registry.is_defined("my-element"));
        assert!(registry.observes("my-element", "first-name"));
        assert!(!registry.observes("my-element", "last-name"));

        assert_eq!(
            registry.define("my-element", &[]),
            Err(DomError::AlreadyDefined("my-element".to_string()))
        );
    }
}
