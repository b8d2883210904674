//! Runtime Configuration

/// Runtime configuration options
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Class added to a host once it and its descendants have loaded
    pub hydrated_class: String,

    /// Style mode used to pick a component stylesheet
    pub style_mode: Option<String>,

    /// Emit hydration markers on first render
    pub server_render: bool,

    /// Event name prefixes treated as direct user interaction.
    /// Listeners for these flush the scheduler synchronously.
    pub interaction_prefixes: Vec<String>,

    /// Maximum number of diagnostics kept (oldest dropped first)
    pub max_diagnostics: usize,
}

impl RuntimeConfig {
    pub fn is_interaction(&self, event_type: &str) -> bool {
        self.interaction_prefixes.iter().any(|p| event_type.starts_with(p.as_str()))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let interaction = [
            "pointer", "mouse", "click", "dblclick", "touch", "key", "focus", "blur", "drag", "drop",
        ];
        Self {
            hydrated_class: "hydrated".to_string(),
            style_mode: None,
            server_render: false,
            interaction_prefixes: interaction.iter().map(|s| s.to_string()).collect(),
            max_diagnostics: 256,
        }
    }
}
