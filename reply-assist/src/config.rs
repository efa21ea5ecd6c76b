use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::dom::{Selector, SelectorError};

/// Attribute carried by every injected button instance.
pub const BUTTON_MARKER_ATTR: &str = "data-reply-assist-button";
/// Attribute holding the context identifier bound to a button.
pub const BUTTON_CONTEXT_ATTR: &str = "data-reply-assist-context";
pub const PANEL_ID: &str = "reply-assist-panel";
pub const PANEL_ACTION_ATTR: &str = "data-reply-assist-action";

const DEFAULT_DETAIL_PATH_SEGMENT: &str = "status";
const MAX_INSERT_ATTEMPTS_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {list} selector `{selector}`: {source}")]
    Selector {
        list: &'static str,
        selector: String,
        #[source]
        source: SelectorError,
    },
    #[error("failed to parse overlay config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Host marker lists. These track the host's markup and must be updated
/// when it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConfig {
    #[serde(default = "default_reply_inputs")]
    pub reply_inputs: Vec<String>,
    #[serde(default = "default_primary_actions")]
    pub primary_actions: Vec<String>,
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,
    #[serde(default = "default_text_bearing")]
    pub text_bearing: Vec<String>,
    #[serde(default = "default_content_markers")]
    pub content_markers: Vec<String>,
    #[serde(default = "default_author_markers")]
    pub author_markers: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            reply_inputs: default_reply_inputs(),
            primary_actions: default_primary_actions(),
            containers: default_containers(),
            text_bearing: default_text_bearing(),
            content_markers: default_content_markers(),
            author_markers: default_author_markers(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

fn default_reply_inputs() -> Vec<String> {
    strings(&[
        r#"[data-testid="tweetTextarea_0"]"#,
        r#"[role="textbox"][aria-label="Post your reply"]"#,
        r#"[contenteditable="true"][aria-label="Post your reply"]"#,
        r#"form [contenteditable="true"]"#,
    ])
}

fn default_primary_actions() -> Vec<String> {
    strings(&[
        r#"[data-testid="tweetButton"]"#,
        r#"[data-testid="tweetButtonInline"]"#,
    ])
}

fn default_containers() -> Vec<String> {
    strings(&[r#"[role="group"]"#, r#"[role="toolbar"]"#, "form"])
}

fn default_text_bearing() -> Vec<String> {
    strings(&["div[lang]", "p", "span", r#"div[dir="auto"]"#])
}

fn default_content_markers() -> Vec<String> {
    strings(&[
        r#"[data-testid="tweetText"]"#,
        "article div[lang]",
        r#"article [dir="auto"]"#,
    ])
}

fn default_author_markers() -> Vec<String> {
    strings(&[
        r#"[data-testid="User-Name"] span"#,
        r#"[data-testid="User-Name"]"#,
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    pub mutation_debounce_ms: u64,
    pub focus_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
    pub dismiss_scroll_debounce_ms: u64,
    pub health_check_interval_ms: u64,
    pub startup_backoff_ms: Vec<u64>,
    pub event_stagger_ms: u64,
    pub verify_delay_ms: u64,
    pub unlock_delay_ms: u64,
    pub max_insert_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            mutation_debounce_ms: 100,
            focus_debounce_ms: 100,
            scroll_debounce_ms: 250,
            dismiss_scroll_debounce_ms: 100,
            health_check_interval_ms: 2_000,
            startup_backoff_ms: vec![100, 300, 700, 1_500, 3_000],
            event_stagger_ms: 10,
            verify_delay_ms: 50,
            unlock_delay_ms: 100,
            max_insert_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelConfig {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub gap: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width: 250.0,
            height: 170.0,
            margin_top: 10.0,
            margin_bottom: 10.0,
            margin_left: 10.0,
            margin_right: 10.0,
            gap: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionConfig {
    pub horizontal_margin: f64,
    pub upward_margin: f64,
    pub downward_margin: f64,
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub attribute_min_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            horizontal_margin: 300.0,
            upward_margin: 300.0,
            downward_margin: 100.0,
            min_text_chars: 20,
            max_text_chars: 1_000,
            attribute_min_chars: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickReply {
    pub text: String,
    #[serde(default)]
    pub icon: String,
}

fn default_quick_replies() -> Vec<QuickReply> {
    [
        ("Thank you", "👍"),
        ("Contact Us via email", "📧"),
        ("Have a great day", "☀️"),
    ]
    .into_iter()
    .map(|(text, icon)| QuickReply {
        text: text.to_string(),
        icon: icon.to_string(),
    })
    .collect()
}

fn default_detail_path_segment() -> String {
    DEFAULT_DETAIL_PATH_SEGMENT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfig {
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default = "default_detail_path_segment")]
    pub detail_path_segment: String,
    #[serde(default = "default_quick_replies")]
    pub quick_replies: Vec<QuickReply>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            selectors: SelectorConfig::default(),
            timings: Timings::default(),
            panel: PanelConfig::default(),
            extraction: ExtractionConfig::default(),
            detail_path_segment: default_detail_path_segment(),
            quick_replies: default_quick_replies(),
        }
    }
}

impl OverlayConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: OverlayConfig = serde_json::from_str(raw)?;
        config.normalized().validated()
    }

    /// Restores defaults for lists that were configured empty; an empty
    /// marker list would silently disable the overlay.
    pub fn normalized(mut self) -> Self {
        let selectors = &mut self.selectors;
        restore_if_empty("replyInputs", &mut selectors.reply_inputs, default_reply_inputs);
        restore_if_empty(
            "primaryActions",
            &mut selectors.primary_actions,
            default_primary_actions,
        );
        restore_if_empty("containers", &mut selectors.containers, default_containers);
        restore_if_empty("textBearing", &mut selectors.text_bearing, default_text_bearing);
        restore_if_empty(
            "contentMarkers",
            &mut selectors.content_markers,
            default_content_markers,
        );
        restore_if_empty(
            "authorMarkers",
            &mut selectors.author_markers,
            default_author_markers,
        );

        let segment = self.detail_path_segment.trim().trim_matches('/');
        self.detail_path_segment = if segment.is_empty() {
            default_detail_path_segment()
        } else {
            segment.to_string()
        };
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        let extraction = &self.extraction;
        if extraction.min_text_chars > extraction.max_text_chars {
            return Err(ConfigError::Invalid(format!(
                "extraction.minTextChars ({}) exceeds extraction.maxTextChars ({})",
                extraction.min_text_chars, extraction.max_text_chars
            )));
        }
        if !(1..=MAX_INSERT_ATTEMPTS_LIMIT).contains(&self.timings.max_insert_attempts) {
            return Err(ConfigError::Invalid(format!(
                "timings.maxInsertAttempts must be between 1 and {MAX_INSERT_ATTEMPTS_LIMIT}"
            )));
        }
        if self.timings.health_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timings.healthCheckIntervalMs must be positive".to_string(),
            ));
        }
        if self.panel.width <= 0.0 || self.panel.height <= 0.0 {
            return Err(ConfigError::Invalid(
                "panel width and height must be positive".to_string(),
            ));
        }
        self.compile()?;
        Ok(self)
    }

    pub fn compile(&self) -> Result<CompiledSelectors, ConfigError> {
        let selectors = &self.selectors;
        Ok(CompiledSelectors {
            reply_inputs: compile_list("replyInputs", &selectors.reply_inputs)?,
            primary_actions: compile_list("primaryActions", &selectors.primary_actions)?,
            containers: compile_list("containers", &selectors.containers)?,
            text_bearing: compile_list("textBearing", &selectors.text_bearing)?,
            content_markers: compile_list("contentMarkers", &selectors.content_markers)?,
            author_markers: compile_list("authorMarkers", &selectors.author_markers)?,
            button: compile_one("button", &format!("[{BUTTON_MARKER_ATTR}]"))?,
        })
    }
}

fn restore_if_empty(name: &'static str, list: &mut Vec<String>, fallback: fn() -> Vec<String>) {
    list.retain(|selector| !selector.trim().is_empty());
    if list.is_empty() {
        warn!(list = name, "selector list is empty; restoring defaults");
        *list = fallback();
    }
}

fn compile_one(list: &'static str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|source| ConfigError::Selector {
        list,
        selector: selector.to_string(),
        source,
    })
}

fn compile_list(list: &'static str, selectors: &[String]) -> Result<Vec<Selector>, ConfigError> {
    selectors
        .iter()
        .map(|selector| compile_one(list, selector))
        .collect()
}

/// Parsed marker lists, ready for queries.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub reply_inputs: Vec<Selector>,
    pub primary_actions: Vec<Selector>,
    pub containers: Vec<Selector>,
    pub text_bearing: Vec<Selector>,
    pub content_markers: Vec<Selector>,
    pub author_markers: Vec<Selector>,
    pub button: Selector,
}
