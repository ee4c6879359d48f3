//! Test configuration: target site, provider, credentials, browser options.
//!
//! One live instance per process, loaded from the persisted file at startup
//! and overwritten wholesale on each save.

use qaprobe_agent::{BrowserOptions, Provider};
use serde::{Deserialize, Serialize};

/// Process-wide test configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub website_url: String,
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub google_api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub groq_api_key: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    #[serde(default)]
    pub custom_prompt: String,
    /// Derived: true when any provider key is set. Recomputed on update.
    #[serde(default)]
    pub api_keys_configured: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            website_url: "https://demoblaze.com/".to_string(),
            provider: Provider::Google,
            model: "gemini-1.5-flash".to_string(),
            google_api_key: String::new(),
            openai_api_key: String::new(),
            groq_api_key: String::new(),
            headless: false,
            window_width: 1920,
            window_height: 1080,
            custom_prompt: String::new(),
            api_keys_configured: false,
        }
    }
}

/// Partial configuration update, as accepted by the config and start
/// endpoints. Absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub website_url: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    /// Generic key routed to the slot of the (possibly just-updated)
    /// provider. Ignored for ollama.
    pub api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub headless: Option<bool>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub custom_prompt: Option<String>,
}

impl TestConfig {
    /// Merges an update into the live configuration.
    ///
    /// The provider field is applied first so a generic `api_key` lands in
    /// the right slot; other providers' keys are preserved.
    pub fn apply_update(&mut self, update: &ConfigUpdate) {
        if let Some(provider) = update.provider {
            self.provider = provider;
        }

        if let Some(key) = update.api_key.as_deref().filter(|k| !k.is_empty()) {
            match self.provider {
                Provider::Google => self.google_api_key = key.to_string(),
                Provider::OpenAi => self.openai_api_key = key.to_string(),
                Provider::Groq => self.groq_api_key = key.to_string(),
                Provider::Ollama => {}
            }
        }

        if let Some(v) = &update.website_url {
            self.website_url = v.clone();
        }
        if let Some(v) = &update.model {
            self.model = v.clone();
        }
        if let Some(v) = &update.google_api_key {
            self.google_api_key = v.clone();
        }
        if let Some(v) = &update.openai_api_key {
            self.openai_api_key = v.clone();
        }
        if let Some(v) = &update.groq_api_key {
            self.groq_api_key = v.clone();
        }
        if let Some(v) = update.headless {
            self.headless = v;
        }
        if let Some(v) = update.window_width {
            self.window_width = v;
        }
        if let Some(v) = update.window_height {
            self.window_height = v;
        }
        if let Some(v) = &update.custom_prompt {
            self.custom_prompt = v.clone();
        }

        self.api_keys_configured = !self.google_api_key.is_empty()
            || !self.openai_api_key.is_empty()
            || !self.groq_api_key.is_empty();
    }

    /// The configured credential for a provider, or None when empty.
    pub fn credential_for(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Google => &self.google_api_key,
            Provider::OpenAi => &self.openai_api_key,
            Provider::Groq => &self.groq_api_key,
            Provider::Ollama => return None,
        };
        if key.is_empty() { None } else { Some(key) }
    }

    /// Browser session options derived from the display settings.
    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            window_width: self.window_width,
            window_height: self.window_height,
            ..BrowserOptions::default()
        }
    }
}
