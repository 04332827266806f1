//! Job-functions refinement.
//!
//! The external text service is a single function-shaped capability,
//! [`TextService`]. Production wires it to [`GeminiService`]; tests hand in
//! a closure. When no service is configured the [`Refiner`] falls back to
//! [`format_bullets`], a deterministic local formatter.
//!
//! Refinement never destroys the user's text: an empty or failed answer
//! returns the input unchanged.

use crate::config::RefineSettings;
use log::{debug, info, warn};
use std::fmt;

/// Bullet markers already recognized at the start of a line.
const BULLET_MARKERS: [char; 2] = ['•', '-'];

/// Errors reported by a [`TextService`]. [`Refiner::refine`] absorbs them all.
#[derive(Debug)]
pub enum RefineError {
    /// Transport-level failure (DNS, TLS, timeout...)
    Network(String),
    /// The service answered with a non-success status
    Service { status: u16, message: String },
    /// The answer could not be understood
    Malformed(String),
    /// The answer parsed but contained no text
    Empty,
}

impl fmt::Display for RefineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefineError::Network(e) => write!(f, "network error: {}", e),
            RefineError::Service { status, message } => {
                write!(f, "service error {}: {}", status, message)
            }
            RefineError::Malformed(e) => write!(f, "malformed response: {}", e),
            RefineError::Empty => write!(f, "empty response"),
        }
    }
}

impl std::error::Error for RefineError {}

/// Text in, text out, may fail.
pub trait TextService {
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String, RefineError>;
}

impl<F> TextService for F
where
    F: Fn(&str, f32) -> Result<String, RefineError>,
{
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String, RefineError> {
        self(prompt, temperature)
    }
}

/// Builds the fixed instruction sent along with the raw notes.
pub fn build_prompt(text: &str) -> String {
    format!(
        "You are an expert HR consultant. Rewrite the following raw job functions into a \
         professional, bulleted list suitable for a formal job description.\n\
         \n\
         Rules:\n\
         1. Use professional action verbs.\n\
         2. Keep it concise but descriptive.\n\
         3. Format as a clean bulleted list (using • or -).\n\
         4. Correct grammar and spelling.\n\
         5. Do not add any introductory or concluding text, just the list.\n\
         \n\
         Raw Input:\n\
         {}",
        text
    )
}

/// Local stand-in for the service: one trimmed, non-empty line per bullet.
///
/// Lines that already start with `•` or `-` keep their marker.
///
/// ```
/// use jobdesc::refine::format_bullets;
/// assert_eq!(format_bullets("task one\n\n  task two "), "• task one\n• task two");
/// assert_eq!(format_bullets("- kept\nadded"), "- kept\n• added");
/// ```
pub fn format_bullets(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.starts_with(BULLET_MARKERS) {
                line.to_string()
            } else {
                format!("• {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Refines job-function notes, either remotely or with [`format_bullets`].
pub struct Refiner {
    service: Option<Box<dyn TextService>>,
    temperature: f32,
}

impl Refiner {
    /// No service configured; every call uses the local formatter.
    pub fn local() -> Self {
        Refiner {
            service: None,
            temperature: RefineSettings::default().temperature,
        }
    }

    pub fn with_service(service: impl TextService + 'static) -> Self {
        Refiner {
            service: Some(Box::new(service)),
            temperature: RefineSettings::default().temperature,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Wires the Gemini service when the configured credential variable is
    /// set. A missing credential is the supported local mode, not an error.
    pub fn from_settings(settings: &RefineSettings) -> Self {
        let Some(api_key) = settings.api_key() else {
            info!(
                "No refinement credential in ${}; job functions will be formatted locally",
                settings.api_key_env
            );
            return Refiner::local().temperature(settings.temperature);
        };

        #[cfg(feature = "fetch")]
        {
            match GeminiService::new(api_key, settings) {
                Ok(service) => Refiner::with_service(service).temperature(settings.temperature),
                Err(e) => {
                    warn!("Could not set up refinement client ({}); using local formatting", e);
                    Refiner::local().temperature(settings.temperature)
                }
            }
        }

        #[cfg(not(feature = "fetch"))]
        {
            let _ = api_key;
            warn!("Refinement service requires the 'fetch' feature; using local formatting");
            Refiner::local().temperature(settings.temperature)
        }
    }

    pub fn is_remote(&self) -> bool {
        self.service.is_some()
    }

    pub fn refine(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let Some(service) = &self.service else {
            debug!("Refining {} bytes locally", text.len());
            return format_bullets(text);
        };

        debug!("Sending {} bytes to the refinement service", text.len());
        match service.complete(&build_prompt(text), self.temperature) {
            Ok(refined) if !refined.trim().is_empty() => refined.trim().to_string(),
            Ok(_) => {
                warn!("Refinement service returned no text; keeping the original");
                text.to_string()
            }
            Err(e) => {
                warn!("Refinement failed ({}); keeping the original", e);
                text.to_string()
            }
        }
    }
}

impl fmt::Debug for Refiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refiner")
            .field("remote", &self.is_remote())
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Gemini `generateContent` client.
#[cfg(feature = "fetch")]
pub struct GeminiService {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

#[cfg(feature = "fetch")]
impl GeminiService {
    pub fn new(api_key: String, settings: &RefineSettings) -> Result<Self, RefineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(network_error)?;
        // the key travels in a header so it never shows up in a logged URL
        let url = format!(
            "{}/models/{}:generateContent",
            settings.endpoint.trim_end_matches('/'),
            settings.model,
        );
        Ok(GeminiService {
            client,
            url,
            api_key,
        })
    }
}

#[cfg(feature = "fetch")]
fn network_error(err: reqwest::Error) -> RefineError {
    RefineError::Network(err.without_url().to_string())
}

#[cfg(feature = "fetch")]
impl TextService for GeminiService {
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String, RefineError> {
        let body = gemini_request_body(prompt, temperature);
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .body(body.to_string())
            .send()
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().map_err(network_error)?;
        if !status.is_success() {
            return Err(RefineError::Service {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }
        parse_gemini_response(&text)
    }
}

fn gemini_request_body(prompt: &str, temperature: f32) -> serde_json::Value {
    serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": { "temperature": temperature }
    })
}

/// Concatenates `candidates[0].content.parts[*].text`.
fn parse_gemini_response(body: &str) -> Result<String, RefineError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RefineError::Malformed(e.to_string()))?;
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| RefineError::Malformed("no candidate parts".to_string()))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        Err(RefineError::Empty)
    } else {
        Ok(text)
    }
}
