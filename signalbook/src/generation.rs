//! AI content and image generation
//!
//! A [`ContentGenerator`] produces slide HTML for a topic and illustrations as
//! Base64 data URIs. [`generate_slide`] and [`illustrate_block`] apply the
//! results through the [`TocManager`], so generated content follows the same
//! path as hand-written content.

use crate::content_model::ContentBlock;
use crate::manager::TocManager;
use crate::notify::Notification;
use crate::remote::read_json;
use crate::render::escape_html;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Errors that can occur while generating content
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    Transport(String),

    #[error("Generator responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),

    #[error("Generated image is not a Base64 data URI: {0}")]
    InvalidImage(String),

    #[error("No {0} generator endpoint configured")]
    NotConfigured(&'static str),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Source of generated slides and illustrations
pub trait ContentGenerator: Send + Sync {
    /// HTML for a slide about `topic`, placed in a section titled `context`
    fn generate_content(&self, topic: &str, context: &str) -> Result<String, GenerationError>;

    /// An illustration of `topic` as a `data:image/...;base64,` URI
    fn generate_image(&self, topic: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ContentRequest<'a> {
    topic: &'a str,
    context: &'a str,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    html: String,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    topic: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    image_data_uri: String,
}

/// [`ContentGenerator`] calling JSON endpoints over HTTP
///
/// The content endpoint receives `{"topic", "context"}` and answers
/// `{"html"}`; the image endpoint receives `{"topic"}` and answers
/// `{"imageDataUri"}`.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    content_url: Option<String>,
    image_url: Option<String>,
    agent: ureq::Agent,
}

impl HttpGenerator {
    /// Generator with optional content and image endpoints
    pub fn new(content_url: Option<String>, image_url: Option<String>) -> Self {
        Self {
            content_url,
            image_url,
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: &str,
        request: &Req,
    ) -> Result<Resp, GenerationError> {
        let body = serde_json::to_string(request)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let response = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => GenerationError::Status {
                    status,
                    message: crate::remote::error_message(
                        &response.into_string().unwrap_or_default(),
                    ),
                },
                ureq::Error::Transport(transport) => {
                    GenerationError::Transport(transport.to_string())
                }
            })?;

        read_json(response).map_err(|e| {
            if e.is_io() {
                GenerationError::Transport(e.to_string())
            } else {
                GenerationError::InvalidResponse(e.to_string())
            }
        })
    }
}

impl ContentGenerator for HttpGenerator {
    fn generate_content(&self, topic: &str, context: &str) -> Result<String, GenerationError> {
        let url = self
            .content_url
            .as_deref()
            .ok_or(GenerationError::NotConfigured("content"))?;
        let response: ContentResponse = self.post(url, &ContentRequest { topic, context })?;
        Ok(response.html)
    }

    fn generate_image(&self, topic: &str) -> Result<String, GenerationError> {
        let url = self
            .image_url
            .as_deref()
            .ok_or(GenerationError::NotConfigured("image"))?;
        let response: ImageResponse = self.post(url, &ImageRequest { topic })?;
        Ok(response.image_data_uri)
    }
}

/// Check that `uri` is a `data:image/<type>;base64,<payload>` URI whose
/// payload decodes
pub fn validate_data_uri(uri: &str) -> Result<(), GenerationError> {
    let invalid = |reason: &str| GenerationError::InvalidImage(reason.to_string());

    let rest = uri
        .strip_prefix("data:image/")
        .ok_or_else(|| invalid("missing data:image/ prefix"))?;
    let (subtype, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| invalid("missing ;base64, marker"))?;

    if subtype.is_empty() || subtype.contains(|c: char| c.is_whitespace() || c == ',') {
        return Err(invalid("invalid image type"));
    }
    if payload.is_empty() {
        return Err(invalid("empty payload"));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| invalid(&format!("payload does not decode: {}", e)))?;
    Ok(())
}

static HEADING_END: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Get or compile the closing `</h2>` pattern
fn heading_end() -> Result<&'static Regex, regex::Error> {
    HEADING_END
        .get_or_init(|| Regex::new(r"(?i)</h2\s*>"))
        .as_ref()
        .map_err(Clone::clone)
}

/// Insert an `<img>` right after the first `</h2>`, or at the end when the
/// HTML has no heading
pub fn splice_image(html: &str, data_uri: &str, alt: &str) -> Result<String, GenerationError> {
    let img = format!(
        "<img src=\"{}\" alt=\"{}\" class=\"mx-auto my-4 rounded-lg\">",
        escape_html(data_uri),
        escape_html(alt)
    );

    let spliced = match heading_end()?.find(html) {
        Some(found) => format!("{}{}{}", &html[..found.end()], img, &html[found.end()..]),
        None => format!("{}{}", html, img),
    };
    Ok(spliced)
}

/// Generate a slide about `topic` and append it to a section
///
/// The section title is passed to the generator as context. Returns
/// `Ok(None)` without calling the generator when the section does not
/// exist. Failures are reported to the user and nothing is added.
pub fn generate_slide(
    manager: &mut TocManager,
    generator: &dyn ContentGenerator,
    section_id: &str,
    topic: &str,
) -> Result<Option<ContentBlock>, GenerationError> {
    let Some(context) = manager.section(section_id).map(|s| s.title.clone()) else {
        log::debug!("generate_slide: no section {}", section_id);
        return Ok(None);
    };

    let html = generator
        .generate_content(topic, &context)
        .and_then(|html| {
            let html = html.trim().to_string();
            if html.is_empty() {
                Err(GenerationError::InvalidResponse("empty html".to_string()))
            } else {
                Ok(html)
            }
        })
        .map_err(|e| report_failure(manager, "Generation failed", e))?;

    log::info!("Generated slide for \"{}\" in section {}", topic, section_id);
    Ok(manager.add_block(section_id, &html))
}

/// Generate an illustration of `topic` and splice it into a block
///
/// Returns `Ok(false)` when the block does not exist.
pub fn illustrate_block(
    manager: &mut TocManager,
    generator: &dyn ContentGenerator,
    section_id: &str,
    block_id: &str,
    topic: &str,
) -> Result<bool, GenerationError> {
    let Some(html) = manager
        .section(section_id)
        .and_then(|s| s.block(block_id))
        .map(|b| b.html.clone())
    else {
        log::debug!("illustrate_block: no block {}/{}", section_id, block_id);
        return Ok(false);
    };

    let uri = generator
        .generate_image(topic)
        .and_then(|uri| validate_data_uri(&uri).map(|()| uri))
        .map_err(|e| report_failure(manager, "Image generation failed", e))?;

    let spliced = splice_image(&html, &uri, topic)?;
    Ok(manager.edit_block(section_id, block_id, &spliced))
}

fn report_failure(manager: &TocManager, title: &str, error: GenerationError) -> GenerationError {
    log::error!("{}: {}", title, error);
    manager
        .notifier()
        .notify(Notification::error(title, error.to_string()));
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::{Chapter, Section};
    use crate::notify::RecordingNotifier;
    use std::sync::{Arc, Mutex};

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[derive(Default)]
    struct FakeGenerator {
        html: Option<String>,
        image: Option<String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ContentGenerator for FakeGenerator {
        fn generate_content(&self, topic: &str, context: &str) -> Result<String, GenerationError> {
            self.calls
                .lock()
                .unwrap()
                .push((topic.to_string(), context.to_string()));
            self.html
                .clone()
                .ok_or_else(|| GenerationError::Transport("model unavailable".to_string()))
        }

        fn generate_image(&self, topic: &str) -> Result<String, GenerationError> {
            self.calls
                .lock()
                .unwrap()
                .push((topic.to_string(), String::new()));
            self.image
                .clone()
                .ok_or_else(|| GenerationError::Transport("model unavailable".to_string()))
        }
    }

    fn manager() -> (TocManager, RecordingNotifier) {
        let recorder = RecordingNotifier::new();
        let toc = vec![Chapter::new(
            "2",
            "SISTEMAS LTI",
            vec![Section::new(
                "2.1",
                "Convolución",
                vec![ContentBlock::new("b", "<h2>Suma</h2><p>texto</p>")],
            )],
        )];
        (TocManager::new(toc, Arc::new(recorder.clone())), recorder)
    }

    #[test]
    fn test_generate_slide_appends_block_with_section_context() {
        let (mut manager, _) = manager();
        let generator = FakeGenerator {
            html: Some("  <h2>Convolución</h2><p>$$y = x * h$$</p>\n".to_string()),
            ..Default::default()
        };

        let block = generate_slide(&mut manager, &generator, "2.1", "convolución discreta")
            .unwrap()
            .unwrap();

        assert_eq!(block.html, "<h2>Convolución</h2><p>$$y = x * h$$</p>");
        assert_eq!(manager.section("2.1").unwrap().content.len(), 2);
        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0], ("convolución discreta".to_string(), "Convolución".to_string()));
    }

    #[test]
    fn test_generate_slide_failure_adds_nothing() {
        let (mut manager, recorder) = manager();
        let generator = FakeGenerator::default();

        assert!(generate_slide(&mut manager, &generator, "2.1", "x").is_err());
        assert_eq!(manager.section("2.1").unwrap().content.len(), 1);
        assert_eq!(recorder.errors().len(), 1);
        assert_eq!(manager.revision(), 0);
    }

    #[test]
    fn test_generate_slide_unknown_section_skips_generator() {
        let (mut manager, _) = manager();
        let generator = FakeGenerator::default();
        assert!(generate_slide(&mut manager, &generator, "9.9", "x").unwrap().is_none());
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_illustrate_block_splices_after_heading() {
        let (mut manager, _) = manager();
        let generator = FakeGenerator {
            image: Some(PIXEL.to_string()),
            ..Default::default()
        };

        assert!(illustrate_block(&mut manager, &generator, "2.1", "b", "suma \"discreta\"").unwrap());

        let html = &manager.section("2.1").unwrap().content[0].html;
        assert!(html.starts_with(&format!("<h2>Suma</h2><img src=\"{}\"", PIXEL)));
        assert!(html.contains("alt=\"suma &quot;discreta&quot;\""));
        assert!(html.ends_with("<p>texto</p>"));
    }

    #[test]
    fn test_illustrate_block_rejects_non_data_uri() {
        let (mut manager, recorder) = manager();
        let generator = FakeGenerator {
            image: Some("https://example.com/cat.png".to_string()),
            ..Default::default()
        };

        let result = illustrate_block(&mut manager, &generator, "2.1", "b", "x");
        assert!(matches!(result, Err(GenerationError::InvalidImage(_))));
        assert_eq!(recorder.errors().len(), 1);
        assert_eq!(
            manager.section("2.1").unwrap().content[0].html,
            "<h2>Suma</h2><p>texto</p>"
        );
    }

    #[test]
    fn test_splice_without_heading_appends() {
        let spliced = splice_image("<p>sin título</p>", PIXEL, "señal").unwrap();
        assert!(spliced.starts_with("<p>sin título</p><img "));

        let upper = splice_image("<H2 >A</H2 ><p>b</p>", PIXEL, "a").unwrap();
        assert!(upper.starts_with("<H2 >A</H2 ><img "));
    }

    #[test]
    fn test_validate_data_uri() {
        assert!(validate_data_uri(PIXEL).is_ok());
        assert!(validate_data_uri("data:image/png;base64,").is_err());
        assert!(validate_data_uri("data:image/png;base64,@@@").is_err());
        assert!(validate_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(validate_data_uri("data:image/;base64,aGk=").is_err());
    }
}
