//! Static HTML viewer for the document
//!
//! Renders the whole table of contents into one self-contained page:
//! - A navigation list mirroring the chapter/section tree
//! - Every section's blocks as slides, in reading order
//! - MathJax loaded from a CDN to typeset `$$...$$` formulas
//!
//! Block HTML is embedded as-is except for `<script>` elements, which are
//! removed.

use crate::content_model::{Chapter, Section};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors that can occur during rendering
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

const MATHJAX_URL: &str = "https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js";

/// Render the document as a complete HTML page
pub fn render_html(toc: &[Chapter], title: &str) -> Result<String, RenderError> {
    let cleaner = script_stripper()?;
    let mut output = String::new();

    write_html_header(&mut output, title);

    output.push_str("<body>\n");
    output.push_str("<nav class=\"toc\">\n");
    output.push_str(&format!("<h1>{}</h1>\n", escape_html(title)));
    output.push_str("<ul>\n");
    for chapter in toc {
        output.push_str(&format!(
            "<li class=\"chapter\"><span>{} {}</span>\n",
            escape_html(&chapter.chapter),
            escape_html(&chapter.title)
        ));
        write_nav_list(&mut output, &chapter.sections);
        output.push_str("</li>\n");
    }
    output.push_str("</ul>\n");
    output.push_str("</nav>\n");

    output.push_str("<main>\n");
    for chapter in toc {
        output.push_str(&format!(
            "<h1 class=\"chapter-title\">{} {}</h1>\n",
            escape_html(&chapter.chapter),
            escape_html(&chapter.title)
        ));
        for section in chapter.flatten() {
            write_section(&mut output, section, cleaner);
        }
    }
    output.push_str("</main>\n");

    output.push_str("</body>\n");
    output.push_str("</html>\n");

    Ok(output)
}

/// Render the document and write it to `output_path`
pub fn write_html(toc: &[Chapter], title: &str, output_path: &Path) -> Result<(), RenderError> {
    let output = render_html(toc, title)?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, output)?;

    log::info!("Wrote viewer to {}", output_path.display());
    Ok(())
}

/// Remove `<script>` elements from block HTML
pub fn strip_scripts(html: &str) -> Result<String, RenderError> {
    Ok(script_stripper()?.strip(html))
}

static SCRIPT_STRIPPER: OnceLock<Result<ScriptStripper, regex::Error>> = OnceLock::new();

/// Get or compile the shared script patterns
fn script_stripper() -> Result<&'static ScriptStripper, regex::Error> {
    SCRIPT_STRIPPER
        .get_or_init(ScriptStripper::new)
        .as_ref()
        .map_err(Clone::clone)
}

struct ScriptStripper {
    element: Regex,
    stray_tag: Regex,
}

impl ScriptStripper {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            element: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>")?,
            stray_tag: Regex::new(r"(?i)</?script\b[^>]*>")?,
        })
    }

    fn strip(&self, html: &str) -> String {
        let without_elements = self.element.replace_all(html, "");
        self.stray_tag.replace_all(&without_elements, "").into_owned()
    }
}

fn write_html_header(output: &mut String, title: &str) {
    output.push_str("<!DOCTYPE html>\n");
    output.push_str("<html lang=\"es\">\n");
    output.push_str("<head>\n");
    output.push_str("<meta charset=\"UTF-8\">\n");
    output.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    output.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    output.push_str("<style>\n");
    output.push_str(CSS_STYLES);
    output.push_str("</style>\n");
    output.push_str(
        "<script>window.MathJax = { tex: { displayMath: [['$$', '$$'], ['\\\\[', '\\\\]']] } };</script>\n",
    );
    output.push_str(&format!(
        "<script id=\"MathJax-script\" async src=\"{}\"></script>\n",
        MATHJAX_URL
    ));
    output.push_str("</head>\n");
}

fn write_nav_list(output: &mut String, sections: &[Section]) {
    if sections.is_empty() {
        return;
    }
    output.push_str("<ul>\n");
    for section in sections {
        output.push_str(&format!(
            "<li><a href=\"#{}\">{} {}</a>",
            anchor(&section.id),
            escape_html(&section.id),
            escape_html(&section.title)
        ));
        write_nav_list(output, section.children());
        output.push_str("</li>\n");
    }
    output.push_str("</ul>\n");
}

fn write_section(output: &mut String, section: &Section, cleaner: &ScriptStripper) {
    output.push_str(&format!(
        "<section id=\"{}\" class=\"section\">\n",
        anchor(&section.id)
    ));
    output.push_str(&format!(
        "<div class=\"section-title\">{} {}</div>\n",
        escape_html(&section.id),
        escape_html(&section.title)
    ));
    for block in &section.content {
        output.push_str(&format!(
            "<div class=\"slide\" data-block-id=\"{}\">\n{}\n</div>\n",
            escape_html(&block.id),
            cleaner.strip(&block.html)
        ));
    }
    output.push_str("</section>\n");
}

fn anchor(section_id: &str) -> String {
    format!("section-{}", escape_html(section_id))
}

/// Escape HTML special characters
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Dark theme with indigo and violet accents
const CSS_STYLES: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: 'Inter', -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Roboto',
                 'Helvetica Neue', sans-serif;
    line-height: 1.6;
    color: #e4e4f0;
    background-color: #0f0f1a;
    display: flex;
}

nav.toc {
    width: 320px;
    height: 100vh;
    overflow-y: auto;
    position: sticky;
    top: 0;
    padding: 24px 16px;
    background-color: #16162a;
    border-right: 1px solid #2a2a45;
    font-size: 0.9em;
}

nav.toc h1 {
    font-size: 1.2em;
    color: #9381ff;
    margin-bottom: 16px;
}

nav.toc ul {
    list-style: none;
    padding-left: 12px;
}

nav.toc li.chapter > span {
    display: block;
    font-weight: 700;
    margin-top: 12px;
    color: #c8c0ff;
}

nav.toc a {
    color: #b8b8d0;
    text-decoration: none;
}

nav.toc a:hover {
    color: #9381ff;
}

main {
    flex: 1;
    max-width: 1000px;
    margin: 0 auto;
    padding: 40px;
}

.chapter-title {
    font-size: 2em;
    color: #9381ff;
    border-bottom: 3px solid #6949ff;
    padding-bottom: 8px;
    margin: 48px 0 24px;
}

.section {
    margin-bottom: 48px;
}

.section-title {
    font-size: 0.85em;
    text-transform: uppercase;
    letter-spacing: 0.08em;
    color: #8a8aa8;
    margin-bottom: 12px;
}

.slide {
    background-color: #1b1b30;
    border: 1px solid #2a2a45;
    border-radius: 8px;
    padding: 32px;
    margin-bottom: 24px;
}

.slide h2 {
    font-size: 1.8em;
    color: #ffffff;
    border-bottom: 2px solid #2a2a45;
    padding-bottom: 8px;
    margin-bottom: 16px;
}

.slide p {
    margin-bottom: 12px;
}

.slide img {
    display: block;
    max-width: 100%;
    margin: 16px auto;
    border-radius: 8px;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::ContentBlock;

    fn sample_toc() -> Vec<Chapter> {
        let mut s11 = Section::new(
            "1.1",
            "Señales",
            vec![ContentBlock::new("a", "<h2>Señales</h2><p>$$x(t)$$</p>")],
        );
        s11.subsections = Some(vec![Section::new(
            "1.1.1",
            "Ejemplos <básicos>",
            vec![ContentBlock::new(
                "b",
                "<p>antes</p><script>alert('x')</script><p>después</p>",
            )],
        )]);
        vec![Chapter::new("1", "SEÑALES Y SISTEMAS", vec![s11])]
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">"), "&lt;a href=&quot;x&quot;&gt;");
        assert_eq!(escape_html("R&D's"), "R&amp;D&#39;s");
    }

    #[test]
    fn test_strip_scripts() {
        let html = "<p>a</p><SCRIPT type=\"text/javascript\">\nlet x = '</p>';\n</SCRIPT ><p>b</p><script src=\"x.js\">";
        assert_eq!(strip_scripts(html).unwrap(), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_script_patterns_are_compiled_once() {
        let first = script_stripper().unwrap();
        let second = script_stripper().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.strip("<script>x</script><p>y</p>"), "<p>y</p>");
    }

    #[test]
    fn test_render_contains_nav_slides_and_mathjax() {
        let html = render_html(&sample_toc(), "Señales y Sistemas").unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<a href=\"#section-1.1.1\">1.1.1 Ejemplos &lt;básicos&gt;</a>"));
        assert!(html.contains("<section id=\"section-1.1\" class=\"section\">"));
        assert!(html.contains("<h2>Señales</h2><p>$$x(t)$$</p>"));
        assert!(html.contains("<p>antes</p><p>después</p>"));
        assert!(!html.contains("alert("));
        assert!(html.contains(MATHJAX_URL));

        // sections appear in reading order
        let parent = html.find("id=\"section-1.1\"").unwrap();
        let child = html.find("id=\"section-1.1.1\"").unwrap();
        assert!(parent < child);
    }

    #[test]
    fn test_write_html_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/viewer.html");
        write_html(&sample_toc(), "Libro", &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("<title>Libro</title>"));
    }
}
