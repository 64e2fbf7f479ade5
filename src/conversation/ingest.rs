use crate::conversation::clear_photo_context;
use crate::error::IngestError;
use crate::session::{ChatTurn, UserSession};

/// Character budget for ingested document text.
pub const DOC_CHAR_BUDGET: usize = 8000;

/// Decoded-document boundary: the core never parses PDF or Word itself.
/// Implementations turn raw bytes into plain text; the bridge below handles
/// normalization, truncation and history injection.
pub trait DocumentExtractor: Send + Sync {
    fn accepts(&self, file_name: &str) -> bool;
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestError>;
}

/// Pass-through extractor for plain-text uploads.
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn accepts(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        lowered.ends_with(".txt") || lowered.ends_with(".py")
    }

    fn extract(&self, _file_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// HTML extractor: body text without script/style noise.
pub struct HtmlExtractor;

impl DocumentExtractor for HtmlExtractor {
    fn accepts(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        lowered.ends_with(".html") || lowered.ends_with(".htm")
    }

    fn extract(&self, _file_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let html = String::from_utf8_lossy(bytes);
        let document = scraper::Html::parse_document(&html);

        let selector = scraper::Selector::parse("body")
            .map_err(|e| IngestError::Extraction(format!("body selector: {e:?}")))?;
        let noise = scraper::Selector::parse("script, style")
            .map_err(|e| IngestError::Extraction(format!("noise selector: {e:?}")))?;

        let Some(body) = document.select(&selector).next() else {
            return Ok(String::new());
        };

        let noisy: std::collections::HashSet<_> =
            body.select(&noise).flat_map(|el| el.text()).collect();

        let text = body
            .text()
            .filter(|fragment| !noisy.contains(fragment))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }
}

/// Run the first extractor that claims the file.
pub fn extract_document(
    extractors: &[Box<dyn DocumentExtractor>],
    file_name: &str,
    bytes: &[u8],
) -> Result<String, IngestError> {
    extractors
        .iter()
        .find(|extractor| extractor.accepts(file_name))
        .ok_or_else(|| IngestError::Unsupported(file_name.to_string()))?
        .extract(file_name, bytes)
}

/// Normalize decoded text: trim each line, break runs of double-space
/// separated phrases onto their own lines, drop empties.
#[must_use]
pub fn normalize_extracted_text(raw: &str) -> String {
    raw.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        text.to_string()
    } else {
        text.chars().take(budget).collect()
    }
}

/// Inject normalized document text as a system-role history entry with a
/// provenance header. Document context supersedes photo context, so the
/// photo window is cleared first.
pub fn ingest_document(session: &mut UserSession, file_name: &str, decoded_text: &str) {
    clear_photo_context(session);

    let clean = truncate_chars(&normalize_extracted_text(decoded_text), DOC_CHAR_BUDGET);
    let entry = format!("User uploaded '{file_name}'. CONTENT:\n{clean}");
    session.push_turn(ChatTurn::system(entry));
}

#[cfg(test)]
mod tests {
    use super::{
        DOC_CHAR_BUDGET, DocumentExtractor, HtmlExtractor, PlainTextExtractor, extract_document,
        ingest_document, normalize_extracted_text,
    };
    use crate::session::{TurnRole, UserSession};

    fn session() -> UserSession {
        UserSession::new(42, "Ada", "2024-06")
    }

    #[test]
    fn normalize_trims_and_splits_double_spaced_phrases() {
        let raw = "  first phrase  second phrase  \n\n   third\n";
        assert_eq!(
            normalize_extracted_text(raw),
            "first phrase\nsecond phrase\nthird"
        );
    }

    #[test]
    fn ingest_truncates_to_budget_with_header() {
        let mut session = session();
        let long_text = "x".repeat(DOC_CHAR_BUDGET * 2);

        ingest_document(&mut session, "notes.txt", &long_text);

        let entry = session.history.last().unwrap();
        assert_eq!(entry.role, TurnRole::System);
        assert!(entry.content.starts_with("User uploaded 'notes.txt'."));
        let body = entry.content.split_once("CONTENT:\n").unwrap().1;
        assert_eq!(body.chars().count(), DOC_CHAR_BUDGET);
    }

    #[test]
    fn ingest_clears_photo_context() {
        let mut session = session();
        session.attached_photos.push("file-1".into());
        session.photo_turn_counter = 2;

        ingest_document(&mut session, "notes.txt", "hello");

        assert!(session.attached_photos.is_empty());
        assert_eq!(session.photo_turn_counter, 0);
    }

    #[test]
    fn plain_text_extractor_accepts_txt_and_py() {
        let extractor = PlainTextExtractor;
        assert!(extractor.accepts("notes.TXT"));
        assert!(extractor.accepts("script.py"));
        assert!(!extractor.accepts("report.pdf"));
    }

    #[test]
    fn html_extractor_drops_script_and_style_text() {
        let html = b"<html><head><style>body { color: red }</style></head>\
<body><p>visible text</p><script>var hidden = 1;</script></body></html>";

        let text = HtmlExtractor.extract("page.html", html).unwrap();

        assert!(text.contains("visible text"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let extractors: Vec<Box<dyn DocumentExtractor>> =
            vec![Box::new(PlainTextExtractor), Box::new(HtmlExtractor)];

        let err = extract_document(&extractors, "image.exe", b"bytes").unwrap_err();
        assert!(err.to_string().contains("image.exe"));
    }

    #[test]
    fn registry_routes_to_matching_extractor() {
        let extractors: Vec<Box<dyn DocumentExtractor>> =
            vec![Box::new(PlainTextExtractor), Box::new(HtmlExtractor)];

        let text = extract_document(&extractors, "notes.txt", b"plain body").unwrap();
        assert_eq!(text, "plain body");
    }
}
