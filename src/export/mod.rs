use anyhow::Result;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// File formats offered by the "Create File" flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    Docx,
    Pdf,
    Py,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Py => "py",
            ExportFormat::Txt => "txt",
        }
    }
}

/// Document-encoder boundary. The core hands the body over and sends
/// whatever bytes come back; PDF and Word encoders are external
/// collaborators plugged in behind this trait.
pub trait DocumentRenderer: Send + Sync {
    fn supports(&self, format: ExportFormat) -> bool;
    fn render(&self, format: ExportFormat, body: &str) -> Result<Vec<u8>>;
}

/// Renderer for the formats that are plain bytes already.
pub struct PlainTextRenderer;

impl DocumentRenderer for PlainTextRenderer {
    fn supports(&self, format: ExportFormat) -> bool {
        matches!(format, ExportFormat::Txt | ExportFormat::Py)
    }

    fn render(&self, format: ExportFormat, body: &str) -> Result<Vec<u8>> {
        if !self.supports(format) {
            anyhow::bail!("no renderer configured for .{}", format.extension());
        }
        Ok(body.as_bytes().to_vec())
    }
}

/// Formats the renderer can actually produce, in menu order.
#[must_use]
pub fn offered_formats(renderer: &dyn DocumentRenderer) -> Vec<ExportFormat> {
    ExportFormat::iter()
        .filter(|format| renderer.supports(*format))
        .collect()
}

/// Pull the body of the first fenced code block, if the text has one;
/// otherwise the full text. Mirrors how users save code snippets out of
/// assistant replies.
#[must_use]
pub fn export_body(content: &str) -> &str {
    let Some(open) = content.find("```") else {
        return content;
    };
    let after_fence = &content[open + 3..];

    // Skip the optional language tag on the fence line.
    let Some(newline) = after_fence.find('\n') else {
        return content;
    };
    let body_start = &after_fence[newline + 1..];

    match body_start.find("```") {
        Some(close) => &body_start[..close],
        None => content,
    }
}

/// Timestamped export file name, e.g. `file_142233.txt`.
#[must_use]
pub fn export_file_name(format: ExportFormat) -> String {
    let stamp = chrono::Utc::now().format("%H%M%S");
    format!("file_{stamp}.{}", format.extension())
}
