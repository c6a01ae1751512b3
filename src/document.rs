//! Loaded documents, their page thumbnails, and page selection.

use crate::error::AgentFlowError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

static RE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(image/(?:png|jpeg|jpg));base64,").expect("data-url pattern is valid")
});

/// A rasterised page image, base64-encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    pub mime_type: String,
    /// Base64 payload without any `data:` prefix.
    pub data: String,
}

impl PageImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// A base64 JPEG.
    pub fn jpeg(data: impl Into<String>) -> Self {
        Self::new(data, "image/jpeg")
    }

    /// Accept either a bare base64 payload or a `data:image/...;base64,` URL.
    ///
    /// Bare payloads are assumed to be JPEG.
    pub fn from_data_url(url: &str) -> Self {
        match RE_DATA_URL.captures(url) {
            Some(caps) => {
                let mime = match &caps[1] {
                    "image/jpg" => "image/jpeg",
                    other => other,
                };
                let prefix_len = caps.get(0).map_or(0, |m| m.end());
                Self::new(&url[prefix_len..], mime)
            }
            None => Self::jpeg(url),
        }
    }

    /// `data:<mime>;base64,<data>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("<{} bytes base64>", self.data.len()))
            .finish()
    }
}

/// One page of a loaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPage {
    /// 1-based.
    pub page_number: usize,
    pub thumbnail: PageImage,
    pub selected: bool,
    /// Cached transcription from the most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

impl PdfPage {
    pub fn new(page_number: usize, thumbnail: PageImage) -> Self {
        Self {
            page_number,
            thumbnail,
            selected: false,
            extracted_text: None,
        }
    }
}

/// The pages of one loaded PDF, in ascending page order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source: Option<PathBuf>,
    pages: Vec<PdfPage>,
}

impl Document {
    /// Build a document; pages are sorted by page number.
    pub fn new(source: Option<PathBuf>, mut pages: Vec<PdfPage>) -> Self {
        pages.sort_by_key(|p| p.page_number);
        pages.dedup_by_key(|p| p.page_number);
        Self { source, pages }
    }

    pub fn pages(&self) -> &[PdfPage] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, page_number: usize) -> Option<&PdfPage> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    fn page_mut(&mut self, page_number: usize) -> Result<&mut PdfPage, AgentFlowError> {
        let total = self.pages.len();
        self.pages
            .iter_mut()
            .find(|p| p.page_number == page_number)
            .ok_or(AgentFlowError::PageOutOfRange {
                page: page_number,
                total,
            })
    }

    /// Flip one page's selection; returns the new state.
    pub fn toggle(&mut self, page_number: usize) -> Result<bool, AgentFlowError> {
        let page = self.page_mut(page_number)?;
        page.selected = !page.selected;
        Ok(page.selected)
    }

    pub fn set_selected(&mut self, page_number: usize, selected: bool) -> Result<(), AgentFlowError> {
        self.page_mut(page_number)?.selected = selected;
        Ok(())
    }

    /// Select exactly `page_numbers`, clearing every other page.
    pub fn select_only(&mut self, page_numbers: &[usize]) -> Result<(), AgentFlowError> {
        let total = self.pages.len();
        if let Some(&missing) = page_numbers.iter().find(|&&n| self.page(n).is_none()) {
            return Err(AgentFlowError::PageOutOfRange {
                page: missing,
                total,
            });
        }
        for page in &mut self.pages {
            page.selected = page_numbers.contains(&page.page_number);
        }
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.pages.iter_mut().for_each(|p| p.selected = true);
    }

    pub fn clear_selection(&mut self) {
        self.pages.iter_mut().for_each(|p| p.selected = false);
    }

    /// Selected pages in ascending page order.
    pub fn selected_pages(&self) -> impl Iterator<Item = &PdfPage> {
        self.pages.iter().filter(|p| p.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.selected_pages().count()
    }

    /// Store a transcription against its page. Unknown pages are ignored.
    pub fn cache_extracted_text(&mut self, page_number: usize, text: &str) {
        if let Ok(page) = self.page_mut(page_number) {
            page.extracted_text = Some(text.to_string());
        }
    }
}
