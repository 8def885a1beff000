//! Typed model for the PDQ summary documents read from the document store.
//!
//! Two document types exist: cancer information summaries (CIS) and drug
//! information summaries (DIS), each available in English and Spanish.
//! The model is immutable for the duration of a push run.

use serde::{Deserialize, Serialize};

/// CDR document identifier.
pub type DocId = u64;

/// The two PDQ summary types the CMS accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Cis,
    Dis,
}

impl DocType {
    /// Drupal content type name for this summary type.
    pub fn content_type(&self) -> &'static str {
        match self {
            DocType::Cis => "pdq_cancer_information_summary",
            DocType::Dis => "pdq_drug_information_summary",
        }
    }

    /// Tail segment of the PDQ API route, doubling as the store directory name.
    pub fn api_segment(&self) -> &'static str {
        match self {
            DocType::Cis => "cis",
            DocType::Dis => "dis",
        }
    }
}

impl std::str::FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cis" => Ok(DocType::Cis),
            "dis" => Ok(DocType::Dis),
            other => Err(format!("unknown summary type {other:?} (expected cis or dis)")),
        }
    }
}

/// One row of the document catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: DocId,
    pub doc_type: DocType,
    pub langcode: String,
}

impl CatalogEntry {
    /// Stable catalog order: English before Spanish, then type, then id.
    pub fn sort_key(&self) -> (&str, DocType, DocId) {
        (&self.langcode, self.doc_type, self.id)
    }
}

/// Delivery tier; only affects which Akamai host media URLs point at.
#[derive(Debug, Clone)]
pub struct Tier(String);

impl Tier {
    pub fn new(name: &str) -> Self {
        Tier(name.to_lowercase())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Suffix substituted for the media tier placeholder in generated HTML.
    /// Production links carry no suffix.
    pub fn media_suffix(&self) -> String {
        if self.0 == "prod" {
            String::new()
        } else {
            format!("-{}", self.0)
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier("prod".to_string())
    }
}

/// A summary document loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub langcode: String,
    pub content: DocContent,
}

impl Document {
    pub fn doc_type(&self) -> DocType {
        match self.content {
            DocContent::Cis(_) => DocType::Cis,
            DocContent::Dis(_) => DocType::Dis,
        }
    }
}

/// Typed body of a summary document, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocContent {
    Cis(CisDoc),
    Dis(DisDoc),
}

/// Cancer information summary content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CisDoc {
    pub title: String,
    pub browser_title: String,
    #[serde(default)]
    pub cthp_card_title: Option<String>,
    pub description: String,
    pub summary_type: String,
    pub audience: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub translation_of: Option<DocId>,
    #[serde(default)]
    pub posted_date: Option<String>,
    #[serde(default)]
    pub updated_date: Option<String>,
    #[serde(default)]
    pub svpc: bool,
    #[serde(default)]
    pub suppress_otp: bool,
    #[serde(default)]
    pub intro_text: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// One top-level summary section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub html: String,
}

/// Drug information summary content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisDoc {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
    #[serde(default)]
    pub updated_date: Option<String>,
    #[serde(default)]
    pub pronunciation: Option<String>,
    /// Media reference for the English audio pronunciation clip,
    /// e.g. "CDR0000812345.mp3".
    #[serde(default)]
    pub audio_ref: Option<String>,
    pub body: String,
}
