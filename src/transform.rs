//! Conversion of summary documents into the Drupal CMS wire format.
//!
//! [`transform`] is a pure function of the document content and the
//! delivery tier: the same inputs always produce byte-identical JSON,
//! which is what makes local dumps diffable against real submissions.
//! Structural problems in a source document surface as [`TransformError`]
//! and fail only that document, never the run.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::document::{CisDoc, DisDoc, DocContent, DocId, DocType, Document, Tier};

/// Placeholder the upstream HTML carries for the Akamai media host suffix.
const MEDIA_TIER_TARGET: &str = "@@MEDIA-TIER@@";

const DESCRIPTION_MAX: usize = 600;
const BROWSER_TITLE_MAX: usize = 100;
const CTHP_CARD_TITLE_MAX: usize = 100;

/// Prefix stripped from Spanish summary URLs.
const SPANISH_URL_PREFIX: &str = "/espanol";

/// Host prefix stripped from drug summary URLs.
const DIS_URL_PREFIX: &str = "https://www.cancer.gov";

/// A structurally malformed source document. Per-document failure only.
#[derive(Debug, PartialEq, Eq)]
pub enum TransformError {
    MissingUrl(DocId),
    UntitledSection { id: DocId, index: usize },
    BadAudioRef { id: DocId, media_ref: String },
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::MissingUrl(id) => {
                write!(f, "CDR{id}: bad or missing summary URL")
            }
            TransformError::UntitledSection { id, index } => {
                write!(f, "CDR{id} missing title for section {index}")
            }
            TransformError::BadAudioRef { id, media_ref } => {
                write!(f, "CDR{id}: invalid audio ID {media_ref:?}")
            }
        }
    }
}

impl std::error::Error for TransformError {}

/// The JSON document the CMS ingestion API accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DraftPayload {
    Cis(CisPayload),
    Dis(DisPayload),
}

impl DraftPayload {
    pub fn cdr_id(&self) -> DocId {
        match self {
            DraftPayload::Cis(p) => p.cdr_id,
            DraftPayload::Dis(p) => p.cdr_id,
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            DraftPayload::Cis(_) => DocType::Cis,
            DraftPayload::Dis(_) => DocType::Dis,
        }
    }

    /// CDR id of the English original, when this is a translation.
    pub fn translation_of(&self) -> Option<DocId> {
        match self {
            DraftPayload::Cis(p) => p.translation_of,
            DraftPayload::Dis(_) => None,
        }
    }
}

/// Field set for a cancer information summary node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CisPayload {
    pub cdr_id: DocId,
    pub url: String,
    pub browser_title: String,
    pub cthp_card_title: String,
    pub translation_of: Option<DocId>,
    pub sections: Vec<SectionPayload>,
    pub title: String,
    pub description: String,
    pub summary_type: String,
    pub audience: String,
    pub language: String,
    pub posted_date: Option<String>,
    pub updated_date: Option<String>,
    #[serde(rename = "type")]
    pub content_type: String,
    pub suppress_otp: u8,
    pub svpc: u8,
    pub intro_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionPayload {
    pub title: String,
    pub id: String,
    pub html: String,
}

/// Field set for a drug information summary node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisPayload {
    pub cdr_id: DocId,
    pub title: String,
    pub description: String,
    pub url: String,
    pub posted_date: Option<String>,
    pub updated_date: Option<String>,
    pub pron: Option<String>,
    pub audio_id: Option<DocId>,
    pub body: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// Convert one document into the payload the CMS expects.
pub fn transform(doc: &Document, tier: &Tier) -> Result<DraftPayload, TransformError> {
    match &doc.content {
        DocContent::Cis(cis) => transform_cis(doc, cis, tier).map(DraftPayload::Cis),
        DocContent::Dis(dis) => transform_dis(doc, dis, tier).map(DraftPayload::Dis),
    }
}

fn transform_cis(doc: &Document, cis: &CisDoc, tier: &Tier) -> Result<CisPayload, TransformError> {
    let url = cis
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or(TransformError::MissingUrl(doc.id))?;
    let url = url.strip_prefix(SPANISH_URL_PREFIX).unwrap_or(url);

    let suffix = tier.media_suffix();
    let mut sections = Vec::with_capacity(cis.sections.len());
    for (i, section) in cis.sections.iter().enumerate() {
        // Untitled sections are only tolerated on standalone (SVPC) pages.
        if section.title.trim().is_empty() && !cis.svpc {
            return Err(TransformError::UntitledSection {
                id: doc.id,
                index: i + 1,
            });
        }
        sections.push(SectionPayload {
            title: section.title.clone(),
            id: section
                .id
                .strip_prefix("_section")
                .unwrap_or(&section.id)
                .to_string(),
            html: section.html.replace(MEDIA_TIER_TARGET, &suffix),
        });
    }

    let browser_title = clip(&cis.browser_title, BROWSER_TITLE_MAX, "browser_title", doc.id);
    let cthp_card_title = clip(
        cis.cthp_card_title.as_deref().unwrap_or(&cis.browser_title),
        CTHP_CARD_TITLE_MAX,
        "cthp_card_title",
        doc.id,
    );

    Ok(CisPayload {
        cdr_id: doc.id,
        url: url.to_string(),
        browser_title,
        cthp_card_title,
        translation_of: cis.translation_of,
        sections,
        title: cis.title.clone(),
        description: clip(&cis.description, DESCRIPTION_MAX, "description", doc.id),
        summary_type: cis.summary_type.clone(),
        audience: cis.audience.replace(" prof", " Prof"),
        language: doc.langcode.clone(),
        posted_date: cis.posted_date.clone(),
        updated_date: cis.updated_date.clone(),
        content_type: DocType::Cis.content_type().to_string(),
        suppress_otp: u8::from(cis.suppress_otp),
        svpc: u8::from(cis.svpc),
        intro_text: cis
            .intro_text
            .as_ref()
            .map(|t| t.replace(MEDIA_TIER_TARGET, &suffix)),
    })
}

fn transform_dis(doc: &Document, dis: &DisDoc, tier: &Tier) -> Result<DisPayload, TransformError> {
    let url = dis
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or(TransformError::MissingUrl(doc.id))?;
    let url = url.strip_prefix(DIS_URL_PREFIX).unwrap_or(url);

    let audio_id = match dis.audio_ref.as_deref() {
        Some(media_ref) => Some(extract_media_id(media_ref).ok_or_else(|| {
            TransformError::BadAudioRef {
                id: doc.id,
                media_ref: media_ref.to_string(),
            }
        })?),
        None => None,
    };

    Ok(DisPayload {
        cdr_id: doc.id,
        title: dis.title.clone(),
        description: clip(&dis.description, DESCRIPTION_MAX, "description", doc.id),
        url: url.to_string(),
        posted_date: dis.posted_date.clone(),
        updated_date: dis.updated_date.clone(),
        pron: dis.pronunciation.clone(),
        audio_id,
        body: dis.body.replace(MEDIA_TIER_TARGET, &tier.media_suffix()),
        content_type: DocType::Dis.content_type().to_string(),
    })
}

/// Truncate an over-long field, logging what was lost.
fn clip(value: &str, max: usize, field: &str, id: DocId) -> String {
    if value.chars().count() > max {
        warn!(cdr_id = id, field, max, "Truncating over-long field");
        value.chars().take(max).collect()
    } else {
        value.to_string()
    }
}

/// Pull the CDR id out of a media reference, ignoring fragment suffixes.
fn extract_media_id(raw: &str) -> Option<DocId> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("literal pattern"));
    let head = raw.split('#').next().unwrap_or("");
    let digits: String = re.find_iter(head).map(|m| m.as_str()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
