//! Token extraction from inbound email metadata.
//!
//! Compiled-regex recognizers for structured ids, part/serial numbers,
//! attachment classes and vendor signals. No cross-record state: the same
//! input always yields the same tokens.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::AttachmentMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    WoId,
    PoId,
    EqId,
    FaultId,
    InvoiceId,
    QuoteId,
    UuidId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    PartNumber,
    SerialNumber,
    OemNumber,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentSignals {
    pub procurement: Vec<String>,
    pub service: Vec<String>,
    pub technical: Vec<String>,
    pub other: Vec<String>,
}

impl AttachmentSignals {
    pub fn any_classified(&self) -> bool {
        !self.procurement.is_empty() || !self.service.is_empty() || !self.technical.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSignals {
    pub sender_domain: String,
    pub sender_hash: String,
    pub is_personal_domain: bool,
    pub participant_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedTokens {
    pub ids: BTreeMap<IdKind, Vec<String>>,
    pub parts: BTreeMap<PartKind, Vec<String>>,
    pub attachments: AttachmentSignals,
    pub vendor: Option<VendorSignals>,
}

static ID_PATTERNS: Lazy<Vec<(IdKind, Regex)>> = Lazy::new(|| {
    vec![
        (IdKind::WoId, Regex::new(r"(?i)\b(?:WO[-#]?|Work\s*Order[-#:\s]*)(\d{1,6})\b").unwrap()),
        (IdKind::PoId, Regex::new(r"(?i)\b(?:PO[-#]?|Purchase\s*Order[-#:\s]*)(\d{1,6})\b").unwrap()),
        (IdKind::EqId, Regex::new(r"(?i)\b(?:EQ[-#]?)(\d{1,6})\b").unwrap()),
        (IdKind::FaultId, Regex::new(r"(?i)\b(?:FAULT[-#:\s]*)(\d{1,6})\b").unwrap()),
        (IdKind::InvoiceId, Regex::new(r"(?i)\b(?:INV[-#]?|Invoice[-#:\s]*)(\d{1,10})\b").unwrap()),
        (IdKind::QuoteId, Regex::new(r"(?i)\b(?:QU?[-#]?|Quote[-#:\s]*)(\d{1,10})\b").unwrap()),
        (
            IdKind::UuidId,
            Regex::new(
                r"(?i)\b([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\b",
            )
            .unwrap(),
        ),
    ]
});

static PART_PATTERNS: Lazy<Vec<(PartKind, Regex)>> = Lazy::new(|| {
    vec![
        // 2-4 letters, optional dashes, 3-8 digits, optional suffix.
        (
            PartKind::PartNumber,
            Regex::new(r"\b([A-Z]{2,4}-?\d{3,8}(?:-[A-Z0-9]{1,4})?)\b").unwrap(),
        ),
        (
            PartKind::SerialNumber,
            Regex::new(r"(?i)\b(?:S/?N|Serial)[-:\s]*([A-Z0-9]{6,20})\b").unwrap(),
        ),
        (
            PartKind::OemNumber,
            Regex::new(r"(?i)\b(?:OEM|Original)[-:\s]*([A-Z0-9-]{5,20})\b").unwrap(),
        ),
    ]
});

static PROCUREMENT_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)quote|quotation|proforma|estimate|invoice|inv[-_]|billing|receipt|payment|purchase[-_]?order|po[-_]|pricing|price[-_]?list|catalog").unwrap()
});

static SERVICE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)service[-_]?report|job[-_]?sheet|work[-_]?report|completion|sign[-_]?off|handover|certificate|cert[-_]|inspection|survey|audit").unwrap()
});

static TECHNICAL_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)manual|handbook|guide|datasheet|data[-_]?sheet|spec|drawing|diagram|schematic").unwrap()
});

/// Tokens that match the part-number shape but never are one.
const FALSE_POSITIVE_TOKENS: &[&str] = &[
    "RE", "FW", "FWD", "PDF", "DOC", "DOCX", "XLS", "XLSX", "PNG", "JPG", "JPEG", "GIF", "ZIP",
    "RAR",
];

pub struct TokenExtractor {
    personal_domains: Vec<String>,
}

impl TokenExtractor {
    pub fn new(personal_domains: Vec<String>) -> Self {
        Self { personal_domains }
    }

    pub fn extract_all(
        &self,
        subject: &str,
        from_address: &str,
        attachments: &[AttachmentMeta],
        participant_hashes: &[String],
    ) -> ExtractedTokens {
        let mut tokens = ExtractedTokens {
            ids: extract_ids(subject),
            parts: extract_part_numbers(subject),
            ..ExtractedTokens::default()
        };

        for attachment in attachments {
            for (kind, values) in extract_part_numbers(&attachment.name) {
                let entry = tokens.parts.entry(kind).or_default();
                for v in values {
                    if !entry.contains(&v) {
                        entry.push(v);
                    }
                }
            }
        }
        tokens.attachments = classify_attachments(attachments);
        tokens.vendor = self.vendor_signals(from_address, participant_hashes);

        tokens
    }

    fn vendor_signals(
        &self,
        from_address: &str,
        participant_hashes: &[String],
    ) -> Option<VendorSignals> {
        let (_, domain) = from_address.split_once('@')?;
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() {
            return None;
        }

        let email_lower = from_address.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(email_lower.as_bytes());
        let sender_hash = hex::encode(hasher.finalize());

        Some(VendorSignals {
            is_personal_domain: self.personal_domains.iter().any(|d| d == &domain),
            sender_domain: domain,
            sender_hash,
            participant_hashes: participant_hashes.to_vec(),
        })
    }
}

pub fn extract_ids(text: &str) -> BTreeMap<IdKind, Vec<String>> {
    let mut out = BTreeMap::new();
    for (kind, pattern) in ID_PATTERNS.iter() {
        let mut values: Vec<String> = Vec::new();
        for caps in pattern.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let v = m.as_str().to_string();
                if !values.contains(&v) {
                    values.push(v);
                }
            }
        }
        if !values.is_empty() {
            out.insert(*kind, values);
        }
    }
    out
}

pub fn extract_part_numbers(text: &str) -> BTreeMap<PartKind, Vec<String>> {
    let mut out = BTreeMap::new();
    for (kind, pattern) in PART_PATTERNS.iter() {
        let mut values: Vec<String> = Vec::new();
        for caps in pattern.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let v = m.as_str().to_string();
                if is_false_positive(&v, *kind) || values.contains(&v) {
                    continue;
                }
                values.push(v);
            }
        }
        if !values.is_empty() {
            out.insert(*kind, values);
        }
    }
    out
}

fn is_false_positive(value: &str, kind: PartKind) -> bool {
    let upper = value.to_uppercase();
    if FALSE_POSITIVE_TOKENS.contains(&upper.as_str()) {
        return true;
    }
    // Serial numbers need both letters and digits.
    if kind == PartKind::SerialNumber {
        let has_letter = value.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = value.chars().any(|c| c.is_ascii_digit());
        if !(has_letter && has_digit) {
            return true;
        }
    }
    false
}

pub fn classify_attachments(attachments: &[AttachmentMeta]) -> AttachmentSignals {
    let mut signals = AttachmentSignals::default();
    for attachment in attachments {
        let name = attachment.name.as_str();
        if name.is_empty() {
            continue;
        }
        if PROCUREMENT_FILE.is_match(name) {
            signals.procurement.push(name.to_string());
        } else if SERVICE_FILE.is_match(name) {
            signals.service.push(name.to_string());
        } else if TECHNICAL_FILE.is_match(name) {
            signals.technical.push(name.to_string());
        } else {
            signals.other.push(name.to_string());
        }
    }
    signals
}

impl ExtractedTokens {
    /// Highest-priority explicit id: WO > PO > fault > equipment > quote > invoice.
    pub fn primary_id(&self) -> Option<(IdKind, &str)> {
        for kind in [
            IdKind::WoId,
            IdKind::PoId,
            IdKind::FaultId,
            IdKind::EqId,
            IdKind::QuoteId,
            IdKind::InvoiceId,
        ] {
            if let Some(values) = self.ids.get(&kind)
                && let Some(first) = values.first()
            {
                return Some((kind, first));
            }
        }
        None
    }

    pub fn has_procurement_signal(&self) -> bool {
        self.ids.contains_key(&IdKind::PoId)
            || self.ids.contains_key(&IdKind::QuoteId)
            || self.ids.contains_key(&IdKind::InvoiceId)
            || !self.attachments.procurement.is_empty()
    }

    pub fn has_service_signal(&self) -> bool {
        self.ids.contains_key(&IdKind::WoId)
            || self.ids.contains_key(&IdKind::FaultId)
            || !self.attachments.service.is_empty()
    }
}
