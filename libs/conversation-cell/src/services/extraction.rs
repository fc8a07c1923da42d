// libs/conversation-cell/src/services/extraction.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

use crate::models::ChatMessage;

// Field names shared between the extractor and the workflow nodes.
pub mod fields {
    pub const NAME: &str = "name";
    pub const DATE_OF_BIRTH: &str = "date_of_birth";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const DOCTOR_PREFERENCE: &str = "doctor_preference";
    pub const SLOT_CHOICE: &str = "slot_choice";
    pub const CARRIER: &str = "carrier";
    pub const MEMBER_ID: &str = "member_id";
    pub const GROUP_NUMBER: &str = "group_number";
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub fields: HashMap<String, String>,
    pub still_missing: Vec<String>,
}

/// Oracle that pulls structured fields out of free-form patient messages.
/// Implementations may be arbitrarily clever; the workflow re-validates
/// anything safety-critical (dates in particular) before trusting it.
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    async fn extract(
        &self,
        context: &[ChatMessage],
        latest_message: &str,
        wanted_fields: &[&str],
    ) -> Extraction;
}

const KNOWN_CARRIERS: &[&str] = &[
    "BlueCross BlueShield",
    "Blue Cross Blue Shield",
    "BCBS",
    "UnitedHealthcare",
    "United Healthcare",
    "Aetna",
    "Cigna",
    "Humana",
    "Kaiser Permanente",
    "Kaiser",
    "Anthem",
    "Molina Healthcare",
    "Medicare",
    "Medicaid",
    "Tricare",
];

const DOCTOR_ROSTER: &[(&str, &str)] = &[
    ("johnson", "Dr. Johnson"),
    ("smith", "Dr. Smith"),
    ("williams", "Dr. Williams"),
    ("brown", "Dr. Brown"),
    ("davis", "Dr. Davis"),
];

const SPECIALTY_VOCABULARY: &[(&str, &str)] = &[
    ("family medicine", "Family Medicine"),
    ("family", "Family Medicine"),
    ("cardiology", "Cardiology"),
    ("heart", "Cardiology"),
    ("cardiac", "Cardiology"),
    ("dermatology", "Dermatology"),
    ("dermatologist", "Dermatology"),
    ("skin", "Dermatology"),
    ("orthopedics", "Orthopedics"),
    ("orthopedic", "Orthopedics"),
    ("bones", "Orthopedics"),
    ("joint", "Orthopedics"),
    ("internal medicine", "Internal Medicine"),
];

/// Pattern-based extractor. Stands in for an LLM-backed oracle; the trait
/// boundary is the same either way.
pub struct RegexExtractor {
    name_patterns: Vec<Regex>,
    dob_patterns: Vec<Regex>,
    phone_patterns: Vec<Regex>,
    email_patterns: Vec<Regex>,
    carrier_patterns: Vec<Regex>,
    member_id_patterns: Vec<Regex>,
    group_number_patterns: Vec<Regex>,
    slot_choice_patterns: Vec<Regex>,
}

impl RegexExtractor {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static extraction pattern"))
                .collect()
        };

        Self {
            name_patterns: compile(&[
                r"(?i)my name is ([A-Za-z\s\-'.]+)",
                r"(?i)i'm ([A-Za-z\s\-'.]+)",
                r"(?i)i am ([A-Za-z\s\-'.]+)",
                r"(?i)this is ([A-Za-z\s\-'.]+)",
                r"(?i)name[:\s]+([A-Za-z\s\-'.]+)",
                r"([A-Z][a-z]+\s+[A-Z][a-z]+)",
            ]),
            dob_patterns: compile(&[
                r"(?i)(?:dob|date of birth|born|birthday)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
                r"(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
                r"(\d{4}[/\-]\d{1,2}[/\-]\d{1,2})",
            ]),
            phone_patterns: compile(&[
                r"(?i)(?:phone|number|call me at)[:\s]*(\+?1?[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4})",
                r"(\+?1?[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4})",
            ]),
            email_patterns: compile(&[
                r"(?i)(?:e-?mail[:\s]*)?([a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,})",
            ]),
            carrier_patterns: compile(&[
                r"(?i)insurance (?:carrier|company|provider)[:\s]+([A-Za-z\s&.]+)",
                r"(?i)my insurance is[:\s]+([A-Za-z\s&.]+)",
                r"(?i)i have ([A-Za-z\s&.]+?) insurance",
                r"(?i)(?:carrier|provider)[:\s]+([A-Za-z\s&.]+)",
                r"(?i)(?:insured with|covered by) ([A-Za-z\s&.]+)",
            ]),
            member_id_patterns: compile(&[
                r"(?i)member (?:id|number)[:\s]+([A-Za-z0-9\-]+)",
                r"(?i)policy (?:id|number)[:\s]+([A-Za-z0-9\-]+)",
                r"(?i)my member id is ([A-Za-z0-9\-]+)",
                r"(?i)subscriber id[:\s]+([A-Za-z0-9\-]+)",
            ]),
            group_number_patterns: compile(&[
                r"(?i)group (?:number|id|code)[:\s]+([A-Za-z0-9\-]+)",
                r"(?i)employer group[:\s]+([A-Za-z0-9\-]+)",
                r"(?i)my group number is ([A-Za-z0-9\-]+)",
            ]),
            slot_choice_patterns: compile(&[
                r"(?i)\b(?:option|slot|choice|number)\s*#?\s*([1-5])\b",
                r"(?i)\b(?:take|pick|choose|select|prefer|want|go with|book)\s+(?:the\s+)?#?([1-5])\b",
                r"^\W*([1-5])\W*$",
            ]),
        }
    }

    fn extract_name(&self, text: &str) -> Option<String> {
        for pattern in &self.name_patterns {
            if let Some(captures) = pattern.captures(text) {
                let raw = captures.get(1)?.as_str().trim();
                let name = title_case(&collapse_whitespace(raw));
                let parts: Vec<&str> = name.split_whitespace().collect();
                if parts.len() >= 2
                    && parts
                        .iter()
                        .all(|p| p.chars().all(|c| c.is_alphabetic() || "'-.".contains(c)))
                {
                    return Some(name);
                }
            }
        }
        None
    }

    fn extract_dob(&self, text: &str) -> Option<String> {
        for pattern in &self.dob_patterns {
            if let Some(captures) = pattern.captures(text) {
                if let Some(valid) = validate_birth_date(captures.get(1)?.as_str()) {
                    return Some(valid);
                }
            }
        }
        None
    }

    fn extract_phone(&self, text: &str) -> Option<String> {
        for pattern in &self.phone_patterns {
            if let Some(captures) = pattern.captures(text) {
                if let Some(formatted) = format_phone(captures.get(1)?.as_str()) {
                    return Some(formatted);
                }
            }
        }
        None
    }

    fn extract_email(&self, text: &str) -> Option<String> {
        for pattern in &self.email_patterns {
            if let Some(captures) = pattern.captures(text) {
                return Some(captures.get(1)?.as_str().to_lowercase());
            }
        }
        None
    }

    fn extract_doctor_preference(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        for (key, doctor) in DOCTOR_ROSTER {
            if lower.contains(&format!("dr. {key}"))
                || lower.contains(&format!("dr {key}"))
                || lower.contains(&format!("doctor {key}"))
            {
                return Some((*doctor).to_string());
            }
        }
        for (key, specialty) in SPECIALTY_VOCABULARY {
            if lower.contains(key) {
                return Some((*specialty).to_string());
            }
        }
        None
    }

    fn extract_carrier(&self, text: &str) -> Option<String> {
        for pattern in &self.carrier_patterns {
            if let Some(captures) = pattern.captures(text) {
                let candidate = captures.get(1)?.as_str().trim().to_lowercase();
                for known in KNOWN_CARRIERS {
                    if candidate.contains(&known.to_lowercase()) {
                        return Some((*known).to_string());
                    }
                }
            }
        }
        // A bare carrier name with no framing phrase still counts.
        let lower = text.to_lowercase();
        KNOWN_CARRIERS
            .iter()
            .find(|known| lower.contains(&known.to_lowercase()))
            .map(|known| (*known).to_string())
    }

    fn extract_alnum_code(&self, patterns: &[Regex], text: &str) -> Option<String> {
        for pattern in patterns {
            if let Some(captures) = pattern.captures(text) {
                let code = captures.get(1)?.as_str().trim().to_uppercase();
                if !code.is_empty() {
                    return Some(code);
                }
            }
        }
        None
    }

    fn extract_slot_choice(&self, text: &str) -> Option<String> {
        // Only an explicitly framed pick or a bare digit counts; a digit
        // buried in "none of these 3 work" is not a selection.
        for pattern in &self.slot_choice_patterns {
            if let Some(captures) = pattern.captures(text) {
                return Some(captures.get(1)?.as_str().to_string());
            }
        }
        None
    }
}

impl Default for RegexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InfoExtractor for RegexExtractor {
    async fn extract(
        &self,
        _context: &[ChatMessage],
        latest_message: &str,
        wanted_fields: &[&str],
    ) -> Extraction {
        let mut extracted = HashMap::new();

        for field in wanted_fields {
            let value = match *field {
                fields::NAME => self.extract_name(latest_message),
                fields::DATE_OF_BIRTH => self.extract_dob(latest_message),
                fields::PHONE => self.extract_phone(latest_message),
                fields::EMAIL => self.extract_email(latest_message),
                fields::DOCTOR_PREFERENCE => self.extract_doctor_preference(latest_message),
                fields::SLOT_CHOICE => self.extract_slot_choice(latest_message),
                fields::CARRIER => self.extract_carrier(latest_message),
                fields::MEMBER_ID => self.extract_alnum_code(&self.member_id_patterns, latest_message),
                fields::GROUP_NUMBER => {
                    self.extract_alnum_code(&self.group_number_patterns, latest_message)
                }
                _ => None,
            };
            if let Some(value) = value {
                extracted.insert((*field).to_string(), value);
            }
        }

        let still_missing = wanted_fields
            .iter()
            .filter(|f| !extracted.contains_key(**f))
            .map(|f| (*f).to_string())
            .collect();

        debug!("Extracted {} of {} wanted fields", extracted.len(), wanted_fields.len());
        Extraction {
            fields: extracted,
            still_missing,
        }
    }
}

/// Parses common US and ISO date layouts, canonicalizes to MM/DD/YYYY, and
/// rejects anything outside a plausible 0 to 120 year age range.
pub fn validate_birth_date(value: &str) -> Option<String> {
    const LAYOUTS: &[&str] = &[
        "%m/%d/%Y",
        "%m-%d-%Y",
        "%Y/%m/%d",
        "%Y-%m-%d",
    ];
    let trimmed = value.trim();
    let parsed = LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(trimmed, layout).ok())?;

    let today = Utc::now().date_naive();
    if parsed > today {
        return None;
    }
    let age_years = today.year() - parsed.year();
    if age_years > 120 {
        return None;
    }
    Some(parsed.format("%m/%d/%Y").to_string())
}

pub fn format_phone(value: &str) -> Option<String> {
    let mut digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits.remove(0);
    }
    if digits.len() != 10 {
        return None;
    }
    Some(format!(
        "{}-{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..10]
    ))
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(message: &str, wanted: &[&str]) -> Extraction {
        RegexExtractor::new().extract(&[], message, wanted).await
    }

    #[tokio::test]
    async fn pulls_name_dob_and_phone_from_one_message() {
        let extraction = run(
            "Hi, my name is sarah mitchell, born 03/22/1990, call me at (555) 123-4567",
            &[fields::NAME, fields::DATE_OF_BIRTH, fields::PHONE],
        )
        .await;

        assert_eq!(extraction.fields[fields::NAME], "Sarah Mitchell");
        assert_eq!(extraction.fields[fields::DATE_OF_BIRTH], "03/22/1990");
        assert_eq!(extraction.fields[fields::PHONE], "555-123-4567");
        assert!(extraction.still_missing.is_empty());
    }

    #[tokio::test]
    async fn reports_missing_fields() {
        let extraction = run(
            "I'd like to book an appointment please",
            &[fields::NAME, fields::DATE_OF_BIRTH, fields::PHONE],
        )
        .await;

        assert!(extraction.fields.is_empty());
        assert_eq!(extraction.still_missing.len(), 3);
    }

    #[tokio::test]
    async fn rejects_implausible_birth_dates() {
        assert_eq!(validate_birth_date("01/01/1850"), None);
        assert_eq!(validate_birth_date("12/31/2099"), None);
        assert_eq!(validate_birth_date("02/30/1990"), None);
        assert_eq!(validate_birth_date("1990-03-22"), Some("03/22/1990".to_string()));
    }

    #[tokio::test]
    async fn phone_formats_normalize() {
        assert_eq!(format_phone("+1 (555) 123-4567"), Some("555-123-4567".to_string()));
        assert_eq!(format_phone("555.123.4567"), Some("555-123-4567".to_string()));
        assert_eq!(format_phone("12345"), None);
    }

    #[tokio::test]
    async fn doctor_preference_by_name_and_by_specialty() {
        let by_name = run("I'd like to see Dr. Johnson", &[fields::DOCTOR_PREFERENCE]).await;
        assert_eq!(by_name.fields[fields::DOCTOR_PREFERENCE], "Dr. Johnson");

        let by_specialty = run("something for my skin", &[fields::DOCTOR_PREFERENCE]).await;
        assert_eq!(by_specialty.fields[fields::DOCTOR_PREFERENCE], "Dermatology");
    }

    #[tokio::test]
    async fn insurance_fields_extract_and_uppercase() {
        let extraction = run(
            "I have Aetna insurance, member ID abc-123, group number grp9",
            &[fields::CARRIER, fields::MEMBER_ID, fields::GROUP_NUMBER],
        )
        .await;

        assert_eq!(extraction.fields[fields::CARRIER], "Aetna");
        assert_eq!(extraction.fields[fields::MEMBER_ID], "ABC-123");
        assert_eq!(extraction.fields[fields::GROUP_NUMBER], "GRP9");
    }

    #[tokio::test]
    async fn slot_choice_requires_a_framed_pick_or_bare_digit() {
        let framed = run("option 2 works for me", &[fields::SLOT_CHOICE]).await;
        assert_eq!(framed.fields[fields::SLOT_CHOICE], "2");

        let verbed = run("I'll take 3 please", &[fields::SLOT_CHOICE]).await;
        assert_eq!(verbed.fields[fields::SLOT_CHOICE], "3");

        let bare = run("1", &[fields::SLOT_CHOICE]).await;
        assert_eq!(bare.fields[fields::SLOT_CHOICE], "1");

        let unclear = run("the morning one please", &[fields::SLOT_CHOICE]).await;
        assert!(unclear.fields.is_empty());

        // A digit inside a refusal is not a selection.
        let refusal = run("none of these 3 work for me", &[fields::SLOT_CHOICE]).await;
        assert!(refusal.fields.is_empty());
    }

    #[tokio::test]
    async fn email_lowercases() {
        let extraction = run("Email: Sarah.M@Example.COM", &[fields::EMAIL]).await;
        assert_eq!(extraction.fields[fields::EMAIL], "sarah.m@example.com");
    }
}
