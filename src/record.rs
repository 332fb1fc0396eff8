//! The applicant record: the single input to an automation run.
//!
//! A record is deserialized once (from a JSON file or a caller-supplied
//! value), validated, and then only ever borrowed.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const WORKER_COUNT_MIN: u32 = 2;
pub const WORKER_COUNT_MAX: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "法人", alias = "Corporation")]
    Corporation,
    #[serde(rename = "個人事業主", alias = "SoleProprietor")]
    SoleProprietor,
}

impl EntityType {
    /// Label shown next to the radio option on the form.
    pub fn label(self) -> &'static str {
        match self {
            EntityType::Corporation => "法人",
            EntityType::SoleProprietor => "個人事業主",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationMethod {
    #[serde(rename = "紙申請", alias = "Paper")]
    Paper,
    #[serde(rename = "電子申請", alias = "Electronic")]
    Electronic,
}

impl ApplicationMethod {
    pub fn label(self) -> &'static str {
        match self {
            ApplicationMethod::Paper => "紙申請",
            ApplicationMethod::Electronic => "電子申請",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationReason {
    #[serde(rename = "人材の確保・定着のため")]
    Retention,
    #[serde(rename = "業務効率化・生産性向上のため")]
    Productivity,
    #[serde(rename = "従業員の処遇改善のため")]
    Compensation,
    #[serde(rename = "新規事業の立ち上げのため")]
    NewBusiness,
    #[serde(rename = "その他")]
    Other,
}

impl ApplicationReason {
    pub const ALL: [ApplicationReason; 5] = [
        ApplicationReason::Retention,
        ApplicationReason::Productivity,
        ApplicationReason::Compensation,
        ApplicationReason::NewBusiness,
        ApplicationReason::Other,
    ];

    /// Exact text of the reason as listed in the form's autocomplete.
    pub fn label(self) -> &'static str {
        match self {
            ApplicationReason::Retention => "人材の確保・定着のため",
            ApplicationReason::Productivity => "業務効率化・生産性向上のため",
            ApplicationReason::Compensation => "従業員の処遇改善のため",
            ApplicationReason::NewBusiness => "新規事業の立ち上げのため",
            ApplicationReason::Other => "その他",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub name: String,
    pub name_kana: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    pub last_name: String,
    pub first_name: String,
    pub last_name_kana: String,
    pub first_name_kana: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub postal_code: String,
    pub prefecture: String,
    pub city: String,
    pub street: String,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.postal_code.trim().is_empty()
            && self.prefecture.trim().is_empty()
            && self.city.trim().is_empty()
            && self.street.trim().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.postal_code.trim().is_empty()
            && !self.prefecture.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.street.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(flatten)]
    pub name: PersonName,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantRecord {
    pub entity_type: EntityType,
    pub company: Company,
    pub representative: PersonName,
    pub primary_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_address: Option<Address>,
    pub worker_count: u32,
    pub application_method: ApplicationMethod,
    pub contact: Contact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub application_reason: ApplicationReason,
}

impl ApplicantRecord {
    /// Parse and validate a record from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let record: ApplicantRecord = serde_json::from_str(text)
            .map_err(|e| Error::InputInvalid(format!("malformed applicant JSON: {e}")))?;
        record.validate()?;
        Ok(record)
    }

    /// Read, parse and validate a record from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InputInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Check every invariant the form relies on. All problems are reported
    /// together.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        require(&mut problems, "company.name", &self.company.name);
        kana(&mut problems, "company.nameKana", &self.company.name_kana);
        person(&mut problems, "representative", &self.representative);

        if !self.primary_address.is_complete() {
            problems.push("primaryAddress must have all four fields".to_string());
        }
        postal_code(&mut problems, "primaryAddress.postalCode", &self.primary_address.postal_code);
        if let Some(secondary) = &self.secondary_address {
            if !secondary.postal_code.trim().is_empty() {
                postal_code(&mut problems, "secondaryAddress.postalCode", &secondary.postal_code);
            }
        }

        if !(WORKER_COUNT_MIN..=WORKER_COUNT_MAX).contains(&self.worker_count) {
            problems.push(format!(
                "workerCount must be between {WORKER_COUNT_MIN} and {WORKER_COUNT_MAX}, got {}",
                self.worker_count
            ));
        }

        person(&mut problems, "contact", &self.contact.name);
        if !phone_pattern().is_match(self.contact.phone.trim()) {
            problems.push(format!("contact.phone is not a phone number: {:?}", self.contact.phone));
        }
        if !email_pattern().is_match(self.contact.email.trim()) {
            problems.push(format!("contact.email is not an email address: {:?}", self.contact.email));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InputInvalid(problems.join("; ")))
        }
    }

    /// The secondary address, only when at least one subfield is filled.
    pub fn secondary_address(&self) -> Option<&Address> {
        self.secondary_address.as_ref().filter(|a| !a.is_empty())
    }

    /// The agent name, only when present and non-blank.
    pub fn agent_name(&self) -> Option<&str> {
        self.agent_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for ApplicantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rep = &self.representative;
        let contact = &self.contact.name;
        writeln!(f, "申請者区分: {}", self.entity_type.label())?;
        writeln!(f, "事業者名:   {} ({})", self.company.name, self.company.name_kana)?;
        writeln!(
            f,
            "代表者:     {} {} ({} {})",
            rep.last_name, rep.first_name, rep.last_name_kana, rep.first_name_kana
        )?;
        writeln!(f, "所在地:     {}", format_address(&self.primary_address))?;
        if let Some(secondary) = self.secondary_address() {
            writeln!(f, "所在地2:    {}", format_address(secondary))?;
        }
        writeln!(f, "労働者数:   {}", self.worker_count)?;
        writeln!(f, "申請方法:   {}", self.application_method.label())?;
        writeln!(
            f,
            "担当者:     {} {} ({} {})",
            contact.last_name, contact.first_name, contact.last_name_kana, contact.first_name_kana
        )?;
        writeln!(f, "連絡先:     {} / {}", self.contact.phone, self.contact.email)?;
        if let Some(agent) = self.agent_name() {
            writeln!(f, "代理人:     {agent}")?;
        }
        write!(f, "申請理由:   {}", self.application_reason.label())
    }
}

fn format_address(address: &Address) -> String {
    format!(
        "〒{} {}{}{}",
        address.postal_code, address.prefecture, address.city, address.street
    )
}

fn require(problems: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        problems.push(format!("{field} is required"));
    }
}

fn kana(problems: &mut Vec<String>, field: &str, value: &str) {
    require(problems, field, value);
    if !is_katakana(value) {
        problems.push(format!("{field} must be katakana: {value:?}"));
    }
}

fn person(problems: &mut Vec<String>, prefix: &str, name: &PersonName) {
    require(problems, &format!("{prefix}.lastName"), &name.last_name);
    require(problems, &format!("{prefix}.firstName"), &name.first_name);
    kana(problems, &format!("{prefix}.lastNameKana"), &name.last_name_kana);
    kana(problems, &format!("{prefix}.firstNameKana"), &name.first_name_kana);
}

fn postal_code(problems: &mut Vec<String>, field: &str, value: &str) {
    if !postal_pattern().is_match(value.trim()) {
        problems.push(format!("{field} must look like 123-4567: {value:?}"));
    }
}

/// True when every character is full-width katakana (including the
/// prolonged sound mark and middle dot) or a space separator.
pub fn is_katakana(value: &str) -> bool {
    value
        .chars()
        .all(|c| matches!(c, '\u{30A1}'..='\u{30FF}' | ' ' | '\u{3000}'))
}

fn postal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{3}-?\d{4}$").expect("static regex"))
}

fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9][0-9-]{8,14}$").expect("static regex"))
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "entityType": "法人",
        "company": { "name": "株式会社サンプル", "nameKana": "カブシキガイシャサンプル" },
        "representative": {
            "lastName": "山田", "firstName": "太郎",
            "lastNameKana": "ヤマダ", "firstNameKana": "タロウ"
        },
        "primaryAddress": {
            "postalCode": "100-0001", "prefecture": "東京都",
            "city": "千代田区", "street": "千代田1-1"
        },
        "workerCount": 50,
        "applicationMethod": "紙申請",
        "contact": {
            "lastName": "佐藤", "firstName": "花子",
            "lastNameKana": "サトウ", "firstNameKana": "ハナコ",
            "phone": "03-1234-5678", "email": "hanako@example.co.jp"
        },
        "applicationReason": "業務効率化・生産性向上のため"
    }"#;

    #[test]
    fn parses_sample_record() {
        let record = ApplicantRecord::from_json(SAMPLE).expect("valid record");
        assert_eq!(record.entity_type, EntityType::Corporation);
        assert_eq!(record.application_method, ApplicationMethod::Paper);
        assert_eq!(record.application_reason, ApplicationReason::Productivity);
        assert_eq!(record.worker_count, 50);
        assert!(record.secondary_address().is_none());
        assert!(record.agent_name().is_none());
    }

    #[test]
    fn accepts_english_variant_names() {
        let text = SAMPLE
            .replace("\"法人\"", "\"SoleProprietor\"")
            .replace("\"紙申請\"", "\"Electronic\"");
        let record = ApplicantRecord::from_json(&text).unwrap();
        assert_eq!(record.entity_type, EntityType::SoleProprietor);
        assert_eq!(record.application_method, ApplicationMethod::Electronic);
    }

    #[test]
    fn rejects_worker_count_out_of_range() {
        let text = SAMPLE.replace("\"workerCount\": 50", "\"workerCount\": 301");
        let err = ApplicantRecord::from_json(&text).unwrap_err();
        assert!(matches!(err, Error::InputInvalid(ref msg) if msg.contains("workerCount")));

        let text = SAMPLE.replace("\"workerCount\": 50", "\"workerCount\": 1");
        assert!(ApplicantRecord::from_json(&text).is_err());
    }

    #[test]
    fn rejects_non_katakana_kana() {
        let text = SAMPLE.replace("\"ヤマダ\"", "\"やまだ\"");
        let err = ApplicantRecord::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("representative.lastNameKana"));
    }

    #[test]
    fn rejects_incomplete_primary_address() {
        let text = SAMPLE.replace("\"千代田1-1\"", "\"\"");
        let err = ApplicantRecord::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("primaryAddress"));
    }

    #[test]
    fn rejects_unknown_reason() {
        let text = SAMPLE.replace("業務効率化・生産性向上のため", "なんとなく");
        let err = ApplicantRecord::from_json(&text).unwrap_err();
        assert!(matches!(err, Error::InputInvalid(_)));
    }

    #[test]
    fn partial_secondary_address_is_kept() {
        let text = SAMPLE.replace(
            "\"workerCount\"",
            r#""secondaryAddress": { "city": "大阪市" }, "workerCount""#,
        );
        let record = ApplicantRecord::from_json(&text).unwrap();
        let secondary = record.secondary_address().expect("partial address kept");
        assert_eq!(secondary.city, "大阪市");
        assert!(secondary.prefecture.is_empty());
    }

    #[test]
    fn blank_secondary_address_is_treated_as_absent() {
        let text = SAMPLE.replace(
            "\"workerCount\"",
            r#""secondaryAddress": { "city": "  " }, "workerCount""#,
        );
        let record = ApplicantRecord::from_json(&text).unwrap();
        assert!(record.secondary_address().is_none());
    }

    #[test]
    fn katakana_check() {
        assert!(is_katakana("ヤマダ タロウ"));
        assert!(is_katakana("サンプル・コーポレーション"));
        assert!(is_katakana(""));
        assert!(!is_katakana("ヤマダtaro"));
        assert!(!is_katakana("山田"));
    }

    #[test]
    fn missing_file_is_input_invalid() {
        let err = ApplicantRecord::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::InputInvalid(_)));
    }

    #[test]
    fn summary_lists_key_fields() {
        let record = ApplicantRecord::from_json(SAMPLE).unwrap();
        let summary = record.to_string();
        assert!(summary.contains("株式会社サンプル"));
        assert!(summary.contains("東京都千代田区"));
        assert!(summary.contains("紙申請"));
        assert!(!summary.contains("代理人"));
    }
}
