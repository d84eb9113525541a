//! Question definitions and their closed-shape settings.
//!
//! On the wire a question carries a `type` string and a free-form
//! `extraSettings` object. Both are checked together when a question is
//! saved ([`Question::from_draft`]): every type accepts exactly its own keys,
//! and the whole object is accepted or refused. Once a [`Question`] exists,
//! its [`QuestionSettings`] are well-formed and validation can rely on them.

use crate::error::SettingsError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Reserved token prefix marking a free-text "other" choice.
pub const OTHER_ANSWER_PREFIX: &str = "other:";

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";
const DATETIME_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

const DEFAULT_SCALE_LOWEST: i64 = 0;
const DEFAULT_SCALE_HIGHEST: i64 = 5;
const REGEX_FLAGS: &str = "imsxu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    ShortText,
    LongText,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Time,
    Radio,
    Dropdown,
    Checkbox,
    LinearScale,
    File,
    Color,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::ShortText => "short_text",
            QuestionType::LongText => "long_text",
            QuestionType::Date => "date",
            QuestionType::DateTime => "datetime",
            QuestionType::Time => "time",
            QuestionType::Radio => "radio",
            QuestionType::Dropdown => "dropdown",
            QuestionType::Checkbox => "checkbox",
            QuestionType::LinearScale => "linear_scale",
            QuestionType::File => "file",
            QuestionType::Color => "color",
        }
    }

    /// Types whose answers are option references.
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            QuestionType::Radio | QuestionType::Dropdown | QuestionType::Checkbox
        )
    }
}

impl std::str::FromStr for QuestionType {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "short_text" => QuestionType::ShortText,
            "long_text" => QuestionType::LongText,
            "date" => QuestionType::Date,
            "datetime" => QuestionType::DateTime,
            "time" => QuestionType::Time,
            "radio" => QuestionType::Radio,
            "dropdown" => QuestionType::Dropdown,
            "checkbox" => QuestionType::Checkbox,
            "linear_scale" => QuestionType::LinearScale,
            "file" => QuestionType::File,
            "color" => QuestionType::Color,
            other => return Err(SettingsError::UnknownType(other.to_string())),
        })
    }
}

/// A compiled, save-time-checked pattern in `/body/flags` form.
#[derive(Debug, Clone)]
pub struct ValidationPattern {
    source: String,
    compiled: Regex,
}

impl ValidationPattern {
    pub fn parse(source: &str) -> Result<Self, SettingsError> {
        let fail = |message: &str| SettingsError::Pattern {
            pattern: source.to_string(),
            message: message.to_string(),
        };

        let rest = source
            .strip_prefix('/')
            .ok_or_else(|| fail("pattern must be written as /body/flags"))?;
        let close = rest
            .rfind('/')
            .ok_or_else(|| fail("pattern is missing its closing delimiter"))?;
        let (body, flags) = (&rest[..close], &rest[close + 1..]);
        if body.is_empty() {
            return Err(fail("pattern body is empty"));
        }
        if let Some(flag) = flags.chars().find(|flag| !REGEX_FLAGS.contains(*flag)) {
            return Err(fail(&format!("flag `{flag}` is not allowed")));
        }

        let inline: String = flags
            .chars()
            .filter(|flag| *flag != 'u')
            .collect::<BTreeSet<char>>()
            .into_iter()
            .collect();
        let expression = if inline.is_empty() {
            body.to_string()
        } else {
            format!("(?{inline}){body}")
        };
        let compiled = Regex::new(&expression).map_err(|e| fail(&e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            compiled,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

impl PartialEq for ValidationPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ValidationPattern {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TextValidation {
    #[default]
    None,
    Email,
    Phone,
    Number,
    Regex(ValidationPattern),
}

impl TextValidation {
    pub fn kind(&self) -> &'static str {
        match self {
            TextValidation::None => "none",
            TextValidation::Email => "email",
            TextValidation::Phone => "phone",
            TextValidation::Number => "number",
            TextValidation::Regex(_) => "regex",
        }
    }
}

/// Type-specific configuration; one variant per [`QuestionType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSettings {
    ShortText {
        validation: TextValidation,
    },
    LongText,
    Date {
        min: Option<NaiveDate>,
        max: Option<NaiveDate>,
        is_range: bool,
    },
    DateTime {
        min: Option<NaiveDateTime>,
        max: Option<NaiveDateTime>,
    },
    Time {
        min: Option<NaiveTime>,
        max: Option<NaiveTime>,
        is_range: bool,
    },
    Radio {
        allow_other: bool,
        shuffle: bool,
    },
    Dropdown {
        shuffle: bool,
    },
    Checkbox {
        min_checked: Option<u32>,
        max_checked: Option<u32>,
        allow_other: bool,
        shuffle: bool,
    },
    LinearScale {
        lowest: i64,
        highest: i64,
        low_label: Option<String>,
        high_label: Option<String>,
    },
    File {
        max_files: Option<u32>,
        max_file_size: Option<u64>,
        allowed_types: Vec<String>,
    },
    Color,
}

impl QuestionSettings {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionSettings::ShortText { .. } => QuestionType::ShortText,
            QuestionSettings::LongText => QuestionType::LongText,
            QuestionSettings::Date { .. } => QuestionType::Date,
            QuestionSettings::DateTime { .. } => QuestionType::DateTime,
            QuestionSettings::Time { .. } => QuestionType::Time,
            QuestionSettings::Radio { .. } => QuestionType::Radio,
            QuestionSettings::Dropdown { .. } => QuestionType::Dropdown,
            QuestionSettings::Checkbox { .. } => QuestionType::Checkbox,
            QuestionSettings::LinearScale { .. } => QuestionType::LinearScale,
            QuestionSettings::File { .. } => QuestionType::File,
            QuestionSettings::Color => QuestionType::Color,
        }
    }

    /// Default settings for a type, as if saved with an empty object.
    pub fn defaults_for(question_type: QuestionType) -> Self {
        match question_type {
            QuestionType::ShortText => QuestionSettings::ShortText {
                validation: TextValidation::None,
            },
            QuestionType::LongText => QuestionSettings::LongText,
            QuestionType::Date => QuestionSettings::Date {
                min: None,
                max: None,
                is_range: false,
            },
            QuestionType::DateTime => QuestionSettings::DateTime {
                min: None,
                max: None,
            },
            QuestionType::Time => QuestionSettings::Time {
                min: None,
                max: None,
                is_range: false,
            },
            QuestionType::Radio => QuestionSettings::Radio {
                allow_other: false,
                shuffle: false,
            },
            QuestionType::Dropdown => QuestionSettings::Dropdown { shuffle: false },
            QuestionType::Checkbox => QuestionSettings::Checkbox {
                min_checked: None,
                max_checked: None,
                allow_other: false,
                shuffle: false,
            },
            QuestionType::LinearScale => QuestionSettings::LinearScale {
                lowest: DEFAULT_SCALE_LOWEST,
                highest: DEFAULT_SCALE_HIGHEST,
                low_label: None,
                high_label: None,
            },
            QuestionType::File => QuestionSettings::File {
                max_files: None,
                max_file_size: None,
                allowed_types: Vec::new(),
            },
            QuestionType::Color => QuestionSettings::Color,
        }
    }

    /// Parse and check `extraSettings` for `question_type` as one unit.
    pub fn parse(
        question_type: QuestionType,
        extra: &Map<String, Value>,
    ) -> Result<Self, SettingsError> {
        let settings = match question_type {
            QuestionType::ShortText => {
                let raw: ShortTextRaw = shape(question_type, extra)?;
                let validation = match (raw.validation_type.as_deref(), raw.validation_regex) {
                    (None | Some("none"), None) => TextValidation::None,
                    (Some("email"), None) => TextValidation::Email,
                    (Some("phone"), None) => TextValidation::Phone,
                    (Some("number"), None) => TextValidation::Number,
                    (Some("regex"), Some(pattern)) => {
                        TextValidation::Regex(ValidationPattern::parse(&pattern)?)
                    }
                    (Some("regex"), None) => {
                        return Err(inconsistent(
                            question_type,
                            "validationType `regex` requires validationRegex",
                        ));
                    }
                    (Some(kind @ ("none" | "email" | "phone" | "number")), Some(_)) => {
                        return Err(inconsistent(
                            question_type,
                            &format!("validationRegex is only valid with `regex`, not `{kind}`"),
                        ));
                    }
                    (None, Some(_)) => {
                        return Err(inconsistent(
                            question_type,
                            "validationRegex is only valid with validationType `regex`",
                        ));
                    }
                    (Some(other), _) => {
                        return Err(inconsistent(
                            question_type,
                            &format!("unknown validationType `{other}`"),
                        ));
                    }
                };
                QuestionSettings::ShortText { validation }
            }
            QuestionType::LongText => {
                let _: EmptyRaw = shape(question_type, extra)?;
                QuestionSettings::LongText
            }
            QuestionType::Date => {
                let raw: TemporalRaw = shape(question_type, extra)?;
                let min = parse_bound(question_type, "min", raw.min.as_deref(), parse_date)?;
                let max = parse_bound(question_type, "max", raw.max.as_deref(), parse_date)?;
                check_ordered(question_type, min, max)?;
                QuestionSettings::Date {
                    min,
                    max,
                    is_range: raw.is_range.unwrap_or(false),
                }
            }
            QuestionType::DateTime => {
                let raw: DateTimeRaw = shape(question_type, extra)?;
                let min = parse_bound(question_type, "min", raw.min.as_deref(), parse_datetime)?;
                let max = parse_bound(question_type, "max", raw.max.as_deref(), parse_datetime)?;
                check_ordered(question_type, min, max)?;
                QuestionSettings::DateTime { min, max }
            }
            QuestionType::Time => {
                let raw: TemporalRaw = shape(question_type, extra)?;
                let min = parse_bound(question_type, "min", raw.min.as_deref(), parse_time)?;
                let max = parse_bound(question_type, "max", raw.max.as_deref(), parse_time)?;
                check_ordered(question_type, min, max)?;
                QuestionSettings::Time {
                    min,
                    max,
                    is_range: raw.is_range.unwrap_or(false),
                }
            }
            QuestionType::Radio => {
                let raw: RadioRaw = shape(question_type, extra)?;
                QuestionSettings::Radio {
                    allow_other: raw.allow_other_answer.unwrap_or(false),
                    shuffle: raw.shuffle_options.unwrap_or(false),
                }
            }
            QuestionType::Dropdown => {
                let raw: DropdownRaw = shape(question_type, extra)?;
                QuestionSettings::Dropdown {
                    shuffle: raw.shuffle_options.unwrap_or(false),
                }
            }
            QuestionType::Checkbox => {
                let raw: CheckboxRaw = shape(question_type, extra)?;
                if raw.max_checked == Some(0) {
                    return Err(inconsistent(question_type, "maxChecked must be at least 1"));
                }
                if let (Some(min), Some(max)) = (raw.min_checked, raw.max_checked)
                    && max < min
                {
                    return Err(inconsistent(
                        question_type,
                        &format!("maxChecked ({max}) is below minChecked ({min})"),
                    ));
                }
                QuestionSettings::Checkbox {
                    min_checked: raw.min_checked,
                    max_checked: raw.max_checked,
                    allow_other: raw.allow_other_answer.unwrap_or(false),
                    shuffle: raw.shuffle_options.unwrap_or(false),
                }
            }
            QuestionType::LinearScale => {
                let raw: LinearScaleRaw = shape(question_type, extra)?;
                let lowest = raw.options_lowest.unwrap_or(DEFAULT_SCALE_LOWEST);
                let highest = raw.options_highest.unwrap_or(DEFAULT_SCALE_HIGHEST);
                if !(0..=1).contains(&lowest) {
                    return Err(inconsistent(question_type, "optionsLowest must be 0 or 1"));
                }
                if !(2..=10).contains(&highest) {
                    return Err(inconsistent(
                        question_type,
                        "optionsHighest must be between 2 and 10",
                    ));
                }
                QuestionSettings::LinearScale {
                    lowest,
                    highest,
                    low_label: raw.options_low_label,
                    high_label: raw.options_high_label,
                }
            }
            QuestionType::File => {
                let raw: FileRaw = shape(question_type, extra)?;
                if raw.max_allowed_files_count == Some(0) {
                    return Err(inconsistent(
                        question_type,
                        "maxAllowedFilesCount must be at least 1",
                    ));
                }
                QuestionSettings::File {
                    max_files: raw.max_allowed_files_count,
                    max_file_size: raw.max_file_size,
                    allowed_types: raw.allowed_file_types.unwrap_or_default(),
                }
            }
            QuestionType::Color => {
                let _: EmptyRaw = shape(question_type, extra)?;
                QuestionSettings::Color
            }
        };
        Ok(settings)
    }

    /// Wire form of these settings (the inverse of [`QuestionSettings::parse`]).
    pub fn to_extra_settings(&self) -> Map<String, Value> {
        let value = match self {
            QuestionSettings::ShortText { validation } => {
                let (validation_type, validation_regex) = match validation {
                    TextValidation::None => (None, None),
                    TextValidation::Regex(pattern) => {
                        (Some("regex".to_string()), Some(pattern.source().to_string()))
                    }
                    other => (Some(other.kind().to_string()), None),
                };
                to_value(ShortTextRaw {
                    validation_type,
                    validation_regex,
                })
            }
            QuestionSettings::LongText | QuestionSettings::Color => to_value(EmptyRaw {}),
            QuestionSettings::Date { min, max, is_range } => to_value(TemporalRaw {
                min: min.map(|d| d.format(DATE_FORMAT).to_string()),
                max: max.map(|d| d.format(DATE_FORMAT).to_string()),
                is_range: is_range.then_some(true),
            }),
            QuestionSettings::DateTime { min, max } => to_value(DateTimeRaw {
                min: min.map(|d| d.format(DATETIME_FORMAT).to_string()),
                max: max.map(|d| d.format(DATETIME_FORMAT).to_string()),
            }),
            QuestionSettings::Time { min, max, is_range } => to_value(TemporalRaw {
                min: min.map(|t| t.format(TIME_FORMAT).to_string()),
                max: max.map(|t| t.format(TIME_FORMAT).to_string()),
                is_range: is_range.then_some(true),
            }),
            QuestionSettings::Radio {
                allow_other,
                shuffle,
            } => to_value(RadioRaw {
                allow_other_answer: allow_other.then_some(true),
                shuffle_options: shuffle.then_some(true),
            }),
            QuestionSettings::Dropdown { shuffle } => to_value(DropdownRaw {
                shuffle_options: shuffle.then_some(true),
            }),
            QuestionSettings::Checkbox {
                min_checked,
                max_checked,
                allow_other,
                shuffle,
            } => to_value(CheckboxRaw {
                min_checked: *min_checked,
                max_checked: *max_checked,
                allow_other_answer: allow_other.then_some(true),
                shuffle_options: shuffle.then_some(true),
            }),
            QuestionSettings::LinearScale {
                lowest,
                highest,
                low_label,
                high_label,
            } => to_value(LinearScaleRaw {
                options_lowest: Some(*lowest),
                options_highest: Some(*highest),
                options_low_label: low_label.clone(),
                options_high_label: high_label.clone(),
            }),
            QuestionSettings::File {
                max_files,
                max_file_size,
                allowed_types,
            } => to_value(FileRaw {
                max_allowed_files_count: *max_files,
                max_file_size: *max_file_size,
                allowed_file_types: (!allowed_types.is_empty()).then(|| allowed_types.clone()),
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// A selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub order: u32,
}

/// Unchecked wire shape of a question, as submitted by an editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub id: u64,
    #[serde(default)]
    pub form_id: u64,
    #[serde(default)]
    pub order: u32,
    #[serde(rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub extra_settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
    /// Soft-deleted questions stay in storage for old answers.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// A checked question. Always built through [`Question::from_draft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    pub id: u64,
    pub form_id: u64,
    pub order: u32,
    pub text: String,
    pub is_required: bool,
    pub settings: QuestionSettings,
    pub options: Vec<ChoiceOption>,
    pub deleted: bool,
}

impl Question {
    pub fn from_draft(draft: QuestionDraft) -> Result<Self, SettingsError> {
        let question_type: QuestionType = draft.question_type.parse()?;
        let settings = QuestionSettings::parse(question_type, &draft.extra_settings)?;

        if draft.order == 0 && !draft.deleted {
            return Err(SettingsError::InvalidOrder);
        }
        if !question_type.is_choice() && !draft.options.is_empty() {
            return Err(SettingsError::OptionsNotAllowed(
                question_type.as_str().to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = draft.options.iter().find(|o| !seen.insert(o.id)) {
            return Err(SettingsError::DuplicateOption(duplicate.id));
        }

        Ok(Self {
            id: draft.id,
            form_id: draft.form_id,
            order: draft.order,
            text: draft.text,
            is_required: draft.is_required,
            settings,
            options: draft.options,
            deleted: draft.deleted,
        })
    }

    pub fn question_type(&self) -> QuestionType {
        self.settings.question_type()
    }

    pub fn option(&self, id: u64) -> Option<&ChoiceOption> {
        self.options.iter().find(|option| option.id == id)
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = SettingsError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        Question::from_draft(draft)
    }
}

impl From<Question> for QuestionDraft {
    fn from(question: Question) -> Self {
        QuestionDraft {
            id: question.id,
            form_id: question.form_id,
            order: question.order,
            question_type: question.question_type().as_str().to_string(),
            text: question.text,
            is_required: question.is_required,
            extra_settings: question.settings.to_extra_settings(),
            options: question.options,
            deleted: question.deleted,
        }
    }
}

/// Restore dense 1-based ordering after a delete or move.
///
/// Live questions keep their relative order; soft-deleted ones get `0`.
pub fn renumber(questions: &mut [Question]) {
    questions.sort_by_key(|q| (q.deleted, q.order, q.id));
    let mut next = 1;
    for question in questions.iter_mut() {
        if question.deleted {
            question.order = 0;
        } else {
            question.order = next;
            next += 1;
        }
    }
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT_ISO))
        .ok()
}

pub(crate) fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).ok()
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyRaw {}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ShortTextRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation_regex: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct TemporalRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_range: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DateTimeRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RadioRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_other_answer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shuffle_options: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DropdownRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shuffle_options: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CheckboxRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_checked: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_checked: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_other_answer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shuffle_options: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct LinearScaleRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options_lowest: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options_highest: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options_low_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options_high_label: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct FileRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_allowed_files_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed_file_types: Option<Vec<String>>,
}

fn shape<T: DeserializeOwned>(
    question_type: QuestionType,
    extra: &Map<String, Value>,
) -> Result<T, SettingsError> {
    serde_json::from_value(Value::Object(extra.clone())).map_err(|e| SettingsError::Shape {
        question_type: question_type.as_str().to_string(),
        message: e.to_string(),
    })
}

fn to_value<T: Serialize>(raw: T) -> Value {
    serde_json::to_value(raw).unwrap_or(Value::Null)
}

fn inconsistent(question_type: QuestionType, message: &str) -> SettingsError {
    SettingsError::Inconsistent {
        question_type: question_type.as_str().to_string(),
        message: message.to_string(),
    }
}

fn parse_bound<T>(
    question_type: QuestionType,
    key: &str,
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, SettingsError> {
    match raw {
        None => Ok(None),
        Some(text) => parse(text).map(Some).ok_or_else(|| SettingsError::Shape {
            question_type: question_type.as_str().to_string(),
            message: format!("`{key}` value `{text}` is not a valid {}", question_type.as_str()),
        }),
    }
}

fn check_ordered<T: PartialOrd>(
    question_type: QuestionType,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), SettingsError> {
    if let (Some(min), Some(max)) = (min, max)
        && max < min
    {
        return Err(inconsistent(question_type, "`max` is before `min`"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(question_type: &str, extra: Value) -> QuestionDraft {
        QuestionDraft {
            id: 1,
            form_id: 1,
            order: 1,
            question_type: question_type.to_string(),
            text: "Q".to_string(),
            is_required: false,
            extra_settings: match extra {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            options: Vec::new(),
            deleted: false,
        }
    }

    #[test]
    fn foreign_keys_reject_the_whole_object() {
        let err = Question::from_draft(draft(
            "short_text",
            json!({"validationType": "email", "maxChecked": 2}),
        ))
        .expect_err("checkbox key on short text");
        assert!(matches!(err, SettingsError::Shape { .. }), "{err:?}");

        let err = Question::from_draft(draft("color", json!({"anything": true})))
            .expect_err("color takes no settings");
        assert!(matches!(err, SettingsError::Shape { .. }));
    }

    #[test]
    fn checkbox_bounds_must_be_ordered() {
        let err = Question::from_draft(draft(
            "checkbox",
            json!({"minChecked": 3, "maxChecked": 2}),
        ))
        .expect_err("max below min");
        assert!(matches!(err, SettingsError::Inconsistent { .. }));

        let question = Question::from_draft(draft(
            "checkbox",
            json!({"minChecked": 1, "maxChecked": 2, "allowOtherAnswer": true}),
        ))
        .expect("valid checkbox");
        assert_eq!(
            question.settings,
            QuestionSettings::Checkbox {
                min_checked: Some(1),
                max_checked: Some(2),
                allow_other: true,
                shuffle: false,
            }
        );
    }

    #[test]
    fn regex_patterns_are_checked_at_save_time() {
        for bad in ["^abc$", "/abc/g", "/(unclosed/", "//i", "/abc"] {
            let err = Question::from_draft(draft(
                "short_text",
                json!({"validationType": "regex", "validationRegex": bad}),
            ))
            .expect_err("bad pattern");
            assert!(matches!(err, SettingsError::Pattern { .. }), "{bad}: {err:?}");
        }

        let question = Question::from_draft(draft(
            "short_text",
            json!({"validationType": "regex", "validationRegex": "/^[a-z]+$/i"}),
        ))
        .expect("valid pattern");
        match &question.settings {
            QuestionSettings::ShortText {
                validation: TextValidation::Regex(pattern),
            } => {
                assert!(pattern.is_match("HeLLo"));
                assert!(!pattern.is_match("hello1"));
            }
            other => panic!("unexpected settings {other:?}"),
        }
    }

    #[test]
    fn regex_key_without_regex_type_is_inconsistent() {
        let err = Question::from_draft(draft(
            "short_text",
            json!({"validationType": "email", "validationRegex": "/a/"}),
        ))
        .expect_err("pattern on email validation");
        assert!(matches!(err, SettingsError::Inconsistent { .. }));

        let err = Question::from_draft(draft("short_text", json!({"validationType": "zip"})))
            .expect_err("unknown validation kind");
        assert!(matches!(err, SettingsError::Inconsistent { .. }));
    }

    #[test]
    fn temporal_bounds_parse_and_order() {
        let err = Question::from_draft(draft(
            "date",
            json!({"min": "2024-05-01", "max": "2024-04-01"}),
        ))
        .expect_err("max before min");
        assert!(matches!(err, SettingsError::Inconsistent { .. }));

        let err = Question::from_draft(draft("time", json!({"min": "25:00"})))
            .expect_err("bad time");
        assert!(matches!(err, SettingsError::Shape { .. }));

        let err = Question::from_draft(draft("datetime", json!({"isRange": true})))
            .expect_err("datetime has no range mode");
        assert!(matches!(err, SettingsError::Shape { .. }));
    }

    #[test]
    fn linear_scale_limits() {
        let question = Question::from_draft(draft("linear_scale", json!({})))
            .expect("defaults are valid");
        assert_eq!(
            question.settings,
            QuestionSettings::LinearScale {
                lowest: 0,
                highest: 5,
                low_label: None,
                high_label: None,
            }
        );
        assert!(Question::from_draft(draft("linear_scale", json!({"optionsLowest": 2}))).is_err());
        assert!(
            Question::from_draft(draft("linear_scale", json!({"optionsHighest": 11}))).is_err()
        );
    }

    #[test]
    fn options_only_on_choice_types_and_unique() {
        let mut text = draft("short_text", json!({}));
        text.options.push(ChoiceOption {
            id: 1,
            text: "a".to_string(),
            order: 1,
        });
        assert_eq!(
            Question::from_draft(text),
            Err(SettingsError::OptionsNotAllowed("short_text".to_string()))
        );

        let mut radio = draft("radio", json!({}));
        for _ in 0..2 {
            radio.options.push(ChoiceOption {
                id: 4,
                text: "a".to_string(),
                order: 1,
            });
        }
        assert_eq!(
            Question::from_draft(radio),
            Err(SettingsError::DuplicateOption(4))
        );
    }

    #[test]
    fn unknown_type_rejected() {
        assert_eq!(
            Question::from_draft(draft("slider", json!({}))),
            Err(SettingsError::UnknownType("slider".to_string()))
        );
    }

    #[test]
    fn stored_questions_go_through_the_same_checks() {
        let question = Question::from_draft(draft(
            "time",
            json!({"min": "08:00", "max": "17:30", "isRange": true}),
        ))
        .expect("valid time question");
        let stored = serde_json::to_value(&question).expect("serialize");
        assert_eq!(stored["type"], "time");
        assert_eq!(stored["extraSettings"]["max"], "17:30");
        let reloaded: Question = serde_json::from_value(stored).expect("reload");
        assert_eq!(reloaded, question);

        let tampered = json!({
            "id": 1, "order": 1, "type": "checkbox",
            "extraSettings": {"minChecked": 4, "maxChecked": 1}
        });
        assert!(serde_json::from_value::<Question>(tampered).is_err());
    }

    #[test]
    fn renumber_closes_gaps_and_parks_deleted() {
        let mut questions: Vec<Question> = [(10, 4, false), (11, 2, false), (12, 3, true)]
            .into_iter()
            .map(|(id, order, deleted)| {
                let mut d = draft("long_text", json!({}));
                d.id = id;
                d.order = order;
                d.deleted = deleted;
                Question::from_draft(d).expect("valid")
            })
            .collect();
        renumber(&mut questions);
        let orders: Vec<(u64, u32)> = questions.iter().map(|q| (q.id, q.order)).collect();
        assert_eq!(orders, vec![(11, 1), (10, 2), (12, 0)]);
    }
}
