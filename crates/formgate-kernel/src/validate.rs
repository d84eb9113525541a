//! Answer validation engine.
//!
//! Questions are checked in definition order (by `order`, then id); the first
//! failing question is reported. For each question the rules run in a fixed
//! sequence: required, cardinality, membership, format, range.
//!
//! Payload entries for question ids the form does not (or no longer) define
//! are ignored, as are soft-deleted questions.

use crate::error::{AnswerRule, InvalidAnswer};
use crate::question::{
    OTHER_ANSWER_PREFIX, Question, QuestionSettings, TextValidation, parse_date, parse_datetime,
    parse_time,
};
use crate::witness::rejection_witness_id;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Raw payload: question id (as sent by the client) to answer tokens.
pub type RawAnswers = BTreeMap<String, Vec<String>>;

/// One accepted answer value, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerValue {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Choice {
        option_id: u64,
        text: String,
    },
    Other {
        text: String,
    },
    /// A staged upload, still to be resolved into permanent storage.
    Upload {
        token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedAnswer {
    pub question_id: u64,
    pub values: Vec<AnswerValue>,
}

type RuleFailure = (AnswerRule, String);

/// Check `answers` against the form's questions.
///
/// Returns the accepted values per answered question, or the first
/// rejection in question definition order.
pub fn validate_answers(
    form_id: u64,
    questions: &[Question],
    answers: &RawAnswers,
) -> Result<Vec<ValidatedAnswer>, InvalidAnswer> {
    let mut live: Vec<&Question> = questions.iter().filter(|q| !q.deleted).collect();
    live.sort_by_key(|q| (q.order, q.id));

    let mut accepted = Vec::new();
    for question in live {
        let tokens = answers
            .get(&question.id.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        match check_question(question, tokens) {
            Ok(values) if values.is_empty() => {}
            Ok(values) => accepted.push(ValidatedAnswer {
                question_id: question.id,
                values,
            }),
            Err((rule, message)) => {
                return Err(InvalidAnswer {
                    witness_id: rejection_witness_id(form_id, question.id, rule),
                    question_id: question.id,
                    order: question.order,
                    rule,
                    message,
                });
            }
        }
    }
    Ok(accepted)
}

fn check_question(question: &Question, tokens: &[String]) -> Result<Vec<AnswerValue>, RuleFailure> {
    let given: Vec<&str> = tokens
        .iter()
        .map(|token| token.trim())
        .filter(|token| !token.is_empty() && !is_empty_other(token))
        .collect();

    if given.is_empty() {
        if question.is_required {
            return Err((AnswerRule::Required, "an answer is required".to_string()));
        }
        return Ok(Vec::new());
    }

    check_cardinality(&question.settings, given.len())?;

    match &question.settings {
        QuestionSettings::ShortText { validation } => {
            let text = given[0];
            check_text_format(validation, text)?;
            Ok(vec![AnswerValue::Text {
                text: text.to_string(),
            }])
        }
        QuestionSettings::LongText => Ok(tokens
            .iter()
            .find(|token| !token.trim().is_empty())
            .map(|token| AnswerValue::Text {
                text: token.clone(),
            })
            .into_iter()
            .collect()),
        QuestionSettings::Date { min, max, is_range } => {
            let values = parse_all(&given, parse_date, "a date (YYYY-MM-DD)")?;
            check_temporal(&values, *min, *max, *is_range)?;
            Ok(as_text(&given))
        }
        QuestionSettings::DateTime { min, max } => {
            let values = parse_all(&given, parse_datetime, "a date and time (YYYY-MM-DD HH:MM)")?;
            check_temporal(&values, *min, *max, false)?;
            Ok(as_text(&given))
        }
        QuestionSettings::Time { min, max, is_range } => {
            let values = parse_all(&given, parse_time, "a time (HH:MM)")?;
            check_temporal(&values, *min, *max, *is_range)?;
            Ok(as_text(&given))
        }
        QuestionSettings::Radio { allow_other, .. } => {
            check_choices(question, &given, *allow_other)
        }
        QuestionSettings::Dropdown { .. } => check_choices(question, &given, false),
        QuestionSettings::Checkbox { allow_other, .. } => {
            check_choices(question, &given, *allow_other)
        }
        QuestionSettings::LinearScale {
            lowest, highest, ..
        } => {
            let value: i64 = given[0]
                .parse()
                .map_err(|_| (AnswerRule::Format, "must be a whole number".to_string()))?;
            if !(*lowest..=*highest).contains(&value) {
                return Err((
                    AnswerRule::Range,
                    format!("must be between {lowest} and {highest}"),
                ));
            }
            Ok(as_text(&given))
        }
        QuestionSettings::File { .. } => {
            if let Some(token) = given.iter().find(|token| !upload_token_re().is_match(token)) {
                return Err((
                    AnswerRule::Format,
                    format!("`{token}` is not a valid upload reference"),
                ));
            }
            Ok(given
                .iter()
                .map(|token| AnswerValue::Upload {
                    token: token.to_string(),
                })
                .collect())
        }
        QuestionSettings::Color => {
            if !color_re().is_match(given[0]) {
                return Err((
                    AnswerRule::Format,
                    "must be a color in #RRGGBB form".to_string(),
                ));
            }
            Ok(as_text(&given))
        }
    }
}

fn check_cardinality(settings: &QuestionSettings, count: usize) -> Result<(), RuleFailure> {
    let single = || {
        if count > 1 {
            Err((
                AnswerRule::Cardinality,
                "can only have one answer".to_string(),
            ))
        } else {
            Ok(())
        }
    };

    match settings {
        QuestionSettings::Date { is_range: true, .. }
        | QuestionSettings::Time { is_range: true, .. } => {
            if count != 2 {
                return Err((
                    AnswerRule::Cardinality,
                    "a range needs exactly two values".to_string(),
                ));
            }
            Ok(())
        }
        QuestionSettings::Checkbox {
            min_checked,
            max_checked,
            ..
        } => {
            if let Some(min) = min_checked
                && count < *min as usize
            {
                return Err((
                    AnswerRule::Cardinality,
                    format!("select at least {min} options"),
                ));
            }
            if let Some(max) = max_checked
                && count > *max as usize
            {
                return Err((
                    AnswerRule::Cardinality,
                    format!("select at most {max} options"),
                ));
            }
            Ok(())
        }
        QuestionSettings::File {
            max_files: Some(max),
            ..
        } => {
            if count > *max as usize {
                return Err((
                    AnswerRule::Cardinality,
                    format!("at most {max} files are allowed"),
                ));
            }
            Ok(())
        }
        QuestionSettings::File { max_files: None, .. } => Ok(()),
        QuestionSettings::ShortText { .. }
        | QuestionSettings::LongText
        | QuestionSettings::Date { .. }
        | QuestionSettings::DateTime { .. }
        | QuestionSettings::Time { .. }
        | QuestionSettings::Radio { .. }
        | QuestionSettings::Dropdown { .. }
        | QuestionSettings::LinearScale { .. }
        | QuestionSettings::Color => single(),
    }
}

fn check_choices(
    question: &Question,
    given: &[&str],
    allow_other: bool,
) -> Result<Vec<AnswerValue>, RuleFailure> {
    let mut seen = BTreeSet::new();
    let mut other_seen = false;
    let mut values = Vec::with_capacity(given.len());

    for token in given {
        if let Some(text) = token.strip_prefix(OTHER_ANSWER_PREFIX) {
            if !allow_other {
                return Err(not_an_option(token));
            }
            if other_seen {
                return Err((
                    AnswerRule::Cardinality,
                    "only one other answer is allowed".to_string(),
                ));
            }
            other_seen = true;
            values.push(AnswerValue::Other {
                text: text.trim().to_string(),
            });
            continue;
        }

        let option = token
            .parse::<u64>()
            .ok()
            .and_then(|id| question.option(id))
            .ok_or_else(|| not_an_option(token))?;
        if !seen.insert(option.id) {
            return Err((
                AnswerRule::Cardinality,
                format!("option {} selected more than once", option.id),
            ));
        }
        values.push(AnswerValue::Choice {
            option_id: option.id,
            text: option.text.clone(),
        });
    }
    Ok(values)
}

fn not_an_option(token: &str) -> RuleFailure {
    (
        AnswerRule::Membership,
        format!("`{token}` is not a valid option"),
    )
}

fn check_text_format(validation: &TextValidation, text: &str) -> Result<(), RuleFailure> {
    let (ok, expected) = match validation {
        TextValidation::None => return Ok(()),
        TextValidation::Email => (email_re().is_match(text), "an email address"),
        TextValidation::Phone => (is_phone(text), "a phone number"),
        TextValidation::Number => (number_re().is_match(text), "a number"),
        TextValidation::Regex(pattern) => (pattern.is_match(text), "text matching the pattern"),
    };
    if ok {
        Ok(())
    } else {
        Err((AnswerRule::Format, format!("must be {expected}")))
    }
}

fn parse_all<T>(
    given: &[&str],
    parse: fn(&str) -> Option<T>,
    expected: &str,
) -> Result<Vec<T>, RuleFailure> {
    given
        .iter()
        .map(|token| {
            parse(token).ok_or_else(|| {
                (
                    AnswerRule::Format,
                    format!("`{token}` is not {expected}"),
                )
            })
        })
        .collect()
}

fn check_temporal<T: PartialOrd + Copy>(
    values: &[T],
    min: Option<T>,
    max: Option<T>,
    is_range: bool,
) -> Result<(), RuleFailure> {
    if is_range && values.len() == 2 && values[1] < values[0] {
        return Err((
            AnswerRule::RangeOrder,
            "range end is before range start".to_string(),
        ));
    }
    for value in values {
        if min.is_some_and(|min| *value < min) {
            return Err((AnswerRule::Range, "is before the earliest allowed value".to_string()));
        }
        if max.is_some_and(|max| *value > max) {
            return Err((AnswerRule::Range, "is after the latest allowed value".to_string()));
        }
    }
    Ok(())
}

fn as_text(given: &[&str]) -> Vec<AnswerValue> {
    given
        .iter()
        .map(|token| AnswerValue::Text {
            text: token.to_string(),
        })
        .collect()
}

fn is_empty_other(token: &str) -> bool {
    token
        .strip_prefix(OTHER_ANSWER_PREFIX)
        .is_some_and(|text| text.trim().is_empty())
}

fn is_phone(text: &str) -> bool {
    phone_re().is_match(text) && text.chars().filter(char::is_ascii_digit).count() >= 3
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
        )
        .expect("email regex must compile")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9 ()./-]{3,}$").expect("phone regex must compile"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
            .expect("number regex must compile")
    })
}

fn color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color regex must compile"))
}

fn upload_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("upload regex must compile"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{ChoiceOption, QuestionDraft};
    use serde_json::{Value, json};

    fn question(
        id: u64,
        order: u32,
        question_type: &str,
        required: bool,
        extra: Value,
    ) -> Question {
        Question::from_draft(QuestionDraft {
            id,
            form_id: 1,
            order,
            question_type: question_type.to_string(),
            text: format!("Question {id}"),
            is_required: required,
            extra_settings: match extra {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            options: Vec::new(),
            deleted: false,
        })
        .expect("question should be valid")
    }

    fn with_options(mut question: Question, ids: &[u64]) -> Question {
        question.options = ids
            .iter()
            .map(|id| ChoiceOption {
                id: *id,
                text: format!("Option {id}"),
                order: *id as u32,
            })
            .collect();
        question
    }

    fn answers(entries: &[(u64, &[&str])]) -> RawAnswers {
        entries
            .iter()
            .map(|(id, tokens)| {
                (
                    id.to_string(),
                    tokens.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    fn rule_of(result: Result<Vec<ValidatedAnswer>, InvalidAnswer>) -> AnswerRule {
        result.expect_err("payload should be rejected").rule
    }

    #[test]
    fn first_failure_follows_definition_order_not_payload_order() {
        let questions = vec![
            question(20, 2, "short_text", true, json!({})),
            question(10, 1, "short_text", true, json!({})),
        ];
        let err = validate_answers(1, &questions, &answers(&[])).expect_err("both missing");
        assert_eq!(err.question_id, 10);
        assert_eq!(err.order, 1);
    }

    #[test]
    fn optional_questions_may_be_skipped() {
        let questions = vec![question(1, 1, "date", false, json!({"min": "2024-01-01"}))];
        let accepted =
            validate_answers(1, &questions, &answers(&[(1, &["  "])])).expect("empty optional");
        assert!(accepted.is_empty());
    }

    #[test]
    fn other_answer_requires_the_setting() {
        let closed = with_options(question(1, 1, "radio", false, json!({})), &[1, 2]);
        assert_eq!(
            rule_of(validate_answers(1, &[closed], &answers(&[(1, &["other:mine"])]))),
            AnswerRule::Membership
        );

        let open = with_options(
            question(1, 1, "radio", false, json!({"allowOtherAnswer": true})),
            &[1, 2],
        );
        let accepted = validate_answers(1, &[open], &answers(&[(1, &["other: mine "])]))
            .expect("other allowed");
        assert_eq!(
            accepted[0].values,
            vec![AnswerValue::Other {
                text: "mine".to_string()
            }]
        );
    }

    #[test]
    fn dropdown_never_takes_other() {
        let q = with_options(question(1, 1, "dropdown", false, json!({})), &[1]);
        assert_eq!(
            rule_of(validate_answers(1, &[q], &answers(&[(1, &["other:x"])]))),
            AnswerRule::Membership
        );
    }

    #[test]
    fn checkbox_bounds_and_duplicates() {
        let q = with_options(
            question(1, 1, "checkbox", false, json!({"minChecked": 2, "maxChecked": 3})),
            &[1, 2, 3, 4],
        );
        let questions = [q];
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["1"])]))),
            AnswerRule::Cardinality
        );
        assert_eq!(
            rule_of(validate_answers(
                1,
                &questions,
                &answers(&[(1, &["1", "2", "3", "4"])])
            )),
            AnswerRule::Cardinality
        );
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["1", "1"])]))),
            AnswerRule::Cardinality
        );
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["1", "9"])]))),
            AnswerRule::Membership
        );

        let accepted = validate_answers(1, &questions, &answers(&[(1, &["2", "4"])]))
            .expect("two options");
        assert_eq!(
            accepted[0].values[1],
            AnswerValue::Choice {
                option_id: 4,
                text: "Option 4".to_string()
            }
        );
    }

    #[test]
    fn text_validators() {
        let cases = [
            ("phone", "+49 (0)30 1234-567", true),
            ("phone", "call me", false),
            ("phone", "--", false),
            ("number", "-12.5e3", true),
            ("number", "12,5", false),
            ("number", "inf", false),
            ("email", "name@example", false),
            ("email", "a@b.co", true),
        ];
        for (kind, text, ok) in cases {
            let q = question(1, 1, "short_text", true, json!({"validationType": kind}));
            let result = validate_answers(1, &[q], &answers(&[(1, &[text])]));
            assert_eq!(result.is_ok(), ok, "{kind} / {text}");
            if !ok {
                assert_eq!(rule_of(result), AnswerRule::Format);
            }
        }
    }

    #[test]
    fn regex_validator_uses_stored_flags() {
        let q = question(
            1,
            1,
            "short_text",
            true,
            json!({"validationType": "regex", "validationRegex": "/^ab+c$/i"}),
        );
        let questions = [q];
        assert!(validate_answers(1, &questions, &answers(&[(1, &["ABBC"])])).is_ok());
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["abd"])]))),
            AnswerRule::Format
        );
    }

    #[test]
    fn temporal_format_and_bounds() {
        let q = question(
            1,
            1,
            "time",
            true,
            json!({"min": "08:00", "max": "18:00"}),
        );
        let questions = [q];
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["8am"])]))),
            AnswerRule::Format
        );
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["07:59"])]))),
            AnswerRule::Range
        );
        assert!(validate_answers(1, &questions, &answers(&[(1, &["18:00"])])).is_ok());

        let dt = question(2, 1, "datetime", true, json!({"max": "2024-06-01 12:00"}));
        let questions = [dt];
        assert!(validate_answers(1, &questions, &answers(&[(2, &["2024-06-01T11:59"])])).is_ok());
        assert_eq!(
            rule_of(validate_answers(
                1,
                &questions,
                &answers(&[(2, &["2024-06-01 12:01"])])
            )),
            AnswerRule::Range
        );
    }

    #[test]
    fn range_mode_needs_exactly_two_values() {
        let q = question(1, 1, "date", true, json!({"isRange": true}));
        let questions = [q];
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["2024-01-01"])]))),
            AnswerRule::Cardinality
        );
        let accepted = validate_answers(
            1,
            &questions,
            &answers(&[(1, &["2024-01-01", "2024-01-01"])]),
        )
        .expect("equal ends are non-decreasing");
        assert_eq!(accepted[0].values.len(), 2);
    }

    #[test]
    fn linear_scale_is_an_integer_in_bounds() {
        let q = question(
            1,
            1,
            "linear_scale",
            true,
            json!({"optionsLowest": 1, "optionsHighest": 4}),
        );
        let questions = [q];
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["2.5"])]))),
            AnswerRule::Format
        );
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["0"])]))),
            AnswerRule::Range
        );
        assert!(validate_answers(1, &questions, &answers(&[(1, &["4"])])).is_ok());
    }

    #[test]
    fn file_answers_bounded_and_shaped() {
        let q = question(1, 1, "file", true, json!({"maxAllowedFilesCount": 1}));
        let questions = [q];
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["a", "b"])]))),
            AnswerRule::Cardinality
        );
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["../etc/passwd"])]))),
            AnswerRule::Format
        );
        let accepted =
            validate_answers(1, &questions, &answers(&[(1, &["upl_01"])])).expect("upload");
        assert_eq!(
            accepted[0].values,
            vec![AnswerValue::Upload {
                token: "upl_01".to_string()
            }]
        );
    }

    #[test]
    fn color_answers() {
        let q = question(1, 1, "color", true, json!({}));
        let questions = [q];
        assert!(validate_answers(1, &questions, &answers(&[(1, &["#1a2B3c"])])).is_ok());
        assert_eq!(
            rule_of(validate_answers(1, &questions, &answers(&[(1, &["red"])]))),
            AnswerRule::Format
        );
    }

    #[test]
    fn soft_deleted_questions_are_skipped() {
        let mut q = question(1, 1, "short_text", true, json!({}));
        q.deleted = true;
        assert!(validate_answers(1, &[q], &answers(&[])).is_ok());
    }

    #[test]
    fn long_text_keeps_inner_whitespace() {
        let q = question(1, 1, "long_text", true, json!({}));
        let accepted = validate_answers(1, &[q], &answers(&[(1, &["line one\n  line two"])]))
            .expect("long text");
        assert_eq!(
            accepted[0].values,
            vec![AnswerValue::Text {
                text: "line one\n  line two".to_string()
            }]
        );
    }
}
