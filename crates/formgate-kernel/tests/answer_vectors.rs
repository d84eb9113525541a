//! Integration tests: run the answer validation vectors.
//!
//! Each fixture in tests/fixtures/ has:
//! - case.json: form id, question drafts and a raw answer payload
//! - expect.json: either `{"accepted": [...]}` or `{"rejected": {...}}`
//!
//! Rejections are compared including their exact witness ids.

use formgate_kernel::{Question, QuestionDraft, RawAnswers, validate_answers};
use serde_json::{Value, json};
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn run_fixture(name: &str) {
    let dir = fixtures_dir().join(name);

    let case_path = dir.join("case.json");
    let expect_path = dir.join("expect.json");

    let case_str = std::fs::read_to_string(&case_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", case_path.display()));
    let expect_str = std::fs::read_to_string(&expect_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", expect_path.display()));

    let case: Value = serde_json::from_str(&case_str)
        .unwrap_or_else(|e| panic!("failed to parse {}: {e}", case_path.display()));
    let expected: Value = serde_json::from_str(&expect_str)
        .unwrap_or_else(|e| panic!("failed to parse {}: {e}", expect_path.display()));

    let form_id = case["formId"].as_u64().expect("missing formId field");
    let drafts: Vec<QuestionDraft> =
        serde_json::from_value(case["questions"].clone()).expect("questions should parse");
    let questions: Vec<Question> = drafts
        .into_iter()
        .map(|draft| Question::from_draft(draft).expect("fixture question should be valid"))
        .collect();
    let answers: RawAnswers =
        serde_json::from_value(case["answers"].clone()).expect("answers should parse");

    let result_json = match validate_answers(form_id, &questions, &answers) {
        Ok(accepted) => json!({ "accepted": accepted }),
        Err(rejected) => json!({ "rejected": rejected }),
    };

    assert_eq!(
        result_json,
        expected,
        "\n\nFixture: {name}\n\nGot:\n{}\n\nExpected:\n{}\n",
        serde_json::to_string_pretty(&result_json).expect("render result"),
        serde_json::to_string_pretty(&expected).expect("render expected"),
    );
}

#[test]
fn single_choice_two_answers() {
    run_fixture("single_choice_two_answers");
}

#[test]
fn required_blank_answer() {
    run_fixture("required_blank_answer");
}

#[test]
fn required_empty_other_answer() {
    run_fixture("required_empty_other_answer");
}

#[test]
fn date_range_reversed() {
    run_fixture("date_range_reversed");
}

#[test]
fn email_with_plus_tag() {
    run_fixture("email_with_plus_tag");
}

#[test]
fn unknown_question_ignored() {
    run_fixture("unknown_question_ignored");
}

#[test]
fn first_failure_in_display_order() {
    run_fixture("first_failure_in_display_order");
}
