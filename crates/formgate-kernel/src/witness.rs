//! Deterministic identifiers for answer rejections.
//!
//! The same form, question and rule always produce the same id, so a
//! re-validated payload can be matched against an earlier rejection.
//!
//! `witnessId = "r1_" || hex_lower(SHA256(canonical_json(key)))` where the
//! key holds `schema`, `formId`, `questionId` and `rule`.

use crate::error::AnswerRule;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const REJECTION_WITNESS_SCHEMA: u64 = 1;

pub fn rejection_witness_id(form_id: u64, question_id: u64, rule: AnswerRule) -> String {
    let key = canonical_key(form_id, question_id, rule);
    // serde_json::Map is ordered by key without `preserve_order`, and compact
    // serialization has no insignificant whitespace.
    let bytes = serde_json::to_vec(&key).unwrap_or_default();
    format!("r1_{:x}", Sha256::digest(&bytes))
}

fn canonical_key(form_id: u64, question_id: u64, rule: AnswerRule) -> Value {
    let mut map = Map::new();
    map.insert("schema".to_string(), Value::from(REJECTION_WITNESS_SCHEMA));
    map.insert("formId".to_string(), Value::from(form_id));
    map.insert("questionId".to_string(), Value::from(question_id));
    map.insert("rule".to_string(), Value::from(rule.as_str()));
    Value::Object(map)
}
