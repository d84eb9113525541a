//! Canonical in-memory state for forms, submissions and memberships.
//!
//! This is the storage boundary for `formgate-store`:
//! - load/store JSONL
//! - deterministic lookups by form id, link token and submitter
//! - the per-(form, submitter) uniqueness rule for single-submission forms

use crate::jsonl::{JsonlError, read_records_from_path, write_records_to_path};
use crate::record::{
    Answer, FormRecord, Member, MembershipKind, MembershipRecord, Record, Submission,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors raised while loading or mutating the memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    #[error("form not found: {0}")]
    FormNotFound(u64),

    #[error("submission not found: {0}")]
    SubmissionNotFound(u64),

    #[error("form {form_id} already has a submission from {submitter}")]
    DuplicateSubmission { form_id: u64, submitter: String },

    #[error("duplicate form hash: {0}")]
    DuplicateHash(String),
}

/// Canonical in-memory state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    forms: BTreeMap<u64, FormRecord>,
    submissions: BTreeMap<u64, Submission>,
    memberships: BTreeMap<(MembershipKind, String), MembershipRecord>,
}

impl MemoryStore {
    /// Build a store from records.
    ///
    /// Duplicate keys resolve last-write-wins, matching append/overlay
    /// behavior of JSONL files edited by hand.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut store = Self::default();
        for record in records {
            match record {
                Record::Form(form) => {
                    store.forms.insert(form.form.id, form);
                }
                Record::Submission(submission) => {
                    store.submissions.insert(submission.id, submission);
                }
                Record::Membership(membership) => {
                    store
                        .memberships
                        .insert((membership.kind, membership.id.clone()), membership);
                }
            }
        }
        store
    }

    /// Load store state from a JSONL file.
    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self, MemoryStoreError> {
        Ok(Self::from_records(read_records_from_path(path)?))
    }

    /// Persist store state to a JSONL file.
    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<(), MemoryStoreError> {
        write_records_to_path(path, &self.records())?;
        Ok(())
    }

    /// All records in deterministic order: memberships, forms, submissions.
    pub fn records(&self) -> Vec<Record> {
        self.memberships
            .values()
            .cloned()
            .map(Record::Membership)
            .chain(self.forms.values().cloned().map(Record::Form))
            .chain(self.submissions.values().cloned().map(Record::Submission))
            .collect()
    }

    pub fn form(&self, id: u64) -> Option<&FormRecord> {
        self.forms.get(&id)
    }

    pub fn form_mut(&mut self, id: u64) -> Option<&mut FormRecord> {
        self.forms.get_mut(&id)
    }

    /// Lookup a form by its public hash.
    pub fn form_by_hash(&self, hash: &str) -> Option<&FormRecord> {
        self.forms.values().find(|record| record.form.hash == hash)
    }

    /// Lookup the form a link token belongs to: a link share's token, or the
    /// form hash itself when the legacy link is enabled. Exact match only.
    pub fn form_by_link_token(&self, token: &str) -> Option<&FormRecord> {
        if token.is_empty() {
            return None;
        }
        self.forms.values().find(|record| {
            record.shares.iter().any(|share| share.matches_token(token))
                || (record.form.access.legacy_link_enabled && record.form.hash == token)
        })
    }

    pub fn forms(&self) -> impl Iterator<Item = &FormRecord> {
        self.forms.values()
    }

    /// Insert a new form. Hashes are unique across the store.
    pub fn insert_form(&mut self, record: FormRecord) -> Result<(), MemoryStoreError> {
        if self.forms.values().any(|existing| {
            existing.form.id != record.form.id && existing.form.hash == record.form.hash
        }) {
            return Err(MemoryStoreError::DuplicateHash(record.form.hash));
        }
        self.forms.insert(record.form.id, record);
        Ok(())
    }

    pub fn next_form_id(&self) -> u64 {
        self.forms.keys().next_back().map_or(1, |id| id + 1)
    }

    pub fn next_submission_id(&self) -> u64 {
        self.submissions.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Next free question id, unique across all forms.
    pub fn next_question_id(&self) -> u64 {
        self.forms
            .values()
            .flat_map(|record| record.questions.iter().map(|q| q.id))
            .max()
            .map_or(1, |id| id + 1)
    }

    /// Next free option id, unique across all questions.
    pub fn next_option_id(&self) -> u64 {
        self.forms
            .values()
            .flat_map(|record| record.questions.iter())
            .flat_map(|q| q.options.iter().map(|o| o.id))
            .max()
            .map_or(1, |id| id + 1)
    }

    /// Next free share id, unique across all forms.
    pub fn next_share_id(&self) -> u64 {
        self.forms
            .values()
            .flat_map(|record| record.shares.iter().map(|s| s.id))
            .max()
            .map_or(1, |id| id + 1)
    }

    pub fn submission(&self, id: u64) -> Option<&Submission> {
        self.submissions.get(&id)
    }

    /// Submissions on one form, in id order.
    pub fn submissions_for(&self, form_id: u64) -> impl Iterator<Item = &Submission> {
        self.submissions
            .values()
            .filter(move |submission| submission.form_id == form_id)
    }

    /// How many submissions `submitter` already has on `form_id`.
    pub fn prior_submissions(&self, form_id: u64, submitter: &str) -> usize {
        self.submissions_for(form_id)
            .filter(|submission| submission.submitter == submitter)
            .count()
    }

    /// The submitter's own submission, if exactly one exists.
    pub fn own_submission(&self, form_id: u64, submitter: &str) -> Option<&Submission> {
        let mut own = self
            .submissions_for(form_id)
            .filter(|submission| submission.submitter == submitter);
        match (own.next(), own.next()) {
            (Some(submission), None) => Some(submission),
            _ => None,
        }
    }

    /// Insert a submission.
    ///
    /// With `unique` set, a second submission for the same (form, submitter)
    /// is refused. The form must exist.
    pub fn insert_submission(
        &mut self,
        submission: Submission,
        unique: bool,
    ) -> Result<u64, MemoryStoreError> {
        if !self.forms.contains_key(&submission.form_id) {
            return Err(MemoryStoreError::FormNotFound(submission.form_id));
        }
        if unique && self.prior_submissions(submission.form_id, &submission.submitter) > 0 {
            return Err(MemoryStoreError::DuplicateSubmission {
                form_id: submission.form_id,
                submitter: submission.submitter,
            });
        }
        let id = submission.id;
        self.submissions.insert(id, submission);
        Ok(id)
    }

    /// Replace a submission's answers as one unit.
    pub fn replace_answers(
        &mut self,
        submission_id: u64,
        answers: Vec<Answer>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Answer>, MemoryStoreError> {
        let submission = self
            .submissions
            .get_mut(&submission_id)
            .ok_or(MemoryStoreError::SubmissionNotFound(submission_id))?;
        submission.updated_at = Some(now);
        Ok(std::mem::replace(&mut submission.answers, answers))
    }

    /// Delete submissions of one form, cascading to their answers.
    ///
    /// `ids = None` deletes every submission on the form. Ids that belong
    /// to another form are left alone.
    pub fn delete_submissions(&mut self, form_id: u64, ids: Option<&[u64]>) -> Vec<Submission> {
        let doomed: Vec<u64> = self
            .submissions_for(form_id)
            .filter(|submission| ids.is_none_or(|ids| ids.contains(&submission.id)))
            .map(|submission| submission.id)
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| self.submissions.remove(&id))
            .collect()
    }

    pub fn membership(&self, kind: MembershipKind, id: &str) -> Option<&MembershipRecord> {
        self.memberships.get(&(kind, id.to_string()))
    }

    pub fn memberships(&self) -> impl Iterator<Item = &MembershipRecord> {
        self.memberships.values()
    }

    /// Add `member` to a group or circle, creating the container on first
    /// use. Returns false when the member was already present.
    pub fn add_member(&mut self, kind: MembershipKind, id: &str, member: Member) -> bool {
        let record = self
            .memberships
            .entry((kind, id.to_string()))
            .or_insert_with(|| MembershipRecord {
                kind,
                id: id.to_string(),
                members: Vec::new(),
            });
        if record.members.contains(&member) {
            return false;
        }
        record.members.push(member);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use formgate_kernel::{Capability, Form, Share, ShareKind};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0)
            .single()
            .expect("fixed time")
    }

    fn submission(id: u64, form_id: u64, submitter: &str) -> Submission {
        Submission {
            id,
            form_id,
            submitter: submitter.to_string(),
            submitted_at: now(),
            updated_at: None,
            answers: Vec::new(),
        }
    }

    fn store_with_form() -> MemoryStore {
        let mut record = FormRecord::new(Form::new(1, "abc", "alice"));
        record.shares.push(
            Share::new(1, 1, ShareKind::Link, "tok", [Capability::Embed]).expect("link share"),
        );
        MemoryStore::from_records(vec![Record::Form(record)])
    }

    #[test]
    fn unique_insert_refuses_second_submission() {
        let mut store = store_with_form();
        store
            .insert_submission(submission(1, 1, "bob"), true)
            .expect("first submission");
        let err = store
            .insert_submission(submission(2, 1, "bob"), true)
            .expect_err("second must fail");
        assert!(matches!(
            err,
            MemoryStoreError::DuplicateSubmission {
                form_id: 1,
                ref submitter,
            } if submitter == "bob"
        ));

        store
            .insert_submission(submission(2, 1, "bob"), false)
            .expect("non-unique insert");
        assert_eq!(store.prior_submissions(1, "bob"), 2);
        assert!(store.own_submission(1, "bob").is_none());
    }

    #[test]
    fn insert_requires_existing_form() {
        let mut store = MemoryStore::default();
        let err = store
            .insert_submission(submission(1, 9, "bob"), true)
            .expect_err("missing form");
        assert!(matches!(err, MemoryStoreError::FormNotFound(9)));
    }

    #[test]
    fn delete_cascades_only_within_form() {
        let mut store = store_with_form();
        store
            .insert_form(FormRecord::new(Form::new(2, "def", "alice")))
            .expect("second form");
        store
            .insert_submission(submission(1, 1, "bob"), false)
            .expect("insert");
        store
            .insert_submission(submission(2, 1, "carol"), false)
            .expect("insert");
        store
            .insert_submission(submission(3, 2, "bob"), false)
            .expect("insert");

        let removed = store.delete_submissions(1, Some(&[2, 3]));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, 2);
        assert!(store.submission(3).is_some());

        let removed = store.delete_submissions(1, None);
        assert_eq!(removed.len(), 1);
        assert_eq!(store.submissions_for(1).count(), 0);
        assert_eq!(store.next_submission_id(), 4);
    }

    #[test]
    fn link_token_lookup_is_exact() {
        let mut store = store_with_form();
        assert!(store.form_by_link_token("tok").is_some());
        assert!(store.form_by_link_token("to").is_none());
        assert!(store.form_by_link_token("abc").is_none());

        if let Some(record) = store.form_mut(1) {
            record.form.access.legacy_link_enabled = true;
        }
        assert_eq!(
            store.form_by_link_token("abc").map(|record| record.form.id),
            Some(1)
        );
    }

    #[test]
    fn duplicate_hash_is_refused() {
        let mut store = store_with_form();
        let err = store
            .insert_form(FormRecord::new(Form::new(2, "abc", "bob")))
            .expect_err("hash collision");
        assert!(matches!(err, MemoryStoreError::DuplicateHash(hash) if hash == "abc"));
    }

    #[test]
    fn add_member_is_idempotent() {
        let mut store = MemoryStore::default();
        assert!(store.add_member(MembershipKind::Group, "staff", Member::User("bob".into())));
        assert!(!store.add_member(MembershipKind::Group, "staff", Member::User("bob".into())));
        assert_eq!(
            store
                .membership(MembershipKind::Group, "staff")
                .map(|record| record.members.len()),
            Some(1)
        );
    }
}
