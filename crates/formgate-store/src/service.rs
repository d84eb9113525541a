//! `FormService`: the operations a controller calls.
//!
//! Reads load a snapshot of the store without locking. Writes take the
//! store lock, waiting up to `store.lock_wait_ms`, resolve the caller's
//! capabilities against the locked state, and either mutate and persist or
//! return a typed error. Submission commit resolves uploads first and then
//! re-checks and inserts under the lock, so the one-submission check and
//! the insert are a single serializable step.

use crate::atomic_store::{
    AtomicStoreMutationError, LOCK_POLL_INTERVAL, StoreLock, mutate_store_jsonl, read_store_jsonl,
};
use crate::config::EngineConfig;
use crate::directory::MembershipDirectory;
use crate::memory::{MemoryStore, MemoryStoreError};
use crate::record::{Answer, FormRecord, Member, MembershipKind, StoredValue, Submission};
use crate::uploads::{StoredFile, UploadError, UploadResolver, resolve_with_retry};
use chrono::{DateTime, Duration, Utc};
use formgate_kernel::witness::rejection_witness_id;
use formgate_kernel::{
    AccessFlags, Actor, Admission, AnswerRule, AnswerValue, Capability, CapabilitySet, EditLease,
    Form, FormState, InvalidAnswer, LifecycleError, Question, QuestionDraft, QuestionSettings,
    RawAnswers, SettingsError, Share, ShareError, ShareKind, SubmitError, ValidatedAnswer,
    can_accept, is_listed_for, renumber, resolve_access, resolve_link, validate_answers,
};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const ANON_PREFIX: &str = "anon-user-";
const PSEUDONYM_HEX_LEN: usize = 16;

/// Errors from every non-submit operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// Also returned when the caller holds no capability at all, so a form's
    /// existence is not revealed.
    #[error("form not found")]
    NotFound,

    #[error("missing capability `{0}`")]
    Forbidden(Capability),

    #[error("only the form owner may {0}")]
    OwnerOnly(&'static str),

    #[error("submission not found")]
    SubmissionNotFound,

    #[error("this form does not allow editing submissions")]
    EditNotAllowed,

    #[error("form is being edited by {holder} until {until}")]
    LeaseHeld {
        holder: String,
        until: DateTime<Utc>,
    },

    #[error("archived forms cannot be edited")]
    Archived,

    #[error("share not found: {0}")]
    ShareNotFound(u64),

    #[error("question not found: {0}")]
    QuestionNotFound(u64),

    #[error("identity required")]
    IdentityRequired,

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("store lock busy: {0}")]
    LockBusy(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<MemoryStoreError> for ServiceError {
    fn from(err: MemoryStoreError) -> Self {
        match err {
            MemoryStoreError::FormNotFound(_) => ServiceError::NotFound,
            MemoryStoreError::SubmissionNotFound(_) => ServiceError::SubmissionNotFound,
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<std::convert::Infallible> for ServiceError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

fn flatten<E: Into<ServiceError> + Display>(err: AtomicStoreMutationError<E>) -> ServiceError {
    match err {
        AtomicStoreMutationError::Mutation(err) => err.into(),
        AtomicStoreMutationError::LockBusy { lock_path } => ServiceError::LockBusy(lock_path),
        other => ServiceError::Storage(other.to_string()),
    }
}

fn storage_failure(err: impl Display) -> SubmitError {
    SubmitError::StorageFailure(err.to_string())
}

/// A submission that passed every check against one store state.
struct Admitted {
    record: FormRecord,
    submitter: String,
    /// Whether the one-submission rule applies to this submitter.
    unique: bool,
    validated: Vec<ValidatedAnswer>,
}

/// Who is asking: an identity, a link token, both, or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Option<String>,
    pub link_token: Option<String>,
}

impl Requester {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            link_token: None,
        }
    }

    pub fn with_link_token(mut self, token: impl Into<String>) -> Self {
        self.link_token = Some(token.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Form settings chosen at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewForm {
    pub title: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub submit_multiple: bool,
    pub is_anonymous: bool,
    pub allow_edit_submissions: bool,
    pub access: AccessFlags,
}

/// The identity a submission is recorded under.
///
/// Non-anonymous forms record the user id. Anonymous forms record a stable
/// pseudonym derived from form and user, so the one-submission rule still
/// holds; callers without identity get a fresh random pseudonym.
pub fn submitter_for(form: &Form, actor: &Actor) -> String {
    match actor.user_id() {
        Some(user) if !form.is_anonymous => user.to_string(),
        Some(user) => {
            let digest = format!("{:x}", Sha256::digest(format!("{}:{user}", form.id)));
            format!("{ANON_PREFIX}{}", &digest[..PSEUDONYM_HEX_LEN])
        }
        None => format!("{ANON_PREFIX}{}", uuid::Uuid::new_v4().simple()),
    }
}

pub struct FormService {
    store_path: PathBuf,
    config: EngineConfig,
    uploads: Arc<dyn UploadResolver>,
}

impl FormService {
    pub fn new(
        store_path: impl Into<PathBuf>,
        config: EngineConfig,
        uploads: Arc<dyn UploadResolver>,
    ) -> Self {
        Self {
            store_path: store_path.into(),
            config,
            uploads,
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn capabilities(
        &self,
        store: &MemoryStore,
        record: &FormRecord,
        requester: &Requester,
    ) -> (Actor, CapabilitySet) {
        let actor = MembershipDirectory::from_store(store).actor_for(requester.user_id());
        let mut capabilities = resolve_access(
            &actor,
            &record.form,
            &record.shares,
            self.config.access_policy(),
        );
        if let Some(token) = requester.link_token.as_deref()
            && let Some(link) = resolve_link(&record.form, &record.shares, token)
        {
            capabilities.union_with(&link);
        }
        (actor, capabilities)
    }

    /// Capabilities the requester holds on `form_id`. A requester with none
    /// gets `NotFound`, the same as for a form that does not exist.
    pub fn resolve_access(
        &self,
        requester: &Requester,
        form_id: u64,
    ) -> Result<CapabilitySet, ServiceError> {
        let store = read_store_jsonl(&self.store_path).map_err(flatten)?;
        let record = store.form(form_id).ok_or(ServiceError::NotFound)?;
        let (_, capabilities) = self.capabilities(&store, record, requester);
        if capabilities.is_empty() {
            return Err(ServiceError::NotFound);
        }
        Ok(capabilities)
    }

    /// Whether the form would take a submission from the requester at `now`.
    ///
    /// Access is checked first; a requester without `submit` gets
    /// `AccessDenied`, never a hint about the form's state.
    pub fn can_accept(
        &self,
        requester: &Requester,
        form_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Admission, ServiceError> {
        let store = read_store_jsonl(&self.store_path).map_err(flatten)?;
        let Some(record) = store.form(form_id) else {
            return Ok(Admission::Reject(SubmitError::AccessDenied));
        };
        let (actor, capabilities) = self.capabilities(&store, record, requester);
        if !capabilities.can_submit() {
            return Ok(Admission::Reject(SubmitError::AccessDenied));
        }
        let prior = match actor.user_id() {
            Some(_) => store.prior_submissions(form_id, &submitter_for(&record.form, &actor)),
            None => 0,
        };
        Ok(can_accept(&record.form, &actor, now, prior))
    }

    /// Wait for the store lock for up to the configured budget.
    async fn lock_for_commit(&self) -> Result<StoreLock, SubmitError> {
        let deadline = Instant::now() + self.config.store.lock_wait();
        loop {
            match StoreLock::acquire(&self.store_path) {
                Ok(lock) => return Ok(lock),
                Err(AtomicStoreMutationError::LockBusy { .. }) if Instant::now() < deadline => {
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(err) => {
                    warn!(error = %err, "store lock unavailable");
                    return Err(storage_failure(err));
                }
            }
        }
    }

    fn save(&self, store: &MemoryStore) -> Result<(), MemoryStoreError> {
        match store.save_jsonl(&self.store_path) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "store write failed, retrying once");
                store.save_jsonl(&self.store_path)
            }
        }
    }

    fn load(&self) -> Result<MemoryStore, SubmitError> {
        MemoryStore::load_jsonl(&self.store_path).map_err(storage_failure)
    }

    /// Access, lifecycle gate and answer checks against one store state.
    fn admit(
        &self,
        store: &MemoryStore,
        requester: &Requester,
        form_id: u64,
        answers: &RawAnswers,
        now: DateTime<Utc>,
    ) -> Result<Admitted, SubmitError> {
        let Some(record) = store.form(form_id) else {
            debug!(form_id, "submit rejected: form not found");
            return Err(SubmitError::AccessDenied);
        };
        let (actor, capabilities) = self.capabilities(store, record, requester);
        if !capabilities.can_submit() {
            debug!(form_id, "submit rejected: no submit capability");
            return Err(SubmitError::AccessDenied);
        }

        let submitter = submitter_for(&record.form, &actor);
        let prior = store.prior_submissions(form_id, &submitter);
        if let Err(err) = can_accept(&record.form, &actor, now, prior).into_result() {
            debug!(form_id, reason = %err, "submit rejected by lifecycle gate");
            return Err(err);
        }

        let validated = validate_answers(form_id, &record.questions, answers).map_err(|err| {
            debug!(
                form_id,
                question_id = err.question_id,
                rule = %err.rule,
                "submit rejected: invalid answer"
            );
            SubmitError::InvalidAnswer(err)
        })?;
        Ok(Admitted {
            unique: !record.form.submit_multiple && !record.form.is_owner(actor.user_id()),
            record: record.clone(),
            submitter,
            validated,
        })
    }

    /// Check access, lifecycle and answers, then persist one submission with
    /// all of its answers, or nothing.
    ///
    /// Uploads are resolved before the store lock is taken. Under the lock
    /// every check runs again against the current store, so the
    /// one-submission rule and the insert still share one scope; a late
    /// rejection moves the resolved uploads back.
    pub async fn validate_and_commit(
        &self,
        requester: &Requester,
        form_id: u64,
        answers: &RawAnswers,
        now: DateTime<Utc>,
    ) -> Result<u64, SubmitError> {
        let snapshot = self.load()?;
        let admitted = self.admit(&snapshot, requester, form_id, answers, now)?;
        drop(snapshot);
        let (stored, files) = self.materialize(&admitted.record, admitted.validated).await?;

        let committed = match self.lock_for_commit().await {
            Ok(_lock) => self.insert_locked(requester, form_id, answers, now, stored),
            Err(err) => Err(err),
        };
        match committed {
            Ok(id) => {
                info!(form_id, submission_id = id, files = files.len(), "submission committed");
                Ok(id)
            }
            Err(err) => {
                self.rollback(&files).await;
                Err(err)
            }
        }
    }

    /// Caller holds the store lock.
    fn insert_locked(
        &self,
        requester: &Requester,
        form_id: u64,
        raw: &RawAnswers,
        now: DateTime<Utc>,
        answers: Vec<Answer>,
    ) -> Result<u64, SubmitError> {
        let mut store = self.load()?;
        let current = self.admit(&store, requester, form_id, raw, now)?;
        let submission = Submission {
            id: store.next_submission_id(),
            form_id,
            submitter: current.submitter,
            submitted_at: now,
            updated_at: None,
            answers,
        };
        let id = store
            .insert_submission(submission, current.unique)
            .map_err(|err| match err {
                MemoryStoreError::DuplicateSubmission { .. } => SubmitError::AlreadySubmitted,
                other => storage_failure(other),
            })?;
        self.save(&store).map_err(storage_failure)?;
        Ok(id)
    }

    /// Edit checks against one store state: the requester's own submission
    /// on an open form that allows editing.
    fn admit_edit(
        &self,
        store: &MemoryStore,
        requester: &Requester,
        form_id: u64,
        answers: &RawAnswers,
        now: DateTime<Utc>,
    ) -> Result<(FormRecord, u64, Vec<ValidatedAnswer>), ServiceError> {
        let record = store.form(form_id).ok_or(SubmitError::AccessDenied)?;
        let (actor, capabilities) = self.capabilities(store, record, requester);
        if !capabilities.can_submit() {
            return Err(SubmitError::AccessDenied.into());
        }
        if actor.user_id().is_none() {
            return Err(ServiceError::IdentityRequired);
        }
        if !record.form.allow_edit_submissions || record.form.submit_multiple {
            return Err(ServiceError::EditNotAllowed);
        }
        can_accept(&record.form, &actor, now, 0).into_result()?;

        let submitter = submitter_for(&record.form, &actor);
        let submission_id = store
            .own_submission(form_id, &submitter)
            .map(|submission| submission.id)
            .ok_or(ServiceError::SubmissionNotFound)?;
        let validated = validate_answers(form_id, &record.questions, answers)
            .map_err(SubmitError::InvalidAnswer)?;
        Ok((record.clone(), submission_id, validated))
    }

    /// Replace the requester's own answers on a form that allows editing.
    pub async fn update_submission(
        &self,
        requester: &Requester,
        form_id: u64,
        answers: &RawAnswers,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let snapshot = self.load()?;
        let (record, _, validated) = self.admit_edit(&snapshot, requester, form_id, answers, now)?;
        drop(snapshot);
        let (stored, files) = self.materialize(&record, validated).await?;
        let kept: Vec<String> = stored
            .iter()
            .filter_map(file_reference)
            .map(str::to_string)
            .collect();

        let replaced = match self.lock_for_commit().await {
            Ok(_lock) => self.replace_locked(requester, form_id, answers, now, stored),
            Err(err) => Err(err.into()),
        };
        let (submission_id, old) = match replaced {
            Ok(replaced) => replaced,
            Err(err) => {
                self.rollback(&files).await;
                return Err(err);
            }
        };

        for reference in old.iter().filter_map(file_reference) {
            if !kept.iter().any(|kept| kept == reference) {
                self.remove_file(reference).await;
            }
        }
        info!(form_id, submission_id, "submission updated");
        Ok(submission_id)
    }

    /// Caller holds the store lock. Returns the submission id and the
    /// answers it replaced.
    fn replace_locked(
        &self,
        requester: &Requester,
        form_id: u64,
        raw: &RawAnswers,
        now: DateTime<Utc>,
        answers: Vec<Answer>,
    ) -> Result<(u64, Vec<Answer>), ServiceError> {
        let mut store = self.load()?;
        let (_, submission_id, _) = self.admit_edit(&store, requester, form_id, raw, now)?;
        let old = store
            .replace_answers(submission_id, answers, now)
            .map_err(storage_failure)?;
        self.save(&store).map_err(storage_failure)?;
        Ok((submission_id, old))
    }

    /// Turn validated values into stored answers, resolving uploads.
    /// On failure every upload resolved so far is moved back, including one
    /// whose move may have landed after its attempt timed out.
    async fn materialize(
        &self,
        record: &FormRecord,
        validated: Vec<ValidatedAnswer>,
    ) -> Result<(Vec<Answer>, Vec<StoredFile>), SubmitError> {
        let mut answers = Vec::new();
        let mut files: Vec<StoredFile> = Vec::new();

        for answer in validated {
            let question = record.questions.iter().find(|q| q.id == answer.question_id);
            for value in answer.values {
                let value = match value {
                    AnswerValue::Text { text } => StoredValue::Text { text },
                    AnswerValue::Choice { option_id, text } => {
                        StoredValue::Choice { option_id, text }
                    }
                    AnswerValue::Other { text } => StoredValue::Other { text },
                    AnswerValue::Upload { token } => {
                        let file = match resolve_with_retry(
                            self.uploads.as_ref(),
                            record.form.id,
                            &token,
                            self.config.uploads.timeout(),
                            self.config.uploads.effective_retries(),
                        )
                        .await
                        {
                            Ok(file) => file,
                            Err(err) => {
                                if let UploadError::Timeout { .. } = err {
                                    files.push(StoredFile::pending(record.form.id, &token));
                                }
                                self.rollback(&files).await;
                                return Err(storage_failure(err));
                            }
                        };
                        let reference = file.reference.clone();
                        let size = file.size;
                        files.push(file);
                        let too_big = question.and_then(|q| oversized(record.form.id, q, size));
                        if let Some(rejection) = too_big {
                            self.rollback(&files).await;
                            return Err(SubmitError::InvalidAnswer(rejection));
                        }
                        StoredValue::File { reference, size }
                    }
                };
                answers.push(Answer {
                    question_id: answer.question_id,
                    value,
                });
            }
        }
        Ok((answers, files))
    }

    async fn rollback(&self, files: &[StoredFile]) {
        for file in files {
            if let Err(err) = self.uploads.restore(file).await {
                warn!(token = %file.token, error = %err, "failed to restore staged upload");
            }
        }
        if !files.is_empty() {
            warn!(files = files.len(), "rolled back resolved uploads");
        }
    }

    async fn remove_file(&self, reference: &str) {
        if let Err(err) = self.uploads.remove(reference).await {
            warn!(reference, error = %err, "failed to remove stored file");
        }
    }

    /// Submissions on a form, for holders of `results`.
    pub fn list_submissions(
        &self,
        requester: &Requester,
        form_id: u64,
    ) -> Result<Vec<Submission>, ServiceError> {
        let store = read_store_jsonl(&self.store_path).map_err(flatten)?;
        let record = store.form(form_id).ok_or(ServiceError::NotFound)?;
        let (_, capabilities) = self.capabilities(&store, record, requester);
        require(&capabilities, Capability::ViewResults)?;
        Ok(store.submissions_for(form_id).cloned().collect())
    }

    /// Delete all submissions (`ids = None`) or the selected ones, with
    /// their answers and stored files. Needs `results_delete`.
    pub async fn delete_submissions(
        &self,
        requester: &Requester,
        form_id: u64,
        ids: Option<Vec<u64>>,
    ) -> Result<usize, ServiceError> {
        let removed = self.mutate(|store| {
            let record = store.form(form_id).ok_or(ServiceError::NotFound)?;
            let (_, capabilities) = self.capabilities(store, record, requester);
            require(&capabilities, Capability::DeleteResults)?;
            let removed = store.delete_submissions(form_id, ids.as_deref());
            let changed = !removed.is_empty();
            Ok((removed, changed))
        })?;

        for reference in removed
            .iter()
            .flat_map(|submission| submission.answers.iter())
            .filter_map(file_reference)
        {
            self.remove_file(reference).await;
        }
        info!(form_id, deleted = removed.len(), "submissions deleted");
        Ok(removed.len())
    }

    /// Create a form owned by `owner`, with a fresh random hash.
    pub fn create_form(&self, owner: &str, new_form: NewForm) -> Result<Form, ServiceError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(ServiceError::IdentityRequired);
        }
        let form = self.mutate(|store| {
            let mut form = Form::new(
                store.next_form_id(),
                uuid::Uuid::new_v4().simple().to_string(),
                owner,
            );
            form.title = new_form.title;
            form.expires_at = new_form.expires_at;
            form.submit_multiple = new_form.submit_multiple;
            form.is_anonymous = new_form.is_anonymous;
            form.allow_edit_submissions = new_form.allow_edit_submissions;
            form.access = new_form.access;
            store.insert_form(FormRecord::new(form.clone()))?;
            Ok((form, true))
        })?;
        info!(form_id = form.id, owner, "form created");
        Ok(form)
    }

    /// The form as the requester may see it. Shares are only shown to the
    /// owner.
    pub fn form(&self, requester: &Requester, form_id: u64) -> Result<FormRecord, ServiceError> {
        let store = read_store_jsonl(&self.store_path).map_err(flatten)?;
        let record = store.form(form_id).ok_or(ServiceError::NotFound)?;
        let (_, capabilities) = self.capabilities(&store, record, requester);
        if capabilities.is_empty() {
            return Err(ServiceError::NotFound);
        }
        let mut record = record.clone();
        if !record.form.is_owner(requester.user_id()) {
            record.shares.clear();
        }
        Ok(record)
    }

    /// The form a link token opens, either through a link share or an
    /// enabled legacy hash.
    pub fn form_for_link(&self, token: &str) -> Result<u64, ServiceError> {
        let store = read_store_jsonl(&self.store_path).map_err(flatten)?;
        store
            .form_by_link_token(token)
            .map(|record| record.form.id)
            .ok_or(ServiceError::NotFound)
    }

    /// Forms shown in the requester's navigation.
    pub fn listed_forms(&self, requester: &Requester) -> Result<Vec<Form>, ServiceError> {
        let store = read_store_jsonl(&self.store_path).map_err(flatten)?;
        let actor = MembershipDirectory::from_store(&store).actor_for(requester.user_id());
        let policy = self.config.access_policy();
        Ok(store
            .forms()
            .filter(|record| is_listed_for(&actor, &record.form, &record.shares, policy))
            .map(|record| record.form.clone())
            .collect())
    }

    /// Owner-triggered lifecycle transition.
    pub fn set_state(
        &self,
        requester: &Requester,
        form_id: u64,
        state: FormState,
    ) -> Result<Form, ServiceError> {
        let form = self.mutate_owned(requester, form_id, "change the form state", |record| {
            record.form.transition(state)?;
            Ok(record.form.clone())
        })?;
        info!(form_id, state = state.as_str(), "form state changed");
        Ok(form)
    }

    /// Owner-only: grant capabilities to a user, group, circle or link.
    ///
    /// Link shares ignore `target` and get a fresh random token.
    pub fn add_share(
        &self,
        requester: &Requester,
        form_id: u64,
        kind: ShareKind,
        target: Option<&str>,
        capabilities: Vec<Capability>,
    ) -> Result<Share, ServiceError> {
        let share = self.mutate(|store| {
            let share_id = store.next_share_id();
            let record = owned_record(store, requester, form_id, "share the form")?;
            let target = match kind {
                ShareKind::Link => uuid::Uuid::new_v4().simple().to_string(),
                _ => target.unwrap_or_default().to_string(),
            };
            let share = Share::new(share_id, form_id, kind, target, capabilities)?;
            record.shares.push(share.clone());
            Ok((share, true))
        })?;
        info!(form_id, share_id = share.id, kind = share.kind.as_str(), "share added");
        Ok(share)
    }

    pub fn remove_share(
        &self,
        requester: &Requester,
        form_id: u64,
        share_id: u64,
    ) -> Result<Share, ServiceError> {
        let share = self.mutate_owned(requester, form_id, "remove shares", |record| {
            let index = record
                .shares
                .iter()
                .position(|share| share.id == share_id)
                .ok_or(ServiceError::ShareNotFound(share_id))?;
            Ok(record.shares.remove(index))
        })?;
        info!(form_id, share_id, "share removed");
        Ok(share)
    }

    /// Owner-only: append a question. Ids, order and option ids are
    /// assigned here; the settings are checked as one unit.
    pub fn add_question(
        &self,
        requester: &Requester,
        form_id: u64,
        mut draft: QuestionDraft,
        now: DateTime<Utc>,
    ) -> Result<Question, ServiceError> {
        let question = self.mutate(|store| {
            let question_id = store.next_question_id();
            let mut option_id = store.next_option_id();
            let record = editable_record(store, requester, form_id, now)?;

            draft.id = question_id;
            draft.form_id = form_id;
            draft.deleted = false;
            draft.order = record.questions.iter().filter(|q| !q.deleted).count() as u32 + 1;
            for (index, option) in draft.options.iter_mut().enumerate() {
                option.id = option_id;
                option_id += 1;
                if option.order == 0 {
                    option.order = index as u32 + 1;
                }
            }
            let question = Question::from_draft(draft)?;
            record.questions.push(question.clone());
            Ok((question, true))
        })?;
        info!(form_id, question_id = question.id, "question added");
        Ok(question)
    }

    /// Owner-only: soft-delete a question and renumber the rest.
    pub fn delete_question(
        &self,
        requester: &Requester,
        form_id: u64,
        question_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.mutate(|store| {
            let record = editable_record(store, requester, form_id, now)?;
            let question = record
                .questions
                .iter_mut()
                .find(|q| q.id == question_id && !q.deleted)
                .ok_or(ServiceError::QuestionNotFound(question_id))?;
            question.deleted = true;
            renumber(&mut record.questions);
            Ok(((), true))
        })?;
        info!(form_id, question_id, "question deleted");
        Ok(())
    }

    /// Take or extend the edit lease on a form's questions.
    pub fn acquire_edit_lease(
        &self,
        requester: &Requester,
        form_id: u64,
        now: DateTime<Utc>,
    ) -> Result<EditLease, ServiceError> {
        let ttl = self.config.leases.edit_ttl_seconds;
        let lease = self.mutate(|store| {
            let record = editable_record(store, requester, form_id, now)?;
            let holder = requester.user_id().ok_or(ServiceError::IdentityRequired)?;
            let expires_at = now
                .checked_add_signed(Duration::seconds(ttl))
                .ok_or_else(|| ServiceError::Invalid("lease expiry out of range".to_string()))?;
            let lease = EditLease {
                holder: holder.to_string(),
                acquired_at: now,
                expires_at,
            };
            record.form.lease = Some(lease.clone());
            Ok((lease, true))
        })?;
        info!(
            form_id,
            holder = %lease.holder,
            expires_at = %lease.expires_at,
            "edit lease acquired"
        );
        Ok(lease)
    }

    /// Release the lease. Releasing a lease that is free or expired is a no-op.
    pub fn release_edit_lease(
        &self,
        requester: &Requester,
        form_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let released = self.mutate(|store| {
            let record = editable_record(store, requester, form_id, now)?;
            let released = record.form.lease.take().is_some();
            Ok((released, released))
        })?;
        if released {
            info!(form_id, "edit lease released");
        }
        Ok(())
    }

    /// Add a user, group or circle to a group or circle.
    pub fn add_member(
        &self,
        kind: MembershipKind,
        container: &str,
        member: Member,
    ) -> Result<bool, ServiceError> {
        let container = container.trim();
        if container.is_empty() {
            return Err(ServiceError::Invalid("membership id must not be empty".to_string()));
        }
        let added = self.mutate(|store| {
            let added = store.add_member(kind, container, member);
            Ok((added, added))
        })?;
        if added {
            info!(kind = kind.as_str(), container, "member added");
        }
        Ok(added)
    }

    fn mutate<T>(
        &self,
        mutator: impl FnOnce(&mut MemoryStore) -> Result<(T, bool), ServiceError>,
    ) -> Result<T, ServiceError> {
        mutate_store_jsonl(&self.store_path, self.config.store.lock_wait(), mutator)
            .map_err(flatten)
    }

    fn mutate_owned<T>(
        &self,
        requester: &Requester,
        form_id: u64,
        action: &'static str,
        mutate: impl FnOnce(&mut FormRecord) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        self.mutate(|store| {
            let record = owned_record(store, requester, form_id, action)?;
            Ok((mutate(record)?, true))
        })
    }
}

fn require(capabilities: &CapabilitySet, capability: Capability) -> Result<(), ServiceError> {
    if capabilities.is_empty() {
        return Err(ServiceError::NotFound);
    }
    if !capabilities.contains(capability) {
        return Err(ServiceError::Forbidden(capability));
    }
    Ok(())
}

fn owned_record<'a>(
    store: &'a mut MemoryStore,
    requester: &Requester,
    form_id: u64,
    action: &'static str,
) -> Result<&'a mut FormRecord, ServiceError> {
    let record = store.form_mut(form_id).ok_or(ServiceError::NotFound)?;
    if !record.form.is_owner(requester.user_id()) {
        return Err(ServiceError::OwnerOnly(action));
    }
    Ok(record)
}

/// Owner-only, not archived, and no other editor holds a live lease.
fn editable_record<'a>(
    store: &'a mut MemoryStore,
    requester: &Requester,
    form_id: u64,
    now: DateTime<Utc>,
) -> Result<&'a mut FormRecord, ServiceError> {
    let record = owned_record(store, requester, form_id, "edit the form")?;
    if record.form.state == FormState::Archived {
        return Err(ServiceError::Archived);
    }
    let editor = requester.user_id().unwrap_or_default();
    if let Some(lease) = record.form.lease.as_ref().filter(|lease| lease.blocks(editor, now)) {
        return Err(ServiceError::LeaseHeld {
            holder: lease.holder.clone(),
            until: lease.expires_at,
        });
    }
    Ok(record)
}

fn file_reference(answer: &Answer) -> Option<&str> {
    match &answer.value {
        StoredValue::File { reference, .. } => Some(reference.as_str()),
        _ => None,
    }
}

fn oversized(form_id: u64, question: &Question, size: u64) -> Option<InvalidAnswer> {
    let QuestionSettings::File {
        max_file_size: Some(max),
        ..
    } = question.settings
    else {
        return None;
    };
    (size > max).then(|| InvalidAnswer {
        witness_id: rejection_witness_id(form_id, question.id, AnswerRule::Range),
        question_id: question.id,
        order: question.order,
        rule: AnswerRule::Range,
        message: format!("file exceeds the maximum size of {max} bytes"),
    })
}
