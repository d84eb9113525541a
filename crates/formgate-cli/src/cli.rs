use clap::{ArgAction, Args, Parser, Subcommand};
use formgate_kernel::{Capability, FormState, ShareKind};
use formgate_store::{DEFAULT_CONFIG_FILE, MembershipKind};

#[derive(Parser)]
#[command(
    name = "formgate",
    about = "Formgate: access resolution and submission validation for shared surveys",
    version
)]
pub struct Cli {
    /// Log more (-v debug, -vv trace); otherwise RUST_LOG or `warn`
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Store selection and output format, shared by every store command.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Path to the form store JSONL (defaults to `[store] path` in the config)
    #[arg(long)]
    pub store: Option<String>,

    /// Path to the engine config
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Who is calling.
#[derive(Args, Debug, Clone, Default)]
pub struct ActorArgs {
    /// Acting user id; omit for an anonymous caller
    #[arg(long = "as", value_name = "USER")]
    pub user: Option<String>,

    /// Link token presented by the caller
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .formgate layout and a default formgate.toml
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create, inspect and transition forms
    Form {
        #[command(subcommand)]
        command: FormCommands,
    },

    /// Edit a form's questions
    Question {
        #[command(subcommand)]
        command: QuestionCommands,
    },

    /// Grant or revoke capabilities on a form
    Share {
        #[command(subcommand)]
        command: ShareCommands,
    },

    /// Manage group and circle membership
    Member {
        #[command(subcommand)]
        command: MemberCommands,
    },

    /// Print the capabilities a caller holds on a form
    Access {
        /// Form id (resolved from --token when omitted)
        form_id: Option<u64>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Check whether a form would take a submission from the caller
    Accept {
        /// Form id (resolved from --token when omitted)
        form_id: Option<u64>,

        /// Evaluate at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Validate and commit a submission
    Submit {
        /// Form id (resolved from --token when omitted)
        form_id: Option<u64>,

        /// Answers as a JSON object of question id to token list, or @path
        #[arg(long)]
        answers: String,

        /// Submit at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Change an existing submission
    Submission {
        #[command(subcommand)]
        command: SubmissionCommands,
    },

    /// Read or delete collected submissions
    Results {
        #[command(subcommand)]
        command: ResultsCommands,
    },

    /// Take or release the edit lease on a form's questions
    Lease {
        #[command(subcommand)]
        command: LeaseCommands,
    },
}

#[derive(Subcommand)]
pub enum FormCommands {
    /// Create a form owned by the caller
    Create {
        /// Form title
        #[arg(long, default_value = "")]
        title: String,

        /// Expiry as an RFC 3339 instant
        #[arg(long)]
        expires: Option<String>,

        /// Allow more than one submission per submitter
        #[arg(long)]
        submit_multiple: bool,

        /// Record submitters under pseudonyms
        #[arg(long)]
        anonymous: bool,

        /// Let submitters edit their own submission
        #[arg(long)]
        allow_edit: bool,

        /// Access flags in wire form (0..=5)
        #[arg(long, default_value_t = 0)]
        access: i64,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Move a form to active, closed or archived
    State {
        form_id: u64,

        /// Target state
        state: FormState,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Show a form with its questions
    Show {
        /// Form id (resolved from --token when omitted)
        form_id: Option<u64>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// List forms in the caller's navigation
    List {
        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },
}

#[derive(Subcommand)]
pub enum QuestionCommands {
    /// Append a question
    Add {
        form_id: u64,

        /// Question type (short_text, long_text, date, datetime, time, radio,
        /// dropdown, checkbox, linear_scale, file, color)
        #[arg(long = "type")]
        question_type: String,

        /// Question text
        #[arg(long, default_value = "")]
        text: String,

        /// Require an answer
        #[arg(long)]
        required: bool,

        /// Type-specific settings as a JSON object
        #[arg(long)]
        settings: Option<String>,

        /// Choice option text (repeatable, in display order)
        #[arg(long = "option")]
        options: Vec<String>,

        /// Evaluate the edit lease at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Soft-delete a question and renumber the rest
    Delete {
        form_id: u64,

        question_id: u64,

        /// Evaluate the edit lease at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },
}

#[derive(Subcommand)]
pub enum ShareCommands {
    /// Add a share; link shares get a generated token
    Add {
        form_id: u64,

        /// Share kind: user, group, circle or link
        #[arg(long)]
        kind: ShareKind,

        /// User, group or circle id (ignored for links)
        #[arg(long)]
        target: Option<String>,

        /// Extra capability beyond submit (repeatable)
        #[arg(long = "cap")]
        capabilities: Vec<Capability>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Remove a share
    Remove {
        form_id: u64,

        share_id: u64,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Add a user, group or circle to a group or circle
    Add {
        /// Container kind: group or circle
        kind: MembershipKind,

        /// Container id
        container: String,

        /// Member id
        member: String,

        /// Member kind: user, group or circle
        #[arg(long, default_value = "user")]
        member_kind: String,

        #[command(flatten)]
        common: StoreArgs,
    },
}

#[derive(Subcommand)]
pub enum SubmissionCommands {
    /// Replace the caller's own answers
    Edit {
        form_id: u64,

        /// Answers as a JSON object of question id to token list, or @path
        #[arg(long)]
        answers: String,

        /// Edit at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },
}

#[derive(Subcommand)]
pub enum ResultsCommands {
    /// List submissions (needs `results`)
    List {
        form_id: u64,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Delete selected submissions, or all with --all (needs `results_delete`)
    Delete {
        form_id: u64,

        /// Submission id to delete (repeatable)
        #[arg(long = "id")]
        ids: Vec<u64>,

        /// Delete every submission on the form
        #[arg(long, conflicts_with = "ids")]
        all: bool,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },
}

#[derive(Subcommand)]
pub enum LeaseCommands {
    /// Take or extend the edit lease
    Acquire {
        form_id: u64,

        /// Acquire at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },

    /// Release the edit lease
    Release {
        form_id: u64,

        /// Release at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,

        #[command(flatten)]
        common: StoreArgs,
    },
}
