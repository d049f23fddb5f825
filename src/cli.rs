//! CLI argument definitions for Spark Vault.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use sparkvault::{ActionType, SortField, SortOrder, ViewMode};

#[derive(Parser)]
#[command(
    name = "spark-vault",
    version,
    about = "Spark Vault - capture ideas, sort them out later",
    long_about = "Capture short idea notes and keep them in your Spark Vault.\n\n\
                  Start as a guest on this device and turn the guest into a full\n\
                  account later without losing anything."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Directory holding config.json and preferences.json.
    #[arg(long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Backend URL for this run (not saved).
    #[arg(long = "backend-url", env = "SPARK_VAULT_URL", global = true)]
    pub backend_url: Option<String>,

    /// Public API key for this run (not saved).
    #[arg(long = "anon-key", env = "SPARK_VAULT_ANON_KEY", global = true, hide_env_values = true)]
    pub anon_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show or change connection settings.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print this installation's device identifier.
    Device,

    /// Start a guest session tied to this device.
    Guest,

    /// Sign in with email and password.
    Login(CredentialArgs),

    /// Create a new account and sign in to it.
    Signup(CredentialArgs),

    /// Email a one-time login link.
    MagicLink {
        #[arg(value_name = "EMAIL")]
        email: String,
    },

    /// Turn the current guest session into an account, keeping its ideas.
    Promote(CredentialArgs),

    /// Finish moving ideas after an interrupted promotion.
    RetryMigration,

    /// Change the account password.
    Password {
        /// New password.
        #[arg(long, env = "SPARK_VAULT_NEW_PASSWORD", hide_env_values = true)]
        new: String,
        /// Repeat the new password.
        #[arg(long)]
        confirm: String,
    },

    /// Rate a password candidate against the password policy.
    CheckPassword {
        #[arg(value_name = "PASSWORD")]
        password: String,
    },

    /// End the current session.
    Logout,

    /// Show the current session.
    Whoami,

    /// List ideas.
    List(ListArgs),

    /// Show one idea in full.
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Capture a new idea.
    Add(IdeaArgs),

    /// Change an existing idea. Omitted fields keep their value.
    Edit {
        #[arg(value_name = "ID")]
        id: String,
        #[command(flatten)]
        fields: EditArgs,
    },

    /// Delete an idea.
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print every setting.
    Show,
    /// Change a setting (backend_url, anon_key, request_timeout_secs, redirect_url).
    Set {
        key: String,
        value: String,
    },
}

#[derive(Args)]
pub struct CredentialArgs {
    #[arg(value_name = "EMAIL")]
    pub email: String,

    #[arg(long, env = "SPARK_VAULT_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only ideas whose title, content or tags contain this text.
    #[arg(long = "query", default_value = "")]
    pub query: String,

    /// Only ideas with this action type.
    #[arg(long = "action", value_enum)]
    pub action: Option<ActionArg>,

    /// Sort field (defaults to the saved preference).
    #[arg(long = "sort", value_enum)]
    pub sort: Option<SortArg>,

    /// Sort order (defaults to the saved preference).
    #[arg(long = "order", value_enum)]
    pub order: Option<OrderArg>,

    /// Layout (defaults to the saved preference).
    #[arg(long = "view", value_enum)]
    pub view: Option<ViewArg>,

    /// Remember --sort, --order and --view for later runs.
    #[arg(long = "save")]
    pub save: bool,
}

#[derive(Args)]
pub struct IdeaArgs {
    #[arg(value_name = "TITLE")]
    pub title: String,

    #[arg(long, default_value = "")]
    pub content: String,

    /// Comma-separated tags.
    #[arg(long, default_value = "")]
    pub tags: String,

    #[arg(long = "action", value_enum, default_value = "pending")]
    pub action: ActionArg,
}

#[derive(Args)]
pub struct EditArgs {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub content: Option<String>,

    /// Comma-separated tags; an empty string clears them.
    #[arg(long)]
    pub tags: Option<String>,

    #[arg(long = "action", value_enum)]
    pub action: Option<ActionArg>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ActionArg {
    BuildApp,
    UseExisting,
    Pending,
}

impl From<ActionArg> for ActionType {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::BuildApp => ActionType::BuildApp,
            ActionArg::UseExisting => ActionType::UseExisting,
            ActionArg::Pending => ActionType::Pending,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Created,
    Updated,
    Title,
    Action,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Created => SortField::CreatedAt,
            SortArg::Updated => SortField::UpdatedAt,
            SortArg::Title => SortField::Title,
            SortArg::Action => SortField::ActionType,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ViewArg {
    Grid,
    List,
    Compact,
    Table,
}

impl From<ViewArg> for ViewMode {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Grid => ViewMode::Grid,
            ViewArg::List => ViewMode::List,
            ViewArg::Compact => ViewMode::Compact,
            ViewArg::Table => ViewMode::Table,
        }
    }
}
