use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use comfy_table::Table;
use tracing::{debug, info};

use sparkvault::config::Config;
use sparkvault::device::DeviceIdentityProvider;
use sparkvault::http_backend::HttpBackend;
use sparkvault::preferences::{FilePreferenceStore, ViewPreferences};
use sparkvault::repository::IdeaRepository;
use sparkvault::session::{
    load_session, pending_migration, save_session, set_pending_migration, Session, SessionKind,
    SessionManager,
};
use sparkvault::validation::{
    check_password, parse_tags, validate, validate_idea_id, validate_search_query,
    PasswordStrength,
};
use sparkvault::views::render_view;
use sparkvault::{Idea, IdeaInput, IdeaQuery, VaultError};

use crate::cli::{Cli, Command, ConfigCommand, CredentialArgs, EditArgs, IdeaArgs, ListArgs};

const CONFIG_KEYS: [&str; 4] = ["backend_url", "anon_key", "request_timeout_secs", "redirect_url"];

/// Local state shared by every command.
struct App {
    config: Config,
    prefs: FilePreferenceStore,
    backend_url: Option<String>,
    anon_key: Option<String>,
}

/// A backend connection with the saved session restored.
struct Connection {
    sessions: SessionManager<HttpBackend>,
    repository: IdeaRepository<HttpBackend>,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let config = Config::new(cli.config_dir.clone()).context("load config")?;
        let prefs = FilePreferenceStore::open(config.preferences_file()).context("open preferences")?;
        debug!(path = %prefs.path().display(), "Preferences opened");
        Ok(Self {
            config,
            prefs,
            backend_url: cli.backend_url.clone(),
            anon_key: cli.anon_key.clone(),
        })
    }

    fn device_id(&self) -> String {
        let device = DeviceIdentityProvider::new(&self.prefs).get_or_create_device_id();
        if !device.is_persisted() {
            eprintln!("warning: could not save the device id; it will change on the next run");
        }
        device.into_string()
    }

    fn connect(&mut self) -> Result<Connection> {
        self.config
            .apply_overrides(self.backend_url.take(), self.anon_key.take());
        if !self.config.is_backend_configured() {
            bail!(
                "backend is not configured; run `spark-vault config set backend_url <URL>` \
                 and `spark-vault config set anon_key <KEY>`"
            );
        }

        let backend = Arc::new(HttpBackend::from_config(&self.config)?);
        let sessions = SessionManager::new(Arc::clone(&backend))
            .with_redirect_url(self.config.redirect_url().map(String::from));
        if let Some(saved) = load_session(&self.prefs) {
            sessions.restore_session(saved)?;
        }
        Ok(Connection {
            sessions,
            repository: IdeaRepository::new(backend),
        })
    }

    fn persist_session(&self, sessions: &SessionManager<HttpBackend>) -> Result<()> {
        save_session(&self.prefs, sessions.current().as_ref()).context("save session")
    }

    /// The active session, starting a guest session for this device if none.
    async fn ensure_session(&self, conn: &Connection) -> Result<Session> {
        if let Some(session) = conn.sessions.current() {
            return Ok(session);
        }
        let device_id = self.device_id();
        let session = conn.sessions.sign_in_as_guest(Some(&device_id)).await?;
        self.persist_session(&conn.sessions)?;
        println!("Started a guest session on this device.");
        Ok(session)
    }
}

pub async fn run(cli: &Cli) -> Result<()> {
    let mut app = App::open(cli)?;

    match &cli.command {
        Command::Config(command) => run_config(&mut app, command),
        Command::Device => {
            println!("{}", app.device_id());
            Ok(())
        }
        Command::CheckPassword { password } => {
            print_password_check(password);
            Ok(())
        }
        Command::Guest => {
            let conn = app.connect()?;
            if conn.sessions.kind() == SessionKind::Credentialed {
                bail!("already signed in with an account; log out first");
            }
            let session = app.ensure_session(&conn).await?;
            print_session(&session);
            Ok(())
        }
        Command::Login(args) => {
            let conn = app.connect()?;
            let session = conn
                .sessions
                .sign_in_with_password(&args.email, &args.password)
                .await?;
            app.persist_session(&conn.sessions)?;
            print_session(&session);
            Ok(())
        }
        Command::Signup(args) => run_signup(&mut app, args).await,
        Command::MagicLink { email } => {
            let conn = app.connect()?;
            conn.sessions.send_magic_link(email).await?;
            println!("Check {} for a login link.", email.trim());
            Ok(())
        }
        Command::Promote(args) => run_promote(&mut app, args).await,
        Command::RetryMigration => run_retry_migration(&mut app).await,
        Command::Password { new, confirm } => {
            let conn = app.connect()?;
            conn.sessions.update_password(new, confirm).await?;
            app.persist_session(&conn.sessions)?;
            println!("Password updated.");
            Ok(())
        }
        Command::Logout => {
            let conn = app.connect()?;
            conn.sessions.sign_out().await?;
            save_session(&app.prefs, None).context("clear session")?;
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => {
            let conn = app.connect()?;
            match conn.sessions.current() {
                Some(_) => {
                    let session = conn.sessions.refresh_user().await;
                    app.persist_session(&conn.sessions)?;
                    print_session(&session?);
                }
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Command::List(args) => run_list(&mut app, args).await,
        Command::Show { id } => run_show(&mut app, id).await,
        Command::Add(args) => run_add(&mut app, args).await,
        Command::Edit { id, fields } => run_edit(&mut app, id, fields).await,
        Command::Delete { id } => {
            let id = validate_idea_id(id)?;
            let mut conn = app.connect()?;
            let session = app.ensure_session(&conn).await?;
            conn.repository.remove(&session, id).await?;
            println!("Deleted idea {}.", id);
            Ok(())
        }
    }
}

fn run_config(app: &mut App, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut table = Table::new();
            table.set_header(vec!["Key", "Value"]);
            for key in CONFIG_KEYS {
                let value = app.config.get(key).unwrap_or_default();
                let shown = if key == "anon_key" && !value.is_empty() {
                    format!("{}…", value.chars().take(6).collect::<String>())
                } else {
                    value
                };
                table.add_row(vec![key.to_string(), shown]);
            }
            println!("{table}");
            println!("config dir: {}", app.config.config_dir().display());
            Ok(())
        }
        ConfigCommand::Set { key, value } => {
            app.config.set(key, value)?;
            info!(key = %key, "Config updated");
            println!("{} updated.", key);
            Ok(())
        }
    }
}

fn print_password_check(password: &str) {
    let check = check_password(password);
    let label = match check.strength {
        PasswordStrength::Weak => "weak",
        PasswordStrength::Medium => "medium",
        PasswordStrength::Strong => "strong",
    };
    println!("Strength: {}", label);
    for error in &check.errors {
        println!("  - {}", error);
    }
}

fn print_session(session: &Session) {
    let kind = match session.kind() {
        SessionKind::Guest => "guest",
        SessionKind::Credentialed => "account",
        SessionKind::Unauthenticated => "signed out",
    };
    println!("Signed in as {} ({})", session.email.as_deref().unwrap_or("guest"), kind);
    println!("  user id:   {}", session.user_id);
    if let Some(device_id) = &session.metadata.device_id {
        println!("  device id: {}", device_id);
    }
}

async fn run_signup(app: &mut App, args: &CredentialArgs) -> Result<()> {
    let conn = app.connect()?;
    if conn.sessions.kind() == SessionKind::Guest {
        bail!("a guest session is active; use `spark-vault promote` to keep its ideas");
    }
    let session = conn.sessions.sign_up(&args.email, &args.password).await?;
    app.persist_session(&conn.sessions)?;
    print_session(&session);
    Ok(())
}

async fn run_promote(app: &mut App, args: &CredentialArgs) -> Result<()> {
    let conn = app.connect()?;
    let old_user_id = conn.sessions.current().map(|s| s.user_id);
    let result = conn
        .sessions
        .promote_guest_to_account(&args.email, &args.password)
        .await;
    app.persist_session(&conn.sessions)?;

    match result {
        Ok(promotion) => {
            set_pending_migration(&app.prefs, None)?;
            match promotion.migrated {
                Some(count) => println!("Account created. Moved {} idea(s) to it.", count),
                None => println!("Account created. Your ideas are already on it."),
            }
            print_session(&promotion.session);
            Ok(())
        }
        Err(e) if e.is_partial_migration() => {
            set_pending_migration(&app.prefs, old_user_id)?;
            Err(anyhow!(e).context("run `spark-vault retry-migration` to finish moving your ideas"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_retry_migration(app: &mut App) -> Result<()> {
    let Some(old_user_id) = pending_migration(&app.prefs) else {
        println!("Nothing to migrate.");
        return Ok(());
    };
    let conn = app.connect()?;
    let moved = conn.sessions.retry_migration(old_user_id).await?;
    set_pending_migration(&app.prefs, None)?;
    println!("Moved {} idea(s) to your account.", moved);
    Ok(())
}

async fn run_list(app: &mut App, args: &ListArgs) -> Result<()> {
    validate_search_query(&args.query)?;
    let mut view = ViewPreferences::load(&app.prefs);
    if let Some(sort) = args.sort {
        view.sort_field = sort.into();
    }
    if let Some(order) = args.order {
        view.sort_order = order.into();
    }
    if let Some(mode) = args.view {
        view.view_mode = mode.into();
    }

    let mut conn = app.connect()?;
    let session = app.ensure_session(&conn).await?;
    conn.repository.fetch_all(&session).await?;

    let query = IdeaQuery::new(args.query.clone())
        .sorted_by(view.sort_field, view.sort_order)
        .with_action_type(args.action.map(Into::into));
    println!("{}", render_view(conn.repository.ideas(), &query, view.view_mode));

    if args.save {
        view.save(&app.prefs).context("save view preferences")?;
    }
    Ok(())
}

async fn load_idea(app: &App, conn: &mut Connection, id: &str) -> Result<(Session, Idea)> {
    let id = validate_idea_id(id)?;
    let session = app.ensure_session(conn).await?;
    conn.repository.fetch_all(&session).await?;
    let idea = conn
        .repository
        .get(id)
        .cloned()
        .ok_or_else(|| VaultError::NotFound(format!("idea {}", id)))?;
    Ok((session, idea))
}

async fn run_show(app: &mut App, id: &str) -> Result<()> {
    let mut conn = app.connect()?;
    let (_, idea) = load_idea(app, &mut conn, id).await?;

    println!("{} {}", idea.action_type.icon(), idea.title);
    println!("  id:      {}", idea.id);
    println!("  action:  {}", idea.action_type.label());
    if !idea.tags.is_empty() {
        println!("  tags:    {}", idea.tags.join(", "));
    }
    println!("  created: {}", idea.created_at.format("%Y-%m-%d %H:%M"));
    println!("  updated: {}", idea.updated_at.format("%Y-%m-%d %H:%M"));
    if !idea.content.is_empty() {
        println!();
        println!("{}", idea.content);
    }
    Ok(())
}

/// Fail with every field error at once rather than only the first.
fn check_input(input: &IdeaInput) -> Result<()> {
    let report = validate(input);
    if report.is_valid() {
        return Ok(());
    }
    let details: Vec<String> = report
        .errors()
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect();
    bail!("invalid idea:\n  {}", details.join("\n  "))
}

async fn run_add(app: &mut App, args: &IdeaArgs) -> Result<()> {
    let input = IdeaInput::new(args.title.clone(), args.content.clone())
        .with_tags(parse_tags(&args.tags))
        .with_action_type(args.action.into());
    check_input(&input)?;

    let mut conn = app.connect()?;
    let session = app.ensure_session(&conn).await?;
    let idea = conn.repository.create(&session, &input).await?;
    println!("Captured idea {}.", idea.id);
    Ok(())
}

async fn run_edit(app: &mut App, id: &str, fields: &EditArgs) -> Result<()> {
    let mut conn = app.connect()?;
    let (session, idea) = load_idea(app, &mut conn, id).await?;

    let mut input = IdeaInput::from(&idea);
    if let Some(title) = &fields.title {
        input.title = title.clone();
    }
    if let Some(content) = &fields.content {
        input.content = content.clone();
    }
    if let Some(tags) = &fields.tags {
        input.tags = parse_tags(tags);
    }
    if let Some(action) = fields.action {
        input.action_type = action.into();
    }
    check_input(&input)?;

    let updated = conn.repository.update(&session, idea.id, &input).await?;
    println!("Updated idea {}.", updated.id);
    Ok(())
}
