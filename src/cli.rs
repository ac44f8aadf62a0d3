use crate::commands::{self, Command, HELP};
use crate::config::Config;
use crate::error::AppError;
use crate::session::Session;
use crate::tasks::Filter;
use crate::transcript::Transcript;
use crate::view::{
    self, AuthForm, IntroPhase, IntroSequence, Screen, StudentSection, TeacherSection, ViewState,
};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::time::Instant;

const APP_TITLE: &str = "Classdesk";

pub struct Context {
    pub config: Config,
    pub session: RefCell<Session>,
    pub view: RefCell<ViewState>,
    pub auth: RefCell<AuthForm>,
    pub transcript: RefCell<Option<Transcript>>,
    pub session_id: String,
    /// Human-readable description of the storage backend
    pub storage_label: String,
    pub play_intro: bool,
}

impl Context {
    fn screen(&self) -> Screen {
        let session = self.session.borrow();
        view::route(&self.view.borrow(), session.state(), session.viewing())
    }

    /// Write a transcript event; failures are only warned about
    fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut Transcript) -> Result<()>,
    {
        if let Some(transcript) = self.transcript.borrow_mut().as_mut() {
            if let Err(e) = f(transcript) {
                tracing::warn!("transcript write failed: {}", e);
            }
        }
    }
}

/// Play the splash, then resume any remembered session
pub fn start(ctx: &Context) {
    if ctx.play_intro {
        play_intro(ctx, IntroSequence::new(ctx.config.intro.speed()));
    }

    let resumed = ctx.session.borrow_mut().boot();
    let user = ctx.session.borrow().current_username().map(str::to_string);
    ctx.record(|t| t.boot(user.as_deref()));
    if resumed {
        println!("Welcome back, {}!", user.unwrap_or_default());
    }
}

fn play_intro(ctx: &Context, intro: IntroSequence) {
    let started = Instant::now();
    for (at, phase) in intro.transitions() {
        if let Some(wait) = at.checked_sub(started.elapsed()) {
            std::thread::sleep(wait);
        }
        ctx.view.borrow_mut().intro = phase;
        match phase {
            Some(IntroPhase::Loading) => println!("Loading..."),
            Some(IntroPhase::Title) => println!("\n    {}\n", APP_TITLE),
            Some(IntroPhase::FadeOut) | None => {}
        }
    }
}

/// Execute commands without a prompt, stopping at /exit
pub fn run_once(ctx: &Context, lines: &[String]) -> Result<()> {
    start(ctx);
    for line in lines {
        println!(">>> {}", line);
        if dispatch(ctx, line) {
            break;
        }
    }
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    start(&ctx);
    println!("{} - type /help for commands, /exit to quit", APP_TITLE);
    let mut last_screen = None;

    loop {
        let screen = ctx.screen();
        if last_screen.as_ref() != Some(&screen) {
            render_screen(&ctx, &screen);
            last_screen = Some(screen.clone());
        }

        match rl.readline(&prompt(&screen)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                if dispatch(&ctx, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

fn prompt(screen: &Screen) -> String {
    match screen {
        Screen::Intro(_) => "... ".to_string(),
        Screen::Auth(mode) => format!("{}> ", mode.as_str()),
        Screen::AdminInspect { admin, target } => format!("{}@{}> ", admin, target),
        Screen::TeacherHome { username, .. }
        | Screen::StudentHome { username, .. }
        | Screen::TaskList { username, .. } => format!("{}> ", username),
    }
}

/// Parse and run one line. Returns true when the user asked to exit.
fn dispatch(ctx: &Context, line: &str) -> bool {
    let banner_before = ctx.session.borrow().banner().map(str::to_string);

    let exit = match commands::parse(line) {
        Ok(Some(cmd)) => handle_command(ctx, cmd),
        Ok(None) => false,
        Err(msg) => {
            println!("{}", msg);
            false
        }
    };

    let banner_after = ctx.session.borrow().banner().map(str::to_string);
    if let Some(banner) = banner_after {
        if banner_before.as_deref() != Some(banner.as_str()) {
            println!("! {}", banner);
            ctx.record(|t| t.storage_write_failed(&banner));
        }
    }
    exit
}

fn report(err: &AppError) {
    tracing::debug!("command failed: {}", err);
    println!("Error: {}", err.user_message());
}

fn handle_command(ctx: &Context, cmd: Command) -> bool {
    match cmd {
        Command::Exit => return true,
        Command::Help => {
            println!("Commands:");
            for (syntax, help) in HELP {
                println!("  {:<46} - {}", syntax, help);
            }
        }
        Command::WhoAmI => show_session(ctx),
        Command::Config => match ctx.config.to_toml() {
            Ok(rendered) => println!("{}", rendered.trim_end()),
            Err(e) => eprintln!("Failed to render config: {}", e),
        },
        Command::Mode(mode) => {
            ctx.auth.borrow_mut().set_mode(mode);
            ctx.view.borrow_mut().auth_mode = mode;
        }
        Command::Login { username, password } => {
            let mut auth = ctx.auth.borrow_mut();
            auth.set_mode(view::AuthMode::Login);
            ctx.view.borrow_mut().auth_mode = view::AuthMode::Login;
            submit_auth(ctx, &mut auth, &username, &password, crate::users::Role::Student);
        }
        Command::Signup {
            username,
            password,
            role,
        } => {
            let mut auth = ctx.auth.borrow_mut();
            auth.set_mode(view::AuthMode::Signup);
            ctx.view.borrow_mut().auth_mode = view::AuthMode::Signup;
            submit_auth(ctx, &mut auth, &username, &password, role);
        }
        Command::Logout => {
            let user = ctx.session.borrow().current_username().map(str::to_string);
            match user {
                Some(user) => {
                    ctx.session.borrow_mut().logout();
                    *ctx.view.borrow_mut() = ViewState {
                        auth_mode: ctx.auth.borrow().mode(),
                        ..ViewState::default()
                    };
                    ctx.record(|t| t.logout(&user));
                    println!("Logged out {}", user);
                }
                None => println!("Not logged in"),
            }
        }
        Command::List => render_tasks(ctx),
        Command::Filter(filter) => {
            ctx.view.borrow_mut().filter = filter;
            render_tasks(ctx);
        }
        Command::Add(text) => {
            let result = ctx.session.borrow_mut().add_task(&text);
            match result {
                Ok(true) => render_tasks(ctx),
                Ok(false) => println!("Task text cannot be empty"),
                Err(e) => report(&e),
            }
        }
        Command::Toggle(id) => {
            let result = ctx.session.borrow_mut().toggle_task(&id);
            after_task_change(ctx, result, &id);
        }
        Command::Edit { id, text } => {
            let result = ctx.session.borrow_mut().edit_task(&id, &text);
            match result {
                Ok(false) if text.trim().is_empty() => println!("Empty edit discarded"),
                other => after_task_change(ctx, other, &id),
            }
        }
        Command::Delete(id) => {
            let result = ctx.session.borrow_mut().delete_task(&id);
            after_task_change(ctx, result, &id);
        }
        Command::ClearCompleted => {
            let result = ctx.session.borrow_mut().clear_completed();
            match result {
                Ok(true) => render_tasks(ctx),
                Ok(false) => println!("No completed tasks"),
                Err(e) => report(&e),
            }
        }
        Command::Users => render_users(ctx),
        Command::ViewAs(target) => view_as(ctx, &target),
        Command::ViewOwn => {
            let admin = ctx.session.borrow().current_username().map(str::to_string);
            if let Some(admin) = admin.filter(|_| ctx.session.borrow().is_admin()) {
                ctx.session.borrow_mut().view_own_todos();
                ctx.record(|t| t.view_own(&admin));
            } else {
                println!("Only admins can switch task views");
            }
        }
        Command::DeleteUser(target) => delete_user(ctx, &target),
        Command::Section(name) => select_section(ctx, &name),
        Command::Announcements => render_announcements(ctx),
        Command::Announce { title, content } => {
            let result = ctx.session.borrow_mut().post_announcement(&title, &content);
            match result {
                Ok(Some(posted)) => println!("Posted announcement {}", posted.id),
                Ok(None) => println!("Title and content are required"),
                Err(e) => report(&e),
            }
        }
        Command::Unannounce(id) => {
            let result = ctx.session.borrow_mut().delete_announcement(&id);
            match result {
                Ok(true) => println!("Deleted announcement {}", id),
                Ok(false) => println!("No announcement with id {}", id),
                Err(e) => report(&e),
            }
        }
        Command::DismissBanner => ctx.session.borrow_mut().dismiss_banner(),
    }
    false
}

fn submit_auth(
    ctx: &Context,
    auth: &mut AuthForm,
    username: &str,
    password: &str,
    role: crate::users::Role,
) {
    let mode = auth.mode();
    let result = auth.submit(&mut ctx.session.borrow_mut(), username, password, role);
    match result {
        Ok(principal) => {
            {
                let mut view = ctx.view.borrow_mut();
                view.teacher_section = TeacherSection::default();
                view.student_section = StudentSection::default();
            }
            match mode {
                view::AuthMode::Signup => ctx.record(|t| {
                    t.signup(
                        &principal.username,
                        principal.role.map(|r| r.as_str()).unwrap_or("none"),
                        principal.is_admin,
                    )
                }),
                view::AuthMode::Login => ctx.record(|t| t.login(&principal.username)),
            }
            if principal.is_admin && mode == view::AuthMode::Signup {
                println!("You are the first user and have been made admin.");
            }
        }
        Err(e) => {
            let reason = e.to_string();
            ctx.record(|t| t.login_failed(username.trim(), &reason));
            match auth.error() {
                Some(msg) => println!("{}", msg),
                None => report(&e),
            }
        }
    }
}

fn after_task_change(ctx: &Context, result: Result<bool, AppError>, id: &str) {
    match result {
        Ok(true) => render_tasks(ctx),
        Ok(false) => println!("No task with id {}", id),
        Err(e) => report(&e),
    }
}

fn view_as(ctx: &Context, target: &str) {
    if ctx.session.borrow().users().get(target).is_none() {
        println!("No such user: {}", target);
        return;
    }
    let changed = ctx.session.borrow_mut().select_user_to_view(target);
    if changed {
        let admin = ctx
            .session
            .borrow()
            .current_username()
            .unwrap_or_default()
            .to_string();
        ctx.record(|t| t.view_as(&admin, target));
    } else {
        println!("Only admins can view other users' tasks");
    }
}

fn delete_user(ctx: &Context, target: &str) {
    let admin = ctx
        .session
        .borrow()
        .current_username()
        .unwrap_or_default()
        .to_string();
    let result = ctx.session.borrow_mut().delete_user(target);
    ctx.record(|t| t.delete_user(&admin, target, result.is_ok()));
    match result {
        Ok(()) => println!("Deleted user {}", target),
        Err(e) => report(&e),
    }
}

fn select_section(ctx: &Context, name: &str) {
    match ctx.screen() {
        Screen::TeacherHome { .. } => match TeacherSection::from_str(name) {
            Some(section) => ctx.view.borrow_mut().teacher_section = section,
            None => println!("Unknown section: {}", name),
        },
        Screen::StudentHome { .. } => match StudentSection::from_str(name) {
            Some(section) => ctx.view.borrow_mut().student_section = section,
            None => println!("Unknown section: {}", name),
        },
        _ => println!("Sections are only available on a home screen"),
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn show_session(ctx: &Context) {
    let session = ctx.session.borrow();
    println!("Session: {}", ctx.session_id);
    println!("Storage: {}", ctx.storage_label);
    if let Some(t) = ctx.transcript.borrow().as_ref() {
        println!("Transcript: {:?}", t.path);
    }
    match session.principal() {
        Some(p) => {
            println!(
                "User: {} ({}){}",
                p.username,
                p.role.map(|r| r.as_str()).unwrap_or("no role"),
                if p.is_admin { " [Admin]" } else { "" }
            );
            if let Some(active) = session.active_username() {
                println!("Active task list: {}", active);
            }
        }
        None => println!("Not logged in"),
    }
}

fn welcome_line(ctx: &Context) -> String {
    let session = ctx.session.borrow();
    match session.principal() {
        Some(p) => format!(
            "Welcome, {}!{}{}",
            p.username,
            p.role.map(|r| format!(" ({})", r)).unwrap_or_default(),
            if p.is_admin { " [Admin]" } else { "" }
        ),
        None => String::new(),
    }
}

fn render_screen(ctx: &Context, screen: &Screen) {
    match screen {
        Screen::Intro(_) => return,
        Screen::Auth(mode) => {
            println!("\n== {} ==", mode.title());
            match mode {
                view::AuthMode::Signup => {
                    println!("/signup <user> <password> [teacher|student]   (or /mode login)")
                }
                view::AuthMode::Login => println!("/login <user> <password>   (or /mode signup)"),
            }
            if let Some(err) = ctx.auth.borrow().error() {
                println!("{}", err);
            }
            return;
        }
        Screen::AdminInspect { .. } => {
            println!("\n== Admin Task View ==");
            println!("{}", welcome_line(ctx));
        }
        Screen::TeacherHome { section, .. } => {
            println!("\n== Teacher Home: {} ==", section.label());
            println!("{}", welcome_line(ctx));
            let names: Vec<&str> = TeacherSection::ALL.iter().map(|s| s.label()).collect();
            println!("Sections: {}", names.join(" | "));
            match section {
                TeacherSection::Tasks => {}
                TeacherSection::Announcements => render_announcements(ctx),
                TeacherSection::Dashboard => render_dashboard(ctx),
                other => println!("{} is coming soon.", other.label()),
            }
        }
        Screen::StudentHome { section, .. } => {
            println!("\n== Student Home: {} ==", section.label());
            println!("{}", welcome_line(ctx));
            let names: Vec<&str> = StudentSection::ALL.iter().map(|s| s.label()).collect();
            println!("Sections: {}", names.join(" | "));
            match section {
                StudentSection::Tasks => {}
                StudentSection::Dashboard => render_dashboard(ctx),
                other => println!("{} is coming soon.", other.label()),
            }
        }
        Screen::TaskList { .. } => {
            println!("\n== To-Do List ==");
            println!("{}", welcome_line(ctx));
        }
    }

    if screen.shows_admin_panel() {
        render_users(ctx);
    }
    if screen.shows_tasks() {
        render_tasks(ctx);
    }
}

fn render_dashboard(ctx: &Context) {
    let session = ctx.session.borrow();
    let tasks = session.tasks();
    println!(
        "Tasks: {} total, {} active, {} completed",
        tasks.len(),
        tasks.active_count(),
        tasks.completed_count()
    );
}

fn render_tasks(ctx: &Context) {
    let filter = ctx.view.borrow().filter;
    let session = ctx.session.borrow();
    let Some(panel) = view::task_panel(&session, filter) else {
        println!("Log in to see tasks");
        return;
    };

    println!("\n{}", panel.header);
    if panel.total > 0 {
        let filters: Vec<String> = Filter::ALL
            .iter()
            .map(|f| {
                if *f == panel.filter {
                    format!("[{}]", f.as_str())
                } else {
                    f.as_str().to_string()
                }
            })
            .collect();
        println!(
            "Filter: {}   ({} active, {} completed)",
            filters.join(" "),
            panel.active,
            panel.completed
        );
    }
    for task in &panel.tasks {
        println!(
            "  [{}] {:<15} {}",
            if task.completed { "x" } else { " " },
            task.id,
            task.text
        );
    }
    if let Some(msg) = &panel.empty_message {
        println!("  {}", msg);
    }
    if panel.can_clear {
        println!("  /clear - Clear Completed ({})", panel.completed);
    }
}

fn render_users(ctx: &Context) {
    let rows = ctx.session.borrow().list_users();
    match rows {
        Ok(rows) => {
            println!("Users:");
            for row in rows {
                let mut tags = Vec::new();
                if row.user.is_admin {
                    tags.push("admin");
                }
                if row.is_current {
                    tags.push("you");
                }
                if row.is_viewed {
                    tags.push("viewing");
                }
                if row.delete_disabled {
                    tags.push("cannot delete");
                }
                println!(
                    "  {:<20} {:<8} {}",
                    row.user.username,
                    row.user.role.map(|r| r.as_str()).unwrap_or("-"),
                    tags.join(", ")
                );
            }
        }
        Err(e) => report(&e),
    }
}

fn render_announcements(ctx: &Context) {
    let items = ctx.session.borrow().announcements();
    match items {
        Ok(items) if items.is_empty() => println!("No announcements yet."),
        Ok(items) => {
            for item in items {
                let posted = chrono::DateTime::from_timestamp_millis(item.created_at)
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  {} [{}] {}", item.id, posted, item.title);
                println!("      {}", item.content);
            }
        }
        Err(e) => report(&e),
    }
}
