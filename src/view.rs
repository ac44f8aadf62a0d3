//! Screen selection.
//!
//! [`route`] is a pure function from view state plus session state to the
//! [`Screen`] to present. It is re-evaluated before every render; there is no
//! navigation history.

use crate::error::AppError;
use crate::session::{Principal, Session, SessionState};
use crate::tasks::{Filter, Task};
use crate::users::Role;
use std::time::Duration;

// ============================================================================
// Intro
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroPhase {
    Loading,
    Title,
    FadeOut,
}

/// Fixed splash timeline: (offset, phase). The intro is dismissed at
/// [`INTRO_DISMISS`].
const INTRO_STEPS: [(Duration, IntroPhase); 3] = [
    (Duration::from_millis(0), IntroPhase::Loading),
    (Duration::from_millis(200), IntroPhase::Title),
    (Duration::from_millis(2500), IntroPhase::FadeOut),
];
const INTRO_DISMISS: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy)]
pub struct IntroSequence {
    speed: f64,
}

impl Default for IntroSequence {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl IntroSequence {
    /// `speed` > 1.0 plays faster. Non-positive values fall back to 1.0.
    pub fn new(speed: f64) -> Self {
        let speed = if speed > 0.0 && speed.is_finite() {
            speed
        } else {
            1.0
        };
        Self { speed }
    }

    fn scaled(&self, d: Duration) -> Duration {
        if self.speed == 1.0 {
            d
        } else {
            d.div_f64(self.speed)
        }
    }

    pub fn total(&self) -> Duration {
        self.scaled(INTRO_DISMISS)
    }

    /// Phase shown `elapsed` after start, or `None` once dismissed.
    pub fn phase_at(&self, elapsed: Duration) -> Option<IntroPhase> {
        if elapsed >= self.total() {
            return None;
        }
        INTRO_STEPS
            .iter()
            .rev()
            .find(|(at, _)| elapsed >= self.scaled(*at))
            .map(|(_, phase)| *phase)
    }

    /// Ordered transitions, ending with the dismissal (`None`).
    pub fn transitions(&self) -> Vec<(Duration, Option<IntroPhase>)> {
        let mut out: Vec<_> = INTRO_STEPS
            .iter()
            .map(|(at, phase)| (self.scaled(*at), Some(*phase)))
            .collect();
        out.push((self.total(), None));
        out
    }
}

// ============================================================================
// Auth form
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    Login,
    #[default]
    Signup,
}

impl AuthMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "login" => Some(Self::Login),
            "signup" | "sign-up" => Some(Self::Signup),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Signup => "signup",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Signup => "Sign Up",
        }
    }
}

/// Login/signup form state with its inline error.
#[derive(Debug, Clone, Default)]
pub struct AuthForm {
    mode: AuthMode,
    error: Option<String>,
}

impl AuthForm {
    pub fn new(mode: AuthMode) -> Self {
        Self { mode, error: None }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Switch between login and signup; always clears the error.
    pub fn set_mode(&mut self, mode: AuthMode) {
        self.mode = mode;
        self.error = None;
    }

    pub fn toggle(&mut self) {
        self.set_mode(match self.mode {
            AuthMode::Login => AuthMode::Signup,
            AuthMode::Signup => AuthMode::Login,
        });
    }

    /// Submit the form in its current mode.
    ///
    /// The username is trimmed, the password is not. Blank fields are rejected
    /// before the store is consulted. `role` is only used when signing up.
    pub fn submit(
        &mut self,
        session: &mut Session,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Principal, AppError> {
        self.error = None;
        let username = username.trim();
        let result = if username.is_empty() || password.trim().is_empty() {
            Err(AppError::MissingCredentials)
        } else {
            match self.mode {
                AuthMode::Login => session.login(username, password),
                AuthMode::Signup => session.signup(username, password, role),
            }
        };
        if let Err(e) = &result {
            if e.is_auth_error() {
                self.error = Some(e.user_message());
            }
        }
        result
    }
}

// ============================================================================
// Home sections
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeacherSection {
    #[default]
    Dashboard,
    Tasks,
    Students,
    Announcements,
    Attendance,
    Assignments,
    Grades,
    Tests,
    Timetable,
    Messages,
    ProfileSettings,
}

impl TeacherSection {
    pub const ALL: [TeacherSection; 11] = [
        Self::Dashboard,
        Self::Tasks,
        Self::Students,
        Self::Announcements,
        Self::Attendance,
        Self::Assignments,
        Self::Grades,
        Self::Tests,
        Self::Timetable,
        Self::Messages,
        Self::ProfileSettings,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::Tasks => "My Tasks",
            Self::Students => "Students",
            Self::Announcements => "Announcements",
            Self::Attendance => "Attendance",
            Self::Assignments => "Assignments",
            Self::Grades => "Grades",
            Self::Tests => "Tests",
            Self::Timetable => "Timetable",
            Self::Messages => "Messages",
            Self::ProfileSettings => "Profile Settings",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = slug(s);
        Self::ALL.into_iter().find(|sec| {
            slug(sec.label()) == wanted || (wanted == "tasks" && *sec == Self::Tasks)
        })
    }

    pub fn shows_tasks(&self) -> bool {
        *self == Self::Tasks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StudentSection {
    #[default]
    Dashboard,
    Tasks,
    AcademicProgress,
    ClassInteraction,
    Resources,
    Attendance,
    Assignments,
    Grades,
    Timetable,
    Messages,
    StudyMaterials,
    ProfileSettings,
}

impl StudentSection {
    pub const ALL: [StudentSection; 12] = [
        Self::Dashboard,
        Self::Tasks,
        Self::AcademicProgress,
        Self::ClassInteraction,
        Self::Resources,
        Self::Attendance,
        Self::Assignments,
        Self::Grades,
        Self::Timetable,
        Self::Messages,
        Self::StudyMaterials,
        Self::ProfileSettings,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::Tasks => "My Tasks",
            Self::AcademicProgress => "Academic Progress",
            Self::ClassInteraction => "Class Interaction",
            Self::Resources => "Resources",
            Self::Attendance => "Attendance Record",
            Self::Assignments => "Assignments Hub",
            Self::Grades => "My Grades",
            Self::Timetable => "My Timetable",
            Self::Messages => "Messages",
            Self::StudyMaterials => "Study Materials",
            Self::ProfileSettings => "Profile & Settings",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = slug(s);
        Self::ALL.into_iter().find(|sec| {
            slug(sec.label()) == wanted || (wanted == "tasks" && *sec == Self::Tasks)
        })
    }

    pub fn shows_tasks(&self) -> bool {
        *self == Self::Tasks
    }
}

/// Lowercase alphanumerics only, so "profile & settings" matches "profile-settings".
fn slug(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Routing
// ============================================================================

/// Presentation state that is not part of the session.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// `Some` while the splash is on screen.
    pub intro: Option<IntroPhase>,
    pub auth_mode: AuthMode,
    pub teacher_section: TeacherSection,
    pub student_section: StudentSection,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Intro(IntroPhase),
    Auth(AuthMode),
    /// An admin inspecting another user's tasks.
    AdminInspect { admin: String, target: String },
    TeacherHome {
        username: String,
        section: TeacherSection,
        is_admin: bool,
    },
    StudentHome {
        username: String,
        section: StudentSection,
        is_admin: bool,
    },
    /// Generic list for users without a role.
    TaskList { username: String, is_admin: bool },
}

pub fn route(view: &ViewState, state: &SessionState, viewing: Option<&str>) -> Screen {
    if let Some(phase) = view.intro {
        return Screen::Intro(phase);
    }

    let principal = match state {
        SessionState::Booting => return Screen::Intro(IntroPhase::Loading),
        SessionState::Unauthenticated => return Screen::Auth(view.auth_mode),
        SessionState::Authenticated(p) => p,
    };

    if let Some(target) = viewing {
        if principal.is_admin && target != principal.username {
            return Screen::AdminInspect {
                admin: principal.username.clone(),
                target: target.to_string(),
            };
        }
    }

    match principal.role {
        Some(Role::Teacher) => Screen::TeacherHome {
            username: principal.username.clone(),
            section: view.teacher_section,
            is_admin: principal.is_admin,
        },
        Some(Role::Student) => Screen::StudentHome {
            username: principal.username.clone(),
            section: view.student_section,
            is_admin: principal.is_admin,
        },
        None => Screen::TaskList {
            username: principal.username.clone(),
            is_admin: principal.is_admin,
        },
    }
}

impl Screen {
    /// Whether this screen shows the active user's task list.
    pub fn shows_tasks(&self) -> bool {
        match self {
            Self::AdminInspect { .. } | Self::TaskList { .. } => true,
            Self::TeacherHome { section, .. } => section.shows_tasks(),
            Self::StudentHome { section, .. } => section.shows_tasks(),
            Self::Intro(_) | Self::Auth(_) => false,
        }
    }

    /// Whether the admin user listing is part of this screen.
    pub fn shows_admin_panel(&self) -> bool {
        matches!(
            self,
            Self::AdminInspect { .. } | Self::TaskList { is_admin: true, .. }
        )
    }
}

// ============================================================================
// Task panel
// ============================================================================

/// Everything a task view renders, derived from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPanel {
    pub header: String,
    pub filter: Filter,
    pub tasks: Vec<Task>,
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    /// Offer "Clear Completed (n)".
    pub can_clear: bool,
    pub empty_message: Option<String>,
}

pub fn task_panel(session: &Session, filter: Filter) -> Option<TaskPanel> {
    let current = session.current_username()?;
    let active_user = session.active_username()?;
    let list = session.tasks();
    let tasks = list.filtered(filter);

    let header = if session.is_impersonating() {
        format!("Viewing tasks for: {}", active_user)
    } else if session.is_admin() {
        "Your Admin Tasks".to_string()
    } else {
        "Your Tasks".to_string()
    };

    let empty_message = if !tasks.is_empty() {
        None
    } else if list.is_empty() {
        Some(if active_user == current {
            "You have no tasks yet. Add one above!".to_string()
        } else {
            format!("{} has no tasks.", active_user)
        })
    } else {
        Some("No tasks match your current filter.".to_string())
    };

    Some(TaskPanel {
        header,
        filter,
        can_clear: !tasks.is_empty() && list.completed_count() > 0,
        total: list.len(),
        active: list.active_count(),
        completed: list.completed_count(),
        tasks,
        empty_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use crate::storage::MemoryStore;
    use std::rc::Rc;

    fn principal(name: &str, role: Option<Role>, is_admin: bool) -> SessionState {
        SessionState::Authenticated(Principal {
            username: name.to_string(),
            role,
            is_admin,
        })
    }

    fn booted() -> Session {
        let mut session = Session::new(Rc::new(MemoryStore::new()), SessionOptions::default());
        session.boot();
        session
    }

    #[test]
    fn test_intro_timeline() {
        let intro = IntroSequence::default();
        assert_eq!(intro.phase_at(Duration::ZERO), Some(IntroPhase::Loading));
        assert_eq!(
            intro.phase_at(Duration::from_millis(199)),
            Some(IntroPhase::Loading)
        );
        assert_eq!(
            intro.phase_at(Duration::from_millis(200)),
            Some(IntroPhase::Title)
        );
        assert_eq!(
            intro.phase_at(Duration::from_millis(2600)),
            Some(IntroPhase::FadeOut)
        );
        assert_eq!(intro.phase_at(Duration::from_millis(3000)), None);
        assert_eq!(intro.transitions().len(), 4);
        assert_eq!(intro.transitions().last().unwrap().1, None);
    }

    #[test]
    fn test_intro_speed() {
        let intro = IntroSequence::new(2.0);
        assert_eq!(intro.total(), Duration::from_millis(1500));
        assert_eq!(
            intro.phase_at(Duration::from_millis(100)),
            Some(IntroPhase::Title)
        );
        assert_eq!(IntroSequence::new(0.0).total(), Duration::from_millis(3000));
    }

    #[test]
    fn test_route_intro_and_auth() {
        let mut view = ViewState {
            intro: Some(IntroPhase::Title),
            ..ViewState::default()
        };
        let state = principal("alice", Some(Role::Student), false);
        assert_eq!(
            route(&view, &state, None),
            Screen::Intro(IntroPhase::Title)
        );

        view.intro = None;
        assert_eq!(
            route(&view, &SessionState::Unauthenticated, None),
            Screen::Auth(AuthMode::Signup)
        );
        view.auth_mode = AuthMode::Login;
        assert_eq!(
            route(&view, &SessionState::Unauthenticated, None),
            Screen::Auth(AuthMode::Login)
        );
    }

    #[test]
    fn test_route_roles_and_fallback() {
        let view = ViewState::default();
        assert!(matches!(
            route(&view, &principal("t", Some(Role::Teacher), false), None),
            Screen::TeacherHome {
                section: TeacherSection::Dashboard,
                ..
            }
        ));
        assert!(matches!(
            route(&view, &principal("s", Some(Role::Student), false), None),
            Screen::StudentHome { .. }
        ));
        assert_eq!(
            route(&view, &principal("x", None, true), None),
            Screen::TaskList {
                username: "x".to_string(),
                is_admin: true
            }
        );
    }

    #[test]
    fn test_route_admin_inspect() {
        let view = ViewState::default();
        let admin = principal("alice", Some(Role::Student), true);
        assert_eq!(
            route(&view, &admin, Some("bob")),
            Screen::AdminInspect {
                admin: "alice".to_string(),
                target: "bob".to_string()
            }
        );
        // Viewing yourself is just your home screen
        assert!(matches!(
            route(&view, &admin, Some("alice")),
            Screen::StudentHome { .. }
        ));
        // Non-admins never inspect
        let plain = principal("carol", Some(Role::Teacher), false);
        assert!(matches!(
            route(&view, &plain, Some("bob")),
            Screen::TeacherHome { .. }
        ));
    }

    #[test]
    fn test_section_parsing() {
        assert_eq!(
            TeacherSection::from_str("profile settings"),
            Some(TeacherSection::ProfileSettings)
        );
        assert_eq!(TeacherSection::from_str("tasks"), Some(TeacherSection::Tasks));
        assert_eq!(
            StudentSection::from_str("Profile & Settings"),
            Some(StudentSection::ProfileSettings)
        );
        assert_eq!(
            StudentSection::from_str("academic-progress"),
            Some(StudentSection::AcademicProgress)
        );
        assert_eq!(StudentSection::from_str("students"), None);
    }

    #[test]
    fn test_auth_form_validation_and_error_clearing() {
        let mut session = booted();
        let mut form = AuthForm::default();
        assert_eq!(form.mode(), AuthMode::Signup);

        assert!(matches!(
            form.submit(&mut session, "   ", "pw", Role::Student),
            Err(AppError::MissingCredentials)
        ));
        assert!(form.error().is_some());
        assert!(session.users().load_all().is_empty());

        let principal = form
            .submit(&mut session, "  alice ", "pw", Role::Student)
            .unwrap();
        assert_eq!(principal.username, "alice");
        assert!(form.error().is_none());

        session.logout();
        assert!(form.submit(&mut session, "alice", "pw", Role::Teacher).is_err());
        assert_eq!(form.error(), Some("Username already exists."));
        form.toggle();
        assert_eq!(form.mode(), AuthMode::Login);
        assert!(form.error().is_none());

        assert!(form.submit(&mut session, "alice", "nope", Role::Student).is_err());
        assert_eq!(form.error(), Some("Incorrect password. Please try again."));
        form.submit(&mut session, "alice", "pw", Role::Student).unwrap();
        assert!(form.error().is_none());
    }

    #[test]
    fn test_task_panel_messages() {
        let mut session = booted();
        assert!(task_panel(&session, Filter::All).is_none());

        session.signup("alice", "pw", Role::Student).unwrap();
        let panel = task_panel(&session, Filter::All).unwrap();
        assert_eq!(panel.header, "Your Admin Tasks");
        assert_eq!(
            panel.empty_message.as_deref(),
            Some("You have no tasks yet. Add one above!")
        );

        session.add_task("one").unwrap();
        let id = session.tasks().as_slice()[0].id.clone();
        let panel = task_panel(&session, Filter::Completed).unwrap();
        assert_eq!(
            panel.empty_message.as_deref(),
            Some("No tasks match your current filter.")
        );
        assert!(!panel.can_clear);

        session.toggle_task(&id).unwrap();
        let panel = task_panel(&session, Filter::All).unwrap();
        assert!(panel.can_clear);
        assert_eq!((panel.total, panel.active, panel.completed), (1, 0, 1));

        session.select_user_to_view("bob");
        let panel = task_panel(&session, Filter::All).unwrap();
        assert_eq!(panel.header, "Viewing tasks for: bob");
        assert_eq!(panel.empty_message.as_deref(), Some("bob has no tasks."));
    }

    #[test]
    fn test_screen_panels() {
        let inspect = Screen::AdminInspect {
            admin: "a".into(),
            target: "b".into(),
        };
        assert!(inspect.shows_tasks());
        assert!(inspect.shows_admin_panel());
        let home = Screen::TeacherHome {
            username: "t".into(),
            section: TeacherSection::Tasks,
            is_admin: true,
        };
        assert!(home.shows_tasks());
        assert!(!home.shows_admin_panel());
        assert!(!Screen::Auth(AuthMode::Login).shows_tasks());

        let announcements = Screen::TeacherHome {
            username: "t".into(),
            section: TeacherSection::Announcements,
            is_admin: false,
        };
        assert!(!announcements.shows_tasks());
        let dashboard = Screen::StudentHome {
            username: "s".into(),
            section: StudentSection::Dashboard,
            is_admin: false,
        };
        assert!(!dashboard.shows_tasks());

        let generic = |is_admin| Screen::TaskList {
            username: "u".into(),
            is_admin,
        };
        assert!(generic(false).shows_tasks());
        assert!(!generic(false).shows_admin_panel());
        assert!(generic(true).shows_admin_panel());
    }
}
