use classdesk::error::AppError;
use classdesk::session::{Session, SessionOptions, SessionState};
use classdesk::storage::{FileStore, KeyValueStore, MemoryStore};
use classdesk::tasks::{self, Filter, TaskList, TaskStore};
use classdesk::users::{Role, UserStore, USERS_KEY};
use classdesk::view::{self, Screen, ViewState};
use std::collections::BTreeSet;
use std::rc::Rc;

fn booted(mem: &Rc<MemoryStore>) -> Session {
    let mut session = Session::new(mem.clone(), SessionOptions::default());
    session.boot();
    session
}

#[test]
fn test_admin_adds_task_for_viewed_user() {
    let mem = Rc::new(MemoryStore::new());
    let mut session = booted(&mem);

    let alice = session.signup("alice", "pw1", Role::Student).unwrap();
    assert!(alice.is_admin);
    session.add_task("revise notes").unwrap();

    // bob signs up in a separate session sharing the same store
    let mut other = booted(&mem);
    let bob = other.signup("bob", "pw2", Role::Teacher).unwrap();
    assert!(!bob.is_admin);

    assert!(session.select_user_to_view("bob"));
    assert_eq!(session.active_username(), Some("bob"));
    assert!(session.tasks().is_empty());

    assert!(session.add_task("grade papers").unwrap());

    let store = TaskStore::new(mem.clone());
    let bobs = store.load("bob");
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs.as_slice()[0].text, "grade papers");
    let alices = store.load("alice");
    assert_eq!(alices.len(), 1);
    assert_eq!(alices.as_slice()[0].text, "revise notes");

    let screen = view::route(&ViewState::default(), session.state(), session.viewing());
    assert_eq!(
        screen,
        Screen::AdminInspect {
            admin: "alice".into(),
            target: "bob".into(),
        }
    );
}

#[test]
fn test_sole_admin_cannot_delete_self() {
    let mem = Rc::new(MemoryStore::new());
    let mut session = booted(&mem);
    session.signup("alice", "pw1", Role::Student).unwrap();
    let before = mem.raw(USERS_KEY);

    let err = session.delete_user("alice").unwrap_err();
    assert!(matches!(err, AppError::LastAdminProtected(_)));
    assert!(matches!(session.state(), SessionState::Authenticated(_)));
    assert_eq!(mem.raw(USERS_KEY), before);
}

#[test]
fn test_only_first_signup_is_admin() {
    let mem = Rc::new(MemoryStore::new());
    let users = UserStore::new(mem.clone());
    let flags: Vec<bool> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| users.signup(name, "pw", Role::Student).unwrap().value.is_admin)
        .collect();
    assert_eq!(flags, vec![true, false, false, false]);
}

#[test]
fn test_duplicate_signup_leaves_table_untouched() {
    let mem = Rc::new(MemoryStore::new());
    let users = UserStore::new(mem.clone());
    users.signup("alice", "pw1", Role::Student).unwrap();
    let before = mem.raw(USERS_KEY);

    let err = users.signup("alice", "other", Role::Teacher).unwrap_err();
    assert!(matches!(err, AppError::DuplicateUsername(_)));
    assert_eq!(mem.raw(USERS_KEY), before);
}

#[test]
fn test_login_errors_are_distinct() {
    let mem = Rc::new(MemoryStore::new());
    let users = UserStore::new(mem.clone());
    users.signup("alice", "pw1", Role::Student).unwrap();

    assert!(users.login("alice", "pw1").is_ok());
    assert!(matches!(
        users.login("alice", "PW1"),
        Err(AppError::InvalidPassword(_))
    ));
    assert!(matches!(
        users.login("Alice", "pw1"),
        Err(AppError::UserNotFound(_))
    ));
}

#[test]
fn test_deleting_non_admin_removes_their_tasks() {
    let mem = Rc::new(MemoryStore::new());
    let mut admin = booted(&mem);
    admin.signup("alice", "pw1", Role::Teacher).unwrap();

    let mut student = booted(&mem);
    student.signup("bob", "pw2", Role::Student).unwrap();
    student.add_task("homework").unwrap();
    assert!(mem.raw(&tasks::todos_key("bob")).is_some());

    admin.delete_user("bob").unwrap();
    assert!(mem.raw(&tasks::todos_key("bob")).is_none());
    assert!(UserStore::new(mem.clone()).get("bob").is_none());
}

#[test]
fn test_filters_partition_and_sort() {
    let mut list = TaskList::new();
    for (i, text) in ["c", "a", "b", "d"].iter().enumerate() {
        list.add(text, 1_000 - i as i64 * 10);
    }
    let ids: Vec<String> = list.iter().map(|t| t.id.clone()).collect();
    list.toggle(&ids[1]);
    list.toggle(&ids[3]);

    let all = list.filtered(Filter::All);
    let active = list.filtered(Filter::Active);
    let completed = list.filtered(Filter::Completed);

    for out in [&all, &active, &completed] {
        assert!(out.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
    let union: BTreeSet<&str> = active
        .iter()
        .chain(completed.iter())
        .map(|t| t.id.as_str())
        .collect();
    let everything: BTreeSet<&str> = all.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(union, everything);
    assert_eq!(active.len() + completed.len(), all.len());
}

#[test]
fn test_edit_trims_and_ignores_blank() {
    let mem = Rc::new(MemoryStore::new());
    let mut session = booted(&mem);
    session.signup("alice", "pw1", Role::Student).unwrap();
    session.add_task("draft").unwrap();
    let id = session.tasks().as_slice()[0].id.clone();

    assert!(!session.edit_task(&id, "   ").unwrap());
    assert_eq!(session.tasks().get(&id).unwrap().text, "draft");

    assert!(session.edit_task(&id, "  X  ").unwrap());
    assert_eq!(session.tasks().get(&id).unwrap().text, "X");
    assert_eq!(TaskStore::new(mem.clone()).load("alice").as_slice()[0].text, "X");
}

#[test]
fn test_resave_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let store: Rc<dyn KeyValueStore> = Rc::new(FileStore::open(&path, None).unwrap());

    let users = UserStore::new(store.clone());
    users.signup("zed", "pw", Role::Teacher).unwrap();
    users.signup("amy", "pw", Role::Student).unwrap();
    let tasks = TaskStore::new(store.clone());
    tasks.add("amy", "one").unwrap();
    tasks.add("amy", "two").unwrap();

    let users_before = store.get(USERS_KEY).unwrap();
    let tasks_before = store.get(&tasks::todos_key("amy")).unwrap();
    let file_before = std::fs::read(&path).unwrap();

    users.save_all(&users.load_all()).unwrap();
    tasks.save("amy", &tasks.load("amy")).unwrap();

    assert_eq!(store.get(USERS_KEY).unwrap(), users_before);
    assert_eq!(store.get(&tasks::todos_key("amy")).unwrap(), tasks_before);
    assert_eq!(std::fs::read(&path).unwrap(), file_before);
}

#[test]
fn test_write_failure_keeps_optimistic_update_and_raises_banner() {
    let mem = Rc::new(MemoryStore::new());
    let mut session = booted(&mem);
    session.signup("alice", "pw1", Role::Student).unwrap();

    mem.set_fail_writes(true);
    assert!(session.add_task("unsaved").unwrap());
    assert_eq!(session.tasks().len(), 1);
    assert!(session.banner().is_some());
    assert!(TaskStore::new(mem.clone()).load("alice").is_empty());
}

#[test]
fn test_write_failure_rolls_back_when_configured() {
    let mem = Rc::new(MemoryStore::new());
    let options = SessionOptions {
        rollback_on_write_failure: true,
    };
    let mut session = Session::new(mem.clone(), options);
    session.boot();
    session.signup("alice", "pw1", Role::Student).unwrap();

    mem.set_fail_writes(true);
    let err = session.add_task("unsaved").unwrap_err();
    assert!(matches!(err, AppError::StorageWriteFailed { .. }));
    assert!(session.tasks().is_empty());
    assert!(session.banner().is_some());
}
