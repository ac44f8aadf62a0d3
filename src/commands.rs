//! Slash command parsing for the REPL.
//!
//! Arguments are split shell-style, so multi-word values can be quoted:
//! `/announce "Field trip" "Bring lunch on Friday"`.
//! A line that does not start with `/` is shorthand for `/add <line>`.

use crate::tasks::Filter;
use crate::users::Role;
use crate::view::AuthMode;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Help,
    WhoAmI,
    Config,
    /// Switch the auth form between login and signup
    Mode(AuthMode),
    Login {
        username: String,
        password: String,
    },
    Signup {
        username: String,
        password: String,
        role: Role,
    },
    Logout,
    List,
    Filter(Filter),
    Add(String),
    Toggle(String),
    Edit {
        id: String,
        text: String,
    },
    Delete(String),
    ClearCompleted,
    Users,
    ViewAs(String),
    ViewOwn,
    DeleteUser(String),
    Section(String),
    Announcements,
    Announce {
        title: String,
        content: String,
    },
    Unannounce(String),
    DismissBanner,
}

pub const HELP: &[(&str, &str)] = &[
    ("/exit", "quit"),
    ("/help", "show commands"),
    ("/whoami", "show session info"),
    ("/config", "show effective configuration"),
    ("/mode login|signup", "switch the auth form"),
    ("/login <user> <password>", "log in"),
    ("/signup <user> <password> [teacher|student]", "create an account (default student)"),
    ("/logout", "end the session"),
    ("/list", "show the active task list"),
    ("/filter all|active|completed", "set the task filter"),
    ("/add <text>", "add a task (or just type the text)"),
    ("/toggle <id>", "mark a task done / not done"),
    ("/edit <id> <text>", "change a task's text"),
    ("/rm <id>", "delete a task"),
    ("/clear", "remove completed tasks"),
    ("/users", "list users (admin)"),
    ("/view <user>", "view another user's tasks (admin)"),
    ("/own", "back to your own tasks (admin)"),
    ("/deluser <user>", "delete a user and their data (admin)"),
    ("/section <name>", "switch home section"),
    ("/announcements", "list your announcements (teacher)"),
    ("/announce <title> <content>", "post an announcement (teacher)"),
    ("/unannounce <id>", "delete an announcement (teacher)"),
    ("/dismiss", "hide the storage warning"),
];

fn usage(cmd: &str) -> String {
    let hint = HELP
        .iter()
        .find(|(syntax, _)| syntax.split_whitespace().next() == Some(cmd))
        .map(|(syntax, _)| *syntax)
        .unwrap_or(cmd);
    format!("Usage: {}", hint)
}

fn one_arg(cmd: &str, args: &[String]) -> Result<String, String> {
    match args {
        [arg] => Ok(arg.clone()),
        _ => Err(usage(cmd)),
    }
}

/// Parse one REPL line. Returns `Ok(None)` for blank input.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::Add(line.to_string())));
    }

    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    // Free text: keep it raw so apostrophes and quotes survive
    match cmd {
        "/add" if rest.is_empty() => return Err(usage(cmd)),
        "/add" => return Ok(Some(Command::Add(rest.to_string()))),
        "/edit" if rest.is_empty() => return Err(usage(cmd)),
        "/edit" => {
            let (id, text) = rest.split_once(' ').unwrap_or((rest, ""));
            return Ok(Some(Command::Edit {
                id: id.to_string(),
                text: text.trim().to_string(),
            }));
        }
        _ => {}
    }

    let args = shell_words::split(rest).map_err(|e| format!("{}: {}", cmd, e))?;

    let command = match cmd {
        "/exit" | "/quit" => Command::Exit,
        "/help" => Command::Help,
        "/whoami" | "/session" => Command::WhoAmI,
        "/config" => Command::Config,
        "/mode" => {
            let mode = one_arg(cmd, &args)?;
            Command::Mode(AuthMode::from_str(&mode).ok_or_else(|| usage(cmd))?)
        }
        "/login" => match args.as_slice() {
            [username, password] => Command::Login {
                username: username.clone(),
                password: password.clone(),
            },
            _ => return Err(usage(cmd)),
        },
        "/signup" => match args.as_slice() {
            [username, password] => Command::Signup {
                username: username.clone(),
                password: password.clone(),
                role: Role::Student,
            },
            [username, password, role] => Command::Signup {
                username: username.clone(),
                password: password.clone(),
                role: Role::from_str(role).ok_or_else(|| usage(cmd))?,
            },
            _ => return Err(usage(cmd)),
        },
        "/logout" => Command::Logout,
        "/list" | "/ls" => Command::List,
        "/filter" => {
            let f = one_arg(cmd, &args)?;
            Command::Filter(Filter::from_str(&f).ok_or_else(|| usage(cmd))?)
        }
        "/toggle" | "/done" => Command::Toggle(one_arg(cmd, &args)?),
        "/rm" | "/delete" => Command::Delete(one_arg(cmd, &args)?),
        "/clear" => Command::ClearCompleted,
        "/users" => Command::Users,
        "/view" => Command::ViewAs(one_arg(cmd, &args)?),
        "/own" => Command::ViewOwn,
        "/deluser" => Command::DeleteUser(one_arg(cmd, &args)?),
        "/section" if !args.is_empty() => Command::Section(args.join(" ")),
        "/announcements" => Command::Announcements,
        "/announce" => match args.as_slice() {
            [title, content @ ..] if !content.is_empty() => Command::Announce {
                title: title.clone(),
                content: content.join(" "),
            },
            _ => return Err(usage(cmd)),
        },
        "/unannounce" => Command::Unannounce(one_arg(cmd, &args)?),
        "/dismiss" => Command::DismissBanner,
        "/section" => return Err(usage(cmd)),
        _ => return Err(format!("Unknown command: {}", cmd)),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_adds_task() {
        assert_eq!(
            parse("  grade papers ").unwrap(),
            Some(Command::Add("grade papers".to_string()))
        );
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_signup_role_defaults_to_student() {
        assert_eq!(
            parse("/signup alice pw1").unwrap(),
            Some(Command::Signup {
                username: "alice".into(),
                password: "pw1".into(),
                role: Role::Student,
            })
        );
        assert_eq!(
            parse("/signup bob pw2 teacher").unwrap(),
            Some(Command::Signup {
                username: "bob".into(),
                password: "pw2".into(),
                role: Role::Teacher,
            })
        );
        assert!(parse("/signup bob pw2 janitor").is_err());
        assert!(parse("/signup bob").is_err());
    }

    #[test]
    fn test_quoted_arguments() {
        assert_eq!(
            parse(r#"/announce "Field trip" "Bring lunch""#).unwrap(),
            Some(Command::Announce {
                title: "Field trip".into(),
                content: "Bring lunch".into(),
            })
        );
        assert_eq!(
            parse(r#"/login "mary ann" "p w""#).unwrap(),
            Some(Command::Login {
                username: "mary ann".into(),
                password: "p w".into(),
            })
        );
        assert!(parse(r#"/login "unterminated"#).is_err());
    }

    #[test]
    fn test_edit_forms() {
        assert_eq!(
            parse("/edit 123 new words here").unwrap(),
            Some(Command::Edit {
                id: "123".into(),
                text: "new words here".into(),
            })
        );
        assert_eq!(
            parse("/edit 123").unwrap(),
            Some(Command::Edit {
                id: "123".into(),
                text: String::new(),
            })
        );
        assert!(parse("/edit").is_err());
    }

    #[test]
    fn test_add_keeps_raw_text() {
        assert_eq!(
            parse(r#"/add read "Hamlet" act 1"#).unwrap(),
            Some(Command::Add(r#"read "Hamlet" act 1"#.into()))
        );
        assert_eq!(
            parse("/add don't forget").unwrap(),
            Some(Command::Add("don't forget".into()))
        );
        assert!(parse("/add").is_err());
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(
            parse("/filter done").unwrap(),
            Some(Command::Filter(Filter::Completed))
        );
        assert_eq!(
            parse("/mode login").unwrap(),
            Some(Command::Mode(AuthMode::Login))
        );
        assert_eq!(
            parse("/section academic progress").unwrap(),
            Some(Command::Section("academic progress".into()))
        );
        assert_eq!(parse("/view bob").unwrap(), Some(Command::ViewAs("bob".into())));
        assert!(parse("/view").is_err());
        assert_eq!(
            parse("/frobnicate").unwrap_err(),
            "Unknown command: /frobnicate"
        );
        assert_eq!(parse("/rm").unwrap_err(), "Usage: /rm <id>");
    }
}
