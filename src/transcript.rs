//! Append-only JSONL record of session activity.
//!
//! One file per run, one event per line. Passwords are never written.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Transcript {
    pub path: PathBuf,
    session_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Transcript {
    /// Open `<dir>/<session_id>.jsonl`, creating the directory as needed.
    pub fn create(dir: &Path, session_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::new(&dir.join(format!("{}.jsonl", session_id)), session_id)
    }

    pub fn new(path: &Path, session_id: &str) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    /// Log startup and whether a remembered session was resumed
    pub fn boot(&mut self, resumed_user: Option<&str>) -> Result<()> {
        self.log("boot", serde_json::json!({ "resumed": resumed_user }))
    }

    pub fn signup(&mut self, username: &str, role: &str, is_admin: bool) -> Result<()> {
        self.log(
            "signup",
            serde_json::json!({
                "username": username,
                "role": role,
                "is_admin": is_admin,
            }),
        )
    }

    pub fn login(&mut self, username: &str) -> Result<()> {
        self.log("login", serde_json::json!({ "username": username }))
    }

    /// Log a rejected login or signup with the error kind
    pub fn login_failed(&mut self, username: &str, reason: &str) -> Result<()> {
        self.log(
            "login_failed",
            serde_json::json!({
                "username": username,
                "reason": reason,
            }),
        )
    }

    pub fn logout(&mut self, username: &str) -> Result<()> {
        self.log("logout", serde_json::json!({ "username": username }))
    }

    pub fn view_as(&mut self, admin: &str, target: &str) -> Result<()> {
        self.log(
            "view_as",
            serde_json::json!({
                "admin": admin,
                "target": target,
            }),
        )
    }

    pub fn view_own(&mut self, admin: &str) -> Result<()> {
        self.log("view_own", serde_json::json!({ "admin": admin }))
    }

    pub fn delete_user(&mut self, admin: &str, target: &str, ok: bool) -> Result<()> {
        self.log(
            "delete_user",
            serde_json::json!({
                "admin": admin,
                "target": target,
                "ok": ok,
            }),
        )
    }

    pub fn storage_write_failed(&mut self, message: &str) -> Result<()> {
        self.log(
            "storage_write_failed",
            serde_json::json!({ "message": message }),
        )
    }
}
