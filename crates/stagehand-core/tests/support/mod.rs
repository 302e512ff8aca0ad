//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use stagehand_core::Result;
use stagehand_core::certs::{CertificateAuthority, Sleeper};
use stagehand_core::classifier::{ClassificationApi, Classes, Group, NewGroup};
use stagehand_core::config::Config;
use stagehand_core::process::{CommandRunner, ExecOutput};
use stagehand_core::remote::{BridgeError, RemoteExec};

pub fn ok(output: &str) -> ExecOutput {
    ExecOutput {
        output: output.to_string(),
        status: 0,
    }
}

/// Local runner returning a scripted status for commands starting with a prefix.
#[derive(Default)]
pub struct RecordingRunner {
    pub commands: RefCell<Vec<String>>,
    statuses: RefCell<Vec<(String, i32)>>,
}

impl RecordingRunner {
    pub fn fail(&self, prefix: &str, status: i32) {
        self.statuses
            .borrow_mut()
            .push((prefix.to_string(), status));
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &str) -> Result<ExecOutput> {
        self.commands.borrow_mut().push(command.to_string());
        let status = self
            .statuses
            .borrow()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, status)| *status)
            .unwrap_or(0);
        Ok(ExecOutput {
            output: format!("ran {}", command),
            status,
        })
    }
}

/// Bridge recording every call; hosts can be made unreachable or failing.
#[derive(Default)]
pub struct RecordingBridge {
    pub calls: RefCell<Vec<(String, String)>>,
    unreachable: RefCell<HashSet<String>>,
    statuses: RefCell<HashMap<String, i32>>,
}

impl RecordingBridge {
    pub fn unreachable(&self, host: &str) {
        self.unreachable.borrow_mut().insert(host.to_string());
    }

    pub fn exit_with(&self, host: &str, status: i32) {
        self.statuses.borrow_mut().insert(host.to_string(), status);
    }

    pub fn hosts(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(h, _)| h.clone()).collect()
    }
}

impl RemoteExec for RecordingBridge {
    fn exec(&self, host: &str, command: &str) -> std::result::Result<ExecOutput, BridgeError> {
        self.calls
            .borrow_mut()
            .push((host.to_string(), command.to_string()));
        if self.unreachable.borrow().contains(host) {
            return Err(BridgeError::Connect {
                host: host.to_string(),
                message: "No route to host".to_string(),
            });
        }
        let status = self.statuses.borrow().get(host).copied().unwrap_or(0);
        Ok(ExecOutput {
            output: "remote output".to_string(),
            status,
        })
    }
}

/// Certificate authority whose pending list appears after a number of queries.
#[derive(Default)]
pub struct FakeCa {
    /// Queries answered with an empty list before `subject` shows up as pending
    pub empty_polls: Cell<u32>,
    pub subject: RefCell<Option<String>>,
    /// Requests from other nodes, pending on every query
    pub stale: RefCell<Vec<String>>,
    pub signed: RefCell<HashSet<String>>,
    pub pending_calls: Cell<u32>,
    pub sign_calls: RefCell<Vec<(String, bool)>>,
}

impl FakeCa {
    pub fn pending_after(subject: &str, empty_polls: u32) -> Self {
        let ca = Self::default();
        ca.empty_polls.set(empty_polls);
        *ca.subject.borrow_mut() = Some(subject.to_string());
        ca
    }

    pub fn never_pending() -> Self {
        Self::default()
    }

    pub fn with_stale(self, subject: &str) -> Self {
        self.stale.borrow_mut().push(subject.to_string());
        self
    }
}

impl CertificateAuthority for FakeCa {
    fn pending(&self) -> Result<Vec<String>> {
        self.pending_calls.set(self.pending_calls.get() + 1);
        let mut pending = self.stale.borrow().clone();
        if self.empty_polls.get() > 0 {
            self.empty_polls.set(self.empty_polls.get() - 1);
            return Ok(pending);
        }
        pending.extend(self.subject.borrow().iter().cloned());
        Ok(pending)
    }

    fn is_signed(&self, subject: &str) -> Result<bool> {
        Ok(self.signed.borrow().contains(subject))
    }

    fn sign(&self, subject: &str, allow_alt_names: bool) -> Result<()> {
        self.sign_calls
            .borrow_mut()
            .push((subject.to_string(), allow_alt_names));
        self.signed.borrow_mut().insert(subject.to_string());
        *self.subject.borrow_mut() = None;
        Ok(())
    }
}

/// Sleeper that only counts.
#[derive(Default)]
pub struct CountingSleeper {
    pub sleeps: RefCell<Vec<Duration>>,
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, duration: Duration, _cancel: &CancellationToken) -> Result<()> {
        self.sleeps.borrow_mut().push(duration);
        Ok(())
    }
}

/// Classification service held in memory, counting every write.
#[derive(Default)]
pub struct FakeClassifier {
    pub groups: RefCell<Vec<Group>>,
    pub posts: Cell<usize>,
    next_id: Cell<usize>,
}

impl FakeClassifier {
    /// The groups a freshly installed primary has.
    pub fn standard() -> Self {
        let api = Self::default();
        for (id, name) in [
            ("root", "All Nodes"),
            ("primary", "Primary Group"),
            ("agents", "Agent Group"),
        ] {
            api.groups.borrow_mut().push(Group {
                id: id.to_string(),
                name: name.to_string(),
                environment: "production".to_string(),
                parent: "root".to_string(),
                rule: None,
                classes: Classes::new(),
            });
        }
        api
    }

    pub fn group_named(&self, name: &str) -> Option<Group> {
        self.groups.borrow().iter().find(|g| g.name == name).cloned()
    }

    pub fn push(&self, group: Group) {
        self.groups.borrow_mut().push(group);
    }
}

impl ClassificationApi for FakeClassifier {
    fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.groups.borrow().clone())
    }

    fn create_group(&self, group: &NewGroup) -> Result<Group> {
        self.posts.set(self.posts.get() + 1);
        self.next_id.set(self.next_id.get() + 1);
        let created = Group {
            id: format!("created-{}", self.next_id.get()),
            name: group.name.clone(),
            environment: group.environment.clone(),
            parent: group.parent.clone(),
            rule: Some(group.rule.clone()),
            classes: group.classes.clone(),
        };
        self.groups.borrow_mut().push(created.clone());
        Ok(created)
    }

    fn update_classes(&self, group_id: &str, classes: &Classes) -> Result<()> {
        self.posts.set(self.posts.get() + 1);
        for group in self.groups.borrow_mut().iter_mut() {
            if group.id == group_id {
                group.classes = classes.clone();
            }
        }
        Ok(())
    }

    fn pin_node(&self, group_id: &str, subject: &str) -> Result<()> {
        self.posts.set(self.posts.get() + 1);
        for group in self.groups.borrow_mut().iter_mut() {
            if group.id == group_id {
                let term = json!(["=", "name", subject]);
                group.rule = Some(match group.rule.take() {
                    Some(Value::Array(mut terms)) if terms.first() == Some(&json!("or")) => {
                        terms.push(term);
                        Value::Array(terms)
                    }
                    Some(other) => json!(["or", other, term]),
                    None => json!(["or", term]),
                });
            }
        }
        Ok(())
    }
}

/// Config for the reference network with every local file under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let hosts = dir.join("hosts");
    std::fs::write(
        &hosts,
        "127.0.0.1 localhost\n\
         10.0.0.10 master.vm\n\
         10.0.0.20 compile.vm\n\
         10.0.0.21 compile1.vm\n\
         10.0.0.22 compile2.vm\n\
         10.0.0.23 compile3.vm\n\
         10.0.0.30 agent1.vm\n",
    )
    .unwrap();
    let answers = dir.join("pe.conf");
    std::fs::write(&answers, "{}\n").unwrap();

    let mut config = Config::default();
    config.inventory.hosts_file = hosts;
    config.inventory.secondary_count = 3;
    config.installer.config_file = answers;
    config.poll.interval_secs = 5;
    config
}
