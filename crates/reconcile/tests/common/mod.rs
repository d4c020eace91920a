#![allow(dead_code)]
use async_trait::async_trait;
use reconcile::{ClusterIdentity, Declaration, ReconcileError, ReconcileMeta, ReconcileResult, Reconciler, Result,
                StateHandle};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Minimal declaration: just an identity, optionally invalid.
pub struct TestDecl {
  pub identity: ClusterIdentity,
  pub valid: bool,
  pub owns_state: bool,
}

impl TestDecl {
  pub fn demo() -> Self {
    Self { identity: ClusterIdentity::new("eu-west-1", "123456789012", "demo"),
           valid: true,
           owns_state: true }
  }
}

impl Declaration for TestDecl {
  fn identity(&self) -> ClusterIdentity {
    self.identity.clone()
  }

  fn validate(&self) -> Result<()> {
    if self.valid {
      Ok(())
    } else {
      Err(ReconcileError::Validation("invalid test declaration".into()))
    }
  }

  fn owns_state(&self) -> bool {
    self.owns_state
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Done,
  Requeue,
  Fail,
}

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
  log.lock().unwrap().clone()
}

/// Reconciler that follows a script (last step repeats) and, on success
/// in apply mode, writes one record of its own kind; in purge mode it
/// removes it.
pub struct Scripted {
  pub name: &'static str,
  pub kinds: [&'static str; 1],
  pub script: Vec<Step>,
  pub calls: Mutex<usize>,
  pub log: CallLog,
}

impl Scripted {
  pub fn new(name: &'static str, script: Vec<Step>, log: &CallLog) -> Box<Self> {
    Box::new(Self { name,
                    kinds: [name],
                    script,
                    calls: Mutex::new(0),
                    log: log.clone() })
  }
}

#[async_trait]
impl Reconciler<TestDecl> for Scripted {
  fn name(&self) -> &str {
    self.name
  }

  fn owns(&self) -> &[&'static str] {
    &self.kinds
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, TestDecl>, state: &StateHandle<'_>) -> Result<ReconcileResult> {
    self.log.lock().unwrap().push(self.name.to_string());
    let step = {
      let mut n = self.calls.lock().unwrap();
      let step = *self.script.get(*n).or(self.script.last()).unwrap_or(&Step::Done);
      *n += 1;
      step
    };
    match step {
      Step::Fail => Err(ReconcileError::Other(format!("{} exploded", self.name))),
      Step::Requeue => Ok(ReconcileResult::requeue()),
      Step::Done if meta.purge => {
        state.remove(self.name, "main")?;
        Ok(ReconcileResult::done())
      }
      Step::Done => {
        state.save_typed(self.name, "main", &json!({"owner": self.name}))?;
        Ok(ReconcileResult::done())
      }
    }
  }
}
