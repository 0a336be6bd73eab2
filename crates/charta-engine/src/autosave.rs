//! The per-visit autosave pipeline.
//!
//! Each open visit gets one worker task that owns the in-memory working copy
//! of its sections. Section editors send edits through an
//! [`AutoSavePipeline`] handle; the worker applies them, restarts that
//! section's debounce timer, and when a timer fires it saves the *whole*
//! working copy through the [`VersionStore`].
//!
//! ```text
//!   edit ──▶ timers[section] ──fire──▶ queue (coalescing FIFO) ──▶ in-flight slot ──▶ VersionStore::commit
//! ```
//!
//! At most one save is in flight. A timer that fires while a save is running
//! joins the queued request instead of starting another. Status moves
//! `idle → saving → saved | error`, and `saved` falls back to `idle` after a
//! short display window.

use std::{
  collections::{HashMap, VecDeque},
  sync::Arc,
  time::Duration,
};

use charta_core::{
  Error as CoreError,
  store::RecordStore,
  visit::{Section, SectionEdit, VisitRecord, VisitSections, VisitVersion},
};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::{
  sync::{broadcast, mpsc, oneshot, watch},
  task::JoinHandle,
  time::Instant,
};
use uuid::Uuid;

use crate::{Error, Result, version_store::VersionStore};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveConfig {
  /// Quiescence window applied to each section independently.
  pub debounce:      Duration,
  /// How long `saved` is shown before the status returns to `idle`.
  pub saved_display: Duration,
}

impl Default for AutoSaveConfig {
  fn default() -> Self {
    Self {
      debounce:      Duration::from_secs(30),
      saved_display: Duration::from_secs(2),
    }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AutoSaveStatus {
  #[default]
  Idle,
  Saving,
  Saved,
  Error,
}

/// Snapshot of a pipeline, as shown next to the editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoSaveState {
  pub status:             AutoSaveStatus,
  pub last_error:         Option<String>,
  pub last_saved_version: Option<u32>,
  /// The working copy holds edits no save has persisted yet.
  pub dirty:              bool,
}

// ─── Handle ──────────────────────────────────────────────────────────────────

type SaveReply = oneshot::Sender<Result<Option<VisitVersion>, CoreError>>;

enum Command {
  Edit {
    edit:     SectionEdit,
    operator: String,
    reply:    oneshot::Sender<Result<Section, CoreError>>,
  },
  SaveNow {
    operator: Option<String>,
    reply:    SaveReply,
  },
  Snapshot {
    reply: oneshot::Sender<VisitSections>,
  },
  Reload {
    record: VisitRecord,
    reply:  oneshot::Sender<()>,
  },
  Shutdown,
}

/// Handle to one visit's autosave worker. Dropping every handle stops the
/// worker once its command channel drains.
pub struct AutoSavePipeline {
  visit_id: Uuid,
  commands: mpsc::UnboundedSender<Command>,
  state:    watch::Receiver<AutoSaveState>,
  events:   broadcast::Sender<AutoSaveStatus>,
}

impl AutoSavePipeline {
  /// Start a worker seeded with `visit`'s persisted sections.
  pub fn spawn<S>(
    versions: Arc<VersionStore<S>>,
    visit: &VisitRecord,
    config: AutoSaveConfig,
  ) -> Self
  where
    S: RecordStore + 'static,
  {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(AutoSaveState::default());
    let (events_tx, _) = broadcast::channel(64);

    let worker = Worker {
      visit_id: visit.visit_id,
      versions,
      config,
      commands: command_rx,
      state: state_tx,
      events: events_tx.clone(),
      sections: visit.sections.clone(),
      base: visit.sections.clone(),
      operator: String::new(),
      timers: HashMap::new(),
      queue: VecDeque::new(),
      in_flight: None,
      idle_at: None,
      edit_seq: 0,
      saved_seq: 0,
    };
    tokio::spawn(worker.run());

    Self {
      visit_id: visit.visit_id,
      commands: command_tx,
      state: state_rx,
      events: events_tx,
    }
  }

  pub fn visit_id(&self) -> Uuid { self.visit_id }

  /// Apply `edit` to the working copy and (re)start its section's timer.
  pub async fn edit(&self, edit: SectionEdit, operator: &str) -> Result<Section> {
    let (reply, rx) = oneshot::channel();
    self.send(Command::Edit {
      edit,
      operator: operator.to_owned(),
      reply,
    })?;
    Ok(rx.await.map_err(|_| self.closed())??)
  }

  /// Save immediately, skipping any pending debounce, and wait for the
  /// outcome. `Ok(None)` means there was nothing to save.
  ///
  /// `operator`, when given, is recorded as the author of the save.
  pub async fn save_now(
    &self,
    operator: Option<&str>,
  ) -> Result<Option<VisitVersion>> {
    let (reply, rx) = oneshot::channel();
    self.send(Command::SaveNow {
      operator: operator.map(str::to_owned),
      reply,
    })?;
    Ok(rx.await.map_err(|_| self.closed())??)
  }

  /// The working copy, including unsaved edits.
  pub async fn snapshot(&self) -> Result<VisitSections> {
    let (reply, rx) = oneshot::channel();
    self.send(Command::Snapshot { reply })?;
    rx.await.map_err(|_| self.closed())
  }

  /// Replace the working copy with `record`'s sections, dropping any pending
  /// edits. Used after a version is restored behind the pipeline's back.
  pub async fn reload(&self, record: VisitRecord) -> Result<()> {
    let (reply, rx) = oneshot::channel();
    self.send(Command::Reload { record, reply })?;
    rx.await.map_err(|_| self.closed())
  }

  pub fn shutdown(&self) { let _ = self.commands.send(Command::Shutdown); }

  pub fn state(&self) -> AutoSaveState { self.state.borrow().clone() }

  /// Watch the full state.
  pub fn watch(&self) -> watch::Receiver<AutoSaveState> { self.state.clone() }

  /// Every status transition, in order.
  pub fn subscribe(&self) -> broadcast::Receiver<AutoSaveStatus> {
    self.events.subscribe()
  }

  fn send(&self, command: Command) -> Result<()> {
    self.commands.send(command).map_err(|_| self.closed())
  }

  fn closed(&self) -> Error { Error::PipelineClosed(self.visit_id) }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

/// A save request waiting for the in-flight slot. The payload is not part
/// of the request: it is taken from the working copy when the request is
/// dispatched, so coalescing only has to merge waiters.
struct PendingSave {
  waiters: Vec<SaveReply>,
}

struct InFlight {
  handle:  JoinHandle<Result<(VisitRecord, VisitVersion), CoreError>>,
  /// `edit_seq` at dispatch.
  seq:     u64,
  waiters: Vec<SaveReply>,
}

struct Worker<S> {
  visit_id:  Uuid,
  versions:  Arc<VersionStore<S>>,
  config:    AutoSaveConfig,
  commands:  mpsc::UnboundedReceiver<Command>,
  state:     watch::Sender<AutoSaveState>,
  events:    broadcast::Sender<AutoSaveStatus>,
  /// Working copy: the latest value of every section.
  sections:  VisitSections,
  /// The sections as last persisted.
  base:      VisitSections,
  operator:  String,
  timers:    HashMap<Section, Instant>,
  queue:     VecDeque<PendingSave>,
  in_flight: Option<InFlight>,
  idle_at:   Option<Instant>,
  edit_seq:  u64,
  saved_seq: u64,
}

impl<S: RecordStore + 'static> Worker<S> {
  async fn run(mut self) {
    loop {
      let next_timer = self.timers.values().min().copied();
      let idle_at = self.idle_at;

      tokio::select! {
        command = self.commands.recv() => match command {
          Some(Command::Shutdown) | None => break,
          Some(command) => self.handle(command),
        },
        _ = sleep_until(next_timer) => self.fire_timers(),
        outcome = wait_save(&mut self.in_flight) => self.finish(outcome),
        _ = sleep_until(idle_at) => self.settle(),
      }
    }
    tracing::debug!(visit_id = %self.visit_id, "autosave worker stopped");
  }

  fn handle(&mut self, command: Command) {
    match command {
      Command::Edit {
        edit,
        operator,
        reply,
      } => {
        let result = edit.apply(&mut self.sections);
        if let Ok(section) = result {
          self.edit_seq += 1;
          self.operator = operator;
          self
            .timers
            .insert(section, Instant::now() + self.config.debounce);
          self.publish(|state| state.dirty = true);
        }
        let _ = reply.send(result);
      }
      Command::SaveNow { operator, reply } => {
        if let Some(operator) = operator {
          self.operator = operator;
        }
        self.timers.clear();
        if self.queue.is_empty() && !self.needs_dispatch() {
          match &mut self.in_flight {
            Some(in_flight) => in_flight.waiters.push(reply),
            None => {
              let _ = reply.send(Ok(None));
            }
          }
          return;
        }
        self.request_save(Some(reply));
      }
      Command::Snapshot { reply } => {
        let _ = reply.send(self.sections.clone());
      }
      Command::Reload { record, reply } => {
        self.timers.clear();
        self.sections = record.sections.clone();
        self.base = record.sections;
        self.saved_seq = self.edit_seq;
        self.publish(|state| state.dirty = false);
        let _ = reply.send(());
      }
      Command::Shutdown => {}
    }
  }

  /// Queue a save for every section whose quiescence window has elapsed.
  fn fire_timers(&mut self) {
    let now = Instant::now();
    let before = self.timers.len();
    self.timers.retain(|_, deadline| *deadline > now);
    if self.timers.len() < before {
      self.request_save(None);
    }
  }

  fn request_save(&mut self, waiter: Option<SaveReply>) {
    match self.queue.back_mut() {
      Some(pending) => pending.waiters.extend(waiter),
      None => self.queue.push_back(PendingSave {
        waiters: waiter.into_iter().collect(),
      }),
    }
    self.dispatch();
  }

  /// Whether the working copy holds edits that neither a completed nor the
  /// in-flight save covers.
  fn needs_dispatch(&self) -> bool {
    let covered = match &self.in_flight {
      Some(in_flight) => in_flight.seq.max(self.saved_seq),
      None => self.saved_seq,
    };
    self.edit_seq > covered
  }

  /// Move the head of the queue into the in-flight slot, if it is free.
  fn dispatch(&mut self) {
    while self.in_flight.is_none() {
      let Some(pending) = self.queue.pop_front() else {
        return;
      };
      if !self.needs_dispatch() {
        for waiter in pending.waiters {
          let _ = waiter.send(Ok(None));
        }
        continue;
      }

      self.begin_cycle();
      let versions = Arc::clone(&self.versions);
      let visit_id = self.visit_id;
      let sections = self.sections.clone();
      let operator = self.operator.clone();
      tracing::debug!(%visit_id, seq = self.edit_seq, "autosave dispatched");

      let handle = tokio::spawn(async move {
        versions.commit(visit_id, sections, &operator).await
      });
      self.in_flight = Some(InFlight {
        handle,
        seq: self.edit_seq,
        waiters: pending.waiters,
      });
    }
  }

  fn finish(&mut self, outcome: Result<(VisitRecord, VisitVersion), CoreError>) {
    let Some(in_flight) = self.in_flight.take() else {
      return;
    };

    match outcome {
      Ok((record, version)) => {
        self.saved_seq = self.saved_seq.max(in_flight.seq);
        self.base = record.sections;
        let dirty = self.edit_seq > self.saved_seq;
        tracing::info!(
          visit_id = %self.visit_id,
          version = version.version_number,
          "autosave committed"
        );
        self.set_status(AutoSaveStatus::Saved, |state| {
          state.last_error = None;
          state.last_saved_version = Some(version.version_number);
          state.dirty = dirty;
        });
        self.idle_at = Some(Instant::now() + self.config.saved_display);
        for waiter in in_flight.waiters {
          let _ = waiter.send(Ok(Some(version.clone())));
        }
      }

      // The visit stopped being editable: nothing pending can ever be
      // saved, so the working copy falls back to what is persisted.
      Err(err @ CoreError::Locked { .. }) => {
        tracing::warn!(
          visit_id = %self.visit_id,
          error = %err,
          "autosave rejected, discarding pending edits"
        );
        self.timers.clear();
        self.sections = self.base.clone();
        self.saved_seq = self.edit_seq;
        let message = err.to_string();
        self.set_status(AutoSaveStatus::Error, |state| {
          state.last_error = Some(message);
          state.dirty = false;
        });
        let queued = self.queue.drain(..).flat_map(|pending| pending.waiters);
        for waiter in in_flight.waiters.into_iter().chain(queued) {
          let _ = waiter.send(Err(err.clone()));
        }
      }

      Err(err) => {
        tracing::warn!(
          visit_id = %self.visit_id,
          error = %err,
          "autosave failed"
        );
        let message = err.to_string();
        self.set_status(AutoSaveStatus::Error, |state| {
          state.last_error = Some(message);
        });
        for waiter in in_flight.waiters {
          let _ = waiter.send(Err(err.clone()));
        }
      }
    }

    self.dispatch();
  }

  /// End the `saved` display window.
  fn settle(&mut self) {
    self.idle_at = None;
    if self.state.borrow().status == AutoSaveStatus::Saved {
      self.set_status(AutoSaveStatus::Idle, |_| {});
    }
  }

  /// Every cycle starts from `idle`.
  fn begin_cycle(&mut self) {
    self.idle_at = None;
    if self.state.borrow().status != AutoSaveStatus::Idle {
      self.set_status(AutoSaveStatus::Idle, |_| {});
    }
    self.set_status(AutoSaveStatus::Saving, |_| {});
  }

  fn set_status(
    &self,
    status: AutoSaveStatus,
    update: impl FnOnce(&mut AutoSaveState),
  ) {
    self.state.send_modify(|state| {
      state.status = status;
      update(state);
    });
    let _ = self.events.send(status);
  }

  fn publish(&self, update: impl FnOnce(&mut AutoSaveState)) {
    self.state.send_modify(update);
  }
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

async fn wait_save(
  slot: &mut Option<InFlight>,
) -> Result<(VisitRecord, VisitVersion), CoreError> {
  match slot {
    Some(in_flight) => match (&mut in_flight.handle).await {
      Ok(outcome) => outcome,
      Err(join) => Err(CoreError::save_failed(join)),
    },
    None => std::future::pending().await,
  }
}
