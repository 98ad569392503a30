//! Keystroke-level flows through `AppController`: key sequences, prompts,
//! downloads spawned from bindings and commands, and conflict questions.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyEvent;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

use blobnav::AppController;
use blobnav::config::Config;
use blobnav::controller::event_loop::TaskEvent;
use blobnav::controller::key_repeat::InputEvent;
use blobnav::controller::keys::{ctrl, enter_key, escape_key, key, shift};
use blobnav::model::download_session::ConflictPolicy;
use blobnav::model::navigation::NavigationLevel;
use blobnav::model::ui_state::{NotificationLevel, UIMode};
use blobnav::storage::memory::InMemoryBackend;
use blobnav::tasks::download_task::DownloadPipeline;
use blobnav::transfer::conflict::{ChannelConflictPrompt, PendingConflict};
use blobnav::transfer::session_store::MemorySessionStore;

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    controller: AppController,
    task_rx: mpsc::UnboundedReceiver<TaskEvent>,
    conflict_rx: mpsc::UnboundedReceiver<PendingConflict>,
    _input_rx: mpsc::UnboundedReceiver<InputEvent>,
    dir: TempDir,
    now: Instant,
}

impl Harness {
    async fn new(policy: ConflictPolicy) -> Self {
        let backend = Arc::new(InMemoryBackend::new("acct"));
        backend.put_blob("alpha", "docs/guide.md", "guide");
        backend.put_blob("alpha", "docs/notes.txt", "notes");
        backend.put_blob("alpha", "readme.md", "remote readme");
        backend.put_blob("alpha", "report.txt", "report");
        backend.put_blob("alpha", "zeta.txt", "zeta");
        backend.put_blob("beta", "only.bin", "b");

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.download.root = Some(dir.path().to_path_buf());
        config.download.options.conflict_policy = policy;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (conflict_tx, conflict_rx) = mpsc::unbounded_channel();

        let pipeline = Arc::new(DownloadPipeline::new(
            backend.clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(ChannelConflictPrompt::new(conflict_tx)),
        ));

        let mut controller =
            AppController::new(&config, backend, pipeline, input_tx, task_tx).unwrap();
        controller.set_repeat_enabled(false);
        controller.start().await;

        Self {
            controller,
            task_rx,
            conflict_rx,
            _input_rx: input_rx,
            dir,
            now: Instant::now(),
        }
    }

    async fn press(&mut self, key: KeyEvent) {
        self.now += Duration::from_millis(10);
        self.controller.handle_input(InputEvent::Key(key), self.now).await;
    }

    async fn type_text(&mut self, text: &str) {
        for c in text.chars() {
            self.press(key(c)).await;
        }
    }

    /// Let the resolver's sequence timeout pass.
    async fn idle(&mut self) {
        self.now += Duration::from_millis(600);
        self.controller.tick(self.now).await;
    }

    /// Feed task events to the controller until one transfer finishes.
    async fn wait_finished(&mut self) {
        loop {
            let event = timeout(WAIT, self.task_rx.recv())
                .await
                .expect("task event in time")
                .expect("task channel open");
            let finished = matches!(
                event,
                TaskEvent::DownloadFinished { .. } | TaskEvent::BatchFinished { .. }
            );
            self.controller.handle_task_event(event);
            if finished {
                return;
            }
        }
    }

    fn selected_name(&self) -> String {
        self.controller
            .navigator()
            .selected_item()
            .map(|i| i.name.clone())
            .unwrap_or_default()
    }

    fn notification(&self) -> Option<(NotificationLevel, String)> {
        self.controller
            .ui()
            .notification
            .as_ref()
            .map(|n| (n.level, n.message.to_string()))
    }

    /// Open the `alpha` container.
    async fn open_alpha(&mut self) {
        self.press(key('l')).await;
        assert_eq!(
            self.controller.navigator().state().container.as_deref(),
            Some("alpha")
        );
    }
}

#[tokio::test]
async fn test_motion_keys_move_the_selection() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    assert_eq!(h.controller.navigator().level(), NavigationLevel::Root);
    assert_eq!(h.selected_name(), "alpha");

    h.press(key('j')).await;
    assert_eq!(h.selected_name(), "beta");
    h.press(key('k')).await;
    assert_eq!(h.selected_name(), "alpha");

    h.open_alpha().await;
    assert_eq!(h.controller.navigator().items().len(), 4);
    assert_eq!(h.selected_name(), "docs");

    h.press(shift('G')).await;
    assert_eq!(h.selected_name(), "zeta.txt");

    h.press(key('g')).await;
    assert_eq!(h.controller.ui().pending_keys, "g");
    h.press(key('g')).await;
    assert_eq!(h.selected_name(), "docs");
    assert!(h.controller.ui().pending_keys.is_empty());

    h.press(enter_key()).await;
    assert_eq!(h.controller.navigator().state().prefix.as_deref(), Some("docs"));

    h.press(key('h')).await;
    h.press(key('h')).await;
    assert_eq!(h.controller.navigator().level(), NavigationLevel::Root);
}

#[tokio::test]
async fn test_download_binding_fires_after_sequence_timeout() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.open_alpha().await;
    h.press(key('j')).await;
    assert_eq!(h.selected_name(), "readme.md");

    // "d" is also the start of "da", so it waits for the timeout.
    h.press(key('d')).await;
    assert_eq!(h.controller.running_transfers(), 0);
    assert_eq!(h.controller.ui().pending_keys, "d");

    h.idle().await;
    assert_eq!(h.controller.running_transfers(), 1);
    assert_eq!(h.controller.ui().transfers.len(), 1);
    assert!(h.controller.ui().pending_keys.is_empty());

    h.wait_finished().await;
    assert_eq!(h.controller.running_transfers(), 0);
    assert!(h.controller.ui().transfers.is_empty());

    let path = h.dir.path().join("alpha").join("readme.md");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "remote readme");
    let (level, message) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Success);
    assert!(message.contains("[verified]"), "{message}");
}

#[tokio::test]
async fn test_download_at_root_is_refused() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.press(key('d')).await;
    h.press(key('a')).await;

    assert_eq!(h.controller.running_transfers(), 0);
    let (level, _) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Warning);
}

#[tokio::test]
async fn test_search_prompt_selects_next_match() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.open_alpha().await;

    h.press(key('/')).await;
    assert_eq!(h.controller.ui().mode, UIMode::Search);
    assert_eq!(h.controller.ui().prompt_prefix.as_str(), "/");

    h.type_text("REP").await;
    assert_eq!(h.controller.ui().input, "REP");
    h.press(enter_key()).await;

    assert_eq!(h.controller.ui().mode, UIMode::Browse);
    assert_eq!(h.selected_name(), "report.txt");
    assert_eq!(h.controller.ui().last_search.as_deref(), Some("REP"));

    h.press(key('/')).await;
    h.type_text("nothing-like-this").await;
    h.press(enter_key()).await;
    assert_eq!(h.selected_name(), "report.txt");
    let (level, _) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Warning);
}

#[tokio::test]
async fn test_escape_closes_prompt_without_running_it() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.press(key(':')).await;
    assert_eq!(h.controller.ui().mode, UIMode::Command);
    h.type_text("q").await;
    h.press(escape_key()).await;

    assert_eq!(h.controller.ui().mode, UIMode::Browse);
    assert!(h.controller.ui().input.is_empty());
    assert!(!h.controller.should_quit());
}

#[tokio::test]
async fn test_command_download_glob_runs_a_batch() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.open_alpha().await;

    h.press(key(':')).await;
    h.type_text("dl *.txt").await;
    h.press(enter_key()).await;
    assert_eq!(h.controller.running_transfers(), 1);

    h.wait_finished().await;

    let root = h.dir.path().join("alpha");
    assert!(root.join("report.txt").exists());
    assert!(root.join("zeta.txt").exists());
    assert!(root.join("docs").join("notes.txt").exists());
    assert!(!root.join("readme.md").exists());

    let (level, message) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Success);
    assert_eq!(message, "Batch: 3 downloaded, 0 skipped, 0 failed");
}

#[tokio::test]
async fn test_command_errors_are_reported() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;

    h.press(key(':')).await;
    h.type_text("frobnicate").await;
    h.press(enter_key()).await;
    let (level, message) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Error);
    assert!(message.contains("frobnicate"));

    h.open_alpha().await;
    h.press(key(':')).await;
    h.type_text("dl").await;
    h.press(enter_key()).await;
    let (level, message) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Warning);
    assert!(message.starts_with("Usage"));
    assert_eq!(h.controller.running_transfers(), 0);
}

#[tokio::test]
async fn test_conflict_question_answered_from_keyboard() {
    let mut h = Harness::new(ConflictPolicy::Ask).await;
    let existing = h.dir.path().join("alpha").join("readme.md");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, "mine").unwrap();

    h.open_alpha().await;
    h.press(key('j')).await;
    h.press(key('d')).await;
    h.idle().await;

    let question = timeout(WAIT, h.conflict_rx.recv()).await.unwrap().unwrap();
    assert_eq!(question.path, existing);
    h.controller
        .handle_task_event(TaskEvent::ConflictQuestion(question));
    assert_eq!(h.controller.ui().mode, UIMode::Conflict);

    // Navigation keys are not bindings while the question is open.
    h.press(key('j')).await;
    assert_eq!(h.controller.ui().mode, UIMode::Conflict);
    assert_eq!(h.selected_name(), "readme.md");

    h.press(key('r')).await;
    assert_eq!(h.controller.ui().mode, UIMode::Browse);
    assert!(h.controller.ui().conflict.is_none());

    h.wait_finished().await;
    let renamed = existing.with_file_name("readme (1).md");
    assert_eq!(std::fs::read_to_string(renamed).unwrap(), "remote readme");
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "mine");
}

#[tokio::test]
async fn test_quit_binding_and_ctrl_c() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.press(key('q')).await;
    assert!(h.controller.should_quit());

    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.press(key('g')).await;
    h.press(ctrl('c')).await;
    assert!(h.controller.should_quit());
}

#[tokio::test]
async fn test_help_overlay_closes_on_any_key() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.press(key('?')).await;
    assert_eq!(h.controller.ui().mode, UIMode::Help);

    h.press(key('j')).await;
    assert_eq!(h.controller.ui().mode, UIMode::Browse);
    assert_eq!(h.selected_name(), "alpha");
}

#[tokio::test]
async fn test_escape_drops_pending_sequence() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.open_alpha().await;
    h.press(shift('G')).await;

    h.press(key('g')).await;
    assert_eq!(h.controller.ui().pending_keys, "g");
    h.press(escape_key()).await;
    assert!(h.controller.ui().pending_keys.is_empty());

    h.idle().await;
    assert_eq!(h.selected_name(), "zeta.txt");
}

#[tokio::test]
async fn test_paging_past_the_end_is_informational() {
    let mut h = Harness::new(ConflictPolicy::Rename).await;
    h.press(key(']')).await;

    let (level, message) = h.notification().unwrap();
    assert_eq!(level, NotificationLevel::Info);
    assert_eq!(message, "Already on the last page");

    h.press(key('x')).await;
    let (_, message) = h.notification().unwrap();
    assert_eq!(message, "No downloads running");
}
