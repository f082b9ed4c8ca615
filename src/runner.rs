use crate::config::TaskConfig;
use crate::tasks::{self, TaskStatus};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::mpsc;

pub const MAX_OUTPUT_LINES: usize = 15;

/// Display pacing between tasks; not needed for correctness.
const SETTLE_DELAY: Duration = Duration::from_millis(300);
/// How long the summary stays on screen before the process exits on its own.
const EXIT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct RunnableTask {
    pub name: String,
    pub command: String,
    pub check_command: Option<String>,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub output: Option<String>,
}

impl RunnableTask {
    pub fn from_config(cfg: &TaskConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            command: cfg.command.clone(),
            check_command: cfg.check_command.clone(),
            description: cfg.description.clone(),
            status: TaskStatus::Pending,
            output: None,
        }
    }
}

/// Bounded FIFO of display lines. Oldest lines fall off first; this is a
/// viewport, not an audit log.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
}

impl OutputBuffer {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > MAX_OUTPUT_LINES {
            self.lines.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }
}

enum Phase {
    Idle,
    Running {
        order_pos: usize,
        child: Child,
        rx: mpsc::UnboundedReceiver<tasks::TaskLine>,
        captured: Vec<String>,
        captured_err: Vec<String>,
        exit: Option<std::process::ExitStatus>,
    },
    Settling {
        next_pos: usize,
        until: Instant,
    },
    Finished {
        exit_at: Instant,
    },
}

/// Owns the task list for one invocation and drives it through the status
/// machine. `pump()` is called from the UI event loop and never blocks on a
/// child process; output is drained with `try_recv` and exits detected with
/// `try_wait`, so a redraw is never held up by a long-running command.
pub struct Runner {
    tasks: Vec<RunnableTask>,
    // indices into `tasks`, in input order; tasks are addressed by index so
    // duplicate names cannot corrupt status updates
    order: Vec<usize>,
    live: OutputBuffer,
    phase: Phase,
}

impl Runner {
    pub fn new(tasks: Vec<RunnableTask>) -> Self {
        let order = (0..tasks.len()).collect();
        Self {
            tasks,
            order,
            live: OutputBuffer::default(),
            phase: Phase::Idle,
        }
    }

    /// Restrict the run to the named tasks. Everything else transitions to
    /// `NotSelected` before any command runs. A name selects every task
    /// bearing it.
    pub fn apply_selection(&mut self, selected: &HashSet<String>) {
        if selected.is_empty() {
            return;
        }
        for task in &mut self.tasks {
            if !selected.contains(&task.name) {
                task.status = TaskStatus::NotSelected;
            }
        }
        self.order.retain(|&i| selected.contains(&self.tasks[i].name));
    }

    pub fn tasks(&self) -> &[RunnableTask] {
        &self.tasks
    }

    pub fn live(&self) -> &OutputBuffer {
        &self.live
    }

    /// Surface a line (config diagnostics etc.) in the live buffer.
    pub fn note(&mut self, line: impl Into<String>) {
        self.live.push(line);
    }

    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count()
    }

    /// True once every task is terminal and the summary has been emitted.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished { .. })
    }

    /// True once the post-summary grace period has elapsed.
    pub fn should_exit(&self) -> bool {
        match self.phase {
            Phase::Finished { exit_at } => Instant::now() >= exit_at,
            _ => false,
        }
    }

    /// Advance the machine one turn: drain pending output, detect child
    /// exit, move to the next task once the settle delay has passed.
    pub async fn pump(&mut self) {
        match &mut self.phase {
            Phase::Idle => self.advance(0).await,
            Phase::Settling { next_pos, until } => {
                if Instant::now() >= *until {
                    let next = *next_pos;
                    self.advance(next).await;
                }
            }
            Phase::Running { .. } => self.pump_running(),
            Phase::Finished { .. } => {}
        }
    }

    fn pump_running(&mut self) {
        let Phase::Running {
            order_pos,
            child,
            rx,
            captured,
            captured_err,
            exit,
        } = &mut self.phase
        else {
            return;
        };

        // drain; the channel disconnects once both reader tasks hit EOF
        let mut streams_done = false;
        loop {
            match rx.try_recv() {
                Ok(line) => {
                    captured.push(line.text.clone());
                    if line.from_stderr {
                        captured_err.push(line.text.clone());
                    }
                    self.live.push(line.text);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    streams_done = true;
                    break;
                }
            }
        }

        if exit.is_none() {
            match child.try_wait() {
                Ok(Some(status)) => *exit = Some(status),
                Ok(None) => return,
                Err(e) => {
                    let idx = self.order[*order_pos];
                    let next = *order_pos + 1;
                    self.tasks[idx].status = TaskStatus::Failed;
                    self.tasks[idx].output = Some(e.to_string());
                    self.live.push(e.to_string());
                    self.settle(next);
                    return;
                }
            }
        }

        // finalize only once the exit status is known and every buffered
        // output line has been collected
        let Some(status) = *exit else { return };
        if !streams_done {
            return;
        }

        let idx = self.order[*order_pos];
        let next = *order_pos + 1;

        if status.success() {
            self.tasks[idx].status = TaskStatus::Completed;
            self.tasks[idx].output = Some(captured.join("\n"));
        } else {
            let code = status.code().unwrap_or(1);
            let diag = if captured_err.is_empty() {
                let msg = format!("exit status {code}");
                self.live.push(msg.clone());
                msg
            } else {
                captured_err.join("\n")
            };
            self.tasks[idx].status = TaskStatus::Failed;
            self.tasks[idx].output = Some(diag);
        }

        self.settle(next);
    }

    fn settle(&mut self, next_pos: usize) {
        self.phase = Phase::Settling {
            next_pos,
            until: Instant::now() + SETTLE_DELAY,
        };
    }

    /// Start the task at `pos` in the run order: probe, then spawn. Skipped
    /// and spawn-failed tasks settle like any other so the display pacing
    /// stays even.
    async fn advance(&mut self, pos: usize) {
        if pos >= self.order.len() {
            self.finish();
            return;
        }
        let idx = self.order[pos];

        if let Some(check) = self.tasks[idx].check_command.clone() {
            if !tasks::command_exists(&check).await {
                self.tasks[idx].status = TaskStatus::Skipped;
                let name = &self.tasks[idx].name;
                self.live.push(format!("[{name}] Skipped - not installed"));
                self.settle(pos + 1);
                return;
            }
        }

        self.tasks[idx].status = TaskStatus::Running;
        if !self.live.is_empty() {
            self.live.push(String::new());
        }
        self.live.push(format!("[{}]", self.tasks[idx].name));

        match tasks::spawn_task(&self.tasks[idx].command) {
            Ok((child, rx)) => {
                self.phase = Phase::Running {
                    order_pos: pos,
                    child,
                    rx,
                    captured: Vec::new(),
                    captured_err: Vec::new(),
                    exit: None,
                };
            }
            Err(e) => {
                self.tasks[idx].status = TaskStatus::Failed;
                self.tasks[idx].output = Some(e.to_string());
                self.live.push(e.to_string());
                self.settle(pos + 1);
            }
        }
    }

    fn finish(&mut self) {
        let failed = self.failed_count();
        self.live.push(String::new());
        if failed > 0 {
            self.live
                .push(format!("⚠ Completed with {failed} failure(s)"));
        } else {
            self.live.push("✨ All tasks completed successfully!");
        }
        self.phase = Phase::Finished {
            exit_at: Instant::now() + EXIT_DELAY,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, command: &str) -> RunnableTask {
        RunnableTask {
            name: name.to_string(),
            command: command.to_string(),
            check_command: None,
            description: None,
            status: TaskStatus::Pending,
            output: None,
        }
    }

    async fn drive(runner: &mut Runner) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !runner.is_finished() {
            assert!(Instant::now() < deadline, "runner did not finish in time");
            runner.pump().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn live_lines(runner: &Runner) -> Vec<String> {
        runner.live().iter().cloned().collect()
    }

    #[test]
    fn output_buffer_never_exceeds_capacity() {
        let mut buf = OutputBuffer::default();
        for i in 0..100 {
            buf.push(format!("line {i}"));
        }
        assert_eq!(buf.len(), MAX_OUTPUT_LINES);
        let lines: Vec<&String> = buf.iter().collect();
        assert_eq!(lines[0], "line 85");
        assert_eq!(lines[MAX_OUTPUT_LINES - 1], "line 99");
    }

    #[test]
    fn selection_marks_excluded_tasks_before_any_run() {
        let mut runner = Runner::new(vec![
            task("a", "true"),
            task("b", "true"),
            task("c", "true"),
        ]);
        let selected: HashSet<String> = ["b".to_string()].into();
        runner.apply_selection(&selected);

        assert_eq!(runner.tasks()[0].status, TaskStatus::NotSelected);
        assert_eq!(runner.tasks()[1].status, TaskStatus::Pending);
        assert_eq!(runner.tasks()[2].status, TaskStatus::NotSelected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_selection_gates_nothing_and_pushes_no_banner() {
        let mut runner = Runner::new(vec![task("a", "true"), task("b", "true")]);
        runner.apply_selection(&HashSet::new());

        assert!(runner
            .tasks()
            .iter()
            .all(|t| t.status == TaskStatus::Pending));
        assert!(runner.live().is_empty(), "no banner before any pump");
        assert!(!runner.is_finished());

        // the run order is untouched: both tasks still execute, in order
        drive(&mut runner).await;
        assert!(runner
            .tasks()
            .iter()
            .all(|t| t.status == TaskStatus::Completed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn selected_subset_runs_in_order_and_rest_never_execute() {
        let dir = tempfile::tempdir().unwrap();
        let a_marker = dir.path().join("a");
        let mut runner = Runner::new(vec![
            task("a", &format!("touch {}", a_marker.display())),
            task("b", "echo b"),
        ]);
        let selected: HashSet<String> = ["b".to_string()].into();
        runner.apply_selection(&selected);
        drive(&mut runner).await;

        assert_eq!(runner.tasks()[0].status, TaskStatus::NotSelected);
        assert_eq!(runner.tasks()[1].status, TaskStatus::Completed);
        assert!(!a_marker.exists(), "unselected task must never run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_probe_skips_without_running_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let mut t = task("ghost", &format!("touch {}", marker.display()));
        t.check_command = Some("ddup-no-such-binary-on-any-path".to_string());

        let mut runner = Runner::new(vec![t]);
        drive(&mut runner).await;

        assert_eq!(runner.tasks()[0].status, TaskStatus::Skipped);
        assert!(!marker.exists(), "skipped task must never run");
        assert!(live_lines(&runner)
            .iter()
            .any(|l| l == "[ghost] Skipped - not installed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn all_green_run_emits_success_banner() {
        let mut runner = Runner::new(vec![task("one", "echo hi"), task("two", "true")]);
        drive(&mut runner).await;

        assert!(runner
            .tasks()
            .iter()
            .all(|t| t.status == TaskStatus::Completed));
        assert_eq!(runner.failed_count(), 0);
        assert_eq!(
            live_lines(&runner).last().map(String::as_str),
            Some("✨ All tasks completed successfully!")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_is_recorded_and_later_tasks_still_run() {
        let mut runner = Runner::new(vec![
            task("ok", "echo fine"),
            task("bad", "exit 2"),
            task("after", "echo still here"),
        ]);
        drive(&mut runner).await;

        assert_eq!(runner.tasks()[0].status, TaskStatus::Completed);
        assert_eq!(runner.tasks()[1].status, TaskStatus::Failed);
        assert_eq!(runner.tasks()[2].status, TaskStatus::Completed);
        assert_eq!(runner.failed_count(), 1);
        assert_eq!(
            live_lines(&runner).last().map(String::as_str),
            Some("⚠ Completed with 1 failure(s)")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_diagnostic_prefers_captured_stderr() {
        let mut runner = Runner::new(vec![task("bad", "echo boom 1>&2; exit 1")]);
        drive(&mut runner).await;

        assert_eq!(runner.tasks()[0].status, TaskStatus::Failed);
        assert_eq!(runner.tasks()[0].output.as_deref(), Some("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_failure_falls_back_to_exit_status() {
        let mut runner = Runner::new(vec![task("quiet", "exit 7")]);
        drive(&mut runner).await;

        assert_eq!(runner.tasks()[0].output.as_deref(), Some("exit status 7"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn completed_task_stores_captured_output() {
        let mut runner = Runner::new(vec![task("chatty", "echo first; echo second")]);
        drive(&mut runner).await;

        assert_eq!(
            runner.tasks()[0].output.as_deref(),
            Some("first\nsecond")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn duplicate_names_keep_independent_statuses() {
        let mut runner = Runner::new(vec![task("x", "true"), task("x", "exit 1")]);
        let selected: HashSet<String> = ["x".to_string()].into();
        runner.apply_selection(&selected);
        drive(&mut runner).await;

        assert_eq!(runner.tasks()[0].status, TaskStatus::Completed);
        assert_eq!(runner.tasks()[1].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn empty_task_list_still_summarizes_success() {
        let mut runner = Runner::new(Vec::new());
        drive(&mut runner).await;

        assert!(runner.is_finished());
        assert!(!runner.should_exit());
        assert_eq!(
            live_lines(&runner).last().map(String::as_str),
            Some("✨ All tasks completed successfully!")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn live_buffer_stays_bounded_under_heavy_output() {
        let mut runner = Runner::new(vec![task("noisy", "seq 1 200")]);
        drive(&mut runner).await;

        assert!(runner.live().len() <= MAX_OUTPUT_LINES);
    }
}
