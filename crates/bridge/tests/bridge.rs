use std::{
    io::IsTerminal,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use bridge::testing::{EditorCall, EditorHandle, FakeDebugger, FakeHandle, RecordingEditor};
use bridge::{
    Action, BridgeConfig, BridgeError, BufferId, Command, FloodLimits, Gateway, MarkerStyle, Pane,
    Reply, Session, Severity, WorkerState,
};
use tracing_subscriber::EnvFilter;

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

struct Harness {
    gateway: Gateway,
    debugger: FakeHandle,
    editor: EditorHandle,
}

impl Harness {
    fn new() -> eyre::Result<Self> {
        Self::with(BridgeConfig::default(), Session::default())
    }

    fn with(config: BridgeConfig, session: Session) -> eyre::Result<Self> {
        let (backend, debugger) = FakeDebugger::new();
        let (surface, editor) = RecordingEditor::new();
        let gateway = Gateway::spawn(backend, surface, config, session)?;
        Ok(Self {
            gateway,
            debugger,
            editor,
        })
    }

    /// Run a command and wait for its reply
    fn call(&self, command: Command) -> Reply {
        match self.gateway.submit(command, true, None) {
            Ok(Some(reply)) => reply,
            other => panic!("unexpected result of synchronous request: {other:?}"),
        }
    }

    fn exec(&self, line: &str) -> Reply {
        self.call(Command::Execute(
            line.split_whitespace().map(str::to_string).collect(),
        ))
    }

    /// Barrier: every request submitted before has been handled
    fn sync(&self) {
        assert_eq!(self.call(Command::Refresh), Reply::Done);
    }

    fn log(&self) -> Vec<String> {
        self.editor.pane_lines(Pane::Logs)
    }

    /// Program launched with a breakpoint on line 10 of /src/a.c, stopped there
    fn stopped_at_breakpoint(&self) -> BufferId {
        let buffer = self.editor.add_file("/src/a.c");
        assert_eq!(self.exec("target create /bin/a.out"), Reply::Success(true));
        assert_eq!(
            self.call(Command::SetBreakpoint {
                path: "/src/a.c".into(),
                line: 10,
            }),
            Reply::Success(true)
        );
        assert_eq!(self.exec("process launch"), Reply::Success(true));
        wait_until("program counter marker", || {
            self.editor
                .placed()
                .values()
                .any(|placed| *placed == (MarkerStyle::PcSelected, buffer, 10))
        });
        buffer
    }
}

#[tracing::instrument(skip(pred))]
fn wait_until(message: &str, pred: impl Fn() -> bool) {
    let start = Instant::now();
    while !pred() {
        if start.elapsed() > Duration::from_secs(10) {
            panic!("timeout waiting for {message} after 10 seconds");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn synchronous_requests_are_answered_in_order() -> eyre::Result<()> {
    let harness = Harness::new()?;

    assert_eq!(harness.exec("target create /bin/a.out"), Reply::Success(true));
    assert_eq!(harness.exec("bogus"), Reply::Success(false));
    assert_eq!(harness.call(Command::Modes), Reply::Modes(Vec::new()));

    assert!(harness.debugger.target().is_some());
    let statuses = harness.editor.statuses();
    assert!(
        statuses
            .iter()
            .any(|(message, severity)| message.contains("`bogus` failed")
                && *severity == Severity::Error),
        "statuses: {statuses:?}"
    );
    Ok(())
}

#[test]
fn commands_are_echoed_to_the_log() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness.exec("target create /bin/a.out");
    harness.exec("bogus");

    let log = harness.log();
    assert!(log.contains(&"→(lldb) target create /bin/a.out".to_string()), "{log:?}");
    assert!(
        log.iter()
            .any(|line| line.starts_with("✓Current executable set to '/bin/a.out'")),
        "{log:?}"
    );
    assert!(
        log.contains(&"✗error: 'bogus' is not a valid command.".to_string()),
        "{log:?}"
    );
    Ok(())
}

#[test]
fn zero_deadline_requests_do_not_confuse_later_replies() -> eyre::Result<()> {
    let config = BridgeConfig {
        request_queue_capacity: 16,
        ..Default::default()
    };
    let session = session::from_str(r#"{"modes": {"debug": {}}}"#)?;
    let harness = Harness::with(config, session)?;

    for _ in 0..5 {
        match harness
            .gateway
            .submit(Command::Modes, true, Some(Duration::ZERO))
        {
            Ok(Some(Reply::Modes(modes))) => assert_eq!(modes, vec!["debug".to_string()]),
            Err(BridgeError::EventLoopUnresponsive { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(harness.gateway.modes()?, vec!["debug".to_string()]);
    Ok(())
}

#[test]
fn busy_worker_is_reported_unresponsive() -> eyre::Result<()> {
    let session = session::from_str(r#"{"modes": {"debug": {}, "release": {}}}"#)?;
    let harness = Harness::with(BridgeConfig::default(), session)?;

    harness
        .gateway
        .run_actions(vec![Action::Shell("sleep 0.5".to_string())])?;
    let deadline = Duration::from_millis(50);
    let result = harness.gateway.submit(Command::Modes, true, Some(deadline));
    assert!(
        matches!(result, Err(BridgeError::EventLoopUnresponsive { waited }) if waited == deadline),
        "{result:?}"
    );

    // the late reply to the timed out request is not mistaken for this one
    let reply = harness.call(Command::Modes);
    assert_eq!(
        reply,
        Reply::Modes(vec!["debug".to_string(), "release".to_string()])
    );
    Ok(())
}

#[test]
fn requests_after_shutdown_fail() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness.gateway.shutdown()?;

    assert_eq!(harness.gateway.state(), WorkerState::Terminated);
    assert!(harness.debugger.terminated());
    let result = harness.gateway.execute(["bt"]);
    assert!(matches!(result, Err(BridgeError::DeadWorker(_))), "{result:?}");

    // shutting down twice is harmless
    harness.gateway.shutdown()?;
    Ok(())
}

#[test]
fn shutdown_command_joins_the_worker() -> eyre::Result<()> {
    let harness = Harness::new()?;
    assert_eq!(harness.gateway.submit(Command::Shutdown, false, None)?, None);

    assert_eq!(harness.gateway.state(), WorkerState::Terminated);
    assert!(harness.debugger.terminated());
    harness.gateway.shutdown()?;
    let result = harness.gateway.refresh();
    assert!(matches!(result, Err(BridgeError::DeadWorker(_))), "{result:?}");

    let harness = Harness::new()?;
    assert_eq!(
        harness.gateway.submit(Command::Shutdown, true, None)?,
        Some(Reply::Done)
    );
    assert!(harness.debugger.terminated());
    Ok(())
}

#[test]
fn full_request_queue_reports_a_dead_worker() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .run_actions(vec![Action::Shell("sleep 0.5".to_string())])?;
    wait_until("worker busy with the shell action", || {
        harness.gateway.state() == WorkerState::Dispatching
    });

    // the default queue holds two requests
    harness.gateway.refresh()?;
    harness.gateway.refresh()?;
    let result = harness.gateway.refresh();
    assert!(matches!(result, Err(BridgeError::DeadWorker(_))), "{result:?}");

    // the worker catches up once the action finishes
    wait_until("room in the request queue", || harness.gateway.refresh().is_ok());
    harness.sync();
    Ok(())
}

#[test]
fn worker_gives_up_after_too_many_idle_timeouts() -> eyre::Result<()> {
    let config = BridgeConfig {
        idle_timeout_ms: 100,
        max_idle_timeouts: 3,
        ..Default::default()
    };
    let started = Instant::now();
    let harness = Harness::with(config, Session::default())?;
    wait_until("worker termination", || {
        harness.gateway.state() == WorkerState::Terminated
    });

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(harness.debugger.terminated());
    let result = harness.gateway.refresh();
    assert!(matches!(result, Err(BridgeError::DeadWorker(_))), "{result:?}");
    Ok(())
}

#[test]
fn zero_idle_timeout_does_not_spin_the_worker_to_death() -> eyre::Result<()> {
    let config = BridgeConfig {
        idle_timeout_ms: 0,
        max_idle_timeouts: 20,
        ..Default::default()
    };
    let harness = Harness::with(config, Session::default())?;
    thread::sleep(Duration::from_millis(500));

    assert_ne!(harness.gateway.state(), WorkerState::Terminated);
    assert!(!harness.debugger.terminated());
    harness.sync();
    Ok(())
}

#[test]
fn dropping_the_gateway_stops_the_worker() -> eyre::Result<()> {
    let Harness {
        gateway, debugger, ..
    } = Harness::new()?;
    drop(gateway);
    assert!(debugger.terminated());
    Ok(())
}

#[test]
fn launch_stops_at_breakpoint() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness.debugger.set_launch_stdout("hello from a.out\n");
    let buffer = harness.stopped_at_breakpoint();

    // the breakpoint marker yields to the program counter on the same line
    let placed: Vec<_> = harness.editor.placed().into_values().collect();
    assert_eq!(placed, vec![(MarkerStyle::PcSelected, buffer, 10)]);
    assert_eq!(harness.editor.jumps().len(), 1);

    let breakpoints = harness.editor.pane_lines(Pane::Breakpoints);
    assert_eq!(breakpoints.len(), 2, "{breakpoints:?}");
    assert!(breakpoints[1].contains("file = '/src/a.c', line = 10"));

    wait_until("debuggee output in log", || {
        harness.log().contains(&"hello from a.out".to_string())
    });
    let log = harness.log();
    assert!(log.contains(&"→(lldb-bp) /src/a.c:10".to_string()), "{log:?}");
    assert!(log.contains(&"→(lldb) process launch".to_string()), "{log:?}");
    Ok(())
}

#[test]
fn refresh_without_changes_touches_nothing() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness.debugger.set_launch_stdout("ready\n");
    harness.stopped_at_breakpoint();
    wait_until("debuggee output in log", || {
        harness.log().contains(&"ready".to_string())
    });

    harness.sync();
    harness.editor.clear();
    harness.sync();
    assert_eq!(harness.editor.calls(), Vec::new());
    Ok(())
}

#[test]
fn breakpoint_marker_returns_when_program_counter_moves() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let buffer = harness.stopped_at_breakpoint();

    harness.debugger.stop_at("/src/a.c", 11);
    wait_until("program counter on line 11", || {
        harness
            .editor
            .placed()
            .values()
            .any(|placed| *placed == (MarkerStyle::PcSelected, buffer, 11))
    });

    let mut placed: Vec<_> = harness.editor.placed().into_values().collect();
    placed.sort_by_key(|(_, _, line)| *line);
    assert_eq!(
        placed,
        vec![
            (MarkerStyle::Breakpoint, buffer, 10),
            (MarkerStyle::PcSelected, buffer, 11),
        ]
    );
    assert_eq!(harness.editor.jumps().len(), 2);
    Ok(())
}

#[test]
fn toggle_breakpoint_sets_then_deletes() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let buffer = harness.editor.add_file("/src/b.c");
    harness.exec("target create /bin/b.out");

    let toggle = Command::ToggleBreakpoint { buffer, line: 7 };
    assert_eq!(harness.call(toggle.clone()), Reply::Success(true));
    let placed: Vec<_> = harness.editor.placed().into_values().collect();
    assert_eq!(placed, vec![(MarkerStyle::Breakpoint, buffer, 7)]);

    assert_eq!(harness.call(toggle), Reply::Success(true));
    assert!(harness.editor.placed().is_empty());
    assert_eq!(
        harness.debugger.history().last().map(String::as_str),
        Some("breakpoint delete 1")
    );
    Ok(())
}

#[test]
fn breakpoints_need_a_single_target() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let set = Command::SetBreakpoint {
        path: "/src/a.c".into(),
        line: 3,
    };

    assert_eq!(harness.call(set.clone()), Reply::Success(false));
    let statuses = harness.editor.statuses();
    assert_eq!(
        statuses.last(),
        Some(&(
            "No target to set a breakpoint on!".to_string(),
            Severity::Warning
        ))
    );

    harness.exec("target create /bin/a.out");
    harness.debugger.add_extra_target();
    match harness.call(set) {
        Reply::Aborted(message) => assert!(message.contains("2 targets"), "{message}"),
        other => panic!("unexpected reply {other:?}"),
    }
    Ok(())
}

#[test]
fn breakpoint_on_a_target_the_worker_has_not_seen() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let buffer = harness.editor.add_file("/src/a.c");
    harness.debugger.create_target("/bin/a.out");

    let reply = harness.call(Command::SetBreakpoint {
        path: "/src/a.c".into(),
        line: 4,
    });
    assert_eq!(reply, Reply::Success(true));
    let placed: Vec<_> = harness.editor.placed().into_values().collect();
    assert_eq!(placed, vec![(MarkerStyle::Breakpoint, buffer, 4)]);
    Ok(())
}

#[test]
fn noisy_process_is_interrupted_then_killed() -> eyre::Result<()> {
    let config = BridgeConfig {
        flood: FloodLimits {
            max_line_bytes: 1024,
            max_lines: 3,
            max_interrupts: 2,
            read_chunk: 1024,
        },
        ..Default::default()
    };
    let harness = Harness::with(config, Session::default())?;
    harness.debugger.ignore_interrupts();
    harness.exec("target create /bin/spam");
    harness.exec("process launch");
    harness.sync();

    let burst = "spam\n".repeat(4);
    harness.debugger.emit_stdout(&burst);
    wait_until("first interrupt", || harness.debugger.interrupts() == 1);
    harness.debugger.emit_stdout(&burst);
    wait_until("second interrupt", || harness.debugger.interrupts() == 2);
    harness.debugger.emit_stdout(&burst);
    wait_until("kill", || harness.debugger.kills() == 1);

    assert_eq!(harness.debugger.interrupts(), 2);
    wait_until("kill message", || {
        harness
            .log()
            .contains(&"✗SIGSTOP limit exceeded! Sent SIGKILL!".to_string())
    });
    let log = harness.log();
    let warnings = log
        .iter()
        .filter(|line| line.as_str() == "✗Output limits exceeded! Sent SIGSTOP!")
        .count();
    assert_eq!(warnings, 2);

    // a new process starts with a clean slate
    harness.exec("process launch");
    harness.debugger.emit_stdout(&burst);
    wait_until("interrupt of new process", || harness.debugger.interrupts() == 3);
    assert_eq!(harness.debugger.kills(), 1);
    Ok(())
}

#[test]
fn modes_run_teardown_before_setup() -> eyre::Result<()> {
    let session = session::from_str(
        r#"{
            "modes": {
                "first": {
                    "setup": [["lldb", "target create /bin/first"]],
                    "teardown": [["lldb", "target delete"]]
                },
                "second": {
                    "setup": [["lldb", "target create /bin/second"], ["bp", "/src/second.c:4"]]
                }
            }
        }"#,
    )?;
    let harness = Harness::with(BridgeConfig::default(), session)?;
    let buffer = harness.editor.add_file("/src/second.c");

    assert_eq!(
        harness.gateway.modes()?,
        vec!["first".to_string(), "second".to_string()]
    );
    assert_eq!(
        harness.call(Command::EnterMode("first".to_string())),
        Reply::Success(true)
    );
    assert_eq!(
        harness.call(Command::EnterMode("second".to_string())),
        Reply::Success(true)
    );

    assert_eq!(
        harness.debugger.history(),
        vec![
            "target create /bin/first".to_string(),
            "target delete".to_string(),
            "target create /bin/second".to_string(),
        ]
    );
    let placed: Vec<_> = harness.editor.placed().into_values().collect();
    assert_eq!(placed, vec![(MarkerStyle::Breakpoint, buffer, 4)]);

    assert_eq!(
        harness.call(Command::EnterMode("third".to_string())),
        Reply::Success(false)
    );
    Ok(())
}

#[test]
fn action_batch_reconciles_the_editor_once() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let buffer = harness.editor.add_file("/src/a.c");
    harness.sync();
    harness.editor.clear();

    let reply = harness.call(Command::RunActions(vec![
        Action::Debugger("target create /bin/a.out".to_string()),
        Action::Breakpoint {
            path: "/src/a.c".into(),
            line: 10,
        },
        Action::Breakpoint {
            path: "/src/a.c".into(),
            line: 12,
        },
    ]));
    assert_eq!(reply, Reply::Success(true));

    let calls = harness.editor.calls();
    let last_log = calls
        .iter()
        .rposition(|call| matches!(call, EditorCall::AppendLines { .. }))
        .ok_or_else(|| eyre::eyre!("nothing logged: {calls:?}"))?;
    let mut replaced = Vec::new();
    let mut placed = Vec::new();
    for (index, call) in calls.iter().enumerate() {
        match call {
            EditorCall::ReplaceLines { buffer, .. } => replaced.push((index, *buffer)),
            EditorCall::PlaceMarker { style, line, .. } => placed.push((index, *style, *line)),
            _ => {}
        }
    }

    // nothing is drawn while the actions run
    assert!(!replaced.is_empty(), "{calls:?}");
    assert!(replaced.iter().all(|(index, _)| *index > last_log), "{calls:?}");
    assert!(placed.iter().all(|(index, ..)| *index > last_log), "{calls:?}");

    // each pane is written once
    let mut buffers: Vec<_> = replaced.iter().map(|(_, buffer)| *buffer).collect();
    buffers.sort();
    buffers.dedup();
    assert_eq!(buffers.len(), replaced.len(), "{calls:?}");

    let mut lines: Vec<_> = placed.iter().map(|(_, style, line)| (*style, *line)).collect();
    lines.sort_by_key(|(_, line)| *line);
    assert_eq!(
        lines,
        vec![(MarkerStyle::Breakpoint, 10), (MarkerStyle::Breakpoint, 12)]
    );
    let markers: Vec<_> = harness.editor.placed().into_values().collect();
    assert!(markers.iter().all(|(_, b, _)| *b == buffer), "{markers:?}");
    Ok(())
}

#[test]
fn failing_action_stops_the_batch() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let reply = harness.call(Command::RunActions(vec![
        Action::Shell("exit 3".to_string()),
        Action::Debugger("target create /bin/a.out".to_string()),
    ]));
    assert_eq!(reply, Reply::Success(false));
    assert!(harness.debugger.history().is_empty());
    assert!(harness.log().contains(&"→(sh) exit 3".to_string()));
    Ok(())
}

#[test]
fn completion_of_command_names() -> eyre::Result<()> {
    let harness = Harness::new()?;
    assert_eq!(
        harness.gateway.complete("br", "br", 2)?,
        vec!["breakpoint".to_string()]
    );
    assert_eq!(
        harness.gateway.complete("", "breakpoint ", 11)?,
        Vec::<String>::new()
    );
    Ok(())
}

#[test]
fn stdin_needs_a_process() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness.call(Command::PutStdin("input\n".to_string()));
    assert!(
        harness
            .editor
            .statuses()
            .contains(&("No active process!".to_string(), Severity::Warning))
    );

    harness.exec("target create /bin/a.out");
    harness.exec("process launch");
    harness.call(Command::PutStdin("input\n".to_string()));
    assert_eq!(harness.debugger.stdin(), "input\n");
    Ok(())
}

#[test]
fn disassemble_changes_the_pane_command() -> eyre::Result<()> {
    let harness = Harness::new()?;
    harness.stopped_at_breakpoint();

    assert_eq!(harness.exec("disassemble -c 5"), Reply::Done);
    assert!(harness.editor.opened().contains(&Pane::Disassembly));
    assert_eq!(harness.call(Command::ToggleBacktraceAll), Reply::Done);
    let history = harness.debugger.history();
    assert!(!history.iter().any(|c| c.starts_with("disassemble")), "{history:?}");

    let lines = harness.editor.pane_lines(Pane::Backtrace);
    assert!(lines.iter().any(|line| line.contains("thread #1")), "{lines:?}");
    Ok(())
}

#[test]
fn source_map_redirects_markers() -> eyre::Result<()> {
    let harness = Harness::new()?;
    let buffer = harness.editor.add_file("/home/me/src/a.c");
    harness.exec("target create /bin/a.out");
    harness.exec("settings set target.source-map /build /home/me");
    harness.call(Command::SetBreakpoint {
        path: "/build/src/a.c".into(),
        line: 5,
    });

    let placed: Vec<_> = harness.editor.placed().into_values().collect();
    assert_eq!(placed, vec![(MarkerStyle::Breakpoint, buffer, 5)]);
    assert!(harness.editor.lookups(Path::new("/build/src/a.c")) == 0);
    Ok(())
}
