//! End-to-end session scenarios against a scripted engine.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use common::{row_text, wait_for, ScriptedEngine};
use stevedore::engine::EngineClient;
use stevedore::services::session::{SessionConfig, SessionController, DEFAULT_DETACH_KEYS};
use stevedore::term::Color;

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

/// A displayed attach session wired to a scripted engine. The returned task
/// is the engine's attach call; it ends when the script sender drops or the
/// session closes its stdin.
async fn attach_session(
    config: SessionConfig,
) -> (
    Arc<SessionController>,
    Arc<ScriptedEngine>,
    mpsc::Sender<Vec<u8>>,
    tokio::task::JoinHandle<()>,
) {
    let (engine, script) = ScriptedEngine::new();
    let controller =
        Arc::new(SessionController::new(engine.clone(), config).expect("controller"));
    controller.set_container_info("c1", "web-1").await;
    let (stdin, ring) = controller.init_attach().await.expect("init");
    let streamer = engine.clone();
    let task = tokio::spawn(async move {
        let _ = streamer
            .attach("c1", Box::new(stdin), ring, DEFAULT_DETACH_KEYS)
            .await;
    });
    controller.display().await.expect("display");
    (controller, engine, script, task)
}

async fn exec_session(
    config: SessionConfig,
) -> (
    Arc<SessionController>,
    Arc<ScriptedEngine>,
    mpsc::Sender<Vec<u8>>,
    tokio::task::JoinHandle<()>,
) {
    let (engine, script) = ScriptedEngine::new();
    let controller =
        Arc::new(SessionController::new(engine.clone(), config).expect("controller"));
    controller.set_container_info("c1", "web-1").await;
    let session_id = engine
        .exec_create("c1", Default::default())
        .await
        .expect("exec_create");
    controller.set_session_id(&session_id).await;
    let (stdin, ring) = controller.init_exec().await.expect("init");
    let streamer = engine.clone();
    let task = tokio::spawn(async move {
        let _ = streamer
            .exec_start(&session_id, Box::new(stdin), ring)
            .await;
    });
    controller.display().await.expect("display");
    (controller, engine, script, task)
}

#[tokio::test]
async fn plain_echo_lands_on_the_grid() {
    let (controller, _engine, script, _task) = attach_session(SessionConfig::default()).await;

    script.send(b"hello\n".to_vec()).await.expect("send");

    let emulator = controller.emulator();
    wait_for(|| row_text(&emulator.snapshot(), 0) == "hello").await;
    // Attach streams get the CRLF rewrite, so the bare newline still homes
    // the cursor.
    let cursor = emulator.snapshot().cursor;
    assert_eq!((cursor.x, cursor.y), (0, 1));

    controller.hide().await;
}

#[tokio::test]
async fn sgr_color_is_applied_and_reverted() {
    let (controller, _engine, script, _task) = attach_session(SessionConfig::default()).await;

    script
        .send(b"\x1b[31mred\x1b[0m ok".to_vec())
        .await
        .expect("send");

    let emulator = controller.emulator();
    wait_for(|| row_text(&emulator.snapshot(), 0) == "red ok").await;

    let snapshot = emulator.snapshot();
    for x in 0..3 {
        assert_eq!(snapshot.cells[0][x].style.fg, Color::Indexed(1));
    }
    assert_eq!(snapshot.cells[0][4].style.fg, Color::Default);

    controller.hide().await;
}

#[tokio::test]
async fn resize_mid_stream_keeps_parsing() {
    let (controller, engine, script, _task) = attach_session(SessionConfig::default()).await;

    script.send(b"before".to_vec()).await.expect("send");
    let emulator = controller.emulator();
    wait_for(|| row_text(&emulator.snapshot(), 0) == "before").await;

    controller.set_tty_size(40, 10).await;
    wait_for(|| engine.container_resizes().contains(&(40, 10))).await;
    assert_eq!(emulator.size(), (40, 10));

    script.send(b"\nafter".to_vec()).await.expect("send");
    wait_for(|| row_text(&emulator.snapshot(), 1) == "after").await;
    // Content from before the resize survives.
    assert_eq!(row_text(&emulator.snapshot(), 0), "before");

    controller.hide().await;
}

#[tokio::test]
async fn detach_sequence_cancels_without_reaching_the_engine() {
    let (controller, engine, _script, _task) = attach_session(SessionConfig::default()).await;

    let cancels = Arc::new(AtomicUsize::new(0));
    let counter = cancels.clone();
    controller
        .set_cancel_handler(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    // A normal keystroke flows through first.
    controller.write_key(&key(KeyCode::Char('a'))).await.expect("write");
    wait_for(|| engine.stdin_bytes() == b"a").await;

    controller.write_key(&ctrl('p')).await.expect("write");
    controller.write_key(&ctrl('q')).await.expect("write");
    controller.write_key(&ctrl('p')).await.expect("write");

    wait_for(|| cancels.load(Ordering::SeqCst) == 1).await;
    // No byte of the matched sequence leaked out.
    assert_eq!(engine.stdin_bytes(), b"a");

    controller.hide().await;
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broken_detach_prefix_is_released_in_order() {
    let (controller, engine, _script, _task) = attach_session(SessionConfig::default()).await;

    controller.write_key(&ctrl('p')).await.expect("write");
    // Nothing reaches the engine while the prefix is held.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(engine.stdin_bytes().is_empty());

    controller.write_key(&key(KeyCode::Char('x'))).await.expect("write");
    wait_for(|| engine.stdin_bytes() == b"\x10x").await;

    controller.hide().await;
}

#[tokio::test]
async fn arrow_keys_encode_as_csi_sequences() {
    let (controller, engine, _script, _task) = attach_session(SessionConfig::default()).await;

    controller.write_key(&key(KeyCode::Up)).await.expect("write");
    wait_for(|| engine.stdin_bytes() == b"\x1b[A").await;

    controller.write_key(&key(KeyCode::Down)).await.expect("write");
    wait_for(|| engine.stdin_bytes() == b"\x1b[A\x1b[B").await;

    controller.hide().await;
}

#[tokio::test]
async fn engine_eof_is_quiet_and_hide_is_idempotent() {
    let (controller, _engine, script, task) = attach_session(SessionConfig::default()).await;

    script.send(b"bye\n".to_vec()).await.expect("send");
    let emulator = controller.emulator();
    wait_for(|| row_text(&emulator.snapshot(), 0) == "bye").await;

    // Container stream ends; the grid keeps its last state.
    drop(script);
    task.await.expect("attach task");
    assert_eq!(row_text(&emulator.snapshot(), 0), "bye");

    controller.hide().await;
    assert!(!controller.is_running());
    // A second hide is a no-op, not a hang or a panic.
    controller.hide().await;
}

#[tokio::test]
async fn hide_unblocks_a_pending_engine_stdin_read() {
    let (controller, _engine, script, task) = attach_session(SessionConfig::default()).await;

    // The engine sits in a stdin read; hide must end it without the script
    // side doing anything.
    controller.hide().await;
    task.await.expect("attach task");
    drop(script);
}

#[tokio::test]
async fn exec_output_is_passed_through_verbatim() {
    let (controller, _engine, script, _task) = exec_session(SessionConfig::default()).await;

    // No CRLF rewrite for exec: a bare newline moves down but keeps the
    // column.
    script.send(b"a\nb".to_vec()).await.expect("send");

    let emulator = controller.emulator();
    wait_for(|| emulator.snapshot().cells[1][1].ch == 'b').await;
    let snapshot = emulator.snapshot();
    assert_eq!(snapshot.cells[0][0].ch, 'a');
    assert_eq!(snapshot.cells[1][0].ch, ' ');

    controller.hide().await;
}

#[tokio::test]
async fn exec_resize_reports_height_first() {
    let (controller, engine, _script, _task) = exec_session(SessionConfig::default()).await;

    controller.set_tty_size(50, 12).await;
    wait_for(|| engine.exec_resizes().contains(&(12, 50))).await;
    assert!(engine.container_resizes().is_empty());

    controller.hide().await;
}

#[tokio::test]
async fn output_chunks_arrive_in_order() {
    let (controller, _engine, script, _task) = attach_session(SessionConfig::default()).await;

    for chunk in [b"12".as_slice(), b"34", b"56"] {
        script.send(chunk.to_vec()).await.expect("send");
    }

    let emulator = controller.emulator();
    wait_for(|| row_text(&emulator.snapshot(), 0) == "123456").await;

    controller.hide().await;
}

#[tokio::test]
async fn zero_sized_resize_is_ignored() {
    let (controller, engine, _script, _task) = attach_session(SessionConfig::default()).await;

    controller.set_tty_size(0, 10).await;
    controller.set_tty_size(10, 0).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(engine.container_resizes().is_empty());
    assert_eq!(controller.emulator().size(), (80, 24));

    controller.hide().await;
}
