use std::{fs, sync::Arc, time::Duration};

use tempfile::tempdir;
use tokio::task::JoinHandle;

use turn_mcp::{
    bridge::{AgentBridge, WaitOutcome},
    controller::Controller,
    mailbox::{FileMailbox, Mailbox},
    types::{StatusRecord, Submission, CANCELED_SENTINEL},
};

const STEP: Duration = Duration::from_millis(10);

fn bridge(dir: &std::path::Path) -> Arc<AgentBridge<FileMailbox>> {
    Arc::new(AgentBridge::new(FileMailbox::new(dir)).with_poll_interval(STEP))
}

fn spawn_wait(
    bridge: &Arc<AgentBridge<FileMailbox>>,
    context: &'static str,
) -> JoinHandle<String> {
    let bridge = bridge.clone();
    tokio::spawn(async move {
        bridge
            .pause_and_wait(context, None)
            .await
            .expect("wait should complete")
    })
}

/// Tick the controller until `done` holds, failing after two seconds.
async fn tick_until(
    controller: &mut Controller<FileMailbox>,
    mut done: impl FnMut(&Controller<FileMailbox>) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            controller.tick();
            if done(controller) {
                return;
            }
            tokio::time::sleep(STEP).await;
        }
    })
    .await
    .expect("controller did not reach expected state");
}

async fn join(handle: JoinHandle<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("bridge wait timed out")
        .expect("bridge task panicked")
}

#[tokio::test]
async fn submitted_input_reaches_waiting_agent() {
    let dir = tempdir().expect("tempdir");
    let mut controller = Controller::new(FileMailbox::new(dir.path()));
    controller.start();
    let bridge = bridge(dir.path());

    let wait = spawn_wait(&bridge, "refactor done, what next?");
    tick_until(&mut controller, |c| c.status().waiting).await;
    assert_eq!(controller.status().context, "refactor done, what next?");

    assert_eq!(controller.submit_input("add tests"), Submission::Delivered);
    assert_eq!(join(wait).await, "add tests");

    tick_until(&mut controller, |c| !c.status().waiting).await;
    assert!(!controller.is_sending());
    assert!(!FileMailbox::new(dir.path()).input_path().exists());
}

#[tokio::test]
async fn queued_messages_are_delivered_one_per_wait() {
    let dir = tempdir().expect("tempdir");
    let mut controller = Controller::new(FileMailbox::new(dir.path()));
    controller.start();
    controller.add_to_queue("msg1");
    controller.add_to_queue("msg2");
    let bridge = bridge(dir.path());

    let first = spawn_wait(&bridge, "step one");
    tick_until(&mut controller, |c| c.status().waiting).await;
    assert_eq!(controller.queue(), vec!["msg2"]);
    assert_eq!(join(first).await, "msg1");
    tick_until(&mut controller, |c| !c.status().waiting).await;

    let second = spawn_wait(&bridge, "step two");
    tick_until(&mut controller, |c| c.status().waiting).await;
    assert!(controller.queue().is_empty());
    assert_eq!(join(second).await, "msg2");
}

#[tokio::test]
async fn cancel_releases_agent_with_sentinel() {
    let dir = tempdir().expect("tempdir");
    let mut controller = Controller::new(FileMailbox::new(dir.path()));
    controller.start();
    let bridge = bridge(dir.path());

    let wait = spawn_wait(&bridge, "needs a decision");
    tick_until(&mut controller, |c| c.status().waiting).await;

    assert!(controller.clear_waiting());
    assert!(!controller.status().waiting);
    assert_eq!(join(wait).await, CANCELED_SENTINEL);

    let record = FileMailbox::new(dir.path())
        .read_status()
        .expect("finished record");
    assert!(!record.waiting);
}

#[test]
fn cancel_discards_undelivered_input() {
    let dir = tempdir().expect("tempdir");
    let mailbox = FileMailbox::new(dir.path());
    let mut controller = Controller::new(FileMailbox::new(dir.path()));
    let bridge = AgentBridge::new(FileMailbox::new(dir.path()));

    mailbox
        .write_status(&StatusRecord::waiting("ctx", None))
        .expect("status");
    controller.tick();
    assert_eq!(controller.submit_input("late"), Submission::Delivered);
    assert!(controller.clear_waiting());

    assert_eq!(bridge.poll_once(), Some(WaitOutcome::Canceled));
    assert!(!mailbox.input_path().exists());
}

#[test]
fn start_discards_previous_session_artifacts() {
    let dir = tempdir().expect("tempdir");
    let mailbox = FileMailbox::new(dir.path());
    mailbox
        .write_status(&StatusRecord::waiting("stale", None))
        .expect("status");
    mailbox.write_input("stale input").expect("input");

    let mut controller = Controller::new(FileMailbox::new(dir.path()));
    controller.add_to_queue("kept");
    controller.start();

    assert!(!mailbox.status_path().exists());
    assert!(!mailbox.input_path().exists());
    assert_eq!(controller.queue(), vec!["kept"]);

    controller.tick();
    assert!(!controller.status().waiting);
}

#[test]
fn malformed_status_is_ignored_by_both_sides() {
    let dir = tempdir().expect("tempdir");
    let mailbox = FileMailbox::new(dir.path());
    let mut controller = Controller::new(FileMailbox::new(dir.path()));
    controller.start();
    fs::create_dir_all(dir.path()).expect("dir");
    fs::write(mailbox.status_path(), "{ not json").expect("write");
    mailbox.write_input("pending").expect("input");
    controller.tick();
    assert!(!controller.status().waiting);

    let bridge = AgentBridge::new(FileMailbox::new(dir.path()));
    assert_eq!(bridge.poll_once(), None);
    assert_eq!(mailbox.read_input().as_deref(), Some("pending"));
}
