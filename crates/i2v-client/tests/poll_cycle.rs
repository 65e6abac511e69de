mod common;

use common::{finished_task, waiting_task, Call, FakeApi};
use i2v_client::api::VideoStatus;
use i2v_client::error::ClientError;
use i2v_client::poller::{PollEvent, PollerConfig, TaskPoller};
use i2v_client::render::{row_actions, render_task_list, RowAction};
use i2v_client::task::{Task, TaskId, TaskStatus};
use i2v_client::tree::TaskTree;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(20),
        fetch_retries: 3,
        retry_delay: Duration::from_millis(1),
    }
}

fn poller(api: &Arc<FakeApi>) -> TaskPoller {
    TaskPoller::new(api.clone(), fast_config()).with_api_key("sk-test")
}

fn is_status_check(call: &Call) -> bool {
    matches!(call, Call::CheckVideoStatus(_) | Call::CheckTaskVideo(_))
}

#[tokio::test]
async fn test_completed_and_pending_pair() {
    let mut pending = Task::new(2, TaskStatus::Pending);
    pending.request_id = Some("r1".to_string());
    let api = FakeApi::with_tasks(vec![finished_task(1, "a.mp4"), pending]).shared();
    api.set_video_status("r1", VideoStatus::in_progress());

    let mut rendered = Vec::new();
    let report = poller(&api)
        .cycle_with(|tasks| rendered.push(tasks.to_vec()))
        .await
        .unwrap();

    assert_eq!(report.checked, vec![TaskId::from(2)]);
    assert!(report.updated.is_empty());
    assert!(!report.refetched);
    assert_eq!(api.count(is_status_check), 1);
    assert_eq!(api.calls()[1], Call::CheckVideoStatus("r1".to_string()));

    assert_eq!(rendered.len(), 1);
    let tasks = &rendered[0];
    let rows = TaskTree::build(tasks).rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(render_task_list(tasks).lines().count(), 2);

    for row in rows {
        let preview = row_actions(row.task).contains(&RowAction::Preview);
        assert_eq!(preview, row.task.id == TaskId::from(1));
    }
}

#[tokio::test]
async fn test_finished_video_triggers_one_refetch() {
    let api = FakeApi::with_tasks(vec![waiting_task(5, "req-5"), waiting_task(6, "req-6")]).shared();
    api.set_video_status("req-5", VideoStatus::succeeded("https://cdn.example/5.mp4"));
    api.set_video_status("req-6", VideoStatus::in_progress());

    let mut fetches = 0;
    let report = poller(&api).cycle_with(|_| fetches += 1).await.unwrap();

    assert_eq!(fetches, 2);
    assert!(report.refetched);
    assert_eq!(report.updated, vec![TaskId::from(5)]);
    assert_eq!(api.count(|c| matches!(c, Call::ListTasks)), 2);
    assert!(api.calls().contains(&Call::UpdateVideo(
        TaskId::from(5),
        "https://cdn.example/5.mp4".to_string()
    )));

    let stored = report
        .tasks
        .iter()
        .find(|t| t.id == TaskId::from(5))
        .unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert!(stored.has_video());
}

#[tokio::test]
async fn test_terminal_tasks_never_checked() {
    let mut done = finished_task(1, "a.mp4");
    done.request_id = Some("r-done".to_string());
    let mut failed = Task::new(2, TaskStatus::Failed);
    failed.request_id = Some("r-failed".to_string());
    let api = FakeApi::with_tasks(vec![done, failed]).shared();

    let report = poller(&api).cycle().await.unwrap();

    assert!(report.checked.is_empty());
    assert_eq!(api.count(is_status_check), 0);
    assert_eq!(api.count(|c| matches!(c, Call::ListTasks)), 1);
}

#[tokio::test]
async fn test_failed_check_is_isolated() {
    // no status registered for "lost", so the fake errors on it
    let api = FakeApi::with_tasks(vec![waiting_task(1, "lost"), waiting_task(2, "ok")]).shared();
    api.set_video_status("ok", VideoStatus::succeeded("https://cdn.example/2.mp4"));

    let report = poller(&api).cycle().await.unwrap();

    assert_eq!(report.checked.len(), 2);
    assert_eq!(report.updated, vec![TaskId::from(2)]);
    assert!(report.refetched);
}

#[tokio::test]
async fn test_list_fetch_retries_then_succeeds() {
    let api = FakeApi::with_tasks(vec![finished_task(1, "a.mp4")]).shared();
    api.fail_lists(2);

    let tasks = poller(&api).fetch_with_retry().await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(api.count(|c| matches!(c, Call::ListTasks)), 3);
}

#[tokio::test]
async fn test_list_fetch_gives_up_after_bound() {
    let api = FakeApi::new().shared();
    api.fail_lists(10);

    let err = poller(&api).cycle().await.unwrap_err();

    match err {
        ClientError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, ClientError::Http { status: 503, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(api.count(|c| matches!(c, Call::ListTasks)), 4);
}

#[tokio::test]
async fn test_huge_retry_setting_still_fetches() {
    let api = FakeApi::with_tasks(vec![finished_task(1, "a.mp4")]).shared();
    let config = PollerConfig {
        fetch_retries: u32::MAX,
        ..fast_config()
    };
    let poller = TaskPoller::new(api.clone(), config);

    let tasks = poller.fetch_with_retry().await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(api.count(|c| matches!(c, Call::ListTasks)), 1);
}

#[tokio::test]
async fn test_task_without_request_id_uses_fallback_check() {
    let api = FakeApi::with_tasks(vec![Task::new(8, TaskStatus::GeneratingVideo)]).shared();
    api.complete_on_fallback(8);
    let poller = poller(&api);

    // not picked up by the cycle
    let report = poller.cycle().await.unwrap();
    assert!(report.checked.is_empty());

    let task = api.tasks().remove(0);
    assert!(poller.check_task(&task).await.unwrap());
    assert_eq!(api.count(|c| matches!(c, Call::CheckTaskVideo(_))), 1);
    assert_eq!(api.count(|c| matches!(c, Call::CheckVideoStatus(_))), 0);
    assert!(api.tasks()[0].has_video());
}

#[tokio::test]
async fn test_run_emits_lists_and_reports() {
    let api = FakeApi::with_tasks(vec![waiting_task(3, "req-3")]).shared();
    api.set_video_status("req-3", VideoStatus::in_progress());

    let poller = Arc::new(poller(&api));
    let (mut events, handle) = poller.spawn();

    let mut lists = 0;
    let mut reports = 0;
    while reports < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            PollEvent::Tasks(tasks) => {
                assert_eq!(tasks.len(), 1);
                lists += 1;
            }
            PollEvent::Report(report) => {
                assert_eq!(report.checked, vec![TaskId::from(3)]);
                reports += 1;
            }
            PollEvent::Error(error) => panic!("unexpected error: {error}"),
        }
    }
    assert!(lists >= 2);

    drop(events);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
