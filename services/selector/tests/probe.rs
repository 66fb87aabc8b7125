//! Scheduler probe tests against a mocked scheduler API.

use servsel_core::{ItemId, ProbeError, SchedulerProbe, TaskId};
use servsel_selector::probe::HttpSchedulerProbe;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn task() -> TaskId {
    TaskId::new("Nightly Build", 3).unwrap()
}

#[tokio::test]
async fn test_running_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/Nightly_Build_num_3/running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"running": true})))
        .expect(1)
        .mount(&server)
        .await;

    // Trailing slash is tolerated.
    let probe = HttpSchedulerProbe::new(format!("{}/", server.uri())).unwrap();
    assert!(probe.is_task_running(&task()).await.unwrap());
}

#[tokio::test]
async fn test_display_name_punctuation_stays_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ci/tasks/nightly_%2342_num_1/running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"running": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ci/tasks/why%3F_num_2/running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"running": true})))
        .expect(1)
        .mount(&server)
        .await;

    let probe = HttpSchedulerProbe::new(format!("{}/ci/", server.uri())).unwrap();
    let hashed = TaskId::new("nightly #42", 1).unwrap();
    let questioned = TaskId::new("why?", 2).unwrap();

    assert!(probe.is_task_running(&hashed).await.unwrap());
    assert!(probe.is_task_running(&questioned).await.unwrap());
}

#[tokio::test]
async fn test_unknown_task_is_not_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/Nightly_Build_num_3/running"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let probe = HttpSchedulerProbe::new(server.uri()).unwrap();
    assert!(!probe.is_task_running(&task()).await.unwrap());
}

#[tokio::test]
async fn test_queue_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"queued": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/queue/8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let probe = HttpSchedulerProbe::new(server.uri()).unwrap();
    assert!(probe.item_still_queued(ItemId::new(7)).await.unwrap());
    assert!(!probe.item_still_queued(ItemId::new(8)).await.unwrap());
}

#[tokio::test]
async fn test_server_error_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/Nightly_Build_num_3/running"))
        .respond_with(ResponseTemplate::new(500).set_body_string("scheduler restarting"))
        .mount(&server)
        .await;

    let probe = HttpSchedulerProbe::new(server.uri()).unwrap();
    match probe.is_task_running(&task()).await.unwrap_err() {
        ProbeError::Unexpected(message) => assert!(message.contains("scheduler restarting")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("yes"))
        .mount(&server)
        .await;

    let probe = HttpSchedulerProbe::new(server.uri()).unwrap();
    assert!(matches!(
        probe.item_still_queued(ItemId::new(1)).await,
        Err(ProbeError::Unexpected(_))
    ));
}

#[tokio::test]
async fn test_unreachable_scheduler_is_unavailable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let probe = HttpSchedulerProbe::new(uri).unwrap();
    assert!(matches!(
        probe.is_task_running(&task()).await,
        Err(ProbeError::Unavailable(_))
    ));
}
