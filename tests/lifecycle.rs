//! Lifecycle integration tests: open, quit, and their failure paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use imgd::engine::EngineError;
use imgd::service::{Lifecycle, ServiceError};
use imgd::Service;

mod common;

#[tokio::test]
async fn test_open_serves_and_quit_closes() {
    let service = Arc::new(Service::new(common::test_config()).unwrap());
    service.get("/ping", vec![common::ok_handler("pong")]);

    let (addr, task) = common::open_service(&service).await;
    assert_eq!(service.state(), Lifecycle::Open);
    assert_eq!(service.local_addr(), Some(addr));

    let res = common::client()
        .get(format!("http://{}/ping", addr))
        .send()
        .await
        .expect("Service unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "pong");

    service.quit().await.expect("Idle quit should be clean");
    assert_eq!(service.state(), Lifecycle::Closed);
    task.await.unwrap().expect("Serving should end cleanly");
    assert_eq!(service.local_addr(), None);
}

#[tokio::test]
async fn test_graceful_quit_waits_for_in_flight_work() {
    let mut config = common::test_config();
    config.quit_timeout = 2_000;
    let service = Arc::new(Service::new(config).unwrap());
    service.get(
        "/slow",
        vec![common::sleeping_handler(Duration::from_millis(400), "done")],
    );

    let (addr, task) = common::open_service(&service).await;

    let request = tokio::spawn({
        let client = common::client();
        let url = format!("http://{}/slow", addr);
        async move { client.get(&url).send().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    service
        .quit()
        .await
        .expect("Quit should wait out in-flight work");
    let waited = started.elapsed();

    let res = request
        .await
        .unwrap()
        .expect("In-flight request should still get its response");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "done");

    assert!(
        waited >= Duration::from_millis(200),
        "Quit returned before the in-flight request finished ({waited:?})"
    );
    assert!(
        waited < Duration::from_millis(2_000),
        "Quit should finish well inside the grace period ({waited:?})"
    );
    task.await.unwrap().expect("Serving should end cleanly");
}

#[tokio::test]
async fn test_concurrent_quit_joins_the_drain() {
    let mut config = common::test_config();
    config.quit_timeout = 2_000;
    let service = Arc::new(Service::new(config).unwrap());
    service.get(
        "/slow",
        vec![common::sleeping_handler(Duration::from_millis(400), "done")],
    );

    let (addr, task) = common::open_service(&service).await;

    let request = tokio::spawn({
        let client = common::client();
        let url = format!("http://{}/slow", addr);
        async move { client.get(&url).send().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (first, second) = tokio::join!(service.quit(), service.quit());
    first.expect("First quit should drain cleanly");
    second.expect("Second quit should join the same drain");
    assert_eq!(service.state(), Lifecycle::Closed);

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_quit_times_out_and_forces_close() {
    let mut config = common::test_config();
    config.quit_timeout = 300;
    let service = Arc::new(Service::new(config).unwrap());
    service.get(
        "/stuck",
        vec![common::sleeping_handler(Duration::from_secs(30), "never")],
    );

    let (addr, task) = common::open_service(&service).await;

    let request = tokio::spawn({
        let client = common::client();
        let url = format!("http://{}/stuck", addr);
        async move { client.get(&url).send().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let err = service.quit().await.expect_err("Quit should time out");
    assert!(
        matches!(err, ServiceError::QuitTimeout(grace) if grace == Duration::from_millis(300)),
        "Unexpected quit error: {err}"
    );
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "Force close should not wait for stuck work"
    );
    assert_eq!(service.state(), Lifecycle::Closed);

    let res = request.await.unwrap();
    assert!(res.is_err(), "Abandoned request should not get a response");
    task.await
        .unwrap()
        .expect("Engine should stop after force close");
}

#[tokio::test]
async fn test_second_open_is_rejected() {
    let service = Arc::new(Service::new(common::test_config()).unwrap());
    let (_addr, task) = common::open_service(&service).await;

    let err = service
        .open()
        .await
        .expect_err("Second open must be rejected");
    assert!(matches!(
        err,
        ServiceError::State {
            op: "open",
            state: Lifecycle::Open
        }
    ));

    service.quit().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_closed_is_terminal() {
    let service = Arc::new(Service::new(common::test_config()).unwrap());
    let (_addr, task) = common::open_service(&service).await;
    service.quit().await.unwrap();
    task.await.unwrap().unwrap();

    let err = service
        .open()
        .await
        .expect_err("Closed service must not reopen");
    assert!(matches!(
        err,
        ServiceError::State {
            op: "open",
            state: Lifecycle::Closed
        }
    ));

    let err = service
        .quit()
        .await
        .expect_err("Closed service must not quit again");
    assert!(matches!(
        err,
        ServiceError::State {
            op: "quit",
            state: Lifecycle::Closed
        }
    ));
}

#[tokio::test]
async fn test_bind_failure_leaves_service_retryable() {
    let occupant = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = occupant.local_addr().unwrap();

    let mut config = common::test_config();
    config.address = taken.to_string();
    let service = Arc::new(Service::new(config).unwrap());
    service.get("/ping", vec![common::ok_handler("pong")]);

    let err = service
        .open()
        .await
        .expect_err("Bind to an occupied port must fail");
    assert!(matches!(err, ServiceError::Engine(EngineError::Bind { .. })));
    assert_eq!(service.state(), Lifecycle::Created);
    assert_eq!(service.local_addr(), None);

    // Routes survive the failed attempt; the same service opens once
    // the port frees up.
    drop(occupant);
    let (addr, task) = common::open_service(&service).await;
    let res = common::client()
        .get(format!("http://{}/ping", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    service.quit().await.unwrap();
    task.await.unwrap().unwrap();
}
