use futures::future::{BoxFuture, FutureExt};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_dal::{DalError, DalResult, SerializedWriter, WriterState};

type Log = Arc<Mutex<Vec<String>>>;

fn step(
    log: &Log,
    label: &'static str,
    delay_ms: u64,
) -> impl FnOnce() -> BoxFuture<'static, DalResult<&'static str>> + Send + 'static {
    let log = Arc::clone(log);
    move || {
        async move {
            log.lock().unwrap().push(format!("{label} start"));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().unwrap().push(format!("{label} end"));
            Ok(label)
        }
        .boxed()
    }
}

#[tokio::test]
async fn starts_idle() {
    let writer = SerializedWriter::new();
    assert_eq!(writer.state(), WriterState::Idle);
    assert_eq!(writer.queued(), 0);
}

#[tokio::test]
async fn operations_run_one_at_a_time_in_submission_order() {
    let writer = SerializedWriter::new();
    let log: Log = Arc::default();

    let (a, b, c) = tokio::join!(
        writer.submit("A", step(&log, "A", 60)),
        writer.submit("B", step(&log, "B", 5)),
        writer.submit("C", step(&log, "C", 0)),
    );

    assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), ("A", "B", "C"));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["A start", "A end", "B start", "B end", "C start", "C end"]
    );
}

#[tokio::test]
async fn queue_depth_is_visible_while_busy() {
    let writer = SerializedWriter::new();
    let log: Log = Arc::default();

    let slow = tokio::spawn({
        let writer = writer.clone();
        let op = step(&log, "slow", 100);
        async move { writer.submit("slow", op).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(writer.state(), WriterState::Running);

    let queued = tokio::spawn({
        let writer = writer.clone();
        let op = step(&log, "next", 0);
        async move { writer.submit("next", op).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(writer.queued(), 1);

    slow.await.unwrap().unwrap();
    queued.await.unwrap().unwrap();
}

#[tokio::test]
async fn failure_is_delivered_only_to_its_caller() {
    let writer = SerializedWriter::new();
    let log: Log = Arc::default();

    let (failed, next) = tokio::join!(
        writer.submit("broken", || async {
            Err::<(), _>(DalError::ExternalService("boom".into()))
        }),
        writer.submit("next", step(&log, "next", 0)),
    );

    assert!(matches!(failed, Err(DalError::ExternalService(_))));
    assert_eq!(next.unwrap(), "next");
}

#[tokio::test]
async fn panicking_operation_does_not_stop_the_queue() {
    let writer = SerializedWriter::new();

    let panicked = writer
        .submit("panics", || async {
            if true {
                panic!("operation blew up");
            }
            Ok::<_, DalError>(())
        })
        .await;
    assert!(matches!(panicked, Err(DalError::ExternalService(_))));

    let value = writer.submit("after", || async { Ok::<_, DalError>(7) }).await.unwrap();
    assert_eq!(value, 7);
}

#[tokio::test]
async fn operation_that_panics_before_yielding_a_future_is_contained() {
    let writer = SerializedWriter::new();

    let panicked = writer
        .submit("eager", || -> std::future::Ready<DalResult<()>> {
            panic!("setup blew up")
        })
        .await;
    assert!(matches!(panicked, Err(DalError::ExternalService(ref msg)) if msg.contains("eager")));

    let value = writer.submit("after", || async { Ok::<_, DalError>(3) }).await.unwrap();
    assert_eq!(value, 3);
}

#[tokio::test]
async fn clones_share_one_queue() {
    let writer = SerializedWriter::new();
    let other = writer.clone();
    let log: Log = Arc::default();

    let (a, b) = tokio::join!(
        writer.submit("A", step(&log, "A", 30)),
        other.submit("B", step(&log, "B", 0)),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["A start", "A end", "B start", "B end"]
    );
}
