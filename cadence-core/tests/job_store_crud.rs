mod support;

use cadence_core::model::chrono::TimeDelta;
use cadence_core::model::{GroupMatcher, JobKey, Schedule, TriggerKey, TriggerStatus};
use cadence_core::store::RecordKind;
use cadence_core::{JobStore, JobStoreError};

use support::{Signal, base_time, every_minute, jkey, job, once, single_node, tkey};

#[tokio::test]
async fn duplicate_job_is_rejected_unless_replacing() {
    let node = single_node().await;
    node.store.store_job(job("report"), false).await.expect("store job");

    let err = node
        .store
        .store_job(job("report"), false)
        .await
        .expect_err("duplicate job");
    assert!(matches!(
        err,
        JobStoreError::ObjectAlreadyExists { kind: RecordKind::Job, .. }
    ));

    let replacement = job("report").with_description("nightly report");
    node.store
        .store_job(replacement, true)
        .await
        .expect("replace job");
    let stored = node
        .store
        .retrieve_job(&jkey("report"))
        .await
        .expect("retrieve job")
        .expect("job exists");
    assert_eq!(stored.description.as_deref(), Some("nightly report"));
    assert_eq!(node.store.number_of_jobs().await.expect("count"), 1);
}

#[tokio::test]
async fn duplicate_trigger_is_rejected_and_new_triggers_start_waiting() {
    let node = single_node().await;
    let trigger = once("t1", "report", base_time() + TimeDelta::minutes(5));
    node.store
        .store_job_and_trigger(job("report"), trigger.clone())
        .await
        .expect("store job and trigger");

    assert_eq!(
        node.store.trigger_state(&tkey("t1")).await.expect("state"),
        TriggerStatus::Normal
    );
    let err = node
        .store
        .store_trigger(trigger, false)
        .await
        .expect_err("duplicate trigger");
    assert!(matches!(
        err,
        JobStoreError::ObjectAlreadyExists { kind: RecordKind::Trigger, .. }
    ));
    assert_eq!(
        node.store.trigger_state(&tkey("missing")).await.expect("state"),
        TriggerStatus::None
    );
}

#[tokio::test]
async fn store_job_and_trigger_is_atomic() {
    let node = single_node().await;
    node.store
        .store_trigger(once("t1", "other", base_time()), false)
        .await
        .expect("store trigger");

    let err = node
        .store
        .store_job_and_trigger(job("report"), once("t1", "report", base_time()))
        .await
        .expect_err("trigger key taken");
    assert!(matches!(err, JobStoreError::ObjectAlreadyExists { .. }));
    assert!(
        !node
            .store
            .check_job_exists(&jkey("report"))
            .await
            .expect("exists")
    );
}

#[tokio::test]
async fn removing_last_trigger_deletes_non_durable_job() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(job("transient"), once("t1", "transient", base_time()))
        .await
        .expect("store transient");
    node.store
        .store_job_and_trigger(
            job("durable").durable(true),
            once("t2", "durable", base_time()),
        )
        .await
        .expect("store durable");
    node.signaler.take();

    assert!(node.store.remove_trigger(&tkey("t1")).await.expect("remove t1"));
    assert!(node.store.remove_trigger(&tkey("t2")).await.expect("remove t2"));

    assert!(
        !node
            .store
            .check_job_exists(&jkey("transient"))
            .await
            .expect("exists")
    );
    assert!(
        node.store
            .check_job_exists(&jkey("durable"))
            .await
            .expect("exists")
    );
    assert_eq!(
        node.signaler.signals(),
        vec![Signal::JobDeleted(jkey("transient"))]
    );
    assert!(!node.store.remove_trigger(&tkey("t1")).await.expect("remove again"));
}

#[tokio::test]
async fn orphan_cleanup_waits_for_the_last_trigger() {
    let node = single_node().await;
    node.store
        .store_jobs_and_triggers(
            vec![(
                job("report"),
                vec![
                    once("t1", "report", base_time()),
                    once("t2", "report", base_time()),
                ],
            )],
            false,
        )
        .await
        .expect("store batch");

    node.store.remove_trigger(&tkey("t1")).await.expect("remove t1");
    assert!(
        node.store
            .check_job_exists(&jkey("report"))
            .await
            .expect("exists")
    );
    node.store.remove_trigger(&tkey("t2")).await.expect("remove t2");
    assert!(
        !node
            .store
            .check_job_exists(&jkey("report"))
            .await
            .expect("exists")
    );
}

#[tokio::test]
async fn remove_job_takes_its_triggers_along() {
    let node = single_node().await;
    node.store
        .store_jobs_and_triggers(
            vec![
                (
                    job("a"),
                    vec![once("a1", "a", base_time()), once("a2", "a", base_time())],
                ),
                (job("b"), vec![once("b1", "b", base_time())]),
            ],
            false,
        )
        .await
        .expect("store batch");

    assert!(node.store.remove_job(&jkey("a")).await.expect("remove a"));
    assert_eq!(node.store.number_of_triggers().await.expect("count"), 1);
    assert!(
        node.store
            .triggers_for_job(&jkey("a"))
            .await
            .expect("triggers")
            .is_empty()
    );

    let all_removed = node
        .store
        .remove_jobs(&[jkey("b"), jkey("never-existed")])
        .await
        .expect("remove jobs");
    assert!(!all_removed);
    assert_eq!(node.store.number_of_jobs().await.expect("count"), 0);
}

#[tokio::test]
async fn replace_trigger_keeps_state_and_checks_the_job() {
    let node = single_node().await;
    node.store
        .store_jobs_and_triggers(
            vec![
                (job("report"), vec![every_minute("t1", "report", base_time())]),
                (job("other"), vec![]),
            ],
            false,
        )
        .await
        .expect("store batch");
    node.store.pause_trigger(&tkey("t1")).await.expect("pause");

    let err = node
        .store
        .replace_trigger(&tkey("t1"), once("t1", "other", base_time()))
        .await
        .expect_err("different job");
    assert!(matches!(err, JobStoreError::Validation(_)));

    let replaced = node
        .store
        .replace_trigger(&tkey("t1"), once("t1b", "report", base_time()))
        .await
        .expect("replace");
    assert!(replaced);
    assert!(
        !node
            .store
            .check_trigger_exists(&tkey("t1"))
            .await
            .expect("exists")
    );
    assert_eq!(
        node.store.trigger_state(&tkey("t1b")).await.expect("state"),
        TriggerStatus::Paused
    );

    let inserted = node
        .store
        .replace_trigger(&tkey("ghost"), once("t9", "report", base_time()))
        .await
        .expect("insert as new");
    assert!(!inserted);
    assert_eq!(
        node.store.trigger_state(&tkey("t9")).await.expect("state"),
        TriggerStatus::Normal
    );
}

#[tokio::test]
async fn job_attributes_survive_storage() {
    let node = single_node().await;
    let detail = job("report")
        .durable(true)
        .requests_recovery(true)
        .persist_data_after_execution(true)
        .with_description("nightly report")
        .with_data("format", "pdf");
    node.store
        .store_job(detail.clone(), false)
        .await
        .expect("store job");

    let stored = node
        .store
        .retrieve_job(&jkey("report"))
        .await
        .expect("retrieve")
        .expect("job exists");
    assert!(stored.requests_recovery);
    assert_eq!(stored, detail);
}

#[tokio::test]
async fn replace_of_a_missing_trigger_keeps_an_existing_new_key() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(job("report"), every_minute("t1", "report", base_time()))
        .await
        .expect("store");
    node.store.pause_trigger(&tkey("t1")).await.expect("pause");

    let err = node
        .store
        .replace_trigger(&tkey("ghost"), once("t1", "report", base_time()))
        .await
        .expect_err("new key already stored");
    assert!(matches!(
        err,
        JobStoreError::ObjectAlreadyExists { kind: RecordKind::Trigger, .. }
    ));

    let kept = node
        .store
        .retrieve_trigger(&tkey("t1"))
        .await
        .expect("retrieve")
        .expect("trigger exists");
    assert_eq!(kept.schedule, Schedule::every(TimeDelta::minutes(1)));
    assert_eq!(
        node.store.trigger_state(&tkey("t1")).await.expect("state"),
        TriggerStatus::Paused
    );
}

#[tokio::test]
async fn group_queries_follow_the_matcher() {
    let node = single_node().await;
    for (name, group) in [("a", "reports"), ("b", "reports-daily"), ("c", "cleanup")] {
        let key = JobKey::new(name, group);
        let detail = job(name);
        let detail = cadence_core::model::JobDetail { key, ..detail }.durable(true);
        node.store.store_job(detail, false).await.expect("store job");
    }
    node.store
        .store_trigger(
            once("t1", "a", base_time()).with_priority(1),
            false,
        )
        .await
        .expect("store trigger");
    let grouped = cadence_core::model::Trigger {
        key: TriggerKey::new("t2", "nightly"),
        ..once("t2", "a", base_time())
    };
    node.store.store_trigger(grouped, false).await.expect("store trigger");

    assert_eq!(
        node.store.job_group_names().await.expect("groups"),
        vec!["cleanup", "reports", "reports-daily"]
    );
    let reports = node
        .store
        .job_keys(&GroupMatcher::group_starts_with("reports"))
        .await
        .expect("job keys");
    assert_eq!(
        reports,
        vec![JobKey::new("a", "reports"), JobKey::new("b", "reports-daily")]
    );
    assert_eq!(
        node.store
            .trigger_keys(&GroupMatcher::group_equals("nightly"))
            .await
            .expect("trigger keys"),
        vec![TriggerKey::new("t2", "nightly")]
    );
    assert_eq!(
        node.store.trigger_group_names().await.expect("groups"),
        vec!["DEFAULT", "nightly"]
    );
}

#[tokio::test]
async fn clear_all_scheduling_data_empties_the_store() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(job("report"), once("t1", "report", base_time()))
        .await
        .expect("store");
    node.store
        .store_calendar(
            "holidays",
            std::sync::Arc::new(cadence_core::HolidayCalendar::new()),
            false,
            false,
        )
        .await
        .expect("store calendar");

    node.store.clear_all_scheduling_data().await.expect("clear");
    assert_eq!(node.store.number_of_jobs().await.expect("jobs"), 0);
    assert_eq!(node.store.number_of_triggers().await.expect("triggers"), 0);
    assert_eq!(node.store.number_of_calendars().await.expect("calendars"), 0);
}
