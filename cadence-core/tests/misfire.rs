mod support;

use std::sync::Arc;

use cadence_core::model::chrono::TimeDelta;
use cadence_core::model::{MisfireInstruction, Schedule, Trigger, TriggerStatus};
use cadence_core::{Clock, JobStore, LocalNode, MemoryDocumentStore};

use support::{
    NodeBuilder, Signal, acquire_due, base_time, every_minute, jkey, job, keys, once, single_node,
    test_config, tkey,
};

#[tokio::test]
async fn misfired_repeating_trigger_is_rescheduled_once() {
    let node = single_node().await;
    let start = base_time() - TimeDelta::minutes(10);
    node.store
        .store_job_and_trigger(job("report"), every_minute("t1", "report", start))
        .await
        .expect("store");

    assert!(acquire_due(&node).await.is_empty());
    let rescheduled = node
        .store
        .retrieve_trigger(&tkey("t1"))
        .await
        .expect("retrieve")
        .expect("trigger exists")
        .next_fire_time;
    assert_eq!(rescheduled, Some(base_time() + TimeDelta::minutes(1)));

    // Already rescheduled: a second pass must not report the misfire again.
    assert!(acquire_due(&node).await.is_empty());
    assert_eq!(node.signaler.count(&Signal::Misfired(tkey("t1"))), 1);

    node.clock.advance(TimeDelta::seconds(45));
    assert_eq!(keys(&acquire_due(&node).await), vec!["t1"]);
}

#[tokio::test]
async fn misfired_one_shot_fires_now_on_the_next_pass() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(
            job("report"),
            once("t1", "report", base_time() - TimeDelta::minutes(5)),
        )
        .await
        .expect("store");

    assert!(acquire_due(&node).await.is_empty());
    let trigger = node
        .store
        .retrieve_trigger(&tkey("t1"))
        .await
        .expect("retrieve")
        .expect("trigger exists");
    assert_eq!(trigger.next_fire_time, Some(node.clock.now()));

    assert_eq!(keys(&acquire_due(&node).await), vec!["t1"]);
}

#[tokio::test]
async fn exhausted_trigger_is_finalized_on_misfire() {
    let node = single_node().await;
    let exhausted = Trigger::new(
        tkey("t1"),
        jkey("report"),
        Schedule::repeat(TimeDelta::minutes(1), 2),
        base_time() - TimeDelta::minutes(10),
    );
    node.store
        .store_job_and_trigger(job("report"), exhausted)
        .await
        .expect("store");

    assert!(acquire_due(&node).await.is_empty());
    assert_eq!(
        node.store.trigger_state(&tkey("t1")).await.expect("state"),
        TriggerStatus::Complete
    );
    assert_eq!(
        node.signaler.signals(),
        vec![Signal::Misfired(tkey("t1")), Signal::Finalized(tkey("t1"))]
    );
}

#[tokio::test]
async fn late_but_within_threshold_is_not_a_misfire() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(
            job("report"),
            once("t1", "report", base_time() - TimeDelta::seconds(30)),
        )
        .await
        .expect("store");

    assert_eq!(keys(&acquire_due(&node).await), vec!["t1"]);
    assert!(node.signaler.signals().is_empty());
}

#[tokio::test]
async fn resume_re_evaluates_misfires() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(
            job("report"),
            every_minute("t1", "report", base_time() + TimeDelta::seconds(5))
                .with_misfire_instruction(MisfireInstruction::RescheduleNextWithRemainingCount),
        )
        .await
        .expect("store");
    node.store.pause_trigger(&tkey("t1")).await.expect("pause");

    node.clock.advance(TimeDelta::minutes(30));
    node.store.resume_trigger(&tkey("t1")).await.expect("resume");

    assert_eq!(node.signaler.count(&Signal::Misfired(tkey("t1"))), 1);
    let next = node
        .store
        .retrieve_trigger(&tkey("t1"))
        .await
        .expect("retrieve")
        .expect("trigger exists")
        .next_fire_time
        .expect("next fire time");
    assert!(next > node.clock.now());
}

#[tokio::test]
async fn oversized_misfire_threshold_never_flags_a_misfire() {
    let mut config = test_config();
    config.misfire_threshold_ms = u64::MAX;
    let node = NodeBuilder::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(LocalNode::new("solo")),
    )
    .config(config)
    .start()
    .await;

    let overdue = base_time() - TimeDelta::days(30);
    node.store
        .store_job_and_trigger(job("report"), once("t1", "report", overdue))
        .await
        .expect("store");

    let acquired = acquire_due(&node).await;
    assert_eq!(keys(&acquired), vec!["t1"]);
    assert_eq!(acquired[0].next_fire_time, Some(overdue));
    assert_eq!(node.signaler.count(&Signal::Misfired(tkey("t1"))), 0);
}
