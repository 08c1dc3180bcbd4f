mod support;

use std::collections::BTreeSet;

use cadence_core::model::chrono::TimeDelta;
use cadence_core::model::{
    CompletedExecutionInstruction, GroupMatcher, JobDetail, JobKey, Trigger, TriggerKey,
    TriggerStatus,
};
use cadence_core::JobStore;

use support::{
    acquire_due, base_time, every_minute, exclusive_job, job, once, single_node, tkey,
};

fn in_group(trigger: Trigger, group: &str) -> Trigger {
    Trigger {
        key: TriggerKey::new(trigger.key.name(), group),
        ..trigger
    }
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let node = single_node().await;
    let start = base_time() + TimeDelta::seconds(5);
    node.store
        .store_job_and_trigger(job("report"), every_minute("t1", "report", start))
        .await
        .expect("store");

    node.store.pause_trigger(&tkey("t1")).await.expect("pause");
    assert_eq!(
        node.store.trigger_state(&tkey("t1")).await.expect("state"),
        TriggerStatus::Paused
    );
    assert!(acquire_due(&node).await.is_empty());

    node.store.resume_trigger(&tkey("t1")).await.expect("resume");
    assert_eq!(
        node.store.trigger_state(&tkey("t1")).await.expect("state"),
        TriggerStatus::Normal
    );
    let trigger = node
        .store
        .retrieve_trigger(&tkey("t1"))
        .await
        .expect("retrieve")
        .expect("trigger exists");
    assert_eq!(trigger.next_fire_time, Some(start));
    assert_eq!(acquire_due(&node).await.len(), 1);
}

#[tokio::test]
async fn pausing_a_completed_trigger_is_a_no_op() {
    let node = single_node().await;
    node.store
        .store_job_and_trigger(job("report").durable(true), once("t1", "report", base_time()))
        .await
        .expect("store");
    let acquired = acquire_due(&node).await;
    let outcomes = node.store.triggers_fired(&acquired).await.expect("fire");
    let bundle = outcomes[0].bundle().expect("bundle");
    node.store
        .triggered_job_complete(
            &bundle.trigger,
            &bundle.job,
            CompletedExecutionInstruction::SetTriggerComplete,
        )
        .await
        .expect("complete");

    node.store.pause_trigger(&tkey("t1")).await.expect("pause");
    assert_eq!(
        node.store.trigger_state(&tkey("t1")).await.expect("state"),
        TriggerStatus::Complete
    );
}

#[tokio::test]
async fn group_pause_reports_the_matched_groups() {
    let node = single_node().await;
    let now = base_time();
    node.store
        .store_jobs_and_triggers(
            vec![(
                job("report"),
                vec![
                    in_group(once("a", "report", now), "nightly"),
                    in_group(once("b", "report", now), "nightly-extra"),
                    in_group(once("c", "report", now), "hourly"),
                ],
            )],
            false,
        )
        .await
        .expect("store");

    let paused = node
        .store
        .pause_triggers(&GroupMatcher::group_starts_with("nightly"))
        .await
        .expect("pause");
    assert_eq!(
        paused,
        BTreeSet::from(["nightly".to_string(), "nightly-extra".to_string()])
    );
    assert_eq!(node.store.paused_trigger_groups().await.expect("groups"), paused);
    assert_eq!(
        node.store
            .trigger_state(&TriggerKey::new("c", "hourly"))
            .await
            .expect("state"),
        TriggerStatus::Normal
    );

    let resumed = node
        .store
        .resume_triggers(&GroupMatcher::group_equals("nightly"))
        .await
        .expect("resume");
    assert_eq!(resumed, BTreeSet::from(["nightly".to_string()]));
    assert_eq!(
        node.store.paused_trigger_groups().await.expect("groups"),
        BTreeSet::from(["nightly-extra".to_string()])
    );
}

#[tokio::test]
async fn job_pause_covers_every_trigger_of_the_job() {
    let node = single_node().await;
    let now = base_time();
    let etl = JobDetail {
        key: JobKey::new("etl", "batch"),
        ..job("etl")
    };
    let etl_triggers = vec![
        Trigger {
            job_key: etl.key.clone(),
            ..once("t1", "etl", now)
        },
        Trigger {
            job_key: etl.key.clone(),
            ..once("t2", "etl", now)
        },
    ];
    node.store
        .store_jobs_and_triggers(
            vec![
                (etl, etl_triggers),
                (job("report"), vec![once("t3", "report", now)]),
            ],
            false,
        )
        .await
        .expect("store");

    let groups = node
        .store
        .pause_jobs(&GroupMatcher::group_equals("batch"))
        .await
        .expect("pause jobs");
    assert_eq!(groups, BTreeSet::from(["batch".to_string()]));
    for key in ["t1", "t2"] {
        assert_eq!(
            node.store.trigger_state(&tkey(key)).await.expect("state"),
            TriggerStatus::Paused
        );
    }
    assert_eq!(
        node.store.trigger_state(&tkey("t3")).await.expect("state"),
        TriggerStatus::Normal
    );

    node.store
        .resume_job(&JobKey::new("etl", "batch"))
        .await
        .expect("resume job");
    assert_eq!(acquire_due(&node).await.len(), 3);
}

#[tokio::test]
async fn pause_all_and_resume_all() {
    let node = single_node().await;
    let now = base_time();
    node.store
        .store_jobs_and_triggers(
            vec![(
                job("report"),
                vec![once("t1", "report", now), once("t2", "report", now)],
            )],
            false,
        )
        .await
        .expect("store");

    node.store.pause_all().await.expect("pause all");
    assert_eq!(
        node.store.paused_trigger_groups().await.expect("groups"),
        BTreeSet::from(["DEFAULT".to_string()])
    );
    assert!(acquire_due(&node).await.is_empty());

    node.store.resume_all().await.expect("resume all");
    assert!(
        node.store
            .paused_trigger_groups()
            .await
            .expect("groups")
            .is_empty()
    );
    assert_eq!(acquire_due(&node).await.len(), 2);
}

#[tokio::test]
async fn blocked_trigger_round_trips_through_pause() {
    let node = single_node().await;
    let now = base_time();
    node.store
        .store_jobs_and_triggers(
            vec![(
                exclusive_job("exclusive"),
                vec![
                    every_minute("t1", "exclusive", now + TimeDelta::seconds(1)),
                    every_minute("t2", "exclusive", now + TimeDelta::seconds(2)),
                ],
            )],
            false,
        )
        .await
        .expect("store");

    let acquired = acquire_due(&node).await;
    let outcomes = node.store.triggers_fired(&acquired).await.expect("fire");
    let bundle = outcomes[0].bundle().expect("bundle").clone();
    assert_eq!(bundle.trigger.key, tkey("t1"));
    assert_eq!(
        node.store.trigger_state(&tkey("t2")).await.expect("state"),
        TriggerStatus::Blocked
    );

    node.store.pause_trigger(&tkey("t2")).await.expect("pause");
    assert_eq!(
        node.store.trigger_state(&tkey("t2")).await.expect("state"),
        TriggerStatus::Paused
    );

    node.store.resume_trigger(&tkey("t2")).await.expect("resume");
    assert_eq!(
        node.store.trigger_state(&tkey("t2")).await.expect("state"),
        TriggerStatus::Blocked
    );
    assert!(acquire_due(&node).await.is_empty());

    node.store
        .triggered_job_complete(&bundle.trigger, &bundle.job, CompletedExecutionInstruction::Noop)
        .await
        .expect("complete");
    assert_eq!(
        node.store.trigger_state(&tkey("t2")).await.expect("state"),
        TriggerStatus::Normal
    );
}
