//! Tests for drain eligibility
//!
//! These tests verify:
//! - Job pods block before any other rule
//! - The drain filter rules in fast and detailed mode
//! - Disruption budget enforcement on movable pods

use super::*;
use crate::listers::{ControllerReplicas, StaticListers};
use crate::models::pod_name;
use chrono::{Duration, TimeZone};
use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, PodSpec, PodStatus, Volume};
use k8s_openapi::api::policy::v1::{PodDisruptionBudgetSpec, PodDisruptionBudgetStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta, OwnerReference, Time,
};
use std::collections::BTreeMap;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn pod(namespace: &str, name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some("node-1".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn owned_by(mut pod: Pod, api_version: &str, kind: &str, name: &str) -> Pod {
    pod.metadata.owner_references = Some(vec![OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        controller: Some(true),
        ..Default::default()
    }]);
    pod
}

fn replicated(namespace: &str, name: &str) -> Pod {
    owned_by(pod(namespace, name), "apps/v1", "ReplicaSet", "web-rs")
}

fn with_labels(mut pod: Pod, labels: &[(&str, &str)]) -> Pod {
    pod.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    pod
}

fn with_annotation(mut pod: Pod, key: &str, value: &str) -> Pod {
    pod.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    pod
}

fn pdb(namespace: &str, app: &str, allowed: i32) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(format!("{}-pdb", app)),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: Some(PodDisruptionBudgetStatus {
            disruptions_allowed: allowed,
            ..Default::default()
        }),
    }
}

fn reason(err: &DrainError) -> BlockingPodReason {
    err.blocking_pod().expect("expected a blocking pod").reason
}

mod job_tests {
    use super::*;

    #[test]
    fn test_job_pod_blocks_regardless_of_budgets() {
        let job = owned_by(pod("ns", "job-1"), "batch/v1", "Job", "nightly");
        let web = with_labels(replicated("ns", "web-1"), &[("app", "x")]);

        for budgets in [vec![], vec![pdb("ns", "x", 5)], vec![pdb("ns", "x", 0)]] {
            let err = DrainEvaluator::default()
                .pods_to_move(&[web.clone(), job.clone()], DrainMode::Fast, &budgets, now())
                .unwrap_err();
            assert_eq!(reason(&err), BlockingPodReason::UnreplicatedController);
            assert_eq!(pod_name(&err.blocking_pod().unwrap().pod), "job-1");
            assert_eq!(err.to_string(), "job pod ns/job-1 is unmovable");
        }
    }

    #[test]
    fn test_job_check_precedes_detailed_lookups() {
        let listers = StaticListers::default();
        let pods = [
            replicated("ns", "orphan"),
            owned_by(pod("ns", "job-1"), "batch/v1beta1", "Job", "nightly"),
        ];
        let err = DrainEvaluator::default()
            .pods_to_move(
                &pods,
                DrainMode::Detailed {
                    listers: &listers,
                    min_replica_count: 0,
                },
                &[],
                now(),
            )
            .unwrap_err();

        assert_eq!(reason(&err), BlockingPodReason::UnreplicatedController);
        assert_eq!(pod_name(&err.blocking_pod().unwrap().pod), "job-1");
    }

    #[test]
    fn test_non_batch_job_kind_is_not_a_batch_pod() {
        let pods = [owned_by(pod("ns", "custom"), "example.com/v1", "Job", "x")];
        assert!(check_job_pods(&pods).is_ok());

        let err = DrainEvaluator::default()
            .pods_to_move(&[pod("ns", "bare")], DrainMode::Fast, &[], now())
            .unwrap_err();
        assert_eq!(err.to_string(), "ns/bare is not replicated");
    }
}

mod filter_tests {
    use super::*;

    #[test]
    fn test_movable_pods_keep_input_order() {
        let pods = [
            replicated("default", "b"),
            owned_by(pod("default", "ds"), "apps/v1", "DaemonSet", "fluentd"),
            with_annotation(pod("default", "mirror"), MIRROR_POD_ANNOTATION, "abc"),
            replicated("default", "a"),
        ];
        let movable = DrainEvaluator::default()
            .pods_to_move(&pods, DrainMode::Fast, &[], now())
            .unwrap();

        let names: Vec<_> = movable.iter().map(pod_name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_bare_pod_blocks() {
        let err = DrainEvaluator::default()
            .pods_to_move(&[pod("default", "bare")], DrainMode::Fast, &[], now())
            .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::UnreplicatedController);
    }

    #[test]
    fn test_bare_pod_moves_when_safe_to_evict_or_finished() {
        let finished = Pod {
            status: Some(PodStatus {
                phase: Some("Succeeded".to_string()),
                ..Default::default()
            }),
            ..pod("default", "finished")
        };
        let pods = [
            with_annotation(pod("default", "safe"), SAFE_TO_EVICT_ANNOTATION, "true"),
            finished,
        ];
        let movable = DrainEvaluator::default()
            .pods_to_move(&pods, DrainMode::Fast, &[], now())
            .unwrap();
        assert_eq!(movable.len(), 2);
    }

    #[test]
    fn test_not_safe_to_evict_annotation_blocks() {
        let pods = [with_annotation(replicated("default", "pinned"), SAFE_TO_EVICT_ANNOTATION, "false")];
        let err = DrainEvaluator::default()
            .pods_to_move(&pods, DrainMode::Fast, &[], now())
            .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::NotSafeToEvictAnnotation);
    }

    #[test]
    fn test_kube_system_pod_needs_budget() {
        let dns = with_labels(replicated("kube-system", "coredns-1"), &[("app", "coredns")]);

        let err = DrainEvaluator::default()
            .pods_to_move(&[dns.clone()], DrainMode::Fast, &[], now())
            .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::UnmovableSystemPod);

        let movable = DrainEvaluator::default()
            .pods_to_move(&[dns.clone()], DrainMode::Fast, &[pdb("kube-system", "coredns", 1)], now())
            .unwrap();
        assert_eq!(movable.len(), 1);

        let movable = DrainEvaluator::new(DrainOptions {
            skip_nodes_with_system_pods: false,
            ..Default::default()
        })
        .pods_to_move(&[dns], DrainMode::Fast, &[], now())
        .unwrap();
        assert_eq!(movable.len(), 1);
    }

    #[test]
    fn test_local_storage_blocks_when_configured() {
        let mut cache = replicated("default", "cache");
        cache.spec.as_mut().unwrap().volumes = Some(vec![Volume {
            name: "scratch".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]);

        let err = DrainEvaluator::default()
            .pods_to_move(&[cache.clone()], DrainMode::Fast, &[], now())
            .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::LocalStorageRequested);

        assert!(fast_pods_to_move(&[cache], true, false, &[], now()).is_ok());
    }

    #[test]
    fn test_long_terminating_pod_is_ignored() {
        let mut stuck = pod("default", "stuck");
        stuck.metadata.deletion_timestamp = Some(Time(now() - Duration::seconds(61)));
        let mut leaving = pod("default", "leaving");
        leaving.metadata.deletion_timestamp = Some(Time(now() - Duration::seconds(10)));

        assert!(is_long_terminating(&stuck, now()));
        assert!(!is_long_terminating(&leaving, now()));

        let movable = DrainEvaluator::default()
            .pods_to_move(&[stuck], DrainMode::Fast, &[], now())
            .unwrap();
        assert!(movable.is_empty());

        let err = DrainEvaluator::default()
            .pods_to_move(&[leaving], DrainMode::Fast, &[], now())
            .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::UnreplicatedController);
    }
}

mod detailed_tests {
    use super::*;
    use crate::listers::ListerError;

    fn listers(replicas: i32) -> StaticListers {
        StaticListers::new(
            vec![],
            &[ControllerReplicas {
                kind: "ReplicaSet".to_string(),
                namespace: "default".to_string(),
                name: "web-rs".to_string(),
                replicas,
            }],
        )
    }

    #[test]
    fn test_existing_controller_is_movable() {
        let movable = detailed_pods_to_move(
            &[replicated("default", "web-1")],
            true,
            true,
            &listers(3),
            2,
            &[],
            now(),
        )
        .unwrap();
        assert_eq!(movable.len(), 1);
    }

    #[test]
    fn test_missing_controller_blocks() {
        let err = detailed_pods_to_move(
            &[replicated("other", "web-1")],
            true,
            true,
            &listers(3),
            0,
            &[],
            now(),
        )
        .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::ControllerNotFound);

        // Fast mode trusts the reference.
        assert!(fast_pods_to_move(&[replicated("other", "web-1")], true, true, &[], now()).is_ok());
    }

    #[test]
    fn test_too_few_replicas_blocks() {
        let err = detailed_pods_to_move(
            &[replicated("default", "web-1")],
            true,
            true,
            &listers(1),
            2,
            &[],
            now(),
        )
        .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::MinReplicasReached);
    }

    struct BrokenListers;

    impl ListerRegistry for BrokenListers {
        fn scheduled_pods(&self) -> Result<Vec<Pod>, ListerError> {
            Err(ListerError::new("pods", "timeout"))
        }

        fn controller_replicas(
            &self,
            _namespace: &str,
            _owner: &OwnerReference,
        ) -> Result<Option<i32>, ListerError> {
            Err(ListerError::new("replicasets", "timeout"))
        }
    }

    #[test]
    fn test_lister_failure_is_unexpected_error() {
        let err = detailed_pods_to_move(
            &[replicated("default", "web-1")],
            true,
            true,
            &BrokenListers,
            0,
            &[],
            now(),
        )
        .unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::UnexpectedError);
    }

    #[test]
    fn test_node_pods_to_move() {
        let mut elsewhere = pod("default", "elsewhere");
        elsewhere.spec.as_mut().unwrap().node_name = Some("node-2".to_string());
        let listers = StaticListers::new(vec![replicated("default", "web-1"), elsewhere], &[]);

        let movable = DrainEvaluator::default()
            .node_pods_to_move("node-1", &listers, DrainMode::Fast, &[], now())
            .unwrap();
        assert_eq!(movable.len(), 1);

        let err = DrainEvaluator::default()
            .node_pods_to_move("node-1", &BrokenListers, DrainMode::Fast, &[], now())
            .unwrap_err();
        assert!(matches!(err, DrainError::ApiCall(_)));
        assert!(err.blocking_pod().is_none());
    }
}

mod budget_tests {
    use super::*;

    #[test]
    fn test_exhausted_budget_blocks() {
        let pods = [
            with_labels(replicated("ns", "other"), &[("app", "y")]),
            with_labels(replicated("ns", "web-1"), &[("app", "x")]),
        ];
        let err = DrainEvaluator::default()
            .pods_to_move(&pods, DrainMode::Fast, &[pdb("ns", "x", 0)], now())
            .unwrap_err();

        assert_eq!(reason(&err), BlockingPodReason::InsufficientDisruptionBudget);
        assert_eq!(pod_name(&err.blocking_pod().unwrap().pod), "web-1");
        assert_eq!(
            err.to_string(),
            "not enough pod disruption budget to move ns/web-1"
        );
    }

    #[test]
    fn test_budget_in_other_namespace_is_ignored() {
        let pods = [with_labels(replicated("ns", "web-1"), &[("app", "x")])];
        let movable = DrainEvaluator::default()
            .pods_to_move(&pods, DrainMode::Fast, &[pdb("other", "x", 0)], now())
            .unwrap();
        assert_eq!(movable.len(), 1);
    }

    #[test]
    fn test_first_budget_wins() {
        let pods = [
            with_labels(replicated("ns", "a"), &[("app", "a")]),
            with_labels(replicated("ns", "b"), &[("app", "b")]),
        ];
        let err = check_pdbs(&pods, &[pdb("ns", "b", 0), pdb("ns", "a", 0)]).unwrap_err();
        assert_eq!(pod_name(&err.blocking_pod().unwrap().pod), "b");
    }

    #[test]
    fn test_malformed_selector_is_hard_error() {
        let mut broken = pdb("ns", "x", 1);
        broken.spec.as_mut().unwrap().selector = Some(LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "app".to_string(),
                operator: "Sideways".to_string(),
                values: None,
            }]),
            ..Default::default()
        });
        let pods = [with_labels(replicated("ns", "web-1"), &[("app", "x")])];

        let err = DrainEvaluator::default()
            .pods_to_move(&pods, DrainMode::Fast, &[broken], now())
            .unwrap_err();
        assert!(matches!(err, DrainError::Selector(_)));
        assert!(err.blocking_pod().is_none());
    }

    #[test]
    fn test_budget_without_status_blocks() {
        let mut budget = pdb("ns", "x", 3);
        budget.status = None;
        let pods = [with_labels(replicated("ns", "web-1"), &[("app", "x")])];

        let err = check_pdbs(&pods, &[budget]).unwrap_err();
        assert_eq!(reason(&err), BlockingPodReason::InsufficientDisruptionBudget);
    }
}
