// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! End-to-end evaluation scenarios against the fake loader.

use std::sync::Arc;

use k8health::analyze::default_registry;
use k8health::eval::{Evaluator, FakeLoader, GroupKindMatcher, NAMESPACE_ALL, Query};
use k8health::print::{KubectlFormat, render_kubectl};
use k8health::status::{GroupKind, GroupResource, GroupVersionKind, Verdict};

fn evaluator(loader: FakeLoader) -> Arc<Evaluator> {
    Evaluator::new(default_registry().default_analyzers(), Box::new(loader))
}

const DEPLOYMENT_FIXTURE: &str = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: web
      namespace: default
      uid: dp-uid
    spec:
      replicas: 2
      selector:
        matchLabels:
          app: web
    status:
      conditions:
        - type: Available
          status: "True"
          reason: MinimumReplicasAvailable
          lastTransitionTime: "2024-02-01T10:00:00Z"
        - type: Progressing
          status: "True"
          reason: NewReplicaSetAvailable
          lastTransitionTime: "2024-02-01T10:00:00Z"
  - apiVersion: apps/v1
    kind: ReplicaSet
    metadata:
      name: web-7d9f
      namespace: default
      uid: rs-uid
      labels:
        app: web
      ownerReferences:
        - apiVersion: apps/v1
          kind: Deployment
          name: web
          uid: dp-uid
    spec:
      replicas: 2
      selector:
        matchLabels:
          app: web
    status:
      replicas: 2
      fullyLabeledReplicas: 0
      availableReplicas: 0
      readyReplicas: 0
  - apiVersion: v1
    kind: Pod
    metadata:
      name: web-7d9f-x1
      namespace: default
      uid: pod-uid
      labels:
        app: web
    status:
      phase: Running
      conditions:
        - type: Ready
          status: "False"
          reason: ContainersNotReady
          message: "containers with unready status: [app]"
          lastTransitionTime: "2024-02-01T10:00:00Z"
      containerStatuses:
        - name: app
          ready: false
          restartCount: 4
          image: img
          imageID: img-id
          state:
            running:
              startedAt: "2024-02-01T10:00:00Z"
"#;

#[tokio::test]
async fn deployment_mid_rollout_reports_failing_replicaset() {
    let loader = FakeLoader::new();
    loader.register_pod_logs("default", "web-7d9f-x1", "app", "line1\nline2\nline3\n");
    let objs = loader.register_yaml(DEPLOYMENT_FIXTURE).unwrap();
    let deployment = objs[0].clone();
    let e = evaluator(loader);

    let st = e.eval(&deployment).await;
    assert_eq!(st.status.result, Verdict::Error);
    assert!(st.status.progressing);

    // ReplicaSet sub-status with the synthetic replica counters.
    assert_eq!(st.sub_statuses.len(), 1);
    let rs = &st.sub_statuses[0];
    assert_eq!(rs.object.gvk().kind, "ReplicaSet");
    assert_eq!(rs.status.result, Verdict::Error);
    let ready = rs
        .conditions
        .iter()
        .find(|c| c.condition.type_ == "ReplicasReady")
        .unwrap();
    assert_eq!(ready.condition.message, "Ready: 0/2");

    // The pod hangs off the ReplicaSet, its container condition is
    // augmented with the log tail.
    assert_eq!(rs.sub_statuses.len(), 1);
    let pod = &rs.sub_statuses[0];
    assert_eq!(pod.status.result, Verdict::Error);
    let container = &pod.sub_statuses[0];
    let cond = &container.conditions[0];
    assert_eq!(cond.condition.reason, "NotReady");
    assert_eq!(cond.condition.message, "Logs:\nline1\nline2\nline3\n");
}

#[tokio::test]
async fn deployment_evaluation_lists_each_namespace_once_per_widening() {
    let loader = FakeLoader::new();
    let objs = loader.register_yaml(DEPLOYMENT_FIXTURE).unwrap();
    let deployment = objs[0].clone();
    let counts = loader.load_calls();
    let e = evaluator(loader);

    e.eval(&deployment).await;
    // One list for the ReplicaSet matcher, one refill when the Pod matcher
    // widened it. Log queries must not trigger loads.
    assert_eq!(*counts.lock().unwrap(), 2);

    // Re-evaluating is served entirely from the cache.
    e.eval(&deployment).await;
    assert_eq!(*counts.lock().unwrap(), 2);
}

#[tokio::test]
async fn repeated_evaluation_after_reset_is_deterministic() {
    let loader = FakeLoader::new();
    let objs = loader.register_yaml(DEPLOYMENT_FIXTURE).unwrap();
    let deployment = objs[0].clone();
    let e = evaluator(loader);

    let first = e.eval(&deployment).await;
    e.reset().await;
    let second = e.eval(&deployment).await;

    let a = render_kubectl(std::slice::from_ref(&first), KubectlFormat::Json).unwrap();
    let b = render_kubectl(std::slice::from_ref(&second), KubectlFormat::Json).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn kind_query_across_all_namespaces() {
    let loader = FakeLoader::new();
    loader
        .register_yaml(
            r#"
items:
  - apiVersion: v1
    kind: PersistentVolumeClaim
    metadata: {name: data-a, namespace: team-a, uid: pvc-a}
    status: {phase: Bound}
  - apiVersion: v1
    kind: PersistentVolumeClaim
    metadata: {name: data-b, namespace: team-b, uid: pvc-b}
    status: {phase: Pending}
"#,
        )
        .unwrap();
    let e = evaluator(loader);

    let statuses = e
        .eval_query(
            &Query::kind(
                NAMESPACE_ALL,
                GroupKindMatcher::single(GroupKind::core("PersistentVolumeClaim")),
            ),
            None,
        )
        .await
        .unwrap();

    assert_eq!(statuses.len(), 2);
    let bound = statuses.iter().find(|s| s.object.name() == "data-a").unwrap();
    assert_eq!(bound.status.result, Verdict::Ok);
    assert!(!bound.status.progressing);

    let pending = statuses.iter().find(|s| s.object.name() == "data-b").unwrap();
    assert_eq!(pending.status.result, Verdict::Unknown);
    assert!(pending.status.progressing);
    assert_eq!(pending.conditions[0].condition.type_, "NotBound");
}

#[tokio::test]
async fn node_unschedulable_scenario() {
    let loader = FakeLoader::new();
    let objs = loader
        .register_yaml(
            r#"
items:
  - apiVersion: v1
    kind: Node
    metadata: {name: worker-1, uid: node-1}
    spec: {unschedulable: true}
    status:
      conditions:
        - {type: Ready, status: "True"}
"#,
        )
        .unwrap();
    let e = evaluator(loader);

    let st = e.eval(&objs[0]).await;
    assert_eq!(st.status.result, Verdict::Error);
    assert!(
        st.conditions
            .iter()
            .any(|c| c.condition.type_ == "Unschedulable")
    );
}

#[tokio::test]
async fn clusteroperator_expands_only_non_ignored_related_objects() {
    let loader = FakeLoader::new();
    loader.register_resource_kind(
        GroupResource::new("", "configmaps"),
        GroupVersionKind::new("", "v1", "ConfigMap"),
    );
    loader.register_resource_kind(
        GroupResource::new("", "secrets"),
        GroupVersionKind::new("", "v1", "Secret"),
    );
    loader.register_resource_kind(
        GroupResource::new("apps", "deployments"),
        GroupVersionKind::new("apps", "v1", "Deployment"),
    );
    let objs = loader
        .register_yaml(
            r#"
items:
  - apiVersion: config.openshift.io/v1
    kind: ClusterOperator
    metadata: {name: console, uid: co-1}
    status:
      conditions:
        - {type: Degraded, status: "True", reason: RouteHealthDegraded}
        - {type: Available, status: "True"}
      relatedObjects:
        - {group: "", resource: configmaps, name: console-config, namespace: openshift-console}
        - {group: apps, resource: deployments, name: console, namespace: openshift-console}
        - {group: "", resource: secrets, name: console-secret, namespace: openshift-console}
  - apiVersion: apps/v1
    kind: Deployment
    metadata: {name: console, namespace: openshift-console, uid: dep-1}
    spec:
      replicas: 1
      selector:
        matchLabels: {app: console}
    status:
      conditions:
        - {type: Available, status: "True"}
"#,
        )
        .unwrap();
    let e = evaluator(loader);

    let st = e.eval(&objs[0]).await;
    // Degraded=True dominates.
    assert_eq!(st.status.result, Verdict::Error);

    // ConfigMap and Secret are ignored kinds; only the Deployment expands.
    assert_eq!(st.sub_statuses.len(), 1);
    assert_eq!(st.sub_statuses[0].object.gvk().kind, "Deployment");
}

#[tokio::test]
async fn ownership_cycle_terminates() {
    // The owner graph is not guaranteed to be acyclic; two objects owning
    // each other must not loop the generic analyzer forever.
    let loader = FakeLoader::new();
    let objs = loader
        .register_yaml(
            r#"
items:
  - apiVersion: example.io/v1
    kind: Widget
    metadata:
      name: a
      namespace: ns
      uid: a-uid
      ownerReferences:
        - {apiVersion: example.io/v1, kind: Widget, name: b, uid: b-uid}
    status:
      conditions:
        - {type: Ready, status: "True"}
  - apiVersion: example.io/v1
    kind: Widget
    metadata:
      name: b
      namespace: ns
      uid: b-uid
      ownerReferences:
        - {apiVersion: example.io/v1, kind: Widget, name: a, uid: a-uid}
"#,
        )
        .unwrap();
    let e = evaluator(loader);

    let st = e.eval(&objs[0]).await;
    // a -> b -> a; the inner revisit of a is cut and reports Unknown,
    // which a's Ready condition dominates.
    assert_eq!(st.status.result, Verdict::Ok);
    assert_eq!(st.sub_statuses.len(), 1);
    let b = &st.sub_statuses[0];
    assert_eq!(b.object.name(), "b");
    assert_eq!(b.status.result, Verdict::Unknown);
    assert_eq!(b.sub_statuses.len(), 1);
    let inner_a = &b.sub_statuses[0];
    assert_eq!(inner_a.object.name(), "a");
    assert_eq!(inner_a.status.result, Verdict::Unknown);
    assert!(inner_a.sub_statuses.is_empty());
}

#[tokio::test]
async fn no_status_tree_contains_its_own_object_as_sub_status() {
    let loader = FakeLoader::new();
    let objs = loader.register_yaml(DEPLOYMENT_FIXTURE).unwrap();
    let deployment = objs[0].clone();
    let e = evaluator(loader);

    let st = e.eval(&deployment).await;

    fn assert_no_self_reference(st: &k8health::status::ObjectStatus) {
        for sub in &st.sub_statuses {
            assert_ne!(
                (sub.object.uid(), sub.object.name()),
                (st.object.uid(), st.object.name()),
                "sub-status must not reference its parent"
            );
            assert_no_self_reference(sub);
        }
    }
    assert_no_self_reference(&st);
}
