// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The evaluator: the entry structure for a status evaluation cycle.
//!
//! Evaluating a single object fans out into many related reads (a Deployment
//! pulls ReplicaSets, Pods, container logs). To avoid one list call per
//! sub-query, the evaluator keeps a per-namespace preload cache: every query
//! merges its matcher into the namespace's matcher and the namespace is
//! (re)listed only when the merge widened it. Ownership relations are indexed
//! lazily from whatever the cache holds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::loader::Loader;
use super::matcher::GroupKindMatcher;
use super::query::{NAMESPACE_ALL, Query, log_object};
use crate::status::{GroupKind, GroupResource, GroupVersionKind, Object, ObjectStatus};

/// Default number of log lines attached to failing container conditions.
const DEFAULT_LOG_TAIL_LINES: i64 = 5;

/// Calculates the status of objects of the kinds it supports.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Whether this analyzer applies to the object. Used when searching the
    /// registered analyzers in order.
    fn supports(&self, obj: &Object) -> bool;

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus;
}

/// Constructor for an analyzer, receiving a handle to the evaluator so the
/// analyzer can issue sub-queries.
pub type AnalyzerInit = Box<dyn FnOnce(Eval) -> Arc<dyn Analyzer> + Send>;

/// The analyzer constructors plus the kinds owner-traversal skips. Produced
/// by [`AnalyzerRegistry::default_analyzers`](crate::analyze::AnalyzerRegistry).
pub struct AnalyzerSet {
    pub inits: Vec<AnalyzerInit>,
    pub ignored_kinds: Vec<GroupKind>,
}

/// Cheap handle to the evaluator held by analyzers.
///
/// Holds a weak back-reference: the evaluator owns the analyzers, so a strong
/// reference would form a cycle. The handle can only be used while the
/// evaluator is alive, which is always the case during an evaluation pass; a
/// dead handle surfaces as an ordinary error.
#[derive(Clone)]
pub struct Eval(Weak<Evaluator>);

impl Eval {
    fn upgrade(&self) -> Result<Arc<Evaluator>> {
        self.0.upgrade().context("evaluator is no longer alive")
    }

    pub async fn load(&self, q: &Query) -> Result<Vec<Arc<Object>>> {
        self.upgrade()?.load(q).await
    }

    pub async fn eval_query(
        &self,
        q: &Query,
        analyzer: Option<Arc<dyn Analyzer>>,
    ) -> Result<Vec<ObjectStatus>> {
        self.upgrade()?.eval_query(q, analyzer).await
    }

    pub async fn eval_resource(
        &self,
        gr: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<ObjectStatus>> {
        self.upgrade()?.eval_resource(gr, namespace, name).await
    }

    pub fn resource_to_kind(&self, gr: &GroupResource) -> Option<GroupVersionKind> {
        self.upgrade().ok()?.resource_to_kind(gr)
    }

    /// The kinds excluded from owner traversal.
    pub fn ignored_kinds(&self) -> Result<Arc<[GroupKind]>> {
        Ok(self.upgrade()?.ignored_kinds())
    }

    pub fn is_ignored_kind(&self, gk: &GroupKind) -> bool {
        self.upgrade()
            .map(|e| e.is_ignored_kind(gk))
            .unwrap_or(false)
    }
}

/// Central coordinator of a status evaluation cycle: loads data through the
/// [`Loader`], finds the right [`Analyzer`] and runs it.
///
/// Not internally concurrent: a single evaluation pass is a cooperative
/// sequence of load and analyze steps. Concurrent passes need separate
/// instances.
pub struct Evaluator {
    loader: Box<dyn Loader>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    ignored_kinds: Arc<[GroupKind]>,
    log_tail_lines: i64,
    state: Mutex<EvalState>,
}

#[derive(Default)]
struct EvalState {
    /// All loaded objects by UID. At most one object per UID (I2).
    cache: HashMap<String, Arc<Object>>,
    ns_cache: HashMap<String, NsCache>,
    /// Owner UID to the set of owned UIDs.
    ownership: HashMap<String, HashSet<String>>,
    /// Namespaces whose ownership relations need recomputing.
    ownership_refresh_ns: Vec<String>,
    analyzer_memo: HashMap<String, Arc<dyn Analyzer>>,
    /// UIDs whose analysis is in flight. Kubernetes does not guarantee an
    /// acyclic owner graph, so recursion through an already-visited UID is
    /// cut short instead of looping.
    visiting: HashSet<String>,
}

/// Objects loaded from a single namespace, the merged matcher they were
/// loaded under, and whether the matcher widened since the last load.
#[derive(Default)]
struct NsCache {
    objects: HashMap<GroupKind, Vec<Arc<Object>>>,
    matcher: GroupKindMatcher,
    needs_refill: bool,
}

impl NsCache {
    fn append(&mut self, obj: Arc<Object>) {
        self.objects.entry(obj.group_kind()).or_default().push(obj);
    }

    fn all(&self) -> impl Iterator<Item = &Arc<Object>> {
        self.objects.values().flatten()
    }

    /// Merge the matcher in. A widened matcher marks the namespace for a
    /// refill; a failed refill leaves the mark in place so the next query
    /// retries.
    fn update_matcher(&mut self, matcher: &GroupKindMatcher) {
        let merged = self.matcher.merge(matcher);
        if !merged.equal(&self.matcher) {
            self.matcher = merged;
            self.needs_refill = true;
        }
    }
}

impl EvalState {
    fn ns_mut(&mut self, ns: &str) -> &mut NsCache {
        self.ns_cache.entry(ns.to_string()).or_default()
    }

    /// Insert an object into the UID cache and its namespace bucket.
    /// Re-registration of a known UID is a no-op.
    fn update_cache(&mut self, obj: Arc<Object>) -> bool {
        if self.cache.contains_key(obj.uid()) {
            return false;
        }
        self.cache.insert(obj.uid().to_string(), obj.clone());
        self.ns_mut(obj.namespace()).append(obj);
        true
    }

    fn filter(&self, ns: &str, matcher: &GroupKindMatcher) -> Vec<Arc<Object>> {
        if ns == NAMESPACE_ALL {
            let mut ret = Vec::new();
            for bucket_ns in self.ns_cache.keys() {
                if bucket_ns != NAMESPACE_ALL {
                    ret.extend(self.filter(bucket_ns, matcher));
                }
            }
            return ret;
        }

        let Some(cache) = self.ns_cache.get(ns) else {
            return Vec::new();
        };
        let mut ret = Vec::new();
        for (gk, objects) in &cache.objects {
            if matcher.matches(gk) {
                ret.extend(objects.iter().cloned());
            }
        }
        ret
    }

    fn refresh_ownership(&mut self) {
        for ns in std::mem::take(&mut self.ownership_refresh_ns) {
            let Some(cache) = self.ns_cache.get(&ns) else {
                continue;
            };
            for obj in cache.all() {
                for owner_ref in obj.owner_references() {
                    self.ownership
                        .entry(owner_ref.uid.clone())
                        .or_default()
                        .insert(obj.uid().to_string());
                }
            }
        }
    }
}

impl Evaluator {
    pub fn new(analyzers: AnalyzerSet, loader: Box<dyn Loader>) -> Arc<Self> {
        Self::with_log_tail_lines(analyzers, loader, DEFAULT_LOG_TAIL_LINES)
    }

    /// Like [`Evaluator::new`] with a custom number of log lines fetched for
    /// failing containers.
    pub fn with_log_tail_lines(
        analyzers: AnalyzerSet,
        loader: Box<dyn Loader>,
        log_tail_lines: i64,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let handle = Eval(weak.clone());
            let initialized = analyzers
                .inits
                .into_iter()
                .map(|init| init(handle.clone()))
                .collect();
            Evaluator {
                loader,
                analyzers: initialized,
                ignored_kinds: analyzers.ignored_kinds.into(),
                log_tail_lines,
                state: Mutex::new(EvalState::default()),
            }
        })
    }

    /// Clear all per-cycle state. Called between polling cycles so each
    /// snapshot observes a consistent view.
    pub async fn reset(&self) {
        let mut st = self.state.lock().await;
        *st = EvalState::default();
    }

    /// Evaluate the status of a single object. Loads the most recent version
    /// of the object and runs the appropriate analyzer on it.
    pub async fn eval(&self, obj: &Arc<Object>) -> ObjectStatus {
        let Some(analyzer) = self.find_analyzer(obj).await else {
            return ObjectStatus::unknown_with_error(
                obj.clone(),
                &anyhow!("no analyzer registered for {}", obj.group_kind()),
            );
        };

        let cached = self.state.lock().await.cache.get(obj.uid()).cloned();
        let updated = match cached {
            Some(fresh) => fresh,
            None => match self.loader.get(obj).await {
                Ok(fresh) => {
                    self.state.lock().await.update_cache(fresh.clone());
                    fresh
                }
                Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
            },
        };

        self.analyze_guarded(analyzer, &updated).await
    }

    /// Load the objects specified by the query and analyze each. With no
    /// analyzer given, the registered one is looked up per object.
    pub async fn eval_query(
        &self,
        q: &Query,
        analyzer: Option<Arc<dyn Analyzer>>,
    ) -> Result<Vec<ObjectStatus>> {
        let objects = self.load(q).await?;
        Ok(self.analyze_objects(&objects, analyzer).await)
    }

    pub async fn eval_resource(
        &self,
        gr: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<ObjectStatus>> {
        let objects = self.loader.load_resource(gr, namespace, name).await?;
        Ok(self.analyze_objects(&objects, None).await)
    }

    pub async fn eval_resource_with_selector(
        &self,
        gr: &GroupResource,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ObjectStatus>> {
        let objects = self
            .loader
            .load_resource_by_selector(gr, namespace, label_selector)
            .await?;
        Ok(self.analyze_objects(&objects, None).await)
    }

    /// Load the objects specified by the query, preloading the namespace
    /// under the merged matcher first.
    ///
    /// A list failure only surfaces as an error when the query produced no
    /// objects; with partial data the error is logged and the partial result
    /// returned.
    pub async fn load(&self, q: &Query) -> Result<Vec<Arc<Object>>> {
        let ns = q.namespace().to_string();
        let needs_refill = {
            let mut st = self.state.lock().await;
            let cache = st.ns_mut(&ns);
            cache.update_matcher(&q.matcher());
            cache.needs_refill
        };

        let mut load_err = None;
        if needs_refill {
            if let Err(err) = self.load_namespace(&ns).await {
                load_err = Some(err);
            }
        }

        let objects = q.eval(self).await;
        match load_err {
            Some(err) if objects.is_empty() => Err(err),
            Some(err) => {
                warn!(namespace = %ns, error = format!("{err:#}"),
                    "namespace load failed, continuing with cached objects");
                Ok(objects)
            }
            None => Ok(objects),
        }
    }

    /// Objects from the cache matching the matcher. Expects the namespace to
    /// be preloaded; query evaluation calls this after [`Evaluator::load`]
    /// filled the cache.
    pub async fn filter(&self, ns: &str, matcher: &GroupKindMatcher) -> Vec<Arc<Object>> {
        self.state.lock().await.filter(ns, matcher)
    }

    pub fn resource_to_kind(&self, gr: &GroupResource) -> Option<GroupVersionKind> {
        self.loader.resource_to_kind(gr)
    }

    pub fn ignored_kinds(&self) -> Arc<[GroupKind]> {
        self.ignored_kinds.clone()
    }

    pub fn is_ignored_kind(&self, gk: &GroupKind) -> bool {
        self.ignored_kinds.contains(gk)
    }

    /// Restrict candidates to objects owned by `owner`, refreshing the
    /// ownership index from any namespaces loaded since the last refresh.
    pub(crate) async fn filter_owned_by(
        &self,
        owner: &Object,
        candidates: Vec<Arc<Object>>,
    ) -> Vec<Arc<Object>> {
        let mut st = self.state.lock().await;
        st.refresh_ownership();
        let Some(children) = st.ownership.get(owner.uid()) else {
            return Vec::new();
        };
        candidates
            .into_iter()
            .filter(|cand| children.contains(cand.uid()))
            .collect()
    }

    pub(crate) async fn fetch_pod_log(&self, obj: &Object, container: &str) -> Object {
        match self
            .loader
            .load_pod_logs(obj, container, self.log_tail_lines)
            .await
        {
            Ok(bytes) => log_object(container, Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) => {
                debug!(object = %obj.full_name(), container, error = format!("{err:#}"),
                    "failed to get logs");
                log_object(container, None)
            }
        }
    }

    async fn load_namespace(&self, ns: &str) -> Result<()> {
        let (matcher, loaded_gks) = {
            let mut st = self.state.lock().await;
            let cache = st.ns_mut(ns);
            (
                cache.matcher.clone(),
                cache.objects.keys().cloned().collect::<Vec<_>>(),
            )
        };

        let objects = self.loader.load(ns, &matcher, &loaded_gks).await?;

        let mut st = self.state.lock().await;
        st.ns_mut(ns).needs_refill = false;

        let mut touched_ns = Vec::new();
        for obj in objects {
            if !st.update_cache(obj.clone()) {
                continue;
            }

            if !touched_ns.iter().any(|t| t == obj.namespace()) {
                touched_ns.push(obj.namespace().to_string());
            }

            // update_cache files the object under its home namespace only.
            // When loading all namespaces, also mark it as loaded in the
            // all-namespaces bucket so a later cross-namespace query does not
            // list it again.
            if ns == NAMESPACE_ALL {
                st.ns_mut(NAMESPACE_ALL).append(obj);
            }
        }

        // Track the namespaces affected by the load for the ownership index.
        // The requested ns can't be used directly as it may be the
        // all-namespaces placeholder.
        for ns in touched_ns {
            if !st.ownership_refresh_ns.contains(&ns) {
                st.ownership_refresh_ns.push(ns);
            }
        }

        Ok(())
    }

    /// First registered analyzer supporting the object. The registry always
    /// appends a catch-all, so a miss means a misconfigured analyzer set.
    async fn find_analyzer(&self, obj: &Object) -> Option<Arc<dyn Analyzer>> {
        let mut st = self.state.lock().await;
        if !obj.uid().is_empty()
            && let Some(memoized) = st.analyzer_memo.get(obj.uid())
        {
            return Some(memoized.clone());
        }

        let analyzer = self.analyzers.iter().find(|a| a.supports(obj))?.clone();
        if !obj.uid().is_empty() {
            st.analyzer_memo
                .insert(obj.uid().to_string(), analyzer.clone());
        }
        Some(analyzer)
    }

    async fn analyze_objects(
        &self,
        objects: &[Arc<Object>],
        analyzer: Option<Arc<dyn Analyzer>>,
    ) -> Vec<ObjectStatus> {
        let mut ret = Vec::with_capacity(objects.len());
        for obj in objects {
            let a = match &analyzer {
                Some(a) => Some(a.clone()),
                None => self.find_analyzer(obj).await,
            };
            let status = match a {
                Some(a) => self.analyze_guarded(a, obj).await,
                None => ObjectStatus::unknown_with_error(
                    obj.clone(),
                    &anyhow!("no analyzer registered for {}", obj.group_kind()),
                ),
            };
            ret.push(status);
        }
        ret
    }

    /// Run the analyzer unless the object's analysis is already in flight,
    /// which would mean a cycle in the owner graph.
    async fn analyze_guarded(&self, analyzer: Arc<dyn Analyzer>, obj: &Arc<Object>) -> ObjectStatus {
        let uid = obj.uid().to_string();
        if !uid.is_empty() && !self.state.lock().await.visiting.insert(uid.clone()) {
            debug!(object = %obj.full_name(), "ownership cycle detected, not recursing");
            return ObjectStatus::unknown(obj.clone());
        }

        let status = analyzer.analyze(obj).await;

        if !uid.is_empty() {
            self.state.lock().await.visiting.remove(&uid);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::FakeLoader;
    use crate::status::Verdict;
    use serde_json::json;

    struct KindTag(&'static str, Verdict);

    #[async_trait]
    impl Analyzer for KindTag {
        fn supports(&self, obj: &Object) -> bool {
            obj.gvk().kind == self.0
        }

        async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
            let mut st = ObjectStatus::unknown(obj.clone());
            st.status.result = self.1;
            st
        }
    }

    fn tagged_set() -> AnalyzerSet {
        AnalyzerSet {
            inits: vec![
                Box::new(|_| Arc::new(KindTag("Pod", Verdict::Ok)) as Arc<dyn Analyzer>),
                Box::new(|_| Arc::new(KindTag("Pod", Verdict::Error)) as Arc<dyn Analyzer>),
            ],
            ignored_kinds: vec![GroupKind::core("Secret")],
        }
    }

    fn pod(ns: &str, name: &str, uid: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": ns, "uid": uid}
        })
    }

    #[tokio::test]
    async fn test_find_analyzer_order_and_memo() {
        let loader = FakeLoader::new();
        let objs = loader.register([pod("ns", "p1", "u1")]).unwrap();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        // First analyzer in registration order wins.
        let st = e.eval(&objs[0]).await;
        assert_eq!(st.status.result, Verdict::Ok);
        assert!(
            e.state
                .lock()
                .await
                .analyzer_memo
                .contains_key(objs[0].uid())
        );
    }

    #[tokio::test]
    async fn test_eval_unsupported_kind_reports_error() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": "s", "namespace": "ns", "uid": "u9"}
            })])
            .unwrap();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        let st = e.eval(&objs[0]).await;
        assert_eq!(st.status.result, Verdict::Unknown);
        assert!(st.status.err.unwrap().contains("no analyzer registered"));
    }

    #[tokio::test]
    async fn test_namespace_listed_once_per_matcher() {
        let loader = FakeLoader::new();
        loader
            .register([pod("ns", "p1", "u1"), pod("ns", "p2", "u2")])
            .unwrap();
        let counts = loader.load_calls();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        let q = Query::kind("ns", GroupKindMatcher::single(GroupKind::core("Pod")));
        let first = e.load(&q).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(*counts.lock().unwrap(), 1);

        // Same matcher again: served from the cache.
        let second = e.load(&q).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(*counts.lock().unwrap(), 1);

        // A wider matcher triggers a refill.
        let wider = Query::kind("ns", GroupKindMatcher::all_except(vec![]));
        e.load(&wider).await.unwrap();
        assert_eq!(*counts.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cache_no_duplicates_by_uid() {
        let loader = FakeLoader::new();
        loader.register([pod("ns", "p1", "u1")]).unwrap();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        let narrow = Query::kind("ns", GroupKindMatcher::single(GroupKind::core("Pod")));
        e.load(&narrow).await.unwrap();
        // Widening reloads the namespace; the same object comes back from
        // the loader but must not be double-registered.
        let wide = Query::kind("ns", GroupKindMatcher::all_except(vec![]));
        let objects = e.load(&wide).await.unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn test_owner_query_filters_by_ownership() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([
                json!({
                    "apiVersion": "apps/v1",
                    "kind": "ReplicaSet",
                    "metadata": {"name": "rs", "namespace": "ns", "uid": "rs-uid"}
                }),
                json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {
                        "name": "owned", "namespace": "ns", "uid": "u1",
                        "ownerReferences": [{"apiVersion": "apps/v1", "kind": "ReplicaSet",
                                             "name": "rs", "uid": "rs-uid"}]
                    }
                }),
                pod("ns", "stray", "u2"),
            ])
            .unwrap();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        let q = Query::owner(objs[0].clone(), GroupKindMatcher::all_except(vec![]));
        let owned = e.load(&q).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name(), "owned");
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let loader = FakeLoader::new();
        loader.register([pod("ns", "p1", "u1")]).unwrap();
        let counts = loader.load_calls();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        let q = Query::kind("ns", GroupKindMatcher::single(GroupKind::core("Pod")));
        e.load(&q).await.unwrap();
        assert_eq!(*counts.lock().unwrap(), 1);

        e.reset().await;
        {
            let st = e.state.lock().await;
            assert!(st.cache.is_empty());
            assert!(st.ns_cache.is_empty());
            assert!(st.ownership.is_empty());
            assert!(st.analyzer_memo.is_empty());
        }

        // Same query after reset loads again.
        e.load(&q).await.unwrap();
        assert_eq!(*counts.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_namespace_all_serves_later_all_queries_from_cache() {
        let loader = FakeLoader::new();
        loader
            .register([pod("ns-a", "p1", "u1"), pod("ns-b", "p2", "u2")])
            .unwrap();
        let counts = loader.load_calls();
        let e = Evaluator::new(tagged_set(), Box::new(loader));

        let q = Query::kind(
            NAMESPACE_ALL,
            GroupKindMatcher::single(GroupKind::core("Pod")),
        );
        let all = e.load(&q).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(*counts.lock().unwrap(), 1);

        let again = e.load(&q).await.unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(*counts.lock().unwrap(), 1);
    }
}
