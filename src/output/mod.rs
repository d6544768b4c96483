//! Output values: asynchronously computed property values plus the metadata
//! that must travel with them to the engine.
//!
//! An [`Output`] is an immutable handle to a pending [`OutputData`] record:
//!
//! - `resources`: every resource the value was derived from
//! - `value`: the payload, absent when unknown or when the payload is null
//! - `known`: false only during preview, for values the engine cannot compute
//! - `secret`: sticky; any secret input makes a derived value secret
//!
//! The pending record is a [`Shared`] future, so it resolves once and can be
//! awaited from any number of combinators concurrently.

pub mod combinators;

use crate::deployment;
use crate::resources::Resource;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;

/// Set of resources an output depends on.
pub type ResourceSet = HashSet<Resource>;

/// Resolved state of an [`Output`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputData<T> {
    pub resources: ResourceSet,
    pub value: Option<T>,
    pub known: bool,
    pub secret: bool,
}

impl<T> OutputData<T> {
    pub fn new(resources: ResourceSet, value: Option<T>, known: bool, secret: bool) -> Self {
        Self {
            resources,
            value,
            known,
            secret,
        }
    }

    /// A known, non-secret value with no dependencies.
    pub fn known(value: T) -> Self {
        Self::new(ResourceSet::new(), Some(value), true, false)
    }

    /// A known null.
    pub fn empty() -> Self {
        Self::new(ResourceSet::new(), None, true, false)
    }

    pub fn unknown() -> Self {
        Self::new(ResourceSet::new(), None, false, false)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn with_secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    pub fn with_resources(mut self, resources: ResourceSet) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Transform the payload, keeping every flag and the resource set.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OutputData<U> {
        OutputData {
            resources: self.resources,
            value: self.value.map(f),
            known: self.known,
            secret: self.secret,
        }
    }
}

/// Folds several records under the combination algebra:
/// resources union, known AND, secret OR.
#[derive(Debug)]
pub(crate) struct Accumulator {
    resources: ResourceSet,
    known: bool,
    secret: bool,
}

impl Accumulator {
    pub(crate) fn new() -> Self {
        Self {
            resources: ResourceSet::new(),
            known: true,
            secret: false,
        }
    }

    pub(crate) fn take<T>(&mut self, data: OutputData<T>) -> Option<T> {
        self.resources.extend(data.resources);
        self.known &= data.known;
        self.secret |= data.secret;
        data.value
    }

    pub(crate) fn mark_secret(&mut self, secret: bool) {
        self.secret |= secret;
    }

    pub(crate) fn finish<T>(self, value: Option<T>) -> OutputData<T> {
        OutputData::new(self.resources, value, self.known, self.secret)
    }
}

/// A value that will be available once its computation completes.
pub struct Output<T> {
    data: Shared<BoxFuture<'static, OutputData<T>>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<T: Clone> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.data.peek().is_some() {
            "resolved"
        } else {
            "pending"
        };
        f.debug_struct("Output").field("state", &state).finish()
    }
}

impl<T> Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A known, non-secret output with no dependencies.
    pub fn new(value: T) -> Self {
        Self::from_data(OutputData::known(value))
    }

    /// A known output whose value must never be shown in plaintext.
    pub fn secret(value: T) -> Self {
        Self::from_data(OutputData::known(value).with_secret(true))
    }

    /// An output whose value the engine cannot compute (preview only).
    pub fn unknown() -> Self {
        Self::from_data(OutputData::unknown())
    }

    /// A known null.
    pub fn empty() -> Self {
        Self::from_data(OutputData::empty())
    }

    /// A known value derived from the given resources.
    pub fn with_resources(value: T, resources: ResourceSet) -> Self {
        Self::from_data(OutputData::new(resources, Some(value), true, false))
    }

    pub fn from_data(data: OutputData<T>) -> Self {
        Self::from_data_future(futures::future::ready(data))
    }

    /// Wrap a plain pending computation. The result is known and non-secret.
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::from_data_future(fut.map(OutputData::known))
    }

    pub fn from_data_future<F>(fut: F) -> Self
    where
        F: Future<Output = OutputData<T>> + Send + 'static,
    {
        Self {
            data: fut.boxed().shared(),
        }
    }

    /// Await the full record.
    pub fn data(&self) -> impl Future<Output = OutputData<T>> + Send + 'static {
        self.data.clone()
    }

    pub async fn value(&self) -> Option<T> {
        self.data().await.value
    }

    pub async fn is_known(&self) -> bool {
        self.data().await.known
    }

    pub async fn is_secret(&self) -> bool {
        self.data().await.secret
    }

    pub async fn resources(&self) -> ResourceSet {
        self.data().await.resources
    }

    /// Transform the payload with `f`.
    ///
    /// During preview an unknown output short-circuits to an unknown result
    /// and `f` is never called. Outside preview `f` runs even when the output
    /// is marked unknown: on the payload if one is present, otherwise on
    /// `T::default()`. A known null skips `f`.
    ///
    /// The preview flag is read when the combinator is built, from the scope
    /// installed by `Deployment::run`. Work started with a bare
    /// `tokio::spawn` is outside that scope and sees a non-preview run; use
    /// `Deployment::spawn` or wrap the task in
    /// [`with_dry_run`](crate::deployment::with_dry_run).
    pub fn apply<U, F>(&self, f: F) -> Output<U>
    where
        T: Default,
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.apply_output(move |v| Output::new(f(v)))
    }

    /// Like [`Output::apply`] for functions returning a pending computation.
    pub fn apply_future<U, F, Fut>(&self, f: F) -> Output<U>
    where
        T: Default,
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        self.apply_output(move |v| Output::from_future(f(v)))
    }

    /// Bind: `f` returns another output which is flattened into the result.
    /// Resources are unioned, known-ness is ANDed and secrecy is ORed.
    pub fn apply_output<U, F>(&self, f: F) -> Output<U>
    where
        T: Default,
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Output<U> + Send + 'static,
    {
        let dry_run = deployment::is_dry_run();
        let data = self.data();
        Output::from_data_future(async move {
            let OutputData {
                resources,
                value,
                known,
                secret,
            } = data.await;

            if !known && dry_run {
                return OutputData::new(resources, None, false, secret);
            }
            let value = match value {
                Some(value) => value,
                None if !known => T::default(),
                None => return OutputData::new(resources, None, known, secret),
            };

            let inner = f(value).data().await;
            let mut acc = Accumulator::new();
            acc.take(OutputData::<()>::new(resources, None, known, secret));
            let value = acc.take(inner);
            acc.finish(value)
        })
    }

    /// Override the secret flag, leaving everything else untouched.
    pub fn with_secret(&self, secret: bool) -> Output<T> {
        let data = self.data();
        Output::from_data_future(async move { data.await.with_secret(secret) })
    }

    pub fn unsecret(&self) -> Output<T> {
        self.with_secret(false)
    }

    /// Add dependencies without touching the payload.
    pub fn depends_on(&self, resources: ResourceSet) -> Output<T> {
        let data = self.data();
        Output::from_data_future(async move { data.await.with_resources(resources) })
    }

    /// Convert the payload type. Never short-circuits, never calls `f` on an
    /// absent payload.
    pub fn convert<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let data = self.data();
        Output::from_data_future(async move { data.await.map(f) })
    }
}

impl<T> From<T> for Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Output::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dep(name: &str) -> Resource {
        Resource::dependency(format!("urn:pulumi:dev::proj::test:index:Thing::{}", name))
    }

    #[tokio::test]
    async fn test_output_new_is_known_plain() {
        let data = Output::new(5).data().await;
        assert_eq!(data.value, Some(5));
        assert!(data.known);
        assert!(!data.secret);
        assert!(data.resources.is_empty());
    }

    #[tokio::test]
    async fn test_output_secret_and_unknown() {
        let s = Output::secret("pw".to_string()).data().await;
        assert!(s.secret && s.known);
        let u = Output::<i32>::unknown().data().await;
        assert!(!u.known);
        assert!(u.value.is_none());
    }

    #[tokio::test]
    async fn test_output_apply_maps_value() {
        let out = Output::new(2).apply(|v| v * 10);
        assert_eq!(out.value().await, Some(20));
    }

    #[tokio::test]
    async fn test_output_apply_keeps_secret() {
        let out = Output::secret(2).apply(|v| v + 1);
        let data = out.data().await;
        assert_eq!(data.value, Some(3));
        assert!(data.secret);
    }

    #[tokio::test]
    async fn test_output_bind_algebra() {
        let a = dep("a");
        let b = dep("b");
        let outer = Output::with_resources(1, ResourceSet::from([a.clone()]));
        let inner_res = ResourceSet::from([b.clone()]);
        let out = outer.apply_output(move |v| {
            Output::from_data(OutputData::new(inner_res, Some(v + 1), true, true))
        });
        let data = out.data().await;
        assert_eq!(data.value, Some(2));
        assert!(data.secret);
        assert!(data.known);
        assert!(data.resources.contains(&a));
        assert!(data.resources.contains(&b));
    }

    #[tokio::test]
    async fn test_output_bind_three_levels_accumulates() {
        let (a, b, c) = (dep("a"), dep("b"), dep("c"));
        let (b2, c2) = (b.clone(), c.clone());
        let out = Output::with_resources(1, ResourceSet::from([a.clone()])).apply_output(move |v| {
            Output::with_resources(v + 1, ResourceSet::from([b2])).apply_output(move |w| {
                Output::with_resources(w + 1, ResourceSet::from([c2]))
            })
        });
        let data = out.data().await;
        assert_eq!(data.value, Some(3));
        assert_eq!(data.resources, ResourceSet::from([a, b, c]));
    }

    #[tokio::test]
    async fn test_output_preview_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let data = deployment::with_dry_run(true, async move {
            let out = Output::<i32>::unknown().apply(move |v| {
                seen.fetch_add(1, Ordering::SeqCst);
                v
            });
            out.data().await
        })
        .await;
        assert!(!data.known);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_unknown_outside_preview_still_applies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let source = Output::from_data(OutputData::new(ResourceSet::new(), Some(7), false, false));
        let out = source.apply(move |v| {
            seen.fetch_add(1, Ordering::SeqCst);
            v * 2
        });
        let data = out.data().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(data.value, Some(14));
        assert!(!data.known);
    }

    #[tokio::test]
    async fn test_output_unknown_without_payload_outside_preview() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let out = Output::<i32>::unknown().apply(move |v| {
            seen.fetch_add(1, Ordering::SeqCst);
            v + 1
        });
        let data = out.data().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(data.value, Some(1));
        assert!(!data.known);
    }

    #[tokio::test]
    async fn test_output_unknown_property_outside_preview_sees_null() {
        let out = Output::<Property>::unknown()
            .apply(|p| matches!(p, Property::Null));
        let data = out.data().await;
        assert_eq!(data.value, Some(true));
        assert!(!data.known);
    }

    #[tokio::test]
    async fn test_output_spawned_task_keeps_preview_scope() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let task = tokio::spawn(deployment::with_dry_run(true, async move {
            Output::<i32>::unknown()
                .apply(move |v| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    v
                })
                .data()
                .await
        }));
        let data = task.await.unwrap();
        assert!(!data.known);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_with_secret_overrides_only_secrecy() {
        let a = dep("a");
        let out = Output::with_resources(1, ResourceSet::from([a.clone()])).with_secret(true);
        let data = out.data().await;
        assert!(data.secret);
        assert_eq!(data.value, Some(1));
        assert!(data.resources.contains(&a));
        assert!(!out.unsecret().is_secret().await);
    }

    #[tokio::test]
    async fn test_output_shared_resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let out = Output::from_future(async move {
            seen.fetch_add(1, Ordering::SeqCst);
            42
        });
        let other = out.clone();
        let (x, y) = tokio::join!(out.value(), other.value());
        assert_eq!((x, y), (Some(42), Some(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_apply_future() {
        let out = Output::new(3).apply_future(|v| async move { v * 3 });
        assert_eq!(out.value().await, Some(9));
    }

    #[tokio::test]
    async fn test_output_empty_skips_function() {
        let out = Output::<i32>::empty().apply(|v| v + 1);
        let data = out.data().await;
        assert!(data.known);
        assert!(data.value.is_none());
    }

    #[test]
    fn test_output_data_map_keeps_flags() {
        let d = OutputData::new(ResourceSet::new(), Some(1), false, true).map(|v| v.to_string());
        assert_eq!(d.value.as_deref(), Some("1"));
        assert!(!d.known);
        assert!(d.secret);
    }
}
