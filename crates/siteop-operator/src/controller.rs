//! Event loop wiring: kube-runtime controllers feeding the dispatchers.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::runtime::controller::{Action, Config as ControllerConfig, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use siteop_core::{Dispatcher, Reconciler};
use tracing::{error, info, warn};

use crate::crd::{PostgresDatabase, Site};
use crate::error::{ErrorCategory, ReconcileError};

/// Requeue delays applied after a failed reconcile.
#[derive(Debug, Clone, Copy)]
pub struct RequeuePolicy {
    pub error_backoff: Duration,
    pub resync: Duration,
}

impl RequeuePolicy {
    /// Transient failures back off briefly; configuration failures wait for
    /// the resync period since they recur until the object changes.
    pub fn action_for(&self, error: &ReconcileError) -> Action {
        match error.category() {
            ErrorCategory::Transient => Action::requeue(self.error_backoff),
            ErrorCategory::Configuration => Action::requeue(self.resync),
        }
    }
}

/// Shared state of one controller.
pub struct Context<R> {
    pub dispatcher: Dispatcher<R>,
    pub requeue: RequeuePolicy,
}

async fn reconcile<K, R>(object: Arc<K>, ctx: Arc<Context<R>>) -> Result<Action, ReconcileError>
where
    K: Resource,
    R: Reconciler<Error = ReconcileError>,
{
    let namespace = object.namespace().unwrap_or_default();
    ctx.dispatcher
        .reconcile(&namespace, &object.name_any())
        .await?;
    Ok(Action::await_change())
}

fn error_policy<K, R>(object: Arc<K>, error: &ReconcileError, ctx: Arc<Context<R>>) -> Action
where
    K: Resource,
{
    warn!(
        name = %object.name_any(),
        namespace = %object.namespace().unwrap_or_default(),
        category = %error.category(),
        error = %error,
        "Reconcile failed, requeueing"
    );
    ctx.requeue.action_for(error)
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Runs one controller. Changes to objects of `owned` requeue their owner.
async fn run_one<K, R>(
    api: Api<K>,
    owned: Option<Api<PostgresDatabase>>,
    concurrency: u16,
    ctx: Arc<Context<R>>,
) where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R: Reconciler<Error = ReconcileError> + 'static,
{
    let kind = K::kind(&()).to_string();
    let mut controller = Controller::new(api, watcher::Config::default());
    if let Some(owned) = owned {
        controller = controller.owns(owned, watcher::Config::default());
    }
    controller
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<K, R>, error_policy::<K, R>, ctx)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                if let Err(err) = result {
                    error!(kind = %kind, error = %err, "Controller error");
                }
            }
        })
        .await;
    info!(kind = %kind, "Controller stopped");
}

/// Runs the PostgresDatabase and Site controllers until shutdown.
pub async fn run<D, S>(
    client: Client,
    namespace: Option<&str>,
    concurrency: u16,
    databases: Arc<Context<D>>,
    sites: Arc<Context<S>>,
) where
    D: Reconciler<Error = ReconcileError> + 'static,
    S: Reconciler<Error = ReconcileError> + 'static,
{
    info!(namespace = namespace.unwrap_or("*"), concurrency, "Starting controllers");
    futures_util::future::join(
        run_one(
            api::<PostgresDatabase>(&client, namespace),
            None,
            concurrency,
            databases,
        ),
        run_one(
            api::<Site>(&client, namespace),
            Some(api::<PostgresDatabase>(&client, namespace)),
            concurrency,
            sites,
        ),
    )
    .await;
}
