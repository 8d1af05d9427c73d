//! Data-fetching hooks.
//!
//! Every hook is a [`use_query`] over a [`Query`]: the key is derived
//! reactively, one fetch goes out per distinct key, and the result lands in a
//! signal only while the component is still mounted. List hooks additionally
//! follow the table's realtime feed and fold changes into a [`Collection`].

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use api::{ChangeFeed, Dashboard, Subscription};
use dioxus::prelude::*;
use serde::de::DeserializeOwned;
use store::{
    AuthError, BackendError, ChangeEvent, Collection, FetchState, InvestmentPlan, Keyed,
    MountGuard, MountHandle, Query, Ticket, Transaction,
};

use crate::auth::{use_auth, Auth};

/// Base delay between realtime reconnect attempts; grows linearly.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_STEPS: u32 = 15;

/// Handle returned by [`use_query`]. Cheap to clone into event handlers.
pub struct QueryHandle<K: 'static, T: 'static> {
    query: Signal<Query<K, T>>,
    mount: MountHandle,
    runner: Rc<dyn Fn(Ticket<K>)>,
}

impl<K, T> Clone for QueryHandle<K, T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query,
            mount: self.mount.clone(),
            runner: self.runner.clone(),
        }
    }
}

impl<K: Clone + PartialEq + 'static, T: Clone + 'static> QueryHandle<K, T> {
    /// `{data, loading, error}`. Reading it subscribes the caller.
    pub fn state(&self) -> FetchState<T> {
        self.query.read().state().clone()
    }

    /// Fetch again for the current key, keeping the current data visible.
    pub fn refresh(&self) {
        let mut query = self.query;
        let ticket = query.write().refresh();
        if let Some(ticket) = ticket {
            (self.runner)(ticket);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_mounted()
    }
}

impl<K: Clone + PartialEq + 'static, T: Keyed + Clone + 'static> QueryHandle<K, Collection<T>> {
    /// Fold a realtime change into the cached rows. Returns `false` once
    /// the owner has unmounted.
    pub fn apply_change(&self, event: ChangeEvent<T>) -> bool {
        let mut query = self.query;
        self.mount.apply(move || {
            query.write().update_data(move |rows| {
                rows.apply(event.clone());
            });
        })
    }
}

/// Keyed fetch. `key` is re-evaluated reactively; `None` means "nothing to
/// fetch yet" (e.g. no signed-in user).
pub fn use_query<K, T, F, Fut>(
    key: impl FnMut() -> Option<K> + 'static,
    fetch: F,
) -> QueryHandle<K, T>
where
    K: Clone + PartialEq + 'static,
    T: Clone + 'static,
    F: Fn(K) -> Fut + 'static,
    Fut: Future<Output = Result<T, String>> + 'static,
{
    let query = use_signal(Query::<K, T>::new);
    let guard = use_hook(|| Rc::new(MountGuard::new()));
    {
        let guard = guard.clone();
        use_drop(move || guard.unmount());
    }

    let mount = guard.handle();
    let runner = use_hook(|| {
        let fetch = Rc::new(fetch);
        let mount = mount.clone();
        Rc::new(move |ticket: Ticket<K>| {
            let fetch = fetch.clone();
            let mount = mount.clone();
            let mut query = query;
            spawn(async move {
                let result = fetch(ticket.key.clone()).await;
                mount.apply(|| {
                    query.write().resolve(&ticket, result);
                });
            });
        }) as Rc<dyn Fn(Ticket<K>)>
    });

    let key = use_memo(key);
    {
        let runner = runner.clone();
        let mut query = query;
        use_effect(move || {
            let key = key();
            let ticket = query.write().set_key(key);
            if let Some(ticket) = ticket {
                runner(ticket);
            }
        });
    }

    QueryHandle {
        query,
        mount,
        runner,
    }
}

/// Keep `handle`'s rows in sync with a realtime subscription. The feed task
/// is replaced whenever the subscription changes and cancelled on unmount.
pub fn use_live_collection<K, T>(
    handle: &QueryHandle<K, Collection<T>>,
    subscription: Memo<Option<Subscription>>,
) where
    K: Clone + PartialEq + 'static,
    T: Keyed + Clone + DeserializeOwned + 'static,
{
    let auth = use_auth();
    let current = use_hook(|| Rc::new(Cell::new(None::<Task>)));

    {
        let handle = handle.clone();
        let current = current.clone();
        use_effect(move || {
            let subscription = subscription();
            if let Some(task) = current.take() {
                task.cancel();
            }
            if let Some(subscription) = subscription {
                let task = spawn(follow(auth.clone(), subscription, handle.clone()));
                current.set(Some(task));
            }
        });
    }

    use_drop(move || {
        if let Some(task) = current.take() {
            task.cancel();
        }
    });
}

async fn follow<K, T>(auth: Auth, subscription: Subscription, handle: QueryHandle<K, Collection<T>>)
where
    K: Clone + PartialEq + 'static,
    T: Keyed + Clone + DeserializeOwned + 'static,
{
    let backend = auth.backend();
    let mut failures: u32 = 0;

    while handle.is_mounted() {
        let token = auth.access_token();
        match ChangeFeed::connect(backend.config(), token.as_deref(), &subscription).await {
            Ok(mut feed) => {
                // Changes committed before the join only show up in a
                // fresh read.
                handle.refresh();
                failures = 0;
                while let Some(next) = feed.next_change().await {
                    match next {
                        Ok(raw) => match raw.decode::<T>() {
                            Ok(event) => {
                                if !handle.apply_change(event) {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(topic = %feed.topic(), "undecodable change event: {e}");
                            }
                        },
                        Err(e) => {
                            tracing::warn!(topic = %feed.topic(), "realtime feed failed: {e}");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(table = %subscription.table, "realtime connect failed: {e}");
            }
        }

        failures = (failures + 1).min(MAX_RECONNECT_STEPS);
        store::time::sleep(RECONNECT_DELAY * failures).await;
    }
}

/// Stats, recent transactions and investments for `user_id`.
pub fn use_dashboard(user_id: Memo<Option<String>>) -> QueryHandle<String, Dashboard> {
    let auth = use_auth();
    use_query(
        move || user_id(),
        move |user_id: String| {
            let auth = auth.clone();
            async move {
                let token = auth
                    .access_token()
                    .ok_or_else(|| AuthError::NotAuthenticated.to_string())?;
                auth.backend()
                    .dashboard(&token, &user_id)
                    .await
                    .map_err(|e| describe(&e))
            }
        },
    )
}

/// Active investment plans, kept live.
pub fn use_investment_plans() -> QueryHandle<(), Collection<InvestmentPlan>> {
    let auth = use_auth();
    let handle = use_query(
        || Some(()),
        move |()| {
            let auth = auth.clone();
            async move {
                let token = auth.access_token();
                let plans = auth
                    .backend()
                    .list_plans(token.as_deref())
                    .await
                    .map_err(|e| describe(&e))?;
                let mut rows = Collection::new();
                rows.replace_all(plans);
                Ok(rows)
            }
        },
    );
    let subscription = use_memo(|| Some(Subscription::table("investment_plans")));
    use_live_collection(&handle, subscription);
    handle
}

/// All of `user_id`'s transactions, kept live.
pub fn use_transactions(user_id: Memo<Option<String>>) -> QueryHandle<String, Collection<Transaction>> {
    let auth = use_auth();
    let handle = use_query(
        move || user_id(),
        move |user_id: String| {
            let auth = auth.clone();
            async move {
                let token = auth
                    .access_token()
                    .ok_or_else(|| AuthError::NotAuthenticated.to_string())?;
                let transactions = auth
                    .backend()
                    .list_transactions(&token, &user_id, None)
                    .await
                    .map_err(|e| describe(&e))?;
                let mut rows = Collection::new();
                rows.replace_all(transactions);
                Ok(rows)
            }
        },
    );
    let subscription = use_memo(move || {
        user_id().map(|id| Subscription::table("transactions").filter(format!("user_id=eq.{id}")))
    });
    use_live_collection(&handle, subscription);
    handle
}

/// Message shown to the user for a failed data request.
pub fn describe(err: &BackendError) -> String {
    match err {
        e if e.is_network() => AuthError::Network.to_string(),
        e if e.is_rejection() => "Your session has expired. Please sign in again.".to_string(),
        BackendError::Auth { message, .. } | BackendError::Server { message, .. } if !message.is_empty() => {
            message.clone()
        }
        BackendError::Server { status, .. } => format!("The server returned an error ({status})."),
        _ => "Received an unexpected response from the server.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_network_matches_auth_message() {
        let err = BackendError::Network("dns".into());
        assert_eq!(describe(&err), AuthError::Network.to_string());
    }

    #[test]
    fn test_describe_rejection() {
        let err = BackendError::Server {
            status: 401,
            message: "JWT expired".into(),
        };
        assert_eq!(describe(&err), "Your session has expired. Please sign in again.");
    }

    #[test]
    fn test_describe_server_message_and_fallbacks() {
        let err = BackendError::Server {
            status: 409,
            message: "duplicate key".into(),
        };
        assert_eq!(describe(&err), "duplicate key");

        let err = BackendError::Server {
            status: 500,
            message: String::new(),
        };
        assert_eq!(describe(&err), "The server returned an error (500).");

        let err = BackendError::Decode("eof".into());
        assert_eq!(describe(&err), "Received an unexpected response from the server.");
    }
}
