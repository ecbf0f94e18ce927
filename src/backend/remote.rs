use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use super::feed::{InsertFeed, Subscription};
use super::{Backend, MessageFilter, SortOrder, Table};
use crate::common::{Message, NewMessage, Profile};
use crate::error::BackendError;

/// Connection settings for the managed backend.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Project URL, e.g. `https://xyz.example.co`
    pub url: String,
    pub api_key: String,
    /// User session token; without it nobody is signed in.
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub feed_capacity: usize,
}

/// Adapter for the hosted auth + REST endpoints.
///
/// The hosted change feed is consumed by polling `messages` for rows newer
/// than a cursor; the poller only runs while a subscription is open.
#[derive(Clone)]
pub struct RemoteBackend {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    poll_interval: Duration,
    feed: Arc<InsertFeed>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl RemoteBackend {
    pub fn new(settings: RemoteSettings) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            inner: Arc::new(RemoteInner {
                http,
                base_url: settings.url.trim_end_matches('/').to_string(),
                api_key: settings.api_key,
                access_token: settings.access_token,
                poll_interval: settings.poll_interval,
                feed: InsertFeed::new(settings.feed_capacity),
                poller: Mutex::new(None),
            }),
        })
    }

    fn ensure_poller(&self) -> Result<(), BackendError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let mut poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let running = poller.as_ref().is_some_and(|handle| !handle.is_finished());
        if !running {
            log::info!(
                "Starting insert poller every {:?}",
                self.inner.poll_interval
            );
            *poller = Some(runtime.spawn(poll_inserts(Arc::clone(&self.inner))));
        }
        Ok(())
    }
}

impl RemoteInner {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Sends `request`; a 401 means the session token is no longer valid.
    async fn send_checked(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(BackendError::NotAuthenticated);
        }
        Ok(response.error_for_status()?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send_checked(request).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn messages_since(&self, cursor: DateTime<Utc>) -> Result<Vec<Message>, BackendError> {
        let since = cursor.to_rfc3339_opts(SecondsFormat::Micros, true);
        let request = self
            .request(Method::GET, "/rest/v1/messages")
            .query(&[
                ("select", "*".to_string()),
                ("created_at", format!("gte.{since}")),
                ("order", order_param(SortOrder::Ascending).to_string()),
            ]);
        self.send_json(request).await
    }

    /// Stops the poller when nobody listens. Checked under the same lock
    /// `ensure_poller` takes, so a new subscriber either sees a live poller
    /// or starts a fresh one.
    fn retire_poller_if_idle(&self) -> bool {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if self.feed.active_count() == 0 {
            poller.take();
            true
        } else {
            false
        }
    }
}

async fn poll_inserts(inner: Arc<RemoteInner>) {
    let mut cursor = Utc::now();
    let mut seen_at_cursor: HashSet<String> = HashSet::new();
    let mut ticker = tokio::time::interval(inner.poll_interval);

    loop {
        ticker.tick().await;
        if inner.retire_poller_if_idle() {
            log::info!("Insert poller stopped: no subscribers");
            break;
        }

        let rows = match inner.messages_since(cursor).await {
            Ok(rows) => rows,
            Err(err) => {
                log::warn!("Insert poll failed: {err}");
                continue;
            }
        };

        for row in rows {
            if row.created_at == cursor && seen_at_cursor.contains(&row.id) {
                continue;
            }
            if row.created_at > cursor {
                cursor = row.created_at;
                seen_at_cursor.clear();
            }
            seen_at_cursor.insert(row.id.clone());
            inner.feed.publish(row);
        }
    }
}

fn order_param(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "created_at.asc,id.asc",
        SortOrder::Descending => "created_at.desc,id.desc",
    }
}

/// Query-string form of a filter in the REST dialect.
fn filter_params(filter: &MessageFilter) -> Vec<(&'static str, String)> {
    match filter {
        MessageFilter::Involving { user_id } => vec![(
            "or",
            format!("(sender_id.eq.{user_id},receiver_id.eq.{user_id})"),
        )],
        MessageFilter::Between { a, b } => vec![(
            "or",
            format!(
                "(and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a}))"
            ),
        )],
        MessageFilter::UnreadFrom {
            sender_id,
            receiver_id,
        } => vec![
            ("sender_id", format!("eq.{sender_id}")),
            ("receiver_id", format!("eq.{receiver_id}")),
            ("read", "eq.false".to_string()),
        ],
    }
}

impl Backend for RemoteBackend {
    async fn current_user(&self) -> Result<Option<String>, BackendError> {
        if self.inner.access_token.is_none() {
            return Ok(None);
        }

        let response = self
            .inner
            .request(Method::GET, "/auth/v1/user")
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            log::info!("Access token rejected; treating session as signed out");
            return Ok(None);
        }

        let body = response.error_for_status()?.text().await?;
        let user: AuthUser = serde_json::from_str(&body)?;
        Ok(Some(user.id))
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        let request = self
            .inner
            .request(Method::GET, "/rest/v1/profiles")
            .query(&[
                ("select", "id,full_name,bio,skills".to_string()),
                ("id", format!("eq.{user_id}")),
            ]);
        let rows: Vec<Profile> = self.inner.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<Message>, BackendError> {
        let mut params = filter_params(filter);
        params.push(("select", "*".to_string()));
        params.push(("order", order_param(order).to_string()));

        let request = self
            .inner
            .request(Method::GET, "/rest/v1/messages")
            .query(&params);
        self.inner.send_json(request).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, BackendError> {
        let request = self
            .inner
            .request(Method::POST, "/rest/v1/messages")
            .header("Prefer", "return=representation")
            .json(&message);
        let rows: Vec<Message> = self.inner.send_json(request).await?;
        rows.into_iter().next().ok_or_else(|| {
            BackendError::UnexpectedResponse("insert returned no row".to_string())
        })
    }

    async fn mark_read(&self, filter: &MessageFilter) -> Result<(), BackendError> {
        let request = self
            .inner
            .request(Method::PATCH, "/rest/v1/messages")
            .query(&filter_params(filter))
            .json(&serde_json::json!({ "read": true }));
        self.inner.send_checked(request).await?;
        Ok(())
    }

    fn subscribe_inserts(&self, table: Table) -> Result<Subscription, BackendError> {
        if table != Table::Messages {
            return Err(BackendError::UnsupportedTable(table.name()));
        }
        let subscription = self.inner.feed.subscribe();
        self.ensure_poller()?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_filter_uses_nested_or() {
        let params = filter_params(&MessageFilter::Between {
            a: "u1".to_string(),
            b: "u2".to_string(),
        });
        assert_eq!(
            params,
            vec![(
                "or",
                "(and(sender_id.eq.u1,receiver_id.eq.u2),and(sender_id.eq.u2,receiver_id.eq.u1))"
                    .to_string()
            )]
        );
    }

    #[test]
    fn unread_filter_is_three_equalities() {
        let params = filter_params(&MessageFilter::UnreadFrom {
            sender_id: "u2".to_string(),
            receiver_id: "u1".to_string(),
        });
        assert_eq!(params.len(), 3);
        assert!(params.contains(&("read", "eq.false".to_string())));
    }

    /// Serves one `401 Unauthorized` to the first request on a local port.
    async fn reject_once() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.ends_with(b"}") {
                let read = socket.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
            }
            socket
                .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn rejected_token_on_mark_read_is_not_authenticated() {
        let backend = RemoteBackend::new(RemoteSettings {
            url: reject_once().await,
            api_key: "anon".to_string(),
            access_token: Some("expired".to_string()),
            poll_interval: Duration::from_millis(50),
            feed_capacity: 8,
        })
        .unwrap();

        let result = backend
            .mark_read(&MessageFilter::UnreadFrom {
                sender_id: "u2".to_string(),
                receiver_id: "u1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(BackendError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn no_token_means_signed_out() {
        let backend = RemoteBackend::new(RemoteSettings {
            url: "http://127.0.0.1:9".to_string(),
            api_key: "anon".to_string(),
            access_token: None,
            poll_interval: Duration::from_millis(50),
            feed_capacity: 8,
        })
        .unwrap();
        assert_eq!(backend.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn poller_retires_after_last_unsubscribe() {
        let backend = RemoteBackend::new(RemoteSettings {
            url: "http://127.0.0.1:9".to_string(),
            api_key: "anon".to_string(),
            access_token: None,
            poll_interval: Duration::from_millis(10),
            feed_capacity: 8,
        })
        .unwrap();

        let sub = backend.subscribe_inserts(Table::Messages).unwrap();
        sub.unsubscribe();

        let handle = backend.inner.poller.lock().unwrap().take();
        if let Some(handle) = handle {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("poller should stop")
                .unwrap();
        }
    }
}
