use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{multipart, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::governor::{retry_after, Cooldowns, GovernorConfig};
use crate::types::{
    Application, ApplyRequest, Envelope, Job, JobFilter, JobResume, LoginBody, NotificationList,
    Page, Session,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_FIELD: &str = "file";

#[derive(Debug, Clone)]
struct RawResponse {
    status: u16,
    body: Arc<str>,
}

type InFlight = Shared<BoxFuture<'static, Result<RawResponse, ClientError>>>;

struct FilePart {
    filename: String,
    mime: String,
    bytes: Vec<u8>,
}

impl FilePart {
    fn form(&self) -> Result<multipart::Form, ClientError> {
        let part = multipart::Part::bytes(self.bytes.clone())
            .file_name(self.filename.clone())
            .mime_str(&self.mime)?;
        Ok(multipart::Form::new().part(FILE_FIELD, part))
    }
}

enum Payload {
    Empty,
    Json(serde_json::Value),
    File(FilePart),
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    governor: GovernorConfig,
    permits: Semaphore,
    cooldowns: Cooldowns,
    in_flight: Mutex<HashMap<String, InFlight>>,
    token: RwLock<Option<String>>,
}

/// Governed client for the job board API. Cheap to clone; clones share the
/// governor and the bearer token.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, governor: GovernorConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                permits: Semaphore::new(governor.max_concurrent.max(1)),
                governor,
                cooldowns: Cooldowns::default(),
                in_flight: Mutex::new(HashMap::new()),
                token: RwLock::new(None),
            }),
        })
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.inner.token.write().await = token;
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.token.read().await.clone()
    }

    /// GET with in-flight deduplication: identical concurrent requests (same
    /// path and bearer token) share a single network call.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let token = self.token().await;
        let key = format!("{path}|{}", token.as_deref().unwrap_or_default());

        let shared = {
            let mut in_flight = self.inner.lock_in_flight();
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!("Joining in-flight GET {path}");
                    existing.clone()
                }
                None => {
                    let fut = self
                        .inner
                        .clone()
                        .send(Method::GET, path.to_string(), Payload::Empty, token)
                        .boxed()
                        .shared();
                    in_flight.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };

        // Retires the entry on completion and on cancellation alike.
        let _retire = Retire {
            inner: &self.inner,
            key,
            shared: shared.clone(),
        };
        let result = shared.await;

        decode(&result?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let payload = Payload::Json(serde_json::to_value(body)?);
        self.request(Method::POST, path, payload).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
    ) -> Result<T, ClientError> {
        let token = self.token().await;
        let raw = self
            .inner
            .clone()
            .send(method, path.to_string(), payload, token)
            .await?;
        decode(&raw)
    }

    /// Logs in and keeps the access token for later calls.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let session: Session = self
            .post("/api/auth/login", &LoginBody { email, password })
            .await?;
        self.set_token(Some(session.access_token.clone())).await;
        Ok(session)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .request::<()>(Method::POST, "/api/auth/logout", Payload::Empty)
            .await;
        self.set_token(None).await;
        result
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Page<Job>, ClientError> {
        self.post("/api/job/list", filter).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, ClientError> {
        self.get(&format!("/api/jobs/{job_id}")).await
    }

    pub async fn apply_to_job(
        &self,
        job_id: Uuid,
        request: &ApplyRequest,
    ) -> Result<Application, ClientError> {
        self.post(&format!("/api/jobs/{job_id}/apply"), request).await
    }

    pub async fn upload_job_resume(
        &self,
        job_id: Uuid,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<JobResume, ClientError> {
        if bytes.is_empty() {
            return Err(ClientError::InvalidRequest("file is empty".to_string()));
        }
        let file = FilePart {
            filename: filename.to_string(),
            mime: mime.to_string(),
            bytes,
        };
        self.request(
            Method::POST,
            &format!("/api/jobs/{job_id}/resume"),
            Payload::File(file),
        )
        .await
    }

    pub async fn notifications(&self, unread_only: bool) -> Result<NotificationList, ClientError> {
        self.get(&format!("/api/notifications?unread_only={unread_only}"))
            .await
    }
}

/// Removes a deduplicated GET from the in-flight map when its caller is
/// done with it, unless a newer request already took the slot.
struct Retire<'a> {
    inner: &'a Inner,
    key: String,
    shared: InFlight,
}

impl Drop for Retire<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.lock_in_flight();
        if in_flight.get(&self.key).is_some_and(|f| f.ptr_eq(&self.shared)) {
            in_flight.remove(&self.key);
        }
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends one logical request: waits out the endpoint cooldown, then
    /// retries 429 responses up to `max_retries` times. A concurrency permit
    /// is held only while a request is on the wire.
    async fn send(
        self: Arc<Self>,
        method: Method,
        path: String,
        payload: Payload,
        token: Option<String>,
    ) -> Result<RawResponse, ClientError> {
        let endpoint = path.split('?').next().unwrap_or(&path);
        self.cooldowns
            .wait_turn(endpoint, self.governor.cooldown_for(endpoint))
            .await;

        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ClientError::InvalidRequest("client is shut down".to_string()))?;

                let mut request = self.http.request(method.clone(), &url);
                if let Some(token) = &token {
                    request = request.bearer_auth(token);
                }
                request = match &payload {
                    Payload::Empty => request,
                    Payload::Json(body) => request.json(body),
                    Payload::File(file) => request.multipart(file.form()?),
                };

                let response = request.send().await?;
                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    Err(retry_after(response.headers()))
                } else {
                    let body = response.text().await?;
                    Ok(RawResponse {
                        status: status.as_u16(),
                        body: body.into(),
                    })
                }
            };

            let hint = match outcome {
                Ok(raw) => return Ok(raw),
                Err(hint) => hint,
            };
            if attempt >= self.governor.max_retries {
                warn!("{method} {path} still rate limited after {attempt} retries");
                return Err(ClientError::RateLimited { retries: attempt });
            }
            let delay = self.governor.retry_delay(hint, attempt);
            attempt += 1;
            warn!(
                "{method} {path} rate limited, retry {attempt}/{} in {}ms",
                self.governor.max_retries,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Unwraps the `{ success, message, data }` envelope.
fn decode<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, ClientError> {
    let ok_status = (200..300).contains(&raw.status);
    let envelope: Envelope = match serde_json::from_str(&raw.body) {
        Ok(envelope) => envelope,
        Err(e) if ok_status => return Err(e.into()),
        Err(_) => {
            return Err(ClientError::Api {
                status: raw.status,
                message: raw.body.to_string(),
            })
        }
    };
    if !ok_status || !envelope.success {
        return Err(ClientError::Api {
            status: raw.status,
            message: envelope.message,
        });
    }
    Ok(serde_json::from_value(envelope.data)?)
}
