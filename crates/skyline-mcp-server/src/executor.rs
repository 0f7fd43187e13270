//! Tool execution.
//!
//! `Execute` turns an operation plus raw arguments into a `Result`: validate
//! arguments, take a rate-limit token, consult the circuit breaker, build
//! the protocol-specific request, retry where safe, then truncate and
//! redact what comes back. One executor instance serves one profile.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{Map, Value, json};
use skyline_mcp_registry::model::{Operation, Service};
use tracing::{debug, warn};
use url::Url;

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::errors::GatewayError;
use crate::profile::{
    ApiConfig, AuthConfig, DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_RETRIES, DEFAULT_TIMEOUT,
    ProfileConfig,
};
use crate::rate_limit::RateLimiter;
use crate::redact::Redactor;

pub mod auth;
pub mod graphql;
pub mod jsonrpc;
pub mod rest;
pub mod validate;

use auth::ApiAuth;
use validate::ArgumentValidator;

/// Default circuit-breaker settings for APIs that configure none.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Retry backoff base; doubles per attempt with jitter, capped.
const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(2);

/// The outcome of a tool execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecuteResult {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub request_size: usize,
    pub response_size: usize,
    pub truncated: bool,
}

/// Per-API runtime state: base URL, credentials, and failure discipline.
struct ApiRuntime {
    base_url: Url,
    auth: Option<ApiAuth>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    timeout: Duration,
    retries: u32,
    max_response_bytes: usize,
}

/// An attempt-level failure, before retry classification.
enum AttemptError {
    Gateway(GatewayError),
    /// The transport failed. `connect` means the request never left the
    /// process, which makes a retry safe for any method.
    Transport { message: String, connect: bool },
}

impl From<GatewayError> for AttemptError {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}

pub struct Executor {
    client: reqwest::Client,
    apis: HashMap<String, ApiRuntime>,
    validators: HashMap<String, ArgumentValidator>,
    redactor: Arc<Redactor>,
}

impl Executor {
    pub fn new(
        services: &[Service],
        config: &ProfileConfig,
        redactor: Arc<Redactor>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;

        let mut apis = HashMap::new();
        let mut validators = HashMap::new();
        for service in services {
            let api_config = config.apis.iter().find(|api| api.name == service.name);
            apis.insert(
                service.name.clone(),
                Self::runtime_for(service, api_config),
            );
            for operation in &service.operations {
                validators.insert(
                    validator_key(operation),
                    ArgumentValidator::compile(&operation.input_schema)?,
                );
            }
        }

        Ok(Self {
            client,
            apis,
            validators,
            redactor,
        })
    }

    fn runtime_for(service: &Service, config: Option<&ApiConfig>) -> ApiRuntime {
        let rate = config.and_then(|c| c.rate_limit.clone()).unwrap_or_default();
        let (threshold, cooldown) = config
            .and_then(|c| c.circuit_breaker.as_ref())
            .map(|b| (b.failure_threshold, b.cooldown))
            .unwrap_or((DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN));
        ApiRuntime {
            base_url: service.base_url.clone(),
            auth: config
                .and_then(|c| c.auth.clone())
                .filter(|auth| !matches!(auth, AuthConfig::None))
                .map(ApiAuth::new),
            limiter: RateLimiter::new(rate.rpm, rate.rph, rate.rpd),
            breaker: CircuitBreaker::new(service.name.clone(), threshold, cooldown),
            timeout: config.and_then(|c| c.timeout).unwrap_or(DEFAULT_TIMEOUT),
            retries: config.and_then(|c| c.retries).unwrap_or(DEFAULT_RETRIES),
            max_response_bytes: config
                .and_then(|c| c.max_response_bytes)
                .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES),
        }
    }

    /// Circuit-breaker snapshots for admin reporting.
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.apis.values().map(|api| api.breaker.snapshot()).collect()
    }

    /// Execute one operation with the given arguments.
    pub async fn execute(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
    ) -> Result<ExecuteResult, GatewayError> {
        let result = self.execute_inner(operation, arguments).await;
        // Nothing leaves the executor unredacted, success or failure.
        match result {
            Ok(mut res) => {
                res.body = self.redactor.redact(&res.body);
                Ok(res)
            }
            Err(e) => Err(self.redact_error(e)),
        }
    }

    async fn execute_inner(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
    ) -> Result<ExecuteResult, GatewayError> {
        if let Some(validator) = self.validators.get(&validator_key(operation)) {
            validator.validate(arguments)?;
        }

        let runtime = self.apis.get(&operation.service_name).ok_or_else(|| {
            GatewayError::Internal(format!(
                "no runtime for service '{}'",
                operation.service_name
            ))
        })?;

        // The limiter may block for an RPM refill; bound it by the API
        // timeout so a caller is never parked longer than one request
        // budget.
        tokio::time::timeout(runtime.timeout, runtime.limiter.wait())
            .await
            .map_err(|_| GatewayError::Timeout)??;

        runtime.breaker.allow()?;

        let outcome = if operation
            .graphql
            .as_ref()
            .is_some_and(|gql| gql.composite.is_some())
        {
            // Composite orchestration issues multiple writes; it manages its
            // own failure reporting and is never retried as a unit.
            self.execute_composite(operation, arguments, runtime)
                .await
                .map_err(|e| match e {
                    AttemptError::Gateway(e) => e,
                    AttemptError::Transport { message, .. } => transport_error(message),
                })
        } else {
            self.execute_with_retry(operation, arguments, runtime).await
        };

        match &outcome {
            Ok(result) if result.status < 500 => runtime.breaker.record_success(),
            Ok(result) => runtime
                .breaker
                .record_failure(&format!("status {}", result.status)),
            Err(e) => match e {
                // Pre-flight rejections say nothing about upstream health.
                GatewayError::BadArguments(_)
                | GatewayError::RateLimited { .. }
                | GatewayError::CircuitOpen { .. } => {}
                other => runtime.breaker.record_failure(&other.to_string()),
            },
        }

        outcome.map(|result| truncate_result(result, runtime.max_response_bytes))
    }

    async fn execute_with_retry(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
        runtime: &ApiRuntime,
    ) -> Result<ExecuteResult, GatewayError> {
        let idempotent = matches!(operation.http_method.as_str(), "GET" | "HEAD" | "OPTIONS");
        let mut attempt = 0u32;
        loop {
            match self.attempt(operation, arguments, runtime).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let (surfaced, retryable) = match error {
                        AttemptError::Transport { message, connect } => {
                            // A connect failure never reached the upstream,
                            // so even a write is safe to retry.
                            (transport_error(message), connect || idempotent)
                        }
                        AttemptError::Gateway(e) => {
                            let retryable = idempotent && e.is_retryable();
                            (e, retryable)
                        }
                    };
                    if !retryable || attempt >= runtime.retries {
                        return Err(surfaced);
                    }
                    attempt += 1;
                    let backoff = backoff_with_jitter(attempt);
                    debug!(
                        tool = %operation.tool_name,
                        attempt, "retrying after {backoff:?}: {surfaced}"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// One protocol-specific request attempt.
    async fn attempt(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
        runtime: &ApiRuntime,
    ) -> Result<ExecuteResult, AttemptError> {
        if operation.graphql.is_some() {
            self.attempt_graphql(operation, arguments, runtime).await
        } else if operation.json_rpc.is_some() {
            self.attempt_jsonrpc(operation, arguments, runtime).await
        } else {
            self.attempt_rest(operation, arguments, runtime).await
        }
    }

    async fn attempt_rest(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
        runtime: &ApiRuntime,
    ) -> Result<ExecuteResult, AttemptError> {
        let built = rest::build_request(&self.client, &runtime.base_url, operation, arguments)?;
        let response = self
            .send(built.request, runtime)
            .await?;
        if response.status >= 400 {
            return Err(AttemptError::Gateway(GatewayError::Upstream {
                status: response.status,
                body: response.body,
            }));
        }
        Ok(ExecuteResult {
            status: response.status,
            content_type: response.content_type,
            response_size: response.body.len(),
            body: response.body,
            request_size: built.request_size,
            truncated: false,
        })
    }

    async fn attempt_jsonrpc(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
        runtime: &ApiRuntime,
    ) -> Result<ExecuteResult, AttemptError> {
        let envelope = jsonrpc::build_envelope(operation, arguments);
        let request_size = envelope.to_string().len();
        let request = self.client.post(runtime.base_url.clone()).json(&envelope);
        let response = self.send(request, runtime).await?;
        if response.status >= 400 {
            return Err(AttemptError::Gateway(GatewayError::Upstream {
                status: response.status,
                body: response.body,
            }));
        }
        let parsed: Value = serde_json::from_str(&response.body).map_err(|e| {
            AttemptError::Gateway(GatewayError::Upstream {
                status: response.status,
                body: format!("invalid JSON-RPC response: {e}"),
            })
        })?;
        let result = jsonrpc::unwrap_response(&parsed)?;
        let body = result.to_string();
        Ok(ExecuteResult {
            status: response.status,
            content_type: Some("application/json".to_string()),
            response_size: body.len(),
            body,
            request_size,
            truncated: false,
        })
    }

    async fn attempt_graphql(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
        runtime: &ApiRuntime,
    ) -> Result<ExecuteResult, AttemptError> {
        let gql = operation
            .graphql
            .as_ref()
            .ok_or_else(|| AttemptError::Gateway(GatewayError::Internal(
                "graphql attempt on non-graphql operation".to_string(),
            )))?;
        let request = graphql::build_request(gql, arguments)?;
        let (status, body) = self.send_graphql(&request, runtime).await?;
        if graphql::is_error_response(&body) {
            return Err(AttemptError::Gateway(GatewayError::Upstream {
                status: 502,
                body: body
                    .get("errors")
                    .cloned()
                    .unwrap_or(Value::Null)
                    .to_string(),
            }));
        }
        let text = body.to_string();
        Ok(ExecuteResult {
            status,
            content_type: Some("application/json".to_string()),
            request_size: request.query.len(),
            response_size: text.len(),
            body: text,
            truncated: false,
        })
    }

    /// Composite orchestration: create → update → set-ops, aborting on the
    /// first failed step, reporting per-step status in the body.
    async fn execute_composite(
        &self,
        operation: &Operation,
        arguments: &Map<String, Value>,
        runtime: &ApiRuntime,
    ) -> Result<ExecuteResult, AttemptError> {
        let gql = operation.graphql.as_ref().ok_or_else(|| {
            AttemptError::Gateway(GatewayError::Internal(
                "composite execution on non-graphql operation".to_string(),
            ))
        })?;
        let composite = gql.composite.as_ref().ok_or_else(|| {
            AttemptError::Gateway(GatewayError::Internal(
                "composite execution without composite metadata".to_string(),
            ))
        })?;

        let id_arg = graphql::id_arg_name(gql);
        let steps = graphql::plan_steps(composite, &id_arg, arguments);
        if steps.is_empty() {
            return Err(AttemptError::Gateway(GatewayError::BadArguments(
                "no composite step matches the given arguments".to_string(),
            )));
        }

        let mut id_value = arguments.get(&id_arg).cloned().filter(|v| !v.is_null());
        let mut report: Vec<Value> = Vec::new();
        let mut request_size = 0;
        let mut failed = false;

        for step in &steps {
            let field = match step.kind {
                graphql::StepKind::Create => composite.create.as_ref(),
                graphql::StepKind::Update => composite.update.as_ref(),
                graphql::StepKind::SetOp => composite
                    .set_ops
                    .iter()
                    .find(|op| op.field_name == step.field_name),
            };
            let Some(field) = field else {
                continue;
            };
            let request =
                graphql::build_step_request(field, &id_arg, id_value.as_ref(), arguments);
            request_size += request.query.len();

            match self.send_graphql(&request, runtime).await {
                Ok((_, body)) if !graphql::is_error_response(&body) => {
                    if step.kind == graphql::StepKind::Create && id_value.is_none() {
                        id_value = graphql::find_id(&body);
                    }
                    report.push(json!({
                        "field": step.field_name,
                        "status": "ok",
                        "data": body.get("data").cloned().unwrap_or(Value::Null),
                    }));
                }
                Ok((_, body)) => {
                    report.push(json!({
                        "field": step.field_name,
                        "status": "error",
                        "error": body.get("errors").cloned().unwrap_or(Value::Null),
                    }));
                    failed = true;
                }
                Err(e) => {
                    let message = match e {
                        AttemptError::Gateway(e) => e.to_string(),
                        AttemptError::Transport { message, .. } => message,
                    };
                    report.push(json!({
                        "field": step.field_name,
                        "status": "error",
                        "error": message,
                    }));
                    failed = true;
                }
            }
            if failed {
                warn!(
                    tool = %operation.tool_name,
                    step = %step.field_name,
                    "composite step failed, aborting remaining steps"
                );
                break;
            }
        }

        let aborted = failed && report.len() < steps.len();
        let body = json!({
            "id": id_value,
            "steps": report,
            "aborted": aborted,
        })
        .to_string();
        Ok(ExecuteResult {
            status: if failed { 502 } else { 200 },
            content_type: Some("application/json".to_string()),
            request_size,
            response_size: body.len(),
            body,
            truncated: false,
        })
    }

    async fn send_graphql(
        &self,
        request: &graphql::GraphQlRequest,
        runtime: &ApiRuntime,
    ) -> Result<(u16, Value), AttemptError> {
        let payload = json!({
            "query": request.query,
            "variables": request.variables,
        });
        let http = self.client.post(runtime.base_url.clone()).json(&payload);
        let response = self.send(http, runtime).await?;
        if response.status >= 400 {
            return Err(AttemptError::Gateway(GatewayError::Upstream {
                status: response.status,
                body: response.body,
            }));
        }
        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            AttemptError::Gateway(GatewayError::Upstream {
                status: response.status,
                body: format!("invalid GraphQL response: {e}"),
            })
        })?;
        Ok((response.status, body))
    }

    /// Apply auth, enforce the per-API timeout, classify transport errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        runtime: &ApiRuntime,
    ) -> Result<RawResponse, AttemptError> {
        let mut request = request.timeout(runtime.timeout);
        if let Some(auth) = &runtime.auth {
            request = auth.apply(request, &self.client, &self.redactor).await?;
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Gateway(GatewayError::Timeout)
            } else {
                AttemptError::Transport {
                    message: e.to_string(),
                    connect: e.is_connect(),
                }
            }
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if status == 401 {
            if let Some(auth) = &runtime.auth {
                auth.invalidate().await;
            }
        }
        let body = response.text().await.map_err(|e| AttemptError::Transport {
            message: e.to_string(),
            connect: false,
        })?;
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    fn redact_error(&self, error: GatewayError) -> GatewayError {
        match error {
            GatewayError::Upstream { status, body } => GatewayError::Upstream {
                status,
                body: self.redactor.redact(&body),
            },
            GatewayError::BadArguments(message) => {
                GatewayError::BadArguments(self.redactor.redact(&message))
            }
            GatewayError::Internal(message) => {
                GatewayError::Internal(self.redactor.redact(&message))
            }
            other => other,
        }
    }
}

struct RawResponse {
    status: u16,
    content_type: Option<String>,
    body: String,
}

fn validator_key(operation: &Operation) -> String {
    format!("{}::{}", operation.service_name, operation.id)
}

fn transport_error(message: String) -> GatewayError {
    GatewayError::Upstream {
        status: 502,
        body: format!("transport error: {message}"),
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(4));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
    (exp + jitter).min(BACKOFF_CAP)
}

fn truncate_result(mut result: ExecuteResult, max_bytes: usize) -> ExecuteResult {
    if result.body.len() <= max_bytes {
        return result;
    }
    let mut cut = max_bytes;
    while cut > 0 && !result.body.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = result.body.len() - cut;
    result.body.truncate(cut);
    result
        .body
        .push_str(&format!("\n[response truncated, {dropped} bytes dropped]"));
    result.truncated = true;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyline_mcp_registry::model::{
        GraphQlOperation, GraphQlOperationType, Parameter, ParameterLocation, object_schema,
    };
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rest_operation(_base: &str, id: &str, http_method: &str) -> Operation {
        Operation {
            service_name: "svc".into(),
            id: id.into(),
            tool_name: format!("svc_{id}"),
            http_method: http_method.into(),
            path: format!("/{id}"),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: "q".into(),
                location: ParameterLocation::Query,
                required: false,
                schema: json!({"type": "string"}),
            }],
            request_body: None,
            static_headers: BTreeMap::new(),
            input_schema: json!({
                "type": "object",
                "properties": {"q": {"type": "string"}},
            }),
            response_schema: None,
            content_type: None,
            graphql: None,
            json_rpc: None,
        }
    }

    fn service(base: &str, operations: Vec<Operation>) -> Service {
        Service {
            name: "svc".into(),
            base_url: Url::parse(base).unwrap(),
            operations,
        }
    }

    fn executor(services: &[Service]) -> Executor {
        Executor::new(services, &ProfileConfig::default(), Arc::new(Redactor::new())).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn rest_success_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/things"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"items":[]}"#)
                    .insert_header("content-type", "application/json"),
            )
            .mount(&server)
            .await;

        let op = rest_operation(&server.uri(), "things", "GET");
        let exec = executor(&[service(&server.uri(), vec![op.clone()])]);
        let result = exec.execute(&op, &args(json!({"q": "x"}))).await.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.body, r#"{"items":[]}"#);
        assert_eq!(result.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_any_request() {
        let op = Operation {
            input_schema: json!({
                "type": "object",
                "properties": {"n": {"type": "integer"}},
                "required": ["n"],
            }),
            ..rest_operation("http://127.0.0.1:1", "strict", "GET")
        };
        let exec = executor(&[service("http://127.0.0.1:1", vec![op.clone()])]);
        let result = exec.execute(&op, &args(json!({}))).await;
        assert!(matches!(result, Err(GatewayError::BadArguments(_))));
    }

    #[tokio::test]
    async fn retries_5xx_for_idempotent_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let op = rest_operation(&server.uri(), "flaky", "GET");
        let exec = executor(&[service(&server.uri(), vec![op.clone()])]);
        let result = exec.execute(&op, &args(json!({}))).await.unwrap();
        assert_eq!(result.body, "ok");
    }

    #[tokio::test]
    async fn does_not_retry_5xx_for_writes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;

        let op = rest_operation(&server.uri(), "orders", "POST");
        let exec = executor(&[service(&server.uri(), vec![op.clone()])]);
        let result = exec.execute(&op, &args(json!({}))).await;
        assert!(matches!(
            result,
            Err(GatewayError::Upstream { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn response_truncated_with_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let op = rest_operation(&server.uri(), "big", "GET");
        let mut config = ProfileConfig {
            apis: vec![ApiConfig {
                name: "svc".into(),
                spec_url: "https://unused".into(),
                base_url: None,
                spec_type: None,
                auth: None,
                operation_filters: None,
                max_response_bytes: Some(100),
                timeout: None,
                retries: None,
                rate_limit: None,
                circuit_breaker: None,
                graphql: None,
            }],
            ..Default::default()
        };
        config.apply_defaults();
        let exec = Executor::new(
            &[service(&server.uri(), vec![op.clone()])],
            &config,
            Arc::new(Redactor::new()),
        )
        .unwrap();

        let result = exec.execute(&op, &args(json!({}))).await.unwrap();
        assert!(result.truncated);
        assert!(result.body.contains("[response truncated"));
        assert_eq!(result.response_size, 4096);
    }

    #[tokio::test]
    async fn secrets_are_redacted_from_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leak"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("token is sekrit-value-123"),
            )
            .mount(&server)
            .await;

        let op = rest_operation(&server.uri(), "leak", "GET");
        let redactor = Arc::new(Redactor::new());
        redactor.register("sekrit-value-123");
        let exec = Executor::new(
            &[service(&server.uri(), vec![op.clone()])],
            &ProfileConfig::default(),
            redactor,
        )
        .unwrap();

        let result = exec.execute(&op, &args(json!({}))).await.unwrap();
        assert_eq!(result.body, "token is [REDACTED]");
    }

    fn graphql_composite_operation(_server: &str) -> Operation {
        use skyline_mcp_registry::model::{CompositeField, CompositeOperation};
        let composite = CompositeOperation {
            base_type: "Issue".into(),
            create: Some(CompositeField {
                field_name: "createIssue".into(),
                arg_types: BTreeMap::from([("title".to_string(), "String!".to_string())]),
                arg_group: vec!["title".into()],
                default_selection: "{ issue { id } }".into(),
            }),
            update: Some(CompositeField {
                field_name: "updateIssue".into(),
                arg_types: BTreeMap::from([
                    ("id".to_string(), "ID!".to_string()),
                    ("title".to_string(), "String".to_string()),
                ]),
                arg_group: vec!["title".into()],
                default_selection: "{ issue { id } }".into(),
            }),
            delete: None,
            set_ops: vec![CompositeField {
                field_name: "issueSetLabels".into(),
                arg_types: BTreeMap::from([
                    ("id".to_string(), "ID!".to_string()),
                    ("labels".to_string(), "[String!]!".to_string()),
                ]),
                arg_group: vec!["labels".into()],
                default_selection: "{ issue { id } }".into(),
            }],
        };
        Operation {
            service_name: "svc".into(),
            id: "issue_manage".into(),
            tool_name: "svc_issue_manage".into(),
            http_method: "POST".into(),
            path: String::new(),
            summary: None,
            description: None,
            parameters: vec![],
            request_body: None,
            static_headers: BTreeMap::new(),
            input_schema: json!({"type": "object", "properties": {}}),
            response_schema: None,
            content_type: Some("application/json".into()),
            graphql: Some(GraphQlOperation {
                operation_type: GraphQlOperationType::Mutation,
                field_name: "issue".into(),
                arg_types: BTreeMap::from([("id".to_string(), "ID!".to_string())]),
                default_selection: "{ issue { id } }".into(),
                requires_selection: false,
                composite: Some(composite),
            }),
            json_rpc: None,
        }
    }

    #[tokio::test]
    async fn composite_creates_then_applies_set_ops_with_captured_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"variables": {"title": "New"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"createIssue": {"issue": {"id": "i-9"}}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                json!({"variables": {"id": "i-9", "labels": ["bug"]}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"issueSetLabels": {"issue": {"id": "i-9"}}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = graphql_composite_operation(&server.uri());
        let exec = executor(&[service(&server.uri(), vec![op.clone()])]);
        let result = exec
            .execute(&op, &args(json!({"title": "New", "labels": ["bug"]})))
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        let body: Value = serde_json::from_str(&result.body).unwrap();
        assert_eq!(body["id"], json!("i-9"));
        assert_eq!(body["steps"].as_array().unwrap().len(), 2);
        assert_eq!(body["aborted"], json!(false));
    }

    #[tokio::test]
    async fn composite_aborts_after_first_failed_step() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "boom"}],
                "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = graphql_composite_operation(&server.uri());
        let exec = executor(&[service(&server.uri(), vec![op.clone()])]);
        let result = exec
            .execute(&op, &args(json!({"title": "New", "labels": ["bug"]})))
            .await
            .unwrap();

        assert_eq!(result.status, 502);
        let body: Value = serde_json::from_str(&result.body).unwrap();
        let steps = body["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0]["status"], json!("error"));
        assert_eq!(body["aborted"], json!(true));
    }
}
