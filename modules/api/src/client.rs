use std::sync::Arc;
use std::time::Duration;

use easm_core::connect::{self, ConnectionDefaults};
use easm_core::error::normalize;
use easm_core::store::LocalStore;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    AlertQuery, AlertRecord, ApiRisk, ApiRiskQuery, Asset, AssetImport, AssetImportResult,
    AssetQuery, DagTemplate, DagTemplateQuery, EventTrigger, EventTriggerPatch,
    EventTriggerQuery, Health, NewDagTemplate, NewEventTrigger, NewProject, NewScanTask, Page,
    Project, RiskScore, RiskScoreQuery, ScanQuery, ScanTask, Vulnerability, VulnerabilityQuery,
    VulnerabilityStats,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const API_KEY_HEADER: &str = "X-API-Key";
const PROJECT_PAGE_LIMIT: u32 = 200;

/// The single message every failed request is reduced to. Callers
/// never see the structured failure detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ApiError(pub String);

/// One HTTP client for the EASM backend. The base URL and API key are
/// resolved per request, so runtime overrides written to the store
/// take effect without rebuilding the client.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    defaults: ConnectionDefaults,
    store: Arc<LocalStore>,
}

impl ApiClient {
    pub fn new(defaults: ConnectionDefaults, store: Arc<LocalStore>) -> Self {
        Self::with_timeout(defaults, store, DEFAULT_TIMEOUT)
    }

    /// The timeout is fixed for the life of the client; there is no
    /// per-request override.
    pub fn with_timeout(
        defaults: ConnectionDefaults,
        store: Arc<LocalStore>,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder().timeout(timeout).build().expect("client");
        ApiClient { http, defaults, store }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let conn = connect::resolve(&self.defaults, &self.store);
        let url = format!("{}{}", conn.base_url.trim_end_matches('/'), path);
        let mut builder = self.http.request(method, url);
        if let Some(key) = conn.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return Err(ApiError(normalize(None, Some(&err.to_string()), None))),
        };
        let status = response.status();
        if !status.is_success() {
            let body: Option<Value> = response.json().await.ok();
            let status_text = format!("request failed with status code {}", status.as_u16());
            return Err(ApiError(normalize(body.as_ref(), Some(&status_text), None)));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError(normalize(None, None, Some(&err.to_string()))))
    }

    async fn get<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn health(&self) -> Result<Health, ApiError> {
        self.send(self.request(Method::GET, "/health")).await
    }

    /// First page, large page size; the workspace treats this as the
    /// whole project list.
    pub async fn list_projects(&self) -> Result<Page<Project>, ApiError> {
        self.get("/projects", &[("offset", 0u32), ("limit", PROJECT_PAGE_LIMIT)])
            .await
    }

    pub async fn create_project(&self, payload: &NewProject) -> Result<Project, ApiError> {
        self.post("/projects", payload).await
    }

    pub async fn list_assets(
        &self,
        project_id: Uuid,
        query: &AssetQuery,
    ) -> Result<Page<Asset>, ApiError> {
        self.get(&format!("/projects/{project_id}/assets"), query).await
    }

    pub async fn import_assets(
        &self,
        project_id: Uuid,
        assets: &[AssetImport],
    ) -> Result<AssetImportResult, ApiError> {
        #[derive(Serialize)]
        struct Body<'a> {
            assets: &'a [AssetImport],
        }
        self.post(&format!("/projects/{project_id}/assets/import"), &Body { assets })
            .await
    }

    pub async fn list_scans(
        &self,
        project_id: Uuid,
        query: &ScanQuery,
    ) -> Result<Page<ScanTask>, ApiError> {
        self.get(&format!("/projects/{project_id}/scans"), query).await
    }

    pub async fn create_scan(
        &self,
        project_id: Uuid,
        payload: &NewScanTask,
    ) -> Result<ScanTask, ApiError> {
        self.post(&format!("/projects/{project_id}/scans"), payload).await
    }

    pub async fn start_scan(&self, project_id: Uuid, task_id: Uuid) -> Result<ScanTask, ApiError> {
        self.send(
            self.request(Method::POST, &format!("/projects/{project_id}/scans/{task_id}/start")),
        )
        .await
    }

    pub async fn list_vulnerabilities(
        &self,
        project_id: Uuid,
        query: &VulnerabilityQuery,
    ) -> Result<Page<Vulnerability>, ApiError> {
        self.get(&format!("/projects/{project_id}/vulnerabilities"), query).await
    }

    pub async fn vulnerability_stats(
        &self,
        project_id: Uuid,
    ) -> Result<VulnerabilityStats, ApiError> {
        self.send(self.request(Method::GET, &format!("/projects/{project_id}/vulnerabilities/stats")))
            .await
    }

    pub async fn list_api_risks(
        &self,
        project_id: Uuid,
        query: &ApiRiskQuery,
    ) -> Result<Page<ApiRisk>, ApiError> {
        self.get(&format!("/projects/{project_id}/api-risks"), query).await
    }

    pub async fn list_risk_scores(
        &self,
        project_id: Uuid,
        query: &RiskScoreQuery,
    ) -> Result<Page<RiskScore>, ApiError> {
        self.get(&format!("/projects/{project_id}/risk/scores"), query).await
    }

    pub async fn list_alerts(
        &self,
        project_id: Uuid,
        query: &AlertQuery,
    ) -> Result<Page<AlertRecord>, ApiError> {
        self.get(&format!("/projects/{project_id}/alerts"), query).await
    }

    pub async fn list_dag_templates(
        &self,
        project_id: Uuid,
        query: &DagTemplateQuery,
    ) -> Result<Page<DagTemplate>, ApiError> {
        self.get(&format!("/projects/{project_id}/dag-templates"), query).await
    }

    pub async fn create_dag_template(
        &self,
        project_id: Uuid,
        payload: &NewDagTemplate,
    ) -> Result<DagTemplate, ApiError> {
        self.post(&format!("/projects/{project_id}/dag-templates"), payload).await
    }

    pub async fn list_event_triggers(
        &self,
        project_id: Uuid,
        query: &EventTriggerQuery,
    ) -> Result<Page<EventTrigger>, ApiError> {
        self.get(&format!("/projects/{project_id}/event-triggers"), query).await
    }

    pub async fn create_event_trigger(
        &self,
        project_id: Uuid,
        payload: &NewEventTrigger,
    ) -> Result<EventTrigger, ApiError> {
        self.post(&format!("/projects/{project_id}/event-triggers"), payload).await
    }

    pub async fn update_event_trigger(
        &self,
        project_id: Uuid,
        trigger_id: Uuid,
        patch: &EventTriggerPatch,
    ) -> Result<EventTrigger, ApiError> {
        self.send(
            self.request(
                Method::PATCH,
                &format!("/projects/{project_id}/event-triggers/{trigger_id}"),
            )
            .json(patch),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetType;

    fn query_string<Q: Serialize>(query: &Q) -> String {
        Client::new()
            .get("http://example.invalid/")
            .query(query)
            .build()
            .unwrap()
            .url()
            .query()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn unset_query_fields_are_omitted() {
        let q = ScanQuery { status: Some("running".into()), ..Default::default() };
        assert_eq!(query_string(&q), "status=running");
        assert_eq!(query_string(&ScanQuery::default()), "");
    }

    #[test]
    fn asset_type_serializes_lowercase_in_queries() {
        let q = AssetQuery {
            asset_type: Some(AssetType::Domain),
            offset: Some(0),
            limit: Some(50),
        };
        assert_eq!(query_string(&q), "asset_type=domain&offset=0&limit=50");
    }

    #[test]
    fn resolved_key_becomes_header() {
        let store = Arc::new(LocalStore::open(
            std::env::temp_dir().join(format!("easm-client-test-{}.json", Uuid::new_v4())),
        ));
        store.set(easm_core::connect::API_KEY_KEY, "runtime-key");
        let client = ApiClient::new(ConnectionDefaults::default(), store);
        let request = client.request(Method::GET, "/health").build().unwrap();
        assert_eq!(
            request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()),
            Some("runtime-key")
        );
        assert_eq!(request.url().as_str(), "http://localhost:8000/health");
    }

    #[test]
    fn no_header_without_a_key() {
        let store = Arc::new(LocalStore::open(
            std::env::temp_dir().join(format!("easm-client-test-{}.json", Uuid::new_v4())),
        ));
        let client = ApiClient::new(ConnectionDefaults::default(), store);
        let request = client.request(Method::GET, "/health").build().unwrap();
        assert!(request.headers().get(API_KEY_HEADER).is_none());
    }

    #[test]
    fn base_url_override_applies_per_request() {
        let store = Arc::new(LocalStore::open(
            std::env::temp_dir().join(format!("easm-client-test-{}.json", Uuid::new_v4())),
        ));
        let client = ApiClient::new(ConnectionDefaults::default(), store.clone());
        store.set(easm_core::connect::BASE_URL_KEY, "http://other:9000/");
        let request = client.request(Method::GET, "/projects").build().unwrap();
        assert_eq!(request.url().as_str(), "http://other:9000/projects");
    }
}
