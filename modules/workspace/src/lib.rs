//! Active-project selection for the EASM client. One `Workspace`
//! instance lives for the whole process; it owns the known project
//! list and reconciles the persisted selection against server state
//! on every reload (projects can be created, renamed, or deleted out
//! from under a stale selection).

use std::sync::Arc;

use easm_api::models::{NewProject, Page, Project};
use easm_api::{ApiClient, ApiError};
use easm_core::store::LocalStore;
use uuid::Uuid;

/// Store key mirroring the in-memory selection.
pub const ACTIVE_PROJECT_KEY: &str = "active_project_id";

/// Where the workspace gets its projects from. `ApiClient` is the
/// production implementation; tests substitute a scripted stub.
pub trait ProjectSource {
    fn list_projects(&self) -> impl std::future::Future<Output = Result<Page<Project>, ApiError>>;
    fn create_project(
        &self,
        payload: &NewProject,
    ) -> impl std::future::Future<Output = Result<Project, ApiError>>;
}

impl ProjectSource for ApiClient {
    async fn list_projects(&self) -> Result<Page<Project>, ApiError> {
        ApiClient::list_projects(self).await
    }

    async fn create_project(&self, payload: &NewProject) -> Result<Project, ApiError> {
        ApiClient::create_project(self, payload).await
    }
}

pub struct Workspace<S: ProjectSource> {
    source: S,
    store: Arc<LocalStore>,
    projects: Vec<Project>,
    loading: bool,
    selected: Option<Uuid>,
}

impl<S: ProjectSource> Workspace<S> {
    /// Seeds the selection from the store; an absent or unparsable
    /// value means no selection.
    pub fn new(source: S, store: Arc<LocalStore>) -> Self {
        let selected = store
            .get(ACTIVE_PROJECT_KEY)
            .and_then(|raw| raw.parse().ok());
        Workspace { source, store, projects: Vec::new(), loading: false, selected }
    }

    /// Server order, as returned by the last successful load.
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn selected_project_id(&self) -> Option<Uuid> {
        self.selected
    }

    /// Derived view: the selected element of the current list, if any.
    pub fn selected_project(&self) -> Option<&Project> {
        let id = self.selected?;
        self.projects.iter().find(|p| p.id == id)
    }

    /// Reload the project list and reconcile the selection:
    /// an empty list clears both the in-memory and persisted
    /// selection; a selection still present in the new list is kept;
    /// anything else falls back to the first returned project, which
    /// is then persisted. On failure the list and in-memory selection
    /// reset (the persisted value is left alone) and the normalized
    /// error propagates.
    ///
    /// Overlapping calls are not deduplicated: each call flips
    /// `loading` for its own round trip and the last to settle wins.
    pub async fn load_projects(&mut self) -> Result<(), ApiError> {
        self.loading = true;
        let result = self.source.list_projects().await;
        self.loading = false;

        match result {
            Ok(page) => {
                self.projects = page.items;
                if self.projects.is_empty() {
                    self.selected = None;
                    self.store.remove(ACTIVE_PROJECT_KEY);
                    return Ok(());
                }
                let still_exists = self
                    .selected
                    .is_some_and(|id| self.projects.iter().any(|p| p.id == id));
                if !still_exists {
                    let first = self.projects[0].id;
                    self.selected = Some(first);
                    self.store.set(ACTIVE_PROJECT_KEY, &first.to_string());
                }
                Ok(())
            }
            Err(err) => {
                self.projects.clear();
                self.selected = None;
                Err(err)
            }
        }
    }

    /// Unconditional: membership in the current list is the caller's
    /// responsibility (`load_projects` is the reconciling path).
    pub fn set_selected_project(&mut self, id: Uuid) {
        self.selected = Some(id);
        self.store.set(ACTIVE_PROJECT_KEY, &id.to_string());
    }

    /// Create, then reload so the new project becomes reachable (and
    /// selected, when it is the only project or the prior selection is
    /// gone). A failed create skips the reload; a failed reload
    /// propagates even though the create already took effect
    /// server-side.
    pub async fn create_project_and_refresh(
        &mut self,
        payload: &NewProject,
    ) -> Result<(), ApiError> {
        self.source.create_project(payload).await?;
        self.load_projects().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    struct StubSource {
        lists: Mutex<VecDeque<Result<Page<Project>, ApiError>>>,
        creates: Mutex<VecDeque<Result<Project, ApiError>>>,
    }

    impl StubSource {
        fn new() -> Self {
            StubSource { lists: Mutex::new(VecDeque::new()), creates: Mutex::new(VecDeque::new()) }
        }

        fn push_list(self, result: Result<Vec<Project>, ApiError>) -> Self {
            let result = result.map(|items| Page { total: items.len() as i64, items });
            self.lists.lock().unwrap().push_back(result);
            self
        }

        fn push_create(self, result: Result<Project, ApiError>) -> Self {
            self.creates.lock().unwrap().push_back(result);
            self
        }
    }

    impl ProjectSource for StubSource {
        async fn list_projects(&self) -> Result<Page<Project>, ApiError> {
            self.lists.lock().unwrap().pop_front().expect("unexpected list call")
        }

        async fn create_project(&self, _payload: &NewProject) -> Result<Project, ApiError> {
            self.creates.lock().unwrap().pop_front().expect("unexpected create call")
        }
    }

    fn project(name: &str) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn temp_store() -> Arc<LocalStore> {
        let path =
            std::env::temp_dir().join(format!("easm-workspace-test-{}.json", Uuid::new_v4()));
        Arc::new(LocalStore::open(path))
    }

    #[tokio::test]
    async fn matching_selection_is_kept_across_reload() {
        let list = vec![project("one"), project("two"), project("three")];
        let second = list[1].id;
        let store = temp_store();
        let mut ws = Workspace::new(StubSource::new().push_list(Ok(list)), store);
        ws.set_selected_project(second);

        ws.load_projects().await.unwrap();

        assert_eq!(ws.selected_project_id(), Some(second));
        assert_eq!(ws.selected_project().unwrap().name, "two");
    }

    #[tokio::test]
    async fn stale_selection_falls_back_to_first_and_persists() {
        let list = vec![project("one"), project("two")];
        let first = list[0].id;
        let store = temp_store();
        let mut ws = Workspace::new(StubSource::new().push_list(Ok(list)), store.clone());
        ws.set_selected_project(Uuid::new_v4()); // deleted out from under us

        ws.load_projects().await.unwrap();

        assert_eq!(ws.selected_project_id(), Some(first));
        assert_eq!(store.get(ACTIVE_PROJECT_KEY).as_deref(), Some(first.to_string().as_str()));
    }

    #[tokio::test]
    async fn no_prior_selection_picks_first() {
        let list = vec![project("only")];
        let only = list[0].id;
        let mut ws = Workspace::new(StubSource::new().push_list(Ok(list)), temp_store());

        ws.load_projects().await.unwrap();

        assert_eq!(ws.selected_project_id(), Some(only));
    }

    #[tokio::test]
    async fn empty_list_clears_memory_and_store() {
        let store = temp_store();
        let mut ws = Workspace::new(StubSource::new().push_list(Ok(vec![])), store.clone());
        ws.set_selected_project(Uuid::new_v4());

        ws.load_projects().await.unwrap();

        assert_eq!(ws.selected_project_id(), None);
        assert!(ws.projects().is_empty());
        assert_eq!(store.get(ACTIVE_PROJECT_KEY), None);
    }

    #[tokio::test]
    async fn load_failure_resets_memory_but_not_store() {
        let store = temp_store();
        let mut ws = Workspace::new(
            StubSource::new().push_list(Err(ApiError("Network Error".into()))),
            store.clone(),
        );
        let stale = Uuid::new_v4();
        ws.set_selected_project(stale);

        let err = ws.load_projects().await.unwrap_err();

        assert_eq!(err.to_string(), "Network Error");
        assert!(ws.projects().is_empty());
        assert_eq!(ws.selected_project_id(), None);
        assert!(!ws.loading());
        // stale persisted value survives a failed reload
        assert_eq!(store.get(ACTIVE_PROJECT_KEY).as_deref(), Some(stale.to_string().as_str()));
    }

    #[tokio::test]
    async fn create_and_refresh_selects_the_new_only_project() {
        let created = project("X");
        let refreshed = created.clone();
        let mut ws = Workspace::new(
            StubSource::new().push_create(Ok(created)).push_list(Ok(vec![refreshed])),
            temp_store(),
        );

        ws.create_project_and_refresh(&NewProject { name: "X".into(), description: None })
            .await
            .unwrap();

        assert_eq!(ws.selected_project().unwrap().name, "X");
    }

    #[tokio::test]
    async fn failed_create_skips_the_refresh() {
        let mut ws = Workspace::new(
            StubSource::new().push_create(Err(ApiError("name already exists".into()))),
            temp_store(),
        );

        let err = ws
            .create_project_and_refresh(&NewProject { name: "dup".into(), description: None })
            .await
            .unwrap_err();

        // no list response was queued, so reaching the refresh would panic
        assert_eq!(err.to_string(), "name already exists");
    }

    #[tokio::test]
    async fn selection_is_seeded_from_the_store() {
        let store = temp_store();
        let id = Uuid::new_v4();
        store.set(ACTIVE_PROJECT_KEY, &id.to_string());

        let ws = Workspace::new(StubSource::new(), store);

        assert_eq!(ws.selected_project_id(), Some(id));
        assert!(ws.selected_project().is_none()); // nothing loaded yet
    }

    #[tokio::test]
    async fn garbage_in_the_store_means_no_selection() {
        let store = temp_store();
        store.set(ACTIVE_PROJECT_KEY, "not-a-uuid");

        let ws = Workspace::new(StubSource::new(), store);

        assert_eq!(ws.selected_project_id(), None);
    }

    #[tokio::test]
    async fn set_selected_project_persists_immediately() {
        let store = temp_store();
        let mut ws = Workspace::new(StubSource::new(), store.clone());
        let id = Uuid::new_v4();

        ws.set_selected_project(id);

        assert_eq!(store.get(ACTIVE_PROJECT_KEY).as_deref(), Some(id.to_string().as_str()));
    }
}
