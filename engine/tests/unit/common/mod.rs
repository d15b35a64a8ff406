//! Shared test fixtures: an in-process container runtime, a store with
//! scripted write failures, and a wired engine

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shipyard::app::options::AppOptions;
use shipyard::app::state::AppState;
use shipyard::deploy::assembler::BuildContext;
use shipyard::deploy::runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ContainerStatus, InspectReport, StopOutcome,
};
use shipyard::errors::EngineError;
use shipyard::models::project::{DeploymentUpdate, Project, ProjectId, ProjectSource, ProjectStatus};
use shipyard::store::memory::InMemoryProjectStore;
use shipyard::store::ProjectStore;

pub const BASE_IMAGE: &str = "shipyard-base:node20";

/// Runtime calls, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Build(String),
    Tag(String, String),
    Start { name: String, image: String },
    Remove(String),
}

/// Injected failure of a runtime call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Retryable build failure
    Build,

    /// Retryable container start failure
    Start,

    /// Non-retryable error raised by the build
    Fatal,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
}

/// Container runtime keeping images and containers in memory
#[derive(Default)]
pub struct FakeRuntime {
    images: Mutex<HashSet<String>>,
    containers: Mutex<Vec<FakeContainer>>,
    ops: Mutex<Vec<Op>>,
    failures: Mutex<VecDeque<Failure>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    build_delay: Mutex<Duration>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.add_image(BASE_IMAGE);
        runtime
    }

    pub fn add_image(&self, tag: &str) {
        self.images.lock().unwrap().insert(tag.to_string());
    }

    /// Queue failures consumed by the next builds/starts, in order
    pub fn fail_next(&self, failures: &[Failure]) {
        self.failures.lock().unwrap().extend(failures.iter().copied());
    }

    pub fn set_build_delay(&self, delay: Duration) {
        *self.build_delay.lock().unwrap() = delay;
    }

    /// Start a container behind the engine's back
    pub fn seed_container(&self, name: &str, image: &str) -> String {
        let id = self.new_id();
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
        });
        id
    }

    /// Lose a container behind the engine's back
    pub fn kill(&self, reference: &str) {
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.id != reference && c.name != reference);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Build(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<(String, String)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Start { name, image } => Some((name, image)),
                _ => None,
            })
            .collect()
    }

    /// Live containers as `(id, name, image)`
    pub fn running(&self) -> Vec<(String, String, String)> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.id.clone(), c.name.clone(), c.image.clone()))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn new_id(&self) -> String {
        format!("c{:04}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }

    fn take_failure(&self, wanted: &[Failure]) -> Option<Failure> {
        let mut failures = self.failures.lock().unwrap();
        match failures.front() {
            Some(f) if wanted.contains(f) => failures.pop_front(),
            _ => None,
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, tag: &str) -> Result<bool, EngineError> {
        Ok(self.images.lock().unwrap().contains(tag))
    }

    async fn build_image(
        &self,
        _context: &BuildContext,
        tag: &str,
        _cache_from: Option<&str>,
    ) -> Result<(), EngineError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.build_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.record(Op::Build(tag.to_string()));
        match self.take_failure(&[Failure::Build, Failure::Fatal]) {
            Some(Failure::Build) => Err(EngineError::BuildFailure(
                "src/App.tsx(3,7): error TS2322".to_string(),
            )),
            Some(_) => Err(EngineError::Internal("build context rejected".to_string())),
            None => {
                self.add_image(tag);
                Ok(())
            }
        }
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError> {
        self.record(Op::Tag(source.to_string(), target.to_string()));
        self.add_image(target);
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<ContainerRef, EngineError> {
        self.record(Op::Start {
            name: spec.name.clone(),
            image: spec.image.clone(),
        });
        if self.take_failure(&[Failure::Start]).is_some() {
            return Err(EngineError::RuntimeStartFailure(
                "port allocation failed".to_string(),
            ));
        }

        let mut containers = self.containers.lock().unwrap();
        if containers.iter().any(|c| c.name == spec.name) {
            return Err(EngineError::RuntimeStartFailure(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        let id = self.new_id();
        containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
        });
        Ok(ContainerRef(id))
    }

    async fn stop_and_remove(&self, reference: &str) -> Result<StopOutcome, EngineError> {
        self.record(Op::Remove(reference.to_string()));
        let mut containers = self.containers.lock().unwrap();
        let before = containers.len();
        containers.retain(|c| c.id != reference && c.name != reference);
        if containers.len() < before {
            Ok(StopOutcome::Removed)
        } else {
            Ok(StopOutcome::NotFound)
        }
    }

    async fn inspect(&self, reference: &str) -> Result<InspectReport, EngineError> {
        let containers = self.containers.lock().unwrap();
        match containers
            .iter()
            .find(|c| c.id == reference || c.name == reference)
        {
            Some(c) => Ok(InspectReport {
                status: ContainerStatus::Running,
                logs: format!("serving {}", c.image),
            }),
            None => Ok(InspectReport::not_found()),
        }
    }
}

/// Outcome of a scripted records write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    Pass,
    Fail,
}

/// In-memory store whose next writes can be made to fail
pub struct FlakyStore {
    inner: Arc<InMemoryProjectStore>,
    writes: Mutex<VecDeque<Write>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryProjectStore>) -> Self {
        Self {
            inner,
            writes: Mutex::new(VecDeque::new()),
        }
    }

    /// Script the outcome of the next writes, in order. Unscripted writes pass.
    pub fn script_writes(&self, writes: &[Write]) {
        self.writes.lock().unwrap().extend(writes.iter().copied());
    }
}

#[async_trait]
impl ProjectStore for FlakyStore {
    async fn get(&self, id: ProjectId) -> Result<Project, EngineError> {
        self.inner.get(id).await
    }

    async fn list_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, EngineError> {
        self.inner.list_by_status(status).await
    }

    async fn update_deployment(
        &self,
        id: ProjectId,
        update: &DeploymentUpdate,
    ) -> Result<(), EngineError> {
        let outcome = self.writes.lock().unwrap().pop_front();
        if outcome == Some(Write::Fail) {
            return Err(EngineError::RecordsError(
                "503 Service Unavailable: records API unavailable".to_string(),
            ));
        }
        self.inner.update_deployment(id, update).await
    }
}

/// Engine wired around an in-memory store and the fake runtime
pub struct Harness {
    pub store: Arc<InMemoryProjectStore>,
    pub records: Arc<FlakyStore>,
    pub runtime: Arc<FakeRuntime>,
    pub state: Arc<AppState>,
}

/// Options with no retry delay
pub fn test_options() -> AppOptions {
    let mut options = AppOptions::default();
    options.orchestrator.fsm.retry_delay = Duration::ZERO;
    options.orchestrator.routing.base_domain = "apps.example.com".to_string();
    options
}

pub fn harness() -> Harness {
    harness_with(test_options())
}

pub fn harness_with(options: AppOptions) -> Harness {
    let store = Arc::new(InMemoryProjectStore::new());
    let records = Arc::new(FlakyStore::new(store.clone()));
    let runtime = Arc::new(FakeRuntime::new());
    let state = Arc::new(AppState::new(&options, records.clone(), runtime.clone()));
    Harness {
        store,
        records,
        runtime,
        state,
    }
}

/// Source with a root component and one child component
pub fn todo_source(heading: &str) -> ProjectSource {
    let mut components = BTreeMap::new();
    components.insert(
        "TodoList".to_string(),
        "export default function TodoList() { return <ul />; }".to_string(),
    );
    components.insert(
        "Welcome".to_string(),
        "export default function Welcome() { return <p>Welcome</p>; }".to_string(),
    );
    ProjectSource {
        root: Some(format!(
            "import TodoList from './components/TodoList';\nexport default function App() {{ return <main><h1>{}</h1><TodoList /></main>; }}",
            heading
        )),
        components,
    }
}

/// A ready project owned by `ada`
pub fn ready_project(id: u64, name: &str) -> Project {
    Project::new(id, "ada", name)
        .with_description("A small todo app")
        .with_source(todo_source("Todos"))
        .with_status(ProjectStatus::Ready)
}
