/// Property-based and integration tests for optimistic workspace writes
///
/// These tests verify that the local task list always matches the backend
/// after a confirmed write and is restored exactly after a rejected one.
use freelance_portal::auth::{AuthUser, UserRole};
use freelance_portal::backend::{AuthProvider, MemoryBackend};
use freelance_portal::workspace::{
    NewTask, ProposalForm, ProposalService, Task, TaskFilter, TaskPatch, TaskPriority, TaskStatus,
    TaskStore, WorkspaceError,
};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Create(String),
    SetStatus(usize, TaskStatus),
    Rename(usize, String),
    Delete(usize),
}

// Strategy to generate a task status
fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::InReview),
        Just(TaskStatus::Done),
        Just(TaskStatus::Blocked),
    ]
}

// Strategy to generate one store operation; indices are reduced modulo the
// list length when applied
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(Op::Create),
        (any::<usize>(), status_strategy()).prop_map(|(i, s)| Op::SetStatus(i, s)),
        (any::<usize>(), "[a-z ]{1,20}").prop_map(|(i, t)| Op::Rename(i, t)),
        any::<usize>().prop_map(Op::Delete),
    ]
}

/// Helper to create a signed-in store over a project with a few tasks
async fn setup() -> (Arc<MemoryBackend>, TaskStore, Uuid) {
    let backend = Arc::new(MemoryBackend::new("workspace-secret"));
    let owner = backend
        .seed_user("owner@studio.dev", "owner-password", UserRole::Freelancer, "Owner")
        .await;
    let project = backend.seed_project(owner, "Storefront", None).await;
    for title in ["Wireframes", "Copy", "Checkout"] {
        backend.seed_task(project, title).await;
    }
    backend
        .sign_in_with_password("owner@studio.dev", "owner-password")
        .await
        .unwrap();

    let store = TaskStore::new(backend.clone());
    store.load(&TaskFilter::project(project)).await.unwrap();
    (backend, store, project)
}

fn pick(tasks: &[Task], index: usize) -> Option<Uuid> {
    if tasks.is_empty() {
        None
    } else {
        Some(tasks[index % tasks.len()].id)
    }
}

async fn apply(store: &TaskStore, project: Uuid, op: &Op) -> Option<Result<(), WorkspaceError>> {
    let tasks = store.tasks().await;
    let result = match op {
        Op::Create(title) => store
            .create_task(NewTask {
                project_id: project,
                title: title.clone(),
                description: None,
                status: TaskStatus::Todo,
                priority: TaskPriority::Medium,
                assignee_id: None,
                due_date: None,
            })
            .await
            .map(|_| ()),
        Op::SetStatus(index, status) => {
            let id = pick(&tasks, *index)?;
            store.set_status(id, *status).await.map(|_| ())
        }
        Op::Rename(index, title) => {
            let id = pick(&tasks, *index)?;
            let patch = TaskPatch {
                title: Some(title.clone()),
                ..TaskPatch::default()
            };
            store.update_task(id, patch).await.map(|_| ())
        }
        Op::Delete(index) => {
            let id = pick(&tasks, *index)?;
            store.delete_task(id).await
        }
    };
    Some(result)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_local_list_tracks_backend_through_failures(
        steps in prop::collection::vec((op_strategy(), any::<bool>()), 1..24)
    ) {
        runtime().block_on(async {
            let (backend, store, project) = setup().await;
            let mut expected_reverts = 0;

            for (op, fail) in &steps {
                backend.fail_writes(*fail).await;
                let before = store.tasks().await;
                let rows_before = backend.task_rows().await;

                let Some(result) = apply(&store, project, op).await else {
                    continue;
                };

                if *fail {
                    prop_assert!(result.is_err(), "{:?} should fail", op);
                    expected_reverts += 1;
                    prop_assert_eq!(store.tasks().await, before);
                    prop_assert_eq!(backend.task_rows().await, rows_before);
                } else {
                    prop_assert!(result.is_ok(), "{:?} failed: {:?}", op, result);
                    prop_assert_eq!(store.tasks().await, backend.task_rows().await);
                }
            }

            prop_assert_eq!(store.revert_count(), expected_reverts);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_concurrent_writes_do_not_clobber_each_other() {
    let (backend, store, project) = setup().await;
    let store = Arc::new(store);
    let tasks = store.tasks().await;

    let moves = tasks.iter().map(|task| {
        let store = Arc::clone(&store);
        let id = task.id;
        tokio::spawn(async move { store.set_status(id, TaskStatus::Done).await })
    });
    for handle in moves.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    let local = store.tasks().await;
    assert!(local.iter().all(|t| t.status == TaskStatus::Done));
    assert_eq!(local, backend.task_rows().await);
    assert_eq!(
        store.load(&TaskFilter::project(project)).await.unwrap(),
        local
    );
}

#[tokio::test]
async fn test_context_rows_include_project_name() {
    let (_, store, project) = setup().await;
    let rows = store.load_with_context(Some(project)).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.project_name == "Storefront"));
    assert_eq!(store.tasks().await.len(), 3);
}

#[tokio::test]
async fn test_proposal_with_missing_fields_sends_no_request() {
    let (backend, _, _) = setup().await;
    let service = ProposalService::new(backend.clone());
    let author = AuthUser::basic(Uuid::new_v4(), "owner@studio.dev", UserRole::Freelancer);
    let before = backend.request_count();

    let form = ProposalForm {
        title: "   ".to_string(),
        estimated_hours: Some(-2.0),
        ..ProposalForm::default()
    };
    let Err(WorkspaceError::Validation(errors)) = service.submit(&author, &form).await else {
        panic!("invalid form must be rejected locally");
    };

    assert!(errors.get("project_id").is_some());
    assert!(errors.get("title").is_some());
    assert!(errors.get("description").is_some());
    assert!(errors.get("estimated_hours").is_some());
    assert!(errors.get("budget").is_none());
    assert_eq!(backend.request_count(), before);
}
