//! Macro-generated test suite for `ResourceStore` contract validation.
//!
//! The `store_contract_tests!` macro generates a test module that validates
//! any `ResourceStore` implementation against the full contract: built-in
//! defaults, CRUD, uniqueness and protection rules, referential guards,
//! filtering, sorting and pagination, and get-or-create.
//!
//! Both backends must return the same outputs and the same error kinds, so the
//! suite is run once against `SqlStore` and once against `RestStore`.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod store_harness;
//!
//! use store_harness::*;
//!
//! store_contract_tests!(rest_store().await);
//! ```

/// Generate a full `ResourceStore` conformance test suite.
///
/// `$factory` must evaluate to a fresh, initialized store. It is re-evaluated
/// for each test to ensure isolation.
#[macro_export]
macro_rules! store_contract_tests {
    ($factory:expr) => {
        mod store_contract_tests {
            use super::*;
            use pipeline_store::core::error::StoreError;
            use pipeline_store::core::store::*;
            use pipeline_store::entities::*;
            use uuid::Uuid;

            // ==================================================================
            // Defaults
            // ==================================================================

            #[tokio::test]
            async fn test_defaults_exist() {
                let store = $factory;

                let workspace = default_workspace(&store).await;
                let user = default_user(&store).await;
                assert_eq!(user.name, DEFAULT_NAME);

                let admin = role_named(&store, ADMIN_ROLE).await;
                assert!(admin.permissions.contains(&Permission::Write));
                let guest = role_named(&store, GUEST_ROLE).await;
                assert!(!guest.permissions.contains(&Permission::Write));

                let assignments = store
                    .list_role_assignments(&filter::<RoleAssignmentResponse>(&[
                        ("user", &user.id.to_string()),
                        ("workspace", &workspace.id.to_string()),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(assignments.total, 1);
                assert_eq!(assignments.items[0].role, admin.id);

                let stacks = store
                    .list_stacks(&filter::<StackResponse>(&[("name", DEFAULT_NAME)]))
                    .await
                    .unwrap();
                assert_eq!(stacks.total, 1);
                let stack = &stacks.items[0];
                assert_eq!(stack.workspace, workspace.id);
                assert_eq!(stack.components.len(), 2);

                let orchestrator = store
                    .get_component(&stack.components[&ComponentType::Orchestrator])
                    .await
                    .unwrap();
                assert_eq!(orchestrator.name, DEFAULT_NAME);
                assert_eq!(orchestrator.flavor, "local");
                assert_eq!(orchestrator.user, Some(user.id));

                let flavors = store.list_flavors(&all::<FlavorResponse>()).await.unwrap();
                assert_eq!(flavors.total as usize, builtin_flavors().len());
                assert!(flavors.items.iter().all(|f| !f.is_custom));
            }

            // ==================================================================
            // CRUD
            // ==================================================================

            #[tokio::test]
            async fn test_workspace_crud() {
                let store = $factory;

                let created = store
                    .create_workspace(WorkspaceRequest {
                        name: "research".into(),
                        description: "models".into(),
                    })
                    .await
                    .unwrap();
                assert_eq!(created.name, "research");

                let fetched = store.get_workspace(&created.id).await.unwrap();
                assert_eq!(fetched, created);

                let updated = store
                    .update_workspace(
                        &created.id,
                        WorkspaceUpdate {
                            description: Some("all models".into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
                assert_eq!(updated.name, "research");
                assert_eq!(updated.description, "all models");
                assert!(updated.updated >= created.updated);
                assert_eq!(updated.created, created.created);

                store.delete_workspace(&created.id).await.unwrap();
                let err = store.get_workspace(&created.id).await.unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_unknown_ids_are_not_found() {
                let store = $factory;
                let id = Uuid::new_v4();

                let err = store.get_stack(&id).await.unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
                assert!(err.to_string().contains(&id.to_string()));

                let err = store
                    .update_user(&id, UserUpdate::default())
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);

                let err = store.delete_run(&id).await.unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_invalid_request_is_rejected() {
                let store = $factory;

                let err = store
                    .create_workspace(WorkspaceRequest::new(""))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);

                let mut user = UserRequest::new("bob");
                user.email = Some("not-an-email".into());
                let err = store.create_user(user).await.unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);
            }

            // ==================================================================
            // Uniqueness and protected built-ins
            // ==================================================================

            #[tokio::test]
            async fn test_duplicate_names_already_exist() {
                let store = $factory;
                new_workspace(&store, "research").await;

                let err = store
                    .create_workspace(WorkspaceRequest::new("research"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::AlreadyExists(_)), "got {:?}", err);
                assert!(err.to_string().contains("research"));

                let err = store
                    .create_user(UserRequest::new(DEFAULT_NAME))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::AlreadyExists(_)), "got {:?}", err);

                let other = new_workspace(&store, "other").await;
                let err = store
                    .update_workspace(
                        &other.id,
                        WorkspaceUpdate {
                            name: Some("research".into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::AlreadyExists(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_stack_names_are_scoped_to_workspace() {
                let store = $factory;
                let first = default_workspace(&store).await;
                let second = new_workspace(&store, "second").await;

                new_stack(&store, first.id, "prod").await;
                new_stack(&store, second.id, "prod").await;

                let orchestrator =
                    local_component(&store, first.id, "again", ComponentType::Orchestrator).await;
                let artifacts =
                    local_component(&store, first.id, "again", ComponentType::ArtifactStore).await;
                let err = store
                    .create_stack(StackRequest::new(
                        "prod",
                        first.id,
                        [
                            (ComponentType::Orchestrator, orchestrator.id),
                            (ComponentType::ArtifactStore, artifacts.id),
                        ],
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::AlreadyExists(_)), "got {:?}", err);
                assert!(err.to_string().contains(&first.id.to_string()));
            }

            #[tokio::test]
            async fn test_default_workspace_and_user_are_protected() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let user = default_user(&store).await;

                let err = store
                    .update_workspace(
                        &workspace.id,
                        WorkspaceUpdate {
                            name: Some("renamed".into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);

                // Description changes are allowed
                store
                    .update_workspace(
                        &workspace.id,
                        WorkspaceUpdate {
                            description: Some("main".into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();

                let err = store.delete_workspace(&workspace.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
                let err = store.delete_user(&user.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_role_protections() {
                let store = $factory;
                let admin = role_named(&store, ADMIN_ROLE).await;
                let guest = role_named(&store, GUEST_ROLE).await;

                let err = store
                    .update_role(
                        &admin.id,
                        RoleUpdate {
                            permissions: Some([Permission::Read].into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
                let err = store.delete_role(&guest.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);

                let role = store
                    .create_role(RoleRequest::new("auditor", [Permission::Read]))
                    .await
                    .unwrap();
                let user = store.create_user(UserRequest::new("alice")).await.unwrap();
                let workspace = default_workspace(&store).await;
                let assignment = store
                    .create_role_assignment(RoleAssignmentRequest {
                        role: role.id,
                        user: user.id,
                        workspace: workspace.id,
                    })
                    .await
                    .unwrap();

                let err = store.delete_role(&role.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);

                store.delete_role_assignment(&assignment.id).await.unwrap();
                store.delete_role(&role.id).await.unwrap();
            }

            #[tokio::test]
            async fn test_flavor_protections() {
                let store = $factory;
                let workspace = default_workspace(&store).await;

                let builtin = store
                    .list_flavors(&filter::<FlavorResponse>(&[
                        ("name", "local"),
                        ("type", "orchestrator"),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(builtin.total, 1);
                let err = store.delete_flavor(&builtin.items[0].id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);

                let flavor = store
                    .create_flavor(FlavorRequest::new(
                        "airflow",
                        ComponentType::Orchestrator,
                        "plugins.AirflowOrchestratorFlavor",
                    ))
                    .await
                    .unwrap();
                assert!(flavor.is_custom);

                let err = store
                    .create_flavor(FlavorRequest::new(
                        "airflow",
                        ComponentType::Orchestrator,
                        "plugins.Other",
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::AlreadyExists(_)), "got {:?}", err);

                let component = store
                    .create_component(ComponentRequest::new(
                        "airflow-prod",
                        ComponentType::Orchestrator,
                        "airflow",
                        workspace.id,
                    ))
                    .await
                    .unwrap();
                let err = store.delete_flavor(&flavor.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);

                store.delete_component(&component.id).await.unwrap();
                store.delete_flavor(&flavor.id).await.unwrap();
            }

            #[tokio::test]
            async fn test_component_requires_registered_flavor() {
                let store = $factory;
                let workspace = default_workspace(&store).await;

                let err = store
                    .create_component(ComponentRequest::new(
                        "mystery",
                        ComponentType::Orchestrator,
                        "kubeflow",
                        workspace.id,
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);

                // The flavor must match the component type as well
                let err = store
                    .create_component(ComponentRequest::new(
                        "registry",
                        ComponentType::ContainerRegistry,
                        "local",
                        workspace.id,
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_component_in_use_cannot_be_deleted() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let stack = new_stack(&store, workspace.id, "prod").await;
                let orchestrator = stack.components[&ComponentType::Orchestrator];

                let err = store.delete_component(&orchestrator).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
                assert!(err.to_string().contains("1 stack(s)"), "got {}", err);

                store.delete_stack(&stack.id).await.unwrap();
                store.delete_component(&orchestrator).await.unwrap();
            }

            #[tokio::test]
            async fn test_default_stack_and_components_are_protected() {
                let store = $factory;
                let stack = store
                    .list_stacks(&filter::<StackResponse>(&[("name", DEFAULT_NAME)]))
                    .await
                    .unwrap()
                    .items
                    .remove(0);

                let err = store
                    .update_stack(
                        &stack.id,
                        StackUpdate {
                            description: Some("changed".into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
                let err = store.delete_stack(&stack.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);

                let orchestrator = stack.components[&ComponentType::Orchestrator];
                let err = store
                    .update_component(
                        &orchestrator,
                        ComponentUpdate {
                            name: Some("renamed".into()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_stack_composition_rules() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let other = new_workspace(&store, "other").await;

                let orchestrator =
                    local_component(&store, workspace.id, "o", ComponentType::Orchestrator).await;
                let err = store
                    .create_stack(StackRequest::new(
                        "incomplete",
                        workspace.id,
                        [(ComponentType::Orchestrator, orchestrator.id)],
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);

                // Component registered under the wrong slot
                let artifacts =
                    local_component(&store, workspace.id, "a", ComponentType::ArtifactStore).await;
                let err = store
                    .create_stack(StackRequest::new(
                        "swapped",
                        workspace.id,
                        [
                            (ComponentType::Orchestrator, artifacts.id),
                            (ComponentType::ArtifactStore, orchestrator.id),
                        ],
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);

                // Components from another workspace
                let err = store
                    .create_stack(StackRequest::new(
                        "foreign",
                        other.id,
                        [
                            (ComponentType::Orchestrator, orchestrator.id),
                            (ComponentType::ArtifactStore, artifacts.id),
                        ],
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);

                let err = store
                    .create_stack(StackRequest::new(
                        "ghost",
                        workspace.id,
                        [
                            (ComponentType::Orchestrator, Uuid::new_v4()),
                            (ComponentType::ArtifactStore, artifacts.id),
                        ],
                    ))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_update_stack_replaces_components() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let stack = new_stack(&store, workspace.id, "prod").await;
                let replacement =
                    local_component(&store, workspace.id, "new-o", ComponentType::Orchestrator)
                        .await;

                let mut components = stack.components.clone();
                components.insert(ComponentType::Orchestrator, replacement.id);
                let updated = store
                    .update_stack(
                        &stack.id,
                        StackUpdate {
                            name: Some("production".into()),
                            components: Some(components),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();

                assert_eq!(updated.name, "production");
                assert!(updated.contains_component(&replacement.id));
                assert_eq!(store.get_stack(&stack.id).await.unwrap(), updated);
            }

            // ==================================================================
            // Referential cascades
            // ==================================================================

            #[tokio::test]
            async fn test_deleting_workspace_cascades() {
                let store = $factory;
                let workspace = new_workspace(&store, "scratch").await;
                let stack = new_stack(&store, workspace.id, "tmp").await;
                let pipeline = new_pipeline(&store, workspace.id, "train").await;

                store.delete_workspace(&workspace.id).await.unwrap();

                for result in [
                    store.get_stack(&stack.id).await.map(|_| ()),
                    store.get_pipeline(&pipeline.id).await.map(|_| ()),
                    store
                        .get_component(&stack.components[&ComponentType::Orchestrator])
                        .await
                        .map(|_| ()),
                ] {
                    assert!(matches!(result, Err(StoreError::NotFound(_))), "got {:?}", result);
                }
            }

            #[tokio::test]
            async fn test_deleting_user_clears_ownership() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let user = store.create_user(UserRequest::new("carol")).await.unwrap();

                let mut request = ComponentRequest::new(
                    "carols-store",
                    ComponentType::ArtifactStore,
                    "local",
                    workspace.id,
                );
                request.user = Some(user.id);
                let component = store.create_component(request).await.unwrap();
                assert_eq!(component.user, Some(user.id));

                store.delete_user(&user.id).await.unwrap();
                let component = store.get_component(&component.id).await.unwrap();
                assert_eq!(component.user, None);
            }

            #[tokio::test]
            async fn test_deleting_user_keeps_ownerless_names_unique() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let user = store.create_user(UserRequest::new("dave")).await.unwrap();

                let unowned_stack = new_stack(&store, workspace.id, "shared-stack").await;
                let unowned =
                    local_component(&store, workspace.id, "shared", ComponentType::Orchestrator).await;

                let mut request =
                    ComponentRequest::new("shared", ComponentType::Orchestrator, "local", workspace.id);
                request.user = Some(user.id);
                let owned = store.create_component(request).await.unwrap();

                let mut request = StackRequest::new(
                    "shared-stack",
                    workspace.id,
                    unowned_stack.components.clone(),
                );
                request.user = Some(user.id);
                let owned_stack = store.create_stack(request).await.unwrap();

                let err = store.delete_user(&user.id).await.unwrap_err();
                assert!(matches!(err, StoreError::IllegalOperation(_)), "got {:?}", err);
                assert!(err.to_string().contains("1 stack component(s) and 1 stack(s)"), "got {}", err);

                // Nothing changed
                assert_eq!(store.get_user(&user.id).await.unwrap().name, "dave");
                let shared = store
                    .list_components(&filter::<ComponentResponse>(&[("name", "shared")]))
                    .await
                    .unwrap();
                assert_eq!(shared.total, 2);
                assert_eq!(store.get_component(&owned.id).await.unwrap().user, Some(user.id));

                // Once the ownerless twins are gone the user can be deleted
                store.delete_component(&unowned.id).await.unwrap();
                store.delete_stack(&unowned_stack.id).await.unwrap();
                store.delete_user(&user.id).await.unwrap();
                assert_eq!(store.get_component(&owned.id).await.unwrap().user, None);
                assert_eq!(store.get_stack(&owned_stack.id).await.unwrap().user, None);
            }

            #[tokio::test]
            async fn test_pipeline_and_stack_deletes_reach_runs() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let pipeline = new_pipeline(&store, workspace.id, "train").await;
                let stack = new_stack(&store, workspace.id, "prod").await;

                let mut request = RunRequest::new("train-1", workspace.id);
                request.pipeline = Some(pipeline.id);
                request.stack = Some(stack.id);
                let run = store.create_run(request).await.unwrap();

                store.delete_stack(&stack.id).await.unwrap();
                let fetched = store.get_run(&run.id).await.unwrap();
                assert_eq!(fetched.stack, None);
                assert_eq!(fetched.pipeline, Some(pipeline.id));

                store.delete_pipeline(&pipeline.id).await.unwrap();
                let err = store.get_run(&run.id).await.unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
            }

            // ==================================================================
            // Runs
            // ==================================================================

            #[tokio::test]
            async fn test_run_lifecycle() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let pipeline = new_pipeline(&store, workspace.id, "train").await;

                let mut request = RunRequest::new("train-1", workspace.id);
                request.pipeline = Some(pipeline.id);
                request.num_steps = Some(3);
                let run = store.create_run(request).await.unwrap();
                assert_eq!(run.status, RunStatus::Initializing);

                let updated = store
                    .update_run(
                        &run.id,
                        RunUpdate {
                            status: Some(RunStatus::Completed),
                            num_steps: Some(4),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
                assert_eq!(updated.status, RunStatus::Completed);
                assert_eq!(updated.num_steps, Some(4));

                let err = store
                    .create_run(RunRequest::new("train-1", workspace.id))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::AlreadyExists(_)), "got {:?}", err);

                let mut request = RunRequest::new("orphan", workspace.id);
                request.pipeline = Some(Uuid::new_v4());
                let err = store.create_run(request).await.unwrap_err();
                assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_get_or_create_run() {
                let store = $factory;
                let workspace = default_workspace(&store).await;

                let mut request = RunRequest::new("nightly-1", workspace.id);
                request.id = Some(Uuid::new_v4());

                let (first, created) = store.get_or_create_run(request.clone()).await.unwrap();
                assert!(created);
                assert_eq!(Some(first.id), request.id);

                let (again, created) = store.get_or_create_run(request.clone()).await.unwrap();
                assert!(!created);
                assert_eq!(again.id, first.id);

                // Same name, no id: found by name
                let (by_name, created) = store
                    .get_or_create_run(RunRequest::new("nightly-1", workspace.id))
                    .await
                    .unwrap();
                assert!(!created);
                assert_eq!(by_name.id, first.id);
            }

            // ==================================================================
            // Filtering, sorting and pagination
            // ==================================================================

            #[tokio::test]
            async fn test_pagination() {
                let store = $factory;
                for i in 0..25 {
                    new_workspace(&store, &format!("ws-{:02}", i)).await;
                }

                let page = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("size", "10")]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 26);
                assert_eq!(page.total_pages, 3);
                assert_eq!(page.index, 1);
                assert_eq!(page.max_size, 10);
                assert_eq!(page.items.len(), 10);

                let last = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("size", "10"), ("page", "3")]))
                    .await
                    .unwrap();
                assert_eq!(last.items.len(), 6);
                assert!(!last.has_next());

                let err = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("size", "10"), ("page", "4")]))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_empty_result_has_one_page() {
                let store = $factory;
                let page = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[(
                        "created",
                        "lt:2000-01-01 00:00:00",
                    )]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 0);
                assert_eq!(page.total_pages, 1);
                assert!(page.is_empty());
            }

            #[tokio::test]
            async fn test_sorting() {
                let store = $factory;
                for name in ["beta", "alpha", "gamma"] {
                    new_workspace(&store, name).await;
                }

                let page = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("sort_by", "desc:name")]))
                    .await
                    .unwrap();
                assert_eq!(
                    names(&page.items, |w| &w.name),
                    vec!["gamma", "default", "beta", "alpha"]
                );

                let page = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("sort_by", "name")]))
                    .await
                    .unwrap();
                assert_eq!(
                    names(&page.items, |w| &w.name),
                    vec!["alpha", "beta", "default", "gamma"]
                );

                let newest_first = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("sort_by", "desc:created")]))
                    .await
                    .unwrap();
                assert!(newest_first.items.windows(2).all(|w| w[0].created >= w[1].created));
                let oldest_first = store
                    .list_workspaces(&all::<WorkspaceResponse>())
                    .await
                    .unwrap();
                assert!(oldest_first.items.windows(2).all(|w| w[0].created <= w[1].created));
                assert_eq!(oldest_first.items[0].name, DEFAULT_NAME);
            }

            #[tokio::test]
            async fn test_string_operators() {
                let store = $factory;
                for name in ["train-small", "train-large", "Train-upper", "eval-small", "a*b", "axb"] {
                    new_workspace(&store, name).await;
                }
                assert_eq!(
                    workspace_names(&store, &[("name", "startswith:train")]).await,
                    vec!["train-large", "train-small"]
                );
                assert_eq!(
                    workspace_names(&store, &[("name", "endswith:small")]).await,
                    vec!["eval-small", "train-small"]
                );
                assert_eq!(workspace_names(&store, &[("name", "contains:*")]).await, vec!["a*b"]);
                assert_eq!(workspace_names(&store, &[("name", "eval-small")]).await, vec!["eval-small"]);
                assert_eq!(
                    workspace_names(
                        &store,
                        &[
                            ("name", "contains:rain"),
                            ("description", "nothing"),
                            ("logical_operator", "or"),
                        ],
                    )
                    .await,
                    vec!["Train-upper", "train-large", "train-small"]
                );
            }

            #[tokio::test]
            async fn test_logical_operators() {
                let store = $factory;
                for (name, active) in [("ann", true), ("ben", false), ("cat", false)] {
                    let mut request = UserRequest::new(name);
                    request.active = active;
                    store.create_user(request).await.unwrap();
                }

                let and = store
                    .list_users(&filter::<UserResponse>(&[
                        ("name", "startswith:b"),
                        ("active", "false"),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(names(&and.items, |u| &u.name), vec!["ben"]);

                let or = store
                    .list_users(&filter::<UserResponse>(&[
                        ("name", "ann"),
                        ("active", "false"),
                        ("logical_operator", "or"),
                        ("sort_by", "name"),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(names(&or.items, |u| &u.name), vec!["ann", "ben", "cat"]);
            }

            #[tokio::test]
            async fn test_numeric_and_id_filters() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let mut ids = Vec::new();
                for (name, steps) in [("r1", 1), ("r2", 5), ("r3", 10)] {
                    let mut request = RunRequest::new(name, workspace.id);
                    request.num_steps = Some(steps);
                    ids.push(store.create_run(request).await.unwrap().id);
                }

                let page = store
                    .list_runs(&filter::<RunResponse>(&[
                        ("num_steps", "gte:5"),
                        ("sort_by", "name"),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(names(&page.items, |r| &r.name), vec!["r2", "r3"]);

                let prefix = ids[0].to_string()[..8].to_string();
                let page = store
                    .list_runs(&filter::<RunResponse>(&[("id", &format!("startswith:{}", prefix))]))
                    .await
                    .unwrap();
                assert!(page.items.iter().any(|r| r.id == ids[0]));

                let page = store
                    .list_runs(&filter::<RunResponse>(&[("id", &ids[1].to_string())]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 1);
                assert_eq!(page.items[0].name, "r2");
            }

            #[tokio::test]
            async fn test_stacks_filtered_by_component() {
                let store = $factory;
                let workspace = default_workspace(&store).await;
                let prod = new_stack(&store, workspace.id, "prod").await;
                let shared = prod.components[&ComponentType::ArtifactStore];

                let orchestrator =
                    local_component(&store, workspace.id, "staging-o", ComponentType::Orchestrator)
                        .await;
                let staging = store
                    .create_stack(StackRequest::new(
                        "staging",
                        workspace.id,
                        [
                            (ComponentType::Orchestrator, orchestrator.id),
                            (ComponentType::ArtifactStore, shared),
                        ],
                    ))
                    .await
                    .unwrap();

                let page = store
                    .list_stacks(&filter::<StackResponse>(&[
                        ("component_id", &shared.to_string()),
                        ("sort_by", "name"),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 2);
                assert_eq!(names(&page.items, |s| &s.name), vec!["prod", "staging"]);

                // Derived filters are AND-ed with the column filters
                let page = store
                    .list_stacks(&filter::<StackResponse>(&[
                        ("component_id", &shared.to_string()),
                        ("name", "staging"),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 1);
                assert_eq!(page.items[0].id, staging.id);

                let page = store
                    .list_stacks(&filter::<StackResponse>(&[(
                        "component_id",
                        &orchestrator.id.to_string(),
                    )]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 1);
                assert_eq!(page.items[0].id, staging.id);
            }

            #[tokio::test]
            async fn test_filter_for_other_resource_is_rejected() {
                let store = $factory;
                let err = store
                    .list_stacks(&all::<WorkspaceResponse>())
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidArgument(_)), "got {:?}", err);
            }

            #[tokio::test]
            async fn test_concurrent_creates() {
                let store = std::sync::Arc::new($factory);
                let mut handles = Vec::new();
                for i in 0..10 {
                    let store = store.clone();
                    handles.push(tokio::spawn(async move {
                        store
                            .create_workspace(WorkspaceRequest::new(format!("parallel-{}", i)))
                            .await
                    }));
                }
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }

                let page = store
                    .list_workspaces(&filter::<WorkspaceResponse>(&[("name", "startswith:parallel-")]))
                    .await
                    .unwrap();
                assert_eq!(page.total, 10);
            }
        }
    };
}
