//! Authorization of user and VM tasks through both entry points.

mod common;

use common::{new_user, TestCentral, OTHER_USERNAME, USER_PASSWORD, USER_USERNAME};
use vm_central::task::{verify_credentials, Task, UserUpdate};
use vm_central::{AuthenticatedCaller, Principal, Role, SystemPrincipal, TaskError};

// =============================================================================
// User creation
// =============================================================================

#[tokio::test]
async fn test_admin_creates_user() {
    let central = TestCentral::without_worker().await;
    let admin = central.admin_principal().await;

    let created = central
        .tasks
        .create_user(new_user("fresh", USER_PASSWORD, Role::User))
        .submit_trusted(&admin)
        .await
        .unwrap();

    assert!(created.id.starts_with("USER:"));
    assert_ne!(created.id, central.admin.id);
    assert_eq!(created.first_name, "firstname");
    assert_eq!(created.last_name, "lastname");
    assert_eq!(created.role, Role::User);
    assert_ne!(created.hashed_password, USER_PASSWORD);
    assert_eq!(central.users.len().await, 2);
}

#[tokio::test]
async fn test_duplicate_without_uniqueness_returns_original() {
    let central = TestCentral::without_worker().await;
    let admin = central.admin_principal().await;
    let original = central.create_user(USER_USERNAME, Role::User).await;

    let again = central
        .tasks
        .create_user(new_user(USER_USERNAME, "another-password", Role::Admin))
        .ensure_unique(false)
        .submit_trusted(&admin)
        .await
        .unwrap();

    assert_eq!(again, original);
    assert_eq!(central.users.len().await, 2);
}

#[tokio::test]
async fn test_duplicate_with_uniqueness_fails() {
    let central = TestCentral::without_worker().await;
    let admin = central.admin_principal().await;
    central.create_user(USER_USERNAME, Role::User).await;

    let err = central
        .tasks
        .create_user(new_user(USER_USERNAME, USER_PASSWORD, Role::User))
        .submit_trusted(&admin)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Duplicate { .. }));
    assert_eq!(central.users.len().await, 2);
}

#[tokio::test]
async fn test_user_cannot_create_users_and_touches_nothing() {
    let central = TestCentral::without_worker().await;
    let alice = central.create_user(USER_USERNAME, Role::User).await;
    let principal = central.principal_of(&alice).await;
    let calls_before = central.users.calls();

    let err = central
        .tasks
        .create_user(new_user("mallory", USER_PASSWORD, Role::Admin))
        .submit_trusted(&principal)
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(central.users.calls(), calls_before);
}

// =============================================================================
// Self-exclusion and admin-or-self
// =============================================================================

#[tokio::test]
async fn test_admin_cannot_delete_itself() {
    let central = TestCentral::without_worker().await;
    let admin = central.admin_principal().await;
    let calls_before = central.users.calls();

    let err = central
        .tasks
        .delete_user(central.admin.id.clone())
        .submit_trusted(&admin)
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(central.users.calls(), calls_before);
    assert_eq!(central.users.len().await, 1);
}

#[tokio::test]
async fn test_admin_deletes_someone_else() {
    let central = TestCentral::without_worker().await;
    let admin = central.admin_principal().await;
    let alice = central.create_user(USER_USERNAME, Role::User).await;

    central
        .tasks
        .delete_user(alice.id.clone())
        .submit_trusted(&admin)
        .await
        .unwrap();

    let err = central
        .tasks
        .get_user(alice.id)
        .submit_trusted(&admin)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_system_principals_cannot_delete_their_own_identity() {
    let central = TestCentral::without_worker().await;
    for system in SystemPrincipal::ALL {
        let principal = Principal::from(system);
        let err = central
            .tasks
            .delete_user(system.id())
            .submit_trusted(&principal)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized(), "{:?} deleted itself", system);
    }
}

#[tokio::test]
async fn test_user_reads_and_updates_only_itself() {
    let central = TestCentral::without_worker().await;
    let alice = central.create_user(USER_USERNAME, Role::User).await;
    let bob = central.create_user(OTHER_USERNAME, Role::User).await;
    let principal = central.principal_of(&alice).await;

    let me = central
        .tasks
        .get_user(alice.id.clone())
        .submit_trusted(&principal)
        .await
        .unwrap();
    assert_eq!(me.username, USER_USERNAME);

    let err = central
        .tasks
        .get_user(bob.id.clone())
        .submit_trusted(&principal)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let writes_before = central.users.writes();
    let err = central
        .tasks
        .update_user(UserUpdate {
            user_id: bob.id.clone(),
            first_name: "Hacked".to_string(),
            last_name: String::new(),
        })
        .submit_trusted(&principal)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(central.users.writes(), writes_before);

    let updated = central
        .tasks
        .update_user(UserUpdate {
            user_id: alice.id.clone(),
            first_name: "Alice".to_string(),
            last_name: String::new(),
        })
        .submit_trusted(&principal)
        .await
        .unwrap();
    assert_eq!(updated.first_name, "Alice");
    assert_eq!(updated.last_name, "lastname");
}

#[tokio::test]
async fn test_user_cannot_list_users() {
    let central = TestCentral::without_worker().await;
    let alice = central.create_user(USER_USERNAME, Role::User).await;
    let principal = central.principal_of(&alice).await;

    let err = central
        .tasks
        .get_all_users()
        .submit_trusted(&principal)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let all = central
        .tasks
        .get_all_users()
        .submit_trusted(&central.admin_principal().await)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

// =============================================================================
// Authenticated entry point
// =============================================================================

#[tokio::test]
async fn test_authenticated_caller_is_resolved() {
    let central = TestCentral::without_worker().await;
    let resolver = central.tasks.resolver();
    let alice = central.create_user(USER_USERNAME, Role::User).await;

    let caller = verify_credentials(central.tasks.context(), USER_USERNAME, USER_PASSWORD)
        .await
        .unwrap();
    assert_eq!(caller.account_id(), alice.id);

    let me = central
        .tasks
        .get_user(alice.id.clone())
        .submit(&caller, &resolver)
        .await
        .unwrap();
    assert_eq!(me.id, alice.id);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let central = TestCentral::without_worker().await;
    central.create_user(USER_USERNAME, Role::User).await;

    let err = verify_credentials(central.tasks.context(), USER_USERNAME, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Validation(_)));
}

#[tokio::test]
async fn test_deleted_caller_is_not_found() {
    let central = TestCentral::without_worker().await;
    let resolver = central.tasks.resolver();
    let caller = AuthenticatedCaller::new("USER:deleted-long-ago");
    let calls_before = central.vms.calls();

    let err = central
        .tasks
        .get_all_vms()
        .submit(&caller, &resolver)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!err.is_unauthorized());
    assert_eq!(central.vms.calls(), calls_before);
}

#[tokio::test]
async fn test_resolved_caller_gets_the_stored_role() {
    let central = TestCentral::without_worker().await;
    let resolver = central.tasks.resolver();
    let alice = central.create_user(USER_USERNAME, Role::User).await;

    let err = central
        .tasks
        .get_all_users()
        .submit(&AuthenticatedCaller::new(alice.id.clone()), &resolver)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let admin = AuthenticatedCaller::new(central.admin.id.clone());
    let all = central
        .tasks
        .get_all_users()
        .submit(&admin, &resolver)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}
