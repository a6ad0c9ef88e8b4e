//! Authentication seed scenario: a wrong password creates no session and
//! every later probe fails with the same error text.

use crosslock_core::types::Username;
use crosslock_core::CrosslockError;
use crosslock_identity::{IdentityStore, SessionManager};

fn temp_store() -> IdentityStore {
    let dir = std::env::temp_dir().join(format!("crosslock_auth_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    IdentityStore::open(dir).unwrap()
}

#[test]
fn wrong_password_creates_no_session_and_leaks_nothing() {
    let store = temp_store();
    let sessions = SessionManager::with_default_ttl();

    let alice = Username::from("alice");
    let bob = Username::from("bob");
    store.register(&alice, "pw1").unwrap();
    store.register(&bob, "pw2").unwrap();

    // login("alice", "pw2") fails...
    let err = sessions.login(&store, &alice, "pw2").unwrap_err();
    assert!(matches!(err, CrosslockError::AuthFailed));

    // ...identically to a login for a user that does not exist.
    let ghost = sessions
        .login(&store, &Username::from("mallory"), "pw2")
        .unwrap_err();
    assert_eq!(err.to_string(), ghost.to_string());

    // No session was created; whoami with any id fails the same way.
    for probe in ["", "deadbeef", "0123456789abcdef0123456789abcdef"] {
        let whoami = sessions.whoami(probe).unwrap_err();
        assert_eq!(whoami.to_string(), err.to_string());
    }

    // The right password still works, and the session round-trips.
    let sid = sessions.login(&store, &alice, "pw1").unwrap();
    assert_eq!(sessions.whoami(&sid).unwrap(), alice);
}
