//! Local accounts, token lifecycle, role administration, and user search.

mod common;

use std::collections::HashSet;

use common::{PROVIDER, display_name, email, remote_identity, test_env, user_name};
use identeco::auth::{LocalLoginResult, LoginToken};
use identeco::crypto::Password;
use identeco::error::AuthError;
use identeco::storage::Storage;
use identeco::types::{
    AuthConfig, AuthConfigSet, CustomRole, IncomingToken, Role, TokenType, UserName,
    UserSearchSpec, UserUpdate,
};

fn incoming(token: &str) -> IncomingToken {
    IncomingToken::new(token).unwrap()
}

fn plaintext(pwd: &Password) -> String {
    String::from_utf8(pwd.as_bytes().to_vec()).unwrap()
}

/// Root login token via create_root + local login.
async fn root_token(env: &common::TestEnv) -> IncomingToken {
    env.auth
        .create_root(Password::new("rootpassword"))
        .await
        .unwrap();
    match env
        .auth
        .local_login(&UserName::root(), Password::new("rootpassword"))
        .await
        .unwrap()
    {
        LocalLoginResult::LoggedIn(token) => incoming(token.token()),
        LocalLoginResult::ResetRequired(_) => panic!("root must not require a reset"),
    }
}

/// A standard (identity-linked) user, logged in; returns their token.
async fn standard_user(env: &common::TestEnv, name: &str) -> IncomingToken {
    let identity = remote_identity(&format!("id-{name}"), name);
    env.provider
        .respond_to(&format!("code-{name}"), HashSet::from([identity]))
        .await;
    let LoginToken::Deferred(temp) = env
        .auth
        .login(PROVIDER, &format!("code-{name}"))
        .await
        .unwrap()
    else {
        panic!("expected deferral for a fresh identity");
    };
    let temp_incoming = incoming(temp.token());
    let state = env.auth.get_login_state(&temp_incoming).await.unwrap();
    let token = env
        .auth
        .create_user(
            &temp_incoming,
            state.unlinked()[0].local_id(),
            &user_name(name),
            &display_name(name),
            &email(&format!("{name}@example.com")),
        )
        .await
        .unwrap();
    incoming(token.token())
}

/// A standard user walked up the grant chain to Admin: root grants
/// CreateAdmin, then the user self-grants Admin.
async fn admin_user(env: &common::TestEnv, root: &IncomingToken, name: &str) -> IncomingToken {
    let token = standard_user(env, name).await;
    env.auth
        .update_roles(
            root,
            &user_name(name),
            &HashSet::from([Role::CreateAdmin]),
            &HashSet::new(),
        )
        .await
        .unwrap();
    env.auth
        .update_roles(
            &token,
            &user_name(name),
            &HashSet::from([Role::Admin]),
            &HashSet::new(),
        )
        .await
        .unwrap();
    token
}

#[tokio::test]
async fn create_root_is_idempotent_and_reenables() {
    let env = test_env(true).await;
    let root = root_token(&env).await;

    // Creating root again resets the password to the new value.
    env.auth.create_root(Password::new("newpassword")).await.unwrap();
    assert!(matches!(
        env.auth
            .local_login(&UserName::root(), Password::new("rootpassword"))
            .await,
        Err(AuthError::Authentication(_))
    ));
    match env
        .auth
        .local_login(&UserName::root(), Password::new("newpassword"))
        .await
        .unwrap()
    {
        LocalLoginResult::LoggedIn(_) => {}
        LocalLoginResult::ResetRequired(_) => panic!("unexpected reset"),
    }

    // Root disables itself; create_root re-enables.
    env.auth
        .disable_account(&root, &UserName::root(), true, "maintenance")
        .await
        .unwrap();
    env.auth.create_root(Password::new("thirdpassword")).await.unwrap();
    let user = env.storage.get_user(&UserName::root()).await.unwrap();
    assert!(!user.is_disabled());
}

#[tokio::test]
async fn local_user_lifecycle_with_forced_reset() {
    let env = test_env(true).await;
    let root = root_token(&env).await;

    let temp_pwd = env
        .auth
        .create_local_user(
            &root,
            &user_name("opsadmin"),
            &display_name("Ops Admin"),
            &email("ops@example.com"),
        )
        .await
        .unwrap();

    // First login demands a reset and carries only the username.
    let name = user_name("opsadmin");
    let pwd = plaintext(&temp_pwd);
    match env.auth.local_login(&name, Password::new(&pwd)).await.unwrap() {
        LocalLoginResult::ResetRequired(reset_name) => assert_eq!(reset_name, name),
        LocalLoginResult::LoggedIn(_) => panic!("expected forced reset"),
    }

    // Change the password; login then issues a token.
    env.auth
        .local_password_change(&name, Password::new(&pwd), Password::new("chosenpwd"))
        .await
        .unwrap();
    let token = match env
        .auth
        .local_login(&name, Password::new("chosenpwd"))
        .await
        .unwrap()
    {
        LocalLoginResult::LoggedIn(token) => token,
        LocalLoginResult::ResetRequired(_) => panic!("reset should be cleared"),
    };
    assert_eq!(token.token_type(), TokenType::Login);
    let user = env.auth.get_user(&incoming(token.token())).await.unwrap();
    assert_eq!(user.user_name(), &name);
    assert!(user.is_local());

    // Unknown user and wrong password are indistinguishable.
    for (user, pwd) in [("opsadmin", "wrongpwd"), ("ghost", "chosenpwd")] {
        let err = env
            .auth
            .local_login(&user_name(user), Password::new(pwd))
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Username / password mismatch");
    }
}

#[tokio::test]
async fn create_local_user_requires_admin_and_rejects_root_name() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let plain = standard_user(&env, "pleb").await;

    assert!(matches!(
        env.auth
            .create_local_user(
                &plain,
                &user_name("someone"),
                &display_name("Some One"),
                &email("s@example.com"),
            )
            .await,
        Err(AuthError::Unauthorized(_))
    ));
    let err = env
        .auth
        .create_local_user(
            &root,
            &UserName::root(),
            &display_name("root"),
            &email("r@example.com"),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Cannot create ROOT user");
}

#[tokio::test]
async fn non_admin_login_can_be_disabled() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin = admin_user(&env, &root, "confadmin").await;
    let pwd = env
        .auth
        .create_local_user(
            &root,
            &user_name("plainuser"),
            &display_name("Plain"),
            &email("p@example.com"),
        )
        .await
        .unwrap();
    let pwd = plaintext(&pwd);
    env.auth
        .local_password_change(
            &user_name("plainuser"),
            Password::new(&pwd),
            Password::new("realpwd"),
        )
        .await
        .unwrap();

    // Flip login off via the admin config surface; the cache refreshes
    // immediately.
    let config = env.auth.get_config(&admin).await.unwrap();
    let new_config = AuthConfigSet::new(
        AuthConfig::new(
            false,
            config.config().providers().clone(),
            config.config().token_lifetimes_ms().clone(),
        ),
        config.external().clone(),
    );
    env.auth.update_config(&admin, new_config).await.unwrap();

    let err = env
        .auth
        .local_login(&user_name("plainuser"), Password::new("realpwd"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Non-admin login is disabled");

    // Admins still log in.
    match env
        .auth
        .local_login(&UserName::root(), Password::new("rootpassword"))
        .await
        .unwrap()
    {
        LocalLoginResult::LoggedIn(_) => {}
        LocalLoginResult::ResetRequired(_) => panic!("unexpected reset"),
    }
}

#[tokio::test]
async fn admin_password_reset_forces_change() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin = admin_user(&env, &root, "resetter").await;
    env.auth
        .create_local_user(
            &root,
            &user_name("resetme"),
            &display_name("Reset Me"),
            &email("r@example.com"),
        )
        .await
        .unwrap();

    let new_pwd = env
        .auth
        .reset_password(&admin, &user_name("resetme"))
        .await
        .unwrap();
    let pwd = plaintext(&new_pwd);
    match env
        .auth
        .local_login(&user_name("resetme"), Password::new(&pwd))
        .await
        .unwrap()
    {
        LocalLoginResult::ResetRequired(_) => {}
        LocalLoginResult::LoggedIn(_) => panic!("expected forced reset after admin reset"),
    }

    // Force-reset-all marks every local user, root included.
    env.auth.force_reset_all_passwords(&admin).await.unwrap();
    match env
        .auth
        .local_login(&UserName::root(), Password::new("rootpassword"))
        .await
        .unwrap()
    {
        LocalLoginResult::ResetRequired(name) => assert!(name.is_root()),
        LocalLoginResult::LoggedIn(_) => panic!("expected forced reset"),
    }

    // Plain tokens cannot reset anyone.
    let plain = standard_user(&env, "nobody").await;
    assert!(matches!(
        env.auth.reset_password(&plain, &user_name("resetme")).await,
        Err(AuthError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn token_lifecycle_revocation() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin = admin_user(&env, &root, "tokenadmin").await;
    let user_token = standard_user(&env, "henry").await;

    // The listing shows the presented token as current, not in the rest.
    let tokens = env.auth.get_tokens(&user_token).await.unwrap();
    assert_eq!(tokens.current().user_name(), &user_name("henry"));
    assert!(tokens.tokens().is_empty());

    // Revoke by id: the token stops resolving.
    let ht = env.auth.get_token(&user_token).await.unwrap();
    env.auth.revoke_token(&user_token, ht.id()).await.unwrap();
    assert!(matches!(
        env.auth.get_user(&user_token).await,
        Err(AuthError::InvalidToken)
    ));

    // revoke_current_token on a dead token is a quiet no-op.
    assert!(
        env.auth
            .revoke_current_token(&user_token)
            .await
            .unwrap()
            .is_none()
    );

    // Admin revocation of another user's tokens.
    let other = standard_user(&env, "irene").await;
    let listed = env
        .auth
        .get_tokens_as_admin(&admin, &user_name("irene"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    env.auth
        .revoke_user_tokens(&admin, &user_name("irene"))
        .await
        .unwrap();
    assert!(matches!(
        env.auth.get_user(&other).await,
        Err(AuthError::InvalidToken)
    ));

    // Global revocation kills everything, including the admin's own token.
    let another = standard_user(&env, "jack").await;
    env.auth.revoke_all_tokens(&admin).await.unwrap();
    assert!(matches!(
        env.auth.get_user(&another).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        env.auth.get_user(&admin).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn extended_tokens_require_login_token_and_role() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin = admin_user(&env, &root, "granter").await;
    let dev_only = standard_user(&env, "devonly").await;

    // No token-creation role yet.
    assert!(matches!(
        env.auth.create_token(&dev_only, "ci token", false).await,
        Err(AuthError::Unauthorized(_))
    ));

    env.auth
        .update_roles(
            &admin,
            &user_name("devonly"),
            &HashSet::from([Role::DevToken]),
            &HashSet::new(),
        )
        .await
        .unwrap();

    let dev_token = env
        .auth
        .create_token(&dev_only, "ci token", false)
        .await
        .unwrap();
    assert_eq!(dev_token.token_type(), TokenType::ExtendedLifetime);

    // An extended-lifetime token cannot mint further tokens.
    let err = env
        .auth
        .create_token(&incoming(dev_token.token()), "another", false)
        .await
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "Only login tokens may be used to create a token"
    );

    // DevToken does not satisfy ServToken, but ServToken satisfies DevToken.
    assert!(matches!(
        env.auth.create_token(&dev_only, "server token", true).await,
        Err(AuthError::Unauthorized(_))
    ));
    let serv_only = standard_user(&env, "servonly").await;
    env.auth
        .update_roles(
            &admin,
            &user_name("servonly"),
            &HashSet::from([Role::ServToken]),
            &HashSet::new(),
        )
        .await
        .unwrap();
    assert!(env.auth.create_token(&serv_only, "srv", true).await.is_ok());
    assert!(env.auth.create_token(&serv_only, "dev", false).await.is_ok());

    // A blank name is rejected before anything else.
    assert!(matches!(
        env.auth.create_token(&dev_only, "  ", false).await,
        Err(AuthError::MissingParameter(_))
    ));
}

#[tokio::test]
async fn role_updates_enforce_grant_hierarchy() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let alice = standard_user(&env, "alice").await;
    let _bob = standard_user(&env, "bob").await;

    // Root cannot grant Admin directly.
    let err = env
        .auth
        .update_roles(
            &root,
            &user_name("alice"),
            &HashSet::from([Role::Admin]),
            &HashSet::new(),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Not authorized to grant role(s): Administrator");

    // Nobody touches root's roles.
    let err = env
        .auth
        .update_roles(
            &root,
            &UserName::root(),
            &HashSet::new(),
            &HashSet::from([Role::Root]),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Cannot change ROOT roles");

    // add/remove overlap is rejected up front.
    let err = env
        .auth
        .update_roles(
            &root,
            &user_name("alice"),
            &HashSet::from([Role::CreateAdmin]),
            &HashSet::from([Role::CreateAdmin]),
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AuthError::IllegalParameter(_)));

    // The grant chain works one link at a time, and the resulting role set
    // is (prev ∪ add) \ remove.
    env.auth
        .update_roles(
            &root,
            &user_name("alice"),
            &HashSet::from([Role::CreateAdmin]),
            &HashSet::new(),
        )
        .await
        .unwrap();
    env.auth
        .update_roles(
            &alice,
            &user_name("bob"),
            &HashSet::from([Role::Admin]),
            &HashSet::new(),
        )
        .await
        .unwrap();
    let bob = env
        .auth
        .get_user_as_admin(&root, &user_name("bob"))
        .await
        .unwrap();
    assert_eq!(bob.roles(), &HashSet::from([Role::Admin]));

    // Alice cannot remove roles outside her grantable set from another
    // user...
    let err = env
        .auth
        .update_roles(
            &alice,
            &user_name("bob"),
            &HashSet::new(),
            &HashSet::from([Role::Admin, Role::DevToken]),
        )
        .await
        .err()
        .unwrap();
    assert!(err.to_string().starts_with("Not authorized to remove role(s):"));

    // ...but may remove any of her own roles without grant authority.
    env.auth
        .remove_roles(&alice, &HashSet::from([Role::CreateAdmin]))
        .await
        .unwrap();
    let alice_user = env
        .auth
        .get_user_as_admin(&root, &user_name("alice"))
        .await
        .unwrap();
    assert!(alice_user.roles().is_empty());
}

#[tokio::test]
async fn custom_roles_are_admin_assigned_tags() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin_token = admin_user(&env, &root, "boss").await;
    let user_token = standard_user(&env, "tagged").await;

    env.auth
        .set_custom_role(
            &admin_token,
            CustomRole::new("datasteward", "may curate data").unwrap(),
        )
        .await
        .unwrap();
    env.auth
        .update_custom_roles(
            &admin_token,
            &user_name("tagged"),
            &HashSet::from(["datasteward".to_string()]),
            &HashSet::new(),
        )
        .await
        .unwrap();

    // Non-admins may list but not mutate, not even their own tags.
    let roles = env.auth.get_custom_roles(&user_token, false).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert!(matches!(
        env.auth
            .update_custom_roles(
                &user_token,
                &user_name("tagged"),
                &HashSet::new(),
                &HashSet::from(["datasteward".to_string()]),
            )
            .await,
        Err(AuthError::Unauthorized(_))
    ));

    // An add/remove overlap is rejected.
    assert!(matches!(
        env.auth
            .update_custom_roles(
                &admin_token,
                &user_name("tagged"),
                &HashSet::from(["datasteward".to_string()]),
                &HashSet::from(["datasteward".to_string()]),
            )
            .await,
        Err(AuthError::IllegalParameter(_))
    ));

    // Deleting the role strips it everywhere.
    env.auth
        .delete_custom_role(&admin_token, "datasteward")
        .await
        .unwrap();
    let user = env
        .auth
        .get_user_as_admin(&admin_token, &user_name("tagged"))
        .await
        .unwrap();
    assert!(user.custom_roles().is_empty());
}

#[tokio::test]
async fn disabling_an_account_kills_its_tokens() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let victim_token = standard_user(&env, "victim").await;

    // A blank reason is rejected.
    assert!(matches!(
        env.auth
            .disable_account(&root, &user_name("victim"), true, "  ")
            .await,
        Err(AuthError::IllegalParameter(_))
    ));

    env.auth
        .disable_account(&root, &user_name("victim"), true, "spamming")
        .await
        .unwrap();
    assert!(matches!(
        env.auth.get_user(&victim_token).await,
        Err(AuthError::InvalidToken)
    ));

    // A disabled user cannot obtain a new login token.
    env.provider
        .respond_to(
            "victim-again",
            HashSet::from([remote_identity("id-victim", "victim")]),
        )
        .await;
    let LoginToken::Deferred(temp) = env.auth.login(PROVIDER, "victim-again").await.unwrap()
    else {
        panic!("disabled users must not log straight in");
    };
    let state = env
        .auth
        .get_login_state(&incoming(temp.token()))
        .await
        .unwrap();
    let err = env
        .auth
        .complete_login(&incoming(temp.token()), state.linked()[0].1.local_id())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AuthError::Disabled(_)));

    // Re-enable; login works again.
    env.auth
        .disable_account(&root, &user_name("victim"), false, "")
        .await
        .unwrap();
    env.provider
        .respond_to(
            "victim-back",
            HashSet::from([remote_identity("id-victim", "victim")]),
        )
        .await;
    assert!(matches!(
        env.auth.login(PROVIDER, "victim-back").await.unwrap(),
        LoginToken::LoggedIn(_)
    ));

    // Only root may disable root, and nobody enables it here.
    let admin_helper = admin_user(&env, &root, "helper").await;
    let err = env
        .auth
        .disable_account(&admin_helper, &UserName::root(), true, "coup")
        .await
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "Only the root user can disable the root account"
    );
    let err = env
        .auth
        .disable_account(&root, &UserName::root(), false, "")
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "The root user cannot be enabled from the UI");
}

#[tokio::test]
async fn display_name_lookup_caps_at_ten_thousand() {
    let env = test_env(true).await;
    let token = standard_user(&env, "searcher").await;

    let mut names: HashSet<UserName> = (0..10_000).map(|i| user_name(&format!("u{i}"))).collect();
    let found = env.auth.get_user_display_names(&token, &names).await.unwrap();
    assert!(found.is_empty());

    names.insert(user_name("searcher"));
    assert!(matches!(
        env.auth.get_user_display_names(&token, &names).await,
        Err(AuthError::IllegalParameter(_))
    ));

    let found = env
        .auth
        .get_user_display_names(&token, &HashSet::from([user_name("searcher")]))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn search_restrictions_for_non_admins() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin = admin_user(&env, &root, "searchadmin").await;
    let token = standard_user(&env, "plain").await;

    let role_spec = UserSearchSpec::builder().with_search_on_role(Role::Admin).build();
    let err = env
        .auth
        .search_user_display_names(&token, &role_spec)
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Only admins may search on roles");

    let empty_spec = UserSearchSpec::builder().build();
    let err = env
        .auth
        .search_user_display_names(&token, &empty_spec)
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Only admins may search without a prefix");

    // Root's only role is Root, which does not satisfy Admin: even root is
    // bound by the non-admin search rules.
    assert!(matches!(
        env.auth.search_user_display_names(&root, &empty_spec).await,
        Err(AuthError::Unauthorized(_))
    ));

    let prefix_spec = UserSearchSpec::builder()
        .with_search_prefix("pla")
        .with_search_on_user_name(true)
        .build();
    let found = env
        .auth
        .search_user_display_names(&token, &prefix_spec)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    // Admins may search without a prefix and on roles; root is excluded
    // from search results.
    let found = env
        .auth
        .search_user_display_names(&admin, &empty_spec)
        .await
        .unwrap();
    assert!(found.len() >= 2);
    assert!(!found.contains_key(&UserName::root()));

    let found = env
        .auth
        .search_user_display_names(&admin, &role_spec)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key(&user_name("searchadmin")));
}

#[tokio::test]
async fn update_user_changes_own_details() {
    let env = test_env(true).await;
    let token = standard_user(&env, "mutable").await;

    env.auth
        .update_user(&token, UserUpdate::new().with_display_name(display_name("New Name")))
        .await
        .unwrap();
    let user = env.auth.get_user(&token).await.unwrap();
    assert_eq!(user.display_name(), &display_name("New Name"));

    // An empty update is a no-op even with a garbage token.
    env.auth
        .update_user(&incoming("garbage"), UserUpdate::new())
        .await
        .unwrap();

    // The viewable form hides the email from others.
    let other = standard_user(&env, "noseybody").await;
    let view = env.auth.view_user(&other, &user_name("mutable")).await.unwrap();
    assert!(view.email().is_none());
    let view = env.auth.view_user(&token, &user_name("mutable")).await.unwrap();
    assert_eq!(view.email(), Some(&email("mutable@example.com")));
}

#[tokio::test]
async fn provider_listing_follows_config() {
    let env = test_env(true).await;
    assert_eq!(env.auth.identity_providers().await.unwrap(), [PROVIDER]);

    let url = env
        .auth
        .identity_provider_url(PROVIDER, "somestate", false)
        .await
        .unwrap();
    assert!(url.as_str().contains("state=somestate"));

    assert!(matches!(
        env.auth.identity_provider_url("Nope", "s", false).await,
        Err(AuthError::NoSuchProvider(_))
    ));
}

#[tokio::test]
async fn update_config_rejects_unknown_providers_and_applies_immediately() {
    let env = test_env(true).await;
    let root = root_token(&env).await;
    let admin = admin_user(&env, &root, "confboss").await;

    let bad = AuthConfigSet::new(
        AuthConfig::new(
            true,
            std::collections::HashMap::from([(
                "UnknownProv".to_string(),
                identeco::types::ProviderConfig::default(),
            )]),
            std::collections::HashMap::new(),
        ),
        std::collections::HashMap::new(),
    );
    assert!(matches!(
        env.auth.update_config(&admin, bad).await,
        Err(AuthError::NoSuchProvider(_))
    ));

    // Disabling the provider makes it unknown to login immediately.
    let current = env.auth.get_config(&admin).await.unwrap();
    let mut providers = current.config().providers().clone();
    if let Some(pc) = providers.get_mut(PROVIDER) {
        pc.enabled = false;
    }
    let updated = AuthConfigSet::new(
        AuthConfig::new(
            current.config().login_allowed(),
            providers,
            current.config().token_lifetimes_ms().clone(),
        ),
        current.external().clone(),
    );
    env.auth.update_config(&admin, updated).await.unwrap();
    assert!(matches!(
        env.auth.login(PROVIDER, "whatever").await,
        Err(AuthError::NoSuchProvider(_))
    ));
    assert!(env.auth.identity_providers().await.unwrap().is_empty());
}
