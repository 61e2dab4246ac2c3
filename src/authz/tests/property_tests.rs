//! Property-based tests for wildcard matching and context scoping

use proptest::prelude::*;
use warden_authz::{Authorizer, ContextRef, EngineConfig, Permission, SubjectRef, WildcardMatcher};

fn segment() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn permission_name() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..4)
}

proptest! {
    #[test]
    fn test_exact_pattern_matches_only_itself(a in permission_name(), b in permission_name()) {
        let matcher = WildcardMatcher::new();
        let a = a.join(".");
        let b = b.join(".");
        prop_assert!(matcher.matches(&a, &a));
        prop_assert_eq!(matcher.matches(&a, &b), a == b);
    }

    #[test]
    fn test_global_token_matches_everything(name in permission_name()) {
        let matcher = WildcardMatcher::new();
        prop_assert!(matcher.matches("*", &name.join(".")));
    }

    #[test]
    fn test_trailing_token_covers_descendants(
        prefix in permission_name(),
        rest in permission_name(),
    ) {
        let matcher = WildcardMatcher::new();
        let pattern = format!("{}.*", prefix.join("."));
        let child = format!("{}.{}", prefix.join("."), rest.join("."));
        prop_assert!(matcher.matches(&pattern, &child));
        // The prefix alone is not covered
        prop_assert!(!matcher.matches(&pattern, &prefix.join(".")));
    }

    #[test]
    fn test_leading_token_requires_same_depth(
        head in segment(),
        action in segment(),
        extra in segment(),
    ) {
        let matcher = WildcardMatcher::new();
        let pattern = format!("*.{}", action);
        let same_depth = format!("{}.{}", head, action);
        let deeper = format!("{}.{}.{}", head, extra, action);
        prop_assert!(matcher.matches(&pattern, &same_depth));
        prop_assert!(!matcher.matches(&pattern, &deeper));
    }

    #[test]
    fn test_scoped_grant_never_leaks_across_contexts(
        granted in "[a-z0-9]{1,6}",
        requested in "[a-z0-9]{1,6}",
        fallback in any::<bool>(),
    ) {
        let outcome = tokio_test::block_on(async {
            let mut config = EngineConfig::default();
            config.context.global_fallback = fallback;
            let authz = Authorizer::in_memory(config).unwrap();
            authz
                .registry()
                .create_permission(Permission::new("docs.edit", "web"))
                .await
                .unwrap();

            let subject = SubjectRef::new("user", "p", "web");
            let granted = ContextRef::new("team", granted.as_str());
            let requested = ContextRef::new("team", requested.as_str());
            authz
                .grants()
                .give_permission_to(&subject, ["docs.edit"], Some(&granted))
                .await
                .unwrap();

            let in_requested = authz
                .has_permission(&subject, "docs.edit", Some(&requested))
                .await
                .unwrap();
            let global = authz.has_permission(&subject, "docs.edit", None).await.unwrap();
            (in_requested, global, granted == requested)
        });

        let (in_requested, global, same) = outcome;
        prop_assert_eq!(in_requested, same);
        prop_assert!(!global);
    }

    #[test]
    fn test_global_grant_reaches_contexts_only_with_fallback(
        team in "[a-z0-9]{1,6}",
        fallback in any::<bool>(),
    ) {
        let allowed = tokio_test::block_on(async {
            let mut config = EngineConfig::default();
            config.context.global_fallback = fallback;
            let authz = Authorizer::in_memory(config).unwrap();
            authz
                .registry()
                .create_permission(Permission::new("docs.edit", "web"))
                .await
                .unwrap();

            let subject = SubjectRef::new("user", "p", "web");
            authz
                .grants()
                .give_permission_to(&subject, ["docs.edit"], None)
                .await
                .unwrap();

            let team = ContextRef::new("team", team.as_str());
            authz
                .has_permission(&subject, "docs.edit", Some(&team))
                .await
                .unwrap()
        });

        prop_assert_eq!(allowed, fallback);
    }
}
