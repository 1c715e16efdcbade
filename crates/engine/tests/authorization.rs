//! Integration tests for read-access-tag authorization and the per-type
//! uniqueness rules.

mod common;

use serde_json::json;

use common::{local_user, remote_user, tagged, tagged_with, TestEngine};
use helios_bundle_engine::outcome::{Outcome, OutcomeKind};
use helios_bundle_engine::types::{Bundle, BundleEntry, ReadAccess, RequestMethod};

#[tokio::test]
async fn test_local_tag_hides_resource_from_remote_user() {
    let engine = TestEngine::new();
    engine
        .store
        .seed("Location", "loc-1", tagged("Location", &[ReadAccess::Local]));

    let bundle =
        Bundle::batch().with_entry(BundleEntry::new(RequestMethod::Get, "Location/loc-1"));

    let local = engine.factory.execute(&local_user(), &bundle).await.unwrap();
    assert_eq!(local.entries[0].status, 200);

    let remote = engine
        .factory
        .execute(&remote_user("org.partner"), &bundle)
        .await
        .unwrap();
    assert_eq!(remote.entries[0].status, 403);
}

#[tokio::test]
async fn test_organization_tag_scopes_to_affiliation() {
    let engine = TestEngine::new();
    engine.store.seed(
        "Binary",
        "bin-1",
        tagged(
            "Binary",
            &[ReadAccess::Organization("org.partner".to_string())],
        ),
    );

    let bundle = Bundle::batch().with_entry(BundleEntry::new(RequestMethod::Get, "Binary/bin-1"));

    let member = engine
        .factory
        .execute(&remote_user("org.partner"), &bundle)
        .await
        .unwrap();
    assert_eq!(member.entries[0].status, 200);

    let outsider = engine
        .factory
        .execute(&remote_user("org.other"), &bundle)
        .await
        .unwrap();
    assert_eq!(outsider.entries[0].status, 403);
}

#[tokio::test]
async fn test_untagged_resource_rejected_on_create() {
    let engine = TestEngine::new();

    let bundle = Bundle::transaction().with_entry(
        BundleEntry::new(RequestMethod::Post, "Location")
            .with_resource(json!({"resourceType": "Location", "name": "untagged"})),
    );

    let err = engine
        .factory
        .execute(&local_user(), &bundle)
        .await
        .unwrap_err();
    assert_eq!(Outcome::from(&err).kind, OutcomeKind::AuthorizationDenied);
}

#[tokio::test]
async fn test_remote_user_cannot_create_resource_it_could_not_read() {
    let engine = TestEngine::new();

    let bundle = Bundle::transaction().with_entry(
        BundleEntry::new(RequestMethod::Post, "Location")
            .with_resource(tagged("Location", &[ReadAccess::Local])),
    );

    let err = engine
        .factory
        .execute(&remote_user("org.partner"), &bundle)
        .await
        .unwrap_err();
    assert_eq!(Outcome::from(&err).status, 403);

    // A local user may create the same resource.
    let result = engine.factory.execute(&local_user(), &bundle).await.unwrap();
    assert_eq!(result.entries[0].status, 201);
}

#[tokio::test]
async fn test_delete_mirrors_read_access() {
    let engine = TestEngine::new();
    engine
        .store
        .seed("Location", "loc-1", tagged("Location", &[ReadAccess::Local]));

    let bundle =
        Bundle::batch().with_entry(BundleEntry::new(RequestMethod::Delete, "Location/loc-1"));

    let remote = engine
        .factory
        .execute(&remote_user("org.partner"), &bundle)
        .await
        .unwrap();
    assert_eq!(remote.entries[0].status, 403);
    assert!(!engine.store.latest("Location", "loc-1").unwrap().is_deleted());

    let local = engine.factory.execute(&local_user(), &bundle).await.unwrap();
    assert_eq!(local.entries[0].status, 204);
}

#[tokio::test]
async fn test_expunge_requires_prior_soft_delete() {
    let engine = TestEngine::new();
    engine
        .store
        .seed("Location", "loc-1", tagged("Location", &[ReadAccess::All]));

    let bundle = Bundle::batch().with_entry(BundleEntry::new(
        RequestMethod::Delete,
        "Location/loc-1/$expunge",
    ));

    let result = engine.factory.execute(&local_user(), &bundle).await.unwrap();
    assert_eq!(result.entries[0].status, 400);
    assert_eq!(engine.store.version_count("Location", "loc-1"), 1);
}

#[tokio::test]
async fn test_expunge_restricted_to_local_users() {
    let engine = TestEngine::new();
    engine
        .store
        .seed_deleted("Location", "loc-1", tagged("Location", &[ReadAccess::All]));

    let bundle = Bundle::batch().with_entry(BundleEntry::new(
        RequestMethod::Delete,
        "Location/loc-1/$expunge",
    ));

    let remote = engine
        .factory
        .execute(&remote_user("org.partner"), &bundle)
        .await
        .unwrap();
    assert_eq!(remote.entries[0].status, 403);
    assert_eq!(engine.store.version_count("Location", "loc-1"), 2);

    let local = engine.factory.execute(&local_user(), &bundle).await.unwrap();
    assert_eq!(local.entries[0].status, 204);
    // Expunge removes the whole history.
    assert_eq!(engine.store.version_count("Location", "loc-1"), 0);
}

#[tokio::test]
async fn test_organization_identifier_must_be_unique() {
    let engine = TestEngine::new();
    engine.store.seed(
        "Organization",
        "org-1",
        tagged_with(
            "Organization",
            &[ReadAccess::All],
            json!({"identifier": [{"system": "http://example.org/sid", "value": "a"}]}),
        ),
    );

    let bundle = Bundle::transaction().with_entry(
        BundleEntry::new(RequestMethod::Post, "Organization").with_resource(tagged_with(
            "Organization",
            &[ReadAccess::All],
            json!({"identifier": [{"system": "http://example.org/sid", "value": "a"}]}),
        )),
    );

    let err = engine
        .factory
        .execute(&local_user(), &bundle)
        .await
        .unwrap_err();
    assert_eq!(Outcome::from(&err).kind, OutcomeKind::AuthorizationDenied);
}

#[tokio::test]
async fn test_organization_identifier_is_immutable() {
    let engine = TestEngine::new();
    engine.store.seed(
        "Organization",
        "org-1",
        tagged_with(
            "Organization",
            &[ReadAccess::All],
            json!({"identifier": [{"system": "http://example.org/sid", "value": "a"}]}),
        ),
    );

    let changed = Bundle::transaction().with_entry(
        BundleEntry::new(RequestMethod::Put, "Organization/org-1").with_resource(tagged_with(
            "Organization",
            &[ReadAccess::All],
            json!({
                "id": "org-1",
                "identifier": [{"system": "http://example.org/sid", "value": "b"}]
            }),
        )),
    );
    let err = engine
        .factory
        .execute(&local_user(), &changed)
        .await
        .unwrap_err();
    assert_eq!(Outcome::from(&err).status, 403);

    // Same identifier, other fields changed: allowed.
    let renamed = Bundle::transaction().with_entry(
        BundleEntry::new(RequestMethod::Put, "Organization/org-1").with_resource(tagged_with(
            "Organization",
            &[ReadAccess::All],
            json!({
                "id": "org-1",
                "identifier": [{"system": "http://example.org/sid", "value": "a"}],
                "name": "renamed"
            }),
        )),
    );
    let result = engine
        .factory
        .execute(&local_user(), &renamed)
        .await
        .unwrap();
    assert_eq!(result.entries[0].status, 200);
}

#[tokio::test]
async fn test_endpoint_address_must_be_unique() {
    let engine = TestEngine::new();
    engine.store.seed(
        "Endpoint",
        "ep-1",
        tagged_with(
            "Endpoint",
            &[ReadAccess::All],
            json!({"address": "https://dup.example.org/endpoint"}),
        ),
    );

    let bundle = Bundle::transaction().with_entry(
        BundleEntry::new(RequestMethod::Post, "Endpoint").with_resource(tagged_with(
            "Endpoint",
            &[ReadAccess::All],
            json!({"address": "https://dup.example.org/endpoint"}),
        )),
    );

    let err = engine
        .factory
        .execute(&local_user(), &bundle)
        .await
        .unwrap_err();
    assert_eq!(Outcome::from(&err).kind, OutcomeKind::AuthorizationDenied);
}

#[tokio::test]
async fn test_unknown_resource_type_denied() {
    let engine = TestEngine::new();

    let bundle = Bundle::batch().with_entry(
        BundleEntry::new(RequestMethod::Post, "Observation")
            .with_resource(tagged_with("Observation", &[ReadAccess::All], json!({}))),
    );

    let result = engine.factory.execute(&local_user(), &bundle).await.unwrap();
    assert_eq!(result.entries[0].status, 403);
}

#[tokio::test]
async fn test_denial_does_not_leak_policy_details() {
    let engine = TestEngine::new();
    engine
        .store
        .seed("Location", "loc-1", tagged("Location", &[ReadAccess::Local]));

    let bundle =
        Bundle::batch().with_entry(BundleEntry::new(RequestMethod::Get, "Location/loc-1"));
    let result = engine
        .factory
        .execute(&remote_user("org.partner"), &bundle)
        .await
        .unwrap();

    let outcome = result.entries[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.diagnostics, "access to the requested resource is denied");
}
