//! Audit Sink (C10) and `people` lookup integration tests against a real
//! Postgres instance: the CHECK constraints on `audit_events` and the
//! `people` array-containment query used by the deep-link bind check.

mod common;

use common::TestHarness;
use server_core::kernel::audit::{AuditEvent, AuditResult, AuditSink};
use test_context::test_context;
use uuid::Uuid;

#[test_context(TestHarness)]
#[tokio::test]
async fn record_persists_a_row_with_normalized_subject(ctx: &TestHarness) {
    let sink = AuditSink::new(ctx.db_pool.clone());

    sink.record(AuditEvent {
        source: "admin_dashboard".to_string(),
        action: "auth.login".to_string(),
        result: AuditResult::Success,
        actor_provider: "admin_sso".to_string(),
        actor_subject: AuditEvent::normalized_subject("admin_sso", "Person@Example.com"),
        actor_display_name: Some("Person Example".to_string()),
        resource_type: None,
        resource_id: None,
        correlation_id: None,
        person_id: None,
        metadata: serde_json::json!({"is_admin": true}),
    })
    .await;

    let row: (String, String, String) = sqlx::query_as(
        "SELECT actor_subject, result, source FROM audit_events WHERE action = 'auth.login'",
    )
    .fetch_one(&ctx.db_pool)
    .await
    .expect("audit row exists");

    assert_eq!(row.0, "person@example.com");
    assert_eq!(row.1, "success");
    assert_eq!(row.2, "admin_dashboard");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invalid_source_is_rejected_by_check_constraint(ctx: &TestHarness) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_events (id, source, action, result, actor_provider, actor_subject)
        VALUES (gen_random_uuid(), 'not_a_real_source', 'auth.login', 'success', 'admin_sso', 'person@example.com')
        "#,
    )
    .execute(&ctx.db_pool)
    .await;

    assert!(result.is_err(), "a source outside the CHECK's allowed set must be rejected");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn deep_link_bind_check_matches_on_discord_subject_and_email(ctx: &TestHarness) {
    let person_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO people (id, external_id, emails, discord_subject, sync_status)
        VALUES ($1, $2, ARRAY['person@example.com'], 'discord-123', 'active')
        "#,
    )
    .bind(person_id)
    .bind(format!("ext-{person_id}"))
    .execute(&ctx.db_pool)
    .await
    .expect("insert person");

    let matched: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM people
        WHERE sync_status = 'active'
          AND discord_subject = $1
          AND $2 = ANY(emails)
        LIMIT 1
        "#,
    )
    .bind("discord-123")
    .bind("person@example.com")
    .fetch_optional(&ctx.db_pool)
    .await
    .expect("query");
    assert_eq!(matched.map(|r| r.0), Some(person_id));

    let no_match: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM people
        WHERE sync_status = 'active'
          AND discord_subject = $1
          AND $2 = ANY(emails)
        LIMIT 1
        "#,
    )
    .bind("discord-123")
    .bind("someone-else@example.com")
    .fetch_optional(&ctx.db_pool)
    .await
    .expect("query");
    assert!(no_match.is_none(), "a mismatched email must not bind");
}
