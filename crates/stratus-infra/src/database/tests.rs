#[cfg(test)]
mod tests {
    use crate::database::entity::webhook_event;
    use crate::database::webhook_store::PostgresWebhookEventStore;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};
    use stratus_core::RepoError;
    use stratus_core::domain::WebhookEvent;
    use stratus_core::ports::{InsertOutcome, WebhookEventStore};

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_maps_row_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1), exec(0)])
            .into_connection();
        let store = PostgresWebhookEventStore::new(db);
        let event = WebhookEvent::registered("evt_1", "invoice.paid", chrono::Utc::now());

        assert_eq!(store.insert_if_absent(&event).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            store.insert_if_absent(&event).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_insert_uses_on_conflict_do_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1)])
            .into_connection();
        let store = PostgresWebhookEventStore::new(db.clone());
        let event = WebhookEvent::registered("evt_sql", "invoice.paid", chrono::Utc::now());

        store.insert_if_absent(&event).await.unwrap();

        let log: Vec<Transaction> = db.into_transaction_log();
        let sql = format!("{:?}", log[0]);
        assert!(sql.contains("ON CONFLICT") && sql.contains("DO NOTHING"), "{sql}");
    }

    #[tokio::test]
    async fn test_mark_processed_unknown_id_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(0)])
            .into_connection();
        let store = PostgresWebhookEventStore::new(db);

        let err = store
            .mark_processed("evt_missing", chrono::Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn test_find_webhook_event() {
        let now = chrono::Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![webhook_event::Model {
                id: "evt_1".to_owned(),
                event_type: "invoice.paid".to_owned(),
                processed: true,
                created_at: now.into(),
                updated_at: now.into(),
            }]])
            .into_connection();
        let store = PostgresWebhookEventStore::new(db);

        let event = store.find("evt_1").await.unwrap().unwrap();
        assert_eq!(event.event_type, "invoice.paid");
        assert!(event.processed);
    }

    #[tokio::test]
    async fn test_purge_returns_deleted_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(7)])
            .into_connection();
        let store = PostgresWebhookEventStore::new(db);

        let purged = store.purge_processed_before(chrono::Utc::now()).await.unwrap();
        assert_eq!(purged, 7);
    }
}
