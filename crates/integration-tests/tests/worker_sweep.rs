//! The expiry worker against real storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hd_core::error::AppError;
use hd_core::models::{NewUser, Role, Ticket, TicketStatus};
use hd_core::traits::TicketRepo;
use hd_services::{ExpiryPolicy, TicketExpiryWorker, WorkerManager};
use integration_tests::TestDb;

async fn seed_author(db: &TestDb) {
    db.users()
        .create_user(NewUser {
            username: "alice_01".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            role: Role::User,
        })
        .await
        .unwrap();
}

async fn seed_ticket(tickets: &dyn TicketRepo, name: &str, status: TicketStatus, age_days: i64) -> Ticket {
    let mut ticket = Ticket::new(name, "details", "alice@example.com");
    ticket.status = status;
    ticket.created_at = Utc::now() - chrono::Duration::days(age_days);
    ticket.updated_at = ticket.created_at;
    tickets.create_ticket(ticket, vec![]).await.unwrap()
}

fn policy(interval: Duration) -> ExpiryPolicy {
    ExpiryPolicy { interval, status: TicketStatus::Concluded, older_than_days: 10 }
}

#[tokio::test]
async fn one_sweep_removes_only_old_tickets_in_target_status() {
    let db = TestDb::new().await;
    seed_author(&db).await;
    let tickets = db.tickets();

    let old_done = seed_ticket(tickets.as_ref(), "old", TicketStatus::Concluded, 11).await;
    tickets.add_ticket_history(&old_done.id, "closed").await.unwrap();
    let recent_done = seed_ticket(tickets.as_ref(), "recent", TicketStatus::Concluded, 9).await;
    let old_open = seed_ticket(tickets.as_ref(), "open", TicketStatus::Doing, 30).await;

    let worker = TicketExpiryWorker::new(tickets.clone(), policy(Duration::from_secs(3600)));
    assert_eq!(worker.sweep_once().await.unwrap(), 1);

    assert!(matches!(tickets.get_ticket(&old_done.id).await, Err(AppError::NotFound(_))));
    tickets.get_ticket(&recent_done.id).await.unwrap();
    tickets.get_ticket(&old_open.id).await.unwrap();

    // Nothing left to expire.
    assert_eq!(worker.sweep_once().await.unwrap(), 0);
}

#[tokio::test]
async fn managed_worker_sweeps_on_its_own_and_stops_cleanly() {
    let db = TestDb::new().await;
    seed_author(&db).await;
    let tickets = db.tickets();
    let expired = seed_ticket(tickets.as_ref(), "old", TicketStatus::Concluded, 11).await;

    let mut manager = WorkerManager::new();
    manager.register(Arc::new(TicketExpiryWorker::new(tickets.clone(), policy(Duration::from_millis(50)))));
    manager.start_all();

    let mut gone = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if tickets.get_ticket(&expired.id).await.is_err() {
            gone = true;
            break;
        }
    }
    manager.stop_all().await;
    assert!(gone, "expired ticket was never swept");
    assert_eq!(manager.running(), 0);

    // A ticket that expires after the stop stays put.
    let late = seed_ticket(tickets.as_ref(), "late", TicketStatus::Concluded, 11).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    tickets.get_ticket(&late.id).await.unwrap();
}
