//! API integration tests
//!
//! Run against a live server on a fresh database:
//! `cargo test --test api_tests -- --ignored --test-threads=1`
//! The first account ever registered is the administrator; these tests
//! register it on first use with `LIBRAIN_TEST_ADMIN_ID` / `LIBRAIN_TEST_ADMIN_PASSWORD`.

use std::collections::HashSet;

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::task::JoinSet;

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("LIBRAIN_TEST_ADMIN_ID").unwrap_or_else(|_| "admin-0001".to_string()),
        std::env::var("LIBRAIN_TEST_ADMIN_PASSWORD").unwrap_or_else(|_| "admin-password".to_string()),
    )
}

async fn login(client: &Client, national_id: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "national_id": national_id, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    assert_eq!(response.status(), StatusCode::OK, "login failed for {}", national_id);
    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn admin_token(client: &Client) -> String {
    let (national_id, password) = admin_credentials();
    // 409 when already registered
    let _ = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "national_id": national_id,
            "display_name": "Librarian",
            "password": password
        }))
        .send()
        .await
        .expect("Failed to send register request");

    login(client, &national_id, &password).await
}

/// Register a fresh reader and return (user id, token)
async fn new_reader(client: &Client, name: &str) -> (i64, String) {
    let suffix: u32 = rand::thread_rng().gen();
    let national_id = format!("{}-{:08x}", name, suffix);

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "national_id": national_id,
            "display_name": name,
            "password": "reader-password"
        }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let user: Value = response.json().await.expect("Failed to parse user");
    assert_eq!(user["role"], "reader");
    assert!(user.get("password_hash").is_none());

    let token = login(client, &national_id, "reader-password").await;
    (user["id"].as_i64().expect("No user id"), token)
}

async fn create_book(client: &Client, admin: &str, title: &str) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({ "title": title, "author": "Test Author", "genre": "Testing" }))
        .send()
        .await
        .expect("Failed to send create book request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let book: Value = response.json().await.expect("Failed to parse book");
    assert_eq!(book["available"], true);
    book["id"].as_i64().expect("No book id")
}

async fn book_available(client: &Client, book_id: i64) -> bool {
    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to fetch book")
        .json()
        .await
        .expect("Failed to parse book");
    book["available"].as_bool().expect("No availability")
}

async fn admin_action(client: &Client, admin: &str, book_id: i64, action: &str, user_id: i64) -> reqwest::Response {
    client
        .post(format!("{}/admin/books/{}/{}", BASE_URL, book_id, action))
        .bearer_auth(admin)
        .json(&json!({ "user_id": user_id }))
        .send()
        .await
        .expect("Failed to send admin action")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (national_id, _) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "national_id": national_id, "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_reader_cannot_create_books() {
    let client = Client::new();
    let (_, reader) = new_reader(&client, "nobody").await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "title": "Forbidden", "author": "X" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_loan_with_waiting_reader() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (u1, t1) = new_reader(&client, "first").await;
    let (u2, t2) = new_reader(&client, "second").await;
    let book = create_book(&client, &admin, "Queue Scenario").await;

    // U1 requests: book immediately unavailable
    let response = client
        .post(format!("{}/books/{}/loan", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["state"], "awaiting_pickup");
    assert!(!book_available(&client, book).await);

    // U2 cannot request, but can queue
    let response = client
        .post(format!("{}/books/{}/loan", BASE_URL, book))
        .bearer_auth(&t2)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/books/{}/queue", BASE_URL, book))
        .bearer_auth(&t2)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let position: Value = response.json().await.unwrap();
    assert_eq!(position["position"], 1);

    // Pickup stamps a due date
    let response = admin_action(&client, &admin, book, "pickup", u1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["state"], "active");
    assert!(loan["due_date"].is_string());

    // Renewal refused while U2 waits
    let response = client
        .post(format!("{}/books/{}/renew", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // U2 does not hold the book
    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book))
        .bearer_auth(&t2)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Approving the return hands the book to U2
    let response = admin_action(&client, &admin, book, "approve-return", u1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "handed_over");
    assert_eq!(body["next_loan"]["user_id"], u2);
    assert_eq!(body["next_loan"]["state"], "awaiting_pickup");
    assert!(body["next_loan"]["due_date"].is_null());
    assert!(!book_available(&client, book).await);

    // Second approval of the same return
    let response = admin_action(&client, &admin, book, "approve-return", u1).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let queue: Value = client
        .get(format!("{}/books/{}/queue", BASE_URL, book))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queue.as_array().map(Vec::len), Some(0));

    // U2 was notified, U1 got a read credited
    let notifications: Value = client
        .get(format!("{}/notifications?unread=true", BASE_URL))
        .bearer_auth(&t2)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(notifications["items"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["kind"] == "book_available" && n["book_id"] == book));

    let me: Value = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["books_read"], 1);
}

#[tokio::test]
#[ignore]
async fn test_cancel_request_frees_book() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, t1) = new_reader(&client, "canceller").await;
    let book = create_book(&client, &admin, "Cancel Scenario").await;

    let response = client
        .post(format!("{}/books/{}/loan", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .delete(format!("{}/books/{}/loan", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(book_available(&client, book).await);

    // Queueing for an available book is refused
    let response = client
        .post(format!("{}/books/{}/queue", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Leaving a queue one is not in
    let response = client
        .delete(format!("{}/books/{}/queue", BASE_URL, book))
        .bearer_auth(&t1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_reviews_and_shelves() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, reader) = new_reader(&client, "critic").await;
    let book = create_book(&client, &admin, "Review Scenario").await;

    for rating in [2, 5] {
        let response = client
            .put(format!("{}/books/{}/reviews", BASE_URL, book))
            .bearer_auth(&reader)
            .json(&json!({ "rating": rating, "body": "Read it twice" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Writing again replaced the first review
    let summary: Value = client
        .get(format!("{}/books/{}/rating", BASE_URL, book))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["count"], 1);
    assert_eq!(summary["average"], 5.0);

    let response = client
        .put(format!("{}/books/{}/reviews", BASE_URL, book))
        .bearer_auth(&reader)
        .json(&json!({ "rating": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/shelves", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "name": "To read" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let shelf: Value = response.json().await.unwrap();

    let response = client
        .post(format!("{}/shelves", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "name": "To read" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/shelves", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let details: Value = client
        .post(format!("{}/shelves/{}/books", BASE_URL, shelf["id"]))
        .bearer_auth(&reader)
        .json(&json!({ "book_id": book }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(details["book_count"], 1);
    assert_eq!(details["books"][0]["id"], book);
}

async fn open_loan_holder(client: &Client, admin: &str, book_id: i64) -> Option<i64> {
    let loan: Value = client
        .get(format!("{}/books/{}/loan", BASE_URL, book_id))
        .bearer_auth(admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    loan["user_id"].as_i64()
}

async fn queued_users(client: &Client, admin: &str, book_id: i64) -> Vec<i64> {
    let queue: Value = client
        .get(format!("{}/books/{}/queue", BASE_URL, book_id))
        .bearer_auth(admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    queue
        .as_array()
        .expect("queue is an array")
        .iter()
        .filter_map(|entry| entry["user_id"].as_i64())
        .collect()
}

#[tokio::test]
#[ignore]
async fn test_concurrent_requests_open_one_loan() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let book = create_book(&client, &admin, "Contended Book").await;

    let mut readers = Vec::new();
    for i in 0..6 {
        readers.push(new_reader(&client, &format!("racer{}", i)).await);
    }

    let mut requests = JoinSet::new();
    for (_, token) in &readers {
        let client = client.clone();
        let token = token.clone();
        requests.spawn(async move {
            client
                .post(format!("{}/books/{}/loan", BASE_URL, book))
                .bearer_auth(token)
                .send()
                .await
                .expect("Failed to send loan request")
                .status()
        });
    }

    let mut statuses = Vec::new();
    while let Some(status) = requests.join_next().await {
        statuses.push(status.unwrap());
    }

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!(created, 1, "{:?}", statuses);
    assert_eq!(conflicts, readers.len() - 1, "{:?}", statuses);

    let holder = open_loan_holder(&client, &admin, book).await.expect("one open loan");
    assert!(readers.iter().any(|(id, _)| *id == holder));
    assert!(!book_available(&client, book).await);
}

#[tokio::test]
#[ignore]
async fn test_return_approval_races_queue_joins() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (holder, holder_token) = new_reader(&client, "holder").await;
    let book = create_book(&client, &admin, "Raced Return").await;

    let mut waiters = Vec::new();
    for i in 0..4 {
        waiters.push(new_reader(&client, &format!("waiter{}", i)).await);
    }

    client
        .post(format!("{}/books/{}/loan", BASE_URL, book))
        .bearer_auth(&holder_token)
        .send()
        .await
        .unwrap();
    assert!(admin_action(&client, &admin, book, "pickup", holder).await.status().is_success());
    client
        .post(format!("{}/books/{}/return", BASE_URL, book))
        .bearer_auth(&holder_token)
        .send()
        .await
        .unwrap();

    let mut calls = JoinSet::new();
    {
        let client = client.clone();
        let admin = admin.clone();
        calls.spawn(async move {
            admin_action(&client, &admin, book, "approve-return", holder).await.status()
        });
    }
    // Each waiter tries twice so duplicates would show up
    for (_, token) in waiters.iter().chain(waiters.iter()) {
        let client = client.clone();
        let token = token.clone();
        calls.spawn(async move {
            client
                .post(format!("{}/books/{}/queue", BASE_URL, book))
                .bearer_auth(token)
                .send()
                .await
                .expect("Failed to send queue request")
                .status()
        });
    }

    while let Some(status) = calls.join_next().await {
        let status = status.unwrap();
        assert!(
            status == StatusCode::OK || status == StatusCode::CREATED || status == StatusCode::CONFLICT,
            "unexpected {}",
            status
        );
    }

    let queue = queued_users(&client, &admin, book).await;
    let unique: HashSet<i64> = queue.iter().copied().collect();
    assert_eq!(unique.len(), queue.len(), "duplicate queue entries: {:?}", queue);

    match open_loan_holder(&client, &admin, book).await {
        Some(current) => {
            assert_ne!(current, holder);
            assert!(!queue.contains(&current), "holder {} still queued: {:?}", current, queue);
        }
        None => {
            assert!(queue.is_empty());
            assert!(book_available(&client, book).await);
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_concurrent_duplicate_registration() {
    let client = Client::new();
    let suffix: u32 = rand::thread_rng().gen();
    let national_id = format!("twin-{:08x}", suffix);

    let mut registrations = JoinSet::new();
    for _ in 0..4 {
        let client = client.clone();
        let national_id = national_id.clone();
        registrations.spawn(async move {
            client
                .post(format!("{}/auth/register", BASE_URL))
                .json(&json!({
                    "national_id": national_id,
                    "display_name": "Twin",
                    "password": "reader-password"
                }))
                .send()
                .await
                .expect("Failed to send register request")
                .status()
        });
    }

    let mut statuses = Vec::new();
    while let Some(status) = registrations.join_next().await {
        statuses.push(status.unwrap());
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1, "{:?}", statuses);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 3, "{:?}", statuses);
}
