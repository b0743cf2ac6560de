use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use evento_api::app::{build_app, services::AppServices};
use evento_infra::ledger_store::InMemoryLedgerStore;
use evento_infra::RetryPolicy;

// Demo catalog ids (see `evento_infra::seed`):
// customers: 1 alice (1000.00), 2 bob (500.00), 3 carol (0.00)
// ticket types: 1 (50.00 x100), 2 (125.00 x20), 3 (25.00 x500), 4 (free x50)
const ALICE: i64 = 1;
const CAROL: i64 = 3;
const GENERAL: i64 = 1;
const VIP: i64 = 2;
const FREE: i64 = 4;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    client: reqwest::Client,
}

impl TestServer {
    async fn spawn() -> Self {
        let services = AppServices::in_memory(InMemoryLedgerStore::new(), RetryPolicy::default());
        services.seed_demo_catalog().await.expect("seed");

        // Same router as prod, bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let app = build_app(Arc::new(services), addr.port());
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        (res.status(), res.json().await.unwrap())
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.client.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        (res.status(), res.json().await.unwrap())
    }

    async fn send_raw(&self, method: reqwest::Method, path: &str, body: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .request(method, self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        (res.status(), res.json().await.unwrap())
    }

    async fn place(&self, customer_id: i64, items: Value) -> (StatusCode, Value) {
        self.send(
            reqwest::Method::POST,
            "/orders",
            Some(json!({ "customer_id": customer_id, "items": items })),
        )
        .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn index_reports_port_and_request_id() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    let port = srv.base_url.rsplit(':').next().unwrap().to_string();
    assert!(body["message"].as_str().unwrap().contains(&port));
}

#[tokio::test]
async fn placing_an_order_moves_quantity_and_balance() {
    let srv = TestServer::spawn().await;

    let (status, order) = srv
        .place(ALICE, json!([{ "ticket_type_id": GENERAL, "quantity": 3 }]))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total_cost"], 15_000);
    assert_eq!(order["line_items"][0]["count"], 3);

    let (_, ticket) = srv.get(&format!("/tickets/{GENERAL}")).await;
    assert_eq!(ticket["quantity_available"], 97);

    let (status, customer) = srv.get(&format!("/customers/{ALICE}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(customer["balance"], 85_000);
    assert_eq!(customer["orders"].as_array().unwrap().len(), 1);
    assert!(customer.get("credential_hash").is_none());
}

#[tokio::test]
async fn business_failures_map_to_conflict_and_change_nothing() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .place(ALICE, json!([{ "ticket_type_id": VIP, "quantity": 21 }]))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_inventory");

    let (status, body) = srv
        .place(CAROL, json!([{ "ticket_type_id": GENERAL, "quantity": 1 }]))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_balance");

    let (_, ticket) = srv.get(&format!("/tickets/{GENERAL}")).await;
    assert_eq!(ticket["quantity_available"], 100);
    let (_, orders) = srv.get("/orders").await;
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn free_tickets_need_no_balance() {
    let srv = TestServer::spawn().await;
    let (status, order) = srv
        .place(CAROL, json!([{ "ticket_type_id": FREE, "quantity": 2 }]))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total_cost"], 0);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.place(ALICE, json!([])).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_order");

    let (status, body) = srv.get("/customers/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = srv.get("/customers/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "customer_not_found");

    let (status, body) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/tickets/{GENERAL}/quantities"),
            Some(json!({ "action": "steal", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn adjustment_hooks_use_the_atomic_primitives() {
    let srv = TestServer::spawn().await;

    let (status, ticket) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/tickets/{VIP}/quantities"),
            Some(json!({ "action": "deduct", "quantity": 20 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["quantity_available"], 0);

    let (status, _) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/tickets/{VIP}/quantities"),
            Some(json!({ "action": "deduct", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, customer) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/customers/{CAROL}/balances"),
            Some(json!({ "action": "add", "amount": 2_500 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(customer["balance"], 2_500);

    let (status, body) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/customers/{CAROL}/balances"),
            Some(json!({ "action": "deduct", "amount": 2_501 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_balance");
}

#[tokio::test]
async fn bulk_delete_keeps_ledger_but_cancel_restores_it() {
    let srv = TestServer::spawn().await;

    let (_, first) = srv
        .place(ALICE, json!([{ "ticket_type_id": GENERAL, "quantity": 2 }]))
        .await;
    let (status, _) = srv.send(reqwest::Method::DELETE, "/orders", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, customer) = srv.get(&format!("/customers/{ALICE}")).await;
    assert_eq!(customer["balance"], 90_000);
    assert!(customer["orders"].as_array().unwrap().is_empty());

    let (status, body) = srv
        .send(reqwest::Method::DELETE, &format!("/orders/{}", first["id"]), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "order_not_found");

    let (_, second) = srv
        .place(ALICE, json!([{ "ticket_type_id": VIP, "quantity": 1 }, { "ticket_type_id": GENERAL, "quantity": 1 }]))
        .await;
    assert_eq!(second["total_cost"], 17_500);
    let (status, _) = srv
        .send(reqwest::Method::DELETE, &format!("/orders/{}", second["id"]), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, customer) = srv.get(&format!("/customers/{ALICE}")).await;
    assert_eq!(customer["balance"], 90_000);
    let (_, vip) = srv.get(&format!("/tickets/{VIP}")).await;
    assert_eq!(vip["quantity_available"], 20);
}

#[tokio::test]
async fn concurrent_http_orders_never_oversell() {
    let srv = Arc::new(TestServer::spawn().await);

    // Leave exactly 5 VIP tickets.
    srv.send(
        reqwest::Method::PATCH,
        &format!("/tickets/{VIP}/quantities"),
        Some(json!({ "action": "deduct", "quantity": 15 })),
    )
    .await;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let srv = srv.clone();
            tokio::spawn(async move {
                srv.place(ALICE, json!([{ "ticket_type_id": VIP, "quantity": 1 }]))
                    .await
                    .0
            })
        })
        .collect();

    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 5);

    let (_, vip) = srv.get(&format!("/tickets/{VIP}")).await;
    assert_eq!(vip["quantity_available"], 0);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .send_raw(
            reqwest::Method::POST,
            "/orders",
            r#"{"items":[{"ticket_type_id":1,"quantity":1}]}"#,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_order");
    assert!(body["message"].as_str().unwrap().contains("customer_id"));

    let (status, body) = srv.send_raw(reqwest::Method::POST, "/orders", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_body");

    let (status, body) = srv
        .send_raw(
            reqwest::Method::PATCH,
            &format!("/customers/{ALICE}/balances"),
            r#"{"action":"add","amount":1.5}"#,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv
        .send_raw(
            reqwest::Method::PATCH,
            &format!("/tickets/{GENERAL}/quantities"),
            r#"{"action":"add"}"#,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    // Nothing moved.
    let (_, customer) = srv.get(&format!("/customers/{ALICE}")).await;
    assert_eq!(customer["balance"], 100_000);
}

#[tokio::test]
async fn registration_creates_a_customer_with_zero_balance() {
    let srv = TestServer::spawn().await;

    let (status, created) = srv
        .send(
            reqwest::Method::POST,
            "/customers",
            Some(json!({ "username": "dave", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["username"], "dave");
    assert_eq!(created["balance"], 0);
    assert!(created.get("credential_hash").is_none());
    assert!(created.get("password").is_none());

    let (status, body) = srv
        .send(
            reqwest::Method::POST,
            "/customers",
            Some(json!({ "username": "dave", "password": "another one" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = srv
        .send(
            reqwest::Method::POST,
            "/customers",
            Some(json!({ "username": "erin", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv
        .send(
            reqwest::Method::POST,
            "/customers",
            Some(json!({ "username": "not valid!", "password": "long enough" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, customer) = srv.get(&format!("/customers/{}", created["id"])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(customer["username"], "dave");
}

#[tokio::test]
async fn customer_listing_includes_everyone_with_their_orders() {
    let srv = TestServer::spawn().await;
    srv.place(ALICE, json!([{ "ticket_type_id": GENERAL, "quantity": 1 }]))
        .await;

    let (status, customers) = srv.get("/customers").await;
    assert_eq!(status, StatusCode::OK);
    let customers = customers.as_array().unwrap();
    assert_eq!(customers.len(), 3);
    assert_eq!(customers[0]["id"], ALICE);
    assert_eq!(customers[0]["orders"].as_array().unwrap().len(), 1);
    assert_eq!(customers[2]["id"], CAROL);
    assert!(customers[2]["orders"].as_array().unwrap().is_empty());
    assert!(customers.iter().all(|c| c.get("credential_hash").is_none()));
}
