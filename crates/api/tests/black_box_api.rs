use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{json, Value};

use stockroom_api::app::{router_with, services::AppServices};
use stockroom_core::ActorId;
use stockroom_infra::{FixedClock, InMemoryWarehouseStore};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, on an in-memory store with a pinned calendar.
        let services = AppServices::new(
            Arc::new(InMemoryWarehouseStore::new()),
            Arc::new(FixedClock::on(today())),
        );
        let app = router_with(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

async fn expect(res: reqwest::Response, status: StatusCode) -> Value {
    let actual = res.status();
    let body = res.text().await.unwrap_or_default();
    assert_eq!(actual, status, "unexpected status, body={body}");
    if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap()
    }
}

async fn create_product(client: &reqwest::Client, srv: &TestServer, name: &str, stock: i64) -> String {
    let res = client
        .post(srv.url("/products"))
        .json(&json!({
            "name": name,
            "company": "Acme",
            "units_per_pallet": 40,
            "initial_stock": stock,
        }))
        .send()
        .await
        .unwrap();
    let body = expect(res, StatusCode::CREATED).await;
    body["id"].as_str().unwrap().to_string()
}

async fn balance(client: &reqwest::Client, srv: &TestServer, id: &str) -> i64 {
    let res = client
        .get(srv.url(&format!("/products/{id}")))
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::OK).await["balance"].as_i64().unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    let body = expect(res, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn product_adjust_and_history() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_product(&client, &srv, "Stretch film", 100).await;

    let actor = ActorId::new();
    let res = client
        .post(srv.url(&format!("/products/{id}/adjust")))
        .header("x-actor-id", actor.to_string())
        .json(&json!({ "change": -30, "note": "damaged" }))
        .send()
        .await
        .unwrap();
    let product = expect(res, StatusCode::OK).await;
    assert_eq!(product["balance"], 70);
    assert_eq!(product["full_pallets"], 1);
    assert_eq!(product["stock_level"], "low");

    let res = client
        .post(srv.url(&format!("/products/{id}/adjust")))
        .json(&json!({ "change": -71 }))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::UNPROCESSABLE_ENTITY).await;
    assert_eq!(err["error"], "insufficient_stock");
    assert_eq!(balance(&client, &srv, &id).await, 70);

    let res = client
        .get(srv.url(&format!("/products/{id}/history?limit=10")))
        .send()
        .await
        .unwrap();
    let entries = expect(res, StatusCode::OK).await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["change"], -30);
    assert_eq!(entries[0]["cause"], "manual-adjust");
    assert_eq!(entries[0]["note"], "damaged");
    assert_eq!(entries[0]["actor"], actor.to_string());
    assert_eq!(entries[1]["note"], "initial stock");

    let res = client
        .get(srv.url("/products?search=STRETCH"))
        .send()
        .await
        .unwrap();
    let listing = expect(res, StatusCode::OK).await;
    assert_eq!(listing["products"].as_array().unwrap().len(), 1);
    assert_eq!(listing["total_units"], 70);
}

#[tokio::test]
async fn malformed_ids_and_unknown_resources() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/orders/not-a-uuid")).send().await.unwrap();
    let err = expect(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(err["error"], "invalid_id");

    let res = client
        .get(srv.url(&format!("/orders/{}", uuid::Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::NOT_FOUND).await;
    assert_eq!(err["error"], "not_found");

    let res = client
        .get(srv.url("/products"))
        .header("x-actor-id", "bogus")
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "Film", 100).await;

    // Due today without an open shift.
    let order_body = |date: &str, qty: i64| {
        json!({
            "customer": "Northwind",
            "delivery_date": date,
            "lines": [{ "product_id": product.clone(), "quantity": qty }],
        })
    };
    let res = client
        .post(srv.url("/orders"))
        .json(&order_body("2025-03-10", 10))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::UNPROCESSABLE_ENTITY).await;
    assert_eq!(err["error"], "no_active_shift");

    let res = client.post(srv.url("/shifts/start")).send().await.unwrap();
    let shift = expect(res, StatusCode::CREATED).await;
    let res = client.post(srv.url("/shifts/start")).send().await.unwrap();
    let err = expect(res, StatusCode::CONFLICT).await;
    assert_eq!(err["error"], "already_active");

    let res = client
        .post(srv.url("/orders"))
        .json(&order_body("2025-03-10", 10))
        .send()
        .await
        .unwrap();
    let order = expect(res, StatusCode::CREATED).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["shift_id"], shift["id"]);
    let order_id = order["id"].as_str().unwrap().to_string();
    assert_eq!(balance(&client, &srv, &product).await, 90);

    // Pending edit posts only the difference.
    let res = client
        .put(srv.url(&format!("/orders/{order_id}")))
        .json(&order_body("2025-03-10", 25))
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::OK).await;
    assert_eq!(balance(&client, &srv, &product).await, 75);

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/load")))
        .send()
        .await
        .unwrap();
    assert_eq!(expect(res, StatusCode::OK).await["status"], "loaded");

    let res = client
        .put(srv.url(&format!("/orders/{order_id}")))
        .json(&order_body("2025-03-10", 5))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::UNPROCESSABLE_ENTITY).await;
    assert_eq!(err["error"], "invalid_state");

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/ship")))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(err["error"], "validation_error");

    let res = client
        .post(srv.url("/drivers"))
        .json(&json!({ "name": "Ivan" }))
        .send()
        .await
        .unwrap();
    let driver = expect(res, StatusCode::CREATED).await;

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/ship")))
        .json(&json!({ "driver_id": driver["id"] }))
        .send()
        .await
        .unwrap();
    let shipped = expect(res, StatusCode::OK).await;
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["driver_id"], driver["id"]);
    assert_eq!(balance(&client, &srv, &product).await, 75);

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/cancel")))
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::UNPROCESSABLE_ENTITY).await;

    let res = client
        .get(srv.url("/reports/order-summary?period=day"))
        .send()
        .await
        .unwrap();
    let rows = expect(res, StatusCode::OK).await;
    assert_eq!(
        rows,
        json!([{ "period": "2025-03-10", "product_name": "Film", "total_quantity": 25 }])
    );

    let res = client
        .get(srv.url("/orders?delivery_date=2025-03-10"))
        .send()
        .await
        .unwrap();
    let groups = expect(res, StatusCode::OK).await;
    assert_eq!(groups[0]["date"], "2025-03-10");
    assert_eq!(groups[0]["orders"][0]["id"], order_id.as_str());

    // Referenced products are protected.
    let res = client
        .post(srv.url("/products/delete"))
        .json(&json!({ "ids": [product.clone()] }))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::CONFLICT).await;
    assert_eq!(err["error"], "conflict");
}

#[tokio::test]
async fn cancelled_order_can_be_purged() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "Film", 50).await;

    let res = client
        .post(srv.url("/orders"))
        .json(&json!({
            "customer": "Contoso",
            "delivery_date": "2025-04-01",
            "lines": [{ "product_id": product, "quantity": 20 }],
        }))
        .send()
        .await
        .unwrap();
    let order = expect(res, StatusCode::CREATED).await;
    assert_eq!(order["shift_id"], Value::Null);
    let order_id = order["id"].as_str().unwrap().to_string();

    let res = client
        .delete(srv.url(&format!("/orders/{order_id}")))
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::UNPROCESSABLE_ENTITY).await;

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(expect(res, StatusCode::OK).await["status"], "cancelled");
    assert_eq!(balance(&client, &srv, &product).await, 50);

    let res = client
        .delete(srv.url(&format!("/orders/{order_id}")))
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::NO_CONTENT).await;

    let res = client
        .get(srv.url(&format!("/orders/{order_id}")))
        .send()
        .await
        .unwrap();
    expect(res, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn supply_is_processed_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "Boxes", 0).await;

    let res = client
        .post(srv.url("/supplies"))
        .json(&json!({
            "supplier": "Acme Supply",
            "lines": [{ "product_id": product, "quantity": 40 }],
        }))
        .send()
        .await
        .unwrap();
    let supply = expect(res, StatusCode::CREATED).await;
    assert_eq!(supply["status"], "pending");
    let supply_id = supply["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/supplies/{supply_id}/process")))
        .send()
        .await
        .unwrap();
    assert_eq!(expect(res, StatusCode::OK).await["status"], "completed");

    let res = client
        .post(srv.url(&format!("/supplies/{supply_id}/process")))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::CONFLICT).await;
    assert_eq!(err["error"], "already_processed");
    assert_eq!(balance(&client, &srv, &product).await, 40);

    let res = client
        .get(srv.url("/supplies?search=acme"))
        .send()
        .await
        .unwrap();
    assert_eq!(expect(res, StatusCode::OK).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_line_items_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "Film", 50).await;

    let res = client
        .post(srv.url("/orders"))
        .json(&json!({
            "customer": "Contoso",
            "delivery_date": "2025-04-01",
            "lines": [
                { "product_id": product, "quantity": 1 },
                { "product_id": product, "quantity": 2 },
            ],
        }))
        .send()
        .await
        .unwrap();
    let err = expect(res, StatusCode::UNPROCESSABLE_ENTITY).await;
    assert_eq!(err["error"], "duplicate_line_item");
    assert_eq!(balance(&client, &srv, &product).await, 50);
}
