use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = canopy_api::app::build_app().await;
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
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Fixture {
    product_id: String,
    client_id: String,
    event_id: String,
}

/// Owned 5 at rate 1000 (buy 800), one linked pool of 3, a hot lead, and a
/// fresh event.
async fn seed(client: &reqwest::Client, base_url: &str) -> Fixture {
    let res = client
        .post(format!("{base_url}/products"))
        .json(&json!({
            "name": "Tent 5x5",
            "unit": "pcs",
            "rate": 1000,
            "buyPrice": 800,
            "ownedQty": 5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let product: Value = res.json().await.unwrap();
    let product_id = product["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{base_url}/pools"))
        .json(&json!({
            "productId": product_id,
            "itemName": "Tent 5x5",
            "supplier": "Acme Rentals",
            "unitPrice": 500,
            "availableQty": 3,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{base_url}/clients"))
        .json(&json!({"name": "Ali Khan", "phone": "0300-1234567"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let client_id = created["id"].as_str().unwrap().to_string();

    let res = client
        .put(format!("{base_url}/leads/0300-1234567"))
        .json(&json!({"priority": "hot"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{base_url}/events"))
        .json(&json!({"clientId": client_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let event: Value = res.json().await.unwrap();
    let event_id = event["id"].as_str().unwrap().to_string();

    Fixture {
        product_id,
        client_id,
        event_id,
    }
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn dispatch_and_full_return_lifecycle() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();
    let fx = seed(&http, &srv.base_url).await;

    let res = http
        .post(format!("{}/events/{}/confirm", srv.base_url, fx.event_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let event: Value = res.json().await.unwrap();
    assert_eq!(event["status"], "confirmed");

    // 5 owned + 2 borrowed.
    let res = http
        .post(format!("{}/events/{}/dispatch", srv.base_url, fx.event_id))
        .json(&json!({"items": [{"productId": fx.product_id, "qty": 7}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let event: Value = res.json().await.unwrap();
    assert_eq!(event["status"], "dispatched");
    assert_eq!(event["client"]["name"], "Ali Khan");
    let line = &event["dispatches"][0]["lines"][0];
    assert_eq!(line["qty"], 7);
    assert_eq!(line["ownedAfter"], 0);
    assert_eq!(line["borrowedUsages"][0]["quantity"], 2);

    let res = http
        .get(format!("{}/products/{}", srv.base_url, fx.product_id))
        .send()
        .await
        .unwrap();
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["ownedQty"], 0);

    let res = http
        .post(format!("{}/events/{}/return", srv.base_url, fx.event_id))
        .json(&json!({
            "items": [{"productId": fx.product_id, "expected": 7, "returned": 7}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["event"]["status"], "returned");
    assert_eq!(body["event"]["returnClosed"], json!(true));
    assert_eq!(body["summary"]["allCompleted"], json!(true));
    assert_eq!(body["returnDue"], 0);
    assert_eq!(body["clientId"].as_str().unwrap(), fx.client_id);
    assert_eq!(body["eventId"].as_str().unwrap(), fx.event_id);

    // Pool debt repaid before owned stock was credited.
    let res = http
        .get(format!("{}/products/{}", srv.base_url, fx.product_id))
        .send()
        .await
        .unwrap();
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["ownedQty"], 5);

    // The closed event rejects any further return.
    let res = http
        .post(format!("{}/events/{}/return", srv.base_url, fx.event_id))
        .json(&json!({
            "items": [{"productId": fx.product_id, "expected": 1, "returned": 1}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Event already fully returned");
    assert_eq!(body["code"], "ALREADY_RETURNED");

    let res = http
        .get(format!("{}/events/{}/audit", srv.base_url, fx.event_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let audit: Value = res.json().await.unwrap();
    let actions: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["dispatch", "return"]);
}

#[tokio::test]
async fn insufficient_stock_returns_the_structured_payload() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();
    let fx = seed(&http, &srv.base_url).await;

    let res = http
        .post(format!("{}/events/{}/dispatch", srv.base_url, fx.event_id))
        .json(&json!({"items": [{"productId": fx.product_id, "qty": 10}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Stock Required");
    assert_eq!(body["productId"].as_str().unwrap(), fx.product_id);
    assert_eq!(body["productName"], "Tent 5x5");
    assert_eq!(body["shortage"], 2);

    // Nothing moved.
    let res = http
        .get(format!("{}/products/{}", srv.base_url, fx.product_id))
        .send()
        .await
        .unwrap();
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["ownedQty"], 5);
}

#[tokio::test]
async fn dry_run_reserves_via_the_query_flag() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();
    let fx = seed(&http, &srv.base_url).await;

    let res = http
        .post(format!(
            "{}/events/{}/dispatch?dryRun=true",
            srv.base_url, fx.event_id
        ))
        .json(&json!({"items": [{"productId": fx.product_id, "qty": 7}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let event: Value = res.json().await.unwrap();
    assert_eq!(event["status"], "reserved");
    assert_eq!(event["dispatchDrafts"].as_array().unwrap().len(), 1);
    assert!(event["dispatches"].as_array().unwrap().is_empty());

    let res = http
        .get(format!("{}/products/{}", srv.base_url, fx.product_id))
        .send()
        .await
        .unwrap();
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["ownedQty"], 5);
}

#[tokio::test]
async fn cold_lead_is_rejected_with_the_policy_code() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();
    let fx = seed(&http, &srv.base_url).await;

    let res = http
        .put(format!("{}/leads/0300-1234567", srv.base_url))
        .json(&json!({"priority": "cold"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http
        .post(format!("{}/events/{}/dispatch", srv.base_url, fx.event_id))
        .json(&json!({"items": [{"productId": fx.product_id, "qty": 1}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Cold lead - actions disabled");
    assert_eq!(body["code"], "COLD_LEAD");
}

#[tokio::test]
async fn replayed_return_line_is_rejected_while_event_stays_open() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();
    let fx = seed(&http, &srv.base_url).await;

    // A second product keeps the event open after the first line completes.
    let res = http
        .post(format!("{}/products", srv.base_url))
        .json(&json!({
            "name": "Chair",
            "unit": "pcs",
            "rate": 100,
            "ownedQty": 10,
        }))
        .send()
        .await
        .unwrap();
    let chair: Value = res.json().await.unwrap();
    let chair_id = chair["id"].as_str().unwrap().to_string();

    let res = http
        .post(format!("{}/events/{}/dispatch", srv.base_url, fx.event_id))
        .json(&json!({"items": [
            {"productId": fx.product_id, "qty": 2},
            {"productId": chair_id, "qty": 4},
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http
        .post(format!("{}/events/{}/return", srv.base_url, fx.event_id))
        .json(&json!({
            "items": [{"productId": fx.product_id, "expected": 2, "returned": 2}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http
        .post(format!("{}/events/{}/return", srv.base_url, fx.event_id))
        .json(&json!({
            "items": [{"productId": fx.product_id, "expected": 2, "returned": 1}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Line already fully returned");
    assert_eq!(body["code"], "ALREADY_RETURNED_LINE");
}

#[tokio::test]
async fn shortage_charges_flow_into_the_cached_summary() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();
    let fx = seed(&http, &srv.base_url).await;

    let res = http
        .post(format!("{}/events/{}/dispatch", srv.base_url, fx.event_id))
        .json(&json!({"items": [{"productId": fx.product_id, "qty": 5}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http
        .post(format!("{}/events/{}/return", srv.base_url, fx.event_id))
        .json(&json!({
            "items": [{
                "productId": fx.product_id,
                "expected": 5,
                "returned": 3,
                "damageAmount": 100,
                "lateFee": 50,
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();

    // shortage 2 at the 800 buy price, plus damage and late fee.
    let line = &body["summary"]["lines"][0];
    assert_eq!(line["shortage"], 2);
    assert_eq!(line["lossPrice"], 800);
    assert_eq!(line["shortageCost"], 1600);
    assert_eq!(line["lineAdjust"], 1750);
    assert_eq!(body["returnDue"], 1750);
    assert_eq!(body["summary"]["allCompleted"], json!(false));

    let res = http
        .get(format!("{}/events/{}", srv.base_url, fx.event_id))
        .send()
        .await
        .unwrap();
    let event: Value = res.json().await.unwrap();
    assert_eq!(event["lastReturnSummary"]["totals"]["returnDue"], 1750);
    assert_eq!(event["returnClosed"], json!(false));

    let res = http
        .get(format!(
            "{}/events/{}/last-return-summary",
            srv.base_url, fx.event_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["eventId"].as_str().unwrap(), fx.event_id);
    assert_eq!(body["lastReturnSummary"]["totals"]["shortage"], 1600);
}

#[tokio::test]
async fn malformed_actor_header_is_rejected() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();

    let res = http
        .get(format!("{}/health", srv.base_url))
        .header("x-actor-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
