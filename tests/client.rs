//! Table client and ledger tests against a mocked proxy.
//!
//! The wiremock server sits where the credential proxy would, so every
//! path is prefixed with `/api/feishu`.

use serde_json::{json, Map, Value};
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tablegate::cache::TokenCache;
use tablegate::client::fields::FieldMap;
use tablegate::client::settings::ClientSettings;
use tablegate::client::TableClient;
use tablegate::credential::CLIENT_MARGIN_SECS;
use tablegate::errors::AppError;
use tablegate::ledger::Ledger;
use tablegate::models::table::{fields, TableKind};
use tablegate::proxy::upstream::UpstreamClient;

const APP: &str = "/api/feishu/open-apis/bitable/v1/apps/__SHEET_TOKEN__";

fn settings_with_tables() -> ClientSettings {
    ClientSettings {
        purchase_table_id: "tblP".into(),
        formula_table_id: "tblF".into(),
        sales_table_id: "tblS".into(),
        ..ClientSettings::default()
    }
}

fn client(server: &MockServer, settings: ClientSettings) -> TableClient {
    TableClient::with_parts(
        &format!("{}/api/feishu", server.uri()),
        settings,
        UpstreamClient::new(5, 0).unwrap(),
        TokenCache::new(CLIENT_MARGIN_SECS),
    )
}

fn fields_of(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": "success", "data": data}))
}

// ── CRUD ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_translates_known_names() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/tables/tblP/records", APP)))
        .and(body_json(json!({"fields": {"fldName": "oil", "单位": "kg"}})))
        .respond_with(ok(json!({
            "record": {"record_id": "rec1", "fields": {"fldName": "oil", "单位": "kg"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, settings_with_tables());
    client.set_field_map(
        TableKind::Purchase,
        [(fields::MATERIAL_NAME, "fldName")].into_iter().collect(),
    );

    let record = client
        .create(
            TableKind::Purchase,
            fields_of(&[
                (fields::MATERIAL_NAME, json!("oil")),
                (fields::UNIT, json!("kg")),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(record.id, "rec1");
}

#[tokio::test]
async fn test_create_without_map_sends_names() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/tables/tblS/records", APP)))
        .and(body_json(json!({"fields": {"产品名称": "Soap"}})))
        .respond_with(ok(json!({"record": {"record_id": "rec2", "fields": {}}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, settings_with_tables());
    // An empty map translates nothing.
    client.set_field_map(TableKind::Sales, FieldMap::new());

    let record = client
        .create(
            TableKind::Sales,
            fields_of(&[(fields::PRODUCT_NAME, json!("Soap"))]),
        )
        .await
        .unwrap();
    assert_eq!(record.id, "rec2");
}

#[tokio::test]
async fn test_list_returns_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables/tblF/records", APP)))
        .respond_with(ok(json!({
            "items": [
                {"record_id": "r1", "fields": {"产品名称": "Soap", "单位成本": 3.3}},
                {"record_id": "r2", "fields": {"产品名称": "Candle"}}
            ]
        })))
        .mount(&server)
        .await;

    let records = client(&server, settings_with_tables())
        .list(TableKind::Formula)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].str_field(fields::PRODUCT_NAME), Some("Soap"));
    assert_eq!(records[0].num_field(fields::UNIT_COST), 3.3);
}

#[tokio::test]
async fn test_list_without_items_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables/tblS/records", APP)))
        .respond_with(ok(json!({"has_more": false, "total": 0})))
        .mount(&server)
        .await;

    let records = client(&server, settings_with_tables())
        .list(TableKind::Sales)
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_update_uses_record_path() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/tables/tblS/records/rec9", APP)))
        .and(body_json(json!({"fields": {"利润": 12.5}})))
        .respond_with(ok(json!({"record": {"record_id": "rec9", "fields": {"利润": 12.5}}})))
        .expect(1)
        .mount(&server)
        .await;

    let record = client(&server, settings_with_tables())
        .update(
            TableKind::Sales,
            "rec9",
            fields_of(&[(fields::PROFIT, json!(12.5))]),
        )
        .await
        .unwrap();
    assert_eq!(record.num_field(fields::PROFIT), 12.5);
}

#[tokio::test]
async fn test_non_zero_code_is_application_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 1254004, "msg": "WrongTableId"})),
        )
        .mount(&server)
        .await;

    let err = client(&server, settings_with_tables())
        .list(TableKind::Purchase)
        .await
        .unwrap_err();
    match err {
        AppError::Application { code, msg } => {
            assert_eq!(code, 1254004);
            assert_eq!(msg, "WrongTableId");
        }
        other => panic!("expected application error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_surfaces_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/tables/tblP/records/gone", APP)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 1254043})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, settings_with_tables())
        .delete(TableKind::Purchase, "gone")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "API request failed");
}

#[tokio::test]
async fn test_missing_table_id_is_configuration_error() {
    let server = MockServer::start().await;
    let err = client(&server, ClientSettings::default())
        .list(TableKind::Sales)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_json_proxy_answer_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = client(&server, settings_with_tables())
        .list(TableKind::Sales)
        .await
        .unwrap_err();
    match err {
        AppError::MalformedUpstream { status, excerpt } => {
            assert_eq!(status, 502);
            assert_eq!(excerpt, "Bad Gateway");
        }
        other => panic!("expected malformed upstream, got {:?}", other),
    }
}

// ── Credentials ──────────────────────────────────────────────

#[tokio::test]
async fn test_client_token_cached_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/api/feishu/open-apis/auth/v3/tenant_access_token/internal",
        ))
        .and(body_json(json!({"app_id": "cli_a", "app_secret": "sec"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "tenant_access_token": "t-client",
            "expire": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/api/feishu/open-apis/bitable/v1/apps/bascn1/tables/tblS/records",
        ))
        .and(header("authorization", "Bearer t-client"))
        .respond_with(ok(json!({"items": []})))
        .expect(3)
        .mount(&server)
        .await;

    let settings = ClientSettings {
        app_id: "cli_a".into(),
        app_secret: "sec".into(),
        sheet_token: "bascn1".into(),
        ..settings_with_tables()
    };
    let client = client(&server, settings);
    for _ in 0..3 {
        client.list(TableKind::Sales).await.unwrap();
    }
}

// ── Setup ────────────────────────────────────────────────────

#[tokio::test]
async fn test_setup_creates_only_missing_tables() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables", APP)))
        .respond_with(ok(json!({
            "items": [
                {"name": "原料采购", "table_id": "tblExisting"},
                {"name": "Unrelated", "table_id": "tblOther"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/tables", APP)))
        .respond_with(ok(json!({"table": {"table_id": "tblNew"}})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/tables/[A-Za-z]+/fields$"))
        .respond_with(ok(json!({
            "items": [{"field_name": "产品名称", "field_id": "fldProd"}]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let mut client = client(&server, ClientSettings::default());
    let report = client.setup().await.unwrap();

    assert_eq!(report.existing, vec![TableKind::Purchase]);
    assert_eq!(report.created, vec![TableKind::Formula, TableKind::Sales]);
    assert_eq!(client.settings().table_id(TableKind::Purchase), Some("tblExisting"));
    assert_eq!(client.settings().table_id(TableKind::Sales), Some("tblNew"));
    assert!(client.settings().has_tables());
    assert_eq!(
        client.field_map(TableKind::Formula).unwrap().get(fields::PRODUCT_NAME),
        Some("fldProd")
    );

    let created = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(created[0]["table"]["name"], "产品配方");
    assert_eq!(created[0]["table"]["default_view_name"], "网格视图");
    assert!(created[0]["table"]["fields"].as_array().unwrap().len() > 1);
}

#[tokio::test]
async fn test_setup_remaps_bad_sheet_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables", APP)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 99991400, "msg": "app not found (99991400)"})),
        )
        .mount(&server)
        .await;

    let mut client = client(&server, ClientSettings::default());
    let err = client.setup().await.unwrap_err();
    assert!(matches!(err, AppError::UpstreamNotFoundOrForbidden(_)));
    assert!(!client.settings().has_tables());
}

// ── Ledger ───────────────────────────────────────────────────

#[tokio::test]
async fn test_ledger_reload_replaces_all_three_tables() {
    let server = MockServer::start().await;
    for (table, item) in [
        ("tblP", json!({"record_id": "p1", "fields": {"原料名称": "oil", "采购单价": 12.5, "单位": "kg"}})),
        ("tblF", json!({"record_id": "f1", "fields": {"产品名称": "Soap", "单位成本": 3.3}})),
        ("tblS", json!({"record_id": "s1", "fields": {"产品名称": "Soap", "销售总金额": 30}})),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("{}/tables/{}/records", APP, table)))
            .respond_with(ok(json!({"items": [item]})))
            .mount(&server)
            .await;
    }

    let mut ledger = Ledger::default();
    ledger.reload(&client(&server, settings_with_tables())).await.unwrap();

    assert_eq!(ledger.purchases.len(), 1);
    assert_eq!(ledger.products(), vec!["Soap"]);
    assert_eq!(ledger.material_prices()["oil"].price, 12.5);
    assert_eq!(ledger.sales[0].id, "s1");
}

#[tokio::test]
async fn test_ledger_reload_fails_as_a_whole() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables/tblP/records", APP)))
        .respond_with(ok(json!({"items": [{"record_id": "p2", "fields": {}}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables/tblF/records", APP)))
        .respond_with(ok(json!({"items": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tables/tblS/records", APP)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 91402, "msg": "NOTEXIST"})))
        .expect(1)
        .mount(&server)
        .await;

    let previous = Ledger {
        purchases: vec![serde_json::from_value(json!({"record_id": "old"})).unwrap()],
        ..Ledger::default()
    };
    let mut ledger = previous.clone();
    let err = ledger
        .reload(&client(&server, settings_with_tables()))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "NOTEXIST");
    assert_eq!(ledger.purchases[0].id, "old");
}

// ── Round trip ───────────────────────────────────────────────

/// Stands in for one table: POST stores the submitted fields, GET lists them.
#[derive(Clone, Default)]
struct StoredTable(std::sync::Arc<std::sync::Mutex<Vec<Value>>>);

impl wiremock::Respond for StoredTable {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let mut rows = self.0.lock().unwrap();
        if request.method == wiremock::http::Method::POST {
            let body: Value = request.body_json().unwrap();
            let record = json!({"record_id": format!("rec{}", rows.len() + 1), "fields": body["fields"]});
            rows.push(record.clone());
            ok(json!({"record": record}))
        } else {
            ok(json!({"items": rows.clone()}))
        }
    }
}

#[tokio::test]
async fn test_created_record_lists_with_translated_fields() {
    let server = MockServer::start().await;
    Mock::given(path(format!("{}/tables/tblF/records", APP)))
        .respond_with(StoredTable::default())
        .mount(&server)
        .await;

    let client = client(&server, settings_with_tables());
    client.set_field_map(
        TableKind::Formula,
        [(fields::PRODUCT_NAME, "fldProd")].into_iter().collect(),
    );

    let created = client
        .create(
            TableKind::Formula,
            fields_of(&[
                (fields::PRODUCT_NAME, json!("Soap")),
                (fields::PROFIT, json!(2.5)),
            ]),
        )
        .await
        .unwrap();
    let listed = client.list(TableKind::Formula).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert_eq!(
        Value::Object(listed[0].fields.clone()),
        json!({"fldProd": "Soap", "利润": 2.5})
    );
}
