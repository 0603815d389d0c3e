//! End-to-end run of the token pipeline against a single mock server.

use nso_auth::{
    ClientConfig, Endpoints, Error, NsoClient, RedirectInput, SPLATNET3_GAME_ID, Secret,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REVISION: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c";

fn client_for(server: &MockServer) -> NsoClient {
    NsoClient::new(ClientConfig {
        endpoints: Endpoints::all_at(&server.uri()),
        f_gen_url: format!("{}/f", server.uri()),
        client_user_agent: "pipeline-test/1.0".into(),
        ..ClientConfig::default()
    })
    .unwrap()
}

async fn mount_versions(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nso_version": "2.12.0"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("Cookie", "_dnt=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><script defer="defer" src="/static/js/main.feedbeef.js"></script></html>"#,
        ))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/js/main.feedbeef.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "var r=\"{REVISION}\",s=void 0!==n?n:\"revision_info_not_set\"}}`,v=`6.0.0-${{r}}`;"
        )))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_nintendo_account(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/connect/1.0.0/api/session_token"))
        .and(header("User-Agent", "OnlineLounge/2.12.0 NASDKAPI Android"))
        .and(body_string_contains("session_token_code=stc_from_redirect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_token": "st_pipeline",
            "code": "stc_from_redirect"
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/connect/1.0.0/api/token"))
        .and(body_partial_json(json!({"session_token": "st_pipeline"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "na_access",
            "id_token": "na_id_token",
            "expires_in": 900
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2.0.0/users/me"))
        .and(header("Authorization", "Bearer na_access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nickname": "Callie",
            "language": "ja-JP",
            "country": "JP",
            "id": "na-user-42",
            "birthday": "1995-05-05"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_coral(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/f"))
        .and(header("X-znca-Version", "2.12.0"))
        .and(body_partial_json(json!({
            "hash_method": 1,
            "token": "na_id_token",
            "na_id": "na-user-42"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "f": "f_login",
            "request_id": "7e1c5b9e-3f1d-4a55-9c53-2f0b3c1d2e4f",
            "timestamp": 1_700_000_000_000u64
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/f"))
        .and(body_partial_json(json!({
            "hash_method": 2,
            "token": "coral_access",
            "na_id": "na-user-42",
            "coral_user_id": "8888"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "f": "f_wst",
            "request_id": "0d9a4c57-1e2b-4f6a-8b3c-9d0e1f2a3b4c",
            "timestamp": 1_700_000_000_500u64
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/Account/Login"))
        .and(header("X-ProductVersion", "2.12.0"))
        .and(body_partial_json(json!({"parameter": {"f": "f_login", "naIdToken": "na_id_token"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "result": {
                "user": {"id": 8888},
                "webApiServerCredential": {"accessToken": "coral_access"}
            }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/Game/GetWebServiceToken"))
        .and(body_partial_json(json!({"parameter": {"f": "f_wst", "id": SPLATNET3_GAME_ID}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "result": {"accessToken": "gtoken_pipeline", "expiresIn": 7200}
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn redirect_to_bullet_token_in_one_pass() {
    let server = MockServer::start().await;
    mount_versions(&server).await;
    mount_nintendo_account(&server).await;
    mount_coral(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/bullet_tokens"))
        .and(header("Cookie", "_gtoken=gtoken_pipeline; _dnt=1"))
        .and(header("X-Web-View-Ver", "6.0.0-0f1e2d3c"))
        .and(header("X-NACOUNTRY", "JP"))
        .and(header("Accept-Language", "ja-JP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bulletToken": "bt_pipeline",
            "lang": "ja-JP",
            "is_noe_country": "false"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = client.authorization_request();
    assert!(request.url.starts_with(&server.uri()));

    let pasted = format!(
        "npf71b963c1b7b6d119://auth#session_state=abc&session_token_code=stc_from_redirect&state={}",
        request.state
    );
    let RedirectInput::Code(code) = RedirectInput::parse(&pasted) else {
        panic!("redirect should carry a code");
    };
    let session_token = client.redeem(&request, &code).await.unwrap();
    assert_eq!(session_token.expose(), "st_pipeline");

    let tokens = client
        .acquire_tokens(&session_token, "Mozilla/5.0 pipeline")
        .await
        .unwrap();
    assert_eq!(tokens.gtoken.expose(), "gtoken_pipeline");
    assert_eq!(tokens.bullet_token.expose(), "bt_pipeline");
    assert_eq!(tokens.nickname, "Callie");
    assert_eq!(tokens.language, "ja-JP");
    assert_eq!(tokens.country, "JP");
}

#[tokio::test]
async fn expired_game_web_token_stops_the_pipeline() {
    let server = MockServer::start().await;
    mount_versions(&server).await;
    mount_nintendo_account(&server).await;
    mount_coral(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/bullet_tokens"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = client.authorization_request();
    let session_token = client.redeem(&request, "stc_from_redirect").await.unwrap();

    let result = client
        .acquire_tokens(&session_token, "Mozilla/5.0 pipeline")
        .await;
    assert!(matches!(result, Err(Error::InvalidGameWebToken)), "got: {result:?}");
}

#[tokio::test]
async fn secrets_never_reach_debug_output() {
    let tokens = nso_auth::Tokens {
        gtoken: Secret::new("gtoken_pipeline"),
        bullet_token: Secret::new("bt_pipeline"),
        nickname: "Callie".into(),
        language: "ja-JP".into(),
        country: "JP".into(),
    };
    let rendered = format!("{tokens:?}");
    assert!(!rendered.contains("gtoken_pipeline"));
    assert!(!rendered.contains("bt_pipeline"));
    assert!(rendered.contains("Callie"));
}
