//! API endpoint integration tests

use std::net::SocketAddr;

use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use voicebot::api::{ApiState, error::MISSING_KEY, router};
use voicebot::services::GroqOptions;
use voicebot::voice::{EncodedAudio, WAV_MIME};
use voicebot::{Error, GroqClient, ProxyClient, Service, Turn, Voice, VoiceServices};

/// Fake Groq chat endpoint: replies with the message count it received
async fn stub_chat(Json(body): Json<Value>) -> Response {
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let last = messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    if last == "fail" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Invalid API Key"}})),
        )
            .into_response();
    }

    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": format!("{} messages", messages.len())}}]
    }))
    .into_response()
}

async fn stub_speech(Json(body): Json<Value>) -> Response {
    if body["voice"] != "hannah" && body["voice"] != "troy" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad voice"}))).into_response();
    }
    if body["input"] == "slow down" {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response();
    }
    ([(header::CONTENT_TYPE, "audio/wav")], b"RIFF0000WAVE".to_vec()).into_response()
}

async fn stub_transcriptions() -> Json<Value> {
    Json(json!({"text": "hello there"}))
}

/// Serve `app` on an ephemeral local port
async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a fake Groq API and return a client pointed at it
async fn stub_upstream() -> GroqClient {
    let app = Router::new()
        .route("/v1/chat/completions", post(stub_chat))
        .route("/v1/audio/speech", post(stub_speech))
        .route("/v1/audio/transcriptions", post(stub_transcriptions));
    let addr = serve(app).await;

    let options = GroqOptions {
        base_url: format!("http://{addr}/v1"),
        ..GroqOptions::default()
    };
    GroqClient::new("gsk_test", options).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = router(ApiState::default());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["upstream"], false);
}

#[tokio::test]
async fn test_non_post_is_405() {
    for uri in ["/api/transcribe", "/api/ask", "/api/tts"] {
        let app = router(ApiState::default());
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{uri}");
    }
}

#[tokio::test]
async fn test_missing_key_checked_before_body() {
    for uri in ["/api/transcribe", "/api/ask", "/api/tts"] {
        let app = router(ApiState::default());
        let response = app.oneshot(post_json(uri, "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(body_json(response).await["error"], MISSING_KEY);
    }
}

#[tokio::test]
async fn test_missing_fields_are_400() {
    let groq = GroqClient::new("gsk_test", GroqOptions::default()).unwrap();
    let cases = [
        ("/api/transcribe", "{}", "Missing audioBase64"),
        ("/api/ask", r#"{"history": []}"#, "Missing text"),
        ("/api/tts", "", "Missing text"),
    ];

    for (uri, body, message) in cases {
        let app = router(ApiState::new(Some(groq.clone())));
        let response = app.oneshot(post_json(uri, body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_json(response).await["error"], message);
    }
}

#[tokio::test]
async fn test_malformed_input_is_400() {
    let groq = GroqClient::new("gsk_test", GroqOptions::default()).unwrap();
    let cases = [
        ("/api/ask", "{not json"),
        ("/api/transcribe", r#"{"audioBase64": "***"}"#),
        ("/api/tts", r#"{"text": "hi", "voice": "alloy"}"#),
    ];

    for (uri, body) in cases {
        let app = router(ApiState::new(Some(groq.clone())));
        let response = app.oneshot(post_json(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_ask_trims_history() {
    let app = router(ApiState::new(Some(stub_upstream().await)));

    let history: Vec<Turn> = (0..20)
        .map(|i| {
            if i % 2 == 0 {
                Turn::user(format!("q{i}"))
            } else {
                Turn::assistant(format!("a{i}"))
            }
        })
        .collect();
    let body = json!({"text": "and now?", "history": history}).to_string();

    let response = app.oneshot(post_json("/api/ask", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // system + 12 trailing turns + question
    assert_eq!(body_json(response).await["reply"], "14 messages");
}

#[tokio::test]
async fn test_upstream_status_and_message_relayed() {
    let app = router(ApiState::new(Some(stub_upstream().await)));

    let response = app
        .oneshot(post_json("/api/ask", r#"{"text": "fail"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid API Key");
}

#[tokio::test]
async fn test_upstream_without_message_uses_default() {
    let app = router(ApiState::new(Some(stub_upstream().await)));

    let response = app
        .oneshot(post_json("/api/tts", r#"{"text": "slow down"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"], "TTS error");
}

#[tokio::test]
async fn test_tts_returns_wav() {
    let app = router(ApiState::new(Some(stub_upstream().await)));

    let response = app
        .oneshot(post_json("/api/tts", r#"{"text": "Hello!", "voice": "troy"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"RIFF0000WAVE");
}

#[tokio::test]
async fn test_transcribe_forwards_audio() {
    let app = router(ApiState::new(Some(stub_upstream().await)));

    let body = json!({"audioBase64": "UklGRgAAAABXQVZF", "mimeType": "audio/wav"}).to_string();
    let response = app.oneshot(post_json("/api/transcribe", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["text"], "hello there");
}

#[tokio::test]
async fn test_unreachable_upstream_is_500() {
    let options = GroqOptions {
        base_url: "http://127.0.0.1:1/v1".to_string(),
        ..GroqOptions::default()
    };
    let groq = GroqClient::new("gsk_test", options).unwrap();
    let app = router(ApiState::new(Some(groq)));

    let response = app
        .oneshot(post_json("/api/ask", r#"{"text": "hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = router(ApiState::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:5173")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_proxy_client_round_trip() {
    let proxy = serve(router(ApiState::new(Some(stub_upstream().await)))).await;
    let client = ProxyClient::new(format!("http://{proxy}/"));

    let reply = client
        .ask("hi", &[Turn::user("earlier"), Turn::assistant("sure")])
        .await
        .unwrap();
    assert_eq!(reply, "4 messages");

    let audio = EncodedAudio {
        bytes: b"RIFF0000WAVE".to_vec(),
        mime_type: WAV_MIME.to_string(),
    };
    assert_eq!(client.transcribe(&audio, Some("en")).await.unwrap(), "hello there");

    let wav = client.synthesize("Hello!", Voice::Hannah).await.unwrap();
    assert_eq!(wav, b"RIFF0000WAVE");

    let err = client.ask("fail", &[]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Downstream { service: Service::Ask, status: Some(401), ref message } if message == "Invalid API Key"
    ));
}
