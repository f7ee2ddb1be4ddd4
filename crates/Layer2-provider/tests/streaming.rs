//! 로컬 TCP 서버를 상대로 한 스트리밍 통합 테스트
//!
//! `cargo test -p tars-provider --test streaming`

use futures::StreamExt;
use std::time::Duration;
use tars_foundation::{ProviderOptions, ProviderSettings};
use tars_provider::{
    CancellationToken, Message, ProviderError, ProviderRegistry, StreamEvent, TokenUsage, Vendor,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// 응답 한 번만 돌려주는 HTTP 서버
struct MockServer {
    base_url: String,
    request: JoinHandle<String>,
}

async fn serve_once(status: &'static str, chunks: Vec<&'static str>, hold_open: bool) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let request = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
            status
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in chunks {
            socket.write_all(chunk.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        }

        if hold_open {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        request
    });

    MockServer {
        base_url: format!("http://{}", addr),
        request,
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn settings(tag: &str, vendor: &str, base_url: &str) -> ProviderSettings {
    ProviderSettings::new(tag, vendor)
        .api_key("test-key")
        .base_url(base_url)
}

#[tokio::test]
async fn test_openai_compatible_stream() {
    let server = serve_once(
        "200 OK",
        vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n",
        ],
        false,
    )
    .await;

    let adapter = Vendor::OpenAI
        .create(&settings("openai", "OpenAI", &format!("{}/v1", server.base_url)))
        .unwrap();

    let events: Vec<StreamEvent> = adapter
        .send_request(
            vec![Message::user("hi")],
            &ProviderOptions::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Text("Hel".into()),
            StreamEvent::Text("lo".into()),
            StreamEvent::Usage(TokenUsage {
                input_tokens: 3,
                output_tokens: 2
            }),
            StreamEvent::Done,
        ]
    );

    let request = server.request.await.unwrap();
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains("\"stream\":true"));
}

#[tokio::test]
async fn test_claude_request_headers() {
    let server = serve_once(
        "200 OK",
        vec![
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ],
        false,
    )
    .await;

    let adapter = Vendor::Claude
        .create(&settings("claude", "Claude", &server.base_url))
        .unwrap();

    let text = adapter
        .complete(
            vec![Message::system("be brief"), Message::user("hi")],
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(text, "Hi");

    let request = server.request.await.unwrap().to_ascii_lowercase();
    assert!(request.starts_with("post /v1/messages"));
    assert!(request.contains("x-api-key: test-key"));
    assert!(request.contains("anthropic-version: 2023-06-01"));
    assert!(request.contains("\"system\":\"be brief\""));
}

#[tokio::test]
async fn test_cancellation_ends_stream() {
    let server = serve_once(
        "200 OK",
        vec!["data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"],
        true,
    )
    .await;

    let adapter = Vendor::DeepSeek
        .create(&settings("ds", "DeepSeek", &server.base_url))
        .unwrap();
    let cancel = CancellationToken::new();

    let mut stream = adapter.send_request(
        vec![Message::user("hi")],
        &ProviderOptions::default(),
        cancel.clone(),
    );

    assert_eq!(stream.next().await, Some(StreamEvent::Text("Hel".into())));

    cancel.cancel();
    let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("stream did not observe cancellation");
    assert_eq!(next, Some(StreamEvent::Error(ProviderError::Cancelled)));
    assert_eq!(stream.next().await, None);

    server.request.abort();
}

#[tokio::test]
async fn test_authentication_error_is_not_retried() {
    let server = serve_once(
        "401 Unauthorized",
        vec!["{\"error\":{\"message\":\"bad key\"}}"],
        false,
    )
    .await;

    let adapter = Vendor::Grok
        .create(&settings("grok", "Grok", &server.base_url))
        .unwrap();

    let events: Vec<StreamEvent> = adapter
        .send_request(
            vec![Message::user("hi")],
            &ProviderOptions::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;

    assert_eq!(
        events,
        vec![StreamEvent::Error(ProviderError::Authentication(
            "bad key".into()
        ))]
    );
}

#[tokio::test]
async fn test_registry_adapter_streams() {
    let server = serve_once(
        "200 OK",
        vec![
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ok\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"prompt_eval_count\":1,\"eval_count\":1}\n",
        ],
        false,
    )
    .await;

    let registry = ProviderRegistry::new(tars_foundation::PluginSettings {
        providers: vec![ProviderSettings::new("local", "Ollama").base_url(&server.base_url)],
        ..Default::default()
    });

    let adapter = registry.get_provider("ollama").expect("lookup by vendor name");
    let text = adapter
        .complete(vec![Message::user("hi")], CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(text, "ok");

    let request = server.request.await.unwrap();
    assert!(request.starts_with("POST /api/chat"));
}
