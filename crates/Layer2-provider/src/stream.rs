//! Streaming plumbing shared by all adapters
//!
//! 벤더 응답은 두 가지 줄 단위 포맷 중 하나로 온다:
//!
//! - SSE: `data: {...}` 줄, `[DONE]` 으로 종료 (OpenAI 호환, Claude, Gemini)
//! - NDJSON: 줄마다 JSON 객체 하나 (Ollama)
//!
//! 줄 파싱(`Framing`)과 벤더별 JSON 해석(`ChunkDecoder`)을 분리해서
//! 녹화된 응답 텍스트로도 같은 코드 경로를 테스트할 수 있다.

use crate::error::ProviderError;
use crate::r#trait::{EventStream, StreamEvent};
use crate::retry::{with_retry, RetryConfig};
use futures::TryStreamExt;
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ============================================================================
// Line framing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Sse,
    Ndjson,
}

/// 한 줄을 해석한 결과
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Data(&'a str),
    Done,
}

impl Framing {
    /// 빈 줄, 주석(`:`), `event:` 같은 비데이터 줄은 None
    pub fn parse_line<'a>(&self, line: &'a str) -> Option<Frame<'a>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self {
            Framing::Ndjson => Some(Frame::Data(line)),
            Framing::Sse => {
                let data = line.strip_prefix("data:")?.trim_start();
                if data == "[DONE]" {
                    Some(Frame::Done)
                } else {
                    Some(Frame::Data(data))
                }
            }
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// 벤더별 청크 해석기
pub trait ChunkDecoder: Send {
    /// 데이터 페이로드 하나를 이벤트로 변환
    fn decode(&mut self, data: &str) -> Vec<StreamEvent>;

    /// 스트림 종료 시 남은 이벤트 (보통 Usage). `Done` 은 호출자가 붙인다.
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

/// Framing + ChunkDecoder
///
/// 종료 이벤트(`Done`/`Error`) 이후에는 아무것도 내보내지 않는다.
pub struct FrameDecoder<D> {
    framing: Framing,
    decoder: D,
    finished: bool,
}

impl<D: ChunkDecoder> FrameDecoder<D> {
    pub fn new(framing: Framing, decoder: D) -> Self {
        Self {
            framing,
            decoder,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed_line(&mut self, line: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = match self.framing.parse_line(line) {
            None => return Vec::new(),
            Some(Frame::Done) => return self.end(),
            Some(Frame::Data(data)) => self.decoder.decode(data),
        };

        if let Some(pos) = events.iter().position(StreamEvent::is_terminal) {
            events.truncate(pos + 1);
            self.finished = true;
        }
        events
    }

    /// EOF 또는 `[DONE]`
    pub fn end(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = self.decoder.finish();
        events.push(StreamEvent::Done);
        events
    }

    /// 녹화된 응답 전체를 해석
    pub fn decode_all(mut self, text: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in text.lines() {
            events.extend(self.feed_line(line));
        }
        events.extend(self.end());
        events
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// POST 요청 하나를 기술
pub(crate) struct StreamRequest {
    pub operation: String,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

/// 연결 수립 (재시도 포함). 2xx 가 아니면 상태 코드로 분류한 에러.
pub(crate) async fn open_stream(
    client: &Client,
    retry: &RetryConfig,
    request: &StreamRequest,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, ProviderError> {
    with_retry(retry, &request.operation, cancel, || async {
        let mut builder = client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(status.as_u16(), &body));
        }
        Ok(response)
    })
    .await
}

enum Read {
    Line(usize),
    Failed(std::io::Error),
    Cancelled,
}

/// 요청을 보내고 응답 본문을 이벤트 스트림으로 변환
pub(crate) fn stream_events<'a, D>(
    client: Client,
    retry: RetryConfig,
    request: StreamRequest,
    framing: Framing,
    decoder: D,
    cancel: CancellationToken,
) -> EventStream<'a>
where
    D: ChunkDecoder + 'a,
{
    Box::pin(async_stream::stream! {
        let response = match open_stream(&client, &retry, &request, &cancel).await {
            Ok(response) => response,
            Err(e) => {
                yield StreamEvent::Error(e);
                return;
            }
        };

        debug!(operation = %request.operation, "Stream opened");

        let byte_stream = response.bytes_stream();
        let stream_reader = StreamReader::new(
            byte_stream.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );
        let mut reader = BufReader::new(stream_reader);
        let mut frames = FrameDecoder::new(framing, decoder);
        let mut line_buffer = String::new();

        loop {
            line_buffer.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => Read::Cancelled,
                read = reader.read_line(&mut line_buffer) => match read {
                    Ok(n) => Read::Line(n),
                    Err(e) => Read::Failed(e),
                },
            };

            let events = match read {
                Read::Cancelled => vec![StreamEvent::Error(ProviderError::Cancelled)],
                Read::Failed(e) => vec![StreamEvent::Error(ProviderError::StreamError(
                    format!("Stream read error: {}", e),
                ))],
                Read::Line(0) => frames.end(),
                Read::Line(_) => frames.feed_line(&line_buffer),
            };

            for event in events {
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoDecoder;

    impl ChunkDecoder for EchoDecoder {
        fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
            if data == "fail" {
                vec![StreamEvent::Error(ProviderError::StreamError("bad".into()))]
            } else {
                vec![StreamEvent::Text(data.to_string())]
            }
        }
    }

    #[test]
    fn test_sse_line_parsing() {
        let sse = Framing::Sse;
        assert_eq!(sse.parse_line("data: {\"a\":1}"), Some(Frame::Data("{\"a\":1}")));
        assert_eq!(sse.parse_line("data:{}\r\n"), Some(Frame::Data("{}")));
        assert_eq!(sse.parse_line("data: [DONE]"), Some(Frame::Done));
        assert_eq!(sse.parse_line(": keep-alive"), None);
        assert_eq!(sse.parse_line("event: message_start"), None);
        assert_eq!(sse.parse_line("   "), None);

        assert_eq!(Framing::Ndjson.parse_line("{}\n"), Some(Frame::Data("{}")));
    }

    #[test]
    fn test_decode_all_appends_done_once() {
        let events = FrameDecoder::new(Framing::Sse, EchoDecoder)
            .decode_all("data: a\n\ndata: b\n\ndata: [DONE]\n\ndata: c\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("a".into()),
                StreamEvent::Text("b".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_error_terminates() {
        let events = FrameDecoder::new(Framing::Ndjson, EchoDecoder).decode_all("x\nfail\ny\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Error(_)));
    }
}
