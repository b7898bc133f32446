use std::{io, net::SocketAddr, sync::Arc};

use inspec_exporter_core::{
    exposition::CONTENT_TYPE, run_scrape, ExporterStats, InspecAuditor, ScrapeRequest,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::settings::SettingsStore;

const MAX_HEADER_LINES: usize = 100;
const MAX_LINE_BYTES: usize = 8 * 1024;

const LANDING_PAGE: &str = r#"<html>
<head><title>inspec Exporter</title>
<style>
label { display: inline-block; width: 75px; }
form label, form input { margin: 10px; }
</style>
</head>
<body>
<h1>inspec Exporter</h1>
<form action="/inspec">
<label>Target:</label> <input type="text" name="target" placeholder="X.X.X.X" value="1.2.3.4"><br>
<label>Module:</label> <input type="text" name="module" placeholder="module" value="sudoers"><br>
<input type="submit" value="Submit">
</form>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>
"#;

/// State shared by every connection handler.
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub stats: Arc<ExporterStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }
}

/// Accept connections until the listener fails. Every connection gets its
/// own task, so slow scrapes never block each other.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, peer, &state).await {
                debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: &AppState,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let response = match read_request_line(&mut reader).await? {
        Err(rejection) => {
            debug!(%peer, status = rejection.status, "rejected request");
            rejection
        }
        Ok(request_line) => {
            let mut parts = request_line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(method), Some(target)) => {
                    debug!(%peer, method, path = target, "request");
                    route(state, method, target).await
                }
                _ => Response::text(400, "malformed request line\n"),
            }
        }
    };

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.reason(),
        response.content_type,
        response.body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(response.body.as_bytes()).await?;
    writer.shutdown().await
}

/// Read the request line and skip the headers. Requests that cannot be
/// routed come back as the response to send instead.
async fn read_request_line<R>(reader: &mut R) -> io::Result<Result<String, Response>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request_line) = read_bounded_line(reader).await? else {
        return Ok(Err(Response::text(400, "request line too long\n")));
    };
    for _ in 0..MAX_HEADER_LINES {
        match read_bounded_line(reader).await? {
            None => return Ok(Err(Response::text(400, "header line too long\n"))),
            Some(header) if header.iter().all(u8::is_ascii_whitespace) => break,
            Some(_) => {}
        }
    }
    Ok(String::from_utf8(request_line)
        .map_err(|_| Response::text(400, "request line is not valid UTF-8\n")))
}

/// One line including its terminator, or `None` once it exceeds
/// `MAX_LINE_BYTES`. Never buffers more than the limit plus one byte.
async fn read_bounded_line<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read > MAX_LINE_BYTES {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Dispatch one request to its endpoint.
pub async fn route(state: &AppState, method: &str, target: &str) -> Response {
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return Response::text(400, "invalid request target\n");
    };
    if method != "GET" {
        return Response::text(405, "method not allowed\n");
    }

    match url.path() {
        "/" => Response {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: LANDING_PAGE.to_string(),
        },
        "/metrics" => Response {
            status: 200,
            content_type: CONTENT_TYPE,
            body: state.stats.render(env!("CARGO_PKG_VERSION")),
        },
        "/inspec" => {
            let mut request = ScrapeRequest::default();
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "target" => request.target = value.into_owned(),
                    "module" => request.module = value.into_owned(),
                    _ => {}
                }
            }
            scrape(state, &request).await
        }
        _ => Response::text(404, "not found\n"),
    }
}

async fn scrape(state: &AppState, request: &ScrapeRequest) -> Response {
    let settings = state.settings.snapshot();
    let auditor = Arc::new(InspecAuditor::new(settings.inspec_path.clone()));

    match run_scrape(request, &settings, auditor, &state.stats).await {
        Err(err) => {
            let status = if err.is_client_error() { 400 } else { 500 };
            Response::text(status, format!("{err}\n"))
        }
        Ok(outcome) if outcome.all_failed() => {
            let errors: Vec<_> = outcome
                .registry
                .errors()
                .iter()
                .map(|marker| format!("module {}: {}", marker.module, marker.error))
                .collect();
            warn!(scrape_target = %request.target, module = %request.module, "every collector failed");
            Response::text(500, errors.join("\n") + "\n")
        }
        Ok(outcome) => Response {
            status: 200,
            content_type: CONTENT_TYPE,
            body: outcome.registry.render(),
        },
    }
}
